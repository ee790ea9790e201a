//! Netscope CLI - explore schematic connectivity from the command line.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use netscope::{
    ConnectedMode, DisplayGraph, DisplayKind, ErrorCategory, ErrorPayload, Explorer, ExplorerError,
    ExplorerOptions, Granularity, HitKind, NetDetail, NodeDetail, PathOptions, SearchHit,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "netscope")]
#[command(about = "Schematic connectivity explorer: search, fan-out and path finding", long_about = None)]
#[command(version)]
struct Cli {
    /// Design snapshot (.json) or SQLite database (.db, .sqlite)
    #[arg(short, long, value_name = "FILE")]
    store: PathBuf,

    /// JSON file with explorer options (limits, default path cap)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all designs in the store
    Designs,

    /// Show a single design
    Design {
        name: String,
    },

    /// Show a node with its part and the net of every pin
    Node {
        design: String,
        node: String,
    },

    /// Show a net with every connected pin
    Net {
        design: String,
        net: String,
    },

    /// Prefix search over nets, nodes and NODE.PIN names
    Search {
        design: String,
        query: String,
    },

    /// Nodes electrically reachable from a node or pin
    Connected {
        design: String,
        /// Source as NODE or NODE.PIN
        source: String,
        /// Optional NODE[.PIN] prefix filter
        query: Option<String>,
        /// List reached pins instead of nodes
        #[arg(long)]
        pins: bool,
    },

    /// Connection paths between two nodes or pins
    Paths {
        design: String,
        /// Start as NODE or NODE.PIN
        from: String,
        /// End as NODE or NODE.PIN
        to: String,
        /// Maximum number of paths to enumerate
        #[arg(long)]
        max_paths: Option<usize>,
        /// Show individual pins instead of collapsing them into nodes
        #[arg(long)]
        pins: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let explorer = match open_explorer(&cli.store, cli.config.as_deref()) {
        Ok(explorer) => explorer,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    let format = cli.format;
    let result = match cli.command {
        Commands::Designs => handle_designs(&explorer, format),
        Commands::Design { name } => handle_design(&explorer, &name, format),
        Commands::Node { design, node } => handle_node(&explorer, &design, &node, format),
        Commands::Net { design, net } => handle_net(&explorer, &design, &net, format),
        Commands::Search { design, query } => handle_search(&explorer, &design, &query, format),
        Commands::Connected {
            design,
            source,
            query,
            pins,
        } => handle_connected(&explorer, &design, &source, query.as_deref(), pins, format),
        Commands::Paths {
            design,
            from,
            to,
            max_paths,
            pins,
        } => handle_paths(&explorer, &design, &from, &to, max_paths, pins, format),
    };

    let exit_code = match result {
        Ok(()) => 0,
        Err(e) => {
            report_error(&e, format);
            exit_code(&e)
        }
    };
    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn open_explorer(store: &Path, config: Option<&Path>) -> anyhow::Result<Explorer> {
    let options = match config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ExplorerOptions::from_json(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ExplorerOptions::default(),
    };
    let store = netscope::open_store(store)
        .with_context(|| format!("opening store {}", store.display()))?;
    Ok(Explorer::with_options(store, options))
}

fn exit_code(e: &ExplorerError) -> i32 {
    match e.category() {
        ErrorCategory::BadRequest => 2,
        ErrorCategory::NotFound => 3,
        ErrorCategory::Internal => 1,
    }
}

fn report_error(e: &ExplorerError, format: OutputFormat) {
    match format {
        OutputFormat::Human => eprintln!("Error: {}", e),
        OutputFormat::Json => print_json(&ErrorPayload::from(e)),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

fn handle_designs(explorer: &Explorer, format: OutputFormat) -> Result<(), ExplorerError> {
    let designs = explorer.list_designs()?;
    match format {
        OutputFormat::Json => print_json(&designs),
        OutputFormat::Human => {
            if designs.is_empty() {
                println!("No designs found");
            }
            for design in &designs {
                println!("{}", design.name);
            }
        }
    }
    Ok(())
}

fn handle_design(explorer: &Explorer, name: &str, format: OutputFormat) -> Result<(), ExplorerError> {
    let design = explorer.get_design(name)?;
    match format {
        OutputFormat::Json => print_json(&design),
        OutputFormat::Human => println!("Design: {}", design.name),
    }
    Ok(())
}

fn handle_node(
    explorer: &Explorer,
    design: &str,
    node: &str,
    format: OutputFormat,
) -> Result<(), ExplorerError> {
    let detail = explorer.get_node(design, node)?;
    match format {
        OutputFormat::Json => print_json(&detail),
        OutputFormat::Human => output_node(&detail),
    }
    Ok(())
}

fn output_node(detail: &NodeDetail) {
    println!("\nNode: {} (part {})", detail.name, detail.part.name);
    println!("{}", "─".repeat(60));
    if detail.pins.is_empty() {
        println!("  No pins");
    }
    for pin in &detail.pins {
        let label = match &pin.pin_friendly_name {
            Some(friendly) => format!("{} ({})", pin.pin_name, friendly),
            None => pin.pin_name.clone(),
        };
        match &pin.net {
            Some(net) => println!("  {:<20} -> {}", label, net.name),
            None => println!("  {:<20}    unconnected", label),
        }
    }
}

fn handle_net(
    explorer: &Explorer,
    design: &str,
    net: &str,
    format: OutputFormat,
) -> Result<(), ExplorerError> {
    let detail = explorer.get_net(design, net)?;
    match format {
        OutputFormat::Json => print_json(&detail),
        OutputFormat::Human => output_net(&detail),
    }
    Ok(())
}

fn output_net(detail: &NetDetail) {
    println!("\nNet: {}", detail.name);
    println!("{}", "─".repeat(60));
    if detail.pins.is_empty() {
        println!("  No connected pins");
    }
    for pin in &detail.pins {
        let name = format!("{}.{}", pin.node.name, pin.pin_name);
        match &pin.pin_friendly_name {
            Some(friendly) => println!("  {:<20} {:<12} part {}", name, friendly, pin.node.part.name),
            None => println!("  {:<20} {:<12} part {}", name, "", pin.node.part.name),
        }
    }
}

fn handle_search(
    explorer: &Explorer,
    design: &str,
    query: &str,
    format: OutputFormat,
) -> Result<(), ExplorerError> {
    let hits = explorer.search(design, query)?;
    output_hits(&hits, format);
    Ok(())
}

fn handle_connected(
    explorer: &Explorer,
    design: &str,
    source: &str,
    query: Option<&str>,
    pins: bool,
    format: OutputFormat,
) -> Result<(), ExplorerError> {
    let mode = if pins {
        ConnectedMode::Pins
    } else {
        ConnectedMode::Nodes
    };
    let hits = explorer.connected_search_with(design, source, query, mode)?;
    output_hits(&hits, format);
    Ok(())
}

fn hit_label(kind: HitKind) -> &'static str {
    match kind {
        HitKind::Net => "net",
        HitKind::Node => "node",
        HitKind::Pin => "pin",
    }
}

fn output_hits(hits: &[SearchHit], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "results": hits })),
        OutputFormat::Human => {
            if hits.is_empty() {
                println!("No matches");
            }
            for hit in hits {
                match &hit.pins {
                    Some(pins) => println!(
                        "  {:<5} {:<20} pins: {}",
                        hit_label(hit.kind),
                        hit.name,
                        pins.join(", ")
                    ),
                    None => println!("  {:<5} {}", hit_label(hit.kind), hit.name),
                }
            }
        }
    }
}

fn handle_paths(
    explorer: &Explorer,
    design: &str,
    from: &str,
    to: &str,
    max_paths: Option<usize>,
    pins: bool,
    format: OutputFormat,
) -> Result<(), ExplorerError> {
    let options = PathOptions {
        max_paths,
        granularity: if pins {
            Granularity::Pins
        } else {
            Granularity::Nodes
        },
    };
    let graph = explorer.find_paths_with(design, from, to, &options)?;
    match format {
        OutputFormat::Json => print_json(&graph),
        OutputFormat::Human => output_paths(&graph, from, to),
    }
    Ok(())
}

fn output_paths(graph: &DisplayGraph, from: &str, to: &str) {
    if graph.is_empty() {
        println!("No path found from {} to {}", from, to);
        return;
    }

    println!("\nNodes:");
    for node in &graph.nodes {
        let detail = match &node.kind {
            DisplayKind::Node { part_name } => format!("node  part {}", part_name),
            DisplayKind::Net => "net".to_string(),
            DisplayKind::Pin { node_name, .. } => format!("pin   of {}", node_name),
        };
        let mut marks = String::new();
        if node.is_source {
            marks.push_str(" [source]");
        }
        if node.is_target {
            marks.push_str(" [target]");
        }
        println!("  {:<20} {}{}", node.name, detail, marks);
    }

    println!("\nConnections:");
    if graph.connections.is_empty() {
        println!("  (none)");
    }
    for conn in &graph.connections {
        match &conn.pin_friendly_name {
            Some(friendly) => println!(
                "  {} -> {} via pin {} ({})",
                conn.from, conn.to, conn.pin_name, friendly
            ),
            None => println!("  {} -> {} via pin {}", conn.from, conn.to, conn.pin_name),
        }
    }

    if graph.truncated {
        println!("\n  (results truncated)");
    }
}
