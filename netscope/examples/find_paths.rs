//! Path finding example: load a design snapshot and print the path view
//! between two nodes or pins.

use netscope::prelude::*;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        eprintln!("Usage: cargo run --example find_paths <snapshot.json> <design> <from> <to>");
        std::process::exit(1);
    }
    let path = Path::new(&args[0]);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        std::process::exit(1);
    }

    let explorer = Explorer::new(Box::new(MemoryStore::open(path)?));
    let view = explorer.find_paths(&args[1], &args[2], &args[3])?;

    if view.is_empty() {
        println!("No path from {} to {}.", args[2], args[3]);
        return Ok(());
    }

    println!("Nodes:");
    for node in &view.nodes {
        let role = match (node.is_source, node.is_target) {
            (true, true) => " (source, target)",
            (true, false) => " (source)",
            (false, true) => " (target)",
            _ => "",
        };
        println!("  - {}{}", node.name, role);
    }

    println!("\nConnections:");
    for conn in &view.connections {
        println!("  - {} -> {} [pin {}]", conn.from, conn.to, conn.pin_name);
    }

    if view.truncated {
        println!("\nResults were truncated by the traversal limits.");
    }
    Ok(())
}
