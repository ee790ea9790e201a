//! Netscope - schematic connectivity explorer
//!
//! This library answers connectivity questions over a schematic stored as a
//! typed graph (designs, parts, nodes, pins and nets): prefix search, node
//! and net details, fan-out, and bounded path finding between two pins or
//! nodes, reduced to a `{nodes, connections}` view ready for rendering.
//!
//! # Quick Start
//!
//! ```no_run
//! use netscope::{Explorer, MemoryStore};
//! use std::path::Path;
//!
//! let store = MemoryStore::open(Path::new("board.json")).unwrap();
//! let explorer = Explorer::new(Box::new(store));
//!
//! let view = explorer.find_paths("BOARD1", "U1", "U3").unwrap();
//! for conn in &view.connections {
//!     println!("{} -> {} via pin {}", conn.from, conn.to, conn.pin_name);
//! }
//! ```
//!
//! # Features
//!
//! - **Path finding**: depth-first, `MAPS_TO`-aware, no entity revisited
//! - **Connected search**: nodes reachable from a source pin or node
//! - **Prefix search**: nets, nodes and `NODE.PIN` names
//! - **Pluggable stores**: in-memory petgraph or SQLite

pub mod core;
pub mod model;
pub mod reducer;
pub mod search;
pub mod store;
pub mod traversal;

// Re-export main types
pub use crate::core::{
    ErrorCategory, ErrorPayload, Explorer, ExplorerError, ExplorerOptions, NetDetail, NodeDetail,
    PathOptions,
};
pub use model::{EdgeKind, Entity, EntityKind, EntityRef, PinKey, PinSelector};
pub use reducer::{DisplayConnection, DisplayGraph, DisplayKind, DisplayNode, Granularity};
pub use search::{ConnectedMode, HitKind, SearchHit, SearchLimits};
pub use store::{MemoryStore, SchematicStore, SnapshotFile, SqliteStore, StoreError};
pub use traversal::{Bound, TraversalLimits};

/// Open a store by file extension: `.db`/`.sqlite`/`.sqlite3` use SQLite,
/// anything else is read as a JSON snapshot.
pub fn open_store(path: &std::path::Path) -> Result<Box<dyn SchematicStore>, StoreError> {
    let sqlite = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| matches!(ext, "db" | "sqlite" | "sqlite3"));
    if sqlite {
        Ok(Box::new(SqliteStore::open(path)?))
    } else {
        Ok(Box::new(MemoryStore::open(path)?))
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        DisplayGraph, Explorer, ExplorerError, ExplorerOptions, Granularity, MemoryStore,
        PathOptions, SchematicStore, SearchHit,
    };
}
