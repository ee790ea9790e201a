//! SQLite Schematic Store
//!
//! One row per entity, containment as foreign keys, `CONNECTS` and `MAPS_TO`
//! as link tables. The connection is shared behind a mutex.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::snapshot::DesignSnapshot;
use super::{SchematicStore, StoreError, StoreResult};
use crate::model::{
    Design, EdgeKind, Entity, EntityRef, Neighbor, Net, Part, Pin, PinKey, SchematicNode,
};

/// Pin columns with their containment chain: node, part, pin, friendly name
const PIN_SELECT: &str = "SELECT n.name, pa.name, p.name, p.friendly_name
    FROM pins p
    JOIN nodes n ON n.id = p.node_id
    JOIN parts pa ON pa.id = n.part_id
    JOIN designs d ON d.id = n.design_id";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        tracing::info!("Opened schematic database at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let store = SqliteStore {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    pub fn initialize(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS designs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS parts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                design_id INTEGER NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                UNIQUE(design_id, name)
            );

            CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                design_id INTEGER NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
                part_id INTEGER NOT NULL REFERENCES parts(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                UNIQUE(design_id, name)
            );

            CREATE TABLE IF NOT EXISTS pins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                friendly_name TEXT,
                UNIQUE(node_id, name)
            );

            CREATE TABLE IF NOT EXISTS nets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                design_id INTEGER NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                UNIQUE(design_id, name)
            );

            CREATE TABLE IF NOT EXISTS net_pins (
                net_id INTEGER NOT NULL REFERENCES nets(id) ON DELETE CASCADE,
                pin_id INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
                PRIMARY KEY (net_id, pin_id)
            );

            CREATE TABLE IF NOT EXISTS pin_maps (
                from_pin INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
                to_pin INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
                PRIMARY KEY (from_pin, to_pin)
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_part ON nodes(part_id);
            CREATE INDEX IF NOT EXISTS idx_net_pins_pin ON net_pins(pin_id);
            CREATE INDEX IF NOT EXISTS idx_pin_maps_to ON pin_maps(to_pin);",
        )?;
        Ok(())
    }

    /// Validate a design snapshot and write it in one transaction.
    pub fn import_snapshot(&self, snapshot: &DesignSnapshot) -> StoreResult<()> {
        let records = snapshot.to_records()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM designs WHERE name = ?1",
                params![records.design.name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::InvalidData(format!(
                "design {} is already stored",
                records.design.name
            )));
        }

        tx.execute(
            "INSERT INTO designs (name) VALUES (?1)",
            params![records.design.name],
        )?;
        let design_id = tx.last_insert_rowid();

        let mut part_ids = HashMap::new();
        for part in &records.parts {
            tx.execute(
                "INSERT INTO parts (design_id, name) VALUES (?1, ?2)",
                params![design_id, part.name],
            )?;
            part_ids.insert(part.name.as_str(), tx.last_insert_rowid());
        }

        let mut node_ids = HashMap::new();
        for node in &records.nodes {
            let part_id = part_ids.get(node.part.as_str()).copied().ok_or_else(|| {
                StoreError::InvalidData(format!("node {} has no part", node.name))
            })?;
            tx.execute(
                "INSERT INTO nodes (design_id, part_id, name) VALUES (?1, ?2, ?3)",
                params![design_id, part_id, node.name],
            )?;
            node_ids.insert(node.name.as_str(), tx.last_insert_rowid());
        }

        let mut pin_ids = HashMap::new();
        for pin in &records.pins {
            let node_id = node_ids.get(pin.node.as_str()).copied().ok_or_else(|| {
                StoreError::InvalidData(format!("pin {} has no node", pin.display_name()))
            })?;
            tx.execute(
                "INSERT INTO pins (node_id, name, friendly_name) VALUES (?1, ?2, ?3)",
                params![node_id, pin.name, pin.friendly_name],
            )?;
            pin_ids.insert(pin.key(), tx.last_insert_rowid());
        }

        let mut net_ids = HashMap::new();
        for net in &records.nets {
            tx.execute(
                "INSERT INTO nets (design_id, name) VALUES (?1, ?2)",
                params![design_id, net.name],
            )?;
            net_ids.insert(net.name.as_str(), tx.last_insert_rowid());
        }

        for (net, pin) in &records.connections {
            if let (Some(net_id), Some(pin_id)) = (net_ids.get(net.as_str()), pin_ids.get(pin)) {
                tx.execute(
                    "INSERT OR IGNORE INTO net_pins (net_id, pin_id) VALUES (?1, ?2)",
                    params![net_id, pin_id],
                )?;
            }
        }

        for (from, to) in &records.mappings {
            if let (Some(from_id), Some(to_id)) = (pin_ids.get(from), pin_ids.get(to)) {
                tx.execute(
                    "INSERT OR IGNORE INTO pin_maps (from_pin, to_pin) VALUES (?1, ?2)",
                    params![from_id, to_id],
                )?;
            }
        }

        tx.commit()?;
        tracing::info!(
            "Imported design {} ({} nodes, {} pins, {} nets)",
            records.design.name,
            records.nodes.len(),
            records.pins.len(),
            records.nets.len()
        );
        Ok(())
    }
}

fn pin_from_row(row: &Row<'_>) -> rusqlite::Result<Pin> {
    Ok(Pin {
        node: row.get(0)?,
        part: row.get(1)?,
        name: row.get(2)?,
        friendly_name: row.get(3)?,
    })
}

fn query_pins<P: rusqlite::Params>(
    conn: &Connection,
    clause: &str,
    params: P,
) -> StoreResult<Vec<Pin>> {
    let sql = format!("{} {}", PIN_SELECT, clause);
    let mut stmt = conn.prepare(&sql)?;
    let pins = stmt
        .query_map(params, pin_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(pins)
}

fn query_names<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

fn query_name<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<Option<String>> {
    Ok(conn.query_row(sql, params, |row| row.get(0)).optional()?)
}

fn neighbor(edge: EdgeKind, entity: Entity) -> Neighbor {
    Neighbor { edge, entity }
}

impl SchematicStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn designs(&self) -> StoreResult<Vec<Design>> {
        let conn = self.conn()?;
        let names = query_names(&conn, "SELECT name FROM designs ORDER BY name", [])?;
        Ok(names.into_iter().map(|name| Design { name }).collect())
    }

    fn design(&self, name: &str) -> StoreResult<Option<Design>> {
        let conn = self.conn()?;
        let found = query_name(
            &conn,
            "SELECT name FROM designs WHERE name = ?1",
            params![name],
        )?;
        Ok(found.map(|name| Design { name }))
    }

    fn part(&self, design: &str, name: &str) -> StoreResult<Option<Part>> {
        let conn = self.conn()?;
        let found = query_name(
            &conn,
            "SELECT pa.name FROM parts pa JOIN designs d ON d.id = pa.design_id
             WHERE d.name = ?1 AND pa.name = ?2",
            params![design, name],
        )?;
        Ok(found.map(|name| Part { name }))
    }

    fn node(&self, design: &str, name: &str) -> StoreResult<Option<SchematicNode>> {
        let conn = self.conn()?;
        let found = query_name(
            &conn,
            "SELECT pa.name FROM nodes n
             JOIN parts pa ON pa.id = n.part_id
             JOIN designs d ON d.id = n.design_id
             WHERE d.name = ?1 AND n.name = ?2",
            params![design, name],
        )?;
        Ok(found.map(|part| SchematicNode {
            name: name.to_string(),
            part,
        }))
    }

    fn pins_of(&self, design: &str, node: &str) -> StoreResult<Vec<Pin>> {
        let conn = self.conn()?;
        query_pins(
            &conn,
            "WHERE d.name = ?1 AND n.name = ?2 ORDER BY p.name",
            params![design, node],
        )
    }

    fn pin(&self, design: &str, key: &PinKey) -> StoreResult<Option<Pin>> {
        let conn = self.conn()?;
        let sql = format!("{} WHERE d.name = ?1 AND n.name = ?2 AND p.name = ?3", PIN_SELECT);
        Ok(conn
            .query_row(&sql, params![design, key.node, key.pin], pin_from_row)
            .optional()?)
    }

    fn net(&self, design: &str, name: &str) -> StoreResult<Option<Net>> {
        let conn = self.conn()?;
        let found = query_name(
            &conn,
            "SELECT ne.name FROM nets ne JOIN designs d ON d.id = ne.design_id
             WHERE d.name = ?1 AND ne.name = ?2",
            params![design, name],
        )?;
        Ok(found.map(|name| Net { name }))
    }

    fn neighbors(
        &self,
        design: &str,
        entity: &EntityRef,
        kinds: &[EdgeKind],
    ) -> StoreResult<Vec<Neighbor>> {
        let conn = self.conn()?;
        let wants = |kind: EdgeKind| kinds.contains(&kind);
        let mut found = Vec::new();

        match entity {
            EntityRef::Design(_) => {
                if wants(EdgeKind::Contains) {
                    for name in query_names(
                        &conn,
                        "SELECT pa.name FROM parts pa JOIN designs d ON d.id = pa.design_id
                         WHERE d.name = ?1",
                        params![design],
                    )? {
                        found.push(neighbor(EdgeKind::Contains, Entity::Part(Part { name })));
                    }
                    for name in query_names(
                        &conn,
                        "SELECT ne.name FROM nets ne JOIN designs d ON d.id = ne.design_id
                         WHERE d.name = ?1",
                        params![design],
                    )? {
                        found.push(neighbor(EdgeKind::Contains, Entity::Net(Net { name })));
                    }
                }
            }
            EntityRef::Part(part) => {
                if wants(EdgeKind::Contains) {
                    let owner = query_name(
                        &conn,
                        "SELECT d.name FROM parts pa JOIN designs d ON d.id = pa.design_id
                         WHERE d.name = ?1 AND pa.name = ?2",
                        params![design, part],
                    )?;
                    if let Some(name) = owner {
                        found.push(neighbor(EdgeKind::Contains, Entity::Design(Design { name })));
                    }
                    for name in query_names(
                        &conn,
                        "SELECT n.name FROM nodes n
                         JOIN parts pa ON pa.id = n.part_id
                         JOIN designs d ON d.id = n.design_id
                         WHERE d.name = ?1 AND pa.name = ?2",
                        params![design, part],
                    )? {
                        let node = SchematicNode {
                            name,
                            part: part.clone(),
                        };
                        found.push(neighbor(EdgeKind::Contains, Entity::Node(node)));
                    }
                }
            }
            EntityRef::Node(node) => {
                if wants(EdgeKind::Contains) {
                    let part = query_name(
                        &conn,
                        "SELECT pa.name FROM nodes n
                         JOIN parts pa ON pa.id = n.part_id
                         JOIN designs d ON d.id = n.design_id
                         WHERE d.name = ?1 AND n.name = ?2",
                        params![design, node],
                    )?;
                    if let Some(name) = part {
                        found.push(neighbor(EdgeKind::Contains, Entity::Part(Part { name })));
                    }
                    for pin in query_pins(
                        &conn,
                        "WHERE d.name = ?1 AND n.name = ?2",
                        params![design, node],
                    )? {
                        found.push(neighbor(EdgeKind::Contains, Entity::Pin(pin)));
                    }
                }
            }
            EntityRef::Pin(key) => {
                if wants(EdgeKind::Contains) {
                    let sql = format!(
                        "{} WHERE d.name = ?1 AND n.name = ?2 AND p.name = ?3",
                        PIN_SELECT
                    );
                    let pin = conn
                        .query_row(&sql, params![design, key.node, key.pin], pin_from_row)
                        .optional()?;
                    if let Some(pin) = pin {
                        found.push(neighbor(EdgeKind::Contains, Entity::Node(pin.owner())));
                    }
                }
                if wants(EdgeKind::Connects) {
                    for name in query_names(
                        &conn,
                        "SELECT ne.name FROM nets ne
                         JOIN net_pins np ON np.net_id = ne.id
                         JOIN pins p ON p.id = np.pin_id
                         JOIN nodes n ON n.id = p.node_id
                         JOIN designs d ON d.id = ne.design_id
                         WHERE d.name = ?1 AND n.name = ?2 AND p.name = ?3",
                        params![design, key.node, key.pin],
                    )? {
                        found.push(neighbor(EdgeKind::Connects, Entity::Net(Net { name })));
                    }
                }
                if wants(EdgeKind::MapsTo) {
                    for pin in query_pins(
                        &conn,
                        "JOIN pin_maps m ON p.id IN (m.from_pin, m.to_pin)
                         JOIN pins s ON s.id IN (m.from_pin, m.to_pin) AND s.id <> p.id
                         WHERE d.name = ?1 AND n.name = ?2 AND s.name = ?3 AND s.node_id = n.id",
                        params![design, key.node, key.pin],
                    )? {
                        found.push(neighbor(EdgeKind::MapsTo, Entity::Pin(pin)));
                    }
                }
            }
            EntityRef::Net(net) => {
                if wants(EdgeKind::Contains) {
                    let owner = query_name(
                        &conn,
                        "SELECT d.name FROM nets ne JOIN designs d ON d.id = ne.design_id
                         WHERE d.name = ?1 AND ne.name = ?2",
                        params![design, net],
                    )?;
                    if let Some(name) = owner {
                        found.push(neighbor(EdgeKind::Contains, Entity::Design(Design { name })));
                    }
                }
                if wants(EdgeKind::Connects) {
                    for pin in query_pins(
                        &conn,
                        "JOIN net_pins np ON np.pin_id = p.id
                         JOIN nets ne ON ne.id = np.net_id
                         WHERE d.name = ?1 AND ne.name = ?2",
                        params![design, net],
                    )? {
                        found.push(neighbor(EdgeKind::Connects, Entity::Pin(pin)));
                    }
                }
            }
        }

        Ok(found)
    }

    fn scan_nets(&self, design: &str, prefix: &str, limit: usize) -> StoreResult<Vec<Net>> {
        let conn = self.conn()?;
        let names = query_names(
            &conn,
            "SELECT ne.name FROM nets ne JOIN designs d ON d.id = ne.design_id
             WHERE d.name = ?1 AND substr(ne.name, 1, length(?2)) = ?2
             ORDER BY ne.name LIMIT ?3",
            params![design, prefix, limit as i64],
        )?;
        Ok(names.into_iter().map(|name| Net { name }).collect())
    }

    fn scan_nodes(
        &self,
        design: &str,
        prefix: &str,
        limit: usize,
    ) -> StoreResult<Vec<SchematicNode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT n.name, pa.name FROM nodes n
             JOIN parts pa ON pa.id = n.part_id
             JOIN designs d ON d.id = n.design_id
             WHERE d.name = ?1 AND substr(n.name, 1, length(?2)) = ?2
             ORDER BY n.name LIMIT ?3",
        )?;
        let nodes = stmt
            .query_map(params![design, prefix, limit as i64], |row| {
                Ok(SchematicNode {
                    name: row.get(0)?,
                    part: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    fn scan_pins(
        &self,
        design: &str,
        node_prefix: &str,
        pin_prefix: &str,
        limit: usize,
    ) -> StoreResult<Vec<Pin>> {
        let conn = self.conn()?;
        query_pins(
            &conn,
            "WHERE d.name = ?1
               AND substr(n.name, 1, length(?2)) = ?2
               AND substr(p.name, 1, length(?3)) = ?3
             ORDER BY n.name || '.' || p.name LIMIT ?4",
            params![design, node_prefix, pin_prefix, limit as i64],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SnapshotFile;
    use tempfile::tempdir;

    const BOARD: &str = r#"{
        "designs": [{
            "name": "board1",
            "parts": [
                { "name": "IC1", "nodes": [{ "name": "U1", "pins": [{ "name": "1", "friendlyName": "GND" }, { "name": "2" }] }] },
                { "name": "IC10", "nodes": [{ "name": "U10", "pins": [{ "name": "1" }] }] }
            ],
            "nets": [
                { "name": "GND", "pins": ["U1.1", "U10.1"] },
                { "name": "GPIO", "pins": [] }
            ],
            "mappings": [{ "from": "U1.2", "to": "U1.1" }]
        }]
    }"#;

    fn create_test_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for design in SnapshotFile::from_json(BOARD).unwrap().designs {
            store.import_snapshot(&design).unwrap();
        }
        store
    }

    #[test]
    fn test_lookups() {
        let store = create_test_store();
        assert_eq!(store.designs().unwrap().len(), 1);
        assert!(store.design("BOARD1").unwrap().is_some());
        assert!(store.design("board1").unwrap().is_none());
        assert_eq!(store.node("BOARD1", "U10").unwrap().unwrap().part, "IC10");
        assert_eq!(store.part("BOARD1", "IC1").unwrap().unwrap().name, "IC1");
        let pin = store
            .pin("BOARD1", &PinKey::new("U1", "1"))
            .unwrap()
            .unwrap();
        assert_eq!(pin.friendly_name.as_deref(), Some("GND"));
        assert!(store.net("BOARD1", "VCC").unwrap().is_none());
    }

    #[test]
    fn test_neighbors_match_memory_semantics() {
        let store = create_test_store();
        let pin = EntityRef::Pin(PinKey::new("U1", "1"));

        let nets = store.nets_of_pin("BOARD1", &PinKey::new("U1", "1")).unwrap();
        assert_eq!(nets, vec![Net { name: "GND".into() }]);

        // mapping stored as U1.2 -> U1.1 is visible from both ends
        let mapped = store.neighbors("BOARD1", &pin, &[EdgeKind::MapsTo]).unwrap();
        assert_eq!(mapped.len(), 1);
        assert_eq!(
            mapped[0].entity.reference(),
            EntityRef::Pin(PinKey::new("U1", "2"))
        );

        let owner = store.neighbors("BOARD1", &pin, &[EdgeKind::Contains]).unwrap();
        assert_eq!(owner[0].entity.reference(), EntityRef::Node("U1".into()));

        let pins = store.pins_on_net("BOARD1", "GND").unwrap();
        assert_eq!(pins.len(), 2);
        assert_eq!(pins[1].part, "IC10");
    }

    #[test]
    fn test_prefix_scans() {
        let store = create_test_store();
        let nets: Vec<String> = store
            .scan_nets("BOARD1", "G", 10)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(nets, vec!["GND", "GPIO"]);
        assert_eq!(store.scan_nets("BOARD1", "G", 1).unwrap().len(), 1);

        let pins: Vec<String> = store
            .scan_pins("BOARD1", "U1", "", 10)
            .unwrap()
            .iter()
            .map(|p| p.display_name())
            .collect();
        assert_eq!(pins, vec!["U1.1", "U1.2", "U10.1"]);
    }

    #[test]
    fn test_duplicate_import_rejected() {
        let store = create_test_store();
        let design = SnapshotFile::from_json(BOARD).unwrap().designs.remove(0);
        assert!(matches!(
            store.import_snapshot(&design),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_persists_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("board.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            for design in SnapshotFile::from_json(BOARD).unwrap().designs {
                store.import_snapshot(&design).unwrap();
            }
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.pins_of("BOARD1", "U1").unwrap().len(), 2);
    }
}
