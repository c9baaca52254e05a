use crate::error::StoreError;
use crate::models::{
    AddressNode, AddressType, HistoricalData, Neighborhood, NodeRecord, TransactionData,
    TransferRecord,
};
use alloy::primitives::U256;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub const SEARCH_LIMIT: usize = 10;

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS addresses (
  address TEXT PRIMARY KEY NOT NULL,
  type    TEXT NOT NULL DEFAULT 'eoa' CHECK (type IN ('eoa','contract'))
);

CREATE TABLE IF NOT EXISTS transfers (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  from_address      TEXT NOT NULL REFERENCES addresses(address),
  to_address        TEXT NOT NULL REFERENCES addresses(address),
  hash              TEXT NOT NULL,
  value             TEXT NOT NULL, -- base units stored as string
  input             TEXT NOT NULL DEFAULT '',
  transaction_index INTEGER NOT NULL DEFAULT 0,
  gas               INTEGER NOT NULL,
  gas_used          INTEGER NOT NULL,
  gas_price         INTEGER NOT NULL,
  transaction_fee   REAL NOT NULL DEFAULT 0,
  block_number      INTEGER NOT NULL,
  block_hash        TEXT NOT NULL DEFAULT '',
  block_timestamp   INTEGER NOT NULL DEFAULT 0,
  UNIQUE(from_address, to_address, hash)
);

CREATE INDEX IF NOT EXISTS transfers_hash_idx ON transfers(hash);
CREATE INDEX IF NOT EXISTS transfers_to_idx ON transfers(to_address);
"#;

const TRANSFER_COLUMNS: &str = "hash, value, from_address, to_address, gas, gas_used, gas_price, \
     transaction_fee, block_number, block_timestamp, block_hash, transaction_index, input";

/// Connect to SQLite (with WAL mode for performance)
pub fn connect(path: &str) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(StoreError::Unavailable)?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(StoreError::Unavailable)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(StoreError::Unavailable)?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(INIT_SQL).map_err(StoreError::Unavailable)?;
    Ok(())
}

/// Capabilities the ingestion and query paths need from a property graph.
///
/// Upserts are idempotent: nodes are keyed by address, transfers by
/// `(from, to, hash)`.
pub trait GraphStore {
    fn upsert_node(&self, node: &NodeRecord) -> Result<(), StoreError>;

    /// Creates missing endpoints as `eoa` before writing the edge.
    fn upsert_transfer(&self, transfer: &TransferRecord) -> Result<(), StoreError>;

    fn count_nodes(&self) -> Result<u64, StoreError>;

    fn count_transfers(&self) -> Result<u64, StoreError>;

    fn neighborhood(&self, address: &str) -> Result<Option<Neighborhood>, StoreError>;

    fn historical(&self, address: &str) -> Result<Option<HistoricalData>, StoreError>;

    fn search(&self, term: &str) -> Result<Vec<AddressNode>, StoreError>;

    fn list_addresses(&self, limit: usize) -> Result<Vec<AddressNode>, StoreError>;
}

/// SQLite-backed graph store. Clones share one connection; every call
/// holds the connection only for its own duration.
#[derive(Clone)]
pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraphStore {
    /// Wraps an already migrated connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = connect(path)?;
        run_migrations(&conn)?;
        Ok(Self::new(conn))
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        run_migrations(&conn).unwrap();
        Self::new(conn)
    }

    fn session(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn address_type(raw: &str) -> AddressType {
    AddressType::from_str(raw).unwrap_or_else(|e| {
        warn!("Stored address has unexpected type: {}", e);
        AddressType::Eoa
    })
}

fn find_node(conn: &Connection, address: &str) -> Result<Option<AddressNode>, StoreError> {
    let node = conn
        .query_row(
            "SELECT address, type FROM addresses WHERE address = ?1",
            [address],
            |r| {
                let address: String = r.get(0)?;
                let kind: String = r.get(1)?;
                Ok((address, kind))
            },
        )
        .optional()?;

    Ok(node.map(|(address, kind)| AddressNode {
        kind: address_type(&kind),
        address,
    }))
}

fn transaction_from_row(r: &Row<'_>) -> rusqlite::Result<TransactionData> {
    Ok(TransactionData {
        hash: r.get(0)?,
        value: r.get(1)?,
        from_address: r.get(2)?,
        to_address: r.get(3)?,
        gas: r.get(4)?,
        gas_used: r.get(5)?,
        gas_price: r.get(6)?,
        transaction_fee: r.get(7)?,
        block_number: r.get(8)?,
        block_timestamp: r.get(9)?,
        block_hash: r.get(10)?,
        transaction_index: r.get(11)?,
        input: r.get(12)?,
    })
}

/// Transfers touching `address` on the given side (`from_address` or `to_address`)
fn transfers_by(
    conn: &Connection,
    column: &str,
    address: &str,
) -> Result<Vec<TransactionData>, StoreError> {
    let sql = format!(
        "SELECT {} FROM transfers WHERE {} = ?1 ORDER BY block_number, id",
        TRANSFER_COLUMNS, column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([address], transaction_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Distinct counterpart nodes on the given side of `address`
fn counterparts(
    conn: &Connection,
    own_column: &str,
    other_column: &str,
    address: &str,
) -> Result<Vec<AddressNode>, StoreError> {
    let sql = format!(
        "SELECT DISTINCT a.address, a.type
         FROM transfers t JOIN addresses a ON a.address = t.{other}
         WHERE t.{own} = ?1
         ORDER BY a.address",
        other = other_column,
        own = own_column
    );
    nodes_from_rows(conn, &sql, &address)
}

/// Exact sum of base-unit values; unparseable values count as zero
fn sum_values(transfers: &[TransactionData]) -> U256 {
    transfers.iter().fold(U256::ZERO, |acc, t| {
        match U256::from_str(t.value.trim()) {
            Ok(v) => acc.saturating_add(v),
            Err(_) => {
                warn!("Skipping non-integer value {} on {}", t.value, t.hash);
                acc
            }
        }
    })
}

fn nodes_from_rows(
    conn: &Connection,
    sql: &str,
    arg: &dyn rusqlite::ToSql,
) -> Result<Vec<AddressNode>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([arg], |r| {
        let address: String = r.get(0)?;
        let kind: String = r.get(1)?;
        Ok((address, kind))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (address, kind) = row?;
        out.push(AddressNode {
            kind: address_type(&kind),
            address,
        });
    }
    Ok(out)
}

impl GraphStore for SqliteGraphStore {
    fn upsert_node(&self, node: &NodeRecord) -> Result<(), StoreError> {
        let conn = self.session()?;
        conn.execute(
            r#"
            INSERT INTO addresses (address, type)
            VALUES (?1, ?2)
            ON CONFLICT(address) DO UPDATE SET
                type = excluded.type
            "#,
            params![node.address, node.kind.as_str()],
        )?;
        Ok(())
    }

    fn upsert_transfer(&self, t: &TransferRecord) -> Result<(), StoreError> {
        let mut conn = self.session()?;
        let tx = conn.transaction()?;

        for endpoint in [&t.from_address, &t.to_address] {
            tx.execute(
                "INSERT INTO addresses (address, type) VALUES (?1, 'eoa')
                 ON CONFLICT(address) DO NOTHING",
                [endpoint],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO transfers (
                from_address, to_address, hash,
                value, input, transaction_index,
                gas, gas_used, gas_price, transaction_fee,
                block_number, block_hash, block_timestamp
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(from_address, to_address, hash) DO UPDATE SET
                value             = excluded.value,
                input             = excluded.input,
                transaction_index = excluded.transaction_index,
                gas               = excluded.gas,
                gas_used          = excluded.gas_used,
                gas_price         = excluded.gas_price,
                transaction_fee   = excluded.transaction_fee,
                block_number      = excluded.block_number,
                block_hash        = excluded.block_hash,
                block_timestamp   = excluded.block_timestamp
            "#,
            params![
                t.from_address,
                t.to_address,
                t.hash,
                t.value,
                t.input,
                t.transaction_index,
                t.gas,
                t.gas_used,
                t.gas_price,
                t.transaction_fee,
                t.block_number,
                t.block_hash,
                t.block_timestamp
            ],
        )?;

        // dropping an uncommitted transaction rolls it back
        tx.commit()?;
        Ok(())
    }

    fn count_nodes(&self) -> Result<u64, StoreError> {
        let conn = self.session()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM addresses", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    fn count_transfers(&self) -> Result<u64, StoreError> {
        let conn = self.session()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transfers", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    fn neighborhood(&self, address: &str) -> Result<Option<Neighborhood>, StoreError> {
        let address = address.to_lowercase();
        let conn = self.session()?;

        let Some(node) = find_node(&conn, &address)? else {
            debug!("No stored node for {}", address);
            return Ok(None);
        };

        Ok(Some(Neighborhood {
            node,
            outgoing: transfers_by(&conn, "from_address", &address)?,
            out_nodes: counterparts(&conn, "from_address", "to_address", &address)?,
            incoming: transfers_by(&conn, "to_address", &address)?,
            in_nodes: counterparts(&conn, "to_address", "from_address", &address)?,
        }))
    }

    fn historical(&self, address: &str) -> Result<Option<HistoricalData>, StoreError> {
        let address = address.to_lowercase();
        let conn = self.session()?;

        let Some(node) = find_node(&conn, &address)? else {
            return Ok(None);
        };

        let incoming = transfers_by(&conn, "to_address", &address)?;
        let outgoing = transfers_by(&conn, "from_address", &address)?;

        Ok(Some(HistoricalData {
            address: node,
            total_incoming: sum_values(&incoming).to_string(),
            total_outgoing: sum_values(&outgoing).to_string(),
            total_transactions: incoming.len() + outgoing.len(),
            incoming_transactions: incoming,
            outgoing_transactions: outgoing,
        }))
    }

    fn search(&self, term: &str) -> Result<Vec<AddressNode>, StoreError> {
        let term = term.trim().to_lowercase();
        let conn = self.session()?;
        nodes_from_rows(
            &conn,
            &format!(
                "SELECT address, type FROM addresses
                 WHERE instr(address, ?1) > 0
                 ORDER BY address
                 LIMIT {}",
                SEARCH_LIMIT
            ),
            &term,
        )
    }

    fn list_addresses(&self, limit: usize) -> Result<Vec<AddressNode>, StoreError> {
        let conn = self.session()?;
        nodes_from_rows(
            &conn,
            "SELECT address, type FROM addresses ORDER BY type, address LIMIT ?1",
            &(limit as i64),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    fn transfer(from: &str, to: &str, hash: &str, value: &str) -> TransferRecord {
        TransferRecord {
            from_address: from.to_string(),
            to_address: to.to_string(),
            hash: hash.to_string(),
            value: value.to_string(),
            input: String::new(),
            transaction_index: 0,
            gas: 21000,
            gas_used: 21000,
            gas_price: 50_000_000_000,
            transaction_fee: 0.00105,
            block_number: 100,
            block_hash: "0xblock".to_string(),
            block_timestamp: 1_700_000_000,
        }
    }

    fn node(address: &str, kind: AddressType) -> NodeRecord {
        NodeRecord {
            address: address.to_string(),
            kind,
        }
    }

    #[test]
    fn node_upsert_is_idempotent_and_last_write_wins() {
        let store = SqliteGraphStore::in_memory();
        store.upsert_node(&node(A, AddressType::Eoa)).unwrap();
        store.upsert_node(&node(A, AddressType::Contract)).unwrap();

        assert_eq!(store.count_nodes().unwrap(), 1);
        let found = store.search(A).unwrap();
        assert_eq!(found[0].kind, AddressType::Contract);
    }

    #[test]
    fn transfer_upsert_updates_instead_of_duplicating() {
        let store = SqliteGraphStore::in_memory();
        store.upsert_transfer(&transfer(A, B, "0xh1", "100")).unwrap();
        store.upsert_transfer(&transfer(A, B, "0xh1", "250")).unwrap();

        assert_eq!(store.count_transfers().unwrap(), 1);
        let history = store.historical(A).unwrap().unwrap();
        assert_eq!(history.outgoing_transactions.len(), 1);
        assert_eq!(history.outgoing_transactions[0].value, "250");
    }

    #[test]
    fn same_hash_between_other_pair_is_a_separate_edge() {
        let store = SqliteGraphStore::in_memory();
        store.upsert_transfer(&transfer(A, B, "0xh1", "1")).unwrap();
        store.upsert_transfer(&transfer(B, A, "0xh1", "1")).unwrap();

        assert_eq!(store.count_transfers().unwrap(), 2);
    }

    #[test]
    fn transfer_creates_missing_endpoints_as_eoa() {
        let store = SqliteGraphStore::in_memory();
        store.upsert_node(&node(A, AddressType::Contract)).unwrap();
        store.upsert_transfer(&transfer(A, B, "0xh1", "1")).unwrap();

        assert_eq!(store.count_nodes().unwrap(), 2);
        let history = store.historical(B).unwrap().unwrap();
        assert_eq!(history.address.kind, AddressType::Eoa);
        // an existing endpoint keeps its declared type
        let history = store.historical(A).unwrap().unwrap();
        assert_eq!(history.address.kind, AddressType::Contract);
    }

    #[test]
    fn historical_orients_and_totals_transfers() {
        let store = SqliteGraphStore::in_memory();
        store.upsert_transfer(&transfer(A, B, "0xh1", "1000000000000000000")).unwrap();
        store.upsert_transfer(&transfer(C, A, "0xh2", "5")).unwrap();
        store.upsert_transfer(&transfer(B, A, "0xh3", "7")).unwrap();

        let history = store.historical(&A.to_uppercase().replace("0X", "0x")).unwrap().unwrap();
        assert_eq!(history.total_transactions, 3);
        assert_eq!(history.outgoing_transactions[0].from_address, A);
        assert_eq!(history.outgoing_transactions[0].to_address, B);
        assert!(history.incoming_transactions.iter().all(|t| t.to_address == A));
        assert_eq!(history.total_incoming, "12");
        assert_eq!(history.total_outgoing, "1000000000000000000");
    }

    #[test]
    fn unknown_address_is_none_not_error() {
        let store = SqliteGraphStore::in_memory();

        assert!(store.historical(A).unwrap().is_none());
        assert!(store.neighborhood(A).unwrap().is_none());
    }

    #[test]
    fn neighborhood_collects_both_directions() {
        let store = SqliteGraphStore::in_memory();
        store.upsert_transfer(&transfer(A, B, "0xh1", "1")).unwrap();
        store.upsert_transfer(&transfer(A, B, "0xh2", "1")).unwrap();
        store.upsert_transfer(&transfer(C, A, "0xh3", "1")).unwrap();

        let hood = store.neighborhood(A).unwrap().unwrap();
        assert_eq!(hood.outgoing.len(), 2);
        assert_eq!(hood.out_nodes.len(), 1);
        assert_eq!(hood.out_nodes[0].address, B);
        assert_eq!(hood.incoming.len(), 1);
        assert_eq!(hood.in_nodes[0].address, C);
    }

    #[test]
    fn search_is_case_insensitive_and_bounded() {
        let store = SqliteGraphStore::in_memory();
        for i in 0..15 {
            let address = format!("0xabc{:037x}", i);
            store.upsert_node(&node(&address, AddressType::Eoa)).unwrap();
        }
        store.upsert_node(&node(B, AddressType::Eoa)).unwrap();

        let found = store.search("0xABC").unwrap();
        assert_eq!(found.len(), SEARCH_LIMIT);
        assert!(found.iter().all(|n| n.address.starts_with("0xabc")));
        assert!(store.search("zzz").unwrap().is_empty());
    }

    #[test]
    fn list_addresses_orders_by_type_then_address() {
        let store = SqliteGraphStore::in_memory();
        store.upsert_node(&node(C, AddressType::Eoa)).unwrap();
        store.upsert_node(&node(B, AddressType::Contract)).unwrap();
        store.upsert_node(&node(A, AddressType::Eoa)).unwrap();

        let listed: Vec<String> = store
            .list_addresses(10)
            .unwrap()
            .into_iter()
            .map(|n| n.address)
            .collect();
        assert_eq!(listed, vec![B.to_string(), A.to_string(), C.to_string()]);
    }
}
