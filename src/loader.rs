// src/loader.rs
use crate::db::GraphStore;
use crate::error::LoadError;
use crate::models::{AddressType, NodeRecord, TransferRecord};
use crate::rows::{field, CsvRow, CsvRows};
use crate::validator::{is_valid_address, RecordKind, NODE_REQUIRED, RELATIONSHIP_REQUIRED};
use alloy::primitives::U256;
use serde::Serialize;
use std::io::Read;
use tracing::{error, info, warn};

const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub kind: RecordKind,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub failed_rows: usize,
    pub failed_entries: Vec<RowFailure>,
    /// Nodes (or transfers) in the store once the load finished
    pub total_in_store: u64,
}

/// Whole-number field, accepting `0x` hex and integral floats like `1e9`
fn parse_int(raw: &str) -> Option<i64> {
    let v = raw.trim();
    if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Ok(n) = v.parse::<i64>() {
        return Some(n);
    }
    v.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
        .map(|f| f.trunc() as i64)
}

/// Exact base-unit amount. Accepts decimal, `0x` hex, and decimal or
/// exponent forms that still denote a whole number (`1.5e18`, `7.0`).
fn parse_base_units(raw: &str) -> Option<U256> {
    let v = raw.trim();
    if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        return U256::from_str_radix(hex, 16).ok();
    }

    let (mantissa, exponent) = match v.split_once(|c| c == 'e' || c == 'E') {
        Some((m, e)) => (m, e.parse::<i64>().ok()?),
        None => (v, 0),
    };
    let (whole, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{}{}", whole, frac);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let shift = exponent.checked_sub(frac.len() as i64)?;
    if shift >= 0 {
        let factor = U256::from(10u64).checked_pow(U256::from(shift as u64))?;
        return U256::from_str_radix(&digits, 10).ok()?.checked_mul(factor);
    }

    // negative shift: the dropped digits must all be zero
    let cut = shift.unsigned_abs() as usize;
    if cut >= digits.len() {
        return digits.chars().all(|c| c == '0').then_some(U256::ZERO);
    }
    let (kept, dropped) = digits.split_at(digits.len() - cut);
    if !dropped.chars().all(|c| c == '0') {
        return None;
    }
    U256::from_str_radix(kept, 10).ok()
}

fn required_int(row: &CsvRow, name: &str) -> Result<i64, String> {
    let raw = field(row, name).unwrap_or_default();
    parse_int(raw).ok_or_else(|| format!("Invalid integer for {}: {}", name, raw))
}

fn optional_int(row: &CsvRow, name: &str) -> i64 {
    field(row, name).and_then(parse_int).unwrap_or(0)
}

fn missing(row: &CsvRow, required: &[&str]) -> Result<(), String> {
    let absent: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| field(row, name).is_none())
        .collect();
    if absent.is_empty() {
        Ok(())
    } else {
        Err(format!("Missing required fields: {}", absent.join(", ")))
    }
}

fn base_units(row: &CsvRow, name: &str) -> Result<String, String> {
    let raw = field(row, name).unwrap_or_default();
    parse_base_units(raw)
        .map(|v| v.to_string())
        .ok_or_else(|| format!("Invalid integer for {}: {}", name, raw.trim()))
}

fn address(row: &CsvRow, name: &str) -> Result<String, String> {
    let raw = field(row, name).unwrap_or_default().trim();
    if !is_valid_address(raw) {
        return Err(format!("Invalid {} format: {}", name, raw));
    }
    Ok(raw.to_lowercase())
}

pub fn normalize_node(row: &CsvRow) -> Result<NodeRecord, String> {
    missing(row, &NODE_REQUIRED)?;

    Ok(NodeRecord {
        address: address(row, "addressId")?,
        kind: field(row, "type").unwrap_or_default().parse::<AddressType>()?,
    })
}

pub fn normalize_transfer(row: &CsvRow) -> Result<TransferRecord, String> {
    missing(row, &RELATIONSHIP_REQUIRED)?;

    Ok(TransferRecord {
        from_address: address(row, "from_address")?,
        to_address: address(row, "to_address")?,
        hash: field(row, "hash").unwrap_or_default().trim().to_string(),
        value: base_units(row, "value")?,
        input: field(row, "input").unwrap_or_default().to_string(),
        transaction_index: optional_int(row, "transaction_index"),
        gas: required_int(row, "gas")?,
        gas_used: required_int(row, "gas_used")?,
        gas_price: required_int(row, "gas_price")?,
        transaction_fee: field(row, "transaction_fee")
            .and_then(|f| f.trim().parse::<f64>().ok())
            .filter(|f| f.is_finite())
            .unwrap_or(0.0),
        block_number: required_int(row, "block_number")?,
        block_hash: field(row, "block_hash").unwrap_or_default().trim().to_string(),
        block_timestamp: optional_int(row, "block_timestamp"),
    })
}

/// Streams CSV rows into a graph store one row at a time.
pub struct BulkLoader<S> {
    store: S,
}

impl<S: GraphStore> BulkLoader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Outer error is fatal; inner error is a per-row failure message.
    fn apply(
        &self,
        row: &CsvRow,
        kind: RecordKind,
        row_no: usize,
    ) -> Result<Result<(), String>, LoadError> {
        let outcome = match kind {
            RecordKind::Node => normalize_node(row).map(|n| self.store.upsert_node(&n)),
            RecordKind::Relationship => {
                normalize_transfer(row).map(|t| self.store.upsert_transfer(&t))
            }
        };

        match outcome {
            Err(msg) => Ok(Err(msg)),
            Ok(Ok(())) => Ok(Ok(())),
            Ok(Err(e)) if !e.is_fatal() => Ok(Err(e.to_string())),
            Ok(Err(e)) => {
                error!("Fatal store error during {} upload at row {}: {}", kind, row_no, e);
                Err(LoadError::Store {
                    row: row_no,
                    source: e,
                })
            }
        }
    }

    /// Load every row of `source`. Bad rows are recorded in the summary;
    /// only stream or store failures abort the load.
    pub fn load<R: Read>(&self, source: R, kind: RecordKind) -> Result<LoadSummary, LoadError> {
        let mut summary = LoadSummary {
            kind,
            total_rows: 0,
            processed_rows: 0,
            failed_rows: 0,
            failed_entries: Vec::new(),
            total_in_store: 0,
        };

        info!("Starting to upload {}", kind);

        let rows = CsvRows::new(source).map_err(|source| LoadError::Stream { row: 0, source })?;

        for row in rows {
            summary.total_rows += 1;
            let row_no = summary.total_rows;
            let row = row.map_err(|source| {
                error!("Fatal stream error during {} upload at row {}", kind, row_no);
                LoadError::Stream {
                    row: row_no,
                    source,
                }
            })?;

            match self.apply(&row, kind, row_no)? {
                Ok(()) => {
                    summary.processed_rows += 1;
                    if summary.processed_rows % PROGRESS_EVERY == 0 {
                        info!("Processed {} {} so far...", summary.processed_rows, kind);
                    }
                }
                Err(msg) => {
                    warn!("Row {} of {} failed: {}", row_no, kind, msg);
                    summary.failed_rows += 1;
                    summary.failed_entries.push(RowFailure {
                        row: row_no,
                        error: msg,
                    });
                }
            }
        }

        summary.total_in_store = match kind {
            RecordKind::Node => self.store.count_nodes(),
            RecordKind::Relationship => self.store.count_transfers(),
        }
        .map_err(LoadError::Count)?;

        info!(
            "💾 {} upload summary: total={} processed={} failed={} in_store={}",
            kind,
            summary.total_rows,
            summary.processed_rows,
            summary.failed_rows,
            summary.total_in_store
        );

        Ok(summary)
    }
}
