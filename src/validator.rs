// src/validator.rs
use crate::models::AddressType;
use crate::rows::{field, CsvRow, CsvRows};
use serde::Serialize;
use std::{fmt, io::Read};
use tracing::{info, warn};

pub const NODE_REQUIRED: [&str; 2] = ["addressId", "type"];

pub const RELATIONSHIP_REQUIRED: [&str; 8] = [
    "from_address",
    "to_address",
    "hash",
    "value",
    "gas",
    "gas_used",
    "gas_price",
    "block_number",
];

pub const RELATIONSHIP_NUMERIC: [&str; 5] =
    ["value", "gas", "gas_used", "gas_price", "block_number"];

/// Which CSV schema a file follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Node,
    Relationship,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Node => f.write_str("nodes"),
            RecordKind::Relationship => f.write_str("relationships"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<LineError>,
}

/// `0x` followed by exactly 40 hex digits, either case
pub fn is_valid_address(candidate: &str) -> bool {
    match candidate.strip_prefix("0x") {
        Some(digits) => digits.len() == 40 && hex::decode(digits).is_ok(),
        None => false,
    }
}

/// Accepts decimal integers, decimals, exponents and `0x` hex
fn is_numeric(value: &str) -> bool {
    let v = value.trim();
    if let Some(digits) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        return !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit());
    }
    if v.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return false; // rules out "nan", "inf" and friends
    }
    v.parse::<f64>().is_ok()
}

fn missing_fields(row: &CsvRow, required: &[&'static str]) -> Vec<&'static str> {
    required
        .iter()
        .copied()
        .filter(|name| field(row, name).is_none())
        .collect()
}

/// Every problem on one node row
pub fn check_node_row(row: &CsvRow) -> Vec<String> {
    let mut problems = Vec::new();

    let missing = missing_fields(row, &NODE_REQUIRED);
    if !missing.is_empty() {
        problems.push(format!("Missing required fields: {}", missing.join(", ")));
    }

    if let Some(address) = field(row, "addressId") {
        if !is_valid_address(address) {
            problems.push(format!("Invalid address format: {}", address));
        }
    }

    if let Some(kind) = field(row, "type") {
        if kind.parse::<AddressType>().is_err() {
            problems.push(format!(
                "Invalid type '{}' (must be 'eoa' or 'contract')",
                kind
            ));
        }
    }

    problems
}

/// Every problem on one relationship row
pub fn check_relationship_row(row: &CsvRow) -> Vec<String> {
    let mut problems = Vec::new();

    let missing = missing_fields(row, &RELATIONSHIP_REQUIRED);
    if !missing.is_empty() {
        problems.push(format!("Missing required fields: {}", missing.join(", ")));
    }

    for name in ["from_address", "to_address"] {
        if let Some(address) = field(row, name) {
            if !is_valid_address(address) {
                problems.push(format!("Invalid {} format: {}", name, address));
            }
        }
    }

    for name in RELATIONSHIP_NUMERIC {
        if let Some(value) = field(row, name) {
            if !is_numeric(value) {
                problems.push(format!("Invalid numeric value for {}: {}", name, value));
            }
        }
    }

    problems
}

/// Validate a whole CSV source without stopping at the first bad line.
///
/// Lines are numbered from 1 over data rows (the header is not counted).
pub fn validate<R: Read>(source: R, kind: RecordKind) -> ValidationReport {
    let mut errors = Vec::new();
    let mut line = 0usize;

    let rows = match CsvRows::new(source) {
        Ok(rows) => rows,
        Err(e) => {
            errors.push(LineError {
                line: 0,
                message: format!("File reading error: {}", e),
            });
            return ValidationReport {
                is_valid: false,
                errors,
            };
        }
    };

    for row in rows {
        line += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("Stream failure while validating {} CSV: {}", kind, e);
                errors.push(LineError {
                    line,
                    message: format!("File reading error: {}", e),
                });
                return ValidationReport {
                    is_valid: false,
                    errors,
                };
            }
        };

        let problems = match kind {
            RecordKind::Node => check_node_row(&row),
            RecordKind::Relationship => check_relationship_row(&row),
        };
        errors.extend(problems.into_iter().map(|message| LineError { line, message }));
    }

    info!(
        "Completed {} validation over {} rows. Found {} errors",
        kind,
        line,
        errors.len()
    );

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
    }
}
