// src/consistency.rs
use crate::rows::{field, CsvRows};
use indexmap::IndexSet;
use serde::Serialize;
use std::{collections::HashSet, io::Read};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyStats {
    pub unique_nodes_in_nodes_csv: usize,
    pub unique_addresses_in_relationships: usize,
    pub addresses_in_relationships_not_in_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub stats: ConsistencyStats,
}

/// Cross-check relationship endpoints against the declared node set.
///
/// Advisory: the loader creates missing endpoints on its own. Missing
/// addresses are reported in first-seen order.
pub fn check<N: Read, R: Read>(
    nodes: N,
    relationships: R,
) -> Result<ConsistencyReport, csv::Error> {
    let mut declared: HashSet<String> = HashSet::new();
    for row in CsvRows::new(nodes)? {
        let row = row?;
        if let Some(address) = field(&row, "addressId") {
            declared.insert(address.trim().to_lowercase());
        }
    }
    info!("Found {} unique addresses in nodes CSV", declared.len());

    let mut referenced: HashSet<String> = HashSet::new();
    let mut missing: IndexSet<String> = IndexSet::new();
    for row in CsvRows::new(relationships)? {
        let row = row?;
        for column in ["from_address", "to_address"] {
            if let Some(address) = field(&row, column) {
                let address = address.trim().to_lowercase();
                if !declared.contains(&address) {
                    missing.insert(address.clone());
                }
                referenced.insert(address);
            }
        }
    }

    let mut errors = Vec::new();
    if !missing.is_empty() {
        warn!("{} relationship addresses are not declared as nodes", missing.len());
        errors.push(format!(
            "Found {} addresses in relationships.csv that are not present in nodes.csv",
            missing.len()
        ));
    }

    Ok(ConsistencyReport {
        is_valid: missing.is_empty(),
        errors,
        stats: ConsistencyStats {
            unique_nodes_in_nodes_csv: declared.len(),
            unique_addresses_in_relationships: referenced.len(),
            addresses_in_relationships_not_in_nodes: missing.into_iter().collect(),
        },
    })
}
