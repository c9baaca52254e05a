// src/models.rs
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Kind of account behind an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    #[default]
    Eoa,
    Contract,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Eoa => "eoa",
            AddressType::Contract => "contract",
        }
    }
}

impl FromStr for AddressType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eoa" => Ok(AddressType::Eoa),
            "contract" => Ok(AddressType::Contract),
            other => Err(format!(
                "Invalid type '{}' (must be 'eoa' or 'contract')",
                other
            )),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored address node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressNode {
    pub address: String,
    #[serde(rename = "type")]
    pub kind: AddressType,
}

/// Normalized row of a node CSV, ready for upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub address: String,
    pub kind: AddressType,
}

/// Normalized row of a relationship CSV, ready for upsert
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub from_address: String,
    pub to_address: String,
    pub hash: String,
    pub value: String, // base units, kept as a decimal string
    pub input: String,
    pub transaction_index: i64,
    pub gas: i64,
    pub gas_used: i64,
    pub gas_price: i64,
    pub transaction_fee: f64,
    pub block_number: i64,
    pub block_hash: String,
    pub block_timestamp: i64,
}

/// A stored transfer projected as a transaction, oriented from -> to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionData {
    pub hash: String,
    pub value: String,
    pub from_address: String,
    pub to_address: String,
    pub gas: i64,
    pub gas_used: i64,
    pub gas_price: i64,
    pub transaction_fee: f64,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub block_hash: String,
    pub transaction_index: i64,
    pub input: String,
}

/// Full in/out history of one stored address
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalData {
    pub address: AddressNode,
    pub incoming_transactions: Vec<TransactionData>,
    pub outgoing_transactions: Vec<TransactionData>,
    pub total_incoming: String, // base units
    pub total_outgoing: String, // base units
    pub total_transactions: usize,
}

/// One-hop neighborhood around a stored address
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighborhood {
    pub node: AddressNode,
    pub outgoing: Vec<TransactionData>,
    pub out_nodes: Vec<AddressNode>,
    pub incoming: Vec<TransactionData>,
    pub in_nodes: Vec<AddressNode>,
}

/// Transaction as returned by the chain-data provider (all fields are strings)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>, // empty or null for contract creation
    pub value: String,
    pub time_stamp: String,
    pub gas: String,
    pub gas_used: String,
    pub gas_price: String,
    pub method_id: String,
    pub function_name: String,
    pub is_error: String,
}

/// Node of the visualization graph
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub val: u32, // size hint for the canvas
    pub is_center: bool,
    pub total_transactions: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_received: rust_decimal::Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_sent: rust_decimal::Decimal,
    pub x: f64,
    pub y: f64,
}

/// Edge of the visualization graph, one per transaction hash
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLink {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub val: rust_decimal::Decimal,
    pub hash: String,
    pub timestamp: String,
    pub gas_price: String,
    pub gas_used: String,
    pub method_id: String,
    pub function_name: String,
    pub curvature: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub data_source: &'static str,
    pub total_transactions: usize,
    pub unique_addresses: usize,
    pub center_address: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: rust_decimal::Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
    pub metadata: GraphMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

/// Flat row of the transaction table
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    #[serde(rename = "type")]
    pub direction: Direction,
    pub hash: String,
    pub amount: String,
    pub from: String,
    pub to: String,
    pub timestamp: String,
    pub status: TxStatus,
    pub gas_used: String, // gas cost in ETH, not gas units
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceAmount {
    pub eth: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletBalance {
    pub address: String,
    pub balance: BalanceAmount,
}
