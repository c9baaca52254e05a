// src/transform.rs
use crate::models::{
    BalanceAmount, Direction, GraphData, GraphLink, GraphMetadata, GraphNode, RawTransaction,
    TableRow, TxStatus, WalletBalance,
};
use alloy::primitives::U256;
use chrono::DateTime;
use indexmap::IndexMap;
use rust_decimal::prelude::*;
use tracing::{debug, warn};

/// Decimal places between base units (wei) and display units (ETH)
pub const BASE_UNIT_DECIMALS: u32 = 18;
/// Decimal places kept in display strings
pub const DISPLAY_DECIMALS: u32 = 6;
/// Spacing between parallel links on the canvas
pub const CURVATURE_STEP: f64 = 0.05;

const CENTER_NODE_SIZE: u32 = 4;
const NODE_SIZE: u32 = 2;
const DATA_SOURCE: &str = "etherscan";

/// Base units -> display units. Exact while the value fits a `Decimal`
/// mantissa, six places beyond that. Unparseable values become zero.
pub fn to_display_units(raw: &str) -> Decimal {
    let raw = raw.trim();
    if raw.is_empty() {
        return Decimal::ZERO;
    }
    raw.parse::<i128>()
        .ok()
        .and_then(|wei| Decimal::try_from_i128_with_scale(wei, BASE_UNIT_DECIMALS).ok())
        .or_else(|| {
            parse_u256(raw).and_then(|wei| Decimal::from_str(&format_base_units(wei)).ok())
        })
        .map(|d| d.normalize())
        .unwrap_or_else(|| {
            warn!("Cannot scale value {:?}, counting it as zero", raw);
            Decimal::ZERO
        })
}

fn render_micros(micros: U256) -> String {
    let display = U256::from(10u64.pow(DISPLAY_DECIMALS));
    format!(
        "{}.{:0>width$}",
        micros / display,
        (micros % display).to_string(),
        width = DISPLAY_DECIMALS as usize
    )
}

/// `base_units * 10^6 / 10^18` in integer arithmetic, rendered with 6 places
pub fn format_base_units(base_units: U256) -> String {
    let scale = U256::from(10u64.pow(BASE_UNIT_DECIMALS));
    let display = U256::from(10u64.pow(DISPLAY_DECIMALS));

    render_micros(base_units.saturating_mul(display) / scale)
}

/// Like `format_base_units`, rounding half up at the sixth place
fn format_amount(base_units: U256) -> String {
    let scale = U256::from(10u64.pow(BASE_UNIT_DECIMALS));
    let display = U256::from(10u64.pow(DISPLAY_DECIMALS));
    let half = scale / U256::from(2u64);

    render_micros(base_units.saturating_mul(display).saturating_add(half) / scale)
}

fn parse_u256(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<U256>().ok()
}

/// Gas cost `gas_used * gas_price` in ETH, never through floating point
pub fn gas_cost(gas_used: &str, gas_price: &str) -> String {
    let used = parse_u256(gas_used).unwrap_or_default();
    let price = parse_u256(gas_price).unwrap_or_default();
    format_base_units(used.saturating_mul(price))
}

fn format_timestamp(unix_secs: &str) -> String {
    unix_secs
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix_secs.to_string())
}

fn blank_node(address: &str, is_center: bool) -> GraphNode {
    GraphNode {
        id: address.to_string(),
        val: if is_center { CENTER_NODE_SIZE } else { NODE_SIZE },
        is_center,
        total_transactions: 0,
        total_received: Decimal::ZERO,
        total_sent: Decimal::ZERO,
        x: 0.0,
        y: 0.0,
    }
}

/// Build the visualization graph for `center_address`.
///
/// The center is always present. Links are keyed by hash: a repeated hash
/// replaces the earlier link but keeps its position. Node statistics count
/// every processed transaction.
pub fn transform_to_graph_data(
    transactions: &[RawTransaction],
    center_address: &str,
) -> GraphData {
    let center = center_address.to_lowercase();
    let mut nodes: IndexMap<String, GraphNode> = IndexMap::new();
    let mut links: IndexMap<String, GraphLink> = IndexMap::new();

    nodes.insert(center.clone(), blank_node(&center, true));

    for tx in transactions {
        let to = match tx.to.as_deref().map(str::trim) {
            Some(to) if !to.is_empty() => to.to_lowercase(),
            _ => {
                debug!("Skipping {} without recipient", tx.hash);
                continue;
            }
        };
        let from = tx.from.trim().to_lowercase();
        let value = to_display_units(&tx.value);

        nodes
            .entry(from.clone())
            .or_insert_with(|| blank_node(&from, false));
        nodes
            .entry(to.clone())
            .or_insert_with(|| blank_node(&to, false));

        links.insert(
            tx.hash.clone(),
            GraphLink {
                id: tx.hash.clone(),
                source: from.clone(),
                target: to.clone(),
                val: value,
                hash: tx.hash.clone(),
                timestamp: tx.time_stamp.clone(),
                gas_price: tx.gas_price.clone(),
                gas_used: tx.gas_used.clone(),
                method_id: tx.method_id.clone(),
                function_name: tx.function_name.clone(),
                curvature: 0.0,
            },
        );

        if let Some(node) = nodes.get_mut(&from) {
            node.total_transactions += 1;
            node.total_sent += value;
        }
        if let Some(node) = nodes.get_mut(&to) {
            node.total_transactions += 1;
            node.total_received += value;
        }
    }

    let link_count = links.len();
    let links: Vec<GraphLink> = links
        .into_values()
        .enumerate()
        .map(|(index, mut link)| {
            link.curvature = (index as f64 - link_count as f64 / 2.0) * CURVATURE_STEP;
            link
        })
        .collect();
    let nodes: Vec<GraphNode> = nodes.into_values().collect();

    let total_value = links.iter().map(|l| l.val).sum::<Decimal>();

    GraphData {
        metadata: GraphMetadata {
            data_source: DATA_SOURCE,
            total_transactions: links.len(),
            unique_addresses: nodes.len(),
            center_address: center,
            total_value,
        },
        nodes,
        links,
    }
}

/// One table row per transaction, in input order
pub fn transform_to_table_data(
    transactions: &[RawTransaction],
    center_address: &str,
) -> Vec<TableRow> {
    let center = center_address.to_lowercase();

    transactions
        .iter()
        .map(|tx| {
            let from = tx.from.trim().to_lowercase();
            let direction = if from == center {
                Direction::Outgoing
            } else {
                Direction::Incoming
            };

            TableRow {
                direction,
                hash: tx.hash.clone(),
                amount: format!("{} ETH", format_amount(parse_u256(&tx.value).unwrap_or_default())),
                to: tx.to.as_deref().unwrap_or_default().trim().to_lowercase(),
                from,
                timestamp: format_timestamp(&tx.time_stamp),
                status: if tx.is_error == "0" {
                    TxStatus::Success
                } else {
                    TxStatus::Failed
                },
                gas_used: format!("{} ETH", gas_cost(&tx.gas_used, &tx.gas_price)),
            }
        })
        .collect()
}

/// Raw base-unit balance -> display balance. Empty or malformed input is zero.
pub fn transform_to_wallet_balance(address: &str, raw_balance: Option<&str>) -> WalletBalance {
    let base_units = match raw_balance.map(str::trim).filter(|b| !b.is_empty()) {
        Some(raw) => parse_u256(raw).unwrap_or_else(|| {
            warn!("Malformed balance {:?} for {}", raw, address);
            U256::ZERO
        }),
        None => U256::ZERO,
    };

    WalletBalance {
        address: address.to_string(),
        balance: BalanceAmount {
            eth: format_base_units(base_units),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOCAL: &str = "0xAbCdEf0000000000000000000000000000000001";
    const OTHER: &str = "0x2222222222222222222222222222222222222222";
    const THIRD: &str = "0x3333333333333333333333333333333333333333";

    fn tx(hash: &str, from: &str, to: &str, value: &str) -> RawTransaction {
        RawTransaction {
            hash: hash.to_string(),
            from: from.to_string(),
            to: Some(to.to_string()),
            value: value.to_string(),
            time_stamp: "1700000000".to_string(),
            gas: "21000".to_string(),
            gas_used: "21000".to_string(),
            gas_price: "50000000000".to_string(),
            is_error: "0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_input_yields_only_the_center() {
        let graph = transform_to_graph_data(&[], FOCAL);

        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.nodes[0].is_center);
        assert_eq!(graph.nodes[0].id, FOCAL.to_lowercase());
        assert!(graph.links.is_empty());
        assert_eq!(graph.metadata.unique_addresses, 1);
        assert_eq!(graph.metadata.total_value, Decimal::ZERO);
    }

    #[test]
    fn statistics_accumulate_per_node() {
        let txs = vec![
            tx("0x01", FOCAL, OTHER, "1000000000000000000"),
            tx("0x02", OTHER, FOCAL, "500000000000000000"),
            tx("0x03", OTHER, THIRD, "250000000000000000"),
        ];
        let graph = transform_to_graph_data(&txs, FOCAL);

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes.iter().filter(|n| n.is_center).count(), 1);

        let other = graph.nodes.iter().find(|n| n.id == OTHER).unwrap();
        assert_eq!(other.total_transactions, 3);
        assert_eq!(other.total_received, Decimal::ONE);
        assert_eq!(other.total_sent, Decimal::from_str("0.75").unwrap());

        assert_eq!(graph.metadata.total_transactions, 3);
        assert_eq!(graph.metadata.total_value, Decimal::from_str("1.75").unwrap());
        assert_eq!(graph.metadata.center_address, FOCAL.to_lowercase());
    }

    #[test]
    fn repeated_hash_keeps_one_link_with_latest_data() {
        let txs = vec![
            tx("0x01", FOCAL, OTHER, "1"),
            tx("0x02", FOCAL, THIRD, "1"),
            tx("0x01", FOCAL, OTHER, "3000000000000000000"),
        ];
        let graph = transform_to_graph_data(&txs, FOCAL);

        assert_eq!(graph.links.len(), 2);
        assert_eq!(graph.links[0].hash, "0x01");
        assert_eq!(graph.links[0].val, Decimal::from(3));
    }

    #[test]
    fn missing_recipient_is_skipped() {
        let mut creation = tx("0x09", FOCAL, "", "0");
        creation.to = None;
        let txs = vec![creation, tx("0x0a", FOCAL, " ", "0")];
        let graph = transform_to_graph_data(&txs, FOCAL);

        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.links.is_empty());
        assert_eq!(graph.nodes[0].total_transactions, 0);
    }

    #[test]
    fn curvature_spreads_links_around_zero() {
        let txs: Vec<RawTransaction> = (0..4)
            .map(|i| tx(&format!("0x{:02}", i), FOCAL, OTHER, "1"))
            .collect();
        let graph = transform_to_graph_data(&txs, FOCAL);

        let curvatures: Vec<f64> = graph.links.iter().map(|l| l.curvature).collect();
        let expected = [-0.1, -0.05, 0.0, 0.05];
        for (got, want) in curvatures.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{} != {}", got, want);
        }
    }

    #[test]
    fn direction_ignores_address_case() {
        let txs = vec![
            tx("0x01", &FOCAL.to_uppercase().replace("0X", "0x"), OTHER, "0"),
            tx("0x02", OTHER, &FOCAL.to_lowercase(), "0"),
        ];
        let rows = transform_to_table_data(&txs, FOCAL);

        assert_eq!(rows[0].direction, Direction::Outgoing);
        assert_eq!(rows[1].direction, Direction::Incoming);
    }

    #[test]
    fn table_row_formatting() {
        let mut failed = tx("0x02", OTHER, FOCAL, "1234567890123456789");
        failed.is_error = "1".to_string();
        let rows = transform_to_table_data(&[failed], FOCAL);

        let row = &rows[0];
        assert_eq!(row.amount, "1.234568 ETH");
        assert_eq!(row.gas_used, "0.001050 ETH");
        assert_eq!(row.timestamp, "2023-11-14 22:13:20 UTC");
        assert_eq!(row.status, TxStatus::Failed);
        assert_eq!(row.to, FOCAL.to_lowercase());
    }

    #[test]
    fn amounts_beyond_decimal_range_are_kept() {
        // 10^29 wei does not fit a 96-bit Decimal mantissa at scale 18
        let whale = tx("0x0b", OTHER, FOCAL, "100000000000000000000000000000");
        let rows = transform_to_table_data(std::slice::from_ref(&whale), FOCAL);
        assert_eq!(rows[0].amount, "100000000000.000000 ETH");

        let graph = transform_to_graph_data(&[whale], FOCAL);
        assert_eq!(graph.links[0].val, Decimal::from(100_000_000_000u64));
        assert_eq!(graph.metadata.total_value, Decimal::from(100_000_000_000u64));
    }

    #[test]
    fn gas_cost_uses_integer_math() {
        assert_eq!(gas_cost("21000", "50000000000"), "0.001050");
        assert_eq!(gas_cost("", "50000000000"), "0.000000");
        // far beyond f64's exact integer range
        assert_eq!(
            gas_cost("30000000", "1000000000000000000000"),
            "30000000000.000000"
        );
    }

    #[test]
    fn balance_formatting() {
        let one = transform_to_wallet_balance(OTHER, Some("1000000000000000000"));
        assert_eq!(one.balance.eth, "1.000000");
        assert_eq!(one.address, OTHER);

        assert_eq!(transform_to_wallet_balance(OTHER, Some("")).balance.eth, "0.000000");
        assert_eq!(transform_to_wallet_balance(OTHER, None).balance.eth, "0.000000");
        assert_eq!(
            transform_to_wallet_balance(OTHER, Some("123456789")).balance.eth,
            "0.000000"
        );
        assert_eq!(
            transform_to_wallet_balance(OTHER, Some("98765432109876543210")).balance.eth,
            "98.765432"
        );
    }
}
