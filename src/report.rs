//! One-shot, best-effort snapshot of order state and quality.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::SubstrateError;
use crate::substrate::{Substrate, keys};

/// Point-in-time aggregation of the order tables.
///
/// Per-order quality reads are separate substrate operations with no
/// cross-key atomicity, so a report taken while the kitchen is active may
/// observe a torn view (an order's state ahead of its quality map, or the
/// reverse). Building a report never mutates shared state; on a quiescent
/// system two consecutive builds are identical.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// Inverse grouping: pipeline state to the sorted order ids waiting there.
    pub orders_by_state: BTreeMap<String, Vec<u64>>,
    /// Each order's current state.
    pub state_by_order: BTreeMap<u64, String>,
    /// Each order's recorded quality scores, by operation name.
    pub quality_by_order: BTreeMap<u64, BTreeMap<String, f64>>,
}

impl Report {
    /// Read the order-state table and every order's quality map.
    pub async fn build(substrate: &dyn Substrate) -> Result<Self, SubstrateError> {
        let mut report = Report::default();

        let states = substrate.hash_get_all(keys::ORDER_STATE_TABLE).await?;
        for (raw_id, state) in states {
            let order_id = keys::decode_id(&raw_id)?;
            report
                .orders_by_state
                .entry(state.clone())
                .or_default()
                .push(order_id);
            report.state_by_order.insert(order_id, state);

            let quality = substrate.hash_get_all(&keys::quality_table(order_id)).await?;
            let mut scores = BTreeMap::new();
            for (operation, value) in quality {
                scores.insert(operation, keys::decode_quality(&value)?);
            }
            report.quality_by_order.insert(order_id, scores);
        }

        for orders in report.orders_by_state.values_mut() {
            orders.sort_unstable();
        }
        Ok(report)
    }

    /// Order ids currently at `state`, or an empty slice.
    pub fn orders_in(&self, state: &str) -> &[u64] {
        self.orders_by_state
            .get(state)
            .map_or(&[], Vec::as_slice)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "orders by state:")?;
        for (state, orders) in &self.orders_by_state {
            writeln!(f, "  {state}: {orders:?}")?;
        }
        writeln!(f, "quality by order:")?;
        for (order_id, scores) in &self.quality_by_order {
            write!(f, "  {order_id}:")?;
            if scores.is_empty() {
                writeln!(f, " (none)")?;
            } else {
                for (operation, quality) in scores {
                    write!(f, " {operation}={quality:.2}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::MemorySubstrate;

    #[tokio::test]
    async fn test_report_groups_orders_by_state() {
        let substrate = MemorySubstrate::new();
        substrate
            .hash_set(keys::ORDER_STATE_TABLE, "0", "shelf")
            .await
            .unwrap();
        substrate
            .hash_set(keys::ORDER_STATE_TABLE, "2", "freezer")
            .await
            .unwrap();
        substrate
            .hash_set(keys::ORDER_STATE_TABLE, "1", "shelf")
            .await
            .unwrap();
        substrate
            .hash_set(&keys::quality_table(1), "cheese", "0.93")
            .await
            .unwrap();

        let report = Report::build(&substrate).await.unwrap();
        assert_eq!(report.orders_in("shelf"), &[0, 1]);
        assert_eq!(report.orders_in("freezer"), &[2]);
        assert_eq!(report.orders_in("oven"), &[] as &[u64]);
        assert_eq!(report.state_by_order[&2], "freezer");
        assert_eq!(report.quality_by_order[&1]["cheese"], 0.93);
        assert!(report.quality_by_order[&0].is_empty());
    }

    #[tokio::test]
    async fn test_report_idempotent_on_quiescent_system() {
        let substrate = MemorySubstrate::new();
        for (id, state) in [("0", "shelf"), ("1", "bake"), ("2", "freezer")] {
            substrate
                .hash_set(keys::ORDER_STATE_TABLE, id, state)
                .await
                .unwrap();
        }
        substrate
            .hash_set(&keys::quality_table(0), "slice", "0.8")
            .await
            .unwrap();

        let first = Report::build(&substrate).await.unwrap();
        let second = Report::build(&substrate).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_report_of_empty_kitchen() {
        let substrate = MemorySubstrate::new();
        let report = Report::build(&substrate).await.unwrap();
        assert!(report.state_by_order.is_empty());
        assert!(report.orders_by_state.is_empty());
    }
}
