//! Usage estimator.
//!
//! Aggregates live objects (historical versions excluded) into size and
//! cost metrics. Pricing is configuration, not baked into the math.

use serde::{Deserialize, Serialize};

use crate::store::ObjectMeta;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Storage pricing constants, overridable by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingModel {
    /// Price per GB-month of stored data.
    pub storage_price_per_gb_month: f64,
    /// Price per 1,000 objects-worth of operations.
    pub operations_price_per_1000: f64,
}

impl Default for PricingModel {
    fn default() -> Self {
        Self {
            storage_price_per_gb_month: 0.026,
            operations_price_per_1000: 0.005,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopObject {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub total_bytes: u64,
    pub object_count: usize,
    /// Largest live objects, descending by size.
    pub top_objects: Vec<TopObject>,
    pub estimated_monthly_cost: f64,
}

/// Aggregate live-object metadata into a usage report.
pub fn estimate(metas: &[ObjectMeta], pricing: &PricingModel, top_n: usize) -> UsageReport {
    let total_bytes: u64 = metas.iter().map(|m| m.size).sum();
    let object_count = metas.len();

    let mut top: Vec<TopObject> = metas
        .iter()
        .map(|m| TopObject {
            name: m.key.clone(),
            size: m.size,
        })
        .collect();
    top.sort_by(|a, b| b.size.cmp(&a.size).then(a.name.cmp(&b.name)));
    top.truncate(top_n);

    let storage_gb = total_bytes as f64 / BYTES_PER_GB;
    let estimated_monthly_cost = storage_gb * pricing.storage_price_per_gb_month
        + (object_count as f64 / 1000.0) * pricing.operations_price_per_1000;

    UsageReport {
        total_bytes,
        object_count,
        top_objects: top,
        estimated_monthly_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn meta(key: &str, size: u64) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size,
            updated: Utc::now(),
            content_hash: None,
        }
    }

    #[test]
    fn test_empty_bucket() {
        let report = estimate(&[], &PricingModel::default(), 10);
        assert_eq!(report.total_bytes, 0);
        assert_eq!(report.object_count, 0);
        assert!(report.top_objects.is_empty());
        assert_eq!(report.estimated_monthly_cost, 0.0);
    }

    #[test]
    fn test_totals_and_top_objects() {
        let metas = vec![
            meta("small.txt", 10),
            meta("large.bin", 5000),
            meta("medium.json", 300),
        ];

        let report = estimate(&metas, &PricingModel::default(), 2);

        assert_eq!(report.total_bytes, 5310);
        assert_eq!(report.object_count, 3);
        assert_eq!(report.top_objects.len(), 2);
        assert_eq!(report.top_objects[0].name, "large.bin");
        assert_eq!(report.top_objects[1].name, "medium.json");
    }

    #[test]
    fn test_cost_uses_configured_pricing() {
        let one_gb = 1024 * 1024 * 1024;
        let metas = vec![meta("a", one_gb), meta("b", one_gb)];
        let pricing = PricingModel {
            storage_price_per_gb_month: 0.5,
            operations_price_per_1000: 10.0,
        };

        let report = estimate(&metas, &pricing, 10);

        // 2 GB * 0.5 + (2 / 1000) * 10
        let expected = 2.0 * 0.5 + 0.002 * 10.0;
        assert!((report.estimated_monthly_cost - expected).abs() < 1e-9);
    }

    #[test]
    fn test_top_order_is_stable_for_equal_sizes() {
        let metas = vec![meta("b", 100), meta("a", 100)];
        let report = estimate(&metas, &PricingModel::default(), 10);
        assert_eq!(report.top_objects[0].name, "a");
        assert_eq!(report.top_objects[1].name, "b");
    }
}
