use crate::schema::{EventPoint, SourceFeed};
use crate::utils::day_start;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanCategory {
    Basic,
    Plus,
    Premium,
}

impl PlanCategory {
    /// Case-insensitive substring classification of a plan name.
    pub fn classify(plan: &str) -> Option<Self> {
        let lower = plan.to_lowercase();
        if lower.contains("basic") {
            Some(PlanCategory::Basic)
        } else if lower.contains("plus") {
            Some(PlanCategory::Plus)
        } else if lower.contains("premium") {
            Some(PlanCategory::Premium)
        } else {
            None
        }
    }
}

/// Plan names seen across all line items, with how often each occurs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCatalog {
    pub plans: Vec<String>,
    pub counts: BTreeMap<String, usize>,
    pub categories: BTreeMap<PlanCategory, Vec<String>>,
}

impl PlanCatalog {
    pub fn category(&self, category: PlanCategory) -> &[String] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub fn plan_catalog(feeds: &[SourceFeed]) -> PlanCatalog {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    let points = feeds
        .iter()
        .flat_map(|f| f.new_subscriptions.iter().chain(f.cancellations.iter()));
    for point in points {
        for label in point.line_items.iter().filter_map(|i| i.label.as_deref()) {
            *counts.entry(label.to_string()).or_default() += 1;
        }
    }

    let plans: Vec<String> = counts.keys().cloned().collect();
    let mut categories: BTreeMap<PlanCategory, Vec<String>> = BTreeMap::new();
    for plan in &plans {
        if let Some(category) = PlanCategory::classify(plan) {
            categories.entry(category).or_default().push(plan.clone());
        }
    }

    PlanCatalog {
        plans,
        counts,
        categories,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub basic: usize,
    pub plus: usize,
    pub enterprise: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CustomerTier {
    Basic,
    Plus,
    Enterprise,
}

impl CustomerTier {
    fn classify(plan: &str) -> Option<Self> {
        let lower = plan.to_lowercase();
        if lower.contains("basic") {
            Some(CustomerTier::Basic)
        } else if lower.contains("plus") {
            Some(CustomerTier::Plus)
        } else if lower.contains("premium") || lower.contains("enterprise") {
            Some(CustomerTier::Enterprise)
        } else {
            None
        }
    }
}

/// Customers holding at least one active subscription of each tier at `to`.
///
/// Unlike the MRR reconciliation this is an exact per-line tally: a cancellation line
/// removes the tier from its customer regardless of amount. Lines lacking an identity or
/// a plan are ignored. Pass feeds after source exclusion but before plan filtering.
pub fn customers_by_category(feeds: &[SourceFeed], to: DateTime<Utc>) -> CategoryBreakdown {
    let up_to = |p: &&EventPoint| day_start(p.date) <= to;
    let mut tiers: BTreeMap<&str, BTreeSet<CustomerTier>> = BTreeMap::new();

    for point in feeds.iter().flat_map(|f| f.new_subscriptions.iter()).filter(up_to) {
        for item in &point.line_items {
            let (Some(identity), Some(plan)) = (item.identity(), item.label.as_deref()) else {
                continue;
            };
            let entry = tiers.entry(identity).or_default();
            if let Some(tier) = CustomerTier::classify(plan) {
                entry.insert(tier);
            }
        }
    }

    for point in feeds.iter().flat_map(|f| f.cancellations.iter()).filter(up_to) {
        for item in &point.line_items {
            let (Some(identity), Some(plan)) = (item.identity(), item.label.as_deref()) else {
                continue;
            };
            if let (Some(held), Some(tier)) = (tiers.get_mut(identity), CustomerTier::classify(plan))
            {
                held.remove(&tier);
            }
        }
    }

    let mut breakdown = CategoryBreakdown::default();
    for held in tiers.values() {
        if held.contains(&CustomerTier::Basic) {
            breakdown.basic += 1;
        }
        if held.contains(&CustomerTier::Plus) {
            breakdown.plus += 1;
        }
        if held.contains(&CustomerTier::Enterprise) {
            breakdown.enterprise += 1;
        }
    }
    breakdown
}
