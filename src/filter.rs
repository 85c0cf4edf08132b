use crate::schema::{EventPoint, SourceFeed, SourceKind};
use log::debug;
use std::collections::BTreeSet;

/// Pre-pass restricting feeds to a plan allow-list and dropping excluded sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanFilter {
    plans: Option<BTreeSet<String>>,
    exclude_sources: BTreeSet<SourceKind>,
}

impl PlanFilter {
    /// An empty allow-list means no plan filtering, same as `None`.
    pub fn new(plans: Option<&[String]>, exclude_sources: &[SourceKind]) -> Self {
        let plans = plans
            .filter(|p| !p.is_empty())
            .map(|p| p.iter().cloned().collect());
        Self {
            plans,
            exclude_sources: exclude_sources.iter().copied().collect(),
        }
    }

    pub fn is_excluded(&self, source: SourceKind) -> bool {
        self.exclude_sources.contains(&source)
    }

    pub fn apply(&self, feeds: &[SourceFeed]) -> Vec<SourceFeed> {
        feeds
            .iter()
            .filter(|feed| {
                let excluded = self.is_excluded(feed.source);
                if excluded {
                    debug!("Excluding source {}", feed.source.as_str());
                }
                !excluded
            })
            .map(|feed| match &self.plans {
                None => feed.clone(),
                Some(plans) => SourceFeed {
                    source: feed.source,
                    new_subscriptions: filter_points(&feed.new_subscriptions, plans),
                    cancellations: filter_points(&feed.cancellations, plans),
                },
            })
            .collect()
    }
}

/// Keeps only line items whose plan is allowed and recomputes count and total.
///
/// When the kept lines sum to zero (amounts missing or zero) while the original point
/// carried a non-zero total, the total is estimated as
/// `original_total * kept / original_count`. That estimate is best-effort and may drift
/// from the true per-plan amount by rounding or uneven pricing.
pub fn filter_points(points: &[EventPoint], plans: &BTreeSet<String>) -> Vec<EventPoint> {
    points
        .iter()
        .filter_map(|point| {
            let line_items: Vec<_> = point
                .line_items
                .iter()
                .filter(|item| item.label.as_ref().is_some_and(|l| plans.contains(l)))
                .cloned()
                .collect();

            let count = line_items.len() as u32;
            let line_sum: i64 = line_items.iter().filter_map(|i| i.amount_cents).sum();
            let total_amount_cents =
                if line_sum == 0 && point.total_amount_cents != 0 && point.count > 0 {
                    let ratio = count as f64 / point.count as f64;
                    (point.total_amount_cents as f64 * ratio).round() as i64
                } else {
                    line_sum
                };

            if count == 0 && total_amount_cents == 0 {
                return None;
            }

            Some(EventPoint {
                date: point.date,
                count,
                total_amount_cents,
                currency: point.currency.clone(),
                line_items,
            })
        })
        .collect()
}
