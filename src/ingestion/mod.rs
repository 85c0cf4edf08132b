//! Conversion of raw upstream records into daily snapshot points.
//!
//! Both sources end up in the same [`NewSubscriptionPoint`] / [`CancellationPoint`]
//! shape so the reconciliation never needs to know where a point came from.

pub mod board;
pub mod payments;

pub use board::*;
pub use payments::*;

use crate::schema::{CancellationPoint, LineItem, NewSubscriptionPoint};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DEFAULT_CURRENCY: &str = "EUR";

struct DayBucket {
    count: u32,
    total_amount_cents: i64,
    currency: String,
    line_items: Vec<LineItem>,
}

/// Groups line items by calendar day, keeping per-day count and total in step.
#[derive(Default)]
pub(crate) struct DayBuckets {
    days: BTreeMap<NaiveDate, DayBucket>,
}

impl DayBuckets {
    /// The first item pushed on a day fixes that day's currency.
    pub(crate) fn push(&mut self, date: NaiveDate, item: LineItem) {
        let bucket = self.days.entry(date).or_insert_with(|| DayBucket {
            count: 0,
            total_amount_cents: 0,
            currency: item
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            line_items: Vec::new(),
        });
        bucket.count += 1;
        bucket.total_amount_cents += item.amount_cents.unwrap_or(0);
        bucket.line_items.push(item);
    }

    pub(crate) fn into_new_subscription_points(self) -> Vec<NewSubscriptionPoint> {
        self.days
            .into_iter()
            .map(|(date, bucket)| NewSubscriptionPoint {
                date,
                count: bucket.count,
                total_amount_cents: bucket.total_amount_cents,
                currency: bucket.currency,
                purchases: bucket.line_items,
            })
            .collect()
    }

    pub(crate) fn into_cancellation_points(self) -> Vec<CancellationPoint> {
        self.days
            .into_iter()
            .map(|(date, bucket)| CancellationPoint {
                date,
                count: bucket.count,
                total_amount_cents: bucket.total_amount_cents,
                currency: bucket.currency,
                cancellations: bucket.line_items,
            })
            .collect()
    }
}
