use super::{DayBuckets, DEFAULT_CURRENCY};
use crate::schema::{CancellationPoint, LineItem, NewSubscriptionPoint};
use crate::utils::utc_day;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
}

/// One priced item of a subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
    pub unit_amount: Option<i64>,
    pub currency: Option<String>,
    pub nickname: Option<String>,
    pub interval: Option<BillingInterval>,
    pub interval_count: Option<u32>,
}

/// A subscription as listed by the payments provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSubscription {
    pub id: String,
    pub created: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub items: Vec<PriceItem>,
}

/// Normalizes an item price to a monthly amount in whole cents.
///
/// Yearly prices are spread over 12 months, weekly over 52/12 weeks per month and daily
/// over 30 days per month. A missing interval is treated as monthly.
pub fn monthly_amount_cents(item: &PriceItem) -> i64 {
    let unit = item.unit_amount.unwrap_or(0) as f64;
    let count = item.interval_count.unwrap_or(1).max(1) as f64;

    let monthly = match item.interval.unwrap_or(BillingInterval::Month) {
        BillingInterval::Month => unit,
        BillingInterval::Year => unit / 12.0,
        BillingInterval::Week => unit * 52.0 / 12.0 * count,
        BillingInterval::Day => unit * 30.0 * count,
    };
    monthly.round() as i64
}

/// Builds the line item for a subscription: summed monthly amount, first nickname as plan,
/// currency of the last priced item.
fn line_item(subscription: &PaymentSubscription, with_timestamps: bool) -> LineItem {
    let amount_cents: i64 = subscription.items.iter().map(monthly_amount_cents).sum();
    let label = subscription
        .items
        .iter()
        .find_map(|i| i.nickname.clone());
    let currency = subscription
        .items
        .iter()
        .rev()
        .find_map(|i| i.currency.as_deref())
        .map(str::to_uppercase)
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    LineItem {
        identity: subscription.customer_email.clone(),
        label,
        amount_cents: Some(amount_cents),
        currency: Some(currency),
        canceled_at: with_timestamps.then_some(subscription.canceled_at).flatten(),
        cancel_at: with_timestamps.then_some(subscription.cancel_at).flatten(),
        metadata: subscription.metadata.clone(),
    }
}

/// One point per UTC creation day.
pub fn aggregate_new_subscriptions(records: &[PaymentSubscription]) -> Vec<NewSubscriptionPoint> {
    let mut buckets = DayBuckets::default();
    for record in records {
        buckets.push(utc_day(record.created), line_item(record, false));
    }
    let points = buckets.into_new_subscription_points();
    debug!(
        "Aggregated {} subscriptions into {} daily points",
        records.len(),
        points.len()
    );
    points
}

/// Cancellation points from already-canceled subscriptions (dated by `canceled_at`) and
/// active subscriptions scheduled to end (dated by `cancel_at`).
///
/// Records lacking their reference instant, or whose reference falls before `since`,
/// are skipped.
pub fn aggregate_cancellations(
    canceled: &[PaymentSubscription],
    scheduled: &[PaymentSubscription],
    since: DateTime<Utc>,
) -> Vec<CancellationPoint> {
    let mut buckets = DayBuckets::default();
    let mut skipped = 0usize;

    let with_reference = canceled
        .iter()
        .map(|s| (s, s.canceled_at))
        .chain(scheduled.iter().map(|s| (s, s.cancel_at)));

    for (record, reference) in with_reference {
        match reference {
            Some(at) if at >= since => buckets.push(utc_day(at), line_item(record, true)),
            _ => skipped += 1,
        }
    }

    let points = buckets.into_cancellation_points();
    debug!(
        "Aggregated cancellations into {} daily points ({} records skipped)",
        points.len(),
        skipped
    );
    points
}
