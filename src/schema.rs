use crate::error::{ReconcileError, Result};
use crate::utils::day_start;
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which upstream collaborator produced a point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[schemars(description = "The payments provider (subscriptions billed online)")]
    Payments,

    #[schemars(description = "The CRM board (manually tracked enterprise accounts)")]
    Board,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Payments => "payments",
            SourceKind::Board => "board",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    New,
    Cancel,
}

/// One purchase or cancellation recorded inside a daily point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(rename = "email", default, skip_serializing_if = "Option::is_none")]
    #[schemars(
        description = "Customer identity (email or account name). The only key correlating a customer across points and sources."
    )]
    pub identity: Option<String>,

    #[serde(rename = "subscriptionName", default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Plan or subscription name")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Monthly-equivalent amount of this line in cents")]
    pub amount_cents: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "When the subscription was actually canceled (cancellations only)")]
    pub canceled_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "When the subscription is scheduled to end (cancellations only)")]
    pub cancel_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl LineItem {
    /// The identity, ignoring blank values.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref().filter(|s| !s.is_empty())
    }
}

/// Canonical daily point shared by both event kinds and both sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPoint {
    pub date: NaiveDate,
    pub count: u32,
    pub total_amount_cents: i64,
    pub currency: String,
    pub line_items: Vec<LineItem>,
}

impl EventPoint {
    pub fn instant(&self) -> DateTime<Utc> {
        day_start(self.date)
    }

    /// Distinct non-blank identities across the line items.
    pub fn identities(&self) -> BTreeSet<&str> {
        self.line_items.iter().filter_map(LineItem::identity).collect()
    }

    /// Average amount per line, `None` for an empty point.
    pub fn average_amount(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.total_amount_cents as f64 / self.count as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscriptionPoint {
    #[schemars(description = "Day bucket in YYYY-MM-DD format")]
    pub date: NaiveDate,

    #[schemars(description = "Number of subscriptions started on this day")]
    pub count: u32,

    #[schemars(description = "Sum of monthly-equivalent amounts in cents")]
    pub total_amount_cents: i64,

    pub currency: String,

    #[serde(default)]
    pub purchases: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancellationPoint {
    #[schemars(description = "Day bucket in YYYY-MM-DD format")]
    pub date: NaiveDate,

    #[schemars(description = "Number of subscriptions canceled on this day")]
    pub count: u32,

    #[schemars(description = "Sum of monthly-equivalent amounts in cents")]
    pub total_amount_cents: i64,

    pub currency: String,

    #[serde(default)]
    pub cancellations: Vec<LineItem>,
}

impl From<NewSubscriptionPoint> for EventPoint {
    fn from(point: NewSubscriptionPoint) -> Self {
        Self {
            date: point.date,
            count: point.count,
            total_amount_cents: point.total_amount_cents,
            currency: point.currency,
            line_items: point.purchases,
        }
    }
}

impl From<CancellationPoint> for EventPoint {
    fn from(point: CancellationPoint) -> Self {
        Self {
            date: point.date,
            count: point.count,
            total_amount_cents: point.total_amount_cents,
            currency: point.currency,
            line_items: point.cancellations,
        }
    }
}

impl NewSubscriptionPoint {
    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(Vec<NewSubscriptionPoint>))
    }
}

impl CancellationPoint {
    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(Vec<CancellationPoint>))
    }
}

/// Both event streams of a single source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeed {
    pub source: SourceKind,
    pub new_subscriptions: Vec<EventPoint>,
    pub cancellations: Vec<EventPoint>,
}

impl SourceFeed {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            new_subscriptions: Vec::new(),
            cancellations: Vec::new(),
        }
    }

    pub fn from_snapshots(
        source: SourceKind,
        new_subscriptions: Vec<NewSubscriptionPoint>,
        cancellations: Vec<CancellationPoint>,
    ) -> Self {
        Self {
            source,
            new_subscriptions: new_subscriptions.into_iter().map(EventPoint::from).collect(),
            cancellations: cancellations.into_iter().map(EventPoint::from).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_subscriptions.is_empty() && self.cancellations.is_empty()
    }
}

/// Reporting window. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(ReconcileError::InvalidRange {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }
        Ok(Self { from, to })
    }

    /// Window from the start of `from` to the start of `to`, so points dated `to` are included.
    pub fn from_dates(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        Self::new(day_start(from), day_start(to))
    }

    /// Length of the window in (possibly fractional) days.
    pub fn days(&self) -> f64 {
        (self.to - self.from).num_seconds() as f64 / 86_400.0
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    /// `Day` up to 90 days, `Week` up to a year, `Month` beyond.
    pub fn for_range(range: &DateRange) -> Self {
        let days = range.days();
        if days > 365.0 {
            Granularity::Month
        } else if days > 90.0 {
            Granularity::Week
        } else {
            Granularity::Day
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    /// Bucket key: `YYYY-MM-DD`, `YYYY-Www` or `YYYY-MM`.
    pub date: String,
    pub mrr: i64,
    pub active_customers: usize,
    pub arpa: f64,
    pub net_new_mrr: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub absolute: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiValues {
    pub mrr: i64,
    pub active_customers: usize,
    pub arpa: f64,
    pub net_new_mrr: i64,
    pub mrr_delta: Delta,
    pub customers_delta: Delta,
    pub arpa_delta: Delta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub series: Vec<MetricPoint>,
    pub kpis: KpiValues,
}
