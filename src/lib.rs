//! # MRR Reconciler
//!
//! Reconciles subscription lifecycle events from two independent sources (a payments
//! provider and a manually maintained CRM board) into a recurring-revenue time series and
//! headline KPIs for an arbitrary date window.
//!
//! ## Core Concepts
//!
//! - **Event points**: per-day aggregates of new subscriptions or cancellations, each with
//!   the line items (customer identity, plan, monthly amount) that make up the total
//! - **Baseline**: the MRR and active customers at the start of the window, rebuilt from the
//!   full history by pairing each subscription with a plausible later cancellation
//! - **Replay**: events inside the window applied in date order and bucketed by day, ISO
//!   week or month
//! - **Terminal state**: the active customers at the end of the window, recomputed
//!   independently of the replay
//!
//! ## Example
//!
//! ```rust,ignore
//! use mrr_reconciler::*;
//! use chrono::NaiveDate;
//!
//! let layout = SnapshotLayout::new("snapshots");
//! let feeds = load_all(&layout)?;
//! let range = DateRange::from_dates(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
//! )?;
//!
//! let report = calculate_metrics(&feeds, &range, &MetricsOptions::default())?;
//! println!("MRR: {} cents", report.kpis.mrr);
//! ```

pub mod baseline;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingestion;
pub mod matcher;
pub mod metrics;
pub mod normalizer;
pub mod replay;
pub mod schema;
pub mod snapshot;
pub mod terminal;
pub mod utils;

#[cfg(feature = "pollers")]
pub mod pollers;

pub use baseline::{reconstruct_baseline, BaselineState};
pub use catalog::{
    customers_by_category, plan_catalog, CategoryBreakdown, PlanCatalog, PlanCategory,
};
pub use config::MetricsOptions;
pub use error::{ReconcileError, Result};
pub use filter::{filter_points, PlanFilter};
pub use ingestion::*;
pub use matcher::{Cutoff, FuzzyMatcher, DEFAULT_MATCH_TOLERANCE};
pub use metrics::{build_report, calculate_metrics, MetricsEngine, Reconciliation};
pub use normalizer::{merge_feeds, EventStreams, SourcedPoint};
pub use replay::{collect_events, replay, BucketSnapshot, ReplayEvent, ReplayOutcome};
pub use schema::*;
pub use snapshot::{
    load_all, load_feed, write_cancellations, write_new_subscriptions, SnapshotLayout,
};
pub use terminal::recompute_terminal_state;
pub use utils::*;

use log::debug;
use serde::{Deserialize, Serialize};

/// Everything the headline view shows for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineMetrics {
    pub report: MetricsReport,
    pub customers_by_category: CategoryBreakdown,
    pub plans: PlanCatalog,
}

/// Runs the reconciliation and the per-category tally over the same feeds.
///
/// The category tally and plan catalog honor source exclusion but not the plan allow-list,
/// so they always describe the whole customer base of the kept sources.
pub fn headline_metrics(
    feeds: &[SourceFeed],
    range: &DateRange,
    options: &MetricsOptions,
) -> Result<HeadlineMetrics> {
    let engine = MetricsEngine::new(options)?;
    let report = engine.calculate(feeds, range);

    let kept_sources = PlanFilter::new(None, &options.exclude_sources).apply(feeds);
    debug!(
        "Tallying categories over {} of {} sources",
        kept_sources.len(),
        feeds.len()
    );

    Ok(HeadlineMetrics {
        report,
        customers_by_category: customers_by_category(&kept_sources, range.to),
        plans: plan_catalog(&kept_sources),
    })
}

/// Loads both sources from `layout` and computes the headline metrics.
pub fn headline_metrics_from_snapshots(
    layout: &SnapshotLayout,
    range: &DateRange,
    options: &MetricsOptions,
) -> Result<HeadlineMetrics> {
    let feeds = load_all(layout)?;
    headline_metrics(&feeds, range, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn payments_feed() -> SourceFeed {
        let records = vec![
            PaymentSubscription {
                id: "sub_1".to_string(),
                created: day_start(date("2023-01-10")),
                canceled_at: None,
                cancel_at: None,
                customer_email: Some("a@x.com".to_string()),
                metadata: Default::default(),
                items: vec![PriceItem {
                    unit_amount: Some(1000),
                    currency: Some("eur".to_string()),
                    nickname: Some("Basic Monthly".to_string()),
                    interval: Some(BillingInterval::Month),
                    interval_count: Some(1),
                }],
            },
            PaymentSubscription {
                id: "sub_2".to_string(),
                created: day_start(date("2023-03-05")),
                canceled_at: None,
                cancel_at: None,
                customer_email: Some("b@x.com".to_string()),
                metadata: Default::default(),
                items: vec![PriceItem {
                    unit_amount: Some(24000),
                    currency: Some("eur".to_string()),
                    nickname: Some("Plus Yearly".to_string()),
                    interval: Some(BillingInterval::Year),
                    interval_count: Some(1),
                }],
            },
        ];

        SourceFeed::from_snapshots(
            SourceKind::Payments,
            aggregate_new_subscriptions(&records),
            Vec::new(),
        )
    }

    fn board_feed() -> SourceFeed {
        let accounts = vec![BoardAccount {
            customer_name: Some("Acme".to_string()),
            annual_amount_cents: Some(120_000),
            years: vec![2022],
            renewal_month: Some("febbraio".to_string()),
            plan: "Enterprise".to_string(),
            interventions_eligible: None,
        }];
        let (new_points, cancel_points) = board_points(&accounts, date("2024-01-01"));
        SourceFeed::from_snapshots(SourceKind::Board, new_points, cancel_points)
    }

    #[test]
    fn test_end_to_end_headline_metrics() {
        let range = DateRange::from_dates(date("2023-01-01"), date("2023-06-30")).unwrap();
        let headline =
            headline_metrics(&[payments_feed(), board_feed()], &range, &MetricsOptions::default())
                .unwrap();

        // Acme (10000/month) is active at the start and churns on 2023-02-01
        assert_eq!(headline.report.series[0].mrr, 10_000);
        assert_eq!(headline.report.series[0].active_customers, 1);
        assert_eq!(headline.report.kpis.mrr, 1000 + 2000);
        assert_eq!(headline.report.kpis.active_customers, 2);
        assert_eq!(headline.report.kpis.net_new_mrr, 1000 + 2000 - 10_000);

        assert_eq!(
            headline.customers_by_category,
            CategoryBreakdown {
                basic: 1,
                plus: 1,
                enterprise: 0,
            }
        );
        assert_eq!(
            headline.plans.plans,
            vec!["Basic Monthly", "Enterprise", "Plus Yearly"]
        );
    }

    #[test]
    fn test_excluded_source_is_left_out_everywhere() {
        let range = DateRange::from_dates(date("2023-01-01"), date("2023-06-30")).unwrap();
        let options = MetricsOptions {
            exclude_sources: vec![SourceKind::Board],
            ..Default::default()
        };
        let headline = headline_metrics(&[payments_feed(), board_feed()], &range, &options).unwrap();

        assert_eq!(headline.report.series[0].mrr, 0);
        assert_eq!(headline.report.kpis.mrr, 3000);
        assert!(!headline.plans.plans.contains(&"Enterprise".to_string()));
    }

    #[test]
    fn test_invalid_tolerance_surfaces_as_error() {
        let range = DateRange::from_dates(date("2023-01-01"), date("2023-06-30")).unwrap();
        let options = MetricsOptions {
            match_tolerance: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            headline_metrics(&[], &range, &options),
            Err(ReconcileError::InvalidTolerance(_))
        ));
    }
}
