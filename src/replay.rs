use crate::baseline::BaselineState;
use crate::normalizer::EventStreams;
use crate::schema::{DateRange, EventKind, Granularity, SourceKind};
use crate::utils::{bucket_key, day_start};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single in-range point turned into a signed change of state.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEvent {
    pub date: NaiveDate,
    pub kind: EventKind,
    pub source: SourceKind,
    /// `+total` for new subscriptions, `-total` for cancellations.
    pub amount_delta: i64,
    pub identities: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSnapshot {
    pub key: String,
    /// MRR right after the last event applied to the bucket.
    pub mrr_cents: i64,
    pub active_customers: usize,
    /// Sum of the deltas applied within this bucket only.
    pub net_new_mrr_cents: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub series: Vec<BucketSnapshot>,
    pub final_state: BaselineState,
    pub events_applied: usize,
}

/// Events dated within `range`, in ascending date order.
///
/// Points carry no time of day, so same-day ties are ordered new subscriptions first,
/// then cancellations, each kind in stream order.
pub fn collect_events(streams: &EventStreams, range: &DateRange) -> Vec<ReplayEvent> {
    let news = streams
        .new_subscriptions
        .iter()
        .map(|p| (EventKind::New, p));
    let cancels = streams
        .cancellations
        .iter()
        .map(|p| (EventKind::Cancel, p));

    let mut events: Vec<ReplayEvent> = news
        .chain(cancels)
        .filter(|(_, p)| range.contains(p.point.instant()))
        .map(|(kind, p)| ReplayEvent {
            date: p.point.date,
            kind,
            source: p.source,
            amount_delta: match kind {
                EventKind::New => p.point.total_amount_cents,
                EventKind::Cancel => -p.point.total_amount_cents,
            },
            identities: p
                .point
                .identities()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
        .collect();

    events.sort_by_key(|e| e.date);
    events
}

/// Replays in-range events on top of `baseline`, one snapshot per bucket touched.
///
/// The bucket holding `range.from` is always present and seeded with the baseline.
/// Events dated inside that bucket fold into it, so its opening MRR is
/// `mrr - net_new_mrr`, not `mrr`.
pub fn replay(
    streams: &EventStreams,
    range: &DateRange,
    baseline: &BaselineState,
    granularity: Granularity,
) -> ReplayOutcome {
    let events = collect_events(streams, range);

    let mut mrr = baseline.mrr_cents;
    let mut active = baseline.active_identities.clone();

    let mut buckets: BTreeMap<String, BucketSnapshot> = BTreeMap::new();
    let from_key = bucket_key(range.from, granularity);
    buckets.insert(
        from_key.clone(),
        BucketSnapshot {
            key: from_key,
            mrr_cents: mrr,
            active_customers: active.len(),
            net_new_mrr_cents: 0,
        },
    );

    for event in &events {
        let key = bucket_key(day_start(event.date), granularity);

        mrr += event.amount_delta;
        match event.kind {
            EventKind::New => active.extend(event.identities.iter().cloned()),
            EventKind::Cancel => {
                for identity in &event.identities {
                    active.remove(identity);
                }
            }
        }

        let bucket = buckets.entry(key.clone()).or_insert_with(|| BucketSnapshot {
            key,
            mrr_cents: 0,
            active_customers: 0,
            net_new_mrr_cents: 0,
        });
        bucket.net_new_mrr_cents += event.amount_delta;
        bucket.mrr_cents = mrr;
        bucket.active_customers = active.len();
    }

    debug!(
        "Replayed {} events into {} {:?} buckets",
        events.len(),
        buckets.len(),
        granularity
    );

    ReplayOutcome {
        series: buckets.into_values().collect(),
        final_state: BaselineState {
            mrr_cents: mrr,
            active_identities: active,
        },
        events_applied: events.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::SourcedPoint;
    use crate::schema::{EventPoint, LineItem};

    fn sourced(date: &str, id: &str, total: i64) -> SourcedPoint {
        SourcedPoint {
            source: SourceKind::Payments,
            point: EventPoint {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                count: 1,
                total_amount_cents: total,
                currency: "EUR".to_string(),
                line_items: vec![LineItem {
                    identity: Some(id.to_string()),
                    ..Default::default()
                }],
            },
        }
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::from_dates(
            NaiveDate::parse_from_str(from, "%Y-%m-%d").unwrap(),
            NaiveDate::parse_from_str(to, "%Y-%m-%d").unwrap(),
        )
        .unwrap()
    }

    fn baseline(mrr: i64, ids: &[&str]) -> BaselineState {
        BaselineState {
            mrr_cents: mrr,
            active_identities: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_first_bucket_seeded_with_baseline() {
        let streams = EventStreams::default();
        let outcome = replay(
            &streams,
            &range("2023-06-01", "2023-06-30"),
            &baseline(1000, &["a@x.com"]),
            Granularity::Day,
        );

        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.series[0].key, "2023-06-01");
        assert_eq!(outcome.series[0].mrr_cents, 1000);
        assert_eq!(outcome.series[0].active_customers, 1);
        assert_eq!(outcome.series[0].net_new_mrr_cents, 0);
        assert_eq!(outcome.events_applied, 0);
    }

    #[test]
    fn test_events_fold_into_buckets() {
        let streams = EventStreams {
            new_subscriptions: vec![
                sourced("2023-06-03", "b@x.com", 500),
                sourced("2023-06-03", "c@x.com", 700),
                sourced("2023-06-10", "d@x.com", 300),
            ],
            cancellations: vec![sourced("2023-06-10", "a@x.com", 1000)],
        };

        let outcome = replay(
            &streams,
            &range("2023-06-01", "2023-06-30"),
            &baseline(1000, &["a@x.com"]),
            Granularity::Day,
        );

        let keys: Vec<&str> = outcome.series.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["2023-06-01", "2023-06-03", "2023-06-10"]);

        assert_eq!(outcome.series[1].mrr_cents, 2200);
        assert_eq!(outcome.series[1].active_customers, 3);
        assert_eq!(outcome.series[1].net_new_mrr_cents, 1200);

        assert_eq!(outcome.series[2].mrr_cents, 1500);
        assert_eq!(outcome.series[2].active_customers, 3);
        assert_eq!(outcome.series[2].net_new_mrr_cents, -700);

        assert_eq!(outcome.final_state.mrr_cents, 1500);
        assert!(!outcome.final_state.active_identities.contains("a@x.com"));
    }

    #[test]
    fn test_events_on_from_land_in_first_bucket() {
        let streams = EventStreams {
            new_subscriptions: vec![sourced("2023-06-01", "b@x.com", 500)],
            cancellations: vec![],
        };

        let outcome = replay(
            &streams,
            &range("2023-06-01", "2023-06-30"),
            &baseline(1000, &["a@x.com"]),
            Granularity::Day,
        );

        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.series[0].mrr_cents, 1500);
        assert_eq!(outcome.series[0].net_new_mrr_cents, 500);
    }

    #[test]
    fn test_out_of_range_events_ignored() {
        let streams = EventStreams {
            new_subscriptions: vec![
                sourced("2023-05-31", "b@x.com", 500),
                sourced("2023-07-01", "c@x.com", 500),
            ],
            cancellations: vec![],
        };

        let outcome = replay(
            &streams,
            &range("2023-06-01", "2023-06-30"),
            &BaselineState::default(),
            Granularity::Day,
        );
        assert_eq!(outcome.events_applied, 0);
        assert_eq!(outcome.final_state.mrr_cents, 0);
    }

    #[test]
    fn test_month_buckets_accumulate_net_new() {
        let streams = EventStreams {
            new_subscriptions: vec![
                sourced("2023-01-05", "a@x.com", 500),
                sourced("2023-01-20", "b@x.com", 500),
                sourced("2023-03-02", "c@x.com", 800),
            ],
            cancellations: vec![sourced("2023-01-25", "a@x.com", 500)],
        };

        let outcome = replay(
            &streams,
            &range("2023-01-01", "2024-03-01"),
            &BaselineState::default(),
            Granularity::Month,
        );

        let keys: Vec<&str> = outcome.series.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["2023-01", "2023-03"]);
        assert_eq!(outcome.series[0].net_new_mrr_cents, 500);
        assert_eq!(outcome.series[0].mrr_cents, 500);
        assert_eq!(outcome.series[0].active_customers, 1);
        assert_eq!(outcome.series[1].mrr_cents, 1300);
    }

    #[test]
    fn test_same_day_new_applied_before_cancel() {
        let streams = EventStreams {
            new_subscriptions: vec![sourced("2023-06-05", "a@x.com", 500)],
            cancellations: vec![sourced("2023-06-05", "a@x.com", 500)],
        };

        let events = collect_events(&streams, &range("2023-06-01", "2023-06-30"));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::New);
        assert_eq!(events[1].kind, EventKind::Cancel);
        assert_eq!(events[1].amount_delta, -500);

        let outcome = replay(
            &streams,
            &range("2023-06-01", "2023-06-30"),
            &BaselineState::default(),
            Granularity::Day,
        );
        assert!(outcome.final_state.active_identities.is_empty());
    }
}
