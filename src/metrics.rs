use crate::baseline::{reconstruct_baseline, BaselineState};
use crate::config::MetricsOptions;
use crate::error::Result;
use crate::filter::PlanFilter;
use crate::matcher::FuzzyMatcher;
use crate::normalizer::{merge_feeds, EventStreams};
use crate::replay::{replay, ReplayOutcome};
use crate::schema::{
    DateRange, Delta, Granularity, KpiValues, MetricPoint, MetricsReport, SourceFeed,
};
use crate::terminal::recompute_terminal_state;
use crate::utils::{percent_change, safe_ratio};
use log::{debug, info};

pub struct MetricsEngine {
    matcher: FuzzyMatcher,
    filter: PlanFilter,
    granularity: Option<Granularity>,
}

/// Every intermediate result of a run, for callers that need more than the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub granularity: Granularity,
    pub streams: EventStreams,
    pub baseline: BaselineState,
    pub replay: ReplayOutcome,
    pub terminal: BaselineState,
}

impl MetricsEngine {
    pub fn new(options: &MetricsOptions) -> Result<Self> {
        Ok(Self {
            matcher: FuzzyMatcher::new(options.match_tolerance)?,
            filter: PlanFilter::new(options.plans.as_deref(), &options.exclude_sources),
            granularity: options.granularity,
        })
    }

    pub fn reconcile(&self, feeds: &[SourceFeed], range: &DateRange) -> Reconciliation {
        let filtered = self.filter.apply(feeds);
        let streams = merge_feeds(&filtered);
        let granularity = self
            .granularity
            .unwrap_or_else(|| Granularity::for_range(range));

        debug!(
            "Reconciling {} to {} at {:?} granularity",
            range.from, range.to, granularity
        );

        let baseline = reconstruct_baseline(&streams, range.from, &self.matcher);
        let replay = replay(&streams, range, &baseline, granularity);
        let terminal = recompute_terminal_state(&streams, range.to, &self.matcher);

        Reconciliation {
            granularity,
            streams,
            baseline,
            replay,
            terminal,
        }
    }

    pub fn calculate(&self, feeds: &[SourceFeed], range: &DateRange) -> MetricsReport {
        let reconciliation = self.reconcile(feeds, range);
        let report = build_report(&reconciliation);

        info!(
            "MRR {} -> {} cents, {} active customers, net new {} cents over {} buckets",
            report.series.first().map(|p| p.mrr).unwrap_or_default(),
            report.kpis.mrr,
            report.kpis.active_customers,
            report.kpis.net_new_mrr,
            report.series.len()
        );

        report
    }
}

/// Turns a reconciliation into the series and KPI output.
///
/// Opening values come from the first bucket, closing MRR from the last bucket and the
/// closing customer count from the independently recomputed terminal state.
pub fn build_report(reconciliation: &Reconciliation) -> MetricsReport {
    let series: Vec<MetricPoint> = reconciliation
        .replay
        .series
        .iter()
        .map(|bucket| MetricPoint {
            date: bucket.key.clone(),
            mrr: bucket.mrr_cents,
            active_customers: bucket.active_customers,
            arpa: safe_ratio(bucket.mrr_cents as f64, bucket.active_customers as f64),
            net_new_mrr: bucket.net_new_mrr_cents,
        })
        .collect();

    let baseline = &reconciliation.baseline;
    let from_mrr = series.first().map_or(baseline.mrr_cents, |p| p.mrr);
    let from_customers = series
        .first()
        .map_or(baseline.active_identities.len(), |p| p.active_customers);
    let to_mrr = series
        .last()
        .map_or(reconciliation.replay.final_state.mrr_cents, |p| p.mrr);
    let to_customers = reconciliation.terminal.active_identities.len();

    let from_arpa = safe_ratio(from_mrr as f64, from_customers as f64);
    let to_arpa = safe_ratio(to_mrr as f64, to_customers as f64);

    let kpis = KpiValues {
        mrr: to_mrr,
        active_customers: to_customers,
        arpa: to_arpa,
        net_new_mrr: series.iter().map(|p| p.net_new_mrr).sum(),
        mrr_delta: delta(from_mrr as f64, to_mrr as f64),
        customers_delta: delta(from_customers as f64, to_customers as f64),
        arpa_delta: delta(from_arpa, to_arpa),
    };

    MetricsReport { series, kpis }
}

fn delta(from: f64, to: f64) -> Delta {
    Delta {
        absolute: to - from,
        percent: percent_change(from, to),
    }
}

pub fn calculate_metrics(
    feeds: &[SourceFeed],
    range: &DateRange,
    options: &MetricsOptions,
) -> Result<MetricsReport> {
    let engine = MetricsEngine::new(options)?;
    Ok(engine.calculate(feeds, range))
}
