use chrono::{Duration, Utc};
use mrr_reconciler::*;
use std::path::{Path, PathBuf};

/// Usage: headline_metrics [snapshot_dir] [from YYYY-MM-DD] [to YYYY-MM-DD] [options.json]
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let layout = SnapshotLayout::new(
        args.first()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("snapshots")),
    );
    let today = Utc::now().date_naive();
    let from = match args.get(1) {
        Some(value) => parse_day(value)?,
        None => today - Duration::days(365),
    };
    let to = match args.get(2) {
        Some(value) => parse_day(value)?,
        None => today,
    };
    let options = match args.get(3) {
        Some(path) => MetricsOptions::load(Path::new(path))?,
        None => MetricsOptions::default(),
    };

    let range = DateRange::from_dates(from, to)?;
    let headline = headline_metrics_from_snapshots(&layout, &range, &options)?;
    let kpis = &headline.report.kpis;

    println!("📈 Headline metrics {} → {}\n", from, to);
    println!("{:<12} {:>12} {:>10} {:>12} {:>12}", "Bucket", "MRR", "Customers", "ARPA", "Net new");
    for point in &headline.report.series {
        println!(
            "{:<12} {:>12.2} {:>10} {:>12.2} {:>12.2}",
            point.date,
            point.mrr as f64 / 100.0,
            point.active_customers,
            point.arpa / 100.0,
            point.net_new_mrr as f64 / 100.0
        );
    }

    println!();
    println!(
        "MRR:              {:.2} ({:+.2}, {:+.1}%)",
        kpis.mrr as f64 / 100.0,
        kpis.mrr_delta.absolute / 100.0,
        kpis.mrr_delta.percent
    );
    println!(
        "Active customers: {} ({:+}, {:+.1}%)",
        kpis.active_customers, kpis.customers_delta.absolute, kpis.customers_delta.percent
    );
    println!(
        "ARPA:             {:.2} ({:+.1}%)",
        kpis.arpa / 100.0,
        kpis.arpa_delta.percent
    );
    println!("Net new MRR:      {:.2}", kpis.net_new_mrr as f64 / 100.0);

    let categories = &headline.customers_by_category;
    println!(
        "\nBy category: basic {}, plus {}, enterprise {}",
        categories.basic, categories.plus, categories.enterprise
    );
    println!("Plans seen: {}", headline.plans.plans.join(", "));

    Ok(())
}
