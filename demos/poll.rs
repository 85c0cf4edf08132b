use dotenv::dotenv;
use mrr_reconciler::pollers::{run_all, run_monday, run_stripe, PollerConfig};

/// Usage: poll [stripe|monday|all]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let target = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let config = PollerConfig::from_env()?;

    match target.as_str() {
        "stripe" => run_stripe(&config).await?,
        "monday" => run_monday(&config, chrono::Utc::now().date_naive()).await?,
        "all" => run_all(&config).await?,
        other => anyhow::bail!("Unknown poller '{}', expected stripe, monday or all", other),
    }

    println!(
        "✅ Snapshots for '{}' written to {}",
        target,
        config.snapshot_dir.display()
    );
    Ok(())
}
