//! Fetches raw records from the payments provider and the CRM board and writes them to the
//! snapshot layout the metrics run reads.

pub mod config;
pub mod monday;
pub mod stripe;

pub use config::PollerConfig;
pub use monday::{BoardSnapshot, MondayClient};
pub use stripe::{StripeClient, SubscriptionStatus};

use crate::error::Result;
use crate::ingestion::{
    account_from_item, aggregate_cancellations, aggregate_new_subscriptions, board_points,
    BoardAccount, BoardColumnMap,
};
use crate::schema::SourceKind;
use crate::snapshot::{write_cancellations, write_new_subscriptions, SnapshotLayout};
use crate::utils::day_start;
use chrono::{NaiveDate, Utc};
use log::info;

/// Polls active and canceled subscriptions and writes both payments snapshot files.
///
/// New subscriptions are the active ones created on or after `config.since`, filtered by
/// the provider. Every active subscription with a scheduled end is reported as a
/// cancellation on that date.
pub async fn run_stripe(config: &PollerConfig) -> Result<()> {
    let client = StripeClient::new(config.stripe_api_key()?.to_string());
    let since = day_start(config.since);

    let (created_since, canceled, active) = futures::try_join!(
        client.list_subscriptions(SubscriptionStatus::Active, Some(since)),
        client.list_subscriptions(SubscriptionStatus::Canceled, None),
        client.list_subscriptions(SubscriptionStatus::Active, None),
    )?;

    let new_points = aggregate_new_subscriptions(&created_since);
    let cancel_points = aggregate_cancellations(&canceled, &active, since);

    let layout = SnapshotLayout::new(&config.snapshot_dir);
    write_new_subscriptions(&layout, SourceKind::Payments, &new_points)?;
    write_cancellations(&layout, SourceKind::Payments, &cancel_points)?;

    info!(
        "Payments poll: {} active, {} canceled -> {} new-subscription and {} cancellation points",
        active.len(),
        canceled.len(),
        new_points.len(),
        cancel_points.len()
    );
    Ok(())
}

/// Reads board items into accounts, keeping only the configured group when one is set.
/// Blank customer cells take the name of their first linked item.
pub fn board_accounts(board: &BoardSnapshot, group: Option<&str>) -> Vec<BoardAccount> {
    let columns = BoardColumnMap::from_columns(&board.columns);
    board
        .items
        .iter()
        .filter(|item| group.map_or(true, |g| item.group_title.as_deref() == Some(g)))
        .map(|item| account_from_item(item, &columns, &board.linked_names))
        .collect()
}

/// Polls the CRM board and writes both board snapshot files as of `today`.
pub async fn run_monday(config: &PollerConfig, today: NaiveDate) -> Result<()> {
    let client = MondayClient::new(config.monday_api_key()?.to_string());
    let board_id = config.monday_board_id()?;

    let board = client.fetch_board(board_id).await?;
    let accounts = board_accounts(&board, config.monday_board_group.as_deref());
    let (new_points, cancel_points) = board_points(&accounts, today);

    let layout = SnapshotLayout::new(&config.snapshot_dir);
    write_new_subscriptions(&layout, SourceKind::Board, &new_points)?;
    write_cancellations(&layout, SourceKind::Board, &cancel_points)?;

    info!(
        "Board poll: {} items, {} accounts -> {} new-subscription and {} cancellation points",
        board.items.len(),
        accounts.len(),
        new_points.len(),
        cancel_points.len()
    );
    Ok(())
}

/// Runs both pollers concurrently. Credentials are checked before any request is sent.
pub async fn run_all(config: &PollerConfig) -> Result<()> {
    config.stripe_api_key()?;
    config.monday_api_key()?;
    config.monday_board_id()?;

    let today = Utc::now().date_naive();
    futures::try_join!(run_stripe(config), run_monday(config, today))?;
    Ok(())
}
