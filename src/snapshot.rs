//! On-disk snapshot files shared by the pollers (writers) and the metrics run (reader).

use crate::error::Result;
use crate::schema::{CancellationPoint, NewSubscriptionPoint, SourceFeed, SourceKind};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const NEW_SUBSCRIPTIONS_FILE: &str = "new-subscriptions.json";
const CANCELLATIONS_FILE: &str = "cancellations.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLayout {
    root: PathBuf,
}

impl SnapshotLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_dir(&self, source: SourceKind) -> PathBuf {
        let dir = match source {
            SourceKind::Payments => "stripe",
            SourceKind::Board => "monday",
        };
        self.root.join(dir)
    }

    pub fn new_subscriptions_path(&self, source: SourceKind) -> PathBuf {
        self.source_dir(source).join(NEW_SUBSCRIPTIONS_FILE)
    }

    pub fn cancellations_path(&self, source: SourceKind) -> PathBuf {
        self.source_dir(source).join(CANCELLATIONS_FILE)
    }
}

/// Reads a JSON array, treating a missing file as an empty array.
fn read_points<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match std::fs::read_to_string(path) {
        Ok(json) => Ok(serde_json::from_str(&json)?),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Snapshot {} not found, treating as empty", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn write_points<T: Serialize>(path: &Path, points: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(points)?;
    std::fs::write(path, json)?;
    debug!("Wrote {} points to {}", points.len(), path.display());
    Ok(())
}

pub fn load_feed(layout: &SnapshotLayout, source: SourceKind) -> Result<SourceFeed> {
    let new_subscriptions: Vec<NewSubscriptionPoint> =
        read_points(&layout.new_subscriptions_path(source))?;
    let cancellations: Vec<CancellationPoint> = read_points(&layout.cancellations_path(source))?;

    debug!(
        "Loaded {} new-subscription and {} cancellation points for {}",
        new_subscriptions.len(),
        cancellations.len(),
        source.as_str()
    );

    Ok(SourceFeed::from_snapshots(
        source,
        new_subscriptions,
        cancellations,
    ))
}

/// Loads the feeds of both sources.
pub fn load_all(layout: &SnapshotLayout) -> Result<Vec<SourceFeed>> {
    [SourceKind::Payments, SourceKind::Board]
        .into_iter()
        .map(|source| load_feed(layout, source))
        .collect()
}

pub fn write_new_subscriptions(
    layout: &SnapshotLayout,
    source: SourceKind,
    points: &[NewSubscriptionPoint],
) -> Result<()> {
    write_points(&layout.new_subscriptions_path(source), points)
}

pub fn write_cancellations(
    layout: &SnapshotLayout,
    source: SourceKind,
    points: &[CancellationPoint],
) -> Result<()> {
    write_points(&layout.cancellations_path(source), points)
}
