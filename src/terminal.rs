use crate::baseline::{surviving_state, BaselineState};
use crate::matcher::{Cutoff, FuzzyMatcher};
use crate::normalizer::EventStreams;
use chrono::{DateTime, Utc};

/// State as of `to`, derived from the full history rather than from the replayed series,
/// so the closing customer count does not depend on bucket granularity.
///
/// Subscriptions started at or before `to` are active unless matched by a cancellation
/// dated after their start and at or before `to`.
pub fn recompute_terminal_state(
    streams: &EventStreams,
    to: DateTime<Utc>,
    matcher: &FuzzyMatcher,
) -> BaselineState {
    surviving_state(streams, matcher, |d| d <= to, Cutoff::AtOrBefore(to))
}
