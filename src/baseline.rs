//! Reconstruction of the subscription state at the start of a reporting window.
//!
//! No true subscription lifetimes are available, so the state is inferred: every
//! subscription started before the window counts as active unless a cancellation
//! the [`FuzzyMatcher`] pairs with it happened before the window too. The result is
//! approximate by nature.

use crate::matcher::{Cutoff, FuzzyMatcher};
use crate::normalizer::EventStreams;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineState {
    pub mrr_cents: i64,
    pub active_identities: BTreeSet<String>,
}

/// Folds every new-subscription point admitted by `admit` that has no matching
/// cancellation within `cutoff` into a state.
pub(crate) fn surviving_state(
    streams: &EventStreams,
    matcher: &FuzzyMatcher,
    admit: impl Fn(DateTime<Utc>) -> bool,
    cutoff: Cutoff,
) -> BaselineState {
    let mut state = BaselineState::default();
    let mut churned = 0usize;

    for new in streams
        .new_subscriptions
        .iter()
        .filter(|p| admit(p.point.instant()))
    {
        if let Some(cancel) = matcher.find_cancellation(&new.point, &streams.cancellations, cutoff)
        {
            debug!(
                "{} subscription point {} treated as churned by cancellation {} ({})",
                new.source.as_str(),
                new.point.date,
                cancel.point.date,
                cancel.source.as_str()
            );
            churned += 1;
            continue;
        }

        state.mrr_cents += new.point.total_amount_cents;
        state
            .active_identities
            .extend(new.point.identities().into_iter().map(str::to_string));
    }

    debug!(
        "Reconstructed state: {} cents across {} identities ({} points churned)",
        state.mrr_cents,
        state.active_identities.len(),
        churned
    );

    state
}

/// State as of `from`: subscriptions started strictly before `from` and not matched
/// by a cancellation dated after their start and strictly before `from`.
pub fn reconstruct_baseline(
    streams: &EventStreams,
    from: DateTime<Utc>,
    matcher: &FuzzyMatcher,
) -> BaselineState {
    surviving_state(streams, matcher, |d| d < from, Cutoff::Before(from))
}
