use crate::error::{ReconcileError, Result};
use crate::normalizer::SourcedPoint;
use crate::schema::EventPoint;
use chrono::{DateTime, Utc};

pub const DEFAULT_MATCH_TOLERANCE: f64 = 0.05;

/// Upper bound on the cancellation dates considered when deciding whether a subscription churned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    /// Cancellations dated strictly before the instant.
    Before(DateTime<Utc>),
    /// Cancellations dated at or before the instant.
    AtOrBefore(DateTime<Utc>),
}

impl Cutoff {
    pub fn admits(&self, instant: DateTime<Utc>) -> bool {
        match *self {
            Cutoff::Before(limit) => instant < limit,
            Cutoff::AtOrBefore(limit) => instant <= limit,
        }
    }
}

/// Decides whether a cancellation point and a new-subscription point describe the same
/// subscription, using shared identities and a relative tolerance on the average line amount.
///
/// This is a heuristic: customers sharing near-identical pricing can produce false positives,
/// and identity drift between sources produces false negatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatcher {
    tolerance: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(tolerance: f64) -> Result<Self> {
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return Err(ReconcileError::InvalidTolerance(tolerance));
        }
        Ok(Self { tolerance })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Evaluated from the cancellation towards the new subscription; not symmetric.
    pub fn matches(&self, cancel: &EventPoint, new: &EventPoint) -> bool {
        let (Some(cancel_avg), Some(new_avg)) = (cancel.average_amount(), new.average_amount())
        else {
            return false;
        };
        if new_avg == 0.0 {
            return false;
        }

        let cancel_ids = cancel.identities();
        if !new.identities().iter().any(|id| cancel_ids.contains(id)) {
            return false;
        }

        (cancel_avg - new_avg).abs() / new_avg.abs() < self.tolerance
    }

    /// First cancellation, by ascending date, that is dated after `new` and admitted by
    /// `cutoff` and that matches it.
    ///
    /// `cancellations` must already be sorted by date.
    pub fn find_cancellation<'a>(
        &self,
        new: &EventPoint,
        cancellations: &'a [SourcedPoint],
        cutoff: Cutoff,
    ) -> Option<&'a SourcedPoint> {
        let new_date = new.date;
        cancellations
            .iter()
            .filter(|c| c.point.date > new_date && cutoff.admits(c.point.instant()))
            .find(|c| self.matches(&c.point, new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LineItem, SourceKind};
    use crate::utils::day_start;
    use chrono::NaiveDate;

    fn point(date: &str, ids: &[&str], count: u32, total: i64) -> EventPoint {
        EventPoint {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            count,
            total_amount_cents: total,
            currency: "EUR".to_string(),
            line_items: ids
                .iter()
                .map(|id| LineItem {
                    identity: Some(id.to_string()),
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn sourced(point: EventPoint) -> SourcedPoint {
        SourcedPoint {
            source: SourceKind::Payments,
            point,
        }
    }

    #[test]
    fn test_same_identity_within_tolerance_matches() {
        let matcher = FuzzyMatcher::default();
        let new = point("2023-01-01", &["a@x.com"], 1, 1000);
        let cancel = point("2023-03-01", &["a@x.com"], 1, 1040);
        assert!(matcher.matches(&cancel, &new));
    }

    #[test]
    fn test_amount_outside_tolerance_does_not_match() {
        let matcher = FuzzyMatcher::default();
        let new = point("2023-01-01", &["a@x.com"], 1, 1000);
        let cancel = point("2023-03-01", &["a@x.com"], 1, 1060);
        assert!(!matcher.matches(&cancel, &new));

        // exactly 5% is not strictly below the tolerance
        let cancel = point("2023-03-01", &["a@x.com"], 1, 1050);
        assert!(!matcher.matches(&cancel, &new));
    }

    #[test]
    fn test_disjoint_identities_do_not_match() {
        let matcher = FuzzyMatcher::default();
        let new = point("2023-01-01", &["a@x.com"], 1, 1000);
        let cancel = point("2023-03-01", &["b@x.com"], 1, 1000);
        assert!(!matcher.matches(&cancel, &new));
    }

    #[test]
    fn test_compares_average_line_amounts() {
        let matcher = FuzzyMatcher::default();
        let new = point("2023-01-01", &["a@x.com", "b@x.com"], 2, 2000);
        let cancel = point("2023-03-01", &["b@x.com"], 1, 1000);
        assert!(matcher.matches(&cancel, &new));
    }

    #[test]
    fn test_zero_count_or_zero_amount_never_matches() {
        let matcher = FuzzyMatcher::default();
        let new = point("2023-01-01", &["a@x.com"], 0, 1000);
        let cancel = point("2023-03-01", &["a@x.com"], 1, 1000);
        assert!(!matcher.matches(&cancel, &new));

        let new = point("2023-01-01", &["a@x.com"], 1, 0);
        let cancel = point("2023-03-01", &["a@x.com"], 1, 0);
        assert!(!matcher.matches(&cancel, &new));

        let new = point("2023-01-01", &["a@x.com"], 1, 1000);
        let cancel = point("2023-03-01", &["a@x.com"], 0, 0);
        assert!(!matcher.matches(&cancel, &new));
    }

    #[test]
    fn test_missing_identities_never_match() {
        let matcher = FuzzyMatcher::default();
        let new = point("2023-01-01", &[""], 1, 1000);
        let cancel = point("2023-03-01", &[""], 1, 1000);
        assert!(!matcher.matches(&cancel, &new));
    }

    #[test]
    fn test_direction_matters() {
        let matcher = FuzzyMatcher::default();
        let a = point("2023-01-01", &["a@x.com"], 1, 1000);
        let b = point("2023-03-01", &["a@x.com"], 1, 952);
        // |952 - 1000| / 1000 = 4.8%, |1000 - 952| / 952 = 5.04%
        assert!(matcher.matches(&b, &a));
        assert!(!matcher.matches(&a, &b));
    }

    #[test]
    fn test_invalid_tolerance() {
        assert!(FuzzyMatcher::new(0.0).is_err());
        assert!(FuzzyMatcher::new(1.5).is_err());
        assert!(FuzzyMatcher::new(f64::NAN).is_err());
        assert_eq!(FuzzyMatcher::new(0.1).unwrap().tolerance(), 0.1);
    }

    #[test]
    fn test_find_cancellation_first_match_by_date() {
        let matcher = FuzzyMatcher::default();
        let new = point("2023-01-01", &["a@x.com"], 1, 1000);
        let cancellations = vec![
            sourced(point("2023-01-01", &["a@x.com"], 1, 1000)),
            sourced(point("2023-02-01", &["a@x.com"], 1, 1010)),
            sourced(point("2023-03-01", &["a@x.com"], 1, 1000)),
        ];

        let cutoff = Cutoff::Before(day_start(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()));
        let found = matcher
            .find_cancellation(&new, &cancellations, cutoff)
            .unwrap();
        assert_eq!(found.point.total_amount_cents, 1010);
    }

    #[test]
    fn test_find_cancellation_respects_cutoff() {
        let matcher = FuzzyMatcher::default();
        let new = point("2023-01-01", &["a@x.com"], 1, 1000);
        let cancellations = vec![sourced(point("2023-06-01", &["a@x.com"], 1, 1000))];
        let at = day_start(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());

        assert!(matcher
            .find_cancellation(&new, &cancellations, Cutoff::Before(at))
            .is_none());
        assert!(matcher
            .find_cancellation(&new, &cancellations, Cutoff::AtOrBefore(at))
            .is_some());
    }
}
