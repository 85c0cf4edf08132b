use crate::schema::{EventPoint, SourceFeed, SourceKind};
use log::debug;

/// A point tagged with the source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedPoint {
    pub source: SourceKind,
    pub point: EventPoint,
}

/// Both event kinds merged across sources, each sorted by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStreams {
    pub new_subscriptions: Vec<SourcedPoint>,
    pub cancellations: Vec<SourcedPoint>,
}

impl EventStreams {
    pub fn is_empty(&self) -> bool {
        self.new_subscriptions.is_empty() && self.cancellations.is_empty()
    }
}

/// Merges per-source feeds into one chronological stream per event kind.
///
/// The sort is stable: points sharing a date keep feed order, then their order within the feed.
pub fn merge_feeds(feeds: &[SourceFeed]) -> EventStreams {
    let mut new_subscriptions = Vec::new();
    let mut cancellations = Vec::new();

    for feed in feeds {
        new_subscriptions.extend(feed.new_subscriptions.iter().map(|point| SourcedPoint {
            source: feed.source,
            point: point.clone(),
        }));
        cancellations.extend(feed.cancellations.iter().map(|point| SourcedPoint {
            source: feed.source,
            point: point.clone(),
        }));
    }

    new_subscriptions.sort_by_key(|p| p.point.date);
    cancellations.sort_by_key(|p| p.point.date);

    debug!(
        "Merged {} feeds into {} new-subscription points and {} cancellation points",
        feeds.len(),
        new_subscriptions.len(),
        cancellations.len()
    );

    EventStreams {
        new_subscriptions,
        cancellations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn point(y: i32, m: u32, d: u32, amount: i64) -> EventPoint {
        EventPoint {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            count: 1,
            total_amount_cents: amount,
            currency: "EUR".to_string(),
            line_items: vec![],
        }
    }

    #[test]
    fn test_merge_sorts_each_kind() {
        let payments = SourceFeed {
            source: SourceKind::Payments,
            new_subscriptions: vec![point(2023, 3, 1, 100), point(2023, 1, 1, 200)],
            cancellations: vec![point(2023, 5, 1, 100)],
        };
        let board = SourceFeed {
            source: SourceKind::Board,
            new_subscriptions: vec![point(2023, 2, 1, 300)],
            cancellations: vec![point(2023, 4, 1, 300)],
        };

        let streams = merge_feeds(&[payments, board]);

        let dates: Vec<NaiveDate> = streams
            .new_subscriptions
            .iter()
            .map(|p| p.point.date)
            .collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 3, 1).unwrap(),
            ]
        );
        assert_eq!(streams.new_subscriptions[1].source, SourceKind::Board);
        assert_eq!(streams.cancellations[0].source, SourceKind::Board);
        assert_eq!(streams.cancellations[1].source, SourceKind::Payments);
    }

    #[test]
    fn test_same_day_points_keep_feed_order() {
        let payments = SourceFeed {
            source: SourceKind::Payments,
            new_subscriptions: vec![point(2023, 1, 1, 100), point(2023, 1, 1, 101)],
            cancellations: vec![],
        };
        let board = SourceFeed {
            source: SourceKind::Board,
            new_subscriptions: vec![point(2023, 1, 1, 102)],
            cancellations: vec![],
        };

        let streams = merge_feeds(&[payments, board]);
        let amounts: Vec<i64> = streams
            .new_subscriptions
            .iter()
            .map(|p| p.point.total_amount_cents)
            .collect();
        assert_eq!(amounts, vec![100, 101, 102]);
    }

    #[test]
    fn test_empty_feeds() {
        assert!(merge_feeds(&[]).is_empty());
        assert!(merge_feeds(&[SourceFeed::new(SourceKind::Board)]).is_empty());
    }
}
