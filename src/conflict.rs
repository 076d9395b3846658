use crate::models::{Event, Occurrence, Schedule};
use chrono::{DateTime, Utc};

/// Anything occupying calendar time, owned by some stored event.
pub trait Scheduled {
    /// Id of the stored event this entry belongs to.
    fn owner_id(&self) -> i64;
    fn schedule(&self) -> &Schedule;
}

impl Scheduled for Event {
    fn owner_id(&self) -> i64 {
        self.id
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}

impl Scheduled for Occurrence {
    fn owner_id(&self) -> i64 {
        self.original_event_id
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}

/// Half-open overlap test. Intervals that only touch do not overlap.
pub fn overlaps(s1: DateTime<Utc>, e1: DateTime<Utc>, s2: DateTime<Utc>, e2: DateTime<Utc>) -> bool {
    s1 < e2 && e1 > s2
}

/// Whether `[start, end)` overlaps any entry in `existing`, skipping those
/// owned by `exclude_id`. All-day entries count as whole days.
pub fn has_conflict<T: Scheduled>(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    existing: &[T],
    exclude_id: Option<i64>,
) -> bool {
    existing
        .iter()
        .filter(|item| Some(item.owner_id()) != exclude_id)
        .any(|item| {
            let (s, e) = item.schedule().span();
            overlaps(start, end, s, e)
        })
}
