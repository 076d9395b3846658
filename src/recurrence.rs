//! Recurring event expansion.
//!
//! Occurrence `n` is computed from the base date directly (base + n steps)
//! rather than from occurrence `n - 1`. Monthly and yearly steps clamp to the
//! last day of the target month, so a series anchored on the 31st visits the
//! 31st whenever the month has one: Jan 31, Feb 29, Mar 31, Apr 30. A Feb 29
//! yearly series lands on Feb 28 in common years and Feb 29 in leap years.

use crate::conflict::overlaps;
use crate::error::CalendarError;
use crate::models::{Event, EventRecord, Occurrence, RepeatType, Schedule};
use crate::time::DateRange;
use chrono::{Days, Months, NaiveDate};
use nanoid::nanoid;

/// Upper bound on the occurrences a single expansion may produce.
pub const MAX_OCCURRENCES: usize = 5000;

/// How a recurrence ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatEnd {
    /// Inclusive last calendar date.
    Until(NaiveDate),
    /// Total number of occurrences, the base included.
    Count(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub repeat_type: RepeatType,
    pub end: Option<RepeatEnd>,
}

/// Date of occurrence `n` of a series starting on `base`.
pub fn nth_date(base: NaiveDate, repeat_type: RepeatType, n: u32) -> Option<NaiveDate> {
    match repeat_type {
        RepeatType::Daily => base.checked_add_days(Days::new(u64::from(n))),
        RepeatType::Weekly => base.checked_add_days(Days::new(7 * u64::from(n))),
        RepeatType::Monthly => base.checked_add_months(Months::new(n)),
        RepeatType::Yearly => base.checked_add_months(Months::new(n.checked_mul(12)?)),
    }
}

/// Translate a repeat count into the equivalent inclusive end date.
pub fn until_for_count(base: NaiveDate, repeat_type: RepeatType, count: u32) -> Result<NaiveDate, CalendarError> {
    if count == 0 {
        return Err(CalendarError::InvalidRecurrenceRule(
            "repeat_count must be at least 1".to_string(),
        ));
    }
    nth_date(base, repeat_type, count - 1).ok_or_else(|| {
        CalendarError::InvalidRecurrenceRule(format!("repeat_count {} runs past the supported date range", count))
    })
}

/// Expand a stored event using its own `repeat_type` and `repeat_until`.
///
/// A non-recurring event yields a single occurrence. `horizon` caps the
/// expansion at an inclusive date; a recurring event without `repeat_until`
/// can only be expanded with a horizon.
pub fn expand(base: &Event, horizon: Option<NaiveDate>) -> Result<Vec<Occurrence>, CalendarError> {
    expand_filtered(base, horizon, |_| true)
}

/// Occurrences of `base` that overlap `range`.
pub fn occurrences_in(base: &Event, range: &DateRange) -> Result<Vec<Occurrence>, CalendarError> {
    expand_filtered(base, Some(range.last_date()), |schedule| {
        let (start, end) = schedule.span();
        overlaps(range.start, range.end, start, end)
    })
}

/// Expand `base` with an explicit rule, ignoring the event's own
/// recurrence fields.
pub fn expand_with_rule(
    base: &Event,
    rule: &RecurrenceRule,
    horizon: Option<NaiveDate>,
) -> Result<Vec<Occurrence>, CalendarError> {
    materialize(base, rule, horizon, |_| true)
}

fn expand_filtered(
    base: &Event,
    horizon: Option<NaiveDate>,
    keep: impl Fn(&Schedule) -> bool,
) -> Result<Vec<Occurrence>, CalendarError> {
    match base.repeat_type {
        Some(repeat_type) => {
            let rule = RecurrenceRule {
                repeat_type,
                end: base.repeat_until.map(RepeatEnd::Until),
            };
            materialize(base, &rule, horizon, keep)
        }
        None if base.repeat_until.is_some() => Err(CalendarError::InvalidRecurrenceRule(
            "repeat_until is set but repeat_type is none".to_string(),
        )),
        None => {
            let in_horizon = horizon.is_none_or(|h| base.schedule.start_date() <= h);
            Ok(if in_horizon && keep(&base.schedule) {
                vec![occurrence(base, base.schedule)]
            } else {
                Vec::new()
            })
        }
    }
}

/// Walk the series up to its end condition or `horizon`, whichever comes
/// first. Only occurrences passing `keep` are returned and counted.
fn materialize(
    base: &Event,
    rule: &RecurrenceRule,
    horizon: Option<NaiveDate>,
    keep: impl Fn(&Schedule) -> bool,
) -> Result<Vec<Occurrence>, CalendarError> {
    let first = base.schedule.start_date();
    let until = match rule.end {
        Some(RepeatEnd::Until(date)) => Some(date),
        Some(RepeatEnd::Count(count)) => Some(until_for_count(first, rule.repeat_type, count)?),
        None => None,
    };
    if let Some(until) = until {
        if until < first {
            return Err(CalendarError::InvalidRecurrenceRule(format!(
                "repeat_until {} is before the event start {}",
                until, first
            )));
        }
    }
    let limit = match (until, horizon) {
        (Some(u), Some(h)) => u.min(h),
        (Some(u), None) => u,
        (None, Some(h)) => h,
        (None, None) => {
            return Err(CalendarError::InvalidRecurrenceRule(
                "a recurring event needs repeat_until, repeat_count or a horizon".to_string(),
            ));
        }
    };

    let mut occurrences = Vec::new();
    for n in 0.. {
        let Some(date) = nth_date(first, rule.repeat_type, n) else {
            break;
        };
        if date > limit {
            break;
        }
        let schedule = base.schedule.moved_to(date).ok_or_else(|| {
            CalendarError::InvalidRecurrenceRule(format!("occurrence on {} is out of range", date))
        })?;
        if !keep(&schedule) {
            continue;
        }
        if occurrences.len() == MAX_OCCURRENCES {
            return Err(CalendarError::InvalidRecurrenceRule(format!(
                "expansion exceeds {} occurrences",
                MAX_OCCURRENCES
            )));
        }
        occurrences.push(occurrence(base, schedule));
    }
    Ok(occurrences)
}

/// Expand a raw record. Records that cannot be interpreted fail as an
/// invalid rule rather than falling back to the base event alone.
pub fn expand_record(record: &EventRecord, horizon: Option<NaiveDate>) -> Result<Vec<Occurrence>, CalendarError> {
    let event = Event::try_from(record.clone()).map_err(|e| match e {
        CalendarError::MalformedRecord { reason, .. } => CalendarError::InvalidRecurrenceRule(reason),
        other => other,
    })?;
    expand(&event, horizon)
}

fn occurrence(base: &Event, schedule: Schedule) -> Occurrence {
    Occurrence {
        id: format!("{}-{}", base.id, nanoid!(8)),
        title: base.title.clone(),
        schedule,
        repeat_type: base.repeat_type,
        repeat_until: base.repeat_until,
        original_event_id: base.id,
        created_at: base.created_at,
        updated_at: base.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone, Utc};
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn created() -> NaiveDateTime {
        date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap()
    }

    fn timed(start: &str, end: &str, repeat_type: Option<RepeatType>, until: Option<NaiveDate>) -> Event {
        Event {
            id: 1,
            title: "Standup".to_string(),
            schedule: Schedule::parse(false, Some(start), Some(end)).unwrap(),
            repeat_type,
            repeat_until: until,
            original_event_id: None,
            created_at: created(),
            updated_at: created(),
        }
    }

    fn start_dates(occurrences: &[Occurrence]) -> Vec<NaiveDate> {
        occurrences.iter().map(|o| o.schedule.start_date()).collect()
    }

    #[test]
    fn standup_expands_to_three_daily_occurrences() {
        let base = timed(
            "2024-01-01T09:00",
            "2024-01-01T09:15",
            Some(RepeatType::Daily),
            Some(date(2024, 1, 3)),
        );
        let occurrences = expand(&base, None).unwrap();

        assert_eq!(
            start_dates(&occurrences),
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)]
        );
        for occ in &occurrences {
            assert_eq!(occ.schedule.duration(), chrono::Duration::minutes(15));
            assert_eq!(occ.original_event_id, 1);
            assert_ne!(occ.id, "1");
        }
        assert_eq!(
            occurrences[2].schedule,
            Schedule::Timed {
                start: Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 1, 3, 9, 15, 0).unwrap(),
            }
        );
    }

    #[test]
    fn monthly_clamps_to_month_end_and_returns_to_anchor() {
        let base = timed(
            "2024-01-31T18:00",
            "2024-01-31T20:30",
            Some(RepeatType::Monthly),
            None,
        );
        let rule = RecurrenceRule {
            repeat_type: RepeatType::Monthly,
            end: Some(RepeatEnd::Count(4)),
        };
        let occurrences = expand_with_rule(&base, &rule, None).unwrap();

        assert_eq!(
            start_dates(&occurrences),
            vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]
        );
        for occ in &occurrences {
            assert_eq!(occ.schedule.duration(), chrono::Duration::minutes(150));
        }
    }

    #[test]
    fn monthly_clamps_to_feb_28_in_common_year() {
        let base = timed("2023-01-31T08:00", "2023-01-31T09:00", Some(RepeatType::Monthly), None);
        let rule = RecurrenceRule {
            repeat_type: RepeatType::Monthly,
            end: Some(RepeatEnd::Count(3)),
        };
        let occurrences = expand_with_rule(&base, &rule, None).unwrap();
        assert_eq!(
            start_dates(&occurrences),
            vec![date(2023, 1, 31), date(2023, 2, 28), date(2023, 3, 31)]
        );
    }

    #[test_case(RepeatType::Daily, 3 => date(2024, 1, 4) ; "daily")]
    #[test_case(RepeatType::Weekly, 2 => date(2024, 1, 15) ; "weekly")]
    #[test_case(RepeatType::Monthly, 1 => date(2024, 2, 1) ; "monthly")]
    #[test_case(RepeatType::Yearly, 1 => date(2025, 1, 1) ; "yearly")]
    fn step_rules(repeat_type: RepeatType, n: u32) -> NaiveDate {
        nth_date(date(2024, 1, 1), repeat_type, n).unwrap()
    }

    #[test]
    fn yearly_leap_day_clamps_in_common_years() {
        let dates: Vec<_> = (0..5)
            .map(|n| nth_date(date(2024, 2, 29), RepeatType::Yearly, n).unwrap())
            .collect();
        assert_eq!(
            dates,
            vec![
                date(2024, 2, 29),
                date(2025, 2, 28),
                date(2026, 2, 28),
                date(2027, 2, 28),
                date(2028, 2, 29)
            ]
        );
    }

    #[test]
    fn count_matches_equivalent_until() {
        let base = timed("2024-01-01T09:00", "2024-01-01T10:00", Some(RepeatType::Weekly), None);
        let by_count = expand_with_rule(
            &base,
            &RecurrenceRule {
                repeat_type: RepeatType::Weekly,
                end: Some(RepeatEnd::Count(4)),
            },
            None,
        )
        .unwrap();
        let until = date(2024, 1, 1) + chrono::Duration::days(3 * 7);
        let by_until = expand_with_rule(
            &base,
            &RecurrenceRule {
                repeat_type: RepeatType::Weekly,
                end: Some(RepeatEnd::Until(until)),
            },
            None,
        )
        .unwrap();

        assert_eq!(by_count.len(), 4);
        assert_eq!(start_dates(&by_count), start_dates(&by_until));
    }

    #[test]
    fn expansion_is_repeatable() {
        let base = timed(
            "2024-01-01T09:00",
            "2024-01-01T09:30",
            Some(RepeatType::Weekly),
            Some(date(2024, 3, 1)),
        );
        let strip = |occs: Vec<Occurrence>| {
            occs.into_iter()
                .map(|o| Occurrence { id: String::new(), ..o })
                .collect::<Vec<_>>()
        };
        assert_eq!(
            strip(expand(&base, None).unwrap()),
            strip(expand(&base, None).unwrap())
        );
    }

    #[test]
    fn until_is_inclusive_of_the_whole_day() {
        let base = timed(
            "2024-01-01T23:00",
            "2024-01-01T23:30",
            Some(RepeatType::Daily),
            Some(date(2024, 1, 2)),
        );
        assert_eq!(expand(&base, None).unwrap().len(), 2);
    }

    #[test]
    fn all_day_occurrences_keep_their_length() {
        let base = Event {
            schedule: Schedule::parse(true, Some("2024-05-10"), Some("2024-05-11")).unwrap(),
            ..timed("2024-05-10T00:00", "2024-05-10T01:00", Some(RepeatType::Weekly), Some(date(2024, 5, 24)))
        };
        let occurrences = expand(&base, None).unwrap();
        assert_eq!(occurrences.len(), 3);
        assert_eq!(
            occurrences[2].schedule,
            Schedule::AllDay {
                start: date(2024, 5, 24),
                end: date(2024, 5, 25)
            }
        );
    }

    #[test]
    fn horizon_caps_expansion() {
        let base = timed("2024-01-01T09:00", "2024-01-01T10:00", Some(RepeatType::Daily), None);
        assert!(matches!(
            expand(&base, None),
            Err(CalendarError::InvalidRecurrenceRule(_))
        ));
        assert_eq!(expand(&base, Some(date(2024, 1, 10))).unwrap().len(), 10);
    }

    #[test]
    fn window_skips_early_occurrences_without_counting_them() {
        let base = timed(
            "2000-01-01T09:00",
            "2000-01-01T10:00",
            Some(RepeatType::Daily),
            Some(date(2100, 1, 1)),
        );
        let range = DateRange::from_args("2024-03-01", "2024-03-07").unwrap();
        let occurrences = occurrences_in(&base, &range).unwrap();
        assert_eq!(occurrences.len(), 7);
        assert_eq!(occurrences[0].schedule.start_date(), date(2024, 3, 1));
        assert_eq!(occurrences[6].schedule.start_date(), date(2024, 3, 7));
    }

    #[test]
    fn window_keeps_occurrences_spilling_into_it() {
        let overnight = timed(
            "2024-01-01T22:00",
            "2024-01-02T02:00",
            Some(RepeatType::Weekly),
            Some(date(2024, 2, 1)),
        );
        let range = DateRange::from_args("2024-01-09", "2024-01-09").unwrap();
        let occurrences = occurrences_in(&overnight, &range).unwrap();
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].schedule.start_date(), date(2024, 1, 8));
    }

    #[test]
    fn last_occurrence_spills_past_until() {
        let overnight = timed(
            "2024-01-01T22:00",
            "2024-01-02T02:00",
            Some(RepeatType::Weekly),
            Some(date(2024, 1, 8)),
        );
        let day_after = DateRange::from_args("2024-01-09", "2024-01-09").unwrap();
        let occurrences = occurrences_in(&overnight, &day_after).unwrap();
        assert_eq!(start_dates(&occurrences), vec![date(2024, 1, 8)]);

        let retreat = Event {
            schedule: Schedule::parse(true, Some("2024-02-01"), Some("2024-02-02")).unwrap(),
            ..timed("2024-02-01T00:00", "2024-02-01T01:00", Some(RepeatType::Weekly), Some(date(2024, 2, 8)))
        };
        let second_day = DateRange::from_args("2024-02-09", "2024-02-09").unwrap();
        let occurrences = occurrences_in(&retreat, &second_day).unwrap();
        assert_eq!(start_dates(&occurrences), vec![date(2024, 2, 8)]);

        let beyond = DateRange::from_args("2024-02-10", "2024-02-10").unwrap();
        assert!(occurrences_in(&retreat, &beyond).unwrap().is_empty());
    }

    #[test]
    fn non_recurring_event_is_a_single_occurrence() {
        let base = timed("2024-01-01T09:00", "2024-01-01T10:00", None, None);
        let occurrences = expand(&base, None).unwrap();
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].schedule, base.schedule);
        assert!(expand(&base, Some(date(2023, 12, 31))).unwrap().is_empty());
    }

    #[test]
    fn contradictory_rules_are_rejected() {
        let until_before_start = timed(
            "2024-01-10T09:00",
            "2024-01-10T10:00",
            Some(RepeatType::Daily),
            Some(date(2024, 1, 1)),
        );
        assert!(matches!(
            expand(&until_before_start, None),
            Err(CalendarError::InvalidRecurrenceRule(_))
        ));

        let until_without_type = timed("2024-01-10T09:00", "2024-01-10T10:00", None, Some(date(2024, 2, 1)));
        assert!(matches!(
            expand(&until_without_type, None),
            Err(CalendarError::InvalidRecurrenceRule(_))
        ));

        assert!(until_for_count(date(2024, 1, 1), RepeatType::Daily, 0).is_err());
    }

    #[test]
    fn runaway_expansion_fails_instead_of_truncating() {
        let base = timed("2000-01-01T09:00", "2000-01-01T10:00", Some(RepeatType::Daily), Some(date(2100, 1, 1)));
        assert!(matches!(
            expand(&base, None),
            Err(CalendarError::InvalidRecurrenceRule(_))
        ));
    }

    #[test]
    fn record_without_start_is_an_invalid_rule() {
        let record = EventRecord {
            id: 3,
            title: "Broken".to_string(),
            start_time: None,
            end_time: Some("2024-01-01T10:00:00Z".to_string()),
            is_all_day: false,
            repeat_type: Some("daily".to_string()),
            repeat_until: Some("2024-01-05".to_string()),
            original_event_id: None,
            created_at: created(),
            updated_at: created(),
        };
        assert!(matches!(
            expand_record(&record, None),
            Err(CalendarError::InvalidRecurrenceRule(_))
        ));

        let malformed_until = EventRecord {
            start_time: Some("2024-01-01T09:00:00Z".to_string()),
            repeat_until: Some("someday".to_string()),
            ..record
        };
        assert!(matches!(
            expand_record(&malformed_until, None),
            Err(CalendarError::InvalidRecurrenceRule(_))
        ));
    }
}
