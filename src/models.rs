use crate::error::CalendarError;
use crate::time::{end_of_day, format_date, format_timestamp, parse_date, parse_timestamp, start_of_day};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RepeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatType::Daily => "daily",
            RepeatType::Weekly => "weekly",
            RepeatType::Monthly => "monthly",
            RepeatType::Yearly => "yearly",
        }
    }

    /// Parse a wire value. `none` and blank mean no recurrence.
    pub fn parse(s: &str) -> Result<Option<RepeatType>, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(None),
            "daily" => Ok(Some(RepeatType::Daily)),
            "weekly" => Ok(Some(RepeatType::Weekly)),
            "monthly" => Ok(Some(RepeatType::Monthly)),
            "yearly" => Ok(Some(RepeatType::Yearly)),
            other => Err(format!(
                "repeat_type '{}' must be one of none, daily, weekly, monthly, yearly",
                other
            )),
        }
    }
}

impl fmt::Display for RepeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When an event happens. All-day end dates are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "ScheduleFields")]
pub enum Schedule {
    Timed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    AllDay {
        start: NaiveDate,
        end: NaiveDate,
    },
}

#[derive(Serialize)]
struct ScheduleFields {
    start_time: String,
    end_time: String,
    is_all_day: bool,
}

impl From<Schedule> for ScheduleFields {
    fn from(schedule: Schedule) -> Self {
        ScheduleFields {
            start_time: schedule.start_string(),
            end_time: schedule.end_string(),
            is_all_day: schedule.is_all_day(),
        }
    }
}

impl Schedule {
    /// Build a schedule from wire strings. A missing all-day end means a
    /// single-day event.
    pub fn parse(is_all_day: bool, start: Option<&str>, end: Option<&str>) -> Result<Self, String> {
        let start = start
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| "start_time is required".to_string())?;
        let end = end.filter(|s| !s.trim().is_empty());

        if is_all_day {
            let start = parse_date(start).ok_or_else(|| format!("start_time '{}' is not a valid date", start))?;
            let end = match end {
                Some(e) => parse_date(e).ok_or_else(|| format!("end_time '{}' is not a valid date", e))?,
                None => start,
            };
            Ok(Schedule::AllDay { start, end })
        } else {
            let start = parse_timestamp(start)
                .ok_or_else(|| format!("start_time '{}' is not a valid timestamp", start))?;
            let end = end.ok_or_else(|| "end_time is required".to_string())?;
            let end = parse_timestamp(end).ok_or_else(|| format!("end_time '{}' is not a valid timestamp", end))?;
            Ok(Schedule::Timed { start, end })
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, Schedule::AllDay { .. })
    }

    pub fn start_date(&self) -> NaiveDate {
        match self {
            Schedule::Timed { start, .. } => start.date_naive(),
            Schedule::AllDay { start, .. } => *start,
        }
    }

    /// Half-open UTC interval covered by the event. All-day events cover
    /// whole days.
    pub fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Schedule::Timed { start, end } => (*start, *end),
            Schedule::AllDay { start, end } => (start_of_day(*start), end_of_day(*end)),
        }
    }

    pub fn duration(&self) -> TimeDelta {
        let (start, end) = self.span();
        end - start
    }

    /// The same appointment moved to `date`, keeping time of day and length.
    pub fn moved_to(&self, date: NaiveDate) -> Option<Schedule> {
        match self {
            Schedule::Timed { start, end } => {
                let new_start = date.and_time(start.time()).and_utc();
                let new_end = new_start.checked_add_signed(*end - *start)?;
                Some(Schedule::Timed {
                    start: new_start,
                    end: new_end,
                })
            }
            Schedule::AllDay { start, end } => {
                let days = (*end - *start).num_days().max(0) as u64;
                Some(Schedule::AllDay {
                    start: date,
                    end: date.checked_add_days(Days::new(days))?,
                })
            }
        }
    }

    pub fn start_string(&self) -> String {
        match self {
            Schedule::Timed { start, .. } => format_timestamp(start),
            Schedule::AllDay { start, .. } => format_date(start),
        }
    }

    pub fn end_string(&self) -> String {
        match self {
            Schedule::Timed { end, .. } => format_timestamp(end),
            Schedule::AllDay { end, .. } => format_date(end),
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    #[serde(flatten)]
    pub schedule: Schedule,
    pub repeat_type: Option<RepeatType>,
    pub repeat_until: Option<NaiveDate>,
    /// Link to a base event. Occurrences are never stored, so requests
    /// cannot set it.
    pub original_event_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Event {
    pub fn is_recurring(&self) -> bool {
        self.repeat_type.is_some()
    }
}

/// Raw event row as stored, before its times are interpreted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub title: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_all_day: bool,
    pub repeat_type: Option<String>,
    pub repeat_until: Option<String>,
    pub original_event_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<EventRecord> for Event {
    type Error = CalendarError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let id = record.id;
        let schedule = Schedule::parse(
            record.is_all_day,
            record.start_time.as_deref(),
            record.end_time.as_deref(),
        )
        .map_err(|reason| CalendarError::MalformedRecord { id, reason })?;
        let repeat_type = match record.repeat_type.as_deref() {
            Some(s) => RepeatType::parse(s).map_err(CalendarError::InvalidRecurrenceRule)?,
            None => None,
        };
        let repeat_until = match record.repeat_until.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => Some(parse_date(s).ok_or_else(|| {
                CalendarError::InvalidRecurrenceRule(format!("repeat_until '{}' is not a valid date", s))
            })?),
            None => None,
        };

        Ok(Event {
            id,
            title: record.title,
            schedule,
            repeat_type,
            repeat_until,
            original_event_id: record.original_event_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Request body for creating or patching an event. Every field is optional
/// so the validator can report all missing pieces at once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventDraft {
    pub title: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_all_day: Option<bool>,
    pub repeat_type: Option<String>,
    pub repeat_until: Option<String>,
    pub repeat_count: Option<u32>,
}

impl EventDraft {
    /// Overlay this patch on an existing event, producing the full state to
    /// re-validate. Giving a new end condition, or `repeat_type: none`,
    /// replaces the stored `repeat_until`.
    pub fn merged_over(self, existing: &Event) -> EventDraft {
        let clears_repeat = self
            .repeat_type
            .as_deref()
            .is_some_and(|t| matches!(RepeatType::parse(t), Ok(None)));
        let replaces_end = self.repeat_until.is_some() || self.repeat_count.is_some();
        let current = EventDraft::from(existing);

        EventDraft {
            title: self.title.or(current.title),
            start_time: self.start_time.or(current.start_time),
            end_time: self.end_time.or(current.end_time),
            is_all_day: self.is_all_day.or(current.is_all_day),
            repeat_until: if clears_repeat || replaces_end {
                self.repeat_until
            } else {
                current.repeat_until
            },
            repeat_type: self.repeat_type.or(current.repeat_type),
            repeat_count: self.repeat_count,
        }
    }
}

impl From<&Event> for EventDraft {
    fn from(event: &Event) -> Self {
        EventDraft {
            title: Some(event.title.clone()),
            start_time: Some(event.schedule.start_string()),
            end_time: Some(event.schedule.end_string()),
            is_all_day: Some(event.schedule.is_all_day()),
            repeat_type: event.repeat_type.map(|t| t.to_string()),
            repeat_until: event.repeat_until.as_ref().map(format_date),
            repeat_count: None,
        }
    }
}

/// A validated event ready to be written. A repeat count has already been
/// turned into `repeat_until`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub schedule: Schedule,
    pub repeat_type: Option<RepeatType>,
    pub repeat_until: Option<NaiveDate>,
}

impl NewEvent {
    /// Latest instant any instance of this event can cover: the end of the
    /// instance moved to `repeat_until`, which may run past that day.
    /// `None` for a series with no end date.
    pub fn series_end(&self) -> Option<DateTime<Utc>> {
        match (self.repeat_type, self.repeat_until) {
            (None, _) => Some(self.schedule.span().1),
            (Some(_), Some(until)) => Some(
                self.schedule
                    .moved_to(until)
                    .map_or(DateTime::<Utc>::MAX_UTC, |last| last.span().1),
            ),
            (Some(_), None) => None,
        }
    }
}

/// One materialized instance of an event. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub schedule: Schedule,
    pub repeat_type: Option<RepeatType>,
    pub repeat_until: Option<NaiveDate>,
    pub original_event_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoDraft {
    pub title: Option<String>,
    pub due_date: Option<String>,
    pub completed: Option<bool>,
}

impl TodoDraft {
    /// Overlay this patch on an existing todo. An empty `due_date` clears it.
    pub fn merged_over(self, existing: &Todo) -> TodoDraft {
        let due_date = match self.due_date {
            Some(d) if d.trim().is_empty() => None,
            Some(d) => Some(d),
            None => existing.due_date.as_ref().map(format_date),
        };
        TodoDraft {
            title: self.title.or_else(|| Some(existing.title.clone())),
            due_date,
            completed: self.completed.or(Some(existing.completed)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTodo {
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn standup() -> Event {
        Event {
            id: 7,
            title: "Standup".to_string(),
            schedule: Schedule::Timed {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 1, 1, 9, 15, 0).unwrap(),
            },
            repeat_type: Some(RepeatType::Daily),
            repeat_until: NaiveDate::from_ymd_opt(2024, 1, 3),
            original_event_id: None,
            created_at: timestamp(),
            updated_at: timestamp(),
        }
    }

    #[test]
    fn event_serializes_to_wire_shape() {
        let value = serde_json::to_value(standup()).unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["start_time"], json!("2024-01-01T09:00:00Z"));
        assert_eq!(value["end_time"], json!("2024-01-01T09:15:00Z"));
        assert_eq!(value["is_all_day"], json!(false));
        assert_eq!(value["repeat_type"], json!("daily"));
        assert_eq!(value["repeat_until"], json!("2024-01-03"));
        assert_eq!(value["original_event_id"], json!(null));
    }

    #[test]
    fn all_day_schedule_covers_whole_days() {
        let schedule = Schedule::parse(true, Some("2024-03-10"), None).unwrap();
        let (start, end) = schedule.span();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());

        let value = serde_json::to_value(schedule).unwrap();
        assert_eq!(value["start_time"], json!("2024-03-10"));
        assert_eq!(value["end_time"], json!("2024-03-10"));
        assert_eq!(value["is_all_day"], json!(true));
    }

    #[test]
    fn moved_to_keeps_time_and_length() {
        let event = standup();
        let moved = event
            .schedule
            .moved_to(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
            .unwrap();
        assert_eq!(
            moved,
            Schedule::Timed {
                start: Utc.with_ymd_and_hms(2024, 2, 29, 9, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 2, 29, 9, 15, 0).unwrap(),
            }
        );
    }

    #[test]
    fn repeat_type_parse() {
        assert_eq!(RepeatType::parse("weekly"), Ok(Some(RepeatType::Weekly)));
        assert_eq!(RepeatType::parse("none"), Ok(None));
        assert_eq!(RepeatType::parse(""), Ok(None));
        assert!(RepeatType::parse("fortnightly").is_err());
    }

    #[test]
    fn record_with_bad_repeat_until_is_rejected() {
        let record = EventRecord {
            id: 1,
            title: "x".to_string(),
            start_time: Some("2024-01-01T09:00:00Z".to_string()),
            end_time: Some("2024-01-01T10:00:00Z".to_string()),
            is_all_day: false,
            repeat_type: Some("daily".to_string()),
            repeat_until: Some("next week".to_string()),
            original_event_id: None,
            created_at: timestamp(),
            updated_at: timestamp(),
        };
        assert!(matches!(
            Event::try_from(record),
            Err(CalendarError::InvalidRecurrenceRule(_))
        ));
    }

    #[test]
    fn patch_with_none_clears_recurrence() {
        let patch = EventDraft {
            repeat_type: Some("none".to_string()),
            ..Default::default()
        };
        let merged = patch.merged_over(&standup());
        assert_eq!(merged.title.as_deref(), Some("Standup"));
        assert_eq!(merged.repeat_type.as_deref(), Some("none"));
        assert_eq!(merged.repeat_until, None);
    }

    #[test]
    fn series_end_covers_last_instance_past_midnight() {
        let overnight = NewEvent {
            title: "Night shift".to_string(),
            schedule: Schedule::parse(false, Some("2024-01-01T22:00"), Some("2024-01-02T02:00")).unwrap(),
            repeat_type: Some(RepeatType::Weekly),
            repeat_until: NaiveDate::from_ymd_opt(2024, 1, 8),
        };
        assert_eq!(
            overnight.series_end(),
            Some(Utc.with_ymd_and_hms(2024, 1, 9, 2, 0, 0).unwrap())
        );

        let retreat = NewEvent {
            title: "Retreat".to_string(),
            schedule: Schedule::parse(true, Some("2024-01-01"), Some("2024-01-02")).unwrap(),
            repeat_type: Some(RepeatType::Weekly),
            repeat_until: NaiveDate::from_ymd_opt(2024, 1, 8),
        };
        assert_eq!(
            retreat.series_end(),
            Some(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap())
        );

        let single = NewEvent {
            repeat_type: None,
            repeat_until: None,
            ..overnight
        };
        assert_eq!(
            single.series_end(),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap())
        );
    }

    #[test]
    fn patch_keeps_untouched_fields() {
        let patch = EventDraft {
            title: Some("Daily sync".to_string()),
            ..Default::default()
        };
        let merged = patch.merged_over(&standup());
        assert_eq!(merged.title.as_deref(), Some("Daily sync"));
        assert_eq!(merged.start_time.as_deref(), Some("2024-01-01T09:00:00Z"));
        assert_eq!(merged.repeat_type.as_deref(), Some("daily"));
        assert_eq!(merged.repeat_until.as_deref(), Some("2024-01-03"));
    }
}
