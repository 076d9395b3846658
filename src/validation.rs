//! Field-level checks for events and todos.
//!
//! Every rule runs; the caller gets the complete list of violations.

use crate::error::CalendarError;
use crate::models::{EventDraft, NewEvent, NewTodo, RepeatType, Schedule, TodoDraft};
use crate::recurrence::until_for_count;
use crate::time::{parse_date, parse_timestamp};
use serde::Serialize;

pub const MAX_TITLE_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub fn validate(draft: &EventDraft) -> Validation {
    let errors = match check_event(draft) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    };
    Validation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Validate and convert a draft into an insertable event.
pub fn new_event(draft: &EventDraft) -> Result<NewEvent, CalendarError> {
    check_event(draft).map_err(CalendarError::Validation)
}

pub fn new_todo(draft: &TodoDraft) -> Result<NewTodo, CalendarError> {
    let mut errors = Vec::new();
    check_title(draft.title.as_deref(), &mut errors);
    let due_date = match present(&draft.due_date) {
        Some(s) => {
            let parsed = parse_date(s);
            if parsed.is_none() {
                errors.push(format!("due_date '{}' is not a valid date", s));
            }
            parsed
        }
        None => None,
    };

    if !errors.is_empty() {
        return Err(CalendarError::Validation(errors));
    }
    Ok(NewTodo {
        title: draft.title.as_deref().unwrap_or_default().trim().to_string(),
        due_date,
        completed: draft.completed.unwrap_or(false),
    })
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn check_title(title: Option<&str>, errors: &mut Vec<String>) {
    match title.map(str::trim) {
        None | Some("") => errors.push("title is required".to_string()),
        Some(t) if t.chars().count() > MAX_TITLE_LEN => {
            errors.push(format!("title must be at most {} characters", MAX_TITLE_LEN))
        }
        Some(_) => {}
    }
}

fn check_event(draft: &EventDraft) -> Result<NewEvent, Vec<String>> {
    let mut errors = Vec::new();
    check_title(draft.title.as_deref(), &mut errors);

    let is_all_day = draft.is_all_day.unwrap_or(false);
    let start = present(&draft.start_time);
    let end = present(&draft.end_time);

    let schedule = if is_all_day {
        let start_date = match start {
            None => {
                errors.push("start_time is required".to_string());
                None
            }
            Some(s) => {
                let d = parse_date(s);
                if d.is_none() {
                    errors.push(format!("start_time '{}' is not a valid date", s));
                }
                d
            }
        };
        let end_date = match end {
            None => start_date,
            Some(e) => {
                let d = parse_date(e);
                if d.is_none() {
                    errors.push(format!("end_time '{}' is not a valid date", e));
                }
                d
            }
        };
        match (start_date, end_date) {
            (Some(start), Some(end)) if end < start => {
                errors.push("end_time must not be before start_time".to_string());
                None
            }
            (Some(start), Some(end)) => Some(Schedule::AllDay { start, end }),
            _ => None,
        }
    } else {
        let start_at = match start {
            None => {
                errors.push("start_time is required".to_string());
                None
            }
            Some(s) => {
                let t = parse_timestamp(s);
                if t.is_none() {
                    errors.push(format!("start_time '{}' is not a valid timestamp", s));
                }
                t
            }
        };
        let end_at = match end {
            None => {
                errors.push("end_time is required".to_string());
                None
            }
            Some(e) => {
                let t = parse_timestamp(e);
                if t.is_none() {
                    errors.push(format!("end_time '{}' is not a valid timestamp", e));
                }
                t
            }
        };
        match (start_at, end_at) {
            (Some(start), Some(end)) if end <= start => {
                errors.push("end_time must be after start_time".to_string());
                None
            }
            (Some(start), Some(end)) => Some(Schedule::Timed { start, end }),
            _ => None,
        }
    };

    let repeat_type = match present(&draft.repeat_type) {
        Some(t) => RepeatType::parse(t).unwrap_or_else(|e| {
            errors.push(e);
            None
        }),
        None => None,
    };
    let repeat_type_is_valid = present(&draft.repeat_type).is_none_or(|t| RepeatType::parse(t).is_ok());

    let mut repeat_until = match present(&draft.repeat_until) {
        Some(s) => match parse_date(s) {
            Some(until) => {
                if schedule.is_some_and(|sch| until < sch.start_date()) {
                    errors.push("repeat_until must not be before start_time".to_string());
                }
                Some(until)
            }
            None => {
                errors.push(format!("repeat_until '{}' is not a valid date", s));
                None
            }
        },
        None => None,
    };

    let has_until = present(&draft.repeat_until).is_some();
    match (repeat_type, has_until, draft.repeat_count) {
        (_, true, Some(_)) => {
            errors.push("repeat_until and repeat_count cannot both be given".to_string())
        }
        (_, _, Some(0)) => errors.push("repeat_count must be at least 1".to_string()),
        (Some(_), false, None) => {
            errors.push("a recurring event needs repeat_until or repeat_count".to_string())
        }
        (None, true, _) | (None, _, Some(_)) if repeat_type_is_valid => {
            errors.push("repeat_until and repeat_count require a repeat_type".to_string())
        }
        _ => {}
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Every failure above pushes an error, so these are populated here.
    let (Some(schedule), Some(title)) = (schedule, draft.title.as_deref()) else {
        return Err(vec!["event could not be interpreted".to_string()]);
    };
    if let (Some(repeat_type), Some(count)) = (repeat_type, draft.repeat_count) {
        repeat_until = Some(until_for_count(schedule.start_date(), repeat_type, count).map_err(|e| vec![e.to_string()])?);
    }

    Ok(NewEvent {
        title: title.trim().to_string(),
        schedule,
        repeat_type,
        repeat_until,
    })
}
