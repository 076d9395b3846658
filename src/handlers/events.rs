use super::SearchQuery;
use crate::{
    conflict,
    error::AppError,
    models::{Event, EventDraft, Occurrence, Schedule},
    recurrence,
    state::AppState,
    time::{DateRange, parse_date},
    validation,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_UPCOMING_LIMIT: i64 = 5;
const MAX_UPCOMING_LIMIT: i64 = 100;
const STATS_UPCOMING_WINDOW: i64 = 10;

fn event_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Event with id {} does not exist", id))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    start: Option<String>,
    end: Option<String>,
}

impl RangeQuery {
    fn range(&self) -> Result<DateRange, AppError> {
        match (self.start.as_deref(), self.end.as_deref()) {
            (Some(start), Some(end)) => DateRange::from_args(start, end).map_err(AppError::BadRequest),
            _ => Err(AppError::BadRequest(
                "Please provide both start and end".to_string(),
            )),
        }
    }
}

/// Whether `schedule` overlaps any stored event or occurrence, ignoring
/// everything owned by `exclude_id`.
async fn is_conflicting(
    app_state: &AppState,
    schedule: &Schedule,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let (start, end) = schedule.span();
    let range = DateRange { start, end };
    let mut occupied = Vec::new();
    for event in app_state.events.list_in_range(&range).await? {
        occupied.extend(recurrence::occurrences_in(&event, &range)?);
    }
    Ok(conflict::has_conflict(start, end, &occupied, exclude_id))
}

pub async fn get_events(State(app_state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    let events = app_state.events.list().await?;
    info!(count = events.len(), "fetched events");
    Ok(Json(events))
}

pub async fn get_event(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, AppError> {
    app_state
        .events
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| event_not_found(id))
}

/// Dry-run validation for editors. Always 200; the body says whether the
/// draft would be accepted.
pub async fn validate_event_handler(Json(draft): Json<EventDraft>) -> Json<validation::Validation> {
    Json(validation::validate(&draft))
}

pub async fn create_event_handler(
    State(app_state): State<AppState>,
    Json(draft): Json<EventDraft>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let new_event = validation::new_event(&draft).inspect_err(|e| warn!(error = %e, "event rejected"))?;

    if is_conflicting(&app_state, &new_event.schedule, None).await? {
        warn!(title = %new_event.title, "time conflict for new event");
        return Err(AppError::Conflict(
            "Event time conflicts with existing events".to_string(),
        ));
    }

    let event = app_state.events.create(&new_event).await?;
    info!(id = event.id, title = %event.title, "created event");
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<EventDraft>,
) -> Result<Json<Event>, AppError> {
    let existing = app_state
        .events
        .find(id)
        .await?
        .ok_or_else(|| event_not_found(id))?;

    let merged = patch.merged_over(&existing);
    let new_event = validation::new_event(&merged).inspect_err(|e| warn!(id, error = %e, "event update rejected"))?;

    if is_conflicting(&app_state, &new_event.schedule, Some(id)).await? {
        warn!(id, "time conflict for event update");
        return Err(AppError::Conflict(
            "Updated event time conflicts with existing events".to_string(),
        ));
    }

    let event = app_state
        .events
        .update(id, &new_event)
        .await?
        .ok_or_else(|| event_not_found(id))?;
    info!(id, "updated event");
    Ok(Json(event))
}

#[derive(Serialize)]
pub struct DeleteEventResponse {
    message: &'static str,
    deleted_event: Event,
}

pub async fn delete_event_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteEventResponse>, AppError> {
    let deleted_event = app_state
        .events
        .delete(id)
        .await?
        .ok_or_else(|| event_not_found(id))?;
    info!(id, "deleted event");
    Ok(Json(DeleteEventResponse {
        message: "Event deleted successfully",
        deleted_event,
    }))
}

pub async fn get_events_in_range(
    State(app_state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let range = query.range()?;
    Ok(Json(app_state.events.list_in_range(&range).await?))
}

pub async fn get_occurrences_in_range(
    State(app_state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<Occurrence>>, AppError> {
    let range = query.range()?;
    let mut occurrences = Vec::new();
    for event in app_state.events.list_in_range(&range).await? {
        occurrences.extend(recurrence::occurrences_in(&event, &range)?);
    }
    occurrences.sort_by_key(|o| o.schedule.span().0);
    Ok(Json(occurrences))
}

#[derive(Debug, Deserialize)]
pub struct HorizonQuery {
    until: Option<String>,
}

pub async fn get_event_occurrences(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<HorizonQuery>,
) -> Result<Json<Vec<Occurrence>>, AppError> {
    let horizon = match query.until.as_deref() {
        Some(s) => Some(parse_date(s).ok_or_else(|| AppError::BadRequest(format!("Invalid until date '{}'", s)))?),
        None => None,
    };
    let event = app_state
        .events
        .find(id)
        .await?
        .ok_or_else(|| event_not_found(id))?;
    Ok(Json(recurrence::expand(&event, horizon)?))
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    limit: Option<i64>,
}

pub async fn get_upcoming_events(
    State(app_state): State<AppState>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_UPCOMING_LIMIT)
        .clamp(1, MAX_UPCOMING_LIMIT);
    Ok(Json(app_state.events.upcoming(Utc::now(), limit).await?))
}

pub async fn search_events(
    State(app_state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let term = query.term()?;
    if term.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let events = app_state.events.search(&term).await?;
    info!(term = %term, count = events.len(), "searched events");
    Ok(Json(events))
}

#[derive(Serialize)]
pub struct EventStats {
    total: i64,
    upcoming: usize,
    today: usize,
    next_event: Option<Event>,
}

pub async fn get_event_stats(State(app_state): State<AppState>) -> Result<Json<EventStats>, AppError> {
    let now = Utc::now();
    let total = app_state.events.count().await?;
    let upcoming = app_state.events.upcoming(now, STATS_UPCOMING_WINDOW).await?;
    let today = upcoming
        .iter()
        .filter(|e| e.schedule.start_date() == now.date_naive())
        .count();

    Ok(Json(EventStats {
        total,
        upcoming: upcoming.len(),
        today,
        next_event: upcoming.into_iter().next(),
    }))
}

#[derive(Debug, Serialize)]
pub struct Availability {
    is_available: bool,
    has_conflict: bool,
}

/// `id` is the event being edited, or `new` when checking a slot for an
/// event that does not exist yet.
pub async fn check_event_availability(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Availability>, AppError> {
    let exclude_id = match id.as_str() {
        "new" => None,
        other => Some(
            other
                .parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("Invalid event id '{}'", other)))?,
        ),
    };
    let range = query.range()?;
    let schedule = Schedule::Timed {
        start: range.start,
        end: range.end,
    };

    let has_conflict = is_conflicting(&app_state, &schedule, exclude_id).await?;
    info!(?exclude_id, has_conflict, "checked availability");
    Ok(Json(Availability {
        is_available: !has_conflict,
        has_conflict,
    }))
}
