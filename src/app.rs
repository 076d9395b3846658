use crate::{
    handlers::{self, events, todos},
    state::AppState,
};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use std::path::Path;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub fn router(app_state: AppState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/events",
            get(events::get_events).post(events::create_event_handler),
        )
        .route("/api/events/validate", post(events::validate_event_handler))
        .route("/api/events/range", get(events::get_events_in_range))
        .route("/api/events/occurrences", get(events::get_occurrences_in_range))
        .route("/api/events/upcoming", get(events::get_upcoming_events))
        .route("/api/events/search", get(events::search_events))
        .route("/api/events/stats", get(events::get_event_stats))
        .route(
            "/api/events/{id}",
            get(events::get_event)
                .put(events::update_event_handler)
                .delete(events::delete_event_handler),
        )
        .route("/api/events/{id}/occurrences", get(events::get_event_occurrences))
        .route("/api/events/{id}/availability", get(events::check_event_availability))
        .route(
            "/api/todos",
            get(todos::get_todos).post(todos::create_todo_handler),
        )
        .route("/api/todos/completed", delete(todos::delete_completed_todos))
        .route("/api/todos/status/{status}", get(todos::get_todos_by_status))
        .route("/api/todos/search", get(todos::search_todos))
        .route("/api/todos/stats", get(todos::get_todo_stats))
        .route(
            "/api/todos/{id}",
            get(todos::get_todo)
                .put(todos::update_todo_handler)
                .delete(todos::delete_todo_handler),
        )
        .route("/api/todos/{id}/toggle", patch(todos::toggle_todo_handler))
        .with_state(app_state);

    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
