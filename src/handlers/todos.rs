use super::SearchQuery;
use crate::{
    error::AppError,
    models::{Todo, TodoDraft},
    state::AppState,
    validation,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::{info, warn};

fn todo_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Todo with id {} does not exist", id))
}

pub async fn get_todos(State(app_state): State<AppState>) -> Result<Json<Vec<Todo>>, AppError> {
    app_state.todos.list().await.map(Json)
}

pub async fn get_todo(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, AppError> {
    app_state
        .todos
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| todo_not_found(id))
}

pub async fn create_todo_handler(
    State(app_state): State<AppState>,
    Json(draft): Json<TodoDraft>,
) -> Result<(StatusCode, Json<Todo>), AppError> {
    let new_todo = validation::new_todo(&draft).inspect_err(|e| warn!(error = %e, "todo rejected"))?;
    let todo = app_state.todos.create(&new_todo).await?;
    info!(id = todo.id, "created todo");
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn update_todo_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<TodoDraft>,
) -> Result<Json<Todo>, AppError> {
    let existing = app_state
        .todos
        .find(id)
        .await?
        .ok_or_else(|| todo_not_found(id))?;
    let new_todo = validation::new_todo(&patch.merged_over(&existing))?;
    app_state
        .todos
        .update(id, &new_todo)
        .await?
        .map(Json)
        .ok_or_else(|| todo_not_found(id))
}

pub async fn toggle_todo_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, AppError> {
    let todo = app_state
        .todos
        .toggle(id)
        .await?
        .ok_or_else(|| todo_not_found(id))?;
    info!(id, completed = todo.completed, "toggled todo");
    Ok(Json(todo))
}

#[derive(Serialize)]
pub struct DeleteTodoResponse {
    message: &'static str,
    deleted_todo: Todo,
}

pub async fn delete_todo_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteTodoResponse>, AppError> {
    let deleted_todo = app_state
        .todos
        .delete(id)
        .await?
        .ok_or_else(|| todo_not_found(id))?;
    Ok(Json(DeleteTodoResponse {
        message: "Todo deleted successfully",
        deleted_todo,
    }))
}

#[derive(Serialize)]
pub struct DeleteCompletedResponse {
    message: String,
    deleted_todos: Vec<Todo>,
}

pub async fn delete_completed_todos(
    State(app_state): State<AppState>,
) -> Result<Json<DeleteCompletedResponse>, AppError> {
    let deleted_todos = app_state.todos.delete_completed().await?;
    info!(count = deleted_todos.len(), "cleared completed todos");
    Ok(Json(DeleteCompletedResponse {
        message: format!("Successfully deleted {} completed todos", deleted_todos.len()),
        deleted_todos,
    }))
}

pub async fn get_todos_by_status(
    State(app_state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<Todo>>, AppError> {
    let completed = match status.as_str() {
        "completed" => true,
        "pending" => false,
        other => {
            return Err(AppError::BadRequest(format!(
                "Unknown status '{}', expected completed or pending",
                other
            )));
        }
    };
    app_state.todos.list_by_status(completed).await.map(Json)
}

pub async fn search_todos(
    State(app_state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Todo>>, AppError> {
    let term = query.term()?;
    if term.is_empty() {
        return Ok(Json(Vec::new()));
    }
    app_state.todos.search(&term).await.map(Json)
}

#[derive(Serialize)]
pub struct TodoStats {
    total: usize,
    completed: usize,
    pending: usize,
}

pub async fn get_todo_stats(State(app_state): State<AppState>) -> Result<Json<TodoStats>, AppError> {
    let todos = app_state.todos.list().await?;
    let completed = todos.iter().filter(|t| t.completed).count();
    Ok(Json(TodoStats {
        total: todos.len(),
        completed,
        pending: todos.len() - completed,
    }))
}
