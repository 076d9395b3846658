use crate::config::Config;
use crate::error::AppError;
use crate::models::{Event, EventRecord, NewEvent, NewTodo, Todo};
use crate::time::DateRange;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

const EVENT_COLUMNS: &str = "id, title, start_time, end_time, is_all_day, repeat_type, \
     repeat_until, original_event_id, created_at, updated_at";

/// Storage for calendar events.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), AppError>;
    async fn list(&self) -> Result<Vec<Event>, AppError>;
    /// Events with any instance that may overlap `range`, including the
    /// tail of a series' last instance past its `repeat_until` day.
    async fn list_in_range(&self, range: &DateRange) -> Result<Vec<Event>, AppError>;
    async fn find(&self, id: i64) -> Result<Option<Event>, AppError>;
    async fn create(&self, event: &NewEvent) -> Result<Event, AppError>;
    async fn update(&self, id: i64, event: &NewEvent) -> Result<Option<Event>, AppError>;
    async fn delete(&self, id: i64) -> Result<Option<Event>, AppError>;
    async fn search(&self, term: &str) -> Result<Vec<Event>, AppError>;
    async fn upcoming(&self, after: DateTime<Utc>, limit: i64) -> Result<Vec<Event>, AppError>;
    async fn count(&self) -> Result<i64, AppError>;
}

/// Storage for todos.
#[async_trait]
pub trait TodoStore: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<Todo>, AppError>;
    async fn find(&self, id: i64) -> Result<Option<Todo>, AppError>;
    async fn create(&self, todo: &NewTodo) -> Result<Todo, AppError>;
    async fn update(&self, id: i64, todo: &NewTodo) -> Result<Option<Todo>, AppError>;
    async fn toggle(&self, id: i64) -> Result<Option<Todo>, AppError>;
    async fn delete(&self, id: i64) -> Result<Option<Todo>, AppError>;
    async fn delete_completed(&self) -> Result<Vec<Todo>, AppError>;
    async fn list_by_status(&self, completed: bool) -> Result<Vec<Todo>, AppError>;
    async fn search(&self, term: &str) -> Result<Vec<Todo>, AppError>;
}

pub async fn connect(config: &Config) -> Result<SqlitePool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS calendar_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            is_all_day BOOLEAN NOT NULL DEFAULT 0,
            repeat_type TEXT,
            repeat_until TEXT,
            original_event_id INTEGER,
            span_start TEXT NOT NULL,
            span_end TEXT NOT NULL,
            series_end TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_calendar_events_span ON calendar_events (span_start, series_end);")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS todos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            due_date DATE,
            completed BOOLEAN NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )
    .execute(pool)
    .await?;

    info!("database schema ready");
    Ok(())
}

/// SQLite-backed store for events and todos.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn into_events(records: Vec<EventRecord>) -> Result<Vec<Event>, AppError> {
    records
        .into_iter()
        .map(|r| Event::try_from(r).map_err(AppError::from))
        .collect()
}

fn into_event(record: Option<EventRecord>) -> Result<Option<Event>, AppError> {
    record.map(Event::try_from).transpose().map_err(AppError::from)
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM calendar_events ORDER BY span_start ASC");
        let records: Vec<EventRecord> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        into_events(records)
    }

    async fn list_in_range(&self, range: &DateRange) -> Result<Vec<Event>, AppError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM calendar_events
             WHERE span_start < ? AND (series_end IS NULL OR series_end > ?)
             ORDER BY span_start ASC"
        );
        let records: Vec<EventRecord> = sqlx::query_as(&sql)
            .bind(range.end)
            .bind(range.start)
            .fetch_all(&self.pool)
            .await?;
        into_events(records)
    }

    async fn find(&self, id: i64) -> Result<Option<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM calendar_events WHERE id = ?");
        let record: Option<EventRecord> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        into_event(record)
    }

    async fn create(&self, event: &NewEvent) -> Result<Event, AppError> {
        let (span_start, span_end) = event.schedule.span();
        let sql = format!(
            "INSERT INTO calendar_events
                (title, start_time, end_time, is_all_day, repeat_type, repeat_until, span_start, span_end, series_end)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {EVENT_COLUMNS}"
        );
        let record: EventRecord = sqlx::query_as(&sql)
            .bind(&event.title)
            .bind(event.schedule.start_string())
            .bind(event.schedule.end_string())
            .bind(event.schedule.is_all_day())
            .bind(event.repeat_type.map(|t| t.as_str()))
            .bind(event.repeat_until)
            .bind(span_start)
            .bind(span_end)
            .bind(event.series_end())
            .fetch_one(&self.pool)
            .await?;
        debug!(id = record.id, title = %record.title, "inserted event");
        Ok(Event::try_from(record)?)
    }

    async fn update(&self, id: i64, event: &NewEvent) -> Result<Option<Event>, AppError> {
        let (span_start, span_end) = event.schedule.span();
        let sql = format!(
            "UPDATE calendar_events
             SET title = ?, start_time = ?, end_time = ?, is_all_day = ?, repeat_type = ?,
                 repeat_until = ?, span_start = ?, span_end = ?, series_end = ?,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?
             RETURNING {EVENT_COLUMNS}"
        );
        let record: Option<EventRecord> = sqlx::query_as(&sql)
            .bind(&event.title)
            .bind(event.schedule.start_string())
            .bind(event.schedule.end_string())
            .bind(event.schedule.is_all_day())
            .bind(event.repeat_type.map(|t| t.as_str()))
            .bind(event.repeat_until)
            .bind(span_start)
            .bind(span_end)
            .bind(event.series_end())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        into_event(record)
    }

    async fn delete(&self, id: i64) -> Result<Option<Event>, AppError> {
        let sql = format!("DELETE FROM calendar_events WHERE id = ? RETURNING {EVENT_COLUMNS}");
        let record: Option<EventRecord> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        into_event(record)
    }

    async fn search(&self, term: &str) -> Result<Vec<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM calendar_events WHERE title LIKE ? ORDER BY span_start ASC");
        let records: Vec<EventRecord> = sqlx::query_as(&sql)
            .bind(format!("%{}%", term))
            .fetch_all(&self.pool)
            .await?;
        into_events(records)
    }

    async fn upcoming(&self, after: DateTime<Utc>, limit: i64) -> Result<Vec<Event>, AppError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM calendar_events WHERE span_start > ? ORDER BY span_start ASC LIMIT ?"
        );
        let records: Vec<EventRecord> = sqlx::query_as(&sql)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        into_events(records)
    }

    async fn count(&self) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM calendar_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl TodoStore for SqliteStore {
    async fn list(&self) -> Result<Vec<Todo>, AppError> {
        sqlx::query_as("SELECT * FROM todos ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)
    }

    async fn find(&self, id: i64) -> Result<Option<Todo>, AppError> {
        sqlx::query_as("SELECT * FROM todos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)
    }

    async fn create(&self, todo: &NewTodo) -> Result<Todo, AppError> {
        let todo: Todo =
            sqlx::query_as("INSERT INTO todos (title, due_date, completed) VALUES (?, ?, ?) RETURNING *")
                .bind(&todo.title)
                .bind(todo.due_date)
                .bind(todo.completed)
                .fetch_one(&self.pool)
                .await?;
        debug!(id = todo.id, "inserted todo");
        Ok(todo)
    }

    async fn update(&self, id: i64, todo: &NewTodo) -> Result<Option<Todo>, AppError> {
        sqlx::query_as(
            "UPDATE todos SET title = ?, due_date = ?, completed = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? RETURNING *",
        )
        .bind(&todo.title)
        .bind(todo.due_date)
        .bind(todo.completed)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)
    }

    async fn toggle(&self, id: i64) -> Result<Option<Todo>, AppError> {
        sqlx::query_as(
            "UPDATE todos SET completed = NOT completed, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)
    }

    async fn delete(&self, id: i64) -> Result<Option<Todo>, AppError> {
        sqlx::query_as("DELETE FROM todos WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)
    }

    async fn delete_completed(&self) -> Result<Vec<Todo>, AppError> {
        let mut tx = self.pool.begin().await?;
        let deleted: Vec<Todo> = sqlx::query_as("DELETE FROM todos WHERE completed = 1 RETURNING *")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn list_by_status(&self, completed: bool) -> Result<Vec<Todo>, AppError> {
        sqlx::query_as("SELECT * FROM todos WHERE completed = ? ORDER BY id DESC")
            .bind(completed)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)
    }

    async fn search(&self, term: &str) -> Result<Vec<Todo>, AppError> {
        sqlx::query_as("SELECT * FROM todos WHERE title LIKE ? ORDER BY id DESC")
            .bind(format!("%{}%", term))
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)
    }
}
