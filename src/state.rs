use crate::db::{EventStore, TodoStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub events: Arc<dyn EventStore>,
    pub todos: Arc<dyn TodoStore>,
}

impl AppState {
    pub fn new(events: Arc<dyn EventStore>, todos: Arc<dyn TodoStore>) -> Self {
        Self { events, todos }
    }
}
