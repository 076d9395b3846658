//! Calendar and todo HTTP service with recurring event expansion.

pub mod app;
pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod recurrence;
pub mod state;
pub mod time;
pub mod validation;
