//! Kanban steward — keeps a card-tracking board self-maintaining.

pub mod board;
pub mod config;
pub mod error;
pub mod steward;
