//! Recurring-timetable conflict detection and time-driven status lifecycle
//! for class and quiz sessions.

pub mod api;
pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod observability;
pub mod scheduler;
pub mod wal;
