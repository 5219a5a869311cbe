//! Core of the dietlog tracker: meal plans, the calorie and weight rules,
//! and the append-only history log.

pub mod chart;
pub mod energy;
pub mod error;
pub mod history;
pub mod models;
pub mod plans;
pub mod service;

pub use error::TrackerError;
pub use history::HistoryStore;
pub use plans::PlanConfig;
pub use service::{DayView, Tracker};
