pub mod cache;
pub mod calendar;
pub mod links;
pub mod model;
pub mod progress;
pub mod service;
pub mod streak;

pub use crate::service::{HabitService, HabitServiceBuilder};
