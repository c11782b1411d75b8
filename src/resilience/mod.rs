//! Resilience for store connectivity.
//!
//! # Responsibilities
//! - Space out attempts to re-establish a lost store watch
//!
//! # Design Decisions
//! - Exponential backoff with jitter, capped
//! - Backoff resets after the first successful delivery

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
