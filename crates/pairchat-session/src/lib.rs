//! Chat session orchestration.
//!
//! A [`ChatSession`] owns exactly one transport connection and one
//! transcript, and folds transport events into the transcript in arrival
//! order.

pub mod manager;

pub use manager::{ChatSession, SessionId, SessionSnapshot};
