//! Core domain types and utilities for hearth.
//!
//! This crate provides the identifiers and the error-handling foundation
//! shared by the conversation crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationId, ParseIdError};
