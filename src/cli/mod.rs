//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Ingesting instrument file exports
//! - Reading channel windows
//! - Listing and deleting datasets

pub mod commands;
pub mod handlers;

pub use handlers::{dispatch, init_logging};
