//! Storage module for PtyRelay
//!
//! - `json`: JSON config file loading

mod json;

pub use json::JsonStore;
