//! # relay-foundation
//!
//! Foundation layer for PtyRelay:
//! - Error: shared error type and `Result` alias
//! - Storage: JSON file store
//! - Config: service configuration (`RelayConfig`)

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    CommandConfig, LanguageProbeConfig, PtyConfig, RelayConfig, ToggleFlag, TtlConfig,
    RELAY_CONFIG_FILE,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;
