//! Config - unified service configuration
//!
//! - `relay.rs` - RelayConfig and its sections

mod relay;

pub use relay::{
    CommandConfig, LanguageProbeConfig, PtyConfig, RelayConfig, ToggleFlag, TtlConfig,
    RELAY_CONFIG_FILE,
};
