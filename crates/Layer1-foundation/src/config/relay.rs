//! Relay Config - service configuration
//!
//! Loaded from `relay.json` (explicit path, or the global config directory),
//! every field falls back to its default when absent.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name
pub const RELAY_CONFIG_FILE: &str = "relay.json";

// ============================================================================
// Relay Config
// ============================================================================

/// PtyRelay service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    /// Address the HTTP server binds to
    pub bind_address: String,

    /// Root for uploads/output/index; defaults to the executable's directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,

    /// Uploaded source artifacts, relative to the data root
    pub uploads_dir: String,

    /// Produced output artifacts, relative to the data root
    pub output_dir: String,

    /// Static page served at `/`, relative to the data root
    pub index_html: String,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Upload size cap in megabytes
    pub max_upload_mb: usize,

    /// Seconds between expiry sweeps
    pub sweep_interval_secs: u64,

    pub ttl: TtlConfig,
    pub command: CommandConfig,
    pub pty: PtyConfig,
    pub languages: LanguageProbeConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_root: None,
            uploads_dir: "files".to_string(),
            output_dir: "output".to_string(),
            index_html: "index.html".to_string(),
            log_level: "info".to_string(),
            max_upload_mb: 32,
            sweep_interval_secs: 60,
            ttl: TtlConfig::default(),
            command: CommandConfig::default(),
            pty: PtyConfig::default(),
            languages: LanguageProbeConfig::default(),
        }
    }
}

impl RelayConfig {
    // ========================================================================
    // Load
    // ========================================================================

    /// Load from an explicit file, else the global `relay.json`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        Error::Config(format!("Invalid config path: {}", path.display()))
                    })?;
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                JsonStore::new(dir).load::<RelayConfig>(file_name)?
            }
            None => match JsonStore::global() {
                Ok(store) => store
                    .load_optional::<RelayConfig>(RELAY_CONFIG_FILE)?
                    .unwrap_or_default(),
                Err(e) => {
                    tracing::debug!("No global config directory: {}", e);
                    Self::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.command.program.trim().is_empty() {
            return Err(Error::Config("command.program must not be empty".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "sweepIntervalSecs must be greater than zero".to_string(),
            ));
        }
        if self.pty.rows == 0 || self.pty.cols == 0 {
            return Err(Error::Config("pty rows and cols must be non-zero".to_string()));
        }
        if self.max_upload_mb == 0 {
            return Err(Error::Config("maxUploadMb must be greater than zero".to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Data root: configured value, else the executable's directory
    pub fn resolve_data_root(&self) -> PathBuf {
        if let Some(root) = &self.data_root {
            return root.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.resolve_data_root().join(&self.uploads_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve_data_root().join(&self.output_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        self.resolve_data_root().join(&self.index_html)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

// ============================================================================
// TTL
// ============================================================================

/// Expiry windows applied at each lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TtlConfig {
    /// After upload
    pub created_secs: u64,
    /// After an execution finishes
    pub completed_secs: u64,
    /// After the artifact has been downloaded
    pub retrieved_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            created_secs: 30 * 60,
            completed_secs: 10 * 60,
            retrieved_secs: 3 * 60,
        }
    }
}

impl TtlConfig {
    pub fn created(&self) -> Duration {
        Duration::from_secs(self.created_secs)
    }

    pub fn completed(&self) -> Duration {
        Duration::from_secs(self.completed_secs)
    }

    pub fn retrieved(&self) -> Duration {
        Duration::from_secs(self.retrieved_secs)
    }
}

// ============================================================================
// Command
// ============================================================================

/// Boolean task option mapped to a command-line flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleFlag {
    /// Option name as submitted by the client (`deskew`)
    pub name: String,
    /// Flag passed to the program (`--deskew`)
    pub flag: String,
}

impl ToggleFlag {
    pub fn new(name: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flag: flag.into(),
        }
    }
}

/// External program invoked for each task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandConfig {
    pub program: String,
    pub language_flag: String,
    pub language_separator: String,
    /// Emitted in this order when enabled on a task
    pub toggles: Vec<ToggleFlag>,
    /// Extra environment for the child, applied over the inherited one
    pub env: BTreeMap<String, String>,
    /// Prefix for the output artifact and its download name
    pub output_prefix: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: "ocrmypdf".to_string(),
            language_flag: "-l".to_string(),
            language_separator: "+".to_string(),
            toggles: vec![
                ToggleFlag::new("deskew", "--deskew"),
                ToggleFlag::new("rotate", "--rotate-pages"),
                ToggleFlag::new("force", "--force-ocr"),
            ],
            env: BTreeMap::new(),
            output_prefix: "ocr_".to_string(),
        }
    }
}

impl CommandConfig {
    /// Names of all configured toggles, in flag order
    pub fn toggle_names(&self) -> impl Iterator<Item = &str> {
        self.toggles.iter().map(|t| t.name.as_str())
    }
}

// ============================================================================
// PTY
// ============================================================================

/// Terminal geometry and cancellation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PtyConfig {
    pub rows: u16,
    pub cols: u16,
    /// Upper bound on waiting for a killed child; `None` waits indefinitely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_grace_secs: Option<u64>,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            kill_grace_secs: None,
        }
    }
}

impl PtyConfig {
    pub fn kill_grace(&self) -> Option<Duration> {
        self.kill_grace_secs.map(Duration::from_secs)
    }
}

// ============================================================================
// Language probe
// ============================================================================

/// Command listing the languages the external tool supports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LanguageProbeConfig {
    /// `None` disables the probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub args: Vec<String>,
}

impl Default for LanguageProbeConfig {
    fn default() -> Self {
        Self {
            program: Some("tesseract".to_string()),
            args: vec!["--list-langs".to_string()],
        }
    }
}
