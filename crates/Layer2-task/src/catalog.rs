//! Language catalog - languages the OCR tool reports as installed

use relay_foundation::LanguageProbeConfig;
use serde::Serialize;
use tokio::process::Command;
use tracing::{info, warn};

/// Installed languages, probed once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LanguageCatalog {
    languages: Vec<String>,
}

impl LanguageCatalog {
    /// Run the configured listing command. Any failure yields an empty catalog.
    pub async fn probe(config: &LanguageProbeConfig) -> Self {
        let Some(program) = &config.program else {
            return Self::default();
        };

        let output = match Command::new(program).args(&config.args).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("Language probe `{}` could not run: {}", program, e);
                return Self::default();
            }
        };

        if !output.status.success() {
            warn!("Language probe `{}` exited with {}", program, output.status);
            return Self::default();
        }

        let catalog = Self::parse(&String::from_utf8_lossy(&output.stdout));
        if catalog.is_empty() {
            warn!("Language probe `{}` reported no languages", program);
        } else {
            info!(count = catalog.len(), "Discovered installed languages");
        }
        catalog
    }

    /// First line is a header; blank lines are skipped
    pub fn parse(output: &str) -> Self {
        let languages = output
            .lines()
            .skip(1)
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        Self { languages }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

impl From<Vec<String>> for LanguageCatalog {
    fn from(languages: Vec<String>) -> Self {
        Self { languages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_header_and_blanks() {
        let output = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\n\n deu \nosd\n";
        let catalog = LanguageCatalog::parse(output);
        assert_eq!(catalog.languages(), ["eng", "deu", "osd"]);
    }

    #[test]
    fn test_parse_header_only() {
        assert!(LanguageCatalog::parse("List of available languages (0):\n").is_empty());
        assert!(LanguageCatalog::parse("").is_empty());
    }

    #[test]
    fn test_serializes_as_array() {
        let catalog = LanguageCatalog::from(vec!["eng".to_string()]);
        assert_eq!(serde_json::to_string(&catalog).unwrap(), r#"["eng"]"#);
    }

    #[tokio::test]
    async fn test_probe_missing_program_is_empty() {
        let config = LanguageProbeConfig {
            program: Some("definitely-not-installed-xyz".to_string()),
            args: vec![],
        };
        assert!(LanguageCatalog::probe(&config).await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_runs_command() {
        let config = LanguageProbeConfig {
            program: Some("/bin/sh".to_string()),
            args: vec!["-c".to_string(), "printf 'header\\neng\\nfra\\n'".to_string()],
        };
        let catalog = LanguageCatalog::probe(&config).await;
        assert_eq!(catalog.languages(), ["eng", "fra"]);
    }
}
