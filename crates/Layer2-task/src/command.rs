//! Command line construction from task attributes

use crate::task::TaskRecord;
use relay_foundation::CommandConfig;

/// Terminal type advertised to every child
pub const TERM_ENV: (&str, &str) = ("TERM", "xterm-256color");

/// Program, arguments and environment overrides for one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Applied over the inherited environment, in order
    pub env: Vec<(String, String)>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: vec![(TERM_ENV.0.to_string(), TERM_ENV.1.to_string())],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `[language_flag langs] [toggle flags...] source output`
    pub fn for_task(config: &CommandConfig, record: &TaskRecord) -> Self {
        let mut cmd = Self::new(&config.program);

        if !record.options.languages.is_empty() {
            cmd = cmd
                .arg(&config.language_flag)
                .arg(record.options.languages.join(&config.language_separator));
        }

        for toggle in &config.toggles {
            if record.options.is_enabled(&toggle.name) {
                cmd = cmd.arg(&toggle.flag);
            }
        }

        for (key, value) in &config.env {
            cmd = cmd.env(key, value);
        }

        cmd.arg(record.source_path.to_string_lossy())
            .arg(record.output_path.to_string_lossy())
    }

    /// Shell-like rendering for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
