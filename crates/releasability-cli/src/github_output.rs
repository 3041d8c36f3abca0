//! Step outputs for GitHub Actions.
//!
//! Outputs are appended to the file named by `GITHUB_OUTPUT`. Without it
//! they are dropped, so the binary also runs outside a workflow.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";
const MULTILINE_DELIMITER: &str = "EOF";

pub struct GithubOutput {
    path: Option<PathBuf>,
}

impl GithubOutput {
    pub fn from_env() -> Self {
        Self {
            path: std::env::var_os(GITHUB_OUTPUT_ENV).map(PathBuf::from),
        }
    }

    pub fn to_file(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Write `name=value`.
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        self.append(&format!("{name}={value}\n"))
    }

    /// Write a value spanning several lines using the heredoc form.
    pub fn set_multiline(&self, name: &str, value: &str) -> Result<()> {
        self.append(&format!(
            "{name}<<{MULTILINE_DELIMITER}\n{value}\n{MULTILINE_DELIMITER}\n"
        ))
    }

    fn append(&self, text: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open step output file {}", path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to write step output {}", path.display()))
    }
}
