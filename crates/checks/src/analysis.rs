use std::{path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use lintbridge_core::{Error, Result, models::AnalysisReport};
use tokio::{process::Command, time::timeout};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AnalysisMode {
    Report,
    Autocorrect,
}

/// Runs the external linter against a working copy.
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    async fn run(&self, target: &Path, mode: AnalysisMode) -> Result<AnalysisReport>;
}

/// RuboCop with its JSON formatter.
#[derive(Debug, Clone)]
pub struct RuboCop {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl RuboCop {
    /// `command` is split on whitespace, so wrappers like `bundle exec rubocop` work.
    pub fn new(command: &str, timeout: Duration) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Configuration("Analysis command is empty".into()))?;
        Ok(Self { program, args: parts.collect(), timeout })
    }

    fn command(&self, target: &Path, mode: AnalysisMode) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).args([".", "--format", "json"]);
        if mode == AnalysisMode::Autocorrect {
            command.arg("--autocorrect");
        }
        command
            .current_dir(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl AnalysisRunner for RuboCop {
    async fn run(&self, target: &Path, mode: AnalysisMode) -> Result<AnalysisReport> {
        tracing::info!("Running {} ({:?}) in {}", self.program, mode, target.display());
        let output = timeout(self.timeout, self.command(target, mode).output())
            .await
            .map_err(|_| Error::Timeout { operation: "analysis", seconds: self.timeout.as_secs() })?
            .map_err(|e| Error::Tool(format!("Failed to run {}: {e}", self.program)))?;
        // 0: clean, 1: offenses found, anything else: the tool itself failed.
        match output.status.code() {
            Some(0 | 1) => {}
            _ => {
                return Err(Error::Tool(format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
        }
        let mut report = parse_report(&output.stdout)?;
        report.strip_path_prefix(&target.to_string_lossy());
        tracing::info!(
            "{} found {} offenses in {} files",
            self.program,
            report.summary.offense_count,
            report.summary.inspected_file_count
        );
        Ok(report)
    }
}

pub fn parse_report(stdout: &[u8]) -> Result<AnalysisReport> {
    serde_json::from_slice(stdout)
        .map_err(|e| Error::Tool(format!("Malformed analysis output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_split() {
        let rubocop = RuboCop::new("bundle exec rubocop", Duration::from_secs(1)).unwrap();
        assert_eq!(rubocop.program, "bundle");
        assert_eq!(rubocop.args, ["exec", "rubocop"]);
        assert!(matches!(
            RuboCop::new("   ", Duration::from_secs(1)),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_command_args() {
        let rubocop = RuboCop::new("rubocop", Duration::from_secs(1)).unwrap();
        let command = rubocop.command(Path::new("/tmp"), AnalysisMode::Autocorrect);
        let args: Vec<_> =
            command.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, [".", "--format", "json", "--autocorrect"]);
        let command = rubocop.command(Path::new("/tmp"), AnalysisMode::Report);
        assert_eq!(command.as_std().get_args().count(), 3);
    }

    #[test]
    fn test_parse_report() {
        let report = parse_report(
            br#"{"metadata":{"rubocop_version":"1.60.0"},"files":[],
                 "summary":{"offense_count":0,"target_file_count":0,"inspected_file_count":0}}"#,
        )
        .unwrap();
        assert_eq!(report.metadata.tool_version, "1.60.0");
        assert!(matches!(parse_report(b"Error: unknown cop"), Err(Error::Tool(_))));
        assert!(matches!(parse_report(b""), Err(Error::Tool(_))));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let rubocop =
            RuboCop::new("lintbridge-no-such-analysis-tool", Duration::from_secs(5)).unwrap();
        let result = rubocop.run(&std::env::temp_dir(), AnalysisMode::Report).await;
        assert!(matches!(result, Err(Error::Tool(_))));
    }
}
