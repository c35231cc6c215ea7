use std::{
    fs::File,
    io::BufReader,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub checks: ChecksConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self { Self { bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: 3000 } }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr { SocketAddr::new(self.bind, self.port) }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub app_id: String,
    pub webhook_secret: String,
    pub private_key: String,
    pub api_base_url: String,
    pub check_name: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            webhook_secret: String::new(),
            private_key: String::new(),
            api_base_url: "https://api.github.com".to_string(),
            check_name: "Octo RuboCop".to_string(),
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("app_id", &self.app_id)
            .field("webhook_secret", &"[redacted]")
            .field("private_key", &"[redacted]")
            .field("api_base_url", &self.api_base_url)
            .field("check_name", &self.check_name)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// Parent directory for per-delivery working copies.
    pub work_dir: PathBuf,
    /// Analysis tool invocation, split on whitespace (e.g. `bundle exec rubocop`).
    pub rubocop_command: String,
    pub commit_author_name: String,
    pub commit_author_email: String,
    pub commit_message: String,
    pub clone_timeout_secs: u64,
    pub analysis_timeout_secs: u64,
    pub push_timeout_secs: u64,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("lintbridge"),
            rubocop_command: "rubocop".to_string(),
            commit_author_name: "Octo RuboCop".to_string(),
            commit_author_email: "octo-rubocop@users.noreply.github.com".to_string(),
            commit_message: "Automatically fix Octo RuboCop notices.".to_string(),
            clone_timeout_secs: 300,
            analysis_timeout_secs: 600,
            push_timeout_secs: 120,
        }
    }
}

impl ChecksConfig {
    pub fn clone_timeout(&self) -> Duration { Duration::from_secs(self.clone_timeout_secs) }

    pub fn analysis_timeout(&self) -> Duration { Duration::from_secs(self.analysis_timeout_secs) }

    pub fn push_timeout(&self) -> Duration { Duration::from_secs(self.push_timeout_secs) }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of check runs analyzed at once.
    pub concurrency: usize,
    /// Deliveries waiting for a worker before new ones are refused.
    pub queue_capacity: usize,
    /// How long queued and in-flight jobs may keep running after shutdown is requested. Must
    /// cover a clone plus an analysis run, or those check runs are left `in_progress`.
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 4, queue_capacity: 64, shutdown_timeout_secs: 1200 }
    }
}

impl WorkerConfig {
    pub fn shutdown_timeout(&self) -> Duration { Duration::from_secs(self.shutdown_timeout_secs) }
}

impl Config {
    /// Load `path` if it exists, then apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let file = BufReader::new(File::open(path).map_err(|e| {
                Error::Configuration(format!("Failed to open {}: {e}", path.display()))
            })?);
            serde_yaml::from_reader(file).map_err(|e| {
                Error::Configuration(format!("Failed to parse {}: {e}", path.display()))
            })?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables, looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(app_id) = var("GITHUB_APP_IDENTIFIER") {
            self.github.app_id = app_id;
        }
        if let Some(secret) = var("GITHUB_WEBHOOK_SECRET") {
            self.github.webhook_secret = secret;
        }
        if let Some(key) = var("GITHUB_PRIVATE_KEY") {
            // Keys passed through a single-line env var carry escaped newlines.
            self.github.private_key = key.replace("\\n", "\n");
        }
        if let Some(bind) = var("LINTBRIDGE_BIND") {
            self.server.bind = bind
                .parse()
                .map_err(|e| Error::Configuration(format!("Invalid LINTBRIDGE_BIND: {e}")))?;
        }
        if let Some(port) = var("LINTBRIDGE_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Configuration(format!("Invalid LINTBRIDGE_PORT: {e}")))?;
        }
        if let Some(work_dir) = var("LINTBRIDGE_WORK_DIR") {
            self.checks.work_dir = PathBuf::from(work_dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.app_id.trim().is_empty() {
            return Err(Error::Configuration("GitHub App identifier is not set".into()));
        }
        if self.github.webhook_secret.is_empty() {
            return Err(Error::Configuration("Webhook secret is not set".into()));
        }
        if self.github.private_key.trim().is_empty() {
            return Err(Error::Configuration("GitHub App private key is not set".into()));
        }
        if self.worker.concurrency == 0 || self.worker.queue_capacity == 0 {
            return Err(Error::Configuration(
                "Worker concurrency and queue capacity must be non-zero".into(),
            ));
        }
        let longest_job = self.checks.clone_timeout_secs + self.checks.analysis_timeout_secs;
        if self.worker.shutdown_timeout_secs < longest_job {
            return Err(Error::Configuration(format!(
                "Worker shutdown timeout ({}s) is shorter than a clone plus an analysis run ({}s)",
                self.worker.shutdown_timeout_secs, longest_job
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("GITHUB_APP_IDENTIFIER", "1234"),
                ("GITHUB_WEBHOOK_SECRET", "s3cret"),
                ("GITHUB_PRIVATE_KEY", "-----BEGIN-----\\nabc\\n-----END-----"),
                ("LINTBRIDGE_PORT", "8080"),
                ("LINTBRIDGE_BIND", "127.0.0.1"),
            ]))
            .unwrap();
        assert_eq!(config.github.app_id, "1234");
        assert_eq!(config.github.webhook_secret, "s3cret");
        assert_eq!(config.github.private_key, "-----BEGIN-----\nabc\n-----END-----");
        assert_eq!(config.server.addr(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_port() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("LINTBRIDGE_PORT", "http")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_missing_credentials() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_yaml_defaults() {
        let config: Config = serde_yaml::from_str(
            "github:\n  app_id: \"42\"\n  webhook_secret: x\n  private_key: y\nworker:\n  concurrency: 2\n",
        )
        .unwrap();
        assert_eq!(config.github.check_name, "Octo RuboCop");
        assert_eq!(config.worker.concurrency, 2);
        assert_eq!(config.worker.queue_capacity, 64);
        assert_eq!(config.worker.shutdown_timeout(), Duration::from_secs(1200));
        assert_eq!(config.server.port, 3000);
        config.validate().unwrap();
    }

    #[test]
    fn test_shutdown_timeout_covers_jobs() {
        let mut config: Config = serde_yaml::from_str(
            "github:\n  app_id: \"42\"\n  webhook_secret: x\n  private_key: y\n",
        )
        .unwrap();
        config.worker.shutdown_timeout_secs = 30;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        config.worker.shutdown_timeout_secs =
            config.checks.clone_timeout_secs + config.checks.analysis_timeout_secs;
        config.validate().unwrap();
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let github = GitHubConfig {
            webhook_secret: "hunter2".into(),
            private_key: "PRIVATE".into(),
            ..Default::default()
        };
        let debug = format!("{github:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("PRIVATE"));
    }
}
