use std::{fmt, path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use lintbridge_core::{Error, Result, util::UrlExt};
use tokio::{process::Command, time::timeout};
use url::Url;

/// What a working copy is materialized at.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GitRef {
    /// Detached at a commit; nothing will be pushed.
    Commit(String),
    /// A local branch tracking the remote one, so commits can be pushed back.
    Branch(String),
}

impl GitRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Commit(name) | Self::Branch(name) => name,
        }
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Local, disposable repository checkouts.
#[async_trait]
pub trait WorkingCopyManager: Send + Sync {
    async fn clone_repository(&self, remote: &Url, path: &Path) -> Result<()>;

    async fn checkout(&self, path: &Path, reference: &GitRef) -> Result<()>;

    /// Whether tracked files differ from HEAD.
    async fn has_changes(&self, path: &Path) -> Result<bool>;

    /// Commit all tracked changes. Fails if there is nothing to commit.
    async fn commit_all(&self, path: &Path, message: &str) -> Result<()>;

    async fn push(&self, path: &Path, remote: &Url, branch: &str) -> Result<()>;

    /// Remove the working copy. A missing directory is not an error.
    async fn discard(&self, path: &Path) -> Result<()>;
}

/// [`WorkingCopyManager`] driving the `git` executable. Arguments are passed directly to the
/// process, never through a shell.
#[derive(Debug, Clone)]
pub struct Git {
    pub author_name: String,
    pub author_email: String,
    pub clone_timeout: Duration,
    pub push_timeout: Duration,
}

impl Git {
    async fn run(
        &self,
        dir: Option<&Path>,
        args: &[&str],
        operation: &'static str,
        limit: Duration,
        remote: Option<&Url>,
    ) -> Result<String> {
        let mut command = Command::new("git");
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        let output = timeout(limit, command.output())
            .await
            .map_err(|_| Error::Timeout { operation, seconds: limit.as_secs() })?
            .map_err(|e| Error::Tool(format!("Failed to run git {operation}: {e}")))?;
        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if let Some(secret) = remote.and_then(Url::password) {
                stderr = stderr.replace(secret, "***");
            }
            return Err(Error::Tool(format!("git {operation} failed ({}): {stderr}", output.status)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn reject_option_like(value: &str) -> Result<()> {
    if value.is_empty() || value.starts_with('-') {
        return Err(Error::Validation(format!("invalid git ref {value:?}")));
    }
    Ok(())
}

#[async_trait]
impl WorkingCopyManager for Git {
    async fn clone_repository(&self, remote: &Url, path: &Path) -> Result<()> {
        tracing::info!("Cloning {} into {}", remote.redacted(), path.display());
        let path = path.to_string_lossy();
        self.run(
            None,
            &["clone", "--quiet", "--", remote.as_str(), &*path],
            "clone",
            self.clone_timeout,
            Some(remote),
        )
        .await?;
        Ok(())
    }

    async fn checkout(&self, path: &Path, reference: &GitRef) -> Result<()> {
        reject_option_like(reference.name())?;
        match reference {
            GitRef::Commit(sha) => {
                self.run(
                    Some(path),
                    &["checkout", "--quiet", "--detach", sha.as_str(), "--"],
                    "checkout",
                    self.clone_timeout,
                    None,
                )
                .await?;
            }
            GitRef::Branch(branch) => {
                let upstream = format!("refs/remotes/origin/{branch}");
                self.run(
                    Some(path),
                    &["checkout", "--quiet", "-B", branch.as_str(), upstream.as_str(), "--"],
                    "checkout",
                    self.clone_timeout,
                    None,
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn has_changes(&self, path: &Path) -> Result<bool> {
        let status = self
            .run(
                Some(path),
                &["status", "--porcelain", "--untracked-files=no"],
                "status",
                self.clone_timeout,
                None,
            )
            .await?;
        Ok(!status.trim().is_empty())
    }

    async fn commit_all(&self, path: &Path, message: &str) -> Result<()> {
        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        self.run(
            Some(path),
            &[
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "commit",
                "--quiet",
                "--all",
                "--message",
                message,
            ],
            "commit",
            self.clone_timeout,
            None,
        )
        .await?;
        Ok(())
    }

    async fn push(&self, path: &Path, remote: &Url, branch: &str) -> Result<()> {
        reject_option_like(branch)?;
        tracing::info!("Pushing {} to {}", branch, remote.redacted());
        let refspec = format!("HEAD:refs/heads/{branch}");
        self.run(
            Some(path),
            &["push", "--quiet", "--", remote.as_str(), refspec.as_str()],
            "push",
            self.push_timeout,
            Some(remote),
        )
        .await?;
        Ok(())
    }

    async fn discard(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Tool(format!("Failed to remove {}: {e}", path.display()))),
        }
    }
}
