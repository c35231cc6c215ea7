use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;
use url::Url;

pub trait UrlExt {
    /// Embed basic-auth credentials, e.g. for an authenticated git remote.
    fn with_credentials(&self, username: &str, password: &str) -> Url;
    /// Copy with any password replaced, safe for logging.
    fn redacted(&self) -> Url;
}

impl UrlExt for Url {
    fn with_credentials(&self, username: &str, password: &str) -> Url {
        let mut out = self.clone();
        // Only fails for cannot-be-a-base URLs, which `git_remote_url` never produces.
        let _ = out.set_username(username);
        let _ = out.set_password(Some(password));
        out
    }

    fn redacted(&self) -> Url {
        let mut out = self.clone();
        if out.password().is_some() {
            let _ = out.set_password(Some("***"));
        }
        out
    }
}

/// Build the git remote for a repository from its web URL.
pub fn git_remote_url(html_url: &str) -> Option<Url> {
    let mut url = Url::parse(html_url).ok()?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "https" | "http") {
        return None;
    }
    let path = url.path().trim_end_matches('/').trim_end_matches(".git").to_string();
    if path.is_empty() {
        return None;
    }
    url.set_path(&format!("{path}.git"));
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

/// Repository names are interpolated into local paths and process arguments downstream.
pub fn is_valid_repository_name(name: &str) -> bool {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap()).is_match(name)
}

/// Join two paths, only including the normal components.
pub fn join_normalized(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let mut out = base.as_ref().to_path_buf();
    out.extend(path.as_ref().components().filter(|v| matches!(v, std::path::Component::Normal(_))));
    out
}
