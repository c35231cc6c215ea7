use axum::body::Bytes;
use lintbridge_core::{Error, Result, util::is_valid_repository_name};
use serde::Deserialize;

use crate::auth::AppIdentity;

/// An authenticated webhook delivery.
///
/// `raw_body` is the exact byte sequence the signature was computed over.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_type: String,
    pub action: Option<String>,
    pub delivery_id: Option<String>,
    pub raw_body: Bytes,
    pub payload: EventPayload,
}

/// The subset of webhook payload fields the bridge reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    pub action: Option<String>,
    pub installation: Option<InstallationRef>,
    pub repository: Option<RepositoryRef>,
    pub check_suite: Option<CheckSuitePayload>,
    pub check_run: Option<CheckRunPayload>,
    pub requested_action: Option<RequestedAction>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InstallationRef {
    pub id: u64,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AppRef {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckSuitePayload {
    pub head_sha: String,
    pub head_branch: Option<String>,
    pub app: Option<AppRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunPayload {
    pub id: u64,
    pub head_sha: String,
    pub check_suite: Option<CheckRunSuite>,
    pub app: Option<AppRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunSuite {
    pub head_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestedAction {
    pub identifier: String,
}

impl WebhookEvent {
    pub fn parse(
        event_type: impl Into<String>,
        delivery_id: Option<String>,
        raw_body: Bytes,
    ) -> Result<Self> {
        let payload: EventPayload = serde_json::from_slice(&raw_body)
            .map_err(|e| Error::Validation(format!("Failed to parse payload: {e}")))?;
        Ok(Self {
            event_type: event_type.into(),
            action: payload.action.clone(),
            delivery_id,
            raw_body,
            payload,
        })
    }

    /// Reject events addressed to another App or naming an unsafe repository.
    pub fn validate(&self, identity: &AppIdentity) -> Result<()> {
        if let Some(app_id) = self.payload.app_id() {
            let app_id = app_id.to_string();
            if app_id != identity.app_id {
                return Err(Error::Sender(format!(
                    "event is addressed to App {app_id}, not {}",
                    identity.app_id
                )));
            }
        }
        if let Some(repository) = &self.payload.repository
            && !is_valid_repository_name(&repository.name)
        {
            return Err(Error::Validation(format!(
                "invalid repository name {:?}",
                repository.name
            )));
        }
        Ok(())
    }
}

impl EventPayload {
    /// The App the check run or check suite belongs to, if the event carries one.
    pub fn app_id(&self) -> Option<u64> {
        self.check_run
            .as_ref()
            .and_then(|run| run.app)
            .or_else(|| self.check_suite.as_ref().and_then(|suite| suite.app))
            .map(|app| app.id)
    }

    /// Prefer the check run's commit, falling back to the check suite's.
    pub fn head_sha(&self) -> Option<&str> {
        self.check_run
            .as_ref()
            .map(|run| run.head_sha.as_str())
            .or_else(|| self.check_suite.as_ref().map(|suite| suite.head_sha.as_str()))
    }

    pub fn head_branch(&self) -> Option<&str> {
        self.check_run
            .as_ref()
            .and_then(|run| run.check_suite.as_ref())
            .and_then(|suite| suite.head_branch.as_deref())
            .or_else(|| self.check_suite.as_ref().and_then(|suite| suite.head_branch.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECK_SUITE_REQUESTED: &str = r#"{
        "action": "requested",
        "check_suite": {"id": 1, "head_branch": "main", "head_sha": "d6fde92930d4715a2b49857d24b940956b26d2d3",
                        "app": {"id": 1234, "slug": "octo-rubocop"}},
        "repository": {"id": 5, "name": "Hello-World", "full_name": "octocat/Hello-World",
                       "html_url": "https://github.com/octocat/Hello-World"},
        "installation": {"id": 2311213}
    }"#;

    const CHECK_RUN_REQUESTED_ACTION: &str = r#"{
        "action": "requested_action",
        "check_run": {"id": 128620228, "head_sha": "ec26c3e57ca3a959ca5aad62de7213c562f8c821",
                      "status": "completed", "conclusion": "neutral",
                      "check_suite": {"id": 118578147, "head_branch": "changes"},
                      "app": {"id": 1234}},
        "requested_action": {"identifier": "fix_rubocop_notices"},
        "repository": {"id": 5, "name": "Hello-World", "full_name": "octocat/Hello-World",
                       "html_url": "https://github.com/octocat/Hello-World"},
        "installation": {"id": 2311213}
    }"#;

    fn event(event_type: &str, body: &str) -> WebhookEvent {
        WebhookEvent::parse(event_type, Some("delivery".into()), Bytes::from(body.to_string()))
            .unwrap()
    }

    fn identity(app_id: &str) -> AppIdentity { AppIdentity { app_id: app_id.to_string() } }

    #[test]
    fn test_parse_check_suite() {
        let event = event("check_suite", CHECK_SUITE_REQUESTED);
        assert_eq!(event.action.as_deref(), Some("requested"));
        assert_eq!(event.payload.head_sha(), Some("d6fde92930d4715a2b49857d24b940956b26d2d3"));
        assert_eq!(event.payload.head_branch(), Some("main"));
        assert_eq!(event.payload.installation.unwrap().id, 2311213);
        assert_eq!(event.payload.app_id(), Some(1234));
        assert_eq!(event.raw_body, CHECK_SUITE_REQUESTED.as_bytes());
    }

    #[test]
    fn test_parse_requested_action() {
        let event = event("check_run", CHECK_RUN_REQUESTED_ACTION);
        assert_eq!(event.payload.head_sha(), Some("ec26c3e57ca3a959ca5aad62de7213c562f8c821"));
        assert_eq!(event.payload.head_branch(), Some("changes"));
        assert_eq!(
            event.payload.requested_action.as_ref().map(|a| a.identifier.as_str()),
            Some("fix_rubocop_notices")
        );
        assert_eq!(event.payload.check_run.as_ref().unwrap().id, 128620228);
    }

    #[test]
    fn test_invalid_json() {
        let err = WebhookEvent::parse("check_suite", None, Bytes::from_static(b"{not json"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_app_identity() {
        let event = event("check_suite", CHECK_SUITE_REQUESTED);
        event.validate(&identity("1234")).unwrap();
        assert!(matches!(event.validate(&identity("4321")), Err(Error::Sender(_))));
        assert!(matches!(event.validate(&identity("01234")), Err(Error::Sender(_))));
    }

    #[test]
    fn test_validate_without_app() {
        let event = event("ping", r#"{"zen": "Keep it logically awesome.", "hook_id": 1}"#);
        event.validate(&identity("1234")).unwrap();
        assert!(event.action.is_none());
    }

    #[test]
    fn test_validate_repository_name() {
        for name in ["Hello;World", "Hello World", "Hello/World", "Hello\tWorld"] {
            let body = CHECK_SUITE_REQUESTED.replace("\"Hello-World\"", &format!("{name:?}"));
            let event = event("check_suite", &body);
            assert!(
                matches!(event.validate(&identity("1234")), Err(Error::Validation(_))),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_check_run_takes_precedence() {
        let body = r#"{
            "action": "rerequested",
            "check_run": {"id": 7, "head_sha": "1111111111111111111111111111111111111111",
                          "check_suite": {"head_branch": "run-branch"}, "app": {"id": 999}},
            "check_suite": {"head_sha": "2222222222222222222222222222222222222222",
                            "head_branch": "suite-branch", "app": {"id": 1234}}
        }"#;
        let event = event("check_run", body);
        assert_eq!(event.payload.head_sha(), Some("1111111111111111111111111111111111111111"));
        assert_eq!(event.payload.head_branch(), Some("run-branch"));
        assert_eq!(event.payload.app_id(), Some(999));
        assert!(matches!(event.validate(&identity("1234")), Err(Error::Sender(_))));
    }
}
