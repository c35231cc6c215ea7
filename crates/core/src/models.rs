use std::fmt;

use serde::{Deserialize, Serialize, ser::SerializeStruct};
use time::OffsetDateTime;

/// The platform caps annotations per check-run request.
pub const MAX_ANNOTATIONS_PER_REQUEST: usize = 50;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
    Queued,
    InProgress,
    Completed,
}

impl CheckRunStatus {
    /// Status only ever moves forward.
    pub fn can_transition_to(self, next: Self) -> bool { next > self }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Neutral,
    Failure,
    Cancelled,
    TimedOut,
    ActionRequired,
    Skipped,
}

impl fmt::Display for CheckConclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Neutral => "neutral",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::ActionRequired => "action_required",
            Self::Skipped => "skipped",
        })
    }
}

/// Structured output of one analysis run.
///
/// Field aliases accept RuboCop's JSON formatter output directly.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
pub struct AnalysisReport {
    pub summary: AnalysisSummary,
    pub metadata: AnalysisMetadata,
    #[serde(default)]
    pub files: Vec<FileReport>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
pub struct AnalysisSummary {
    pub offense_count: u64,
    pub target_file_count: u64,
    pub inspected_file_count: u64,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
pub struct AnalysisMetadata {
    #[serde(alias = "rubocop_version")]
    pub tool_version: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct FileReport {
    pub path: String,
    #[serde(default)]
    pub offenses: Vec<Offense>,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Offense {
    pub location: OffenseLocation,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
pub struct OffenseLocation {
    pub start_line: u32,
    #[serde(alias = "last_line")]
    pub end_line: u32,
    pub start_column: u32,
    #[serde(alias = "last_column")]
    pub end_column: u32,
}

impl AnalysisReport {
    pub fn conclusion(&self) -> CheckConclusion {
        if self.summary.offense_count == 0 {
            CheckConclusion::Success
        } else {
            CheckConclusion::Neutral
        }
    }

    /// One notice-level annotation per offense, in report order.
    pub fn annotations(&self) -> Vec<Annotation> {
        self.files
            .iter()
            .flat_map(|file| {
                file.offenses.iter().map(move |offense| Annotation {
                    path: file.path.clone(),
                    start_line: offense.location.start_line,
                    end_line: offense.location.end_line,
                    start_column: offense.location.start_column,
                    end_column: offense.location.end_column,
                    level: AnnotationLevel::Notice,
                    message: offense.message.clone(),
                })
            })
            .collect()
    }

    /// Rewrite file paths relative to `root`, as the tool may report them prefixed.
    pub fn strip_path_prefix(&mut self, root: &str) {
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            return;
        }
        for file in &mut self.files {
            if let Some(relative) =
                file.path.strip_prefix(root).and_then(|p| p.strip_prefix('/'))
            {
                file.path = relative.to_string();
            } else if let Some(relative) = file.path.strip_prefix("./") {
                file.path = relative.to_string();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationLevel {
    Notice,
    Warning,
    Failure,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Annotation {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,
    pub level: AnnotationLevel,
    pub message: String,
}

// Columns are only accepted when the annotation spans a single line.
impl Serialize for Annotation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let single_line = self.start_line == self.end_line;
        let mut state =
            serializer.serialize_struct("Annotation", if single_line { 7 } else { 5 })?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("start_line", &self.start_line)?;
        state.serialize_field("end_line", &self.end_line)?;
        if single_line {
            state.serialize_field("start_column", &self.start_column)?;
            state.serialize_field("end_column", &self.end_column)?;
        } else {
            state.skip_field("start_column")?;
            state.skip_field("end_column")?;
        }
        state.serialize_field("annotation_level", &self.level)?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CheckRunOutput {
    pub title: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

/// A follow-up button offered on a completed check run.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CheckRunAction {
    pub label: String,
    pub description: String,
    pub identifier: String,
}

/// Body of an update-check-run call. Unset fields are left untouched by the platform.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct CheckRunUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckRunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<CheckConclusion>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CheckRunOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<CheckRunAction>,
}

impl CheckRunUpdate {
    pub fn in_progress(started_at: OffsetDateTime) -> Self {
        Self {
            status: Some(CheckRunStatus::InProgress),
            started_at: Some(started_at),
            ..Default::default()
        }
    }

    pub fn completed(
        conclusion: CheckConclusion,
        completed_at: OffsetDateTime,
        output: CheckRunOutput,
    ) -> Self {
        Self {
            status: Some(CheckRunStatus::Completed),
            conclusion: Some(conclusion),
            completed_at: Some(completed_at),
            output: Some(output),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUBOCOP_OUTPUT: &str = r#"{
        "metadata": {"rubocop_version": "1.57.2", "ruby_engine": "ruby"},
        "files": [
            {"path": "app/models/user.rb", "offenses": [
                {"severity": "convention", "message": "Style/StringLiterals: Prefer single-quoted strings.",
                 "cop_name": "Style/StringLiterals", "corrected": false, "correctable": true,
                 "location": {"start_line": 3, "start_column": 9, "last_line": 3, "last_column": 15,
                              "length": 7, "line": 3, "column": 9}},
                {"severity": "convention", "message": "Metrics/MethodLength: Method has too many lines.",
                 "cop_name": "Metrics/MethodLength", "corrected": false, "correctable": false,
                 "location": {"start_line": 5, "start_column": 3, "last_line": 20, "last_column": 5,
                              "length": 200, "line": 5, "column": 3}}
            ]},
            {"path": "config.ru", "offenses": []},
            {"path": "lib/task.rb", "offenses": [
                {"severity": "warning", "message": "Lint/UselessAssignment: Useless assignment to variable - x.",
                 "cop_name": "Lint/UselessAssignment", "corrected": false, "correctable": true,
                 "location": {"start_line": 1, "start_column": 1, "last_line": 1, "last_column": 1,
                              "length": 1, "line": 1, "column": 1}}
            ]}
        ],
        "summary": {"offense_count": 3, "target_file_count": 3, "inspected_file_count": 3}
    }"#;

    #[test]
    fn test_parse_rubocop_report() {
        let report: AnalysisReport = serde_json::from_str(RUBOCOP_OUTPUT).unwrap();
        assert_eq!(report.metadata.tool_version, "1.57.2");
        assert_eq!(report.summary.offense_count, 3);
        assert_eq!(report.files.len(), 3);
        assert_eq!(report.files[0].offenses[1].location.end_line, 20);
        assert_eq!(report.conclusion(), CheckConclusion::Neutral);
    }

    #[test]
    fn test_annotations_preserve_offenses() {
        let report: AnalysisReport = serde_json::from_str(RUBOCOP_OUTPUT).unwrap();
        let annotations = report.annotations();
        let offenses: Vec<(&str, &Offense)> = report
            .files
            .iter()
            .flat_map(|f| f.offenses.iter().map(move |o| (f.path.as_str(), o)))
            .collect();
        assert_eq!(annotations.len(), offenses.len());
        for (annotation, (path, offense)) in annotations.iter().zip(offenses) {
            assert_eq!(annotation.path, path);
            assert_eq!(annotation.start_line, offense.location.start_line);
            assert_eq!(annotation.end_line, offense.location.end_line);
            assert_eq!(annotation.start_column, offense.location.start_column);
            assert_eq!(annotation.end_column, offense.location.end_column);
            assert_eq!(annotation.message, offense.message);
            assert_eq!(annotation.level, AnnotationLevel::Notice);
        }
    }

    #[test]
    fn test_clean_report_succeeds() {
        let report = AnalysisReport::default();
        assert_eq!(report.conclusion(), CheckConclusion::Success);
        assert!(report.annotations().is_empty());
    }

    #[test]
    fn test_annotation_columns_single_line_only() {
        let mut annotation = Annotation {
            path: "a.rb".into(),
            start_line: 4,
            end_line: 4,
            start_column: 2,
            end_column: 8,
            level: AnnotationLevel::Notice,
            message: "m".into(),
        };
        let value = serde_json::to_value(&annotation).unwrap();
        assert_eq!(value["start_column"], 2);
        assert_eq!(value["annotation_level"], "notice");

        annotation.end_line = 9;
        let value = serde_json::to_value(&annotation).unwrap();
        assert!(value.get("start_column").is_none());
        assert!(value.get("end_column").is_none());
        assert_eq!(value["end_line"], 9);
    }

    #[test]
    fn test_strip_path_prefix() {
        let mut report: AnalysisReport = serde_json::from_str(RUBOCOP_OUTPUT).unwrap();
        report.files[0].path = "/tmp/work/abc-repo/app/models/user.rb".into();
        report.files[1].path = "./config.ru".into();
        report.strip_path_prefix("/tmp/work/abc-repo/");
        assert_eq!(report.files[0].path, "app/models/user.rb");
        assert_eq!(report.files[1].path, "config.ru");
        assert_eq!(report.files[2].path, "lib/task.rb");
    }

    #[test]
    fn test_status_moves_forward_only() {
        use CheckRunStatus::*;
        assert!(Queued.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Queued.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_update_serialization() {
        let started = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let value = serde_json::to_value(CheckRunUpdate::in_progress(started)).unwrap();
        assert_eq!(value["status"], "in_progress");
        assert_eq!(value["started_at"], "2023-11-14T22:13:20Z");
        assert!(value.get("conclusion").is_none());
        assert!(value.get("actions").is_none());
    }
}
