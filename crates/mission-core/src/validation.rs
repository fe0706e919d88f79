//! Validation for task records.

use serde::{Deserialize, Serialize};

use crate::types::{priority_in_range, Task, PRIORITY_MAX, PRIORITY_MIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for Task {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.id.0.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "task.id.empty",
                message: "task id must not be empty".to_string(),
            });
        }

        if self.title.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "task.title.empty",
                message: "title must not be empty".to_string(),
            });
        }

        if !priority_in_range(self.priority) {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "task.priority.range",
                message: format!(
                    "priority {} out of range {PRIORITY_MIN}..={PRIORITY_MAX}",
                    self.priority
                ),
            });
        }

        issues
    }
}

/// True when no error-level issue is present.
pub fn is_valid(issues: &[ValidationIssue]) -> bool {
    !issues
        .iter()
        .any(|issue| issue.level == ValidationLevel::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;
    use chrono::Local;

    fn valid_task() -> Task {
        Task::new(TaskId::new("m-abc123"), "Add endpoint", Local::now())
    }

    #[test]
    fn valid_task_has_no_issues() {
        let issues = valid_task().validate();
        assert!(issues.is_empty());
        assert!(is_valid(&issues));
    }

    #[test]
    fn empty_title_is_flagged() {
        let mut task = valid_task();
        task.title = "   ".to_string();

        let issues = task.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues.iter().any(|issue| {
            issue.level == ValidationLevel::Error && issue.code == "task.title.empty"
        }));
        assert!(!is_valid(&issues));
    }

    #[test]
    fn out_of_range_priority_is_flagged() {
        let mut task = valid_task();
        task.priority = 0;
        assert!(task
            .validate()
            .iter()
            .any(|issue| issue.code == "task.priority.range"));

        task.priority = 11;
        assert!(task
            .validate()
            .iter()
            .any(|issue| issue.code == "task.priority.range"));
    }

    #[test]
    fn empty_id_is_flagged() {
        let mut task = valid_task();
        task.id = TaskId::new("");
        assert!(task
            .validate()
            .iter()
            .any(|issue| issue.code == "task.id.empty"));
    }
}
