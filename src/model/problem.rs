use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Reference type that ties a problem to a clash.
pub const CLASH_REFERENCE: &str = "clash";

/// Workflow state of a coordination problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl ProblemStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Lenient parse for upstream payloads.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_progress" | "in-progress" | "inprogress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl ProblemPriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Something a problem points at: a clash, a document, a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemReference {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub urn: Option<String>,
}

impl ProblemReference {
    #[must_use]
    pub fn clash(clash_id: &str, title: Option<String>) -> Self {
        Self {
            kind: CLASH_REFERENCE.to_string(),
            id: clash_id.to_string(),
            title,
            urn: None,
        }
    }

    #[must_use]
    pub fn is_clash(&self) -> bool {
        self.kind.eq_ignore_ascii_case(CLASH_REFERENCE)
    }
}

/// A coordination issue raised against one or more clashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: ProblemStatus,
    pub priority: ProblemPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assigned_to: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub references: Vec<ProblemReference>,
    /// Ids of the clash references, in reference order.
    pub clash_ids: Vec<String>,
}

impl Problem {
    #[must_use]
    pub fn is_linked_to(&self, clash_id: &str) -> bool {
        self.clash_ids.iter().any(|id| id == clash_id)
    }

    /// Adds a clash reference unless it is already there.
    pub fn link(&mut self, clash_id: &str, now: DateTime<Utc>) {
        if self.is_linked_to(clash_id) {
            return;
        }
        self.clash_ids.push(clash_id.to_string());
        self.references.push(ProblemReference::clash(clash_id, None));
        self.updated_at = now;
    }

    pub fn unlink(&mut self, clash_id: &str, now: DateTime<Utc>) {
        let before = self.references.len();
        self.clash_ids.retain(|id| id != clash_id);
        self.references
            .retain(|r| !(r.is_clash() && r.id == clash_id));
        if self.references.len() != before {
            self.updated_at = now;
        }
    }
}

/// Body of `POST /problems`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewProblem {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProblemStatus,
    #[serde(default)]
    pub priority: ProblemPriority,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Clash the new problem is linked to.
    pub clash_id: String,
}

impl NewProblem {
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.title.trim().is_empty() {
            return Err(QueryError::Missing { field: "title" });
        }
        validate_reference_id("clash_id", &self.clash_id)
    }

    /// The problem as first stored, linked to its clash.
    #[must_use]
    pub fn into_problem(self, id: String, now: DateTime<Utc>) -> Problem {
        let reference = ProblemReference::clash(&self.clash_id, Some(self.title.clone()));
        Problem {
            id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            created_at: now,
            updated_at: now,
            assigned_to: self.assigned_to,
            due_date: self.due_date,
            references: vec![reference],
            clash_ids: vec![self.clash_id],
        }
    }
}

/// Checks an id that ends up in an upstream URL path.
pub fn validate_reference_id(field: &'static str, value: &str) -> Result<(), QueryError> {
    if value.trim().is_empty() {
        return Err(QueryError::Missing { field });
    }
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if !allowed || value.len() > 128 || value.chars().all(|c| c == '.') {
        return Err(QueryError::invalid(field, value));
    }
    Ok(())
}

/// Body of the link and unlink requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProblemLink {
    pub clash_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemList {
    pub problems: Vec<Problem>,
    pub total: usize,
}

impl From<Vec<Problem>> for ProblemList {
    fn from(problems: Vec<Problem>) -> Self {
        Self {
            total: problems.len(),
            problems,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_problem() -> NewProblem {
        serde_json::from_str(r#"{"title": "Reroute duct", "clash_id": "clash_00003"}"#).unwrap()
    }

    #[test]
    fn create_payload_defaults() {
        let payload = new_problem();
        assert_eq!(payload.status, ProblemStatus::Open);
        assert_eq!(payload.priority, ProblemPriority::Medium);
        assert!(payload.validate().is_ok());

        let problem = payload.into_problem("problem-0009".to_string(), Utc::now());
        assert_eq!(problem.clash_ids, vec!["clash_00003"]);
        assert!(problem.references[0].is_clash());
        assert_eq!(problem.references[0].title.as_deref(), Some("Reroute duct"));
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut payload = new_problem();
        payload.title = "  ".to_string();
        assert!(payload.validate().is_err());

        let mut payload = new_problem();
        payload.clash_id.clear();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn link_is_idempotent_and_unlink_removes_only_the_clash() {
        let now = Utc::now();
        let mut problem = new_problem().into_problem("p1".to_string(), now);
        problem.references.push(ProblemReference {
            kind: "document".to_string(),
            id: "clash_00003".to_string(),
            title: None,
            urn: Some("urn:doc".to_string()),
        });

        problem.link("clash_00007", now);
        problem.link("clash_00007", now);
        assert_eq!(problem.clash_ids, vec!["clash_00003", "clash_00007"]);

        problem.unlink("clash_00003", now);
        assert_eq!(problem.clash_ids, vec!["clash_00007"]);
        assert!(problem.references.iter().any(|r| r.kind == "document"));
        assert!(!problem.is_linked_to("clash_00003"));
    }

    #[test]
    fn reference_ids_cannot_walk_paths() {
        assert!(validate_reference_id("problem_id", "problem-0001").is_ok());
        assert!(validate_reference_id("clash_id", "urn:adsk.clash:42").is_ok());
        for bad in ["", "..", "a/b", "a?b=1", "x y"] {
            assert!(validate_reference_id("clash_id", bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ProblemStatus::InProgress).unwrap(),
            "in_progress"
        );
        assert_eq!(ProblemStatus::from_token("In-Progress"), Some(ProblemStatus::InProgress));
        assert_eq!(ProblemPriority::from_token("urgent"), None);
    }
}
