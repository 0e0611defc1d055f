//! Model Coordination problems API.
//!
//! Problems live in a container (the coordination space, or the project when
//! none is configured). Link changes are applied through the problem's
//! `references` collection and the problem is re-read afterwards.

use async_trait::async_trait;
use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{linked_to, ProblemTracker};
use crate::error::SourceError;
use crate::model::{NewProblem, Problem, ProblemPriority, ProblemReference, ProblemStatus};
use crate::source::aps::{parse_time, send_checked, value_key, ApsSettings};

/// Path segment characters left as-is; everything else is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

const NOT_FOUND: u16 = 404;

pub struct ApsProblems {
    http: reqwest::Client,
    settings: ApsSettings,
}

impl ApsProblems {
    #[must_use]
    pub fn new(settings: ApsSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// `.../containers/<container>/problems[/<segment>...]`
    fn url(&self, segments: &[&str]) -> String {
        let container = self
            .settings
            .coordination_space_id
            .as_deref()
            .unwrap_or(&self.settings.project_id);
        let mut url = format!(
            "{}/modelcoordination/v1/containers/{}/problems",
            self.settings.base_url,
            utf8_percent_encode(container, SEGMENT)
        );
        for segment in segments {
            url.push('/');
            url.extend(utf8_percent_encode(segment, SEGMENT));
        }
        url
    }

    async fn find(&self, problem_id: &str) -> Result<Option<Problem>, SourceError> {
        let problems = self.list(None).await?;
        Ok(problems.into_iter().find(|p| p.id == problem_id))
    }
}

#[async_trait]
impl ProblemTracker for ApsProblems {
    fn name(&self) -> &'static str {
        "aps"
    }

    async fn list(&self, clash_id: Option<&str>) -> Result<Vec<Problem>, SourceError> {
        let url = self.url(&[]);
        debug!(url = %url, "GET");
        let request = self
            .http
            .get(&url)
            .query(&[("include", "references")])
            .bearer_auth(&self.settings.access_token);
        let response = send_checked(request, &url).await?;
        let payload = read_json(response, &url).await?;

        let problems = problem_items(&payload).iter().map(map_problem).collect();
        Ok(linked_to(problems, clash_id))
    }

    async fn create(&self, problem: NewProblem) -> Result<Problem, SourceError> {
        let url = self.url(&[]);
        let mut body = json!({
            "title": problem.title,
            "description": problem.description,
            "status": problem.status.as_str(),
            "priority": problem.priority.as_str(),
            "references": [{"type": "clash", "id": problem.clash_id}],
        });
        if let Some(assignee) = &problem.assigned_to {
            body["assigned_to"] = json!(assignee);
        }
        if let Some(due) = problem.due_date {
            body["due_date"] = json!(due.to_rfc3339());
        }

        debug!(url = %url, "POST");
        let request = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.access_token)
            .json(&body);
        let response = send_checked(request, &url).await?;
        let payload = read_json(response, &url).await?;

        let created = map_problem(payload.get("data").unwrap_or(&payload));
        info!(problem = %created.id, clash = %problem.clash_id, "problem created");
        Ok(created)
    }

    async fn link(&self, problem_id: &str, clash_id: &str) -> Result<Option<Problem>, SourceError> {
        let url = self.url(&[problem_id, "references"]);
        debug!(url = %url, "POST");
        let request = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.access_token)
            .json(&json!({"type": "clash", "id": clash_id}));

        match send_checked(request, &url).await {
            Ok(_) => self.find(problem_id).await,
            Err(SourceError::Status { status: NOT_FOUND, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn unlink(
        &self,
        problem_id: &str,
        clash_id: &str,
    ) -> Result<Option<Problem>, SourceError> {
        let url = self.url(&[problem_id, "references", clash_id]);
        debug!(url = %url, "DELETE");
        let request = self
            .http
            .delete(&url)
            .bearer_auth(&self.settings.access_token);

        match send_checked(request, &url).await {
            Ok(_) => self.find(problem_id).await,
            Err(SourceError::Status { status: NOT_FOUND, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

async fn read_json(response: reqwest::Response, url: &str) -> Result<Value, SourceError> {
    response.json().await.map_err(|e| SourceError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// The list payload has carried its items under several keys.
fn problem_items(payload: &Value) -> &[Value] {
    ["data", "results", "items", "problems"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_array))
        .map_or(&[][..], Vec::as_slice)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAttributes {
    id: Value,
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    #[serde(alias = "assignedTo")]
    assigned_to: Option<String>,
    #[serde(alias = "dueDate")]
    due_date: Option<String>,
    #[serde(alias = "createdAt")]
    created_at: Option<String>,
    #[serde(alias = "updatedAt")]
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReference {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Value,
    attributes: RawReferenceAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReferenceAttributes {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Value,
    title: Option<String>,
    urn: Option<String>,
}

/// Maps one upstream problem. Attributes sit either under `attributes` or
/// at the top level; unknown status and priority fall back to the defaults.
fn map_problem(raw: &Value) -> Problem {
    let attributes = raw.get("attributes").unwrap_or(raw);
    let attrs: RawAttributes = serde_json::from_value(attributes.clone()).unwrap_or_default();

    let raw_refs = raw
        .pointer("/relationships/references/data")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);
    let references: Vec<ProblemReference> = raw_refs
        .iter()
        .map(|r| {
            let r: RawReference = serde_json::from_value(r.clone()).unwrap_or_default();
            ProblemReference {
                kind: r
                    .kind
                    .or(r.attributes.kind)
                    .unwrap_or_else(|| "unknown".to_string()),
                id: value_key(&r.id)
                    .or_else(|| value_key(&r.attributes.id))
                    .unwrap_or_default(),
                title: r.attributes.title,
                urn: r.attributes.urn,
            }
        })
        .collect();
    let clash_ids = references
        .iter()
        .filter(|r| r.is_clash() && !r.id.is_empty())
        .map(|r| r.id.clone())
        .collect();

    let created_at = parse_time(attrs.created_at.as_deref()).unwrap_or_else(Utc::now);
    Problem {
        id: raw
            .get("id")
            .and_then(value_key)
            .or_else(|| value_key(&attrs.id))
            .unwrap_or_default(),
        title: attrs.title.unwrap_or_else(|| "Untitled".to_string()),
        description: attrs.description,
        status: attrs
            .status
            .as_deref()
            .and_then(ProblemStatus::from_token)
            .unwrap_or_default(),
        priority: attrs
            .priority
            .as_deref()
            .and_then(ProblemPriority::from_token)
            .unwrap_or_default(),
        created_at,
        updated_at: parse_time(attrs.updated_at.as_deref()).unwrap_or(created_at),
        assigned_to: attrs.assigned_to,
        due_date: parse_time(attrs.due_date.as_deref()),
        references,
        clash_ids,
    }
}
