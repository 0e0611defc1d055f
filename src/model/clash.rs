use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// Clash priority. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Report order: high first.
    pub const ALL: [Severity; 3] = [Severity::High, Severity::Medium, Severity::Low];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            _ => Err(QueryError::invalid("severity", s)),
        }
    }
}

/// Workflow state of a clash. Ordered `Open < Resolved < Suppressed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Resolved,
    Suppressed,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Open, Status::Resolved, Status::Suppressed];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Resolved => "resolved",
            Status::Suppressed => "suppressed",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Status::Open => "Open",
            Status::Resolved => "Resolved",
            Status::Suppressed => "Suppressed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Status::Open),
            "resolved" => Ok(Status::Resolved),
            "suppressed" => Ok(Status::Suppressed),
            _ => Err(QueryError::invalid("status", s)),
        }
    }
}

/// One of the two BIM elements taking part in a clash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClashElement {
    pub urn: String,
    pub guid: String,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A detected geometric conflict between BIM elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClashRecord {
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub severity: Severity,
    pub status: Status,
    pub disciplines: Vec<String>,
    pub level: Option<String>,
    pub elements: Vec<ClashElement>,
    pub location: Location,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deep_link: Option<String>,
    pub screenshot_url: Option<String>,
}

impl ClashRecord {
    /// Element categories in element order, empty names skipped.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.elements
            .iter()
            .map(|e| e.category.as_str())
            .filter(|c| !c.is_empty())
    }

    /// Disciplines joined the way reports and CSV show them, e.g. `MEP vs Structure`.
    #[must_use]
    pub fn discipline_label(&self) -> String {
        self.disciplines.join(" vs ")
    }

    /// Unordered discipline pair key, only for records with exactly two disciplines.
    #[must_use]
    pub fn discipline_pair(&self) -> Option<String> {
        match self.disciplines.as_slice() {
            [a, b] => {
                let (first, second) = if a <= b { (a, b) } else { (b, a) };
                Some(format!("{first} vs {second}"))
            }
            _ => None,
        }
    }
}
