use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ClashRecord, Severity, Status};
use crate::error::QueryError;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 200;

/// Record predicates, combined with AND. Empty sets and `None` match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClashFilter {
    #[serde(rename = "severity")]
    pub severities: Vec<Severity>,
    #[serde(rename = "status")]
    pub statuses: Vec<Status>,
    pub discipline: Option<String>,
    pub level: Option<String>,
}

impl ClashFilter {
    #[must_use]
    pub fn matches(&self, record: &ClashRecord) -> bool {
        if !self.severities.is_empty() && !self.severities.contains(&record.severity) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if let Some(needle) = self.discipline.as_deref().filter(|d| !d.is_empty()) {
            let needle = needle.to_lowercase();
            if !record
                .disciplines
                .iter()
                .any(|d| d.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        if let Some(level) = self.level.as_deref().filter(|l| !l.is_empty()) {
            if record.level.as_deref() != Some(level) {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.severities.is_empty()
            && self.statuses.is_empty()
            && self.discipline.as_deref().is_none_or(str::is_empty)
            && self.level.as_deref().is_none_or(str::is_empty)
    }

    /// Human-readable description, used on report covers.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "All clashes (no filter)".to_string();
        }

        let mut parts = Vec::new();
        if !self.severities.is_empty() {
            let names: Vec<&str> = self.severities.iter().map(|s| s.as_str()).collect();
            parts.push(format!("severity: {}", names.join(", ")));
        }
        if !self.statuses.is_empty() {
            let names: Vec<&str> = self.statuses.iter().map(|s| s.as_str()).collect();
            parts.push(format!("status: {}", names.join(", ")));
        }
        if let Some(d) = self.discipline.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("discipline contains \"{d}\""));
        }
        if let Some(l) = self.level.as_deref().filter(|l| !l.is_empty()) {
            parts.push(format!("level: {l}"));
        }
        parts.join("; ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Severity,
    Status,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for SortKey {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "severity" => Ok(SortKey::Severity),
            "status" => Ok(SortKey::Status),
            "created_at" => Ok(SortKey::CreatedAt),
            "updated_at" => Ok(SortKey::UpdatedAt),
            _ => Err(QueryError::invalid("sort_by", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(QueryError::invalid("sort_order", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: usize,
    page_size: usize,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize, max_page_size: usize) -> Result<Self, QueryError> {
        if page == 0 {
            return Err(QueryError::OutOfRange {
                field: "page",
                message: "page numbers start at 1".to_string(),
            });
        }
        if page_size == 0 || page_size > max_page_size {
            return Err(QueryError::OutOfRange {
                field: "page_size",
                message: format!("page_size must be between 1 and {max_page_size}"),
            });
        }
        Ok(Self { page, page_size })
    }

    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Half-open index range of this page, clamped to `len`.
    #[must_use]
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let start = (self.page - 1).saturating_mul(self.page_size).min(len);
        let end = start.saturating_add(self.page_size).min(len);
        (start, end)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClashQuery {
    pub filter: ClashFilter,
    pub sort: SortSpec,
    pub page: PageRequest,
}

impl ClashQuery {
    /// Builds a query from raw query-string pairs.
    ///
    /// Repeated keys and comma-separated values are both accepted for
    /// `severity` and `status`. Unknown keys are ignored.
    pub fn from_pairs(pairs: &[(String, String)], max_page_size: usize) -> Result<Self, QueryError> {
        let mut filter = ClashFilter::default();
        let mut sort = SortSpec::default();
        let mut page = 1;
        let mut page_size = DEFAULT_PAGE_SIZE.min(max_page_size);

        for (key, value) in pairs {
            match key.as_str() {
                "severity" => {
                    for token in split_list(value) {
                        let severity: Severity = token.parse()?;
                        if !filter.severities.contains(&severity) {
                            filter.severities.push(severity);
                        }
                    }
                }
                "status" => {
                    for token in split_list(value) {
                        let status: Status = token.parse()?;
                        if !filter.statuses.contains(&status) {
                            filter.statuses.push(status);
                        }
                    }
                }
                "discipline" => filter.discipline = non_empty(value),
                "level" => filter.level = non_empty(value),
                "sort_by" => sort.key = value.parse()?,
                "sort_order" => sort.order = value.parse()?,
                "page" => page = parse_number("page", value)?,
                "page_size" => page_size = parse_number("page_size", value)?,
                _ => {}
            }
        }

        Ok(Self {
            filter,
            sort,
            page: PageRequest::new(page, page_size, max_page_size)?,
        })
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_number(field: &'static str, value: &str) -> Result<usize, QueryError> {
    // Negative numbers land here too and are reported as invalid.
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| QueryError::invalid(field, value))
}
