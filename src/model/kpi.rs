use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Severity, Status};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    #[must_use]
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub open: usize,
    pub resolved: usize,
    pub suppressed: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: Status) {
        match status {
            Status::Open => self.open += 1,
            Status::Resolved => self.resolved += 1,
            Status::Suppressed => self.suppressed += 1,
        }
    }

    #[must_use]
    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Open => self.open,
            Status::Resolved => self.resolved,
            Status::Suppressed => self.suppressed,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.open + self.resolved + self.suppressed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplineStats {
    pub discipline_pair: String,
    pub count: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Aggregate statistics over a clash collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_clashes: usize,
    pub by_severity: SeverityCounts,
    pub by_status: StatusCounts,
    pub resolved_percentage: f64,
    pub top_categories: Vec<CategoryCount>,
    pub by_discipline: Vec<DisciplineStats>,
    pub by_level: BTreeMap<String, usize>,
}
