use std::collections::{BTreeMap, HashMap};

use crate::model::{
    CategoryCount, ClashRecord, DisciplineStats, KpiSummary, Severity, SeverityCounts,
    StatusCounts,
};

pub const TOP_CATEGORY_LIMIT: usize = 5;

/// Computes the KPI summary of `records`.
///
/// The result depends only on the input sequence: no clock reads, no
/// randomness. Category ties keep first-seen order; discipline pairs are only
/// counted for records with exactly two disciplines.
pub fn calculate_kpis<'a, I>(records: I) -> KpiSummary
where
    I: IntoIterator<Item = &'a ClashRecord>,
{
    let mut total = 0;
    let mut by_severity = SeverityCounts::default();
    let mut by_status = StatusCounts::default();
    let mut categories = FirstSeenCounter::default();
    let mut disciplines: HashMap<String, DisciplineStats> = HashMap::new();
    let mut by_level: BTreeMap<String, usize> = BTreeMap::new();

    for record in records {
        total += 1;
        by_severity.add(record.severity);
        by_status.add(record.status);

        for category in record.categories() {
            categories.add(category);
        }

        if let Some(pair) = record.discipline_pair() {
            let stats = disciplines
                .entry(pair.clone())
                .or_insert_with(|| DisciplineStats {
                    discipline_pair: pair,
                    count: 0,
                    high: 0,
                    medium: 0,
                    low: 0,
                });
            stats.count += 1;
            match record.severity {
                Severity::High => stats.high += 1,
                Severity::Medium => stats.medium += 1,
                Severity::Low => stats.low += 1,
            }
        }

        if let Some(level) = record.level.as_deref().filter(|l| !l.is_empty()) {
            *by_level.entry(level.to_string()).or_insert(0) += 1;
        }
    }

    let mut by_discipline: Vec<DisciplineStats> = disciplines.into_values().collect();
    by_discipline.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.discipline_pair.cmp(&b.discipline_pair))
    });

    KpiSummary {
        total_clashes: total,
        by_severity,
        by_status,
        resolved_percentage: resolved_percentage(by_status.resolved, total),
        top_categories: categories.top(TOP_CATEGORY_LIMIT),
        by_discipline,
        by_level,
    }
}

/// `resolved / total * 100`, or `0.0` for an empty set.
#[must_use]
pub fn resolved_percentage(resolved: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    resolved as f64 / total as f64 * 100.0
}

/// Frequency counter that remembers insertion order for tie-breaking.
#[derive(Default)]
struct FirstSeenCounter {
    index: HashMap<String, usize>,
    entries: Vec<CategoryCount>,
}

impl FirstSeenCounter {
    fn add(&mut self, key: &str) {
        if let Some(&i) = self.index.get(key) {
            self.entries[i].count += 1;
            return;
        }
        self.index.insert(key.to_string(), self.entries.len());
        self.entries.push(CategoryCount {
            category: key.to_string(),
            count: 1,
        });
    }

    fn top(mut self, limit: usize) -> Vec<CategoryCount> {
        // Stable sort keeps first-seen order among equal counts.
        self.entries.sort_by(|a, b| b.count.cmp(&a.count));
        self.entries.truncate(limit);
        self.entries
    }
}
