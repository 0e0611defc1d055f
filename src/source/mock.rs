use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::ClashSource;
use crate::error::SourceError;
use crate::model::{ClashElement, ClashRecord, Location, Severity, Status};

const DISCIPLINES: &[&str] = &["MEP", "Structure", "Architecture"];
const CATEGORIES_MEP: &[&str] = &["Ducts", "Pipes", "Cable Trays", "Conduits", "Air Terminals"];
const CATEGORIES_STRUCTURE: &[&str] = &["Beams", "Columns", "Slabs", "Foundations", "Walls"];
const CATEGORIES_ARCH: &[&str] = &["Walls", "Doors", "Windows", "Ceilings", "Floors"];
const LEVELS: &[&str] = &["L00", "L01", "L02", "L03", "L04", "L05", "Roof"];

const CLASH_TITLES: &[&str] = &[
    "Duct vs Beam",
    "Pipe vs Column",
    "Cable Tray vs Slab",
    "Conduit vs Wall",
    "Duct vs Structural Beam",
    "Pipe vs Architectural Wall",
    "HVAC vs Structure",
    "Electrical vs MEP",
    "Plumbing vs Structure",
];

// Shares of the generated set: high/medium/low and open/resolved/suppressed.
const SEVERITY_SHARES: [(Severity, f64); 3] = [
    (Severity::High, 0.2),
    (Severity::Medium, 0.5),
    (Severity::Low, 0.3),
];
const STATUS_SHARES: [(Status, f64); 3] = [
    (Status::Open, 0.6),
    (Status::Resolved, 0.3),
    (Status::Suppressed, 0.1),
];

/// In-memory demo data.
#[derive(Debug, Clone)]
pub struct MockSource {
    count: usize,
    seed: u64,
}

impl MockSource {
    #[must_use]
    pub fn new(count: usize, seed: u64) -> Self {
        Self { count, seed }
    }
}

#[async_trait]
impl ClashSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(&self) -> Result<Vec<ClashRecord>, SourceError> {
        let records = generate_mock_clashes(self.count, self.seed, Utc::now());
        info!(count = records.len(), seed = self.seed, "generated mock clashes");
        Ok(records)
    }
}

/// Generates `count` realistic clashes.
///
/// Severities and statuses are assigned by exact quota (rounded share of
/// `count`) and then shuffled, so a set of 100 always holds 20/50/30
/// severities and 60/30/10 statuses. Everything else is drawn from an RNG
/// seeded with `seed`; timestamps are relative to `now`.
#[must_use]
pub fn generate_mock_clashes(count: usize, seed: u64, now: DateTime<Utc>) -> Vec<ClashRecord> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut severities = quota(&SEVERITY_SHARES, count);
    severities.shuffle(&mut rng);
    let mut statuses = quota(&STATUS_SHARES, count);
    statuses.shuffle(&mut rng);

    let mut clashes: Vec<ClashRecord> = severities
        .into_iter()
        .zip(statuses)
        .enumerate()
        .map(|(index, (severity, status))| generate_clash(index, severity, status, now, &mut rng))
        .collect();

    // High first, most recently updated first
    clashes.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    clashes
}

fn quota<T: Copy>(shares: &[(T, f64)], count: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(count);
    let last = shares.len().saturating_sub(1);
    for (i, (value, share)) in shares.iter().enumerate() {
        let n = if i == last {
            count - out.len()
        } else {
            ((count as f64 * share).round() as usize).min(count - out.len())
        };
        out.extend(std::iter::repeat(*value).take(n));
    }
    out
}

fn generate_clash(
    index: usize,
    severity: Severity,
    status: Status,
    now: DateTime<Utc>,
    rng: &mut StdRng,
) -> ClashRecord {
    let id = format!("clash_{index:05}");

    let picked: Vec<&str> = DISCIPLINES.choose_multiple(rng, 2).copied().collect();
    let elements = picked.iter().map(|d| generate_element(d, rng)).collect();

    let created = now - Duration::days(rng.gen_range(1..=60));
    let updated = created + Duration::days(rng.gen_range(0..=10));

    ClashRecord {
        group_id: format!("group_{:02}", rng.gen_range(1..=20)),
        title: pick(CLASH_TITLES, rng).to_string(),
        severity,
        status,
        disciplines: picked.iter().map(|d| (*d).to_string()).collect(),
        level: Some(pick(LEVELS, rng).to_string()),
        elements,
        location: Location {
            x: round2(rng.gen_range(-50.0..50.0)),
            y: round2(rng.gen_range(-50.0..50.0)),
            z: round2(rng.gen_range(0.0..30.0)),
        },
        created_at: created,
        updated_at: updated,
        deep_link: Some(format!(
            "https://acc.autodesk.com/docs/files/projects/mock-project?clash={id}"
        )),
        screenshot_url: None,
        id,
    }
}

fn generate_element(discipline: &str, rng: &mut StdRng) -> ClashElement {
    let categories = match discipline {
        "MEP" => CATEGORIES_MEP,
        "Structure" => CATEGORIES_STRUCTURE,
        _ => CATEGORIES_ARCH,
    };
    let category = pick(categories, rng);
    let guid = uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string();

    ClashElement {
        urn: format!("urn:adsk.objects:os.object:demo-bucket/{guid}"),
        name: format!("{category}-{}", rng.gen_range(1000..=9999)),
        category: category.to_string(),
        guid,
    }
}

fn pick<'a>(items: &[&'a str], rng: &mut StdRng) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn quota_always_sums_to_count() {
        for count in [0, 1, 3, 7, 37, 100, 101] {
            assert_eq!(quota(&SEVERITY_SHARES, count).len(), count);
            assert_eq!(quota(&STATUS_SHARES, count).len(), count);
        }
    }

    #[test]
    fn ids_are_unique_and_disciplines_distinct() {
        let clashes = generate_mock_clashes(100, 1, Utc::now());
        let ids: HashSet<&str> = clashes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 100);
        for clash in &clashes {
            assert_eq!(clash.disciplines.len(), 2);
            assert_ne!(clash.disciplines[0], clash.disciplines[1]);
            assert_eq!(clash.elements.len(), 2);
            assert!(clash.updated_at >= clash.created_at);
        }
    }

    #[test]
    fn same_seed_same_data() {
        let now = Utc::now();
        assert_eq!(
            generate_mock_clashes(50, 9, now),
            generate_mock_clashes(50, 9, now)
        );
    }

    #[test]
    fn sorted_high_severity_first() {
        let clashes = generate_mock_clashes(100, 5, Utc::now());
        assert!(clashes
            .windows(2)
            .all(|w| w[0].severity >= w[1].severity));
        assert_eq!(clashes[0].severity, Severity::High);
    }
}
