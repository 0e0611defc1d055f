use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::info;

use super::{linked_to, ProblemTracker};
use crate::error::SourceError;
use crate::model::{NewProblem, Problem, ProblemPriority, ProblemReference, ProblemStatus};

/// In-memory problems for demo mode. Changes last for the process lifetime.
#[derive(Debug, Default)]
pub struct MockProblems {
    problems: Mutex<Vec<Problem>>,
}

impl MockProblems {
    #[must_use]
    pub fn new(problems: Vec<Problem>) -> Self {
        Self {
            problems: Mutex::new(problems),
        }
    }

    /// Two open problems linked to clashes of the default mock set.
    #[must_use]
    pub fn seeded(now: DateTime<Utc>) -> Self {
        Self::new(vec![
            demo_problem(
                "problem-0001",
                "Duct through beam at grid C4",
                "Check the HVAC duct route and size the opening in the beam.",
                ProblemStatus::Open,
                ProblemPriority::High,
                "clash_00001",
                now - Duration::days(5),
                now - Duration::days(1),
            ),
            demo_problem(
                "problem-0002",
                "MEP vs structure on level 3",
                "Coordinate before the slab is poured.",
                ProblemStatus::InProgress,
                ProblemPriority::Medium,
                "clash_00015",
                now - Duration::days(10),
                now - Duration::days(2),
            ),
        ])
    }
}

#[allow(clippy::too_many_arguments)]
fn demo_problem(
    id: &str,
    title: &str,
    description: &str,
    status: ProblemStatus,
    priority: ProblemPriority,
    clash_id: &str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> Problem {
    Problem {
        id: id.to_string(),
        title: title.to_string(),
        description: Some(description.to_string()),
        status,
        priority,
        created_at,
        updated_at,
        assigned_to: None,
        due_date: None,
        references: vec![ProblemReference::clash(clash_id, None)],
        clash_ids: vec![clash_id.to_string()],
    }
}

#[async_trait]
impl ProblemTracker for MockProblems {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list(&self, clash_id: Option<&str>) -> Result<Vec<Problem>, SourceError> {
        Ok(linked_to(self.problems.lock().clone(), clash_id))
    }

    async fn create(&self, problem: NewProblem) -> Result<Problem, SourceError> {
        let mut problems = self.problems.lock();
        let id = format!("problem-{:04}", problems.len() + 1);
        let created = problem.into_problem(id, Utc::now());
        problems.push(created.clone());
        info!(problem = %created.id, clash = ?created.clash_ids, "problem created");
        Ok(created)
    }

    async fn link(&self, problem_id: &str, clash_id: &str) -> Result<Option<Problem>, SourceError> {
        let mut problems = self.problems.lock();
        Ok(problems.iter_mut().find(|p| p.id == problem_id).map(|p| {
            p.link(clash_id, Utc::now());
            p.clone()
        }))
    }

    async fn unlink(
        &self,
        problem_id: &str,
        clash_id: &str,
    ) -> Result<Option<Problem>, SourceError> {
        let mut problems = self.problems.lock();
        Ok(problems.iter_mut().find(|p| p.id == problem_id).map(|p| {
            p.unlink(clash_id, Utc::now());
            p.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_problem(clash_id: &str) -> NewProblem {
        NewProblem {
            title: "Move the cable tray".to_string(),
            description: None,
            status: ProblemStatus::Open,
            priority: ProblemPriority::Low,
            assigned_to: Some("site-coordinator".to_string()),
            due_date: None,
            clash_id: clash_id.to_string(),
        }
    }

    #[tokio::test]
    async fn lists_by_clash() {
        let tracker = MockProblems::seeded(Utc::now());
        assert_eq!(tracker.list(None).await.unwrap().len(), 2);

        let linked = tracker.list(Some("clash_00015")).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, "problem-0002");
        assert!(tracker.list(Some("clash_00099")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_problems_get_sequential_ids() {
        let tracker = MockProblems::seeded(Utc::now());
        let created = tracker.create(new_problem("clash_00042")).await.unwrap();
        assert_eq!(created.id, "problem-0003");
        assert_eq!(created.assigned_to.as_deref(), Some("site-coordinator"));

        let linked = tracker.list(Some("clash_00042")).await.unwrap();
        assert_eq!(linked, vec![created]);
    }

    #[tokio::test]
    async fn link_and_unlink_round_trip() {
        let tracker = MockProblems::seeded(Utc::now());

        let linked = tracker.link("problem-0001", "clash_00007").await.unwrap().unwrap();
        assert_eq!(linked.clash_ids, vec!["clash_00001", "clash_00007"]);

        let unlinked = tracker.unlink("problem-0001", "clash_00001").await.unwrap().unwrap();
        assert_eq!(unlinked.clash_ids, vec!["clash_00007"]);
        assert!(tracker.list(Some("clash_00001")).await.unwrap().is_empty());

        assert!(tracker.link("problem-9999", "clash_00007").await.unwrap().is_none());
        assert!(tracker.unlink("problem-9999", "clash_00007").await.unwrap().is_none());
    }
}
