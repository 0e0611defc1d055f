pub mod clash;
pub mod filter;
pub mod kpi;
pub mod problem;

pub use clash::{ClashElement, ClashRecord, Location, Severity, Status};
pub use filter::{
    ClashFilter, ClashQuery, PageRequest, SortKey, SortOrder, SortSpec, DEFAULT_MAX_PAGE_SIZE,
    DEFAULT_PAGE_SIZE,
};
pub use kpi::{CategoryCount, DisciplineStats, KpiSummary, SeverityCounts, StatusCounts};
pub use problem::{
    validate_reference_id, NewProblem, Problem, ProblemLink, ProblemList, ProblemPriority,
    ProblemReference, ProblemStatus,
};
