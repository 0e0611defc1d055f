//! # Clash Reporter
//!
//! A small service for BIM coordination clashes: it fetches clash records from
//! Autodesk Model Coordination (or generates demo data), and serves filtered
//! lists, KPI summaries, CSV exports and paginated PDF reports.
//!
//! ## Features
//!
//! - Filter, sort and paginate clashes by severity, status, discipline and level
//! - KPI summary with category and discipline-pair breakdowns
//! - PDF reports with charts, per-severity tables and viewer captures
//! - CSV and JSON exports
//! - Coordination problems linked to clashes, and viewer lookup data
//!
//! ## Example
//!
//! ```no_run
//! use clash_reporter::model::ClashQuery;
//! use clash_reporter::service::{calculate_kpis, query_clashes};
//! use clash_reporter::source::mock::generate_mock_clashes;
//!
//! let records = generate_mock_clashes(100, 42, chrono::Utc::now());
//! let pairs = vec![("severity".to_string(), "high".to_string())];
//! let query = ClashQuery::from_pairs(&pairs, 200).expect("valid query");
//!
//! let page = query_clashes(&records, &query);
//! println!("{} high severity clashes", page.total);
//! println!("{:.1}% resolved", calculate_kpis(&records).resolved_percentage);
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod model;
pub mod problems;
pub mod report;
pub mod service;
pub mod source;
pub mod storage;
