use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use super::{ApiError, AppState};
use crate::config::{PublicConfig, SourceMode};
use crate::export::write_csv;
use crate::model::{
    validate_reference_id, ClashQuery, ClashRecord, KpiSummary, NewProblem, Problem, ProblemLink,
    ProblemList,
};
use crate::report::{generate_report, GeneratedReport, ReportRequest};
use crate::service::{
    calculate_kpis, filter_and_sort, model_urns as collect_model_urns, query_clashes, ClashPage,
    ModelUrns, ViewerClash,
};
use crate::storage::StoredReport;

type QueryPairs = Query<Vec<(String, String)>>;

#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
    version: &'static str,
    mode: SourceMode,
    source: &'static str,
    clashes_loaded: Option<usize>,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mode: state.config.mode,
        source: state.store.source_name(),
        clashes_loaded: state.store.loaded().map(|s| s.len()),
    })
}

pub async fn config(State(state): State<AppState>) -> Json<PublicConfig> {
    Json(state.config.public.clone())
}

pub async fn list_clashes(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Json<ClashPage>, ApiError> {
    let query = ClashQuery::from_pairs(&pairs, state.config.max_page_size)?;
    let snapshot = state.store.snapshot().await?;
    Ok(Json(query_clashes(snapshot.records(), &query)))
}

pub async fn get_clash(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClashRecord>, ApiError> {
    let snapshot = state.store.snapshot().await?;
    snapshot
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("clash", &id))
}

#[derive(Debug, Serialize)]
pub struct Refreshed {
    total: usize,
    fetched_at: DateTime<Utc>,
    source: &'static str,
}

pub async fn refresh_clashes(State(state): State<AppState>) -> Result<Json<Refreshed>, ApiError> {
    let snapshot = state.store.refresh().await?;
    Ok(Json(Refreshed {
        total: snapshot.len(),
        fetched_at: snapshot.fetched_at(),
        source: state.store.source_name(),
    }))
}

/// KPI summary over the filtered set. Sort and page parameters are ignored.
pub async fn kpis(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Json<KpiSummary>, ApiError> {
    let query = ClashQuery::from_pairs(&pairs, state.config.max_page_size)?;
    let snapshot = state.store.snapshot().await?;
    let selected = filter_and_sort(snapshot.records(), &query.filter, query.sort);
    Ok(Json(calculate_kpis(selected.iter().copied())))
}

/// Every matching record as CSV, in the requested order; pagination is ignored.
pub async fn export_clashes_csv(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Response, ApiError> {
    let query = ClashQuery::from_pairs(&pairs, state.config.max_page_size)?;
    let snapshot = state.store.snapshot().await?;
    let selected = filter_and_sort(snapshot.records(), &query.filter, query.sort);

    let mut body = Vec::new();
    write_csv(&selected, &mut body)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"clashes.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// Generates a PDF from the current snapshot.
///
/// An empty body uses the defaults of [`ReportRequest`].
pub async fn create_report(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<GeneratedReport>), ApiError> {
    let body = body?;
    let request: ReportRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ReportRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("invalid report request: {e}")))?
    };

    let snapshot = state.store.snapshot().await?;
    let files = state.files.clone();
    let config = state.config.clone();
    let report = tokio::task::spawn_blocking(move || {
        generate_report(
            snapshot.records(),
            &request,
            &config.layout,
            &files,
            Utc::now(),
        )
    })
    .await??;

    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn latest_report(State(state): State<AppState>) -> Result<Response, ApiError> {
    let files = state.files.clone();
    let found = tokio::task::spawn_blocking(move || files.latest_report()).await??;
    let report = found.ok_or_else(|| ApiError::NotFound("no report has been generated yet".into()))?;
    pdf_response(report).await
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let files = state.files.clone();
    let lookup = id.clone();
    let found = tokio::task::spawn_blocking(move || files.find_report(&lookup)).await??;
    let report = found.ok_or_else(|| ApiError::not_found("report", &id))?;
    pdf_response(report).await
}

async fn pdf_response(report: StoredReport) -> Result<Response, ApiError> {
    let path = report.path.clone();
    let bytes = tokio::task::spawn_blocking(move || std::fs::read(&path))
        .await?
        .map_err(|source| crate::error::StorageError::Read {
            path: report.path.clone(),
            source,
        })?;

    let disposition = format!("inline; filename=\"{}.pdf\"", report.report_id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    clash_id: String,
    image_data: String,
}

#[derive(Debug, Serialize)]
pub struct CaptureSaved {
    clash_id: String,
    path: PathBuf,
}

pub async fn save_capture(
    State(state): State<AppState>,
    payload: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CaptureSaved>), ApiError> {
    let Json(request) = payload?;

    let files = state.files.clone();
    let clash_id = request.clash_id.clone();
    let path = tokio::task::spawn_blocking(move || {
        files.save_capture(&request.clash_id, &request.image_data)
    })
    .await??;

    info!(clash = %clash_id, "capture uploaded");
    Ok((StatusCode::CREATED, Json(CaptureSaved { clash_id, path })))
}

#[derive(Debug, Deserialize)]
pub struct ProblemFilter {
    clash_id: Option<String>,
}

pub async fn list_problems(
    State(state): State<AppState>,
    Query(filter): Query<ProblemFilter>,
) -> Result<Json<ProblemList>, ApiError> {
    let clash_id = filter.clash_id.as_deref().filter(|id| !id.is_empty());
    let problems = state.problems.list(clash_id).await?;
    Ok(Json(problems.into()))
}

/// Creates a problem linked to an existing clash.
pub async fn create_problem(
    State(state): State<AppState>,
    payload: Result<Json<NewProblem>, JsonRejection>,
) -> Result<(StatusCode, Json<Problem>), ApiError> {
    let Json(problem) = payload?;
    problem.validate()?;
    require_clash(&state, &problem.clash_id).await?;

    let created = state.problems.create(problem).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn link_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    payload: Result<Json<ProblemLink>, JsonRejection>,
) -> Result<Json<Problem>, ApiError> {
    let Json(link) = payload?;
    validate_reference_id("problem_id", &problem_id)?;
    validate_reference_id("clash_id", &link.clash_id)?;
    require_clash(&state, &link.clash_id).await?;

    let problem = state.problems.link(&problem_id, &link.clash_id).await?;
    let problem = problem.ok_or_else(|| ApiError::not_found("problem", &problem_id))?;
    info!(problem = %problem_id, clash = %link.clash_id, "problem linked");
    Ok(Json(problem))
}

pub async fn unlink_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    payload: Result<Json<ProblemLink>, JsonRejection>,
) -> Result<Json<Problem>, ApiError> {
    let Json(link) = payload?;
    validate_reference_id("problem_id", &problem_id)?;
    validate_reference_id("clash_id", &link.clash_id)?;

    let problem = state.problems.unlink(&problem_id, &link.clash_id).await?;
    let problem = problem.ok_or_else(|| ApiError::not_found("problem", &problem_id))?;
    info!(problem = %problem_id, clash = %link.clash_id, "problem unlinked");
    Ok(Json(problem))
}

async fn require_clash(state: &AppState, clash_id: &str) -> Result<(), ApiError> {
    let snapshot = state.store.snapshot().await?;
    if snapshot.get(clash_id).is_none() {
        return Err(ApiError::not_found("clash", clash_id));
    }
    Ok(())
}

pub async fn model_urns(State(state): State<AppState>) -> Result<Json<ModelUrns>, ApiError> {
    let snapshot = state.store.snapshot().await?;
    Ok(Json(collect_model_urns(snapshot.records())))
}

pub async fn viewer_clash(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ViewerClash>, ApiError> {
    let snapshot = state.store.snapshot().await?;
    snapshot
        .get(&id)
        .map(|record| Json(ViewerClash::from(record)))
        .ok_or_else(|| ApiError::not_found("clash", &id))
}
