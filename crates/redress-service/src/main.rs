use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use clap::Parser;
use redress_api::{
    DecisionFilterOptions, DecisionQueryParams, DirectorCreated, InitComplaintRequest,
    MigrateResult, NextUid, RedressApi, API_CONTRACT_VERSION,
};
use redress_core::{
    Complaint, Director, DirectorDraft, Enquiry, EnquiryDraft, EnquiryFile, EnquiryFileDraft,
    FieldErrors, RegisterError, SectionPayload,
};
use serde::{Deserialize, Serialize};

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: RedressApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    service_contract_version: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
    #[serde(skip)]
    status: StatusCode,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrateRequest {
    dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct SectorScopeQuery {
    sector_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EnquiryListQuery {
    email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DirectorListQuery {
    complaint_id: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "redress-service")]
#[command(about = "Local HTTP service for the Redress case register")]
struct Args {
    #[arg(long, default_value = "./redress.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

/// Map the error taxonomy to transport statuses: per-field validation and
/// invalid sections are client errors, unknown entities are 404, late
/// section edits are conflicts, and anything else degrades to 400.
fn service_error(err: &anyhow::Error) -> ServiceError {
    let (status, errors) = match err.downcast_ref::<RegisterError>() {
        Some(RegisterError::Validation(fields)) => (StatusCode::BAD_REQUEST, Some(fields.clone())),
        Some(RegisterError::InvalidSection(_)) => (StatusCode::BAD_REQUEST, None),
        Some(RegisterError::NotFound(_)) => (StatusCode::NOT_FOUND, None),
        Some(RegisterError::AlreadySubmitted) => (StatusCode::CONFLICT, None),
        None => (StatusCode::BAD_REQUEST, None),
    };

    ServiceError {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        error: err.to_string(),
        errors,
        status,
    }
}

fn validation_error(field: &str, message: &str) -> ServiceError {
    service_error(&RegisterError::validation(field, message).into())
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn parse_optional_id(value: Option<&str>, field: &str) -> Result<Option<i64>, ServiceError> {
    match value.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| validation_error(field, &format!("{field} must be a number"))),
    }
}

fn require_id(value: Option<&str>, field: &str) -> Result<i64, ServiceError> {
    parse_optional_id(value, field)?
        .ok_or_else(|| validation_error(field, &format!("{field} is required")))
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/db/schema-version", post(db_schema_version))
        .route("/v1/db/migrate", post(db_migrate))
        .route("/v1/decisions", get(decisions_query))
        .route("/v1/decisions/filters", get(decisions_filters))
        .route("/v1/decisions/issues", get(decisions_issues))
        .route("/v1/decisions/products", get(decisions_products))
        .route("/v1/enquiries", get(enquiries_list).post(enquiries_create))
        .route("/v1/enquiries/next-uid", get(enquiries_next_uid))
        .route("/v1/enquiries/:uid", get(enquiries_show))
        .route("/v1/enquiries/:uid/files", get(enquiry_files_list).post(enquiry_files_add))
        .route("/v1/complaints/init", post(complaints_init))
        .route("/v1/complaints/:id/section/:section", patch(complaints_update_section))
        .route("/v1/complaints/:id/submit", post(complaints_submit))
        .route("/v1/users/:user_id/complaints", get(user_complaints))
        .route("/v1/directors", get(directors_list).post(directors_create))
        .route("/v1/directors/:id", get(directors_show).delete(directors_delete))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let state = ServiceState { api: RedressApi::new(args.db) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn db_schema_version(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<redress_store_sqlite::SchemaStatus>>, ServiceError> {
    let status = state.api.schema_status().map_err(|err| service_error(&err))?;
    Ok(Json(envelope(status)))
}

async fn db_migrate(
    State(state): State<ServiceState>,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<ServiceEnvelope<MigrateResult>>, ServiceError> {
    let result = state.api.migrate(request.dry_run).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(result)))
}

async fn decisions_query(
    State(state): State<ServiceState>,
    Query(params): Query<DecisionQueryParams>,
) -> Result<Json<ServiceEnvelope<redress_core::DecisionQueryPage>>, ServiceError> {
    let page = state.api.query_decisions(&params).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(page)))
}

async fn decisions_filters(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<DecisionFilterOptions>>, ServiceError> {
    let options = state.api.decision_filter_options().map_err(|err| service_error(&err))?;
    Ok(Json(envelope(options)))
}

async fn decisions_issues(
    State(state): State<ServiceState>,
    Query(scope): Query<SectorScopeQuery>,
) -> Result<Json<ServiceEnvelope<Vec<redress_core::Issue>>>, ServiceError> {
    let sector_id = require_id(scope.sector_id.as_deref(), "sector_id")?;
    let issues = state.api.issues_for_sector(sector_id).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(issues)))
}

async fn decisions_products(
    State(state): State<ServiceState>,
    Query(scope): Query<SectorScopeQuery>,
) -> Result<Json<ServiceEnvelope<Vec<redress_core::Product>>>, ServiceError> {
    let sector_id = require_id(scope.sector_id.as_deref(), "sector_id")?;
    let products = state.api.products_for_sector(sector_id).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(products)))
}

async fn enquiries_list(
    State(state): State<ServiceState>,
    Query(query): Query<EnquiryListQuery>,
) -> Result<Json<ServiceEnvelope<Vec<Enquiry>>>, ServiceError> {
    let enquiries = state
        .api
        .list_enquiries(query.email.as_deref().filter(|email| !email.is_empty()))
        .map_err(|err| service_error(&err))?;
    Ok(Json(envelope(enquiries)))
}

async fn enquiries_create(
    State(state): State<ServiceState>,
    Json(draft): Json<EnquiryDraft>,
) -> Result<Json<ServiceEnvelope<Enquiry>>, ServiceError> {
    let enquiry = state.api.create_enquiry(&draft).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(enquiry)))
}

async fn enquiries_next_uid(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<NextUid>>, ServiceError> {
    let next = state.api.next_enquiry_uid().map_err(|err| service_error(&err))?;
    Ok(Json(envelope(next)))
}

async fn enquiries_show(
    State(state): State<ServiceState>,
    Path(uid): Path<String>,
) -> Result<Json<ServiceEnvelope<Enquiry>>, ServiceError> {
    let enquiry = state.api.get_enquiry(&uid).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(enquiry)))
}

async fn enquiry_files_add(
    State(state): State<ServiceState>,
    Path(uid): Path<String>,
    Json(draft): Json<EnquiryFileDraft>,
) -> Result<Json<ServiceEnvelope<EnquiryFile>>, ServiceError> {
    let file = state.api.attach_enquiry_file(&uid, &draft).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(file)))
}

async fn enquiry_files_list(
    State(state): State<ServiceState>,
    Path(uid): Path<String>,
) -> Result<Json<ServiceEnvelope<Vec<EnquiryFile>>>, ServiceError> {
    let files = state.api.list_enquiry_files(&uid).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(files)))
}

async fn complaints_init(
    State(state): State<ServiceState>,
    Json(request): Json<InitComplaintRequest>,
) -> Result<Json<ServiceEnvelope<Complaint>>, ServiceError> {
    let complaint = state.api.init_complaint(&request).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(complaint)))
}

async fn complaints_update_section(
    State(state): State<ServiceState>,
    Path((complaint_id, section)): Path<(i64, u8)>,
    Json(payload): Json<SectionPayload>,
) -> Result<Json<ServiceEnvelope<Complaint>>, ServiceError> {
    let complaint = state
        .api
        .update_complaint_section(complaint_id, section, &payload)
        .map_err(|err| service_error(&err))?;
    Ok(Json(envelope(complaint)))
}

async fn complaints_submit(
    State(state): State<ServiceState>,
    Path(complaint_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<redress_core::SubmitReceipt>>, ServiceError> {
    let receipt = state.api.submit_complaint(complaint_id).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(receipt)))
}

async fn user_complaints(
    State(state): State<ServiceState>,
    Path(user_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<Vec<Complaint>>>, ServiceError> {
    let complaints = state.api.complaints_for_user(user_id).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(complaints)))
}

async fn directors_list(
    State(state): State<ServiceState>,
    Query(query): Query<DirectorListQuery>,
) -> Result<Json<ServiceEnvelope<Vec<Director>>>, ServiceError> {
    let complaint_id = parse_optional_id(query.complaint_id.as_deref(), "complaint_id")?;
    let directors = state.api.list_directors(complaint_id).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(directors)))
}

async fn directors_create(
    State(state): State<ServiceState>,
    Json(draft): Json<DirectorDraft>,
) -> Result<Json<ServiceEnvelope<DirectorCreated>>, ServiceError> {
    let created = state.api.create_director(&draft).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(created)))
}

async fn directors_show(
    State(state): State<ServiceState>,
    Path(director_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<Director>>, ServiceError> {
    let director = state.api.get_director(director_id).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(director)))
}

async fn directors_delete(
    State(state): State<ServiceState>,
    Path(director_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<serde_json::Value>>, ServiceError> {
    state.api.delete_director(director_id).map_err(|err| service_error(&err))?;
    Ok(Json(envelope(serde_json::json!({ "deleted": director_id }))))
}
