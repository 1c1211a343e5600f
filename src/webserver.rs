//! HTTP surface of the certificate authority.
//!
//! JSON endpoints under `/api`, downloads of public artifacts under `/data`,
//! and static UI assets from the configured web root for every other path.

use crate::authority::CertificateAuthority;
use crate::configs::{AppConfig, LeafDefaults, RootCADefaults};
use crate::error::{CaError, DeletionReport};
use crate::generate_root_ca::SignatureAlgorithm;
use crate::leaf_issuer::LeafRequest;
use crate::root_ca_store::RootCaParams;
use crate::storage::Storage;
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::services::fs::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    authority: Arc<CertificateAuthority>,
    root_defaults: RootCADefaults,
    leaf_defaults: LeafDefaults,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            authority: Arc::new(CertificateAuthority::new(Storage::new(
                config.storage.directory.clone(),
            ))),
            root_defaults: config.root_ca_defaults.clone(),
            leaf_defaults: config.leaf_defaults.clone(),
        }
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Serialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateRootRequest {
    common_name: Option<String>,
    days: Option<Value>,
    key_size: Option<Value>,
    algorithm: Option<String>,
}

#[derive(Deserialize, Default)]
struct ForceQuery {
    force: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRootResponse {
    message: String,
    common_name: String,
    days: u32,
    key_size: u32,
}

#[derive(Deserialize, Default)]
struct ImportRootRequest {
    #[serde(default, rename = "private")]
    private_pem: String,
    #[serde(default, rename = "public")]
    public_pem: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IssueLeafRequest {
    #[serde(default)]
    common_name: String,
    #[serde(default)]
    sans: String,
    days: Option<Value>,
    key_size: Option<Value>,
}

#[derive(Serialize)]
struct IssueLeafResponse {
    message: String,
    name: String,
    expiry: String,
    cert_file: String,
    key_file: String,
    chain_file: Option<String>,
    download_cert: String,
    download_key: String,
    download_chain: Option<String>,
}

#[derive(Deserialize, Default)]
struct NameParam {
    name: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
    name: String,
    details: DeletionReport,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<DeletionReport>,
}

// ============================================================================
// Error mapping
// ============================================================================

/// A core error paired with the generic message shown for internal failures.
struct ApiError {
    error: CaError,
    internal_message: &'static str,
}

impl ApiError {
    fn new(internal_message: &'static str) -> impl FnOnce(CaError) -> ApiError {
        move |error| ApiError {
            error,
            internal_message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.error {
            CaError::Validation(msg) | CaError::Precondition(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: msg,
                    details: None,
                },
            ),
            CaError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: msg,
                    details: None,
                },
            ),
            CaError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: msg,
                    details: None,
                },
            ),
            CaError::Deletion { name, report } => {
                error!(name = %name, report = ?report, "Deletion failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: self.internal_message.to_string(),
                        details: Some(report),
                    },
                )
            }
            err @ (CaError::Io { .. } | CaError::Signing(_)) => {
                error!(error = %err, "{}", self.internal_message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: self.internal_message.to_string(),
                        details: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Run a blocking core operation off the async executor.
async fn run_blocking<T, F>(internal_message: &'static str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CaError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::new(internal_message)),
        Err(join_error) => Err(ApiError {
            error: CaError::Signing(format!("Worker task failed: {}", join_error)),
            internal_message,
        }),
    }
}

/// Accept a JSON number or numeric string; `None` falls back to `default`.
fn numeric_field(value: Option<&Value>, default: u32, invalid: &str) -> Result<u32, CaError> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(default),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        Some(_) => None,
    };
    parsed.ok_or_else(|| CaError::Validation(invalid.to_string()))
}

/// Unpack an optional JSON body.
///
/// A request without a JSON body (no `application/json` content type) falls
/// back to `T::default()`. A body that is present but malformed or mistyped
/// is a `Validation` error, never silently replaced by defaults.
fn optional_json<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, CaError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(CaError::Validation(format!(
            "Invalid JSON body: {}",
            rejection.body_text()
        ))),
    }
}

fn is_truthy(flag: Option<&str>) -> bool {
    matches!(flag, Some("1") | Some("true"))
}

fn root_ca_params(
    request: GenerateRootRequest,
    defaults: &RootCADefaults,
) -> Result<RootCaParams, CaError> {
    Ok(RootCaParams {
        common_name: request
            .common_name
            .filter(|cn| !cn.trim().is_empty())
            .unwrap_or_else(|| defaults.common_name.clone()),
        validity_days: numeric_field(
            request.days.as_ref(),
            defaults.validity_days,
            "Invalid days value",
        )?,
        key_size: numeric_field(
            request.key_size.as_ref(),
            defaults.key_size,
            "Invalid keySize. Allowed: 1024, 2048, 4096",
        )?,
        algorithm: request
            .algorithm
            .as_deref()
            .unwrap_or(defaults.algorithm.as_str())
            .parse::<SignatureAlgorithm>()?,
    })
}

fn build_leaf_request(
    request: IssueLeafRequest,
    defaults: &LeafDefaults,
) -> Result<LeafRequest, CaError> {
    Ok(LeafRequest {
        validity_days: numeric_field(
            request.days.as_ref(),
            defaults.validity_days,
            "Invalid days value",
        )?,
        key_size: numeric_field(
            request.key_size.as_ref(),
            defaults.key_size,
            "Invalid keySize. Allowed: 1024, 2048, 4096",
        )?,
        common_name: request.common_name,
        sans: request.sans,
    })
}

// ============================================================================
// Handlers
// ============================================================================

async fn root_ca_exists(State(state): State<AppState>) -> Json<ExistsResponse> {
    Json(ExistsResponse {
        exists: state.authority.root_ca_exists(),
    })
}

async fn generate_root_ca(
    State(state): State<AppState>,
    Query(query): Query<ForceQuery>,
    body: Result<Json<GenerateRootRequest>, JsonRejection>,
) -> Result<Json<GenerateRootResponse>, ApiError> {
    const FAILURE: &str = "Failed to generate CA";
    let force = is_truthy(query.force.as_deref());
    // An existing CA is reported before any parameter problem
    state
        .authority
        .root_ca()
        .ensure_replaceable(force)
        .map_err(ApiError::new(FAILURE))?;
    let params = optional_json(body)
        .and_then(|request| root_ca_params(request, &state.root_defaults))
        .map_err(ApiError::new(FAILURE))?;

    let authority = Arc::clone(&state.authority);
    let info = run_blocking(FAILURE, move || authority.generate_root_ca(&params, force)).await?;

    Ok(Json(GenerateRootResponse {
        message: "Root CA generated".to_string(),
        common_name: info.common_name,
        days: info.days,
        key_size: info.key_size,
    }))
}

async fn import_root_ca(
    State(state): State<AppState>,
    body: Result<Json<ImportRootRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    const FAILURE: &str = "Failed to save CA";
    let request = optional_json(body).map_err(ApiError::new(FAILURE))?;

    let authority = Arc::clone(&state.authority);
    run_blocking(FAILURE, move || {
        authority.import_root_ca(&request.private_pem, &request.public_pem)
    })
    .await?;

    Ok(Json(MessageResponse {
        message: "CA uploaded".to_string(),
    }))
}

async fn issue_leaf(
    State(state): State<AppState>,
    body: Result<Json<IssueLeafRequest>, JsonRejection>,
) -> Result<Json<IssueLeafResponse>, ApiError> {
    const FAILURE: &str = "Failed to generate certificate";
    let leaf_request = optional_json(body)
        .and_then(|request| build_leaf_request(request, &state.leaf_defaults))
        .map_err(ApiError::new(FAILURE))?;

    let authority = Arc::clone(&state.authority);
    let entry = run_blocking(FAILURE, move || authority.issue_leaf(&leaf_request)).await?;

    Ok(Json(IssueLeafResponse {
        message: "Certificate generated".to_string(),
        download_cert: format!("/data/{}", entry.cert_file),
        download_key: format!("/data/{}", entry.key_file),
        download_chain: entry.chain_file.as_ref().map(|f| format!("/data/{}", f)),
        name: entry.name,
        expiry: entry.expiry,
        cert_file: entry.cert_file,
        key_file: entry.key_file,
        chain_file: entry.chain_file,
    }))
}

async fn delete_leaf(
    State(state): State<AppState>,
    Query(query): Query<NameParam>,
    body: Result<Json<NameParam>, JsonRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    const FAILURE: &str = "Failed to delete certificate";
    let name = optional_json(body)
        .map_err(ApiError::new(FAILURE))?
        .name
        .or(query.name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ApiError::new(FAILURE)(CaError::Validation("Missing name".to_string()))
        })?;

    let authority = Arc::clone(&state.authority);
    let target = name.clone();
    let report = run_blocking(FAILURE, move || authority.delete_leaf(&target)).await?;

    Ok(Json(DeleteResponse {
        message: "Certificate deleted".to_string(),
        name,
        details: report,
    }))
}

async fn list_leaves(State(state): State<AppState>) -> Json<Value> {
    let authority = Arc::clone(&state.authority);
    let certificates = tokio::task::spawn_blocking(move || authority.list_leaves())
        .await
        .unwrap_or_default();
    Json(serde_json::json!({ "certificates": certificates }))
}

async fn download(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let authority = Arc::clone(&state.authority);
    let lookup = file.clone();
    let resolved = tokio::task::spawn_blocking(move || authority.resolve_download(&lookup))
        .await
        .ok()
        .flatten();

    let Some(path) = resolved else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = if file.ends_with(".json") {
                "application/json"
            } else if file.ends_with(".der") {
                "application/pkix-cert"
            } else {
                "application/x-pem-file"
            };
            (
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file),
                    ),
                    (header::CACHE_CONTROL, "no-store".to_string()),
                ],
                bytes,
            )
                .into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// Router and server
// ============================================================================

pub fn router(state: AppState, config: &AppConfig) -> Router {
    let web_root = &config.server.web_root;
    let static_files =
        ServeDir::new(web_root).fallback(ServeFile::new(web_root.join("index.html")));

    Router::new()
        .route("/api/root-ca/exists", get(root_ca_exists))
        .route("/api/root-ca/exsists", get(root_ca_exists))
        .route("/api/root-ca/generate", post(generate_root_ca))
        .route("/api/root-ca/import", post(import_root_ca))
        .route("/api/root-ca/upload", post(import_root_ca))
        .route("/api/leaf/generate", post(issue_leaf))
        .route("/api/leaf/delete", get(delete_leaf).post(delete_leaf))
        .route("/api/leaf/list", get(list_leaves))
        .route("/data/:file", get(download))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_webserver(config: AppConfig) -> Result<()> {
    let state = AppState::new(&config);
    let app = router(state, &config);

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .context(format!("Invalid server host: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);

    match (&config.server.tls_cert_path, &config.server.tls_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let tls = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .context("Failed to load TLS certificate and key")?;
            info!(address = %addr, storage = %config.storage.directory.display(), "HTTPS server listening");
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        _ => {
            info!(address = %addr, storage = %config.storage.directory.display(), "HTTP server listening");
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }
    }
    Ok(())
}
