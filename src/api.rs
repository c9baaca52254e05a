use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::task;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::consistency;
use crate::db::{GraphStore, SqliteGraphStore};
use crate::error::{ApiError, LoadError, StoreError};
use crate::etherscan::ChainDataProvider;
use crate::loader::{BulkLoader, LoadSummary};
use crate::transform::{
    transform_to_graph_data, transform_to_table_data, transform_to_wallet_balance,
};
use crate::validator::{self, is_valid_address, RecordKind, ValidationReport};

/// Upper bound for the address listing endpoint
const ADDRESS_LIST_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteGraphStore,
    pub provider: Arc<dyn ChainDataProvider>,
}

#[derive(Deserialize)]
pub struct SuggestionQuery {
    pub search: Option<String>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Wallet graph API running" }))
        .route("/api/addresses/:address", get(address_overview))
        .route("/api/addresses/:address/transactions", get(address_transactions))
        .route("/api/addresses/:address/balance", get(address_balance))
        .route("/api/historical/suggestions", get(suggestions))
        .route("/api/historical/addresses", get(all_addresses))
        .route("/api/historical/:address/transactions", get(historical_transactions))
        .route("/api/historical/:address/network", get(historical_network))
        .route("/api/upload/nodes", post(upload_nodes))
        .route("/api/upload/relationships", post(upload_relationships))
        .route("/api/upload/consistency", post(upload_consistency))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
}

pub async fn serve(cfg: Config, state: AppState) -> eyre::Result<()> {
    let app = router(state, cfg.max_upload_bytes);

    let addr = SocketAddr::new(cfg.bind_addr, cfg.port);
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn success<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "status": "success", "data": data }))
}

/// Lowercased address, or 400 when it is not `0x` + 40 hex digits
fn parse_address(raw: &str) -> Result<String, ApiError> {
    let address = raw.trim().to_lowercase();
    if !is_valid_address(&address) {
        return Err(ApiError::InvalidAddress);
    }
    Ok(address)
}

/// Run a store call on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    Ok(task::spawn_blocking(f).await??)
}

// ---------- live chain data ----------

async fn address_overview(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&address)?;

    let (balance, transactions) = tokio::try_join!(
        state.provider.balance(&address),
        state.provider.transactions(&address)
    )?;

    Ok(success(json!({
        "balance": transform_to_wallet_balance(&address, Some(&balance)),
        "graphData": transform_to_graph_data(&transactions, &address),
        "tableData": transform_to_table_data(&transactions, &address),
    })))
}

async fn address_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&address)?;
    let transactions = state.provider.transactions(&address).await?;

    Ok(success(json!({
        "graphData": transform_to_graph_data(&transactions, &address),
        "tableData": transform_to_table_data(&transactions, &address),
    })))
}

async fn address_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&address)?;
    let balance = state.provider.balance(&address).await?;

    Ok(success(transform_to_wallet_balance(&address, Some(&balance))))
}

// ---------- historical (graph store) ----------

async fn historical_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&address)?;
    let store = state.store.clone();
    let data = blocking(move || store.historical(&address)).await?;

    Ok(success(data))
}

async fn historical_network(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&address)?;
    let store = state.store.clone();
    let data = blocking(move || store.neighborhood(&address)).await?;

    Ok(success(data))
}

async fn suggestions(
    State(state): State<AppState>,
    Query(q): Query<SuggestionQuery>,
) -> Result<Json<Value>, ApiError> {
    let term = q
        .search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Search term is required".to_string()))?;

    let store = state.store.clone();
    let matches = blocking(move || store.search(&term)).await?;

    Ok(success(matches))
}

async fn all_addresses(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let addresses = blocking(move || store.list_addresses(ADDRESS_LIST_LIMIT)).await?;

    Ok(success(addresses))
}

// ---------- uploads ----------

pub enum UploadOutcome {
    Rejected(ValidationReport),
    Loaded(LoadSummary),
}

/// Validate the whole file first; only a clean file reaches the store.
pub fn ingest<S: GraphStore>(
    store: S,
    file: &[u8],
    kind: RecordKind,
) -> Result<UploadOutcome, LoadError> {
    let report = validator::validate(file, kind);
    if !report.is_valid {
        warn!("{} upload rejected with {} errors", kind, report.errors.len());
        return Ok(UploadOutcome::Rejected(report));
    }

    BulkLoader::new(store).load(file, kind).map(UploadOutcome::Loaded)
}

/// Collect every file part of a multipart body by field name
async fn read_files(mut multipart: Multipart) -> Result<HashMap<String, Bytes>, ApiError> {
    let mut files = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        files.insert(name, bytes);
    }
    Ok(files)
}

fn take_file(files: &mut HashMap<String, Bytes>, kind: RecordKind) -> Result<Bytes, ApiError> {
    files
        .remove(&kind.to_string())
        .ok_or_else(|| ApiError::BadRequest(format!("No {} file uploaded", kind)))
}

fn upload_response(kind: RecordKind, outcome: UploadOutcome) -> Response {
    match outcome {
        UploadOutcome::Rejected(report) => {
            let mut body = Map::new();
            body.insert("error".to_string(), json!("CSV validation failed"));
            let errors: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
            body.insert(format!("{}Errors", kind), json!(errors));
            (StatusCode::BAD_REQUEST, Json(Value::Object(body))).into_response()
        }
        UploadOutcome::Loaded(summary) => {
            let message = match kind {
                RecordKind::Node => "Nodes uploaded successfully",
                RecordKind::Relationship => "Relationships uploaded successfully",
            };
            Json(json!({ "success": true, "message": message, "summary": summary }))
                .into_response()
        }
    }
}

async fn upload(
    state: AppState,
    multipart: Multipart,
    kind: RecordKind,
) -> Result<Response, ApiError> {
    let mut files = read_files(multipart).await?;
    let file = take_file(&mut files, kind)?;
    info!("Received {} upload ({} bytes)", kind, file.len());

    let store = state.store.clone();
    let outcome = task::spawn_blocking(move || ingest(store, &file, kind)).await??;

    Ok(upload_response(kind, outcome))
}

async fn upload_nodes(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    upload(state, multipart, RecordKind::Node).await
}

async fn upload_relationships(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    upload(state, multipart, RecordKind::Relationship).await
}

async fn upload_consistency(multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut files = read_files(multipart).await?;
    let nodes = take_file(&mut files, RecordKind::Node)?;
    let relationships = take_file(&mut files, RecordKind::Relationship)?;

    let report = task::spawn_blocking(move || consistency::check(&nodes[..], &relationships[..]))
        .await?
        .map_err(|e| ApiError::BadRequest(format!("File reading error: {}", e)))?;

    Ok(success(report))
}
