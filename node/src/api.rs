//! # HTTP API
//!
//! Builds the axum router that exposes the engine's operations and query
//! surface. All handlers share application state through axum's `State`
//! extractor; the engine sits behind a `tokio::sync::RwLock`, so every
//! mutating request runs as one atomic unit — cascade included — exactly
//! the serialization the accounting expects.
//!
//! ## Endpoints
//!
//! | Method | Path                               | Description                       |
//! |--------|------------------------------------|-----------------------------------|
//! | GET    | `/health`                          | Liveness probe                    |
//! | GET    | `/status`                          | Node status summary               |
//! | POST   | `/vaults`                          | Create a vault                    |
//! | GET    | `/vaults/:id`                      | Vault configuration               |
//! | GET    | `/vaults/:id/balance`              | Assets, shares, display price     |
//! | GET    | `/vaults/:id/level`                | Tree level                        |
//! | GET    | `/vaults/:id/children/:candidate`  | Direct-child membership           |
//! | GET    | `/vaults/:id/shares/:holder`       | A holder's share balance          |
//! | POST   | `/vaults/:id/deposit`              | Deposit (mints shares)            |
//! | POST   | `/vaults/:id/withdraw`             | Withdraw (burns shares)           |
//! | POST   | `/vaults/:id/fund`                 | Fund (no shares)                  |
//! | POST   | `/vaults/:id/payout`               | Controller-only disbursement      |
//! | POST   | `/vaults/:id/metadata`             | Controller-only metadata update   |
//! | POST   | `/faucet`                          | Dev-bank mint (reference rail)    |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cascade_engine::{
    AssetId, EngineError, InMemoryAssetBank, RegistryError, TracingEventSink, VaultEngine, VaultId,
    VaultParams,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The engine as the node hosts it: settled against the in-memory bank,
/// with committed facts flowing out through structured logs.
pub type NodeEngine = VaultEngine<Arc<InMemoryAssetBank>, TracingEventSink>;

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// When this node started, for uptime reporting.
    pub started_at: DateTime<Utc>,
    /// The vault tree engine. Write lock per mutating request.
    pub engine: Arc<RwLock<NodeEngine>>,
    /// The reference settlement rail backing the engine. Kept separately
    /// so the faucet and balance probes can reach it without the engine
    /// lock.
    pub bank: Arc<InMemoryAssetBank>,
    /// Prometheus metrics handles.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/vaults", post(create_vault_handler))
        .route("/vaults/:id", get(vault_config_handler))
        .route("/vaults/:id/balance", get(balance_handler))
        .route("/vaults/:id/level", get(level_handler))
        .route("/vaults/:id/children/:candidate", get(membership_handler))
        .route("/vaults/:id/shares/:holder", get(shares_handler))
        .route("/vaults/:id/deposit", post(deposit_handler))
        .route("/vaults/:id/withdraw", post(withdraw_handler))
        .route("/vaults/:id/fund", post(fund_handler))
        .route("/vaults/:id/payout", post(payout_handler))
        .route("/vaults/:id/metadata", post(update_metadata_handler))
        .route("/faucet", post(faucet_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Vaults currently registered.
    pub vault_count: usize,
    /// Seconds since the node started.
    pub uptime_seconds: i64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Request payload for `POST /vaults`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVaultRequest {
    /// Account performing the creation; becomes the vault's controller.
    pub controller: String,
    /// Asset identifier the vault will account for.
    pub asset: String,
    /// Optional parent vault id.
    pub parent: Option<VaultId>,
    /// Upstream split in basis points, `[0, 10000]`.
    pub percent: u32,
    /// Opaque metadata reference.
    #[serde(default)]
    pub metadata: String,
}

/// Response payload for `POST /vaults`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVaultResponse {
    /// The new vault's id.
    pub id: VaultId,
}

/// Request payload for `POST /vaults/:id/deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Account the assets are pulled from.
    pub sender: String,
    /// Contribution in smallest units.
    pub amount: u128,
    /// Account the shares are minted to.
    pub receiver: String,
}

/// Request payload for `POST /vaults/:id/withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Share holder whose shares are burned.
    pub sender: String,
    /// Assets to withdraw, in smallest units.
    pub amount: u128,
    /// Account the assets are paid to.
    pub receiver: String,
}

/// Shares moved by a deposit or withdrawal.
#[derive(Debug, Serialize, Deserialize)]
pub struct SharesResponse {
    /// Shares minted (deposit) or burned (withdraw), or held (query).
    pub shares: u128,
}

/// Request payload for `POST /vaults/:id/fund`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FundRequest {
    /// Contributing account.
    pub sender: String,
    /// Contribution in smallest units.
    pub amount: u128,
    /// Whether the contribution cascades upstream.
    pub push_upstream: bool,
}

/// Request payload for `POST /vaults/:id/payout`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// Must be the vault's controller.
    pub caller: String,
    /// Disbursement in smallest units.
    pub amount: u128,
    /// Account the assets are paid to.
    pub recipient: String,
}

/// Request payload for `POST /vaults/:id/metadata`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateMetadataRequest {
    /// Must be the vault's controller.
    pub caller: String,
    /// Replacement metadata reference.
    pub metadata: String,
}

/// Request payload for `POST /faucet` — mints into the reference bank.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    /// Asset to mint.
    pub asset: String,
    /// Receiving account.
    pub account: String,
    /// Amount in smallest units.
    pub amount: u128,
}

/// Response payload for `GET /vaults/:id/level`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LevelResponse {
    /// Distance to the root.
    pub level: u32,
}

/// Response payload for `GET /vaults/:id/children/:candidate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    /// True iff the candidate is a direct child.
    pub is_child: bool,
}

/// Generic error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// Maps engine failures onto HTTP statuses: unknown ids are 404, malformed
/// requests 400, authorization 403, and everything the books refuse
/// (insufficient balances, overflow, rejected transfers) 422.
fn error_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::Registry(RegistryError::VaultNotFound(_))
        | EngineError::Registry(RegistryError::ParentNotFound(_)) => StatusCode::NOT_FOUND,
        EngineError::Registry(_) | EngineError::InvalidAmount => StatusCode::BAD_REQUEST,
        EngineError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        EngineError::InsufficientAssets { .. }
        | EngineError::Ledger(_)
        | EngineError::TransferFailed(_)
        | EngineError::Overflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Reentrant => StatusCode::CONFLICT,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
///
/// The liveness probe for orchestrators. It intentionally checks nothing
/// beyond process liveness — that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// `GET /status` — node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let vault_count = state.engine.read().await.registry().len();
    Json(StatusResponse {
        version: state.version.clone(),
        vault_count,
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// `POST /vaults` — creates a vault.
async fn create_vault_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateVaultRequest>,
) -> Response {
    let params = VaultParams {
        asset: AssetId::new(req.asset),
        parent: req.parent,
        percent: req.percent,
        metadata: req.metadata,
    };

    let mut engine = state.engine.write().await;
    match engine.create(&req.controller, params) {
        Ok(id) => {
            state.metrics.vaults_created_total.inc();
            state.metrics.vault_count.set(engine.registry().len() as i64);
            (StatusCode::CREATED, Json(CreateVaultResponse { id })).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `GET /vaults/:id` — configuration snapshot.
async fn vault_config_handler(
    State(state): State<AppState>,
    Path(id): Path<VaultId>,
) -> Response {
    match state.engine.read().await.vault_config(id) {
        Ok(view) => Json(view).into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /vaults/:id/balance` — assets, shares, display price.
async fn balance_handler(State(state): State<AppState>, Path(id): Path<VaultId>) -> Response {
    match state.engine.read().await.balance(id) {
        Ok(view) => Json(view).into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /vaults/:id/level` — cached tree level.
async fn level_handler(State(state): State<AppState>, Path(id): Path<VaultId>) -> Response {
    match state.engine.read().await.tree_level(id) {
        Ok(level) => Json(LevelResponse { level }).into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /vaults/:id/children/:candidate` — direct-child membership.
async fn membership_handler(
    State(state): State<AppState>,
    Path((id, candidate)): Path<(VaultId, VaultId)>,
) -> Response {
    match state.engine.read().await.is_child_vault(id, candidate) {
        Ok(is_child) => Json(MembershipResponse { is_child }).into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /vaults/:id/shares/:holder` — a holder's share balance.
async fn shares_handler(
    State(state): State<AppState>,
    Path((id, holder)): Path<(VaultId, String)>,
) -> Response {
    match state.engine.read().await.shares_of(id, &holder) {
        Ok(shares) => Json(SharesResponse { shares }).into_response(),
        Err(err) => error_response(err),
    }
}

/// `POST /vaults/:id/deposit` — deposit, minting shares to the receiver.
async fn deposit_handler(
    State(state): State<AppState>,
    Path(id): Path<VaultId>,
    Json(req): Json<DepositRequest>,
) -> Response {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state
        .engine
        .write()
        .await
        .deposit(id, &req.sender, req.amount, &req.receiver);
    timer.observe_duration();

    match result {
        Ok(shares) => {
            state.metrics.deposits_total.inc();
            Json(SharesResponse { shares }).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /vaults/:id/withdraw` — withdrawal, burning the sender's shares.
async fn withdraw_handler(
    State(state): State<AppState>,
    Path(id): Path<VaultId>,
    Json(req): Json<WithdrawRequest>,
) -> Response {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state
        .engine
        .write()
        .await
        .withdraw(id, &req.sender, req.amount, &req.receiver);
    timer.observe_duration();

    match result {
        Ok(shares) => {
            state.metrics.withdrawals_total.inc();
            Json(SharesResponse { shares }).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /vaults/:id/fund` — contribution without share issuance.
async fn fund_handler(
    State(state): State<AppState>,
    Path(id): Path<VaultId>,
    Json(req): Json<FundRequest>,
) -> Response {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state
        .engine
        .write()
        .await
        .fund(id, &req.sender, req.amount, req.push_upstream);
    timer.observe_duration();

    match result {
        Ok(()) => {
            state.metrics.fundings_total.inc();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /vaults/:id/payout` — controller-only disbursement.
async fn payout_handler(
    State(state): State<AppState>,
    Path(id): Path<VaultId>,
    Json(req): Json<PayoutRequest>,
) -> Response {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state
        .engine
        .write()
        .await
        .payout(id, &req.caller, req.amount, &req.recipient);
    timer.observe_duration();

    match result {
        Ok(()) => {
            state.metrics.payouts_total.inc();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /vaults/:id/metadata` — controller-only metadata replacement.
async fn update_metadata_handler(
    State(state): State<AppState>,
    Path(id): Path<VaultId>,
    Json(req): Json<UpdateMetadataRequest>,
) -> Response {
    let result = state
        .engine
        .write()
        .await
        .update_metadata(id, &req.caller, req.metadata);

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

/// `POST /faucet` — mints into the reference bank so local clients can
/// exercise the deposit/fund paths. A production embedder replaces the
/// whole rail, faucet included.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Response {
    let asset = AssetId::new(req.asset);
    match state.bank.mint(&asset, &req.account, req.amount) {
        Ok(balance) => Json(serde_json::json!({ "balance": balance })).into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use cascade_engine::EngineConfig;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let bank = Arc::new(InMemoryAssetBank::new());
        let engine = VaultEngine::new(
            EngineConfig::default(),
            Arc::clone(&bank),
            TracingEventSink,
        );
        AppState {
            version: "test".to_string(),
            started_at: Utc::now(),
            engine: Arc::new(RwLock::new(engine)),
            bank,
            metrics: Arc::new(NodeMetrics::new()),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let router = create_router(test_state());
        let response = router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_vault_is_404() {
        let router = create_router(test_state());
        let response = router
            .oneshot(get("/vaults/00000000-0000-4000-8000-000000000000/balance"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_percent_is_400() {
        let router = create_router(test_state());
        let response = router
            .oneshot(post_json(
                "/vaults",
                serde_json::json!({
                    "controller": "acct:alice",
                    "asset": "asset:usd",
                    "parent": null,
                    "percent": 10_001,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_deposit_balance_flow() {
        let state = test_state();
        let router = create_router(state.clone());

        // Create a root vault.
        let response = router
            .clone()
            .oneshot(post_json(
                "/vaults",
                serde_json::json!({
                    "controller": "acct:alice",
                    "asset": "asset:usd",
                    "parent": null,
                    "percent": 0,
                    "metadata": "bafy-root",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        // Faucet Alice, then deposit.
        let response = router
            .clone()
            .oneshot(post_json(
                "/faucet",
                serde_json::json!({
                    "asset": "asset:usd",
                    "account": "acct:alice",
                    "amount": 1_000,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(post_json(
                &format!("/vaults/{}/deposit", id),
                serde_json::json!({
                    "sender": "acct:alice",
                    "amount": 1_000,
                    "receiver": "acct:alice",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["shares"], 1_000);

        // Balance reflects the deposit.
        let response = router
            .oneshot(get(&format!("/vaults/{}/balance", id)))
            .await
            .unwrap();
        let balance = body_json(response).await;
        assert_eq!(balance["assets"], 1_000);
        assert_eq!(balance["shares"], 1_000);
        assert_eq!(balance["price"], 1);

        assert_eq!(state.metrics.deposits_total.get(), 1);
    }

    #[tokio::test]
    async fn unauthorized_payout_is_403() {
        let state = test_state();
        let router = create_router(state.clone());

        let response = router
            .clone()
            .oneshot(post_json(
                "/vaults",
                serde_json::json!({
                    "controller": "acct:alice",
                    "asset": "asset:usd",
                    "parent": null,
                    "percent": 0,
                }),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = router
            .oneshot(post_json(
                &format!("/vaults/{}/payout", id),
                serde_json::json!({
                    "caller": "acct:mallory",
                    "amount": 1,
                    "recipient": "acct:mallory",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
