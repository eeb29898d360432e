//! HTTP surface: JSON routes mounted under /api/trades.
use crate::error::AnchorError;
use crate::service::AnchorService;
use crate::trade::{Side, TimeStamp, TradeHash, TradeIntent};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::service::HistoryPage;
use crate::store::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnchorService>,
}

pub fn router(service: Arc<AnchorService>) -> Router {
    let trades = Router::new()
        .route("/verify", post(verify_trade))
        .route("/proof/:trade_hash", get(trade_proof))
        .route("/verified/:trade_hash", get(trade_verified))
        .route("/history/:user_id", get(user_history))
        .route("/wallet/:wallet_address", get(wallet_history))
        .route("/stats", get(stats))
        .route("/:trade_id", get(trade_by_id));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/trades", trades)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

/// Maps the error taxonomy onto status codes: client-correctable input is
/// 400, missing lookups 404, everything else 500 with the cause inline.
pub struct ApiError(AnchorError);

impl From<AnchorError> for ApiError {
    fn from(err: AnchorError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AnchorError::InvalidIntent(_) => StatusCode::BAD_REQUEST,
            AnchorError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Trade anchoring service is running" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    symbol: Option<String>,
    price: Option<Decimal>,
    quantity: Option<Decimal>,
    side: Option<String>,
    user_id: Option<String>,
    wallet_address: Option<String>,
}

async fn verify_trade(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(symbol), Some(price), Some(quantity), Some(side)) =
        (&body.symbol, body.price, body.quantity, &body.side)
    else {
        return Err(AnchorError::InvalidIntent(
            "missing required fields: symbol, price, quantity, side".into(),
        )
        .into());
    };
    let side = Side::parse(side)
        .ok_or_else(|| AnchorError::InvalidIntent(format!("side must be BUY or SELL, got {side}")))?;

    let mut intent = TradeIntent::new()
        .set_symbol(symbol)
        .set_price(price)
        .set_quantity(quantity)
        .set_side(side)
        .set_submitted_at(TimeStamp::now());
    if let Some(user_id) = &body.user_id {
        intent = intent.set_user(user_id);
    }
    if let Some(wallet) = &body.wallet_address {
        intent = intent.set_wallet(wallet);
    }

    let verified = state.service.verify(intent).await?;
    Ok(Json(json!({
        "tradeHash": verified.record.trade_hash,
        "transactionHash": verified.receipt.transaction_hash,
        "blockNumber": verified.receipt.block_number,
        "gasUsed": verified.receipt.gas_used,
        "dbId": verified.record.record_id,
    })))
}

async fn trade_proof(
    State(state): State<AppState>,
    Path(trade_hash): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let hash = TradeHash::parse(&trade_hash)?;
    let evidence = state.service.proof(&hash).await?;
    Ok(Json(json!({
        "blockchain": evidence.blockchain,
        "database": evidence.database,
    })))
}

async fn trade_verified(
    State(state): State<AppState>,
    Path(trade_hash): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let hash = TradeHash::parse(&trade_hash)?;
    let status = state.service.verified(&hash).await?;
    Ok(Json(serde_json::to_value(status).unwrap_or_default()))
}

#[derive(Deserialize, Default)]
struct PageQuery {
    // raw strings: invalid values fall back to defaults silently
    limit: Option<String>,
    offset: Option<String>,
}

impl PageQuery {
    fn normalize(&self) -> (usize, usize) {
        let limit = self
            .limit
            .as_deref()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = self
            .offset
            .as_deref()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        (limit, offset)
    }
}

fn history_body(page: HistoryPage) -> Value {
    let has_more = page.offset + page.trades.len() < page.total;
    json!({
        "trades": page.trades,
        "pagination": {
            "total": page.total,
            "limit": page.limit,
            "offset": page.offset,
            "hasMore": has_more,
        }
    })
}

async fn user_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let (limit, offset) = query.normalize();
    let page = state.service.history(&user_id, limit, offset)?;
    Ok(Json(history_body(page)))
}

async fn wallet_history(
    State(state): State<AppState>,
    Path(wallet_address): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let (limit, offset) = query.normalize();
    let page = state.service.wallet_history(&wallet_address, limit, offset)?;
    Ok(Json(history_body(page)))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let merged = state.service.stats().await?;
    // a degraded ledger sub-field renders as {"error": ...}
    Ok(Json(serde_json::to_value(merged).unwrap_or_default()))
}

async fn trade_by_id(
    State(state): State<AppState>,
    Path(trade_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.service.find_by_id(&trade_id)?;
    Ok(Json(serde_json::to_value(record).unwrap_or_default()))
}
