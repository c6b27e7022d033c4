//! HTTP request handlers. Thin callers into [`Market`](crate::Market).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use market_types::{Decimal, InstanceId, ListingId, ListingStatus, OfferId, TradeId};
use serde::Deserialize;
use tracing::info;

use crate::metrics::METRICS;
use crate::middleware::{CurrentUser, RequestId};
use crate::models::{Account, Listing, Offer, Page, Paged, Trade};
use crate::response::{ApiResponse, HealthResponse};
use crate::state::AppState;
use crate::MarketError;

type ApiResult<T> = Result<Json<ApiResponse<T>>, MarketError>;

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub status: Option<ListingStatus>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub instance_id: InstanceId,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub instance_id: InstanceId,
    pub price: Decimal,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        lock_backend: state.market.lock_backend(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        requests: state.request_count.load(Ordering::Relaxed),
        pending_trades: state.market.pending_trade_count(),
    })
}

/// Prometheus metrics in text exposition format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = METRICS.render(
        state.start_time.elapsed().as_secs(),
        state.market.pending_trade_count(),
    );
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        body,
    )
}

pub async fn list_listings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<Paged<Listing>> {
    let page = Page::new(query.page.unwrap_or(1), query.page_size.unwrap_or(20));
    let status = query.status.or(Some(ListingStatus::Active));
    Ok(ApiResponse::ok(state.market.listings(status, page)))
}

pub async fn create_listing(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, MarketError> {
    let listing = state
        .market
        .create_listing(user_id, request.instance_id, request.price)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(listing)))
}

pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<ListingId>,
) -> ApiResult<Listing> {
    Ok(ApiResponse::ok(state.market.listing(listing_id)?))
}

pub async fn cancel_listing(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(listing_id): Path<ListingId>,
) -> ApiResult<Listing> {
    Ok(ApiResponse::ok(state.market.cancel_listing(listing_id, user_id)?))
}

pub async fn purchase(
    State(state): State<Arc<AppState>>,
    CurrentUser(buyer_id): CurrentUser,
    Path(listing_id): Path<ListingId>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> ApiResult<Trade> {
    info!(listing_id, buyer_id, request_id = %request_id, "Purchase requested");
    let trade = state.market.execute_trade(listing_id, buyer_id).await?;
    Ok(ApiResponse::ok(trade))
}

pub async fn create_offer(
    State(state): State<Arc<AppState>>,
    CurrentUser(buyer_id): CurrentUser,
    Json(request): Json<CreateOfferRequest>,
) -> Result<impl IntoResponse, MarketError> {
    let offer = state
        .market
        .create_offer(buyer_id, request.instance_id, request.price)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(offer)))
}

pub async fn accept_offer(
    State(state): State<Arc<AppState>>,
    CurrentUser(seller_id): CurrentUser,
    Path(offer_id): Path<OfferId>,
) -> ApiResult<Trade> {
    Ok(ApiResponse::ok(
        state.market.accept_offer(offer_id, seller_id).await?,
    ))
}

pub async fn reject_offer(
    State(state): State<Arc<AppState>>,
    CurrentUser(seller_id): CurrentUser,
    Path(offer_id): Path<OfferId>,
) -> ApiResult<Offer> {
    Ok(ApiResponse::ok(state.market.reject_offer(offer_id, seller_id)?))
}

pub async fn cancel_offer(
    State(state): State<Arc<AppState>>,
    CurrentUser(buyer_id): CurrentUser,
    Path(offer_id): Path<OfferId>,
) -> ApiResult<Offer> {
    Ok(ApiResponse::ok(state.market.cancel_offer(offer_id, buyer_id)?))
}

pub async fn get_trade(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(trade_id): Path<TradeId>,
) -> ApiResult<Trade> {
    Ok(ApiResponse::ok(state.market.trade(trade_id, user_id)?))
}

pub async fn my_account(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Account> {
    Ok(ApiResponse::ok(state.market.account(user_id)?))
}
