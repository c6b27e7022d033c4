//! Typed errors for the settlement core.
//!
//! Every variant carries a human-readable message suitable for rendering to
//! the end user. `Internal` marks a broken data-integrity invariant and is
//! always logged at error level where it is raised.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use market_types::{AssetId, InstanceId, ListingId, OfferId, TradeId, TypesError, UserId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    /// Requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Caller is not allowed to act on this entity.
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Caller does not own the instance.
    #[error("Not owner: {0}")]
    NotOwner(String),
    /// Request carried no usable identity.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    /// Wrong lifecycle state for the requested transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    /// Per-instance lock could not be obtained within the retry budget.
    #[error("Resource busy: {0}")]
    ResourceBusy(String),
    /// State changed between the pre-check and the locked re-validation.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Compare-and-set on an instance status saw a different stored status.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
    #[error("Self trade: {0}")]
    SelfTrade(String),
    #[error("Expired: {0}")]
    Expired(String),
    /// Coordination store unreachable.
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Config error: {0}")]
    Config(String),
    /// The database rejected a read or a commit.
    #[error("Storage error: {0}")]
    Storage(String),
    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    pub fn listing_not_found(id: ListingId) -> Self {
        Self::NotFound(format!("Listing #{id} not found"))
    }
    pub fn instance_not_found(id: InstanceId) -> Self {
        Self::NotFound(format!("Instance #{id} not found"))
    }
    pub fn asset_not_found(id: AssetId) -> Self {
        Self::NotFound(format!("Asset #{id} not found"))
    }
    pub fn trade_not_found(id: TradeId) -> Self {
        Self::NotFound(format!("Trade #{id} not found"))
    }
    pub fn offer_not_found(id: OfferId) -> Self {
        Self::NotFound(format!("Offer #{id} not found"))
    }
    pub fn account_not_found(user_id: UserId) -> Self {
        Self::NotFound(format!("No points account for user {user_id}"))
    }
    pub fn already_sold(listing_id: ListingId) -> Self {
        Self::Conflict(format!("Listing #{listing_id} was already sold"))
    }
    pub fn offer_expired(id: OfferId) -> Self {
        Self::Expired(format!("Offer #{id} has expired; the held points were released"))
    }

    /// Stable machine-readable code for API bodies and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::NotOwner(_) => "not_owner",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidPrice(_) => "invalid_price",
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientFunds(_) => "insufficient_funds",
            Self::ResourceBusy(_) => "resource_busy",
            Self::Conflict(_) => "conflict",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::SelfTrade(_) => "self_trade",
            Self::Expired(_) => "expired",
            Self::Lock(_) => "lock_unavailable",
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) | Self::NotOwner(_) => StatusCode::FORBIDDEN,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidPrice(_) | Self::InvalidInput(_) | Self::SelfTrade(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InsufficientFunds(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidState(_) | Self::Conflict(_) | Self::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            Self::Expired(_) => StatusCode::GONE,
            Self::ResourceBusy(_) | Self::Lock(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<TypesError> for MarketError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::InvalidPrice(msg) => Self::InvalidPrice(msg),
            TypesError::InvalidRate(msg) => Self::Config(msg),
            mismatch @ TypesError::SplitMismatch { .. } => {
                tracing::error!(error = %mismatch, "Fee split invariant violated");
                Self::Internal(mismatch.to_string())
            }
        }
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "code": self.code(),
            "error": self.to_string()
        });
        (self.status(), Json(body)).into_response()
    }
}
