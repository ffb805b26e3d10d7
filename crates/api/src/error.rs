//! API error types with HTTP response mapping.

use auth::AuthError;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorClass;
use inventory::InventoryError;
use sales::SaleError;
use serde::Serialize;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed body or path.
    BadRequest(String),
    NotFound(String),
    /// Missing or unusable bearer token.
    Unauthorized(String),
    /// Valid token, but the role may not use the endpoint.
    Forbidden(String),
    Sale(SaleError),
    Inventory(InventoryError),
    Auth(AuthError),
    Store(StoreError),
}

/// Body of every failed response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
    pub detail: Option<String>,
}

const INTERNAL_MESSAGE: &str = "internal server error";

impl ApiError {
    fn parts(&self) -> (StatusCode, ErrorBody) {
        let (status, code, detail) = match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", None),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", None),
            ApiError::Sale(e) => (sale_status(e), e.code(), sale_detail(e)),
            ApiError::Inventory(e) => (inventory_status(e), e.code(), inventory_detail(e)),
            ApiError::Auth(e) if e.is_unauthorized() => (StatusCode::UNAUTHORIZED, e.code(), None),
            ApiError::Auth(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.code(), None),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", None),
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.message()
        };
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            None
        } else {
            detail
        };

        (
            status,
            ErrorBody {
                status: status.as_u16(),
                code,
                message,
                detail,
            },
        )
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg) => msg.clone(),
            ApiError::Sale(e) => e.to_string(),
            ApiError::Inventory(e) => e.to_string(),
            ApiError::Auth(e) => e.to_string(),
            ApiError::Store(e) => e.to_string(),
        }
    }
}

fn sale_status(err: &SaleError) -> StatusCode {
    match err {
        SaleError::ProductNotFound(_) | SaleError::SaleNotFound(_) => StatusCode::NOT_FOUND,
        SaleError::InsufficientStock { .. } | SaleError::ConcurrentStockConflict { .. } => {
            StatusCode::CONFLICT
        }
        SaleError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        SaleError::Inventory(e) => inventory_status(e),
        other => class_status(other.class()),
    }
}

fn inventory_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::ProductNotFound(_) | InventoryError::MovementNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        InventoryError::InsufficientStock { .. } => StatusCode::CONFLICT,
        other => class_status(other.class()),
    }
}

fn class_status(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::BusinessRule => StatusCode::CONFLICT,
        ErrorClass::System => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn sale_detail(err: &SaleError) -> Option<String> {
    match err {
        SaleError::InvalidLine { index, .. } => Some(format!("line {index}")),
        SaleError::InsufficientStock {
            product_id,
            available,
            ..
        } => Some(stock_detail(product_id.as_i64(), *available)),
        SaleError::ConcurrentStockConflict { attempts } => Some(format!("attempts {attempts}")),
        _ => None,
    }
}

fn inventory_detail(err: &InventoryError) -> Option<String> {
    match err {
        InventoryError::InsufficientStock {
            product_id,
            available,
            ..
        } => Some(stock_detail(product_id.as_i64(), *available)),
        _ => None,
    }
}

fn stock_detail(product_id: i64, available: Option<i64>) -> String {
    match available {
        Some(stock) => format!("product {product_id} has {stock} in stock"),
        None => format!("product {product_id} does not track stock"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        metrics::counter!("api_errors_total", "code" => body.code).increment(1);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self, "internal server error");
        }
        (status, axum::Json(body)).into_response()
    }
}

impl From<SaleError> for ApiError {
    fn from(err: SaleError) -> Self {
        ApiError::Sale(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
