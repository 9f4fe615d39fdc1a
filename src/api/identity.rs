use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use super::errors::ApiError;

// ============================================================================
// Request Identity
// ============================================================================
//
// Authentication happens upstream; the gateway forwards the caller as a
// header. Handlers take these extractors instead of reading headers.
//
// ============================================================================

pub const USER_HEADER: &str = "X-User-Id";
pub const ADMIN_HEADER: &str = "X-Admin-Id";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

fn header_uuid(req: &HttpRequest, name: &str) -> Result<Option<Uuid>, String> {
    let Some(value) = req.headers().get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| format!("{name} must be a UUID"))
}

fn required(req: &HttpRequest, name: &str) -> Result<Uuid, ApiError> {
    match header_uuid(req, name) {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(ApiError::Unauthorized(format!("Missing {name} header"))),
        Err(message) => Err(ApiError::Unauthorized(message)),
    }
}

/// Authenticated customer
#[derive(Debug, Clone, Copy)]
pub struct CustomerId(pub Uuid);

impl FromRequest for CustomerId {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(required(req, USER_HEADER).map(CustomerId))
    }
}

/// Authenticated admin
#[derive(Debug, Clone, Copy)]
pub struct AdminId(pub Uuid);

impl FromRequest for AdminId {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(required(req, ADMIN_HEADER).map(AdminId))
    }
}

/// Optional client idempotency key for money-moving requests
#[derive(Debug, Clone, Copy, Default)]
pub struct IdempotencyKey(pub Option<Uuid>);

impl FromRequest for IdempotencyKey {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            header_uuid(req, IDEMPOTENCY_HEADER)
                .map(IdempotencyKey)
                .map_err(ApiError::BadRequest),
        )
    }
}
