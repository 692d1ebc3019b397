//! Bearer-token guard for the admin routes.

use crate::error::{AppError, AppErrorKind, DomainError};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::utils::secure_eq;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Operator key the admin routes are checked against.
///
/// With no token configured every admin request is refused.
#[derive(Clone, Default)]
pub struct AdminGuard {
    token: Option<Arc<str>>,
}

impl AdminGuard {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.map(Arc::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    pub fn authorize(&self, header: Option<&str>) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return false;
        };
        match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(presented) => secure_eq(presented.trim().as_bytes(), expected.as_bytes()),
            None => false,
        }
    }
}

pub async fn require_admin_token(
    State(guard): State<AdminGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !guard.authorize(header) {
        let mut error = AppError::new(AppErrorKind::Domain(DomainError::Unauthorized));
        if let Some(request_id) = get_request_id_from_headers(request.headers()) {
            error = error.with_request_id(request_id);
        }
        return Err(error);
    }

    Ok(next.run(request).await)
}
