//! Merchant authentication for the administrative routes

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::repository::MerchantDirectory;
use crate::error::{AppError, DomainError};
use crate::middleware::error::get_request_id_from_headers;

pub const MERCHANT_USERNAME_HEADER: &str = "X-Merchant-Username";
pub const MERCHANT_PASSWORD_HEADER: &str = "X-Merchant-Password";

/// Accept a non-empty bearer token as-is, otherwise require merchant
/// username/password headers that match the directory.
pub async fn merchant_auth_middleware(
    State(merchants): State<Arc<dyn MerchantDirectory>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let headers = request.headers();

    if bearer_token(headers).is_some() {
        debug!("bearer token accepted");
        return next.run(request).await;
    }

    let request_id = get_request_id_from_headers(headers);
    let reject = |merchant: String| {
        let mut err = AppError::domain(DomainError::InvalidCredentials { merchant });
        if let Some(id) = request_id.clone() {
            err = err.with_request_id(id);
        }
        err.into_response()
    };

    let username = header_value(headers, MERCHANT_USERNAME_HEADER);
    let password = header_value(headers, MERCHANT_PASSWORD_HEADER);
    let (username, password) = match (username, password) {
        (Some(u), Some(p)) => (u.to_string(), p.to_string()),
        _ => {
            warn!("request without merchant credentials");
            return reject("anonymous".to_string());
        }
    };

    match merchants
        .check_merchant_by_username(&username, &password)
        .await
    {
        Ok(Some(_)) => next.run(request).await,
        Ok(None) => {
            warn!(username = %username, "merchant credentials rejected");
            reject(username)
        }
        Err(e) => {
            let mut err = AppError::from(e);
            if let Some(id) = request_id {
                err = err.with_request_id(id);
            }
            err.into_response()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
