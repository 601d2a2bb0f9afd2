//! Webhook signature extractor.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::HeaderMap,
};

use crate::error::AppError;
use crate::shopify::webhook::{HMAC_HEADER, SHOP_DOMAIN_HEADER, TOPIC_HEADER, verify_body};
use crate::state::AppState;

/// A webhook whose body verified against the app secret.
///
/// Rejects with `401` when the signature header is missing or wrong, so the
/// handler only ever sees authentic payloads.
#[derive(Debug)]
pub struct SignedWebhook {
    /// `X-Shopify-Shop-Domain`, when sent.
    pub shop: Option<String>,
    /// `X-Shopify-Topic`, when sent.
    pub topic: Option<String>,
    pub body: Bytes,
}

impl FromRequest<AppState> for SignedWebhook {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let headers = req.headers().clone();
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("unreadable webhook body: {e}")))?;

        let signature = header(&headers, HMAC_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing webhook signature".to_string()))?;
        if !verify_body(&body, &signature, state.api_secret()) {
            return Err(AppError::Unauthorized(
                "webhook signature mismatch".to_string(),
            ));
        }

        Ok(Self {
            shop: header(&headers, SHOP_DOMAIN_HEADER),
            topic: header(&headers, TOPIC_HEADER),
            body,
        })
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
