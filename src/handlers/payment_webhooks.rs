use axum::{extract::State, http::HeaderMap, http::StatusCode, response::Json};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::warn;

use crate::{
    errors::ServiceError, services::payment_webhooks::GatewayEnvelope, ApiResponse, AppState,
};

type HmacSha256 = Hmac<Sha256>;

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted (applied, duplicate, or recorded no-op)"),
        (status = 400, description = "Unparseable payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), ServiceError> {
    let Some(secret) = state.config.payment_webhook_secret.as_deref() else {
        warn!("payment webhook received but no signing secret is configured");
        return Err(ServiceError::Unauthorized(
            "webhook signing not configured".to_string(),
        ));
    };
    if !verify_signature(
        &headers,
        &body,
        secret,
        state.config.payment_webhook_tolerance_secs,
    ) {
        warn!("payment webhook signature verification failed");
        return Err(ServiceError::Unauthorized(
            "invalid webhook signature".to_string(),
        ));
    }

    let raw = std::str::from_utf8(&body)
        .map_err(|_| ServiceError::BadRequest("webhook body is not valid UTF-8".to_string()))?;
    let envelope: GatewayEnvelope = serde_json::from_str(raw)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {e}")))?;

    let outcome = state.services.payment_webhooks.process(envelope, raw).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(json!({ "outcome": outcome.to_string() }))),
    ))
}

/// Generic HMAC scheme: `x-signature` is hex HMAC-SHA256 of
/// `"<x-timestamp>.<raw body>"`, with the timestamp bounded to the
/// configured clock-skew tolerance.
fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };
    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return false;
    }

    let Ok(body) = std::str::from_utf8(payload) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}.{}", ts, body).as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Test-side signer matching [`verify_signature`].
pub fn sign_payload(secret: &str, timestamp: i64, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(format!("{}.{}", timestamp, body).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signed_headers(secret: &str, ts: i64, body: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_str(&ts.to_string()).unwrap());
        headers.insert(
            "x-signature",
            HeaderValue::from_str(&sign_payload(secret, ts, body)).unwrap(),
        );
        headers
    }

    #[test]
    fn valid_signature_verifies() {
        let body = r#"{"id":"evt_1"}"#;
        let ts = chrono::Utc::now().timestamp();
        let headers = signed_headers("shhh", ts, body);
        assert!(verify_signature(&headers, &Bytes::from(body), "shhh", 300));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = r#"{"id":"evt_1"}"#;
        let ts = chrono::Utc::now().timestamp();
        let headers = signed_headers("shhh", ts, body);
        assert!(!verify_signature(&headers, &Bytes::from(body), "other", 300));
    }

    #[test]
    fn stale_timestamp_fails() {
        let body = "{}";
        let ts = chrono::Utc::now().timestamp() - 3600;
        let headers = signed_headers("shhh", ts, body);
        assert!(!verify_signature(&headers, &Bytes::from(body), "shhh", 300));
    }

    #[test]
    fn missing_headers_fail() {
        assert!(!verify_signature(
            &HeaderMap::new(),
            &Bytes::from("{}"),
            "shhh",
            300
        ));
    }

    #[test]
    fn tampered_body_fails() {
        let ts = chrono::Utc::now().timestamp();
        let headers = signed_headers("shhh", ts, r#"{"id":"evt_1"}"#);
        assert!(!verify_signature(
            &headers,
            &Bytes::from(r#"{"id":"evt_2"}"#),
            "shhh",
            300
        ));
    }
}
