//! Request signing and response handling shared by the REST clients
//!
//! Two signature families are supported: HMAC-SHA256 over the URL-encoded
//! parameter string (Binance) and HMAC-SHA256 over method + path + expiry
//! (BitMEX). Transport faults are returned as typed errors without retry;
//! non-2xx responses carry the decoded error body.

use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::time::Duration;

use crate::error::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

/// Fixed per-call timeout; the only bound on in-flight REST calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Hex HMAC-SHA256 digest of `payload` keyed by `secret`
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Sign a flat parameter set the Binance way: URL-encode, append the
/// signature over the encoded string. The caller appends `timestamp` first.
pub fn sign_query(secret: &str, params: &[(String, String)]) -> ExchangeResult<String> {
    let query = serde_urlencoded::to_string(params)
        .map_err(|e| ExchangeError::Signing(e.to_string()))?;
    let signature = hmac_sha256_hex(secret, &query);
    Ok(format!("{query}&signature={signature}"))
}

/// Sign a request the BitMEX way: digest over `method + path + expires`
/// where `path` includes the query string if any.
pub fn sign_request_path(secret: &str, method: &str, path: &str, expires: i64) -> String {
    hmac_sha256_hex(secret, &format!("{method}{path}{expires}"))
}

/// Decode a response, mapping non-2xx statuses to `Rejection` with the
/// error body attached. Business-logic failures never panic or retry.
pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> ExchangeResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ExchangeError::Rejection {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}
