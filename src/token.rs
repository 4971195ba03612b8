use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value as JsonValue;

use crate::error::Error;

/// The only signing algorithm declaration accepted by [`is_token_valid`].
pub const ACCEPTED_ALGORITHM: &str = "RS256";

/// Claims decoded from one segment of a compact JWT.
///
/// Decoding never verifies the signature. A default `DecodedToken` is an
/// empty object: every claim lookup on it returns `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    inner: JsonValue,
}

impl Default for DecodedToken {
    fn default() -> Self {
        Self {
            inner: JsonValue::Object(serde_json::Map::new()),
        }
    }
}

impl DecodedToken {
    /// Decodes the payload segment of a compact token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the token is not three dot-separated
    /// segments, the payload is not base64url, or it is not JSON.
    pub fn payload(raw: &str) -> Result<Self, Error> {
        decode_segment(raw, 1).map(|inner| Self { inner })
    }

    /// Decodes the header segment of a compact token.
    ///
    /// # Errors
    ///
    /// Same conditions as [`DecodedToken::payload`], applied to the header.
    pub fn header(raw: &str) -> Result<Self, Error> {
        decode_segment(raw, 0).map(|inner| Self { inner })
    }

    /// Gets a claim value by key.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    /// True when the decoded value carries no claims at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.as_object().is_none_or(serde_json::Map::is_empty)
    }
}

fn decode_segment(raw: &str, index: usize) -> Result<JsonValue, Error> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::Decode("invalid token format".into()));
    }
    let part = if index == 0 { "header" } else { "payload" };

    let bytes = URL_SAFE_NO_PAD
        .decode(parts[index].trim_end_matches('='))
        .map_err(|e| Error::Decode(format!("invalid base64 in {part}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Decode(format!("invalid json in {part}: {e}")))
}

/// Checks a token's issuer, audience, algorithm declaration and expiry.
///
/// `token` is either the raw compact token as a JSON string, or an object
/// holding it under `access_token`. A missing token is simply invalid.
///
/// # Errors
///
/// Returns [`Error::Decode`] when a token is present but cannot be decoded.
/// Callers holding values that may be garbage decide how to treat that.
pub fn is_token_valid(
    token: Option<&JsonValue>,
    expected_issuer: &str,
    expected_audience: Option<&str>,
) -> Result<bool, Error> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    is_token_valid_at(token, expected_issuer, expected_audience, now)
}

/// [`is_token_valid`] against an explicit clock (seconds since the epoch).
///
/// # Errors
///
/// See [`is_token_valid`].
pub fn is_token_valid_at(
    token: Option<&JsonValue>,
    expected_issuer: &str,
    expected_audience: Option<&str>,
    now: i64,
) -> Result<bool, Error> {
    let Some(raw) = unwrap_raw_token(token)? else {
        return Ok(false);
    };

    let header = DecodedToken::header(raw)?;
    let payload = DecodedToken::payload(raw)?;

    let audience_valid = match expected_audience {
        Some(expected) => audience_contains(payload.get_claim("aud"), expected),
        None => true,
    };
    let issuer_valid = payload.get_claim("iss").and_then(JsonValue::as_str) == Some(expected_issuer);
    let algorithm_valid =
        header.get_claim("alg").and_then(JsonValue::as_str) == Some(ACCEPTED_ALGORITHM);
    let not_expired = payload
        .get_claim("exp")
        .and_then(JsonValue::as_f64)
        .is_some_and(|exp| exp > now as f64);

    Ok(issuer_valid && algorithm_valid && not_expired && audience_valid)
}

fn unwrap_raw_token(token: Option<&JsonValue>) -> Result<Option<&str>, Error> {
    let token = match token {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::Object(map)) => match map.get("access_token") {
            None | Some(JsonValue::Null) => {
                return Err(Error::Decode("token object has no access_token".into()));
            }
            Some(inner) => inner,
        },
        Some(other) => other,
    };
    match token {
        JsonValue::String(raw) if raw.is_empty() => Ok(None),
        JsonValue::String(raw) => Ok(Some(raw)),
        _ => Err(Error::Decode("token is not a string".into())),
    }
}

fn audience_contains(aud: Option<&JsonValue>, expected: &str) -> bool {
    match aud {
        Some(JsonValue::Array(values)) => values.iter().any(|v| v.as_str() == Some(expected)),
        Some(JsonValue::String(single)) => single == expected,
        _ => false,
    }
}
