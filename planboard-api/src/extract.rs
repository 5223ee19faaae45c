/// Extractors that reject with [`ApiError`] instead of Axum's plain-text bodies
///
/// Handlers use these in place of `Json`, `Query` and `Path` so malformed
/// bodies, query strings and path ids produce the same JSON error shape as
/// every other failure.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

/// JSON body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Distinguishes an absent JSON field from an explicit `null`
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>` field: absent gives `None`, `null` gives `Some(None)`.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// Trims surrounding whitespace so length validation sees the stored value
pub fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// [`trimmed`] for optional fields; pair with `#[serde(default)]`
pub fn trimmed_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(raw.map(|value| value.trim().to_string()))
}
