//! TTN client error types
//!
//! Error definitions with transient/permanent classification and remote
//! error detail extraction (status, body excerpt, correlation id, error
//! namespace/name) for the provisioning failure taxonomy.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Maximum number of body characters retained in a stored error snapshot.
const BODY_EXCERPT_LIMIT: usize = 512;

/// Structured detail extracted from a TTN error response.
///
/// TTN error bodies carry a gRPC-style payload:
/// `{"code": 7, "message": "...", "details": [{"namespace": "...",
/// "name": "...", "correlation_id": "...", "attributes": {...}}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteErrorDetail {
    /// HTTP status of the failed call.
    pub status: u16,
    /// Response body, truncated for storage.
    pub body_excerpt: String,
    /// Correlation id for cross-referencing TTN support tickets.
    pub correlation_id: Option<String>,
    /// Error namespace, e.g. `pkg/identityserver`.
    pub namespace: Option<String>,
    /// Error name, e.g. `no_application_rights`.
    pub name: Option<String>,
    /// Attributes attached to the error detail (entity ids, etc.).
    pub attributes: BTreeMap<String, String>,
}

impl RemoteErrorDetail {
    /// Parse a TTN error body. Tolerates non-JSON bodies.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let mut detail = Self {
            status,
            body_excerpt: truncate(body, BODY_EXCERPT_LIMIT),
            ..Self::default()
        };

        let Ok(json) = serde_json::from_str::<Value>(body) else {
            return detail;
        };

        if let Some(entries) = json.get("details").and_then(Value::as_array) {
            if let Some(first) = entries.first() {
                detail.namespace = str_field(first, "namespace");
                detail.name = str_field(first, "name");
                detail.correlation_id = str_field(first, "correlation_id");
                if let Some(attrs) = first.get("attributes").and_then(Value::as_object) {
                    for (key, value) in attrs {
                        if let Some(s) = value.as_str() {
                            detail.attributes.insert(key.clone(), s.to_string());
                        }
                    }
                }
            }
        }

        detail
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        let mut end = limit;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

/// Error that can occur while calling TTN.
#[derive(Debug, Error)]
pub enum TtnError {
    /// Failed to reach the cluster (DNS, connect, TLS, timeout).
    #[error("network error calling {resource}: {message}")]
    Transport {
        resource: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// 401: credential invalid or expired.
    #[error("authentication failed for {resource}")]
    Unauthenticated {
        resource: String,
        detail: RemoteErrorDetail,
    },

    /// 403: the credential has no rights on the target resource.
    #[error("no rights on {resource}")]
    Forbidden {
        resource: String,
        detail: RemoteErrorDetail,
    },

    /// 404: the target resource does not exist (or is invisible to us).
    #[error("{resource} not found")]
    NotFound {
        resource: String,
        detail: RemoteErrorDetail,
    },

    /// 409: the target identifier is already taken.
    #[error("{resource} already exists")]
    Conflict {
        resource: String,
        detail: RemoteErrorDetail,
    },

    /// Any other remote failure (5xx, 429, unexpected 4xx).
    #[error("remote error {status} for {resource}", status = detail.status)]
    Remote {
        resource: String,
        detail: RemoteErrorDetail,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("failed to decode {resource} response: {message}")]
    Decode { resource: String, message: String },
}

impl TtnError {
    /// Build the appropriate variant from a non-success response.
    #[must_use]
    pub fn from_response(resource: &str, status: u16, body: &str) -> Self {
        let resource = resource.to_string();
        let detail = RemoteErrorDetail::from_response(status, body);
        match status {
            401 => Self::Unauthenticated { resource, detail },
            403 => Self::Forbidden { resource, detail },
            404 => Self::NotFound { resource, detail },
            409 => Self::Conflict { resource, detail },
            _ => Self::Remote { resource, detail },
        }
    }

    /// Whether retrying the same call later can reasonably succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Remote { detail, .. } => detail.status >= 500 || detail.status == 429,
            _ => false,
        }
    }

    /// HTTP status of the remote failure, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.detail().map(|d| d.status)
    }

    /// Remote resource the call targeted, e.g. `application fg-a`.
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Transport { resource, .. }
            | Self::Unauthenticated { resource, .. }
            | Self::Forbidden { resource, .. }
            | Self::NotFound { resource, .. }
            | Self::Conflict { resource, .. }
            | Self::Remote { resource, .. }
            | Self::Decode { resource, .. } => resource,
        }
    }

    /// Remote detail, when the failure came from an HTTP response.
    #[must_use]
    pub fn detail(&self) -> Option<&RemoteErrorDetail> {
        match self {
            Self::Unauthenticated { detail, .. }
            | Self::Forbidden { detail, .. }
            | Self::NotFound { detail, .. }
            | Self::Conflict { detail, .. }
            | Self::Remote { detail, .. } => Some(detail),
            Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    /// Correlation id from the remote error, if present.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.detail().and_then(|d| d.correlation_id.as_deref())
    }
}

/// Result type for TTN operations.
pub type TtnResult<T> = Result<T, TtnError>;
