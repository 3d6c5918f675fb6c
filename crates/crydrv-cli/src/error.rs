//! Error types and their HTTP responses

use crate::auth::{removal_cookie, AuthError};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use crydrv_crypto::encoding::is_encoding_char;
use crydrv_store::StoreError;
use thiserror::Error;

/// Length of the placeholder replacing key-like strings in error messages.
/// A 32-byte value encodes to 43 characters; 41 still catches it with a
/// two-character prefix or suffix cut off.
const SCRUB_WINDOW: usize = 41;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid path")]
    InvalidPath,

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("requested range not satisfiable")]
    RangeNotSatisfiable { total_size: u64 },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

impl ApiError {
    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => e.status_code(),
            Self::InvalidPath | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Store(e) => match e {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::Integrity
                | StoreError::SourceTooShort { .. }
                | StoreError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
                StoreError::Crypto(_) | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = scrub_secrets(&self.to_string());

        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), error = %message, "Request failed");
        } else {
            tracing::debug!(status = %status.as_u16(), error = %message, "Request rejected");
        }

        let mut response = (status, message).into_response();
        let headers = response.headers_mut();

        match &self {
            ApiError::Auth(auth) => {
                if let Ok(value) = HeaderValue::from_str(&removal_cookie().to_string()) {
                    headers.append(header::SET_COOKIE, value);
                }
                if matches!(auth, AuthError::Unauthorized) {
                    headers.insert(
                        header::WWW_AUTHENTICATE,
                        HeaderValue::from_static(r#"Basic realm="restricted", charset="UTF-8""#),
                    );
                }
            }
            ApiError::RangeNotSatisfiable { total_size } => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{total_size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
            }
            _ => {}
        }

        response
    }
}

/// Mask anything in `message` that could be an encoded key, token or name.
///
/// Every run of base64url characters is cut into 41-character windows from
/// its start; each full window becomes 41 `X`s and a shorter tail is kept.
pub fn scrub_secrets(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String| {
        let chars: Vec<char> = run.chars().collect();
        for window in chars.chunks(SCRUB_WINDOW) {
            if window.len() == SCRUB_WINDOW {
                out.extend(std::iter::repeat('X').take(SCRUB_WINDOW));
            } else {
                out.extend(window);
            }
        }
        run.clear();
    };

    for c in message.chars() {
        if is_encoding_char(c) {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}
