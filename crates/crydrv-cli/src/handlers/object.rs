//! File operation handlers
//!
//! Every URL path names one encrypted file of the authenticated user. Disk and
//! lock work runs on the blocking pool; GET bodies are streamed from there
//! through a bounded channel while the reader keeps its shared lock.

use crate::auth::{authorize, session_cookie, AuthorizedContext};
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::{multipart::MultipartError, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use crydrv_store::StoreError;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::SpooledTempFile;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Plaintext bytes per streamed body chunk
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the blocking reader and the response body
const STREAM_BUFFER: usize = 4;

/// Uploads larger than this spool to a temporary file
const SPOOL_MEMORY_LIMIT: usize = 32 * 1024 * 1024;

/// Multipart form field carrying the upload
const UPLOAD_FIELD: &str = "file";

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Catch-all handler: authenticate, then dispatch on the method
pub async fn handle_object(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let logical = logical_path(request.uri().path())?;
    let ctx = authorize(&state, request.headers()).await?;
    let storage = ctx.storage_path(&logical);

    let method = request.method().clone();
    let result = match method {
        Method::GET => get_object(&state, &ctx, &logical, storage, request.headers(), false).await,
        Method::HEAD => get_object(&state, &ctx, &logical, storage, request.headers(), true).await,
        Method::POST | Method::PUT => put_object(&state, &ctx, storage, request).await,
        Method::DELETE => delete_object(&state, storage).await,
        _ => Err(ApiError::MethodNotAllowed),
    };

    let mut response = result.unwrap_or_else(IntoResponse::into_response);
    if let Some(token) = &ctx.issued_token {
        let cookie = session_cookie(token, state.config.cookie_lifetime);
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    Ok(response)
}

/// Normalize a URL path into the logical file path.
///
/// The path is percent-decoded, `.` and `..` segments and duplicate slashes
/// are resolved against `/`, and a trailing slash names `index.html`.
pub fn logical_path(url_path: &str) -> Result<String, ApiError> {
    let decoded = urlencoding::decode(url_path).map_err(|_| ApiError::InvalidPath)?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = format!("/{}", segments.join("/"));
    if decoded.ends_with('/') {
        if !cleaned.ends_with('/') {
            cleaned.push('/');
        }
        cleaned.push_str("index.html");
    }
    Ok(cleaned)
}

/// What the blocking reader learned before streaming starts
struct BodyPlan {
    total_size: u64,
    range: Option<(u64, u64)>,
    modified: Option<SystemTime>,
}

impl BodyPlan {
    fn content_length(&self) -> u64 {
        match self.range {
            Some((start, end)) => end - start + 1,
            None => self.total_size,
        }
    }
}

/// GET/HEAD: decrypt and stream a file
async fn get_object(
    state: &Arc<AppState>,
    ctx: &AuthorizedContext,
    logical: &str,
    storage: PathBuf,
    headers: &HeaderMap,
    head_only: bool,
) -> Result<Response, ApiError> {
    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let if_modified_since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|t| t.with_timezone(&Utc));

    let (plan_tx, plan_rx) = oneshot::channel::<Result<BodyPlan, ApiError>>();
    let (body_tx, body_rx) = mpsc::channel::<io::Result<Bytes>>(STREAM_BUFFER);
    let store = state.store.clone();
    let key = ctx.key.clone();

    tokio::task::spawn_blocking(move || {
        let mut reader = match store.open_for_read(&storage, &key) {
            Ok(reader) => reader,
            Err(e) => {
                let _ = plan_tx.send(Err(e.into()));
                return;
            }
        };

        let total_size = reader.total_size();
        let range = match range_header.as_deref().map(|h| parse_range_header(h, total_size)) {
            None | Some(Ok(None)) => None,
            Some(Ok(Some(range))) => Some(range),
            Some(Err(())) => {
                let _ = plan_tx.send(Err(ApiError::RangeNotSatisfiable { total_size }));
                return;
            }
        };
        let plan = BodyPlan {
            total_size,
            range,
            modified: reader.modified(),
        };
        let (start, mut remaining) = (range.map_or(0, |(s, _)| s), plan.content_length());

        if plan_tx.send(Ok(plan)).is_err() || head_only {
            return;
        }
        if let Err(e) = reader.seek(SeekFrom::Start(start)) {
            let _ = body_tx.blocking_send(Err(e));
            return;
        }

        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let chunk = match reader.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Read failed mid-stream");
                    Err(e)
                }
            };
            let failed = chunk.is_err();
            if let Ok(bytes) = &chunk {
                remaining -= bytes.len() as u64;
            }
            // the receiver is gone once the client disconnects
            if body_tx.blocking_send(chunk).is_err() || failed {
                return;
            }
        }
    });

    let plan = plan_rx
        .await
        .map_err(|_| ApiError::Internal("reader task ended early".to_string()))??;

    let last_modified = plan.modified.map(DateTime::<Utc>::from);
    if let (Some(modified), Some(since)) = (last_modified, if_modified_since) {
        if modified.timestamp() <= since.timestamp() {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            insert_header(
                response.headers_mut(),
                header::LAST_MODIFIED,
                &modified.format(HTTP_DATE_FORMAT).to_string(),
            );
            return Ok(response);
        }
    }

    let content_type = mime_guess::from_path(logical).first_or_octet_stream();
    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(futures::stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    insert_header(headers, header::CONTENT_TYPE, content_type.essence_str());
    insert_header(headers, header::CONTENT_LENGTH, &plan.content_length().to_string());
    insert_header(headers, header::ACCEPT_RANGES, "bytes");
    if let Some(modified) = last_modified {
        insert_header(
            headers,
            header::LAST_MODIFIED,
            &modified.format(HTTP_DATE_FORMAT).to_string(),
        );
    }
    if let Some((start, end)) = plan.range {
        insert_header(
            headers,
            header::CONTENT_RANGE,
            &format!("bytes {}-{}/{}", start, end, plan.total_size),
        );
        *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    }

    debug!(
        size = plan.total_size,
        partial = plan.range.is_some(),
        head_only,
        "Serving file"
    );
    Ok(response)
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Parse a single Range header (e.g. "bytes=0-1023", "bytes=500-" or "bytes=-500").
///
/// Returns inclusive bounds, `Ok(None)` for a multi-range request (served in
/// full), and `Err` when the range cannot be satisfied.
fn parse_range_header(range: &str, total_size: u64) -> Result<Option<(u64, u64)>, ()> {
    let range = range.trim().strip_prefix("bytes=").ok_or(())?;
    if range.contains(',') {
        return Ok(None);
    }
    if total_size == 0 {
        return Err(());
    }

    let (start_str, end_str) = range.split_once('-').ok_or(())?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    if start_str.is_empty() {
        // Suffix range: bytes=-500 means last 500 bytes
        let suffix_len: u64 = end_str.parse().map_err(|_| ())?;
        if suffix_len == 0 {
            return Err(());
        }
        Ok(Some((total_size.saturating_sub(suffix_len), total_size - 1)))
    } else if end_str.is_empty() {
        // Range from start to end: bytes=500-
        let start: u64 = start_str.parse().map_err(|_| ())?;
        if start >= total_size {
            return Err(());
        }
        Ok(Some((start, total_size - 1)))
    } else {
        // Normal range: bytes=0-1023
        let start: u64 = start_str.parse().map_err(|_| ())?;
        let end: u64 = end_str.parse().map_err(|_| ())?;
        if start > end || start >= total_size {
            return Err(());
        }
        Ok(Some((start, end.min(total_size - 1))))
    }
}

/// Messages from the multipart reader to the blocking writer
enum Upload {
    Chunk(Bytes),
    /// The whole field arrived; anything else means abort
    Done,
}

/// POST/PUT: encrypt the `file` form field into the target
async fn put_object(
    state: &Arc<AppState>,
    ctx: &AuthorizedContext,
    storage: PathBuf,
    request: Request,
) -> Result<Response, ApiError> {
    let created = request.method() == Method::POST;
    let location = request.uri().path().to_string();

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;

    // other fields before the upload are skipped
    let mut field = loop {
        match multipart.next_field().await.map_err(multipart_error)? {
            Some(field) if field.name() == Some(UPLOAD_FIELD) => break field,
            Some(_) => continue,
            None => {
                return Err(ApiError::BadRequest(format!(
                    "missing form field '{UPLOAD_FIELD}'"
                )))
            }
        }
    };

    let (tx, mut rx) = mpsc::channel::<Upload>(STREAM_BUFFER);
    let store = state.store.clone();
    let key = ctx.key.clone();
    let writer = tokio::task::spawn_blocking(move || -> Result<Option<u64>, ApiError> {
        let mut spool = SpooledTempFile::new(SPOOL_MEMORY_LIMIT);
        let mut len = 0u64;
        loop {
            match rx.blocking_recv() {
                Some(Upload::Chunk(chunk)) => {
                    spool.write_all(&chunk).map_err(StoreError::Io)?;
                    len += chunk.len() as u64;
                }
                Some(Upload::Done) => break,
                // upload abandoned, leave the existing file alone
                None => return Ok(None),
            }
        }
        spool.seek(SeekFrom::Start(0)).map_err(StoreError::Io)?;
        store.write_all(&storage, &mut spool, len, &key)?;
        Ok(Some(len))
    });

    let fed = async {
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if tx.send(Upload::Chunk(chunk)).await.is_err() {
                return Ok(false);
            }
        }
        Ok::<_, ApiError>(tx.send(Upload::Done).await.is_ok())
    }
    .await;
    drop(tx);

    let written = writer
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    fed?;
    let len = written?.ok_or_else(|| ApiError::Internal("upload writer stopped".to_string()))?;
    debug!(len, created, "Stored file");

    if created {
        let mut response = StatusCode::CREATED.into_response();
        insert_header(response.headers_mut(), header::LOCATION, &location);
        Ok(response)
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// DELETE: remove a file
async fn delete_object(state: &Arc<AppState>, storage: PathBuf) -> Result<Response, ApiError> {
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.delete(&storage))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/", "/index.html")]
    #[case("/notes.txt", "/notes.txt")]
    #[case("//a///b.txt", "/a/b.txt")]
    #[case("/a/./b/../c.txt", "/a/c.txt")]
    #[case("/../../etc/passwd", "/etc/passwd")]
    #[case("/docs/", "/docs/index.html")]
    #[case("/docs/..", "/")]
    #[case("/docs/../", "/index.html")]
    #[case("/hello%20world.txt", "/hello world.txt")]
    fn test_logical_path(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(logical_path(input).unwrap(), expected);
    }

    #[test]
    fn test_logical_path_rejects_bad_utf8() {
        assert!(matches!(logical_path("/%ff%fe"), Err(ApiError::InvalidPath)));
    }

    #[rstest]
    #[case("bytes=0-9", Some((0, 9)))]
    #[case("bytes=5-", Some((5, 99)))]
    #[case("bytes=-10", Some((90, 99)))]
    #[case("bytes=-500", Some((0, 99)))]
    #[case("bytes=90-500", Some((90, 99)))]
    fn test_parse_range(#[case] header: &str, #[case] expected: Option<(u64, u64)>) {
        assert_eq!(parse_range_header(header, 100), Ok(expected));
    }

    #[rstest]
    #[case("bytes=100-")]
    #[case("bytes=10-5")]
    #[case("bytes=-0")]
    #[case("items=0-5")]
    #[case("bytes=abc")]
    fn test_parse_range_unsatisfiable(#[case] header: &str) {
        assert_eq!(parse_range_header(header, 100), Err(()));
    }

    #[test]
    fn test_parse_range_edge_cases() {
        assert_eq!(parse_range_header("bytes=0-1,5-6", 100), Ok(None));
        assert_eq!(parse_range_header("bytes=0-0", 0), Err(()));
        assert_eq!(parse_range_header("bytes=-5", 0), Err(()));
    }
}
