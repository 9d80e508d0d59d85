use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use http::{HeaderMap, StatusCode};

use common::storage::BlobId;

use crate::ServiceState;

/// An inclusive byte range within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("malformed range header: {0}")]
    Malformed(String),
    #[error("range not satisfiable for {size} bytes")]
    NotSatisfiable { size: u64 },
}

/// Parse a single `bytes=` range against a file of `size` bytes
///
/// Accepts `a-b`, `a-` and the suffix form `-n`. An end past the file is
/// clamped to the last byte.
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::Malformed(header.to_string());
    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(malformed)?;
    if spec.contains(',') {
        return Err(malformed());
    }
    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
    let (start, end) = (start.trim(), end.trim());

    if size == 0 {
        return Err(RangeError::NotSatisfiable { size });
    }
    let last = size - 1;

    let range = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Err(malformed()),
        (true, false) => {
            let suffix: u64 = end.parse().map_err(|_| malformed())?;
            if suffix == 0 {
                return Err(RangeError::NotSatisfiable { size });
            }
            ByteRange {
                start: size.saturating_sub(suffix),
                end: last,
            }
        }
        (false, _) => {
            let start: u64 = start.parse().map_err(|_| malformed())?;
            let end: u64 = if end.is_empty() {
                last
            } else {
                end.parse().map_err(|_| malformed())?
            };
            if end < start {
                return Err(malformed());
            }
            ByteRange {
                start,
                end: end.min(last),
            }
        }
    };

    if range.start > last {
        return Err(RangeError::NotSatisfiable { size });
    }
    Ok(range)
}

fn plain(status: StatusCode, msg: &'static str) -> Response {
    (status, [(CONTENT_TYPE, "text/plain")], msg).into_response()
}

/// Serve a known file, honoring a single `Range` header
#[tracing::instrument(skip(state, headers))]
pub async fn handler(
    State(state): State<ServiceState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Ok(id) = file_id.parse::<BlobId>() else {
        return plain(StatusCode::BAD_REQUEST, "invalid file id");
    };
    let Some(entry) = state.peer().file(&id) else {
        return plain(StatusCode::NOT_FOUND, "File not found");
    };

    let size = entry.size;
    let mime = mime_guess::from_path(&entry.name).first_or_octet_stream();

    let range = match headers.get(RANGE).map(|value| value.to_str()) {
        None => None,
        Some(Ok(value)) => match parse_range(value, size) {
            Ok(range) => Some(range),
            Err(RangeError::NotSatisfiable { size }) => {
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(CONTENT_RANGE, format!("bytes */{}", size))],
                )
                    .into_response();
            }
            Err(e) => {
                tracing::debug!("STREAM: {}", e);
                return plain(StatusCode::BAD_REQUEST, "malformed range header");
            }
        },
        Some(Err(_)) => return plain(StatusCode::BAD_REQUEST, "malformed range header"),
    };

    if size == 0 {
        return (
            StatusCode::OK,
            [
                (CONTENT_TYPE, mime.to_string()),
                (CONTENT_LENGTH, "0".to_string()),
            ],
        )
            .into_response();
    }

    let (status, span) = match range {
        Some(range) => (StatusCode::PARTIAL_CONTENT, range),
        None => (
            StatusCode::OK,
            ByteRange {
                start: 0,
                end: size - 1,
            },
        ),
    };

    let stream = match state.peer().open_stream(entry, span.start, span.end) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("STREAM: failed to open {}: {}", id, e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "failed to open stream");
        }
    };
    tracing::debug!(
        "STREAM: serving {} bytes {}-{}/{}",
        id,
        span.start,
        span.end,
        size
    );

    let mut response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, mime.as_ref())
        .header(CONTENT_LENGTH, span.len())
        .header(ACCEPT_RANGES, "bytes");
    if status == StatusCode::PARTIAL_CONTENT {
        response = response.header(
            CONTENT_RANGE,
            format!("bytes {}-{}/{}", span.start, span.end, size),
        );
    }

    match response.body(Body::from_stream(stream)) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("STREAM: failed to build response: {}", e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "failed to build response")
        }
    }
}
