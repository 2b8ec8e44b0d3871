//! Audio proxy: resolve a video id with yt-dlp, then pipe the media host's
//! response back to the client, keeping range semantics intact so players
//! can seek.

use std::fmt;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use futures_util::TryStreamExt;
use serde::Deserialize;

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::ytm::ResolvedAudio;
use crate::ytm::resolve::is_valid_video_id;

const DEFAULT_AUDIO_MIME: &str = "audio/mp4";

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    id: Option<String>,
}

pub async fn stream_by_query(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    stream_audio(&state, params.id.as_deref(), &headers).await
}

pub async fn stream_by_path(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    stream_audio(&state, Some(&id), &headers).await
}

async fn stream_audio(state: &AppState, id: Option<&str>, headers: &HeaderMap) -> ApiResult<Response> {
    let id = id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing ID"))?;
    if !is_valid_video_id(id) {
        return Err(ApiError::bad_request("Invalid ID"));
    }

    // Malformed or multi-part ranges are dropped; the client gets the whole file.
    let range = headers.get(header::RANGE).and_then(parse_range_header);
    tracing::info!(video_id = id, range = ?range, "streaming");

    let mut resolved = state.resolver.resolve(id).await?;
    tracing::debug!(video_id = id, filesize = ?resolved.filesize, "resolved");
    let mut upstream = fetch_upstream(&state.http, &resolved, range).await?;

    if upstream.status() == StatusCode::FORBIDDEN {
        // The URL was issued but the media host refused it; try the next strategy once.
        tracing::warn!(video_id = id, strategy = resolved.strategy, "media host returned 403, rotating");
        resolved = state
            .resolver
            .resolve_from(id, resolved.strategy + 1)
            .await
            .map_err(|e| {
                tracing::warn!(video_id = id, error = %e, "rotation failed");
                ApiError::forbidden("Audio blocked by upstream")
            })?;
        upstream = fetch_upstream(&state.http, &resolved, range).await?;
    }

    proxy_response(upstream, resolved.mime_type.as_deref())
}

async fn fetch_upstream(
    http: &reqwest::Client,
    resolved: &ResolvedAudio,
    range: Option<ByteRange>,
) -> ApiResult<reqwest::Response> {
    let mut rb = http.get(&resolved.url);
    for (name, value) in &resolved.http_headers {
        rb = rb.header(name.as_str(), value.as_str());
    }
    if let Some(range) = range {
        rb = rb.header(header::RANGE, range.to_string());
    }

    rb.send().await.map_err(|e| {
        tracing::error!(error = %e, "upstream request failed");
        ApiError::bad_gateway("Stream Failed")
    })
}

fn proxy_response(upstream: reqwest::Response, mime: Option<&str>) -> ApiResult<Response> {
    let status = upstream.status();
    match status.as_u16() {
        // 200, 206 and 416 carry range semantics the player needs to see.
        200 | 206 | 416 => {}
        403 => return Err(ApiError::forbidden("Audio blocked by upstream")),
        404 | 410 => return Err(ApiError::not_found("Audio not found")),
        _ => {
            tracing::warn!(%status, "unexpected upstream status");
            return Err(ApiError::bad_gateway(format!("Upstream returned {status}")));
        }
    }

    let upstream_headers = upstream.headers();
    let content_type = upstream_headers
        .get(header::CONTENT_TYPE)
        .filter(|v| v.as_bytes() != b"application/octet-stream")
        .cloned()
        .or_else(|| mime.and_then(|m| HeaderValue::from_str(m).ok()))
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_AUDIO_MIME));

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    for name in [header::CONTENT_LENGTH, header::CONTENT_RANGE] {
        if let Some(value) = upstream_headers.get(&name) {
            headers.insert(name, value.clone());
        }
    }

    let stream = upstream
        .bytes_stream()
        .inspect_err(|e| tracing::warn!(error = %e, "upstream stream interrupted"));
    *response.body_mut() = Body::from_stream(stream);
    Ok(response)
}

/// A single byte range as sent by audio elements when seeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-` or `bytes=start-end` (inclusive).
    From { start: u64, end: Option<u64> },
    /// `bytes=-n`: the last n bytes.
    Suffix(u64),
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::From { start, end: Some(end) } => write!(f, "bytes={start}-{end}"),
            Self::From { start, end: None } => write!(f, "bytes={start}-"),
            Self::Suffix(n) => write!(f, "bytes=-{n}"),
        }
    }
}

pub fn parse_range_header(value: &HeaderValue) -> Option<ByteRange> {
    let value = value.to_str().ok()?.trim();
    let (unit, range) = value.split_once('=')?;
    if unit.trim() != "bytes" {
        return None;
    }
    let range = range.trim();
    if range.is_empty() || range.contains(',') {
        return None;
    }
    let (start_str, end_str) = range.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        // Suffix range: "-N" means last N bytes.
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        return Some(ByteRange::Suffix(suffix_len));
    }

    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        None
    } else {
        let end: u64 = end_str.parse().ok()?;
        if end < start {
            return None;
        }
        Some(end)
    };
    Some(ByteRange::From { start, end })
}
