use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use common::storage::{BlobId, FileEntry};

use crate::http_server::Config;
use crate::ServiceState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Complete,
    Downloading,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: BlobId,
    pub name: String,
    pub size: u64,
    /// percentage of chunks held locally
    pub progress: u8,
    pub status: DownloadStatus,
    pub stream_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    Healthy,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHealth {
    pub index: usize,
    pub status: ChunkStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHealth {
    pub file_id: BlobId,
    pub status: FileStatus,
    pub total_chunks: usize,
    pub healthy_chunks: usize,
    pub chunks: Vec<ChunkHealth>,
}

impl FileHealth {
    fn of(file_id: BlobId, entry: &FileEntry, held: impl Fn(&BlobId) -> bool) -> Self {
        let chunks: Vec<ChunkHealth> = entry
            .chunks
            .iter()
            .enumerate()
            .map(|(index, meta)| ChunkHealth {
                index,
                status: if held(&meta.blob_id) {
                    ChunkStatus::Healthy
                } else {
                    ChunkStatus::Missing
                },
            })
            .collect();
        let healthy_chunks = chunks
            .iter()
            .filter(|chunk| chunk.status == ChunkStatus::Healthy)
            .count();
        let status = if healthy_chunks == chunks.len() {
            FileStatus::Healthy
        } else if healthy_chunks > 0 {
            FileStatus::Degraded
        } else {
            FileStatus::Critical
        };

        Self {
            file_id,
            status,
            total_chunks: chunks.len(),
            healthy_chunks,
            chunks,
        }
    }
}

fn not_found(msg: &str) -> Response {
    let err = serde_json::json!({ "error": msg });
    (StatusCode::NOT_FOUND, Json(err)).into_response()
}

fn lookup(state: &ServiceState, file_id: &str) -> Result<(BlobId, FileEntry), Response> {
    let id: BlobId = file_id.parse().map_err(|_| {
        let err = serde_json::json!({ "error": "invalid file id" });
        (StatusCode::BAD_REQUEST, Json(err)).into_response()
    })?;
    let entry = state
        .peer()
        .file(&id)
        .ok_or_else(|| not_found("File not found"))?;
    Ok((id, entry))
}

#[tracing::instrument(skip(state, config))]
pub async fn list_handler(
    State(state): State<ServiceState>,
    Extension(config): Extension<Config>,
) -> Response {
    let peer = state.peer();
    let mut files: Vec<FileSummary> = peer
        .files()
        .into_iter()
        .filter_map(|entry| {
            let id = entry.id()?;
            let total = entry.chunks.len();
            let held = entry
                .chunks
                .iter()
                .filter(|meta| peer.is_held(&meta.blob_id))
                .count();
            Some(FileSummary {
                id,
                progress: ((held * 100) / total.max(1)) as u8,
                status: if held == total {
                    DownloadStatus::Complete
                } else {
                    DownloadStatus::Downloading
                },
                stream_url: config.stream_url(&id.to_hex()).ok().map(String::from),
                name: entry.name,
                size: entry.size,
            })
        })
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));

    (StatusCode::OK, Json(files)).into_response()
}

/// Per-chunk local presence of a file
#[tracing::instrument(skip(state))]
pub async fn health_handler(
    State(state): State<ServiceState>,
    Path(file_id): Path<String>,
) -> Response {
    let (id, entry) = match lookup(&state, &file_id) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let health = FileHealth::of(id, &entry, |blob_id| state.peer().is_held(blob_id));
    (StatusCode::OK, Json(health)).into_response()
}

/// Queue a background download so this node seeds the whole file
#[tracing::instrument(skip(state))]
pub async fn fetch_handler(
    State(state): State<ServiceState>,
    Path(file_id): Path<String>,
) -> Response {
    let (id, entry) = match lookup(&state, &file_id) {
        Ok(found) => found,
        Err(response) => return response,
    };
    match state.peer().jobs().dispatch_fetch(entry) {
        Ok(()) => {
            let msg = serde_json::json!({ "fileId": id, "status": "queued" });
            (StatusCode::ACCEPTED, Json(msg)).into_response()
        }
        Err(e) => {
            tracing::error!("failed to queue fetch of {}: {}", id, e);
            let err = serde_json::json!({ "error": "job queue unavailable" });
            (StatusCode::SERVICE_UNAVAILABLE, Json(err)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::{ingest, IngestOptions};

    fn entry(chunks: usize) -> FileEntry {
        let options = IngestOptions {
            chunk_size: 16,
            pad: false,
        };
        ingest(&vec![7u8; 16 * chunks], "clip.mp4", &options)
            .unwrap()
            .entry
    }

    #[test]
    fn test_health_levels() {
        let file = entry(3);
        let id = file.id().unwrap();
        let first = file.chunks[0].blob_id;

        let all = FileHealth::of(id, &file, |_| true);
        assert_eq!(all.status, FileStatus::Healthy);
        assert_eq!(all.healthy_chunks, 3);

        let some = FileHealth::of(id, &file, |blob_id| *blob_id == first);
        assert_eq!(some.status, FileStatus::Degraded);
        assert_eq!(some.chunks[0].status, ChunkStatus::Healthy);
        assert_eq!(some.chunks[1].status, ChunkStatus::Missing);

        let none = FileHealth::of(id, &file, |_| false);
        assert_eq!(none.status, FileStatus::Critical);
        assert_eq!(none.total_chunks, 3);
    }

    #[test]
    fn test_health_json_shape() {
        let file = entry(1);
        let health = FileHealth::of(file.id().unwrap(), &file, |_| true);
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "Healthy");
        assert_eq!(json["totalChunks"], 1);
        assert_eq!(json["chunks"][0]["status"], "Healthy");
    }
}
