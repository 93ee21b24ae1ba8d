//! Chunked upload sessions and the fake media-processing pipeline.
//!
//! A session walks `initialized → uploading → processing → ready`. `paused`
//! is cosmetic: it can be set and cleared before processing starts but never
//! stops anything. Once the last chunk lands, a background task plays the
//! stage list for the session's media type on tokio time and finally stores a
//! [`ProcessedArtifact`].

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};
use crate::clock::Clock;
use crate::metrics::{UPLOADS_COMPLETED, UPLOADS_STARTED};

// simulated network delay per chunk, ms
const CHUNK_DELAY_MS: std::ops::Range<u64> = 50..150;
// upper bound on chunks per session, the chunk table is allocated up front
pub const MAX_CHUNKS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Initialized,
    Uploading,
    Paused,
    Processing,
    Ready,
}

impl UploadStatus {
    fn accepts_pause(self) -> bool {
        matches!(self, UploadStatus::Initialized | UploadStatus::Uploading | UploadStatus::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Video,
    Audio,
    Image,
    Document,
}

impl MediaType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "video" => Some(MediaType::Video),
            "audio" => Some(MediaType::Audio),
            "image" => Some(MediaType::Image),
            "document" => Some(MediaType::Document),
            _ => None,
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        match mime.split('/').next()? {
            "video" => Some(MediaType::Video),
            "audio" => Some(MediaType::Audio),
            "image" => Some(MediaType::Image),
            "application" if mime != "application/octet-stream" => Some(MediaType::Document),
            _ => None,
        }
    }

    fn default_mime(self) -> &'static str {
        match self {
            MediaType::Video => "video/mp4",
            MediaType::Audio => "audio/mpeg",
            MediaType::Image => "image/jpeg",
            MediaType::Document => "application/pdf",
        }
    }
}

pub fn mime_from_extension(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

pub struct Stage {
    pub name: &'static str,
    pub duration_ms: u64,
    pub message: &'static str,
}

const fn stage(name: &'static str, duration_ms: u64, message: &'static str) -> Stage {
    Stage { name, duration_ms, message }
}

const VIDEO_STAGES: [Stage; 9] = [
    stage("validating", 1000, "Validating video format..."),
    stage("extracting_metadata", 1500, "Extracting metadata (duration, resolution, codec)..."),
    stage("generating_thumbnail", 2000, "Generating thumbnails..."),
    stage("transcoding_360p", 3000, "Transcoding to 360p (H.264)..."),
    stage("transcoding_720p", 3500, "Transcoding to 720p (H.264)..."),
    stage("transcoding_1080p", 4000, "Transcoding to 1080p (H.264)..."),
    stage("hls_segmentation", 2500, "Creating HLS segments for streaming..."),
    stage("optimizing", 2000, "Optimizing for web delivery..."),
    stage("complete", 500, "Video processing complete!"),
];

const AUDIO_STAGES: [Stage; 8] = [
    stage("validating", 800, "Validating audio format..."),
    stage("extracting_metadata", 1000, "Extracting metadata (bitrate, sample rate)..."),
    stage("generating_waveform", 1500, "Generating waveform visualization..."),
    stage("transcoding_mp3", 2000, "Transcoding to MP3 (320kbps)..."),
    stage("transcoding_aac", 2000, "Transcoding to AAC (256kbps)..."),
    stage("normalizing", 1500, "Normalizing audio levels..."),
    stage("optimizing", 1000, "Optimizing for streaming..."),
    stage("complete", 500, "Audio processing complete!"),
];

const IMAGE_STAGES: [Stage; 9] = [
    stage("validating", 500, "Validating image format..."),
    stage("extracting_metadata", 800, "Extracting EXIF data..."),
    stage("generating_thumbnail", 1000, "Generating thumbnail (150x150)..."),
    stage("resizing_small", 1200, "Creating small version (480px)..."),
    stage("resizing_medium", 1500, "Creating medium version (1024px)..."),
    stage("resizing_large", 1800, "Creating large version (2048px)..."),
    stage("converting_webp", 1500, "Converting to WebP format..."),
    stage("optimizing", 1000, "Compressing and optimizing..."),
    stage("complete", 300, "Image processing complete!"),
];

const DOCUMENT_STAGES: [Stage; 8] = [
    stage("validating", 600, "Validating document format..."),
    stage("extracting_metadata", 1000, "Extracting document metadata..."),
    stage("generating_preview", 2000, "Generating preview images..."),
    stage("text_extraction", 1800, "Extracting text for search indexing..."),
    stage("creating_thumbnail", 1200, "Creating thumbnail from first page..."),
    stage("virus_scan", 2500, "Running security scan..."),
    stage("optimizing", 1500, "Compressing PDF..."),
    stage("complete", 400, "Document processing complete!"),
];

pub fn stages_for(media: MediaType) -> &'static [Stage] {
    match media {
        MediaType::Video => &VIDEO_STAGES,
        MediaType::Audio => &AUDIO_STAGES,
        MediaType::Image => &IMAGE_STAGES,
        MediaType::Document => &DOCUMENT_STAGES,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Uploaded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkState {
    pub index: u32,
    pub size: u64,
    pub status: ChunkStatus,
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStage {
    pub name: &'static str,
    pub message: &'static str,
    pub progress: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub mime_type: String,
    pub duration: Option<String>,
}

pub struct UploadSession {
    pub file_name: String,
    pub file_size: u64,
    pub media_type: MediaType,
    pub chunk_size: u64,
    pub chunks: Vec<ChunkState>,
    pub uploaded: BTreeSet<u32>,
    pub status: UploadStatus,
    pub processing_stage: Option<ProcessingStage>,
    pub metadata: SessionMetadata,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn total_chunks(&self) -> u32 {
        self.chunks.len() as u32
    }

    fn uploaded_bytes(&self) -> u64 {
        self.uploaded
            .iter()
            .filter_map(|i| self.chunks.get(*i as usize))
            .map(|c| c.size)
            .sum()
    }

    /// Uploaded share of the declared file size, percent with two decimals.
    pub fn progress(&self) -> f64 {
        let pct = (self.uploaded_bytes() as f64 / self.file_size as f64 * 100.0).min(100.0);
        (pct * 100.0).round() / 100.0
    }

    // lowest index still pending, or total_chunks when nothing is left
    pub fn next_chunk(&self) -> u32 {
        (0..self.total_chunks())
            .find(|i| !self.uploaded.contains(i))
            .unwrap_or(self.total_chunks())
    }

    fn eta(&self, now: DateTime<Utc>) -> String {
        let done = self.uploaded.len() as i64;
        if done == 0 {
            return "Calculating...".to_string();
        }

        let elapsed_ms = (now - self.started_at).num_milliseconds().max(0);
        let remaining = self.total_chunks() as i64 - done;
        let eta = ((remaining * elapsed_ms / done) as f64 / 1000.0).round() as i64;

        match eta {
            e if e < 60 => format!("{e}s"),
            e if e < 3600 => format!("{}m", (e as f64 / 60.0).round()),
            e => format!("{}h", (e as f64 / 3600.0).round()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedArtifact {
    pub file_name: String,
    pub file_size: u64,
    pub media_type: MediaType,
    pub duration: Option<String>,
    pub renditions: Vec<String>,
    pub thumbnail: String,
    pub streaming_url: String,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedArtifact {
    fn for_session(upload_id: &str, session: &UploadSession, now: DateTime<Utc>) -> Self {
        let (duration, renditions): (Option<&str>, &[&str]) = match session.media_type {
            MediaType::Video => (Some("2:45"), &["360p", "720p", "1080p"]),
            MediaType::Audio => (Some("3:30"), &["mp3_320k", "aac_256k"]),
            MediaType::Image => (None, &["150px", "480px", "1024px", "2048px", "webp"]),
            MediaType::Document => (None, &["preview", "text_index"]),
        };

        Self {
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            media_type: session.media_type,
            duration: duration.map(str::to_string),
            renditions: renditions.iter().map(|r| r.to_string()).collect(),
            thumbnail: format!("/thumbnails/{upload_id}.jpg"),
            streaming_url: format!("/stream/{upload_id}"),
            processed_at: now,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Invalid chunk layout: {0}")]
    InvalidChunking(String),

    #[error("Upload session not found")]
    NotFound,

    #[error("Chunk index {index} out of range (total chunks: {total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("Chunk already uploaded")]
    DuplicateChunk { next_chunk: u32 },

    #[error("Video not found or still processing")]
    NotProcessed,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUpload {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    pub total_chunks: Option<u32>,
    pub chunk_size: Option<u64>,
    pub file_type: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkPlan {
    pub index: u32,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOutcome {
    pub upload_id: String,
    pub total_chunks: u32,
    pub chunk_size: u64,
    pub next_chunk: u32,
    pub chunks: Vec<ChunkPlan>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    pub chunk_index: u32,
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    pub progress: f64,
    pub next_chunk: u32,
    pub estimated_time_remaining: String,
    pub chunks: Vec<ChunkState>,
}

#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    Progress(ChunkProgress),
    Complete { chunks: Vec<ChunkState> },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusView {
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    pub progress: f64,
    pub status: UploadStatus,
    pub metadata: SessionMetadata,
    pub processing_stage: Option<ProcessingStage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseState {
    pub status: UploadStatus,
    pub uploaded_chunks: u32,
    pub next_chunk: u32,
}

// Split `file_size` into per-chunk sizes, deriving whichever of count/size is missing
fn plan_chunks(
    file_size: u64,
    total_chunks: Option<u32>,
    chunk_size: Option<u64>,
) -> Result<(u64, Vec<u64>), UploadError> {
    let invalid = |msg: &str| UploadError::InvalidChunking(msg.to_string());

    match (total_chunks, chunk_size) {
        (None, None) => Err(UploadError::MissingFields),
        (Some(0), _) => Err(invalid("totalChunks must be positive")),
        (_, Some(0)) => Err(invalid("chunkSize must be positive")),
        (Some(total), None) => {
            let total = total as u64;
            if total > MAX_CHUNKS {
                return Err(invalid(&format!("at most {MAX_CHUNKS} chunks per upload")));
            }
            if total > file_size {
                return Err(invalid("more chunks than bytes"));
            }
            let base = file_size / total;
            let extra = file_size % total;
            let sizes: Vec<u64> = (0..total).map(|i| base + u64::from(i < extra)).collect();
            Ok((base + u64::from(extra > 0), sizes))
        }
        (total, Some(chunk)) => {
            let derived = file_size.div_ceil(chunk);
            if derived > MAX_CHUNKS {
                return Err(invalid(&format!(
                    "{file_size} bytes in {chunk}-byte chunks exceeds {MAX_CHUNKS} chunks"
                )));
            }
            let total = total.map(u64::from).unwrap_or(derived);
            if total != derived {
                return Err(invalid(&format!(
                    "{total} chunks of {chunk} bytes cannot hold exactly {file_size} bytes"
                )));
            }
            let sizes = (0..total)
                .map(|i| if i + 1 == total { file_size - chunk * i } else { chunk })
                .collect();
            Ok((chunk, sizes))
        }
    }
}

/// Owns every upload session and every finished artifact.
pub struct UploadTracker {
    sessions: DashMap<String, UploadSession>,
    processed: DashMap<String, ProcessedArtifact>,
    clock: Arc<dyn Clock>,
}

impl UploadTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            processed: DashMap::new(),
            clock,
        }
    }

    pub fn init(&self, request: InitUpload) -> Result<InitOutcome, UploadError> {
        if request.file_name.trim().is_empty() || request.file_size == 0 {
            return Err(UploadError::MissingFields);
        }
        let (chunk_size, sizes) =
            plan_chunks(request.file_size, request.total_chunks, request.chunk_size)?;

        let declared_type = request.file_type.as_deref().and_then(MediaType::parse);
        let mime_type = request
            .mime_type
            .clone()
            .or_else(|| declared_type.map(|m| m.default_mime().to_string()))
            .unwrap_or_else(|| mime_from_extension(&request.file_name).to_string());
        let media_type = declared_type
            .or_else(|| MediaType::from_mime(&mime_type))
            .unwrap_or_default();

        let chunks: Vec<ChunkState> = sizes
            .into_iter()
            .enumerate()
            .map(|(i, size)| ChunkState {
                index: i as u32,
                size,
                status: ChunkStatus::Pending,
                uploaded_at: None,
            })
            .collect();

        let upload_id = hex::encode(rand::random::<[u8; 16]>());
        let outcome = InitOutcome {
            upload_id: upload_id.clone(),
            total_chunks: chunks.len() as u32,
            chunk_size,
            next_chunk: 0,
            chunks: chunks.iter().map(|c| ChunkPlan { index: c.index, size: c.size }).collect(),
        };

        info!(
            upload_id = %upload_id,
            file = %request.file_name,
            size = request.file_size,
            chunks = outcome.total_chunks,
            "upload session initialized"
        );
        self.sessions.insert(
            upload_id,
            UploadSession {
                file_name: request.file_name,
                file_size: request.file_size,
                media_type,
                chunk_size,
                chunks,
                uploaded: BTreeSet::new(),
                status: UploadStatus::Initialized,
                processing_stage: None,
                metadata: SessionMetadata { mime_type, duration: None },
                started_at: self.clock.now(),
                completed_at: None,
            },
        );
        UPLOADS_STARTED.inc();

        Ok(outcome)
    }

    fn precheck(&self, upload_id: &str, index: u32) -> Result<(), UploadError> {
        let session = self.sessions.get(upload_id).ok_or(UploadError::NotFound)?;
        if index >= session.total_chunks() {
            return Err(UploadError::ChunkOutOfRange {
                index,
                total: session.total_chunks(),
            });
        }
        if session.uploaded.contains(&index) {
            return Err(UploadError::DuplicateChunk {
                next_chunk: session.next_chunk(),
            });
        }
        Ok(())
    }

    /// Record one chunk after a simulated network delay.
    ///
    /// Duplicates are checked both before and after the delay, so two
    /// concurrent submissions of the same index cannot both be accepted.
    /// The last chunk moves the session to `processing` and starts the
    /// pipeline.
    pub async fn submit_chunk(
        self: &Arc<Self>,
        upload_id: &str,
        index: u32,
    ) -> Result<ChunkOutcome, UploadError> {
        self.precheck(upload_id, index)?;

        let delay = rand::thread_rng().gen_range(CHUNK_DELAY_MS);
        sleep(Duration::from_millis(delay)).await;

        let now = self.clock.now();
        let outcome = {
            // session may have been cancelled while we slept
            let mut session = self.sessions.get_mut(upload_id).ok_or(UploadError::NotFound)?;
            if !session.uploaded.insert(index) {
                return Err(UploadError::DuplicateChunk {
                    next_chunk: session.next_chunk(),
                });
            }
            if let Some(chunk) = session.chunks.get_mut(index as usize) {
                chunk.status = ChunkStatus::Uploaded;
                chunk.uploaded_at = Some(now);
            }

            if session.uploaded.len() as u32 == session.total_chunks() {
                session.status = UploadStatus::Processing;
                session.completed_at = Some(now);
                ChunkOutcome::Complete {
                    chunks: session.chunks.clone(),
                }
            } else {
                session.status = UploadStatus::Uploading;
                ChunkOutcome::Progress(ChunkProgress {
                    chunk_index: index,
                    uploaded_chunks: session.uploaded.len() as u32,
                    total_chunks: session.total_chunks(),
                    progress: session.progress(),
                    next_chunk: session.next_chunk(),
                    estimated_time_remaining: session.eta(now),
                    chunks: session.chunks.clone(),
                })
            }
        };

        debug!(upload_id, index, "chunk recorded");
        if let ChunkOutcome::Complete { .. } = outcome {
            info!(upload_id, "upload complete, starting processing");
            tokio::spawn(Arc::clone(self).run_pipeline(upload_id.to_string()));
        }

        Ok(outcome)
    }

    async fn run_pipeline(self: Arc<Self>, upload_id: String) {
        let Some(media_type) = self.sessions.get(&upload_id).map(|s| s.media_type) else {
            return;
        };
        let stages = stages_for(media_type);

        for (i, stage) in stages.iter().enumerate() {
            {
                let Some(mut session) = self.sessions.get_mut(&upload_id) else {
                    info!(upload_id = %upload_id, "session cancelled during processing");
                    return;
                };
                session.processing_stage = Some(ProcessingStage {
                    name: stage.name,
                    message: stage.message,
                    progress: (i * 100 / stages.len()) as u32,
                });
            }
            debug!(upload_id = %upload_id, stage = stage.name, "processing stage");
            sleep(Duration::from_millis(stage.duration_ms)).await;
        }

        {
            let Some(mut session) = self.sessions.get_mut(&upload_id) else {
                return;
            };
            session.status = UploadStatus::Ready;
            session.processing_stage = None;
            // inserted while the session is held, cancel removes the session first
            let artifact = ProcessedArtifact::for_session(&upload_id, &session, self.clock.now());
            self.processed.insert(upload_id.clone(), artifact);
        }

        UPLOADS_COMPLETED.inc();
        info!(upload_id = %upload_id, "processing finished");
    }

    pub fn status(&self, upload_id: &str) -> Result<UploadStatusView, UploadError> {
        let session = self.sessions.get(upload_id).ok_or(UploadError::NotFound)?;

        Ok(UploadStatusView {
            upload_id: upload_id.to_string(),
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            uploaded_chunks: session.uploaded.len() as u32,
            total_chunks: session.total_chunks(),
            progress: session.progress(),
            status: session.status,
            metadata: session.metadata.clone(),
            processing_stage: session.processing_stage.clone(),
        })
    }

    // Cosmetic, nothing in flight is stopped; ignored once processing began
    pub fn pause(&self, upload_id: &str) -> Result<PauseState, UploadError> {
        let mut session = self.sessions.get_mut(upload_id).ok_or(UploadError::NotFound)?;
        if session.status.accepts_pause() {
            session.status = UploadStatus::Paused;
        }
        Ok(PauseState {
            status: session.status,
            uploaded_chunks: session.uploaded.len() as u32,
            next_chunk: session.next_chunk(),
        })
    }

    pub fn resume(&self, upload_id: &str) -> Result<PauseState, UploadError> {
        let mut session = self.sessions.get_mut(upload_id).ok_or(UploadError::NotFound)?;
        if session.status == UploadStatus::Paused {
            session.status = UploadStatus::Uploading;
        }
        Ok(PauseState {
            status: session.status,
            uploaded_chunks: session.uploaded.len() as u32,
            next_chunk: session.next_chunk(),
        })
    }

    pub fn cancel(&self, upload_id: &str) -> Result<(), UploadError> {
        self.sessions.remove(upload_id).ok_or(UploadError::NotFound)?;
        self.processed.remove(upload_id);
        info!(upload_id, "upload cancelled");
        Ok(())
    }

    pub fn processed(&self, upload_id: &str) -> Result<ProcessedArtifact, UploadError> {
        self.processed
            .get(upload_id)
            .map(|artifact| artifact.clone())
            .ok_or(UploadError::NotProcessed)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tracker() -> Arc<UploadTracker> {
        Arc::new(UploadTracker::new(Arc::new(ManualClock::default())))
    }

    fn init(tracker: &UploadTracker, file_size: u64, chunk_size: u64) -> InitOutcome {
        tracker
            .init(InitUpload {
                file_name: "clip.mp4".into(),
                file_size,
                chunk_size: Some(chunk_size),
                ..Default::default()
            })
            .unwrap()
    }

    async fn wait_until_ready(tracker: &UploadTracker, id: &str) {
        for _ in 0..100 {
            if tracker.status(id).unwrap().status == UploadStatus::Ready {
                return;
            }
            sleep(Duration::from_secs(1)).await;
        }
        panic!("upload {id} never became ready");
    }

    #[test]
    fn plan_derives_missing_dimension() {
        assert_eq!(plan_chunks(1000, None, Some(500)).unwrap(), (500, vec![500, 500]));
        assert_eq!(plan_chunks(1001, None, Some(500)).unwrap(), (500, vec![500, 500, 1]));
        assert_eq!(plan_chunks(10, Some(4), None).unwrap(), (3, vec![3, 3, 2, 2]));
        assert_eq!(plan_chunks(1000, Some(2), Some(500)).unwrap(), (500, vec![500, 500]));
    }

    #[test]
    fn plan_rejects_inconsistent_layouts() {
        assert_eq!(plan_chunks(1000, None, None), Err(UploadError::MissingFields));
        assert!(plan_chunks(1000, Some(3), Some(500)).is_err());
        assert!(plan_chunks(1000, Some(0), None).is_err());
        assert!(plan_chunks(1000, None, Some(0)).is_err());
        assert!(plan_chunks(3, Some(4), None).is_err());
    }

    #[test]
    fn plan_caps_the_chunk_count() {
        assert_eq!(plan_chunks(MAX_CHUNKS, None, Some(1)).unwrap().1.len() as u64, MAX_CHUNKS);
        assert!(matches!(
            plan_chunks(MAX_CHUNKS + 1, None, Some(1)),
            Err(UploadError::InvalidChunking(_))
        ));
        assert!(matches!(
            plan_chunks(1 << 40, Some(u32::MAX), None),
            Err(UploadError::InvalidChunking(_))
        ));
    }

    #[test]
    fn init_rejects_huge_file_with_tiny_chunks() {
        let tracker = tracker();
        let result = tracker.init(InitUpload {
            file_name: "big.mp4".into(),
            file_size: 1 << 62,
            chunk_size: Some(1),
            ..Default::default()
        });

        assert!(matches!(result, Err(UploadError::InvalidChunking(_))));
        assert_eq!(tracker.active_sessions(), 0);
    }

    #[test]
    fn init_creates_pending_chunks_and_resolves_mime() {
        let tracker = tracker();
        let outcome = init(&tracker, 1000, 500);

        assert_eq!(outcome.total_chunks, 2);
        assert_eq!(outcome.upload_id.len(), 32);
        let status = tracker.status(&outcome.upload_id).unwrap();
        assert_eq!(status.status, UploadStatus::Initialized);
        assert_eq!(status.metadata.mime_type, "video/mp4");
        assert_eq!(status.progress, 0.0);
    }

    #[test]
    fn init_infers_media_type_from_extension() {
        let tracker = tracker();
        let outcome = tracker
            .init(InitUpload {
                file_name: "song.flac".into(),
                file_size: 10,
                total_chunks: Some(1),
                ..Default::default()
            })
            .unwrap();

        let session = tracker.sessions.get(&outcome.upload_id).unwrap();
        assert_eq!(session.media_type, MediaType::Audio);
        assert_eq!(session.metadata.mime_type, "audio/flac");
    }

    #[test]
    fn init_requires_name_and_size() {
        let tracker = tracker();
        let missing = InitUpload { file_size: 10, total_chunks: Some(1), ..Default::default() };
        assert_eq!(tracker.init(missing).unwrap_err(), UploadError::MissingFields);
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_upload_reaches_ready() {
        let tracker = tracker();
        let id = init(&tracker, 1000, 500).upload_id;

        let ChunkOutcome::Progress(progress) = tracker.submit_chunk(&id, 0).await.unwrap() else {
            panic!("first chunk should not complete the upload");
        };
        assert_eq!(progress.progress, 50.0);
        assert_eq!(progress.next_chunk, 1);
        assert_eq!(tracker.status(&id).unwrap().status, UploadStatus::Uploading);

        let outcome = tracker.submit_chunk(&id, 1).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Complete { .. }));
        assert_eq!(tracker.status(&id).unwrap().status, UploadStatus::Processing);
        assert_eq!(tracker.processed(&id).unwrap_err(), UploadError::NotProcessed);

        wait_until_ready(&tracker, &id).await;
        let artifact = tracker.processed(&id).unwrap();
        assert_eq!(artifact.renditions, vec!["360p", "720p", "1080p"]);
        assert!(tracker.status(&id).unwrap().processing_stage.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_can_arrive_in_any_order() {
        let tracker = tracker();
        let id = init(&tracker, 1500, 500).upload_id;

        tracker.submit_chunk(&id, 2).await.unwrap();
        let ChunkOutcome::Progress(progress) = tracker.submit_chunk(&id, 0).await.unwrap() else {
            panic!("two of three chunks is not complete");
        };
        assert_eq!(progress.next_chunk, 1);

        assert!(matches!(
            tracker.submit_chunk(&id, 1).await.unwrap(),
            ChunkOutcome::Complete { .. }
        ));
        wait_until_ready(&tracker, &id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_chunk_points_at_next_expected_index() {
        let tracker = tracker();
        let id = init(&tracker, 1500, 500).upload_id;
        tracker.submit_chunk(&id, 0).await.unwrap();

        assert_eq!(
            tracker.submit_chunk(&id, 0).await.unwrap_err(),
            UploadError::DuplicateChunk { next_chunk: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_duplicates_are_accepted_once() {
        let tracker = tracker();
        let id = init(&tracker, 1500, 500).upload_id;

        let (a, b) = tokio::join!(tracker.submit_chunk(&id, 1), tracker.submit_chunk(&id, 1));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(tracker.status(&id).unwrap().uploaded_chunks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_and_unknown_sessions_are_rejected() {
        let tracker = tracker();
        let id = init(&tracker, 1000, 500).upload_id;

        assert_eq!(
            tracker.submit_chunk(&id, 2).await.unwrap_err(),
            UploadError::ChunkOutOfRange { index: 2, total: 2 }
        );
        assert_eq!(
            tracker.submit_chunk("missing", 0).await.unwrap_err(),
            UploadError::NotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_removes_everything() {
        let tracker = tracker();
        let id = init(&tracker, 1000, 500).upload_id;
        tracker.submit_chunk(&id, 0).await.unwrap();
        tracker.submit_chunk(&id, 1).await.unwrap();

        tracker.cancel(&id).unwrap();
        assert_eq!(tracker.status(&id).unwrap_err(), UploadError::NotFound);
        assert_eq!(tracker.cancel(&id).unwrap_err(), UploadError::NotFound);
        assert_eq!(tracker.active_sessions(), 0);

        // pipeline notices the cancellation and never publishes an artifact
        sleep(Duration::from_secs(60)).await;
        assert_eq!(tracker.processed(&id).unwrap_err(), UploadError::NotProcessed);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_are_cosmetic() {
        let tracker = tracker();
        let id = init(&tracker, 1000, 500).upload_id;

        assert_eq!(tracker.pause(&id).unwrap().status, UploadStatus::Paused);
        // chunks are still accepted while paused
        tracker.submit_chunk(&id, 0).await.unwrap();
        assert_eq!(tracker.status(&id).unwrap().status, UploadStatus::Uploading);

        tracker.pause(&id).unwrap();
        let resumed = tracker.resume(&id).unwrap();
        assert_eq!(resumed.status, UploadStatus::Uploading);
        assert_eq!(resumed.next_chunk, 1);

        tracker.submit_chunk(&id, 1).await.unwrap();
        // no going backwards once processing has started
        assert_eq!(tracker.pause(&id).unwrap().status, UploadStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_current_stage() {
        let tracker = tracker();
        let id = init(&tracker, 500, 500).upload_id;
        tracker.submit_chunk(&id, 0).await.unwrap();

        sleep(Duration::from_millis(10)).await;
        let stage = tracker.status(&id).unwrap().processing_stage.unwrap();
        assert_eq!(stage.name, "validating");
        assert_eq!(stage.progress, 0);
    }

    #[test]
    fn every_media_type_ends_with_complete_stage() {
        for media in [MediaType::Video, MediaType::Audio, MediaType::Image, MediaType::Document] {
            assert_eq!(stages_for(media).last().map(|s| s.name), Some("complete"));
        }
    }

    #[test]
    fn eta_formats_by_magnitude() {
        let tracker = tracker();
        let id = init(&tracker, 400, 100).upload_id;
        let mut session = tracker.sessions.get_mut(&id).unwrap();
        let start = session.started_at;

        assert_eq!(session.eta(start), "Calculating...");
        session.uploaded.insert(0);
        assert_eq!(session.eta(start + chrono::Duration::seconds(10)), "30s");
        assert_eq!(session.eta(start + chrono::Duration::seconds(100)), "5m");
        assert_eq!(session.eta(start + chrono::Duration::seconds(3000)), "3h");
    }
}
