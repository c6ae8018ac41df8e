//! Microphone recording for voice input.
//!
//! The recorder owns the acquired media tracks for the length of a take and
//! releases them as soon as recording stops, before any upload happens.

use crate::config;
use crate::storage::StorageManager;
use crate::transcription::WhisperClient;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
    Processing,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no audio input device available")]
    NoDevice,

    #[error("recorder is busy ({0:?})")]
    Busy(RecordingState),

    #[error("not recording")]
    NotRecording,
}

/// A single acquired input track. Stopping frees the device.
pub trait MediaTrack: Send + Sync {
    fn stop(&self);
    fn ready_state(&self) -> TrackState;
}

pub struct MediaStream {
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Source of microphone streams.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self) -> Result<MediaStream, CaptureError>;
}

/// Track handle for audio that arrives from elsewhere (the webview captures
/// it and pushes chunks in).
#[derive(Debug, Default)]
pub struct LocalTrack {
    ended: AtomicBool,
}

impl MediaTrack for LocalTrack {
    fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    fn ready_state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }
}

/// Devices backed by pushed audio: always grants a single `LocalTrack`.
#[derive(Debug, Default)]
pub struct PushedAudioDevices;

#[async_trait]
impl MediaDevices for PushedAudioDevices {
    async fn get_user_media(&self) -> Result<MediaStream, CaptureError> {
        Ok(MediaStream::new(vec![Arc::new(LocalTrack::default())]))
    }
}

/// A finished take.
#[derive(Debug, Clone)]
pub struct Recording {
    pub audio: Vec<u8>,
    pub duration_secs: u64,
}

struct Session {
    stream: MediaStream,
    chunks: Vec<u8>,
    ticker: JoinHandle<()>,
}

struct Inner {
    state: RecordingState,
    session: Option<Session>,
}

/// `Idle -> Recording -> Processing -> Idle`, with a one-second ticker
/// counting elapsed time while recording.
pub struct VoiceRecorder {
    devices: Arc<dyn MediaDevices>,
    inner: Mutex<Inner>,
    elapsed: Arc<AtomicU64>,
}

impl VoiceRecorder {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            inner: Mutex::new(Inner {
                state: RecordingState::Idle,
                session: None,
            }),
            elapsed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn state(&self) -> RecordingState {
        self.inner.lock().await.state
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Acquires the microphone and starts the elapsed-time ticker.
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.state != RecordingState::Idle {
            return Err(CaptureError::Busy(inner.state));
        }

        let stream = self.devices.get_user_media().await.map_err(|e| {
            log::warn!("Microphone access failed: {}", e);
            e
        })?;

        self.elapsed.store(0, Ordering::Relaxed);
        let elapsed = self.elapsed.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                elapsed.fetch_add(1, Ordering::Relaxed);
            }
        });

        log::info!("Recording started with {} track(s)", stream.tracks().len());
        inner.session = Some(Session {
            stream,
            chunks: Vec::new(),
            ticker,
        });
        inner.state = RecordingState::Recording;
        Ok(())
    }

    /// Buffers an encoded audio chunk for the current take.
    pub async fn push_chunk(&self, chunk: &[u8]) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        match (inner.state, inner.session.as_mut()) {
            (RecordingState::Recording, Some(session)) => {
                session.chunks.extend_from_slice(chunk);
                Ok(())
            }
            _ => Err(CaptureError::NotRecording),
        }
    }

    /// Ends the take: stops the ticker, releases every track and moves to
    /// `Processing`.
    pub async fn stop(&self) -> Result<Recording, CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.state != RecordingState::Recording {
            return Err(CaptureError::NotRecording);
        }
        let Some(session) = inner.session.take() else {
            return Err(CaptureError::NotRecording);
        };

        session.ticker.abort();
        session.stream.stop_all();
        inner.state = RecordingState::Processing;

        let recording = Recording {
            audio: session.chunks,
            duration_secs: self.elapsed_secs(),
        };
        log::info!(
            "Recording stopped after {} ({} bytes)",
            format_duration(recording.duration_secs),
            recording.audio.len()
        );
        Ok(recording)
    }

    /// Back to `Idle` once processing is over.
    pub async fn finish(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = RecordingState::Idle;
    }

    /// Stops recording and transcribes the take with the stored key and
    /// Whisper settings. The recorder is back to `Idle`, tracks released,
    /// whatever the outcome; failures come back as display strings.
    pub async fn stop_and_transcribe(
        &self,
        transcriber: &WhisperClient,
        storage: &StorageManager,
    ) -> Result<String, String> {
        let recording = self.stop().await.map_err(|e| e.to_string())?;
        let result = transcribe_recording(transcriber, storage, recording).await;
        self.finish().await;
        result
    }
}

async fn transcribe_recording(
    transcriber: &WhisperClient,
    storage: &StorageManager,
    recording: Recording,
) -> Result<String, String> {
    let api_key = config::get_openai_api_key(storage)
        .await
        .map_err(|e| format!("Transcription error: {}", e))?;
    let whisper = config::load_whisper_config(storage)
        .await
        .map_err(|e| format!("Transcription error: {}", e))?;

    transcriber
        .transcribe(api_key.as_deref(), recording.audio, &whisper)
        .await
        .map_err(|e| {
            log::error!("{}", e);
            e.to_string()
        })
}

impl Drop for VoiceRecorder {
    fn drop(&mut self) {
        if let Some(session) = self.inner.get_mut().session.take() {
            session.ticker.abort();
            session.stream.stop_all();
        }
    }
}

/// `mm:ss`
pub fn format_duration(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
