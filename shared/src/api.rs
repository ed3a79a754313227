use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ActivityId, ActivityRecord, RecordError};

const MAX_ERROR_MESSAGE_CHARS: usize = 256;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("HTTP error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Maps a non-success status and its body to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = error_message(status, body);
        match status {
            400 | 422 => Self::Validation(message),
            401 | 403 => Self::Unauthorized { status },
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            _ => Self::Status { status, message },
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthorized { .. } => "AUTH_ERROR",
            Self::Status { .. } => "HTTP_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Transport(_) => "NETWORK_ERROR",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }

    /// Whether repeating the same call could succeed. The store never
    /// retries on its own; this is for the shell deciding what to offer.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::Conflict(_) => Some(409),
            Self::Unauthorized { status } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}

#[derive(Deserialize)]
struct ProblemDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn error_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP error: {status}");
    }

    if let Ok(problem) = serde_json::from_str::<ProblemDetails>(body) {
        if let Some(text) = problem.message.or(problem.title) {
            return text;
        }
    }

    let mut preview: String = body.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    if body.chars().count() > MAX_ERROR_MESSAGE_CHARS {
        preview.push_str("...");
    }
    preview
}

/// The remote side of the activity cache.
#[async_trait]
pub trait ActivityApi: Send + Sync {
    async fn list(&self) -> Result<Vec<ActivityRecord>, ApiError>;
    async fn details(&self, id: &ActivityId) -> Result<ActivityRecord, ApiError>;
    async fn create(&self, activity: &ActivityRecord) -> Result<(), ApiError>;
    async fn update(&self, activity: &ActivityRecord) -> Result<(), ApiError>;
    async fn delete(&self, id: &ActivityId) -> Result<(), ApiError>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::sync::Notify;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Call {
        List,
        Details,
        Create,
        Update,
        Delete,
    }

    /// In-memory API with per-call counters, injectable failures and an
    /// optional gate that holds every call until released.
    #[derive(Default)]
    pub struct FakeActivityApi {
        records: Mutex<HashMap<String, ActivityRecord>>,
        calls: Mutex<HashMap<Call, usize>>,
        failing: Mutex<HashMap<Call, ApiError>>,
        gate: Mutex<Option<Arc<Notify>>>,
        waiting: AtomicUsize,
    }

    impl FakeActivityApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_records(records: impl IntoIterator<Item = ActivityRecord>) -> Self {
            let api = Self::new();
            for record in records {
                api.insert(record);
            }
            api
        }

        pub fn insert(&self, record: ActivityRecord) {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(record.id.clone(), record);
        }

        pub fn contains(&self, id: &str) -> bool {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(id)
        }

        pub fn record(&self, id: &str) -> Option<ActivityRecord> {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(id)
                .cloned()
        }

        pub fn calls(&self, call: Call) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&call)
                .copied()
                .unwrap_or(0)
        }

        pub fn fail(&self, call: Call, error: ApiError) {
            self.failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(call, error);
        }

        pub fn recover(&self, call: Call) {
            self.failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&call);
        }

        /// Every following call parks until [`Self::release`] is called once per call.
        pub fn hold(&self) {
            *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Notify::new()));
        }

        pub fn release(&self) {
            if let Some(notify) = self.gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
                notify.notify_one();
            }
        }

        /// Number of calls currently parked at the gate.
        pub fn waiting(&self) -> usize {
            self.waiting.load(Ordering::SeqCst)
        }

        async fn enter(&self, call: Call) -> Result<(), ApiError> {
            *self
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(call)
                .or_insert(0) += 1;

            let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
            if let Some(gate) = gate {
                self.waiting.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                self.waiting.fetch_sub(1, Ordering::SeqCst);
            }

            match self
                .failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&call)
            {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ActivityApi for FakeActivityApi {
        async fn list(&self) -> Result<Vec<ActivityRecord>, ApiError> {
            self.enter(Call::List).await?;
            let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(records.values().cloned().collect())
        }

        async fn details(&self, id: &ActivityId) -> Result<ActivityRecord, ApiError> {
            self.enter(Call::Details).await?;
            self.record(id.as_str())
                .ok_or_else(|| ApiError::NotFound(id.to_string()))
        }

        async fn create(&self, activity: &ActivityRecord) -> Result<(), ApiError> {
            self.enter(Call::Create).await?;
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            if records.contains_key(&activity.id) {
                return Err(ApiError::Conflict(activity.id.clone()));
            }
            records.insert(activity.id.clone(), activity.clone());
            Ok(())
        }

        async fn update(&self, activity: &ActivityRecord) -> Result<(), ApiError> {
            self.enter(Call::Update).await?;
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            match records.get_mut(&activity.id) {
                Some(existing) => {
                    *existing = activity.clone();
                    Ok(())
                }
                None => Err(ApiError::NotFound(activity.id.clone())),
            }
        }

        async fn delete(&self, id: &ActivityId) -> Result<(), ApiError> {
            self.enter(Call::Delete).await?;
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            records
                .remove(id.as_str())
                .map(|_| ())
                .ok_or_else(|| ApiError::NotFound(id.to_string()))
        }
    }
}
