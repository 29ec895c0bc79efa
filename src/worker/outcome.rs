use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::event::{DecodeError, Event};
use crate::humanize::ByteSize;
use crate::processors::RegistryError;
use crate::storage::StorageError;

/// Terminal status of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Skipped,
    Failed,
}

/// Why an event was intentionally not processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// No rule for the file type (detail: the derived key, empty if none)
    NoMatchingRule(String),
    RuleDisabled(String),
    /// Blacklist denial, detail is the service's reason
    Denied(String),
    /// Object written by this service into the output bucket (detail: the key)
    DerivedOutput(String),
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::NoMatchingRule(_) => "no_matching_rule",
            SkipReason::RuleDisabled(_) => "rule_disabled",
            SkipReason::Denied(_) => "denied",
            SkipReason::DerivedOutput(_) => "derived_output",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            SkipReason::NoMatchingRule(detail)
            | SkipReason::RuleDisabled(detail)
            | SkipReason::Denied(detail)
            | SkipReason::DerivedOutput(detail) => detail,
        }
    }
}

/// Stable error classification reported to the hosting platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DecodeError,
    UnknownTransform,
    TransformError,
    BlacklistUnavailable,
    SizeLimitExceeded,
    InputNotFound,
    StorageError,
    DeadlineExceeded,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::UnknownTransform => "unknown_transform",
            ErrorKind::TransformError => "transform_error",
            ErrorKind::BlacklistUnavailable => "blacklist_unavailable",
            ErrorKind::SizeLimitExceeded => "size_limit_exceeded",
            ErrorKind::InputNotFound => "input_not_found",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Transient dependency failures; the whole event may be redelivered
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::BlacklistUnavailable | ErrorKind::StorageError | ErrorKind::DeadlineExceeded
        )
    }
}

/// Failures while handling one event
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("malformed trigger payload: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("blacklist check inconclusive: {0}")]
    BlacklistUnavailable(String),

    #[error("object is {size} bytes, limit is {limit}")]
    SizeLimitExceeded { size: u64, limit: ByteSize },

    #[error("input object {bucket}/{key} does not exist")]
    InputNotFound { bucket: String, key: String },

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("{operation} timed out after {timeout_ms}ms")]
    StorageTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("invocation exceeded its {0}ms deadline")]
    DeadlineExceeded(u64),
}

impl From<StorageError> for ProcessError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound { bucket, key } => ProcessError::InputNotFound { bucket, key },
            other => ProcessError::Storage(other),
        }
    }
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Decode(_) => ErrorKind::DecodeError,
            ProcessError::Registry(RegistryError::UnknownTransform(_)) => ErrorKind::UnknownTransform,
            ProcessError::Registry(RegistryError::Transform { .. }) => ErrorKind::TransformError,
            ProcessError::BlacklistUnavailable(_) => ErrorKind::BlacklistUnavailable,
            ProcessError::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            ProcessError::InputNotFound { .. } => ErrorKind::InputNotFound,
            ProcessError::Storage(_) | ProcessError::StorageTimeout { .. } => ErrorKind::StorageError,
            ProcessError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
        }
    }
}

/// Error details attached to a failed result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&ProcessError> for ErrorInfo {
    fn from(error: &ProcessError) -> Self {
        let kind = error.kind();
        Self {
            kind,
            message: error.to_string(),
            retryable: kind.is_retryable(),
        }
    }
}

/// The single outcome reported for an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    pub invocation_id: Uuid,
    pub status: Status,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub output_key: Option<String>,
    /// Output already existed and the transform was not re-run
    pub reused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ProcessingResult {
    fn base(invocation_id: Uuid, event: Option<&Event>, status: Status) -> Self {
        Self {
            invocation_id,
            status,
            bucket: event.map(|e| e.bucket.clone()),
            object_key: event.map(|e| e.object_key.clone()),
            output_key: None,
            reused: false,
            reason: None,
            error: None,
        }
    }

    pub fn success(invocation_id: Uuid, event: &Event, output_key: String, reused: bool) -> Self {
        Self {
            output_key: Some(output_key),
            reused,
            ..Self::base(invocation_id, Some(event), Status::Success)
        }
    }

    pub fn skipped(invocation_id: Uuid, event: &Event, reason: SkipReason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::base(invocation_id, Some(event), Status::Skipped)
        }
    }

    pub fn failed(invocation_id: Uuid, event: Option<&Event>, error: &ProcessError) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(invocation_id, event, Status::Failed)
        }
    }

    /// Should the transport redeliver this event
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(|error| error.retryable)
    }

    /// Reason code for logs and audits
    pub fn reason_code(&self) -> &'static str {
        match (&self.reason, &self.error) {
            (Some(reason), _) => reason.code(),
            (None, Some(error)) => error.kind.code(),
            (None, None) => "completed",
        }
    }
}
