//! Event handler - processes one object-created event end to end
//!
//! Received → ConfigReady → BlacklistChecked → Processed → Completed, with
//! Skipped and Failed reachable from any non-terminal state. The blacklist is
//! consulted only after a rule matched, and the transform runs only after an
//! `Allowed` verdict.

use super::event::Event;
use super::outcome::{ErrorInfo, ErrorKind, ProcessError, ProcessingResult, SkipReason};
use crate::blacklist::{
    BlacklistCheck, BlacklistVerdict, content_fingerprint, object_fingerprint,
};
use crate::config::{ConfigResolver, FingerprintScheme, Rule, Settings};
use crate::observability::Metrics;
use crate::processors::TransformParams;
use crate::config::RuleSet;
use crate::storage::{self, ObjectInfo, StorageClient};
use bon::Builder;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Handler lifecycle states, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Received,
    ConfigReady,
    BlacklistChecked,
    Processed,
    Completed,
    Skipped,
    Failed,
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandlerState::Received => "received",
            HandlerState::ConfigReady => "config_ready",
            HandlerState::BlacklistChecked => "blacklist_checked",
            HandlerState::Processed => "processed",
            HandlerState::Completed => "completed",
            HandlerState::Skipped => "skipped",
            HandlerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-event limits and behaviour switches
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub fingerprint: FingerprintScheme,
    pub invocation_timeout: Duration,
    pub io_timeout: Duration,
    pub skip_existing_output: bool,
}

impl HandlerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            fingerprint: settings.blacklist.fingerprint,
            invocation_timeout: settings.handler.invocation_timeout(),
            io_timeout: settings.handler.io_timeout(),
            skip_existing_output: settings.handler.skip_existing_output,
        }
    }
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Suffix of the object recording which input version produced an output
pub const SOURCE_MARKER_SUFFIX: &str = ".source";

/// Output object key for an input key under a rule
pub fn output_key(object_key: &str, rule: &Rule) -> String {
    format!("{object_key}{}", rule.output_suffix)
}

fn source_marker_key(output_key: &str) -> String {
    format!("{output_key}{SOURCE_MARKER_SUFFIX}")
}

/// Early exit from the pipeline
enum Halt {
    Skip(SkipReason),
    Fail(ProcessError),
}

impl From<ProcessError> for Halt {
    fn from(error: ProcessError) -> Self {
        Halt::Fail(error)
    }
}

struct Completed {
    output_key: String,
    reused: bool,
}

/// Processes object-created events against the active rule set
#[derive(Builder)]
pub struct EventHandler {
    resolver: Arc<ConfigResolver>,
    blacklist: Arc<dyn BlacklistCheck>,
    storage: StorageClient,
    #[builder(into)]
    output_bucket: String,
    #[builder(default)]
    options: HandlerOptions,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl EventHandler {
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn resolver(&self) -> &Arc<ConfigResolver> {
        &self.resolver
    }

    /// Decode a raw trigger payload and handle it
    ///
    /// Never panics or errors: every payload produces exactly one result.
    pub async fn handle(&self, payload: &[u8]) -> ProcessingResult {
        let invocation_id = Uuid::now_v7();
        self.metrics.event_received();

        match Event::decode(payload) {
            Ok(event) => self.process(invocation_id, event).await,
            Err(e) => {
                let error = ProcessError::from(e);
                self.metrics.event_failed(false);
                warn!(%invocation_id, error = %error, reason = "decode_error", "Rejected trigger payload");
                ProcessingResult::failed(invocation_id, None, &error)
            }
        }
    }

    /// Handle an already decoded event
    pub async fn handle_event(&self, event: Event) -> ProcessingResult {
        let invocation_id = Uuid::now_v7();
        self.metrics.event_received();
        self.process(invocation_id, event).await
    }

    async fn process(&self, invocation_id: Uuid, event: Event) -> ProcessingResult {
        let span = info_span!("event", %invocation_id);

        async move {
            debug!(
                state = %HandlerState::Received,
                bucket = %event.bucket,
                key = %event.object_key,
                "State transition"
            );

            let deadline = self.options.invocation_timeout;
            let outcome = match tokio::time::timeout(deadline, self.run(&event)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Halt::Fail(ProcessError::DeadlineExceeded(
                    deadline.as_millis() as u64,
                ))),
            };

            self.finish(invocation_id, &event, outcome)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, event: &Event) -> Result<Completed, Halt> {
        // Snapshot once; a concurrent reload does not affect this event
        let rules = self.resolver.current();

        if self.is_derived_output(event, &rules) {
            return Err(Halt::Skip(SkipReason::DerivedOutput(
                event.object_key.clone(),
            )));
        }

        let file_type = event
            .file_type_key()
            .ok_or_else(|| Halt::Skip(SkipReason::NoMatchingRule(String::new())))?;
        let rule = rules
            .get(&file_type)
            .ok_or_else(|| Halt::Skip(SkipReason::NoMatchingRule(file_type.clone())))?;
        if !rule.enabled {
            return Err(Halt::Skip(SkipReason::RuleDisabled(file_type)));
        }
        debug!(
            state = %HandlerState::ConfigReady,
            file_type = %file_type,
            transform_id = %rule.transform_id,
            "State transition"
        );

        let mut input = None;
        let identifier = match self.options.fingerprint {
            FingerprintScheme::ObjectKey => object_fingerprint(&event.bucket, &event.object_key),
            FingerprintScheme::ContentSha256 => {
                let fetched = self.fetch_input(event, rule).await?;
                let identifier = content_fingerprint(&fetched.0);
                input = Some(fetched);
                identifier
            }
        };

        match self.blacklist.check(&identifier).await {
            BlacklistVerdict::Allowed => {}
            BlacklistVerdict::Denied(reason) => return Err(Halt::Skip(SkipReason::Denied(reason))),
            BlacklistVerdict::Unknown(cause) => {
                return Err(ProcessError::BlacklistUnavailable(cause).into());
            }
        }
        debug!(state = %HandlerState::BlacklistChecked, identifier = %identifier, "State transition");

        let output_key = output_key(&event.object_key, rule);
        if self.options.skip_existing_output {
            let etag = match &input {
                Some((_, info)) => info.etag.clone(),
                None => self.input_info(event).await?.etag,
            };
            if self.output_is_current(&output_key, etag.as_deref()).await? {
                return Ok(Completed {
                    output_key,
                    reused: true,
                });
            }
        }

        let (content, info) = match input {
            Some(input) => input,
            None => self.fetch_input(event, rule).await?,
        };
        let params = TransformParams::new(file_type, rule.options.clone());
        let output = self
            .resolver
            .registry()
            .process(&rule.transform_id, &content, &params)
            .map_err(ProcessError::from)?;
        debug!(
            state = %HandlerState::Processed,
            input_size = content.len(),
            output_size = output.len(),
            "State transition"
        );

        self.io(
            "put output",
            self.storage.put(&self.output_bucket, &output_key, output),
        )
        .await?;

        // Written after the output so a partial write never looks current
        if self.options.skip_existing_output
            && let Some(etag) = info.etag
        {
            self.io(
                "put source marker",
                self.storage.put(
                    &self.output_bucket,
                    &source_marker_key(&output_key),
                    etag.into_bytes(),
                ),
            )
            .await?;
        }

        Ok(Completed {
            output_key,
            reused: false,
        })
    }

    /// Objects this handler wrote itself must not be fed back into it
    fn is_derived_output(&self, event: &Event, rules: &RuleSet) -> bool {
        if event.bucket != self.output_bucket {
            return false;
        }
        let key = event.object_key.as_str();
        key.ends_with(SOURCE_MARKER_SUFFIX)
            || rules.iter().any(|(_, rule)| {
                !rule.output_suffix.is_empty() && key.ends_with(rule.output_suffix.as_str())
            })
    }

    /// True when the stored output was produced from the input version `etag`
    async fn output_is_current(
        &self,
        output_key: &str,
        etag: Option<&str>,
    ) -> Result<bool, ProcessError> {
        let Some(etag) = etag else {
            return Ok(false);
        };

        let marker = self
            .io(
                "get source marker",
                self.storage
                    .get_opt(&self.output_bucket, &source_marker_key(output_key)),
            )
            .await?;
        if marker.as_deref() != Some(etag.as_bytes()) {
            return Ok(false);
        }

        Ok(self
            .io("head output", self.storage.head(&self.output_bucket, output_key))
            .await?
            .is_some())
    }

    async fn input_info(&self, event: &Event) -> Result<ObjectInfo, ProcessError> {
        self.io("head input", self.storage.head(&event.bucket, &event.object_key))
            .await?
            .ok_or_else(|| ProcessError::InputNotFound {
                bucket: event.bucket.clone(),
                key: event.object_key.clone(),
            })
    }

    /// Read the input, enforcing the rule's size limit before and after
    async fn fetch_input(
        &self,
        event: &Event,
        rule: &Rule,
    ) -> Result<(Bytes, ObjectInfo), ProcessError> {
        let limit = rule.max_size_bytes;

        let size = match event.size {
            Some(size) => size,
            None => self.input_info(event).await?.size,
        };
        if size > limit.as_u64() {
            return Err(ProcessError::SizeLimitExceeded { size, limit });
        }

        let (content, info) = self
            .io(
                "get input",
                self.storage.get_with_info(&event.bucket, &event.object_key),
            )
            .await?;

        // Event metadata can be stale
        if info.size > limit.as_u64() {
            return Err(ProcessError::SizeLimitExceeded {
                size: info.size,
                limit,
            });
        }

        Ok((content, info))
    }

    async fn io<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = storage::Result<T>>,
    ) -> Result<T, ProcessError> {
        match tokio::time::timeout(self.options.io_timeout, call).await {
            Ok(result) => result.map_err(ProcessError::from),
            Err(_) => Err(ProcessError::StorageTimeout {
                operation,
                timeout_ms: self.options.io_timeout.as_millis() as u64,
            }),
        }
    }

    fn finish(
        &self,
        invocation_id: Uuid,
        event: &Event,
        outcome: Result<Completed, Halt>,
    ) -> ProcessingResult {
        let bucket = event.bucket.as_str();
        let key = event.object_key.as_str();

        match outcome {
            Ok(Completed { output_key, reused }) => {
                self.metrics.event_completed(reused);
                info!(
                    state = %HandlerState::Completed,
                    bucket,
                    key,
                    output_key = %output_key,
                    reused,
                    reason = "completed",
                    "Event processed"
                );
                ProcessingResult::success(invocation_id, event, output_key, reused)
            }
            Err(Halt::Skip(reason)) => {
                self.metrics
                    .event_skipped(matches!(reason, SkipReason::Denied(_)));
                info!(
                    state = %HandlerState::Skipped,
                    bucket,
                    key,
                    reason = reason.code(),
                    detail = reason.detail(),
                    "Event skipped"
                );
                ProcessingResult::skipped(invocation_id, event, reason)
            }
            Err(Halt::Fail(error)) => {
                let info = ErrorInfo::from(&error);
                self.metrics
                    .event_failed(info.kind == ErrorKind::BlacklistUnavailable);
                if info.retryable {
                    warn!(
                        state = %HandlerState::Failed,
                        bucket,
                        key,
                        reason = info.kind.code(),
                        error = %error,
                        "Event failed, redelivery requested"
                    );
                } else {
                    error!(
                        state = %HandlerState::Failed,
                        bucket,
                        key,
                        reason = info.kind.code(),
                        error = %error,
                        "Event failed"
                    );
                }
                ProcessingResult::failed(invocation_id, Some(event), &error)
            }
        }
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("output_bucket", &self.output_bucket)
            .field("options", &self.options)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
