//! Object-created event and trigger payload decoding
//!
//! Accepted payload shapes:
//!
//! - Pub/Sub push envelope: `{"message": {"data": "<base64 JSON>", ...}}`
//! - CloudEvent wrapping a Pub/Sub message (`{"data": {"message": {...}}}`)
//!   or carrying the object resource directly in `data`
//! - Direct object notification: `{"bucket": "...", "name": "...", ...}`
//!
//! The notification accepts the GCS field names (`name`, `contentType`,
//! `timeCreated`, `size` as a decimal string) and the `fileName`/`eventTime`
//! aliases used by upload webhooks.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bon::Builder;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// Notification that an object was created
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct Event {
    #[builder(into)]
    pub bucket: String,
    #[builder(into)]
    pub object_key: String,
    #[builder(default = OffsetDateTime::now_utc())]
    pub timestamp: OffsetDateTime,
    #[builder(into)]
    pub content_type: Option<String>,
    pub size: Option<u64>,
    #[builder(into)]
    pub event_id: Option<String>,
}

impl Event {
    /// Decode any supported trigger payload
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice::<TriggerPayload>(payload)? {
            TriggerPayload::Push(envelope) => Self::from_message(envelope.message, None),
            TriggerPayload::CloudEvent(cloud_event) => {
                let mut event = match cloud_event.data {
                    CloudEventData::Message(envelope) => {
                        Self::from_message(envelope.message, cloud_event.time)?
                    }
                    CloudEventData::Object(notification) => {
                        Self::from_notification(notification, cloud_event.time)?
                    }
                };
                if event.event_id.is_none() {
                    event.event_id = cloud_event.id;
                }
                Ok(event)
            }
            TriggerPayload::Notification(notification) => {
                Self::from_notification(notification, None)
            }
        }
    }

    fn from_message(
        message: PubSubMessage,
        fallback_time: Option<OffsetDateTime>,
    ) -> Result<Self, DecodeError> {
        let data = BASE64.decode(message.data.trim())?;
        let notification: ObjectNotification = serde_json::from_slice(&data)?;
        let mut event =
            Self::from_notification(notification, message.publish_time.or(fallback_time))?;
        if event.event_id.is_none() {
            event.event_id = message.message_id;
        }
        Ok(event)
    }

    fn from_notification(
        notification: ObjectNotification,
        fallback_time: Option<OffsetDateTime>,
    ) -> Result<Self, DecodeError> {
        let bucket = notification.bucket.trim();
        if bucket.is_empty() {
            return Err(DecodeError::MissingField("bucket"));
        }
        if notification.object_key.is_empty() {
            return Err(DecodeError::MissingField("name"));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            object_key: notification.object_key,
            timestamp: notification
                .timestamp
                .or(fallback_time)
                .unwrap_or_else(OffsetDateTime::now_utc),
            content_type: notification.content_type.filter(|ct| !ct.trim().is_empty()),
            size: notification.size,
            event_id: notification.event_id,
        })
    }

    /// File-type key: lowercased extension of the last path segment, else
    /// derived from the content type hint
    pub fn file_type_key(&self) -> Option<String> {
        let name = self
            .object_key
            .rsplit('/')
            .next()
            .unwrap_or(&self.object_key);

        // `.env` is a hidden file without an extension
        if let Some((stem, ext)) = name.rsplit_once('.')
            && !stem.is_empty()
            && !ext.is_empty()
        {
            return Some(ext.to_ascii_lowercase());
        }

        self.content_type.as_deref().and_then(file_type_from_mime)
    }
}

fn file_type_from_mime(content_type: &str) -> Option<String> {
    let mime: mime::Mime = content_type.trim().parse().ok()?;

    let key = if mime.type_() == mime::TEXT && mime.subtype() == mime::CSV {
        "csv"
    } else if mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON) {
        "json"
    } else if mime.type_() == mime::TEXT && mime.subtype() == mime::PLAIN {
        "txt"
    } else {
        return Some(mime.subtype().as_str().to_ascii_lowercase());
    };

    Some(key.to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriggerPayload {
    Push(PushEnvelope),
    CloudEvent(CloudEventEnvelope),
    Notification(ObjectNotification),
}

#[derive(Deserialize)]
struct PushEnvelope {
    message: PubSubMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubSubMessage {
    data: String,
    #[serde(default, alias = "message_id")]
    message_id: Option<String>,
    #[serde(default, alias = "publish_time", with = "time::serde::rfc3339::option")]
    publish_time: Option<OffsetDateTime>,
}

#[derive(Deserialize)]
struct CloudEventEnvelope {
    data: CloudEventData,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    time: Option<OffsetDateTime>,
}

/// Eventarc delivers either a wrapped Pub/Sub message or the object itself
#[derive(Deserialize)]
#[serde(untagged)]
enum CloudEventData {
    Message(PushEnvelope),
    Object(ObjectNotification),
}

#[derive(Deserialize)]
struct ObjectNotification {
    bucket: String,
    #[serde(alias = "name", alias = "fileName", alias = "key")]
    object_key: String,
    #[serde(default, alias = "contentType")]
    content_type: Option<String>,
    #[serde(default, deserialize_with = "size_from_number_or_string")]
    size: Option<u64>,
    #[serde(
        default,
        alias = "timeCreated",
        alias = "eventTime",
        with = "time::serde::rfc3339::option"
    )]
    timestamp: Option<OffsetDateTime>,
    #[serde(default, alias = "eventId", alias = "id")]
    event_id: Option<String>,
}

/// GCS object resources carry `size` as a decimal string
fn size_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    match Option::<Size>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Size::Number(size)) => Ok(Some(size)),
        Some(Size::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn encode(value: serde_json::Value) -> String {
        BASE64.encode(value.to_string())
    }

    #[test]
    fn test_decode_push_envelope() {
        let payload = json!({
            "message": {
                "data": encode(json!({
                    "bucket": "uploads",
                    "name": "incoming/report.csv",
                    "contentType": "text/csv",
                    "size": "1234",
                    "timeCreated": "2024-05-01T12:00:00Z",
                })),
                "messageId": "msg-1",
                "publishTime": "2024-05-01T12:00:01Z",
            },
            "subscription": "projects/p/subscriptions/s",
        });

        let event = Event::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.bucket, "uploads");
        assert_eq!(event.object_key, "incoming/report.csv");
        assert_eq!(event.content_type.as_deref(), Some("text/csv"));
        assert_eq!(event.size, Some(1234));
        assert_eq!(event.timestamp, datetime!(2024-05-01 12:00:00 UTC));
        assert_eq!(event.event_id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn test_decode_cloud_event() {
        let payload = json!({
            "id": "ce-7",
            "time": "2024-05-01T08:30:00Z",
            "data": {
                "message": {
                    "data": encode(json!({"bucket": "uploads", "fileName": "a.json"})),
                }
            }
        });

        let event = Event::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.object_key, "a.json");
        assert_eq!(event.timestamp, datetime!(2024-05-01 08:30:00 UTC));
        assert_eq!(event.event_id.as_deref(), Some("ce-7"));
    }

    #[test]
    fn test_decode_cloud_event_with_object_data() {
        let payload = json!({
            "id": "ce-8",
            "time": "2024-05-01T08:30:00Z",
            "data": {"bucket": "uploads", "name": "b.csv", "size": "10"},
        });

        let event = Event::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.object_key, "b.csv");
        assert_eq!(event.size, Some(10));
        assert_eq!(event.event_id.as_deref(), Some("ce-8"));
    }

    #[test]
    fn test_decode_direct_notification() {
        let payload = json!({
            "bucket": "uploads",
            "fileName": "data/export.TSV",
            "eventTime": "2024-05-01T00:00:00Z",
            "size": 42,
        });

        let event = Event::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.object_key, "data/export.TSV");
        assert_eq!(event.size, Some(42));
        assert_eq!(event.file_type_key().as_deref(), Some("tsv"));
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert!(matches!(Event::decode(b"not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            Event::decode(br#"{"bucket": "uploads"}"#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            Event::decode(br#"{"bucket": " ", "name": "a.csv"}"#),
            Err(DecodeError::MissingField("bucket"))
        ));
        assert!(matches!(
            Event::decode(br#"{"message": {"data": "%%%"}}"#),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_file_type_key_from_extension() {
        let key = |object_key: &str| {
            Event::builder()
                .bucket("b")
                .object_key(object_key)
                .build()
                .file_type_key()
        };

        assert_eq!(key("report.CSV").as_deref(), Some("csv"));
        assert_eq!(key("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(key("dir.v2/README"), None);
        assert_eq!(key(".env"), None);
        assert_eq!(key("trailing."), None);
    }

    #[test]
    fn test_file_type_key_from_content_type() {
        let key = |content_type: &str| {
            Event::builder()
                .bucket("b")
                .object_key("upload")
                .content_type(content_type)
                .build()
                .file_type_key()
        };

        assert_eq!(key("text/csv; charset=utf-8").as_deref(), Some("csv"));
        assert_eq!(key("application/json").as_deref(), Some("json"));
        assert_eq!(key("application/ld+json").as_deref(), Some("json"));
        assert_eq!(key("text/plain").as_deref(), Some("txt"));
        assert_eq!(key("application/PDF").as_deref(), Some("pdf"));
        assert_eq!(key("garbage"), None);
    }
}
