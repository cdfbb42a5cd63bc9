//! Decoding of streaming frames into events.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smol_str::SmolStr;

use crate::stream::StreamError;
use crate::types::{EntityId, Notification, Resource, Status};

/// One item delivered by a stream.
#[derive(Debug)]
pub enum Event {
    /// A new status
    Update(Status),
    /// An edited status
    Edit(Status),
    /// A new notification
    Notification(Notification),
    /// A status was deleted
    Delete(EntityId),
    /// A frame could not be turned into an event, or the connection failed
    Error(StreamError),
}

impl Event {
    /// Server-side event name, `error` for in-band errors.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Update(_) => "update",
            Event::Edit(_) => "status.update",
            Event::Notification(_) => "notification",
            Event::Delete(_) => "delete",
            Event::Error(_) => "error",
        }
    }

    /// Whether this is an in-band error.
    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error(_))
    }

    /// The resource carried by the event, if any.
    pub fn into_resource(self) -> Option<Resource> {
        match self {
            Event::Update(status) | Event::Edit(status) => Some(Resource::Status(status)),
            Event::Notification(n) => Some(Resource::Notification(n)),
            Event::Delete(_) | Event::Error(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    event: SmolStr,
    #[serde(default)]
    payload: Option<Value>,
}

/// Decode one text frame.
///
/// Frames are `{"event": NAME, "payload": PAYLOAD}` envelopes. For `update`,
/// `status.update` and `notification` the payload is a string holding a JSON document;
/// for `delete` it is the bare identifier.
pub fn decode_frame(text: &str) -> Result<Event, StreamError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(StreamError::decode)?;
    let payload = envelope.payload;
    match envelope.event.as_str() {
        "update" => decode_payload(&envelope.event, payload).map(Event::Update),
        "status.update" => decode_payload(&envelope.event, payload).map(Event::Edit),
        "notification" => decode_payload(&envelope.event, payload).map(Event::Notification),
        "delete" => match payload {
            Some(Value::String(id)) if !id.trim().is_empty() => {
                Ok(Event::Delete(EntityId::new(id)))
            }
            Some(Value::Number(n)) if n.is_u64() => {
                Ok(Event::Delete(EntityId::new(n.to_string())))
            }
            _ => Err(StreamError::protocol("delete event without an identifier")),
        },
        other => Err(StreamError::unknown_event(other)),
    }
}

fn decode_payload<T: DeserializeOwned>(
    event: &str,
    payload: Option<Value>,
) -> Result<T, StreamError> {
    match payload {
        Some(Value::String(doc)) => serde_json::from_str(&doc).map_err(StreamError::decode),
        Some(_) => Err(StreamError::protocol(format!(
            "payload of '{event}' is not a string"
        ))),
        None => Err(StreamError::protocol(format!("'{event}' event without payload"))),
    }
}
