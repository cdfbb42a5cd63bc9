//! JSON-lines rendering for command output.

use serde_json::{Value, json};
use tootkit_common::stream::StreamError;
use tootkit_common::streaming::Event;
use tootkit_common::types::Resource;

/// One resource as a single JSON line.
pub fn resource_line(resource: &Resource) -> serde_json::Result<String> {
    serde_json::to_string(resource)
}

/// A stream event as a JSON value, tagged with its event name.
pub fn event_value(event: Event) -> Value {
    let name = event.name();
    match event {
        Event::Update(status) | Event::Edit(status) => json!({ "event": name, "status": status }),
        Event::Notification(notification) => {
            json!({ "event": name, "notification": notification })
        }
        Event::Delete(id) => json!({ "event": name, "id": id }),
        Event::Error(error) => json!({ "event": name, "error": error.to_string() }),
    }
}

/// Diagnostic line for an error event. A lost connection reads differently from a bad frame.
pub fn stream_error_line(error: &StreamError) -> String {
    if error.is_terminal() {
        format!("stream lost: {error}")
    } else {
        format!("skipped frame: {error}")
    }
}
