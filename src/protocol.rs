use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "bad_request")]
    BadRequest,
    #[serde(rename = "auth_failed")]
    AuthFailed,
    #[serde(rename = "not_found")]
    NotFound,
    #[serde(rename = "access_denied")]
    AccessDenied,
    #[serde(rename = "unprocessable_content")]
    Unprocessable,
    #[serde(rename = "persistence_failed")]
    PersistenceFailed,
    #[serde(rename = "assistant_failed")]
    AssistantFailed,
    #[serde(rename = "internal_error")]
    Internal,
}

// Realtime store streaming protocol.
//
// A streaming read is a `text/event-stream` response. Each event carries
// a JSON body `{"path": "/a/b", "data": ...}` that either replaces (`put`)
// or merges into (`patch`) the node at `path`, relative to the subscribed
// location.

/// Single dispatched event of a `text/event-stream` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSentEvent {
    pub event: String,
    pub data: String,
}

/// Incremental parser, chunks may split lines at any byte
#[derive(Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerSentEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                // comment
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => {
                    (field, value.strip_prefix(' ').unwrap_or(value))
                }
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        events
    }

    fn dispatch(&mut self) -> Option<ServerSentEvent> {
        let event = self.event.take();
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(ServerSentEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    Cancel(String),
    AuthRevoked,
}

impl StoreEvent {
    /// Returns `Ok(None)` for event kinds the client does not handle
    pub fn parse(
        event: &ServerSentEvent,
    ) -> Result<Option<StoreEvent>, serde_json::Error> {
        let parsed = match event.event.as_str() {
            "put" => {
                let PathData { path, data } = serde_json::from_str(&event.data)?;
                StoreEvent::Put { path, data }
            }
            "patch" => {
                let PathData { path, data } = serde_json::from_str(&event.data)?;
                StoreEvent::Patch { path, data }
            }
            "keep-alive" => StoreEvent::KeepAlive,
            "cancel" => StoreEvent::Cancel(event.data.clone()),
            "auth_revoked" => StoreEvent::AuthRevoked,
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    /// Applies a `put` or `patch` to the cached tree, returns whether it
    /// changed anything observable
    pub fn apply(self, root: &mut Value) -> bool {
        match self {
            StoreEvent::Put { path, data } => {
                put_at(root, &segments(&path), data);
                true
            }
            StoreEvent::Patch { path, data } => {
                let base = segments(&path);
                match data {
                    Value::Object(fields) => {
                        for (key, value) in fields {
                            let mut path = base.clone();
                            path.push(key.as_str());
                            put_at(root, &path, value);
                        }
                    }
                    other => put_at(root, &base, other),
                }
                true
            }
            _ => false,
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn put_at(node: &mut Value, path: &[&str], data: Value) {
    let Some((first, rest)) = path.split_first() else {
        *node = data;
        return;
    };
    let mut map = match node.take() {
        Value::Object(map) => map,
        // the store addresses array items by index, keep them as keys
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (i.to_string(), item))
            .collect(),
        _ => Map::new(),
    };
    if rest.is_empty() && data.is_null() {
        map.remove(*first);
    } else {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        put_at(child, rest, data);
    }
    *node = Value::Object(map);
}
