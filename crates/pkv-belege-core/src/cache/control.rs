//! Control messages accepted by the cache worker.
//!
//! On the wire a message is a JSON object with a `type` field:
//! `{"type": "SKIP_WAITING"}`, `{"type": "GET_VERSION"}`,
//! `{"type": "CLEAR_CACHE"}`. Anything else is ignored.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    /// Promote the waiting generation without waiting for clients to leave.
    SkipWaiting,
    /// Report the worker's version token and cache name.
    GetVersion,
    /// Delete the worker's current cache generation.
    ClearCache,
}

impl ControlRequest {
    /// Decode a wire message. Unrecognized messages yield `None`.
    pub fn from_wire(message: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value(message.clone()) {
            Ok(request) => Some(request),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized control message");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(rename = "cacheVersion")]
    pub cache_name: String,
    #[serde(rename = "appName")]
    pub app_name: String,
}

/// Replies sent back through a message's reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    VersionInfo(VersionInfo),
    CacheCleared { success: bool },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_known_messages() {
        assert_eq!(
            ControlRequest::from_wire(&json!({"type": "SKIP_WAITING"})),
            Some(ControlRequest::SkipWaiting)
        );
        assert_eq!(
            ControlRequest::from_wire(&json!({"type": "GET_VERSION"})),
            Some(ControlRequest::GetVersion)
        );
        assert_eq!(
            ControlRequest::from_wire(&json!({"type": "CLEAR_CACHE"})),
            Some(ControlRequest::ClearCache)
        );
    }

    #[test]
    fn test_unknown_messages_are_ignored() {
        assert_eq!(ControlRequest::from_wire(&json!({"type": "SYNC_NOW"})), None);
        assert_eq!(ControlRequest::from_wire(&json!("SKIP_WAITING")), None);
        assert_eq!(ControlRequest::from_wire(&json!(null)), None);
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = ControlReply::VersionInfo(VersionInfo {
            version: "1.15".to_string(),
            cache_name: "pkv-belege-v1.15".to_string(),
            app_name: "PKV Belege".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({
                "type": "VERSION_INFO",
                "version": "1.15",
                "cacheVersion": "pkv-belege-v1.15",
                "appName": "PKV Belege"
            })
        );
        assert_eq!(
            serde_json::to_value(ControlReply::CacheCleared { success: true }).unwrap(),
            json!({"type": "CACHE_CLEARED", "success": true})
        );
    }
}
