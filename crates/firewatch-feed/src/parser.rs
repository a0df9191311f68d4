use firewatch_core::{ChangeEvent, Incident};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Acknowledgement / command response from the feed endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedAck {
    pub method: String,
    pub success: Option<bool>,
    pub req_id: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row-level change notification. Insert/update carry a full row image in
/// `record`; delete carries the old row (only `id` is relied upon).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeMessage {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub record: Option<Incident>,
    pub old_record: Option<DeletedRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub id: String,
}

impl ChangeMessage {
    pub fn into_change_event(self) -> anyhow::Result<ChangeEvent> {
        match self.kind {
            ChangeKind::Insert => self
                .record
                .map(ChangeEvent::Insert)
                .ok_or_else(|| anyhow::anyhow!("insert notification missing record")),
            ChangeKind::Update => self
                .record
                .map(ChangeEvent::Update)
                .ok_or_else(|| anyhow::anyhow!("update notification missing record")),
            ChangeKind::Delete => self
                .old_record
                .map(|old| ChangeEvent::Delete { id: old.id })
                .ok_or_else(|| anyhow::anyhow!("delete notification missing old_record")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub data: StatusData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub system: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub enum FeedFrame {
    Ack(FeedAck),
    Change(ChangeMessage),
    Status(StatusMessage),
    Heartbeat,
    Ping,
}

/// Parse a raw websocket frame into a normalized feed frame
pub fn parse_frame(frame: &str) -> anyhow::Result<FeedFrame> {
    let json: Value = serde_json::from_str(frame)?;

    // Command responses carry method/success instead of a channel
    if json.get("method").is_some() || json.get("success").is_some() {
        let ack: FeedAck = serde_json::from_value(json)?;
        return Ok(FeedFrame::Ack(ack));
    }

    if let Some(channel) = json.get("channel").and_then(|c| c.as_str()) {
        match channel {
            "incidents" => {
                let msg: ChangeMessage = serde_json::from_value(json)?;
                Ok(FeedFrame::Change(msg))
            }
            "status" => {
                let msg: StatusMessage = serde_json::from_value(json)?;
                Ok(FeedFrame::Status(msg))
            }
            "heartbeat" => Ok(FeedFrame::Heartbeat),
            "ping" => Ok(FeedFrame::Ping),
            _ => Err(anyhow::anyhow!("Unknown channel: {}", channel)),
        }
    } else {
        Err(anyhow::anyhow!("Frame missing 'channel' field"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firewatch_core::IncidentStatus;

    #[test]
    fn test_parse_insert_frame() {
        let frame = r#"{
            "channel": "incidents",
            "type": "insert",
            "record": {
                "id": "inc-1",
                "latitude": -33.45,
                "longitude": -70.65,
                "description": "Large fire near forest area spotted",
                "risk_level": "high",
                "status": "pending",
                "created_at": "2025-06-01T12:00:00Z",
                "updated_at": "2025-06-01T12:00:00Z"
            }
        }"#;

        let parsed = parse_frame(frame).unwrap();
        let FeedFrame::Change(msg) = parsed else {
            panic!("expected change frame");
        };
        assert_eq!(msg.kind, ChangeKind::Insert);
        match msg.into_change_event().unwrap() {
            ChangeEvent::Insert(rec) => {
                assert_eq!(rec.id, "inc-1");
                assert_eq!(rec.status, IncidentStatus::Pending);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_delete_frame() {
        let frame = r#"{
            "channel": "incidents",
            "type": "delete",
            "old_record": { "id": "inc-9" }
        }"#;

        let parsed = parse_frame(frame).unwrap();
        let FeedFrame::Change(msg) = parsed else {
            panic!("expected change frame");
        };
        match msg.into_change_event().unwrap() {
            ChangeEvent::Delete { id } => assert_eq!(id, "inc-9"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_ack_and_heartbeat() {
        let ack = parse_frame(r#"{"method":"subscribe","success":true}"#).unwrap();
        assert!(matches!(ack, FeedFrame::Ack(a) if a.success == Some(true)));

        let hb = parse_frame(r#"{"channel":"heartbeat"}"#).unwrap();
        assert!(matches!(hb, FeedFrame::Heartbeat));
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(parse_frame("not json").is_err());
        assert!(parse_frame(r#"{"channel":"unknown"}"#).is_err());
        // Insert without a row image is a protocol violation
        let msg = ChangeMessage {
            kind: ChangeKind::Insert,
            record: None,
            old_record: None,
        };
        assert!(msg.into_change_event().is_err());
    }
}
