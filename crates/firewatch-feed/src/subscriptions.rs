use serde_json::json;

/// Build a subscribe message for the incidents change channel
pub fn subscribe_incidents() -> serde_json::Value {
    json!({
        "method": "subscribe",
        "params": {
            "channel": "incidents"
        }
    })
}

/// Build an unsubscribe message, sent during teardown
pub fn unsubscribe_incidents() -> serde_json::Value {
    json!({
        "method": "unsubscribe",
        "params": {
            "channel": "incidents"
        }
    })
}

/// Build a ping message
pub fn ping() -> serde_json::Value {
    json!({
        "method": "ping"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_message_shape() {
        let msg = subscribe_incidents();
        assert_eq!(msg["method"], "subscribe");
        assert_eq!(msg["params"]["channel"], "incidents");
    }

    #[test]
    fn test_unsubscribe_message_shape() {
        let msg = unsubscribe_incidents();
        assert_eq!(msg["method"], "unsubscribe");
        assert_eq!(msg["params"]["channel"], "incidents");
    }
}
