use serde::{Deserialize, Serialize};

use crate::models::{Chat, Message};

/// First frame required on every socket connection. Until it is received
/// and validated the connection holds no pool entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Handshake {
    pub user_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
}

/// Actions accepted on a message-session connection, dispatched on the
/// `action` field. Anything outside this closed set is answered with a
/// diagnostic NOK instead of being dropped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MessageAction {
    GetMessages {
        chat_id: i64,
        user_id: i64,
        #[serde(rename = "vKey")]
        v_key: String,
    },
    SendMessage {
        chat_id: i64,
        message: String,
        /// Client-supplied timestamp; the server substitutes its own
        /// clock when absent.
        timestamp: Option<String>,
        author_id: i64,
        #[serde(rename = "vKey")]
        v_key: String,
    },
    EditMessage {
        chat_id: i64,
        message_id: i64,
        message: String,
        author_id: i64,
        #[serde(rename = "vKey")]
        v_key: String,
    },
    DeleteMessage {
        chat_id: i64,
        message_id: i64,
        user_id: i64,
        #[serde(rename = "vKey")]
        v_key: String,
    },
}

/// Actions accepted on a chat-list-session connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChatListAction {
    GetChats {
        user_id: i64,
        #[serde(rename = "vKey")]
        v_key: String,
    },
    DeleteChat {
        chat_id: i64,
        user_id: i64,
        #[serde(rename = "vKey")]
        v_key: String,
    },
}

/// Positive / negative acknowledgment status carried in system frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Ack {
    Ok,
    Nok,
}

/// Frames sent FROM server TO client over either socket channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Handshake acknowledgments, action acknowledgments and change
    /// notices.
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<Ack>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Full resend of one chat's message list.
    Messages { messages: Vec<Message> },

    /// Full resend of one user's chat list.
    Chats { chats: Vec<Chat> },
}

impl ServerFrame {
    pub fn authorized() -> Self {
        Self::System {
            status: None,
            message: Some("Authorized".into()),
        }
    }

    pub fn unauthorized() -> Self {
        Self::System {
            status: None,
            message: Some("Unauthorized".into()),
        }
    }

    pub fn ok() -> Self {
        Self::System {
            status: Some(Ack::Ok),
            message: None,
        }
    }

    pub fn nok(reason: &str) -> Self {
        Self::System {
            status: Some(Ack::Nok),
            message: Some(reason.into()),
        }
    }

    /// Notice pushed after a refreshed chat list so open chat-list views
    /// know the list changed.
    pub fn chats_updated() -> Self {
        Self::System {
            status: None,
            message: Some("Chats updated".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_action_dispatches_on_action_field() {
        let frame = serde_json::json!({
            "action": "send_message",
            "chat_id": 5,
            "message": "hello",
            "timestamp": "2024-11-02 10:00:00",
            "author_id": 9,
            "vKey": "abc",
        });

        let action: MessageAction = serde_json::from_value(frame).unwrap();
        match action {
            MessageAction::SendMessage {
                chat_id, author_id, ..
            } => {
                assert_eq!(chat_id, 5);
                assert_eq!(author_id, 9);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let frame = serde_json::json!({ "action": "make_coffee", "chat_id": 1 });
        assert!(serde_json::from_value::<MessageAction>(frame).is_err());
    }

    #[test]
    fn system_frames_match_wire_shape() {
        let json = serde_json::to_value(ServerFrame::authorized()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "system", "message": "Authorized" })
        );

        let json = serde_json::to_value(ServerFrame::nok("Server error")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "system", "status": "NOK", "message": "Server error" })
        );

        let json = serde_json::to_value(ServerFrame::ok()).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "system", "status": "OK" }));
    }

    #[test]
    fn messages_frame_wire_shape() {
        let frame = ServerFrame::Messages {
            messages: vec![Message {
                message_id: 1,
                chat_id: 2,
                user_from: 3,
                message: "hi".into(),
                date: "2024-11-02 10:00:00".into(),
            }],
        };
        let json = serde_json::to_value(frame).unwrap();
        assert_eq!(json["type"], "messages");
        assert_eq!(json["messages"][0]["user_from"], 3);
        assert_eq!(json["messages"][0]["date"], "2024-11-02 10:00:00");
    }
}
