use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Auth --

/// An identity claim, tagged by provider.
///
/// An unrecognized `type` value fails deserialization, so unknown providers
/// are rejected at the boundary instead of flowing into the handlers.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthRequest {
    Google {
        google_id: String,
        email: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
        #[serde(default)]
        phone: Option<String>,
    },
    Telegram {
        telegram_id: String,
        username: String,
        #[serde(default)]
        first_name: Option<String>,
        #[serde(default)]
        photo_url: Option<String>,
        #[serde(default)]
        phone: Option<String>,
    },
    Phone {
        phone: String,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub phone: String,
    pub name: String,
    pub bio: String,
    pub avatar: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    /// The string form of the user id. Not signed and never expires —
    /// callers present it back verbatim in the X-User-Id header.
    pub token: String,
}

// -- Chats --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
    pub is_online: bool,
    pub last_message: String,
    /// Wall-clock "HH:MM" of the last message, "" when the chat is empty.
    pub timestamp: String,
    pub unread: i64,
    /// Placeholder: typing indicators are not implemented.
    pub is_typing: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatsResponse {
    pub chats: Vec<ChatSummary>,
}

/// A chat mutation, tagged by action. Unknown actions are rejected
/// at deserialization like unknown auth providers.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ChatAction {
    Create {
        phone: String,
    },
    Block {
        #[serde(rename = "chatId")]
        chat_id: Uuid,
    },
}

#[derive(Debug, Serialize)]
pub struct ContactProfile {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
    pub chat_id: Uuid,
    pub contact: ContactProfile,
}

#[derive(Debug, Serialize)]
pub struct BlockResponse {
    pub success: bool,
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Read,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub text: String,
    /// Wall-clock "HH:MM" of the message.
    pub timestamp: String,
    pub is_sent: bool,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub chat_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub attachment_type: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub attachment_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: MessageView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_rejects_unknown_provider() {
        let err = serde_json::from_str::<AuthRequest>(r#"{"type":"carrier-pigeon"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn auth_request_parses_all_providers() {
        let google: AuthRequest = serde_json::from_str(
            r#"{"type":"google","google_id":"g-1","email":"a@example.com","name":"A","avatar":"http://a/p.png"}"#,
        )
        .unwrap();
        assert!(matches!(google, AuthRequest::Google { .. }));

        let telegram: AuthRequest = serde_json::from_str(
            r#"{"type":"telegram","telegram_id":"42","username":"ann"}"#,
        )
        .unwrap();
        assert!(matches!(telegram, AuthRequest::Telegram { .. }));

        let phone: AuthRequest =
            serde_json::from_str(r#"{"type":"phone","phone":"+1","name":"A"}"#).unwrap();
        assert!(matches!(phone, AuthRequest::Phone { .. }));
    }

    #[test]
    fn chat_action_uses_camel_case_chat_id() {
        let action: ChatAction = serde_json::from_str(
            r#"{"action":"block","chatId":"00000000-0000-0000-0000-000000000001"}"#,
        )
        .unwrap();
        assert!(matches!(action, ChatAction::Block { .. }));
    }

    #[test]
    fn attachment_absent_when_none() {
        let view = MessageView {
            id: Uuid::nil(),
            text: "hi".into(),
            timestamp: "12:00".into(),
            is_sent: true,
            status: MessageStatus::Sent,
            attachment: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("attachment").is_none());
        assert_eq!(json["isSent"], true);
        assert_eq!(json["status"], "sent");
    }
}
