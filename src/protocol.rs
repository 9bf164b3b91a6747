use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::MediaKind;

pub const STATUS_BROADCAST: &str = "status@broadcast";
pub const GROUP_SUFFIX: &str = "@g.us";
pub const USER_SUFFIX: &str = "@s.whatsapp.net";

pub fn is_group_id(id: &str) -> bool {
    id.ends_with(GROUP_SUFFIX)
}

/// The user-visible handle of an id: everything before the `@`.
pub fn display_name(id: &str) -> &str {
    id.split('@').next().unwrap_or(id)
}

// Inbound message payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Video {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Audio,
    Document {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Other,
}

impl MessageContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            MessageContent::Image { caption }
            | MessageContent::Video { caption }
            | MessageContent::Document { caption } => caption.as_deref(),
            MessageContent::Audio | MessageContent::Other => None,
        }
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            MessageContent::Image { .. } => Some(MediaKind::Image),
            MessageContent::Video { .. } => Some(MediaKind::Video),
            MessageContent::Audio => Some(MediaKind::Audio),
            MessageContent::Document { .. } => Some(MediaKind::Document),
            MessageContent::Text { .. } | MessageContent::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub chat: String,
    pub sender: String,
    #[serde(default)]
    pub from_me: bool,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<QuotedMessage>,
    #[serde(default)]
    pub mentions: Vec<String>,
}

/// Where an inbound message came from, decided once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    StatusPost,
    Group,
    Direct,
}

impl InboundMessage {
    pub fn origin(&self) -> Origin {
        if self.chat == STATUS_BROADCAST {
            Origin::StatusPost
        } else if is_group_id(&self.chat) {
            Origin::Group
        } else {
            Origin::Direct
        }
    }

    pub fn text(&self) -> &str {
        self.content.text().unwrap_or("")
    }

    pub fn quoted_text(&self) -> Option<&str> {
        self.quoted
            .as_ref()
            .and_then(|q| q.text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Open,
    Connecting,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    LoggedOut,
    Replaced,
    Other,
}

// Bridge -> core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Message(InboundMessage),
    ParticipantsUpdate {
        group: String,
        action: ParticipantAction,
        participants: Vec<String>,
    },
    ConnectionUpdate {
        state: ConnectionState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<DisconnectReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
    Result {
        request_id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSetting {
    Announcement,
    NotAnnouncement,
}

// Core -> bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    SendText {
        to: String,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quoted_id: Option<String>,
    },
    DeleteMessage {
        chat: String,
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant: Option<String>,
    },
    GroupMetadata {
        group: String,
    },
    UpdateParticipants {
        group: String,
        action: ParticipantAction,
        participants: Vec<String>,
    },
    InviteCode {
        group: String,
    },
    RevokeInvite {
        group: String,
    },
    GroupSetting {
        group: String,
        setting: GroupSetting,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: String,
    #[serde(flatten)]
    pub request: BridgeRequest,
}

// Reply payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    /// `"admin"` or `"superadmin"` for administrators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
}

impl Participant {
    pub fn is_admin(&self) -> bool {
        self.admin.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    /// Creation time in seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<i64>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl GroupMetadata {
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn is_admin(&self, id: &str) -> bool {
        self.participant(id).map_or(false, Participant::is_admin)
    }

    pub fn admin_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_admin()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub id: String,
    pub status: String,
}
