use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, ActorId, Role};
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Notifications go either to one actor or to everyone holding a role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Recipient {
    Actor(ActorId),
    Role(Role),
}

impl Recipient {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Actor(_) => "actor",
            Self::Role(_) => "role",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Actor(id) => &id.0,
            Self::Role(role) => role.as_str(),
        }
    }

    pub fn parse(kind: &str, value: &str) -> Option<Self> {
        match kind {
            "actor" => Some(Self::Actor(ActorId(value.to_string()))),
            "role" => Role::parse(value).map(Self::Role),
            _ => None,
        }
    }

    pub fn includes(&self, actor: &Actor) -> bool {
        match self {
            Self::Actor(id) => id == &actor.id,
            Self::Role(role) => actor.holds(*role),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: Recipient,
    pub message: String,
    pub related_request_id: Option<RequestId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: Recipient,
        message: impl Into<String>,
        related_request_id: Option<RequestId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::generate(),
            recipient,
            message: message.into(),
            related_request_id,
            is_read: false,
            created_at,
        }
    }

    /// One-way flag; marking an already-read notification changes nothing.
    pub fn mark_read(&mut self) {
        self.is_read = true;
    }
}
