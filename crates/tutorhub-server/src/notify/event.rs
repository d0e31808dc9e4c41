//! Notification events, their channel table and their rendered payloads.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use tutorhub_shared::OfferingStatus;
use tutorhub_store::NotificationPreference;

/// Everything the marketplace tells its users about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    OfferingAccepted {
        offering_id: Uuid,
        offering_title: String,
        tutor_id: Uuid,
        tutor_name: String,
        amount: Decimal,
    },
    TutorVerified {
        profile_id: Uuid,
    },
    TutorRejected {
        profile_id: Uuid,
        note: Option<String>,
    },
    NewMessage {
        offering_id: Uuid,
        offering_title: String,
        message_id: Uuid,
        sender_id: Uuid,
        preview: String,
    },
    AttachmentUploaded {
        offering_id: Uuid,
        offering_title: String,
        file_name: String,
    },
    DashboardUpdate {
        offering_id: Uuid,
        offering_title: String,
        status: OfferingStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Persisted inbox record.
    Database,
    Mail,
    /// Real-time publish on `user.{id}`.
    Broadcast,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Database => "database",
            Channel::Mail => "mail",
            Channel::Broadcast => "broadcast",
            Channel::Push => "push",
        }
    }

    /// `in_app` covers both the inbox and the live feed.
    pub fn enabled_by(&self, prefs: &NotificationPreference) -> bool {
        match self {
            Channel::Database | Channel::Broadcast => prefs.in_app,
            Channel::Mail => prefs.email,
            Channel::Push => prefs.push,
        }
    }
}

/// Rendered, channel-independent content of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub kind: &'static str,
    pub subject: String,
    pub message: String,
    pub action_url: String,
    pub action_label: &'static str,
    pub data: serde_json::Value,
}

const PREVIEW_CHARS: usize = 100;

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::OfferingAccepted { .. } => "offering_accepted",
            NotificationEvent::TutorVerified { .. } => "tutor_verified",
            NotificationEvent::TutorRejected { .. } => "tutor_rejected",
            NotificationEvent::NewMessage { .. } => "new_message",
            NotificationEvent::AttachmentUploaded { .. } => "attachment_uploaded",
            NotificationEvent::DashboardUpdate { .. } => "dashboard_update",
        }
    }

    /// The dispatch table.
    pub fn channels(&self) -> &'static [Channel] {
        use Channel::*;
        match self {
            NotificationEvent::OfferingAccepted { .. } => &[Database, Mail],
            NotificationEvent::TutorVerified { .. } | NotificationEvent::TutorRejected { .. } => {
                &[Database, Mail]
            }
            NotificationEvent::NewMessage { .. } => &[Database, Broadcast, Mail],
            NotificationEvent::AttachmentUploaded { .. } => &[Database, Mail],
            NotificationEvent::DashboardUpdate { .. } => &[Database, Broadcast, Push],
        }
    }

    /// Build the user-facing content.  Links are absolute, rooted at
    /// `base_url`.
    pub fn payload(&self, base_url: &str) -> Payload {
        let base = base_url.trim_end_matches('/');
        let (subject, message, path, action_label) = match self {
            NotificationEvent::OfferingAccepted {
                offering_id,
                offering_title,
                tutor_name,
                ..
            } => (
                "Your offering was accepted".to_string(),
                format!("{tutor_name} accepted \"{offering_title}\""),
                format!("/offerings/{offering_id}"),
                "View offering",
            ),
            NotificationEvent::TutorVerified { .. } => (
                "Your tutor profile is verified".to_string(),
                "Your tutor profile has been verified. You can now accept offerings.".to_string(),
                "/tutor/profile".to_string(),
                "View profile",
            ),
            NotificationEvent::TutorRejected { note, .. } => (
                "Your tutor verification was rejected".to_string(),
                match note {
                    Some(note) => format!("Your tutor verification was rejected: {note}"),
                    None => "Your tutor verification was rejected.".to_string(),
                },
                "/tutor/profile".to_string(),
                "Review documents",
            ),
            NotificationEvent::NewMessage {
                offering_id,
                offering_title,
                preview,
                ..
            } => (
                format!("New message on \"{offering_title}\""),
                truncate(preview, PREVIEW_CHARS),
                format!("/offerings/{offering_id}/messages"),
                "Reply",
            ),
            NotificationEvent::AttachmentUploaded {
                offering_id,
                offering_title,
                file_name,
            } => (
                format!("New file on \"{offering_title}\""),
                format!("{file_name} was added to \"{offering_title}\""),
                format!("/offerings/{offering_id}"),
                "View files",
            ),
            NotificationEvent::DashboardUpdate {
                offering_title,
                status,
                ..
            } => (
                format!("\"{offering_title}\" was updated"),
                format!("\"{offering_title}\" is now {status}"),
                "/dashboard".to_string(),
                "Open dashboard",
            ),
        };

        Payload {
            kind: self.kind(),
            subject,
            message,
            action_url: format!("{base}{path}"),
            action_label,
            data: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Name of a user's private real-time channel.
pub fn broadcast_channel(user_id: Uuid) -> String {
    format!("user.{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_events_reach_the_live_feed() {
        let event = NotificationEvent::NewMessage {
            offering_id: Uuid::nil(),
            offering_title: "Calculus".into(),
            message_id: Uuid::nil(),
            sender_id: Uuid::nil(),
            preview: "hi".into(),
        };
        assert_eq!(
            event.channels(),
            &[Channel::Database, Channel::Broadcast, Channel::Mail]
        );
    }

    #[test]
    fn preferences_gate_channels() {
        let prefs = NotificationPreference {
            email: false,
            push: true,
            in_app: false,
        };
        assert!(!Channel::Database.enabled_by(&prefs));
        assert!(!Channel::Broadcast.enabled_by(&prefs));
        assert!(!Channel::Mail.enabled_by(&prefs));
        assert!(Channel::Push.enabled_by(&prefs));
    }

    #[test]
    fn payload_links_are_absolute() {
        let id = Uuid::new_v4();
        let event = NotificationEvent::AttachmentUploaded {
            offering_id: id,
            offering_title: "Lab report".into(),
            file_name: "data.csv".into(),
        };
        let payload = event.payload("https://tutorhub.test/");
        assert_eq!(payload.kind, "attachment_uploaded");
        assert_eq!(payload.action_url, format!("https://tutorhub.test/offerings/{id}"));
        assert_eq!(payload.data["type"], "attachment_uploaded");
        assert_eq!(payload.data["file_name"], "data.csv");
    }

    #[test]
    fn long_previews_are_cut() {
        let event = NotificationEvent::NewMessage {
            offering_id: Uuid::nil(),
            offering_title: "Essay".into(),
            message_id: Uuid::nil(),
            sender_id: Uuid::nil(),
            preview: "é".repeat(150),
        };
        let payload = event.payload("http://localhost:8080");
        assert_eq!(payload.message.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn broadcast_channel_name() {
        assert_eq!(
            broadcast_channel(Uuid::nil()),
            "user.00000000-0000-0000-0000-000000000000"
        );
    }
}
