//! Notification fan-out.
//!
//! One [`NotificationEvent`] goes to each recipient over the channels its
//! kind maps to, filtered by the recipient's preferences.  Channels are
//! independent: a failing one is logged and the rest still run.  Nothing
//! here ever reports an error back to the operation that raised the event,
//! which has already committed by the time it calls in.

pub mod event;
pub mod transports;

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use tutorhub_store::{Database, NewNotification, NotificationPreference, StoreError};

pub use event::{broadcast_channel, Channel, NotificationEvent, Payload};
pub use transports::{
    BroadcastPublisher, ConsoleMailer, MailSender, PushSender, TracingBroadcaster, TracingPusher,
    TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    /// Turned off by the recipient's preferences.
    Skipped,
    Failed(String),
}

/// What happened on each channel for one recipient.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub kind: &'static str,
    pub recipient: Uuid,
    pub outcomes: Vec<(Channel, Outcome)>,
}

impl DeliveryReport {
    pub fn outcome(&self, channel: Channel) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, o)| o)
    }

    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == Outcome::Delivered)
            .count()
    }
}

#[derive(Clone)]
pub struct Notifier {
    db: Arc<Mutex<Database>>,
    mailer: Arc<dyn MailSender>,
    broadcaster: Arc<dyn BroadcastPublisher>,
    pusher: Arc<dyn PushSender>,
    base_url: String,
}

impl Notifier {
    pub fn new(
        db: Arc<Mutex<Database>>,
        mailer: Arc<dyn MailSender>,
        broadcaster: Arc<dyn BroadcastPublisher>,
        pusher: Arc<dyn PushSender>,
        base_url: String,
    ) -> Self {
        Self {
            db,
            mailer,
            broadcaster,
            pusher,
            base_url,
        }
    }

    /// Notifier wired to the logging transports.
    pub fn console(db: Arc<Mutex<Database>>, base_url: String) -> Self {
        Self::new(
            db,
            Arc::new(ConsoleMailer),
            Arc::new(TracingBroadcaster),
            Arc::new(TracingPusher),
            base_url,
        )
    }

    /// Fire and forget: delivery runs on its own task.  Outside a tokio
    /// runtime nothing can run it, so the event is logged and dropped.
    pub fn dispatch(&self, event: NotificationEvent, recipients: Vec<Uuid>) {
        if recipients.is_empty() {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    kind = event.kind(),
                    recipients = recipients.len(),
                    error = %e,
                    "no async runtime, notification dropped"
                );
                return;
            }
        };
        let notifier = self.clone();
        handle.spawn(async move {
            for report in notifier.notify(&event, &recipients).await {
                debug!(
                    kind = report.kind,
                    recipient = %report.recipient,
                    delivered = report.delivered(),
                    channels = report.outcomes.len(),
                    "notification fan-out finished"
                );
            }
        });
    }

    pub async fn notify(
        &self,
        event: &NotificationEvent,
        recipients: &[Uuid],
    ) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            reports.push(self.deliver(event, *recipient).await);
        }
        reports
    }

    /// Deliver one event to one recipient over every enabled channel.
    pub async fn deliver(&self, event: &NotificationEvent, recipient: Uuid) -> DeliveryReport {
        let payload = event.payload(&self.base_url);
        let prefs = match self.with_db(|db| db.get_preferences(recipient)) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(
                    kind = payload.kind,
                    recipient = %recipient,
                    error = %e,
                    "could not load notification preferences, using defaults"
                );
                NotificationPreference::default()
            }
        };

        let mut outcomes = Vec::new();
        for channel in event.channels() {
            let outcome = if !channel.enabled_by(&prefs) {
                Outcome::Skipped
            } else {
                match self.send(*channel, &payload, recipient).await {
                    Ok(()) => Outcome::Delivered,
                    Err(reason) => {
                        warn!(
                            kind = payload.kind,
                            channel = channel.as_str(),
                            recipient = %recipient,
                            error = %reason,
                            "notification delivery failed"
                        );
                        Outcome::Failed(reason)
                    }
                }
            };
            debug!(
                kind = payload.kind,
                channel = channel.as_str(),
                recipient = %recipient,
                outcome = ?outcome,
                "notification attempt"
            );
            outcomes.push((*channel, outcome));
        }

        DeliveryReport {
            kind: payload.kind,
            recipient,
            outcomes,
        }
    }

    async fn send(&self, channel: Channel, payload: &Payload, recipient: Uuid) -> Result<(), String> {
        match channel {
            Channel::Database => self
                .with_db(|db| {
                    db.insert_notification(NewNotification {
                        user_id: recipient,
                        kind: payload.kind.to_string(),
                        message: payload.message.clone(),
                        action_url: Some(payload.action_url.clone()),
                        action_label: Some(payload.action_label.to_string()),
                        data: payload.data.clone(),
                    })
                })
                .map(|_| ()),
            Channel::Mail => {
                let email = self.with_db(|db| db.get_user(recipient).map(|u| u.email))?;
                let body = format!(
                    "{}\n\n{}: {}",
                    payload.message, payload.action_label, payload.action_url
                );
                self.mailer
                    .send_mail(&email, &payload.subject, &body)
                    .await
                    .map_err(|e| e.to_string())
            }
            Channel::Broadcast => self
                .broadcaster
                .publish(&broadcast_channel(recipient), payload.kind, &payload.data)
                .await
                .map_err(|e| e.to_string()),
            Channel::Push => self
                .pusher
                .push(recipient, &payload.subject, &payload.message)
                .await
                .map_err(|e| e.to_string()),
        }
    }

    /// Short synchronous store access; the lock is never held across an
    /// `.await`.
    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T, StoreError>) -> Result<T, String> {
        let db = self
            .db
            .lock()
            .map_err(|_| "database lock poisoned".to_string())?;
        f(&*db).map_err(|e| e.to_string())
    }
}
