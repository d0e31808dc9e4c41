//! Delivery transports behind the mail, broadcast and push channels.
//!
//! The binary wires the console implementations, which only log; a real
//! mailer or socket publisher plugs in behind the same traits.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("recipient rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}

#[async_trait]
pub trait BroadcastPublisher: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), TransportError>;
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn push(&self, user_id: Uuid, title: &str, body: &str) -> Result<(), TransportError>;
}

/// Logs mail instead of sending it.
#[derive(Clone, Debug, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl MailSender for ConsoleMailer {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        if to.trim().is_empty() {
            return Err(TransportError::Rejected("empty recipient address".into()));
        }
        info!(to = %to, subject = %subject, body = %body, "mail (console transport)");
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct TracingBroadcaster;

#[async_trait]
impl BroadcastPublisher for TracingBroadcaster {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), TransportError> {
        info!(channel = %channel, event = %event, payload = %payload, "broadcast");
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct TracingPusher;

#[async_trait]
impl PushSender for TracingPusher {
    async fn push(&self, user_id: Uuid, title: &str, body: &str) -> Result<(), TransportError> {
        info!(user = %user_id, title = %title, body = %body, "push notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_mailer_refuses_blank_address() {
        let mailer = ConsoleMailer;
        assert!(mailer.send_mail("a@b.test", "s", "b").await.is_ok());
        assert!(matches!(
            mailer.send_mail(" ", "s", "b").await,
            Err(TransportError::Rejected(_))
        ));
    }
}
