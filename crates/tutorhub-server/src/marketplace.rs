//! The marketplace service: every operation the HTTP layer exposes.
//!
//! Each method runs its store mutation (one transaction), then performs the
//! after-commit work: removing stored files, flushing the offering page
//! cache and dispatching notifications.  The database lock is only held for
//! the synchronous store call.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use tutorhub_shared::constants::{NOTIFICATION_PAGE_SIZE, OFFERING_PAGE_SIZE};
use tutorhub_shared::{Actor, DomainError, EarningStatus, Role};
use tutorhub_store::validation::validate_message_content;
use tutorhub_store::{
    page_number, policy, Database, Earning, EarningsSummary, Message, NewOffering, NewUser,
    Notification, NotificationPreference, Offering, OfferingFilters, OfferingPatch, Page,
    StoreError, TutorProfile, User,
};

use crate::blob_store::BlobStore;
use crate::error::ServerError;
use crate::notify::{NotificationEvent, Notifier};
use crate::page_cache::OfferingPageCache;

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct Marketplace {
    db: Arc<Mutex<Database>>,
    cache: OfferingPageCache,
    blobs: Arc<BlobStore>,
    notifier: Notifier,
    fee_rate: Decimal,
}

impl Marketplace {
    pub fn new(
        db: Arc<Mutex<Database>>,
        cache: OfferingPageCache,
        blobs: Arc<BlobStore>,
        notifier: Notifier,
        fee_rate: Decimal,
    ) -> Self {
        Self {
            db,
            cache,
            blobs,
            notifier,
            fee_rate,
        }
    }

    pub fn cache(&self) -> &OfferingPageCache {
        &self.cache
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Database) -> Result<T, StoreError>,
    ) -> Result<T, ServerError> {
        let mut db = self
            .db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
        Ok(f(&mut *db)?)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn register_user(&self, input: NewUser) -> Result<(User, Option<TutorProfile>), ServerError> {
        self.with_db(|db| db.create_user(input))
    }

    pub fn get_user(&self, id: Uuid) -> Result<User, ServerError> {
        self.with_db(|db| db.get_user(id))
    }

    pub fn resolve_actor(&self, user_id: Uuid) -> Result<Actor, ServerError> {
        self.with_db(|db| db.resolve_actor(user_id))
    }

    pub fn verify_tutor(
        &self,
        admin: &Actor,
        profile_id: Uuid,
        approve: bool,
        note: Option<String>,
    ) -> Result<TutorProfile, ServerError> {
        let profile = self.with_db(|db| db.set_tutor_verification(admin, profile_id, approve, note))?;

        let event = if approve {
            NotificationEvent::TutorVerified { profile_id }
        } else {
            NotificationEvent::TutorRejected {
                profile_id,
                note: profile.verification_note.clone(),
            }
        };
        self.notifier.dispatch(event, vec![profile.user_id]);
        Ok(profile)
    }

    // ------------------------------------------------------------------
    // Offerings
    // ------------------------------------------------------------------

    pub async fn list_offerings(
        &self,
        filters: &OfferingFilters,
        page: u32,
    ) -> Result<Page<Offering>, ServerError> {
        let page = page_number(page);
        self.cache
            .get_page(filters, page, || {
                self.with_db(|db| db.list_offerings(filters, page, OFFERING_PAGE_SIZE))
            })
            .await
    }

    pub fn get_offering(&self, id: Uuid) -> Result<Offering, ServerError> {
        self.with_db(|db| db.get_offering(id))
    }

    pub async fn create_offering(
        &self,
        actor: &Actor,
        input: NewOffering,
    ) -> Result<Offering, ServerError> {
        let offering = self.with_db(|db| db.create_offering(actor, input))?;
        self.cache.invalidate_all().await;
        Ok(offering)
    }

    pub async fn update_offering(
        &self,
        actor: &Actor,
        id: Uuid,
        patch: OfferingPatch,
    ) -> Result<Offering, ServerError> {
        let offering = self.with_db(|db| db.update_offering(actor, id, patch))?;
        self.cache.invalidate_all().await;
        Ok(offering)
    }

    pub async fn publish_offering(&self, actor: &Actor, id: Uuid) -> Result<Offering, ServerError> {
        let offering = self.with_db(|db| db.publish_offering(actor, id))?;
        self.cache.invalidate_all().await;
        Ok(offering)
    }

    pub async fn complete_offering(&self, actor: &Actor, id: Uuid) -> Result<Offering, ServerError> {
        let offering = self.with_db(|db| db.complete_offering(actor, id))?;
        self.cache.invalidate_all().await;
        self.notify_status(&offering, actor);
        Ok(offering)
    }

    pub async fn cancel_offering(&self, actor: &Actor, id: Uuid) -> Result<Offering, ServerError> {
        let offering = self.with_db(|db| db.cancel_offering(actor, id))?;
        self.cache.invalidate_all().await;
        self.notify_status(&offering, actor);
        Ok(offering)
    }

    /// Tell the participants other than `actor` about a status change.
    fn notify_status(&self, offering: &Offering, actor: &Actor) {
        let recipients: Vec<Uuid> = std::iter::once(offering.student_id)
            .chain(offering.tutor_id)
            .filter(|id| *id != actor.id)
            .collect();
        self.notifier.dispatch(
            NotificationEvent::DashboardUpdate {
                offering_id: offering.id,
                offering_title: offering.title.clone(),
                status: offering.status,
            },
            recipients,
        );
    }

    pub async fn delete_offering(&self, actor: &Actor, id: Uuid) -> Result<(), ServerError> {
        let deleted = self.with_db(|db| db.delete_offering(actor, id))?;
        self.blobs.delete_all(&deleted.file_paths).await;
        self.cache.invalidate_all().await;
        Ok(())
    }

    pub async fn accept_offering(&self, tutor: &Actor, id: Uuid) -> Result<Earning, ServerError> {
        let fee_rate = self.fee_rate;
        let (acceptance, tutor_name) = self.with_db(|db| {
            let acceptance = db.accept_offering(tutor, id, fee_rate)?;
            let name = db
                .get_user(tutor.id)
                .map(|u| u.name)
                .unwrap_or_else(|_| "A tutor".to_string());
            Ok((acceptance, name))
        })?;
        self.cache.invalidate_all().await;

        let offering = acceptance.offering;
        self.notifier.dispatch(
            NotificationEvent::OfferingAccepted {
                offering_id: offering.id,
                offering_title: offering.title,
                tutor_id: tutor.id,
                tutor_name,
                amount: acceptance.earning.amount,
            },
            vec![offering.student_id],
        );
        Ok(acceptance.earning)
    }

    pub async fn add_attachment(
        &self,
        actor: &Actor,
        id: Uuid,
        upload: Upload,
    ) -> Result<Offering, ServerError> {
        // Fail fast before writing anything to disk.
        let current = self.get_offering(id)?;
        policy::ensure_owner(actor, &current)?;
        self.blobs.check_size(upload.data.len() as u64)?;

        let attachment = self
            .blobs
            .store_attachment(
                &format!("offerings/{id}"),
                &upload.file_name,
                &upload.mime_type,
                &upload.data,
            )
            .await?;
        let stored_path = attachment.path.clone();

        let offering = match self.with_db(|db| db.add_attachment(actor, id, attachment)) {
            Ok(offering) => offering,
            Err(e) => {
                self.blobs.delete_all(&[stored_path]).await;
                return Err(e);
            }
        };
        self.cache.invalidate_all().await;

        if let Some(tutor_id) = offering.tutor_id {
            self.notifier.dispatch(
                NotificationEvent::AttachmentUploaded {
                    offering_id: offering.id,
                    offering_title: offering.title.clone(),
                    file_name: upload.file_name,
                },
                vec![tutor_id],
            );
        }
        Ok(offering)
    }

    pub async fn remove_attachment(
        &self,
        actor: &Actor,
        id: Uuid,
        path: &str,
    ) -> Result<Offering, ServerError> {
        let (offering, removed) = self.with_db(|db| db.remove_attachment(actor, id, path))?;
        self.blobs.delete_all(&[removed.path]).await;
        self.cache.invalidate_all().await;
        Ok(offering)
    }

    /// Bytes of one attachment, for participants and admins.
    pub async fn download_attachment(
        &self,
        actor: &Actor,
        id: Uuid,
        path: &str,
    ) -> Result<(String, Bytes), ServerError> {
        let offering = self.get_offering(id)?;
        if !actor.is_admin() {
            policy::ensure_participant(actor, &offering)?;
        }
        let attachment = offering
            .attachments
            .iter()
            .find(|a| a.path == path)
            .ok_or(DomainError::NotFound("attachment"))?;
        let data = self.blobs.read(&attachment.path).await?;
        Ok((attachment.mime_type.clone(), Bytes::from(data)))
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn send_message(
        &self,
        sender: &Actor,
        offering_id: Uuid,
        content: &str,
        uploads: Vec<Upload>,
    ) -> Result<Message, ServerError> {
        validate_message_content(content)?;
        for upload in &uploads {
            self.blobs.check_size(upload.data.len() as u64)?;
        }
        let offering = self.get_offering(offering_id)?;
        policy::ensure_participant(sender, &offering)?;

        let mut paths = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            match self
                .blobs
                .store_file(&format!("messages/{offering_id}"), &upload.file_name, &upload.data)
                .await
            {
                Ok(path) => paths.push(path),
                Err(e) => {
                    self.blobs.delete_all(&paths).await;
                    return Err(e);
                }
            }
        }

        let sent = match self.with_db(|db| {
            db.send_message(sender, offering_id, content, paths.clone())
        }) {
            Ok(sent) => sent,
            Err(e) => {
                self.blobs.delete_all(&paths).await;
                return Err(e);
            }
        };
        // Activity moved, so listing pages are stale.
        self.cache.invalidate_all().await;

        if let Some(recipient) = sent.recipient_id {
            self.notifier.dispatch(
                NotificationEvent::NewMessage {
                    offering_id,
                    offering_title: sent.offering_title,
                    message_id: sent.message.id,
                    sender_id: sender.id,
                    preview: sent.message.content.clone(),
                },
                vec![recipient],
            );
        }
        Ok(sent.message)
    }

    pub fn list_messages(
        &self,
        actor: &Actor,
        offering_id: Uuid,
        page: u32,
    ) -> Result<Page<Message>, ServerError> {
        self.with_db(|db| db.list_messages(offering_id, actor, page))
    }

    pub fn mark_message_read(&self, actor: &Actor, id: Uuid) -> Result<Message, ServerError> {
        self.with_db(|db| db.mark_message_read(id, actor))
    }

    pub fn unread_count(&self, actor: &Actor, offering_id: Uuid) -> Result<u64, ServerError> {
        self.with_db(|db| db.unread_count(offering_id, actor))
    }

    pub async fn delete_message(&self, actor: &Actor, id: Uuid) -> Result<(), ServerError> {
        let message = self.with_db(|db| db.delete_message(id, actor))?;
        self.blobs.delete_all(&message.attachments).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Earnings
    // ------------------------------------------------------------------

    fn ensure_tutor(actor: &Actor) -> Result<(), ServerError> {
        if actor.role == Role::Tutor {
            Ok(())
        } else {
            Err(DomainError::forbidden("only tutors have earnings").into())
        }
    }

    pub fn list_earnings(&self, actor: &Actor) -> Result<Vec<Earning>, ServerError> {
        Self::ensure_tutor(actor)?;
        self.with_db(|db| db.list_earnings_for_tutor(actor.id))
    }

    pub fn earnings_summary(&self, actor: &Actor) -> Result<EarningsSummary, ServerError> {
        Self::ensure_tutor(actor)?;
        self.with_db(|db| db.earnings_summary(actor.id, tutorhub_store::codec::now()))
    }

    /// Called by the payment process once a payout has an outcome.
    pub fn settle_earning(&self, id: Uuid, status: EarningStatus) -> Result<Earning, ServerError> {
        let earning = self.with_db(|db| db.settle_earning(id, status))?;
        info!(earning = %id, status = %status, "settlement recorded");
        Ok(earning)
    }

    // ------------------------------------------------------------------
    // Notification inbox
    // ------------------------------------------------------------------

    pub fn list_notifications(
        &self,
        actor: &Actor,
        page: u32,
    ) -> Result<Page<Notification>, ServerError> {
        self.with_db(|db| db.list_notifications(actor.id, page, NOTIFICATION_PAGE_SIZE))
    }

    pub fn unread_notification_count(&self, actor: &Actor) -> Result<u64, ServerError> {
        self.with_db(|db| db.unread_notification_count(actor.id))
    }

    pub fn mark_notification_read(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Notification, ServerError> {
        self.with_db(|db| db.mark_notification_read(id, actor.id))
    }

    pub fn mark_all_notifications_read(&self, actor: &Actor) -> Result<usize, ServerError> {
        self.with_db(|db| db.mark_all_notifications_read(actor.id))
    }

    pub fn preferences(&self, actor: &Actor) -> Result<NotificationPreference, ServerError> {
        self.with_db(|db| db.get_preferences(actor.id))
    }

    pub fn set_preferences(
        &self,
        actor: &Actor,
        prefs: NotificationPreference,
    ) -> Result<NotificationPreference, ServerError> {
        self.with_db(|db| db.set_preferences(actor.id, prefs))
    }
}
