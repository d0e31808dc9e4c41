//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer and stored in the page cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tutorhub_shared::{EarningStatus, OfferingStatus, Role, VerificationStatus};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Registration input.  Tutors get a pending [`TutorProfile`] alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Tutor profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TutorProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub verification_status: VerificationStatus,
    /// Mirrors `verification_status == Approved`.
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_note: Option<String>,
    pub documents: Vec<String>,
    pub subjects: Vec<String>,
    pub hourly_rate: Decimal,
    pub available_weekdays: bool,
    pub available_weekends: bool,
    pub accepts_urgent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Offering
// ---------------------------------------------------------------------------

/// A file attached to an offering.  The bytes live in blob storage; only
/// the path and metadata are persisted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// A paid assignment posted by a student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offering {
    pub id: Uuid,
    pub student_id: Uuid,
    pub tutor_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub budget: Decimal,
    pub deadline: DateTime<Utc>,
    pub status: OfferingStatus,
    pub attachments: Vec<Attachment>,
    pub attachment_count: u32,
    pub total_attachment_size: u64,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOffering {
    pub title: String,
    pub description: String,
    pub budget: Decimal,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Partial edit of a pending offering.  `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget: Option<Decimal>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Result of a soft delete: the offering as it was, plus every stored file
/// that the caller should now remove from blob storage.
#[derive(Debug, Clone)]
pub struct DeletedOffering {
    pub offering: Offering,
    pub file_paths: Vec<String>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub offering_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachments: Vec<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A freshly stored message and who should be told about it.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: Message,
    pub offering_title: String,
    /// The other participant, if a tutor has been assigned yet.
    pub recipient_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Earning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Earning {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub offering_id: Uuid,
    /// The tutor's share, fixed at acceptance time.
    pub amount: Decimal,
    /// The platform's share.
    pub commission: Decimal,
    pub status: EarningStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a successful acceptance.
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub offering: Offering,
    pub earning: Earning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EarningsSummary {
    pub total_paid: Decimal,
    pub pending: Decimal,
    pub this_month: Decimal,
    pub last_month: Decimal,
    /// `None` when last month earned nothing.
    pub growth_percent: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// A persisted notification record (one row of a user's inbox).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub message: String,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: String,
    pub message: String,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub data: serde_json::Value,
}

/// Which channels a user wants to hear from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPreference {
    pub email: bool,
    pub push: bool,
    pub in_app: bool,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            email: true,
            push: true,
            in_app: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: u64) -> Self {
        let per_page = per_page.max(1);
        let last_page = total.div_ceil(per_page as u64).max(1) as u32;
        Self {
            items,
            page,
            per_page,
            total,
            last_page,
        }
    }
}

/// Normalize a requested page number (pages start at 1, 0 means 1).
pub fn page_number(page: u32) -> u32 {
    page.max(1)
}

/// Row offset of the first item on `page`.
pub fn page_offset(page: u32, per_page: u32) -> i64 {
    (page_number(page) as i64 - 1) * per_page as i64
}
