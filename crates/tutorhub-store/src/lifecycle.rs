//! Offering lifecycle rules.
//!
//! Every mutating offering operation goes through [`prepare_write`] right
//! before the row is written, so the derived columns never drift from the
//! attachment list and activity is always bumped.

use chrono::{DateTime, Utc};

use tutorhub_shared::{DomainError, OfferingStatus};

use crate::models::{Attachment, Offering, OfferingPatch};

/// Attachment count and total size in bytes.
pub fn attachment_stats(attachments: &[Attachment]) -> (u32, u64) {
    let count = attachments.len() as u32;
    let size = attachments.iter().map(|a| a.size).sum();
    (count, size)
}

/// Pre-write normalization: recompute derived attachment columns and bump
/// the activity timestamps.
pub fn prepare_write(offering: &mut Offering, now: DateTime<Utc>) {
    let (count, size) = attachment_stats(&offering.attachments);
    offering.attachment_count = count;
    offering.total_attachment_size = size;
    offering.last_activity_at = now;
    offering.updated_at = now;
}

pub fn ensure_transition(from: OfferingStatus, to: OfferingStatus) -> Result<(), DomainError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DomainError::conflict(format!(
            "cannot move a {from} offering to {to}"
        )))
    }
}

/// Content edits are only possible while the offering is still pending.
pub fn ensure_editable(offering: &Offering) -> Result<(), DomainError> {
    if offering.status == OfferingStatus::Pending {
        Ok(())
    } else {
        Err(DomainError::NotEditable)
    }
}

/// Move `offering` to `to`, enforcing the transition graph.
pub fn transition(
    offering: &mut Offering,
    to: OfferingStatus,
    now: DateTime<Utc>,
) -> Result<(), DomainError> {
    ensure_transition(offering.status, to)?;
    offering.status = to;
    prepare_write(offering, now);
    Ok(())
}

/// Apply an already-validated patch to a pending offering.
pub fn apply_patch(
    offering: &mut Offering,
    patch: OfferingPatch,
    now: DateTime<Utc>,
) -> Result<(), DomainError> {
    ensure_editable(offering)?;

    if let Some(title) = patch.title {
        offering.title = title.trim().to_string();
    }
    if let Some(description) = patch.description {
        offering.description = description;
    }
    if let Some(budget) = patch.budget {
        offering.budget = budget;
    }
    if let Some(deadline) = patch.deadline {
        offering.deadline = deadline;
    }

    prepare_write(offering, now);
    Ok(())
}

/// Students may keep supplying material after a tutor accepted, so uploads
/// are allowed in every non-terminal state.  Removal is stricter.
pub fn add_attachment(
    offering: &mut Offering,
    attachment: Attachment,
    now: DateTime<Utc>,
) -> Result<(), DomainError> {
    if offering.status.is_terminal() {
        return Err(DomainError::NotEditable);
    }
    offering.attachments.push(attachment);
    prepare_write(offering, now);
    Ok(())
}

pub fn remove_attachment(
    offering: &mut Offering,
    path: &str,
    now: DateTime<Utc>,
) -> Result<Attachment, DomainError> {
    ensure_editable(offering)?;
    let idx = offering
        .attachments
        .iter()
        .position(|a| a.path == path)
        .ok_or(DomainError::NotFound("attachment"))?;
    let removed = offering.attachments.remove(idx);
    prepare_write(offering, now);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn offering(status: OfferingStatus) -> Offering {
        let created = Utc::now() - Duration::hours(1);
        Offering {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            tutor_id: None,
            title: "Linear algebra homework".into(),
            description: "Five exercises on eigenvalues".into(),
            budget: dec!(100000),
            deadline: created + Duration::days(3),
            status,
            attachments: vec![],
            attachment_count: 0,
            total_attachment_size: 0,
            last_activity_at: created,
            created_at: created,
            updated_at: created,
            deleted_at: None,
        }
    }

    fn attachment(path: &str, size: u64) -> Attachment {
        Attachment {
            path: path.into(),
            original_name: format!("{path}.pdf"),
            mime_type: "application/pdf".into(),
            size,
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn stats_follow_the_attachment_list() {
        let mut o = offering(OfferingStatus::Pending);
        let now = Utc::now();

        add_attachment(&mut o, attachment("a", 100), now).unwrap();
        add_attachment(&mut o, attachment("b", 250), now).unwrap();
        assert_eq!((o.attachment_count, o.total_attachment_size), (2, 350));

        let removed = remove_attachment(&mut o, "a", now).unwrap();
        assert_eq!(removed.size, 100);
        assert_eq!((o.attachment_count, o.total_attachment_size), (1, 250));
        assert_eq!(o.last_activity_at, now);
    }

    #[test]
    fn removing_unknown_attachment_is_not_found() {
        let mut o = offering(OfferingStatus::Pending);
        assert_eq!(
            remove_attachment(&mut o, "missing", Utc::now()),
            Err(DomainError::NotFound("attachment"))
        );
    }

    #[test]
    fn editing_accepted_offering_is_rejected() {
        let mut o = offering(OfferingStatus::Accepted);
        let patch = OfferingPatch {
            title: Some("New title".into()),
            ..Default::default()
        };
        assert_eq!(
            apply_patch(&mut o, patch, Utc::now()),
            Err(DomainError::NotEditable)
        );
        assert_eq!(o.title, "Linear algebra homework");
    }

    #[test]
    fn uploads_continue_after_acceptance() {
        let mut o = offering(OfferingStatus::Accepted);
        add_attachment(&mut o, attachment("late", 7), Utc::now()).unwrap();
        assert_eq!(o.attachment_count, 1);
        assert_eq!(
            remove_attachment(&mut o, "late", Utc::now()),
            Err(DomainError::NotEditable)
        );

        let mut done = offering(OfferingStatus::Completed);
        assert_eq!(
            add_attachment(&mut done, attachment("x", 1), Utc::now()),
            Err(DomainError::NotEditable)
        );
    }

    #[test]
    fn patch_bumps_activity() {
        let mut o = offering(OfferingStatus::Pending);
        let before = o.last_activity_at;
        let now = Utc::now();
        let patch = OfferingPatch {
            budget: Some(dec!(120000)),
            ..Default::default()
        };

        apply_patch(&mut o, patch, now).unwrap();
        assert_eq!(o.budget, dec!(120000));
        assert!(o.last_activity_at > before);
        assert_eq!(o.updated_at, now);
    }

    #[test]
    fn invalid_transition_is_a_conflict() {
        let mut o = offering(OfferingStatus::Completed);
        assert!(matches!(
            transition(&mut o, OfferingStatus::Cancelled, Utc::now()),
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(o.status, OfferingStatus::Completed);
    }
}
