//! Who may do what to an offering.

use uuid::Uuid;

use tutorhub_shared::{Actor, DomainError, Role};

use crate::models::Offering;

type Result<T> = std::result::Result<T, DomainError>;

pub fn is_participant(actor_id: Uuid, offering: &Offering) -> bool {
    offering.student_id == actor_id || offering.tutor_id == Some(actor_id)
}

/// The other side of the conversation, if there is one yet.
pub fn counterparty(offering: &Offering, actor_id: Uuid) -> Option<Uuid> {
    if offering.student_id == actor_id {
        offering.tutor_id
    } else {
        Some(offering.student_id)
    }
}

pub fn ensure_student(actor: &Actor) -> Result<()> {
    if actor.role == Role::Student {
        Ok(())
    } else {
        Err(DomainError::forbidden("only students can post offerings"))
    }
}

pub fn ensure_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(DomainError::forbidden("admin role required"))
    }
}

pub fn ensure_owner(actor: &Actor, offering: &Offering) -> Result<()> {
    if offering.student_id == actor.id {
        Ok(())
    } else {
        Err(DomainError::forbidden("only the owner can do this"))
    }
}

pub fn ensure_owner_or_admin(actor: &Actor, offering: &Offering) -> Result<()> {
    if offering.student_id == actor.id || actor.is_admin() {
        Ok(())
    } else {
        Err(DomainError::forbidden("only the owner or an admin can do this"))
    }
}

/// Owner or assigned tutor.
pub fn ensure_participant(actor: &Actor, offering: &Offering) -> Result<()> {
    if is_participant(actor.id, offering) {
        Ok(())
    } else {
        Err(DomainError::forbidden(
            "only the owner or the assigned tutor can access this conversation",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tutorhub_shared::OfferingStatus;

    fn offering(student: Uuid, tutor: Option<Uuid>) -> Offering {
        let now = Utc::now();
        Offering {
            id: Uuid::new_v4(),
            student_id: student,
            tutor_id: tutor,
            title: "t".into(),
            description: "d".into(),
            budget: Decimal::ONE,
            deadline: now,
            status: OfferingStatus::Accepted,
            attachments: vec![],
            attachment_count: 0,
            total_attachment_size: 0,
            last_activity_at: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn participants() {
        let student = Uuid::new_v4();
        let tutor = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let o = offering(student, Some(tutor));

        assert!(ensure_participant(&Actor::student(student), &o).is_ok());
        assert!(ensure_participant(&Actor::tutor(tutor, true), &o).is_ok());
        assert!(ensure_participant(&Actor::tutor(stranger, true), &o).is_err());
        // Admins moderate offerings but do not read private conversations.
        assert!(ensure_participant(&Actor::admin(stranger), &o).is_err());
        assert!(ensure_owner_or_admin(&Actor::admin(stranger), &o).is_ok());
    }

    #[test]
    fn counterparty_of_each_side() {
        let student = Uuid::new_v4();
        let tutor = Uuid::new_v4();

        assert_eq!(counterparty(&offering(student, Some(tutor)), student), Some(tutor));
        assert_eq!(counterparty(&offering(student, Some(tutor)), tutor), Some(student));
        assert_eq!(counterparty(&offering(student, None), student), None);
    }
}
