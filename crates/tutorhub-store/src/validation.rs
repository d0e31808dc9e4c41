//! Input validation run before anything is written.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use tutorhub_shared::constants::{MAX_ATTACHMENT_SIZE, MAX_MESSAGE_CHARS, MAX_TITLE_CHARS};
use tutorhub_shared::money::{round_cents, to_cents};
use tutorhub_shared::DomainError;

use crate::models::{NewOffering, NewUser, OfferingPatch};

type Result<T> = std::result::Result<T, DomainError>;

pub fn validate_title(title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title is required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(DomainError::validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(DomainError::validation("description is required"));
    }
    Ok(())
}

/// Money amounts must be whole cents; they are stored as integer cents and
/// never rounded on the way in.
pub fn validate_amount(field: &str, amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(DomainError::validation(format!("{field} must not be negative")));
    }
    if round_cents(amount) != amount {
        return Err(DomainError::validation(format!(
            "{field} must not have fractions of a cent"
        )));
    }
    if to_cents(amount).is_none() {
        return Err(DomainError::validation(format!("{field} is too large")));
    }
    Ok(())
}

pub fn validate_budget(budget: Decimal) -> Result<()> {
    validate_amount("budget", budget)
}

pub fn validate_deadline(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if deadline <= now {
        return Err(DomainError::validation("deadline must be in the future"));
    }
    Ok(())
}

pub fn validate_attachment_size(size: u64) -> Result<()> {
    if size > MAX_ATTACHMENT_SIZE {
        return Err(DomainError::validation(format!(
            "attachment is {size} bytes, the limit is {MAX_ATTACHMENT_SIZE}"
        )));
    }
    Ok(())
}

/// Chat content: required and at most 1000 characters (not bytes).
pub fn validate_message_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(DomainError::validation("message content is required"));
    }
    let len = content.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(DomainError::validation(format!(
            "message is {len} characters, the limit is {MAX_MESSAGE_CHARS}"
        )));
    }
    Ok(())
}

pub fn validate_new_offering(input: &NewOffering, now: DateTime<Utc>) -> Result<()> {
    validate_title(&input.title)?;
    validate_description(&input.description)?;
    validate_budget(input.budget)?;
    validate_deadline(input.deadline, now)?;
    for attachment in &input.attachments {
        validate_attachment_size(attachment.size)?;
    }
    Ok(())
}

/// Edits re-check only the fields they touch.  A new deadline must again be
/// in the future.
pub fn validate_patch(patch: &OfferingPatch, now: DateTime<Utc>) -> Result<()> {
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }
    if let Some(description) = &patch.description {
        validate_description(description)?;
    }
    if let Some(budget) = patch.budget {
        validate_budget(budget)?;
    }
    if let Some(deadline) = patch.deadline {
        validate_deadline(deadline, now)?;
    }
    Ok(())
}

pub fn validate_new_user(input: &NewUser) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(DomainError::validation("name is required"));
    }
    let email = input.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(DomainError::validation("email address is invalid")),
    }
    if let Some(rate) = input.hourly_rate {
        validate_amount("hourly rate", rate)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn message_length_limit_is_inclusive() {
        assert!(validate_message_content(&"a".repeat(1000)).is_ok());
        assert!(matches!(
            validate_message_content(&"a".repeat(1001)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn message_length_counts_characters() {
        // 1000 two-byte characters are still within the limit.
        assert!(validate_message_content(&"é".repeat(1000)).is_ok());
    }

    #[test]
    fn blank_message_rejected() {
        assert!(validate_message_content("  \n").is_err());
    }

    #[test]
    fn negative_budget_rejected() {
        assert!(validate_budget(dec!(-1)).is_err());
        assert!(validate_budget(dec!(0)).is_ok());
        assert!(validate_budget(dec!(100000)).is_ok());
    }

    #[test]
    fn amounts_must_be_whole_cents() {
        assert!(validate_budget(dec!(10.005)).is_err());
        assert!(validate_budget(dec!(10.50)).is_ok());
        // Trailing zeros past the cents are still whole cents.
        assert!(validate_budget(dec!(10.500)).is_ok());
        assert!(validate_budget(Decimal::MAX).is_err());

        let user = NewUser {
            name: "Budi".into(),
            email: "budi@example.com".into(),
            role: tutorhub_shared::Role::Tutor,
            subjects: vec![],
            hourly_rate: Some(dec!(75000.001)),
        };
        assert!(matches!(
            validate_new_user(&user),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn past_deadline_rejected() {
        let now = Utc::now();
        assert!(validate_deadline(now - Duration::minutes(1), now).is_err());
        assert!(validate_deadline(now, now).is_err());
        assert!(validate_deadline(now + Duration::days(1), now).is_ok());
    }

    #[test]
    fn oversized_attachment_rejected() {
        assert!(validate_attachment_size(MAX_ATTACHMENT_SIZE).is_ok());
        assert!(validate_attachment_size(MAX_ATTACHMENT_SIZE + 1).is_err());
    }

    #[test]
    fn email_shape_checked() {
        let mut user = NewUser {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            role: tutorhub_shared::Role::Student,
            subjects: vec![],
            hourly_rate: None,
        };
        assert!(validate_new_user(&user).is_ok());
        user.email = "ana".into();
        assert!(validate_new_user(&user).is_err());
    }
}
