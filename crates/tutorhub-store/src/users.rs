//! Users and tutor profiles.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use uuid::Uuid;

use tutorhub_shared::money::{from_cents, to_cents};
use tutorhub_shared::{Actor, DomainError, Role, VerificationStatus};

use crate::codec::{
    col_bool, col_enum, col_json, col_opt_ts, col_ts, col_uuid, fmt_opt_ts, fmt_ts, not_found, now,
};
use crate::database::Database;
use crate::error::Result;
use crate::models::{NewUser, TutorProfile, User};
use crate::validation::validate_new_user;

const PROFILE_COLUMNS: &str = "id, user_id, verification_status, is_verified, verified_at, \
     verification_note, documents, subjects, hourly_rate_cents, available_weekdays, \
     available_weekends, accepts_urgent, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Register a user.  Tutors get a pending profile in the same
    /// transaction.
    pub fn create_user(&mut self, input: NewUser) -> Result<(User, Option<TutorProfile>)> {
        validate_new_user(&input)?;

        let now = now();
        let user = User {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            role: input.role,
            created_at: now,
        };

        let tx = self.write_tx()?;

        let taken: Option<String> = tx
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![user.email],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(DomainError::conflict("email address is already registered").into());
        }

        tx.execute(
            "INSERT INTO users (id, name, email, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.name,
                user.email,
                user.role.as_str(),
                fmt_ts(&user.created_at),
            ],
        )?;

        let profile = if user.role == Role::Tutor {
            let profile = TutorProfile {
                id: Uuid::new_v4(),
                user_id: user.id,
                verification_status: VerificationStatus::Pending,
                is_verified: false,
                verified_at: None,
                verification_note: None,
                documents: Vec::new(),
                subjects: input.subjects,
                hourly_rate: input.hourly_rate.unwrap_or(Decimal::ZERO),
                available_weekdays: true,
                available_weekends: false,
                accepts_urgent: false,
                created_at: now,
                updated_at: now,
            };
            insert_profile(&tx, &profile)?;
            Some(profile)
        } else {
            None
        };

        tx.commit()?;

        tracing::info!(user = %user.id, role = user.role.as_str(), "user registered");
        Ok((user, profile))
    }

    pub fn get_user(&self, id: Uuid) -> Result<User> {
        load_user(self.conn(), id)
    }

    /// Resolve the caller identity used by every other operation.
    pub fn resolve_actor(&self, user_id: Uuid) -> Result<Actor> {
        let user = self.get_user(user_id)?;
        let verified = user.role == Role::Tutor && is_verified_tutor(self.conn(), user.id)?;
        Ok(Actor {
            id: user.id,
            role: user.role,
            verified,
        })
    }

    // ------------------------------------------------------------------
    // Tutor profiles
    // ------------------------------------------------------------------

    pub fn get_tutor_profile(&self, id: Uuid) -> Result<TutorProfile> {
        self.conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM tutor_profiles WHERE id = ?1"),
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(not_found("tutor profile"))
    }

    pub fn get_tutor_profile_by_user(&self, user_id: Uuid) -> Result<TutorProfile> {
        self.conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM tutor_profiles WHERE user_id = ?1"),
                params![user_id.to_string()],
                row_to_profile,
            )
            .map_err(not_found("tutor profile"))
    }

    /// Record an admin's verification decision.
    ///
    /// Approval sets `is_verified` and `verified_at`; rejection clears both.
    /// The same decision may be recorded again (e.g. to update the note).
    pub fn set_tutor_verification(
        &mut self,
        admin: &Actor,
        profile_id: Uuid,
        approve: bool,
        note: Option<String>,
    ) -> Result<TutorProfile> {
        crate::policy::ensure_admin(admin)?;

        let now = now();
        let (status, verified_at) = if approve {
            (VerificationStatus::Approved, Some(now))
        } else {
            (VerificationStatus::Rejected, None)
        };

        let affected = self.conn().execute(
            "UPDATE tutor_profiles
             SET verification_status = ?1, is_verified = ?2, verified_at = ?3,
                 verification_note = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                status.as_str(),
                approve as i32,
                fmt_opt_ts(&verified_at),
                note,
                fmt_ts(&now),
                profile_id.to_string(),
            ],
        )?;
        if affected == 0 {
            return Err(DomainError::NotFound("tutor profile").into());
        }

        tracing::info!(
            profile = %profile_id,
            admin = %admin.id,
            status = status.as_str(),
            "tutor verification recorded"
        );
        self.get_tutor_profile(profile_id)
    }
}

pub(crate) fn load_user(conn: &Connection, id: Uuid) -> Result<User> {
    conn.query_row(
        "SELECT id, name, email, role, created_at FROM users WHERE id = ?1",
        params![id.to_string()],
        row_to_user,
    )
    .map_err(not_found("user"))
}

/// Read the verification flag straight from the profile row.
pub(crate) fn is_verified_tutor(conn: &Connection, user_id: Uuid) -> Result<bool> {
    let verified: Option<i64> = conn
        .query_row(
            "SELECT is_verified FROM tutor_profiles
             WHERE user_id = ?1 AND verification_status = 'approved'",
            params![user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(verified.unwrap_or(0) != 0)
}

fn insert_profile(conn: &Connection, profile: &TutorProfile) -> Result<()> {
    let rate_cents = to_cents(profile.hourly_rate).unwrap_or(0);
    conn.execute(
        &format!(
            "INSERT INTO tutor_profiles ({PROFILE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            profile.id.to_string(),
            profile.user_id.to_string(),
            profile.verification_status.as_str(),
            profile.is_verified as i32,
            fmt_opt_ts(&profile.verified_at),
            profile.verification_note,
            serde_json::to_string(&profile.documents)?,
            serde_json::to_string(&profile.subjects)?,
            rate_cents,
            profile.available_weekdays as i32,
            profile.available_weekends as i32,
            profile.accepts_urgent as i32,
            fmt_ts(&profile.created_at),
            fmt_ts(&profile.updated_at),
        ],
    )?;
    Ok(())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: col_uuid(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: col_enum(row, 3)?,
        created_at: col_ts(row, 4)?,
    })
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<TutorProfile> {
    let rate_cents: i64 = row.get(8)?;
    let verified_at: Option<DateTime<Utc>> = col_opt_ts(row, 4)?;
    Ok(TutorProfile {
        id: col_uuid(row, 0)?,
        user_id: col_uuid(row, 1)?,
        verification_status: col_enum(row, 2)?,
        is_verified: col_bool(row, 3)?,
        verified_at,
        verification_note: row.get(5)?,
        documents: col_json(row, 6)?,
        subjects: col_json(row, 7)?,
        hourly_rate: from_cents(rate_cents),
        available_weekdays: col_bool(row, 9)?,
        available_weekends: col_bool(row, 10)?,
        accepts_urgent: col_bool(row, 11)?,
        created_at: col_ts(row, 12)?,
        updated_at: col_ts(row, 13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn tutor_registration_creates_pending_profile() {
        let mut db = Database::open_in_memory().unwrap();
        let (user, profile) = db
            .create_user(NewUser {
                name: "Budi".into(),
                email: "Budi@Example.com".into(),
                role: Role::Tutor,
                subjects: vec!["math".into()],
                hourly_rate: None,
            })
            .unwrap();

        assert_eq!(user.email, "budi@example.com");
        let profile = profile.expect("tutor gets a profile");
        assert_eq!(profile.verification_status, VerificationStatus::Pending);
        assert!(!profile.is_verified);
        assert_eq!(db.get_tutor_profile_by_user(user.id).unwrap(), profile);

        let actor = db.resolve_actor(user.id).unwrap();
        assert!(!actor.verified);
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let mut db = Database::open_in_memory().unwrap();
        let input = NewUser {
            name: "Citra".into(),
            email: "citra@example.com".into(),
            role: Role::Student,
            subjects: vec![],
            hourly_rate: None,
        };
        db.create_user(input.clone()).unwrap();

        let err = db
            .create_user(NewUser {
                email: "CITRA@example.com".into(),
                ..input
            })
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn verification_keeps_flag_and_timestamp_in_sync() {
        let mut db = Database::open_in_memory().unwrap();
        let admin = admin(&mut db);
        let (tutor, profile) = unverified_tutor(&mut db);

        let approved = db
            .set_tutor_verification(&admin, profile.id, true, None)
            .unwrap();
        assert!(approved.is_verified);
        assert!(approved.verified_at.is_some());
        assert!(db.resolve_actor(tutor.id).unwrap().verified);

        let rejected = db
            .set_tutor_verification(&admin, profile.id, false, Some("blurry documents".into()))
            .unwrap();
        assert_eq!(rejected.verification_status, VerificationStatus::Rejected);
        assert!(!rejected.is_verified);
        assert!(rejected.verified_at.is_none());
        assert_eq!(rejected.verification_note.as_deref(), Some("blurry documents"));
        assert!(!db.resolve_actor(tutor.id).unwrap().verified);
    }

    #[test]
    fn only_admins_verify() {
        let mut db = Database::open_in_memory().unwrap();
        let student = student(&mut db);
        let (_, profile) = unverified_tutor(&mut db);

        let err = db
            .set_tutor_verification(&student, profile.id, true, None)
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Forbidden(_))));
    }
}
