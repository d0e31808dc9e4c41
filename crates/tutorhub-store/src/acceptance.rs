//! The acceptance transaction: a verified tutor claims an offering and the
//! matching earning is recorded atomically.

use rusqlite::params;
use rust_decimal::Decimal;
use uuid::Uuid;

use tutorhub_shared::money::split_budget;
use tutorhub_shared::{Actor, DomainError, EarningStatus, OfferingStatus, Role};

use crate::codec::{fmt_ts, now};
use crate::database::Database;
use crate::earnings::insert_earning;
use crate::error::Result;
use crate::lifecycle;
use crate::models::{Acceptance, Earning};
use crate::offerings::load_offering;
use crate::users::is_verified_tutor;

impl Database {
    /// Accept `offering_id` on behalf of `tutor`.
    ///
    /// Runs under `BEGIN IMMEDIATE`, so of two racing tutors exactly one
    /// passes the conditional update; the other sees zero affected rows and
    /// gets [`DomainError::AlreadyAccepted`].  Any failure after the update
    /// drops the transaction and rolls the status change back with it.
    pub fn accept_offering(
        &mut self,
        tutor: &Actor,
        offering_id: Uuid,
        fee_rate: Decimal,
    ) -> Result<Acceptance> {
        if tutor.role != Role::Tutor {
            return Err(DomainError::forbidden("only tutors can accept offerings").into());
        }

        let now = now();
        let tx = self.write_tx()?;

        let mut offering = load_offering(&tx, offering_id)?;

        // The actor's flag may be stale; the profile row is authoritative.
        if !is_verified_tutor(&tx, tutor.id)? {
            return Err(DomainError::NotVerified.into());
        }
        if offering.student_id == tutor.id {
            return Err(DomainError::forbidden("you cannot accept your own offering").into());
        }
        if offering.tutor_id.is_some() || offering.status == OfferingStatus::Accepted {
            return Err(DomainError::AlreadyAccepted.into());
        }
        lifecycle::transition(&mut offering, OfferingStatus::Accepted, now)?;
        offering.tutor_id = Some(tutor.id);

        let ts = fmt_ts(&now);
        let affected = tx.execute(
            "UPDATE offerings
             SET status = 'accepted', tutor_id = ?1, last_activity_at = ?2, updated_at = ?2
             WHERE id = ?3
               AND status IN ('pending', 'open')
               AND tutor_id IS NULL
               AND deleted_at IS NULL",
            params![tutor.id.to_string(), ts, offering_id.to_string()],
        )?;
        if affected == 0 {
            return Err(DomainError::AlreadyAccepted.into());
        }

        let split = split_budget(offering.budget, fee_rate);
        let earning = Earning {
            id: Uuid::new_v4(),
            tutor_id: tutor.id,
            offering_id,
            amount: split.tutor_amount,
            commission: split.commission,
            status: EarningStatus::Pending,
            paid_at: None,
            created_at: now,
        };
        insert_earning(&tx, &earning)?;

        tx.commit()?;

        tracing::info!(
            offering = %offering_id,
            tutor = %tutor.id,
            amount = %earning.amount,
            commission = %earning.commission,
            "offering accepted"
        );

        Ok(Acceptance { offering, earning })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Barrier};

    #[test]
    fn acceptance_records_the_tutor_share() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = student(&mut db);
        let tutor = verified_tutor(&mut db);
        let offering = post(&mut db, &owner, "Thesis proofreading", dec!(100000));

        let accepted = db.accept_offering(&tutor, offering.id, dec!(0.10)).unwrap();

        assert_eq!(accepted.earning.amount, dec!(90000));
        assert_eq!(accepted.earning.commission, dec!(10000));
        assert_eq!(accepted.earning.status, EarningStatus::Pending);
        assert!(accepted.earning.paid_at.is_none());

        let stored = db.get_offering(offering.id).unwrap();
        assert_eq!(stored.status, OfferingStatus::Accepted);
        assert_eq!(stored.tutor_id, Some(tutor.id));
        assert_eq!(stored, accepted.offering);

        let earnings = db.list_earnings_for_tutor(tutor.id).unwrap();
        assert_eq!(earnings, vec![accepted.earning]);
    }

    #[test]
    fn open_offerings_can_be_accepted() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = student(&mut db);
        let tutor = verified_tutor(&mut db);
        let offering = post(&mut db, &owner, "Open one", dec!(500));
        db.publish_offering(&owner, offering.id).unwrap();

        let accepted = db.accept_offering(&tutor, offering.id, dec!(0.10)).unwrap();
        assert_eq!(accepted.offering.status, OfferingStatus::Accepted);
    }

    #[test]
    fn second_accept_is_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = student(&mut db);
        let first = verified_tutor(&mut db);
        let second = verified_tutor(&mut db);
        let offering = post(&mut db, &owner, "Popular", dec!(1000));

        db.accept_offering(&first, offering.id, dec!(0.10)).unwrap();
        let err = db
            .accept_offering(&second, offering.id, dec!(0.10))
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::AlreadyAccepted));
    }

    #[test]
    fn unverified_tutor_is_refused_even_with_a_stale_flag() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = student(&mut db);
        let (user, _) = unverified_tutor(&mut db);
        let offering = post(&mut db, &owner, "Needs a pro", dec!(1000));

        let claims_verified = Actor::tutor(user.id, true);
        let err = db
            .accept_offering(&claims_verified, offering.id, dec!(0.10))
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::NotVerified));

        // Nothing was written.
        assert_eq!(
            db.get_offering(offering.id).unwrap().status,
            OfferingStatus::Pending
        );
        assert!(db.list_earnings_for_tutor(user.id).unwrap().is_empty());
    }

    #[test]
    fn cancelled_offering_cannot_be_accepted() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = student(&mut db);
        let tutor = verified_tutor(&mut db);
        let offering = post(&mut db, &owner, "Changed my mind", dec!(1000));
        db.cancel_offering(&owner, offering.id).unwrap();

        let err = db.accept_offering(&tutor, offering.id, dec!(0.10)).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn concurrent_accepts_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");

        let mut db = Database::open_at(&path).unwrap();
        let owner = student(&mut db);
        let tutors = [verified_tutor(&mut db), verified_tutor(&mut db)];
        let offering = post(&mut db, &owner, "Race", dec!(100000));
        drop(db);

        let barrier = Arc::new(Barrier::new(tutors.len()));
        let handles: Vec<_> = tutors
            .into_iter()
            .map(|tutor| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let mut db = Database::open_at(&path).unwrap();
                    barrier.wait();
                    db.accept_offering(&tutor, offering.id, dec!(0.10))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);

        let loser = results.into_iter().find_map(|r| r.err()).unwrap();
        assert_eq!(loser.as_domain(), Some(&DomainError::AlreadyAccepted));

        let db = Database::open_at(&path).unwrap();
        let count: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM earnings WHERE offering_id = ?1",
                params![offering.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
