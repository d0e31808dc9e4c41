//! Fixtures shared by the store's unit tests.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use tutorhub_shared::{Actor, Role};

use crate::database::Database;
use crate::models::{NewOffering, NewUser, Offering, TutorProfile, User};

fn register(db: &mut Database, role: Role) -> (User, Option<TutorProfile>) {
    db.create_user(NewUser {
        name: format!("{} user", role.as_str()),
        email: format!("{}-{}@example.com", role.as_str(), Uuid::new_v4()),
        role,
        subjects: vec!["mathematics".into()],
        hourly_rate: None,
    })
    .expect("register user")
}

pub fn student(db: &mut Database) -> Actor {
    let (user, _) = register(db, Role::Student);
    Actor::student(user.id)
}

pub fn admin(db: &mut Database) -> Actor {
    let (user, _) = register(db, Role::Admin);
    Actor::admin(user.id)
}

pub fn unverified_tutor(db: &mut Database) -> (User, TutorProfile) {
    let (user, profile) = register(db, Role::Tutor);
    (user, profile.expect("tutor profile"))
}

pub fn verified_tutor(db: &mut Database) -> Actor {
    let admin = admin(db);
    let (user, profile) = unverified_tutor(db);
    db.set_tutor_verification(&admin, profile.id, true, None)
        .expect("approve tutor");
    Actor::tutor(user.id, true)
}

pub fn new_offering(title: &str, budget: Decimal) -> NewOffering {
    NewOffering {
        title: title.into(),
        description: format!("Details for {title}"),
        budget,
        deadline: Utc::now() + Duration::days(7),
        attachments: Vec::new(),
    }
}

pub fn post(db: &mut Database, owner: &Actor, title: &str, budget: Decimal) -> Offering {
    db.create_offering(owner, new_offering(title, budget))
        .expect("create offering")
}
