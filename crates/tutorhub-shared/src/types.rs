use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Returned when a persisted or user-supplied string names no known variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "tutor" => Ok(Role::Tutor),
            "admin" => Ok(Role::Admin),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

/// The authenticated caller of an operation.
///
/// Authentication happens outside this workspace; every operation receives
/// the resolved actor explicitly instead of reading ambient request state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    /// True only for tutors whose profile has been approved.
    pub verified: bool,
}

impl Actor {
    pub fn student(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Student,
            verified: false,
        }
    }

    pub fn tutor(id: Uuid, verified: bool) -> Self {
        Self {
            id,
            role: Role::Tutor,
            verified,
        }
    }

    pub fn admin(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Admin,
            verified: false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_verified_tutor(&self) -> bool {
        self.role == Role::Tutor && self.verified
    }
}

// ---------------------------------------------------------------------------
// Offering status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OfferingStatus {
    Pending,
    Open,
    Accepted,
    Completed,
    Cancelled,
}

impl OfferingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferingStatus::Pending => "pending",
            OfferingStatus::Open => "open",
            OfferingStatus::Accepted => "accepted",
            OfferingStatus::Completed => "completed",
            OfferingStatus::Cancelled => "cancelled",
        }
    }

    /// `completed` and `cancelled` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OfferingStatus::Completed | OfferingStatus::Cancelled)
    }

    /// The allowed transition graph.
    pub fn can_transition_to(&self, next: OfferingStatus) -> bool {
        use OfferingStatus::*;
        match (self, next) {
            (Pending, Open) => true,
            (Pending | Open, Accepted) => true,
            (Accepted, Completed) => true,
            (Pending | Open | Accepted, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OfferingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OfferingStatus::Pending),
            "open" => Ok(OfferingStatus::Open),
            "accepted" => Ok(OfferingStatus::Accepted),
            "completed" => Ok(OfferingStatus::Completed),
            "cancelled" => Ok(OfferingStatus::Cancelled),
            other => Err(ParseEnumError::new("offering status", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Earning status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EarningStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl EarningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EarningStatus::Pending => "pending",
            EarningStatus::Paid => "paid",
            EarningStatus::Failed => "failed",
            EarningStatus::Refunded => "refunded",
        }
    }

    /// Settlement only ever leaves `pending`.
    pub fn can_transition_to(&self, next: EarningStatus) -> bool {
        *self == EarningStatus::Pending && next != EarningStatus::Pending
    }
}

impl fmt::Display for EarningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EarningStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EarningStatus::Pending),
            "paid" => Ok(EarningStatus::Paid),
            "failed" => Ok(EarningStatus::Failed),
            "refunded" => Ok(EarningStatus::Refunded),
            other => Err(ParseEnumError::new("earning status", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tutor verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VerificationStatus::Pending),
            "approved" => Ok(VerificationStatus::Approved),
            "rejected" => Ok(VerificationStatus::Rejected),
            other => Err(ParseEnumError::new("verification status", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Listing order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Latest,
    Oldest,
    BudgetHigh,
    BudgetLow,
    Deadline,
}
