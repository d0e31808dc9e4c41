//! Tutor earnings ledger.

use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use tutorhub_shared::money::{from_cents, growth_percent, to_cents};
use tutorhub_shared::{DomainError, EarningStatus};

use crate::codec::{col_enum, col_opt_ts, col_ts, col_uuid, fmt_opt_ts, fmt_ts, not_found, now};
use crate::database::Database;
use crate::error::Result;
use crate::models::{Earning, EarningsSummary};

const EARNING_COLUMNS: &str =
    "id, tutor_id, offering_id, amount_cents, commission_cents, status, paid_at, created_at";

impl Database {
    pub fn get_earning(&self, id: Uuid) -> Result<Earning> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {EARNING_COLUMNS} FROM earnings WHERE id = ?1 AND deleted_at IS NULL"
                ),
                params![id.to_string()],
                row_to_earning,
            )
            .map_err(not_found("earning"))
    }

    /// All live earnings of a tutor, newest first.
    pub fn list_earnings_for_tutor(&self, tutor_id: Uuid) -> Result<Vec<Earning>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {EARNING_COLUMNS} FROM earnings
             WHERE tutor_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![tutor_id.to_string()], row_to_earning)?;

        let mut earnings = Vec::new();
        for row in rows {
            earnings.push(row?);
        }
        Ok(earnings)
    }

    /// Record the outcome of a payout.  Only pending earnings settle, and
    /// `paid_at` is set exactly when the new status is `paid`.
    pub fn settle_earning(&mut self, id: Uuid, status: EarningStatus) -> Result<Earning> {
        let tx = self.write_tx()?;
        let current: EarningStatus = tx
            .query_row(
                "SELECT status FROM earnings WHERE id = ?1 AND deleted_at IS NULL",
                params![id.to_string()],
                |row| col_enum(row, 0),
            )
            .map_err(not_found("earning"))?;

        if !current.can_transition_to(status) {
            return Err(DomainError::conflict(format!(
                "cannot settle a {current} earning as {status}"
            ))
            .into());
        }

        let paid_at = (status == EarningStatus::Paid).then(now);
        tx.execute(
            "UPDATE earnings SET status = ?1, paid_at = ?2 WHERE id = ?3",
            params![status.as_str(), fmt_opt_ts(&paid_at), id.to_string()],
        )?;
        tx.commit()?;

        tracing::info!(earning = %id, status = status.as_str(), "earning settled");
        self.get_earning(id)
    }

    /// Dashboard totals for one tutor as of `now`.
    ///
    /// Monthly figures count paid earnings by the month they were paid in.
    pub fn earnings_summary(&self, tutor_id: Uuid, now: DateTime<Utc>) -> Result<EarningsSummary> {
        let this_month_start = month_start(now);
        let last_month_start = this_month_start
            .checked_sub_months(Months::new(1))
            .unwrap_or(this_month_start);

        let total_paid = self.sum_amount(tutor_id, EarningStatus::Paid, None)?;
        let pending = self.sum_amount(tutor_id, EarningStatus::Pending, None)?;
        let this_month =
            self.sum_amount(tutor_id, EarningStatus::Paid, Some((this_month_start, now)))?;
        let last_month = self.sum_amount(
            tutor_id,
            EarningStatus::Paid,
            Some((last_month_start, this_month_start)),
        )?;

        Ok(EarningsSummary {
            total_paid,
            pending,
            this_month,
            last_month,
            growth_percent: growth_percent(this_month, last_month),
        })
    }

    /// Sum of `amount` for one status, optionally limited to a `paid_at`
    /// window `[from, to)`.
    fn sum_amount(
        &self,
        tutor_id: Uuid,
        status: EarningStatus,
        paid_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Decimal> {
        let cents: i64 = match paid_between {
            None => self.conn().query_row(
                "SELECT COALESCE(SUM(amount_cents), 0) FROM earnings
                 WHERE tutor_id = ?1 AND status = ?2 AND deleted_at IS NULL",
                params![tutor_id.to_string(), status.as_str()],
                |row| row.get(0),
            )?,
            Some((from, to)) => self.conn().query_row(
                "SELECT COALESCE(SUM(amount_cents), 0) FROM earnings
                 WHERE tutor_id = ?1 AND status = ?2 AND deleted_at IS NULL
                   AND paid_at >= ?3 AND paid_at < ?4",
                params![tutor_id.to_string(), status.as_str(), fmt_ts(&from), fmt_ts(&to)],
                |row| row.get(0),
            )?,
        };
        Ok(from_cents(cents))
    }
}

fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(ts)
}

pub(crate) fn insert_earning(conn: &Connection, earning: &Earning) -> Result<()> {
    let amount = to_cents(earning.amount)
        .ok_or_else(|| DomainError::validation("earning amount is too large"))?;
    let commission = to_cents(earning.commission)
        .ok_or_else(|| DomainError::validation("commission is too large"))?;

    conn.execute(
        &format!(
            "INSERT INTO earnings ({EARNING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            earning.id.to_string(),
            earning.tutor_id.to_string(),
            earning.offering_id.to_string(),
            amount,
            commission,
            earning.status.as_str(),
            fmt_opt_ts(&earning.paid_at),
            fmt_ts(&earning.created_at),
        ],
    )?;
    Ok(())
}

fn row_to_earning(row: &rusqlite::Row<'_>) -> rusqlite::Result<Earning> {
    let amount: i64 = row.get(3)?;
    let commission: i64 = row.get(4)?;
    Ok(Earning {
        id: col_uuid(row, 0)?,
        tutor_id: col_uuid(row, 1)?,
        offering_id: col_uuid(row, 2)?,
        amount: from_cents(amount),
        commission: from_cents(commission),
        status: col_enum(row, 5)?,
        paid_at: col_opt_ts(row, 6)?,
        created_at: col_ts(row, 7)?,
    })
}
