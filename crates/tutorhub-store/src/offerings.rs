//! CRUD and lifecycle operations for [`Offering`] records.

use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

use tutorhub_shared::money::{from_cents, to_cents};
use tutorhub_shared::{Actor, DomainError, OfferingStatus};

use crate::codec::{
    col_enum, col_json, col_opt_ts, col_opt_uuid, col_ts, col_uuid, fmt_opt_ts, fmt_ts,
    not_found, now,
};
use crate::database::Database;
use crate::error::Result;
use crate::filter::{OfferingFilters, OfferingQuery};
use crate::lifecycle;
use crate::models::{
    page_number, page_offset, Attachment, DeletedOffering, NewOffering, Offering, OfferingPatch,
    Page,
};
use crate::policy;
use crate::validation::{validate_new_offering, validate_patch};

pub(crate) const OFFERING_COLUMNS: &str = "id, student_id, tutor_id, title, description, \
     budget_cents, deadline, status, attachments, attachment_count, total_attachment_size, \
     last_activity_at, created_at, updated_at, deleted_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Post a new offering.  It always starts out `pending`.
    pub fn create_offering(&mut self, owner: &Actor, input: NewOffering) -> Result<Offering> {
        policy::ensure_student(owner)?;
        let now = now();
        validate_new_offering(&input, now)?;

        let mut offering = Offering {
            id: Uuid::new_v4(),
            student_id: owner.id,
            tutor_id: None,
            title: input.title.trim().to_string(),
            description: input.description,
            budget: input.budget,
            deadline: input.deadline,
            status: OfferingStatus::Pending,
            attachments: input.attachments,
            attachment_count: 0,
            total_attachment_size: 0,
            last_activity_at: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        lifecycle::prepare_write(&mut offering, now);

        insert_offering(self.conn(), &offering)?;

        tracing::info!(
            offering = %offering.id,
            student = %owner.id,
            budget = %offering.budget,
            "offering created"
        );
        // Re-read so the caller sees exactly what was persisted.
        load_offering(self.conn(), offering.id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a live (not soft-deleted) offering.
    pub fn get_offering(&self, id: Uuid) -> Result<Offering> {
        load_offering(self.conn(), id)
    }

    /// One page of offerings matching `filters`.
    pub fn list_offerings(
        &self,
        filters: &OfferingFilters,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Offering>> {
        let query = OfferingQuery::build(filters);
        let where_sql = query.where_sql();

        let total: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM offerings WHERE {where_sql}"),
            params_from_iter(query.params().iter()),
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {OFFERING_COLUMNS} FROM offerings WHERE {where_sql} \
             ORDER BY {} LIMIT {} OFFSET {}",
            query.order_sql(),
            per_page,
            page_offset(page, per_page),
        ))?;
        let rows = stmt.query_map(params_from_iter(query.params().iter()), row_to_offering)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }

        Ok(Page::new(items, page_number(page), per_page, total as u64))
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Edit title, description, budget or deadline.  Owner only, pending only.
    pub fn update_offering(
        &mut self,
        actor: &Actor,
        id: Uuid,
        patch: OfferingPatch,
    ) -> Result<Offering> {
        let now = now();
        validate_patch(&patch, now)?;

        self.mutate_offering(id, |offering| {
            policy::ensure_owner(actor, offering)?;
            lifecycle::apply_patch(offering, patch, now)
        })
    }

    /// `pending → open`: the owner makes the offering explicitly public.
    pub fn publish_offering(&mut self, actor: &Actor, id: Uuid) -> Result<Offering> {
        self.mutate_offering(id, |offering| {
            policy::ensure_owner(actor, offering)?;
            lifecycle::transition(offering, OfferingStatus::Open, now())
        })
    }

    /// `accepted → completed`: the owner confirms delivery.
    pub fn complete_offering(&mut self, actor: &Actor, id: Uuid) -> Result<Offering> {
        self.mutate_offering(id, |offering| {
            policy::ensure_owner(actor, offering)?;
            lifecycle::transition(offering, OfferingStatus::Completed, now())
        })
    }

    /// Any non-terminal state `→ cancelled`.  Owner or admin.
    pub fn cancel_offering(&mut self, actor: &Actor, id: Uuid) -> Result<Offering> {
        self.mutate_offering(id, |offering| {
            policy::ensure_owner_or_admin(actor, offering)?;
            lifecycle::transition(offering, OfferingStatus::Cancelled, now())
        })
    }

    pub fn add_attachment(
        &mut self,
        actor: &Actor,
        id: Uuid,
        attachment: Attachment,
    ) -> Result<Offering> {
        crate::validation::validate_attachment_size(attachment.size)?;
        self.mutate_offering(id, |offering| {
            policy::ensure_owner(actor, offering)?;
            lifecycle::add_attachment(offering, attachment, now())
        })
    }

    /// Remove an attachment entry.  Returns the updated offering and the
    /// removed entry, whose file the caller deletes after commit.
    pub fn remove_attachment(
        &mut self,
        actor: &Actor,
        id: Uuid,
        path: &str,
    ) -> Result<(Offering, Attachment)> {
        let mut removed = None;
        let offering = self.mutate_offering(id, |offering| {
            policy::ensure_owner(actor, offering)?;
            removed = Some(lifecycle::remove_attachment(offering, path, now())?);
            Ok(())
        })?;
        let removed = removed.ok_or(DomainError::NotFound("attachment"))?;
        Ok((offering, removed))
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Soft-delete an offering with its messages and earning.
    ///
    /// Returns every stored file path belonging to the offering and its
    /// messages; the caller removes them once this has committed.
    pub fn delete_offering(&mut self, actor: &Actor, id: Uuid) -> Result<DeletedOffering> {
        let now = now();
        let tx = self.write_tx()?;

        let offering = load_offering(&tx, id)?;
        policy::ensure_owner_or_admin(actor, &offering)?;

        let mut file_paths: Vec<String> =
            offering.attachments.iter().map(|a| a.path.clone()).collect();

        {
            let mut stmt = tx.prepare(
                "SELECT attachments FROM messages WHERE offering_id = ?1 AND deleted_at IS NULL",
            )?;
            let rows = stmt.query_map(params![id.to_string()], |row| col_json::<Vec<String>>(row, 0))?;
            for row in rows {
                file_paths.extend(row?);
            }
        }

        let ts = fmt_ts(&now);
        tx.execute(
            "UPDATE offerings SET deleted_at = ?1, updated_at = ?1, last_activity_at = ?1
             WHERE id = ?2",
            params![ts, id.to_string()],
        )?;
        tx.execute(
            "UPDATE messages SET deleted_at = ?1 WHERE offering_id = ?2 AND deleted_at IS NULL",
            params![ts, id.to_string()],
        )?;
        tx.execute(
            "UPDATE earnings SET deleted_at = ?1 WHERE offering_id = ?2 AND deleted_at IS NULL",
            params![ts, id.to_string()],
        )?;

        tx.commit()?;

        tracing::info!(
            offering = %id,
            actor = %actor.id,
            files = file_paths.len(),
            "offering deleted"
        );

        Ok(DeletedOffering {
            offering,
            file_paths,
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Load, mutate and save an offering inside one write transaction.
    ///
    /// `apply` is responsible for the policy check and for calling the
    /// lifecycle function that normalizes the row before it is written.
    fn mutate_offering<F>(&mut self, id: Uuid, apply: F) -> Result<Offering>
    where
        F: FnOnce(&mut Offering) -> std::result::Result<(), DomainError>,
    {
        let tx = self.write_tx()?;
        let mut offering = load_offering(&tx, id)?;
        let before = offering.status;

        apply(&mut offering)?;
        save_offering(&tx, &offering)?;
        tx.commit()?;

        tracing::debug!(
            offering = %id,
            from = %before,
            to = %offering.status,
            "offering updated"
        );
        Ok(offering)
    }
}

/// Load a live offering through any connection or transaction.
pub(crate) fn load_offering(conn: &Connection, id: Uuid) -> Result<Offering> {
    conn.query_row(
        &format!("SELECT {OFFERING_COLUMNS} FROM offerings WHERE id = ?1 AND deleted_at IS NULL"),
        params![id.to_string()],
        row_to_offering,
    )
    .map_err(not_found("offering"))
}

fn budget_cents(offering: &Offering) -> Result<i64> {
    to_cents(offering.budget)
        .ok_or_else(|| DomainError::validation("budget is too large").into())
}

fn insert_offering(conn: &Connection, offering: &Offering) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO offerings ({OFFERING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            offering.id.to_string(),
            offering.student_id.to_string(),
            offering.tutor_id.map(|t| t.to_string()),
            offering.title,
            offering.description,
            budget_cents(offering)?,
            fmt_ts(&offering.deadline),
            offering.status.as_str(),
            serde_json::to_string(&offering.attachments)?,
            offering.attachment_count,
            offering.total_attachment_size as i64,
            fmt_ts(&offering.last_activity_at),
            fmt_ts(&offering.created_at),
            fmt_ts(&offering.updated_at),
            fmt_opt_ts(&offering.deleted_at),
        ],
    )?;
    Ok(())
}

/// Write back every mutable column of an already-normalized offering.
fn save_offering(conn: &Connection, offering: &Offering) -> Result<()> {
    conn.execute(
        "UPDATE offerings
         SET tutor_id = ?1, title = ?2, description = ?3, budget_cents = ?4, deadline = ?5,
             status = ?6, attachments = ?7, attachment_count = ?8,
             total_attachment_size = ?9, last_activity_at = ?10, updated_at = ?11
         WHERE id = ?12 AND deleted_at IS NULL",
        params![
            offering.tutor_id.map(|t| t.to_string()),
            offering.title,
            offering.description,
            budget_cents(offering)?,
            fmt_ts(&offering.deadline),
            offering.status.as_str(),
            serde_json::to_string(&offering.attachments)?,
            offering.attachment_count,
            offering.total_attachment_size as i64,
            fmt_ts(&offering.last_activity_at),
            fmt_ts(&offering.updated_at),
            offering.id.to_string(),
        ],
    )?;
    Ok(())
}

pub(crate) fn row_to_offering(row: &rusqlite::Row<'_>) -> rusqlite::Result<Offering> {
    let budget_cents: i64 = row.get(5)?;
    let attachments: Vec<Attachment> = col_json(row, 8)?;
    let attachment_count: u32 = row.get(9)?;
    let total_size: i64 = row.get(10)?;

    Ok(Offering {
        id: col_uuid(row, 0)?,
        student_id: col_uuid(row, 1)?,
        tutor_id: col_opt_uuid(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        budget: from_cents(budget_cents),
        deadline: col_ts(row, 6)?,
        status: col_enum(row, 7)?,
        attachments,
        attachment_count,
        total_attachment_size: total_size as u64,
        last_activity_at: col_ts(row, 11)?,
        created_at: col_ts(row, 12)?,
        updated_at: col_ts(row, 13)?,
        deleted_at: col_opt_ts(row, 14)?,
    })
}
