//! Offering conversations and their read state.

use rusqlite::{params, Connection};
use uuid::Uuid;

use tutorhub_shared::constants::MESSAGE_PAGE_SIZE;
use tutorhub_shared::{Actor, DomainError};

use crate::codec::{col_json, col_opt_ts, col_ts, col_uuid, fmt_ts, not_found, now};
use crate::database::Database;
use crate::error::Result;
use crate::models::{page_number, page_offset, Message, Page, SentMessage};
use crate::offerings::load_offering;
use crate::policy;
use crate::validation::validate_message_content;

const MESSAGE_COLUMNS: &str = "id, offering_id, sender_id, content, attachments, read_at, created_at";

impl Database {
    /// Store a message from one participant of an offering.
    ///
    /// `attachments` are blob-store paths that have already been written.
    /// The offering's activity timestamp moves in the same transaction.
    pub fn send_message(
        &mut self,
        sender: &Actor,
        offering_id: Uuid,
        content: &str,
        attachments: Vec<String>,
    ) -> Result<SentMessage> {
        validate_message_content(content)?;

        let now = now();
        let tx = self.write_tx()?;

        let offering = load_offering(&tx, offering_id)?;
        policy::ensure_participant(sender, &offering)?;

        let message = Message {
            id: Uuid::new_v4(),
            offering_id,
            sender_id: sender.id,
            content: content.to_string(),
            attachments,
            read_at: None,
            created_at: now,
        };

        tx.execute(
            &format!(
                "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)"
            ),
            params![
                message.id.to_string(),
                offering_id.to_string(),
                sender.id.to_string(),
                message.content,
                serde_json::to_string(&message.attachments)?,
                fmt_ts(&now),
            ],
        )?;
        tx.execute(
            "UPDATE offerings SET last_activity_at = ?1 WHERE id = ?2",
            params![fmt_ts(&now), offering_id.to_string()],
        )?;

        tx.commit()?;

        tracing::debug!(message = %message.id, offering = %offering_id, "message sent");

        Ok(SentMessage {
            recipient_id: policy::counterparty(&offering, sender.id),
            offering_title: offering.title,
            message,
        })
    }

    /// Mark one message read by `reader`.
    ///
    /// Idempotent: a message already read, or one `reader` sent, comes back
    /// unchanged.
    pub fn mark_message_read(&mut self, id: Uuid, reader: &Actor) -> Result<Message> {
        let tx = self.write_tx()?;

        let message = load_message(&tx, id)?;
        let offering = load_offering(&tx, message.offering_id)?;
        policy::ensure_participant(reader, &offering)?;

        if message.sender_id == reader.id || message.read_at.is_some() {
            return Ok(message);
        }

        tx.execute(
            "UPDATE messages SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
            params![fmt_ts(&now()), id.to_string()],
        )?;
        let message = load_message(&tx, id)?;
        tx.commit()?;

        Ok(message)
    }

    /// One page of an offering's conversation, newest first.
    ///
    /// Opening the conversation marks everything the requester received as
    /// read, in a single statement, before the page is fetched.
    pub fn list_messages(
        &mut self,
        offering_id: Uuid,
        requester: &Actor,
        page: u32,
    ) -> Result<Page<Message>> {
        let per_page = MESSAGE_PAGE_SIZE;
        let tx = self.write_tx()?;

        let offering = load_offering(&tx, offering_id)?;
        policy::ensure_participant(requester, &offering)?;

        let marked = tx.execute(
            "UPDATE messages SET read_at = ?1
             WHERE offering_id = ?2 AND sender_id != ?3
               AND read_at IS NULL AND deleted_at IS NULL",
            params![
                fmt_ts(&now()),
                offering_id.to_string(),
                requester.id.to_string()
            ],
        )?;

        let total: i64 = tx.query_row(
            "SELECT COUNT(*) FROM messages WHERE offering_id = ?1 AND deleted_at IS NULL",
            params![offering_id.to_string()],
            |row| row.get(0),
        )?;

        let items = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE offering_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(
                params![offering_id.to_string(), per_page, page_offset(page, per_page)],
                row_to_message,
            )?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            items
        };

        tx.commit()?;

        if marked > 0 {
            tracing::debug!(offering = %offering_id, reader = %requester.id, marked, "messages marked read");
        }

        Ok(Page::new(items, page_number(page), per_page, total as u64))
    }

    /// Messages in the offering that `user` received and has not read.
    pub fn unread_count(&self, offering_id: Uuid, user: &Actor) -> Result<u64> {
        let offering = load_offering(self.conn(), offering_id)?;
        policy::ensure_participant(user, &offering)?;

        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE offering_id = ?1 AND sender_id != ?2
               AND read_at IS NULL AND deleted_at IS NULL",
            params![offering_id.to_string(), user.id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Soft-delete a message.  Only its sender may do this.  Returns the
    /// message so the caller can remove its stored files.
    pub fn delete_message(&mut self, id: Uuid, requester: &Actor) -> Result<Message> {
        let tx = self.write_tx()?;
        let message = load_message(&tx, id)?;
        if message.sender_id != requester.id {
            return Err(DomainError::forbidden("only the sender can delete a message").into());
        }

        tx.execute(
            "UPDATE messages SET deleted_at = ?1 WHERE id = ?2",
            params![fmt_ts(&now()), id.to_string()],
        )?;
        tx.commit()?;

        tracing::debug!(message = %id, "message deleted");
        Ok(message)
    }
}

fn load_message(conn: &Connection, id: Uuid) -> Result<Message> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND deleted_at IS NULL"),
        params![id.to_string()],
        row_to_message,
    )
    .map_err(not_found("message"))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: col_uuid(row, 0)?,
        offering_id: col_uuid(row, 1)?,
        sender_id: col_uuid(row, 2)?,
        content: row.get(3)?,
        attachments: col_json(row, 4)?,
        read_at: col_opt_ts(row, 5)?,
        created_at: col_ts(row, 6)?,
    })
}
