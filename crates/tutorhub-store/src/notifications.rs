//! Notification inbox records and per-user channel preferences.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use tutorhub_shared::DomainError;

use crate::codec::{col_bool, col_json, col_opt_ts, col_ts, col_uuid, fmt_ts, now};
use crate::database::Database;
use crate::error::Result;
use crate::models::{
    page_number, page_offset, NewNotification, Notification, NotificationPreference, Page,
};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, message, action_url, action_label, data, created_at, read_at";

impl Database {
    pub fn insert_notification(&self, input: NewNotification) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            kind: input.kind,
            message: input.message,
            action_url: input.action_url,
            action_label: input.action_label,
            data: input.data,
            created_at: now(),
            read_at: None,
        };

        self.conn().execute(
            &format!(
                "INSERT INTO notifications ({NOTIFICATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)"
            ),
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.kind,
                notification.message,
                notification.action_url,
                notification.action_label,
                serde_json::to_string(&notification.data)?,
                fmt_ts(&notification.created_at),
            ],
        )?;

        Ok(notification)
    }

    /// A user's inbox, newest first.
    pub fn list_notifications(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Notification>> {
        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![user_id.to_string(), per_page, page_offset(page, per_page)],
            row_to_notification,
        )?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(Page::new(items, page_number(page), per_page, total as u64))
    }

    pub fn unread_notification_count(&self, user_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read_at IS NULL",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Mark one of the user's notifications read.  Repeats are no-ops.
    pub fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification> {
        self.conn().execute(
            "UPDATE notifications SET read_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND read_at IS NULL",
            params![fmt_ts(&now()), id.to_string(), user_id.to_string()],
        )?;

        // Someone else's notification is reported as missing.
        self.conn()
            .query_row(
                &format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     WHERE id = ?1 AND user_id = ?2"
                ),
                params![id.to_string(), user_id.to_string()],
                row_to_notification,
            )
            .optional()?
            .ok_or_else(|| DomainError::NotFound("notification").into())
    }

    /// Returns how many notifications changed.
    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE notifications SET read_at = ?1 WHERE user_id = ?2 AND read_at IS NULL",
            params![fmt_ts(&now()), user_id.to_string()],
        )?;
        Ok(changed)
    }

    /// Channel preferences; everything is enabled until the user says
    /// otherwise.
    pub fn get_preferences(&self, user_id: Uuid) -> Result<NotificationPreference> {
        let stored = self
            .conn()
            .query_row(
                "SELECT email, push, in_app FROM notification_preferences WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| {
                    Ok(NotificationPreference {
                        email: col_bool(row, 0)?,
                        push: col_bool(row, 1)?,
                        in_app: col_bool(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(stored.unwrap_or_default())
    }

    pub fn set_preferences(
        &self,
        user_id: Uuid,
        prefs: NotificationPreference,
    ) -> Result<NotificationPreference> {
        self.conn().execute(
            "INSERT INTO notification_preferences (user_id, email, push, in_app)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE
             SET email = excluded.email, push = excluded.push, in_app = excluded.in_app",
            params![
                user_id.to_string(),
                prefs.email as i32,
                prefs.push as i32,
                prefs.in_app as i32,
            ],
        )?;
        Ok(prefs)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: col_uuid(row, 0)?,
        user_id: col_uuid(row, 1)?,
        kind: row.get(2)?,
        message: row.get(3)?,
        action_url: row.get(4)?,
        action_label: row.get(5)?,
        data: col_json(row, 6)?,
        created_at: col_ts(row, 7)?,
        read_at: col_opt_ts(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use serde_json::json;

    fn note(user_id: Uuid, message: &str) -> NewNotification {
        NewNotification {
            user_id,
            kind: "new_message".into(),
            message: message.into(),
            action_url: Some("http://localhost:8080/offerings/1".into()),
            action_label: Some("View".into()),
            data: json!({ "offering_id": "1" }),
        }
    }

    #[test]
    fn inbox_is_newest_first() {
        let mut db = Database::open_in_memory().unwrap();
        let user = student(&mut db);
        db.insert_notification(note(user.id, "first")).unwrap();
        db.insert_notification(note(user.id, "second")).unwrap();

        let page = db.list_notifications(user.id, 1, 20).unwrap();
        let messages: Vec<_> = page.items.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
        assert_eq!(page.items[0].data, json!({ "offering_id": "1" }));
        assert!(page.items.iter().all(|n| n.read_at.is_none()));
    }

    #[test]
    fn read_state() {
        let mut db = Database::open_in_memory().unwrap();
        let user = student(&mut db);
        let other = student(&mut db);
        let a = db.insert_notification(note(user.id, "a")).unwrap();
        db.insert_notification(note(user.id, "b")).unwrap();
        db.insert_notification(note(user.id, "c")).unwrap();
        assert_eq!(db.unread_notification_count(user.id).unwrap(), 3);

        let read = db.mark_notification_read(a.id, user.id).unwrap();
        let read_at = read.read_at.expect("marked");
        let again = db.mark_notification_read(a.id, user.id).unwrap();
        assert_eq!(again.read_at, Some(read_at));

        assert!(matches!(
            db.mark_notification_read(a.id, other.id).unwrap_err().as_domain(),
            Some(DomainError::NotFound("notification"))
        ));

        assert_eq!(db.mark_all_notifications_read(user.id).unwrap(), 2);
        assert_eq!(db.unread_notification_count(user.id).unwrap(), 0);
    }

    #[test]
    fn preferences_default_to_everything() {
        let mut db = Database::open_in_memory().unwrap();
        let user = student(&mut db);
        assert_eq!(
            db.get_preferences(user.id).unwrap(),
            NotificationPreference::default()
        );

        let quiet = NotificationPreference {
            email: false,
            push: false,
            in_app: true,
        };
        db.set_preferences(user.id, quiet).unwrap();
        assert_eq!(db.get_preferences(user.id).unwrap(), quiet);

        db.set_preferences(user.id, NotificationPreference::default())
            .unwrap();
        assert!(db.get_preferences(user.id).unwrap().email);
    }
}
