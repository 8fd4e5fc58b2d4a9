//! Owner-scoped notes with created/updated timestamps.

use crate::store::Store;
use anyhow::{bail, Result};
use chrono::Utc;

/// A stored note.
#[derive(Debug, Clone)]
pub struct Note {
    pub id: i64,
    pub owner: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Note persistence over the shared database handle.
pub struct NoteStore {
    store: Store,
}

impl NoteStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert a note for `owner`. Returns its id.
    pub fn create(&self, owner: &str, title: &str, content: &str) -> Result<i64> {
        let title = title.trim();
        if title.is_empty() {
            bail!("Note title cannot be empty");
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT INTO notes (owner, title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![owner, title, content, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch one note. Rows belonging to another owner read as absent.
    pub fn get(&self, owner: &str, id: i64) -> Result<Option<Note>> {
        let conn = self.store.conn()?;
        let row = conn.query_row(
            "SELECT id, owner, title, content, created_at, updated_at
             FROM notes WHERE id = ?1 AND owner = ?2",
            rusqlite::params![id, owner],
            |row| {
                Ok(Note {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    title: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        );

        match row {
            Ok(note) => Ok(Some(note)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All notes for `owner`, most recently touched first.
    pub fn list(&self, owner: &str) -> Result<Vec<Note>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, title, content, created_at, updated_at
             FROM notes WHERE owner = ?1 ORDER BY updated_at DESC, id DESC",
        )?;
        let notes = stmt
            .query_map(rusqlite::params![owner], |row| {
                Ok(Note {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    title: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Replace title and content, touching `updated_at`. Returns whether a
    /// row belonging to `owner` changed.
    pub fn update(&self, owner: &str, id: i64, title: &str, content: &str) -> Result<bool> {
        let title = title.trim();
        if title.is_empty() {
            bail!("Note title cannot be empty");
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.store.conn()?;
        let changed = conn.execute(
            "UPDATE notes SET title = ?1, content = ?2, updated_at = ?3
             WHERE id = ?4 AND owner = ?5",
            rusqlite::params![title, content, now, id, owner],
        )?;
        Ok(changed > 0)
    }

    /// Delete a note. Returns whether a row was removed.
    pub fn delete(&self, owner: &str, id: i64) -> Result<bool> {
        let conn = self.store.conn()?;
        let deleted = conn.execute(
            "DELETE FROM notes WHERE id = ?1 AND owner = ?2",
            rusqlite::params![id, owner],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, NoteStore) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("desk.db")).unwrap();
        store.migrate().unwrap();
        (tmp, NoteStore::new(store))
    }

    #[test]
    fn create_and_get_roundtrip() {
        let (_tmp, notes) = test_store();

        let id = notes.create("ana", "Groceries", "milk, bread").unwrap();
        let note = notes.get("ana", id).unwrap().unwrap();
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "milk, bread");
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn empty_title_is_rejected() {
        let (_tmp, notes) = test_store();

        assert!(notes.create("ana", "  ", "body").is_err());
    }

    #[test]
    fn rows_are_owner_scoped() {
        let (_tmp, notes) = test_store();

        let id = notes.create("ana", "Private", "secret").unwrap();
        assert!(notes.get("bruno", id).unwrap().is_none());
        assert!(!notes.delete("bruno", id).unwrap());
        assert!(notes.get("ana", id).unwrap().is_some());
    }

    #[test]
    fn update_touches_updated_at_only() {
        let (_tmp, notes) = test_store();

        let id = notes.create("ana", "Draft", "v1").unwrap();
        let before = notes.get("ana", id).unwrap().unwrap();

        assert!(notes.update("ana", id, "Draft", "v2").unwrap());
        let after = notes.get("ana", id).unwrap().unwrap();
        assert_eq!(after.content, "v2");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= after.created_at);
    }

    #[test]
    fn update_unknown_id_changes_nothing() {
        let (_tmp, notes) = test_store();

        assert!(!notes.update("ana", 404, "Title", "body").unwrap());
    }

    #[test]
    fn list_returns_only_the_owners_rows() {
        let (_tmp, notes) = test_store();

        notes.create("ana", "One", "").unwrap();
        notes.create("ana", "Two", "").unwrap();
        notes.create("bruno", "Other", "").unwrap();

        let mine = notes.list("ana").unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|n| n.owner == "ana"));
    }

    #[test]
    fn delete_removes_the_row() {
        let (_tmp, notes) = test_store();

        let id = notes.create("ana", "Gone", "").unwrap();
        assert!(notes.delete("ana", id).unwrap());
        assert!(notes.get("ana", id).unwrap().is_none());
    }
}
