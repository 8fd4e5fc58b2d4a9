//! Private file archive: metadata rows + on-disk blobs.
//!
//! Uploads keep their original name for display and download, but the blob
//! on disk is named by a random UUID so nothing user-controlled touches the
//! filesystem layout. Small text files (see [`is_editable`]) can be edited
//! in place from the browser.

use crate::store::Store;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions that may be edited as text from the browser.
const EDITABLE_EXTENSIONS: &[&str] = &["txt", "md", "csv"];

/// Metadata for one archived file.
#[derive(Debug, Clone)]
pub struct ArchivedFile {
    pub id: i64,
    pub owner: String,
    pub original_name: String,
    pub stored_name: String,
    pub size_bytes: i64,
    pub uploaded_at: String,
}

/// Whether a file with this name may be edited as text in the browser.
pub fn is_editable(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            EDITABLE_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Archive persistence: rows in the shared database, blobs under one
/// uploads directory.
pub struct ArchiveStore {
    store: Store,
    uploads_dir: PathBuf,
}

impl ArchiveStore {
    /// Create the store, making sure the uploads directory exists.
    pub fn new(store: Store, uploads_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&uploads_dir).with_context(|| {
            format!("failed to create uploads dir {}", uploads_dir.display())
        })?;
        Ok(Self { store, uploads_dir })
    }

    /// Persist an upload for `owner`: blob first, then the metadata row.
    /// Returns the new row id.
    pub fn save(&self, owner: &str, original_name: &str, bytes: &[u8]) -> Result<i64> {
        // Keep only the final path component of whatever the client sent.
        let display_name = Path::new(original_name)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("")
            .to_string();
        if display_name.is_empty() {
            bail!("File name cannot be empty");
        }

        let stored_name = uuid::Uuid::new_v4().to_string();
        let blob_path = self.blob_path(&stored_name);
        fs::write(&blob_path, bytes)
            .with_context(|| format!("failed to write {}", blob_path.display()))?;

        let uploaded_at = Utc::now().to_rfc3339();
        let conn = self.store.conn()?;
        let inserted = conn.execute(
            "INSERT INTO files (owner, original_name, stored_name, size_bytes, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                owner,
                display_name,
                stored_name,
                bytes.len() as i64,
                uploaded_at
            ],
        );

        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) => {
                // Do not leave an orphaned blob behind.
                let _ = fs::remove_file(&blob_path);
                Err(e.into())
            }
        }
    }

    /// Fetch one file's metadata. Rows belonging to another owner read as
    /// absent.
    pub fn get(&self, owner: &str, id: i64) -> Result<Option<ArchivedFile>> {
        let conn = self.store.conn()?;
        let row = conn.query_row(
            "SELECT id, owner, original_name, stored_name, size_bytes, uploaded_at
             FROM files WHERE id = ?1 AND owner = ?2",
            rusqlite::params![id, owner],
            |row| {
                Ok(ArchivedFile {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    original_name: row.get(2)?,
                    stored_name: row.get(3)?,
                    size_bytes: row.get(4)?,
                    uploaded_at: row.get(5)?,
                })
            },
        );

        match row {
            Ok(file) => Ok(Some(file)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All files for `owner`, newest first.
    pub fn list(&self, owner: &str) -> Result<Vec<ArchivedFile>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, original_name, stored_name, size_bytes, uploaded_at
             FROM files WHERE owner = ?1 ORDER BY uploaded_at DESC, id DESC",
        )?;
        let files = stmt
            .query_map(rusqlite::params![owner], |row| {
                Ok(ArchivedFile {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    original_name: row.get(2)?,
                    stored_name: row.get(3)?,
                    size_bytes: row.get(4)?,
                    uploaded_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Delete a file's row and blob. A blob already gone is logged, not an
    /// error. Returns whether a row was removed.
    pub fn delete(&self, owner: &str, id: i64) -> Result<bool> {
        let Some(file) = self.get(owner, id)? else {
            return Ok(false);
        };

        let conn = self.store.conn()?;
        conn.execute(
            "DELETE FROM files WHERE id = ?1 AND owner = ?2",
            rusqlite::params![id, owner],
        )?;

        let blob_path = self.blob_path(&file.stored_name);
        if let Err(err) = fs::remove_file(&blob_path) {
            tracing::warn!(
                path = %blob_path.display(),
                "could not remove blob for deleted file: {err}"
            );
        }
        Ok(true)
    }

    /// Read a file's content from disk.
    pub fn read_content(&self, file: &ArchivedFile) -> Result<Vec<u8>> {
        let blob_path = self.blob_path(&file.stored_name);
        fs::read(&blob_path).with_context(|| format!("failed to read {}", blob_path.display()))
    }

    /// Overwrite a file's content on disk and record the new size.
    pub fn write_content(&self, file: &ArchivedFile, bytes: &[u8]) -> Result<()> {
        let blob_path = self.blob_path(&file.stored_name);
        fs::write(&blob_path, bytes)
            .with_context(|| format!("failed to write {}", blob_path.display()))?;

        let conn = self.store.conn()?;
        conn.execute(
            "UPDATE files SET size_bytes = ?1 WHERE id = ?2",
            rusqlite::params![bytes.len() as i64, file.id],
        )?;
        Ok(())
    }

    fn blob_path(&self, stored_name: &str) -> PathBuf {
        self.uploads_dir.join(stored_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, ArchiveStore) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("desk.db")).unwrap();
        store.migrate().unwrap();
        let archive = ArchiveStore::new(store, tmp.path().join("uploads")).unwrap();
        (tmp, archive)
    }

    #[test]
    fn save_and_read_roundtrip() {
        let (_tmp, archive) = test_store();

        let id = archive.save("ana", "notes.txt", b"hello").unwrap();
        let file = archive.get("ana", id).unwrap().unwrap();
        assert_eq!(file.original_name, "notes.txt");
        assert_eq!(file.size_bytes, 5);
        assert_eq!(archive.read_content(&file).unwrap(), b"hello");
    }

    #[test]
    fn client_path_components_are_stripped() {
        let (_tmp, archive) = test_store();

        let id = archive.save("ana", "../../etc/passwd", b"x").unwrap();
        let file = archive.get("ana", id).unwrap().unwrap();
        assert_eq!(file.original_name, "passwd");
    }

    #[test]
    fn empty_file_name_is_rejected() {
        let (_tmp, archive) = test_store();

        assert!(archive.save("ana", "", b"x").is_err());
    }

    #[test]
    fn rows_are_owner_scoped() {
        let (_tmp, archive) = test_store();

        let id = archive.save("ana", "secret.txt", b"x").unwrap();
        assert!(archive.get("bruno", id).unwrap().is_none());
        assert!(!archive.delete("bruno", id).unwrap());
        assert!(archive.get("ana", id).unwrap().is_some());
    }

    #[test]
    fn delete_removes_row_and_blob() {
        let (tmp, archive) = test_store();

        let id = archive.save("ana", "gone.txt", b"x").unwrap();
        let stored_name = archive.get("ana", id).unwrap().unwrap().stored_name;
        let blob = tmp.path().join("uploads").join(&stored_name);
        assert!(blob.exists());

        assert!(archive.delete("ana", id).unwrap());
        assert!(archive.get("ana", id).unwrap().is_none());
        assert!(!blob.exists());
    }

    #[test]
    fn write_content_updates_size() {
        let (_tmp, archive) = test_store();

        let id = archive.save("ana", "draft.md", b"v1").unwrap();
        let file = archive.get("ana", id).unwrap().unwrap();
        archive.write_content(&file, b"version two").unwrap();

        let updated = archive.get("ana", id).unwrap().unwrap();
        assert_eq!(updated.size_bytes, 11);
        assert_eq!(archive.read_content(&updated).unwrap(), b"version two");
    }

    #[test]
    fn list_is_owner_scoped() {
        let (_tmp, archive) = test_store();

        archive.save("ana", "a.txt", b"1").unwrap();
        archive.save("ana", "b.txt", b"2").unwrap();
        archive.save("bruno", "c.txt", b"3").unwrap();

        assert_eq!(archive.list("ana").unwrap().len(), 2);
        assert_eq!(archive.list("bruno").unwrap().len(), 1);
    }

    #[test]
    fn editable_extension_allowlist() {
        assert!(is_editable("notes.txt"));
        assert!(is_editable("README.md"));
        assert!(is_editable("data.CSV"));
        assert!(!is_editable("photo.png"));
        assert!(!is_editable("archive.tar.gz"));
        assert!(!is_editable("no_extension"));
    }
}
