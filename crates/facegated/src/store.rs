//! SQLite-backed account and descriptor store.
//!
//! One row per account in `accounts`; the face descriptor is a nullable
//! little-endian f32 BLOB on that row. Gallery order is `rowid` order.

use facegate_core::{
    CredentialStore, Credentials, Descriptor, DescriptorStore, EnrollmentRecord, StoreError,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    password_hash   TEXT NOT NULL,
    descriptor      BLOB,
    model_version   TEXT,
    created_at      TEXT NOT NULL
);
";

#[derive(Error, Debug)]
pub enum SqliteStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("account already exists for this email")]
    AccountExists,
    #[error("invalid database value: {0}")]
    InvalidDbValue(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Fields needed to create an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub descriptor: Descriptor,
}

/// Public view of an account. Never carries the hash or the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub face_enrolled: bool,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SqliteStoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Close the connection, reporting any error SQLite raises on close.
    pub fn close(self) -> Result<(), SqliteStoreError> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    /// Insert a new account and return its id.
    pub fn create_account(&self, account: &NewAccount) -> Result<String, SqliteStoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        let result = self.conn.execute(
            "INSERT INTO accounts
                 (id, name, email, password_hash, descriptor, model_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                account.name,
                account.email,
                account.password_hash,
                encode_descriptor_blob(&account.descriptor.values),
                account.descriptor.model_version,
                created_at,
            ],
        );
        match result {
            Ok(_) => Ok(id),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(SqliteStoreError::AccountExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn profile(&self, id: &str) -> Result<Option<Profile>, SqliteStoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, email, created_at, descriptor IS NOT NULL
                 FROM accounts WHERE id = ?1",
                params![id],
                decode_profile_row,
            )
            .optional()?)
    }

    /// Drop the face descriptor, keeping the account for password login.
    pub fn clear_descriptor(&self, id: &str) -> Result<bool, SqliteStoreError> {
        let changed = self.conn.execute(
            "UPDATE accounts SET descriptor = NULL, model_version = NULL
             WHERE id = ?1 AND descriptor IS NOT NULL",
            params![id],
        )?;
        Ok(changed > 0)
    }

    /// (accounts, accounts with a face enrolled)
    pub fn counts(&self) -> Result<(u64, u64), SqliteStoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*), COUNT(descriptor) FROM accounts",
            [],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
        )?)
    }

    fn set_descriptor(&self, id: &str, descriptor: &Descriptor) -> Result<bool, SqliteStoreError> {
        let changed = self.conn.execute(
            "UPDATE accounts SET descriptor = ?2, model_version = ?3 WHERE id = ?1",
            params![
                id,
                encode_descriptor_blob(&descriptor.values),
                descriptor.model_version
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_account(&self, id: &str) -> Result<bool, SqliteStoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

impl DescriptorStore for SqliteStore {
    fn enumerate(&self) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, descriptor, model_version FROM accounts ORDER BY rowid")
            .map_err(SqliteStoreError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<Vec<u8>>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(SqliteStoreError::from)?;

        let mut records = Vec::new();
        for row in rows {
            let (identity, blob, model_version) = row.map_err(SqliteStoreError::from)?;
            let descriptor = decode_descriptor(blob, model_version)?;
            records.push(EnrollmentRecord {
                identity,
                descriptor,
            });
        }
        Ok(records)
    }

    fn get(&self, identity: &str) -> Result<Option<Descriptor>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT descriptor, model_version FROM accounts WHERE id = ?1",
                params![identity],
                |row| {
                    Ok((
                        row.get::<_, Option<Vec<u8>>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        match row {
            Some((blob, model_version)) => Ok(decode_descriptor(blob, model_version)?),
            None => Ok(None),
        }
    }

    /// Descriptors belong to accounts, so enrolling an unknown identity fails.
    fn enroll(&mut self, identity: &str, descriptor: Descriptor) -> Result<(), StoreError> {
        if self.set_descriptor(identity, &descriptor)? {
            Ok(())
        } else {
            Err(StoreError::UnknownIdentity(identity.to_string()))
        }
    }

    fn remove(&mut self, identity: &str) -> Result<bool, StoreError> {
        Ok(self.delete_account(identity)?)
    }
}

impl CredentialStore for SqliteStore {
    fn credentials(&self, email: &str) -> Result<Option<Credentials>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, password_hash FROM accounts WHERE email = ?1",
                params![email],
                |row| {
                    Ok(Credentials {
                        identity: row.get(0)?,
                        password_hash: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(SqliteStoreError::from)?)
    }
}

fn decode_profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
        face_enrolled: row.get(4)?,
    })
}

fn decode_descriptor(
    blob: Option<Vec<u8>>,
    model_version: Option<String>,
) -> Result<Option<Descriptor>, SqliteStoreError> {
    let Some(blob) = blob else {
        return Ok(None);
    };
    let values = decode_descriptor_blob(&blob)?;
    Ok(Some(Descriptor {
        values,
        model_version,
    }))
}

fn encode_descriptor_blob(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(values));
    for &value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_descriptor_blob(blob: &[u8]) -> Result<Vec<f32>, SqliteStoreError> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return Err(SqliteStoreError::InvalidDbValue(format!(
            "invalid descriptor byte length: {}",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(email: &str, values: &[f32]) -> NewAccount {
        NewAccount {
            name: "Test User".into(),
            email: email.into(),
            password_hash: "hash".into(),
            descriptor: Descriptor::new(values.to_vec()),
        }
    }

    #[test]
    fn test_create_and_enumerate_in_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_account(&account("a@example.com", &[0.1, 0.2])).unwrap();
        let b = store.create_account(&account("b@example.com", &[0.3, 0.4])).unwrap();

        let records = store.enumerate().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity, a);
        assert_eq!(records[1].identity, b);
        assert_eq!(records[1].descriptor.as_ref().unwrap().values, vec![0.3, 0.4]);
    }

    #[test]
    fn test_duplicate_email() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_account(&account("a@example.com", &[0.1])).unwrap();
        let err = store
            .create_account(&account("a@example.com", &[0.2]))
            .unwrap_err();
        assert!(matches!(err, SqliteStoreError::AccountExists));
    }

    #[test]
    fn test_credentials_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_account(&account("a@example.com", &[0.1])).unwrap();
        let creds = store.credentials("a@example.com").unwrap().unwrap();
        assert_eq!(creds.identity, id);
        assert_eq!(creds.password_hash, "hash");
        assert!(store.credentials("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_reenroll_keeps_gallery_position() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_account(&account("a@example.com", &[0.1])).unwrap();
        store.create_account(&account("b@example.com", &[0.2])).unwrap();

        store.enroll(&a, Descriptor::new(vec![0.9])).unwrap();
        let records = store.enumerate().unwrap();
        assert_eq!(records[0].identity, a);
        assert_eq!(store.get(&a).unwrap().unwrap().values, vec![0.9]);

        assert!(matches!(
            store.enroll("missing", Descriptor::new(vec![0.5])),
            Err(StoreError::UnknownIdentity(_))
        ));
    }

    #[test]
    fn test_clear_descriptor_and_remove() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_account(&account("a@example.com", &[0.1])).unwrap();

        assert!(store.clear_descriptor(&a).unwrap());
        assert!(!store.clear_descriptor(&a).unwrap());
        assert!(store.get(&a).unwrap().is_none());
        assert_eq!(store.enumerate().unwrap()[0].descriptor, None);
        assert!(!store.profile(&a).unwrap().unwrap().face_enrolled);
        assert_eq!(store.counts().unwrap(), (1, 0));

        assert!(store.remove(&a).unwrap());
        assert!(!store.remove(&a).unwrap());
        assert!(store.profile(&a).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_blob_is_backend_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_account(&account("a@example.com", &[0.1])).unwrap();
        store
            .conn
            .execute(
                "UPDATE accounts SET descriptor = ?2 WHERE id = ?1",
                params![a, vec![1u8, 2, 3]],
            )
            .unwrap();
        assert!(matches!(store.enumerate(), Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/accounts.db");
        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let id = store.create_account(&account("a@example.com", &[0.25, -0.5])).unwrap();
            store.close().unwrap();
            id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.counts().unwrap(), (1, 1));
        let profile = store.profile(&id).unwrap().unwrap();
        assert_eq!(profile.email, "a@example.com");
        assert!(profile.face_enrolled);
        assert_eq!(store.get(&id).unwrap().unwrap().values, vec![0.25, -0.5]);
    }
}
