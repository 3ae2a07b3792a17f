//! Descriptor store contract and an in-memory implementation.

use crate::types::{Descriptor, EnrollmentRecord};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Read/write contract the matcher relies on.
///
/// `enumerate` must return records in enrollment order; the matcher's
/// tie-break depends on it.
pub trait DescriptorStore {
    /// Every enrolled record, in enrollment order.
    fn enumerate(&self) -> Result<Vec<EnrollmentRecord>, StoreError>;

    /// Descriptor enrolled for `identity`, if any.
    fn get(&self, identity: &str) -> Result<Option<Descriptor>, StoreError>;

    /// Enroll `descriptor` for `identity`. An existing descriptor is replaced
    /// wholesale and the record keeps its place in the gallery.
    fn enroll(&mut self, identity: &str, descriptor: Descriptor) -> Result<(), StoreError>;

    /// Remove the identity's record. Returns false if it was not enrolled.
    fn remove(&mut self, identity: &str) -> Result<bool, StoreError>;
}

/// Password material for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub password_hash: String,
}

/// Lookup used by the password path.
pub trait CredentialStore {
    fn credentials(&self, email: &str) -> Result<Option<Credentials>, StoreError>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    record: EnrollmentRecord,
    email: Option<String>,
    password_hash: Option<String>,
}

/// Vec-backed store, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Vec<MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with password material and an optional descriptor.
    pub fn insert_account(
        &mut self,
        identity: &str,
        email: &str,
        password_hash: &str,
        descriptor: Option<Descriptor>,
    ) {
        self.entries.push(MemoryEntry {
            record: EnrollmentRecord::new(identity, descriptor),
            email: Some(email.to_string()),
            password_hash: Some(password_hash.to_string()),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, identity: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.record.identity == identity)
    }
}

impl DescriptorStore for MemoryStore {
    fn enumerate(&self) -> Result<Vec<EnrollmentRecord>, StoreError> {
        Ok(self.entries.iter().map(|e| e.record.clone()).collect())
    }

    fn get(&self, identity: &str) -> Result<Option<Descriptor>, StoreError> {
        Ok(self
            .position(identity)
            .and_then(|i| self.entries[i].record.descriptor.clone()))
    }

    fn enroll(&mut self, identity: &str, descriptor: Descriptor) -> Result<(), StoreError> {
        match self.position(identity) {
            Some(i) => self.entries[i].record.descriptor = Some(descriptor),
            None => self.entries.push(MemoryEntry {
                record: EnrollmentRecord::new(identity, descriptor),
                email: None,
                password_hash: None,
            }),
        }
        Ok(())
    }

    fn remove(&mut self, identity: &str) -> Result<bool, StoreError> {
        match self.position(identity) {
            Some(i) => {
                self.entries.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn credentials(&self, email: &str) -> Result<Option<Credentials>, StoreError> {
        Ok(self.entries.iter().find_map(|e| {
            match (e.email.as_deref(), e.password_hash.as_ref()) {
                (Some(stored), Some(hash)) if stored == email => Some(Credentials {
                    identity: e.record.identity.clone(),
                    password_hash: hash.clone(),
                }),
                _ => None,
            }
        }))
    }
}
