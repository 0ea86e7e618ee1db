use crate::MountSession;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LeaseId(String);

impl LeaseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for LeaseId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Hands out lease ids of the form `<salt>-<counter>`.
///
/// The salt is 12 hex digits (48 random bits) chosen when the generator is
/// created; the counter is an atomic that only moves forward. Two ids from the
/// same generator are never equal, no matter how many threads draw from it.
/// Ids from different generators share a prefix only if their salts collide.
#[derive(Debug)]
pub struct LeaseIdGenerator {
    salt: String,
    next: AtomicU64,
}

impl LeaseIdGenerator {
    pub fn new() -> Self {
        let mut salt = uuid::Uuid::new_v4().simple().to_string();
        salt.truncate(12);
        Self {
            salt,
            next: AtomicU64::new(0),
        }
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn next_id(&self) -> LeaseId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        LeaseId(format!("{}-{:08x}", self.salt, n))
    }
}

impl Default for LeaseIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A caller's claim on a mounted media item.
#[derive(Debug, Clone)]
pub struct Lease {
    id: LeaseId,
    media_id: String,
    session: Arc<dyn MountSession>,
    created_at: DateTime<Utc>,
}

impl Lease {
    pub(crate) fn new(
        id: LeaseId,
        media_id: String,
        session: Arc<dyn MountSession>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            media_id,
            session,
            created_at,
        }
    }

    pub fn id(&self) -> &LeaseId {
        &self.id
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn mount_path(&self) -> &Path {
        self.session.mount_path()
    }

    pub fn session(&self) -> &Arc<dyn MountSession> {
        &self.session
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
