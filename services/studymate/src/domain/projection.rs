//! Mirror documents and the vocabulary of the sync coordinator.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};
use uuid::Uuid;

use studymate_core::serde::format_rfc3339_ms;

use crate::domain::types::{MaterialDetail, User};

/// Entity kinds that have a mirror copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Material,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [Self::User, Self::Material];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Material => "material",
        }
    }

    /// Mirror collection holding documents of this kind.
    pub fn collection(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Material => "study_materials",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown entity kind: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOp {
    Upsert,
    Delete,
}

impl SyncOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(anyhow::anyhow!("unknown sync op: {other}")),
        }
    }
}

/// Denormalized copy of an authoritative record.
///
/// `version` is the record's `updated_at` in microseconds; the mirror never replaces a
/// document with one of a lower version.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorDocument {
    pub kind: EntityKind,
    pub source_id: Uuid,
    pub version: i64,
    pub body: Map<String, Value>,
}

/// Result of a single mirror write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorWrite {
    Written,
    /// A document with a newer version is already stored.
    Stale,
}

/// Result of `project`. Never an error: the authoritative write already succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied,
    Skipped,
    /// A replay overwrote a mirror copy that carried a higher version than the record.
    Corrected,
    Degraded { reason: String },
}

impl SyncOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct KindReport {
    pub projected: u64,
    /// Mirror copies ahead of their record that were forced back to it.
    pub corrected: u64,
    pub removed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileReport {
    pub users: KindReport,
    pub materials: KindReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: u64,
    pub rescheduled: u64,
    pub failed: u64,
}

/// A pending projection in the durable outbox.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub kind: EntityKind,
    pub entity_id: Uuid,
    pub op: SyncOp,
    pub attempts: i32,
}

pub fn outbox_key(kind: EntityKind, id: Uuid) -> String {
    format!("{kind}:{id}")
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Mirror document for a user. Credentials are never copied.
pub fn user_document(user: &User) -> MirrorDocument {
    let body = json!({
        "username": user.username,
        "email": user.email,
        "role": user.role.as_str(),
        "first_name": user.first_name,
        "last_name": user.last_name,
        "created_at": format_rfc3339_ms(&user.created_at),
        "updated_at": format_rfc3339_ms(&user.updated_at),
    });
    MirrorDocument {
        kind: EntityKind::User,
        source_id: user.id,
        version: user.updated_at.timestamp_micros(),
        body: into_map(body),
    }
}

/// Mirror document for a material, flattened with the names needed for reporting.
pub fn material_document(detail: &MaterialDetail) -> MirrorDocument {
    let m = &detail.material;
    let h = &detail.hierarchy;
    let blob = m.blob.as_ref();
    let body = json!({
        "title": m.title,
        "description": m.description,
        "material_type": m.kind.as_str(),
        "subject_id": h.subject_id.to_string(),
        "subject_name": h.subject_name,
        "semester_id": h.semester_id.to_string(),
        "semester": h.semester_number,
        "year": h.year_name,
        "department": h.department_name.as_deref().unwrap_or("general"),
        "object_id": blob.map(|b| b.object_id.as_str()),
        "url": blob.map(|b| b.url.as_str()),
        "secure_url": blob.map(|b| b.secure_url.as_str()),
        "file_name": blob.map(|b| b.original_filename.as_str()),
        "file_size": blob.map(|b| b.byte_size),
        "file_format": blob.map(|b| b.format.as_str()),
        "uploaded_by_id": m.uploaded_by.map(|id| id.to_string()),
        "uploaded_by_username": detail.uploaded_by_username,
        "created_at": format_rfc3339_ms(&m.created_at),
        "updated_at": format_rfc3339_ms(&m.updated_at),
    });
    MirrorDocument {
        kind: EntityKind::Material,
        source_id: m.id,
        version: m.updated_at.timestamp_micros(),
        body: into_map(body),
    }
}
