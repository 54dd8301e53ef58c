//! Ownership authorization for mutating calls on owned resources.
//!
//! Business logic locates the target, then asks whether the caller owns it.
//! A missing resource is reported before ownership is evaluated, so any
//! authenticated caller can learn whether an id exists. That ordering is
//! part of the API's observable behavior and is kept.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use axum::http::StatusCode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::auth::AccessClaims;

/// The kinds of owned resources behind the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    User,
    Category,
    Expense,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::User => "user",
            ResourceKind::Category => "category",
            ResourceKind::Expense => "expense",
        };
        f.write_str(name)
    }
}

/// The authorization-relevant fields of an owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub resource_id: i64,
    pub owner_id: i64,
}

/// Why a mutation on an owned resource was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OwnershipError {
    /// The target does not exist.
    #[error("{kind} {id} not found")]
    ResourceNotFound { kind: ResourceKind, id: i64 },

    /// The caller is not the owner.
    #[error("not allowed to modify {kind} {id}")]
    Unauthorized { kind: ResourceKind, id: i64 },

    /// The resource store failed while looking up the owner.
    #[error("ownership lookup failed: {0}")]
    Lookup(String),
}

impl OwnershipError {
    /// HTTP status hint for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            OwnershipError::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
            OwnershipError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            OwnershipError::Lookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Finds the owner of a resource in the resource store.
#[async_trait]
pub trait OwnershipLookup: Send + Sync {
    /// `Ok(None)` when the resource does not exist.
    async fn ownership(
        &self,
        kind: ResourceKind,
        id: i64,
    ) -> Result<Option<OwnershipRecord>, OwnershipError>;
}

/// Decide whether `identity` may mutate the resource described by `record`.
pub fn authorize(
    identity: &AccessClaims,
    kind: ResourceKind,
    record: &OwnershipRecord,
) -> Result<(), OwnershipError> {
    if identity.subject_id == record.owner_id {
        Ok(())
    } else {
        debug!(
            kind = %kind,
            resource_id = record.resource_id,
            owner_id = record.owner_id,
            subject_id = identity.subject_id,
            "Ownership check denied"
        );
        Err(OwnershipError::Unauthorized {
            kind,
            id: record.resource_id,
        })
    }
}

/// Locate a resource and check the caller owns it: existence first,
/// ownership second. Call this before applying any write.
pub async fn authorize_mutation(
    identity: &AccessClaims,
    lookup: &dyn OwnershipLookup,
    kind: ResourceKind,
    id: i64,
) -> Result<OwnershipRecord, OwnershipError> {
    let record = lookup
        .ownership(kind, id)
        .await?
        .ok_or(OwnershipError::ResourceNotFound { kind, id })?;
    authorize(identity, kind, &record)?;
    Ok(record)
}

/// Authorize a mutation touching several owned resources, in order,
/// stopping at the first refusal.
pub async fn authorize_all(
    identity: &AccessClaims,
    lookup: &dyn OwnershipLookup,
    targets: &[(ResourceKind, i64)],
) -> Result<Vec<OwnershipRecord>, OwnershipError> {
    let mut records = Vec::with_capacity(targets.len());
    for &(kind, id) in targets {
        records.push(authorize_mutation(identity, lookup, kind, id).await?);
    }
    Ok(records)
}

/// An in-memory ownership index.
///
/// Useful when the business layer keeps ownership alongside a cache, and in
/// tests.
#[derive(Debug, Default)]
pub struct MemoryOwnershipIndex {
    owners: RwLock<HashMap<(ResourceKind, i64), i64>>,
}

impl MemoryOwnershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: ResourceKind, id: i64, owner_id: i64) {
        self.owners.write().insert((kind, id), owner_id);
    }

    pub fn remove(&self, kind: ResourceKind, id: i64) -> Option<i64> {
        self.owners.write().remove(&(kind, id))
    }

    pub fn contains(&self, kind: ResourceKind, id: i64) -> bool {
        self.owners.read().contains_key(&(kind, id))
    }
}

#[async_trait]
impl OwnershipLookup for MemoryOwnershipIndex {
    async fn ownership(
        &self,
        kind: ResourceKind,
        id: i64,
    ) -> Result<Option<OwnershipRecord>, OwnershipError> {
        Ok(self.owners.read().get(&(kind, id)).map(|&owner_id| OwnershipRecord {
            resource_id: id,
            owner_id,
        }))
    }
}
