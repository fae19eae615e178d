//! Storage contract consumed by the core.
//!
//! Backends are plain trait objects handed in by the caller – one explicitly
//! constructed handle per process instead of a hidden global.  Lookups that
//! find nothing return `Ok(None)` so callers can tell "no such record" from
//! a transport failure, which always surfaces as [`StoreError::Backend`]
//! with the underlying cause preserved.

use thiserror::Error;

use crate::build::{Build, BuildRecord};
use crate::{Category, ComponentRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    /// A share key raced another writer between the existence check and the
    /// insert, or the allocation retry budget ran out.  Retryable.
    #[error("share key already assigned to another build")]
    ShareKeyCollision,
    /// Transport or engine failure, surfaced unchanged.
    #[error("storage failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Component persistence.  Attributes travel inside the record as an opaque
/// serialized blob; the backend must round-trip them losslessly.
pub trait ComponentStore {
    fn insert_or_replace_component(&self, record: &ComponentRecord) -> Result<(), StoreError>;

    fn fetch_component(&self, id: &str) -> Result<Option<ComponentRecord>, StoreError>;

    fn fetch_all_components(&self) -> Result<Vec<ComponentRecord>, StoreError>;

    fn fetch_components_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ComponentRecord>, StoreError>;
}

/// Build persistence and share-key bookkeeping.
pub trait BuildStore {
    /// Persist a build, assigning a fresh id and a collision-free share key.
    ///
    /// The backend must enforce share-key uniqueness itself (a uniqueness
    /// constraint); a violating insert is reported as
    /// [`StoreError::ShareKeyCollision`] so the caller can retry, never as
    /// corrupted data.
    fn insert_build(&self, record: &BuildRecord) -> Result<(i64, String), StoreError>;

    fn fetch_build(&self, build_id: i64) -> Result<Option<BuildRecord>, StoreError>;

    fn fetch_build_by_share_key(&self, key: &str) -> Result<Option<BuildRecord>, StoreError>;

    fn fetch_builds_for_owner(&self, owner_id: &str) -> Result<Vec<BuildRecord>, StoreError>;

    /// Delete a build if (and only if) `owner_id` owns it; `Ok(false)` when
    /// it doesn't exist or is owned by someone else.
    fn delete_build(&self, build_id: i64, owner_id: &str) -> Result<bool, StoreError>;

    /// Whether a share key is currently assigned to any persisted build.
    fn share_key_exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Persist a transient build and record the assigned identity on it.
pub fn save_build(store: &dyn BuildStore, build: &mut Build) -> Result<(i64, String), StoreError> {
    let (build_id, share_key) = store.insert_build(&build.to_record())?;
    build.mark_persisted(build_id, share_key.as_str());
    Ok((build_id, share_key))
}
