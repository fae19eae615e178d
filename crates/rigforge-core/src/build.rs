//! The build aggregate: at most one component per category, derived metrics
//! and the lossless persistable form.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compat::{self, RuleResult};
use crate::{Category, Component, ComponentError, ComponentRecord};

/// Minimum length for a build's display name.
pub const MIN_NAME_LEN: usize = 3;

/// Categories that must all be filled before a build counts as complete.
/// GPU and cooler are optional (integrated graphics, stock coolers).
pub const ESSENTIAL_CATEGORIES: [Category; 6] = [
    Category::Cpu,
    Category::Motherboard,
    Category::Ram,
    Category::Storage,
    Category::Psu,
    Category::Case,
];

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("build name must be at least {MIN_NAME_LEN} characters")]
    NameTooShort,
}

/// An owned collection of components, one slot per category.
///
/// A build starts transient: no storage identity, mutate freely.  Saving it
/// through a [`crate::store::BuildStore`] assigns the `build_id` and
/// `share_key`, after which both are fixed for the life of the record.
/// Mutation assumes single-writer ownership of the instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Build {
    build_id: Option<i64>,
    name: String,
    owner_id: Option<String>,
    slots: BTreeMap<Category, Component>,
    created_at: DateTime<Utc>,
    share_key: Option<String>,
}

/// Flat serializable form of a [`Build`].
///
/// Every category appears in `components`, filled slots as `Some`; builds
/// round-trip through this record without loss, including every component's
/// open attribute set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub build_id: Option<i64>,
    pub name: String,
    pub owner_id: Option<String>,
    pub components: BTreeMap<Category, Option<ComponentRecord>>,
    pub created_at: DateTime<Utc>,
    pub share_key: Option<String>,
}

impl Build {
    /// Create a transient build.  `owner_id` may be absent for guest builds
    /// that are never persisted.
    pub fn new(name: impl Into<String>, owner_id: Option<String>) -> Result<Self, BuildError> {
        let name = name.into();
        if name.chars().count() < MIN_NAME_LEN {
            return Err(BuildError::NameTooShort);
        }
        Ok(Self {
            build_id: None,
            name,
            owner_id,
            slots: BTreeMap::new(),
            created_at: Utc::now(),
            share_key: None,
        })
    }

    // Accessors --------------------------------------------------------------

    pub fn build_id(&self) -> Option<i64> {
        self.build_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn share_key(&self) -> Option<&str> {
        self.share_key.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn component(&self, category: Category) -> Option<&Component> {
        self.slots.get(&category)
    }

    /// Present components in category order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.slots.values()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    // Mutation ---------------------------------------------------------------

    /// Rename the build.  Too-short names are rejected and the prior name is
    /// kept.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), BuildError> {
        let name = name.into();
        if name.chars().count() < MIN_NAME_LEN {
            return Err(BuildError::NameTooShort);
        }
        self.name = name;
        Ok(())
    }

    /// Insert a component into the slot for its own category, replacing any
    /// prior occupant.
    pub fn add_component(&mut self, component: Component) -> Option<Component> {
        self.slots.insert(component.category(), component)
    }

    /// Clear a slot; no-op when already empty.
    pub fn remove_component(&mut self, category: Category) -> Option<Component> {
        self.slots.remove(&category)
    }

    /// Record the identity assigned by storage on first save.  An already
    /// assigned identity never changes; later calls are ignored.
    pub fn mark_persisted(&mut self, build_id: i64, share_key: impl Into<String>) {
        if self.build_id.is_none() {
            self.build_id = Some(build_id);
            self.share_key = Some(share_key.into());
        }
    }

    // Derived metrics – computed on demand, never stored ---------------------

    pub fn total_price(&self) -> f64 {
        self.slots.values().map(Component::price).sum()
    }

    /// Sum of the `power_draw` attribute over present components; missing or
    /// non-numeric values contribute 0.
    pub fn total_power_draw(&self) -> f64 {
        self.slots
            .values()
            .filter_map(|part| part.float_attr("power_draw"))
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        ESSENTIAL_CATEGORIES
            .iter()
            .all(|category| self.slots.contains_key(category))
    }

    /// Full ordered compatibility report, one entry per rule.
    pub fn compatibility_report(&self) -> Vec<RuleResult> {
        compat::evaluate(self)
    }

    /// Failed rules only, engine order preserved.
    pub fn issues(&self) -> Vec<RuleResult> {
        compat::evaluate(self)
            .into_iter()
            .filter(|result| !result.passed())
            .collect()
    }

    pub fn is_compatible(&self) -> bool {
        compat::evaluate(self).iter().all(RuleResult::passed)
    }

    // Persistence boundary ---------------------------------------------------

    pub fn to_record(&self) -> BuildRecord {
        let components = Category::ALL
            .iter()
            .map(|&category| {
                (
                    category,
                    self.slots.get(&category).map(Component::to_record),
                )
            })
            .collect();
        BuildRecord {
            build_id: self.build_id,
            name: self.name.clone(),
            owner_id: self.owner_id.clone(),
            components,
            created_at: self.created_at,
            share_key: self.share_key.clone(),
        }
    }

    /// Rebuild from a persisted record.  Each contained component goes back
    /// through the factory, so a record with a corrupted category label fails
    /// here rather than producing a mistagged component.
    pub fn from_record(record: BuildRecord) -> Result<Self, ComponentError> {
        let mut slots = BTreeMap::new();
        for (category, component) in record.components {
            if let Some(component) = component {
                slots.insert(category, Component::from_record(component)?);
            }
        }
        Ok(Self {
            build_id: record.build_id,
            name: record.name,
            owner_id: record.owner_id,
            slots,
            created_at: record.created_at,
            share_key: record.share_key,
        })
    }

    /// Copy this build for an importing owner.
    ///
    /// The copy is transient – no `build_id`, no `share_key`, fresh creation
    /// time – and its components are reconstructed through the factory from
    /// their serialized records, so nothing aliases the source build.
    pub fn import_copy(&self, owner_id: Option<String>) -> Self {
        let slots = self
            .slots
            .iter()
            .filter_map(|(&category, component)| {
                // Reconstruction cannot fail: the source component's record
                // carries its own valid category label.
                Component::from_record(component.to_record())
                    .ok()
                    .map(|copy| (category, copy))
            })
            .collect();
        Self {
            build_id: None,
            name: format!("{} (imported)", self.name),
            owner_id,
            slots,
            created_at: Utc::now(),
            share_key: None,
        }
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Build: {} ({}/8 components, total {:.2})",
            self.name,
            self.slots.len(),
            self.total_price()
        )
    }
}
