//! SQLite-backed implementation of the rigforge storage contract.
//!
//! Components live in a `parts` table with their open attribute set stored
//! as a JSON text blob; builds live in a `builds` table with their full
//! category → component map serialized the same way.  Share-key uniqueness
//! is enforced by a `UNIQUE` constraint on the `builds` table – the
//! allocation pre-check in [`rigforge_core::share`] is only an optimization
//! on top of it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use rigforge_core::store::{BuildStore, ComponentStore, StoreError};
use rigforge_core::{share, Build, BuildRecord, Category, Component, ComponentRecord};

/// Bump this when changing table schemas.
const SCHEMA_VERSION: i32 = 1;

/// Insert attempts per save before giving up on key allocation races.
const INSERT_RETRIES: usize = 3;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory store, mostly for tests and throwaway sessions.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        // WAL allows concurrent reads while writing and reduces lock
        // contention.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let current_version: i32 = conn.pragma_query_value(None, "user_version", |r| r.get(0))?;
        if current_version != 0 && current_version != SCHEMA_VERSION {
            anyhow::bail!(
                "unsupported store schema version {current_version} (expected {SCHEMA_VERSION})"
            );
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS parts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                price REAL NOT NULL,
                attributes TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_parts_category ON parts(category);
            CREATE TABLE IF NOT EXISTS builds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT,
                name TEXT NOT NULL,
                components TEXT NOT NULL,
                created_at TEXT NOT NULL,
                share_key TEXT NOT NULL UNIQUE
            );
            CREATE INDEX IF NOT EXISTS idx_builds_owner ON builds(owner_id);",
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self { conn })
    }

    /// Import the build behind `share_key` as a fresh record owned by
    /// `owner_id`.  Returns the new identity, or `None` when no build
    /// carries that key.
    pub fn import_build(
        &self,
        owner_id: &str,
        share_key: &str,
    ) -> Result<Option<(i64, String)>, StoreError> {
        let Some(record) = self.fetch_build_by_share_key(share_key)? else {
            return Ok(None);
        };
        let donor = Build::from_record(record).map_err(|e| StoreError::Backend(e.into()))?;
        let mut copy = donor.import_copy(Some(owner_id.to_owned()));
        rigforge_core::store::save_build(self, &mut copy).map(Some)
    }

    /// Load a JSON seed file (an array of component records) into the store.
    ///
    /// Every entry goes through the factory; malformed entries are logged
    /// and skipped so one bad part never aborts the whole load.  Returns the
    /// number of components stored.
    pub fn load_components_from_seed(&self, path: &Path) -> Result<usize, StoreError> {
        let data = std::fs::read_to_string(path).map_err(backend)?;
        let records: Vec<ComponentRecord> = serde_json::from_str(&data).map_err(backend)?;

        let mut loaded = 0;
        for record in records {
            match Component::from_record(record.clone()) {
                Ok(component) => {
                    self.insert_or_replace_component(&component.to_record())?;
                    loaded += 1;
                }
                Err(err) => log::warn!("skipping seed entry {:?}: {err}", record.id),
            }
        }
        Ok(loaded)
    }

    pub fn statistics(&self) -> Result<StoreStats, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT category, COUNT(*) FROM parts GROUP BY category")
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })
            .map_err(backend)?;

        let mut components_by_category = BTreeMap::new();
        for row in rows {
            let (label, count) = row.map_err(backend)?;
            match label.parse::<Category>() {
                Ok(category) => {
                    components_by_category.insert(category, count);
                }
                Err(_) => log::warn!("ignoring parts with unknown category {label:?}"),
            }
        }

        let total_builds: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM builds", [], |row| row.get(0))
            .map_err(backend)?;

        Ok(StoreStats {
            components_by_category,
            total_builds,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub components_by_category: BTreeMap<Category, u64>,
    pub total_builds: u64,
}

impl ComponentStore for SqliteStore {
    fn insert_or_replace_component(&self, record: &ComponentRecord) -> Result<(), StoreError> {
        let attributes = serde_json::to_string(&record.attributes).map_err(backend)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO parts (id, name, category, price, attributes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.name,
                    record.category,
                    record.price,
                    attributes
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn fetch_component(&self, id: &str) -> Result<Option<ComponentRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, name, category, price, attributes FROM parts WHERE id = ?1",
                params![id],
                component_row,
            )
            .optional()
            .map_err(backend)?
            .map(component_from_row)
            .transpose()
    }

    fn fetch_all_components(&self) -> Result<Vec<ComponentRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, category, price, attributes FROM parts ORDER BY id")
            .map_err(backend)?;
        let rows = stmt.query_map([], component_row).map_err(backend)?;
        rows.map(|row| component_from_row(row.map_err(backend)?))
            .collect()
    }

    fn fetch_components_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, category, price, attributes FROM parts
                 WHERE category = ?1 ORDER BY id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![category.label()], component_row)
            .map_err(backend)?;
        rows.map(|row| component_from_row(row.map_err(backend)?))
            .collect()
    }
}

impl BuildStore for SqliteStore {
    fn insert_build(&self, record: &BuildRecord) -> Result<(i64, String), StoreError> {
        let components = serde_json::to_string(&record.components).map_err(backend)?;
        let created_at = record.created_at.to_rfc3339();

        for _ in 0..INSERT_RETRIES {
            let key = share::allocate_key(self)?;
            let inserted = self.conn.execute(
                "INSERT INTO builds (owner_id, name, components, created_at, share_key)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![record.owner_id, record.name, components, created_at, key],
            );
            match inserted {
                Ok(_) => return Ok((self.conn.last_insert_rowid(), key)),
                // Another writer claimed the key between check and insert:
                // regenerate and try again.
                Err(err) if is_unique_violation(&err) => {
                    log::debug!("share key {key} raced another writer, regenerating");
                }
                Err(err) => return Err(backend(err)),
            }
        }
        Err(StoreError::ShareKeyCollision)
    }

    fn fetch_build(&self, build_id: i64) -> Result<Option<BuildRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, owner_id, name, components, created_at, share_key
                 FROM builds WHERE id = ?1",
                params![build_id],
                build_row,
            )
            .optional()
            .map_err(backend)?
            .map(build_from_row)
            .transpose()
    }

    fn fetch_build_by_share_key(&self, key: &str) -> Result<Option<BuildRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, owner_id, name, components, created_at, share_key
                 FROM builds WHERE share_key = ?1",
                params![key],
                build_row,
            )
            .optional()
            .map_err(backend)?
            .map(build_from_row)
            .transpose()
    }

    fn fetch_builds_for_owner(&self, owner_id: &str) -> Result<Vec<BuildRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, name, components, created_at, share_key
                 FROM builds WHERE owner_id = ?1 ORDER BY id",
            )
            .map_err(backend)?;
        let rows = stmt.query_map(params![owner_id], build_row).map_err(backend)?;
        rows.map(|row| build_from_row(row.map_err(backend)?))
            .collect()
    }

    fn delete_build(&self, build_id: i64, owner_id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM builds WHERE id = ?1 AND owner_id = ?2",
                params![build_id, owner_id],
            )
            .map_err(backend)?;
        Ok(deleted > 0)
    }

    fn share_key_exists(&self, key: &str) -> Result<bool, StoreError> {
        self.conn
            .query_row(
                "SELECT 1 FROM builds WHERE share_key = ?1",
                params![key],
                |_| Ok(()),
            )
            .optional()
            .map_err(backend)
            .map(|found| found.is_some())
    }
}

type ComponentRow = (String, String, String, f64, String);
type BuildRow = (i64, Option<String>, String, String, String, String);

fn component_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ComponentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn component_from_row(
    (id, name, category, price, attributes): ComponentRow,
) -> Result<ComponentRecord, StoreError> {
    let attributes = serde_json::from_str(&attributes).map_err(backend)?;
    Ok(ComponentRecord {
        id,
        name,
        category,
        price,
        attributes,
    })
}

fn build_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BuildRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn build_from_row(
    (id, owner_id, name, components, created_at, share_key): BuildRow,
) -> Result<BuildRecord, StoreError> {
    let components = serde_json::from_str(&components).map_err(backend)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(backend)?
        .with_timezone(&Utc);
    Ok(BuildRecord {
        build_id: Some(id),
        name,
        owner_id,
        components,
        created_at,
        share_key: Some(share_key),
    })
}

fn backend(err: impl Into<anyhow::Error>) -> StoreError {
    StoreError::Backend(err.into())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigforge_core::store::save_build;
    use rigforge_core::AttrValue;

    fn attrs(pairs: &[(&str, AttrValue)]) -> BTreeMap<String, AttrValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn part(id: &str, category: &str, pairs: &[(&str, AttrValue)]) -> Component {
        Component::create(id, format!("Test {id}"), category, 100.0, attrs(pairs)).unwrap()
    }

    #[test]
    fn component_round_trip_preserves_attribute_blob() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cpu = part(
            "cpu-7600",
            "CPU",
            &[
                ("socket", "AM5".into()),
                ("cores", AttrValue::Int(6)),
                ("boost_clock", AttrValue::Float(5.1)),
                ("notes", "extra attribute kept verbatim".into()),
            ],
        );
        store.insert_or_replace_component(&cpu.to_record()).unwrap();

        let fetched = store.fetch_component("cpu-7600").unwrap().unwrap();
        assert_eq!(fetched, cpu.to_record());
        assert_eq!(Component::from_record(fetched).unwrap(), cpu);

        assert!(store.fetch_component("no-such-id").unwrap().is_none());
    }

    #[test]
    fn insert_or_replace_overwrites_by_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_or_replace_component(&part("gpu-1", "GPU", &[]).to_record())
            .unwrap();
        let mut updated = part("gpu-1", "GPU", &[]).to_record();
        updated.price = 499.0;
        store.insert_or_replace_component(&updated).unwrap();

        let all = store.fetch_all_components().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].price, 499.0);
    }

    #[test]
    fn fetch_by_category_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_or_replace_component(&part("cpu-1", "CPU", &[]).to_record())
            .unwrap();
        store
            .insert_or_replace_component(&part("cpu-2", "CPU", &[]).to_record())
            .unwrap();
        store
            .insert_or_replace_component(&part("case-1", "Case", &[]).to_record())
            .unwrap();

        let cpus = store.fetch_components_by_category(Category::Cpu).unwrap();
        assert_eq!(cpus.len(), 2);
        assert!(cpus.iter().all(|r| r.category == "CPU"));
        assert!(store
            .fetch_components_by_category(Category::Gpu)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn build_save_and_load_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut build = Build::new("Gaming Rig", Some("owner-1".to_owned())).unwrap();
        build.add_component(part(
            "cpu-1",
            "CPU",
            &[("socket", "AM5".into()), ("power_draw", AttrValue::Int(105))],
        ));
        build.add_component(part("psu-1", "PSU", &[("wattage", AttrValue::Int(750))]));

        let (build_id, key) = save_build(&store, &mut build).unwrap();
        assert_eq!(key.len(), share::KEY_LEN);

        let fetched = store.fetch_build(build_id).unwrap().unwrap();
        let restored = Build::from_record(fetched).unwrap();
        assert_eq!(restored, build);

        let by_key = store.fetch_build_by_share_key(&key).unwrap().unwrap();
        assert_eq!(by_key.build_id, Some(build_id));

        assert!(store.share_key_exists(&key).unwrap());
        assert!(!store.share_key_exists("NOTAKEY1").unwrap());
        assert!(store.fetch_build(build_id + 1).unwrap().is_none());
    }

    #[test]
    fn builds_are_listed_per_owner() {
        let store = SqliteStore::open_in_memory().unwrap();
        for name in ["First Rig", "Second Rig"] {
            let mut build = Build::new(name, Some("owner-1".to_owned())).unwrap();
            save_build(&store, &mut build).unwrap();
        }
        let mut other = Build::new("Other Rig", Some("owner-2".to_owned())).unwrap();
        save_build(&store, &mut other).unwrap();
        // Guest build: no owner, reachable only by id or share key.
        let mut guest = Build::new("Guest Rig", None).unwrap();
        save_build(&store, &mut guest).unwrap();

        let mine = store.fetch_builds_for_owner("owner-1").unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|b| b.owner_id.as_deref() == Some("owner-1")));
        assert!(store.fetch_builds_for_owner("nobody").unwrap().is_empty());
    }

    #[test]
    fn delete_build_checks_ownership() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut build = Build::new("Owned Rig", Some("owner-1".to_owned())).unwrap();
        let (build_id, _) = save_build(&store, &mut build).unwrap();

        assert!(!store.delete_build(build_id, "owner-2").unwrap());
        assert!(store.fetch_build(build_id).unwrap().is_some());
        assert!(store.delete_build(build_id, "owner-1").unwrap());
        assert!(store.fetch_build(build_id).unwrap().is_none());
    }

    #[test]
    fn import_build_copies_under_new_owner() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut donor = Build::new("Donor Rig", Some("owner-1".to_owned())).unwrap();
        donor.add_component(part("cpu-1", "CPU", &[("socket", "AM5".into())]));
        let (donor_id, donor_key) = save_build(&store, &mut donor).unwrap();

        let (imported_id, imported_key) =
            store.import_build("owner-2", &donor_key).unwrap().unwrap();
        assert_ne!(imported_id, donor_id);
        assert_ne!(imported_key, donor_key);

        let imported = store.fetch_build(imported_id).unwrap().unwrap();
        assert_eq!(imported.name, "Donor Rig (imported)");
        assert_eq!(imported.owner_id.as_deref(), Some("owner-2"));
        assert_eq!(
            imported.components[&Category::Cpu],
            donor.to_record().components[&Category::Cpu]
        );

        assert!(store.import_build("owner-2", "MISSING1").unwrap().is_none());
    }

    #[test]
    fn seed_loading_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("parts.json");
        std::fs::write(
            &seed,
            r#"[
                {"id": "cpu-1", "name": "Ryzen 5 7600", "category": "CPU",
                 "price": 199.0, "attributes": {"socket": "AM5", "power_draw": 105}},
                {"id": "mystery-1", "name": "Sound Card", "category": "Soundcard",
                 "price": 59.0, "attributes": {}},
                {"id": "case-1", "name": "Mid Tower", "category": "Case",
                 "price": 89.0, "attributes": {"supported_form_factors": "ATX, Micro-ATX"}}
            ]"#,
        )
        .unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let loaded = store.load_components_from_seed(&seed).unwrap();
        assert_eq!(loaded, 2);

        let cpu = store.fetch_component("cpu-1").unwrap().unwrap();
        assert_eq!(cpu.attributes["power_draw"], AttrValue::Int(105));
        assert!(store.fetch_component("mystery-1").unwrap().is_none());
    }

    #[test]
    fn statistics_count_parts_and_builds() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_or_replace_component(&part("cpu-1", "CPU", &[]).to_record())
            .unwrap();
        store
            .insert_or_replace_component(&part("cpu-2", "CPU", &[]).to_record())
            .unwrap();
        store
            .insert_or_replace_component(&part("psu-1", "PSU", &[]).to_record())
            .unwrap();
        let mut build = Build::new("Counted Rig", None).unwrap();
        save_build(&store, &mut build).unwrap();

        let stats = store.statistics().unwrap();
        assert_eq!(stats.components_by_category[&Category::Cpu], 2);
        assert_eq!(stats.components_by_category[&Category::Psu], 1);
        assert_eq!(stats.components_by_category.get(&Category::Gpu), None);
        assert_eq!(stats.total_builds, 1);
    }

    #[test]
    fn store_reopens_with_data_intact() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("rigforge.sqlite");

        let key = {
            let store = SqliteStore::open(&db).unwrap();
            store
                .insert_or_replace_component(&part("cpu-1", "CPU", &[]).to_record())
                .unwrap();
            let mut build = Build::new("Persistent Rig", Some("owner-1".to_owned())).unwrap();
            let (_, key) = save_build(&store, &mut build).unwrap();
            key
        };

        let store = SqliteStore::open(&db).unwrap();
        assert!(store.fetch_component("cpu-1").unwrap().is_some());
        assert!(store.fetch_build_by_share_key(&key).unwrap().is_some());
    }
}
