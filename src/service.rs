//! Schema Service
//!
//! The facade application code talks to. Wraps the store and the metadata
//! manager, hands out integer schema IDs, and decides per operation whether a
//! failure is propagated or turned into an empty/false answer. Every failure
//! is logged either way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::lock_unpoisoned;
use crate::compatibility::CompatibilityResult;
use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::ids::SchemaIdMap;
use crate::manager::MetadataManager;
use crate::schema::{Schema, SchemaKind};
use crate::store::{check_name, SchemaListing, SchemaStore};

/// Entry point for reading, validating and registering schemas
#[derive(Debug)]
pub struct SchemaService {
    store: Arc<SchemaStore>,
    manager: MetadataManager,
    ids: Mutex<SchemaIdMap>,
    registration_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SchemaService {
    /// Build a service over `store` with default compatibility settings
    pub fn new(store: Arc<SchemaStore>) -> Result<Self> {
        Self::with_manager(MetadataManager::new(store))
    }

    /// Open the store described by `config` and build a service over it
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let mut store_config = config.store.clone();
        store_config.root = config.root_path();
        let store = Arc::new(SchemaStore::from_config(&store_config)?);
        Self::with_manager(MetadataManager::with_config(store, config.compatibility.clone()))
    }

    /// Build a service around an existing manager.
    ///
    /// Every name already in the store gets an ID, in sorted name order.
    pub fn with_manager(manager: MetadataManager) -> Result<Self> {
        let store = manager.store().clone();
        let names = store.list_names()?;
        let ids = SchemaIdMap::from_names(names);
        info!(schemas = ids.len(), root = %store.root().display(), "schema service ready");

        Ok(Self {
            store,
            manager,
            ids: Mutex::new(ids),
            registration_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn metadata(&self) -> &MetadataManager {
        &self.manager
    }

    /// Latest version of `name`
    pub fn get_schema(&self, name: &str) -> Result<Schema> {
        self.store.load(name, None).map_err(|e| {
            if e.is_not_found() {
                warn!(name, error = %e, "schema not found");
            } else {
                error!(name, error = %e, "failed to load schema");
            }
            e
        })
    }

    /// Latest version of the schema registered under `id`
    pub fn get_schema_by_id(&self, id: u32) -> Result<Schema> {
        let name = lock_unpoisoned(&self.ids).name_of(id).map(String::from);
        match name {
            Some(name) => self.get_schema(&name),
            None => {
                warn!(id, "no schema registered with this id");
                Err(SchemaError::IdNotFound(id))
            }
        }
    }

    /// ID assigned to `name`, if any
    pub fn get_schema_id(&self, name: &str) -> Option<u32> {
        lock_unpoisoned(&self.ids).id_of(name)
    }

    /// Every ID assignment, ordered by ID
    pub fn schema_ids(&self) -> Vec<(u32, String)> {
        lock_unpoisoned(&self.ids).entries()
    }

    /// Whether `data` plausibly matches the latest schema for `name`.
    ///
    /// For records, every field without a default must be a key of `data`;
    /// extra keys are ignored. Never fails: problems are logged and reported
    /// as `false`.
    pub fn validate_data(&self, data: &Value, name: &str) -> bool {
        let schema = match self.store.load(name, None) {
            Ok(schema) => schema,
            Err(e) if e.is_not_found() => {
                warn!(name, "cannot validate data against unknown schema");
                return false;
            }
            Err(e) => {
                error!(name, error = %e, "failed to load schema for data validation");
                return false;
            }
        };

        let record = match schema.kind() {
            SchemaKind::Record(record) => record,
            SchemaKind::Other(_) => return true,
        };

        let object = match data.as_object() {
            Some(object) => object,
            None => {
                debug!(name, "record data is not an object");
                return false;
            }
        };

        let missing: Vec<&str> = record
            .required_fields()
            .filter(|field| !object.contains_key(&field.name))
            .map(|field| field.name.as_str())
            .collect();

        if missing.is_empty() {
            true
        } else {
            debug!(name, ?missing, "data is missing required fields");
            false
        }
    }

    /// Every loadable schema; empty if the store cannot be listed
    pub fn get_all_schemas(&self) -> SchemaListing {
        self.store.list_all().unwrap_or_else(|e| {
            error!(error = %e, "failed to list schemas");
            SchemaListing::new()
        })
    }

    /// Versions of `name`, ascending; empty if the name is unknown
    pub fn get_schema_versions(&self, name: &str) -> Vec<u32> {
        match self.store.list_versions(name) {
            Ok(versions) => versions,
            Err(e) if e.is_not_found() => {
                debug!(name, "no versions for unknown schema");
                Vec::new()
            }
            Err(e) => {
                error!(name, error = %e, "failed to list schema versions");
                Vec::new()
            }
        }
    }

    /// Highest stored version of `name`
    pub fn get_latest_schema_version(&self, name: &str) -> Result<u32> {
        self.store.latest_version(name).map_err(|e| {
            warn!(name, error = %e, "failed to resolve latest version");
            e
        })
    }

    /// Run the compatibility gate without registering anything
    pub fn check_compatibility(&self, name: &str, schema: &Schema) -> Result<CompatibilityResult> {
        self.manager.check(schema, name)
    }

    /// Register `schema` as the next version of `name` and return its ID.
    ///
    /// Registrations of the same name within this process are serialized.
    /// The ID is only assigned once the schema and metadata are on disk.
    pub fn register_schema(&self, name: &str, schema: &Schema) -> Result<u32> {
        if let Err(e) = check_name(name) {
            error!(name, error = %e, "schema registration failed");
            return Err(registration_error(name, e));
        }

        let lock = self.registration_lock(name);
        let _guard = lock_unpoisoned(&lock);

        let result = self
            .manager
            .check(schema, name)
            .map_err(|e| registration_error(name, e))
            .and_then(|compatibility| {
                if compatibility.is_compatible {
                    Ok(())
                } else {
                    let details: Vec<String> = compatibility
                        .breaking_changes()
                        .map(|c| c.description.clone())
                        .collect();
                    Err(SchemaError::validation(format!(
                        "schema '{}' is not {} compatible with existing versions: {}",
                        name,
                        compatibility.mode,
                        details.join("; ")
                    )))
                }
            })
            .and_then(|()| self.persist(name, schema).map_err(|e| registration_error(name, e)));

        let version = match result {
            Ok(version) => version,
            Err(e) => {
                error!(name, error = %e, "schema registration failed");
                return Err(e);
            }
        };

        let id = lock_unpoisoned(&self.ids).assign(name);
        info!(name, version, id, "registered schema");
        Ok(id)
    }

    /// Write the next version and matching metadata; returns the new version
    fn persist(&self, name: &str, schema: &Schema) -> Result<u32> {
        let version = match self.store.list_versions(name) {
            Ok(versions) => match versions.last() {
                Some(&latest) => latest.checked_add(1).ok_or_else(|| {
                    SchemaError::validation(format!(
                        "schema '{}' has no version left after v{}",
                        name, latest
                    ))
                })?,
                None => 1,
            },
            Err(e) if e.is_not_found() => 1,
            Err(e) => return Err(e),
        };

        self.store.save(name, schema, version)?;

        let mut metadata = self
            .store
            .find_metadata(name)?
            .unwrap_or_else(|| self.manager.create_metadata_for_new_schema(name, "", Vec::new()));
        metadata.version = version;
        metadata.touch();
        self.store.save_metadata(name, &metadata)?;

        Ok(version)
    }

    fn registration_lock(&self, name: &str) -> Arc<Mutex<()>> {
        lock_unpoisoned(&self.registration_locks)
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

fn registration_error(name: &str, cause: SchemaError) -> SchemaError {
    SchemaError::validation_caused_by(format!("failed to register schema '{}'", name), cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, SchemaService) {
        let dir = tempdir().unwrap();
        let store = Arc::new(SchemaStore::open(dir.path()).unwrap());
        (dir, SchemaService::new(store).unwrap())
    }

    fn test_schema() -> Schema {
        Schema::from_json(json!({
            "type": "record",
            "name": "Test",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "optional", "type": "string", "default": ""}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_register_assigns_versions_and_ids() {
        let (_dir, service) = setup();
        let id = service.register_schema("test", &test_schema()).unwrap();
        assert_eq!(id, 1);
        assert_eq!(service.get_latest_schema_version("test").unwrap(), 1);

        service.get_schema("test").unwrap();
        let again = service.register_schema("test", &test_schema()).unwrap();
        assert_eq!(again, id);
        assert_eq!(service.get_latest_schema_version("test").unwrap(), 2);
        assert_eq!(service.store().load_metadata("test").unwrap().version, 2);
    }

    #[test]
    fn test_incompatible_registration_is_rejected() {
        let (_dir, service) = setup();
        service.register_schema("test", &test_schema()).unwrap();

        let breaking = Schema::from_json(json!({
            "type": "record",
            "name": "Test",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "optional", "type": "string", "default": ""},
                {"name": "required", "type": "int"}
            ]
        }))
        .unwrap();

        let err = service.register_schema("test", &breaking).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("not BACKWARD compatible"));
        assert_eq!(service.get_schema_versions("test"), vec![1]);
    }

    #[test]
    fn test_failed_registration_assigns_no_id() {
        let (_dir, service) = setup();
        let err = service.register_schema("../escape", &test_schema()).unwrap_err();
        assert!(err.is_validation());
        assert!(service.schema_ids().is_empty());
        assert!(lock_unpoisoned(&service.registration_locks).is_empty());
        assert_eq!(service.register_schema("ok", &test_schema()).unwrap(), 1);
    }

    #[test]
    fn test_validate_data() {
        let (_dir, service) = setup();
        service.register_schema("test", &test_schema()).unwrap();

        assert!(!service.validate_data(&json!({"optional": "x"}), "test"));
        assert!(service.validate_data(&json!({"id": "1", "optional": "x"}), "test"));
        assert!(service.validate_data(&json!({"id": "1", "unknown": true}), "test"));
        assert!(!service.validate_data(&json!(["id"]), "test"));
        assert!(!service.validate_data(&json!({"id": "1"}), "missing"));
    }

    #[test]
    fn test_validate_data_non_record() {
        let (_dir, service) = setup();
        let schema = Schema::from_json(json!({"type": "string"})).unwrap();
        service.register_schema("plain", &schema).unwrap();
        assert!(service.validate_data(&json!("anything"), "plain"));
    }

    #[test]
    fn test_unknown_name_behaviour() {
        let (_dir, service) = setup();
        assert!(service.get_schema_versions("nope").is_empty());
        assert!(service.store().list_versions("nope").unwrap_err().is_not_found());
        assert!(service.get_latest_schema_version("nope").unwrap_err().is_not_found());
        assert!(service.get_schema("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_schema_by_id() {
        let (_dir, service) = setup();
        let id = service.register_schema("test", &test_schema()).unwrap();
        assert_eq!(service.get_schema_by_id(id).unwrap(), test_schema());
        assert!(matches!(
            service.get_schema_by_id(99).unwrap_err(),
            SchemaError::IdNotFound(99)
        ));
    }

    #[test]
    fn test_existing_names_get_ids_on_startup() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SchemaStore::open(dir.path()).unwrap());
        store.save("message", &test_schema(), 1).unwrap();
        store.save("event", &test_schema(), 1).unwrap();

        let service = SchemaService::new(store).unwrap();
        assert_eq!(service.get_schema_id("event"), Some(1));
        assert_eq!(service.get_schema_id("message"), Some(2));
        assert_eq!(service.register_schema("order", &test_schema()).unwrap(), 3);
    }

    #[test]
    fn test_concurrent_registration_of_same_name() {
        let (_dir, service) = setup();
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || service.register_schema("test", &test_schema()).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }

        assert_eq!(service.get_schema_versions("test"), (1..=8).collect::<Vec<u32>>());
    }

    #[test]
    fn test_registration_after_highest_version_fails_cleanly() {
        let (_dir, service) = setup();
        service.store().save("test", &test_schema(), u32::MAX).unwrap();

        let err = service.register_schema("test", &test_schema()).unwrap_err();
        assert!(err.is_validation());
        assert!(service.get_schema_id("test").is_none());
        assert_eq!(service.get_schema_versions("test"), vec![u32::MAX]);
        assert!(service.store().find_metadata("test").unwrap().is_none());
    }
}
