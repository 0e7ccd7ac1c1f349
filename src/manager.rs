//! Metadata lifecycle and the compatibility gate
//!
//! [`MetadataManager`] owns the rules for when a candidate schema may become
//! the next version of a name, and for how metadata changes over time.

use std::sync::Arc;

use tracing::{debug, info};

use crate::compatibility::{CompatibilityChecker, CompatibilityResult};
use crate::config::CompatibilityConfig;
use crate::error::{Result, SchemaError};
use crate::metadata::{CompatibilityMode, SchemaMetadata};
use crate::schema::Schema;
use crate::store::SchemaStore;

/// Compatibility engine and metadata lifecycle over a [`SchemaStore`]
#[derive(Debug, Clone)]
pub struct MetadataManager {
    store: Arc<SchemaStore>,
    config: CompatibilityConfig,
}

impl MetadataManager {
    pub fn new(store: Arc<SchemaStore>) -> Self {
        Self::with_config(store, CompatibilityConfig::default())
    }

    pub fn with_config(store: Arc<SchemaStore>, config: CompatibilityConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<SchemaStore> {
        &self.store
    }

    /// Whether `candidate` may become the next version of `name`
    pub fn validate_compatibility(&self, candidate: &Schema, name: &str) -> Result<bool> {
        Ok(self.check(candidate, name)?.is_compatible)
    }

    /// Run the compatibility gate and report every detected change.
    ///
    /// A name without metadata or without any stored version is vacuously
    /// compatible. Transitive modes compare against the latest version
    /// unless `transitive_scan` is enabled.
    pub fn check(&self, candidate: &Schema, name: &str) -> Result<CompatibilityResult> {
        let mode = match self.store.find_metadata(name)? {
            Some(metadata) => metadata.compatibility,
            None => {
                debug!(name, "no metadata, treating schema as compatible");
                return Ok(CompatibilityResult::compatible(self.config.default_mode, Vec::new()));
            }
        };

        let checker = CompatibilityChecker::new(mode);
        if mode == CompatibilityMode::None {
            return Ok(CompatibilityResult::compatible(mode, Vec::new()));
        }

        if mode.is_transitive() && self.config.transitive_scan {
            let previous = self.store.load_all_versions(name)?;
            debug!(name, %mode, versions = previous.len(), "transitive compatibility scan");
            let result = previous
                .iter()
                .rev()
                .map(|(_, schema)| checker.check(schema, candidate))
                .reduce(CompatibilityResult::merge);
            return Ok(result.unwrap_or_else(|| CompatibilityResult::compatible(mode, Vec::new())));
        }

        match self.store.find_latest(name)? {
            Some((version, latest)) => {
                debug!(name, %mode, version, "checking against latest version");
                Ok(checker.check(&latest, candidate))
            }
            None => Ok(CompatibilityResult::compatible(mode, Vec::new())),
        }
    }

    /// Change the compatibility mode of an existing schema name
    pub fn update_compatibility(&self, name: &str, mode: &str) -> Result<SchemaMetadata> {
        let mode: CompatibilityMode = mode.parse()?;
        let mut metadata = self.existing_metadata(name)?;

        metadata.compatibility = mode;
        metadata.touch();
        self.store.save_metadata(name, &metadata)?;

        info!(name, %mode, "updated compatibility mode");
        Ok(metadata)
    }

    /// Replace the description of an existing schema name
    pub fn update_description(&self, name: &str, description: &str) -> Result<SchemaMetadata> {
        let mut metadata = self.existing_metadata(name)?;

        metadata.description = description.to_string();
        metadata.touch();
        self.store.save_metadata(name, &metadata)?;

        info!(name, "updated description");
        Ok(metadata)
    }

    /// Fresh metadata for a brand-new schema name; not persisted
    pub fn create_metadata_for_new_schema(
        &self,
        name: &str,
        description: &str,
        tags: Vec<String>,
    ) -> SchemaMetadata {
        let mut metadata = SchemaMetadata::new(name, description, tags);
        metadata.compatibility = self.config.default_mode;
        metadata
    }

    /// Copy of the current metadata with the version bumped; not persisted
    pub fn increment_version(&self, name: &str) -> Result<SchemaMetadata> {
        match self.store.find_metadata(name)? {
            Some(mut metadata) => {
                metadata.version = metadata.version.checked_add(1).ok_or_else(|| {
                    SchemaError::InvalidArgument(format!(
                        "schema '{}' is already at the highest version",
                        name
                    ))
                })?;
                metadata.touch();
                Ok(metadata)
            }
            None => Ok(self.create_metadata_for_new_schema(name, "", Vec::new())),
        }
    }

    /// Every compatibility mode name, in order
    pub fn compatibility_types(&self) -> Vec<&'static str> {
        CompatibilityMode::ALL.iter().map(CompatibilityMode::as_str).collect()
    }

    fn existing_metadata(&self, name: &str) -> Result<SchemaMetadata> {
        self.store.find_metadata(name)?.ok_or_else(|| {
            SchemaError::Compatibility(format!("no metadata exists for schema '{}'", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, MetadataManager) {
        let dir = tempdir().unwrap();
        let store = Arc::new(SchemaStore::open(dir.path()).unwrap());
        (dir, MetadataManager::new(store))
    }

    fn base() -> Schema {
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

    fn candidate(new_field: serde_json::Value) -> Schema {
        Schema::from_json(json!({
            "type": "record",
            "name": "Test",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "optional", "type": "string", "default": ""},
                new_field
            ]
        }))
        .unwrap()
    }

    fn seed(manager: &MetadataManager, name: &str) {
        manager.store().save(name, &base(), 1).unwrap();
        let metadata = manager.create_metadata_for_new_schema(name, "", Vec::new());
        manager.store().save_metadata(name, &metadata).unwrap();
    }

    #[test]
    fn test_addition_with_default_passes() {
        let (_dir, manager) = setup();
        seed(&manager, "test");
        let new = candidate(json!({"name": "new_field", "type": "string", "default": "default"}));
        assert!(manager.validate_compatibility(&new, "test").unwrap());
    }

    #[test]
    fn test_required_addition_fails() {
        let (_dir, manager) = setup();
        seed(&manager, "test");
        let new = candidate(json!({"name": "new_field", "type": "string"}));
        assert!(!manager.validate_compatibility(&new, "test").unwrap());
    }

    #[test]
    fn test_unknown_name_is_compatible() {
        let (_dir, manager) = setup();
        let new = candidate(json!({"name": "new_field", "type": "string"}));
        assert!(manager.validate_compatibility(&new, "fresh").unwrap());
    }

    #[test]
    fn test_metadata_without_versions_is_compatible() {
        let (_dir, manager) = setup();
        let metadata = manager.create_metadata_for_new_schema("pending", "", Vec::new());
        manager.store().save_metadata("pending", &metadata).unwrap();
        let new = candidate(json!({"name": "new_field", "type": "string"}));
        assert!(manager.validate_compatibility(&new, "pending").unwrap());
    }

    #[test]
    fn test_none_mode_skips_checks() {
        let (_dir, manager) = setup();
        seed(&manager, "test");
        manager.update_compatibility("test", "NONE").unwrap();
        let new = candidate(json!({"name": "new_field", "type": "string"}));
        assert!(manager.validate_compatibility(&new, "test").unwrap());
    }

    #[test]
    fn test_update_compatibility() {
        let (_dir, manager) = setup();
        seed(&manager, "test");
        let before = manager.store().load_metadata("test").unwrap();

        let updated = manager.update_compatibility("test", "FULL_TRANSITIVE").unwrap();
        assert_eq!(updated.compatibility, CompatibilityMode::FullTransitive);
        assert!(updated.updated_at >= before.updated_at);
        assert_eq!(updated.created_at, before.created_at);
        assert_eq!(manager.store().load_metadata("test").unwrap(), updated);
    }

    #[test]
    fn test_update_compatibility_errors() {
        let (_dir, manager) = setup();
        assert!(matches!(
            manager.update_compatibility("missing", "FULL").unwrap_err(),
            SchemaError::Compatibility(_)
        ));

        seed(&manager, "test");
        assert!(matches!(
            manager.update_compatibility("test", "full").unwrap_err(),
            SchemaError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_update_description() {
        let (_dir, manager) = setup();
        seed(&manager, "test");
        let updated = manager.update_description("test", "Test records").unwrap();
        assert_eq!(updated.description, "Test records");
        assert!(manager.update_description("missing", "x").is_err());
    }

    #[test]
    fn test_create_metadata_defaults() {
        let (_dir, manager) = setup();
        let metadata =
            manager.create_metadata_for_new_schema("event", "Events", vec!["audit".into()]);
        assert_eq!(metadata.name, "event");
        assert_eq!(metadata.compatibility, CompatibilityMode::Backward);
        assert_eq!(metadata.version, 1);
        assert_eq!(metadata.tags, vec!["audit".to_string()]);
        assert_eq!(metadata.created_at, metadata.updated_at);
    }

    #[test]
    fn test_increment_version() {
        let (_dir, manager) = setup();
        assert_eq!(manager.increment_version("fresh").unwrap().version, 1);

        seed(&manager, "test");
        let bumped = manager.increment_version("test").unwrap();
        assert_eq!(bumped.version, 2);
        // not persisted
        assert_eq!(manager.store().load_metadata("test").unwrap().version, 1);

        let mut metadata = manager.store().load_metadata("test").unwrap();
        metadata.version = u32::MAX;
        manager.store().save_metadata("test", &metadata).unwrap();
        assert!(matches!(
            manager.increment_version("test").unwrap_err(),
            SchemaError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_compatibility_types() {
        let (_dir, manager) = setup();
        assert_eq!(
            manager.compatibility_types(),
            vec![
                "NONE",
                "BACKWARD",
                "BACKWARD_TRANSITIVE",
                "FORWARD",
                "FORWARD_TRANSITIVE",
                "FULL",
                "FULL_TRANSITIVE"
            ]
        );
    }

    #[test]
    fn test_transitive_modes_use_latest_by_default() {
        let (_dir, manager) = setup();
        seed(&manager, "test");
        // v2 drops the defaulted field, which v1 readers tolerate
        let v2 = Schema::from_json(json!({
            "type": "record",
            "name": "Test",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "extra", "type": "int", "default": 0}
            ]
        }))
        .unwrap();
        manager.store().save("test", &v2, 2).unwrap();
        manager.update_compatibility("test", "BACKWARD_TRANSITIVE").unwrap();

        // fine against v2, but brings back `optional` with a different type than v1
        let v3 = Schema::from_json(json!({
            "type": "record",
            "name": "Test",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "extra", "type": "int", "default": 0},
                {"name": "optional", "type": "int", "default": 0}
            ]
        }))
        .unwrap();
        assert!(manager.validate_compatibility(&v3, "test").unwrap());

        let scanning = MetadataManager::with_config(
            manager.store().clone(),
            CompatibilityConfig {
                transitive_scan: true,
                ..CompatibilityConfig::default()
            },
        );
        let result = scanning.check(&v3, "test").unwrap();
        assert!(!result.is_compatible);
        assert!(result.breaking_changes().any(|c| c.path == "fields.optional.type"));
    }
}
