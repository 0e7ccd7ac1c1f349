//! Schema Store
//!
//! Durable storage of schema versions and per-name metadata on the local
//! filesystem, with an in-process read cache.
//!
//! ```text
//! <root>/
//! ├── message/
//! │   ├── v1.avsc
//! │   ├── v2.avsc
//! │   └── schema.meta.yaml
//! └── event/
//!     ├── v1.avsc
//!     └── schema.meta.yaml
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::DocumentCache;
use crate::config::StoreConfig;
use crate::error::{Result, SchemaError};
use crate::metadata::SchemaMetadata;
use crate::schema::{validate_structure, Schema};

/// Default extension for schema version files
pub const DEFAULT_SCHEMA_EXTENSION: &str = "avsc";

/// Default metadata file name inside each schema directory
pub const DEFAULT_METADATA_FILENAME: &str = "schema.meta.yaml";

/// Every schema by name, then by version
pub type SchemaListing = BTreeMap<String, BTreeMap<u32, Schema>>;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^/\\\x00]+$").expect("valid name regex"))
}

/// Whether `name` can be used as a schema directory name: a single path
/// component that stays inside the root
pub fn is_valid_name(name: &str) -> bool {
    name != "." && name != ".." && name_pattern().is_match(name)
}

/// Read/hit counters, for observing cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub schema_reads: u64,
    pub schema_cache_hits: u64,
    pub metadata_reads: u64,
    pub metadata_cache_hits: u64,
}

#[derive(Debug, Default)]
struct Counters {
    schema_reads: AtomicU64,
    schema_cache_hits: AtomicU64,
    metadata_reads: AtomicU64,
    metadata_cache_hits: AtomicU64,
}

/// An entry `list_all` could not load
#[derive(Debug)]
pub struct SkippedEntry {
    pub name: String,
    /// `None` when the name's versions could not be listed at all
    pub version: Option<u32>,
    pub error: SchemaError,
}

/// Outcome of a best-effort listing
#[derive(Debug, Default)]
pub struct ListReport {
    pub schemas: SchemaListing,
    pub skipped: Vec<SkippedEntry>,
}

/// Filesystem-backed schema store
#[derive(Debug)]
pub struct SchemaStore {
    root: PathBuf,
    schema_extension: String,
    metadata_filename: String,
    schemas: DocumentCache<(String, u32), Schema>,
    metadata: DocumentCache<String, SchemaMetadata>,
    counters: Counters,
}

impl SchemaStore {
    /// Open a store rooted at an existing directory, using the default layout
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_layout(root, DEFAULT_SCHEMA_EXTENSION, DEFAULT_METADATA_FILENAME)
    }

    /// Open a store from configuration
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::with_layout(&config.root, &config.schema_extension, &config.metadata_filename)
    }

    /// Open a store with a custom file extension and metadata file name.
    ///
    /// The root directory is never created here.
    pub fn with_layout(
        root: impl AsRef<Path>,
        schema_extension: &str,
        metadata_filename: &str,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(SchemaError::InvalidArgument(format!(
                "schema root directory does not exist: {}",
                root.display()
            )));
        }

        let schema_extension = schema_extension.trim_start_matches('.').to_string();
        if schema_extension.is_empty() {
            return Err(SchemaError::InvalidArgument(
                "schema file extension must not be empty".to_string(),
            ));
        }

        debug!(root = %root.display(), "opened schema store");

        Ok(Self {
            root,
            schema_extension,
            metadata_filename: metadata_filename.to_string(),
            schemas: DocumentCache::new(),
            metadata: DocumentCache::new(),
            counters: Counters::default(),
        })
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every version of `name`
    pub fn schema_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path of a single schema version file
    pub fn schema_path(&self, name: &str, version: u32) -> PathBuf {
        self.schema_dir(name)
            .join(format!("v{}.{}", version, self.schema_extension))
    }

    /// Path of the metadata file for `name`
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.schema_dir(name).join(&self.metadata_filename)
    }

    /// Load a schema version; `None` loads the latest.
    pub fn load(&self, name: &str, version: Option<u32>) -> Result<Schema> {
        check_name(name)?;

        let version = match version {
            Some(v) => v,
            None => self.latest_version(name)?,
        };

        let key = (name.to_string(), version);
        if let Some(schema) = self.schemas.get(&key) {
            self.counters.schema_cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(name, version, "schema cache hit");
            return Ok(schema);
        }

        if !self.schema_dir(name).is_dir() {
            return Err(SchemaError::NotFound { name: name.to_string() });
        }

        let path = self.schema_path(name, version);
        if !path.is_file() {
            return Err(SchemaError::VersionNotFound {
                name: name.to_string(),
                version,
            });
        }

        let text = fs::read_to_string(&path).map_err(|e| {
            SchemaError::validation_caused_by(format!("failed to read {}", path.display()), e)
        })?;
        self.counters.schema_reads.fetch_add(1, Ordering::Relaxed);

        let schema = Schema::parse(&text).map_err(|e| {
            SchemaError::validation_caused_by(format!("invalid schema in {}", path.display()), e)
        })?;

        debug!(name, version, path = %path.display(), "loaded schema from disk");
        self.schemas.insert(key, schema.clone());
        Ok(schema)
    }

    /// Write `schema` as `version` of `name`, creating the directory if needed.
    ///
    /// An existing file for the same version is overwritten.
    pub fn save(&self, name: &str, schema: &Schema, version: u32) -> Result<()> {
        check_name(name)?;
        if version == 0 {
            return Err(SchemaError::InvalidArgument(
                "schema versions start at 1".to_string(),
            ));
        }

        validate_structure(schema.document())?;

        let dir = self.schema_dir(name);
        fs::create_dir_all(&dir).map_err(|e| {
            SchemaError::validation_caused_by(format!("failed to create {}", dir.display()), e)
        })?;

        let path = self.schema_path(name, version);
        let content = schema.to_pretty_json()?;
        fs::write(&path, content).map_err(|e| {
            SchemaError::validation_caused_by(format!("failed to write {}", path.display()), e)
        })?;

        self.schemas.invalidate(&(name.to_string(), version));
        info!(name, version, path = %path.display(), "saved schema");
        Ok(())
    }

    /// Every loadable schema, by name and version.
    ///
    /// Entries that fail to load are logged and left out.
    pub fn list_all(&self) -> Result<SchemaListing> {
        let report = self.list_all_report()?;
        for skipped in &report.skipped {
            warn!(
                name = %skipped.name,
                version = ?skipped.version,
                error = %skipped.error,
                "skipping unloadable schema"
            );
        }
        Ok(report.schemas)
    }

    /// Best-effort listing that also reports what was skipped and why
    pub fn list_all_report(&self) -> Result<ListReport> {
        let mut report = ListReport::default();

        for name in self.list_names()? {
            let versions = match self.list_versions(&name) {
                Ok(versions) => versions,
                Err(error) => {
                    report.skipped.push(SkippedEntry { name, version: None, error });
                    continue;
                }
            };

            let mut loaded = BTreeMap::new();
            for version in versions {
                match self.load(&name, Some(version)) {
                    Ok(schema) => {
                        loaded.insert(version, schema);
                    }
                    Err(error) => report.skipped.push(SkippedEntry {
                        name: name.clone(),
                        version: Some(version),
                        error,
                    }),
                }
            }

            if !loaded.is_empty() {
                report.schemas.insert(name, loaded);
            }
        }

        Ok(report)
    }

    /// Names of every schema directory under the root, sorted
    pub fn list_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .filter(|name| is_valid_name(name))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Version numbers present for `name`, ascending
    pub fn list_versions(&self, name: &str) -> Result<Vec<u32>> {
        check_name(name)?;

        let dir = self.schema_dir(name);
        if !dir.is_dir() {
            return Err(SchemaError::NotFound { name: name.to_string() });
        }

        let mut versions: Vec<u32> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.file_name().to_str().and_then(|f| self.parse_version(f)))
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    /// Highest version present for `name`
    pub fn latest_version(&self, name: &str) -> Result<u32> {
        self.list_versions(name)?
            .into_iter()
            .max()
            .ok_or_else(|| SchemaError::NotFound { name: name.to_string() })
    }

    /// Latest version and its schema, or `None` if `name` has no versions yet
    pub fn find_latest(&self, name: &str) -> Result<Option<(u32, Schema)>> {
        check_name(name)?;
        if !self.schema_dir(name).is_dir() {
            return Ok(None);
        }
        match self.list_versions(name)?.into_iter().max() {
            Some(version) => Ok(Some((version, self.load(name, Some(version))?))),
            None => Ok(None),
        }
    }

    /// Every stored version of `name`, ascending; empty if the name is unknown
    pub fn load_all_versions(&self, name: &str) -> Result<Vec<(u32, Schema)>> {
        check_name(name)?;
        if !self.schema_dir(name).is_dir() {
            return Ok(Vec::new());
        }
        self.list_versions(name)?
            .into_iter()
            .map(|version| self.load(name, Some(version)).map(|schema| (version, schema)))
            .collect()
    }

    /// Load metadata for `name`
    pub fn load_metadata(&self, name: &str) -> Result<SchemaMetadata> {
        self.find_metadata(name)?
            .ok_or_else(|| SchemaError::MetadataNotFound(name.to_string()))
    }

    /// Load metadata for `name`, or `None` if no metadata file exists
    pub fn find_metadata(&self, name: &str) -> Result<Option<SchemaMetadata>> {
        check_name(name)?;

        if let Some(metadata) = self.metadata.get(&name.to_string()) {
            self.counters.metadata_cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(metadata));
        }

        let path = self.metadata_path(name);
        if !path.is_file() {
            return Ok(None);
        }

        let text = fs::read_to_string(&path).map_err(|e| {
            SchemaError::validation_caused_by(format!("failed to read {}", path.display()), e)
        })?;
        self.counters.metadata_reads.fetch_add(1, Ordering::Relaxed);

        let metadata = SchemaMetadata::from_yaml(&text).map_err(|e| {
            SchemaError::validation_caused_by(format!("invalid metadata in {}", path.display()), e)
        })?;

        self.metadata.insert(name.to_string(), metadata.clone());
        Ok(Some(metadata))
    }

    /// Write metadata for `name`, creating the directory if needed
    pub fn save_metadata(&self, name: &str, metadata: &SchemaMetadata) -> Result<()> {
        check_name(name)?;

        let dir = self.schema_dir(name);
        fs::create_dir_all(&dir).map_err(|e| {
            SchemaError::validation_caused_by(format!("failed to create {}", dir.display()), e)
        })?;

        let path = self.metadata_path(name);
        let content = metadata.to_yaml().map_err(|e| {
            SchemaError::validation_caused_by(format!("failed to encode metadata for {}", name), e)
        })?;
        fs::write(&path, content).map_err(|e| {
            SchemaError::validation_caused_by(format!("failed to write {}", path.display()), e)
        })?;

        self.metadata.invalidate(&name.to_string());
        debug!(name, version = metadata.version, "saved metadata");
        Ok(())
    }

    /// Structural check of an arbitrary file; never fails
    pub fn validate_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let result = fs::read_to_string(path)
            .map_err(SchemaError::from)
            .and_then(|text| Schema::parse(&text));

        match result {
            Ok(_) => true,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "schema file failed validation");
                false
            }
        }
    }

    /// Drop both caches
    pub fn clear_cache(&self) {
        self.schemas.clear();
        self.metadata.clear();
        debug!("cleared schema and metadata caches");
    }

    /// Snapshot of read/hit counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            schema_reads: self.counters.schema_reads.load(Ordering::Relaxed),
            schema_cache_hits: self.counters.schema_cache_hits.load(Ordering::Relaxed),
            metadata_reads: self.counters.metadata_reads.load(Ordering::Relaxed),
            metadata_cache_hits: self.counters.metadata_cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Parse `v<N>.<ext>` into `N`
    fn parse_version(&self, filename: &str) -> Option<u32> {
        let stem = filename
            .strip_prefix('v')?
            .strip_suffix(self.schema_extension.as_str())?
            .strip_suffix('.')?;
        // only the spelling `schema_path` produces; no sign, no zero padding
        let version = stem.parse::<u32>().ok().filter(|v| *v > 0)?;
        (version.to_string() == stem).then_some(version)
    }
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidArgument(format!("invalid schema name '{}'", name)))
    }
}
