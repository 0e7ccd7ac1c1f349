//! Familiar Schema Store
//!
//! A filesystem-backed schema registry for Avro-style record schemas. Each
//! schema name owns a directory of numbered versions plus a metadata file,
//! and new versions are admitted only if they are compatible with what is
//! already stored.
//!
//! ## Features
//!
//! - **Versioned Storage**: Versions are only ever added, never rewritten by registration
//! - **Compatibility Checking**: NONE / BACKWARD / FORWARD / FULL and their transitive variants
//! - **Read Cache**: Decoded schemas and metadata are cached per store instance
//! - **Schema IDs**: Process-local integer IDs for every known schema name
//!
//! ## Architecture
//!
//! ```text
//! schemas/
//! ├── message/
//! │   ├── v1.avsc
//! │   ├── v2.avsc
//! │   └── schema.meta.yaml
//! ├── event/
//! │   ├── v1.avsc
//! │   └── schema.meta.yaml
//! └── registry.yaml        (optional, not read by the store)
//! ```
//!
//! ```text
//! SchemaService ──► MetadataManager ──► SchemaStore ──► disk
//!       └───────────────────────────────────┘
//! ```

pub mod cache;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod ids;
pub mod manager;
pub mod metadata;
pub mod schema;
pub mod service;
pub mod store;

pub use compatibility::{ChangeType, CompatibilityChecker, CompatibilityResult, SchemaChange};
pub use config::{CompatibilityConfig, RegistryConfig, StoreConfig};
pub use error::{Result, SchemaError};
pub use ids::SchemaIdMap;
pub use manager::MetadataManager;
pub use metadata::{CompatibilityMode, SchemaMetadata};
pub use schema::{Field, RecordType, Schema, SchemaKind, TypeExpr};
pub use service::SchemaService;
pub use store::{ListReport, SchemaListing, SchemaStore, SkippedEntry, StoreStats};
