//! Schema compatibility checking
//!
//! Decides whether a candidate schema may follow an existing one under a
//! [`CompatibilityMode`]. The rule is deliberately shallow: top-level kinds
//! must match, record fields are compared by name, and field types must be
//! equal or (for unions) share an alternative. No type promotion is modelled.

use serde::{Deserialize, Serialize};

use crate::metadata::CompatibilityMode;
use crate::schema::{Field, RecordType, Schema};

/// Result of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Mode the check ran under
    pub mode: CompatibilityMode,
    /// Whether the schemas are compatible
    pub is_compatible: bool,
    /// List of changes detected
    pub changes: Vec<SchemaChange>,
    /// Summary of the compatibility check
    pub summary: String,
}

impl CompatibilityResult {
    /// Create a compatible result
    pub fn compatible(mode: CompatibilityMode, changes: Vec<SchemaChange>) -> Self {
        let summary = if changes.is_empty() {
            "No changes detected".to_string()
        } else {
            format!("{} compatible changes detected", changes.len())
        };
        Self {
            mode,
            is_compatible: true,
            changes,
            summary,
        }
    }

    /// Create an incompatible result
    pub fn incompatible(
        mode: CompatibilityMode,
        changes: Vec<SchemaChange>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            is_compatible: false,
            changes,
            summary: reason.into(),
        }
    }

    /// Changes that violate the mode
    pub fn breaking_changes(&self) -> impl Iterator<Item = &SchemaChange> {
        self.changes.iter().filter(|c| c.is_breaking)
    }

    /// Fold another result (e.g. against an older version) into this one
    pub fn merge(mut self, other: CompatibilityResult) -> Self {
        if self.is_compatible && !other.is_compatible {
            self.summary = other.summary.clone();
        }
        self.is_compatible &= other.is_compatible;
        for change in other.changes {
            let seen = self
                .changes
                .iter()
                .any(|c| c.path == change.path && c.change_type == change.change_type);
            if !seen {
                self.changes.push(change);
            }
        }
        self
    }
}

/// A detected change between schema versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChange {
    /// Type of change
    pub change_type: ChangeType,
    /// Path to the changed element (e.g., "fields.name.type")
    pub path: String,
    /// Old value (if applicable)
    pub old_value: Option<String>,
    /// New value (if applicable)
    pub new_value: Option<String>,
    /// Whether this change violates the mode
    pub is_breaking: bool,
    /// Human-readable description
    pub description: String,
}

/// Type of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The top-level `type` changed
    KindChanged,
    /// A new field was added
    FieldAdded,
    /// A field was removed
    FieldRemoved,
    /// A field's type changed
    TypeChanged,
    /// Default value added, removed or changed
    DefaultChanged,
}

/// Compatibility checker for one mode
#[derive(Debug, Clone, Copy)]
pub struct CompatibilityChecker {
    mode: CompatibilityMode,
}

impl CompatibilityChecker {
    pub fn new(mode: CompatibilityMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CompatibilityMode {
        self.mode
    }

    /// Check whether `new` may follow `old`
    pub fn check(&self, old: &Schema, new: &Schema) -> CompatibilityResult {
        let mut changes = detect_changes(old, new);

        if self.mode == CompatibilityMode::None {
            for change in &mut changes {
                change.is_breaking = false;
            }
            return CompatibilityResult::compatible(self.mode, changes);
        }

        // Forward is the backward rule with the operands swapped. Both
        // directions report the same paths, so violations line up by path.
        let forward_violations: Vec<String> = if self.mode.checks_forward() {
            detect_changes(new, old)
                .into_iter()
                .filter(|c| c.is_breaking)
                .map(|c| c.path)
                .collect()
        } else {
            Vec::new()
        };

        for change in &mut changes {
            let backward = self.mode.checks_backward() && change.is_breaking;
            let forward = forward_violations.contains(&change.path);
            change.is_breaking = backward || forward;
        }

        let breaking_count = changes.iter().filter(|c| c.is_breaking).count();
        if breaking_count > 0 {
            let reason = format!(
                "{} breaking changes detected under {}",
                breaking_count, self.mode
            );
            CompatibilityResult::incompatible(self.mode, changes, reason)
        } else {
            CompatibilityResult::compatible(self.mode, changes)
        }
    }

    /// Convenience wrapper returning only the verdict
    pub fn is_compatible(&self, old: &Schema, new: &Schema) -> bool {
        self.check(old, new).is_compatible
    }
}

impl Default for CompatibilityChecker {
    fn default() -> Self {
        Self::new(CompatibilityMode::Backward)
    }
}

/// Changes from `old` to `new`, with `is_breaking` set by the backward rule
pub fn detect_changes(old: &Schema, new: &Schema) -> Vec<SchemaChange> {
    if old.type_name() != new.type_name() {
        return vec![SchemaChange {
            change_type: ChangeType::KindChanged,
            path: "type".to_string(),
            old_value: Some(old.type_name().to_string()),
            new_value: Some(new.type_name().to_string()),
            is_breaking: true,
            description: format!(
                "Schema kind changed from '{}' to '{}'",
                old.type_name(),
                new.type_name()
            ),
        }];
    }

    match (old.as_record(), new.as_record()) {
        (Some(old_record), Some(new_record)) => detect_record_changes(old_record, new_record),
        _ => Vec::new(),
    }
}

fn detect_record_changes(old: &RecordType, new: &RecordType) -> Vec<SchemaChange> {
    let mut changes = Vec::new();

    for old_field in &old.fields {
        let path = format!("fields.{}", old_field.name);
        match new.field(&old_field.name) {
            None => {
                // Only a field that carried a default can be dropped safely
                let has_default = old_field.has_default();
                changes.push(SchemaChange {
                    change_type: ChangeType::FieldRemoved,
                    path,
                    old_value: Some(describe_field(old_field)),
                    new_value: None,
                    is_breaking: !has_default,
                    description: if has_default {
                        format!("Field '{}' with default was removed", old_field.name)
                    } else {
                        format!("Field '{}' without default was removed (breaking)", old_field.name)
                    },
                });
            }
            Some(new_field) => {
                if old_field.ty != new_field.ty {
                    let compatible = old_field.ty.is_compatible_with(&new_field.ty);
                    changes.push(SchemaChange {
                        change_type: ChangeType::TypeChanged,
                        path: format!("{}.type", path),
                        old_value: Some(format!("{:?}", old_field.ty)),
                        new_value: Some(format!("{:?}", new_field.ty)),
                        is_breaking: !compatible,
                        description: if compatible {
                            format!("Field '{}' union alternatives changed", old_field.name)
                        } else {
                            format!("Field '{}' type changed (breaking)", old_field.name)
                        },
                    });
                }
                if old_field.default != new_field.default {
                    changes.push(SchemaChange {
                        change_type: ChangeType::DefaultChanged,
                        path: format!("{}.default", path),
                        old_value: old_field.default.as_ref().map(|d| d.to_string()),
                        new_value: new_field.default.as_ref().map(|d| d.to_string()),
                        is_breaking: false,
                        description: format!("Field '{}' default changed", old_field.name),
                    });
                }
            }
        }
    }

    for new_field in &new.fields {
        if old.field(&new_field.name).is_some() {
            continue;
        }
        let has_default = new_field.has_default();
        changes.push(SchemaChange {
            change_type: ChangeType::FieldAdded,
            path: format!("fields.{}", new_field.name),
            old_value: None,
            new_value: Some(describe_field(new_field)),
            is_breaking: !has_default,
            description: if has_default {
                format!("Field '{}' was added with default value", new_field.name)
            } else {
                format!("Field '{}' was added without default (breaking)", new_field.name)
            },
        });
    }

    changes
}

fn describe_field(field: &Field) -> String {
    match &field.default {
        Some(default) => format!("{}: {:?} = {}", field.name, field.ty, default),
        None => format!("{}: {:?}", field.name, field.ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    fn with_extra(extra: serde_json::Value) -> Schema {
        Schema::from_json(json!({
            "type": "record",
            "name": "Test",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "optional", "type": "string", "default": ""},
                extra
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_compatible_field_addition() {
        let candidate = with_extra(json!({
            "name": "new_field",
            "type": "string",
            "default": "default"
        }));
        let result =
            CompatibilityChecker::new(CompatibilityMode::Backward).check(&base(), &candidate);

        assert!(result.is_compatible);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].change_type, ChangeType::FieldAdded);
    }

    #[test]
    fn test_breaking_required_addition() {
        let candidate = with_extra(json!({"name": "new_field", "type": "string"}));
        let result =
            CompatibilityChecker::new(CompatibilityMode::Backward).check(&base(), &candidate);

        assert!(!result.is_compatible);
        assert_eq!(result.breaking_changes().count(), 1);
        assert_eq!(result.breaking_changes().next().unwrap().path, "fields.new_field");
    }

    #[test]
    fn test_field_removal() {
        let old = with_extra(json!({"name": "gone", "type": "int"}));
        let result = CompatibilityChecker::new(CompatibilityMode::Backward).check(&old, &base());
        assert!(!result.is_compatible);

        let old = with_extra(json!({"name": "gone", "type": "int", "default": 0}));
        let result = CompatibilityChecker::new(CompatibilityMode::Backward).check(&old, &base());
        assert!(result.is_compatible);
    }

    #[test]
    fn test_type_change() {
        let old = with_extra(json!({"name": "count", "type": "int"}));
        let new = with_extra(json!({"name": "count", "type": "long"}));
        let checker = CompatibilityChecker::new(CompatibilityMode::Backward);
        // no int -> long promotion
        assert!(!checker.is_compatible(&old, &new));

        let old = with_extra(json!({"name": "note", "type": ["null", "string"], "default": null}));
        let new = with_extra(json!({
            "name": "note",
            "type": ["string", "null", "int"],
            "default": null
        }));
        assert!(checker.is_compatible(&old, &new));

        let new = with_extra(json!({"name": "note", "type": ["int", "long"], "default": null}));
        assert!(!checker.is_compatible(&old, &new));
    }

    #[test]
    fn test_kind_change_is_breaking() {
        let enum_schema =
            Schema::from_json(json!({"type": "enum", "name": "Test", "symbols": ["A"]})).unwrap();
        let result =
            CompatibilityChecker::new(CompatibilityMode::Full).check(&base(), &enum_schema);
        assert!(!result.is_compatible);
        assert_eq!(result.changes[0].change_type, ChangeType::KindChanged);
    }

    #[test]
    fn test_non_record_kinds_pass() {
        let a = Schema::from_json(json!({"type": "enum", "name": "Color", "symbols": ["RED"]}))
            .unwrap();
        let b = Schema::from_json(json!({
            "type": "enum",
            "name": "Color",
            "symbols": ["RED", "BLUE"]
        }))
        .unwrap();
        assert!(CompatibilityChecker::new(CompatibilityMode::Full).is_compatible(&a, &b));
    }

    #[test]
    fn test_forward_and_full() {
        let candidate = with_extra(json!({"name": "new_field", "type": "string"}));
        for mode in [
            CompatibilityMode::Forward,
            CompatibilityMode::Full,
            CompatibilityMode::FullTransitive,
        ] {
            assert!(
                !CompatibilityChecker::new(mode).is_compatible(&base(), &candidate),
                "{}",
                mode
            );
        }

        let candidate = with_extra(json!({"name": "new_field", "type": "string", "default": "x"}));
        for mode in [CompatibilityMode::Forward, CompatibilityMode::Full] {
            assert!(CompatibilityChecker::new(mode).is_compatible(&base(), &candidate), "{}", mode);
        }
    }

    #[test]
    fn test_none_accepts_anything() {
        let candidate = with_extra(json!({"name": "new_field", "type": "string"}));
        let result = CompatibilityChecker::new(CompatibilityMode::None).check(&base(), &candidate);
        assert!(result.is_compatible);
        assert_eq!(result.breaking_changes().count(), 0);
    }

    #[test]
    fn test_merge_keeps_first_failure_summary() {
        let checker = CompatibilityChecker::new(CompatibilityMode::Backward);
        let ok = checker.check(&base(), &base());
        let bad = checker.check(&base(), &with_extra(json!({"name": "x", "type": "int"})));
        let merged = ok.merge(bad);
        assert!(!merged.is_compatible);
        assert!(merged.summary.contains("breaking"));
        assert_eq!(merged.changes.len(), 1);
    }
}
