//! Operation descriptors: what an operation *is*, declared before it runs.
//!
//! A descriptor is validated once at construction and is read-only afterwards.
//! Deserialization goes through the same validation, so an
//! `OperationDescriptor` value in hand always satisfies its invariant.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KlError, KlResult};

/// Schema version assigned when the caller does not name one.
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";

/// Immutable declaration of an operation: identifier, grouping, effect tag,
/// schema version and free-form constraints.
///
/// The core never interprets `constraints`; they travel with the descriptor
/// into every trace for downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorFields")]
pub struct OperationDescriptor {
    operation_id: String,
    domain: String,
    effect: String,
    schema_version: String,
    constraints: BTreeMap<String, String>,
}

/// Unvalidated descriptor fields, used by the builder and by serde.
#[derive(Debug, Clone, Deserialize)]
struct DescriptorFields {
    operation_id: String,
    domain: String,
    effect: String,
    #[serde(default = "default_schema_version")]
    schema_version: String,
    #[serde(default)]
    constraints: BTreeMap<String, String>,
}

fn default_schema_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}

impl TryFrom<DescriptorFields> for OperationDescriptor {
    type Error = KlError;

    fn try_from(fields: DescriptorFields) -> KlResult<Self> {
        let descriptor = Self {
            operation_id: fields.operation_id,
            domain: fields.domain,
            effect: fields.effect,
            schema_version: fields.schema_version,
            constraints: fields.constraints,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

impl OperationDescriptor {
    /// Construct a descriptor with the default schema version and no constraints.
    ///
    /// Fails with `KlError::InvalidDescriptor` if any field is empty.
    pub fn new(
        operation_id: impl Into<String>,
        domain: impl Into<String>,
        effect: impl Into<String>,
    ) -> KlResult<Self> {
        Self::builder(operation_id, domain, effect).build()
    }

    /// Start a builder for a descriptor carrying a schema version or constraints.
    pub fn builder(
        operation_id: impl Into<String>,
        domain: impl Into<String>,
        effect: impl Into<String>,
    ) -> DescriptorBuilder {
        DescriptorBuilder {
            fields: DescriptorFields {
                operation_id: operation_id.into(),
                domain: domain.into(),
                effect: effect.into(),
                schema_version: default_schema_version(),
                constraints: BTreeMap::new(),
            },
        }
    }

    /// Re-check the construction invariant.
    ///
    /// Every required field must contain at least one non-whitespace character.
    pub fn validate(&self) -> KlResult<()> {
        require_non_empty("operation_id", &self.operation_id)?;
        require_non_empty("domain", &self.domain)?;
        require_non_empty("effect", &self.effect)?;
        require_non_empty("schema_version", &self.schema_version)?;
        Ok(())
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The raw effect tag exactly as the caller supplied it.
    pub fn effect(&self) -> &str {
        &self.effect
    }

    /// The effect tag parsed into its closed classification.
    pub fn effect_class(&self) -> Effect {
        Effect::parse(&self.effect)
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn constraints(&self) -> &BTreeMap<String, String> {
        &self.constraints
    }

    /// `operation_id@schema_version`, a stable key for registries and logs.
    pub fn key(&self) -> String {
        format!("{}@{}", self.operation_id, self.schema_version)
    }
}

fn require_non_empty(field: &str, value: &str) -> KlResult<()> {
    if value.trim().is_empty() {
        return Err(KlError::InvalidDescriptor {
            field: field.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Builder for `OperationDescriptor`. Nothing is validated until `build()`.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    fields: DescriptorFields,
}

impl DescriptorBuilder {
    pub fn schema_version(mut self, version: impl Into<String>) -> Self {
        self.fields.schema_version = version.into();
        self
    }

    /// Attach one declarative constraint. A repeated key replaces the earlier value.
    pub fn constraint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.constraints.insert(key.into(), value.into());
        self
    }

    /// Validate and freeze the descriptor.
    pub fn build(self) -> KlResult<OperationDescriptor> {
        OperationDescriptor::try_from(self.fields)
    }
}

/// The side-effect character of an operation.
///
/// Descriptors carry effects as free text; this is the closed set the core
/// recognizes. Parsing trims surrounding whitespace and folds case. Anything
/// else, including the empty string, lands in `Other` and is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Effect {
    Pure,
    Read,
    Io,
    External,
    Ai,
    Other(String),
}

impl Effect {
    pub fn parse(tag: &str) -> Self {
        let normalized = tag.trim().to_lowercase();
        match normalized.as_str() {
            "pure" => Effect::Pure,
            "read" => Effect::Read,
            "io" => Effect::Io,
            "external" => Effect::External,
            "ai" => Effect::Ai,
            _ => Effect::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Effect::Pure => "pure",
            Effect::Read => "read",
            Effect::Io => "io",
            Effect::External => "external",
            Effect::Ai => "ai",
            Effect::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
