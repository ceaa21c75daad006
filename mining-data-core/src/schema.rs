//! Attribute catalog: logical and physical attribute descriptors
//!
//! A catalog is built once per source during schema recognition and is
//! immutable afterwards. Vectors hold a shared reference to its logical
//! schema; composed streams concatenate the catalogs of their members.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of a logical or physical attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Plain numeric column
    Numerical,

    /// String column mapped onto numeric codes
    Categorical,

    /// Pixel intensity of an image record
    Image,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Numerical => write!(f, "numerical"),
            AttributeKind::Categorical => write!(f, "categorical"),
            AttributeKind::Image => write!(f, "image"),
        }
    }
}

/// Storage representation of a physical attribute
///
/// Every physical attribute is stored as a double, including encoded
/// categoricals and pixel intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageType {
    /// 64-bit floating point
    #[default]
    Double,
}

/// A named, typed column of the consumer-facing schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalAttribute {
    name: String,
    kind: AttributeKind,
}

impl LogicalAttribute {
    /// Create a new logical attribute
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Get the name of this attribute
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the kind of this attribute
    pub fn kind(&self) -> AttributeKind {
        self.kind
    }
}

impl fmt::Display for LogicalAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.kind)
    }
}

/// Storage-level representation of a logical attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalAttribute {
    name: String,
    kind: AttributeKind,
    storage: StorageType,
}

impl PhysicalAttribute {
    /// Create a new physical attribute with double storage
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            storage: StorageType::Double,
        }
    }

    /// Get the name of this attribute
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the kind of this attribute
    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// Get the storage type of this attribute
    pub fn storage(&self) -> StorageType {
        self.storage
    }
}

impl fmt::Display for PhysicalAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.kind)
    }
}

/// Direct assignment of logical attributes onto one physical attribute
///
/// Catalogs built by this crate only ever create one-to-one assignments.
/// `field` is the position of the attribute's value in a raw source row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeAssignment {
    logical: Vec<usize>,
    physical: usize,
    field: usize,
}

impl AttributeAssignment {
    /// Create a one-to-one assignment reading raw field `physical`
    pub fn direct(logical: usize, physical: usize) -> Self {
        Self::reading(logical, physical, physical)
    }

    /// Create a one-to-one assignment reading raw field `field`
    pub fn reading(logical: usize, physical: usize, field: usize) -> Self {
        Self {
            logical: vec![logical],
            physical,
            field,
        }
    }

    /// Indices of the assigned logical attributes
    pub fn logical(&self) -> &[usize] {
        &self.logical
    }

    /// Index of the target physical attribute
    pub fn physical(&self) -> usize {
        self.physical
    }

    /// Position of the value in a raw row of the member source
    pub fn field(&self) -> usize {
        self.field
    }

    /// Raw fields stay member-local; only catalog positions move
    fn shifted(&self, offset: usize) -> Self {
        Self {
            logical: self.logical.iter().map(|i| i + offset).collect(),
            physical: self.physical + offset,
            field: self.field,
        }
    }
}

/// Ordered logical attributes shared by every vector of a stream
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LogicalSchema {
    attributes: Vec<LogicalAttribute>,

    #[serde(skip)]
    indices: HashMap<String, usize>,
}

impl LogicalSchema {
    /// Create a schema from ordered attributes
    pub fn new(attributes: Vec<LogicalAttribute>) -> Self {
        let mut indices = HashMap::with_capacity(attributes.len());
        for (i, attribute) in attributes.iter().enumerate() {
            indices.entry(attribute.name.clone()).or_insert(i);
        }

        Self { attributes, indices }
    }

    /// Get all attributes in column order
    pub fn attributes(&self) -> &[LogicalAttribute] {
        &self.attributes
    }

    /// Get an attribute by column index
    pub fn attribute(&self, index: usize) -> Option<&LogicalAttribute> {
        self.attributes.get(index)
    }

    /// Get the column index of the first attribute with this name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Get the number of attributes
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the schema has no attributes
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Logical attributes, physical attributes and their assignments for one schema
///
/// The three sequences always have equal length; assignment order defines
/// vector column order. `source_width` is the number of raw fields a source
/// row is expected to carry, which exceeds the attribute count when header
/// columns were skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeCatalog {
    logical: Arc<LogicalSchema>,
    physical: Vec<PhysicalAttribute>,
    assignments: Vec<AttributeAssignment>,
    source_width: usize,
}

impl AttributeCatalog {
    /// Build a catalog of direct assignments, one per `(name, kind)` pair
    pub fn direct<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (S, AttributeKind)>,
        S: Into<String>,
    {
        let fields: Vec<_> = attributes
            .into_iter()
            .enumerate()
            .map(|(field, (name, kind))| (field, name.into(), kind))
            .collect();
        let width = fields.len();
        Self::from_fields(fields, width)
    }

    fn from_fields<I>(attributes: I, source_width: usize) -> Self
    where
        I: IntoIterator<Item = (usize, String, AttributeKind)>,
    {
        let mut logical = Vec::new();
        let mut physical = Vec::new();
        let mut assignments = Vec::new();

        for (i, (field, name, kind)) in attributes.into_iter().enumerate() {
            physical.push(PhysicalAttribute::new(name.clone(), kind));
            logical.push(LogicalAttribute::new(name, kind));
            assignments.push(AttributeAssignment::reading(i, i, field));
        }

        Self {
            logical: Arc::new(LogicalSchema::new(logical)),
            physical,
            assignments,
            source_width,
        }
    }

    /// Build a catalog from header tokens, skipping empty ones
    ///
    /// Attributes keep the position of their header token, so the raw fields
    /// under a skipped token are ignored rather than shifted.
    pub fn from_header<S: AsRef<str>>(header: &[S], kind: AttributeKind) -> Self {
        Self::from_fields(
            header
                .iter()
                .map(|token| token.as_ref().trim())
                .enumerate()
                .filter(|(_, token)| !token.is_empty())
                .map(|(field, token)| (field, token.to_string(), kind)),
            header.len(),
        )
    }

    /// Build a catalog of `count` attributes named "Attribute 1" .. "Attribute count"
    pub fn positional(count: usize, kind: AttributeKind) -> Self {
        Self::direct((1..=count).map(|i| (format!("Attribute {i}"), kind)))
    }

    /// Concatenate member catalogs in order
    pub fn concat<'a, I>(catalogs: I) -> Self
    where
        I: IntoIterator<Item = &'a AttributeCatalog>,
    {
        let mut logical = Vec::new();
        let mut physical = Vec::new();
        let mut assignments = Vec::new();
        let mut source_width = 0;

        for catalog in catalogs {
            let offset = physical.len();
            logical.extend(catalog.logical.attributes().iter().cloned());
            physical.extend(catalog.physical.iter().cloned());
            assignments.extend(catalog.assignments.iter().map(|a| a.shifted(offset)));
            source_width += catalog.source_width;
        }

        Self {
            logical: Arc::new(LogicalSchema::new(logical)),
            physical,
            assignments,
            source_width,
        }
    }

    /// Shared logical schema attached to produced vectors
    pub fn logical(&self) -> &Arc<LogicalSchema> {
        &self.logical
    }

    /// Physical attributes in column order
    pub fn physical(&self) -> &[PhysicalAttribute] {
        &self.physical
    }

    /// Assignments in column order
    pub fn assignments(&self) -> &[AttributeAssignment] {
        &self.assignments
    }

    /// Number of attributes (vector width)
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Check if the catalog has no attributes
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Number of raw fields expected in one source row
    pub fn source_width(&self) -> usize {
        self.source_width
    }

    /// Require the same attribute count and names as `other`
    pub fn ensure_same_layout(&self, other: &AttributeCatalog) -> Result<()> {
        if self.len() != other.len() {
            return Err(Error::SchemaMismatch(format!(
                "{} attributes vs {} attributes",
                self.len(),
                other.len()
            )));
        }

        let mismatch = self
            .logical
            .attributes()
            .iter()
            .zip(other.logical.attributes())
            .position(|(a, b)| a.name() != b.name());

        match mismatch {
            Some(i) => Err(Error::SchemaMismatch(format!(
                "attribute {} is '{}' vs '{}'",
                i,
                self.logical.attributes()[i].name(),
                other.logical.attributes()[i].name()
            ))),
            None => Ok(()),
        }
    }
}

impl fmt::Display for AttributeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Catalog: {} attributes", self.len())?;
        for attribute in &self.physical {
            writeln!(f, "  {attribute}")?;
        }
        Ok(())
    }
}
