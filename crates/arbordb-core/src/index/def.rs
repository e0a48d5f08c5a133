//! Index definitions and the key codec derived from them.

use serde::{Deserialize, Serialize};

use super::spatial::{Space, LAT_LON_DIMENSIONS};
use crate::encoding::sortable::{decode_sortable_with_len, encode_sortable_into};
use crate::error::{CoreError, CoreResult};
use crate::types::{Value, ValueType};

/// Where an index column comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Declared by the index definition.
    Declared,
    /// Appended from the table's hierarchical key so entries recompose the
    /// full row position across parent and child tables.
    HKey,
}

/// A single column of an index key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    name: String,
    value_type: ValueType,
    ascending: bool,
    kind: ColumnKind,
}

impl IndexColumn {
    /// The column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared type of the column.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Whether the column sorts ascending.
    #[must_use]
    pub const fn is_ascending(&self) -> bool {
        self.ascending
    }

    /// Whether the column was declared or inherited from the hierarchical key.
    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        self.kind
    }
}

/// Placement of the coordinate columns of a spatial index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialLayout {
    /// Logical position of the first coordinate column.
    pub first_spatial_argument: usize,
    /// Number of coordinate columns collapsed into one ordinal.
    pub dimensions: usize,
}

/// Physical layout of an index.
///
/// Columns are listed in key order: declared columns first, then the
/// hierarchical-key columns. For a spatial index the coordinate columns
/// starting at [`SpatialLayout::first_spatial_argument`] are stored as a
/// single z-order ordinal, so the stored key has fewer columns than the rows
/// the index describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    table: String,
    name: String,
    columns: Vec<IndexColumn>,
    declared: usize,
    unique: bool,
    spatial: Option<SpatialLayout>,
}

impl IndexDef {
    /// The indexed table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the storage table holding this index's entries.
    #[must_use]
    pub fn storage_table(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }

    /// Declared key columns, without hierarchical-key columns.
    #[must_use]
    pub fn key_columns(&self) -> &[IndexColumn] {
        &self.columns[..self.declared]
    }

    /// Hierarchical-key columns appended after the declared ones.
    #[must_use]
    pub fn hkey_columns(&self) -> &[IndexColumn] {
        &self.columns[self.declared..]
    }

    /// Every logical column, declared then hierarchical.
    #[must_use]
    pub fn all_columns(&self) -> &[IndexColumn] {
        &self.columns
    }

    /// Whether the declared columns identify at most one entry.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether coordinate columns are collapsed onto a curve.
    #[must_use]
    pub const fn is_spatial(&self) -> bool {
        self.spatial.is_some()
    }

    /// Spatial layout, if any.
    #[must_use]
    pub const fn spatial(&self) -> Option<SpatialLayout> {
        self.spatial
    }

    /// Logical position of the first coordinate column of a spatial index.
    #[must_use]
    pub fn first_spatial_argument(&self) -> Option<usize> {
        self.spatial.map(|s| s.first_spatial_argument)
    }

    /// Number of coordinate columns, or 0 for a non-spatial index.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.spatial.map_or(0, |s| s.dimensions)
    }

    /// Number of logical columns in rows read from this index.
    #[must_use]
    pub fn logical_column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of columns actually stored in a key.
    #[must_use]
    pub fn physical_column_count(&self) -> usize {
        match self.spatial {
            Some(s) => self.columns.len() - s.dimensions + 1,
            None => self.columns.len(),
        }
    }

    /// Encodes a complete logical row into a storage key.
    ///
    /// # Errors
    ///
    /// Fails if the row does not have one value per logical column, a value
    /// does not conform to its column type, or spatial coordinates are out of
    /// range.
    pub fn encode_key(&self, values: &[Value]) -> CoreResult<Vec<u8>> {
        if values.len() != self.columns.len() {
            return Err(CoreError::InvalidIndex(format!(
                "index {} expects {} key values, got {}",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        self.encode_prefix(values)
    }

    /// Encodes a leading subset of logical columns.
    ///
    /// Every key whose first columns equal `values` starts with the returned
    /// bytes. A prefix that ends inside the coordinate group of a spatial
    /// index is rejected, since the ordinal needs every coordinate.
    ///
    /// # Errors
    ///
    /// Fails on too many values, type mismatches, a partial coordinate group,
    /// or coordinates outside the curve's range.
    pub fn encode_prefix(&self, values: &[Value]) -> CoreResult<Vec<u8>> {
        if values.len() > self.columns.len() {
            return Err(CoreError::InvalidIndex(format!(
                "index {} has {} columns, got a prefix of {}",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(values) {
            if !value.conforms_to(column.value_type) {
                return Err(CoreError::type_mismatch_with_value(
                    column.value_type.to_string(),
                    value.value_type().map_or_else(|| "Null".to_owned(), |t| t.to_string()),
                    value,
                ));
            }
        }

        let mut key = Vec::with_capacity(values.len() * 9);
        match self.spatial {
            None => {
                for (column, value) in self.columns.iter().zip(values) {
                    encode_sortable_into(value, &mut key, !column.ascending);
                }
            }
            Some(layout) => {
                let first = layout.first_spatial_argument;
                let after = first + layout.dimensions;
                if values.len() > first && values.len() < after {
                    return Err(CoreError::InvalidIndex(format!(
                        "prefix of {} columns splits the coordinates of spatial index {}",
                        values.len(),
                        self.name
                    )));
                }
                for (column, value) in self.columns.iter().zip(values).take(first) {
                    encode_sortable_into(value, &mut key, !column.ascending);
                }
                if values.len() >= after {
                    let ordinal = self.shuffle(&values[first..after])?;
                    encode_sortable_into(&ordinal, &mut key, false);
                    for (column, value) in self.columns.iter().zip(values).skip(after) {
                        encode_sortable_into(value, &mut key, !column.ascending);
                    }
                }
            }
        }
        Ok(key)
    }

    /// Decodes a storage key back into logical column values.
    ///
    /// # Errors
    ///
    /// Fails if the key is malformed or has trailing bytes.
    pub fn decode_key(&self, key: &[u8]) -> CoreResult<Vec<Value>> {
        let mut physical = Vec::with_capacity(self.physical_column_count());
        let mut offset = 0;
        for ascending in self.physical_directions() {
            let (value, used) = decode_sortable_with_len(&key[offset..], !ascending)?;
            physical.push(value);
            offset += used;
        }
        if offset != key.len() {
            return Err(CoreError::Encoding(format!(
                "{} trailing bytes after key of index {}",
                key.len() - offset,
                self.name
            )));
        }

        let Some(layout) = self.spatial else {
            return Ok(physical);
        };
        let first = layout.first_spatial_argument;
        let mut logical = Vec::with_capacity(self.columns.len());
        let mut rest = physical.into_iter();
        logical.extend(rest.by_ref().take(first));
        match rest.next() {
            Some(Value::Int(ordinal)) => {
                let space = Space::new(layout.dimensions)?;
                logical.extend(space.unshuffle(ordinal).into_iter().map(Value::Int));
            }
            Some(Value::Null) => {
                logical.extend(std::iter::repeat(Value::Null).take(layout.dimensions));
            }
            other => {
                return Err(CoreError::Encoding(format!(
                    "spatial ordinal of index {} decoded as {other:?}",
                    self.name
                )))
            }
        }
        logical.extend(rest);
        Ok(logical)
    }

    /// Sort direction of each stored key column.
    #[must_use]
    pub fn physical_directions(&self) -> Vec<bool> {
        match self.spatial {
            None => self.columns.iter().map(|c| c.ascending).collect(),
            Some(layout) => {
                let first = layout.first_spatial_argument;
                let mut directions: Vec<bool> =
                    self.columns[..first].iter().map(|c| c.ascending).collect();
                directions.push(true);
                directions.extend(
                    self.columns[first + layout.dimensions..].iter().map(|c| c.ascending),
                );
                directions
            }
        }
    }

    fn shuffle(&self, coordinates: &[Value]) -> CoreResult<Value> {
        if coordinates.iter().all(Value::is_null) {
            return Ok(Value::Null);
        }
        let mut raw = Vec::with_capacity(coordinates.len());
        for value in coordinates {
            let coordinate = value.as_int().ok_or_else(|| {
                CoreError::Spatial(format!(
                    "index {} has a partially null coordinate group",
                    self.name
                ))
            })?;
            raw.push(coordinate);
        }
        Space::new(coordinates.len())?.shuffle(&raw).map(Value::Int)
    }

    /// Serializes the definition for storage in a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] if serialization fails.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| {
            CoreError::Encoding(format!("failed to serialize index {}: {e}", self.name))
        })
    }

    /// Deserializes a definition written by [`IndexDef::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] if the bytes are not a valid definition.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(def, _)| def)
            .map_err(|e| CoreError::Encoding(format!("failed to deserialize index: {e}")))
    }
}

/// Builder for [`IndexDef`].
///
/// # Example
///
/// ```
/// use arbordb_core::{IndexBuilder, ValueType};
///
/// let index = IndexBuilder::new("places", "by_location")
///     .column("category", ValueType::String)
///     .column("lat", ValueType::Int)
///     .column("lon", ValueType::Int)
///     .hkey_column("place_id", ValueType::Int)
///     .mark_spatial(1, 2)
///     .build()
///     .unwrap();
///
/// assert_eq!(index.logical_column_count(), 4);
/// assert_eq!(index.physical_column_count(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    table: String,
    name: String,
    columns: Vec<IndexColumn>,
    unique: bool,
    spatial: Option<SpatialLayout>,
}

impl IndexBuilder {
    /// Starts an index definition on `table`.
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            columns: Vec::new(),
            unique: false,
            spatial: None,
        }
    }

    /// Adds an ascending declared column.
    #[must_use]
    pub fn column(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.push(name, value_type, true, ColumnKind::Declared)
    }

    /// Adds a descending declared column.
    #[must_use]
    pub fn descending_column(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.push(name, value_type, false, ColumnKind::Declared)
    }

    /// Adds a hierarchical-key column. These always sort ascending.
    #[must_use]
    pub fn hkey_column(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.push(name, value_type, true, ColumnKind::HKey)
    }

    /// Marks the index unique over its declared columns.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Collapses `dimensions` declared columns starting at
    /// `first_spatial_argument` into a z-order ordinal.
    #[must_use]
    pub const fn mark_spatial(mut self, first_spatial_argument: usize, dimensions: usize) -> Self {
        self.spatial = Some(SpatialLayout { first_spatial_argument, dimensions });
        self
    }

    fn push(
        mut self,
        name: impl Into<String>,
        value_type: ValueType,
        ascending: bool,
        kind: ColumnKind,
    ) -> Self {
        self.columns.push(IndexColumn { name: name.into(), value_type, ascending, kind });
        self
    }

    /// Validates and freezes the definition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIndex`] when the index has no declared
    /// columns, repeats a column name, declares a column after a
    /// hierarchical-key column, or has an invalid spatial layout.
    pub fn build(self) -> CoreResult<IndexDef> {
        let invalid = |msg: String| CoreError::InvalidIndex(format!("{}: {msg}", self.name));

        let declared = self.columns.iter().take_while(|c| c.kind == ColumnKind::Declared).count();
        if declared == 0 {
            return Err(invalid("at least one declared column is required".into()));
        }
        if self.columns[declared..].iter().any(|c| c.kind == ColumnKind::Declared) {
            return Err(invalid("declared columns must precede hierarchical-key columns".into()));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(invalid(format!("duplicate column {}", column.name)));
            }
        }

        if let Some(layout) = self.spatial {
            if layout.dimensions != LAT_LON_DIMENSIONS {
                return Err(invalid(format!(
                    "spatial indexes have {LAT_LON_DIMENSIONS} dimensions, got {}",
                    layout.dimensions
                )));
            }
            let end = layout.first_spatial_argument + layout.dimensions;
            if end > declared {
                return Err(invalid(format!(
                    "coordinates {}..{end} exceed the {declared} declared columns",
                    layout.first_spatial_argument
                )));
            }
            for column in &self.columns[layout.first_spatial_argument..end] {
                if column.value_type != ValueType::Int || !column.ascending {
                    return Err(invalid(format!(
                        "coordinate column {} must be an ascending Int",
                        column.name
                    )));
                }
            }
        }

        Ok(IndexDef {
            table: self.table,
            name: self.name,
            columns: self.columns,
            declared,
            unique: self.unique,
            spatial: self.spatial,
        })
    }
}
