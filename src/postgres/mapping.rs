//! The table from storage columns to exposed attributes.
use std::collections::{BTreeMap, HashMap};

use crate::error::BackendError;

/// Two inverse one-to-one maps between columns and attributes, plus the
/// column list used for projections.
#[derive(Debug, Clone)]
pub(crate) struct ColumnMapping {
	/// Attribute name by column name
	column_attribute: HashMap<String, String>,
	/// Column name by attribute name
	attribute_column: HashMap<String, String>,
	/// Projected columns, ordered by name
	columns: Vec<String>,
	/// Attribute names parallel to `columns`
	attributes: Vec<String>,
}

impl ColumnMapping {
	/// Validate a declared `{column: attribute}` table and build the maps.
	pub(crate) fn new(table: &BTreeMap<String, String>) -> Result<Self, BackendError> {
		if table.is_empty() {
			return Err(BackendError::InvalidColumnMapping("no columns declared".to_owned()));
		}

		let mut mapping = ColumnMapping {
			column_attribute: HashMap::with_capacity(table.len()),
			attribute_column: HashMap::with_capacity(table.len()),
			columns: Vec::with_capacity(table.len()),
			attributes: Vec::with_capacity(table.len()),
		};

		for (column, attribute) in table {
			if !is_identifier(column) {
				return Err(BackendError::InvalidColumnMapping(format!(
					"`{column}` is not a plain column name"
				)));
			}
			if let Some(other) = mapping.attribute_column.insert(attribute.clone(), column.clone())
			{
				return Err(BackendError::InvalidColumnMapping(format!(
					"attribute `{attribute}` is mapped from both `{other}` and `{column}`"
				)));
			}
			mapping.column_attribute.insert(column.clone(), attribute.clone());
			mapping.columns.push(column.clone());
			mapping.attributes.push(attribute.clone());
		}

		Ok(mapping)
	}

	/// The column an attribute is stored in
	pub(crate) fn column(&self, attribute: &str) -> Option<&str> {
		self.attribute_column.get(attribute).map(String::as_str)
	}

	/// The attribute a column is exposed as
	pub(crate) fn attribute(&self, column: &str) -> Option<&str> {
		self.column_attribute.get(column).map(String::as_str)
	}

	/// Projected columns in projection order
	pub(crate) fn columns(&self) -> &[String] {
		&self.columns
	}

	/// Attributes in projection order
	pub(crate) fn attributes(&self) -> &[String] {
		&self.attributes
	}
}

/// Whether `name` can be interpolated into SQL as a bare identifier
fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	chars.next().is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
