//! Translation of filter trees into parameterized SQL predicates.
use super::mapping::ColumnMapping;
use crate::{error::BackendError, filter::Filter};

/// A `WHERE` clause under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Predicate {
	/// Conjunction, children in filter order
	And(Vec<Predicate>),
	/// Disjunction, children in filter order
	Or(Vec<Predicate>),
	/// `column = $n`
	Eq {
		/// Column name, empty for unmapped attributes
		column: String,
		/// Bound value
		value: String,
	},
	/// `TRUE` or `FALSE`
	Literal(bool),
}

impl Predicate {
	/// Render the predicate with `$n` placeholders, returning the SQL text and
	/// the positional parameters.
	pub(crate) fn to_sql(&self) -> (String, Vec<String>) {
		let mut sql = String::new();
		let mut params = Vec::new();
		self.write_sql(&mut sql, &mut params);
		(sql, params)
	}

	/// Append the predicate to `sql`, numbering placeholders after the
	/// parameters already in `params`.
	pub(crate) fn write_sql(&self, sql: &mut String, params: &mut Vec<String>) {
		match self {
			Predicate::And(children) => write_joined(children, " AND ", true, sql, params),
			Predicate::Or(children) => write_joined(children, " OR ", false, sql, params),
			Predicate::Eq { column, value } => {
				params.push(value.clone());
				sql.push_str(&format!("{column} = ${}", params.len()));
			}
			Predicate::Literal(true) => sql.push_str("TRUE"),
			Predicate::Literal(false) => sql.push_str("FALSE"),
		}
	}
}

/// Write `(a <op> b ...)`. An empty list renders as `empty`.
fn write_joined(
	children: &[Predicate],
	operator: &str,
	empty: bool,
	sql: &mut String,
	params: &mut Vec<String>,
) {
	if children.is_empty() {
		Predicate::Literal(empty).write_sql(sql, params);
		return;
	}

	sql.push('(');
	for (i, child) in children.iter().enumerate() {
		if i > 0 {
			sql.push_str(operator);
		}
		child.write_sql(sql, params);
	}
	sql.push(')');
}

/// Compile a filter into a predicate over the mapped columns. The first
/// unsupported node aborts the translation.
pub(crate) fn translate(
	mapping: &ColumnMapping,
	filter: &Filter,
) -> Result<Predicate, BackendError> {
	match filter {
		Filter::And(children) => Ok(Predicate::And(translate_all(mapping, children)?)),
		Filter::Or(children) => Ok(Predicate::Or(translate_all(mapping, children)?)),
		Filter::EqualityMatch { attribute, value } | Filter::ApproxMatch { attribute, value } => {
			Ok(equal_match(mapping, attribute, value))
		}
		Filter::Present(attribute) => Ok(Predicate::Literal(
			mapping.column(attribute).is_some() || attribute.eq_ignore_ascii_case("objectclass"),
		)),
		Filter::Not(_)
		| Filter::GreaterOrEqual { .. }
		| Filter::LessOrEqual { .. }
		| Filter::Substrings { .. } => Err(BackendError::UnsupportedFilter(filter.kind())),
	}
}

/// Translate children in order
fn translate_all(
	mapping: &ColumnMapping,
	children: &[Filter],
) -> Result<Vec<Predicate>, BackendError> {
	children.iter().map(|child| translate(mapping, child)).collect()
}

/// `column = value`. An unmapped attribute yields an empty column name.
fn equal_match(mapping: &ColumnMapping, attribute: &str, value: &str) -> Predicate {
	tracing::debug!("EQ: {attribute} = {value}");
	if value == "*" {
		return Predicate::Literal(true);
	}

	Predicate::Eq {
		column: mapping.column(attribute).unwrap_or_default().to_owned(),
		value: value.to_owned(),
	}
}
