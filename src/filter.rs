//! Search filter expressions as delivered by the protocol engine.
use std::fmt;

use ldap3::ldap_escape;

/// A search filter tree.
///
/// Only conjunction, disjunction, equality, approximate equality and
/// presence are answered by the backends. The remaining variants exist so a
/// protocol engine can hand over every filter a client may send, and the
/// backends can reject (or ignore) them explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
	/// All children must match
	And(Vec<Filter>),
	/// At least one child must match
	Or(Vec<Filter>),
	/// The child must not match
	Not(Box<Filter>),
	/// `(attribute=value)`
	EqualityMatch {
		/// Attribute name
		attribute: String,
		/// Assertion value
		value: String,
	},
	/// `(attribute~=value)`
	ApproxMatch {
		/// Attribute name
		attribute: String,
		/// Assertion value
		value: String,
	},
	/// `(attribute>=value)`
	GreaterOrEqual {
		/// Attribute name
		attribute: String,
		/// Assertion value
		value: String,
	},
	/// `(attribute<=value)`
	LessOrEqual {
		/// Attribute name
		attribute: String,
		/// Assertion value
		value: String,
	},
	/// `(attribute=initial*any*final)`
	Substrings {
		/// Attribute name
		attribute: String,
		/// Leading substring
		initial: Option<String>,
		/// Inner substrings, in order
		any: Vec<String>,
		/// Trailing substring
		last: Option<String>,
	},
	/// `(attribute=*)`
	Present(String),
}

impl Filter {
	/// Shorthand for an [`Filter::EqualityMatch`].
	#[must_use]
	pub fn equality(attribute: impl Into<String>, value: impl Into<String>) -> Self {
		Filter::EqualityMatch { attribute: attribute.into(), value: value.into() }
	}

	/// Shorthand for an [`Filter::ApproxMatch`].
	#[must_use]
	pub fn approx(attribute: impl Into<String>, value: impl Into<String>) -> Self {
		Filter::ApproxMatch { attribute: attribute.into(), value: value.into() }
	}

	/// Shorthand for a [`Filter::Present`].
	#[must_use]
	pub fn present(attribute: impl Into<String>) -> Self {
		Filter::Present(attribute.into())
	}

	/// The name of the node kind, used in error messages.
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Filter::And(_) => "and",
			Filter::Or(_) => "or",
			Filter::Not(_) => "not",
			Filter::EqualityMatch { .. } => "equalityMatch",
			Filter::ApproxMatch { .. } => "approxMatch",
			Filter::GreaterOrEqual { .. } => "greaterOrEqual",
			Filter::LessOrEqual { .. } => "lessOrEqual",
			Filter::Substrings { .. } => "substrings",
			Filter::Present(_) => "present",
		}
	}
}

/// Renders the filter in its RFC 4515 string form.
impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Filter::And(children) => {
				f.write_str("(&")?;
				children.iter().try_for_each(|child| write!(f, "{child}"))?;
				f.write_str(")")
			}
			Filter::Or(children) => {
				f.write_str("(|")?;
				children.iter().try_for_each(|child| write!(f, "{child}"))?;
				f.write_str(")")
			}
			Filter::Not(child) => write!(f, "(!{child})"),
			Filter::EqualityMatch { attribute, value } => {
				write!(f, "({attribute}={})", ldap_escape(value.as_str()))
			}
			Filter::ApproxMatch { attribute, value } => {
				write!(f, "({attribute}~={})", ldap_escape(value.as_str()))
			}
			Filter::GreaterOrEqual { attribute, value } => {
				write!(f, "({attribute}>={})", ldap_escape(value.as_str()))
			}
			Filter::LessOrEqual { attribute, value } => {
				write!(f, "({attribute}<={})", ldap_escape(value.as_str()))
			}
			Filter::Substrings { attribute, initial, any, last } => {
				write!(f, "({attribute}=")?;
				if let Some(initial) = initial {
					write!(f, "{}", ldap_escape(initial.as_str()))?;
				}
				f.write_str("*")?;
				for part in any {
					write!(f, "{}*", ldap_escape(part.as_str()))?;
				}
				if let Some(last) = last {
					write!(f, "{}", ldap_escape(last.as_str()))?;
				}
				f.write_str(")")
			}
			Filter::Present(attribute) => write!(f, "({attribute}=*)"),
		}
	}
}
