//! Helper methods for extracting data from users and handing them to the
//! protocol engine.
use std::collections::HashMap;

use ldap3::SearchEntry;

use crate::backend::User;

/// An extension trait providing convenience methods for reading attributes.
pub trait AttributesExt {
	/// Get all values of an attribute.
	fn attr(&self, attr: &str) -> Option<&[String]>;

	/// Get the first value of an attribute.
	fn attr_first(&self, attr: &str) -> Option<&str> {
		self.attr(attr)?.first().map(String::as_str)
	}
}

impl AttributesExt for User {
	fn attr(&self, attr: &str) -> Option<&[String]> {
		self.attributes.get(attr).map(Vec::as_slice)
	}
}

impl AttributesExt for SearchEntry {
	fn attr(&self, attr: &str) -> Option<&[String]> {
		self.attrs.get(attr).map(Vec::as_slice)
	}
}

impl From<User> for SearchEntry {
	fn from(user: User) -> Self {
		SearchEntry { dn: user.dn, attrs: user.attributes, bin_attrs: HashMap::new() }
	}
}
