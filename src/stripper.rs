//! Translation between hierarchical DNs and flat backend usernames.
//!
//! A backend wrapped with a [`StrippingBackend`] accepts binds as
//! `uid=admin,ou=People,dc=example,dc=com` and sees `admin`, and its search
//! results are renamed the opposite way.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
	backend::{Backend, User},
	entry::AttributesExt,
	error::BackendError,
	filter::Filter,
};

/// The stripper fields of a backend descriptor. Only a complete triple
/// enables stripping.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	/// Base DN, e.g. `dc=example,dc=com`
	pub base_dn: Option<String>,
	/// RDN of the people container, e.g. `ou=People`
	pub people_rdn: Option<String>,
	/// Attribute naming a user, e.g. `uid`
	pub user_rdn_attribute: Option<String>,
}

impl Config {
	/// Turn the optional fields into a pattern. Returns `None` when no field is
	/// set, and also, with a warning, when only some are.
	#[must_use]
	pub fn pattern(self, backend: &str) -> Option<DnPattern> {
		match (self.base_dn, self.people_rdn, self.user_rdn_attribute) {
			(Some(base_dn), Some(people_rdn), Some(user_rdn_attribute)) => {
				Some(DnPattern { base_dn, people_rdn, user_rdn_attribute })
			}
			(None, None, None) => None,
			_ => {
				warn!("Incomplete stripper config found in backend '{backend}' IGNORED");
				None
			}
		}
	}
}

/// A complete `(baseDn, peopleRdn, userRdnAttribute)` triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnPattern {
	/// Base DN
	pub base_dn: String,
	/// RDN of the people container
	pub people_rdn: String,
	/// Attribute naming a user
	pub user_rdn_attribute: String,
}

impl DnPattern {
	/// `,<peopleRdn>,<baseDn>`
	fn suffix(&self) -> String {
		format!(",{},{}", self.people_rdn, self.base_dn)
	}

	/// `<userRdnAttribute>=`
	fn prefix(&self) -> String {
		format!("{}=", self.user_rdn_attribute)
	}

	/// Extract the username from a DN matching the pattern.
	#[must_use]
	pub fn strip<'a>(&self, dn: &'a str) -> Option<&'a str> {
		dn.strip_suffix(&self.suffix())?.strip_prefix(&self.prefix())
	}

	/// Build the DN of a user.
	#[must_use]
	pub fn format_dn(&self, username: &str) -> String {
		format!(
			"{}={username},{},{}",
			self.user_rdn_attribute, self.people_rdn, self.base_dn
		)
	}
}

/// Wraps a backend and rewrites DNs on the way in and out
#[derive(Debug)]
pub struct StrippingBackend {
	/// The wrapped backend
	inner: Arc<dyn Backend>,
	/// How DNs are built
	pattern: DnPattern,
}

impl StrippingBackend {
	/// Wrap `inner`.
	#[must_use]
	pub fn new(inner: Arc<dyn Backend>, pattern: DnPattern) -> Self {
		Self { inner, pattern }
	}
}

#[async_trait]
impl Backend for StrippingBackend {
	fn name(&self) -> &str {
		self.inner.name()
	}

	async fn authenticate(&self, username: &str, password: &str) -> bool {
		let Some(stripped) = self.pattern.strip(username) else {
			return false;
		};
		debug!("stripped user {stripped}");
		self.inner.authenticate(stripped, password).await
	}

	async fn get_users(&self, filter: Option<&Filter>) -> Result<Vec<User>, BackendError> {
		let mut users = self.inner.get_users(filter).await?;

		for user in &mut users {
			let Some(name) = user.attr_first(&self.pattern.user_rdn_attribute) else {
				return Err(BackendError::MissingAttribute {
					dn: user.dn.clone(),
					attribute: self.pattern.user_rdn_attribute.clone(),
				});
			};
			user.dn = self.pattern.format_dn(name);
		}

		Ok(users)
	}
}
