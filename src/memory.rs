//! A backend serving a fixed set of users declared in the configuration.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
	backend::{Backend, BackendConfig, BackendFactory, User},
	error::BackendError,
	filter::Filter,
	password::verify_password,
};

/// The only attribute in-memory users carry
const NAME_ATTRIBUTE: &str = "cn";

/// Configuration of an in-memory backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	/// Generic backend settings
	#[serde(flatten)]
	pub backend: BackendConfig,
	/// Whether searches enumerate the users
	#[serde(default)]
	pub list_users: bool,
	/// The declared users
	#[serde(default)]
	pub users: Vec<UserRecord>,
}

/// A declared user
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
	/// Username
	pub name: String,
	/// Argon2 password hash
	pub password: String,
}

/// Factory for the `in-memory` kind
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryFactory;

impl BackendFactory for MemoryFactory {
	type Config = Config;

	fn name(&self) -> &str {
		"in-memory"
	}

	fn build(&self, config: Config) -> Result<Arc<dyn Backend>, BackendError> {
		Ok(Arc::new(MemoryBackend::new(config)))
	}
}

/// Serves the users of its configuration
#[derive(Debug)]
pub struct MemoryBackend {
	/// The configuration, users in declaration order
	config: Config,
	/// Password hashes by username
	passwords: HashMap<String, String>,
}

impl MemoryBackend {
	/// Create a backend for the given configuration.
	#[must_use]
	pub fn new(config: Config) -> Self {
		let passwords =
			config.users.iter().map(|user| (user.name.clone(), user.password.clone())).collect();
		Self { config, passwords }
	}
}

#[async_trait]
impl Backend for MemoryBackend {
	fn name(&self) -> &str {
		&self.config.backend.name
	}

	async fn authenticate(&self, username: &str, password: &str) -> bool {
		match self.passwords.get(username) {
			Some(hash) => verify_password(hash, password),
			None => false,
		}
	}

	async fn get_users(&self, filter: Option<&Filter>) -> Result<Vec<User>, BackendError> {
		if !self.config.list_users {
			return Ok(Vec::new());
		}

		Ok(self
			.config
			.users
			.iter()
			.filter(|user| filter.map_or(true, |filter| matches(&user.name, filter)))
			.map(|user| User {
				dn: user.name.clone(),
				attributes: HashMap::from([(
					NAME_ATTRIBUTE.to_owned(),
					vec![user.name.clone()],
				)]),
			})
			.collect())
	}
}

/// Evaluate a filter against a user whose only attribute is `cn`.
/// Unsupported nodes never match.
fn matches(name: &str, filter: &Filter) -> bool {
	match filter {
		Filter::And(children) => children.iter().all(|child| matches(name, child)),
		Filter::Or(children) => children.iter().any(|child| matches(name, child)),
		Filter::EqualityMatch { attribute, value } | Filter::ApproxMatch { attribute, value } => {
			attribute == NAME_ATTRIBUTE && value == name
		}
		Filter::Present(attribute) => attribute == NAME_ATTRIBUTE,
		Filter::Not(_)
		| Filter::GreaterOrEqual { .. }
		| Filter::LessOrEqual { .. }
		| Filter::Substrings { .. } => false,
	}
}
