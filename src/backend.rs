//! The capability every identity source exposes to the proxy.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{error::BackendError, filter::Filter};

/// A user inside the directory with a DN and additional attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
	/// The distinguished name as presented to clients
	pub dn: String,
	/// Additional information about the user, possibly multi-valued
	pub attributes: HashMap<String, Vec<String>>,
}

/// Settings shared by every backend kind. Embedded into each kind-specific
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
	/// Unique name used for registration and dispatch
	pub name: String,
	/// The backend attribute which holds the user's external identifier
	#[serde(default)]
	pub dn_attribute: String,
}

/// An identity source the proxy can authenticate against and search in.
///
/// Implementations must be safe to call from many sessions at once.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
	/// The unique name of this backend
	fn name(&self) -> &str;

	/// Check the given credentials. Unknown users and wrong passwords are
	/// ordinary `false` results.
	async fn authenticate(&self, username: &str, password: &str) -> bool;

	/// Return every user matching the filter, or all users when no filter is
	/// given. Either the full result set or an error is returned.
	async fn get_users(&self, filter: Option<&Filter>) -> Result<Vec<User>, BackendError>;
}

/// Builds backends of one kind from their configuration.
///
/// The kind-specific [`BackendFactory::Config`] is what the loader decodes
/// each descriptor into before handing it to [`BackendFactory::build`].
pub trait BackendFactory: Send + Sync + 'static {
	/// The kind-specific configuration
	type Config: DeserializeOwned;

	/// The `kind` discriminator this factory answers to
	fn name(&self) -> &str;

	/// Construct a backend from a decoded configuration
	fn build(&self, config: Self::Config) -> Result<Arc<dyn Backend>, BackendError>;
}
