//! Assembly of backends from a declarative configuration.
//!
//! The configuration is a JSON array of backend descriptors. Each descriptor
//! names the factory to use in its `kind` field and carries the fields of that
//! kind's configuration next to it. Any backend can additionally be wrapped in
//! a [`StrippingBackend`] by adding `baseDn`, `peopleRdn` and
//! `userRdnAttribute`:
//!
//! ```json
//! [
//!     {
//!         "kind": "in-memory",
//!         "name": "fixtures",
//!         "listUsers": true,
//!         "users": [{ "name": "admin", "password": "$argon2id$..." }],
//!         "baseDn": "dc=example,dc=com",
//!         "peopleRdn": "ou=People",
//!         "userRdnAttribute": "cn"
//!     }
//! ]
//! ```
use std::{collections::HashMap, fmt, io::Read, path::Path, sync::Arc};

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::{
	backend::{Backend, BackendFactory},
	error::Error,
	memory::MemoryFactory,
	postgres::PostgresFactory,
	stripper::{self, StrippingBackend},
};

/// The discriminator every descriptor carries
#[derive(Debug, Deserialize)]
struct Kind {
	/// Name of the factory to build the descriptor with
	kind: String,
}

/// A factory with its configuration type erased, so factories of different
/// kinds can share the registry.
trait DynFactory: Send + Sync {
	/// Decode a descriptor into the factory's configuration and build it
	fn build_from(&self, descriptor: Value) -> Result<Arc<dyn Backend>, Error>;
}

impl<F: BackendFactory> DynFactory for F {
	fn build_from(&self, descriptor: Value) -> Result<Arc<dyn Backend>, Error> {
		let config: F::Config = serde_json::from_value(descriptor)?;
		self.build(config).map_err(|source| Error::Build { kind: self.name().to_owned(), source })
	}
}

/// Turns backend descriptors into backends using its registered factories
#[derive(Default)]
pub struct Loader {
	/// Factories by kind
	factories: HashMap<String, Box<dyn DynFactory>>,
}

impl fmt::Debug for Loader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Loader").field("kinds", &self.factories.keys()).finish()
	}
}

impl Loader {
	/// Create a loader without any factories.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a loader knowing the `in-memory` and `postgres` kinds.
	#[must_use]
	pub fn with_default_factories() -> Self {
		let mut loader = Self::new();
		loader.add_factory(MemoryFactory);
		loader.add_factory(PostgresFactory);
		loader
	}

	/// Register a factory under its name. A later factory replaces an earlier
	/// one of the same name.
	pub fn add_factory<F: BackendFactory>(&mut self, factory: F) {
		info!("Adding backend factory {}", factory.name());
		self.factories.insert(factory.name().to_owned(), Box::new(factory));
	}

	/// Whether a factory is registered for `kind`
	#[must_use]
	pub fn has_factory(&self, kind: &str) -> bool {
		self.factories.contains_key(kind)
	}

	/// Build every backend described in the JSON read from `reader`, in
	/// descriptor order. The first failure aborts the whole load.
	///
	/// `postgres` backends need a Tokio runtime and fail with
	/// [`Error::Build`] when loaded outside of one.
	pub fn load(&self, reader: impl Read) -> Result<Vec<Arc<dyn Backend>>, Error> {
		let descriptors: Vec<Value> = serde_json::from_reader(reader)?;
		self.instantiate_all(descriptors)
	}

	/// Like [`Loader::load`], for an in-memory document.
	pub fn load_str(&self, json: &str) -> Result<Vec<Arc<dyn Backend>>, Error> {
		let descriptors: Vec<Value> = serde_json::from_str(json)?;
		self.instantiate_all(descriptors)
	}

	/// Like [`Loader::load`], reading the configuration file at `path`.
	pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<Vec<Arc<dyn Backend>>, Error> {
		let data = tokio::fs::read(path).await?;
		let descriptors: Vec<Value> = serde_json::from_slice(&data)?;
		self.instantiate_all(descriptors)
	}

	/// Build all descriptors, stopping at the first error
	fn instantiate_all(&self, descriptors: Vec<Value>) -> Result<Vec<Arc<dyn Backend>>, Error> {
		descriptors.into_iter().map(|descriptor| self.instantiate(descriptor)).collect()
	}

	/// Build one descriptor and wrap it if it asks for DN stripping
	fn instantiate(&self, descriptor: Value) -> Result<Arc<dyn Backend>, Error> {
		let Kind { kind } = Kind::deserialize(&descriptor)?;
		let factory = self.factories.get(&kind).ok_or_else(|| Error::UnknownKind(kind.clone()))?;

		let stripper_config = stripper::Config::deserialize(&descriptor)?;
		let backend = factory.build_from(descriptor)?;
		info!("Instantiated {kind} backend '{}'", backend.name());

		let Some(pattern) = stripper_config.pattern(backend.name()) else {
			return Ok(backend);
		};
		info!(
			"Wrapping backend '{}' with stripper ('{}', '{}', '{}')",
			backend.name(),
			pattern.user_rdn_attribute,
			pattern.people_rdn,
			pattern.base_dn
		);
		Ok(Arc::new(StrippingBackend::new(backend, pattern)))
	}
}
