//! A read-only LDAP gateway in front of heterogeneous user stores.
//!
//! The library sits between a directory protocol transport and one or more
//! identity backends. Clients bind with a DN and a password, the proxy asks
//! each backend in turn whether it knows the credentials, and searches are
//! answered with the combined users of all backends. The directory can't be
//! modified through the proxy.
//!
//! Two backends are included: an in-memory fixture store ([`memory`]) and a
//! PostgreSQL `users` table ([`postgres`]). Either one can be wrapped by the
//! DN stripper ([`stripper`]), which maps hierarchical DNs such as
//! `uid=admin,ou=People,dc=example,dc=com` onto the flat usernames the
//! backends store.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate is an
//! excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! Backends are usually assembled from a JSON configuration:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldap_proxy::{BindOutcome, LdapProxy, Loader, SearchOutcome};
//!
//! let backends = Loader::with_default_factories().load_file("backends.json").await?;
//! let mut proxy = LdapProxy::new();
//! proxy.add_backends(backends);
//!
//! // The transport opens one session per connection
//! let mut session = proxy.connect();
//! if let BindOutcome::Success { matched_dn } =
//!     proxy.bind(&mut session, "uid=admin,ou=People,dc=example,dc=com", "secret").await?
//! {
//!     println!("Bound as {matched_dn}");
//!     if let SearchOutcome::Success(entries) = proxy.search(&session, None).await? {
//!         println!("Found {} users", entries.len());
//!     }
//! }
//! proxy.disconnect(session);
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Only equality, approximate and presence matches combined with `and`/`or`
//!   can be answered. Substring, ordering and negated filters are refused by
//!   the included backends.
//! * Backends are asked one after the other, not in parallel.
//! * Search results are not paged.

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod memory;
pub mod password;
pub mod postgres;
pub mod proxy;
pub mod stripper;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	backend::{Backend, BackendConfig, BackendFactory, User},
	config::Loader,
	entry::AttributesExt,
	error::{BackendError, Error},
	filter::Filter,
	proxy::{BindOutcome, LdapProxy, Operation, ResultCode, SearchOutcome, Session},
};
