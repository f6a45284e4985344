//! The dispatcher between a directory protocol transport and the backends.
//!
//! The transport calls [`LdapProxy::connect`] once per accepted connection and
//! threads the returned [`Session`] through every request of that connection.
//! Binds are tried against every backend until the first one accepts, searches
//! are fanned out to all backends and concatenated. Everything that would
//! modify the directory is refused with [`ResultCode::UnwillingToPerform`].
//!
//! Backends are registered with [`LdapProxy::add_backend`] before the proxy is
//! shared. Once it sits behind an `Arc` the registry can no longer change,
//! which is what allows requests to read it without locking.
use std::{
	collections::BTreeMap,
	fmt,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Instant,
};

use ldap3::SearchEntry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{backend::Backend, error::Error, filter::Filter};

/// LDAP result codes (RFC 4511) the proxy answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResultCode {
	/// `success`
	Success = 0,
	/// `operationsError`
	OperationsError = 1,
	/// `invalidCredentials`
	InvalidCredentials = 49,
	/// `insufficientAccessRights`
	InsufficientAccessRights = 50,
	/// `unwillingToPerform`
	UnwillingToPerform = 53,
	/// `other`
	Other = 80,
	/// `canceled`
	Cancelled = 118,
}

impl ResultCode {
	/// The numeric code as sent on the wire.
	#[must_use]
	pub fn code(self) -> u32 {
		self as u32
	}
}

/// The result of a bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
	/// A backend accepted the credentials. The session is now bound to
	/// `matched_dn`.
	Success {
		/// The DN the session was bound to
		matched_dn: String,
	},
	/// No backend accepted the credentials.
	InvalidCredentials,
}

impl BindOutcome {
	/// The LDAP result code for this outcome.
	#[must_use]
	pub fn result_code(&self) -> ResultCode {
		match self {
			BindOutcome::Success { .. } => ResultCode::Success,
			BindOutcome::InvalidCredentials => ResultCode::InvalidCredentials,
		}
	}
}

/// The result of a search
#[derive(Debug, Clone)]
pub enum SearchOutcome {
	/// Entries of all backends, in backend order
	Success(Vec<SearchEntry>),
	/// The session is not bound.
	InsufficientAccessRights,
}

impl SearchOutcome {
	/// The LDAP result code for this outcome.
	#[must_use]
	pub fn result_code(&self) -> ResultCode {
		match self {
			SearchOutcome::Success(_) => ResultCode::Success,
			SearchOutcome::InsufficientAccessRights => ResultCode::InsufficientAccessRights,
		}
	}
}

/// Operations that would modify the directory. The proxy is read-only and
/// refuses all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Add an entry
	Add,
	/// Delete an entry
	Delete,
	/// Modify the attributes of an entry
	Modify,
	/// Rename or move an entry
	ModifyDn,
	/// An extended operation
	Extended,
	/// The password modify extended operation
	PasswordModify,
}

impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Operation::Add => "add",
			Operation::Delete => "delete",
			Operation::Modify => "modify",
			Operation::ModifyDn => "modifyDN",
			Operation::Extended => "extended",
			Operation::PasswordModify => "passwordModify",
		})
	}
}

/// The state of one client connection.
///
/// A session starts out unbound. It is bound to a DN by a successful bind,
/// becomes unbound again by a failed one, and ends with
/// [`LdapProxy::disconnect`].
#[derive(Debug)]
pub struct Session {
	/// Identifier, unique per proxy
	id: u64,
	/// Bound DN, empty while unauthenticated
	dn: String,
	/// Cancelled on disconnect
	cancel: CancellationToken,
	/// The id counter of the proxy that created this session
	owner: Arc<AtomicU64>,
}

impl Session {
	/// The session identifier.
	#[must_use]
	pub fn id(&self) -> u64 {
		self.id
	}

	/// The bound DN, empty if the session is not authenticated.
	#[must_use]
	pub fn dn(&self) -> &str {
		&self.dn
	}

	/// Whether a bind has succeeded on this session.
	#[must_use]
	pub fn is_bound(&self) -> bool {
		!self.dn.is_empty()
	}

	/// A handle to the session's cancellation token. Cancelling it aborts
	/// requests that are in flight on this session.
	#[must_use]
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}
}

/// Dispatches protocol requests to a set of named backends
#[derive(Debug, Default)]
pub struct LdapProxy {
	/// Backends by name
	backends: BTreeMap<String, Arc<dyn Backend>>,
	/// Source of session ids
	sessions: Arc<AtomicU64>,
}

impl LdapProxy {
	/// Create a proxy without any backends.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a backend under its name, replacing any backend of the same
	/// name.
	pub fn add_backend(&mut self, backend: Arc<dyn Backend>) {
		let name = backend.name().to_owned();
		info!("Adding backend '{name}'");
		if self.backends.insert(name.clone(), backend).is_some() {
			warn!("Backend '{name}' was already registered and has been replaced");
		}
	}

	/// Register several backends.
	pub fn add_backends(&mut self, backends: impl IntoIterator<Item = Arc<dyn Backend>>) {
		let backends: Vec<_> = backends.into_iter().collect();
		info!("Adding {} backends", backends.len());
		for backend in backends {
			self.add_backend(backend);
		}
	}

	/// Names of the registered backends, in dispatch order
	pub fn backend_names(&self) -> impl Iterator<Item = &str> {
		self.backends.keys().map(String::as_str)
	}

	/// Open a new unauthenticated session.
	#[must_use]
	pub fn connect(&self) -> Session {
		let id = self.sessions.fetch_add(1, Ordering::Relaxed);
		info!("[{id}] connected");
		Session {
			id,
			dn: String::new(),
			cancel: CancellationToken::new(),
			owner: self.sessions.clone(),
		}
	}

	/// End a session, cancelling whatever is still running on it.
	pub fn disconnect(&self, session: Session) {
		session.cancel.cancel();
		info!("[{}] disconnected (dn: '{}')", session.id, session.dn);
	}

	/// Fail if the session was created by a different proxy
	fn check_owner(&self, session: &Session) -> Result<(), Error> {
		if Arc::ptr_eq(&self.sessions, &session.owner) {
			Ok(())
		} else {
			Err(Error::InvalidSession)
		}
	}

	/// Fail if the session may not issue requests
	fn check_session(&self, session: &Session) -> Result<(), Error> {
		self.check_owner(session)?;
		if session.cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}
		Ok(())
	}

	/// Authenticate the session as `dn`.
	///
	/// The session is unbound first, so a failed bind never leaves an earlier
	/// identity in place. Backends are asked in name order and the first one
	/// accepting the credentials wins.
	pub async fn bind(
		&self,
		session: &mut Session,
		dn: &str,
		password: &str,
	) -> Result<BindOutcome, Error> {
		self.check_owner(session)?;
		let start = Instant::now();
		session.dn.clear();
		if session.cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let cancel = session.cancel.clone();
		for backend in self.backends.values() {
			let accepted = tokio::select! {
				biased;
				() = cancel.cancelled() => {
					info!("[{}] bind {dn} cancelled after {:?}", session.id, start.elapsed());
					return Err(Error::Cancelled);
				}
				accepted = backend.authenticate(dn, password) => accepted,
			};
			if accepted {
				debug!("[{}] backend '{}' accepted {dn}", session.id, backend.name());
				dn.clone_into(&mut session.dn);
				info!("[{}] bind {dn}: success in {:?}", session.id, start.elapsed());
				return Ok(BindOutcome::Success { matched_dn: dn.to_owned() });
			}
		}

		info!("[{}] bind {dn}: invalid credentials in {:?}", session.id, start.elapsed());
		Ok(BindOutcome::InvalidCredentials)
	}

	/// Search all backends.
	///
	/// Unbound sessions are refused without asking any backend. If one
	/// backend fails the whole search fails, results of other backends are
	/// dropped.
	pub async fn search(
		&self,
		session: &Session,
		filter: Option<&Filter>,
	) -> Result<SearchOutcome, Error> {
		self.check_session(session)?;
		let start = Instant::now();
		let filter_text = filter.map(ToString::to_string).unwrap_or_default();

		if !session.is_bound() {
			info!("[{}] search {filter_text}: insufficient access rights", session.id);
			return Ok(SearchOutcome::InsufficientAccessRights);
		}

		let mut entries = Vec::new();
		for backend in self.backends.values() {
			let users = tokio::select! {
				biased;
				() = session.cancel.cancelled() => {
					info!(
						"[{}] search {filter_text} by {} cancelled after {:?}",
						session.id, session.dn, start.elapsed()
					);
					return Err(Error::Cancelled);
				}
				users = backend.get_users(filter) => users,
			};
			let users = users.map_err(|source| {
				warn!("[{}] search in backend '{}' failed: {source}", session.id, backend.name());
				Error::Query { backend: backend.name().to_owned(), source }
			})?;
			entries.extend(users.into_iter().map(SearchEntry::from));
		}

		info!(
			"[{}] search {filter_text} by {}: {} entries in {:?}",
			session.id,
			session.dn,
			entries.len(),
			start.elapsed()
		);
		Ok(SearchOutcome::Success(entries))
	}

	/// The DN the session is bound to, empty if it is not bound.
	pub fn whoami<'a>(&self, session: &'a Session) -> Result<&'a str, Error> {
		self.check_owner(session)?;
		debug!("[{}] whoami: '{}'", session.id, session.dn);
		Ok(&session.dn)
	}

	/// Refuse a modifying operation.
	#[must_use]
	pub fn reject(&self, session: &Session, operation: Operation) -> ResultCode {
		info!("[{}] {operation} by '{}' refused", session.id, session.dn);
		ResultCode::UnwillingToPerform
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::{
		collections::HashMap,
		sync::{
			atomic::{AtomicUsize, Ordering},
			Arc, Mutex,
		},
		time::Duration,
	};

	use async_trait::async_trait;

	use super::{BindOutcome, LdapProxy, Operation, ResultCode, SearchOutcome};
	use crate::{
		backend::{Backend, User},
		error::{BackendError, Error},
		filter::Filter,
	};

	/// A scripted backend counting its invocations
	#[derive(Debug, Default)]
	struct MockBackend {
		name: String,
		accept: bool,
		fail: bool,
		hang: bool,
		users: Vec<User>,
		auth_calls: AtomicUsize,
		search_calls: AtomicUsize,
		last_credentials: Mutex<Option<(String, String)>>,
	}

	impl MockBackend {
		fn new(name: &str) -> Self {
			Self { name: name.to_owned(), ..Default::default() }
		}

		fn accepting(name: &str) -> Self {
			Self { accept: true, ..Self::new(name) }
		}

		fn with_users(name: &str, names: &[&str]) -> Self {
			let users = names
				.iter()
				.map(|name| User {
					dn: (*name).to_owned(),
					attributes: HashMap::from([("cn".to_owned(), vec![(*name).to_owned()])]),
				})
				.collect();
			Self { users, ..Self::accepting(name) }
		}
	}

	#[async_trait]
	impl Backend for MockBackend {
		fn name(&self) -> &str {
			&self.name
		}

		async fn authenticate(&self, username: &str, password: &str) -> bool {
			self.auth_calls.fetch_add(1, Ordering::SeqCst);
			*self.last_credentials.lock().unwrap() =
				Some((username.to_owned(), password.to_owned()));
			if self.hang {
				std::future::pending::<()>().await;
			}
			self.accept
		}

		async fn get_users(&self, _filter: Option<&Filter>) -> Result<Vec<User>, BackendError> {
			self.search_calls.fetch_add(1, Ordering::SeqCst);
			if self.hang {
				std::future::pending::<()>().await;
			}
			if self.fail {
				return Err(BackendError::UnsupportedFilter("substrings"));
			}
			Ok(self.users.clone())
		}
	}

	fn proxy_with(backends: &[&Arc<MockBackend>]) -> LdapProxy {
		let mut proxy = LdapProxy::new();
		for backend in backends {
			proxy.add_backend((*backend).clone());
		}
		proxy
	}

	#[tokio::test]
	async fn bind_without_backends() -> Result<(), Box<dyn std::error::Error>> {
		let proxy = LdapProxy::new();
		let mut session = proxy.connect();
		let outcome = proxy.bind(&mut session, "cn=admin", "secret").await?;
		assert_eq!(outcome, BindOutcome::InvalidCredentials);
		assert_eq!(outcome.result_code(), ResultCode::InvalidCredentials);
		assert_eq!(session.dn(), "");
		Ok(())
	}

	#[tokio::test]
	async fn bind_success() -> Result<(), Box<dyn std::error::Error>> {
		let backend = Arc::new(MockBackend::accepting("a"));
		let proxy = proxy_with(&[&backend]);
		let mut session = proxy.connect();

		let outcome = proxy.bind(&mut session, "cn=admin", "secret").await?;
		assert_eq!(outcome, BindOutcome::Success { matched_dn: "cn=admin".to_owned() });
		assert_eq!(outcome.result_code().code(), 0);
		assert_eq!(session.dn(), "cn=admin");
		assert_eq!(
			backend.last_credentials.lock().unwrap().clone(),
			Some(("cn=admin".to_owned(), "secret".to_owned()))
		);
		Ok(())
	}

	#[tokio::test]
	async fn first_accepting_backend_wins() -> Result<(), Box<dyn std::error::Error>> {
		let first = Arc::new(MockBackend::new("a"));
		let second = Arc::new(MockBackend::accepting("b"));
		let third = Arc::new(MockBackend::accepting("c"));
		let proxy = proxy_with(&[&third, &first, &second]);
		let mut session = proxy.connect();

		let outcome = proxy.bind(&mut session, "cn=admin", "secret").await?;
		assert!(matches!(outcome, BindOutcome::Success { .. }));
		assert_eq!(first.auth_calls.load(Ordering::SeqCst), 1);
		assert_eq!(second.auth_calls.load(Ordering::SeqCst), 1);
		assert_eq!(third.auth_calls.load(Ordering::SeqCst), 0);
		Ok(())
	}

	#[tokio::test]
	async fn failed_rebind_unbinds() -> Result<(), Box<dyn std::error::Error>> {
		let backend = Arc::new(MockBackend::accepting("a"));
		let proxy = proxy_with(&[&backend]);
		let mut session = proxy.connect();
		proxy.bind(&mut session, "cn=admin", "secret").await?;
		assert!(session.is_bound());

		let mut proxy = proxy;
		proxy.add_backend(Arc::new(MockBackend::new("a")));
		let outcome = proxy.bind(&mut session, "cn=admin", "wrong").await?;
		assert_eq!(outcome, BindOutcome::InvalidCredentials);
		assert_eq!(proxy.whoami(&session)?, "");
		Ok(())
	}

	#[tokio::test]
	async fn unauthenticated_search() -> Result<(), Box<dyn std::error::Error>> {
		let first = Arc::new(MockBackend::with_users("a", &["user1"]));
		let second = Arc::new(MockBackend::with_users("b", &["user2"]));
		let proxy = proxy_with(&[&first, &second]);
		let session = proxy.connect();

		let outcome = proxy.search(&session, None).await?;
		assert!(matches!(outcome, SearchOutcome::InsufficientAccessRights));
		assert_eq!(outcome.result_code().code(), 50);
		assert_eq!(first.search_calls.load(Ordering::SeqCst), 0);
		assert_eq!(second.search_calls.load(Ordering::SeqCst), 0);
		Ok(())
	}

	#[tokio::test]
	async fn search_concatenates_backends() -> Result<(), Box<dyn std::error::Error>> {
		let first = Arc::new(MockBackend::with_users("a", &["user1", "user2"]));
		let second = Arc::new(MockBackend::with_users("b", &["user3"]));
		let proxy = proxy_with(&[&second, &first]);
		let mut session = proxy.connect();
		proxy.bind(&mut session, "cn=admin", "secret").await?;

		let SearchOutcome::Success(entries) =
			proxy.search(&session, Some(&Filter::present("cn"))).await?
		else {
			panic!("search was refused");
		};
		let dns: Vec<_> = entries.iter().map(|entry| entry.dn.as_str()).collect();
		assert_eq!(dns, ["user1", "user2", "user3"]);
		assert_eq!(entries[0].attrs["cn"], ["user1"]);
		Ok(())
	}

	#[tokio::test]
	async fn failing_backend_fails_search() -> Result<(), Box<dyn std::error::Error>> {
		let first = Arc::new(MockBackend::with_users("a", &["user1"]));
		let second =
			Arc::new(MockBackend { fail: true, ..MockBackend::with_users("b", &["user2"]) });
		let proxy = proxy_with(&[&first, &second]);
		let mut session = proxy.connect();
		proxy.bind(&mut session, "cn=admin", "secret").await?;

		let err = proxy.search(&session, None).await.unwrap_err();
		assert!(matches!(err, Error::Query { ref backend, .. } if backend == "b"));
		assert_eq!(err.result_code(), ResultCode::OperationsError);
		assert_eq!(first.search_calls.load(Ordering::SeqCst), 1);
		Ok(())
	}

	#[tokio::test]
	async fn foreign_session() {
		let proxy = LdapProxy::new();
		let other = LdapProxy::new();
		let mut session = other.connect();

		assert!(matches!(
			proxy.bind(&mut session, "cn=admin", "secret").await,
			Err(Error::InvalidSession)
		));
		assert!(matches!(proxy.search(&session, None).await, Err(Error::InvalidSession)));
		assert!(matches!(proxy.whoami(&session), Err(Error::InvalidSession)));
		assert_eq!(Error::InvalidSession.result_code(), ResultCode::Other);
	}

	#[tokio::test]
	async fn cancelled_session_calls_no_backend() {
		let backend = Arc::new(MockBackend::accepting("a"));
		let proxy = proxy_with(&[&backend]);
		let mut session = proxy.connect();
		session.cancellation_token().cancel();

		assert!(matches!(
			proxy.bind(&mut session, "cn=admin", "secret").await,
			Err(Error::Cancelled)
		));
		assert_eq!(backend.auth_calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn cancelled_rebind_unbinds() -> Result<(), Box<dyn std::error::Error>> {
		let backend = Arc::new(MockBackend::accepting("a"));
		let proxy = proxy_with(&[&backend]);
		let mut session = proxy.connect();
		proxy.bind(&mut session, "cn=admin", "secret").await?;
		assert_eq!(session.dn(), "cn=admin");

		session.cancellation_token().cancel();
		let result = proxy.bind(&mut session, "cn=other", "wrong").await;
		assert!(matches!(result, Err(Error::Cancelled)));
		assert_eq!(session.dn(), "");
		assert_eq!(proxy.whoami(&session)?, "");
		assert_eq!(backend.auth_calls.load(Ordering::SeqCst), 1);
		Ok(())
	}

	#[tokio::test]
	async fn cancel_in_flight_bind() {
		let backend = Arc::new(MockBackend { hang: true, ..MockBackend::accepting("a") });
		let proxy = proxy_with(&[&backend]);
		let mut session = proxy.connect();

		let token = session.cancellation_token();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(10)).await;
			token.cancel();
		});

		let result = proxy.bind(&mut session, "cn=admin", "secret").await;
		assert!(matches!(result, Err(Error::Cancelled)));
		assert_eq!(session.dn(), "");
	}

	#[tokio::test]
	async fn disconnect_cancels() {
		let proxy = LdapProxy::new();
		let session = proxy.connect();
		let token = session.cancellation_token();
		assert!(!token.is_cancelled());
		proxy.disconnect(session);
		assert!(token.is_cancelled());
	}

	#[tokio::test]
	async fn whoami() -> Result<(), Box<dyn std::error::Error>> {
		let proxy = proxy_with(&[&Arc::new(MockBackend::accepting("a"))]);
		let mut session = proxy.connect();
		assert_eq!(proxy.whoami(&session)?, "");
		proxy.bind(&mut session, "cn=admin", "secret").await?;
		assert_eq!(proxy.whoami(&session)?, "cn=admin");
		Ok(())
	}

	#[test]
	fn reject_modifications() {
		let proxy = LdapProxy::new();
		let session = proxy.connect();
		for operation in [
			Operation::Add,
			Operation::Delete,
			Operation::Modify,
			Operation::ModifyDn,
			Operation::Extended,
			Operation::PasswordModify,
		] {
			assert_eq!(proxy.reject(&session, operation), ResultCode::UnwillingToPerform);
		}
		assert_eq!(ResultCode::UnwillingToPerform.code(), 53);
	}

	#[test]
	fn unique_session_ids() {
		let proxy = LdapProxy::new();
		let first = proxy.connect();
		let second = proxy.connect();
		assert_ne!(first.id(), second.id());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_sessions() -> Result<(), Box<dyn std::error::Error>> {
		let backend = Arc::new(MockBackend::accepting("a"));
		let proxy = Arc::new(proxy_with(&[&backend]));

		let tasks: Vec<_> = (0..32)
			.map(|i| {
				let proxy = proxy.clone();
				tokio::spawn(async move {
					let mut session = proxy.connect();
					let dn = format!("cn=user{i}");
					proxy.bind(&mut session, &dn, "secret").await.unwrap();
					tokio::task::yield_now().await;
					assert_eq!(proxy.whoami(&session).unwrap(), dn);
					session.id()
				})
			})
			.collect();

		let mut ids = Vec::new();
		for task in tasks {
			ids.push(task.await?);
		}
		ids.sort_unstable();
		ids.dedup();
		assert_eq!(ids.len(), 32);
		assert_eq!(backend.auth_calls.load(Ordering::SeqCst), 32);
		Ok(())
	}
}
