//! Error codes

use crate::proxy::ResultCode;

/// Errors that can occur while assembling the proxy or dispatching requests
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The configuration was not valid JSON or did not match the schema of
	/// the targeted backend kind.
	#[error("Malformed configuration: {0}")]
	Config(#[from] serde_json::Error),
	/// The configuration file could not be read.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// No factory is registered for the requested backend kind.
	#[error("Unknown backend kind `{0}`")]
	UnknownKind(String),
	/// A factory failed to construct its backend.
	#[error("Failed to build {kind} backend: {source}")]
	Build {
		/// The kind discriminator of the failing descriptor
		kind: String,
		/// The underlying construction failure
		#[source]
		source: BackendError,
	},
	/// The session handed to the proxy was not allocated by it.
	#[error("Invalid session")]
	InvalidSession,
	/// The session was cancelled before the request completed.
	#[error("Request cancelled")]
	Cancelled,
	/// A backend failed while answering a request.
	#[error("Backend `{backend}` failed: {source}")]
	Query {
		/// Name of the failing backend
		backend: String,
		/// The underlying failure
		#[source]
		source: BackendError,
	},
}

impl Error {
	/// The LDAP result code a transport should answer with for this error.
	/// Backend internals are never part of the code.
	#[must_use]
	pub fn result_code(&self) -> ResultCode {
		match self {
			Error::Query { .. } => ResultCode::OperationsError,
			Error::Cancelled => ResultCode::Cancelled,
			Error::Config(_)
			| Error::Io(_)
			| Error::UnknownKind(_)
			| Error::Build { .. }
			| Error::InvalidSession => ResultCode::Other,
		}
	}
}

/// Errors raised by a single backend
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
	/// The filter contained a node the backend cannot translate.
	#[error("Unsupported filter kind: {0}")]
	UnsupportedFilter(&'static str),
	/// A returned column held a value that is neither text nor an integer.
	#[error("Unsupported type {type_name} in column {column}")]
	UnsupportedColumnType {
		/// The column name
		column: String,
		/// The database type name
		type_name: String,
	},
	/// The column to attribute table is unusable.
	#[error("Invalid column mapping: {0}")]
	InvalidColumnMapping(String),
	/// A user lacks the attribute its DN is built from.
	#[error("User `{dn}` has no `{attribute}` attribute")]
	MissingAttribute {
		/// The DN reported by the wrapped backend
		dn: String,
		/// The missing attribute
		attribute: String,
	},
	/// The connection URL could not be parsed.
	#[error("Invalid connection URL: {0}")]
	InvalidUrl(#[from] url::ParseError),
	/// The backend needs a Tokio runtime but was built outside of one.
	#[error("A Tokio runtime is required to build this backend")]
	NoRuntime,
	/// The connection URL uses a scheme the backend does not speak.
	#[error("Unsupported URL scheme `{0}`")]
	UnsupportedScheme(String),
	/// The database driver reported an error.
	#[error(transparent)]
	Database(#[from] sqlx::Error),
	/// A password could not be hashed.
	#[error("Password hashing failed: {0}")]
	Password(String),
}
