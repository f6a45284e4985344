//! Password hashing and verification using Argon2id.
use argon2::{
	password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
	Algorithm, Argon2, Params, Version,
};

use crate::error::BackendError;

/// Time cost used when backends store new passwords
pub const DEFAULT_COST: u32 = 3;

/// Hash a password, using `cost` as the number of Argon2 iterations.
///
/// Returns the PHC-formatted hash string.
pub fn hash_password(password: &str, cost: u32) -> Result<String, BackendError> {
	let params = Params::new(Params::DEFAULT_M_COST, cost, Params::DEFAULT_P_COST, None)
		.map_err(|err| BackendError::Password(err.to_string()))?;
	let salt = SaltString::generate(&mut OsRng);
	let hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
		.hash_password(password.as_bytes(), &salt)
		.map_err(|err| BackendError::Password(err.to_string()))?;
	Ok(hash.to_string())
}

/// Check a candidate password against a stored hash. Malformed hashes never
/// verify.
#[must_use]
pub fn verify_password(hash: &str, password: &str) -> bool {
	let Ok(parsed) = PasswordHash::new(hash) else {
		tracing::warn!("Stored password hash is malformed");
		return false;
	};
	Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}
