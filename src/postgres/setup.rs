//! Administration of the `users` table.
use tracing::info;

use super::PostgresBackend;
use crate::{
	error::BackendError,
	password::{hash_password, DEFAULT_COST},
};

impl PostgresBackend {
	/// Create the `users` table and check that it can be queried.
	pub async fn init(&self) -> Result<(), BackendError> {
		info!("creating table users ...");
		sqlx::query(
			"CREATE TABLE users (id SERIAL PRIMARY KEY, name VARCHAR(256), password VARCHAR(1024), \
			 email VARCHAR(256), firstname VARCHAR(256), lastname VARCHAR(256))",
		)
		.execute(&self.pool)
		.await?;

		self.validate_database_structure().await
	}

	/// Drop the `users` table.
	pub async fn cleanup(&self) -> Result<(), BackendError> {
		info!("deleting table users ...");
		sqlx::query("DROP TABLE users").execute(&self.pool).await?;
		Ok(())
	}

	/// Insert a user, storing a hash of the password.
	pub async fn create_user(&self, name: &str, password: &str) -> Result<(), BackendError> {
		let hash = hash_password(password, DEFAULT_COST)?;
		let result = sqlx::query("INSERT INTO users (name, password) VALUES ($1, $2)")
			.bind(name)
			.bind(hash)
			.execute(&self.pool)
			.await?;
		info!("{} user inserted", result.rows_affected());
		Ok(())
	}

	/// Check that the columns used for authentication exist.
	async fn validate_database_structure(&self) -> Result<(), BackendError> {
		sqlx::query("SELECT name, password FROM users LIMIT 1").fetch_optional(&self.pool).await?;
		Ok(())
	}
}
