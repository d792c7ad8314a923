use anyhow::{anyhow, bail, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use tracing::info;

use provisio_target::{Superuser, UserStore};

use crate::DuckDbTarget;

/// Login of the built-in account used for unauthenticated access.
pub const GUEST_LOGIN: &str = "anonymous";

/// Argon2id PHC string for `password`, salted from the OS RNG.
///
/// `m_cost` is the memory cost in KiB; time cost 3, one lane, 32-byte output.
pub fn hash_password(password: &str, m_cost: u32) -> Result<String> {
    let params = Params::new(m_cost, 3, 1, Some(32))
        .map_err(|e| anyhow!("argon2 params (m_cost={m_cost}): {e}"))?;
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| anyhow!("argon2 hash: {e}"))
}

impl DuckDbTarget {
    /// Stored Argon2 hash for `login`, if the account exists.
    pub async fn password_hash(&self, login: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let result = conn
            .prepare(&format!(
                "SELECT password_hash FROM {} WHERE login = ?1",
                self.tables.users
            ))?
            .query_row(duckdb::params![login], |row| row.get::<_, String>(0))
            .ok();
        Ok(result)
    }

    pub async fn is_superuser(&self, login: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let result = conn
            .prepare(&format!(
                "SELECT superuser FROM {} WHERE login = ?1",
                self.tables.users
            ))?
            .query_row(duckdb::params![login], |row| row.get::<_, bool>(0))
            .ok();
        Ok(result.unwrap_or(false))
    }
}

#[async_trait]
impl UserStore for DuckDbTarget {
    async fn elevate(&self) -> Result<Superuser> {
        self.ping().await?;
        Ok(Superuser::issued_by(format!(
            "duckdb:{}",
            self.document_root.display()
        )))
    }

    async fn user_exists(&self, login: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare(&format!(
                "SELECT COUNT(*) FROM {} WHERE login = ?1",
                self.tables.users
            ))?
            .query_row(duckdb::params![login], |row| row.get(0))?;
        Ok(count > 0)
    }

    async fn user_email_exists(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare(&format!(
                "SELECT COUNT(*) FROM {} WHERE lower(email) = lower(?1)",
                self.tables.users
            ))?
            .query_row(duckdb::params![email], |row| row.get(0))?;
        Ok(count > 0)
    }

    async fn create_user(
        &self,
        su: &Superuser,
        login: &str,
        password: &str,
        email: &str,
    ) -> Result<()> {
        if login.trim().is_empty() || login == GUEST_LOGIN {
            bail!("login {login:?} is reserved or empty");
        }
        if password.is_empty() {
            bail!("password for {login} cannot be empty");
        }
        // Hash outside the connection lock.
        let hash = hash_password(password, self.argon2_memory_kb)?;
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO {} (login, password_hash, email, superuser, created_at) \
                 VALUES (?1, ?2, ?3, false, CURRENT_TIMESTAMP)",
                self.tables.users
            ),
            duckdb::params![login, hash, email],
        )?;
        info!(login, granted_by = su.issuer(), "User created");
        Ok(())
    }

    async fn grant_superuser(&self, su: &Superuser, login: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            &format!(
                "UPDATE {} SET superuser = true WHERE login = ?1",
                self.tables.users
            ),
            duckdb::params![login],
        )?;
        if rows == 0 {
            bail!("cannot grant superuser: no user {login}");
        }
        info!(login, granted_by = su.issuer(), "Superuser access granted");
        Ok(())
    }
}
