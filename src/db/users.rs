//! User management and authorization lookups.

use crate::auth::Authorizer;
use crate::error::DatabaseError;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use super::{Database, NewUser, User};

impl Database {
    fn cache_read(&self) -> RwLockReadGuard<'_, HashMap<i64, bool>> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cache_write(&self) -> RwLockWriteGuard<'_, HashMap<i64, bool>> {
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a user
    ///
    /// Fails if the user already exists.
    pub async fn insert_user(&self, user: &NewUser) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO users (user_id, is_admin, created_at) VALUES (?, ?, ?)")
            .bind(user.user_id)
            .bind(user.is_admin)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert user: {}",
                    e
                )))
            })?;

        self.cache_write().insert(user.user_id, user.is_admin);
        tracing::info!(user_id = user.user_id, is_admin = user.is_admin, "user added");
        Ok(())
    }

    /// Grant or revoke admin rights
    ///
    /// Returns `false` if no such user exists.
    pub async fn set_admin(&self, user_id: i64, is_admin: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_admin = ? WHERE user_id = ?")
            .bind(is_admin)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update admin status: {}",
                    e
                )))
            })?;

        let updated = result.rows_affected() > 0;
        if updated {
            self.cache_write().insert(user_id, is_admin);
        }
        Ok(updated)
    }

    /// Look a user up, bypassing the cache
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, is_admin, created_at FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get user: {}",
                e
            )))
        })?;

        Ok(user)
    }

    /// Admin flag for a user, served from the cache when possible
    ///
    /// Returns `None` for unknown users. Misses are not cached, so a user
    /// added by another process is picked up on the next lookup.
    pub async fn user_is_admin(&self, user_id: i64) -> Result<Option<bool>> {
        if let Some(is_admin) = self.cache_read().get(&user_id).copied() {
            return Ok(Some(is_admin));
        }

        let is_admin: Option<bool> =
            sqlx::query_scalar("SELECT is_admin FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to look up user: {}",
                        e
                    )))
                })?;

        if let Some(is_admin) = is_admin {
            self.cache_write().insert(user_id, is_admin);
        }
        Ok(is_admin)
    }

    /// Remove a user
    ///
    /// Returns `false` if no such user existed.
    pub async fn delete_user(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete user: {}",
                    e
                )))
            })?;

        self.cache_write().remove(&user_id);
        Ok(result.rows_affected() > 0)
    }

    /// All users, oldest first
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT user_id, is_admin, created_at FROM users ORDER BY created_at ASC, user_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list users: {}",
                e
            )))
        })?;

        Ok(users)
    }
}

#[async_trait]
impl Authorizer for Database {
    async fn authenticate(&self, user_id: i64) -> Result<bool> {
        Ok(self.user_is_admin(user_id).await?.is_some())
    }
}
