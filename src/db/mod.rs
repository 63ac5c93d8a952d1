//! Database layer for bahador
//!
//! SQLite persistence for the users allowed to submit relay jobs.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`users`] — User CRUD and the [`Authorizer`](crate::auth::Authorizer) impl

use sqlx::{FromRow, sqlite::SqlitePool};
use std::collections::HashMap;
use std::sync::RwLock;

mod migrations;
mod users;

/// New user to be inserted into the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewUser {
    /// Chat platform user id
    pub user_id: i64,
    /// Whether the user may manage other users
    pub is_admin: bool,
}

/// User record from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    /// Chat platform user id
    pub user_id: i64,
    /// Whether the user may manage other users
    pub is_admin: bool,
    /// Unix timestamp when the user was added
    pub created_at: i64,
}

/// Database handle for bahador
///
/// Lookups go through an in-memory cache of `user_id -> is_admin` that is
/// filled on first read and kept in step by every write.
pub struct Database {
    pool: SqlitePool,
    cache: RwLock<HashMap<i64, bool>>,
}
