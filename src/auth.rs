//! Authorization seam consulted before a job is submitted.
//!
//! The pool itself never decides who may relay files; it asks an
//! [`Authorizer`]. [`Database`](crate::db::Database) is the persistent
//! implementation, [`AllowList`] a fixed in-memory one.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Decides whether a user may submit jobs
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Whether `user_id` is allowed to submit
    ///
    /// Returns `Ok(false)` for unknown users; errors are reserved for
    /// lookup failures.
    async fn authenticate(&self, user_id: i64) -> Result<bool>;
}

/// Fixed set of permitted user ids
#[derive(Clone, Debug, Default)]
pub struct AllowList {
    users: HashSet<i64>,
}

impl AllowList {
    /// Allow exactly the given users
    pub fn new(users: impl IntoIterator<Item = i64>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authorizer for AllowList {
    async fn authenticate(&self, user_id: i64) -> Result<bool> {
        Ok(self.users.contains(&user_id))
    }
}
