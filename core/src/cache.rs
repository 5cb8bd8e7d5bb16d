//! Cacheable requests and the cache store boundary.
//!
//! A request opts into response caching by implementing [`CacheableRequest`].
//! The key identifies the stored response; tags group entries so a write path
//! can invalidate every query that depends on it.
//!
//! Stores hold opaque bytes. Encoding responses is the caching behavior's job,
//! which keeps [`CacheStore`] dyn-compatible and independent of response types.

use crate::BoxFuture;
use crate::request::Request;
use std::time::Duration;
use thiserror::Error;

/// A request whose response may be served from the cache.
///
/// # Example
///
/// ```
/// use mediator_core::{CacheableRequest, Request};
///
/// #[derive(Debug)]
/// struct GetProduct {
///     id: u64,
/// }
///
/// impl Request for GetProduct {
///     type Response = String;
/// }
///
/// impl CacheableRequest for GetProduct {
///     fn cache_key(&self) -> String {
///         format!("product:{}", self.id)
///     }
///
///     fn cache_tags(&self) -> Vec<String> {
///         vec!["products".to_string()]
///     }
/// }
///
/// assert_eq!(GetProduct { id: 7 }.cache_key(), "product:7");
/// ```
pub trait CacheableRequest: Request {
    /// Key under which the response is stored
    fn cache_key(&self) -> String;

    /// Tags attached to the stored entry
    fn cache_tags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Errors raised by a cache store.
///
/// The caching behavior treats every one of these as a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store could not be reached
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Key/value store with time-to-live and tag invalidation.
///
/// # Dyn Compatibility
///
/// Methods return [`BoxFuture`] so a store can be shared as
/// `Arc<dyn CacheStore>` between behaviors.
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be read.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, CacheError>>;

    /// Store an entry that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be written.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        ttl: Duration,
        tags: &'a [String],
    ) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Drop one entry. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be written.
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Drop every entry carrying `tag` and return how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be written.
    fn invalidate_tag<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<usize, CacheError>>;
}
