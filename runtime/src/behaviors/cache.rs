use crate::config::CacheConfig;
use crate::metrics::CacheMetrics;
use mediator_core::{
    BoxFuture, CacheStore, CacheableRequest, CancellationToken, Next, PipelineBehavior, Result,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Serves a cacheable request from the cache store when possible.
///
/// On a hit the stored response is decoded and returned without calling
/// `next`. On a miss the rest of the pipeline runs and a successful response
/// is stored under the request's key and tags for the configured TTL.
///
/// The cache never changes the outcome of a call. A store that fails, or an
/// entry that cannot be decoded, counts as a miss. A downstream failure is
/// returned as-is and nothing is stored.
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new(1_000));
/// let mediator = MediatorBuilder::new()
///     .handler::<GetProduct>(GetProductHandler)
///     .behavior::<GetProduct>(CacheBehavior::new(store, Duration::from_secs(600)))
///     .build()?;
/// ```
pub struct CacheBehavior<R> {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    _request: PhantomData<fn(R)>,
}

impl<R> CacheBehavior<R> {
    /// Cache responses in `store` for `ttl`
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            _request: PhantomData,
        }
    }

    /// Cache responses in `store` using the configured TTL
    #[must_use]
    pub fn from_config(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self::new(store, config.ttl())
    }

    /// Time-to-live applied to stored responses
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The backing store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(key, error = %error, "Cache store read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(response) => Some(response),
            Err(error) => {
                tracing::warn!(key, error = %error, "Cached entry could not be decoded, treating as miss");
                None
            }
        }
    }

    async fn store_response(&self, key: &str, bytes: Vec<u8>, tags: &[String]) {
        if let Err(error) = self.store.set(key, bytes, self.ttl, tags).await {
            tracing::warn!(key, error = %error, "Cache store write failed");
        }
    }
}

impl<R> std::fmt::Debug for CacheBehavior<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBehavior")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<R> PipelineBehavior<R> for CacheBehavior<R>
where
    R: CacheableRequest,
    R::Response: Serialize + DeserializeOwned,
{
    fn handle<'a>(
        &'a self,
        request: &'a R,
        next: Next<'a, R::Response>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<R::Response>> {
        Box::pin(async move {
            let key = request.cache_key();

            if let Some(response) = self.lookup::<R::Response>(&key).await {
                tracing::trace!(key = %key, "Cache hit");
                CacheMetrics::record_hit();
                return Ok(response);
            }

            tracing::trace!(key = %key, "Cache miss");
            CacheMetrics::record_miss();

            let response = next.run().await?;
            match serde_json::to_vec(&response) {
                Ok(bytes) => self.store_response(&key, bytes, &request.cache_tags()).await,
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Response could not be encoded, not cached");
                }
            }
            Ok(response)
        })
    }
}
