//! Retrieval and caching of an identity provider's published key set

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};
use thiserror::Error;
use tollgate::Jwks;

use crate::{
    config::{DEFAULT_JWKS_CACHE_TTL, DEFAULT_JWKS_MIN_REFRESH_INTERVAL, DEFAULT_JWKS_TIMEOUT},
    AuthConfig,
};

/// The key set could not be retrieved
#[derive(Debug, Error)]
pub enum KeySetError {
    /// The request failed, timed out, or its body could not be read
    #[error("key set request failed")]
    Request(#[from] reqwest::Error),

    /// The key set endpoint answered with an unexpected status
    #[error("key set endpoint responded with {0}")]
    UnexpectedStatus(StatusCode),

    /// The response body is not a JSON Web Key Set
    #[error("key set response is not a JSON Web Key Set")]
    Malformed(#[source] serde_json::Error),
}

/// Whether a key set was served from the cache
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Freshness {
    Cached,
    Current,
}

#[derive(Debug)]
struct CachedKeys {
    jwks: Arc<Jwks>,
    fetched_at: Instant,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

#[derive(Debug)]
struct RemoteOptions {
    jwks_url: String,
    client: Client,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
}

#[derive(Debug)]
struct Inner {
    cache: ArcSwapOption<CachedKeys>,
    remote: Option<RemoteOptions>,
    /// When a request for the key set was last started, successful or not
    last_fetch: Mutex<Option<Instant>>,
}

/// A source of the identity provider's JSON Web Key Set
///
/// A remote fetcher retrieves the key set over HTTP and reuses it for the
/// configured cache lifetime. A zero lifetime fetches the key set for every
/// request. Cloning a fetcher is cheap, and clones share one cache.
#[derive(Clone, Debug)]
#[must_use]
pub struct KeySetFetcher {
    inner: Arc<Inner>,
}

/// Builds a remote [`KeySetFetcher`]
#[derive(Clone, Debug)]
#[must_use]
pub struct KeySetFetcherBuilder {
    jwks_url: String,
    timeout: Duration,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
}

impl KeySetFetcherBuilder {
    /// Bounds each key set request, including reading the body
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Sets how long a fetched key set is reused; zero disables caching
    pub fn with_cache_ttl(self, cache_ttl: Duration) -> Self {
        Self { cache_ttl, ..self }
    }

    /// Sets the shortest time between two fetches prompted by a token naming
    /// a key the cached set lacks
    ///
    /// Bounds how hard tokens with made-up key ids can make the fetcher hit
    /// the identity provider. Zero allows a fetch for every such token.
    pub fn with_min_refresh_interval(self, min_refresh_interval: Duration) -> Self {
        Self {
            min_refresh_interval,
            ..self
        }
    }

    /// Builds the fetcher
    ///
    /// No request is made until a key set is first needed.
    ///
    /// # Errors
    ///
    /// The HTTP client could not be initialized.
    pub fn build(self) -> Result<KeySetFetcher, KeySetError> {
        let client = Client::builder()
            .user_agent(concat!("tollgate_oauth2/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()?;

        Ok(KeySetFetcher {
            inner: Arc::new(Inner {
                cache: ArcSwapOption::empty(),
                remote: Some(RemoteOptions {
                    jwks_url: self.jwks_url,
                    client,
                    cache_ttl: self.cache_ttl,
                    min_refresh_interval: self.min_refresh_interval,
                }),
                last_fetch: Mutex::new(None),
            }),
        })
    }
}

impl KeySetFetcher {
    /// Starts building a fetcher for the key set at `jwks_url`
    pub fn builder(jwks_url: impl Into<String>) -> KeySetFetcherBuilder {
        KeySetFetcherBuilder {
            jwks_url: jwks_url.into(),
            timeout: DEFAULT_JWKS_TIMEOUT,
            cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            min_refresh_interval: DEFAULT_JWKS_MIN_REFRESH_INTERVAL,
        }
    }

    /// A fetcher for the key set at `jwks_url`, with default timeout and cache lifetime
    ///
    /// # Errors
    ///
    /// The HTTP client could not be initialized.
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, KeySetError> {
        Self::builder(jwks_url).build()
    }

    /// A fetcher for the key set a tenant publishes at
    /// `https://{domain}/.well-known/jwks.json`
    ///
    /// # Errors
    ///
    /// The HTTP client could not be initialized.
    pub fn for_domain(domain: &str) -> Result<Self, KeySetError> {
        Self::new(format!(
            "https://{}/.well-known/jwks.json",
            domain.trim_end_matches('/')
        ))
    }

    /// A fetcher with the location, timeout and cache lifetime from `config`
    ///
    /// # Errors
    ///
    /// The HTTP client could not be initialized.
    pub fn from_config(config: &AuthConfig) -> Result<Self, KeySetError> {
        Self::builder(config.jwks_url())
            .with_timeout(config.jwks_timeout())
            .with_cache_ttl(config.jwks_cache_ttl())
            .with_min_refresh_interval(config.jwks_min_refresh_interval())
            .build()
    }

    /// A fetcher that always serves the given key set and never goes to the network
    pub fn from_jwks(jwks: Jwks) -> Self {
        let cached = CachedKeys {
            jwks: Arc::new(jwks),
            fetched_at: Instant::now(),
            etag: None,
            last_modified: None,
        };

        Self {
            inner: Arc::new(Inner {
                cache: ArcSwapOption::new(Some(Arc::new(cached))),
                remote: None,
                last_fetch: Mutex::new(None),
            }),
        }
    }

    /// The current key set
    ///
    /// Served from the cache while it is fresh; otherwise fetched. Dropping
    /// the returned future aborts an in-flight request.
    ///
    /// # Errors
    ///
    /// The key set had to be fetched and the request failed, timed out, or
    /// returned something other than a key set.
    pub async fn key_set(&self) -> Result<Arc<Jwks>, KeySetError> {
        self.load().await.map(|(jwks, _)| jwks)
    }

    pub(crate) async fn load(&self) -> Result<(Arc<Jwks>, Freshness), KeySetError> {
        let Some(remote) = &self.inner.remote else {
            let jwks = self
                .inner
                .cache
                .load_full()
                .map(|cached| Arc::clone(&cached.jwks))
                .unwrap_or_default();
            return Ok((jwks, Freshness::Current));
        };

        if let Some(cached) = self.inner.cache.load_full() {
            if cached.fetched_at.elapsed() < remote.cache_ttl {
                tracing::trace!("serving cached JWKS");
                return Ok((Arc::clone(&cached.jwks), Freshness::Cached));
            }
        }

        let jwks = self.fetch(remote).await?;
        Ok((jwks, Freshness::Current))
    }

    /// Drops the cached key set so that the next use fetches it again
    ///
    /// Has no effect on a fetcher built with [`from_jwks`][Self::from_jwks].
    pub fn invalidate(&self) {
        if self.inner.remote.is_some() {
            tracing::debug!("invalidating cached JWKS");
            self.inner.cache.store(None);
        }
    }

    /// Fetches the key set now, regardless of the cache
    ///
    /// No retries are attempted. If the fetch fails, the cached key set is
    /// left as it was.
    ///
    /// # Errors
    ///
    /// The request failed, timed out, or returned something other than a key set.
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        if let Some(remote) = &self.inner.remote {
            self.fetch(remote).await?;
        }

        Ok(())
    }

    /// Fetches the key set again because a token named a key it lacks
    ///
    /// Yields `None` without making a request when the last fetch started
    /// less than the minimum refresh interval ago, or when the key set is
    /// local. A failed fetch leaves the cached key set in place.
    pub(crate) async fn refetch_for_unknown_key(&self) -> Result<Option<Arc<Jwks>>, KeySetError> {
        let Some(remote) = &self.inner.remote else {
            return Ok(None);
        };

        {
            let mut last_fetch = self
                .inner
                .last_fetch
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(at) = *last_fetch {
                if at.elapsed() < remote.min_refresh_interval {
                    tracing::debug!("JWKS fetched too recently; not fetching again");
                    return Ok(None);
                }
            }
            // claimed under the lock so concurrent misses make one request
            *last_fetch = Some(Instant::now());
        }

        self.fetch(remote).await.map(Some)
    }

    /// Refreshes the key set in a background task at the given interval
    ///
    /// Failures are ignored; the next tick tries again.
    pub fn spawn_refresh(&self, interval: Duration) {
        let this = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                let _ = this.refresh().await;
            }
        });
    }

    #[tracing::instrument(skip_all, fields(jwks.url = %remote.jwks_url))]
    async fn fetch(&self, remote: &RemoteOptions) -> Result<Arc<Jwks>, KeySetError> {
        tracing::debug!("fetching JWKS");

        *self
            .inner
            .last_fetch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        let previous = self.inner.cache.load_full();

        let mut request = remote.client.get(&remote.jwks_url);
        if let Some(previous) = &previous {
            if let Some(etag) = &previous.etag {
                request = request.header(header::IF_NONE_MATCH, etag);
            } else if let Some(last_modified) = &previous.last_modified {
                request = request.header(header::IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request.send().await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS fetch failed");
            KeySetError::from(err)
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            if let Some(previous) = previous {
                tracing::debug!("JWKS not modified");
                let renewed = CachedKeys {
                    jwks: Arc::clone(&previous.jwks),
                    fetched_at: Instant::now(),
                    etag: previous.etag.clone(),
                    last_modified: previous.last_modified.clone(),
                };
                self.inner.cache.store(Some(Arc::new(renewed)));
                return Ok(Arc::clone(&previous.jwks));
            }
        }

        if !status.is_success() {
            tracing::warn!(
                http.status_code = status.as_u16(),
                "JWKS fetch failed; unexpected response status",
            );
            return Err(KeySetError::UnexpectedStatus(status));
        }

        let etag = response.headers().get(header::ETAG).cloned();
        let last_modified = response.headers().get(header::LAST_MODIFIED).cloned();

        let body = response.bytes().await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS fetch failed; unable to read body");
            KeySetError::from(err)
        })?;

        let jwks: Jwks = serde_json::from_slice(&body).map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS fetch failed; body is not a key set");
            KeySetError::Malformed(err)
        })?;
        let jwks = Arc::new(jwks);

        self.inner.cache.store(Some(Arc::new(CachedKeys {
            jwks: Arc::clone(&jwks),
            fetched_at: Instant::now(),
            etag,
            last_modified,
        })));

        tracing::info!(jwks.keys = jwks.keys().len(), "JWKS refreshed");

        Ok(jwks)
    }
}
