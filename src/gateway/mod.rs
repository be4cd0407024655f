//! Model Gateway
//!
//! Single entry point for "send this prompt to the configured model and give
//! me text back". One call walks:
//!
//! 1. Log the prompt on the call log
//! 2. Cache lookup (when enabled); a fresh hit returns without network I/O
//! 3. Resolve the active provider, its model, endpoint and API key
//! 4. Build the provider-specific request and POST it
//! 5. Parse the response into text or a routine error
//! 6. Store the outcome (text or rendered error) and prune expired entries;
//!    failures from step 3 never reached a provider and are not stored
//! 7. Log the response
//!
//! Two surfaces over the same state machine:
//! - [`ModelGateway::complete`] returns typed results; routine failures are
//!   [`TutorError::Llm`]
//! - [`ModelGateway::call_model`] renders routine failures as `"Error: ..."`
//!   strings and only raises configuration errors
//!
//! Cache I/O problems are logged and otherwise ignored: a cache that cannot
//! be read or written never fails a call.

pub mod cache;
pub mod call_log;
pub mod provider;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

pub use cache::{CacheEntry, CacheStats, JsonFileCache, ResponseCache, SharedCache, SqliteCache};
pub use provider::{ProviderKind, ProviderRegistry, ProviderSpec};

use crate::config::{Config, EnvLookup, LlmConfig, ProcessEnv};
use crate::types::{ErrorClassifier, Result, TutorError};

/// Prompt → text gateway over the configured providers
pub struct ModelGateway {
    registry: RwLock<Arc<ProviderRegistry>>,
    cache: Option<SharedCache>,
    env: Arc<dyn EnvLookup>,
    client: reqwest::Client,
}

impl ModelGateway {
    /// Gateway for `config`, reading API keys from the process environment
    pub fn new(config: &Config) -> Result<Self> {
        let cache = if config.cache.enabled {
            Some(cache::open_cache(&config.cache)?)
        } else {
            None
        };
        Self::with_parts(&config.llm, cache, Arc::new(ProcessEnv))
    }

    /// Gateway with an explicit cache and environment source
    pub fn with_parts(
        llm: &LlmConfig,
        cache: Option<SharedCache>,
        env: Arc<dyn EnvLookup>,
    ) -> Result<Self> {
        let registry = ProviderRegistry::from_config(llm)?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = llm.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| TutorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            registry: RwLock::new(Arc::new(registry)),
            cache,
            env,
            client,
        })
    }

    /// Swap in a new provider table; in-flight calls keep the old one
    pub fn reload(&self, llm: &LlmConfig) -> Result<()> {
        let registry = Arc::new(ProviderRegistry::from_config(llm)?);
        *self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner) = registry;
        info!("Provider configuration reloaded (active: {})", llm.active_provider);
        Ok(())
    }

    fn registry(&self) -> Arc<ProviderRegistry> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Name of the provider calls go to
    pub fn active_provider(&self) -> String {
        self.registry().active_name().to_string()
    }

    pub fn cache(&self) -> Option<&SharedCache> {
        self.cache.as_ref()
    }

    /// Text for `prompt`, using the cache when configured
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        self.complete_with_cache(prompt, true).await
    }

    /// Text for `prompt`; `use_cache = false` bypasses cache read and write
    pub async fn complete_with_cache(&self, prompt: &str, use_cache: bool) -> Result<String> {
        call_log::log_prompt(prompt);

        let cache = self.cache.as_ref().filter(|_| use_cache);

        if let Some(cache) = cache {
            match lookup(cache, prompt).await {
                Ok(Some(entry)) => {
                    info!("Cache hit ({} chars)", entry.response.len());
                    call_log::log_response(&entry.response);
                    return entry.into_result();
                }
                Ok(None) => debug!("Cache miss"),
                Err(e) => warn!("Cache lookup failed, calling provider: {}", e),
            }
        }

        // Resolution failures never reached a provider, so they are not cached
        let call = match self.prepare(prompt) {
            Ok(call) => call,
            Err(TutorError::Llm(err)) => {
                warn!("Model call not sent: {}", err);
                call_log::log_response(&err.render());
                return Err(TutorError::Llm(err));
            }
            Err(e) => return Err(e),
        };

        let outcome = self.send(call).await;

        let entry = match &outcome {
            Ok(text) => CacheEntry::response(text.as_str()),
            Err(TutorError::Llm(err)) => {
                warn!("Model call failed: {}", err);
                CacheEntry::error(err)
            }
            // Raised errors are neither cached nor logged as responses
            Err(_) => return outcome,
        };

        if let Some(cache) = cache {
            match store(cache, prompt, entry.clone()).await {
                Ok(pruned) if pruned > 0 => debug!("Pruned {} expired cache entries", pruned),
                Ok(_) => {}
                Err(e) => warn!("Failed to store response in cache: {}", e),
            }
        }

        call_log::log_response(&entry.response);
        outcome
    }

    /// Text for `prompt`, or `"Error: <message>"` for routine failures
    pub async fn call_model(&self, prompt: &str) -> Result<String> {
        self.call_model_with_cache(prompt, true).await
    }

    /// String surface of [`Self::complete_with_cache`]
    pub async fn call_model_with_cache(&self, prompt: &str, use_cache: bool) -> Result<String> {
        match self.complete_with_cache(prompt, use_cache).await {
            Ok(text) => Ok(text),
            Err(TutorError::Llm(err)) => Ok(err.render()),
            Err(e) => Err(e),
        }
    }

    /// Resolve the active provider and build its request without any I/O
    fn prepare(&self, prompt: &str) -> Result<PreparedCall> {
        let registry = self.registry();
        let provider = registry.active()?;

        let model = provider.resolve_model(self.env.as_ref());
        let url = provider.endpoint_url(&model)?;
        let api_key = provider.resolve_api_key(self.env.as_ref())?;

        let request =
            provider
                .kind
                .build_request(url, &model, prompt, &provider.entry.options, &api_key);

        info!(
            "Calling {} ({}, model: {})",
            provider.name, provider.kind, model
        );

        Ok(PreparedCall {
            provider: provider.name.clone(),
            kind: provider.kind,
            request,
        })
    }

    async fn send(&self, call: PreparedCall) -> Result<String> {
        let PreparedCall {
            provider,
            kind,
            request,
        } = call;

        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, &provider))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, &provider))?;

        debug!("{} responded with status {}", provider, status);
        Ok(kind.parse_response(&provider, status, &body)?)
    }
}

/// A request ready to go out to one provider
struct PreparedCall {
    provider: String,
    kind: ProviderKind,
    request: provider::PreparedRequest,
}

async fn lookup(cache: &SharedCache, prompt: &str) -> Result<Option<CacheEntry>> {
    let prompt = prompt.to_string();
    blocking(cache, move |cache| cache.get(&prompt)).await
}

async fn store(cache: &SharedCache, prompt: &str, entry: CacheEntry) -> Result<usize> {
    let prompt = prompt.to_string();
    blocking(cache, move |cache| cache.put(&prompt, entry)).await
}

/// Run a blocking cache operation off the async executor
async fn blocking<T, F>(cache: &SharedCache, f: F) -> Result<T>
where
    F: FnOnce(&dyn ResponseCache) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cache = Arc::clone(cache);
    tokio::task::spawn_blocking(move || f(cache.as_ref()))
        .await
        .map_err(|e| TutorError::Cache(format!("Cache task failed: {}", e)))?
}
