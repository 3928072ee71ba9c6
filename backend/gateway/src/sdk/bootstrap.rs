//! One-time, concurrency-safe SDK loading.
//!
//! ```text
//! NotLoaded ──► Loading ──► Loaded
//!     ▲            │
//!     └── Failed ◄─┘
//! ```
//!
//! `Loading` is a single shared future: callers arriving while it runs await
//! the same result instead of starting another load.  Strategies are tried
//! in order under one global timeout.  A failure is delivered to every
//! waiter of that attempt and returns the state to `NotLoaded`, so a later
//! request may try again; `Loaded` is permanent.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::loader::SdkLoader;
use super::{SdkError, SdkHandle};
use crate::errors::DonationError;

type LoadResult = std::result::Result<SdkHandle, DonationError>;
type InFlight = Shared<BoxFuture<'static, LoadResult>>;

pub struct SdkBootstrap {
    loaders: Arc<Vec<Arc<dyn SdkLoader>>>,
    timeout: Duration,
    ready: Arc<OnceLock<SdkHandle>>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
}

impl SdkBootstrap {
    pub fn new(loaders: Vec<Arc<dyn SdkLoader>>, timeout: Duration) -> Self {
        Self {
            loaders: Arc::new(loaders),
            timeout,
            ready: Arc::new(OnceLock::new()),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }

    /// The loaded handle, without waiting.
    pub fn handle(&self) -> Option<SdkHandle> {
        self.ready.get().cloned()
    }

    /// Load the SDK if needed and return its handle.
    pub async fn ensure_loaded(&self) -> LoadResult {
        if let Some(handle) = self.ready.get() {
            return Ok(handle.clone());
        }

        let load = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(handle) = self.ready.get() {
                return Ok(handle.clone());
            }
            match in_flight.as_ref() {
                Some(load) => load.clone(),
                None => {
                    let load = self.start_load();
                    *in_flight = Some(load.clone());
                    load
                }
            }
        };

        load.await
    }

    fn start_load(&self) -> InFlight {
        let loaders = Arc::clone(&self.loaders);
        let timeout = self.timeout;
        let ready = Arc::clone(&self.ready);
        let in_flight = Arc::clone(&self.in_flight);

        async move {
            info!("Loading encryption SDK ({} strategies)", loaders.len());
            let result = match tokio::time::timeout(timeout, run_strategies(&loaders)).await {
                Ok(result) => result,
                Err(_) => Err(DonationError::SdkUnavailable(format!(
                    "SDK load timed out after {}s",
                    timeout.as_secs_f64()
                ))),
            };

            if let Ok(handle) = &result {
                let _ = ready.set(handle.clone());
                info!(
                    "Encryption SDK ready (source: {}, version: {})",
                    handle.source(),
                    handle.version().unwrap_or("unknown")
                );
            }
            // `ready` is set before the slot is cleared, so no caller can
            // observe neither.
            *in_flight.lock().await = None;
            result
        }
        .boxed()
        .shared()
    }
}

async fn run_strategies(loaders: &[Arc<dyn SdkLoader>]) -> LoadResult {
    let mut failures = Vec::new();

    for loader in loaders {
        match try_strategy(loader.as_ref()).await {
            Ok(handle) => return Ok(handle),
            Err(e) => {
                warn!("SDK strategy '{}' failed: {e}", loader.name());
                failures.push(format!("{}: {e}", loader.name()));
            }
        }
    }

    if failures.is_empty() {
        failures.push("no loader strategies configured".to_string());
    }
    Err(DonationError::SdkUnavailable(failures.join("; ")))
}

async fn try_strategy(loader: &dyn SdkLoader) -> std::result::Result<SdkHandle, SdkError> {
    let module = loader.load().await?;
    let handle = SdkHandle::from_module(module)?;
    handle.sdk().initialize().await?;
    Ok(handle)
}
