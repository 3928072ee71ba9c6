//! Strategies for locating the SDK, tried in order by the bootstrap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::bridge::{fetch_manifest, HttpBridgeSdk, Manifest};
use super::{SdkError, SdkModule};

#[async_trait]
pub trait SdkLoader: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self) -> Result<SdkModule, SdkError>;
}

/// The published bundle.  Its manifest may still be filling in right after
/// the bundle comes up, so missing entry points get one more look after
/// `settle_delay`.
pub struct BundleLoader {
    client: Client,
    base: String,
    settle_delay: Duration,
}

impl BundleLoader {
    pub fn new(client: Client, base: impl Into<String>, settle_delay: Duration) -> Self {
        Self {
            client,
            base: base.into(),
            settle_delay,
        }
    }
}

#[async_trait]
impl SdkLoader for BundleLoader {
    fn name(&self) -> &str {
        "bundle"
    }

    async fn load(&self) -> Result<SdkModule, SdkError> {
        let mut manifest = fetch_manifest(&self.client, &self.base).await?;
        let mut module = into_module(&self.client, &self.base, manifest);

        if !module.missing_exports().is_empty() {
            debug!(
                "Bundle at {} not settled yet, waiting {:?}",
                self.base, self.settle_delay
            );
            tokio::time::sleep(self.settle_delay).await;
            manifest = fetch_manifest(&self.client, &self.base).await?;
            module = into_module(&self.client, &self.base, manifest);
        }

        let missing = module.missing_exports();
        if !missing.is_empty() {
            return Err(SdkError::MissingExports(missing));
        }
        info!("SDK bundle loaded from {}", self.base);
        Ok(module)
    }
}

/// A standalone SDK module, bound directly without waiting.
pub struct ModuleLoader {
    client: Client,
    base: String,
}

impl ModuleLoader {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }
}

#[async_trait]
impl SdkLoader for ModuleLoader {
    fn name(&self) -> &str {
        "module"
    }

    async fn load(&self) -> Result<SdkModule, SdkError> {
        let manifest = fetch_manifest(&self.client, &self.base).await?;
        let module = into_module(&self.client, &self.base, manifest);
        let missing = module.missing_exports();
        if !missing.is_empty() {
            return Err(SdkError::MissingExports(missing));
        }
        info!("SDK module bound from {}", self.base);
        Ok(module)
    }
}

/// Build the ordered strategy list: the first source is loaded as a
/// bundle, every later one as a module fallback.
pub fn from_sources(
    client: &Client,
    sources: &[String],
    settle_delay: Duration,
) -> Vec<Arc<dyn SdkLoader>> {
    sources
        .iter()
        .enumerate()
        .map(|(i, base)| -> Arc<dyn SdkLoader> {
            if i == 0 {
                Arc::new(BundleLoader::new(client.clone(), base.clone(), settle_delay))
            } else {
                Arc::new(ModuleLoader::new(client.clone(), base.clone()))
            }
        })
        .collect()
}

fn into_module(client: &Client, base: &str, manifest: Manifest) -> SdkModule {
    SdkModule {
        source: base.to_string(),
        version: manifest.version,
        exports: manifest.exports,
        network_template: manifest.network_template,
        sdk: Arc::new(HttpBridgeSdk::new(client.clone(), base)),
    }
}
