//! HTTP bridge to the relayer SDK.
//!
//! The bridge exposes the SDK's client API as JSON endpoints under a base
//! URL (`/manifest`, `/init`, `/instances`, `/instances/{id}/...`).  Binary
//! values (handles, proofs) travel as `0x`-prefixed hex.

use alloy_primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{Ciphertexts, FheInstance, FheSdk, Keypair, NetworkConfig, PlainValue, SdkError};

/// Body of `GET {base}/manifest`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: Option<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    pub network_template: Option<NetworkConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceCreated {
    instance_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptResponse {
    handles: Vec<String>,
    input_proof: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Eip712Request<'a> {
    public_key: &'a str,
    contracts: &'a [Address],
    start_timestamp: String,
    duration_days: String,
}

#[derive(Serialize)]
struct EncryptRequest<'a> {
    contract: Address,
    user: Address,
    values: &'a [PlainValue],
}

/// Fetch the manifest of a bridge.
pub async fn fetch_manifest(client: &Client, base: &str) -> Result<Manifest, SdkError> {
    get_json(client, &format!("{base}/manifest")).await
}

pub struct HttpBridgeSdk {
    client: Client,
    base: String,
}

impl HttpBridgeSdk {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }
}

#[async_trait]
impl FheSdk for HttpBridgeSdk {
    async fn initialize(&self) -> Result<(), SdkError> {
        let _: Value = post_json(&self.client, &format!("{}/init", self.base), &json!({})).await?;
        debug!("SDK initialized at {}", self.base);
        Ok(())
    }

    async fn create_instance(
        &self,
        config: &NetworkConfig,
    ) -> Result<Box<dyn FheInstance>, SdkError> {
        let created: InstanceCreated =
            post_json(&self.client, &format!("{}/instances", self.base), config).await?;
        Ok(Box::new(HttpBridgeInstance {
            client: self.client.clone(),
            base: format!("{}/instances/{}", self.base, created.instance_id),
        }))
    }
}

pub struct HttpBridgeInstance {
    client: Client,
    base: String,
}

#[async_trait]
impl FheInstance for HttpBridgeInstance {
    async fn generate_keypair(&self) -> Result<Keypair, SdkError> {
        post_json(&self.client, &format!("{}/keypair", self.base), &json!({})).await
    }

    async fn create_eip712(
        &self,
        public_key: &str,
        contracts: &[Address],
        start_timestamp: i64,
        duration_days: u32,
    ) -> Result<Value, SdkError> {
        // The SDK takes both numbers as decimal strings.
        let body = Eip712Request {
            public_key,
            contracts,
            start_timestamp: start_timestamp.to_string(),
            duration_days: duration_days.to_string(),
        };
        post_json(&self.client, &format!("{}/eip712", self.base), &body).await
    }

    async fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[PlainValue],
    ) -> Result<Ciphertexts, SdkError> {
        let body = EncryptRequest {
            contract,
            user,
            values,
        };
        let resp: EncryptResponse =
            post_json(&self.client, &format!("{}/encrypt", self.base), &body).await?;
        let handles = resp
            .handles
            .iter()
            .map(|h| decode_hex(h))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Ciphertexts {
            handles,
            input_proof: decode_hex(&resp.input_proof)?,
        })
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, SdkError> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| SdkError::Call(format!("bad hex from SDK: {e}")))
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, SdkError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| SdkError::Unreachable(format!("{url}: {e}")))?;
    read_body(url, resp).await
}

async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    body: &B,
) -> Result<T, SdkError> {
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| SdkError::Unreachable(format!("{url}: {e}")))?;
    read_body(url, resp).await
}

async fn read_body<T: DeserializeOwned>(url: &str, resp: reqwest::Response) -> Result<T, SdkError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(SdkError::Call(format!("{url} returned {status}: {text}")));
    }
    resp.json()
        .await
        .map_err(|e| SdkError::Call(format!("{url}: invalid body: {e}")))
}
