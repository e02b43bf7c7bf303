//! RPC Client Module - JSON-RPC chain reader
//!
//! 1. Ordered endpoint list, rotated on failure
//! 2. Exponential backoff with ±20% jitter per endpoint
//! 3. User-Agent header and gzip responses
//! 4. Every call passes through the shared `RpcQueue`
//!
//! Only read-only calls are issued (`eth_getCode`, `eth_call`), so every
//! request is safe to retry.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::RpcSettings;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::providers::ports::ChainReader;
use crate::providers::queue::RpcQueue;
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;
use crate::utils::decoder::{parse_hex_bytes, PairDecoder};

// ============================================
// RETRY CONSTANTS
// ============================================

/// Base retry delay in milliseconds
pub const BASE_RETRY_MS: u64 = 250;

/// Maximum retry delay in milliseconds
pub const MAX_RETRY_MS: u64 = 4_000;

/// Attempts per endpoint before rotating to the next one
pub const MAX_ATTEMPTS_PER_ENDPOINT: u32 = 3;

/// Jitter percentage for retry delay
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Backoff before retry `attempt` (1-based), jittered ±20%
pub fn backoff_delay_ms(attempt: u32) -> u64 {
    let base_delay = BASE_RETRY_MS.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
    let capped_delay = base_delay.min(MAX_RETRY_MS);

    let jitter_range = (capped_delay * RETRY_JITTER_PERCENT) / 100;
    let jitter: i64 =
        rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64));
    (capped_delay as i64 + jitter).max(50) as u64
}

/// JSON-RPC chain reader with endpoint rotation
#[derive(Clone)]
pub struct RpcProvider {
    /// Endpoints in preference order
    urls: Arc<Vec<String>>,
    /// Index of the endpoint that answered last
    current: Arc<AtomicUsize>,
    /// HTTP client with custom headers (gzip enabled)
    client: reqwest::Client,
    queue: RpcQueue,
}

impl RpcProvider {
    /// Build a provider from settings, with its own request queue
    pub fn new(settings: &RpcSettings) -> AppResult<Self> {
        let queue = RpcQueue::new(settings.max_concurrent, settings.min_interval);
        Self::with_queue(settings, queue)
    }

    /// Build a provider that shares an existing request queue
    pub fn with_queue(settings: &RpcSettings, queue: RpcQueue) -> AppResult<Self> {
        settings.validate()?;
        let client = Self::build_client(settings.timeout)?;

        info!(
            "🔌 RPC provider ready: {} endpoint(s), primary {}",
            settings.urls.len(),
            mask_url(&settings.urls[0])
        );

        Ok(Self {
            urls: Arc::new(settings.urls.clone()),
            current: Arc::new(AtomicUsize::new(0)),
            client,
            queue,
        })
    }

    fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorCode::RpcConnectionFailed, "Failed to build HTTP client", e)
            })
    }

    /// Execute a JSON-RPC call, rotating endpoints on failure
    pub async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let n = self.urls.len();
        let start = self.current.load(Ordering::Relaxed) % n;
        let mut last_error = None;

        for offset in 0..n {
            let idx = (start + offset) % n;
            let url = &self.urls[idx];
            match self.call_with_retry(url, &payload).await {
                Ok(result) => {
                    if idx != start {
                        info!("🔄 RPC rotated to endpoint #{} ({})", idx, mask_url(url));
                    }
                    self.current.store(idx, Ordering::Relaxed);
                    return Ok(result);
                }
                Err(e) => {
                    warn!("⚠️ RPC endpoint #{} failed for {}: {}", idx, method, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| eyre!("All RPC endpoints failed for {}", method)))
    }

    async fn call_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS_PER_ENDPOINT {
            if attempt > 0 {
                let delay = backoff_delay_ms(attempt);
                debug!(
                    "⏳ Retry {}/{} after {}ms",
                    attempt + 1,
                    MAX_ATTEMPTS_PER_ENDPOINT,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.queue.run(self.execute_call::<T>(url, payload)).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.code == ErrorCode::RpcRateLimited {
                        warn!(
                            "⏳ Rate limited, backing off (attempt {}/{})",
                            attempt + 1,
                            MAX_ATTEMPTS_PER_ENDPOINT
                        );
                    }
                    let retryable = e.code.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        // same request, same answer: move on to the next endpoint
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => eyre::Report::new(e),
            None => eyre!("Unknown error after {} attempts", MAX_ATTEMPTS_PER_ENDPOINT),
        })
    }

    async fn execute_call<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> AppResult<T> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        if status == 429 {
            return Err(AppError::new(ErrorCode::RpcRateLimited, "Rate limited (HTTP 429)"));
        }
        if !status.is_success() {
            return Err(AppError::new(
                ErrorCode::RpcConnectionFailed,
                format!("HTTP error: {}", status),
            ));
        }

        let json: RpcResponse<T> = response.json().await?;
        if let Some(error) = json.error {
            return Err(error.into_app_error());
        }

        json.result
            .ok_or_else(|| AppError::new(ErrorCode::RpcInvalidResponse, "No result in response"))
    }

    /// eth_call against latest state, returning raw return data
    pub async fn eth_call(&self, to: Address, data: &Bytes) -> Result<Bytes> {
        let params = serde_json::json!([{ "to": to, "data": data }, "latest"]);
        let raw: String = self.call("eth_call", params).await?;
        parse_hex_bytes(&raw)
    }

}

#[async_trait]
impl ChainReader for RpcProvider {
    async fn get_code(&self, address: Address) -> Result<Bytes> {
        let params = serde_json::json!([address, "latest"]);
        let raw: String = self.call("eth_getCode", params).await?;
        parse_hex_bytes(&raw)
    }

    async fn pair_tokens(&self, pair: Address) -> Result<(Address, Address)> {
        let (c0, c1) = (PairDecoder::token0_calldata(), PairDecoder::token1_calldata());
        let (t0, t1) = tokio::join!(self.eth_call(pair, &c0), self.eth_call(pair, &c1));
        Ok((PairDecoder::decode_token0(&t0?)?, PairDecoder::decode_token1(&t1?)?))
    }

    async fn get_reserves(&self, pair: Address) -> Result<(U256, U256)> {
        let data = self.eth_call(pair, &PairDecoder::get_reserves_calldata()).await?;
        PairDecoder::decode_reserves(&data)
    }
}

/// Hide API keys embedded in RPC URLs
pub fn mask_url(url: &str) -> String {
    if let Some((base, _)) = url.split_once("/v2/") {
        return format!("{}/v2/***HIDDEN***", base);
    }
    url.to_string()
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// HTTP 429 equivalent (code -32005)
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.message.to_lowercase().contains("rate limit")
    }

    fn into_app_error(self) -> AppError {
        let code = if self.is_rate_limit() {
            ErrorCode::RpcRateLimited
        } else {
            ErrorCode::RpcError
        };
        AppError::new(code, format!("RPC error: {} (code: {})", self.message, self.code))
    }
}
