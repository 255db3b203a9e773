// =============================================================================
// JSON transport: the single seam between providers and the network
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// Performs one GET and returns the decoded JSON body.
///
/// Implementations must fail on non-2xx statuses and undecodable bodies.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<serde_json::Value>;
}

/// `reqwest`-backed transport.
///
/// Query strings carry provider API keys, so errors never include the
/// request URL; only the base URL appears in error context.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonTransport for HttpTransport {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("GET {url} request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {} returned {}: {}", url, status, body);
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("failed to parse response from {url}"))?;

        debug!(url, "upstream response decoded");
        Ok(body)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

// =============================================================================
// Scripted transport for tests
// =============================================================================

#[cfg(test)]
pub mod testing {
    use std::collections::{HashMap, VecDeque};

    use parking_lot::Mutex;

    use super::*;

    /// Replays canned replies per route. A route is the `function` query
    /// parameter when present, otherwise the last URL path segment. The last
    /// queued reply of a route repeats forever.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, String>>>>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ok(self, route: &str, body: serde_json::Value) -> Self {
            self.push(route, Ok(body))
        }

        pub fn fail(self, route: &str, reason: &str) -> Self {
            self.push(route, Err(reason.to_string()))
        }

        fn push(self, route: &str, reply: Result<serde_json::Value, String>) -> Self {
            self.replies
                .lock()
                .entry(route.to_string())
                .or_default()
                .push_back(reply);
            self
        }

        pub fn calls(&self, route: &str) -> u32 {
            self.calls.lock().get(route).copied().unwrap_or(0)
        }

        fn route_of(url: &str, query: &[(String, String)]) -> String {
            query
                .iter()
                .find(|(k, _)| k == "function")
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| url.rsplit('/').next().unwrap_or(url).to_string())
        }
    }

    #[async_trait]
    impl JsonTransport for ScriptedTransport {
        async fn get_json(
            &self,
            url: &str,
            query: &[(String, String)],
        ) -> Result<serde_json::Value> {
            let route = Self::route_of(url, query);
            *self.calls.lock().entry(route.clone()).or_default() += 1;

            let reply = {
                let mut replies = self.replies.lock();
                let queue = replies
                    .get_mut(&route)
                    .with_context(|| format!("no scripted reply for {route}"))?;
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            };

            match reply {
                Some(Ok(body)) => Ok(body),
                Some(Err(reason)) => Err(anyhow::anyhow!(reason)),
                None => anyhow::bail!("no scripted reply for {route}"),
            }
        }
    }
}
