use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;

use crate::browser::BrowserFetcher;
use crate::config::CrawlerConfig;
use crate::error::FetchError;
use crate::normalize::host_of;

/// Retrieves a page's HTML, statically or through a scripted browser.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, needs_js: bool) -> Result<String, FetchError>;
}

/// Bounded retry with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        exp + Duration::from_millis(jitter)
    }

    pub fn should_retry(&self, err: &FetchError, attempt: u32) -> bool {
        attempt < self.max_attempts && err.is_transient()
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let delay = self.backoff(attempt);
                    debug!("Attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Enforces a minimum spacing between requests to the same host.
#[derive(Debug)]
pub struct HostRateLimiter {
    min_interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl HostRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for this host's next free slot and reserve the one after it.
    pub async fn acquire(&self, url: &str) {
        let Some(host) = host_of(url) else {
            return;
        };

        let wait = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(&host).copied().unwrap_or(now).max(now);
            slots.insert(host.clone(), slot + self.min_interval);
            slot - now
        };

        if !wait.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// Plain HTTP GET with a fixed user agent and timeout. Politeness spacing
/// lives in [`HostRateLimiter`], not here.
pub struct StaticFetcher {
    client: Client,
    timeout: Duration,
}

impl StaticFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Connect {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            timeout: config.timeout(),
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, self.timeout, e))?;
        Ok(body)
    }

    pub async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.fetch(url).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Production fetcher: rate limit per host, retry transient failures, then
/// dispatch to the static client or the browser pool.
pub struct HttpPageFetcher {
    static_fetcher: StaticFetcher,
    browser: BrowserFetcher,
    limiter: HostRateLimiter,
    retry: RetryPolicy,
}

impl HttpPageFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, FetchError> {
        Ok(Self {
            static_fetcher: StaticFetcher::new(config)?,
            browser: BrowserFetcher::new(config),
            limiter: HostRateLimiter::new(config.request_delay()),
            retry: RetryPolicy {
                max_attempts: config.retries.max(1),
                ..RetryPolicy::default()
            },
        })
    }

    pub fn static_fetcher(&self) -> &StaticFetcher {
        &self.static_fetcher
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, needs_js: bool) -> Result<String, FetchError> {
        self.retry
            .run(|attempt| async move {
                self.limiter.acquire(url).await;
                debug!("Fetching {} (attempt {}, js: {})", url, attempt, needs_js);
                if needs_js {
                    self.browser.fetch(url).await
                } else {
                    self.static_fetcher.fetch(url).await
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    fn status(code: u16) -> FetchError {
        FetchError::Status {
            url: "https://acme.com/careers".to_string(),
            status: code,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_up_to_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FetchError> = quick_policy()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(status(503)) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FetchError> = quick_policy()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(status(404)) }
            })
            .await;
        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failure() {
        let result = quick_policy()
            .run(|attempt| async move {
                if attempt < 2 { Err(status(429)) } else { Ok("<html></html>") }
            })
            .await;
        assert_eq!(result.unwrap(), "<html></html>");
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_same_host() {
        let limiter = HostRateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire("https://acme.com/careers").await;
        limiter.acquire("https://acme.com/vagas").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_rate_limiter_does_not_block_other_hosts() {
        let limiter = HostRateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire("https://acme.com/careers").await;
        limiter.acquire("https://globex.com/careers").await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    /// Serves `count` canned responses on a loopback port.
    async fn serve(count: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for _ in 0..count {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let body = "<html>ok</html>";
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
            }
        });
        format!("http://{}/careers", addr)
    }

    #[tokio::test]
    async fn test_static_fetch_does_not_add_its_own_delay() {
        let config = CrawlerConfig {
            request_delay_ms: 2000,
            ..CrawlerConfig::default()
        };
        let url = serve(2).await;
        let fetcher = StaticFetcher::new(&config).unwrap();

        let start = Instant::now();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<html>ok</html>");
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<html>ok</html>");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_static_fetch_example_com() {
        let fetcher = StaticFetcher::new(&CrawlerConfig::default()).unwrap();
        let html = fetcher.fetch("https://example.com").await.unwrap();
        assert!(html.contains("Example Domain"));
    }
}
