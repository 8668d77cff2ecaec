use headless_chrome::browser::default_executable;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::CrawlerConfig;
use crate::error::FetchError;

/// Interval between DOM snapshots while waiting for a page to settle.
const SETTLE_POLL: Duration = Duration::from_millis(500);

/// Renders JavaScript-heavy pages in a headless Chrome.
///
/// Every fetch launches its own browser in a fresh incognito context and
/// tears it down when the fetch ends, whatever the outcome. A semaphore caps
/// how many of these run at once.
pub struct BrowserFetcher {
    permits: Arc<Semaphore>,
    timeout: Duration,
    user_agent: String,
}

impl BrowserFetcher {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.browser_pool.max(1))),
            timeout: config.browser_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| browser_error(url, e))?;

        let owned_url = url.to_string();
        let timeout = self.timeout;
        let user_agent = self.user_agent.clone();

        // The permit travels with the blocking task so it is only released
        // once the browser process is actually gone.
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            render_page(&owned_url, timeout, &user_agent)
        });

        match tokio::time::timeout(timeout + Duration::from_secs(5), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(browser_error(url, join_err)),
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }
}

fn render_page(url: &str, timeout: Duration, user_agent: &str) -> Result<String, FetchError> {
    let launch_options = LaunchOptions {
        headless: true,
        sandbox: true,
        path: default_executable().ok(),
        idle_browser_timeout: timeout,
        ..Default::default()
    };

    let browser = Browser::new(launch_options).map_err(|e| browser_error(url, e))?;
    let context = browser.new_context().map_err(|e| browser_error(url, e))?;
    let tab = context.new_tab().map_err(|e| browser_error(url, e))?;
    tab.set_default_timeout(timeout);

    if let Err(e) = tab.set_user_agent(user_agent, None, None) {
        debug!("Could not override user agent: {}", e);
    }

    let deadline = Instant::now() + timeout;
    let result = tab
        .navigate_to(url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(|e| navigation_error(url, timeout, e))
        .and_then(|_| wait_for_settled_dom(&tab, deadline).map_err(|e| browser_error(url, e)));

    if let Err(e) = tab.close(true) {
        debug!("Tab close failed for {}: {}", url, e);
    }
    // `browser` drops here and takes the Chrome process with it.
    result
}

/// Poll the rendered DOM until two consecutive snapshots agree, as a stand-in
/// for network idle. Returns the last snapshot when the deadline passes.
fn wait_for_settled_dom(tab: &Arc<Tab>, deadline: Instant) -> anyhow::Result<String> {
    let mut previous = tab.get_content()?;
    loop {
        if Instant::now() + SETTLE_POLL >= deadline {
            warn!("Page did not settle before the deadline; using current DOM");
            return Ok(previous);
        }
        thread::sleep(SETTLE_POLL);
        let current = tab.get_content()?;
        if current == previous {
            return Ok(current);
        }
        previous = current;
    }
}

fn navigation_error(url: &str, timeout: Duration, err: anyhow::Error) -> FetchError {
    if err.to_string().to_lowercase().contains("timeout") {
        FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        browser_error(url, err)
    }
}

fn browser_error(url: &str, err: impl std::fmt::Display) -> FetchError {
    FetchError::Browser {
        url: url.to_string(),
        reason: err.to_string(),
    }
}
