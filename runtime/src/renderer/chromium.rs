//! Chromium-based renderer using chromiumoxide.

use super::{HostEvent, NavigationResult, RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventLoadEventFired,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::page::Page;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path from config / CLI
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!("configured Chromium path {} does not exist", path.display());
    }

    // 2. BLOBTAP_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("BLOBTAP_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.blobtap/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".blobtap/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".blobtap/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![
                home.join(".blobtap/chromium/chrome-linux64/chrome"),
                home.join(".blobtap/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// How to launch the browser.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    active_count: Arc<AtomicUsize>,
    disconnected: Arc<Notify>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let chrome_path = find_chromium(options.chromium_path.as_deref()).context(
            "Chromium not found. Install Chrome/Chromium or set BLOBTAP_CHROMIUM_PATH.",
        )?;
        debug!("using Chromium at {}", chrome_path.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            // Audio graphs must run without a user gesture.
            .arg("--autoplay-policy=no-user-gesture-required");
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let disconnected = Arc::new(Notify::new());
        let notify = Arc::clone(&disconnected);
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler: {e}");
                }
            }
            warn!("browser connection closed");
            notify.notify_one();
        });

        Ok(Self {
            browser: Mutex::new(browser),
            active_count: Arc::new(AtomicUsize::new(0)),
            disconnected,
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Arc<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Arc::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close browser")?;
        let _ = browser.wait().await;
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    fn disconnected(&self) -> Arc<Notify> {
        Arc::clone(&self.disconnected)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn add_init_script(&self, script: &str) -> Result<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .context("failed to register init script")?;
        Ok(())
    }

    async fn expose_binding(&self, name: &str) -> Result<()> {
        self.page
            .execute(AddBindingParams::new(name))
            .await
            .with_context(|| format!("failed to expose binding {name}"))?;
        Ok(())
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn events(&self) -> Result<BoxStream<'static, HostEvent>> {
        self.page
            .execute(NetworkEnableParams::default())
            .await
            .context("failed to enable network events")?;

        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to listen for requests")?
            .map(|e| HostEvent::Request(e.request.url.clone()));
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to listen for responses")?
            .map(|e| HostEvent::Response(e.response.url.clone()));
        let bindings = self
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .context("failed to listen for binding calls")?
            .map(|e| HostEvent::Binding {
                name: e.name.clone(),
                payload: e.payload.clone(),
            });
        let loads = self
            .page
            .event_listener::<EventLoadEventFired>()
            .await
            .context("failed to listen for load events")?
            .map(|_| HostEvent::LoadCompleted);

        Ok(futures::stream::select_all(vec![
            requests.boxed(),
            responses.boxed(),
            bindings.boxed(),
            loads.boxed(),
        ])
        .boxed())
    }

    async fn close(&self) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.clone().close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_binding_round_trip() {
        let renderer = ChromiumRenderer::launch(&LaunchOptions {
            chromium_path: None,
            headless: true,
        })
        .await
        .expect("failed to launch renderer");
        let ctx = renderer.new_context().await.expect("failed to create context");

        ctx.expose_binding("__ping").await.expect("binding failed");
        let mut events = ctx.events().await.expect("events failed");
        ctx.navigate("data:text/html,<h1>Hello</h1>", 10000)
            .await
            .expect("navigation failed");
        ctx.execute_js("window.__ping('ping'); 1")
            .await
            .expect("JS execution failed");

        let mut saw_binding = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_secs(5), events.next()).await
        {
            if let HostEvent::Binding { name, payload } = event {
                assert_eq!(name, "__ping");
                assert_eq!(payload, "ping");
                saw_binding = true;
                break;
            }
        }
        assert!(saw_binding);

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.expect("shutdown failed");
    }
}
