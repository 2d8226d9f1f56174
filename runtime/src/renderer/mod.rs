//! Renderer abstraction for the hosted page.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). A context
//! offers exactly what the capture engine needs from its host: navigation,
//! pre-page script injection, a page-to-engine callback, script evaluation
//! against the live DOM, and a stream of network and lifecycle events.

pub mod chromium;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Something the host reported about the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The network layer is about to issue a request for this URL.
    Request(String),
    /// The network layer received a response for this URL.
    Response(String),
    /// Page-side code invoked an exposed binding.
    Binding { name: String, payload: String },
    /// The page's load event fired.
    LoadCompleted,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Arc<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
    /// Notified once when the connection to the browser is lost.
    fn disconnected(&self) -> Arc<Notify>;
}

/// A single browser context (tab).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Register a script that runs in every new document before page scripts.
    async fn add_init_script(&self, script: &str) -> Result<()>;
    /// Expose a global function `name(payload: string)` to page scripts.
    async fn expose_binding(&self, name: &str) -> Result<()>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Subscribe to network, binding, and load events.
    async fn events(&self) -> Result<BoxStream<'static, HostEvent>>;
    /// Close this context.
    async fn close(&self) -> Result<()>;
}
