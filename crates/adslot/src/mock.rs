//! Test doubles for the host platform
//!
//! [`MockSurface`] stands in for the web view: it records every call the
//! slot makes and lets a test play the platform's part (navigation
//! requests, finished loads, bridge messages) deterministically.
//! [`RecordingOpener`] stands in for the system browser.
//!
//! ```rust,ignore
//! let slot = AdSlotBuilder::new(unit, ledger, opener).build(MockSurface::new())?;
//! slot.run_startup().await;
//! slot.surface().post_message("SwiftAdsMessageHandler", json!("data-callback"));
//! assert!(slot.surface().was_called("load:"));
//! ```

use crate::config::SurfaceConfig;
use crate::opener::ExternalOpener;
use crate::result::{AdSlotError, AdSlotResult};
use crate::surface::{
    ContentSurface, Cookie, MessageObserver, NavigationAction, NavigationObserver,
    NavigationPolicy, PresentationHost, UserScript,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use url::Url;

#[derive(Debug, Default)]
struct MockSurfaceState {
    call_history: Vec<String>,
    config: Option<SurfaceConfig>,
    scripts: Vec<UserScript>,
    cookie_writes: Vec<Cookie>,
    jar: Vec<Cookie>,
    frame_probe_result: Option<serde_json::Value>,
    fail_cookie_reads: bool,
    loaded_urls: Vec<String>,
    current_url: String,
    torn_down: bool,
    navigation: Option<Weak<dyn NavigationObserver>>,
    messages: Vec<(String, Weak<dyn MessageObserver>)>,
    presentation: Option<Weak<dyn PresentationHost>>,
}

/// Mock content surface for unit testing
#[derive(Debug, Default)]
pub struct MockSurface {
    state: Mutex<MockSurfaceState>,
}

impl MockSurface {
    /// Create new mock surface
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockSurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the cookie jar contents
    pub fn set_cookie_jar(&self, cookies: Vec<Cookie>) {
        self.lock().jar = cookies;
    }

    /// Set the value returned by [`ContentSurface::evaluate`]
    pub fn set_frame_probe_result(&self, value: serde_json::Value) {
        self.lock().frame_probe_result = Some(value);
    }

    /// Make cookie reads fail
    pub fn fail_cookie_reads(&self, fail: bool) {
        self.lock().fail_cookie_reads = fail;
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().call_history.clone()
    }

    /// Check if a call starting with `method` was made
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.lock().call_history.iter().any(|c| c.starts_with(method))
    }

    /// Scripts injected so far
    #[must_use]
    pub fn injected_scripts(&self) -> Vec<UserScript> {
        self.lock().scripts.clone()
    }

    /// Cookies written by the slot
    #[must_use]
    pub fn cookie_writes(&self) -> Vec<Cookie> {
        self.lock().cookie_writes.clone()
    }

    /// URLs passed to `load`
    #[must_use]
    pub fn loaded_urls(&self) -> Vec<String> {
        self.lock().loaded_urls.clone()
    }

    /// URL currently shown; `about:blank` after teardown
    #[must_use]
    pub fn current_url(&self) -> String {
        self.lock().current_url.clone()
    }

    /// Last applied surface configuration
    #[must_use]
    pub fn applied_config(&self) -> Option<SurfaceConfig> {
        self.lock().config.clone()
    }

    /// Whether teardown ran
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.lock().torn_down
    }

    /// Whether a live navigation observer is registered
    #[must_use]
    pub fn has_navigation_observer(&self) -> bool {
        self.navigation_observer().is_some()
    }

    fn navigation_observer(&self) -> Option<Arc<dyn NavigationObserver>> {
        self.lock().navigation.as_ref().and_then(Weak::upgrade)
    }

    /// Ask the observer about a navigation, as the platform would
    ///
    /// `None` when no observer is attached.
    pub fn request_navigation(&self, action: &NavigationAction) -> Option<NavigationPolicy> {
        let observer = self.navigation_observer()?;
        let policy = observer.decide_policy(action);
        if policy == NavigationPolicy::Allow {
            self.lock().current_url.clone_from(&action.url);
        }
        Some(policy)
    }

    /// Signal that the main frame finished loading
    pub async fn finish_navigation(&self) {
        if let Some(observer) = self.navigation_observer() {
            observer.did_finish_navigation().await;
        }
    }

    /// Signal that the main frame failed to load
    pub fn fail_navigation(&self, message: &str) {
        let url = self.current_url();
        if let Some(observer) = self.navigation_observer() {
            observer.did_fail_navigation(&url, message);
        }
    }

    /// Deliver a bridge message to the observers of `channel`
    pub fn post_message(&self, channel: &str, body: serde_json::Value) {
        let observers: Vec<Arc<dyn MessageObserver>> = self
            .lock()
            .messages
            .iter()
            .filter(|(name, _)| name == channel)
            .filter_map(|(_, observer)| observer.upgrade())
            .collect();
        for observer in observers {
            observer.did_receive_message(channel, &body);
        }
    }

    /// Content asked for a new window
    pub fn request_new_window(&self, action: &NavigationAction) {
        let host = self.lock().presentation.as_ref().and_then(Weak::upgrade);
        if let Some(host) = host {
            host.did_request_new_window(action);
        }
    }
}

#[async_trait]
impl ContentSurface for MockSurface {
    async fn apply_config(&self, config: &SurfaceConfig) -> AdSlotResult<()> {
        let mut state = self.lock();
        state.call_history.push("apply_config".to_string());
        state.config = Some(config.clone());
        Ok(())
    }

    async fn load(&self, url: &Url) -> AdSlotResult<()> {
        let mut state = self.lock();
        if state.torn_down {
            return Err(AdSlotError::surface("surface already torn down"));
        }
        state.call_history.push(format!("load:{url}"));
        state.loaded_urls.push(url.to_string());
        state.current_url = url.to_string();
        Ok(())
    }

    async fn inject_script(&self, script: UserScript) -> AdSlotResult<()> {
        let mut state = self.lock();
        let index = state.scripts.len();
        state.call_history.push(format!("inject_script:{index}"));
        state.scripts.push(script);
        Ok(())
    }

    fn set_navigation_observer(&self, observer: Weak<dyn NavigationObserver>) {
        let mut state = self.lock();
        state.call_history.push("set_navigation_observer".to_string());
        state.navigation = Some(observer);
    }

    fn add_message_observer(&self, channel: &str, observer: Weak<dyn MessageObserver>) {
        let mut state = self.lock();
        state
            .call_history
            .push(format!("add_message_observer:{channel}"));
        state.messages.push((channel.to_string(), observer));
    }

    fn set_presentation_host(&self, host: Weak<dyn PresentationHost>) {
        let mut state = self.lock();
        state.call_history.push("set_presentation_host".to_string());
        state.presentation = Some(host);
    }

    fn detach_observers(&self) {
        let mut state = self.lock();
        state.call_history.push("detach_observers".to_string());
        state.navigation = None;
        state.messages.clear();
        state.presentation = None;
    }

    async fn evaluate(&self, script: &str) -> AdSlotResult<serde_json::Value> {
        let mut state = self.lock();
        state.call_history.push(format!("evaluate:{script}"));
        state
            .frame_probe_result
            .clone()
            .ok_or_else(|| AdSlotError::surface("No mock evaluation result set"))
    }

    async fn read_cookies(&self) -> AdSlotResult<Vec<Cookie>> {
        let mut state = self.lock();
        state.call_history.push("read_cookies".to_string());
        if state.fail_cookie_reads {
            return Err(AdSlotError::surface("cookie store unavailable"));
        }
        Ok(state.jar.clone())
    }

    async fn write_cookie(&self, cookie: Cookie) -> AdSlotResult<()> {
        let mut state = self.lock();
        state
            .call_history
            .push(format!("write_cookie:{}", cookie.name));
        state.jar.retain(|c| c.name != cookie.name);
        state.jar.push(cookie.clone());
        state.cookie_writes.push(cookie);
        Ok(())
    }

    async fn teardown(&self) -> AdSlotResult<()> {
        let mut state = self.lock();
        state.call_history.push("teardown".to_string());
        state.torn_down = true;
        state.current_url = "about:blank".to_string();
        Ok(())
    }
}

/// External opener recording every URL it is asked to open
#[derive(Debug, Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<Url>>,
    refused_schemes: Mutex<Vec<String>>,
}

impl RecordingOpener {
    /// Create an opener that accepts every URL
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report URLs with this scheme as not openable
    pub fn refuse_scheme(&self, scheme: &str) {
        self.refused_schemes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(scheme.to_string());
    }

    /// URLs opened so far, in order
    #[must_use]
    pub fn opened(&self) -> Vec<Url> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ExternalOpener for RecordingOpener {
    fn can_open(&self, url: &Url) -> bool {
        !self
            .refused_schemes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|s| s == url.scheme())
    }

    fn open(&self, url: &Url) -> AdSlotResult<()> {
        if !self.can_open(url) {
            return Err(AdSlotError::ExternalOpen {
                url: url.to_string(),
                message: "no handler for scheme".to_string(),
            });
        }
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod mock_surface_tests {
        use super::*;

        #[test]
        fn test_mock_surface_creation() {
            let surface = MockSurface::new();
            assert!(surface.history().is_empty());
            assert!(surface.loaded_urls().is_empty());
            assert!(!surface.is_torn_down());
            assert!(!surface.has_navigation_observer());
        }

        #[test]
        fn test_request_navigation_without_observer() {
            let surface = MockSurface::new();
            assert_eq!(
                surface.request_navigation(&NavigationAction::new("https://a.test")),
                None
            );
        }

        #[tokio::test]
        async fn test_write_cookie_upserts_jar() {
            let surface = MockSurface::new();
            surface.set_cookie_jar(vec![Cookie::new("a", "1")]);
            surface.write_cookie(Cookie::new("a", "2")).await.unwrap();
            let jar = surface.read_cookies().await.unwrap();
            assert_eq!(jar, vec![Cookie::new("a", "2")]);
            assert!(surface.was_called("write_cookie:a"));
        }

        #[tokio::test]
        async fn test_teardown_blanks_and_blocks_load() {
            let surface = MockSurface::new();
            surface.teardown().await.unwrap();
            assert_eq!(surface.current_url(), "about:blank");
            let url = Url::parse("https://a.test").unwrap();
            assert!(surface.load(&url).await.is_err());
        }

        #[tokio::test]
        async fn test_evaluate_without_result_fails() {
            let surface = MockSurface::new();
            assert!(surface.evaluate("1").await.is_err());
            surface.set_frame_probe_result(serde_json::json!(false));
            assert_eq!(
                surface.evaluate("1").await.unwrap(),
                serde_json::json!(false)
            );
        }
    }

    mod recording_opener_tests {
        use super::*;

        #[test]
        fn test_records_in_order() {
            let opener = RecordingOpener::new();
            let a = Url::parse("https://a.test").unwrap();
            let b = Url::parse("https://b.test").unwrap();
            opener.open(&a).unwrap();
            opener.open(&b).unwrap();
            assert_eq!(opener.opened(), vec![a, b]);
        }

        #[test]
        fn test_refused_scheme() {
            let opener = RecordingOpener::new();
            opener.refuse_scheme("tel");
            let url = Url::parse("tel:123").unwrap();
            assert!(!opener.can_open(&url));
            assert!(opener.open(&url).is_err());
            assert!(opener.opened().is_empty());
        }
    }
}
