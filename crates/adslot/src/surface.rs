//! ContentSurface - Abstract Embedded Web Surface
//!
//! The host platform owns the real web view. This module only describes
//! what an ad slot needs from it, plus the three observer roles the slot
//! plays back towards it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  ContentSurface (host web view)                                  │
//! │                                                                  │
//! │   load / inject_script / cookies / evaluate / teardown   ◄─── AdSlot
//! │                                                                  │
//! │   NavigationObserver  ── decide_policy, did_finish ──────► AdSlot
//! │   MessageObserver     ── did_receive_message ──────────► AdSlot
//! │   PresentationHost    ── did_request_new_window ───────► AdSlot
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Observers are registered as `Weak` references so the surface never
//! keeps its controller alive. Implementations marshal every call onto
//! whatever thread the underlying web view requires.

use crate::config::SurfaceConfig;
use crate::result::AdSlotResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Weak;
use url::Url;

/// A cookie read from or written to the surface's jar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Path
    pub path: String,
    /// Expiration timestamp (seconds since epoch)
    pub expires: Option<i64>,
    /// Secure flag
    pub secure: bool,
}

impl Cookie {
    /// Create a new cookie scoped to `/`
    #[must_use]
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            path: "/".to_string(),
            expires: None,
            secure: false,
        }
    }

    /// Set path
    #[must_use]
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Set expiration
    #[must_use]
    pub const fn with_expires(mut self, expires: i64) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set secure
    #[must_use]
    pub const fn secure(mut self) -> Self {
        self.secure = true;
        self
    }
}

/// When an injected script runs relative to document parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InjectionTime {
    /// Before any document script
    DocumentStart,
    /// After the document is parsed, before other document-end scripts
    DocumentEnd,
}

/// Script injected into every navigation of the surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserScript {
    /// JavaScript source
    pub source: String,
    /// Injection timing
    pub injection_time: InjectionTime,
    /// Run only in the main frame
    pub main_frame_only: bool,
}

impl UserScript {
    /// Script that runs once the main frame document is parsed
    #[must_use]
    pub fn at_document_end(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            injection_time: InjectionTime::DocumentEnd,
            main_frame_only: true,
        }
    }
}

/// A navigation attempt the surface asks permission for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationAction {
    /// Requested URL; empty when the platform could not resolve one
    pub url: String,
    /// Whether the navigation targets an existing frame
    ///
    /// `false` for `window.open` and `target="_blank"` style requests.
    pub has_target_frame: bool,
}

impl NavigationAction {
    /// Navigation of an existing frame
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            has_target_frame: true,
        }
    }

    /// Navigation asking for a new window
    #[must_use]
    pub fn new_window(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            has_target_frame: false,
        }
    }
}

/// Decision returned for a navigation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationPolicy {
    /// Let the surface navigate
    Allow,
    /// Keep the surface where it is
    Cancel,
}

/// Receives navigation decisions and load lifecycle events
#[async_trait]
pub trait NavigationObserver: Send + Sync {
    /// Decide whether a navigation may proceed inside the surface
    fn decide_policy(&self, action: &NavigationAction) -> NavigationPolicy;

    /// Main frame navigation finished
    async fn did_finish_navigation(&self);

    /// Main frame navigation failed
    fn did_fail_navigation(&self, url: &str, message: &str);
}

/// Receives strings posted to a named bridge channel
pub trait MessageObserver: Send + Sync {
    /// One message posted by content script, in posting order per frame
    fn did_receive_message(&self, channel: &str, body: &serde_json::Value);
}

/// Receives requests that would create new presentation surfaces
pub trait PresentationHost: Send + Sync {
    /// Content asked for a new window; the surface never creates one
    fn did_request_new_window(&self, action: &NavigationAction);
}

/// Embedded web surface provided by the host platform
#[async_trait]
pub trait ContentSurface: Send + Sync {
    /// Apply script preferences and frame
    async fn apply_config(&self, config: &SurfaceConfig) -> AdSlotResult<()>;

    /// Begin navigating to `url`; completion arrives via
    /// [`NavigationObserver::did_finish_navigation`]
    async fn load(&self, url: &Url) -> AdSlotResult<()>;

    /// Add a script that runs on every subsequent navigation
    async fn inject_script(&self, script: UserScript) -> AdSlotResult<()>;

    /// Register the navigation observer
    fn set_navigation_observer(&self, observer: Weak<dyn NavigationObserver>);

    /// Register an observer for one named bridge channel
    fn add_message_observer(&self, channel: &str, observer: Weak<dyn MessageObserver>);

    /// Register the presentation host
    fn set_presentation_host(&self, host: Weak<dyn PresentationHost>);

    /// Drop every registered observer
    fn detach_observers(&self);

    /// Evaluate script in the loaded document
    async fn evaluate(&self, script: &str) -> AdSlotResult<serde_json::Value>;

    /// Snapshot of the cookie jar
    async fn read_cookies(&self) -> AdSlotResult<Vec<Cookie>>;

    /// Write a cookie before the next load
    async fn write_cookie(&self, cookie: Cookie) -> AdSlotResult<()>;

    /// Stop loading, navigate to a blank page and leave the presentation
    /// context
    async fn teardown(&self) -> AdSlotResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod cookie_tests {
        use super::*;

        #[test]
        fn test_cookie_creation() {
            let cookie = Cookie::new("clever-counter-7", "1");
            assert_eq!(cookie.name, "clever-counter-7");
            assert_eq!(cookie.value, "1");
            assert_eq!(cookie.path, "/");
            assert!(!cookie.secure);
            assert!(cookie.expires.is_none());
        }

        #[test]
        fn test_cookie_builder() {
            let cookie = Cookie::new("n", "v")
                .with_path("/ads")
                .secure()
                .with_expires(1_700_000_000);
            assert_eq!(cookie.path, "/ads");
            assert!(cookie.secure);
            assert_eq!(cookie.expires, Some(1_700_000_000));
        }
    }

    mod navigation_tests {
        use super::*;

        #[test]
        fn test_navigation_action_frames() {
            assert!(NavigationAction::new("https://a.test").has_target_frame);
            assert!(!NavigationAction::new_window("https://a.test").has_target_frame);
        }

        #[test]
        fn test_user_script_defaults() {
            let script = UserScript::at_document_end("1;");
            assert_eq!(script.injection_time, InjectionTime::DocumentEnd);
            assert!(script.main_frame_only);
        }
    }
}
