//! Bridge protocol between ad content script and the host
//!
//! Two scripts are injected at document end:
//!
//! 1. a forwarder that wraps `window.postMessage` so every message the page
//!    posts is also delivered to the host's bridge channel;
//! 2. unit hooks, installed only when the page contains the unit's element,
//!    exposing three functions that post fixed literals.
//!
//! Both sources are protocol artifacts: the remote content depends on the
//! exact function names, so tests compare them against golden strings.
//!
//! Inbound messages are `|`-separated. Only the first and last segments are
//! inspected, and the rules are independent, so one message may produce
//! more than one action.

use crate::unit::UnitId;
use serde::{Deserialize, Serialize};
use url::Url;

/// First segment marking a request to open a URL externally
pub const REDIRECT_TAG: &str = "clever-redirect";

/// Last segment for the error callback
pub const ERROR_TAG: &str = "callback";

/// Last segment for the alternative callback
pub const ALTERNATIVE_TAG: &str = "alternative";

/// Last segment for the data callback
pub const DATA_TAG: &str = "data-callback";

/// Last segment for the data url-click callback
pub const DATA_URL_CLICK_TAG: &str = "data-callback-url-click";

/// Last segment for the data url-view callback
pub const DATA_URL_VIEW_TAG: &str = "data-callback-url-view";

const CHANNEL_PLACEHOLDER: &str = "__CHANNEL__";
const ELEMENT_PLACEHOLDER: &str = "__ELEMENT_ID__";

const FORWARDER_TEMPLATE: &str = r"(function () {
    var originalPostMessage = window.postMessage;
    window.postMessage = function (message) {
        window.webkit.messageHandlers.__CHANNEL__.postMessage(message);
        return originalPostMessage.apply(window, arguments);
    };
})();
";

const UNIT_HOOKS_TEMPLATE: &str = r#"(function () {
    if (!document.getElementById("__ELEMENT_ID__")) {
        return;
    }
    var bridge = window.webkit.messageHandlers.__CHANNEL__;
    window.cleverDataCallback = function () {
        bridge.postMessage("data-callback");
    };
    window.cleverDataCallbackUrlClick = function () {
        bridge.postMessage("data-callback-url-click");
    };
    window.cleverDataCallbackUrlView = function () {
        bridge.postMessage("data-callback-url-view");
    };
})();
"#;

/// Script probing whether the loaded document embeds any frame
pub const FRAME_PROBE_SCRIPT: &str = "document.getElementsByTagName('iframe').length > 0";

/// Source of the `postMessage` forwarder for `channel`
#[must_use]
pub fn forwarder_script(channel: &str) -> String {
    FORWARDER_TEMPLATE.replace(CHANNEL_PLACEHOLDER, channel)
}

/// Source of the unit hook installer for `unit_id` posting into `channel`
#[must_use]
pub fn unit_hooks_script(unit_id: &UnitId, channel: &str) -> String {
    UNIT_HOOKS_TEMPLATE
        .replace(ELEMENT_PLACEHOLDER, &unit_id.hook_element_id())
        .replace(CHANNEL_PLACEHOLDER, channel)
}

/// What the host should do in response to one bridge message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeAction {
    /// Open the URL in the external browser
    Redirect(Url),
    /// Invoke the error callback
    Error,
    /// Invoke the alternative callback
    Alternative,
    /// Invoke the data callback
    Data,
    /// Invoke the data url-click callback
    DataUrlClick,
    /// Invoke the data url-view callback
    DataUrlView,
}

/// The inspected parts of a bridge message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeMessage<'a> {
    /// First non-empty segment
    pub first: &'a str,
    /// Last non-empty segment; equals `first` for single-segment messages
    pub last: &'a str,
}

impl<'a> BridgeMessage<'a> {
    /// Split on `|`, ignoring empty segments; `None` if nothing remains
    #[must_use]
    pub fn parse(body: &'a str) -> Option<Self> {
        let mut segments = body.split('|').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let last = segments.last().unwrap_or(first);
        Some(Self { first, last })
    }

    /// Apply the classification table, in table order
    #[must_use]
    pub fn actions(&self) -> Vec<BridgeAction> {
        let mut actions = Vec::new();
        if self.first == REDIRECT_TAG {
            match Url::parse(self.last) {
                Ok(url) => actions.push(BridgeAction::Redirect(url)),
                Err(e) => {
                    tracing::debug!(target_url = self.last, error = %e, "ignoring unparseable redirect");
                }
            }
        }
        match self.last {
            ERROR_TAG => actions.push(BridgeAction::Error),
            ALTERNATIVE_TAG => actions.push(BridgeAction::Alternative),
            DATA_TAG => actions.push(BridgeAction::Data),
            DATA_URL_CLICK_TAG => actions.push(BridgeAction::DataUrlClick),
            DATA_URL_VIEW_TAG => actions.push(BridgeAction::DataUrlView),
            _ => {}
        }
        actions
    }
}

/// Classify a raw bridge message body
#[must_use]
pub fn classify(body: &str) -> Vec<BridgeAction> {
    BridgeMessage::parse(body)
        .map(|message| message.actions())
        .unwrap_or_default()
}
