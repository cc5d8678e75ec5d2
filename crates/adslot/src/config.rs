//! Ad slot configuration

use crate::result::{AdSlotError, AdSlotResult};
use crate::unit::UnitId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Origin every unit script is served from
pub const DEFAULT_CONTENT_ORIGIN: &str = "https://script.cleverwebserver.com";

/// Path prefix of the unit script under the content origin
pub const DEFAULT_SCRIPT_PATH: &str = "/v1/html/";

/// Named message channel the injected scripts post into
pub const DEFAULT_BRIDGE_CHANNEL: &str = "SwiftAdsMessageHandler";

/// SDK tag reported to the ad server
pub const DEFAULT_SDK_TAG: &str = "rust";

/// Lifetime of a replayed tracker cookie, roughly one month
pub const DEFAULT_TRACKER_COOKIE_TTL_SECS: u64 = 2_628_000;

/// Position and size of the surface inside its presentation context
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Frame {
    /// Create a new frame
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Preferences applied to the content surface before the first load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Frame in the host's coordinate space
    pub frame: Frame,
    /// Allow content script to run
    pub javascript_enabled: bool,
    /// Allow content script to open windows without a user gesture
    pub javascript_can_open_windows_automatically: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            frame: Frame::default(),
            javascript_enabled: true,
            javascript_can_open_windows_automatically: true,
        }
    }
}

impl SurfaceConfig {
    /// Set the frame
    #[must_use]
    pub const fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }
}

/// Configuration for an ad slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdSlotConfig {
    /// Origin prefix that stays inside the surface once loaded
    pub content_origin: String,
    /// Path prefix of the unit script
    pub script_path: String,
    /// Host application identifier, sent as `app=`
    pub host_app_id: String,
    /// SDK tag, sent as `sdk=`
    pub sdk_tag: String,
    /// Message channel name used by the bridge scripts
    pub bridge_channel: String,
    /// Expiry of the replayed tracker cookie
    pub tracker_cookie_ttl_secs: u64,
    /// Surface preferences
    pub surface: SurfaceConfig,
}

impl Default for AdSlotConfig {
    fn default() -> Self {
        Self {
            content_origin: DEFAULT_CONTENT_ORIGIN.to_string(),
            script_path: DEFAULT_SCRIPT_PATH.to_string(),
            host_app_id: String::new(),
            sdk_tag: DEFAULT_SDK_TAG.to_string(),
            bridge_channel: DEFAULT_BRIDGE_CHANNEL.to_string(),
            tracker_cookie_ttl_secs: DEFAULT_TRACKER_COOKIE_TTL_SECS,
            surface: SurfaceConfig::default(),
        }
    }
}

impl AdSlotConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> AdSlotResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> AdSlotResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Set the host application identifier
    #[must_use]
    pub fn with_host_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.host_app_id = app_id.into();
        self
    }

    /// Set the SDK tag
    #[must_use]
    pub fn with_sdk_tag(mut self, tag: impl Into<String>) -> Self {
        self.sdk_tag = tag.into();
        self
    }

    /// Set the content origin
    #[must_use]
    pub fn with_content_origin(mut self, origin: impl Into<String>) -> Self {
        self.content_origin = origin.into();
        self
    }

    /// Set the bridge channel name
    #[must_use]
    pub fn with_bridge_channel(mut self, channel: impl Into<String>) -> Self {
        self.bridge_channel = channel.into();
        self
    }

    /// Set surface preferences
    #[must_use]
    pub fn with_surface(mut self, surface: SurfaceConfig) -> Self {
        self.surface = surface;
        self
    }

    /// Check fields the injected scripts and URL template depend on
    pub fn validate(&self) -> AdSlotResult<()> {
        if self.bridge_channel.is_empty()
            || !self
                .bridge_channel
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            return Err(AdSlotError::config(format!(
                "bridge channel {:?} is not a valid script identifier",
                self.bridge_channel
            )));
        }
        if !self.script_path.starts_with('/') || !self.script_path.ends_with('/') {
            return Err(AdSlotError::config(format!(
                "script path {:?} must start and end with '/'",
                self.script_path
            )));
        }
        Ok(())
    }

    /// Render the unit's script URL:
    /// `{origin}{path}{unit}?app={host_app_id}&sdk={sdk_tag}`
    ///
    /// Query values are form-encoded.
    pub fn content_url(&self, unit_id: &UnitId) -> AdSlotResult<Url> {
        let raw = format!(
            "{}{}{}",
            self.content_origin.trim_end_matches('/'),
            self.script_path,
            unit_id
        );
        let mut url = Url::parse(&raw).map_err(|e| AdSlotError::InvalidContentUrl {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        if url.cannot_be_a_base() || url.host().is_none() {
            return Err(AdSlotError::InvalidContentUrl {
                url: raw,
                message: "content URL has no host".to_string(),
            });
        }
        url.query_pairs_mut()
            .append_pair("app", &self.host_app_id)
            .append_pair("sdk", &self.sdk_tag);
        Ok(url)
    }

    /// Whether a navigation target belongs to the ad content origin
    #[must_use]
    pub fn is_content_url(&self, url: &str) -> bool {
        url.starts_with(&self.content_origin)
    }
}
