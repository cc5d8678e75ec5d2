//! adslot: Frequency-Capped Ad Units in a Host Web View
//!
//! Embeds one remote ad unit in a web surface owned by the host
//! application, bridges messages from the unit's script back to typed host
//! callbacks, and makes sure a unit is shown at most once per installation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       adslot Architecture                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────────────┐     │
//! │   │ KeyValue   │    │ Frequency  │    │ AdSlot             │     │
//! │   │ Store      │───►│ Cap Ledger │───►│ (state machine)    │     │
//! │   └────────────┘    └────────────┘    └─────────┬──────────┘     │
//! │                                                 │                │
//! │                     ┌────────────┐    ┌─────────▼──────────┐     │
//! │                     │ Bridge     │◄──►│ ContentSurface     │     │
//! │                     │ codec      │    │ (host web view)    │     │
//! │                     └────────────┘    └────────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new("adslot.json"));
//! let slot = AdSlotBuilder::new(UnitId::from(42_u32), FrequencyCapLedger::new(store), opener)
//!     .config(AdSlotConfig::new().with_host_app_id("com.example.app"))
//!     .callbacks(AdSlotCallbacks::new().on_destroyed(|| println!("gone")))
//!     .build(web_view)?;
//! slot.start();
//! ```

#![warn(missing_docs)]
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

/// Injected bridge scripts and message classification
pub mod bridge;
mod callbacks;
mod config;
mod ledger;
/// Test doubles for the host platform
pub mod mock;
mod opener;
mod result;
mod slot;
mod store;
mod surface;
/// Subscriber setup for hosts without their own
pub mod telemetry;
mod unit;

pub use bridge::{classify, BridgeAction, BridgeMessage};
pub use callbacks::{AdSlotCallbacks, Callback, FinishedLoadingCallback};
pub use config::{
    AdSlotConfig, Frame, SurfaceConfig, DEFAULT_BRIDGE_CHANNEL, DEFAULT_CONTENT_ORIGIN,
    DEFAULT_SDK_TAG, DEFAULT_TRACKER_COOKIE_TTL_SECS,
};
pub use ledger::FrequencyCapLedger;
pub use opener::ExternalOpener;
pub use result::{AdSlotError, AdSlotResult};
pub use slot::{AdSlot, AdSlotBuilder, SlotState};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use surface::{
    ContentSurface, Cookie, InjectionTime, MessageObserver, NavigationAction,
    NavigationObserver, NavigationPolicy, PresentationHost, UserScript,
};
pub use unit::UnitId;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        AdSlot, AdSlotBuilder, AdSlotCallbacks, AdSlotConfig, AdSlotError, AdSlotResult,
        ContentSurface, Cookie, ExternalOpener, FrequencyCapLedger, KeyValueStore,
        NavigationAction, NavigationPolicy, SlotState, UnitId,
    };
}
