//! AdSlot - Ad Unit Lifecycle Controller
//!
//! # State machine
//!
//! ```text
//!            counted                        explicit destroy
//!   Init ──────────────► Suppressed ─────────────────────────┐
//!    │                                                        ▼
//!    │ not counted         finished                       Destroyed
//!    └──────────► Loading ──────────► Loaded ────────────────▲
//!                    │                                        │
//!                    └────────────────────────────────────────┘
//! ```
//!
//! - `Init`: nothing has touched the surface; the ledger check is pending.
//! - `Loading`: every navigation is allowed, the unit builds its content.
//! - `Loaded`: navigations leaving the content origin go to the system
//!   browser instead; cookies are migrated after every finished load.
//! - `Suppressed` / `Destroyed`: the surface is released; no callback fires
//!   again.
//!
//! Storage, cookie and open failures are logged and swallowed. The only
//! hard failure is an unbuildable content URL, reported by
//! [`AdSlotBuilder::build`].

use crate::bridge::{self, BridgeAction};
use crate::callbacks::AdSlotCallbacks;
use crate::config::AdSlotConfig;
use crate::ledger::FrequencyCapLedger;
use crate::opener::ExternalOpener;
use crate::result::AdSlotResult;
use crate::surface::{
    ContentSurface, Cookie, MessageObserver, NavigationAction, NavigationObserver,
    NavigationPolicy, PresentationHost, UserScript,
};
use crate::unit::UnitId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Lifecycle state of an ad slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// Waiting for the frequency-cap check
    Init,
    /// Unit already counted; never loaded
    Suppressed,
    /// Content requested, not yet finished
    Loading,
    /// Content finished loading at least once
    Loaded,
    /// Torn down by the host
    Destroyed,
}

impl SlotState {
    /// Whether the surface may still produce events the slot acts on
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Loading | Self::Loaded)
    }

    /// Whether the surface has been released
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Suppressed | Self::Destroyed)
    }
}

#[derive(Debug)]
struct SlotInner {
    state: SlotState,
    destroyed_fired: bool,
    surface_released: bool,
    /// Startup is issuing surface calls; teardown waits for it
    surface_busy: bool,
    /// Counter flag already written in this load session
    counted: bool,
    startup: Option<AbortHandle>,
}

/// Hands a pending teardown back to the slot if startup is dropped while
/// it still owns the surface
struct StartupWork<'a, S: ContentSurface + 'static> {
    slot: &'a AdSlot<S>,
    armed: bool,
}

impl<S: ContentSurface + 'static> Drop for StartupWork<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if !self.slot.settle_surface_work() {
            return;
        }
        self.slot.surface.detach_observers();
        let runtime = tokio::runtime::Handle::try_current();
        if let (Some(slot), Ok(runtime)) = (self.slot.weak_self.upgrade(), runtime) {
            runtime.spawn(async move { slot.teardown_surface().await });
        }
    }
}

/// Builder for [`AdSlot`]
pub struct AdSlotBuilder {
    unit_id: UnitId,
    config: AdSlotConfig,
    callbacks: AdSlotCallbacks,
    ledger: FrequencyCapLedger,
    opener: Arc<dyn ExternalOpener>,
}

impl fmt::Debug for AdSlotBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdSlotBuilder")
            .field("unit_id", &self.unit_id)
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl AdSlotBuilder {
    /// Start building a slot for `unit_id`
    #[must_use]
    pub fn new(
        unit_id: UnitId,
        ledger: FrequencyCapLedger,
        opener: Arc<dyn ExternalOpener>,
    ) -> Self {
        Self {
            unit_id,
            config: AdSlotConfig::default(),
            callbacks: AdSlotCallbacks::default(),
            ledger,
            opener,
        }
    }

    /// Set configuration
    #[must_use]
    pub fn config(mut self, config: AdSlotConfig) -> Self {
        self.config = config;
        self
    }

    /// Set host callbacks
    #[must_use]
    pub fn callbacks(mut self, callbacks: AdSlotCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Build the slot around `surface`
    ///
    /// Fails if the configuration is invalid or the content URL cannot be
    /// rendered; nothing is done to the surface in that case.
    pub fn build<S>(self, surface: S) -> AdSlotResult<Arc<AdSlot<S>>>
    where
        S: ContentSurface + 'static,
    {
        self.config.validate()?;
        let content_url = self.config.content_url(&self.unit_id)?;
        let instance = Uuid::new_v4();
        debug!(unit_id = %self.unit_id, %instance, url = %content_url, "ad slot created");

        Ok(Arc::new_cyclic(|weak| AdSlot {
            instance,
            unit_id: self.unit_id,
            content_url,
            config: self.config,
            surface,
            ledger: self.ledger,
            opener: self.opener,
            callbacks: self.callbacks,
            inner: Mutex::new(SlotInner {
                state: SlotState::Init,
                destroyed_fired: false,
                surface_released: false,
                surface_busy: false,
                counted: false,
                startup: None,
            }),
            weak_self: weak.clone(),
        }))
    }
}

/// Controller for one embedded ad unit
pub struct AdSlot<S: ContentSurface> {
    instance: Uuid,
    unit_id: UnitId,
    content_url: Url,
    config: AdSlotConfig,
    surface: S,
    ledger: FrequencyCapLedger,
    opener: Arc<dyn ExternalOpener>,
    callbacks: AdSlotCallbacks,
    inner: Mutex<SlotInner>,
    weak_self: Weak<Self>,
}

impl<S: ContentSurface + 'static> fmt::Debug for AdSlot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdSlot")
            .field("instance", &self.instance)
            .field("unit_id", &self.unit_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<S: ContentSurface + 'static> AdSlot<S> {
    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SlotState {
        self.lock().state
    }

    /// Unit this slot shows
    #[must_use]
    pub const fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    /// URL of the unit script
    #[must_use]
    pub const fn content_url(&self) -> &Url {
        &self.content_url
    }

    /// Per-instance id used in log fields
    #[must_use]
    pub const fn instance_id(&self) -> Uuid {
        self.instance
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &AdSlotConfig {
        &self.config
    }

    /// The wrapped surface
    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    /// Whether the content has finished loading at least once
    #[must_use]
    pub fn is_finished_loading(&self) -> bool {
        self.state() == SlotState::Loaded
    }

    /// Spawn the startup check on the tokio runtime
    ///
    /// The task's abort handle is kept as the slot's cancellation token;
    /// [`destroy`](Self::destroy) aborts a check still in flight.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let slot = Arc::clone(self);
        let handle = tokio::spawn(async move { slot.run_startup().await });
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            handle.abort();
        } else {
            inner.startup = Some(handle.abort_handle());
        }
        handle
    }

    /// Consult the ledger, then either suppress or begin loading
    ///
    /// Only the first call out of `Init` has any effect.
    pub async fn run_startup(&self) {
        if self.state() != SlotState::Init {
            return;
        }
        let counted = self.ledger.has_been_counted(&self.unit_id).await;
        if counted {
            self.suppress().await;
        } else {
            self.begin_loading().await;
        }
    }

    /// Tear the slot down; the destroyed callback fires at most once over
    /// the slot's lifetime
    ///
    /// A startup still preparing the surface is left to finish its current
    /// call; it issues nothing further and performs the teardown itself.
    pub async fn destroy(&self) {
        let startup = {
            let mut inner = self.lock();
            if inner.state == SlotState::Destroyed {
                return;
            }
            let checking = inner.state == SlotState::Init;
            inner.state = SlotState::Destroyed;
            inner.startup.take().filter(|_| checking)
        };
        if let Some(startup) = startup {
            startup.abort();
        }
        info!(unit_id = %self.unit_id, instance = %self.instance, "destroying ad slot");
        self.release_surface().await;
        self.fire_destroyed();
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self) -> bool {
        self.state().is_live()
    }

    async fn suppress(&self) {
        {
            let mut inner = self.lock();
            if inner.state != SlotState::Init {
                return;
            }
            inner.state = SlotState::Suppressed;
        }
        info!(unit_id = %self.unit_id, instance = %self.instance, "unit already counted, suppressing");
        self.release_surface().await;
        self.fire_destroyed();
    }

    async fn begin_loading(&self) {
        {
            let mut inner = self.lock();
            if inner.state != SlotState::Init {
                return;
            }
            inner.state = SlotState::Loading;
            inner.surface_busy = true;
        }

        let mut work = StartupWork {
            slot: self,
            armed: true,
        };
        self.prepare_and_load().await;
        work.armed = false;

        if self.settle_surface_work() {
            debug!(unit_id = %self.unit_id, instance = %self.instance, "finishing teardown requested during startup");
            self.teardown_surface().await;
        }
    }

    /// Release the surface from startup; true if a teardown was requested
    /// meanwhile and is now owed
    fn settle_surface_work(&self) -> bool {
        let mut inner = self.lock();
        inner.surface_busy = false;
        inner.surface_released
    }

    /// Every step re-checks liveness; a destroy landing between steps
    /// stops the sequence before the next surface call
    async fn prepare_and_load(&self) {
        if let Err(e) = self.surface.apply_config(&self.config.surface).await {
            warn!(unit_id = %self.unit_id, error = %e, "failed to apply surface config");
        }

        if let Some(tracker) = self.ledger.tracker_value(&self.unit_id).await {
            if !self.is_live() {
                return;
            }
            let cookie = self.tracker_cookie(&tracker);
            debug!(unit_id = %self.unit_id, cookie = %cookie.name, "replaying tracker cookie");
            if let Err(e) = self.surface.write_cookie(cookie).await {
                warn!(unit_id = %self.unit_id, error = %e, "failed to write tracker cookie");
            }
        }

        let channel = self.config.bridge_channel.as_str();
        let scripts = [
            UserScript::at_document_end(bridge::forwarder_script(channel)),
            UserScript::at_document_end(bridge::unit_hooks_script(&self.unit_id, channel)),
        ];
        for script in scripts {
            if !self.is_live() {
                return;
            }
            if let Err(e) = self.surface.inject_script(script).await {
                warn!(unit_id = %self.unit_id, error = %e, "failed to inject bridge script");
            }
        }

        if !self.is_live() {
            return;
        }
        let navigation: Weak<dyn NavigationObserver> = self.weak_self.clone();
        let messages: Weak<dyn MessageObserver> = self.weak_self.clone();
        let presentation: Weak<dyn PresentationHost> = self.weak_self.clone();
        self.surface.set_navigation_observer(navigation);
        self.surface.add_message_observer(channel, messages);
        self.surface.set_presentation_host(presentation);

        if !self.is_live() {
            return;
        }
        info!(unit_id = %self.unit_id, instance = %self.instance, url = %self.content_url, "loading ad unit");
        if let Err(e) = self.surface.load(&self.content_url).await {
            warn!(unit_id = %self.unit_id, error = %e, "ad unit load failed to start");
        }
    }

    fn tracker_cookie(&self, value: &str) -> Cookie {
        let ttl = i64::try_from(self.config.tracker_cookie_ttl_secs).unwrap_or(i64::MAX);
        let expires = chrono::Utc::now().timestamp().saturating_add(ttl);
        Cookie::new(&self.unit_id.tracker_cookie_name(), value)
            .with_path("/")
            .secure()
            .with_expires(expires)
    }

    async fn release_surface(&self) {
        {
            let mut inner = self.lock();
            if inner.surface_released {
                return;
            }
            inner.surface_released = true;
            if inner.surface_busy {
                debug!(unit_id = %self.unit_id, instance = %self.instance, "teardown deferred until startup settles");
                return;
            }
        }
        self.teardown_surface().await;
    }

    async fn teardown_surface(&self) {
        self.surface.detach_observers();
        if let Err(e) = self.surface.teardown().await {
            warn!(unit_id = %self.unit_id, error = %e, "surface teardown failed");
        }
    }

    fn fire_destroyed(&self) {
        {
            let mut inner = self.lock();
            if inner.destroyed_fired {
                return;
            }
            inner.destroyed_fired = true;
        }
        AdSlotCallbacks::fire(self.callbacks.destroyed.as_ref());
    }

    async fn probe_embedded_frame(&self) -> bool {
        match self.surface.evaluate(bridge::FRAME_PROBE_SCRIPT).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                warn!(unit_id = %self.unit_id, error = %e, "embedded frame probe failed");
                false
            }
        }
    }

    /// Scan the jar once; the first entry naming this unit wins
    async fn migrate_cookies(&self) {
        let cookies = match self.surface.read_cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(unit_id = %self.unit_id, error = %e, "failed to read cookie jar");
                return;
            }
        };
        let tracker_name = self.unit_id.tracker_cookie_name();
        let counter_name = self.unit_id.counter_cookie_name();

        for cookie in cookies {
            if cookie.name == tracker_name {
                if self.ledger.save_tracker(&self.unit_id, &cookie.value).await {
                    info!(unit_id = %self.unit_id, "tracker value saved");
                }
                return;
            }
            if cookie.name == counter_name {
                let already = std::mem::replace(&mut self.lock().counted, true);
                if already {
                    debug!(unit_id = %self.unit_id, "unit already counted this session");
                    return;
                }
                let counted = self.ledger.mark_counted(&self.unit_id).await;
                self.ledger.clear_tracker(&self.unit_id).await;
                info!(unit_id = %self.unit_id, durable = counted, "unit counted");
                return;
            }
        }
    }

    fn open_navigation_target(&self, raw: &str) {
        match Url::parse(raw) {
            Ok(url) => {
                if let Err(e) = self.opener.open(&url) {
                    warn!(unit_id = %self.unit_id, error = %e, "external open failed");
                }
            }
            Err(e) => {
                warn!(unit_id = %self.unit_id, url = raw, error = %e, "cannot open navigation target");
            }
        }
    }

    fn open_redirect(&self, url: &Url) {
        if !self.opener.can_open(url) {
            debug!(unit_id = %self.unit_id, %url, "no handler for redirect");
            return;
        }
        if let Err(e) = self.opener.open(url) {
            warn!(unit_id = %self.unit_id, error = %e, "external open failed");
        }
    }
}

#[async_trait]
impl<S: ContentSurface + 'static> NavigationObserver for AdSlot<S> {
    fn decide_policy(&self, action: &NavigationAction) -> NavigationPolicy {
        let policy = match self.state() {
            SlotState::Loaded if !self.config.is_content_url(&action.url) => {
                self.open_navigation_target(&action.url);
                NavigationPolicy::Cancel
            }
            _ => NavigationPolicy::Allow,
        };
        debug!(unit_id = %self.unit_id, url = %action.url, ?policy, "navigation decided");
        policy
    }

    async fn did_finish_navigation(&self) {
        let first = {
            let mut inner = self.lock();
            match inner.state {
                SlotState::Loading => {
                    inner.state = SlotState::Loaded;
                    true
                }
                SlotState::Loaded => false,
                _ => return,
            }
        };

        if first {
            let has_frame = self.probe_embedded_frame().await;
            info!(unit_id = %self.unit_id, has_frame, "ad unit finished loading");
            if self.is_live() {
                if let Some(f) = self.callbacks.finished_loading.as_ref() {
                    f(has_frame);
                }
            }
        }
        if !self.is_live() {
            return;
        }
        self.migrate_cookies().await;
    }

    fn did_fail_navigation(&self, url: &str, message: &str) {
        warn!(unit_id = %self.unit_id, url, message, state = ?self.state(), "navigation failed");
    }
}

impl<S: ContentSurface + 'static> MessageObserver for AdSlot<S> {
    fn did_receive_message(&self, channel: &str, body: &serde_json::Value) {
        if channel != self.config.bridge_channel {
            debug!(unit_id = %self.unit_id, channel, "ignoring message on foreign channel");
            return;
        }
        let Some(text) = body.as_str() else {
            debug!(unit_id = %self.unit_id, "ignoring non-string bridge message");
            return;
        };
        let actions = bridge::classify(text);
        debug!(unit_id = %self.unit_id, message = text, ?actions, "bridge message classified");

        for action in actions {
            if !self.is_live() {
                return;
            }
            let callback = match action {
                BridgeAction::Redirect(url) => {
                    self.open_redirect(&url);
                    continue;
                }
                BridgeAction::Error => self.callbacks.error.as_ref(),
                BridgeAction::Alternative => self.callbacks.alternative.as_ref(),
                BridgeAction::Data => self.callbacks.data.as_ref(),
                BridgeAction::DataUrlClick => self.callbacks.data_url_click.as_ref(),
                BridgeAction::DataUrlView => self.callbacks.data_url_view.as_ref(),
            };
            AdSlotCallbacks::fire(callback);
        }
    }
}

impl<S: ContentSurface + 'static> PresentationHost for AdSlot<S> {
    fn did_request_new_window(&self, action: &NavigationAction) {
        if !self.is_live() || action.has_target_frame {
            return;
        }
        debug!(unit_id = %self.unit_id, url = %action.url, "new window routed to external browser");
        self.open_navigation_target(&action.url);
    }
}
