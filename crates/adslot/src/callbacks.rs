//! Host callback registry
//!
//! Fixed set of optional handlers bound when the slot is built. The slot
//! decides when each may fire; this type only stores and invokes them.

use std::fmt;

/// Callback taking no arguments
pub type Callback = Box<dyn Fn() + Send + Sync>;

/// Callback receiving whether the loaded ad embeds a frame
pub type FinishedLoadingCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Optional host handlers, at most one per category
#[derive(Default)]
pub struct AdSlotCallbacks {
    pub(crate) error: Option<Callback>,
    pub(crate) alternative: Option<Callback>,
    pub(crate) data: Option<Callback>,
    pub(crate) data_url_click: Option<Callback>,
    pub(crate) data_url_view: Option<Callback>,
    pub(crate) finished_loading: Option<FinishedLoadingCallback>,
    pub(crate) destroyed: Option<Callback>,
}

impl AdSlotCallbacks {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Content reported an error (`…|callback`)
    #[must_use]
    pub fn on_error(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Content asked the host to show an alternative (`…|alternative`)
    #[must_use]
    pub fn on_alternative(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.alternative = Some(Box::new(f));
        self
    }

    /// Data hook fired
    #[must_use]
    pub fn on_data(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.data = Some(Box::new(f));
        self
    }

    /// Data url-click hook fired
    #[must_use]
    pub fn on_data_url_click(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.data_url_click = Some(Box::new(f));
        self
    }

    /// Data url-view hook fired
    #[must_use]
    pub fn on_data_url_view(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.data_url_view = Some(Box::new(f));
        self
    }

    /// First load finished; argument is the embedded-frame heuristic
    #[must_use]
    pub fn on_finished_loading(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.finished_loading = Some(Box::new(f));
        self
    }

    /// Slot was destroyed or suppressed
    #[must_use]
    pub fn on_destroyed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.destroyed = Some(Box::new(f));
        self
    }

    pub(crate) fn fire(callback: Option<&Callback>) {
        if let Some(f) = callback {
            f();
        }
    }

    fn registered(&self) -> Vec<&'static str> {
        [
            ("error", self.error.is_some()),
            ("alternative", self.alternative.is_some()),
            ("data", self.data.is_some()),
            ("data_url_click", self.data_url_click.is_some()),
            ("data_url_view", self.data_url_view.is_some()),
            ("finished_loading", self.finished_loading.is_some()),
            ("destroyed", self.destroyed.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

impl fmt::Debug for AdSlotCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdSlotCallbacks")
            .field("registered", &self.registered())
            .finish()
    }
}
