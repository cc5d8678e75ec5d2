//! Opening URLs outside the surface, in the system browser.

use crate::result::AdSlotResult;
use url::Url;

/// Hands URLs to the system's external browser
pub trait ExternalOpener: Send + Sync {
    /// Whether some installed handler accepts this URL
    fn can_open(&self, url: &Url) -> bool;

    /// Open the URL; fire and forget
    fn open(&self, url: &Url) -> AdSlotResult<()>;
}
