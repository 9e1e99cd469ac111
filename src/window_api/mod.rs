//! Window Info Provider: the per-platform capability that reports which window currently holds
//! input focus. [GenericWindowManager] picks the implementation compiled in through cargo
//! features, everything else in the crate only sees [WindowInfoProvider].

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWindowData {
    /// Name of the window. For example 'bash in hello' or 'Document 1' or 'Vibing in YouTube -
    /// Chrome'
    pub window_title: Arc<str>,
    /// Path to the executable owning the window, empty when the platform couldn't tell.
    pub process_name: Arc<str>,
}

/// Reasons the focused window couldn't be read. Kept apart from `Ok(None)`, which means the
/// platform answered and nothing is focused.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("permission to read window information was denied: {0}")]
    PermissionDenied(String),
    #[error("no window information provider is available for this platform")]
    Unsupported,
    #[error("platform window API failed: {0:?}")]
    Platform(#[from] anyhow::Error),
}

/// Contract every platform implementation fulfils.
#[cfg_attr(test, mockall::automock)]
pub trait WindowInfoProvider: Send {
    /// Samples the currently focused window. `Ok(None)` when no window has focus.
    fn sample(&mut self) -> Result<Option<ActiveWindowData>, ProviderError>;
}

/// Serves as a cross-compatible [WindowInfoProvider] implementation.
pub struct GenericWindowManager {
    inner: Box<dyn WindowInfoProvider>,
}

impl GenericWindowManager {
    pub fn new() -> anyhow::Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                tracing::warn!("No window information provider was compiled in");
                Ok(Self {
                    inner: Box::new(UnsupportedPlatform),
                })
            }
        }
    }
}

impl WindowInfoProvider for GenericWindowManager {
    fn sample(&mut self) -> Result<Option<ActiveWindowData>, ProviderError> {
        self.inner.sample()
    }
}

/// Used when the crate is built without any platform feature. Every sample reports the platform
/// as unavailable so tracking keeps running and surfaces the problem through its status.
pub struct UnsupportedPlatform;

impl WindowInfoProvider for UnsupportedPlatform {
    fn sample(&mut self) -> Result<Option<ActiveWindowData>, ProviderError> {
        Err(ProviderError::Unsupported)
    }
}
