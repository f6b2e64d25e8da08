//! Contains logic for asking the host environment how long the user has been inactive.
//! [GenericIdleProbe] is the main artifact of this module that abstracts the operation
//! across platforms.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;

/// Intended to serve as a contract platform idle sources must implement.
#[cfg_attr(test, mockall::automock)]
pub trait IdleProbe: Send + 'static {
    /// Retrieve amount of time user has been inactive in milliseconds
    fn idle_ms(&mut self) -> Result<u64>;
}

/// Serves as a cross-compatible IdleProbe implementation.
pub struct GenericIdleProbe {
    inner: Box<dyn IdleProbe>,
}

impl GenericIdleProbe {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsIdleProbe;
                Ok(Self {
                    inner: Box::new(WindowsIdleProbe::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11IdleProbe;
                Ok(Self {
                    inner: Box::new(X11IdleProbe::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No idle probe was specified")
            }
        }
    }
}

impl IdleProbe for GenericIdleProbe {
    fn idle_ms(&mut self) -> Result<u64> {
        self.inner.idle_ms()
    }
}
