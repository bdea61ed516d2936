//! Contains logic for observing the desktop in different environments.
//! [GenericWindowManager] abstracts the platform, [identity::RegistryResolver] turns raw
//! window data into the identity the tracker records.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

pub mod identity;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{sync::Arc, time::Duration};

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct ActiveWindowData {
    /// Name of the window. For example 'main.rs - project - Visual Studio Code'
    pub window_title: Arc<str>,
    /// Full path to an executable. For example /usr/bin/nvim
    pub process_name: Arc<str>,
    /// Encoded icon of the window, empty when the platform doesn't provide one.
    pub icon: Vec<u8>,
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager: Send {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData>;
}

/// System wide input state used by the idle monitor.
#[cfg_attr(test, mockall::automock)]
pub trait SystemActivity: Send {
    /// Time since the last keyboard or mouse input.
    fn get_idle_time(&mut self) -> Result<Duration>;

    fn is_screen_locked(&mut self) -> Result<bool>;
}

/// Serves as a cross-compatible WindowManager implementation.
pub struct GenericWindowManager {
    inner: Box<dyn PlatformManager>,
}

trait PlatformManager: WindowManager + SystemActivity {}

impl<T: WindowManager + SystemActivity> PlatformManager for T {}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
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
                Err(anyhow::anyhow!(
                    "No window manager was compiled in. Build with the `x11` or `win` feature"
                ))
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData> {
        self.inner.get_active_window_data()
    }
}

impl SystemActivity for GenericWindowManager {
    fn get_idle_time(&mut self) -> Result<Duration> {
        self.inner.get_idle_time()
    }

    fn is_screen_locked(&mut self) -> Result<bool> {
        self.inner.is_screen_locked()
    }
}
