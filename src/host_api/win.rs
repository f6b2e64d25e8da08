use anyhow::{anyhow, Result};
use tracing::error;
use windows::Win32::{
    System::SystemInformation::GetTickCount64,
    UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
};

use super::IdleProbe;

fn last_input_ms() -> Result<u64> {
    let mut last: LASTINPUTINFO = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        error!("Failed to retrieve user idle time");
        return Err(anyhow!("Failed to retrieve user idle time"));
    }

    let tick_count = unsafe { GetTickCount64() };
    Ok(tick_count.saturating_sub(last.dwTime as u64))
}

pub struct WindowsIdleProbe {}

impl WindowsIdleProbe {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsIdleProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleProbe for WindowsIdleProbe {
    fn idle_ms(&mut self) -> Result<u64> {
        last_input_ms().inspect_err(|e| error!("Failed to get idle time {e:?}"))
    }
}
