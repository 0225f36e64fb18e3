use {
    crate::{
        dispc::{Channel, VideoTimings},
        driver::Driver,
        utils::errorfmt::ErrorFmt,
    },
    std::sync::{
        Weak,
        atomic::{AtomicBool, Ordering::Relaxed},
    },
};

/// The encoder a pipe feeds. Notified from the pre-commit stage of a full update.
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;
    fn set_enabled(&self, enabled: bool);
    fn update(&self, channel: Channel, timings: &VideoTimings);
}

/// An encoder whose output powers its manager up and down through the driver.
///
/// Enabling blocks until the manager has started scanning out.
pub struct DssEncoder {
    name: String,
    driver: Weak<Driver>,
    channel: Channel,
    enabled: AtomicBool,
}

impl DssEncoder {
    pub fn new(name: &str, driver: Weak<Driver>, channel: Channel) -> Self {
        Self {
            name: name.to_string(),
            driver,
            channel,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Relaxed)
    }
}

impl Encoder for DssEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Relaxed) == enabled {
            return;
        }
        let Some(driver) = self.driver.upgrade() else {
            return;
        };
        let res = match enabled {
            true => driver.mgr_enable(self.channel),
            false => driver.mgr_disable(self.channel),
        };
        if let Err(e) = res {
            log::error!(
                "{}: Could not {} manager {}: {}",
                self.name,
                if enabled { "enable" } else { "disable" },
                self.channel,
                ErrorFmt(e),
            );
        }
    }

    fn update(&self, channel: Channel, timings: &VideoTimings) {
        let Some(driver) = self.driver.upgrade() else {
            return;
        };
        if let Err(e) = driver.mgr_set_timings(channel, *timings) {
            log::error!("{}: Could not set timings: {}", self.name, ErrorFmt(e));
        }
    }
}
