//! An in-process model of the display controller.
//!
//! Every channel has an enabled flag and a GO bit. A GO is absorbed at the next frame boundary
//! of an enabled channel. [`SimDispc::frame`] advances all channels by one frame and returns the
//! irq bits raised at that boundary. [`VsyncGenerator`] does so periodically and feeds the bits
//! into an [`IrqDispatcher`].

#[cfg(test)]
mod tests;

use {
    crate::{
        dispc::{
            Channel, DisplayController, IrqStatus, LcdConfig, ManagerInfo, OutputId, VideoTimings,
        },
        irq::IrqDispatcher,
    },
    linearize::{LinearizeExt, StaticMap},
    parking_lot::Mutex,
    std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering::Relaxed},
        },
        thread::{self, JoinHandle},
        time::Duration,
    },
};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimStats {
    pub go: u32,
    pub setups: u32,
    pub timings: u32,
    pub lcd_configs: u32,
    pub enables: u32,
    pub disables: u32,
}

#[derive(Default)]
struct SimChannel {
    enabled: bool,
    go: bool,
    /// Frames until a channel that is being disabled has stopped scanning out.
    shutdown_frames: u8,
    first_frame: bool,
    info: ManagerInfo,
    timings: VideoTimings,
    lcd_config: LcdConfig,
    stats: SimStats,
}

pub struct SimDispc {
    channels: Mutex<StaticMap<Channel, SimChannel>>,
    digit_framedone: bool,
    runtime_refs: AtomicI64,
    frames: AtomicU64,
}

impl SimDispc {
    /// `digit_framedone` selects whether the digit channel raises a frame-done irq.
    pub fn new(digit_framedone: bool) -> Arc<Self> {
        Arc::new(Self {
            channels: Default::default(),
            digit_framedone,
            runtime_refs: AtomicI64::new(0),
            frames: AtomicU64::new(0),
        })
    }

    pub fn stats(&self, channel: Channel) -> SimStats {
        self.channels.lock()[channel].stats
    }

    pub fn manager_info(&self, channel: Channel) -> ManagerInfo {
        self.channels.lock()[channel].info
    }

    pub fn programmed_timings(&self, channel: Channel) -> VideoTimings {
        self.channels.lock()[channel].timings
    }

    pub fn lcd_config(&self, channel: Channel) -> LcdConfig {
        self.channels.lock()[channel].lcd_config
    }

    /// Outstanding power references. Zero whenever the apply worker is idle.
    pub fn runtime_refs(&self) -> i64 {
        self.runtime_refs.load(Relaxed)
    }

    fn vsync_bit(channel: Channel, frame: u64) -> IrqStatus {
        match channel {
            Channel::Lcd => IrqStatus::VSYNC,
            Channel::Lcd2 => IrqStatus::VSYNC2,
            Channel::Lcd3 => IrqStatus::VSYNC3,
            Channel::Digit if frame % 2 == 0 => IrqStatus::EVSYNC_EVEN,
            Channel::Digit => IrqStatus::EVSYNC_ODD,
        }
    }

    /// Advances every channel to its next frame boundary.
    pub fn frame(&self) -> IrqStatus {
        let frame = self.frames.fetch_add(1, Relaxed);
        let mut channels = self.channels.lock();
        let mut status = IrqStatus::none();
        for channel in Channel::variants() {
            let c = &mut channels[channel];
            if c.enabled {
                c.go = false;
                status |= Self::vsync_bit(channel, frame);
                if c.first_frame {
                    c.first_frame = false;
                    status |= self.sync_lost_irq(channel) & IrqStatus::SYNC_LOST_DIGIT;
                }
            } else if c.shutdown_frames > 0 {
                c.shutdown_frames -= 1;
                c.go = false;
                status |= match self.framedone_irq(channel) {
                    Some(framedone) => framedone,
                    None => Self::vsync_bit(channel, frame),
                };
            }
        }
        status
    }
}

impl DisplayController for SimDispc {
    fn runtime_get(&self) {
        self.runtime_refs.fetch_add(1, Relaxed);
    }

    fn runtime_put(&self) {
        let prev = self.runtime_refs.fetch_sub(1, Relaxed);
        debug_assert!(prev > 0, "unbalanced runtime_put");
    }

    fn mgr_setup(&self, channel: Channel, info: &ManagerInfo) {
        let mut channels = self.channels.lock();
        let c = &mut channels[channel];
        c.info = *info;
        c.stats.setups += 1;
    }

    fn mgr_set_timings(&self, channel: Channel, timings: &VideoTimings) {
        let mut channels = self.channels.lock();
        let c = &mut channels[channel];
        c.timings = *timings;
        c.stats.timings += 1;
    }

    fn mgr_set_lcd_config(&self, channel: Channel, config: &LcdConfig) {
        let mut channels = self.channels.lock();
        let c = &mut channels[channel];
        c.lcd_config = *config;
        c.stats.lcd_configs += 1;
    }

    fn mgr_enable(&self, channel: Channel, enable: bool) {
        let mut channels = self.channels.lock();
        let c = &mut channels[channel];
        if c.enabled == enable {
            return;
        }
        c.enabled = enable;
        if enable {
            c.first_frame = true;
            c.shutdown_frames = 0;
            c.stats.enables += 1;
        } else {
            c.shutdown_frames = match self.framedone_irq(channel) {
                Some(_) => 1,
                None => 2,
            };
            c.stats.disables += 1;
        }
    }

    fn mgr_is_enabled(&self, channel: Channel) -> bool {
        self.channels.lock()[channel].enabled
    }

    fn mgr_go(&self, channel: Channel) {
        let mut channels = self.channels.lock();
        let c = &mut channels[channel];
        c.go = true;
        c.stats.go += 1;
    }

    fn mgr_go_busy(&self, channel: Channel) -> bool {
        self.channels.lock()[channel].go
    }

    fn supported_outputs(&self, channel: Channel) -> OutputId {
        match channel {
            Channel::Lcd => OutputId::DPI | OutputId::DBI | OutputId::SDI | OutputId::DSI1,
            Channel::Digit => OutputId::VENC | OutputId::HDMI,
            Channel::Lcd2 => OutputId::DPI | OutputId::DBI | OutputId::DSI2,
            Channel::Lcd3 => OutputId::DPI | OutputId::DBI | OutputId::DSI1 | OutputId::DSI2,
        }
    }

    fn vsync_irq(&self, channel: Channel) -> IrqStatus {
        match channel {
            Channel::Lcd => IrqStatus::VSYNC,
            Channel::Digit => IrqStatus::EVSYNC_EVEN | IrqStatus::EVSYNC_ODD,
            Channel::Lcd2 => IrqStatus::VSYNC2,
            Channel::Lcd3 => IrqStatus::VSYNC3,
        }
    }

    fn framedone_irq(&self, channel: Channel) -> Option<IrqStatus> {
        match channel {
            Channel::Lcd => Some(IrqStatus::FRAMEDONE),
            Channel::Digit if self.digit_framedone => Some(IrqStatus::FRAMEDONETV),
            Channel::Digit => None,
            Channel::Lcd2 => Some(IrqStatus::FRAMEDONE2),
            Channel::Lcd3 => Some(IrqStatus::FRAMEDONE3),
        }
    }

    fn sync_lost_irq(&self, channel: Channel) -> IrqStatus {
        match channel {
            Channel::Lcd => IrqStatus::SYNC_LOST,
            Channel::Digit => IrqStatus::SYNC_LOST_DIGIT,
            Channel::Lcd2 => IrqStatus::SYNC_LOST2,
            Channel::Lcd3 => IrqStatus::SYNC_LOST3,
        }
    }
}

/// Raises the irqs of a [`SimDispc`] once per frame period on a dedicated thread.
pub struct VsyncGenerator {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl VsyncGenerator {
    pub fn start(
        dispc: &Arc<SimDispc>,
        irq: &Arc<IrqDispatcher>,
        interval: Duration,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new().name("vsync".to_string()).spawn({
            let dispc = dispc.clone();
            let irq = irq.clone();
            let stop = stop.clone();
            move || {
                while !stop.load(Relaxed) {
                    thread::sleep(interval);
                    irq.dispatch(dispc.frame());
                }
            }
        })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for VsyncGenerator {
    fn drop(&mut self) {
        self.stop.store(true, Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("The vsync thread panicked");
            }
        }
    }
}
