//! The display controller as seen by the apply pipeline.
//!
//! Register programming lives behind [`DisplayController`]. The pipeline only needs to set up a
//! manager, program timings, toggle a channel, trigger and poll the GO bit, and know which irq
//! bits belong to which channel.

use {linearize::Linearize, std::fmt::Display};

/// A hardware output path, identified by the overlay manager driving it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Linearize)]
pub enum Channel {
    Lcd,
    Digit,
    Lcd2,
    Lcd3,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Channel::Lcd => "lcd",
            Channel::Digit => "tv",
            Channel::Lcd2 => "lcd2",
            Channel::Lcd3 => "lcd3",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Interrupt status bits of the display controller.
    pub struct IrqStatus(pub u32) {
        const FRAMEDONE = 1 << 0,
        const VSYNC = 1 << 1,
        const EVSYNC_EVEN = 1 << 2,
        const EVSYNC_ODD = 1 << 3,
        const SYNC_LOST = 1 << 14,
        const SYNC_LOST_DIGIT = 1 << 15,
        const VSYNC2 = 1 << 18,
        const SYNC_LOST2 = 1 << 17,
        const FRAMEDONE2 = 1 << 22,
        const FRAMEDONETV = 1 << 24,
        const VSYNC3 = 1 << 28,
        const FRAMEDONE3 = 1 << 29,
        const SYNC_LOST3 = 1 << 27,
    }
}

bitflags! {
    /// Output types a manager can drive.
    pub struct OutputId(pub u32) {
        const DPI = 1 << 0,
        const DBI = 1 << 1,
        const SDI = 1 << 2,
        const DSI1 = 1 << 3,
        const DSI2 = 1 << 4,
        const VENC = 1 << 5,
        const HDMI = 1 << 6,
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Output {
    pub name: String,
    pub id: OutputId,
}

impl Output {
    pub fn is_hdmi(&self) -> bool {
        self.id == OutputId::HDMI
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ColorKeyType {
    #[default]
    GfxDst,
    VidSrc,
}

/// Per-manager composition settings programmed by `mgr_setup`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ManagerInfo {
    pub default_color: u32,
    pub trans_key: u32,
    pub trans_key_type: ColorKeyType,
    pub trans_enabled: bool,
    pub partial_alpha_enabled: bool,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VideoTimings {
    pub x_res: u16,
    pub y_res: u16,
    /// Pixel clock in kHz.
    pub pixel_clock: u32,
    pub hsw: u16,
    pub hfp: u16,
    pub hbp: u16,
    pub vsw: u16,
    pub vfp: u16,
    pub vbp: u16,
    pub interlace: bool,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LcdConfig {
    pub stall_mode: bool,
    pub fifo_handcheck: bool,
    pub video_port_width: u8,
    pub lcden_sig_polarity: bool,
}

pub trait DisplayController: Send + Sync {
    /// Takes a reference that keeps the controller clocked.
    fn runtime_get(&self);
    fn runtime_put(&self);

    fn mgr_setup(&self, channel: Channel, info: &ManagerInfo);
    fn mgr_set_timings(&self, channel: Channel, timings: &VideoTimings);
    fn mgr_set_lcd_config(&self, channel: Channel, config: &LcdConfig);
    fn mgr_enable(&self, channel: Channel, enable: bool);
    fn mgr_is_enabled(&self, channel: Channel) -> bool;

    /// Latches the shadow registers of the channel at the next frame boundary.
    fn mgr_go(&self, channel: Channel);
    /// Whether a GO issued earlier has not yet been absorbed by the hardware.
    fn mgr_go_busy(&self, channel: Channel) -> bool;

    fn supported_outputs(&self, channel: Channel) -> OutputId;
    fn vsync_irq(&self, channel: Channel) -> IrqStatus;
    fn framedone_irq(&self, channel: Channel) -> Option<IrqStatus>;
    fn sync_lost_irq(&self, channel: Channel) -> IrqStatus;
}
