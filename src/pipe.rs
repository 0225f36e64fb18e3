
use {
    crate::{
        apply::{ApplyCtx, ApplyOps, ApplyRequest},
        config::ApplyConfig,
        dispc::{
            Channel, ColorKeyType, DisplayController, IrqStatus, LcdConfig, ManagerInfo, Output,
            OutputId, VideoTimings,
        },
        encoder::Encoder,
        irq::{Irq, IrqDispatcher, IrqError},
        utils::{errorfmt::ErrorFmt, ratelimit::RateLimit},
        workqueue::{Work, WorkQueue, WorkQueueError},
    },
    parking_lot::{Mutex, MutexGuard},
    run_on_drop::on_drop,
    std::{
        collections::VecDeque,
        mem,
        sync::{
            Arc, Weak,
            atomic::{
                AtomicBool, AtomicU64, fence,
                Ordering::{Acquire, Relaxed, Release, SeqCst},
            },
        },
        thread,
        time::Duration,
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Could not schedule the apply worker")]
    Schedule(#[from] WorkQueueError),
    #[error("The previous commit of this pipe could not be started")]
    Stalled(#[source] IrqError),
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Manager {0} already drives output {1}")]
    AlreadyConnected(Channel, String),
    #[error("Manager {0} does not support output {1}")]
    UnsupportedOutput(Channel, String),
    #[error("Manager {0} has no output")]
    NotConnected(Channel),
    #[error("Could not arm the power transition wait")]
    Irq(#[from] IrqError),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerTransition {
    /// The channel already was in the requested state. No command was issued.
    Unchanged,
    /// The command was issued without waiting for a completion signal.
    Unsynchronized,
    Completed,
    /// The completion signal did not arrive in time. The channel is assumed to have settled.
    TimedOut,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlushStatus {
    Idle,
    TimedOut,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransKeyMode {
    Disabled,
    GfxDst,
    VidSrc,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ManagerProperty {
    TransKeyMode(TransKeyMode),
    TransKey(u32),
    BackgroundColor(u32),
    AlphaBlender(bool),
}

/// The part of a pipe that is protected by the pipe lock.
pub struct PipeState {
    channel: Channel,
    enabled: bool,
    encoder: Option<Arc<dyn Encoder>>,
    current_encoder: Option<Arc<dyn Encoder>>,
    queued: VecDeque<Arc<ApplyRequest>>,
    pending: VecDeque<Arc<ApplyRequest>>,
    stalled: Option<IrqError>,
}

impl PipeState {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    pub fn num_in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn current_encoder(&self) -> Option<&Arc<dyn Encoder>> {
        self.current_encoder.as_ref()
    }

    fn has_work(&self) -> bool {
        !self.queued.is_empty() || !self.pending.is_empty()
    }
}

/// Manager-side settings. Manager operations can arrive while the pipe lock is held by the
/// apply worker, so this has its own lock. It is never held while taking the pipe lock.
#[derive(Default)]
struct ManagerState {
    info: ManagerInfo,
    timings: VideoTimings,
    output: Option<Output>,
}

/// One display pipe and its apply pipeline.
pub struct Pipe {
    pub channel: Channel,
    pub name: &'static str,
    dispc: Arc<dyn DisplayController>,
    wq: Arc<dyn WorkQueue>,
    irq: Arc<IrqDispatcher>,
    config: Arc<ApplyConfig>,
    supported_outputs: OutputId,

    /// Whether a GO is outstanding. Shared between the apply worker and the apply irq.
    go_bit_set: AtomicBool,
    full_update: AtomicBool,
    ignore_sync_lost: AtomicBool,
    power: Mutex<PowerState>,
    errors: AtomicU64,
    error_ratelimit: RateLimit,

    apply_work: Arc<Work>,
    apply_irq: Arc<Irq>,
    error_irq: Arc<Irq>,
    crtc_apply: Arc<ApplyRequest>,
    mgr_apply: Arc<ApplyRequest>,

    mgr: Mutex<ManagerState>,
    state: Mutex<PipeState>,
}

impl Pipe {
    pub fn new(
        dispc: &Arc<dyn DisplayController>,
        wq: &Arc<dyn WorkQueue>,
        irq: &Arc<IrqDispatcher>,
        config: &Arc<ApplyConfig>,
        channel: Channel,
    ) -> Result<Arc<Self>, IrqError> {
        log::debug!("{}: creating pipe", channel);
        let power = match dispc.mgr_is_enabled(channel) {
            true => PowerState::Enabled,
            false => PowerState::Disabled,
        };
        let slf = Arc::new_cyclic(|slf: &Weak<Self>| Self {
            channel,
            name: channel.name(),
            dispc: dispc.clone(),
            wq: wq.clone(),
            irq: irq.clone(),
            config: config.clone(),
            supported_outputs: dispc.supported_outputs(channel),
            go_bit_set: AtomicBool::new(false),
            full_update: AtomicBool::new(false),
            ignore_sync_lost: AtomicBool::new(false),
            power: Mutex::new(power),
            errors: AtomicU64::new(0),
            error_ratelimit: RateLimit::new(Duration::from_secs(5), 10),
            apply_work: Work::new("apply worker", {
                let slf = slf.clone();
                move || {
                    if let Some(slf) = slf.upgrade() {
                        slf.apply_worker();
                    }
                }
            }),
            apply_irq: Irq::new("apply", dispc.vsync_irq(channel), {
                let slf = slf.clone();
                move |status| {
                    if let Some(slf) = slf.upgrade() {
                        slf.apply_irq(status);
                    }
                }
            }),
            error_irq: Irq::new("error", dispc.sync_lost_irq(channel), {
                let slf = slf.clone();
                move |status| {
                    if let Some(slf) = slf.upgrade() {
                        slf.error_irq(status);
                    }
                }
            }),
            crtc_apply: ApplyRequest::new("crtc", CrtcApply),
            mgr_apply: ApplyRequest::new("mgr", MgrApply),
            mgr: Default::default(),
            state: Mutex::new(PipeState {
                channel,
                enabled: false,
                encoder: None,
                current_encoder: None,
                queued: Default::default(),
                pending: Default::default(),
                stalled: None,
            }),
        });
        irq.register(&slf.error_irq)?;
        Ok(slf)
    }

    /// Takes the pipe lock. Submissions and DPMS changes require it.
    pub fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock()
    }

    pub fn dispc(&self) -> &Arc<dyn DisplayController> {
        &self.dispc
    }

    pub fn is_go_pending(&self) -> bool {
        self.go_bit_set.load(Acquire)
    }

    pub fn is_full_update(&self) -> bool {
        self.full_update.load(Relaxed)
    }

    pub fn power_state(&self) -> PowerState {
        *self.power.lock()
    }

    /// The number of error irqs that were reported rather than ignored.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Relaxed)
    }

    pub fn timings(&self) -> VideoTimings {
        self.mgr.lock().timings
    }

    pub fn manager_info(&self) -> ManagerInfo {
        self.mgr.lock().info
    }

    pub fn output(&self) -> Option<Output> {
        self.mgr.lock().output.clone()
    }

    /// Queues `apply` for the next batch of this pipe.
    ///
    /// Submitting a request that is already queued does not queue it twice. If no batch is in
    /// flight, the apply worker is scheduled right away. Otherwise the worker picks the request
    /// up once the outstanding commit completes.
    ///
    /// Returns [`ApplyError::Stalled`] if the previous attempt to commit this pipe failed. The
    /// request is queued regardless and the worker is scheduled to retry the commit, also when
    /// the request was already queued.
    pub fn submit(&self, state: &mut PipeState, apply: &Arc<ApplyRequest>) -> Result<(), ApplyError> {
        debug_assert_eq!(state.channel, self.channel, "submit with the state of another pipe");
        let stalled = state.stalled.take();
        let queued = apply.mark_queued();
        if queued {
            log::trace!("{}: queueing {}", self.name, apply.name());
            state.queued.push_back(apply.clone());
        }
        if (queued && state.pending.is_empty()) || stalled.is_some() {
            self.wq.queue(&self.apply_work)?;
        }
        match stalled {
            Some(e) => Err(ApplyError::Stalled(e)),
            None => Ok(()),
        }
    }

    fn schedule_apply(&self) {
        if let Err(e) = self.wq.queue(&self.apply_work) {
            log::error!(
                "{}: Could not schedule the apply worker: {}",
                self.name,
                ErrorFmt(e)
            );
        }
    }

    /// Registers the apply irq. On failure the pipe is marked as stalled.
    fn arm_apply_irq(&self, state: &mut PipeState) -> bool {
        match self.irq.register(&self.apply_irq) {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "{}: Could not register the apply irq: {}",
                    self.name,
                    ErrorFmt(&e)
                );
                state.stalled = Some(e);
                false
            }
        }
    }

    fn apply_worker(&self) {
        let mut state = self.state.lock();
        self.dispc.runtime_get();
        let _put = on_drop(|| self.dispc.runtime_put());

        // Kicked again by the apply irq once the outstanding GO completes.
        if self.go_bit_set.load(Acquire) {
            log::trace!("{}: GO outstanding, deferring", self.name);
            if !self.apply_irq.is_registered() {
                self.arm_apply_irq(&mut state);
            }
            return;
        }

        for apply in mem::take(&mut state.pending) {
            apply.post_apply(&mut ApplyCtx {
                pipe: self,
                state: &mut *state,
            });
        }

        if state.queued.is_empty() {
            return;
        }
        // A disabled channel completes without an irq. Pre-apply might enable it, in which case
        // the irq is armed after the GO.
        if self.dispc.mgr_is_enabled(self.channel) && !self.arm_apply_irq(&mut state) {
            return;
        }

        for apply in mem::take(&mut state.queued) {
            apply.pre_apply(&mut ApplyCtx {
                pipe: self,
                state: &mut *state,
            });
            apply.clear_queued();
            state.pending.push_back(apply);
        }

        if self.dispc.mgr_is_enabled(self.channel) {
            log::debug!("{}: GO", self.name);
            self.dispc.mgr_go(self.channel);
            self.go_bit_set.store(true, Release);
            if !self.apply_irq.is_registered() {
                self.arm_apply_irq(&mut state);
            }
        } else {
            log::debug!("{}: channel is disabled, completing without GO", self.name);
            self.irq.unregister(&self.apply_irq);
            self.schedule_apply();
        }
    }

    fn apply_irq(&self, _status: IrqStatus) {
        if self.go_bit_set.load(Acquire) && !self.dispc.mgr_go_busy(self.channel) {
            log::debug!("{}: apply done", self.name);
            self.irq.unregister(&self.apply_irq);
            self.go_bit_set.store(false, Release);
            self.schedule_apply();
        }
    }

    fn error_irq(&self, mut status: IrqStatus) {
        if self.ignore_sync_lost.load(SeqCst) {
            status &= !IrqStatus::SYNC_LOST_DIGIT;
            if status.is_empty() {
                return;
            }
        }
        self.errors.fetch_add(1, Relaxed);
        if let Some(missed) = self.error_ratelimit.check() {
            if missed > 0 {
                log::error!("{}: {} error reports suppressed", self.name, missed);
            }
            log::error!("{}: errors: {:?}", self.name, status);
        }
    }

    /// Powers the channel up or down and waits until the hardware confirms it.
    ///
    /// Must not be called with the pipe lock of another pipe held. A missing confirmation is
    /// logged and tolerated.
    pub fn set_enabled(&self, enable: bool) -> Result<PowerTransition, IrqError> {
        let channel = self.channel;
        let (transitional, settled) = match enable {
            true => (PowerState::Enabling, PowerState::Enabled),
            false => (PowerState::Disabling, PowerState::Disabled),
        };
        if self.dispc.mgr_is_enabled(channel) == enable {
            *self.power.lock() = settled;
            return Ok(PowerTransition::Unchanged);
        }
        let hdmi = self.mgr.lock().output.as_ref().is_some_and(|o| o.is_hdmi());
        if hdmi {
            self.dispc.mgr_enable(channel, enable);
            *self.power.lock() = settled;
            return Ok(PowerTransition::Unsynchronized);
        }
        let wait = match enable {
            true => self.irq.wait_init(self.dispc.vsync_irq(channel), 1)?,
            false => match self.dispc.framedone_irq(channel) {
                Some(framedone) => self.irq.wait_init(framedone, 1)?,
                // No frame-done on this channel. Wait for both fields.
                None => self.irq.wait_init(self.dispc.vsync_irq(channel), 2)?,
            },
        };
        let digit = channel == Channel::Digit;
        if digit {
            // The first frame after enabling the digit output loses sync.
            self.ignore_sync_lost.store(true, SeqCst);
        }
        *self.power.lock() = transitional;
        self.dispc.mgr_enable(channel, enable);
        let res = match wait.wait(self.config.power_timeout) {
            Ok(()) => PowerTransition::Completed,
            Err(e) => {
                log::error!(
                    "{}: Timeout waiting for {}: {}",
                    self.name,
                    if enable { "enable" } else { "disable" },
                    ErrorFmt(e),
                );
                PowerTransition::TimedOut
            }
        };
        *self.power.lock() = settled;
        if digit {
            self.ignore_sync_lost.store(false, SeqCst);
            fence(SeqCst);
        }
        Ok(res)
    }

    /// Switches the pipe on or off. The change takes effect with the next batch.
    pub fn dpms(&self, state: &mut PipeState, on: bool) -> Result<(), ApplyError> {
        log::debug!("{}: dpms {}", self.name, if on { "on" } else { "off" });
        if state.enabled == on {
            return Ok(());
        }
        state.enabled = on;
        self.full_update.store(true, Relaxed);
        self.submit(state, &self.crtc_apply)
    }

    pub fn attach_encoder(&self, state: &mut PipeState, encoder: Option<Arc<dyn Encoder>>) {
        state.encoder = encoder;
    }

    pub fn set_manager_property(
        &self,
        state: &mut PipeState,
        property: ManagerProperty,
    ) -> Result<(), ApplyError> {
        {
            let mut mgr = self.mgr.lock();
            let info = &mut mgr.info;
            match property {
                ManagerProperty::TransKeyMode(TransKeyMode::Disabled) => {
                    info.trans_enabled = false;
                }
                ManagerProperty::TransKeyMode(TransKeyMode::GfxDst) => {
                    info.trans_enabled = true;
                    info.trans_key_type = ColorKeyType::GfxDst;
                }
                ManagerProperty::TransKeyMode(TransKeyMode::VidSrc) => {
                    info.trans_enabled = true;
                    info.trans_key_type = ColorKeyType::VidSrc;
                }
                ManagerProperty::TransKey(key) => info.trans_key = key,
                ManagerProperty::BackgroundColor(color) => info.default_color = color,
                ManagerProperty::AlphaBlender(enabled) => info.partial_alpha_enabled = enabled,
            }
        }
        self.submit(state, &self.mgr_apply)
    }

    pub fn connect(&self, output: Output) -> Result<(), ManagerError> {
        let mut mgr = self.mgr.lock();
        if let Some(current) = &mgr.output {
            return Err(ManagerError::AlreadyConnected(
                self.channel,
                current.name.clone(),
            ));
        }
        if !self.supported_outputs.contains(output.id) {
            return Err(ManagerError::UnsupportedOutput(self.channel, output.name));
        }
        log::debug!("{}: connecting {}", self.name, output.name);
        mgr.output = Some(output);
        Ok(())
    }

    pub fn disconnect(&self) -> Result<Output, ManagerError> {
        self.mgr
            .lock()
            .output
            .take()
            .ok_or(ManagerError::NotConnected(self.channel))
    }

    /// Programs the manager and powers the channel up.
    pub fn mgr_enable(&self) -> Result<PowerTransition, ManagerError> {
        {
            let mgr = self.mgr.lock();
            self.dispc.mgr_setup(self.channel, &mgr.info);
            self.dispc.mgr_set_timings(self.channel, &mgr.timings);
        }
        Ok(self.set_enabled(true)?)
    }

    pub fn mgr_disable(&self) -> Result<PowerTransition, ManagerError> {
        Ok(self.set_enabled(false)?)
    }

    /// Records new timings. The next CRTC apply re-programs the encoder.
    pub fn set_timings(&self, timings: VideoTimings) {
        log::debug!("{}: set timings {:?}", self.name, timings);
        self.mgr.lock().timings = timings;
        self.full_update.store(true, Relaxed);
    }

    pub fn set_lcd_config(&self, config: &LcdConfig) {
        self.dispc.mgr_set_lcd_config(self.channel, config);
    }

    fn has_work(&self) -> bool {
        self.state.lock().has_work()
    }

    /// Waits until no work is queued or in flight for this pipe.
    ///
    /// Work on the work queue can arm irq-driven work and vice versa, so this polls with a
    /// bounded number of retries. Must not be called with the pipe lock held.
    pub fn flush(&self) -> FlushStatus {
        let mut loops = 0;
        loop {
            self.wq.flush();
            if !self.has_work() {
                return FlushStatus::Idle;
            }
            loops += 1;
            if loops > self.config.flush_retries {
                log::error!("{}: flush timeout", self.name);
                return FlushStatus::TimedOut;
            }
            thread::sleep(self.config.flush_interval);
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        if self.irq.unregister(&self.apply_irq) {
            log::warn!("{}: destroyed with a commit outstanding", self.name);
        }
        self.irq.unregister(&self.error_irq);
    }
}

/// Re-wires the encoder of the pipe on full updates.
struct CrtcApply;

impl ApplyOps for CrtcApply {
    fn pre_apply(&self, cx: &mut ApplyCtx<'_>) {
        let pipe = cx.pipe;
        let state = &mut *cx.state;
        let full_update = pipe.full_update.load(Relaxed);
        log::debug!(
            "{}: enabled={}, full={}",
            pipe.name,
            state.enabled,
            full_update
        );
        let encoder = match full_update {
            true => state.encoder.clone(),
            false => None,
        };
        if let Some(current) = &state.current_encoder {
            let same = encoder.as_ref().is_some_and(|e| Arc::ptr_eq(e, current));
            if !same {
                current.set_enabled(false);
            }
        }
        state.current_encoder = encoder.clone();
        if let Some(encoder) = encoder {
            encoder.set_enabled(false);
            if state.enabled {
                encoder.update(pipe.channel, &pipe.timings());
                encoder.set_enabled(true);
            }
        }
        pipe.full_update.store(false, Relaxed);
    }
}

/// Programs the manager settings.
struct MgrApply;

impl ApplyOps for MgrApply {
    fn pre_apply(&self, cx: &mut ApplyCtx<'_>) {
        let info = cx.pipe.manager_info();
        cx.pipe.dispc.mgr_setup(cx.pipe.channel, &info);
    }
}
