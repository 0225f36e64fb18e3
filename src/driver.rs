#[cfg(test)]
mod tests;

use {
    crate::{
        config::ApplyConfig,
        dispc::{Channel, DisplayController, IrqStatus, LcdConfig, Output, VideoTimings},
        irq::{IrqDispatcher, IrqError},
        pipe::{ApplyError, FlushStatus, ManagerError, Pipe, PowerTransition},
        workqueue::WorkQueue,
    },
    linearize::{LinearizeExt, StaticMap},
    parking_lot::Mutex,
    std::sync::Arc,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("There is no pipe for channel {0}")]
    UnknownChannel(Channel),
    #[error("Channel {0} already has a pipe")]
    PipeExists(Channel),
    #[error("The irq dispatcher returned an error")]
    Irq(#[from] IrqError),
    #[error("The overlay manager returned an error")]
    Manager(#[from] ManagerError),
    #[error("The apply pipeline returned an error")]
    Apply(#[from] ApplyError),
}

/// The top-level context of the display driver.
///
/// Owns the collaborators shared by all pipes and maps every channel to the pipe driving it.
/// Manager operations issued by outputs are routed through this map.
pub struct Driver {
    pub dispc: Arc<dyn DisplayController>,
    pub wq: Arc<dyn WorkQueue>,
    pub irq: Arc<IrqDispatcher>,
    pub config: Arc<ApplyConfig>,
    pipes: Mutex<StaticMap<Channel, Option<Arc<Pipe>>>>,
}

impl Driver {
    pub fn new(
        dispc: Arc<dyn DisplayController>,
        wq: Arc<dyn WorkQueue>,
        config: ApplyConfig,
    ) -> Self {
        Self {
            dispc,
            wq,
            irq: Arc::new(IrqDispatcher::new(config.max_irq_handlers)),
            config: Arc::new(config),
            pipes: Default::default(),
        }
    }

    pub fn create_pipe(&self, channel: Channel) -> Result<Arc<Pipe>, DriverError> {
        let mut pipes = self.pipes.lock();
        if pipes[channel].is_some() {
            return Err(DriverError::PipeExists(channel));
        }
        let pipe = Pipe::new(&self.dispc, &self.wq, &self.irq, &self.config, channel)?;
        pipes[channel] = Some(pipe.clone());
        Ok(pipe)
    }

    pub fn remove_pipe(&self, channel: Channel) -> Option<Arc<Pipe>> {
        self.pipes.lock()[channel].take()
    }

    pub fn pipe(&self, channel: Channel) -> Result<Arc<Pipe>, DriverError> {
        self.pipes.lock()[channel]
            .clone()
            .ok_or(DriverError::UnknownChannel(channel))
    }

    pub fn pipes(&self) -> Vec<Arc<Pipe>> {
        let pipes = self.pipes.lock();
        Channel::variants()
            .filter_map(|channel| pipes[channel].clone())
            .collect()
    }

    /// Entry point of the hardware interrupt.
    pub fn handle_irq(&self, status: IrqStatus) {
        self.irq.dispatch(status);
    }

    pub fn mgr_connect(&self, channel: Channel, output: Output) -> Result<(), DriverError> {
        Ok(self.pipe(channel)?.connect(output)?)
    }

    pub fn mgr_disconnect(&self, channel: Channel) -> Result<Output, DriverError> {
        Ok(self.pipe(channel)?.disconnect()?)
    }

    pub fn mgr_enable(&self, channel: Channel) -> Result<PowerTransition, DriverError> {
        Ok(self.pipe(channel)?.mgr_enable()?)
    }

    pub fn mgr_disable(&self, channel: Channel) -> Result<PowerTransition, DriverError> {
        Ok(self.pipe(channel)?.mgr_disable()?)
    }

    pub fn mgr_set_timings(
        &self,
        channel: Channel,
        timings: VideoTimings,
    ) -> Result<(), DriverError> {
        self.pipe(channel)?.set_timings(timings);
        Ok(())
    }

    pub fn mgr_set_lcd_config(
        &self,
        channel: Channel,
        config: &LcdConfig,
    ) -> Result<(), DriverError> {
        self.pipe(channel)?.set_lcd_config(config);
        Ok(())
    }

    /// Flushes every pipe. Used at mode changes and shutdown.
    pub fn flush_all(&self) -> FlushStatus {
        let mut status = FlushStatus::Idle;
        for pipe in self.pipes() {
            if pipe.flush() == FlushStatus::TimedOut {
                status = FlushStatus::TimedOut;
            }
        }
        status
    }
}
