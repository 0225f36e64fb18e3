use {
    crate::{
        apply::ApplyRequest,
        cli::{CliChannel, RunArgs},
        config::ApplyConfig,
        dispc::{Channel, Output, OutputId, VideoTimings},
        driver::{Driver, DriverError},
        encoder::{DssEncoder, Encoder},
        pipe::{ApplyError, FlushStatus, ManagerProperty, TransKeyMode},
        sim::{SimDispc, VsyncGenerator},
        workqueue::{ThreadWorkQueue, WorkQueueError},
    },
    std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering::Relaxed},
        },
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Could not create the work queue")]
    WorkQueue(#[from] WorkQueueError),
    #[error("Could not start the vsync thread")]
    Vsync(#[source] io::Error),
    #[error("The --hdmi flag requires the tv channel")]
    HdmiChannel,
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl From<CliChannel> for Channel {
    fn from(value: CliChannel) -> Self {
        match value {
            CliChannel::Lcd => Channel::Lcd,
            CliChannel::Tv => Channel::Digit,
            CliChannel::Lcd2 => Channel::Lcd2,
            CliChannel::Lcd3 => Channel::Lcd3,
        }
    }
}

fn output(channel: Channel, hdmi: bool) -> Result<Output, RunError> {
    let (name, id) = match (channel, hdmi) {
        (Channel::Digit, true) => ("hdmi", OutputId::HDMI),
        (Channel::Digit, false) => ("venc", OutputId::VENC),
        (_, true) => return Err(RunError::HdmiChannel),
        (_, false) => ("dpi", OutputId::DPI),
    };
    Ok(Output {
        name: name.to_string(),
        id,
    })
}

fn timings() -> VideoTimings {
    VideoTimings {
        x_res: 1280,
        y_res: 720,
        pixel_clock: 74250,
        hsw: 40,
        hfp: 110,
        hbp: 220,
        vsw: 5,
        vfp: 5,
        vbp: 20,
        interlace: false,
    }
}

fn check_flush(what: &str, status: FlushStatus) {
    if status == FlushStatus::TimedOut {
        log::warn!("Pipe did not settle after {}", what);
    }
}

pub fn main(config: ApplyConfig, args: RunArgs) -> Result<(), RunError> {
    let channel = Channel::from(args.channel);
    let output = output(channel, args.hdmi)?;
    let sim = SimDispc::new(!args.no_digit_framedone);
    let wq = ThreadWorkQueue::new("dss-apply")?;
    let driver = Arc::new(Driver::new(sim.clone(), wq.clone(), config));
    let _vsync = VsyncGenerator::start(&sim, &driver.irq, driver.config.vsync_interval)
        .map_err(RunError::Vsync)?;

    let pipe = driver.create_pipe(channel)?;
    driver.mgr_connect(channel, output)?;
    driver.mgr_set_timings(channel, timings())?;
    let encoder = Arc::new(DssEncoder::new(
        &format!("{}-encoder", channel),
        Arc::downgrade(&driver),
        channel,
    ));

    {
        let mut state = pipe.lock();
        pipe.attach_encoder(&mut state, Some(encoder.clone() as Arc<dyn Encoder>));
        pipe.dpms(&mut state, true)?;
    }
    check_flush("dpms on", pipe.flush());
    log::info!("{}: on, power state {:?}", pipe.name, pipe.power_state());

    let pre = Arc::new(AtomicU32::new(0));
    let post = Arc::new(AtomicU32::new(0));
    let counter = ApplyRequest::from_fns(
        "counter",
        {
            let pre = pre.clone();
            move |_| {
                pre.fetch_add(1, Relaxed);
            }
        },
        {
            let post = post.clone();
            move |_| {
                post.fetch_add(1, Relaxed);
            }
        },
    );
    for i in 0..args.requests {
        let mut state = pipe.lock();
        let property = match i % 3 {
            0 => ManagerProperty::BackgroundColor(0x10_10_10 * (i % 16)),
            1 => ManagerProperty::TransKeyMode(TransKeyMode::GfxDst),
            _ => ManagerProperty::TransKey(i),
        };
        pipe.set_manager_property(&mut state, property)?;
        pipe.submit(&mut state, &counter)?;
    }
    check_flush("property changes", pipe.flush());

    {
        let mut state = pipe.lock();
        pipe.dpms(&mut state, false)?;
    }
    check_flush("dpms off", pipe.flush());

    let stats = sim.stats(channel);
    log::info!(
        "{}: {} GOs, {} manager setups, {} enables, {} disables",
        pipe.name,
        stats.go,
        stats.setups,
        stats.enables,
        stats.disables,
    );
    log::info!(
        "{}: counter ran {} pre-commit and {} post-commit callbacks",
        pipe.name,
        pre.load(Relaxed),
        post.load(Relaxed),
    );
    log::info!(
        "{}: {} error reports, {} runtime references outstanding, encoder enabled: {}",
        pipe.name,
        pipe.error_count(),
        sim.runtime_refs(),
        encoder.is_enabled(),
    );

    driver.remove_pipe(channel);
    wq.stop();
    Ok(())
}
