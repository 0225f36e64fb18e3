use {
    crate::{
        config::ApplyConfig,
        dispc::{Channel, DisplayController, IrqStatus, LcdConfig, Output, OutputId, VideoTimings},
        driver::{Driver, DriverError},
        encoder::{DssEncoder, Encoder},
        pipe::{FlushStatus, ManagerError, PowerTransition},
        sim::{SimDispc, VsyncGenerator},
        workqueue::{ManualWorkQueue, ThreadWorkQueue},
    },
    std::{sync::Arc, time::Duration},
};

fn manual_driver() -> (Arc<SimDispc>, Arc<ManualWorkQueue>, Arc<Driver>) {
    let sim = SimDispc::new(true);
    let wq = ManualWorkQueue::new();
    let driver = Arc::new(Driver::new(sim.clone(), wq.clone(), ApplyConfig::default()));
    (sim, wq, driver)
}

fn timings() -> VideoTimings {
    VideoTimings {
        x_res: 640,
        y_res: 480,
        pixel_clock: 25175,
        hsw: 96,
        hfp: 16,
        hbp: 48,
        vsw: 2,
        vfp: 10,
        vbp: 33,
        interlace: false,
    }
}

#[test]
fn pipes_are_registered_per_channel() {
    let (_sim, _wq, driver) = manual_driver();
    let lcd = driver.create_pipe(Channel::Lcd).unwrap();
    assert!(matches!(
        driver.create_pipe(Channel::Lcd),
        Err(DriverError::PipeExists(Channel::Lcd))
    ));
    driver.create_pipe(Channel::Lcd3).unwrap();
    assert!(Arc::ptr_eq(&driver.pipe(Channel::Lcd).unwrap(), &lcd));
    assert!(matches!(
        driver.pipe(Channel::Digit),
        Err(DriverError::UnknownChannel(Channel::Digit))
    ));
    let channels: Vec<_> = driver.pipes().iter().map(|p| p.channel).collect();
    assert_eq!(channels, [Channel::Lcd, Channel::Lcd3]);
    assert!(driver.remove_pipe(Channel::Lcd).is_some());
    assert!(driver.remove_pipe(Channel::Lcd).is_none());
    assert!(driver.pipe(Channel::Lcd).is_err());
}

#[test]
fn manager_ops_on_unknown_channel_fail() {
    let (_sim, _wq, driver) = manual_driver();
    let output = Output {
        name: "venc".to_string(),
        id: OutputId::VENC,
    };
    assert!(matches!(
        driver.mgr_connect(Channel::Digit, output),
        Err(DriverError::UnknownChannel(Channel::Digit))
    ));
    assert!(matches!(
        driver.mgr_enable(Channel::Lcd2),
        Err(DriverError::UnknownChannel(Channel::Lcd2))
    ));
    assert!(driver.mgr_set_timings(Channel::Lcd, timings()).is_err());
}

#[test]
fn manager_ops_reach_the_pipe() {
    let (sim, _wq, driver) = manual_driver();
    let pipe = driver.create_pipe(Channel::Lcd2).unwrap();
    let dpi = Output {
        name: "dpi".to_string(),
        id: OutputId::DPI,
    };
    driver.mgr_connect(Channel::Lcd2, dpi.clone()).unwrap();
    assert!(matches!(
        driver.mgr_connect(Channel::Lcd2, dpi.clone()),
        Err(DriverError::Manager(ManagerError::AlreadyConnected(..)))
    ));
    driver.mgr_set_timings(Channel::Lcd2, timings()).unwrap();
    assert_eq!(pipe.timings(), timings());
    assert!(pipe.is_full_update());

    let config = LcdConfig {
        stall_mode: false,
        fifo_handcheck: true,
        video_port_width: 24,
        lcden_sig_polarity: false,
    };
    driver.mgr_set_lcd_config(Channel::Lcd2, &config).unwrap();
    assert_eq!(sim.lcd_config(Channel::Lcd2), config);

    {
        let _vsync = VsyncGenerator::start(&sim, &driver.irq, Duration::from_millis(1)).unwrap();
        assert_eq!(
            driver.mgr_enable(Channel::Lcd2).unwrap(),
            PowerTransition::Completed
        );
        assert_eq!(sim.programmed_timings(Channel::Lcd2), timings());
        assert_eq!(sim.stats(Channel::Lcd2).setups, 1);
        assert_eq!(
            driver.mgr_enable(Channel::Lcd2).unwrap(),
            PowerTransition::Unchanged
        );
        assert_eq!(
            driver.mgr_disable(Channel::Lcd2).unwrap(),
            PowerTransition::Completed
        );
    }
    assert_eq!(driver.mgr_disconnect(Channel::Lcd2).unwrap(), dpi);
}

#[test]
fn irqs_reach_every_pipe() {
    let (_sim, _wq, driver) = manual_driver();
    let lcd = driver.create_pipe(Channel::Lcd).unwrap();
    let tv = driver.create_pipe(Channel::Digit).unwrap();
    driver.handle_irq(IrqStatus::SYNC_LOST | IrqStatus::SYNC_LOST_DIGIT);
    driver.handle_irq(IrqStatus::SYNC_LOST_DIGIT);
    assert_eq!(lcd.error_count(), 1);
    assert_eq!(tv.error_count(), 2);
}

#[test]
fn encoder_powers_the_manager() {
    let sim = SimDispc::new(true);
    let wq = ThreadWorkQueue::new("apply test").unwrap();
    let driver = Arc::new(Driver::new(sim.clone(), wq.clone(), ApplyConfig::default()));
    let _vsync = VsyncGenerator::start(&sim, &driver.irq, Duration::from_millis(1)).unwrap();
    let pipe = driver.create_pipe(Channel::Digit).unwrap();
    driver
        .mgr_connect(
            Channel::Digit,
            Output {
                name: "venc".to_string(),
                id: OutputId::VENC,
            },
        )
        .unwrap();
    driver.mgr_set_timings(Channel::Digit, timings()).unwrap();
    let encoder = Arc::new(DssEncoder::new(
        "venc",
        Arc::downgrade(&driver),
        Channel::Digit,
    ));

    {
        let mut state = pipe.lock();
        pipe.attach_encoder(&mut state, Some(encoder.clone() as Arc<dyn Encoder>));
        pipe.dpms(&mut state, true).unwrap();
    }
    assert_eq!(driver.flush_all(), FlushStatus::Idle);
    assert!(encoder.is_enabled());
    assert!(sim.mgr_is_enabled(Channel::Digit));
    assert_eq!(sim.programmed_timings(Channel::Digit), timings());
    assert!(sim.stats(Channel::Digit).go >= 1);
    assert_eq!(pipe.error_count(), 0);

    {
        let mut state = pipe.lock();
        pipe.dpms(&mut state, false).unwrap();
    }
    assert_eq!(pipe.flush(), FlushStatus::Idle);
    assert!(!encoder.is_enabled());
    assert!(!sim.mgr_is_enabled(Channel::Digit));
    assert_eq!(sim.stats(Channel::Digit).disables, 1);
    assert_eq!(sim.runtime_refs(), 0);
    wq.stop();
}
