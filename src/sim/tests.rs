use {
    crate::{
        dispc::{Channel, DisplayController, IrqStatus, ManagerInfo},
        irq::{Irq, IrqDispatcher},
        sim::{SimDispc, VsyncGenerator},
    },
    std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering::Relaxed},
        },
        thread,
        time::{Duration, Instant},
    },
};

#[test]
fn disabled_channels_are_silent() {
    let sim = SimDispc::new(true);
    assert!(sim.frame().is_empty());
    sim.mgr_go(Channel::Lcd);
    sim.frame();
    // nothing scans out, so nothing absorbs the GO
    assert!(sim.mgr_go_busy(Channel::Lcd));
}

#[test]
fn go_is_absorbed_at_the_next_frame() {
    let sim = SimDispc::new(true);
    sim.mgr_enable(Channel::Lcd2, true);
    sim.mgr_go(Channel::Lcd2);
    assert!(sim.mgr_go_busy(Channel::Lcd2));
    assert_eq!(sim.frame(), IrqStatus::VSYNC2);
    assert!(!sim.mgr_go_busy(Channel::Lcd2));
    assert_eq!(sim.stats(Channel::Lcd2).go, 1);
}

#[test]
fn digit_alternates_fields_and_loses_sync_once() {
    let sim = SimDispc::new(true);
    sim.mgr_enable(Channel::Digit, true);
    let first = sim.frame();
    assert!(first.contains(IrqStatus::SYNC_LOST_DIGIT));
    let second = sim.frame();
    assert!(!second.intersects(IrqStatus::SYNC_LOST_DIGIT));
    let fields = IrqStatus::EVSYNC_EVEN | IrqStatus::EVSYNC_ODD;
    assert!(first.intersects(fields));
    assert!(second.intersects(fields));
    assert_ne!(first & fields, second & fields);
}

#[test]
fn disable_raises_framedone() {
    let sim = SimDispc::new(true);
    sim.mgr_enable(Channel::Lcd, true);
    sim.frame();
    sim.mgr_enable(Channel::Lcd, false);
    assert_eq!(sim.frame(), IrqStatus::FRAMEDONE);
    assert!(sim.frame().is_empty());
    let stats = sim.stats(Channel::Lcd);
    assert_eq!((stats.enables, stats.disables), (1, 1));
}

#[test]
fn digit_without_framedone_scans_out_two_more_fields() {
    let sim = SimDispc::new(false);
    assert_eq!(sim.framedone_irq(Channel::Digit), None);
    sim.mgr_enable(Channel::Digit, true);
    sim.frame();
    sim.mgr_enable(Channel::Digit, false);
    let vsync = sim.vsync_irq(Channel::Digit);
    assert!(sim.frame().intersects(vsync));
    assert!(sim.frame().intersects(vsync));
    assert!(sim.frame().is_empty());
}

#[test]
fn setup_is_recorded() {
    let sim = SimDispc::new(true);
    let info = ManagerInfo {
        default_color: 0x123456,
        ..Default::default()
    };
    sim.mgr_setup(Channel::Lcd3, &info);
    assert_eq!(sim.manager_info(Channel::Lcd3), info);
    assert_eq!(sim.stats(Channel::Lcd3).setups, 1);
    sim.runtime_get();
    assert_eq!(sim.runtime_refs(), 1);
    sim.runtime_put();
    assert_eq!(sim.runtime_refs(), 0);
}

#[test]
fn generator_raises_vsyncs() {
    let sim = SimDispc::new(true);
    sim.mgr_enable(Channel::Lcd, true);
    let irq = Arc::new(IrqDispatcher::new(4));
    let count = Arc::new(AtomicU32::new(0));
    let handler = Irq::new("count", IrqStatus::VSYNC, {
        let count = count.clone();
        move |_| {
            count.fetch_add(1, Relaxed);
        }
    });
    irq.register(&handler).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    {
        let _vsync = VsyncGenerator::start(&sim, &irq, Duration::from_millis(1)).unwrap();
        while count.load(Relaxed) < 3 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
    }
    let stopped = count.load(Relaxed);
    thread::sleep(Duration::from_millis(10));
    assert_eq!(count.load(Relaxed), stopped);
}
