use {
    crate::{
        dispc::IrqStatus,
        irq::{Irq, IrqDispatcher, IrqError},
    },
    parking_lot::Mutex,
    std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering::Relaxed},
        },
        thread,
        time::Duration,
    },
};

fn counting_irq(mask: IrqStatus, seen: &Arc<Mutex<Vec<IrqStatus>>>) -> Arc<Irq> {
    let seen = seen.clone();
    Irq::new("test", mask, move |status| seen.lock().push(status))
}

#[test]
fn dispatch_filters_by_mask() {
    let irq = IrqDispatcher::new(4);
    let seen = Arc::new(Mutex::new(vec![]));
    let handler = counting_irq(IrqStatus::VSYNC | IrqStatus::FRAMEDONE, &seen);
    irq.register(&handler).unwrap();
    irq.dispatch(IrqStatus::VSYNC2);
    irq.dispatch(IrqStatus::VSYNC | IrqStatus::VSYNC2);
    assert_eq!(*seen.lock(), vec![IrqStatus::VSYNC]);
}

#[test]
fn register_is_idempotent() {
    let irq = IrqDispatcher::new(4);
    let seen = Arc::new(Mutex::new(vec![]));
    let handler = counting_irq(IrqStatus::VSYNC, &seen);
    irq.register(&handler).unwrap();
    irq.register(&handler).unwrap();
    assert_eq!(irq.num_handlers(), 1);
    irq.dispatch(IrqStatus::VSYNC);
    assert_eq!(seen.lock().len(), 1);
    assert!(irq.unregister(&handler));
    assert!(!irq.unregister(&handler));
    irq.dispatch(IrqStatus::VSYNC);
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn capacity_is_enforced() {
    let irq = IrqDispatcher::new(1);
    let seen = Arc::new(Mutex::new(vec![]));
    let a = counting_irq(IrqStatus::VSYNC, &seen);
    let b = counting_irq(IrqStatus::VSYNC, &seen);
    irq.register(&a).unwrap();
    assert!(matches!(irq.register(&b), Err(IrqError::Exhausted(1))));
    assert!(!b.is_registered());
    assert!(matches!(
        irq.wait_init(IrqStatus::VSYNC, 1),
        Err(IrqError::Exhausted(1))
    ));
}

#[test]
fn handler_can_unregister_itself() {
    let irq = Arc::new(IrqDispatcher::new(4));
    let calls = Arc::new(AtomicU32::new(0));
    let slot = Arc::new(Mutex::new(None::<Arc<Irq>>));
    let handler = Irq::new("one-shot", IrqStatus::VSYNC, {
        let irq = irq.clone();
        let calls = calls.clone();
        let slot = slot.clone();
        move |_| {
            calls.fetch_add(1, Relaxed);
            if let Some(me) = slot.lock().as_ref() {
                irq.unregister(me);
            }
        }
    });
    *slot.lock() = Some(handler.clone());
    irq.register(&handler).unwrap();
    irq.dispatch(IrqStatus::VSYNC);
    irq.dispatch(IrqStatus::VSYNC);
    assert_eq!(calls.load(Relaxed), 1);
    assert_eq!(irq.num_handlers(), 0);
    slot.lock().take();
}

#[test]
fn wait_counts_occurrences() {
    let irq = Arc::new(IrqDispatcher::new(4));
    let wait = irq.wait_init(IrqStatus::VSYNC, 2).unwrap();
    let raiser = thread::spawn({
        let irq = irq.clone();
        move || {
            for _ in 0..2 {
                thread::sleep(Duration::from_millis(5));
                irq.dispatch(IrqStatus::VSYNC);
            }
        }
    });
    wait.wait(Duration::from_secs(5)).unwrap();
    raiser.join().unwrap();
}

#[test]
fn wait_times_out() {
    let irq = IrqDispatcher::new(4);
    let wait = irq.wait_init(IrqStatus::FRAMEDONE, 1).unwrap();
    irq.dispatch(IrqStatus::VSYNC);
    match wait.wait(Duration::from_millis(10)) {
        Err(IrqError::Timeout { mask, remaining }) => {
            assert_eq!(mask, IrqStatus::FRAMEDONE);
            assert_eq!(remaining, 1);
        }
        res => panic!("unexpected result: {:?}", res),
    }
}

#[test]
fn dropped_wait_releases_its_slot() {
    let irq = IrqDispatcher::new(1);
    let wait = irq.wait_init(IrqStatus::VSYNC, 1).unwrap();
    drop(wait);
    let wait = irq.wait_init(IrqStatus::VSYNC, 1).unwrap();
    irq.dispatch(IrqStatus::VSYNC);
    wait.wait(Duration::ZERO).unwrap();
}
