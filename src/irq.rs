#[cfg(test)]
mod tests;

use {
    crate::dispc::IrqStatus,
    parking_lot::{Condvar, Mutex},
    smallvec::SmallVec,
    std::{
        ptr,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering::Relaxed},
        },
        time::{Duration, Instant},
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum IrqError {
    #[error("All {0} irq slots are in use")]
    Exhausted(usize),
    #[error("Timed out waiting for {mask:?} ({remaining} occurrences outstanding)")]
    Timeout { mask: IrqStatus, remaining: u32 },
}

linear_ids!(IrqWaitIds, IrqWaitId);

/// A handler that runs in interrupt context whenever one of its mask bits is raised.
///
/// Handlers must not block. In particular they must not take a pipe lock.
pub struct Irq {
    name: &'static str,
    mask: IrqStatus,
    registered: AtomicBool,
    handler: Box<dyn Fn(IrqStatus) + Send + Sync>,
}

impl Irq {
    pub fn new(
        name: &'static str,
        mask: IrqStatus,
        handler: impl Fn(IrqStatus) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            mask,
            registered: AtomicBool::new(false),
            handler: Box::new(handler),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn mask(&self) -> IrqStatus {
        self.mask
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Relaxed)
    }
}

struct WaitSlot {
    id: IrqWaitId,
    mask: IrqStatus,
    remaining: u32,
}

#[derive(Default)]
struct IrqState {
    handlers: Vec<Arc<Irq>>,
    waits: Vec<WaitSlot>,
}

impl IrqState {
    fn in_use(&self) -> usize {
        self.handlers.len() + self.waits.len()
    }

    fn remaining(&self, id: IrqWaitId) -> u32 {
        self.waits
            .iter()
            .find(|w| w.id == id)
            .map(|w| w.remaining)
            .unwrap_or(0)
    }
}

/// Routes raised irq bits to registered handlers and waiters.
///
/// The internal lock is only held for bookkeeping, never while a handler runs, so handlers may
/// unregister themselves.
pub struct IrqDispatcher {
    capacity: usize,
    state: Mutex<IrqState>,
    wait_done: Condvar,
    wait_ids: IrqWaitIds,
}

impl IrqDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Default::default(),
            wait_done: Default::default(),
            wait_ids: Default::default(),
        }
    }

    /// Registers `irq`. Registering an already registered handler is a no-op.
    pub fn register(&self, irq: &Arc<Irq>) -> Result<(), IrqError> {
        let mut state = self.state.lock();
        if irq.registered.load(Relaxed) {
            return Ok(());
        }
        if state.in_use() >= self.capacity {
            return Err(IrqError::Exhausted(self.capacity));
        }
        state.handlers.push(irq.clone());
        irq.registered.store(true, Relaxed);
        Ok(())
    }

    /// Unregisters `irq`. Returns whether it was registered.
    pub fn unregister(&self, irq: &Irq) -> bool {
        let mut state = self.state.lock();
        if !irq.registered.load(Relaxed) {
            return false;
        }
        state.handlers.retain(|h| !ptr::eq(&**h, irq));
        irq.registered.store(false, Relaxed);
        true
    }

    pub fn num_handlers(&self) -> usize {
        self.state.lock().handlers.len()
    }

    /// Arms a wait for `count` occurrences of any bit in `mask`.
    ///
    /// The wait counts occurrences from the moment it is armed, so it must be armed before the
    /// command that triggers the signal is issued.
    pub fn wait_init(&self, mask: IrqStatus, count: u32) -> Result<IrqWait<'_>, IrqError> {
        let mut state = self.state.lock();
        if state.in_use() >= self.capacity {
            return Err(IrqError::Exhausted(self.capacity));
        }
        let id = self.wait_ids.next();
        state.waits.push(WaitSlot {
            id,
            mask,
            remaining: count,
        });
        Ok(IrqWait {
            irq: self,
            id,
            mask,
        })
    }

    /// Delivers a raised irq status. Called from interrupt context.
    ///
    /// Handlers run before waiters are woken, so a woken waiter observes their effects.
    pub fn dispatch(&self, status: IrqStatus) {
        if status.is_empty() {
            return;
        }
        let handlers: SmallVec<[Arc<Irq>; 8]> = self
            .state
            .lock()
            .handlers
            .iter()
            .filter(|h| h.mask.intersects(status))
            .cloned()
            .collect();
        for irq in handlers {
            // an earlier handler in this round may have unregistered it
            if irq.is_registered() {
                (irq.handler)(status & irq.mask);
            }
        }
        let mut state = self.state.lock();
        let mut woke = false;
        for wait in &mut state.waits {
            if wait.remaining > 0 && wait.mask.intersects(status) {
                wait.remaining -= 1;
                woke |= wait.remaining == 0;
            }
        }
        if woke {
            self.wait_done.notify_all();
        }
    }
}

/// An armed wait created by [`IrqDispatcher::wait_init`].
#[must_use]
pub struct IrqWait<'a> {
    irq: &'a IrqDispatcher,
    id: IrqWaitId,
    mask: IrqStatus,
}

impl IrqWait<'_> {
    /// Blocks until the armed number of occurrences has been seen or `timeout` expires.
    pub fn wait(self, timeout: Duration) -> Result<(), IrqError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.irq.state.lock();
        loop {
            let remaining = state.remaining(self.id);
            if remaining == 0 {
                return Ok(());
            }
            if self.irq.wait_done.wait_until(&mut state, deadline).timed_out() {
                let remaining = state.remaining(self.id);
                if remaining == 0 {
                    return Ok(());
                }
                return Err(IrqError::Timeout {
                    mask: self.mask,
                    remaining,
                });
            }
        }
    }
}

impl Drop for IrqWait<'_> {
    fn drop(&mut self) {
        self.irq.state.lock().waits.retain(|w| w.id != self.id);
    }
}
