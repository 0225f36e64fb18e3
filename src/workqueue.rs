
use {
    parking_lot::{Condvar, Mutex, MutexGuard},
    std::{
        collections::VecDeque,
        io,
        sync::{
            Arc,
            atomic::{
                AtomicBool,
                Ordering::{AcqRel, Acquire, Relaxed, Release},
            },
        },
        thread::{self, JoinHandle, ThreadId},
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum WorkQueueError {
    #[error("Could not spawn the worker thread")]
    Spawn(#[source] io::Error),
    #[error("The work queue has been stopped")]
    Stopped,
}

/// A deferred task that can be queued on a [`WorkQueue`].
///
/// A work item is pending at most once. The pending flag is cleared right before the item runs,
/// so the item may queue itself again from within its own body.
pub struct Work {
    name: &'static str,
    pending: AtomicBool,
    func: Box<dyn Fn() + Send + Sync>,
}

impl Work {
    pub fn new(name: &'static str, func: impl Fn() + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            name,
            pending: AtomicBool::new(false),
            func: Box::new(func),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Acquire)
    }

    fn claim(&self) -> bool {
        !self.pending.swap(true, AcqRel)
    }

    fn run(&self) {
        self.pending.store(false, Release);
        (self.func)();
    }
}

pub trait WorkQueue: Send + Sync {
    /// Queues `work` unless it is already pending.
    ///
    /// Returns whether the item was newly queued.
    fn queue(&self, work: &Arc<Work>) -> Result<bool, WorkQueueError>;

    /// Blocks until every item queued before this call has run.
    fn flush(&self);
}

#[derive(Default)]
struct State {
    items: VecDeque<Arc<Work>>,
    queued: u64,
    completed: u64,
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    new_work: Condvar,
    done: Condvar,
}

/// A work queue served by a single dedicated thread.
pub struct ThreadWorkQueue {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl ThreadWorkQueue {
    pub fn new(name: &str) -> Result<Arc<Self>, WorkQueueError> {
        let shared = Arc::new(Shared::default());
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn({
                let shared = shared.clone();
                move || work(shared)
            })
            .map_err(WorkQueueError::Spawn)?;
        Ok(Arc::new(Self {
            shared,
            thread_id: thread.thread().id(),
            thread: Mutex::new(Some(thread)),
        }))
    }

    /// Stops accepting new work, runs what is already queued, and joins the thread.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            self.shared.new_work.notify_all();
        }
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if thread::current().id() == self.thread_id {
            log::warn!("Work queue stopped from its own thread. Not joining.");
            return;
        }
        if thread.join().is_err() {
            log::error!("The work queue thread panicked");
        }
    }
}

impl Drop for ThreadWorkQueue {
    fn drop(&mut self) {
        let pending = self.shared.state.lock().items.len();
        if pending > 0 {
            log::warn!("Work queue dropped with {} pending items. Running them now.", pending);
        }
        self.stop();
    }
}

impl WorkQueue for ThreadWorkQueue {
    fn queue(&self, work: &Arc<Work>) -> Result<bool, WorkQueueError> {
        let mut state = self.shared.state.lock();
        if state.stopped {
            return Err(WorkQueueError::Stopped);
        }
        if !work.claim() {
            return Ok(false);
        }
        state.items.push_back(work.clone());
        state.queued += 1;
        self.shared.new_work.notify_one();
        Ok(true)
    }

    fn flush(&self) {
        debug_assert_ne!(
            thread::current().id(),
            self.thread_id,
            "work queue flushed from its own thread",
        );
        let mut state = self.shared.state.lock();
        let target = state.queued;
        while state.completed < target {
            self.shared.done.wait(&mut state);
        }
    }
}

fn work(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    loop {
        if let Some(work) = state.items.pop_front() {
            log::trace!("Running {}", work.name());
            MutexGuard::unlocked(&mut state, || work.run());
            state.completed += 1;
            shared.done.notify_all();
            continue;
        }
        if state.stopped {
            return;
        }
        shared.new_work.wait(&mut state);
    }
}

/// A work queue that only runs items when told to.
///
/// Used to drive the apply pipeline step by step.
#[derive(Default)]
pub struct ManualWorkQueue {
    items: Mutex<VecDeque<Arc<Work>>>,
    stopped: AtomicBool,
}

impl ManualWorkQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the oldest queued item, if any.
    pub fn run_one(&self) -> bool {
        let work = self.items.lock().pop_front();
        match work {
            Some(work) => {
                work.run();
                true
            }
            None => false,
        }
    }

    /// Runs items until the queue is empty, including items queued while running.
    pub fn run_all(&self) -> usize {
        let mut n = 0;
        while self.run_one() {
            n += 1;
        }
        n
    }

    pub fn stop(&self) {
        self.stopped.store(true, Relaxed);
    }
}

impl WorkQueue for ManualWorkQueue {
    fn queue(&self, work: &Arc<Work>) -> Result<bool, WorkQueueError> {
        if self.stopped.load(Relaxed) {
            return Err(WorkQueueError::Stopped);
        }
        let mut items = self.items.lock();
        if !work.claim() {
            return Ok(false);
        }
        items.push_back(work.clone());
        Ok(true)
    }

    fn flush(&self) {
        self.run_all();
    }
}
