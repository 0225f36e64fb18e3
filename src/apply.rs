//! Deferred configuration changes.
//!
//! An [`ApplyRequest`] pairs a pre-commit and a post-commit callback. It is submitted to a pipe
//! with [`Pipe::submit`](crate::pipe::Pipe::submit) and runs as part of the next batch of that
//! pipe.

use {
    crate::pipe::{Pipe, PipeState},
    std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering::Relaxed},
    },
};

/// What an apply callback may touch: the pipe and its locked state.
pub struct ApplyCtx<'a> {
    pub pipe: &'a Pipe,
    pub state: &'a mut PipeState,
}

pub trait ApplyOps: Send + Sync {
    /// Runs right before the GO that commits the batch.
    fn pre_apply(&self, cx: &mut ApplyCtx<'_>);

    /// Runs once the GO of the batch has been absorbed by the hardware.
    fn post_apply(&self, cx: &mut ApplyCtx<'_>) {
        let _ = cx;
    }
}

pub struct ApplyRequest {
    name: &'static str,
    queued: AtomicBool,
    ops: Box<dyn ApplyOps>,
}

impl ApplyRequest {
    pub fn new(name: &'static str, ops: impl ApplyOps + 'static) -> Arc<Self> {
        Arc::new(Self {
            name,
            queued: AtomicBool::new(false),
            ops: Box::new(ops),
        })
    }

    pub fn from_fns<Pre, Post>(name: &'static str, pre: Pre, post: Post) -> Arc<Self>
    where
        Pre: Fn(&mut ApplyCtx<'_>) + Send + Sync + 'static,
        Post: Fn(&mut ApplyCtx<'_>) + Send + Sync + 'static,
    {
        Self::new(name, FnApply { pre, post })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the request sits in the queued list of its pipe.
    ///
    /// Only meaningful while the pipe lock is held.
    pub fn is_queued(&self) -> bool {
        self.queued.load(Relaxed)
    }

    /// Sets the queued flag. Returns false if it was already set.
    pub(crate) fn mark_queued(&self) -> bool {
        !self.queued.swap(true, Relaxed)
    }

    pub(crate) fn clear_queued(&self) {
        self.queued.store(false, Relaxed);
    }

    pub(crate) fn pre_apply(&self, cx: &mut ApplyCtx<'_>) {
        self.ops.pre_apply(cx);
    }

    pub(crate) fn post_apply(&self, cx: &mut ApplyCtx<'_>) {
        self.ops.post_apply(cx);
    }
}

struct FnApply<Pre, Post> {
    pre: Pre,
    post: Post,
}

impl<Pre, Post> ApplyOps for FnApply<Pre, Post>
where
    Pre: Fn(&mut ApplyCtx<'_>) + Send + Sync,
    Post: Fn(&mut ApplyCtx<'_>) + Send + Sync,
{
    fn pre_apply(&self, cx: &mut ApplyCtx<'_>) {
        (self.pre)(cx);
    }

    fn post_apply(&self, cx: &mut ApplyCtx<'_>) {
        (self.post)(cx);
    }
}
