use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::HookResult;
use crate::hook::{Flow, PostHook, PreHook};

/// Which side of the wrapped operation a hook runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPhase {
    Pre,
    Post,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// Ordered pre and post interceptors for one operation.
///
/// Cloning a pipeline is cheap: hooks are shared behind `Arc`.
pub struct HookPipeline<C, A, R> {
    pre: Vec<Arc<dyn PreHook<C, A>>>,
    post: Vec<Arc<dyn PostHook<C, R>>>,
}

impl<C, A, R> HookPipeline<C, A, R>
where
    C: Send + Sync,
    A: Send + Sync,
    R: Send + Sync,
{
    /// An empty pipeline.
    pub fn new() -> Self {
        Self {
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    /// Append a pre hook.
    pub fn add_pre(&mut self, hook: Arc<dyn PreHook<C, A>>) {
        self.pre.push(hook);
    }

    /// Append a post hook.
    pub fn add_post(&mut self, hook: Arc<dyn PostHook<C, R>>) {
        self.post.push(hook);
    }

    /// Number of hooks registered for a phase.
    pub fn count(&self, phase: HookPhase) -> usize {
        match phase {
            HookPhase::Pre => self.pre.len(),
            HookPhase::Post => self.post.len(),
        }
    }

    /// Returns `true` if no hook is registered in either phase.
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    /// Run every pre hook in order and return the final arguments.
    ///
    /// The first failing hook aborts the chain; its error is returned and
    /// the caller must not run the wrapped operation.
    pub async fn run_pre(&self, ctx: &mut C, args: A) -> HookResult<A> {
        let mut args = args;
        for hook in &self.pre {
            match hook.before(ctx, &args).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Override(next)) => {
                    debug!(hook = hook.name(), "pre hook overrode arguments");
                    args = next;
                }
                Err(e) => {
                    debug!(hook = hook.name(), error = %e, "pre hook aborted the chain");
                    return Err(e);
                }
            }
        }
        Ok(args)
    }

    /// Run every post hook in order, threading the result through.
    pub async fn run_post(&self, ctx: &C, result: R) -> HookResult<R> {
        let mut result = result;
        for hook in &self.post {
            match hook.after(ctx, &result).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Override(next)) => {
                    debug!(hook = hook.name(), "post hook overrode result");
                    result = next;
                }
                Err(e) => {
                    debug!(hook = hook.name(), error = %e, "post hook aborted the chain");
                    return Err(e);
                }
            }
        }
        Ok(result)
    }
}

impl<C, A, R> Default for HookPipeline<C, A, R>
where
    C: Send + Sync,
    A: Send + Sync,
    R: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, A, R> Clone for HookPipeline<C, A, R> {
    fn clone(&self) -> Self {
        Self {
            pre: self.pre.clone(),
            post: self.post.clone(),
        }
    }
}

impl<C, A, R> fmt::Debug for HookPipeline<C, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPipeline")
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .finish()
    }
}
