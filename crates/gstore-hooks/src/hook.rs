use async_trait::async_trait;

use crate::error::HookResult;

/// What a hook wants to happen next.
#[derive(Clone, Debug, PartialEq)]
pub enum Flow<T> {
    /// Keep the current arguments (pre) or result (post).
    Continue,
    /// Replace the current arguments (pre) or result (post).
    Override(T),
}

/// A hook that runs before the wrapped operation.
///
/// The hook may mutate the context (for example hash a password field on
/// the entity being saved) and may replace the arguments the operation
/// will receive.
#[async_trait]
pub trait PreHook<C, A>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn before(&self, ctx: &mut C, args: &A) -> HookResult<Flow<A>>;
}

/// A hook that runs after the wrapped operation succeeded.
#[async_trait]
pub trait PostHook<C, R>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn after(&self, ctx: &C, result: &R) -> HookResult<Flow<R>>;
}

// ---------------------------------------------------------------------------
// Closure adapters
// ---------------------------------------------------------------------------

/// A [`PreHook`] backed by a synchronous closure. See [`pre_fn`].
pub struct FnPreHook<F> {
    name: String,
    f: F,
}

/// A [`PostHook`] backed by a synchronous closure. See [`post_fn`].
pub struct FnPostHook<F> {
    name: String,
    f: F,
}

/// Adapt a synchronous closure into a pre hook.
pub fn pre_fn<C, A, F>(name: impl Into<String>, f: F) -> FnPreHook<F>
where
    F: Fn(&mut C, &A) -> HookResult<Flow<A>> + Send + Sync,
{
    FnPreHook {
        name: name.into(),
        f,
    }
}

/// Adapt a synchronous closure into a post hook.
pub fn post_fn<C, R, F>(name: impl Into<String>, f: F) -> FnPostHook<F>
where
    F: Fn(&C, &R) -> HookResult<Flow<R>> + Send + Sync,
{
    FnPostHook {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<C, A, F> PreHook<C, A> for FnPreHook<F>
where
    C: Send + Sync,
    A: Send + Sync,
    F: Fn(&mut C, &A) -> HookResult<Flow<A>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn before(&self, ctx: &mut C, args: &A) -> HookResult<Flow<A>> {
        (self.f)(ctx, args)
    }
}

#[async_trait]
impl<C, R, F> PostHook<C, R> for FnPostHook<F>
where
    C: Send + Sync,
    R: Send + Sync,
    F: Fn(&C, &R) -> HookResult<Flow<R>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn after(&self, ctx: &C, result: &R) -> HookResult<Flow<R>> {
        (self.f)(ctx, result)
    }
}
