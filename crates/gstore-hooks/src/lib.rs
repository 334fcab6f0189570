//! Generic before/after interceptor chains.
//!
//! A [`HookPipeline`] wraps one named operation. Pre hooks run in
//! registration order before the operation and may replace its arguments;
//! post hooks run in registration order after it and may replace its
//! result. The pipeline knows nothing about what it wraps: the context
//! (`C`), argument (`A`) and result (`R`) types are chosen by the caller.
//!
//! # Rules
//!
//! 1. Pre hooks run strictly sequentially; the first error aborts the chain
//!    and the wrapped operation must not run.
//! 2. Each pre hook sees the arguments produced by the previous one.
//! 3. Post hooks run strictly sequentially and are chained: each sees the
//!    result produced by the previous one.
//! 4. A post hook error aborts the remaining post hooks. The wrapped
//!    operation has already run at that point.

pub mod error;
pub mod hook;
pub mod pipeline;

pub use error::{HookError, HookResult};
pub use hook::{post_fn, pre_fn, Flow, FnPostHook, FnPreHook, PostHook, PreHook};
pub use pipeline::{HookPhase, HookPipeline};
