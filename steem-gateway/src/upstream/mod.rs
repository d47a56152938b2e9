//! Upstream endpoint pool and retrying caller.
//!
//! The pool owns one [`steem_rpc::SteemRpcClient`] per configured endpoint
//! and tracks per-endpoint health. The caller wraps the pool with bounded
//! retries and endpoint rotation, and drops the gateway caches whenever the
//! pool actually switches endpoints.

mod caller;
mod pool;

pub use caller::RetryingCaller;
pub use pool::{EndpointSnapshot, UpstreamPool};
