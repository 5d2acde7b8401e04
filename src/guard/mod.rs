//! Side-effect guards applied before a handler may run: filesystem path
//! containment and outbound rate limiting.

pub mod path;
pub mod rate_limiter;

pub use path::{AccessMode, GuardedPath, PathGuard, PathKind, SecurityError};
pub use rate_limiter::{Admission, RateLimiter};
