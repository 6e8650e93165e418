//! Built-in middleware stages.
//!
//! These stages are reference implementations of the cross-cutting
//! integration contracts: each occupies its conventional priority band and
//! consumes only the public middleware surface, so applications can replace
//! any of them with their own implementations.

mod authentication;
mod caching;
mod logging;
mod rate_limit;
mod validation;

pub use authentication::{AuthenticatedPrincipal, AuthenticationMiddleware, Principal};
pub use caching::{CacheStore, CacheableCommand, CachingMiddleware, InMemoryCache};
pub use logging::LoggingMiddleware;
pub use rate_limit::{KeyExtractor, RateLimitBuilder, RateLimitConfig, RateLimitMiddleware};
pub use validation::{FieldRules, ValidationMiddleware};
