//! Authentication middleware.
//!
//! Requires an authenticated principal for every command it guards. The
//! default resolution reads the `user_id` from the execution metadata;
//! applications with richer credential sources install a custom resolver.
//! On success the resolved [`Principal`] is stored in the context under
//! [`AuthenticatedPrincipal`] for downstream stages and handlers.

use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::priority::Priority;
use hermes_core::{CommandContext, CommandEnvelope, ContextKey, HermesError};
use std::sync::Arc;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// The caller's identity.
    pub user_id: String,
    /// Roles granted to the caller.
    pub roles: Vec<String>,
}

/// Context key under which the authenticated principal is stored.
pub struct AuthenticatedPrincipal;

impl ContextKey for AuthenticatedPrincipal {
    type Value = Principal;
}

/// Resolver from execution context to principal.
type Resolver = Arc<dyn Fn(&CommandContext) -> Option<Principal> + Send + Sync>;

/// Middleware that rejects commands without an authenticated principal.
///
/// # Example
///
/// ```ignore
/// use hermes_middleware::stages::AuthenticationMiddleware;
///
/// // Metadata-based authentication: any command whose metadata carries a
/// // user_id passes.
/// bus.add_middleware(Arc::new(AuthenticationMiddleware::new()));
/// ```
pub struct AuthenticationMiddleware {
    resolver: Resolver,
}

impl AuthenticationMiddleware {
    /// Creates the middleware with the metadata-based resolver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(|ctx| {
                ctx.metadata().user_id().map(|user_id| Principal {
                    user_id: user_id.to_string(),
                    roles: Vec::new(),
                })
            }),
        }
    }

    /// Creates the middleware with a custom resolver.
    #[must_use]
    pub fn with_resolver(
        resolver: impl Fn(&CommandContext) -> Option<Principal> + Send + Sync + 'static,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl Default for AuthenticationMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for AuthenticationMiddleware {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn priority(&self) -> Priority {
        Priority::AUTHENTICATION
    }

    fn short_circuits(&self) -> bool {
        true
    }

    fn execute<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            match (self.resolver)(ctx) {
                Some(principal) => {
                    ctx.set::<AuthenticatedPrincipal>(principal);
                    next.run(command, ctx).await
                }
                None => Err(HermesError::authentication(
                    "no credentials attached to command",
                )),
            }
        })
    }
}
