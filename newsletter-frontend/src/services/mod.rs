pub mod access_gate;
pub mod backend_client;
pub mod context;
pub mod identity_client;
pub mod metrics;
pub mod newsletter_client;
pub mod session_manager;

#[cfg(test)]
pub(crate) mod testing;

pub use access_gate::{AccessGate, AccessLevel, ApprovalChecker, GateView};
pub use backend_client::{BackendClient, ClientError};
pub use context::{ClientContext, ContextRegistry};
pub use identity_client::{AuthAction, AuthError, GoTrueClient, IdentityProvider};
pub use newsletter_client::{NewsletterApi, NewsletterClient};
pub use session_manager::{SessionManager, SignUpResult};
