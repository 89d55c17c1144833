pub mod newsletter;
pub mod session;

pub use newsletter::{
    ApprovalStatus, FeatureConfig, FeatureMap, NewsletterConfig, NewsletterPayload, SampleSent,
};
pub use session::{IdentityUser, PersistedSession, Session, SessionState, TokenGrant};
