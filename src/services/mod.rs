pub mod error;
pub mod provider;
pub mod recovery;
pub mod session;
pub mod sso;

pub use error::ServiceError;
pub use provider::{
    HttpSessionProvider, MockSessionProvider, ProviderSession, ProviderUser, SessionProvider,
};
pub use recovery::{RecoveryCredentials, RecoveryFlow, RecoveryService};
pub use session::{SessionContext, SessionCookie};
pub use sso::SsoService;
