//! Local identities, browser sessions and remembered consent decisions.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod table;
mod session;
mod authorization;
mod authservice;
mod urls;

pub use principal::PublicIdentity;
pub use table::MemoryTable;
pub use session::{token_prefix, MemorySessionStore, Session, SessionEvent, SessionStore, SessionToken};
pub use authorization::{ConsumerAuthStore, MemoryConsumerAuthStore};
pub use authservice::{AuthService, Credentials, LocalAuthService};
pub use urls::IdentityUrls;
