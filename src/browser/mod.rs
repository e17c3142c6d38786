pub mod credentials;
pub mod pool;
pub mod session;

pub use credentials::{domain_of, CredentialStore};
pub use pool::SessionPool;
pub use session::{Session, SessionState};
