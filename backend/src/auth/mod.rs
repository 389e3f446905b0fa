//! Login, role bootstrap and the session gates used by protected routes.

mod bootstrap;
mod middleware;
mod session;

pub use bootstrap::RoleBootstrap;
pub use middleware::{require_admin, require_session};
pub use session::{IssuedSession, Session, SessionIssuer};
