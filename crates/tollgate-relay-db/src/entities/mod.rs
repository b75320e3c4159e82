//! Database entities

pub mod account;
pub mod tunnel_session;

pub use account::Entity as Account;
pub use tunnel_session::Entity as TunnelSession;

pub mod prelude {
    pub use super::account::Entity as Account;
    pub use super::tunnel_session::Entity as TunnelSession;
}
