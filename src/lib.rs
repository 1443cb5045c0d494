//! Authentication and session service for the portal.
//!
//! Drives the hosted identity provider's authorization-code + PKCE flow,
//! keeps flow state and the signed-in user in a signed cookie, and resolves
//! the cookie secret from a managed secret store.

pub mod clock;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod pkce;
    pub mod signing;
}

pub mod models {
    pub mod session;
}

pub mod services {
    pub mod oauth;
    pub mod secrets;
    pub mod session;
}

pub mod handlers {
    pub mod auth;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod auth;
}

pub use config::Config;
pub use error::{AppError, Result};
pub use routes::router;
pub use state::AppState;
