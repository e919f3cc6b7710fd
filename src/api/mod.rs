// Mailsift API module

pub mod accounts;
pub mod auth;
pub mod categories;
pub mod emails;
pub mod errors;
pub mod models;
pub mod oauth;
pub mod routes;

// Re-export main types needed elsewhere
pub use auth::AuthedUser;
pub use errors::ApiError;
pub use routes::configure as init_routes;
