pub mod admin;
pub mod auth;
pub mod http;
pub mod pkce;

pub use admin::AdminAuthAdapter;
pub use auth::AuthRestAdapter;
pub use http::ReqwestTransport;
