//! Cloud service client: authentication, job polling, descriptor fetch,
//! result uploads, and the row-existence probe.

pub mod api;
pub mod auth;
pub mod types;

pub use api::ApiClient;
pub use auth::AuthManager;
pub use types::CloudJob;
