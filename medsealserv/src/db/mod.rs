pub mod models;
pub mod schema;
pub mod init;
pub mod queries;
pub mod credentials;

pub use models::*;
pub use init::{DbPool, DbResult};
pub use queries::*;
pub use credentials::DbCredentialStore;
