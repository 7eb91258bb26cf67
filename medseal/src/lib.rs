pub mod error;
pub mod secrets;

pub mod client {
    pub mod crypto;
}

pub mod server {
    pub mod cipher;
    pub mod context;
    pub mod envelope;
    pub mod keystore;
    pub mod login;
    pub mod password;
    pub mod token;
}

pub use error::{Result, ServerError};
