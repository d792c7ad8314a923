pub mod config;
pub mod document;
pub mod error;
pub mod hosts;
pub mod options;
pub mod retry;
pub mod secret;

pub use config::ProvisionConfig;
pub use error::ProvisionError;
