pub mod db;
pub mod jobs;
pub mod models;
pub mod outbox;
pub mod schema;
pub mod tenancy;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
