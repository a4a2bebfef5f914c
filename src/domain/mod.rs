mod error;
pub mod models;

pub use error::*;
pub use models::*;
