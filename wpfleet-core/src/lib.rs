pub mod error;
pub mod lifecycle;
pub mod models;
pub mod naming;

pub use error::{Error, Result};
