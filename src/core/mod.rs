pub mod backoff;
pub mod errors;

pub use errors::WortbotError;
