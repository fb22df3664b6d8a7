mod client;
mod error;

pub use client::UpstreamClient;
pub use error::UpstreamError;
