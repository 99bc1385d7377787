//! Outbound HTTP adapters for the step executor.

pub mod client;
pub mod tool;

pub use client::ReqwestHttpClient;
pub use tool::HttpToolExecutor;
