pub mod api;
pub mod error;

#[cfg(feature = "client")]
pub mod client;
