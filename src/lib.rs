//! Keeps a provider profile for every user record that qualifies as
//! a provider, in response to S3 object events.

pub mod app;
pub mod client;
pub mod conf;
pub mod key;
pub mod profile;
pub mod store;
pub mod trigger;
