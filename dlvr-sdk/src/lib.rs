//! Shared types for the dlvr order-tracking service.
//!
//! [`objects`] holds every record that crosses the wire between the server
//! and its clients. The `client` feature adds typed HTTP clients and the
//! [`client::TransportManager`] that keeps a user subscribed to their
//! notification feed.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
