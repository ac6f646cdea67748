//! Client engine for framelink connections.
//!
//! A [`Client`] owns one outbound connection. Requests are stamped with a
//! fresh `request_id` and parked in a pending table until the background
//! receive task routes the matching reply back. Everything the server sends
//! without being asked (the `welcome` greeting, peer broadcasts, late or
//! uncorrelated replies) goes to a bounded channel obtained with
//! [`Client::take_incoming`].

mod builder;
mod error;
mod messaging;
mod pending;
mod receiver;
mod runtime;

pub use builder::{ClientBuilder, DEFAULT_INCOMING_CAPACITY, DEFAULT_REQUEST_TIMEOUT};
pub use error::ClientError;
pub use runtime::Client;

#[cfg(test)]
mod tests;
