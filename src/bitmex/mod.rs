//! BitMEX derivatives connector

mod client;
mod models;
mod stream;

pub use client::BitmexClient;
pub use stream::BitmexStreamSpec;
