//! Event bus for the realtime feed.
//!
//! Provides an `EventBus` that distributes `DomainEvent` messages to all
//! subscribers via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;
