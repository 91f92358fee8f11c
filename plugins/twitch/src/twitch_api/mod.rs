//! Twitch Helix REST API client.
//!
//! [`HelixClient`] owns the authenticated request path and the rate-limit bookkeeping; each
//! submodule adds the typed calls and response shapes for one family of endpoints. Every call
//! returns `eyre::Result<Helix<T>>`: the outer error is a transport failure, the inner one is
//! the error envelope Twitch answered with.

pub mod ads;
pub mod channels;
pub mod charity;
pub mod chat;
pub mod client;
pub mod clips;
pub mod games;
pub mod goals;
pub mod moderation;
pub mod polls;
pub mod predictions;
pub mod raids;
pub mod ratelimit;
pub mod streams;
pub mod subscriptions;
pub mod types;
pub mod users;

pub use client::{ApiResponse, HelixClient};
pub use ratelimit::RateLimitTracker;
pub use types::{ApiError, DataEnvelope, Helix};
