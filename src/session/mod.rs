//! Caller-side session protocol.
//!
//! A [`SessionClient`] attaches the held access token to every call, renews it once when a
//! call comes back `401`, replays the call, and drops to the logged-out state when renewal
//! is impossible. The token lives in a [`Session`], which spreads it over two mutually
//! exclusive tiers: a durable file store ("remember me") and an ephemeral in-memory one.

mod client;
mod store;
mod transport;

pub use client::{ClientError, SessionClient, SessionStatus};
pub use store::{DurableStore, EphemeralStore, Session, Tier, TokenStore};
pub use transport::{ApiCall, ApiReply, HttpTransport, Transport, TransportError};
