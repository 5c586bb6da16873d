/// Messaging channels for the lodestone runtime
///
/// A [`Wire`] pairs the server endpoint of each named channel with the
/// endpoints of every connected peer. Channels support reliable and
/// unreliable fire-and-forget, broadcast with exclusion, and timed
/// request/response invokes; inbound traffic at the server is throttled by
/// a per-sender token bucket.
pub mod channel;
pub mod error;
mod pending;
mod subscribers;
pub mod wire;

pub use channel::{ClientChannel, ServerChannel};
pub use error::NetError;
pub use subscribers::Subscription;
pub use wire::{Peer, Wire};
