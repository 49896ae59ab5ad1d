//! Downstream callers.
//!
//! The [`Caller`] implements the engine's dispatch seam over both
//! framings: text targets get a GET with the behavior in `X-Behavior`,
//! binary targets get the unary RPC with the behavior in the message.
//! Cross-framing hops need no special handling: the record's framing
//! tag picks the client.

mod caller;
mod grpc;
mod http;

pub use caller::Caller;
