//! Behavior DSL for the mimic runtime.
//!
//! A behavior string describes a fault-injection plan for an entire call
//! graph. It travels with the request, and every instance picks out the
//! subset addressed to it by service name:
//!
//! ```text
//! latency=10ms,order-api:error=503:1.0,product-api:cpu=spike:2s:50
//! ```
//!
//! Entries without a `name:` prefix are global until a named entry appears,
//! after which they attach to the most recent name. A service that is named
//! anywhere in the chain uses only its named entries; otherwise it applies
//! the global ones.

mod chain;
mod error;
mod model;
mod parser;

pub use chain::{BehaviorChain, ChainEntry};
pub use error::{Error, Result};
pub use model::{
    Behavior, ByteSize, CpuSpike, CrashFile, DiskFill, ErrorFile, ErrorInjection, Latency,
    MemoryLoad,
};
pub use parser::{fmt_duration, parse_chain, parse_duration, parse_size, ChainParse};
