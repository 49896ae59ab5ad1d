//! The per-request execution engine.
//!
//! One [`Engine`] per process. For every request it parses the behavior
//! chain, runs the fixed-phase pipeline, selects the matching upstream
//! subset, walks the downstream calls fail-fast through a [`Dispatch`]
//! implementation, and assembles the response tree.

mod diskfill;
mod filecheck;
mod handler;
mod perturb;
mod pipeline;
mod selector;

pub use handler::{Dispatch, Engine};
pub use pipeline::{PipelineOutcome, PipelineRun};
pub use selector::{select_upstreams, Selection};
