//! Framewright Module Core
//!
//! Capability contracts for the pluggable stages of an export:
//! - **Encode modules:** turn raw video/audio frames into codec payloads
//! - **Multiplex modules:** write codec payloads into container files
//! - **Registry:** name-based lookup of module constructors
//! - **Built-ins:** `null` and `copy` encoders, `null` and `raw` muxers
//!
//! Modules never see the orchestration state. They are configured once
//! from the job, driven one frame at a time, and stopped at the end.

pub mod builtin;
pub mod info;
pub mod module;
pub mod options;
pub mod registry;

pub use info::*;
pub use module::*;
pub use registry::*;
