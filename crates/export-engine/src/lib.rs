//! Framewright Export Engine
//!
//! Takes decoded, filtered frame pairs and drives them through encoding
//! and multiplexing into one or more output files, splitting the output
//! into bounded chunks when asked to.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    ExportSession                      │
//! │                                                       │
//! │  FrameSource ──▶ tick loop ──▶ Encoder ──▶ Multiplexor│
//! │       ▲              │      (video, audio)   │   │    │
//! │       └── release ◀──┘                       ▼   ▼    │
//! │                   │                  RotationContext  │
//! │                   ▼                          │        │
//! │   SharedCounters  RunControl                 ▼        │
//! │   (encoded, dropped, skipped, cloned)  base-000 ...   │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! The session owns one [`Encoder`] and one [`Multiplexor`]. Counters are
//! shared with threads outside the session through an `Arc`.

pub mod control;
pub mod counters;
pub mod encoder;
pub mod multiplexor;
pub mod rotation;
pub mod runner;
pub mod session;
pub mod source;

pub use control::SharedRunControl;
pub use counters::{CounterSnapshot, SharedCounters};
pub use encoder::{EncodeOutcome, Encoder};
pub use multiplexor::Multiplexor;
pub use rotation::{RotationContext, RotationPolicy};
pub use runner::{export_async, spawn_export};
pub use session::*;
pub use source::{frame_channel, ChannelFrameSource, FrameFeeder};
