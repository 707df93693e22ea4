//! Framewright Media Model
//!
//! Defines the data contracts shared by the export core and its
//! upstream collaborators:
//! - **Frames:** Video/audio buffers with a bounded attribute set
//! - **Codecs:** Tags exchanged between encoders and multiplexors
//! - **Job:** Read-only export job configuration
//! - **Source:** Frame Source and Run-Control contracts
//!
//! Frames are owned by the Frame Source. The export core takes a frame
//! for exactly one tick and always hands it back.

pub mod codec;
pub mod frame;
pub mod job;
pub mod source;

pub use codec::*;
pub use frame::*;
pub use job::*;
pub use source::*;
