//! Modules compiled into every registry.

mod copy;
mod null;
mod raw;

pub use copy::CopyEncoder;
pub use null::{NullEncoder, NullMuxer};
pub use raw::RawMuxer;

use framewright_common::error::FramewrightResult;
use framewright_media_model::StreamMask;

use crate::registry::ModuleRegistry;

pub(crate) fn register_all(registry: &mut ModuleRegistry) -> FramewrightResult<()> {
    registry.register_encoder(null::NAME, StreamMask::all(), || Box::new(NullEncoder::new()))?;
    registry.register_encoder(copy::NAME, StreamMask::all(), || Box::new(CopyEncoder::new()))?;
    registry.register_muxer(null::NAME, StreamMask::all(), || Box::new(NullMuxer::new()))?;
    registry.register_muxer(raw::NAME, StreamMask::all(), || Box::new(RawMuxer::new()))?;
    Ok(())
}
