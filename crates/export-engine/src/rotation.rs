//! Output rotation: deciding when to start a new output chunk.
//!
//! A context tracks what has been written to the current chunk and names
//! the next one. The policy is fixed when the context is created; a null
//! sink never rotates, whatever limit was asked for.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use framewright_media_model::{is_null_sink, ChunkLimits};

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    #[default]
    Never,
    /// Rotate once this many write-units went into the chunk.
    ByFrames(u32),
    /// Rotate once this many bytes went into the chunk.
    ByBytes(u64),
}

impl RotationPolicy {
    /// Frame-count policy; zero means no rotation.
    pub fn frames(limit: u32) -> Self {
        if limit == 0 {
            Self::Never
        } else {
            Self::ByFrames(limit)
        }
    }

    /// Byte-count policy from a megabyte limit; zero means no rotation.
    pub fn megabytes(limit: u32) -> Self {
        if limit == 0 {
            Self::Never
        } else {
            Self::ByBytes(limit as u64 * BYTES_PER_MEGABYTE)
        }
    }

    /// Policy for a set of job limits. A frame limit wins over a size limit.
    pub fn from_limits(limits: ChunkLimits) -> Self {
        if limits.frames > 0 {
            Self::frames(limits.frames)
        } else {
            Self::megabytes(limits.megabytes)
        }
    }

    pub fn rotates(self) -> bool {
        self != Self::Never
    }
}

#[derive(Debug, Clone)]
pub struct RotationContext {
    base: PathBuf,
    current: PathBuf,
    policy: RotationPolicy,
    null_sink: bool,
    chunk_index: u32,
    frames: u64,
    bytes: u64,
}

impl RotationContext {
    pub fn new(base: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        let base = base.into();
        let null_sink = is_null_sink(&base);
        Self {
            current: base.clone(),
            base,
            policy: if null_sink { RotationPolicy::Never } else { policy },
            null_sink,
            chunk_index: 0,
            frames: 0,
            bytes: 0,
        }
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn is_null_sink(&self) -> bool {
        self.null_sink
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the chunk currently open.
    pub fn current(&self) -> &Path {
        &self.current
    }

    /// Index the next generated chunk name will carry.
    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn frames_since_rotation(&self) -> u64 {
        self.frames
    }

    pub fn bytes_since_rotation(&self) -> u64 {
        self.bytes
    }

    /// Name of the next chunk to open.
    ///
    /// Without rotation this is always the base path. With rotation it is
    /// `<base>-NNN`; generating it advances the index and zeroes the
    /// per-chunk counters.
    pub fn output_name(&mut self) -> &Path {
        if self.policy.rotates() {
            let mut name = OsString::from(self.base.as_os_str());
            name.push(format!("-{:03}", self.chunk_index));
            self.current = PathBuf::from(name);
            self.chunk_index += 1;
            self.frames = 0;
            self.bytes = 0;
        }
        &self.current
    }

    /// Account one write and report whether the chunk is full.
    pub fn record(&mut self, frames: u64, bytes: u64) -> bool {
        self.frames += frames;
        self.bytes += bytes;
        match self.policy {
            RotationPolicy::Never => false,
            RotationPolicy::ByFrames(limit) => self.frames >= limit as u64,
            RotationPolicy::ByBytes(limit) => self.bytes >= limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_keeps_base_name() {
        let mut ctx = RotationContext::new("/tmp/out.avi", RotationPolicy::Never);
        assert_eq!(ctx.output_name(), Path::new("/tmp/out.avi"));
        assert_eq!(ctx.output_name(), Path::new("/tmp/out.avi"));
        assert_eq!(ctx.chunk_index(), 0);
        assert!(!ctx.record(1_000, u64::MAX / 2));
        assert_eq!(ctx.frames_since_rotation(), 1_000);
    }

    #[test]
    fn test_chunk_names_are_zero_padded() {
        let mut ctx = RotationContext::new("/tmp/out.avi", RotationPolicy::frames(4));
        assert_eq!(ctx.output_name(), Path::new("/tmp/out.avi-000"));
        assert_eq!(ctx.output_name(), Path::new("/tmp/out.avi-001"));
        assert_eq!(ctx.chunk_index(), 2);
    }

    #[test]
    fn test_name_generation_resets_counters() {
        let mut ctx = RotationContext::new("out", RotationPolicy::frames(3));
        ctx.output_name();
        assert!(!ctx.record(1, 10));
        assert!(!ctx.record(1, 10));
        assert!(ctx.record(1, 10));
        assert_eq!(ctx.bytes_since_rotation(), 30);

        ctx.output_name();
        assert_eq!(ctx.frames_since_rotation(), 0);
        assert_eq!(ctx.bytes_since_rotation(), 0);
    }

    #[test]
    fn test_null_sink_is_pinned_to_never() {
        for sink in ["", "/dev/null"] {
            let mut ctx = RotationContext::new(sink, RotationPolicy::frames(1));
            assert!(ctx.is_null_sink());
            assert_eq!(ctx.policy(), RotationPolicy::Never);
            assert!(!ctx.record(10, 10));
            assert_eq!(ctx.output_name(), Path::new(sink));
        }
    }

    #[test]
    fn test_megabytes_convert_to_bytes() {
        assert_eq!(RotationPolicy::megabytes(2), RotationPolicy::ByBytes(2 * 1024 * 1024));
        assert_eq!(RotationPolicy::megabytes(0), RotationPolicy::Never);
        assert_eq!(RotationPolicy::frames(0), RotationPolicy::Never);
        assert_eq!(
            RotationPolicy::from_limits(ChunkLimits::frames(5)),
            RotationPolicy::ByFrames(5)
        );
        assert_eq!(RotationPolicy::from_limits(ChunkLimits::default()), RotationPolicy::Never);
    }
}
