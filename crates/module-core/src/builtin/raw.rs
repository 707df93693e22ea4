//! Plain-file multiplexor: payloads are appended to the sink in write order.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::{is_null_sink, AudioFrame, Codec, JobConfig, StreamMask, VideoFrame};
use tracing::{debug, info};

use crate::info::{ExtraData, ModuleClass, ModuleInfo};
use crate::module::{Module, MuxModule};
use crate::options::ModuleOptions;

pub(crate) const NAME: &str = "raw";

enum Output {
    Closed,
    Discard,
    File {
        writer: BufWriter<File>,
        path: PathBuf,
        bytes: u64,
    },
}

pub struct RawMuxer {
    info: ModuleInfo,
    output: Output,
}

impl RawMuxer {
    pub fn new() -> Self {
        Self {
            info: ModuleInfo::new(
                NAME,
                "write payloads to a plain file",
                ModuleClass::Multiplex,
                StreamMask::all(),
            )
            .accepting(&[Codec::Any], &[Codec::Any]),
            output: Output::Closed,
        }
    }

    /// Path of the open output file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.output {
            Output::File { path, .. } => Some(path),
            _ => None,
        }
    }

    fn append(&mut self, payload: &[u8]) -> FramewrightResult<u64> {
        match &mut self.output {
            Output::Closed => Err(FramewrightError::state("raw multiplexor is not open")),
            Output::Discard => Ok(payload.len() as u64),
            Output::File { writer, path, bytes } => {
                writer.write_all(payload).map_err(|e| {
                    FramewrightError::Other(anyhow::anyhow!(
                        "Failed to write {}: {e}",
                        path.display()
                    ))
                })?;
                *bytes += payload.len() as u64;
                Ok(payload.len() as u64)
            }
        }
    }
}

impl Default for RawMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for RawMuxer {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn configure(
        &mut self,
        options: &str,
        _job: &JobConfig,
        _extra: Option<&mut ExtraData>,
    ) -> FramewrightResult<()> {
        ModuleOptions::parse(NAME, options)?;
        Ok(())
    }

    fn stop(&mut self) -> FramewrightResult<()> {
        self.close()
    }
}

impl MuxModule for RawMuxer {
    fn open(&mut self, sink: &Path, extra: &[&ExtraData]) -> FramewrightResult<()> {
        if !matches!(self.output, Output::Closed) {
            return Err(FramewrightError::state("raw multiplexor is already open"));
        }
        if is_null_sink(sink) {
            debug!("raw multiplexor discarding output");
            self.output = Output::Discard;
            return Ok(());
        }

        if let Some(parent) = sink.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(sink)?;
        let mut writer = BufWriter::new(file);

        for header in extra.iter().filter(|x| !x.is_empty()) {
            writer.write_all(&header.data)?;
        }

        info!(path = %sink.display(), "raw output opened");
        self.output = Output::File {
            writer,
            path: sink.to_path_buf(),
            bytes: 0,
        };
        Ok(())
    }

    fn close(&mut self) -> FramewrightResult<()> {
        if let Output::File {
            mut writer,
            path,
            bytes,
        } = std::mem::replace(&mut self.output, Output::Closed)
        {
            writer.flush().map_err(|e| {
                FramewrightError::Other(anyhow::anyhow!("Failed to flush {}: {e}", path.display()))
            })?;
            debug!(path = %path.display(), bytes, "raw output closed");
        }
        Ok(())
    }

    fn write_video(&mut self, frame: &VideoFrame) -> FramewrightResult<u64> {
        self.append(&frame.data)
    }

    fn write_audio(&mut self, frame: &AudioFrame) -> FramewrightResult<u64> {
        self.append(&frame.data)
    }
}

impl Drop for RawMuxer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framewright-raw-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_writes_extra_then_payloads() {
        let dir = temp_dir("payloads");
        let sink = dir.join("nested").join("out.raw");
        let header = ExtraData::new(Codec::RawVideo, b"HDR".to_vec());

        let mut muxer = RawMuxer::new();
        muxer.open(&sink, &[&header, &ExtraData::default()]).unwrap();
        assert_eq!(muxer.path(), Some(sink.as_path()));

        let video = VideoFrame::with_data(0, 1, 1, b"vv".to_vec());
        let audio = AudioFrame::with_data(0, 48000, 1, 8, b"a".to_vec());
        assert_eq!(muxer.write_video(&video).unwrap(), 2);
        assert_eq!(muxer.write_audio(&audio).unwrap(), 1);
        muxer.close().unwrap();

        assert_eq!(std::fs::read(&sink).unwrap(), b"HDRvva");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_null_sink_discards() {
        let mut muxer = RawMuxer::new();
        muxer.open(Path::new("/dev/null"), &[]).unwrap();
        assert!(muxer.path().is_none());
        let video = VideoFrame::with_data(0, 1, 1, vec![0; 10]);
        assert_eq!(muxer.write_video(&video).unwrap(), 10);
        muxer.close().unwrap();
    }

    #[test]
    fn test_write_requires_open() {
        let mut muxer = RawMuxer::new();
        let video = VideoFrame::with_data(0, 1, 1, vec![0; 10]);
        assert!(muxer.write_video(&video).is_err());

        muxer.open(Path::new(""), &[]).unwrap();
        assert!(muxer.open(Path::new(""), &[]).is_err());
    }
}
