// The media boundary: types and traits through which essence files are read.
//
// The demuxer does not decode or even parse essence containers itself; it pulls packets from a
// media source (in production, ffmpeg's libavformat through the `libav` feature) and rewrites
// their timestamps into the composition's time domain. Everything the scheduler needs from a
// container is captured here, so tests can drive the scheduler with scripted sources.

use bytes::Bytes;
use crate::{ImfError, Rational};


/// Coarse stream classification, enough to route codec parameters to the right output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamKind {
    Video,
    Audio,
    #[default]
    Data,
}

/// Codec parameters copied verbatim from an essence stream to the corresponding output stream.
/// The demuxer never interprets these beyond passing them through.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodecParameters {
    pub kind: StreamKind,
    /// Codec name as reported by the source, e.g. `jpeg2000` or `pcm_s24le`.
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// Properties of one stream within an opened essence file.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Unit of the stream's timestamps, in seconds; typically the inverse of the edit rate.
    pub time_base: Rational,
    pub codec: CodecParameters,
}

/// A demuxed packet. Timestamps and duration are expressed in the originating stream's time
/// base until the scheduler rewrites them into the composition's time domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub data: Bytes,
}

/// An opened essence file with its stream information already probed.
pub trait MediaSource {
    fn streams(&self) -> &[StreamInfo];

    /// Seek to an absolute position expressed in microseconds from the start of the file.
    fn seek(&mut self, position_us: i64) -> Result<(), ImfError>;

    /// Pull the next packet. `Ok(None)` signals the end of the file.
    fn read_packet(&mut self) -> Result<Option<Packet>, ImfError>;
}

/// Opens essence files by URI. Opening includes probing stream information, so a returned
/// [`MediaSource`] is immediately usable.
pub trait MediaSourceOpener {
    fn open(&self, url: &str) -> Result<Box<dyn MediaSource>, ImfError>;
}
