// Opening essence files through ffmpeg's libavformat, via the ac_ffmpeg crate.
//
// MXF (the usual wrapping for IMF essence) is demuxed by ffmpeg; this module adapts the
// ac_ffmpeg demuxer to the MediaSource traits the scheduler consumes.

// adapted from https://github.com/angelcam/rust-ac-ffmpeg/blob/master/examples/demuxing.rs

use std::fs::File;
use ac_ffmpeg::format::demuxer::{Demuxer, DemuxerWithStreamInfo};
use ac_ffmpeg::format::io::IO;
use ac_ffmpeg::time::{TimeBase, Timestamp};
use bytes::Bytes;
use crate::media::{CodecParameters, MediaSource, MediaSourceOpener, Packet, StreamInfo, StreamKind};
use crate::{ImfError, Rational};


/// Opens essence files with ffmpeg's libavformat. Only local file paths are supported.
pub struct LibavSourceOpener;

struct LibavSource {
    demuxer: DemuxerWithStreamInfo<File>,
    streams: Vec<StreamInfo>,
}

fn codec_parameters(params: &ac_ffmpeg::codec::CodecParameters) -> CodecParameters {
    let kind = if params.is_video_codec() {
        StreamKind::Video
    } else if params.is_audio_codec() {
        StreamKind::Audio
    } else {
        StreamKind::Data
    };
    CodecParameters {
        kind,
        codec: params.decoder_name().map(String::from),
        ..CodecParameters::default()
    }
}

impl MediaSourceOpener for LibavSourceOpener {
    fn open(&self, url: &str) -> Result<Box<dyn MediaSource>, ImfError> {
        let input =
            File::open(url).map_err(|e| ImfError::Io(e, format!("opening essence file {url}")))?;
        let io = IO::from_seekable_read_stream(input);
        let demuxer = Demuxer::builder()
            .build(io)
            .map_err(|e| ImfError::Media(format!("building demuxer for {url}: {e}")))?
            .find_stream_info(None)
            .map_err(|(_, e)| ImfError::Media(format!("probing {url}: {e}")))?;

        let streams = demuxer
            .streams()
            .iter()
            .map(|stream| {
                let tb = stream.time_base();
                StreamInfo {
                    time_base: Rational::new(i64::from(tb.num()), i64::from(tb.den())),
                    codec: codec_parameters(&stream.codec_parameters()),
                }
            })
            .collect();

        Ok(Box::new(LibavSource { demuxer, streams }))
    }
}

impl MediaSource for LibavSource {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn seek(&mut self, position_us: i64) -> Result<(), ImfError> {
        let target = Timestamp::new(position_us, TimeBase::MICROSECONDS);
        self.demuxer
            .seek_to_timestamp(target, ac_ffmpeg::format::demuxer::SeekTarget::Precise)
            .map_err(|e| ImfError::Media(format!("seeking to {position_us}us: {e}")))
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, ImfError> {
        let packet = self
            .demuxer
            .take()
            .map_err(|e| ImfError::Media(format!("reading packet: {e}")))?;
        // Timestamps and duration stay in the source stream's time base; the scheduler
        // rewrites them.
        Ok(packet.map(|packet| Packet {
            stream_index: packet.stream_index(),
            pts: packet.pts().timestamp(),
            dts: packet.dts().timestamp(),
            duration: packet.duration().timestamp(),
            data: Bytes::copy_from_slice(packet.data()),
        }))
    }
}
