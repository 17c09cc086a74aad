//! Playback of an IMF composition as a single multi-stream packet source.
//!
//! Opening a composition parses the CPL and its asset maps, resolves every timeline resource to
//! the essence file backing it, and declares one output stream per playable virtual track (the
//! main image track first, then the audio tracks in CPL order). Reading then interleaves
//! packets: each call picks the virtual track that is furthest behind on the composition
//! timeline, pulls one packet from its active resource, and rewrites the packet's timestamps
//! into the composition's time domain. Resource boundaries (including repeats) are crossed
//! transparently by closing the finished source context and opening the next one.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace, warn};
use crate::assetmap::AssetLocatorMap;
use crate::media::{CodecParameters, MediaSource, MediaSourceOpener, Packet};
use crate::{invalid_data, parse_cpl, Cpl, ImfError, Rational, TrackFileResource, TrackFileVirtualTrack};


/// Short name of the container format handled by this crate.
pub const FORMAT_NAME: &str = "imf";
/// File extension under which IMF CPL documents are found.
pub const FORMAT_EXTENSIONS: &str = "xml";
/// MIME types declared for CPL documents.
pub const FORMAT_MIME_TYPES: &str = "application/xml,text/xml";

/// Host-supplied cancellation hook, polled between packet reads. Returning `true` makes the
/// current read return end-of-stream without disturbing playback state; the next read resumes.
pub type InterruptCheck = Box<dyn Fn() -> bool>;


/// Builder for opening an IMF composition, in the spirit of a demuxer's option list. The only
/// recognized option is the asset map list; when absent, the CPL's sibling `ASSETMAP.xml` is
/// used.
pub struct ImfDemuxer {
    cpl_path: PathBuf,
    asset_map_paths: Option<String>,
    interrupt_check: Option<InterruptCheck>,
}

impl ImfDemuxer {
    /// Demux the composition described by the CPL document at `cpl_path`.
    pub fn new<P: Into<PathBuf>>(cpl_path: P) -> ImfDemuxer {
        ImfDemuxer {
            cpl_path: cpl_path.into(),
            asset_map_paths: None,
            interrupt_check: None,
        }
    }

    /// Comma-separated absolute paths of the asset map XML files binding the CPL's asset UUIDs
    /// to essence files. If not specified, the CPL sibling `ASSETMAP.xml` file is used.
    pub fn with_asset_maps(mut self, paths: &str) -> ImfDemuxer {
        self.asset_map_paths = Some(String::from(paths));
        self
    }

    /// Install a cancellation callback, polled between packet reads.
    pub fn with_interrupt_check(mut self, check: InterruptCheck) -> ImfDemuxer {
        self.interrupt_check = Some(check);
        self
    }

    /// Open the composition: parse the CPL and asset maps, resolve and probe the first resource
    /// of every playable virtual track, and declare the output streams. Essence files are
    /// opened through `opener`.
    pub fn open(self, opener: Box<dyn MediaSourceOpener>) -> Result<ImfReader, ImfError> {
        debug!("start parsing IMF CPL: {}", self.cpl_path.display());
        let cpl_text = fs::read_to_string(&self.cpl_path).map_err(|e| {
            ImfError::Io(e, format!("reading CPL {}", self.cpl_path.display()))
        })?;
        let cpl = parse_cpl(&cpl_text)?;
        debug!("parsed IMF CPL: {}", cpl.id.urn());

        let asset_map_paths: Vec<String> = match &self.asset_map_paths {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            None => {
                let sibling = self
                    .cpl_path
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join("ASSETMAP.xml");
                vec![sibling.to_string_lossy().into_owned()]
            }
        };
        if asset_map_paths.is_empty() {
            return Err(ImfError::Other(String::from("no asset map specified")));
        }

        let mut asset_map = AssetLocatorMap::new();
        for path in &asset_map_paths {
            debug!("start parsing IMF Asset Map: {path}");
            let xml = fs::read_to_string(path)
                .map_err(|e| ImfError::Io(e, format!("reading asset map {path}")))?;
            asset_map.parse_into(&xml, path)?;
        }
        debug!("parsed {} IMF Asset Maps", asset_map_paths.len());

        let mut tracks = Vec::new();
        let mut streams = Vec::new();
        if let Some(image_track) = &cpl.main_image_2d_track {
            build_virtual_track(image_track, &mut tracks, &mut streams, &asset_map, opener.as_ref())?;
        }
        for audio_track in &cpl.main_audio_tracks {
            build_virtual_track(audio_track, &mut tracks, &mut streams, &asset_map, opener.as_ref())?;
        }
        debug!("opened IMF package with {} playable tracks", tracks.len());

        Ok(ImfReader {
            cpl,
            asset_map,
            opener,
            interrupt_check: self.interrupt_check,
            tracks,
            streams,
        })
    }
}


/// One output stream, mirroring a playable virtual track of the composition.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStream {
    /// Stream index; packets carry it in [`Packet::stream_index`].
    pub id: usize,
    /// Time base of the stream's timestamps, copied from the track's first resource.
    pub time_base: Rational,
    /// Codec parameters copied from the track's first resource.
    pub codec: CodecParameters,
    /// Track duration expressed in `time_base` units.
    pub duration: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    /// The scheduler may poll this track for a packet.
    Ready,
    /// A resource boundary was crossed and the next source context is being opened.
    BetweenResources,
    /// The track reached its composition duration.
    Exhausted,
}

// One expanded timeline slot of a virtual track. A resource repeated k times contributes k
// slots sharing the same URI; the source context is open only while the slot is active.
struct ResourcePlayback {
    absolute_uri: String,
    resource: TrackFileResource,
    ctx: Option<Box<dyn MediaSource>>,
}

struct VirtualTrackPlayback {
    index: usize,
    /// Position on the composition timeline, in seconds.
    current_timestamp: Rational,
    /// Total track duration, in seconds.
    duration: Rational,
    resources: Vec<ResourcePlayback>,
    current_resource_index: usize,
    /// Next PTS to assign on this output stream, in time-base units.
    last_pts: i64,
    /// DTS of the last emitted packet, used to keep DTS monotone across resource joins.
    cur_dts: i64,
    state: TrackState,
}

impl VirtualTrackPlayback {
    fn advance(&mut self, delta: Rational) {
        self.current_timestamp = self.current_timestamp.add(delta);
        if self.current_timestamp >= self.duration {
            trace!("track {} exhausted at {}", self.index, self.current_timestamp);
            self.state = TrackState::Exhausted;
        }
    }

    fn exhausted(&self) -> bool {
        self.state == TrackState::Exhausted
    }
}


fn build_virtual_track(
    track: &TrackFileVirtualTrack,
    tracks: &mut Vec<VirtualTrackPlayback>,
    streams: &mut Vec<OutputStream>,
    asset_map: &AssetLocatorMap,
    opener: &dyn MediaSourceOpener,
) -> Result<(), ImfError> {
    if track.resources.is_empty() {
        warn!("virtual track {} has no resources and is ignored", track.id.urn());
        return Ok(());
    }

    let index = tracks.len();
    let mut resources = Vec::new();
    let mut duration = Rational::ZERO;
    for resource in &track.resources {
        let locator = asset_map.find(&resource.track_file_uuid).ok_or_else(|| {
            invalid_data(format!(
                "no asset locator found for UUID {}",
                resource.track_file_uuid.urn()
            ))
        })?;
        debug!("found locator for {}: {}", locator.uuid.urn(), locator.absolute_uri);

        resources.reserve(resource.base.repeat_count as usize);
        for _ in 0..resource.base.repeat_count {
            resources.push(ResourcePlayback {
                absolute_uri: locator.absolute_uri.clone(),
                resource: resource.clone(),
                ctx: None,
            });
            duration = duration.add(Rational::new(
                resource.base.duration as i64 * resource.base.edit_rate.den,
                resource.base.edit_rate.num,
            ));
        }
    }

    let mut playback = VirtualTrackPlayback {
        index,
        current_timestamp: Rational::ZERO,
        duration,
        resources,
        current_resource_index: 0,
        last_pts: 0,
        cur_dts: i64::MIN,
        state: TrackState::Ready,
    };

    // Open the first resource so codec parameters can be copied to the output stream; later
    // resources are opened when playback reaches them.
    ensure_resource_open(&mut playback.resources[0], opener)?;
    let (time_base, codec) = {
        let first = &playback.resources[0];
        let stream0 = first
            .ctx
            .as_ref()
            .and_then(|ctx| ctx.streams().first())
            .ok_or_else(|| {
                ImfError::StreamNotFound(format!("no streams found in {}", first.absolute_uri))
            })?;
        (stream0.time_base, stream0.codec.clone())
    };
    if time_base.num <= 0 || time_base.den <= 0 {
        return Err(ImfError::Media(format!(
            "invalid stream time base {time_base} in {}",
            playback.resources[0].absolute_uri
        )));
    }
    let stream_duration = ((duration.num as i128 * time_base.den as i128)
        / (duration.den as i128 * time_base.num as i128)) as i64;

    streams.push(OutputStream {
        id: index,
        time_base,
        codec,
        duration: stream_duration,
    });
    tracks.push(playback);
    Ok(())
}

// Idempotent: a slot whose context is already open is left alone. Opening probes the source,
// checks its time base against the resource edit rate, and seeks to the resource entry point.
fn ensure_resource_open(
    slot: &mut ResourcePlayback,
    opener: &dyn MediaSourceOpener,
) -> Result<(), ImfError> {
    if slot.ctx.is_some() {
        debug!("input context already opened for {}", slot.absolute_uri);
        return Ok(());
    }

    let mut ctx = opener.open(&slot.absolute_uri).map_err(|e| {
        error!("could not open {}: {e}", slot.absolute_uri);
        e
    })?;

    let edit_rate = slot.resource.base.edit_rate;
    if let Some(stream0) = ctx.streams().first() {
        // A mismatch is survivable: the scheduler advances by packet durations expressed in
        // the source time base, whatever it is.
        if stream0.time_base != edit_rate.inverse() {
            warn!(
                "incoherent source stream time base {} regarding resource edit rate {}",
                stream0.time_base, edit_rate
            );
        }
    }

    let entry_point_us =
        slot.resource.base.entry_point as i64 * edit_rate.den * 1_000_000 / edit_rate.num;
    if entry_point_us != 0 {
        debug!(
            "seek at resource {} entry point: {}",
            slot.absolute_uri, slot.resource.base.entry_point
        );
        ctx.seek(entry_point_us).map_err(|e| {
            error!("could not seek at {entry_point_us} on {}: {e}", slot.absolute_uri);
            e
        })?;
    }

    slot.ctx = Some(ctx);
    Ok(())
}


/// An opened IMF composition, pulled one packet at a time.
pub struct ImfReader {
    cpl: Cpl,
    asset_map: AssetLocatorMap,
    opener: Box<dyn MediaSourceOpener>,
    interrupt_check: Option<InterruptCheck>,
    tracks: Vec<VirtualTrackPlayback>,
    streams: Vec<OutputStream>,
}

impl std::fmt::Debug for ImfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImfReader")
            .field("cpl", &self.cpl)
            .field("asset_map", &self.asset_map)
            .field("streams", &self.streams)
            .finish_non_exhaustive()
    }
}

impl ImfReader {
    /// The parsed composition, including the marker virtual track (markers carry no essence
    /// and do not appear among the output streams).
    pub fn cpl(&self) -> &Cpl {
        &self.cpl
    }

    /// The aggregate asset index the composition was resolved against.
    pub fn asset_map(&self) -> &AssetLocatorMap {
        &self.asset_map
    }

    /// The declared output streams: the main image track first, then audio tracks in CPL
    /// order.
    pub fn streams(&self) -> &[OutputStream] {
        &self.streams
    }

    /// Release every open source context. Dropping the reader has the same effect.
    pub fn close(self) {
        debug!("close IMF package");
    }

    fn interrupted(&self) -> bool {
        self.interrupt_check.as_ref().map(|check| check()).unwrap_or(false)
    }

    // The track that is furthest behind on the composition timeline; ties go to the earliest
    // declared track. None once every track has played out.
    fn next_track_index(&self) -> Option<usize> {
        let mut next: Option<usize> = None;
        for (i, track) in self.tracks.iter().enumerate() {
            if track.exhausted() {
                continue;
            }
            trace!(
                "compare track {i} timestamp {} to minimum (over duration {})",
                track.current_timestamp,
                track.duration
            );
            match next {
                Some(best) if self.tracks[best].current_timestamp <= track.current_timestamp => {}
                _ => next = Some(i),
            }
        }
        next
    }

    // The expanded slot covering the track's current timestamp: the first slot whose
    // cumulative end extends at least one edit unit past the current position.
    fn locate_resource(&self, track_index: usize) -> Option<usize> {
        let track = &self.tracks[track_index];
        let edit_unit_duration = track.resources[0].resource.base.edit_rate.inverse();
        let mut cumulated = Rational::ZERO;
        for (i, slot) in track.resources.iter().enumerate() {
            cumulated = cumulated.add(Rational::new(
                slot.resource.base.duration as i64 * edit_unit_duration.num,
                edit_unit_duration.den,
            ));
            if track.current_timestamp.add(edit_unit_duration) <= cumulated {
                trace!(
                    "found resource {i} in track {track_index} for timestamp {} (cumulated {})",
                    track.current_timestamp,
                    cumulated
                );
                return Some(i);
            }
        }
        None
    }

    /// Pull the next packet of the composition. Packets carry the output stream index of their
    /// virtual track, a PTS/DTS pair rewritten into the composition's time domain, and are
    /// interleaved so every stream advances together. `Ok(None)` means every track reached its
    /// duration, or the interrupt callback fired.
    pub fn read_packet(&mut self) -> Result<Option<Packet>, ImfError> {
        loop {
            if self.interrupted() {
                return Ok(None);
            }

            let Some(track_index) = self.next_track_index() else {
                return Ok(None);
            };

            let Some(active) = self.locate_resource(track_index) else {
                let track = &self.tracks[track_index];
                let edit_unit_duration = track.resources[track.current_resource_index]
                    .resource
                    .base
                    .edit_rate
                    .inverse();
                if track.current_timestamp.add(edit_unit_duration) > track.duration {
                    return Ok(None);
                }
                error!("could not find IMF track resource to read");
                return Err(ImfError::StreamNotFound(String::from(
                    "could not find IMF track resource to read",
                )));
            };

            let opener = self.opener.as_ref();
            let track = &mut self.tracks[track_index];

            if active != track.current_resource_index {
                debug!("switch resource on track {}: re-open context", track.index);
                track.state = TrackState::BetweenResources;
                track.resources[track.current_resource_index].ctx = None;
                ensure_resource_open(&mut track.resources[active], opener)?;
                track.current_resource_index = active;
                track.state = TrackState::Ready;
            } else if track.resources[active].ctx.is_none() {
                ensure_resource_open(&mut track.resources[active], opener)?;
            }

            let slot = &mut track.resources[track.current_resource_index];
            let entry_point = slot.resource.base.entry_point as i64;
            let edit_unit_duration = slot.resource.base.edit_rate.inverse();
            let time_base = slot
                .ctx
                .as_ref()
                .and_then(|ctx| ctx.streams().first())
                .map(|s| s.time_base)
                .unwrap_or(edit_unit_duration);
            let Some(ctx) = slot.ctx.as_mut() else {
                return Err(ImfError::StreamNotFound(format!(
                    "no open context for {}",
                    slot.absolute_uri
                )));
            };
            let read = ctx.read_packet();

            match read {
                Ok(Some(mut pkt)) => {
                    trace!(
                        "got packet: pts={}, dts={}, duration={}, stream_index={}",
                        pkt.pts,
                        pkt.dts,
                        pkt.duration,
                        pkt.stream_index
                    );
                    // DTS may regress when a fresh source context starts over at zero; pin it
                    // to the stream's high-water mark before shifting out the entry point.
                    if pkt.dts < track.cur_dts && track.last_pts > 0 {
                        pkt.dts = track.cur_dts;
                    }
                    pkt.dts -= entry_point;
                    pkt.pts = track.last_pts;
                    pkt.stream_index = track.index;

                    track.advance(Rational::new(
                        pkt.duration * time_base.num,
                        time_base.den,
                    ));
                    track.last_pts += pkt.duration;
                    track.cur_dts = pkt.dts;
                    return Ok(Some(pkt));
                }
                Ok(None) => {
                    // The source ran dry inside the resource. Advance one edit unit so a
                    // resource that yields no packets cannot stall the timeline, then pick
                    // the next track.
                    track.advance(edit_unit_duration);
                    continue;
                }
                Err(e) => {
                    error!("could not get packet from track {}: {e}", track.index);
                    return Err(e);
                }
            }
        }
    }
}
