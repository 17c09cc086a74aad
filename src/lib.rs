//! A Rust library for demultiplexing SMPTE IMF (Interoperable Master Format) packages, as used
//! for studio-grade interchange of finished audiovisual masters.
//!
//! [IMF](https://en.wikipedia.org/wiki/Interoperable_Master_Format) is a SMPTE family of
//! standards for the business-to-business interchange of audiovisual works. An IMF package
//! contains an **Asset Map** (an XML document binding opaque asset UUIDs to file locations), one
//! or more **Composition Playlists** (CPLs, XML documents describing a timeline assembled from
//! references to those assets) and the referenced essence files (typically MXF-wrapped image and
//! audio track files).
//!
//! This library provides a validating parser for CPL and Asset Map documents, producing a fully
//! typed in-memory composition model, and a pull-based playback scheduler (see the [`demux`]
//! module) that resolves each timeline resource to its backing essence file, opens the files
//! through a pluggable media-source interface, and interleaves packets across the composition's
//! virtual tracks so that downstream consumers see a single coherent multi-stream source with
//! monotonically advancing timestamps.
//!
//!
//! ## IMF features supported
//!
//! - CPL parsing per SMPTE ST 2067-3, with Marker, Main Image 2D, and Main Audio virtual tracks
//! - Resource entry points, source durations, edit-rate inheritance, and repeat counts
//! - Asset Map parsing per SMPTE ST 429-9, aggregating over several asset map documents
//! - Playback across segment and resource boundaries, with packet timestamps rewritten into the
//!   composition's time domain
//!
//! ## Limitations / unsupported features
//!
//! - Stereoscopic 3D image virtual tracks (detected and rejected)
//! - Virtual track kinds other than Marker, Main Image 2D, and Main Audio (ignored)
//! - Seeking on the composition timeline (playback is forward-only)
//! - Packing List (PKL) validation and asset hash verification
//
//
//
// References
// OV 2067-0 - SMPTE Overview Document - Interoperable Master Format
// ST 2067-2 - SMPTE Standard - Interoperable Master Format — Core Constraints
// ST 2067-3 - SMPTE Standard - Interoperable Master Format — Composition Playlist
// ST 2067-5 - SMPTE Standard - Interoperable Master Format — Essence Component
// ST 429-9 - SMPTE Standard - D-Cinema Packaging — Asset Mapping and File Segmentation
// Netflix Photon, the usual CPL conformance checker: https://github.com/Netflix/photon


pub mod assetmap;
pub mod demux;
pub mod media;

/// If library feature `libav` is enabled, essence files can be opened through ffmpeg's
/// libavformat, via the `ac_ffmpeg` crate. Otherwise the caller supplies its own
/// [`media::MediaSourceOpener`] implementation.
#[cfg(feature = "libav")]
pub mod libav;

use std::cmp::Ordering;
use std::fmt;
use roxmltree::Node;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;


/// Scope URI attached to a CPL Marker Label when the document does not carry an explicit
/// `scope` attribute, per SMPTE ST 2067-3.
pub const SMPTE_STANDARD_MARKERS_SCOPE: &str =
    "http://www.smpte-ra.org/schemas/2067-3/2013#standard-markers";


/// Errors arising while parsing IMF documents or demultiplexing an IMF composition.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ImfError {
    /// Structural or semantic violation in a CPL or Asset Map document (missing required
    /// element, unparsable UUID/rational/integer, conflicting virtual track ids, ...).
    #[error("invalid IMF data: {0}")]
    Parsing(String),
    /// The document is not well-formed XML.
    #[error("XML syntax error: {0}")]
    Xml(#[from] roxmltree::Error),
    /// Well-formed input using an IMF feature this library deliberately does not implement.
    #[error("unsupported IMF feature: {0}")]
    Unsupported(String),
    /// No backing stream could be selected for a virtual track.
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    #[error("I/O error {1}: {0:?}")]
    Io(#[source] std::io::Error, String),
    /// Error reported by the underlying media source for an essence file.
    #[error("media source error: {0}")]
    Media(String),
    #[error("{0}")]
    Other(String),
}

// Log the single ERROR-level diagnostic for a structural violation and build the error value.
// Callers return the result directly, so each failure is reported exactly once.
pub(crate) fn invalid_data(msg: String) -> ImfError {
    error!("{msg}");
    ImfError::Parsing(msg)
}


/// An exact rational number, used for edit rates (in Hz) and for positions and durations on the
/// composition timeline (in seconds). Comparisons cross-multiply and never go through floating
/// point.
#[derive(Debug, Clone, Copy)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };

    /// A rational with the denominator normalized to be positive. The fraction is not reduced;
    /// `24000/1001` stays `24000/1001`.
    pub fn new(num: i64, den: i64) -> Rational {
        if den < 0 {
            Rational { num: -num, den: -den }
        } else {
            Rational { num, den }
        }
    }

    /// The multiplicative inverse. Inverting an edit rate yields the duration of one edit unit
    /// in seconds.
    pub fn inverse(self) -> Rational {
        Rational::new(self.den, self.num)
    }

    /// Exact sum, reduced so that repeated accumulation over a timeline does not overflow.
    pub fn add(self, other: Rational) -> Rational {
        let g = gcd(self.den, other.den);
        let num = self.num * (other.den / g) + other.num * (self.den / g);
        let den = self.den / g * other.den;
        let g = gcd(num, den);
        Rational::new(num / g, den / g)
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

impl PartialEq for Rational {
    fn eq(&self, other: &Rational) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rational {}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Rational) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    // Denominators are kept positive by construction, so cross-multiplication preserves order.
    // i128 intermediates cannot overflow for i64 operands.
    fn cmp(&self, other: &Rational) -> Ordering {
        (self.num as i128 * other.den as i128).cmp(&(other.num as i128 * self.den as i128))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}


/// Parse a UUID in the `urn:uuid:` textual form mandated by ST 2067-3 and ST 429-9, for example
/// `urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5`. Upper- and lower-case hex digits are both
/// accepted; anything else is rejected.
pub fn parse_uuid_urn(text: &str) -> Result<Uuid, ImfError> {
    let text = text.trim();
    let hex = text
        .strip_prefix("urn:uuid:")
        .ok_or_else(|| ImfError::Parsing(format!("invalid UUID: {text:?}")))?;
    let well_formed = hex.len() == 36
        && hex.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        });
    if !well_formed {
        return Err(ImfError::Parsing(format!("invalid UUID: {text:?}")));
    }
    Uuid::parse_str(hex).map_err(|_| ImfError::Parsing(format!("invalid UUID: {text:?}")))
}


// Typed readers over the XML element tree. CPL and Asset Map elements are matched by local name
// only; namespace URIs are ignored, which is what shipping IMF tooling accepts in practice.

pub(crate) fn child_by_name<'a, 'input>(
    parent: Node<'a, 'input>,
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    parent
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == local_name)
}

pub(crate) fn element_text<'a, 'input>(element: Node<'a, 'input>) -> &'a str {
    element.text().unwrap_or("").trim()
}

pub(crate) fn read_uuid(element: Node) -> Result<Uuid, ImfError> {
    parse_uuid_urn(element_text(element)).map_err(|_| {
        invalid_data(format!(
            "invalid UUID in {} element",
            element.tag_name().name()
        ))
    })
}

pub(crate) fn read_rational(element: Node) -> Result<Rational, ImfError> {
    let text = element_text(element);
    let mut tokens = text.split_whitespace();
    let rational = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(num), Some(den), None) => match (num.parse::<i64>(), den.parse::<i64>()) {
            (Ok(num), Ok(den)) if den != 0 => Some(Rational::new(num, den)),
            _ => None,
        },
        _ => None,
    };
    rational.ok_or_else(|| {
        invalid_data(format!(
            "invalid rational number in {} element: {text:?}",
            element.tag_name().name()
        ))
    })
}

pub(crate) fn read_uint(element: Node) -> Result<u64, ImfError> {
    let text = element_text(element);
    let parsed = if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse::<u64>().ok()
    } else {
        None
    };
    parsed.ok_or_else(|| {
        invalid_data(format!(
            "invalid unsigned integer in {} element: {text:?}",
            element.tag_name().name()
        ))
    })
}


// The CPL format is documented by SMPTE using an XML Schema. The elements honored here are the
// ones a demuxer needs: Id, ContentTitle, EditRate, the SegmentList/SequenceList walk, and
// within a Resource: EditRate, EntryPoint, IntrinsicDuration, SourceDuration, RepeatCount,
// TrackFileId, and Marker/{Offset,Label}. Unknown elements are ignored.

/// Fields shared by every CPL resource: a contiguous range of edit units taken from an
/// underlying source, possibly repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseResource {
    /// Edit rate in Hz; inherited from the CPL-wide rate when the Resource carries none.
    pub edit_rate: Rational,
    /// Offset in edit units at which the resource starts reading from its source.
    pub entry_point: u64,
    /// Effective duration in edit units: `SourceDuration` when present, else
    /// `IntrinsicDuration - EntryPoint`.
    pub duration: u64,
    /// Number of times the resource plays back to back; defaults to 1.
    pub repeat_count: u64,
}

/// A resource backed by a track file, referenced by the UUID the Asset Map resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFileResource {
    pub base: BaseResource,
    pub track_file_uuid: Uuid,
}

/// A labelled point-in-time within a marker resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub label: String,
    /// Label scope URI; defaults to [`SMPTE_STANDARD_MARKERS_SCOPE`].
    pub scope: String,
    /// Offset in edit units relative to the start of the enclosing resource.
    pub offset: u64,
}

/// A resource carrying timeline markers rather than essence.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerResource {
    pub base: BaseResource,
    pub markers: Vec<Marker>,
}

/// The composition's marker virtual track. At most one per CPL.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerVirtualTrack {
    pub id: Uuid,
    pub resources: Vec<MarkerResource>,
}

/// A virtual track assembled from track file resources (image or audio).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFileVirtualTrack {
    pub id: Uuid,
    pub resources: Vec<TrackFileResource>,
}

/// A fully parsed and validated IMF Composition Playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Cpl {
    pub id: Uuid,
    pub content_title: String,
    /// The CPL-wide edit rate, inherited by resources that do not declare their own.
    pub edit_rate: Rational,
    pub main_markers_track: Option<MarkerVirtualTrack>,
    pub main_image_2d_track: Option<TrackFileVirtualTrack>,
    /// Main audio virtual tracks, in first-occurrence order of their `TrackId`. Sequences
    /// sharing a `TrackId` across segments contribute resources to the same track, in segment
    /// order.
    pub main_audio_tracks: Vec<TrackFileVirtualTrack>,
}


/// Parse a CPL document into a [`Cpl`], validating its structure.
pub fn parse_cpl(xml: &str) -> Result<Cpl, ImfError> {
    let doc = roxmltree::Document::parse(xml)?;
    parse_cpl_from_document(&doc)
}

/// Parse an already-built XML tree into a [`Cpl`]. The root element must be
/// `CompositionPlaylist`.
pub fn parse_cpl_from_document(doc: &roxmltree::Document) -> Result<Cpl, ImfError> {
    let cpl_element = doc.root_element();
    if cpl_element.tag_name().name() != "CompositionPlaylist" {
        return Err(invalid_data(String::from(
            "the root element of the CPL is not CompositionPlaylist",
        )));
    }

    let id_elem = child_by_name(cpl_element, "Id")
        .ok_or_else(|| invalid_data(String::from("Id element not found in the IMF CPL")))?;
    let id = read_uuid(id_elem)?;

    let title_elem = child_by_name(cpl_element, "ContentTitle").ok_or_else(|| {
        invalid_data(String::from("ContentTitle element not found in the IMF CPL"))
    })?;
    let content_title = element_text(title_elem).to_string();

    let rate_elem = child_by_name(cpl_element, "EditRate")
        .ok_or_else(|| invalid_data(String::from("EditRate element not found in the IMF CPL")))?;
    let edit_rate = read_rational(rate_elem)?;
    if edit_rate.num <= 0 || edit_rate.den <= 0 {
        return Err(invalid_data(format!(
            "invalid EditRate {edit_rate} found in the IMF CPL"
        )));
    }

    let mut cpl = Cpl {
        id,
        content_title,
        edit_rate,
        main_markers_track: None,
        main_image_2d_track: None,
        main_audio_tracks: Vec::new(),
    };
    fill_virtual_tracks(cpl_element, &mut cpl)?;
    Ok(cpl)
}

fn fill_virtual_tracks(cpl_element: Node, cpl: &mut Cpl) -> Result<(), ImfError> {
    let segment_list = child_by_name(cpl_element, "SegmentList")
        .ok_or_else(|| invalid_data(String::from("SegmentList element missing from the CPL")))?;

    for segment in segment_list.children().filter(|n| n.is_element()) {
        let Some(sequence_list) = child_by_name(segment, "SequenceList") else {
            continue;
        };
        for sequence in sequence_list.children().filter(|n| n.is_element()) {
            match sequence.tag_name().name() {
                "MarkerSequence" => push_marker_sequence(sequence, cpl)?,
                "MainImageSequence" => push_main_image_2d_sequence(sequence, cpl)?,
                "MainAudioSequence" => push_main_audio_sequence(sequence, cpl)?,
                other => info!("unsupported Sequence kind ignored: {other}"),
            }
        }
    }
    Ok(())
}

fn read_track_id(sequence: Node) -> Result<Uuid, ImfError> {
    let elem = child_by_name(sequence, "TrackId").ok_or_else(|| {
        invalid_data(format!(
            "TrackId element missing from {} element",
            sequence.tag_name().name()
        ))
    })?;
    read_uuid(elem)
}

fn push_marker_sequence(sequence: Node, cpl: &mut Cpl) -> Result<(), ImfError> {
    let track_id = read_track_id(sequence)?;
    let cpl_edit_rate = cpl.edit_rate;

    let track = cpl.main_markers_track.get_or_insert_with(|| MarkerVirtualTrack {
        id: track_id,
        resources: Vec::new(),
    });
    if track.id != track_id {
        return Err(invalid_data(String::from(
            "multiple Marker virtual tracks found in the CPL",
        )));
    }

    let Some(resource_list) = child_by_name(sequence, "ResourceList") else {
        return Ok(());
    };
    for resource_elem in resource_list.children().filter(|n| n.is_element()) {
        track
            .resources
            .push(read_marker_resource(resource_elem, cpl_edit_rate)?);
    }
    Ok(())
}

// Stereoscopic compositions carry their image references inside Left/Right elements; any such
// descendant marks the sequence as 3D.
fn has_stereo_resources(sequence: Node) -> bool {
    sequence
        .descendants()
        .any(|n| n.is_element() && matches!(n.tag_name().name(), "Left" | "Right"))
}

fn push_main_image_2d_sequence(sequence: Node, cpl: &mut Cpl) -> Result<(), ImfError> {
    if has_stereo_resources(sequence) {
        error!("stereoscopic 3D image virtual tracks are not supported");
        return Err(ImfError::Unsupported(String::from(
            "stereoscopic 3D image virtual tracks",
        )));
    }

    let track_id = read_track_id(sequence)?;
    let cpl_edit_rate = cpl.edit_rate;

    let track = cpl.main_image_2d_track.get_or_insert_with(|| TrackFileVirtualTrack {
        id: track_id,
        resources: Vec::new(),
    });
    if track.id != track_id {
        return Err(invalid_data(String::from(
            "multiple MainImage virtual tracks found in the CPL",
        )));
    }

    let Some(resource_list) = child_by_name(sequence, "ResourceList") else {
        return Ok(());
    };
    for resource_elem in resource_list.children().filter(|n| n.is_element()) {
        track
            .resources
            .push(read_trackfile_resource(resource_elem, cpl_edit_rate)?);
    }
    Ok(())
}

fn push_main_audio_sequence(sequence: Node, cpl: &mut Cpl) -> Result<(), ImfError> {
    let track_id = read_track_id(sequence)?;
    let cpl_edit_rate = cpl.edit_rate;

    // Audio sequences sharing a TrackId across segments belong to the same virtual track.
    let index = match cpl.main_audio_tracks.iter().position(|t| t.id == track_id) {
        Some(index) => index,
        None => {
            cpl.main_audio_tracks.push(TrackFileVirtualTrack {
                id: track_id,
                resources: Vec::new(),
            });
            cpl.main_audio_tracks.len() - 1
        }
    };

    let Some(resource_list) = child_by_name(sequence, "ResourceList") else {
        return Ok(());
    };
    for resource_elem in resource_list.children().filter(|n| n.is_element()) {
        let resource = read_trackfile_resource(resource_elem, cpl_edit_rate)?;
        cpl.main_audio_tracks[index].resources.push(resource);
    }
    Ok(())
}

fn read_base_resource(
    resource_elem: Node,
    cpl_edit_rate: Rational,
) -> Result<BaseResource, ImfError> {
    let edit_rate = match child_by_name(resource_elem, "EditRate") {
        Some(elem) => read_rational(elem)?,
        None => cpl_edit_rate,
    };
    if edit_rate.num <= 0 || edit_rate.den <= 0 {
        return Err(invalid_data(format!(
            "invalid EditRate {edit_rate} found in a Resource"
        )));
    }

    let entry_point = match child_by_name(resource_elem, "EntryPoint") {
        Some(elem) => read_uint(elem)?,
        None => 0,
    };

    let intrinsic_elem = child_by_name(resource_elem, "IntrinsicDuration").ok_or_else(|| {
        invalid_data(String::from(
            "IntrinsicDuration element missing from a Resource",
        ))
    })?;
    let intrinsic_duration = read_uint(intrinsic_elem)?;
    if entry_point > intrinsic_duration {
        return Err(invalid_data(format!(
            "EntryPoint {entry_point} exceeds IntrinsicDuration {intrinsic_duration} in a Resource"
        )));
    }

    let duration = match child_by_name(resource_elem, "SourceDuration") {
        Some(elem) => {
            let source_duration = read_uint(elem)?;
            let end = entry_point.checked_add(source_duration);
            if end.is_none() || end > Some(intrinsic_duration) {
                return Err(invalid_data(format!(
                    "SourceDuration {source_duration} overruns IntrinsicDuration \
                     {intrinsic_duration} at EntryPoint {entry_point} in a Resource"
                )));
            }
            source_duration
        }
        None => intrinsic_duration - entry_point,
    };
    if duration == 0 {
        return Err(invalid_data(String::from("Resource has a zero duration")));
    }

    let repeat_count = match child_by_name(resource_elem, "RepeatCount") {
        Some(elem) => read_uint(elem)?,
        None => 1,
    };
    if repeat_count == 0 {
        return Err(invalid_data(String::from(
            "RepeatCount must be positive in a Resource",
        )));
    }

    Ok(BaseResource {
        edit_rate,
        entry_point,
        duration,
        repeat_count,
    })
}

fn read_trackfile_resource(
    resource_elem: Node,
    cpl_edit_rate: Rational,
) -> Result<TrackFileResource, ImfError> {
    let base = read_base_resource(resource_elem, cpl_edit_rate)?;
    let id_elem = child_by_name(resource_elem, "TrackFileId").ok_or_else(|| {
        invalid_data(String::from("TrackFileId element missing from a Resource"))
    })?;
    let track_file_uuid = read_uuid(id_elem)?;
    Ok(TrackFileResource {
        base,
        track_file_uuid,
    })
}

fn read_marker(marker_elem: Node) -> Result<Marker, ImfError> {
    let offset_elem = child_by_name(marker_elem, "Offset")
        .ok_or_else(|| invalid_data(String::from("Offset element not found in a Marker")))?;
    let offset = read_uint(offset_elem)?;

    let label_elem = child_by_name(marker_elem, "Label")
        .ok_or_else(|| invalid_data(String::from("Label element not found in a Marker")))?;
    let label = element_text(label_elem).to_string();
    if label.is_empty() {
        return Err(invalid_data(String::from(
            "empty Label element found in a Marker",
        )));
    }
    let scope = label_elem
        .attribute("scope")
        .unwrap_or(SMPTE_STANDARD_MARKERS_SCOPE)
        .to_string();

    Ok(Marker {
        label,
        scope,
        offset,
    })
}

fn read_marker_resource(
    resource_elem: Node,
    cpl_edit_rate: Rational,
) -> Result<MarkerResource, ImfError> {
    let base = read_base_resource(resource_elem, cpl_edit_rate)?;
    let mut markers = Vec::new();
    for marker_elem in resource_elem
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Marker")
    {
        markers.push(read_marker(marker_elem)?);
    }
    Ok(MarkerResource { base, markers })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid_urn() {
        let uuid = parse_uuid_urn("urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5").unwrap();
        assert_eq!(
            uuid.as_bytes(),
            &[
                0x87, 0x13, 0xc0, 0x20, 0x24, 0x89, 0x45, 0xf5, 0xa9, 0xf7, 0x87, 0xbe, 0x53,
                0x9e, 0x20, 0xb5
            ]
        );
        // round-trips through the canonical urn form
        assert_eq!(
            uuid.urn().to_string(),
            "urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5"
        );
        // upper-case hex is accepted, and surrounding whitespace is trimmed
        assert_eq!(
            parse_uuid_urn(" urn:uuid:8713C020-2489-45F5-A9F7-87BE539E20B5 ").unwrap(),
            uuid
        );

        assert!(parse_uuid_urn("8713c020-2489-45f5-a9f7-87be539e20b5").is_err());
        assert!(parse_uuid_urn("urn:uuid:8713c020-2489-45f5-a9f787be539e20b5").is_err());
        assert!(parse_uuid_urn("urn:uuid:8713c02x-2489-45f5-a9f7-87be539e20b5").is_err());
        assert!(parse_uuid_urn("").is_err());
    }

    #[test]
    fn test_read_rational() {
        let doc = roxmltree::Document::parse("<EditRate> 24000  1001 </EditRate>").unwrap();
        let rate = read_rational(doc.root_element()).unwrap();
        assert_eq!(rate.num, 24000);
        assert_eq!(rate.den, 1001);
        assert_eq!(format!("{} {}", rate.num, rate.den), "24000 1001");

        let doc = roxmltree::Document::parse("<EditRate>24</EditRate>").unwrap();
        assert!(read_rational(doc.root_element()).is_err());
        let doc = roxmltree::Document::parse("<EditRate>24 0</EditRate>").unwrap();
        assert!(read_rational(doc.root_element()).is_err());
        let doc = roxmltree::Document::parse("<EditRate>a b</EditRate>").unwrap();
        assert!(read_rational(doc.root_element()).is_err());
        let doc = roxmltree::Document::parse("<EditRate>24 1 1</EditRate>").unwrap();
        assert!(read_rational(doc.root_element()).is_err());
    }

    #[test]
    fn test_read_uint() {
        let doc = roxmltree::Document::parse("<Offset>5</Offset>").unwrap();
        assert_eq!(read_uint(doc.root_element()).unwrap(), 5);
        let doc = roxmltree::Document::parse("<Offset>-5</Offset>").unwrap();
        assert!(read_uint(doc.root_element()).is_err());
        let doc = roxmltree::Document::parse("<Offset>5.0</Offset>").unwrap();
        assert!(read_uint(doc.root_element()).is_err());
        let doc = roxmltree::Document::parse("<Offset></Offset>").unwrap();
        assert!(read_uint(doc.root_element()).is_err());
    }

    #[test]
    fn test_rational_ordering() {
        let half = Rational::new(1, 2);
        assert_eq!(half, Rational::new(2, 4));
        assert!(half < Rational::new(2, 3));
        let ntsc = Rational::new(24000, 1001);
        assert!(ntsc > Rational::new(23, 1));
        assert!(ntsc < Rational::new(24, 1));
        assert_eq!(Rational::ZERO.add(half), half);
        assert_eq!(half.add(half), Rational::new(1, 1));
        assert_eq!(
            Rational::new(24, 24000).add(Rational::new(1001, 24000)),
            Rational::new(1025, 24000)
        );
        // edit unit duration of a 23.976 fps rate
        assert_eq!(ntsc.inverse(), Rational::new(1001, 24000));
    }

    const MINIMAL_MARKER_CPL: &str = concat!(
        r#"<CompositionPlaylist xmlns="http://example.com">"#,
        "<Id>urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5</Id>",
        "<EditRate>24000 1001</EditRate>",
        "<SegmentList>",
        "<Segment>",
        "<SequenceList>",
        "<MarkerSequence>",
        "<TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>",
        "<ResourceList>",
        "<Resource>",
        "<IntrinsicDuration>24</IntrinsicDuration>",
        "<Marker>",
        "<Label>LFOA</Label>",
        "<Offset>5</Offset>",
        "</Marker>",
        "</Resource>",
        "</ResourceList>",
        "</MarkerSequence>",
        "</SequenceList>",
        "</Segment>",
        "</SegmentList>",
        "<ContentTitle>Hello</ContentTitle>",
        "</CompositionPlaylist>"
    );

    #[test]
    fn test_parse_minimal_marker_cpl() {
        let cpl = parse_cpl(MINIMAL_MARKER_CPL).unwrap();
        assert_eq!(
            cpl.id,
            parse_uuid_urn("urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5").unwrap()
        );
        assert_eq!(cpl.content_title, "Hello");
        assert_eq!(cpl.edit_rate, Rational::new(24000, 1001));
        assert!(cpl.main_image_2d_track.is_none());
        assert!(cpl.main_audio_tracks.is_empty());

        let markers = cpl.main_markers_track.unwrap();
        assert_eq!(
            markers.id,
            parse_uuid_urn("urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381").unwrap()
        );
        assert_eq!(markers.resources.len(), 1);
        let resource = &markers.resources[0];
        // no EditRate on the resource: inherits the CPL rate
        assert_eq!(resource.base.edit_rate, Rational::new(24000, 1001));
        assert_eq!(resource.base.entry_point, 0);
        assert_eq!(resource.base.duration, 24);
        assert_eq!(resource.base.repeat_count, 1);
        assert_eq!(resource.markers.len(), 1);
        assert_eq!(resource.markers[0].label, "LFOA");
        assert_eq!(resource.markers[0].offset, 5);
        // no scope attribute: defaults to the standard-markers URI
        assert_eq!(resource.markers[0].scope, SMPTE_STANDARD_MARKERS_SCOPE);
    }

    #[test]
    fn test_root_element_must_be_composition_playlist() {
        let err = parse_cpl("<Playlist><Id>x</Id></Playlist>").unwrap_err();
        assert!(matches!(err, ImfError::Parsing(_)));
    }

    #[test]
    fn test_missing_mandatory_elements() {
        // missing ContentTitle
        let xml = "<CompositionPlaylist>\
                   <Id>urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5</Id>\
                   <EditRate>24 1</EditRate>\
                   <SegmentList/>\
                   </CompositionPlaylist>";
        assert!(matches!(parse_cpl(xml), Err(ImfError::Parsing(_))));

        // missing EditRate
        let xml = "<CompositionPlaylist>\
                   <Id>urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5</Id>\
                   <ContentTitle>t</ContentTitle>\
                   <SegmentList/>\
                   </CompositionPlaylist>";
        assert!(matches!(parse_cpl(xml), Err(ImfError::Parsing(_))));

        // missing SegmentList
        let xml = "<CompositionPlaylist>\
                   <Id>urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5</Id>\
                   <EditRate>24 1</EditRate>\
                   <ContentTitle>t</ContentTitle>\
                   </CompositionPlaylist>";
        assert!(matches!(parse_cpl(xml), Err(ImfError::Parsing(_))));
    }

    fn cpl_with_sequences(sequences: &str) -> String {
        format!(
            "<CompositionPlaylist>\
             <Id>urn:uuid:8713c020-2489-45f5-a9f7-87be539e20b5</Id>\
             <EditRate>24 1</EditRate>\
             <ContentTitle>t</ContentTitle>\
             <SegmentList><Segment><SequenceList>{sequences}</SequenceList></Segment></SegmentList>\
             </CompositionPlaylist>"
        )
    }

    #[test]
    fn test_source_duration_overrides_derived_duration() {
        let xml = cpl_with_sequences(
            "<MainImageSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             <ResourceList><Resource>\
             <IntrinsicDuration>100</IntrinsicDuration>\
             <EntryPoint>10</EntryPoint>\
             <SourceDuration>30</SourceDuration>\
             <TrackFileId>urn:uuid:0c2c0b8a-1d59-4c05-b48b-f0c8f46d4cbb</TrackFileId>\
             </Resource></ResourceList>\
             </MainImageSequence>",
        );
        let cpl = parse_cpl(&xml).unwrap();
        let image = cpl.main_image_2d_track.unwrap();
        assert_eq!(image.resources[0].base.entry_point, 10);
        assert_eq!(image.resources[0].base.duration, 30);
    }

    #[test]
    fn test_duration_derived_from_entry_point() {
        let xml = cpl_with_sequences(
            "<MainImageSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             <ResourceList><Resource>\
             <IntrinsicDuration>100</IntrinsicDuration>\
             <EntryPoint>10</EntryPoint>\
             <TrackFileId>urn:uuid:0c2c0b8a-1d59-4c05-b48b-f0c8f46d4cbb</TrackFileId>\
             </Resource></ResourceList>\
             </MainImageSequence>",
        );
        let cpl = parse_cpl(&xml).unwrap();
        assert_eq!(
            cpl.main_image_2d_track.unwrap().resources[0].base.duration,
            90
        );
    }

    #[test]
    fn test_source_duration_overrun_rejected() {
        let xml = cpl_with_sequences(
            "<MainImageSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             <ResourceList><Resource>\
             <IntrinsicDuration>100</IntrinsicDuration>\
             <EntryPoint>80</EntryPoint>\
             <SourceDuration>30</SourceDuration>\
             <TrackFileId>urn:uuid:0c2c0b8a-1d59-4c05-b48b-f0c8f46d4cbb</TrackFileId>\
             </Resource></ResourceList>\
             </MainImageSequence>",
        );
        assert!(matches!(parse_cpl(&xml), Err(ImfError::Parsing(_))));
    }

    #[test]
    fn test_entry_point_beyond_intrinsic_duration_rejected() {
        let xml = cpl_with_sequences(
            "<MainImageSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             <ResourceList><Resource>\
             <IntrinsicDuration>100</IntrinsicDuration>\
             <EntryPoint>101</EntryPoint>\
             <TrackFileId>urn:uuid:0c2c0b8a-1d59-4c05-b48b-f0c8f46d4cbb</TrackFileId>\
             </Resource></ResourceList>\
             </MainImageSequence>",
        );
        assert!(matches!(parse_cpl(&xml), Err(ImfError::Parsing(_))));
    }

    #[test]
    fn test_resource_edit_rate_overrides_cpl_rate() {
        let xml = cpl_with_sequences(
            "<MainAudioSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             <ResourceList><Resource>\
             <EditRate>48000 1</EditRate>\
             <IntrinsicDuration>48000</IntrinsicDuration>\
             <TrackFileId>urn:uuid:0c2c0b8a-1d59-4c05-b48b-f0c8f46d4cbb</TrackFileId>\
             </Resource></ResourceList>\
             </MainAudioSequence>",
        );
        let cpl = parse_cpl(&xml).unwrap();
        assert_eq!(
            cpl.main_audio_tracks[0].resources[0].base.edit_rate,
            Rational::new(48000, 1)
        );
    }

    #[test]
    fn test_multiple_marker_tracks_rejected() {
        let xml = cpl_with_sequences(
            "<MarkerSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             </MarkerSequence>\
             <MarkerSequence>\
             <TrackId>urn:uuid:0c2c0b8a-1d59-4c05-b48b-f0c8f46d4cbb</TrackId>\
             </MarkerSequence>",
        );
        assert!(matches!(parse_cpl(&xml), Err(ImfError::Parsing(_))));
    }

    #[test]
    fn test_stereoscopic_sequence_rejected() {
        let xml = cpl_with_sequences(
            "<MainImageSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             <ResourceList><Resource>\
             <IntrinsicDuration>24</IntrinsicDuration>\
             <Left><TrackFileId>urn:uuid:0c2c0b8a-1d59-4c05-b48b-f0c8f46d4cbb</TrackFileId></Left>\
             </Resource></ResourceList>\
             </MainImageSequence>",
        );
        assert!(matches!(parse_cpl(&xml), Err(ImfError::Unsupported(_))));
    }

    #[test]
    fn test_unknown_sequence_kinds_ignored() {
        let xml = cpl_with_sequences(
            "<SubtitlesSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             </SubtitlesSequence>",
        );
        let cpl = parse_cpl(&xml).unwrap();
        assert!(cpl.main_markers_track.is_none());
        assert!(cpl.main_image_2d_track.is_none());
        assert!(cpl.main_audio_tracks.is_empty());
    }

    #[test]
    fn test_sequence_without_resource_list() {
        let xml = cpl_with_sequences(
            "<MarkerSequence>\
             <TrackId>urn:uuid:461f5424-8f6e-48a9-a385-5eda46fda381</TrackId>\
             </MarkerSequence>",
        );
        let cpl = parse_cpl(&xml).unwrap();
        assert!(cpl.main_markers_track.unwrap().resources.is_empty());
    }
}
