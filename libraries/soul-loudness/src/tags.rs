//! ReplayGain tag writing
//!
//! Supported containers, picked by file extension:
//! - MP3: ID3v2 TXXX frames with "REPLAYGAIN_*" descriptions
//! - MP4/M4A/M4V/MOV: iTunes-style ----:com.apple.iTunes:* atoms
//! - OGG Vorbis: REPLAYGAIN_* comments
//! - Opus: R128_TRACK_GAIN comment (Q7.8, RFC 7845)

use crate::error::{LoudnessError, Result};
use crate::replaygain::TrackGain;
use lofty::{ItemKey, Probe, Tag, TagExt, TaggedFileExt};
use std::path::Path;
use tracing::debug;

/// How tags are laid out for a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayGainFormat {
    /// Gain and peak as text (MP3, MP4, OGG)
    ReplayGain,
    /// Fixed-point gain only (Opus)
    R128,
}

impl ReplayGainFormat {
    /// Pick the layout for a path, `None` when tagging is unsupported
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp3" | "mp4" | "m4a" | "m4v" | "mov" | "ogg" => Some(Self::ReplayGain),
            "opus" => Some(Self::R128),
            _ => None,
        }
    }
}

/// Write track ReplayGain tags to an audio file
///
/// Existing non-ReplayGain tags are preserved.
pub fn write_replaygain_tags<P: AsRef<Path>>(path: P, gain: &TrackGain) -> Result<()> {
    let path = path.as_ref();

    let format = ReplayGainFormat::for_path(path).ok_or_else(|| {
        LoudnessError::UnsupportedFormat(format!(
            "{} (only .mp3, .mp4/.m4a, .ogg and .opus can be tagged)",
            path.display()
        ))
    })?;

    if !path.exists() {
        return Err(LoudnessError::FileNotFound(path.display().to_string()));
    }

    let mut tagged_file = Probe::open(path)?.read()?;

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file.tag_mut(tag_type).ok_or_else(|| {
        LoudnessError::TagWriteError(format!("no {:?} tag in {}", tag_type, path.display()))
    })?;

    match format {
        ReplayGainFormat::ReplayGain => {
            tag.insert_text(ItemKey::ReplayGainTrackGain, gain.gain_tag());
            tag.insert_text(ItemKey::ReplayGainTrackPeak, gain.peak_tag());
        }
        ReplayGainFormat::R128 => {
            tag.insert_text(
                ItemKey::Unknown("R128_TRACK_GAIN".to_string()),
                gain.r128_gain().to_string(),
            );
        }
    }

    tag.save_to_path(path)
        .map_err(|e: lofty::error::LoftyError| LoudnessError::TagWriteError(e.to_string()))?;

    debug!("Wrote ReplayGain tags to {:?}", path);

    Ok(())
}
