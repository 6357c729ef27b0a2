// MPD (media presentation description) manifest parsing.
//
// VOD clip endpoints answer a manifest request with a DASH-style MPD document.
// Downloaders only need three facts out of it: the initialization segment
// name, the data segment naming pattern, and the index the pattern starts
// counting from. Everything else in the document is ignored.

use regex::Regex;
use tracing::trace;

pub const SEGMENT_NUMBER_PLACEHOLDER: &str = "$Number$";

#[derive(Debug, thiserror::Error)]
pub enum MpdError {
    #[error("manifest contains no segment template")]
    MissingSegmentTemplate,

    #[error("segment template is missing the `{name}` attribute")]
    MissingAttribute { name: &'static str },

    #[error("segment template `media` pattern `{pattern}` has no `$Number$` placeholder")]
    MissingNumberPlaceholder { pattern: String },

    #[error("invalid `startNumber` value `{value}`")]
    InvalidStartNumber { value: String },
}

/// The segment naming facts extracted from one MPD document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpdInfo {
    /// File name of the initialization segment, e.g. `seg_init.mp4`.
    pub init_name: String,
    /// Data segment naming pattern containing `$Number$`, e.g. `seg_$Number$.m4v`.
    pub segment_pattern: String,
    /// The index the pattern starts counting from, usually 1.
    pub start_index: u64,
}

impl MpdInfo {
    /// Parse an MPD document.
    ///
    /// When `audio` is set and the document carries more than one adaptation
    /// set, the audio set's segment template is selected; otherwise the first
    /// non-audio template wins. Documents with a single template are accepted
    /// either way.
    pub fn parse(document: &str, audio: bool) -> Result<Self, MpdError> {
        if !document.contains("<SegmentTemplate") {
            return Err(MpdError::MissingSegmentTemplate);
        }
        let chunk = select_adaptation_chunk(document, audio);
        trace!(audio, chunk_len = chunk.len(), "selected adaptation chunk");

        let init_name = attribute(chunk, "initialization")
            .ok_or(MpdError::MissingAttribute {
                name: "initialization",
            })?
            .to_string();
        let segment_pattern = attribute(chunk, "media")
            .ok_or(MpdError::MissingAttribute { name: "media" })?
            .to_string();

        if !segment_pattern.contains(SEGMENT_NUMBER_PLACEHOLDER) {
            return Err(MpdError::MissingNumberPlaceholder {
                pattern: segment_pattern,
            });
        }

        // Absent startNumber defaults to 1 per the DASH template rules.
        let start_index = match attribute(chunk, "startNumber") {
            Some(raw) => raw.parse::<u64>().map_err(|_| MpdError::InvalidStartNumber {
                value: raw.to_string(),
            })?,
            None => 1,
        };

        Ok(Self {
            init_name,
            segment_pattern,
            start_index,
        })
    }

    /// Name of the data segment at the given zero-based download index.
    pub fn segment_name(&self, index: u64) -> String {
        self.segment_pattern.replace(
            SEGMENT_NUMBER_PLACEHOLDER,
            &(self.start_index + index).to_string(),
        )
    }
}

/// Narrow the document down to the adaptation set we want, falling back to
/// the whole document when there is nothing to choose between.
fn select_adaptation_chunk(document: &str, audio: bool) -> &str {
    let sets: Vec<&str> = document.split("<AdaptationSet").skip(1).collect();
    if sets.len() < 2 {
        return document;
    }

    for set in sets {
        let head = set.split('>').next().unwrap_or(set);
        let is_audio = head.contains("audio");
        if is_audio == audio && set.contains("<SegmentTemplate") {
            return set;
        }
    }
    document
}

fn attribute<'a>(chunk: &'a str, name: &str) -> Option<&'a str> {
    // Attribute values never contain escaped quotes in these documents.
    let re = Regex::new(&format!(r#"{name}="([^"]*)""#)).ok()?;
    let template = chunk
        .find("<SegmentTemplate")
        .map(|at| &chunk[at..])
        .unwrap_or(chunk);
    re.captures(template)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
