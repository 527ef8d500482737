use std::fs;
use std::path::Path;
use std::borrow::Cow;
use regex::Regex;
use once_cell::sync::Lazy;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::SubtitleError;

// @module: SRT decoding, parsing and serialization

// @const: SRT timing line, comma or dot millisecond separator, optional trailing settings
static TIMING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d+):(\d{2}):(\d{2})[,.](\d{3})(?:\s+.*)?$")
        .expect("timing regex is valid")
});

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Line ending detected in the input and reused when writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NewlineStyle {
    #[default]
    Lf,
    CrLf,
}

impl NewlineStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            NewlineStyle::Lf => "\n",
            NewlineStyle::CrLf => "\r\n",
        }
    }

    fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            NewlineStyle::CrLf
        } else {
            NewlineStyle::Lf
        }
    }
}

/// Text encoding the input was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

// @struct: Single timed subtitle entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    // @field: 0-based position in the file, stable for the job's lifetime
    pub index: usize,

    // @field: Timing line exactly as read (trimmed), written back verbatim
    pub timing_line: String,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Source text, lines joined by '\n', inline tags included
    pub original_text: String,

    // @field: Translation, absent until produced
    pub translated_text: Option<String>,
}

impl Cue {
    /// Creates a cue with a canonical timing line - used by tests and benches
    pub fn new(index: usize, start_time_ms: u64, end_time_ms: u64, text: impl Into<String>) -> Self {
        Cue {
            index,
            timing_line: format!(
                "{} --> {}",
                format_timestamp(start_time_ms),
                format_timestamp(end_time_ms)
            ),
            start_time_ms,
            end_time_ms,
            original_text: text.into(),
            translated_text: None,
        }
    }

    /// Text to write: the translation when present, otherwise the source
    pub fn output_text(&self) -> &str {
        match &self.translated_text {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.original_text,
        }
    }
}

/// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Parsed subtitle file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleCollection {
    /// Line ending to use when serializing
    pub newline: NewlineStyle,

    /// Encoding the input was decoded from
    pub encoding: SourceEncoding,

    /// Cues in file order
    pub cues: Vec<Cue>,
}

impl SubtitleCollection {
    /// Read and parse a subtitle file from disk
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, SubtitleError> {
        let bytes = fs::read(path.as_ref())?;
        parse(&bytes)
    }

    /// Serialize with the detected newline style
    pub fn serialize(&self) -> Vec<u8> {
        serialize(&self.cues, self.newline)
    }

    /// Total characters of source text
    pub fn total_chars(&self) -> usize {
        self.cues.iter().map(|c| c.original_text.chars().count()).sum()
    }
}

/// Decode raw bytes and parse them into cues
pub fn parse(bytes: &[u8]) -> Result<SubtitleCollection, SubtitleError> {
    let (text, encoding) = decode_bytes(bytes)?;
    let newline = NewlineStyle::detect(&text);
    let cues = parse_str(&text)?;

    debug!("Parsed {} cues ({:?}, {:?})", cues.len(), encoding, newline);

    Ok(SubtitleCollection { newline, encoding, cues })
}

/// Decode UTF-8 or UTF-16 (with or without BOM) into a String.
pub fn decode_bytes(bytes: &[u8]) -> Result<(String, SourceEncoding), SubtitleError> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        let text = std::str::from_utf8(rest).map_err(|_| SubtitleError::Encoding {
            hint: "The file starts with a UTF-8 byte-order mark but contains invalid UTF-8. Try re-saving it as UTF-8.".into(),
        })?;
        return Ok((strip_bom(text).to_string(), SourceEncoding::Utf8));
    }

    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(rest, SourceEncoding::Utf16Le);
    }

    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(rest, SourceEncoding::Utf16Be);
    }

    // BOM-less UTF-16 must be checked before UTF-8: NUL bytes are valid UTF-8
    if let Some(encoding) = sniff_utf16(bytes) {
        return decode_utf16(bytes, encoding);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok((strip_bom(text).to_string(), SourceEncoding::Utf8)),
        Err(e) => Err(SubtitleError::Encoding {
            hint: format!(
                "Invalid UTF-8 at byte {} and no UTF-16 pattern found. Try re-saving the file as UTF-8.",
                e.valid_up_to()
            ),
        }),
    }
}

fn decode_utf16(bytes: &[u8], encoding: SourceEncoding) -> Result<(String, SourceEncoding), SubtitleError> {
    let codec = match encoding {
        SourceEncoding::Utf16Be => encoding_rs::UTF_16BE,
        _ => encoding_rs::UTF_16LE,
    };

    let decoded: Option<Cow<'_, str>> = if bytes.len() % 2 == 0 {
        codec.decode_without_bom_handling_and_without_replacement(bytes)
    } else {
        None
    };

    match decoded {
        Some(text) => Ok((strip_bom(&text).to_string(), encoding)),
        None => Err(SubtitleError::Encoding {
            hint: format!(
                "The file looks like {} but contains invalid sequences. Try exporting the subtitles again as UTF-8.",
                codec.name()
            ),
        }),
    }
}

/// Guess BOM-less UTF-16 from the distribution of NUL bytes.
///
/// Mostly-ASCII UTF-16 text has a NUL in every other byte; which half holds
/// the NULs gives the byte order.
fn sniff_utf16(bytes: &[u8]) -> Option<SourceEncoding> {
    if bytes.len() < 4 || bytes.len() % 2 != 0 {
        return None;
    }

    let pairs = bytes.len() / 2;
    let (mut even_nuls, mut odd_nuls) = (0usize, 0usize);
    for pair in bytes.chunks_exact(2) {
        if pair[0] == 0 {
            even_nuls += 1;
        }
        if pair[1] == 0 {
            odd_nuls += 1;
        }
    }

    if odd_nuls * 2 >= pairs && even_nuls * 8 < odd_nuls {
        Some(SourceEncoding::Utf16Le)
    } else if even_nuls * 2 >= pairs && odd_nuls * 8 < even_nuls {
        Some(SourceEncoding::Utf16Be)
    } else {
        None
    }
}

fn strip_bom(text: &str) -> &str {
    text.trim_start_matches('\u{feff}')
}

/// Parse decoded SRT text into cues
pub fn parse_str(text: &str) -> Result<Vec<Cue>, SubtitleError> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let mut cues: Vec<Cue> = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        // Skip blank separators
        while i < lines.len() && lines[i].trim().is_empty() {
            i += 1;
        }
        if i >= lines.len() {
            break;
        }

        let head = lines[i].trim();
        let timing_idx = if is_all_digits(head) {
            i + 1
        } else if head.contains("-->") {
            // Missing index line; the index is recovered from position
            i
        } else {
            return Err(SubtitleError::Format {
                line: i + 1,
                message: "Expected a cue number (e.g. '1') or a timing line (e.g. '00:00:01,000 --> 00:00:03,000').".into(),
            });
        };

        if timing_idx >= lines.len() || lines[timing_idx].trim().is_empty() {
            return Err(SubtitleError::Format {
                line: timing_idx + 1,
                message: format!("Cue '{}' has no timing line.", head),
            });
        }

        let timing_line = lines[timing_idx].trim();
        let (start_time_ms, end_time_ms) = parse_timing_line(timing_line)
            .map_err(|message| SubtitleError::Format { line: timing_idx + 1, message })?;

        if let Some(previous) = cues.last() {
            if start_time_ms < previous.start_time_ms {
                return Err(SubtitleError::Format {
                    line: timing_idx + 1,
                    message: format!(
                        "Cue starts at {} which is before the previous cue ({}).",
                        format_timestamp(start_time_ms),
                        format_timestamp(previous.start_time_ms)
                    ),
                });
            }
        }

        let mut text_lines: Vec<&str> = Vec::new();
        let mut j = timing_idx + 1;
        while j < lines.len() && !lines[j].trim().is_empty() {
            text_lines.push(lines[j].trim_end());
            j += 1;
        }

        cues.push(Cue {
            index: cues.len(),
            timing_line: timing_line.to_string(),
            start_time_ms,
            end_time_ms,
            original_text: text_lines.join("\n"),
            translated_text: None,
        });

        i = j;
    }

    if cues.is_empty() {
        return Err(SubtitleError::Format {
            line: 1,
            message: "No subtitle cues found. Make sure this is a valid .srt file.".into(),
        });
    }

    Ok(cues)
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Parse a timing line into start and end milliseconds
pub fn parse_timing_line(line: &str) -> Result<(u64, u64), String> {
    let caps = TIMING_REGEX
        .captures(line)
        .ok_or_else(|| format!("Expected a timing line like '00:00:01,000 --> 00:00:03,000', got '{}'.", line))?;

    let start = timestamp_to_ms(&caps, 1)?;
    let end = timestamp_to_ms(&caps, 5)?;

    if end < start {
        return Err(format!("End time is before start time in '{}'.", line));
    }

    Ok((start, end))
}

fn timestamp_to_ms(caps: &regex::Captures, start_idx: usize) -> Result<u64, String> {
    let field = |offset: usize| -> Result<u64, String> {
        caps[start_idx + offset]
            .parse::<u64>()
            .map_err(|e| format!("Invalid time component '{}': {}", &caps[start_idx + offset], e))
    };

    let (hours, minutes, seconds, millis) = (field(0)?, field(1)?, field(2)?, field(3)?);
    if minutes > 59 || seconds > 59 {
        return Err(format!(
            "Time components out of range: {:02}:{:02}:{:02}",
            hours, minutes, seconds
        ));
    }

    hours
        .checked_mul(3_600_000)
        .and_then(|ms| ms.checked_add(minutes * 60_000 + seconds * 1_000 + millis))
        .ok_or_else(|| format!("Hour value {} is out of range", hours))
}

/// Serialize cues back to SRT bytes.
///
/// Timing lines are written verbatim and indices renumbered from 1. Blank
/// lines inside a cue's text would end the block early, so they are dropped.
pub fn serialize(cues: &[Cue], newline: NewlineStyle) -> Vec<u8> {
    let nl = newline.as_str();
    let mut out = String::new();

    for (position, cue) in cues.iter().enumerate() {
        if position > 0 {
            out.push_str(nl);
        }
        out.push_str(&(position + 1).to_string());
        out.push_str(nl);
        out.push_str(&cue.timing_line);
        out.push_str(nl);

        for line in cue.output_text().lines().filter(|l| !l.trim().is_empty()) {
            out.push_str(line.trim_end());
            out.push_str(nl);
        }
    }

    out.into_bytes()
}
