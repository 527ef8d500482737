/*!
 * Tests for subtitle file decoding, parsing and serialization
 */

use anyhow::Result;
use srtweave::errors::SubtitleError;
use srtweave::subtitle_processor::{NewlineStyle, SourceEncoding, SubtitleCollection};
use crate::common;

fn utf16le_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(|unit| unit.to_le_bytes()));
    bytes
}

/// Test parsing a file written to disk
#[test]
fn test_parseFile_withSampleSubtitle_shouldKeepTagsAndLines() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_subtitle(temp_dir.path(), "sample.srt")?;

    let doc = SubtitleCollection::parse_file(&path)?;

    assert_eq!(doc.cues.len(), 3);
    assert_eq!(doc.encoding, SourceEncoding::Utf8);
    assert_eq!(doc.cues[0].original_text, "This is a <i>test</i> subtitle.");
    assert_eq!(doc.cues[1].original_text, "It contains\nmultiple lines.");
    assert_eq!(doc.cues[2].original_text, "{\\an8}For testing purposes.");
    assert_eq!(doc.cues[2].start_time_ms, 10_000);
    Ok(())
}

/// Test that an untranslated CRLF file serializes back to identical bytes
#[test]
fn test_roundTrip_withCrLf_shouldReproduceInputBytes() -> Result<()> {
    let input = "1\r\n00:00:01,000 --> 00:00:02,000\r\nHello\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nTwo\r\nlines\r\n";

    let doc = srtweave::subtitle_processor::parse(input.as_bytes())?;

    assert_eq!(doc.newline, NewlineStyle::CrLf);
    assert_eq!(String::from_utf8(doc.serialize())?, input);
    Ok(())
}

/// Test that unusual timing lines survive untouched
#[test]
fn test_roundTrip_withDotSeparatorAndPositions_shouldKeepTimingVerbatim() -> Result<()> {
    let input = "1\n00:00:01.250 --> 00:00:02.750 X1:10 X2:50\nHi\n";

    let doc = srtweave::subtitle_processor::parse(input.as_bytes())?;

    assert_eq!(doc.cues[0].start_time_ms, 1_250);
    assert_eq!(doc.cues[0].end_time_ms, 2_750);
    assert_eq!(String::from_utf8(doc.serialize())?, input);
    Ok(())
}

/// Test that a UTF-16 file is transcoded and written back as UTF-8
#[test]
fn test_parse_withUtf16LeFile_shouldDecodeNonAscii() -> Result<()> {
    let bytes = utf16le_with_bom("1\r\n00:00:01,000 --> 00:00:02,000\r\nÇa va très bien\r\n");

    let doc = srtweave::subtitle_processor::parse(&bytes)?;

    assert_eq!(doc.encoding, SourceEncoding::Utf16Le);
    assert_eq!(doc.cues[0].original_text, "Ça va très bien");
    let output = String::from_utf8(doc.serialize())?;
    assert!(output.contains("Ça va très bien"));
    Ok(())
}

/// Test that bytes which are neither UTF-8 nor UTF-16 report an encoding error
#[test]
fn test_parse_withWindows1252Bytes_shouldReturnEncodingError() {
    // "Café" in Windows-1252
    let bytes = b"1\n00:00:01,000 --> 00:00:02,000\nCaf\xe9\n";

    let result = srtweave::subtitle_processor::parse(bytes);

    match result {
        Err(SubtitleError::Encoding { hint }) => assert!(!hint.is_empty()),
        other => panic!("expected an encoding error, got {:?}", other),
    }
}

/// Test that format errors carry a 1-based line number
#[test]
fn test_parse_withGarbageBlock_shouldReportLineNumber() {
    let input = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\nnot a cue\n";

    let result = srtweave::subtitle_processor::parse(input.as_bytes());

    match result {
        Err(SubtitleError::Format { line, .. }) => assert_eq!(line, 5),
        other => panic!("expected a format error, got {:?}", other),
    }
}

/// Test that an hour field too large for milliseconds is rejected, not wrapped
#[test]
fn test_parse_withHugeHourField_shouldReturnFormatError() {
    let input = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n2\n18446744073709:00:00,000 --> 18446744073709:00:01,000\nBye\n";

    let result = srtweave::subtitle_processor::parse(input.as_bytes());

    match result {
        Err(SubtitleError::Format { line, .. }) => assert_eq!(line, 6),
        other => panic!("expected a format error, got {:?}", other),
    }
}

/// Test that serialization renumbers cues and uses translations when present
#[test]
fn test_serialize_withTranslations_shouldRenumberFromOne() -> Result<()> {
    let input = "7\n00:00:01,000 --> 00:00:02,000\nHello\n\n9\n00:00:03,000 --> 00:00:04,000\nBye\n";
    let mut doc = srtweave::subtitle_processor::parse(input.as_bytes())?;
    doc.cues[0].translated_text = Some("Bonjour".to_string());

    let output = String::from_utf8(doc.serialize())?;

    assert_eq!(
        output,
        "1\n00:00:01,000 --> 00:00:02,000\nBonjour\n\n2\n00:00:03,000 --> 00:00:04,000\nBye\n"
    );
    Ok(())
}

/// Test the numbered sample generator used across the suite
#[test]
fn test_parse_withNumberedSample_shouldKeepOrder() -> Result<()> {
    let doc = srtweave::subtitle_processor::parse(common::numbered_srt(12).as_bytes())?;

    assert_eq!(doc.cues.len(), 12);
    assert!(doc.cues.iter().enumerate().all(|(i, cue)| cue.index == i));
    assert_eq!(doc.cues[11].original_text, "Line 11");
    assert_eq!(doc.total_chars(), 10 * 6 + 2 * 7);
    Ok(())
}
