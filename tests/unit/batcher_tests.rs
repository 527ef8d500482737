/*!
 * Tests for batch construction
 */

use anyhow::Result;
use srtweave::app_config::BatchConfig;
use srtweave::subtitle_processor::Cue;
use srtweave::translation::batcher::split;
use srtweave::translation::{BatchStatus, CueRange};
use crate::common;

fn cues(texts: &[&str]) -> Vec<Cue> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Cue::new(i, i as u64 * 1_000, i as u64 * 1_000 + 800, *text))
        .collect()
}

/// Test batching a parsed file with the suite's default options
#[test]
fn test_split_withParsedFile_shouldCoverEveryCueOnce() -> Result<()> {
    let doc = srtweave::subtitle_processor::parse(common::numbered_srt(10).as_bytes())?;
    let options = common::test_options();

    let batches = split(&doc.cues, &options.batch);

    let cores: Vec<CueRange> = batches.iter().map(|b| b.core).collect();
    assert_eq!(cores, vec![CueRange::new(0, 3), CueRange::new(4, 7), CueRange::new(8, 9)]);
    assert!(batches.iter().all(|b| b.status == BatchStatus::Pending));
    assert!(batches.iter().all(|b| b.error_msg.is_none()));

    let covered: Vec<usize> = batches.iter().flat_map(|b| b.core.indices()).collect();
    assert_eq!(covered, (0..10).collect::<Vec<_>>());
    Ok(())
}

/// Test that context cues count toward the character ceiling
#[test]
fn test_split_withContext_shouldShrinkBatchesUnderCeiling() {
    let texts = ["Hello there"; 6];
    let without_context = BatchConfig {
        batch_size: 6,
        context_before: 0,
        context_after: 0,
        max_chars_per_request: 30,
    };
    let with_context = BatchConfig {
        context_before: 1,
        context_after: 1,
        ..without_context.clone()
    };

    assert_eq!(split(&cues(&texts), &without_context).len(), 3);
    assert_eq!(split(&cues(&texts), &with_context).len(), 6);
}

/// Test that context ranges stay inside the file and never overlap the core
#[test]
fn test_split_withWideContext_shouldClampAtFileEdges() {
    let config = BatchConfig {
        batch_size: 3,
        context_before: 5,
        context_after: 5,
        max_chars_per_request: 10_000,
    };

    let batches = split(&cues(&["a"; 7]), &config);

    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].context_before, None);
    assert_eq!(batches[0].context_after, Some(CueRange::new(3, 6)));
    assert_eq!(batches[1].context_before, Some(CueRange::new(0, 2)));
    assert_eq!(batches[1].context_after, Some(CueRange::new(6, 6)));
    assert_eq!(batches[2].context_before, Some(CueRange::new(1, 5)));
    assert_eq!(batches[2].context_after, None);

    for batch in &batches {
        for range in [batch.context_before, batch.context_after].into_iter().flatten() {
            assert!(range.indices().all(|i| !batch.core.contains(i)));
        }
    }
}

/// Test that batch numbering is 1-based and consistent
#[test]
fn test_split_shouldNumberBatchesSequentially() {
    let config = BatchConfig {
        batch_size: 2,
        ..BatchConfig::default()
    };

    let batches = split(&cues(&["x"; 5]), &config);

    assert_eq!(batches.iter().map(|b| b.batch_no).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(batches.iter().all(|b| b.total_batches == 3));
    assert_eq!(batches[2].core_len(), 1);
}
