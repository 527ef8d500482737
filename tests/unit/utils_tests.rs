/*!
 * Tests for language and file utilities
 */

use anyhow::Result;
use std::path::{Path, PathBuf};
use srtweave::file_utils::FileManager;
use srtweave::language_utils::{display_name, get_language_name, is_auto, language_codes_match, normalize_to_part2t};
use crate::common;

/// Test normalization across the accepted code formats
#[test]
fn test_normalizeToPart2t_withKnownCodes_shouldAgree() -> Result<()> {
    assert_eq!(normalize_to_part2t("de")?, "deu");
    assert_eq!(normalize_to_part2t("ger")?, "deu");
    assert_eq!(normalize_to_part2t("deu")?, "deu");
    assert!(normalize_to_part2t("german").is_err());
    assert!(normalize_to_part2t("").is_err());
    Ok(())
}

/// Test language name lookups used in prompts
#[test]
fn test_languageNames_shouldResolveOrFallBack() -> Result<()> {
    assert_eq!(get_language_name("fr")?, "French");
    assert_eq!(get_language_name("jpn")?, "Japanese");
    assert_eq!(display_name("es"), "Spanish");
    assert_eq!(display_name("klingon"), "klingon");
    assert!(is_auto("AUTO"));
    assert!(!is_auto("en"));
    Ok(())
}

/// Test that auto never matches a concrete language
#[test]
fn test_languageCodesMatch_withAuto_shouldBeFalse() {
    assert!(!language_codes_match("auto", "en"));
    assert!(language_codes_match("nl", "dut"));
}

/// Test output naming next to the input file
#[test]
fn test_generateOutputPath_shouldInsertSuffixAndTarget() {
    let path = FileManager::generate_output_path(Path::new("/movies/Film.Name.srt"), None, "translated", "fr");

    assert_eq!(path, PathBuf::from("/movies/Film.Name.translated.fr.srt"));
}

/// Test writing into a directory that does not exist yet
#[test]
fn test_writeBytes_withMissingParent_shouldCreateIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let target = temp_dir.path().join("nested").join("out").join("a.srt");

    FileManager::write_bytes(&target, b"1\n")?;

    assert!(FileManager::file_exists(&target));
    assert!(FileManager::dir_exists(temp_dir.path().join("nested")));
    assert_eq!(FileManager::read_bytes(&target)?, b"1\n");
    Ok(())
}

/// Test subtitle extension detection
#[test]
fn test_isSrtFile_shouldMatchExtensionOnly() {
    assert!(FileManager::is_srt_file("a.srt"));
    assert!(FileManager::is_srt_file("b.SRT"));
    assert!(!FileManager::is_srt_file("c.srt.bak"));
    assert!(!FileManager::is_srt_file("srt"));
}

/// Test that only subtitle files directly inside the folder are found
#[test]
fn test_findSrtFiles_shouldSkipOtherFilesAndSubfolders() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    common::create_test_file(temp_dir.path(), "b.srt", "")?;
    common::create_test_file(temp_dir.path(), "a.SRT", "")?;
    common::create_test_file(temp_dir.path(), "notes.txt", "")?;
    let nested = temp_dir.path().join("season2");
    std::fs::create_dir(&nested)?;
    common::create_test_file(&nested, "c.srt", "")?;

    let found = FileManager::find_srt_files(temp_dir.path())?;

    assert_eq!(found, vec![temp_dir.path().join("a.SRT"), temp_dir.path().join("b.srt")]);
    Ok(())
}
