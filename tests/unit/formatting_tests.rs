/*!
 * Tests for inline tag protection
 */

use srtweave::translation::{TagGuard, TagMap};

/// Test that tags on several lines come back in place
#[test]
fn test_roundTrip_withMultiLineTags_shouldRestoreEveryTag() {
    let text = "<i>One</i>\n<b>Two</b>";
    let (plain, map) = TagGuard::mask(text);

    assert_eq!(plain, "[[TAG_0]]One[[TAG_1]]\n[[TAG_2]]Two[[TAG_3]]");
    assert_eq!(map.len(), 4);

    let restored = TagGuard::unmask("[[TAG_0]]Un[[TAG_1]]\n[[TAG_2]]Deux[[TAG_3]]", &map);
    assert_eq!(restored, "<i>Un</i>\n<b>Deux</b>");
}

/// Test that spacing a model adds inside a placeholder is tolerated
#[test]
fn test_unmask_withSpacedPlaceholder_shouldStillMatch() {
    let (_, map) = TagGuard::mask("<i>Hi</i>");

    let restored = TagGuard::unmask("[[ TAG_0 ]]Salut[[TAG_1]]", &map);

    assert_eq!(restored, "<i>Salut</i>");
}

/// Test that a dropped positional tag returns to the start of the cue
#[test]
fn test_unmask_withDroppedPositionTag_shouldReinsertAtStart() {
    let (plain, map) = TagGuard::mask("{\\an8}For testing purposes.");
    assert_eq!(plain, "[[TAG_0]]For testing purposes.");

    let restored = TagGuard::unmask("Pour les tests.", &map);

    assert_eq!(restored, "{\\an8}Pour les tests.");
}

/// Test that dropped tags snap to the nearest line break
#[test]
fn test_unmask_withDroppedTagsAcrossLines_shouldSnapToLineBreak() {
    let (_, map) = TagGuard::mask("<i>Line one</i>\nLine two");

    let restored = TagGuard::unmask("Ligne un\nLigne deux", &map);

    assert_eq!(restored, "<i>Ligne un</i>\nLigne deux");
}

/// Test that the multiset of tags is preserved whatever the model returns
#[test]
fn test_unmask_withMangledOutput_shouldKeepEachTagExactlyOnce() {
    let source = "<font color=\"#00ff00\">Go</font> {\\pos(10,20)}now!";
    let (_, map) = TagGuard::mask(source);
    let responses = [
        "Vas-y maintenant !",
        "[[TAG_2]]Vas-y[[TAG_2]] [[TAG_9]]maintenant !",
        "[[TAG_1]][[TAG_0]]Vas-y maintenant !",
    ];

    for response in responses {
        let restored = TagGuard::unmask(response, &map);
        for n in 0..map.len() {
            let tag = &map.get(n).unwrap().tag;
            assert_eq!(restored.matches(tag.as_str()).count(), 1, "tag {} in {:?}", tag, restored);
        }
        assert!(!restored.contains("[[TAG_"));
    }
}

/// Test the placeholder token format
#[test]
fn test_placeholder_shouldUseDoubleBrackets() {
    assert_eq!(TagMap::placeholder(0), "[[TAG_0]]");
    assert_eq!(TagMap::placeholder(12), "[[TAG_12]]");
}
