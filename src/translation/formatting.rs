/*!
 * Inline tag protection for translated text.
 *
 * Cue text often carries markup such as `<i>...</i>`, `<font color="...">` or
 * positional overrides like `{\an8}`. Before a cue is sent to a provider,
 * every tag is swapped for a `[[TAG_n]]` placeholder and kept in a `TagMap`;
 * after translation the placeholders are swapped back.
 *
 * Providers occasionally drop or duplicate placeholders. Unknown or
 * repeated placeholders are removed, and tags whose placeholder vanished
 * are reinserted at the sentence boundary closest to where they sat in the
 * original text.
 */

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Angle-bracket and curly-brace tags, never spanning lines. Placeholder
/// lookalikes already present in the source are masked too, so they survive
/// `unmask` verbatim.
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[^<>\n]*>|\{[^{}\n]*\}|\[\[\s*TAG_\d+\s*\]\]").unwrap()
});

/// Placeholder tokens, tolerant of spaces a model may insert
static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[\s*TAG_(\d+)\s*\]\]").unwrap()
});

/// One masked tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedTag {
    /// Tag text as it appeared in the source
    pub tag: String,

    /// Visible characters preceding the tag in the source
    pub offset: usize,
}

/// Side table of masked tags, indexed by placeholder number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMap {
    tags: Vec<MaskedTag>,

    /// Visible characters in the source, tags excluded
    visible_len: usize,
}

impl TagMap {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn get(&self, n: usize) -> Option<&MaskedTag> {
        self.tags.get(n)
    }

    /// Placeholder token for tag `n`
    pub fn placeholder(n: usize) -> String {
        format!("[[TAG_{}]]", n)
    }
}

/// Masks inline tags before translation and restores them afterwards
pub struct TagGuard;

impl TagGuard {
    /// Replace every tag in `text` with a placeholder.
    ///
    /// Text without tags comes back unchanged with an empty map, so masking
    /// is idempotent.
    pub fn mask(text: &str) -> (String, TagMap) {
        if !TAG_REGEX.is_match(text) {
            return (text.to_string(), TagMap::default());
        }

        let mut plain = String::with_capacity(text.len());
        let mut map = TagMap::default();
        let mut visible = 0usize;
        let mut last = 0usize;

        for m in TAG_REGEX.find_iter(text) {
            let between = &text[last..m.start()];
            visible += between.chars().count();
            plain.push_str(between);

            plain.push_str(&TagMap::placeholder(map.tags.len()));
            map.tags.push(MaskedTag {
                tag: m.as_str().to_string(),
                offset: visible,
            });
            last = m.end();
        }

        let tail = &text[last..];
        visible += tail.chars().count();
        plain.push_str(tail);
        map.visible_len = visible;

        (plain, map)
    }

    /// Put the tags from `map` back into `translated`
    pub fn unmask(translated: &str, map: &TagMap) -> String {
        if map.is_empty() {
            // Nothing was masked; strip any placeholder a model invented
            return PLACEHOLDER_REGEX.replace_all(translated, "").into_owned();
        }

        let mut used = vec![false; map.len()];
        let mut stray = 0usize;

        let restored = PLACEHOLDER_REGEX.replace_all(translated, |caps: &regex::Captures| {
            let slot = caps[1].parse::<usize>().ok().filter(|n| *n < map.len());
            match slot {
                Some(n) if !used[n] => {
                    used[n] = true;
                    map.tags[n].tag.clone()
                }
                _ => {
                    stray += 1;
                    String::new()
                }
            }
        });

        if stray > 0 {
            warn!("Removed {} unknown or duplicated tag placeholder(s)", stray);
        }

        let missing: Vec<usize> = (0..map.len()).filter(|n| !used[*n]).collect();
        if missing.is_empty() {
            return restored.into_owned();
        }

        warn!(
            "Provider dropped {} of {} tag placeholder(s); reinserting at sentence boundaries",
            missing.len(),
            map.len()
        );
        Self::reinsert(&restored, map, &missing)
    }

    /// Insert the `missing` tags at the boundary nearest their relative source position
    fn reinsert(text: &str, map: &TagMap, missing: &[usize]) -> String {
        let chars: Vec<char> = text.chars().collect();
        let boundaries = sentence_boundaries(&chars);

        let mut insertions: Vec<(usize, usize)> = missing
            .iter()
            .map(|&n| {
                let ratio = if map.visible_len == 0 {
                    0.0
                } else {
                    map.tags[n].offset as f64 / map.visible_len as f64
                };
                let target = (ratio * chars.len() as f64).round() as usize;
                let position = boundaries
                    .iter()
                    .copied()
                    .min_by_key(|b| b.abs_diff(target))
                    .unwrap_or(chars.len());
                (position, n)
            })
            .collect();
        insertions.sort();

        let mut out = String::with_capacity(text.len() + missing.len() * 8);
        let mut pending = insertions.iter().peekable();
        for (i, ch) in chars.iter().enumerate() {
            while let Some((_, n)) = pending.next_if(|(pos, _)| *pos == i) {
                out.push_str(&map.tags[*n].tag);
            }
            out.push(*ch);
        }
        for (_, n) in pending {
            out.push_str(&map.tags[*n].tag);
        }

        out
    }
}

/// Char positions where a tag may be reinserted: text start, text end, and
/// the start of each sentence or line following a terminator.
fn sentence_boundaries(chars: &[char]) -> Vec<usize> {
    let mut boundaries = vec![0];

    for (i, ch) in chars.iter().enumerate() {
        let terminator = matches!(ch, '.' | '!' | '?' | '…' | '。' | '！' | '？');
        if *ch == '\n' {
            boundaries.push(i);
            boundaries.push(i + 1);
        } else if terminator {
            let next = i + 1;
            if next < chars.len() && chars[next].is_whitespace() {
                let mut start = next;
                while start < chars.len() && chars[start].is_whitespace() && chars[start] != '\n' {
                    start += 1;
                }
                boundaries.push(start);
            }
        }
    }

    boundaries.push(chars.len());
    boundaries.dedup();
    boundaries
}
