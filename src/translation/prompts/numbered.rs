/*!
 * Numbered-list wire format shared by requests and responses.
 *
 * Each cue travels as one line `N. text`. Line breaks inside a cue are
 * encoded as `<NL>`; a literal `<NL>` in the source is escaped as
 * `<NL><NL>`. The list is wrapped in `BEGIN` / `END` delimiter lines.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::errors::ProviderError;

/// Newline token
pub const NL_TOKEN: &str = "<NL>";

const ESCAPED_NL_TOKEN: &str = "<NL><NL>";
const LITERAL_PLACEHOLDER: &str = "\u{0}NL_LITERAL\u{0}";

/// `N.` or `N)` item header; text after the marker is optional
static ITEM_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)[.)](?:\s+(.*))?$").unwrap()
});

/// Encode line breaks so a cue fits on one line
pub fn encode_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace(NL_TOKEN, ESCAPED_NL_TOKEN)
        .replace('\n', NL_TOKEN)
}

/// Reverse of `encode_newlines`
pub fn decode_newlines(text: &str) -> String {
    text.replace(ESCAPED_NL_TOKEN, LITERAL_PLACEHOLDER)
        .replace(NL_TOKEN, "\n")
        .replace(LITERAL_PLACEHOLDER, NL_TOKEN)
}

/// Render items as a BEGIN/END delimited numbered list
pub fn render_numbered<S: AsRef<str>>(items: &[S]) -> String {
    let mut out = String::from("BEGIN\n");
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, encode_newlines(item.as_ref())));
    }
    out.push_str("END");
    out
}

/// Parse a numbered-list response into exactly `expected` items.
///
/// Accepts an optional BEGIN/END block, `N.` or `N)` markers and
/// continuation lines. Missing, duplicate or out-of-range numbers are a
/// `ParseError`, which the retry controller treats as retryable.
pub fn parse_numbered_response(response: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let content = delimited_block(response);

    let mut items: BTreeMap<usize, String> = BTreeMap::new();
    let mut current: Option<usize> = None;

    for line in &content {
        if let Some(caps) = ITEM_HEADER.captures(line) {
            let num: usize = caps[1]
                .parse()
                .map_err(|_| ProviderError::ParseError(format!("Invalid item number: {}", &caps[1])))?;
            if items.contains_key(&num) {
                return Err(ProviderError::ParseError(format!("Duplicate item number: {}", num)));
            }
            let text = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
            items.insert(num, text);
            current = Some(num);
        } else if let Some(num) = current {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("Note:") {
                continue;
            }
            if let Some(existing) = items.get_mut(&num) {
                if !existing.is_empty() {
                    existing.push('\n');
                }
                existing.push_str(trimmed);
            }
        }
    }

    let found: Vec<usize> = items.keys().copied().collect();
    if found.len() != expected || found.iter().enumerate().any(|(i, n)| *n != i + 1) {
        let missing: Vec<usize> = (1..=expected).filter(|n| !items.contains_key(n)).collect();
        let extra: Vec<usize> = found.iter().copied().filter(|n| *n == 0 || *n > expected).collect();
        let sample: String = content.join("\n").chars().take(300).collect();
        return Err(ProviderError::ParseError(format!(
            "Expected items 1..={}, missing {:?}, unexpected {:?}. Sample: {}",
            expected, missing, extra, sample
        )));
    }

    Ok(items.into_values().map(|text| decode_newlines(&text)).collect())
}

/// Lines between BEGIN and END, or every line if there is no BEGIN
fn delimited_block(response: &str) -> Vec<&str> {
    let mut block = Vec::new();
    let mut inside = false;

    for line in response.lines() {
        match line.trim() {
            "BEGIN" if !inside => inside = true,
            "END" if inside => break,
            _ if inside => block.push(line),
            _ => {}
        }
    }

    if inside {
        block
    } else {
        response.lines().collect()
    }
}
