//! Text sanitization and prompt-injection detection.
//!
//! All model output passes through [`sanitize`] before it reaches a game
//! engine. [`detect_injection`] flags suspicious patterns but never
//! blocks: the flag is recorded as a violation and the action is still
//! processed if otherwise valid.

/// Strip control characters and zero-width characters.
///
/// Removes `\x00..\x1f` (keeping TAB, LF and CR), DEL, zero-width
/// spaces/joiners, the word joiner, BOM and soft hyphens. All other
/// unicode is preserved.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|&c| match c {
            '\t' | '\n' | '\r' => true,
            '\u{00}'..='\u{1f}' | '\u{7f}' => false,
            '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}' | '\u{feff}' | '\u{ad}' => false,
            _ => true,
        })
        .collect()
}

/// Check whether text contains a known prompt-injection pattern.
///
/// Matching is case-insensitive and tolerant of run-length whitespace.
/// This is a heuristic: false positives are possible but rare.
pub fn detect_injection(text: &str) -> bool {
    let folded = fold(text);
    if folded.contains("ignore previous instructions")
        || folded.contains("new instruction:")
        || folded.contains("new instructions:")
        || folded.contains("\"role\":\"system\"")
        || folded.contains("\"role\": \"system\"")
        || folded.contains("\"role\" :\"system\"")
        || folded.contains("\"role\" : \"system\"")
    {
        return true;
    }
    if let Some(rest) = find_after(&folded, "you are now ") {
        let next = rest.split_whitespace().next().unwrap_or("");
        if matches!(next, "a" | "an" | "the" | "free" | "unbound") {
            return true;
        }
    }
    if let Some(rest) = find_after(&folded, "disregard ") {
        if rest.starts_with("previous") || rest.starts_with("all previous") {
            return true;
        }
    }
    has_tag(&folded, "system")
        || has_tag(&folded, "human")
        || has_tag(&folded, "assistant")
        || has_bracket_tag(&folded, "inst")
}

/// Lowercase and collapse whitespace runs to single spaces.
fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            for l in c.to_lowercase() {
                out.push(l);
            }
            in_space = false;
        }
    }
    out
}

fn find_after<'a>(haystack: &'a str, needle: &str) -> Option<&'a str> {
    haystack.find(needle).map(|i| &haystack[i + needle.len()..])
}

/// Match `<tag>`, `</tag>`, and whitespace-padded variants.
fn has_tag(folded: &str, tag: &str) -> bool {
    let mut search = folded;
    while let Some(i) = search.find('<') {
        let rest = search[i + 1..].trim_start();
        let rest = rest.strip_prefix('/').map(str::trim_start).unwrap_or(rest);
        if let Some(after) = rest.strip_prefix(tag) {
            if after.trim_start().starts_with('>') {
                return true;
            }
        }
        search = &search[i + 1..];
    }
    false
}

/// Match `[inst]`-style bracket tags with optional inner padding.
fn has_bracket_tag(folded: &str, tag: &str) -> bool {
    let mut search = folded;
    while let Some(i) = search.find('[') {
        let rest = search[i + 1..].trim_start();
        if let Some(after) = rest.strip_prefix(tag) {
            if after.trim_start().starts_with(']') {
                return true;
            }
        }
        search = &search[i + 1..];
    }
    false
}
