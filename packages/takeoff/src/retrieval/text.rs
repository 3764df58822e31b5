//! Tokenization and whole-token matching shared by lexical search,
//! query expansion and material validation.

/// Split text into lowercase alphanumeric tokens.
///
/// Any non-alphanumeric character is a boundary, so `8"PVC-SDR35` yields
/// `["8", "pvc", "sdr35"]`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Whether `phrase` occurs in `text` as whole tokens.
///
/// Case-insensitive. The phrase's tokens must appear contiguously, so "PVC"
/// matches "8 in. PVC pipe" but not "FPVC" or "PVCO".
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() {
        return false;
    }
    let haystack = tokenize(text);
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_slice())
}

/// Replace whole-token occurrences of `term` in `text` with `replacement`.
///
/// Case-insensitive; returns `None` when the term does not occur.
pub fn replace_token(text: &str, term: &str, replacement: &str) -> Option<String> {
    let term_lower = term.to_lowercase();
    let mut out = String::with_capacity(text.len() + replacement.len());
    let mut replaced = false;
    let mut token = String::new();

    let mut flush = |token: &mut String, out: &mut String| {
        if !token.is_empty() {
            if token.to_lowercase() == term_lower {
                out.push_str(replacement);
                replaced = true;
            } else {
                out.push_str(token);
            }
            token.clear();
        }
    };

    for c in text.chars() {
        if c.is_alphanumeric() {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            out.push(c);
        }
    }
    flush(&mut token, &mut out);

    replaced.then_some(out)
}
