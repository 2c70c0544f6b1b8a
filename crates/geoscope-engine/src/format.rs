//! Required-heading checks on the model's final Markdown.

use regex::Regex;
use std::collections::HashSet;

/// Required headings absent from `markdown`, in the order given.
///
/// A heading counts when it appears as a level-2 ATX heading on its own line.
/// Comparison ignores case, common Latin diacritics, inner whitespace runs,
/// trailing whitespace and a closing `#` sequence.
pub fn missing_headings<'a>(markdown: &str, required: &[&'a str]) -> Vec<&'a str> {
    let present = level_two_headings(markdown);
    required
        .iter()
        .copied()
        .filter(|heading| !present.contains(&normalize_heading(heading)))
        .collect()
}

fn level_two_headings(markdown: &str) -> HashSet<String> {
    let Some(pattern) = Regex::new(r"(?m)^ {0,3}##[ \t]+(.+?)[ \t]*\r?$").ok() else {
        return HashSet::new();
    };
    pattern
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1))
        .map(|m| normalize_heading(strip_closing_hashes(m.as_str())))
        .collect()
}

/// `## Flood Risk ##` closes with hashes; `## C#` does not.
fn strip_closing_hashes(text: &str) -> &str {
    let trimmed = text.trim_end_matches('#');
    if trimmed.len() == text.len() {
        return text;
    }
    if trimmed.is_empty() || trimmed.ends_with([' ', '\t']) {
        trimmed.trim_end()
    } else {
        text
    }
}

pub fn normalize_heading(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| !is_combining_mark(*c))
                .flat_map(char::to_lowercase)
                .map(fold_accent)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Combining diacritics, as left behind by decomposed (NFD) text.
fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}
