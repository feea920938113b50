use regex::Regex;
use std::sync::LazyLock;

/// Line width the sheet's benefits column reads well at.
pub const DEFAULT_WRAP_WIDTH: usize = 110;

static NON_SLUG_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new("[^a-z0-9]").unwrap());

fn slug_part(s: &str) -> String {
    NON_SLUG_CHAR
        .replace_all(s.to_lowercase().trim(), "-")
        .into_owned()
}

/// Deterministic id for a posting. The sheet has no id column, so this is
/// recomputed from company + position every time rows are read. Two postings
/// with the same company and position share an id.
pub fn derive_id(company: &str, position: &str) -> String {
    format!("{}-{}", slug_part(company), slug_part(position))
}

/// Greedily wraps free text for the sheet, keeping the user's own line breaks.
///
/// Paragraphs no longer than `max_line_length` are left untouched. Longer ones
/// are packed word by word (words are split on single spaces); a word that is
/// longer than the limit on its own gets a line to itself instead of being
/// broken.
pub fn wrap_for_sheet(text: &str, max_line_length: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    text.split('\n')
        .map(|para| wrap_paragraph(para, max_line_length))
        .collect::<Vec<_>>()
        .join("\n")
}

fn wrap_paragraph(para: &str, max: usize) -> String {
    if para.chars().count() <= max {
        return para.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    // Carries a trailing space after every word, so its length already counts
    // the separator in front of the next word.
    let mut current = String::new();

    for word in para.split(' ') {
        if current.chars().count() + word.chars().count() > max {
            if current.is_empty() {
                lines.push(word.to_string());
            } else {
                lines.push(current.trim().to_string());
                current = format!("{} ", word);
            }
        } else {
            current.push_str(word);
            current.push(' ');
        }
    }

    let tail = current.trim();
    if !tail.is_empty() || lines.is_empty() {
        lines.push(tail.to_string());
    }

    lines.join("\n")
}
