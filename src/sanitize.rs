//! Normalization of raw generator output.
//!
//! Generated text usually arrives wrapped in a markdown code fence and with
//! ragged whitespace. [`clean`] turns it into the form that is stored as an
//! artifact and fed to later stages.

use crate::generator::GeneratedText;

/// Code fence marker.
const FENCE: &str = "```";

/// Cleans generator output, unwrapping any message wrapper first.
pub fn clean(raw: &GeneratedText) -> String {
    clean_text(raw.text())
}

/// Cleans raw text.
///
/// Strips the wrapping code fence pair, drops trailing whitespace on every
/// line, collapses three or more consecutive newlines to two and trims the
/// result. The function is applied until the text stops changing, so
/// `clean_text(&clean_text(x)) == clean_text(x)` for every input.
pub fn clean_text(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = clean_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

/// One normalization pass. Every step only removes characters.
fn clean_pass(text: &str) -> String {
    let text = text.trim();
    let (text, opened) = strip_opening_fence(text);
    let text = if opened {
        strip_closing_fence(text)
    } else {
        text.to_string()
    };
    let text = strip_trailing_whitespace(&text);
    let text = collapse_newlines(&text);
    text.trim().to_string()
}

/// Removes a leading fence marker and its optional language tag.
///
/// The fence line must hold nothing else, so inline code such as
/// "```foo``` is a thing" is left alone.
fn strip_opening_fence(text: &str) -> (&str, bool) {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return (text, false);
    };
    let tag_len: usize = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '+' | '#' | '.'))
        .map(char::len_utf8)
        .sum();
    let body = &rest[tag_len..];
    let line_end = body.trim_start_matches([' ', '\t']);
    if line_end.is_empty() || line_end.starts_with(['\n', '\r']) {
        (body, true)
    } else {
        (text, false)
    }
}

/// Removes the closing fence from the last line that ends with one.
fn strip_closing_fence(text: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if let Some(pos) = lines
        .iter()
        .rposition(|line| line.trim_end().ends_with(FENCE))
    {
        let line = lines[pos].trim_end();
        lines[pos] = &line[..line.len() - FENCE.len()];
    }
    lines.join("\n")
}

fn strip_trailing_whitespace(text: &str) -> String {
    text.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapses runs of three or more newlines to exactly two.
fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0;
    for c in text.chars() {
        if c == '\n' {
            run += 1;
            if run > 2 {
                continue;
            }
        } else {
            run = 0;
        }
        out.push(c);
    }
    out
}
