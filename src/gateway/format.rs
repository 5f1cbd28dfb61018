//! Text escaping for Telegram parse modes

use regex::Regex;
use std::sync::OnceLock;

/// Telegram rejects messages longer than 4096 characters. Escaping can at
/// most double a chunk, so raw text is split well below that.
pub const RAW_CHUNK_CHARS: usize = 2000;

static MARKDOWN_SPECIALS: OnceLock<Regex> = OnceLock::new();

/// Backslash-escape every MarkdownV2 special character
pub fn escape_markdown(text: &str) -> String {
    let re = MARKDOWN_SPECIALS.get_or_init(|| {
        Regex::new(r"([\\*_\[\]()~>#+\-=|{}.!])").expect("static regex is valid")
    });
    re.replace_all(text, r"\${1}").into_owned()
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Split on char boundaries into pieces of at most `max_chars`, preferring
/// to break after a newline.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    while rest.len() > max_chars {
        let window = &rest[..max_chars];
        let cut = window
            .iter()
            .rposition(|c| *c == '\n')
            .map(|i| i + 1)
            .filter(|i| *i > max_chars / 2)
            .unwrap_or(max_chars);
        chunks.push(rest[..cut].iter().collect());
        rest.drain(..cut);
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.into_iter().collect());
    }
    chunks
}
