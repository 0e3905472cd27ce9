use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Mention nodes emitted by the editor: `<span class="mention" ...>#name</span>`.
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<span\b[^>]*\bclass\s*=\s*["'][^"']*\bmention\b[^"']*["'][^>]*>(.*?)</span\s*>"#)
        .expect("mention pattern")
});

// Element syntax only, so a bare `<` or `>` in plain text stays text.
static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("markup pattern"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").expect("entity pattern")
});

// A `#` only starts a tag at the beginning of the text or after a character
// that cannot be part of a word or URL path.
static HASHTAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w/#&])#([\p{L}\p{N}_\-/]+)").expect("hashtag pattern")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Distinct hashtag names in a note's content. Matching is case-sensitive,
/// so `#Work` and `#work` are two names.
pub fn extract_tag_names(content: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();

    for caps in MENTION.captures_iter(content) {
        let text = text_of(&caps[1]);
        insert_name(&mut names, text.strip_prefix('#').unwrap_or(text.as_str()));
    }

    let rest = MENTION.replace_all(content, " ");
    let text = text_of(&rest);
    for caps in HASHTAG.captures_iter(&text) {
        insert_name(&mut names, caps[1].trim_end_matches(['-', '/']));
    }

    names
}

fn insert_name(names: &mut BTreeSet<String>, raw: &str) {
    let name = raw.trim();
    if !name.is_empty() {
        names.insert(name.to_string());
    }
}

pub fn strip_markup(content: &str) -> String {
    text_of(content)
}

fn text_of(fragment: &str) -> String {
    let without_tags = MARKUP.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}
