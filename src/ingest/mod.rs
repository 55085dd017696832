// src/ingest/mod.rs
pub mod feed;
pub mod scheduler;

/// Normalize feed text: decode entities, strip markup, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Truncate to at most `max` characters. Char-counted, so multibyte text
/// never gets split mid-codepoint.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_decodes_entities_and_strips_tags() {
        let s = "  <p>Navy&nbsp;tests <b>new</b> drone &amp; radar</p>  ";
        let out = normalize_text(s);
        assert_eq!(out, "Navy tests new drone & radar");
    }

    #[test]
    fn normalize_collapses_whitespace_and_smart_quotes() {
        let s = "“Stealth”\n\n  upgrade\t‘confirmed’";
        let out = normalize_text(s);
        assert_eq!(out, "\"Stealth\" upgrade 'confirmed'");
    }

    #[test]
    fn truncate_is_char_counted() {
        let s = "é".repeat(10);
        assert_eq!(truncate_chars(&s, 4).chars().count(), 4);
        assert_eq!(truncate_chars("short", 200), "short");
    }
}
