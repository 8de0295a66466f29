use once_cell::sync::Lazy;
use regex::Regex;

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws"));
static BOILERPLATE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?im)^\s*here is.*?:",
        r"(?im)^\s*here's.*?:",
        r"(?im)^\s*this is.*?:",
        r"(?m)^\s*\*\*.*?\*\*:?",
        r"(?is)please let me know.*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("boilerplate"))
    .collect()
});

pub fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text.trim(), " ").into_owned()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Keeps the first `max_words` words. When anything was cut the result ends with
/// a period.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.trim().to_string();
    }
    let mut out = words[..max_words].join(" ");
    while out.ends_with([',', ';', ':', '-']) {
        out.pop();
    }
    if !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}

/// Removes model chatter around generated prose: "Here is ...:" lead-ins, bold
/// headers, a repeated section title, wrapping quotes and trailing offers of help.
pub fn strip_boilerplate(text: &str, section_name: &str) -> String {
    let mut out = text.to_string();
    for re in BOILERPLATE_RES.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    let mut trimmed = out.trim().trim_matches(['"', '\'']).trim();
    let title = section_name.trim();
    if !title.is_empty()
        && trimmed.len() >= title.len()
        && trimmed.is_char_boundary(title.len())
        && trimmed[..title.len()].eq_ignore_ascii_case(title)
        && !trimmed[title.len()..]
            .chars()
            .next()
            .is_some_and(char::is_alphanumeric)
    {
        trimmed = trimmed[title.len()..].trim_start().trim_start_matches(':');
    }
    let trimmed = trimmed.trim().trim_matches(['"', '\'']).trim();
    collapse_whitespace(trimmed)
}

/// Whole-word (or whole-phrase) match; `haystack` is expected lowercased.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    let word = word.trim();
    if word.is_empty() {
        return false;
    }
    haystack.match_indices(word).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

pub fn contains_any_word(haystack: &str, words: &[&str]) -> bool {
    words.iter().any(|w| contains_word(haystack, w))
}

pub fn title_case(text: &str) -> String {
    collapse_whitespace(text)
        .split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{contains_word, strip_boilerplate, title_case, truncate_words, word_count};

    #[test]
    fn truncation_caps_word_count_and_ends_with_period() {
        let text = (1..=80).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let out = truncate_words(&text, 50);
        assert_eq!(word_count(&out), 50);
        assert!(out.ends_with("w50."));
    }

    #[test]
    fn truncation_leaves_short_text_alone() {
        assert_eq!(truncate_words("  short text here ", 10), "short text here");
    }

    #[test]
    fn truncation_replaces_trailing_comma() {
        assert_eq!(truncate_words("one two, three", 2), "one two.");
    }

    #[test]
    fn boilerplate_is_removed() {
        let raw = "Here is the objective section:\n\"Objective: The study aims to  measure load.\"\nPlease let me know if you need changes.";
        assert_eq!(
            strip_boilerplate(raw, "Objective"),
            "The study aims to measure load."
        );
    }

    #[test]
    fn bold_header_is_removed() {
        assert_eq!(
            strip_boilerplate("**Conclusion**: Grids matter.", "Conclusion"),
            "Grids matter."
        );
    }

    #[test]
    fn whole_word_matching() {
        assert!(contains_word("rewrite all sections", "all"));
        assert!(!contains_word("make it small", "all"));
        assert!(contains_word("please add a section", "add"));
        assert!(!contains_word("address the gap", "add"));
        assert!(contains_word("create new section", "create new"));
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("future  scope"), "Future Scope");
    }
}
