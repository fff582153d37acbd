//! Tokenizer shared by index build and query parsing.

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "for", "from", "has", "have",
    "how", "i", "if", "in", "into", "is", "it", "its", "of", "on", "or", "so", "than", "that",
    "the", "then", "there", "these", "this", "to", "was", "were", "what", "when", "which",
    "will", "with", "you", "your",
];

#[must_use]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercases `text` and splits it into alphanumeric words.
///
/// Words joined by hyphens (`kerning-group`, `Ha-cy`) are emitted both as
/// their parts and as the hyphen-joined compound. Stopwords are dropped from
/// single words; compounds are kept whole.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens = Vec::new();

    for candidate in lower.split(|c: char| !(c.is_alphanumeric() || c == '-')) {
        let parts: Vec<&str> = candidate.split('-').filter(|p| !p.is_empty()).collect();
        for part in &parts {
            if !is_stopword(part) {
                tokens.push((*part).to_string());
            }
        }
        if parts.len() > 1 {
            tokens.push(parts.join("-"));
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_words() {
        assert_eq!(
            tokenize("Open the Kerning window, then press Cmd+K."),
            vec!["open", "kerning", "window", "press", "cmd", "k"]
        );
    }

    #[test]
    fn test_hyphenated_compounds() {
        assert_eq!(
            tokenize("kerning-group"),
            vec!["kerning", "group", "kerning-group"]
        );
        assert_eq!(tokenize("Ha-cy"), vec!["ha", "cy", "ha-cy"]);
        assert_eq!(
            tokenize("right-to-left"),
            vec!["right", "left", "right-to-left"]
        );
    }

    #[test]
    fn test_stray_hyphens_and_punctuation() {
        assert_eq!(tokenize("-- foo- _bar_"), vec!["foo", "bar"]);
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_all_stopwords() {
        assert!(tokenize("the of and to").is_empty());
    }

    #[test]
    fn test_unicode_letters() {
        assert_eq!(tokenize("Überhang Ω"), vec!["überhang", "ω"]);
    }
}
