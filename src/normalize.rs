//! Text normalization shared by indexing, anchoring, and querying.
//!
//! Every component that turns text into terms goes through [`normalize`];
//! scores computed from differently-normalized text are not comparable.
//!
//! # Pipeline
//!
//! 1. Lowercase and replace `_` with a space.
//! 2. Split into maximal runs of alphanumeric characters and `-`, trimming
//!    hyphens at either end of a run.
//! 3. Strip suffixes until none applies, keeping a stem of at least
//!    [`MIN_STEM_CHARS`] characters. Words in the exception list are never
//!    stripped.
//! 4. Drop stop words and terms of two characters or fewer.
//!
//! Stripping to a fixed point makes the function idempotent: normalizing
//! the space-joined output again yields the same terms.

/// Suffixes tried in order; the first one that leaves a long enough stem wins.
const SUFFIXES: &[&str] = &[
    "ational", "ations", "ation", "tions", "tion", "ments", "ment", "ness", "ings", "ing", "ies",
    "edly", "ed", "ly", "es", "s",
];

/// Shortest stem (in characters) a suffix may leave behind.
pub const MIN_STEM_CHARS: usize = 4;

/// Words whose endings look like suffixes but are part of the root.
const EXCEPTIONS: &[&str] = &[
    "nothing", "something", "anything", "everything", "thing", "things", "string", "strings",
    "during", "ceiling", "morning", "evening", "wedding", "building", "spring", "bring", "king",
    "ring", "sing", "wing", "swing", "sting", "ping", "family", "only", "early", "apply", "reply",
    "supply", "rely", "italy", "july", "fly", "holy", "ugly", "bed", "red", "need", "seed",
    "speed", "feed", "breed", "greed", "shed", "embed", "mention", "nation", "station", "lotion",
    "motion", "notion", "potion", "question", "caution", "business", "witness", "harness",
    "always", "perhaps", "series", "species", "news", "lens", "chaos", "bias", "atlas", "canvas",
    "alias", "yes", "ties", "lies", "dies", "pies", "moment", "comment", "cement", "segment",
];

/// Function words that carry no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "may", "new", "now", "old", "see",
    "two", "who", "did", "get", "let", "she", "too", "use", "via", "yet", "than", "that", "this",
    "these", "those", "then", "there", "their", "them", "they", "what", "when", "where", "which",
    "while", "with", "within", "without", "would", "could", "should", "will", "shall", "from",
    "into", "onto", "over", "under", "about", "above", "after", "again", "against", "also",
    "been", "being", "before", "below", "between", "both", "does", "doing", "down", "each",
    "few", "further", "have", "having", "here", "more", "most", "much", "must", "other", "ours",
    "own", "same", "some", "such", "just", "very", "your", "yours", "only", "like", "were",
    "because", "until", "upon", "through", "every", "ever", "even", "many", "might", "once",
    "off", "why", "whom", "whose",
];

/// Normalize `text` into an ordered sequence of content terms.
///
/// Deterministic: the same input always yields the same output.
pub fn normalize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase().replace('_', " ");

    tokenize(&lowered)
        .into_iter()
        .map(stem)
        .filter(|term| term.chars().count() > 2 && !is_stop_word(term))
        .collect()
}

/// Split lowercased text into alphanumeric-and-hyphen tokens.
fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|raw| raw.trim_matches('-'))
        .filter(|token| !token.is_empty())
        .collect()
}

/// Strip suffixes until the token reaches a fixed point.
fn stem(token: &str) -> String {
    let mut current = token;
    loop {
        if EXCEPTIONS.contains(&current) {
            break;
        }
        match strip_one(current) {
            Some(shorter) => current = shorter,
            None => break,
        }
    }
    current.to_string()
}

fn strip_one(token: &str) -> Option<&str> {
    for suffix in SUFFIXES {
        let Some(stem) = token.strip_suffix(suffix) else {
            continue;
        };
        if stem.chars().count() < MIN_STEM_CHARS || stem.ends_with('-') {
            continue;
        }
        if *suffix == "s" && stem.ends_with(['s', 'u', 'i']) {
            continue;
        }
        return Some(stem);
    }
    None
}

/// Returns true if `term` is in the stop-word list.
pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(&term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_drops_stop_words() {
        assert_eq!(normalize("The Cat sat on the MAT"), vec!["cat", "sat", "mat"]);
    }

    #[test]
    fn test_underscores_split_tokens() {
        assert_eq!(normalize("release_notes"), vec!["release", "note"]);
    }

    #[test]
    fn test_hyphenated_tokens_survive() {
        assert_eq!(normalize("a well-known --flag-"), vec!["well-known", "flag"]);
    }

    #[test]
    fn test_suffix_stripping_respects_min_stem() {
        assert_eq!(normalize("running"), vec!["runn"]);
        // stripping "ings" would leave a one-character stem
        assert_eq!(normalize("sings"), vec!["sing"]);
        assert_eq!(normalize("quickly"), vec!["quick"]);
        assert_eq!(normalize("configuration"), vec!["configur"]);
    }

    #[test]
    fn test_exception_words_are_not_stripped() {
        assert_eq!(normalize("nothing during morning"), vec!["nothing", "during", "morning"]);
        assert_eq!(normalize("station"), vec!["station"]);
    }

    #[test]
    fn test_short_terms_removed() {
        assert!(normalize("a an of to go").is_empty());
    }

    #[test]
    fn test_plural_s_guard() {
        assert_eq!(normalize("class status analysis"), vec!["class", "status", "analysis"]);
        assert_eq!(normalize("classes"), vec!["class"]);
    }

    #[test]
    fn test_stripping_reaches_fixed_point() {
        // "walkingly" -> "walking" -> "walk"
        assert_eq!(normalize("walkingly"), vec!["walk"]);
    }

    #[test]
    fn test_idempotent_on_mixed_text() {
        let text = "Deployments of the Kubernetes_cluster happened quickly; \
                    configurations, documentations and nationally-ranked stations were tested.";
        let once = normalize(text);
        let twice = normalize(&once.join(" "));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_suffix_never_leaves_dangling_hyphen() {
        let once = normalize("pre-ing");
        assert_eq!(once, vec!["pre-ing"]);
        assert_eq!(normalize(&once.join(" ")), once);
    }

    #[test]
    fn test_deterministic() {
        let text = "Contrastive anchors discriminate chunks from their confusers.";
        assert_eq!(normalize(text), normalize(text));
    }

    #[test]
    fn test_unicode_alphanumerics_kept() {
        assert_eq!(normalize("Über café"), vec!["über", "café"]);
    }
}
