//! Text canonicalization shared by every scorer: accent folding, Spanish
//! stopword removal, Snowball stemming and token-set overlap.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Articles, prepositions, pronouns and the academic filler words that appear
/// in almost every catalog title. Entries are already normalized.
pub const STOPWORDS: &[&str] = &[
    "a", "al", "ante", "asi", "bajo", "cada", "como", "con", "contra", "cual", "cuando", "de",
    "del", "desde", "donde", "e", "el", "ella", "ellas", "ellos", "en", "entre", "era", "es",
    "esa", "ese", "eso", "esta", "este", "esto", "fue", "ha", "hacia", "hasta", "la", "las", "le",
    "les", "lo", "los", "mas", "me", "mi", "muy", "ni", "no", "nos", "o", "para", "pero", "por",
    "que", "se", "segun", "ser", "si", "sin", "sobre", "son", "su", "sus", "tambien", "te", "tu",
    "u", "un", "una", "unas", "uno", "unos", "y", "ya", "yo", // academic filler
    "asignatura", "clase", "clases", "curso", "cursos", "introduccion", "materia", "materias",
    "nivel", "tema", "temas", "unidad",
];

/// Stemmed, stopword-filtered tokens of one string. Ordered so iteration and
/// serialization are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TokenSet {
    tokens: BTreeSet<String>,
}

impl TokenSet {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    pub fn intersection_count(&self, other: &TokenSet) -> usize {
        self.tokens.intersection(&other.tokens).count()
    }

    pub fn shared(&self, other: &TokenSet) -> Vec<String> {
        self.tokens.intersection(&other.tokens).cloned().collect()
    }

    pub fn union_with(&mut self, other: &TokenSet) {
        self.tokens.extend(other.tokens.iter().cloned());
    }
}

impl FromIterator<String> for TokenSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

/// Lower-cases, strips diacritics, drops everything that is not alphanumeric
/// or whitespace, and collapses runs of whitespace.
pub fn normalize(text: &str) -> String {
    let folded = text
        .to_lowercase()
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace())
        .collect::<String>();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn tokenize(text: &str) -> TokenSet {
    let stemmer = spanish_stemmer();
    normalize(text)
        .split_whitespace()
        .filter(|token| token.chars().count() > 1)
        .filter(|token| !is_stopword(token))
        .map(|token| stemmer.stem(token).into_owned())
        .filter(|stem| !stem.is_empty())
        .collect()
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Intersection over union; 0 when either side is empty.
pub fn jaccard(left: &TokenSet, right: &TokenSet) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection_count(right);
    let union = left.len() + right.len() - intersection;
    intersection as f64 / union as f64
}

/// True when the normalized `needle` is longer than `min_len` characters and
/// occurs inside the normalized `haystack`.
pub fn is_normalized_substring(needle: &str, haystack: &str, min_len: usize) -> bool {
    let needle = normalize(needle);
    if needle.chars().count() <= min_len {
        return false;
    }
    normalize(haystack).contains(&needle)
}

/// Whether two strings are the same after normalization.
pub fn same_normalized(left: &str, right: &str) -> bool {
    normalize(left) == normalize(right)
}

fn spanish_stemmer() -> &'static Stemmer {
    static STEMMER: OnceLock<Stemmer> = OnceLock::new();
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::Spanish))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn normalize_folds_accents_and_punctuation() {
        assert_eq!(normalize("Álgebra Lineal"), "algebra lineal");
        assert_eq!(normalize("  ¿Cálculo   I?  "), "calculo i");
        assert_eq!(normalize("Diseño-Web_2"), "disenoweb2");
        assert_eq!(normalize("E-Learning"), "elearning");
        assert_eq!(normalize("Protocolos TCP/IP"), "protocolos tcpip");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("¡¿...!?"), "");
    }

    #[test]
    fn tokenize_drops_stopwords_fillers_and_single_chars() {
        let tokens = tokenize("Introducción a la Programación I");
        assert_eq!(tokens.len(), 1);
        assert!(tokens.iter().all(|token| token.starts_with("program")));

        assert!(tokenize("curso de la").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn stemming_matches_morphological_variants() {
        let query = tokenize("calculo");
        let course = tokenize("Cálculo I");
        assert_eq!(query, course);
        assert_eq!(jaccard(&query, &course), 1.0);

        assert_eq!(tokenize("Redes"), tokenize("red"));
    }

    #[test]
    fn jaccard_is_zero_for_disjoint_or_empty_sets() {
        assert_eq!(jaccard(&tokenize("calculo"), &tokenize("Derivadas")), 0.0);
        assert_eq!(jaccard(&tokenize(""), &tokenize("Derivadas")), 0.0);

        let half = jaccard(&tokenize("bases datos"), &tokenize("bases"));
        assert!((half - 0.5).abs() < 1e-9);
    }

    #[test]
    fn normalized_substring_respects_minimum_length() {
        assert!(is_normalized_substring("algebra", "Álgebra Lineal", 3));
        assert!(!is_normalized_substring("red", "Redes de Computadoras", 3));
        assert!(is_normalized_substring("redes", "Redes de Computadoras", 3));
        assert!(!is_normalized_substring("fisica", "Álgebra Lineal", 3));
        assert!(is_normalized_substring("ecommerce", "Taller de E-Commerce", 3));
    }

    #[test]
    fn same_normalized_ignores_case_and_accents() {
        assert!(same_normalized("Programación", "programacion"));
        assert!(!same_normalized("Redes", "Red"));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(text in "[a-zA-Z0-9áéíóúñüÁÉÍÓÚÑÜçà .,;:¿?¡!_-]{0,48}") {
            let once = normalize(&text);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn tokenize_is_deterministic(text in "[a-zA-Záéíóúñ ]{0,48}") {
            prop_assert_eq!(tokenize(&text), tokenize(&text));
        }

        #[test]
        fn jaccard_stays_in_unit_interval(left in "[a-z ]{0,24}", right in "[a-z ]{0,24}") {
            let score = jaccard(&tokenize(&left), &tokenize(&right));
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
