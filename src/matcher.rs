use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::config::{Dependence, SearchConfig};
use crate::error::WatchError;

/// Which similarity algorithm scored a pair, reported for threshold tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMethod {
    /// Ordered character similarity; used when both strings have comparable
    /// word counts.
    SimpleRatio,
    /// Order-, duplicate- and subset-insensitive token comparison; used when
    /// one string is much longer than the other (e.g. a short search against
    /// a long official name).
    TokenSet,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOutcome {
    pub matched: bool,
    /// 0..=100
    pub score: u32,
    pub method: ScoreMethod,
}

struct CompiledTerm {
    dependence: Dependence,
    /// Present only for mandatory terms: the literal-escaped pattern, token
    /// boundary wrapped when the term is flagged `exactly`.
    pattern: Option<Regex>,
    text: String,
}

/// A saved search, compiled once from config: per-term regexes eagerly (so a
/// bad term fails at load), the fuzzy string lazily on first evaluation.
pub struct SearchSpec {
    pub name: String,
    terms: Vec<CompiledTerm>,
    fuzzy: OnceLock<String>,
}

impl SearchSpec {
    pub fn compile(config: &SearchConfig) -> Result<Self, WatchError> {
        let mut terms = Vec::with_capacity(config.terms.len());
        for term in &config.terms {
            let pattern = match term.dependence {
                Dependence::Mandatory => {
                    let escaped = regex::escape(&term.text);
                    let source = if term.exactly {
                        format!(r"\b{}\b", escaped)
                    } else {
                        escaped
                    };
                    Some(Regex::new(&source).map_err(|e| WatchError::DataCorruption {
                        context: config.name.clone(),
                        detail: format!("unusable search term '{}': {}", term.text, e),
                    })?)
                }
                Dependence::Optional => None,
            };
            terms.push(CompiledTerm {
                dependence: term.dependence,
                pattern,
                text: term.text.clone(),
            });
        }

        Ok(Self {
            name: config.name.clone(),
            terms,
            fuzzy: OnceLock::new(),
        })
    }

    /// Every term's literal text, mandatory and optional alike, space-joined.
    fn fuzzy_string(&self) -> &str {
        self.fuzzy.get_or_init(|| {
            self.terms
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    /// Two-phase decision: a fuzzy similarity score gated by the confidence
    /// threshold, then a literal pattern check for every mandatory term.
    /// Optional terms only contribute to the fuzzy string.
    pub fn evaluate(&self, extended_name: &str, min_confidence: u32) -> MatchOutcome {
        let fuzzy = self.fuzzy_string();
        let (score, method) = similarity(extended_name, fuzzy);

        if score < min_confidence {
            return MatchOutcome {
                matched: false,
                score,
                method,
            };
        }

        for term in &self.terms {
            if term.dependence != Dependence::Mandatory {
                continue;
            }
            let found = term
                .pattern
                .as_ref()
                .map(|p| p.is_match(extended_name))
                .unwrap_or(false);
            if !found {
                tracing::debug!(
                    "Search '{}': fuzzy score {} passed but mandatory term '{}' not found in '{}'",
                    self.name,
                    score,
                    term.text,
                    extended_name
                );
                return MatchOutcome {
                    matched: false,
                    score,
                    method,
                };
            }
        }

        MatchOutcome {
            matched: true,
            score,
            method,
        }
    }
}

/// Score two strings 0..=100, choosing the algorithm by how different their
/// word counts are: comparable lengths get the ordered ratio, very different
/// lengths the token-set measure so long official names are not penalized
/// against short search terms.
fn similarity(name: &str, fuzzy: &str) -> (u32, ScoreMethod) {
    let name = name.to_lowercase();
    let fuzzy = fuzzy.to_lowercase();

    let name_words = name.split_whitespace().count().max(1) as f64;
    let fuzzy_words = fuzzy.split_whitespace().count().max(1) as f64;
    let word_ratio = name_words / fuzzy_words;

    if (0.5..=1.5).contains(&word_ratio) {
        (simple_ratio(&name, &fuzzy), ScoreMethod::SimpleRatio)
    } else {
        (token_set_ratio(&name, &fuzzy), ScoreMethod::TokenSet)
    }
}

fn simple_ratio(a: &str, b: &str) -> u32 {
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u32
}

/// Token-set similarity: compare the sorted shared-token core against each
/// side's sorted full token set and keep the best ordered ratio. Robust to
/// reordering, duplicate words, and one string being a subset of the other.
fn token_set_ratio(a: &str, b: &str) -> u32 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let shared: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let shared = shared.join(" ");
    let combined_a = join_nonempty(&shared, &only_a.join(" "));
    let combined_b = join_nonempty(&shared, &only_b.join(" "));

    simple_ratio(&shared, &combined_a)
        .max(simple_ratio(&shared, &combined_b))
        .max(simple_ratio(&combined_a, &combined_b))
}

fn join_nonempty(left: &str, right: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right.to_string(),
        (_, true) => left.to_string(),
        _ => format!("{} {}", left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TermConfig;

    fn spec(terms: Vec<TermConfig>) -> SearchSpec {
        SearchSpec::compile(&SearchConfig {
            name: "test".to_string(),
            terms,
        })
        .unwrap()
    }

    fn term(text: &str, dependence: Dependence, exactly: bool) -> TermConfig {
        TermConfig {
            text: text.to_string(),
            dependence,
            exactly,
        }
    }

    #[test]
    fn test_fuzzy_string_concatenates_all_terms() {
        let spec = spec(vec![
            term("Nendoroid", Dependence::Mandatory, true),
            term("Racing Miku", Dependence::Optional, false),
        ]);
        assert_eq!(spec.fuzzy_string(), "Nendoroid Racing Miku");
    }

    #[test]
    fn test_mandatory_exact_term_matches_on_token_boundary() {
        let spec = spec(vec![term("Nendoroid", Dependence::Mandatory, true)]);

        let outcome = spec.evaluate("Nendoroid Miku", 60);
        assert!(outcome.matched);
        assert!(outcome.score >= 60);
        assert_eq!(outcome.method, ScoreMethod::TokenSet);
    }

    #[test]
    fn test_mandatory_exact_term_rejects_embedded_match() {
        let spec = spec(vec![term("Nendoroid", Dependence::Mandatory, true)]);

        // No token boundary around "Nendoroid": never a match, regardless of
        // the fuzzy score.
        let outcome = spec.evaluate("SuperNendoroidX", 0);
        assert!(!outcome.matched);
    }

    #[test]
    fn test_mandatory_substring_term_allows_embedded_match() {
        let spec = spec(vec![term("Nendoroid", Dependence::Mandatory, false)]);

        let outcome = spec.evaluate("SuperNendoroidX limited", 0);
        assert!(outcome.matched);
    }

    #[test]
    fn test_score_below_threshold_is_reported_but_not_matched() {
        let spec = spec(vec![term("Nendoroid", Dependence::Mandatory, false)]);

        let outcome = spec.evaluate("Zoids Wild Liger", 90);
        assert!(!outcome.matched);
        assert!(outcome.score < 90);
    }

    #[test]
    fn test_optional_terms_never_gate_the_outcome() {
        let spec = spec(vec![
            term("Nendoroid", Dependence::Mandatory, true),
            term("Sakura", Dependence::Optional, false),
        ]);

        // "Sakura" is absent from the name but only contributes to the fuzzy
        // string; the mandatory term decides.
        let outcome = spec.evaluate("Nendoroid Miku", 40);
        assert!(outcome.matched);
    }

    #[test]
    fn test_mandatory_term_is_escaped_literal_not_regex() {
        let spec = spec(vec![term("Fate/stay night (2006)", Dependence::Mandatory, false)]);

        let outcome = spec.evaluate("Saber Fate/stay night (2006) figure", 0);
        assert!(outcome.matched);
        let outcome = spec.evaluate("Saber Fate/stay night 2006 figure", 0);
        assert!(!outcome.matched);
    }

    #[test]
    fn test_method_selection_by_word_count_ratio() {
        // 2 words vs 2 words: ratio 1.0 → ordered comparison
        let (_, method) = similarity("Racing Miku", "Racing Miku");
        assert_eq!(method, ScoreMethod::SimpleRatio);

        // 6 words vs 1 word: ratio 6.0 → token set
        let (_, method) = similarity(
            "Nendoroid Racing Miku 2019 Ver. figure",
            "Nendoroid",
        );
        assert_eq!(method, ScoreMethod::TokenSet);
    }

    #[test]
    fn test_token_set_ignores_order_and_subsets() {
        let long = "nendoroid racing miku 2019 ver official figure";
        assert_eq!(token_set_ratio(long, "nendoroid"), 100);
        assert_eq!(
            token_set_ratio("racing miku nendoroid", "nendoroid racing miku"),
            100
        );
    }

    #[test]
    fn test_identical_strings_score_full_marks() {
        let (score, _) = similarity("Nendoroid Miku", "Nendoroid Miku");
        assert_eq!(score, 100);
    }
}
