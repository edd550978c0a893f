//! Utilities for generating deterministic, human-friendly slugs.
//!
//! Slugs are ASCII-only (`slug` crate, which folds diacritics through
//! `deunicode`), lowercase, with non-alphanumeric runs collapsed to a single
//! hyphen and no leading or trailing hyphen.

use slug::slugify;
use thiserror::Error;

/// Errors that can occur while generating a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug from the provided human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Try each candidate in order and return the first usable slug.
///
/// The error of the last candidate is returned when none produce a slug.
pub fn derive_slug_with_fallback<'a, I>(candidates: I) -> Result<String, SlugError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut last_error = SlugError::EmptyInput;
    for candidate in candidates {
        match derive_slug(candidate) {
            Ok(slug) => return Ok(slug),
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_strips_diacritics_and_punctuation() {
        let slug = derive_slug("Árbol de Decisión!").expect("slug");
        assert_eq!(slug, "arbol-de-decision");
    }

    #[test]
    fn derive_slug_is_deterministic_and_url_safe() {
        let input = "  Redes   Neuronales -- (Parte 2)  ";
        let first = derive_slug(input).expect("slug");
        let second = derive_slug(input).expect("slug");

        assert_eq!(first, second);
        assert_eq!(first, "redes-neuronales-parte-2");
        assert!(
            first
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
        );
        assert!(!first.starts_with('-') && !first.ends_with('-'));
        assert!(!first.contains("--"));
    }

    #[test]
    fn derive_slug_rejects_empty_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn derive_slug_rejects_punctuation_only() {
        assert_eq!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable {
                input: "!!!".to_string()
            })
        );
    }

    #[test]
    fn fallback_uses_next_candidate() {
        let slug = derive_slug_with_fallback(["?!", "intro-to-rust"]).expect("slug");
        assert_eq!(slug, "intro-to-rust");

        let err = derive_slug_with_fallback(["", "..."]).expect_err("no slug");
        assert!(matches!(err, SlugError::Unrepresentable { .. }));
    }
}
