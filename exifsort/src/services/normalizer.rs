//! Metadata normalizer
//!
//! Splits raw extractor output into the prompt section and the section that
//! follows the `Negative prompt:` token, then canonicalizes each section line
//! by line. Lines without a `": "` separator are dropped; the cache has always
//! stored metadata in this lossy form, and search results depend on it.

use crate::types::MetadataSections;

/// Token separating the primary and secondary sections
pub const SECTION_DELIMITER: &str = "Negative prompt:";

/// Separator between a key and its value within one line
pub const KEY_VALUE_SEPARATOR: &str = ": ";

/// Split raw metadata on [`SECTION_DELIMITER`] and normalize both halves
pub fn split_sections(raw: Option<&str>) -> MetadataSections {
    let Some(raw) = raw else {
        return MetadataSections {
            primary: None,
            secondary: String::new(),
        };
    };

    match raw.split_once(SECTION_DELIMITER) {
        Some((before, after)) => MetadataSections {
            primary: Some(normalize_text(before.trim())),
            secondary: normalize_text(after.trim()),
        },
        None => MetadataSections {
            primary: Some(normalize_text(raw.trim())),
            secondary: String::new(),
        },
    }
}

/// Canonicalize `key: value` lines
///
/// The key (text before the first `": "`) is trimmed and lower-cased, the
/// value is trimmed. Output lines are joined with `\n`.
pub fn normalize_text(text: &str) -> String {
    text.split('\n')
        .filter_map(normalize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_line(line: &str) -> Option<String> {
    let (key, value) = line.split_once(KEY_VALUE_SEPARATOR)?;
    Some(format!(
        "{}{}{}",
        key.trim().to_lowercase(),
        KEY_VALUE_SEPARATOR,
        value.trim()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_round_trip_example() {
        let sections = split_sections(Some("foo: 1\nNegative prompt: bar: 2"));
        assert_eq!(sections.primary.as_deref(), Some("foo: 1"));
        assert_eq!(sections.secondary, "bar: 2");
    }

    #[test]
    fn test_missing_delimiter_gives_empty_secondary() {
        let sections = split_sections(Some("Steps: 20\nSampler: Euler"));
        assert_eq!(sections.primary.as_deref(), Some("steps: 20\nsampler: Euler"));
        assert_eq!(sections.secondary, "");
    }

    #[test]
    fn test_absent_input_gives_absent_primary() {
        let sections = split_sections(None);
        assert_eq!(sections.primary, None);
        assert_eq!(sections.secondary, "");
    }

    #[test]
    fn test_only_first_delimiter_splits() {
        let sections = split_sections(Some("a: 1\nNegative prompt: b: 2\nNegative prompt: c: 3"));
        assert_eq!(sections.primary.as_deref(), Some("a: 1"));
        assert_eq!(sections.secondary, "b: 2\nnegative prompt: c: 3");
    }

    #[test]
    fn test_lines_without_separator_are_dropped() {
        let text = "File Name   : x.png\na lone prompt line\nKey:NoSpace\n  Model  :  SDXL  ";
        assert_eq!(normalize_text(text), "file name: x.png\nmodel: SDXL");
    }

    #[test]
    fn test_key_split_on_first_separator_only() {
        assert_eq!(
            normalize_text("Parameters: Steps: 20, CFG: 7"),
            "parameters: Steps: 20, CFG: 7"
        );
    }

    #[test]
    fn test_value_case_is_preserved() {
        assert_eq!(normalize_text("MODEL: DreamShaper\r"), "model: DreamShaper");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Foo: 1\nBAR : two\nnoise\n",
            "x:: y\n: empty key\nk: ",
            "Parameters: a cat, Steps: 20\n\n\tSeed\t:  42  ",
            "",
        ];
        for raw in samples {
            let once = normalize_text(raw);
            assert_eq!(normalize_text(&once), once, "input: {:?}", raw);
        }
    }

    #[test]
    fn test_sections_of_canonical_text_are_stable() {
        let raw = "foo: 1\nbar: 2";
        let first = split_sections(Some(raw));
        let again = split_sections(first.primary.as_deref());
        assert_eq!(first, again);
    }
}
