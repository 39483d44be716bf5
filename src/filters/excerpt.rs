//! Truncation to a fixed number of characters.
//!
//! | Param | Default | |
//! |-------|---------|-|
//! | `length` | `25` | maximum length of the result, omission included |
//! | `omission` | `"..."` | appended when the text is cut |
//! | `strip_html` | `true` | drop tags before measuring |
//!
//! Lengths count characters, not bytes.

use super::{Filter, FilterContext, FilterError, Params, bool_param, str_param, usize_param};

const DEFAULT_LENGTH: usize = 25;
const DEFAULT_OMISSION: &str = "...";

pub struct Excerpt;

impl Filter for Excerpt {
    fn run(
        &self,
        content: &str,
        _ctx: &FilterContext<'_>,
        params: &Params,
    ) -> Result<String, FilterError> {
        let length = usize_param(params, "length")?.unwrap_or(DEFAULT_LENGTH);
        let omission = str_param(params, "omission")?.unwrap_or(DEFAULT_OMISSION);
        let text = if bool_param(params, "strip_html")?.unwrap_or(true) {
            strip_html_tags(content)
        } else {
            content.to_string()
        };
        Ok(excerptize(&text, length, omission))
    }
}

/// Cut `text` so the result, omission included, is at most `length` characters.
pub fn excerptize(text: &str, length: usize, omission: &str) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }
    let keep = length.saturating_sub(omission.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(omission);
    out
}

/// Strip HTML tags (simple angle-bracket stripping).
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;

    const TEXT: &str = "Foo bar baz quux meow woof";

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(excerptize("Foo", 25, "..."), "Foo");
    }

    #[test]
    fn default_length_is_25() {
        assert_eq!(excerptize(TEXT, DEFAULT_LENGTH, "..."), "Foo bar baz quux meow ...");
    }

    #[test]
    fn omission_counts_towards_length() {
        assert_eq!(excerptize(TEXT, 3, "..."), "...");
        assert_eq!(excerptize(TEXT, 7, "..."), "Foo ...");
        assert_eq!(excerptize(TEXT, 15, "[continued]"), "Foo [continued]");
    }

    #[test]
    fn length_shorter_than_omission_yields_omission() {
        assert_eq!(excerptize(TEXT, 1, "..."), "...");
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(excerptize("ééééé", 4, "…"), "ééé…");
    }

    #[test]
    fn filter_strips_html_by_default() {
        let site = site_with_items(&[("/a/", "")]);
        let ctx = crate::filters::FilterContext::new(&site, rep_of(&site, "/a/", "default"));
        let params: Params = [("length".to_string(), json!(7))].into_iter().collect();

        let out = Excerpt.run("<p>Foo <b>bar</b> baz</p>", &ctx, &params).unwrap();
        assert_eq!(out, "Foo ...");
    }

    #[test]
    fn filter_rejects_bad_length() {
        let site = site_with_items(&[("/a/", "")]);
        let ctx = crate::filters::FilterContext::new(&site, rep_of(&site, "/a/", "default"));
        let params: Params = [("length".to_string(), json!("ten"))].into_iter().collect();
        assert!(matches!(
            Excerpt.run(TEXT, &ctx, &params),
            Err(FilterError::InvalidParam { .. })
        ));
    }
}
