//! CommonMark to HTML via pulldown-cmark.
//!
//! Tables, strikethrough and footnotes are enabled. Set `smart_punctuation =
//! true` to turn straight quotes and dashes into typographic ones.

use super::{Filter, FilterContext, FilterError, Params, bool_param};
use pulldown_cmark::{Options, Parser, html as md_html};

pub struct Markdown;

impl Filter for Markdown {
    fn run(
        &self,
        content: &str,
        _ctx: &FilterContext<'_>,
        params: &Params,
    ) -> Result<String, FilterError> {
        let mut options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_FOOTNOTES;
        if bool_param(params, "smart_punctuation")?.unwrap_or(false) {
            options |= Options::ENABLE_SMART_PUNCTUATION;
        }
        Ok(render(content, options))
    }
}

fn render(markdown: &str, options: Options) -> String {
    let parser = Parser::new_ext(markdown, options);
    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    md_html::push_html(&mut html, parser);
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;

    fn run(content: &str, params: Params) -> String {
        let site = site_with_items(&[("/a/", content)]);
        let ctx = FilterContext::new(&site, rep_of(&site, "/a/", "default"));
        Markdown.run(content, &ctx, &params).unwrap()
    }

    #[test]
    fn renders_heading_and_paragraph() {
        let html = run("# Title\n\nSome *text*.", Params::new());
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<p>Some <em>text</em>.</p>"));
    }

    #[test]
    fn renders_tables() {
        let html = run("| a | b |\n|---|---|\n| 1 | 2 |\n", Params::new());
        assert!(html.contains("<table>"));
    }

    #[test]
    fn smart_punctuation_is_opt_in() {
        let plain = run("\"quoted\"", Params::new());
        assert!(!plain.contains('\u{201c}'));

        let params: Params = [("smart_punctuation".to_string(), json!(true))]
            .into_iter()
            .collect();
        let smart = run("\"quoted\"", params);
        assert!(smart.contains('\u{201c}'));
    }
}
