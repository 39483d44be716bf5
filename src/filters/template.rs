//! Placeholder substitution.
//!
//! Every `{{ key }}` in the content is replaced:
//!
//! | Key | Value |
//! |-----|-------|
//! | `content`, `yield` | the content being laid out (layout steps only) |
//! | `identifier` | identifier of the item being compiled |
//! | `rep` | name of the rep being compiled |
//! | `path` | public path of the rep being compiled |
//! | `site.<key>` | value from the `[site]` config table |
//! | `layout.<key>` | attribute of the layout being rendered |
//! | `include <identifier> [rep]` | final content of another rep |
//! | `path_of <identifier> [rep]` | public path of another rep |
//! | anything else | attribute of the item being compiled |
//!
//! Missing values render as the empty string, unless `strict = true` is set,
//! in which case they are an error.
//!
//! `include` on a rep that has not been compiled yet stops the filter with an
//! unmet dependency; the rep is retried after the included one.

use super::{Filter, FilterContext, FilterError, Params, bool_param};
use crate::item::value_to_text;
use crate::rep::{DEFAULT_REP, SnapshotName};
use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("placeholder regex is valid"));

pub struct Template;

impl Filter for Template {
    fn run(
        &self,
        content: &str,
        ctx: &FilterContext<'_>,
        params: &Params,
    ) -> Result<String, FilterError> {
        let strict = bool_param(params, "strict")?.unwrap_or(false);
        let mut out = String::with_capacity(content.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(content) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&content[last..whole.start()]);
            match resolve(key.as_str(), ctx)? {
                Some(value) => out.push_str(&value),
                None if strict => {
                    return Err(FilterError::Failed(format!(
                        "no value for `{{{{ {} }}}}`",
                        key.as_str()
                    )));
                }
                None => {}
            }
            last = whole.end();
        }
        out.push_str(&content[last..]);
        Ok(out)
    }
}

fn resolve(key: &str, ctx: &FilterContext<'_>) -> Result<Option<String>, FilterError> {
    let mut words = key.split_whitespace();
    let head = words.next().unwrap_or_default();

    match head {
        "include" | "path_of" => {
            let Some(identifier) = words.next() else {
                return Err(FilterError::Failed(format!(
                    "`{head}` needs an item identifier"
                )));
            };
            let rep = words.next().unwrap_or(DEFAULT_REP);
            if head == "include" {
                ctx.snapshot(identifier, rep, SnapshotName::Last).map(Some)
            } else {
                ctx.path_of(identifier, rep)
            }
        }
        "content" | "yield" => Ok(ctx.content().map(str::to_string)),
        "identifier" => Ok(Some(ctx.identifier().to_string())),
        "rep" => Ok(Some(ctx.rep().name().to_string())),
        "path" => Ok(ctx.rep().path().map(str::to_string)),
        _ => {
            if let Some(setting) = head.strip_prefix("site.") {
                return Ok(ctx.site_setting(setting).map(value_to_text));
            }
            if let Some(attr) = head.strip_prefix("layout.") {
                return Ok(ctx
                    .layout()
                    .and_then(|l| l.attributes.get(attr))
                    .map(value_to_text));
            }
            Ok(ctx.attribute(head).as_ref().map(value_to_text))
        }
    }
}
