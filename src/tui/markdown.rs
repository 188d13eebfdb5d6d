//! Lightweight markup to terminal styling.
//!
//! Only a handful of constructs are recognised: fenced code blocks, inline
//! code, bold, `#`..`###` headings, horizontal rules and `*`/`-` bullets.
//! This runs on whole buffers at zoom time, never per fragment.

use crossterm::style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};
use regex::Regex;
use std::sync::OnceLock;

const RULE_WIDTH: usize = 60;

struct Rule {
    pattern: Regex,
    replacement: String,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let code = format!("{}${{1}}{}", SetForegroundColor(Color::DarkYellow), ResetColor);
        let bold = format!(
            "{}${{1}}{}",
            SetAttribute(Attribute::Bold),
            SetAttribute(Attribute::Reset)
        );

        // Order matters: fenced blocks must be consumed before inline spans.
        let table = [
            (r"(?s)```[a-z]*\n?(.*?)```", code.clone()),
            (r"\*\*([^*\n]+)\*\*", bold.clone()),
            (r"`([^`\n]+)`", code),
            (r"(?m)^#{1,3} (.+)$", bold),
            (r"(?m)^[-*_]{3,}[ \t]*$", "─".repeat(RULE_WIDTH)),
            (r"(?m)^([ \t]*)[*-] ", "${1}• ".to_string()),
        ];

        table
            .into_iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|pattern| Rule {
                    pattern,
                    replacement,
                })
            })
            .collect()
    })
}

/// Apply terminal styling to `text`.
pub fn render_markdown(text: &str) -> String {
    let mut out = text.to_string();
    for rule in rules() {
        out = rule
            .pattern
            .replace_all(&out, rule.replacement.as_str())
            .into_owned();
    }
    out
}
