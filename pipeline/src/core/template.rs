//! Placeholder substitution for configuration templates.
//!
//! Templates carry literal tokens (`LAT`, `LON`, `startYear`, `endYear` and a
//! site token by default). Substitution is a single left-to-right pass, so a
//! replacement value is never scanned again, even if it happens to contain a
//! token. [`Rendered`] remembers where values were inserted so that token
//! text inside a value is not mistaken for an unresolved placeholder.

use std::ops::Range;

use anyhow::{Result, bail};
use regex::Regex;

/// One placeholder token and its replacement value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValue {
    pub token: String,
    pub value: String,
}

/// Compiled token set for one run.
#[derive(Debug, Clone)]
pub struct Substitution {
    pairs: Vec<TokenValue>,
    pattern: Regex,
}

impl Substitution {
    /// Compile a substitution for `pairs`.
    ///
    /// Tokens must be non-empty and distinct. Longer tokens take precedence
    /// where one token is a prefix of another.
    pub fn new(mut pairs: Vec<TokenValue>) -> Result<Self> {
        if pairs.is_empty() {
            bail!("no placeholder tokens configured");
        }
        for pair in &pairs {
            if pair.token.is_empty() {
                bail!("placeholder tokens must be non-empty");
            }
        }
        pairs.sort_by(|a, b| b.token.len().cmp(&a.token.len()).then(a.token.cmp(&b.token)));
        if let Some(dup) = pairs.windows(2).find(|w| w[0].token == w[1].token) {
            bail!("duplicate placeholder token {:?}", dup[0].token);
        }
        let alternation = pairs
            .iter()
            .map(|pair| regex::escape(&pair.token))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&alternation)?;
        Ok(Self { pairs, pattern })
    }

    /// Replace every token occurrence in one pass.
    pub fn apply(&self, input: &str) -> String {
        self.render(input).text
    }

    /// Replace every token occurrence in one pass, keeping track of the byte
    /// ranges of `text` that hold replacement values.
    pub fn render(&self, input: &str) -> Rendered {
        let mut text = String::with_capacity(input.len());
        let mut value_spans = Vec::new();
        let mut last = 0;
        for m in self.pattern.find_iter(input) {
            text.push_str(&input[last..m.start()]);
            let start = text.len();
            text.push_str(self.value_for(m.as_str()));
            value_spans.push(start..text.len());
            last = m.end();
        }
        text.push_str(&input[last..]);
        Rendered { text, value_spans }
    }

    /// Tokens in `rendered` that do not lie entirely inside a replacement
    /// value, sorted and deduplicated. A token formed across a value and the
    /// surrounding template text is reported.
    pub fn unresolved_in(&self, rendered: &Rendered) -> Vec<String> {
        let mut found: Vec<String> = self
            .pattern
            .find_iter(&rendered.text)
            .filter(|m| !rendered.within_value(m.range()))
            .map(|m| m.as_str().to_string())
            .collect();
        found.sort();
        found.dedup();
        found
    }

    fn value_for<'a>(&'a self, token: &'a str) -> &'a str {
        self.pairs
            .iter()
            .find(|pair| pair.token == token)
            .map_or(token, |pair| pair.value.as_str())
    }

    /// Tokens still present in `text`, sorted and deduplicated.
    pub fn unresolved(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = self
            .pattern
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        found.sort();
        found.dedup();
        found
    }
}

/// Output of [`Substitution::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    value_spans: Vec<Range<usize>>,
}

impl Rendered {
    fn within_value(&self, range: Range<usize>) -> bool {
        self.value_spans
            .iter()
            .any(|span| span.start <= range.start && range.end <= span.end)
    }
}

/// File name of a materialized template: `{stem}__{template_name}`.
pub fn materialized_file_name(stem: &str, template_name: &str) -> String {
    format!("{stem}__{template_name}")
}
