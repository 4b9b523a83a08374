//! Detail content attached to test and fixture outcomes
//!
//! A detail is a named piece of content (a reason, a captured log, an error
//! chain) carried alongside an outcome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Detail name used for the one-line reason of an outcome
pub const REASON: &str = "reason";

/// Detail name used for an error chain
pub const TRACEBACK: &str = "traceback";

/// Detail name used for captured log output
pub const LOG: &str = "log";

/// Typed detail content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Json(serde_json::Value),
    Url(String),
    Traceback(String),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(text.into())
    }

    pub fn json(value: serde_json::Value) -> Self {
        Content::Json(value)
    }

    pub fn url(url: impl Into<String>) -> Self {
        Content::Url(url.into())
    }

    /// Render an error and its full cause chain
    pub fn traceback(err: &anyhow::Error) -> Self {
        Content::Traceback(format!("{err:?}"))
    }

    /// MIME-style content type
    pub fn content_type(&self) -> &'static str {
        match self {
            Content::Text(_) | Content::Traceback(_) => "text/plain; charset=utf8",
            Content::Json(_) => "application/json",
            Content::Url(_) => "text/x-url",
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) | Content::Url(s) | Content::Traceback(s) => s.clone(),
            Content::Json(v) => v.to_string(),
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Named details of a single outcome
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Details(BTreeMap<String, Content>);

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    /// Details holding only a reason
    pub fn reason(reason: impl Into<String>) -> Self {
        let mut details = Self::new();
        details.insert(REASON, Content::text(reason));
        details
    }

    pub fn with(mut self, name: impl Into<String>, content: Content) -> Self {
        self.insert(name, content);
        self
    }

    /// Insert, replacing any detail with the same name
    pub fn insert(&mut self, name: impl Into<String>, content: Content) {
        self.0.insert(name.into(), content);
    }

    /// Insert without overwriting: a taken name gets a `-1`, `-2`, ... suffix.
    /// Returns the name actually used.
    pub fn add(&mut self, name: &str, content: Content) -> String {
        let mut try_name = name.to_string();
        let mut count = 0;
        while self.0.contains_key(&try_name) {
            count += 1;
            try_name = format!("{name}-{count}");
        }
        self.0.insert(try_name.clone(), content);
        try_name
    }

    pub fn get(&self, name: &str) -> Option<&Content> {
        self.0.get(name)
    }

    /// Remove and return the reason text, if any
    pub fn take_reason(&mut self) -> Option<String> {
        self.0.remove(REASON).map(|c| c.as_text())
    }

    pub fn reason_text(&self) -> Option<String> {
        self.0.get(REASON).map(|c| c.as_text())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Content)> {
        self.0.iter()
    }

    /// Flatten to a printable block, traceback last
    pub fn to_display_string(&self) -> String {
        let mut output = String::new();
        for (name, content) in self.0.iter().filter(|(n, _)| n.as_str() != TRACEBACK) {
            output.push_str(&format!("{name}: {{{{{{\n{content}\n}}}}}}\n"));
        }
        if let Some(tb) = self.0.get(TRACEBACK) {
            output.push_str(&tb.as_text());
            output.push('\n');
        }
        output
    }
}
