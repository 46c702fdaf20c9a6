//! Rule-based recognition of free-text action descriptions.
//!
//! Rules are tried in table order and the first rule whose trigger occurs in
//! the text wins. A rule that fires but cannot find a delimiter it needs
//! downgrades the action to [`Action::Unknown`] with a diagnostic; parsing
//! never fails.

use crate::types::{Action, Diagnostic, DiagnosticKind};

const NO_MATCH: &str = "no matching pattern";

/// A delimiter the rule expected but did not find.
type Missing = &'static str;

/// How a rule recognizes its keyword in the raw text.
#[derive(Debug, Clone, Copy)]
pub enum Trigger {
    /// The substring occurs anywhere.
    Anywhere(&'static str),
    /// The text starts with this whole word.
    LeadingWord(&'static str),
}

impl Trigger {
    /// Byte offset just past the match.
    fn find(self, raw: &str) -> Option<usize> {
        match self {
            Trigger::Anywhere(s) => raw.find(s).map(|at| at + s.len()),
            Trigger::LeadingWord(word) => {
                let start = raw.len() - raw.trim_start().len();
                let rest = raw[start..].strip_prefix(word)?;
                match rest.chars().next() {
                    None => Some(raw.len()),
                    Some(c) if c.is_whitespace() => Some(start + word.len()),
                    Some(_) => None,
                }
            }
        }
    }
}

pub struct Rule {
    pub name: &'static str,
    /// Any one of these selects the rule.
    pub triggers: &'static [Trigger],
    /// Receives the raw text and the byte offset just past the matched trigger.
    pub extract: fn(&str, usize) -> Result<Action, Missing>,
}

/// Priority order: Navigate > Click > Type > Scroll > Close.
pub const RULES: &[Rule] = &[
    Rule {
        name: "navigate",
        triggers: &[Trigger::Anywhere("URL navigation to")],
        extract: extract_navigate,
    },
    Rule {
        name: "click",
        triggers: &[Trigger::Anywhere("Click on")],
        extract: extract_click,
    },
    Rule {
        name: "type",
        triggers: &[Trigger::LeadingWord("Type")],
        extract: extract_type,
    },
    Rule {
        name: "scroll",
        triggers: &[Trigger::Anywhere("Scroll to")],
        extract: extract_scroll,
    },
    Rule {
        name: "close",
        triggers: &[Trigger::Anywhere("Close the"), Trigger::Anywhere("Closed the")],
        extract: extract_close,
    },
];

/// Parse one action description.
pub fn parse(raw: &str) -> (Action, Vec<Diagnostic>) {
    parse_with(RULES, raw)
}

/// Parse against a custom rule table.
pub fn parse_with(rules: &[Rule], raw: &str) -> (Action, Vec<Diagnostic>) {
    for rule in rules {
        let Some(end) = find_trigger(rule, raw) else {
            continue;
        };

        return match (rule.extract)(raw, end) {
            Ok(action) => (action, Vec::new()),
            Err(delimiter) => {
                let reason = format!("malformed {}: missing {}", rule.name, delimiter);
                let diagnostic = Diagnostic {
                    kind: DiagnosticKind::Malformed {
                        rule: rule.name.to_string(),
                        delimiter: delimiter.to_string(),
                    },
                    reason: reason.clone(),
                };
                (unknown(raw, reason), vec![diagnostic])
            }
        };
    }

    let diagnostic = Diagnostic {
        kind: DiagnosticKind::Unrecognized,
        reason: NO_MATCH.to_string(),
    };
    (unknown(raw, NO_MATCH.to_string()), vec![diagnostic])
}

fn find_trigger(rule: &Rule, raw: &str) -> Option<usize> {
    rule.triggers.iter().find_map(|trigger| trigger.find(raw))
}

fn unknown(raw: &str, reason: String) -> Action {
    Action::Unknown {
        raw: raw.to_string(),
        reason,
    }
}

/// Text up to the trailing period, trimmed.
fn until_trailing_period(text: &str) -> Result<&str, Missing> {
    text.trim()
        .strip_suffix('.')
        .map(str::trim)
        .ok_or("trailing period")
}

fn extract_navigate(raw: &str, end: usize) -> Result<Action, Missing> {
    let url = raw[end..].trim();
    if url.is_empty() {
        return Err("url");
    }
    Ok(Action::Navigate {
        url: url.to_string(),
    })
}

fn extract_click(raw: &str, end: usize) -> Result<Action, Missing> {
    let target = until_trailing_period(&raw[end..])?;
    if target.is_empty() {
        return Err("target text");
    }
    Ok(Action::Click {
        target_text: target.to_string(),
    })
}

fn extract_scroll(_: &str, _: usize) -> Result<Action, Missing> {
    Ok(Action::Scroll)
}

fn extract_close(_: &str, _: usize) -> Result<Action, Missing> {
    Ok(Action::Close)
}

fn extract_type(raw: &str, end: usize) -> Result<Action, Missing> {
    let rest = &raw[end..];
    let open = rest.find('\'').ok_or("quote pair")?;
    let after_open = &rest[open + 1..];

    // The closing quote is the last one before "into the", so the text may
    // itself contain apostrophes.
    let marker = "into the";
    let Some(at) = after_open.rfind(marker) else {
        after_open.find('\'').ok_or("quote pair")?;
        return Err("into the");
    };
    let close = after_open[..at].rfind('\'').ok_or("quote pair")?;
    let text = &after_open[..close];
    let hint = until_trailing_period(&after_open[at + marker.len()..])?;

    Ok(Action::Type {
        text: text.to_string(),
        field_hint: hint.to_string(),
    })
}
