//! Fallback locator synthesis for Click and Type actions.
//!
//! Candidates are plain data in priority order. Whether one matches is decided
//! at run time by the driver, trying them first to last.

use serde::{Deserialize, Serialize};

use crate::types::Action;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// How a candidate locates its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Visible text equals the target
    ExactText,
    /// Visible text contains the target, ignoring case
    TextContains,
    /// Button or link with a matching accessible name
    Role,
    /// Input placeholder contains the hint
    Placeholder,
    /// Input name attribute contains the hint
    NameAttribute,
    /// Input labelled by text containing the hint
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Css,
    XPath,
}

impl StrategyKind {
    pub fn syntax(&self) -> Syntax {
        match self {
            StrategyKind::Placeholder | StrategyKind::NameAttribute => Syntax::Css,
            StrategyKind::ExactText
            | StrategyKind::TextContains
            | StrategyKind::Role
            | StrategyKind::Label => Syntax::XPath,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub strategy: StrategyKind,
    pub expression: String,
}

impl SelectorCandidate {
    fn new(strategy: StrategyKind, expression: String) -> Self {
        Self {
            strategy,
            expression,
        }
    }
}

/// Ordered fallback locators for an action. Empty for actions without a target.
pub fn synthesize(action: &Action) -> Vec<SelectorCandidate> {
    match action {
        Action::Click { target_text } => click_candidates(target_text),
        Action::Type { field_hint, .. } => type_candidates(field_hint),
        _ => Vec::new(),
    }
}

fn click_candidates(target: &str) -> Vec<SelectorCandidate> {
    let exact = xpath_literal(target);
    let lowered = xpath_literal(&target.to_ascii_lowercase());

    vec![
        SelectorCandidate::new(
            StrategyKind::ExactText,
            format!("//*[normalize-space(text())={exact}]"),
        ),
        SelectorCandidate::new(
            StrategyKind::TextContains,
            format!("//*[contains({}, {lowered})]", lowercase("normalize-space(text())")),
        ),
        SelectorCandidate::new(
            StrategyKind::Role,
            format!(
                "//*[(self::button or self::a or @role='button' or @role='link') \
                 and (normalize-space(.)={exact} or @aria-label={exact})]"
            ),
        ),
    ]
}

fn type_candidates(hint: &str) -> Vec<SelectorCandidate> {
    let css = css_string(hint);
    let lowered = xpath_literal(&hint.to_ascii_lowercase());
    let label_text = format!("contains({}, {lowered})", lowercase("normalize-space(.)"));

    vec![
        SelectorCandidate::new(
            StrategyKind::Placeholder,
            format!("input[placeholder*={css} i], textarea[placeholder*={css} i]"),
        ),
        SelectorCandidate::new(
            StrategyKind::NameAttribute,
            format!("input[name*={css} i]"),
        ),
        SelectorCandidate::new(
            StrategyKind::Label,
            format!(
                "//input[@id=//label[{label_text}]/@for] | //label[{label_text}]//input"
            ),
        ),
    ]
}

/// XPath 1.0 `translate()` lowercasing of an expression.
fn lowercase(expr: &str) -> String {
    format!("translate({expr}, '{UPPER}', '{LOWER}')")
}

/// Quote a string as an XPath literal. XPath has no escapes, so text holding
/// both quote kinds is spliced together with `concat()`.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }

    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Quote a string for a CSS attribute selector.
pub fn css_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' | '\'' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\a "),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
