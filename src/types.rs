use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufReader;
use std::path::Path;

use crate::error::LoadError;
use crate::selector::SelectorCandidate;

/// One recorded demonstration, as produced by the demonstration source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    #[serde(rename = "trajectory_description")]
    pub description: String,
    #[serde(with = "subtask_wire")]
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub description: String,
    pub action_descriptions: Vec<String>,
}

/// The source nests every subtask under an `action_description` key.
mod subtask_wire {
    use super::Subtask;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Wrapped<T> {
        action_description: T,
    }

    pub fn serialize<S: Serializer>(subtasks: &[Subtask], s: S) -> Result<S::Ok, S::Error> {
        let wrapped: Vec<Wrapped<&Subtask>> = subtasks
            .iter()
            .map(|action_description| Wrapped { action_description })
            .collect();
        wrapped.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Subtask>, D::Error> {
        let wrapped = Vec::<Wrapped<Subtask>>::deserialize(d)?;
        Ok(wrapped.into_iter().map(|w| w.action_description).collect())
    }
}

/// Zero-based location of an action description inside the input batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub trajectory: usize,
    pub subtask: usize,
    pub action: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trajectory {} / subtask {} / action {}",
            self.trajectory, self.subtask, self.action
        )
    }
}

/// A raw action description together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescriptor<'a> {
    pub raw: &'a str,
    pub position: Position,
}

/// What the user did, recognized from one action description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Navigate { url: String },
    Click { target_text: String },
    Type { text: String, field_hint: String },
    Scroll,
    Close,
    Unknown { raw: String, reason: String },
}

impl Action {
    /// Click and Type act on an element and need locator candidates.
    pub fn needs_locator(&self) -> bool {
        matches!(self, Action::Click { .. } | Action::Type { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub trajectory_description: String,
    pub subtask_description: String,
    pub position: Position,
}

/// One step of the compiled automation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrNode {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_candidates: Option<Vec<SelectorCandidate>>,
    pub metadata: NodeMetadata,
    pub followed_by_stabilization_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    Unrecognized,
    Malformed {
        rule: String,
        delimiter: String,
    },
}

/// Parser finding for a single action description, before it is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub reason: String,
}

/// A non-fatal parse finding tagged with its originating position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub position: Position,
    pub raw: String,
    pub kind: DiagnosticKind,
    pub reason: String,
}

/// One compiled trajectory, listed even when it produced no nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub index: usize,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationResult {
    #[serde(default)]
    pub trajectories: Vec<TrajectorySummary>,
    pub nodes: Vec<IrNode>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl CompilationResult {
    /// Appends another result, keeping node and diagnostic order.
    pub fn extend(&mut self, other: CompilationResult) {
        self.trajectories.extend(other.trajectories);
        self.nodes.extend(other.nodes);
        self.diagnostics.extend(other.diagnostics);
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Trajectory>),
    One(Trajectory),
}

/// Parse demonstration JSON holding either one trajectory or an array of them.
pub fn parse_trajectories(json: &str) -> Result<Vec<Trajectory>, LoadError> {
    let parsed: OneOrMany = serde_json::from_str(json)?;
    Ok(match parsed {
        OneOrMany::Many(list) => list,
        OneOrMany::One(single) => vec![single],
    })
}

pub fn load_trajectories(path: &Path) -> Result<Vec<Trajectory>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let parsed: OneOrMany = serde_json::from_reader(reader)?;
    Ok(match parsed {
        OneOrMany::Many(list) => list,
        OneOrMany::One(single) => vec![single],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "trajectory_description": "Order a latte",
        "subtasks": [
            { "action_description": {
                "description": "Open the shop",
                "action_descriptions": ["URL navigation to https://shop.example"]
            } },
            { "action_description": {
                "description": "Search",
                "action_descriptions": ["Type 'latte' into the search box.", "Click on Search."]
            } }
        ]
    }"#;

    #[test]
    fn test_parse_single_trajectory() {
        let trajectories = parse_trajectories(SAMPLE).unwrap();
        assert_eq!(trajectories.len(), 1);
        let t = &trajectories[0];
        assert_eq!(t.description, "Order a latte");
        assert_eq!(t.subtasks.len(), 2);
        assert_eq!(t.subtasks[1].description, "Search");
        assert_eq!(t.subtasks[1].action_descriptions[1], "Click on Search.");
    }

    #[test]
    fn test_parse_trajectory_array() {
        let json = format!("[{SAMPLE}, {SAMPLE}]");
        let trajectories = parse_trajectories(&json).unwrap();
        assert_eq!(trajectories.len(), 2);
    }

    #[test]
    fn test_wire_format_round_trip_keeps_nesting() {
        let trajectories = parse_trajectories(SAMPLE).unwrap();
        let value = serde_json::to_value(&trajectories[0]).unwrap();
        assert_eq!(
            value["subtasks"][0]["action_description"]["description"],
            "Open the shop"
        );
    }

    #[test]
    fn test_parse_rejects_missing_subtasks() {
        let err = parse_trajectories(r#"{"trajectory_description": "x"}"#).unwrap_err();
        assert!(matches!(err, LoadError::Json(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let trajectories = load_trajectories(file.path()).unwrap();
        assert_eq!(trajectories[0].subtasks[0].action_descriptions.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_trajectories(Path::new("/nonexistent/demo.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_needs_locator() {
        assert!(Action::Click { target_text: "Go".into() }.needs_locator());
        assert!(
            Action::Type {
                text: "a".into(),
                field_hint: "b".into()
            }
            .needs_locator()
        );
        assert!(!Action::Scroll.needs_locator());
        assert!(!Action::Navigate { url: "x".into() }.needs_locator());
    }
}
