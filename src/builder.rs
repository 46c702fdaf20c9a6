//! Sequence builder: demonstrations in, ordered IR out.

use tracing::debug;

use crate::parser;
use crate::selector;
use crate::types::{
    ActionDescriptor, CompilationResult, IrNode, NodeMetadata, ParseDiagnostic, Position,
    Trajectory, TrajectorySummary,
};

/// Compile a batch of trajectories, preserving trajectory, subtask and action order.
pub fn build(trajectories: &[Trajectory]) -> CompilationResult {
    let mut result = CompilationResult::default();
    for (index, trajectory) in trajectories.iter().enumerate() {
        result.extend(compile_trajectory(index, trajectory));
    }

    debug!(
        nodes = result.nodes.len(),
        diagnostics = result.diagnostics.len(),
        "compiled {} trajectories",
        trajectories.len()
    );
    result
}

/// Compile one trajectory. `index` is its position in the surrounding batch.
///
/// Independent of every other trajectory, so batches may be compiled in
/// parallel and concatenated in index order.
pub fn compile_trajectory(index: usize, trajectory: &Trajectory) -> CompilationResult {
    let mut result = CompilationResult {
        trajectories: vec![TrajectorySummary {
            index,
            description: trajectory.description.clone(),
        }],
        ..Default::default()
    };

    for (subtask_index, subtask) in trajectory.subtasks.iter().enumerate() {
        for (action_index, raw) in subtask.action_descriptions.iter().enumerate() {
            let descriptor = ActionDescriptor {
                raw,
                position: Position {
                    trajectory: index,
                    subtask: subtask_index,
                    action: action_index,
                },
            };

            let (action, diagnostics) = parser::parse(descriptor.raw);
            result
                .diagnostics
                .extend(diagnostics.into_iter().map(|d| ParseDiagnostic {
                    position: descriptor.position,
                    raw: descriptor.raw.to_string(),
                    kind: d.kind,
                    reason: d.reason,
                }));

            let selector_candidates = action
                .needs_locator()
                .then(|| selector::synthesize(&action));

            result.nodes.push(IrNode {
                action,
                selector_candidates,
                metadata: NodeMetadata {
                    trajectory_description: trajectory.description.clone(),
                    subtask_description: subtask.description.clone(),
                    position: descriptor.position,
                },
                followed_by_stabilization_wait: true,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::StrategyKind;
    use crate::types::{Action, Subtask};

    fn trajectory(description: &str, subtasks: &[(&str, &[&str])]) -> Trajectory {
        Trajectory {
            description: description.into(),
            subtasks: subtasks
                .iter()
                .map(|(d, actions)| Subtask {
                    description: (*d).into(),
                    action_descriptions: actions.iter().map(|a| (*a).into()).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_one_node_per_action() {
        let input = vec![
            trajectory("a", &[("s1", &["Click on A.", "bogus"]), ("s2", &[])]),
            trajectory("b", &[("s1", &["Scroll to the end.", "Close the tab.", "???"])]),
        ];
        let result = build(&input);
        assert_eq!(result.nodes.len(), 5);
    }

    #[test]
    fn test_order_and_positions() {
        let input = vec![
            trajectory("a", &[("s1", &["Click on A.", "Click on B."]), ("s2", &["Click on C."])]),
            trajectory("b", &[("s1", &["Click on D."])]),
        ];
        let result = build(&input);
        let targets: Vec<_> = result
            .nodes
            .iter()
            .map(|n| match &n.action {
                Action::Click { target_text } => target_text.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(targets, vec!["A", "B", "C", "D"]);

        let last = &result.nodes[3].metadata;
        assert_eq!(
            last.position,
            Position {
                trajectory: 1,
                subtask: 0,
                action: 0
            }
        );
        assert_eq!(result.nodes[2].metadata.subtask_description, "s2");
        assert_eq!(result.nodes[2].metadata.trajectory_description, "a");
    }

    #[test]
    fn test_candidates_only_on_targeted_actions() {
        let input = vec![trajectory(
            "a",
            &[(
                "s",
                &[
                    "URL navigation to https://x.com",
                    "Click on Go.",
                    "Type 'x' into the name field.",
                    "Scroll to bottom.",
                ],
            )],
        )];
        let result = build(&input);
        assert!(result.nodes[0].selector_candidates.is_none());
        let click = result.nodes[1].selector_candidates.as_ref().unwrap();
        assert_eq!(click[0].strategy, StrategyKind::ExactText);
        let type_ = result.nodes[2].selector_candidates.as_ref().unwrap();
        assert_eq!(type_[0].strategy, StrategyKind::Placeholder);
        assert!(result.nodes[3].selector_candidates.is_none());
    }

    #[test]
    fn test_every_node_waits() {
        let input = vec![trajectory("a", &[("s", &["Close the tab.", "junk", "Click on X."])])];
        assert!(
            build(&input)
                .nodes
                .iter()
                .all(|n| n.followed_by_stabilization_wait)
        );
    }

    #[test]
    fn test_diagnostics_carry_position() {
        let input = vec![trajectory("a", &[("s", &["Click on X.", "Type hello"])])];
        let result = build(&input);
        assert_eq!(result.diagnostics.len(), 1);
        let d = &result.diagnostics[0];
        assert_eq!(d.position.action, 1);
        assert_eq!(d.raw, "Type hello");
        assert!(d.reason.contains("missing"));
    }

    #[test]
    fn test_deterministic() {
        let input = vec![trajectory("a", &[("s", &["Click on X.", "Type hello", "Scroll to top."])])];
        assert_eq!(build(&input), build(&input));
    }

    #[test]
    fn test_build_matches_per_trajectory_concat() {
        let input = vec![
            trajectory("a", &[("s", &["Click on X."])]),
            trajectory("b", &[("s", &["nonsense"])]),
        ];
        let mut joined = compile_trajectory(0, &input[0]);
        joined.extend(compile_trajectory(1, &input[1]));
        assert_eq!(build(&input), joined);
    }

    #[test]
    fn test_empty_input() {
        let result = build(&[]);
        assert!(result.nodes.is_empty());
        assert!(result.diagnostics.is_empty());
        assert!(result.trajectories.is_empty());
    }

    #[test]
    fn test_empty_trajectory_is_still_listed() {
        let input = vec![trajectory("empty", &[]), trajectory("b", &[("s", &["Scroll to end."])])];
        let result = build(&input);
        assert_eq!(result.nodes.len(), 1);
        let listed: Vec<_> = result
            .trajectories
            .iter()
            .map(|t| (t.index, t.description.as_str()))
            .collect();
        assert_eq!(listed, vec![(0, "empty"), (1, "b")]);
    }
}
