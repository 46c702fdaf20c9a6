//! Sequential execution of compiled IR against an [`AutomationDriver`].
//!
//! Nodes run one after another in a single session. A failing node aborts the
//! rest of its trajectory; later trajectories still run. Cancellation is only
//! observed between nodes.

use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::driver::AutomationDriver;
use crate::error::ExecutionError;
use crate::types::{Action, CompilationResult, IrNode};

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Delay after every node flagged with a stabilization wait
    pub stabilization_wait: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            stabilization_wait: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrajectoryOutcome {
    Completed {
        executed: usize,
        skipped_unknown: usize,
    },
    Aborted {
        executed: usize,
        remaining: usize,
        #[serde(serialize_with = "display")]
        error: ExecutionError,
    },
    Cancelled {
        executed: usize,
        remaining: usize,
    },
}

fn display<S: serde::Serializer>(error: &ExecutionError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrajectoryReport {
    pub trajectory: usize,
    pub description: String,
    pub outcome: TrajectoryOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub trajectories: Vec<TrajectoryReport>,
}

impl ExecutionReport {
    pub fn all_completed(&self) -> bool {
        self.trajectories
            .iter()
            .all(|t| matches!(t.outcome, TrajectoryOutcome::Completed { .. }))
    }
}

pub struct Executor<D> {
    driver: D,
    config: ExecutionConfig,
    cancel: CancellationToken,
}

impl<D: AutomationDriver> Executor<D> {
    pub fn new(driver: D, config: ExecutionConfig, cancel: CancellationToken) -> Self {
        Self {
            driver,
            config,
            cancel,
        }
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Run every trajectory in the compiled result, in order. Trajectories
    /// without nodes are reported as completed with nothing executed.
    pub fn run(&mut self, compiled: &CompilationResult) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for summary in &compiled.trajectories {
            let nodes = nodes_of(&compiled.nodes, summary.index);
            let outcome = self.run_trajectory(nodes);
            match &outcome {
                TrajectoryOutcome::Completed { executed, .. } => {
                    info!(trajectory = summary.index, executed, "trajectory completed")
                }
                TrajectoryOutcome::Aborted { error, remaining, .. } => {
                    warn!(trajectory = summary.index, remaining, "trajectory aborted: {}", error)
                }
                TrajectoryOutcome::Cancelled { remaining, .. } => {
                    warn!(trajectory = summary.index, remaining, "trajectory cancelled")
                }
            }

            report.trajectories.push(TrajectoryReport {
                trajectory: summary.index,
                description: summary.description.clone(),
                outcome,
            });
        }

        report
    }

    fn run_trajectory(&mut self, nodes: &[IrNode]) -> TrajectoryOutcome {
        let mut skipped_unknown = 0;

        for (executed, node) in nodes.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return TrajectoryOutcome::Cancelled {
                    executed,
                    remaining: nodes.len() - executed,
                };
            }

            match self.run_node(node) {
                Ok(true) => {}
                Ok(false) => skipped_unknown += 1,
                Err(error) => {
                    return TrajectoryOutcome::Aborted {
                        executed,
                        remaining: nodes.len() - executed,
                        error,
                    };
                }
            }

            if node.followed_by_stabilization_wait {
                self.driver.wait(self.config.stabilization_wait);
            }
        }

        TrajectoryOutcome::Completed {
            executed: nodes.len(),
            skipped_unknown,
        }
    }

    /// Returns `Ok(false)` when the node carried nothing executable.
    fn run_node(&mut self, node: &IrNode) -> Result<bool, ExecutionError> {
        let position = node.metadata.position;
        let driver_err = |e: anyhow::Error| ExecutionError::Driver {
            position,
            message: format!("{:#}", e),
        };

        info!(%position, action = ?node.action, "executing step");

        match &node.action {
            Action::Navigate { url } => {
                self.driver.open(url).map_err(driver_err)?;
                self.driver.wait_for_load().map_err(driver_err)?;
            }
            Action::Click { .. } => {
                let target = self.resolve(node)?;
                self.driver.click(&target).map_err(driver_err)?;
            }
            Action::Type { text, .. } => {
                let target = self.resolve(node)?;
                self.driver.fill(&target, text).map_err(driver_err)?;
            }
            Action::Scroll => self.driver.scroll_to_bottom().map_err(driver_err)?,
            Action::Close => self.driver.close().map_err(driver_err)?,
            Action::Unknown { raw, reason } => {
                warn!(%position, raw = %raw, reason = %reason, "skipping unrecognized step");
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn resolve(&mut self, node: &IrNode) -> Result<crate::driver::ResolvedTarget, ExecutionError> {
        let position = node.metadata.position;
        let candidates = match node.selector_candidates.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => {
                return Err(ExecutionError::MissingCandidates {
                    position,
                    action: format!("{:?}", node.action),
                });
            }
        };

        match self.driver.resolve(candidates) {
            Ok(Some(target)) => Ok(target),
            Ok(None) => Err(ExecutionError::SelectorExhaustion {
                position,
                tried: candidates.len(),
            }),
            Err(e) => Err(ExecutionError::Driver {
                position,
                message: format!("{:#}", e),
            }),
        }
    }
}

/// The contiguous run of nodes belonging to one trajectory.
fn nodes_of(nodes: &[IrNode], trajectory: usize) -> &[IrNode] {
    let start = nodes.partition_point(|n| n.metadata.position.trajectory < trajectory);
    let len = nodes[start..]
        .iter()
        .take_while(|n| n.metadata.position.trajectory == trajectory)
        .count();
    &nodes[start..start + len]
}
