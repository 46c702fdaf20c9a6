//! Executing compiled plans against a scripted driver.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use trajectory_compiler::types::load_trajectories;
use trajectory_compiler::{
    AutomationDriver, ExecutionConfig, Executor, ResolvedTarget, SelectorCandidate, StrategyKind,
    TrajectoryOutcome, build,
};

/// A page where only elements reachable by the listed strategies exist.
struct ScriptedPage {
    visible: Vec<StrategyKind>,
    log: Vec<String>,
    slept: Duration,
}

impl ScriptedPage {
    fn new(visible: &[StrategyKind]) -> Self {
        Self {
            visible: visible.to_vec(),
            log: Vec::new(),
            slept: Duration::ZERO,
        }
    }
}

impl AutomationDriver for ScriptedPage {
    fn open(&mut self, url: &str) -> Result<()> {
        self.log.push(format!("open {url}"));
        Ok(())
    }

    fn wait_for_load(&mut self) -> Result<()> {
        Ok(())
    }

    fn resolve(&mut self, candidates: &[SelectorCandidate]) -> Result<Option<ResolvedTarget>> {
        Ok(candidates
            .iter()
            .enumerate()
            .find(|(_, c)| self.visible.contains(&c.strategy))
            .map(|(index, c)| ResolvedTarget {
                index,
                candidate: c.clone(),
            }))
    }

    fn click(&mut self, target: &ResolvedTarget) -> Result<()> {
        self.log.push(format!("click via {:?}", target.candidate.strategy));
        Ok(())
    }

    fn fill(&mut self, target: &ResolvedTarget, text: &str) -> Result<()> {
        self.log
            .push(format!("fill {text} via {:?}", target.candidate.strategy));
        Ok(())
    }

    fn scroll_to_bottom(&mut self) -> Result<()> {
        self.log.push("scroll".into());
        Ok(())
    }

    fn wait(&mut self, duration: Duration) {
        self.slept += duration;
    }

    fn close(&mut self) -> Result<()> {
        self.log.push("close".into());
        Ok(())
    }
}

fn config() -> ExecutionConfig {
    ExecutionConfig {
        stabilization_wait: Duration::from_millis(10),
    }
}

#[test]
fn test_sample_demo_runs_with_fallback_locators() {
    let compiled = build(&load_trajectories(Path::new("demos/order_latte.json")).unwrap());
    // No exact-text or placeholder matches on this page; fallbacks must be used.
    let page = ScriptedPage::new(&[StrategyKind::Role, StrategyKind::Label]);
    let mut executor = Executor::new(page, config(), CancellationToken::new());

    let report = executor.run(&compiled);
    assert!(report.all_completed());

    let page = executor.into_driver();
    assert_eq!(
        page.log,
        vec![
            "open https://coffee.example.com/menu",
            "close",
            "fill iced latte via Label",
            "click via Role",
            "scroll",
            "click via Role",
            "click via Role",
        ]
    );
    assert_eq!(page.slept, Duration::from_millis(70));
}

#[test]
fn test_exhaustion_reports_position_and_spares_other_trajectories() {
    let mut trajectories = load_trajectories(Path::new("demos/order_latte.json")).unwrap();
    trajectories.push(trajectories[0].clone());
    let compiled = build(&trajectories);

    // Clicks resolve, but no input field can be found.
    let page = ScriptedPage::new(&[StrategyKind::ExactText]);
    let mut executor = Executor::new(page, config(), CancellationToken::new());
    let report = executor.run(&compiled);

    assert_eq!(report.trajectories.len(), 2);
    for t in &report.trajectories {
        match &t.outcome {
            TrajectoryOutcome::Aborted {
                executed,
                remaining,
                error,
            } => {
                assert_eq!(*executed, 2);
                assert_eq!(*remaining, 5);
                assert!(error.to_string().contains("subtask 1 / action 0"));
            }
            other => panic!("expected abort, got {other:?}"),
        }
    }
}

#[test]
fn test_pre_cancelled_run_executes_nothing() {
    let compiled = build(&load_trajectories(Path::new("demos/order_latte.json")).unwrap());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut executor = Executor::new(ScriptedPage::new(&[]), config(), cancel);
    let report = executor.run(&compiled);

    assert_eq!(
        report.trajectories[0].outcome,
        TrajectoryOutcome::Cancelled {
            executed: 0,
            remaining: 7
        }
    );
    assert!(executor.into_driver().log.is_empty());
}
