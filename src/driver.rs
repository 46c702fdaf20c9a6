use anyhow::Result;
use std::time::Duration;

use crate::selector::SelectorCandidate;

/// The candidate that matched on the live page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Index into the candidate list that was resolved
    pub index: usize,
    pub candidate: SelectorCandidate,
}

/// What the executor needs from a browser automation backend.
///
/// Implementations are driven strictly one node at a time from a single thread.
pub trait AutomationDriver {
    fn open(&mut self, url: &str) -> Result<()>;

    fn wait_for_load(&mut self) -> Result<()>;

    /// Try candidates first to last; the first visible match wins.
    /// `Ok(None)` means every candidate was tried and none matched.
    fn resolve(&mut self, candidates: &[SelectorCandidate]) -> Result<Option<ResolvedTarget>>;

    fn click(&mut self, target: &ResolvedTarget) -> Result<()>;

    fn fill(&mut self, target: &ResolvedTarget, text: &str) -> Result<()>;

    fn scroll_to_bottom(&mut self) -> Result<()>;

    fn wait(&mut self, duration: Duration);

    fn close(&mut self) -> Result<()>;
}
