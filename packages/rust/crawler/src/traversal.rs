//! Depth- and size-bounded descendant traversal.
//!
//! The traversal walks the profile graph breadth-first from the root's
//! children, using an explicit frontier queue. All mutable per-run state
//! (visited set, profile cache, rate limiter, cancellation token) lives in a
//! [`CrawlContext`] that is created per run and never shared.

use std::collections::{HashSet, VecDeque};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use lineage_shared::{ChildRef, CrawlConfig, LineageError, Profile, Result};

use crate::fetcher::ProfileFetcher;
use crate::source::PageSource;

// ---------------------------------------------------------------------------
// CrawlContext
// ---------------------------------------------------------------------------

/// Run-scoped crawl state.
pub struct CrawlContext<S> {
    fetcher: ProfileFetcher<S>,
    visited: HashSet<String>,
    cancel: CancellationToken,
}

impl<S: PageSource> CrawlContext<S> {
    /// Fresh context with an empty cache and visited set.
    pub fn new(source: S, config: &CrawlConfig) -> Self {
        Self {
            fetcher: ProfileFetcher::new(source, config),
            visited: HashSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally controlled cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch the root profile and mark it visited so it is never emitted.
    pub async fn fetch_root(&mut self, external_id: &str) -> Result<Profile> {
        self.check_cancelled()?;
        self.visited.insert(external_id.to_string());
        self.fetcher.fetch_profile(external_id).await
    }

    /// Whether a profile has already been claimed in this run.
    pub fn is_visited(&self, external_id: &str) -> bool {
        self.visited.contains(external_id)
    }

    pub fn fetcher(&self) -> &ProfileFetcher<S> {
        &self.fetcher
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LineageError::Cancelled);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// A descendant found by the traversal.
#[derive(Debug, Clone)]
pub struct DiscoveredNode {
    pub profile: Profile,
    /// 1 for the root's children.
    pub generation: u32,
    /// External id of the profile this node was reached from; `None` at generation 1.
    pub parent_external_id: Option<String>,
}

/// Counters for a traversal.
#[derive(Debug, Clone, Default)]
pub struct TraversalStats {
    /// Nodes emitted.
    pub discovered: usize,
    /// Deepest generation emitted.
    pub max_generation: u32,
    /// Failed fetches (external id, error message); each pruned a branch.
    pub failures: Vec<(String, String)>,
    /// Frontier entries dropped because the profile was already visited.
    pub skipped_visited: usize,
    /// The node budget stopped the walk with work still queued.
    pub truncated: bool,
}

struct PendingNode {
    child: ChildRef,
    generation: u32,
    parent_external_id: Option<String>,
}

/// Breadth-first walk over a root's descendants.
///
/// Drive it with [`next_node`](Self::next_node) to handle nodes as they are
/// found, or [`collect`](Self::collect) to gather them all.
pub struct Traversal<'a, S> {
    ctx: &'a mut CrawlContext<S>,
    frontier: VecDeque<PendingNode>,
    max_depth: u32,
    max_nodes: Option<usize>,
    stats: TraversalStats,
}

impl<'a, S: PageSource> Traversal<'a, S> {
    /// Seed the frontier with the root's children at generation 1.
    pub fn new(
        ctx: &'a mut CrawlContext<S>,
        root_children: &[ChildRef],
        max_depth: u32,
        max_nodes: Option<usize>,
    ) -> Self {
        let frontier = if max_depth >= 1 {
            root_children
                .iter()
                .map(|child| PendingNode {
                    child: child.clone(),
                    generation: 1,
                    parent_external_id: None,
                })
                .collect()
        } else {
            VecDeque::new()
        };

        Self {
            ctx,
            frontier,
            max_depth,
            max_nodes,
            stats: TraversalStats::default(),
        }
    }

    /// Fetch and return the next descendant, or `None` when the walk is done.
    ///
    /// Per-node fetch failures are recorded in [`stats`](Self::stats) and
    /// skipped. Cancellation is checked before every fetch.
    pub async fn next_node(&mut self) -> Result<Option<DiscoveredNode>> {
        loop {
            if self.budget_exhausted() {
                if !self.frontier.is_empty() {
                    info!(
                        max_nodes = ?self.max_nodes,
                        queued = self.frontier.len(),
                        "node budget reached, stopping traversal"
                    );
                    self.stats.truncated = true;
                    self.frontier.clear();
                }
                return Ok(None);
            }

            let Some(pending) = self.frontier.pop_front() else {
                return Ok(None);
            };
            let external_id = pending.child.external_id;

            if !self.ctx.visited.insert(external_id.clone()) {
                debug!(%external_id, "already visited, skipping");
                self.stats.skipped_visited += 1;
                continue;
            }

            self.ctx.check_cancelled()?;

            let profile = match self.ctx.fetcher.fetch_profile(&external_id).await {
                Ok(profile) => profile,
                Err(e) if e.is_node_failure() => {
                    warn!(
                        %external_id,
                        generation = pending.generation,
                        error = %e,
                        "profile fetch failed, pruning branch"
                    );
                    self.stats.failures.push((external_id, e.to_string()));
                    continue;
                }
                Err(e) => return Err(e),
            };

            if pending.generation < self.max_depth {
                for child in &profile.children {
                    if self.ctx.is_visited(&child.external_id) {
                        continue;
                    }
                    self.frontier.push_back(PendingNode {
                        child: child.clone(),
                        generation: pending.generation + 1,
                        parent_external_id: Some(external_id.clone()),
                    });
                }
            }

            self.stats.discovered += 1;
            self.stats.max_generation = self.stats.max_generation.max(pending.generation);

            return Ok(Some(DiscoveredNode {
                profile,
                generation: pending.generation,
                parent_external_id: pending.parent_external_id,
            }));
        }
    }

    /// Run the walk to completion.
    pub async fn collect(mut self) -> Result<(Vec<DiscoveredNode>, TraversalStats)> {
        let mut nodes = Vec::new();
        while let Some(node) = self.next_node().await? {
            nodes.push(node);
        }
        Ok((nodes, self.stats))
    }

    pub fn stats(&self) -> &TraversalStats {
        &self.stats
    }

    /// Consume the traversal, keeping only its counters.
    pub fn into_stats(self) -> TraversalStats {
        self.stats
    }

    fn budget_exhausted(&self) -> bool {
        self.max_nodes
            .is_some_and(|max| self.stats.discovered >= max)
    }
}

/// Walk all descendants reachable from `root_children`.
#[instrument(skip_all, fields(roots = root_children.len(), max_depth, max_nodes = ?max_nodes))]
pub async fn traverse<S: PageSource>(
    ctx: &mut CrawlContext<S>,
    root_children: &[ChildRef],
    max_depth: u32,
    max_nodes: Option<usize>,
) -> Result<Vec<DiscoveredNode>> {
    let (nodes, stats) = Traversal::new(ctx, root_children, max_depth, max_nodes)
        .collect()
        .await?;
    info!(
        discovered = stats.discovered,
        failures = stats.failures.len(),
        max_generation = stats.max_generation,
        "traversal complete"
    );
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryPageSource;

    /// Minimal microdata page with the given children.
    fn person(name: &str, children: &[&str]) -> String {
        let kids: String = children
            .iter()
            .map(|id| {
                format!(
                    r#"<li itemprop="children"><a href="/wiki/{id}"><span itemprop="name">{id}</span></a></li>"#
                )
            })
            .collect();
        format!(
            r#"<html><body><h1><span itemprop="name">{name}</span></h1><ul>{kids}</ul></body></html>"#
        )
    }

    fn config() -> CrawlConfig {
        CrawlConfig {
            rate_limit_ms: 0,
            ..CrawlConfig::default()
        }
    }

    fn child(id: &str) -> ChildRef {
        ChildRef {
            external_id: id.into(),
            display_name: id.into(),
        }
    }

    /// Root -> A, B; A -> A1; A1 -> A2; A2 -> A3.
    fn deep_tree() -> MemoryPageSource {
        MemoryPageSource::new()
            .with_page("Root-1", person("Root", &["A-1", "B-1"]))
            .with_page("A-1", person("A", &["A-2"]))
            .with_page("B-1", person("B", &[]))
            .with_page("A-2", person("A2", &["A-3"]))
            .with_page("A-3", person("A3", &["A-4"]))
            .with_page("A-4", person("A4", &[]))
    }

    #[tokio::test]
    async fn four_childless_children_yield_four_first_generation_nodes() {
        let source = MemoryPageSource::new()
            .with_page("Hopewell-183", person("Root", &["C-1", "C-2", "C-3", "C-4"]))
            .with_page("C-1", person("C1", &[]))
            .with_page("C-2", person("C2", &[]))
            .with_page("C-3", person("C3", &[]))
            .with_page("C-4", person("C4", &[]));
        let mut ctx = CrawlContext::new(&source, &config());

        let root = ctx.fetch_root("Hopewell-183").await.unwrap();
        let nodes = traverse(&mut ctx, &root.children, 3, None).await.unwrap();

        assert_eq!(nodes.len(), 4);
        assert!(nodes.iter().all(|n| n.generation == 1));
        assert!(nodes.iter().all(|n| n.parent_external_id.is_none()));
    }

    #[tokio::test]
    async fn max_depth_bounds_generations() {
        let source = deep_tree();
        let mut ctx = CrawlContext::new(&source, &config());
        let root = ctx.fetch_root("Root-1").await.unwrap();

        let nodes = traverse(&mut ctx, &root.children, 2, None).await.unwrap();

        assert!(nodes.iter().all(|n| n.generation <= 2));
        let ids: Vec<&str> = nodes.iter().map(|n| n.profile.external_id.as_str()).collect();
        assert_eq!(ids, vec!["A-1", "B-1", "A-2"]);
        // A-3 is never even requested.
        assert!(!source.requests().contains(&"A-3".to_string()));
    }

    #[tokio::test]
    async fn breadth_first_order_and_parent_refs() {
        let source = deep_tree();
        let mut ctx = CrawlContext::new(&source, &config());
        let root = ctx.fetch_root("Root-1").await.unwrap();

        let nodes = traverse(&mut ctx, &root.children, 10, None).await.unwrap();
        let summary: Vec<(&str, u32, Option<&str>)> = nodes
            .iter()
            .map(|n| {
                (
                    n.profile.external_id.as_str(),
                    n.generation,
                    n.parent_external_id.as_deref(),
                )
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                ("A-1", 1, None),
                ("B-1", 1, None),
                ("A-2", 2, Some("A-1")),
                ("A-3", 3, Some("A-2")),
                ("A-4", 4, Some("A-3")),
            ]
        );
    }

    #[tokio::test]
    async fn node_reachable_by_two_paths_is_expanded_once() {
        // Both parents list the same child (e.g. father's and mother's
        // lines joined by a cousin marriage).
        let source = MemoryPageSource::new()
            .with_page("Root-1", person("Root", &["P-1", "P-2"]))
            .with_page("P-1", person("P1", &["Shared-1"]))
            .with_page("P-2", person("P2", &["Shared-1"]))
            .with_page("Shared-1", person("Shared", &["Leaf-1"]))
            .with_page("Leaf-1", person("Leaf", &[]));
        let mut ctx = CrawlContext::new(&source, &config());
        let root = ctx.fetch_root("Root-1").await.unwrap();

        let (nodes, stats) = Traversal::new(&mut ctx, &root.children, 5, None)
            .collect()
            .await
            .unwrap();

        let shared: Vec<_> = nodes
            .iter()
            .filter(|n| n.profile.external_id == "Shared-1")
            .collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].parent_external_id.as_deref(), Some("P-1"));
        assert_eq!(nodes.len(), 4);
        assert_eq!(stats.skipped_visited, 1);

        let requests = source.requests();
        assert_eq!(requests.iter().filter(|r| *r == "Shared-1").count(), 1);
    }

    #[tokio::test]
    async fn cycle_back_to_root_is_not_emitted() {
        let source = MemoryPageSource::new()
            .with_page("Root-1", person("Root", &["A-1"]))
            .with_page("A-1", person("A", &["Root-1"]));
        let mut ctx = CrawlContext::new(&source, &config());
        let root = ctx.fetch_root("Root-1").await.unwrap();

        let nodes = traverse(&mut ctx, &root.children, 5, None).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].profile.external_id, "A-1");
    }

    #[tokio::test]
    async fn failed_fetch_prunes_only_its_branch() {
        let source = MemoryPageSource::new()
            .with_page("Root-1", person("Root", &["Gone-1", "B-1"]))
            .with_page("B-1", person("B", &["B-2"]))
            .with_page("B-2", person("B2", &[]))
            .with_page("Broken-1", "<html><body><p>maintenance</p></body></html>");
        let mut ctx = CrawlContext::new(&source, &config());
        let root = ctx.fetch_root("Root-1").await.unwrap();

        let mut children = root.children.clone();
        children.push(child("Broken-1"));

        let (nodes, stats) = Traversal::new(&mut ctx, &children, 5, None)
            .collect()
            .await
            .unwrap();

        let ids: Vec<&str> = nodes.iter().map(|n| n.profile.external_id.as_str()).collect();
        assert_eq!(ids, vec!["B-1", "B-2"]);
        assert_eq!(stats.failures.len(), 2);
        assert!(stats.failures.iter().any(|(id, _)| id == "Gone-1"));
        assert!(stats.failures.iter().any(|(id, _)| id == "Broken-1"));
    }

    #[tokio::test]
    async fn node_budget_truncates() {
        let source = deep_tree();
        let mut ctx = CrawlContext::new(&source, &config());
        let root = ctx.fetch_root("Root-1").await.unwrap();

        let (nodes, stats) = Traversal::new(&mut ctx, &root.children, 10, Some(2))
            .collect()
            .await
            .unwrap();

        assert_eq!(nodes.len(), 2);
        assert!(stats.truncated);
    }

    #[tokio::test]
    async fn zero_depth_emits_nothing() {
        let source = deep_tree();
        let mut ctx = CrawlContext::new(&source, &config());
        let nodes = traverse(&mut ctx, &[child("A-1")], 0, None).await.unwrap();
        assert!(nodes.is_empty());
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_between_fetches() {
        let source = deep_tree();
        let token = CancellationToken::new();
        let mut ctx = CrawlContext::new(&source, &config()).with_cancellation(token.clone());
        let root = ctx.fetch_root("Root-1").await.unwrap();

        let mut traversal = Traversal::new(&mut ctx, &root.children, 10, None);
        let first = traversal.next_node().await.unwrap();
        assert!(first.is_some());

        token.cancel();
        let err = traversal.next_node().await.unwrap_err();
        assert!(matches!(err, LineageError::Cancelled));
        assert_eq!(source.requests(), vec!["Root-1", "A-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_applies_between_dependent_profiles() {
        let source = MemoryPageSource::new()
            .with_page("Root-1", person("Root", &["A-1"]))
            .with_page("A-1", person("A", &["A-2"]))
            .with_page("A-2", person("A2", &[]));
        let config = CrawlConfig {
            rate_limit_ms: 2000,
            ..CrawlConfig::default()
        };
        let mut ctx = CrawlContext::new(&source, &config);

        let start = tokio::time::Instant::now();
        let root = ctx.fetch_root("Root-1").await.unwrap();
        let nodes = traverse(&mut ctx, &root.children, 5, None).await.unwrap();

        assert_eq!(nodes.len(), 2);
        assert!(start.elapsed() >= std::time::Duration::from_millis(4000));
    }
}
