//! End-to-end `map` run: root profile → traversal → scoring → persistence.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use lineage_crawler::{CrawlContext, DiscoveredNode, PageSource, Traversal};
use lineage_evidence::score;
use lineage_shared::{
    CrawlConfig, DISCOVERED_VIA_CRAWLER, DescendantRecord, LineageError, LineageStatus, OwnerRef,
    Profile, Result, RunId, relationship_label,
};
use lineage_storage::DescendantStore;

/// Input for [`map_descendants`].
#[derive(Debug, Clone)]
pub struct MapRequest {
    /// Source-site identifier of the root ancestor (e.g. `Hopewell-183`).
    pub root_external_id: String,
    /// Name the owner is stored and queried under.
    pub owner_name: String,
    /// Free-form owner metadata recorded with the run.
    pub owner_metadata: serde_json::Value,
    pub crawl: CrawlConfig,
}

/// One persisted descendant, as reported back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub descendant_id: String,
    pub external_id: String,
    pub name: String,
    pub generation: u32,
    pub relationship_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_descendant_id: Option<String>,
    pub confidence_score: f64,
    pub status: LineageStatus,
    pub is_living: bool,
}

/// A profile whose fetch failed; its branch was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct FailedNode {
    pub external_id: String,
    pub error: String,
}

/// Result of a `map` run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub run_id: RunId,
    pub owner_name: String,
    pub total_descendants: usize,
    pub max_generation_reached: u32,
    pub duration_ms: u64,
    pub nodes: Vec<NodeSummary>,
    pub failure_count: usize,
    pub failures: Vec<FailedNode>,
    /// The node budget stopped the walk early.
    pub truncated: bool,
    /// The run was cancelled; `nodes` holds what was persisted before that.
    pub cancelled: bool,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called once the root profile is known.
    fn root_fetched(&self, root: &Profile);
    /// Called after each descendant is persisted.
    fn descendant_recorded(&self, node: &NodeSummary, total: usize);
    /// Called when the run completes (including cancelled runs).
    fn done(&self, summary: &CrawlSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn root_fetched(&self, _root: &Profile) {}
    fn descendant_recorded(&self, _node: &NodeSummary, _total: usize) {}
    fn done(&self, _summary: &CrawlSummary) {}
}

/// Map every descendant of a root profile into `store`.
///
/// 1. Validate the request (fatal before any fetch)
/// 2. Open a run record and fetch the root
/// 3. Walk the root's descendants breadth-first
/// 4. Score and persist each descendant as soon as it is found
///
/// Per-profile fetch failures are counted and skipped. A storage failure
/// aborts the run; records written before it stay in place. Cancelling
/// `cancel` stops the walk between fetches and returns a partial summary.
#[instrument(skip_all, fields(
    root = %request.root_external_id,
    owner = %request.owner_name,
    max_depth = request.crawl.max_depth
))]
pub async fn map_descendants<S, D>(
    request: &MapRequest,
    source: S,
    store: &D,
    progress: &dyn ProgressReporter,
    cancel: CancellationToken,
) -> Result<CrawlSummary>
where
    S: PageSource,
    D: DescendantStore,
{
    validate_request(request)?;

    let start = Instant::now();
    let run_id = RunId::new();
    let owner = OwnerRef {
        external_id: request.root_external_id.clone(),
        name: request.owner_name.clone(),
    };

    info!(%run_id, "starting descendant mapping run");
    store
        .begin_run(&run_id, &owner, &request.owner_metadata, request.crawl.max_depth)
        .await?;

    let mut ctx = CrawlContext::new(source, &request.crawl).with_cancellation(cancel);

    let root = match ctx.fetch_root(&request.root_external_id).await {
        Ok(root) => root,
        Err(e) => {
            warn!(%run_id, error = %e, "root profile unavailable, aborting run");
            close_failed_run(store, &run_id, &e).await;
            return Err(e);
        }
    };
    progress.root_fetched(&root);
    info!(
        root_name = %root.display_name,
        children = root.children.len(),
        "root profile fetched"
    );

    let mut traversal = Traversal::new(
        &mut ctx,
        &root.children,
        request.crawl.max_depth,
        request.crawl.max_nodes,
    );

    // external id -> persisted descendant id, for parent back-pointers
    let mut recorded: HashMap<String, String> = HashMap::new();
    let mut nodes: Vec<NodeSummary> = Vec::new();
    let mut cancelled = false;

    loop {
        let node = match traversal.next_node().await {
            Ok(Some(node)) => node,
            Ok(None) => break,
            Err(LineageError::Cancelled) => {
                info!(%run_id, persisted = nodes.len(), "run cancelled");
                cancelled = true;
                break;
            }
            Err(e) => {
                close_failed_run(store, &run_id, &e).await;
                return Err(e);
            }
        };

        let parent_descendant_id = match node.parent_external_id.as_deref() {
            None => None,
            Some(parent) => match recorded.get(parent) {
                Some(id) => Some(id.clone()),
                None => {
                    let e = LineageError::validation(format!(
                        "parent {parent} of {} was never recorded",
                        node.profile.external_id
                    ));
                    close_failed_run(store, &run_id, &e).await;
                    return Err(e);
                }
            },
        };

        let record = build_record(&run_id, &owner, &node, parent_descendant_id);
        let descendant_id = match store.record_descendant(&record).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    %run_id,
                    external_id = %record.source_external_id,
                    error = %e,
                    "failed to persist descendant, aborting run"
                );
                close_failed_run(store, &run_id, &e).await;
                return Err(e);
            }
        };

        debug!(
            external_id = %record.source_external_id,
            generation = record.generation,
            score = record.confidence_score,
            status = %record.status,
            "descendant persisted"
        );

        recorded.insert(record.source_external_id.clone(), descendant_id.clone());
        let summary = NodeSummary {
            descendant_id,
            external_id: record.source_external_id,
            name: record.descendant_name,
            generation: record.generation,
            relationship_path: record.relationship_path,
            parent_descendant_id: record.parent_descendant_id,
            confidence_score: record.confidence_score,
            status: record.status,
            is_living: record.is_living,
        };
        progress.descendant_recorded(&summary, nodes.len() + 1);
        nodes.push(summary);
    }

    let stats = traversal.into_stats();
    let summary = CrawlSummary {
        run_id,
        owner_name: request.owner_name.clone(),
        total_descendants: nodes.len(),
        max_generation_reached: nodes.iter().map(|n| n.generation).max().unwrap_or(0),
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        nodes,
        failure_count: stats.failures.len(),
        failures: stats
            .failures
            .into_iter()
            .map(|(external_id, error)| FailedNode { external_id, error })
            .collect(),
        truncated: stats.truncated,
        cancelled,
    };

    let run_stats = serde_json::json!({
        "total_descendants": summary.total_descendants,
        "max_generation_reached": summary.max_generation_reached,
        "failure_count": summary.failure_count,
        "skipped_visited": stats.skipped_visited,
        "network_fetches": ctx.fetcher().network_fetches(),
        "duration_ms": summary.duration_ms,
        "truncated": summary.truncated,
        "cancelled": summary.cancelled,
    });
    store.finish_run(&summary.run_id, &run_stats).await?;

    progress.done(&summary);
    info!(
        run_id = %summary.run_id,
        total_descendants = summary.total_descendants,
        max_generation = summary.max_generation_reached,
        failures = summary.failure_count,
        cancelled = summary.cancelled,
        elapsed_ms = summary.duration_ms,
        "descendant mapping complete"
    );

    Ok(summary)
}

/// Turn a discovered node into a scored record ready for persistence.
pub fn build_record(
    run_id: &RunId,
    owner: &OwnerRef,
    node: &DiscoveredNode,
    parent_descendant_id: Option<String>,
) -> DescendantRecord {
    let profile = &node.profile;
    let assessment = score(profile);

    DescendantRecord {
        id: Uuid::now_v7().to_string(),
        run_id: run_id.to_string(),
        owner_external_id: owner.external_id.clone(),
        owner_name: owner.name.clone(),
        descendant_name: profile.display_name.clone(),
        birth_year: profile.birth_year,
        death_year: profile.death_year,
        generation: node.generation,
        relationship_path: relationship_label(node.generation),
        parent_descendant_id,
        source_external_id: profile.external_id.clone(),
        confidence_score: assessment.score,
        confidence_factors: assessment.factors,
        status: assessment.status,
        is_living: profile.is_living(),
        living_probability: profile.living.probability,
        discovered_via: DISCOVERED_VIA_CRAWLER.to_string(),
        discovery_date: Utc::now(),
    }
}

fn validate_request(request: &MapRequest) -> Result<()> {
    request.crawl.validate()?;
    if request.root_external_id.trim().is_empty() {
        return Err(LineageError::config("root profile id must not be empty"));
    }
    if request.owner_name.trim().is_empty() {
        return Err(LineageError::config("owner name must not be empty"));
    }
    Ok(())
}

/// Best-effort close of a run that is about to fail.
async fn close_failed_run<D: DescendantStore>(store: &D, run_id: &RunId, error: &LineageError) {
    let stats = serde_json::json!({ "error": error.to_string() });
    if let Err(e) = store.finish_run(run_id, &stats).await {
        warn!(%run_id, error = %e, "could not record run failure");
    }
}
