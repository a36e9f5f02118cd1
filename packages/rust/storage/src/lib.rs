//! libSQL storage layer for descendant records.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding crawl
//! runs and the append-only descendant records they produce. Records are
//! inserted once and never updated; lineage queries walk the
//! `parent_descendant_id` chain with a recursive CTE.

mod migrations;

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use tracing::debug;

use lineage_shared::{
    ConfidenceFactors, DescendantRecord, LineageError, LineageStatus, OwnerRef, Result, RunId,
};

/// Upper bound on parent hops when reconstructing a lineage.
const MAX_LINEAGE_HOPS: i64 = 256;

const SELECT_DESCENDANT: &str = "SELECT id, run_id, owner_external_id, owner_name, descendant_name,
        birth_year, death_year, generation, relationship_path, parent_descendant_id,
        source_external_id, confidence_score, confidence_factors, status, is_living,
        living_probability, discovered_via, discovery_date
     FROM descendants";

// ---------------------------------------------------------------------------
// DescendantStore
// ---------------------------------------------------------------------------

/// Point-insert sink for a descendant-mapping run.
///
/// [`Storage`] is the production implementation; the orchestrator only needs
/// these three operations.
pub trait DescendantStore {
    /// Record the start of a run.
    fn begin_run(
        &self,
        run_id: &RunId,
        owner: &OwnerRef,
        owner_metadata: &serde_json::Value,
        max_depth: u32,
    ) -> impl Future<Output = Result<()>>;

    /// Persist one descendant record and return its identifier.
    fn record_descendant(&self, record: &DescendantRecord) -> impl Future<Output = Result<String>>;

    /// Mark a run finished with its summary statistics.
    fn finish_run(
        &self,
        run_id: &RunId,
        stats: &serde_json::Value,
    ) -> impl Future<Output = Result<()>>;
}

// ---------------------------------------------------------------------------
// Query result types
// ---------------------------------------------------------------------------

/// A crawl run row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlRun {
    pub id: String,
    pub owner_external_id: String,
    pub owner_name: String,
    pub owner_metadata: serde_json::Value,
    pub max_depth: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: Option<serde_json::Value>,
}

/// Record counts per lineage status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub suspected: u64,
    pub probable: u64,
    pub confirmed_lineage: u64,
}

/// Aggregates over every record stored for one owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineageStats {
    pub total_descendants: u64,
    /// Deepest generation recorded; 0 when there are no records.
    pub generations_reached: u32,
    /// Mean confidence score; 0.0 when there are no records.
    pub avg_confidence: f64,
    pub counts_by_tier: TierCounts,
    pub living_count: u64,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LineageError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for queries only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LineageError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LineageError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LineageError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Insert a new crawl run record.
    pub async fn insert_run(
        &self,
        run_id: &RunId,
        owner: &OwnerRef,
        owner_metadata: &serde_json::Value,
        max_depth: u32,
    ) -> Result<()> {
        self.check_writable()?;
        let metadata = serde_json::to_string(owner_metadata)
            .map_err(|e| LineageError::Storage(format!("owner metadata: {e}")))?;
        self.conn
            .execute(
                "INSERT INTO crawl_runs (id, owner_external_id, owner_name, owner_metadata, max_depth, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id.to_string(),
                    owner.external_id.as_str(),
                    owner.name.as_str(),
                    metadata,
                    i64::from(max_depth),
                    timestamp(Utc::now()),
                ],
            )
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Stamp a run as finished with its summary statistics.
    pub async fn finish_run(&self, run_id: &RunId, stats: &serde_json::Value) -> Result<()> {
        self.check_writable()?;
        let stats_json = serde_json::to_string(stats)
            .map_err(|e| LineageError::Storage(format!("run stats: {e}")))?;
        let updated = self
            .conn
            .execute(
                "UPDATE crawl_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![timestamp(Utc::now()), stats_json, run_id.to_string()],
            )
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        if updated == 0 {
            return Err(LineageError::Storage(format!("unknown crawl run: {run_id}")));
        }
        Ok(())
    }

    /// Get a run by ID.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<CrawlRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner_external_id, owner_name, owner_metadata, max_depth,
                        started_at, finished_at, stats_json
                 FROM crawl_runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LineageError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Descendant operations
    // -----------------------------------------------------------------------

    /// Insert a descendant record and return its ID.
    ///
    /// Rejects records that would break the parent chain: generation 1 must
    /// have no parent, deeper generations must point at a record of the same
    /// run exactly one generation up.
    pub async fn record_descendant(&self, record: &DescendantRecord) -> Result<String> {
        self.check_writable()?;
        self.validate_record(record).await?;

        let factors = serde_json::to_string(&record.confidence_factors)
            .map_err(|e| LineageError::Storage(format!("confidence factors: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO descendants (
                    id, run_id, owner_external_id, owner_name, descendant_name,
                    birth_year, death_year, generation, relationship_path, parent_descendant_id,
                    source_external_id, confidence_score, confidence_factors, status, is_living,
                    living_probability, discovered_via, discovery_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    record.id.as_str(),
                    record.run_id.as_str(),
                    record.owner_external_id.as_str(),
                    record.owner_name.as_str(),
                    record.descendant_name.as_str(),
                    record.birth_year.map(i64::from),
                    record.death_year.map(i64::from),
                    i64::from(record.generation),
                    record.relationship_path.as_str(),
                    record.parent_descendant_id.as_deref(),
                    record.source_external_id.as_str(),
                    record.confidence_score,
                    factors,
                    record.status.as_str(),
                    i64::from(record.is_living),
                    record.living_probability,
                    record.discovered_via.as_str(),
                    timestamp(record.discovery_date),
                ],
            )
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        debug!(
            id = %record.id,
            source = %record.source_external_id,
            generation = record.generation,
            "descendant recorded"
        );
        Ok(record.id.clone())
    }

    async fn validate_record(&self, record: &DescendantRecord) -> Result<()> {
        if !(0.0..=1.0).contains(&record.confidence_score) {
            return Err(LineageError::validation(format!(
                "confidence score {} outside [0, 1]",
                record.confidence_score
            )));
        }

        match (record.generation, record.parent_descendant_id.as_deref()) {
            (0, _) => Err(LineageError::validation("generation must be at least 1")),
            (1, None) => Ok(()),
            (1, Some(_)) => Err(LineageError::validation(
                "generation 1 records cannot have a parent",
            )),
            (generation, None) => Err(LineageError::validation(format!(
                "generation {generation} record is missing its parent"
            ))),
            (generation, Some(parent_id)) => {
                let parent = self.get_descendant(parent_id).await?.ok_or_else(|| {
                    LineageError::validation(format!("parent record {parent_id} not found"))
                })?;
                if parent.generation + 1 != generation {
                    return Err(LineageError::validation(format!(
                        "parent {parent_id} is generation {}, expected {}",
                        parent.generation,
                        generation - 1
                    )));
                }
                if parent.run_id != record.run_id {
                    return Err(LineageError::validation(format!(
                        "parent {parent_id} belongs to another run"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Get a descendant record by ID.
    pub async fn get_descendant(&self, id: &str) -> Result<Option<DescendantRecord>> {
        let mut rows = self
            .conn
            .query(&format!("{SELECT_DESCENDANT} WHERE id = ?1"), params![id])
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LineageError::Storage(e.to_string())),
        }
    }

    /// List every record stored for an owner, oldest run first, shallowest
    /// generation first within a run.
    pub async fn list_descendants(&self, owner_name: &str) -> Result<Vec<DescendantRecord>> {
        let rows = self
            .conn
            .query(
                &format!("{SELECT_DESCENDANT} WHERE owner_name = ?1 ORDER BY run_id, generation, id"),
                params![owner_name],
            )
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        collect_records(rows).await
    }

    /// Reconstruct the chain from an owner down to a named descendant.
    ///
    /// Matches `name_fragment` as a case-insensitive substring of the
    /// descendant name; when several records match, the most recently
    /// discovered one wins. Returns the chain of records from generation 1
    /// down to the match, or an empty list when nothing matches.
    pub async fn reconstruct_lineage(
        &self,
        owner_name: &str,
        name_fragment: &str,
    ) -> Result<Vec<DescendantRecord>> {
        let fragment = name_fragment.trim();
        if fragment.is_empty() {
            return Err(LineageError::validation("name fragment must not be empty"));
        }

        let mut rows = self
            .conn
            .query(
                r"SELECT id FROM descendants
                  WHERE owner_name = ?1
                    AND lower(descendant_name) LIKE '%' || lower(?2) || '%' ESCAPE '\'
                  ORDER BY discovery_date DESC, generation DESC, id DESC
                  LIMIT 1",
                params![owner_name, escape_like(fragment)],
            )
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        let matched: String = match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| LineageError::Storage(e.to_string()))?,
            Ok(None) => return Ok(Vec::new()),
            Err(e) => return Err(LineageError::Storage(e.to_string())),
        };

        let rows = self
            .conn
            .query(
                &format!(
                    "WITH RECURSIVE chain(id, parent_id, hops) AS (
                        SELECT id, parent_descendant_id, 0 FROM descendants WHERE id = ?1
                        UNION ALL
                        SELECT d.id, d.parent_descendant_id, c.hops + 1
                        FROM descendants d JOIN chain c ON d.id = c.parent_id
                        WHERE c.hops < ?2
                     )
                     {SELECT_DESCENDANT} WHERE id IN (SELECT id FROM chain)
                     ORDER BY generation ASC"
                ),
                params![matched.as_str(), MAX_LINEAGE_HOPS],
            )
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        let chain = collect_records(rows).await?;
        debug!(owner_name, matched = %matched, length = chain.len(), "lineage reconstructed");
        Ok(chain)
    }

    /// Aggregate statistics over all records for an owner.
    pub async fn stats(&self, owner_name: &str) -> Result<LineageStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*),
                        MAX(generation),
                        AVG(confidence_score),
                        SUM(CASE WHEN status = 'suspected' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN status = 'probable' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN status = 'confirmed_lineage' THEN 1 ELSE 0 END),
                        SUM(is_living)
                 FROM descendants WHERE owner_name = ?1",
                params![owner_name],
            )
            .await
            .map_err(|e| LineageError::Storage(e.to_string()))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(LineageStats::default()),
            Err(e) => return Err(LineageError::Storage(e.to_string())),
        };

        // Aggregates other than COUNT are NULL over an empty set.
        let count = |idx: i32| row.get::<i64>(idx).ok().map_or(0, |v| v.max(0) as u64);
        Ok(LineageStats {
            total_descendants: count(0),
            generations_reached: row.get::<u32>(1).unwrap_or(0),
            avg_confidence: row.get::<f64>(2).unwrap_or(0.0),
            counts_by_tier: TierCounts {
                suspected: count(3),
                probable: count(4),
                confirmed_lineage: count(5),
            },
            living_count: count(6),
        })
    }
}

impl DescendantStore for Storage {
    async fn begin_run(
        &self,
        run_id: &RunId,
        owner: &OwnerRef,
        owner_metadata: &serde_json::Value,
        max_depth: u32,
    ) -> Result<()> {
        self.insert_run(run_id, owner, owner_metadata, max_depth).await
    }

    async fn record_descendant(&self, record: &DescendantRecord) -> Result<String> {
        Storage::record_descendant(self, record).await
    }

    async fn finish_run(&self, run_id: &RunId, stats: &serde_json::Value) -> Result<()> {
        Storage::finish_run(self, run_id, stats).await
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LineageError::Storage(format!("invalid date: {e}")))
}

/// Escape `LIKE` wildcards so the fragment matches literally.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn collect_records(mut rows: libsql::Rows) -> Result<Vec<DescendantRecord>> {
    let mut results = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| LineageError::Storage(e.to_string()))?
    {
        results.push(row_to_record(&row)?);
    }
    Ok(results)
}

/// Convert a database row to a [`CrawlRun`].
fn row_to_run(row: &libsql::Row) -> Result<CrawlRun> {
    let metadata: String = row
        .get(3)
        .map_err(|e| LineageError::Storage(e.to_string()))?;
    let started_at: String = row
        .get(5)
        .map_err(|e| LineageError::Storage(e.to_string()))?;

    Ok(CrawlRun {
        id: row
            .get::<String>(0)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        owner_external_id: row
            .get::<String>(1)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        owner_name: row
            .get::<String>(2)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        owner_metadata: serde_json::from_str(&metadata)
            .map_err(|e| LineageError::Storage(format!("owner metadata: {e}")))?,
        max_depth: row
            .get::<u32>(4)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        started_at: parse_timestamp(&started_at)?,
        finished_at: row
            .get::<String>(6)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        stats: row
            .get::<String>(7)
            .ok()
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| LineageError::Storage(format!("run stats: {e}")))?,
    })
}

/// Convert a database row to a [`DescendantRecord`].
fn row_to_record(row: &libsql::Row) -> Result<DescendantRecord> {
    let factors: String = row
        .get(12)
        .map_err(|e| LineageError::Storage(e.to_string()))?;
    let status: String = row
        .get(13)
        .map_err(|e| LineageError::Storage(e.to_string()))?;
    let discovery_date: String = row
        .get(17)
        .map_err(|e| LineageError::Storage(e.to_string()))?;

    Ok(DescendantRecord {
        id: row
            .get::<String>(0)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        run_id: row
            .get::<String>(1)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        owner_external_id: row
            .get::<String>(2)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        owner_name: row
            .get::<String>(3)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        descendant_name: row
            .get::<String>(4)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        birth_year: row.get::<i64>(5).ok().map(|v| v as i32),
        death_year: row.get::<i64>(6).ok().map(|v| v as i32),
        generation: row
            .get::<u32>(7)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        relationship_path: row
            .get::<String>(8)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        parent_descendant_id: row.get::<String>(9).ok(),
        source_external_id: row
            .get::<String>(10)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        confidence_score: row
            .get::<f64>(11)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        confidence_factors: serde_json::from_str::<ConfidenceFactors>(&factors)
            .map_err(|e| LineageError::Storage(format!("confidence factors: {e}")))?,
        status: status
            .parse::<LineageStatus>()
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        is_living: row.get::<i64>(14).unwrap_or(0) != 0,
        living_probability: row.get::<f64>(15).ok(),
        discovered_via: row
            .get::<String>(16)
            .map_err(|e| LineageError::Storage(e.to_string()))?,
        discovery_date: parse_timestamp(&discovery_date)?,
    })
}
