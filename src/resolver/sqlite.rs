use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::catalog::{Discount, Track};
use crate::resolver::{DiscountRow, ReferenceStore, TrackRow};

pub const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    id TEXT PRIMARY KEY,
    code TEXT,
    name TEXT,
    description TEXT,
    cap_percentage REAL,
    conditions TEXT,
    priority INTEGER,
    allows_full_scholarship INTEGER,
    allows_discount_combination INTEGER,
    automatic_approval_threshold REAL,
    excluded_discount_codes TEXT,
    required_discount_codes TEXT,
    minimum_base_value REAL,
    active INTEGER
);

CREATE TABLE IF NOT EXISTS discount_types (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    name TEXT,
    category TEXT,
    percentage REAL,
    max_percentage REAL,
    required_documents TEXT,
    requires_approval INTEGER,
    approval_level TEXT,
    active INTEGER
);
CREATE INDEX IF NOT EXISTS idx_discount_types_code ON discount_types(code);
"#;

const TRACK_COLUMNS: &str = "id, code, name, description, cap_percentage, conditions, priority, \
    allows_full_scholarship, allows_discount_combination, automatic_approval_threshold, \
    excluded_discount_codes, required_discount_codes, minimum_base_value, active";

const DISCOUNT_COLUMNS: &str = "id, code, name, category, percentage, max_percentage, \
    required_documents, requires_approval, approval_level, active";

/// Local catalog file. Each call opens its own connection on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteReferenceStore {
    path: PathBuf,
}

impl SqliteReferenceStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed creating catalog directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed opening catalog: {}", path.display()))?;
        conn.execute_batch(CATALOG_SCHEMA)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes tracks and discounts into the catalog, replacing rows with the same id.
    pub fn seed(&self, tracks: &[Track], discounts: &[Discount]) -> Result<usize> {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        for track in tracks {
            tx.execute(
                &format!("INSERT OR REPLACE INTO tracks({TRACK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
                params![
                    track.id,
                    track.code,
                    track.name,
                    track.description,
                    track.cap_percentage,
                    serde_json::to_string(&track.conditions)?,
                    track.priority,
                    track.config.allows_full_scholarship,
                    track.config.allows_discount_combination,
                    track.config.automatic_approval_threshold,
                    serde_json::to_string(&track.restrictions.excluded_discount_codes)?,
                    serde_json::to_string(&track.restrictions.required_discount_codes)?,
                    track.restrictions.minimum_base_value,
                    track.active,
                ],
            )?;
        }
        for discount in discounts {
            tx.execute(
                &format!("INSERT OR REPLACE INTO discount_types({DISCOUNT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    discount.id,
                    discount.code,
                    discount.name,
                    discount.category,
                    discount.base_percentage,
                    discount.max_percentage,
                    serde_json::to_string(&discount.required_documents)?,
                    discount.requires_approval,
                    discount.approval_level.as_slug(),
                    discount.active,
                ],
            )?;
        }
        tx.commit()?;
        Ok(tracks.len() + discounts.len())
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)
                .with_context(|| format!("failed opening catalog: {}", path.display()))?;
            op(&conn)
        })
        .await
        .context("catalog query task aborted")?
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_track(&self, id: &str) -> Result<Option<TrackRow>> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?1"))?;
            let row = stmt.query_row(params![id], row_to_track).optional()?;
            Ok(row)
        })
        .await
    }

    async fn get_tracks(&self) -> Result<Vec<TrackRow>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY priority, id"
            ))?;
            let rows = stmt
                .query_map([], row_to_track)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_discount_types(&self) -> Result<Vec<DiscountRow>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DISCOUNT_COLUMNS} FROM discount_types ORDER BY id"
            ))?;
            let rows = stmt
                .query_map([], row_to_discount)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

fn row_to_track(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackRow> {
    Ok(TrackRow {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        cap_percentage: row.get(4)?,
        conditions: json_list(row.get(5)?),
        priority: row.get(6)?,
        allows_full_scholarship: row.get(7)?,
        allows_discount_combination: row.get(8)?,
        automatic_approval_threshold: row.get(9)?,
        excluded_discount_codes: json_list(row.get(10)?),
        required_discount_codes: json_list(row.get(11)?),
        minimum_base_value: row.get(12)?,
        active: row.get(13)?,
    })
}

fn row_to_discount(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiscountRow> {
    Ok(DiscountRow {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        percentage: row.get(4)?,
        effective_percentage: None,
        max_percentage: row.get(5)?,
        variable: None,
        required_documents: json_list(row.get(6)?),
        requires_approval: row.get(7)?,
        approval_level: row.get(8)?,
        active: row.get(9)?,
    })
}

fn json_list(raw: Option<String>) -> Option<Vec<String>> {
    raw.and_then(|text| serde_json::from_str(&text).ok())
}
