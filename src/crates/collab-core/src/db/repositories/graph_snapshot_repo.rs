//! Per-timeline derived-row repository
//!
//! Kept in sync, inside the same transaction as the main snapshot write, for
//! every timeline touched by a committed batch.

use crate::db::models::GraphSnapshotRow;
use sqlx::{Sqlite, Transaction};

pub struct GraphSnapshotRepository;

impl GraphSnapshotRepository {
    pub async fn upsert(
        tx: &mut Transaction<'_, Sqlite>,
        row: &GraphSnapshotRow,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO graph_snapshot (id, project_id, layers, metadata, variables, name, \"order\", is_active, version, timestamp, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                layers = excluded.layers,
                metadata = excluded.metadata,
                variables = excluded.variables,
                name = excluded.name,
                \"order\" = excluded.\"order\",
                is_active = excluded.is_active,
                version = excluded.version,
                timestamp = excluded.timestamp,
                updated_at = excluded.updated_at",
        )
        .bind(&row.id)
        .bind(&row.project_id)
        .bind(&row.layers)
        .bind(&row.metadata)
        .bind(&row.variables)
        .bind(&row.name)
        .bind(row.order)
        .bind(row.is_active)
        .bind(row.version)
        .bind(row.timestamp)
        .bind(&row.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
