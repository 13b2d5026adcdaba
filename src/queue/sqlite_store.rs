//! SQLite implementation of TaskQueue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::store::{QueueError, QueuedTask, TaskId, TaskQueue};

/// SQLite-backed task queue.
pub struct SqliteQueue {
    pool: SqlitePool,
}

impl SqliteQueue {
    /// Create a new SqliteQueue.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run migrations to create the tasks table.
    pub async fn run_migrations(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS baton_tasks (
                id INTEGER PRIMARY KEY,
                worker TEXT NOT NULL,
                params TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                error_message TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                started_at TEXT,
                completed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_baton_tasks_status
            ON baton_tasks(status, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl TaskQueue for SqliteQueue {
    async fn enqueue(
        &self,
        worker: &str,
        params: serde_json::Value,
    ) -> Result<TaskId, QueueError> {
        let params_str = serde_json::to_string(&params)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO baton_tasks (worker, params)
            VALUES (?, ?)
            RETURNING id
            "#,
        )
        .bind(worker)
        .bind(params_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(TaskId(id))
    }

    async fn claim(&self, limit: usize) -> Result<Vec<QueuedTask>, QueueError> {
        // SQLite doesn't support UPDATE ... LIMIT with RETURNING directly,
        // so we do it in two steps within a transaction
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM baton_tasks
            WHERE status = 'pending'
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        if ids.is_empty() {
            tx.commit()
                .await
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            return Ok(vec![]);
        }

        let placeholders: Vec<String> = ids.iter().map(|_| "?".to_string()).collect();
        let in_clause = placeholders.join(",");

        let update_query = format!(
            "UPDATE baton_tasks SET status = 'running', started_at = datetime('now') WHERE id IN ({})",
            in_clause
        );
        let mut update = sqlx::query(&update_query);
        for id in &ids {
            update = update.bind(id);
        }
        update
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        let select_query = format!(
            "SELECT id, worker, params, created_at FROM baton_tasks WHERE id IN ({}) ORDER BY id",
            in_clause
        );
        let mut select = sqlx::query_as::<_, (i64, String, String, String)>(&select_query);
        for id in &ids {
            select = select.bind(id);
        }
        let rows = select
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|(id, worker, params, created_at)| {
                let params: serde_json::Value = serde_json::from_str(&params)
                    .map_err(|e| QueueError::Serialization(e.to_string()))?;
                let created =
                    DateTime::parse_from_rfc3339(&format!("{}Z", created_at.replace(' ', "T")))
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now());
                Ok(QueuedTask {
                    id: TaskId(id),
                    worker,
                    params,
                    created_at: created,
                })
            })
            .collect()
    }

    async fn recover_orphans(&self) -> Result<usize, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE baton_tasks
            SET status = 'pending', started_at = NULL
            WHERE status = 'running'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }

    async fn complete(&self, id: TaskId) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE baton_tasks
            SET status = 'completed', completed_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn fail(&self, id: TaskId, error: &str) -> Result<(), QueueError> {
        let truncated_error = if error.len() > 2000 {
            &error[..2000]
        } else {
            error
        };

        sqlx::query(
            r#"
            UPDATE baton_tasks
            SET status = 'failed', completed_at = datetime('now'), error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(truncated_error)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(())
    }
}
