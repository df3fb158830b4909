//! Persisted task rows and the dedup contract.

use tokio_postgres::Client;
use tokio_postgres::NoTls;

use super::types::NewTask;
use super::types::TaskKind;
use super::types::TaskMessage;
use crate::config::PostgresConfig;

/// Client-side access to the tasks table.
///
/// Row creation goes through here; the task processor operates on rows
/// through [`rows`] inside its own transaction.
pub struct TaskStore {
    client: Client,
}

impl TaskStore {
    pub async fn new(pgconf: &PostgresConfig) -> Self {
        let (client, connection) = tokio_postgres::connect(&pgconf.connection_uri, NoTls)
            .await
            .unwrap();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("connection error: {}", e);
            }
        });
        Self { client }
    }

    /// Transaction handle for the task processor, which spans
    /// lock -> handler -> mark processed over this store's connection.
    pub(crate) async fn transaction(
        &mut self,
    ) -> Result<tokio_postgres::Transaction<'_>, tokio_postgres::Error> {
        self.client.transaction().await
    }

    /// Persist one task and return its queue message.
    pub async fn create(&mut self, task: &NewTask) -> Result<TaskMessage, tokio_postgres::Error> {
        let pgtx = self.client.transaction().await?;
        let message = rows::insert(&pgtx, task).await?;
        pgtx.commit().await?;
        Ok(message)
    }

    /// Persist a batch of tasks in one transaction.
    ///
    /// Messages must only be published after this returns, so that no
    /// consumer sees a message whose row was rolled back.
    pub async fn create_batch(
        &mut self,
        tasks: &[NewTask],
    ) -> Result<Vec<TaskMessage>, tokio_postgres::Error> {
        let pgtx = self.client.transaction().await?;
        let mut messages = Vec::with_capacity(tasks.len());
        for task in tasks {
            messages.push(rows::insert(&pgtx, task).await?);
        }
        pgtx.commit().await?;
        Ok(messages)
    }

    /// Best-effort attempt count bump on the latest row, outside any
    /// processing transaction.
    pub async fn record_attempt(&self, kind: TaskKind, entity_id: i64) {
        let sql = "
            update subwatch.tasks
            set attempts = attempts + 1
            where row_id = (
                select max(row_id)
                from subwatch.tasks
                where kind = $1 and entity_id = $2
            );";
        if let Err(e) = self.client.execute(sql, &[&kind, &entity_id]).await {
            tracing::warn!("failed to record attempt for {kind:?} {entity_id}: {e}");
        }
    }

    /// Highest entity id ever tasked for `kind` - the sequential
    /// dispatch cursor.
    pub async fn find_last_entity_id(
        &self,
        kind: TaskKind,
    ) -> Result<Option<i64>, tokio_postgres::Error> {
        let qry = "select max(entity_id) from subwatch.tasks where kind = $1;";
        let row = self.client.query_one(qry, &[&kind]).await?;
        Ok(row.get(0))
    }
}

/// Row operations bound to a caller-owned transaction.
pub mod rows {
    use postgres_from_row::FromRow;
    use tokio_postgres::Transaction;
    use uuid::Uuid;

    use crate::tasks::types::NewTask;
    use crate::tasks::types::ProcessingTask;
    use crate::tasks::types::TaskKind;
    use crate::tasks::types::TaskMessage;

    /// Insert a task row with a freshly minted dedup token.
    pub async fn insert(
        pgtx: &Transaction<'_>,
        task: &NewTask,
    ) -> Result<TaskMessage, tokio_postgres::Error> {
        let token = Uuid::new_v4().to_string();
        let sql = "
            insert into subwatch.tasks (kind, entity_id, dedup_token, payload)
            values ($1, $2, $3, $4);";
        pgtx.execute(sql, &[&task.kind, &task.entity_id, &token, &task.payload])
            .await?;
        Ok(TaskMessage {
            kind: task.kind,
            entity_id: task.entity_id,
            dedup_token: token,
            payload: task.payload.clone(),
        })
    }

    /// Lock the authoritative (most recent) row for (kind, entity id).
    ///
    /// The row lock is held until the transaction ends. A second worker
    /// locking the same task blocks here until the first commits or
    /// rolls back - the pipeline's sole serialization point.
    pub async fn lock_latest(
        pgtx: &Transaction<'_>,
        kind: TaskKind,
        entity_id: i64,
    ) -> Result<Option<ProcessingTask>, tokio_postgres::Error> {
        let qry = "
            select row_id
                , kind
                , entity_id
                , status
                , dedup_token
                , payload
                , attempts
                , start_time
                , finish_time
            from subwatch.tasks
            where kind = $1 and entity_id = $2
            order by row_id desc
            limit 1
            for update;";
        Ok(pgtx
            .query_opt(qry, &[&kind, &entity_id])
            .await?
            .map(|row| ProcessingTask::from_row(&row)))
    }

    /// Terminal status transition, inside the caller's transaction.
    pub async fn mark_processed(
        pgtx: &Transaction<'_>,
        row_id: i64,
    ) -> Result<(), tokio_postgres::Error> {
        let sql = "
            update subwatch.tasks
            set status = 'processed'
                , finish_time = now()
            where row_id = $1;";
        let n_modified = pgtx.execute(sql, &[&row_id]).await?;
        assert_eq!(n_modified, 1);
        Ok(())
    }
}
