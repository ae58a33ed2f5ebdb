//! SQLite-backed status store.
//!
//! rusqlite is synchronous; every call runs on the blocking pool so a slow
//! disk never stalls the async workers.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, Transaction};
use tracing::info;

use fleetrun_core::{DoingAction, DoingMarker, HostStatus, TaskHost, TaskId};

use super::{
    duplicate, Guard, HostFilter, StatusStore, StoreError, StoreResult, UnitOfWork, UnitOutcome,
    WriteOp,
};
use crate::table::TableResolver;

const HOST_COLUMNS: &str = "seq, id, host, status, stdout, stderr";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(format!("sqlite: {err}"))
    }
}

/// Status store persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    doing_table: Arc<str>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure every table the
    /// resolver can return exists.
    pub fn open(path: impl AsRef<Path>, resolver: &dyn TableResolver) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened SQLite status store");
        Self::init(conn, resolver)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(resolver: &dyn TableResolver) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, resolver)
    }

    fn init(conn: Connection, resolver: &dyn TableResolver) -> StoreResult<Self> {
        let mut schema = String::new();
        for table in resolver.tables() {
            schema.push_str(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                   seq INTEGER PRIMARY KEY AUTOINCREMENT,
                   id INTEGER NOT NULL,
                   host TEXT NOT NULL,
                   status TEXT NOT NULL,
                   stdout TEXT NOT NULL DEFAULT '',
                   stderr TEXT NOT NULL DEFAULT '',
                   UNIQUE (id, host)
                 );"
            ));
        }

        let doing_table = resolver.doing_table();
        schema.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {doing_table} (
               id INTEGER NOT NULL,
               host TEXT NOT NULL,
               clock INTEGER NOT NULL,
               action TEXT NOT NULL,
               PRIMARY KEY (id, host)
             );"
        ));
        conn.execute_batch(&schema)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            doing_table: doing_table.into(),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection, &str) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let doing_table = self.doing_table.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn, &doing_table)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("sqlite task failed: {e}")))?
    }
}

fn guard_holds(tx: &Transaction<'_>, doing_table: &str, guard: &Guard) -> StoreResult<bool> {
    let count: i64 = match guard {
        Guard::DoingClock { id, host, clock } => tx.query_row(
            &format!("SELECT COUNT(*) FROM {doing_table} WHERE id = ?1 AND host = ?2 AND clock = ?3"),
            params![id.get(), host, clock],
            |row| row.get(0),
        )?,
        Guard::Status {
            table,
            id,
            host,
            status,
        } => tx.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1 AND host = ?2 AND status = ?3"),
            params![id.get(), host, status.as_str()],
            |row| row.get(0),
        )?,
    };
    Ok(count > 0)
}

fn write(tx: &Transaction<'_>, doing_table: &str, op: &WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::SetStatus {
            table,
            id,
            host,
            status,
        } => {
            tx.execute(
                &format!("UPDATE {table} SET status = ?3 WHERE id = ?1 AND host = ?2"),
                params![id.get(), host, status.as_str()],
            )?;
        }
        WriteOp::SetResult {
            table,
            id,
            host,
            status,
            stdout,
            stderr,
        } => {
            tx.execute(
                &format!(
                    "UPDATE {table} SET status = ?3, stdout = ?4, stderr = ?5
                     WHERE id = ?1 AND host = ?2"
                ),
                params![id.get(), host, status.as_str(), stdout, stderr],
            )?;
        }
        WriteOp::SetOutput {
            table,
            id,
            host,
            stdout,
            stderr,
        } => {
            tx.execute(
                &format!("UPDATE {table} SET stdout = ?3, stderr = ?4 WHERE id = ?1 AND host = ?2"),
                params![id.get(), host, stdout, stderr],
            )?;
        }
        WriteOp::PutDoing(marker) => {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO {doing_table} (id, host, clock, action)
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![marker.id.get(), marker.host, marker.clock, marker.action.as_str()],
            )?;
        }
        WriteOp::DeleteDoing { id, host } => {
            tx.execute(
                &format!("DELETE FROM {doing_table} WHERE id = ?1 AND host = ?2"),
                params![id.get(), host],
            )?;
        }
    }
    Ok(())
}

fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<HostStatus> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_task_host(row: &Row<'_>) -> rusqlite::Result<TaskHost> {
    Ok(TaskHost {
        sequence: row.get::<_, i64>(0)? as u64,
        id: TaskId::new(row.get(1)?),
        host: row.get(2)?,
        status: status_column(row, 3)?,
        stdout: row.get(4)?,
        stderr: row.get(5)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn status_values(id: TaskId, statuses: &[HostStatus]) -> (String, Vec<Value>) {
    let placeholders: Vec<String> = (0..statuses.len())
        .map(|i| format!("?{}", i + 2))
        .collect();
    let mut values = vec![Value::Integer(id.get())];
    values.extend(statuses.iter().map(|s| Value::Text(s.as_str().to_string())));
    (placeholders.join(", "), values)
}

#[async_trait]
impl StatusStore for SqliteStore {
    async fn insert(&self, table: &str, record: &TaskHost) -> StoreResult<()> {
        let table = table.to_string();
        let record = record.clone();
        self.with_conn(move |conn, _| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (id, host, status, stdout, stderr)
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    record.id.get(),
                    record.host,
                    record.status.as_str(),
                    record.stdout,
                    record.stderr
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    duplicate(&table, &record)
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn upsert(&self, table: &str, record: &TaskHost) -> StoreResult<()> {
        let table = table.to_string();
        let record = record.clone();
        self.with_conn(move |conn, _| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (id, host, status, stdout, stderr) VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (id, host) DO UPDATE SET
                       status = excluded.status,
                       stdout = excluded.stdout,
                       stderr = excluded.stderr"
                ),
                params![
                    record.id.get(),
                    record.host,
                    record.status.as_str(),
                    record.stdout,
                    record.stderr
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find(&self, table: &str, id: TaskId, host: &str) -> StoreResult<Option<TaskHost>> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM {table} WHERE id = ?1 AND host = ?2");
        let host = host.to_string();
        self.with_conn(move |conn, _| {
            let record = conn
                .query_row(&sql, params![id.get(), host], row_to_task_host)
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn list(
        &self,
        table: &str,
        id: TaskId,
        filter: &HostFilter,
    ) -> StoreResult<Vec<TaskHost>> {
        let mut sql = format!("SELECT {HOST_COLUMNS} FROM {table} WHERE id = ?1");
        let mut values = vec![Value::Integer(id.get())];

        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            let (placeholders, status_values) = status_values(id, statuses);
            sql.push_str(&format!(" AND status IN ({placeholders})"));
            values = status_values;
        }

        sql.push_str(" ORDER BY seq");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.with_conn(move |conn, _| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), row_to_task_host)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn count(&self, table: &str, id: TaskId, statuses: &[HostStatus]) -> StoreResult<u64> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let (placeholders, values) = status_values(id, statuses);
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ?1 AND status IN ({placeholders})");

        self.with_conn(move |conn, _| {
            let count: i64 =
                conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn find_doing(&self, id: TaskId, host: &str) -> StoreResult<Option<DoingMarker>> {
        let host = host.to_string();
        self.with_conn(move |conn, doing_table| {
            let marker = conn
                .query_row(
                    &format!("SELECT clock, action FROM {doing_table} WHERE id = ?1 AND host = ?2"),
                    params![id.get(), host],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            marker
                .map(|(clock, action)| match action.as_str() {
                    "start" => Ok(DoingMarker {
                        id,
                        host: host.clone(),
                        clock,
                        action: DoingAction::Start,
                    }),
                    other => Err(StoreError::Corrupt(format!("unknown doing action '{other}'"))),
                })
                .transpose()
        })
        .await
    }

    async fn count_doing(&self, id: TaskId, host: &str, clock: i64) -> StoreResult<u64> {
        let host = host.to_string();
        self.with_conn(move |conn, doing_table| {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {doing_table} WHERE id = ?1 AND host = ?2 AND clock = ?3"
                ),
                params![id.get(), host, clock],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn apply(&self, unit: UnitOfWork) -> StoreResult<UnitOutcome> {
        self.with_conn(move |conn, doing_table| {
            let tx = conn.transaction()?;

            if let Some(guard) = unit.guard() {
                if !guard_holds(&tx, doing_table, guard)? {
                    return Ok(UnitOutcome::Rejected);
                }
            }
            for op in unit.ops() {
                write(&tx, doing_table, op)?;
            }

            tx.commit()?;
            Ok(UnitOutcome::Applied)
        })
        .await
    }
}
