use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use crate::model::{
    CaseStatus, Environment, ExecutionResult, Folder, FolderKind, Outcome, Parameters, TestCase,
};

/// Fields for a test case row before it has an id.
#[derive(Debug, Clone)]
pub struct NewTestCase {
    pub name: String,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub detail_category: Option<String>,
    pub tool_kind: String,
    pub script_path: String,
    pub environment: Environment,
    pub folder_id: Option<i64>,
    pub parameters: Parameters,
    pub status: Option<CaseStatus>,
}

#[derive(Debug, Clone)]
pub struct NewFolder {
    pub name: String,
    pub kind: Option<FolderKind>,
    pub environment: Option<Environment>,
    pub parent_id: Option<i64>,
}

pub struct TestStore {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl TestStore {
    pub fn new(data_dir: &Path) -> anyhow::Result<Self> {
        let db_path = data_dir.join("testlab.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        store.init_schema()?;
        store.cleanup_stale_results()?;
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                kind TEXT,
                environment TEXT,
                parent_id INTEGER REFERENCES folders(id)
            );

            CREATE TABLE IF NOT EXISTS test_cases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                main_category TEXT,
                sub_category TEXT,
                detail_category TEXT,
                tool_kind TEXT NOT NULL,
                script_path TEXT NOT NULL,
                environment TEXT NOT NULL,
                folder_id INTEGER REFERENCES folders(id),
                parameters TEXT NOT NULL DEFAULT '{}',
                status TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS execution_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                case_id INTEGER NOT NULL REFERENCES test_cases(id) ON DELETE CASCADE,
                outcome TEXT NOT NULL DEFAULT 'running',
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_secs REAL,
                stdout TEXT,
                stderr TEXT,
                error_message TEXT,
                screenshot_ref TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_results_case ON execution_results(case_id);
            CREATE INDEX IF NOT EXISTS idx_results_outcome ON execution_results(outcome);
            CREATE INDEX IF NOT EXISTS idx_cases_folder ON test_cases(folder_id);
        ",
        )?;
        Ok(())
    }

    /// Finalize any rows left 'running' by a crash so operators see an
    /// Error row instead of a result stuck in flight forever.
    fn cleanup_stale_results(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE execution_results
             SET outcome = 'error', ended_at = ?1,
                 error_message = 'interrupted by engine restart'
             WHERE outcome = 'running'",
            params![now],
        )?;
        Ok(())
    }

    // ========================================================================
    // Test cases
    // ========================================================================

    pub fn insert_case(&self, case: &NewTestCase) -> anyhow::Result<i64> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let parameters = serde_json::to_string(&case.parameters)?;
        conn.execute(
            "INSERT INTO test_cases (
                name, main_category, sub_category, detail_category, tool_kind,
                script_path, environment, folder_id, parameters, status,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                case.name,
                case.main_category,
                case.sub_category,
                case.detail_category,
                case.tool_kind,
                case.script_path,
                case.environment.as_str(),
                case.folder_id,
                parameters,
                case.status.map(|s| s.as_str()),
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_case(&self, id: i64) -> anyhow::Result<Option<TestCase>> {
        let conn = self.conn();
        let case = conn
            .query_row(
                "SELECT id, name, main_category, sub_category, detail_category, tool_kind,
                        script_path, environment, folder_id, parameters, status,
                        created_at, updated_at
                 FROM test_cases WHERE id=?1",
                params![id],
                row_to_case,
            )
            .optional()?;
        Ok(case)
    }

    pub fn update_case_status(&self, id: i64, status: CaseStatus) -> anyhow::Result<()> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE test_cases SET status=?2, updated_at=?3 WHERE id=?1",
            params![id, status.as_str(), now],
        )?;
        Ok(())
    }

    /// Delete a case; its execution history goes with it (FK cascade).
    pub fn delete_case(&self, id: i64) -> anyhow::Result<bool> {
        let conn = self.conn();
        let n = conn.execute("DELETE FROM test_cases WHERE id=?1", params![id])?;
        Ok(n > 0)
    }

    /// Statuses of every case owned by one of the given folders. Used by
    /// the dashboard aggregator; None means the case has never been given
    /// a verdict.
    pub fn case_statuses_in_folders(
        &self,
        folder_ids: &[i64],
    ) -> anyhow::Result<Vec<Option<CaseStatus>>> {
        if folder_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let placeholders = vec!["?"; folder_ids.len()].join(",");
        let sql = format!(
            "SELECT status FROM test_cases WHERE folder_id IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(folder_ids.iter()), |row| {
            let status: Option<String> = row.get(0)?;
            status
                .map(|s| parse_enum::<CaseStatus>(0, &s))
                .transpose()
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ========================================================================
    // Folders
    // ========================================================================

    pub fn insert_folder(&self, folder: &NewFolder) -> anyhow::Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO folders (name, kind, environment, parent_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                folder.name,
                folder.kind.map(|k| k.as_str()),
                folder.environment.map(|e| e.as_str()),
                folder.parent_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_folders(&self) -> anyhow::Result<Vec<Folder>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, kind, environment, parent_id FROM folders ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let kind: Option<String> = row.get(2)?;
            let environment: Option<String> = row.get(3)?;
            Ok(Folder {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: kind.map(|k| parse_enum(2, &k)).transpose()?,
                environment: environment.map(|e| parse_enum(3, &e)).transpose()?,
                parent_id: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ========================================================================
    // Execution results
    // ========================================================================

    /// Open a Running row before the subprocess starts, so a crash
    /// mid-execution still leaves a discoverable record.
    pub fn insert_running_result(
        &self,
        case_id: i64,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO execution_results (case_id, outcome, started_at)
             VALUES (?1, 'running', ?2)",
            params![case_id, started_at.to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Single UPDATE: readers see the row either still running or fully
    /// finalized, never half-written.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_result(
        &self,
        id: i64,
        outcome: Outcome,
        ended_at: DateTime<Utc>,
        duration_secs: f64,
        stdout: Option<&str>,
        stderr: Option<&str>,
        error_message: Option<&str>,
        screenshot_ref: Option<&str>,
    ) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE execution_results
             SET outcome=?2, ended_at=?3, duration_secs=?4, stdout=?5,
                 stderr=?6, error_message=?7, screenshot_ref=?8
             WHERE id=?1",
            params![
                id,
                outcome.as_str(),
                ended_at.to_rfc3339(),
                duration_secs,
                stdout,
                stderr,
                error_message,
                screenshot_ref,
            ],
        )?;
        Ok(())
    }

    pub fn get_result(&self, id: i64) -> anyhow::Result<Option<ExecutionResult>> {
        let conn = self.conn();
        let result = conn
            .query_row(
                "SELECT id, case_id, outcome, started_at, ended_at, duration_secs,
                        stdout, stderr, error_message, screenshot_ref
                 FROM execution_results WHERE id=?1",
                params![id],
                row_to_result,
            )
            .optional()?;
        Ok(result)
    }

    /// Execution history for a case, newest first.
    pub fn list_results(&self, case_id: i64) -> anyhow::Result<Vec<ExecutionResult>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, case_id, outcome, started_at, ended_at, duration_secs,
                    stdout, stderr, error_message, screenshot_ref
             FROM execution_results WHERE case_id=?1
             ORDER BY started_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![case_id], row_to_result)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_results(&self, case_id: i64) -> anyhow::Result<i64> {
        let conn = self.conn();
        let n = conn.query_row(
            "SELECT COUNT(*) FROM execution_results WHERE case_id=?1",
            params![case_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

fn row_to_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<TestCase> {
    let environment: String = row.get(7)?;
    let parameters: String = row.get(9)?;
    let status: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(TestCase {
        id: row.get(0)?,
        name: row.get(1)?,
        main_category: row.get(2)?,
        sub_category: row.get(3)?,
        detail_category: row.get(4)?,
        tool_kind: row.get(5)?,
        script_path: row.get(6)?,
        environment: parse_enum(7, &environment)?,
        folder_id: row.get(8)?,
        parameters: serde_json::from_str(&parameters)
            .map_err(|e| conversion_error(9, e.to_string()))?,
        status: status.map(|s| parse_enum(10, &s)).transpose()?,
        created_at: parse_ts(11, &created_at)?,
        updated_at: parse_ts(12, &updated_at)?,
    })
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionResult> {
    let outcome: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let ended_at: Option<String> = row.get(4)?;
    Ok(ExecutionResult {
        id: row.get(0)?,
        case_id: row.get(1)?,
        outcome: parse_enum(2, &outcome)?,
        started_at: parse_ts(3, &started_at)?,
        ended_at: ended_at.map(|t| parse_ts(4, &t)).transpose()?,
        duration_secs: row.get(5)?,
        stdout: row.get(6)?,
        stderr: row.get(7)?,
        error_message: row.get(8)?,
        screenshot_ref: row.get(9)?,
    })
}

fn parse_enum<T: FromStr<Err = String>>(idx: usize, s: &str) -> rusqlite::Result<T> {
    s.parse().map_err(|e: String| conversion_error(idx, e))
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}
