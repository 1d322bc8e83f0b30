use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rollcall_core::identity::IdentityClaim;
use rollcall_core::types::UnknownStatus;
use rollcall_core::{EnrollmentRecord, ScanEvent, ScanLogger, ScanStatus, Verifier};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// How long a connection waits on a lock held by the other process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Stored scan time format. Fixed width, so text order is time order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";
/// Parse format; the fraction is optional so `CURRENT_TIMESTAMP` rows load too.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS enrollments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    roll_no TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS scan_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    roll_no TEXT,
    scan_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scan_logs_scan_time ON scan_logs (scan_time);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("code {0:?} is already enrolled")]
    AlreadyEnrolled(String),
    #[error("row {id}: bad scan_time {value:?}: {source}")]
    BadTimestamp {
        id: i64,
        value: String,
        source: chrono::ParseError,
    },
    #[error("row {id}: {source}")]
    BadStatus { id: i64, source: UnknownStatus },
}

/// Handle to the attendance database file.
///
/// Holds only the path; each call opens, uses and closes a connection.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

type ScanRow = (i64, String, Option<String>, String, String);

impl Database {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let db = Self { path };
        db.connect()?.execute_batch(SCHEMA)?;
        tracing::debug!(path = %db.path.display(), "database ready");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Register a badge identity. `code` is the name printed into the badge.
    pub fn enroll(&self, code: &str, roll_no: &str) -> Result<EnrollmentRecord, StoreError> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT INTO enrollments (code, roll_no) VALUES (?1, ?2)",
            params![code, roll_no],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(StoreError::AlreadyEnrolled(code.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let created_at: String = conn.query_row(
            "SELECT created_at FROM enrollments WHERE id = ?1",
            params![conn.last_insert_rowid()],
            |row| row.get(0),
        )?;
        tracing::info!(code, roll_no, "enrolled");

        Ok(EnrollmentRecord {
            code: code.to_string(),
            roll_no: roll_no.to_string(),
            created_at,
        })
    }

    /// All enrollments in registration order.
    pub fn enrollments(&self) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT code, roll_no, created_at FROM enrollments ORDER BY id")?;
        let records = stmt
            .query_map([], |row| {
                Ok(EnrollmentRecord {
                    code: row.get(0)?,
                    roll_no: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Exact, case-sensitive match on (name, roll number).
    ///
    /// A missing roll number never matches and skips the query.
    pub fn is_enrolled(&self, name: &str, roll_no: Option<&str>) -> Result<bool, StoreError> {
        let Some(roll_no) = roll_no else {
            return Ok(false);
        };
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM enrollments WHERE code = ?1 AND roll_no = ?2 LIMIT 1",
                params![name, roll_no],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Append a scan stamped with the current time.
    ///
    /// The stamp never goes below the newest logged scan, so scan times stay
    /// non-decreasing in insertion order even if the wall clock steps back.
    pub fn log_scan(
        &self,
        payload: &str,
        roll_no: Option<&str>,
        status: ScanStatus,
    ) -> Result<ScanEvent, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut timestamp = Utc::now();
        let newest: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, scan_time FROM scan_logs ORDER BY scan_time DESC, id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((id, value)) = newest {
            let newest = parse_timestamp(id, &value)?;
            if newest > timestamp {
                tracing::warn!(%newest, now = %timestamp, "clock is behind newest scan; reusing its time");
                timestamp = newest;
            }
        }

        tx.execute(
            "INSERT INTO scan_logs (payload, roll_no, scan_time, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                payload,
                roll_no,
                timestamp.format(TIMESTAMP_FORMAT).to_string(),
                status.as_str()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(ScanEvent {
            id,
            payload: payload.to_string(),
            roll_no: roll_no.map(str::to_string),
            timestamp,
            status,
        })
    }

    /// Every scan, newest first.
    pub fn list_scans(&self) -> Result<Vec<ScanEvent>, StoreError> {
        self.query_scans(
            "SELECT id, payload, roll_no, scan_time, status FROM scan_logs
             ORDER BY scan_time DESC, id DESC",
        )
    }

    /// Present scans in insertion order; the anomaly model's training set.
    pub fn present_scans(&self) -> Result<Vec<ScanEvent>, StoreError> {
        self.query_scans(
            "SELECT id, payload, roll_no, scan_time, status FROM scan_logs
             WHERE status = 'Present' ORDER BY id",
        )
    }

    /// Delete every scan. Enrollments are untouched. Returns rows removed.
    pub fn clear_scans(&self) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM scan_logs", [])?;
        tracing::info!(removed, "scan log cleared");
        Ok(removed)
    }

    fn query_scans(&self, sql: &str) -> Result<Vec<ScanEvent>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<Result<Vec<ScanRow>, _>>()?;
        rows.into_iter().map(scan_from_row).collect()
    }
}

fn scan_from_row((id, payload, roll_no, scan_time, status): ScanRow) -> Result<ScanEvent, StoreError> {
    Ok(ScanEvent {
        id,
        payload,
        roll_no,
        timestamp: parse_timestamp(id, &scan_time)?,
        status: status
            .parse()
            .map_err(|source| StoreError::BadStatus { id, source })?,
    })
}

fn parse_timestamp(id: i64, value: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_PARSE_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|source| StoreError::BadTimestamp {
            id,
            value: value.to_string(),
            source,
        })
}

impl Verifier for Database {
    type Error = StoreError;

    fn verify(&self, claim: &IdentityClaim) -> Result<bool, StoreError> {
        self.is_enrolled(&claim.name, claim.roll_no.as_deref())
    }
}

impl ScanLogger for Database {
    type Error = StoreError;

    fn write(
        &self,
        payload: &str,
        roll_no: Option<&str>,
        status: ScanStatus,
    ) -> Result<ScanEvent, StoreError> {
        self.log_scan(payload, roll_no, status)
    }
}
