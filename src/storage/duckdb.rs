use super::traits::{PackageStore, StorageError};
use crate::package::{DownloadEvent, PackageInfo};
use async_trait::async_trait;
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const LOOKUP_SQL: &str = "SELECT p.listed,
        COALESCE(p.title, ''),
        COALESCE(p.description, ''),
        COALESCE(p.icon_url, '')
     FROM packages p
     INNER JOIN package_registrations pr ON p.package_registration_key = pr.registration_key
     WHERE pr.id = ? AND p.normalized_version = ?
     LIMIT 1";

const INSERT_SQL: &str = "INSERT INTO package_statistics
        (package_key, ip_address, user_agent, operation, dependent_package, project_guids)
     SELECT p.package_key, 'unknown', ?, ?, ?, ?
     FROM packages p
     INNER JOIN package_registrations pr ON p.package_registration_key = pr.registration_key
     WHERE pr.id = ? AND p.normalized_version = ?
     LIMIT 1";

/// Check if a process with the given PID is still running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use std::process::Command;
        Command::new("ps")
            .arg("-p")
            .arg(pid.to_string())
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Extract PID from DuckDB lock error message, e.g. "... (PID 12345) ..."
fn extract_pid_from_lock_error(error_msg: &str) -> Option<u32> {
    let start = error_msg.find("(PID ")? + 5;
    let end = error_msg[start..].find(')')?;
    error_msg[start..start + end].parse().ok()
}

fn remove_lock_files(db_path: &Path) -> std::io::Result<()> {
    for suffix in ["wal", "lock"] {
        let stale = PathBuf::from(format!("{}.{}", db_path.display(), suffix));
        if stale.exists() {
            std::fs::remove_file(&stale)?;
            tracing::info!("Removed stale {} file: {}", suffix, stale.display());
        }
    }
    Ok(())
}

/// Opens the database, clearing a lock left behind by a dead process.
fn open_with_stale_lock_recovery(path: &Path) -> Result<Connection, StorageError> {
    let err = match Connection::open(path) {
        Ok(conn) => return Ok(conn),
        Err(e) => e,
    };

    let error_msg = err.to_string();
    if !error_msg.contains("Could not set lock") {
        return Err(err.into());
    }

    tracing::warn!("Database lock detected: {}", error_msg);
    let Some(pid) = extract_pid_from_lock_error(&error_msg) else {
        return Err(err.into());
    };

    if is_process_running(pid) {
        tracing::error!("Process {} is still running, cannot acquire lock", pid);
        return Err(err.into());
    }

    tracing::warn!("Process {} is not running, removing stale lock files", pid);
    if let Err(io_err) = remove_lock_files(path) {
        tracing::error!("Failed to remove lock files: {}", io_err);
        return Err(err.into());
    }

    Ok(Connection::open(path)?)
}

/// Gallery package tables backed by DuckDB.
///
/// The schema is owned by the gallery; this store only reads `packages` and
/// `package_registrations` and appends to `package_statistics`.
pub struct DuckDbPackageStore {
    conn: Arc<Mutex<Connection>>,
    command_timeout: Duration,
}

impl DuckDbPackageStore {
    pub fn new<P: AsRef<Path>>(path: P, command_timeout: Duration) -> Result<Self, StorageError> {
        let conn = open_with_stale_lock_recovery(path.as_ref())?;
        Ok(Self::from_connection(conn, command_timeout))
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, DEFAULT_COMMAND_TIMEOUT))
    }

    /// A zero timeout falls back to five seconds.
    pub fn from_connection(conn: Connection, command_timeout: Duration) -> Self {
        let command_timeout = if command_timeout.is_zero() {
            DEFAULT_COMMAND_TIMEOUT
        } else {
            command_timeout
        };
        Self {
            conn: Arc::new(Mutex::new(conn)),
            command_timeout,
        }
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Run raw SQL against the connection, used to set up schemas.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(sql)?;
        Ok(())
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self.conn.clone();
        let task = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        });

        match tokio::time::timeout(self.command_timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(StorageError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl PackageStore for DuckDbPackageStore {
    async fn lookup(
        &self,
        id: &str,
        normalized_version: &str,
    ) -> Result<Option<PackageInfo>, StorageError> {
        let id = id.to_string();
        let version = normalized_version.to_string();

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(LOOKUP_SQL)?;
            let mut rows = stmt.query(duckdb::params![id, version])?;

            match rows.next()? {
                Some(row) => Ok(Some(PackageInfo {
                    listed: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    icon_url: row.get(3)?,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn insert_statistics(
        &self,
        normalized_version: &str,
        event: &DownloadEvent,
    ) -> Result<(), StorageError> {
        let version = normalized_version.to_string();
        let event = event.clone();

        self.with_connection(move |conn| {
            let inserted = conn.execute(
                INSERT_SQL,
                duckdb::params![
                    event.user_agent,
                    event.operation,
                    event.dependent_package,
                    event.project_guids,
                    event.id,
                    version,
                ],
            )?;

            if inserted == 0 {
                return Err(StorageError::PackageNotFound {
                    id: event.id,
                    version,
                });
            }
            Ok(())
        })
        .await
    }
}
