//! Health & readiness handlers for the scanner process.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> checks that SQLite answers and the storage root is writable
//!
//! Neither endpoint reports scan results; those only go to the logs.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs;
use uuid::Uuid;

/// Backends the readiness check touches.
#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<SqlitePool>,
    pub storage_root: PathBuf,
}

/// `GET /healthz`
///
/// Always 200 OK; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// 200 when every check passes, 503 otherwise, with a JSON body describing
/// each check.
pub async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    let mut checks = HashMap::new();
    checks.insert("sqlite", check_sqlite(&state.db).await);
    checks.insert("disk", check_disk(&state.storage_root).await);

    let overall_ok = checks.values().all(|check| check.ok);
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    (status, Json(body))
}

async fn check_sqlite(db: &SqlitePool) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => CheckStatus::pass(),
        Ok(v) => CheckStatus::fail(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::fail(format!("error: {}", e)),
    }
}

/// Write, read back and delete a temp file under the storage root.
async fn check_disk(root: &Path) -> CheckStatus {
    let tmp_path = root.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return CheckStatus::fail(format!("could not write tmp file: {}", e));
    }
    let read_back = fs::read(&tmp_path).await;
    let removed = fs::remove_file(&tmp_path).await;

    match (read_back, removed) {
        (Ok(bytes), Ok(())) if bytes == b"readyz" => CheckStatus::pass(),
        (Ok(bytes), Err(e)) if bytes == b"readyz" => CheckStatus {
            ok: true,
            error: Some(format!("could not remove tmp file: {}", e)),
        },
        (Ok(_), _) => CheckStatus::fail("file content mismatch".into()),
        (Err(e), _) => CheckStatus::fail(format!("could not read tmp file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize, Debug)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn pass() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn fail(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ready_when_sqlite_and_disk_work() {
        let dir = TempDir::new().unwrap();
        let state = HealthState {
            db: Arc::new(memory_pool().await),
            storage_root: dir.path().to_path_buf(),
        };
        let response = readyz(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn not_ready_when_storage_root_is_missing() {
        let dir = TempDir::new().unwrap();
        let state = HealthState {
            db: Arc::new(memory_pool().await),
            storage_root: dir.path().join("does-not-exist"),
        };
        let response = readyz(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
