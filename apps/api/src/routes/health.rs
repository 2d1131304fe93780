use std::time::Duration;

use axum::{extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::warn;

use crate::extractors::Json;
use crate::state::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// GET /health
///
/// Liveness only; never touches a backend.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "talentry-api"
    }))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Readiness {
    pub status: &'static str,
    pub database: bool,
    pub redis: bool,
}

impl Readiness {
    fn new(database: bool, redis: bool) -> Self {
        let status = if database && redis { "ready" } else { "unavailable" };
        Self {
            status,
            database,
            redis,
        }
    }

    fn status_code(&self) -> StatusCode {
        if self.database && self.redis {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn database_ready(state: &AppState) -> bool {
    let check = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.db);
    match timeout(CHECK_TIMEOUT, check).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!("Readiness: database check failed: {e}");
            false
        }
        Err(_) => {
            warn!("Readiness: database check timed out");
            false
        }
    }
}

async fn redis_ready(state: &AppState) -> bool {
    let check = async {
        let mut conn = state.redis.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await
    };
    match timeout(CHECK_TIMEOUT, check).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!("Readiness: redis check failed: {e}");
            false
        }
        Err(_) => {
            warn!("Readiness: redis check timed out");
            false
        }
    }
}

/// GET /health/ready
///
/// 200 when Postgres and Redis answer, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let (database, redis) = tokio::join!(database_ready(&state), redis_ready(&state));
    let readiness = Readiness::new(database, redis);
    (readiness.status_code(), Json(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_only_when_every_backend_answers() {
        let ready = Readiness::new(true, true);
        assert_eq!(ready.status, "ready");
        assert_eq!(ready.status_code(), StatusCode::OK);

        for (database, redis) in [(false, true), (true, false), (false, false)] {
            let readiness = Readiness::new(database, redis);
            assert_eq!(readiness.status, "unavailable");
            assert_eq!(readiness.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
