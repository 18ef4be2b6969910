//! Owner-side snapshot endpoint
//!
//! `GET /entities/snapshot[?since=RFC3339]` returns a JSON array of every
//! entity, or only those updated strictly after `since`.

use std::sync::Arc;

use actix_web::{HttpResponse, Responder, Scope, get, web};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muster_api::ReplicatedEntity;
use serde::Deserialize;
use tracing::error;

use crate::cache::LocalEntityCache;

/// Anything that can produce the owner's authoritative entity list.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<Vec<ReplicatedEntity>>;
}

/// A cache can re-serve what it holds.
#[async_trait]
impl SnapshotSource for LocalEntityCache {
    async fn snapshot(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<Vec<ReplicatedEntity>> {
        let mut entities: Vec<ReplicatedEntity> = self
            .all()
            .into_iter()
            .filter(|e| since.is_none_or(|since| e.last_updated_at > since))
            .collect();
        entities.sort_by_key(|e| e.id);
        Ok(entities)
    }
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub since: Option<DateTime<Utc>>,
}

#[get("/snapshot")]
async fn get_snapshot(
    source: web::Data<Arc<dyn SnapshotSource>>,
    query: web::Query<SnapshotQuery>,
) -> impl Responder {
    match source.snapshot(query.since).await {
        Ok(entities) => HttpResponse::Ok().json(entities),
        Err(e) => {
            error!("Snapshot source failed: {:#}", e);
            HttpResponse::ServiceUnavailable().finish()
        }
    }
}

/// Snapshot routes. The app must register
/// `web::Data<Arc<dyn SnapshotSource>>`.
pub fn snapshot_routes() -> Scope {
    web::scope("/entities").service(get_snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use chrono::Duration;
    use uuid::Uuid;

    struct FailingSource;

    #[async_trait]
    impl SnapshotSource for FailingSource {
        async fn snapshot(&self, _since: Option<DateTime<Utc>>) -> anyhow::Result<Vec<ReplicatedEntity>> {
            anyhow::bail!("database offline")
        }
    }

    fn seeded_cache() -> (Arc<LocalEntityCache>, DateTime<Utc>) {
        let cache = Arc::new(LocalEntityCache::default());
        let now = Utc::now();
        cache.upsert(ReplicatedEntity::new(Uuid::new_v4(), "old", "old@example.com").updated_at(now - Duration::hours(1)));
        cache.upsert(ReplicatedEntity::new(Uuid::new_v4(), "new", "new@example.com").updated_at(now));
        (cache, now)
    }

    #[actix_web::test]
    async fn test_full_snapshot() {
        let (cache, _) = seeded_cache();
        let source: Arc<dyn SnapshotSource> = cache;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(source))
                .service(snapshot_routes()),
        )
        .await;

        let req = test::TestRequest::get().uri("/entities/snapshot").to_request();
        let entities: Vec<ReplicatedEntity> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(entities.len(), 2);
    }

    #[actix_web::test]
    async fn test_incremental_snapshot() {
        let (cache, now) = seeded_cache();
        let source: Arc<dyn SnapshotSource> = cache;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(source))
                .service(snapshot_routes()),
        )
        .await;

        let since = (now - Duration::minutes(1)).format("%Y-%m-%dT%H:%M:%SZ");
        let req = test::TestRequest::get()
            .uri(&format!("/entities/snapshot?since={}", since))
            .to_request();
        let entities: Vec<ReplicatedEntity> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].display_name, "new");
    }

    #[actix_web::test]
    async fn test_source_failure_is_unavailable() {
        let source: Arc<dyn SnapshotSource> = Arc::new(FailingSource);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(source))
                .service(snapshot_routes()),
        )
        .await;

        let req = test::TestRequest::get().uri("/entities/snapshot").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
