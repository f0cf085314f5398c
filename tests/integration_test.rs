use photo_storage::{
    config::AppConfig,
    db::{self, photo_queries, user_queries, NotificationStore, PgStore},
    models::{
        messages::{
            EmbedJob, EmbeddingResult, ResultStatus, JOBS_QUEUE, MESSAGE_VERSION, RESULTS_QUEUE,
        },
        notification::NotificationStatus,
        photo::Photo,
    },
    pipeline::{Disposition, Pipeline},
    services::queue::{MessageQueue, RedisQueue},
};
use std::sync::Arc;
use uuid::Uuid;

/// Integration test: full embedding round trip
///
/// This test verifies the complete integration:
/// 1. Database connection and schema
/// 2. Photo metadata insert
/// 3. Job publish to Redis and pending record creation
/// 4. Result consumption, dedup of a redelivery, batch completion
/// 5. Owner-scoped mark-read
///
/// Note: This requires a running PostgreSQL and Redis instance
/// configured via environment variables. It reserves from the shared
/// result queue, so point it at a dedicated Redis database.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let queue: Arc<dyn MessageQueue> = Arc::new(
        RedisQueue::connect(&config.redis_url)
            .await
            .expect("Failed to connect to Redis"),
    );
    queue.health_check().await.expect("Redis health check failed");

    let store = Arc::new(PgStore::new(db_pool.clone()));
    let pipeline = Pipeline::new(queue.clone(), store.clone(), store.clone(), config.pipeline());

    // 1. Owner
    let email = format!("{}@example.test", Uuid::new_v4());
    let user = user_queries::create_user(&db_pool, "Integration", &email, "not-a-real-hash")
        .await
        .expect("Failed to create user")
        .expect("Email unexpectedly taken");

    // 2. Photo metadata for one batch
    let batch_id = Uuid::new_v4();
    let photos: Vec<Photo> = (0..2)
        .map(|i| {
            Photo::new(
                user.id,
                batch_id,
                format!("it_{i}.jpg"),
                format!("uploads/{batch_id}_{i}.jpg"),
            )
        })
        .collect();
    photo_queries::insert_photos(&db_pool, &photos)
        .await
        .expect("Failed to insert photos");

    // 3. Dispatch
    let notification = pipeline.producer.submit(&photos).await.expect("Dispatch failed");
    assert_eq!(notification.status, NotificationStatus::Pending);

    let job = queue
        .reserve(JOBS_QUEUE)
        .await
        .expect("Failed to reserve job")
        .expect("No job in queue");
    let decoded = EmbedJob::decode(&job.payload).expect("Job did not decode");
    assert_eq!(decoded.batch_id, batch_id);
    queue.ack(&job).await.expect("Failed to ack job");

    // 4. Results, with the first one redelivered
    let result = |photo: &Photo| EmbeddingResult {
        version: MESSAGE_VERSION,
        name: photo.name.clone(),
        path: photo.path.clone(),
        user_id: user.id,
        upload_at: photo.upload_at,
        batch_id: Some(batch_id),
        status: ResultStatus::Embedded,
        error: None,
    };
    let payloads = [result(&photos[0]), result(&photos[0]), result(&photos[1])];
    let mut dispositions = Vec::new();
    for payload in &payloads {
        queue
            .publish(RESULTS_QUEUE, &payload.encode().unwrap())
            .await
            .expect("Failed to publish result");
        let delivery = queue
            .reserve(RESULTS_QUEUE)
            .await
            .expect("Failed to reserve result")
            .expect("No result in queue");
        dispositions.push(pipeline.consumer.process(delivery).await);
    }
    assert_eq!(
        dispositions,
        vec![Disposition::Counted, Disposition::Duplicate, Disposition::Counted]
    );

    let records = store
        .list_notifications(user.id)
        .await
        .expect("Failed to list notifications");
    let record = records
        .iter()
        .find(|n| n.batch_id == batch_id)
        .expect("Batch record missing");
    assert_eq!(record.completed, 2);
    assert_eq!(record.status, NotificationStatus::Completed);

    let stored = photo_queries::list_photos(&db_pool, user.id, 10, 0)
        .await
        .expect("Failed to list photos");
    assert!(stored.iter().all(|p| p.embedded));

    // 5. Mark-read is owner scoped
    let foreign = store
        .mark_read(Uuid::new_v4(), &[record.id])
        .await
        .expect("mark_read failed");
    assert_eq!(foreign, 0);
    let own = store.mark_read(user.id, &[record.id]).await.expect("mark_read failed");
    assert_eq!(own, 1);

    // Cleanup
    sqlx::query("DELETE FROM notifications WHERE user_id = $1")
        .bind(user.id)
        .execute(&db_pool)
        .await
        .expect("Failed to clean up notifications");
    sqlx::query("DELETE FROM photos WHERE user_id = $1")
        .bind(user.id)
        .execute(&db_pool)
        .await
        .expect("Failed to clean up photos");
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&db_pool)
        .await
        .expect("Failed to clean up user");
}
