//! State survives a daemon restart (file-backed SQLite)

use std::sync::Arc;

use dispatch_core::application::{BroadcastHelper, SubmitTaskRequest, TaskDispatchService};
use dispatch_core::domain::{DelegateConnection, TaskStatus};
use dispatch_core::port::broadcaster::mocks::RecordingTransport;
use dispatch_core::port::feature_flag::mocks::MockFeatureFlags;
use dispatch_core::port::id_provider::UuidProvider;
use dispatch_core::port::time_provider::SystemTimeProvider;
use dispatch_core::port::{ConnectionRepository, TaskRepository};
use dispatch_infra_sqlite::{
    create_pool, run_migrations, SqliteConnectionRepository, SqliteTaskRepository,
};

#[tokio::test]
async fn test_tasks_and_connections_survive_restart() {
    let db_path = std::env::temp_dir().join(format!("dispatch_test_{}.db", uuid::Uuid::new_v4()));
    let db_path = db_path.to_string_lossy().into_owned();

    let task_id = {
        let pool = create_pool(&db_path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let service = TaskDispatchService::new(
            tasks,
            BroadcastHelper::new(
                Arc::new(RecordingTransport::new()),
                Arc::new(MockFeatureFlags::new()),
                Arc::new(SystemTimeProvider),
            ),
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
        );
        let task = service
            .submit(SubmitTaskRequest {
                account_id: "acct-1".to_string(),
                version: "1".to_string(),
                is_async: true,
                pre_assigned_delegate_id: None,
                setup_abstractions: Default::default(),
                timeout_ms: Some(60_000),
            })
            .await
            .unwrap();

        SqliteConnectionRepository::new(pool.clone())
            .upsert(&DelegateConnection::new("c-1", "acct-1", "d-1", "1", 42))
            .await
            .unwrap();

        pool.close().await;
        task.id
    };

    // Restart: migrations are a no-op, data is intact
    let pool = create_pool(&db_path).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let tasks = SqliteTaskRepository::new(pool.clone());
    let restored = tasks.find_by_id(&task_id).await.unwrap().unwrap();
    assert_eq!(restored.status, TaskStatus::Queued);
    assert_eq!(tasks.count_by_status(TaskStatus::Queued).await.unwrap(), 1);

    let connections = SqliteConnectionRepository::new(pool.clone());
    let conn = connections.find_by_id("c-1").await.unwrap().unwrap();
    assert_eq!(conn.last_heartbeat, 42);

    pool.close().await;
    let _ = std::fs::remove_file(&db_path);
}
