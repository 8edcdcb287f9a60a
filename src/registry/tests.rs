use super::*;
use crate::types::Status;
use std::collections::HashSet;
use tempfile::{TempDir, tempdir};

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://example.com/file{i}.txt")).collect()
}

fn test_registry() -> (TaskRegistry, TempDir) {
    let temp_dir = tempdir().unwrap();
    let registry = TaskRegistry::new(TaskStore::new(temp_dir.path().join("state")));
    (registry, temp_dir)
}

#[tokio::test]
async fn test_create_task_persists_and_registers() {
    let (registry, _temp_dir) = test_registry();

    let task = registry.create_task(urls(3)).await.unwrap();

    assert_eq!(task.files.len(), task.urls.len());
    assert!(task.files.iter().all(|f| f.status == Status::Pending));
    assert_eq!(task.files[1].filename, "file1.txt");

    let stored = registry.store().load(&task.id).await.unwrap();
    assert_eq!(stored, task);
    assert_eq!(registry.task_snapshot(&task.id).await.unwrap(), task);
}

#[tokio::test]
async fn test_create_task_accepts_empty_url_list() {
    let (registry, _temp_dir) = test_registry();

    let task = registry.create_task(Vec::new()).await.unwrap();
    assert!(task.files.is_empty());
    assert_eq!(task.status, Status::Pending);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_create_task_failed_save_is_not_visible() {
    let temp_dir = tempdir().unwrap();
    // A regular file where the state directory should be
    let blocker = temp_dir.path().join("state");
    std::fs::write(&blocker, "not a directory").unwrap();
    let registry = TaskRegistry::new(TaskStore::new(&blocker));

    let result = registry.create_task(urls(1)).await;

    assert!(matches!(result, Err(Error::Store(_))));
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_creates_get_unique_ids() {
    let temp_dir = tempdir().unwrap();
    let registry = Arc::new(TaskRegistry::new(TaskStore::new(temp_dir.path())));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.create_task(urls(1)).await.unwrap().id })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        assert!(ids.insert(handle.await.unwrap()));
    }
    assert_eq!(registry.len().await, 20);
    assert_eq!(registry.store().load_all().await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_get_unknown_task_is_none() {
    let (registry, _temp_dir) = test_registry();
    assert!(registry.get_task(&TaskId::from("nope")).await.is_none());
    assert!(registry.task_snapshot(&TaskId::from("nope")).await.is_none());
}

#[tokio::test]
async fn test_update_task_keeps_handle_stable() {
    let (registry, _temp_dir) = test_registry();
    let task = registry.create_task(urls(2)).await.unwrap();
    let handle = registry.get_task(&task.id).await.unwrap();

    let mut changed = task.clone();
    changed.files[0].status = Status::Completed;
    changed.status = Status::Downloading;
    registry.update_task(changed.clone()).await.unwrap();

    let again = registry.get_task(&task.id).await.unwrap();
    assert!(Arc::ptr_eq(&handle, &again));
    assert_eq!(handle.snapshot().await, changed);
    assert_eq!(registry.store().load(&task.id).await.unwrap(), changed);
}

#[tokio::test]
async fn test_update_task_keeps_memory_when_save_fails() {
    let temp_dir = tempdir().unwrap();
    let state_dir = temp_dir.path().join("state");
    let registry = TaskRegistry::new(TaskStore::new(&state_dir));
    let task = registry.create_task(urls(1)).await.unwrap();

    std::fs::remove_dir_all(&state_dir).unwrap();
    std::fs::write(&state_dir, "blocker").unwrap();

    let mut changed = task.clone();
    changed.progress = 42;
    assert!(registry.update_task(changed).await.is_err());
    assert_eq!(registry.task_snapshot(&task.id).await.unwrap().progress, 42);
}

#[tokio::test]
async fn test_persist_task_writes_live_state() {
    let (registry, _temp_dir) = test_registry();
    let task = registry.create_task(urls(1)).await.unwrap();

    let handle = registry.get_task(&task.id).await.unwrap();
    handle.write().await.files[0].status = Status::Downloading;
    registry.persist_task(&task.id).await.unwrap();

    let stored = registry.store().load(&task.id).await.unwrap();
    assert_eq!(stored.files[0].status, Status::Downloading);

    let missing = registry.persist_task(&TaskId::from("ghost")).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_incomplete_tasks_filters_by_status() {
    let (registry, _temp_dir) = test_registry();
    let pending = registry.create_task(urls(1)).await.unwrap();
    let done = registry.create_task(urls(1)).await.unwrap();
    let failed = registry.create_task(urls(1)).await.unwrap();

    registry.get_task(&done.id).await.unwrap().write().await.status = Status::Completed;
    registry.get_task(&failed.id).await.unwrap().write().await.status = Status::Failed;

    let incomplete: Vec<TaskId> = registry
        .incomplete_tasks()
        .await
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(incomplete, vec![pending.id]);
    assert_eq!(registry.all_snapshots().await.len(), 3);
    assert_eq!(registry.all_tasks().await.len(), 3);
}

#[tokio::test]
async fn test_refresh_progress_aggregates_and_persists() {
    let (registry, _temp_dir) = test_registry();
    let task = registry.create_task(urls(2)).await.unwrap();

    {
        let handle = registry.get_task(&task.id).await.unwrap();
        let mut live = handle.write().await;
        for file in live.files.iter_mut() {
            file.status = Status::Completed;
            file.size = 4;
            file.downloaded = 4;
        }
    }
    registry.refresh_progress(&task.id).await;

    let stored = registry.store().load(&task.id).await.unwrap();
    assert_eq!(stored.progress, 100);
    assert_eq!(stored.status, Status::Completed);
}

#[tokio::test]
async fn test_load_restores_tasks_from_store() {
    let temp_dir = tempdir().unwrap();
    let state_dir = temp_dir.path().join("state");

    let created = {
        let registry = TaskRegistry::new(TaskStore::new(&state_dir));
        registry.create_task(urls(2)).await.unwrap()
    };

    let registry = TaskRegistry::load(TaskStore::new(&state_dir)).await.unwrap();
    assert_eq!(registry.task_snapshot(&created.id).await.unwrap(), created);
}

// Recovery

#[tokio::test]
async fn test_recovery_resets_unfinished_files() {
    let (registry, _temp_dir) = test_registry();
    let task = registry.create_task(urls(3)).await.unwrap();

    {
        let handle = registry.get_task(&task.id).await.unwrap();
        let mut live = handle.write().await;
        live.files[0].status = Status::Completed;
        live.files[0].size = 5;
        live.files[0].downloaded = 5;
        live.files[1].status = Status::Failed;
        live.files[2].status = Status::Downloading;
        live.files[2].downloaded = 3;
        live.status = Status::Downloading;
        live.progress = 50;
    }

    let recovered = registry.recover_incomplete_tasks().await;
    assert_eq!(recovered, vec![task.id.clone()]);

    let stored = registry.store().load(&task.id).await.unwrap();
    assert_eq!(stored.status, Status::Pending);
    assert_eq!(stored.progress, 0);
    assert_eq!(stored.files[0].status, Status::Completed);
    assert_eq!(stored.files[0].downloaded, 5);
    for file in &stored.files[1..] {
        assert_eq!(file.status, Status::Pending);
        assert_eq!(file.downloaded, 0);
    }
}

#[tokio::test]
async fn test_recovery_includes_failed_tasks() {
    let (registry, _temp_dir) = test_registry();
    let task = registry.create_task(urls(1)).await.unwrap();
    {
        let handle = registry.get_task(&task.id).await.unwrap();
        let mut live = handle.write().await;
        live.files[0].status = Status::Failed;
        live.status = Status::Failed;
    }

    let recovered = registry.recover_incomplete_tasks().await;
    assert_eq!(recovered, vec![task.id.clone()]);
    let snapshot = registry.task_snapshot(&task.id).await.unwrap();
    assert_eq!(snapshot.files[0].status, Status::Pending);
}

#[tokio::test]
async fn test_recovery_does_not_touch_completed_tasks() {
    let (registry, _temp_dir) = test_registry();
    let task = registry.create_task(urls(1)).await.unwrap();
    {
        let handle = registry.get_task(&task.id).await.unwrap();
        let mut live = handle.write().await;
        live.files[0].status = Status::Completed;
        live.status = Status::Completed;
        live.progress = 100;
    }
    // Any write during recovery would recreate this record
    registry.store().delete(&task.id).await.unwrap();

    let recovered = registry.recover_incomplete_tasks().await;

    assert!(recovered.is_empty());
    assert!(!registry.store().record_path(&task.id).exists());
    assert_eq!(
        registry.task_snapshot(&task.id).await.unwrap().status,
        Status::Completed
    );
}
