//! # Registry Behavior Tests
//!
//! Registration dedup, path lookup, column updates, deprecation
//! propagation, and the change-event surface.

mod common;

use common::*;

use rms::application::registry::{FileOptions, PipeOptions};
use rms_domain::{ArgValue, EventKind, FullId, RmsEntry, RmsError, RunAnnotations};
use serde_json::json;

#[tokio::test]
async fn test_register_pipe_deduplicates_identical_definitions() {
    let (_dir, registry) = scratch_registry().await;
    let first = registry
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    let second = registry
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    // A different policy flag is a different pipe identity.
    let volatile = registry
        .register_pipe(
            add_func(),
            PipeOptions { return_volatile: true, ..PipeOptions::default() },
        )
        .await
        .unwrap();
    assert_ne!(volatile.id, first.id);
}

#[tokio::test]
async fn test_find_pipe_by_definition() {
    let (_dir, registry) = scratch_registry().await;
    let registered = registry
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    let found = registry.find_pipe(&add_func()).await.unwrap();
    assert_eq!(found.id, registered.id);

    let missing = registry.find_pipe(&load_func()).await;
    assert!(matches!(missing, Err(RmsError::NotFound(_))));
}

#[tokio::test]
async fn test_file_from_path_lookup_states() {
    let (dir, registry) = scratch_registry().await;
    let target = dir.path().join("data.bin");

    let err = registry.file_from_path(&target).await;
    assert!(matches!(err, Err(RmsError::NotRegistered(_))));

    std::fs::write(&target, [1u8, 2, 3]).unwrap();
    let file = registry
        .register_file(&target, FileOptions::default())
        .await
        .unwrap();
    assert_eq!(registry.file_from_path(&target).await.unwrap().id, file.id);

    // Re-registering without force returns the live record.
    let again = registry
        .register_file(&target, FileOptions::default())
        .await
        .unwrap();
    assert_eq!(again.id, file.id);

    // Deprecating the only record makes the path unresolvable again.
    registry.mark_deprecated(&file.full_id(), false).await.unwrap();
    let err = registry.file_from_path(&target).await;
    assert!(matches!(err, Err(RmsError::NotRegistered(_))));
}

#[tokio::test]
async fn test_update_rewrites_columns_and_fires_modify() {
    let (_dir, registry) = scratch_registry().await;
    let add = registry
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    let events = registry.subscribe();

    let updated = registry
        .update(&add.full_id(), &[("description", "adds two numbers".into())])
        .await
        .unwrap();
    assert_eq!(updated.as_pipe().unwrap().description, "adds two numbers");

    let batch = events.recv().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].kind, EventKind::Modify);
    assert_eq!(batch[0].full_id, add.full_id());

    // Unknown columns are rejected before touching the catalog.
    let err = registry.update(&add.full_id(), &[("pid", "nope".into())]).await;
    assert!(matches!(err, Err(RmsError::InvalidInput(_))));
}

#[tokio::test]
async fn test_mark_deprecated_propagates_downstream() {
    let (_dir, registry) = scratch_registry().await;
    let load = registry
        .register_pipe(load_func(), PipeOptions::default())
        .await
        .unwrap();
    let transform = registry
        .register_pipe(sum_list_func(), PipeOptions::default())
        .await
        .unwrap();
    let r1 = registry
        .run(&load.id, vec![json_arg(json!(3))], no_kwargs(), RunAnnotations::default())
        .await
        .unwrap();
    let r2 = registry
        .run(
            &transform.id,
            vec![ArgValue::ResourceRef(r1.id.clone())],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();
    let t1 = r1.task_id.clone().unwrap();
    let t2 = r2.task_id.clone().unwrap();

    registry.mark_deprecated(&FullId::Task(t1.clone()), true).await.unwrap();

    for full_id in [
        FullId::Task(t1),
        FullId::Resource(r1.id.clone()),
        FullId::Task(t2),
        FullId::Resource(r2.id.clone()),
    ] {
        let entry = registry.get(&full_id, false).await.unwrap();
        assert!(entry.is_deprecated(), "{full_id} should carry the marker");
    }
    // Pipes are untouched by propagation.
    assert!(!registry.get(&load.full_id(), false).await.unwrap().is_deprecated());
}

#[tokio::test]
async fn test_run_emits_one_insert_batch_after_commit() {
    let (_dir, registry) = scratch_registry().await;
    let add = registry
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    let events = registry.subscribe();

    let resource = registry
        .run(
            &add.id,
            vec![json_arg(json!(2)), json_arg(json!(3))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    let batch = events.recv().unwrap();
    let kinds: Vec<EventKind> = batch.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Insert, EventKind::Insert]);
    assert_eq!(batch[0].full_id, FullId::Task(resource.task_id.clone().unwrap()));
    assert_eq!(batch[1].full_id, FullId::Resource(resource.id.clone()));

    // The dedup hit emits nothing.
    registry
        .run(
            &add.id,
            vec![json_arg(json!(2)), json_arg(json!(3))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_forced_file_registration_orders_modify_before_insert() {
    let (dir, registry) = scratch_registry().await;
    let target = dir.path().join("f.txt");
    std::fs::write(&target, "one").unwrap();
    let first = registry
        .register_file(&target, FileOptions::default())
        .await
        .unwrap();

    let events = registry.subscribe();
    std::fs::write(&target, "two").unwrap();
    let second = registry
        .register_file(&target, FileOptions { force: true, ..FileOptions::default() })
        .await
        .unwrap();

    let batch = events.recv().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].kind, EventKind::Modify);
    assert_eq!(batch[0].full_id, first.full_id());
    assert_eq!(batch[1].kind, EventKind::Insert);
    assert_eq!(batch[1].full_id, second.full_id());
}

#[tokio::test]
async fn test_failed_delete_leaves_catalog_intact() {
    let (_dir, registry) = scratch_registry().await;
    let load = registry
        .register_pipe(load_func(), PipeOptions::default())
        .await
        .unwrap();
    let r1 = registry
        .run(&load.id, vec![json_arg(json!(2))], no_kwargs(), RunAnnotations::default())
        .await
        .unwrap();

    // The pipe still has a recorded task, so it cannot go alone.
    let err = registry.delete(&[load.full_id()]).await;
    assert!(matches!(err, Err(RmsError::DependencyBreak(_))));

    // Everything is still resolvable, from cache and from a refetch.
    assert!(registry.has(&load.full_id()).await);
    let refetched = registry.get(&FullId::Resource(r1.id.clone()), true).await.unwrap();
    assert_eq!(refetched.full_id(), FullId::Resource(r1.id.clone()));
}

#[tokio::test]
async fn test_database_id_is_stable_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let config = rms::infrastructure::config::RmsConfig::rooted_at(dir.path());
    let first = rms::application::registry::Registry::open(config.clone())
        .await
        .unwrap();
    let id = first.database_id().await.unwrap();
    drop(first);

    let second = rms::application::registry::Registry::open(config).await.unwrap();
    assert_eq!(second.database_id().await.unwrap(), id);
}
