//! # End-to-End Provenance Tests
//!
//! Drives the registry through the full life of a small pipeline:
//! deduplicated execution, output-file bookkeeping with overwrite
//! markers, lineage traversal over the recorded graph, and
//! dependency-safe deletion.

mod common;

use common::*;

use rms::application::registry::{FileOptions, PipeOptions, Traversal};
use rms_domain::{ArgValue, FullId, RmsEntry, RmsError, RunAnnotations};
use serde_json::json;

#[tokio::test]
async fn test_identical_runs_insert_one_task() {
    let (_dir, registry) = scratch_registry().await;
    let add = registry
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();

    let first = registry
        .run(
            &add.id,
            vec![json_arg(json!(2)), json_arg(json!(3))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();
    assert_eq!(first.peek_content(), Some(&json!(5)));

    let second = registry
        .run(
            &add.id,
            vec![json_arg(json!(2)), json_arg(json!(3))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();
    assert_eq!(second.id, first.id);

    let tasks = registry.find_tasks_by_pipe(&[add.id.clone()]).await.unwrap();
    assert_eq!(tasks.len(), 1);

    // Different arguments execute again.
    let third = registry
        .run(
            &add.id,
            vec![json_arg(json!(2)), json_arg(json!(4))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();
    assert_ne!(third.id, first.id);
    assert_eq!(third.peek_content(), Some(&json!(6)));
}

#[tokio::test]
async fn test_scalar_dedup_uses_canonical_json() {
    let (_dir, registry) = scratch_registry().await;
    let add = registry
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();

    let int_run = registry
        .run(
            &add.id,
            vec![json_arg(json!(1)), json_arg(json!(1))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    // 1.0 is a different canonical scalar than 1, so no dedup.
    let float_run = registry
        .run(
            &add.id,
            vec![json_arg(json!(1.0)), json_arg(json!(1))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await;
    // The body adds as integers; a float argument fails inside the pipe,
    // which proves execution was attempted rather than deduplicated.
    assert!(float_run.is_err());
    assert_eq!(int_run.peek_content(), Some(&json!(2)));
}

#[tokio::test]
async fn test_output_files_recorded_and_overwritten() {
    let (dir, registry) = scratch_registry().await;
    let emit = registry
        .register_pipe(emit_file_func(), emit_file_options())
        .await
        .unwrap();
    let target = dir.path().join("out.txt");
    let target_arg = json_arg(json!(target.to_string_lossy()));

    let resource = registry
        .run(
            &emit.id,
            vec![target_arg.clone()],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();
    assert_eq!(resource.peek_content(), Some(&json!(null)));

    let task = registry
        .get_task(resource.task_id.as_ref().unwrap(), false)
        .await
        .unwrap();
    assert_eq!(task.output_files.len(), 1);

    let file = registry.file_from_path(&target).await.unwrap();
    assert_eq!(file.task_id.as_ref(), Some(&task.id));
    assert!(file.md5.is_some());

    // Identical run returns the same entities without executing.
    let again = registry
        .run(&emit.id, vec![target_arg], no_kwargs(), RunAnnotations::default())
        .await
        .unwrap();
    assert_eq!(again.id, resource.id);

    // A forced user registration supersedes the produced file.
    std::fs::write(&target, "changed").unwrap();
    let forced = registry
        .register_file(
            &target,
            FileOptions { force: true, ..FileOptions::default() },
        )
        .await
        .unwrap();
    assert_ne!(forced.id, file.id);

    let old = registry.get_file_resource(&file.id, true).await.unwrap();
    assert!(old.info.contains_key("overwritten"));
    let live = registry.file_from_path(&target).await.unwrap();
    assert_eq!(live.id, forced.id);
}

#[tokio::test]
async fn test_upstream_traversal_covers_the_chain() {
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
        .run(&load.id, vec![json_arg(json!(4))], no_kwargs(), RunAnnotations::default())
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
    assert_eq!(r2.peek_content(), Some(&json!(6)));

    let upstream = registry
        .find_upstream(&[FullId::Resource(r2.id.clone())], &Traversal::unlimited())
        .await
        .unwrap();
    let expected: std::collections::HashSet<FullId> = [
        FullId::Task(r2.task_id.clone().unwrap()),
        FullId::Resource(r1.id.clone()),
        FullId::Task(r1.task_id.clone().unwrap()),
        load.full_id(),
        transform.full_id(),
    ]
    .into_iter()
    .collect();
    assert_eq!(upstream, expected);

    // One step down from r1 reaches the consuming task only.
    let downstream = registry
        .find_downstream(&[FullId::Resource(r1.id.clone())], &Traversal::with_distance(1))
        .await
        .unwrap();
    assert!(downstream.contains(&FullId::Task(r2.task_id.clone().unwrap())));
    assert_eq!(downstream.len(), 1);

    // Distance-1 upstream of the transform task is its direct inputs.
    let direct = registry
        .find_upstream(
            &[FullId::Task(r2.task_id.clone().unwrap())],
            &Traversal::with_distance(1),
        )
        .await
        .unwrap();
    assert_eq!(
        direct,
        [FullId::Resource(r1.id.clone()), transform.full_id()]
            .into_iter()
            .collect()
    );
}

#[tokio::test]
async fn test_delete_refuses_to_orphan_then_removes_cleanly() {
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

    // The producing task alone cannot go: its output would be orphaned.
    let err = registry.delete(&[FullId::Task(t1.clone())]).await;
    assert!(matches!(err, Err(RmsError::DependencyBreak(_))));
    assert!(registry.has(&FullId::Task(t1.clone())).await);
    assert!(registry.has(&FullId::Resource(r1.id.clone())).await);

    // The closed set deletes in one transaction.
    registry
        .delete(&[
            FullId::Task(t1.clone()),
            FullId::Resource(r1.id.clone()),
            FullId::Task(t2.clone()),
            FullId::Resource(r2.id.clone()),
        ])
        .await
        .unwrap();
    assert!(!registry.has(&FullId::Task(t1)).await);
    assert!(!registry.has(&FullId::Resource(r1.id.clone())).await);
    assert!(!registry.has(&FullId::Task(t2)).await);
    assert!(!registry.has(&FullId::Resource(r2.id.clone())).await);

    // The pipes survive and are reusable.
    assert!(registry.has(&load.full_id()).await);
}

#[tokio::test]
async fn test_undeclared_output_path_is_dropped_with_warning() {
    let (dir, registry) = scratch_registry().await;
    // Declares an output it never writes.
    let liar = registry
        .register_pipe(liar_func(), emit_file_options())
        .await
        .unwrap();

    let missing = dir.path().join("never_written.txt");
    let resource = registry
        .run(
            &liar.id,
            vec![json_arg(json!(missing.to_string_lossy()))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();
    let task = registry
        .get_task(resource.task_id.as_ref().unwrap(), false)
        .await
        .unwrap();
    assert!(task.output_files.is_empty());
}

#[tokio::test]
async fn test_script_id_stamped_into_task_info() {
    let (_dir, registry) = scratch_registry().await;
    registry.set_script_id(Some("session-042".to_string()));
    let add = registry
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    let resource = registry
        .run(
            &add.id,
            vec![json_arg(json!(1)), json_arg(json!(2))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();
    let task = registry
        .get_task(resource.task_id.as_ref().unwrap(), false)
        .await
        .unwrap();
    assert_eq!(task.info.get("scriptid").map(String::as_str), Some("session-042"));
}

#[tokio::test]
async fn test_overwritten_input_is_rejected() {
    let (dir, registry) = scratch_registry().await;
    let target = dir.path().join("input.txt");
    std::fs::write(&target, "v1").unwrap();
    let first = registry
        .register_file(&target, FileOptions::default())
        .await
        .unwrap();
    std::fs::write(&target, "v2").unwrap();
    registry
        .register_file(&target, FileOptions { force: true, ..FileOptions::default() })
        .await
        .unwrap();

    let reader = registry
        .register_pipe(read_len_func(), PipeOptions::default())
        .await
        .unwrap();

    let err = registry
        .run(
            &reader.id,
            vec![ArgValue::FileRef(first.id.clone())],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await;
    assert!(matches!(err, Err(RmsError::InvalidInput(_))));
}
