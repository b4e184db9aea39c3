//! # Content Lifecycle Tests
//!
//! Volatile one-shot reads, content-store dumps, and regeneration of
//! missing content through upstream lineage re-execution - including the
//! cross-process case, simulated with a second registry over the same
//! catalog.

mod common;

use common::*;

use rms::application::registry::{PipeOptions, Registry};
use rms::infrastructure::config::RmsConfig;
use rms_domain::{ArgValue, RmsError, RunAnnotations};
use serde_json::json;

#[tokio::test]
async fn test_volatile_content_reads_once() {
    let (_dir, registry) = scratch_registry().await;
    let add = registry
        .register_pipe(
            add_func(),
            PipeOptions { return_volatile: true, ..PipeOptions::default() },
        )
        .await
        .unwrap();
    let resource = registry
        .run(
            &add.id,
            vec![json_arg(json!(20)), json_arg(json!(22))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    let first = registry.resource_content(&resource.id, true).await.unwrap();
    assert_eq!(first, json!(42));
    let second = registry.resource_content(&resource.id, true).await;
    assert!(matches!(second, Err(RmsError::ResourceNotReady(_))));
}

#[tokio::test]
async fn test_dumped_volatile_content_reads_from_disk() {
    let (_dir, registry) = scratch_registry().await;
    let add = registry
        .register_pipe(
            add_func(),
            PipeOptions { return_volatile: true, ..PipeOptions::default() },
        )
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

    // The dump consumes the in-memory copy; the disk copy stays
    // readable any number of times.
    registry.save_resource_content(&resource.id).await.unwrap();
    assert_eq!(registry.resource_content(&resource.id, false).await.unwrap(), json!(3));
    assert_eq!(registry.resource_content(&resource.id, false).await.unwrap(), json!(3));
}

/// Opens two registries over one durable catalog, as two processes
/// would.
async fn paired_registries() -> (tempfile::TempDir, Registry, Registry) {
    let dir = tempfile::tempdir().unwrap();
    let config = RmsConfig::rooted_at(dir.path());
    let first = Registry::open(config.clone()).await.unwrap();
    let second = Registry::open(config).await.unwrap();
    (dir, first, second)
}

#[tokio::test]
async fn test_auto_fetch_recomputes_content_in_fresh_process() {
    let (_dir, writer, reader) = paired_registries().await;
    let add = writer
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    let resource = writer
        .run(
            &add.id,
            vec![json_arg(json!(2)), json_arg(json!(3))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    // The reader never saw the run; re-registering the same definition
    // binds the callable onto the recorded pipe.
    let same = reader
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    assert_eq!(same.id, add.id);

    let value = reader.resource_content(&resource.id, true).await.unwrap();
    assert_eq!(value, json!(5));
}

#[tokio::test]
async fn test_auto_fetch_recurses_through_lineage() {
    let (_dir, writer, reader) = paired_registries().await;
    let load = writer
        .register_pipe(load_func(), PipeOptions::default())
        .await
        .unwrap();
    let transform = writer
        .register_pipe(sum_list_func(), PipeOptions::default())
        .await
        .unwrap();
    let r1 = writer
        .run(&load.id, vec![json_arg(json!(5))], no_kwargs(), RunAnnotations::default())
        .await
        .unwrap();
    let r2 = writer
        .run(
            &transform.id,
            vec![ArgValue::ResourceRef(r1.id.clone())],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    reader.register_pipe(load_func(), PipeOptions::default()).await.unwrap();
    reader
        .register_pipe(sum_list_func(), PipeOptions::default())
        .await
        .unwrap();

    // Regenerating r2 forces regenerating r1 first.
    assert_eq!(
        reader.resource_content(&r2.id, true).await.unwrap(),
        json!(10)
    );
}

#[tokio::test]
async fn test_auto_fetch_plan_lists_without_running() {
    let (_dir, writer, reader) = paired_registries().await;
    let load = writer
        .register_pipe(load_func(), PipeOptions::default())
        .await
        .unwrap();
    let transform = writer
        .register_pipe(sum_list_func(), PipeOptions::default())
        .await
        .unwrap();
    let r1 = writer
        .run(&load.id, vec![json_arg(json!(5))], no_kwargs(), RunAnnotations::default())
        .await
        .unwrap();
    let r2 = writer
        .run(
            &transform.id,
            vec![ArgValue::ResourceRef(r1.id.clone())],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    let (tasks, resources) = reader
        .auto_fetch_plan(std::slice::from_ref(&r2.id), false)
        .await
        .unwrap();
    assert_eq!(resources.len(), 2);
    assert!(resources.contains(&r1.id));
    assert!(resources.contains(&r2.id));
    assert_eq!(tasks.len(), 2);

    // Nothing actually ran: content is still unavailable without
    // auto-fetch.
    let err = reader.resource_content(&r2.id, false).await;
    assert!(matches!(err, Err(RmsError::ContentMissing(_))));
}

#[tokio::test]
async fn test_content_missing_when_auto_fetch_disabled() {
    let (_dir, writer, reader) = paired_registries().await;
    let add = writer
        .register_pipe(add_func(), PipeOptions::default())
        .await
        .unwrap();
    let resource = writer
        .run(
            &add.id,
            vec![json_arg(json!(1)), json_arg(json!(1))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    let err = reader.resource_content(&resource.id, false).await;
    assert!(matches!(err, Err(RmsError::ContentMissing(_))));
}

#[tokio::test]
async fn test_auto_fetch_refuses_non_deterministic_pipes() {
    let (_dir, writer, reader) = paired_registries().await;
    let add = writer
        .register_pipe(
            add_func(),
            PipeOptions { is_deterministic: false, ..PipeOptions::default() },
        )
        .await
        .unwrap();
    let resource = writer
        .run(
            &add.id,
            vec![json_arg(json!(1)), json_arg(json!(2))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    let err = reader.resource_content(&resource.id, true).await;
    assert!(matches!(err, Err(RmsError::NonDeterministic(_))));

    // Explicit opt-in re-executes anyway.
    reader
        .register_pipe(
            add_func(),
            PipeOptions { is_deterministic: false, ..PipeOptions::default() },
        )
        .await
        .unwrap();
    reader.auto_fetch(std::slice::from_ref(&resource.id), true).await.unwrap();
    assert_eq!(
        reader.resource_content(&resource.id, false).await.unwrap(),
        json!(3)
    );
}

#[tokio::test]
async fn test_auto_fetch_refuses_tasks_with_output_files() {
    let (dir, writer, reader) = paired_registries().await;
    let emit = writer
        .register_pipe(emit_file_func(), emit_file_options())
        .await
        .unwrap();
    let target = dir.path().join("artifact.txt");
    let resource = writer
        .run(
            &emit.id,
            vec![json_arg(json!(target.to_string_lossy()))],
            no_kwargs(),
            RunAnnotations::default(),
        )
        .await
        .unwrap();

    reader
        .register_pipe(emit_file_func(), emit_file_options())
        .await
        .unwrap();
    let err = reader.resource_content(&resource.id, true).await;
    assert!(matches!(err, Err(RmsError::WouldOverwriteFile(_))));
}
