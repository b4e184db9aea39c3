//! Shared fixtures for the integration tests: scratch registries and a
//! few well-known pipes.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use rms::application::registry::{PipeOptions, Registry};
use rms_domain::value_objects::{OutputFunc, RunValue};
use rms_domain::{ArgValue, PipeFunc, Signature};

/// A registry over an in-memory catalog with payloads in a temp dir.
pub async fn scratch_registry() -> (tempfile::TempDir, Registry) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::in_memory(&dir.path().join("payloads")).await.unwrap();
    (dir, registry)
}

/// `calc.add(a, b) -> a + b`
pub fn add_func() -> PipeFunc {
    PipeFunc::new(
        "calc",
        "add",
        Signature::of_positional(["a", "b"]),
        Arc::new(|args: &[RunValue], _: &BTreeMap<String, RunValue>| {
            Ok(json!(args[0].as_i64()? + args[1].as_i64()?))
        }),
    )
}

/// `source.load(n) -> [0, 1, ..., n-1]`
pub fn load_func() -> PipeFunc {
    PipeFunc::new(
        "source",
        "load",
        Signature::of_positional(["n"]),
        Arc::new(|args: &[RunValue], _: &BTreeMap<String, RunValue>| {
            let n = args[0].as_i64()?;
            Ok(Value::from((0..n).collect::<Vec<i64>>()))
        }),
    )
}

/// `calc.sum_list(values) -> sum(values)`
pub fn sum_list_func() -> PipeFunc {
    PipeFunc::new(
        "calc",
        "sum_list",
        Signature::of_positional(["values"]),
        Arc::new(|args: &[RunValue], _: &BTreeMap<String, RunValue>| {
            let values = args[0].json()?.as_array().cloned().unwrap_or_default();
            let total: i64 = values.iter().filter_map(Value::as_i64).sum();
            Ok(json!(total))
        }),
    )
}

/// `io.emit_file(path) -> ()`, writing "hello" to `path` and declaring
/// it through an output function.
pub fn emit_file_func() -> PipeFunc {
    PipeFunc::new(
        "io",
        "emit_file",
        Signature::of_positional(["path"]),
        Arc::new(|args: &[RunValue], _: &BTreeMap<String, RunValue>| {
            std::fs::write(args[0].as_str()?, "hello")
                .map_err(|e| rms_domain::RmsError::io_error(e.to_string()))?;
            Ok(Value::Null)
        }),
    )
}

pub fn emit_file_output_func() -> OutputFunc {
    OutputFunc::new(
        "io",
        "emit_file_outputs",
        Signature::of_positional(["path"]),
        Arc::new(|args: &[RunValue], _: &BTreeMap<String, RunValue>| {
            Ok(vec![PathBuf::from(args[0].as_str()?)])
        }),
    )
}

pub fn emit_file_options() -> PipeOptions {
    PipeOptions {
        output_func: Some(emit_file_output_func()),
        ..PipeOptions::default()
    }
}

/// `io.liar(path) -> ()`, declaring an output it never writes.
pub fn liar_func() -> PipeFunc {
    PipeFunc::new(
        "io",
        "liar",
        Signature::of_positional(["path"]),
        Arc::new(|_: &[RunValue], _: &BTreeMap<String, RunValue>| Ok(Value::Null)),
    )
}

/// `io.read_len(f) -> len(read(f))`
pub fn read_len_func() -> PipeFunc {
    PipeFunc::new(
        "io",
        "read_len",
        Signature::of_positional(["f"]),
        Arc::new(|args: &[RunValue], _: &BTreeMap<String, RunValue>| {
            let text = std::fs::read_to_string(args[0].path()?)
                .map_err(|e| rms_domain::RmsError::io_error(e.to_string()))?;
            Ok(json!(text.len()))
        }),
    )
}

pub fn json_arg(value: Value) -> ArgValue {
    ArgValue::Json(value)
}

pub fn no_kwargs() -> BTreeMap<String, ArgValue> {
    BTreeMap::new()
}
