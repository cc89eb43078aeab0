mod common;

use serde_json::{Value, json};

use checkworker::protocol::FrameStream;
use checkworker::worker::{DONE_TOKEN, IMPORT_ERROR, UNKNOWN_BATCH_SERVICE, UNKNOWN_SERVICE};
use common::spawn_worker;

fn recv(controller: &FrameStream) -> (String, String, Value) {
    controller.recv_reply().expect("recv").expect("frame")
}

/// Collect streamed batch replies until the `__DONE__` result sentinel.
fn drain_batch(controller: &FrameStream, service: &str) -> Vec<(String, Value)> {
    let mut results = Vec::new();
    loop {
        let (svc, job, data) = recv(controller);
        assert_eq!(svc, service);
        if data == json!(DONE_TOKEN) {
            return results;
        }
        results.push((job, data));
    }
}

#[test]
fn job_without_init_is_unknown_service() {
    let (controller, handle) = spawn_worker(Vec::new());
    controller
        .send_job("foo", "anything.py", &json!(["source"]))
        .expect("send");

    let (service, job, data) = recv(&controller);
    assert_eq!(service, "foo");
    assert_eq!(job, "anything.py");
    assert_eq!(data, json!(UNKNOWN_SERVICE));

    drop(controller);
    handle.join().expect("join").expect("worker");
}

#[test]
fn init_with_unknown_module_reports_import_error() {
    let (controller, handle) = spawn_worker(Vec::new());
    controller
        .send_job("INIT", "python3_check", &json!(["/nonexistent", "python3_check"]))
        .expect("send");

    let (service, job, data) = recv(&controller);
    assert_eq!(service, "INIT");
    assert_eq!(job, "python3_check");
    assert_eq!(data, json!(IMPORT_ERROR));

    drop(controller);
    handle.join().expect("join").expect("worker");
}

#[test]
fn init_toml_then_bad_source_yields_error_tuple() {
    let (controller, handle) = spawn_worker(Vec::new());
    controller
        .send_job("INIT", "toml_check", &json!(["", "toml_check"]))
        .expect("send");
    let (_, _, data) = recv(&controller);
    assert_eq!(data, json!("ok"));

    controller
        .send_job("toml", "bad.toml", &json!(["not = valid = toml"]))
        .expect("send");
    let (service, job, data) = recv(&controller);
    assert_eq!(service, "toml");
    assert_eq!(job, "bad.toml");

    let error = &data[0]["error"];
    assert_eq!(error[0], "bad.toml");
    assert_eq!(error[1], 1);
    assert!(error[2].as_u64().is_some());
    assert_eq!(error[3], "not = valid = toml");
    assert!(error[4].as_str().is_some_and(|msg| !msg.is_empty()));

    drop(controller);
    handle.join().expect("join").expect("worker");
}

#[test]
fn batch_without_init_is_unknown_batch_service() {
    let (controller, handle) = spawn_worker(Vec::new());
    controller
        .send_job("batch_foo", "batch", &json!([]))
        .expect("send");

    let (service, _, data) = recv(&controller);
    assert_eq!(service, "batch_foo");
    assert_eq!(data, json!(UNKNOWN_BATCH_SERVICE));

    drop(controller);
    handle.join().expect("join").expect("worker");
}

#[test]
fn empty_batch_yields_done_immediately() {
    let (controller, handle) = spawn_worker(Vec::new());
    controller
        .send_job("INIT", "toml_check", &json!(["", "toml_check"]))
        .expect("send");
    let _ = recv(&controller);

    controller
        .send_job("batch_toml", "batch", &json!([]))
        .expect("send");
    let results = drain_batch(&controller, "batch_toml");
    assert!(results.is_empty());

    drop(controller);
    handle.join().expect("join").expect("worker");
}

#[test]
fn batch_delivers_every_file_exactly_once() {
    let (controller, handle) = spawn_worker(Vec::new());
    controller
        .send_job("INIT", "json_check", &json!(["", "json_check"]))
        .expect("send");
    let _ = recv(&controller);

    let jobs: Vec<Value> = (0..9)
        .map(|i| {
            let source = if i % 3 == 0 { "{\"broken\": }" } else { "{\"ok\": 1}" };
            json!([format!("file{i}.json"), [source]])
        })
        .collect();
    controller
        .send_job("batch_json", "batch", &Value::Array(jobs))
        .expect("send");

    let results = drain_batch(&controller, "batch_json");
    assert_eq!(results.len(), 9);

    let mut seen: Vec<&str> = results.iter().map(|(job, _)| job.as_str()).collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 9);

    for (job, data) in &results {
        let index: usize = job
            .trim_start_matches("file")
            .trim_end_matches(".json")
            .parse()
            .expect("index");
        if index % 3 == 0 {
            assert!(data[0]["error"].is_array(), "expected error for {job}");
        } else {
            assert_eq!(*data, json!([{}]), "expected clean result for {job}");
        }
    }

    drop(controller);
    handle.join().expect("join").expect("worker");
}

#[test]
fn file_named_like_done_sentinel_does_not_end_batch() {
    let (controller, handle) = spawn_worker(Vec::new());
    controller
        .send_job("INIT", "json_check", &json!(["", "json_check"]))
        .expect("send");
    let _ = recv(&controller);

    let jobs = json!([
        ["__DONE__", ["{\"ok\": 1}"]],
        ["after.json", ["{\"ok\": 2}"]],
    ]);
    controller
        .send_job("batch_json", "batch-7", &jobs)
        .expect("send");

    let mut seen = Vec::new();
    loop {
        let (service, job, data) = recv(&controller);
        assert_eq!(service, "batch_json");
        if data == json!(DONE_TOKEN) {
            // The sentinel rides in the data slot; the jobId slot still
            // echoes the batch request's token.
            assert_eq!(job, "batch-7");
            break;
        }
        seen.push(job);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec!["__DONE__", "after.json"]);

    drop(controller);
    handle.join().expect("join").expect("worker");
}

#[test]
fn malformed_job_payload_produces_exception_frame() {
    let (controller, handle) = spawn_worker(Vec::new());
    controller
        .send_job("INIT", "toml_check", &json!(["", "toml_check"]))
        .expect("send");
    let _ = recv(&controller);

    // Argument payload must be an array; a bare string escapes dispatch.
    controller
        .send_job("toml", "x.toml", &json!("not-an-argument-list"))
        .expect("send");

    let (service, job, data) = recv(&controller);
    assert_eq!(service, "EXCEPTION");
    assert_eq!(job, "?");
    assert_eq!(data[0], "MalformedPayload");
    assert!(data[1].as_str().is_some_and(|msg| !msg.is_empty()));

    // The worker tears the connection down after the diagnostic frame.
    assert!(handle.join().expect("join").is_err());
}
