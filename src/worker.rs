//! # Worker Dispatch Loop
//!
//! Connects back to the controller, announces the protocol version, then
//! runs a single-threaded synchronous loop: receive a job frame, dispatch it
//! to the registered service, reply. Batch jobs fan out through the pool in
//! [`crate::batch`]; everything else runs on this thread. Unknown services
//! and unknown modules are control-plane errors reported as plain string
//! replies; anything escaping dispatch becomes one final `EXCEPTION` frame
//! before the connection is torn down.

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::batch::{BatchJob, CheckFn, run_batch};
use crate::checkers;
use crate::config::Config;
use crate::protocol::{FrameStream, Incoming, ProtocolError};
use crate::service::{BATCH_PREFIX, CheckerPlugin, ServiceRegistry};

/// Service id of the registration control frame.
pub const INIT_SERVICE: &str = "INIT";
/// Service id of the fatal diagnostic frame sent before shutdown.
pub const EXCEPTION_SERVICE: &str = "EXCEPTION";
/// Result sentinel marking a batch as fully drained. Sent in the data slot
/// of the final reply; the jobId slot keeps echoing the batch request's
/// token, so a file literally named `__DONE__` cannot end the drain early.
pub const DONE_TOKEN: &str = "__DONE__";

/// Control-plane reply for an `INIT` naming an unknown module.
pub const IMPORT_ERROR: &str = "Import Error";
/// Control-plane reply for a job naming an unregistered service.
pub const UNKNOWN_SERVICE: &str = "Unknown service.";
/// Control-plane reply for a batch job naming an unregistered batch service.
pub const UNKNOWN_BATCH_SERVICE: &str = "Unknown batch service.";

pub struct Worker {
    frames: FrameStream,
    registry: ServiceRegistry,
    cfg: Config,
    max_workers: usize,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    /// Connect to the controller and perform the version handshake.
    ///
    /// Connection attempts are retried with a fixed delay so the worker can
    /// be spawned slightly before the controller starts listening.
    pub fn connect(
        host: &str,
        port: u16,
        max_workers: usize,
        cfg: Config,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, ProtocolError> {
        let mut attempt = 0u32;
        let stream = loop {
            match TcpStream::connect((host, port)) {
                Ok(stream) => break stream,
                Err(err) => {
                    attempt += 1;
                    if attempt >= cfg.connect_attempts.max(1) {
                        return Err(err.into());
                    }
                    debug!("connect attempt {attempt} failed: {err}");
                    thread::sleep(Duration::from_millis(cfg.connect_retry_ms));
                }
            }
        };
        stream.set_nodelay(true)?;
        Self::from_stream(stream, max_workers, cfg, shutdown)
    }

    /// Wrap an already-connected stream and send the version identifier.
    pub fn from_stream(
        stream: TcpStream,
        max_workers: usize,
        cfg: Config,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, ProtocolError> {
        let frames = FrameStream::new(stream, cfg.max_frame_bytes());
        frames.send_ident()?;
        Ok(Self {
            frames,
            registry: ServiceRegistry::new(),
            cfg,
            max_workers,
            shutdown,
        })
    }

    /// Pre-register a plugin without waiting for an `INIT` frame.
    pub fn register_plugin(&mut self, plugin: Arc<dyn CheckerPlugin>) {
        self.registry.register(plugin);
    }

    /// Run the dispatch loop until the controller disconnects or a
    /// transport-fatal error occurs, then shut the connection down.
    pub fn run(&mut self) -> Result<(), ProtocolError> {
        let outcome = self.dispatch_loop();
        if let Err(err) = &outcome {
            error!("dispatch failed: {err}");
            let data = json!([error_kind(err), err.to_string(), format!("{err:?}")]);
            if let Err(send_err) = self.frames.send_reply(EXCEPTION_SERVICE, "?", &data) {
                warn!("could not deliver exception frame: {send_err}");
            }
        }
        // Give the controller a moment to drain the last frame.
        thread::sleep(Duration::from_millis(self.cfg.shutdown_grace_ms));
        if let Err(err) = self.frames.shutdown() {
            debug!("socket shutdown: {err}");
        }
        outcome
    }

    fn dispatch_loop(&mut self) -> Result<(), ProtocolError> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested; closing connection");
                return Ok(());
            }
            match self.frames.recv_message()? {
                Incoming::Eof => {
                    debug!("controller closed the connection");
                    return Ok(());
                }
                Incoming::Cancel => {
                    // Cancellation for a batch that already finished.
                    debug!("stale cancellation ignored");
                }
                Incoming::Job { service, job, data } => self.dispatch(&service, &job, data)?,
            }
        }
    }

    fn dispatch(&mut self, service: &str, job: &str, data: Value) -> Result<(), ProtocolError> {
        if service == INIT_SERVICE {
            self.handle_init(job, data)
        } else if service.starts_with(BATCH_PREFIX) {
            self.handle_batch(service, job, data)
        } else {
            self.handle_single(service, job, data)
        }
    }

    /// Register the checker module named by the job token.
    ///
    /// The payload is `[searchPath, moduleName]` for wire compatibility; the
    /// search path is meaningless with a compiled-in plugin table and is
    /// ignored. An unknown module is reported, not raised.
    fn handle_init(&mut self, job: &str, data: Value) -> Result<(), ProtocolError> {
        let args: Vec<Value> = serde_json::from_value(data)?;
        let module = args
            .get(1)
            .and_then(Value::as_str)
            .unwrap_or(job)
            .to_string();
        let reply = match checkers::load_module(&module) {
            Some(plugin) => {
                info!(
                    "service registered service={} module={}",
                    plugin.service_name(),
                    module
                );
                self.registry.register(plugin);
                "ok"
            }
            None => {
                warn!("unknown checker module module={module}");
                IMPORT_ERROR
            }
        };
        self.frames.send_reply(INIT_SERVICE, job, &json!(reply))
    }

    fn handle_single(&mut self, service: &str, job: &str, data: Value) -> Result<(), ProtocolError> {
        let Some(plugin) = self.registry.single(service) else {
            warn!("job for unregistered service service={service}");
            return self.frames.send_reply(service, job, &json!(UNKNOWN_SERVICE));
        };
        let args: Vec<Value> = serde_json::from_value(data)?;
        let result = plugin.check(job, &args);
        self.frames.send_reply(service, job, &result)
    }

    /// Fan a batch out through the pool, streaming per-file replies as they
    /// complete and closing with the `__DONE__` sentinel.
    fn handle_batch(&mut self, service: &str, job: &str, data: Value) -> Result<(), ProtocolError> {
        let Some(plugin) = self.registry.batch(service) else {
            warn!("batch job for unregistered service service={service}");
            return self
                .frames
                .send_reply(service, job, &json!(UNKNOWN_BATCH_SERVICE));
        };
        let plugin = Arc::clone(plugin);
        let jobs: Vec<(String, Vec<Value>)> = serde_json::from_value(data)?;
        let jobs: Vec<BatchJob> = jobs
            .into_iter()
            .map(|(filename, args)| BatchJob { filename, args })
            .collect();
        debug!("batch start service={service} jobs={}", jobs.len());

        let check: CheckFn = Arc::new(move |filename, args| plugin.check(filename, args));
        let frames = &self.frames;
        let shutdown = &self.shutdown;
        let send =
            |filename: &str, result: &Value| frames.send_reply(service, filename, result);
        let cancelled =
            || shutdown.load(Ordering::Relaxed) || frames.poll_cancel().unwrap_or(true);

        run_batch(
            jobs,
            check,
            &send,
            &cancelled,
            self.max_workers,
            self.cfg.pipeline_depth,
            Duration::from_millis(self.cfg.recv_timeout_ms),
        )?;
        self.frames.send_reply(service, job, &json!(DONE_TOKEN))
    }
}

fn error_kind(err: &ProtocolError) -> &'static str {
    match err {
        ProtocolError::Io(_) => "IoError",
        ProtocolError::ChecksumMismatch { .. } => "ChecksumMismatch",
        ProtocolError::Truncated { .. } => "TruncatedFrame",
        ProtocolError::Oversize(_) => "OversizeFrame",
        ProtocolError::UnknownTag(_) => "UnknownTag",
        ProtocolError::Payload(_) => "MalformedPayload",
    }
}
