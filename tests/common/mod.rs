use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::{self, JoinHandle};

use checkworker::config::{self, Config};
use checkworker::protocol::{FrameStream, PROTOCOL_IDENT, ProtocolError};
use checkworker::service::CheckerPlugin;
use checkworker::worker::Worker;

/// Default config tightened for fast test turnaround.
pub fn test_config() -> Config {
    let mut cfg = config::load_config(None).expect("default config");
    cfg.recv_timeout_ms = 20;
    cfg.shutdown_grace_ms = 0;
    cfg
}

/// Spawn a worker on its own thread, connected to an in-process controller.
///
/// Returns the controller end of the connection (version identifier already
/// consumed) and the worker's join handle.
pub fn spawn_worker(
    plugins: Vec<Arc<dyn CheckerPlugin>>,
) -> (FrameStream, JoinHandle<Result<(), ProtocolError>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let cfg = test_config();

    let handle = thread::spawn(move || {
        let stream = TcpStream::connect(addr).expect("connect");
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut worker = Worker::from_stream(stream, 2, cfg, shutdown)?;
        for plugin in plugins {
            worker.register_plugin(plugin);
        }
        worker.run()
    });

    let (conn, _) = listener.accept().expect("accept");
    let controller = FrameStream::new(conn, 64 * 1024 * 1024);
    let ident = controller.recv_ident().expect("ident");
    assert_eq!(&ident, PROTOCOL_IDENT);
    (controller, handle)
}
