use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::info;

use checkworker::{cli, config, logging, worker::Worker};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let cfg = config::load_config(cli_opts.config_path.as_deref())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))?;
    }

    info!(
        "connecting host={} port={} max_workers={} recv_timeout_ms={}",
        cli_opts.host, cli_opts.port, cli_opts.max_workers, cfg.recv_timeout_ms
    );

    let mut worker = Worker::connect(
        &cli_opts.host,
        cli_opts.port,
        cli_opts.max_workers,
        cfg,
        shutdown,
    )?;
    worker.run()?;

    info!("checkworker finished");
    Ok(())
}
