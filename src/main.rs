//! line-echo: a TCP text-echo server
//!
//! Every chunk a client sends is echoed back prefixed with `server says: `.
//!
//! Features:
//! - One task per connection, admission never waits on a session
//! - Idle clients are timed out (15 seconds by default)
//! - `quit` closes the connection
//! - Ctrl-C or an optional run duration stops the accept loop and every
//!   session
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocol;
mod server;
mod session;
mod shutdown;

use config::Config;
use shutdown::Shutdown;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let workers = config.workers.unwrap_or_else(num_cpus);

    info!(
        listen = %config.listen,
        workers,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        buffer_size = config.buffer_size,
        run_for_secs = config.run_for.map(|d| d.as_secs()),
        "Starting line-echo server"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = config.listen.parse()?;
    let listener = server::bind(addr)?;
    info!(address = %listener.local_addr()?, "Server listening");

    let shutdown = Shutdown::new();

    let trigger = shutdown.clone();
    let run_for = config.run_for;
    tokio::spawn(async move {
        shutdown::wait_for_trigger(run_for).await;
        info!("Closing server");
        trigger.trigger();
    });

    server::serve(&listener, shutdown, config.session()).await;
    drop(listener);

    Ok(())
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
