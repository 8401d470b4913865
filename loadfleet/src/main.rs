use clap::Parser;
use loadfleet::config::Config;
use loadfleet::pool::{PoolOptions, WorkerPool};
use loadfleet::report::LogSink;
use loadfleet::server;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let config = Config::parse();
    config.trace_init()?;
    let spec = config.load_spec()?;

    let options = PoolOptions {
        ping_period: config.ping_period,
        ..PoolOptions::default()
    };
    let (pool, handle) = WorkerPool::new(&config.slaves, options, Box::new(LogSink))?;

    let (done_tx, done_rx) = oneshot::channel();
    let stay_alive = config.stay_alive;
    let server = axum::Server::try_bind(&config.listen)?
        .serve(server::router(handle.clone()).into_make_service())
        .with_graceful_shutdown(async move {
            if stay_alive {
                std::future::pending::<()>().await
            } else {
                let _ = done_rx.await;
            }
        });

    tracing::info!(
        listen = %config.listen,
        slaves = config.slaves.len(),
        test = %spec.name,
        "starting distributed test"
    );

    let pool_task = tokio::spawn(pool.start(
        spec,
        config.advertise_addr(),
        Box::new(move |summary| {
            match serde_json::to_string_pretty(&summary) {
                Ok(rendered) => println!("{rendered}"),
                Err(error) => tracing::error!(%error, "failed to render the final report"),
            }
            let _ = done_tx.send(());
        }),
    ));

    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; asking slaves to stop");
            handle.stop().await;
        }
    }
    pool_task.abort();
    Ok(())
}
