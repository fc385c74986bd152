use std::sync::Arc;

use clap::Parser;
use tokio::{
    signal::unix::{signal, SignalKind},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use bendkafka_ingestor::{
    BatchIngestor, BendIngestError, ConsumeWorker, DatabendClient, DatabendIngestor, IngestProps,
    KafkaSource, MockSource,
};

mod cli;

type WorkerSet = JoinSet<bendkafka_ingestor::Result<()>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Arc::new(cli::Cli::parse().into_config()?);
    tracing::info!(
        topic = %config.kafka_topic,
        table = %config.databend_table,
        workers = config.workers,
        batch_size = config.batch_size,
        batch_max_interval = config.batch_max_interval,
        "starting ingest"
    );

    let warehouse = DatabendClient::from_dsn(&config.databend_dsn)
        .map_err(|err| BendIngestError::Config(format!("databend dsn: {err}")))?;
    tracing::debug!(endpoint = %warehouse.endpoint(), "databend client ready");
    let ingestor = Arc::new(DatabendIngestor::new(
        IngestProps::from(config.as_ref()),
        Arc::new(warehouse),
    ));
    if config.raw_to_envelope {
        ingestor.create_target_table().await?;
    }

    let stop = CancellationToken::new();
    stop_on_signal(stop.clone())?;

    let mut workers = WorkerSet::new();
    match config.mock_data {
        Some(count) => {
            tracing::info!(count, "feeding generated records instead of kafka");
            let source = MockSource::generate(&config.kafka_topic, count);
            let worker = ConsumeWorker::new("mock-worker", &config, source, ingestor.clone());
            workers.spawn(worker.run(stop.clone()));
        }
        None => {
            // subscribe everything first so a broker error aborts before any work starts
            let sources = (0..config.workers)
                .map(|i| {
                    let name = format!("worker-{i}");
                    KafkaSource::subscribe(&config, &name).map(|source| (name, source))
                })
                .collect::<bendkafka_ingestor::Result<Vec<_>>>()?;

            for (name, source) in sources {
                let worker = ConsumeWorker::new(name, &config, source, ingestor.clone());
                workers.spawn(worker.run(stop.clone()));
            }
        }
    }

    let mut failed = false;
    while let Some(joined) = workers.join_next().await {
        let err = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(err) => err.to_string(),
        };
        tracing::error!("worker exited with error, stopping the rest: {err}");
        failed = true;
        stop.cancel();
    }

    let totals = ingestor.stats().totals();
    tracing::info!(rows = totals.rows, bytes = totals.bytes, "ingest stopped");

    if failed {
        anyhow::bail!("one or more workers failed");
    }
    Ok(())
}

/// Registers the shutdown signals up front so a registration failure aborts startup
fn stop_on_signal(stop: CancellationToken) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
            _ = hangup.recv() => {}
            _ = quit.recv() => {}
        }

        tracing::info!("shutdown requested, finishing in-flight flushes");
        stop.cancel();
    });
    Ok(())
}
