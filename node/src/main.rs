use evm_rpc_ingest::{
    cli::IngestConfig,
    logging::init_tracing,
    metrics::{range_len, IngestStats},
    rpc::HttpTransport,
    sync::{ingest, ClientOptions, IngestEvent, IngestOptions, IngestProgress, RpcIngest},
};
use eyre::{bail, eyre, Result, WrapErr};
use futures::StreamExt;
use std::{
    io::{BufWriter, Write},
    sync::Arc,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = IngestConfig::from_args();
    let guards = init_tracing(config.verbosity, config.log_json.as_deref());
    let outcome = run(&config).await;
    guards.finish()?;
    outcome
}

async fn run(config: &IngestConfig) -> Result<()> {
    if let Some(to) = config.to_block {
        if to < config.from_block {
            bail!("--to-block {to} is below --from-block {}", config.from_block);
        }
    }

    let transport = Arc::new(
        HttpTransport::new(config.transport_config()).wrap_err("failed to build rpc client")?,
    );
    let mut options = ClientOptions {
        chain_id: config.chain_id,
        finality_confirmation: config.finality_confirmation,
        retry_attempts: Some(config.rpc_retry_attempts),
    };
    if options.chain_id.is_none() {
        let lookup = RpcIngest::new(transport.clone(), options);
        let chain_id = lookup.get_chain_id().await.wrap_err("failed to query chain id")?;
        options.chain_id = Some(chain_id);
    }
    let client = RpcIngest::new(transport, options);

    info!(
        rpc_url = %config.rpc_url,
        chain_id = ?options.chain_id,
        policy = ?client.policy(),
        from_block = config.from_block,
        to_block = ?config.to_block,
        planned_blocks = ?config.to_block.map(|to| range_len(&(config.from_block..=to))),
        "starting evm rpc ingest"
    );

    let stats = IngestStats::new();
    let options = IngestOptions {
        request: config.data_request(),
        from: config.from_block,
        to: config.to_block,
        stride_size: config.stride_size,
        stride_concurrency: config.stride_concurrency,
        expected_parent_hash: config.expected_parent_hash,
    };
    let mut progress = IngestProgress::new(&options);
    let mut stalled_passes = 0u32;
    let mut out = BufWriter::new(std::io::stdout());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = 'ingest: loop {
        let reached = progress.last();
        let mut events = std::pin::pin!(ingest(client.clone(), progress.resume(&options)));
        let pass = loop {
            tokio::select! {
                event = events.next() => match event {
                    None => break Ok(()),
                    Some(Ok(IngestEvent::Batch(batch))) => {
                        for block in &batch.blocks {
                            serde_json::to_writer(&mut out, block)?;
                            out.write_all(b"\n")?;
                        }
                        out.flush()?;
                        stats.record_batch(&batch);
                        progress.record(&batch);
                        info!(
                            first = batch.blocks.first().map(|b| b.number),
                            last = batch.blocks.last().map(|b| b.number),
                            finalized = batch.finalized_head.number,
                            "batch written"
                        );
                    }
                    Some(Ok(IngestEvent::Fork(fork))) => {
                        warn!(fork = %serde_json::to_string(&fork)?, "fork detected, stopping");
                        break Err(eyre!("fork at block {}", fork.conflicting_block));
                    }
                    Some(Err(err)) => {
                        break Err(err).wrap_err_with(|| {
                            format!("ingest failed at block {}", progress.next_block())
                        })
                    }
                },
                signal = &mut shutdown => {
                    warn!("shutdown signal received");
                    break 'ingest signal.map_err(eyre::Report::from);
                }
            }
        };
        if pass.is_err() {
            break pass;
        }
        let Some(to) = config.to_block else {
            break Ok(());
        };
        if progress.is_complete() {
            break Ok(());
        }

        // The pass ended short of a closed range: the node is lagging or
        // served a block it could not back up.
        stalled_passes = if progress.last() == reached { stalled_passes + 1 } else { 0 };
        if stalled_passes > config.resume_attempts {
            break Err(eyre!(
                "ingest stopped at block {} before --to-block {to}",
                progress.next_block()
            ));
        }
        warn!(
            next = progress.next_block(),
            to,
            stalled_passes,
            "range incomplete, resuming"
        );
        tokio::select! {
            _ = tokio::time::sleep(config.resume_delay()) => {}
            signal = &mut shutdown => {
                warn!("shutdown signal received");
                break signal.map_err(eyre::Report::from);
            }
        }
    };
    out.flush()?;

    info!(
        blocks = stats.blocks(),
        batches = stats.batches(),
        elapsed_secs = stats.elapsed().as_secs_f64(),
        blocks_per_sec = stats.blocks_per_sec().unwrap_or_default(),
        "ingest finished"
    );
    result
}
