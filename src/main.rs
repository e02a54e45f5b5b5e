//! `exrframe` binary: runs the conversion service, converts single files,
//! and hosts the isolated decoder.

mod cli;

use std::{error::Error, process::ExitCode, time::Duration};

use clap::Parser;
use cli::{Cli, Command, ConvertArgs, ServeArgs, ToneArgs};
use exrframe::{
    config::{DataDir, ServiceConfig},
    decode::{SubprocessDecoder, worker},
    pipeline::Pipeline,
    protocol::UNLIMITED_MESSAGE_SIZE,
    server::ConversionServer,
    tonemap::ToneMapParams,
    validate::validate_path,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync>;

fn main() -> ExitCode {
    match Cli::parse().command {
        // The decode worker's stdout carries the decoded planes, so it runs
        // without a subscriber or runtime.
        Command::DecodeWorker { path } => worker::run(&path),
        Command::Serve(args) => run_async(serve(args)),
        Command::Convert(args) => run_async(convert(args)),
    }
}

fn run_async(task: impl Future<Output = Result<(), BoxError>>) -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(task) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "exrframe failed");
            ExitCode::FAILURE
        }
    }
}

fn tone_params(args: &ToneArgs) -> ToneMapParams {
    ToneMapParams {
        exposure_ev: args.exposure,
        key: args.key,
        srgb: !args.linear,
    }
}

fn service_config(args: &ServeArgs) -> ServiceConfig {
    ServiceConfig {
        host: args.host,
        port: args.port,
        data_dir: args.data_dir.clone(),
        max_sessions: args.max_sessions,
        max_message_size: args.max_message_size.unwrap_or(UNLIMITED_MESSAGE_SIZE),
        chunk_size: args.chunk_size,
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        decode_timeout: Duration::from_secs(args.decode_timeout_secs),
        tone_map: tone_params(&args.tone),
    }
}

async fn serve(args: ServeArgs) -> Result<(), BoxError> {
    let config = service_config(&args);
    install_metrics(&args)?;

    let decoder = SubprocessDecoder::current_exe()?.timeout(config.decode_timeout);
    let pipeline = Pipeline::new(decoder).with_params(config.tone_map);
    let mut server = ConversionServer::from_config(pipeline, &config);
    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }

    info!(
        addr = %config.socket_addr(),
        data_dir = %config.data_dir.display(),
        max_sessions = config.max_sessions,
        "starting exr-extractor"
    );
    server.bind(config.socket_addr())?.run().await?;
    info!("exr-extractor stopped");
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(args: &ServeArgs) -> Result<(), BoxError> {
    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "prometheus exporter listening");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(args: &ServeArgs) -> Result<(), BoxError> {
    if args.metrics_addr.is_some() {
        tracing::warn!("built without the metrics feature; --metrics-addr ignored");
    }
    Ok(())
}

async fn convert(args: ConvertArgs) -> Result<(), BoxError> {
    let input = DataDir::new(&args.data_dir).resolve(&args.input)?;
    validate_path(&input)?;
    let bytes = tokio::fs::read(&input).await?;

    let decoder = SubprocessDecoder::current_exe()?
        .timeout(Duration::from_secs(args.decode_timeout_secs));
    let pipeline = Pipeline::new(decoder).with_params(tone_params(&args.tone));
    let converted = pipeline.process(&bytes).await?;

    let output = args
        .output
        .unwrap_or_else(|| input.with_extension("png"));
    tokio::fs::write(&output, &converted.png).await?;
    info!(
        input = %input.display(),
        output = %output.display(),
        width = converted.width,
        height = converted.height,
        bytes = converted.png.len(),
        "conversion written"
    );
    Ok(())
}
