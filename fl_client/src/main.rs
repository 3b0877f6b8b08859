use std::{env, process::ExitCode};

use anyhow::{Context, anyhow};
use log::{error, info, warn};
use tokio::net::TcpStream;

use fl_client::{ClientConfig, Framed, GetModelRound, RoundDriver, RoundOutcome};

const CONFIG_VAR: &str = "FL_CLIENT_CONFIG";
const ITERATION_VAR: &str = "FL_ITERATION";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();

    let path = env::var(CONFIG_VAR).with_context(|| format!("{CONFIG_VAR} is not set"))?;
    let cfg = ClientConfig::load(&path).with_context(|| format!("loading config from {path}"))?;

    let iteration = match env::var(ITERATION_VAR) {
        Ok(raw) => raw
            .parse::<i32>()
            .with_context(|| format!("{ITERATION_VAR} must be an integer, got {raw}"))?,
        Err(_) => 0,
    };

    let addr = cfg
        .server_addr
        .as_deref()
        .ok_or_else(|| anyhow!("config has no server_addr"))?;

    let selector = cfg.selector()?;
    let registry = cfg.registry(cfg.memory_backend());
    let round = GetModelRound::new(&selector, &registry)?;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    let (rx, tx) = stream.into_split();
    let (rx, tx) = comms::channel(rx, tx);
    info!("connected to {addr}");

    let mut driver = RoundDriver::new(round, Framed::new(rx, tx), cfg.retry);
    let outcome = driver.fetch_model(iteration).await?;
    info!("round metrics: {:?}", driver.metrics());

    let code = match outcome {
        RoundOutcome::Applied(report) => {
            info!(
                applied = report.applied_buffers(),
                dropped = report.dropped;
                "global model for iteration {iteration} merged"
            );
            ExitCode::SUCCESS
        }
        RoundOutcome::WaitAndRetry => {
            warn!("server never became ready for iteration {iteration}");
            ExitCode::SUCCESS
        }
        RoundOutcome::RestartRound => {
            warn!("iteration {iteration} expired, the round must be restarted");
            ExitCode::SUCCESS
        }
        RoundOutcome::Failed(e) => {
            error!("get model failed: {e}");
            ExitCode::FAILURE
        }
    };

    Ok(code)
}
