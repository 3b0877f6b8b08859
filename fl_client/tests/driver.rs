use std::{io, num::NonZeroUsize, time::Duration};

use comms::{FeatureMap, RequestGetModel, ResponseCode, ResponseGetModel};
use tokio::{io as tokio_io, task::JoinHandle};

use fl_client::{
    FlClientErr, Framed, GetModelRound, MatchPolicy, ModeSelector, ModelTargetRegistry,
    RetryPolicy, RoundDriver, RoundOutcome, TrainingMode, registry::MemoryBackend,
};

const BUF_SIZE: usize = 4096;
const MODEL: &str = "lenet.ms";

fn reply(code: ResponseCode, weights: Vec<(&str, Vec<f32>)>) -> ResponseGetModel {
    ResponseGetModel {
        retcode: Some(code.code()),
        reason: format!("{code:?}"),
        iteration: 1,
        timestamp: String::new(),
        feature_map: weights
            .into_iter()
            .map(|(name, values)| FeatureMap {
                weight_fullname: name.into(),
                data: bytemuck::cast_slice::<f32, u8>(&values).to_vec(),
            })
            .collect(),
    }
}

/// Answers each request with the next scripted reply and returns every request seen.
fn spawn_server(
    stream: tokio_io::DuplexStream,
    script: Vec<ResponseGetModel>,
) -> JoinHandle<io::Result<Vec<RequestGetModel>>> {
    tokio::spawn(async move {
        let (rx, tx) = tokio_io::split(stream);
        let (mut rx, mut tx) = comms::channel(rx, tx);
        let mut buf = Vec::new();
        let mut seen = Vec::new();

        for resp in script {
            let req: RequestGetModel = rx.recv_into(&mut buf).await?;
            seen.push(req);
            tx.send(&resp).await?;
        }

        Ok(seen)
    })
}

fn client(
    stream: tokio_io::DuplexStream,
) -> Framed<tokio_io::ReadHalf<tokio_io::DuplexStream>, tokio_io::WriteHalf<tokio_io::DuplexStream>>
{
    let (rx, tx) = tokio_io::split(stream);
    let (rx, tx) = comms::channel(rx, tx);
    Framed::new(rx, tx)
}

fn setup() -> (ModeSelector, ModelTargetRegistry<MemoryBackend>) {
    let selector =
        ModeSelector::new("lenet", TrainingMode::SingleModel, MatchPolicy::default()).unwrap();
    let backend = MemoryBackend::new().with_model(MODEL, [("fc.weight", 2), ("fc.bias", 1)]);
    let registry = ModelTargetRegistry::new(backend).with_target("lenet", MODEL);

    (selector, registry)
}

fn retry(max_waits: usize) -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(100), NonZeroUsize::new(max_waits).unwrap())
}

#[tokio::test(start_paused = true)]
async fn waits_until_the_model_is_ready() -> io::Result<()> {
    let (sv_stream, cl_stream) = tokio_io::duplex(BUF_SIZE);
    let server = spawn_server(
        sv_stream,
        vec![
            reply(ResponseCode::SucNotReady, vec![]),
            reply(ResponseCode::SucNotReady, vec![]),
            reply(
                ResponseCode::Succeed,
                vec![("fc.weight", vec![0.5, -1.5]), ("fc.bias", vec![2.0])],
            ),
        ],
    );

    let (selector, registry) = setup();
    let round = GetModelRound::new(&selector, &registry).unwrap();
    let mut driver = RoundDriver::new(round, client(cl_stream), retry(5));

    let outcome = driver.fetch_model(1).await?;
    assert!(outcome.is_applied(), "got {outcome:?}");

    let metrics = driver.metrics();
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.waits, 2);
    assert_eq!(metrics.wait_time, Duration::from_millis(200));
    assert_eq!(metrics.applied_buffers, 2);

    let seen = server.await.unwrap()?;
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|r| r.fl_name == "lenet" && r.iteration == 1));

    let backend = registry.backend();
    assert_eq!(backend.tensor(MODEL, "fc.weight"), Some(vec![0.5, -1.5]));
    assert_eq!(backend.tensor(MODEL, "fc.bias"), Some(vec![2.0]));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_waits() -> io::Result<()> {
    let (sv_stream, cl_stream) = tokio_io::duplex(BUF_SIZE);
    let server = spawn_server(
        sv_stream,
        (0..3).map(|_| reply(ResponseCode::SucNotReady, vec![])).collect(),
    );

    let (selector, registry) = setup();
    let round = GetModelRound::new(&selector, &registry).unwrap();
    let mut driver = RoundDriver::new(round, client(cl_stream), retry(2));

    let outcome = driver.fetch_model(1).await?;
    assert!(matches!(outcome, RoundOutcome::WaitAndRetry));
    assert_eq!(driver.metrics().attempts, 3);
    assert_eq!(driver.metrics().waits, 2);

    assert_eq!(server.await.unwrap()?.len(), 3);
    assert_eq!(registry.backend().tensor(MODEL, "fc.bias"), Some(vec![0.0]));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expiry_returns_immediately() -> io::Result<()> {
    let (sv_stream, cl_stream) = tokio_io::duplex(BUF_SIZE);
    let server = spawn_server(sv_stream, vec![reply(ResponseCode::OutOfTime, vec![])]);

    let (selector, registry) = setup();
    let round = GetModelRound::new(&selector, &registry).unwrap();
    let mut driver = RoundDriver::new(round, client(cl_stream), retry(5));

    let outcome = driver.fetch_model(1).await?;
    assert!(matches!(outcome, RoundOutcome::RestartRound));
    assert_eq!(driver.metrics().restarts, 1);
    assert_eq!(driver.metrics().waits, 0);

    server.await.unwrap()?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn wrong_tensor_size_fails_the_round() -> io::Result<()> {
    let (sv_stream, cl_stream) = tokio_io::duplex(BUF_SIZE);
    let server = spawn_server(
        sv_stream,
        vec![reply(ResponseCode::Succeed, vec![("fc.bias", vec![1.0, 2.0])])],
    );

    let (selector, registry) = setup();
    let round = GetModelRound::new(&selector, &registry).unwrap();
    let mut driver = RoundDriver::new(round, client(cl_stream), retry(5));

    let outcome = driver.fetch_model(1).await?;
    assert!(matches!(
        outcome,
        RoundOutcome::Failed(FlClientErr::ApplyFailed { .. })
    ));
    assert_eq!(driver.metrics().failures, 1);

    server.await.unwrap()?;
    assert_eq!(registry.backend().tensor(MODEL, "fc.bias"), Some(vec![0.0]));
    Ok(())
}

#[tokio::test]
async fn closed_connection_is_a_transport_error() {
    let (sv_stream, cl_stream) = tokio_io::duplex(BUF_SIZE);
    drop(sv_stream);

    let (selector, registry) = setup();
    let round = GetModelRound::new(&selector, &registry).unwrap();
    let mut driver = RoundDriver::new(round, client(cl_stream), retry(5));

    let res = driver.fetch_model(1).await;
    assert!(matches!(res, Err(FlClientErr::Io(_))));
}
