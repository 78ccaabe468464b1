use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use hdrhistogram::Histogram;
use serde_json::json;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tower::BoxError;
use tower::service_fn;
use tower_recharge::BucketConfig;
use tower_recharge::ClientConfig;
use tower_recharge::LimiterConfig;
use tower_recharge::RechargeClient;
use tower_recharge::RechargeError;
use tower_recharge::RequestDescriptor;
use tower_recharge::TransportRequest;
use tower_recharge::TransportResponse;
use tower_recharge::WindowConfig;
use tracing_subscriber::EnvFilter;

async fn mock_api_call(req: TransportRequest) -> Result<TransportResponse, BoxError> {
    // Simulate the provider's round trip.
    sleep(Duration::from_millis(20)).await;
    Ok(TransportResponse::json(200, &json!({ "url": req.url })))
}

#[derive(Default)]
struct Outcomes {
    overflows: usize,
    transport: usize,
    other: usize,
}

async fn run_load_test(name: &str, config: ClientConfig, total_reqs: usize) -> Result<(), BoxError> {
    let client = RechargeClient::with_transport(config, service_fn(mock_api_call))?;
    let mut hist_elapsed = Histogram::<u64>::new_with_bounds(1, 600_000_000, 3)?;

    let mut tasks = JoinSet::new();
    let mut outcomes = Outcomes::default();
    let barrier = Arc::new(Barrier::new(total_reqs));
    let start = Instant::now();

    for i in 0..total_reqs {
        let client = client.clone();
        let bar = barrier.clone();
        tasks.spawn(async move {
            bar.wait().await;
            let req_start = Instant::now();
            let res = client
                .request(RequestDescriptor::get(format!("/subscriptions/{i}")))
                .await;
            (res, req_start.elapsed())
        });
    }

    let mut success_count = 0;
    while let Some(task) = tasks.join_next().await {
        let (res, elapsed) = task?;
        match res {
            Ok(_) => {
                success_count += 1;
                hist_elapsed.record(u64::try_from(elapsed.as_micros())?)?;
            }
            Err(RechargeError::QueueOverflow { .. }) => outcomes.overflows += 1,
            Err(RechargeError::Transport(_)) => outcomes.transport += 1,
            Err(_) => outcomes.other += 1,
        }
    }

    let total_duration = start.elapsed();
    let goodput = success_count as f64 / total_duration.as_secs_f64();

    println!("--- {} ---", name);
    println!("Total Duration:  {:.2?}", total_duration);
    println!("Success/Total:   {}/{}", success_count, total_reqs);
    println!("Success Rate:    {:.2} req/sec", goodput);

    if success_count > 0 {
        println!("P50 (Elapsed):   {}µs", hist_elapsed.value_at_quantile(0.5));
        println!("P99 (Elapsed):   {}µs", hist_elapsed.value_at_quantile(0.99));
        println!("Max (Elapsed):   {}µs", hist_elapsed.max());
    }

    let total_errors = outcomes.overflows + outcomes.transport + outcomes.other;
    println!("Errors:          {}", total_errors);
    if total_errors > 0 {
        println!("  └─ Overflows:  {}", outcomes.overflows);
        if outcomes.transport > 0 {
            println!("  └─ Transport:  {}", outcomes.transport);
        }
        if outcomes.other > 0 {
            println!("  └─ Other:      {}", outcomes.other);
        }
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let base = ClientConfig::new("stress-token").with_base_url("http://localhost");

    // 1. Provider limits: a short burst drains at one call per second.
    run_load_test("Provider Limits", base.clone(), 6).await?;

    // 2. Loose limits: the single-flight transport is the bottleneck.
    let rate = NonZeroUsize::new(1_000).ok_or("zero rate")?;
    let loose = LimiterConfig::default()
        .with_burst(BucketConfig::new(rate, rate, Duration::from_secs(1)))
        .with_sustained(WindowConfig::new(rate, Duration::from_secs(1)));
    run_load_test(
        "Loose Limits",
        base.clone().with_limits(loose).with_max_depth(500),
        200,
    )
    .await?;

    // 3. Shallow queue: most of a concurrent burst is shed at admission.
    run_load_test(
        "Shallow Queue",
        base.with_limits(loose).with_max_depth(10),
        200,
    )
    .await?;

    Ok(())
}
