use std::num::NonZeroU32;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use governor::Quota;
use governor::RateLimiter;
use governor::clock::Clock;
use governor::clock::QuantaClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;

use recharge_limit::BucketConfig;
use recharge_limit::CompositeLimiter;
use recharge_limit::LimiterConfig;
use recharge_limit::Reason;
use recharge_limit::SlidingWindow;
use recharge_limit::Strategy;
use recharge_limit::TokenBucket;
use recharge_limit::WindowConfig;
use tokio::time::Instant;

// Wrapper to bridge Governor into the recharge-limit Strategy trait
#[derive(Debug)]
struct GovernorStrategy {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, QuantaClock>>,
    clock: QuantaClock,
}

impl Strategy for GovernorStrategy {
    fn process_at(&mut self, _now: Instant) -> ControlFlow<Reason> {
        match self.limiter.check() {
            Ok(_) => ControlFlow::Continue(()),
            Err(negative) => {
                let now = self.clock.now();
                let wait: Duration = negative.wait_time_from(now);
                ControlFlow::Break(Reason::Overloaded { retry_after: wait })
            }
        }
    }
}

fn bench_single_strategy<S: Strategy>(group_name: &str, c: &mut Criterion, mut strategy: S) {
    let mut group = c.benchmark_group(group_name);

    group.bench_function("process", |b| {
        b.iter(|| {
            let _ = black_box(&mut strategy).process();
        })
    });

    group.finish();
}

fn bench_dynamic_strategy(group_name: &str, c: &mut Criterion, mut strategy: Box<dyn Strategy>) {
    let mut group = c.benchmark_group(format!("Dynamic-{}", group_name));

    group.bench_function("process", |b| {
        b.iter(|| {
            let _ = black_box(strategy.as_mut()).process();
        })
    });

    group.finish();
}

fn run_all_benches(c: &mut Criterion) {
    let limit_val = 1_000_000;
    let limit = NonZeroUsize::new(limit_val).unwrap();
    let period = Duration::from_secs(60);
    let config = LimiterConfig::default()
        .with_burst(BucketConfig::new(limit, limit, period))
        .with_sustained(WindowConfig::new(limit, period));

    let gov_quota = Quota::per_minute(NonZeroU32::new(limit_val as u32).unwrap());
    let gov_clock = QuantaClock::default();
    let gov = || GovernorStrategy {
        limiter: Arc::new(RateLimiter::direct_with_clock(gov_quota, gov_clock.clone())),
        clock: gov_clock.clone(),
    };

    // --- Static dispatch ---
    bench_single_strategy("TokenBucket-Static", c, TokenBucket::new(limit, limit, period));
    bench_single_strategy("SlidingWindow-Static", c, SlidingWindow::new(limit, period));
    bench_single_strategy("Composite-Static", c, CompositeLimiter::new(config));
    bench_single_strategy("Governor-Static", c, gov());

    // --- Dynamic dispatch, to see the cost of Box<dyn Strategy> ---
    let strategies: Vec<(&str, Box<dyn Strategy>)> = vec![
        ("TokenBucket", Box::new(TokenBucket::new(limit, limit, period))),
        ("SlidingWindow", Box::new(SlidingWindow::new(limit, period))),
        ("Composite", Box::new(CompositeLimiter::new(config))),
        ("Governor", Box::new(gov())),
    ];

    for (name, strategy) in strategies {
        bench_dynamic_strategy(name, c, strategy);
    }
}

criterion_group!(benches, run_all_benches);
criterion_main!(benches);
