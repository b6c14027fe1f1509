use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use strain::{
    ConstantTimer, Executable, Fault, LoadTest, LoadTestConfig, Outcome, ResultSink, TestCase,
    TestFactory, TimedTest, TimedTestConfig, result::RecordingSink,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn sleeping(name: &str, duration: Duration) -> Arc<dyn Executable> {
    TestCase::shared(name, move || async move {
        tokio::time::sleep(duration).await;
        Ok(())
    })
}

fn quiet_timed(test: Arc<dyn Executable>, max_elapsed: Duration, wait: bool) -> TimedTest {
    TimedTest::new(
        test,
        TimedTestConfig::builder()
            .max_elapsed(max_elapsed)
            .wait_for_completion(wait)
            .quiet(true)
            .build(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn users_run_concurrently_within_the_deadline() {
    init_tracing();
    let load = LoadTest::with_users(sleeping("response", Duration::from_millis(300)), 10).unwrap();
    let timed = quiet_timed(Arc::new(load), Duration::from_secs(1), true);
    let sink = Arc::new(RecordingSink::new());

    assert_eq!(timed.count_test_cases(), 10);
    timed.run(sink.clone()).await.unwrap();

    assert!(!timed.out_of_time());
    assert!(sink.was_successful());
    assert!(!sink.summary().stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatch_delay_counts_against_a_waiting_deadline() {
    init_tracing();
    let config = LoadTestConfig::builder()
        .users(3)
        .timer(Arc::new(ConstantTimer::new(Duration::from_millis(250))))
        .build();
    let load = Arc::new(LoadTest::new(sleeping("quick", Duration::from_millis(10)), config).unwrap());
    let timed = quiet_timed(load.clone(), Duration::from_millis(500), true);
    let sink = Arc::new(RecordingSink::new());

    timed.run(sink.clone()).await.unwrap();

    assert!(timed.out_of_time());
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].source, load.to_string());
    assert!(failures[0].reason.contains("Expected 0.5 sec."));
    assert_eq!(sink.stop_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_deadline_abandons_a_slow_load_test() {
    init_tracing();
    let load = Arc::new(LoadTest::with_users(sleeping("hangs", Duration::from_secs(2)), 4).unwrap());
    let timed = quiet_timed(load.clone(), Duration::from_millis(500), false);
    let sink = Arc::new(RecordingSink::new());

    let begin = Instant::now();
    timed.run(sink.clone()).await.unwrap();
    let elapsed = begin.elapsed();

    assert!(elapsed < Duration::from_millis(1500), "waited {elapsed:?}");
    assert!(timed.out_of_time());
    let summary = sink.summary();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].source, load.to_string());
    assert!(summary.stopped);
    assert!(!load.barrier().is_reached());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn assertion_failures_are_reported_per_user() {
    init_tracing();
    let test = TestCase::shared("checks status", || async {
        Err(Fault::assertion("expected 200, got 503"))
    });
    let config = LoadTestConfig::builder().users(6).iterations(2).build();
    let load = LoadTest::new(test, config).unwrap();
    let sink = Arc::new(RecordingSink::new());

    load.run(sink.clone()).await.unwrap();

    let failures = sink.failures();
    assert_eq!(failures.len(), 12);
    assert!(failures.iter().all(|f| f.source == "checks status"));
    assert!(sink.errors().is_empty());
}

struct Panicky;

impl fmt::Display for Panicky {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Panicky")
    }
}

#[async_trait]
impl Executable for Panicky {
    fn count_test_cases(&self) -> usize {
        1
    }

    async fn run(&self, _result: Arc<dyn ResultSink>) -> Outcome {
        panic!("unexpected state")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_users_never_crash_the_harness() {
    init_tracing();
    let load = LoadTest::with_users(Arc::new(Panicky), 3).unwrap();
    let sink = Arc::new(RecordingSink::new());

    load.run(sink.clone()).await.unwrap();

    let errors = sink.errors();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|e| e.source == load.to_string()));
    assert!(errors.iter().all(|e| e.reason == "panicked: unexpected state"));
    assert!(load.barrier().is_reached());
}

struct Stateful {
    uses: AtomicUsize,
}

impl fmt::Display for Stateful {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Stateful")
    }
}

#[async_trait]
impl Executable for Stateful {
    fn count_test_cases(&self) -> usize {
        1
    }

    async fn run(&self, _result: Arc<dyn ResultSink>) -> Outcome {
        if self.uses.fetch_add(1, Ordering::SeqCst) != 0 {
            return Err(Fault::assertion("instance shared between users"));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn factory_gives_every_user_its_own_instance() {
    init_tracing();
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let factory = TestFactory::new("stateful", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(Stateful {
            uses: AtomicUsize::new(0),
        }) as Arc<dyn Executable>
    });
    let load = LoadTest::with_users(Arc::new(factory), 8).unwrap();
    let sink = Arc::new(RecordingSink::new());

    load.run(sink.clone()).await.unwrap();

    assert!(sink.was_successful(), "{:?}", sink.summary());
    assert_eq!(built.load(Ordering::SeqCst), 8);
}
