use nexar_coalesce::{CoalesceConfig, Coalescer, RingTransport};
use std::sync::Arc;

/// Run `f` once per rank, each on its own task, and return the results in
/// rank order.
pub async fn run_on<F, Fut, T>(transports: Vec<RingTransport>, config: CoalesceConfig, f: F) -> Vec<T>
where
    F: Fn(Arc<Coalescer>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let f = Arc::new(f);
    let mut handles = Vec::new();
    for t in transports {
        let coalescer = Arc::new(Coalescer::with_config(Arc::new(t), &config).unwrap());
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(coalescer).await }));
    }
    let mut out = Vec::new();
    for h in handles {
        out.push(h.await.unwrap());
    }
    out
}

/// Helper: run a coalesced collective across an in-process ring of
/// `world_size` ranks.
pub async fn run_collective<F, Fut, T>(world_size: u32, f: F) -> Vec<T>
where
    F: Fn(Arc<Coalescer>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    run_collective_with_config(world_size, CoalesceConfig::default(), f).await
}

pub async fn run_collective_with_config<F, Fut, T>(
    world_size: u32,
    config: CoalesceConfig,
    f: F,
) -> Vec<T>
where
    F: Fn(Arc<Coalescer>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let transports = RingTransport::local(world_size, &config).unwrap();
    run_on(transports, config, f).await
}

pub fn assert_close(got: &[f32], want: &[f32], what: &str) {
    assert_eq!(got.len(), want.len(), "{what}: length");
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        assert!((g - w).abs() <= 1e-5 * w.abs().max(1.0), "{what}[{i}]: got {g}, want {w}");
    }
}
