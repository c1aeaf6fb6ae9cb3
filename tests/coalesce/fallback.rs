use nexar_coalesce::{CoalesceConfig, RingTransport, Tensor};

use super::helpers::{assert_close, run_collective_with_config, run_on};

fn grads(rank: u32) -> Vec<Tensor> {
    let r = rank as f32;
    vec![
        Tensor::from_vec((0..9).map(|i| i as f32 * 0.5 + r).collect::<Vec<f32>>()),
        Tensor::from_vec((0..2).map(|i| -(i as f32) - r).collect::<Vec<f32>>()),
        Tensor::from_vec(vec![r * 4.0; 6]),
    ]
}

#[tokio::test]
async fn test_chunk_only_transport_uses_chunked_strategy() {
    let world = 3u32;
    let config = CoalesceConfig::default();

    let direct = run_collective_with_config(world, config.clone(), |c| async move {
        assert_eq!(c.strategy_name(), "direct");
        let mut tensors = grads(c.rank());
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        parts
            .iter()
            .map(|v| v.to_vec::<f32>().unwrap())
            .collect::<Vec<_>>()
    })
    .await;

    let transports: Vec<RingTransport> = RingTransport::local(world, &config)
        .unwrap()
        .into_iter()
        .map(|t| t.with_flat_reduce_scatter(false))
        .collect();
    let chunked = run_on(transports, config, |c| async move {
        assert_eq!(c.strategy_name(), "chunked");
        assert!(!c.capabilities().flat_reduce_scatter);
        let mut tensors = grads(c.rank());
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        parts
            .iter()
            .map(|v| v.to_vec::<f32>().unwrap())
            .collect::<Vec<_>>()
    })
    .await;

    for rank in 0..world as usize {
        assert_eq!(direct[rank].len(), chunked[rank].len());
        for (t, (d, c)) in direct[rank].iter().zip(&chunked[rank]).enumerate() {
            assert_close(c, d, &format!("rank {rank} tensor {t}"));
        }
    }
}

#[tokio::test]
async fn test_force_chunked_config() {
    let config = CoalesceConfig {
        force_chunked: true,
        ..CoalesceConfig::default()
    };
    let out = run_collective_with_config(4, config, |c| async move {
        assert_eq!(c.strategy_name(), "chunked");
        // The transport still advertises the direct primitive.
        assert!(c.capabilities().flat_reduce_scatter);
        let v = c.rank() as f32 * 2.0;
        let mut tensors = vec![Tensor::full(v, &[8])];
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        assert!(parts.is_zero_copy());
        parts.get(0).unwrap().to_vec::<f32>().unwrap()
    })
    .await;

    // (0 + 2 + 4 + 6) / 4
    for (rank, got) in out.iter().enumerate() {
        assert_close(got, &[3.0, 3.0], &format!("rank {rank}"));
    }
}
