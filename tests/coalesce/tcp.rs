use nexar_coalesce::{CoalesceConfig, RingTransport, Tensor};

use super::helpers::{assert_close, run_on};

#[tokio::test]
async fn test_tcp_ring_matches_expected_average() {
    let world = 3u32;
    let config = CoalesceConfig::default();
    let transports = RingTransport::bootstrap_tcp_local(world, &config)
        .await
        .unwrap();
    assert_eq!(transports.len(), world as usize);

    let out = run_on(transports, config, |c| async move {
        let r = c.rank() as f32;
        let mut tensors = vec![
            Tensor::from_vec((0..7).map(|i| i as f32 + 3.0 * r).collect::<Vec<f32>>()),
            Tensor::from_vec(vec![r; 2]),
        ];
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        parts
            .iter()
            .map(|v| v.to_vec::<f32>().unwrap())
            .collect::<Vec<_>>()
    })
    .await;

    // mean of 3r over r in 0..3 is 3; mean of r is 1.
    let expected: [[Vec<f32>; 2]; 3] = [
        [vec![3.0, 4.0, 5.0], vec![1.0]],
        [vec![6.0, 7.0, 8.0], vec![1.0]],
        [vec![9.0], vec![]],
    ];
    for (rank, parts) in out.iter().enumerate() {
        for t in 0..2 {
            assert_close(&parts[t], &expected[rank][t], &format!("rank {rank} tensor {t}"));
        }
    }
}

#[tokio::test]
async fn test_tcp_single_rank() {
    let config = CoalesceConfig::default();
    let transports = RingTransport::bootstrap_tcp_local(1, &config).await.unwrap();
    let out = run_on(transports, config, |c| async move {
        let mut tensors = vec![Tensor::from_vec(vec![1.5f32, 2.5])];
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        parts.get(0).unwrap().to_vec::<f32>().unwrap()
    })
    .await;
    assert_eq!(out, vec![vec![1.5, 2.5]]);
}
