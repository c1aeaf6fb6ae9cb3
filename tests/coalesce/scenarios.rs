use nexar_coalesce::{CoalesceConfig, PartitionPlan, Tensor};

use super::helpers::{assert_close, run_collective, run_collective_with_config};

#[tokio::test]
async fn test_two_ranks_ones_and_threes_average_to_twos() {
    let out = run_collective(2, |c| async move {
        let v = if c.rank() == 0 { 1.0f32 } else { 3.0 };
        let mut tensors = vec![Tensor::from_vec(vec![v; 8])];
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        assert!(parts.is_zero_copy(), "single divisible tensor should alias");
        parts.get(0).unwrap().to_vec::<f32>().unwrap()
    })
    .await;

    for (rank, got) in out.iter().enumerate() {
        assert_eq!(got, &vec![2.0f32; 4], "rank {rank}");
    }
}

#[tokio::test]
async fn test_world_four_counts_ten_and_three() {
    let out = run_collective(4, |c| async move {
        let rank = c.rank() as f32;
        let mut tensors = vec![
            Tensor::from_vec((0..10).map(|i| i as f32 + 100.0 * rank).collect()),
            Tensor::from_vec((0..3).map(|i| 1000.0 + i as f32 + 100.0 * rank).collect()),
        ];
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        assert!(!parts.is_zero_copy());
        parts
            .iter()
            .map(|v| v.to_vec::<f32>().unwrap())
            .collect::<Vec<_>>()
    })
    .await;

    // Mean of 100 * rank over four ranks is 150.
    let expected: [[Vec<f32>; 2]; 4] = [
        [vec![150.0, 151.0, 152.0], vec![1150.0]],
        [vec![153.0, 154.0, 155.0], vec![1151.0]],
        [vec![156.0, 157.0, 158.0], vec![1152.0]],
        [vec![159.0], vec![]],
    ];
    for (rank, got) in out.iter().enumerate() {
        assert_eq!(got.len(), 2);
        for t in 0..2 {
            assert_close(&got[t], &expected[rank][t], &format!("rank {rank} tensor {t}"));
        }
    }
    assert_eq!(out[3][0].len(), 1);
    assert!(out[3][1].is_empty());
}

#[tokio::test]
async fn test_constant_per_rank_values_average() {
    let world = 3u32;
    let out = run_collective(world, |c| async move {
        let v = (c.rank() + 1) as f32;
        let mut tensors = vec![
            Tensor::full(v, &[4, 5]),
            Tensor::full(v, &[7]),
            Tensor::full(v, &[1]),
        ];
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        parts
            .iter()
            .map(|v| v.to_vec::<f32>().unwrap())
            .collect::<Vec<_>>()
    })
    .await;

    // (1 + 2 + 3) / 3
    let plan = PartitionPlan::new(&[20, 7, 1], world).unwrap();
    for (rank, parts) in out.iter().enumerate() {
        for (t, got) in parts.iter().enumerate() {
            let want = vec![2.0f32; plan.partition_len(t, rank)];
            assert_close(got, &want, &format!("rank {rank} tensor {t}"));
        }
    }
}

#[tokio::test]
async fn test_zero_copy_matches_padded_path() {
    let world = 3u32;
    let input = |rank: u32| -> Vec<f32> { (0..12).map(|i| (i * 7 + rank as usize * 13) as f32 * 0.25).collect() };

    let fast = run_collective(world, move |c| async move {
        let mut tensors = vec![Tensor::from_vec(input(c.rank()))];
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        assert!(parts.is_zero_copy());
        parts.get(0).unwrap().to_vec::<f32>().unwrap()
    })
    .await;

    // A trailing empty tensor forces the packed, interleaved path.
    let padded = run_collective(world, move |c| async move {
        let mut tensors = vec![
            Tensor::from_vec(input(c.rank())),
            Tensor::from_vec(Vec::<f32>::new()),
        ];
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        assert!(!parts.is_zero_copy());
        assert!(parts.get(1).unwrap().is_empty());
        parts.get(0).unwrap().to_vec::<f32>().unwrap()
    })
    .await;

    for rank in 0..world as usize {
        assert_close(&fast[rank], &padded[rank], &format!("rank {rank}"));
    }
}

#[tokio::test]
async fn test_non_uniform_sizes_never_leak_padding() {
    let world = 4u32;
    let counts = [0usize, 2, 17, 5, 1];
    let out = run_collective(world, move |c| async move {
        // Every real element is at least 1, so zero padding would be visible.
        let mut tensors: Vec<Tensor> = counts
            .iter()
            .map(|&n| Tensor::from_vec((0..n).map(|i| 1.0 + i as f32).collect::<Vec<f32>>()))
            .collect();
        let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
        parts
            .iter()
            .map(|v| v.to_vec::<f32>().unwrap())
            .collect::<Vec<_>>()
    })
    .await;

    let plan = PartitionPlan::new(&counts, world).unwrap();
    for (rank, parts) in out.iter().enumerate() {
        assert_eq!(parts.len(), counts.len());
        for (t, got) in parts.iter().enumerate() {
            let range = plan.range(t, rank);
            assert_eq!(got.len(), range.len(), "rank {rank} tensor {t}");
            let want: Vec<f32> = range.map(|i| 1.0 + i as f32).collect();
            assert_close(got, &want, &format!("rank {rank} tensor {t}"));
            assert!(got.iter().all(|&x| x >= 1.0));
        }
    }
}

#[tokio::test]
async fn test_f64_and_bf16() {
    let out = run_collective(2, |c| async move {
        let v = if c.rank() == 0 { 0.5f64 } else { 1.5 };
        let mut doubles = vec![Tensor::full(v, &[3]), Tensor::full(v, &[6])];
        let d = c
            .coalesced_reduce_scatter(&mut doubles)
            .await
            .unwrap()
            .iter()
            .map(|p| p.to_vec::<f64>().unwrap())
            .collect::<Vec<_>>();

        let h = half::bf16::from_f32(if c.rank() == 0 { 2.0 } else { 4.0 });
        let mut halves = vec![Tensor::full(h, &[5])];
        let b = c
            .coalesced_reduce_scatter(&mut halves)
            .await
            .unwrap()
            .get(0)
            .unwrap()
            .to_vec::<half::bf16>()
            .unwrap();
        (d, b)
    })
    .await;

    assert_eq!(out[0].0, vec![vec![1.0; 2], vec![1.0; 3]]);
    assert_eq!(out[1].0, vec![vec![1.0; 1], vec![1.0; 3]]);
    assert_eq!(out[0].1, vec![half::bf16::from_f32(3.0); 3]);
    assert_eq!(out[1].1, vec![half::bf16::from_f32(3.0); 2]);
}

#[tokio::test]
async fn test_repeated_calls_on_one_coalescer() {
    let out = run_collective_with_config(3, CoalesceConfig::default(), |c| async move {
        let mut results = Vec::new();
        for round in 0..3 {
            let v = (c.rank() + round) as f32;
            let mut tensors = vec![Tensor::full(v, &[4]), Tensor::full(v, &[2])];
            let parts = c.coalesced_reduce_scatter(&mut tensors).await.unwrap();
            results.push(parts.get(0).unwrap().to_vec::<f32>().unwrap());
        }
        results
    })
    .await;

    for (rank, rounds) in out.iter().enumerate() {
        for (round, got) in rounds.iter().enumerate() {
            // mean over r of (r + round) = 1 + round
            let len = if rank < 2 { 2 } else { 0 };
            assert_close(got, &vec![1.0 + round as f32; len], &format!("rank {rank} round {round}"));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_calls_on_one_coalescer() {
    let out = run_collective(3, |c| async move {
        let mut results = Vec::new();
        for _ in 0..20 {
            let r = c.rank() as f32;
            let mut low = vec![Tensor::full(r, &[6])];
            let mut high = vec![Tensor::full(100.0 + r, &[6])];
            // Both calls are in flight together; join polls `low` first on
            // every rank, so the ranks agree on the order.
            let (low, high) = tokio::join!(
                c.coalesced_reduce_scatter(&mut low),
                c.coalesced_reduce_scatter(&mut high),
            );
            results.push((
                low.unwrap().get(0).unwrap().to_vec::<f32>().unwrap(),
                high.unwrap().get(0).unwrap().to_vec::<f32>().unwrap(),
            ));
        }
        results
    })
    .await;

    for (rank, rounds) in out.iter().enumerate() {
        for (round, (low, high)) in rounds.iter().enumerate() {
            let what = format!("rank {rank} round {round}");
            assert_close(low, &[1.0, 1.0], &what);
            assert_close(high, &[101.0, 101.0], &what);
        }
    }
}
