use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

use modl::{
    ConfigDelta, DictErr, DictFact, DictFactConfig, ErrKind, RADIUS, Solver, SubsetSampling,
    Weights, projection::enet_norm,
};

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

/// `n x p` rows spanned by `rank` gaussian atoms plus gaussian noise, and the atoms.
fn low_rank(n: usize, p: usize, rank: usize, sigma: f64, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let basis = Array2::<f64>::random_using((rank, p), StandardNormal, &mut rng);
    let weights = Array2::<f64>::random_using((n, rank), StandardNormal, &mut rng);
    let noise = Array2::<f64>::random_using((n, p), StandardNormal, &mut rng);

    (weights.dot(&basis) + noise * sigma, basis)
}

/// Orthonormal basis of the row space of `d`, by Gram-Schmidt.
fn row_space(d: &Array2<f64>) -> Vec<Array1<f64>> {
    let mut basis: Vec<Array1<f64>> = Vec::new();

    for row in d.rows() {
        let mut v = row.to_owned();
        for q in &basis {
            let proj = q.dot(&v);
            v.scaled_add(-proj, q);
        }

        let norm = v.dot(&v).sqrt();
        if norm > 1e-10 {
            basis.push(v / norm);
        }
    }

    basis
}

/// Cosine between `v` and its projection on the span of `basis`.
fn cosine_to_span(v: ArrayView1<f64>, basis: &[Array1<f64>]) -> f64 {
    let projected_sq: f64 = basis.iter().map(|q| q.dot(&v).powi(2)).sum();
    projected_sq.sqrt() / v.dot(&v).sqrt()
}

/// The rows of `learned` matched greedily to the rows of `truth` by absolute cosine, normalized
/// and flipped to the sign of their match.
fn aligned(learned: &Array2<f64>, truth: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros(truth.raw_dim());
    let mut free: Vec<usize> = (0..learned.nrows()).collect();

    for (i, target) in truth.rows().into_iter().enumerate() {
        let (pos, cosine) = free
            .iter()
            .enumerate()
            .map(|(pos, &k)| {
                let row = learned.row(k);
                (pos, row.dot(&target) / (row.dot(&row) * target.dot(&target)).sqrt())
            })
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .unwrap();

        let row = learned.row(free.swap_remove(pos));
        let norm = row.dot(&row).sqrt();
        out.row_mut(i).assign(&(&row * (cosine.signum() / norm)));
    }

    out
}

/// Runs one `partial_fit` over `x`, returning the codes and subset of every mini-batch.
fn recorded_run(
    config: &DictFactConfig,
    x: ArrayView2<f64>,
) -> (DictFact, Vec<(Array2<f64>, Vec<usize>)>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = Arc::clone(&seen);

    let mut engine = DictFact::new(config.clone())
        .unwrap()
        .with_callback(move |snapshot| {
            observer
                .lock()
                .unwrap()
                .push((snapshot.code().to_owned(), snapshot.subset().to_vec()));
        });
    engine.partial_fit(x, None).unwrap();

    let seen = seen.lock().unwrap().clone();
    (engine, seen)
}

fn base_config() -> DictFactConfig {
    DictFactConfig {
        n_components: nz(3),
        alpha: 0.01,
        learning_rate: 0.9,
        batch_size: nz(4),
        random_state: Some(0),
        ..Default::default()
    }
}

#[test]
fn ridge_fit_recovers_the_generating_subspace() {
    let (x, basis) = low_rank(200, 10, 3, 0.01, 1);

    let config = DictFactConfig {
        batch_size: nz(1),
        solver: Solver::Gram,
        n_epochs: nz(5),
        ..base_config()
    };

    let mut engine = DictFact::new(config).unwrap();
    let processed = engine.fit(x.view()).unwrap();
    assert_eq!(processed, 1000);

    let learned = row_space(engine.dictionary().unwrap());
    assert_eq!(learned.len(), 3);

    for atom in basis.rows() {
        let cosine = cosine_to_span(atom, &learned);
        assert!(cosine >= 0.95, "generating atom poorly recovered: cosine {cosine}");
    }
}

#[test]
fn single_thread_runs_are_reproducible() {
    let (x, _) = low_rank(120, 16, 3, 0.1, 2);

    let config = DictFactConfig {
        reduction: 3.,
        solver: Solver::Average,
        weights: Weights::Async,
        shuffle_components: true,
        n_epochs: nz(2),
        random_state: Some(42),
        ..base_config()
    };

    let run = || {
        let mut engine = DictFact::new(config.clone()).unwrap();
        engine.fit(x.view()).unwrap();
        engine
    };

    let first = run();
    let second = run();

    assert_eq!(first.dictionary(), second.dictionary());
    assert_eq!(first.a(), second.a());
    assert_eq!(first.b(), second.b());
    assert_eq!(first.g_average(), second.g_average());
    assert_eq!(first.dx_average(), second.dx_average());
}

#[test]
fn budget_is_never_exceeded() {
    let (x, _) = low_rank(20, 8, 2, 0.1, 3);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = Arc::clone(&seen);

    let config = DictFactConfig {
        batch_size: nz(5),
        max_n_iter: 37,
        ..base_config()
    };

    let mut engine = DictFact::new(config)
        .unwrap()
        .with_callback(move |snapshot| observer.lock().unwrap().push(snapshot.total_counter()));

    assert_eq!(engine.partial_fit(x.view(), None).unwrap(), 20);
    assert_eq!(engine.partial_fit(x.view(), None).unwrap(), 17);
    assert_eq!(engine.partial_fit(x.view(), None).unwrap(), 0);
    assert_eq!(engine.total_counter(), 37);

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, [5, 10, 15, 20, 25, 30, 35, 37]);
}

#[test]
fn fit_stops_at_the_budget() {
    let (x, _) = low_rank(30, 8, 2, 0.1, 4);

    let config = DictFactConfig {
        max_n_iter: 100,
        ..base_config()
    };

    let mut engine = DictFact::new(config).unwrap();
    assert_eq!(engine.fit(x.view()).unwrap(), 100);
    assert_eq!(engine.total_counter(), 100);
}

#[test]
fn score_decreases_over_the_stream() {
    let (x, _) = low_rank(400, 20, 4, 0.05, 5);
    let (train, test) = (x.slice(s![..320, ..]), x.slice(s![320.., ..]));

    let config = DictFactConfig {
        n_components: nz(4),
        reduction: 2.,
        solver: Solver::Masked,
        n_samples: Some(nz(320)),
        ..base_config()
    };
    let mut engine = DictFact::new(config).unwrap();

    // 80 mini-batches of 4 rows, scored every 5.
    let mut scores = Vec::new();
    for chunk in 0..16 {
        let rows = s![chunk * 20..(chunk + 1) * 20, ..];
        let indices: Vec<_> = (chunk * 20..(chunk + 1) * 20).collect();

        engine
            .partial_fit(train.slice(rows), Some(indices.as_slice()))
            .unwrap();
        scores.push(engine.score(test).unwrap());
    }

    let head: f64 = scores[..4].iter().sum::<f64>() / 4.;
    let tail: f64 = scores[12..].iter().sum::<f64>() / 4.;
    assert!(tail < head, "scores did not decrease: {scores:?}");
    assert!(scores[15] < scores[0], "scores did not decrease: {scores:?}");
}

#[test]
fn transform_is_read_only_and_stable() {
    let (x, _) = low_rank(60, 12, 3, 0.1, 6);

    let config = DictFactConfig {
        pen_l1_ratio: 0.5,
        alpha: 0.1,
        ..base_config()
    };
    let mut engine = DictFact::new(config).unwrap();
    engine.fit(x.view()).unwrap();

    let dictionary = engine.dictionary().unwrap().clone();
    let counter = engine.total_counter();

    let (first, components) = engine.transform(x.view()).unwrap();
    let (second, _) = engine.transform(x.view()).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.dim(), (60, 3));
    assert_eq!(engine.dictionary().unwrap(), &dictionary);
    assert_eq!(engine.total_counter(), counter);

    for row in components.rows() {
        assert!((enet_norm(row, 0.) - RADIUS).abs() < 1e-9);
    }
}

#[test]
fn statistics_stay_symmetric_and_atoms_feasible() {
    let (x, _) = low_rank(100, 15, 3, 0.1, 7);

    for (solver, l1_ratio) in [(Solver::Masked, 0.), (Solver::Gram, 0.3), (Solver::Average, 0.7)] {
        let config = DictFactConfig {
            l1_ratio,
            reduction: 3.,
            solver,
            subset_sampling: SubsetSampling::Cyclic,
            n_epochs: nz(2),
            ..base_config()
        };

        let mut engine = DictFact::new(config).unwrap();
        engine.fit(x.view()).unwrap();

        let a = engine.a().unwrap();
        assert_eq!(a, &a.t(), "{solver}: A is not symmetric");

        for row in engine.dictionary().unwrap().rows() {
            let norm = enet_norm(row, l1_ratio);
            assert!(norm <= RADIUS + 1e-9, "{solver}: atom norm {norm}");
        }
    }
}

#[test]
fn multi_threaded_runs_stay_feasible() {
    let (x, _) = low_rank(256, 32, 4, 0.1, 8);

    let config = DictFactConfig {
        n_components: nz(6),
        batch_size: nz(16),
        reduction: 2.,
        solver: Solver::Average,
        dict_reduction: "same".parse().unwrap(),
        n_threads: nz(4),
        n_epochs: nz(3),
        ..base_config()
    };

    let mut engine = DictFact::new(config).unwrap();
    engine.fit(x.view()).unwrap();

    let dictionary = engine.dictionary().unwrap();
    assert!(dictionary.iter().all(|v| v.is_finite()));
    for row in dictionary.rows() {
        assert!(enet_norm(row, 0.) <= RADIUS + 1e-9);
    }

    let samples = engine.sample_counter().unwrap();
    assert_eq!(samples.sum(), 3 * 256);
}

#[test]
fn hyperparameters_swap_between_calls() {
    let (x, _) = low_rank(40, 10, 2, 0.1, 9);
    let mut engine = DictFact::new(base_config()).unwrap();
    engine.partial_fit(x.view(), None).unwrap();

    engine
        .set_params(ConfigDelta::new().alpha(0.5).reduction(2.).solver(Solver::Masked))
        .unwrap();
    assert_eq!(engine.config().solver, Solver::Masked);
    engine.partial_fit(x.view(), None).unwrap();
    assert_eq!(engine.total_counter(), 80);

    let err = engine
        .set_params(ConfigDelta::new().n_samples(nz(100)))
        .unwrap_err();
    assert!(matches!(err, DictErr::SealedParam("n_samples")));

    let err = engine
        .set_params(ConfigDelta::new().alpha(0.1).reduction(0.5))
        .unwrap_err();
    assert_eq!(err.kind(), ErrKind::Config);
    assert_eq!(engine.config().alpha, 0.5);
}

#[test]
fn rejected_batches_leave_the_engine_untouched() {
    let (x, _) = low_rank(10, 6, 2, 0.1, 10);

    let engine = DictFact::new(base_config()).unwrap();
    assert!(matches!(engine.transform(x.view()), Err(DictErr::NotFitted)));

    let mut engine = engine;
    engine.partial_fit(x.view(), None).unwrap();
    let dictionary = engine.dictionary().unwrap().clone();

    let narrow = Array2::<f64>::zeros((3, 5));
    let err = engine.partial_fit(narrow.view(), None).unwrap_err();
    assert!(matches!(err, DictErr::SizeMismatch { what: "features", .. }));

    let mut broken = x.clone();
    broken[[4, 2]] = f64::NAN;
    let err = engine.partial_fit(broken.view(), None).unwrap_err();
    assert!(matches!(err, DictErr::NonFiniteInput { row: 4, col: 2 }));

    let err = engine.partial_fit(x.view(), Some(&[0, 1, 2][..])).unwrap_err();
    assert!(matches!(err, DictErr::SizeMismatch { what: "sample indices", .. }));

    let indices: Vec<_> = (5..15).collect();
    let err = engine
        .partial_fit(x.view(), Some(indices.as_slice()))
        .unwrap_err();
    assert!(matches!(
        err,
        DictErr::SampleOutOfBounds {
            index: 10,
            n_samples: 10
        }
    ));
    assert_eq!(err.kind(), ErrKind::Input);

    assert_eq!(engine.total_counter(), 10);
    assert_eq!(engine.dictionary().unwrap(), &dictionary);
}

#[test]
fn initial_dictionary_is_used_and_shape_checked() {
    let (x, _) = low_rank(10, 4, 2, 0.1, 11);

    let config = DictFactConfig {
        n_components: nz(2),
        dict_init: Some(Array2::zeros((2, 5))),
        ..base_config()
    };
    let mut engine = DictFact::new(config).unwrap();
    let err = engine.partial_fit(x.view(), None).unwrap_err();
    assert!(matches!(err, DictErr::DictInitShape { .. }));
    assert!(!engine.is_initialized());

    let init = ndarray::array![[2., 0., 0., 0.], [0., 0., 3., 0.]];
    let config = DictFactConfig {
        n_components: nz(2),
        dict_init: Some(init),
        ..base_config()
    };
    let mut engine = DictFact::new(config).unwrap();
    engine.partial_fit(x.slice(s![..0, ..]), None).unwrap();
    assert!(!engine.is_initialized());

    engine
        .set_params(ConfigDelta::new().max_n_iter(1).batch_size(nz(1)))
        .unwrap();
    engine.partial_fit(x.view(), None).unwrap();
    assert!(engine.is_initialized());
    assert_eq!(engine.total_counter(), 1);
}

#[test]
fn unobserved_features_leave_codes_and_statistics_unchanged() {
    let (x, _) = low_rank(20, 10, 2, 0.1, 12);

    for solver in [Solver::Masked, Solver::Gram, Solver::Average] {
        let config = DictFactConfig {
            reduction: 2.,
            solver,
            ..base_config()
        };

        let (engine, batches) = recorded_run(&config, x.view());
        assert_eq!(batches.len(), 5);

        // Shift every feature a mini-batch didn't observe.
        let mut shifted = x.clone();
        for (batch, (_, subset)) in batches.iter().enumerate() {
            for row in batch * 4..(batch + 1) * 4 {
                for j in (0..10).filter(|j| !subset.contains(j)) {
                    shifted[[row, j]] += 5.;
                }
            }
        }

        let (shifted_engine, shifted_batches) = recorded_run(&config, shifted.view());

        assert_eq!(batches, shifted_batches, "{solver}: codes moved");
        assert_eq!(engine.b(), shifted_engine.b(), "{solver}");
        assert_eq!(engine.a(), shifted_engine.a(), "{solver}");
        assert_eq!(engine.dictionary(), shifted_engine.dictionary(), "{solver}");
    }
}

#[test]
fn every_solver_counts_each_sample() {
    let (x, _) = low_rank(30, 8, 2, 0.1, 14);

    for solver in [Solver::Masked, Solver::Gram, Solver::Average] {
        let config = DictFactConfig {
            reduction: 2.,
            solver,
            n_epochs: nz(2),
            ..base_config()
        };

        let mut engine = DictFact::new(config).unwrap();
        engine.fit(x.view()).unwrap();

        let samples = engine.sample_counter().unwrap();
        assert_eq!(samples.sum(), engine.total_counter(), "{solver}");
        assert!(samples.iter().all(|&c| c == 2), "{solver}: {samples:?}");
    }
}

#[test]
fn unpenalized_codes_with_more_atoms_than_observed_features() {
    let (x, _) = low_rank(40, 10, 3, 0.1, 15);

    for solver in [Solver::Masked, Solver::Gram] {
        let config = DictFactConfig {
            alpha: 0.,
            reduction: 4.,
            solver,
            ..base_config()
        };

        let mut engine = DictFact::new(config).unwrap();
        assert_eq!(engine.fit(x.view()).unwrap(), 40, "{solver}");
        assert!(engine.dictionary().unwrap().iter().all(|v| v.is_finite()));
    }
}

#[test]
fn subsampled_dictionary_matches_full_dictionary_on_average() {
    // Three unit atoms on disjoint blocks of four features.
    let atoms = Array2::from_shape_fn((3, 12), |(k, j)| if j / 4 == k { 0.5 } else { 0. });

    let mut rng = StdRng::seed_from_u64(16);
    let mut x = Array2::<f64>::random_using((300, 12), StandardNormal, &mut rng) * 0.01;
    for (i, mut row) in x.rows_mut().into_iter().enumerate() {
        let sign = if rng.random::<bool>() { 1. } else { -1. };
        row.scaled_add(sign * (1. + 2. * rng.random::<f64>()), &atoms.row(i % 3));
    }
    let init = &atoms + &(Array2::<f64>::random_using((3, 12), StandardNormal, &mut rng) * 0.3);

    let learn = |reduction: f64, seed: u64| {
        let config = DictFactConfig {
            alpha: 0.1,
            pen_l1_ratio: 1.,
            reduction,
            solver: Solver::Gram,
            batch_size: nz(5),
            n_epochs: nz(5),
            random_state: Some(seed),
            dict_init: Some(init.clone()),
            ..base_config()
        };

        let mut engine = DictFact::new(config).unwrap();
        engine.fit(x.view()).unwrap();
        aligned(&engine.components().unwrap(), &atoms)
    };

    let full = learn(1., 0);
    let seeds = 8;
    let mean = (0..seeds).fold(Array2::<f64>::zeros((3, 12)), |acc, seed| {
        acc + learn(2., seed)
    }) / seeds as f64;

    let gap = (&mean - &full).iter().fold(0f64, |max, d| max.max(d.abs()));
    assert!(gap < 0.1, "averaged subsampled dictionary is {gap} away\n{mean}\n{full}");
}
