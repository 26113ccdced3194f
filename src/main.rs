use std::{env, fs, num::NonZeroUsize};

use anyhow::Context;
use log::info;
use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

use modl::{DictFact, DictFactConfig, Solver};

const N_SAMPLES: usize = 500;
const N_FEATURES: usize = 40;
const RANK: usize = 5;
const NOISE: f64 = 0.05;

/// A rank `RANK` stream with gaussian noise.
fn low_rank_data(rng: &mut StdRng) -> Array2<f64> {
    let basis = Array2::<f64>::random_using((RANK, N_FEATURES), StandardNormal, rng);
    let weights = Array2::<f64>::random_using((N_SAMPLES, RANK), StandardNormal, rng);
    let noise = Array2::<f64>::random_using((N_SAMPLES, N_FEATURES), StandardNormal, rng);

    weights.dot(&basis) + noise * NOISE
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {path}"))?;
            DictFactConfig::from_json(&json)?
        }
        None => DictFactConfig {
            n_components: NonZeroUsize::new(RANK).context("zero components")?,
            alpha: 0.01,
            batch_size: NonZeroUsize::new(10).context("zero batch size")?,
            reduction: 4.,
            solver: Solver::Average,
            n_epochs: NonZeroUsize::new(5).context("zero epochs")?,
            random_state: Some(0),
            verbose: 1,
            ..Default::default()
        },
    };

    let mut rng = StdRng::seed_from_u64(config.random_state.unwrap_or(0));
    let x = low_rank_data(&mut rng);

    let mut engine = DictFact::new(config)?;
    let before = {
        let mut baseline = DictFact::new(engine.config().clone())?;
        baseline.partial_fit(x.slice(ndarray::s![..1, ..]), None)?;
        baseline.score(x.view())?
    };

    let processed = engine.fit(x.view())?;
    let after = engine.score(x.view())?;

    info!(
        processed = processed,
        initial_score = before,
        final_score = after;
        "fit done"
    );
    println!("processed {processed} samples, score {before:.4} -> {after:.4}");

    Ok(())
}
