// Pointer colors and click impulses draw from one thread-local generator.
// A seed string makes a run repeatable.

use rand::prelude::*;
use rand_pcg::Pcg32;
use rand_seeder::Seeder;
use std::cell::RefCell;

thread_local!(
    static PLUME_RNG: RefCell<Pcg32> = RefCell::new(Pcg32::from_rng(&mut rand::rng()))
);

/// Reseed the generator. Without a seed, fall back to OS entropy.
pub fn reseed(seed: Option<&str>) {
    let rng = match seed {
        Some(seed) => Seeder::from(seed).into_rng(),
        None => Pcg32::from_rng(&mut rand::rng()),
    };

    PLUME_RNG.with(|cell| cell.replace(rng));
}

/// A uniform sample in `[0, 1)`.
pub fn unit() -> f32 {
    PLUME_RNG.with(|rng| rng.borrow_mut().random::<f32>())
}

/// A uniform sample in `[-scale / 2, scale / 2)`.
pub fn centered(scale: f32) -> f32 {
    scale * (unit() - 0.5)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        reseed(Some("plume"));
        let first: Vec<f32> = (0..8).map(|_| unit()).collect();

        reseed(Some("plume"));
        let second: Vec<f32> = (0..8).map(|_| unit()).collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|value| (0.0..1.0).contains(value)));
    }

    #[test]
    fn centered_samples_straddle_zero() {
        reseed(Some("centered"));

        let samples: Vec<f32> = (0..64).map(|_| centered(30.0)).collect();
        assert!(samples.iter().all(|value| (-15.0..15.0).contains(value)));
        assert!(samples.iter().any(|value| *value < 0.0));
        assert!(samples.iter().any(|value| *value > 0.0));
    }
}
