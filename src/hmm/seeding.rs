//! Starting parameters for a fresh engine.
//!
//! The engine never draws random numbers itself; it asks a [`ParameterSeeder`]
//! for raw tables and normalises them. Tests plug in a seeded RNG.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Unnormalised starting tables and per-state Gaussian parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SeededParameters {
    pub initial: Array1<f64>,
    pub transition: Array2<f64>,
    pub emission: Array2<f64>,
    pub means: Array1<f64>,
    pub stds: Array1<f64>,
}

pub trait ParameterSeeder {
    fn seed(&mut self, num_states: usize, num_symbols: usize) -> SeededParameters;
}

/// Uniform draws for every probability, means in [-1%, 1%) and stds in [0, 2%)
#[derive(Debug, Clone)]
pub struct RandomSeeder<R: Rng = StdRng> {
    rng: R,
}

impl RandomSeeder<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> RandomSeeder<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> ParameterSeeder for RandomSeeder<R> {
    fn seed(&mut self, num_states: usize, num_symbols: usize) -> SeededParameters {
        let rng = &mut self.rng;
        SeededParameters {
            initial: Array1::from_shape_fn(num_states, |_| rng.gen::<f64>()),
            transition: Array2::from_shape_fn((num_states, num_states), |_| rng.gen::<f64>()),
            emission: Array2::from_shape_fn((num_states, num_symbols), |_| rng.gen::<f64>()),
            means: Array1::from_shape_fn(num_states, |_| rng.gen_range(-0.01..0.01)),
            stds: Array1::from_shape_fn(num_states, |_| rng.gen_range(0.0..0.02)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        let params = RandomSeeder::seeded(7).seed(3, 100);
        assert_eq!(params.initial.len(), 3);
        assert_eq!(params.transition.shape(), &[3, 3]);
        assert_eq!(params.emission.shape(), &[3, 100]);
        assert_eq!(params.means.len(), 3);
        assert_eq!(params.stds.len(), 3);
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let a = RandomSeeder::seeded(42).seed(4, 10);
        let b = RandomSeeder::seeded(42).seed(4, 10);
        let c = RandomSeeder::seeded(43).seed(4, 10);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_draw_ranges() {
        let params = RandomSeeder::seeded(1).seed(50, 5);
        assert!(params.means.iter().all(|&m| (-0.01..0.01).contains(&m)));
        assert!(params.stds.iter().all(|&s| (0.0..0.02).contains(&s)));
        assert!(params.transition.iter().all(|&p| (0.0..1.0).contains(&p)));
    }
}
