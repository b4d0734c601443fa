//! Deterministic distributions for unit tests of the simulator.

#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::default_trait_access,
    clippy::cast_precision_loss
)]

use std::cell::Cell;

use rand::distributions::Distribution;

/// This distribution produces values between 0 and `N - 1` by requesting the `next_u32` from the
/// random number generator and applying `mod N` operation on it.
///
/// This is meant for testing, e.g., together with `rand::rngs::mock::StepRng` it can produce
/// predictable values that can be used in unit tests.
pub struct WrappingEchoDistribution<T> {
    size: T,
}

impl<T> WrappingEchoDistribution<T> {
    /// Constructs a new distribution generating values between 0 and `size - 1`.
    pub fn new(size: T) -> Self {
        Self { size }
    }
}

impl<T> Distribution<T> for WrappingEchoDistribution<T>
where
    T: std::convert::TryFrom<u32> + std::ops::Rem<T, Output = T> + Copy,
    <T as std::convert::TryFrom<u32>>::Error: std::fmt::Debug,
{
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> T {
        T::try_from(rng.next_u32()).unwrap() % self.size
    }
}

/// A wrapper over a distribution generating integer values that casts them to simulation times.
pub struct ToFloatDistribution<D>(D);

impl<D> ToFloatDistribution<D> {
    /// Constructs a float distribution from an integer one.
    pub fn new(dist: D) -> Self {
        Self(dist)
    }
}

impl<D> Distribution<f64> for ToFloatDistribution<D>
where
    D: Distribution<u64>,
{
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.0.sample(rng) as f64
    }
}

/// Cycles through a fixed list of values, ignoring the random number generator entirely.
///
/// ```
/// # use rand::distributions::Distribution;
/// # use testing::Sequence;
/// let mut rng = rand::thread_rng();
/// let dist = Sequence::new(vec![1.0, 2.5]);
/// let values: Vec<f64> = (0..3).map(|_| dist.sample(&mut rng)).collect();
/// assert_eq!(values, vec![1.0, 2.5, 1.0]);
/// ```
pub struct Sequence<T> {
    values: Vec<T>,
    next: Cell<usize>,
}

impl<T> Sequence<T> {
    /// Constructs a distribution repeating `values` in order.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty.
    pub fn new(values: Vec<T>) -> Self {
        assert!(!values.is_empty(), "sequence must not be empty");
        Self {
            values,
            next: Cell::new(0),
        }
    }
}

impl<T: Copy> Distribution<T> for Sequence<T> {
    fn sample<R: rand::Rng + ?Sized>(&self, _: &mut R) -> T {
        let idx = self.next.get();
        self.next.set((idx + 1) % self.values.len());
        self.values[idx]
    }
}
