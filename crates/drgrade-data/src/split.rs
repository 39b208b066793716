//! Seeded train/test splitting of assembled records.

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{DatasetError, DatasetResult};

/// Subset sizes for `n` items at the given train fraction.
///
/// The train subset gets `floor(train_size * n)` items and the test subset
/// the rest; both must end up non-empty.
pub fn split_sizes(n: usize, train_size: f64) -> DatasetResult<(usize, usize)> {
    let invalid = |reason: String| DatasetError::InvalidSplit { train_size, reason };

    if !(train_size > 0.0 && train_size < 1.0) {
        return Err(invalid("must be strictly between 0 and 1".to_string()));
    }

    let n_train = ((train_size * n as f64).floor() as usize).min(n);
    let n_test = n - n_train;

    if n_train == 0 || n_test == 0 {
        return Err(invalid(format!(
            "{n} records give {n_train} train and {n_test} test records"
        )));
    }

    Ok((n_train, n_test))
}

/// Shuffles `items` with a ChaCha8 stream seeded by `seed` and splits them
/// into `(train, test)`.
///
/// Items are moved, so any per-item index labels survive the split.
pub fn train_test_split<T>(
    items: Vec<T>,
    train_size: f64,
    seed: u64,
) -> DatasetResult<(Vec<T>, Vec<T>)> {
    let (n_train, n_test) = split_sizes(items.len(), train_size)?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut items = items;
    items.shuffle(&mut rng);

    let train = items.split_off(n_test);
    let test = items;
    debug_assert_eq!(train.len(), n_train);

    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn train_side_is_rounded_down() {
        assert_eq!(split_sizes(10, 0.8).unwrap(), (8, 2));
        assert_eq!(split_sizes(10, 0.7).unwrap(), (7, 3));
        assert_eq!(split_sizes(11, 0.8).unwrap(), (8, 3));
        assert_eq!(split_sizes(3, 0.5).unwrap(), (1, 2));
    }

    #[test]
    fn rejects_fractions_outside_the_open_interval() {
        for bad in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            assert!(split_sizes(10, bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn rejects_splits_that_leave_a_subset_empty() {
        assert!(split_sizes(1, 0.8).is_err());
        assert!(split_sizes(0, 0.5).is_err());
    }

    #[test]
    fn split_is_a_partition() {
        let (train, test) = train_test_split((0..100).collect(), 0.75, 7).unwrap();

        assert_eq!(train.len(), 75);
        assert_eq!(test.len(), 25);

        let all: HashSet<_> = train.iter().chain(test.iter()).copied().collect();
        assert_eq!(all.len(), 100);
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        let a = train_test_split((0..50).collect::<Vec<_>>(), 0.8, 42).unwrap();
        let b = train_test_split((0..50).collect::<Vec<_>>(), 0.8, 42).unwrap();
        let c = train_test_split((0..50).collect::<Vec<_>>(), 0.8, 43).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.0, c.0);
    }
}
