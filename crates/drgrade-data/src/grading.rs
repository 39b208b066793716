//! Grade assignment for datasets that ship without DR grades.
//!
//! IDRiD and DIARETDB1 are segmentation datasets, so their images have no
//! grade in the processed layout. A [`GradeOracle`] fills the gap: either a
//! trained classifier (see `drgrade-model`) or uniformly random noisy
//! grades.

use std::path::Path;

use rand::Rng;

use crate::{error::DatasetResult, record::Grade};

/// Assigns a DR grade to a fundus image.
pub trait GradeOracle {
    /// Returns the grade for the image at `image`.
    fn grade(&mut self, image: &Path) -> DatasetResult<Grade>;

    /// Short name used in log output.
    fn name(&self) -> &'static str;
}

/// Draws grades uniformly from `0..=4`, ignoring the image.
pub struct RandomGrades<R> {
    rng: R,
}

impl<R: Rng> RandomGrades<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> GradeOracle for RandomGrades<R> {
    fn grade(&mut self, _image: &Path) -> DatasetResult<Grade> {
        Grade::new(self.rng.random_range(0..=Grade::MAX))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

impl<O: GradeOracle + ?Sized> GradeOracle for &mut O {
    fn grade(&mut self, image: &Path) -> DatasetResult<Grade> {
        (**self).grade(image)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn random_grades_cover_the_full_range() {
        let mut oracle = RandomGrades::new(ChaCha8Rng::seed_from_u64(0));
        let mut seen = [false; Grade::COUNT];

        for _ in 0..500 {
            let grade = oracle.grade(Path::new("unused.png")).unwrap();
            seen[grade.index()] = true;
        }

        assert!(seen.iter().all(|s| *s), "every grade should be drawn: {seen:?}");
    }

    #[test]
    fn random_grades_are_reproducible_for_a_seed() {
        let draw = |seed| {
            let mut oracle = RandomGrades::new(ChaCha8Rng::seed_from_u64(seed));
            (0..20)
                .map(|_| oracle.grade(Path::new("x.png")).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(draw(42), draw(42));
    }
}
