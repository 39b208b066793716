//! Dataset records and the per-dataset directory layout.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, DatasetResult};

/// Ordinal diabetic-retinopathy severity, from 0 (no DR) to 4 (proliferative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Grade(u8);

impl Grade {
    /// Number of distinct grades.
    pub const COUNT: usize = 5;

    /// Highest valid grade.
    pub const MAX: u8 = 4;

    /// Creates a grade, rejecting values above [`Grade::MAX`].
    pub fn new(value: u8) -> DatasetResult<Self> {
        if value > Self::MAX {
            return Err(DatasetError::InvalidGrade {
                value: i64::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Parses a single ASCII digit into a grade.
    pub fn from_digit(c: char) -> Option<Self> {
        c.to_digit(10)
            .and_then(|d| u8::try_from(d).ok())
            .and_then(|d| Self::new(d).ok())
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Index into a per-grade array such as a histogram or logits.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// All grades in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..=Self::MAX).map(Self)
    }
}

impl TryFrom<i64> for Grade {
    type Error = DatasetError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
            .ok_or(DatasetError::InvalidGrade { value })
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> Self {
        grade.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The public dataset a record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "FGADR")]
    Fgadr,
    #[serde(rename = "IDRiD")]
    Idrid,
    #[serde(rename = "DIARETDB1")]
    Diaretdb1,
}

impl Source {
    /// The tag written to the `Source` CSV column.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Fgadr => "FGADR",
            Self::Idrid => "IDRiD",
            Self::Diaretdb1 => "DIARETDB1",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Source {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FGADR" => Ok(Self::Fgadr),
            "IDRiD" => Ok(Self::Idrid),
            "DIARETDB1" => Ok(Self::Diaretdb1),
            other => Err(DatasetError::UnknownSource {
                tag: other.to_string(),
            }),
        }
    }
}

/// Root directories holding the images, lesion labels and instance maps of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    pub image_dir: PathBuf,
    pub label_dir: PathBuf,
    pub instance_dir: PathBuf,
}

impl DatasetLayout {
    /// Subdirectory of a processed dataset holding the fundus images.
    pub const IMAGE_SUBDIR: &'static str = "img";
    /// Subdirectory of a processed dataset holding the lesion label maps.
    pub const LABEL_SUBDIR: &'static str = "label";
    /// Subdirectory of a processed dataset holding the instance maps.
    pub const INSTANCE_SUBDIR: &'static str = "inst";

    pub fn new(
        image_dir: impl Into<PathBuf>,
        label_dir: impl Into<PathBuf>,
        instance_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image_dir: image_dir.into(),
            label_dir: label_dir.into(),
            instance_dir: instance_dir.into(),
        }
    }

    /// Layout of a dataset written by the preprocessing step: `<root>/img`,
    /// `<root>/label` and `<root>/inst`.
    pub fn processed(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(
            root.join(Self::IMAGE_SUBDIR),
            root.join(Self::LABEL_SUBDIR),
            root.join(Self::INSTANCE_SUBDIR),
        )
    }

    /// Joins `file` onto each root, returning `(image, label, instance)`.
    pub fn record_paths(&self, file: &str) -> (PathBuf, PathBuf, PathBuf) {
        (
            self.image_dir.join(file),
            self.label_dir.join(file),
            self.instance_dir.join(file),
        )
    }

    /// Builds a complete record for `file`.
    pub fn record(&self, index: usize, file: &str, grade: Grade, source: Source) -> DatasetRecord {
        let (image, label, instance) = self.record_paths(file);
        DatasetRecord {
            index,
            file: file.to_string(),
            image,
            label,
            instance,
            grade,
            source,
        }
    }
}

/// One fundus image with its lesion maps, grade and originating dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRecord {
    /// Row label within the originating dataset, written to the CSV index column.
    pub index: usize,
    /// Bare filename shared by the image, label and instance files.
    pub file: String,
    pub image: PathBuf,
    pub label: PathBuf,
    pub instance: PathBuf,
    pub grade: Grade,
    pub source: Source,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_accepts_zero_through_four() {
        for value in 0..=4u8 {
            assert_eq!(Grade::new(value).unwrap().value(), value);
        }
        assert!(matches!(
            Grade::new(5),
            Err(DatasetError::InvalidGrade { value: 5 })
        ));
        assert!(Grade::try_from(-1i64).is_err());
        assert_eq!(Grade::all().count(), Grade::COUNT);
    }

    #[test]
    fn grade_from_digit_rejects_non_digits() {
        assert_eq!(Grade::from_digit('3'), Some(Grade(3)));
        assert_eq!(Grade::from_digit('7'), None);
        assert_eq!(Grade::from_digit('x'), None);
    }

    #[test]
    fn source_tags_round_trip_through_from_str() {
        for source in [Source::Fgadr, Source::Idrid, Source::Diaretdb1] {
            assert_eq!(source.tag().parse::<Source>().unwrap(), source);
        }
        assert!("idrid".parse::<Source>().is_err());
    }

    #[test]
    fn processed_layout_uses_img_label_inst() {
        let layout = DatasetLayout::processed("/data/idrid");
        let (image, label, instance) = layout.record_paths("IDRiD_01.png");

        assert_eq!(image, PathBuf::from("/data/idrid/img/IDRiD_01.png"));
        assert_eq!(label, PathBuf::from("/data/idrid/label/IDRiD_01.png"));
        assert_eq!(instance, PathBuf::from("/data/idrid/inst/IDRiD_01.png"));
    }

    #[test]
    fn record_carries_index_and_source() {
        let layout = DatasetLayout::new("/a/img", "/b/label", "/b/inst");
        let record = layout.record(7, "0007_2.png", Grade(2), Source::Fgadr);

        assert_eq!(record.index, 7);
        assert_eq!(record.file, "0007_2.png");
        assert_eq!(record.image, PathBuf::from("/a/img/0007_2.png"));
        assert_eq!(record.label, PathBuf::from("/b/label/0007_2.png"));
        assert_eq!(record.instance, PathBuf::from("/b/inst/0007_2.png"));
        assert_eq!(record.source, Source::Fgadr);
    }
}
