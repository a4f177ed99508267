//! Attachment-point environment fingerprints and the comparisons used to
//! filter transforms by them.

use crate::error::{MmpError, Result};
use crate::molecule::Molecule;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Heavy-atom counts around each attachment point of a fragment.
///
/// Position `(label - 1) * radius + (d - 1)` holds the number of heavy atoms
/// at bond distance `d` from the attachment point labeled `label`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentFingerprint {
    counts: Vec<f64>,
    radius: usize,
}

impl AttachmentFingerprint {
    pub fn new(mol: &Molecule, radius: usize) -> Self {
        let mut points: Vec<(u16, _)> = mol
            .attachment_points()
            .into_iter()
            .map(|n| (mol.atom(n).isotope.unwrap_or(0), n))
            .collect();
        points.sort();

        let graph = mol.graph();
        let mut counts = vec![0.0; points.len() * radius];
        for (slot, (_, start)) in points.iter().enumerate() {
            let mut seen = HashSet::from([*start]);
            let mut queue = VecDeque::from([(*start, 0usize)]);
            while let Some((atom, d)) = queue.pop_front() {
                if d >= radius {
                    continue;
                }
                for next in graph.neighbors(atom) {
                    if !seen.insert(next) {
                        continue;
                    }
                    if graph[next].element.is_heavy() {
                        counts[slot * radius + d] += 1.0;
                    }
                    queue.push_back((next, d + 1));
                }
            }
        }
        Self { counts, radius }
    }

    pub fn from_smiles(smiles: &str, radius: usize) -> Result<Self> {
        Ok(Self::new(&Molecule::from_smiles(smiles)?, radius))
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn radius(&self) -> usize {
        self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintComparison {
    TotalDifference,
    MaxDifference,
    Tanimoto,
    Dice,
    Cosine,
    Euclidean,
    Hamming,
    Soergel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    #[default]
    Similarity,
    Distance,
}

impl FingerprintComparison {
    /// Comparisons that are only meaningful as a distance.
    pub fn is_distance_only(self) -> bool {
        matches!(self, Self::TotalDifference | Self::MaxDifference)
    }

    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        let pairs = || a.iter().zip(b);
        match self {
            Self::TotalDifference => pairs().map(|(x, y)| (x - y).abs()).sum(),
            Self::MaxDifference => pairs().map(|(x, y)| (x - y).abs()).fold(0.0, f64::max),
            Self::Euclidean => pairs().map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt(),
            Self::Hamming => pairs().filter(|(x, y)| (**x > 0.0) != (**y > 0.0)).count() as f64,
            Self::Soergel => {
                let max: f64 = pairs().map(|(x, y)| x.max(*y)).sum();
                if max == 0.0 {
                    0.0
                } else {
                    pairs().map(|(x, y)| (x - y).abs()).sum::<f64>() / max
                }
            }
            Self::Tanimoto | Self::Dice | Self::Cosine => 1.0 - self.similarity(a, b),
        }
    }

    pub fn similarity(self, a: &[f64], b: &[f64]) -> f64 {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let aa: f64 = a.iter().map(|x| x * x).sum();
        let bb: f64 = b.iter().map(|y| y * y).sum();
        match self {
            Self::Tanimoto => {
                let denominator = aa + bb - dot;
                if denominator == 0.0 {
                    1.0
                } else {
                    dot / denominator
                }
            }
            Self::Dice => {
                if aa + bb == 0.0 {
                    1.0
                } else {
                    2.0 * dot / (aa + bb)
                }
            }
            Self::Cosine => {
                if aa == 0.0 || bb == 0.0 {
                    if aa == bb {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    dot / (aa.sqrt() * bb.sqrt())
                }
            }
            Self::Soergel => 1.0 - self.distance(a, b),
            Self::TotalDifference | Self::MaxDifference | Self::Euclidean | Self::Hamming => {
                1.0 / (1.0 + self.distance(a, b))
            }
        }
    }
}

impl Display for FingerprintComparison {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{self:?}")
    }
}

/// Accept a pair when its score is on the right side of `threshold`:
/// similarities must reach it, distances must not exceed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintFilter {
    pub comparison: FingerprintComparison,
    #[serde(default)]
    pub kind: ScoreKind,
    pub threshold: f64,
    #[serde(default = "default_radius")]
    pub radius: usize,
}

fn default_radius() -> usize {
    2
}

impl FingerprintFilter {
    pub fn validate(&self) -> Result<()> {
        if self.comparison.is_distance_only() && self.kind == ScoreKind::Similarity {
            return Err(MmpError::InvalidConfiguration(format!(
                "{} is a distance, not a similarity",
                self.comparison
            )));
        }
        if self.radius == 0 {
            return Err(MmpError::InvalidConfiguration(
                "fingerprint radius must be at least 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(MmpError::InvalidConfiguration(
                "fingerprint threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn score(&self, a: &AttachmentFingerprint, b: &AttachmentFingerprint) -> f64 {
        match self.kind {
            ScoreKind::Similarity => self.comparison.similarity(a.counts(), b.counts()),
            ScoreKind::Distance => self.comparison.distance(a.counts(), b.counts()),
        }
    }

    pub fn accepts(&self, a: &AttachmentFingerprint, b: &AttachmentFingerprint) -> bool {
        if a.counts().len() != b.counts().len() {
            return false;
        }
        let score = self.score(a, b);
        match self.kind {
            ScoreKind::Similarity => score >= self.threshold,
            ScoreKind::Distance => score <= self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(smiles: &str) -> AttachmentFingerprint {
        AttachmentFingerprint::from_smiles(smiles, 3).unwrap()
    }

    #[test]
    fn test_shell_counts() {
        // [1*]-C-C(-C)-O: one carbon at distance 1 and 2, then C and O at 3.
        assert_eq!(fp("[1*]CC(C)O").counts(), &[1.0, 1.0, 2.0][..]);
        let two = fp("[1*]CO[2*]");
        assert_eq!(two.counts(), &[1.0, 1.0, 0.0, 1.0, 1.0, 0.0][..]);
        assert_eq!(fp("[1*][H]").counts(), &[0.0, 0.0, 0.0][..]);
    }

    #[test]
    fn test_labels_order_positions() {
        let a = fp("[2*]C.[1*]CCC");
        assert_eq!(&a.counts()[..3], &[1.0, 1.0, 1.0]);
        assert_eq!(&a.counts()[3..], &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_identical_vectors() {
        let v = [1.0, 2.0, 0.0];
        for comparison in [
            FingerprintComparison::Tanimoto,
            FingerprintComparison::Dice,
            FingerprintComparison::Cosine,
            FingerprintComparison::Euclidean,
            FingerprintComparison::Hamming,
            FingerprintComparison::Soergel,
        ] {
            assert!((comparison.similarity(&v, &v) - 1.0).abs() < 1e-12, "{comparison}");
            assert!(comparison.distance(&v, &v).abs() < 1e-12, "{comparison}");
        }
    }

    #[test]
    fn test_known_values() {
        let a = [1.0, 2.0, 0.0];
        let b = [1.0, 0.0, 3.0];
        assert_eq!(FingerprintComparison::TotalDifference.distance(&a, &b), 5.0);
        assert_eq!(FingerprintComparison::MaxDifference.distance(&a, &b), 3.0);
        assert_eq!(FingerprintComparison::Hamming.distance(&a, &b), 2.0);
        // dot 1, |a|^2 5, |b|^2 10
        assert!((FingerprintComparison::Tanimoto.similarity(&a, &b) - 1.0 / 14.0).abs() < 1e-12);
        assert!((FingerprintComparison::Dice.similarity(&a, &b) - 2.0 / 15.0).abs() < 1e-12);
        assert!((FingerprintComparison::Soergel.distance(&a, &b) - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_filter_directions() {
        let a = fp("[1*]CC(C)O");
        let b = fp("[1*]CCO");
        let similar = FingerprintFilter {
            comparison: FingerprintComparison::Tanimoto,
            kind: ScoreKind::Similarity,
            threshold: 0.5,
            radius: 3,
        };
        assert!(similar.accepts(&a, &b));
        let strict = FingerprintFilter {
            threshold: 0.99,
            ..similar.clone()
        };
        assert!(!strict.accepts(&a, &b));
        let distance = FingerprintFilter {
            comparison: FingerprintComparison::TotalDifference,
            kind: ScoreKind::Distance,
            threshold: 1.0,
            radius: 3,
        };
        assert!(distance.accepts(&a, &b));
        assert!(!distance.accepts(&a, &fp("[1*]C")));
        assert!(!distance.accepts(&a, &fp("[1*]CO[2*]")));
    }

    #[test]
    fn test_validate() {
        let bad = FingerprintFilter {
            comparison: FingerprintComparison::MaxDifference,
            kind: ScoreKind::Similarity,
            threshold: 1.0,
            radius: 2,
        };
        assert!(bad.validate().is_err());
        assert!(FingerprintFilter {
            kind: ScoreKind::Distance,
            ..bad
        }
        .validate()
        .is_ok());
    }
}
