use crate::error::{MmpError, Result};
use crate::fingerprint::FingerprintFilter;
use crate::pattern::BondPattern;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::*;

/// Upper bound on the number of cuts per fragmentation.
pub const MAX_CUTS: usize = 10;

/// When explicit hydrogens enter and leave the molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrogenMode {
    /// Add explicit hydrogens before cutting and strip them from the
    /// resulting Keys and Values.
    Before,
    /// Cut the molecule as given, then strip explicit hydrogens from the
    /// resulting Keys and Values.
    After,
    #[default]
    None,
}

impl HydrogenMode {
    pub fn adds_hydrogens(self) -> bool {
        self == Self::Before
    }

    pub fn strips_hydrogens(self) -> bool {
        self != Self::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentationOptions {
    pub bond_pattern: BondPattern,
    pub min_cuts: usize,
    pub max_cuts: usize,
    pub hydrogen_mode: HydrogenMode,
    /// Molecules whose estimated number of cut combinations exceeds this
    /// are rejected before any cutting.
    pub complexity_ceiling: Option<u64>,
    pub max_changing_heavy_atoms: Option<usize>,
    pub min_constant_to_changing_ratio: Option<f64>,
    /// Emit a `[1*]-[2*]` Value for each matching bond when two cuts are
    /// requested.
    pub allow_two_cuts_to_bond_value: bool,
}

impl Default for FragmentationOptions {
    fn default() -> Self {
        Self {
            bond_pattern: BondPattern::default(),
            min_cuts: 1,
            max_cuts: 1,
            hydrogen_mode: HydrogenMode::None,
            complexity_ceiling: Some(100_000),
            max_changing_heavy_atoms: None,
            min_constant_to_changing_ratio: None,
            allow_two_cuts_to_bond_value: false,
        }
    }
}

impl FragmentationOptions {
    pub fn cut_range(&self) -> std::ops::RangeInclusive<usize> {
        self.min_cuts..=self.max_cuts
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_cuts == 0 || self.min_cuts > self.max_cuts || self.max_cuts > MAX_CUTS {
            return Err(MmpError::InvalidConfiguration(format!(
                "cut range {}..={} must lie within 1..={MAX_CUTS}",
                self.min_cuts, self.max_cuts
            )));
        }
        if self.complexity_ceiling == Some(0) {
            return Err(MmpError::InvalidConfiguration(
                "complexity ceiling must be positive".to_string(),
            ));
        }
        if let Some(ratio) = self.min_constant_to_changing_ratio {
            if !(ratio.is_finite() && ratio >= 0.0) {
                return Err(MmpError::InvalidConfiguration(format!(
                    "constant to changing ratio {ratio} must be a non-negative number"
                )));
            }
        }
        self.bond_pattern.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingOptions {
    pub allow_self_transforms: bool,
    pub include_reverse: bool,
    /// Accepted range of `right - left` changing heavy atoms, inclusive.
    pub delta_heavy_atom_range: Option<(i64, i64)>,
    pub fingerprint: Option<FingerprintFilter>,
    pub include_key: bool,
    pub include_heavy_atom_counts: bool,
    pub include_ratios: bool,
    /// Input rows are sorted by Key, so pairs are only sought within runs of
    /// equal Keys.
    pub sorted_by_key: bool,
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self {
            allow_self_transforms: false,
            include_reverse: true,
            delta_heavy_atom_range: None,
            fingerprint: None,
            include_key: true,
            include_heavy_atom_counts: false,
            include_ratios: false,
            sorted_by_key: false,
        }
    }
}

impl PairingOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some((min, max)) = self.delta_heavy_atom_range {
            if min > max {
                return Err(MmpError::InvalidConfiguration(format!(
                    "heavy atom delta range [{min}, {max}] is empty"
                )));
            }
        }
        match &self.fingerprint {
            Some(filter) => filter.validate(),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    pub threads: usize,
    pub queue_capacity: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            threads,
            queue_capacity: threads * 4,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 || self.queue_capacity == 0 {
            return Err(MmpError::InvalidConfiguration(
                "threads and queue capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Column names for the tabular input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    pub smiles_column: String,
    pub id_column: String,
    /// Write the failure reason as an extra column of the reject output.
    pub include_reject_reason: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            smiles_column: "smiles".to_string(),
            id_column: "id".to_string(),
            include_reject_reason: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MmpConfig {
    pub fragmentation: FragmentationOptions,
    pub pairing: PairingOptions,
    pub batch: BatchOptions,
    pub table: TableOptions,
}

impl MmpConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading configuration from {}", path.display());
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Check every option. Nothing is processed with an invalid configuration.
    pub fn validate(&self) -> Result<()> {
        self.fragmentation.validate()?;
        self.pairing.validate()?;
        self.batch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{FingerprintComparison, ScoreKind};

    #[test]
    fn test_defaults_are_valid() {
        let config = MmpConfig::default();
        config.validate().unwrap();
        assert_eq!(config.fragmentation.bond_pattern, BondPattern::HussainRea);
        assert_eq!(config.fragmentation.cut_range(), 1..=1);
    }

    #[test]
    fn test_cut_range_bounds() {
        let mut options = FragmentationOptions::default();
        options.max_cuts = MAX_CUTS + 1;
        assert!(matches!(options.validate(), Err(MmpError::InvalidConfiguration(_))));
        options.max_cuts = 3;
        options.min_cuts = 4;
        assert!(options.validate().is_err());
        options.min_cuts = 0;
        assert!(options.validate().is_err());
        options.min_cuts = 2;
        options.validate().unwrap();
    }

    #[test]
    fn test_bad_pattern_is_a_configuration_error() {
        let options = FragmentationOptions {
            bond_pattern: BondPattern::Custom("[*:1]-[*:2]".to_string()),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(MmpError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_from_json() {
        let config = MmpConfig::from_json_str(
            r#"{
                "fragmentation": {
                    "bond_pattern": "AllAcyclicSingleBonds",
                    "max_cuts": 3,
                    "hydrogen_mode": "after"
                },
                "pairing": {
                    "delta_heavy_atom_range": [-2, 2],
                    "fingerprint": {"comparison": "Tanimoto", "threshold": 0.7}
                },
                "batch": {"threads": 2, "queue_capacity": 8}
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.fragmentation.max_cuts, 3);
        assert_eq!(config.fragmentation.min_cuts, 1);
        assert_eq!(config.fragmentation.hydrogen_mode, HydrogenMode::After);
        assert_eq!(config.pairing.delta_heavy_atom_range, Some((-2, 2)));
        let fingerprint = config.pairing.fingerprint.unwrap();
        assert_eq!(fingerprint.comparison, FingerprintComparison::Tanimoto);
        assert_eq!(fingerprint.kind, ScoreKind::Similarity);
        assert_eq!(fingerprint.radius, 2);
        assert_eq!(config.batch.threads, 2);
        assert_eq!(config.table.smiles_column, "smiles");
    }

    #[test]
    fn test_custom_pattern_from_json() {
        let config = MmpConfig::from_json_str(
            r#"{"fragmentation": {"bond_pattern": {"Custom": "[N:1]-[C:2]>>[N:1][*].[C:2][*]"}}}"#,
        )
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_hydrogen_modes() {
        assert!(HydrogenMode::Before.adds_hydrogens());
        assert!(HydrogenMode::Before.strips_hydrogens());
        assert!(!HydrogenMode::After.adds_hydrogens());
        assert!(HydrogenMode::After.strips_hydrogens());
        assert!(!HydrogenMode::None.strips_hydrogens());
    }
}
