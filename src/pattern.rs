use crate::bond_ref::BondRef;
use crate::error::{MmpError, Result};
use crate::molecule::Molecule;
use crate::parse::{parse_reaction_pattern, parse_smarts, MatchContext, SmartsPattern};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::*;

/// Which bonds are eligible for cutting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BondPattern {
    /// Every single bond outside a ring.
    AllAcyclicSingleBonds,
    /// Acyclic bonds from a neutral carbon that is not double or triple bonded
    /// to a heteroatom.
    #[default]
    HussainRea,
    /// Acyclic single bonds joining a ring atom to a non-ring atom.
    RingToNonRing,
    /// Acyclic single bonds between two carbons.
    CarbonCarbonAcyclic,
    /// A user-supplied `reactant>>product` pattern.
    Custom(String),
}

impl BondPattern {
    pub fn rsmarts(&self) -> &str {
        match self {
            Self::AllAcyclicSingleBonds => "[*:1]-!@[*:2]>>[*:1][*].[*:2][*]",
            Self::HussainRea => "[#6+0;!$(*=,#[!#6]):1]!@!=!#[*:2]>>[*:1][*].[*:2][*]",
            Self::RingToNonRing => "[*;R:1]-!@[*;!R:2]>>[*:1][*].[*:2][*]",
            Self::CarbonCarbonAcyclic => "[#6:1]-!@[#6:2]>>[*:1][*].[*:2][*]",
            Self::Custom(pattern) => pattern,
        }
    }

    /// Check the pattern contract without keeping the query.
    pub fn validate(&self) -> Result<()> {
        self.compile().map(|_| ())
    }

    /// Check the pattern contract and build its query.
    pub fn compile(&self) -> Result<CompiledBondPattern> {
        let invalid = |why: String| {
            MmpError::InvalidConfiguration(format!("bond pattern '{}': {why}", self.rsmarts()))
        };
        let reaction = parse_reaction_pattern(self.rsmarts()).map_err(invalid)?;
        let query = parse_smarts(&reaction.reactant).map_err(invalid)?;
        let first = reaction.reactant_labels[0];
        let second = reaction.reactant_labels[1];
        let (Some(a), Some(b)) = (query.mapped_atom(first), query.mapped_atom(second)) else {
            return Err(invalid("mapped atoms not found in the reactant query".to_string()));
        };
        if query.bond_between(a, b).is_none() {
            return Err(invalid(format!(
                "atoms :{first} and :{second} must be directly bonded"
            )));
        }
        debug!("Compiled bond pattern {}", self);
        Ok(CompiledBondPattern {
            pattern: self.clone(),
            query,
            first: a,
            second: b,
        })
    }
}

impl Display for BondPattern {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::AllAcyclicSingleBonds => write!(f, "all acyclic single bonds"),
            Self::HussainRea => write!(f, "Hussain-Rea"),
            Self::RingToNonRing => write!(f, "ring to non-ring"),
            Self::CarbonCarbonAcyclic => write!(f, "acyclic carbon-carbon"),
            Self::Custom(pattern) => write!(f, "custom {pattern}"),
        }
    }
}

/// A validated bond pattern, shared read-only across workers.
#[derive(Debug, Clone)]
pub struct CompiledBondPattern {
    pattern: BondPattern,
    query: SmartsPattern,
    first: usize,
    second: usize,
}

impl CompiledBondPattern {
    pub fn pattern(&self) -> &BondPattern {
        &self.pattern
    }

    /// Every bond whose two mapped query atoms land on its endpoints.
    pub fn find_matching_bonds(&self, mol: &Molecule) -> BTreeSet<BondRef> {
        let ctx = MatchContext::new(mol);
        let mut bonds = BTreeSet::new();
        for embedding in self.query.find_matches(&ctx) {
            let (a, b) = (embedding[self.first], embedding[self.second]);
            if let Some(bond) = mol.find_bond(a, b) {
                bonds.insert(BondRef::new(a, b, bond));
            }
        }
        trace!("{} matching bonds for {}", bonds.len(), self.pattern);
        bonds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matching(pattern: BondPattern, smiles: &str) -> usize {
        let mol = Molecule::from_smiles(smiles).unwrap();
        pattern.compile().unwrap().find_matching_bonds(&mol).len()
    }

    #[test]
    fn test_presets_compile() {
        for pattern in [
            BondPattern::AllAcyclicSingleBonds,
            BondPattern::HussainRea,
            BondPattern::RingToNonRing,
            BondPattern::CarbonCarbonAcyclic,
        ] {
            assert!(pattern.compile().is_ok(), "{pattern}");
        }
    }

    #[test]
    fn test_aspirin_acyclic_single_bonds() {
        // CH3-C, C-O(ester), O-c, c-C(acid), C-OH
        assert_eq!(
            matching(BondPattern::AllAcyclicSingleBonds, "CC(=O)Oc1ccccc1C(=O)O"),
            5
        );
    }

    #[test]
    fn test_hussain_rea_skips_heteroatom_carbonyls() {
        // C(=O)-O bonds have no eligible carbon end; the methyl, aryl-O and
        // aryl-COOH bonds remain.
        assert_eq!(matching(BondPattern::HussainRea, "CC(=O)Oc1ccccc1C(=O)O"), 3);
    }

    #[test]
    fn test_ring_to_non_ring() {
        assert_eq!(matching(BondPattern::RingToNonRing, "Cc1ccccc1CC"), 2);
        assert_eq!(matching(BondPattern::CarbonCarbonAcyclic, "CCOC"), 1);
    }

    #[test]
    fn test_invalid_custom_patterns() {
        let bad = [
            "[*:1]-[*:2]",
            "[*:1]-[*]>>[*:1][*].[*:2][*]",
            "[*:1]-[*:2]>>[*:1][*].[*:3][*]",
            "[*:1].[*:2]>>[*:1][*].[*:2][*]",
            "[*:1]-[*:2>>[*:1][*].[*:2][*]",
        ];
        for pattern in bad {
            let result = BondPattern::Custom(pattern.to_string()).compile();
            assert!(
                matches!(result, Err(MmpError::InvalidConfiguration(_))),
                "{pattern} should be rejected"
            );
        }
    }

    #[test]
    fn test_custom_pattern() {
        let pattern = BondPattern::Custom("[N:1]-[C:2]>>[N:1][*].[C:2][*]".to_string());
        assert_eq!(matching(pattern, "CNCC"), 2);
    }
}
