use crate::bond_ref::BondRef;
use crate::combinations::{binomial, combinations};
use crate::config::FragmentationOptions;
use crate::cutter::{break_one_bond_twice, cut_bonds, ATTACHMENT_LABEL_BASE};
use crate::error::{MmpError, Result};
use crate::fragment::{canonicalize_fragments, canonicalize_pair_without_hydrogens, FragmentKey, FragmentValue, FragmentationRecord};
use crate::molecule::Molecule;
use crate::pattern::CompiledBondPattern;
use crate::triplet::{find_invalid_triplets, identify_all_cuttable_bonds, Triplet};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryState {
    Init,
    HydrogenAdded,
    SingleCut,
    TwoCutBondValue,
    MultiCut,
    Closed,
}

impl Display for FactoryState {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Init => write!(f, "init"),
            Self::HydrogenAdded => write!(f, "hydrogens added"),
            Self::SingleCut => write!(f, "single cut"),
            Self::TwoCutBondValue => write!(f, "two cuts to bond value"),
            Self::MultiCut => write!(f, "multiple cuts"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Estimated number of candidate fragmentations for `bonds` matching bonds.
///
/// Every single cut is counted twice, once per orientation.
pub fn complexity_estimate(bonds: usize, min_cuts: usize, max_cuts: usize) -> u128 {
    let mut estimate: u128 = 0;
    if min_cuts <= 1 && max_cuts >= 1 {
        estimate = 2 * bonds as u128;
    }
    for cuts in min_cuts.max(2)..=max_cuts {
        estimate = estimate.saturating_add(binomial(bonds, cuts));
    }
    estimate
}

/// Enumerates every Key/Value split of one molecule at a time.
///
/// The factory walks its passes in order for each molecule and can be reused
/// for the next one until it is closed.
#[derive(Debug)]
pub struct FragmentationFactory {
    options: FragmentationOptions,
    pattern: Arc<CompiledBondPattern>,
    state: FactoryState,
}

impl FragmentationFactory {
    /// Validate `options` and compile their bond pattern.
    pub fn new(options: FragmentationOptions) -> Result<Self> {
        options.validate()?;
        let pattern = Arc::new(options.bond_pattern.compile()?);
        Ok(Self::with_pattern(options, pattern))
    }

    /// Build a factory around an already compiled pattern, so that several
    /// workers can share one query.
    pub fn with_pattern(options: FragmentationOptions, pattern: Arc<CompiledBondPattern>) -> Self {
        Self {
            options,
            pattern,
            state: FactoryState::Init,
        }
    }

    pub fn state(&self) -> FactoryState {
        self.state
    }

    pub fn options(&self) -> &FragmentationOptions {
        &self.options
    }

    /// Release the factory. Any further fragmentation fails.
    pub fn close(&mut self) {
        if self.state != FactoryState::Closed {
            trace!("Closing fragmentation factory");
            self.state = FactoryState::Closed;
        }
    }

    fn enter(&mut self, state: FactoryState) {
        trace!("Fragmentation factory: {} -> {}", self.state, state);
        self.state = state;
    }

    pub fn fragment_smiles(&mut self, smiles: &str) -> Result<BTreeSet<FragmentationRecord>> {
        if self.state == FactoryState::Closed {
            return Err(MmpError::FactoryClosed);
        }
        let mol = Molecule::from_smiles(smiles)?;
        self.fragment(&mol)
    }

    /// All distinct fragmentations of `mol` within the configured cut range
    /// that pass the configured filters.
    pub fn fragment(&mut self, mol: &Molecule) -> Result<BTreeSet<FragmentationRecord>> {
        if self.state == FactoryState::Closed {
            return Err(MmpError::FactoryClosed);
        }
        self.enter(FactoryState::Init);
        if mol.components().len() != 1 {
            return Err(MmpError::NoValidFragmentation(
                "molecule has more than one component".to_string(),
            ));
        }

        let mut working = mol.clone();
        if self.options.hydrogen_mode.adds_hydrogens() {
            let added = working.add_explicit_hydrogens();
            debug!("Added {added} explicit hydrogens");
            self.enter(FactoryState::HydrogenAdded);
        }

        let bonds = self.pattern.find_matching_bonds(&working);
        if bonds.is_empty() {
            return Err(MmpError::NoValidFragmentation(
                "no bonds match the bond pattern".to_string(),
            ));
        }
        let (min_cuts, max_cuts) = (self.options.min_cuts, self.options.max_cuts);
        let estimate = complexity_estimate(bonds.len(), min_cuts, max_cuts);
        if let Some(ceiling) = self.options.complexity_ceiling {
            if estimate > ceiling as u128 {
                return Err(MmpError::ComplexityLimitExceeded {
                    estimate,
                    ceiling: ceiling as u128,
                });
            }
        }
        debug!(
            "{} matching bonds, {estimate} candidate fragmentations",
            bonds.len()
        );

        let mut records = BTreeSet::new();
        if min_cuts <= 1 {
            self.enter(FactoryState::SingleCut);
            self.single_cuts(&working, &bonds, &mut records)?;
        }
        if self.options.allow_two_cuts_to_bond_value && self.options.cut_range().contains(&2) {
            self.enter(FactoryState::TwoCutBondValue);
            self.bond_values(&working, &bonds, &mut records)?;
        }
        if max_cuts >= 2 {
            self.enter(FactoryState::MultiCut);
            self.multi_cuts(&working, &bonds, &mut records)?;
        }

        if records.is_empty() {
            return Err(MmpError::NoValidFragmentation(
                "no fragmentation passed the filters".to_string(),
            ));
        }
        debug!("{} fragmentations", records.len());
        Ok(records)
    }

    fn single_cuts(
        &self,
        mol: &Molecule,
        bonds: &BTreeSet<BondRef>,
        records: &mut BTreeSet<FragmentationRecord>,
    ) -> Result<()> {
        for bond in bonds {
            let cut = cut_bonds(mol, std::slice::from_ref(bond))?;
            let mut components = cut.split_components();
            if components.len() != 2
                || components.iter().any(|c| c.attachment_points().len() != 1)
            {
                trace!("Single cut at {bond} does not split the molecule");
                continue;
            }
            let (Some(second), Some(first)) = (components.pop(), components.pop()) else {
                continue;
            };
            for (leaf, value) in [(first.clone(), second.clone()), (second, first)] {
                let (key, value) = canonicalize_fragments(vec![leaf], value)?;
                self.keep(key, value, 1, records)?;
            }
        }
        Ok(())
    }

    fn bond_values(
        &self,
        mol: &Molecule,
        bonds: &BTreeSet<BondRef>,
        records: &mut BTreeSet<FragmentationRecord>,
    ) -> Result<()> {
        for bond in bonds {
            let mut cut = mol.clone();
            break_one_bond_twice(&mut cut, bond, ATTACHMENT_LABEL_BASE, ATTACHMENT_LABEL_BASE + 1)?;
            let (core, leaves): (Vec<Molecule>, Vec<Molecule>) = cut
                .split_components()
                .into_iter()
                .partition(|c| c.heavy_atom_count() == 0 && c.attachment_points().len() == 2);
            let ([core], 2) = (core.as_slice(), leaves.len()) else {
                trace!("Bond value at {bond} does not split the molecule");
                continue;
            };
            if leaves.iter().any(|c| c.attachment_points().len() != 1) {
                continue;
            }
            let (key, value) = canonicalize_fragments(leaves, core.clone())?;
            self.keep(key, value, 2, records)?;
        }
        Ok(())
    }

    fn multi_cuts(
        &self,
        mol: &Molecule,
        bonds: &BTreeSet<BondRef>,
        records: &mut BTreeSet<FragmentationRecord>,
    ) -> Result<()> {
        let mut invalid: Option<BTreeSet<Triplet>> = None;
        for cuts in self.options.min_cuts.max(2)..=self.options.max_cuts {
            if cuts > bonds.len() {
                break;
            }
            let pool = if cuts >= 3 {
                if invalid.is_none() {
                    invalid = Some(find_invalid_triplets(mol, bonds)?);
                }
                match &invalid {
                    Some(invalid) => identify_all_cuttable_bonds(bonds, cuts, invalid),
                    None => bonds.clone(),
                }
            } else {
                bonds.clone()
            };
            trace!("{} of {} bonds can be cut {cuts} times", pool.len(), bonds.len());

            for combination in combinations(&pool, cuts) {
                let excluded = invalid.as_ref().map_or(false, |invalid| {
                    invalid.iter().any(|triplet| triplet.is_subset(&combination))
                });
                if excluded {
                    continue;
                }
                let combination: Vec<BondRef> = combination.into_iter().collect();
                let cut = cut_bonds(mol, &combination)?;
                let (leaves, mut cores): (Vec<Molecule>, Vec<Molecule>) = cut
                    .split_components()
                    .into_iter()
                    .partition(|c| c.attachment_points().len() == 1);
                if leaves.len() != cuts
                    || cores.len() != 1
                    || cores[0].attachment_points().len() != cuts
                {
                    continue;
                }
                let Some(core) = cores.pop() else {
                    continue;
                };
                let (key, value) = canonicalize_fragments(leaves, core)?;
                self.keep(key, value, cuts, records)?;
            }
        }
        Ok(())
    }

    /// Apply the hydrogen post-pass and the filters, then record the result.
    fn keep(
        &self,
        key: FragmentKey,
        value: FragmentValue,
        cuts: usize,
        records: &mut BTreeSet<FragmentationRecord>,
    ) -> Result<()> {
        let (key, value) = if self.options.hydrogen_mode.strips_hydrogens() {
            canonicalize_pair_without_hydrogens(key.smiles(), value.smiles())?
        } else {
            (key, value)
        };
        let record = FragmentationRecord::new(key, value, cuts);

        if let Some(max) = self.options.max_changing_heavy_atoms {
            if record.value.changing_heavy_atom_count() > max {
                trace!("{}: too many changing heavy atoms", record.canonical());
                return Ok(());
            }
        }
        if let Some(min) = self.options.min_constant_to_changing_ratio {
            if record.constant_to_changing_ratio() < min {
                trace!("{}: constant to changing ratio below {min}", record.canonical());
                return Ok(());
            }
        }
        trace!("[{}] {}", self.state, record.canonical());
        records.insert(record);
        Ok(())
    }
}

impl Drop for FragmentationFactory {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::canonicalize_smiles;
    use crate::config::HydrogenMode;
    use crate::fragment::canonicalize_components;
    use crate::pattern::BondPattern;
    use proptest::prelude::*;

    const ASPIRIN: &str = "CC(=O)Oc1ccccc1C(=O)O";

    fn canon(smiles: &str) -> String {
        canonicalize_smiles(smiles).unwrap()
    }

    fn factory(pattern: BondPattern, min_cuts: usize, max_cuts: usize) -> FragmentationFactory {
        FragmentationFactory::new(FragmentationOptions {
            bond_pattern: pattern,
            min_cuts,
            max_cuts,
            ..Default::default()
        })
        .unwrap()
    }

    fn pairs(records: &BTreeSet<FragmentationRecord>) -> Vec<(String, String)> {
        records
            .iter()
            .map(|r| (r.key.smiles().to_string(), r.value.smiles().to_string()))
            .collect()
    }

    #[test]
    fn test_complexity_estimate() {
        assert_eq!(complexity_estimate(5, 1, 1), 10);
        assert_eq!(complexity_estimate(5, 1, 2), 20);
        assert_eq!(complexity_estimate(5, 2, 3), 20);
        assert_eq!(complexity_estimate(5, 6, 6), 0);
    }

    #[test]
    fn test_aspirin_single_cuts() {
        let mut factory = factory(BondPattern::AllAcyclicSingleBonds, 1, 1);
        let records = factory.fragment_smiles(ASPIRIN).unwrap();
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.num_cuts == 1));

        let acetyl = canon("[1*]C(C)=O");
        let salicylic = canon("[1*]Oc1ccccc1C(=O)O");
        let forward = records
            .iter()
            .find(|r| r.key.smiles() == salicylic && r.value.smiles() == acetyl)
            .unwrap();
        let reverse = records
            .iter()
            .find(|r| r.key.smiles() == acetyl && r.value.smiles() == salicylic)
            .unwrap();

        let heavy = Molecule::from_smiles(ASPIRIN).unwrap().heavy_atom_count();
        assert_eq!(heavy, 13);
        // Acetyl: methyl C, carbonyl C and O.
        assert_eq!(forward.value.changing_heavy_atom_count(), 3);
        assert_eq!(reverse.value.changing_heavy_atom_count(), heavy - 3);
        assert_eq!(forward.key.heavy_atom_count(), heavy - 3);
    }

    #[test]
    fn test_idempotent() {
        let mut factory = factory(BondPattern::AllAcyclicSingleBonds, 1, 3);
        let first = factory.fragment_smiles(ASPIRIN).unwrap();
        let second = factory.fragment_smiles(ASPIRIN).unwrap();
        assert_eq!(pairs(&first), pairs(&second));
    }

    #[test]
    fn test_cut_order_invariance() {
        let mol = Molecule::from_smiles("CC(C)Cc1ccc(Cl)cc1").unwrap();
        let bonds: Vec<BondRef> = BondPattern::AllAcyclicSingleBonds
            .compile()
            .unwrap()
            .find_matching_bonds(&mol)
            .into_iter()
            .collect();
        assert_eq!(bonds.len(), 5);
        let mut compared = 0;
        for a in 0..bonds.len() {
            for b in a + 1..bonds.len() {
                let ab = cut_bonds(&mol, &[bonds[a].clone(), bonds[b].clone()]).unwrap();
                let mut attachments: Vec<usize> = ab
                    .split_components()
                    .iter()
                    .map(|c| c.attachment_points().len())
                    .collect();
                attachments.sort();
                // Two acyclic cuts always leave two leaves around one core.
                assert_eq!(attachments, vec![1, 1, 2]);

                let ba = cut_bonds(&mol, &[bonds[b].clone(), bonds[a].clone()]).unwrap();
                let first = canonicalize_components(&ab.canonical_smiles().unwrap()).unwrap();
                let second = canonicalize_components(&ba.canonical_smiles().unwrap()).unwrap();
                assert_eq!(first.0.smiles(), second.0.smiles());
                assert_eq!(first.1.smiles(), second.1.smiles());
                compared += 1;
            }
        }
        assert_eq!(compared, 10);
    }

    #[test]
    fn test_double_cuts() {
        // Propylbenzene chain: cutting ring-CH2 and CH2-CH2 leaves a CH2 core.
        let mut factory = factory(BondPattern::AllAcyclicSingleBonds, 2, 2);
        let records = factory.fragment_smiles("c1ccccc1CCC").unwrap();
        assert!(records.iter().all(|r| r.num_cuts == 2));
        let methylene = canon("[1*]C[2*]");
        assert!(records.iter().any(|r| r.value.smiles() == methylene));
        assert!(records.iter().all(|r| r.key.num_attachments() == 2));
    }

    #[test]
    fn test_triple_cuts_need_a_star() {
        let mut factory = factory(BondPattern::AllAcyclicSingleBonds, 3, 3);
        let records = factory.fragment_smiles("CC(C)(Cl)").unwrap();
        assert_eq!(records.len(), 1);
        let record = records.iter().next().unwrap();
        assert_eq!(record.value.changing_heavy_atom_count(), 1);
        assert_eq!(record.key.num_attachments(), 3);

        assert!(matches!(
            factory.fragment_smiles("CCCC"),
            Err(MmpError::NoValidFragmentation(_))
        ));
    }

    #[test]
    fn test_bond_value() {
        let mut factory = FragmentationFactory::new(FragmentationOptions {
            bond_pattern: BondPattern::AllAcyclicSingleBonds,
            min_cuts: 2,
            max_cuts: 2,
            allow_two_cuts_to_bond_value: true,
            ..Default::default()
        })
        .unwrap();
        let records = factory.fragment_smiles("c1ccccc1Cl").unwrap();
        assert_eq!(records.len(), 1);
        let record = records.iter().next().unwrap();
        assert_eq!(record.value.smiles(), "[1*][2*]");
        assert_eq!(record.value.changing_heavy_atom_count(), 0);
        assert_eq!(record.num_cuts, 2);
    }

    #[test]
    fn test_complexity_guard() {
        let mut factory = FragmentationFactory::new(FragmentationOptions {
            bond_pattern: BondPattern::AllAcyclicSingleBonds,
            min_cuts: 1,
            max_cuts: 3,
            complexity_ceiling: Some(10),
            ..Default::default()
        })
        .unwrap();
        let err = factory.fragment_smiles(ASPIRIN).unwrap_err();
        assert!(matches!(
            err,
            MmpError::ComplexityLimitExceeded {
                estimate: 30,
                ceiling: 10
            }
        ));
        assert_eq!(err.reason(), "Too many cuts");
        // Rejected before any cutting pass started.
        assert_eq!(factory.state(), FactoryState::Init);
    }

    #[test]
    fn test_filters() {
        let mut factory = FragmentationFactory::new(FragmentationOptions {
            bond_pattern: BondPattern::AllAcyclicSingleBonds,
            max_changing_heavy_atoms: Some(3),
            ..Default::default()
        })
        .unwrap();
        let records = factory.fragment_smiles(ASPIRIN).unwrap();
        assert!(records
            .iter()
            .all(|r| r.value.changing_heavy_atom_count() <= 3));

        let mut factory = FragmentationFactory::new(FragmentationOptions {
            bond_pattern: BondPattern::AllAcyclicSingleBonds,
            min_constant_to_changing_ratio: Some(2.0),
            ..Default::default()
        })
        .unwrap();
        let records = factory.fragment_smiles(ASPIRIN).unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.constant_to_changing_ratio() >= 2.0));
    }

    #[test]
    fn test_no_matching_bonds() {
        let mut factory = factory(BondPattern::AllAcyclicSingleBonds, 1, 1);
        assert!(matches!(
            factory.fragment_smiles("c1ccccc1"),
            Err(MmpError::NoValidFragmentation(_))
        ));
        assert!(matches!(
            factory.fragment_smiles("CC.CC"),
            Err(MmpError::NoValidFragmentation(_))
        ));
        assert!(matches!(
            factory.fragment_smiles("C(C"),
            Err(MmpError::Parse { .. })
        ));
    }

    #[test]
    fn test_hydrogens_before() {
        let mut factory = FragmentationFactory::new(FragmentationOptions {
            bond_pattern: BondPattern::AllAcyclicSingleBonds,
            hydrogen_mode: HydrogenMode::Before,
            ..Default::default()
        })
        .unwrap();
        let records = factory.fragment_smiles("CO").unwrap();
        // C-O, C-H and O-H bonds, each cut both ways.
        let hydrogen = records
            .iter()
            .find(|r| r.value.smiles() == "[1*][H]")
            .unwrap();
        assert!(!hydrogen.key.smiles().contains("[H]"));
        assert!(records.iter().any(|r| r.key.smiles() == "[1*][H]"));
        assert!(records
            .iter()
            .filter(|r| r.value.smiles() != "[1*][H]" && r.key.smiles() != "[1*][H]")
            .all(|r| !r.canonical().contains("[H]")));
    }

    #[test]
    fn test_closed_factory() {
        let mut factory = factory(BondPattern::AllAcyclicSingleBonds, 1, 1);
        factory.close();
        assert_eq!(factory.state(), FactoryState::Closed);
        assert!(matches!(factory.fragment_smiles("CCO"), Err(MmpError::FactoryClosed)));
    }

    proptest! {
        #[test]
        fn prop_alkyl_chains_fragment_deterministically(n in 2usize..8) {
            let smiles = format!("c1ccccc1{}O", "C".repeat(n));
            let mut factory = factory(BondPattern::AllAcyclicSingleBonds, 1, 2);
            let first = factory.fragment_smiles(&smiles).unwrap();
            let second = factory.fragment_smiles(&smiles).unwrap();
            prop_assert_eq!(pairs(&first), pairs(&second));
        }
    }
}
