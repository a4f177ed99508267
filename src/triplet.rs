use crate::bond_ref::BondRef;
use crate::combinations::combinations;
use crate::cutter::{break_bond_with_labels, ATTACHMENT_LABEL_BASE, SHARED_ATOM_LABEL_BASE};
use crate::error::Result;
use crate::molecule::Molecule;
use std::collections::BTreeSet;
use tracing::*;

pub type Triplet = BTreeSet<BondRef>;

/// Whether cutting all three bonds leaves exactly three single-attachment
/// leaves around one core.
///
/// Ends of a cut that sit on an atom touched by more than one of the three
/// bonds are labeled from [`SHARED_ATOM_LABEL_BASE`], all others from
/// [`ATTACHMENT_LABEL_BASE`].
pub fn is_valid_cut_triplet(mol: &Molecule, triplet: [&BondRef; 3]) -> Result<bool> {
    let mut cut = mol.clone();
    let touches = |atom| triplet.iter().filter(|b| b.touches(atom)).count();
    for (i, bond) in triplet.iter().enumerate() {
        let label = |atom| {
            if touches(atom) > 1 {
                SHARED_ATOM_LABEL_BASE + i as u16
            } else {
                ATTACHMENT_LABEL_BASE + i as u16
            }
        };
        break_bond_with_labels(&mut cut, bond, label(bond.start()), label(bond.end()))?;
    }

    let components = cut.split_components();
    let leaves = components
        .iter()
        .filter(|c| c.attachment_points().len() == 1)
        .count();
    let valid = leaves == 3 && components.len() == 4;
    trace!(
        "Triplet {} {} {}: {} components, {leaves} leaves -> {valid}",
        triplet[0],
        triplet[1],
        triplet[2],
        components.len()
    );
    Ok(valid)
}

/// Every triplet of `bonds` that does not cut into three leaves and a core.
pub fn find_invalid_triplets(mol: &Molecule, bonds: &BTreeSet<BondRef>) -> Result<BTreeSet<Triplet>> {
    let mut invalid = BTreeSet::new();
    for triplet in combinations(bonds, 3) {
        let members: Vec<&BondRef> = triplet.iter().collect();
        if !is_valid_cut_triplet(mol, [members[0], members[1], members[2]])? {
            invalid.insert(triplet);
        }
    }
    debug!(
        "{} of {} triplets are invalid",
        invalid.len(),
        crate::combinations::binomial(bonds.len(), 3)
    );
    Ok(invalid)
}

fn contains_invalid_triplet(chosen: &BTreeSet<BondRef>, invalid: &BTreeSet<Triplet>) -> bool {
    invalid.iter().any(|triplet| triplet.is_subset(chosen))
}

fn extend(
    chosen: &mut BTreeSet<BondRef>,
    candidates: &[&BondRef],
    from: usize,
    remaining: usize,
    invalid: &BTreeSet<Triplet>,
) -> bool {
    if remaining == 0 {
        return true;
    }
    for (i, &candidate) in candidates.iter().enumerate().skip(from) {
        chosen.insert(candidate.clone());
        let ok = !contains_invalid_triplet(chosen, invalid)
            && extend(chosen, candidates, i + 1, remaining - 1, invalid);
        chosen.remove(candidate);
        if ok {
            return true;
        }
    }
    false
}

/// Whether `bond`, together with some `n - 1` other bonds of `pool`, forms a
/// cut set that contains no invalid triplet.
pub fn can_cut_n_times(
    bond: &BondRef,
    pool: &BTreeSet<BondRef>,
    n: usize,
    invalid: &BTreeSet<Triplet>,
) -> bool {
    if n == 0 {
        return true;
    }
    if !pool.contains(bond) {
        return false;
    }
    let others: Vec<&BondRef> = pool.iter().filter(|b| *b != bond).collect();
    let mut chosen = BTreeSet::from([bond.clone()]);
    extend(&mut chosen, &others, 0, n - 1, invalid)
}

/// The bonds of `pool` that take part in at least one valid `n`-cut.
pub fn identify_all_cuttable_bonds(
    pool: &BTreeSet<BondRef>,
    n: usize,
    invalid: &BTreeSet<Triplet>,
) -> BTreeSet<BondRef> {
    pool.iter()
        .filter(|bond| can_cut_n_times(bond, pool, n, invalid))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::BondPattern;

    fn acyclic_bonds(mol: &Molecule) -> BTreeSet<BondRef> {
        BondPattern::AllAcyclicSingleBonds
            .compile()
            .unwrap()
            .find_matching_bonds(mol)
    }

    fn triplet(bonds: &BTreeSet<BondRef>) -> [&BondRef; 3] {
        let v: Vec<&BondRef> = bonds.iter().collect();
        [v[0], v[1], v[2]]
    }

    #[test]
    fn test_linear_chain_is_invalid() {
        // A-B-C-D: cutting all three links leaves two leaves and two
        // two-attachment middle pieces.
        let mol = Molecule::from_smiles("CCCC").unwrap();
        let bonds = acyclic_bonds(&mol);
        assert_eq!(bonds.len(), 3);
        assert!(!is_valid_cut_triplet(&mol, triplet(&bonds)).unwrap());
    }

    #[test]
    fn test_star_is_valid() {
        let mol = Molecule::from_smiles("CC(C)C").unwrap();
        let bonds = acyclic_bonds(&mol);
        assert_eq!(bonds.len(), 3);
        assert!(is_valid_cut_triplet(&mol, triplet(&bonds)).unwrap());
    }

    #[test]
    fn test_cuttable_pruning() {
        // Isopentane C0-C1(-C2)-C3-C4. Cutting C0-C1, C1-C2 and C3-C4 leaves
        // a C1-C3 core with three leaves, so only the two triplets that
        // isolate a two-attachment piece are invalid.
        let mol = Molecule::from_smiles("CC(C)CC").unwrap();
        let bonds = acyclic_bonds(&mol);
        assert_eq!(bonds.len(), 4);
        let invalid = find_invalid_triplets(&mol, &bonds).unwrap();
        assert_eq!(invalid.len(), 2);
        assert_eq!(identify_all_cuttable_bonds(&bonds, 3, &invalid).len(), 4);
        assert!(identify_all_cuttable_bonds(&bonds, 4, &invalid).is_empty());
        let far = bonds
            .iter()
            .find(|b| b.start().index() == 3 && b.end().index() == 4)
            .unwrap();
        assert!(can_cut_n_times(far, &bonds, 2, &invalid));
        assert!(can_cut_n_times(far, &bonds, 3, &invalid));
        assert!(!can_cut_n_times(far, &bonds, 4, &invalid));
    }

    #[test]
    fn test_chain_has_no_three_cuts() {
        let mol = Molecule::from_smiles("CCCCC").unwrap();
        let bonds = acyclic_bonds(&mol);
        let invalid = find_invalid_triplets(&mol, &bonds).unwrap();
        assert_eq!(invalid.len(), 4);
        assert!(identify_all_cuttable_bonds(&bonds, 3, &invalid).is_empty());
        assert_eq!(identify_all_cuttable_bonds(&bonds, 2, &invalid).len(), 4);
    }
}
