use crate::error::{MmpError, Result, ToolkitOperation};
use crate::molecule::{Atom, BondOrder, Molecule};
use crate::element::Element;
use petgraph::graph::NodeIndex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};
use tracing::*;

/// Relabeling candidates are enumerated exhaustively only up to this many.
const MAX_TIE_PERMUTATIONS: usize = 720;

fn canonicalize_error(message: impl Into<String>) -> MmpError {
    MmpError::toolkit(ToolkitOperation::Canonicalize, message)
}

/// A fragment with exactly one attachment point.
#[derive(Debug, Clone)]
pub struct Leaf {
    mol: Molecule,
    attachment: NodeIndex,
    /// Canonical SMILES with the attachment label cleared.
    smiles: String,
    original_attachment_index: u16,
}

impl Leaf {
    pub fn new(mol: Molecule) -> Result<Self> {
        let points = mol.attachment_points();
        let [attachment] = points.as_slice() else {
            return Err(canonicalize_error(format!(
                "a leaf needs exactly one attachment point, found {}",
                points.len()
            )));
        };
        let attachment = *attachment;
        let original_attachment_index = mol.atom(attachment).isotope.unwrap_or(0);
        let mut unlabeled = mol.clone();
        unlabeled.atom_mut(attachment).isotope = None;
        let smiles = unlabeled.canonical_smiles()?;
        Ok(Self {
            mol,
            attachment,
            smiles,
            original_attachment_index,
        })
    }

    pub fn smiles(&self) -> &str {
        &self.smiles
    }

    pub fn original_attachment_index(&self) -> u16 {
        self.original_attachment_index
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.mol.heavy_atom_count()
    }

    /// Canonical SMILES with the attachment point labeled `label`.
    pub fn labeled_smiles(&self, label: u16) -> Result<String> {
        let mut labeled = self.mol.clone();
        labeled.atom_mut(self.attachment).isotope = Some(label);
        labeled.canonical_smiles()
    }
}

impl PartialEq for Leaf {
    fn eq(&self, other: &Self) -> bool {
        self.smiles == other.smiles
    }
}

impl Eq for Leaf {}

impl PartialOrd for Leaf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Leaf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.smiles.cmp(&other.smiles)
    }
}

/// The unchanging part of a fragmentation: one or more leaves, sorted in
/// descending canonical order and labeled `1..n` in that order.
#[derive(Debug, Clone)]
pub struct FragmentKey {
    leaves: Vec<Leaf>,
    smiles: String,
}

impl FragmentKey {
    pub fn new(mut leaves: Vec<Leaf>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(canonicalize_error("a key needs at least one leaf"));
        }
        leaves.sort_by(|a, b| b.cmp(a));
        let parts = leaves
            .iter()
            .enumerate()
            .map(|(i, leaf)| leaf.labeled_smiles(i as u16 + 1))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            leaves,
            smiles: parts.join("."),
        })
    }

    /// Rebuild a key from its string form, one leaf per component.
    pub fn parse(smiles: &str) -> Result<Self> {
        let mol = Molecule::from_smiles(smiles)?;
        let leaves = mol
            .split_components()
            .into_iter()
            .map(Leaf::new)
            .collect::<Result<Vec<_>>>()?;
        Self::new(leaves)
    }

    pub fn smiles(&self) -> &str {
        &self.smiles
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn num_attachments(&self) -> usize {
        self.leaves.len()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.leaves.iter().map(Leaf::heavy_atom_count).sum()
    }

    /// Map from each output label (`1..n`) to the leaf's original label.
    pub fn attachment_index_lookup(&self) -> BTreeMap<u16, u16> {
        self.leaves
            .iter()
            .enumerate()
            .map(|(i, leaf)| (i as u16 + 1, leaf.original_attachment_index))
            .collect()
    }

    /// Every lookup obtained by permuting leaves that share a canonical
    /// form. Such leaves are interchangeable in the key string, so the value
    /// may take any of these labelings.
    fn equivalent_lookups(&self) -> Vec<BTreeMap<u16, u16>> {
        let base = self.attachment_index_lookup();
        let mut groups: Vec<Vec<u16>> = Vec::new();
        for (i, leaf) in self.leaves.iter().enumerate() {
            match groups.last_mut() {
                Some(group) if self.leaves[group[0] as usize - 1].smiles == leaf.smiles => {
                    group.push(i as u16 + 1)
                }
                _ => groups.push(vec![i as u16 + 1]),
            }
        }
        let total: usize = groups
            .iter()
            .map(|g| (1..=g.len()).product::<usize>())
            .fold(1usize, |acc, n| acc.saturating_mul(n));
        if total > MAX_TIE_PERMUTATIONS {
            debug!("{total} equivalent labelings, using the sorted one");
            return vec![base];
        }

        let mut lookups = vec![base.clone()];
        for group in groups.iter().filter(|g| g.len() > 1) {
            let originals: Vec<u16> = group.iter().map(|label| base[label]).collect();
            let mut next = Vec::new();
            for lookup in &lookups {
                for perm in permutations(&originals) {
                    let mut relabeled = lookup.clone();
                    for (label, original) in group.iter().zip(perm) {
                        relabeled.insert(*label, original);
                    }
                    next.push(relabeled);
                }
            }
            lookups = next;
        }
        lookups
    }
}

fn permutations(items: &[u16]) -> Vec<Vec<u16>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let first = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, first);
            result.push(tail);
        }
    }
    result
}

impl PartialEq for FragmentKey {
    fn eq(&self, other: &Self) -> bool {
        self.smiles == other.smiles
    }
}

impl Eq for FragmentKey {}

impl Hash for FragmentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.smiles.hash(state);
    }
}

impl PartialOrd for FragmentKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FragmentKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.smiles.cmp(&other.smiles)
    }
}

impl Display for FragmentKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.smiles)
    }
}

/// The changing part of a fragmentation: one fragment with one attachment
/// point per cut.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentValue {
    smiles: String,
    id: Option<String>,
    changing_heavy_atoms: usize,
}

impl FragmentValue {
    /// Build a value from its canonical string.
    pub fn new(smiles: impl Into<String>, id: Option<String>) -> Result<Self> {
        let smiles = smiles.into();
        let changing_heavy_atoms = Molecule::from_smiles(&smiles)?.heavy_atom_count();
        Ok(Self {
            smiles,
            id,
            changing_heavy_atoms,
        })
    }

    pub fn smiles(&self) -> &str {
        &self.smiles
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Heavy atoms, excluding attachment points and hydrogens.
    pub fn changing_heavy_atom_count(&self) -> usize {
        self.changing_heavy_atoms
    }

    pub fn eq_ignoring_id(&self, other: &Self) -> bool {
        self.smiles == other.smiles
    }

    pub fn cmp_ignoring_id(&self, other: &Self) -> Ordering {
        self.smiles.cmp(&other.smiles)
    }
}

impl Display for FragmentValue {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.smiles)
    }
}

/// One way of splitting a molecule into a key and a value.
#[derive(Debug, Clone)]
pub struct FragmentationRecord {
    pub key: FragmentKey,
    pub value: FragmentValue,
    pub num_cuts: usize,
    canonical: String,
}

impl FragmentationRecord {
    pub fn new(key: FragmentKey, value: FragmentValue, num_cuts: usize) -> Self {
        let canonical = format!("{}.{}", key.smiles(), value.smiles());
        Self {
            key,
            value,
            num_cuts,
            canonical,
        }
    }

    /// `key.value` as a single string.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Constant to changing heavy-atom ratio. A value without heavy atoms
    /// has an infinite ratio.
    pub fn constant_to_changing_ratio(&self) -> f64 {
        let changing = self.value.changing_heavy_atom_count();
        if changing == 0 {
            f64::INFINITY
        } else {
            self.key.heavy_atom_count() as f64 / changing as f64
        }
    }
}

impl PartialEq for FragmentationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FragmentationRecord {}

impl PartialOrd for FragmentationRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FragmentationRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.num_cuts
            .cmp(&other.num_cuts)
            .then_with(|| self.canonical.cmp(&other.canonical))
    }
}

fn attachment_labels(mol: &Molecule) -> BTreeMap<u16, NodeIndex> {
    mol.attachment_points()
        .into_iter()
        .filter_map(|n| mol.atom(n).isotope.map(|label| (label, n)))
        .collect()
}

/// Build the canonical key and value from the pieces of a cut.
///
/// Leaves are sorted and relabeled `1..n`; the core's placeholders follow
/// the labels of the leaves they were cut from. When several leaves are
/// identical, the labeling giving the smallest value string is used, so the
/// result does not depend on which bond was cut first.
pub fn canonicalize_fragments(leaves: Vec<Molecule>, core: Molecule) -> Result<(FragmentKey, FragmentValue)> {
    let key = FragmentKey::new(leaves.into_iter().map(Leaf::new).collect::<Result<_>>()?)?;

    let mut core = core;
    let labels = attachment_labels(&core);
    if labels.len() != key.num_attachments() || core.attachment_points().len() != labels.len() {
        return Err(canonicalize_error(format!(
            "value has {} attachment points, key has {}",
            core.attachment_points().len(),
            key.num_attachments()
        )));
    }
    for leaf in key.leaves() {
        if !labels.contains_key(&leaf.original_attachment_index()) {
            return Err(canonicalize_error(format!(
                "no value attachment point labeled {}",
                leaf.original_attachment_index()
            )));
        }
    }

    // A bare placeholder stands for a hydrogen substituent.
    if core.atom_count() == 1 {
        if let Some(&placeholder) = labels.values().next() {
            let hydrogen = core.add_atom(Atom::new(Element::H));
            core.add_bond(placeholder, hydrogen, BondOrder::Single);
        }
    }

    let mut best: Option<String> = None;
    for lookup in key.equivalent_lookups() {
        let mut relabeled = core.clone();
        for (new, original) in &lookup {
            relabeled.atom_mut(labels[original]).isotope = Some(*new);
        }
        let smiles = relabeled.canonical_smiles()?;
        if best.as_ref().map_or(true, |b| smiles < *b) {
            best = Some(smiles);
        }
    }
    let smiles = best.ok_or_else(|| canonicalize_error("no labeling for the value"))?;
    let value = FragmentValue {
        smiles,
        id: None,
        changing_heavy_atoms: core.heavy_atom_count(),
    };
    Ok((key, value))
}

/// Canonicalize a `leaf.leaf....core` string of `n + 1` components.
///
/// The core is the component with the most attachment points; with a single
/// cut the last component is taken as the value.
pub fn canonicalize_components(smiles: &str) -> Result<(FragmentKey, FragmentValue)> {
    let mol = Molecule::from_smiles(smiles)?;
    let mut components = mol.split_components();
    if components.len() < 2 {
        return Err(canonicalize_error(format!(
            "'{smiles}' needs at least two components"
        )));
    }
    let core_index = components
        .iter()
        .enumerate()
        .rev()
        .max_by_key(|(_, c)| c.attachment_points().len())
        .map(|(i, _)| i)
        .unwrap_or(components.len() - 1);
    let core = components.remove(core_index);
    canonicalize_fragments(components, core)
}

fn split_pair(key: &str, value: &str, strip: bool) -> Result<(FragmentKey, FragmentValue)> {
    let mut key_mol = Molecule::from_smiles(key)?;
    let mut value_mol = Molecule::from_smiles(value)?;
    if strip {
        key_mol.strip_explicit_hydrogens();
        value_mol.strip_explicit_hydrogens();
    }
    canonicalize_fragments(key_mol.split_components(), value_mol)
}

/// Canonicalize a pre-split key and value.
pub fn canonicalize_pair(key: &str, value: &str) -> Result<(FragmentKey, FragmentValue)> {
    split_pair(key, value, false)
}

/// Canonicalize a pre-split key and value after folding explicit hydrogens
/// back into their heavy atoms.
pub fn canonicalize_pair_without_hydrogens(
    key: &str,
    value: &str,
) -> Result<(FragmentKey, FragmentValue)> {
    split_pair(key, value, true)
}

/// Remove explicit hydrogens from a SMILES string and rewrite it
/// canonically. Stereo parities and bond directions anchored on a removed
/// hydrogen are carried over; the hydrogen of a lone `[n*][H]` is kept.
pub fn strip_hydrogens(smiles: &str) -> Result<String> {
    let mut mol = Molecule::from_smiles(smiles)?;
    mol.strip_explicit_hydrogens();
    mol.canonical_smiles()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::canonicalize_smiles;

    fn canon(smiles: &str) -> String {
        canonicalize_smiles(smiles).unwrap()
    }

    #[test]
    fn test_single_cut_components() {
        let (key, value) = canonicalize_components("[500*]C(C)=O.[500*]Oc1ccccc1C(=O)O").unwrap();
        assert_eq!(key.smiles(), canon("[1*]C(C)=O"));
        assert_eq!(value.smiles(), canon("[1*]Oc1ccccc1C(=O)O"));
        assert_eq!(value.changing_heavy_atom_count(), 10);
        assert_eq!(key.heavy_atom_count(), 3);
    }

    #[test]
    fn test_key_sorted_descending_and_relabeled() {
        let (key, value) = canonicalize_components("[501*]C.[500*]Cl.[500*]c1ccc([501*])cc1").unwrap();
        let leaves: Vec<&str> = key.leaves().iter().map(Leaf::smiles).collect();
        let mut sorted = leaves.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(leaves, sorted);
        let lookup = key.attachment_index_lookup();
        assert_eq!(lookup.len(), 2);
        assert!(value.smiles().contains("[1*]") && value.smiles().contains("[2*]"));
        assert!(!key.smiles().contains("50"));
        // Whichever leaf got label 1, its original label is the one the
        // value's chlorine- or methyl-side attachment used.
        let chlorine_label = if key.leaves()[0].smiles().contains("Cl") { 1 } else { 2 };
        assert_eq!(lookup[&chlorine_label], 500);
    }

    #[test]
    fn test_tied_leaves_do_not_depend_on_labels() {
        let a = canonicalize_components("[500*]C.[501*]C.[500*]c1ccc([501*])cc1O").unwrap();
        let b = canonicalize_components("[501*]C.[500*]C.[501*]c1ccc([500*])cc1O").unwrap();
        assert_eq!(a.0.smiles(), b.0.smiles());
        assert_eq!(a.1.smiles(), b.1.smiles());
    }

    #[test]
    fn test_pre_split_pair() {
        let (key, value) = canonicalize_pair("[1*]C(C)=O", "[1*]Oc1ccccc1C(=O)O").unwrap();
        let (key2, value2) =
            canonicalize_components("[500*]C(C)=O.[500*]Oc1ccccc1C(=O)O").unwrap();
        assert_eq!(key, key2);
        assert_eq!(value.smiles(), value2.smiles());
    }

    #[test]
    fn test_degenerate_value_gets_explicit_hydrogen() {
        let (_, value) = canonicalize_pair("[1*]c1ccccc1", "[1*]").unwrap();
        assert_eq!(value.smiles(), "[1*][H]");
        assert_eq!(value.changing_heavy_atom_count(), 0);
    }

    #[test]
    fn test_mismatched_labels_fail() {
        let err = canonicalize_pair("[1*]C", "[2*]O").unwrap_err();
        assert!(matches!(
            err,
            MmpError::Toolkit {
                operation: ToolkitOperation::Canonicalize,
                ..
            }
        ));
        assert!(canonicalize_pair("[1*]C", "[1*]O[2*]").is_err());
    }

    #[test]
    fn test_strip_hydrogens() {
        assert_eq!(strip_hydrogens("[H]C([H])([H])O").unwrap(), canon("CO"));
        assert_eq!(strip_hydrogens("[1*][H]").unwrap(), "[1*][H]");
        assert_eq!(
            strip_hydrogens("N[C@@]([H])(C)C(=O)O").unwrap(),
            canon("N[C@@H](C)C(=O)O")
        );
        assert_eq!(strip_hydrogens("[H]/C(F)=C/F").unwrap(), canon("C(/F)=C/F"));
    }

    #[test]
    fn test_record_ordering() {
        let (k1, v1) = canonicalize_pair("[1*]C", "[1*]O").unwrap();
        let (k2, v2) = canonicalize_pair("[1*]C.[2*]C", "[1*]O[2*]").unwrap();
        let one = FragmentationRecord::new(k1.clone(), v1.clone(), 1);
        let two = FragmentationRecord::new(k2, v2, 2);
        assert!(one < two);
        assert_eq!(one, FragmentationRecord::new(k1, v1.with_id("x"), 1));
    }

    #[test]
    fn test_value_id_modes() {
        let a = FragmentValue::new("[1*]O", Some("a".into())).unwrap();
        let b = FragmentValue::new("[1*]O", Some("b".into())).unwrap();
        assert_ne!(a, b);
        assert!(a.eq_ignoring_id(&b));
        assert_eq!(a.cmp_ignoring_id(&b), Ordering::Equal);
    }
}
