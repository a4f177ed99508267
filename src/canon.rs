use crate::molecule::{permutation_is_odd, BondOrder, Chirality, Molecule, Neighbor};
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write;
use tracing::*;

/// Collapse arbitrary sortable keys into dense ranks starting at zero.
fn dense_ranks<K: Ord + Clone>(keys: &[K]) -> Vec<usize> {
    let sorted: BTreeSet<K> = keys.iter().cloned().collect();
    let sorted: Vec<K> = sorted.into_iter().collect();
    keys.iter()
        .map(|key| sorted.binary_search(key).unwrap_or(0))
        .collect()
}

fn class_count(ranks: &[usize]) -> usize {
    ranks.iter().collect::<HashSet<_>>().len()
}

fn bond_code(order: BondOrder) -> u8 {
    match order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Aromatic => 4,
    }
}

/// Morgan-style refinement: repeatedly extend each atom's rank with the
/// sorted ranks of its neighbors until the number of classes stops growing.
fn refine(mol: &Molecule, mut ranks: Vec<usize>) -> Vec<usize> {
    let graph = mol.graph();
    let mut classes = class_count(&ranks);
    loop {
        let keys: Vec<(usize, Vec<(usize, u8)>)> = mol
            .atoms()
            .map(|node| {
                let mut neighbors: Vec<(usize, u8)> = mol
                    .incident_bonds(node)
                    .into_iter()
                    .filter_map(|e| {
                        let other = mol.other_atom(e, node)?;
                        Some((ranks[other.index()], bond_code(graph[e].order)))
                    })
                    .collect();
                neighbors.sort();
                (ranks[node.index()], neighbors)
            })
            .collect();
        let refined = dense_ranks(&keys);
        let refined_classes = class_count(&refined);
        ranks = refined;
        if refined_classes == classes {
            return ranks;
        }
        classes = refined_classes;
    }
}

/// Upper bound on the tie-breaking leaves explored for stereo molecules.
pub const MAX_TIE_BRANCHES: usize = 256;

fn invariant_ranks(mol: &Molecule) -> Vec<usize> {
    let invariants: Vec<_> = mol
        .atoms()
        .map(|node| {
            let atom = mol.atom(node);
            (
                atom.element.atomic_number(),
                atom.isotope.unwrap_or(0),
                atom.aromatic,
                atom.charge,
                atom.hydrogens,
                mol.degree(node),
                atom.map.unwrap_or(0),
            )
        })
        .collect();
    refine(mol, dense_ranks(&invariants))
}

/// Members of the lowest-ranked class that still holds more than one atom.
fn first_tie(ranks: &[usize]) -> Option<(usize, Vec<usize>)> {
    let mut counts = vec![0usize; ranks.len()];
    for &rank in ranks {
        counts[rank] += 1;
    }
    let tied = (0..ranks.len()).find(|&rank| counts[rank] > 1)?;
    let members = (0..ranks.len()).filter(|&i| ranks[i] == tied).collect();
    Some((tied, members))
}

/// Promote `chosen` ahead of the rest of its class and refine again.
fn split_tie(mol: &Molecule, ranks: &[usize], tied: usize, chosen: usize) -> Vec<usize> {
    let split: Vec<usize> = ranks
        .iter()
        .enumerate()
        .map(|(i, &rank)| {
            if rank == tied && i != chosen {
                rank * 2 + 1
            } else {
                rank * 2
            }
        })
        .collect();
    refine(mol, dense_ranks(&split))
}

/// Canonical atom ranks, unique per atom.
///
/// Atoms are first partitioned by their local invariants, refined by their
/// neighborhoods, and remaining ties are broken by picking the lowest-indexed
/// atom in the lowest tied class and refining again. Graph symmetry alone
/// makes that choice irrelevant; see [`candidate_rankings`] for molecules
/// carrying stereo.
pub fn canonical_ranks(mol: &Molecule) -> Vec<usize> {
    let mut ranks = invariant_ranks(mol);
    while let Some((tied, members)) = first_tie(&ranks) {
        ranks = split_tie(mol, &ranks, tied, members[0]);
    }
    ranks
}

fn has_stereo(mol: &Molecule) -> bool {
    mol.atoms().any(|n| mol.atom(n).chirality.is_specified())
        || mol.bonds().any(|e| mol.bond(e).direction.is_some())
}

fn explore_ties(mol: &Molecule, ranks: Vec<usize>, budget: &mut usize, out: &mut Vec<Vec<usize>>) {
    let Some((tied, members)) = first_tie(&ranks) else {
        out.push(ranks);
        return;
    };
    let branches = if *budget >= members.len() - 1 {
        *budget -= members.len() - 1;
        members.len()
    } else {
        1
    };
    for &chosen in &members[..branches] {
        explore_ties(mol, split_tie(mol, &ranks, tied, chosen), budget, out);
    }
}

/// Every complete ranking reachable by breaking ties at each member of the
/// tied class in turn.
///
/// A mirror symmetry (a meso compound) ties atoms whose parities differ, so
/// the written string depends on which member is promoted. Writing every
/// candidate and keeping the smallest string makes the result independent of
/// input atom order. Molecules without stereo have a single candidate.
pub fn candidate_rankings(mol: &Molecule) -> Vec<Vec<usize>> {
    if !has_stereo(mol) {
        return vec![canonical_ranks(mol)];
    }
    let mut budget = MAX_TIE_BRANCHES - 1;
    let mut out = Vec::new();
    explore_ties(mol, invariant_ranks(mol), &mut budget, &mut out);
    out
}

/// The depth-first spanning forest used to write a molecule.
struct Traversal {
    ranks: Vec<usize>,
    visited: Vec<bool>,
    children: Vec<Vec<(EdgeIndex, NodeIndex)>>,
    /// Ring bonds whose digit is opened at this atom.
    ring_opens: Vec<Vec<EdgeIndex>>,
    /// Ring bonds whose digit is closed at this atom.
    ring_closes: Vec<Vec<EdgeIndex>>,
    seen_closures: HashSet<EdgeIndex>,
}

impl Traversal {
    fn new(mol: &Molecule, ranks: Vec<usize>) -> Self {
        let n = mol.atom_count();
        Self {
            ranks,
            visited: vec![false; n],
            children: vec![Vec::new(); n],
            ring_opens: vec![Vec::new(); n],
            ring_closes: vec![Vec::new(); n],
            seen_closures: HashSet::new(),
        }
    }

    fn sorted_neighbors(&self, mol: &Molecule, node: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut neighbors: Vec<(EdgeIndex, NodeIndex)> = mol
            .incident_bonds(node)
            .into_iter()
            .filter_map(|e| Some((e, mol.other_atom(e, node)?)))
            .collect();
        neighbors.sort_by_key(|&(_, other)| self.ranks[other.index()]);
        neighbors
    }

    fn visit(&mut self, mol: &Molecule, node: NodeIndex, parent: Option<EdgeIndex>) {
        self.visited[node.index()] = true;
        for (edge, other) in self.sorted_neighbors(mol, node) {
            if Some(edge) == parent {
                continue;
            }
            if self.visited[other.index()] {
                if self.seen_closures.insert(edge) {
                    self.ring_opens[other.index()].push(edge);
                    self.ring_closes[node.index()].push(edge);
                }
                continue;
            }
            self.children[node.index()].push((edge, other));
            self.visit(mol, other, Some(edge));
        }
    }
}

struct Writer<'a> {
    mol: &'a Molecule,
    traversal: Traversal,
    digits: Vec<Option<EdgeIndex>>,
    assigned: std::collections::HashMap<EdgeIndex, usize>,
    /// Whether to mirror every `/` and `\` in the current component.
    flip_directions: Option<bool>,
    out: String,
}

impl Writer<'_> {
    fn allocate_digit(&mut self, edge: EdgeIndex) -> usize {
        let digit = match self.digits.iter().skip(1).position(Option::is_none) {
            Some(free) => free + 1,
            None => {
                self.digits.push(None);
                self.digits.len() - 1
            }
        };
        if digit >= self.digits.len() {
            self.digits.resize(digit + 1, None);
        }
        self.digits[digit] = Some(edge);
        self.assigned.insert(edge, digit);
        digit
    }

    fn write_digit(&mut self, digit: usize) {
        if digit < 10 {
            let _ = write!(self.out, "{digit}");
        } else {
            let _ = write!(self.out, "%{digit:02}");
        }
    }

    fn write_bond(&mut self, from: NodeIndex, edge: EdgeIndex) {
        let mol = self.mol;
        let bond = mol.bond(edge);
        let Some(to) = mol.other_atom(edge, from) else {
            return;
        };
        let both_aromatic = mol.atom(from).aromatic && mol.atom(to).aromatic;
        match bond.order {
            BondOrder::Single => {
                if let Some(up) = mol.direction_from(from, edge) {
                    let flip = *self.flip_directions.get_or_insert(!up);
                    self.out.push(if up != flip { '/' } else { '\\' });
                } else if both_aromatic {
                    self.out.push('-');
                }
            }
            BondOrder::Double => self.out.push('='),
            BondOrder::Triple => self.out.push('#'),
            BondOrder::Aromatic => {
                if !both_aromatic {
                    self.out.push(':');
                }
            }
        }
    }

    fn write_atom(&mut self, node: NodeIndex, chirality: Chirality) {
        let mol = self.mol;
        let atom = mol.atom(node);
        let mut symbol = atom.element.symbol().to_string();
        if atom.aromatic {
            symbol = symbol.to_lowercase();
        }
        let bracket = !atom.element.is_organic_subset(atom.aromatic)
            || atom.isotope.is_some()
            || atom.charge != 0
            || atom.map.is_some()
            || chirality.is_specified()
            || atom.hydrogens != mol.default_implicit_hydrogens(node);
        if !bracket {
            self.out.push_str(&symbol);
            return;
        }
        self.out.push('[');
        if let Some(isotope) = atom.isotope {
            let _ = write!(self.out, "{isotope}");
        }
        self.out.push_str(&symbol);
        match chirality {
            Chirality::CounterClockwise => self.out.push('@'),
            Chirality::Clockwise => self.out.push_str("@@"),
            Chirality::Unspecified => {}
        }
        match atom.hydrogens {
            0 => {}
            1 => self.out.push('H'),
            n => {
                let _ = write!(self.out, "H{n}");
            }
        }
        match atom.charge {
            0 => {}
            1 => self.out.push('+'),
            -1 => self.out.push('-'),
            c if c > 0 => {
                let _ = write!(self.out, "+{c}");
            }
            c => {
                let _ = write!(self.out, "-{}", -c);
            }
        }
        if let Some(map) = atom.map {
            let _ = write!(self.out, ":{map}");
        }
        self.out.push(']');
    }

    fn write(&mut self, node: NodeIndex, parent: Option<(EdgeIndex, NodeIndex)>) {
        let mol = self.mol;
        let i = node.index();
        if let Some((edge, from)) = parent {
            self.write_bond(from, edge);
        }

        let closes = self.traversal.ring_closes[i].clone();
        let opens = self.traversal.ring_opens[i].clone();
        let children = self.traversal.children[i].clone();

        let atom = mol.atom(node);
        let mut chirality = atom.chirality;
        if chirality.is_specified() {
            let mut written = Vec::new();
            if let Some((edge, _)) = parent {
                written.push(Neighbor::Bond(edge));
            }
            if atom.hydrogens > 0 {
                written.push(Neighbor::ImplicitHydrogen);
            }
            written.extend(closes.iter().map(|&e| Neighbor::Bond(e)));
            written.extend(opens.iter().map(|&e| Neighbor::Bond(e)));
            written.extend(children.iter().map(|&(e, _)| Neighbor::Bond(e)));
            let reference = mol.neighbor_order(node);
            chirality = chirality.permuted(permutation_is_odd(&reference, &written));
        }
        self.write_atom(node, chirality);

        for edge in closes {
            if let Some(digit) = self.assigned.remove(&edge) {
                self.digits[digit] = None;
                self.write_digit(digit);
            }
        }
        for edge in opens {
            self.write_bond(node, edge);
            let digit = self.allocate_digit(edge);
            self.write_digit(digit);
        }

        let last = children.len().saturating_sub(1);
        for (k, (edge, child)) in children.into_iter().enumerate() {
            if k < last {
                self.out.push('(');
                self.write(child, Some((edge, node)));
                self.out.push(')');
            } else {
                self.write(child, Some((edge, node)));
            }
        }
    }
}

fn write_ranked(mol: &Molecule, ranks: Vec<usize>) -> String {
    let mut traversal = Traversal::new(mol, ranks);
    let mut starts: Vec<NodeIndex> = mol.atoms().collect();
    starts.sort_by_key(|node| traversal.ranks[node.index()]);

    let mut roots = Vec::new();
    for &start in &starts {
        if !traversal.visited[start.index()] {
            roots.push(start);
            traversal.visit(mol, start, None);
        }
    }

    let mut writer = Writer {
        mol,
        traversal,
        digits: vec![None],
        assigned: Default::default(),
        flip_directions: None,
        out: String::new(),
    };
    for (k, root) in roots.into_iter().enumerate() {
        if k > 0 {
            writer.out.push('.');
        }
        writer.flip_directions = None;
        writer.write(root, None);
    }
    writer.out
}

/// Write a molecule as canonical SMILES. Disconnected components are
/// written in canonical order, separated by `.`.
pub fn write_canonical_smiles(mol: &Molecule) -> String {
    let smiles = candidate_rankings(mol)
        .into_iter()
        .map(|ranks| write_ranked(mol, ranks))
        .min()
        .unwrap_or_default();
    trace!("Canonical SMILES: {smiles}");
    smiles
}

/// Parse and rewrite a SMILES string in canonical form.
pub fn canonicalize_smiles(smiles: &str) -> crate::error::Result<String> {
    Molecule::from_smiles(smiles)?.canonical_smiles()
}
