use crate::element::Element;
use crate::error::{MmpError, Result, ToolkitOperation};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::*;

/// Tetrahedral parity of an atom.
///
/// The parity is always interpreted against the atom's *reference order*
/// (see [`Molecule::neighbor_order`]): looking from the first neighbor, the
/// remaining neighbors are arranged counterclockwise (`@`) or clockwise (`@@`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Chirality {
    #[default]
    Unspecified,
    CounterClockwise,
    Clockwise,
}

impl Chirality {
    pub fn is_specified(self) -> bool {
        self != Self::Unspecified
    }

    pub fn inverted(self) -> Self {
        match self {
            Self::Unspecified => Self::Unspecified,
            Self::CounterClockwise => Self::Clockwise,
            Self::Clockwise => Self::CounterClockwise,
        }
    }

    /// Invert the parity if an odd number of neighbor swaps was applied.
    pub fn permuted(self, odd: bool) -> Self {
        if odd {
            self.inverted()
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to the valence sum. Aromatic bonds count as one; the
    /// aromatic atom's own pi electron is accounted for by the element table.
    pub fn valence(self) -> u32 {
        match self {
            Self::Single | Self::Aromatic => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }
}

/// `/` and `\` of SMILES, read from the bond's begin atom to its end atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondDirection {
    Up,
    Down,
}

impl BondDirection {
    fn from_up(up: bool) -> Self {
        if up {
            Self::Up
        } else {
            Self::Down
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub element: Element,
    pub aromatic: bool,
    pub isotope: Option<u16>,
    pub charge: i8,
    /// Implicit hydrogens (not present as nodes in the graph).
    pub hydrogens: u8,
    pub chirality: Chirality,
    pub map: Option<u16>,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            aromatic: false,
            isotope: None,
            charge: 0,
            hydrogens: 0,
            chirality: Chirality::Unspecified,
            map: None,
        }
    }

    /// An attachment placeholder carrying `label` as its isotope.
    pub fn attachment(label: u16) -> Self {
        Self {
            isotope: Some(label),
            ..Self::new(Element::ATTACHMENT)
        }
    }

    pub fn is_attachment(&self) -> bool {
        self.element.is_attachment()
    }

    pub fn attachment_label(&self) -> Option<u16> {
        if self.is_attachment() {
            self.isotope
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub order: BondOrder,
    pub direction: Option<BondDirection>,
    serial: u32,
}

impl Bond {
    /// Insertion serial. Bonds created later always have a larger serial.
    pub fn serial(&self) -> u32 {
        self.serial
    }
}

pub type MoleculeGraph = UnGraph<Atom, Bond>;

/// One slot in an atom's reference neighbor order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Neighbor {
    ImplicitHydrogen,
    Bond(EdgeIndex),
}

/// Count inversions of `from` relative to `to` and report whether the
/// permutation between the two orderings is odd.
pub fn permutation_is_odd<T: PartialEq>(from: &[T], to: &[T]) -> bool {
    let positions: Vec<usize> = from
        .iter()
        .filter_map(|x| to.iter().position(|y| y == x))
        .collect();
    let mut inversions = 0;
    for i in 0..positions.len() {
        for j in i + 1..positions.len() {
            if positions[i] > positions[j] {
                inversions += 1;
            }
        }
    }
    inversions % 2 == 1
}

/// An editable molecular graph.
///
/// Node and edge indices follow petgraph's semantics: removing an atom or a
/// bond moves the last one into the freed slot, so indices must not be held
/// across removals.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    graph: MoleculeGraph,
    next_serial: u32,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &MoleculeGraph {
        &self.graph
    }

    pub fn add_atom(&mut self, atom: Atom) -> NodeIndex {
        self.graph.add_node(atom)
    }

    /// Remove an atom along with its bonds. The last atom takes its index.
    pub fn remove_atom(&mut self, atom: NodeIndex) -> Option<Atom> {
        self.graph.remove_node(atom)
    }

    /// Add a bond with `begin` as its begin atom. The bond is last in the
    /// reference order of both endpoints.
    pub fn add_bond(&mut self, begin: NodeIndex, end: NodeIndex, order: BondOrder) -> EdgeIndex {
        self.add_directed_bond(begin, end, order, None)
    }

    pub fn add_directed_bond(
        &mut self,
        begin: NodeIndex,
        end: NodeIndex,
        order: BondOrder,
        direction: Option<BondDirection>,
    ) -> EdgeIndex {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.graph.add_edge(
            begin,
            end,
            Bond {
                order,
                direction,
                serial,
            },
        )
    }

    /// Remove a bond. The last bond takes its index.
    pub fn remove_bond(&mut self, bond: EdgeIndex) -> Option<Bond> {
        self.graph.remove_edge(bond)
    }

    pub fn atom(&self, atom: NodeIndex) -> &Atom {
        &self.graph[atom]
    }

    pub fn atom_mut(&mut self, atom: NodeIndex) -> &mut Atom {
        &mut self.graph[atom]
    }

    pub fn bond(&self, bond: EdgeIndex) -> &Bond {
        &self.graph[bond]
    }

    pub fn bond_mut(&mut self, bond: EdgeIndex) -> &mut Bond {
        &mut self.graph[bond]
    }

    /// The (begin, end) atoms of a bond.
    pub fn endpoints(&self, bond: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(bond)
    }

    pub fn find_bond(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(a, b)
    }

    pub fn other_atom(&self, bond: EdgeIndex, atom: NodeIndex) -> Option<NodeIndex> {
        let (begin, end) = self.endpoints(bond)?;
        if begin == atom {
            Some(end)
        } else if end == atom {
            Some(begin)
        } else {
            None
        }
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn atoms(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn bonds(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edge_indices()
    }

    pub fn degree(&self, atom: NodeIndex) -> usize {
        self.graph.edges(atom).count()
    }

    /// Heavy atoms, excluding hydrogens and attachment placeholders.
    pub fn heavy_atom_count(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|atom| atom.element.is_heavy())
            .count()
    }

    pub fn attachment_points(&self) -> Vec<NodeIndex> {
        self.atoms()
            .filter(|&n| self.atom(n).is_attachment())
            .collect()
    }

    /// Bonds incident to `atom`, ordered by insertion serial.
    pub fn incident_bonds(&self, atom: NodeIndex) -> Vec<EdgeIndex> {
        let mut bonds: Vec<EdgeIndex> = self.graph.edges(atom).map(|e| e.id()).collect();
        bonds.sort_by_key(|&e| self.graph[e].serial);
        bonds
    }

    /// The reference neighbor order that [`Chirality`] is defined against:
    /// an implicit hydrogen first (if the atom carries any), then the
    /// incident bonds by insertion serial.
    pub fn neighbor_order(&self, atom: NodeIndex) -> Vec<Neighbor> {
        let mut order = Vec::new();
        if self.atom(atom).hydrogens > 0 {
            order.push(Neighbor::ImplicitHydrogen);
        }
        order.extend(self.incident_bonds(atom).into_iter().map(Neighbor::Bond));
        order
    }

    pub fn valence_sum(&self, atom: NodeIndex) -> u32 {
        self.graph
            .edges(atom)
            .map(|e| e.weight().order.valence())
            .sum()
    }

    /// The number of hydrogens the atom would carry if written without
    /// brackets.
    pub fn default_implicit_hydrogens(&self, atom: NodeIndex) -> u8 {
        let a = self.atom(atom);
        a.element
            .default_implicit_hydrogens(a.aromatic, self.valence_sum(atom))
    }

    /// Implicit plus explicit hydrogens.
    pub fn total_hydrogens(&self, atom: NodeIndex) -> usize {
        let explicit = self
            .graph
            .neighbors(atom)
            .filter(|&n| self.atom(n).element.is_hydrogen())
            .count();
        self.atom(atom).hydrogens as usize + explicit
    }

    /// A bond is in a ring iff its endpoints stay connected without it.
    pub fn is_ring_bond(&self, bond: EdgeIndex) -> bool {
        let Some((a, b)) = self.endpoints(bond) else {
            return false;
        };
        let without = EdgeFiltered::from_fn(&self.graph, |e| e.id() != bond);
        has_path_connecting(&without, a, b, None)
    }

    pub fn ring_bonds(&self) -> HashSet<EdgeIndex> {
        self.bonds().filter(|&e| self.is_ring_bond(e)).collect()
    }

    pub fn is_ring_atom(&self, atom: NodeIndex) -> bool {
        self.graph.edges(atom).any(|e| self.is_ring_bond(e.id()))
    }

    /// Breadth-first path from `from` to `to` that never crosses `skip`.
    fn shortest_path_avoiding(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        skip: EdgeIndex,
    ) -> Option<Vec<NodeIndex>> {
        let mut previous = HashMap::from([(from, from)]);
        let mut queue = VecDeque::from([from]);
        while let Some(atom) = queue.pop_front() {
            if atom == to {
                let mut path = vec![to];
                let mut current = to;
                while current != from {
                    current = *previous.get(&current)?;
                    path.push(current);
                }
                return Some(path);
            }
            for edge in self.incident_bonds(atom) {
                if edge == skip {
                    continue;
                }
                let Some(next) = self.other_atom(edge, atom) else {
                    continue;
                };
                if let Entry::Vacant(slot) = previous.entry(next) {
                    slot.insert(atom);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// The smallest ring through every ring bond, each listed once as a
    /// cycle of atoms.
    pub fn smallest_rings(&self) -> Vec<Vec<NodeIndex>> {
        let mut seen = HashSet::new();
        let mut rings = Vec::new();
        for bond in self.bonds() {
            let Some((a, b)) = self.endpoints(bond) else {
                continue;
            };
            let Some(ring) = self.shortest_path_avoiding(a, b, bond) else {
                continue;
            };
            if seen.insert(ring.iter().copied().collect::<BTreeSet<_>>()) {
                rings.push(ring);
            }
        }
        rings
    }

    /// Pi electrons an atom of a Kekulé ring donates, or `None` when the
    /// atom cannot take part in an aromatic ring.
    fn pi_electrons(&self, atom: NodeIndex, ring_bonds: &HashSet<EdgeIndex>) -> Option<u32> {
        let a = self.atom(atom);
        if a.aromatic || !matches!(a.element.atomic_number(), 6 | 7 | 8 | 15 | 16) {
            return None;
        }
        let mut double = None;
        for edge in self.graph.edges(atom) {
            match edge.weight().order {
                BondOrder::Single => {}
                BondOrder::Double if double.is_none() => double = Some(edge.id()),
                _ => return None,
            }
        }
        let connections = self.valence_sum(atom) + a.hydrogens as u32;
        match (double, a.element.atomic_number()) {
            (Some(bond), _) if ring_bonds.contains(&bond) => Some(1),
            (Some(_), _) => None,
            (None, 7 | 15) if a.charge == 0 && connections == 3 => Some(2),
            (None, 8 | 16) if a.charge == 0 && connections == 2 => Some(2),
            _ => None,
        }
    }

    /// Rewrite Kekulé rings that satisfy Hückel's 4n+2 rule as aromatic
    /// atoms joined by aromatic bonds, the same graph a lowercase spelling
    /// parses to. Rings already written aromatic are left alone. Returns the
    /// number of rings converted.
    pub fn perceive_aromaticity(&mut self) -> usize {
        let rings = self.smallest_rings();
        if rings.is_empty() {
            return 0;
        }
        let ring_bonds = self.ring_bonds();
        let mut atoms = HashSet::new();
        let mut bonds = HashSet::new();
        let mut converted = 0;
        for ring in &rings {
            let electrons = ring
                .iter()
                .map(|&atom| self.pi_electrons(atom, &ring_bonds))
                .sum::<Option<u32>>();
            if !matches!(electrons, Some(e) if e % 4 == 2) {
                continue;
            }
            let closing = [ring[ring.len() - 1], ring[0]];
            let cycle = ring.windows(2).chain(std::iter::once(&closing[..]));
            let ring_edges: Option<Vec<EdgeIndex>> =
                cycle.map(|pair| self.find_bond(pair[0], pair[1])).collect();
            let Some(ring_edges) = ring_edges else {
                continue;
            };
            atoms.extend(ring.iter().copied());
            bonds.extend(ring_edges);
            converted += 1;
        }
        for atom in atoms {
            self.atom_mut(atom).aromatic = true;
        }
        for bond in bonds {
            let bond = self.bond_mut(bond);
            bond.order = BondOrder::Aromatic;
            bond.direction = None;
        }
        if converted > 0 {
            trace!("Perceived {converted} aromatic rings");
        }
        converted
    }

    /// Whether `sub` is in `u(atom, bond)` position: above `atom` when the
    /// bond is written from `atom` outward. Two substituents on the same
    /// double-bond end have opposite values; substituents on opposite ends
    /// are cis iff their values are equal.
    pub fn direction_from(&self, atom: NodeIndex, bond: EdgeIndex) -> Option<bool> {
        let direction = self.bond(bond).direction?;
        let (begin, _) = self.endpoints(bond)?;
        let up = direction == BondDirection::Up;
        Some(if begin == atom { up } else { !up })
    }

    pub fn set_direction_from(&mut self, atom: NodeIndex, bond: EdgeIndex, up: bool) {
        if let Some((begin, _)) = self.endpoints(bond) {
            let up = if begin == atom { up } else { !up };
            self.bond_mut(bond).direction = Some(BondDirection::from_up(up));
        }
    }

    /// Connected components, each sorted by node index, ordered by their
    /// lowest node index.
    pub fn components(&self) -> Vec<Vec<NodeIndex>> {
        let mut seen = HashSet::new();
        let mut components = Vec::new();
        for start in self.atoms() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut queue = VecDeque::from([start]);
            component.insert(start);
            while let Some(node) = queue.pop_front() {
                for neighbor in self.graph.neighbors(node) {
                    if seen.insert(neighbor) {
                        component.insert(neighbor);
                        queue.push_back(neighbor);
                    }
                }
            }
            components.push(component.into_iter().collect());
        }
        components
    }

    /// Copy a set of atoms (and the bonds among them) into a new molecule.
    /// Bond serials are preserved, so stereo parity carries over unchanged.
    pub fn submolecule(&self, atoms: &[NodeIndex]) -> Molecule {
        let mut sub = Molecule {
            graph: MoleculeGraph::default(),
            next_serial: self.next_serial,
        };
        let mut mapping = HashMap::new();
        for &atom in atoms {
            mapping.insert(atom, sub.graph.add_node(self.atom(atom).clone()));
        }
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .filter(|e| mapping.contains_key(&e.source()) && mapping.contains_key(&e.target()))
            .collect();
        edges.sort_by_key(|e| e.weight().serial);
        for edge in edges {
            sub.graph
                .add_edge(mapping[&edge.source()], mapping[&edge.target()], *edge.weight());
        }
        sub
    }

    pub fn split_components(&self) -> Vec<Molecule> {
        self.components()
            .iter()
            .map(|component| self.submolecule(component))
            .collect()
    }

    /// Merge another molecule into this one as a disconnected component.
    pub fn absorb(&mut self, other: &Molecule) {
        let base = self.next_serial;
        let mut mapping = HashMap::new();
        for node in other.atoms() {
            mapping.insert(node, self.graph.add_node(other.atom(node).clone()));
        }
        let mut max_serial = base;
        for edge in other.graph.edge_references() {
            let mut bond = *edge.weight();
            bond.serial += base;
            max_serial = max_serial.max(bond.serial + 1);
            self.graph
                .add_edge(mapping[&edge.source()], mapping[&edge.target()], bond);
        }
        self.next_serial = max_serial;
    }

    /// Turn every implicit hydrogen into an explicit hydrogen atom.
    ///
    /// Returns the number of hydrogen atoms added.
    pub fn add_explicit_hydrogens(&mut self) -> usize {
        let atoms: Vec<NodeIndex> = self.atoms().collect();
        let mut added = 0;
        for atom in atoms {
            while self.atom(atom).hydrogens > 0 {
                // The implicit hydrogen leads the reference order, the new
                // bond goes last: one swap per other neighbor.
                if self.atom(atom).hydrogens == 1 && self.degree(atom) % 2 == 1 {
                    let a = self.atom_mut(atom);
                    a.chirality = a.chirality.inverted();
                }
                self.atom_mut(atom).hydrogens -= 1;
                let hydrogen = self.add_atom(Atom::new(Element::H));
                self.add_bond(atom, hydrogen, BondOrder::Single);
                added += 1;
            }
        }
        trace!("Added {added} explicit hydrogens");
        added
    }

    fn is_strippable_hydrogen(&self, atom: NodeIndex) -> Option<(NodeIndex, EdgeIndex)> {
        let a = self.atom(atom);
        if !a.element.is_hydrogen() || a.isotope.is_some() || a.charge != 0 || a.map.is_some() {
            return None;
        }
        let mut edges = self.graph.edges(atom);
        let edge = edges.next()?;
        if edges.next().is_some() || edge.weight().order != BondOrder::Single {
            return None;
        }
        let neighbor = if edge.source() == atom {
            edge.target()
        } else {
            edge.source()
        };
        let n = self.atom(neighbor);
        if n.element.is_hydrogen() || n.is_attachment() {
            return None;
        }
        Some((neighbor, edge.id()))
    }

    /// Fold explicit hydrogen atoms back into their neighbor's implicit count.
    ///
    /// Hydrogens with an isotope or a charge, hydrogens bonded to another
    /// hydrogen, and hydrogens on attachment placeholders are kept.
    /// Returns the number of hydrogen atoms removed.
    pub fn strip_explicit_hydrogens(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let candidate = self
                .atoms()
                .find_map(|n| self.is_strippable_hydrogen(n).map(|(a, e)| (n, a, e)));
            let Some((hydrogen, atom, bond)) = candidate else {
                break;
            };

            let had_implicit = self.atom(atom).hydrogens > 0;
            if !had_implicit && self.atom(atom).chirality.is_specified() {
                let order = self.neighbor_order(atom);
                let position = order
                    .iter()
                    .position(|&slot| slot == Neighbor::Bond(bond))
                    .unwrap_or(0);
                let a = self.atom_mut(atom);
                a.chirality = a.chirality.permuted(position % 2 == 1);
            }

            // A direction marker on the H bond moves to another single bond
            // of the same atom, on the opposite side.
            if let Some(up) = self.direction_from(atom, bond) {
                let other = self.incident_bonds(atom).into_iter().find(|&e| {
                    e != bond
                        && self.bond(e).order == BondOrder::Single
                        && self.bond(e).direction.is_none()
                });
                if let Some(other) = other {
                    self.set_direction_from(atom, other, !up);
                }
            }

            self.remove_bond(bond);
            self.atom_mut(atom).hydrogens += 1;
            self.remove_atom(hydrogen);
            removed += 1;
        }
        trace!("Stripped {removed} explicit hydrogens");
        removed
    }

    /// Parse a SMILES string into a molecule.
    pub fn from_smiles(smiles: &str) -> Result<Self> {
        crate::parse::parse_smiles(smiles).map_err(|e| MmpError::parse(smiles, e))
    }

    /// Canonical SMILES, with toolkit failures surfaced as errors.
    pub fn canonical_smiles(&self) -> Result<String> {
        if self.graph.node_count() == 0 {
            return Err(MmpError::toolkit(
                ToolkitOperation::Canonicalize,
                "cannot canonicalize an empty molecule",
            ));
        }
        Ok(crate::canon::write_canonical_smiles(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_parity() {
        assert!(!permutation_is_odd(&[1, 2, 3], &[1, 2, 3]));
        assert!(permutation_is_odd(&[2, 1, 3], &[1, 2, 3]));
        assert!(!permutation_is_odd(&[2, 3, 1], &[1, 2, 3]));
        assert!(permutation_is_odd(&[4, 2, 3, 1], &[1, 2, 3, 4]));
    }

    #[test]
    fn test_ring_bonds() {
        let mol = Molecule::from_smiles("C1CC1CC").unwrap();
        let rings = mol.ring_bonds();
        assert_eq!(rings.len(), 3);
        assert_eq!(mol.bond_count(), 5);
        let chain = mol.bonds().filter(|e| !rings.contains(e)).count();
        assert_eq!(chain, 2);
    }

    #[test]
    fn test_components() {
        let mol = Molecule::from_smiles("CCO.Cl.N").unwrap();
        let components = mol.components();
        assert_eq!(components.len(), 3);
        assert_eq!(components[0].len(), 3);
        let split = mol.split_components();
        assert_eq!(split[1].heavy_atom_count(), 1);
    }

    #[test]
    fn test_hydrogen_roundtrip_keeps_counts() {
        let mut mol = Molecule::from_smiles("CC(=O)O").unwrap();
        let added = mol.add_explicit_hydrogens();
        assert_eq!(added, 4);
        assert_eq!(mol.atom_count(), 8);
        let removed = mol.strip_explicit_hydrogens();
        assert_eq!(removed, 4);
        let fresh = Molecule::from_smiles("OC(C)=O").unwrap();
        assert_eq!(
            mol.canonical_smiles().unwrap(),
            fresh.canonical_smiles().unwrap()
        );
    }

    #[test]
    fn test_hydrogen_roundtrip_keeps_stereo() {
        let smiles = "N[C@@H](C)C(=O)O";
        let expected = Molecule::from_smiles(smiles)
            .unwrap()
            .canonical_smiles()
            .unwrap();
        let mut mol = Molecule::from_smiles(smiles).unwrap();
        mol.add_explicit_hydrogens();
        mol.strip_explicit_hydrogens();
        assert_eq!(mol.canonical_smiles().unwrap(), expected);
    }

    #[test]
    fn test_isotopic_hydrogen_is_kept() {
        let mut mol = Molecule::from_smiles("[2H]C").unwrap();
        assert_eq!(mol.strip_explicit_hydrogens(), 0);
        assert_eq!(mol.atom_count(), 2);
    }

    #[test]
    fn test_hydrogen_on_attachment_is_kept() {
        let mut mol = Molecule::from_smiles("[1*][H]").unwrap();
        assert_eq!(mol.strip_explicit_hydrogens(), 0);
    }

    fn aromatic_atoms(smiles: &str) -> usize {
        let mol = Molecule::from_smiles(smiles).unwrap();
        mol.atoms().filter(|&n| mol.atom(n).aromatic).count()
    }

    #[test]
    fn test_smallest_rings() {
        let mol = Molecule::from_smiles("C1CCC2CCCCC2C1").unwrap();
        let mut sizes: Vec<usize> = mol.smallest_rings().iter().map(Vec::len).collect();
        sizes.sort();
        assert_eq!(sizes, vec![6, 6]);
        assert!(Molecule::from_smiles("CCO").unwrap().smallest_rings().is_empty());
    }

    #[test]
    fn test_kekule_rings_become_aromatic() {
        let mol = Molecule::from_smiles("OC1=CC=CC=C1").unwrap();
        let aromatic_bonds = mol
            .bonds()
            .filter(|&e| mol.bond(e).order == BondOrder::Aromatic)
            .count();
        assert_eq!(aromatic_bonds, 6);
        assert_eq!(aromatic_atoms("OC1=CC=CC=C1"), 6);
        // Naphthalene, pyrrole and pyridine.
        assert_eq!(aromatic_atoms("C1=CC=C2C=CC=CC2=C1"), 10);
        assert_eq!(aromatic_atoms("C1=CNC=C1"), 5);
        assert_eq!(aromatic_atoms("C1=CC=NC=C1"), 6);
    }

    #[test]
    fn test_non_huckel_rings_stay_kekule() {
        assert_eq!(aromatic_atoms("C1=CCC=C1"), 0);
        assert_eq!(aromatic_atoms("C1=CC=CC=CC=C1"), 0);
        assert_eq!(aromatic_atoms("O=C1C=CC(=O)C=C1"), 0);
        assert_eq!(aromatic_atoms("C1CCCCC1"), 0);
    }
}
