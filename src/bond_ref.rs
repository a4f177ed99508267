use crate::error::{MmpError, Result, ToolkitOperation};
use crate::molecule::Molecule;
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};

/// A bond identified by its two endpoint atoms.
///
/// Equality and hashing use the unordered pair. Endpoints are stored with the
/// smaller index first, so the lexicographic `(start, end)` order agrees with
/// equality.
#[derive(Debug, Clone)]
pub struct BondRef {
    start: NodeIndex,
    end: NodeIndex,
    /// Only valid until the first bond removal on the molecule.
    bond_index_at_creation: EdgeIndex,
    fragmentation_index: Option<u16>,
}

impl BondRef {
    pub fn new(a: NodeIndex, b: NodeIndex, bond_index_at_creation: EdgeIndex) -> Self {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Self {
            start,
            end,
            bond_index_at_creation,
            fragmentation_index: None,
        }
    }

    /// Reference an existing bond of `mol`.
    pub fn from_bond(mol: &Molecule, bond: EdgeIndex) -> Option<Self> {
        let (a, b) = mol.endpoints(bond)?;
        Some(Self::new(a, b, bond))
    }

    pub fn start(&self) -> NodeIndex {
        self.start
    }

    pub fn end(&self) -> NodeIndex {
        self.end
    }

    pub fn bond_index_at_creation(&self) -> EdgeIndex {
        self.bond_index_at_creation
    }

    pub fn fragmentation_index(&self) -> Option<u16> {
        self.fragmentation_index
    }

    /// Assign the attachment-point label. A label can only be assigned once.
    pub fn set_fragmentation_index(&mut self, index: u16) -> Result<()> {
        match self.fragmentation_index {
            Some(existing) => Err(MmpError::toolkit(
                ToolkitOperation::BondBreak,
                format!("bond {self} already labeled {existing}"),
            )),
            None => {
                self.fragmentation_index = Some(index);
                Ok(())
            }
        }
    }

    pub fn touches(&self, atom: NodeIndex) -> bool {
        self.start == atom || self.end == atom
    }

    /// Find the bond in the live graph, preferring the creation-time index
    /// when it still points at the same atoms.
    pub fn resolve(&self, mol: &Molecule) -> Option<EdgeIndex> {
        if let Some((a, b)) = mol.endpoints(self.bond_index_at_creation) {
            if (a == self.start && b == self.end) || (a == self.end && b == self.start) {
                return Some(self.bond_index_at_creation);
            }
        }
        mol.find_bond(self.start, self.end)
    }
}

impl PartialEq for BondRef {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl Eq for BondRef {}

impl Hash for BondRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl PartialOrd for BondRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BondRef {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.start, self.end).cmp(&(other.start, other.end))
    }
}

impl Display for BondRef {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}-{}", self.start.index(), self.end.index())
    }
}
