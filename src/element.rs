use std::fmt::{Display, Formatter, Result as FmtResult};

/// A chemical element, identified by its atomic number.
///
/// Atomic number 0 is the attachment-point placeholder, written `*` in SMILES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Element(u8);

/// (atomic number, symbol, default valences in ascending order)
static ELEMENTS: &[(u8, &str, &[u8])] = &[
    (0, "*", &[]),
    (1, "H", &[1]),
    (2, "He", &[]),
    (3, "Li", &[1]),
    (4, "Be", &[2]),
    (5, "B", &[3]),
    (6, "C", &[4]),
    (7, "N", &[3, 5]),
    (8, "O", &[2]),
    (9, "F", &[1]),
    (10, "Ne", &[]),
    (11, "Na", &[1]),
    (12, "Mg", &[2]),
    (13, "Al", &[3]),
    (14, "Si", &[4]),
    (15, "P", &[3, 5]),
    (16, "S", &[2, 4, 6]),
    (17, "Cl", &[1]),
    (18, "Ar", &[]),
    (19, "K", &[1]),
    (20, "Ca", &[2]),
    (25, "Mn", &[]),
    (26, "Fe", &[]),
    (27, "Co", &[]),
    (28, "Ni", &[]),
    (29, "Cu", &[]),
    (30, "Zn", &[]),
    (31, "Ga", &[]),
    (32, "Ge", &[4]),
    (33, "As", &[3, 5]),
    (34, "Se", &[2, 4, 6]),
    (35, "Br", &[1]),
    (36, "Kr", &[]),
    (37, "Rb", &[1]),
    (38, "Sr", &[2]),
    (47, "Ag", &[]),
    (50, "Sn", &[]),
    (51, "Sb", &[]),
    (52, "Te", &[2]),
    (53, "I", &[1]),
    (54, "Xe", &[]),
    (55, "Cs", &[1]),
    (56, "Ba", &[2]),
    (78, "Pt", &[]),
    (79, "Au", &[]),
    (80, "Hg", &[]),
];

impl Element {
    pub const ATTACHMENT: Element = Element(0);
    pub const H: Element = Element(1);
    pub const C: Element = Element(6);
    pub const N: Element = Element(7);
    pub const O: Element = Element(8);

    pub fn from_atomic_number(number: u8) -> Option<Self> {
        ELEMENTS
            .iter()
            .find(|(n, _, _)| *n == number)
            .map(|(n, _, _)| Element(*n))
    }

    /// Look up an element by its (case-sensitive, capitalized) symbol.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        ELEMENTS
            .iter()
            .find(|(_, s, _)| *s == symbol)
            .map(|(n, _, _)| Element(*n))
    }

    pub fn atomic_number(self) -> u8 {
        self.0
    }

    pub fn symbol(self) -> &'static str {
        ELEMENTS
            .iter()
            .find(|(n, _, _)| *n == self.0)
            .map(|(_, s, _)| *s)
            .unwrap_or("*")
    }

    fn valences(self) -> &'static [u8] {
        ELEMENTS
            .iter()
            .find(|(n, _, _)| *n == self.0)
            .map(|(_, _, v)| *v)
            .unwrap_or(&[])
    }

    pub fn is_attachment(self) -> bool {
        self.0 == 0
    }

    pub fn is_hydrogen(self) -> bool {
        self.0 == 1
    }

    /// Heavy atoms are everything except hydrogen and attachment placeholders.
    pub fn is_heavy(self) -> bool {
        self.0 > 1
    }

    /// Whether the element may be written without brackets in SMILES.
    pub fn is_organic_subset(self, aromatic: bool) -> bool {
        if aromatic {
            matches!(self.0, 5 | 6 | 7 | 8 | 15 | 16)
        } else {
            matches!(self.0, 0 | 5 | 6 | 7 | 8 | 9 | 15 | 16 | 17 | 35 | 53)
        }
    }

    /// Implicit hydrogen count of an organic-subset atom given its explicit
    /// bonding.
    ///
    /// # Arguments
    ///
    /// * `aromatic` - Whether the atom itself is aromatic.
    /// * `bond_sum` - Sum of bond orders, aromatic bonds counted as one.
    pub fn default_implicit_hydrogens(self, aromatic: bool, bond_sum: u32) -> u8 {
        let valences = self.valences();
        if valences.is_empty() {
            return 0;
        }
        if aromatic {
            // One valence electron is donated to the pi system.
            let available = valences[0] as u32 - 1;
            return available.saturating_sub(bond_sum) as u8;
        }
        for &valence in valences {
            if valence as u32 >= bond_sum {
                return (valence as u32 - bond_sum) as u8;
            }
        }
        0
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_roundtrip() {
        for symbol in ["C", "N", "O", "Cl", "Br", "Se", "*"] {
            let element = Element::from_symbol(symbol).unwrap();
            assert_eq!(element.symbol(), symbol);
        }
        assert!(Element::from_symbol("Xx").is_none());
    }

    #[test]
    fn test_default_hydrogens() {
        assert_eq!(Element::C.default_implicit_hydrogens(false, 1), 3);
        assert_eq!(Element::C.default_implicit_hydrogens(false, 4), 0);
        assert_eq!(Element::C.default_implicit_hydrogens(true, 2), 1);
        assert_eq!(Element::N.default_implicit_hydrogens(true, 2), 0);
        // Hypervalent nitrogen falls through to the next valence.
        assert_eq!(Element::N.default_implicit_hydrogens(false, 4), 1);
        assert_eq!(Element::ATTACHMENT.default_implicit_hydrogens(false, 1), 0);
    }

    #[test]
    fn test_heavy() {
        assert!(Element::C.is_heavy());
        assert!(!Element::H.is_heavy());
        assert!(!Element::ATTACHMENT.is_heavy());
    }
}
