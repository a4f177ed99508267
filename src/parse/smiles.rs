use crate::element::Element;
use crate::error::SmilesError;
use crate::molecule::{
    permutation_is_odd, Atom, BondDirection, BondOrder, Chirality, Molecule, Neighbor,
};
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::BTreeMap;
use tracing::*;

/// A neighbor slot in the order the SMILES string lists an atom's neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Hydrogen,
    Bond(EdgeIndex),
    /// A ring bond that has been opened but not closed yet.
    OpenRing,
}

struct OpenRing {
    atom: NodeIndex,
    order: Option<BondOrder>,
    direction: Option<BondDirection>,
    slot: usize,
}

struct SmilesParser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
    mol: Molecule,
    prev: Option<NodeIndex>,
    branches: Vec<NodeIndex>,
    pending_order: Option<BondOrder>,
    pending_direction: Option<BondDirection>,
    pending_pos: usize,
    rings: BTreeMap<u16, OpenRing>,
    slots: Vec<Vec<Slot>>,
    organic: Vec<NodeIndex>,
    implicit_aromatic: Vec<EdgeIndex>,
}

/// Parses a SMILES string into a molecule.
///
/// # Arguments
///
/// * `smiles` - The SMILES string to parse.
///
/// # Returns
///
/// * `Result<Molecule, SmilesError>` - The parsed molecule. Tetrahedral
///   parities are converted to the molecule's reference neighbor order.
pub fn parse_smiles(smiles: &str) -> Result<Molecule, SmilesError> {
    let parser = SmilesParser {
        input: smiles,
        chars: smiles.trim().chars().collect(),
        pos: 0,
        mol: Molecule::new(),
        prev: None,
        branches: Vec::new(),
        pending_order: None,
        pending_direction: None,
        pending_pos: 0,
        rings: BTreeMap::new(),
        slots: Vec::new(),
        organic: Vec::new(),
        implicit_aromatic: Vec::new(),
    };
    parser.parse()
}

impl SmilesParser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn has_pending_bond(&self) -> bool {
        self.pending_order.is_some() || self.pending_direction.is_some()
    }

    fn parse(mut self) -> Result<Molecule, SmilesError> {
        if self.chars.is_empty() {
            return Err(SmilesError::Empty);
        }
        while let Some(c) = self.peek() {
            match c {
                '[' => {
                    let atom = self.parse_bracket_atom()?;
                    self.attach_atom(atom, true);
                }
                '(' => {
                    let current = self.prev.ok_or(SmilesError::BranchNoCurrentAtom(self.pos))?;
                    self.branches.push(current);
                    self.pos += 1;
                }
                ')' => {
                    if self.has_pending_bond() {
                        return Err(SmilesError::DanglingBond(self.pending_pos));
                    }
                    self.prev = Some(
                        self.branches
                            .pop()
                            .ok_or(SmilesError::BranchEndNoStart(self.pos))?,
                    );
                    self.pos += 1;
                }
                '-' | '=' | '#' | ':' | '/' | '\\' => {
                    if self.has_pending_bond() {
                        return Err(SmilesError::UnexpectedCharacter(c, self.pos));
                    }
                    self.pending_pos = self.pos;
                    self.pending_order = Some(match c {
                        '=' => BondOrder::Double,
                        '#' => BondOrder::Triple,
                        ':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    });
                    self.pending_direction = match c {
                        '/' => Some(BondDirection::Up),
                        '\\' => Some(BondDirection::Down),
                        _ => None,
                    };
                    self.pos += 1;
                }
                '.' => {
                    if self.has_pending_bond() {
                        return Err(SmilesError::DanglingBond(self.pending_pos));
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                '%' => {
                    let start = self.pos;
                    let tens = self.peek_at(1).and_then(|c| c.to_digit(10));
                    let ones = self.peek_at(2).and_then(|c| c.to_digit(10));
                    match (tens, ones) {
                        (Some(t), Some(o)) => {
                            self.pos += 3;
                            self.ring_closure((t * 10 + o) as u16, start)?;
                        }
                        _ => return Err(SmilesError::UnexpectedCharacter('%', start)),
                    }
                }
                c if c.is_ascii_digit() => {
                    let start = self.pos;
                    self.pos += 1;
                    self.ring_closure(c.to_digit(10).unwrap_or(0) as u16, start)?;
                }
                _ => {
                    let atom = self.parse_organic_atom()?;
                    self.attach_atom(atom, false);
                }
            }
        }

        if !self.branches.is_empty() {
            return Err(SmilesError::UnclosedBranch);
        }
        if let Some((&number, _)) = self.rings.iter().next() {
            return Err(SmilesError::UnclosedRing(number));
        }
        if self.has_pending_bond() {
            return Err(SmilesError::DanglingBond(self.pending_pos));
        }

        self.finish()
    }

    fn finish(mut self) -> Result<Molecule, SmilesError> {
        // Two aromatic atoms written next to each other outside a ring are
        // joined by a plain single bond (biphenyl).
        for bond in std::mem::take(&mut self.implicit_aromatic) {
            if !self.mol.is_ring_bond(bond) {
                self.mol.bond_mut(bond).order = BondOrder::Single;
            }
        }

        for atom in std::mem::take(&mut self.organic) {
            let hydrogens = self.mol.default_implicit_hydrogens(atom);
            self.mol.atom_mut(atom).hydrogens = hydrogens;
        }

        for atom in self.mol.atoms().collect::<Vec<_>>() {
            if !self.mol.atom(atom).chirality.is_specified() {
                continue;
            }
            let written: Vec<Neighbor> = self.slots[atom.index()]
                .iter()
                .filter_map(|slot| match slot {
                    Slot::Hydrogen => Some(Neighbor::ImplicitHydrogen),
                    Slot::Bond(e) => Some(Neighbor::Bond(*e)),
                    Slot::OpenRing => None,
                })
                .collect();
            let reference = self.mol.neighbor_order(atom);
            let odd = permutation_is_odd(&written, &reference);
            let a = self.mol.atom_mut(atom);
            a.chirality = a.chirality.permuted(odd);
        }
        self.mol.perceive_aromaticity();

        trace!(
            "Parsed '{}' into {} atoms and {} bonds",
            self.input,
            self.mol.atom_count(),
            self.mol.bond_count()
        );
        Ok(self.mol)
    }

    fn attach_atom(&mut self, atom: Atom, bracket: bool) {
        let aromatic = atom.aromatic;
        let explicit_hydrogens = atom.hydrogens;
        let node = self.mol.add_atom(atom);
        self.slots.push(Vec::new());
        if !bracket {
            self.organic.push(node);
        }

        if let Some(prev) = self.prev {
            let order = match self.pending_order {
                Some(order) => order,
                None if aromatic && self.mol.atom(prev).aromatic => BondOrder::Aromatic,
                None => BondOrder::Single,
            };
            let bond = self
                .mol
                .add_directed_bond(prev, node, order, self.pending_direction);
            if self.pending_order.is_none() && order == BondOrder::Aromatic {
                self.implicit_aromatic.push(bond);
            }
            self.slots[prev.index()].push(Slot::Bond(bond));
            self.slots[node.index()].push(Slot::Bond(bond));
        }
        if bracket && explicit_hydrogens > 0 {
            self.slots[node.index()].push(Slot::Hydrogen);
        }

        self.pending_order = None;
        self.pending_direction = None;
        self.prev = Some(node);
    }

    fn ring_closure(&mut self, number: u16, start: usize) -> Result<(), SmilesError> {
        let current = self
            .prev
            .ok_or(SmilesError::RingClosureNoCurrentAtom(number, start))?;

        let Some(open) = self.rings.remove(&number) else {
            self.rings.insert(
                number,
                OpenRing {
                    atom: current,
                    order: self.pending_order,
                    direction: self.pending_direction,
                    slot: self.slots[current.index()].len(),
                },
            );
            self.slots[current.index()].push(Slot::OpenRing);
            self.pending_order = None;
            self.pending_direction = None;
            return Ok(());
        };

        if open.atom == current || self.mol.find_bond(open.atom, current).is_some() {
            return Err(SmilesError::InvalidRingClosure(number));
        }
        let order = match self.pending_order.or(open.order) {
            Some(order) => order,
            None if self.mol.atom(current).aromatic && self.mol.atom(open.atom).aromatic => {
                BondOrder::Aromatic
            }
            None => BondOrder::Single,
        };
        let bond = match (self.pending_direction, open.direction) {
            (Some(direction), _) => {
                self.mol
                    .add_directed_bond(current, open.atom, order, Some(direction))
            }
            (None, direction) => self.mol.add_directed_bond(open.atom, current, order, direction),
        };
        self.slots[open.atom.index()][open.slot] = Slot::Bond(bond);
        self.slots[current.index()].push(Slot::Bond(bond));
        self.pending_order = None;
        self.pending_direction = None;
        Ok(())
    }

    fn parse_organic_atom(&mut self) -> Result<Atom, SmilesError> {
        let start = self.pos;
        let c = self.peek().ok_or(SmilesError::Empty)?;
        let next = self.peek_at(1);
        let (symbol, aromatic, len) = match (c, next) {
            ('C', Some('l')) => ("Cl".to_string(), false, 2),
            ('B', Some('r')) => ("Br".to_string(), false, 2),
            ('B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' | '*', _) => (c.to_string(), false, 1),
            ('b' | 'c' | 'n' | 'o' | 'p' | 's', _) => (c.to_ascii_uppercase().to_string(), true, 1),
            _ => return Err(SmilesError::UnexpectedCharacter(c, start)),
        };
        let element = Element::from_symbol(&symbol)
            .ok_or_else(|| SmilesError::UnknownElement(symbol.clone(), start))?;
        self.pos += len;
        Ok(Atom {
            aromatic,
            ..Atom::new(element)
        })
    }

    fn read_number(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .parse()
            .ok()
    }

    /// Parse `[isotope symbol chirality Hcount charge :map]`.
    fn parse_bracket_atom(&mut self) -> Result<Atom, SmilesError> {
        let open = self.pos;
        let close = self.chars[open..]
            .iter()
            .position(|&c| c == ']')
            .map(|offset| open + offset)
            .ok_or(SmilesError::UnclosedBracket(open))?;
        self.pos += 1;

        let isotope = self.read_number().map(|n| n as u16);

        let symbol_start = self.pos;
        let c = self
            .peek()
            .ok_or(SmilesError::UnclosedBracket(open))?;
        let (element, aromatic) = if c == '*' {
            self.pos += 1;
            (Some(Element::ATTACHMENT), false)
        } else if c.is_ascii_uppercase() {
            let two: String = [Some(c), self.peek_at(1)].iter().flatten().collect();
            match self.peek_at(1) {
                Some(l) if l.is_ascii_lowercase() && Element::from_symbol(&two).is_some() => {
                    self.pos += 2;
                    (Element::from_symbol(&two), false)
                }
                _ => {
                    self.pos += 1;
                    (Element::from_symbol(&c.to_string()), false)
                }
            }
        } else if c.is_ascii_lowercase() {
            let two: String = [Some(c), self.peek_at(1)].iter().flatten().collect();
            if two == "se" || two == "as" {
                self.pos += 2;
                (Element::from_symbol(&capitalize(&two)), true)
            } else if matches!(c, 'b' | 'c' | 'n' | 'o' | 'p' | 's') {
                self.pos += 1;
                (Element::from_symbol(&c.to_ascii_uppercase().to_string()), true)
            } else {
                return Err(SmilesError::UnexpectedCharacter(c, symbol_start));
            }
        } else {
            return Err(SmilesError::UnexpectedCharacter(c, symbol_start));
        };
        let element = element.ok_or_else(|| {
            SmilesError::UnknownElement(
                self.chars[symbol_start..self.pos].iter().collect(),
                symbol_start,
            )
        })?;

        let mut chirality = Chirality::Unspecified;
        if self.peek() == Some('@') {
            self.pos += 1;
            chirality = if self.peek() == Some('@') {
                self.pos += 1;
                Chirality::Clockwise
            } else {
                Chirality::CounterClockwise
            };
        }

        let mut hydrogens = 0;
        if self.peek() == Some('H') {
            self.pos += 1;
            hydrogens = self.read_number().unwrap_or(1) as u8;
        }

        let mut charge: i8 = 0;
        while let Some(sign @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let unit = if sign == '+' { 1 } else { -1 };
            match self.read_number() {
                Some(n) => charge += unit * n as i8,
                None => charge += unit,
            }
        }

        let mut map = None;
        if self.peek() == Some(':') {
            self.pos += 1;
            map = self.read_number().map(|n| n as u16);
        }

        if self.pos != close {
            let c = self.peek().unwrap_or(']');
            return Err(SmilesError::UnexpectedCharacter(c, self.pos));
        }
        self.pos += 1;

        Ok(Atom {
            element,
            aromatic,
            isotope,
            charge,
            hydrogens,
            chirality,
            map,
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let mol = parse_smiles("CC(=O)O").unwrap();
        assert_eq!(mol.atom_count(), 4);
        assert_eq!(mol.bond_count(), 3);
        let carbon = NodeIndex::new(0);
        assert_eq!(mol.atom(carbon).hydrogens, 3);
        let carbonyl = NodeIndex::new(1);
        assert_eq!(mol.atom(carbonyl).hydrogens, 0);
    }

    #[test]
    fn test_parse_aromatic() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(mol.atom_count(), 6);
        assert!(mol
            .bonds()
            .all(|e| mol.bond(e).order == BondOrder::Aromatic));
        assert!(mol.atoms().all(|n| mol.atom(n).hydrogens == 1));
    }

    #[test]
    fn test_biphenyl_linker_is_single() {
        let mol = parse_smiles("c1ccccc1-c1ccccc1").unwrap();
        let singles = mol
            .bonds()
            .filter(|&e| mol.bond(e).order == BondOrder::Single)
            .count();
        assert_eq!(singles, 1);
        let mol = parse_smiles("c1ccccc1c1ccccc1").unwrap();
        let singles = mol
            .bonds()
            .filter(|&e| mol.bond(e).order == BondOrder::Single)
            .count();
        assert_eq!(singles, 1);
    }

    #[test]
    fn test_bracket_atoms() {
        let mol = parse_smiles("[13CH3][NH3+].[Cl-].[2*:7]").unwrap();
        let c = mol.atom(NodeIndex::new(0));
        assert_eq!(c.isotope, Some(13));
        assert_eq!(c.hydrogens, 3);
        let n = mol.atom(NodeIndex::new(1));
        assert_eq!(n.charge, 1);
        assert_eq!(n.hydrogens, 3);
        assert_eq!(mol.atom(NodeIndex::new(2)).charge, -1);
        let star = mol.atom(NodeIndex::new(3));
        assert_eq!(star.attachment_label(), Some(2));
        assert_eq!(star.map, Some(7));
    }

    #[test]
    fn test_ring_closure_percent() {
        let mol = parse_smiles("C%12CC%12").unwrap();
        assert_eq!(mol.bond_count(), 3);
        assert_eq!(mol.ring_bonds().len(), 3);
    }

    #[test]
    fn test_chirality_reference_order() {
        // Same stereocenter written two ways, both with the implicit H
        // in a different SMILES position.
        let a = parse_smiles("N[C@@H](C)C(=O)O").unwrap();
        let b = parse_smiles("[C@@H](N)(C)C(=O)O").unwrap();
        // In the first, H is second in the written order; in the second it is
        // first. One swap apart, so with the same bond serials the reference
        // parities must differ.
        let ca = a.atom(NodeIndex::new(1)).chirality;
        let cb = b.atom(NodeIndex::new(0)).chirality;
        assert!(ca.is_specified() && cb.is_specified());
        assert_ne!(ca, cb);
    }

    #[test]
    fn test_bond_directions() {
        let mol = parse_smiles("F/C=C/F").unwrap();
        let directed = mol
            .bonds()
            .filter(|&e| mol.bond(e).direction.is_some())
            .count();
        assert_eq!(directed, 2);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_smiles(""), Err(SmilesError::Empty)));
        assert!(matches!(parse_smiles("C(C"), Err(SmilesError::UnclosedBranch)));
        assert!(matches!(parse_smiles("C1CC"), Err(SmilesError::UnclosedRing(1))));
        assert!(matches!(parse_smiles("CC)"), Err(SmilesError::BranchEndNoStart(_))));
        assert!(matches!(parse_smiles("[CH3"), Err(SmilesError::UnclosedBracket(0))));
        assert!(matches!(parse_smiles("C="), Err(SmilesError::DanglingBond(_))));
        assert!(parse_smiles("[Xx]").is_err());
        assert!(parse_smiles("not smiles").is_err());
    }
}
