use crate::bond_ref::BondRef;
use crate::error::{MmpError, Result, ToolkitOperation};
use crate::molecule::{Atom, BondOrder, Molecule, Neighbor};
use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::*;

/// Placeholder labels used while cutting start here, well above any label a
/// finished Key or Value uses.
pub const ATTACHMENT_LABEL_BASE: u16 = 500;
/// Label base for atoms touched by more than one cut in a triplet check.
pub const SHARED_ATOM_LABEL_BASE: u16 = 1000;

fn working_label(label: u16) -> u16 {
    if label < ATTACHMENT_LABEL_BASE {
        label + ATTACHMENT_LABEL_BASE
    } else {
        label
    }
}

fn bond_break_error(message: String) -> MmpError {
    MmpError::toolkit(ToolkitOperation::BondBreak, message)
}

/// Update the parity of `atom` for `bond` being replaced by a new bond that
/// will be appended last in the atom's neighbor order.
///
/// Moving the new bond from the end back into the doomed bond's slot takes
/// `len - 1 - position` adjacent swaps; an odd count inverts the parity.
fn repair_parity(mol: &mut Molecule, atom: NodeIndex, bond: EdgeIndex) {
    if !mol.atom(atom).chirality.is_specified() {
        return;
    }
    let order = mol.neighbor_order(atom);
    let Some(position) = order.iter().position(|&slot| slot == Neighbor::Bond(bond)) else {
        return;
    };
    let swaps = order.len() - 1 - position;
    if swaps % 2 == 1 {
        let a = mol.atom_mut(atom);
        a.chirality = a.chirality.inverted();
        trace!("Inverted parity of atom {} ({swaps} swaps)", atom.index());
    }
}

/// Placeholders do not take part in aromaticity.
fn placeholder_order(order: BondOrder) -> BondOrder {
    match order {
        BondOrder::Aromatic => BondOrder::Single,
        other => other,
    }
}

/// Break a bond, capping both former endpoints with an attachment
/// placeholder labeled `label`.
///
/// # Returns
///
/// * The placeholders attached to the bond's `start` and `end` atoms.
pub fn break_bond(mol: &mut Molecule, bond: &BondRef, label: u16) -> Result<(NodeIndex, NodeIndex)> {
    break_bond_with_labels(mol, bond, label, label)
}

/// Like [`break_bond`], with a separate label for each end.
pub fn break_bond_with_labels(
    mol: &mut Molecule,
    bond: &BondRef,
    start_label: u16,
    end_label: u16,
) -> Result<(NodeIndex, NodeIndex)> {
    let edge = bond
        .resolve(mol)
        .ok_or_else(|| bond_break_error(format!("bond {bond} is not in the molecule")))?;
    let order = placeholder_order(mol.bond(edge).order);

    // Parity repair needs the neighbor order before the bond disappears.
    for atom in [bond.start(), bond.end()] {
        repair_parity(mol, atom, edge);
    }
    let start_up = mol.direction_from(bond.start(), edge);
    let end_up = mol.direction_from(bond.end(), edge);
    mol.remove_bond(edge);

    let mut cap = |atom: NodeIndex, label: u16, up: Option<bool>| {
        let placeholder = mol.add_atom(Atom::attachment(working_label(label)));
        let new_bond = mol.add_bond(atom, placeholder, order);
        if let Some(up) = up {
            mol.set_direction_from(atom, new_bond, up);
        }
        placeholder
    };
    let start = cap(bond.start(), start_label, start_up);
    let end = cap(bond.end(), end_label, end_up);
    trace!("Broke bond {bond} with labels {start_label}/{end_label}");
    Ok((start, end))
}

/// Break one bond as if it were cut twice: both endpoints are capped as in
/// [`break_bond`], and the bond itself becomes a free-standing
/// placeholder-placeholder pair carrying both labels.
pub fn break_one_bond_twice(
    mol: &mut Molecule,
    bond: &BondRef,
    first_label: u16,
    second_label: u16,
) -> Result<(NodeIndex, NodeIndex)> {
    let edge = bond
        .resolve(mol)
        .ok_or_else(|| bond_break_error(format!("bond {bond} is not in the molecule")))?;
    let order = placeholder_order(mol.bond(edge).order);
    let (start, end) = break_bond_with_labels(mol, bond, first_label, second_label)?;
    let first = mol.add_atom(Atom::attachment(working_label(first_label)));
    let second = mol.add_atom(Atom::attachment(working_label(second_label)));
    mol.add_bond(first, second, order);
    Ok((start, end))
}

/// Cut every bond of `bonds` on a copy of `mol`, labeling the i-th cut
/// `ATTACHMENT_LABEL_BASE + i`.
pub fn cut_bonds(mol: &Molecule, bonds: &[BondRef]) -> Result<Molecule> {
    let mut cut = mol.clone();
    for (i, bond) in bonds.iter().enumerate() {
        break_bond(&mut cut, bond, ATTACHMENT_LABEL_BASE + i as u16)?;
    }
    Ok(cut)
}

fn sole_neighbor(mol: &Molecule, placeholder: NodeIndex) -> Result<(NodeIndex, EdgeIndex)> {
    if !mol.atom(placeholder).is_attachment() {
        return Err(bond_break_error(format!(
            "atom {} is not an attachment point",
            placeholder.index()
        )));
    }
    let bonds = mol.incident_bonds(placeholder);
    match bonds.as_slice() {
        [bond] => {
            let neighbor = mol
                .other_atom(*bond, placeholder)
                .ok_or_else(|| bond_break_error("dangling bond".to_string()))?;
            Ok((neighbor, *bond))
        }
        _ => Err(bond_break_error(format!(
            "attachment point {} has {} bonds",
            placeholder.index(),
            bonds.len()
        ))),
    }
}

/// Fuse two attachment points back into a single bond between their
/// neighbors, the inverse of [`break_bond`].
pub fn rejoin(mol: &mut Molecule, first: NodeIndex, second: NodeIndex) -> Result<()> {
    let (a, a_bond) = sole_neighbor(mol, first)?;
    let (b, b_bond) = sole_neighbor(mol, second)?;
    if a == b || mol.find_bond(a, b).is_some() {
        return Err(bond_break_error(format!(
            "atoms {} and {} cannot be rejoined",
            a.index(),
            b.index()
        )));
    }
    repair_parity(mol, a, a_bond);
    repair_parity(mol, b, b_bond);
    let order = mol.bond(a_bond).order;
    let up = mol.direction_from(a, a_bond);

    mol.remove_bond(a_bond);
    if let Some(b_bond) = mol.find_bond(b, second) {
        mol.remove_bond(b_bond);
    }
    let joined = mol.add_bond(a, b, order);
    if let Some(up) = up {
        mol.set_direction_from(a, joined, up);
    }

    // Removing the higher index first keeps the lower one valid.
    let (high, low) = if first > second {
        (first, second)
    } else {
        (second, first)
    };
    mol.remove_atom(high);
    mol.remove_atom(low);
    Ok(())
}
