//! LAMMPS data-file writer.
//!
//! Emits a `full`-style data file: per-atom types, charges, and positions
//! plus typed bond, angle, and dihedral lists. Force-constant conventions
//! differ between the stored harmonic forms (`k/2 * (x - x0)^2`) and the
//! LAMMPS ones (`K * (x - x0)^2`), so harmonic constants are halved on the
//! way out. Values otherwise pass through in the units they are stored in.

use std::io::Write;

use log::warn;

use crate::error::Error;
use crate::handler::PotentialHandler;
use crate::interchange::Interchange;

use super::{per_atom_charges, require_topology, resolve_potential};

fn parameter(handler: &PotentialHandler, key_index: usize, name: &str) -> Result<f64, Error> {
    let (key, potential) = handler
        .potentials()
        .get_index(key_index)
        .ok_or_else(|| Error::InternalInconsistency("potential index out of range".to_string()))?;
    potential.parameter(name).map(|q| q.value).ok_or_else(|| {
        Error::InternalInconsistency(format!("potential {key} is missing `{name}`"))
    })
}

/// Writes the parameterized system as a LAMMPS data file.
pub fn write_data<W: Write>(
    w: &mut W,
    interchange: &Interchange,
    positions: &[[f64; 3]],
) -> Result<(), Error> {
    let topology = require_topology(interchange)?;
    let charges = per_atom_charges(interchange)?;

    let box_vectors = interchange
        .box_vectors()
        .ok_or_else(|| Error::InvalidBox("a LAMMPS data file requires a box".to_string()))?;
    let off_diagonal = box_vectors[0][1] != 0.0
        || box_vectors[0][2] != 0.0
        || box_vectors[1][0] != 0.0
        || box_vectors[1][2] != 0.0
        || box_vectors[2][0] != 0.0
        || box_vectors[2][1] != 0.0;
    if off_diagonal {
        return Err(Error::InvalidBox(
            "triclinic boxes are not supported by the LAMMPS writer".to_string(),
        ));
    }

    let vdw = interchange.handler("vdW")?;
    let bonds = interchange.handler("Bonds").ok();
    let angles = interchange.handler("Angles").ok();
    let propers = interchange.handler("ProperTorsions").ok();
    let impropers = interchange.handler("ImproperTorsions").ok();

    super::warn_dropped_virtual_sites(interchange, "LAMMPS data");

    if let Ok(constraints) = interchange.handler("Constraints") {
        if !constraints.slot_map().is_empty() {
            warn!(
                "{} distance constraints are not representable in a data file; \
                 configure fix shake separately",
                constraints.slot_map().len()
            );
        }
    }

    let count = |h: Option<&&PotentialHandler>| h.map_or(0, |h| h.slot_map().len());
    let type_count = |h: Option<&&PotentialHandler>| h.map_or(0, |h| h.potentials().len());

    writeln!(w, "LAMMPS data file written by mm-interchange")?;
    writeln!(w)?;
    writeln!(w, "{} atoms", topology.n_atoms())?;
    writeln!(w, "{} bonds", count(bonds.as_ref()))?;
    writeln!(w, "{} angles", count(angles.as_ref()))?;
    writeln!(w, "{} dihedrals", count(propers.as_ref()))?;
    writeln!(w, "{} impropers", count(impropers.as_ref()))?;
    writeln!(w)?;
    writeln!(w, "{} atom types", vdw.potentials().len())?;
    writeln!(w, "{} bond types", type_count(bonds.as_ref()))?;
    writeln!(w, "{} angle types", type_count(angles.as_ref()))?;
    writeln!(w, "{} dihedral types", type_count(propers.as_ref()))?;
    writeln!(w, "{} improper types", type_count(impropers.as_ref()))?;
    writeln!(w)?;
    writeln!(w, "0.0 {} xlo xhi", box_vectors[0][0])?;
    writeln!(w, "0.0 {} ylo yhi", box_vectors[1][1])?;
    writeln!(w, "0.0 {} zlo zhi", box_vectors[2][2])?;
    writeln!(w)?;

    // Atom type ids follow vdW potential-store order, one-based.
    let atom_type_of = |index: usize| -> Result<usize, Error> {
        let slot = crate::model::keys::TopologyKey::new([index]);
        let pot_key = vdw.slot_map().get(&slot).ok_or_else(|| {
            Error::InternalInconsistency(format!("atom {index} has no vdW slot"))
        })?;
        let type_index = vdw.potentials().get_index_of(pot_key).ok_or_else(|| {
            Error::InternalInconsistency(format!("dangling vdW potential key {pot_key}"))
        })?;
        Ok(type_index + 1)
    };

    writeln!(w, "Masses")?;
    writeln!(w)?;
    let mut masses = vec![None; vdw.potentials().len()];
    for (index, atom) in topology.atoms() {
        let type_id = atom_type_of(index)?;
        masses[type_id - 1].get_or_insert(atom.mass);
    }
    for (i, mass) in masses.iter().enumerate() {
        writeln!(w, "{} {}", i + 1, mass.unwrap_or(0.0))?;
    }
    writeln!(w)?;

    writeln!(w, "Pair Coeffs")?;
    writeln!(w)?;
    for i in 0..vdw.potentials().len() {
        let epsilon = parameter(vdw, i, "epsilon")?;
        let sigma = parameter(vdw, i, "sigma")?;
        writeln!(w, "{} {epsilon} {sigma}", i + 1)?;
    }
    writeln!(w)?;

    if let Some(bonds) = bonds {
        writeln!(w, "Bond Coeffs")?;
        writeln!(w)?;
        for i in 0..bonds.potentials().len() {
            let k = parameter(bonds, i, "k")? / 2.0;
            let length = parameter(bonds, i, "length")?;
            writeln!(w, "{} {k} {length}", i + 1)?;
        }
        writeln!(w)?;
    }

    if let Some(angles) = angles {
        writeln!(w, "Angle Coeffs")?;
        writeln!(w)?;
        for i in 0..angles.potentials().len() {
            let k = parameter(angles, i, "k")? / 2.0;
            let angle = parameter(angles, i, "angle")?;
            writeln!(w, "{} {k} {angle}", i + 1)?;
        }
        writeln!(w)?;
    }

    for (handler, section) in [(propers, "Dihedral Coeffs"), (impropers, "Improper Coeffs")] {
        if let Some(torsions) = handler {
            writeln!(w, "{section}")?;
            writeln!(w)?;
            for i in 0..torsions.potentials().len() {
                let k = parameter(torsions, i, "k")?;
                let periodicity = parameter(torsions, i, "periodicity")? as u32;
                let phase = parameter(torsions, i, "phase")?;
                writeln!(w, "{} {k} {periodicity} {phase}", i + 1)?;
            }
            writeln!(w)?;
        }
    }

    writeln!(w, "Atoms")?;
    writeln!(w)?;
    let mut index = 0usize;
    for (mol_id, molecule) in topology.molecules().iter().enumerate() {
        for _ in &molecule.atoms {
            let [x, y, z] = positions[index];
            writeln!(
                w,
                "{} {} {} {} {x} {y} {z}",
                index + 1,
                mol_id + 1,
                atom_type_of(index)?,
                charges[index],
            )?;
            index += 1;
        }
    }

    for (handler, section) in [
        (bonds, "Bonds"),
        (angles, "Angles"),
        (propers, "Dihedrals"),
        (impropers, "Impropers"),
    ] {
        let Some(handler) = handler else { continue };
        if handler.slot_map().is_empty() {
            continue;
        }
        writeln!(w)?;
        writeln!(w, "{section}")?;
        writeln!(w)?;
        for (n, (slot, pot_key)) in handler.slot_map().iter().enumerate() {
            resolve_potential(handler, pot_key)?;
            let type_id = handler
                .potentials()
                .get_index_of(pot_key)
                .unwrap_or_default()
                + 1;
            let indices: Vec<String> = slot
                .atom_indices()
                .iter()
                .map(|i| (i + 1).to_string())
                .collect();
            writeln!(w, "{} {} {}", n + 1, type_id, indices.join(" "))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::water_interchange;

    fn data_text() -> String {
        let interchange = water_interchange();
        let mut buf = Vec::new();
        write_data(&mut buf, &interchange, interchange.positions().unwrap()).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_counts_match_water() {
        let text = data_text();
        assert!(text.contains("3 atoms"));
        assert!(text.contains("2 bonds"));
        assert!(text.contains("1 angles"));
        assert!(text.contains("2 atom types"));
        assert!(text.contains("1 bond types"));
    }

    #[test]
    fn harmonic_constants_are_halved() {
        let text = data_text();
        // 462750.4 / 2 in Bond Coeffs, together with the rest length.
        assert!(text.contains("1 231375.2 0.09572"));
        // 836.8 / 2 in Angle Coeffs.
        assert!(text.contains("1 418.4 104.52"));
    }

    #[test]
    fn box_bounds_come_from_the_diagonal() {
        let text = data_text();
        assert!(text.contains("0.0 2.5 xlo xhi"));
        assert!(text.contains("0.0 2.5 zlo zhi"));
    }

    #[test]
    fn bond_list_is_one_based() {
        let text = data_text();
        let bonds = text.split("\nBonds\n").nth(1).unwrap();
        assert!(bonds.contains("1 1 1 2"));
        assert!(bonds.contains("2 1 1 3"));
    }
}
