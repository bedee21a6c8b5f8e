//! GROMACS `.gro` coordinate and `.top` topology writers.
//!
//! Distances are written in nm and energies in kJ/mol, which are GROMACS's
//! native units, so values pass through unchanged. The topology is written
//! as a single `[ moleculetype ]` covering every atom, numbered by global
//! index.

use std::io::Write;

use crate::error::Error;
use crate::handler::MixingRule;
use crate::interchange::Interchange;
use crate::model::potential::Potential;

use super::{per_atom_charges, require_topology, resolve_potential};

fn parameter(potential: &Potential, name: &str, context: &str) -> Result<f64, Error> {
    potential
        .parameter(name)
        .map(|q| q.value)
        .ok_or_else(|| {
            Error::InternalInconsistency(format!("{context} potential is missing `{name}`"))
        })
}

/// Writes particle coordinates as a `.gro` file.
pub fn write_gro<W: Write>(
    w: &mut W,
    interchange: &Interchange,
    positions: &[[f64; 3]],
) -> Result<(), Error> {
    let topology = require_topology(interchange)?;

    writeln!(w, "written by mm-interchange")?;
    writeln!(w, "{:5}", topology.n_atoms())?;

    let mut index = 0usize;
    for (res, molecule) in topology.molecules().iter().enumerate() {
        for atom in &molecule.atoms {
            let [x, y, z] = positions[index];
            writeln!(
                w,
                "{:>5}{:<5}{:>5}{:>5}{:8.3}{:8.3}{:8.3}",
                (res + 1) % 100_000,
                truncate(&molecule.name, 5),
                truncate(&atom.name, 5),
                (index + 1) % 100_000,
                x,
                y,
                z,
            )?;
            index += 1;
        }
    }

    match interchange.box_vectors() {
        Some(b) => {
            let diagonal_only = b[0][1] == 0.0
                && b[0][2] == 0.0
                && b[1][0] == 0.0
                && b[1][2] == 0.0
                && b[2][0] == 0.0
                && b[2][1] == 0.0;
            if diagonal_only {
                writeln!(w, "{:10.5} {:10.5} {:10.5}", b[0][0], b[1][1], b[2][2])?;
            } else {
                writeln!(
                    w,
                    "{:10.5} {:10.5} {:10.5} {:10.5} {:10.5} {:10.5} {:10.5} {:10.5} {:10.5}",
                    b[0][0], b[1][1], b[2][2], b[0][1], b[0][2], b[1][0], b[1][2], b[2][0], b[2][1],
                )?;
            }
        }
        None => writeln!(w, "{:10.5} {:10.5} {:10.5}", 0.0, 0.0, 0.0)?,
    }

    Ok(())
}

/// Writes the parameterized system as a `.top` file.
pub fn write_top<W: Write>(w: &mut W, interchange: &Interchange) -> Result<(), Error> {
    let topology = require_topology(interchange)?;
    super::warn_dropped_virtual_sites(interchange, "GROMACS topology");
    let charges = per_atom_charges(interchange)?;

    let vdw = interchange.handler("vdW")?;
    let vdw_settings = vdw.nonbonded().ok_or_else(|| {
        Error::InternalInconsistency("vdW handler has no nonbonded settings".to_string())
    })?;
    let comb_rule = match vdw_settings.mixing_rule {
        Some(MixingRule::Geometric) => 3,
        _ => 2,
    };
    let fudge_lj = vdw_settings.scale_14;
    let fudge_qq = interchange
        .handler("Electrostatics")
        .ok()
        .and_then(|h| h.nonbonded())
        .map(|s| s.scale_14)
        .unwrap_or(fudge_lj);

    writeln!(w, "; written by mm-interchange")?;
    writeln!(w, "[ defaults ]")?;
    writeln!(w, "; nbfunc  comb-rule  gen-pairs  fudgeLJ  fudgeQQ")?;
    writeln!(w, "1  {comb_rule}  no  {fudge_lj}  {fudge_qq}")?;
    writeln!(w)?;

    writeln!(w, "[ atomtypes ]")?;
    writeln!(w, "; name  at.num  mass  charge  ptype  sigma  epsilon")?;
    for (key, potential) in vdw.potentials() {
        let sigma = parameter(potential, "sigma", "vdW")?;
        let epsilon = parameter(potential, "epsilon", "vdW")?;
        writeln!(w, "{}  0  0.0  0.0  A  {sigma}  {epsilon}", key.id())?;
    }
    writeln!(w)?;

    writeln!(w, "[ moleculetype ]")?;
    writeln!(w, "; name  nrexcl")?;
    writeln!(w, "system  3")?;
    writeln!(w)?;

    writeln!(w, "[ atoms ]")?;
    writeln!(w, "; nr  type  resnr  residue  atom  cgnr  charge  mass")?;
    let mut index = 0usize;
    for (res, molecule) in topology.molecules().iter().enumerate() {
        for atom in &molecule.atoms {
            writeln!(
                w,
                "{}  {}  {}  {}  {}  {}  {}  {}",
                index + 1,
                atom.atom_type,
                res + 1,
                truncate(&molecule.name, 5),
                atom.name,
                index + 1,
                charges[index],
                atom.mass,
            )?;
            index += 1;
        }
    }
    writeln!(w)?;

    if let Ok(bonds) = interchange.handler("Bonds") {
        writeln!(w, "[ bonds ]")?;
        writeln!(w, "; ai  aj  funct  length  k")?;
        for (slot, pot_key) in bonds.slot_map() {
            let potential = resolve_potential(bonds, pot_key)?;
            let length = parameter(potential, "length", "bond")?;
            let k = parameter(potential, "k", "bond")?;
            let [i, j] = two(slot.atom_indices())?;
            writeln!(w, "{}  {}  1  {length}  {k}", i + 1, j + 1)?;
        }
        writeln!(w)?;
    }

    if let Ok(constraints) = interchange.handler("Constraints") {
        writeln!(w, "[ constraints ]")?;
        writeln!(w, "; ai  aj  funct  distance")?;
        for (slot, pot_key) in constraints.slot_map() {
            let potential = resolve_potential(constraints, pot_key)?;
            let distance = parameter(potential, "distance", "constraint")?;
            let [i, j] = two(slot.atom_indices())?;
            writeln!(w, "{}  {}  1  {distance}", i + 1, j + 1)?;
        }
        writeln!(w)?;
    }

    if let Ok(angles) = interchange.handler("Angles") {
        writeln!(w, "[ angles ]")?;
        writeln!(w, "; ai  aj  ak  funct  angle  k")?;
        for (slot, pot_key) in angles.slot_map() {
            let potential = resolve_potential(angles, pot_key)?;
            let angle = parameter(potential, "angle", "angle")?;
            let k = parameter(potential, "k", "angle")?;
            let [i, j, k_idx] = three(slot.atom_indices())?;
            writeln!(w, "{}  {}  {}  1  {angle}  {k}", i + 1, j + 1, k_idx + 1)?;
        }
        writeln!(w)?;
    }

    for (handler_name, funct) in [("ProperTorsions", 9), ("ImproperTorsions", 4)] {
        if let Ok(torsions) = interchange.handler(handler_name) {
            writeln!(w, "[ dihedrals ]")?;
            writeln!(w, "; ai  aj  ak  al  funct  phase  k  periodicity")?;
            for (slot, pot_key) in torsions.slot_map() {
                let potential = resolve_potential(torsions, pot_key)?;
                let phase = parameter(potential, "phase", "torsion")?;
                let k = parameter(potential, "k", "torsion")?;
                let periodicity = parameter(potential, "periodicity", "torsion")? as u32;
                let [i, j, k_idx, l] = four(slot.atom_indices())?;
                writeln!(
                    w,
                    "{}  {}  {}  {}  {funct}  {phase}  {k}  {periodicity}",
                    i + 1,
                    j + 1,
                    k_idx + 1,
                    l + 1,
                )?;
            }
            writeln!(w)?;
        }
    }

    writeln!(w, "[ system ]")?;
    writeln!(w, "system")?;
    writeln!(w)?;
    writeln!(w, "[ molecules ]")?;
    writeln!(w, "system  1")?;

    Ok(())
}

fn two(indices: &[usize]) -> Result<[usize; 2], Error> {
    match indices {
        [i, j] => Ok([*i, *j]),
        other => Err(Error::InternalInconsistency(format!(
            "expected a pairwise slot, found {} indices",
            other.len()
        ))),
    }
}

fn three(indices: &[usize]) -> Result<[usize; 3], Error> {
    match indices {
        [i, j, k] => Ok([*i, *j, *k]),
        other => Err(Error::InternalInconsistency(format!(
            "expected a three-atom slot, found {} indices",
            other.len()
        ))),
    }
}

fn four(indices: &[usize]) -> Result<[usize; 4], Error> {
    match indices {
        [i, j, k, l] => Ok([*i, *j, *k, *l]),
        other => Err(Error::InternalInconsistency(format!(
            "expected a four-atom slot, found {} indices",
            other.len()
        ))),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
