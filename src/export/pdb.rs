//! Minimal PDB coordinate writer: CRYST1, ATOM records, END.
//!
//! PDB coordinates are defined in angstrom, so the stored nm positions are
//! scaled by ten on output. Only rectangular boxes are expressible in a
//! CRYST1 record; anything triclinic is refused.

use std::io::Write;

use crate::error::Error;
use crate::interchange::Interchange;

use super::require_topology;

const NM_TO_ANGSTROM: f64 = 10.0;

/// Writes particle coordinates as a `.pdb` file.
pub fn write_pdb<W: Write>(
    w: &mut W,
    interchange: &Interchange,
    positions: &[[f64; 3]],
) -> Result<(), Error> {
    let topology = require_topology(interchange)?;

    if let Some(b) = interchange.box_vectors() {
        let off_diagonal = b[0][1] != 0.0
            || b[0][2] != 0.0
            || b[1][0] != 0.0
            || b[1][2] != 0.0
            || b[2][0] != 0.0
            || b[2][1] != 0.0;
        if off_diagonal {
            return Err(Error::InvalidBox(
                "triclinic boxes are not supported by the PDB writer".to_string(),
            ));
        }
        writeln!(
            w,
            "CRYST1{:9.3}{:9.3}{:9.3}{:7.2}{:7.2}{:7.2} P 1           1",
            b[0][0] * NM_TO_ANGSTROM,
            b[1][1] * NM_TO_ANGSTROM,
            b[2][2] * NM_TO_ANGSTROM,
            90.0,
            90.0,
            90.0,
        )?;
    }

    let mut index = 0usize;
    for (res, molecule) in topology.molecules().iter().enumerate() {
        let res_name = truncate(&molecule.name, 3);
        for atom in &molecule.atoms {
            let [x, y, z] = positions[index];
            writeln!(
                w,
                "ATOM  {:>5} {:<4}{:<4}A{:>4}    {:8.3}{:8.3}{:8.3}  1.00  0.00          {:>2}",
                (index + 1) % 100_000,
                truncate(&atom.name, 4),
                res_name,
                (res + 1) % 10_000,
                x * NM_TO_ANGSTROM,
                y * NM_TO_ANGSTROM,
                z * NM_TO_ANGSTROM,
                truncate(&atom.element, 2),
            )?;
            index += 1;
        }
    }
    writeln!(w, "END")?;

    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
