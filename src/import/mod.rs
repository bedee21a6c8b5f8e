//! Import adapters: populate potential handlers from a source force field
//! and a topology.
//!
//! Each adapter is an explicit free function invoked by
//! [`Interchange::from_force_field`](crate::Interchange::from_force_field);
//! no behavior is ever attached to foreign types. Every adapter follows the
//! same two idempotent steps: establish the slot map, then attach potentials
//! to the referenced keys.
//!
//! Ordering contract: bonds are built before constraints, because a
//! constrained distance is taken from the bond table's equilibrium length
//! whenever bond parameters exist for the pair, and only otherwise from the
//! constraint table itself.

pub mod forcefield;

use indexmap::IndexMap;
use log::warn;

use crate::error::Error;
use crate::handler::{InteractionFamily, PotentialHandler};
use crate::model::keys::{PotentialKey, TopologyKey};
use crate::model::quantity::Quantity;
use crate::model::topology::Topology;

pub use forcefield::ForceField;

/// Builds every handler the force field registers, keyed by canonical name.
pub fn build_handlers(
    force_field: &ForceField,
    topology: &Topology,
) -> Result<IndexMap<String, PotentialHandler>, Error> {
    let mut handlers = IndexMap::new();

    if !force_field.bonds.is_empty() {
        let handler = bond_handler(force_field, topology)?;
        handlers.insert(handler.name().to_string(), handler);
    }
    if !force_field.constraints.is_empty() {
        let handler = constraint_handler(force_field, topology)?;
        handlers.insert(handler.name().to_string(), handler);
    }
    if !force_field.angles.is_empty() {
        let handler = angle_handler(force_field, topology)?;
        handlers.insert(handler.name().to_string(), handler);
    }
    if !force_field.propers.is_empty() {
        let handler = proper_torsion_handler(force_field, topology)?;
        handlers.insert(handler.name().to_string(), handler);
    }
    if !force_field.impropers.is_empty() {
        let handler = improper_torsion_handler(force_field, topology)?;
        handlers.insert(handler.name().to_string(), handler);
    }
    if force_field.vdw.is_some() {
        let handler = vdw_handler(force_field, topology)?;
        handlers.insert(handler.name().to_string(), handler);
    }
    if force_field.electrostatics.is_some() {
        let handler = electrostatics_handler(force_field, topology)?;
        handlers.insert(handler.name().to_string(), handler);
    } else if !force_field.library_charges.is_empty() || !force_field.charge_increments.is_empty()
    {
        warn!(
            "charge tables are declared but there is no [electrostatics] section; \
             no Electrostatics handler is built and the charges are unused"
        );
    }
    if !force_field.virtual_sites.is_empty() {
        let handler = virtual_site_handler(force_field, topology);
        handlers.insert(handler.name().to_string(), handler);
    }

    Ok(handlers)
}

fn atom_types(topology: &Topology) -> Vec<&str> {
    topology
        .atoms()
        .map(|(_, atom)| atom.atom_type.as_str())
        .collect()
}

/// Populates the bond handler from the bond table.
pub fn bond_handler(
    force_field: &ForceField,
    topology: &Topology,
) -> Result<PotentialHandler, Error> {
    let types = atom_types(topology);
    let mut handler = PotentialHandler::bonds();

    for (i, j) in topology.bonds() {
        let (pattern, params) = force_field
            .bond(types[i], types[j])
            .ok_or_else(|| Error::missing_parameters("Bonds", format!("{}-{}", types[i], types[j])))?;
        let pot_key = PotentialKey::new(&pattern, InteractionFamily::Bonds);
        handler.store_match(TopologyKey::new([i, j]), pot_key.clone());
        handler.store_potential(
            pot_key,
            [
                ("k", Quantity::kj_per_mol_per_nm2(params.k)),
                ("length", Quantity::nanometers(params.length)),
            ]
            .into_iter()
            .collect(),
        );
    }

    Ok(handler)
}

/// Populates the constraint handler from the union of the bond family and
/// the constraint family, in that order.
///
/// Constraint patterns are matched against bonded pairs and against the
/// outer 1-3 pairs of every angle (rigid-water H-H constraints are 1-3
/// distances, not bonds).
pub fn constraint_handler(
    force_field: &ForceField,
    topology: &Topology,
) -> Result<PotentialHandler, Error> {
    let types = atom_types(topology);
    let mut handler = PotentialHandler::constraints();

    let mut pairs: Vec<(usize, usize, bool)> = topology
        .bonds()
        .into_iter()
        .map(|(i, j)| (i, j, true))
        .collect();
    pairs.extend(topology.angles().into_iter().map(|(i, _, k)| (i, k, false)));

    for (i, j, bonded) in pairs {
        let Some((pattern, params)) = force_field.constraint(types[i], types[j]) else {
            continue;
        };

        // Bond parameters win over a constraint-table distance.
        let bond_length = if bonded {
            force_field.bond(types[i], types[j]).map(|(_, bp)| bp.length)
        } else {
            None
        };
        let distance = bond_length.or(params.distance).ok_or_else(|| {
            Error::missing_parameters("Constraints", pattern.clone())
        })?;

        let pot_key = PotentialKey::new(&pattern, InteractionFamily::Constraints);
        handler.store_match(TopologyKey::new([i, j]), pot_key.clone());
        handler.store_potential(
            pot_key,
            [("distance", Quantity::nanometers(distance))]
                .into_iter()
                .collect(),
        );
    }

    Ok(handler)
}

/// Populates the angle handler from the angle table.
pub fn angle_handler(
    force_field: &ForceField,
    topology: &Topology,
) -> Result<PotentialHandler, Error> {
    let types = atom_types(topology);
    let mut handler = PotentialHandler::angles();

    for (i, j, k) in topology.angles() {
        let (pattern, params) = force_field
            .angle(types[i], types[j], types[k])
            .ok_or_else(|| {
                Error::missing_parameters(
                    "Angles",
                    format!("{}-{}-{}", types[i], types[j], types[k]),
                )
            })?;
        let pot_key = PotentialKey::new(&pattern, InteractionFamily::Angles);
        handler.store_match(TopologyKey::new([i, j, k]), pot_key.clone());
        handler.store_potential(
            pot_key,
            [
                ("k", Quantity::kj_per_mol_per_rad2(params.k)),
                ("angle", Quantity::degrees(params.angle)),
            ]
            .into_iter()
            .collect(),
        );
    }

    Ok(handler)
}

/// Populates the proper torsion handler. Each torsion term of a matched
/// pattern receives its own potential key (table index as key multiplicity)
/// and its own slot; degenerate slots on one atom tuple are disambiguated by
/// the handler's multiplicity tie-break.
pub fn proper_torsion_handler(
    force_field: &ForceField,
    topology: &Topology,
) -> Result<PotentialHandler, Error> {
    let types = atom_types(topology);
    let mut handler = PotentialHandler::proper_torsions();

    for (i, j, k, l) in topology.propers() {
        let (pattern, terms) = force_field
            .proper(types[i], types[j], types[k], types[l])
            .ok_or_else(|| {
                Error::missing_parameters(
                    "ProperTorsions",
                    format!("{}-{}-{}-{}", types[i], types[j], types[k], types[l]),
                )
            })?;
        store_torsion_terms(
            &mut handler,
            TopologyKey::new([i, j, k, l]),
            &pattern,
            terms,
            InteractionFamily::ProperTorsions,
        );
    }

    Ok(handler)
}

/// Populates the improper torsion handler from explicitly declared impropers.
pub fn improper_torsion_handler(
    force_field: &ForceField,
    topology: &Topology,
) -> Result<PotentialHandler, Error> {
    let types = atom_types(topology);
    let mut handler = PotentialHandler::improper_torsions();

    for (c, p1, p2, p3) in topology.impropers() {
        let (pattern, terms) = force_field
            .improper(types[c], types[p1], types[p2], types[p3])
            .ok_or_else(|| {
                Error::missing_parameters(
                    "ImproperTorsions",
                    format!("{}-{}-{}-{}", types[c], types[p1], types[p2], types[p3]),
                )
            })?;
        store_torsion_terms(
            &mut handler,
            TopologyKey::new([c, p1, p2, p3]),
            &pattern,
            terms,
            InteractionFamily::ImproperTorsions,
        );
    }

    Ok(handler)
}

fn store_torsion_terms(
    handler: &mut PotentialHandler,
    topology_key: TopologyKey,
    pattern: &str,
    terms: &[forcefield::TorsionParams],
    family: InteractionFamily,
) {
    for (n, term) in terms.iter().enumerate() {
        let pot_key = PotentialKey::new(pattern, family).with_mult(n as u32);
        handler.store_match(topology_key.clone(), pot_key.clone());
        handler.store_potential(
            pot_key,
            [
                ("k", Quantity::kj_per_mol(term.k)),
                ("periodicity", Quantity::dimensionless(f64::from(term.periodicity))),
                ("phase", Quantity::degrees(term.phase)),
            ]
            .into_iter()
            .collect(),
        );
    }
}

/// Populates the vdW handler: one slot per atom, parameters shared by type.
pub fn vdw_handler(
    force_field: &ForceField,
    topology: &Topology,
) -> Result<PotentialHandler, Error> {
    let mut handler = PotentialHandler::vdw();
    if let (Some(section), Some(settings)) = (&force_field.vdw, handler.nonbonded_mut()) {
        *settings = section.settings();
    }

    for (idx, atom) in topology.atoms() {
        let params = force_field
            .vdw_type(&atom.atom_type)
            .ok_or_else(|| Error::missing_parameters("vdW", atom.atom_type.clone()))?;
        let pot_key = PotentialKey::new(&atom.atom_type, InteractionFamily::Vdw);
        handler.store_match(TopologyKey::new([idx]), pot_key.clone());
        handler.store_potential(
            pot_key,
            [
                ("sigma", Quantity::nanometers(params.sigma)),
                ("epsilon", Quantity::kj_per_mol(params.epsilon)),
            ]
            .into_iter()
            .collect(),
        );
    }

    Ok(handler)
}

/// Populates the electrostatics handler by composing, deterministically and
/// in this order: library charges as the per-type base, then bond charge
/// increments walked in topology bond order.
///
/// The resulting potential-key id encodes the applied increments, so atoms
/// of one type in different bonding environments do not alias each other's
/// charges, while identical environments still share one potential.
pub fn electrostatics_handler(
    force_field: &ForceField,
    topology: &Topology,
) -> Result<PotentialHandler, Error> {
    let types = atom_types(topology);
    let mut handler = PotentialHandler::electrostatics();
    if let (Some(section), Some(settings)) =
        (&force_field.electrostatics, handler.nonbonded_mut())
    {
        *settings = section.settings();
    }

    let n_atoms = topology.n_atoms();
    let mut charges: Vec<f64> = (0..n_atoms)
        .map(|i| force_field.library_charges.get(types[i]).copied().unwrap_or(0.0))
        .collect();
    let mut applied: Vec<Vec<String>> = vec![Vec::new(); n_atoms];

    for (i, j) in topology.bonds() {
        let Some((pattern, params)) = force_field.charge_increment(types[i], types[j]) else {
            continue;
        };
        // Orient the increment along the pattern: + on the atom matching the
        // first type label, - on the other endpoint.
        let first_label = pattern.split('-').next().unwrap_or_default();
        let (plus, minus) = if types[i] == first_label { (i, j) } else { (j, i) };
        charges[plus] += params.increment;
        charges[minus] -= params.increment;
        applied[plus].push(format!("+{pattern}"));
        applied[minus].push(format!("-{pattern}"));
    }

    for (idx, atom) in topology.atoms() {
        let id = if applied[idx].is_empty() {
            atom.atom_type.clone()
        } else {
            let mut tags = applied[idx].clone();
            tags.sort_unstable();
            format!("{}[{}]", atom.atom_type, tags.join(","))
        };
        let pot_key = PotentialKey::new(id, InteractionFamily::Electrostatics);
        handler.store_match(TopologyKey::new([idx]), pot_key.clone());
        handler.store_potential(
            pot_key,
            [("charge", Quantity::elementary_charge(charges[idx]))]
                .into_iter()
                .collect(),
        );
    }

    Ok(handler)
}

/// Populates the virtual-site handler: one site per atom whose type declares
/// one. Virtual-site charges live here, not in the electrostatics charges
/// view.
pub fn virtual_site_handler(force_field: &ForceField, topology: &Topology) -> PotentialHandler {
    let mut handler = PotentialHandler::virtual_sites();

    for (idx, atom) in topology.atoms() {
        let Some(params) = force_field.virtual_sites.get(&atom.atom_type) else {
            continue;
        };
        let top_key = TopologyKey::virtual_site([idx], &params.name);
        let pot_key = PotentialKey::new(
            format!("{}-{}", atom.atom_type, params.name),
            InteractionFamily::VirtualSites,
        )
        .for_virtual_site();
        handler.store_match(top_key, pot_key.clone());
        handler.store_potential(
            pot_key,
            [
                ("charge", Quantity::elementary_charge(params.charge)),
                ("distance", Quantity::nanometers(params.distance)),
            ]
            .into_iter()
            .collect(),
        );
    }

    handler
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::topology::{Atom, Molecule};

    fn water_topology() -> Topology {
        let mut mol = Molecule::new("water");
        mol.add_atom(Atom::new("O", "OW", "O", 15.999));
        mol.add_atom(Atom::new("H1", "HW", "H", 1.008));
        mol.add_atom(Atom::new("H2", "HW", "H", 1.008));
        mol.add_bond(0, 1);
        mol.add_bond(0, 2);
        Topology::from_molecule(mol).unwrap()
    }

    fn water_force_field() -> ForceField {
        ForceField::from_toml_str(
            r#"
            [bonds."OW-HW"]
            k = 462750.4
            length = 0.09572

            [angles."HW-OW-HW"]
            k = 836.8
            angle = 104.52

            [vdw]
            cutoff = 0.9
            [vdw.types.OW]
            sigma = 0.31507
            epsilon = 0.635968
            [vdw.types.HW]
            sigma = 0.1
            epsilon = 0.0

            [electrostatics]
            method = "particle-mesh"

            [library_charges]
            OW = -0.834
            HW = 0.417

            [constraints."OW-HW"]
            [constraints."HW-HW"]
            distance = 0.15139
        "#,
        )
        .unwrap()
    }

    #[test]
    fn bond_slots_share_one_potential() {
        let handler = bond_handler(&water_force_field(), &water_topology()).unwrap();
        assert_eq!(handler.slot_map().len(), 2);
        assert_eq!(handler.potentials().len(), 1);
        let pot = handler.parameters_for(&[0, 1]).unwrap();
        assert_eq!(pot.parameter("length"), Some(Quantity::nanometers(0.09572)));
    }

    #[test]
    fn missing_bond_parameters_error_names_pattern() {
        let mut ff = water_force_field();
        ff.bonds.clear();
        ff.bonds.insert(
            "XX-YY".to_string(),
            forcefield::BondParams { k: 1.0, length: 0.1 },
        );
        let err = bond_handler(&ff, &water_topology()).unwrap_err();
        match err {
            Error::MissingParameters { family, pattern } => {
                assert_eq!(family, "Bonds");
                assert_eq!(pattern, "OW-HW");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn constraints_take_bond_length_over_table_distance() {
        let handler = constraint_handler(&water_force_field(), &water_topology()).unwrap();
        // Two O-H bonds plus one 1-3 H-H pair.
        assert_eq!(handler.slot_map().len(), 3);

        // O-H is bonded: bond equilibrium length wins (the table row has no
        // distance at all).
        let oh = handler.parameters_for(&[0, 1]).unwrap();
        assert_eq!(oh.parameter("distance"), Some(Quantity::nanometers(0.09572)));

        // H-H is a 1-3 pair: no bond to consult, table distance applies.
        let hh = handler.parameters_for(&[1, 2]).unwrap();
        assert_eq!(hh.parameter("distance"), Some(Quantity::nanometers(0.15139)));
    }

    #[test]
    fn electrostatics_composes_library_charges() {
        let handler = electrostatics_handler(&water_force_field(), &water_topology()).unwrap();
        let charges = handler.charges().unwrap();
        assert_eq!(charges.len(), 3);

        let total: f64 = charges.values().map(|q| q.value).sum();
        approx::assert_abs_diff_eq!(total, 0.0, epsilon = 1e-6);
        // Two hydrogens share one potential.
        assert_eq!(handler.potentials().len(), 2);
    }

    #[test]
    fn charge_increments_shift_along_bonds() {
        let mut mol = Molecule::new("methane-ish");
        mol.add_atom(Atom::new("C", "CT", "C", 12.011));
        mol.add_atom(Atom::new("H1", "HC", "H", 1.008));
        mol.add_atom(Atom::new("H2", "HC", "H", 1.008));
        mol.add_bond(0, 1);
        mol.add_bond(0, 2);
        let top = Topology::from_molecule(mol).unwrap();

        let ff = ForceField::from_toml_str(
            r#"
            [electrostatics]

            [charge_increments."CT-HC"]
            increment = -0.08
        "#,
        )
        .unwrap();

        let handler = electrostatics_handler(&ff, &top).unwrap();
        let charges = handler.charges().unwrap();
        let carbon = charges[&TopologyKey::new([0])];
        let hydrogen = charges[&TopologyKey::new([1])];
        approx::assert_abs_diff_eq!(carbon.value, -0.16, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(hydrogen.value, 0.08, epsilon = 1e-12);

        let total: f64 = charges.values().map(|q| q.value).sum();
        approx::assert_abs_diff_eq!(total, 0.0, epsilon = 1e-12);
        // Both hydrogens see the same environment and share a potential.
        assert_eq!(handler.potentials().len(), 2);
    }

    #[test]
    fn torsion_terms_fan_out_across_multiplicities() {
        let mut mol = Molecule::new("butane-backbone");
        for name in ["C1", "C2", "C3", "C4"] {
            mol.add_atom(Atom::new(name, "CT", "C", 12.011));
        }
        mol.add_bond(0, 1);
        mol.add_bond(1, 2);
        mol.add_bond(2, 3);
        let top = Topology::from_molecule(mol).unwrap();

        let ff = ForceField::from_toml_str(
            r#"
            [[propers."CT-CT-CT-CT"]]
            k = 0.6508
            periodicity = 3
            phase = 0.0

            [[propers."CT-CT-CT-CT"]]
            k = 1.0878
            periodicity = 2
            phase = 180.0
        "#,
        )
        .unwrap();

        let handler = proper_torsion_handler(&ff, &top).unwrap();
        // One dihedral, two terms: multiplicities 0 and 1, neither
        // overwriting the other.
        assert_eq!(handler.slot_map().len(), 2);
        assert_eq!(handler.potentials().len(), 2);
        let mults: Vec<u32> = handler.slot_map().keys().map(|k| k.mult()).collect();
        assert_eq!(mults, vec![0, 1]);
    }

    #[test]
    fn virtual_sites_tracked_outside_charges_view() {
        let mut ff = water_force_field();
        ff.virtual_sites.insert(
            "OW".to_string(),
            forcefield::VirtualSiteParams {
                name: "m-site".to_string(),
                charge: -1.04,
                distance: 0.015,
            },
        );
        let top = water_topology();

        let vsites = virtual_site_handler(&ff, &top);
        assert_eq!(vsites.slot_map().len(), 1);
        let key = vsites.slot_map().keys().next().unwrap();
        assert!(key.is_virtual_site());
        assert_eq!(key.virtual_site_name(), Some("m-site"));

        let electrostatics = electrostatics_handler(&ff, &top).unwrap();
        assert_eq!(electrostatics.charges().unwrap().len(), 3);
    }

    #[test]
    fn build_handlers_covers_registered_families() {
        let handlers = build_handlers(&water_force_field(), &water_topology()).unwrap();
        let names: Vec<&str> = handlers.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["Bonds", "Constraints", "Angles", "vdW", "Electrostatics"]
        );
    }

    #[test]
    fn charge_tables_without_electrostatics_section_build_no_handler() {
        let mut ff = water_force_field();
        ff.electrostatics = None;
        let handlers = build_handlers(&ff, &water_topology()).unwrap();
        assert!(!handlers.contains_key("Electrostatics"));
    }
}
