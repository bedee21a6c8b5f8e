//! In-memory engine-native flattening.
//!
//! Collapses the keyed, deduplicated representation into the flat arrays a
//! simulation engine consumes: one parameter record per atom and one entry
//! per bonded interaction, all addressed by global atom index. Parameter
//! sharing does not survive the flattening; this is the last step before
//! handing the system to an engine.

use crate::error::Error;
use crate::handler::{NonbondedMethod, NonbondedSettings, PotentialHandler};
use crate::interchange::Interchange;
use crate::model::keys::TopologyKey;

use super::{per_atom_charges, require_topology, resolve_potential};

/// Per-atom parameters in the flattened system.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineAtom {
    pub mass: f64,
    pub charge: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicBond {
    pub i: usize,
    pub j: usize,
    pub k: f64,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicAngle {
    pub i: usize,
    pub j: usize,
    pub k: usize,
    pub force_k: f64,
    pub angle: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicTorsion {
    pub i: usize,
    pub j: usize,
    pub k: usize,
    pub l: usize,
    pub barrier_k: f64,
    pub periodicity: u32,
    pub phase: f64,
    pub improper: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceConstraint {
    pub i: usize,
    pub j: usize,
    pub distance: f64,
}

/// A fully flattened system ready for an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSystem {
    pub atoms: Vec<EngineAtom>,
    pub bonds: Vec<HarmonicBond>,
    pub angles: Vec<HarmonicAngle>,
    pub torsions: Vec<PeriodicTorsion>,
    pub constraints: Vec<DistanceConstraint>,
    pub box_vectors: Option<[[f64; 3]; 3]>,
    pub positions: Option<Vec<[f64; 3]>>,
    pub vdw: NonbondedSettings,
    pub electrostatics: NonbondedSettings,
}

fn parameter(
    handler: &PotentialHandler,
    slot: &TopologyKey,
    name: &str,
) -> Result<f64, Error> {
    let pot_key = handler.slot_map().get(slot).ok_or_else(|| {
        Error::InternalInconsistency(format!("{} has no slot for {slot}", handler.name()))
    })?;
    let potential = resolve_potential(handler, pot_key)?;
    potential.parameter(name).map(|q| q.value).ok_or_else(|| {
        Error::InternalInconsistency(format!("potential {pot_key} is missing `{name}`"))
    })
}

fn pair(slot: &TopologyKey) -> Result<(usize, usize), Error> {
    match slot.atom_indices() {
        [i, j] => Ok((*i, *j)),
        other => Err(Error::InternalInconsistency(format!(
            "expected a pairwise slot, found {} indices",
            other.len()
        ))),
    }
}

fn triple(slot: &TopologyKey) -> Result<(usize, usize, usize), Error> {
    match slot.atom_indices() {
        [i, j, k] => Ok((*i, *j, *k)),
        other => Err(Error::InternalInconsistency(format!(
            "expected a three-atom slot, found {} indices",
            other.len()
        ))),
    }
}

fn quad(slot: &TopologyKey) -> Result<(usize, usize, usize, usize), Error> {
    match slot.atom_indices() {
        [i, j, k, l] => Ok((*i, *j, *k, *l)),
        other => Err(Error::InternalInconsistency(format!(
            "expected a four-atom slot, found {} indices",
            other.len()
        ))),
    }
}

pub(super) fn flatten(interchange: &Interchange) -> Result<EngineSystem, Error> {
    let topology = require_topology(interchange)?;
    let summary = interchange.nonbonded_methods()?;
    if summary.electrostatics_method == NonbondedMethod::ParticleMesh && !summary.periodic {
        return Err(Error::UnsupportedMethod {
            family: "Electrostatics".to_string(),
            method: "particle-mesh (without a periodic box)".to_string(),
            backend: "engine system",
        });
    }

    super::warn_dropped_virtual_sites(interchange, "engine system");

    let vdw = interchange.handler("vdW")?;
    let electrostatics = interchange.handler("Electrostatics")?;
    let charges = per_atom_charges(interchange)?;

    let mut atoms = Vec::with_capacity(topology.n_atoms());
    for (index, atom) in topology.atoms() {
        let slot = TopologyKey::new([index]);
        atoms.push(EngineAtom {
            mass: atom.mass,
            charge: charges[index],
            sigma: parameter(vdw, &slot, "sigma")?,
            epsilon: parameter(vdw, &slot, "epsilon")?,
        });
    }

    let mut bonds = Vec::new();
    if let Ok(handler) = interchange.handler("Bonds") {
        for slot in handler.slot_map().keys() {
            let (i, j) = pair(slot)?;
            bonds.push(HarmonicBond {
                i,
                j,
                k: parameter(handler, slot, "k")?,
                length: parameter(handler, slot, "length")?,
            });
        }
    }

    let mut angles = Vec::new();
    if let Ok(handler) = interchange.handler("Angles") {
        for slot in handler.slot_map().keys() {
            let (i, j, k) = triple(slot)?;
            angles.push(HarmonicAngle {
                i,
                j,
                k,
                force_k: parameter(handler, slot, "k")?,
                angle: parameter(handler, slot, "angle")?,
            });
        }
    }

    let mut torsions = Vec::new();
    for (name, improper) in [("ProperTorsions", false), ("ImproperTorsions", true)] {
        if let Ok(handler) = interchange.handler(name) {
            for slot in handler.slot_map().keys() {
                let (i, j, k, l) = quad(slot)?;
                torsions.push(PeriodicTorsion {
                    i,
                    j,
                    k,
                    l,
                    barrier_k: parameter(handler, slot, "k")?,
                    periodicity: parameter(handler, slot, "periodicity")? as u32,
                    phase: parameter(handler, slot, "phase")?,
                    improper,
                });
            }
        }
    }

    let mut constraints = Vec::new();
    if let Ok(handler) = interchange.handler("Constraints") {
        for slot in handler.slot_map().keys() {
            let (i, j) = pair(slot)?;
            constraints.push(DistanceConstraint {
                i,
                j,
                distance: parameter(handler, slot, "distance")?,
            });
        }
    }

    let vdw_settings = vdw.nonbonded().cloned().ok_or_else(|| {
        Error::InternalInconsistency("vdW handler has no nonbonded settings".to_string())
    })?;
    let electrostatics_settings = electrostatics.nonbonded().cloned().ok_or_else(|| {
        Error::InternalInconsistency(
            "Electrostatics handler has no nonbonded settings".to_string(),
        )
    })?;

    Ok(EngineSystem {
        atoms,
        bonds,
        angles,
        torsions,
        constraints,
        box_vectors: interchange.box_vectors(),
        positions: interchange.positions().map(|p| p.to_vec()),
        vdw: vdw_settings,
        electrostatics: electrostatics_settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::water_interchange;

    #[test]
    fn water_flattens_to_per_atom_records() {
        let system = water_interchange().to_engine_system().unwrap();

        assert_eq!(system.atoms.len(), 3);
        assert_eq!(system.bonds.len(), 2);
        assert_eq!(system.angles.len(), 1);
        assert!(system.torsions.is_empty());
        assert!(system.constraints.is_empty());

        let oxygen = &system.atoms[0];
        assert_eq!(oxygen.charge, -0.834);
        assert_eq!(oxygen.sigma, 0.31507);
        assert_eq!(oxygen.mass, 15.999);

        // Both O-H bonds flatten from the one shared potential.
        assert_eq!(system.bonds[0].length, system.bonds[1].length);
        assert_eq!(system.bonds[0].i, 0);
        assert_eq!(system.bonds[1].j, 2);
        assert_eq!(system.angles[0].angle, 104.52);
    }

    #[test]
    fn settings_and_geometry_are_carried() {
        let system = water_interchange().to_engine_system().unwrap();

        assert_eq!(system.vdw.cutoff.value, 0.9);
        assert_eq!(
            system.electrostatics.method,
            NonbondedMethod::ParticleMesh
        );
        assert_eq!(system.box_vectors.unwrap()[1][1], 2.5);
        assert_eq!(system.positions.as_ref().map(|p| p.len()), Some(3));
    }

    #[test]
    fn populated_virtual_sites_are_omitted_not_fatal() {
        use crate::handler::InteractionFamily;
        use crate::model::keys::{PotentialKey, TopologyKey};
        use crate::model::quantity::Quantity;

        let mut interchange = water_interchange();
        let mut vsites = PotentialHandler::virtual_sites();
        let pot_key = PotentialKey::new("OW-lone-pair", InteractionFamily::VirtualSites)
            .for_virtual_site();
        vsites.store_match(TopologyKey::virtual_site([0], "lone-pair"), pot_key.clone());
        vsites.store_potential(
            pot_key,
            [
                ("charge", Quantity::elementary_charge(-0.2)),
                ("distance", Quantity::nanometers(0.015)),
            ]
            .into_iter()
            .collect(),
        );
        interchange.add_handler(vsites);

        let system = interchange.to_engine_system().unwrap();
        assert_eq!(system.atoms.len(), 3);
        assert_eq!(system.bonds.len(), 2);
    }

    #[test]
    fn malformed_angle_slot_is_an_internal_inconsistency() {
        use crate::handler::InteractionFamily;
        use crate::model::keys::PotentialKey;
        use crate::model::quantity::Quantity;

        let mut interchange = water_interchange();
        let mut angles = PotentialHandler::angles();
        let pot_key = PotentialKey::new("HW-OW-HW", InteractionFamily::Angles);
        // A two-index slot in a three-atom family.
        angles.store_match(crate::model::keys::TopologyKey::new([1, 0]), pot_key.clone());
        angles.store_potential(
            pot_key,
            [
                ("k", Quantity::kj_per_mol_per_rad2(836.8)),
                ("angle", Quantity::degrees(104.52)),
            ]
            .into_iter()
            .collect(),
        );
        interchange.add_handler(angles);

        let err = interchange.to_engine_system().unwrap_err();
        assert!(matches!(err, Error::InternalInconsistency(_)));
    }

    #[test]
    fn pme_without_box_is_refused() {
        let mut interchange = water_interchange();
        interchange.set_box(None::<crate::interchange::BoxInput>);
        let err = interchange.to_engine_system().unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { .. }));
    }
}
