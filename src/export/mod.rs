//! Export dispatch: engine-specific artifacts from an interchange.
//!
//! Each entry point takes a destination path and a writer-backend selector.
//! Validation happens before any output is written: positions are checked
//! where required, and the nonbonded-method summary is checked against the
//! combinations the target backend supports. File writers emit into a
//! temporary file beside the destination and persist it only on success, so
//! a failure never leaves a corrupt partial artifact.

pub mod engine;
pub mod gromacs;
pub mod lammps;
pub mod pdb;

use std::io::Write;
use std::path::Path;

use log::warn;

use crate::error::Error;
use crate::handler::NonbondedMethod;
use crate::interchange::{Interchange, NonbondedSummary};

pub use engine::EngineSystem;

/// Writer-backend selector for file exports.
///
/// `Internal` is this crate's own writer; `Engine` delegates to a
/// simulation-engine-native writer where one exists for the format. An
/// unimplemented combination fails with
/// [`Error::UnsupportedExport`]; it never falls back to a different backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterBackend {
    #[default]
    Internal,
    Engine,
}

impl WriterBackend {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "internal" => Some(WriterBackend::Internal),
            "engine" => Some(WriterBackend::Engine),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            WriterBackend::Internal => "internal",
            WriterBackend::Engine => "engine",
        }
    }
}

/// Error returned when parsing an unknown writer-backend name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown writer backend '{0}', expected 'internal' or 'engine'")]
pub struct ParseWriterBackendError(String);

impl std::str::FromStr for WriterBackend {
    type Err = ParseWriterBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ParseWriterBackendError(s.to_string()))
    }
}

fn require_positions<'a>(
    interchange: &'a Interchange,
    format: &'static str,
) -> Result<&'a [[f64; 3]], Error> {
    let positions = interchange
        .positions()
        .ok_or(Error::MissingPositions(format))?;
    if positions
        .iter()
        .all(|row| row.iter().all(|v| *v == 0.0))
    {
        warn!("all positions are exactly zero; the {format} output is almost certainly non-physical");
    }
    Ok(positions)
}

fn unsupported(format: &'static str, backend: WriterBackend) -> Error {
    Error::UnsupportedExport {
        format,
        backend: backend.name().to_string(),
    }
}

/// Checks a nonbonded summary against the methods the internal GROMACS
/// writer can express.
fn check_gromacs_methods(summary: &NonbondedSummary) -> Result<(), Error> {
    const BACKEND: &str = "internal GROMACS";
    match summary.vdw_method {
        NonbondedMethod::Cutoff | NonbondedMethod::NoCutoff => {}
        method => {
            return Err(Error::UnsupportedMethod {
                family: "vdW".to_string(),
                method: method.to_string(),
                backend: BACKEND,
            });
        }
    }
    match (summary.electrostatics_method, summary.periodic) {
        (NonbondedMethod::ParticleMesh, true) => Ok(()),
        (NonbondedMethod::ParticleMesh, false) => Err(Error::UnsupportedMethod {
            family: "Electrostatics".to_string(),
            method: "particle-mesh (without a periodic box)".to_string(),
            backend: BACKEND,
        }),
        (NonbondedMethod::ReactionField | NonbondedMethod::Cutoff, _) => Ok(()),
        (NonbondedMethod::NoCutoff, false) => Ok(()),
        (NonbondedMethod::NoCutoff, true) => Err(Error::UnsupportedMethod {
            family: "Electrostatics".to_string(),
            method: "no-cutoff (with a periodic box)".to_string(),
            backend: BACKEND,
        }),
    }
}

/// Checks a nonbonded summary against the methods the internal LAMMPS
/// writer can express. A periodic box is mandatory for a data file.
fn check_lammps_methods(summary: &NonbondedSummary) -> Result<(), Error> {
    const BACKEND: &str = "internal LAMMPS";
    if !summary.periodic {
        return Err(Error::UnsupportedMethod {
            family: "vdW".to_string(),
            method: format!("{} (without a periodic box)", summary.vdw_method),
            backend: BACKEND,
        });
    }
    if summary.vdw_method != NonbondedMethod::Cutoff {
        return Err(Error::UnsupportedMethod {
            family: "vdW".to_string(),
            method: summary.vdw_method.to_string(),
            backend: BACKEND,
        });
    }
    match summary.electrostatics_method {
        NonbondedMethod::ParticleMesh | NonbondedMethod::Cutoff => Ok(()),
        method => Err(Error::UnsupportedMethod {
            family: "Electrostatics".to_string(),
            method: method.to_string(),
            backend: BACKEND,
        }),
    }
}

/// Per-atom partial charges by global index, read from the Electrostatics
/// handler. Atoms without a slot, and systems without an Electrostatics
/// handler, get zero.
pub(crate) fn per_atom_charges(interchange: &Interchange) -> Result<Vec<f64>, Error> {
    let n = interchange.topology().map(|t| t.n_atoms()).unwrap_or(0);
    let mut charges = vec![0.0; n];
    if let Ok(handler) = interchange.handler("Electrostatics") {
        for (key, charge) in handler.charges()? {
            if let [i] = key.atom_indices() {
                let slot = charges.get_mut(*i).ok_or_else(|| {
                    Error::InternalInconsistency(format!(
                        "Electrostatics slot {key} is outside the {n}-atom topology"
                    ))
                })?;
                *slot = charge.value;
            }
        }
    }
    Ok(charges)
}

/// Warns when a populated virtual-site handler cannot be represented by the
/// target output and its sites are therefore omitted.
pub(crate) fn warn_dropped_virtual_sites(interchange: &Interchange, target: &str) {
    if let Ok(handler) = interchange.handler("VirtualSites") {
        if !handler.slot_map().is_empty() {
            warn!(
                "{} virtual sites are not representable in {target} output and are omitted",
                handler.slot_map().len()
            );
        }
    }
}

pub(crate) fn require_topology(
    interchange: &Interchange,
) -> Result<&crate::model::topology::Topology, Error> {
    interchange.topology().ok_or_else(|| {
        Error::InternalInconsistency("export requires a topology to be attached".to_string())
    })
}

/// Resolves a slot's potential key against its handler's potential store.
/// A dangling key is an internal inconsistency, not a user error.
pub(crate) fn resolve_potential<'a>(
    handler: &'a crate::handler::PotentialHandler,
    key: &crate::model::keys::PotentialKey,
) -> Result<&'a crate::model::potential::Potential, Error> {
    handler.potentials().get(key).ok_or_else(|| {
        Error::InternalInconsistency(format!(
            "{} slot points at unknown potential key {key}",
            handler.name()
        ))
    })
}

/// Writes through a closure into a temp file beside `path`, renaming into
/// place only on success.
fn write_atomically<F>(path: &Path, write_fn: F) -> Result<(), Error>
where
    F: FnOnce(&mut tempfile::NamedTempFile) -> Result<(), Error>,
{
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    write_fn(&mut tmp)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl Interchange {
    /// Exports particle coordinates to a GROMACS `.gro` file.
    pub fn to_gro(&self, path: impl AsRef<Path>, backend: WriterBackend) -> Result<(), Error> {
        let positions = require_positions(self, ".gro")?;
        match backend {
            WriterBackend::Internal => write_atomically(path.as_ref(), |w| {
                gromacs::write_gro(w, self, positions)
            }),
            other => Err(unsupported(".gro", other)),
        }
    }

    /// Exports the parameterized system to a GROMACS `.top` file.
    pub fn to_top(&self, path: impl AsRef<Path>, backend: WriterBackend) -> Result<(), Error> {
        check_gromacs_methods(&self.nonbonded_methods()?)?;
        match backend {
            WriterBackend::Internal => {
                write_atomically(path.as_ref(), |w| gromacs::write_top(w, self))
            }
            other => Err(unsupported(".top", other)),
        }
    }

    /// Exports the parameterized system to a LAMMPS data file.
    pub fn to_lammps(&self, path: impl AsRef<Path>, backend: WriterBackend) -> Result<(), Error> {
        let positions = require_positions(self, "LAMMPS data")?;
        check_lammps_methods(&self.nonbonded_methods()?)?;
        match backend {
            WriterBackend::Internal => write_atomically(path.as_ref(), |w| {
                lammps::write_data(w, self, positions)
            }),
            other => Err(unsupported("LAMMPS data", other)),
        }
    }

    /// Exports particle coordinates to a `.pdb` file.
    pub fn to_pdb(&self, path: impl AsRef<Path>, backend: WriterBackend) -> Result<(), Error> {
        let positions = require_positions(self, ".pdb")?;
        match backend {
            WriterBackend::Internal => {
                write_atomically(path.as_ref(), |w| pdb::write_pdb(w, self, positions))
            }
            other => Err(unsupported(".pdb", other)),
        }
    }

    /// Exports to an in-memory engine-native system: per-atom parameters
    /// plus flat, index-based force lists.
    pub fn to_engine_system(&self) -> Result<EngineSystem, Error> {
        engine::flatten(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{InteractionFamily, PotentialHandler};
    use crate::import::ForceField;
    use crate::model::keys::{PotentialKey, TopologyKey};
    use crate::model::quantity::Quantity;
    use crate::model::topology::{Atom, Molecule, Topology};

    pub(crate) fn water_interchange() -> Interchange {
        let mut mol = Molecule::new("HOH");
        mol.add_atom(Atom::new("O", "OW", "O", 15.999));
        mol.add_atom(Atom::new("H1", "HW", "H", 1.008));
        mol.add_atom(Atom::new("H2", "HW", "H", 1.008));
        mol.add_bond(0, 1);
        mol.add_bond(0, 2);
        let top = Topology::from_molecule(mol).unwrap();

        let ff = ForceField::from_toml_str(
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
        "#,
        )
        .unwrap();

        let mut interchange = Interchange::from_force_field(&ff, &top).unwrap();
        interchange
            .set_positions(Some(vec![
                [0.0, 0.0, 0.0],
                [0.09572, 0.0, 0.0],
                [-0.024, 0.0927, 0.0],
            ]))
            .unwrap();
        interchange.set_box(Some([2.5, 2.5, 2.5]));
        interchange
    }

    #[test]
    fn gro_export_without_positions_is_refused() {
        let mut interchange = water_interchange();
        interchange.set_positions(None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("water.gro");
        let err = interchange
            .to_gro(&path, WriterBackend::Internal)
            .unwrap_err();
        assert!(matches!(err, Error::MissingPositions(".gro")));
        assert!(!path.exists());
    }

    #[test]
    fn pdb_export_without_positions_is_refused() {
        let mut interchange = water_interchange();
        interchange.set_positions(None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = interchange
            .to_pdb(dir.path().join("water.pdb"), WriterBackend::Internal)
            .unwrap_err();
        assert!(matches!(err, Error::MissingPositions(".pdb")));
    }

    #[test]
    fn all_zero_positions_export_proceeds() {
        let mut interchange = water_interchange();
        interchange
            .set_positions(Some(vec![[0.0; 3]; 3]))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zeros.gro");
        interchange.to_gro(&path, WriterBackend::Internal).unwrap();

        assert!(path.exists());
        // The destination and nothing else: no temp files are left around.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_export_leaves_no_temp_file_behind() {
        let mut interchange = water_interchange();
        // A slot whose key has no potential stored behind it fails the
        // writer after the temp file has been created.
        let mut bonds = PotentialHandler::bonds();
        bonds.store_match(
            TopologyKey::new([0, 1]),
            PotentialKey::new("dangling", InteractionFamily::Bonds),
        );
        interchange.add_handler(bonds);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("water.top");
        let err = interchange
            .to_top(&path, WriterBackend::Internal)
            .unwrap_err();
        assert!(matches!(err, Error::InternalInconsistency(_)));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn out_of_topology_charge_slot_is_an_internal_inconsistency() {
        let mut interchange = water_interchange();
        let mut handler = PotentialHandler::electrostatics();
        let pot_key = PotentialKey::new("ghost", InteractionFamily::Electrostatics);
        handler.store_match(TopologyKey::new([7]), pot_key.clone());
        handler.store_potential(
            pot_key,
            [("charge", Quantity::elementary_charge(1.0))]
                .into_iter()
                .collect(),
        );
        interchange.add_handler(handler);

        let err = per_atom_charges(&interchange).unwrap_err();
        assert!(matches!(err, Error::InternalInconsistency(_)));
    }

    #[test]
    fn unknown_backend_never_falls_back() {
        let interchange = water_interchange();
        let dir = tempfile::tempdir().unwrap();
        let err = interchange
            .to_gro(dir.path().join("water.gro"), WriterBackend::Engine)
            .unwrap_err();
        match err {
            Error::UnsupportedExport { format, backend } => {
                assert_eq!(format, ".gro");
                assert_eq!(backend, "engine");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pme_without_box_fails_method_gate() {
        let mut interchange = water_interchange();
        interchange.set_box(None::<crate::interchange::BoxInput>);

        let dir = tempfile::tempdir().unwrap();
        let err = interchange
            .to_top(dir.path().join("water.top"), WriterBackend::Internal)
            .unwrap_err();
        match err {
            Error::UnsupportedMethod { family, method, .. } => {
                assert_eq!(family, "Electrostatics");
                assert!(method.contains("particle-mesh"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lammps_gate_requires_periodic_box() {
        let mut interchange = water_interchange();
        interchange.set_box(None::<crate::interchange::BoxInput>);

        let dir = tempfile::tempdir().unwrap();
        let err = interchange
            .to_lammps(dir.path().join("water.data"), WriterBackend::Internal)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { .. }));
    }

    #[test]
    fn file_exports_produce_artifacts() {
        let interchange = water_interchange();
        let dir = tempfile::tempdir().unwrap();

        for name in ["water.gro", "water.top", "water.data", "water.pdb"] {
            let path = dir.path().join(name);
            let result = match name {
                "water.gro" => interchange.to_gro(&path, WriterBackend::Internal),
                "water.top" => interchange.to_top(&path, WriterBackend::Internal),
                "water.data" => interchange.to_lammps(&path, WriterBackend::Internal),
                _ => interchange.to_pdb(&path, WriterBackend::Internal),
            };
            result.unwrap_or_else(|e| panic!("{name}: {e}"));
            let written = std::fs::read_to_string(&path).unwrap();
            assert!(!written.is_empty(), "{name} is empty");
        }
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!(
            WriterBackend::from_name("internal"),
            Some(WriterBackend::Internal)
        );
        assert_eq!("engine".parse(), Ok(WriterBackend::Engine));
        assert_eq!(WriterBackend::from_name("parmed"), None);
        assert!("parmed".parse::<WriterBackend>().is_err());
    }
}
