//! An engine-agnostic intermediate representation for parameterized
//! molecular-mechanics systems. It pairs a chemical topology with the force
//! field parameters applied to it, keeps parameters deduplicated behind
//! stable keys, and exports the result to simulation-engine formats without
//! favoring any one engine's conventions.
//!
//! # Features
//!
//! - **Keyed parameter storage** — Every interaction resolves through two
//!   maps: topological slot to parameter key, parameter key to parameters.
//!   Systems with thousands of atoms typically carry a handful of potentials
//! - **Force-field application** — Declarative TOML force fields keyed by
//!   atom type, covering bonds, angles, torsions, constraints, vdW,
//!   library charges, charge increments, and virtual sites
//! - **System combination** — Merge two parameterized systems with explicit
//!   conflict policies instead of silent overwrites
//! - **Export** — GROMACS `.gro`/`.top`, LAMMPS data files, PDB, and an
//!   in-memory flattened form for direct engine hand-off
//!
//! # Quick Start
//!
//! Build a topology, load a force field, and apply one to the other with
//! [`Interchange::from_force_field`]:
//!
//! ```
//! use mm_interchange::{Atom, ForceField, Interchange, Molecule, Topology};
//!
//! // A single water molecule.
//! let mut water = Molecule::new("HOH");
//! water.add_atom(Atom::new("O", "OW", "O", 15.999));
//! water.add_atom(Atom::new("H1", "HW", "H", 1.008));
//! water.add_atom(Atom::new("H2", "HW", "H", 1.008));
//! water.add_bond(0, 1);
//! water.add_bond(0, 2);
//! let topology = Topology::from_molecule(water)?;
//!
//! let force_field = ForceField::from_toml_str(r#"
//!     [bonds."OW-HW"]
//!     k = 462750.4
//!     length = 0.09572
//!
//!     [angles."HW-OW-HW"]
//!     k = 836.8
//!     angle = 104.52
//!
//!     [vdw.types.OW]
//!     sigma = 0.31507
//!     epsilon = 0.635968
//!     [vdw.types.HW]
//!     sigma = 0.1
//!     epsilon = 0.0
//!
//!     [electrostatics]
//!
//!     [library_charges]
//!     OW = -0.834
//!     HW = 0.417
//! "#)?;
//!
//! let interchange = Interchange::from_force_field(&force_field, &topology)?;
//!
//! // Both O-H bonds resolve to the one stored bond potential.
//! let bonds = interchange.handler("Bonds")?;
//! assert_eq!(bonds.slot_map().len(), 2);
//! assert_eq!(bonds.potentials().len(), 1);
//!
//! // Per-atom charges assemble from the library charge table.
//! let charges = interchange.handler("Electrostatics")?.charges()?;
//! assert_eq!(charges.len(), 3);
//! # Ok::<(), mm_interchange::Error>(())
//! ```
//!
//! # Module Organization
//!
//! - [`import`] — Force-field loading and handler construction
//! - [`export`] — File writers and the in-memory engine flattening
//! - [`handler`] — The keyed per-family parameter store
//! - [`interchange`] — The aggregate pairing topology with handlers
//!
//! # Data Types
//!
//! ## Core Model
//!
//! - [`Topology`] — Molecules, atoms, bonds, and an optional periodic box
//! - [`TopologyKey`] — A topological slot: atom indices plus a multiplicity
//! - [`PotentialKey`] — A stable identifier for one set of parameters
//! - [`Potential`] — Named parameters with units, plus an optional
//!   functional-form expression
//! - [`PotentialHandler`] — One interaction family's slot map and
//!   potential store
//! - [`Interchange`] — The whole parameterized system
//!
//! ## Configuration and Export
//!
//! - [`ForceField`] — A declarative, atom-type-keyed parameter source
//! - [`CombinePolicy`] — Conflict handling when combining two systems
//! - [`NonbondedMethod`] / [`NonbondedSettings`] — Truncation and scaling
//!   for the nonbonded families
//! - [`WriterBackend`] — Selector between internal and engine-native writers
//! - [`EngineSystem`] — The flattened, index-addressed output form

mod error;
mod model;

pub mod export;
pub mod handler;
pub mod import;
pub mod interchange;

pub use error::Error;

pub use model::keys::{PotentialKey, TopologyKey};
pub use model::potential::Potential;
pub use model::quantity::{Quantity, Unit};
pub use model::topology::{Atom, Molecule, Topology};

pub use handler::{
    InteractionFamily, MixingRule, NonbondedMethod, NonbondedSettings, PotentialHandler,
};

pub use interchange::{BoxInput, CombinePolicy, Component, Interchange, NonbondedSummary};

pub use import::ForceField;

pub use export::{EngineSystem, ParseWriterBackendError, WriterBackend};
