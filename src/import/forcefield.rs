//! Generic atom-type-keyed force field definitions.
//!
//! A [`ForceField`] is the source side of the import boundary: a set of
//! registered interaction families and, per family, a parameter table keyed
//! by atom-type patterns (`"OW-HW"`, `"HW-OW-HW"`, ...). Definitions load
//! from TOML. Unit conventions are fixed by field: lengths in nm, bond force
//! constants in kJ/(mol nm^2), angle force constants in kJ/(mol rad^2),
//! torsion barriers in kJ/mol, phases and equilibrium angles in degrees,
//! charges in elementary charge units.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::Error;
use crate::handler::{MixingRule, NonbondedMethod, NonbondedSettings};
use crate::model::quantity::Quantity;

#[derive(Debug, Clone, Deserialize)]
pub struct BondParams {
    /// Force constant, kJ/(mol nm^2).
    pub k: f64,
    /// Equilibrium length, nm.
    pub length: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AngleParams {
    /// Force constant, kJ/(mol rad^2).
    pub k: f64,
    /// Equilibrium angle, degrees.
    pub angle: f64,
}

/// One periodic torsion term. A pattern may carry several terms; their table
/// index becomes the potential-key multiplicity.
#[derive(Debug, Clone, Deserialize)]
pub struct TorsionParams {
    /// Barrier height, kJ/mol.
    pub k: f64,
    pub periodicity: u32,
    /// Phase offset, degrees.
    pub phase: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VdwTypeParams {
    /// nm.
    pub sigma: f64,
    /// kJ/mol.
    pub epsilon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConstraintParams {
    /// Constrained distance, nm. When omitted the bond table's equilibrium
    /// length is used instead (bond parameters are consulted first either
    /// way; see the import rules).
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeIncrementParams {
    /// Charge moved along the bond: `+increment` on the first atom type in
    /// the pattern, `-increment` on the second. Elementary charge units.
    pub increment: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VirtualSiteParams {
    /// Name of the virtual-site kind (e.g. "lone-pair").
    pub name: String,
    /// Charge carried by the site, elementary charge units.
    pub charge: f64,
    /// Displacement from the parent atom, nm.
    pub distance: f64,
}

fn default_scale_13() -> f64 {
    0.0
}
fn default_scale_14() -> f64 {
    0.5
}
fn default_scale_15() -> f64 {
    1.0
}
fn default_cutoff() -> f64 {
    1.0
}
fn default_vdw_method() -> NonbondedMethod {
    NonbondedMethod::Cutoff
}
fn default_electrostatics_method() -> NonbondedMethod {
    NonbondedMethod::ParticleMesh
}
fn default_mixing_rule() -> MixingRule {
    MixingRule::LorentzBerthelot
}

#[derive(Debug, Clone, Deserialize)]
pub struct VdwSection {
    #[serde(default = "default_scale_13")]
    pub scale_13: f64,
    #[serde(default = "default_scale_14")]
    pub scale_14: f64,
    #[serde(default = "default_scale_15")]
    pub scale_15: f64,
    /// nm.
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    #[serde(default = "default_vdw_method")]
    pub method: NonbondedMethod,
    #[serde(default = "default_mixing_rule")]
    pub mixing_rule: MixingRule,
    #[serde(default)]
    pub types: IndexMap<String, VdwTypeParams>,
}

impl VdwSection {
    pub fn settings(&self) -> NonbondedSettings {
        NonbondedSettings {
            scale_13: self.scale_13,
            scale_14: self.scale_14,
            scale_15: self.scale_15,
            cutoff: Quantity::nanometers(self.cutoff),
            method: self.method,
            mixing_rule: Some(self.mixing_rule),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElectrostaticsSection {
    #[serde(default = "default_scale_13")]
    pub scale_13: f64,
    #[serde(default = "default_scale_14")]
    pub scale_14: f64,
    #[serde(default = "default_scale_15")]
    pub scale_15: f64,
    /// nm.
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    #[serde(default = "default_electrostatics_method")]
    pub method: NonbondedMethod,
}

impl ElectrostaticsSection {
    pub fn settings(&self) -> NonbondedSettings {
        NonbondedSettings {
            scale_13: self.scale_13,
            scale_14: self.scale_14,
            scale_15: self.scale_15,
            cutoff: Quantity::nanometers(self.cutoff),
            method: self.method,
            mixing_rule: None,
        }
    }
}

/// A declarative, atom-type-keyed force field definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForceField {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bonds: IndexMap<String, BondParams>,
    #[serde(default)]
    pub angles: IndexMap<String, AngleParams>,
    #[serde(default)]
    pub propers: IndexMap<String, Vec<TorsionParams>>,
    #[serde(default)]
    pub impropers: IndexMap<String, Vec<TorsionParams>>,
    pub vdw: Option<VdwSection>,
    pub electrostatics: Option<ElectrostaticsSection>,
    /// Base partial charge per atom type.
    #[serde(default)]
    pub library_charges: IndexMap<String, f64>,
    /// Bond-pattern-keyed charge increments, applied on top of library charges.
    #[serde(default)]
    pub charge_increments: IndexMap<String, ChargeIncrementParams>,
    #[serde(default)]
    pub constraints: IndexMap<String, ConstraintParams>,
    /// Virtual sites keyed by the parent atom type.
    #[serde(default)]
    pub virtual_sites: IndexMap<String, VirtualSiteParams>,
    /// Extra registered family names, present so that a definition can
    /// declare families this crate does not implement (they are rejected in
    /// aggregate at import time).
    #[serde(default)]
    pub extra_registered: Vec<String>,
}

impl ForceField {
    /// Parses a force field definition from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a force field definition from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The interaction family names this definition registers, in canonical
    /// build order, plus any extra declared names.
    pub fn registered_handlers(&self) -> Vec<String> {
        let mut names = Vec::new();
        if !self.constraints.is_empty() {
            names.push("Constraints".to_string());
        }
        if !self.bonds.is_empty() {
            names.push("Bonds".to_string());
        }
        if !self.angles.is_empty() {
            names.push("Angles".to_string());
        }
        if !self.propers.is_empty() {
            names.push("ProperTorsions".to_string());
        }
        if !self.impropers.is_empty() {
            names.push("ImproperTorsions".to_string());
        }
        if self.vdw.is_some() {
            names.push("vdW".to_string());
        }
        if self.electrostatics.is_some() {
            names.push("Electrostatics".to_string());
        }
        if !self.library_charges.is_empty() {
            names.push("LibraryCharges".to_string());
        }
        if !self.charge_increments.is_empty() {
            names.push("ChargeIncrementModel".to_string());
        }
        if !self.virtual_sites.is_empty() {
            names.push("VirtualSites".to_string());
        }
        names.extend(self.extra_registered.iter().cloned());
        names
    }

    /// Registers an extra family name (used to declare families outside the
    /// built-in tables).
    pub fn register(&mut self, name: impl Into<String>) {
        self.extra_registered.push(name.into());
    }

    /// Looks up bond parameters, trying the forward and reversed pattern.
    pub fn bond(&self, a: &str, b: &str) -> Option<(String, &BondParams)> {
        lookup_two(&self.bonds, a, b)
    }

    pub fn constraint(&self, a: &str, b: &str) -> Option<(String, &ConstraintParams)> {
        lookup_two(&self.constraints, a, b)
    }

    pub fn charge_increment(&self, a: &str, b: &str) -> Option<(String, &ChargeIncrementParams)> {
        lookup_two(&self.charge_increments, a, b)
    }

    /// Looks up angle parameters, trying the forward and reversed pattern.
    pub fn angle(&self, a: &str, b: &str, c: &str) -> Option<(String, &AngleParams)> {
        let forward = format!("{a}-{b}-{c}");
        if let Some(params) = self.angles.get(&forward) {
            return Some((forward, params));
        }
        let reversed = format!("{c}-{b}-{a}");
        self.angles.get(&reversed).map(|p| (reversed, p))
    }

    /// Looks up proper torsion terms. Candidates are tried in order:
    /// exact forward, exact reversed, then wildcard outer atoms
    /// (`*-b-c-*`, `*-c-b-*`).
    pub fn proper(&self, a: &str, b: &str, c: &str, d: &str) -> Option<(String, &[TorsionParams])> {
        let candidates = [
            format!("{a}-{b}-{c}-{d}"),
            format!("{d}-{c}-{b}-{a}"),
            format!("*-{b}-{c}-*"),
            format!("*-{c}-{b}-*"),
        ];
        for pattern in candidates {
            if let Some(terms) = self.propers.get(&pattern) {
                return Some((pattern, terms.as_slice()));
            }
        }
        None
    }

    /// Looks up improper torsion terms by the center-first pattern.
    pub fn improper(
        &self,
        center: &str,
        p1: &str,
        p2: &str,
        p3: &str,
    ) -> Option<(String, &[TorsionParams])> {
        let candidates = [
            format!("{center}-{p1}-{p2}-{p3}"),
            format!("{center}-*-*-*"),
        ];
        for pattern in candidates {
            if let Some(terms) = self.impropers.get(&pattern) {
                return Some((pattern, terms.as_slice()));
            }
        }
        None
    }

    pub fn vdw_type(&self, atom_type: &str) -> Option<&VdwTypeParams> {
        self.vdw.as_ref()?.types.get(atom_type)
    }
}

fn lookup_two<'a, T>(
    table: &'a IndexMap<String, T>,
    a: &str,
    b: &str,
) -> Option<(String, &'a T)> {
    let forward = format!("{a}-{b}");
    if let Some(params) = table.get(&forward) {
        return Some((forward, params));
    }
    let reversed = format!("{b}-{a}");
    table.get(&reversed).map(|p| (reversed, p))
}
