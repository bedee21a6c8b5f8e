//! Per-family containers mapping interaction sites to shared parameter sets.
//!
//! A [`PotentialHandler`] owns the two-level indirection at the heart of the
//! crate: a slot map ([`TopologyKey`] -> [`PotentialKey`]) recording which
//! parameter identity applies to each interaction site, and a potential store
//! ([`PotentialKey`] -> [`Potential`]) holding the deduplicated parameter
//! values. Many slots pointing at one potential is the common case.

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::Error;
use crate::model::keys::{PotentialKey, TopologyKey};
use crate::model::potential::Potential;
use crate::model::quantity::Quantity;

/// The fixed enumerated set of interaction families a source force field may
/// register.
///
/// `LibraryCharges` and `ChargeIncrementModel` are source-side families only:
/// their contents are composed into the `Electrostatics` handler during
/// import and never appear as standalone handlers on an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InteractionFamily {
    Constraints,
    Bonds,
    Angles,
    ProperTorsions,
    ImproperTorsions,
    Vdw,
    Electrostatics,
    LibraryCharges,
    ChargeIncrementModel,
    VirtualSites,
}

impl InteractionFamily {
    /// Canonical handler name, matching the source-force-field spelling.
    pub fn name(&self) -> &'static str {
        match self {
            InteractionFamily::Constraints => "Constraints",
            InteractionFamily::Bonds => "Bonds",
            InteractionFamily::Angles => "Angles",
            InteractionFamily::ProperTorsions => "ProperTorsions",
            InteractionFamily::ImproperTorsions => "ImproperTorsions",
            InteractionFamily::Vdw => "vdW",
            InteractionFamily::Electrostatics => "Electrostatics",
            InteractionFamily::LibraryCharges => "LibraryCharges",
            InteractionFamily::ChargeIncrementModel => "ChargeIncrementModel",
            InteractionFamily::VirtualSites => "VirtualSites",
        }
    }

    /// Parses a canonical family name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Constraints" => InteractionFamily::Constraints,
            "Bonds" => InteractionFamily::Bonds,
            "Angles" => InteractionFamily::Angles,
            "ProperTorsions" => InteractionFamily::ProperTorsions,
            "ImproperTorsions" => InteractionFamily::ImproperTorsions,
            "vdW" => InteractionFamily::Vdw,
            "Electrostatics" => InteractionFamily::Electrostatics,
            "LibraryCharges" => InteractionFamily::LibraryCharges,
            "ChargeIncrementModel" => InteractionFamily::ChargeIncrementModel,
            "VirtualSites" => InteractionFamily::VirtualSites,
            _ => return None,
        })
    }
}

impl fmt::Display for InteractionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Truncation / long-range treatment of a nonbonded interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonbondedMethod {
    Cutoff,
    ReactionField,
    #[serde(alias = "pme")]
    ParticleMesh,
    NoCutoff,
}

impl fmt::Display for NonbondedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NonbondedMethod::Cutoff => "cutoff",
            NonbondedMethod::ReactionField => "reaction-field",
            NonbondedMethod::ParticleMesh => "particle-mesh",
            NonbondedMethod::NoCutoff => "no-cutoff",
        };
        f.write_str(name)
    }
}

/// Combination rule for pairwise vdW parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MixingRule {
    LorentzBerthelot,
    Geometric,
}

impl fmt::Display for MixingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MixingRule::LorentzBerthelot => "lorentz-berthelot",
            MixingRule::Geometric => "geometric",
        };
        f.write_str(name)
    }
}

/// Extra state carried only by nonbonded handlers: short-range exclusion
/// scale factors, the truncation cutoff, and the long-range method.
#[derive(Debug, Clone, PartialEq)]
pub struct NonbondedSettings {
    /// Scaling factor applied to 1-3 interactions.
    pub scale_13: f64,
    /// Scaling factor applied to 1-4 interactions.
    pub scale_14: f64,
    /// Scaling factor applied to 1-5 interactions.
    pub scale_15: f64,
    /// Distance at which pairwise interactions are truncated.
    pub cutoff: Quantity,
    pub method: NonbondedMethod,
    /// Only meaningful for vdW handlers.
    pub mixing_rule: Option<MixingRule>,
}

impl NonbondedSettings {
    pub fn vdw_defaults() -> Self {
        Self {
            scale_13: 0.0,
            scale_14: 0.5,
            scale_15: 1.0,
            cutoff: Quantity::nanometers(1.0),
            method: NonbondedMethod::Cutoff,
            mixing_rule: Some(MixingRule::LorentzBerthelot),
        }
    }

    pub fn electrostatics_defaults() -> Self {
        Self {
            scale_13: 0.0,
            scale_14: 0.5,
            scale_15: 1.0,
            cutoff: Quantity::nanometers(1.0),
            method: NonbondedMethod::ParticleMesh,
            mixing_rule: None,
        }
    }
}

/// Container for one interaction family: slot map plus potential store.
#[derive(Debug, Clone)]
pub struct PotentialHandler {
    family: InteractionFamily,
    expression: String,
    slot_map: IndexMap<TopologyKey, PotentialKey>,
    potentials: IndexMap<PotentialKey, Potential>,
    nonbonded: Option<NonbondedSettings>,
}

impl PotentialHandler {
    fn new(family: InteractionFamily, expression: &str, nonbonded: Option<NonbondedSettings>) -> Self {
        Self {
            family,
            expression: expression.to_string(),
            slot_map: IndexMap::new(),
            potentials: IndexMap::new(),
            nonbonded,
        }
    }

    pub fn bonds() -> Self {
        Self::new(InteractionFamily::Bonds, "k/2*(r-length)**2", None)
    }

    pub fn angles() -> Self {
        Self::new(InteractionFamily::Angles, "k/2*(theta-angle)**2", None)
    }

    pub fn proper_torsions() -> Self {
        Self::new(
            InteractionFamily::ProperTorsions,
            "k*(1+cos(periodicity*theta-phase))",
            None,
        )
    }

    pub fn improper_torsions() -> Self {
        Self::new(
            InteractionFamily::ImproperTorsions,
            "k*(1+cos(periodicity*theta-phase))",
            None,
        )
    }

    /// Constraints carry a fixed distance, not a functional form.
    pub fn constraints() -> Self {
        Self::new(InteractionFamily::Constraints, "", None)
    }

    pub fn vdw() -> Self {
        Self::new(
            InteractionFamily::Vdw,
            "4*epsilon*((sigma/r)**12-(sigma/r)**6)",
            Some(NonbondedSettings::vdw_defaults()),
        )
    }

    pub fn electrostatics() -> Self {
        Self::new(
            InteractionFamily::Electrostatics,
            "coul",
            Some(NonbondedSettings::electrostatics_defaults()),
        )
    }

    pub fn virtual_sites() -> Self {
        Self::new(InteractionFamily::VirtualSites, "", None)
    }

    /// A handler with the same family, expression, and nonbonded settings
    /// but empty maps. Used when combination carries a family over from one
    /// operand only.
    pub fn clone_empty(&self) -> Self {
        Self {
            family: self.family,
            expression: self.expression.clone(),
            slot_map: IndexMap::new(),
            potentials: IndexMap::new(),
            nonbonded: self.nonbonded.clone(),
        }
    }

    pub fn family(&self) -> InteractionFamily {
        self.family
    }

    /// Canonical handler name (the registry key on the aggregate).
    pub fn name(&self) -> &'static str {
        self.family.name()
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn nonbonded(&self) -> Option<&NonbondedSettings> {
        self.nonbonded.as_ref()
    }

    pub fn nonbonded_mut(&mut self) -> Option<&mut NonbondedSettings> {
        self.nonbonded.as_mut()
    }

    pub fn slot_map(&self) -> &IndexMap<TopologyKey, PotentialKey> {
        &self.slot_map
    }

    pub fn potentials(&self) -> &IndexMap<PotentialKey, Potential> {
        &self.potentials
    }

    /// Records that `potential_key` applies to the site identified by
    /// `topology_key`, returning the slot key actually used.
    ///
    /// Degenerate matches are disambiguated here: if the slot is already
    /// taken by a *different* potential key, a fresh candidate key with an
    /// incremented multiplicity is computed (in a loop, never by mutating the
    /// occupied key) until a free slot is found. Re-storing the same
    /// assignment is idempotent.
    pub fn store_match(&mut self, topology_key: TopologyKey, potential_key: PotentialKey) -> TopologyKey {
        let mut candidate = topology_key;
        loop {
            match self.slot_map.get(&candidate) {
                Some(existing) if *existing != potential_key => {
                    candidate = candidate.with_mult(candidate.mult() + 1);
                }
                _ => break,
            }
        }
        self.slot_map.insert(candidate.clone(), potential_key);
        candidate
    }

    pub fn store_matches(
        &mut self,
        matches: impl IntoIterator<Item = (TopologyKey, PotentialKey)>,
    ) {
        for (topology_key, potential_key) in matches {
            self.store_match(topology_key, potential_key);
        }
    }

    /// Attaches parameter values to a potential key. A second insert under an
    /// existing key overwrites the stored potential.
    pub fn store_potential(&mut self, key: PotentialKey, potential: Potential) {
        self.potentials.insert(key, potential);
    }

    /// Point lookup of the potential applying to an exact atom-index tuple.
    ///
    /// Unsound in the presence of degenerate topology keys sharing the same
    /// atom tuple (multiple multiplicities): only the first match is
    /// returned. Callers needing every match must iterate
    /// [`slot_map`](PotentialHandler::slot_map) directly.
    pub fn parameters_for(&self, atom_indices: &[usize]) -> Option<&Potential> {
        self.slot_map
            .iter()
            .find(|(top_key, _)| top_key.atom_indices() == atom_indices)
            .and_then(|(_, pot_key)| self.potentials.get(pot_key))
    }

    /// Derived read-only charges view, one entry per non-virtual-site slot.
    ///
    /// Virtual-site slots are excluded; their charges are tracked through
    /// the `VirtualSites` handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalInconsistency`] when called on a family other
    /// than electrostatics, or when a referenced potential is missing or
    /// lacks a `charge` parameter.
    pub fn charges(&self) -> Result<IndexMap<TopologyKey, Quantity>, Error> {
        if self.family != InteractionFamily::Electrostatics {
            return Err(Error::InternalInconsistency(format!(
                "charges view requested from a {} handler",
                self.family
            )));
        }

        let mut charges = IndexMap::new();
        for (top_key, pot_key) in &self.slot_map {
            if top_key.is_virtual_site() {
                continue;
            }
            let charge = self
                .potentials
                .get(pot_key)
                .and_then(|p| p.parameter("charge"))
                .ok_or_else(|| {
                    Error::InternalInconsistency(format!(
                        "slot {top_key} references potential {pot_key} with no charge parameter"
                    ))
                })?;
            charges.insert(top_key.clone(), charge);
        }
        Ok(charges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::quantity::Quantity;

    fn torsion_key(id: &str) -> PotentialKey {
        PotentialKey::new(id, InteractionFamily::ProperTorsions)
    }

    #[test]
    fn degenerate_matches_get_distinct_multiplicities() {
        let mut handler = PotentialHandler::proper_torsions();
        let tuple = TopologyKey::new([0, 1, 2, 3]);

        let first = handler.store_match(tuple.clone(), torsion_key("CT-CT-CT-CT-1"));
        let second = handler.store_match(tuple.clone(), torsion_key("CT-CT-CT-CT-2"));

        assert_eq!(first.mult(), 0);
        assert_eq!(second.mult(), 1);
        assert_eq!(handler.slot_map().len(), 2);
        assert_eq!(
            handler.slot_map().get(&tuple),
            Some(&torsion_key("CT-CT-CT-CT-1"))
        );
    }

    #[test]
    fn restoring_same_assignment_is_idempotent() {
        let mut handler = PotentialHandler::proper_torsions();
        let tuple = TopologyKey::new([0, 1, 2, 3]);

        handler.store_match(tuple.clone(), torsion_key("a"));
        handler.store_match(tuple.clone(), torsion_key("b"));
        handler.store_match(tuple.clone(), torsion_key("a"));
        handler.store_match(tuple, torsion_key("b"));

        assert_eq!(handler.slot_map().len(), 2);
    }

    #[test]
    fn store_potential_overwrites_existing_key() {
        let mut handler = PotentialHandler::bonds();
        let key = PotentialKey::new("CT-CT", InteractionFamily::Bonds);

        handler.store_potential(
            key.clone(),
            [("length", Quantity::nanometers(0.15))].into_iter().collect(),
        );
        handler.store_potential(
            key.clone(),
            [("length", Quantity::nanometers(0.153))].into_iter().collect(),
        );

        assert_eq!(handler.potentials().len(), 1);
        assert_eq!(
            handler.potentials()[&key].parameter("length"),
            Some(Quantity::nanometers(0.153))
        );
    }

    #[test]
    fn point_lookup_returns_first_match_only() {
        let mut handler = PotentialHandler::proper_torsions();
        let tuple = TopologyKey::new([4, 5, 6, 7]);
        handler.store_match(tuple.clone(), torsion_key("term-1"));
        handler.store_match(tuple, torsion_key("term-2"));
        handler.store_potential(
            torsion_key("term-1"),
            [("k", Quantity::kj_per_mol(1.0))].into_iter().collect(),
        );
        handler.store_potential(
            torsion_key("term-2"),
            [("k", Quantity::kj_per_mol(2.0))].into_iter().collect(),
        );

        let found = handler.parameters_for(&[4, 5, 6, 7]).unwrap();
        assert_eq!(found.parameter("k"), Some(Quantity::kj_per_mol(1.0)));
        assert!(handler.parameters_for(&[9, 9, 9, 9]).is_none());
    }

    #[test]
    fn charges_view_excludes_virtual_sites() {
        let mut handler = PotentialHandler::electrostatics();
        let atom_key = PotentialKey::new("O", InteractionFamily::Electrostatics);
        let vsite_key =
            PotentialKey::new("lone-pair", InteractionFamily::Electrostatics).for_virtual_site();

        handler.store_match(TopologyKey::new([0]), atom_key.clone());
        handler.store_match(TopologyKey::virtual_site([0], "lone-pair"), vsite_key.clone());
        handler.store_potential(
            atom_key,
            [("charge", Quantity::elementary_charge(-0.8))]
                .into_iter()
                .collect(),
        );
        handler.store_potential(
            vsite_key,
            [("charge", Quantity::elementary_charge(-0.2))]
                .into_iter()
                .collect(),
        );

        let charges = handler.charges().unwrap();
        assert_eq!(charges.len(), 1);
        assert_eq!(
            charges[&TopologyKey::new([0])],
            Quantity::elementary_charge(-0.8)
        );
    }

    #[test]
    fn charges_view_rejected_for_other_families() {
        let handler = PotentialHandler::bonds();
        assert!(matches!(
            handler.charges(),
            Err(Error::InternalInconsistency(_))
        ));
    }

    #[test]
    fn family_names_round_trip() {
        for family in [
            InteractionFamily::Constraints,
            InteractionFamily::Bonds,
            InteractionFamily::Angles,
            InteractionFamily::ProperTorsions,
            InteractionFamily::ImproperTorsions,
            InteractionFamily::Vdw,
            InteractionFamily::Electrostatics,
            InteractionFamily::LibraryCharges,
            InteractionFamily::ChargeIncrementModel,
            InteractionFamily::VirtualSites,
        ] {
            assert_eq!(InteractionFamily::from_name(family.name()), Some(family));
        }
        assert_eq!(InteractionFamily::from_name("Foo"), None);
        assert_eq!(InteractionFamily::Vdw.name(), "vdW");
    }
}
