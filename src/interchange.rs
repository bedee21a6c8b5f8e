//! The aggregate root: a registry of potential handlers plus topology,
//! positions, and periodic box.

use std::fmt;

use indexmap::IndexMap;
use log::warn;

use crate::error::Error;
use crate::handler::{InteractionFamily, NonbondedMethod, PotentialHandler};
use crate::import::{self, ForceField};
use crate::model::potential::Potential;
use crate::model::topology::Topology;

/// A periodic box supplied to [`Interchange::set_box`]: either three edge
/// lengths (expanded to a diagonal matrix) or a full 3x3 matrix, in nm.
///
/// Foreign data of unknown shape goes through [`BoxInput::from_flat`], which
/// is where the shape validation lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoxInput {
    Lengths([f64; 3]),
    Matrix([[f64; 3]; 3]),
}

impl BoxInput {
    /// Validates a flat row-major slice: 3 values are box edge lengths,
    /// 9 values a full matrix. Anything else is an invalid box.
    pub fn from_flat(values: &[f64]) -> Result<Self, Error> {
        match values {
            [a, b, c] => Ok(BoxInput::Lengths([*a, *b, *c])),
            [v @ ..] if v.len() == 9 => Ok(BoxInput::Matrix([
                [v[0], v[1], v[2]],
                [v[3], v[4], v[5]],
                [v[6], v[7], v[8]],
            ])),
            other => Err(Error::InvalidBox(format!("{} values", other.len()))),
        }
    }

    fn to_matrix(self) -> [[f64; 3]; 3] {
        match self {
            BoxInput::Lengths([a, b, c]) => {
                [[a, 0.0, 0.0], [0.0, b, 0.0], [0.0, 0.0, c]]
            }
            BoxInput::Matrix(m) => m,
        }
    }
}

impl From<[f64; 3]> for BoxInput {
    fn from(lengths: [f64; 3]) -> Self {
        BoxInput::Lengths(lengths)
    }
}

impl From<[[f64; 3]; 3]> for BoxInput {
    fn from(matrix: [[f64; 3]; 3]) -> Self {
        BoxInput::Matrix(matrix)
    }
}

/// Conflict policy for potential-store collisions during combination.
///
/// Equal-looking potential keys in the two operands may reference
/// structurally different parameters, so the resolution is an explicit,
/// named choice rather than an implicit last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombinePolicy {
    /// Any collision is an error.
    Reject,
    /// Keep the left operand's potential.
    PreferLeft,
    /// Keep the right operand's potential.
    PreferRight,
    /// Keep the (shared) potential, but only after verifying the two sides
    /// carry structurally identical parameters. The default.
    #[default]
    RequireMatch,
}

/// Derived read-only view of the nonbonded treatment of an interchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonbondedSummary {
    pub vdw_method: NonbondedMethod,
    pub electrostatics_method: NonbondedMethod,
    /// Whether a periodic box is set.
    pub periodic: bool,
}

/// A read-only component resolved by [`Interchange::get`].
#[derive(Debug)]
pub enum Component<'a> {
    Topology(&'a Topology),
    Positions(&'a [[f64; 3]]),
    Box([[f64; 3]; 3]),
    Handler(&'a PotentialHandler),
}

/// Accessor aliases resolved to canonical component names. Consulted once
/// per named lookup; every alias observes the same underlying state as the
/// canonical name.
const ALIASES: &[(&str, &str)] = &[
    ("box_vectors", "box"),
    ("coordinates", "positions"),
    ("top", "topology"),
];

fn resolve_alias(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

/// An engine-agnostic store of a parameterized molecular-mechanics system:
/// one [`PotentialHandler`] per interaction family, a topology, particle
/// positions, and a periodic box.
///
/// Structural validation happens at assignment time; an `Interchange` never
/// holds a box or position array inconsistent with its topology.
#[derive(Debug, Clone, Default)]
pub struct Interchange {
    handlers: IndexMap<String, PotentialHandler>,
    topology: Option<Topology>,
    positions: Option<Vec<[f64; 3]>>,
    box_: Option<[[f64; 3]; 3]>,
}

impl Interchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameterizes a topology with a force field.
    ///
    /// Every family the source registers is first validated against the
    /// supported set; all unsupported names are reported together in one
    /// [`Error::UnsupportedHandlers`] before any handler is built, so a
    /// partially-built aggregate is never produced. Handlers are then built
    /// in canonical order (bonds before constraints). The topology's box
    /// vectors, when present, become the interchange box.
    pub fn from_force_field(force_field: &ForceField, topology: &Topology) -> Result<Self, Error> {
        Self::check_supported_handlers(force_field)?;

        let handlers = import::build_handlers(force_field, topology)?;

        let mut out = Self::new();
        out.handlers = handlers;
        out.box_ = topology.box_vectors();
        out.topology = Some(topology.clone());
        Ok(out)
    }

    fn check_supported_handlers(force_field: &ForceField) -> Result<(), Error> {
        let unsupported: Vec<String> = force_field
            .registered_handlers()
            .into_iter()
            .filter(|name| InteractionFamily::from_name(name).is_none())
            .collect();

        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(Error::UnsupportedHandlers(unsupported))
        }
    }

    pub fn handlers(&self) -> &IndexMap<String, PotentialHandler> {
        &self.handlers
    }

    /// Looks up a handler by canonical family name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameterHandler`] when the family was never
    /// attached.
    pub fn handler(&self, name: &str) -> Result<&PotentialHandler, Error> {
        self.handlers
            .get(name)
            .ok_or_else(|| Error::MissingParameterHandler(name.to_string()))
    }

    /// Attaches a handler under its canonical name, replacing any previous
    /// handler of the same family.
    pub fn add_handler(&mut self, handler: PotentialHandler) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn remove_handler(&mut self, name: &str) -> Option<PotentialHandler> {
        self.handlers.shift_remove(name)
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    /// Sets the topology, validating any positions already present against
    /// the new atom count.
    pub fn set_topology(&mut self, topology: Option<Topology>) -> Result<(), Error> {
        if let (Some(top), Some(pos)) = (&topology, &self.positions) {
            if pos.len() != top.n_atoms() {
                return Err(Error::InvalidPositions {
                    expected: top.n_atoms(),
                    found: pos.len(),
                });
            }
        }
        self.topology = topology;
        Ok(())
    }

    pub fn positions(&self) -> Option<&[[f64; 3]]> {
        self.positions.as_deref()
    }

    /// Sets particle positions (nm), validated against the topology atom
    /// count when a topology is present.
    pub fn set_positions(&mut self, positions: Option<Vec<[f64; 3]>>) -> Result<(), Error> {
        if let (Some(top), Some(pos)) = (&self.topology, &positions) {
            if pos.len() != top.n_atoms() {
                return Err(Error::InvalidPositions {
                    expected: top.n_atoms(),
                    found: pos.len(),
                });
            }
        }
        self.positions = positions;
        Ok(())
    }

    pub fn box_vectors(&self) -> Option<[[f64; 3]; 3]> {
        self.box_
    }

    /// Sets the periodic box. A 3-vector input is expanded to a diagonal
    /// matrix; the stored state is always a 3x3 matrix or absent.
    pub fn set_box(&mut self, box_input: Option<impl Into<BoxInput>>) {
        self.box_ = box_input.map(|b| b.into().to_matrix());
    }

    /// Item-style lookup of a component by name.
    ///
    /// Resolves to the topology (`"topology"` or `"top"`), the positions
    /// (`"positions"` or `"coordinates"`), the box (`"box"` or
    /// `"box_vectors"`), or a registered handler by canonical family name.
    /// Any other key fails with a lookup error naming the key and the
    /// currently registered handler names.
    pub fn get(&self, key: &str) -> Result<Component<'_>, Error> {
        let registered = || self.handlers.keys().cloned().collect();
        match resolve_alias(key) {
            "topology" => self
                .topology()
                .map(Component::Topology)
                .ok_or_else(|| Error::lookup(key, registered())),
            "positions" => self
                .positions()
                .map(Component::Positions)
                .ok_or_else(|| Error::lookup(key, registered())),
            "box" => self
                .box_
                .map(Component::Box)
                .ok_or_else(|| Error::lookup(key, registered())),
            canonical => self
                .handlers
                .get(canonical)
                .map(Component::Handler)
                .ok_or_else(|| Error::lookup(key, registered())),
        }
    }

    /// Point lookup of the potential applying to an exact atom tuple within
    /// one family.
    ///
    /// Inherits the first-match caveat of
    /// [`PotentialHandler::parameters_for`]: unsound when degenerate keys
    /// share the tuple.
    pub fn get_parameters(
        &self,
        handler_name: &str,
        atom_indices: &[usize],
    ) -> Result<&Potential, Error> {
        let handler = self.handler(handler_name)?;
        handler.parameters_for(atom_indices).ok_or_else(|| {
            Error::missing_parameters(handler_name, format!("{atom_indices:?}"))
        })
    }

    /// The derived nonbonded-method summary consulted by export backends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalInconsistency`] when no vdW or no
    /// electrostatics handler is registered.
    pub fn nonbonded_methods(&self) -> Result<NonbondedSummary, Error> {
        let vdw = self
            .handlers
            .get("vdW")
            .and_then(|h| h.nonbonded())
            .ok_or_else(|| {
                Error::InternalInconsistency("found no vdW handler for method summary".to_string())
            })?;
        let electrostatics = self
            .handlers
            .get("Electrostatics")
            .and_then(|h| h.nonbonded())
            .ok_or_else(|| {
                Error::InternalInconsistency(
                    "found no electrostatics handler for method summary".to_string(),
                )
            })?;

        Ok(NonbondedSummary {
            vdw_method: vdw.method,
            electrostatics_method: electrostatics.method,
            periodic: self.box_.is_some(),
        })
    }

    /// Combines two interchange objects into a new one, never mutating
    /// either operand.
    ///
    /// The right operand's molecules are appended to the left's topology,
    /// and every right-origin topology key has its atom indices shifted by
    /// the left atom count. Potential stores are unioned; collisions are
    /// resolved by the explicit `policy`. Positions concatenate when both
    /// operands carry them, and are otherwise dropped with a warning.
    /// Combination of unequal boxes is unsupported and fails hard.
    pub fn combine(&self, other: &Interchange, policy: CombinePolicy) -> Result<Interchange, Error> {
        let left_top = self
            .topology
            .as_ref()
            .ok_or_else(|| Error::Incompatible("left operand has no topology".to_string()))?;
        let right_top = other
            .topology
            .as_ref()
            .ok_or_else(|| Error::Incompatible("right operand has no topology".to_string()))?;

        if self.box_ != other.box_ {
            return Err(Error::Incompatible(
                "combination with unequal box vectors is not supported".to_string(),
            ));
        }

        let mut merged = self.clone();
        let atom_offset = left_top.n_atoms();

        let mut topology = left_top.clone();
        topology.append_molecules(right_top);
        merged.topology = Some(topology);

        for (name, right_handler) in &other.handlers {
            match merged.handlers.get_mut(name) {
                None => {
                    // Family present only in the right operand: carried
                    // through, with its keys moved into the merged index
                    // space.
                    let mut shifted = right_handler.clone_empty();
                    for (top_key, pot_key) in right_handler.slot_map() {
                        shifted.store_match(top_key.offset_by(atom_offset), pot_key.clone());
                    }
                    for (pot_key, potential) in right_handler.potentials() {
                        shifted.store_potential(pot_key.clone(), potential.clone());
                    }
                    merged.handlers.insert(name.clone(), shifted);
                }
                Some(left_handler) => {
                    if left_handler.nonbonded() != right_handler.nonbonded() {
                        return Err(Error::Incompatible(format!(
                            "nonbonded settings of the '{name}' handlers differ"
                        )));
                    }
                    for (top_key, pot_key) in right_handler.slot_map() {
                        left_handler.store_match(top_key.offset_by(atom_offset), pot_key.clone());
                    }
                    for (pot_key, potential) in right_handler.potentials() {
                        let collision = left_handler.potentials().contains_key(pot_key);
                        if !collision {
                            left_handler.store_potential(pot_key.clone(), potential.clone());
                            continue;
                        }
                        match policy {
                            CombinePolicy::PreferLeft => {}
                            CombinePolicy::PreferRight => {
                                left_handler.store_potential(pot_key.clone(), potential.clone());
                            }
                            CombinePolicy::Reject => {
                                return Err(Error::potential_key_conflict(
                                    name.clone(),
                                    pot_key.id(),
                                    "key present in both operands",
                                ));
                            }
                            CombinePolicy::RequireMatch => {
                                let matches = left_handler
                                    .potentials()
                                    .get(pot_key)
                                    .is_some_and(|left_pot| left_pot.same_parameters(potential));
                                if !matches {
                                    return Err(Error::potential_key_conflict(
                                        name.clone(),
                                        pot_key.id(),
                                        "operands carry structurally different parameters",
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }

        merged.positions = match (&self.positions, &other.positions) {
            (Some(left), Some(right)) => {
                let mut positions = left.clone();
                positions.extend_from_slice(right);
                Some(positions)
            }
            _ => {
                warn!(
                    "dropping positions: one or both combined objects have none set"
                );
                None
            }
        };

        Ok(merged)
    }
}

impl fmt::Display for Interchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let periodic = if self.box_.is_some() { "" } else { "non-" };
        match &self.topology {
            Some(top) => write!(
                f,
                "Interchange with {} atoms, {periodic}periodic topology",
                top.n_atoms()
            ),
            None => write!(f, "Interchange with no topology"),
        }
    }
}
