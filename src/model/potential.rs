use indexmap::IndexMap;

use super::quantity::Quantity;

/// A parameter set: named physical-quantity values, optionally carrying its
/// own functional form when it deviates from the owning handler's expression.
///
/// Immutable after creation. `Potential` deliberately implements neither
/// `PartialEq` nor `Hash`: two potentials are considered equal only by
/// identity of their owning [`PotentialKey`](super::keys::PotentialKey),
/// never by structural comparison of their values. The crate-private
/// [`same_parameters`](Potential::same_parameters) check exists solely so the
/// combination operator can implement its require-match conflict policy.
#[derive(Debug, Clone)]
pub struct Potential {
    parameters: IndexMap<String, Quantity>,
    expression: Option<String>,
}

impl Potential {
    pub fn new(parameters: impl IntoIterator<Item = (String, Quantity)>) -> Self {
        Self {
            parameters: parameters.into_iter().collect(),
            expression: None,
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn parameters(&self) -> &IndexMap<String, Quantity> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<Quantity> {
        self.parameters.get(name).copied()
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Exact structural comparison of parameter names, values, and units.
    pub(crate) fn same_parameters(&self, other: &Potential) -> bool {
        self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .all(|(name, q)| other.parameters.get(name) == Some(q))
    }
}

/// Convenience for building a potential from `(&str, Quantity)` pairs.
impl<'a> FromIterator<(&'a str, Quantity)> for Potential {
    fn from_iter<T: IntoIterator<Item = (&'a str, Quantity)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.to_string(), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_lookup_by_name() {
        let pot: Potential = [
            ("k", Quantity::kj_per_mol_per_nm2(250_000.0)),
            ("length", Quantity::nanometers(0.109)),
        ]
        .into_iter()
        .collect();

        assert_eq!(pot.parameter("length"), Some(Quantity::nanometers(0.109)));
        assert_eq!(pot.parameter("sigma"), None);
    }

    #[test]
    fn same_parameters_requires_exact_values_and_units() {
        let a: Potential = [("charge", Quantity::elementary_charge(-0.5))]
            .into_iter()
            .collect();
        let b: Potential = [("charge", Quantity::elementary_charge(-0.5))]
            .into_iter()
            .collect();
        let c: Potential = [("charge", Quantity::elementary_charge(0.5))]
            .into_iter()
            .collect();
        let d: Potential = [("charge", Quantity::dimensionless(-0.5))]
            .into_iter()
            .collect();

        assert!(a.same_parameters(&b));
        assert!(!a.same_parameters(&c));
        assert!(!a.same_parameters(&d));
    }

    #[test]
    fn expression_defaults_to_handler_level() {
        let pot = Potential::new(std::iter::empty());
        assert!(pot.expression().is_none());

        let custom = pot.with_expression("4*epsilon*((sigma/r)**12-(sigma/r)**6)");
        assert_eq!(
            custom.expression(),
            Some("4*epsilon*((sigma/r)**12-(sigma/r)**6)")
        );
    }
}
