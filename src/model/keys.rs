use std::fmt;

use crate::handler::InteractionFamily;

/// Identity of an interaction site: the ordered atom tuple it spans, a
/// multiplicity index, and optional virtual-site identification.
///
/// The multiplicity index disambiguates degenerate matches, i.e. multiple
/// distinct physical terms applying to the same atom tuple (several torsion
/// terms about the same central bond). Keys are immutable after creation;
/// disambiguation computes new candidate keys via [`with_mult`](TopologyKey::with_mult)
/// rather than mutating a key that may already be referenced elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopologyKey {
    atom_indices: Vec<usize>,
    mult: u32,
    virtual_site: Option<String>,
}

impl TopologyKey {
    pub fn new(atom_indices: impl Into<Vec<usize>>) -> Self {
        Self {
            atom_indices: atom_indices.into(),
            mult: 0,
            virtual_site: None,
        }
    }

    pub fn with_mult(&self, mult: u32) -> Self {
        Self {
            atom_indices: self.atom_indices.clone(),
            mult,
            virtual_site: self.virtual_site.clone(),
        }
    }

    pub fn virtual_site(atom_indices: impl Into<Vec<usize>>, site_name: impl Into<String>) -> Self {
        Self {
            atom_indices: atom_indices.into(),
            mult: 0,
            virtual_site: Some(site_name.into()),
        }
    }

    pub fn atom_indices(&self) -> &[usize] {
        &self.atom_indices
    }

    pub fn mult(&self) -> u32 {
        self.mult
    }

    pub fn is_virtual_site(&self) -> bool {
        self.virtual_site.is_some()
    }

    pub fn virtual_site_name(&self) -> Option<&str> {
        self.virtual_site.as_deref()
    }

    /// Returns a copy with every atom index shifted by `offset`.
    ///
    /// Used by the combination operator to move keys from the right operand
    /// into the merged index space.
    pub fn offset_by(&self, offset: usize) -> Self {
        Self {
            atom_indices: self.atom_indices.iter().map(|i| i + offset).collect(),
            mult: self.mult,
            virtual_site: self.virtual_site.clone(),
        }
    }
}

impl fmt::Display for TopologyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (n, idx) in self.atom_indices.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{idx}")?;
        }
        write!(f, ")")?;
        if self.mult > 0 {
            write!(f, " mult {}", self.mult)?;
        }
        if let Some(name) = &self.virtual_site {
            write!(f, " vsite '{name}'")?;
        }
        Ok(())
    }
}

/// Identity of a parameter set: a pattern or atom-type id, the family of the
/// owning handler, and optional disambiguating context.
///
/// Many [`TopologyKey`]s commonly map to one `PotentialKey`; parameter
/// sharing is the expected case, not the exception.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PotentialKey {
    id: String,
    associated_handler: InteractionFamily,
    mult: Option<u32>,
    /// Index into a bond-order interpolation table, where applicable.
    bond_order_index: Option<u32>,
    virtual_site: bool,
}

impl PotentialKey {
    pub fn new(id: impl Into<String>, associated_handler: InteractionFamily) -> Self {
        Self {
            id: id.into(),
            associated_handler,
            mult: None,
            bond_order_index: None,
            virtual_site: false,
        }
    }

    pub fn with_mult(mut self, mult: u32) -> Self {
        self.mult = Some(mult);
        self
    }

    pub fn with_bond_order_index(mut self, index: u32) -> Self {
        self.bond_order_index = Some(index);
        self
    }

    pub fn for_virtual_site(mut self) -> Self {
        self.virtual_site = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn associated_handler(&self) -> InteractionFamily {
        self.associated_handler
    }

    pub fn mult(&self) -> Option<u32> {
        self.mult
    }

    pub fn bond_order_index(&self) -> Option<u32> {
        self.bond_order_index
    }

    pub fn is_virtual_site(&self) -> bool {
        self.virtual_site
    }
}

impl fmt::Display for PotentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.associated_handler, self.id)?;
        if let Some(mult) = self.mult {
            write!(f, " mult {mult}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_mult_leaves_original_untouched() {
        let key = TopologyKey::new([2, 5, 7, 9]);
        let bumped = key.with_mult(1);
        assert_eq!(key.mult(), 0);
        assert_eq!(bumped.mult(), 1);
        assert_eq!(bumped.atom_indices(), key.atom_indices());
        assert_ne!(key, bumped);
    }

    #[test]
    fn offset_shifts_every_index() {
        let key = TopologyKey::new([0, 1, 2]).with_mult(3);
        let shifted = key.offset_by(10);
        assert_eq!(shifted.atom_indices(), &[10, 11, 12]);
        assert_eq!(shifted.mult(), 3);
    }

    #[test]
    fn virtual_site_keys_are_distinct() {
        let plain = TopologyKey::new([0, 1]);
        let vsite = TopologyKey::virtual_site([0, 1], "divalent-lone-pair");
        assert_ne!(plain, vsite);
        assert!(vsite.is_virtual_site());
        assert_eq!(vsite.virtual_site_name(), Some("divalent-lone-pair"));
    }

    #[test]
    fn potential_key_identity_includes_context() {
        let base = PotentialKey::new("[#6:1]-[#6:2]", InteractionFamily::Bonds);
        let interpolated = base.clone().with_bond_order_index(1);
        assert_ne!(base, interpolated);
        assert_eq!(base.id(), interpolated.id());
    }

    #[test]
    fn display_formats_are_compact() {
        let key = TopologyKey::new([4, 7]).with_mult(2);
        assert_eq!(key.to_string(), "(4, 7) mult 2");
        let pkey = PotentialKey::new("CT-CT", InteractionFamily::Bonds);
        assert_eq!(pkey.to_string(), "Bonds/CT-CT");
    }
}
