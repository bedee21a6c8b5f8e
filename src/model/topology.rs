use crate::error::Error;

/// A single interaction site in a molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub name: String,
    /// Force field atom type label (e.g. "C_3", "opls_135").
    pub atom_type: String,
    /// Element symbol, informational only.
    pub element: String,
    /// Mass in amu.
    pub mass: f64,
}

impl Atom {
    pub fn new(
        name: impl Into<String>,
        atom_type: impl Into<String>,
        element: impl Into<String>,
        mass: f64,
    ) -> Self {
        Self {
            name: name.into(),
            atom_type: atom_type.into(),
            element: element.into(),
            mass,
        }
    }
}

/// One molecule: atoms, bonds between them (molecule-local indices), and
/// explicitly declared improper torsions.
///
/// Angles and proper torsions are not stored; they are enumerated from bond
/// adjacency by the owning [`Topology`]. Impropers cannot be derived from
/// connectivity alone (which centers carry out-of-plane terms is a typing
/// decision), so they are supplied explicitly by whoever built the molecule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Molecule {
    pub name: String,
    pub atoms: Vec<Atom>,
    pub bonds: Vec<(usize, usize)>,
    pub impropers: Vec<(usize, usize, usize, usize)>,
}

impl Molecule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds an atom and returns its molecule-local index.
    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    /// Adds a bond with its endpoints stored in ascending order.
    pub fn add_bond(&mut self, i: usize, j: usize) {
        if i <= j {
            self.bonds.push((i, j));
        } else {
            self.bonds.push((j, i));
        }
    }

    pub fn add_improper(&mut self, center: usize, p1: usize, p2: usize, p3: usize) {
        self.impropers.push((center, p1, p2, p3));
    }
}

/// A molecular topology: an ordered list of molecules plus optional periodic
/// box vectors.
///
/// The interchange layer treats the topology as a read-only foreign view;
/// nothing downstream of construction mutates atoms or connectivity except
/// [`append_molecules`](Topology::append_molecules), which the combination
/// operator applies to its own private copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    molecules: Vec<Molecule>,
    box_vectors: Option<[[f64; 3]; 3]>,
}

impl Topology {
    /// Builds a topology from molecules, validating connectivity indices.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopology`] if any bond or improper references
    /// an atom index outside its molecule.
    pub fn from_molecules(molecules: Vec<Molecule>) -> Result<Self, Error> {
        for mol in &molecules {
            let n = mol.atoms.len();
            for &(i, j) in &mol.bonds {
                if i >= n || j >= n || i == j {
                    return Err(Error::InvalidTopology(format!(
                        "molecule '{}' has bond ({i}, {j}) outside its {n} atoms",
                        mol.name
                    )));
                }
            }
            for &(c, p1, p2, p3) in &mol.impropers {
                if [c, p1, p2, p3].iter().any(|&idx| idx >= n) {
                    return Err(Error::InvalidTopology(format!(
                        "molecule '{}' has improper ({c}, {p1}, {p2}, {p3}) outside its {n} atoms",
                        mol.name
                    )));
                }
            }
        }
        Ok(Self {
            molecules,
            box_vectors: None,
        })
    }

    pub fn from_molecule(molecule: Molecule) -> Result<Self, Error> {
        Self::from_molecules(vec![molecule])
    }

    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    pub fn box_vectors(&self) -> Option<[[f64; 3]; 3]> {
        self.box_vectors
    }

    pub fn set_box_vectors(&mut self, box_vectors: Option<[[f64; 3]; 3]>) {
        self.box_vectors = box_vectors;
    }

    #[inline]
    pub fn n_atoms(&self) -> usize {
        self.molecules.iter().map(|m| m.atoms.len()).sum()
    }

    /// Iterates all atoms with their global (topology-wide) indices.
    pub fn atoms(&self) -> impl Iterator<Item = (usize, &Atom)> {
        self.molecules
            .iter()
            .flat_map(|m| m.atoms.iter())
            .enumerate()
    }

    /// All bonds as global index pairs, molecule by molecule.
    pub fn bonds(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut offset = 0;
        for mol in &self.molecules {
            for &(i, j) in &mol.bonds {
                out.push((i + offset, j + offset));
            }
            offset += mol.atoms.len();
        }
        out
    }

    /// All angle (three-atom bend) terms as global index triples, enumerated
    /// from bond adjacency around each central atom.
    pub fn angles(&self) -> Vec<(usize, usize, usize)> {
        let mut out = Vec::new();
        let mut offset = 0;
        for mol in &self.molecules {
            let neighbors = adjacency(mol);
            for (j, nbrs) in neighbors.iter().enumerate() {
                for a in 0..nbrs.len() {
                    for b in (a + 1)..nbrs.len() {
                        out.push((nbrs[a] + offset, j + offset, nbrs[b] + offset));
                    }
                }
            }
            offset += mol.atoms.len();
        }
        out
    }

    /// All proper torsion terms as global index quadruples, enumerated once
    /// per central bond.
    pub fn propers(&self) -> Vec<(usize, usize, usize, usize)> {
        let mut out = Vec::new();
        let mut offset = 0;
        for mol in &self.molecules {
            let neighbors = adjacency(mol);
            for &(j, k) in &mol.bonds {
                for &i in &neighbors[j] {
                    if i == k {
                        continue;
                    }
                    for &l in &neighbors[k] {
                        if l == j || l == i {
                            continue;
                        }
                        out.push((i + offset, j + offset, k + offset, l + offset));
                    }
                }
            }
            offset += mol.atoms.len();
        }
        out
    }

    /// All improper torsion terms as global index quadruples, center first.
    pub fn impropers(&self) -> Vec<(usize, usize, usize, usize)> {
        let mut out = Vec::new();
        let mut offset = 0;
        for mol in &self.molecules {
            for &(c, p1, p2, p3) in &mol.impropers {
                out.push((c + offset, p1 + offset, p2 + offset, p3 + offset));
            }
            offset += mol.atoms.len();
        }
        out
    }

    /// Appends clones of another topology's molecules after this one's.
    ///
    /// Box vectors are left untouched; reconciling boxes is the caller's
    /// responsibility.
    pub fn append_molecules(&mut self, other: &Topology) {
        self.molecules.extend(other.molecules.iter().cloned());
    }
}

fn adjacency(mol: &Molecule) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::new(); mol.atoms.len()];
    for &(i, j) in &mol.bonds {
        neighbors[i].push(j);
        neighbors[j].push(i);
    }
    for nbrs in &mut neighbors {
        nbrs.sort_unstable();
    }
    neighbors
}
