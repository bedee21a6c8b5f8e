use std::fmt;

/// The closed set of units molecular-mechanics parameters carry.
///
/// This is a tag, not a conversion system: quantities with different units
/// never compare equal and no arithmetic across units is provided. Unit
/// conversion is the responsibility of the adapters on either side of the
/// interchange boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Nanometer,
    KjPerMol,
    KjPerMolPerNm2,
    KjPerMolPerRad2,
    ElementaryCharge,
    Degree,
    Radian,
    Amu,
    Dimensionless,
}

impl Unit {
    /// Short symbol used in display output and export comments.
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Nanometer => "nm",
            Unit::KjPerMol => "kJ/mol",
            Unit::KjPerMolPerNm2 => "kJ/(mol nm^2)",
            Unit::KjPerMolPerRad2 => "kJ/(mol rad^2)",
            Unit::ElementaryCharge => "e",
            Unit::Degree => "deg",
            Unit::Radian => "rad",
            Unit::Amu => "amu",
            Unit::Dimensionless => "",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A scalar physical quantity: a value tagged with a [`Unit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn nanometers(value: f64) -> Self {
        Self::new(value, Unit::Nanometer)
    }

    pub fn kj_per_mol(value: f64) -> Self {
        Self::new(value, Unit::KjPerMol)
    }

    pub fn kj_per_mol_per_nm2(value: f64) -> Self {
        Self::new(value, Unit::KjPerMolPerNm2)
    }

    pub fn kj_per_mol_per_rad2(value: f64) -> Self {
        Self::new(value, Unit::KjPerMolPerRad2)
    }

    pub fn elementary_charge(value: f64) -> Self {
        Self::new(value, Unit::ElementaryCharge)
    }

    pub fn degrees(value: f64) -> Self {
        Self::new(value, Unit::Degree)
    }

    pub fn amu(value: f64) -> Self {
        Self::new(value, Unit::Amu)
    }

    pub fn dimensionless(value: f64) -> Self {
        Self::new(value, Unit::Dimensionless)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == Unit::Dimensionless {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}
