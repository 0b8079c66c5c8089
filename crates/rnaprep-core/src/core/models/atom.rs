use super::ids::ResidueId;
use nalgebra::Point3;

/// Represents an atom record read from a structure file.
///
/// Only the fields needed for chain selection and round-trip serialization
/// are retained; force-field properties are out of scope for this library.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The serial number as it appeared in the source file.
    ///
    /// Legacy-format files cannot represent serials above 99999; this field
    /// drives format classification.
    pub serial: usize,
    /// The name of the atom (e.g., "P", "C1'", "N9").
    pub name: String,
    /// The element symbol (e.g., "C", "N", "P").
    pub element: String,
    /// The ID of the parent residue this atom belongs to.
    pub residue_id: ResidueId,
    /// The 3D coordinates of the atom in Angstroms.
    pub position: Point3<f64>,
    /// Crystallographic occupancy.
    pub occupancy: f64,
    /// Isotropic temperature factor.
    pub b_factor: f64,
    /// Whether the source record was HETATM rather than ATOM.
    pub is_hetero: bool,
}
