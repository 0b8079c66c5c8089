use super::ids::{AtomId, ChainId};
use phf::{Map, phf_map};

/// One-letter codes for residue names commonly found in nucleic-acid chains.
///
/// Covers the standard ribonucleotides, deoxyribonucleotides, and the
/// frequent modified names that annotation tools emit. Anything absent maps
/// to `'X'` via [`Residue::one_letter_code`].
static NUCLEOTIDE_CODES: Map<&'static str, char> = phf_map! {
    "A" => 'A', "C" => 'C', "G" => 'G', "U" => 'U',
    "ADE" => 'A', "CYT" => 'C', "GUA" => 'G', "URA" => 'U', "URI" => 'U',
    "DA" => 'A', "DC" => 'C', "DG" => 'G', "DT" => 'T', "DU" => 'U',
    "THY" => 'T',
    // Common modified ribonucleotides, reported under their parent base.
    "1MA" => 'A', "5MC" => 'C', "OMC" => 'C', "2MG" => 'G', "M2G" => 'G',
    "7MG" => 'G', "OMG" => 'G', "PSU" => 'U', "5MU" => 'U', "4SU" => 'U',
    "H2U" => 'U', "I" => 'G',
};

/// Represents a residue within a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    /// The residue sequence number from the source file.
    pub number: isize,
    /// The insertion code, if any.
    pub insertion_code: Option<char>,
    /// The residue name as read (e.g., "U", "GUA", "HOH").
    pub name: String,
    /// The ID of the parent chain.
    pub chain_id: ChainId,
    /// Ordered list of atom IDs belonging to this residue.
    pub(crate) atoms: Vec<AtomId>,
}

impl Residue {
    pub(crate) fn new(
        number: isize,
        insertion_code: Option<char>,
        name: &str,
        chain_id: ChainId,
    ) -> Self {
        Self {
            number,
            insertion_code,
            name: name.to_string(),
            chain_id,
            atoms: Vec::new(),
        }
    }

    pub fn atoms(&self) -> &[AtomId] {
        &self.atoms
    }

    pub(crate) fn add_atom(&mut self, atom_id: AtomId) {
        self.atoms.push(atom_id);
    }

    /// Returns the one-letter sequence code for this residue.
    ///
    /// Residue names that are not recognized nucleotides yield `'X'`, so a
    /// protein or ligand chain never masquerades as RNA downstream.
    pub fn one_letter_code(&self) -> char {
        NUCLEOTIDE_CODES
            .get(self.name.to_uppercase().as_str())
            .copied()
            .unwrap_or('X')
    }
}
