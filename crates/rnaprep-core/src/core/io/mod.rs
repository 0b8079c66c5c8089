pub mod cif;
pub mod pdb;
pub mod traits;

use crate::core::models::structure::StructureModel;
use cif::CifFile;
use pdb::{MAX_LEGACY_SERIAL, PdbFile};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use traits::StructureFile;

/// The two structure-file encodings the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Fixed-column format with a five-character atom serial field.
    Legacy,
    /// mmCIF-style format without the legacy width limits.
    Modern,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Legacy => "pdb",
            FileFormat::Modern => "cif",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdb" | "ent" => Some(FileFormat::Legacy),
            "cif" | "mmcif" => Some(FileFormat::Modern),
            _ => None,
        }
    }

    /// Classifies which encoding can faithfully carry a structure.
    ///
    /// Legacy is chosen unless some atom serial overflows the fixed-width
    /// legacy field.
    pub fn classify(structure: &StructureModel) -> Self {
        if structure.max_atom_serial() > MAX_LEGACY_SERIAL {
            FileFormat::Modern
        } else {
            FileFormat::Legacy
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Legacy => write!(f, "legacy"),
            FileFormat::Modern => write!(f, "modern"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Pdb(#[from] pdb::PdbError),
    #[error(transparent)]
    Cif(#[from] cif::CifError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Reads a structure, picking the codec from the path extension.
///
/// Files without a recognized extension are tried as legacy first, which
/// matches how bundle files arrive without canonical naming.
pub fn read_structure(path: &Path) -> Result<StructureModel, CodecError> {
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(FileFormat::from_extension)
        .unwrap_or(FileFormat::Legacy);
    match format {
        FileFormat::Legacy => Ok(PdbFile::read_from_path(path)?),
        FileFormat::Modern => Ok(CifFile::read_from_path(path)?),
    }
}

/// Both on-disk encodings of one written structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPair {
    pub legacy_path: PathBuf,
    pub modern_path: PathBuf,
}

/// Serializes a structure to sibling `<base>.pdb` and `<base>.cif` files.
pub fn write_both(structure: &StructureModel, dest_base: &Path) -> Result<WrittenPair, CodecError> {
    let legacy_path = dest_base.with_extension(FileFormat::Legacy.extension());
    let modern_path = dest_base.with_extension(FileFormat::Modern.extension());
    PdbFile::write_to_path(structure, &legacy_path)?;
    CifFile::write_to_path(structure, &modern_path)?;
    Ok(WrittenPair {
        legacy_path,
        modern_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::structure::StructureBuilder;
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn small_model(max_serial: usize) -> StructureModel {
        let mut b = StructureBuilder::new("t");
        b.start_chain("A");
        b.start_residue(1, None, "G");
        b.push_atom(
            max_serial,
            "P",
            "P",
            Point3::new(0.0, 0.0, 0.0),
            1.0,
            0.0,
            false,
        );
        b.build()
    }

    #[test]
    fn classify_uses_the_legacy_serial_boundary() {
        assert_eq!(
            FileFormat::classify(&small_model(99_999)),
            FileFormat::Legacy
        );
        assert_eq!(
            FileFormat::classify(&small_model(100_000)),
            FileFormat::Modern
        );
    }

    #[test]
    fn extension_mapping_is_case_insensitive() {
        assert_eq!(FileFormat::from_extension("PDB"), Some(FileFormat::Legacy));
        assert_eq!(FileFormat::from_extension("cif"), Some(FileFormat::Modern));
        assert_eq!(FileFormat::from_extension("txt"), None);
    }

    #[test]
    fn write_both_emits_sibling_files() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("1abc_A");

        let pair = write_both(&small_model(7), &base).unwrap();

        assert_eq!(pair.legacy_path, dir.path().join("1abc_A.pdb"));
        assert_eq!(pair.modern_path, dir.path().join("1abc_A.cif"));
        assert!(pair.legacy_path.exists());
        assert!(pair.modern_path.exists());

        let legacy = read_structure(&pair.legacy_path).unwrap();
        let modern = read_structure(&pair.modern_path).unwrap();
        assert_eq!(legacy.max_atom_serial(), 7);
        assert_eq!(modern.max_atom_serial(), 7);
    }
}
