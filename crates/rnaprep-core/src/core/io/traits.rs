use crate::core::models::structure::StructureModel;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing structure file formats.
///
/// Implementors handle format-specific parsing and serialization; the
/// provided path helpers wrap buffered file handles around the core
/// reader/writer pair.
pub trait StructureFile {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads a structure from a buffered reader.
    ///
    /// `id` names the resulting [`StructureModel`]; callers pass the file
    /// stem so identity survives the parse.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues.
    fn read_from(id: &str, reader: &mut impl BufRead) -> Result<StructureModel, Self::Error>;

    /// Writes a structure to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or I/O operations encounter
    /// issues.
    fn write_to(structure: &StructureModel, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads a structure from a file path, using the file stem as its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<StructureModel, Self::Error> {
        let path = path.as_ref();
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&id, &mut reader)
    }

    /// Writes a structure to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(
        structure: &StructureModel,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(structure, &mut writer)
    }
}
