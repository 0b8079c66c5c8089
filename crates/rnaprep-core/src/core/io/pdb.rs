use crate::core::io::traits::StructureFile;
use crate::core::models::structure::{StructureBuilder, StructureModel};
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// The largest atom serial the fixed five-column legacy field can carry.
pub const MAX_LEGACY_SERIAL: usize = 99999;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: PdbParseErrorKind,
    },
    #[error("No ATOM or HETATM records found")]
    Empty,
    #[error("Atom serial {serial} exceeds the legacy field width ({MAX_LEGACY_SERIAL})")]
    SerialOverflow { serial: usize },
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Line is too short for an ATOM/HETATM record")]
    LineTooShort,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

/// Legacy fixed-column structure format.
///
/// The reader keeps the first model of multi-model files and tolerates
/// missing occupancy/B-factor columns; the writer refuses serials the
/// five-character field cannot represent.
pub struct PdbFile;

impl StructureFile for PdbFile {
    type Error = PdbError;

    fn read_from(id: &str, reader: &mut impl BufRead) -> Result<StructureModel, Self::Error> {
        let mut builder = StructureBuilder::new(id);
        let mut current_chain: Option<String> = None;
        let mut saw_model = false;
        let mut atom_seen = false;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;

            if line.starts_with("ENDMDL") {
                break; // first model only
            }
            if line.starts_with("MODEL") {
                if saw_model {
                    break;
                }
                saw_model = true;
                continue;
            }

            let is_atom = line.starts_with("ATOM  ");
            let is_hetatm = line.starts_with("HETATM");
            if !is_atom && !is_hetatm {
                continue;
            }
            if line.len() < 54 {
                return Err(PdbError::Parse {
                    line: line_num,
                    kind: PdbParseErrorKind::LineTooShort,
                });
            }

            let serial_str = slice_and_trim(&line, 6, 11);
            let name = slice_and_trim(&line, 12, 16);
            let res_name = slice_and_trim(&line, 17, 20);
            let chain_str = slice_and_trim(&line, 21, 22);
            let res_seq_str = slice_and_trim(&line, 22, 26);
            let i_code = line.chars().nth(26).filter(|c| !c.is_whitespace());
            let x_str = slice_and_trim(&line, 30, 38);
            let y_str = slice_and_trim(&line, 38, 46);
            let z_str = slice_and_trim(&line, 46, 54);
            let occupancy = slice_and_trim(&line, 54, 60).parse::<f64>().unwrap_or(1.0);
            let b_factor = slice_and_trim(&line, 60, 66).parse::<f64>().unwrap_or(0.0);
            let element = slice_and_trim(&line, 76, 78);

            let serial: usize = serial_str.parse().map_err(|_| PdbError::Parse {
                line: line_num,
                kind: PdbParseErrorKind::InvalidInt {
                    columns: "7-11".into(),
                    value: serial_str.into(),
                },
            })?;
            let res_seq: isize = res_seq_str.parse().map_err(|_| PdbError::Parse {
                line: line_num,
                kind: PdbParseErrorKind::InvalidInt {
                    columns: "23-26".into(),
                    value: res_seq_str.into(),
                },
            })?;
            let parse_coord = |s: &str, columns: &str| -> Result<f64, PdbError> {
                s.parse().map_err(|_| PdbError::Parse {
                    line: line_num,
                    kind: PdbParseErrorKind::InvalidFloat {
                        columns: columns.into(),
                        value: s.into(),
                    },
                })
            };
            let x = parse_coord(x_str, "31-38")?;
            let y = parse_coord(y_str, "39-46")?;
            let z = parse_coord(z_str, "47-54")?;

            let chain_name = if chain_str.is_empty() { "A" } else { chain_str };
            if current_chain.as_deref() != Some(chain_name) {
                builder.start_chain(chain_name);
                current_chain = Some(chain_name.to_string());
            }
            if builder.residue_boundary(res_seq, i_code) {
                builder.start_residue(res_seq, i_code, res_name);
            }
            builder.push_atom(
                serial,
                name,
                element,
                Point3::new(x, y, z),
                occupancy,
                b_factor,
                is_hetatm,
            );
            atom_seen = true;
        }

        if !atom_seen {
            return Err(PdbError::Empty);
        }
        Ok(builder.build())
    }

    fn write_to(structure: &StructureModel, writer: &mut impl Write) -> Result<(), Self::Error> {
        for (_, chain) in structure.chains_iter() {
            let chain_char = chain.id.chars().next().unwrap_or(' ');
            let mut last_polymer: Option<(String, isize, Option<char>)> = None;
            let mut last_serial = 0usize;

            for &rid in chain.residues() {
                let Some(residue) = structure.residue(rid) else {
                    continue;
                };
                for &aid in residue.atoms() {
                    let Some(atom) = structure.atom(aid) else {
                        continue;
                    };
                    if atom.serial > MAX_LEGACY_SERIAL {
                        return Err(PdbError::SerialOverflow {
                            serial: atom.serial,
                        });
                    }
                    let record = if atom.is_hetero { "HETATM" } else { "ATOM  " };
                    let name = if atom.name.len() >= 4 {
                        format!("{:<4}", &atom.name[0..4])
                    } else {
                        format!(" {:<3}", atom.name)
                    };
                    writeln!(
                        writer,
                        "{}{:5} {}{:1}{:>3} {:1}{:4}{:1}   {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}          {:>2}",
                        record,
                        atom.serial,
                        name,
                        ' ',
                        truncate(&residue.name, 3),
                        chain_char,
                        residue.number % 10000,
                        residue.insertion_code.unwrap_or(' '),
                        atom.position.x,
                        atom.position.y,
                        atom.position.z,
                        atom.occupancy,
                        atom.b_factor,
                        atom.element.to_uppercase(),
                    )?;
                    last_serial = atom.serial;
                    if !atom.is_hetero {
                        last_polymer = Some((
                            residue.name.clone(),
                            residue.number,
                            residue.insertion_code,
                        ));
                    }
                }
            }

            if let Some((res_name, number, i_code)) = last_polymer {
                writeln!(
                    writer,
                    "TER   {:5}      {:>3} {:1}{:4}{:1}",
                    (last_serial + 1).min(MAX_LEGACY_SERIAL),
                    truncate(&res_name, 3),
                    chain_char,
                    number % 10000,
                    i_code.unwrap_or(' '),
                )?;
            }
        }
        writeln!(writer, "END   ")?;
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() > max { &s[0..max] } else { s }
}
