use crate::core::io::traits::StructureFile;
use crate::core::models::structure::{StructureBuilder, StructureModel};
use nalgebra::Point3;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CifError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("No _atom_site loop found")]
    Empty,
}

/// Column positions of the `_atom_site` items this reader consumes.
///
/// mmCIF loops declare their own column order, so every index is resolved
/// from the header block; `auth_*` items win over `label_*` when both exist.
#[derive(Default)]
struct AtomSiteIndices {
    group_pdb: Option<usize>,
    id: Option<usize>,
    type_symbol: Option<usize>,
    atom_id: Option<usize>,
    comp_id: Option<usize>,
    asym_id: Option<usize>,
    seq_id: Option<usize>,
    ins_code: Option<usize>,
    cartn_x: Option<usize>,
    cartn_y: Option<usize>,
    cartn_z: Option<usize>,
    occupancy: Option<usize>,
    b_iso: Option<usize>,
    model_num: Option<usize>,
}

impl AtomSiteIndices {
    fn from_headers(headers: &[String]) -> Self {
        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            if let Some(item) = h.strip_prefix("_atom_site.") {
                by_name.insert(item, i);
            }
        }
        let pick = |auth: &str, label: &str| {
            by_name.get(auth).or_else(|| by_name.get(label)).copied()
        };
        Self {
            group_pdb: by_name.get("group_PDB").copied(),
            id: by_name.get("id").copied(),
            type_symbol: by_name.get("type_symbol").copied(),
            atom_id: pick("auth_atom_id", "label_atom_id"),
            comp_id: pick("auth_comp_id", "label_comp_id"),
            asym_id: pick("auth_asym_id", "label_asym_id"),
            seq_id: pick("auth_seq_id", "label_seq_id"),
            ins_code: by_name.get("pdbx_PDB_ins_code").copied(),
            cartn_x: by_name.get("Cartn_x").copied(),
            cartn_y: by_name.get("Cartn_y").copied(),
            cartn_z: by_name.get("Cartn_z").copied(),
            occupancy: by_name.get("occupancy").copied(),
            b_iso: by_name.get("B_iso_or_equiv").copied(),
            model_num: by_name.get("pdbx_PDB_model_num").copied(),
        }
    }
}

enum ParserState {
    Base,
    InLoopHeader,
    InAtomSiteLoop,
    InOtherLoop,
}

/// Splits an mmCIF data line into tokens, honoring single and double quotes.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote: Option<char> = None;

    for c in line.chars() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                    tokens.push(std::mem::take(&mut current));
                } else {
                    current.push(c);
                }
            }
            None => {
                if (c == '\'' || c == '"') && current.is_empty() {
                    in_quote = Some(c);
                } else if c.is_whitespace() {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(c);
                }
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// `.` and `?` mark absent values in mmCIF.
fn present(value: Option<&String>) -> Option<&str> {
    value
        .map(|s| s.as_str())
        .filter(|s| *s != "." && *s != "?")
}

/// Modern-format structure file (`_atom_site` loop subset).
pub struct CifFile;

impl StructureFile for CifFile {
    type Error = CifError;

    fn read_from(id: &str, reader: &mut impl BufRead) -> Result<StructureModel, Self::Error> {
        let mut builder = StructureBuilder::new(id);
        let mut state = ParserState::Base;
        let mut headers: Vec<String> = Vec::new();
        let mut indices = AtomSiteIndices::default();
        let mut current_chain: Option<String> = None;
        let mut first_model: Option<String> = None;
        let mut atom_seen = false;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let tokens = tokenize(trimmed);
            if tokens.is_empty() {
                continue;
            }

            if tokens[0] == "loop_" {
                state = ParserState::InLoopHeader;
                headers.clear();
                continue;
            }

            match state {
                ParserState::Base => {}
                ParserState::InLoopHeader => {
                    if tokens[0].starts_with('_') {
                        headers.push(tokens[0].clone());
                    } else if headers.iter().any(|h| h.starts_with("_atom_site.")) {
                        indices = AtomSiteIndices::from_headers(&headers);
                        state = ParserState::InAtomSiteLoop;
                        Self::consume_row(
                            &tokens,
                            line_num,
                            &indices,
                            &mut builder,
                            &mut current_chain,
                            &mut first_model,
                            &mut atom_seen,
                        )?;
                    } else {
                        state = ParserState::InOtherLoop;
                    }
                }
                ParserState::InAtomSiteLoop => {
                    if tokens[0].starts_with('_') {
                        state = ParserState::Base;
                    } else {
                        Self::consume_row(
                            &tokens,
                            line_num,
                            &indices,
                            &mut builder,
                            &mut current_chain,
                            &mut first_model,
                            &mut atom_seen,
                        )?;
                    }
                }
                ParserState::InOtherLoop => {
                    if tokens[0].starts_with('_') {
                        state = ParserState::Base;
                    }
                }
            }
        }

        if !atom_seen {
            return Err(CifError::Empty);
        }
        Ok(builder.build())
    }

    fn write_to(structure: &StructureModel, writer: &mut impl Write) -> Result<(), Self::Error> {
        writeln!(writer, "data_{}", structure.id)?;
        writeln!(writer, "#")?;
        writeln!(writer, "loop_")?;
        for item in [
            "group_PDB",
            "id",
            "type_symbol",
            "label_atom_id",
            "label_comp_id",
            "label_asym_id",
            "label_seq_id",
            "pdbx_PDB_ins_code",
            "Cartn_x",
            "Cartn_y",
            "Cartn_z",
            "occupancy",
            "B_iso_or_equiv",
            "auth_seq_id",
            "auth_asym_id",
            "pdbx_PDB_model_num",
        ] {
            writeln!(writer, "_atom_site.{item}")?;
        }

        for (_, chain) in structure.chains_iter() {
            for &rid in chain.residues() {
                let Some(residue) = structure.residue(rid) else {
                    continue;
                };
                for &aid in residue.atoms() {
                    let Some(atom) = structure.atom(aid) else {
                        continue;
                    };
                    writeln!(
                        writer,
                        "{} {} {} {} {} {} {} {} {:.3} {:.3} {:.3} {:.2} {:.2} {} {} 1",
                        if atom.is_hetero { "HETATM" } else { "ATOM" },
                        atom.serial,
                        quote_if_needed(&atom.element.to_uppercase()),
                        quote_if_needed(&atom.name),
                        quote_if_needed(&residue.name),
                        quote_if_needed(&chain.id),
                        residue.number,
                        residue
                            .insertion_code
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| ".".to_string()),
                        atom.position.x,
                        atom.position.y,
                        atom.position.z,
                        atom.occupancy,
                        atom.b_factor,
                        residue.number,
                        quote_if_needed(&chain.id),
                    )?;
                }
            }
        }
        writeln!(writer, "#")?;
        Ok(())
    }
}

impl CifFile {
    #[allow(clippy::too_many_arguments)]
    fn consume_row(
        tokens: &[String],
        line_num: usize,
        indices: &AtomSiteIndices,
        builder: &mut StructureBuilder,
        current_chain: &mut Option<String>,
        first_model: &mut Option<String>,
        atom_seen: &mut bool,
    ) -> Result<(), CifError> {
        // Skip rows outside the first model.
        if let Some(model) = indices.model_num.and_then(|i| present(tokens.get(i))) {
            match first_model {
                Some(first) if first.as_str() != model => return Ok(()),
                Some(_) => {}
                None => *first_model = Some(model.to_string()),
            }
        }

        let field = |idx: Option<usize>| indices_field(tokens, idx);
        let required = |idx: Option<usize>, item: &str| {
            field(idx).ok_or_else(|| CifError::Parse {
                line: line_num,
                message: format!("missing _atom_site.{item}"),
            })
        };

        let serial_str = required(indices.id, "id")?;
        let serial: usize = serial_str.parse().map_err(|_| CifError::Parse {
            line: line_num,
            message: format!("invalid atom id '{serial_str}'"),
        })?;
        let name = required(indices.atom_id, "label_atom_id")?;
        let comp = required(indices.comp_id, "label_comp_id")?;
        let asym = required(indices.asym_id, "label_asym_id")?;
        let seq: isize = field(indices.seq_id)
            .map(|s| {
                s.parse().map_err(|_| CifError::Parse {
                    line: line_num,
                    message: format!("invalid seq id '{s}'"),
                })
            })
            .transpose()?
            .unwrap_or(1);
        let ins_code = field(indices.ins_code).and_then(|s| s.chars().next());
        let parse_float = |idx: Option<usize>, item: &str| -> Result<f64, CifError> {
            let s = required(idx, item)?;
            s.parse().map_err(|_| CifError::Parse {
                line: line_num,
                message: format!("invalid {item} '{s}'"),
            })
        };
        let x = parse_float(indices.cartn_x, "Cartn_x")?;
        let y = parse_float(indices.cartn_y, "Cartn_y")?;
        let z = parse_float(indices.cartn_z, "Cartn_z")?;
        let occupancy = field(indices.occupancy)
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let b_factor = field(indices.b_iso)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let element = field(indices.type_symbol).unwrap_or("");
        let is_hetero = field(indices.group_pdb) == Some("HETATM");

        if current_chain.as_deref() != Some(asym) {
            builder.start_chain(asym);
            *current_chain = Some(asym.to_string());
        }
        if builder.residue_boundary(seq, ins_code) {
            builder.start_residue(seq, ins_code, comp);
        }
        builder.push_atom(
            serial,
            name,
            element,
            Point3::new(x, y, z),
            occupancy,
            b_factor,
            is_hetero,
        );
        *atom_seen = true;
        Ok(())
    }
}

fn indices_field(tokens: &[String], idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| present(tokens.get(i)))
}

fn quote_if_needed(s: &str) -> String {
    if s.is_empty() {
        ".".to_string()
    } else if s.contains(' ') || s.contains('\'') {
        format!("\"{s}\"")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_CIF: &str = "\
data_9XYZ
#
loop_
_atom_site.group_PDB
_atom_site.id
_atom_site.type_symbol
_atom_site.label_atom_id
_atom_site.label_comp_id
_atom_site.label_asym_id
_atom_site.label_seq_id
_atom_site.Cartn_x
_atom_site.Cartn_y
_atom_site.Cartn_z
_atom_site.occupancy
_atom_site.B_iso_or_equiv
_atom_site.auth_seq_id
_atom_site.auth_asym_id
_atom_site.pdbx_PDB_model_num
ATOM 1 P P G AA 1 10.000 11.000 12.000 1.00 0.50 1 AA 1
ATOM 2 C \"C1'\" G AA 1 10.500 11.500 12.500 1.00 0.50 1 AA 1
ATOM 100001 P P U AA 2 11.000 12.000 13.000 1.00 0.50 2 AA 1
HETATM 100002 O O HOH BB 1 20.000 21.000 22.000 1.00 0.00 1 BB 1
#
";

    #[test]
    fn reads_multi_character_chain_ids() {
        let model = CifFile::read_from("9xyz", &mut MINIMAL_CIF.as_bytes()).unwrap();

        assert_eq!(model.chain_count(), 2);
        let aa = model.chain_by_name("AA").unwrap();
        assert_eq!(model.chain_sequence(aa), "GU");
        assert_eq!(model.max_atom_serial(), 100_002);
    }

    #[test]
    fn quoted_atom_names_survive_tokenization() {
        let model = CifFile::read_from("9xyz", &mut MINIMAL_CIF.as_bytes()).unwrap();
        let aa = model.chain_by_name("AA").unwrap();
        let chain = model.chain(aa).unwrap();
        let first_res = model.residue(chain.residues()[0]).unwrap();
        let names: Vec<&str> = first_res
            .atoms()
            .iter()
            .map(|&aid| model.atom(aid).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["P", "C1'"]);
    }

    #[test]
    fn rows_from_later_models_are_skipped() {
        let multi = format!(
            "{}ATOM 200000 P P C AA 3 1.0 1.0 1.0 1.00 0.00 3 AA 2\n",
            MINIMAL_CIF.trim_end_matches("#\n")
        );
        let model = CifFile::read_from("9xyz", &mut multi.as_bytes()).unwrap();
        let aa = model.chain_by_name("AA").unwrap();
        assert_eq!(model.chain_sequence(aa), "GU");
    }

    #[test]
    fn missing_atom_site_loop_is_an_error() {
        let err = CifFile::read_from("x", &mut "data_x\n#\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CifError::Empty));
    }

    #[test]
    fn write_read_round_trip_preserves_chains_and_serials() {
        let model = CifFile::read_from("9xyz", &mut MINIMAL_CIF.as_bytes()).unwrap();

        let mut buf = Vec::new();
        CifFile::write_to(&model, &mut buf).unwrap();
        let reparsed = CifFile::read_from("9xyz", &mut buf.as_slice()).unwrap();

        assert_eq!(reparsed.chain_count(), 2);
        let aa = reparsed.chain_by_name("AA").unwrap();
        assert_eq!(reparsed.chain_sequence(aa), "GU");
        assert_eq!(reparsed.max_atom_serial(), 100_002);
    }
}
