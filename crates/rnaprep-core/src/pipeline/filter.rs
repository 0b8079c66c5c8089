use crate::core::io::pdb::PdbFile;
use crate::core::io::traits::StructureFile;
use crate::core::io::{CodecError, WrittenPair, write_both};
use crate::core::models::structure::StructureModel;
use crate::pipeline::error::RowError;
use crate::pipeline::mapping::ChainMapping;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// The chain-id half of a row's filter: a wildcard or an explicit id set.
///
/// Always combined (logical AND) with the RNA predicate; membership here is
/// never sufficient on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFilterSpec {
    Wildcard,
    Ids(BTreeSet<String>),
}

impl ChainFilterSpec {
    /// Parses a manifest `chainSpec`: `"*"` or a `;`-separated id set.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec == "*" {
            return ChainFilterSpec::Wildcard;
        }
        ChainFilterSpec::Ids(
            spec.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn accepts(&self, chain_id: &str) -> bool {
        match self {
            ChainFilterSpec::Wildcard => true,
            ChainFilterSpec::Ids(ids) => ids.contains(chain_id),
        }
    }
}

/// Whether a chain sequence qualifies as RNA.
///
/// Rule: non-empty and drawn entirely from the alphabet {A, C, G, U}.
/// Unrecognized residues surface as 'X' and disqualify the chain.
pub fn is_rna_sequence(sequence: &str) -> bool {
    !sequence.is_empty() && sequence.chars().all(|c| matches!(c, 'A' | 'C' | 'G' | 'U'))
}

/// One exported chain, carrying enough identity to name its output file.
#[derive(Debug, Clone)]
pub struct FilteredStructure {
    pub structure_id: String,
    pub original_chain_id: String,
    /// The bundle-local replacement id, for chains that went through the
    /// splitter. `None` in direct mode.
    pub remapped_chain_id: Option<String>,
    pub model: StructureModel,
}

impl FilteredStructure {
    /// Output base name: `id_originalChainId`, extended with the remapped
    /// id for bundled sources so identity survives the relabeling.
    pub fn base_name(&self) -> String {
        match &self.remapped_chain_id {
            Some(new_id) => format!(
                "{}_{}_{}",
                self.structure_id, self.original_chain_id, new_id
            ),
            None => format!("{}_{}", self.structure_id, self.original_chain_id),
        }
    }
}

/// Direct mode: selects RNA chains straight out of a legacy-format source.
pub fn filter_direct(structure: &StructureModel, spec: &ChainFilterSpec) -> Vec<FilteredStructure> {
    let mut selected = Vec::new();
    for (chain_id, chain) in structure.chains_iter() {
        if !spec.accepts(&chain.id) {
            continue;
        }
        let sequence = structure.chain_sequence(chain_id);
        if !is_rna_sequence(&sequence) {
            debug!(
                "Chain '{}' of '{}' rejected by the RNA predicate (sequence: {})",
                chain.id, structure.id, sequence
            );
            continue;
        }
        selected.push(FilteredStructure {
            structure_id: structure.id.clone(),
            original_chain_id: chain.id.clone(),
            remapped_chain_id: None,
            model: structure.extract_chains(&[chain_id]),
        });
    }
    selected
}

/// Bundled mode: recovers original chain identity through the mapping, then
/// filters each referenced bundle to its own surviving chains.
pub fn filter_bundled(
    bundle_dir: &Path,
    mapping: &ChainMapping,
    spec: &ChainFilterSpec,
) -> Result<Vec<FilteredStructure>, RowError> {
    let wanted = mapping.restrict(|orig| spec.accepts(orig));
    let groups = ChainMapping::group_by_bundle(&wanted);

    let mut selected = Vec::new();
    for (bundle_file, entries) in groups {
        let bundle_path = bundle_dir.join(bundle_file);
        let bundle =
            PdbFile::read_from_path(&bundle_path).map_err(|e| RowError::Load {
                id: mapping.structure_id.clone(),
                path: bundle_path.clone(),
                source: CodecError::Pdb(e),
            })?;

        for entry in entries {
            let Some(chain_id) = bundle.chain_by_name(&entry.new_chain_id) else {
                warn!(
                    "Mapping for '{}' names chain '{}' that bundle '{}' does not contain",
                    mapping.structure_id, entry.new_chain_id, bundle_file
                );
                continue;
            };
            let sequence = bundle.chain_sequence(chain_id);
            if !is_rna_sequence(&sequence) {
                debug!(
                    "Bundled chain '{}' ('{}' originally) of '{}' rejected by the RNA predicate",
                    entry.new_chain_id, entry.original_chain_id, mapping.structure_id
                );
                continue;
            }
            selected.push(FilteredStructure {
                structure_id: mapping.structure_id.clone(),
                original_chain_id: entry.original_chain_id.clone(),
                remapped_chain_id: Some(entry.new_chain_id.clone()),
                model: bundle.extract_chains(&[chain_id]),
            });
        }
    }
    Ok(selected)
}

/// Serializes one filtered chain to sibling legacy + modern files.
pub fn write_filtered(
    staging_dir: &Path,
    filtered: &FilteredStructure,
) -> Result<WrittenPair, RowError> {
    let base = staging_dir.join(filtered.base_name());
    write_both(&filtered.model, &base).map_err(|source| RowError::Write {
        id: filtered.structure_id.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::structure::StructureBuilder;
    use crate::pipeline::mapping::MappingEntry;
    use nalgebra::Point3;
    use std::fs;
    use tempfile::tempdir;

    fn model_with(chains: &[(&str, &[&str])]) -> StructureModel {
        let mut b = StructureBuilder::new("1abc");
        let mut serial = 0;
        for (chain, residues) in chains {
            b.start_chain(chain);
            for (i, res) in residues.iter().enumerate() {
                b.start_residue(i as isize + 1, None, res);
                serial += 1;
                b.push_atom(
                    serial,
                    "P",
                    "P",
                    Point3::new(serial as f64, 0.0, 0.0),
                    1.0,
                    0.0,
                    false,
                );
            }
        }
        b.build()
    }

    #[test]
    fn spec_parsing_distinguishes_wildcard_and_id_sets() {
        assert_eq!(ChainFilterSpec::parse("*"), ChainFilterSpec::Wildcard);

        let spec = ChainFilterSpec::parse("A; B;C");
        assert!(spec.accepts("A"));
        assert!(spec.accepts("B"));
        assert!(spec.accepts("C"));
        assert!(!spec.accepts("D"));
    }

    #[test]
    fn rna_predicate_requires_the_exact_alphabet() {
        assert!(is_rna_sequence("ACGU"));
        assert!(is_rna_sequence("GGGG"));
        assert!(!is_rna_sequence(""));
        assert!(!is_rna_sequence("ACGT")); // DNA thymine
        assert!(!is_rna_sequence("ACGX")); // unknown residue
    }

    #[test]
    fn wildcard_accepts_every_rna_chain_and_nothing_else() {
        let model = model_with(&[
            ("A", &["G", "U", "A"]),
            ("B", &["G", "C"]),
            ("W", &["HOH"]),
            ("D", &["DA", "DT"]),
        ]);

        let out = filter_direct(&model, &ChainFilterSpec::Wildcard);

        let ids: Vec<&str> = out.iter().map(|f| f.original_chain_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(out.iter().all(|f| f.remapped_chain_id.is_none()));
    }

    #[test]
    fn explicit_spec_never_emits_unlisted_chains() {
        let model = model_with(&[
            ("A", &["G", "U"]),
            ("B", &["A", "C"]),
            ("C", &["G", "G"]),
        ]);
        let spec = ChainFilterSpec::parse("A;B");

        let out = filter_direct(&model, &spec);

        let ids: Vec<&str> = out.iter().map(|f| f.original_chain_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn direct_base_names_encode_id_and_chain() {
        let model = model_with(&[("A", &["G", "U"])]);
        let out = filter_direct(&model, &ChainFilterSpec::Wildcard);
        assert_eq!(out[0].base_name(), "1abc_A");
    }

    fn write_bundle(dir: &Path, name: &str, chains: &[(&str, &[&str])]) {
        let mut b = StructureBuilder::new("bundle");
        let mut serial = 0;
        for (chain, residues) in chains {
            b.start_chain(chain);
            for (i, res) in residues.iter().enumerate() {
                b.start_residue(i as isize + 1, None, res);
                serial += 1;
                b.push_atom(
                    serial,
                    "P",
                    "P",
                    Point3::new(serial as f64, 0.0, 0.0),
                    1.0,
                    0.0,
                    false,
                );
            }
        }
        let model = b.build();
        let mut buf = Vec::new();
        PdbFile::write_to(&model, &mut buf).unwrap();
        fs::write(dir.join(name), buf).unwrap();
    }

    fn bundle_mapping() -> ChainMapping {
        ChainMapping {
            structure_id: "9xyz".into(),
            entries: vec![
                MappingEntry {
                    bundle_file: "9xyz-bundle1.pdb".into(),
                    new_chain_id: "A".into(),
                    original_chain_id: "A0".into(),
                },
                MappingEntry {
                    bundle_file: "9xyz-bundle1.pdb".into(),
                    new_chain_id: "B".into(),
                    original_chain_id: "B5".into(),
                },
                MappingEntry {
                    bundle_file: "9xyz-bundle2.pdb".into(),
                    new_chain_id: "A".into(),
                    original_chain_id: "C2".into(),
                },
            ],
        }
    }

    #[test]
    fn bundled_mode_recovers_original_ids_and_groups_by_bundle() {
        let dir = tempdir().unwrap();
        write_bundle(
            dir.path(),
            "9xyz-bundle1.pdb",
            &[("A", &["G", "U"]), ("B", &["C", "C"])],
        );
        write_bundle(dir.path(), "9xyz-bundle2.pdb", &[("A", &["A", "U"])]);

        let out = filter_bundled(dir.path(), &bundle_mapping(), &ChainFilterSpec::Wildcard)
            .unwrap();

        let mut originals: Vec<&str> =
            out.iter().map(|f| f.original_chain_id.as_str()).collect();
        originals.sort_unstable();
        assert_eq!(originals, vec!["A0", "B5", "C2"]);
        assert!(out.iter().all(|f| f.remapped_chain_id.is_some()));
    }

    #[test]
    fn bundled_mode_intersects_with_the_requested_spec() {
        let dir = tempdir().unwrap();
        write_bundle(
            dir.path(),
            "9xyz-bundle1.pdb",
            &[("A", &["G", "U"]), ("B", &["C", "C"])],
        );
        // bundle2 is never opened: no surviving entry references it.

        let spec = ChainFilterSpec::parse("A0");
        let out = filter_bundled(dir.path(), &bundle_mapping(), &spec).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].original_chain_id, "A0");
        assert_eq!(out[0].remapped_chain_id.as_deref(), Some("A"));
        assert_eq!(out[0].base_name(), "9xyz_A0_A");
    }

    #[test]
    fn bundled_mode_applies_the_rna_predicate_per_chain() {
        let dir = tempdir().unwrap();
        write_bundle(
            dir.path(),
            "9xyz-bundle1.pdb",
            &[("A", &["G", "U"]), ("B", &["HOH"])],
        );
        write_bundle(dir.path(), "9xyz-bundle2.pdb", &[("A", &["A", "U"])]);

        let out = filter_bundled(dir.path(), &bundle_mapping(), &ChainFilterSpec::Wildcard)
            .unwrap();

        let mut originals: Vec<&str> =
            out.iter().map(|f| f.original_chain_id.as_str()).collect();
        originals.sort_unstable();
        assert_eq!(originals, vec!["A0", "C2"]);
    }

    #[test]
    fn write_filtered_emits_both_encodings_under_the_base_name() {
        let dir = tempdir().unwrap();
        let model = model_with(&[("A", &["G", "U"])]);
        let filtered = &filter_direct(&model, &ChainFilterSpec::Wildcard)[0];

        let pair = write_filtered(dir.path(), filtered).unwrap();

        assert_eq!(pair.legacy_path, dir.path().join("1abc_A.pdb"));
        assert_eq!(pair.modern_path, dir.path().join("1abc_A.cif"));
        assert!(pair.legacy_path.is_file());
        assert!(pair.modern_path.is_file());
    }
}
