use super::atom::Atom;
use super::chain::Chain;
use super::ids::{AtomId, ChainId, ResidueId};
use super::residue::Residue;
use nalgebra::Point3;
use slotmap::SlotMap;
use std::collections::HashMap;

/// Represents one parsed structure file as chains of residues of atoms.
///
/// Storage follows the arena pattern: slot maps own the entities, and chains
/// and residues reference their children by ID. Chain insertion order is
/// preserved so serialization round-trips file order.
#[derive(Debug, Clone, Default)]
pub struct StructureModel {
    /// Identifier of the source structure (typically the file stem).
    pub id: String,
    atoms: SlotMap<AtomId, Atom>,
    residues: SlotMap<ResidueId, Residue>,
    chains: SlotMap<ChainId, Chain>,
    chain_order: Vec<ChainId>,
    chain_id_map: HashMap<String, ChainId>,
}

impl StructureModel {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn residue(&self, id: ResidueId) -> Option<&Residue> {
        self.residues.get(id)
    }

    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id)
    }

    pub fn chain_by_name(&self, name: &str) -> Option<ChainId> {
        self.chain_id_map.get(name).copied()
    }

    /// Iterates chains in file order.
    pub fn chains_iter(&self) -> impl Iterator<Item = (ChainId, &Chain)> {
        self.chain_order
            .iter()
            .filter_map(|&id| self.chains.get(id).map(|c| (id, c)))
    }

    pub fn chain_count(&self) -> usize {
        self.chain_order.len()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Builds the one-letter residue sequence of a chain.
    ///
    /// Unrecognized residue names contribute `'X'`.
    pub fn chain_sequence(&self, chain_id: ChainId) -> String {
        let Some(chain) = self.chains.get(chain_id) else {
            return String::new();
        };
        chain
            .residues
            .iter()
            .filter_map(|&rid| self.residues.get(rid))
            .map(|r| r.one_letter_code())
            .collect()
    }

    /// The largest atom serial number in the structure, or 0 when empty.
    pub fn max_atom_serial(&self) -> usize {
        self.atoms.values().map(|a| a.serial).max().unwrap_or(0)
    }

    /// Copies the selected chains into a fresh structure with new arenas.
    ///
    /// The copy renumbers nothing: serials, residue numbers, and chain ids
    /// survive verbatim so the written file stays faithful to its source.
    pub fn extract_chains(&self, selection: &[ChainId]) -> StructureModel {
        let mut out = StructureBuilder::new(&self.id);
        for &chain_id in selection {
            let Some(chain) = self.chains.get(chain_id) else {
                continue;
            };
            out.start_chain(&chain.id);
            for &rid in &chain.residues {
                let Some(residue) = self.residues.get(rid) else {
                    continue;
                };
                out.start_residue(residue.number, residue.insertion_code, &residue.name);
                for &aid in &residue.atoms {
                    if let Some(atom) = self.atoms.get(aid) {
                        out.push_atom(
                            atom.serial,
                            &atom.name,
                            &atom.element,
                            atom.position,
                            atom.occupancy,
                            atom.b_factor,
                            atom.is_hetero,
                        );
                    }
                }
            }
        }
        out.build()
    }
}

/// Incrementally assembles a [`StructureModel`] while a file is parsed.
///
/// Readers call `start_chain`/`start_residue`/`push_atom` in file order; the
/// builder wires up the arena cross-references.
#[derive(Debug)]
pub struct StructureBuilder {
    model: StructureModel,
    current_chain: Option<ChainId>,
    current_residue: Option<ResidueId>,
}

impl StructureBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            model: StructureModel::new(id),
            current_chain: None,
            current_residue: None,
        }
    }

    /// Opens a chain, reusing it if a chain with the same id already exists
    /// (legacy files may interleave HETATM records after a TER).
    pub fn start_chain(&mut self, name: &str) -> ChainId {
        if let Some(&existing) = self.model.chain_id_map.get(name) {
            self.current_chain = Some(existing);
            self.current_residue = None;
            return existing;
        }
        let id = self.model.chains.insert(Chain::new(name));
        self.model.chain_order.push(id);
        self.model.chain_id_map.insert(name.to_string(), id);
        self.current_chain = Some(id);
        self.current_residue = None;
        id
    }

    /// Opens a residue in the current chain. Calling without an open chain
    /// implicitly opens chain `"A"`, matching legacy files with blank ids.
    pub fn start_residue(
        &mut self,
        number: isize,
        insertion_code: Option<char>,
        name: &str,
    ) -> ResidueId {
        let chain_id = match self.current_chain {
            Some(id) => id,
            None => self.start_chain("A"),
        };
        let rid = self
            .model
            .residues
            .insert(Residue::new(number, insertion_code, name, chain_id));
        self.model.chains[chain_id].residues.push(rid);
        self.current_residue = Some(rid);
        rid
    }

    /// True when `(number, insertion_code)` differs from the open residue.
    pub fn residue_boundary(&self, number: isize, insertion_code: Option<char>) -> bool {
        match self.current_residue {
            Some(rid) => {
                let residue = &self.model.residues[rid];
                residue.number != number || residue.insertion_code != insertion_code
            }
            None => true,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push_atom(
        &mut self,
        serial: usize,
        name: &str,
        element: &str,
        position: Point3<f64>,
        occupancy: f64,
        b_factor: f64,
        is_hetero: bool,
    ) -> AtomId {
        let rid = match self.current_residue {
            Some(id) => id,
            None => self.start_residue(1, None, "UNK"),
        };
        let aid = self.model.atoms.insert(Atom {
            serial,
            name: name.to_string(),
            element: element.to_string(),
            residue_id: rid,
            position,
            occupancy,
            b_factor,
            is_hetero,
        });
        self.model.residues[rid].add_atom(aid);
        aid
    }

    pub fn build(self) -> StructureModel {
        self.model
    }
}
