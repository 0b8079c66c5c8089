pub mod atom;
pub mod chain;
pub mod ids;
pub mod residue;
pub mod structure;
