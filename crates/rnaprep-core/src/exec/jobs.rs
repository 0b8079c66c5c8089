use crate::exec::environment::EnvSlot;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The enumerable external annotation tools the runner can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    RnaView,
    Barnaba,
    Bpnet,
    Fr3d,
    X3dna,
    Annotator,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::RnaView,
        ToolKind::Barnaba,
        ToolKind::Bpnet,
        ToolKind::Fr3d,
        ToolKind::X3dna,
        ToolKind::Annotator,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::RnaView => "rnaview",
            ToolKind::Barnaba => "barnaba",
            ToolKind::Bpnet => "bpnet",
            ToolKind::Fr3d => "fr3d",
            ToolKind::X3dna => "x3dna",
            ToolKind::Annotator => "annotator",
        }
    }

    /// The declarative job description for this tool kind.
    pub fn spec(&self) -> ToolJobSpec {
        match self {
            ToolKind::RnaView => ToolJobSpec {
                kind: *self,
                slot: EnvSlot::Annotation,
                workdir: "/home/RNAView/bin",
                binary: "./rnaview",
                command: r#"./rnaview "$file""#,
                input_glob: "/data/staging/*.pdb",
                output_folder: "rnaview-output",
                output_ext: None,
                relocation: RelocationRule::PrefixedSiblings,
            },
            ToolKind::Barnaba => ToolJobSpec {
                kind: *self,
                slot: EnvSlot::Annotation,
                workdir: "/home",
                binary: "./barnaba/bin/barnaba",
                command: r#"./barnaba/bin/barnaba ANNOTATE --pdb "$file""#,
                input_glob: "/data/staging/*.pdb",
                output_folder: "barnaba-output",
                output_ext: None,
                relocation: RelocationRule::FixedOutputs(&[
                    "outfile.ANNOTATE.pairing.out",
                    "outfile.ANNOTATE.stacking.out",
                ]),
            },
            ToolKind::Bpnet => ToolJobSpec {
                kind: *self,
                slot: EnvSlot::Annotation,
                workdir: "/home/bpnet/bin",
                binary: "./bpnet.linux",
                command: r#"./bpnet.linux "$file""#,
                input_glob: "/data/staging/*.pdb",
                output_folder: "bpnet-output",
                output_ext: None,
                relocation: RelocationRule::PrefixedSiblings,
            },
            ToolKind::Fr3d => ToolJobSpec {
                kind: *self,
                slot: EnvSlot::Annotation,
                workdir: "/home/fr3d-python/fr3d/classifiers",
                binary: "NA_pairwise_interactions.py",
                command: r#"python NA_pairwise_interactions.py -o /data/fr3d-output/ "${file%.pdb}.cif""#,
                input_glob: "/data/staging/*.pdb",
                output_folder: "fr3d-output",
                output_ext: None,
                relocation: RelocationRule::CommandPlacesOutputs,
            },
            ToolKind::X3dna => ToolJobSpec {
                kind: *self,
                slot: EnvSlot::Analysis,
                workdir: "/data",
                binary: "find_pair",
                command: r#"find_pair "$file""#,
                input_glob: "/data/staging/*.pdb",
                output_folder: "x3dna-output",
                output_ext: None,
                relocation: RelocationRule::FixedOutputs(&[
                    "bestpairs.pdb",
                    "bp_order.dat",
                    "col_chains.scr",
                    "col_helices.scr",
                    "hel_regions.pdb",
                    "ref_frames.dat",
                ]),
            },
            ToolKind::Annotator => ToolJobSpec {
                kind: *self,
                slot: EnvSlot::Annotation,
                workdir: "/data",
                binary: "annotator",
                command: r#"annotator -e "$file" | sed 's/^[ \t]*//' > "$out""#,
                input_glob: "/data/staging/*.pdb",
                output_folder: "rnapolis-output",
                output_ext: Some("3db"),
                relocation: RelocationRule::CommandPlacesOutputs,
            },
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown tool kind '{0}'")]
pub struct UnknownToolKind(String);

impl FromStr for ToolKind {
    type Err = UnknownToolKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownToolKind(s.to_string()))
    }
}

/// How a tool's byproducts reach its output folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationRule {
    /// The tool drops files next to its input, named with the input's
    /// stem as prefix; everything but the staged inputs themselves is
    /// moved into the output folder.
    PrefixedSiblings,
    /// The tool writes fixed file names into the working directory; each
    /// is moved and renamed `<stem>_<name>` into the output folder.
    FixedOutputs(&'static [&'static str]),
    /// The command template itself places outputs (via `-o ...` or the
    /// provided `$out` variable); nothing to relocate.
    CommandPlacesOutputs,
}

/// Declarative description of one tool job.
///
/// One generic renderer turns this into the in-container command; no tool
/// gets a bespoke script of its own. Re-running a job is idempotent: the
/// same staged inputs produce the same output names, overwritten in place.
#[derive(Debug, Clone)]
pub struct ToolJobSpec {
    pub kind: ToolKind,
    pub slot: EnvSlot,
    /// In-container working directory the command runs from.
    pub workdir: &'static str,
    /// What must exist (relative to `workdir`, or on PATH) for the job to
    /// be dispatched at all.
    pub binary: &'static str,
    /// Per-file invocation template. `$file` is the staged input; `$out`
    /// is defined when `output_ext` is set.
    pub command: &'static str,
    pub input_glob: &'static str,
    /// Output folder name under the shared area root.
    pub output_folder: &'static str,
    /// Extension of `$out`, for tools that write through redirection.
    pub output_ext: Option<&'static str>,
    pub relocation: RelocationRule,
}

impl ToolJobSpec {
    /// Script asserting the working directory and binary exist.
    pub fn render_preflight(&self) -> String {
        format!(
            r#"test -d "{workdir}" && cd "{workdir}" && command -v {binary}"#,
            workdir = self.workdir,
            binary = self.binary,
        )
    }

    /// The generic per-file job loop for this spec.
    pub fn render_script(&self) -> String {
        let mut body = String::new();
        if let Some(ext) = self.output_ext {
            body.push_str(&format!(
                "out=\"/data/{}/${{prefix}}.{}\"; ",
                self.output_folder, ext
            ));
        }
        body.push_str(self.command);
        body.push_str("; ");
        match self.relocation {
            RelocationRule::PrefixedSiblings => {
                body.push_str(&format!(
                    concat!(
                        "for output in \"${{file%/*}}/${{prefix}}\"*; do ",
                        "[ \"$output\" = \"$file\" ] && continue; ",
                        "case \"$output\" in *.pdb|*.cif) continue;; esac; ",
                        "mv \"$output\" \"/data/{out}/$(basename \"$output\")\"; ",
                        "done; "
                    ),
                    out = self.output_folder
                ));
            }
            RelocationRule::FixedOutputs(names) => {
                for name in names {
                    body.push_str(&format!(
                        "[ -f \"{name}\" ] && mv \"{name}\" \"/data/{out}/${{prefix}}_{name}\"; ",
                        name = name,
                        out = self.output_folder
                    ));
                }
            }
            RelocationRule::CommandPlacesOutputs => {}
        }

        format!(
            concat!(
                "mkdir -p /data/{out} && cd {workdir} && ",
                "for file in {glob}; do ",
                "[ -e \"$file\" ] || continue; ",
                "filename=$(basename \"$file\"); ",
                "prefix=\"${{filename%.*}}\"; ",
                "{body}",
                "done"
            ),
            out = self.output_folder,
            workdir = self.workdir,
            glob = self.input_glob,
            body = body,
        )
    }
}
