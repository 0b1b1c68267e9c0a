//! In-memory GMTK parameter specification ("input master")
//!
//! A specification is a list of sections, one per object kind, each holding named entries in
//! declaration order. Entries refer to each other by name. A `ModelSpec` can only be obtained
//! through `ModelSpecBuilder::build`, which validates all cross-references and probability
//! invariants, and it can't be modified afterwards.
//!

mod builder;
mod decision_tree;
mod validate;

use std::fmt;

use strum::{EnumCount, EnumIter, EnumString, IntoStaticStr};

pub use self::builder::ModelSpecBuilder;
pub use self::decision_tree::{DecisionNode, DecisionTree, Expr, Leaf};
pub use self::validate::SpecError;

/// Object kinds, in the order their sections are written
#[derive(
    Clone,
    Copy,
    Debug,
    EnumCount,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    IntoStaticStr,
    Ord,
    PartialEq,
    PartialOrd,
)]
pub enum SectionKind {
    #[strum(serialize = "DT")]
    DecisionTree,
    #[strum(serialize = "NAME_COLLECTION")]
    NameCollection,
    #[strum(serialize = "DETERMINISTIC_CPT")]
    DeterministicCpt,
    #[strum(serialize = "DENSE_CPT")]
    DenseCpt,
    #[strum(serialize = "MEAN")]
    Mean,
    #[strum(serialize = "COVAR")]
    Covar,
    #[strum(serialize = "DPMF")]
    Dpmf,
    #[strum(serialize = "MC")]
    MixtureComponent,
    #[strum(serialize = "MX")]
    Mixture,
}

impl SectionKind {
    /// The literal tag used for this kind in the parameter file
    pub fn tag(&self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Variable cardinality, either as a literal count or as a symbol defined in the auxiliary
/// include file
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Cardinality {
    Symbol(String),
    Literal(usize),
}

impl Cardinality {
    pub fn symbol(name: &str) -> Self {
        Self::Symbol(name.to_string())
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(x) => write!(f, "{x}"),
            Self::Literal(x) => write!(f, "{x}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NameCollection {
    pub names: Vec<String>,
}

impl NameCollection {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

/// How a deterministic CPT computes its child value
#[derive(Clone, Debug, PartialEq)]
pub enum CptMapping {
    /// Named decision tree from the DT section
    DecisionTree(String),

    /// GMTK built-in rule copying the single parent's value
    CopyParent,
}

impl fmt::Display for CptMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecisionTree(x) => write!(f, "{x}"),
            Self::CopyParent => write!(f, "internal:copyParent"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeterministicCpt {
    pub parent_cards: Vec<Cardinality>,
    pub child_card: Cardinality,
    pub mapping: CptMapping,
}

impl DeterministicCpt {
    pub fn from_tree(parent_cards: Vec<Cardinality>, child_card: Cardinality, tree: &str) -> Self {
        Self {
            parent_cards,
            child_card,
            mapping: CptMapping::DecisionTree(tree.to_string()),
        }
    }

    pub fn copy_parent(card: Cardinality) -> Self {
        Self {
            parent_cards: vec![card.clone()],
            child_card: card,
            mapping: CptMapping::CopyParent,
        }
    }
}

/// Nested array of probabilities, where each innermost row is a distribution over the child
/// variable
#[derive(Clone, Debug, PartialEq)]
pub enum ProbTable {
    Row(Vec<f64>),
    Nested(Vec<ProbTable>),
}

impl ProbTable {
    /// Table dimensions from the outermost to the innermost level
    ///
    /// Returns None for a ragged table.
    ///
    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            Self::Row(x) => Some(vec![x.len()]),
            Self::Nested(x) => {
                let mut child_shapes = x.iter().map(|t| t.shape());
                let first = match child_shapes.next() {
                    Some(shape) => shape?,
                    None => Vec::new(),
                };
                for shape in child_shapes {
                    if shape? != first {
                        return None;
                    }
                }
                let mut shape = vec![x.len()];
                shape.extend(first);
                Some(shape)
            }
        }
    }

    /// All innermost rows in row-major order
    pub fn rows(&self) -> Vec<&[f64]> {
        match self {
            Self::Row(x) => vec![x.as_slice()],
            Self::Nested(x) => x.iter().flat_map(|t| t.rows()).collect(),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows().into_iter().flatten().copied().collect()
    }
}

impl From<Vec<f64>> for ProbTable {
    fn from(x: Vec<f64>) -> Self {
        Self::Row(x)
    }
}

impl From<Vec<Vec<f64>>> for ProbTable {
    fn from(x: Vec<Vec<f64>>) -> Self {
        Self::Nested(x.into_iter().map(Self::from).collect())
    }
}

impl From<Vec<Vec<Vec<f64>>>> for ProbTable {
    fn from(x: Vec<Vec<Vec<f64>>>) -> Self {
        Self::Nested(x.into_iter().map(Self::from).collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DenseCpt {
    pub parent_cards: Vec<Cardinality>,
    pub child_card: Cardinality,
    pub table: ProbTable,
}

impl DenseCpt {
    pub fn new(
        parent_cards: Vec<Cardinality>,
        child_card: Cardinality,
        table: impl Into<ProbTable>,
    ) -> Self {
        Self {
            parent_cards,
            child_card,
            table: table.into(),
        }
    }
}

/// Diagonal Gaussian component
#[derive(Clone, Debug, PartialEq)]
pub struct MixtureComponent {
    pub dim: usize,
    pub mean: String,
    pub covar: String,
}

impl MixtureComponent {
    pub fn diag_gaussian(dim: usize, mean: &str, covar: &str) -> Self {
        Self {
            dim,
            mean: mean.to_string(),
            covar: covar.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mixture {
    pub dim: usize,
    pub dpmf: String,
    pub components: Vec<String>,
}

impl Mixture {
    pub fn new(dim: usize, dpmf: &str, components: &[&str]) -> Self {
        Self {
            dim,
            dpmf: dpmf.to_string(),
            components: components.iter().map(|x| x.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueObject {
    DecisionTree(DecisionTree),
    NameCollection(NameCollection),
    DeterministicCpt(DeterministicCpt),
    DenseCpt(DenseCpt),
    Mean(Vec<f64>),
    Covar(Vec<f64>),
    Dpmf(Vec<f64>),
    MixtureComponent(MixtureComponent),
    Mixture(Mixture),
}

impl ValueObject {
    pub fn kind(&self) -> SectionKind {
        match self {
            Self::DecisionTree(_) => SectionKind::DecisionTree,
            Self::NameCollection(_) => SectionKind::NameCollection,
            Self::DeterministicCpt(_) => SectionKind::DeterministicCpt,
            Self::DenseCpt(_) => SectionKind::DenseCpt,
            Self::Mean(_) => SectionKind::Mean,
            Self::Covar(_) => SectionKind::Covar,
            Self::Dpmf(_) => SectionKind::Dpmf,
            Self::MixtureComponent(_) => SectionKind::MixtureComponent,
            Self::Mixture(_) => SectionKind::Mixture,
        }
    }
}

impl From<DecisionTree> for ValueObject {
    fn from(x: DecisionTree) -> Self {
        Self::DecisionTree(x)
    }
}

impl From<NameCollection> for ValueObject {
    fn from(x: NameCollection) -> Self {
        Self::NameCollection(x)
    }
}

impl From<DeterministicCpt> for ValueObject {
    fn from(x: DeterministicCpt) -> Self {
        Self::DeterministicCpt(x)
    }
}

impl From<DenseCpt> for ValueObject {
    fn from(x: DenseCpt) -> Self {
        Self::DenseCpt(x)
    }
}

impl From<MixtureComponent> for ValueObject {
    fn from(x: MixtureComponent) -> Self {
        Self::MixtureComponent(x)
    }
}

impl From<Mixture> for ValueObject {
    fn from(x: Mixture) -> Self {
        Self::Mixture(x)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub name: String,
    pub value: ValueObject,
}

/// All entries of one kind, in declaration order
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub entries: Vec<Entry>,
}

impl Section {
    pub fn get(&self, name: &str) -> Option<&ValueObject> {
        self.entries
            .iter()
            .find(|x| x.name == name)
            .map(|x| &x.value)
    }
}

/// Validated, immutable parameter specification
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSpec {
    /// Non-empty sections in `SectionKind` order
    sections: Vec<Section>,
}

impl ModelSpec {
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

#[cfg(test)]
impl ModelSpec {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|x| x.kind == kind)
    }

    pub fn get(&self, kind: SectionKind, name: &str) -> Option<&ValueObject> {
        self.section(kind)?.get(name)
    }
}
