//! Structural checks run on a specification before it can be built
//!

use std::collections::{BTreeMap, HashMap, HashSet};

use itertools::Itertools;
use thiserror::Error;

use super::{
    Cardinality, CptMapping, DecisionNode, DecisionTree, DenseCpt, DeterministicCpt, Leaf,
    Mixture, MixtureComponent, Section, SectionKind, ValueObject,
};
use crate::prob_utils::{find_invalid_prob, get_distro_sum, is_normalized_distro};

#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error("duplicate {kind} entry name '{name}'")]
    DuplicateName { kind: String, name: String },

    #[error("name collection '{collection}' lists '{name}' more than once")]
    DuplicateCollectionName { collection: String, name: String },

    #[error("'{entry}' references {kind} entry '{reference}', which is not defined")]
    UnresolvedReference {
        entry: String,
        kind: String,
        reference: String,
    },

    #[error("table '{table}' row {row} sums to {sum}")]
    RowSum { table: String, row: usize, sum: f64 },

    #[error("table '{table}' contains invalid probability {value}")]
    InvalidProbability { table: String, value: f64 },

    #[error("table '{table}' is ragged")]
    RaggedTable { table: String },

    #[error("table '{table}' shape does not match its cardinalities: {detail}")]
    TableShape { table: String, detail: String },

    #[error("cardinality mismatch in '{entry}': {detail}")]
    CardinalityMismatch { entry: String, detail: String },

    #[error("malformed decision tree '{tree}': {detail}")]
    InvalidDecisionTree { tree: String, detail: String },

    #[error("dimension mismatch in '{entry}': {detail}")]
    DimensionMismatch { entry: String, detail: String },

    #[error("covariance '{entry}' has negative or non-finite value {value}")]
    InvalidCovariance { entry: String, value: f64 },

    #[error("'{entry}' contains a non-finite value")]
    NonFiniteValue { entry: String },

    #[error("mixture '{entry}' has no components")]
    EmptyMixture { entry: String },
}

/// Shared lookup state for all validation checks
struct SpecIndex<'a> {
    sections: &'a [Section],
    cardinalities: &'a BTreeMap<String, usize>,
    tolerance: f64,
}

impl<'a> SpecIndex<'a> {
    fn get(&self, kind: SectionKind, name: &str) -> Option<&'a ValueObject> {
        self.sections
            .iter()
            .find(|x| x.kind == kind)
            .and_then(|x| x.get(name))
    }

    /// Numeric value of a cardinality, if it is known at build time
    fn resolve(&self, card: &Cardinality) -> Option<usize> {
        match card {
            Cardinality::Literal(x) => Some(*x),
            Cardinality::Symbol(x) => self.cardinalities.get(x).copied(),
        }
    }
}

fn unresolved(entry: &str, kind: SectionKind, reference: &str) -> SpecError {
    SpecError::UnresolvedReference {
        entry: entry.to_string(),
        kind: kind.to_string(),
        reference: reference.to_string(),
    }
}

fn check_unique_names(section: &Section) -> Result<(), SpecError> {
    let mut names = HashSet::new();
    for entry in section.entries.iter() {
        if !names.insert(entry.name.as_str()) {
            return Err(SpecError::DuplicateName {
                kind: section.kind.to_string(),
                name: entry.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_finite(entry: &str, values: &[f64]) -> Result<(), SpecError> {
    if values.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(SpecError::NonFiniteValue {
            entry: entry.to_string(),
        })
    }
}

fn check_distro(table: &str, row: usize, pdf: &[f64], tolerance: f64) -> Result<(), SpecError> {
    if let Some(index) = find_invalid_prob(pdf) {
        return Err(SpecError::InvalidProbability {
            table: table.to_string(),
            value: pdf[index],
        });
    }
    if !is_normalized_distro(pdf, tolerance) {
        return Err(SpecError::RowSum {
            table: table.to_string(),
            row,
            sum: get_distro_sum(pdf),
        });
    }
    Ok(())
}

/// Check tree structure against its own parent count, and against parent/child cardinalities
/// when these are known
///
fn check_decision_tree(
    name: &str,
    tree: &DecisionTree,
    parent_cards: &[Option<usize>],
    child_card: Option<usize>,
) -> Result<(), SpecError> {
    let tree_error = |detail: String| SpecError::InvalidDecisionTree {
        tree: name.to_string(),
        detail,
    };

    let mut result = Ok(());
    tree.root.visit(&mut |node| {
        if result.is_err() {
            return;
        }
        result = match node {
            DecisionNode::Split { parent, cases, .. } => {
                if *parent >= tree.parent_count {
                    Err(tree_error(format!(
                        "split on parent {parent} but tree has {} parents",
                        tree.parent_count
                    )))
                } else {
                    let mut seen = HashSet::new();
                    let parent_card = parent_cards.get(*parent).copied().flatten();
                    let mut split_result = Ok(());
                    for (value, _) in cases {
                        if !seen.insert(*value) {
                            split_result = Err(tree_error(format!(
                                "split on parent {parent} repeats value {value}"
                            )));
                            break;
                        }
                        if let Some(card) = parent_card {
                            if *value < 0 || *value as usize >= card {
                                split_result = Err(tree_error(format!(
                                    "split value {value} is outside parent {parent} cardinality {card}"
                                )));
                                break;
                            }
                        }
                    }
                    split_result
                }
            }
            DecisionNode::Leaf(Leaf::Value(value)) => match child_card {
                Some(card) if *value < 0 || *value as usize >= card => Err(tree_error(format!(
                    "leaf value {value} is outside child cardinality {card}"
                ))),
                _ => Ok(()),
            },
            DecisionNode::Leaf(Leaf::Formula(expr)) => {
                match expr.parent_refs().into_iter().find(|x| *x >= tree.parent_count) {
                    Some(x) => Err(tree_error(format!(
                        "formula '{expr}' references parent {x} but tree has {} parents",
                        tree.parent_count
                    ))),
                    None => Ok(()),
                }
            }
        };
    });
    result
}

/// Trees with more parent value combinations than this are not checked for coverage
const MAX_TREE_COVERAGE_COMBINATIONS: usize = 100_000;

/// Evaluate the tree for every combination of parent values, and check that each result is a
/// valid child value
///
fn check_decision_tree_coverage(
    index: &SpecIndex,
    name: &str,
    tree: &DecisionTree,
    parent_cards: &[usize],
    child_card: usize,
) -> Result<(), SpecError> {
    let combination_count = parent_cards
        .iter()
        .try_fold(1usize, |acc, x| acc.checked_mul(*x));
    match combination_count {
        Some(x) if !parent_cards.is_empty() && x <= MAX_TREE_COVERAGE_COMBINATIONS => {}
        _ => return Ok(()),
    }

    let symbols = index
        .cardinalities
        .iter()
        .map(|(symbol, value)| (symbol.clone(), *value as i64))
        .collect::<BTreeMap<_, _>>();

    for parents in parent_cards
        .iter()
        .map(|x| 0..*x as i64)
        .multi_cartesian_product()
    {
        match tree.eval(&parents, &symbols) {
            Some(value) if value >= 0 && (value as usize) < child_card => {}
            Some(value) => {
                return Err(SpecError::InvalidDecisionTree {
                    tree: name.to_string(),
                    detail: format!(
                        "parent values {parents:?} give {value}, outside child cardinality {child_card}"
                    ),
                });
            }
            None => {
                return Err(SpecError::InvalidDecisionTree {
                    tree: name.to_string(),
                    detail: format!("no value can be computed for parent values {parents:?}"),
                });
            }
        }
    }
    Ok(())
}

fn check_deterministic_cpt(
    index: &SpecIndex,
    name: &str,
    cpt: &DeterministicCpt,
    tree_usage: &mut HashMap<String, (Vec<Cardinality>, Cardinality)>,
) -> Result<(), SpecError> {
    let mismatch = |detail: String| SpecError::CardinalityMismatch {
        entry: name.to_string(),
        detail,
    };

    match &cpt.mapping {
        CptMapping::CopyParent => {
            if cpt.parent_cards.len() != 1 {
                return Err(mismatch(format!(
                    "copyParent requires one parent, found {}",
                    cpt.parent_cards.len()
                )));
            }
            if cpt.parent_cards[0] != cpt.child_card {
                return Err(mismatch(format!(
                    "copyParent parent cardinality {} differs from child cardinality {}",
                    cpt.parent_cards[0], cpt.child_card
                )));
            }
        }
        CptMapping::DecisionTree(tree_name) => {
            let tree = match index.get(SectionKind::DecisionTree, tree_name) {
                Some(ValueObject::DecisionTree(x)) => x,
                _ => return Err(unresolved(name, SectionKind::DecisionTree, tree_name)),
            };
            if tree.parent_count != cpt.parent_cards.len() {
                return Err(mismatch(format!(
                    "declares {} parents but decision tree '{tree_name}' has {}",
                    cpt.parent_cards.len(),
                    tree.parent_count
                )));
            }

            let usage = (cpt.parent_cards.clone(), cpt.child_card.clone());
            if let Some(previous) = tree_usage.get(tree_name) {
                if *previous != usage {
                    return Err(mismatch(format!(
                        "decision tree '{tree_name}' is used elsewhere with different cardinalities"
                    )));
                }
            } else {
                tree_usage.insert(tree_name.clone(), usage);
            }

            // Each parent is range checked on its own when its cardinality is known
            let parent_cards = cpt
                .parent_cards
                .iter()
                .map(|x| index.resolve(x))
                .collect::<Vec<_>>();
            let child_card = index.resolve(&cpt.child_card);
            check_decision_tree(tree_name, tree, &parent_cards, child_card)?;

            let all_parent_cards = parent_cards.into_iter().collect::<Option<Vec<_>>>();
            if let (Some(parent_cards), Some(child_card)) = (all_parent_cards, child_card) {
                check_decision_tree_coverage(index, tree_name, tree, &parent_cards, child_card)?;
            }
        }
    }
    Ok(())
}

fn check_dense_cpt(index: &SpecIndex, name: &str, cpt: &DenseCpt) -> Result<(), SpecError> {
    let shape = cpt.table.shape().ok_or_else(|| SpecError::RaggedTable {
        table: name.to_string(),
    })?;

    let cards = cpt
        .parent_cards
        .iter()
        .chain(std::iter::once(&cpt.child_card))
        .collect::<Vec<_>>();
    if shape.len() != cards.len() {
        return Err(SpecError::TableShape {
            table: name.to_string(),
            detail: format!(
                "table has {} dimensions for {} parent(s) and one child",
                shape.len(),
                cpt.parent_cards.len()
            ),
        });
    }
    for (dim_size, card) in shape.iter().zip(cards) {
        if let Some(card_size) = index.resolve(card) {
            if *dim_size != card_size {
                return Err(SpecError::TableShape {
                    table: name.to_string(),
                    detail: format!("dimension of size {dim_size} declared as {card}={card_size}"),
                });
            }
        }
    }

    for (row_index, row) in cpt.table.rows().into_iter().enumerate() {
        check_distro(name, row_index, row, index.tolerance)?;
    }
    Ok(())
}

fn check_component(
    index: &SpecIndex,
    name: &str,
    component: &MixtureComponent,
) -> Result<(), SpecError> {
    for (kind, reference) in [
        (SectionKind::Mean, &component.mean),
        (SectionKind::Covar, &component.covar),
    ] {
        let len = match index.get(kind, reference) {
            Some(ValueObject::Mean(x) | ValueObject::Covar(x)) => x.len(),
            _ => return Err(unresolved(name, kind, reference)),
        };
        if len != component.dim {
            return Err(SpecError::DimensionMismatch {
                entry: name.to_string(),
                detail: format!(
                    "component dimension {} but {kind} '{reference}' has length {len}",
                    component.dim
                ),
            });
        }
    }
    Ok(())
}

fn check_mixture(index: &SpecIndex, name: &str, mixture: &Mixture) -> Result<(), SpecError> {
    if mixture.components.is_empty() {
        return Err(SpecError::EmptyMixture {
            entry: name.to_string(),
        });
    }
    let weight_count = match index.get(SectionKind::Dpmf, &mixture.dpmf) {
        Some(ValueObject::Dpmf(x)) => x.len(),
        _ => return Err(unresolved(name, SectionKind::Dpmf, &mixture.dpmf)),
    };
    if weight_count != mixture.components.len() {
        return Err(SpecError::DimensionMismatch {
            entry: name.to_string(),
            detail: format!(
                "{} components but DPMF '{}' has {weight_count} weights",
                mixture.components.len(),
                mixture.dpmf
            ),
        });
    }
    for component_name in mixture.components.iter() {
        let component = match index.get(SectionKind::MixtureComponent, component_name) {
            Some(ValueObject::MixtureComponent(x)) => x,
            _ => {
                return Err(unresolved(
                    name,
                    SectionKind::MixtureComponent,
                    component_name,
                ));
            }
        };
        if component.dim != mixture.dim {
            return Err(SpecError::DimensionMismatch {
                entry: name.to_string(),
                detail: format!(
                    "mixture dimension {} but component '{component_name}' has dimension {}",
                    mixture.dim, component.dim
                ),
            });
        }
    }
    Ok(())
}

/// Run all specification invariant checks, returning the first violation found
///
/// # Arguments
/// * `cardinalities` - Values of cardinality symbols known at build time. Symbols missing here are
///   only checked for consistent usage.
/// * `tolerance` - Allowed deviation from one in each probability row sum
///
pub fn validate_sections(
    sections: &[Section],
    cardinalities: &BTreeMap<String, usize>,
    tolerance: f64,
) -> Result<(), SpecError> {
    let index = SpecIndex {
        sections,
        cardinalities,
        tolerance,
    };

    for section in sections {
        check_unique_names(section)?;
    }

    let mut tree_usage = HashMap::new();
    for section in sections {
        for entry in section.entries.iter() {
            let name = entry.name.as_str();
            match &entry.value {
                ValueObject::DecisionTree(tree) => {
                    check_decision_tree(name, tree, &[], None)?;
                }
                ValueObject::NameCollection(collection) => {
                    let mut seen = HashSet::new();
                    for member in collection.names.iter() {
                        if !seen.insert(member.as_str()) {
                            return Err(SpecError::DuplicateCollectionName {
                                collection: name.to_string(),
                                name: member.clone(),
                            });
                        }
                        if index.get(SectionKind::Mixture, member).is_none() {
                            return Err(unresolved(name, SectionKind::Mixture, member));
                        }
                    }
                }
                ValueObject::DeterministicCpt(cpt) => {
                    check_deterministic_cpt(&index, name, cpt, &mut tree_usage)?;
                }
                ValueObject::DenseCpt(cpt) => {
                    check_dense_cpt(&index, name, cpt)?;
                }
                ValueObject::Mean(x) => {
                    check_finite(name, x)?;
                }
                ValueObject::Covar(x) => {
                    if let Some(value) = x.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                        return Err(SpecError::InvalidCovariance {
                            entry: name.to_string(),
                            value: *value,
                        });
                    }
                }
                ValueObject::Dpmf(x) => {
                    check_distro(name, 0, x, tolerance)?;
                }
                ValueObject::MixtureComponent(component) => {
                    check_component(&index, name, component)?;
                }
                ValueObject::Mixture(mixture) => {
                    check_mixture(&index, name, mixture)?;
                }
            }
        }
    }
    Ok(())
}
