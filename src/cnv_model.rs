//! Copy number segmentation model parameters for the Segway/GMTK segment-countdown structure
//!
//! The structure file generated by Segway's initialization stage declares the variables
//! (frameIndex, ruler, seg, segCountDown, segTransition, subseg) and refers to the tables
//! below by name. This module fixes the shape of every deterministic rule and transition table,
//! and splices in the Gaussian emission parameters derived from the track statistics.
//!

use log::info;
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::gaussian_params::{SegmentState, StateGaussianParams};
use crate::model_spec::{
    Cardinality, DecisionNode, DecisionTree, DenseCpt, DeterministicCpt, Expr, Mixture,
    MixtureComponent, ModelSpec, ModelSpecBuilder, NameCollection, SpecError, ValueObject,
};

pub const CARD_FRAMEINDEX: &str = "CARD_FRAMEINDEX";
pub const CARD_RULER: &str = "CARD_RULER";
pub const CARD_SEG: &str = "CARD_SEG";
pub const CARD_SEGCOUNTDOWN: &str = "CARD_SEGCOUNTDOWN";
pub const CARD_SEGTRANSITION: &str = "CARD_SEGTRANSITION";
pub const CARD_SUBSEG: &str = "CARD_SUBSEG";
pub const RULER_SCALE: &str = "RULER_SCALE";

pub const MAP_FRAMEINDEX_RULER: &str = "map_frameIndex_ruler";
pub const MAP_SEG_SEGCOUNTDOWN: &str = "map_seg_segCountDown";
pub const MAP_SEGTRANSITION_RULER_SEG_SEGCOUNTDOWN_SEGCOUNTDOWN: &str =
    "map_segTransition_ruler_seg_segCountDown_segCountDown";
pub const MAP_SEG_SUBSEG_OBS: &str = "map_seg_subseg_obs";

pub const DPMF_ALWAYS: &str = "dpmf_always";

/// Values of the segTransition variable
#[derive(Clone, Copy, Debug, EnumCount, EnumIter, PartialEq)]
pub enum SegTransition {
    None,
    Subseg,
    Seg,
}

impl SegTransition {
    /// True if segCountDown restarts from the new segment label's initial value
    pub fn restarts_countdown(self) -> bool {
        matches!(self, Self::Seg)
    }
}

/// Model settings that are not intended to be runtime settable in the cli
pub struct StaticSegmentationSettings {
    /// Resolution passed to the initialization stage, in bases per frame
    pub resolution: u32,

    pub subseg_count: usize,

    /// segCountDown value assigned at the start of a segment, indexed by segment label
    pub initial_seg_countdown: Vec<i64>,

    /// Number of standard deviations separating the loss and gain state means from the
    /// neutral mean
    pub state_sd_separation: f64,

    /// Label used in all observation-specific parameter names
    pub observation_label: String,

    /// segTransition distribution for each segCountDown value
    pub countdown_transition_probs: Vec<[f64; SegTransition::COUNT]>,

    /// Allowed deviation from one in each probability row sum
    pub prob_tolerance: f64,
}

impl StaticSegmentationSettings {
    pub fn new() -> Self {
        Self {
            resolution: 50,
            subseg_count: 1,
            initial_seg_countdown: vec![1; SegmentState::COUNT],
            state_sd_separation: 2.0,
            observation_label: "LogR".to_string(),
            countdown_transition_probs: vec![[0.99, 0.00999, 0.00001], [0.99, 0.01, 0.0]],
            prob_tolerance: 1e-6,
        }
    }

    pub fn label_count(&self) -> usize {
        SegmentState::COUNT
    }

    pub fn seg_countdown_card(&self) -> usize {
        let max_countdown = self.initial_seg_countdown.iter().copied().max().unwrap_or(0);
        max_countdown.max(0) as usize + 1
    }
}

impl Default for StaticSegmentationSettings {
    fn default() -> Self {
        Self::new()
    }
}

fn mean_name(label: usize, observation_label: &str) -> String {
    format!("mean_seg{label}_subseg0_{observation_label}")
}

fn component_name(label: usize, observation_label: &str) -> String {
    format!("mc_asinh_norm_seg{label}_subseg0_{observation_label}")
}

fn mixture_name(label: usize, observation_label: &str) -> String {
    format!("mx_seg{label}_subseg0_{observation_label}")
}

fn card(symbol: &str) -> Cardinality {
    Cardinality::symbol(symbol)
}

/// Tree selecting the initial segCountDown value from the segment label in parent `seg_parent`
///
/// The last label is handled by the default branch.
///
fn get_seg_countdown_init_node(seg_parent: usize, initial_seg_countdown: &[i64]) -> DecisionNode {
    let (last, rest) = match initial_seg_countdown.split_last() {
        Some(x) => x,
        None => return DecisionNode::value(0),
    };
    let cases = rest
        .iter()
        .enumerate()
        .map(|(label, countdown)| (label as i64, DecisionNode::value(*countdown)))
        .collect();
    DecisionNode::split(seg_parent, cases, DecisionNode::value(*last))
}

/// Ruler is 1 on every frame index divisible by RULER_SCALE, and 0 otherwise
fn get_ruler_tree() -> DecisionTree {
    DecisionTree::new(
        1,
        DecisionNode::formula(
            Expr::modulo(Expr::parent(0), Expr::symbol(RULER_SCALE)).equals(Expr::int(0)),
        ),
    )
}

/// segCountDown update given parents (segTransition, ruler, seg, previous segCountDown)
///
/// On a segment transition the countdown restarts from the value for the new segment label.
/// Otherwise it is carried over between ruler marks, and decremented toward zero at each mark.
///
fn get_seg_countdown_update_tree(initial_seg_countdown: &[i64]) -> DecisionTree {
    const SEG_TRANSITION: usize = 0;
    const RULER: usize = 1;
    const SEG: usize = 2;
    const PREV_SEG_COUNTDOWN: usize = 3;

    let continuation = DecisionNode::split(
        RULER,
        vec![(0, DecisionNode::formula(Expr::parent(PREV_SEG_COUNTDOWN)))],
        DecisionNode::formula(Expr::max(
            Expr::parent(PREV_SEG_COUNTDOWN).minus(Expr::int(1)),
            Expr::int(0),
        )),
    );

    // All other transition values fall through to the continuation branch
    let restart_cases = SegTransition::iter()
        .filter(|x| x.restarts_countdown())
        .map(|x| {
            (
                x as i64,
                get_seg_countdown_init_node(SEG, initial_seg_countdown),
            )
        })
        .collect();

    DecisionTree::new(
        4,
        DecisionNode::split(SEG_TRANSITION, restart_cases, continuation),
    )
}

/// Combined (seg, subseg) observation index
fn get_seg_subseg_obs_tree() -> DecisionTree {
    DecisionTree::new(
        2,
        DecisionNode::formula(
            Expr::parent(0)
                .times(Expr::symbol(CARD_SUBSEG))
                .plus(Expr::parent(1)),
        ),
    )
}

fn append_decision_trees(builder: &mut ModelSpecBuilder, settings: &StaticSegmentationSettings) {
    builder
        .append(MAP_FRAMEINDEX_RULER, get_ruler_tree())
        .append(
            MAP_SEG_SEGCOUNTDOWN,
            DecisionTree::new(
                1,
                get_seg_countdown_init_node(0, &settings.initial_seg_countdown),
            ),
        )
        .append(
            MAP_SEGTRANSITION_RULER_SEG_SEGCOUNTDOWN_SEGCOUNTDOWN,
            get_seg_countdown_update_tree(&settings.initial_seg_countdown),
        )
        .append(MAP_SEG_SUBSEG_OBS, get_seg_subseg_obs_tree());
}

fn append_deterministic_cpts(builder: &mut ModelSpecBuilder) {
    builder
        .append(
            "seg_segCountDown",
            DeterministicCpt::from_tree(
                vec![card(CARD_SEG)],
                card(CARD_SEGCOUNTDOWN),
                MAP_SEG_SEGCOUNTDOWN,
            ),
        )
        .append(
            "frameIndex_ruler",
            DeterministicCpt::from_tree(
                vec![card(CARD_FRAMEINDEX)],
                card(CARD_RULER),
                MAP_FRAMEINDEX_RULER,
            ),
        )
        .append(
            "segTransition_ruler_seg_segCountDown_segCountDown",
            DeterministicCpt::from_tree(
                vec![
                    card(CARD_SEGTRANSITION),
                    card(CARD_RULER),
                    card(CARD_SEG),
                    card(CARD_SEGCOUNTDOWN),
                ],
                card(CARD_SEGCOUNTDOWN),
                MAP_SEGTRANSITION_RULER_SEG_SEGCOUNTDOWN_SEGCOUNTDOWN,
            ),
        )
        .append("seg_seg_copy", DeterministicCpt::copy_parent(card(CARD_SEG)))
        .append(
            "subseg_subseg_copy",
            DeterministicCpt::copy_parent(card(CARD_SUBSEG)),
        );
}

fn get_uniform_distro(size: usize) -> Vec<f64> {
    vec![1.0 / size as f64; size]
}

/// Segment to segment transitions, with no mass on staying in the same segment label
fn get_seg_seg_transitions(label_count: usize) -> Vec<Vec<f64>> {
    let go_prob = 1.0 / (label_count.max(2) - 1) as f64;
    (0..label_count)
        .map(|from_label| {
            (0..label_count)
                .map(|to_label| if from_label == to_label { 0.0 } else { go_prob })
                .collect()
        })
        .collect()
}

fn append_dense_cpts(builder: &mut ModelSpecBuilder, settings: &StaticSegmentationSettings) {
    let label_count = settings.label_count();
    let subseg_count = settings.subseg_count;

    let countdown_transitions = settings
        .countdown_transition_probs
        .iter()
        .map(|probs| vec![probs.to_vec(); label_count])
        .collect::<Vec<_>>();

    builder
        .append(
            "start_seg",
            DenseCpt::new(vec![], card(CARD_SEG), get_uniform_distro(label_count)),
        )
        .append(
            "seg_subseg",
            DenseCpt::new(
                vec![card(CARD_SEG)],
                card(CARD_SUBSEG),
                vec![get_uniform_distro(subseg_count); label_count],
            ),
        )
        .append(
            "seg_seg",
            DenseCpt::new(
                vec![card(CARD_SEG)],
                card(CARD_SEG),
                get_seg_seg_transitions(label_count),
            ),
        )
        .append(
            "seg_subseg_subseg",
            DenseCpt::new(
                vec![card(CARD_SEG), card(CARD_SUBSEG)],
                card(CARD_SUBSEG),
                vec![vec![get_uniform_distro(subseg_count); subseg_count]; label_count],
            ),
        )
        .append(
            "segCountDown_seg_segTransition",
            DenseCpt::new(
                vec![card(CARD_SEGCOUNTDOWN), card(CARD_SEG)],
                card(CARD_SEGTRANSITION),
                countdown_transitions,
            ),
        );
}

/// One single-component diagonal Gaussian mixture per segment state
fn append_gaussian_mixtures(
    builder: &mut ModelSpecBuilder,
    settings: &StaticSegmentationSettings,
    params: &StateGaussianParams,
) {
    let label = settings.observation_label.as_str();
    let dim = params.track_count();
    let covar_name = format!("covar_{label}");

    for state in SegmentState::iter() {
        builder.append(
            &mean_name(state as usize, label),
            ValueObject::Mean(params.state_mean(state).to_vec()),
        );
    }
    builder
        .append(&covar_name, ValueObject::Covar(params.variance.clone()))
        .append(DPMF_ALWAYS, ValueObject::Dpmf(vec![1.0]));

    for state in SegmentState::iter() {
        builder.append(
            &component_name(state as usize, label),
            MixtureComponent::diag_gaussian(dim, &mean_name(state as usize, label), &covar_name),
        );
    }
    for state in SegmentState::iter() {
        builder.append(
            &mixture_name(state as usize, label),
            Mixture::new(
                dim,
                DPMF_ALWAYS,
                &[component_name(state as usize, label).as_str()],
            ),
        );
    }
}

/// Assemble and validate the full copy number segmentation parameter specification
///
pub fn build_cnv_model_spec(
    settings: &StaticSegmentationSettings,
    params: &StateGaussianParams,
) -> Result<ModelSpec, SpecError> {
    let label = settings.observation_label.as_str();
    let mut builder = ModelSpecBuilder::new().with_tolerance(settings.prob_tolerance);
    builder
        .define_cardinality(CARD_SEG, settings.label_count())
        .define_cardinality(CARD_SUBSEG, settings.subseg_count)
        .define_cardinality(CARD_RULER, 2)
        .define_cardinality(CARD_SEGTRANSITION, SegTransition::COUNT)
        .define_cardinality(CARD_SEGCOUNTDOWN, settings.seg_countdown_card());

    append_decision_trees(&mut builder, settings);
    builder.append(
        &format!("collection_seg_{label}"),
        NameCollection::new((0..settings.label_count()).map(|x| mixture_name(x, label))),
    );
    append_deterministic_cpts(&mut builder);
    append_dense_cpts(&mut builder, settings);
    append_gaussian_mixtures(&mut builder, settings, params);

    let spec = builder.build()?;
    info!(
        "Validated copy number model specification with {} sections",
        spec.sections().len()
    );
    Ok(spec)
}
