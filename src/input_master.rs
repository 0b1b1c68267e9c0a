//! Render a model specification as a GMTK input master parameter file, and read back its outline
//!

use std::str::FromStr;

use camino::Utf8Path;
use itertools::Itertools;
use simple_error::{SimpleResult, bail};

use crate::model_spec::{Entry, ModelSpec, Section, SectionKind, ValueObject};

pub const INPUT_MASTER_FILENAME: &str = "input.master";

const SECTION_HEADER_SUFFIX: &str = "_IN_FILE inline";
const DIAG_GAUSSIAN_COMPONENT_TYPE: &str = "COMPONENT_TYPE_DIAG_GAUSSIAN";

/// Path of the auxiliary definitions file written by the initialization stage
pub fn get_auxiliary_include_path(train_dir: &Utf8Path) -> String {
    format!("{train_dir}/auxiliary/segway.inc")
}

/// Format a number in plain decimal, always including a decimal point
///
/// Rust's float display never uses exponent notation and gives the shortest representation
/// that parses back to the same value.
///
fn format_number(x: f64) -> String {
    let s = x.to_string();
    if x.is_finite() && !s.contains('.') {
        s + ".0"
    } else {
        s
    }
}

fn format_values(x: &[f64]) -> String {
    x.iter().map(|v| format_number(*v)).join(" ")
}

/// Header fields and body lines for one entry
fn render_entry(index: usize, entry: &Entry) -> (Vec<String>, Vec<String>) {
    let index = index.to_string();
    let name = entry.name.clone();
    match &entry.value {
        ValueObject::DecisionTree(tree) => (vec![index, name], tree.render_lines()),
        ValueObject::NameCollection(collection) => (
            vec![index, name, collection.names.len().to_string()],
            collection.names.clone(),
        ),
        ValueObject::DeterministicCpt(cpt) => (
            vec![index, name],
            vec![
                cpt.parent_cards.len().to_string(),
                cpt.parent_cards
                    .iter()
                    .chain(std::iter::once(&cpt.child_card))
                    .join(" "),
                cpt.mapping.to_string(),
            ],
        ),
        ValueObject::DenseCpt(cpt) => {
            let mut header = vec![index, name, cpt.parent_cards.len().to_string()];
            header.extend(
                cpt.parent_cards
                    .iter()
                    .chain(std::iter::once(&cpt.child_card))
                    .map(|x| x.to_string()),
            );
            let body = cpt.table.rows().into_iter().map(format_values).collect();
            (header, body)
        }
        ValueObject::Mean(x) | ValueObject::Covar(x) | ValueObject::Dpmf(x) => (
            vec![index, name, x.len().to_string()],
            vec![format_values(x)],
        ),
        ValueObject::MixtureComponent(component) => (
            vec![
                index,
                component.dim.to_string(),
                DIAG_GAUSSIAN_COMPONENT_TYPE.to_string(),
                name,
                component.mean.clone(),
                component.covar.clone(),
            ],
            Vec::new(),
        ),
        ValueObject::Mixture(mixture) => {
            let mut header = vec![
                index,
                mixture.dim.to_string(),
                name,
                mixture.components.len().to_string(),
                mixture.dpmf.clone(),
            ];
            header.extend(mixture.components.iter().cloned());
            (header, Vec::new())
        }
    }
}

fn render_section(section: &Section, lines: &mut Vec<String>) {
    lines.push(format!("{}{SECTION_HEADER_SUFFIX}", section.kind.tag()));
    lines.push(section.entries.len().to_string());
    lines.push(String::new());
    for (index, entry) in section.entries.iter().enumerate() {
        let (header, body) = render_entry(index, entry);
        lines.push(header.join(" "));
        lines.extend(body);
        lines.push(String::new());
    }
}

/// Render the full parameter file text
///
/// Sections are written in `SectionKind` order after an include directive for the auxiliary
/// definitions file in `train_dir`.
///
pub fn render_input_master(spec: &ModelSpec, train_dir: &Utf8Path) -> String {
    let mut lines = vec![
        format!("#include \"{}\"", get_auxiliary_include_path(train_dir)),
        String::new(),
        String::new(),
    ];
    for section in spec.sections() {
        render_section(section, &mut lines);
    }
    lines.join("\n") + "\n"
}

/// Name and numeric content of one entry
#[derive(Clone, Debug, PartialEq)]
pub struct EntryOutline {
    pub name: String,

    /// Numeric body values, for the kinds that carry them
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SectionOutline {
    pub kind: SectionKind,
    pub entries: Vec<EntryOutline>,
}

fn has_numeric_body(kind: SectionKind) -> bool {
    matches!(
        kind,
        SectionKind::DenseCpt | SectionKind::Mean | SectionKind::Covar | SectionKind::Dpmf
    )
}

/// Position of the entry name among the header fields
fn get_name_field_index(kind: SectionKind) -> usize {
    match kind {
        SectionKind::MixtureComponent => 3,
        SectionKind::Mixture => 2,
        _ => 1,
    }
}

fn get_entry_values(value: &ValueObject) -> Vec<f64> {
    match value {
        ValueObject::DenseCpt(cpt) => cpt.table.values(),
        ValueObject::Mean(x) | ValueObject::Covar(x) | ValueObject::Dpmf(x) => x.clone(),
        _ => Vec::new(),
    }
}

/// Outline of an in-memory specification, for comparison with `parse_outline` output
pub fn get_spec_outline(spec: &ModelSpec) -> Vec<SectionOutline> {
    spec.sections()
        .iter()
        .map(|section| SectionOutline {
            kind: section.kind,
            entries: section
                .entries
                .iter()
                .map(|entry| EntryOutline {
                    name: entry.name.clone(),
                    values: get_entry_values(&entry.value),
                })
                .collect(),
        })
        .collect()
}

fn parse_entry_outline(
    kind: SectionKind,
    entry_index: usize,
    block: &[&str],
) -> SimpleResult<EntryOutline> {
    let header = block[0].split_whitespace().collect::<Vec<_>>();
    if header.first().and_then(|x| x.parse::<usize>().ok()) != Some(entry_index) {
        bail!("{kind} entry {entry_index} has unexpected header: '{}'", block[0]);
    }
    let name = match header.get(get_name_field_index(kind)) {
        Some(x) => x.to_string(),
        None => bail!("{kind} entry {entry_index} header has no name: '{}'", block[0]),
    };

    let mut values = Vec::new();
    if has_numeric_body(kind) {
        for token in block[1..].iter().flat_map(|x| x.split_whitespace()) {
            match token.parse::<f64>() {
                Ok(x) => values.push(x),
                Err(_) => bail!("{} entry '{}' has non-numeric value '{}'", kind, name, token),
            }
        }
    }
    Ok(EntryOutline { name, values })
}

/// Read back the section kinds, entry names and numeric values of a rendered parameter file
///
pub fn parse_outline(text: &str) -> SimpleResult<Vec<SectionOutline>> {
    // Group lines into blank-line separated blocks
    let blocks = text
        .lines()
        .map(str::trim)
        .chunk_by(|x| x.is_empty())
        .into_iter()
        .filter_map(|(is_empty, lines)| (!is_empty).then(|| lines.collect::<Vec<_>>()))
        .filter(|x| !x[0].starts_with("#include"))
        .collect::<Vec<_>>();

    let mut sections: Vec<(SectionOutline, usize)> = Vec::new();
    for block in blocks.iter() {
        if let Some(tag) = block[0].strip_suffix(SECTION_HEADER_SUFFIX) {
            let kind = match SectionKind::from_str(tag) {
                Ok(x) => x,
                Err(_) => bail!("Unknown section tag '{}'", tag),
            };
            let count = match block.get(1).and_then(|x| x.parse::<usize>().ok()) {
                Some(x) if block.len() == 2 => x,
                _ => bail!("Section {} has no entry count", kind),
            };
            sections.push((
                SectionOutline {
                    kind,
                    entries: Vec::new(),
                },
                count,
            ));
        } else {
            let Some((section, _)) = sections.last_mut() else {
                bail!("Entry found before any section header: '{}'", block[0]);
            };
            let entry = parse_entry_outline(section.kind, section.entries.len(), block)?;
            section.entries.push(entry);
        }
    }

    let mut outline = Vec::new();
    for (section, count) in sections {
        if section.entries.len() != count {
            bail!(
                "Section {} declares {count} entries but contains {}",
                section.kind,
                section.entries.len()
            );
        }
        outline.push(section);
    }
    Ok(outline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnv_model::{StaticSegmentationSettings, build_cnv_model_spec};
    use crate::gaussian_params::StateGaussianParams;

    fn get_spec() -> ModelSpec {
        let params = StateGaussianParams {
            state_means: vec![vec![-1.5], vec![0.0], vec![1.5]],
            variance: vec![0.75],
        };
        build_cnv_model_spec(&StaticSegmentationSettings::new(), &params).unwrap()
    }

    fn get_section_text<'a>(text: &'a str, tag: &str) -> &'a str {
        let start = text.find(&format!("{tag}_IN_FILE inline")).unwrap();
        let rest = &text[start..];
        let body_start = rest.find('\n').unwrap() + 1;
        let end = rest[body_start..].find(SECTION_HEADER_SUFFIX).map(|x| {
            let line_start = rest[..body_start + x].rfind('\n').unwrap();
            line_start + 1
        });
        match end {
            Some(end) => &rest[..end],
            None => rest,
        }
    }

    #[test]
    fn test_section_text_bounds() {
        let text = "DT_IN_FILE inline\n1\n\n0 a\n\nMEAN_IN_FILE inline\n1\n\n0 m 1\n0.5\n";
        assert_eq!(get_section_text(text, "DT"), "DT_IN_FILE inline\n1\n\n0 a\n\n");
        assert_eq!(
            get_section_text(text, "MEAN"),
            "MEAN_IN_FILE inline\n1\n\n0 m 1\n0.5\n"
        );
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1.0");
        assert_eq!(format_number(0.0), "0.0");
        assert_eq!(format_number(0.00001), "0.00001");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-2.25), "-2.25");
        assert_eq!(format_number(1e21), "1000000000000000000000.0");
    }

    #[test]
    fn test_include_directive() {
        let text = render_input_master(&get_spec(), Utf8Path::new("out/traindir"));
        assert!(text.starts_with("#include \"out/traindir/auxiliary/segway.inc\"\n\n\nDT_IN_FILE inline\n4\n"));
    }

    #[test]
    fn test_section_order() {
        let text = render_input_master(&get_spec(), Utf8Path::new("traindir"));
        let tags = text
            .lines()
            .filter_map(|x| x.strip_suffix(SECTION_HEADER_SUFFIX))
            .collect::<Vec<_>>();
        assert_eq!(
            tags,
            vec![
                "DT",
                "NAME_COLLECTION",
                "DETERMINISTIC_CPT",
                "DENSE_CPT",
                "MEAN",
                "COVAR",
                "DPMF",
                "MC",
                "MX"
            ]
        );
    }

    #[test]
    fn test_decision_tree_text() {
        let text = render_input_master(&get_spec(), Utf8Path::new("traindir"));
        let dt = get_section_text(&text, "DT");
        let expected = "\
DT_IN_FILE inline
4

0 map_frameIndex_ruler
1
-1 { mod(p0, RULER_SCALE) == 0 }

1 map_seg_segCountDown
1
0 3 0 1 default
  -1 1
  -1 1
  -1 1

2 map_segTransition_ruler_seg_segCountDown_segCountDown
4
0 2 2 default
  2 3 0 1 default
    -1 1
    -1 1
    -1 1
  1 2 0 default
    -1 { p3 }
    -1 { max(p3 - 1, 0) }

3 map_seg_subseg_obs
2
-1 { p0 * CARD_SUBSEG + p1 }

";
        assert_eq!(dt, expected);
    }

    #[test]
    fn test_table_text() {
        let text = render_input_master(&get_spec(), Utf8Path::new("traindir"));
        let cpt = get_section_text(&text, "DETERMINISTIC_CPT");
        assert!(cpt.contains(
            "2 segTransition_ruler_seg_segCountDown_segCountDown\n4\nCARD_SEGTRANSITION CARD_RULER CARD_SEG CARD_SEGCOUNTDOWN CARD_SEGCOUNTDOWN\nmap_segTransition_ruler_seg_segCountDown_segCountDown\n"
        ));
        assert!(cpt.contains("3 seg_seg_copy\n1\nCARD_SEG CARD_SEG\ninternal:copyParent\n"));

        let dense = get_section_text(&text, "DENSE_CPT");
        assert!(dense.contains("2 seg_seg 1 CARD_SEG CARD_SEG\n0.0 0.5 0.5\n0.5 0.0 0.5\n0.5 0.5 0.0\n"));
        assert!(dense.contains(
            "4 segCountDown_seg_segTransition 2 CARD_SEGCOUNTDOWN CARD_SEG CARD_SEGTRANSITION\n0.99 0.00999 0.00001\n"
        ));

        let collection = get_section_text(&text, "NAME_COLLECTION");
        assert!(collection.contains(
            "0 collection_seg_LogR 3\nmx_seg0_subseg0_LogR\nmx_seg1_subseg0_LogR\nmx_seg2_subseg0_LogR\n"
        ));
    }

    #[test]
    fn test_gaussian_text() {
        let text = render_input_master(&get_spec(), Utf8Path::new("traindir"));
        assert!(text.contains("MEAN_IN_FILE inline\n3\n\n0 mean_seg0_subseg0_LogR 1\n-1.5\n"));
        assert!(text.contains("COVAR_IN_FILE inline\n1\n\n0 covar_LogR 1\n0.75\n"));
        assert!(text.contains("DPMF_IN_FILE inline\n1\n\n0 dpmf_always 1\n1.0\n"));
        assert!(text.contains(
            "1 1 COMPONENT_TYPE_DIAG_GAUSSIAN mc_asinh_norm_seg1_subseg0_LogR mean_seg1_subseg0_LogR covar_LogR\n"
        ));
        assert!(text.contains(
            "2 1 mx_seg2_subseg0_LogR 1 dpmf_always mc_asinh_norm_seg2_subseg0_LogR\n"
        ));
    }

    #[test]
    fn test_outline_round_trip() {
        let spec = get_spec();
        let text = render_input_master(&spec, Utf8Path::new("traindir"));
        let outline = parse_outline(&text).unwrap();
        assert_eq!(outline, get_spec_outline(&spec));

        let dense = outline
            .iter()
            .find(|x| x.kind == SectionKind::DenseCpt)
            .unwrap();
        assert_eq!(dense.entries[0].name, "start_seg");
        assert_eq!(dense.entries[0].values, vec![1.0 / 3.0; 3]);
    }

    #[test]
    fn test_outline_rejects_bad_count() {
        let text = "MEAN_IN_FILE inline\n2\n\n0 mean_a 1\n0.5\n";
        assert!(parse_outline(text).is_err());

        let text = "MEAN_IN_FILE inline\n1\n\n0 mean_a 1\nx\n";
        assert!(parse_outline(text).is_err());

        let text = "FOO_IN_FILE inline\n0\n";
        assert!(parse_outline(text).is_err());

        let text = "MEAN_IN_FILE inline\n1\n\n0 mean_a 1\n0.5\n";
        assert_eq!(
            parse_outline(text).unwrap(),
            vec![SectionOutline {
                kind: SectionKind::Mean,
                entries: vec![EntryOutline {
                    name: "mean_a".to_string(),
                    values: vec![0.5]
                }]
            }]
        );
    }
}
