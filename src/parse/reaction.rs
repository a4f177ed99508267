//! Structural checks on `reactant>>product` bond-cutting patterns.

use super::smarts::Res;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{anychar, char},
    combinator::{map, recognize, rest},
    multi::many0,
    sequence::{delimited, separated_pair},
};
use std::collections::BTreeSet;

/// The two sides of a reaction-style bond pattern and the atom-map labels
/// each side carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionPattern {
    pub reactant: String,
    pub product: String,
    pub reactant_labels: Vec<u16>,
    pub product_labels: Vec<u16>,
}

/// The text inside a bracket atom, which may itself contain bracket atoms
/// through recursive SMARTS.
fn bracket_body(input: &str) -> Res<&str> {
    recognize(many0(alt((
        take_while1(|c| c != '[' && c != ']'),
        recognize(delimited(char('['), bracket_body, char(']'))),
    ))))(input)
}

/// The atom-map label at the end of a bracket atom body, if there is one.
fn bracket_label(input: &str) -> Res<Option<u16>> {
    map(delimited(char('['), bracket_body, char(']')), |body: &str| {
        body.rsplit_once(':')
            .and_then(|(_, label)| label.parse::<u16>().ok())
    })(input)
}

/// Collect the atom-map labels of one side, in order of appearance.
fn side_labels(input: &str) -> Res<Vec<u16>> {
    map(
        many0(alt((
            bracket_label,
            map(anychar, |_| None),
        ))),
        |labels| labels.into_iter().flatten().collect(),
    )(input)
}

fn sides(input: &str) -> Res<(&str, &str)> {
    separated_pair(take_until(">>"), tag(">>"), rest)(input)
}

/// Split a reaction pattern and check its contract:
///
/// * exactly one `>>` separator,
/// * each side carries exactly two distinct numeric atom-map labels,
/// * both sides use the same two labels.
pub fn parse_reaction_pattern(input: &str) -> Result<ReactionPattern, String> {
    let input = input.trim();
    let separators = input.matches(">>").count();
    if separators != 1 {
        return Err(format!(
            "expected exactly one '>>' separator, found {separators}"
        ));
    }
    let (_, (reactant, product)) = sides(input).map_err(|e| e.to_string())?;
    if reactant.is_empty() || product.is_empty() {
        return Err("both sides of '>>' must be non-empty".to_string());
    }

    let (_, reactant_labels) = side_labels(reactant).map_err(|e| e.to_string())?;
    let (_, product_labels) = side_labels(product).map_err(|e| e.to_string())?;

    for (side, labels) in [("reactant", &reactant_labels), ("product", &product_labels)] {
        let distinct: BTreeSet<_> = labels.iter().collect();
        if labels.len() != 2 || distinct.len() != 2 {
            return Err(format!(
                "{side} side must carry exactly two distinct atom-map labels, found {labels:?}"
            ));
        }
    }
    let reactant_set: BTreeSet<_> = reactant_labels.iter().collect();
    let product_set: BTreeSet<_> = product_labels.iter().collect();
    if reactant_set != product_set {
        return Err(format!(
            "atom-map labels differ between sides: {reactant_labels:?} vs {product_labels:?}"
        ));
    }

    Ok(ReactionPattern {
        reactant: reactant.to_string(),
        product: product.to_string(),
        reactant_labels,
        product_labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pattern() {
        let pattern = parse_reaction_pattern("[*:1]-!@[*:2]>>[*:1][*].[*:2][*]").unwrap();
        assert_eq!(pattern.reactant, "[*:1]-!@[*:2]");
        assert_eq!(pattern.product, "[*:1][*].[*:2][*]");
        assert_eq!(pattern.reactant_labels, vec![1, 2]);
        assert_eq!(pattern.product_labels, vec![1, 2]);
    }

    #[test]
    fn test_separator_count() {
        assert!(parse_reaction_pattern("[*:1]-[*:2]").is_err());
        assert!(parse_reaction_pattern("[*:1]>>[*:2]>>[*:1]").is_err());
    }

    #[test]
    fn test_label_contract() {
        // Only one label on the reactant side.
        assert!(parse_reaction_pattern("[*:1]-[*]>>[*:1][*].[*:2][*]").is_err());
        // Repeated label.
        assert!(parse_reaction_pattern("[*:1]-[*:1]>>[*:1][*].[*:1][*]").is_err());
        // Mismatched label sets.
        assert!(parse_reaction_pattern("[*:1]-[*:2]>>[*:1][*].[*:3][*]").is_err());
        // Three labels.
        assert!(parse_reaction_pattern("[*:1]-[*:2]-[*:3]>>[*:1][*].[*:2][*]").is_err());
    }

    #[test]
    fn test_nested_brackets() {
        let pattern =
            parse_reaction_pattern("[#6+0;!$(*=,#[!#6]):1]!@!=!#[*:2]>>[*:1][*].[*:2][*]")
                .unwrap();
        assert_eq!(pattern.reactant_labels, vec![1, 2]);
    }

    #[test]
    fn test_labels_ignore_non_map_colons() {
        // An aromatic bond ':' outside brackets is not a label.
        let pattern = parse_reaction_pattern("[c:1]:[c:2]>>[c:1][*].[c:2][*]").unwrap();
        assert_eq!(pattern.reactant_labels, vec![1, 2]);
    }
}
