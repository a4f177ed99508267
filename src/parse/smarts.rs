//! A SMARTS subset, enough to express bond-cutting queries.

use crate::element::Element;
use crate::molecule::{BondOrder, Molecule};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1, one_of, satisfy},
    combinator::{all_consuming, map, map_res, opt, value},
    error::{convert_error, ErrorKind, ParseError, VerboseError},
    multi::{many1, separated_list1},
    sequence::{delimited, pair, preceded},
    IResult,
};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashSet, VecDeque};

pub type Error<'a> = VerboseError<&'a str>;

pub type Res<'a, T> = IResult<&'a str, T, Error<'a>>;

#[derive(Debug, Clone, PartialEq)]
pub enum AtomPrimitive {
    Any,
    Element { element: Element, aromatic: bool },
    AtomicNumber(u8),
    Aromatic,
    Aliphatic,
    Isotope(u16),
    Charge(i8),
    TotalHydrogens(u8),
    ImplicitHydrogens(u8),
    Degree(u8),
    Connectivity(u8),
    Valence(u8),
    /// `R` (any ring), `R0` (no ring). Other counts are treated as `R`.
    RingMembership(Option<u8>),
    /// `r` (any ring), `rN` (smallest ring through the atom has size N).
    RingSize(Option<u8>),
    Recursive(Box<SmartsPattern>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtomExpr {
    Primitive(AtomPrimitive),
    Not(Box<AtomExpr>),
    And(Vec<AtomExpr>),
    Or(Vec<AtomExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondPrimitive {
    Single,
    Double,
    Triple,
    Aromatic,
    Any,
    Ring,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BondExpr {
    /// No bond symbol: single or aromatic.
    Implicit,
    Primitive(BondPrimitive),
    Not(Box<BondExpr>),
    And(Vec<BondExpr>),
    Or(Vec<BondExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternAtom {
    pub expr: AtomExpr,
    pub map: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternBond {
    pub a: usize,
    pub b: usize,
    pub expr: BondExpr,
}

/// A parsed query graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SmartsPattern {
    pub atoms: Vec<PatternAtom>,
    pub bonds: Vec<PatternBond>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Atom(AtomExpr, Option<u16>),
    Bond(BondExpr),
    BranchOpen,
    BranchClose,
    Ring(u16),
    Dot,
}

// ---------------------------------------------------------------------
// Atom expressions
// ---------------------------------------------------------------------

fn number<T: std::str::FromStr>(input: &str) -> Res<T> {
    map_res(digit1, |digits: &str| digits.parse::<T>())(input)
}

/// A letter primitive with an optional count, e.g. `D2` or `H`.
fn counted<'a>(
    letter: char,
    default: u8,
    build: fn(u8) -> AtomPrimitive,
) -> impl FnMut(&'a str) -> Res<'a, AtomPrimitive> {
    move |input| {
        map(preceded(char(letter), opt(number::<u8>)), |n| {
            build(n.unwrap_or(default))
        })(input)
    }
}

fn charge(input: &str) -> Res<AtomPrimitive> {
    let (input, sign) = one_of("+-")(input)?;
    let unit: i8 = if sign == '+' { 1 } else { -1 };
    if let Ok((rest, n)) = number::<i8>(input) {
        return Ok((rest, AtomPrimitive::Charge(unit * n)));
    }
    let repeated = input.chars().take_while(|&c| c == sign).count();
    Ok((
        &input[repeated..],
        AtomPrimitive::Charge(unit * (repeated as i8 + 1)),
    ))
}

fn aliphatic_symbol(input: &str) -> Res<Element> {
    let (rest, first) = satisfy(|c| c.is_ascii_uppercase())(input)?;
    if let Some(second) = rest.chars().next().filter(|c| c.is_ascii_lowercase()) {
        let symbol = format!("{first}{second}");
        if let Some(element) = Element::from_symbol(&symbol) {
            return Ok((&rest[1..], element));
        }
    }
    match Element::from_symbol(&first.to_string()) {
        Some(element) => Ok((rest, element)),
        None => Err(nom::Err::Error(Error::from_error_kind(input, ErrorKind::Verify))),
    }
}

fn aromatic_symbol(input: &str) -> Res<Element> {
    alt((
        value(Element::from_symbol("Se"), tag("se")),
        value(Element::from_symbol("As"), tag("as")),
        map(one_of("bcnops"), |c: char| {
            Element::from_symbol(&c.to_ascii_uppercase().to_string())
        }),
    ))(input)
    .and_then(|(rest, element)| match element {
        Some(element) => Ok((rest, element)),
        None => Err(nom::Err::Error(Error::from_error_kind(input, ErrorKind::Verify))),
    })
}

fn recursive(input: &str) -> Res<AtomPrimitive> {
    map(delimited(tag("$("), chain, char(')')), |pattern| {
        AtomPrimitive::Recursive(Box::new(pattern))
    })(input)
}

fn atom_primitive(input: &str) -> Res<AtomPrimitive> {
    alt((
        recursive,
        value(AtomPrimitive::Any, char('*')),
        map(preceded(char('#'), number::<u8>), AtomPrimitive::AtomicNumber),
        charge,
        map(aromatic_symbol, |element| AtomPrimitive::Element {
            element,
            aromatic: true,
        }),
        value(AtomPrimitive::Aromatic, char('a')),
        value(AtomPrimitive::Aliphatic, char('A')),
        map(preceded(char('R'), opt(number::<u8>)), AtomPrimitive::RingMembership),
        map(preceded(char('r'), opt(number::<u8>)), AtomPrimitive::RingSize),
        counted('D', 1, AtomPrimitive::Degree),
        counted('H', 1, AtomPrimitive::TotalHydrogens),
        counted('h', 1, AtomPrimitive::ImplicitHydrogens),
        counted('X', 1, AtomPrimitive::Connectivity),
        counted('v', 1, AtomPrimitive::Valence),
        map(aliphatic_symbol, |element| AtomPrimitive::Element {
            element,
            aromatic: false,
        }),
    ))(input)
}

fn atom_not(input: &str) -> Res<AtomExpr> {
    alt((
        map(preceded(char('!'), atom_not), |e| AtomExpr::Not(Box::new(e))),
        map(atom_primitive, AtomExpr::Primitive),
    ))(input)
}

fn collapse<E>(mut items: Vec<E>, build: fn(Vec<E>) -> E) -> E {
    if items.len() == 1 {
        items.remove(0)
    } else {
        build(items)
    }
}

fn atom_high_and(input: &str) -> Res<AtomExpr> {
    map(many1(preceded(opt(char('&')), atom_not)), |items| {
        collapse(items, AtomExpr::And)
    })(input)
}

fn atom_or(input: &str) -> Res<AtomExpr> {
    map(separated_list1(char(','), atom_high_and), |items| {
        collapse(items, AtomExpr::Or)
    })(input)
}

fn atom_expr(input: &str) -> Res<AtomExpr> {
    map(separated_list1(char(';'), atom_or), |items| {
        collapse(items, AtomExpr::And)
    })(input)
}

fn bracket_atom(input: &str) -> Res<Token> {
    let (input, _) = char('[')(input)?;
    let (input, isotope) = opt(number::<u16>)(input)?;
    let (input, expr) = match isotope {
        Some(_) => opt(atom_expr)(input)?,
        None => map(atom_expr, Some)(input)?,
    };
    let (input, atom_map) = opt(preceded(char(':'), number::<u16>))(input)?;
    let (input, _) = char(']')(input)?;
    let expr = match (isotope, expr) {
        (Some(iso), Some(expr)) => {
            AtomExpr::And(vec![AtomExpr::Primitive(AtomPrimitive::Isotope(iso)), expr])
        }
        (Some(iso), None) => AtomExpr::Primitive(AtomPrimitive::Isotope(iso)),
        (None, Some(expr)) => expr,
        (None, None) => AtomExpr::Primitive(AtomPrimitive::Any),
    };
    Ok((input, Token::Atom(expr, atom_map)))
}

fn organic_atom(input: &str) -> Res<Token> {
    let organic = |element: Element, aromatic: bool| {
        Token::Atom(
            AtomExpr::Primitive(AtomPrimitive::Element { element, aromatic }),
            None,
        )
    };
    alt((
        value(Token::Atom(AtomExpr::Primitive(AtomPrimitive::Any), None), char('*')),
        value(
            Token::Atom(AtomExpr::Primitive(AtomPrimitive::Aromatic), None),
            char('a'),
        ),
        value(
            Token::Atom(AtomExpr::Primitive(AtomPrimitive::Aliphatic), None),
            char('A'),
        ),
        map(aromatic_symbol, move |e| organic(e, true)),
        map_res(
            alt((
                tag("Cl"),
                tag("Br"),
                tag("B"),
                tag("C"),
                tag("N"),
                tag("O"),
                tag("P"),
                tag("S"),
                tag("F"),
                tag("I"),
            )),
            move |symbol: &str| {
                Element::from_symbol(symbol)
                    .map(|e| organic(e, false))
                    .ok_or("unknown organic symbol")
            },
        ),
    ))(input)
}

// ---------------------------------------------------------------------
// Bond expressions
// ---------------------------------------------------------------------

fn bond_primitive(input: &str) -> Res<BondPrimitive> {
    alt((
        value(BondPrimitive::Single, one_of("-/\\")),
        value(BondPrimitive::Double, char('=')),
        value(BondPrimitive::Triple, char('#')),
        value(BondPrimitive::Aromatic, char(':')),
        value(BondPrimitive::Any, char('~')),
        value(BondPrimitive::Ring, char('@')),
    ))(input)
}

fn bond_not(input: &str) -> Res<BondExpr> {
    alt((
        map(preceded(char('!'), bond_not), |e| BondExpr::Not(Box::new(e))),
        map(bond_primitive, BondExpr::Primitive),
    ))(input)
}

fn bond_high_and(input: &str) -> Res<BondExpr> {
    map(many1(preceded(opt(char('&')), bond_not)), |items| {
        collapse(items, BondExpr::And)
    })(input)
}

fn bond_or(input: &str) -> Res<BondExpr> {
    map(separated_list1(char(','), bond_high_and), |items| {
        collapse(items, BondExpr::Or)
    })(input)
}

fn bond_expr(input: &str) -> Res<BondExpr> {
    map(separated_list1(char(';'), bond_or), |items| {
        collapse(items, BondExpr::And)
    })(input)
}

// ---------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------

fn ring_number(input: &str) -> Res<u16> {
    alt((
        map_res(
            preceded(char('%'), pair(satisfy(|c| c.is_ascii_digit()), digit0)),
            |(first, rest): (char, &str)| format!("{first}{rest}").parse::<u16>(),
        ),
        map(satisfy(|c| c.is_ascii_digit()), |c| {
            c.to_digit(10).unwrap_or(0) as u16
        }),
    ))(input)
}

fn token(input: &str) -> Res<Token> {
    alt((
        bracket_atom,
        organic_atom,
        map(ring_number, Token::Ring),
        map(bond_expr, Token::Bond),
        value(Token::BranchOpen, char('(')),
        value(Token::BranchClose, char(')')),
        value(Token::Dot, char('.')),
    ))(input)
}

/// Parse tokens up to an unmatched `)` or the end of input and assemble
/// them into a query graph.
fn chain(input: &str) -> Res<SmartsPattern> {
    let mut rest = input;
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    while !rest.is_empty() {
        if rest.starts_with(')') && depth == 0 {
            break;
        }
        let (next, tok) = token(rest)?;
        match tok {
            Token::BranchOpen => depth += 1,
            Token::BranchClose => depth -= 1,
            _ => {}
        }
        tokens.push(tok);
        rest = next;
    }
    match assemble(tokens) {
        Ok(pattern) => Ok((rest, pattern)),
        Err(_) => Err(nom::Err::Failure(Error::from_error_kind(
            input,
            ErrorKind::Verify,
        ))),
    }
}

fn assemble(tokens: Vec<Token>) -> Result<SmartsPattern, String> {
    let mut pattern = SmartsPattern::default();
    let mut prev: Option<usize> = None;
    let mut branches = Vec::new();
    let mut pending: Option<BondExpr> = None;
    let mut rings: BTreeMap<u16, (usize, Option<BondExpr>)> = BTreeMap::new();

    for tok in tokens {
        match tok {
            Token::Atom(expr, atom_map) => {
                let index = pattern.atoms.len();
                pattern.atoms.push(PatternAtom { expr, map: atom_map });
                if let Some(p) = prev {
                    pattern.bonds.push(PatternBond {
                        a: p,
                        b: index,
                        expr: pending.take().unwrap_or(BondExpr::Implicit),
                    });
                } else if pending.is_some() {
                    return Err("bond without a preceding atom".to_string());
                }
                prev = Some(index);
            }
            Token::Bond(expr) => {
                if pending.is_some() {
                    return Err("two consecutive bonds".to_string());
                }
                pending = Some(expr);
            }
            Token::BranchOpen => {
                branches.push(prev.ok_or("branch without a preceding atom")?);
            }
            Token::BranchClose => {
                prev = Some(branches.pop().ok_or("unmatched ')'")?);
            }
            Token::Ring(number) => {
                let current = prev.ok_or("ring closure without a preceding atom")?;
                match rings.remove(&number) {
                    Some((open, open_expr)) => pattern.bonds.push(PatternBond {
                        a: open,
                        b: current,
                        expr: pending.take().or(open_expr).unwrap_or(BondExpr::Implicit),
                    }),
                    None => {
                        rings.insert(number, (current, pending.take()));
                    }
                }
            }
            Token::Dot => prev = None,
        }
    }
    if !branches.is_empty() {
        return Err("unclosed branch".to_string());
    }
    if !rings.is_empty() {
        return Err("unclosed ring".to_string());
    }
    if pending.is_some() {
        return Err("dangling bond".to_string());
    }
    if pattern.atoms.is_empty() {
        return Err("empty pattern".to_string());
    }
    Ok(pattern)
}

/// Parse a SMARTS string.
///
/// # Returns
///
/// * `Result<SmartsPattern, String>` - The query, or a readable trace of
///   where parsing failed.
pub fn parse_smarts(input: &str) -> Result<SmartsPattern, String> {
    let trimmed = input.trim();
    match all_consuming(chain)(trimmed) {
        Ok((_, pattern)) => Ok(pattern),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(convert_error(trimmed, e)),
        Err(nom::Err::Incomplete(_)) => Err("incomplete".to_string()),
    }
}

// ---------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------

/// Per-molecule data shared by every query evaluated against it.
pub struct MatchContext<'m> {
    mol: &'m Molecule,
    ring_bonds: HashSet<EdgeIndex>,
}

impl<'m> MatchContext<'m> {
    pub fn new(mol: &'m Molecule) -> Self {
        Self {
            mol,
            ring_bonds: mol.ring_bonds(),
        }
    }

    pub fn molecule(&self) -> &'m Molecule {
        self.mol
    }

    fn in_ring(&self, atom: NodeIndex) -> bool {
        self.mol
            .graph()
            .edges(atom)
            .any(|e| self.ring_bonds.contains(&e.id()))
    }

    /// Size of the smallest ring through `atom`, via BFS around each ring bond.
    fn smallest_ring(&self, atom: NodeIndex) -> Option<usize> {
        let graph = self.mol.graph();
        let mut best: Option<usize> = None;
        for edge in graph.edges(atom).filter(|e| self.ring_bonds.contains(&e.id())) {
            let start = if edge.source() == atom {
                edge.target()
            } else {
                edge.source()
            };
            let mut dist = vec![usize::MAX; graph.node_count()];
            dist[start.index()] = 0;
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                if node == atom {
                    break;
                }
                for e in graph.edges(node) {
                    if e.id() == edge.id() {
                        continue;
                    }
                    let next = if e.source() == node { e.target() } else { e.source() };
                    if dist[next.index()] == usize::MAX {
                        dist[next.index()] = dist[node.index()] + 1;
                        queue.push_back(next);
                    }
                }
            }
            if dist[atom.index()] != usize::MAX {
                let size = dist[atom.index()] + 1;
                best = Some(best.map_or(size, |b| b.min(size)));
            }
        }
        best
    }

    fn atom_matches(&self, expr: &AtomExpr, atom: NodeIndex) -> bool {
        match expr {
            AtomExpr::Primitive(p) => self.primitive_matches(p, atom),
            AtomExpr::Not(e) => !self.atom_matches(e, atom),
            AtomExpr::And(es) => es.iter().all(|e| self.atom_matches(e, atom)),
            AtomExpr::Or(es) => es.iter().any(|e| self.atom_matches(e, atom)),
        }
    }

    fn primitive_matches(&self, primitive: &AtomPrimitive, node: NodeIndex) -> bool {
        let mol = self.mol;
        let atom = mol.atom(node);
        match primitive {
            AtomPrimitive::Any => true,
            AtomPrimitive::Element { element, aromatic } => {
                atom.element == *element && atom.aromatic == *aromatic
            }
            AtomPrimitive::AtomicNumber(n) => atom.element.atomic_number() == *n,
            AtomPrimitive::Aromatic => atom.aromatic,
            AtomPrimitive::Aliphatic => !atom.aromatic,
            AtomPrimitive::Isotope(iso) => atom.isotope == Some(*iso),
            AtomPrimitive::Charge(c) => atom.charge == *c,
            AtomPrimitive::TotalHydrogens(h) => mol.total_hydrogens(node) == *h as usize,
            AtomPrimitive::ImplicitHydrogens(h) => atom.hydrogens == *h,
            AtomPrimitive::Degree(d) => mol.degree(node) == *d as usize,
            AtomPrimitive::Connectivity(x) => {
                mol.degree(node) + atom.hydrogens as usize == *x as usize
            }
            AtomPrimitive::Valence(v) => {
                let aromatic_bonds = mol
                    .graph()
                    .edges(node)
                    .filter(|e| e.weight().order == BondOrder::Aromatic)
                    .count() as u32;
                // Aromatic bonds count one and a half; round the pi bond up.
                let valence = mol.valence_sum(node)
                    + aromatic_bonds.div_ceil(2)
                    + atom.hydrogens as u32;
                valence == *v as u32
            }
            AtomPrimitive::RingMembership(Some(0)) => !self.in_ring(node),
            AtomPrimitive::RingMembership(_) => self.in_ring(node),
            AtomPrimitive::RingSize(None) => self.in_ring(node),
            AtomPrimitive::RingSize(Some(n)) => self.smallest_ring(node) == Some(*n as usize),
            AtomPrimitive::Recursive(pattern) => pattern.matches_at(self, node),
        }
    }

    fn bond_matches(&self, expr: &BondExpr, bond: EdgeIndex) -> bool {
        let order = self.mol.bond(bond).order;
        match expr {
            BondExpr::Implicit => matches!(order, BondOrder::Single | BondOrder::Aromatic),
            BondExpr::Primitive(p) => match p {
                BondPrimitive::Single => order == BondOrder::Single,
                BondPrimitive::Double => order == BondOrder::Double,
                BondPrimitive::Triple => order == BondOrder::Triple,
                BondPrimitive::Aromatic => order == BondOrder::Aromatic,
                BondPrimitive::Any => true,
                BondPrimitive::Ring => self.ring_bonds.contains(&bond),
            },
            BondExpr::Not(e) => !self.bond_matches(e, bond),
            BondExpr::And(es) => es.iter().all(|e| self.bond_matches(e, bond)),
            BondExpr::Or(es) => es.iter().any(|e| self.bond_matches(e, bond)),
        }
    }
}

impl SmartsPattern {
    /// Index of the query atom carrying atom map `label`.
    pub fn mapped_atom(&self, label: u16) -> Option<usize> {
        self.atoms.iter().position(|a| a.map == Some(label))
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&PatternBond> {
        self.bonds
            .iter()
            .find(|bond| (bond.a == a && bond.b == b) || (bond.a == b && bond.b == a))
    }

    /// Every embedding of the query, as molecule atoms indexed by query atom.
    pub fn find_matches(&self, ctx: &MatchContext) -> Vec<Vec<NodeIndex>> {
        let mut results = Vec::new();
        self.search(ctx, &mut Vec::new(), &mut results, false);
        results
    }

    /// Whether the query matches with its first atom mapped onto `anchor`.
    pub fn matches_at(&self, ctx: &MatchContext, anchor: NodeIndex) -> bool {
        if !ctx.atom_matches(&self.atoms[0].expr, anchor) {
            return false;
        }
        let mut results = Vec::new();
        self.search(ctx, &mut vec![anchor], &mut results, true)
    }

    fn search(
        &self,
        ctx: &MatchContext,
        mapping: &mut Vec<NodeIndex>,
        results: &mut Vec<Vec<NodeIndex>>,
        first_only: bool,
    ) -> bool {
        let k = mapping.len();
        if k == self.atoms.len() {
            results.push(mapping.clone());
            return first_only;
        }
        let graph = ctx.mol.graph();
        let earlier: Vec<(usize, &BondExpr)> = self
            .bonds
            .iter()
            .filter_map(|bond| {
                if bond.b == k && bond.a < k {
                    Some((bond.a, &bond.expr))
                } else if bond.a == k && bond.b < k {
                    Some((bond.b, &bond.expr))
                } else {
                    None
                }
            })
            .collect();
        let candidates: Vec<NodeIndex> = match earlier.first() {
            Some(&(j, _)) => graph.neighbors(mapping[j]).collect(),
            None => graph.node_indices().collect(),
        };
        for candidate in candidates {
            if mapping.contains(&candidate) || !ctx.atom_matches(&self.atoms[k].expr, candidate) {
                continue;
            }
            let bonds_ok = earlier.iter().all(|&(j, expr)| {
                graph
                    .find_edge(mapping[j], candidate)
                    .is_some_and(|e| ctx.bond_matches(expr, e))
            });
            if !bonds_ok {
                continue;
            }
            mapping.push(candidate);
            let done = self.search(ctx, mapping, results, first_only);
            mapping.pop();
            if done {
                return true;
            }
        }
        false
    }
}
