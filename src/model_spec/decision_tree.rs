//! Decision tree (DT) representation for deterministic GMTK variable mappings
//!
//! A tree maps the values of its parent variables `p0..pN` to a single child value, either as a
//! constant or through a formula over the parent values. Every split carries a default branch,
//! so every combination of parent values selects exactly one leaf.
//!

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Eq => "==",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Eq => 1,
            Self::Add | Self::Sub => 2,
            Self::Mul => 3,
        }
    }

    fn is_associative(&self) -> bool {
        matches!(self, Self::Add | Self::Mul)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Function {
    Mod,
    Max,
}

impl Function {
    fn name(&self) -> &'static str {
        match self {
            Self::Mod => "mod",
            Self::Max => "max",
        }
    }
}

/// Integer formula over parent values and symbolic constants
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Parent(usize),
    Int(i64),
    Symbol(String),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn parent(index: usize) -> Self {
        Self::Parent(index)
    }

    pub fn int(value: i64) -> Self {
        Self::Int(value)
    }

    pub fn symbol(name: &str) -> Self {
        Self::Symbol(name.to_string())
    }

    fn binary(self, op: BinaryOp, rhs: Expr) -> Self {
        Self::Binary(op, Box::new(self), Box::new(rhs))
    }

    pub fn plus(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn minus(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn times(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn equals(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn modulo(lhs: Expr, rhs: Expr) -> Self {
        Self::Call(Function::Mod, Box::new(lhs), Box::new(rhs))
    }

    pub fn max(lhs: Expr, rhs: Expr) -> Self {
        Self::Call(Function::Max, Box::new(lhs), Box::new(rhs))
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Binary(op, _, _) => op.precedence(),
            _ => 4,
        }
    }

    /// All parent indices referenced in this formula
    pub fn parent_refs(&self) -> Vec<usize> {
        match self {
            Self::Parent(x) => vec![*x],
            Self::Int(_) | Self::Symbol(_) => Vec::new(),
            Self::Binary(_, lhs, rhs) | Self::Call(_, lhs, rhs) => {
                let mut refs = lhs.parent_refs();
                refs.extend(rhs.parent_refs());
                refs
            }
        }
    }

    /// Evaluate the formula
    ///
    /// Returns None if a parent index or symbol can't be resolved, or for a zero modulus.
    ///
    pub fn eval(&self, parents: &[i64], symbols: &BTreeMap<String, i64>) -> Option<i64> {
        match self {
            Self::Parent(x) => parents.get(*x).copied(),
            Self::Int(x) => Some(*x),
            Self::Symbol(x) => symbols.get(x).copied(),
            Self::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(parents, symbols)?;
                let rhs = rhs.eval(parents, symbols)?;
                Some(match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Eq => (lhs == rhs) as i64,
                })
            }
            Self::Call(func, lhs, rhs) => {
                let lhs = lhs.eval(parents, symbols)?;
                let rhs = rhs.eval(parents, symbols)?;
                match func {
                    Function::Mod => lhs.checked_rem_euclid(rhs),
                    Function::Max => Some(lhs.max(rhs)),
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent(x) => write!(f, "p{x}"),
            Self::Int(x) => write!(f, "{x}"),
            Self::Symbol(x) => write!(f, "{x}"),
            Self::Binary(op, lhs, rhs) => {
                let prec = op.precedence();
                if lhs.precedence() < prec {
                    write!(f, "({lhs})")?;
                } else {
                    write!(f, "{lhs}")?;
                }
                write!(f, " {} ", op.symbol())?;
                let rhs_prec = rhs.precedence();
                if rhs_prec < prec || (rhs_prec == prec && !op.is_associative()) {
                    write!(f, "({rhs})")
                } else {
                    write!(f, "{rhs}")
                }
            }
            Self::Call(func, lhs, rhs) => write!(f, "{}({lhs}, {rhs})", func.name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Leaf {
    Value(i64),
    Formula(Expr),
}

impl Leaf {
    pub fn eval(&self, parents: &[i64], symbols: &BTreeMap<String, i64>) -> Option<i64> {
        match self {
            Self::Value(x) => Some(*x),
            Self::Formula(expr) => expr.eval(parents, symbols),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecisionNode {
    /// Branch on the value of one parent: the first case whose value matches is taken,
    /// otherwise the default branch.
    Split {
        parent: usize,
        cases: Vec<(i64, DecisionNode)>,
        default: Box<DecisionNode>,
    },
    Leaf(Leaf),
}

impl DecisionNode {
    pub fn split(parent: usize, cases: Vec<(i64, DecisionNode)>, default: DecisionNode) -> Self {
        Self::Split {
            parent,
            cases,
            default: Box::new(default),
        }
    }

    pub fn value(value: i64) -> Self {
        Self::Leaf(Leaf::Value(value))
    }

    pub fn formula(expr: Expr) -> Self {
        Self::Leaf(Leaf::Formula(expr))
    }

    /// Number of branches out of this node, including the default branch
    pub fn arity(&self) -> usize {
        match self {
            Self::Split { cases, .. } => cases.len() + 1,
            Self::Leaf(_) => 0,
        }
    }

    fn select_leaf(&self, parents: &[i64]) -> Option<&Leaf> {
        match self {
            Self::Split {
                parent,
                cases,
                default,
            } => {
                let parent_value = *parents.get(*parent)?;
                let child = cases
                    .iter()
                    .find(|(value, _)| *value == parent_value)
                    .map(|(_, child)| child)
                    .unwrap_or(default.as_ref());
                child.select_leaf(parents)
            }
            Self::Leaf(leaf) => Some(leaf),
        }
    }

    /// Visit every node in the subtree, depth first, parents before children
    pub fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a DecisionNode)) {
        visitor(self);
        if let Self::Split { cases, default, .. } = self {
            for (_, child) in cases {
                child.visit(visitor);
            }
            default.visit(visitor);
        }
    }

    fn render(&self, indent: usize, lines: &mut Vec<String>) {
        let pad = " ".repeat(indent);
        match self {
            Self::Split {
                parent,
                cases,
                default,
            } => {
                let split_values = cases.iter().map(|(value, _)| value.to_string());
                let fields = [parent.to_string(), self.arity().to_string()]
                    .into_iter()
                    .chain(split_values)
                    .chain(std::iter::once("default".to_string()))
                    .join(" ");
                lines.push(format!("{pad}{fields}"));
                for (_, child) in cases {
                    child.render(indent + 2, lines);
                }
                default.render(indent + 2, lines);
            }
            Self::Leaf(Leaf::Value(x)) => lines.push(format!("{pad}-1 {x}")),
            Self::Leaf(Leaf::Formula(expr)) => lines.push(format!("{pad}-1 {{ {expr} }}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecisionTree {
    pub parent_count: usize,
    pub root: DecisionNode,
}

impl DecisionTree {
    pub fn new(parent_count: usize, root: DecisionNode) -> Self {
        Self { parent_count, root }
    }

    /// Find the leaf selected by the given parent values
    pub fn select_leaf(&self, parents: &[i64]) -> Option<&Leaf> {
        if parents.len() != self.parent_count {
            return None;
        }
        self.root.select_leaf(parents)
    }

    pub fn eval(&self, parents: &[i64], symbols: &BTreeMap<String, i64>) -> Option<i64> {
        self.select_leaf(parents)?.eval(parents, symbols)
    }

    /// Render to the GMTK DT body format: the parent count followed by the tree
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = vec![self.parent_count.to_string()];
        self.root.render(0, &mut lines);
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_display() {
        let expr = Expr::modulo(Expr::parent(0), Expr::symbol("RULER_SCALE")).equals(Expr::int(0));
        assert_eq!(expr.to_string(), "mod(p0, RULER_SCALE) == 0");

        let expr = Expr::parent(0)
            .times(Expr::symbol("CARD_SUBSEG"))
            .plus(Expr::parent(1));
        assert_eq!(expr.to_string(), "p0 * CARD_SUBSEG + p1");

        let expr = Expr::max(Expr::parent(3).minus(Expr::int(1)), Expr::int(0));
        assert_eq!(expr.to_string(), "max(p3 - 1, 0)");

        // Parenthesize only where precedence requires it
        let expr = Expr::parent(0).plus(Expr::parent(1)).times(Expr::int(2));
        assert_eq!(expr.to_string(), "(p0 + p1) * 2");
        let expr = Expr::parent(0).minus(Expr::parent(1).minus(Expr::int(2)));
        assert_eq!(expr.to_string(), "p0 - (p1 - 2)");
    }

    #[test]
    fn test_expr_eval() {
        let symbols = BTreeMap::from([("RULER_SCALE".to_string(), 10)]);
        let expr = Expr::modulo(Expr::parent(0), Expr::symbol("RULER_SCALE")).equals(Expr::int(0));
        assert_eq!(expr.eval(&[20], &symbols), Some(1));
        assert_eq!(expr.eval(&[21], &symbols), Some(0));
        assert_eq!(expr.eval(&[21], &BTreeMap::new()), None);

        let expr = Expr::modulo(Expr::parent(0), Expr::int(0));
        assert_eq!(expr.eval(&[3], &symbols), None);
    }

    #[test]
    fn test_parent_refs() {
        let expr = Expr::max(Expr::parent(3).minus(Expr::int(1)), Expr::parent(1));
        assert_eq!(expr.parent_refs(), vec![3, 1]);
    }

    #[test]
    fn test_tree_render() {
        let tree = DecisionTree::new(
            2,
            DecisionNode::split(
                0,
                vec![(2, DecisionNode::value(1))],
                DecisionNode::formula(Expr::parent(1)),
            ),
        );
        assert_eq!(
            tree.render_lines(),
            vec!["2", "0 2 2 default", "  -1 1", "  -1 { p1 }"]
        );

        let tree = DecisionTree::new(1, DecisionNode::formula(Expr::parent(0)));
        assert_eq!(tree.render_lines(), vec!["1", "-1 { p0 }"]);
    }

    #[test]
    fn test_tree_select() {
        let tree = DecisionTree::new(
            2,
            DecisionNode::split(
                0,
                vec![(0, DecisionNode::value(7)), (1, DecisionNode::value(8))],
                DecisionNode::formula(Expr::parent(1).plus(Expr::int(1))),
            ),
        );
        let symbols = BTreeMap::new();
        assert_eq!(tree.eval(&[0, 5], &symbols), Some(7));
        assert_eq!(tree.eval(&[1, 5], &symbols), Some(8));
        assert_eq!(tree.eval(&[2, 5], &symbols), Some(6));

        // Wrong parent count
        assert_eq!(tree.select_leaf(&[0]), None);
    }

    #[test]
    fn test_visit() {
        let tree = DecisionNode::split(
            0,
            vec![(0, DecisionNode::value(7))],
            DecisionNode::value(8),
        );
        let mut count = 0;
        tree.visit(&mut |_| count += 1);
        assert_eq!(count, 3);
    }
}
