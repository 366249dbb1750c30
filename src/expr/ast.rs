//! Compiled expression trees.
//!
//! A formula string (`loadingValue + unloadingValue`, `ROUND(price * qty, 2)`)
//! compiles once into an [`Exp`]. Backends then render the tree into their
//! own fragment form; the tree itself is backend-neutral.

/// Binary operators accepted in formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    /// The SQL spelling of this operator.
    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Unary operators accepted in formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// One `WHEN condition THEN result` arm of a CASE expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub condition: Exp,
    pub result: Exp,
}

/// A compiled formula expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    /// A reference to a model column, calculated field or measure.
    Column(String),
    /// Numeric literal, kept as written.
    Number(String),
    Text(String),
    Bool(bool),
    Null,
    Unary {
        op: UnaryOp,
        operand: Box<Exp>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Exp>,
        right: Box<Exp>,
    },
    Function {
        /// Uppercased function name.
        name: String,
        args: Vec<Exp>,
    },
    Case {
        operand: Option<Box<Exp>>,
        branches: Vec<CaseBranch>,
        else_result: Option<Box<Exp>>,
    },
    /// A parenthesized subexpression.
    Nested(Box<Exp>),
}

impl Exp {
    /// Visit every node in the tree, depth first.
    pub fn walk(&self, visit: &mut dyn FnMut(&Exp)) {
        visit(self);
        match self {
            Exp::Unary { operand, .. } => operand.walk(visit),
            Exp::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Exp::Function { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Exp::Case {
                operand,
                branches,
                else_result,
            } => {
                if let Some(op) = operand {
                    op.walk(visit);
                }
                for branch in branches {
                    branch.condition.walk(visit);
                    branch.result.walk(visit);
                }
                if let Some(e) = else_result {
                    e.walk(visit);
                }
            }
            Exp::Nested(inner) => inner.walk(visit),
            _ => {}
        }
    }

    /// Every column name referenced by the tree, in visit order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Exp::Column(name) => out.push(name),
            Exp::Unary { operand, .. } => operand.collect_columns(out),
            Exp::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Exp::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
            Exp::Case {
                operand,
                branches,
                else_result,
            } => {
                if let Some(op) = operand {
                    op.collect_columns(out);
                }
                for branch in branches {
                    branch.condition.collect_columns(out);
                    branch.result.collect_columns(out);
                }
                if let Some(e) = else_result {
                    e.collect_columns(out);
                }
            }
            Exp::Nested(inner) => inner.collect_columns(out),
            _ => {}
        }
    }
}
