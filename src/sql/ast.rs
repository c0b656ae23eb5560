//! Expression and command model
//!
//! Commands arrive already parsed and resolved; this module only defines the
//! in-memory shapes that planning and execution operate on.

use std::fmt;

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Blob(Vec<u8>),
    Timestamp(i64),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Blob(b) => write!(f, "X'{}'", b.iter().map(|x| format!("{:02X}", x)).collect::<String>()),
            Literal::Timestamp(t) => write!(f, "TIMESTAMP({})", t),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // String
    Like,
    NotLike,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// Reference to a group element
///
/// `index` is the position of the value in the row the expression is
/// evaluated against. Sources resolve references by `name` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub group: String,
    pub name: String,
    pub index: usize,
}

impl ColumnRef {
    pub fn new(group: impl Into<String>, name: impl Into<String>, index: usize) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            index,
        }
    }

    /// Check whether this references `name` (case-insensitive)
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Resolved expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(ColumnRef),
    /// Literal value
    Literal(Literal),
    /// Procedure variable, bound at execution time
    Variable(String),
    /// Binary operation
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operation
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
    /// Scalar function call
    Function { name: String, args: Vec<Expr> },
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// IN (list)
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// BETWEEN
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    pub fn column(group: impl Into<String>, name: impl Into<String>, index: usize) -> Expr {
        Expr::Column(ColumnRef::new(group, name, index))
    }

    pub fn literal(lit: Literal) -> Expr {
        Expr::Literal(lit)
    }

    pub fn int(value: i64) -> Expr {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::Literal(Literal::Boolean(value))
    }

    pub fn variable(name: impl Into<String>) -> Expr {
        Expr::Variable(name.into())
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOp::Eq, right)
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOp::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOp::Or, right)
    }

    pub fn not(expr: Expr) -> Expr {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    pub fn in_list(expr: Expr, list: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(expr),
            list,
            negated: false,
        }
    }

    /// Direct children of this expression
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Variable(_) => vec![],
            Expr::BinaryOp { left, right, .. } => vec![left, right],
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => vec![expr],
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::InList { expr, list, .. } => {
                let mut out: Vec<&Expr> = vec![expr];
                out.extend(list.iter());
                out
            }
            Expr::Between {
                expr, low, high, ..
            } => vec![expr, low, high],
        }
    }

    /// True if `pred` holds for this expression or any descendant
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    /// All column references, in traversal order
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        if let Expr::Column(col) = self {
            out.push(col);
        }
        for child in self.children() {
            child.collect_columns(out);
        }
    }

    /// True if the expression references neither columns nor variables
    pub fn is_constant(&self) -> bool {
        !self.any(&|e| matches!(e, Expr::Column(_) | Expr::Variable(_)))
    }

    /// Rewrite the tree bottom-up; `f` sees each node after its children
    pub fn transform(self, f: &mut dyn FnMut(Expr) -> Expr) -> Expr {
        let rebuilt = match self {
            Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
                left: Box::new(left.transform(f)),
                op,
                right: Box::new(right.transform(f)),
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp {
                op,
                expr: Box::new(expr.transform(f)),
            },
            Expr::Function { name, args } => Expr::Function {
                name,
                args: args.into_iter().map(|a| a.transform(f)).collect(),
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.transform(f)),
                negated,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => Expr::InList {
                expr: Box::new(expr.transform(f)),
                list: list.into_iter().map(|e| e.transform(f)).collect(),
                negated,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: Box::new(expr.transform(f)),
                low: Box::new(low.transform(f)),
                high: Box::new(high.transform(f)),
                negated,
            },
            leaf => leaf,
        };
        f(rebuilt)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col.name),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Variable(name) => write!(f, "VARIABLES.{}", name),
            Expr::BinaryOp { left, op, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::UnaryOp { op, expr } => match op {
                UnaryOp::Not => write!(f, "NOT {}", expr),
                UnaryOp::Neg => write!(f, "-{}", expr),
            },
            Expr::Function { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(|a| a.to_string()).collect();
                write!(
                    f,
                    "{} {}IN ({})",
                    expr,
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                expr,
                if *negated { "NOT " } else { "" },
                low,
                high
            ),
        }
    }
}

/// Query against a single group
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub group: String,
    /// (expression, output name)
    pub select: Vec<(Expr, String)>,
    pub criteria: Option<Expr>,
    /// (expression, ascending)
    pub order_by: Vec<(Expr, bool)>,
    pub limit: Option<u64>,
}

impl Query {
    /// Select the named columns of `group`, in order
    pub fn new<I, S>(group: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group = group.into();
        let select = columns
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.into();
                (Expr::column(group.clone(), name.clone(), i), name)
            })
            .collect();
        Self {
            group,
            select,
            criteria: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn with_criteria(mut self, criteria: Expr) -> Self {
        self.criteria = Some(criteria);
        self
    }
}

/// INSERT ... VALUES
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub group: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
}

/// UPDATE ... SET ... WHERE
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub group: String,
    /// (element name, new value)
    pub assignments: Vec<(String, Expr)>,
    pub criteria: Option<Expr>,
}

/// DELETE ... WHERE
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub group: String,
    pub criteria: Option<Expr>,
}

/// Command sent to a physical source
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Query(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    /// Several update commands submitted in one request; the source returns
    /// one update count per command, in order
    Batched(Vec<Command>),
}

impl Command {
    /// Target group; a batch reports its first command's group
    pub fn group(&self) -> Option<&str> {
        match self {
            Command::Query(q) => Some(&q.group),
            Command::Insert(i) => Some(&i.group),
            Command::Update(u) => Some(&u.group),
            Command::Delete(d) => Some(&d.group),
            Command::Batched(cmds) => cmds.first().and_then(|c| c.group()),
        }
    }

    pub fn criteria(&self) -> Option<&Expr> {
        match self {
            Command::Query(q) => q.criteria.as_ref(),
            Command::Update(u) => u.criteria.as_ref(),
            Command::Delete(d) => d.criteria.as_ref(),
            Command::Insert(_) | Command::Batched(_) => None,
        }
    }

    pub fn criteria_mut(&mut self) -> Option<&mut Option<Expr>> {
        match self {
            Command::Query(q) => Some(&mut q.criteria),
            Command::Update(u) => Some(&mut u.criteria),
            Command::Delete(d) => Some(&mut d.criteria),
            Command::Insert(_) | Command::Batched(_) => None,
        }
    }

    /// True for commands that return update counts instead of rows
    pub fn is_update(&self) -> bool {
        !matches!(self, Command::Query(_))
    }

    /// Number of values in each result row
    pub fn output_width(&self) -> usize {
        match self {
            Command::Query(q) => q.select.len(),
            _ => 1,
        }
    }

    /// Apply `f` to every top-level expression held by the command
    pub fn for_each_expr_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            Command::Query(q) => {
                q.select.iter_mut().for_each(|(e, _)| f(e));
                if let Some(c) = q.criteria.as_mut() {
                    f(c);
                }
                q.order_by.iter_mut().for_each(|(e, _)| f(e));
            }
            Command::Insert(i) => i.values.iter_mut().flatten().for_each(f),
            Command::Update(u) => {
                u.assignments.iter_mut().for_each(|(_, e)| f(e));
                if let Some(c) = u.criteria.as_mut() {
                    f(c);
                }
            }
            Command::Delete(d) => {
                if let Some(c) = d.criteria.as_mut() {
                    f(c);
                }
            }
            Command::Batched(cmds) => cmds.iter_mut().for_each(|c| c.for_each_expr_mut(f)),
        }
    }

    /// Rewrite every expression held by the command with `f` (bottom-up)
    pub fn transform_exprs(&mut self, f: &mut dyn FnMut(Expr) -> Expr) {
        self.for_each_expr_mut(&mut |e| {
            let taken = std::mem::replace(e, Expr::Literal(Literal::Null));
            *e = taken.transform(f);
        });
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Query(q) => {
                let items: Vec<String> = q.select.iter().map(|(e, _)| e.to_string()).collect();
                write!(f, "SELECT {} FROM {}", items.join(", "), q.group)?;
                if let Some(c) = &q.criteria {
                    write!(f, " WHERE {}", c)?;
                }
                if !q.order_by.is_empty() {
                    let keys: Vec<String> = q
                        .order_by
                        .iter()
                        .map(|(e, asc)| format!("{}{}", e, if *asc { "" } else { " DESC" }))
                        .collect();
                    write!(f, " ORDER BY {}", keys.join(", "))?;
                }
                if let Some(l) = q.limit {
                    write!(f, " LIMIT {}", l)?;
                }
                Ok(())
            }
            Command::Insert(i) => {
                let rows: Vec<String> = i
                    .values
                    .iter()
                    .map(|row| {
                        let vals: Vec<String> = row.iter().map(|e| e.to_string()).collect();
                        format!("({})", vals.join(", "))
                    })
                    .collect();
                write!(
                    f,
                    "INSERT INTO {} ({}) VALUES {}",
                    i.group,
                    i.columns.join(", "),
                    rows.join(", ")
                )
            }
            Command::Update(u) => {
                let sets: Vec<String> = u
                    .assignments
                    .iter()
                    .map(|(c, e)| format!("{} = {}", c, e))
                    .collect();
                write!(f, "UPDATE {} SET {}", u.group, sets.join(", "))?;
                if let Some(c) = &u.criteria {
                    write!(f, " WHERE {}", c)?;
                }
                Ok(())
            }
            Command::Delete(d) => {
                write!(f, "DELETE FROM {}", d.group)?;
                if let Some(c) = &d.criteria {
                    write!(f, " WHERE {}", c)?;
                }
                Ok(())
            }
            Command::Batched(cmds) => {
                let parts: Vec<String> = cmds.iter().map(|c| c.to_string()).collect();
                write!(f, "BATCH [{}]", parts.join("; "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_collected_in_order() {
        let expr = Expr::and(
            Expr::eq(Expr::column("t", "a", 0), Expr::int(1)),
            Expr::eq(Expr::column("t", "b", 1), Expr::variable("x")),
        );
        let names: Vec<_> = expr.columns().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(!expr.is_constant());
    }

    #[test]
    fn test_transform_replaces_columns() {
        let expr = Expr::eq(Expr::column("t", "SOURCE_NAME", 2), Expr::string("a"));
        let rewritten = expr.transform(&mut |e| match e {
            Expr::Column(c) if c.is_named("source_name") => Expr::string("a"),
            other => other,
        });
        assert!(rewritten.is_constant());
    }

    #[test]
    fn test_command_display() {
        let query = Query::new("pm.parts", ["id", "name"])
            .with_criteria(Expr::eq(Expr::column("pm.parts", "id", 0), Expr::int(5)));
        assert_eq!(
            Command::Query(query).to_string(),
            "SELECT id, name FROM pm.parts WHERE (id = 5)"
        );
    }

    #[test]
    fn test_batched_group() {
        let cmd = Command::Batched(vec![Command::Delete(Delete {
            group: "pm.parts".to_string(),
            criteria: None,
        })]);
        assert_eq!(cmd.group(), Some("pm.parts"));
        assert!(cmd.is_update());
        assert_eq!(cmd.output_width(), 1);
    }
}
