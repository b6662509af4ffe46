//! Syntax tree the extractor and the runner work on
//!
//! A narrowed view of the full Ruby tree: anything the extractor and the
//! runner do not need to look into is kept as an opaque [`NodeKind::Expr`]
//! with its children, so the walker can still descend into it.

/// Source position and byte span of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line of the first character
    pub line: u32,
    /// 1-based column of the first character
    pub column: u32,
}

impl Span {
    /// Literal source text covered by this span
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

/// A syntax tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

/// Clauses of a `begin ... end` (or of a `def`/`do` body with rescue/ensure)
#[derive(Debug, Clone, PartialEq)]
pub struct BeginClauses {
    pub body: Box<Node>,
    pub rescues: Vec<Node>,
    pub else_body: Option<Box<Node>>,
    pub ensure: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Method call: `recv.method(args)`, `method args`, bare `identifier`
    Send {
        receiver: Option<Box<Node>>,
        method: String,
        args: Vec<Node>,
    },
    /// Call with an attached `do ... end` / `{ ... }` block
    Block { call: Box<Node>, body: Box<Node> },
    /// Statement sequence
    Seq(Vec<Node>),
    /// `begin ... rescue ... else ... ensure ... end`
    Begin(BeginClauses),
    /// `def name(params) ... end`
    Def { name: String, body: Box<Node> },
    /// `class Name < Super ... end`
    Class {
        name: String,
        superclass: Option<Box<Node>>,
        body: Box<Node>,
    },
    /// `module Name ... end`
    Module { name: String, body: Box<Node> },
    /// `if`/`unless`/ternary; `unless` is stored with `negated`
    If {
        cond: Box<Node>,
        then_body: Box<Node>,
        else_body: Option<Box<Node>>,
        negated: bool,
    },
    /// `while`/`until` loop
    While { cond: Box<Node>, body: Box<Node> },
    /// String literal (value without quotes; interpolations kept verbatim)
    Str(String),
    /// `:symbol`
    Sym(String),
    /// Integer or float literal
    Number(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `nil`
    Nil,
    /// `self`
    SelfRef,
    /// Constant or constant path (`RSpec`, `Capybara::Session`)
    Const(String),
    /// `@ivar`, `@@cvar` or `$gvar`
    Var(String),
    /// `[a, b]`
    Array(Vec<Node>),
    /// `{ k => v }` or trailing `k: v` arguments, flattened key/value pairs
    Hash(Vec<Node>),
    /// Any other expression (operators, assignment, lambdas, `return`, ...)
    Expr { op: String, children: Vec<Node> },
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// An empty sequence at `span`
    pub fn empty(span: Span) -> Self {
        Self::new(NodeKind::Seq(Vec::new()), span)
    }

    /// Method name if this node is a call
    pub fn method_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Send { method, .. } => Some(method),
            _ => None,
        }
    }

    /// String value if this node is a plain string literal
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Direct children, in source order
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Send { receiver, args, .. } => {
                receiver.iter().map(|r| r.as_ref()).chain(args.iter()).collect()
            }
            NodeKind::Block { call, body, .. } => vec![call.as_ref(), body.as_ref()],
            NodeKind::Seq(nodes)
            | NodeKind::Array(nodes)
            | NodeKind::Hash(nodes)
            | NodeKind::Expr {
                children: nodes, ..
            } => nodes.iter().collect(),
            NodeKind::Begin(clauses) => {
                let mut out = vec![clauses.body.as_ref()];
                out.extend(clauses.rescues.iter());
                out.extend(clauses.else_body.iter().map(|n| n.as_ref()));
                out.extend(clauses.ensure.iter().map(|n| n.as_ref()));
                out
            }
            NodeKind::Def { body, .. } | NodeKind::Module { body, .. } => vec![body.as_ref()],
            NodeKind::Class {
                superclass, body, ..
            } => superclass
                .iter()
                .map(|s| s.as_ref())
                .chain(std::iter::once(body.as_ref()))
                .collect(),
            NodeKind::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                let mut out = vec![cond.as_ref(), then_body.as_ref()];
                out.extend(else_body.iter().map(|n| n.as_ref()));
                out
            }
            NodeKind::While { cond, body } => vec![cond.as_ref(), body.as_ref()],
            NodeKind::Str(_)
            | NodeKind::Sym(_)
            | NodeKind::Number(_)
            | NodeKind::True
            | NodeKind::False
            | NodeKind::Nil
            | NodeKind::SelfRef
            | NodeKind::Const(_)
            | NodeKind::Var(_) => Vec::new(),
        }
    }

    /// Statements of a body: the items of a sequence, or the node itself
    pub fn statements(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Seq(nodes) => nodes.iter().collect(),
            _ => vec![self],
        }
    }
}
