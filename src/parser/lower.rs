//! Narrowing of the `lib-ruby-parser` tree into [`Node`]

use lib_ruby_parser::nodes;
use lib_ruby_parser::{Loc, Node as RubyNode};

use super::ast::{BeginClauses, Node, NodeKind, Span};

/// Byte offsets of line starts, for 1-based line and column positions
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn position(&self, source: &str, offset: usize) -> (u32, u32) {
        let line = self.starts.partition_point(|&start| start <= offset).max(1);
        let start = self.starts[line - 1];
        // columns count characters, not bytes
        let column = source
            .get(start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(offset.saturating_sub(start));
        (line as u32, column as u32 + 1)
    }
}

pub(super) struct Lowerer<'a> {
    source: &'a str,
    lines: LineIndex,
}

impl<'a> Lowerer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
        }
    }

    /// 1-based line and column of a byte offset
    pub fn position(&self, offset: usize) -> (u32, u32) {
        self.lines.position(self.source, offset)
    }

    pub fn program(&self, ast: Option<&RubyNode>) -> Node {
        let start = Span {
            line: 1,
            column: 1,
            ..Span::default()
        };
        self.body(ast, start)
    }

    fn span(&self, loc: &Loc) -> Span {
        let (line, column) = self.position(loc.begin);
        Span {
            start: loc.begin,
            end: loc.end,
            line,
            column,
        }
    }

    fn text(&self, loc: &Loc) -> &'a str {
        self.source.get(loc.begin..loc.end).unwrap_or("")
    }

    fn list(&self, nodes: &[RubyNode]) -> Vec<Node> {
        nodes.iter().map(|n| self.lower(n)).collect()
    }

    fn boxed(&self, node: &RubyNode) -> Box<Node> {
        Box::new(self.lower(node))
    }

    /// An optional body, empty at `fallback` when absent
    fn body(&self, node: Option<&RubyNode>, fallback: Span) -> Node {
        node.map(|n| self.lower(n))
            .unwrap_or_else(|| Node::empty(fallback))
    }

    fn expr(&self, op: &str, children: Vec<Node>, span: Span) -> Node {
        Node::new(
            NodeKind::Expr {
                op: op.to_string(),
                children,
            },
            span,
        )
    }

    pub fn lower(&self, node: &RubyNode) -> Node {
        let span = self.span(node.expression());
        let kind = match node {
            RubyNode::Send(send) => {
                return self.send(send.recv.as_deref(), &send.method_name, &send.args, span)
            }
            RubyNode::CSend(send) => {
                return self.send(Some(send.recv.as_ref()), &send.method_name, &send.args, span)
            }
            RubyNode::Block(block) => return self.block(&block.call, block.body.as_deref(), span),
            RubyNode::Numblock(block) => return self.block(&block.call, Some(block.body.as_ref()), span),

            RubyNode::Begin(begin) => NodeKind::Seq(self.list(&begin.statements)),
            RubyNode::KwBegin(begin) => match begin.statements.as_slice() {
                [clauses @ (RubyNode::Rescue(_) | RubyNode::Ensure(_))] => {
                    // keep the position of `begin` itself
                    let mut lowered = self.lower(clauses);
                    lowered.span = span;
                    return lowered;
                }
                statements => NodeKind::Seq(self.list(statements)),
            },
            RubyNode::Rescue(rescue) => NodeKind::Begin(self.rescue(rescue, None, span)),
            RubyNode::Ensure(ensure) => {
                let ensure_body = Some(Box::new(self.body(ensure.ensure.as_deref(), span)));
                match ensure.body.as_deref() {
                    Some(RubyNode::Rescue(rescue)) => {
                        NodeKind::Begin(self.rescue(rescue, ensure_body, span))
                    }
                    body => NodeKind::Begin(BeginClauses {
                        body: Box::new(self.body(body, span)),
                        rescues: Vec::new(),
                        else_body: None,
                        ensure: ensure_body,
                    }),
                }
            }

            RubyNode::Def(def) => NodeKind::Def {
                name: def.name.clone(),
                body: Box::new(self.body(def.body.as_deref(), span)),
            },
            RubyNode::Defs(def) => NodeKind::Def {
                name: def.name.clone(),
                body: Box::new(self.body(def.body.as_deref(), span)),
            },
            RubyNode::Class(class) => NodeKind::Class {
                name: self.const_path(&class.name),
                superclass: class.superclass.as_deref().map(|s| self.boxed(s)),
                body: Box::new(self.body(class.body.as_deref(), span)),
            },
            RubyNode::Module(module) => NodeKind::Module {
                name: self.const_path(&module.name),
                body: Box::new(self.body(module.body.as_deref(), span)),
            },
            RubyNode::SClass(sclass) => NodeKind::Module {
                name: "<< self".to_string(),
                body: Box::new(self.body(sclass.body.as_deref(), span)),
            },

            RubyNode::If(cond) => self.conditional(
                &cond.cond,
                cond.if_true.as_deref(),
                cond.if_false.as_deref(),
                &cond.keyword_l,
                span,
            ),
            RubyNode::IfMod(cond) => self.conditional(
                &cond.cond,
                cond.if_true.as_deref(),
                cond.if_false.as_deref(),
                &cond.keyword_l,
                span,
            ),
            RubyNode::IfTernary(cond) => NodeKind::If {
                cond: self.boxed(&cond.cond),
                then_body: self.boxed(&cond.if_true),
                else_body: Some(self.boxed(&cond.if_false)),
                negated: false,
            },
            RubyNode::Case(case) => {
                return self.case(case.expr.as_deref(), &case.when_bodies, case.else_body.as_deref(), span)
            }
            RubyNode::CaseMatch(case) => {
                return self.case(Some(case.expr.as_ref()), &case.in_bodies, case.else_body.as_deref(), span)
            }

            RubyNode::While(while_) => NodeKind::While {
                cond: self.boxed(&while_.cond),
                body: Box::new(self.body(while_.body.as_deref(), span)),
            },
            RubyNode::WhilePost(while_) => NodeKind::While {
                cond: self.boxed(&while_.cond),
                body: self.boxed(&while_.body),
            },
            RubyNode::Until(until) => NodeKind::While {
                cond: Box::new(self.negate(&until.cond)),
                body: Box::new(self.body(until.body.as_deref(), span)),
            },
            RubyNode::UntilPost(until) => NodeKind::While {
                cond: Box::new(self.negate(&until.cond)),
                body: self.boxed(&until.body),
            },
            RubyNode::For(for_) => NodeKind::While {
                cond: self.boxed(&for_.iteratee),
                body: Box::new(self.body(for_.body.as_deref(), span)),
            },

            RubyNode::Str(s) => NodeKind::Str(s.value.to_string_lossy()),
            RubyNode::Dstr(s) => NodeKind::Str(self.parts(&s.parts)),
            RubyNode::Heredoc(s) => NodeKind::Str(self.parts(&s.parts)),
            RubyNode::Sym(s) => NodeKind::Sym(s.name.to_string_lossy()),
            RubyNode::Dsym(s) => NodeKind::Sym(self.parts(&s.parts)),
            RubyNode::Int(n) => NodeKind::Number(n.value.clone()),
            RubyNode::Float(n) => NodeKind::Number(n.value.clone()),
            RubyNode::True(_) => NodeKind::True,
            RubyNode::False(_) => NodeKind::False,
            RubyNode::Nil(_) => NodeKind::Nil,
            RubyNode::Self_(_) => NodeKind::SelfRef,
            RubyNode::Const(_) => NodeKind::Const(self.const_path(node)),
            RubyNode::Lvar(var) => NodeKind::Var(var.name.clone()),
            RubyNode::Ivar(var) => NodeKind::Var(var.name.clone()),
            RubyNode::Cvar(var) => NodeKind::Var(var.name.clone()),
            RubyNode::Gvar(var) => NodeKind::Var(var.name.clone()),
            RubyNode::Array(array) => NodeKind::Array(self.list(&array.elements)),
            RubyNode::Hash(hash) => NodeKind::Hash(self.pairs(&hash.pairs)),
            RubyNode::Kwargs(kwargs) => NodeKind::Hash(self.pairs(&kwargs.pairs)),

            RubyNode::Lvasgn(asgn) => return self.assign(asgn.value.as_deref(), span),
            RubyNode::Ivasgn(asgn) => return self.assign(asgn.value.as_deref(), span),
            RubyNode::Cvasgn(asgn) => return self.assign(asgn.value.as_deref(), span),
            RubyNode::Gvasgn(asgn) => return self.assign(asgn.value.as_deref(), span),
            RubyNode::Casgn(asgn) => return self.assign(asgn.value.as_deref(), span),
            RubyNode::OpAsgn(asgn) => {
                let children = vec![self.lower(&asgn.recv), self.lower(&asgn.value)];
                return self.expr(self.text(&asgn.operator_l), children, span);
            }
            RubyNode::OrAsgn(asgn) => {
                return self.expr("||=", vec![self.lower(&asgn.recv), self.lower(&asgn.value)], span)
            }
            RubyNode::AndAsgn(asgn) => {
                return self.expr("&&=", vec![self.lower(&asgn.recv), self.lower(&asgn.value)], span)
            }
            RubyNode::Masgn(asgn) => return self.expr("masgn", vec![self.lower(&asgn.rhs)], span),
            RubyNode::And(op) => {
                return self.expr("&&", vec![self.lower(&op.lhs), self.lower(&op.rhs)], span)
            }
            RubyNode::Or(op) => {
                return self.expr("||", vec![self.lower(&op.lhs), self.lower(&op.rhs)], span)
            }
            RubyNode::Index(index) => {
                let mut children = vec![self.lower(&index.recv)];
                children.extend(self.list(&index.indexes));
                return self.expr("[]", children, span);
            }

            RubyNode::Return(jump) => return self.expr("return", self.list(&jump.args), span),
            RubyNode::Next(jump) => return self.expr("next", self.list(&jump.args), span),
            RubyNode::Break(jump) => return self.expr("break", self.list(&jump.args), span),
            RubyNode::Yield(call) => return self.expr("yield", self.list(&call.args), span),
            RubyNode::Super(call) => return self.expr("super", self.list(&call.args), span),
            RubyNode::Splat(splat) => {
                let children = splat.value.as_deref().map(|v| self.lower(v)).into_iter().collect();
                return self.expr("*", children, span);
            }
            RubyNode::Kwsplat(splat) => return self.expr("**", vec![self.lower(&splat.value)], span),
            RubyNode::BlockPass(pass) => {
                let children = pass.value.as_deref().map(|v| self.lower(v)).into_iter().collect();
                return self.expr("&", children, span);
            }
            RubyNode::Defined(defined) => {
                return self.expr("defined?", vec![self.lower(&defined.value)], span)
            }
            RubyNode::Lambda(_) => return self.expr("->", Vec::new(), span),
            RubyNode::Regexp(_) => return self.expr("regex", Vec::new(), span),

            _ => return self.expr("expr", Vec::new(), span),
        };
        Node::new(kind, span)
    }

    fn send(&self, recv: Option<&RubyNode>, method: &str, args: &[RubyNode], span: Span) -> Node {
        let receiver = recv.map(|r| self.boxed(r));
        match receiver {
            // `!x` and `not x`
            Some(operand) if method == "!" && args.is_empty() => self.expr("!", vec![*operand], span),
            receiver => Node::new(
                NodeKind::Send {
                    receiver,
                    method: method.to_string(),
                    args: self.list(args),
                },
                span,
            ),
        }
    }

    fn block(&self, call: &RubyNode, body: Option<&RubyNode>, span: Span) -> Node {
        let body = self.body(body, span);
        // lambda bodies are only walked for steps, never run
        if matches!(call, RubyNode::Lambda(_)) {
            return self.expr("->", vec![body], span);
        }
        Node::new(
            NodeKind::Block {
                call: self.boxed(call),
                body: Box::new(body),
            },
            span,
        )
    }

    fn rescue(&self, rescue: &nodes::Rescue, ensure: Option<Box<Node>>, span: Span) -> BeginClauses {
        let rescues = rescue
            .rescue_bodies
            .iter()
            .map(|clause| match clause {
                RubyNode::RescueBody(clause) => {
                    self.body(clause.body.as_deref(), self.span(&clause.expression_l))
                }
                other => self.lower(other),
            })
            .collect();

        BeginClauses {
            body: Box::new(self.body(rescue.body.as_deref(), span)),
            rescues,
            else_body: rescue.else_.as_deref().map(|e| self.boxed(e)),
            ensure,
        }
    }

    /// `unless` keeps its own body as the main branch
    fn conditional(
        &self,
        cond: &RubyNode,
        if_true: Option<&RubyNode>,
        if_false: Option<&RubyNode>,
        keyword: &Loc,
        span: Span,
    ) -> NodeKind {
        let negated = self.text(keyword) == "unless";
        let (main, other) = if negated {
            (if_false, if_true)
        } else {
            (if_true, if_false)
        };
        NodeKind::If {
            cond: self.boxed(cond),
            then_body: Box::new(self.body(main, span)),
            else_body: other.map(|n| self.boxed(n)),
            negated,
        }
    }

    /// `case` becomes a chain of conditionals, one per branch
    fn case(
        &self,
        subject: Option<&RubyNode>,
        branches: &[RubyNode],
        else_body: Option<&RubyNode>,
        span: Span,
    ) -> Node {
        let mut chain = else_body.map(|n| self.lower(n));
        for branch in branches.iter().rev() {
            let branch_span = self.span(branch.expression());
            let (tests, body) = match branch {
                RubyNode::When(when) => (self.list(&when.patterns), when.body.as_deref()),
                RubyNode::InPattern(pattern) => (
                    pattern.guard.as_deref().map(|g| self.lower(g)).into_iter().collect(),
                    pattern.body.as_deref(),
                ),
                other => (Vec::new(), Some(other)),
            };
            let mut children: Vec<Node> = subject.map(|s| self.lower(s)).into_iter().collect();
            children.extend(tests);

            chain = Some(Node::new(
                NodeKind::If {
                    cond: Box::new(self.expr("when", children, branch_span)),
                    then_body: Box::new(self.body(body, branch_span)),
                    else_body: chain.map(Box::new),
                    negated: false,
                },
                branch_span,
            ));
        }

        match chain {
            Some(mut node) => {
                node.span = span;
                node
            }
            None => Node::empty(span),
        }
    }

    fn negate(&self, cond: &RubyNode) -> Node {
        let operand = self.lower(cond);
        let span = operand.span;
        self.expr("!", vec![operand], span)
    }

    fn assign(&self, value: Option<&RubyNode>, span: Span) -> Node {
        let children = value.map(|v| self.lower(v)).into_iter().collect();
        self.expr("=", children, span)
    }

    /// Flattened key/value pairs; a `**splat` stands in as its own key
    fn pairs(&self, pairs: &[RubyNode]) -> Vec<Node> {
        let mut out = Vec::with_capacity(pairs.len() * 2);
        for pair in pairs {
            match pair {
                RubyNode::Pair(pair) => {
                    out.push(self.lower(&pair.key));
                    out.push(self.lower(&pair.value));
                }
                other => {
                    let value = self.lower(other);
                    out.push(self.expr("**", Vec::new(), value.span));
                    out.push(value);
                }
            }
        }
        out
    }

    /// String value of a composite literal, interpolations kept verbatim
    fn parts(&self, parts: &[RubyNode]) -> String {
        parts
            .iter()
            .map(|part| match part {
                RubyNode::Str(s) => s.value.to_string_lossy(),
                RubyNode::Dstr(s) => self.parts(&s.parts),
                other => self.text(other.expression()).to_string(),
            })
            .collect()
    }

    fn const_path(&self, node: &RubyNode) -> String {
        match node {
            RubyNode::Const(c) => match c.scope.as_deref() {
                None => c.name.clone(),
                Some(RubyNode::Cbase(_)) => format!("::{}", c.name),
                Some(scope) => format!("{}::{}", self.const_path(scope), c.name),
            },
            other => self.text(other.expression()).to_string(),
        }
    }
}
