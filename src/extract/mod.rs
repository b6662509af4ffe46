//! Static step extraction
//!
//! Finds test cases in a Ruby system-test file and lists the step calls in
//! one test's body, in source order, at most one per line.

mod triggers;

pub use triggers::TriggerSet;

use std::collections::HashSet;

use serde::Serialize;

use crate::common::{Error, Result};
use crate::parser::{self, Node, NodeKind};

/// RSpec example-group methods
const GROUP_METHODS: &[&str] = &[
    "describe",
    "context",
    "feature",
    "fdescribe",
    "fcontext",
    "ffeature",
];

/// RSpec example methods
const EXAMPLE_METHODS: &[&str] = &["it", "specify", "scenario", "example", "fit", "fscenario"];

/// One step site found in a test body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDescriptor {
    pub method: String,
    /// 1-based
    pub line: u32,
    /// 1-based
    pub column: u32,
    pub block_depth: u32,
    /// Literal source of the call, without any attached block
    pub as_string: String,
}

/// How a test case is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStyle {
    /// `test "description" do ... end`
    Minitest,
    /// `it "description" do ... end` inside `describe` groups
    Rspec,
    /// `def test_name ... end`
    Method,
}

impl std::fmt::Display for TestStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minitest => write!(f, "minitest"),
            Self::Rspec => write!(f, "rspec"),
            Self::Method => write!(f, "method"),
        }
    }
}

/// A test case declared in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// Identifier the test framework reports for this test
    pub id: String,
    pub style: TestStyle,
    /// Outermost RSpec group, or the enclosing test class
    pub suite: Option<String>,
    /// Line of the declaration
    pub line: u32,
}

impl TestCase {
    /// Whether `selector` names this test
    ///
    /// Exact id match, or for Minitest-style tests, a case-insensitive match
    /// on the id or on the plain description.
    pub fn matches(&self, selector: &str) -> bool {
        if self.id == selector {
            return true;
        }
        match self.style {
            TestStyle::Minitest => {
                let selector = selector.trim();
                self.id.eq_ignore_ascii_case(selector) || self.id == minitest_id(selector)
            }
            _ => false,
        }
    }
}

/// A located test case together with its body
#[derive(Debug, Clone)]
pub struct LocatedTest {
    pub case: TestCase,
    pub body: Node,
}

/// List every test case declared in `source`, in source order
pub fn list_tests(source: &str) -> Result<Vec<TestCase>> {
    let program = parser::parse(source)?;
    let mut found = Vec::new();
    collect_tests(&program, &mut Scope::default(), &mut found);
    Ok(found.into_iter().map(|(case, _)| case).collect())
}

/// Find the test named by `selector` and return its body
pub fn locate(source: &str, path: &str, selector: &str) -> Result<LocatedTest> {
    let program = parser::parse(source)?;
    let mut found = Vec::new();
    collect_tests(&program, &mut Scope::default(), &mut found);

    found
        .into_iter()
        .find(|(case, _)| case.matches(selector))
        .map(|(case, body)| LocatedTest {
            case,
            body: body.clone(),
        })
        .ok_or_else(|| Error::test_not_found(selector, path))
}

/// Extract the ordered step descriptors of one test
pub fn extract(
    source: &str,
    path: &str,
    selector: &str,
    triggers: &TriggerSet,
) -> Result<Vec<StepDescriptor>> {
    let located = locate(source, path, selector)?;
    Ok(steps_in(source, &located.body, triggers))
}

/// Step descriptors for an already-located test body
pub fn steps_in(source: &str, body: &Node, triggers: &TriggerSet) -> Vec<StepDescriptor> {
    let mut steps = Vec::new();
    walk(source, body, 0, triggers, &mut steps);
    dedup_by_line(steps)
}

fn walk(source: &str, node: &Node, depth: u32, triggers: &TriggerSet, out: &mut Vec<StepDescriptor>) {
    match &node.kind {
        // a step call absorbs its arguments
        NodeKind::Send { method, .. } if triggers.contains(method) => {
            out.push(descriptor(source, node, method, depth));
        }
        NodeKind::Block { call, body, .. } => match call.method_name() {
            Some(method) if triggers.contains(method) => {
                out.push(descriptor(source, call, method, depth));
                walk(source, body, depth + 1, triggers, out);
            }
            _ => {
                walk(source, call, depth, triggers, out);
                walk(source, body, depth, triggers, out);
            }
        },
        _ => {
            for child in node.children() {
                walk(source, child, depth, triggers, out);
            }
        }
    }
}

fn descriptor(source: &str, call: &Node, method: &str, depth: u32) -> StepDescriptor {
    StepDescriptor {
        method: method.to_string(),
        line: call.span.line,
        column: call.span.column,
        block_depth: depth,
        as_string: call.span.text(source).to_string(),
    }
}

/// Keep the last step per line, preserving order
fn dedup_by_line(steps: Vec<StepDescriptor>) -> Vec<StepDescriptor> {
    let mut seen = HashSet::new();
    let mut kept: Vec<StepDescriptor> = steps
        .into_iter()
        .rev()
        .filter(|step| seen.insert(step.line))
        .collect();
    kept.reverse();
    kept
}

/// `test "Sign in twice"` is reported as `test_sign_in_twice`
fn minitest_id(description: &str) -> String {
    let mut id = String::from("test_");
    let mut in_space = false;
    for c in description.chars() {
        if c.is_whitespace() {
            if !in_space {
                id.push('_');
            }
            in_space = true;
        } else {
            id.extend(c.to_lowercase());
            in_space = false;
        }
    }
    id
}

/// Description argument of a group/example call
fn description(call: &Node) -> Option<String> {
    let NodeKind::Send { args, .. } = &call.kind else {
        return None;
    };
    match args.first().map(|a| &a.kind) {
        Some(NodeKind::Str(s)) => Some(s.clone()),
        Some(NodeKind::Const(c)) => Some(c.clone()),
        Some(NodeKind::Sym(s)) => Some(s.clone()),
        _ => None,
    }
}

/// RSpec joins nested descriptions with a space, except before `#`, `.`, `::`
fn full_description(groups: &[String], example: &str) -> String {
    let mut full = String::new();
    for part in groups.iter().map(String::as_str).chain(std::iter::once(example)) {
        if part.is_empty() {
            continue;
        }
        let glued = part.starts_with('#') || part.starts_with('.') || part.starts_with("::");
        if !full.is_empty() && !glued {
            full.push(' ');
        }
        full.push_str(part);
    }
    full
}

fn is_rspec_receiver(call: &Node) -> bool {
    match &call.kind {
        NodeKind::Send { receiver: None, .. } => true,
        NodeKind::Send {
            receiver: Some(receiver),
            ..
        } => matches!(&receiver.kind, NodeKind::Const(name) if name == "RSpec" || name == "::RSpec"),
        _ => false,
    }
}

/// Enclosing RSpec groups and classes while collecting tests
#[derive(Default)]
struct Scope {
    groups: Vec<String>,
    classes: Vec<String>,
}

fn collect_tests<'a>(node: &'a Node, scope: &mut Scope, out: &mut Vec<(TestCase, &'a Node)>) {
    match &node.kind {
        NodeKind::Block { call, body, .. } => {
            let method = call.method_name().unwrap_or_default();
            let line = call.span.line;

            if GROUP_METHODS.contains(&method) && is_rspec_receiver(call) {
                scope.groups.push(description(call).unwrap_or_default());
                collect_tests(body, scope, out);
                scope.groups.pop();
                return;
            }

            if let Some(desc) = description(call) {
                let is_plain_call = matches!(&call.kind, NodeKind::Send { receiver: None, .. });
                if EXAMPLE_METHODS.contains(&method) && is_plain_call && !scope.groups.is_empty() {
                    let case = TestCase {
                        id: full_description(&scope.groups, &desc),
                        style: TestStyle::Rspec,
                        suite: scope.groups.first().cloned(),
                        line,
                    };
                    out.push((case, body.as_ref()));
                    return;
                }
                if method == "test" && is_plain_call {
                    let case = TestCase {
                        id: minitest_id(&desc),
                        style: TestStyle::Minitest,
                        suite: scope.classes.last().cloned(),
                        line,
                    };
                    out.push((case, body.as_ref()));
                    return;
                }
            }

            collect_tests(body, scope, out);
        }
        NodeKind::Class { name, body, .. } => {
            scope.classes.push(name.clone());
            collect_tests(body, scope, out);
            scope.classes.pop();
        }
        NodeKind::Def { name, body } if name.starts_with("test_") => {
            let case = TestCase {
                id: name.clone(),
                style: TestStyle::Method,
                suite: scope.classes.last().cloned(),
                line: node.span.line,
            };
            out.push((case, body.as_ref()));
        }
        NodeKind::Def { .. } => {}
        _ => {
            for child in node.children() {
                collect_tests(child, scope, out);
            }
        }
    }
}
