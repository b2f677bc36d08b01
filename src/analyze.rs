//! Dependency Analyzer: static, intra-statement name analysis.
//!
//! Each reactive statement is parsed once at definition build time and
//! reduced to two sets: names it assigns at its own top level and names it
//! reads. Dependencies introduced only inside a called function body are
//! invisible to this analysis and must not affect ordering.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    AssignmentExpression, AssignmentTarget, Expression, SimpleAssignmentTarget, UpdateExpression,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::operator::AssignmentOperator;
use oxc_syntax::scope::ScopeFlags;
use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, HashSet};

lazy_static::lazy_static! {
    /// Host globals that never resolve to component bindings.
    static ref RUNTIME_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("Math");
        s.insert("console");
        s.insert("JSON");
        s.insert("Date");
        s.insert("String");
        s.insert("Number");
        s.insert("Boolean");
        s.insert("Array");
        s.insert("Object");
        s.insert("Promise");
        s.insert("Map");
        s.insert("Set");
        s.insert("Error");
        s.insert("undefined");
        s.insert("NaN");
        s.insert("Infinity");
        s.insert("parseInt");
        s.insert("parseFloat");
        s.insert("window");
        s.insert("document");
        s
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAME SETS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameSets {
    pub assigned: HashSet<String>,
    pub used: HashSet<String>,
}

/// Parses a reactive statement (with or without its `$:` label) and extracts
/// the top-level assigned/used name sets.
pub fn extract_name_sets(code: &str) -> Result<NameSets, String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_typescript(true).with_module(true);
    let ret = Parser::new(&allocator, code, source_type).parse();

    if !ret.errors.is_empty() {
        return Err(format!("Invalid statement syntax: {:?}", ret.errors[0]));
    }

    let mut collector = NameSetCollector::default();
    collector.visit_program(&ret.program);
    Ok(collector.into_sets())
}

#[derive(Default)]
struct NameSetCollector {
    assigned: HashSet<String>,
    used: HashSet<String>,
}

impl NameSetCollector {
    fn assign(&mut self, name: &str) {
        if !RUNTIME_GLOBALS.contains(name) {
            self.assigned.insert(name.to_string());
        }
    }

    fn use_name(&mut self, name: &str) {
        if !RUNTIME_GLOBALS.contains(name) {
            self.used.insert(name.to_string());
        }
    }

    fn into_sets(self) -> NameSets {
        NameSets {
            assigned: self.assigned,
            used: self.used,
        }
    }
}

impl<'b> Visit<'b> for NameSetCollector {
    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference<'b>) {
        self.use_name(ident.name.as_str());
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier<'b>) {
        self.assign(ident.name.as_str());
    }

    // Function bodies are opaque: reads and writes inside them never count.
    fn visit_function(&mut self, _func: &oxc_ast::ast::Function<'b>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(
        &mut self,
        _func: &oxc_ast::ast::ArrowFunctionExpression<'b>,
    ) {
    }

    fn visit_assignment_expression(&mut self, expr: &AssignmentExpression<'b>) {
        match &expr.left {
            AssignmentTarget::AssignmentTargetIdentifier(ident) => {
                self.assign(ident.name.as_str());
                // Compound assignment reads the target before writing it.
                if expr.operator != AssignmentOperator::Assign {
                    self.use_name(ident.name.as_str());
                }
            }
            AssignmentTarget::StaticMemberExpression(member) => {
                if let Some(root) = member_root(&member.object) {
                    self.assign(&root);
                }
            }
            AssignmentTarget::ComputedMemberExpression(member) => {
                if let Some(root) = member_root(&member.object) {
                    self.assign(&root);
                }
                self.visit_expression(&member.expression);
            }
            other => {
                // Destructuring target: every identifier in it is written.
                let mut refs = TargetRefCollector::default();
                refs.visit_assignment_target(other);
                for name in refs.names {
                    self.assign(&name);
                }
            }
        }
        self.visit_expression(&expr.right);
    }

    fn visit_update_expression(&mut self, expr: &UpdateExpression<'b>) {
        match &expr.argument {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) => {
                self.assign(ident.name.as_str());
                self.use_name(ident.name.as_str());
            }
            other => {
                let mut refs = TargetRefCollector::default();
                refs.visit_simple_assignment_target(other);
                for name in refs.names {
                    self.assign(&name);
                }
            }
        }
    }
}

/// Collects every identifier reference under an assignment target.
#[derive(Default)]
struct TargetRefCollector {
    names: HashSet<String>,
}

impl<'b> Visit<'b> for TargetRefCollector {
    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference<'b>) {
        self.names.insert(ident.name.to_string());
    }
}

fn member_root(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(ident) => Some(ident.name.to_string()),
        Expression::StaticMemberExpression(member) => member_root(&member.object),
        Expression::ComputedMemberExpression(member) => member_root(&member.object),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REACTIVE STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ReactiveStatement {
    /// Position in the component's original statement list. Bodies are
    /// aligned by this index.
    pub index: usize,
    pub code: String,
    pub assigned: HashSet<String>,
    pub used: HashSet<String>,
}

impl ReactiveStatement {
    pub fn analyze(index: usize, code: &str) -> Result<Self, String> {
        let sets = extract_name_sets(code)?;
        Ok(ReactiveStatement {
            index,
            code: code.to_string(),
            assigned: sets.assigned,
            used: sets.used,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCY GRAPH
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub producer: usize,
    pub consumer: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub edges: Vec<DependencyEdge>,
    /// Execution order as positions into the analyzed statement slice.
    pub order: Vec<usize>,
}

/// Builds the edge set and a stable topological execution order.
///
/// An edge i→j exists only when i precedes j in source order and j reads a
/// name i assigns. Ties resolve to the smallest source index, so statements
/// with no producer/consumer evidence keep their source order. Any residual
/// cycle degrades to source order; the analyzer never fails.
pub fn build_graph(statements: &[ReactiveStatement]) -> DependencyGraph {
    let n = statements.len();
    let mut edges = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            if !statements[j].used.is_disjoint(&statements[i].assigned) {
                edges.push(DependencyEdge {
                    producer: i,
                    consumer: j,
                });
            }
        }
    }

    let mut indegree = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in &edges {
        indegree[edge.consumer] += 1;
        successors[edge.producer].push(edge.consumer);
    }

    let mut ready: BinaryHeap<std::cmp::Reverse<usize>> = BinaryHeap::new();
    for (i, &degree) in indegree.iter().enumerate() {
        if degree == 0 {
            ready.push(std::cmp::Reverse(i));
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];
    while let Some(std::cmp::Reverse(i)) = ready.pop() {
        order.push(i);
        placed[i] = true;
        for &j in &successors[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(std::cmp::Reverse(j));
            }
        }
    }

    // Cycle fallback: remaining statements keep source order.
    for (i, was_placed) in placed.iter().enumerate() {
        if !was_placed {
            order.push(i);
        }
    }

    DependencyGraph { edges, order }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn analyze_all(codes: &[&str]) -> Vec<ReactiveStatement> {
        codes
            .iter()
            .enumerate()
            .map(|(i, code)| ReactiveStatement::analyze(i, code).unwrap())
            .collect()
    }

    #[test]
    fn test_simple_assignment() {
        let sets = extract_name_sets("$: a = x;").unwrap();
        assert_eq!(sets.assigned, names(&["a"]));
        assert_eq!(sets.used, names(&["x"]));
    }

    #[test]
    fn test_unlabeled_statement() {
        let sets = extract_name_sets("total = a + b;").unwrap();
        assert_eq!(sets.assigned, names(&["total"]));
        assert_eq!(sets.used, names(&["a", "b"]));
    }

    #[test]
    fn test_call_arguments_are_reads_only() {
        let sets = extract_name_sets("$: setX(x);").unwrap();
        assert!(sets.assigned.is_empty());
        assert_eq!(sets.used, names(&["setX", "x"]));
    }

    #[test]
    fn test_function_bodies_are_invisible() {
        let sets = extract_name_sets("$: handler = () => { y = x + 1; };").unwrap();
        assert_eq!(sets.assigned, names(&["handler"]));
        assert!(
            sets.used.is_empty(),
            "reads inside a function body must not count: {:?}",
            sets.used
        );
    }

    #[test]
    fn test_compound_assignment_reads_target() {
        let sets = extract_name_sets("$: total += delta;").unwrap();
        assert_eq!(sets.assigned, names(&["total"]));
        assert_eq!(sets.used, names(&["total", "delta"]));
    }

    #[test]
    fn test_update_expression() {
        let sets = extract_name_sets("$: count++;").unwrap();
        assert_eq!(sets.assigned, names(&["count"]));
        assert_eq!(sets.used, names(&["count"]));
    }

    #[test]
    fn test_block_statement_is_top_level() {
        let sets = extract_name_sets("$: { mid = lo + hi; }").unwrap();
        assert_eq!(sets.assigned, names(&["mid"]));
        assert_eq!(sets.used, names(&["lo", "hi"]));
    }

    #[test]
    fn test_declaration_inside_statement() {
        // A lexical declaration cannot carry the label, so it arrives bare.
        let sets = extract_name_sets("let doubled = base * 2;").unwrap();
        assert_eq!(sets.assigned, names(&["doubled"]));
        assert_eq!(sets.used, names(&["base"]));
    }

    #[test]
    fn test_member_assignment_marks_root() {
        let sets = extract_name_sets("$: obj.field = src;").unwrap();
        assert_eq!(sets.assigned, names(&["obj"]));
        assert_eq!(sets.used, names(&["src"]));
    }

    #[test]
    fn test_computed_member_key_is_read() {
        let sets = extract_name_sets("$: table[key] = src;").unwrap();
        assert_eq!(sets.assigned, names(&["table"]));
        assert_eq!(sets.used, names(&["key", "src"]));
    }

    #[test]
    fn test_destructuring_assignment() {
        let sets = extract_name_sets("$: [first, second] = pair;").unwrap();
        assert_eq!(sets.assigned, names(&["first", "second"]));
        assert_eq!(sets.used, names(&["pair"]));
    }

    #[test]
    fn test_globals_are_filtered() {
        let sets = extract_name_sets("$: rounded = Math.round(x); console.log(rounded);").unwrap();
        assert_eq!(sets.assigned, names(&["rounded"]));
        assert_eq!(sets.used, names(&["x", "rounded"]));
    }

    #[test]
    fn test_store_prefixed_names_survive() {
        let sets = extract_name_sets("$: doubled = $count * 2;").unwrap();
        assert_eq!(sets.assigned, names(&["doubled"]));
        assert_eq!(sets.used, names(&["$count"]));
    }

    #[test]
    fn test_syntax_error_is_reported() {
        assert!(extract_name_sets("$: = 5;").is_err());
    }

    #[test]
    fn test_chain_produces_edge_and_order() {
        let statements = analyze_all(&["$: a = x;", "$: b = a;"]);
        let graph = build_graph(&statements);
        assert_eq!(
            graph.edges,
            vec![DependencyEdge {
                producer: 0,
                consumer: 1
            }]
        );
        assert_eq!(graph.order, vec![0, 1]);
    }

    #[test]
    fn test_independent_statements_keep_source_order() {
        let statements = analyze_all(&["$: a = x;", "$: b = y;", "$: c = z;"]);
        let graph = build_graph(&statements);
        assert!(graph.edges.is_empty());
        assert_eq!(graph.order, vec![0, 1, 2]);
    }

    #[test]
    fn test_reader_before_writer_is_not_reordered() {
        // Statement 0 reads a name statement 1 assigns. Only forward
        // producer/consumer evidence creates edges, so source order holds.
        let statements = analyze_all(&["$: b = a;", "$: a = x;"]);
        let graph = build_graph(&statements);
        assert!(graph.edges.is_empty());
        assert_eq!(graph.order, vec![0, 1]);
    }

    #[test]
    fn test_function_internal_write_creates_no_edge() {
        let statements = analyze_all(&["$: b = y;", "$: setX = () => { y = 1; };"]);
        let graph = build_graph(&statements);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_diamond_order_is_stable() {
        let statements = analyze_all(&[
            "$: left = source;",
            "$: right = source;",
            "$: joined = left + right;",
        ]);
        let graph = build_graph(&statements);
        assert_eq!(graph.order, vec![0, 1, 2]);
        assert_eq!(graph.edges.len(), 2);
    }
}
