//! Input tree to Perl tree.
//!
//! One walk over the input builds the whole module. Statements and
//! declarations live here; library idioms (`Math.*`, array and string
//! methods, `OpCodes.*`, IL operation nodes) are in `builtins`.
//!
//! JavaScript arrays and objects are references in Perl. A variable only
//! gets an `@`/`%` sigil when its first declaration initializes it with a
//! literal; everything else is a scalar holding a reference.

use super::ast::*;
use super::builtins::with_setup;
use crate::input::{JsNode, program_root};
use crate::lower::{self, DropLog, ImportSet, NameGen, ScopeStack, Shape};
use crate::options::GenerationOptions;
use crate::output::number_text;
use crate::traits::TransformError;
use serde_json::Value;
use std::collections::HashSet;

/// Perl builtins a same-named top-level sub would be shadowed by.
const PERL_BUILTINS: &[&str] = &[
    "abs", "chr", "defined", "delete", "die", "each", "eval", "exists", "exp", "hex", "index",
    "int", "join", "keys", "lc", "length", "log", "map", "oct", "ord", "pack", "pop", "print",
    "push", "rand", "ref", "reverse", "shift", "sin", "cos", "sort", "splice", "split",
    "sprintf", "sqrt", "substr", "uc", "unpack", "unshift", "values", "warn",
];

/// The class whose body is being transformed.
#[derive(Debug, Default)]
pub(super) struct ClassCtx {
    pub name: String,
    pub getters: HashSet<String>,
    pub setters: HashSet<String>,
}

/// An enclosing construct that `last`/`next` can target.
#[derive(Debug)]
pub(super) struct Frame {
    /// A desugared `switch` (a bare block), as opposed to a loop.
    pub switch: bool,
    pub label: Option<String>,
    /// An inlined `forEach` callback: `return` continues it.
    pub callback: bool,
}

/// How a function's invocant is bound.
pub(super) enum SubKind<'a> {
    Plain,
    Method,
    Static,
    Constructor {
        has_base: bool,
        fields: Vec<(String, Option<JsNode<'a>>)>,
    },
}

/// Transforms an input program into a Perl [`Module`].
pub struct PerlTransformer {
    pub(super) options: GenerationOptions,
    pub(super) scopes: ScopeStack,
    /// Top-level subs, called by name.
    pub(super) functions: HashSet<String>,
    pub(super) classes: HashSet<String>,
    pub(super) imports: ImportSet,
    pub(super) names: NameGen,
    pub(super) drops: DropLog,
    pub(super) catch_vars: Vec<String>,
    /// Per function: `var` names declared up front.
    pub(super) hoisted: Vec<HashSet<String>>,
    pub(super) class_ctx: Option<ClassCtx>,
    /// Variable standing for `this`.
    pub(super) invocant: &'static str,
    pub(super) frames: Vec<Frame>,
    pub(super) fn_depth: usize,
    /// Inside a callback body inlined into a loop: `return` continues.
    pub(super) return_as_next: bool,
    /// Constructor field initializers waiting for `$self` to exist.
    pub(super) pending_fields: Option<Vec<Stmt>>,
    pub(super) in_constructor: bool,
    pub(super) native_try: bool,
}

impl PerlTransformer {
    pub fn new(options: &GenerationOptions) -> Self {
        Self {
            options: options.clone(),
            scopes: ScopeStack::new(),
            functions: HashSet::new(),
            classes: HashSet::new(),
            imports: ImportSet::default(),
            names: NameGen::default(),
            drops: DropLog::new(options.strict_input),
            catch_vars: Vec::new(),
            hoisted: Vec::new(),
            class_ctx: None,
            invocant: "self",
            frames: Vec::new(),
            fn_depth: 0,
            return_as_next: false,
            pending_fields: None,
            in_constructor: false,
            native_try: false,
        }
    }

    /// Transform a whole program. Fails only when the root is not a program.
    pub fn transform(&mut self, ast: &Value) -> Result<Module, TransformError> {
        let program = program_root(ast)?;
        *self = Self::new(&self.options);
        let stmts = lower::top_level_statements(program);
        self.functions = lower::declared_functions(&stmts)
            .into_iter()
            .map(String::from)
            .collect();
        self.classes = lower::declared_classes(&stmts)
            .into_iter()
            .map(String::from)
            .collect();
        tracing::debug!(
            statements = stmts.len(),
            functions = self.functions.len(),
            classes = self.classes.len(),
            "transforming program to Perl"
        );
        let body = self.stmts(&stmts);
        Ok(self.module(body))
    }

    /// Warnings collected during the last transform (strict input mode).
    pub fn take_warnings(&mut self) -> Vec<String> {
        self.drops.take()
    }

    /// Modules the last transformed program loads.
    pub fn dependencies(&self) -> Vec<String> {
        self.imports.modules()
    }

    fn module(&mut self, body: Vec<Stmt>) -> Module {
        let mut pragmas = Vec::new();
        if self.options.modern_syntax {
            pragmas.push(Use::new("v5.36"));
        } else if self.options.strict_pragmas {
            pragmas.push(Use::new("strict"));
            pragmas.push(Use::new("warnings"));
        }
        if self.native_try {
            pragmas.push(Use::with_imports("feature", ["try".to_string()]));
            pragmas.push(Use::no("warnings", &["experimental::try"]));
        }
        let uses = self
            .imports
            .iter()
            .map(|(module, symbols)| {
                if symbols.is_empty() {
                    Use::qualified(module)
                } else {
                    Use::with_imports(module, symbols.iter().cloned())
                }
            })
            .collect();
        Module {
            name: self.options.module_name.clone(),
            pragmas,
            uses,
            body,
            meta: NodeMeta::default(),
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    pub(super) fn stmts(&mut self, nodes: &[JsNode<'_>]) -> Vec<Stmt> {
        nodes.iter().flat_map(|n| self.stmt(*n)).collect()
    }

    /// A nested statement list in its own scope.
    pub(super) fn scoped_stmts(&mut self, nodes: &[JsNode<'_>]) -> Vec<Stmt> {
        self.scopes.push();
        let out = self.stmts(nodes);
        self.scopes.pop();
        out
    }

    /// Body of a compound statement, block or not, in its own scope.
    pub(super) fn branch(&mut self, node: Option<JsNode<'_>>) -> Vec<Stmt> {
        match node {
            Some(n) if n.js_type() == "BlockStatement" => self.scoped_stmts(&n.children("body")),
            Some(n) => self.scoped_stmts(&[n]),
            None => Vec::new(),
        }
    }

    pub(super) fn stmt(&mut self, node: JsNode<'_>) -> Vec<Stmt> {
        let mut out = self.stmt_inner(node, None);
        if let Some(first) = out.first_mut()
            && first.meta == NodeMeta::default()
        {
            first.meta = meta_of(node);
        }
        out
    }

    fn stmt_inner(&mut self, node: JsNode<'_>, label: Option<String>) -> Vec<Stmt> {
        match node.js_type() {
            "VariableDeclaration" => self.var_decl(node),
            "FunctionDeclaration" => self.function_decl(node),
            "ClassDeclaration" => self.class_decl(node, None).into_iter().collect(),
            "ExpressionStatement" => match node.child("expression") {
                Some(expr) => self.expr_stmt(expr),
                None => Vec::new(),
            },
            "BlockStatement" => vec![Stmt::new(StmtKind::Block {
                label,
                body: self.scoped_stmts(&node.children("body")),
            })],
            "EmptyStatement" | "DebuggerStatement" => Vec::new(),
            "ReturnStatement" => vec![self.return_stmt(node)],
            "IfStatement" => self.if_stmt(node),
            "ForStatement" => self.for_stmt(node, label),
            "ForOfStatement" => self.for_of(node, label),
            "ForInStatement" => self.for_in(node, label),
            "WhileStatement" | "DoWhileStatement" => vec![self.while_stmt(node, label)],
            "SwitchStatement" => vec![self.switch_stmt(node, label)],
            "BreakStatement" => vec![Stmt::new(StmtKind::LoopControl {
                kind: LoopControl::Last,
                label: node.child("label").and_then(|l| l.name()).map(perl_label),
            })],
            "ContinueStatement" => vec![match node.child("label").and_then(|l| l.name()) {
                Some(name) => Stmt::new(StmtKind::LoopControl {
                    kind: LoopControl::Next,
                    label: Some(perl_label(name)),
                }),
                None => self.next_stmt(),
            }],
            "LabeledStatement" => {
                let label = node.child("label").and_then(|l| l.name()).map(perl_label);
                match node.child("body") {
                    Some(body) => self.stmt_inner(body, label),
                    None => Vec::new(),
                }
            }
            "ThrowStatement" => vec![self.throw_stmt(node)],
            "TryStatement" => vec![self.try_stmt(node)],
            _ => {
                self.drops.unsupported(node);
                Vec::new()
            }
        }
    }

    fn var_decl(&mut self, node: JsNode<'_>) -> Vec<Stmt> {
        let is_var = node.str_field("kind") == Some("var");
        let mut out = Vec::new();
        for decl in node.children("declarations") {
            let Some(id) = decl.child("id") else {
                continue;
            };
            let init = decl.child("init").map(JsNode::unwrapped);
            match id.js_type() {
                "Identifier" => {
                    let Some(name) = id.name() else { continue };
                    out.extend(self.declare_one(name, init, is_var));
                }
                "ArrayPattern" => {
                    let list = match init {
                        Some(init) => self.list_of(init),
                        None => Expr::List(Vec::new()),
                    };
                    let targets = self.pattern_targets(id);
                    out.push(Stmt::new(StmtKind::VarDecl {
                        targets,
                        init: Some(list),
                        scope: DeclScope::My,
                    }));
                }
                "ObjectPattern" => {
                    let temp = self.names.fresh("obj");
                    let value = init.map(|i| self.value(i)).unwrap_or_else(Expr::undef);
                    out.push(Stmt::my(&temp, Shape::Scalar, Some(value)));
                    out.extend(self.destructure_object(id, Expr::scalar(&temp)));
                }
                _ => self.drops.unsupported(id),
            }
        }
        out
    }

    fn declare_one(&mut self, name: &str, init: Option<JsNode<'_>>, is_var: bool) -> Vec<Stmt> {
        if let Some(init) = init {
            if init.js_type() == "ClassExpression" {
                self.classes.insert(name.to_string());
                return self.class_decl(init, Some(name)).into_iter().collect();
            }
            if is_function(init) {
                // Declared before the body is built, so the sub can recurse.
                let fresh = self.declare(name, Shape::Scalar, is_var);
                let sub = self.lower_function("", init, SubKind::Plain);
                let assign = Stmt::expr(Expr::assign(
                    Expr::scalar(name),
                    Expr::AnonSub(Box::new(sub)),
                ));
                return if fresh {
                    vec![Stmt::my(name, Shape::Scalar, None), assign]
                } else {
                    vec![assign]
                };
            }
        }
        let shape = Shape::of_initializer(init);
        if self.declare(name, shape, is_var) {
            let value = init.map(|i| self.shaped_value(shape, i));
            return vec![Stmt::my(name, shape, value)];
        }
        let Some(init) = init else {
            return Vec::new();
        };
        let shape = self.scopes.shape_of(name);
        let value = self.shaped_value(shape, init);
        vec![Stmt::expr(Expr::assign(Expr::var(name, shape), value))]
    }

    /// Record a declaration; `false` when it rebinds an existing name.
    pub(super) fn declare(&mut self, name: &str, shape: Shape, is_var: bool) -> bool {
        if is_var && self.hoisted.last().is_some_and(|h| h.contains(name)) {
            return false;
        }
        self.scopes.declare(name, shape)
    }

    /// Value to store in a variable of `shape`.
    pub(super) fn shaped_value(&mut self, shape: Shape, init: JsNode<'_>) -> Expr {
        let init = init.unwrapped();
        match shape {
            Shape::Scalar => self.value(init),
            Shape::List if init.js_type() == "ArrayExpression" => {
                Expr::List(self.array_items(init))
            }
            Shape::Map if init.js_type() == "ObjectExpression" => Expr::List(
                self.object_pairs(init)
                    .into_iter()
                    .flat_map(|(k, v)| [k, v])
                    .collect(),
            ),
            shape => Expr::deref(self.value(init), shape),
        }
    }

    fn pattern_targets(&mut self, pattern: JsNode<'_>) -> Vec<VarTarget> {
        pattern
            .children_with_holes("elements")
            .into_iter()
            .map(|element| {
                let (name, shape) = match element {
                    Some(e) if e.js_type() == "RestElement" => {
                        (e.child("argument").and_then(|a| a.name()), Shape::List)
                    }
                    Some(e) => (e.name(), Shape::Scalar),
                    None => (None, Shape::Scalar),
                };
                let name = match name {
                    Some(name) => {
                        self.scopes.declare(name, shape);
                        name.to_string()
                    }
                    None => self.names.fresh("skip"),
                };
                VarTarget { name, shape }
            })
            .collect()
    }

    /// `my $a = $obj->{a};` for each property of an object pattern.
    fn destructure_object(&mut self, pattern: JsNode<'_>, source: Expr) -> Vec<Stmt> {
        let mut out = Vec::new();
        for prop in pattern.children("properties") {
            if prop.js_type() == "RestElement" {
                self.drops.lossy("object rest pattern is not supported".to_string());
                continue;
            }
            let Some(key) = prop
                .child("key")
                .and_then(|k| k.name().or_else(|| k.string_value()))
            else {
                continue;
            };
            let (binding, default) = match prop.child("value") {
                Some(v) if v.js_type() == "AssignmentPattern" => (
                    v.child("left").and_then(|l| l.name()),
                    v.child("right"),
                ),
                Some(v) => (v.name(), None),
                None => (Some(key), None),
            };
            let Some(binding) = binding else { continue };
            let mut value = Expr::key(source.clone(), Expr::string(key));
            if let Some(default) = default {
                value = binary(BinaryOp::DefinedOr, value, self.value(default));
            }
            self.scopes.declare(binding, Shape::Scalar);
            out.push(Stmt::my(binding, Shape::Scalar, Some(value)));
        }
        out
    }

    fn function_decl(&mut self, node: JsNode<'_>) -> Vec<Stmt> {
        let Some(name) = node.child("id").and_then(|id| id.name()) else {
            self.drops.unsupported(node);
            return Vec::new();
        };
        if self.fn_depth == 0 {
            self.functions.insert(name.to_string());
            let sub = self.lower_function(name, node, SubKind::Plain);
            return vec![Stmt::new(StmtKind::Sub(Box::new(sub)))];
        }
        if self.hoisted.last().is_some_and(|h| h.contains(name)) {
            // Emitted at the top of the enclosing function.
            return Vec::new();
        }
        let fresh = self.scopes.declare(name, Shape::Scalar);
        let sub = self.lower_function("", node, SubKind::Plain);
        let assign = Stmt::expr(Expr::assign(Expr::scalar(name), Expr::AnonSub(Box::new(sub))));
        if fresh {
            vec![Stmt::my(name, Shape::Scalar, None), assign]
        } else {
            vec![assign]
        }
    }

    fn return_stmt(&mut self, node: JsNode<'_>) -> Stmt {
        if self.return_as_next {
            return self.callback_next();
        }
        let value = match node.child("argument") {
            Some(arg) => Some(self.value(arg)),
            None if self.in_constructor => Some(Expr::scalar("self")),
            None => None,
        };
        Stmt::ret(value)
    }

    fn if_stmt(&mut self, node: JsNode<'_>) -> Vec<Stmt> {
        let Some(test) = node.child("test") else {
            return Vec::new();
        };
        if let Some(decided) = lower::evaluate_guard(test) {
            tracing::trace!(decided, "collapsing framework guard");
            let taken = if decided {
                node.child("consequent")
            } else {
                node.child("alternate")
            };
            return match taken {
                Some(b) if b.js_type() == "BlockStatement" => self.stmts(&b.children("body")),
                Some(b) => self.stmt(b),
                None => Vec::new(),
            };
        }
        let cond = self.value(test);
        let then_branch = self.branch(node.child("consequent"));
        let else_branch = node.child("alternate").map(|alt| {
            if alt.js_type() == "IfStatement" {
                self.scopes.push();
                let out = self.stmt(alt);
                self.scopes.pop();
                out
            } else {
                self.branch(Some(alt))
            }
        });
        vec![Stmt::new(StmtKind::If {
            cond,
            then_branch,
            elsifs: Vec::new(),
            else_branch,
        })]
    }

    fn for_stmt(&mut self, node: JsNode<'_>, label: Option<String>) -> Vec<Stmt> {
        self.scopes.push();
        let mut before = Vec::new();
        let init = match node.child("init") {
            Some(init) if init.js_type() == "VariableDeclaration" => {
                let mut decls = self.var_decl(init);
                if decls.len() == 1 {
                    decls.pop().map(Box::new)
                } else {
                    // Several declarations or destructuring: set up before the loop.
                    before = decls;
                    None
                }
            }
            Some(init) => {
                let mut exprs = self.sequence(init);
                if exprs.len() == 1 {
                    exprs.pop().map(|e| Box::new(Stmt::expr(e)))
                } else {
                    before = exprs.into_iter().map(Stmt::expr).collect();
                    None
                }
            }
            None => None,
        };
        let cond = node.child("test").map(|t| self.value(t));
        let step = node
            .child("update")
            .map(|u| self.sequence(u))
            .unwrap_or_default();
        let (label, body) = self.loop_body(label, node.child("body"));
        self.scopes.pop();
        let for_stmt = Stmt::new(StmtKind::For {
            label,
            init,
            cond,
            step,
            body,
        });
        if before.is_empty() {
            vec![for_stmt]
        } else {
            before.push(for_stmt);
            vec![Stmt::new(StmtKind::Block {
                label: None,
                body: before,
            })]
        }
    }

    /// Transform a loop body inside a loop frame; returns the label the loop
    /// needs (the source label, or one made up for a `next` from a switch).
    pub(super) fn loop_body(
        &mut self,
        label: Option<String>,
        body: Option<JsNode<'_>>,
    ) -> (Option<String>, Vec<Stmt>) {
        self.loop_body_with(label, Vec::new(), body)
    }

    pub(super) fn loop_body_with(
        &mut self,
        label: Option<String>,
        prelude: Vec<Stmt>,
        body: Option<JsNode<'_>>,
    ) -> (Option<String>, Vec<Stmt>) {
        self.frames.push(Frame {
            switch: false,
            label,
            callback: false,
        });
        let mut stmts = prelude;
        stmts.extend(self.branch(body));
        let label = self.frames.pop().and_then(|f| f.label);
        (label, stmts)
    }

    fn for_of(&mut self, node: JsNode<'_>, label: Option<String>) -> Vec<Stmt> {
        let Some(right) = node.child("right") else {
            return Vec::new();
        };
        let list = self.list_of(right);
        self.scopes.push();
        let (var, prelude) = self.loop_binding(node.child("left"));
        let (label, body) = self.loop_body_with(label, prelude, node.child("body"));
        self.scopes.pop();
        vec![Stmt::new(StmtKind::Foreach {
            label,
            var,
            list,
            body,
        })]
    }

    fn for_in(&mut self, node: JsNode<'_>, label: Option<String>) -> Vec<Stmt> {
        let Some(right) = node.child("right").map(JsNode::unwrapped) else {
            return Vec::new();
        };
        let list = if self.is_list_var(right) {
            binary(
                BinaryOp::Range,
                Expr::number(0),
                Expr::LastIndex(Box::new(self.array_base(right))),
            )
        } else {
            Expr::call("sort", vec![Expr::call("keys", vec![self.hash_of(right)])])
        };
        self.scopes.push();
        let (var, prelude) = self.loop_binding(node.child("left"));
        let (label, body) = self.loop_body_with(label, prelude, node.child("body"));
        self.scopes.pop();
        vec![Stmt::new(StmtKind::Foreach {
            label,
            var,
            list,
            body,
        })]
    }

    /// Loop variable of a for-of/for-in head, plus unpacking statements for
    /// a destructuring pattern.
    fn loop_binding(&mut self, left: Option<JsNode<'_>>) -> (String, Vec<Stmt>) {
        let target = match left {
            Some(l) if l.js_type() == "VariableDeclaration" => l
                .children("declarations")
                .first()
                .and_then(|d| d.child("id")),
            other => other,
        };
        if let Some(name) = target.and_then(|t| t.name()) {
            self.scopes.declare(name, Shape::Scalar);
            return (name.to_string(), Vec::new());
        }
        match target {
            Some(t) if t.js_type() == "ArrayPattern" => {
                let item = self.names.fresh("item");
                let targets = self.pattern_targets(t);
                let unpack = Stmt::new(StmtKind::VarDecl {
                    targets,
                    init: Some(Expr::deref(Expr::scalar(&item), Shape::List)),
                    scope: DeclScope::My,
                });
                (item, vec![unpack])
            }
            Some(t) if t.js_type() == "ObjectPattern" => {
                let item = self.names.fresh("item");
                let unpack = self.destructure_object(t, Expr::scalar(&item));
                (item, unpack)
            }
            _ => (self.names.fresh("item"), Vec::new()),
        }
    }

    fn while_stmt(&mut self, node: JsNode<'_>, label: Option<String>) -> Stmt {
        let cond = node
            .child("test")
            .map(|t| self.value(t))
            .unwrap_or_else(|| Expr::number(1));
        let (label, body) = self.loop_body(label, node.child("body"));
        Stmt::new(StmtKind::While {
            label,
            cond,
            body,
            post_test: node.js_type() == "DoWhileStatement",
        })
    }

    fn switch_stmt(&mut self, node: JsNode<'_>, label: Option<String>) -> Stmt {
        let discriminant = node
            .child("discriminant")
            .map(|d| self.value(d))
            .unwrap_or_else(Expr::undef);
        let var = self.names.fresh("switch");
        let cases = node.children("cases");
        let arms = lower::switch_arms(&cases);

        self.frames.push(Frame {
            switch: true,
            label,
            callback: false,
        });
        let mut chain: Vec<(Expr, Vec<Stmt>)> = Vec::new();
        let mut default = None;
        for arm in &arms {
            let body = self.scoped_stmts(&arm.body);
            if arm.is_default {
                default = Some(body);
                continue;
            }
            let mut cond: Option<Expr> = None;
            for test in &arm.tests {
                if let Some(text) = test.string_value() {
                    tracing::warn!(case = text, "string case label compared numerically");
                    self.drops
                        .lossy(format!("switch case '{text}' is compared with numeric =="));
                }
                let matches = binary(BinaryOp::NumEq, Expr::scalar(&var), self.value(*test));
                cond = Some(match cond {
                    Some(prev) => binary(BinaryOp::Or, prev, matches),
                    None => matches,
                });
            }
            if let Some(cond) = cond {
                chain.push((cond, body));
            }
        }
        let label = self.frames.pop().and_then(|f| f.label);

        let mut body = vec![Stmt::my(&var, Shape::Scalar, Some(discriminant))];
        if chain.is_empty() {
            body.extend(default.unwrap_or_default());
        } else {
            let (cond, then_branch) = chain.remove(0);
            body.push(Stmt::new(StmtKind::If {
                cond,
                then_branch,
                elsifs: chain,
                else_branch: default,
            }));
        }
        Stmt::new(StmtKind::Block { label, body })
    }

    /// `next` for a `continue`. Inside a switch, the bare block would catch
    /// a plain `next`, so the enclosing loop gets a label.
    pub(super) fn next_stmt(&mut self) -> Stmt {
        let mut crossed_switch = false;
        let mut label = None;
        for i in (0..self.frames.len()).rev() {
            if self.frames[i].switch {
                crossed_switch = true;
                continue;
            }
            if crossed_switch {
                label = Some(self.frame_label(i));
            }
            break;
        }
        Stmt::new(StmtKind::LoopControl {
            kind: LoopControl::Next,
            label,
        })
    }

    /// `return` inside an inlined `forEach` callback: `next` for the
    /// `foreach` it became, labeled when other blocks sit in between.
    fn callback_next(&mut self) -> Stmt {
        let Some(i) = self.frames.iter().rposition(|f| f.callback) else {
            return self.next_stmt();
        };
        let label = (i + 1 < self.frames.len()).then(|| self.frame_label(i));
        Stmt::new(StmtKind::LoopControl {
            kind: LoopControl::Next,
            label,
        })
    }

    /// Label of frame `i`, allocated on first use.
    fn frame_label(&mut self, i: usize) -> String {
        if let Some(label) = &self.frames[i].label {
            return label.clone();
        }
        let fresh = perl_label(&self.names.fresh("loop"));
        self.frames[i].label = Some(fresh.clone());
        fresh
    }

    fn throw_stmt(&mut self, node: JsNode<'_>) -> Stmt {
        let Some(arg) = node.child("argument").map(JsNode::unwrapped) else {
            return Stmt::new(StmtKind::Die(Expr::string("Died\n")));
        };
        let error_message = match arg.kind() {
            "ErrorCreation" => Some(arg.child("message")),
            "NewExpression"
                if arg
                    .child("callee")
                    .and_then(|c| c.name())
                    .is_some_and(is_error_class) =>
            {
                Some(arg.children("arguments").first().copied())
            }
            _ => None,
        };
        let value = match error_message {
            Some(message) => {
                let message = message
                    .map(|m| self.value(m))
                    .unwrap_or_else(|| Expr::string("Error"));
                binary(BinaryOp::Concat, message, Expr::string("\n"))
            }
            None => self.value(arg),
        };
        Stmt::new(StmtKind::Die(value))
    }

    fn try_stmt(&mut self, node: JsNode<'_>) -> Stmt {
        let native = self.options.modern_syntax;
        if native {
            self.native_try = true;
        }
        let body = self.branch(node.child("block"));
        let catch = node.child("handler").map(|handler| {
            let var = handler
                .child("param")
                .and_then(|p| p.name())
                .map(String::from)
                .unwrap_or_else(|| self.names.fresh("error"));
            self.scopes.push();
            self.scopes.declare(&var, Shape::Scalar);
            self.catch_vars.push(var.clone());
            let body = match handler.child("body") {
                Some(b) => self.stmts(&b.children("body")),
                None => Vec::new(),
            };
            self.catch_vars.pop();
            self.scopes.pop();
            CatchClause { var, body }
        });
        let finally = node.child("finalizer").map(|f| self.branch(Some(f)));
        Stmt::new(StmtKind::Try {
            body,
            catch,
            finally,
            native,
        })
    }

    /// Expression in statement position. Some library calls have a cheaper
    /// statement form (in-place sort, a plain loop for `forEach`).
    pub(super) fn expr_stmt(&mut self, expr: JsNode<'_>) -> Vec<Stmt> {
        let expr = expr.unwrapped();
        if let Some(stmts) = self.il_stmt(expr) {
            return stmts;
        }
        match expr.js_type() {
            "SequenceExpression" => {
                return expr
                    .children("expressions")
                    .into_iter()
                    .flat_map(|e| self.expr_stmt(e))
                    .collect();
            }
            "CallExpression" => {
                let Some(callee) = expr.child("callee").map(JsNode::unwrapped) else {
                    return Vec::new();
                };
                if callee.js_type() == "Super" {
                    let args = self.args(&expr.children("arguments"));
                    return self.super_constructor(args);
                }
                if let Some(method) = callee.static_member_name()
                    && let Some(receiver) = callee.child("object")
                    && let Some(stmts) =
                        self.method_stmt(receiver, method, &expr.children("arguments"))
                {
                    return stmts;
                }
            }
            "AssignmentExpression" => {
                if let Some(stmt) = self.length_assignment(expr) {
                    return vec![stmt];
                }
            }
            "ConditionalExpression" => {
                if let Some(decided) = expr.child("test").and_then(lower::evaluate_guard) {
                    let taken = if decided { "consequent" } else { "alternate" };
                    return expr
                        .child(taken)
                        .map(|e| self.expr_stmt(e))
                        .unwrap_or_default();
                }
            }
            _ => {}
        }
        match self.expr(expr) {
            Some(e) => vec![Stmt::expr(e)],
            None => Vec::new(),
        }
    }

    /// `super(...)` in a constructor: creates `$self`, then runs the field
    /// initializers.
    pub(super) fn super_constructor(&mut self, args: Vec<Expr>) -> Vec<Stmt> {
        let call = Expr::Call {
            callee: Callee::Method {
                invocant: Box::new(Expr::scalar("class")),
                name: "SUPER::new".to_string(),
            },
            args,
        };
        match self.pending_fields.take() {
            Some(fields) => {
                let mut out = vec![Stmt::my("self", Shape::Scalar, Some(call))];
                out.extend(fields);
                out
            }
            None => vec![Stmt::expr(Expr::assign(Expr::scalar("self"), call))],
        }
    }

    /// `arr.length = n` truncates or extends: `$#{$arr} = n - 1`.
    fn length_assignment(&mut self, expr: JsNode<'_>) -> Option<Stmt> {
        if expr.str_field("operator") != Some("=") {
            return None;
        }
        let left = expr.child("left")?.unwrapped();
        if left.static_member_name() != Some("length") {
            return None;
        }
        let object = left.child("object")?;
        if lower::is_string_like(object) {
            return None;
        }
        let value = self.value(expr.child("right")?);
        let base = self.array_base(object);
        Some(Stmt::expr(Expr::assign(
            Expr::LastIndex(Box::new(base)),
            binary(BinaryOp::Sub, value, Expr::number(1)),
        )))
    }

    // ---------------------------------------------------------------------
    // Functions and classes
    // ---------------------------------------------------------------------

    /// Build a sub from a function node (declaration, expression, arrow or
    /// method value).
    pub(super) fn lower_function(&mut self, name: &str, func: JsNode<'_>, kind: SubKind<'_>) -> Sub {
        let saved_invocant = self.invocant;
        let saved_frames = std::mem::take(&mut self.frames);
        let saved_return_as_next = std::mem::replace(&mut self.return_as_next, false);
        let saved_pending = self.pending_fields.take();
        let saved_in_constructor = self.in_constructor;
        self.invocant = match kind {
            SubKind::Plain => saved_invocant,
            SubKind::Static => "class",
            SubKind::Method | SubKind::Constructor { .. } => "self",
        };
        self.in_constructor = matches!(kind, SubKind::Constructor { .. });
        self.fn_depth += 1;
        self.scopes.push();
        self.hoisted.push(HashSet::new());

        let mut prelude = Vec::new();
        let params = self.params(&func.children("params"), &mut prelude);
        let body_node = func.child("body");
        let statements = match body_node {
            Some(b) if b.js_type() == "BlockStatement" => b.children("body"),
            _ => Vec::new(),
        };
        prelude.extend(self.hoist(&statements));

        let mut body = Vec::new();
        let (is_method, is_static) = match &kind {
            SubKind::Plain => (false, false),
            SubKind::Method => (true, false),
            SubKind::Static | SubKind::Constructor { .. } => (true, true),
        };
        if let SubKind::Constructor { has_base, fields } = &kind {
            let mut field_stmts = Vec::new();
            for (field, init) in fields {
                let value = init.map(|i| self.value(i)).unwrap_or_else(Expr::undef);
                field_stmts.push(Stmt::expr(Expr::assign(
                    Expr::key(Expr::scalar("self"), Expr::string(field)),
                    value,
                )));
            }
            self.pending_fields = Some(field_stmts);
            let main = self.stmts(&statements);
            if let Some(fields) = self.pending_fields.take() {
                let create = if *has_base && body_node.is_none() {
                    Expr::Call {
                        callee: Callee::Method {
                            invocant: Box::new(Expr::scalar("class")),
                            name: "SUPER::new".to_string(),
                        },
                        args: vec![Expr::var("args", Shape::List)],
                    }
                } else {
                    Expr::Bless {
                        data: Box::new(Expr::HashRef(Vec::new())),
                        class: Box::new(Expr::scalar("class")),
                    }
                };
                body.push(Stmt::my("self", Shape::Scalar, Some(create)));
                body.extend(fields);
            }
            body.extend(main);
            body.push(Stmt::ret(Some(Expr::scalar("self"))));
        } else {
            match body_node {
                Some(b) if b.js_type() == "BlockStatement" => body.extend(self.stmts(&statements)),
                Some(expr) => {
                    let value = self.value(expr);
                    body.push(Stmt::ret(Some(value)));
                }
                None => {}
            }
        }
        let mut all = prelude;
        all.extend(body);

        self.hoisted.pop();
        self.scopes.pop();
        self.fn_depth -= 1;
        self.invocant = saved_invocant;
        self.frames = saved_frames;
        self.return_as_next = saved_return_as_next;
        self.pending_fields = saved_pending;
        self.in_constructor = saved_in_constructor;

        let mut sub = Sub::new(name, params, all);
        sub.is_method = is_method;
        sub.is_static = is_static;
        if self.options.type_annotations {
            sub.return_type = return_type(func);
        }
        sub.meta = meta_of(func);
        sub
    }

    fn params(&mut self, nodes: &[JsNode<'_>], prelude: &mut Vec<Stmt>) -> Vec<Param> {
        let annotate = self.options.type_annotations;
        let mut params = Vec::new();
        for node in nodes {
            let mut param = match node.js_type() {
                "Identifier" => {
                    let name = node.name().unwrap_or_default();
                    self.scopes.declare(name, Shape::Scalar);
                    Param::scalar(name)
                }
                "AssignmentPattern" => {
                    let Some(left) = node.child("left") else { continue };
                    let default = node.child("right");
                    let mut param = match left.name() {
                        Some(name) => {
                            self.scopes.declare(name, Shape::Scalar);
                            Param::scalar(name)
                        }
                        None => self.pattern_param(left, prelude),
                    };
                    param.default = default.map(|d| self.value(d));
                    if annotate {
                        param.ty = infer_type(default);
                    }
                    param
                }
                "RestElement" => {
                    let name = node
                        .child("argument")
                        .and_then(|a| a.name())
                        .unwrap_or("rest");
                    self.scopes.declare(name, Shape::List);
                    let mut param = Param::scalar(name);
                    param.shape = Shape::List;
                    param.variadic = true;
                    param
                }
                "ObjectPattern" | "ArrayPattern" => self.pattern_param(*node, prelude),
                _ => {
                    self.drops.unsupported(*node);
                    continue;
                }
            };
            if annotate && param.ty.is_none() {
                param.ty = node.result_type().and_then(PerlType::from_result_type);
            }
            params.push(param);
        }
        params
    }

    /// A destructured parameter: bound to a fresh scalar, unpacked on entry.
    fn pattern_param(&mut self, pattern: JsNode<'_>, prelude: &mut Vec<Stmt>) -> Param {
        let name = self.names.fresh("args");
        self.scopes.declare(&name, Shape::Scalar);
        if pattern.js_type() == "ObjectPattern" {
            prelude.extend(self.destructure_object(pattern, Expr::scalar(&name)));
        } else {
            let targets = self.pattern_targets(pattern);
            prelude.push(Stmt::new(StmtKind::VarDecl {
                targets,
                init: Some(Expr::deref(Expr::scalar(&name), Shape::List)),
                scope: DeclScope::My,
            }));
        }
        let mut param = Param::scalar(&name);
        param.named = pattern.js_type() == "ObjectPattern";
        param
    }

    /// Declarations JavaScript hoists to the top of a function body: nested
    /// function declarations and `var`s declared inside blocks.
    fn hoist(&mut self, body: &[JsNode<'_>]) -> Vec<Stmt> {
        let mut out = Vec::new();
        let functions: Vec<JsNode<'_>> = body
            .iter()
            .filter(|s| s.js_type() == "FunctionDeclaration")
            .copied()
            .collect();
        for func in &functions {
            if let Some(name) = func.child("id").and_then(|id| id.name())
                && self.scopes.declare(name, Shape::Scalar)
            {
                out.push(Stmt::my(name, Shape::Scalar, None));
            }
        }
        for (name, shape) in lower::nested_vars(body) {
            if self.scopes.declare(name, shape) {
                out.push(Stmt::my(name, shape, None));
            }
            if let Some(hoisted) = self.hoisted.last_mut() {
                hoisted.insert(name.to_string());
            }
        }
        for func in functions {
            let Some(name) = func.child("id").and_then(|id| id.name()) else {
                continue;
            };
            let sub = self.lower_function("", func, SubKind::Plain);
            out.push(
                Stmt::expr(Expr::assign(Expr::scalar(name), Expr::AnonSub(Box::new(sub))))
                    .with_meta(meta_of(func)),
            );
            if let Some(hoisted) = self.hoisted.last_mut() {
                hoisted.insert(name.to_string());
            }
        }
        out
    }

    /// A class declaration or expression as a package.
    fn class_decl(&mut self, node: JsNode<'_>, name: Option<&str>) -> Option<Stmt> {
        let name = name.or_else(|| node.child("id").and_then(|id| id.name()))?;
        self.classes.insert(name.to_string());
        let base = node.child("superClass").and_then(qualified_name);
        let members = node
            .child("body")
            .map(|b| b.children("body"))
            .unwrap_or_default();

        let mut ctx = ClassCtx {
            name: name.to_string(),
            ..ClassCtx::default()
        };
        for member in &members {
            let key = member_key(*member);
            match (member.str_field("kind"), key) {
                (Some("get"), Some(key)) => {
                    ctx.getters.insert(key.to_string());
                }
                (Some("set"), Some(key)) => {
                    ctx.setters.insert(key.to_string());
                }
                _ => {}
            }
        }
        let saved_ctx = self.class_ctx.replace(ctx);

        let mut fields = Vec::new();
        let mut instance_fields = Vec::new();
        let mut static_init = Vec::new();
        let mut constructor = None;
        let mut methods = Vec::new();
        for member in &members {
            match member.js_type() {
                "PropertyDefinition" => {
                    let Some(key) = member_key(*member) else { continue };
                    let value = member.child("value");
                    let is_static = member.bool_field("static");
                    let ty = if self.options.type_annotations {
                        infer_type(value)
                    } else {
                        None
                    };
                    fields.push(Field {
                        name: key.to_string(),
                        ty,
                        is_static,
                    });
                    if is_static {
                        let saved = std::mem::replace(&mut self.invocant, "class");
                        let value = value.map(|v| self.value(v));
                        self.invocant = saved;
                        static_init.push(Stmt::new(StmtKind::VarDecl {
                            targets: vec![VarTarget {
                                name: key.to_string(),
                                shape: Shape::Scalar,
                            }],
                            init: value,
                            scope: DeclScope::Our,
                        }));
                    } else {
                        instance_fields.push((key.to_string(), value));
                    }
                }
                "StaticBlock" => {
                    let saved = std::mem::replace(&mut self.invocant, "class");
                    let mut block = vec![Stmt::my(
                        "class",
                        Shape::Scalar,
                        Some(Expr::Raw("__PACKAGE__".to_string())),
                    )];
                    block.extend(self.scoped_stmts(&member.children("body")));
                    self.invocant = saved;
                    static_init.push(Stmt::new(StmtKind::Block {
                        label: None,
                        body: block,
                    }));
                }
                "MethodDefinition" => {
                    let Some(value) = member.child("value") else { continue };
                    let Some(key) = member_key(*member) else { continue };
                    match member.str_field("kind") {
                        Some("constructor") => constructor = Some(value),
                        kind => {
                            let sub_kind = if member.bool_field("static") {
                                SubKind::Static
                            } else {
                                SubKind::Method
                            };
                            let sub_name = match kind {
                                Some("set") => format!("set_{key}"),
                                _ => key.to_string(),
                            };
                            let mut sub = self.lower_function(&sub_name, value, sub_kind);
                            sub.meta.comments = meta_of(*member).comments;
                            methods.push(sub);
                        }
                    }
                }
                _ => self.drops.unsupported(*member),
            }
        }

        let has_base = base.is_some();
        let mut new = match constructor {
            Some(ctor) => self.lower_function(
                "new",
                ctor,
                SubKind::Constructor {
                    has_base,
                    fields: instance_fields,
                },
            ),
            None => self.default_constructor(has_base, instance_fields),
        };
        new.name = "new".to_string();
        methods.insert(0, new);

        self.class_ctx = saved_ctx;
        Some(Stmt::new(StmtKind::Package(Box::new(Package {
            name: name.to_string(),
            base,
            fields,
            methods,
            static_init,
            block_form: self.options.modern_syntax,
            meta: meta_of(node),
        }))))
    }

    /// `new` for a class without a constructor: forwards to the base class.
    fn default_constructor(
        &mut self,
        has_base: bool,
        fields: Vec<(String, Option<JsNode<'_>>)>,
    ) -> Sub {
        let saved = std::mem::replace(&mut self.invocant, "self");
        self.scopes.push();
        let create = if has_base {
            Expr::Call {
                callee: Callee::Method {
                    invocant: Box::new(Expr::scalar("class")),
                    name: "SUPER::new".to_string(),
                },
                args: vec![Expr::var("args", Shape::List)],
            }
        } else {
            Expr::Bless {
                data: Box::new(Expr::HashRef(Vec::new())),
                class: Box::new(Expr::scalar("class")),
            }
        };
        let mut body = vec![Stmt::my("self", Shape::Scalar, Some(create))];
        for (field, init) in fields {
            let value = init.map(|i| self.value(i)).unwrap_or_else(Expr::undef);
            body.push(Stmt::expr(Expr::assign(
                Expr::key(Expr::scalar("self"), Expr::string(&field)),
                value,
            )));
        }
        body.push(Stmt::ret(Some(Expr::scalar("self"))));
        self.scopes.pop();
        self.invocant = saved;

        let params = if has_base {
            let mut rest = Param::scalar("args");
            rest.shape = Shape::List;
            rest.variadic = true;
            vec![rest]
        } else {
            Vec::new()
        };
        let mut sub = Sub::new("new", params, body);
        sub.is_method = true;
        sub.is_static = true;
        sub
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// Transform an expression; `None` when it is not supported (dropped).
    pub(super) fn expr(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let node = node.unwrapped();
        if node.str_field("ilNodeType").is_some()
            && let Some(expr) = self.il_expr(node)
        {
            return Some(expr);
        }
        let expr = match node.js_type() {
            "Identifier" => self.identifier(node.name()?),
            "Literal" => self.literal(node),
            "TemplateLiteral" => self.template(node),
            "ThisExpression" => Expr::scalar(self.invocant),
            "ArrayExpression" => Expr::ArrayRef(self.array_items(node)),
            "ObjectExpression" => Expr::HashRef(self.object_pairs(node)),
            "BinaryExpression" => self.binary_expr(node)?,
            "LogicalExpression" => {
                let op = match node.str_field("operator")? {
                    "&&" => BinaryOp::And,
                    "||" => BinaryOp::Or,
                    "??" => BinaryOp::DefinedOr,
                    _ => return self.unsupported(node),
                };
                let left = self.value(node.child("left")?);
                let right = self.value(node.child("right")?);
                binary(op, left, right)
            }
            "UnaryExpression" => self.unary_expr(node)?,
            "UpdateExpression" => {
                let target = self.value(node.child("argument")?);
                let op = match (node.str_field("operator")?, node.bool_field("prefix")) {
                    ("++", true) => UnaryOp::PreInc,
                    ("++", false) => UnaryOp::PostInc,
                    ("--", true) => UnaryOp::PreDec,
                    _ => UnaryOp::PostDec,
                };
                unary(op, target)
            }
            "AssignmentExpression" => self.assignment(node)?,
            "MemberExpression" => self.member(node)?,
            "CallExpression" => self.call(node)?,
            "NewExpression" => self.new_expr(node)?,
            "ConditionalExpression" => {
                let test = node.child("test")?;
                if let Some(decided) = lower::evaluate_guard(test) {
                    let taken = if decided { "consequent" } else { "alternate" };
                    return self.expr(node.child(taken)?);
                }
                let cond = self.value(test);
                let then_expr = self.value(node.child("consequent")?);
                let else_expr = self.value(node.child("alternate")?);
                ternary(cond, then_expr, else_expr)
            }
            "SequenceExpression" => {
                let mut exprs = self.sequence(node);
                let last = exprs.pop()?;
                if exprs.is_empty() {
                    last
                } else {
                    let mut body: Vec<Stmt> = exprs.into_iter().map(Stmt::expr).collect();
                    body.push(Stmt::expr(last));
                    Expr::Do(body)
                }
            }
            "FunctionExpression" | "ArrowFunctionExpression" => {
                Expr::AnonSub(Box::new(self.lower_function("", node, SubKind::Plain)))
            }
            "ClassExpression" => {
                let name = node
                    .child("id")
                    .and_then(|id| id.name())
                    .map(String::from)
                    .unwrap_or_else(|| perl_label(&self.names.fresh("class")));
                let package = self.class_decl(node, Some(&name))?;
                Expr::Do(vec![package, Stmt::expr(Expr::string(&name))])
            }
            "SpreadElement" => self.list_of(node.child("argument")?),
            _ => return self.unsupported(node),
        };
        Some(expr)
    }

    fn unsupported(&mut self, node: JsNode<'_>) -> Option<Expr> {
        self.drops.unsupported(node);
        None
    }

    /// Transform an expression in a position that needs a value; dropped
    /// expressions become `undef`.
    pub(super) fn value(&mut self, node: JsNode<'_>) -> Expr {
        self.expr(node).unwrap_or_else(Expr::undef)
    }

    pub(super) fn sequence(&mut self, node: JsNode<'_>) -> Vec<Expr> {
        let node = node.unwrapped();
        if node.js_type() == "SequenceExpression" {
            node.children("expressions")
                .into_iter()
                .filter_map(|e| self.expr(e))
                .collect()
        } else {
            self.expr(node).into_iter().collect()
        }
    }

    fn identifier(&mut self, name: &str) -> Expr {
        match name {
            "undefined" => return Expr::undef(),
            "NaN" => return nan(),
            "Infinity" => return infinity(),
            _ => {}
        }
        if let Some(shape) = self.scopes.lookup(name) {
            return var_value(name, shape);
        }
        if name == "arguments" {
            return unary(UnaryOp::Ref, Expr::var("_", Shape::List));
        }
        if self.functions.contains(name) {
            return Expr::Raw(format!("\\&{}", self.qualify(name)));
        }
        if self.classes.contains(name) {
            return Expr::string(name);
        }
        tracing::trace!(name, "reference to undeclared name");
        Expr::scalar(name)
    }

    /// Name of a top-level sub as seen from the current position.
    pub(super) fn qualify(&self, name: &str) -> String {
        if self.class_ctx.is_some() || PERL_BUILTINS.contains(&name) {
            let package = self.options.module_name.as_deref().unwrap_or("main");
            format!("{package}::{name}")
        } else {
            name.to_string()
        }
    }

    fn literal(&mut self, node: JsNode<'_>) -> Expr {
        if let Some(regex) = node.field("regex") {
            let pattern = regex.get("pattern").and_then(Value::as_str).unwrap_or("");
            let flags = regex.get("flags").and_then(Value::as_str).unwrap_or("");
            return Expr::Regex {
                source: RegexSource::Pattern(pattern.to_string()),
                flags: perl_regex_flags(flags),
            };
        }
        if let Some(bigint) = node.str_field("bigint") {
            return Expr::Literal(Literal::Number(bigint.to_string()));
        }
        match node.field("value") {
            Some(Value::String(s)) => Expr::string(s),
            Some(Value::Bool(b)) => Expr::Literal(Literal::Bool(*b)),
            Some(Value::Number(n)) => Expr::Literal(Literal::Number(number_text(
                n.as_f64().unwrap_or(0.0),
                node.str_field("raw"),
            ))),
            _ => Expr::undef(),
        }
    }

    fn template(&mut self, node: JsNode<'_>) -> Expr {
        let quasis = node.children("quasis");
        let exprs = node.children("expressions");
        let mut parts = Vec::new();
        for (i, quasi) in quasis.iter().enumerate() {
            let text = quasi
                .field("value")
                .and_then(|v| v.get("cooked").or_else(|| v.get("raw")))
                .and_then(Value::as_str)
                .unwrap_or("");
            if !text.is_empty() {
                parts.push(Expr::string(text));
            }
            if let Some(expr) = exprs.get(i) {
                parts.push(self.value(*expr));
            }
        }
        match parts.len() {
            0 => Expr::string(""),
            1 if matches!(parts[0], Expr::Literal(Literal::String(_))) => parts.remove(0),
            1 => binary(BinaryOp::Concat, Expr::string(""), parts.remove(0)),
            _ => parts
                .into_iter()
                .reduce(|acc, part| binary(BinaryOp::Concat, acc, part))
                .unwrap_or_else(|| Expr::string("")),
        }
    }

    pub(super) fn array_items(&mut self, node: JsNode<'_>) -> Vec<Expr> {
        node.children_with_holes("elements")
            .into_iter()
            .map(|element| match element {
                Some(e) if e.js_type() == "SpreadElement" => match e.child("argument") {
                    Some(arg) => self.list_of(arg),
                    None => Expr::undef(),
                },
                Some(e) => self.value(e),
                None => Expr::undef(),
            })
            .collect()
    }

    pub(super) fn object_pairs(&mut self, node: JsNode<'_>) -> Vec<(Expr, Expr)> {
        let mut pairs = Vec::new();
        for prop in node.children("properties") {
            if prop.js_type() == "SpreadElement" {
                self.drops
                    .lossy("object spread in a literal is not supported".to_string());
                continue;
            }
            let Some(key_node) = prop.child("key") else { continue };
            let key = if prop.bool_field("computed") {
                self.value(key_node)
            } else if let Some(name) = key_node.name() {
                Expr::string(name)
            } else {
                match key_node.field("value") {
                    Some(Value::String(s)) => Expr::string(s),
                    Some(Value::Number(n)) => Expr::string(&number_text(
                        n.as_f64().unwrap_or(0.0),
                        key_node.str_field("raw"),
                    )),
                    _ => self.value(key_node),
                }
            };
            let value = match prop.child("value") {
                Some(v) => self.value(v),
                None => Expr::undef(),
            };
            pairs.push((key, value));
        }
        pairs
    }

    fn binary_expr(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let operator = node.str_field("operator")?;
        let left_node = node.child("left")?.unwrapped();
        let right_node = node.child("right")?.unwrapped();
        if matches!(operator, "==" | "===" | "!=" | "!==")
            && let Some(test) = self.special_equality(left_node, right_node)
        {
            let negate = matches!(operator, "!=" | "!==");
            return Some(if negate { not(test) } else { test });
        }
        let stringy = lower::is_string_like(left_node) || lower::is_string_like(right_node);
        match operator {
            "instanceof" => return Some(self.instance_of(left_node, right_node)),
            "in" => {
                let key = self.value(left_node);
                let base = self.hash_base(right_node);
                return Some(Expr::call("exists", vec![Expr::key(base, key)]));
            }
            "|" if is_zero(right_node) => return Some(int32(self.value(left_node))),
            ">>>" | "<<" | ">>" | "&" | "|" | "^" => {
                let narrow =
                    lower::is_int31_literal(left_node) || lower::is_int31_literal(right_node);
                let left = self.value(left_node);
                let right = self.value(right_node);
                return Some(self.bitwise(operator, left, right, narrow));
            }
            _ => {}
        }
        let op = match operator {
            "+" if stringy => BinaryOp::Concat,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Pow,
            "==" | "===" if stringy => BinaryOp::StrEq,
            "==" | "===" => BinaryOp::NumEq,
            "!=" | "!==" if stringy => BinaryOp::StrNe,
            "!=" | "!==" => BinaryOp::NumNe,
            "<" if stringy => BinaryOp::StrLt,
            "<" => BinaryOp::NumLt,
            ">" if stringy => BinaryOp::StrGt,
            ">" => BinaryOp::NumGt,
            "<=" if stringy => BinaryOp::StrLe,
            "<=" => BinaryOp::NumLe,
            ">=" if stringy => BinaryOp::StrGe,
            ">=" => BinaryOp::NumGe,
            _ => return self.unsupported(node),
        };
        let left = self.value(left_node);
        let right = self.value(right_node);
        Some(binary(op, left, right))
    }

    /// Comparisons with `null`/`undefined` and `typeof` checks, as the
    /// positive test (the caller negates `!=`).
    fn special_equality(&mut self, left: JsNode<'_>, right: JsNode<'_>) -> Option<Expr> {
        if is_nullish(right) {
            return Some(not(Expr::call("defined", vec![self.value(left)])));
        }
        if is_nullish(left) {
            return Some(not(Expr::call("defined", vec![self.value(right)])));
        }
        let (typeof_node, literal) = if is_typeof(left) {
            (left, right)
        } else if is_typeof(right) {
            (right, left)
        } else {
            return None;
        };
        let expected = literal.string_value()?;
        let operand = self.value(typeof_node.child("argument")?);
        Some(self.typeof_test(operand, expected))
    }

    fn typeof_test(&mut self, operand: Expr, expected: &str) -> Expr {
        let ref_of = |e: Expr| Expr::call("ref", vec![e]);
        match expected {
            "undefined" => not(Expr::call("defined", vec![operand])),
            "function" => binary(BinaryOp::StrEq, ref_of(operand), Expr::string("CODE")),
            "object" => binary(
                BinaryOp::And,
                ref_of(operand.clone()),
                binary(BinaryOp::StrNe, ref_of(operand), Expr::string("CODE")),
            ),
            "number" | "bigint" => {
                self.imports.require("Scalar::Util");
                binary(
                    BinaryOp::And,
                    not(ref_of(operand.clone())),
                    Expr::call("Scalar::Util::looks_like_number", vec![operand]),
                )
            }
            "string" => {
                self.imports.require("Scalar::Util");
                binary(
                    BinaryOp::And,
                    binary(
                        BinaryOp::And,
                        Expr::call("defined", vec![operand.clone()]),
                        not(ref_of(operand.clone())),
                    ),
                    not(Expr::call("Scalar::Util::looks_like_number", vec![operand])),
                )
            }
            "boolean" => {
                self.drops
                    .lossy("typeof 'boolean' has no Perl counterpart".to_string());
                Expr::call("defined", vec![operand])
            }
            other => {
                self.drops
                    .lossy(format!("typeof comparison with '{other}' is always false"));
                Expr::Literal(Literal::Bool(false))
            }
        }
    }

    /// `typeof x` used as a value.
    fn typeof_value(&mut self, operand: Expr) -> Expr {
        self.imports.require("Scalar::Util");
        let ref_of = Expr::call("ref", vec![operand.clone()]);
        ternary(
            binary(BinaryOp::StrEq, ref_of.clone(), Expr::string("CODE")),
            Expr::string("function"),
            ternary(
                ref_of,
                Expr::string("object"),
                ternary(
                    not(Expr::call("defined", vec![operand.clone()])),
                    Expr::string("undefined"),
                    ternary(
                        Expr::call("Scalar::Util::looks_like_number", vec![operand]),
                        Expr::string("number"),
                        Expr::string("string"),
                    ),
                ),
            ),
        )
    }

    fn instance_of(&mut self, value: JsNode<'_>, class: JsNode<'_>) -> Expr {
        let object = self.value(value);
        let ref_is = |kind: &str| {
            binary(
                BinaryOp::StrEq,
                Expr::call("ref", vec![object.clone()]),
                Expr::string(kind),
            )
        };
        match class.name() {
            Some("Array") => ref_is("ARRAY"),
            Some("Function") => ref_is("CODE"),
            Some("Object") => Expr::call("ref", vec![object]),
            _ => {
                let class_name = qualified_name(class).unwrap_or_else(|| "UNIVERSAL".to_string());
                self.imports.require("Scalar::Util");
                binary(
                    BinaryOp::And,
                    Expr::call("Scalar::Util::blessed", vec![object.clone()]),
                    Expr::method(object, "isa", vec![Expr::string(&class_name)]),
                )
            }
        }
    }

    fn unary_expr(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let operator = node.str_field("operator")?;
        let argument = node.child("argument")?;
        Some(match operator {
            "!" => {
                if let Some(decided) = lower::evaluate_guard(argument) {
                    return Some(Expr::Literal(Literal::Bool(!decided)));
                }
                not(self.value(argument))
            }
            "-" => unary(UnaryOp::Neg, self.value(argument)),
            "+" => binary(BinaryOp::Add, self.value(argument), Expr::number(0)),
            "~" => int32(unary(UnaryOp::BitNot, self.value(argument))),
            "typeof" => {
                let operand = self.value(argument);
                self.typeof_value(operand)
            }
            "void" => Expr::undef(),
            "delete" => Expr::call("delete", vec![self.value(argument)]),
            _ => return self.unsupported(node),
        })
    }

    /// JavaScript's 32-bit integer operators. `narrow` when one operand of
    /// `&` is a literal mask that already keeps the result non-negative.
    fn bitwise(&mut self, operator: &str, left: Expr, right: Expr, narrow: bool) -> Expr {
        match operator {
            ">>>" => unsigned_shift(left, right),
            "<<" => left_shift(left, right),
            ">>" => self.signed_shift(left, right),
            "&" if narrow => binary(BinaryOp::BitAnd, left, right),
            "&" => int32(binary(BinaryOp::BitAnd, left, right)),
            "|" => int32(binary(BinaryOp::BitOr, left, right)),
            _ => int32(binary(BinaryOp::BitXor, left, right)),
        }
    }

    /// JavaScript's `>>`.
    fn signed_shift(&mut self, value: Expr, amount: Expr) -> Expr {
        if let Expr::Literal(Literal::Number(n)) = &amount
            && let Ok(n) = n.parse::<u32>()
        {
            let n = n & 31;
            if n == 0 {
                return int32(value);
            }
            let sign = hex(lower::shifted_sign(n));
            return sign_propagating_shift(value, Expr::number(i64::from(n)), sign);
        }
        let mut setup = Vec::new();
        let value = self.bind(value, "value", &mut setup);
        let amount = self.bind(
            binary(BinaryOp::BitAnd, amount, Expr::number(31)),
            "shift",
            &mut setup,
        );
        let sign = binary(BinaryOp::Shr, hex(lower::INT32_SIGN), amount.clone());
        with_setup(setup, sign_propagating_shift(value, amount, sign))
    }

    fn assignment(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let operator = node.str_field("operator")?;
        let left = node.child("left")?.unwrapped();
        let right = node.child("right")?;

        if left.js_type() == "ArrayPattern" {
            let targets: Vec<Expr> = left
                .children_with_holes("elements")
                .into_iter()
                .map(|e| match e {
                    Some(e) => self.value(e),
                    None => Expr::undef(),
                })
                .collect();
            let value = self.list_of(right);
            return Some(Expr::assign(Expr::List(targets), value));
        }

        // Setter on `this`.
        if operator == "="
            && let Some(name) = self.this_member(left)
            && self
                .class_ctx
                .as_ref()
                .is_some_and(|c| c.setters.contains(name))
        {
            let value = self.value(right);
            return Some(Expr::method(
                Expr::scalar(self.invocant),
                &format!("set_{name}"),
                vec![value],
            ));
        }

        if operator == "=" {
            if let Some(name) = left.name()
                && let Some(shape @ (Shape::List | Shape::Map)) = self.scopes.lookup(name)
            {
                let value = self.shaped_value(shape, right);
                return Some(Expr::assign(Expr::var(name, shape), value));
            }
            let target = self.target(left)?;
            let value = self.value(right);
            return Some(Expr::assign(target, value));
        }

        let target = self.target(left)?;
        let value = self.value(right);
        let bitwise = operator.strip_suffix('=').filter(|op| match *op {
            ">>>" | "<<" | ">>" | "|" | "^" => true,
            "&" => !lower::is_int31_literal(right),
            _ => false,
        });
        if let Some(bitwise) = bitwise {
            let result = self.bitwise(bitwise, target.clone(), value, false);
            return Some(Expr::assign(target, result));
        }
        let stringy = lower::is_string_like(left) || lower::is_string_like(right);
        let op = match operator {
            "+=" if stringy => BinaryOp::Concat,
            "+=" => BinaryOp::Add,
            "-=" => BinaryOp::Sub,
            "*=" => BinaryOp::Mul,
            "/=" => BinaryOp::Div,
            "%=" => BinaryOp::Mod,
            "**=" => BinaryOp::Pow,
            "&=" => BinaryOp::BitAnd,
            "&&=" => BinaryOp::And,
            "||=" => BinaryOp::Or,
            "??=" => BinaryOp::DefinedOr,
            _ => return self.unsupported(node),
        };
        Some(Expr::Assign {
            target: Box::new(target),
            op: Some(op),
            value: Box::new(value),
        })
    }

    /// An assignable expression. List- and map-shaped variables are
    /// assigned through their sigil.
    fn target(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let node = node.unwrapped();
        if let Some(name) = node.name()
            && let Some(shape) = self.scopes.lookup(name)
        {
            return Some(Expr::var(name, shape));
        }
        self.expr(node)
    }

    /// `name` in `this.name`.
    pub(super) fn this_member<'a>(&self, node: JsNode<'a>) -> Option<&'a str> {
        if node.kind() == "ThisPropertyAccess" {
            return node
                .str_field("property")
                .or_else(|| node.child("property").and_then(|p| p.name()));
        }
        let object = node.child("object")?.unwrapped();
        (object.js_type() == "ThisExpression")
            .then(|| node.static_member_name())
            .flatten()
    }

    fn member(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let object = node.child("object")?.unwrapped();
        let property = node.child("property")?;
        if node.bool_field("computed") {
            let index = property.unwrapped();
            if lower::is_string_like(index) || self.is_map_var(object) {
                let base = self.hash_base(object);
                let key = self.value(index);
                return Some(Expr::key(base, key));
            }
            let base = self.array_base(object);
            let index = self.value(index);
            return Some(Expr::index(base, index));
        }
        let name = property.name()?;

        if object.js_type() == "ThisExpression" {
            let invocant = Expr::scalar(self.invocant);
            if self
                .class_ctx
                .as_ref()
                .is_some_and(|c| c.getters.contains(name))
            {
                return Some(Expr::method(invocant, name, Vec::new()));
            }
            if self.invocant == "class" {
                return Some(self.static_field(None, name));
            }
            return Some(Expr::key(invocant, Expr::string(name)));
        }
        if object.js_type() == "Super" {
            return Some(Expr::method(
                Expr::scalar(self.invocant),
                &format!("SUPER::{name}"),
                Vec::new(),
            ));
        }
        if let Some(object_name) = object.name()
            && self.scopes.lookup(object_name).is_none()
        {
            if self.classes.contains(object_name) {
                return Some(self.static_field(Some(object_name), name));
            }
            if let Some(expr) = self.static_member(object_name, name) {
                return Some(expr);
            }
        }
        if let Some(var) = object.name()
            && self.catch_vars.iter().any(|c| c == var)
        {
            match name {
                // `die` appends the newline that keeps Perl's location suffix off.
                "message" => {
                    return Some(Expr::Substitute {
                        target: Box::new(Expr::scalar(var)),
                        source: RegexSource::Pattern(r"\n\z".to_string()),
                        replacement: Box::new(Expr::string("")),
                        global: false,
                    });
                }
                "stack" => return Some(Expr::scalar(var)),
                "name" => return Some(Expr::call("ref", vec![Expr::scalar(var)])),
                _ => {}
            }
        }
        if name == "length" {
            return Some(self.length_of(object));
        }
        let base = self.hash_base(object);
        Some(Expr::key(base, Expr::string(name)))
    }

    /// Class-level field: a package variable.
    fn static_field(&self, class: Option<&str>, name: &str) -> Expr {
        let class = class
            .map(String::from)
            .or_else(|| self.class_ctx.as_ref().map(|c| c.name.clone()))
            .unwrap_or_else(|| "main".to_string());
        Expr::scalar(&format!("{class}::{name}"))
    }

    pub(super) fn args(&mut self, nodes: &[JsNode<'_>]) -> Vec<Expr> {
        nodes
            .iter()
            .map(|arg| {
                if arg.js_type() == "SpreadElement" {
                    match arg.child("argument") {
                        Some(inner) => self.list_of(inner),
                        None => Expr::undef(),
                    }
                } else {
                    self.value(*arg)
                }
            })
            .collect()
    }

    fn call(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let callee = node.child("callee")?.unwrapped();
        let arg_nodes = node.children("arguments");
        match callee.js_type() {
            "Super" => {
                let args = self.args(&arg_nodes);
                Some(Expr::Call {
                    callee: Callee::Method {
                        invocant: Box::new(Expr::scalar("class")),
                        name: "SUPER::new".to_string(),
                    },
                    args,
                })
            }
            "Identifier" => {
                let name = callee.name()?;
                if let Some(shape) = self.scopes.lookup(name) {
                    let code = var_value(name, shape);
                    let args = self.args(&arg_nodes);
                    return Some(Expr::Call {
                        callee: Callee::Code(Box::new(code)),
                        args,
                    });
                }
                if self.functions.contains(name) {
                    let args = self.args(&arg_nodes);
                    return Some(Expr::call(&self.qualify(name), args));
                }
                if self.classes.contains(name) {
                    let args = self.args(&arg_nodes);
                    return Some(Expr::New {
                        class: name.to_string(),
                        args,
                    });
                }
                if let Some(expr) = self.global_call(name, &arg_nodes) {
                    return Some(expr);
                }
                let args = self.args(&arg_nodes);
                Some(Expr::call(name, args))
            }
            "MemberExpression" => self.member_call(callee, &arg_nodes),
            _ => {
                let code = self.value(callee);
                let args = self.args(&arg_nodes);
                Some(Expr::Call {
                    callee: Callee::Code(Box::new(code)),
                    args,
                })
            }
        }
    }

    fn member_call(&mut self, callee: JsNode<'_>, arg_nodes: &[JsNode<'_>]) -> Option<Expr> {
        let object = callee.child("object")?.unwrapped();
        let Some(method) = callee.static_member_name() else {
            // obj[expr](...)
            let code = self.member(callee)?;
            let args = self.args(arg_nodes);
            return Some(Expr::Call {
                callee: Callee::Code(Box::new(code)),
                args,
            });
        };
        match object.js_type() {
            "Super" => {
                let args = self.args(arg_nodes);
                return Some(Expr::method(
                    Expr::scalar(self.invocant),
                    &format!("SUPER::{method}"),
                    args,
                ));
            }
            "ThisExpression" => {
                let args = self.args(arg_nodes);
                return Some(Expr::method(Expr::scalar(self.invocant), method, args));
            }
            _ => {}
        }
        if let Some(object_name) = object.name() {
            match self.scopes.lookup(object_name) {
                None => {
                    if self.classes.contains(object_name) {
                        let args = self.args(arg_nodes);
                        return Some(Expr::Call {
                            callee: Callee::ClassMethod {
                                class: object_name.to_string(),
                                name: method.to_string(),
                            },
                            args,
                        });
                    }
                    if let Some(expr) = self.static_call(object_name, method, arg_nodes) {
                        return Some(expr);
                    }
                }
                Some(Shape::Map) => {
                    let code = Expr::key(Expr::var(object_name, Shape::Map), Expr::string(method));
                    let args = self.args(arg_nodes);
                    return Some(Expr::Call {
                        callee: Callee::Code(Box::new(code)),
                        args,
                    });
                }
                _ => {}
            }
        }
        match method {
            "call" | "apply" if is_callable_ref(object) => {
                let code = self.value(object);
                let rest = arg_nodes.get(1..).unwrap_or_default();
                let args = if method == "apply" {
                    rest.first().map(|a| vec![self.list_of(*a)]).unwrap_or_default()
                } else {
                    self.args(rest)
                };
                return Some(Expr::Call {
                    callee: Callee::Code(Box::new(code)),
                    args,
                });
            }
            _ => {}
        }
        if let Some(expr) = self.method_call(object, method, arg_nodes) {
            return Some(expr);
        }
        let invocant = self.value(object);
        let args = self.args(arg_nodes);
        Some(Expr::method(invocant, method, args))
    }

    fn new_expr(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let callee = node.child("callee")?.unwrapped();
        let arg_nodes = node.children("arguments");
        if let Some(name) = callee.name()
            && self.scopes.lookup(name).is_none()
            && !self.classes.contains(name)
        {
            if is_error_class(name) {
                return Some(match arg_nodes.first() {
                    Some(message) => self.value(*message),
                    None => Expr::string(name),
                });
            }
            if let Some(expr) = self.builtin_constructor(name, &arg_nodes) {
                return Some(expr);
            }
        }
        let class = qualified_name(callee)?;
        let args = self.args(&arg_nodes);
        Some(Expr::New { class, args })
    }

    // ---------------------------------------------------------------------
    // Container views
    // ---------------------------------------------------------------------

    pub(super) fn is_list_var(&self, node: JsNode<'_>) -> bool {
        node.unwrapped()
            .name()
            .is_some_and(|n| self.scopes.lookup(n) == Some(Shape::List))
    }

    pub(super) fn is_map_var(&self, node: JsNode<'_>) -> bool {
        node.unwrapped()
            .name()
            .is_some_and(|n| self.scopes.lookup(n) == Some(Shape::Map))
    }

    /// Expression to index into: `@x` itself for a list variable (rendered
    /// `$x[i]`), else an array reference.
    pub(super) fn array_base(&mut self, node: JsNode<'_>) -> Expr {
        let node = node.unwrapped();
        if let Some(name) = node.name() {
            match self.scopes.lookup(name) {
                Some(Shape::List) => return Expr::var(name, Shape::List),
                None if name == "arguments" => return Expr::var("_", Shape::List),
                _ => {}
            }
        }
        self.value(node)
    }

    /// Expression to take keys from: `%x` itself for a map variable.
    pub(super) fn hash_base(&mut self, node: JsNode<'_>) -> Expr {
        let node = node.unwrapped();
        if let Some(name) = node.name()
            && self.scopes.lookup(name) == Some(Shape::Map)
        {
            return Expr::var(name, Shape::Map);
        }
        self.value(node)
    }

    /// The elements of an array-valued expression, in list context.
    pub(super) fn list_of(&mut self, node: JsNode<'_>) -> Expr {
        let node = node.unwrapped();
        if node.js_type() == "ArrayExpression" {
            return Expr::List(self.array_items(node));
        }
        if lower::is_string_like(node) {
            let string = self.value(node);
            return Expr::call("split", vec![empty_regex(), string]);
        }
        match self.array_base(node) {
            list @ Expr::Var {
                shape: Shape::List,
                ..
            } => list,
            other => Expr::deref(other, Shape::List),
        }
    }

    /// The array an in-place operation (`push`, `splice`) works on.
    pub(super) fn array_target(&mut self, node: JsNode<'_>) -> Expr {
        match self.array_base(node) {
            list @ Expr::Var {
                shape: Shape::List,
                ..
            } => list,
            other => Expr::deref(other, Shape::List),
        }
    }

    /// A hash in list context: `%x` or `%{EXPR}`.
    pub(super) fn hash_of(&mut self, node: JsNode<'_>) -> Expr {
        match self.hash_base(node) {
            map @ Expr::Var {
                shape: Shape::Map, ..
            } => map,
            other => Expr::deref(other, Shape::Map),
        }
    }

    pub(super) fn length_of(&mut self, node: JsNode<'_>) -> Expr {
        let node = node.unwrapped();
        if lower::is_string_like(node) {
            return Expr::call("length", vec![self.value(node)]);
        }
        if self.is_map_var(node) {
            let hash = self.hash_of(node);
            return Expr::call("scalar", vec![Expr::call("keys", vec![hash])]);
        }
        let list = self.array_target(node);
        Expr::call("scalar", vec![list])
    }
}

// -------------------------------------------------------------------------
// Expression builders
// -------------------------------------------------------------------------

/// Binary expression with the parentheses Perl precedence requires.
pub(super) fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let prec = op.precedence();
    let left_prec = left.precedence();
    let right_prec = right.precedence();
    let left_parens = !matches!(left, Expr::List(_))
        && (left_prec < prec
            || (left_prec == prec && (op.is_right_assoc() || op.is_non_assoc())));
    let right_parens = right_prec < prec || (right_prec == prec && !op.is_right_assoc());
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        left_parens,
        right_parens,
    }
}

pub(super) fn unary(op: UnaryOp, operand: Expr) -> Expr {
    let min = if op.is_postfix() { 17 } else { 15 };
    let parens = operand.precedence() < min;
    Expr::Unary {
        op,
        operand: Box::new(operand),
        parens,
    }
}

pub(super) fn not(operand: Expr) -> Expr {
    unary(UnaryOp::Not, operand)
}

pub(super) fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
    let wrap = |e: Expr, min: u8| {
        if e.precedence() < min {
            Expr::Paren(Box::new(e))
        } else {
            e
        }
    };
    Expr::Ternary {
        cond: Box::new(wrap(cond, 3)),
        then_expr: Box::new(wrap(then_expr, 2)),
        else_expr: Box::new(wrap(else_expr, 2)),
    }
}

pub(super) fn hex(value: u64) -> Expr {
    Expr::Literal(Literal::Number(format!("0x{value:X}")))
}

pub(super) fn mask32() -> Expr {
    hex(0xFFFF_FFFF)
}

/// `((value & 0xFFFFFFFF) >> (amount & 31))`: JavaScript's `>>>`.
pub(super) fn unsigned_shift(value: Expr, amount: Expr) -> Expr {
    let value = binary(BinaryOp::BitAnd, value, mask32());
    if matches!(&amount, Expr::Literal(Literal::Number(n)) if n == "0") {
        return value;
    }
    binary(BinaryOp::Shr, value, shift_amount(amount))
}

/// `((value & 0xFFFFFFFF) ^ 0x80000000) - 0x80000000`: the low 32 bits of
/// `value` read as a signed integer.
pub(super) fn int32(value: Expr) -> Expr {
    let sign = hex(lower::INT32_SIGN);
    binary(
        BinaryOp::Sub,
        binary(
            BinaryOp::BitXor,
            binary(BinaryOp::BitAnd, value, mask32()),
            sign.clone(),
        ),
        sign,
    )
}

/// A left shift wrapped to a signed 32-bit result.
pub(super) fn left_shift(value: Expr, amount: Expr) -> Expr {
    int32(binary(BinaryOp::Shl, value, shift_amount(amount)))
}

/// `((value & 0xFFFFFFFF) >> n ^ sign) - sign` with `sign` the 32-bit sign
/// bit shifted by `n`: an arithmetic shift on Perl's unsigned integers.
/// `amount` must already be reduced to `0..32`.
fn sign_propagating_shift(value: Expr, amount: Expr, sign: Expr) -> Expr {
    binary(
        BinaryOp::Sub,
        binary(
            BinaryOp::BitXor,
            binary(BinaryOp::Shr, binary(BinaryOp::BitAnd, value, mask32()), amount),
            sign.clone(),
        ),
        sign,
    )
}

fn shift_amount(amount: Expr) -> Expr {
    match &amount {
        Expr::Literal(Literal::Number(n)) if n.parse::<u32>().is_ok_and(|v| v < 32) => amount,
        _ => binary(BinaryOp::BitAnd, amount, Expr::number(31)),
    }
}

pub(super) fn infinity() -> Expr {
    Expr::Raw("9**9**9".to_string())
}

pub(super) fn nan() -> Expr {
    Expr::Raw("(9**9**9 / 9**9**9)".to_string())
}

pub(super) fn empty_regex() -> Expr {
    Expr::Regex {
        source: RegexSource::Pattern(String::new()),
        flags: String::new(),
    }
}

fn var_value(name: &str, shape: Shape) -> Expr {
    match shape {
        Shape::Scalar => Expr::scalar(name),
        shape => unary(UnaryOp::Ref, Expr::var(name, shape)),
    }
}

// -------------------------------------------------------------------------
// Input helpers
// -------------------------------------------------------------------------

fn meta_of(node: JsNode<'_>) -> NodeMeta {
    let mut meta = NodeMeta::at(node.location());
    meta.comments = node
        .leading_comments()
        .into_iter()
        .map(|c| Comment {
            text: c.text.to_string(),
            block: c.block,
        })
        .collect();
    meta
}

fn perl_label(name: &str) -> String {
    name.trim_start_matches('_').to_uppercase()
}

fn perl_regex_flags(flags: &str) -> String {
    flags.chars().filter(|c| "imsx".contains(*c)).collect()
}

pub(super) fn is_function(node: JsNode<'_>) -> bool {
    matches!(
        node.unwrapped().js_type(),
        "FunctionExpression" | "ArrowFunctionExpression"
    )
}

fn is_callable_ref(node: JsNode<'_>) -> bool {
    matches!(node.js_type(), "Identifier" | "FunctionExpression")
}

fn is_error_class(name: &str) -> bool {
    matches!(
        name,
        "Error" | "TypeError" | "RangeError" | "SyntaxError" | "ReferenceError" | "EvalError"
    )
}

fn is_zero(node: JsNode<'_>) -> bool {
    node.js_type() == "Literal" && node.number_field("value") == Some(0.0)
}

fn is_nullish(node: JsNode<'_>) -> bool {
    node.is_identifier("undefined")
        || (node.js_type() == "Literal"
            && node.field("value").is_none()
            && !node.has("regex")
            && !node.has("bigint"))
        || (node.js_type() == "UnaryExpression" && node.str_field("operator") == Some("void"))
}

fn is_typeof(node: JsNode<'_>) -> bool {
    node.js_type() == "UnaryExpression" && node.str_field("operator") == Some("typeof")
}

/// `A.B.C` as `A::B::C`.
pub(super) fn qualified_name(node: JsNode<'_>) -> Option<String> {
    let node = node.unwrapped();
    match node.js_type() {
        "Identifier" => node.name().map(String::from),
        "MemberExpression" if !node.bool_field("computed") => {
            let object = qualified_name(node.child("object")?)?;
            Some(format!("{object}::{}", node.static_member_name()?))
        }
        _ => None,
    }
}

fn member_key(member: JsNode<'_>) -> Option<&str> {
    let key = member.child("key")?;
    key.name().or_else(|| key.string_value())
}

fn return_type(func: JsNode<'_>) -> Option<PerlType> {
    if let Some(ty) = func.result_type().and_then(PerlType::from_result_type) {
        return Some(ty);
    }
    let body = func.child("body")?;
    if body.js_type() != "BlockStatement" {
        return infer_type(Some(body));
    }
    body.children("body")
        .into_iter()
        .filter(|s| s.js_type() == "ReturnStatement")
        .find_map(|s| infer_type(s.child("argument")))
}

/// Best-effort type of an initializer or default value.
pub(super) fn infer_type(node: Option<JsNode<'_>>) -> Option<PerlType> {
    let node = node?.unwrapped();
    if let Some(ty) = node.result_type().and_then(PerlType::from_result_type) {
        return Some(ty);
    }
    match node.js_type() {
        "Literal" => match node.field("value")? {
            Value::String(_) => Some(PerlType::Str),
            Value::Bool(_) => Some(PerlType::Bool),
            Value::Number(n) => Some(if n.as_f64().is_some_and(|v| v.fract() == 0.0) {
                PerlType::Int
            } else {
                PerlType::Num
            }),
            _ => None,
        },
        "TemplateLiteral" => Some(PerlType::Str),
        "ArrayExpression" => {
            let elements = node.children("elements");
            let inner = if !elements.is_empty()
                && elements
                    .iter()
                    .all(|e| infer_type(Some(*e)) == Some(PerlType::Int))
            {
                PerlType::Int
            } else {
                PerlType::Any
            };
            Some(PerlType::ArrayRef(Box::new(inner)))
        }
        "ObjectExpression" => Some(PerlType::HashRef(Box::new(PerlType::Any))),
        "FunctionExpression" | "ArrowFunctionExpression" => Some(PerlType::CodeRef),
        "NewExpression" => {
            let class = node.child("callee").and_then(|c| c.name())?;
            Some(match class {
                "Array" | "Uint8Array" | "Uint16Array" | "Uint32Array" | "Int32Array" => {
                    PerlType::ArrayRef(Box::new(PerlType::Int))
                }
                _ => PerlType::InstanceOf(class.to_string()),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transform(program: Value) -> Module {
        PerlTransformer::new(&GenerationOptions::default())
            .transform(&program)
            .unwrap()
    }

    fn ident(name: &str) -> Value {
        json!({"type": "Identifier", "name": name})
    }

    fn num(n: i64) -> Value {
        json!({"type": "Literal", "value": n, "raw": n.to_string()})
    }

    #[test]
    fn test_rejects_non_program_root() {
        let err = PerlTransformer::new(&GenerationOptions::default())
            .transform(&json!({"type": "Identifier", "name": "x"}))
            .unwrap_err();
        assert!(err.to_string().contains("'Identifier' node"));
    }

    #[test]
    fn test_array_literal_declares_list() {
        let module = transform(json!({"type": "Program", "body": [
            {"type": "VariableDeclaration", "kind": "const", "declarations": [
                {"type": "VariableDeclarator", "id": ident("xs"),
                 "init": {"type": "ArrayExpression", "elements": [num(1), num(2)]}}
            ]}
        ]}));
        let StmtKind::VarDecl { targets, init, .. } = &module.body[0].kind else {
            panic!("expected a declaration");
        };
        assert_eq!(targets[0].shape, Shape::List);
        assert_eq!(
            init.as_ref(),
            Some(&Expr::List(vec![Expr::number(1), Expr::number(2)]))
        );
    }

    #[test]
    fn test_redeclaration_becomes_assignment() {
        let decl = |n: i64| {
            json!({"type": "VariableDeclaration", "kind": "var", "declarations": [
                {"type": "VariableDeclarator", "id": ident("x"), "init": num(n)}
            ]})
        };
        let module = transform(json!({"type": "Program", "body": [decl(1), decl(2)]}));
        assert!(matches!(module.body[0].kind, StmtKind::VarDecl { .. }));
        assert_eq!(
            module.body[1].kind,
            StmtKind::Expr(Expr::assign(Expr::scalar("x"), Expr::number(2)))
        );
    }

    #[test]
    fn test_unsigned_shift_masks_before_shifting() {
        let shifted = unsigned_shift(Expr::scalar("x"), Expr::number(3));
        let Expr::Binary {
            op: BinaryOp::Shr,
            left,
            left_parens,
            ..
        } = shifted
        else {
            panic!("expected a shift");
        };
        assert!(left_parens);
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::BitAnd, .. }));
    }

    #[test]
    fn test_string_operand_selects_string_operators() {
        let module = transform(json!({"type": "Program", "body": [
            {"type": "ExpressionStatement", "expression": {
                "type": "BinaryExpression", "operator": "===",
                "left": ident("a"),
                "right": {"type": "Literal", "value": "x", "raw": "'x'"}
            }}
        ]}));
        let StmtKind::Expr(Expr::Binary { op, .. }) = &module.body[0].kind else {
            panic!("expected a comparison");
        };
        assert_eq!(*op, BinaryOp::StrEq);
    }

    #[test]
    fn test_unknown_statement_dropped_and_reported_in_strict_mode() {
        let options = GenerationOptions {
            strict_input: true,
            ..GenerationOptions::default()
        };
        let mut transformer = PerlTransformer::new(&options);
        let module = transformer
            .transform(&json!({"type": "Program", "body": [
                {"type": "WithStatement", "loc": {"start": {"line": 3, "column": 0}}}
            ]}))
            .unwrap();
        assert!(module.body.is_empty());
        assert_eq!(
            transformer.take_warnings(),
            vec!["unsupported node type 'WithStatement' at line 3".to_string()]
        );
    }

    #[test]
    fn test_framework_guard_keeps_live_branch() {
        let module = transform(json!({"type": "Program", "body": [
            {"type": "IfStatement",
             "test": {"type": "BinaryExpression", "operator": "!==",
                      "left": {"type": "UnaryExpression", "operator": "typeof", "prefix": true,
                               "argument": ident("module")},
                      "right": {"type": "Literal", "value": "undefined"}},
             "consequent": {"type": "BlockStatement", "body": [
                 {"type": "ExpressionStatement", "expression": num(1)}
             ]},
             "alternate": {"type": "BlockStatement", "body": [
                 {"type": "ExpressionStatement", "expression": num(2)}
             ]}}
        ]}));
        assert_eq!(module.body, vec![Stmt::expr(Expr::number(2))]);
    }

    #[test]
    fn test_continue_inside_switch_labels_loop() {
        let module = transform(json!({"type": "Program", "body": [
            {"type": "WhileStatement", "test": ident("go"), "body": {"type": "BlockStatement", "body": [
                {"type": "SwitchStatement", "discriminant": ident("k"), "cases": [
                    {"type": "SwitchCase", "test": num(1), "consequent": [{"type": "ContinueStatement"}]}
                ]}
            ]}}
        ]}));
        let StmtKind::While { label, body, .. } = &module.body[0].kind else {
            panic!("expected a loop");
        };
        let label = label.clone().expect("loop should be labeled");
        let StmtKind::Block { body: switch_body, .. } = &body[0].kind else {
            panic!("expected the switch block");
        };
        let StmtKind::If { then_branch, .. } = &switch_body[1].kind else {
            panic!("expected the case chain");
        };
        assert_eq!(
            then_branch[0].kind,
            StmtKind::LoopControl {
                kind: LoopControl::Next,
                label: Some(label)
            }
        );
    }

    #[test]
    fn test_infer_type_from_literals() {
        let v = num(3);
        assert_eq!(infer_type(JsNode::new(&v)), Some(PerlType::Int));
        let s = json!({"type": "Literal", "value": "a"});
        assert_eq!(infer_type(JsNode::new(&s)), Some(PerlType::Str));
    }

    fn expr_of(node: Value) -> Expr {
        let mut t = PerlTransformer::new(&GenerationOptions::default());
        t.expr(JsNode::new(&node).unwrap()).unwrap()
    }

    fn bitwise_node(operator: &str, left: Value, right: Value) -> Value {
        json!({"type": "BinaryExpression", "operator": operator, "left": left, "right": right})
    }

    #[test]
    fn test_bitwise_results_are_signed_32_bit() {
        for operator in ["|", "^", "&", "<<"] {
            let expr = expr_of(bitwise_node(operator, ident("a"), ident("b")));
            let Expr::Binary { op, right, .. } = expr else {
                panic!("expected a sign restoration for {operator}");
            };
            assert_eq!(op, BinaryOp::Sub, "{operator}");
            assert_eq!(*right, hex(0x8000_0000), "{operator}");
        }
        let not = json!({"type": "UnaryExpression", "operator": "~", "prefix": true,
                         "argument": num(0)});
        assert_eq!(expr_of(not), int32(unary(UnaryOp::BitNot, Expr::number(0))));
    }

    #[test]
    fn test_and_with_small_mask_stays_plain() {
        let expr = expr_of(bitwise_node("&", ident("a"), num(255)));
        assert_eq!(expr, binary(BinaryOp::BitAnd, expr_of(ident("a")), Expr::number(255)));
    }

    #[test]
    fn test_or_zero_truncates_to_int32() {
        let expr = expr_of(bitwise_node("|", ident("a"), num(0)));
        assert_eq!(expr, int32(expr_of(ident("a"))));
    }

    #[test]
    fn test_signed_shift_restores_sign_bit() {
        let expr = expr_of(bitwise_node(">>", ident("a"), num(1)));
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected a sign restoration");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert_eq!(*right, hex(0x4000_0000));
        assert_eq!(expr_of(bitwise_node(">>", ident("a"), num(0))), int32(expr_of(ident("a"))));
    }

    #[test]
    fn test_signed_shift_by_expression_binds_amount() {
        let amount = bitwise_node("+", ident("n"), num(1));
        let Expr::Do(body) = expr_of(bitwise_node(">>", ident("a"), amount)) else {
            panic!("expected the amount bound first");
        };
        assert!(matches!(body[0].kind, StmtKind::VarDecl { .. }));
    }

    #[test]
    fn test_compound_bitwise_assignment_wraps_result() {
        let assign = |operator: &str, right: Value| {
            json!({"type": "AssignmentExpression", "operator": operator,
                   "left": ident("h"), "right": right})
        };
        let Expr::Assign { op, value, .. } = expr_of(assign("|=", ident("b"))) else {
            panic!("expected an assignment");
        };
        assert_eq!(op, None);
        assert!(matches!(*value, Expr::Binary { op: BinaryOp::Sub, .. }));
        let Expr::Assign { op, .. } = expr_of(assign("&=", num(255))) else {
            panic!("expected an assignment");
        };
        assert_eq!(op, Some(BinaryOp::BitAnd));
    }

    #[test]
    fn test_caught_message_drops_die_newline() {
        let mut t = PerlTransformer::new(&GenerationOptions::default());
        t.scopes.push();
        t.scopes.declare("e", Shape::Scalar);
        t.catch_vars.push("e".to_string());
        let member = |property: &str| {
            json!({"type": "MemberExpression", "computed": false,
                   "object": ident("e"), "property": ident(property)})
        };
        let message = t.expr(JsNode::new(&member("message")).unwrap()).unwrap();
        let Expr::Substitute { target, global, .. } = message else {
            panic!("expected a non-destructive substitution");
        };
        assert_eq!(*target, Expr::scalar("e"));
        assert!(!global);
        let stack = t.expr(JsNode::new(&member("stack")).unwrap()).unwrap();
        assert_eq!(stack, Expr::scalar("e"));
    }
}
