//! Input tree to Ruby tree.
//!
//! Statements, declarations and expressions live here; library idioms
//! (`Math.*`, array, string and collection methods, `OpCodes.*`, IL
//! operation nodes) are in `builtins`.
//!
//! A `def` does not see the locals around it, so file-level variables that
//! functions or classes read become globals (`$name`), or constants for
//! capitalized `const`s. Functions nested in functions become lambdas.
//! Loop control that has to leave a block (an `each`, or a `switch` wrapped
//! in `loop`) goes through `catch`/`throw`. Only `nil` and `false` are false
//! in Ruby, so conditions are built with [`RubyTransformer::test`].

use super::ast::*;
use crate::input::{JsNode, program_root};
use crate::lower::{self, DropLog, ImportSet, NameGen, ScopeStack, Shape};
use crate::options::GenerationOptions;
use crate::output::number_text;
use crate::traits::TransformError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const KEYWORDS: &[&str] = &[
    "BEGIN", "END", "alias", "and", "begin", "break", "case", "class", "def", "defined?", "do",
    "else", "elsif", "end", "ensure", "false", "for", "if", "in", "module", "next", "nil", "not",
    "or", "redo", "rescue", "retry", "return", "self", "super", "then", "true", "undef", "unless",
    "until", "when", "while", "yield",
];

/// `Kernel` methods that a same-named top-level `def` or local would hide.
const KERNEL_METHODS: &[&str] = &[
    "puts", "print", "p", "format", "sprintf", "rand", "loop", "raise", "require", "lambda",
    "proc", "sleep", "exit", "catch", "throw", "gets", "open", "system", "select", "test",
    "method", "send", "hash", "class", "freeze", "display", "inspect", "to_s", "dup", "clone",
    "object_id", "then", "tap", "warn", "Integer", "Float", "String", "Array", "Hash",
];

/// `Object` methods a class must not redefine.
const OBJECT_METHODS: &[&str] = &[
    "class", "send", "method", "hash", "object_id", "initialize", "freeze", "dup", "clone",
    "then", "display", "instance_variables",
];

/// Methods every object literal answers, kept as real calls on hashes.
const OBJECT_PROTOTYPE: &[&str] = &["hasOwnProperty", "toString", "valueOf"];

/// Array methods that change the length of their receiver.
const RESIZING_METHODS: &[&str] = &["push", "pop", "shift", "unshift", "splice"];

/// The class whose body is being transformed.
#[derive(Debug, Default)]
pub(super) struct ClassCtx {
    pub name: String,
    pub getters: HashSet<String>,
    pub setters: HashSet<String>,
    pub methods: HashSet<String>,
    pub fields: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FrameKind {
    Loop,
    /// A desugared `switch`; `wrapped` when it runs inside `loop do ... end`
    /// so that `break` leaves it.
    Switch { wrapped: bool },
    /// A labeled statement that is not a loop.
    Labeled,
}

/// An enclosing construct that `break`/`continue` can target.
#[derive(Debug)]
pub(super) struct Frame {
    pub kind: FrameKind,
    /// Source label.
    pub label: Option<String>,
    /// `catch` tags allocated for jumps that cannot be native.
    pub break_tag: Option<String>,
    pub next_tag: Option<String>,
    /// Each iteration ends with work a native `next` would skip.
    pub step_loop: bool,
    /// An inlined `forEach` callback: `return` continues it.
    pub callback: bool,
}

impl Frame {
    pub fn new(kind: FrameKind, label: Option<String>) -> Self {
        Self {
            kind,
            label,
            break_tag: None,
            next_tag: None,
            step_loop: false,
            callback: false,
        }
    }

    pub fn callback() -> Self {
        Self {
            callback: true,
            ..Self::new(FrameKind::Loop, None)
        }
    }
}

/// Known `Map`/`Set` instances (hashes and sets in Ruby).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Collection {
    Map,
    Set,
}

/// What a function becomes.
pub(super) enum FnKind<'a> {
    /// A top-level `def`.
    Def,
    Lambda,
    Method,
    Static,
    Setter,
    Constructor {
        fields: Vec<(String, Option<JsNode<'a>>)>,
    },
}

/// Transforms an input program into a Ruby [`Module`].
pub struct RubyTransformer {
    pub(super) options: GenerationOptions,
    pub(super) scopes: ScopeStack,
    /// Top-level `def`s.
    pub(super) functions: HashSet<String>,
    pub(super) classes: HashSet<String>,
    /// Attribute names of every class in the program.
    pub(super) members: HashSet<String>,
    /// Method names of every top-level class.
    pub(super) class_methods: HashSet<String>,
    /// Where each file-level variable lives.
    pub(super) top_level: HashMap<String, VarKind>,
    pub(super) imports: ImportSet,
    pub(super) names: NameGen,
    pub(super) drops: DropLog,
    pub(super) catch_vars: Vec<String>,
    /// Per function: `var` names assigned `nil` up front.
    pub(super) hoisted: Vec<HashSet<String>>,
    pub(super) class_ctx: Option<ClassCtx>,
    pub(super) frames: Vec<Frame>,
    pub(super) fn_depth: usize,
    /// Inside a callback body inlined into a loop: `return` continues.
    pub(super) return_as_next: bool,
    /// Constructor field initializers waiting for `super`.
    pub(super) pending_fields: Option<Vec<Stmt>>,
    pub(super) in_constructor: bool,
    /// Inside a class-level body: `self` is the class.
    pub(super) static_context: bool,
    pub(super) current_method: Option<String>,
    /// Classes found inside functions or as values, defined at the top.
    pub(super) pending_classes: Vec<Stmt>,
    /// Variables (`name`, or `@name` for attributes) known to hold numbers
    /// or strings, for truthiness and `+`.
    pub(super) numeric_vars: HashSet<String>,
    pub(super) string_vars: HashSet<String>,
    pub(super) collections: HashMap<String, Collection>,
}

impl RubyTransformer {
    pub fn new(options: &GenerationOptions) -> Self {
        Self {
            options: options.clone(),
            scopes: ScopeStack::new(),
            functions: HashSet::new(),
            classes: HashSet::new(),
            members: HashSet::new(),
            class_methods: HashSet::new(),
            top_level: HashMap::new(),
            imports: ImportSet::default(),
            names: NameGen::default(),
            drops: DropLog::new(options.strict_input),
            catch_vars: Vec::new(),
            hoisted: Vec::new(),
            class_ctx: None,
            frames: Vec::new(),
            fn_depth: 0,
            return_as_next: false,
            pending_fields: None,
            in_constructor: false,
            static_context: false,
            current_method: None,
            pending_classes: Vec::new(),
            numeric_vars: HashSet::new(),
            string_vars: HashSet::new(),
            collections: HashMap::new(),
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
        for stmt in &stmts {
            if stmt.js_type() == "VariableDeclaration" && stmt.str_field("kind") == Some("const") {
                for decl in stmt.children("declarations") {
                    if let Some(name) = decl.child("id").and_then(|id| id.name())
                        && decl.child("init").is_some_and(is_function)
                    {
                        self.functions.insert(name.to_string());
                    }
                }
            }
        }
        self.classes = lower::declared_classes(&stmts)
            .into_iter()
            .map(String::from)
            .collect();
        self.members = lower::class_member_names(&stmts)
            .into_iter()
            .map(String::from)
            .collect();
        self.class_methods = class_method_names(&stmts);
        self.scan_top_level(&stmts);
        tracing::debug!(
            statements = stmts.len(),
            functions = self.functions.len(),
            classes = self.classes.len(),
            globals = self
                .top_level
                .values()
                .filter(|k| **k == VarKind::Global)
                .count(),
            "transforming program to Ruby"
        );

        self.hoisted.push(HashSet::new());
        let mut body = Vec::new();
        for (name, shape) in lower::nested_vars(&stmts) {
            if self.scopes.declare(name, shape) {
                body.push(Stmt::assign(self.var_ref(name), Expr::nil()));
            }
            if let Some(hoisted) = self.hoisted.last_mut() {
                hoisted.insert(name.to_string());
            }
        }
        body.extend(self.stmts(&stmts));
        Ok(self.module(body))
    }

    /// Warnings collected during the last transform (strict input mode).
    pub fn take_warnings(&mut self) -> Vec<String> {
        self.drops.take()
    }

    /// Libraries the last transformed program loads.
    pub fn dependencies(&self) -> Vec<String> {
        self.imports.modules()
    }

    /// Decide where each file-level variable lives.
    fn scan_top_level(&mut self, stmts: &[JsNode<'_>]) {
        let shared = lower::names_in_definitions(stmts);
        let mut declared: Vec<(&str, bool)> = Vec::new();
        for stmt in stmts {
            if stmt.js_type() != "VariableDeclaration" {
                continue;
            }
            let is_const = stmt.str_field("kind") == Some("const");
            for decl in stmt.children("declarations") {
                let Some(id) = decl.child("id") else { continue };
                match id.name() {
                    Some(name) => {
                        let init = decl.child("init").map(JsNode::unwrapped);
                        let defines = init.is_some_and(|i| {
                            i.js_type() == "ClassExpression" || (is_const && is_function(i))
                        });
                        if !defines {
                            declared.push((name, is_const));
                        }
                    }
                    None => {
                        for name in pattern_names(id) {
                            declared.push((name, false));
                        }
                    }
                }
            }
        }
        for (name, _) in lower::nested_vars(stmts) {
            declared.push((name, false));
        }
        for (name, is_const) in declared {
            let kind = if is_const && name.starts_with(|c: char| c.is_ascii_uppercase()) {
                VarKind::Constant
            } else if shared.contains(name) {
                VarKind::Global
            } else {
                VarKind::Local
            };
            self.top_level.entry(name.to_string()).or_insert(kind);
        }
    }

    fn module(&mut self, body: Vec<Stmt>) -> Module {
        // `def`s first so statements can call functions declared below them.
        let (mut ordered, rest): (Vec<Stmt>, Vec<Stmt>) = body
            .into_iter()
            .partition(|s| matches!(s.kind, StmtKind::Method(_)));
        ordered.append(&mut self.pending_classes);
        ordered.extend(rest);

        let mut magic_comments = Vec::new();
        if self.options.strict_pragmas {
            magic_comments.push("frozen_string_literal: true".to_string());
        }
        let requires = self
            .imports
            .modules()
            .into_iter()
            .map(|module| match module.as_str() {
                "OpCodes" => Require {
                    path: "op_codes".to_string(),
                    relative: true,
                },
                _ => Require {
                    path: module,
                    relative: false,
                },
            })
            .collect();
        Module {
            name: self.options.module_name.as_deref().map(ruby_constant),
            magic_comments,
            requires,
            body: ordered,
            meta: NodeMeta::default(),
        }
    }

    // ---------------------------------------------------------------------
    // Names
    // ---------------------------------------------------------------------

    /// A variable as seen from the current position.
    pub(super) fn var_ref(&self, name: &str) -> Expr {
        if self.scopes.lookup(name).is_some() && !self.scopes.resolves_outermost(name) {
            return Expr::local(&ruby_local(name));
        }
        match self.top_level.get(name) {
            Some(VarKind::Global) => Expr::Var {
                name: ruby_global(name),
                kind: VarKind::Global,
            },
            Some(VarKind::Constant) => Expr::constant(&ruby_constant(name)),
            _ => Expr::local(&ruby_local(name)),
        }
    }

    pub(super) fn is_variable(&self, name: &str) -> bool {
        self.scopes.lookup(name).is_some() || self.top_level.contains_key(name)
    }

    /// Method name at a call site: renamed when a class in the program
    /// defines it under a Ruby-safe name.
    pub(super) fn call_name(&self, method: &str) -> String {
        if self.class_methods.contains(method) {
            class_method_name(method)
        } else {
            method.replace('$', "_")
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
            "BlockStatement" => self.scoped_stmts(&node.children("body")),
            "EmptyStatement" | "DebuggerStatement" => Vec::new(),
            "ReturnStatement" => vec![self.return_stmt(node)],
            "IfStatement" => self.if_stmt(node),
            "ForStatement" => self.for_stmt(node, label),
            "ForOfStatement" => self.for_of(node, label),
            "ForInStatement" => self.for_in(node, label),
            "WhileStatement" | "DoWhileStatement" => self.while_stmt(node, label),
            "SwitchStatement" => self.switch_stmt(node, label),
            "BreakStatement" => {
                let target = node.child("label").and_then(|l| l.name());
                vec![self.break_stmt(target)]
            }
            "ContinueStatement" => {
                let target = node.child("label").and_then(|l| l.name());
                vec![self.continue_stmt(target)]
            }
            "LabeledStatement" => self.labeled_stmt(node),
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
                    let value = match init {
                        Some(init) => self.value(init),
                        None => Expr::Array(Vec::new()),
                    };
                    let targets = self.pattern_targets(id, true);
                    out.push(Stmt::expr(Expr::MultiAssign {
                        targets,
                        value: Box::new(value),
                    }));
                }
                "ObjectPattern" => {
                    let value = init.map(|i| self.value(i)).unwrap_or_else(Expr::nil);
                    let source = if value.is_var() {
                        value
                    } else {
                        let temp = self.names.fresh("obj");
                        out.push(Stmt::assign(Expr::local(&temp), value));
                        Expr::local(&temp)
                    };
                    out.extend(self.destructure_object(id, source));
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
                if self.fn_depth == 0 && self.scopes.depth() == 1 && self.functions.contains(name)
                {
                    let method = self.lower_function(&def_name(name), init, FnKind::Def);
                    return vec![Stmt::new(StmtKind::Method(Box::new(method)))];
                }
                // Declared before the body is built, so the lambda can recurse.
                self.declare(name, Shape::Scalar, is_var);
                let target = self.var_ref(name);
                let lambda = self.lambda(init);
                return vec![Stmt::assign(target, lambda)];
            }
        }
        let shape = Shape::of_initializer(init);
        let fresh = self.declare(name, shape, is_var);
        self.declare_value(name, init);
        let value = match init {
            Some(init) => self.value(init),
            None if fresh => Expr::nil(),
            None => return Vec::new(),
        };
        vec![Stmt::assign(self.var_ref(name), value)]
    }

    /// Record a declaration; `false` when it rebinds an existing name.
    pub(super) fn declare(&mut self, name: &str, shape: Shape, is_var: bool) -> bool {
        if is_var && self.hoisted.last().is_some_and(|h| h.contains(name)) {
            return false;
        }
        self.scopes.declare(name, shape)
    }

    /// Forget what was known about `key` and learn from its new initializer.
    pub(super) fn declare_value(&mut self, key: &str, init: Option<JsNode<'_>>) {
        self.numeric_vars.remove(key);
        self.string_vars.remove(key);
        self.collections.remove(key);
        self.note_value(key, init);
    }

    /// Learn what `key` holds from a value assigned to it.
    pub(super) fn note_value(&mut self, key: &str, init: Option<JsNode<'_>>) {
        let Some(init) = init.map(JsNode::unwrapped) else {
            return;
        };
        if init.js_type() == "NewExpression" {
            match init.child("callee").and_then(|c| c.name()) {
                Some("Map" | "WeakMap") => {
                    self.collections.insert(key.to_string(), Collection::Map);
                }
                Some("Set" | "WeakSet") => {
                    self.collections.insert(key.to_string(), Collection::Set);
                }
                _ => {}
            }
        }
        if self.is_stringy(init) {
            self.string_vars.insert(key.to_string());
        } else if self.is_numeric(init) {
            self.numeric_vars.insert(key.to_string());
        }
    }

    /// Targets of an array pattern. Declaring patterns introduce their names;
    /// assignment patterns write to existing places.
    fn pattern_targets(&mut self, pattern: JsNode<'_>, declaring: bool) -> Vec<Expr> {
        pattern
            .children_with_holes("elements")
            .into_iter()
            .map(|element| {
                let Some(element) = element else {
                    return Expr::local("_");
                };
                let (node, shape) = if element.js_type() == "RestElement" {
                    (element.child("argument"), Shape::List)
                } else {
                    (Some(element), Shape::Scalar)
                };
                let target = match node.and_then(|n| n.name()) {
                    Some(name) => {
                        if declaring {
                            self.scopes.declare(name, shape);
                            self.declare_value(name, None);
                        }
                        self.var_ref(name)
                    }
                    None if !declaring => match node.and_then(|n| self.target(n)) {
                        Some(target) => target,
                        None => Expr::local("_"),
                    },
                    None => {
                        if let Some(node) = node {
                            self.drops.unsupported(node);
                        }
                        Expr::local("_")
                    }
                };
                if shape == Shape::List {
                    Expr::Splat(Box::new(target))
                } else {
                    target
                }
            })
            .collect()
    }

    /// `a = src['a']` for each property of an object pattern.
    fn destructure_object(&mut self, pattern: JsNode<'_>, source: Expr) -> Vec<Stmt> {
        let mut out = Vec::new();
        for prop in pattern.children("properties") {
            if prop.js_type() == "RestElement" {
                self.drops
                    .lossy("object rest pattern is not supported".to_string());
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
            let mut value = if self.members.contains(key) {
                Expr::method(source.clone(), key, Vec::new())
            } else {
                Expr::index(source.clone(), Expr::string(key))
            };
            if let Some(default) = default {
                let fallback = self.value(default);
                value = ternary(
                    Expr::method(value.clone(), "nil?", Vec::new()),
                    fallback,
                    value,
                );
            }
            self.scopes.declare(binding, Shape::Scalar);
            self.declare_value(binding, default);
            out.push(Stmt::assign(self.var_ref(binding), value));
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
            let method = self.lower_function(&def_name(name), node, FnKind::Def);
            return vec![Stmt::new(StmtKind::Method(Box::new(method)))];
        }
        if self.hoisted.last().is_some_and(|h| h.contains(name)) {
            // Assigned at the top of the enclosing function.
            return Vec::new();
        }
        self.scopes.declare(name, Shape::Scalar);
        let target = self.var_ref(name);
        let lambda = self.lambda(node);
        vec![Stmt::assign(target, lambda)]
    }

    fn return_stmt(&mut self, node: JsNode<'_>) -> Stmt {
        if self.return_as_next {
            let value = node.child("argument").map(|arg| self.value(arg));
            return self.callback_return(value);
        }
        if self.in_constructor {
            return Stmt::ret(None);
        }
        let value = node.child("argument").map(|arg| self.value(arg));
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
        let cond = self.test(test);
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
        if let Some(stmts) = self.counting_loop(node, label.clone()) {
            return stmts;
        }
        self.scopes.push();
        let mut out = match node.child("init") {
            Some(init) if init.js_type() == "VariableDeclaration" => self.var_decl(init),
            Some(init) => self.expr_stmt(init),
            None => Vec::new(),
        };
        let cond = node
            .child("test")
            .map(|t| self.test(t))
            .unwrap_or(Expr::Literal(Literal::Bool(true)));
        let update = node.child("update");
        let mut frame = Frame::new(FrameKind::Loop, label);
        frame.step_loop = update.is_some();
        self.frames.push(frame);
        let body = self.branch(node.child("body"));
        let (mut body, break_tag) = self.close_loop(body);
        if let Some(update) = update {
            body.extend(self.expr_stmt(update));
        }
        self.scopes.pop();
        let while_stmt = Stmt::new(StmtKind::While {
            cond,
            body,
            post_test: false,
        });
        out.extend(self.wrap_break(break_tag, vec![while_stmt]));
        out
    }

    /// `for (let i = a; i < b; i++)` over a bound the body cannot change, as
    /// a range or `step`/`downto` iteration.
    fn counting_loop(&mut self, node: JsNode<'_>, label: Option<String>) -> Option<Vec<Stmt>> {
        let init = node.child("init")?;
        if init.js_type() != "VariableDeclaration" || init.str_field("kind") != Some("let") {
            return None;
        }
        let decls = init.children("declarations");
        let [decl] = decls.as_slice() else {
            return None;
        };
        let var = decl.child("id")?.name()?;
        let start = decl.child("init")?;
        let test = node.child("test")?.unwrapped();
        if test.js_type() != "BinaryExpression"
            || !test.child("left")?.unwrapped().is_identifier(var)
        {
            return None;
        }
        let (ascending, inclusive) = match test.str_field("operator")? {
            "<" => (true, false),
            "<=" => (true, true),
            ">" => (false, false),
            ">=" => (false, true),
            _ => return None,
        };
        let bound = test.child("right")?.unwrapped();
        let step = loop_step(node.child("update")?.unwrapped(), var)?;
        let body = node.child("body")?;
        if ascending != (step > 0)
            || lower::assigns_to(&[body], var)
            || !stable_bound(bound, var, body)
        {
            return None;
        }

        let start = self.value(start);
        let end = self.value(bound);
        let (receiver, method, args) = match (step, ascending) {
            (1, _) => (Expr::range(start, Some(end), !inclusive), "each", Vec::new()),
            (k, true) => (
                Expr::range(start, Some(end), !inclusive),
                "step",
                vec![Expr::number(k)],
            ),
            (-1, false) => {
                let end = if inclusive { end } else { plus_one(end) };
                (start, "downto", vec![end])
            }
            (k, false) => {
                let end = if inclusive { end } else { plus_one(end) };
                (start, "step", vec![end, Expr::number(k)])
            }
        };

        self.scopes.push();
        self.scopes.declare(var, Shape::Scalar);
        self.declare_value(var, None);
        self.numeric_vars.insert(var.to_string());
        self.frames.push(Frame::new(FrameKind::Loop, label));
        let body = self.branch(Some(body));
        let (body, break_tag) = self.close_loop(body);
        self.scopes.pop();
        let param = ruby_local(var);
        let each = Expr::with_block(receiver, method, args, Block::new(&[param.as_str()], body));
        Some(self.wrap_break(break_tag, vec![Stmt::expr(each)]))
    }

    fn while_stmt(&mut self, node: JsNode<'_>, label: Option<String>) -> Vec<Stmt> {
        let post_test = node.js_type() == "DoWhileStatement";
        let cond = node
            .child("test")
            .map(|t| self.test(t))
            .unwrap_or(Expr::Literal(Literal::Bool(true)));
        let mut frame = Frame::new(FrameKind::Loop, label);
        frame.step_loop = post_test;
        self.frames.push(frame);
        let body = self.branch(node.child("body"));
        let (body, break_tag) = self.close_loop(body);
        let while_stmt = Stmt::new(StmtKind::While {
            cond,
            body,
            post_test,
        });
        self.wrap_break(break_tag, vec![while_stmt])
    }

    fn for_of(&mut self, node: JsNode<'_>, label: Option<String>) -> Vec<Stmt> {
        let Some(right) = node.child("right").map(JsNode::unwrapped) else {
            return Vec::new();
        };
        let method = if self.is_stringy(right) {
            "each_char"
        } else {
            "each"
        };
        let iterable = self.value(right);
        self.block_loop(node, label, iterable, method)
    }

    fn for_in(&mut self, node: JsNode<'_>, label: Option<String>) -> Vec<Stmt> {
        let Some(right) = node.child("right").map(JsNode::unwrapped) else {
            return Vec::new();
        };
        let (receiver, method) = if self.is_list_var(right) {
            (self.value(right), "each_index")
        } else if self.is_stringy(right) {
            let string = self.value(right);
            (Expr::method(string, "length", Vec::new()), "times")
        } else {
            (self.value(right), "each_key")
        };
        self.block_loop(node, label, receiver, method)
    }

    /// `receiver.method do |binding| BODY end` for a for-of/for-in head.
    fn block_loop(
        &mut self,
        node: JsNode<'_>,
        label: Option<String>,
        receiver: Expr,
        method: &str,
    ) -> Vec<Stmt> {
        self.scopes.push();
        let (params, prelude) = self.loop_binding(node.child("left"));
        self.frames.push(Frame::new(FrameKind::Loop, label));
        let mut body = prelude;
        body.extend(self.branch(node.child("body")));
        let (body, break_tag) = self.close_loop(body);
        self.scopes.pop();
        let params: Vec<&str> = params.iter().map(String::as_str).collect();
        let each = Expr::with_block(receiver, method, Vec::new(), Block::new(&params, body));
        self.wrap_break(break_tag, vec![Stmt::expr(each)])
    }

    /// Block parameters of a for-of/for-in head, plus unpacking statements
    /// for an object pattern.
    fn loop_binding(&mut self, left: Option<JsNode<'_>>) -> (Vec<String>, Vec<Stmt>) {
        let target = match left {
            Some(l) if l.js_type() == "VariableDeclaration" => l
                .children("declarations")
                .first()
                .and_then(|d| d.child("id")),
            other => other,
        };
        if let Some(name) = target.and_then(|t| t.name()) {
            self.scopes.declare(name, Shape::Scalar);
            self.declare_value(name, None);
            return (vec![ruby_local(name)], Vec::new());
        }
        match target {
            Some(t) if t.js_type() == "ArrayPattern" => {
                let params = t
                    .children_with_holes("elements")
                    .into_iter()
                    .map(|element| match element.and_then(|e| e.name()) {
                        Some(name) => {
                            self.scopes.declare(name, Shape::Scalar);
                            self.declare_value(name, None);
                            ruby_local(name)
                        }
                        None => "_".to_string(),
                    })
                    .collect();
                (params, Vec::new())
            }
            Some(t) if t.js_type() == "ObjectPattern" => {
                let item = self.names.fresh("item");
                let unpack = self.destructure_object(t, Expr::local(&item));
                (vec![item], unpack)
            }
            _ => (vec![self.names.fresh("item")], Vec::new()),
        }
    }

    fn switch_stmt(&mut self, node: JsNode<'_>, label: Option<String>) -> Vec<Stmt> {
        let discriminant = node
            .child("discriminant")
            .map(|d| self.value(d))
            .unwrap_or_else(Expr::nil);
        let var = self.names.fresh("switch");
        let cases = node.children("cases");
        let arms = lower::switch_arms(&cases);
        let wrapped = lower::has_own_break(&arms);

        self.frames
            .push(Frame::new(FrameKind::Switch { wrapped }, label));
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
                let matches = binary(BinaryOp::Eq, Expr::local(&var), self.value(*test));
                cond = Some(match cond {
                    Some(prev) => binary(BinaryOp::Or, prev, matches),
                    None => matches,
                });
            }
            if let Some(cond) = cond {
                chain.push((cond, body));
            }
        }
        let break_tag = self.frames.pop().and_then(|f| f.break_tag);

        let mut body = Vec::new();
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
        if wrapped {
            body.push(Stmt::control(LoopControl::Break));
            body = vec![Stmt::expr(Expr::Call {
                receiver: None,
                name: "loop".to_string(),
                args: Vec::new(),
                block: Some(Box::new(Block::new(&[], body))),
            })];
        }
        let mut out = vec![Stmt::assign(Expr::local(&var), discriminant)];
        out.extend(body);
        self.wrap_break(break_tag, out)
    }

    fn labeled_stmt(&mut self, node: JsNode<'_>) -> Vec<Stmt> {
        let label = node.child("label").and_then(|l| l.name()).map(String::from);
        let Some(body) = node.child("body") else {
            return Vec::new();
        };
        match body.js_type() {
            "ForStatement" | "ForOfStatement" | "ForInStatement" | "WhileStatement"
            | "DoWhileStatement" | "SwitchStatement" => self.stmt_inner(body, label),
            _ => {
                self.frames.push(Frame::new(FrameKind::Labeled, label));
                let out = match body.js_type() {
                    "BlockStatement" => self.scoped_stmts(&body.children("body")),
                    _ => self.stmt(body),
                };
                let break_tag = self.frames.pop().and_then(|f| f.break_tag);
                self.wrap_break(break_tag, out)
            }
        }
    }

    fn break_stmt(&mut self, label: Option<&str>) -> Stmt {
        let target = match label {
            Some(label) => self
                .frames
                .iter()
                .rposition(|f| f.label.as_deref() == Some(label)),
            None => self
                .frames
                .iter()
                .rposition(|f| !f.callback && f.kind != FrameKind::Labeled),
        };
        let Some(i) = target else {
            return Stmt::control(LoopControl::Break);
        };
        let native = matches!(
            self.frames[i].kind,
            FrameKind::Loop | FrameKind::Switch { wrapped: true }
        ) && !self.crosses_block(i);
        if native {
            Stmt::control(LoopControl::Break)
        } else {
            let tag = self.jump_tag(i, false);
            Stmt::new(StmtKind::Throw { tag })
        }
    }

    fn continue_stmt(&mut self, label: Option<&str>) -> Stmt {
        let target = match label {
            Some(label) => self
                .frames
                .iter()
                .rposition(|f| f.label.as_deref() == Some(label)),
            None => self
                .frames
                .iter()
                .rposition(|f| f.kind == FrameKind::Loop),
        };
        match target {
            Some(i) => self.next_to(i),
            None => Stmt::control(LoopControl::Next),
        }
    }

    /// `next` for frame `i`, or a `throw` when a native `next` would land
    /// somewhere else or skip the loop's update.
    fn next_to(&mut self, i: usize) -> Stmt {
        if self.frames[i].step_loop || self.crosses_block(i) {
            let tag = self.jump_tag(i, true);
            Stmt::new(StmtKind::Throw { tag })
        } else {
            Stmt::control(LoopControl::Next)
        }
    }

    /// `return` inside an inlined callback: `next value` hands the value to
    /// the iterating method.
    pub(super) fn callback_return(&mut self, value: Option<Expr>) -> Stmt {
        if let Some(i) = self.frames.iter().rposition(|f| f.callback)
            && self.crosses_block(i)
        {
            if value.is_some() {
                self.drops
                    .lossy("callback result returned from a nested loop is dropped".to_string());
            }
            let tag = self.jump_tag(i, true);
            return Stmt::new(StmtKind::Throw { tag });
        }
        Stmt::new(StmtKind::LoopControl {
            kind: LoopControl::Next,
            value,
        })
    }

    /// Whether a frame nested inside frame `i` would catch a native jump.
    fn crosses_block(&self, i: usize) -> bool {
        self.frames[i + 1..]
            .iter()
            .any(|f| f.kind != FrameKind::Switch { wrapped: false })
    }

    fn jump_tag(&mut self, i: usize, next: bool) -> String {
        let existing = if next {
            &self.frames[i].next_tag
        } else {
            &self.frames[i].break_tag
        };
        if let Some(tag) = existing {
            return tag.clone();
        }
        let kind = if next { "next" } else { "break" };
        let stem = match &self.frames[i].label {
            Some(label) => format!("{}_{kind}", tag_name(label)),
            None => kind.to_string(),
        };
        let tag = self.names.fresh(&stem);
        let frame = &mut self.frames[i];
        if next {
            frame.next_tag = Some(tag.clone());
        } else {
            frame.break_tag = Some(tag.clone());
        }
        tag
    }

    /// Pop a loop frame. A body that throws to its `next` tag is wrapped in
    /// `catch`; plain `break`s inside that wrapper then have to throw too.
    pub(super) fn close_loop(&mut self, body: Vec<Stmt>) -> (Vec<Stmt>, Option<String>) {
        let Some(mut frame) = self.frames.pop() else {
            return (body, None);
        };
        let mut body = body;
        if let Some(next) = frame.next_tag.take() {
            if has_plain_break(&body) {
                let tag = match &frame.break_tag {
                    Some(tag) => tag.clone(),
                    None => self.names.fresh("break"),
                };
                retarget_breaks(&mut body, &tag);
                frame.break_tag = Some(tag);
            }
            body = vec![Stmt::new(StmtKind::Catch { tag: next, body })];
        }
        (body, frame.break_tag)
    }

    pub(super) fn wrap_break(&self, tag: Option<String>, stmts: Vec<Stmt>) -> Vec<Stmt> {
        match tag {
            Some(tag) => vec![Stmt::new(StmtKind::Catch { tag, body: stmts })],
            None => stmts,
        }
    }

    fn throw_stmt(&mut self, node: JsNode<'_>) -> Stmt {
        let Some(arg) = node.child("argument").map(JsNode::unwrapped) else {
            return Stmt::new(StmtKind::Raise {
                class: None,
                message: None,
            });
        };
        let error = match arg.kind() {
            "ErrorCreation" => Some((
                arg.str_field("errorType").unwrap_or("Error"),
                arg.child("message"),
            )),
            "NewExpression" => arg
                .child("callee")
                .and_then(|c| c.name())
                .filter(|name| is_error_class(name) && !self.classes.contains(*name))
                .map(|name| (name, arg.children("arguments").first().copied())),
            _ => None,
        };
        match error {
            Some((name, message)) => {
                let message = message.map(|m| self.value(m));
                let class = match (name, &message) {
                    ("Error", Some(_)) => None,
                    _ => Some(error_class(name).to_string()),
                };
                Stmt::new(StmtKind::Raise { class, message })
            }
            None => {
                let value = self.value(arg);
                Stmt::new(StmtKind::Raise {
                    class: None,
                    message: Some(value),
                })
            }
        }
    }

    fn try_stmt(&mut self, node: JsNode<'_>) -> Stmt {
        let body = self.branch(node.child("block"));
        let rescue = node.child("handler").map(|handler| {
            let param = handler.child("param").and_then(|p| p.name());
            self.scopes.push();
            let var = param.map(|name| {
                self.scopes.declare(name, Shape::Scalar);
                self.catch_vars.push(name.to_string());
                ruby_local(name)
            });
            let body = match handler.child("body") {
                Some(b) => self.stmts(&b.children("body")),
                None => Vec::new(),
            };
            if param.is_some() {
                self.catch_vars.pop();
            }
            self.scopes.pop();
            RescueClause { var, body }
        });
        let ensure = node.child("finalizer").map(|f| self.branch(Some(f)));
        Stmt::new(StmtKind::Begin {
            body,
            rescue,
            ensure,
        })
    }

    /// Expression in statement position. Some library calls have a cheaper
    /// statement form, and `a && f()` reads better as an `if`.
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
            "UpdateExpression" => {
                if let Some(target) = expr.child("argument").and_then(|a| self.target(a)) {
                    let op = if expr.str_field("operator") == Some("--") {
                        BinaryOp::Sub
                    } else {
                        BinaryOp::Add
                    };
                    return vec![Stmt::expr(Expr::compound(target, op, Expr::number(1)))];
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
            "LogicalExpression" => {
                let operator = expr.str_field("operator");
                if let (Some(op @ ("&&" | "||")), Some(left), Some(right)) =
                    (operator, expr.child("left"), expr.child("right"))
                {
                    let cond = self.test(left);
                    let cond = if op == "&&" { cond } else { not(cond) };
                    let then_branch = self.expr_stmt(right);
                    return vec![Stmt::new(StmtKind::If {
                        cond,
                        then_branch,
                        elsifs: Vec::new(),
                        else_branch: None,
                    })];
                }
            }
            _ => {}
        }
        match self.expr(expr) {
            Some(e) => vec![Stmt::expr(e)],
            None => Vec::new(),
        }
    }

    /// `super(...)` in a constructor, followed by the field initializers.
    pub(super) fn super_constructor(&mut self, args: Vec<Expr>) -> Vec<Stmt> {
        let mut out = vec![Stmt::expr(Expr::Super(args))];
        if let Some(fields) = self.pending_fields.take() {
            out.extend(fields);
        }
        out
    }

    /// `arr.length = n`: `clear` for zero, else drop everything from `n` on.
    fn length_assignment(&mut self, expr: JsNode<'_>) -> Option<Stmt> {
        if expr.str_field("operator") != Some("=") {
            return None;
        }
        let left = expr.child("left")?.unwrapped();
        if left.static_member_name() != Some("length") {
            return None;
        }
        let object = left.child("object")?;
        if self.is_stringy(object) {
            return None;
        }
        let right = expr.child("right")?.unwrapped();
        let target = self.value(object);
        if right.number_field("value") == Some(0.0) {
            return Some(Stmt::expr(Expr::method(target, "clear", Vec::new())));
        }
        self.drops
            .lossy("assigning a larger array length does not extend the array".to_string());
        let length = self.value(right);
        Some(Stmt::expr(Expr::method(
            target,
            "slice!",
            vec![Expr::range(length, None, false)],
        )))
    }

    // ---------------------------------------------------------------------
    // Functions and classes
    // ---------------------------------------------------------------------

    /// Build a method from a function node (declaration, expression, arrow
    /// or class member value).
    pub(super) fn lower_function(
        &mut self,
        name: &str,
        func: JsNode<'_>,
        kind: FnKind<'_>,
    ) -> Method {
        let saved_frames = std::mem::take(&mut self.frames);
        let saved_return_as_next = std::mem::replace(&mut self.return_as_next, false);
        let saved_pending = self.pending_fields.take();
        let saved_in_constructor = self.in_constructor;
        let saved_static = self.static_context;
        let saved_method = self.current_method.clone();
        let saved_numeric = self.numeric_vars.clone();
        let saved_strings = self.string_vars.clone();
        match kind {
            FnKind::Def => {
                self.static_context = false;
                self.current_method = None;
            }
            FnKind::Static => {
                self.static_context = true;
                self.current_method = Some(name.to_string());
            }
            FnKind::Method | FnKind::Setter | FnKind::Constructor { .. } => {
                self.static_context = false;
                self.current_method = Some(name.to_string());
            }
            FnKind::Lambda => {}
        }
        let is_constructor = matches!(kind, FnKind::Constructor { .. });
        self.in_constructor = is_constructor;
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
        if let FnKind::Constructor { fields } = &kind {
            let mut field_stmts = Vec::new();
            for (field, init) in fields {
                let Some(init) = init else { continue };
                self.note_value(&format!("@{field}"), Some(*init));
                let value = self.value(*init);
                field_stmts.push(Stmt::assign(Expr::ivar(&ivar_name(field)), value));
            }
            self.pending_fields = Some(field_stmts);
            let main = self.stmts(&statements);
            if let Some(fields) = self.pending_fields.take() {
                body.extend(fields);
            }
            body.extend(main);
        } else {
            match body_node {
                Some(b) if b.js_type() == "BlockStatement" => body.extend(self.stmts(&statements)),
                Some(expr) => {
                    let value = self.value(expr);
                    body.push(Stmt::expr(value));
                }
                None => {}
            }
        }
        let mut all = prelude;
        all.extend(body);
        if !is_constructor {
            implicit_return(&mut all);
        }

        self.hoisted.pop();
        self.scopes.pop();
        self.fn_depth -= 1;
        self.frames = saved_frames;
        self.return_as_next = saved_return_as_next;
        self.pending_fields = saved_pending;
        self.in_constructor = saved_in_constructor;
        self.static_context = saved_static;
        self.current_method = saved_method;
        self.numeric_vars = saved_numeric;
        self.string_vars = saved_strings;

        let mut method = Method::new(name, params, all);
        method.is_static = matches!(kind, FnKind::Static);
        method.endless = self.options.modern_syntax
            && matches!(kind, FnKind::Def | FnKind::Method | FnKind::Static)
            && endless_body(&method.body);
        if self.options.type_annotations && !matches!(kind, FnKind::Lambda) {
            method.return_type = return_type(func);
        }
        method.meta = meta_of(func);
        method
    }

    /// A function value: `lambda do |params| ... end`.
    pub(super) fn lambda(&mut self, func: JsNode<'_>) -> Expr {
        let method = self.lower_function("", func, FnKind::Lambda);
        Expr::Lambda(Box::new(Block {
            params: method.params,
            locals: Vec::new(),
            body: method.body,
        }))
    }

    fn params(&mut self, nodes: &[JsNode<'_>], prelude: &mut Vec<Stmt>) -> Vec<Param> {
        let annotate = self.options.type_annotations;
        let mut params = Vec::new();
        for node in nodes {
            let mut param = match node.js_type() {
                "Identifier" => {
                    let name = node.name().unwrap_or_default();
                    self.scopes.declare(name, Shape::Scalar);
                    self.declare_value(name, None);
                    if node.result_type().is_some() {
                        self.note_value(name, Some(*node));
                    }
                    Param::new(&ruby_local(name))
                }
                "AssignmentPattern" => {
                    let Some(left) = node.child("left") else { continue };
                    let default = node.child("right");
                    let mut param = match left.name() {
                        Some(name) => {
                            self.scopes.declare(name, Shape::Scalar);
                            self.declare_value(name, default);
                            Param::new(&ruby_local(name))
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
                    self.declare_value(name, None);
                    let mut param = Param::new(&ruby_local(name));
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
                param.ty = node.result_type().and_then(RubyType::from_result_type);
            }
            params.push(param);
        }
        params
    }

    /// A destructured parameter: bound to a fresh name, unpacked on entry.
    fn pattern_param(&mut self, pattern: JsNode<'_>, prelude: &mut Vec<Stmt>) -> Param {
        let name = self.names.fresh("args");
        self.scopes.declare(&name, Shape::Scalar);
        if pattern.js_type() == "ObjectPattern" {
            prelude.extend(self.destructure_object(pattern, Expr::local(&name)));
        } else {
            let targets = self.pattern_targets(pattern, true);
            prelude.push(Stmt::expr(Expr::MultiAssign {
                targets,
                value: Box::new(Expr::local(&name)),
            }));
        }
        Param::new(&name)
    }

    /// What JavaScript hoists to the top of a function body: nested function
    /// declarations (as lambdas) and `var`s declared inside blocks.
    fn hoist(&mut self, body: &[JsNode<'_>]) -> Vec<Stmt> {
        let mut out = Vec::new();
        let functions: Vec<JsNode<'_>> = body
            .iter()
            .filter(|s| s.js_type() == "FunctionDeclaration")
            .copied()
            .collect();
        // Lambdas that call each other need every name bound first.
        if functions.len() > 1 {
            for func in &functions {
                if let Some(name) = func.child("id").and_then(|id| id.name())
                    && self.scopes.declare(name, Shape::Scalar)
                {
                    out.push(Stmt::assign(self.var_ref(name), Expr::nil()));
                }
            }
        }
        for (name, shape) in lower::nested_vars(body) {
            if self.scopes.declare(name, shape) {
                out.push(Stmt::assign(self.var_ref(name), Expr::nil()));
            }
            if let Some(hoisted) = self.hoisted.last_mut() {
                hoisted.insert(name.to_string());
            }
        }
        for func in functions {
            let Some(name) = func.child("id").and_then(|id| id.name()) else {
                continue;
            };
            self.scopes.declare(name, Shape::Scalar);
            let target = self.var_ref(name);
            let lambda = self.lambda(func);
            out.push(Stmt::assign(target, lambda).with_meta(meta_of(func)));
            if let Some(hoisted) = self.hoisted.last_mut() {
                hoisted.insert(name.to_string());
            }
        }
        out
    }

    /// A class declaration or expression. Classes met inside functions are
    /// moved to the top level.
    fn class_decl(&mut self, node: JsNode<'_>, name: Option<&str>) -> Option<Stmt> {
        let js_name = name.or_else(|| node.child("id").and_then(|id| id.name()))?;
        self.classes.insert(js_name.to_string());
        let base = node
            .child("superClass")
            .map(JsNode::unwrapped)
            .and_then(|b| self.base_class(b));
        let members = node
            .child("body")
            .map(|b| b.children("body"))
            .unwrap_or_default();
        let assigned = lower::this_assignments(node);

        let mut ctx = ClassCtx {
            name: ruby_constant(js_name),
            ..ClassCtx::default()
        };
        for member in &members {
            let Some(key) = member_key(*member) else { continue };
            let key = key.to_string();
            match (member.js_type(), member.str_field("kind")) {
                ("MethodDefinition", Some("get")) => ctx.getters.insert(key),
                ("MethodDefinition", Some("set")) => ctx.setters.insert(key),
                ("MethodDefinition", Some("constructor")) => false,
                ("MethodDefinition", _) => ctx.methods.insert(key),
                ("PropertyDefinition", _) => ctx.fields.insert(key),
                _ => false,
            };
        }
        ctx.fields.extend(assigned.iter().map(|s| s.to_string()));
        let saved_ctx = self.class_ctx.replace(ctx);
        let saved_static = self.static_context;
        let annotate = self.options.type_annotations;

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
                    fields.push(Field {
                        name: ivar_name(key),
                        ty: if annotate { infer_type(value) } else { None },
                        is_static,
                    });
                    if is_static {
                        self.static_context = true;
                        self.note_value(&format!("@{key}"), value);
                        let value = value.map(|v| self.value(v)).unwrap_or_else(Expr::nil);
                        self.static_context = saved_static;
                        static_init.push(
                            Stmt::assign(Expr::ivar(&ivar_name(key)), value)
                                .with_meta(meta_of(*member)),
                        );
                    } else {
                        instance_fields.push((key.to_string(), value));
                    }
                }
                "StaticBlock" => {
                    self.static_context = true;
                    static_init.extend(self.scoped_stmts(&member.children("body")));
                    self.static_context = saved_static;
                }
                "MethodDefinition" => {
                    let Some(value) = member.child("value") else { continue };
                    let Some(key) = member_key(*member) else { continue };
                    let is_static = member.bool_field("static");
                    let (method_name, kind) = match member.str_field("kind") {
                        Some("constructor") => {
                            constructor = Some(value);
                            continue;
                        }
                        Some("set") => (format!("{}=", ivar_name(key)), FnKind::Setter),
                        Some("get") => (ivar_name(key), FnKind::Method),
                        _ => (class_method_name(key), FnKind::Method),
                    };
                    let kind = if is_static { FnKind::Static } else { kind };
                    let mut method = self.lower_function(&method_name, value, kind);
                    method.meta.comments = meta_of(*member).comments;
                    methods.push(method);
                }
                _ => self.drops.unsupported(*member),
            }
        }

        // Attributes only ever assigned through `this`.
        if let Some(ctx) = &self.class_ctx {
            for name in &assigned {
                let field = ivar_name(name);
                if fields.iter().any(|f: &Field| f.name == field)
                    || ctx.getters.contains(*name)
                    || ctx.setters.contains(*name)
                    || ctx.methods.contains(*name)
                {
                    continue;
                }
                fields.push(Field {
                    name: field,
                    ty: None,
                    is_static: false,
                });
            }
        }

        let has_base = base.is_some();
        let initialize = match constructor {
            Some(ctor) => Some(self.lower_function(
                "initialize",
                ctor,
                FnKind::Constructor {
                    fields: instance_fields,
                },
            )),
            None if instance_fields.iter().any(|(_, v)| v.is_some()) => {
                Some(self.default_constructor(has_base, instance_fields))
            }
            None => None,
        };
        if let Some(initialize) = initialize {
            methods.insert(0, initialize);
        }
        self.class_ctx = saved_ctx;
        self.static_context = saved_static;

        let class = Class {
            name: ruby_constant(js_name),
            base,
            fields,
            methods,
            static_init,
            meta: meta_of(node),
        };
        let stmt = Stmt::new(StmtKind::Class(Box::new(class)));
        if self.fn_depth > 0 {
            self.drops.lossy(format!(
                "class {js_name} declared inside a function is defined at the top level"
            ));
            self.pending_classes.push(stmt);
            return None;
        }
        Some(stmt)
    }

    /// Superclass name. JavaScript's error classes map onto Ruby's.
    fn base_class(&self, node: JsNode<'_>) -> Option<String> {
        if let Some(name) = node.name()
            && is_error_class(name)
            && !self.classes.contains(name)
        {
            return Some(match name {
                "Error" => "StandardError".to_string(),
                other => error_class(other).to_string(),
            });
        }
        qualified_name(node)
    }

    /// `initialize` for a class with field initializers but no constructor.
    fn default_constructor(
        &mut self,
        has_base: bool,
        fields: Vec<(String, Option<JsNode<'_>>)>,
    ) -> Method {
        let saved_static = std::mem::replace(&mut self.static_context, false);
        self.scopes.push();
        let mut params = Vec::new();
        let mut body = Vec::new();
        if has_base {
            let mut rest = Param::new("args");
            rest.variadic = true;
            params.push(rest);
            body.push(Stmt::expr(Expr::Super(vec![Expr::Splat(Box::new(
                Expr::local("args"),
            ))])));
        }
        for (field, init) in fields {
            let Some(init) = init else { continue };
            self.note_value(&format!("@{field}"), Some(init));
            let value = self.value(init);
            body.push(Stmt::assign(Expr::ivar(&ivar_name(&field)), value));
        }
        self.scopes.pop();
        self.static_context = saved_static;
        Method::new("initialize", params, body)
    }

    /// `this.name` as a value.
    pub(super) fn this_property(&mut self, name: &str) -> Expr {
        if let Some(ctx) = &self.class_ctx {
            if ctx.getters.contains(name) {
                return Expr::method(Expr::SelfRef, &ivar_name(name), Vec::new());
            }
            if ctx.methods.contains(name) && !ctx.fields.contains(name) {
                return Expr::call("method", vec![Expr::symbol(&class_method_name(name))]);
            }
        }
        Expr::ivar(&ivar_name(name))
    }

    /// `this.name(args)`: a method call, or a call of a function stored in
    /// an attribute.
    pub(super) fn this_call(&mut self, name: &str, args: Vec<Expr>) -> Expr {
        let stored = self
            .class_ctx
            .as_ref()
            .is_some_and(|c| c.fields.contains(name) && !c.methods.contains(name));
        if stored {
            return Expr::method(Expr::ivar(&ivar_name(name)), "call", args);
        }
        Expr::call(&class_method_name(name), args)
    }

    /// `super.name(args)`.
    pub(super) fn super_call(&mut self, name: &str, args: Vec<Expr>) -> Expr {
        let method = class_method_name(name);
        if self.current_method.as_deref() == Some(method.as_str()) {
            return Expr::Super(args);
        }
        let bound = Expr::call("method", vec![Expr::symbol(&method)]);
        Expr::method(
            Expr::method(bound, "super_method", Vec::new()),
            "call",
            args,
        )
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
            "ThisExpression" => Expr::SelfRef,
            "ArrayExpression" => Expr::Array(self.array_items(node)),
            "ObjectExpression" => self.object_literal(node),
            "BinaryExpression" => self.binary_expr(node)?,
            "LogicalExpression" => self.logical(node)?,
            "UnaryExpression" => self.unary_expr(node)?,
            "UpdateExpression" => self.update(node)?,
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
                let cond = self.test(test);
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
                    Expr::Begin(body)
                }
            }
            "FunctionExpression" | "ArrowFunctionExpression" => self.lambda(node),
            "ClassExpression" => {
                let name = node
                    .child("id")
                    .and_then(|id| id.name())
                    .map(String::from)
                    .unwrap_or_else(|| ruby_constant(&self.names.fresh("class")));
                if let Some(class) = self.class_decl(node, Some(name.as_str())) {
                    self.pending_classes.push(class);
                }
                Expr::constant(&ruby_constant(&name))
            }
            "SpreadElement" => {
                let inner = self.value(node.child("argument")?);
                Expr::Splat(Box::new(inner))
            }
            _ => return self.unsupported(node),
        };
        Some(expr)
    }

    fn unsupported(&mut self, node: JsNode<'_>) -> Option<Expr> {
        self.drops.unsupported(node);
        None
    }

    /// Transform an expression in a position that needs a value; dropped
    /// expressions become `nil`.
    pub(super) fn value(&mut self, node: JsNode<'_>) -> Expr {
        self.expr(node).unwrap_or_else(Expr::nil)
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
            "undefined" => return Expr::nil(),
            "NaN" => return Expr::Raw("Float::NAN".to_string()),
            "Infinity" => return Expr::Raw("Float::INFINITY".to_string()),
            _ => {}
        }
        if self.is_variable(name) {
            return self.var_ref(name);
        }
        if self.functions.contains(name) {
            return Expr::call("method", vec![Expr::symbol(&def_name(name))]);
        }
        if self.classes.contains(name) || name.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Expr::constant(&ruby_constant(name));
        }
        if name == "arguments" {
            self.drops
                .lossy("'arguments' is not available; declare a rest parameter".to_string());
        }
        tracing::trace!(name, "reference to undeclared name");
        Expr::local(&ruby_local(name))
    }

    fn literal(&mut self, node: JsNode<'_>) -> Expr {
        if let Some(regex) = node.field("regex") {
            let pattern = regex.get("pattern").and_then(Value::as_str).unwrap_or("");
            let flags = regex.get("flags").and_then(Value::as_str).unwrap_or("");
            return regex_literal(pattern, flags);
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
            _ => Expr::nil(),
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
                parts.push(InterpPart::Text(text.to_string()));
            }
            if let Some(expr) = exprs.get(i) {
                parts.push(InterpPart::Expr(self.value(*expr)));
            }
        }
        interpolation(parts)
    }

    pub(super) fn array_items(&mut self, node: JsNode<'_>) -> Vec<Expr> {
        node.children_with_holes("elements")
            .into_iter()
            .map(|element| match element {
                Some(e) if e.js_type() == "SpreadElement" => match e.child("argument") {
                    Some(arg) => self.splat(arg),
                    None => Expr::nil(),
                },
                Some(e) => self.value(e),
                None => Expr::nil(),
            })
            .collect()
    }

    /// `*items` for a spread; strings spread into characters.
    fn splat(&mut self, node: JsNode<'_>) -> Expr {
        let stringy = self.is_stringy(node);
        let value = self.value(node);
        let value = if stringy {
            Expr::method(value, "chars", Vec::new())
        } else {
            value
        };
        Expr::Splat(Box::new(value))
    }

    /// A hash literal with string keys. Spreads merge left to right.
    fn object_literal(&mut self, node: JsNode<'_>) -> Expr {
        let mut result: Option<Expr> = None;
        let mut pairs = Vec::new();
        for prop in node.children("properties") {
            if prop.js_type() == "SpreadElement" {
                let Some(arg) = prop.child("argument") else { continue };
                let spread = self.value(arg);
                result = Some(match result.take() {
                    Some(base) => Expr::method(base, "merge", vec![spread]),
                    None if pairs.is_empty() => Expr::method(spread, "dup", Vec::new()),
                    None => Expr::method(
                        Expr::Hash(std::mem::take(&mut pairs)),
                        "merge",
                        vec![spread],
                    ),
                });
                continue;
            }
            if matches!(prop.str_field("kind"), Some("get" | "set")) {
                self.drops
                    .lossy("accessors in object literals are not supported".to_string());
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
                    _ => self.value(key_node),
                }
            };
            let value = match prop.child("value") {
                Some(v) => self.value(v),
                None => Expr::nil(),
            };
            match result.take() {
                Some(base) => {
                    let pair = Expr::Hash(vec![(key, value)]);
                    result = Some(Expr::method(base, "merge", vec![pair]));
                }
                None => pairs.push((key, value)),
            }
        }
        result.unwrap_or(Expr::Hash(pairs))
    }

    fn logical(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let left = node.child("left")?;
        let right = node.child("right")?;
        let op = match node.str_field("operator")? {
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            "??" => {
                let mut setup = Vec::new();
                let value = self.value(left);
                let value = self.bind(value, "value", &mut setup);
                let fallback = self.value(right);
                return Some(with_setup(
                    setup,
                    ternary(
                        Expr::method(value.clone(), "nil?", Vec::new()),
                        fallback,
                        value,
                    ),
                ));
            }
            _ => return self.unsupported(node),
        };
        let left = self.value(left);
        let right = self.value(right);
        Some(binary(op, left, right))
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
        match operator {
            "instanceof" => return Some(self.instance_of(left_node, right_node)),
            "in" => {
                let key = self.value(left_node);
                let object = self.value(right_node);
                return Some(Expr::method(object, "key?", vec![key]));
            }
            "|" if is_zero(right_node) => {
                let value = self.value(left_node);
                return Some(int32(Expr::method(value, "to_i", Vec::new())));
            }
            ">>>" | "<<" | ">>" | "&" | "|" | "^" => {
                let narrow =
                    lower::is_int31_literal(left_node) || lower::is_int31_literal(right_node);
                let left = self.int_operand(left_node);
                let right = if matches!(operator, ">>>" | "<<" | ">>") {
                    self.value(right_node)
                } else {
                    self.int_operand(right_node)
                };
                return Some(bitwise(operator, left, right, narrow));
            }
            "+" if self.is_stringy(left_node) || self.is_stringy(right_node) => {
                let left = self.value(left_node);
                let right = self.value(right_node);
                return Some(concat(left, right));
            }
            "/" => {
                let left = self.value(left_node);
                let right = self.value(right_node);
                return Some(Expr::method(left, "fdiv", vec![right]));
            }
            _ => {}
        }
        let op = match operator {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Pow,
            "==" | "===" => BinaryOp::Eq,
            "!=" | "!==" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            _ => return self.unsupported(node),
        };
        if op == BinaryOp::Mod && !self.is_unsigned(left_node) {
            self.drops
                .lossy("'%' takes the sign of the divisor in Ruby".to_string());
        }
        let left = self.value(left_node);
        let right = self.value(right_node);
        Some(binary(op, left, right))
    }

    /// Operand of a bitwise operator. Divisions produce floats in Ruby and
    /// are truncated first.
    pub(super) fn int_operand(&mut self, node: JsNode<'_>) -> Expr {
        let node = node.unwrapped();
        let value = self.value(node);
        let divides = node.js_type() == "BinaryExpression" && node.str_field("operator") == Some("/");
        if divides {
            Expr::method(value, "to_i", Vec::new())
        } else {
            value
        }
    }

    /// Known not to be negative: `%` agrees between the languages.
    fn is_unsigned(&self, node: JsNode<'_>) -> bool {
        let node = node.unwrapped();
        match node.js_type() {
            "Literal" => node.number_field("value").is_some_and(|v| v >= 0.0),
            "BinaryExpression" => match node.str_field("operator") {
                Some(">>>") => true,
                Some("&") => ["left", "right"]
                    .into_iter()
                    .any(|side| node.child(side).is_some_and(lower::is_int31_literal)),
                _ => false,
            },
            "MemberExpression" => node.static_member_name() == Some("length"),
            _ => node
                .result_type()
                .is_some_and(|t| t.starts_with("uint") || t == "byte"),
        }
    }

    /// Comparisons with `null`/`undefined` and `typeof` checks, as the
    /// positive test (the caller negates `!=`).
    fn special_equality(&mut self, left: JsNode<'_>, right: JsNode<'_>) -> Option<Expr> {
        if is_nullish(right) {
            return Some(Expr::method(self.value(left), "nil?", Vec::new()));
        }
        if is_nullish(left) {
            return Some(Expr::method(self.value(right), "nil?", Vec::new()));
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
        let is_a = |e: Expr, class: &str| Expr::method(e, "is_a?", vec![Expr::constant(class)]);
        let callable = |e: Expr| Expr::method(e, "respond_to?", vec![Expr::symbol("call")]);
        match expected {
            "undefined" => Expr::method(operand, "nil?", Vec::new()),
            "number" => is_a(operand, "Numeric"),
            "bigint" => is_a(operand, "Integer"),
            "string" => is_a(operand, "String"),
            "boolean" => boolean_test(operand),
            "function" => callable(operand),
            "object" => binary(
                BinaryOp::And,
                not(Expr::method(operand.clone(), "nil?", Vec::new())),
                not(binary(
                    BinaryOp::Or,
                    binary(
                        BinaryOp::Or,
                        binary(
                            BinaryOp::Or,
                            is_a(operand.clone(), "Numeric"),
                            is_a(operand.clone(), "String"),
                        ),
                        boolean_test(operand.clone()),
                    ),
                    callable(operand),
                )),
            ),
            other => {
                self.drops
                    .lossy(format!("typeof comparison with '{other}' is always false"));
                Expr::Literal(Literal::Bool(false))
            }
        }
    }

    /// `typeof x` used as a value.
    fn typeof_value(&mut self, operand: Expr) -> Expr {
        let mut setup = Vec::new();
        let operand = self.bind(operand, "value", &mut setup);
        let is_a = |class: &str| Expr::method(operand.clone(), "is_a?", vec![Expr::constant(class)]);
        let result = ternary(
            Expr::method(operand.clone(), "nil?", Vec::new()),
            Expr::string("undefined"),
            ternary(
                is_a("Numeric"),
                Expr::string("number"),
                ternary(
                    is_a("String"),
                    Expr::string("string"),
                    ternary(
                        boolean_test(operand.clone()),
                        Expr::string("boolean"),
                        ternary(
                            Expr::method(
                                operand.clone(),
                                "respond_to?",
                                vec![Expr::symbol("call")],
                            ),
                            Expr::string("function"),
                            Expr::string("object"),
                        ),
                    ),
                ),
            ),
        );
        with_setup(setup, result)
    }

    fn instance_of(&mut self, value: JsNode<'_>, class: JsNode<'_>) -> Expr {
        let object = self.value(value);
        let is_a = |class: &str| Expr::method(object.clone(), "is_a?", vec![Expr::constant(class)]);
        match class.name() {
            Some("Array") => is_a("Array"),
            Some("String") => is_a("String"),
            Some("Number") => is_a("Numeric"),
            Some("Map") => is_a("Hash"),
            Some("Set") => {
                self.imports.require("set");
                is_a("Set")
            }
            Some("Function") => {
                Expr::method(object.clone(), "respond_to?", vec![Expr::symbol("call")])
            }
            Some("Object") => not(Expr::method(object.clone(), "nil?", Vec::new())),
            Some(name) if is_error_class(name) && !self.classes.contains(name) => {
                is_a(match name {
                    "Error" => "StandardError",
                    other => error_class(other),
                })
            }
            _ => {
                let name = qualified_name(class).unwrap_or_else(|| "Object".to_string());
                is_a(&name)
            }
        }
    }

    fn unary_expr(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let operator = node.str_field("operator")?;
        let argument = node.child("argument")?.unwrapped();
        Some(match operator {
            "!" => {
                if let Some(decided) = lower::evaluate_guard(argument) {
                    return Some(Expr::Literal(Literal::Bool(!decided)));
                }
                not(self.test(argument))
            }
            "-" => unary(UnaryOp::Neg, self.value(argument)),
            "+" => {
                if argument.js_type() == "NewExpression"
                    && argument.child("callee").is_some_and(|c| c.is_identifier("Date"))
                {
                    return Some(epoch_millis());
                }
                let stringy = self.is_stringy(argument);
                let value = self.value(argument);
                if stringy {
                    Expr::method(value, "to_f", Vec::new())
                } else {
                    value
                }
            }
            "~" => {
                if argument.js_type() == "UnaryExpression"
                    && argument.str_field("operator") == Some("~")
                {
                    let inner = self.value(argument.child("argument")?);
                    return Some(int32(Expr::method(inner, "to_i", Vec::new())));
                }
                int32(unary(UnaryOp::BitNot, self.int_operand(argument)))
            }
            "typeof" => {
                let operand = self.value(argument);
                self.typeof_value(operand)
            }
            "void" => Expr::nil(),
            "delete" => {
                let object = argument.child("object")?;
                let key = match argument.static_member_name() {
                    Some(name) if !argument.bool_field("computed") => Expr::string(name),
                    _ => self.value(argument.child("property")?),
                };
                let object = self.value(object);
                Expr::method(object, "delete", vec![key])
            }
            _ => return self.unsupported(node),
        })
    }

    /// `x++` as a value: the old value, `(x += 1) - 1`.
    fn update(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let target = self.target(node.child("argument")?)?;
        let increment = node.str_field("operator")? == "++";
        let (op, undo) = if increment {
            (BinaryOp::Add, BinaryOp::Sub)
        } else {
            (BinaryOp::Sub, BinaryOp::Add)
        };
        let assign = Expr::compound(target, op, Expr::number(1));
        if node.bool_field("prefix") {
            return Some(assign);
        }
        Some(binary(undo, Expr::Paren(Box::new(assign)), Expr::number(1)))
    }

    fn assignment(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let operator = node.str_field("operator")?;
        let left = node.child("left")?.unwrapped();
        let right = node.child("right")?;

        if left.js_type() == "ArrayPattern" {
            let targets = self.pattern_targets(left, false);
            let value = self.value(right);
            return Some(Expr::MultiAssign {
                targets,
                value: Box::new(value),
            });
        }

        if operator == "=" {
            if let Some(name) = self.this_member(left)
                && self
                    .class_ctx
                    .as_ref()
                    .is_some_and(|c| c.setters.contains(name))
            {
                let value = self.value(right);
                return Some(Expr::assign(
                    Expr::method(Expr::SelfRef, &ivar_name(name), Vec::new()),
                    value,
                ));
            }
            if let Some(key) = value_key(left) {
                self.note_value(&key, Some(right));
            }
            let target = self.target(left)?;
            let value = self.value(right);
            return Some(Expr::assign(target, value));
        }

        let target = self.target(left)?;
        let integer_op = operator.strip_suffix('=').filter(|op| match *op {
            ">>>" | "<<" | ">>" | "|" | "^" => true,
            "&" => !lower::is_int31_literal(right),
            _ => false,
        });
        if let Some(integer_op) = integer_op {
            let value = if matches!(integer_op, ">>>" | "<<" | ">>") {
                self.value(right)
            } else {
                self.int_operand(right)
            };
            let result = bitwise(integer_op, target.clone(), value, false);
            return Some(Expr::assign(target, result));
        }
        let stringy = self.is_stringy(left) || self.is_stringy(right);
        let op = match operator {
            "+=" if stringy => {
                let right_stringy = self.is_stringy(right);
                let value = self.value(right);
                let value = if right_stringy {
                    value
                } else {
                    Expr::method(value, "to_s", Vec::new())
                };
                return Some(Expr::compound(target, BinaryOp::Add, value));
            }
            "/=" => {
                let value = self.value(right);
                return Some(Expr::assign(
                    target.clone(),
                    Expr::method(target, "fdiv", vec![value]),
                ));
            }
            "??=" => {
                let value = self.value(right);
                return Some(Expr::assign(
                    target.clone(),
                    ternary(
                        Expr::method(target.clone(), "nil?", Vec::new()),
                        value,
                        target,
                    ),
                ));
            }
            "+=" => BinaryOp::Add,
            "-=" => BinaryOp::Sub,
            "*=" => BinaryOp::Mul,
            "%=" => BinaryOp::Mod,
            "**=" => BinaryOp::Pow,
            "&=" => BinaryOp::BitAnd,
            "&&=" => BinaryOp::And,
            "||=" => BinaryOp::Or,
            _ => return self.unsupported(node),
        };
        let value = if op == BinaryOp::BitAnd {
            self.int_operand(right)
        } else {
            self.value(right)
        };
        Some(Expr::compound(target, op, value))
    }

    /// An assignable expression.
    fn target(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let node = node.unwrapped();
        if node.js_type() == "Identifier"
            && let Some(name) = node.name()
        {
            return Some(self.var_ref(name));
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
            let base = self.value(object);
            let index = self.value(property);
            return Some(Expr::index(base, index));
        }
        let name = property.name()?;
        match object.js_type() {
            "ThisExpression" => return Some(self.this_property(name)),
            "Super" => {
                let method = class_method_name(name);
                return Some(Expr::method(
                    Expr::call("method", vec![Expr::symbol(&method)]),
                    "super_method",
                    Vec::new(),
                ));
            }
            _ => {}
        }
        if let Some(object_name) = object.name()
            && !self.is_variable(object_name)
        {
            if self.classes.contains(object_name) {
                return Some(Expr::method(
                    Expr::constant(&ruby_constant(object_name)),
                    &self.call_name(name),
                    Vec::new(),
                ));
            }
            if let Some(expr) = self.static_member(object_name, name) {
                return Some(expr);
            }
        }
        if let Some(var) = object.name()
            && self.catch_vars.iter().any(|c| c == var)
        {
            let error = Expr::local(&ruby_local(var));
            match name {
                "message" => return Some(Expr::method(error, "message", Vec::new())),
                "name" => {
                    let class = Expr::method(error, "class", Vec::new());
                    return Some(Expr::method(class, "name", Vec::new()));
                }
                "stack" => return Some(Expr::method(error, "full_message", Vec::new())),
                _ => {}
            }
        }
        let collection = self.collection_of(object);
        let base = self.value(object);
        if name == "length" || (name == "size" && collection.is_some()) {
            return Some(Expr::method(base, name, Vec::new()));
        }
        if self.is_map_var(object) || !self.members.contains(name) {
            return Some(Expr::index(base, Expr::string(name)));
        }
        Some(Expr::method(base, &ivar_name(name), Vec::new()))
    }

    pub(super) fn args(&mut self, nodes: &[JsNode<'_>]) -> Vec<Expr> {
        nodes
            .iter()
            .map(|arg| {
                if arg.js_type() == "SpreadElement" {
                    match arg.child("argument") {
                        Some(inner) => self.splat(inner),
                        None => Expr::nil(),
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
            "Super" => Some(Expr::Super(self.args(&arg_nodes))),
            "Identifier" => {
                let name = callee.name()?;
                if self.scopes.lookup(name).is_some()
                    || (self.top_level.contains_key(name) && !self.functions.contains(name))
                {
                    let code = self.var_ref(name);
                    let args = self.args(&arg_nodes);
                    return Some(Expr::method(code, "call", args));
                }
                if self.functions.contains(name) {
                    let args = self.args(&arg_nodes);
                    return Some(self.def_call(name, args));
                }
                if self.classes.contains(name) {
                    let args = self.args(&arg_nodes);
                    return Some(Expr::New {
                        class: ruby_constant(name),
                        args,
                    });
                }
                if let Some(expr) = self.global_call(name, &arg_nodes) {
                    return Some(expr);
                }
                let args = self.args(&arg_nodes);
                Some(Expr::call(&def_name(name), args))
            }
            "MemberExpression" => self.member_call(callee, &arg_nodes),
            _ => {
                let code = self.value(callee);
                let args = self.args(&arg_nodes);
                Some(Expr::method(code, "call", args))
            }
        }
    }

    /// Call of a top-level `def`. Inside a class the module's functions are
    /// not in scope, so they are called through the module.
    fn def_call(&self, name: &str, args: Vec<Expr>) -> Expr {
        let method = def_name(name);
        match (&self.class_ctx, &self.options.module_name) {
            (Some(_), Some(module)) => {
                Expr::method(Expr::constant(&ruby_constant(module)), &method, args)
            }
            _ => Expr::call(&method, args),
        }
    }

    fn member_call(&mut self, callee: JsNode<'_>, arg_nodes: &[JsNode<'_>]) -> Option<Expr> {
        let object = callee.child("object")?.unwrapped();
        let Some(method) = callee.static_member_name() else {
            // obj[expr](...)
            let code = self.member(callee)?;
            let args = self.args(arg_nodes);
            return Some(Expr::method(code, "call", args));
        };
        match object.js_type() {
            "Super" => {
                let args = self.args(arg_nodes);
                return Some(self.super_call(method, args));
            }
            "ThisExpression" => {
                let args = self.args(arg_nodes);
                return Some(self.this_call(method, args));
            }
            _ => {}
        }
        if let Some(object_name) = object.name() {
            if !self.is_variable(object_name) {
                if self.classes.contains(object_name) {
                    let args = self.args(arg_nodes);
                    return Some(Expr::method(
                        Expr::constant(&ruby_constant(object_name)),
                        &self.call_name(method),
                        args,
                    ));
                }
                if let Some(expr) = self.static_call(object_name, method, arg_nodes) {
                    return Some(expr);
                }
            } else if self.scopes.lookup(object_name) == Some(Shape::Map)
                && !OBJECT_PROTOTYPE.contains(&method)
            {
                let code = Expr::index(self.var_ref(object_name), Expr::string(method));
                let args = self.args(arg_nodes);
                return Some(Expr::method(code, "call", args));
            }
        }
        if matches!(method, "call" | "apply")
            && is_callable_ref(object)
            && self.collection_of(object).is_none()
        {
            let code = self.value(object);
            let rest = arg_nodes.get(1..).unwrap_or_default();
            let args = if method == "apply" {
                match rest.first() {
                    Some(list) => vec![Expr::Splat(Box::new(self.value(*list)))],
                    None => Vec::new(),
                }
            } else {
                self.args(rest)
            };
            return Some(Expr::method(code, "call", args));
        }
        if let Some(expr) = self.method_call(object, method, arg_nodes) {
            return Some(expr);
        }
        let receiver = self.value(object);
        let args = self.args(arg_nodes);
        Some(Expr::method(receiver, &self.call_name(method), args))
    }

    fn new_expr(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let callee = node.child("callee")?.unwrapped();
        let arg_nodes = node.children("arguments");
        if let Some(name) = callee.name() {
            if self.is_variable(name) {
                let class = self.var_ref(name);
                let args = self.args(&arg_nodes);
                return Some(Expr::method(class, "new", args));
            }
            if !self.classes.contains(name) {
                if is_error_class(name) {
                    let args = self.args(&arg_nodes);
                    return Some(Expr::New {
                        class: error_class(name).to_string(),
                        args,
                    });
                }
                if let Some(expr) = self.builtin_constructor(name, &arg_nodes) {
                    return Some(expr);
                }
            }
        }
        let class = qualified_name(callee)?;
        let args = self.args(&arg_nodes);
        Some(Expr::New { class, args })
    }

    /// A value as a condition, with JavaScript truthiness: zero and the empty
    /// string are false.
    pub(super) fn test(&mut self, node: JsNode<'_>) -> Expr {
        let node = node.unwrapped();
        if let Some(decided) = lower::evaluate_guard(node) {
            return Expr::Literal(Literal::Bool(decided));
        }
        match node.js_type() {
            "LogicalExpression" => {
                let op = match node.str_field("operator") {
                    Some("&&") => Some(BinaryOp::And),
                    Some("||") => Some(BinaryOp::Or),
                    _ => None,
                };
                if let (Some(op), Some(left), Some(right)) =
                    (op, node.child("left"), node.child("right"))
                {
                    let left = self.test(left);
                    let right = self.test(right);
                    return binary(op, left, right);
                }
            }
            "UnaryExpression" if node.str_field("operator") == Some("!") => {
                if let Some(argument) = node.child("argument") {
                    let inner = self.test(argument);
                    return not(inner);
                }
            }
            "Literal" if !node.has("regex") => {
                return Expr::Literal(Literal::Bool(match node.field("value") {
                    Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
                    Some(Value::String(s)) => !s.is_empty(),
                    Some(Value::Bool(b)) => *b,
                    _ => false,
                }));
            }
            "BinaryExpression"
                if matches!(
                    node.str_field("operator"),
                    Some(
                        "==" | "===" | "!=" | "!==" | "<" | ">" | "<=" | ">=" | "instanceof"
                            | "in"
                    )
                ) =>
            {
                return self.value(node);
            }
            _ => {}
        }
        if self.is_stringy(node) {
            let value = self.value(node);
            return not(Expr::method(value, "empty?", Vec::new()));
        }
        if self.is_numeric(node) {
            let value = self.value(node);
            return binary(BinaryOp::Ne, value, Expr::number(0));
        }
        self.value(node)
    }

    // ---------------------------------------------------------------------
    // Value knowledge
    // ---------------------------------------------------------------------

    /// Syntactically string-valued, or a variable known to hold a string.
    pub(super) fn is_stringy(&self, node: JsNode<'_>) -> bool {
        let node = node.unwrapped();
        if lower::is_string_like(node) {
            return true;
        }
        if let Some(key) = value_key(node) {
            return self.string_vars.contains(&key);
        }
        match node.js_type() {
            "BinaryExpression" if node.str_field("operator") == Some("+") => {
                node.child("left").is_some_and(|l| self.is_stringy(l))
                    || node.child("right").is_some_and(|r| self.is_stringy(r))
            }
            "ConditionalExpression" => {
                node.child("consequent").is_some_and(|c| self.is_stringy(c))
                    && node.child("alternate").is_some_and(|a| self.is_stringy(a))
            }
            "CallExpression" => node
                .child("callee")
                .map(JsNode::unwrapped)
                .filter(|c| matches!(c.static_member_name(), Some("slice" | "concat")))
                .and_then(|c| c.child("object"))
                .is_some_and(|o| self.is_stringy(o)),
            _ => false,
        }
    }

    pub(super) fn is_numeric(&self, node: JsNode<'_>) -> bool {
        let node = node.unwrapped();
        if let Some(ty) = node.result_type() {
            return matches!(
                RubyType::from_result_type(ty),
                Some(RubyType::Integer | RubyType::Float | RubyType::Numeric)
            );
        }
        if let Some(key) = value_key(node) {
            return self.numeric_vars.contains(&key);
        }
        match node.js_type() {
            "Literal" => matches!(node.field("value"), Some(Value::Number(_))) || node.has("bigint"),
            "UpdateExpression" => true,
            "UnaryExpression" => matches!(node.str_field("operator"), Some("-" | "+" | "~")),
            "BinaryExpression" => match node.str_field("operator") {
                Some(
                    "-" | "*" | "/" | "%" | "**" | "&" | "|" | "^" | "<<" | ">>" | ">>>",
                ) => true,
                Some("+") => {
                    node.child("left").is_some_and(|l| self.is_numeric(l))
                        && node.child("right").is_some_and(|r| self.is_numeric(r))
                }
                _ => false,
            },
            "MemberExpression" => node.static_member_name() == Some("length"),
            "CallExpression" => node.child("callee").is_some_and(|callee| {
                let callee = callee.unwrapped();
                if let Some(name) = callee.name() {
                    return matches!(name, "parseInt" | "parseFloat" | "Number");
                }
                callee
                    .child("object")
                    .is_some_and(|o| o.is_identifier("Math"))
                    || matches!(
                        callee.static_member_name(),
                        Some("indexOf" | "lastIndexOf" | "charCodeAt" | "codePointAt" | "findIndex")
                    )
            }),
            _ => false,
        }
    }

    pub(super) fn collection_of(&self, node: JsNode<'_>) -> Option<Collection> {
        let node = node.unwrapped();
        if node.js_type() == "NewExpression" {
            return match node.child("callee").and_then(|c| c.name()) {
                Some("Map" | "WeakMap") => Some(Collection::Map),
                Some("Set" | "WeakSet") => Some(Collection::Set),
                _ => None,
            };
        }
        value_key(node).and_then(|key| self.collections.get(&key).copied())
    }

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
}

// -------------------------------------------------------------------------
// Expression builders
// -------------------------------------------------------------------------

/// Binary expression with the parentheses Ruby precedence requires.
pub(super) fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let prec = op.precedence();
    let left_prec = left.precedence();
    let right_prec = right.precedence();
    let left_parens =
        left_prec < prec || (left_prec == prec && (op.is_right_assoc() || op.is_non_assoc()));
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
    if op == UnaryOp::Neg
        && let Expr::Literal(Literal::Number(text)) = &operand
    {
        return match text.strip_prefix('-') {
            Some(positive) => Expr::Literal(Literal::Number(positive.to_string())),
            None => Expr::Literal(Literal::Number(format!("-{text}"))),
        };
    }
    let parens = operand.precedence() < op.precedence();
    Expr::Unary {
        op,
        operand: Box::new(operand),
        parens,
    }
}

/// Negation; comparisons flip instead of gaining a `!`.
pub(super) fn not(operand: Expr) -> Expr {
    match operand {
        Expr::Binary {
            op: BinaryOp::Eq,
            left,
            right,
            left_parens,
            right_parens,
        } => Expr::Binary {
            op: BinaryOp::Ne,
            left,
            right,
            left_parens,
            right_parens,
        },
        Expr::Binary {
            op: BinaryOp::Ne,
            left,
            right,
            left_parens,
            right_parens,
        } => Expr::Binary {
            op: BinaryOp::Eq,
            left,
            right,
            left_parens,
            right_parens,
        },
        Expr::Literal(Literal::Bool(b)) => Expr::Literal(Literal::Bool(!b)),
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
            ..
        } => *operand,
        other => unary(UnaryOp::Not, other),
    }
}

pub(super) fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
    Expr::Ternary {
        cond: Box::new(cond),
        then_expr: Box::new(then_expr),
        else_expr: Box::new(else_expr),
    }
}

/// `begin SETUP; RESULT end`, or just the result without setup.
pub(super) fn with_setup(setup: Vec<Stmt>, result: Expr) -> Expr {
    if setup.is_empty() {
        return result;
    }
    let mut body = setup;
    body.push(Stmt::expr(result));
    Expr::Begin(body)
}

/// String interpolation from parts, merging adjacent text.
pub(super) fn interpolation(parts: Vec<InterpPart>) -> Expr {
    let mut merged: Vec<InterpPart> = Vec::new();
    for part in parts {
        match (merged.last_mut(), part) {
            (Some(InterpPart::Text(prev)), InterpPart::Text(text)) => prev.push_str(&text),
            (_, part) => merged.push(part),
        }
    }
    match merged.as_slice() {
        [] => Expr::string(""),
        [InterpPart::Text(text)] => Expr::string(text),
        _ => Expr::Interp(merged),
    }
}

/// JavaScript string `+`: both sides interpolated into one string.
pub(super) fn concat(left: Expr, right: Expr) -> Expr {
    let mut parts = Vec::new();
    for side in [left, right] {
        match side {
            Expr::Interp(inner) => parts.extend(inner),
            Expr::Literal(Literal::String(text)) => parts.push(InterpPart::Text(text)),
            other => parts.push(InterpPart::Expr(other)),
        }
    }
    interpolation(parts)
}

fn boolean_test(operand: Expr) -> Expr {
    Expr::method(
        Expr::Array(vec![
            Expr::Literal(Literal::Bool(true)),
            Expr::Literal(Literal::Bool(false)),
        ]),
        "include?",
        vec![operand],
    )
}

/// Milliseconds since the epoch, as `Date.now()` gives them.
pub(super) fn epoch_millis() -> Expr {
    let now = Expr::method(Expr::constant("Time"), "now", Vec::new());
    Expr::method(
        binary(
            BinaryOp::Mul,
            Expr::method(now, "to_f", Vec::new()),
            Expr::number(1000),
        ),
        "to_i",
        Vec::new(),
    )
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

/// JavaScript's 32-bit integer operators. Ruby's `>>` already propagates
/// the sign once the operand is read as int32. `narrow` when one operand
/// of `&` is a literal mask that keeps the result non-negative.
fn bitwise(operator: &str, left: Expr, right: Expr, narrow: bool) -> Expr {
    match operator {
        ">>>" => unsigned_shift(left, right),
        "<<" => left_shift(left, right),
        ">>" if matches!(&right, Expr::Literal(Literal::Number(n)) if n == "0") => int32(left),
        ">>" => binary(BinaryOp::Shr, int32(left), shift_amount(right)),
        "&" if narrow => binary(BinaryOp::BitAnd, left, right),
        "&" => int32(binary(BinaryOp::BitAnd, left, right)),
        "|" => int32(binary(BinaryOp::BitOr, left, right)),
        _ => int32(binary(BinaryOp::BitXor, left, right)),
    }
}

fn shift_amount(amount: Expr) -> Expr {
    match &amount {
        Expr::Literal(Literal::Number(n)) if n.parse::<u32>().is_ok_and(|v| v < 32) => amount,
        _ => binary(BinaryOp::BitAnd, amount, Expr::number(31)),
    }
}

fn plus_one(expr: Expr) -> Expr {
    if let Expr::Literal(Literal::Number(text)) = &expr
        && let Ok(n) = text.parse::<i64>()
    {
        return Expr::number(n + 1);
    }
    binary(BinaryOp::Add, expr, Expr::number(1))
}

/// A trailing `return v` becomes the implicit result `v`.
fn implicit_return(body: &mut [Stmt]) {
    if let Some(last) = body.last_mut()
        && let StmtKind::Return(Some(value)) = &mut last.kind
    {
        let value = std::mem::replace(value, Expr::nil());
        last.kind = StmtKind::Expr(value);
    }
}

/// A body short enough for `def f(x) = expr`.
fn endless_body(body: &[Stmt]) -> bool {
    let [only] = body else {
        return false;
    };
    if !only.meta.comments.is_empty() {
        return false;
    }
    match &only.kind {
        StmtKind::Expr(expr) => match expr {
            Expr::Lambda(_) | Expr::Begin(_) | Expr::Assign { .. } | Expr::MultiAssign { .. } => {
                false
            }
            Expr::Call {
                block: Some(block), ..
            } => {
                block.locals.is_empty()
                    && matches!(block.body.as_slice(), [s] if matches!(s.kind, StmtKind::Expr(_)))
            }
            _ => true,
        },
        _ => false,
    }
}

fn has_plain_break(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match &stmt.kind {
        StmtKind::LoopControl {
            kind: LoopControl::Break,
            ..
        } => true,
        StmtKind::If {
            then_branch,
            elsifs,
            else_branch,
            ..
        } => {
            has_plain_break(then_branch)
                || elsifs.iter().any(|(_, body)| has_plain_break(body))
                || else_branch.as_deref().is_some_and(has_plain_break)
        }
        StmtKind::Begin {
            body,
            rescue,
            ensure,
        } => {
            has_plain_break(body)
                || rescue.as_ref().is_some_and(|r| has_plain_break(&r.body))
                || ensure.as_deref().is_some_and(has_plain_break)
        }
        StmtKind::Catch { body, .. } => has_plain_break(body),
        _ => false,
    })
}

/// Replace `break`s that belong to the enclosing loop with `throw :tag`.
fn retarget_breaks(stmts: &mut [Stmt], tag: &str) {
    for stmt in stmts {
        if matches!(
            stmt.kind,
            StmtKind::LoopControl {
                kind: LoopControl::Break,
                ..
            }
        ) {
            stmt.kind = StmtKind::Throw {
                tag: tag.to_string(),
            };
            continue;
        }
        match &mut stmt.kind {
            StmtKind::If {
                then_branch,
                elsifs,
                else_branch,
                ..
            } => {
                retarget_breaks(then_branch, tag);
                for (_, body) in elsifs {
                    retarget_breaks(body, tag);
                }
                if let Some(body) = else_branch {
                    retarget_breaks(body, tag);
                }
            }
            StmtKind::Begin {
                body,
                rescue,
                ensure,
            } => {
                retarget_breaks(body, tag);
                if let Some(rescue) = rescue {
                    retarget_breaks(&mut rescue.body, tag);
                }
                if let Some(body) = ensure {
                    retarget_breaks(body, tag);
                }
            }
            StmtKind::Catch { body, .. } => retarget_breaks(body, tag),
            _ => {}
        }
    }
}

// -------------------------------------------------------------------------
// Names
// -------------------------------------------------------------------------

/// A local variable name: lowercase start, no keywords or `Kernel` names.
pub(super) fn ruby_local(name: &str) -> String {
    let mut out = name.replace('$', "_");
    if out.starts_with(|c: char| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if KEYWORDS.contains(&out.as_str()) || KERNEL_METHODS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

pub(super) fn ruby_global(name: &str) -> String {
    name.replace('$', "_")
}

pub(super) fn ruby_constant(name: &str) -> String {
    let name = name.replace('$', "_");
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            first.to_ascii_uppercase().to_string() + chars.as_str()
        }
        _ => format!("C{name}"),
    }
}

/// Name of a top-level `def`.
pub(super) fn def_name(name: &str) -> String {
    let mut out = name.replace('$', "_");
    if KEYWORDS.contains(&out.as_str()) || KERNEL_METHODS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

/// Name of a class method or accessor defined from JavaScript `name`.
pub(super) fn class_method_name(name: &str) -> String {
    if name == "toString" {
        return "to_s".to_string();
    }
    let mut out = name.replace('$', "_");
    if KEYWORDS.contains(&out.as_str()) || OBJECT_METHODS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

/// Instance variable / attribute name.
pub(super) fn ivar_name(name: &str) -> String {
    name.replace('$', "_")
}

/// Symbol text for a `catch` tag.
fn tag_name(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `Error` subclasses as Ruby exception classes.
pub(super) fn error_class(name: &str) -> &'static str {
    match name {
        "TypeError" => "TypeError",
        "RangeError" => "RangeError",
        "Error" => "RuntimeError",
        _ => "StandardError",
    }
}

/// A JavaScript regex as a Ruby one. Without the `m` flag, `^` and `$`
/// anchor the whole string, which is `\A` and `\z` in Ruby.
pub(super) fn regex_literal(pattern: &str, flags: &str) -> Expr {
    let multiline = flags.contains('m');
    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    let mut in_class = false;
    for c in pattern.chars() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '[' => {
                in_class = true;
                out.push(c);
            }
            ']' => {
                in_class = false;
                out.push(c);
            }
            '^' if !in_class && !multiline => out.push_str("\\A"),
            '$' if !in_class && !multiline => out.push_str("\\z"),
            _ => out.push(c),
        }
    }
    let flags = flags
        .chars()
        .filter_map(|c| match c {
            'i' | 'x' => Some(c),
            's' => Some('m'),
            _ => None,
        })
        .collect();
    Expr::Regex {
        pattern: out,
        flags,
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

pub(super) fn is_function(node: JsNode<'_>) -> bool {
    matches!(
        node.unwrapped().js_type(),
        "FunctionExpression" | "ArrowFunctionExpression"
    )
}

fn is_callable_ref(node: JsNode<'_>) -> bool {
    matches!(node.js_type(), "Identifier" | "FunctionExpression")
}

pub(super) fn is_error_class(name: &str) -> bool {
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

/// Key under which facts about a variable or `this` attribute are kept.
fn value_key(node: JsNode<'_>) -> Option<String> {
    let node = node.unwrapped();
    if node.js_type() == "Identifier" {
        return node.name().map(String::from);
    }
    if node.kind() == "ThisPropertyAccess" {
        return node.str_field("property").map(|p| format!("@{p}"));
    }
    let object = node.child("object")?.unwrapped();
    if object.js_type() == "ThisExpression" {
        return node.static_member_name().map(|p| format!("@{p}"));
    }
    None
}

/// `A.B.C` as `A::B::C`.
pub(super) fn qualified_name(node: JsNode<'_>) -> Option<String> {
    let node = node.unwrapped();
    match node.js_type() {
        "Identifier" => node.name().map(ruby_constant),
        "MemberExpression" if !node.bool_field("computed") => {
            let object = qualified_name(node.child("object")?)?;
            Some(format!("{object}::{}", ruby_constant(node.static_member_name()?)))
        }
        _ => None,
    }
}

fn member_key(member: JsNode<'_>) -> Option<&str> {
    let key = member.child("key")?;
    key.name().or_else(|| key.string_value())
}

/// Names bound by a destructuring pattern.
fn pattern_names<'a>(pattern: JsNode<'a>) -> Vec<&'a str> {
    if let Some(name) = pattern.name() {
        return vec![name];
    }
    match pattern.js_type() {
        "ArrayPattern" => pattern
            .children("elements")
            .into_iter()
            .flat_map(pattern_names)
            .collect(),
        "ObjectPattern" => pattern
            .children("properties")
            .into_iter()
            .flat_map(|p| p.child("value").or_else(|| p.child("argument")))
            .flat_map(pattern_names)
            .collect(),
        "RestElement" => pattern.child("argument").map(pattern_names).unwrap_or_default(),
        "AssignmentPattern" => pattern.child("left").map(pattern_names).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Method names defined by the program's top-level classes.
fn class_method_names(stmts: &[JsNode<'_>]) -> HashSet<String> {
    let mut names = HashSet::new();
    for stmt in stmts {
        let class = match stmt.js_type() {
            "ClassDeclaration" => Some(*stmt),
            "VariableDeclaration" => stmt
                .children("declarations")
                .into_iter()
                .filter_map(|d| d.child("init").map(JsNode::unwrapped))
                .find(|i| i.js_type() == "ClassExpression"),
            _ => None,
        };
        let Some(class) = class else { continue };
        for member in class.child("body").map(|b| b.children("body")).unwrap_or_default() {
            if member.js_type() == "MethodDefinition"
                && member.str_field("kind") == Some("method")
                && let Some(key) = member_key(member)
            {
                names.insert(key.to_string());
            }
        }
    }
    names
}

/// Step of a `for` update on `var`: `i++` is 1, `i -= 2` is -2.
fn loop_step(update: JsNode<'_>, var: &str) -> Option<i64> {
    match update.js_type() {
        "UpdateExpression" if update.child("argument")?.is_identifier(var) => {
            match update.str_field("operator")? {
                "++" => Some(1),
                "--" => Some(-1),
                _ => None,
            }
        }
        "AssignmentExpression" if update.child("left")?.is_identifier(var) => {
            let right = update.child("right")?.unwrapped();
            let step = right.number_field("value").filter(|v| {
                right.js_type() == "Literal" && *v > 0.0 && v.fract() == 0.0
            })? as i64;
            match update.str_field("operator")? {
                "+=" => Some(step),
                "-=" => Some(-step),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Whether a loop bound keeps its value while `body` runs.
fn stable_bound(bound: JsNode<'_>, var: &str, body: JsNode<'_>) -> bool {
    let bound = bound.unwrapped();
    match bound.js_type() {
        "Literal" => bound.number_field("value").is_some(),
        "Identifier" => bound
            .name()
            .is_some_and(|name| name != var && !lower::assigns_to(&[body], name)),
        "MemberExpression" if bound.static_member_name() == Some("length") => bound
            .child("object")
            .map(JsNode::unwrapped)
            .and_then(|o| o.name())
            .is_some_and(|name| {
                name != var
                    && !lower::assigns_to(&[body], name)
                    && !lower::calls_method(&[body], RESIZING_METHODS)
            }),
        "BinaryExpression" if matches!(bound.str_field("operator"), Some("+" | "-" | "*")) => {
            bound.child("left").is_some_and(|l| stable_bound(l, var, body))
                && bound.child("right").is_some_and(|r| stable_bound(r, var, body))
        }
        "UnaryExpression" if bound.str_field("operator") == Some("-") => bound
            .child("argument")
            .is_some_and(|a| stable_bound(a, var, body)),
        _ => false,
    }
}

fn return_type(func: JsNode<'_>) -> Option<RubyType> {
    if let Some(ty) = func.result_type().and_then(RubyType::from_result_type) {
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
pub(super) fn infer_type(node: Option<JsNode<'_>>) -> Option<RubyType> {
    let node = node?.unwrapped();
    if let Some(ty) = node.result_type().and_then(RubyType::from_result_type) {
        return Some(ty);
    }
    match node.js_type() {
        "Literal" => match node.field("value")? {
            Value::String(_) => Some(RubyType::String),
            Value::Bool(_) => Some(RubyType::Bool),
            Value::Number(n) => Some(if n.as_f64().is_some_and(|v| v.fract() == 0.0) {
                RubyType::Integer
            } else {
                RubyType::Float
            }),
            _ => None,
        },
        "TemplateLiteral" => Some(RubyType::String),
        "ArrayExpression" => {
            let elements = node.children("elements");
            let inner = if !elements.is_empty()
                && elements
                    .iter()
                    .all(|e| infer_type(Some(*e)) == Some(RubyType::Integer))
            {
                RubyType::Integer
            } else {
                RubyType::Untyped
            };
            Some(RubyType::Array(Box::new(inner)))
        }
        "ObjectExpression" => Some(RubyType::Hash(
            Box::new(RubyType::String),
            Box::new(RubyType::Untyped),
        )),
        "FunctionExpression" | "ArrowFunctionExpression" => Some(RubyType::Proc),
        "NewExpression" => {
            let class = node.child("callee").and_then(|c| c.name())?;
            Some(match class {
                "Array" | "Uint8Array" | "Uint16Array" | "Uint32Array" | "Int32Array" => {
                    RubyType::Array(Box::new(RubyType::Integer))
                }
                "Map" => RubyType::Hash(Box::new(RubyType::Untyped), Box::new(RubyType::Untyped)),
                _ => RubyType::Instance(ruby_constant(class)),
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
        RubyTransformer::new(&GenerationOptions::default())
            .transform(&program)
            .unwrap()
    }

    fn ident(name: &str) -> Value {
        json!({"type": "Identifier", "name": name})
    }

    fn num(n: i64) -> Value {
        json!({"type": "Literal", "value": n, "raw": n.to_string()})
    }

    fn let_decl(name: &str, init: Value) -> Value {
        json!({"type": "VariableDeclaration", "kind": "let", "declarations": [
            {"type": "VariableDeclarator", "id": ident(name), "init": init}
        ]})
    }

    fn call_stmt(name: &str, args: Vec<Value>) -> Value {
        json!({"type": "ExpressionStatement", "expression": {
            "type": "CallExpression", "callee": ident(name), "arguments": args}})
    }

    #[test]
    fn test_rejects_non_program_root() {
        let err = RubyTransformer::new(&GenerationOptions::default())
            .transform(&json!({"type": "Identifier", "name": "x"}))
            .unwrap_err();
        assert!(err.to_string().contains("'Identifier' node"));
    }

    #[test]
    fn test_variable_read_by_function_becomes_global() {
        let module = transform(json!({"type": "Program", "body": [
            let_decl("count", num(0)),
            {"type": "FunctionDeclaration", "id": ident("bump"), "params": [],
             "body": {"type": "BlockStatement", "body": [
                 {"type": "ExpressionStatement", "expression": {
                     "type": "UpdateExpression", "operator": "++", "prefix": false,
                     "argument": ident("count")}}
             ]}}
        ]}));
        let global = Expr::Var {
            name: "count".to_string(),
            kind: VarKind::Global,
        };
        let StmtKind::Method(method) = &module.body[0].kind else {
            panic!("expected the def first");
        };
        assert_eq!(method.name, "bump");
        assert_eq!(
            method.body,
            vec![Stmt::expr(Expr::compound(global.clone(), BinaryOp::Add, Expr::number(1)))]
        );
        assert_eq!(module.body[1].kind, StmtKind::Expr(Expr::assign(global, Expr::number(0))));
    }

    #[test]
    fn test_counting_loop_becomes_range_each() {
        let module = transform(json!({"type": "Program", "body": [
            {"type": "ForStatement",
             "init": {"type": "VariableDeclaration", "kind": "let", "declarations": [
                 {"type": "VariableDeclarator", "id": ident("i"), "init": num(0)}]},
             "test": {"type": "BinaryExpression", "operator": "<", "left": ident("i"), "right": num(10)},
             "update": {"type": "UpdateExpression", "operator": "++", "prefix": false, "argument": ident("i")},
             "body": {"type": "BlockStatement", "body": [call_stmt("work", vec![ident("i")])]}}
        ]}));
        let StmtKind::Expr(Expr::Call {
            receiver: Some(receiver),
            name,
            block: Some(block),
            ..
        }) = &module.body[0].kind
        else {
            panic!("expected an each call");
        };
        assert_eq!(name, "each");
        assert_eq!(
            **receiver,
            Expr::range(Expr::number(0), Some(Expr::number(10)), true)
        );
        assert_eq!(block.params, vec![Param::new("i")]);
    }

    #[test]
    fn test_continue_in_stepped_loop_throws_past_the_update() {
        let module = transform(json!({"type": "Program", "body": [
            let_decl("i", num(0)),
            {"type": "ForStatement", "init": null,
             "test": {"type": "BinaryExpression", "operator": "<", "left": ident("i"), "right": ident("n")},
             "update": {"type": "AssignmentExpression", "operator": "+=", "left": ident("i"), "right": num(2)},
             "body": {"type": "BlockStatement", "body": [
                 {"type": "IfStatement", "test": ident("skip"),
                  "consequent": {"type": "ContinueStatement"}}
             ]}}
        ]}));
        let StmtKind::While { body, .. } = &module.body[1].kind else {
            panic!("expected a while loop");
        };
        let StmtKind::Catch { tag, body: caught } = &body[0].kind else {
            panic!("expected the body inside catch");
        };
        let StmtKind::If { then_branch, .. } = &caught[0].kind else {
            panic!("expected the if");
        };
        assert_eq!(then_branch[0].kind, StmtKind::Throw { tag: tag.clone() });
        assert!(matches!(
            body[1].kind,
            StmtKind::Expr(Expr::Assign { op: Some(BinaryOp::Add), .. })
        ));
    }

    #[test]
    fn test_switch_with_inner_break_runs_in_loop() {
        let module = transform(json!({"type": "Program", "body": [
            {"type": "SwitchStatement", "discriminant": ident("k"), "cases": [
                {"type": "SwitchCase", "test": num(1), "consequent": [
                    {"type": "IfStatement", "test": ident("done"),
                     "consequent": {"type": "BreakStatement"}},
                    call_stmt("work", vec![]),
                    {"type": "BreakStatement"}
                ]}
            ]}
        ]}));
        assert!(matches!(
            &module.body[0].kind,
            StmtKind::Expr(Expr::Assign { .. })
        ));
        let StmtKind::Expr(Expr::Call {
            receiver: None,
            name,
            block: Some(block),
            ..
        }) = &module.body[1].kind
        else {
            panic!("expected loop do");
        };
        assert_eq!(name, "loop");
        assert_eq!(
            block.body.last().map(|s| &s.kind),
            Some(&StmtKind::LoopControl {
                kind: LoopControl::Break,
                value: None
            })
        );
    }

    #[test]
    fn test_numeric_condition_compares_with_zero() {
        let module = transform(json!({"type": "Program", "body": [
            let_decl("n", num(3)),
            {"type": "IfStatement", "test": ident("n"),
             "consequent": {"type": "BlockStatement", "body": []}}
        ]}));
        let StmtKind::If { cond, .. } = &module.body[1].kind else {
            panic!("expected an if");
        };
        assert_eq!(
            *cond,
            binary(BinaryOp::Ne, Expr::local("n"), Expr::number(0))
        );
    }

    #[test]
    fn test_string_concatenation_interpolates() {
        let module = transform(json!({"type": "Program", "body": [
            {"type": "ExpressionStatement", "expression": {
                "type": "BinaryExpression", "operator": "+",
                "left": {"type": "Literal", "value": "n = ", "raw": "'n = '"},
                "right": ident("n")}}
        ]}));
        assert_eq!(
            module.body[0].kind,
            StmtKind::Expr(Expr::Interp(vec![
                InterpPart::Text("n = ".to_string()),
                InterpPart::Expr(Expr::local("n")),
            ]))
        );
    }

    #[test]
    fn test_unknown_statement_dropped_and_reported_in_strict_mode() {
        let options = GenerationOptions {
            strict_input: true,
            ..GenerationOptions::default()
        };
        let mut transformer = RubyTransformer::new(&options);
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
    fn test_throw_new_error_raises_message() {
        let module = transform(json!({"type": "Program", "body": [
            {"type": "ThrowStatement", "argument": {
                "type": "NewExpression", "callee": ident("TypeError"),
                "arguments": [{"type": "Literal", "value": "bad"}]}}
        ]}));
        assert_eq!(
            module.body[0].kind,
            StmtKind::Raise {
                class: Some("TypeError".to_string()),
                message: Some(Expr::string("bad")),
            }
        );
    }

    #[test]
    fn test_regex_anchors_become_string_anchors() {
        assert_eq!(
            regex_literal("^a[$^]b$", "gi"),
            Expr::Regex {
                pattern: "\\Aa[$^]b\\z".to_string(),
                flags: "i".to_string()
            }
        );
        let Expr::Regex { pattern, .. } = regex_literal("^a$", "m") else {
            panic!("expected a regex");
        };
        assert_eq!(pattern, "^a$");
    }

    #[test]
    fn test_names_avoid_ruby_keywords_and_kernel() {
        assert_eq!(ruby_local("end"), "end_");
        assert_eq!(ruby_local("Count"), "_Count");
        assert_eq!(ruby_local("$el"), "_el");
        assert_eq!(def_name("format"), "format_");
        assert_eq!(class_method_name("toString"), "to_s");
        assert_eq!(class_method_name("hash"), "hash_");
        assert_eq!(ruby_constant("point"), "Point");
    }

    #[test]
    fn test_not_flips_equality() {
        let eq = binary(BinaryOp::Eq, Expr::local("a"), Expr::number(1));
        assert_eq!(
            not(eq),
            binary(BinaryOp::Ne, Expr::local("a"), Expr::number(1))
        );
        assert_eq!(unary(UnaryOp::Neg, Expr::number(5)), Expr::Literal(Literal::Number("-5".into())));
    }

    fn expr_of(node: Value) -> Expr {
        let mut t = RubyTransformer::new(&GenerationOptions::default());
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
        assert_eq!(
            expr_of(bitwise_node("&", ident("a"), num(255))),
            binary(BinaryOp::BitAnd, expr_of(ident("a")), Expr::number(255))
        );
    }

    #[test]
    fn test_signed_shift_reads_operand_as_int32() {
        let expr = expr_of(bitwise_node(">>", ident("a"), num(1)));
        assert_eq!(
            expr,
            binary(BinaryOp::Shr, int32(expr_of(ident("a"))), Expr::number(1))
        );
    }

    #[test]
    fn test_truncation_idioms_wrap_to_int32() {
        let a = expr_of(ident("a"));
        let truncated = int32(Expr::method(a, "to_i", Vec::new()));
        assert_eq!(expr_of(bitwise_node("|", ident("a"), num(0))), truncated);
        let not = |argument: Value| {
            json!({"type": "UnaryExpression", "operator": "~", "prefix": true,
                   "argument": argument})
        };
        assert_eq!(expr_of(not(not(ident("a")))), truncated);
    }

    #[test]
    fn test_compound_shift_assignment_wraps_result() {
        let Expr::Assign { op, value, .. } = expr_of(json!({
            "type": "AssignmentExpression", "operator": ">>=",
            "left": ident("h"), "right": num(4)
        })) else {
            panic!("expected an assignment");
        };
        assert_eq!(op, None);
        assert!(matches!(*value, Expr::Binary { op: BinaryOp::Shr, .. }));
    }
}
