//! Perl target tree.
//!
//! A closed tree: the emitter dispatches on these enums with exhaustive
//! matches. Variables carry their [`Shape`], which decides the sigil; the
//! emitter reads it and never works it out again.

use crate::input::SourceLocation;
pub use crate::lower::Shape;
use std::fmt;

/// Provenance and attached comments of a declaration or statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeta {
    pub loc: Option<SourceLocation>,
    pub comments: Vec<Comment>,
}

impl NodeMeta {
    pub fn at(loc: Option<SourceLocation>) -> Self {
        Self {
            loc,
            comments: Vec::new(),
        }
    }
}

/// A comment, rendered as `#` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    /// Came from a `/* */` block in the input.
    pub block: bool,
}

/// Type::Tiny style type names, used in annotation comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerlType {
    Any,
    Int,
    Num,
    Str,
    Bool,
    ArrayRef(Box<PerlType>),
    HashRef(Box<PerlType>),
    CodeRef,
    InstanceOf(String),
    Maybe(Box<PerlType>),
}

impl PerlType {
    /// Map an IL `resultType` string.
    pub fn from_result_type(name: &str) -> Option<Self> {
        if let Some(element) = name.strip_suffix("[]") {
            let inner = Self::from_result_type(element).unwrap_or(PerlType::Any);
            return Some(PerlType::ArrayRef(Box::new(inner)));
        }
        Some(match name {
            "string" => PerlType::Str,
            "boolean" | "bool" => PerlType::Bool,
            "int" | "int8" | "int16" | "int32" | "uint8" | "uint16" | "uint32" | "byte" => {
                PerlType::Int
            }
            "number" | "float" | "double" | "float32" | "float64" => PerlType::Num,
            "array" | "Uint8Array" | "Uint16Array" | "Uint32Array" | "Int32Array" => {
                PerlType::ArrayRef(Box::new(PerlType::Int))
            }
            "object" => PerlType::HashRef(Box::new(PerlType::Any)),
            "function" => PerlType::CodeRef,
            _ => return None,
        })
    }
}

impl fmt::Display for PerlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerlType::Any => f.write_str("Any"),
            PerlType::Int => f.write_str("Int"),
            PerlType::Num => f.write_str("Num"),
            PerlType::Str => f.write_str("Str"),
            PerlType::Bool => f.write_str("Bool"),
            PerlType::ArrayRef(inner) => write!(f, "ArrayRef[{inner}]"),
            PerlType::HashRef(inner) => write!(f, "HashRef[{inner}]"),
            PerlType::CodeRef => f.write_str("CodeRef"),
            PerlType::InstanceOf(class) => write!(f, "InstanceOf['{class}']"),
            PerlType::Maybe(inner) => write!(f, "Maybe[{inner}]"),
        }
    }
}

/// A file: pragmas, imports and top-level statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// `package` declared at the top; a named module ends with `1;`.
    pub name: Option<String>,
    pub pragmas: Vec<Use>,
    pub uses: Vec<Use>,
    pub body: Vec<Stmt>,
    pub meta: NodeMeta,
}

/// `use Module qw(symbols);` or `no Module qw(symbols);`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Use {
    pub module: String,
    pub imports: Vec<String>,
    pub no: bool,
    /// `use Module ();`: load without importing anything.
    pub qualified: bool,
}

impl Use {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            imports: Vec::new(),
            no: false,
            qualified: false,
        }
    }

    pub fn qualified(module: &str) -> Self {
        Self {
            qualified: true,
            ..Self::new(module)
        }
    }

    pub fn with_imports(module: &str, imports: impl IntoIterator<Item = String>) -> Self {
        Self {
            module: module.to_string(),
            imports: imports.into_iter().collect(),
            no: false,
            qualified: false,
        }
    }

    pub fn no(module: &str, imports: &[&str]) -> Self {
        Self {
            module: module.to_string(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            no: true,
            qualified: false,
        }
    }
}

/// A class: `package Name { ... }` holding a constructor and methods.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub name: String,
    pub base: Option<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Sub>,
    /// Package variables and other class-level setup, run at load time.
    pub static_init: Vec<Stmt>,
    /// `package Name { }` (5.14+) rather than a bare block with `package Name;`.
    pub block_form: bool,
    pub meta: NodeMeta,
}

/// A declared instance or class field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Option<PerlType>,
    pub is_static: bool,
}

/// Named or anonymous subroutine.
#[derive(Debug, Clone, PartialEq)]
pub struct Sub {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Takes an invocant (`$self`, or `$class` when also static).
    pub is_method: bool,
    pub is_static: bool,
    pub return_type: Option<PerlType>,
    pub meta: NodeMeta,
}

impl Sub {
    pub fn new(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.to_string(),
            params,
            body,
            is_method: false,
            is_static: false,
            return_type: None,
            meta: NodeMeta::default(),
        }
    }

    /// Name of the invocant variable, if any.
    pub fn invocant(&self) -> Option<&'static str> {
        match (self.is_method, self.is_static) {
            (true, false) => Some("self"),
            (true, true) => Some("class"),
            _ => None,
        }
    }
}

/// A subroutine parameter, unpacked from `@_`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub shape: Shape,
    pub ty: Option<PerlType>,
    /// Applied with `//=` when the argument is undefined.
    pub default: Option<Expr>,
    /// Collects the remaining arguments (`@rest`).
    pub variadic: bool,
    /// Options-hash style parameter (a destructured object in the input).
    pub named: bool,
}

impl Param {
    pub fn scalar(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shape: Shape::Scalar,
            ty: None,
            default: None,
            variadic: false,
            named: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub meta: NodeMeta,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            meta: NodeMeta::default(),
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }

    /// `my <sigil>name = init;`
    pub fn my(name: &str, shape: Shape, init: Option<Expr>) -> Self {
        Self::new(StmtKind::VarDecl {
            targets: vec![VarTarget {
                name: name.to_string(),
                shape,
            }],
            init,
            scope: DeclScope::My,
        })
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return(value))
    }

    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Declared variable in a `my`/`our` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarTarget {
    pub name: String,
    pub shape: Shape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclScope {
    My,
    Our,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Last,
    Next,
    Redo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub var: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Bare block, optionally labeled.
    Block {
        label: Option<String>,
        body: Vec<Stmt>,
    },
    VarDecl {
        targets: Vec<VarTarget>,
        init: Option<Expr>,
        scope: DeclScope,
    },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        elsifs: Vec<(Expr, Vec<Stmt>)>,
        else_branch: Option<Vec<Stmt>>,
    },
    /// C-style `for (init; cond; step)`.
    For {
        label: Option<String>,
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Vec<Expr>,
        body: Vec<Stmt>,
    },
    /// `for my $var (LIST)`.
    Foreach {
        label: Option<String>,
        var: String,
        list: Expr,
        body: Vec<Stmt>,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Vec<Stmt>,
        /// Test after each iteration (input `do { } while`).
        post_test: bool,
    },
    LoopControl {
        kind: LoopControl,
        label: Option<String>,
    },
    Die(Expr),
    Try {
        body: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
        /// Use `feature 'try'` rather than `eval`.
        native: bool,
    },
    Package(Box<Package>),
    Sub(Box<Sub>),
    /// Verbatim Perl, one or more lines.
    Raw(String),
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Numeric source text (`42`, `0xFF`, `1.5`).
    Number(String),
    String(String),
    Bool(bool),
    Undef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Number,
    String,
    Bool,
    Undef,
}

impl Literal {
    pub fn kind(&self) -> LiteralKind {
        match self {
            Literal::Number(_) => LiteralKind::Number,
            Literal::String(_) => LiteralKind::String,
            Literal::Bool(_) => LiteralKind::Bool,
            Literal::Undef => LiteralKind::Undef,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(text) => f.write_str(text),
            Literal::String(s) => f.write_str(&quote_string(s)),
            Literal::Bool(true) => f.write_str("1"),
            Literal::Bool(false) => f.write_str("0"),
            Literal::Undef => f.write_str("undef"),
        }
    }
}

/// Quote `s` as a Perl string literal.
///
/// Printable ASCII gets single quotes, where only `\` and `'` need
/// escaping. Anything else gets double quotes with `$`, `@`, `"` and `\`
/// escaped and control or non-ASCII characters written as `\x{..}`.
pub fn quote_string(s: &str) -> String {
    if s.chars().all(|c| (' '..='~').contains(&c)) {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for c in s.chars() {
            if c == '\\' || c == '\'' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('\'');
        return out;
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' | '"' | '$' | '@' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ' '..='~' => out.push(c),
            _ => out.push_str(&format!("\\x{{{:x}}}", c as u32)),
        }
    }
    out.push('"');
    out
}

/// Sigil for a variable of `shape`.
pub fn sigil(shape: Shape) -> char {
    match shape {
        Shape::Scalar => '$',
        Shape::List => '@',
        Shape::Map => '%',
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Pow,
    Match,
    NotMatch,
    Mul,
    Div,
    Mod,
    Repeat,
    Add,
    Sub,
    Concat,
    Shl,
    Shr,
    NumLt,
    NumGt,
    NumLe,
    NumGe,
    StrLt,
    StrGt,
    StrLe,
    StrGe,
    NumEq,
    NumNe,
    NumCmp,
    StrEq,
    StrNe,
    StrCmp,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    DefinedOr,
    Range,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Pow => "**",
            BinaryOp::Match => "=~",
            BinaryOp::NotMatch => "!~",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Repeat => "x",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Concat => ".",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::NumLt => "<",
            BinaryOp::NumGt => ">",
            BinaryOp::NumLe => "<=",
            BinaryOp::NumGe => ">=",
            BinaryOp::StrLt => "lt",
            BinaryOp::StrGt => "gt",
            BinaryOp::StrLe => "le",
            BinaryOp::StrGe => "ge",
            BinaryOp::NumEq => "==",
            BinaryOp::NumNe => "!=",
            BinaryOp::NumCmp => "<=>",
            BinaryOp::StrEq => "eq",
            BinaryOp::StrNe => "ne",
            BinaryOp::StrCmp => "cmp",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::DefinedOr => "//",
            BinaryOp::Range => "..",
        }
    }

    /// Binding strength, from perlop (higher binds tighter).
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Pow => 16,
            BinaryOp::Match | BinaryOp::NotMatch => 14,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Repeat => 13,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Concat => 12,
            BinaryOp::Shl | BinaryOp::Shr => 11,
            BinaryOp::NumLt
            | BinaryOp::NumGt
            | BinaryOp::NumLe
            | BinaryOp::NumGe
            | BinaryOp::StrLt
            | BinaryOp::StrGt
            | BinaryOp::StrLe
            | BinaryOp::StrGe => 9,
            BinaryOp::NumEq
            | BinaryOp::NumNe
            | BinaryOp::NumCmp
            | BinaryOp::StrEq
            | BinaryOp::StrNe
            | BinaryOp::StrCmp => 8,
            BinaryOp::BitAnd => 7,
            BinaryOp::BitOr | BinaryOp::BitXor => 6,
            BinaryOp::And => 5,
            BinaryOp::Or | BinaryOp::DefinedOr => 4,
            BinaryOp::Range => 3,
        }
    }

    pub fn is_right_assoc(self) -> bool {
        self == BinaryOp::Pow
    }

    /// Comparison operators do not chain by associativity.
    pub fn is_non_assoc(self) -> bool {
        matches!(self.precedence(), 8 | 9 | 3 | 14)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    /// `\` reference constructor.
    Ref,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Ref => "\\",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        }
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }
}

/// Functions taking a block and a list: `OP { ... } LIST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockListOp {
    Map,
    Grep,
    Sort,
    /// `List::Util` functions, imported by name.
    First,
    Any,
    All,
}

impl BlockListOp {
    pub fn name(self) -> &'static str {
        match self {
            BlockListOp::Map => "map",
            BlockListOp::Grep => "grep",
            BlockListOp::Sort => "sort",
            BlockListOp::First => "first",
            BlockListOp::Any => "any",
            BlockListOp::All => "all",
        }
    }
}

/// What a call invokes.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// `name(...)`, including builtins and qualified names.
    Named(String),
    /// `$code->(...)`.
    Code(Box<Expr>),
    /// `$obj->name(...)`.
    Method { invocant: Box<Expr>, name: String },
    /// `Class->name(...)`.
    ClassMethod { class: String, name: String },
}

/// Source of a regex body.
#[derive(Debug, Clone, PartialEq)]
pub enum RegexSource {
    /// Regex syntax, used verbatim between braces.
    Pattern(String),
    /// A string matched literally: `\Q${\ EXPR}\E`.
    Quoted(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// `$name`, `@name` or `%name` depending on shape.
    Var { name: String, shape: Shape },
    /// `$name[i]` for a list variable, else `BASE->[i]`.
    Index { base: Box<Expr>, index: Box<Expr> },
    /// `$name{k}` for a map variable, else `BASE->{k}`.
    Key { base: Box<Expr>, key: Box<Expr> },
    /// `@{BASE}[INDICES]` (or `@name[...]`).
    Slice { list: Box<Expr>, indices: Box<Expr> },
    /// `$#{BASE}` (or `$#name`).
    LastIndex(Box<Expr>),
    /// `@{EXPR}`, `%{EXPR}` or `${EXPR}`.
    Deref { expr: Box<Expr>, shape: Shape },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        left_parens: bool,
        right_parens: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        parens: bool,
    },
    /// `TARGET = VALUE` or `TARGET op= VALUE`.
    Assign {
        target: Box<Expr>,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Call { callee: Callee, args: Vec<Expr> },
    /// `[ ... ]`
    ArrayRef(Vec<Expr>),
    /// `{ k => v, ... }`
    HashRef(Vec<(Expr, Expr)>),
    /// `( ... )`
    List(Vec<Expr>),
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    AnonSub(Box<Sub>),
    /// `Class->new(args)`
    New { class: String, args: Vec<Expr> },
    /// `bless(DATA, CLASS)`
    Bless { data: Box<Expr>, class: Box<Expr> },
    /// `do { ... }`: the value of the last statement.
    Do(Vec<Stmt>),
    /// `map { STMTS; RESULT } LIST` and friends.
    BlockList {
        op: BlockListOp,
        body: Vec<Stmt>,
        result: Box<Expr>,
        list: Box<Expr>,
    },
    /// `qr{...}flags`
    Regex { source: RegexSource, flags: String },
    /// `TARGET =~ s{PATTERN}{REPLACEMENT}flags` with `/e` and `/r`.
    Substitute {
        target: Box<Expr>,
        source: RegexSource,
        replacement: Box<Expr>,
        global: bool,
    },
    Paren(Box<Expr>),
    /// Verbatim Perl expression.
    Raw(String),
}

impl Expr {
    pub fn number(n: i64) -> Self {
        Expr::Literal(Literal::Number(n.to_string()))
    }

    pub fn string(s: &str) -> Self {
        Expr::Literal(Literal::String(s.to_string()))
    }

    pub fn undef() -> Self {
        Expr::Literal(Literal::Undef)
    }

    pub fn var(name: &str, shape: Shape) -> Self {
        Expr::Var {
            name: name.to_string(),
            shape,
        }
    }

    pub fn scalar(name: &str) -> Self {
        Self::var(name, Shape::Scalar)
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Callee::Named(name.to_string()),
            args,
        }
    }

    pub fn method(invocant: Expr, name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Callee::Method {
                invocant: Box::new(invocant),
                name: name.to_string(),
            },
            args,
        }
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Expr::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    pub fn key(base: Expr, key: Expr) -> Self {
        Expr::Key {
            base: Box::new(base),
            key: Box::new(key),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            op: None,
            value: Box::new(value),
        }
    }

    pub fn deref(expr: Expr, shape: Shape) -> Self {
        Expr::Deref {
            expr: Box::new(expr),
            shape,
        }
    }

    /// Binding strength of this expression as an operand; 100 for terms.
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { op, .. } if op.is_postfix() => 17,
            Expr::Unary { .. } => 15,
            Expr::Substitute { .. } => 14,
            Expr::Ternary { .. } => 2,
            Expr::Assign { .. } => 1,
            // List operators swallow everything to their right.
            Expr::List(_) | Expr::BlockList { .. } => 0,
            _ => 100,
        }
    }

    /// Whether this is a list-shaped variable (`@name`).
    pub fn is_list_var(&self) -> bool {
        matches!(self, Expr::Var { shape: Shape::List, .. })
    }

    pub fn is_map_var(&self) -> bool {
        matches!(self, Expr::Var { shape: Shape::Map, .. })
    }
}

/// Borrowed view of any node, for emitter dispatch.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Module(&'a Module),
    Package(&'a Package),
    Sub(&'a Sub),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
    Type(&'a PerlType),
    Comment(&'a Comment),
}

impl Node<'_> {
    /// Discriminant name.
    pub fn node_type(&self) -> &'static str {
        match self {
            Node::Module(_) => "Module",
            Node::Package(_) => "Package",
            Node::Sub(_) => "Sub",
            Node::Stmt(stmt) => stmt.kind.node_type(),
            Node::Expr(expr) => expr.node_type(),
            Node::Type(_) => "Type",
            Node::Comment(_) => "Comment",
        }
    }
}

impl StmtKind {
    pub fn node_type(&self) -> &'static str {
        match self {
            StmtKind::Block { .. } => "Block",
            StmtKind::VarDecl { .. } => "VarDecl",
            StmtKind::Expr(_) => "ExprStmt",
            StmtKind::Return(_) => "Return",
            StmtKind::If { .. } => "If",
            StmtKind::For { .. } => "For",
            StmtKind::Foreach { .. } => "Foreach",
            StmtKind::While { .. } => "While",
            StmtKind::LoopControl { .. } => "LoopControl",
            StmtKind::Die(_) => "Die",
            StmtKind::Try { .. } => "Try",
            StmtKind::Package(_) => "Package",
            StmtKind::Sub(_) => "Sub",
            StmtKind::Raw(_) => "RawStmt",
        }
    }
}

impl Expr {
    pub fn node_type(&self) -> &'static str {
        match self {
            Expr::Literal(_) => "Literal",
            Expr::Var { .. } => "Variable",
            Expr::Index { .. } => "Index",
            Expr::Key { .. } => "Key",
            Expr::Slice { .. } => "Slice",
            Expr::LastIndex(_) => "LastIndex",
            Expr::Deref { .. } => "Deref",
            Expr::Binary { .. } => "Binary",
            Expr::Unary { .. } => "Unary",
            Expr::Assign { .. } => "Assign",
            Expr::Call { .. } => "Call",
            Expr::ArrayRef(_) => "ArrayRef",
            Expr::HashRef(_) => "HashRef",
            Expr::List(_) => "List",
            Expr::Ternary { .. } => "Ternary",
            Expr::AnonSub(_) => "AnonSub",
            Expr::New { .. } => "New",
            Expr::Bless { .. } => "Bless",
            Expr::Do(_) => "Do",
            Expr::BlockList { .. } => "BlockList",
            Expr::Regex { .. } => "Regex",
            Expr::Substitute { .. } => "Substitute",
            Expr::Paren(_) => "Paren",
            Expr::Raw(_) => "RawExpr",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_ascii_single_quoted() {
        assert_eq!(quote_string("hello"), "'hello'");
        assert_eq!(quote_string("it's"), "'it\\'s'");
        assert_eq!(quote_string("a\\b"), "'a\\\\b'");
        assert_eq!(quote_string("$x @y"), "'$x @y'");
    }

    #[test]
    fn test_quote_control_chars_double_quoted() {
        assert_eq!(quote_string("a\nb"), "\"a\\nb\"");
        assert_eq!(quote_string("\t$x\""), "\"\\t\\$x\\\"\"");
        assert_eq!(quote_string("\u{0}"), "\"\\x{0}\"");
        assert_eq!(quote_string("é"), "\"\\x{e9}\"");
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Number("0xFF".into()).to_string(), "0xFF");
        assert_eq!(Literal::Bool(true).to_string(), "1");
        assert_eq!(Literal::Bool(false).to_string(), "0");
        assert_eq!(Literal::Undef.to_string(), "undef");
        assert_eq!(Literal::Undef.kind(), LiteralKind::Undef);
    }

    #[test]
    fn test_type_display() {
        let ty = PerlType::Maybe(Box::new(PerlType::ArrayRef(Box::new(PerlType::Int))));
        assert_eq!(ty.to_string(), "Maybe[ArrayRef[Int]]");
        assert_eq!(PerlType::InstanceOf("Foo".into()).to_string(), "InstanceOf['Foo']");
    }

    #[test]
    fn test_type_from_result_type() {
        assert_eq!(PerlType::from_result_type("uint32"), Some(PerlType::Int));
        assert_eq!(
            PerlType::from_result_type("uint8[]"),
            Some(PerlType::ArrayRef(Box::new(PerlType::Int)))
        );
        assert_eq!(PerlType::from_result_type("mystery"), None);
    }

    #[test]
    fn test_precedence_order() {
        assert!(BinaryOp::Pow.precedence() > BinaryOp::Mul.precedence());
        assert!(BinaryOp::Concat.precedence() == BinaryOp::Add.precedence());
        assert!(BinaryOp::Shr.precedence() > BinaryOp::NumEq.precedence());
        assert!(BinaryOp::BitAnd.precedence() > BinaryOp::BitOr.precedence());
        assert!(BinaryOp::And.precedence() > BinaryOp::Or.precedence());
    }
}
