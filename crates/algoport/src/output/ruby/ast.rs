//! Ruby target tree.
//!
//! Ruby has no sigils and no declarations, so variables carry the storage
//! they live in ([`VarKind`]) instead of a shape. Blocks (`do |x| ... end`)
//! hang off calls; loops other than `while` are calls with blocks.

use crate::input::SourceLocation;
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

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    pub block: bool,
}

/// RBS type syntax, used in `#:` annotation comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RubyType {
    Untyped,
    Integer,
    Float,
    Numeric,
    String,
    Bool,
    Array(Box<RubyType>),
    Hash(Box<RubyType>, Box<RubyType>),
    Proc,
    Instance(String),
    Optional(Box<RubyType>),
}

impl RubyType {
    /// Map an IL `resultType` string.
    pub fn from_result_type(name: &str) -> Option<Self> {
        if let Some(element) = name.strip_suffix("[]") {
            let inner = Self::from_result_type(element).unwrap_or(RubyType::Untyped);
            return Some(RubyType::Array(Box::new(inner)));
        }
        Some(match name {
            "string" => RubyType::String,
            "boolean" | "bool" => RubyType::Bool,
            "int" | "int8" | "int16" | "int32" | "uint8" | "uint16" | "uint32" | "byte" => {
                RubyType::Integer
            }
            "float" | "double" | "float32" | "float64" => RubyType::Float,
            "number" => RubyType::Numeric,
            "array" | "Uint8Array" | "Uint16Array" | "Uint32Array" | "Int32Array" => {
                RubyType::Array(Box::new(RubyType::Integer))
            }
            "object" => RubyType::Hash(Box::new(RubyType::String), Box::new(RubyType::Untyped)),
            "function" => RubyType::Proc,
            _ => return None,
        })
    }
}

impl fmt::Display for RubyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RubyType::Untyped => f.write_str("untyped"),
            RubyType::Integer => f.write_str("Integer"),
            RubyType::Float => f.write_str("Float"),
            RubyType::Numeric => f.write_str("Numeric"),
            RubyType::String => f.write_str("String"),
            RubyType::Bool => f.write_str("bool"),
            RubyType::Array(inner) => write!(f, "Array[{inner}]"),
            RubyType::Hash(key, value) => write!(f, "Hash[{key}, {value}]"),
            RubyType::Proc => f.write_str("Proc"),
            RubyType::Instance(class) => f.write_str(class),
            RubyType::Optional(inner) => write!(f, "{inner}?"),
        }
    }
}

/// A file: magic comments, requires and top-level statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Wraps the body in `module Name ... end`.
    pub name: Option<String>,
    /// `# key: value` lines at the very top.
    pub magic_comments: Vec<String>,
    pub requires: Vec<Require>,
    pub body: Vec<Stmt>,
    pub meta: NodeMeta,
}

/// `require 'path'` or `require_relative 'path'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub path: String,
    pub relative: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    pub base: Option<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// Class-body statements run when the class is defined.
    pub static_init: Vec<Stmt>,
    pub meta: NodeMeta,
}

/// An attribute exposed through `attr_accessor`. Static fields are class
/// instance variables with accessors on the singleton class.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Option<RubyType>,
    pub is_static: bool,
}

/// `def name(params) ... end`, or `def self.name` when static.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub is_static: bool,
    pub return_type: Option<RubyType>,
    /// Written as `def name(params) = expr` when the body allows.
    pub endless: bool,
    pub meta: NodeMeta,
}

impl Method {
    pub fn new(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.to_string(),
            params,
            body,
            is_static: false,
            return_type: None,
            endless: false,
            meta: NodeMeta::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<RubyType>,
    pub default: Option<Expr>,
    /// `*rest`
    pub variadic: bool,
}

impl Param {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: None,
            default: None,
            variadic: false,
        }
    }
}

/// Block attached to a call, or the body of a lambda.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub params: Vec<Param>,
    /// Block-local variables (`|x; tmp|`).
    pub locals: Vec<String>,
    pub body: Vec<Stmt>,
}

impl Block {
    pub fn new(params: &[&str], body: Vec<Stmt>) -> Self {
        Self {
            params: params.iter().map(|p| Param::new(p)).collect(),
            locals: Vec::new(),
            body,
        }
    }

    /// A block whose whole body is one expression.
    pub fn single(params: &[&str], expr: Expr) -> Self {
        Self::new(params, vec![Stmt::expr(expr)])
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

    /// `target = value`
    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::expr(Expr::assign(target, value))
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return(value))
    }

    pub fn control(kind: LoopControl) -> Self {
        Self::new(StmtKind::LoopControl { kind, value: None })
    }

    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = meta;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Break,
    Next,
    Redo,
}

impl LoopControl {
    pub fn keyword(self) -> &'static str {
        match self {
            LoopControl::Break => "break",
            LoopControl::Next => "next",
            LoopControl::Redo => "redo",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RescueClause {
    /// `rescue => var`; a bare `rescue` when absent.
    pub var: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        elsifs: Vec<(Expr, Vec<Stmt>)>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        /// `begin ... end while cond`
        post_test: bool,
    },
    /// `break`, `next` or `redo`, with an optional block result.
    LoopControl {
        kind: LoopControl,
        value: Option<Expr>,
    },
    /// `catch(:tag) do ... end`
    Catch { tag: String, body: Vec<Stmt> },
    /// `throw :tag`
    Throw { tag: String },
    /// `raise`, `raise message` or `raise Class, message`.
    Raise {
        class: Option<String>,
        message: Option<Expr>,
    },
    /// `begin ... rescue ... ensure ... end`
    Begin {
        body: Vec<Stmt>,
        rescue: Option<RescueClause>,
        ensure: Option<Vec<Stmt>>,
    },
    Class(Box<Class>),
    Method(Box<Method>),
    /// Verbatim Ruby, one or more lines.
    Raw(String),
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Numeric source text (`42`, `0xFF`, `1.5`).
    Number(String),
    String(String),
    Symbol(String),
    Bool(bool),
    Nil,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(text) => f.write_str(text),
            Literal::String(s) => f.write_str(&quote_string(s)),
            Literal::Symbol(s) if is_identifier(s) => write!(f, ":{s}"),
            Literal::Symbol(s) => write!(f, ":{}", double_quoted(s)),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Nil => f.write_str("nil"),
        }
    }
}

/// Quote `s` as a Ruby string literal: single quotes for printable ASCII,
/// double quotes with escapes otherwise.
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
    double_quoted(s)
}

fn double_quoted(s: &str) -> String {
    format!("\"{}\"", escape_double_quoted(s))
}

/// Escape text for the inside of a double-quoted string. `#` is escaped so
/// that `#{`, `#@` and `#$` never interpolate.
pub fn escape_double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '"' | '#' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{1b}' => out.push_str("\\e"),
            ' '..='~' => out.push(c),
            _ => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
        }
    }
    out
}

/// A plain Ruby identifier (method, local or symbol name).
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Where a variable lives; decides its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Local,
    /// `@name`
    Instance,
    /// `$name`
    Global,
    /// `Name`, written as given.
    Constant,
}

impl VarKind {
    pub fn prefix(self) -> &'static str {
        match self {
            VarKind::Local | VarKind::Constant => "",
            VarKind::Instance => "@",
            VarKind::Global => "$",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Cmp,
    Match,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Pow => "**",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Cmp => "<=>",
            BinaryOp::Match => "=~",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength, from the Ruby operator table (higher binds tighter).
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Pow => 17,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 15,
            BinaryOp::Add | BinaryOp::Sub => 14,
            BinaryOp::Shl | BinaryOp::Shr => 13,
            BinaryOp::BitAnd => 12,
            BinaryOp::BitOr | BinaryOp::BitXor => 11,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 10,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Cmp | BinaryOp::Match => 9,
            BinaryOp::And => 8,
            BinaryOp::Or => 7,
        }
    }

    pub fn is_right_assoc(self) -> bool {
        self == BinaryOp::Pow
    }

    /// Comparisons do not chain.
    pub fn is_non_assoc(self) -> bool {
        matches!(self.precedence(), 9 | 10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            UnaryOp::Not | UnaryOp::BitNot => 18,
            UnaryOp::Neg => 16,
        }
    }
}

/// Piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var { name: String, kind: VarKind },
    /// `self`
    SelfRef,
    /// `BASE[INDEX]`, for arrays, hashes and strings alike.
    Index { base: Box<Expr>, index: Box<Expr> },
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
    /// `a, b = VALUE`
    MultiAssign { targets: Vec<Expr>, value: Box<Expr> },
    /// `RECEIVER.name(args) { block }`. Without receiver, arguments or
    /// block it reads as an attribute (`obj.name`).
    Call {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        block: Option<Box<Block>>,
    },
    /// `super(args)`
    Super(Vec<Expr>),
    /// `[a, b]`
    Array(Vec<Expr>),
    /// `{ k => v }`
    Hash(Vec<(Expr, Expr)>),
    /// `*expr`
    Splat(Box<Expr>),
    /// `&expr` in an argument list.
    BlockPass(Box<Expr>),
    /// `START..END` or `START...END`; open-ended without `end`.
    Range {
        start: Box<Expr>,
        end: Option<Box<Expr>>,
        exclusive: bool,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `lambda do |params| ... end`
    Lambda(Box<Block>),
    /// `Class.new(args)`
    New { class: String, args: Vec<Expr> },
    /// `begin ... end`: the value of the last statement.
    Begin(Vec<Stmt>),
    /// `"text#{expr}"`
    Interp(Vec<InterpPart>),
    /// `/pattern/flags`
    Regex { pattern: String, flags: String },
    Paren(Box<Expr>),
    /// Verbatim Ruby expression.
    Raw(String),
}

impl Expr {
    pub fn number(n: i64) -> Self {
        Expr::Literal(Literal::Number(n.to_string()))
    }

    pub fn string(s: &str) -> Self {
        Expr::Literal(Literal::String(s.to_string()))
    }

    pub fn symbol(s: &str) -> Self {
        Expr::Literal(Literal::Symbol(s.to_string()))
    }

    pub fn nil() -> Self {
        Expr::Literal(Literal::Nil)
    }

    pub fn local(name: &str) -> Self {
        Expr::Var {
            name: name.to_string(),
            kind: VarKind::Local,
        }
    }

    pub fn ivar(name: &str) -> Self {
        Expr::Var {
            name: name.to_string(),
            kind: VarKind::Instance,
        }
    }

    pub fn constant(name: &str) -> Self {
        Expr::Var {
            name: name.to_string(),
            kind: VarKind::Constant,
        }
    }

    /// Receiverless call: `name(args)`.
    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: None,
            name: name.to_string(),
            args,
            block: None,
        }
    }

    /// `receiver.name(args)`
    pub fn method(receiver: Expr, name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: Some(Box::new(receiver)),
            name: name.to_string(),
            args,
            block: None,
        }
    }

    /// `receiver.name(args) { block }`
    pub fn with_block(receiver: Expr, name: &str, args: Vec<Expr>, block: Block) -> Self {
        Expr::Call {
            receiver: Some(Box::new(receiver)),
            name: name.to_string(),
            args,
            block: Some(Box::new(block)),
        }
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Expr::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            op: None,
            value: Box::new(value),
        }
    }

    pub fn compound(target: Expr, op: BinaryOp, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            op: Some(op),
            value: Box::new(value),
        }
    }

    pub fn range(start: Expr, end: Option<Expr>, exclusive: bool) -> Self {
        Expr::Range {
            start: Box::new(start),
            end: end.map(Box::new),
            exclusive,
        }
    }

    /// Binding strength of this expression as an operand; 100 for terms.
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { op, .. } => op.precedence(),
            // `-1.abs` is `(-1).abs`, and `-2 ** 2` is `-(2 ** 2)`.
            Expr::Literal(Literal::Number(text)) if text.starts_with('-') => 16,
            Expr::Range { .. } => 6,
            Expr::Ternary { .. } => 5,
            Expr::Assign { .. } | Expr::MultiAssign { .. } => 3,
            _ => 100,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Expr::Literal(Literal::Nil))
    }

    /// A local, instance, global or constant variable.
    pub fn is_var(&self) -> bool {
        matches!(self, Expr::Var { .. })
    }
}

/// Borrowed view of any node, for emitter dispatch.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Module(&'a Module),
    Class(&'a Class),
    Method(&'a Method),
    Block(&'a Block),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
    Type(&'a RubyType),
    Comment(&'a Comment),
}

impl Node<'_> {
    pub fn node_type(&self) -> &'static str {
        match self {
            Node::Module(_) => "Module",
            Node::Class(_) => "Class",
            Node::Method(_) => "Method",
            Node::Block(_) => "Block",
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
            StmtKind::Expr(_) => "ExprStmt",
            StmtKind::Return(_) => "Return",
            StmtKind::If { .. } => "If",
            StmtKind::While { .. } => "While",
            StmtKind::LoopControl { .. } => "LoopControl",
            StmtKind::Catch { .. } => "Catch",
            StmtKind::Throw { .. } => "Throw",
            StmtKind::Raise { .. } => "Raise",
            StmtKind::Begin { .. } => "Begin",
            StmtKind::Class(_) => "Class",
            StmtKind::Method(_) => "Method",
            StmtKind::Raw(_) => "RawStmt",
        }
    }
}

impl Expr {
    pub fn node_type(&self) -> &'static str {
        match self {
            Expr::Literal(_) => "Literal",
            Expr::Var { .. } => "Variable",
            Expr::SelfRef => "Self",
            Expr::Index { .. } => "Index",
            Expr::Binary { .. } => "Binary",
            Expr::Unary { .. } => "Unary",
            Expr::Assign { .. } => "Assign",
            Expr::MultiAssign { .. } => "MultiAssign",
            Expr::Call { .. } => "Call",
            Expr::Super(_) => "Super",
            Expr::Array(_) => "Array",
            Expr::Hash(_) => "Hash",
            Expr::Splat(_) => "Splat",
            Expr::BlockPass(_) => "BlockPass",
            Expr::Range { .. } => "Range",
            Expr::Ternary { .. } => "Ternary",
            Expr::Lambda(_) => "Lambda",
            Expr::New { .. } => "New",
            Expr::Begin(_) => "BeginExpr",
            Expr::Interp(_) => "Interp",
            Expr::Regex { .. } => "Regex",
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
        assert_eq!(quote_string("#{x}"), "'#{x}'");
    }

    #[test]
    fn test_quote_escapes_interpolation_in_double_quotes() {
        assert_eq!(quote_string("a\n#{b}"), "\"a\\n\\#{b}\"");
        assert_eq!(quote_string("é"), "\"\\u{e9}\"");
        assert_eq!(quote_string("\u{1b}"), "\"\\e\"");
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Nil.to_string(), "nil");
        assert_eq!(Literal::Bool(false).to_string(), "false");
        assert_eq!(Literal::Symbol("count".into()).to_string(), ":count");
        assert_eq!(Literal::Symbol("a-b".into()).to_string(), ":\"a-b\"");
    }

    #[test]
    fn test_type_display() {
        let ty = RubyType::Optional(Box::new(RubyType::Array(Box::new(RubyType::Integer))));
        assert_eq!(ty.to_string(), "Array[Integer]?");
        assert_eq!(
            RubyType::from_result_type("object").map(|t| t.to_string()),
            Some("Hash[String, untyped]".to_string())
        );
        assert_eq!(RubyType::from_result_type("boolean"), Some(RubyType::Bool));
        assert_eq!(RubyType::from_result_type("mystery"), None);
    }

    #[test]
    fn test_precedence_order() {
        assert!(BinaryOp::Pow.precedence() > UnaryOp::Neg.precedence());
        assert!(UnaryOp::Not.precedence() > BinaryOp::Pow.precedence());
        assert!(BinaryOp::BitAnd.precedence() > BinaryOp::Eq.precedence());
        assert!(BinaryOp::And.precedence() > BinaryOp::Or.precedence());
        assert_eq!(Expr::Literal(Literal::Number("-1".into())).precedence(), 16);
    }
}
