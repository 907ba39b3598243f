//! Library idioms.
//!
//! `Math`, `JSON`, `Object`, `console`, array, string and `Map`/`Set`
//! methods, typed arrays, the `OpCodes` helpers, and the IL operation nodes
//! that name the same operations. Almost everything has a core Ruby
//! counterpart; callbacks become blocks.

use super::ast::*;
use super::transform::{
    Collection, Frame, RubyTransformer, binary, concat, epoch_millis, error_class, hex, int32,
    interpolation, is_function, mask32, regex_literal, ruby_local, ternary, unary, with_setup,
};
use crate::input::JsNode;
use crate::lower::{Callback, CallbackBody, Rotation, Shape, is_string_like, rotation_width};
use serde_json::Value;

/// Array methods that take a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Iteration {
    Map,
    Filter,
    ForEach,
    Some,
    Every,
    Find,
    FindIndex,
    Reduce,
}

impl Iteration {
    fn from_method(name: &str) -> Option<Self> {
        Some(match name {
            "map" => Iteration::Map,
            "filter" => Iteration::Filter,
            "forEach" => Iteration::ForEach,
            "some" => Iteration::Some,
            "every" => Iteration::Every,
            "find" => Iteration::Find,
            "findIndex" => Iteration::FindIndex,
            "reduce" => Iteration::Reduce,
            _ => return None,
        })
    }

    fn from_il(kind: &str) -> Option<Self> {
        Some(match kind {
            "ArrayMap" => Iteration::Map,
            "ArrayFilter" => Iteration::Filter,
            "ArrayForEach" => Iteration::ForEach,
            "ArraySome" => Iteration::Some,
            "ArrayEvery" => Iteration::Every,
            "ArrayFind" => Iteration::Find,
            "ArrayFindIndex" => Iteration::FindIndex,
            "ArrayReduce" => Iteration::Reduce,
            _ => return None,
        })
    }

    /// Enumerable method with the same meaning, and whether an index is
    /// added through `.with_index` (otherwise through `each_with_index`).
    fn method(self) -> (&'static str, bool) {
        match self {
            Iteration::Map => ("map", true),
            Iteration::Filter => ("select", true),
            Iteration::ForEach => ("each", true),
            Iteration::Some => ("any?", false),
            Iteration::Every => ("all?", false),
            Iteration::Find => ("find", true),
            Iteration::FindIndex => ("find_index", false),
            Iteration::Reduce => ("reduce", false),
        }
    }
}

const TYPED_ARRAYS: &[&str] = &[
    "Uint8Array",
    "Uint8ClampedArray",
    "Uint16Array",
    "Uint32Array",
    "Int8Array",
    "Int16Array",
    "Int32Array",
    "Float32Array",
    "Float64Array",
];

/// Methods only strings have.
const STRING_ONLY_METHODS: &[&str] = &[
    "charAt",
    "charCodeAt",
    "codePointAt",
    "substring",
    "substr",
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "repeat",
    "padStart",
    "padEnd",
    "startsWith",
    "endsWith",
    "split",
    "replace",
    "replaceAll",
    "localeCompare",
];

/// String methods with a Ruby rendering.
const STRING_METHODS: &[&str] = &[
    "charAt",
    "at",
    "charCodeAt",
    "codePointAt",
    "substring",
    "slice",
    "substr",
    "indexOf",
    "lastIndexOf",
    "includes",
    "startsWith",
    "endsWith",
    "toUpperCase",
    "toLocaleUpperCase",
    "toLowerCase",
    "toLocaleLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "repeat",
    "padStart",
    "padEnd",
    "split",
    "replace",
    "replaceAll",
    "concat",
    "localeCompare",
    "search",
    "toString",
    "valueOf",
];

impl RubyTransformer {
    // ---------------------------------------------------------------------
    // IL nodes
    // ---------------------------------------------------------------------

    /// IL operation in statement position. Only the ones whose statement
    /// form differs from the value form are handled here.
    pub(super) fn il_stmt(&mut self, node: JsNode<'_>) -> Option<Vec<Stmt>> {
        let kind = node.str_field("ilNodeType")?;
        match kind {
            "ArrayForEach" => {
                let array = node.child("array")?;
                let callback = node.child("callback")?;
                Some(self.foreach_stmt(array, callback))
            }
            "ParentConstructorCall" => {
                let args = self.args(&node.children("arguments"));
                Some(self.super_constructor(args))
            }
            _ => None,
        }
    }

    /// IL operation as a value. `None` for kinds handled elsewhere (or
    /// missing fields), so the plain ESTree form is used instead.
    pub(super) fn il_expr(&mut self, node: JsNode<'_>) -> Option<Expr> {
        let kind = node.str_field("ilNodeType")?;
        if let Some(op) = Iteration::from_il(kind) {
            let array = node.child("array")?;
            let callback = node.child("callback")?;
            return Some(self.iterate(op, array, callback, node.child("initialValue")));
        }
        let expr = match kind {
            "ArrayJoin" => {
                let list = self.value(node.child("array")?);
                self.join(list, node.child("separator"))
            }
            "ArraySlice" => {
                let list = self.value(node.child("array")?);
                self.slice(list, node.child("start"), node.child("end"))
            }
            "ArrayPush" | "ArrayUnshift" => {
                let name = if kind == "ArrayPush" { "push" } else { "unshift" };
                let list = self.value(node.child("array")?);
                let args = self.args(&node.children("elements"));
                Expr::method(list, name, args)
            }
            "ArrayPop" | "ArrayShift" | "ArrayClear" => {
                let name = match kind {
                    "ArrayPop" => "pop",
                    "ArrayShift" => "shift",
                    _ => "clear",
                };
                let list = self.value(node.child("array")?);
                Expr::method(list, name, Vec::new())
            }
            "ArrayReverse" => {
                let list = self.value(node.child("array")?);
                Expr::method(list, "reverse!", Vec::new())
            }
            "ArrayLength" | "StringLength" => {
                let field = if kind == "ArrayLength" { "array" } else { "string" };
                let value = self.value(node.child(field)?);
                Expr::method(value, "length", Vec::new())
            }
            "ArrayConcat" => self.array_concat(node.child("array")?, &node.children("arrays")),
            "ArrayIndexOf" => {
                let list = self.value(node.child("array")?);
                let value = self.value(node.child("value")?);
                index_of(list, "index", vec![value])
            }
            "ArrayIncludes" => {
                let list = self.value(node.child("array")?);
                let value = self.value(node.child("value")?);
                Expr::method(list, "include?", vec![value])
            }
            "ArrayFill" => {
                let array = node.child("array")?;
                let value = node.child("value")?;
                self.fill(array, value, node.child("start"), node.child("end"))
            }
            "ArraySort" => self.sort(node.child("array")?, node.child("compareFn")),
            "ArrayCreation" => match node.child("size") {
                Some(size) => {
                    let size = self.value(size);
                    Expr::method(Expr::constant("Array"), "new", vec![size])
                }
                None => Expr::Array(self.args(&node.children("elements"))),
            },
            "TypedArrayCreation" => match (node.child("source"), node.child("size")) {
                (Some(source), _) => {
                    let source = self.value(source);
                    Expr::method(source, "dup", Vec::new())
                }
                (None, Some(size)) => self.sized_or_copied(size),
                (None, None) => Expr::Array(Vec::new()),
            },
            "StringReplace" => {
                let string = self.value(node.child("string")?);
                self.string_replace(
                    string,
                    node.child("pattern")?,
                    node.child("replacement")?,
                    node.bool_field("all"),
                )
            }
            "StringSplit" => {
                let string = self.value(node.child("string")?);
                self.string_split(string, node.child("separator"))
            }
            "StringSubstring" => {
                let string = self.value(node.child("string")?);
                self.slice(string, node.child("start"), node.child("end"))
            }
            "StringCharAt" | "StringCharCodeAt" => {
                let string = self.value(node.child("string")?);
                let index = self.value(node.child("index")?);
                let ch = Expr::index(string, index);
                if kind == "StringCharAt" {
                    ch
                } else {
                    Expr::method(ch, "ord", Vec::new())
                }
            }
            "StringIndexOf" => {
                let string = self.value(node.child("string")?);
                let search = self.value(node.child("search")?);
                index_of(string, "index", vec![search])
            }
            "StringToUpperCase" | "StringToLowerCase" | "StringTrim" => {
                let name = match kind {
                    "StringToUpperCase" => "upcase",
                    "StringToLowerCase" => "downcase",
                    _ => "strip",
                };
                let string = self.value(node.child("string")?);
                Expr::method(string, name, Vec::new())
            }
            "StringRepeat" => {
                let string = self.value(node.child("string")?);
                let count = self.value(node.child("count")?);
                binary(BinaryOp::Mul, string, count)
            }
            "StringFromCharCode" => self.from_char_code(&node.children("arguments")),
            "RotateLeft" | "RotateRight" => {
                let value = self.value(node.child("value")?);
                let amount = self.value(node.child("amount")?);
                let width = node.number_field("bits").unwrap_or(32.0);
                let left = kind == "RotateLeft";
                let Some(rotation) =
                    rotation_width(width).and_then(|bits| Rotation::new(bits, left))
                else {
                    tracing::debug!(width, "rotation width out of range");
                    self.drops.unsupported(node);
                    return Some(Expr::nil());
                };
                self.rotate(value, amount, rotation)
            }
            "PackBytes" => {
                let bytes = self.args(&node.children("arguments"));
                let big_endian = node.str_field("endian") != Some("little");
                pack_bytes(bytes, big_endian)
            }
            "UnpackBytes" => {
                let value = self.value(node.child("value")?);
                let bits = node.number_field("bits").unwrap_or(32.0) as u32;
                let big_endian = node.str_field("endian") != Some("little");
                self.unpack_bytes(value, bits, big_endian)
            }
            "Cast" => {
                let value = self.value(node.child("expression")?);
                cast(value, node.str_field("targetType").unwrap_or("int"))
            }
            "ThisPropertyAccess" => {
                let name = self.this_member(node)?;
                self.this_property(name)
            }
            "ThisMethodCall" => {
                let method = il_name(node, "method")?;
                let args = self.args(&node.children("arguments"));
                self.this_call(method, args)
            }
            "ParentConstructorCall" => Expr::Super(self.args(&node.children("arguments"))),
            "ParentMethodCall" => {
                let method = il_name(node, "method")?;
                let args = self.args(&node.children("arguments"));
                self.super_call(method, args)
            }
            "MathCall" => {
                let method = il_name(node, "method")?;
                return self.math_call(method, &node.children("arguments"));
            }
            "Floor" | "Ceil" | "Abs" | "Sqrt" | "Round" | "Trunc" => {
                let argument = node.child("argument")?;
                let method = kind.to_ascii_lowercase();
                return self.math_call(&method, &[argument]);
            }
            "Min" | "Max" => {
                let method = if kind == "Min" { "min" } else { "max" };
                return self.math_call(method, &node.children("arguments"));
            }
            "Power" => {
                let base = self.value(node.child("base")?);
                let exponent = self.value(node.child("exponent")?);
                binary(BinaryOp::Pow, base, exponent)
            }
            "JsonStringify" | "JsonParse" => {
                let value = self.value_of(node.child("value"));
                let method = if kind == "JsonParse" { "parse" } else { "generate" };
                self.json(method, value)
            }
            "ObjectKeys" | "ObjectValues" | "ObjectEntries" => {
                let method = match kind {
                    "ObjectKeys" => "keys",
                    "ObjectValues" => "values",
                    _ => "entries",
                };
                return self.object_call(method, &[node.child("object")?]);
            }
            "ObjectFreeze" => self.value(node.child("object")?),
            "IsArray" => is_array(self.value(node.child("value")?)),
            "ErrorCreation" => {
                let class = error_class(node.str_field("errorType").unwrap_or("Error"));
                let args = node.child("message").map(|m| self.value(m)).into_iter().collect();
                Expr::New {
                    class: class.to_string(),
                    args,
                }
            }
            "DebugOutput" => {
                let method = node.str_field("method").unwrap_or("log");
                return self.console_call(method, &node.children("arguments"));
            }
            "HexEncode" => bytes_to_hex(self.value(node.child("bytes")?)),
            "HexDecode" => hex_to_bytes(self.value(node.child("string")?)),
            "StringToBytes" => Expr::method(self.value(node.child("string")?), "bytes", Vec::new()),
            "BytesToString" => bytes_to_string(self.value(node.child("bytes")?)),
            _ => return None,
        };
        Some(expr)
    }

    fn value_of(&mut self, node: Option<JsNode<'_>>) -> Expr {
        node.map(|n| self.value(n)).unwrap_or_else(Expr::nil)
    }

    // ---------------------------------------------------------------------
    // Global objects and functions
    // ---------------------------------------------------------------------

    /// `Math.PI`, `Number.MAX_SAFE_INTEGER` and friends.
    pub(super) fn static_member(&mut self, object: &str, name: &str) -> Option<Expr> {
        let math = |method: &str, arg: Expr| Expr::method(Expr::constant("Math"), method, vec![arg]);
        let half = || Expr::Literal(Literal::Number("0.5".to_string()));
        let expr = match (object, name) {
            ("Math", "PI") => Expr::Raw("Math::PI".to_string()),
            ("Math", "E") => Expr::Raw("Math::E".to_string()),
            ("Math", "LN2") => math("log", Expr::number(2)),
            ("Math", "LN10") => math("log", Expr::number(10)),
            ("Math", "LOG2E") => math("log2", Expr::Raw("Math::E".to_string())),
            ("Math", "LOG10E") => math("log10", Expr::Raw("Math::E".to_string())),
            ("Math", "SQRT2") => math("sqrt", Expr::number(2)),
            ("Math", "SQRT1_2") => math("sqrt", half()),
            ("Number", "MAX_SAFE_INTEGER") => Expr::number(9_007_199_254_740_991),
            ("Number", "MIN_SAFE_INTEGER") => Expr::number(-9_007_199_254_740_991),
            ("Number", "EPSILON") => Expr::Raw("Float::EPSILON".to_string()),
            ("Number", "MAX_VALUE") => Expr::Raw("Float::MAX".to_string()),
            ("Number", "MIN_VALUE") => Expr::Literal(Literal::Number("5e-324".to_string())),
            ("Number", "POSITIVE_INFINITY") => Expr::Raw("Float::INFINITY".to_string()),
            ("Number", "NEGATIVE_INFINITY") => {
                unary(UnaryOp::Neg, Expr::Raw("Float::INFINITY".to_string()))
            }
            ("Number", "NaN") => Expr::Raw("Float::NAN".to_string()),
            _ => return None,
        };
        Some(expr)
    }

    /// `Object.method(...)` on one of the global namespaces.
    pub(super) fn static_call(
        &mut self,
        object: &str,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Expr> {
        match object {
            "Math" => self.math_call(method, args),
            "JSON" => {
                let value = self.value_of(args.first().copied());
                match method {
                    "stringify" if args.len() > 2 => Some(self.json("pretty_generate", value)),
                    "stringify" => Some(self.json("generate", value)),
                    "parse" => Some(self.json("parse", value)),
                    _ => None,
                }
            }
            "Object" => self.object_call(method, args),
            "Array" => match method {
                "isArray" => Some(is_array(self.value_of(args.first().copied()))),
                "from" => {
                    let source = args.first()?;
                    match args.get(1) {
                        Some(mapper) => match length_only(*source) {
                            Some(length) => Some(self.generate(length, *mapper)),
                            None => Some(self.iterate(Iteration::Map, *source, *mapper, None)),
                        },
                        None => match length_only(*source) {
                            Some(length) => {
                                let length = self.value(length);
                                Some(Expr::method(Expr::constant("Array"), "new", vec![length]))
                            }
                            None => {
                                let stringy = self.is_stringy(*source);
                                let list = self.value(*source);
                                let method = if stringy { "chars" } else { "to_a" };
                                Some(Expr::method(list, method, Vec::new()))
                            }
                        },
                    }
                }
                "of" => Some(Expr::Array(self.args(args))),
                _ => None,
            },
            "String" => match method {
                "fromCharCode" | "fromCodePoint" => Some(self.from_char_code(args)),
                _ => None,
            },
            "Number" => match method {
                "isInteger" | "isSafeInteger" => {
                    let value = self.value_of(args.first().copied());
                    Some(Expr::method(
                        binary(BinaryOp::Mod, value, Expr::number(1)),
                        "zero?",
                        Vec::new(),
                    ))
                }
                "isNaN" | "parseInt" | "parseFloat" | "isFinite" => {
                    self.global_call(method, args)
                }
                _ => None,
            },
            "console" => self.console_call(method, args),
            "Date" if method == "now" => Some(epoch_millis()),
            "OpCodes" => Some(self.opcodes_call(method, args)),
            _ => None,
        }
    }

    /// Global functions (`parseInt`, `String`, ...).
    pub(super) fn global_call(&mut self, name: &str, args: &[JsNode<'_>]) -> Option<Expr> {
        let first = args.first().copied();
        let expr = match name {
            "parseInt" => {
                let value = self.value_of(first);
                let radix = args.get(1).map(|r| self.value(*r));
                Expr::method(value, "to_i", radix.into_iter().collect())
            }
            "parseFloat" => Expr::method(self.value_of(first), "to_f", Vec::new()),
            "Number" => {
                if first.is_some_and(|f| self.is_numeric(f)) {
                    self.value_of(first)
                } else {
                    Expr::method(self.value_of(first), "to_f", Vec::new())
                }
            }
            "String" => Expr::method(self.value_of(first), "to_s", Vec::new()),
            "Boolean" => {
                let cond = match first {
                    Some(value) => self.test(value),
                    None => Expr::Literal(Literal::Bool(false)),
                };
                ternary(
                    cond,
                    Expr::Literal(Literal::Bool(true)),
                    Expr::Literal(Literal::Bool(false)),
                )
            }
            "isNaN" | "isFinite" => {
                let value = Expr::method(self.value_of(first), "to_f", Vec::new());
                let method = if name == "isNaN" { "nan?" } else { "finite?" };
                Expr::method(value, method, Vec::new())
            }
            "Array" => return self.builtin_constructor("Array", args),
            _ => return None,
        };
        Some(expr)
    }

    /// `new X(...)` for built-in constructors.
    pub(super) fn builtin_constructor(&mut self, name: &str, args: &[JsNode<'_>]) -> Option<Expr> {
        let expr = match name {
            "Array" => match args {
                [] => Expr::Array(Vec::new()),
                [size] if size.js_type() != "ArrayExpression" && !is_string_like(*size) => {
                    let size = self.value(*size);
                    Expr::method(Expr::constant("Array"), "new", vec![size])
                }
                _ => Expr::Array(self.args(args)),
            },
            _ if TYPED_ARRAYS.contains(&name) => match args.first() {
                Some(arg) => self.sized_or_copied(*arg),
                None => Expr::Array(Vec::new()),
            },
            "Map" | "WeakMap" => match args.first() {
                Some(entries) => Expr::method(self.value(*entries), "to_h", Vec::new()),
                None => Expr::Hash(Vec::new()),
            },
            "Set" | "WeakSet" => {
                self.imports.require("set");
                Expr::New {
                    class: "Set".to_string(),
                    args: self.args(args),
                }
            }
            "Object" => Expr::Hash(Vec::new()),
            "Date" => {
                if !args.is_empty() {
                    self.drops
                        .lossy("arguments of new Date() are dropped; the current time is used".to_string());
                }
                Expr::method(Expr::constant("Time"), "now", Vec::new())
            }
            "RegExp" => {
                let flags = args.get(1).and_then(|a| a.string_value()).unwrap_or("");
                match args.first()?.string_value() {
                    Some(pattern) => regex_literal(pattern, flags),
                    None => {
                        let source = self.value(*args.first()?);
                        Expr::method(Expr::constant("Regexp"), "new", vec![source])
                    }
                }
            }
            "String" | "Number" | "Boolean" => return self.global_call(name, args),
            _ => return None,
        };
        Some(expr)
    }

    pub(super) fn math_call(&mut self, method: &str, args: &[JsNode<'_>]) -> Option<Expr> {
        let mut values = self.args(args);
        let first = values.first().cloned().unwrap_or_else(Expr::nil);
        let expr = match method {
            "floor" | "ceil" | "abs" => Expr::method(first, method, Vec::new()),
            // Halves round up, as in JavaScript, not away from zero.
            "round" => Expr::method(
                binary(
                    BinaryOp::Add,
                    first,
                    Expr::Literal(Literal::Number("0.5".to_string())),
                ),
                "floor",
                Vec::new(),
            ),
            "trunc" => Expr::method(first, "truncate", Vec::new()),
            "fround" => Expr::method(first, "to_f", Vec::new()),
            "pow" => {
                let exponent = values.get(1).cloned().unwrap_or_else(|| Expr::number(1));
                binary(BinaryOp::Pow, first, exponent)
            }
            "min" | "max" => Expr::method(Expr::Array(values), method, Vec::new()),
            "random" => Expr::call("rand", Vec::new()),
            "sign" => binary(BinaryOp::Cmp, first, Expr::number(0)),
            "imul" => {
                let second = values.pop().unwrap_or_else(|| Expr::number(0));
                cast(binary(BinaryOp::Mul, first, second), "int32")
            }
            "clz32" => binary(
                BinaryOp::Sub,
                Expr::number(32),
                Expr::method(
                    binary(BinaryOp::BitAnd, first, mask32()),
                    "bit_length",
                    Vec::new(),
                ),
            ),
            other => Expr::method(Expr::constant("Math"), other, values),
        };
        Some(expr)
    }

    /// `JSON.method(value)`.
    fn json(&mut self, method: &str, value: Expr) -> Expr {
        self.imports.require("json");
        Expr::method(Expr::constant("JSON"), method, vec![value])
    }

    fn object_call(&mut self, method: &str, args: &[JsNode<'_>]) -> Option<Expr> {
        if !matches!(
            method,
            "keys"
                | "getOwnPropertyNames"
                | "values"
                | "entries"
                | "assign"
                | "freeze"
                | "seal"
                | "preventExtensions"
                | "create"
                | "fromEntries"
        ) {
            return None;
        }
        if method == "create" {
            return Some(Expr::Hash(Vec::new()));
        }
        let object = self.value(*args.first()?);
        let expr = match method {
            "keys" | "getOwnPropertyNames" => Expr::method(object, "keys", Vec::new()),
            "values" => Expr::method(object, "values", Vec::new()),
            "entries" => Expr::method(object, "to_a", Vec::new()),
            "fromEntries" => Expr::method(object, "to_h", Vec::new()),
            "assign" => {
                let sources = self.args(args.get(1..).unwrap_or_default());
                Expr::method(object, "merge!", sources)
            }
            _ => object,
        };
        Some(expr)
    }

    pub(super) fn console_call(&mut self, method: &str, args: &[JsNode<'_>]) -> Option<Expr> {
        let kernel = match method {
            "log" | "info" | "debug" | "trace" => "puts",
            "warn" | "error" => "warn",
            _ => return None,
        };
        let mut values = self.args(args);
        let line = match values.len() {
            0 => Vec::new(),
            1 => values.pop().into_iter().collect(),
            _ => vec![Expr::method(
                Expr::Array(values),
                "join",
                vec![Expr::string(" ")],
            )],
        };
        Some(Expr::call(kernel, line))
    }

    fn from_char_code(&mut self, args: &[JsNode<'_>]) -> Expr {
        if let [code] = args
            && code.js_type() != "SpreadElement"
        {
            let code = self.value(*code);
            return Expr::method(code, "chr", vec![Expr::Raw("Encoding::UTF_8".to_string())]);
        }
        let codes = self.args(args);
        Expr::method(Expr::Array(codes), "pack", vec![Expr::string("U*")])
    }

    // ---------------------------------------------------------------------
    // OpCodes
    // ---------------------------------------------------------------------

    fn opcodes_call(&mut self, method: &str, args: &[JsNode<'_>]) -> Expr {
        let mut values = self.args(args);
        let arg = |values: &mut Vec<Expr>, i: usize| {
            if i < values.len() {
                std::mem::replace(&mut values[i], Expr::nil())
            } else {
                Expr::nil()
            }
        };
        match method {
            "RotL32" | "RotR32" | "RotL16" | "RotR16" | "RotL8" | "RotR8" => {
                let bits = method[4..].parse().unwrap_or(32);
                let value = arg(&mut values, 0);
                let amount = arg(&mut values, 1);
                match Rotation::new(bits, method.starts_with("RotL")) {
                    Some(rotation) => self.rotate(value, amount, rotation),
                    None => self.opcodes_fallback(method, vec![value, amount]),
                }
            }
            "Pack32BE" | "Pack16BE" => pack_bytes(values, true),
            "Pack32LE" | "Pack16LE" => pack_bytes(values, false),
            "Unpack32BE" | "Unpack32LE" | "Unpack16BE" | "Unpack16LE" => {
                let bits = if method.contains("16") { 16 } else { 32 };
                let value = arg(&mut values, 0);
                self.unpack_bytes(value, bits, method.ends_with("BE"))
            }
            "XorArrays" => {
                let left = arg(&mut values, 0);
                let right = arg(&mut values, 1);
                Expr::with_block(
                    Expr::method(left, "zip", vec![right]),
                    "map",
                    Vec::new(),
                    Block::single(
                        &["x", "y"],
                        binary(BinaryOp::BitXor, Expr::local("x"), Expr::local("y")),
                    ),
                )
            }
            "AnsiToBytes" | "StringToBytes" | "AsciiToBytes" => {
                Expr::method(arg(&mut values, 0), "bytes", Vec::new())
            }
            "BytesToAnsi" | "BytesToString" => bytes_to_string(arg(&mut values, 0)),
            "BytesToHex8" | "BytesToHex" => bytes_to_hex(arg(&mut values, 0)),
            "Hex8ToBytes" | "HexToBytes" => hex_to_bytes(arg(&mut values, 0)),
            "ToUint32" => cast(arg(&mut values, 0), "uint32"),
            "ToUint16" => cast(arg(&mut values, 0), "uint16"),
            "ToByte" | "ToUint8" => cast(arg(&mut values, 0), "uint8"),
            "ToInt32" => cast(arg(&mut values, 0), "int32"),
            "CopyArray" => Expr::method(arg(&mut values, 0), "dup", Vec::new()),
            "ClearArray" => Expr::method(arg(&mut values, 0), "fill", vec![Expr::number(0)]),
            "GF256Mul" => {
                let a = arg(&mut values, 0);
                let b = arg(&mut values, 1);
                self.gf256_mul(a, b)
            }
            other => self.opcodes_fallback(other, values),
        }
    }

    /// A call into the `OpCodes` module itself, for helpers with no inline
    /// form.
    fn opcodes_fallback(&mut self, method: &str, values: Vec<Expr>) -> Expr {
        tracing::debug!(helper = method, "unmapped OpCodes helper");
        self.imports.require("OpCodes");
        Expr::method(Expr::constant("OpCodes"), method, values)
    }

    /// Rotation of a `rotation.bits`-wide value.
    fn rotate(&mut self, value: Expr, amount: Expr, rotation: Rotation) -> Expr {
        let mask = hex(rotation.mask);
        let bits = Expr::number(i64::from(rotation.bits));
        let mut setup = Vec::new();
        let value = self.bind(binary(BinaryOp::BitAnd, value, mask.clone()), "value", &mut setup);
        let in_range = matches!(
            &amount,
            Expr::Literal(Literal::Number(n)) if rotation.in_range(n)
        );
        let amount = if in_range {
            amount
        } else {
            self.bind(binary(BinaryOp::Mod, amount, bits.clone()), "shift", &mut setup)
        };
        let back = binary(BinaryOp::Sub, bits, amount.clone());
        let (first, second) = if rotation.left {
            (
                binary(BinaryOp::Shl, value.clone(), amount),
                binary(BinaryOp::Shr, value, back),
            )
        } else {
            (
                binary(BinaryOp::Shr, value.clone(), amount),
                binary(BinaryOp::Shl, value, back),
            )
        };
        with_setup(
            setup,
            binary(BinaryOp::BitAnd, binary(BinaryOp::BitOr, first, second), mask),
        )
    }

    /// The bytes of a `bits`-wide word, most significant first when
    /// `big_endian`.
    fn unpack_bytes(&mut self, value: Expr, bits: u32, big_endian: bool) -> Expr {
        let mut setup = Vec::new();
        let value = self.bind(value, "word", &mut setup);
        let count = bits / 8;
        let bytes = (0..count)
            .map(|i| {
                let shift = 8 * if big_endian { count - 1 - i } else { i };
                let shifted = if shift == 0 {
                    value.clone()
                } else {
                    binary(BinaryOp::Shr, value.clone(), Expr::number(shift as i64))
                };
                binary(BinaryOp::BitAnd, shifted, hex(0xFF))
            })
            .collect();
        with_setup(setup, Expr::Array(bytes))
    }

    /// Multiplication in GF(2^8) with the AES polynomial.
    fn gf256_mul(&mut self, a: Expr, b: Expr) -> Expr {
        let x = Expr::local(&self.names.fresh("a"));
        let y = Expr::local(&self.names.fresh("b"));
        let product = Expr::local(&self.names.fresh("product"));
        let high = Expr::local(&self.names.fresh("high"));
        let byte = |e: Expr| binary(BinaryOp::BitAnd, e, hex(0xFF));
        let step = vec![
            when(
                binary(
                    BinaryOp::Ne,
                    binary(BinaryOp::BitAnd, y.clone(), Expr::number(1)),
                    Expr::number(0),
                ),
                Stmt::expr(Expr::compound(product.clone(), BinaryOp::BitXor, x.clone())),
            ),
            Stmt::assign(high.clone(), binary(BinaryOp::BitAnd, x.clone(), hex(0x80))),
            Stmt::assign(
                x.clone(),
                byte(binary(BinaryOp::Shl, x.clone(), Expr::number(1))),
            ),
            when(
                binary(BinaryOp::Ne, high, Expr::number(0)),
                Stmt::expr(Expr::compound(x.clone(), BinaryOp::BitXor, hex(0x1B))),
            ),
            Stmt::expr(Expr::compound(y.clone(), BinaryOp::Shr, Expr::number(1))),
        ];
        let setup = vec![
            Stmt::assign(x, byte(a)),
            Stmt::assign(y, byte(b)),
            Stmt::assign(product.clone(), Expr::number(0)),
            Stmt::expr(Expr::with_block(
                Expr::number(8),
                "times",
                Vec::new(),
                Block::new(&[], step),
            )),
        ];
        with_setup(setup, product)
    }

    // ---------------------------------------------------------------------
    // Methods on values
    // ---------------------------------------------------------------------

    /// Method call in statement position: `forEach` becomes an `each` loop
    /// whose `return`s continue it.
    pub(super) fn method_stmt(
        &mut self,
        receiver: JsNode<'_>,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Vec<Stmt>> {
        if method != "forEach" || self.is_stringy(receiver) {
            return None;
        }
        let callback = args.first()?;
        Some(self.foreach_stmt(receiver, *callback))
    }

    /// `receiver.method(args)` for library methods; `None` leaves it a
    /// plain method call.
    pub(super) fn method_call(
        &mut self,
        receiver: JsNode<'_>,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Expr> {
        let receiver = receiver.unwrapped();
        if let Some(collection) = self.collection_of(receiver) {
            return self.collection_method(collection, receiver, method, args);
        }
        if STRING_ONLY_METHODS.contains(&method) || self.is_stringy(receiver) {
            return self.string_method(receiver, method, args);
        }
        match method {
            "toString" => {
                let value = self.value(receiver);
                if receiver.js_type() == "ArrayExpression" || self.is_list_var(receiver) {
                    return Some(Expr::method(value, "join", vec![Expr::string(",")]));
                }
                let radix = self.args(args);
                return Some(Expr::method(value, "to_s", radix));
            }
            "toFixed" => {
                let value = self.value(receiver);
                let format = match args.first() {
                    Some(digits) => match digits.number_field("value") {
                        Some(n) => Expr::string(&format!("%.{}f", n as u32)),
                        None => {
                            let digits = self.value(*digits);
                            interpolated(&["%.", "f"], digits)
                        }
                    },
                    None => Expr::string("%.0f"),
                };
                return Some(Expr::call("format", vec![format, value]));
            }
            "hasOwnProperty" => {
                let object = self.value(receiver);
                let key = self.value(*args.first()?);
                return Some(Expr::method(object, "key?", vec![key]));
            }
            "valueOf" => return Some(self.value(receiver)),
            _ => {}
        }
        self.array_method(receiver, method, args)
    }

    fn collection_method(
        &mut self,
        collection: Collection,
        receiver: JsNode<'_>,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Expr> {
        if method == "forEach" {
            let callback = args.first()?;
            let stmts = self.foreach_stmt(receiver, *callback);
            return Some(with_setup(stmts, Expr::nil()));
        }
        let name = match (collection, method) {
            (Collection::Map, "get" | "set") => {
                let base = self.value(receiver);
                let key = self.value(*args.first()?);
                let slot = Expr::index(base, key);
                if method == "get" {
                    return Some(slot);
                }
                let value = self.value_of(args.get(1).copied());
                return Some(Expr::assign(slot, value));
            }
            (Collection::Map, "has") => "key?",
            (Collection::Set, "has") => "include?",
            (Collection::Set, "add") => "add",
            (_, "delete") => "delete",
            (_, "clear") => "clear",
            (Collection::Map, "keys") => "keys",
            (Collection::Map, "values") => "values",
            (Collection::Map, "entries") => "to_a",
            (Collection::Set, "values" | "keys") => "to_a",
            _ => return None,
        };
        let base = self.value(receiver);
        let args = self.args(args);
        Some(Expr::method(base, name, args))
    }

    fn array_method(
        &mut self,
        receiver: JsNode<'_>,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Expr> {
        if let Some(op) = Iteration::from_method(method) {
            let callback = args.first()?;
            return Some(self.iterate(op, receiver, *callback, args.get(1).copied()));
        }
        let expr = match method {
            "flatMap" => {
                let callback = args.first()?;
                let mapped = self.iterate(Iteration::Map, receiver, *callback, None);
                Expr::method(mapped, "flatten", vec![Expr::number(1)])
            }
            "join" => {
                let list = self.value(receiver);
                self.join(list, args.first().copied())
            }
            "slice" => {
                let list = self.value(receiver);
                self.slice(list, args.first().copied(), args.get(1).copied())
            }
            "splice" => return self.splice(receiver, args),
            "concat" => self.array_concat(receiver, args),
            "indexOf" | "lastIndexOf" => {
                let name = if method == "indexOf" { "index" } else { "rindex" };
                let list = self.value(receiver);
                let args = self.args(args);
                index_of(list, name, args)
            }
            "includes" => {
                let list = self.value(receiver);
                let args = self.args(args);
                Expr::method(list, "include?", args)
            }
            "reverse" => Expr::method(self.value(receiver), "reverse!", Vec::new()),
            "sort" => self.sort(receiver, args.first().copied()),
            "fill" => {
                let value = args.first()?;
                self.fill(receiver, *value, args.get(1).copied(), args.get(2).copied())
            }
            "at" => {
                let list = self.value(receiver);
                let index = self.value(*args.first()?);
                Expr::index(list, index)
            }
            "flat" => {
                let list = self.value(receiver);
                let depth = args.first().map(|d| self.value(*d)).unwrap_or_else(|| Expr::number(1));
                Expr::method(list, "flatten", vec![depth])
            }
            "keys" => {
                let list = self.value(receiver);
                Expr::method(Expr::method(list, "each_index", Vec::new()), "to_a", Vec::new())
            }
            "entries" => {
                let list = self.value(receiver);
                Expr::with_block(
                    Expr::method(list, "each_with_index", Vec::new()),
                    "map",
                    Vec::new(),
                    Block::single(
                        &["x", "i"],
                        Expr::Array(vec![Expr::local("i"), Expr::local("x")]),
                    ),
                )
            }
            _ => return None,
        };
        Some(expr)
    }

    // ---------------------------------------------------------------------
    // Array helpers
    // ---------------------------------------------------------------------

    /// Bind `expr` to a fresh local unless it is cheap to repeat.
    pub(super) fn bind(&mut self, expr: Expr, stem: &str, setup: &mut Vec<Stmt>) -> Expr {
        if is_simple(&expr) {
            return expr;
        }
        let name = self.names.fresh(stem);
        let var = Expr::local(&name);
        setup.push(Stmt::assign(var.clone(), expr));
        var
    }

    /// What an iteration walks: the value, or its characters for a string.
    fn iterable(&mut self, array: JsNode<'_>) -> Expr {
        let stringy = self.is_stringy(array);
        let list = self.value(array);
        if stringy {
            Expr::method(list, "chars", Vec::new())
        } else {
            list
        }
    }

    /// Callback-taking array method as the matching Enumerable call, the
    /// callback inlined as a block when it is a function literal.
    pub(super) fn iterate(
        &mut self,
        op: Iteration,
        array: JsNode<'_>,
        callback: JsNode<'_>,
        initial: Option<JsNode<'_>>,
    ) -> Expr {
        let list = self.iterable(array);
        let initial_value = initial.map(|i| self.value(i));
        let Some(cb) = Callback::from_node(callback).filter(has_named_params) else {
            let code = self.value(callback);
            let (receiver, method, mut args) = iteration_call(op, list, false, initial_value);
            args.push(Expr::BlockPass(Box::new(code)));
            return finish_iteration(op, Expr::method(receiver, method, args));
        };
        let names: Vec<&str> = cb.params().iter().filter_map(|p| p.name()).collect();
        let acc = usize::from(op == Iteration::Reduce);
        let indexed = names.len() > acc + 1;
        let wants_list = names.len() > acc + 2;

        let mut setup = Vec::new();
        let list = if wants_list {
            self.bind(list, "list", &mut setup)
        } else {
            list
        };
        self.scopes.push();
        for (i, name) in names.iter().enumerate() {
            self.scopes.declare(name, Shape::Scalar);
            let init = if i < acc { initial } else { None };
            self.declare_value(name, init);
        }
        let mut params: Vec<String> = names.iter().take(acc + 2).map(|n| ruby_local(n)).collect();
        if op == Iteration::Reduce && indexed {
            // `each_with_index` yields `[element, index]` pairs.
            let pair = format!("({})", params[1..].join(", "));
            params.truncate(1);
            params.push(pair);
        }
        let prelude = match names.get(acc + 2) {
            Some(name) => vec![Stmt::assign(Expr::local(&ruby_local(name)), list.clone())],
            None => Vec::new(),
        };
        let block = self.callback_block(&cb, params, prelude);
        self.scopes.pop();

        let (receiver, method, args) = iteration_call(op, list, indexed, initial_value);
        let call = Expr::with_block(receiver, method, args, block);
        with_setup(setup, finish_iteration(op, call))
    }

    /// `forEach` as an `each` loop. Map callbacks get `(value, key)`, which
    /// Ruby yields as `|key, value|`.
    pub(super) fn foreach_stmt(&mut self, array: JsNode<'_>, callback: JsNode<'_>) -> Vec<Stmt> {
        let Some(cb) = Callback::from_node(callback).filter(has_named_params) else {
            let each = self.iterate(Iteration::ForEach, array, callback, None);
            return vec![Stmt::expr(each)];
        };
        let names: Vec<&str> = cb.params().iter().filter_map(|p| p.name()).collect();
        let local = |i: usize| names.get(i).map(|n| ruby_local(n));
        let collection = self.collection_of(array);
        let list = self.iterable(array);

        let mut setup = Vec::new();
        let mut prelude = Vec::new();
        let (receiver, method, params) = match collection {
            Some(Collection::Map) => {
                let key = local(1).unwrap_or_else(|| "_key".to_string());
                let value = local(0).unwrap_or_else(|| "_value".to_string());
                (list, "each", vec![key, value])
            }
            Some(Collection::Set) => {
                if let (Some(first), Some(second)) = (local(0), local(1)) {
                    prelude.push(Stmt::assign(Expr::local(&second), Expr::local(&first)));
                }
                (list, "each", local(0).into_iter().collect())
            }
            None => {
                let list = if names.len() > 2 {
                    self.bind(list, "list", &mut setup)
                } else {
                    list
                };
                if let Some(name) = local(2) {
                    prelude.push(Stmt::assign(Expr::local(&name), list.clone()));
                }
                let method = if names.len() > 1 { "each_with_index" } else { "each" };
                (list, method, names.iter().take(2).map(|n| ruby_local(n)).collect())
            }
        };
        self.scopes.push();
        for name in &names {
            self.scopes.declare(name, Shape::Scalar);
            self.declare_value(name, None);
        }
        self.frames.push(Frame::callback());
        let saved = std::mem::replace(&mut self.return_as_next, true);
        let mut body = prelude;
        match cb.body {
            CallbackBody::Block(block) => body.extend(self.stmts(&block.children("body"))),
            CallbackBody::Expr(expr) => body.extend(self.expr_stmt(expr)),
        }
        self.return_as_next = saved;
        let (mut body, _) = self.close_loop(body);
        self.scopes.pop();
        if matches!(
            body.last().map(|s| &s.kind),
            Some(StmtKind::LoopControl {
                kind: LoopControl::Next,
                value: None
            })
        ) {
            body.pop();
        }
        let block = Block {
            params: params.iter().map(|p| Param::new(p)).collect(),
            locals: Vec::new(),
            body,
        };
        setup.push(Stmt::expr(Expr::with_block(receiver, method, Vec::new(), block)));
        setup
    }

    /// Block for an inlined callback. The caller has declared the
    /// parameters; `return value` becomes `next value`, or the block's
    /// result when it ends the body.
    fn callback_block(&mut self, cb: &Callback<'_>, params: Vec<String>, prelude: Vec<Stmt>) -> Block {
        let mut body = prelude;
        if let Some(result) = cb.result_expr() {
            let value = self.value(result);
            body.push(Stmt::expr(value));
        } else {
            let statements = cb.block_statements();
            self.frames.push(Frame::callback());
            let saved = std::mem::replace(&mut self.return_as_next, true);
            body.extend(self.stmts(&statements));
            self.return_as_next = saved;
            let (closed, _) = self.close_loop(body);
            body = closed;
            let ends_with_next = matches!(
                body.last().map(|s| &s.kind),
                Some(StmtKind::LoopControl {
                    kind: LoopControl::Next,
                    ..
                })
            );
            // The block's last value is its result.
            if ends_with_next
                && let Some(Stmt {
                    kind: StmtKind::LoopControl { value, .. },
                    meta,
                }) = body.pop()
                && let Some(result) = value
            {
                body.push(Stmt::expr(result).with_meta(meta));
            }
        }
        Block {
            params: params.iter().map(|p| Param::new(p)).collect(),
            locals: Vec::new(),
            body,
        }
    }

    /// `Array.from({length: n}, (_, i) => ...)` as `Array.new(n) { |i| ... }`.
    fn generate(&mut self, length: JsNode<'_>, mapper: JsNode<'_>) -> Expr {
        let length = self.value(length);
        let array = Expr::constant("Array");
        let Some(cb) = Callback::from_node(mapper).filter(has_named_params) else {
            let code = self.value(mapper);
            let block = Block::single(
                &["i"],
                Expr::method(code, "call", vec![Expr::nil(), Expr::local("i")]),
            );
            return Expr::with_block(array, "new", vec![length], block);
        };
        let names: Vec<&str> = cb.params().iter().filter_map(|p| p.name()).collect();
        self.scopes.push();
        for name in &names {
            self.scopes.declare(name, Shape::Scalar);
            self.declare_value(name, None);
        }
        let mut prelude = Vec::new();
        if let Some(element) = names.first()
            && names.len() > 1
        {
            prelude.push(Stmt::assign(Expr::local(&ruby_local(element)), Expr::nil()));
        }
        let index = names
            .get(1)
            .map(|n| ruby_local(n))
            .unwrap_or_else(|| "_i".to_string());
        let block = self.callback_block(&cb, vec![index], prelude);
        self.scopes.pop();
        Expr::with_block(array, "new", vec![length], block)
    }

    /// `sort!`, with a comparator block when one is given.
    fn sort(&mut self, array: JsNode<'_>, compare: Option<JsNode<'_>>) -> Expr {
        let list = self.value(array);
        let Some(compare) = compare else {
            return Expr::method(list, "sort!", Vec::new());
        };
        match Callback::from_node(compare).filter(|cb| cb.params().len() == 2 && has_named_params(cb)) {
            Some(cb) => {
                let names: Vec<&str> = cb.params().iter().filter_map(|p| p.name()).collect();
                self.scopes.push();
                for name in &names {
                    self.scopes.declare(name, Shape::Scalar);
                    self.declare_value(name, None);
                }
                let params = names.iter().map(|n| ruby_local(n)).collect();
                let block = self.callback_block(&cb, params, Vec::new());
                self.scopes.pop();
                Expr::with_block(list, "sort!", Vec::new(), block)
            }
            None => {
                let code = self.value(compare);
                Expr::method(list, "sort!", vec![Expr::BlockPass(Box::new(code))])
            }
        }
    }

    fn fill(
        &mut self,
        array: JsNode<'_>,
        value: JsNode<'_>,
        start: Option<JsNode<'_>>,
        end: Option<JsNode<'_>>,
    ) -> Expr {
        if start.is_none()
            && let Some(size) = sized_new(array)
        {
            let size = self.value(size);
            let value = self.value(value);
            return Expr::method(Expr::constant("Array"), "new", vec![size, value]);
        }
        let list = self.value(array);
        let mut args = vec![self.value(value)];
        match (start, end) {
            (Some(start), Some(end)) => {
                let start = self.value(start);
                let end = self.value(end);
                args.push(Expr::range(start, Some(end), true));
            }
            (Some(start), None) => args.push(self.value(start)),
            _ => {}
        }
        Expr::method(list, "fill", args)
    }

    /// A typed array from a length or from another array.
    fn sized_or_copied(&mut self, arg: JsNode<'_>) -> Expr {
        if arg.js_type() == "ArrayExpression" || self.is_list_var(arg) {
            return Expr::method(self.value(arg), "dup", Vec::new());
        }
        let zeros = |size: Expr| {
            Expr::method(Expr::constant("Array"), "new", vec![size, Expr::number(0)])
        };
        if self.is_numeric(arg) {
            return zeros(self.value(arg));
        }
        let mut setup = Vec::new();
        let value = self.value(arg);
        let source = self.bind(value, "source", &mut setup);
        with_setup(
            setup,
            ternary(
                is_array(source.clone()),
                Expr::method(source.clone(), "dup", Vec::new()),
                zeros(source),
            ),
        )
    }

    fn join(&mut self, list: Expr, separator: Option<JsNode<'_>>) -> Expr {
        let separator = match separator {
            Some(separator) => self.value(separator),
            None => Expr::string(","),
        };
        Expr::method(list, "join", vec![separator])
    }

    /// `slice`/`substring` as a range index; Ruby ranges count negative
    /// bounds from the end too.
    fn slice(&mut self, list: Expr, start: Option<JsNode<'_>>, end: Option<JsNode<'_>>) -> Expr {
        let Some(start) = start else {
            return Expr::method(list, "dup", Vec::new());
        };
        let start = self.value(start);
        let end = end.map(|e| self.value(e));
        let exclusive = end.is_some();
        Expr::index(list, Expr::range(start, end, exclusive))
    }

    fn splice(&mut self, array: JsNode<'_>, args: &[JsNode<'_>]) -> Option<Expr> {
        let list = self.value(array);
        let start = self.value(*args.first()?);
        let Some(count) = args.get(1) else {
            return Some(Expr::method(
                list,
                "slice!",
                vec![Expr::range(start, None, false)],
            ));
        };
        let count = self.value(*count);
        let items = self.args(args.get(2..).unwrap_or_default());
        if items.is_empty() {
            return Some(Expr::method(list, "slice!", vec![start, count]));
        }
        let mut setup = Vec::new();
        let list = self.bind(list, "list", &mut setup);
        let start = self.bind(start, "start", &mut setup);
        let removed = Expr::local(&self.names.fresh("removed"));
        setup.push(Stmt::assign(
            removed.clone(),
            Expr::method(list.clone(), "slice!", vec![start.clone(), count]),
        ));
        let mut insert = vec![start];
        insert.extend(items);
        setup.push(Stmt::expr(Expr::method(list, "insert", insert)));
        Some(with_setup(setup, removed))
    }

    /// `a.concat(b, c)`: array arguments are appended, anything else is
    /// added as one element.
    fn array_concat(&mut self, array: JsNode<'_>, others: &[JsNode<'_>]) -> Expr {
        let mut result = self.value(array);
        if others.is_empty() {
            return Expr::method(result, "dup", Vec::new());
        }
        for other in others {
            let scalar = other.js_type() == "Literal"
                || self.is_stringy(*other)
                || self.is_numeric(*other);
            let value = self.value(*other);
            let value = if scalar { Expr::Array(vec![value]) } else { value };
            result = binary(BinaryOp::Add, result, value);
        }
        result
    }

    // ---------------------------------------------------------------------
    // String helpers
    // ---------------------------------------------------------------------

    fn string_method(
        &mut self,
        receiver: JsNode<'_>,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Expr> {
        if !STRING_METHODS.contains(&method) {
            return None;
        }
        let first = args.first().copied();
        let string = self.value(receiver);
        let expr = match method {
            "charAt" | "at" => {
                let index = self.index_arg(first);
                Expr::index(string, index)
            }
            "charCodeAt" | "codePointAt" => {
                let index = self.index_arg(first);
                Expr::method(Expr::index(string, index), "ord", Vec::new())
            }
            "substring" | "slice" => self.slice(string, first, args.get(1).copied()),
            "substr" => match args.get(1) {
                Some(length) => {
                    let start = self.index_arg(first);
                    let length = self.value(*length);
                    Expr::method(string, "slice", vec![start, length])
                }
                None => self.slice(string, first, None),
            },
            "indexOf" | "lastIndexOf" => {
                let name = if method == "indexOf" { "index" } else { "rindex" };
                let args = self.args(args);
                index_of(string, name, args)
            }
            "includes" | "startsWith" | "endsWith" => {
                let name = match method {
                    "includes" => "include?",
                    "startsWith" => "start_with?",
                    _ => "end_with?",
                };
                let args = self.args(args);
                Expr::method(string, name, args)
            }
            "toUpperCase" | "toLocaleUpperCase" => Expr::method(string, "upcase", Vec::new()),
            "toLowerCase" | "toLocaleLowerCase" => Expr::method(string, "downcase", Vec::new()),
            "trim" => Expr::method(string, "strip", Vec::new()),
            "trimStart" => Expr::method(string, "lstrip", Vec::new()),
            "trimEnd" => Expr::method(string, "rstrip", Vec::new()),
            "repeat" => {
                let count = self.value_of(first);
                binary(BinaryOp::Mul, string, count)
            }
            "padStart" | "padEnd" => {
                let name = if method == "padStart" { "rjust" } else { "ljust" };
                let args = self.args(args);
                Expr::method(string, name, args)
            }
            "split" => self.string_split(string, first),
            "replace" | "replaceAll" => {
                let pattern = first?;
                let replacement = args.get(1)?;
                self.string_replace(string, pattern, *replacement, method == "replaceAll")
            }
            "concat" => self
                .args(args)
                .into_iter()
                .fold(string, concat),
            "localeCompare" => {
                let other = self.value_of(first);
                binary(BinaryOp::Cmp, string, other)
            }
            "search" => {
                let pattern = self.value_of(first);
                binary(
                    BinaryOp::Or,
                    binary(BinaryOp::Match, string, pattern),
                    Expr::number(-1),
                )
            }
            _ => string,
        };
        Some(expr)
    }

    fn index_arg(&mut self, index: Option<JsNode<'_>>) -> Expr {
        index.map(|i| self.value(i)).unwrap_or_else(|| Expr::number(0))
    }

    pub(super) fn string_split(&mut self, string: Expr, separator: Option<JsNode<'_>>) -> Expr {
        let Some(separator) = separator else {
            return Expr::Array(vec![string]);
        };
        // A limit of -1 keeps trailing empty fields, as JavaScript does.
        let keep = Expr::number(-1);
        if let Some(text) = separator.string_value() {
            return match text {
                "" => Expr::method(string, "chars", Vec::new()),
                // `split(" ")` would split on runs of whitespace.
                " " => Expr::method(
                    string,
                    "split",
                    vec![
                        Expr::Regex {
                            pattern: " ".to_string(),
                            flags: String::new(),
                        },
                        keep,
                    ],
                ),
                _ => Expr::method(string, "split", vec![Expr::string(text), keep]),
            };
        }
        let separator = self.value(separator);
        Expr::method(string, "split", vec![separator, keep])
    }

    /// `replace`/`replaceAll` as `sub`/`gsub`.
    fn string_replace(
        &mut self,
        string: Expr,
        pattern: JsNode<'_>,
        replacement: JsNode<'_>,
        all: bool,
    ) -> Expr {
        let (pattern, global) = match regex_of(pattern) {
            Some((source, flags)) => (regex_literal(source, flags), all || flags.contains('g')),
            None => (self.value(pattern), all),
        };
        let method = if global { "gsub" } else { "sub" };
        if let Some(text) = replacement.string_value() {
            return Expr::method(
                string,
                method,
                vec![pattern, Expr::string(&replacement_text(text))],
            );
        }
        if is_function(replacement.unwrapped()) {
            let block = self.replacement_block(replacement);
            return Expr::with_block(string, method, vec![pattern], block);
        }
        let replacement = self.value(replacement);
        Expr::method(string, method, vec![pattern, replacement])
    }

    /// Block for a replacement callback: the match is the block parameter,
    /// capture groups come from `Regexp.last_match`.
    fn replacement_block(&mut self, func: JsNode<'_>) -> Block {
        let Some(cb) = Callback::from_node(func).filter(has_named_params) else {
            let code = self.value(func);
            return Block::single(
                &["match"],
                Expr::method(code, "call", vec![Expr::local("match")]),
            );
        };
        let names: Vec<&str> = cb.params().iter().filter_map(|p| p.name()).collect();
        self.scopes.push();
        for name in &names {
            self.scopes.declare(name, Shape::Scalar);
            self.declare_value(name, None);
        }
        let prelude = names
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, name)| {
                Stmt::assign(
                    Expr::local(&ruby_local(name)),
                    Expr::method(
                        Expr::constant("Regexp"),
                        "last_match",
                        vec![Expr::number(i as i64)],
                    ),
                )
            })
            .collect();
        let param = names
            .first()
            .map(|n| ruby_local(n))
            .unwrap_or_else(|| "_match".to_string());
        let block = self.callback_block(&cb, vec![param], prelude);
        self.scopes.pop();
        block
    }
}

// -------------------------------------------------------------------------
// Builders
// -------------------------------------------------------------------------

fn il_name<'a>(node: JsNode<'a>, field: &str) -> Option<&'a str> {
    node.str_field(field)
        .or_else(|| node.child(field).and_then(|n| n.name()))
}

fn is_simple(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) | Expr::Var { .. } | Expr::SelfRef => true,
        Expr::Index { base, index } => is_simple(base) && is_simple(index),
        _ => false,
    }
}

fn has_named_params(cb: &Callback<'_>) -> bool {
    cb.params().iter().all(|p| p.name().is_some())
}

/// Receiver, method and arguments of the Enumerable call for `op`.
fn iteration_call(
    op: Iteration,
    list: Expr,
    indexed: bool,
    initial: Option<Expr>,
) -> (Expr, &'static str, Vec<Expr>) {
    let args = match op {
        Iteration::Reduce => initial.into_iter().collect(),
        _ => Vec::new(),
    };
    let (method, with_index) = op.method();
    match (indexed, op) {
        (false, _) => (list, method, args),
        (true, Iteration::ForEach) => (list, "each_with_index", args),
        (true, _) if with_index => (Expr::method(list, method, Vec::new()), "with_index", args),
        (true, _) => (Expr::method(list, "each_with_index", Vec::new()), method, args),
    }
}

/// `findIndex` answers -1 where `find_index` answers `nil`.
fn finish_iteration(op: Iteration, call: Expr) -> Expr {
    match op {
        Iteration::FindIndex => binary(BinaryOp::Or, call, Expr::number(-1)),
        _ => call,
    }
}

fn index_of(receiver: Expr, method: &str, args: Vec<Expr>) -> Expr {
    binary(
        BinaryOp::Or,
        Expr::method(receiver, method, args),
        Expr::number(-1),
    )
}

fn is_array(value: Expr) -> Expr {
    Expr::method(value, "is_a?", vec![Expr::constant("Array")])
}

fn bytes_to_string(bytes: Expr) -> Expr {
    Expr::method(bytes, "pack", vec![Expr::string("C*")])
}

/// `bytes.map { |b| format('%02x', b) }.join`
fn bytes_to_hex(bytes: Expr) -> Expr {
    let digits = Expr::with_block(
        bytes,
        "map",
        Vec::new(),
        Block::single(
            &["b"],
            Expr::call("format", vec![Expr::string("%02x"), Expr::local("b")]),
        ),
    );
    Expr::method(digits, "join", Vec::new())
}

/// `hex.scan(/../).map(&:hex)`
fn hex_to_bytes(text: Expr) -> Expr {
    let pairs = Expr::method(
        text,
        "scan",
        vec![Expr::Regex {
            pattern: "..".to_string(),
            flags: String::new(),
        }],
    );
    Expr::method(
        pairs,
        "map",
        vec![Expr::BlockPass(Box::new(Expr::symbol("hex")))],
    )
}

/// A word from bytes, most significant first when `big_endian`.
fn pack_bytes(bytes: Vec<Expr>, big_endian: bool) -> Expr {
    let count = bytes.len();
    bytes
        .into_iter()
        .enumerate()
        .map(|(i, byte)| {
            let shift = 8 * if big_endian { count - 1 - i } else { i };
            let masked = binary(BinaryOp::BitAnd, byte, hex(0xFF));
            if shift == 0 {
                masked
            } else {
                binary(BinaryOp::Shl, masked, Expr::number(shift as i64))
            }
        })
        .reduce(|acc, part| binary(BinaryOp::BitOr, acc, part))
        .unwrap_or_else(|| Expr::number(0))
}

fn cast(value: Expr, target: &str) -> Expr {
    match target {
        "uint8" | "byte" => binary(BinaryOp::BitAnd, value, hex(0xFF)),
        "uint16" => binary(BinaryOp::BitAnd, value, hex(0xFFFF)),
        "uint32" => binary(BinaryOp::BitAnd, value, mask32()),
        "int32" => int32(value),
        "float" | "number" | "double" => Expr::method(value, "to_f", Vec::new()),
        "string" => Expr::method(value, "to_s", Vec::new()),
        "bool" | "boolean" => unary(UnaryOp::Not, unary(UnaryOp::Not, value)),
        _ => Expr::method(value, "to_i", Vec::new()),
    }
}

fn when(cond: Expr, then: Stmt) -> Stmt {
    Stmt::new(StmtKind::If {
        cond,
        then_branch: vec![then],
        elsifs: Vec::new(),
        else_branch: None,
    })
}

/// `"#{...}"` with one value between two pieces of text.
fn interpolated(text: &[&str; 2], value: Expr) -> Expr {
    interpolation(vec![
        InterpPart::Text(text[0].to_string()),
        InterpPart::Expr(value),
        InterpPart::Text(text[1].to_string()),
    ])
}

fn regex_of(node: JsNode<'_>) -> Option<(&str, &str)> {
    let regex = node.unwrapped().field("regex")?;
    let pattern = regex.get("pattern").and_then(Value::as_str)?;
    let flags = regex.get("flags").and_then(Value::as_str).unwrap_or("");
    Some((pattern, flags))
}

/// `new Array(n)` or `new Uint8Array(n)`: its size argument.
fn sized_new(array: JsNode<'_>) -> Option<JsNode<'_>> {
    let array = array.unwrapped();
    if array.js_type() != "NewExpression" {
        return None;
    }
    let callee = array.child("callee")?.name()?;
    if callee != "Array" && !TYPED_ARRAYS.contains(&callee) {
        return None;
    }
    match array.children("arguments").as_slice() {
        [size] if size.js_type() != "ArrayExpression" && !is_string_like(*size) => Some(*size),
        _ => None,
    }
}

/// `{length: n}`: the `n`.
fn length_only(node: JsNode<'_>) -> Option<JsNode<'_>> {
    let node = node.unwrapped();
    if node.js_type() != "ObjectExpression" {
        return None;
    }
    match node.children("properties").as_slice() {
        [prop] if prop.child("key").is_some_and(|k| {
            k.name() == Some("length") || k.string_value() == Some("length")
        }) =>
        {
            prop.child("value")
        }
        _ => None,
    }
}

/// A JavaScript replacement string for `sub`/`gsub`: `$1` becomes `\1`,
/// `$&` becomes `\0`, `$$` a dollar, and backslashes are doubled.
fn replacement_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '$' => match chars.peek().copied() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('&') => {
                    chars.next();
                    out.push_str("\\0");
                }
                Some(d) if d.is_ascii_digit() => {
                    out.push('\\');
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        out.push(d);
                        chars.next();
                    }
                }
                _ => out.push('$'),
            },
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::GenerationOptions;
    use serde_json::json;

    fn transformer() -> RubyTransformer {
        RubyTransformer::new(&GenerationOptions::default())
    }

    fn ident(name: &str) -> Value {
        json!({"type": "Identifier", "name": name})
    }

    fn method_call(object: Value, method: &str, args: Vec<Value>) -> Value {
        json!({"type": "CallExpression", "arguments": args, "callee": {
            "type": "MemberExpression", "computed": false,
            "object": object, "property": ident(method)}})
    }

    fn arrow(params: &[&str], body: Value) -> Value {
        let params: Vec<Value> = params.iter().map(|p| ident(p)).collect();
        json!({"type": "ArrowFunctionExpression", "params": params, "body": body})
    }

    #[test]
    fn test_map_becomes_block() {
        let call = method_call(
            json!({"type": "ArrayExpression", "elements": [{"type": "Literal", "value": 1}]}),
            "map",
            vec![arrow(&["x"], ident("x"))],
        );
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        let Expr::Call {
            name, block, args, ..
        } = expr
        else {
            panic!("expected a call, got {expr:?}");
        };
        assert_eq!(name, "map");
        assert!(args.is_empty());
        let block = block.expect("block");
        assert_eq!(block.params[0].name, "x");
        assert_eq!(block.body, vec![Stmt::expr(Expr::local("x"))]);
    }

    #[test]
    fn test_indexed_map_uses_with_index() {
        let call = method_call(ident("xs"), "map", vec![arrow(&["x", "i"], ident("i"))]);
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        let Expr::Call { receiver, name, .. } = expr else {
            panic!("expected a call");
        };
        assert_eq!(name, "with_index");
        assert_eq!(
            receiver.map(|r| *r),
            Some(Expr::method(Expr::local("xs"), "map", Vec::new()))
        );
    }

    #[test]
    fn test_reduce_passes_initial_value() {
        let call = json!({
            "type": "CallExpression", "ilNodeType": "ArrayReduce",
            "array": ident("xs"),
            "initialValue": {"type": "Literal", "value": 0},
            "callback": arrow(&["acc", "x"], json!({
                "type": "BinaryExpression", "operator": "+",
                "left": ident("acc"), "right": ident("x")})),
        });
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        let Expr::Call {
            name, args, block, ..
        } = expr
        else {
            panic!("expected a call");
        };
        assert_eq!(name, "reduce");
        assert_eq!(args, vec![Expr::number(0)]);
        let params: Vec<String> = block.expect("block").params.into_iter().map(|p| p.name).collect();
        assert_eq!(params, ["acc", "x"]);
    }

    #[test]
    fn test_indexed_reduce_destructures_pairs() {
        let call = json!({
            "type": "CallExpression", "ilNodeType": "ArrayReduce",
            "array": ident("xs"),
            "initialValue": {"type": "Literal", "value": 0},
            "callback": arrow(&["acc", "x", "i"], json!({
                "type": "BinaryExpression", "operator": "+",
                "left": ident("acc"), "right": ident("i")})),
        });
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        let Expr::Call {
            receiver,
            name,
            block,
            ..
        } = expr
        else {
            panic!("expected a call");
        };
        assert_eq!(name, "reduce");
        assert_eq!(
            receiver.map(|r| *r),
            Some(Expr::method(Expr::local("xs"), "each_with_index", Vec::new()))
        );
        let params: Vec<String> = block.expect("block").params.into_iter().map(|p| p.name).collect();
        assert_eq!(params, ["acc", "(x, i)"]);
    }

    #[test]
    fn test_find_index_falls_back_to_minus_one() {
        let call = method_call(ident("xs"), "findIndex", vec![arrow(&["x"], ident("x"))]);
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        assert!(matches!(
            expr,
            Expr::Binary { op: BinaryOp::Or, ref right, .. } if **right == Expr::number(-1)
        ));
    }

    #[test]
    fn test_foreach_return_becomes_next() {
        let body = json!({"type": "BlockStatement", "body": [
            {"type": "IfStatement", "test": ident("x"),
             "consequent": {"type": "ReturnStatement", "argument": null}},
            {"type": "ExpressionStatement", "expression": {
                "type": "CallExpression", "callee": ident("f"), "arguments": [ident("x")]}},
        ]});
        let callback = arrow(&["x"], body);
        let array = ident("xs");
        let mut t = transformer();
        let stmts = t.foreach_stmt(JsNode::new(&array).unwrap(), JsNode::new(&callback).unwrap());
        let [each] = stmts.as_slice() else {
            panic!("expected one statement");
        };
        let StmtKind::Expr(Expr::Call { name, block, .. }) = &each.kind else {
            panic!("expected each");
        };
        assert_eq!(name, "each");
        let block = block.as_ref().expect("block");
        let StmtKind::If { then_branch, .. } = &block.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(then_branch, &vec![Stmt::control(LoopControl::Next)]);
        assert!(!t.return_as_next);
        assert!(t.frames.is_empty());
    }

    #[test]
    fn test_unmapped_opcode_is_required() {
        let call = method_call(ident("OpCodes"), "Mystery", vec![]);
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        assert_eq!(
            expr,
            Expr::method(Expr::constant("OpCodes"), "Mystery", Vec::new())
        );
        assert!(t.imports.contains("OpCodes"));
    }

    fn rotate_node(bits: u32) -> Value {
        json!({
            "type": "CallExpression", "ilNodeType": "RotateRight", "bits": bits,
            "value": {"type": "Identifier", "name": "x"},
            "amount": {"type": "Literal", "value": 24, "raw": "24"}
        })
    }

    #[test]
    fn test_rotate_64_masks_full_width() {
        let node = rotate_node(64);
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&node).unwrap()).unwrap();
        let text = format!("{expr:?}");
        assert!(text.contains("0xFFFFFFFFFFFFFFFF"), "{text}");
    }

    #[test]
    fn test_rotate_out_of_range_width_is_dropped() {
        let node = rotate_node(65);
        let options = GenerationOptions {
            strict_input: true,
            ..GenerationOptions::default()
        };
        let mut t = RubyTransformer::new(&options);
        let expr = t.expr(JsNode::new(&node).unwrap()).unwrap();
        assert_eq!(expr, Expr::nil());
        assert_eq!(t.take_warnings().len(), 1);
    }

    #[test]
    fn test_cast_int32_restores_sign() {
        let expr = cast(Expr::local("x"), "int32");
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert_eq!(*right, hex(0x8000_0000));
    }

    #[test]
    fn test_pack_bytes_big_endian_shifts_first_byte_most() {
        let expr = pack_bytes(vec![Expr::local("a"), Expr::local("b")], true);
        let Expr::Binary { op, left, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::BitOr);
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Shl, .. }));
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::BitAnd, .. }));
    }

    #[test]
    fn test_replacement_text() {
        assert_eq!(replacement_text("<$1>"), "<\\1>");
        assert_eq!(replacement_text("[$&]"), "[\\0]");
        assert_eq!(replacement_text("$$5"), "$5");
        assert_eq!(replacement_text("a\\b"), "a\\\\b");
        assert_eq!(replacement_text("$x"), "$x");
    }

    #[test]
    fn test_split_on_space_uses_regex() {
        let sep = json!({"type": "Literal", "value": " "});
        let mut t = transformer();
        let expr = t.string_split(Expr::local("s"), JsNode::new(&sep));
        let Expr::Call { args, .. } = expr else {
            panic!("expected a call");
        };
        assert!(matches!(args[0], Expr::Regex { .. }));
        assert_eq!(args[1], Expr::number(-1));
    }

    #[test]
    fn test_json_requires_library() {
        let call = method_call(ident("JSON"), "stringify", vec![ident("data")]);
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        assert_eq!(
            expr,
            Expr::method(Expr::constant("JSON"), "generate", vec![Expr::local("data")])
        );
        assert!(t.imports.contains("json"));
    }
}
