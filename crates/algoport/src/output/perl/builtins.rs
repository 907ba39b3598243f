//! Library idioms.
//!
//! `Math`, `JSON`, `Object`, `console`, array and string methods, typed
//! arrays, the `OpCodes` helpers, and the IL operation nodes that name the
//! same operations. Everything maps onto core Perl, `POSIX`, `List::Util`,
//! `Scalar::Util` or `JSON::PP`.

use super::ast::*;
use super::transform::{
    Frame, PerlTransformer, binary, empty_regex, hex, infinity, int32, mask32, nan, not, ternary,
    unary,
};
use crate::input::JsNode;
use crate::lower::{Callback, CallbackBody, Rotation, is_string_like, rotation_width};
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

    /// Block function with the same meaning, for element-only callbacks.
    fn native(self) -> Option<BlockListOp> {
        match self {
            Iteration::Map => Some(BlockListOp::Map),
            Iteration::Filter => Some(BlockListOp::Grep),
            Iteration::Some => Some(BlockListOp::Any),
            Iteration::Every => Some(BlockListOp::All),
            Iteration::Find => Some(BlockListOp::First),
            Iteration::ForEach | Iteration::FindIndex | Iteration::Reduce => None,
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

impl PerlTransformer {
    // ---------------------------------------------------------------------
    // IL nodes
    // ---------------------------------------------------------------------

    /// IL operation in statement position, where mutating operations have a
    /// plain statement form.
    pub(super) fn il_stmt(&mut self, node: JsNode<'_>) -> Option<Vec<Stmt>> {
        let kind = node.str_field("ilNodeType")?;
        match kind {
            "ArrayForEach" => {
                let array = node.child("array")?;
                let callback = node.child("callback")?;
                Some(self.foreach_stmt(array, callback))
            }
            "ArraySort" => Some(self.sort_in_place(node.child("array")?, node.child("compareFn"))),
            "ArrayReverse" => Some(self.reverse_in_place(node.child("array")?)),
            "ArrayFill" => {
                let value = node.child("value")?;
                Some(self.fill_in_place(node.child("array")?, value, None, None))
            }
            "ArrayClear" => Some(self.clear_in_place(node.child("array")?)),
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
            "ArrayJoin" => self.array_join(node.child("array")?, node.child("separator")),
            "ArraySlice" => {
                self.array_slice(node.child("array")?, node.child("start"), node.child("end"))
            }
            "ArrayPush" | "ArrayUnshift" => {
                let name = if kind == "ArrayPush" { "push" } else { "unshift" };
                let mut args = vec![self.array_target(node.child("array")?)];
                args.extend(self.args(&node.children("elements")));
                Expr::call(name, args)
            }
            "ArrayPop" => Expr::call("pop", vec![self.array_target(node.child("array")?)]),
            "ArrayShift" => Expr::call("shift", vec![self.array_target(node.child("array")?)]),
            "ArrayReverse" => self.reverse_value(node.child("array")?),
            "ArrayLength" => self.length_of(node.child("array")?),
            "ArrayClear" => {
                let array = node.child("array")?;
                let list = self.array_target(array);
                Expr::assign(list, Expr::List(Vec::new()))
            }
            "ArrayConcat" => self.array_concat(node.child("array")?, &node.children("arrays")),
            "ArrayIndexOf" => self.array_index_of(node.child("array")?, node.child("value")?),
            "ArrayIncludes" => self.array_includes(node.child("array")?, node.child("value")?),
            "ArrayFill" => {
                let array = node.child("array")?;
                let value = node.child("value")?;
                self.fill_value(array, value, None, None)
            }
            "ArraySort" => self.sort_value(node.child("array")?, node.child("compareFn")),
            "ArrayCreation" => match (node.child("size"), node.child("elements")) {
                (Some(size), _) => self.sized_array(size, Expr::undef()),
                (None, _) => Expr::ArrayRef(self.args(&node.children("elements"))),
            },
            "TypedArrayCreation" => match (node.child("source"), node.child("size")) {
                (Some(source), _) => Expr::ArrayRef(vec![self.list_of(source)]),
                (None, Some(size)) => self.sized_or_copied(size, Expr::number(0)),
                (None, None) => Expr::ArrayRef(Vec::new()),
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
                let start = self.value(node.child("start")?);
                let end = node.child("end").map(|e| self.value(e));
                substring(string, start, end)
            }
            "StringCharAt" => {
                let string = self.value(node.child("string")?);
                let index = self.value(node.child("index")?);
                Expr::call("substr", vec![string, index, Expr::number(1)])
            }
            "StringCharCodeAt" => {
                let string = self.value(node.child("string")?);
                let index = self.value(node.child("index")?);
                char_code_at(string, index)
            }
            "StringIndexOf" => {
                let string = self.value(node.child("string")?);
                let search = self.value(node.child("search")?);
                Expr::call("index", vec![string, search])
            }
            "StringToUpperCase" => Expr::call("uc", vec![self.value(node.child("string")?)]),
            "StringToLowerCase" => Expr::call("lc", vec![self.value(node.child("string")?)]),
            "StringTrim" => trim(self.value(node.child("string")?), r"^\s+|\s+$"),
            "StringLength" => Expr::call("length", vec![self.value(node.child("string")?)]),
            "StringRepeat" => {
                let string = self.value(node.child("string")?);
                let count = self.value(node.child("count")?);
                binary(BinaryOp::Repeat, string, count)
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
                    return Some(Expr::undef());
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
                let invocant = Expr::scalar(self.invocant);
                if self
                    .class_ctx
                    .as_ref()
                    .is_some_and(|c| c.getters.contains(name))
                {
                    Expr::method(invocant, name, Vec::new())
                } else {
                    Expr::key(invocant, Expr::string(name))
                }
            }
            "ThisMethodCall" => {
                let method = il_name(node, "method")?;
                let args = self.args(&node.children("arguments"));
                Expr::method(Expr::scalar(self.invocant), method, args)
            }
            "ParentConstructorCall" => {
                let args = self.args(&node.children("arguments"));
                Expr::Call {
                    callee: Callee::Method {
                        invocant: Box::new(Expr::scalar("class")),
                        name: "SUPER::new".to_string(),
                    },
                    args,
                }
            }
            "ParentMethodCall" => {
                let method = il_name(node, "method")?;
                let args = self.args(&node.children("arguments"));
                Expr::method(
                    Expr::scalar(self.invocant),
                    &format!("SUPER::{method}"),
                    args,
                )
            }
            "MathCall" => {
                let method = il_name(node, "method")?;
                return self.math_call(method, &node.children("arguments"));
            }
            "Floor" | "Ceil" | "Abs" | "Sqrt" | "Round" | "Trunc" => {
                let argument = node.child("argument")?;
                let mut method = kind.to_string();
                method[..1].make_ascii_lowercase();
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
                let method = if kind == "JsonParse" { "decode" } else { "encode" };
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
            "ErrorCreation" => match node.child("message") {
                Some(message) => self.value(message),
                None => Expr::string(node.str_field("errorType").unwrap_or("Error")),
            },
            "DebugOutput" => {
                let method = node.str_field("method").unwrap_or("log");
                return self.console_call(method, &node.children("arguments"));
            }
            "HexEncode" => bytes_to_hex(self.list_of(node.child("bytes")?)),
            "HexDecode" => hex_to_bytes(self.value(node.child("string")?)),
            "StringToBytes" => string_to_bytes(self.value(node.child("string")?)),
            "BytesToString" => {
                let bytes = self.list_of(node.child("bytes")?);
                Expr::call("pack", vec![Expr::string("C*"), bytes])
            }
            _ => return None,
        };
        Some(expr)
    }

    fn value_of(&mut self, node: Option<JsNode<'_>>) -> Expr {
        node.map(|n| self.value(n)).unwrap_or_else(Expr::undef)
    }

    // ---------------------------------------------------------------------
    // Global objects and functions
    // ---------------------------------------------------------------------

    /// `Math.PI`, `Number.MAX_SAFE_INTEGER` and friends.
    pub(super) fn static_member(&mut self, object: &str, name: &str) -> Option<Expr> {
        let expr = match (object, name) {
            ("Math", "PI") => Expr::Raw("4 * atan2(1, 1)".to_string()),
            ("Math", "E") => Expr::call("exp", vec![Expr::number(1)]),
            ("Math", "LN2") => Expr::call("log", vec![Expr::number(2)]),
            ("Math", "LN10") => Expr::call("log", vec![Expr::number(10)]),
            ("Math", "LOG2E") => {
                binary(BinaryOp::Div, Expr::number(1), Expr::call("log", vec![Expr::number(2)]))
            }
            ("Math", "SQRT2") => Expr::call("sqrt", vec![Expr::number(2)]),
            ("Number", "MAX_SAFE_INTEGER") => Expr::number(9_007_199_254_740_991),
            ("Number", "MIN_SAFE_INTEGER") => Expr::number(-9_007_199_254_740_991),
            ("Number", "EPSILON") => Expr::Raw("2**-52".to_string()),
            ("Number", "MAX_VALUE") => Expr::Raw("1.7976931348623157e308".to_string()),
            ("Number", "POSITIVE_INFINITY") => infinity(),
            ("Number", "NEGATIVE_INFINITY") => unary(UnaryOp::Neg, infinity()),
            ("Number", "NaN") => nan(),
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
                    "stringify" => Some(self.json("encode", value)),
                    "parse" => Some(self.json("decode", value)),
                    _ => None,
                }
            }
            "Object" => self.object_call(method, args),
            "Array" => match method {
                "isArray" => Some(is_array(self.value_of(args.first().copied()))),
                "from" => {
                    let source = args.first()?;
                    match args.get(1) {
                        Some(mapper) => {
                            Some(self.iterate(Iteration::Map, *source, *mapper, None))
                        }
                        None => Some(Expr::ArrayRef(vec![self.list_of(*source)])),
                    }
                }
                "of" => Some(Expr::ArrayRef(self.args(args))),
                _ => None,
            },
            "String" => match method {
                "fromCharCode" | "fromCodePoint" => Some(self.from_char_code(args)),
                _ => None,
            },
            "Number" => match method {
                "isInteger" | "isSafeInteger" => {
                    let value = self.value_of(args.first().copied());
                    Some(binary(
                        BinaryOp::NumEq,
                        Expr::call("int", vec![value.clone()]),
                        value,
                    ))
                }
                "isNaN" | "parseInt" | "parseFloat" | "isFinite" => {
                    self.global_call(method, args)
                }
                _ => None,
            },
            "console" => self.console_call(method, args),
            "Date" if method == "now" => Some(binary(
                BinaryOp::Mul,
                Expr::call("time", Vec::new()),
                Expr::number(1000),
            )),
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
                let radix = args.get(1).and_then(|r| r.number_field("value"));
                match radix.map(|r| r as u32) {
                    Some(16) => Expr::call("hex", vec![value]),
                    Some(8) => Expr::call("oct", vec![value]),
                    Some(2) => Expr::call(
                        "oct",
                        vec![binary(BinaryOp::Concat, Expr::string("0b"), value)],
                    ),
                    _ => Expr::call("int", vec![value]),
                }
            }
            "parseFloat" | "Number" => binary(BinaryOp::Add, self.value_of(first), Expr::number(0)),
            "String" => binary(BinaryOp::Concat, Expr::string(""), self.value_of(first)),
            "Boolean" => ternary(self.value_of(first), Expr::number(1), Expr::number(0)),
            "isNaN" => {
                let value = self.value_of(first);
                binary(BinaryOp::NumNe, value.clone(), value)
            }
            "isFinite" => {
                let value = self.value_of(first);
                binary(
                    BinaryOp::And,
                    binary(BinaryOp::NumEq, value.clone(), value.clone()),
                    binary(BinaryOp::NumNe, Expr::call("abs", vec![value]), infinity()),
                )
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
                [] => Expr::ArrayRef(Vec::new()),
                [size] if size.js_type() != "ArrayExpression" && !is_string_like(*size) => {
                    self.sized_array(*size, Expr::undef())
                }
                _ => Expr::ArrayRef(self.args(args)),
            },
            _ if TYPED_ARRAYS.contains(&name) => match args.first() {
                Some(arg) => self.sized_or_copied(*arg, Expr::number(0)),
                None => Expr::ArrayRef(Vec::new()),
            },
            "Map" | "Set" | "WeakMap" | "WeakSet" | "Object" => {
                if !args.is_empty() {
                    self.drops
                        .lossy(format!("initial contents of new {name}() are dropped"));
                }
                Expr::HashRef(Vec::new())
            }
            "Date" => Expr::call("time", Vec::new()),
            "RegExp" => {
                let pattern = args.first().and_then(|a| a.string_value())?;
                let flags = args.get(1).and_then(|a| a.string_value()).unwrap_or("");
                Expr::Regex {
                    source: RegexSource::Pattern(pattern.to_string()),
                    flags: flags.chars().filter(|c| "imsx".contains(*c)).collect(),
                }
            }
            "String" | "Number" | "Boolean" => return self.global_call(name, args),
            _ => return None,
        };
        Some(expr)
    }

    pub(super) fn math_call(&mut self, method: &str, args: &[JsNode<'_>]) -> Option<Expr> {
        let mut values = self.args(args);
        let first = if values.is_empty() {
            Expr::undef()
        } else {
            values[0].clone()
        };
        let expr = match method {
            "floor" | "ceil" => {
                self.imports.require("POSIX");
                Expr::call(&format!("POSIX::{method}"), vec![first])
            }
            "round" => {
                self.imports.require("POSIX");
                Expr::call(
                    "POSIX::floor",
                    vec![binary(BinaryOp::Add, first, Expr::Raw("0.5".to_string()))],
                )
            }
            "trunc" => Expr::call("int", vec![first]),
            "abs" | "sqrt" | "log" | "exp" | "sin" | "cos" => Expr::call(method, vec![first]),
            "atan2" => Expr::call("atan2", values),
            "pow" => {
                let exponent = values.get(1).cloned().unwrap_or_else(|| Expr::number(1));
                binary(BinaryOp::Pow, first, exponent)
            }
            "min" | "max" => {
                self.imports.require("List::Util");
                Expr::call(&format!("List::Util::{method}"), values)
            }
            "random" => Expr::call("rand", Vec::new()),
            "sign" => binary(BinaryOp::NumCmp, first, Expr::number(0)),
            "imul" => {
                let second = values.pop().unwrap_or_else(|| Expr::number(0));
                self.drops
                    .lossy("Math.imul is exact only while the product fits in 53 bits".to_string());
                binary(BinaryOp::BitAnd, binary(BinaryOp::Mul, first, second), mask32())
            }
            "clz32" => {
                let masked = binary(BinaryOp::BitAnd, first, mask32());
                let width = Expr::call(
                    "length",
                    vec![Expr::call(
                        "sprintf",
                        vec![Expr::string("%b"), masked.clone()],
                    )],
                );
                ternary(
                    masked,
                    binary(BinaryOp::Sub, Expr::number(32), width),
                    Expr::number(32),
                )
            }
            "hypot" => Expr::call(
                "sqrt",
                vec![
                    values
                        .into_iter()
                        .map(|v| binary(BinaryOp::Pow, v, Expr::number(2)))
                        .reduce(|acc, v| binary(BinaryOp::Add, acc, v))
                        .unwrap_or_else(|| Expr::number(0)),
                ],
            ),
            other => {
                self.imports.require("POSIX");
                Expr::call(&format!("POSIX::{other}"), values)
            }
        };
        Some(expr)
    }

    /// `JSON::PP->new->canonical->allow_nonref->METHOD(value)`.
    fn json(&mut self, method: &str, value: Expr) -> Expr {
        self.imports.require("JSON::PP");
        let codec = Expr::Call {
            callee: Callee::ClassMethod {
                class: "JSON::PP".to_string(),
                name: "new".to_string(),
            },
            args: Vec::new(),
        };
        let codec = Expr::method(codec, "canonical", Vec::new());
        let codec = Expr::method(codec, "allow_nonref", Vec::new());
        Expr::method(codec, method, vec![value])
    }

    fn object_call(&mut self, method: &str, args: &[JsNode<'_>]) -> Option<Expr> {
        let object = args.first()?;
        let mut setup = Vec::new();
        let base = self.hash_base(*object);
        let base = self.bind(base, "obj", &mut setup);
        let hash = hash_expr(&base);
        let sorted_keys = Expr::call("sort", vec![Expr::call("keys", vec![hash.clone()])]);
        let current = Expr::key(base.clone(), Expr::scalar("_"));
        let expr = match method {
            "keys" | "getOwnPropertyNames" => Expr::ArrayRef(vec![sorted_keys]),
            "values" => Expr::ArrayRef(vec![block_list(BlockListOp::Map, current, sorted_keys)]),
            "entries" => Expr::ArrayRef(vec![block_list(
                BlockListOp::Map,
                Expr::ArrayRef(vec![Expr::scalar("_"), current]),
                sorted_keys,
            )]),
            "assign" => {
                let mut merged = vec![hash.clone()];
                for source in args.get(1..).unwrap_or_default() {
                    merged.push(self.hash_of(*source));
                }
                setup.push(Stmt::expr(Expr::assign(hash, Expr::List(merged))));
                hash_ref(&base)
            }
            "freeze" | "seal" | "preventExtensions" => hash_ref(&base),
            "create" => Expr::HashRef(Vec::new()),
            _ => return None,
        };
        Some(with_setup(setup, expr))
    }

    pub(super) fn console_call(&mut self, method: &str, args: &[JsNode<'_>]) -> Option<Expr> {
        let values = self.args(args);
        let line = match values.len() {
            0 => Expr::string(""),
            1 => values.into_iter().next().unwrap_or_else(|| Expr::string("")),
            _ => {
                let mut joined = vec![Expr::string(" ")];
                joined.extend(values);
                Expr::call("join", joined)
            }
        };
        let expr = match method {
            "log" | "info" | "debug" | "trace" if self.options.modern_syntax => {
                Expr::call("say", vec![line])
            }
            "log" | "info" | "debug" | "trace" => {
                Expr::call("print", vec![line, Expr::string("\n")])
            }
            "warn" | "error" => Expr::call("warn", vec![line, Expr::string("\n")]),
            _ => return None,
        };
        Some(expr)
    }

    fn from_char_code(&mut self, args: &[JsNode<'_>]) -> Expr {
        if args.iter().any(|a| a.js_type() == "SpreadElement") {
            let list = Expr::List(self.args(args));
            return Expr::call(
                "join",
                vec![
                    Expr::string(""),
                    block_list(
                        BlockListOp::Map,
                        Expr::call("chr", vec![Expr::scalar("_")]),
                        list,
                    ),
                ],
            );
        }
        self.args(args)
            .into_iter()
            .map(|code| Expr::call("chr", vec![code]))
            .reduce(|acc, c| binary(BinaryOp::Concat, acc, c))
            .unwrap_or_else(|| Expr::string(""))
    }

    // ---------------------------------------------------------------------
    // OpCodes
    // ---------------------------------------------------------------------

    fn opcodes_call(&mut self, method: &str, args: &[JsNode<'_>]) -> Expr {
        let mut values = self.args(args);
        let arg = |values: &mut Vec<Expr>, i: usize| {
            if i < values.len() {
                std::mem::replace(&mut values[i], Expr::undef())
            } else {
                Expr::undef()
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
                let mut setup = Vec::new();
                let left = self.bind(arg(&mut values, 0), "left", &mut setup);
                let right = self.bind(arg(&mut values, 1), "right", &mut setup);
                let index = Expr::scalar("_");
                let xored = binary(
                    BinaryOp::BitXor,
                    Expr::index(left.clone(), index.clone()),
                    Expr::index(right, index),
                );
                let indices = binary(BinaryOp::Range, Expr::number(0), Expr::LastIndex(Box::new(left)));
                with_setup(
                    setup,
                    Expr::ArrayRef(vec![block_list(BlockListOp::Map, xored, indices)]),
                )
            }
            "AnsiToBytes" | "StringToBytes" | "AsciiToBytes" => {
                string_to_bytes(arg(&mut values, 0))
            }
            "BytesToAnsi" | "BytesToString" => Expr::call(
                "pack",
                vec![Expr::string("C*"), list_expr(&arg(&mut values, 0))],
            ),
            "BytesToHex8" | "BytesToHex" => bytes_to_hex(list_expr(&arg(&mut values, 0))),
            "Hex8ToBytes" | "HexToBytes" => hex_to_bytes(arg(&mut values, 0)),
            "ToUint32" => binary(BinaryOp::BitAnd, arg(&mut values, 0), mask32()),
            "ToUint16" => binary(BinaryOp::BitAnd, arg(&mut values, 0), hex(0xFFFF)),
            "ToByte" | "ToUint8" => binary(BinaryOp::BitAnd, arg(&mut values, 0), hex(0xFF)),
            "CopyArray" => Expr::ArrayRef(vec![list_expr(&arg(&mut values, 0))]),
            "ClearArray" => {
                let mut setup = Vec::new();
                let array = self.bind(arg(&mut values, 0), "list", &mut setup);
                let list = list_expr(&array);
                setup.push(Stmt::expr(Expr::assign(
                    list.clone(),
                    binary(
                        BinaryOp::Repeat,
                        Expr::List(vec![Expr::number(0)]),
                        Expr::call("scalar", vec![list]),
                    ),
                )));
                with_setup(setup, array)
            }
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
        Expr::call(&format!("OpCodes::{method}"), values)
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
        let rotated = binary(
            BinaryOp::BitAnd,
            binary(BinaryOp::BitOr, first, second),
            mask,
        );
        with_setup(setup, rotated)
    }

    fn unpack_bytes(&mut self, value: Expr, bits: u32, big_endian: bool) -> Expr {
        let mut setup = Vec::new();
        let value = self.bind(value, "word", &mut setup);
        let mut shifts: Vec<u32> = (0..bits / 8).map(|i| i * 8).collect();
        if big_endian {
            shifts.reverse();
        }
        let bytes = shifts
            .into_iter()
            .map(|shift| {
                let shifted = if shift == 0 {
                    value.clone()
                } else {
                    binary(BinaryOp::Shr, value.clone(), Expr::number(shift as i64))
                };
                binary(BinaryOp::BitAnd, shifted, hex(0xFF))
            })
            .collect();
        with_setup(setup, Expr::ArrayRef(bytes))
    }

    /// Carry-less multiplication in GF(2^8) modulo x^8 + x^4 + x^3 + x + 1.
    fn gf256_mul(&mut self, a: Expr, b: Expr) -> Expr {
        let x = self.names.fresh("a");
        let y = self.names.fresh("b");
        let product = self.names.fresh("product");
        let high = self.names.fresh("high");
        let assign_op = |target: &str, op: BinaryOp, value: Expr| {
            Stmt::expr(Expr::Assign {
                target: Box::new(Expr::scalar(target)),
                op: Some(op),
                value: Box::new(value),
            })
        };
        let round = vec![
            Stmt::new(StmtKind::If {
                cond: binary(BinaryOp::BitAnd, Expr::scalar(&y), Expr::number(1)),
                then_branch: vec![assign_op(&product, BinaryOp::BitXor, Expr::scalar(&x))],
                elsifs: Vec::new(),
                else_branch: None,
            }),
            Stmt::my(
                &high,
                Shape::Scalar,
                Some(binary(BinaryOp::BitAnd, Expr::scalar(&x), hex(0x80))),
            ),
            Stmt::expr(Expr::assign(
                Expr::scalar(&x),
                binary(
                    BinaryOp::BitAnd,
                    binary(BinaryOp::Shl, Expr::scalar(&x), Expr::number(1)),
                    hex(0xFF),
                ),
            )),
            Stmt::new(StmtKind::If {
                cond: Expr::scalar(&high),
                then_branch: vec![assign_op(&x, BinaryOp::BitXor, hex(0x1B))],
                elsifs: Vec::new(),
                else_branch: None,
            }),
            assign_op(&y, BinaryOp::Shr, Expr::number(1)),
        ];
        Expr::Do(vec![
            Stmt::my(&x, Shape::Scalar, Some(binary(BinaryOp::BitAnd, a, hex(0xFF)))),
            Stmt::my(&y, Shape::Scalar, Some(binary(BinaryOp::BitAnd, b, hex(0xFF)))),
            Stmt::my(&product, Shape::Scalar, Some(Expr::number(0))),
            Stmt::new(StmtKind::Foreach {
                label: None,
                var: self.names.fresh("round"),
                list: binary(BinaryOp::Range, Expr::number(1), Expr::number(8)),
                body: round,
            }),
            Stmt::expr(Expr::scalar(&product)),
        ])
    }

    // ---------------------------------------------------------------------
    // Methods on values
    // ---------------------------------------------------------------------

    /// Statement forms of mutating methods.
    pub(super) fn method_stmt(
        &mut self,
        receiver: JsNode<'_>,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Vec<Stmt>> {
        if is_string_like(receiver) || receiver.js_type() == "Super" {
            return None;
        }
        match (method, args) {
            ("forEach", [callback, ..]) => Some(self.foreach_stmt(receiver, *callback)),
            ("sort", _) => Some(self.sort_in_place(receiver, args.first().copied())),
            ("reverse", []) => Some(self.reverse_in_place(receiver)),
            ("fill", [value, rest @ ..]) => Some(self.fill_in_place(
                receiver,
                *value,
                rest.first().copied(),
                rest.get(1).copied(),
            )),
            _ => None,
        }
    }

    /// `receiver.method(args)` for string and array methods. `None` leaves
    /// it a plain method call.
    pub(super) fn method_call(
        &mut self,
        receiver: JsNode<'_>,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Expr> {
        let receiver = receiver.unwrapped();
        if STRING_ONLY_METHODS.contains(&method) || is_string_like(receiver) {
            if let Some(expr) = self.string_method(receiver, method, args) {
                return Some(expr);
            }
        }
        self.array_method(receiver, method, args)
    }

    fn string_method(
        &mut self,
        receiver: JsNode<'_>,
        method: &str,
        args: &[JsNode<'_>],
    ) -> Option<Expr> {
        let first = args.first().copied();
        let string = self.value(receiver);
        let expr = match method {
            "charAt" => Expr::call(
                "substr",
                vec![string, self.value_of(first), Expr::number(1)],
            ),
            "charCodeAt" | "codePointAt" => {
                let index = first.map(|i| self.value(i)).unwrap_or_else(|| Expr::number(0));
                char_code_at(string, index)
            }
            "substring" => {
                let start = self.value_of(first);
                let end = args.get(1).map(|e| self.value(*e));
                substring(string, start, end)
            }
            "slice" => {
                let start = self.value_of(first);
                match args.get(1) {
                    Some(end) if is_negative_literal(*end) => {
                        let end = self.value(*end);
                        Expr::call("substr", vec![string, start, end])
                    }
                    Some(end) => {
                        let end = self.value(*end);
                        substring(string, start, Some(end))
                    }
                    None => Expr::call("substr", vec![string, start]),
                }
            }
            "substr" => {
                let mut call = vec![string, self.value_of(first)];
                if let Some(length) = args.get(1) {
                    call.push(self.value(*length));
                }
                Expr::call("substr", call)
            }
            "indexOf" => Expr::call("index", vec![string, self.value_of(first)]),
            "lastIndexOf" => Expr::call("rindex", vec![string, self.value_of(first)]),
            "includes" => binary(
                BinaryOp::NumNe,
                Expr::call("index", vec![string, self.value_of(first)]),
                Expr::number(-1),
            ),
            "startsWith" => binary(
                BinaryOp::NumEq,
                Expr::call("index", vec![string, self.value_of(first)]),
                Expr::number(0),
            ),
            "endsWith" => {
                let mut setup = Vec::new();
                let suffix = self.value_of(first);
                let suffix = self.bind(suffix, "suffix", &mut setup);
                let tail = Expr::call(
                    "substr",
                    vec![
                        string,
                        unary(UnaryOp::Neg, Expr::call("length", vec![suffix.clone()])),
                    ],
                );
                with_setup(setup, binary(BinaryOp::StrEq, tail, suffix))
            }
            "toUpperCase" | "toLocaleUpperCase" => Expr::call("uc", vec![string]),
            "toLowerCase" | "toLocaleLowerCase" => Expr::call("lc", vec![string]),
            "trim" => trim(string, r"^\s+|\s+$"),
            "trimStart" => trim(string, r"^\s+"),
            "trimEnd" => trim(string, r"\s+$"),
            "repeat" => binary(BinaryOp::Repeat, string, self.value_of(first)),
            "padStart" | "padEnd" => {
                let mut setup = Vec::new();
                let string = self.bind(string, "text", &mut setup);
                let width = self.value_of(first);
                let fill = args
                    .get(1)
                    .map(|f| self.value(*f))
                    .unwrap_or_else(|| Expr::string(" "));
                let padding = binary(
                    BinaryOp::Repeat,
                    fill,
                    binary(
                        BinaryOp::Sub,
                        width,
                        Expr::call("length", vec![string.clone()]),
                    ),
                );
                let padded = if method == "padStart" {
                    binary(BinaryOp::Concat, padding, string)
                } else {
                    binary(BinaryOp::Concat, string, padding)
                };
                with_setup(setup, padded)
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
                .fold(string, |acc, part| binary(BinaryOp::Concat, acc, part)),
            "localeCompare" => binary(BinaryOp::StrCmp, string, self.value_of(first)),
            "toString" | "valueOf" => string,
            _ => return None,
        };
        Some(expr)
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
        let first = args.first().copied();
        let expr = match method {
            "push" | "unshift" => {
                let mut call = vec![self.array_target(receiver)];
                call.extend(self.args(args));
                Expr::call(method, call)
            }
            "pop" | "shift" => Expr::call(method, vec![self.array_target(receiver)]),
            "slice" => self.array_slice(receiver, first, args.get(1).copied()),
            "splice" => {
                let mut call = vec![self.array_target(receiver)];
                call.extend(self.args(args));
                Expr::ArrayRef(vec![Expr::call("splice", call)])
            }
            "concat" => self.array_concat(receiver, args),
            "join" => self.array_join(receiver, first),
            "indexOf" => self.array_index_of(receiver, first?),
            "lastIndexOf" => {
                let mut setup = Vec::new();
                let base = self.array_base(receiver);
                let base = self.bind(base, "list", &mut setup);
                let value = self.value(first?);
                let test = self.element_equals(
                    Expr::index(base.clone(), Expr::scalar("_")),
                    value,
                    first?,
                );
                self.imports.import("List::Util", "first");
                let indices = Expr::call(
                    "reverse",
                    vec![binary(
                        BinaryOp::Range,
                        Expr::number(0),
                        Expr::LastIndex(Box::new(base)),
                    )],
                );
                with_setup(
                    setup,
                    binary(
                        BinaryOp::DefinedOr,
                        block_list(BlockListOp::First, test, indices),
                        Expr::number(-1),
                    ),
                )
            }
            "includes" => self.array_includes(receiver, first?),
            "reverse" => self.reverse_value(receiver),
            "sort" => self.sort_value(receiver, first),
            "fill" => self.fill_value(receiver, first?, args.get(1).copied(), args.get(2).copied()),
            "at" => {
                let base = self.array_base(receiver);
                Expr::index(base, self.value(first?))
            }
            "toString" => {
                let list = self.list_of(receiver);
                Expr::call("join", vec![Expr::string(","), list])
            }
            "keys" if args.is_empty() => {
                let base = self.array_base(receiver);
                Expr::ArrayRef(vec![binary(
                    BinaryOp::Range,
                    Expr::number(0),
                    Expr::LastIndex(Box::new(base)),
                )])
            }
            _ => return None,
        };
        Some(expr)
    }

    // ---------------------------------------------------------------------
    // Array helpers
    // ---------------------------------------------------------------------

    /// `my $__stem_N = EXPR;` into `setup` unless `expr` is cheap to repeat.
    pub(super) fn bind(&mut self, expr: Expr, stem: &str, setup: &mut Vec<Stmt>) -> Expr {
        if is_simple(&expr) {
            return expr;
        }
        let name = self.names.fresh(stem);
        setup.push(Stmt::my(&name, Shape::Scalar, Some(expr)));
        Expr::scalar(&name)
    }

    /// Array index base for `array`, bound to a temporary when evaluating it
    /// twice would repeat work.
    fn stable_array(&mut self, array: JsNode<'_>, setup: &mut Vec<Stmt>) -> Expr {
        let base = self.array_base(array);
        self.bind(base, "list", setup)
    }

    /// Array method taking a callback. Element-only expression callbacks use
    /// the native block function; the rest become an indexed loop inside
    /// `do { }`.
    pub(super) fn iterate(
        &mut self,
        op: Iteration,
        array: JsNode<'_>,
        callback: JsNode<'_>,
        initial: Option<JsNode<'_>>,
    ) -> Expr {
        let cb = Callback::from_node(callback);
        if let Some(cb) = cb
            && cb.is_element_only()
            && let Some(block_op) = op.native()
        {
            let list = self.list_of(array);
            return self.native_iteration(op, block_op, cb, list);
        }
        self.indexed_iteration(op, array, callback, cb, initial)
    }

    fn native_iteration(
        &mut self,
        op: Iteration,
        block_op: BlockListOp,
        cb: Callback<'_>,
        list: Expr,
    ) -> Expr {
        self.scopes.push();
        let mut body = Vec::new();
        if let Some(name) = cb.param_name(0) {
            self.scopes.declare(name, Shape::Scalar);
            body.push(Stmt::my(name, Shape::Scalar, Some(Expr::scalar("_"))));
        }
        let result = self.value_of(cb.result_expr());
        self.scopes.pop();
        if matches!(
            block_op,
            BlockListOp::Any | BlockListOp::All | BlockListOp::First
        ) {
            self.imports.import("List::Util", block_op.name());
        }
        let block = Expr::BlockList {
            op: block_op,
            body,
            result: Box::new(result),
            list: Box::new(list),
        };
        match op {
            Iteration::Map | Iteration::Filter => Expr::ArrayRef(vec![block]),
            _ => block,
        }
    }

    fn indexed_iteration(
        &mut self,
        op: Iteration,
        array: JsNode<'_>,
        callback: JsNode<'_>,
        cb: Option<Callback<'_>>,
        initial: Option<JsNode<'_>>,
    ) -> Expr {
        let mut setup = Vec::new();
        let list = self.stable_array(array, &mut setup);
        let index = self.names.fresh("i");
        let result = self.names.fresh("result");
        let element = Expr::index(list.clone(), Expr::scalar(&index));

        let collects = matches!(op, Iteration::Map | Iteration::Filter);
        let (init, start) = match (op, initial) {
            (Iteration::Reduce, Some(initial)) => (Some(self.value(initial)), 0),
            (Iteration::Reduce, None) => (Some(Expr::index(list.clone(), Expr::number(0))), 1),
            (Iteration::Some, _) => (Some(Expr::number(0)), 0),
            (Iteration::Every, _) => (Some(Expr::number(1)), 0),
            (Iteration::FindIndex, _) => (Some(Expr::number(-1)), 0),
            _ => (None, 0),
        };
        if collects {
            setup.push(Stmt::my(&result, Shape::List, None));
        } else if op != Iteration::ForEach {
            setup.push(Stmt::my(&result, Shape::Scalar, init));
        }

        let mut positional = Vec::new();
        if op == Iteration::Reduce {
            positional.push(Expr::scalar(&result));
        }
        positional.push(element.clone());
        positional.push(Expr::scalar(&index));
        positional.push(array_ref(&list));

        // Inline an expression body with its parameters bound in order;
        // anything else is called as a code reference.
        let inline = cb.filter(|c| {
            c.result_expr().is_some() && c.params().iter().all(|p| p.name().is_some())
        });
        let mut loop_body = Vec::new();
        let value = match inline {
            Some(cb) => {
                self.scopes.push();
                for (param, arg) in cb.params().iter().zip(positional) {
                    let Some(name) = param.name() else { continue };
                    self.scopes.declare(name, Shape::Scalar);
                    loop_body.push(Stmt::my(name, Shape::Scalar, Some(arg)));
                }
                let value = self.value_of(cb.result_expr());
                self.scopes.pop();
                value
            }
            None => {
                let code = self.value(callback);
                let code = self.bind(code, "fn", &mut setup);
                Expr::Call {
                    callee: Callee::Code(Box::new(code)),
                    args: positional,
                }
            }
        };

        let found = |then_branch: Vec<Stmt>, cond: Expr| {
            Stmt::new(StmtKind::If {
                cond,
                then_branch,
                elsifs: Vec::new(),
                else_branch: None,
            })
        };
        let last = || {
            Stmt::new(StmtKind::LoopControl {
                kind: LoopControl::Last,
                label: None,
            })
        };
        let set_result = |value: Expr| Stmt::expr(Expr::assign(Expr::scalar(&result), value));
        let result_list = Expr::var(&result, Shape::List);
        match op {
            Iteration::Map => loop_body.push(Stmt::expr(Expr::call(
                "push",
                vec![result_list.clone(), value],
            ))),
            Iteration::Filter => loop_body.push(found(
                vec![Stmt::expr(Expr::call(
                    "push",
                    vec![result_list.clone(), element.clone()],
                ))],
                value,
            )),
            Iteration::ForEach => loop_body.push(Stmt::expr(value)),
            Iteration::Some => {
                loop_body.push(found(vec![set_result(Expr::number(1)), last()], value))
            }
            Iteration::Every => {
                loop_body.push(found(vec![set_result(Expr::number(0)), last()], not(value)))
            }
            Iteration::Find => {
                loop_body.push(found(vec![set_result(element.clone()), last()], value))
            }
            Iteration::FindIndex => loop_body.push(found(
                vec![set_result(Expr::scalar(&index)), last()],
                value,
            )),
            Iteration::Reduce => loop_body.push(set_result(value)),
        }

        setup.push(Stmt::new(StmtKind::Foreach {
            label: None,
            var: index,
            list: binary(
                BinaryOp::Range,
                Expr::number(start),
                Expr::LastIndex(Box::new(list)),
            ),
            body: loop_body,
        }));
        let value = match op {
            Iteration::Map | Iteration::Filter => unary(UnaryOp::Ref, result_list),
            Iteration::ForEach => Expr::undef(),
            _ => Expr::scalar(&result),
        };
        setup.push(Stmt::expr(value));
        Expr::Do(setup)
    }

    /// `forEach` as a statement: a plain `for` loop whose body is the
    /// callback body, with `return` continuing to the next element.
    pub(super) fn foreach_stmt(&mut self, array: JsNode<'_>, callback: JsNode<'_>) -> Vec<Stmt> {
        let Some(cb) = Callback::from_node(callback)
            .filter(|c| c.params().iter().all(|p| p.name().is_some()))
        else {
            let expr = self.iterate(Iteration::ForEach, array, callback, None);
            return vec![Stmt::expr(expr)];
        };
        let params = cb.params();
        let mut setup = Vec::new();
        let mut prelude = Vec::new();
        self.scopes.push();
        let (var, list) = if params.len() <= 1 {
            let list = self.list_of(array);
            let var = match cb.param_name(0) {
                Some(name) => name.to_string(),
                None => self.names.fresh("item"),
            };
            self.scopes.declare(&var, Shape::Scalar);
            (var, list)
        } else {
            let list = self.stable_array(array, &mut setup);
            let index = self.names.fresh("i");
            let positional = [
                Expr::index(list.clone(), Expr::scalar(&index)),
                Expr::scalar(&index),
                array_ref(&list),
            ];
            for (param, arg) in params.iter().zip(positional) {
                let Some(name) = param.name() else { continue };
                self.scopes.declare(name, Shape::Scalar);
                prelude.push(Stmt::my(name, Shape::Scalar, Some(arg)));
            }
            let range = binary(
                BinaryOp::Range,
                Expr::number(0),
                Expr::LastIndex(Box::new(list)),
            );
            (index, range)
        };

        self.frames.push(Frame {
            switch: false,
            label: None,
            callback: true,
        });
        let saved = std::mem::replace(&mut self.return_as_next, true);
        let mut body = prelude;
        match cb.body {
            CallbackBody::Block(block) => body.extend(self.stmts(&block.children("body"))),
            CallbackBody::Expr(expr) => body.extend(self.expr_stmt(expr)),
        }
        self.return_as_next = saved;
        let label = self.frames.pop().and_then(|f| f.label);
        self.scopes.pop();

        let foreach = Stmt::new(StmtKind::Foreach {
            label,
            var,
            list,
            body,
        });
        if setup.is_empty() {
            vec![foreach]
        } else {
            setup.push(foreach);
            vec![Stmt::new(StmtKind::Block {
                label: None,
                body: setup,
            })]
        }
    }

    /// `sort BLOCK LIST` for a comparator, plus any setup it needs.
    fn sorted(&mut self, list: Expr, compare: Option<JsNode<'_>>, setup: &mut Vec<Stmt>) -> Expr {
        let Some(compare) = compare else {
            return Expr::call("sort", vec![list]);
        };
        let cb = Callback::from_node(compare).filter(|c| {
            c.params().len() == 2
                && c.params().iter().all(|p| p.name().is_some())
                && c.result_expr().is_some()
        });
        let (body, result) = match cb {
            Some(cb) => {
                let left = cb.param_name(0).unwrap_or("a");
                let right = cb.param_name(1).unwrap_or("b");
                self.scopes.push();
                self.scopes.declare(left, Shape::Scalar);
                self.scopes.declare(right, Shape::Scalar);
                let body = if (left, right) == ("a", "b") {
                    Vec::new()
                } else {
                    vec![Stmt::new(StmtKind::VarDecl {
                        targets: vec![
                            VarTarget {
                                name: left.to_string(),
                                shape: Shape::Scalar,
                            },
                            VarTarget {
                                name: right.to_string(),
                                shape: Shape::Scalar,
                            },
                        ],
                        init: Some(Expr::List(vec![Expr::scalar("a"), Expr::scalar("b")])),
                        scope: DeclScope::My,
                    })]
                };
                let result = self.value_of(cb.result_expr());
                self.scopes.pop();
                (body, result)
            }
            None => {
                let code = self.value(compare);
                let code = self.bind(code, "cmp", setup);
                let call = Expr::Call {
                    callee: Callee::Code(Box::new(code)),
                    args: vec![Expr::scalar("a"), Expr::scalar("b")],
                };
                (Vec::new(), call)
            }
        };
        Expr::BlockList {
            op: BlockListOp::Sort,
            body,
            result: Box::new(result),
            list: Box::new(list),
        }
    }

    fn sort_in_place(&mut self, array: JsNode<'_>, compare: Option<JsNode<'_>>) -> Vec<Stmt> {
        let mut setup = Vec::new();
        let target = self.array_target(array);
        let sorted = self.sorted(target.clone(), compare, &mut setup);
        setup.push(Stmt::expr(Expr::assign(target, sorted)));
        setup
    }

    fn sort_value(&mut self, array: JsNode<'_>, compare: Option<JsNode<'_>>) -> Expr {
        let mut setup = Vec::new();
        let base = self.stable_array(array, &mut setup);
        let list = list_expr(&base);
        let sorted = self.sorted(list.clone(), compare, &mut setup);
        setup.push(Stmt::expr(Expr::assign(list, sorted)));
        setup.push(Stmt::expr(array_ref(&base)));
        Expr::Do(setup)
    }

    fn reverse_in_place(&mut self, array: JsNode<'_>) -> Vec<Stmt> {
        let target = self.array_target(array);
        vec![Stmt::expr(Expr::assign(
            target.clone(),
            Expr::call("reverse", vec![target]),
        ))]
    }

    fn reverse_value(&mut self, array: JsNode<'_>) -> Expr {
        self.in_place_value(array, |setup, list| {
            (setup, Expr::assign(list.clone(), Expr::call("reverse", vec![list])))
        })
    }

    /// Run a mutation on `array` and yield the array, as a `do { }` block.
    fn in_place_value(
        &mut self,
        array: JsNode<'_>,
        mutate: impl FnOnce(Vec<Stmt>, Expr) -> (Vec<Stmt>, Expr),
    ) -> Expr {
        let mut setup = Vec::new();
        let base = self.stable_array(array, &mut setup);
        let (mut setup, mutation) = mutate(setup, list_expr(&base));
        setup.push(Stmt::expr(mutation));
        setup.push(Stmt::expr(array_ref(&base)));
        Expr::Do(setup)
    }

    /// `@{$a}[START .. END - 1] = (VALUE) x (END - START)`, or the whole
    /// array when no range is given.
    fn fill_stmt(
        &mut self,
        base: &Expr,
        value: JsNode<'_>,
        start: Option<JsNode<'_>>,
        end: Option<JsNode<'_>>,
    ) -> Stmt {
        let value = Expr::List(vec![self.value(value)]);
        let list = list_expr(base);
        if start.is_none() && end.is_none() {
            let count = Expr::call("scalar", vec![list.clone()]);
            return Stmt::expr(Expr::assign(list, binary(BinaryOp::Repeat, value, count)));
        }
        let start = start
            .map(|s| self.value(s))
            .unwrap_or_else(|| Expr::number(0));
        let end = end
            .map(|e| self.value(e))
            .unwrap_or_else(|| Expr::call("scalar", vec![list.clone()]));
        let indices = binary(
            BinaryOp::Range,
            start.clone(),
            binary(BinaryOp::Sub, end.clone(), Expr::number(1)),
        );
        let count = binary(BinaryOp::Sub, end, start);
        Stmt::expr(Expr::assign(
            Expr::Slice {
                list: Box::new(slice_base(base)),
                indices: Box::new(indices),
            },
            binary(BinaryOp::Repeat, value, count),
        ))
    }

    fn fill_in_place(
        &mut self,
        array: JsNode<'_>,
        value: JsNode<'_>,
        start: Option<JsNode<'_>>,
        end: Option<JsNode<'_>>,
    ) -> Vec<Stmt> {
        let mut setup = Vec::new();
        let base = self.stable_array(array, &mut setup);
        let fill = self.fill_stmt(&base, value, start, end);
        setup.push(fill);
        if setup.len() == 1 {
            setup
        } else {
            vec![Stmt::new(StmtKind::Block {
                label: None,
                body: setup,
            })]
        }
    }

    fn fill_value(
        &mut self,
        array: JsNode<'_>,
        value: JsNode<'_>,
        start: Option<JsNode<'_>>,
        end: Option<JsNode<'_>>,
    ) -> Expr {
        // `new Array(n).fill(v)` builds the filled array directly.
        let array = array.unwrapped();
        let constructor_args = array.children("arguments");
        if start.is_none()
            && end.is_none()
            && array.js_type() == "NewExpression"
            && array.child("callee").and_then(|c| c.name()).is_some_and(|n| {
                n == "Array" || TYPED_ARRAYS.contains(&n)
            })
            && let [size] = constructor_args.as_slice()
            && size.js_type() != "ArrayExpression"
        {
            let fill = self.value(value);
            return self.sized_array(*size, fill);
        }
        let mut setup = Vec::new();
        let base = self.stable_array(array, &mut setup);
        let fill = self.fill_stmt(&base, value, start, end);
        setup.push(fill);
        setup.push(Stmt::expr(array_ref(&base)));
        Expr::Do(setup)
    }

    fn clear_in_place(&mut self, array: JsNode<'_>) -> Vec<Stmt> {
        let target = self.array_target(array);
        vec![Stmt::expr(Expr::assign(target, Expr::List(Vec::new())))]
    }

    /// `[(FILL) x SIZE]`.
    fn sized_array(&mut self, size: JsNode<'_>, fill: Expr) -> Expr {
        let size = self.value(size);
        Expr::ArrayRef(vec![binary(
            BinaryOp::Repeat,
            Expr::List(vec![fill]),
            size,
        )])
    }

    /// Typed-array constructor argument: a length or a source array. When
    /// the input does not say which, the generated code checks `ref`.
    fn sized_or_copied(&mut self, arg: JsNode<'_>, fill: Expr) -> Expr {
        let arg = arg.unwrapped();
        let is_array_type = |t: &str| t == "array" || t.ends_with("[]") || t.ends_with("Array");
        if arg.js_type() == "ArrayExpression"
            || self.is_list_var(arg)
            || arg.result_type().is_some_and(is_array_type)
        {
            return Expr::ArrayRef(vec![self.list_of(arg)]);
        }
        let numeric = arg.result_type().is_some()
            || matches!(
                arg.js_type(),
                "Literal" | "BinaryExpression" | "UpdateExpression" | "UnaryExpression"
            )
            || arg.static_member_name() == Some("length");
        if numeric {
            return self.sized_array(arg, fill);
        }
        let mut setup = Vec::new();
        let value = self.value(arg);
        let value = self.bind(value, "init", &mut setup);
        let copied = Expr::ArrayRef(vec![Expr::deref(value.clone(), Shape::List)]);
        let sized = Expr::ArrayRef(vec![binary(
            BinaryOp::Repeat,
            Expr::List(vec![fill]),
            value.clone(),
        )]);
        with_setup(
            setup,
            ternary(Expr::call("ref", vec![value]), copied, sized),
        )
    }

    fn array_join(&mut self, array: JsNode<'_>, separator: Option<JsNode<'_>>) -> Expr {
        let separator = separator
            .map(|s| self.value(s))
            .unwrap_or_else(|| Expr::string(","));
        let list = self.list_of(array);
        Expr::call("join", vec![separator, list])
    }

    fn array_slice(
        &mut self,
        array: JsNode<'_>,
        start: Option<JsNode<'_>>,
        end: Option<JsNode<'_>>,
    ) -> Expr {
        let mut setup = Vec::new();
        let base = self.stable_array(array, &mut setup);
        let Some(start_node) = start else {
            return with_setup(setup, Expr::ArrayRef(vec![list_expr(&base)]));
        };
        let length = Expr::call("scalar", vec![list_expr(&base)]);
        let from_end = |node: JsNode<'_>, value: Expr| {
            if is_negative_literal(node) {
                binary(BinaryOp::Add, length.clone(), value)
            } else {
                value
            }
        };
        let start = self.value(start_node);
        let start = from_end(start_node, start);
        let last = match end {
            Some(end_node) => {
                let end = self.value(end_node);
                binary(BinaryOp::Sub, from_end(end_node, end), Expr::number(1))
            }
            None => Expr::LastIndex(Box::new(base.clone())),
        };
        let slice = Expr::Slice {
            list: Box::new(slice_base(&base)),
            indices: Box::new(binary(BinaryOp::Range, start, last)),
        };
        with_setup(setup, Expr::ArrayRef(vec![slice]))
    }

    fn array_concat(&mut self, array: JsNode<'_>, others: &[JsNode<'_>]) -> Expr {
        let mut items = vec![self.list_of(array)];
        for other in others {
            let other = other.unwrapped();
            let scalar_literal = other.js_type() == "Literal" || is_string_like(other);
            items.push(if scalar_literal {
                self.value(other)
            } else {
                self.list_of(other)
            });
        }
        Expr::ArrayRef(items)
    }

    /// `==` or `eq` depending on the searched value.
    fn element_equals(&mut self, element: Expr, value: Expr, value_node: JsNode<'_>) -> Expr {
        let op = if is_string_like(value_node) {
            BinaryOp::StrEq
        } else {
            BinaryOp::NumEq
        };
        binary(op, element, value)
    }

    fn array_index_of(&mut self, array: JsNode<'_>, value_node: JsNode<'_>) -> Expr {
        let mut setup = Vec::new();
        let base = self.stable_array(array, &mut setup);
        let value = self.value(value_node);
        let value = self.bind(value, "needle", &mut setup);
        let test = self.element_equals(
            Expr::index(base.clone(), Expr::scalar("_")),
            value,
            value_node,
        );
        self.imports.import("List::Util", "first");
        let indices = binary(
            BinaryOp::Range,
            Expr::number(0),
            Expr::LastIndex(Box::new(base)),
        );
        with_setup(
            setup,
            binary(
                BinaryOp::DefinedOr,
                block_list(BlockListOp::First, test, indices),
                Expr::number(-1),
            ),
        )
    }

    fn array_includes(&mut self, array: JsNode<'_>, value_node: JsNode<'_>) -> Expr {
        let mut setup = Vec::new();
        let value = self.value(value_node);
        let value = self.bind(value, "needle", &mut setup);
        let test = self.element_equals(Expr::scalar("_"), value, value_node);
        let list = self.list_of(array);
        self.imports.import("List::Util", "any");
        let found = block_list(BlockListOp::Any, test, list);
        with_setup(
            setup,
            ternary(found, Expr::number(1), Expr::number(0)),
        )
    }

    // ---------------------------------------------------------------------
    // String helpers
    // ---------------------------------------------------------------------

    fn string_split(&mut self, string: Expr, separator: Option<JsNode<'_>>) -> Expr {
        let Some(separator) = separator.map(JsNode::unwrapped) else {
            return Expr::ArrayRef(vec![string]);
        };
        let pattern = match separator.string_value() {
            Some("") => {
                return Expr::ArrayRef(vec![Expr::call("split", vec![empty_regex(), string])]);
            }
            Some(text) => Expr::Regex {
                source: RegexSource::Pattern(quote_meta(text)),
                flags: String::new(),
            },
            None if separator.has("regex") => self.value(separator),
            None => Expr::Regex {
                source: RegexSource::Quoted(Box::new(self.value(separator))),
                flags: String::new(),
            },
        };
        Expr::ArrayRef(vec![Expr::call(
            "split",
            vec![pattern, string, Expr::number(-1)],
        )])
    }

    fn string_replace(
        &mut self,
        string: Expr,
        pattern: JsNode<'_>,
        replacement: JsNode<'_>,
        all: bool,
    ) -> Expr {
        let pattern = pattern.unwrapped();
        let (source, global) = match pattern.field("regex") {
            Some(regex) => {
                let text = regex.get("pattern").and_then(Value::as_str).unwrap_or("");
                let flags = regex.get("flags").and_then(Value::as_str).unwrap_or("");
                let mut text = text.to_string();
                let inline: String = flags.chars().filter(|c| "imsx".contains(*c)).collect();
                if !inline.is_empty() {
                    text = format!("(?{inline}){text}");
                }
                (RegexSource::Pattern(text), all || flags.contains('g'))
            }
            None => match pattern.string_value() {
                Some(text) => (RegexSource::Pattern(quote_meta(text)), all),
                None => (RegexSource::Quoted(Box::new(self.value(pattern))), all),
            },
        };
        let replacement = match replacement.unwrapped().string_value() {
            Some(text) => replacement_expr(text),
            None => {
                if super::transform::is_function(replacement) {
                    self.drops.lossy(
                        "replacement callbacks receive the whole match only".to_string(),
                    );
                    let code = self.value(replacement);
                    Expr::Call {
                        callee: Callee::Code(Box::new(code)),
                        args: vec![Expr::scalar("&")],
                    }
                } else {
                    self.value(replacement)
                }
            }
        };
        Expr::Substitute {
            target: Box::new(string),
            source,
            replacement: Box::new(replacement),
            global,
        }
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
        Expr::Literal(_) | Expr::Var { .. } => true,
        Expr::Index { base, index } => is_simple(base) && is_simple(index),
        Expr::Key { base, key } => is_simple(base) && is_simple(key),
        _ => false,
    }
}

/// `do { SETUP; RESULT }`, or just the result without setup.
pub(super) fn with_setup(setup: Vec<Stmt>, result: Expr) -> Expr {
    if setup.is_empty() {
        return result;
    }
    let mut body = setup;
    body.push(Stmt::expr(result));
    Expr::Do(body)
}

fn block_list(op: BlockListOp, result: Expr, list: Expr) -> Expr {
    Expr::BlockList {
        op,
        body: Vec::new(),
        result: Box::new(result),
        list: Box::new(list),
    }
}

/// Elements of an array base: `@x` or `@{EXPR}`.
fn list_expr(base: &Expr) -> Expr {
    if base.is_list_var() {
        base.clone()
    } else {
        Expr::deref(base.clone(), Shape::List)
    }
}

/// Base for an `@{..}[..]` slice: the variable itself or the reference.
fn slice_base(base: &Expr) -> Expr {
    base.clone()
}

/// A reference to the array: `\@x` or the reference itself.
fn array_ref(base: &Expr) -> Expr {
    if base.is_list_var() {
        unary(UnaryOp::Ref, base.clone())
    } else {
        base.clone()
    }
}

fn hash_expr(base: &Expr) -> Expr {
    if base.is_map_var() {
        base.clone()
    } else {
        Expr::deref(base.clone(), Shape::Map)
    }
}

fn hash_ref(base: &Expr) -> Expr {
    if base.is_map_var() {
        unary(UnaryOp::Ref, base.clone())
    } else {
        base.clone()
    }
}

fn is_negative_literal(node: JsNode<'_>) -> bool {
    let node = node.unwrapped();
    node.js_type() == "UnaryExpression"
        && node.str_field("operator") == Some("-")
        && node
            .child("argument")
            .is_some_and(|a| a.number_field("value").is_some())
}

fn is_array(value: Expr) -> Expr {
    binary(
        BinaryOp::StrEq,
        Expr::call("ref", vec![value]),
        Expr::string("ARRAY"),
    )
}

/// JavaScript `substring(start, end)`: `substr(s, start, end - start)`.
fn substring(string: Expr, start: Expr, end: Option<Expr>) -> Expr {
    match end {
        Some(end) => {
            let length = binary(BinaryOp::Sub, end, start.clone());
            Expr::call("substr", vec![string, start, length])
        }
        None => Expr::call("substr", vec![string, start]),
    }
}

fn char_code_at(string: Expr, index: Expr) -> Expr {
    Expr::call(
        "ord",
        vec![Expr::call("substr", vec![string, index, Expr::number(1)])],
    )
}

fn trim(string: Expr, pattern: &str) -> Expr {
    Expr::Substitute {
        target: Box::new(string),
        source: RegexSource::Pattern(pattern.to_string()),
        replacement: Box::new(Expr::string("")),
        global: true,
    }
}

/// Byte list of a string: `[unpack('C*', s)]`.
fn string_to_bytes(string: Expr) -> Expr {
    Expr::ArrayRef(vec![Expr::call(
        "unpack",
        vec![Expr::string("C*"), string],
    )])
}

fn bytes_to_hex(list: Expr) -> Expr {
    Expr::call(
        "join",
        vec![
            Expr::string(""),
            block_list(
                BlockListOp::Map,
                Expr::call("sprintf", vec![Expr::string("%02x"), Expr::scalar("_")]),
                list,
            ),
        ],
    )
}

fn hex_to_bytes(string: Expr) -> Expr {
    Expr::ArrayRef(vec![block_list(
        BlockListOp::Map,
        Expr::call("hex", vec![Expr::scalar("_")]),
        Expr::call("unpack", vec![Expr::string("(A2)*"), string]),
    )])
}

/// Combine bytes (most significant first when `big_endian`) into a word.
fn pack_bytes(bytes: Vec<Expr>, big_endian: bool) -> Expr {
    let count = bytes.len();
    bytes
        .into_iter()
        .enumerate()
        .map(|(i, byte)| {
            let position = if big_endian { count - 1 - i } else { i };
            let masked = binary(BinaryOp::BitAnd, byte, hex(0xFF));
            if position == 0 {
                masked
            } else {
                binary(BinaryOp::Shl, masked, Expr::number(position as i64 * 8))
            }
        })
        .reduce(|acc, part| binary(BinaryOp::BitOr, acc, part))
        .unwrap_or_else(|| Expr::number(0))
}

/// Numeric conversions named by an IL `Cast`.
fn cast(value: Expr, target: &str) -> Expr {
    match target {
        "uint8" | "byte" => binary(BinaryOp::BitAnd, value, hex(0xFF)),
        "uint16" => binary(BinaryOp::BitAnd, value, hex(0xFFFF)),
        "uint32" => binary(BinaryOp::BitAnd, value, mask32()),
        "int32" => int32(value),
        "float" | "number" | "double" => binary(BinaryOp::Add, value, Expr::number(0)),
        "string" => binary(BinaryOp::Concat, Expr::string(""), value),
        "bool" | "boolean" => ternary(value, Expr::number(1), Expr::number(0)),
        _ => Expr::call("int", vec![value]),
    }
}

/// Escape regex metacharacters in literal text.
fn quote_meta(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if !(c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii()) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A JavaScript replacement string as a Perl expression, with `$1` and
/// `$&` turned into capture variables.
fn replacement_expr(text: &str) -> Expr {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                literal.push('$');
            }
            Some('&') => {
                chars.next();
                parts.push(Expr::string(&std::mem::take(&mut literal)));
                parts.push(Expr::scalar("&"));
            }
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    group.push(d);
                    chars.next();
                }
                parts.push(Expr::string(&std::mem::take(&mut literal)));
                parts.push(Expr::scalar(&group));
            }
            _ => literal.push('$'),
        }
    }
    parts.push(Expr::string(&literal));
    parts.retain(|p| !matches!(p, Expr::Literal(Literal::String(s)) if s.is_empty()));
    parts
        .into_iter()
        .reduce(|acc, part| binary(BinaryOp::Concat, acc, part))
        .unwrap_or_else(|| Expr::string(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::GenerationOptions;
    use serde_json::json;

    fn transformer() -> PerlTransformer {
        PerlTransformer::new(&GenerationOptions::default())
    }

    #[test]
    fn test_replacement_expr_maps_captures() {
        assert_eq!(replacement_expr("x"), Expr::string("x"));
        let expr = replacement_expr("<$1>");
        let Expr::Binary { op, .. } = &expr else {
            panic!("expected concatenation");
        };
        assert_eq!(*op, BinaryOp::Concat);
        assert_eq!(replacement_expr("$$"), Expr::string("$"));
        assert_eq!(replacement_expr(""), Expr::string(""));
    }

    #[test]
    fn test_quote_meta() {
        assert_eq!(quote_meta("a.b"), "a\\.b");
        assert_eq!(quote_meta(", "), "\\,\\ ");
        assert_eq!(quote_meta("ab_1"), "ab_1");
    }

    #[test]
    fn test_pack_bytes_big_endian_shifts_first_byte_most() {
        let packed = pack_bytes(vec![Expr::scalar("a"), Expr::scalar("b")], true);
        let Expr::Binary {
            op: BinaryOp::BitOr,
            left,
            ..
        } = packed
        else {
            panic!("expected an or of bytes");
        };
        let Expr::Binary {
            op: BinaryOp::Shl,
            right,
            ..
        } = *left
        else {
            panic!("expected the high byte shifted");
        };
        assert_eq!(*right, Expr::number(8));
    }

    #[test]
    fn test_element_only_map_uses_native_block() {
        let call = json!({
            "type": "CallExpression",
            "callee": {"type": "MemberExpression", "computed": false,
                       "object": {"type": "ArrayExpression", "elements": [
                           {"type": "Literal", "value": 1, "raw": "1"}
                       ]},
                       "property": {"type": "Identifier", "name": "map"}},
            "arguments": [{"type": "ArrowFunctionExpression",
                           "params": [{"type": "Identifier", "name": "x"}],
                           "body": {"type": "Identifier", "name": "x"}}]
        });
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        let Expr::ArrayRef(items) = expr else {
            panic!("expected an array reference");
        };
        assert!(matches!(
            items[0],
            Expr::BlockList {
                op: BlockListOp::Map,
                ..
            }
        ));
    }

    #[test]
    fn test_reduce_always_desugars() {
        let call = json!({
            "type": "CallExpression", "ilNodeType": "ArrayReduce",
            "array": {"type": "Identifier", "name": "xs"},
            "callback": {"type": "ArrowFunctionExpression",
                         "params": [{"type": "Identifier", "name": "acc"},
                                    {"type": "Identifier", "name": "x"}],
                         "body": {"type": "BinaryExpression", "operator": "+",
                                  "left": {"type": "Identifier", "name": "acc"},
                                  "right": {"type": "Identifier", "name": "x"}}},
            "initialValue": {"type": "Literal", "value": 0, "raw": "0"}
        });
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        let Expr::Do(body) = expr else {
            panic!("expected a do block");
        };
        assert!(
            body.iter()
                .any(|s| matches!(s.kind, StmtKind::Foreach { .. }))
        );
        assert_eq!(
            body.last().map(|s| &s.kind),
            Some(&StmtKind::Expr(Expr::scalar("__result_2")))
        );
    }

    #[test]
    fn test_unmapped_opcode_is_qualified_and_required() {
        let call = json!({
            "type": "CallExpression",
            "callee": {"type": "MemberExpression", "computed": false,
                       "object": {"type": "Identifier", "name": "OpCodes"},
                       "property": {"type": "Identifier", "name": "Mystery"}},
            "arguments": []
        });
        let mut t = transformer();
        let expr = t.expr(JsNode::new(&call).unwrap()).unwrap();
        assert_eq!(expr, Expr::call("OpCodes::Mystery", Vec::new()));
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
        let mut t = PerlTransformer::new(&options);
        let expr = t.expr(JsNode::new(&node).unwrap()).unwrap();
        assert_eq!(expr, Expr::undef());
        assert_eq!(t.take_warnings().len(), 1);
    }

    #[test]
    fn test_cast_int32_restores_sign() {
        let Expr::Binary { op, .. } = cast(Expr::scalar("x"), "int32") else {
            panic!("expected arithmetic");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert_eq!(
            cast(Expr::scalar("x"), "uint8"),
            binary(BinaryOp::BitAnd, Expr::scalar("x"), hex(0xFF))
        );
    }

    #[test]
    fn test_return_in_nested_loop_continues_foreach() {
        let ident = |name: &str| json!({"type": "Identifier", "name": name});
        let callback = json!({
            "type": "ArrowFunctionExpression", "params": [ident("x")],
            "body": {"type": "BlockStatement", "body": [{
                "type": "WhileStatement", "test": ident("x"),
                "body": {"type": "BlockStatement", "body": [
                    {"type": "ReturnStatement", "argument": null}]}
            }]}
        });
        let array = ident("xs");
        let mut t = transformer();
        let stmts = t.foreach_stmt(JsNode::new(&array).unwrap(), JsNode::new(&callback).unwrap());
        let Some(StmtKind::Foreach { label, body, .. }) = stmts.last().map(|s| &s.kind) else {
            panic!("expected foreach, got {stmts:?}");
        };
        let label = label.clone().expect("foreach is labeled");
        let Some(StmtKind::While { body: inner, .. }) = body.last().map(|s| &s.kind) else {
            panic!("expected while, got {body:?}");
        };
        assert_eq!(
            inner.last().map(|s| &s.kind),
            Some(&StmtKind::LoopControl {
                kind: LoopControl::Next,
                label: Some(label),
            })
        );
    }
}
