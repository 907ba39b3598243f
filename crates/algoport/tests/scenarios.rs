//! Whole programs through each plugin, run when the interpreter is installed.
//!
//! Generation is always checked; execution returns early when `perl` or
//! `ruby` is missing from `PATH`.

use algoport::{GenerationOptions, plugin_for_language};
use algoport_tools::checker_for_language;
use serde_json::{Value, json};
use std::io::Write;
use std::process::Command;

const TARGETS: [&str; 2] = ["perl", "ruby"];

fn ident(name: &str) -> Value {
    json!({"type": "Identifier", "name": name})
}

fn num(value: u64) -> Value {
    json!({"type": "Literal", "value": value, "raw": value.to_string()})
}

fn hex(value: u64) -> Value {
    json!({"type": "Literal", "value": value, "raw": format!("0x{value:X}")})
}

fn string(value: &str) -> Value {
    json!({"type": "Literal", "value": value, "raw": format!("'{value}'")})
}

fn binary(operator: &str, left: Value, right: Value) -> Value {
    json!({"type": "BinaryExpression", "operator": operator, "left": left, "right": right})
}

fn member(object: Value, property: &str) -> Value {
    json!({"type": "MemberExpression", "computed": false,
           "object": object, "property": ident(property)})
}

fn call(callee: Value, arguments: Vec<Value>) -> Value {
    json!({"type": "CallExpression", "callee": callee, "arguments": arguments})
}

fn expression(expression: Value) -> Value {
    json!({"type": "ExpressionStatement", "expression": expression})
}

fn log(value: Value) -> Value {
    expression(call(member(ident("console"), "log"), vec![value]))
}

fn ret(value: Value) -> Value {
    json!({"type": "ReturnStatement", "argument": value})
}

fn block(body: Vec<Value>) -> Value {
    json!({"type": "BlockStatement", "body": body})
}

fn function(name: &str, params: &[&str], body: Vec<Value>) -> Value {
    json!({
        "type": "FunctionDeclaration",
        "id": ident(name),
        "params": params.iter().map(|p| ident(p)).collect::<Vec<_>>(),
        "body": block(body)
    })
}

fn method(kind: &str, name: &str, params: &[&str], body: Vec<Value>) -> Value {
    json!({
        "type": "MethodDefinition", "kind": kind, "static": false, "computed": false,
        "key": ident(name),
        "value": {
            "type": "FunctionExpression",
            "params": params.iter().map(|p| ident(p)).collect::<Vec<_>>(),
            "body": block(body)
        }
    })
}

fn declare(kind: &str, name: &str, init: Value) -> Value {
    json!({
        "type": "VariableDeclaration", "kind": kind,
        "declarations": [{"type": "VariableDeclarator", "id": ident(name), "init": init}]
    })
}

fn constant(name: &str, init: Value) -> Value {
    declare("const", name, init)
}

fn assign(target: Value, value: Value) -> Value {
    json!({"type": "AssignmentExpression", "operator": "=", "left": target, "right": value})
}

fn negative(value: u64) -> Value {
    json!({"type": "UnaryExpression", "operator": "-", "prefix": true, "argument": num(value)})
}

fn array(elements: Vec<Value>) -> Value {
    json!({"type": "ArrayExpression", "elements": elements})
}

fn arrow(params: &[&str], body: Value) -> Value {
    json!({
        "type": "ArrowFunctionExpression", "expression": true,
        "params": params.iter().map(|p| ident(p)).collect::<Vec<_>>(),
        "body": body
    })
}

fn program(body: Vec<Value>) -> Value {
    json!({"type": "Program", "body": body})
}

fn generate(lang: &str, ast: &Value) -> String {
    let plugin = plugin_for_language(lang).expect("built-in plugin");
    let result = plugin.generate(ast, &GenerationOptions::default());
    assert!(result.success, "{lang}: {:?}", result.error);
    result.code
}

/// Run `code` with the target's interpreter and return its stdout.
fn run(lang: &str, code: &str) -> Option<String> {
    let checker = checker_for_language(lang)?;
    if !checker.is_available() {
        return None;
    }
    let extension = plugin_for_language(lang)?.info().extension;
    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{extension}"))
        .tempfile()
        .expect("temp file");
    file.write_all(code.as_bytes()).expect("write program");
    file.flush().expect("flush program");
    let output = Command::new(lang)
        .arg(file.path())
        .output()
        .expect("spawn interpreter");
    assert!(
        output.status.success(),
        "{lang} failed:\n{}\n--- code ---\n{code}",
        String::from_utf8_lossy(&output.stderr)
    );
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn assert_runs(ast: &Value, expected: &str) {
    for lang in TARGETS {
        let code = generate(lang, ast);
        if let Some(stdout) = run(lang, &code) {
            assert_eq!(stdout, expected, "{lang}:\n{code}");
        }
    }
}

fn add_program() -> Value {
    program(vec![
        function("add", &["a", "b"], vec![ret(binary("+", ident("a"), ident("b")))]),
        log(call(ident("add"), vec![num(2), num(3)])),
    ])
}

#[test]
fn function_call() {
    let ast = add_program();
    assert!(generate("perl", &ast).contains("sub add {"));
    assert!(generate("ruby", &ast).contains("def add(a, b)"));
    assert_runs(&ast, "5\n");
}

#[test]
fn switch_with_default() {
    let case = |test: Value, result: &str| {
        json!({"type": "SwitchCase", "test": test, "consequent": [
            expression(assign(ident("result"), string(result))),
            {"type": "BreakStatement", "label": null}
        ]})
    };
    let ast = program(vec![
        function(
            "name",
            &["n"],
            vec![
                declare("let", "result", Value::Null),
                json!({
                    "type": "SwitchStatement",
                    "discriminant": ident("n"),
                    "cases": [
                        case(num(10), "ten"),
                        case(num(20), "twenty"),
                        case(num(30), "thirty"),
                        {"type": "SwitchCase", "test": null, "consequent": [
                            expression(assign(ident("result"), string("other")))
                        ]},
                    ]
                }),
                ret(ident("result")),
            ],
        ),
        log(call(ident("name"), vec![num(10)])),
        log(call(ident("name"), vec![num(20)])),
        log(call(ident("name"), vec![num(30)])),
        log(call(ident("name"), vec![num(99)])),
    ]);
    assert_runs(&ast, "ten\ntwenty\nthirty\nother\n");
}

#[test]
fn class_with_fields() {
    let this = || json!({"type": "ThisExpression"});
    let assign = |field: &str| {
        expression(json!({
            "type": "AssignmentExpression", "operator": "=",
            "left": member(this(), field), "right": ident(field)
        }))
    };
    let ast = program(vec![
        json!({
            "type": "ClassDeclaration",
            "id": ident("Point"),
            "superClass": null,
            "body": {"type": "ClassBody", "body": [
                method("constructor", "constructor", &["x", "y"], vec![assign("x"), assign("y")]),
                method("method", "sum", &[], vec![
                    ret(binary("+", member(this(), "x"), member(this(), "y")))
                ]),
            ]}
        }),
        constant(
            "point",
            json!({"type": "NewExpression", "callee": ident("Point"),
                   "arguments": [num(2), num(3)]}),
        ),
        log(call(member(ident("point"), "sum"), vec![])),
    ]);
    assert!(generate("ruby", &ast).contains("class Point"));
    assert_runs(&ast, "5\n");
}

#[test]
fn array_map() {
    let double = json!({
        "type": "ArrowFunctionExpression", "expression": true,
        "params": [ident("x")],
        "body": binary("*", ident("x"), num(2))
    });
    let list = json!({"type": "ArrayExpression", "elements": [num(1), num(2), num(3), num(4)]});
    let mapped = call(member(list, "map"), vec![double]);
    let ast = program(vec![log(call(member(mapped, "join"), vec![string(",")]))]);
    assert!(generate("ruby", &ast).contains(".map { |x| x * 2 }"));
    assert_runs(&ast, "2,4,6,8\n");
}

#[test]
fn unsigned_shift() {
    let values: [u64; 4] = [0, 1, 0xFFFF_FFFF, 0x8000_0000];
    let shifts: [u64; 3] = [0, 1, 31];
    let mut body = Vec::new();
    let mut expected = String::new();
    for x in values {
        for n in shifts {
            body.push(log(binary(">>>", hex(x), num(n))));
            expected.push_str(&format!("{}\n", (x as u32) >> n));
        }
    }
    assert_runs(&program(body), &expected);
}

#[test]
fn generation_is_deterministic() {
    let ast = add_program();
    for lang in TARGETS {
        assert_eq!(generate(lang, &ast), generate(lang, &ast), "{lang}");
    }
}

#[test]
fn signed_bitwise_results() {
    let not_zero = json!({"type": "UnaryExpression", "operator": "~", "prefix": true,
                          "argument": num(0)});
    let ast = program(vec![
        log(binary(">>", hex(0x8000_0000), num(1))),
        log(binary(">>", negative(8), num(1))),
        log(not_zero),
        log(binary("|", hex(0xFFFF_FFFF), num(0))),
        log(binary("<<", num(1), num(31))),
        log(binary("^", negative(1), num(0))),
        log(binary("&", negative(1), hex(0xFF))),
        log(binary(">>>", binary("<<", hex(0x1234_5678), num(8)), num(0))),
    ]);
    assert_runs(
        &ast,
        "-1073741824\n-4\n-1\n-1\n-2147483648\n-1\n255\n878082048\n",
    );
}

#[test]
fn callbacks_with_index_and_accumulator() {
    let list = || array(vec![num(1), num(2), num(3)]);
    let join = |value: Value| call(member(value, "join"), vec![string(",")]);
    let indexed = call(
        member(list(), "map"),
        vec![arrow(&["x", "i"], binary("+", ident("x"), ident("i")))],
    );
    let even_positions = call(
        member(array(vec![num(5), num(6), num(7), num(8)]), "filter"),
        vec![arrow(
            &["x", "i"],
            binary("===", binary("%", ident("i"), num(2)), num(0)),
        )],
    );
    let sum = call(
        member(list(), "reduce"),
        vec![arrow(&["acc", "x"], binary("+", ident("acc"), ident("x"))), num(0)],
    );
    let weighted = call(
        member(list(), "reduce"),
        vec![
            arrow(
                &["acc", "x", "i"],
                binary("+", ident("acc"), binary("*", ident("x"), ident("i"))),
            ),
            num(0),
        ],
    );
    let ast = program(vec![
        log(join(indexed)),
        log(join(even_positions)),
        log(sum),
        log(weighted),
    ]);
    assert_runs(&ast, "1,3,5\n5,7\n6\n8\n");
}

#[test]
fn strings_print_verbatim() {
    let texts = [
        r#"He said "hi""#,
        "it's",
        r"back\slash",
        "$x @y %z",
        "#{not} interpolated",
        "line1\nline2",
        "tab\there",
    ];
    let ast = program(texts.iter().map(|t| log(string(t))).collect());
    let expected: String = texts.iter().map(|t| format!("{t}\n")).collect();
    assert_runs(&ast, &expected);
}

#[test]
fn array_and_object_shapes_stay_stable() {
    let index = |object: Value, i: u64| {
        json!({"type": "MemberExpression", "computed": true, "object": object,
               "property": num(i)})
    };
    let push = |value: Value| expression(call(member(ident("xs"), "push"), vec![value]));
    let ast = program(vec![
        constant("xs", array(vec![])),
        push(num(3)),
        push(num(4)),
        expression(assign(index(ident("xs"), 2), num(5))),
        log(member(ident("xs"), "length")),
        log(binary("+", index(ident("xs"), 0), index(ident("xs"), 2))),
        log(call(member(ident("xs"), "join"), vec![string("-")])),
        constant(
            "point",
            json!({"type": "ObjectExpression", "properties": [{
                "type": "Property", "kind": "init", "computed": false, "shorthand": false,
                "method": false, "key": ident("x"), "value": num(1)
            }]}),
        ),
        expression(assign(member(ident("point"), "y"), num(2))),
        log(binary("+", member(ident("point"), "x"), member(ident("point"), "y"))),
    ]);
    assert_runs(&ast, "3\n8\n3-4-5\n3\n");
}

#[test]
fn for_of_destructures_pairs() {
    let pairs = array(vec![
        array(vec![num(1), string("a")]),
        array(vec![num(2), string("b")]),
    ]);
    let ast = program(vec![
        constant("pairs", pairs),
        json!({
            "type": "ForOfStatement", "await": false,
            "left": {"type": "VariableDeclaration", "kind": "const", "declarations": [{
                "type": "VariableDeclarator", "init": null,
                "id": {"type": "ArrayPattern", "elements": [ident("n"), ident("s")]}
            }]},
            "right": ident("pairs"),
            "body": block(vec![log(binary("*", ident("n"), num(10))), log(ident("s"))])
        }),
    ]);
    assert_runs(&ast, "10\na\n20\nb\n");
}

#[test]
fn caught_error_message() {
    let error = json!({"type": "NewExpression", "callee": ident("Error"),
                       "arguments": [string("boom")]});
    let ast = program(vec![json!({
        "type": "TryStatement",
        "block": block(vec![json!({"type": "ThrowStatement", "argument": error})]),
        "handler": {"type": "CatchClause", "param": ident("e"),
                    "body": block(vec![log(member(ident("e"), "message"))])},
        "finalizer": block(vec![log(string("fin"))])
    })]);
    assert_runs(&ast, "boom\nfin\n");
}
