//! Emitter layout, pinned with inline snapshots of hand-built trees.

use algoport::output::EmitterConfig;
use algoport::output::{perl, ruby};
use algoport::{BraceStyle, PerlEmitter, RubyEmitter};

fn perl_binary(
    op: perl::ast::BinaryOp,
    left: perl::ast::Expr,
    right: perl::ast::Expr,
) -> perl::ast::Expr {
    perl::ast::Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        left_parens: false,
        right_parens: false,
    }
}

fn ruby_binary(
    op: ruby::ast::BinaryOp,
    left: ruby::ast::Expr,
    right: ruby::ast::Expr,
) -> ruby::ast::Expr {
    ruby::ast::Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        left_parens: false,
        right_parens: false,
    }
}

#[test]
fn perl_module_with_sub() {
    use algoport::output::perl::ast::*;

    let add = Sub::new(
        "add",
        vec![Param::scalar("a"), Param::scalar("b")],
        vec![Stmt::ret(Some(perl_binary(
            BinaryOp::Add,
            Expr::scalar("a"),
            Expr::scalar("b"),
        )))],
    );
    let module = Module {
        name: None,
        pragmas: vec![Use::new("strict"), Use::new("warnings")],
        uses: vec![],
        body: vec![
            Stmt::new(StmtKind::Sub(Box::new(add))),
            Stmt::my(
                "sum",
                Shape::Scalar,
                Some(Expr::call("add", vec![Expr::number(2), Expr::number(3)])),
            ),
        ],
        meta: NodeMeta::default(),
    };

    let code = PerlEmitter::emit_module(EmitterConfig::new("    "), &module);
    insta::assert_snapshot!(code, @r"
    use strict;
    use warnings;

    sub add {
        my ($a, $b) = @_;
        return $a + $b;
    }

    my $sum = add(2, 3);
    ");
}

fn perl_branches() -> perl::ast::Stmt {
    use algoport::output::perl::ast::*;

    Stmt::new(StmtKind::If {
        cond: perl_binary(BinaryOp::NumEq, Expr::scalar("x"), Expr::number(0)),
        then_branch: vec![Stmt::new(StmtKind::LoopControl {
            kind: LoopControl::Next,
            label: Some("ITEM".to_string()),
        })],
        elsifs: vec![(
            perl_binary(BinaryOp::NumGt, Expr::scalar("x"), Expr::number(10)),
            vec![Stmt::expr(Expr::call("print", vec![Expr::string("big")]))],
        )],
        else_branch: Some(vec![Stmt::expr(Expr::call(
            "print",
            vec![Expr::scalar("x")],
        ))]),
    })
}

#[test]
fn perl_labeled_foreach() {
    use algoport::output::perl::ast::*;

    let module = Module {
        name: None,
        pragmas: vec![],
        uses: vec![],
        body: vec![Stmt::new(StmtKind::Foreach {
            label: Some("ITEM".to_string()),
            var: "x".to_string(),
            list: Expr::var("xs", Shape::List),
            body: vec![perl_branches()],
        })],
        meta: NodeMeta::default(),
    };

    let code = PerlEmitter::emit_module(EmitterConfig::new("    "), &module);
    insta::assert_snapshot!(code, @r"
    ITEM: for my $x (@xs) {
        if ($x == 0) {
            next ITEM;
        } elsif ($x > 10) {
            print('big');
        } else {
            print($x);
        }
    }
    ");
}

#[test]
fn perl_next_line_braces() {
    use algoport::output::perl::ast::*;

    let module = Module {
        name: None,
        pragmas: vec![],
        uses: vec![],
        body: vec![perl_branches()],
        meta: NodeMeta::default(),
    };
    let config = EmitterConfig {
        brace_style: BraceStyle::NextLine,
        ..EmitterConfig::new("  ")
    };

    let code = PerlEmitter::emit_module(config, &module);
    insta::assert_snapshot!(code, @r"
    if ($x == 0)
    {
      next ITEM;
    }
    elsif ($x > 10)
    {
      print('big');
    }
    else
    {
      print($x);
    }
    ");
}

#[test]
fn ruby_module_with_method() {
    use algoport::output::ruby::ast::*;

    let add = Method::new(
        "add",
        vec![Param::new("a"), Param::new("b")],
        vec![Stmt::expr(ruby_binary(
            BinaryOp::Add,
            Expr::local("a"),
            Expr::local("b"),
        ))],
    );
    let module = Module {
        name: None,
        magic_comments: vec!["frozen_string_literal: true".to_string()],
        requires: vec![Require {
            path: "json".to_string(),
            relative: false,
        }],
        body: vec![
            Stmt::new(StmtKind::Method(Box::new(add))),
            Stmt::expr(Expr::call(
                "puts",
                vec![Expr::call("add", vec![Expr::number(2), Expr::number(3)])],
            )),
        ],
        meta: NodeMeta::default(),
    };

    let code = RubyEmitter::emit_module(EmitterConfig::new("  "), &module);
    insta::assert_snapshot!(code, @r"
    # frozen_string_literal: true

    require 'json'

    def add(a, b)
      a + b
    end

    puts(add(2, 3))
    ");
}

#[test]
fn ruby_blocks() {
    use algoport::output::ruby::ast::*;

    let branches = Stmt::new(StmtKind::If {
        cond: ruby_binary(BinaryOp::Eq, Expr::local("x"), Expr::number(0)),
        then_branch: vec![Stmt::control(LoopControl::Next)],
        elsifs: vec![(
            ruby_binary(BinaryOp::Gt, Expr::local("x"), Expr::number(10)),
            vec![Stmt::expr(Expr::call("puts", vec![Expr::string("big")]))],
        )],
        else_branch: Some(vec![Stmt::expr(Expr::call(
            "puts",
            vec![Expr::local("i")],
        ))]),
    });
    let doubled = Expr::with_block(
        Expr::Array(vec![Expr::number(1), Expr::number(2)]),
        "map",
        vec![],
        Block::single(
            &["x"],
            ruby_binary(BinaryOp::Mul, Expr::local("x"), Expr::number(2)),
        ),
    );
    let module = Module {
        name: None,
        magic_comments: vec![],
        requires: vec![],
        body: vec![
            Stmt::expr(Expr::with_block(
                Expr::local("xs"),
                "each_with_index",
                vec![],
                Block::new(&["x", "i"], vec![branches]),
            )),
            Stmt::expr(Expr::call("p", vec![doubled])),
        ],
        meta: NodeMeta::default(),
    };

    let code = RubyEmitter::emit_module(EmitterConfig::new("  "), &module);
    insta::assert_snapshot!(code, @r"
    xs.each_with_index do |x, i|
      if x == 0
        next
      elsif x > 10
        puts('big')
      else
        puts(i)
      end
    end
    p([1, 2].map { |x| x * 2 })
    ");
}
