//! Perl emitter: renders the Perl tree as source text.
//!
//! Precedence parentheses come from the flags the transformer set; the only
//! local decisions are adjacency rules (a non-term used as an invocant or
//! index base gets wrapped).

use super::ast::*;
use crate::options::BraceStyle;
use crate::output::EmitterConfig;

/// Emits a Perl tree as source code.
pub struct PerlEmitter {
    config: EmitterConfig,
    output: String,
    depth: usize,
}

impl PerlEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        Self {
            config,
            output: String::new(),
            depth: 0,
        }
    }

    /// Render `node`; `None` renders as nothing.
    pub fn emit(&mut self, node: Option<Node<'_>>) -> String {
        let Some(node) = node else {
            return String::new();
        };
        match node {
            Node::Module(module) => self.write_module(module),
            Node::Package(package) => self.write_package(package),
            Node::Sub(sub) => self.write_sub(sub),
            Node::Stmt(stmt) => self.write_stmt(stmt),
            Node::Expr(expr) => self.write_expr(expr),
            Node::Type(ty) => self.output.push_str(&ty.to_string()),
            Node::Comment(comment) => self.write_comment(comment),
        }
        std::mem::take(&mut self.output)
    }

    /// Render a whole module.
    pub fn emit_module(config: EmitterConfig, module: &Module) -> String {
        Self::new(config).emit(Some(Node::Module(module)))
    }

    fn nl(&mut self) {
        self.output.push_str(&self.config.line_ending);
    }

    fn write_indent(&mut self) {
        for _ in 0..self.depth {
            self.output.push_str(&self.config.indent);
        }
    }

    fn line(&mut self, text: &str) {
        self.write_indent();
        self.output.push_str(text);
        self.nl();
    }

    fn trim_trailing(&mut self) {
        let len = self.output.trim_end().len();
        self.output.truncate(len);
    }

    /// Finish a header (`if (...)`) with an opening brace.
    fn open_brace(&mut self) {
        match self.config.brace_style {
            BraceStyle::SameLine => {
                self.output.push_str(" {");
                self.nl();
            }
            BraceStyle::NextLine => {
                self.nl();
                self.line("{");
            }
        }
    }

    /// Continue a closed block with another clause (`elsif`, `catch`).
    fn chain_clause(&mut self, clause: &str) {
        match self.config.brace_style {
            BraceStyle::SameLine => {
                self.trim_trailing();
                self.output.push(' ');
                self.output.push_str(clause);
            }
            BraceStyle::NextLine => {
                self.write_indent();
                self.output.push_str(clause);
            }
        }
        self.open_brace();
    }

    fn write_block_body(&mut self, body: &[Stmt]) {
        self.depth += 1;
        for stmt in body {
            self.write_stmt(stmt);
        }
        self.depth -= 1;
    }

    /// Visible marker for a node in a position with no rendering rule.
    /// Ends the current line, so it is safe inside an expression.
    fn write_gap(&mut self, what: &str) {
        tracing::warn!(node_type = what, "unrenderable Perl node");
        self.output.push_str("# ERROR: unsupported ");
        self.output.push_str(what);
        self.nl();
        self.depth += 1;
        self.write_indent();
        self.depth -= 1;
    }

    fn write_comment(&mut self, comment: &Comment) {
        for raw in comment.text.lines() {
            let text = if comment.block {
                raw.trim().trim_start_matches('*').trim()
            } else {
                raw.trim()
            };
            if comment.block && text.is_empty() {
                continue;
            }
            if text.is_empty() {
                self.line("#");
            } else {
                self.line(&format!("# {text}"));
            }
        }
    }

    fn write_meta(&mut self, meta: &NodeMeta) {
        for comment in &meta.comments {
            self.write_comment(comment);
        }
    }

    fn write_module(&mut self, module: &Module) {
        self.write_meta(&module.meta);
        let mut header = false;
        if let Some(name) = &module.name {
            self.line(&format!("package {name};"));
            header = true;
        }
        for pragma in module.pragmas.iter().chain(&module.uses) {
            self.write_use(pragma);
            header = true;
        }
        if header && !module.body.is_empty() {
            self.nl();
        }
        self.write_top_level(&module.body);
        if module.name.is_some() {
            if !module.body.is_empty() {
                self.nl();
            }
            self.line("1;");
        }
    }

    /// Statements separated by blank lines around subs and packages.
    fn write_top_level(&mut self, body: &[Stmt]) {
        let mut prev_spaced = false;
        for (i, stmt) in body.iter().enumerate() {
            let spaced = matches!(stmt.kind, StmtKind::Sub(_) | StmtKind::Package(_));
            if i > 0 && (spaced || prev_spaced) {
                self.nl();
            }
            self.write_stmt(stmt);
            prev_spaced = spaced;
        }
    }

    fn write_use(&mut self, u: &Use) {
        let keyword = if u.no { "no" } else { "use" };
        if u.qualified {
            self.line(&format!("{keyword} {} ();", u.module));
        } else if u.imports.is_empty() {
            self.line(&format!("{keyword} {};", u.module));
        } else {
            self.line(&format!("{keyword} {} qw({});", u.module, u.imports.join(" ")));
        }
    }

    fn write_package(&mut self, package: &Package) {
        self.write_meta(&package.meta);
        if package.block_form {
            self.write_indent();
            self.output.push_str(&format!("package {}", package.name));
            self.open_brace();
        } else {
            self.line("{");
        }
        self.depth += 1;
        if !package.block_form {
            self.line(&format!("package {};", package.name));
        }
        let mut sections = 0;
        if let Some(base) = &package.base {
            self.line(&format!("use parent -norequire, {};", quote_string(base)));
            sections += 1;
        }
        let typed: Vec<&Field> = package.fields.iter().filter(|f| f.ty.is_some()).collect();
        if !typed.is_empty() {
            if sections > 0 {
                self.nl();
            }
            for field in typed {
                let ty = field.ty.as_ref().map(ToString::to_string).unwrap_or_default();
                let kind = if field.is_static { "class field" } else { "field" };
                self.line(&format!("# {kind} {}: {ty}", field.name));
            }
            sections += 1;
        }
        if !package.static_init.is_empty() {
            if sections > 0 {
                self.nl();
            }
            for stmt in &package.static_init {
                self.write_stmt(stmt);
            }
            sections += 1;
        }
        for method in &package.methods {
            if sections > 0 {
                self.nl();
            }
            self.write_sub(method);
            sections += 1;
        }
        self.depth -= 1;
        self.line("}");
    }

    fn write_sub(&mut self, sub: &Sub) {
        self.write_meta(&sub.meta);
        if let Some(signature) = type_comment(sub) {
            self.line(&format!("# {signature}"));
        }
        self.write_indent();
        self.output.push_str("sub ");
        self.output.push_str(&sub.name);
        self.open_brace();
        self.write_sub_body(sub);
        self.line("}");
    }

    /// Parameter unpacking, defaults, then the body.
    fn write_sub_body(&mut self, sub: &Sub) {
        self.depth += 1;
        let mut vars: Vec<String> = sub.invocant().map(|i| format!("${i}")).into_iter().collect();
        for param in &sub.params {
            let shape = if param.variadic { Shape::List } else { param.shape };
            vars.push(format!("{}{}", sigil(shape), param.name));
        }
        if !vars.is_empty() {
            self.line(&format!("my ({}) = @_;", vars.join(", ")));
        }
        for param in &sub.params {
            if let Some(default) = &param.default {
                self.write_indent();
                self.output.push_str(&format!("${} //= ", param.name));
                self.write_expr(default);
                self.output.push(';');
                self.nl();
            }
        }
        for stmt in &sub.body {
            self.write_stmt(stmt);
        }
        self.depth -= 1;
    }

    fn write_stmt(&mut self, stmt: &Stmt) {
        self.write_meta(&stmt.meta);
        match &stmt.kind {
            StmtKind::Block { label, body } => {
                self.write_indent();
                if let Some(label) = label {
                    self.output.push_str(&format!("{label}: "));
                }
                self.output.push('{');
                self.nl();
                self.write_block_body(body);
                self.line("}");
            }
            StmtKind::VarDecl { .. } | StmtKind::Expr(_) => {
                self.write_indent();
                self.write_simple_stmt(stmt);
                self.output.push(';');
                self.nl();
            }
            StmtKind::Return(value) => {
                self.write_indent();
                self.output.push_str("return");
                if let Some(value) = value {
                    self.output.push(' ');
                    self.write_expr(value);
                }
                self.output.push(';');
                self.nl();
            }
            StmtKind::If {
                cond,
                then_branch,
                elsifs,
                else_branch,
            } => self.write_if(cond, then_branch, elsifs, else_branch.as_deref()),
            StmtKind::For {
                label,
                init,
                cond,
                step,
                body,
            } => {
                self.write_indent();
                self.write_label(label.as_deref());
                self.output.push_str("for (");
                let mut unsupported_init = None;
                if let Some(init) = init {
                    match init.kind {
                        StmtKind::VarDecl { .. } | StmtKind::Expr(_) => {
                            self.write_simple_stmt(init)
                        }
                        _ => unsupported_init = Some(init.kind.node_type()),
                    }
                }
                self.output.push_str("; ");
                if let Some(cond) = cond {
                    self.write_expr(cond);
                }
                self.output.push_str("; ");
                for (i, expr) in step.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.write_expr(expr);
                }
                self.trim_trailing();
                self.output.push(')');
                self.open_brace();
                if let Some(kind) = unsupported_init {
                    self.depth += 1;
                    self.write_indent();
                    self.write_gap(&format!("for-loop initializer {kind}"));
                    self.trim_trailing();
                    self.nl();
                    self.depth -= 1;
                }
                self.write_block_body(body);
                self.line("}");
            }
            StmtKind::Foreach {
                label,
                var,
                list,
                body,
            } => {
                self.write_indent();
                self.write_label(label.as_deref());
                self.output.push_str(&format!("for my ${var} ("));
                self.write_expr(list);
                self.output.push(')');
                self.open_brace();
                self.write_block_body(body);
                self.line("}");
            }
            StmtKind::While {
                label,
                cond,
                body,
                post_test,
            } => {
                self.write_indent();
                self.write_label(label.as_deref());
                if *post_test {
                    // Loop control works here, unlike in `do { } while`.
                    self.output.push_str("while (1)");
                    self.open_brace();
                    self.write_block_body(body);
                    self.line("}");
                    self.chain_clause("continue");
                    self.depth += 1;
                    self.write_indent();
                    self.output.push_str("last if !(");
                    self.write_expr(cond);
                    self.output.push_str(");");
                    self.nl();
                    self.depth -= 1;
                    self.line("}");
                } else {
                    self.output.push_str("while (");
                    self.write_expr(cond);
                    self.output.push(')');
                    self.open_brace();
                    self.write_block_body(body);
                    self.line("}");
                }
            }
            StmtKind::LoopControl { kind, label } => {
                let keyword = match kind {
                    LoopControl::Last => "last",
                    LoopControl::Next => "next",
                    LoopControl::Redo => "redo",
                };
                match label {
                    Some(label) => self.line(&format!("{keyword} {label};")),
                    None => self.line(&format!("{keyword};")),
                }
            }
            StmtKind::Die(value) => {
                self.write_indent();
                self.output.push_str("die ");
                self.write_expr(value);
                self.output.push(';');
                self.nl();
            }
            StmtKind::Try {
                body,
                catch,
                finally,
                native,
            } => {
                if *native {
                    self.write_native_try(body, catch.as_ref(), finally.as_deref());
                } else {
                    self.write_eval_try(body, catch.as_ref(), finally.as_deref());
                }
            }
            StmtKind::Package(package) => self.write_package(package),
            StmtKind::Sub(sub) => self.write_sub(sub),
            StmtKind::Raw(text) => {
                for raw in text.lines() {
                    self.line(raw);
                }
            }
        }
    }

    fn write_label(&mut self, label: Option<&str>) {
        if let Some(label) = label {
            self.output.push_str(label);
            self.output.push_str(": ");
        }
    }

    /// A declaration or expression without indentation or `;`.
    fn write_simple_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl {
                targets,
                init,
                scope,
            } => {
                self.output.push_str(match scope {
                    DeclScope::My => "my ",
                    DeclScope::Our => "our ",
                });
                let names: Vec<String> = targets
                    .iter()
                    .map(|t| format!("{}{}", sigil(t.shape), t.name))
                    .collect();
                if names.len() == 1 {
                    self.output.push_str(&names[0]);
                } else {
                    self.output.push_str(&format!("({})", names.join(", ")));
                }
                if let Some(init) = init {
                    self.output.push_str(" = ");
                    self.write_expr(init);
                }
            }
            StmtKind::Expr(expr) => self.write_expr(expr),
            other => self.write_gap(other.node_type()),
        }
    }

    fn write_if(
        &mut self,
        cond: &Expr,
        then_branch: &[Stmt],
        elsifs: &[(Expr, Vec<Stmt>)],
        else_branch: Option<&[Stmt]>,
    ) {
        self.write_indent();
        self.output.push_str("if (");
        self.write_expr(cond);
        self.output.push(')');
        self.open_brace();
        self.write_block_body(then_branch);
        self.line("}");

        let mut clauses: Vec<(&Expr, &[Stmt])> =
            elsifs.iter().map(|(c, b)| (c, b.as_slice())).collect();
        let mut tail = else_branch;
        // A lone `if` in the else branch continues the chain.
        while let Some([only]) = tail {
            let StmtKind::If {
                cond,
                then_branch,
                elsifs,
                else_branch,
            } = &only.kind
            else {
                break;
            };
            if !only.meta.comments.is_empty() {
                break;
            }
            clauses.push((cond, then_branch));
            clauses.extend(elsifs.iter().map(|(c, b)| (c, b.as_slice())));
            tail = else_branch.as_deref();
        }

        for (cond, body) in clauses {
            self.chain_clause_with("elsif (", cond, ")");
            self.write_block_body(body);
            self.line("}");
        }
        if let Some(body) = tail {
            self.chain_clause("else");
            self.write_block_body(body);
            self.line("}");
        }
    }

    fn chain_clause_with(&mut self, head: &str, expr: &Expr, tail: &str) {
        match self.config.brace_style {
            BraceStyle::SameLine => {
                self.trim_trailing();
                self.output.push(' ');
            }
            BraceStyle::NextLine => self.write_indent(),
        }
        self.output.push_str(head);
        self.write_expr(expr);
        self.output.push_str(tail);
        self.open_brace();
    }

    fn write_native_try(
        &mut self,
        body: &[Stmt],
        catch: Option<&CatchClause>,
        finally: Option<&[Stmt]>,
    ) {
        self.write_indent();
        self.output.push_str("try");
        self.open_brace();
        self.write_block_body(body);
        self.line("}");
        match catch {
            Some(catch) => {
                self.chain_clause(&format!("catch (${})", catch.var));
                self.write_block_body(&catch.body);
            }
            None => {
                // `try` requires a `catch`; rethrow to keep the error visible.
                self.chain_clause("catch ($__error)");
                self.depth += 1;
                self.line("die $__error;");
                self.depth -= 1;
            }
        }
        self.line("}");
        if let Some(finally) = finally {
            self.chain_clause("finally");
            self.write_block_body(finally);
            self.line("}");
        }
    }

    fn write_eval_try(
        &mut self,
        body: &[Stmt],
        catch: Option<&CatchClause>,
        finally: Option<&[Stmt]>,
    ) {
        let Some(finally) = finally else {
            self.write_indent();
            self.output.push_str("eval");
            self.open_brace();
            self.write_block_body(body);
            self.depth += 1;
            self.line("1;");
            self.depth -= 1;
            self.line("}");
            self.chain_clause("or do");
            self.depth += 1;
            if let Some(catch) = catch {
                self.line(&format!("my ${} = $@;", catch.var));
                for stmt in &catch.body {
                    self.write_stmt(stmt);
                }
            }
            self.depth -= 1;
            self.line("};");
            return;
        };

        self.line("{");
        self.depth += 1;
        self.write_indent();
        self.output.push_str("my $__ok = eval");
        self.open_brace();
        self.write_block_body(body);
        self.depth += 1;
        self.line("1;");
        self.depth -= 1;
        self.line("};");
        self.line("my $__error = $@;");
        if let Some(catch) = catch {
            self.write_indent();
            self.output.push_str("if (!$__ok)");
            self.open_brace();
            self.depth += 1;
            self.line(&format!("my ${} = $__error;", catch.var));
            for stmt in &catch.body {
                self.write_stmt(stmt);
            }
            self.depth -= 1;
            self.line("}");
        }
        for stmt in finally {
            self.write_stmt(stmt);
        }
        if catch.is_none() {
            self.line("die $__error if !$__ok;");
        }
        self.depth -= 1;
        self.line("}");
    }

    fn write_args(&mut self, args: &[Expr]) {
        self.output.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.output.push_str(", ");
            }
            self.write_expr(arg);
        }
        self.output.push(')');
    }

    /// Render `expr` where a term is required (invocant, index base).
    fn write_term(&mut self, expr: &Expr) {
        let wrap = expr.precedence() < 100
            || matches!(
                expr,
                Expr::AnonSub(_) | Expr::Do(_) | Expr::BlockList { .. } | Expr::HashRef(_)
            );
        if wrap {
            self.output.push('(');
            self.write_expr(expr);
            self.output.push(')');
        } else {
            self.write_expr(expr);
        }
    }

    fn write_operand(&mut self, expr: &Expr, parens: bool) {
        if parens {
            self.output.push('(');
            self.write_expr(expr);
            self.output.push(')');
        } else {
            self.write_expr(expr);
        }
    }

    /// `@{...}`, `%{...}` or `$#{...}`. A leading `do` block gets a unary
    /// plus so Perl parses the braces as an expression.
    fn write_deref(&mut self, prefix: &str, expr: &Expr) {
        self.output.push_str(prefix);
        self.output.push('{');
        if matches!(expr, Expr::Do(_)) {
            self.output.push('+');
        }
        self.write_expr(expr);
        self.output.push('}');
    }

    fn write_key(&mut self, key: &Expr) {
        match key {
            Expr::Literal(Literal::String(s)) if is_bareword(s) => self.output.push_str(s),
            _ => self.write_expr(key),
        }
    }

    fn write_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(lit) => self.output.push_str(&lit.to_string()),
            Expr::Var { name, shape } => {
                self.output.push(sigil(*shape));
                self.output.push_str(name);
            }
            Expr::Index { base, index } => {
                match base.as_ref() {
                    Expr::Var {
                        name,
                        shape: Shape::List,
                    } => self.output.push_str(&format!("${name}[")),
                    other => {
                        self.write_term(other);
                        self.output.push_str("->[");
                    }
                }
                self.write_expr(index);
                self.output.push(']');
            }
            Expr::Key { base, key } => {
                match base.as_ref() {
                    Expr::Var {
                        name,
                        shape: Shape::Map,
                    } => self.output.push_str(&format!("${name}{{")),
                    other => {
                        self.write_term(other);
                        self.output.push_str("->{");
                    }
                }
                self.write_key(key);
                self.output.push('}');
            }
            Expr::Slice { list, indices } => {
                match list.as_ref() {
                    Expr::Var {
                        name,
                        shape: Shape::List,
                    } => self.output.push_str(&format!("@{name}")),
                    other => self.write_deref("@", other),
                }
                self.output.push('[');
                self.write_expr(indices);
                self.output.push(']');
            }
            Expr::LastIndex(list) => match list.as_ref() {
                Expr::Var {
                    name,
                    shape: Shape::List,
                } => self.output.push_str(&format!("$#{name}")),
                other => self.write_deref("$#", other),
            },
            Expr::Deref { expr, shape } => self.write_deref(&sigil(*shape).to_string(), expr),
            Expr::Binary {
                op,
                left,
                right,
                left_parens,
                right_parens,
            } => {
                self.write_operand(left, *left_parens);
                self.output.push(' ');
                self.output.push_str(op.symbol());
                self.output.push(' ');
                self.write_operand(right, *right_parens);
            }
            Expr::Unary {
                op,
                operand,
                parens,
            } => {
                if op.is_postfix() {
                    self.write_operand(operand, *parens);
                    self.output.push_str(op.symbol());
                } else {
                    self.output.push_str(op.symbol());
                    // `- -x` must not become `--x`.
                    let negative_operand = matches!(op, UnaryOp::Neg)
                        && match operand.as_ref() {
                            Expr::Unary {
                                op: UnaryOp::Neg | UnaryOp::PreDec,
                                ..
                            } => true,
                            Expr::Literal(Literal::Number(n)) => n.starts_with('-'),
                            _ => false,
                        };
                    self.write_operand(operand, *parens || negative_operand);
                }
            }
            Expr::Assign { target, op, value } => {
                if !is_assignable(target) {
                    self.write_gap(&format!("assignment target {}", target.node_type()));
                    self.write_expr(value);
                    return;
                }
                self.write_expr(target);
                self.output.push(' ');
                if let Some(op) = op {
                    self.output.push_str(op.symbol());
                }
                self.output.push_str("= ");
                self.write_expr(value);
            }
            Expr::Call { callee, args } => {
                match callee {
                    Callee::Named(name) => self.output.push_str(name),
                    Callee::Code(code) => {
                        self.write_term(code);
                        self.output.push_str("->");
                    }
                    Callee::Method { invocant, name } => {
                        self.write_term(invocant);
                        self.output.push_str("->");
                        self.output.push_str(name);
                    }
                    Callee::ClassMethod { class, name } => {
                        self.output.push_str(&format!("{class}->{name}"));
                    }
                }
                self.write_args(args);
            }
            Expr::ArrayRef(items) => {
                self.output.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.write_expr(item);
                }
                self.output.push(']');
            }
            Expr::HashRef(pairs) => {
                if pairs.is_empty() {
                    self.output.push_str("{}");
                    return;
                }
                self.output.push_str("{ ");
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.write_key(key);
                    self.output.push_str(" => ");
                    self.write_expr(value);
                }
                self.output.push_str(" }");
            }
            Expr::List(items) => self.write_args(items),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.write_expr(cond);
                self.output.push_str(" ? ");
                self.write_expr(then_expr);
                self.output.push_str(" : ");
                self.write_expr(else_expr);
            }
            Expr::AnonSub(sub) => {
                self.output.push_str("sub {");
                self.nl();
                self.write_sub_body(sub);
                self.write_indent();
                self.output.push('}');
            }
            Expr::New { class, args } => {
                self.output.push_str(&format!("{class}->new"));
                self.write_args(args);
            }
            Expr::Bless { data, class } => {
                self.output.push_str("bless(");
                self.write_expr(data);
                self.output.push_str(", ");
                self.write_expr(class);
                self.output.push(')');
            }
            Expr::Do(body) => {
                self.output.push_str("do {");
                self.nl();
                self.write_block_body(body);
                self.write_indent();
                self.output.push('}');
            }
            Expr::BlockList {
                op,
                body,
                result,
                list,
            } => {
                self.output.push_str(op.name());
                let inline = body
                    .iter()
                    .all(|s| matches!(s.kind, StmtKind::VarDecl { .. } | StmtKind::Expr(_)));
                if inline {
                    self.output.push_str(" { ");
                    for stmt in body {
                        self.write_simple_stmt(stmt);
                        self.output.push_str("; ");
                    }
                    if matches!(result.as_ref(), Expr::HashRef(_)) {
                        self.output.push('+');
                    }
                    self.write_expr(result);
                    self.output.push_str(" } ");
                } else {
                    self.output.push_str(" {");
                    self.nl();
                    self.write_block_body(body);
                    self.depth += 1;
                    self.write_indent();
                    self.write_expr(result);
                    self.nl();
                    self.depth -= 1;
                    self.write_indent();
                    self.output.push_str("} ");
                }
                self.write_expr(list);
            }
            Expr::Regex { source, flags } => {
                self.output.push_str("qr{");
                self.write_regex_source(source);
                self.output.push('}');
                self.output.push_str(flags);
            }
            Expr::Substitute {
                target,
                source,
                replacement,
                global,
            } => {
                self.write_term(target);
                self.output.push_str(" =~ s{");
                self.write_regex_source(source);
                self.output.push_str("}{");
                self.write_expr(replacement);
                self.output.push('}');
                self.output.push_str(if *global { "ger" } else { "er" });
            }
            Expr::Paren(inner) => {
                self.output.push('(');
                self.write_expr(inner);
                self.output.push(')');
            }
            Expr::Raw(text) => self.output.push_str(text),
        }
    }

    fn write_regex_source(&mut self, source: &RegexSource) {
        match source {
            RegexSource::Pattern(pattern) => self.output.push_str(pattern),
            RegexSource::Quoted(expr) => {
                self.output.push_str("\\Q${\\ ");
                self.write_expr(expr);
                self.output.push_str("}\\E");
            }
        }
    }
}

fn is_bareword(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Var { .. }
        | Expr::Index { .. }
        | Expr::Key { .. }
        | Expr::Slice { .. }
        | Expr::LastIndex(_)
        | Expr::Deref { .. } => true,
        Expr::List(items) => items.iter().all(is_assignable),
        Expr::Paren(inner) => is_assignable(inner),
        // Local escape hatch: trust the transformer.
        Expr::Raw(_) => true,
        _ => false,
    }
}

/// `name(Int $a, $b) -> Str` when any type is known.
fn type_comment(sub: &Sub) -> Option<String> {
    if sub.return_type.is_none() && sub.params.iter().all(|p| p.ty.is_none()) {
        return None;
    }
    let params: Vec<String> = sub
        .params
        .iter()
        .map(|p| {
            let shape = if p.variadic { Shape::List } else { p.shape };
            match &p.ty {
                Some(ty) => format!("{ty} {}{}", sigil(shape), p.name),
                None => format!("{}{}", sigil(shape), p.name),
            }
        })
        .collect();
    let mut signature = format!("{}({})", sub.name, params.join(", "));
    if let Some(ret) = &sub.return_type {
        signature.push_str(&format!(" -> {ret}"));
    }
    Some(signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_stmts(body: Vec<Stmt>) -> String {
        let module = Module {
            body,
            ..Module::default()
        };
        PerlEmitter::emit_module(EmitterConfig::new("    "), &module)
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            left_parens: false,
            right_parens: false,
        }
    }

    #[test]
    fn test_sigils_follow_shape() {
        let out = emit_stmts(vec![
            Stmt::my(
                "list",
                Shape::List,
                Some(Expr::List(vec![Expr::number(1), Expr::number(2)])),
            ),
            Stmt::my("map", Shape::Map, Some(Expr::List(vec![]))),
            Stmt::expr(Expr::assign(
                Expr::index(Expr::var("list", Shape::List), Expr::number(0)),
                Expr::key(Expr::var("map", Shape::Map), Expr::string("k")),
            )),
            Stmt::expr(Expr::index(Expr::scalar("ref"), Expr::number(1))),
        ]);
        assert_eq!(
            out,
            "my @list = (1, 2);\nmy %map = ();\n$list[0] = $map{k};\n$ref->[1];\n"
        );
    }

    #[test]
    fn test_parens_come_from_flags() {
        let expr = Expr::Binary {
            op: BinaryOp::Mul,
            left: Box::new(binary(BinaryOp::Add, Expr::scalar("a"), Expr::scalar("b"))),
            right: Box::new(Expr::scalar("c")),
            left_parens: true,
            right_parens: false,
        };
        assert_eq!(emit_stmts(vec![Stmt::expr(expr)]), "($a + $b) * $c;\n");
    }

    #[test]
    fn test_elsif_chain_is_flat() {
        let inner_if = Stmt::new(StmtKind::If {
            cond: Expr::scalar("b"),
            then_branch: vec![Stmt::ret(Some(Expr::number(2)))],
            elsifs: vec![],
            else_branch: Some(vec![Stmt::ret(Some(Expr::number(3)))]),
        });
        let stmt = Stmt::new(StmtKind::If {
            cond: Expr::scalar("a"),
            then_branch: vec![Stmt::ret(Some(Expr::number(1)))],
            elsifs: vec![],
            else_branch: Some(vec![inner_if]),
        });
        assert_eq!(
            emit_stmts(vec![stmt]),
            "if ($a) {\n    return 1;\n} elsif ($b) {\n    return 2;\n} else {\n    return 3;\n}\n"
        );
    }

    #[test]
    fn test_next_line_braces() {
        let stmt = Stmt::new(StmtKind::While {
            label: None,
            cond: Expr::scalar("x"),
            body: vec![Stmt::new(StmtKind::LoopControl {
                kind: LoopControl::Last,
                label: None,
            })],
            post_test: false,
        });
        let mut config = EmitterConfig::new("  ");
        config.brace_style = BraceStyle::NextLine;
        let out = PerlEmitter::new(config).emit(Some(Node::Stmt(&stmt)));
        assert_eq!(out, "while ($x)\n{\n  last;\n}\n");
    }

    #[test]
    fn test_unassignable_target_renders_marker() {
        let stmt = Stmt::expr(Expr::assign(Expr::call("f", vec![]), Expr::number(1)));
        let out = emit_stmts(vec![stmt]);
        assert_eq!(out, "# ERROR: unsupported assignment target Call\n    1;\n");
    }

    #[test]
    fn test_unsupported_for_init_renders_marker() {
        let stmt = Stmt::new(StmtKind::For {
            label: None,
            init: Some(Box::new(Stmt::new(StmtKind::Return(None)))),
            cond: None,
            step: vec![],
            body: vec![],
        });
        let out = emit_stmts(vec![stmt]);
        assert_eq!(
            out,
            "for (; ;) {\n    # ERROR: unsupported for-loop initializer Return\n}\n"
        );
    }

    #[test]
    fn test_none_emits_nothing() {
        let mut emitter = PerlEmitter::new(EmitterConfig::new("    "));
        assert_eq!(emitter.emit(None), "");
    }

    #[test]
    fn test_anon_sub_indents_body() {
        let mut sub = Sub::new("", vec![Param::scalar("x")], vec![]);
        sub.body.push(Stmt::ret(Some(Expr::scalar("x"))));
        let stmt = Stmt::my("f", Shape::Scalar, Some(Expr::AnonSub(Box::new(sub))));
        assert_eq!(
            emit_stmts(vec![stmt]),
            "my $f = sub {\n    my ($x) = @_;\n    return $x;\n};\n"
        );
    }

    #[test]
    fn test_eval_try_without_finally() {
        let stmt = Stmt::new(StmtKind::Try {
            body: vec![Stmt::expr(Expr::call("risky", vec![]))],
            catch: Some(CatchClause {
                var: "e".into(),
                body: vec![Stmt::expr(Expr::call("warn", vec![Expr::scalar("e")]))],
            }),
            finally: None,
            native: false,
        });
        assert_eq!(
            emit_stmts(vec![stmt]),
            "eval {\n    risky();\n    1;\n} or do {\n    my $e = $@;\n    warn($e);\n};\n"
        );
    }

    #[test]
    fn test_negation_of_negative_literal() {
        let expr = Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(Expr::Literal(Literal::Number("-1".into()))),
            parens: false,
        };
        assert_eq!(emit_stmts(vec![Stmt::expr(expr)]), "-(-1);\n");
    }

    #[test]
    fn test_deref_of_do_block_is_forced_to_expression() {
        let block = || Expr::Do(vec![Stmt::expr(Expr::scalar("list"))]);
        let out = emit_stmts(vec![
            Stmt::expr(Expr::call("print", vec![Expr::deref(block(), Shape::List)])),
            Stmt::expr(Expr::LastIndex(Box::new(block()))),
        ]);
        assert!(out.contains("print(@{+do {"), "{out}");
        assert!(out.contains("$#{+do {"), "{out}");
        let plain = emit_stmts(vec![Stmt::expr(Expr::deref(Expr::scalar("xs"), Shape::List))]);
        assert_eq!(plain.trim(), "@{$xs};");
    }
}
