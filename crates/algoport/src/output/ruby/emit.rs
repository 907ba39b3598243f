//! Ruby emitter: renders the Ruby tree as source text.
//!
//! Ruby blocks are keyword-delimited, so the brace style setting has no
//! effect here. Blocks attached to calls render as `{ |x| expr }` when their
//! body is one expression that fits on a line, else as `do |x| ... end`.

use super::ast::*;
use crate::output::EmitterConfig;

/// Emits a Ruby tree as source code.
pub struct RubyEmitter {
    config: EmitterConfig,
    output: String,
    depth: usize,
}

impl RubyEmitter {
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
            Node::Class(class) => self.write_class(class),
            Node::Method(method) => self.write_method(method),
            Node::Block(block) => self.write_block(block),
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
        tracing::warn!(node_type = what, "unrenderable Ruby node");
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
        let mut sections = 0;
        if !module.magic_comments.is_empty() {
            for magic in &module.magic_comments {
                self.line(&format!("# {magic}"));
            }
            sections += 1;
        }
        if !module.requires.is_empty() {
            if sections > 0 {
                self.nl();
            }
            for require in &module.requires {
                let keyword = if require.relative {
                    "require_relative"
                } else {
                    "require"
                };
                self.line(&format!("{keyword} {}", quote_string(&require.path)));
            }
            sections += 1;
        }
        if sections > 0 && (!module.body.is_empty() || module.name.is_some()) {
            self.nl();
        }
        self.write_meta(&module.meta);
        match &module.name {
            Some(name) => {
                self.line(&format!("module {name}"));
                self.depth += 1;
                if module
                    .body
                    .iter()
                    .any(|s| matches!(s.kind, StmtKind::Method(_)))
                {
                    self.line("module_function");
                    self.nl();
                }
                self.write_top_level(&module.body);
                self.depth -= 1;
                self.line("end");
            }
            None => self.write_top_level(&module.body),
        }
    }

    /// Statements separated by blank lines around methods and classes.
    fn write_top_level(&mut self, body: &[Stmt]) {
        let mut prev_spaced = false;
        for (i, stmt) in body.iter().enumerate() {
            let spaced = matches!(stmt.kind, StmtKind::Method(_) | StmtKind::Class(_));
            if i > 0 && (spaced || prev_spaced) {
                self.nl();
            }
            self.write_stmt(stmt);
            prev_spaced = spaced;
        }
    }

    fn write_class(&mut self, class: &Class) {
        self.write_meta(&class.meta);
        match &class.base {
            Some(base) => self.line(&format!("class {} < {base}", class.name)),
            None => self.line(&format!("class {}", class.name)),
        }
        self.depth += 1;
        let mut sections = 0;
        let (statics, instance): (Vec<&Field>, Vec<&Field>) =
            class.fields.iter().partition(|f| f.is_static);
        if !instance.is_empty() {
            self.write_accessors(&instance);
            sections += 1;
        }
        if !statics.is_empty() {
            if sections > 0 {
                self.nl();
            }
            self.line("class << self");
            self.depth += 1;
            self.write_accessors(&statics);
            self.depth -= 1;
            self.line("end");
            sections += 1;
        }
        if !class.static_init.is_empty() {
            if sections > 0 {
                self.nl();
            }
            for stmt in &class.static_init {
                self.write_stmt(stmt);
            }
            sections += 1;
        }
        for method in &class.methods {
            if sections > 0 {
                self.nl();
            }
            self.write_method(method);
            sections += 1;
        }
        self.depth -= 1;
        self.line("end");
    }

    /// Untyped attributes share one `attr_accessor`; typed ones get their
    /// own line with an inline RBS annotation.
    fn write_accessors(&mut self, fields: &[&Field]) {
        let untyped: Vec<String> = fields
            .iter()
            .filter(|f| f.ty.is_none())
            .map(|f| format!(":{}", f.name))
            .collect();
        if !untyped.is_empty() {
            self.line(&format!("attr_accessor {}", untyped.join(", ")));
        }
        for field in fields {
            if let Some(ty) = &field.ty {
                self.line(&format!("attr_accessor :{} #: {ty}", field.name));
            }
        }
    }

    fn write_method(&mut self, method: &Method) {
        self.write_meta(&method.meta);
        if let Some(signature) = type_comment(method) {
            self.line(&format!("#: {signature}"));
        }
        self.write_indent();
        self.output.push_str("def ");
        if method.is_static {
            self.output.push_str("self.");
        }
        self.output.push_str(&method.name);
        if !method.params.is_empty() {
            self.output.push('(');
            self.write_params(&method.params);
            self.output.push(')');
        }
        if method.endless
            && let Some(value) = endless_value(&method.body)
        {
            self.output.push_str(" = ");
            self.write_expr(value);
            self.nl();
            return;
        }
        self.nl();
        self.write_block_body(&method.body);
        self.line("end");
    }

    fn write_params(&mut self, params: &[Param]) {
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.output.push_str(", ");
            }
            if param.variadic {
                self.output.push('*');
            }
            self.output.push_str(&param.name);
            if let Some(default) = &param.default {
                self.output.push_str(" = ");
                self.write_expr(default);
            }
        }
    }

    /// `|a, b; tmp|`, or nothing for a block without parameters.
    fn write_block_params(&mut self, block: &Block) {
        if block.params.is_empty() && block.locals.is_empty() {
            return;
        }
        self.output.push('|');
        self.write_params(&block.params);
        if !block.locals.is_empty() {
            self.output.push_str("; ");
            self.output.push_str(&block.locals.join(", "));
        }
        self.output.push('|');
    }

    /// A block after a call or `lambda`, starting with the separating space.
    fn write_block(&mut self, block: &Block) {
        if let [only] = block.body.as_slice()
            && let StmtKind::Expr(expr) = &only.kind
            && only.meta.comments.is_empty()
            && block.locals.is_empty()
        {
            let mark = self.output.len();
            self.output.push_str(" { ");
            let before = self.output.len();
            self.write_block_params(block);
            if self.output.len() > before {
                self.output.push(' ');
            }
            self.write_expr(expr);
            self.output.push_str(" }");
            if !self.output[mark..].contains('\n') {
                return;
            }
            self.output.truncate(mark);
        }
        self.output.push_str(" do");
        if !block.params.is_empty() || !block.locals.is_empty() {
            self.output.push(' ');
            self.write_block_params(block);
        }
        self.nl();
        self.write_block_body(&block.body);
        self.write_indent();
        self.output.push_str("end");
    }

    fn write_stmt(&mut self, stmt: &Stmt) {
        self.write_meta(&stmt.meta);
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.write_indent();
                self.write_expr(expr);
                self.nl();
            }
            StmtKind::Return(value) => {
                self.write_indent();
                self.output.push_str("return");
                if let Some(value) = value {
                    self.output.push(' ');
                    self.write_expr(value);
                }
                self.nl();
            }
            StmtKind::If {
                cond,
                then_branch,
                elsifs,
                else_branch,
            } => self.write_if(cond, then_branch, elsifs, else_branch.as_deref()),
            StmtKind::While {
                cond,
                body,
                post_test,
            } => {
                if *post_test {
                    self.line("begin");
                    self.write_block_body(body);
                    self.write_indent();
                    self.output.push_str("end while ");
                    self.write_expr(cond);
                    self.nl();
                } else {
                    self.write_indent();
                    self.output.push_str("while ");
                    self.write_expr(cond);
                    self.nl();
                    self.write_block_body(body);
                    self.line("end");
                }
            }
            StmtKind::LoopControl { kind, value } => {
                self.write_indent();
                self.output.push_str(kind.keyword());
                if let Some(value) = value {
                    self.output.push(' ');
                    self.write_expr(value);
                }
                self.nl();
            }
            StmtKind::Catch { tag, body } => {
                self.line(&format!("catch(:{tag}) do"));
                self.write_block_body(body);
                self.line("end");
            }
            StmtKind::Throw { tag } => self.line(&format!("throw :{tag}")),
            StmtKind::Raise { class, message } => {
                self.write_indent();
                self.output.push_str("raise");
                if let Some(class) = class {
                    self.output.push(' ');
                    self.output.push_str(class);
                    if message.is_some() {
                        self.output.push(',');
                    }
                }
                if let Some(message) = message {
                    self.output.push(' ');
                    self.write_expr(message);
                }
                self.nl();
            }
            StmtKind::Begin {
                body,
                rescue,
                ensure,
            } => {
                self.line("begin");
                self.write_block_body(body);
                if let Some(rescue) = rescue {
                    match &rescue.var {
                        Some(var) => self.line(&format!("rescue => {var}")),
                        None => self.line("rescue"),
                    }
                    self.write_block_body(&rescue.body);
                }
                if let Some(ensure) = ensure {
                    self.line("ensure");
                    self.write_block_body(ensure);
                }
                self.line("end");
            }
            StmtKind::Class(class) => self.write_class(class),
            StmtKind::Method(method) => self.write_method(method),
            StmtKind::Raw(text) => {
                for raw in text.lines() {
                    self.line(raw);
                }
            }
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
        self.output.push_str("if ");
        self.write_expr(cond);
        self.nl();
        self.write_block_body(then_branch);

        let mut clauses: Vec<(&Expr, &[Stmt])> =
            elsifs.iter().map(|(c, b)| (c, b.as_slice())).collect();
        let mut tail = else_branch;
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
            self.write_indent();
            self.output.push_str("elsif ");
            self.write_expr(cond);
            self.nl();
            self.write_block_body(body);
        }
        if let Some(body) = tail {
            self.line("else");
            self.write_block_body(body);
        }
        self.line("end");
    }

    fn write_args(&mut self, args: &[Expr]) {
        self.output.push('(');
        self.write_list(args);
        self.output.push(')');
    }

    fn write_list(&mut self, items: &[Expr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.output.push_str(", ");
            }
            self.write_expr(item);
        }
    }

    /// Render `expr` where a term is required (receiver, index base).
    fn write_term(&mut self, expr: &Expr) {
        let wrap = expr.precedence() < 100
            || matches!(expr, Expr::Lambda(_) | Expr::Begin(_) | Expr::Hash(_));
        self.write_operand(expr, wrap);
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

    fn write_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(lit) => self.output.push_str(&lit.to_string()),
            Expr::Var { name, kind } => {
                self.output.push_str(kind.prefix());
                self.output.push_str(name);
            }
            Expr::SelfRef => self.output.push_str("self"),
            Expr::Index { base, index } => {
                self.write_term(base);
                self.output.push('[');
                self.write_expr(index);
                self.output.push(']');
            }
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
                self.output.push_str(op.symbol());
                // `-2.abs` would apply the sign first.
                let numeric_start = *op == UnaryOp::Neg && starts_with_number(operand);
                self.write_operand(operand, *parens || numeric_start);
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
            Expr::MultiAssign { targets, value } => {
                if let Some(bad) = targets.iter().find(|t| !is_assignable(t)) {
                    self.write_gap(&format!("assignment target {}", bad.node_type()));
                    self.write_expr(value);
                    return;
                }
                self.write_list(targets);
                self.output.push_str(" = ");
                self.write_expr(value);
            }
            Expr::Call {
                receiver,
                name,
                args,
                block,
            } => {
                if let Some(receiver) = receiver {
                    self.write_term(receiver);
                    self.output.push('.');
                }
                self.output.push_str(name);
                if !args.is_empty() || (receiver.is_none() && block.is_none()) {
                    self.write_args(args);
                }
                if let Some(block) = block {
                    self.write_block(block);
                }
            }
            Expr::Super(args) => {
                self.output.push_str("super");
                self.write_args(args);
            }
            Expr::Array(items) => {
                self.output.push('[');
                self.write_list(items);
                self.output.push(']');
            }
            Expr::Hash(pairs) => {
                if pairs.is_empty() {
                    self.output.push_str("{}");
                    return;
                }
                self.output.push_str("{ ");
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.write_expr(key);
                    self.output.push_str(" => ");
                    self.write_expr(value);
                }
                self.output.push_str(" }");
            }
            Expr::Splat(inner) => {
                self.output.push('*');
                self.write_term(inner);
            }
            Expr::BlockPass(inner) => {
                self.output.push('&');
                self.write_term(inner);
            }
            Expr::Range {
                start,
                end,
                exclusive,
            } => {
                self.write_operand(start, start.precedence() <= 6);
                self.output.push_str(if *exclusive { "..." } else { ".." });
                if let Some(end) = end {
                    self.write_operand(end, end.precedence() <= 6);
                }
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.write_operand(cond, cond.precedence() <= 5);
                self.output.push_str(" ? ");
                self.write_operand(then_expr, then_expr.precedence() < 5);
                self.output.push_str(" : ");
                self.write_operand(else_expr, else_expr.precedence() < 5);
            }
            Expr::Lambda(block) => {
                self.output.push_str("lambda");
                self.write_block(block);
            }
            Expr::New { class, args } => {
                self.output.push_str(class);
                self.output.push_str(".new");
                if !args.is_empty() {
                    self.write_args(args);
                }
            }
            Expr::Begin(body) => {
                self.output.push_str("begin");
                self.nl();
                self.write_block_body(body);
                self.write_indent();
                self.output.push_str("end");
            }
            Expr::Interp(parts) => {
                self.output.push('"');
                for part in parts {
                    match part {
                        InterpPart::Text(text) => {
                            self.output.push_str(&escape_double_quoted(text))
                        }
                        InterpPart::Expr(expr) => {
                            self.output.push_str("#{");
                            self.write_expr(expr);
                            self.output.push('}');
                        }
                    }
                }
                self.output.push('"');
            }
            Expr::Regex { pattern, flags } => {
                self.output.push('/');
                self.output.push_str(&regex_body(pattern));
                self.output.push('/');
                self.output.push_str(flags);
            }
            Expr::Paren(inner) => {
                self.output.push('(');
                self.write_expr(inner);
                self.output.push(')');
            }
            Expr::Raw(text) => self.output.push_str(text),
        }
    }
}

/// Escape an unescaped `/` and the `#{` interpolation opener.
fn regex_body(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                out.push(c);
                escaped = true;
            }
            '/' => out.push_str("\\/"),
            '#' if chars.peek() == Some(&'{') => out.push_str("\\#"),
            _ => out.push(c),
        }
    }
    out
}

/// Whether the rendered expression begins with a numeric literal.
fn starts_with_number(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(Literal::Number(_)) => true,
        Expr::Call {
            receiver: Some(receiver),
            ..
        } => starts_with_number(receiver),
        Expr::Index { base, .. } => starts_with_number(base),
        _ => false,
    }
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Var { .. } | Expr::Index { .. } => true,
        // `obj.name = v` calls the `name=` writer.
        Expr::Call {
            receiver: Some(_),
            args,
            block: None,
            ..
        } => args.is_empty(),
        Expr::Splat(inner) | Expr::Paren(inner) => is_assignable(inner),
        Expr::Raw(_) => true,
        _ => false,
    }
}

/// The expression an endless method returns, when the body is just that.
fn endless_value(body: &[Stmt]) -> Option<&Expr> {
    match body {
        [only] if only.meta.comments.is_empty() => match &only.kind {
            StmtKind::Return(Some(value)) | StmtKind::Expr(value) => Some(value),
            _ => None,
        },
        _ => None,
    }
}

/// `(Integer a, ?untyped b) -> String` when any type is known.
fn type_comment(method: &Method) -> Option<String> {
    if method.return_type.is_none() && method.params.iter().all(|p| p.ty.is_none()) {
        return None;
    }
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| {
            let ty = p
                .ty
                .as_ref()
                .map_or_else(|| "untyped".to_string(), ToString::to_string);
            let prefix = if p.variadic {
                "*"
            } else if p.default.is_some() {
                "?"
            } else {
                ""
            };
            format!("{prefix}{ty} {}", p.name)
        })
        .collect();
    let ret = method
        .return_type
        .as_ref()
        .map_or_else(|| "untyped".to_string(), ToString::to_string);
    Some(format!("({}) -> {ret}", params.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_stmts(body: Vec<Stmt>) -> String {
        let module = Module {
            body,
            ..Module::default()
        };
        RubyEmitter::emit_module(EmitterConfig::new("  "), &module)
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
    fn test_variable_prefixes() {
        let out = emit_stmts(vec![
            Stmt::assign(Expr::ivar("count"), Expr::number(0)),
            Stmt::assign(
                Expr::Var {
                    name: "table".into(),
                    kind: VarKind::Global,
                },
                Expr::Array(vec![Expr::number(1), Expr::number(2)]),
            ),
            Stmt::expr(Expr::index(Expr::local("list"), Expr::string("k"))),
        ]);
        assert_eq!(out, "@count = 0\n$table = [1, 2]\nlist['k']\n");
    }

    #[test]
    fn test_single_expression_block_is_inline() {
        let expr = Expr::with_block(
            Expr::local("list"),
            "map",
            vec![],
            Block::single(&["x"], binary(BinaryOp::Mul, Expr::local("x"), Expr::number(2))),
        );
        assert_eq!(emit_stmts(vec![Stmt::expr(expr)]), "list.map { |x| x * 2 }\n");
    }

    #[test]
    fn test_multi_statement_block_uses_do_end() {
        let expr = Expr::with_block(
            Expr::local("list"),
            "each",
            vec![],
            Block::new(
                &["x"],
                vec![
                    Stmt::expr(Expr::call("puts", vec![Expr::local("x")])),
                    Stmt::control(LoopControl::Next),
                ],
            ),
        );
        assert_eq!(
            emit_stmts(vec![Stmt::expr(expr)]),
            "list.each do |x|\n  puts(x)\n  next\nend\n"
        );
    }

    #[test]
    fn test_elsif_chain_is_flat() {
        let inner_if = Stmt::new(StmtKind::If {
            cond: Expr::local("b"),
            then_branch: vec![Stmt::ret(Some(Expr::number(2)))],
            elsifs: vec![],
            else_branch: Some(vec![Stmt::ret(Some(Expr::number(3)))]),
        });
        let stmt = Stmt::new(StmtKind::If {
            cond: Expr::local("a"),
            then_branch: vec![Stmt::ret(Some(Expr::number(1)))],
            elsifs: vec![],
            else_branch: Some(vec![inner_if]),
        });
        assert_eq!(
            emit_stmts(vec![stmt]),
            "if a\n  return 1\nelsif b\n  return 2\nelse\n  return 3\nend\n"
        );
    }

    #[test]
    fn test_post_test_loop() {
        let stmt = Stmt::new(StmtKind::While {
            cond: binary(BinaryOp::Lt, Expr::local("i"), Expr::number(3)),
            body: vec![Stmt::expr(Expr::compound(
                Expr::local("i"),
                BinaryOp::Add,
                Expr::number(1),
            ))],
            post_test: true,
        });
        assert_eq!(emit_stmts(vec![stmt]), "begin\n  i += 1\nend while i < 3\n");
    }

    #[test]
    fn test_unassignable_target_renders_marker() {
        let stmt = Stmt::assign(Expr::call("f", vec![]), Expr::number(1));
        let out = emit_stmts(vec![stmt]);
        assert_eq!(out, "# ERROR: unsupported assignment target Call\n  1\n");
    }

    #[test]
    fn test_interpolation_escapes_text() {
        let expr = Expr::Interp(vec![
            InterpPart::Text("cost: \"#".into()),
            InterpPart::Expr(Expr::local("n")),
        ]);
        assert_eq!(emit_stmts(vec![Stmt::expr(expr)]), "\"cost: \\\"\\##{n}\"\n");
    }

    #[test]
    fn test_class_with_accessors_and_static_fields() {
        let mut initialize = Method::new("initialize", vec![Param::new("x")], vec![]);
        initialize
            .body
            .push(Stmt::assign(Expr::ivar("x"), Expr::local("x")));
        let class = Class {
            name: "Point".into(),
            base: None,
            fields: vec![
                Field {
                    name: "x".into(),
                    ty: None,
                    is_static: false,
                },
                Field {
                    name: "count".into(),
                    ty: None,
                    is_static: true,
                },
            ],
            methods: vec![initialize],
            static_init: vec![Stmt::assign(Expr::ivar("count"), Expr::number(0))],
            meta: NodeMeta::default(),
        };
        assert_eq!(
            emit_stmts(vec![Stmt::new(StmtKind::Class(Box::new(class)))]),
            "class Point\n  attr_accessor :x\n\n  class << self\n    attr_accessor :count\n  end\n\n  @count = 0\n\n  def initialize(x)\n    @x = x\n  end\nend\n"
        );
    }

    #[test]
    fn test_begin_rescue_ensure() {
        let stmt = Stmt::new(StmtKind::Begin {
            body: vec![Stmt::expr(Expr::call("risky", vec![]))],
            rescue: Some(RescueClause {
                var: Some("e".into()),
                body: vec![Stmt::expr(Expr::call(
                    "puts",
                    vec![Expr::method(Expr::local("e"), "message", vec![])],
                ))],
            }),
            ensure: Some(vec![Stmt::expr(Expr::call("done", vec![]))]),
        });
        assert_eq!(
            emit_stmts(vec![stmt]),
            "begin\n  risky()\nrescue => e\n  puts(e.message)\nensure\n  done()\nend\n"
        );
    }

    #[test]
    fn test_negated_numeric_receiver_is_wrapped() {
        let expr = Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(Expr::method(Expr::number(2), "abs", vec![])),
            parens: false,
        };
        assert_eq!(emit_stmts(vec![Stmt::expr(expr)]), "-(2.abs)\n");
    }

    #[test]
    fn test_regex_slashes_escaped() {
        let expr = Expr::Regex {
            pattern: "a/b\\/c#{".into(),
            flags: "i".into(),
        };
        assert_eq!(emit_stmts(vec![Stmt::expr(expr)]), "/a\\/b\\/c\\#{/i\n");
    }

    #[test]
    fn test_endless_method_and_type_comment() {
        let mut method = Method::new(
            "double",
            vec![Param {
                ty: Some(RubyType::Integer),
                ..Param::new("n")
            }],
            vec![Stmt::ret(Some(binary(
                BinaryOp::Mul,
                Expr::local("n"),
                Expr::number(2),
            )))],
        );
        method.endless = true;
        method.return_type = Some(RubyType::Integer);
        assert_eq!(
            emit_stmts(vec![Stmt::new(StmtKind::Method(Box::new(method)))]),
            "#: (Integer n) -> Integer\ndef double(n) = n * 2\n"
        );
    }

    #[test]
    fn test_none_emits_nothing() {
        let mut emitter = RubyEmitter::new(EmitterConfig::new("  "));
        assert_eq!(emitter.emit(None), "");
    }
}
