//! Recursive-descent parser for the `expr` language.

use super::ast::{BinaryOp, Expr, LogicalOp, Stmt, StmtKind, UnaryOp};
use super::lexer::{tokenize, Tok, Token};
use crate::error::{ScriptError, ScriptResult};

/// Deepest nesting the parser accepts, counting both statement nesting and
/// expression depth. Evaluation recurses along the same tree, so this also
/// bounds the interpreter's stack use.
pub const MAX_DEPTH: usize = 128;

/// Parses a whole script into statements.
pub fn parse(source: &str) -> ScriptResult<Vec<Stmt>> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
        depth: 0,
    };
    let mut program = Vec::new();
    while !parser.at(&Tok::Eof) {
        program.push(parser.statement()?);
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

/// An expression together with the height of its tree.
struct Node {
    expr: Expr,
    depth: usize,
}

impl Node {
    const fn leaf(expr: Expr) -> Self {
        Self { expr, depth: 1 }
    }
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if tok != Tok::Eof {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> ScriptResult<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::compile(self.line(), message)
    }

    fn ident(&mut self) -> ScriptResult<String> {
        match self.advance() {
            Tok::Ident(name) => Ok(name),
            other => Err(self.error(format!("expected identifier, found {other:?}"))),
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ScriptResult<T>) -> ScriptResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("script nested deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn node(&self, expr: Expr, depth: usize) -> ScriptResult<Node> {
        if depth > MAX_DEPTH {
            return Err(self.error(format!("expression nested deeper than {MAX_DEPTH} levels")));
        }
        Ok(Node { expr, depth })
    }

    fn join(
        &self,
        left: Node,
        right: Node,
        build: impl FnOnce(Box<Expr>, Box<Expr>) -> Expr,
    ) -> ScriptResult<Node> {
        let depth = left.depth.max(right.depth) + 1;
        self.node(build(Box::new(left.expr), Box::new(right.expr)), depth)
    }

    fn statement(&mut self) -> ScriptResult<Stmt> {
        self.nested(Self::statement_body)
    }

    fn statement_body(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            Tok::Semi => {
                self.advance();
                StmtKind::Empty
            }
            Tok::LBrace => {
                self.advance();
                let mut body = Vec::new();
                while !self.at(&Tok::RBrace) {
                    if self.at(&Tok::Eof) {
                        return Err(self.error("unterminated block"));
                    }
                    body.push(self.statement()?);
                }
                self.advance();
                StmtKind::Block(body)
            }
            Tok::Var => {
                self.advance();
                let name = self.ident()?;
                let init = if self.eat(&Tok::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.end_of_statement()?;
                StmtKind::Declare(name, init)
            }
            Tok::If => {
                self.advance();
                self.expect(&Tok::LParen, "'(' after if")?;
                let cond = self.expression()?;
                self.expect(&Tok::RParen, "')' after condition")?;
                let then = Box::new(self.statement()?);
                let otherwise = if self.eat(&Tok::Else) {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                StmtKind::If(cond, then, otherwise)
            }
            Tok::While => {
                self.advance();
                self.expect(&Tok::LParen, "'(' after while")?;
                let cond = self.expression()?;
                self.expect(&Tok::RParen, "')' after condition")?;
                StmtKind::While(cond, Box::new(self.statement()?))
            }
            Tok::Return => {
                self.advance();
                self.end_of_statement()?;
                StmtKind::Return
            }
            Tok::Throw => {
                self.advance();
                let value = self.expression()?;
                self.end_of_statement()?;
                StmtKind::Throw(value)
            }
            _ => {
                let expr = self.expression()?;
                let kind = if self.eat(&Tok::Assign) {
                    if !matches!(expr, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
                        return Err(self.error("invalid assignment target"));
                    }
                    StmtKind::Assign(expr, self.expression()?)
                } else {
                    StmtKind::Expr(expr)
                };
                self.end_of_statement()?;
                kind
            }
        };
        Ok(Stmt { kind, line })
    }

    /// Semicolons are optional before `}` and at end of input.
    fn end_of_statement(&mut self) -> ScriptResult<()> {
        if self.eat(&Tok::Semi) || self.at(&Tok::RBrace) || self.at(&Tok::Eof) {
            Ok(())
        } else {
            Err(self.error(format!("expected ';', found {:?}", self.peek())))
        }
    }

    fn expression(&mut self) -> ScriptResult<Expr> {
        Ok(self.subexpression()?.expr)
    }

    fn subexpression(&mut self) -> ScriptResult<Node> {
        self.nested(Self::logical_or)
    }

    fn logical_or(&mut self) -> ScriptResult<Node> {
        let mut left = self.logical_and()?;
        while self.eat(&Tok::Or) {
            let right = self.logical_and()?;
            left = self.join(left, right, |l, r| Expr::Logical(LogicalOp::Or, l, r))?;
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> ScriptResult<Node> {
        let mut left = self.equality()?;
        while self.eat(&Tok::And) {
            let right = self.equality()?;
            left = self.join(left, right, |l, r| Expr::Logical(LogicalOp::And, l, r))?;
        }
        Ok(left)
    }

    fn equality(&mut self) -> ScriptResult<Node> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Tok::Eq => BinaryOp::Eq,
                Tok::NotEq => BinaryOp::NotEq,
                Tok::StrictEq => BinaryOp::StrictEq,
                Tok::StrictNotEq => BinaryOp::StrictNotEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.comparison()?;
            left = self.join(left, right, |l, r| Expr::Binary(op, l, r))?;
        }
    }

    fn comparison(&mut self) -> ScriptResult<Node> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Tok::Lt => BinaryOp::Lt,
                Tok::Le => BinaryOp::Le,
                Tok::Gt => BinaryOp::Gt,
                Tok::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = self.join(left, right, |l, r| Expr::Binary(op, l, r))?;
        }
    }

    fn additive(&mut self) -> ScriptResult<Node> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinaryOp::Add,
                Tok::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = self.join(left, right, |l, r| Expr::Binary(op, l, r))?;
        }
    }

    fn multiplicative(&mut self) -> ScriptResult<Node> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinaryOp::Mul,
                Tok::Slash => BinaryOp::Div,
                Tok::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = self.join(left, right, |l, r| Expr::Binary(op, l, r))?;
        }
    }

    fn unary(&mut self) -> ScriptResult<Node> {
        let op = match self.peek() {
            Tok::Bang => UnaryOp::Not,
            Tok::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.nested(Self::unary)?;
        self.node(Expr::Unary(op, Box::new(operand.expr)), operand.depth + 1)
    }

    fn postfix(&mut self) -> ScriptResult<Node> {
        let mut node = self.primary()?;
        loop {
            match self.peek() {
                Tok::Dot => {
                    self.advance();
                    let name = self.ident()?;
                    node = self.node(Expr::Member(Box::new(node.expr), name), node.depth + 1)?;
                }
                Tok::LBracket => {
                    self.advance();
                    let index = self.subexpression()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    node = self.join(node, index, Expr::Index)?;
                }
                Tok::LParen => {
                    let Expr::Ident(name) = node.expr else {
                        return Err(self.error("only global functions can be called"));
                    };
                    self.advance();
                    let args = self.arguments()?;
                    let depth = args.iter().map(|arg| arg.depth).max().unwrap_or(0) + 1;
                    let args = args.into_iter().map(|arg| arg.expr).collect();
                    node = self.node(Expr::Call(name, args), depth)?;
                }
                _ => return Ok(node),
            }
        }
    }

    fn arguments(&mut self) -> ScriptResult<Vec<Node>> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.subexpression()?);
            if self.eat(&Tok::RParen) {
                return Ok(args);
            }
            self.expect(&Tok::Comma, "',' or ')'")?;
        }
    }

    fn primary(&mut self) -> ScriptResult<Node> {
        let expr = match self.advance() {
            Tok::Number(n) => Expr::Number(n),
            Tok::Str(s) => Expr::Str(s),
            Tok::True => Expr::Bool(true),
            Tok::False => Expr::Bool(false),
            Tok::Null => Expr::Null,
            Tok::Undefined => Expr::Undefined,
            Tok::Ident(name) => Expr::Ident(name),
            Tok::LParen => {
                let inner = self.subexpression()?;
                self.expect(&Tok::RParen, "')'")?;
                return Ok(inner);
            }
            other => return Err(self.error(format!("unexpected token {other:?}"))),
        };
        Ok(Node::leaf(expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conditional_routing() {
        let program = parse(
            r#"
            if (steps[1] && steps[1].idp == "A") {
                executeStep(3);
            }
            "#,
        )
        .unwrap();

        assert_eq!(program.len(), 1);
        assert_eq!(program[0].line, 2);
        let StmtKind::If(cond, _, None) = &program[0].kind else {
            panic!("expected if statement");
        };
        assert!(matches!(cond, Expr::Logical(LogicalOp::And, _, _)));
    }

    #[test]
    fn precedence() {
        let program = parse("var x = 1 + 2 * 3 < 10;").unwrap();
        let StmtKind::Declare(_, Some(Expr::Binary(BinaryOp::Lt, left, _))) = &program[0].kind
        else {
            panic!("expected comparison at the root");
        };
        assert!(matches!(**left, Expr::Binary(BinaryOp::Add, _, _)));
    }

    #[test]
    fn member_assignment_parses() {
        let program = parse("steps[1].idp = 'B';").unwrap();
        assert!(matches!(program[0].kind, StmtKind::Assign(Expr::Member(..), _)));
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse("1 = 2;").unwrap_err();
        assert!(matches!(err, ScriptError::Compile { .. }));
    }

    #[test]
    fn method_calls_are_rejected() {
        assert!(parse("steps.get(1);").is_err());
    }

    #[test]
    fn missing_semicolon_between_statements() {
        let err = parse("var a = 1 var b = 2;").unwrap_err();
        assert!(err.to_string().contains("expected ';'"));
    }

    #[test]
    fn semicolon_optional_at_end() {
        assert!(parse("succeed()").is_ok());
        assert!(parse("if (true) { fail() }").is_ok());
    }

    #[test]
    fn deep_parentheses_are_rejected() {
        let source = format!("{}1{};", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse(&source).unwrap_err();
        assert!(matches!(err, ScriptError::Compile { line: 1, .. }));
        assert!(err.to_string().contains("nested deeper"));
    }

    #[test]
    fn long_operator_chain_is_rejected() {
        let source = format!("var x = 1{};", " + 1".repeat(10_000));
        assert!(matches!(parse(&source), Err(ScriptError::Compile { .. })));
    }

    #[test]
    fn deep_blocks_are_rejected() {
        let source = format!("{}{}", "{".repeat(100_000), "}".repeat(100_000));
        assert!(matches!(parse(&source), Err(ScriptError::Compile { .. })));
        let source = format!("{}succeed();", "if (true) ".repeat(100_000));
        assert!(matches!(parse(&source), Err(ScriptError::Compile { .. })));
    }

    #[test]
    fn unary_chain_is_rejected() {
        let source = format!("var x = {}1;", "!".repeat(100_000));
        assert!(matches!(parse(&source), Err(ScriptError::Compile { .. })));
    }

    #[test]
    fn nesting_within_limit_parses() {
        let depth = MAX_DEPTH / 2;
        let source = format!("var x = {}1{};", "(".repeat(depth), ")".repeat(depth));
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn unterminated_block() {
        let err = parse("if (true) {\n succeed();").unwrap_err();
        assert!(matches!(err, ScriptError::Compile { line: 2, .. }));
    }
}
