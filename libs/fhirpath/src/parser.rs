use crate::ast::{BinaryOp, Expr, Literal};
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};

pub fn parse(src: &str) -> Result<Expr> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_implies()?;
    parser.expect(Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(Error::UnexpectedToken(format!("{:?}", self.peek())))
        }
    }

    fn eat(&mut self, t: &Token) -> bool {
        if self.peek() == t {
            self.advance();
            true
        } else {
            false
        }
    }

    // implies has the lowest precedence, then or/xor, and, equality, comparison, union, additive, multiplicative, unary, postfix/invocation.
    fn parse_implies(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_or()?;
        while self.eat(&Token::Implies) {
            let rhs = self.parse_or()?;
            lhs = Expr::Binary(BinaryOp::Implies, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            if self.eat(&Token::Or) {
                let rhs = self.parse_and()?;
                lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
            } else if self.eat(&Token::Xor) {
                let rhs = self.parse_and()?;
                lhs = Expr::Binary(BinaryOp::Xor, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_union()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_union()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_additive()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_invocation()
    }

    /// Parses a dotted invocation chain: `a.b(x).c`
    fn parse_invocation(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_primary()?;
        while self.eat(&Token::Dot) {
            let rhs = self.parse_term()?;
            lhs = Expr::Invoke(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// A single path step: identifier, or identifier(args)
    fn parse_term(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::Function(name, args))
                } else {
                    Ok(Expr::Member(name))
                }
            }
            Token::As => Ok(Expr::Member("as".to_string())),
            Token::Is => Ok(Expr::Member("is".to_string())),
            other => Err(Error::UnexpectedToken(format!("{:?}", other))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_implies()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            break;
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::True => Ok(Expr::Literal(Literal::Boolean(true))),
            Token::False => Ok(Expr::Literal(Literal::Boolean(false))),
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::String(s) => Ok(Expr::Literal(Literal::String(s))),
            Token::Dollar => match self.advance() {
                Token::Ident(name) => Ok(Expr::Variable(name)),
                other => Err(Error::UnexpectedToken(format!("{:?}", other))),
            },
            Token::Percent => match self.advance() {
                Token::Ident(name) => Ok(Expr::EnvVariable(name)),
                other => Err(Error::UnexpectedToken(format!("{:?}", other))),
            },
            Token::LParen => {
                let inner = self.parse_implies()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::Function(name, args))
                } else {
                    Ok(Expr::Member(name))
                }
            }
            other => Err(Error::UnexpectedToken(format!("{:?}", other))),
        }
    }
}
