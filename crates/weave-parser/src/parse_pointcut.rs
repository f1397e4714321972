//! Pointcut heads and boolean expressions.

use weave_lexer::token::TokenKind;
use weave_types::ast::*;
use weave_types::Result;

use crate::parser::Parser;

impl Parser {
    /// ```ebnf
    /// ContextPointcut = "(" [ ContextArg { "," ContextArg } ] ")" "=>" Expr ;
    /// ContextArg      = [ WasmType "." ] ( "param" | "local" ) "[" Index "]" Identifier ;
    /// Index           = Number | "$" Identifier | Identifier | "?" ;
    /// ```
    pub fn parse_context_pointcut(mut self) -> Result<ContextPointcut> {
        let start = self.current_span();
        let args = self.parse_head(Self::parse_context_arg)?;
        self.parse_body(start, args)
    }

    /// ```ebnf
    /// PlainPointcut = "(" [ PlainArg { "," PlainArg } ] ")" "=>" Expr ;
    /// PlainArg      = [ WasmType ] Identifier ;
    /// ```
    pub fn parse_plain_pointcut(mut self) -> Result<PlainPointcut> {
        let start = self.current_span();
        let args = self.parse_head(Self::parse_plain_arg)?;
        self.parse_body(start, args)
    }

    fn parse_head<A>(&mut self, mut arg: impl FnMut(&mut Self) -> Result<A>) -> Result<Vec<A>> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            args.push(arg(self)?);
            while self.eat(&TokenKind::Comma) {
                args.push(arg(self)?);
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::FatArrow)?;
        Ok(args)
    }

    fn parse_body<A>(&mut self, start: weave_types::Span, args: Vec<A>) -> Result<Pointcut<A>> {
        let body = self.parse_expr()?;
        self.expect_eof()?;
        Ok(Pointcut {
            args,
            body,
            span: start.merge(self.previous_span()),
        })
    }

    fn parse_context_arg(&mut self) -> Result<ContextArg> {
        let start = self.current_span();
        let ty = match self.peek() {
            TokenKind::WasmType(ty) => {
                let ty = *ty;
                self.advance();
                self.expect(&TokenKind::Dot)?;
                Some(ty)
            }
            _ => None,
        };
        let locality = match self.peek() {
            TokenKind::Locality(l) => {
                let l = *l;
                self.advance();
                l
            }
            _ => return Err(self.unexpected("'param' or 'local'")),
        };
        self.expect(&TokenKind::LBracket)?;
        let index = match self.peek().clone() {
            TokenKind::Number(n) => {
                let ordinal = n
                    .parse::<u32>()
                    .map_err(|_| self.unexpected("an integer index"))?;
                self.advance();
                ArgIndex::Ordinal(ordinal)
            }
            TokenKind::Index(sym) => {
                self.advance();
                ArgIndex::Symbol(sym)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                ArgIndex::Alias(name)
            }
            TokenKind::Question => {
                self.advance();
                ArgIndex::Unbound
            }
            _ => return Err(self.unexpected("an index, '$symbol', name or '?'")),
        };
        self.expect(&TokenKind::RBracket)?;
        let name = self.expect_identifier()?;
        Ok(ContextArg {
            ty,
            locality,
            index,
            name,
            span: start.merge(self.previous_span()),
        })
    }

    fn parse_plain_arg(&mut self) -> Result<PlainArg> {
        let start = self.current_span();
        let ty = match self.peek() {
            TokenKind::WasmType(ty) => {
                let ty = *ty;
                self.advance();
                Some(ty)
            }
            _ => None,
        };
        let name = self.expect_identifier()?;
        Ok(PlainArg {
            ty,
            name,
            span: start.merge(self.previous_span()),
        })
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    /// ```ebnf
    /// Expr    = AndExpr { "||" AndExpr } ;
    /// AndExpr = Primary { "&&" Primary } ;
    /// Primary = "(" Expr ")" | Method ;
    /// ```
    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and_expr()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.parse_and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_primary()?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.parse_primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::LParen) {
            let inner = self.parse_expr()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(inner);
        }
        Ok(Expr::Method(self.parse_method()?))
    }
}
