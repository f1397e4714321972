//! Pointcut methods and function definitions.

use regex::Regex;
use weave_lexer::token::TokenKind;
use weave_types::ast::*;
use weave_types::{ErrorCode, Result, WasmType, WeaveError};

use crate::parser::Parser;

impl Parser {
    /// ```ebnf
    /// Method = "func" "(" FuncDef ")"
    ///        | "call" "(" FuncDef ")"
    ///        | "args" "(" [ Identifier { "," Identifier } ] ")"
    ///        | "returns" "(" ( "*" | "void" | WasmType ) ")"
    ///        | "template" "(" Identifier [ "," ( "true" | "false" ) ] ")"
    ///        | Identifier "(" [ Identifier { "," Identifier } ] ")" ;
    /// ```
    pub(crate) fn parse_method(&mut self) -> Result<Method> {
        let start = self.current_span();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;
        let kind = match name.as_str() {
            "func" => MethodKind::Func(self.parse_func_def()?),
            "call" => MethodKind::Call(self.parse_func_def()?),
            "args" => MethodKind::Args(self.parse_identifier_list()?),
            "returns" => MethodKind::Returns(self.parse_returns_filter()?),
            "template" => {
                let name = self.expect_identifier()?;
                let just_check = if self.eat(&TokenKind::Comma) {
                    match self.expect_identifier()?.as_str() {
                        "true" => true,
                        "false" => false,
                        _ => {
                            return Err(WeaveError::new(
                                ErrorCode::UNEXPECTED_TOKEN,
                                "expected 'true' or 'false'",
                            )
                            .at(self.previous_span()))
                        }
                    }
                } else {
                    false
                };
                MethodKind::Template { name, just_check }
            }
            _ => MethodKind::User {
                name,
                args: self.parse_identifier_list()?,
            },
        };
        self.expect(&TokenKind::RParen)?;
        Ok(Method {
            kind,
            span: start.merge(self.previous_span()),
        })
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(names);
        }
        names.push(self.expect_identifier()?);
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }
        Ok(names)
    }

    fn parse_returns_filter(&mut self) -> Result<ReturnsFilter> {
        match self.peek().clone() {
            TokenKind::Star => {
                self.advance();
                Ok(ReturnsFilter::Any)
            }
            TokenKind::WasmType(ty) => {
                self.advance();
                Ok(ReturnsFilter::Type(ty))
            }
            TokenKind::Identifier(word) if word == "void" => {
                self.advance();
                Ok(ReturnsFilter::Void)
            }
            _ => Err(self.unexpected("'*', 'void' or a value type")),
        }
    }

    // ── Function definitions ──────────────────────────────────────────────────

    /// ```ebnf
    /// FuncDef = Return Name "(" [ Params ] ")" [ "," Scope ]
    ///         | Name [ "," Scope ] ;
    /// Scope   = "imported" | "exported" | "internal" | "start" ;
    /// ```
    ///
    /// The short form `call($f)` accepts any result and any params.
    fn parse_func_def(&mut self) -> Result<FuncDef> {
        let bare_name = !matches!(self.peek(), TokenKind::Percent)
            && matches!(self.look_ahead(1), TokenKind::RParen | TokenKind::Comma);
        let (ret, name, params) = if bare_name {
            (ReturnPattern::Any, self.parse_name_pattern()?, ParamsPattern::Any)
        } else {
            let ret = self.parse_return_pattern()?;
            let name = self.parse_name_pattern()?;
            self.expect(&TokenKind::LParen)?;
            let params = self.parse_params_pattern()?;
            self.expect(&TokenKind::RParen)?;
            (ret, name, params)
        };
        let scope = if self.eat(&TokenKind::Comma) {
            let word = self.expect_identifier()?;
            FunctionScope::from_keyword(&word).ok_or_else(|| {
                WeaveError::new(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("unknown function scope '{word}'"),
                )
                .at(self.previous_span())
            })?
        } else {
            FunctionScope::Any
        };
        Ok(FuncDef {
            ret,
            name,
            params,
            scope,
        })
    }

    /// ```ebnf
    /// Return = "*" | "void" | WasmType | "%" Identifier [ ":" WasmType ] "%" ;
    /// ```
    fn parse_return_pattern(&mut self) -> Result<ReturnPattern> {
        match self.peek().clone() {
            TokenKind::Star => {
                self.advance();
                Ok(ReturnPattern::Any)
            }
            TokenKind::WasmType(ty) => {
                self.advance();
                Ok(ReturnPattern::Type(ty))
            }
            TokenKind::Identifier(word) if word == "void" => {
                self.advance();
                Ok(ReturnPattern::Void)
            }
            TokenKind::Percent => {
                self.advance();
                let var = self.expect_identifier()?;
                let pattern = if self.eat(&TokenKind::Colon) {
                    ReturnPattern::VarType(var, self.expect_wasm_type()?)
                } else {
                    ReturnPattern::Var(var)
                };
                self.expect(&TokenKind::Percent)?;
                Ok(pattern)
            }
            _ => Err(self.unexpected("a return type")),
        }
    }

    /// ```ebnf
    /// Name    = Matcher | "%" Identifier [ ":" Matcher ] "%" ;
    /// Matcher = "*" | Literal | "$" Identifier | "[" Number "]" | Regex ;
    /// Literal = Identifier { "." Identifier } | String ;
    /// ```
    fn parse_name_pattern(&mut self) -> Result<NamePattern> {
        if self.eat(&TokenKind::Percent) {
            let var = self.expect_identifier()?;
            let matcher = if self.eat(&TokenKind::Colon) {
                self.parse_name_matcher()?
            } else {
                NameMatcher::Any
            };
            self.expect(&TokenKind::Percent)?;
            return Ok(NamePattern {
                var: Some(var),
                matcher,
            });
        }
        Ok(NamePattern {
            var: None,
            matcher: self.parse_name_matcher()?,
        })
    }

    fn parse_name_matcher(&mut self) -> Result<NameMatcher> {
        match self.peek().clone() {
            TokenKind::Star => {
                self.advance();
                Ok(NameMatcher::Any)
            }
            TokenKind::Index(sym) => {
                self.advance();
                Ok(NameMatcher::Symbol(sym))
            }
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(NameMatcher::Literal(s))
            }
            TokenKind::Identifier(first) => {
                self.advance();
                let mut name = first;
                while matches!(self.peek(), TokenKind::Dot)
                    && matches!(self.look_ahead(1), TokenKind::Identifier(_))
                {
                    self.advance();
                    name.push('.');
                    name.push_str(&self.expect_identifier()?);
                }
                Ok(NameMatcher::Literal(name))
            }
            TokenKind::LBracket => {
                self.advance();
                let ordinal = match self.peek().clone() {
                    TokenKind::Number(n) => n
                        .parse::<u32>()
                        .map_err(|_| self.unexpected("an integer function index"))?,
                    _ => return Err(self.unexpected("a function index")),
                };
                self.advance();
                self.expect(&TokenKind::RBracket)?;
                Ok(NameMatcher::Ordinal(ordinal))
            }
            TokenKind::Regex(pattern) => {
                let span = self.current_span();
                Regex::new(&pattern).map_err(|e| {
                    WeaveError::new(
                        ErrorCode::INVALID_REGEX,
                        format!("invalid regular expression /{pattern}/: {e}"),
                    )
                    .at(span)
                })?;
                self.advance();
                Ok(NameMatcher::Regex(pattern))
            }
            _ => Err(self.unexpected("a function name")),
        }
    }

    /// ```ebnf
    /// Params = ".." | Param { "," Param } ;
    /// Param  = ( WasmType | "*" ) [ "*" | "%" Identifier "%" ] ;
    /// ```
    fn parse_params_pattern(&mut self) -> Result<ParamsPattern> {
        if self.eat(&TokenKind::DotDot) {
            return Ok(ParamsPattern::Any);
        }
        let mut params = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(ParamsPattern::List(params));
        }
        params.push(self.parse_param_pattern()?);
        while self.eat(&TokenKind::Comma) {
            params.push(self.parse_param_pattern()?);
        }
        Ok(ParamsPattern::List(params))
    }

    fn parse_param_pattern(&mut self) -> Result<ParamPattern> {
        let ty = match self.peek().clone() {
            TokenKind::WasmType(ty) => Some(ty),
            TokenKind::Star => None,
            _ => return Err(self.unexpected("a parameter type or '*'")),
        };
        self.advance();
        let var = match self.peek() {
            TokenKind::Star => {
                self.advance();
                None
            }
            TokenKind::Percent => {
                self.advance();
                let var = self.expect_identifier()?;
                self.expect(&TokenKind::Percent)?;
                Some(var)
            }
            _ => None,
        };
        Ok(ParamPattern { ty, var })
    }

    fn expect_wasm_type(&mut self) -> Result<WasmType> {
        match self.peek().clone() {
            TokenKind::WasmType(ty) => {
                self.advance();
                Ok(ty)
            }
            _ => Err(self.unexpected("a value type")),
        }
    }
}
