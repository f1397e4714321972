//! Keyword expressions and their parser.
//!
//! ```ebnf
//! Keyword  = "%" Union "%" ;
//! Union    = Or { ";" Or } ;
//! Or       = And { "||" And } ;
//! And      = Equal { "&&" Equal } ;
//! Equal    = Compare { ( "==" | "!=" ) Compare } ;
//! Compare  = Shift { ( ">=" | ">" | "<=" | "<" ) Shift } ;
//! Shift    = Sum { ( "<<" | ">>" ) Sum } ;
//! Sum      = Product { ( "+" | "-" ) Product } ;
//! Product  = Chain { ( "*" | "/" | "%" ) Chain } ;
//! Chain    = Prefix { "." Ident | "[" Digits "]" | ":" Ident [ "(" [ Arg { "," Arg } ] ")" ] } ;
//! Prefix   = "!" Prefix | Ident | Quoted | Number | "(" Union ")" ;
//! Arg      = "(" Ident { "," Ident } ")" "=>" Union | Union ;
//! Quoted   = "'" … "'" | '"' … '"' | "`" … "`" ;
//! ```
//!
//! Outside parentheses a keyword holds no whitespace and `%` closes it, so
//! `%` only means remainder inside a group or an argument list. Quoted
//! text may embed further `%keyword%`s. `!` binds to the operand before
//! its accessors: `!x:count` counts the negation of `x`.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Ident(String),
    Number(String),
    Quoted(Vec<Segment>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `a;b;c`: the parts printed back to back.
    Union(Vec<Expr>),
    Field(Box<Expr>, String),
    Index(Box<Expr>, usize),
    Method(Box<Expr>, String, Vec<Arg>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    Keyword(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Lambda(Lambda),
    Expr(Expr),
}

impl Arg {
    /// The bare identifier this argument names, if it is one.
    pub(crate) fn reference(&self) -> Option<&str> {
        match self {
            Arg::Expr(Expr::Ident(name)) => Some(name),
            _ => None,
        }
    }
}

/// `(item, index) => body`. The first key binds the element, the second
/// its position.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lambda {
    pub keys: Vec<String>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    /// Binding strength; operators of one level associate to the left.
    fn level(self) -> usize {
        match self {
            BinOp::Or => 0,
            BinOp::And => 1,
            BinOp::Eq | BinOp::Ne => 2,
            BinOp::Ge | BinOp::Gt | BinOp::Le | BinOp::Lt => 3,
            BinOp::Shl | BinOp::Shr => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }
}

const LEVELS: usize = 7;

/// Longest spelling first, so `<<` never reads as `<`.
const OPERATORS: &[(&str, BinOp)] = &[
    ("||", BinOp::Or),
    ("&&", BinOp::And),
    ("==", BinOp::Eq),
    ("!=", BinOp::Ne),
    (">=", BinOp::Ge),
    ("<=", BinOp::Le),
    ("<<", BinOp::Shl),
    (">>", BinOp::Shr),
    (">", BinOp::Gt),
    ("<", BinOp::Lt),
    ("+", BinOp::Add),
    ("-", BinOp::Sub),
    ("*", BinOp::Mul),
    ("/", BinOp::Div),
    ("%", BinOp::Rem),
];

/// Parse a keyword body starting right after its opening `%`. Returns the
/// expression and the index after the closing `%`, or `None` when the
/// text is not a keyword.
pub(crate) fn parse_keyword(chars: &[char], start: usize) -> Option<(Expr, usize)> {
    if chars.get(start).map_or(true, |c| c.is_whitespace()) {
        return None;
    }
    let mut parser = Parser {
        chars,
        pos: start,
        depth: 0,
    };
    let expr = parser.union()?;
    if parser.peek() != Some('%') {
        return None;
    }
    Some((expr, parser.pos + 1))
}

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
    /// Open parentheses around the cursor.
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        if self.depth == 0 {
            return;
        }
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn union(&mut self) -> Option<Expr> {
        let mut parts = vec![self.binary(0)?];
        loop {
            self.skip_spaces();
            if !self.eat(';') {
                break;
            }
            parts.push(self.binary(0)?);
        }
        Some(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Union(parts)
        })
    }

    fn binary(&mut self, level: usize) -> Option<Expr> {
        if level == LEVELS {
            return self.chain();
        }
        let mut left = self.binary(level + 1)?;
        loop {
            let save = self.pos;
            self.skip_spaces();
            match self.operator() {
                Some((op, len)) if op.level() == level => {
                    self.pos += len;
                    let right = self.binary(level + 1)?;
                    left = Expr::Binary(op, Box::new(left), Box::new(right));
                }
                _ => {
                    self.pos = save;
                    return Some(left);
                }
            }
        }
    }

    fn operator(&self) -> Option<(BinOp, usize)> {
        OPERATORS.iter().find_map(|(text, op)| {
            if *op == BinOp::Rem && self.depth == 0 {
                return None;
            }
            let matches = text
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            matches.then_some((*op, text.len()))
        })
    }

    fn chain(&mut self) -> Option<Expr> {
        let mut expr = self.prefix()?;
        loop {
            match self.peek() {
                Some('.') if self.peek_at(1).is_some_and(is_ident_start) => {
                    self.pos += 1;
                    let field = self.identifier()?;
                    expr = Expr::Field(Box::new(expr), field);
                }
                Some('[') => {
                    self.pos += 1;
                    let begin = self.pos;
                    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        self.pos += 1;
                    }
                    if self.pos == begin || !self.eat(']') {
                        return None;
                    }
                    let index = self.text(begin, self.pos - 1).parse().ok()?;
                    expr = Expr::Index(Box::new(expr), index);
                }
                Some(':') => {
                    self.pos += 1;
                    let method = self.identifier()?;
                    let args = if self.peek() == Some('(') {
                        self.arguments()?
                    } else {
                        Vec::new()
                    };
                    expr = Expr::Method(Box::new(expr), method, args);
                }
                _ => return Some(expr),
            }
        }
    }

    fn prefix(&mut self) -> Option<Expr> {
        self.skip_spaces();
        match self.peek()? {
            '!' if self.peek_at(1) != Some('=') => {
                self.pos += 1;
                Some(Expr::Not(Box::new(self.prefix()?)))
            }
            '(' => {
                self.pos += 1;
                self.depth += 1;
                let inner = self.union()?;
                self.skip_spaces();
                if !self.eat(')') {
                    return None;
                }
                self.depth -= 1;
                Some(inner)
            }
            q @ ('\'' | '"' | '`') => {
                self.pos += 1;
                self.quoted(q)
            }
            c if c.is_ascii_digit() => self.number(),
            '-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
            c if is_ident_start(c) => self.identifier().map(Expr::Ident),
            _ => None,
        }
    }

    fn identifier(&mut self) -> Option<String> {
        let begin = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return None;
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        Some(self.text(begin, self.pos))
    }

    fn number(&mut self) -> Option<Expr> {
        let begin = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return None;
        }
        Some(Expr::Number(self.text(begin, self.pos)))
    }

    /// Quoted text after its opening quote. A backslash takes the next
    /// character literally; `%%` is a literal `%`.
    fn quoted(&mut self, quote: char) -> Option<Expr> {
        let mut segments = Vec::new();
        let mut text = String::new();
        loop {
            let c = self.peek()?;
            self.pos += 1;
            match c {
                '\\' => {
                    text.push(self.peek()?);
                    self.pos += 1;
                }
                '%' if self.peek() == Some('%') => {
                    text.push('%');
                    self.pos += 1;
                }
                '%' => match parse_keyword(self.chars, self.pos) {
                    Some((expr, end)) => {
                        if !text.is_empty() {
                            segments.push(Segment::Text(std::mem::take(&mut text)));
                        }
                        segments.push(Segment::Keyword(expr));
                        self.pos = end;
                    }
                    None => text.push('%'),
                },
                c if c == quote => break,
                c => text.push(c),
            }
        }
        if !text.is_empty() || segments.is_empty() {
            segments.push(Segment::Text(text));
        }
        Some(Expr::Quoted(segments))
    }

    /// Arguments from `(` to the matching `)`.
    fn arguments(&mut self) -> Option<Vec<Arg>> {
        self.pos += 1;
        self.depth += 1;
        let mut args = Vec::new();
        self.skip_spaces();
        if !self.eat(')') {
            loop {
                args.push(self.argument()?);
                self.skip_spaces();
                if self.eat(')') {
                    break;
                }
                if !self.eat(',') {
                    return None;
                }
            }
        }
        self.depth -= 1;
        Some(args)
    }

    fn argument(&mut self) -> Option<Arg> {
        self.skip_spaces();
        let save = self.pos;
        if let Some(lambda) = self.lambda() {
            return Some(Arg::Lambda(lambda));
        }
        self.pos = save;
        self.union().map(Arg::Expr)
    }

    fn lambda(&mut self) -> Option<Lambda> {
        if !self.eat('(') {
            return None;
        }
        let mut keys = Vec::new();
        loop {
            self.skip_spaces();
            keys.push(self.identifier()?);
            self.skip_spaces();
            if self.eat(')') {
                break;
            }
            if !self.eat(',') {
                return None;
            }
        }
        self.skip_spaces();
        if !(self.eat('=') && self.eat('>')) {
            return None;
        }
        let body = self.union()?;
        Some(Lambda {
            keys,
            body: Box::new(body),
        })
    }

    fn text(&self, begin: usize, end: usize) -> String {
        self.chars[begin..end].iter().collect()
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<Expr> {
        let chars: Vec<char> = text.chars().collect();
        parse_keyword(&chars, 1).map(|(expr, _)| expr)
    }

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    fn quoted(text: &str) -> Expr {
        Expr::Quoted(vec![Segment::Text(text.into())])
    }

    #[test]
    fn test_parse_plain_name() {
        assert_eq!(parse("%this%"), Some(Expr::Ident("this".into())));
    }

    #[test]
    fn test_parse_accessor_chain() {
        let expr = parse("%p.index[2]:join(\", \"):repeat(3)%").unwrap();
        let inner = Expr::Index(Box::new(Expr::Field(ident("p"), "index".into())), 2);
        let joined = Expr::Method(Box::new(inner), "join".into(), vec![Arg::Expr(quoted(", "))]);
        assert_eq!(
            expr,
            Expr::Method(
                Box::new(joined),
                "repeat".into(),
                vec![Arg::Expr(Expr::Number("3".into()))]
            )
        );
    }

    #[test]
    fn test_parse_rejects_non_keywords() {
        assert!(parse("% x%").is_none());
        assert!(parse("%x y%").is_none());
        assert!(parse("%x").is_none());
        assert!(parse("%'open%").is_none());
    }

    #[test]
    fn test_precedence_and_left_association() {
        let expr = parse("%'':map((_) => 1 + 2 * 3 - 4 == 3 && a || b)%").unwrap();
        let Expr::Method(_, _, args) = expr else {
            panic!("expected a method call");
        };
        let Arg::Lambda(lambda) = &args[0] else {
            panic!("expected a lambda");
        };
        let num = |n: &str| Box::new(Expr::Number(n.into()));
        let product = Expr::Binary(BinOp::Mul, num("2"), num("3"));
        let sum = Expr::Binary(BinOp::Add, num("1"), Box::new(product));
        let difference = Expr::Binary(BinOp::Sub, Box::new(sum), num("4"));
        let equal = Expr::Binary(BinOp::Eq, Box::new(difference), num("3"));
        let and = Expr::Binary(BinOp::And, Box::new(equal), ident("a"));
        assert_eq!(*lambda.body, Expr::Binary(BinOp::Or, Box::new(and), ident("b")));
    }

    #[test]
    fn test_lambda_keys_and_union_body() {
        let expr = parse("%'abc':map((x, i) => '123'; x)%").unwrap();
        let Expr::Method(_, name, args) = expr else {
            panic!("expected a method call");
        };
        assert_eq!(name, "map");
        assert_eq!(
            args,
            vec![Arg::Lambda(Lambda {
                keys: vec!["x".into(), "i".into()],
                body: Box::new(Expr::Union(vec![quoted("123"), Expr::Ident("x".into())])),
            })]
        );
    }

    #[test]
    fn test_remainder_only_inside_parentheses() {
        let expr = parse("%'147':filter((v)=>v%2!=0)%").unwrap();
        let Expr::Method(_, _, args) = expr else {
            panic!("expected a method call");
        };
        let Arg::Lambda(lambda) = &args[0] else {
            panic!("expected a lambda");
        };
        let rem = Expr::Binary(BinOp::Rem, ident("v"), Box::new(Expr::Number("2".into())));
        assert_eq!(
            *lambda.body,
            Expr::Binary(BinOp::Ne, Box::new(rem), Box::new(Expr::Number("0".into())))
        );
        // At the top level `%` closes the keyword.
        assert_eq!(parse("%a%b%"), Some(Expr::Ident("a".into())));
    }

    #[test]
    fn test_negation_binds_before_methods() {
        let expr = parse("%!var:count%").unwrap();
        assert_eq!(
            expr,
            Expr::Method(Box::new(Expr::Not(ident("var"))), "count".into(), vec![])
        );
        assert!(matches!(parse("%!(var:count)%"), Some(Expr::Not(_))));
    }

    #[test]
    fn test_quoted_text_embeds_keywords() {
        let expr = parse("%x;' %bola%'%").unwrap();
        assert_eq!(
            expr,
            Expr::Union(vec![
                Expr::Ident("x".into()),
                Expr::Quoted(vec![
                    Segment::Text(" ".into()),
                    Segment::Keyword(Expr::Ident("bola".into())),
                ]),
            ])
        );
        assert_eq!(parse("%`it''s`%"), Some(quoted("it''s")));
        assert_eq!(parse("%\"a\\\"b\"%"), Some(quoted("a\"b")));
    }

    #[test]
    fn test_reference_arguments() {
        let Some(Expr::Method(_, _, args)) = parse("%t1:replace(a1, '123')%") else {
            panic!("expected a method call");
        };
        assert_eq!(args[0].reference(), Some("a1"));
        assert_eq!(args[1].reference(), None);
    }
}
