//! Script parsing.
//!
//! The engine accepts one statement per script:
//!
//! ```text
//! ?[a, b] <- [[1, 'x'], [2, 'y']]              # inline rows
//! ?[name] := *users[id, name], id > 1          # rule over stored relations
//! ?[id, name] <- $rows :put users {id => name} # write query results
//! :create users {id => name}                   # create a relation
//! ::relations                                  # system ops
//! ```
//!
//! Parsing produces a [`Statement`]; evaluation lives in the engine.

use crate::error::{CoreError, CoreResult};
use crate::relation::is_identifier;
use crate::value::DataValue;

/// A parsed script.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `?[...] ...` query, optionally writing its results.
    Query(Query),
    /// `:create name {keys => values}`.
    Create {
        /// Relation name.
        name: String,
        /// Column layout.
        spec: ColumnSpec,
    },
    /// `::relations`.
    ListRelations,
    /// `::columns name`.
    ListColumns(String),
    /// `::remove a, b`.
    Remove(Vec<String>),
}

impl Statement {
    /// Name of the mutating operation in this statement, if any.
    #[must_use]
    pub fn mutation(&self) -> Option<&'static str> {
        match self {
            Self::Create { .. } => Some(":create"),
            Self::Remove(_) => Some("::remove"),
            Self::Query(q) => q.write.as_ref().map(|w| match w.kind {
                WriteKind::Put => ":put",
                WriteKind::Rm => ":rm",
            }),
            Self::ListRelations | Self::ListColumns(_) => None,
        }
    }
}

/// A query with its options.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Output variable names.
    pub head: Vec<String>,
    /// Rule body.
    pub body: Body,
    /// Write target for the results.
    pub write: Option<WriteOp>,
    /// Sort column and whether the sort is descending.
    pub order: Option<(String, bool)>,
    /// Maximum number of rows returned.
    pub limit: Option<usize>,
    /// Number of leading rows skipped.
    pub offset: Option<usize>,
}

/// Body of a query rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// `<- expr`, where `expr` evaluates to a list of rows.
    Inline(Expr),
    /// `:= atom, ...`.
    Rule(Vec<Atom>),
}

/// A literal expression, possibly referencing parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value.
    Const(DataValue),
    /// `$name`.
    Param(String),
    /// `[a, b, ...]`.
    List(Vec<Expr>),
}

/// An argument in a rule atom.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Named variable.
    Var(String),
    /// `_`, matches anything.
    Ignore,
    /// Constant expression.
    Expr(Expr),
}

/// Comparison operators usable in rule bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Applies the operator.
    #[must_use]
    pub fn holds(self, lhs: &DataValue, rhs: &DataValue) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

/// A conjunct in a rule body.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// `*name[args]`, positional match against a stored relation.
    Stored {
        /// Relation name.
        name: String,
        /// One term per column.
        args: Vec<Term>,
    },
    /// `lhs op rhs`.
    Compare {
        /// Left operand.
        lhs: Term,
        /// Operator.
        op: CmpOp,
        /// Right operand.
        rhs: Term,
    },
}

/// `{k1, k2 => v1}` column layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Key columns.
    pub keys: Vec<String>,
    /// Non-key columns.
    pub values: Vec<String>,
}

/// Which write a query performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Upsert rows.
    Put,
    /// Delete rows by key.
    Rm,
}

/// A query write target.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    /// Put or remove.
    pub kind: WriteKind,
    /// Target relation.
    pub relation: String,
    /// Optional column layout, checked against the relation.
    pub spec: Option<ColumnSpec>,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    /// Unsigned magnitude; a leading `-` is applied by the parser.
    Int(u64),
    Float(f64),
    Str(String),
    Param(String),
    Directive(String),
    SysOp(String),
    Sym(&'static str),
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(s) => format!("identifier '{s}'"),
        Tok::Int(i) => format!("number {i}"),
        Tok::Float(f) => format!("number {f}"),
        Tok::Str(_) => "string literal".to_string(),
        Tok::Param(p) => format!("parameter '${p}'"),
        Tok::Directive(d) => format!("':{d}'"),
        Tok::SysOp(s) => format!("'::{s}'"),
        Tok::Sym(s) => format!("'{s}'"),
    }
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        self.src[start..self.pos].to_string()
    }

    fn tokenize(mut self) -> CoreResult<Vec<(usize, Tok)>> {
        let mut out = Vec::new();
        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'#' => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => out.push((start, Tok::Ident(self.ident()))),
                b'0'..=b'9' => out.push((start, self.number()?)),
                b'\'' | b'"' => out.push((start, Tok::Str(self.string(c)?))),
                b'$' => {
                    self.pos += 1;
                    let name = self.ident();
                    if !is_identifier(&name) {
                        return Err(CoreError::parse(start, "expected parameter name after '$'"));
                    }
                    out.push((start, Tok::Param(name)));
                }
                b':' => out.push((start, self.colon()?)),
                _ => out.push((start, Tok::Sym(self.symbol()?))),
            }
        }
        Ok(out)
    }

    fn colon(&mut self) -> CoreResult<Tok> {
        let start = self.pos;
        self.pos += 1;
        match self.peek() {
            Some(b'=') => {
                self.pos += 1;
                Ok(Tok::Sym(":="))
            }
            Some(b':') => {
                self.pos += 1;
                let name = self.ident();
                if name.is_empty() {
                    return Err(CoreError::parse(start, "expected system op name after '::'"));
                }
                Ok(Tok::SysOp(name))
            }
            _ => {
                let name = self.ident();
                if !is_identifier(&name) {
                    return Err(CoreError::parse(start, "expected option name after ':'"));
                }
                Ok(Tok::Directive(name))
            }
        }
    }

    fn symbol(&mut self) -> CoreResult<&'static str> {
        let start = self.pos;
        let two = (self.peek(), self.peek_at(1));
        let (sym, len) = match two {
            (Some(b'<'), Some(b'-')) => ("<-", 2),
            (Some(b'<'), Some(b'=')) => ("<=", 2),
            (Some(b'>'), Some(b'=')) => (">=", 2),
            (Some(b'='), Some(b'=')) => ("==", 2),
            (Some(b'='), Some(b'>')) => ("=>", 2),
            (Some(b'!'), Some(b'=')) => ("!=", 2),
            (Some(b'<'), _) => ("<", 1),
            (Some(b'>'), _) => (">", 1),
            (Some(b'?'), _) => ("?", 1),
            (Some(b'['), _) => ("[", 1),
            (Some(b']'), _) => ("]", 1),
            (Some(b'{'), _) => ("{", 1),
            (Some(b'}'), _) => ("}", 1),
            (Some(b','), _) => (",", 1),
            (Some(b'*'), _) => ("*", 1),
            (Some(b'-'), _) => ("-", 1),
            _ => {
                let ch = self.src[start..].chars().next().unwrap_or('?');
                return Err(CoreError::parse(start, format!("unexpected character '{ch}'")));
            }
        };
        self.pos += len;
        Ok(sym)
    }

    fn number(&mut self) -> CoreResult<Tok> {
        let start = self.pos;
        let mut is_float = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'_') {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if is_float {
            match text.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Tok::Float(f)),
                _ => Err(CoreError::parse(start, format!("invalid number '{text}'"))),
            }
        } else {
            text.parse::<u64>()
                .map(Tok::Int)
                .map_err(|_| CoreError::parse(start, format!("integer out of range '{text}'")))
        }
    }

    fn string(&mut self, quote: u8) -> CoreResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = &self.src[self.pos..];
            let Some(ch) = rest.chars().next() else {
                return Err(CoreError::parse(start, "unterminated string literal"));
            };
            self.pos += ch.len_utf8();
            if ch as u32 == u32::from(quote) {
                return Ok(out);
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            let Some(esc) = self.src[self.pos..].chars().next() else {
                return Err(CoreError::parse(start, "unterminated string literal"));
            };
            self.pos += esc.len_utf8();
            out.push(match esc {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\\' | '\'' | '"' => esc,
                other => {
                    return Err(CoreError::parse(
                        self.pos - 2,
                        format!("unknown escape '\\{other}'"),
                    ))
                }
            });
        }
    }
}

/// Deepest list literal nesting accepted, matching serde_json's limit.
const MAX_NESTING: usize = 128;

struct Parser {
    toks: Vec<(usize, Tok)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn offset(&self) -> usize {
        self.toks.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).map(|(_, t)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, expected: &str) -> CoreError {
        let found = self.peek().map_or("end of script".to_string(), describe);
        CoreError::parse(self.offset(), format!("expected {expected}, found {found}"))
    }

    fn eat(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, sym: &str) -> CoreResult<()> {
        if self.eat(sym) {
            Ok(())
        } else {
            Err(self.error(&format!("'{sym}'")))
        }
    }

    fn ident(&mut self) -> CoreResult<String> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn ident_list(&mut self, close: &str) -> CoreResult<Vec<String>> {
        let mut names = vec![self.ident()?];
        while self.eat(",") {
            if matches!(self.peek(), Some(Tok::Sym(s)) if *s == close) {
                break;
            }
            names.push(self.ident()?);
        }
        Ok(names)
    }

    fn statement(&mut self) -> CoreResult<Statement> {
        let stmt = match self.peek() {
            Some(Tok::SysOp(_)) => self.sys_op()?,
            Some(Tok::Directive(d)) if d == "create" => {
                self.pos += 1;
                let name = self.ident()?;
                let spec = self.column_spec()?;
                Statement::Create { name, spec }
            }
            Some(Tok::Sym("?")) => Statement::Query(self.query()?),
            _ => return Err(self.error("a query, ':create' or a system op")),
        };
        if self.peek().is_some() {
            return Err(self.error("end of script"));
        }
        Ok(stmt)
    }

    fn sys_op(&mut self) -> CoreResult<Statement> {
        let offset = self.offset();
        let Some(Tok::SysOp(op)) = self.next() else {
            return Err(self.error("system op"));
        };
        match op.as_str() {
            "relations" => Ok(Statement::ListRelations),
            "columns" => Ok(Statement::ListColumns(self.ident()?)),
            "remove" => {
                let mut names = vec![self.ident()?];
                while self.eat(",") {
                    names.push(self.ident()?);
                }
                Ok(Statement::Remove(names))
            }
            other => Err(CoreError::parse(
                offset,
                format!("unknown system op '::{other}'"),
            )),
        }
    }

    fn column_spec(&mut self) -> CoreResult<ColumnSpec> {
        self.expect("{")?;
        let keys = self.ident_list("}")?;
        let values = if self.eat("=>") {
            if self.eat("}") {
                return Ok(ColumnSpec {
                    keys,
                    values: Vec::new(),
                });
            }
            self.ident_list("}")?
        } else {
            Vec::new()
        };
        self.expect("}")?;
        Ok(ColumnSpec { keys, values })
    }

    fn query(&mut self) -> CoreResult<Query> {
        self.expect("?")?;
        self.expect("[")?;
        let head = self.ident_list("]")?;
        self.expect("]")?;

        let body = if self.eat("<-") {
            Body::Inline(self.expr()?)
        } else if self.eat(":=") {
            let mut atoms = vec![self.atom()?];
            while self.eat(",") {
                atoms.push(self.atom()?);
            }
            Body::Rule(atoms)
        } else {
            return Err(self.error("'<-' or ':='"));
        };

        let mut query = Query {
            head,
            body,
            write: None,
            order: None,
            limit: None,
            offset: None,
        };

        while let Some(Tok::Directive(name)) = self.peek() {
            let name = name.clone();
            let offset = self.offset();
            self.pos += 1;
            match name.as_str() {
                "put" | "rm" => {
                    if query.write.is_some() {
                        return Err(CoreError::parse(offset, "only one write option is allowed"));
                    }
                    let relation = self.ident()?;
                    let spec = if matches!(self.peek(), Some(Tok::Sym("{"))) {
                        Some(self.column_spec()?)
                    } else {
                        None
                    };
                    let kind = if name == "put" { WriteKind::Put } else { WriteKind::Rm };
                    query.write = Some(WriteOp {
                        kind,
                        relation,
                        spec,
                    });
                }
                "order" => {
                    let desc = self.eat("-");
                    query.order = Some((self.ident()?, desc));
                }
                "limit" => query.limit = Some(self.count()?),
                "offset" => query.offset = Some(self.count()?),
                other => {
                    return Err(CoreError::parse(offset, format!("unknown query option ':{other}'")))
                }
            }
        }
        Ok(query)
    }

    fn count(&mut self) -> CoreResult<usize> {
        match self.peek() {
            Some(Tok::Int(n)) => {
                let n = *n;
                self.pos += 1;
                usize::try_from(n).map_err(|_| self.error("non-negative integer"))
            }
            _ => Err(self.error("non-negative integer")),
        }
    }

    fn atom(&mut self) -> CoreResult<Atom> {
        if self.eat("*") {
            let name = self.ident()?;
            self.expect("[")?;
            let mut args = Vec::new();
            if !self.eat("]") {
                args.push(self.term()?);
                while self.eat(",") {
                    args.push(self.term()?);
                }
                self.expect("]")?;
            }
            return Ok(Atom::Stored { name, args });
        }
        let lhs = self.term()?;
        let start = self.pos;
        let op = match self.next() {
            Some(Tok::Sym("==")) => CmpOp::Eq,
            Some(Tok::Sym("!=")) => CmpOp::Ne,
            Some(Tok::Sym("<")) => CmpOp::Lt,
            Some(Tok::Sym("<=")) => CmpOp::Le,
            Some(Tok::Sym(">")) => CmpOp::Gt,
            Some(Tok::Sym(">=")) => CmpOp::Ge,
            _ => {
                self.pos = start;
                return Err(self.error("comparison operator"));
            }
        };
        let rhs = self.term()?;
        Ok(Atom::Compare { lhs, op, rhs })
    }

    fn term(&mut self) -> CoreResult<Term> {
        if let Some(Tok::Ident(name)) = self.peek() {
            let name = name.clone();
            let term = match name.as_str() {
                "_" => Term::Ignore,
                "true" | "false" | "null" => return Ok(Term::Expr(self.expr()?)),
                _ => Term::Var(name),
            };
            self.pos += 1;
            return Ok(term);
        }
        Ok(Term::Expr(self.expr()?))
    }

    /// Items of a list literal whose `[` has been consumed.
    fn list_items(&mut self) -> CoreResult<Expr> {
        let mut items = Vec::new();
        if self.eat("]") {
            return Ok(Expr::List(items));
        }
        items.push(self.expr()?);
        while self.eat(",") {
            if self.eat("]") {
                return Ok(Expr::List(items));
            }
            items.push(self.expr()?);
        }
        self.expect("]")?;
        Ok(Expr::List(items))
    }

    fn expr(&mut self) -> CoreResult<Expr> {
        let start = self.pos;
        let offset = self.offset();
        match self.next() {
            Some(Tok::Int(i)) => i64::try_from(i)
                .map(|i| Expr::Const(DataValue::Int(i)))
                .map_err(|_| CoreError::parse(offset, format!("integer out of range '{i}'"))),
            Some(Tok::Float(f)) => Ok(Expr::Const(DataValue::Float(f))),
            Some(Tok::Str(s)) => Ok(Expr::Const(DataValue::Str(s))),
            Some(Tok::Param(p)) => Ok(Expr::Param(p)),
            Some(Tok::Ident(id)) if id == "true" => Ok(Expr::Const(DataValue::Bool(true))),
            Some(Tok::Ident(id)) if id == "false" => Ok(Expr::Const(DataValue::Bool(false))),
            Some(Tok::Ident(id)) if id == "null" => Ok(Expr::Const(DataValue::Null)),
            Some(Tok::Sym("-")) => match self.next() {
                Some(Tok::Int(i)) => i64::try_from(-i128::from(i))
                    .map(|i| Expr::Const(DataValue::Int(i)))
                    .map_err(|_| CoreError::parse(offset, format!("integer out of range '-{i}'"))),
                Some(Tok::Float(f)) => Ok(Expr::Const(DataValue::Float(-f))),
                _ => Err(CoreError::parse(offset, "expected number after '-'")),
            },
            Some(Tok::Sym("[")) => {
                if self.depth >= MAX_NESTING {
                    return Err(CoreError::parse(offset, "nesting too deep"));
                }
                self.depth += 1;
                let list = self.list_items();
                self.depth -= 1;
                list
            }
            _ => {
                self.pos = start;
                Err(self.error("a literal"))
            }
        }
    }
}

/// Parses a script into a single statement.
pub fn parse(script: &str) -> CoreResult<Statement> {
    let toks = Lexer::new(script).tokenize()?;
    let mut parser = Parser {
        toks,
        pos: 0,
        end: script.len(),
        depth: 0,
    };
    parser.statement()
}
