//! Line-oriented parser for `.fuse` sources.
//!
//! Every declaration header and statement sits on its own line; blocks open
//! with `{` at the end of a header and close with a line holding only `}`.

use std::path::Path;

use crate::error::{line_column_span, FuseError, FuseResult};
use crate::variable::{DefaultValue, Literal};

use super::ast::{
    Event, ExternDecl, Expr, FunctionDecl, HandlerDecl, Item, NamespaceDecl, Script, Stmt, VarDecl,
};

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Num(String),
    Sym(&'static str),
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(word) => format!("'{word}'"),
            Tok::Str(text) => format!("string \"{text}\""),
            Tok::Num(num) => format!("number {num}"),
            Tok::Sym(sym) => format!("'{sym}'"),
        }
    }
}

struct Line {
    number: usize,
    /// Token plus its 1-based column.
    tokens: Vec<(Tok, usize)>,
    /// Column just past the last character, used for end-of-line errors.
    end_column: usize,
}

pub(super) fn parse_script(path: &Path, source: &str) -> FuseResult<Script> {
    let mut lines = Vec::new();
    for (index, text) in source.lines().enumerate() {
        let line = tokenize(path, source, index + 1, text)?;
        if !line.tokens.is_empty() {
            lines.push(line);
        }
    }
    let mut parser = Parser {
        path,
        source,
        lines,
        pos: 0,
    };
    parser.script()
}

fn tokenize(path: &Path, source: &str, number: usize, text: &str) -> FuseResult<Line> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let error = |column: usize, message: String| FuseError::Parse {
        path: path.to_path_buf(),
        message,
        src: source.to_string(),
        span: line_column_span(source, number, column),
    };

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' || (c == '/' && chars.get(i + 1) == Some(&'/')) {
            break;
        }
        if c == '"' {
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(error(column, "unterminated string".to_string())),
                    Some('"') => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = match chars.get(i + 1) {
                            Some('n') => '\n',
                            Some('t') => '\t',
                            Some('"') => '"',
                            Some('\\') => '\\',
                            Some(other) => {
                                return Err(error(i + 2, format!("unknown escape '\\{other}'")))
                            }
                            None => return Err(error(column, "unterminated string".to_string())),
                        };
                        text.push(escaped);
                        i += 2;
                    }
                    Some(other) => {
                        text.push(*other);
                        i += 1;
                    }
                }
            }
            tokens.push((Tok::Str(text), column));
            continue;
        }
        let negative_number =
            c == '-' && chars.get(i + 1).map(|n| n.is_ascii_digit()).unwrap_or(false);
        if c.is_ascii_digit() || negative_number {
            let start = i;
            i += 1;
            let mut seen_dot = false;
            while let Some(&next) = chars.get(i) {
                if next.is_ascii_digit() {
                    i += 1;
                } else if next == '.' && !seen_dot {
                    seen_dot = true;
                    i += 1;
                } else {
                    break;
                }
            }
            let literal: String = chars[start..i].iter().collect();
            if literal.ends_with('.') {
                return Err(error(column, format!("malformed number '{literal}'")));
            }
            tokens.push((Tok::Num(literal), column));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while chars
                .get(i)
                .map(|n| n.is_ascii_alphanumeric() || *n == '_')
                .unwrap_or(false)
            {
                i += 1;
            }
            tokens.push((Tok::Ident(chars[start..i].iter().collect()), column));
            continue;
        }
        if c == ':' && chars.get(i + 1) == Some(&':') {
            tokens.push((Tok::Sym("::"), column));
            i += 2;
            continue;
        }
        let sym = match c {
            '(' => "(",
            ')' => ")",
            '{' => "{",
            '}' => "}",
            '[' => "[",
            ']' => "]",
            ',' => ",",
            '=' => "=",
            ':' => ":",
            other => return Err(error(column, format!("unexpected character '{other}'"))),
        };
        tokens.push((Tok::Sym(sym), column));
        i += 1;
    }

    Ok(Line {
        number,
        tokens,
        end_column: chars.len() + 1,
    })
}

struct Parser<'a> {
    path: &'a Path,
    source: &'a str,
    lines: Vec<Line>,
    pos: usize,
}

/// Token cursor over a single line.
struct Cursor<'l> {
    line: &'l Line,
    at: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> FuseError {
        FuseError::Parse {
            path: self.path.to_path_buf(),
            message: message.into(),
            src: self.source.to_string(),
            span: line_column_span(self.source, line, column),
        }
    }

    fn script(&mut self) -> FuseResult<Script> {
        let mut script = Script::default();
        while self.pos < self.lines.len() {
            let item = self.item()?;
            script.items.push(item);
        }
        Ok(script)
    }

    fn item(&mut self) -> FuseResult<Item> {
        let index = self.pos;
        self.pos += 1;
        let mut cur = Cursor {
            line: &self.lines[index],
            at: 0,
        };
        let keyword = self.ident(&mut cur, "a declaration")?;
        match keyword.as_str() {
            "namespace" => {
                let path = self.path_segments(&mut cur)?;
                self.expect(&mut cur, "{")?;
                if cur.peek_is("}") {
                    cur.at += 1;
                    self.end(&cur)?;
                    return Ok(Item::Namespace(NamespaceDecl {
                        path,
                        externs: Vec::new(),
                    }));
                }
                self.end(&cur)?;
                let externs = self.extern_block()?;
                Ok(Item::Namespace(NamespaceDecl { path, externs }))
            }
            "global" => {
                let list = cur.peek_ident() == Some("list");
                if list {
                    cur.at += 1;
                }
                self.var_decl(&mut cur, true, list).map(Item::Variable)
            }
            "var" => self.var_decl(&mut cur, false, false).map(Item::Variable),
            "list" => self.var_decl(&mut cur, false, true).map(Item::Variable),
            "fn" => {
                let name = self.ident(&mut cur, "a function name")?;
                self.expect(&mut cur, "(")?;
                let mut params = Vec::new();
                if !cur.peek_is(")") {
                    loop {
                        params.push(self.ident(&mut cur, "a parameter name")?);
                        if cur.peek_is(",") {
                            cur.at += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&mut cur, ")")?;
                self.expect(&mut cur, "{")?;
                self.end(&cur)?;
                let body = self.body()?;
                Ok(Item::Function(FunctionDecl { name, params, body }))
            }
            "on" => {
                let event = self.event(&mut cur)?;
                self.expect(&mut cur, "{")?;
                self.end(&cur)?;
                let body = self.body()?;
                Ok(Item::Handler(HandlerDecl { event, body }))
            }
            other => {
                let (line, column) = cur.position_before();
                Err(self.error(
                    line,
                    column,
                    format!("expected a declaration, found '{other}'"),
                ))
            }
        }
    }

    fn extern_block(&mut self) -> FuseResult<Vec<ExternDecl>> {
        let mut externs = Vec::new();
        loop {
            let Some(line) = self.lines.get(self.pos) else {
                let last = self.source.lines().count();
                return Err(self.error(last, 1, "unclosed namespace block"));
            };
            self.pos += 1;
            let mut cur = Cursor { line, at: 0 };
            if cur.peek_is("}") {
                cur.at += 1;
                self.end(&cur)?;
                return Ok(externs);
            }
            let keyword = self.ident(&mut cur, "'extern'")?;
            if keyword != "extern" {
                let (line, column) = cur.position_before();
                return Err(self.error(line, column, "only 'extern' may appear in a namespace"));
            }
            let name = self.ident(&mut cur, "an extern name")?;
            let shape = if cur.peek_is(":") {
                cur.at += 1;
                Some(self.ident(&mut cur, "a shape")?)
            } else {
                None
            };
            self.end(&cur)?;
            externs.push(ExternDecl { name, shape });
        }
    }

    fn var_decl(&self, cur: &mut Cursor<'_>, global: bool, list: bool) -> FuseResult<VarDecl> {
        let name = self.ident(cur, "a variable name")?;
        let export_name = if cur.peek_ident() == Some("as") {
            cur.at += 1;
            Some(self.string(cur)?)
        } else {
            None
        };
        let default = if cur.peek_is("=") {
            cur.at += 1;
            if list {
                self.expect(cur, "[")?;
                let mut items = Vec::new();
                if !cur.peek_is("]") {
                    loop {
                        items.push(self.literal(cur)?);
                        if cur.peek_is(",") {
                            cur.at += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(cur, "]")?;
                DefaultValue::List(items)
            } else {
                DefaultValue::Scalar(self.literal(cur)?)
            }
        } else if list {
            DefaultValue::List(Vec::new())
        } else {
            DefaultValue::Scalar(Literal::Number("0".to_string()))
        };
        self.end(cur)?;
        Ok(VarDecl {
            name,
            global,
            export_name,
            default,
        })
    }

    fn event(&self, cur: &mut Cursor<'_>) -> FuseResult<Event> {
        let word = self.ident(cur, "an event")?;
        match word.as_str() {
            "flag" => Ok(Event::Flag),
            "click" => Ok(Event::Click),
            "message" => Ok(Event::Message(self.string(cur)?)),
            "key" => Ok(Event::Key(self.string(cur)?)),
            other => {
                let (line, column) = cur.position_before();
                Err(self.error(line, column, format!("unknown event '{other}'")))
            }
        }
    }

    fn body(&mut self) -> FuseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            let Some(line) = self.lines.get(self.pos) else {
                let last = self.source.lines().count();
                return Err(self.error(last, 1, "unclosed block"));
            };
            self.pos += 1;
            let mut cur = Cursor { line, at: 0 };
            if cur.peek_is("}") {
                cur.at += 1;
                self.end(&cur)?;
                return Ok(stmts);
            }
            stmts.push(self.statement(&mut cur)?);
        }
    }

    fn statement(&self, cur: &mut Cursor<'_>) -> FuseResult<Stmt> {
        let head = self.ident(cur, "a statement")?;
        let stmt = match head.as_str() {
            "set" => {
                let var = self.ident(cur, "a variable name")?;
                self.expect(cur, "=")?;
                let value = self.expr(cur)?;
                Stmt::Set { var, value }
            }
            "change" => {
                let var = self.ident(cur, "a variable name")?;
                self.keyword(cur, "by")?;
                let by = self.expr(cur)?;
                Stmt::Change { var, by }
            }
            "add" => {
                let item = self.expr(cur)?;
                self.keyword(cur, "to")?;
                let list = self.ident(cur, "a list name")?;
                Stmt::Add { item, list }
            }
            "call" => {
                let name = self.ident(cur, "a function name")?;
                let args = self.args(cur)?;
                Stmt::Call { name, args }
            }
            "broadcast" => Stmt::Broadcast(self.string(cur)?),
            _ if cur.peek_is("::") => {
                let mut segments = vec![head.clone()];
                while cur.peek_is("::") {
                    cur.at += 1;
                    segments.push(self.ident(cur, "a module member")?);
                }
                let member = segments.pop().unwrap_or_default();
                let args = self.args(cur)?;
                Stmt::ModuleCall {
                    path: segments,
                    member,
                    args,
                }
            }
            other => {
                let (line, column) = cur.position_before();
                return Err(self.error(line, column, format!("unknown statement '{other}'")));
            }
        };
        self.end(cur)?;
        Ok(stmt)
    }

    fn args(&self, cur: &mut Cursor<'_>) -> FuseResult<Vec<Expr>> {
        self.expect(cur, "(")?;
        let mut args = Vec::new();
        if !cur.peek_is(")") {
            loop {
                args.push(self.expr(cur)?);
                if cur.peek_is(",") {
                    cur.at += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(cur, ")")?;
        Ok(args)
    }

    fn expr(&self, cur: &mut Cursor<'_>) -> FuseResult<Expr> {
        match cur.next() {
            Some((Tok::Num(num), _)) => Ok(Expr::Literal(Literal::Number(num.clone()))),
            Some((Tok::Str(text), _)) => Ok(Expr::Literal(Literal::Text(text.clone()))),
            Some((Tok::Ident(name), column)) => {
                if super::is_keyword(name) {
                    Err(self.error(cur.line.number, *column, format!("unexpected keyword '{name}'")))
                } else {
                    Ok(Expr::Var(name.clone()))
                }
            }
            found => Err(self.unexpected(cur, found, "a value")),
        }
    }

    fn literal(&self, cur: &mut Cursor<'_>) -> FuseResult<Literal> {
        match cur.next() {
            Some((Tok::Num(num), _)) => Ok(Literal::Number(num.clone())),
            Some((Tok::Str(text), _)) => Ok(Literal::Text(text.clone())),
            found => Err(self.unexpected(cur, found, "a number or string")),
        }
    }

    fn string(&self, cur: &mut Cursor<'_>) -> FuseResult<String> {
        match cur.next() {
            Some((Tok::Str(text), _)) => Ok(text.clone()),
            found => Err(self.unexpected(cur, found, "a string")),
        }
    }

    fn ident(&self, cur: &mut Cursor<'_>, what: &str) -> FuseResult<String> {
        match cur.next() {
            Some((Tok::Ident(word), _)) => Ok(word.clone()),
            found => Err(self.unexpected(cur, found, what)),
        }
    }

    fn keyword(&self, cur: &mut Cursor<'_>, word: &str) -> FuseResult<()> {
        match cur.next() {
            Some((Tok::Ident(found), _)) if found == word => Ok(()),
            found => Err(self.unexpected(cur, found, &format!("'{word}'"))),
        }
    }

    fn path_segments(&self, cur: &mut Cursor<'_>) -> FuseResult<Vec<String>> {
        let mut segments = vec![self.ident(cur, "a module name")?];
        while cur.peek_is("::") {
            cur.at += 1;
            segments.push(self.ident(cur, "a module name")?);
        }
        Ok(segments)
    }

    fn expect(&self, cur: &mut Cursor<'_>, sym: &'static str) -> FuseResult<()> {
        match cur.next() {
            Some((Tok::Sym(found), _)) if *found == sym => Ok(()),
            found => Err(self.unexpected(cur, found, &format!("'{sym}'"))),
        }
    }

    fn end(&self, cur: &Cursor<'_>) -> FuseResult<()> {
        match cur.line.tokens.get(cur.at) {
            None => Ok(()),
            Some((tok, column)) => Err(self.error(
                cur.line.number,
                *column,
                format!("expected end of line, found {}", tok.describe()),
            )),
        }
    }

    fn unexpected(
        &self,
        cur: &Cursor<'_>,
        found: Option<&(Tok, usize)>,
        expected: &str,
    ) -> FuseError {
        match found {
            Some((tok, column)) => self.error(
                cur.line.number,
                *column,
                format!("expected {expected}, found {}", tok.describe()),
            ),
            None => self.error(
                cur.line.number,
                cur.line.end_column,
                format!("expected {expected}, found end of line"),
            ),
        }
    }
}

impl<'l> Cursor<'l> {
    fn next(&mut self) -> Option<&'l (Tok, usize)> {
        let tok = self.line.tokens.get(self.at);
        if tok.is_some() {
            self.at += 1;
        }
        tok
    }

    fn peek_is(&self, sym: &str) -> bool {
        matches!(self.line.tokens.get(self.at), Some((Tok::Sym(found), _)) if *found == sym)
    }

    fn peek_ident(&self) -> Option<&'l str> {
        match self.line.tokens.get(self.at) {
            Some((Tok::Ident(word), _)) => Some(word.as_str()),
            _ => None,
        }
    }

    /// Line and column of the token just consumed.
    fn position_before(&self) -> (usize, usize) {
        let column = self
            .at
            .checked_sub(1)
            .and_then(|idx| self.line.tokens.get(idx))
            .map(|(_, column)| *column)
            .unwrap_or(1);
        (self.line.number, column)
    }
}
