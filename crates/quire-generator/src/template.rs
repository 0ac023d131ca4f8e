//! A small Liquid dialect for layouts, fragments and unit bodies.
//!
//! Supported syntax:
//!
//! - `{{ expr | filter: arg }}` outputs a value
//! - `{% if %}`, `{% elsif %}`, `{% else %}`, `{% endif %}` and `{% unless %}`
//! - `{% for x in list limit: 3 offset: 1 reversed %}` with `forloop.*` and
//!   an optional `{% else %}` branch for empty lists
//! - `{% include name key=expr %}` and `{% assign x = expr %}`
//! - `{% raw %}` and `{% comment %}` blocks
//!
//! Templates are parsed once. Unknown tags and filters are syntax errors at
//! load time; undefined variables render as the empty string.

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use chrono::format::{Item, StrftimeItems};
use quire_core::{
    Map, Value,
    content::{strip_html, truncate_at_word_boundary},
    frontmatter::parse_date,
    slugify,
};
use quire_parser::escape_html;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template source could not be parsed.
    #[error("syntax error in {template} at line {line}: {message}")]
    Syntax {
        template: String,
        line: usize,
        message: String,
    },

    /// `{% include %}` named a fragment that does not exist.
    #[error("unknown fragment `{name}` included from {template}")]
    UnknownFragment { name: String, template: String },

    /// A fragment includes itself, directly or through others.
    #[error("fragment cycle: {}", chain.join(" -> "))]
    FragmentCycle { chain: Vec<String> },

    /// Two files map to the same fragment name.
    #[error("fragment `{name}` is defined more than once")]
    DuplicateFragment { name: String },

    /// A filter received a value it cannot handle.
    #[error("render error in {template} at line {line}: {message}")]
    Render {
        template: String,
        line: usize,
        message: String,
    },

    /// Template file could not be read.
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Variables visible to a render.
///
/// Names inserted here are the reserved roots (`page`, `site`, `data`, ...).
/// An unqualified name that is not a root falls back to the `page`, `site`
/// and `data` roots in that order.
#[derive(Debug, Clone, Default)]
pub struct Context<'a> {
    roots: BTreeMap<String, Cow<'a, Value>>,
}

impl<'a> Context<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an owned root.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.roots.insert(name.into(), Cow::Owned(value.into()));
    }

    /// Bind a borrowed root.
    pub fn insert_ref(&mut self, name: impl Into<String>, value: &'a Value) {
        self.roots.insert(name.into(), Cow::Borrowed(value));
    }

    /// A root by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.roots.get(name).map(|value| &**value)
    }

    /// Resolve an unqualified name: roots, then page metadata, site config
    /// and data tables. A null under one namespace falls through to the next.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name).or_else(|| {
            ["page", "site", "data"].iter().find_map(|root| {
                self.get(root)
                    .and_then(|v| v.get(name))
                    .filter(|v| !v.is_null())
            })
        })
    }
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
    size_hint: usize,
}

impl Template {
    /// Parse template source.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let tokens = tokenize(&name, source)?;
        let mut parser = Parser {
            name: &name,
            tokens,
            pos: 0,
        };
        let (nodes, stop) = parser.parse_until(&[])?;
        if let Some(stop) = stop {
            return Err(parser.error(stop.line, format!("unexpected `{}`", stop.word)));
        }

        Ok(Self {
            size_hint: source.len(),
            name,
            nodes,
        })
    }

    /// Get the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render with `ctx`, resolving includes against `fragments`.
    pub fn render(&self, ctx: &Context<'_>, fragments: &FragmentRegistry) -> Result<String> {
        let mut renderer = Renderer {
            ctx,
            fragments,
            frames: vec![Map::new()],
            stack: Vec::new(),
            template: &self.name,
        };
        let mut out = String::with_capacity(self.size_hint);
        renderer.render_nodes(&self.nodes, &mut out)?;
        Ok(out)
    }

    /// Fragment names this template includes directly.
    #[must_use]
    pub fn includes(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        collect_includes(&self.nodes, &mut names);
        names
    }
}

fn collect_includes<'n>(nodes: &'n [Node], names: &mut BTreeSet<&'n str>) {
    for node in nodes {
        match node {
            Node::Include { name, .. } => {
                names.insert(name.as_str());
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (_, body) in branches {
                    collect_includes(body, names);
                }
                collect_includes(otherwise, names);
            }
            Node::For { body, empty, .. } => {
                collect_includes(body, names);
                collect_includes(empty, names);
            }
            _ => {}
        }
    }
}

/// Name-keyed fragments (the `includes/` directory).
#[derive(Debug, Clone, Default)]
pub struct FragmentRegistry {
    fragments: BTreeMap<String, Template>,
}

impl FragmentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file below `dir`. Names are relative paths without the
    /// extension, so `includes/nav/menu.html` is `nav/menu`.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        if !dir.exists() {
            return Ok(registry);
        }

        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = entry.map_err(|e| TemplateError::Io {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let name = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            registry.register(name, &source)?;
        }

        debug!(count = registry.len(), "loaded fragments");
        Ok(registry)
    }

    /// Parse and register one fragment.
    pub fn register(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        let name = name.into();
        if self.fragments.contains_key(&name) {
            return Err(TemplateError::DuplicateFragment { name });
        }
        let template = Template::parse(name.clone(), source)?;
        self.fragments.insert(name, template);
        Ok(())
    }

    /// Look up a fragment; `nav.html` and `nav` name the same fragment.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Template> {
        let name = name.trim_start_matches('/');
        self.fragments.get(name).or_else(|| {
            name.rsplit_once('.')
                .and_then(|(stem, _)| self.fragments.get(stem))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Every include in `template` names a known fragment.
    pub fn check(&self, template: &Template) -> Result<()> {
        for name in template.includes() {
            if self.get(name).is_none() {
                return Err(TemplateError::UnknownFragment {
                    name: name.to_string(),
                    template: template.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check every fragment for unknown includes and include cycles.
    pub fn validate(&self) -> Result<()> {
        let mut done = BTreeSet::new();
        for name in self.fragments.keys() {
            self.visit(name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn visit<'s>(
        &'s self,
        name: &'s str,
        stack: &mut Vec<&'s str>,
        done: &mut BTreeSet<&'s str>,
    ) -> Result<()> {
        if let Some(pos) = stack.iter().position(|n| *n == name) {
            let mut chain: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            chain.push(name.to_string());
            return Err(TemplateError::FragmentCycle { chain });
        }
        if done.contains(name) {
            return Ok(());
        }
        let Some(template) = self.fragments.get(name) else {
            return Ok(());
        };

        stack.push(name);
        for include in template.includes() {
            let Some(target) = self.get(include) else {
                return Err(TemplateError::UnknownFragment {
                    name: include.to_string(),
                    template: name.to_string(),
                });
            };
            self.visit(target.name(), stack, done)?;
        }
        stack.pop();
        done.insert(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lexing

#[derive(Debug, Clone, Copy)]
enum Token<'s> {
    Text(&'s str),
    Output { src: &'s str, line: usize },
    Tag { src: &'s str, line: usize },
}

fn tokenize<'s>(name: &str, source: &'s str) -> Result<Vec<Token<'s>>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let Some(open) = find_open(rest) else {
            tokens.push(Token::Text(rest));
            break;
        };
        if open > 0 {
            tokens.push(Token::Text(&rest[..open]));
        }

        let start = pos + open;
        let line = line_at(source, start);
        let is_output = source[start..].starts_with("{{");
        let close = if is_output { "}}" } else { "%}" };
        let inner_start = start + 2;
        let Some(len) = source[inner_start..].find(close) else {
            return Err(syntax(
                name,
                line,
                format!("unclosed `{}`", &source[start..inner_start]),
            ));
        };
        let inner = source[inner_start..inner_start + len].trim();
        pos = inner_start + len + 2;

        if is_output {
            tokens.push(Token::Output { src: inner, line });
            continue;
        }

        let word = inner.split_whitespace().next().unwrap_or_default();
        if word == "raw" || word == "comment" {
            let end_word = if word == "raw" { "endraw" } else { "endcomment" };
            let Some((body_end, after)) = find_end_tag(source, pos, end_word) else {
                return Err(syntax(
                    name,
                    line,
                    format!("`{{% {word} %}}` is never closed"),
                ));
            };
            if word == "raw" {
                tokens.push(Token::Text(&source[pos..body_end]));
            }
            pos = after;
            continue;
        }

        tokens.push(Token::Tag { src: inner, line });
    }

    Ok(tokens)
}

fn find_open(s: &str) -> Option<usize> {
    match (s.find("{{"), s.find("{%")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn find_end_tag(source: &str, from: usize, word: &str) -> Option<(usize, usize)> {
    let mut search = from;
    while let Some(rel) = source[search..].find("{%") {
        let start = search + rel;
        let inner_start = start + 2;
        let len = source[inner_start..].find("%}")?;
        if source[inner_start..inner_start + len].trim() == word {
            return Some((start, inner_start + len + 2));
        }
        search = inner_start;
    }
    None
}

fn line_at(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

fn syntax(template: &str, line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        template: template.to_string(),
        line,
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Syntax tree

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Output {
        value: Filtered,
        line: usize,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For {
        var: String,
        iterable: Filtered,
        limit: Option<Expr>,
        offset: Option<Expr>,
        reversed: bool,
        body: Vec<Node>,
        empty: Vec<Node>,
        line: usize,
    },
    Include {
        name: String,
        bindings: Vec<(String, Filtered)>,
        line: usize,
    },
    Assign {
        var: String,
        value: Filtered,
        line: usize,
    },
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
}

#[derive(Debug, Clone)]
struct Filtered {
    expr: Expr,
    filters: Vec<FilterCall>,
}

#[derive(Debug, Clone)]
struct FilterCall {
    kind: FilterKind,
    args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    Escape,
    XmlEscape,
    Url,
    RelativeUrl,
    Date,
    Default,
    Upcase,
    Downcase,
    Slugify,
    Join,
    Size,
    First,
    Last,
    StripHtml,
    Truncate,
    Json,
    Where,
    Sort,
    Map,
    Reverse,
}

impl FilterKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "escape" => Self::Escape,
            "xml_escape" => Self::XmlEscape,
            "url" | "absolute_url" => Self::Url,
            "relative_url" => Self::RelativeUrl,
            "date" => Self::Date,
            "default" => Self::Default,
            "upcase" => Self::Upcase,
            "downcase" => Self::Downcase,
            "slugify" => Self::Slugify,
            "join" => Self::Join,
            "size" => Self::Size,
            "first" => Self::First,
            "last" => Self::Last,
            "strip_html" => Self::StripHtml,
            "truncate" => Self::Truncate,
            "json" | "jsonify" => Self::Json,
            "where" => Self::Where,
            "sort" => Self::Sort,
            "map" => Self::Map,
            "reverse" => Self::Reverse,
            _ => return None,
        })
    }

    /// Accepted argument counts.
    fn arity(self) -> (usize, usize) {
        match self {
            Self::Date | Self::Join | Self::Truncate | Self::Sort => (0, 1),
            Self::Default | Self::Map => (1, 1),
            Self::Where => (2, 2),
            _ => (0, 0),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing

struct Stop<'s> {
    word: &'s str,
    rest: &'s str,
    line: usize,
}

struct Parser<'s> {
    name: &'s str,
    tokens: Vec<Token<'s>>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn error(&self, line: usize, message: impl Into<String>) -> TemplateError {
        syntax(self.name, line, message)
    }

    fn parse_until(&mut self, stops: &[&str]) -> Result<(Vec<Node>, Option<Stop<'s>>)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.get(self.pos).copied() {
            self.pos += 1;
            match token {
                Token::Text(text) => nodes.push(Node::Text(text.to_string())),
                Token::Output { src, line } => {
                    let value = ExprParser::new(src)
                        .and_then(|mut p| {
                            let value = p.filtered(true)?;
                            p.finish()?;
                            Ok(value)
                        })
                        .map_err(|m| self.error(line, m))?;
                    self.check_filters(&value, line)?;
                    nodes.push(Node::Output { value, line });
                }
                Token::Tag { src, line } => {
                    let (word, rest) = split_word(src);
                    if stops.contains(&word) {
                        return Ok((nodes, Some(Stop { word, rest, line })));
                    }
                    nodes.push(self.parse_tag(word, rest, line)?);
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_block(&mut self, stops: &[&str], opener: &str, line: usize) -> Result<(Vec<Node>, Stop<'s>)> {
        match self.parse_until(stops)? {
            (nodes, Some(stop)) => Ok((nodes, stop)),
            (_, None) => Err(self.error(line, format!("`{{% {opener} %}}` is never closed"))),
        }
    }

    fn parse_tag(&mut self, word: &'s str, rest: &'s str, line: usize) -> Result<Node> {
        match word {
            "if" | "unless" => self.parse_if(word, rest, line),
            "for" => self.parse_for(rest, line),
            "include" => self.parse_include(rest, line),
            "assign" => {
                let (var, value) = rest
                    .split_once('=')
                    .ok_or_else(|| self.error(line, "expected `assign name = value`"))?;
                let var = var.trim();
                if !is_identifier(var) {
                    return Err(self.error(line, format!("invalid variable name `{var}`")));
                }
                let value = self.parse_filtered(value, line)?;
                Ok(Node::Assign {
                    var: var.to_string(),
                    value,
                    line,
                })
            }
            "elsif" | "else" | "endif" | "endunless" | "endfor" | "endraw" | "endcomment" => {
                Err(self.error(line, format!("unexpected `{word}`")))
            }
            "" => Err(self.error(line, "empty tag")),
            other => Err(self.error(line, format!("unknown tag `{other}`"))),
        }
    }

    fn parse_if(&mut self, word: &'s str, rest: &'s str, line: usize) -> Result<Node> {
        let (stops, end): (&[&str], &str) = if word == "if" {
            (&["elsif", "else", "endif"], "endif")
        } else {
            (&["else", "endunless"], "endunless")
        };

        let mut condition = self.parse_expr(rest, line)?;
        if word == "unless" {
            condition = Expr::Not(Box::new(condition));
        }

        let mut branches = Vec::new();
        let mut otherwise = Vec::new();
        loop {
            let (body, stop) = self.parse_block(stops, word, line)?;
            branches.push((condition, body));
            match stop.word {
                "elsif" => condition = self.parse_expr(stop.rest, stop.line)?,
                "else" => {
                    otherwise = self.parse_block(&[end], word, line)?.0;
                    break;
                }
                _ => break,
            }
        }

        Ok(Node::If {
            branches,
            otherwise,
        })
    }

    fn parse_for(&mut self, rest: &'s str, line: usize) -> Result<Node> {
        let (var, rest) = split_word(rest);
        let (keyword, source) = split_word(rest);
        if !is_identifier(var) || keyword != "in" {
            return Err(self.error(line, "expected `for name in expression`"));
        }

        let mut parser = ExprParser::new(source).map_err(|m| self.error(line, m))?;
        let iterable = parser.filtered(false).map_err(|m| self.error(line, m))?;
        let mut limit = None;
        let mut offset = None;
        let mut reversed = false;
        while let Some(tok) = parser.next() {
            match tok {
                Tok::Ident(word) if word == "reversed" => reversed = true,
                Tok::Ident(word) if word == "limit" || word == "offset" => {
                    if !parser.eat(&Tok::Colon) {
                        return Err(self.error(line, format!("expected `:` after `{word}`")));
                    }
                    let value = parser.primary().map_err(|m| self.error(line, m))?;
                    if word == "limit" {
                        limit = Some(value);
                    } else {
                        offset = Some(value);
                    }
                }
                other => {
                    return Err(self.error(line, format!("unexpected `{}` in for", other.describe())));
                }
            }
        }
        self.check_filters(&iterable, line)?;

        let (body, stop) = self.parse_block(&["else", "endfor"], "for", line)?;
        let empty = if stop.word == "else" {
            self.parse_block(&["endfor"], "for", line)?.0
        } else {
            Vec::new()
        };

        Ok(Node::For {
            var: var.to_string(),
            iterable,
            limit,
            offset,
            reversed,
            body,
            empty,
            line,
        })
    }

    fn parse_include(&mut self, rest: &'s str, line: usize) -> Result<Node> {
        let (name, args) = split_word(rest);
        let name = name.trim_matches(['"', '\'']);
        if name.is_empty() {
            return Err(self.error(line, "include needs a fragment name"));
        }

        let mut parser = ExprParser::new(args).map_err(|m| self.error(line, m))?;
        let mut bindings = Vec::new();
        while let Some(tok) = parser.next() {
            let Tok::Ident(key) = tok else {
                return Err(self.error(line, format!("unexpected `{}` in include", tok.describe())));
            };
            if !parser.eat(&Tok::Assign) {
                return Err(self.error(line, format!("expected `=` after `{key}`")));
            }
            let value = parser.filtered(false).map_err(|m| self.error(line, m))?;
            self.check_filters(&value, line)?;
            bindings.push((key, value));
            parser.eat(&Tok::Comma);
        }

        Ok(Node::Include {
            name: name.to_string(),
            bindings,
            line,
        })
    }

    fn parse_expr(&self, src: &str, line: usize) -> Result<Expr> {
        ExprParser::new(src)
            .and_then(|mut p| {
                let expr = p.or()?;
                p.finish()?;
                Ok(expr)
            })
            .map_err(|m| self.error(line, m))
    }

    fn parse_filtered(&self, src: &str, line: usize) -> Result<Filtered> {
        let value = ExprParser::new(src)
            .and_then(|mut p| {
                let value = p.filtered(true)?;
                p.finish()?;
                Ok(value)
            })
            .map_err(|m| self.error(line, m))?;
        self.check_filters(&value, line)?;
        Ok(value)
    }

    /// Reject literal `date` formats chrono cannot render.
    fn check_filters(&self, value: &Filtered, line: usize) -> Result<()> {
        for call in &value.filters {
            if call.kind == FilterKind::Date
                && let Some(Expr::Literal(Value::String(fmt))) = call.args.first()
                && !valid_strftime(fmt)
            {
                return Err(self.error(line, format!("invalid date format `{fmt}`")));
            }
        }
        Ok(())
    }
}

fn split_word(src: &str) -> (&str, &str) {
    let src = src.trim();
    match src.find(char::is_whitespace) {
        Some(i) => (&src[..i], src[i..].trim_start()),
        None => (src, ""),
    }
}

fn is_identifier(s: &str) -> bool {
    s.starts_with(|c: char| c.is_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn valid_strftime(fmt: &str) -> bool {
    !StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error))
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(CmpOp),
    Pipe,
    Colon,
    Comma,
    Assign,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Self::Ident(s) => s.clone(),
            Self::Str(s) => format!("\"{s}\""),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Op(op) => format!("{op:?}"),
            Self::Pipe => "|".into(),
            Self::Colon => ":".into(),
            Self::Comma => ",".into(),
            Self::Assign => "=".into(),
        }
    }
}

fn lex(src: &str) -> std::result::Result<Vec<Tok>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    while let Some(&c) = chars.get(i) {
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '|' => {
                toks.push(Tok::Pipe);
                i += 1;
            }
            ':' => {
                toks.push(Tok::Colon);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let (tok, width) = match (c, next) {
                    ('=', Some('=')) => (Tok::Op(CmpOp::Eq), 2),
                    ('=', _) => (Tok::Assign, 1),
                    ('!', Some('=')) => (Tok::Op(CmpOp::Ne), 2),
                    ('<', Some('=')) => (Tok::Op(CmpOp::Le), 2),
                    ('<', _) => (Tok::Op(CmpOp::Lt), 1),
                    ('>', Some('=')) => (Tok::Op(CmpOp::Ge), 2),
                    ('>', _) => (Tok::Op(CmpOp::Gt), 1),
                    _ => return Err(format!("unexpected `{c}`")),
                };
                toks.push(tok);
                i += width;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|ch| *ch == c)
                    .ok_or_else(|| "unterminated string".to_string())?;
                toks.push(Tok::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(char::is_ascii_digit) {
                    i += 1;
                }
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(char::is_ascii_digit);
                if is_float {
                    i += 1;
                    while chars.get(i).is_some_and(char::is_ascii_digit) {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let tok = if is_float {
                    text.parse().map(Tok::Float).map_err(|_| format!("bad number `{text}`"))?
                } else {
                    text.parse().map(Tok::Int).map_err(|_| format!("bad number `{text}`"))?
                };
                toks.push(tok);
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.' | '?'))
                {
                    i += 1;
                }
                toks.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }

    Ok(toks)
}

struct ExprParser {
    toks: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn new(src: &str) -> std::result::Result<Self, String> {
        Ok(Self {
            toks: lex(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(word)) if word == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn finish(&self) -> std::result::Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(format!("unexpected `{}`", tok.describe())),
        }
    }

    /// An expression followed by `| filter: args` calls. With `full` unset
    /// only a single value is read before the filters.
    fn filtered(&mut self, full: bool) -> std::result::Result<Filtered, String> {
        let expr = if full { self.or()? } else { self.primary()? };
        let mut filters = Vec::new();

        while self.eat(&Tok::Pipe) {
            let Some(Tok::Ident(name)) = self.next() else {
                return Err("expected a filter name after `|`".into());
            };
            let kind = FilterKind::from_name(&name).ok_or_else(|| format!("unknown filter `{name}`"))?;

            let mut args = Vec::new();
            if self.eat(&Tok::Colon) {
                loop {
                    args.push(self.primary()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
            }

            let (min, max) = kind.arity();
            if args.len() < min || args.len() > max {
                return Err(format!(
                    "filter `{name}` takes {} argument(s), got {}",
                    if min == max { min.to_string() } else { format!("{min} to {max}") },
                    args.len()
                ));
            }
            filters.push(FilterCall { kind, args });
        }

        Ok(Filtered { expr, filters })
    }

    fn or(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.and()?;
        while self.eat_keyword("or") {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.not()?;
        while self.eat_keyword("and") {
            let rhs = self.not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> std::result::Result<Expr, String> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> std::result::Result<Expr, String> {
        let lhs = self.primary()?;
        let op = match self.peek() {
            Some(Tok::Op(op)) => *op,
            Some(Tok::Ident(word)) if word == "contains" => CmpOp::Contains,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.primary()?;
        Ok(Expr::Compare(Box::new(lhs), op, Box::new(rhs)))
    }

    fn primary(&mut self) -> std::result::Result<Expr, String> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Tok::Int(i)) => Ok(Expr::Literal(Value::Integer(i))),
            Some(Tok::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Tok::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "nil" | "null" => Ok(Expr::Literal(Value::Null)),
                "and" | "or" | "not" | "contains" => Err(format!("expected a value, found `{word}`")),
                _ => {
                    let segments: Vec<String> = word.split('.').map(str::to_string).collect();
                    if segments.iter().any(String::is_empty) {
                        return Err(format!("invalid variable `{word}`"));
                    }
                    Ok(Expr::Path(segments))
                }
            },
            Some(tok) => Err(format!("expected a value, found `{}`", tok.describe())),
            None => Err("expected a value".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering

struct Renderer<'r> {
    ctx: &'r Context<'r>,
    fragments: &'r FragmentRegistry,
    frames: Vec<Map>,
    stack: Vec<&'r str>,
    template: &'r str,
}

impl<'r> Renderer<'r> {
    fn render_nodes(&mut self, nodes: &'r [Node], out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),

                Node::Output { value, line } => {
                    let value = self.eval_filtered(value, *line)?;
                    out.push_str(&value.to_string());
                }

                Node::If {
                    branches,
                    otherwise,
                } => {
                    let body = branches
                        .iter()
                        .find(|(cond, _)| self.eval(cond).is_truthy())
                        .map_or(otherwise, |(_, body)| body);
                    self.render_nodes(body, out)?;
                }

                Node::For {
                    var,
                    iterable,
                    limit,
                    offset,
                    reversed,
                    body,
                    empty,
                    line,
                } => {
                    let mut items = match self.eval_filtered(iterable, *line)? {
                        Value::List(items) => items,
                        Value::Map(map) => map
                            .into_iter()
                            .map(|(k, v)| Value::List(vec![Value::String(k), v]))
                            .collect(),
                        Value::Null => Vec::new(),
                        other => vec![other],
                    };

                    if let Some(offset) = offset {
                        let n = self.eval_count(offset, "offset", *line)?;
                        items = items.into_iter().skip(n).collect();
                    }
                    if let Some(limit) = limit {
                        let n = self.eval_count(limit, "limit", *line)?;
                        items.truncate(n);
                    }
                    if *reversed {
                        items.reverse();
                    }

                    if items.is_empty() {
                        self.render_nodes(empty, out)?;
                        continue;
                    }

                    let length = items.len();
                    for (index, item) in items.into_iter().enumerate() {
                        let mut frame = Map::new();
                        frame.insert(var.clone(), item);
                        frame.insert("forloop".into(), forloop(index, length));
                        self.frames.push(frame);
                        let result = self.render_nodes(body, out);
                        self.frames.pop();
                        result?;
                    }
                }

                Node::Include {
                    name,
                    bindings,
                    line,
                } => self.include(name, bindings, *line, out)?,

                Node::Assign { var, value, line } => {
                    let value = self.eval_filtered(value, *line)?;
                    if let Some(frame) = self.frames.last_mut() {
                        frame.insert(var.clone(), value);
                    }
                }
            }
        }
        Ok(())
    }

    fn include(
        &mut self,
        name: &str,
        bindings: &'r [(String, Filtered)],
        line: usize,
        out: &mut String,
    ) -> Result<()> {
        let fragments: &'r FragmentRegistry = self.fragments;
        let Some(fragment) = fragments.get(name) else {
            return Err(TemplateError::UnknownFragment {
                name: name.to_string(),
                template: self.template.to_string(),
            });
        };

        if let Some(pos) = self.stack.iter().position(|n| *n == fragment.name()) {
            let mut chain: Vec<String> = self.stack[pos..].iter().map(|s| s.to_string()).collect();
            chain.push(fragment.name().to_string());
            return Err(TemplateError::FragmentCycle { chain });
        }

        let mut frame = Map::new();
        for (key, value) in bindings {
            frame.insert(key.clone(), self.eval_filtered(value, line)?);
        }
        let include = Value::Map(frame.clone());
        frame.insert("include".into(), include);

        self.frames.push(frame);
        self.stack.push(fragment.name());
        let caller = std::mem::replace(&mut self.template, fragment.name());

        let result = self.render_nodes(&fragment.nodes, out);

        self.template = caller;
        self.stack.pop();
        self.frames.pop();
        result
    }

    fn lookup(&self, path: &[String]) -> Value {
        let Some((first, rest)) = path.split_first() else {
            return Value::Null;
        };
        let root = self
            .frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(first))
            .or_else(|| self.ctx.lookup(first));
        let Some(mut current) = root else {
            return Value::Null;
        };

        for (i, segment) in rest.iter().enumerate() {
            match current.get(segment) {
                Some(next) => current = next,
                None if segment == "size" && i + 1 == rest.len() => {
                    return current.len().map_or(Value::Null, Value::from);
                }
                None => return Value::Null,
            }
        }
        current.clone()
    }

    fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Path(path) => self.lookup(path),
            Expr::Not(inner) => Value::Bool(!self.eval(inner).is_truthy()),
            Expr::And(a, b) => Value::Bool(self.eval(a).is_truthy() && self.eval(b).is_truthy()),
            Expr::Or(a, b) => Value::Bool(self.eval(a).is_truthy() || self.eval(b).is_truthy()),
            Expr::Compare(a, op, b) => {
                let (a, b) = (self.eval(a), self.eval(b));
                let result = match op {
                    CmpOp::Eq => a.loose_eq(&b),
                    CmpOp::Ne => !a.loose_eq(&b),
                    CmpOp::Lt => a.loose_cmp(&b).is_some_and(|o| o.is_lt()),
                    CmpOp::Gt => a.loose_cmp(&b).is_some_and(|o| o.is_gt()),
                    CmpOp::Le => a.loose_cmp(&b).is_some_and(|o| o.is_le()),
                    CmpOp::Ge => a.loose_cmp(&b).is_some_and(|o| o.is_ge()),
                    CmpOp::Contains => a.contains(&b),
                };
                Value::Bool(result)
            }
        }
    }

    fn eval_count(&self, expr: &Expr, what: &str, line: usize) -> Result<usize> {
        match self.eval(expr) {
            Value::Integer(n) if n >= 0 => Ok(usize::try_from(n).unwrap_or(usize::MAX)),
            other => Err(self.render_error(line, format!("`{what}` must be a non-negative integer, got `{other}`"))),
        }
    }

    fn eval_filtered(&self, value: &Filtered, line: usize) -> Result<Value> {
        let mut current = self.eval(&value.expr);
        for call in &value.filters {
            let args: Vec<Value> = call.args.iter().map(|arg| self.eval(arg)).collect();
            current = self.apply(call.kind, current, &args, line)?;
        }
        Ok(current)
    }

    fn render_error(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Render {
            template: self.template.to_string(),
            line,
            message: message.into(),
        }
    }

    fn base_url(&self) -> String {
        self.ctx
            .get("site")
            .and_then(|site| site.get("url"))
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    fn apply(&self, kind: FilterKind, input: Value, args: &[Value], line: usize) -> Result<Value> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();

        let value = match kind {
            FilterKind::Escape | FilterKind::XmlEscape => escape_html(&input.to_string()).into(),
            FilterKind::Url => absolute_url(&self.base_url(), &input.to_string()).into(),
            FilterKind::RelativeUrl => relative_url(&self.base_url(), &input.to_string()).into(),
            FilterKind::Date => {
                let fmt = match arg(0) {
                    Value::Null => "%Y-%m-%d".to_string(),
                    other => other.to_string(),
                };
                if !valid_strftime(&fmt) {
                    return Err(self.render_error(line, format!("invalid date format `{fmt}`")));
                }
                match parse_date(&input.to_string()) {
                    Some(date) => date.format(&fmt).to_string().into(),
                    None => input,
                }
            }
            FilterKind::Default => {
                if input.is_truthy() {
                    input
                } else {
                    arg(0)
                }
            }
            FilterKind::Upcase => input.to_string().to_uppercase().into(),
            FilterKind::Downcase => input.to_string().to_lowercase().into(),
            FilterKind::Slugify => slugify(&input.to_string()).into(),
            FilterKind::Join => {
                let sep = match arg(0) {
                    Value::Null => " ".to_string(),
                    other => other.to_string(),
                };
                match input {
                    Value::List(items) => items
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(&sep)
                        .into(),
                    other => other,
                }
            }
            FilterKind::Size => input.len().unwrap_or(0).into(),
            FilterKind::First => match input {
                Value::List(items) => items.into_iter().next().unwrap_or_default(),
                Value::String(s) => s.chars().next().map(String::from).into(),
                _ => Value::Null,
            },
            FilterKind::Last => match input {
                Value::List(items) => items.into_iter().next_back().unwrap_or_default(),
                Value::String(s) => s.chars().next_back().map(String::from).into(),
                _ => Value::Null,
            },
            FilterKind::StripHtml => strip_html(&input.to_string()).into(),
            FilterKind::Truncate => {
                let n = match arg(0) {
                    Value::Null => 50,
                    Value::Integer(n) if n >= 0 => usize::try_from(n).unwrap_or(usize::MAX),
                    other => {
                        return Err(self.render_error(
                            line,
                            format!("`truncate` expects a non-negative integer, got `{other}`"),
                        ));
                    }
                };
                truncate_at_word_boundary(&input.to_string(), n).into()
            }
            FilterKind::Json => serde_json::to_string(&input)
                .map_err(|e| self.render_error(line, e.to_string()))?
                .into(),
            FilterKind::Where => {
                let (key, expected) = (arg(0).to_string(), arg(1));
                match input {
                    Value::List(items) => items
                        .into_iter()
                        .filter(|item| item.get(&key).is_some_and(|v| v.loose_eq(&expected)))
                        .collect::<Vec<_>>()
                        .into(),
                    _ => Value::List(Vec::new()),
                }
            }
            FilterKind::Sort => match input {
                Value::List(mut items) => {
                    let key = match arg(0) {
                        Value::Null => None,
                        other => Some(other.to_string()),
                    };
                    let pick = |v: &Value| match &key {
                        Some(key) => v.get(key).cloned().unwrap_or_default(),
                        None => v.clone(),
                    };
                    items.sort_by(|a, b| {
                        pick(a)
                            .loose_cmp(&pick(b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    items.into()
                }
                other => other,
            },
            FilterKind::Map => {
                let key = arg(0).to_string();
                match input {
                    Value::List(items) => items
                        .iter()
                        .map(|item| item.get(&key).cloned().unwrap_or_default())
                        .collect::<Vec<_>>()
                        .into(),
                    _ => Value::List(Vec::new()),
                }
            }
            FilterKind::Reverse => match input {
                Value::List(mut items) => {
                    items.reverse();
                    items.into()
                }
                other => other,
            },
        };

        Ok(value)
    }
}

fn forloop(index: usize, length: usize) -> Value {
    let mut map = Map::new();
    map.insert("index".into(), (index + 1).into());
    map.insert("index0".into(), index.into());
    map.insert("first".into(), (index == 0).into());
    map.insert("last".into(), (index + 1 == length).into());
    map.insert("length".into(), length.into());
    Value::Map(map)
}

fn is_external(url: &str) -> bool {
    url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("//")
        || url.starts_with("mailto:")
        || url.starts_with('#')
}

/// `base_url` joined with `path`.
pub fn absolute_url(base_url: &str, path: &str) -> String {
    if is_external(path) {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// `path` prefixed with the path component of `base_url`, so sites served
/// from a sub-directory keep working.
pub fn relative_url(base_url: &str, path: &str) -> String {
    if is_external(path) {
        return path.to_string();
    }
    let without_scheme = base_url.split_once("://").map_or(base_url, |(_, rest)| rest);
    let prefix = without_scheme
        .split_once('/')
        .map_or("", |(_, p)| p.trim_matches('/'));
    let path = path.trim_start_matches('/');
    if prefix.is_empty() {
        format!("/{path}")
    } else {
        format!("/{prefix}/{path}")
    }
}
