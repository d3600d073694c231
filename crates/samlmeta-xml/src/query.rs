#![forbid(unsafe_code)]

//! Minimal XPath subset for metadata queries.
//!
//! Supported grammar:
//!
//! ```text
//! query     := path ( '|' path )*
//! path      := step+
//! step      := ( '/' | '//' ) name-test predicate*
//! name-test := '*' | QName
//! predicate := '[' '@' QName '=' ( literal | '$' NCName ) ']'
//! ```
//!
//! Prefixes are resolved against a [`NamespaceMap`] when the query is
//! parsed. Values that come from configuration (entity IDs) are passed as
//! `$variables` so they never need quoting inside the expression. Results
//! of a union are de-duplicated and returned in document order.

use crate::namespaces::NamespaceMap;
use roxmltree::{Document, Node, NodeId};
use samlmeta_core::Error;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Variable bindings for `$name` references.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` (without the `$`) to a string value.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_owned(), value.to_owned());
        self
    }

    fn get(&self, name: &str) -> Result<&str, Error> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::Query(format!("unbound variable ${name}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QName {
    ns: Option<String>,
    local: String,
}

impl QName {
    fn matches(&self, ns: Option<&str>, local: &str) -> bool {
        self.local == local && self.ns.as_deref().unwrap_or("") == ns.unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Name(QName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Predicate {
    attr: QName,
    value: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

impl Step {
    fn matches(&self, node: &Node<'_, '_>, vars: &Variables) -> Result<bool, Error> {
        if !node.is_element() {
            return Ok(false);
        }
        if let NameTest::Name(name) = &self.test {
            let tag = node.tag_name();
            if !name.matches(tag.namespace(), tag.name()) {
                return Ok(false);
            }
        }
        for pred in &self.predicates {
            let expected = match &pred.value {
                Operand::Literal(s) => s.as_str(),
                Operand::Variable(v) => vars.get(v)?,
            };
            let found = node
                .attributes()
                .find(|a| pred.attr.matches(a.namespace(), a.name()))
                .map(|a| a.value());
            if found != Some(expected) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// A parsed query, ready to run against documents sharing its namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    source: String,
    paths: Vec<Vec<Step>>,
}

impl Query {
    /// Parse `expr`, resolving prefixes through `namespaces`.
    pub fn parse(expr: &str, namespaces: &NamespaceMap) -> Result<Self, Error> {
        let mut parser = Parser {
            input: expr,
            pos: 0,
            namespaces,
        };
        let mut paths = vec![parser.path()?];
        loop {
            parser.skip_ws();
            if parser.at_end() {
                break;
            }
            if !parser.eat("|") {
                return Err(parser.error("expected '|' or end of query"));
            }
            paths.push(parser.path()?);
        }
        Ok(Self {
            source: expr.to_owned(),
            paths,
        })
    }

    /// The expression this query was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `doc`, returning matching elements in document order.
    pub fn select<'a, 'input>(
        &self,
        doc: &'a Document<'input>,
        vars: &Variables,
    ) -> Result<Vec<Node<'a, 'input>>, Error> {
        let mut selected: HashSet<NodeId> = HashSet::new();
        for path in &self.paths {
            let mut context = vec![doc.root()];
            for step in path {
                let mut seen = HashSet::new();
                let mut next = Vec::new();
                for ctx in &context {
                    match step.axis {
                        Axis::Child => {
                            for n in ctx.children() {
                                if step.matches(&n, vars)? && seen.insert(n.id()) {
                                    next.push(n);
                                }
                            }
                        }
                        Axis::Descendant => {
                            for n in ctx.descendants().skip(1) {
                                if step.matches(&n, vars)? && seen.insert(n.id()) {
                                    next.push(n);
                                }
                            }
                        }
                    }
                }
                context = next;
            }
            selected.extend(context.iter().map(|n| n.id()));
        }
        Ok(doc
            .descendants()
            .filter(|n| selected.contains(&n.id()))
            .collect())
    }

    /// First match in document order.
    pub fn select_first<'a, 'input>(
        &self,
        doc: &'a Document<'input>,
        vars: &Variables,
    ) -> Result<Option<Node<'a, 'input>>, Error> {
        Ok(self.select(doc, vars)?.into_iter().next())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'q, 'n> {
    input: &'q str,
    pos: usize,
    namespaces: &'n NamespaceMap,
}

impl Parser<'_, '_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn error(&self, msg: &str) -> Error {
        Error::Query(format!("{msg} at offset {} in {:?}", self.pos, self.input))
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), Error> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {token:?}")))
        }
    }

    fn ncname(&mut self) -> Result<&str, Error> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a name"));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.input[start..self.pos])
    }

    fn qname(&mut self) -> Result<QName, Error> {
        let first = self.ncname()?.to_owned();
        if self.eat(":") {
            let local = self.ncname()?.to_owned();
            let uri = self
                .namespaces
                .resolve(&first)
                .ok_or_else(|| Error::Query(format!("unbound namespace prefix {first:?}")))?;
            Ok(QName {
                ns: Some(uri.to_owned()),
                local,
            })
        } else {
            Ok(QName {
                ns: None,
                local: first,
            })
        }
    }

    fn path(&mut self) -> Result<Vec<Step>, Error> {
        self.skip_ws();
        let mut steps = Vec::new();
        loop {
            let axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else {
                break;
            };
            let test = if self.eat("*") {
                NameTest::Any
            } else {
                NameTest::Name(self.qname()?)
            };
            let mut predicates = Vec::new();
            while self.eat("[") {
                predicates.push(self.predicate()?);
            }
            steps.push(Step {
                axis,
                test,
                predicates,
            });
        }
        if steps.is_empty() {
            return Err(self.error("expected an absolute location path"));
        }
        Ok(steps)
    }

    fn predicate(&mut self) -> Result<Predicate, Error> {
        self.skip_ws();
        self.expect("@")?;
        let attr = self.qname()?;
        self.skip_ws();
        self.expect("=")?;
        self.skip_ws();
        let value = if self.eat("$") {
            Operand::Variable(self.ncname()?.to_owned())
        } else {
            let quote = match self.rest().chars().next() {
                Some(q @ ('\'' | '"')) => q,
                _ => return Err(self.error("expected a string literal or variable")),
            };
            self.pos += 1;
            let end = self
                .rest()
                .find(quote)
                .ok_or_else(|| self.error("unterminated string literal"))?;
            let lit = self.rest()[..end].to_owned();
            self.pos += end + 1;
            Operand::Literal(lit)
        };
        self.skip_ws();
        self.expect("]")?;
        Ok(Predicate { attr, value })
    }
}

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}
