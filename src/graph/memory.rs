//! In-memory graph source backed by N-Quads.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::error::{BundleError, Result};
use crate::graph::{GraphSource, IMPORTS_PREDICATE};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::Blank(label) => write!(f, "_:{label}"),
            Self::Literal {
                value,
                datatype,
                language,
            } => {
                f.write_str("\"")?;
                for c in value.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")?;
                if let Some(lang) = language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Statement {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Named contexts held in memory. Statement sets are ordered, so canonical
/// output is the sorted N-Triples rendering of a context.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    contexts: BTreeMap<String, BTreeSet<Statement>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, context: impl Into<String>, statement: Statement) {
        self.contexts
            .entry(context.into())
            .or_default()
            .insert(statement);
    }

    /// Convenience for IRI-only statements.
    pub fn add(&mut self, context: &str, subject: &str, predicate: &str, object: Term) {
        self.insert(
            context,
            Statement {
                subject: Term::iri(subject),
                predicate: Term::iri(predicate),
                object,
            },
        );
    }

    /// Record that `context` imports `imported` inside `imports_context`.
    pub fn add_import(&mut self, imports_context: &str, context: &str, imported: &str) {
        self.add(imports_context, context, IMPORTS_PREDICATE, Term::iri(imported));
    }

    /// Add every statement of `other`.
    pub fn merge(&mut self, other: Self) {
        for (context, statements) in other.contexts {
            self.contexts.entry(context).or_default().extend(statements);
        }
    }

    pub fn statements(&self, context: &str) -> impl Iterator<Item = &Statement> {
        self.contexts.get(context).into_iter().flatten()
    }

    pub fn load_nquads(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_nquads(&content)
    }

    /// Parse N-Quads. Statements without a graph label are ignored; the
    /// engine only deals in named contexts.
    pub fn parse_nquads(input: &str) -> Result<Self> {
        let mut graph = Self::new();
        for (lineno, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parser = LineParser::new(line);
            let parsed = parser.quad().map_err(|reason| {
                BundleError::InvalidDescriptor(format!("N-Quads line {}: {reason}", lineno + 1))
            })?;
            if let (statement, Some(context)) = parsed {
                graph.insert(context, statement);
            }
        }
        Ok(graph)
    }
}

impl GraphSource for MemoryGraph {
    fn contexts(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }

    fn write_canonical(&self, context: &str, out: &mut dyn Write) -> Result<()> {
        for statement in self.statements(context) {
            writeln!(out, "{statement}")?;
        }
        Ok(())
    }

    fn imported_contexts(&self, imports_context: &str, context: &str) -> Vec<String> {
        self.statements(imports_context)
            .filter(|st| {
                st.subject == Term::Iri(context.to_string())
                    && st.predicate == Term::Iri(IMPORTS_PREDICATE.to_string())
            })
            .filter_map(|st| match &st.object {
                Term::Iri(iri) => Some(iri.clone()),
                _ => None,
            })
            .collect()
    }
}

struct LineParser<'a> {
    rest: &'a str,
}

impl<'a> LineParser<'a> {
    const fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    fn quad(&mut self) -> std::result::Result<(Statement, Option<String>), String> {
        let subject = self.term()?;
        let predicate = self.term()?;
        let object = self.term()?;
        self.skip_ws();
        let context = if self.rest.starts_with('.') {
            None
        } else {
            match self.term()? {
                Term::Iri(iri) => Some(iri),
                other => return Err(format!("graph label must be an IRI, got {other}")),
            }
        };
        self.skip_ws();
        if self.rest != "." {
            return Err("expected terminating '.'".to_string());
        }
        Ok((
            Statement {
                subject,
                predicate,
                object,
            },
            context,
        ))
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn term(&mut self) -> std::result::Result<Term, String> {
        self.skip_ws();
        if let Some(rest) = self.rest.strip_prefix('<') {
            let end = rest.find('>').ok_or("unterminated IRI")?;
            let iri = rest[..end].to_string();
            self.rest = &rest[end + 1..];
            return Ok(Term::Iri(iri));
        }
        if let Some(rest) = self.rest.strip_prefix("_:") {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            let label = rest[..end].to_string();
            self.rest = &rest[end..];
            return Ok(Term::Blank(label));
        }
        if let Some(rest) = self.rest.strip_prefix('"') {
            return self.literal(rest);
        }
        Err(format!("unexpected input: {}", self.rest))
    }

    fn literal(&mut self, body: &'a str) -> std::result::Result<Term, String> {
        let mut value = String::new();
        let mut chars = body.char_indices();
        let end = loop {
            let (idx, c) = chars.next().ok_or("unterminated literal")?;
            match c {
                '"' => break idx,
                '\\' => {
                    let (_, esc) = chars.next().ok_or("dangling escape")?;
                    value.push(match esc {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '"' => '"',
                        '\\' => '\\',
                        other => return Err(format!("unsupported escape \\{other}")),
                    });
                }
                c => value.push(c),
            }
        };
        self.rest = &body[end + 1..];

        if let Some(rest) = self.rest.strip_prefix('@') {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            let language = rest[..end].to_string();
            self.rest = &rest[end..];
            return Ok(Term::Literal {
                value,
                datatype: None,
                language: Some(language),
            });
        }
        if let Some(rest) = self.rest.strip_prefix("^^") {
            self.rest = rest;
            let Term::Iri(datatype) = self.term()? else {
                return Err("literal datatype must be an IRI".to_string());
            };
            return Ok(Term::Literal {
                value,
                datatype: Some(datatype),
                language: None,
            });
        }
        Ok(Term::Literal {
            value,
            datatype: None,
            language: None,
        })
    }
}
