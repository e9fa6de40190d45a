//! Stub parser: raw `.pyi` text to the interface model.
//!
//! The parser is tolerant on the surface (inline or block stub bodies,
//! missing bodies, multi-line declarations, CRLF) and strict about
//! structure: indentation must nest, and a name may only repeat inside a
//! block as adjacent overloads or adjacent signal defs.

use std::collections::HashSet;

use stubfix_core::config::default_signal_markers;
use stubfix_core::text::{byte_offset_to_position, trim_line_ending, LineEnding};

use crate::error::ParseError;
use crate::lexer::{logical_lines, LineKind, LogicalLine};
use crate::model::{
    Attribute, Body, Class, Decorator, ImportDecl, Member, Meta, Method, Module, OverloadGroup,
    Signal, SignalVariant, Verbatim,
};
use crate::signature::{
    call_variants, parse_assignment, parse_class_header, parse_def_header, parse_import,
    split_call, Syntax,
};

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Decorator and call names that declare a signal.
    pub signal_markers: Vec<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            signal_markers: default_signal_markers(),
        }
    }
}

/// Parse a whole module.
pub fn parse_module(name: &str, text: &str, options: &ParseOptions) -> Result<Module, ParseError> {
    let lines = logical_lines(text)?;
    let mut parser = Parser {
        text,
        lines,
        pos: 0,
        options,
    };
    let body = parser.parse_block(0)?;
    let trailing = parser.lines[parser.pos..]
        .iter()
        .map(|l| l.raw.to_string())
        .collect();
    Ok(Module {
        name: name.to_string(),
        body,
        trailing,
        line_ending: LineEnding::detect(text),
    })
}

/// Parse standalone declarations (rule payloads) into regenerated members.
pub fn parse_fragment(code: &str, options: &ParseOptions) -> Result<Vec<Member>, ParseError> {
    let module = parse_module("<fragment>", code, options)?;
    Ok(module
        .body
        .into_iter()
        .map(|mut member| {
            member.clear_sources();
            member.meta_mut().leading.clear();
            member
        })
        .collect())
}

const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "try", "except", "finally", "with", "for", "while", "match", "case",
];

/// Whether `code` starts with keyword `kw` as a whole word.
fn starts_with_keyword(code: &str, kw: &str) -> bool {
    code.strip_prefix(kw)
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == ':' || c == '('))
}

fn is_compound(code: &str) -> bool {
    code.ends_with(':') && COMPOUND_KEYWORDS.iter().any(|kw| starts_with_keyword(code, kw))
}

struct Parser<'a, 'o> {
    text: &'a str,
    lines: Vec<LogicalLine<'a>>,
    pos: usize,
    options: &'o ParseOptions,
}

impl Parser<'_, '_> {
    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    fn parse_block(&mut self, indent: usize) -> Result<Vec<Member>, ParseError> {
        let mut members: Vec<Member> = Vec::new();
        let mut names: HashSet<String> = HashSet::new();
        let mut last_signal_def = false;

        loop {
            let trivia_start = self.pos;
            while self.pos < self.lines.len() && self.lines[self.pos].is_trivia() {
                self.pos += 1;
            }
            if self.pos >= self.lines.len() || self.lines[self.pos].indent < indent {
                // trailing trivia belongs to the enclosing block
                self.pos = trivia_start;
                break;
            }
            if self.lines[self.pos].indent > indent {
                return Err(self.error_at(
                    self.pos,
                    "declaration at the enclosing indentation",
                    "unexpected indent",
                ));
            }

            let leading = self.raw_lines(trivia_start, self.pos);
            let line_idx = self.pos;
            let (member, signal_def) = self.parse_statement(indent, leading)?;
            self.push_member(
                &mut members,
                &mut names,
                member,
                signal_def,
                &mut last_signal_def,
                line_idx,
            )?;
        }
        Ok(members)
    }

    /// Append a member, grouping adjacent overloads and signal defs.
    fn push_member(
        &self,
        members: &mut Vec<Member>,
        names: &mut HashSet<String>,
        member: Member,
        signal_def: bool,
        last_signal_def: &mut bool,
        line_idx: usize,
    ) -> Result<(), ParseError> {
        let merge_signal = *last_signal_def && signal_def;
        let member = match (members.last_mut(), member) {
            (Some(Member::Signal(prev)), Member::Signal(next))
                if merge_signal && prev.name == next.name =>
            {
                merge_signal_defs(prev, next);
                return Ok(());
            }
            (Some(Member::Overloads(group)), Member::Method(next)) if group.name == next.name => {
                group.methods.push(next);
                return Ok(());
            }
            (Some(last @ Member::Method(_)), Member::Method(next))
                if last.name() == Some(next.name.as_str()) =>
            {
                let group = Member::Overloads(OverloadGroup {
                    name: next.name.clone(),
                    methods: Vec::new(),
                });
                let prev = std::mem::replace(last, group);
                if let (Member::Method(prev), Member::Overloads(group)) = (prev, last) {
                    group.methods.push(prev);
                    group.methods.push(next);
                }
                return Ok(());
            }
            (_, member) => member,
        };

        if let Some(name) = member.name() {
            if !names.insert(name.to_string()) {
                return Err(self.error_at(
                    line_idx,
                    "unique member name (overloads must be adjacent)",
                    format!("duplicate {} '{}'", member.kind_name(), name),
                ));
            }
        }
        *last_signal_def = signal_def;
        members.push(member);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    /// Parse the statement at `self.pos`; the bool is true for a def-form
    /// signal that may merge with the next one.
    fn parse_statement(
        &mut self,
        indent: usize,
        leading: Vec<String>,
    ) -> Result<(Member, bool), ParseError> {
        let start = self.pos;
        let code = self.lines[start].code.clone();

        if code.starts_with('@') {
            let decorators = self.parse_decorators(indent)?;
            let code = &self.lines[self.pos].code;
            if starts_with_keyword(code, "def") || starts_with_keyword(code, "async") {
                return self.parse_def(leading, start, decorators, indent);
            }
            if starts_with_keyword(code, "class") {
                return Ok((self.parse_class(leading, start, decorators, indent)?, false));
            }
            return Err(self.error_at(self.pos, "def or class after decorator", code.clone()));
        }
        if starts_with_keyword(&code, "def") || starts_with_keyword(&code, "async") {
            return self.parse_def(leading, start, Vec::new(), indent);
        }
        if starts_with_keyword(&code, "class") {
            return Ok((self.parse_class(leading, start, Vec::new(), indent)?, false));
        }
        if starts_with_keyword(&code, "import") || starts_with_keyword(&code, "from") {
            let import = parse_import(&code).map_err(|s| self.syntax_error(start, s))?;
            let comment = self.lines[start].comment.clone();
            self.pos += 1;
            let meta = self.meta(leading, comment, start);
            return Ok((Member::Import(ImportDecl { import, meta }), false));
        }
        if is_compound(&code) {
            let end = self.block_end(start + 1, indent);
            self.pos = end.max(start + 1);
            return Ok((self.verbatim(leading, start, indent), false));
        }
        if let Some(assign) = parse_assignment(&code) {
            let comment = self.lines[start].comment.clone();
            self.pos += 1;
            let meta = self.meta(leading, comment, start);
            let signal = assign
                .value
                .as_deref()
                .and_then(|value| split_call(value, &self.options.signal_markers));
            if let Some((marker, args)) = signal {
                let signal = Signal {
                    name: assign.name,
                    variants: call_variants(args)
                        .into_iter()
                        .map(|types| SignalVariant::new(&types))
                        .collect(),
                    returns: None,
                    marker: marker.to_string(),
                    meta,
                };
                return Ok((Member::Signal(signal), false));
            }
            return Ok((
                Member::Attribute(Attribute {
                    name: assign.name,
                    annotation: assign.annotation,
                    value: assign.value,
                    meta,
                }),
                false,
            ));
        }

        self.pos += 1;
        Ok((self.verbatim(leading, start, indent), false))
    }

    fn parse_decorators(&mut self, indent: usize) -> Result<Vec<Decorator>, ParseError> {
        let mut decorators = Vec::new();
        while self.pos < self.lines.len() {
            let line = &self.lines[self.pos];
            if line.kind == LineKind::Code {
                if line.indent != indent || !line.code.starts_with('@') {
                    return Ok(decorators);
                }
                decorators.push(Decorator {
                    expr: line.code[1..].trim().to_string(),
                    comment: line.comment.clone(),
                });
            }
            self.pos += 1;
        }
        let last = self.lines.len().saturating_sub(1);
        Err(self.error_at(last, "def or class after decorator", "end of file"))
    }

    fn parse_def(
        &mut self,
        leading: Vec<String>,
        first: usize,
        decorators: Vec<Decorator>,
        indent: usize,
    ) -> Result<(Member, bool), ParseError> {
        let header_idx = self.pos;
        let header = parse_def_header(&self.lines[header_idx].code)
            .map_err(|s| self.syntax_error(header_idx, s))?;
        let header_comment = self.lines[header_idx].comment.clone();
        self.pos += 1;

        let body = match header.inline_body {
            Some(text) => Body::Inline(text),
            None => self.parse_body(indent),
        };

        let marker = decorators
            .iter()
            .find(|d| self.options.signal_markers.iter().any(|m| m == d.name()));
        if let Some(marker) = marker {
            let variants = match marker.arguments() {
                Some(args) => call_variants(args)
                    .into_iter()
                    .map(|types| SignalVariant::new(&types))
                    .collect(),
                None => {
                    let params = header.signature.params.iter();
                    let skip = header
                        .signature
                        .params
                        .first()
                        .is_some_and(|p| p.name == "self" || p.name == "cls");
                    vec![SignalVariant {
                        types: params
                            .skip(usize::from(skip))
                            .filter(|p| !p.is_marker())
                            .map(|p| p.annotation.clone())
                            .collect(),
                    }]
                }
            };
            let comment = decorators
                .first()
                .and_then(|d| d.comment.clone())
                .or(header_comment);
            let signal = Signal {
                name: header.name,
                variants,
                returns: header.signature.returns,
                marker: marker.name().to_string(),
                meta: self.meta(leading, comment, first),
            };
            return Ok((Member::Signal(signal), true));
        }

        let method = Method {
            name: header.name,
            decorators,
            is_async: header.is_async,
            signature: header.signature,
            body,
            meta: self.meta(leading, header_comment, first),
        };
        Ok((Member::Method(method), false))
    }

    /// Consume an indented stub body; a missing body reads as `...`.
    fn parse_body(&mut self, indent: usize) -> Body {
        let end = self.block_end(self.pos, indent);
        let lines: Vec<String> = self.lines[self.pos..end]
            .iter()
            .filter(|l| l.kind == LineKind::Code)
            .map(|l| match &l.comment {
                Some(comment) => format!("{}  {}", l.code, comment),
                None => l.code.clone(),
            })
            .collect();
        self.pos = end;
        match lines.as_slice() {
            [] => Body::default(),
            [only] if only == "..." || only == "pass" => Body::Inline(only.clone()),
            _ => Body::Block(lines),
        }
    }

    fn parse_class(
        &mut self,
        leading: Vec<String>,
        first: usize,
        decorators: Vec<Decorator>,
        indent: usize,
    ) -> Result<Member, ParseError> {
        let header_idx = self.pos;
        let header = parse_class_header(&self.lines[header_idx].code)
            .map_err(|s| self.syntax_error(header_idx, s))?;
        let comment = self.lines[header_idx].comment.clone();
        self.pos += 1;
        let meta = self.meta(leading, comment, first);

        let mut inline_body = header.inline_body;
        let mut body = Vec::new();
        if inline_body.is_none() {
            let end = self.block_end(self.pos, indent);
            let body_indent = self.lines[self.pos..end]
                .iter()
                .find(|l| l.kind == LineKind::Code)
                .map(|l| l.indent);
            match body_indent {
                Some(body_indent) => body = self.parse_block(body_indent)?,
                None => inline_body = Some("...".to_string()),
            }
        }

        Ok(Member::Class(Class {
            name: header.name,
            bases: header.bases,
            decorators,
            body,
            inline_body,
            meta,
        }))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// One past the last code line indented deeper than `parent_indent`,
    /// starting at `from`. Trailing trivia is not included.
    fn block_end(&self, from: usize, parent_indent: usize) -> usize {
        let mut end = from;
        for (i, line) in self.lines.iter().enumerate().skip(from) {
            if line.kind == LineKind::Code {
                if line.indent <= parent_indent {
                    break;
                }
                end = i + 1;
            }
        }
        end
    }

    fn raw_lines(&self, from: usize, to: usize) -> Vec<String> {
        self.lines[from..to]
            .iter()
            .map(|l| l.raw.to_string())
            .collect()
    }

    /// Original text from line `from` up to `self.pos`.
    fn source(&self, from: usize) -> String {
        let start = self.lines[from].start;
        let end = self.lines[self.pos - 1].end();
        self.text[start..end].to_string()
    }

    fn meta(&self, leading: Vec<String>, comment: Option<String>, from: usize) -> Meta {
        Meta {
            leading,
            comment,
            source: Some(self.source(from)),
        }
    }

    fn verbatim(&self, leading: Vec<String>, from: usize, indent: usize) -> Member {
        let source = self.source(from);
        let lines = source
            .split_inclusive('\n')
            .map(|line| {
                let line = trim_line_ending(line);
                let strip = line
                    .char_indices()
                    .take(indent)
                    .take_while(|(_, c)| *c == ' ' || *c == '\t')
                    .map(|(i, c)| i + c.len_utf8())
                    .last()
                    .unwrap_or(0);
                line[strip..].to_string()
            })
            .collect();
        Member::Verbatim(Verbatim {
            lines,
            meta: Meta {
                leading,
                comment: None,
                source: Some(source),
            },
        })
    }

    fn error_at(&self, idx: usize, expected: &str, found: impl Into<String>) -> ParseError {
        match self.lines.get(idx) {
            Some(line) => ParseError::new(line.line, line.indent as u32 + 1, expected, found),
            None => ParseError::new(1, 1, expected, found),
        }
    }

    fn syntax_error(&self, idx: usize, syntax: Syntax) -> ParseError {
        let line = &self.lines[idx];
        let offset = line.start + line.indent + syntax.offset;
        let (line_no, col) = byte_offset_to_position(self.text, offset);
        let found: String = line
            .code
            .get(syntax.offset..)
            .unwrap_or("")
            .chars()
            .take(24)
            .collect();
        let found = if found.is_empty() {
            "end of line".to_string()
        } else {
            format!("'{}'", found)
        };
        ParseError::new(line_no, col, syntax.expected, found)
    }
}

fn merge_signal_defs(prev: &mut Signal, next: Signal) {
    prev.variants.extend(next.variants);
    if let (Some(source), Some(next_source)) = (prev.meta.source.as_mut(), next.meta.source) {
        for line in next.meta.leading {
            source.push_str(&line);
        }
        source.push_str(&next_source);
    }
}

// ============================================================================
// Tests
// ============================================================================
