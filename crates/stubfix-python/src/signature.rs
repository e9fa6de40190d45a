//! Declaration-line parsers.
//!
//! Each function here parses the code of one logical line (comments already
//! stripped by the lexer) or a rule payload. Grammar:
//!
//! ```text
//! <def>        := ["async"] "def" NAME "(" <params> ")" ["->" <type>] ":" [<inline body>]
//! <class>      := "class" NAME ["(" <bases> ")"] ":" [<inline body>]
//! <param>      := ("*" | "**" | "/") | ["*" | "**"] NAME [":" <type>] ["=" <default>]
//! <import>     := "import" <names> | "from" DOTTED "import" ("(" <names> ")" | <names>)
//! <assignment> := NAME [":" <type>] ["=" <value>]
//! ```
//!
//! Types, defaults and values are captured as bracket-balanced text, never
//! interpreted.

use winnow::ascii::{multispace0, space1};
use winnow::combinator::{alt, delimited, not, opt, preceded};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;
use winnow::token::{one_of, rest, take_while};
use winnow::ModalResult;

use crate::error::SignatureError;
use crate::model::{Import, ImportName, Param, ParamKind, Signature};

/// Failure inside one logical line: byte offset into the code and what was
/// expected there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syntax {
    pub offset: usize,
    pub expected: &'static str,
}

// ============================================================================
// Balanced scanning
// ============================================================================

/// Byte index of the first character in `stops` that sits outside brackets
/// and string literals, or `text.len()`.
pub fn scan_balanced(text: &str, stops: &[char]) -> usize {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if depth == 0 && stops.contains(&c) {
            return i;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    text.len()
}

/// Split on top-level `sep`, trimming pieces and dropping empty ones (a
/// trailing comma yields no extra piece).
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    loop {
        let at = scan_balanced(remaining, &[sep]);
        let piece = remaining[..at].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        if at >= remaining.len() {
            break;
        }
        remaining = &remaining[at + sep.len_utf8()..];
    }
    pieces
}

// ============================================================================
// Primitive parsers
// ============================================================================

fn identifier<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        one_of(|c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn dotted_name<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '.').parse_next(input)
}

/// Bracket-balanced text up to (not including) a top-level stop character.
fn balanced<'s>(stops: &'static [char]) -> impl FnMut(&mut &'s str) -> ModalResult<&'s str> {
    move |input: &mut &'s str| {
        let n = scan_balanced(input, stops);
        Ok(input.next_slice(n).trim())
    }
}

fn param(input: &mut &str) -> ModalResult<Param> {
    let _ = multispace0.parse_next(input)?;
    let prefix = opt(alt(("**", "*", "/"))).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let (kind, name) = match prefix {
        Some("/") => return Ok(marker(ParamKind::PositionalOnlyMarker)),
        Some("**") => (ParamKind::VarKeyword, identifier.parse_next(input)?),
        Some(_) => match opt(identifier).parse_next(input)? {
            Some(name) => (ParamKind::VarPositional, name),
            None => return Ok(marker(ParamKind::KeywordOnlyMarker)),
        },
        None => (ParamKind::Regular, identifier.parse_next(input)?),
    };
    let _ = multispace0.parse_next(input)?;
    let annotation = opt(preceded(':', balanced(&['=']))).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let default = opt(preceded('=', balanced(&[]))).parse_next(input)?;
    if annotation == Some("") || default == Some("") {
        return Err(ErrMode::from_input(input));
    }
    Ok(Param {
        name: name.to_string(),
        kind,
        annotation: annotation.map(str::to_string),
        default: default.map(str::to_string),
    })
}

fn marker(kind: ParamKind) -> Param {
    Param {
        name: String::new(),
        kind,
        annotation: None,
        default: None,
    }
}

/// `"(" params ")" ["->" returns]`, returns stop at a top-level `:`.
fn signature_parts<'s>(input: &mut &'s str) -> ModalResult<(&'s str, Option<&'s str>)> {
    let _ = multispace0.parse_next(input)?;
    let params = delimited('(', balanced(&[')']), ')').parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let returns = opt(preceded("->", balanced(&[':']))).parse_next(input)?;
    Ok((params, returns))
}

fn build_signature(params: &str, returns: Option<&str>) -> Result<Signature, &'static str> {
    let params = split_top_level(params, ',')
        .into_iter()
        .map(|piece| param.parse(piece).map_err(|_| "parameter"))
        .collect::<Result<Vec<_>, _>>()?;
    let returns = match returns {
        Some("") => return Err("return annotation"),
        other => other.map(str::to_string),
    };
    Ok(Signature { params, returns })
}

// ============================================================================
// Declarations
// ============================================================================

/// Parsed `def` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefHeader {
    pub is_async: bool,
    pub name: String,
    pub signature: Signature,
    /// Text after the colon, if the body is on the header line.
    pub inline_body: Option<String>,
}

struct RawDef<'s> {
    is_async: bool,
    name: &'s str,
    params: &'s str,
    returns: Option<&'s str>,
    body: &'s str,
}

fn def_header<'s>(input: &mut &'s str) -> ModalResult<RawDef<'s>> {
    let is_async = opt(("async", space1)).parse_next(input)?.is_some();
    let _ = ("def", space1).parse_next(input)?;
    let name = identifier.parse_next(input)?;
    let (params, returns) = signature_parts.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let _ = ':'.parse_next(input)?;
    let body = rest.parse_next(input)?;
    Ok(RawDef {
        is_async,
        name,
        params,
        returns,
        body: body.trim(),
    })
}

pub fn parse_def_header(code: &str) -> Result<DefHeader, Syntax> {
    let raw = def_header.parse(code).map_err(|e| Syntax {
        offset: e.offset(),
        expected: "function definition `def name(params) [-> type]:`",
    })?;
    let signature = build_signature(raw.params, raw.returns).map_err(|what| Syntax {
        offset: code.find('(').unwrap_or(0),
        expected: what,
    })?;
    Ok(DefHeader {
        is_async: raw.is_async,
        name: raw.name.to_string(),
        signature,
        inline_body: (!raw.body.is_empty()).then(|| raw.body.to_string()),
    })
}

/// Parsed `class` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub name: String,
    pub bases: Vec<String>,
    pub inline_body: Option<String>,
}

fn class_header<'s>(input: &mut &'s str) -> ModalResult<(&'s str, Option<&'s str>, &'s str)> {
    let _ = ("class", space1).parse_next(input)?;
    let name = identifier.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let bases = opt(delimited('(', balanced(&[')']), ')')).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let _ = ':'.parse_next(input)?;
    let body = rest.parse_next(input)?;
    Ok((name, bases, body.trim()))
}

pub fn parse_class_header(code: &str) -> Result<ClassHeader, Syntax> {
    let (name, bases, body) = class_header.parse(code).map_err(|e| Syntax {
        offset: e.offset(),
        expected: "class definition `class Name[(bases)]:`",
    })?;
    Ok(ClassHeader {
        name: name.to_string(),
        bases: bases
            .map(|b| split_top_level(b, ',').into_iter().map(str::to_string).collect())
            .unwrap_or_default(),
        inline_body: (!body.is_empty()).then(|| body.to_string()),
    })
}

fn import_name(input: &mut &str) -> ModalResult<ImportName> {
    let name = alt(("*", dotted_name)).parse_next(input)?;
    let alias = opt(preceded((space1, "as", space1), identifier)).parse_next(input)?;
    Ok(ImportName {
        name: name.to_string(),
        alias: alias.map(str::to_string),
    })
}

fn import_names(text: &str) -> ModalResult<Vec<ImportName>> {
    let names = split_top_level(text, ',')
        .into_iter()
        .map(|piece| import_name.parse(piece).map_err(|_| ErrMode::from_input(&piece)))
        .collect::<ModalResult<Vec<_>>>()?;
    if names.is_empty() {
        return Err(ErrMode::from_input(&text));
    }
    Ok(names)
}

fn from_import(input: &mut &str) -> ModalResult<Import> {
    let _ = ("from", space1).parse_next(input)?;
    let module = dotted_name.parse_next(input)?;
    let _ = (space1, "import", multispace0).parse_next(input)?;
    let names = alt((delimited('(', balanced(&[')']), ')'), rest)).parse_next(input)?;
    Ok(Import::From {
        module: module.to_string(),
        names: import_names(names)?,
    })
}

fn plain_import(input: &mut &str) -> ModalResult<Import> {
    let _ = ("import", space1).parse_next(input)?;
    let names = rest.parse_next(input)?;
    Ok(Import::Plain(import_names(names)?))
}

pub fn parse_import(code: &str) -> Result<Import, Syntax> {
    alt((from_import, plain_import))
        .parse(code)
        .map_err(|e| Syntax {
            offset: e.offset(),
            expected: "import statement",
        })
}

/// `NAME [: annotation] [= value]` with at least one of the two parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub annotation: Option<String>,
    pub value: Option<String>,
}

fn assignment<'s>(input: &mut &'s str) -> ModalResult<(&'s str, Option<&'s str>, Option<&'s str>)> {
    let name = identifier.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let annotation = opt(preceded(':', balanced(&['=']))).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let value = opt(preceded(('=', not('=')), rest)).parse_next(input)?;
    if annotation.is_none() && value.is_none() {
        return Err(ErrMode::from_input(input));
    }
    Ok((name, annotation, value.map(str::trim)))
}

/// Returns `None` if the line is not a simple (annotated) assignment.
pub fn parse_assignment(code: &str) -> Option<Assignment> {
    let (name, annotation, value) = assignment.parse(code).ok()?;
    if annotation == Some("") || value == Some("") {
        return None;
    }
    Some(Assignment {
        name: name.to_string(),
        annotation: annotation.map(str::to_string),
        value: value.map(str::to_string),
    })
}

// ============================================================================
// Payloads
// ============================================================================

/// Parse a `(params) [-> returns]` payload.
pub fn parse_signature(text: &str) -> Result<Signature, SignatureError> {
    let error = |offset| SignatureError {
        what: "signature",
        text: text.to_string(),
        offset,
    };
    let (params, returns) = signature_parts
        .parse(text.trim())
        .map_err(|e| error(e.offset()))?;
    build_signature(params, returns).map_err(|_| error(0))
}

/// Split a call expression `callee(args)` if `callee` is one of `names`.
pub fn split_call<'s>(expr: &'s str, names: &[String]) -> Option<(&'s str, &'s str)> {
    let open = expr.find('(')?;
    let callee = expr[..open].trim();
    if !names.iter().any(|n| n == callee) {
        return None;
    }
    let after = &expr[open + 1..];
    let close = scan_balanced(after, &[')']);
    if close >= after.len() || !after[close + 1..].trim().is_empty() {
        return None;
    }
    Some((callee, &after[..close]))
}

fn is_keyword_argument(arg: &str) -> bool {
    let mut input = arg;
    (identifier, multispace0, '=', not('='))
        .parse_next(&mut input)
        .is_ok()
}

/// Signal variants described by call arguments.
///
/// `(int, str)` is one variant; `([int], [int, str])` is one variant per
/// list. Keyword arguments (`name=`, `arguments=`) are ignored.
pub fn call_variants(args: &str) -> Vec<Vec<String>> {
    let positional: Vec<&str> = split_top_level(args, ',')
        .into_iter()
        .filter(|a| !is_keyword_argument(a))
        .collect();
    let all_lists = !positional.is_empty()
        && positional
            .iter()
            .all(|a| a.starts_with('[') && a.ends_with(']'));
    if all_lists {
        positional
            .iter()
            .map(|a| {
                split_top_level(&a[1..a.len() - 1], ',')
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    } else {
        vec![positional.into_iter().map(str::to_string).collect()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod scan_tests {
        use super::*;

        #[test]
        fn respects_brackets_and_strings() {
            assert_eq!(scan_balanced("a[b, c], d", &[',']), 7);
            assert_eq!(scan_balanced("'a,b', c", &[',']), 5);
            assert_eq!(scan_balanced("abc", &[',']), 3);
        }

        #[test]
        fn split_drops_trailing_comma() {
            assert_eq!(
                split_top_level("self, a: Dict[str, int], ", ','),
                vec!["self", "a: Dict[str, int]"]
            );
            assert!(split_top_level("  ", ',').is_empty());
        }
    }

    mod def_tests {
        use super::*;

        #[test]
        fn parses_full_header() {
            let header =
                parse_def_header("def setText(self, a0: str) -> None: ...").unwrap();
            assert_eq!(header.name, "setText");
            assert!(!header.is_async);
            assert_eq!(header.signature.params.len(), 2);
            assert_eq!(header.signature.params[1].annotation.as_deref(), Some("str"));
            assert_eq!(header.signature.returns.as_deref(), Some("None"));
            assert_eq!(header.inline_body.as_deref(), Some("..."));
        }

        #[test]
        fn parses_param_kinds_and_defaults() {
            let header = parse_def_header(
                "async def f(a, /, b: int = 1, *args: typing.Any, c=None, **kw: str):",
            )
            .unwrap();
            assert!(header.is_async);
            let kinds: Vec<_> = header.signature.params.iter().map(|p| p.kind).collect();
            assert_eq!(
                kinds,
                vec![
                    ParamKind::Regular,
                    ParamKind::PositionalOnlyMarker,
                    ParamKind::Regular,
                    ParamKind::VarPositional,
                    ParamKind::Regular,
                    ParamKind::VarKeyword,
                ]
            );
            assert_eq!(header.signature.params[2].default.as_deref(), Some("1"));
            assert_eq!(header.signature.params[4].default.as_deref(), Some("None"));
            assert_eq!(header.signature.returns, None);
            assert_eq!(header.inline_body, None);
        }

        #[test]
        fn keyword_only_marker() {
            let header = parse_def_header("def f(self, *, name: str) -> None: ...").unwrap();
            assert_eq!(header.signature.params[1].kind, ParamKind::KeywordOnlyMarker);
            assert_eq!(header.signature.arity(), 2);
        }

        #[test]
        fn nested_brackets_in_annotations() {
            let header = parse_def_header(
                "def connect(self, slot: typing.Callable[[int, str], None] = ...) -> 'QMetaObject.Connection': ...",
            )
            .unwrap();
            assert_eq!(
                header.signature.params[1].annotation.as_deref(),
                Some("typing.Callable[[int, str], None]")
            );
            assert_eq!(
                header.signature.returns.as_deref(),
                Some("'QMetaObject.Connection'")
            );
        }

        #[test]
        fn rejects_missing_colon() {
            let err = parse_def_header("def f(self) -> None").unwrap_err();
            assert!(err.expected.contains("function definition"));
        }

        #[test]
        fn rejects_bad_parameter() {
            let err = parse_def_header("def f(self, 1x) -> None: ...").unwrap_err();
            assert_eq!(err.expected, "parameter");
            assert_eq!(err.offset, 5);
        }
    }

    mod class_tests {
        use super::*;

        #[test]
        fn parses_bases() {
            let header = parse_class_header("class QWidget(QObject, QPaintDevice):").unwrap();
            assert_eq!(header.name, "QWidget");
            assert_eq!(header.bases, vec!["QObject", "QPaintDevice"]);
            assert_eq!(header.inline_body, None);
        }

        #[test]
        fn inline_body_without_bases() {
            let header = parse_class_header("class Flag: ...").unwrap();
            assert!(header.bases.is_empty());
            assert_eq!(header.inline_body.as_deref(), Some("..."));
        }
    }

    mod import_tests {
        use super::*;

        #[test]
        fn from_import_with_parens_and_alias() {
            let import = parse_import("from PyQt6 import (QtCore, sip as _sip,)").unwrap();
            match import {
                Import::From { module, names } => {
                    assert_eq!(module, "PyQt6");
                    assert_eq!(names.len(), 2);
                    assert_eq!(names[1].alias.as_deref(), Some("_sip"));
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        #[test]
        fn plain_import() {
            let import = parse_import("import typing, collections.abc as abc").unwrap();
            assert_eq!(
                import,
                Import::Plain(vec![
                    ImportName {
                        name: "typing".to_string(),
                        alias: None
                    },
                    ImportName {
                        name: "collections.abc".to_string(),
                        alias: Some("abc".to_string())
                    },
                ])
            );
        }

        #[test]
        fn relative_and_star_imports() {
            assert!(parse_import("from .QtCore import *").is_ok());
            assert!(parse_import("import").is_err());
        }
    }

    mod assignment_tests {
        use super::*;

        #[test]
        fn annotated_and_plain() {
            let a = parse_assignment("PYQT_SLOT = typing.Union[typing.Callable[..., None], int]")
                .unwrap();
            assert_eq!(a.name, "PYQT_SLOT");
            assert_eq!(a.annotation, None);
            assert!(a.value.unwrap().starts_with("typing.Union"));

            let b = parse_assignment("staticMetaObject: QMetaObject").unwrap();
            assert_eq!(b.annotation.as_deref(), Some("QMetaObject"));
            assert_eq!(b.value, None);

            let c = parse_assignment("x: int = 3").unwrap();
            assert_eq!(c.value.as_deref(), Some("3"));
        }

        #[test]
        fn non_assignments() {
            assert_eq!(parse_assignment("..."), None);
            assert_eq!(parse_assignment("pass"), None);
            assert_eq!(parse_assignment("__all__ += ['x']"), None);
            assert_eq!(parse_assignment("a == b"), None);
            assert_eq!(parse_assignment("x.y = 1"), None);
        }
    }

    mod payload_tests {
        use super::*;

        #[test]
        fn signature_payload() {
            let sig = parse_signature("(self, size: int = -1) -> array[int]").unwrap();
            assert_eq!(sig.arity(), 2);
            assert_eq!(sig.to_string(), "(self, size: int = -1) -> array[int]");
        }

        #[test]
        fn signature_payload_errors() {
            assert!(parse_signature("self, a").is_err());
            assert!(parse_signature("(self) ->").is_err());
        }

        #[test]
        fn split_call_checks_callee() {
            let markers = vec!["pyqtSignal".to_string()];
            assert_eq!(
                split_call("pyqtSignal(int, str)", &markers),
                Some(("pyqtSignal", "int, str"))
            );
            assert_eq!(split_call("Signal(int)", &markers), None);
            assert_eq!(split_call("pyqtSignal(int).x", &markers), None);
        }

        #[test]
        fn call_variants_shapes() {
            assert_eq!(call_variants("int, str"), vec![vec!["int", "str"]]);
            assert_eq!(
                call_variants("[int], [int, str], name='changed'"),
                vec![vec!["int".to_string()], vec!["int".to_string(), "str".to_string()]]
            );
            assert_eq!(call_variants(""), vec![Vec::<String>::new()]);
            assert_eq!(call_variants("[]"), vec![Vec::<String>::new()]);
        }
    }
}
