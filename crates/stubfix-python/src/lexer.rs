//! Logical-line lexer for stub text.
//!
//! Splits a document into logical lines: physical lines joined across open
//! brackets, triple-quoted strings and backslash continuations. Each logical
//! line keeps its raw text (terminators included) so the writer can reproduce
//! untouched declarations byte for byte.

use stubfix_core::text::trim_line_ending;

use crate::error::ParseError;

/// Classification of a logical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    Code,
}

/// One logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine<'a> {
    /// All physical lines of this logical line, terminators included.
    pub raw: &'a str,
    /// Byte offset of `raw` in the document.
    pub start: usize,
    /// 1-indexed number of the first physical line.
    pub line: u32,
    /// Width of the leading whitespace of the first physical line.
    pub indent: usize,
    /// Joined code with comments removed and outer whitespace trimmed.
    pub code: String,
    /// Comment on the last physical line.
    pub comment: Option<String>,
    pub kind: LineKind,
}

impl LogicalLine<'_> {
    pub fn is_trivia(&self) -> bool {
        self.kind != LineKind::Code
    }

    /// Byte offset just past this line.
    pub fn end(&self) -> usize {
        self.start + self.raw.len()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct StringState {
    quote: char,
    triple: bool,
}

/// Split `text` into logical lines.
pub fn logical_lines(text: &str) -> Result<Vec<LogicalLine<'_>>, ParseError> {
    let physical: Vec<(usize, &str)> = text
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .collect();

    let mut lines = Vec::new();
    let mut i = 0;
    while i < physical.len() {
        let (start, first) = physical[i];
        let first_line = i as u32 + 1;
        let indent = first.len() - first.trim_start_matches([' ', '\t']).len();

        let mut code = String::new();
        let mut comment = None;
        let mut depth = 0usize;
        let mut string: Option<StringState> = None;
        let mut end = i;

        loop {
            let (_, phys) = physical[end];
            let content = trim_line_ending(phys);
            let resumed_in_string = string.is_some();
            let piece = scan_physical(content, &mut depth, &mut string, &mut comment);
            if resumed_in_string {
                code.push('\n');
                code.push_str(&piece);
            } else {
                join_piece(&mut code, piece.trim());
            }
            end += 1;

            let continued = match string {
                Some(state) if state.triple => true,
                Some(_) => {
                    // unterminated single-quoted string: let the declaration parser report it
                    string = None;
                    false
                }
                None => depth > 0 || code.ends_with('\\'),
            };
            if !continued {
                break;
            }
            if string.is_none() && depth == 0 {
                code.pop();
                let trimmed = code.trim_end().len();
                code.truncate(trimmed);
            }
            if string.is_none() {
                // comments inside a bracketed continuation are dropped
                comment = None;
            }
            if end >= physical.len() {
                let what = if string.is_some() {
                    "closing triple quote"
                } else if depth > 0 {
                    "closing bracket"
                } else {
                    "line after backslash continuation"
                };
                return Err(ParseError::new(
                    first_line,
                    indent as u32 + 1,
                    what,
                    "end of file",
                ));
            }
        }

        let raw_end = physical
            .get(end)
            .map(|(offset, _)| *offset)
            .unwrap_or(text.len());
        let code = code.trim().to_string();
        let kind = if !code.is_empty() {
            LineKind::Code
        } else if comment.is_some() {
            LineKind::Comment
        } else {
            LineKind::Blank
        };
        lines.push(LogicalLine {
            raw: &text[start..raw_end],
            start,
            line: first_line,
            indent,
            code,
            comment,
            kind,
        });
        i = end;
    }
    Ok(lines)
}

/// Scan one physical line, returning its code part and updating bracket
/// depth, string state and the trailing comment.
fn scan_physical(
    content: &str,
    depth: &mut usize,
    string: &mut Option<StringState>,
    comment: &mut Option<String>,
) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if let Some(state) = *string {
            out.push(c);
            if c == '\\' {
                if let Some((_, next)) = chars.next() {
                    out.push(next);
                }
                continue;
            }
            if c == state.quote {
                if !state.triple {
                    *string = None;
                } else if content[idx..].starts_with(&state.quote.to_string().repeat(3)) {
                    out.push(c);
                    out.push(c);
                    chars.next();
                    chars.next();
                    *string = None;
                }
            }
            continue;
        }
        match c {
            '#' => {
                *comment = Some(content[idx..].trim_end().to_string());
                break;
            }
            '\'' | '"' => {
                let triple = content[idx..].starts_with(&c.to_string().repeat(3));
                out.push(c);
                if triple {
                    out.push(c);
                    out.push(c);
                    chars.next();
                    chars.next();
                }
                *string = Some(StringState { quote: c, triple });
            }
            '(' | '[' | '{' => {
                *depth += 1;
                out.push(c);
            }
            ')' | ']' | '}' => {
                *depth = depth.saturating_sub(1);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Append a continuation piece, separating with one space except around
/// brackets.
fn join_piece(code: &mut String, piece: &str) {
    if piece.is_empty() {
        return;
    }
    let no_space = code.is_empty()
        || code.ends_with(['(', '[', '{'])
        || piece.starts_with([')', ']', '}', ',']);
    if !no_space {
        code.push(' ');
    }
    code.push_str(piece);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(text: &str) -> Vec<String> {
        logical_lines(text)
            .unwrap()
            .into_iter()
            .map(|l| l.code)
            .collect()
    }

    #[test]
    fn simple_lines_and_kinds() {
        let lines = logical_lines("import typing\n\n# note\nx: int  # trailing\n").unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].kind, LineKind::Code);
        assert_eq!(lines[1].kind, LineKind::Blank);
        assert_eq!(lines[2].kind, LineKind::Comment);
        assert_eq!(lines[3].code, "x: int");
        assert_eq!(lines[3].comment.as_deref(), Some("# trailing"));
        assert_eq!(lines[3].line, 4);
    }

    #[test]
    fn joins_bracket_continuations() {
        let text = "def f(self,\n      a: int,\n      ) -> None: ...\n";
        let lines = logical_lines(text).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].code, "def f(self, a: int,) -> None: ...");
        assert_eq!(lines[0].raw, text);
    }

    #[test]
    fn comments_inside_brackets_are_dropped() {
        let text = "x = (1,  # one\n     2)  # tail\n";
        let lines = logical_lines(text).unwrap();
        assert_eq!(lines[0].code, "x = (1, 2)");
        assert_eq!(lines[0].comment.as_deref(), Some("# tail"));
    }

    #[test]
    fn joins_backslash_continuations() {
        assert_eq!(codes("x = 1 + \\\n    2\n"), vec!["x = 1 + 2"]);
    }

    #[test]
    fn keeps_triple_quoted_strings_verbatim() {
        let text = "def f(): \"\"\"doc\n    more # not a comment\n\"\"\"\ny = 1\n";
        let lines = logical_lines(text).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0].code,
            "def f(): \"\"\"doc\n    more # not a comment\n\"\"\""
        );
        assert_eq!(lines[0].comment, None);
        assert_eq!(lines[1].line, 4);
    }

    #[test]
    fn hash_inside_string_is_not_a_comment() {
        let lines = logical_lines("x = '#'  # real\n").unwrap();
        assert_eq!(lines[0].code, "x = '#'");
        assert_eq!(lines[0].comment.as_deref(), Some("# real"));
    }

    #[test]
    fn crlf_is_handled() {
        let text = "class A:\r\n    x: int\r\n";
        let lines = logical_lines(text).unwrap();
        assert_eq!(lines[0].code, "class A:");
        assert_eq!(lines[1].indent, 4);
        assert_eq!(lines[1].raw, "    x: int\r\n");
    }

    #[test]
    fn unterminated_bracket_is_an_error() {
        let err = logical_lines("\ndef f(self,\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.col, 1);
        assert!(err.expected.contains("closing bracket"));
    }

    #[test]
    fn missing_final_newline() {
        let lines = logical_lines("x: int").unwrap();
        assert_eq!(lines[0].raw, "x: int");
        assert_eq!(lines[0].end(), 6);
    }
}
