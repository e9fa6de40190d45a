//! Text position and line-ending utilities.
//!
//! Lines and columns are **1-indexed**; byte offsets are **0-indexed**.
//! Columns count Unicode scalar values, not bytes, so positions reported in
//! diagnostics line up with what an editor shows.

/// Convert a byte offset into 1-indexed line and column.
///
/// If `offset` exceeds the content length, returns the position at the end
/// of the content.
pub fn byte_offset_to_position(content: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 1u32;
    let mut current_offset = 0usize;

    for ch in content.chars() {
        if current_offset >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
        current_offset += ch.len_utf8();
    }

    (line, col)
}

/// Line terminator used by a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Detect from the first line break; documents without one are `Lf`.
    pub fn detect(content: &str) -> Self {
        match content.find('\n') {
            Some(i) if content[..i].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Strip one trailing `\n` or `\r\n`.
pub fn trim_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}
