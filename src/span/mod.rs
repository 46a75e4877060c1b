//! File URIs, source positions and the column mapper.
//!
//! Diagnostics produced by this crate carry a [`SourceRange`] that is only
//! meaningful inside the coordinate space of one file. A [`ColumnMapper`] is
//! built from the exact bytes a range was computed against, so converting a
//! `line:column` pair or a byte offset into a range can be validated against
//! that content before a diagnostic is emitted.
//!
//! Lines and columns are 1-based; columns count characters, matching the
//! positions the `go` command and the manifest parser print in their error
//! messages. Offsets count bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies a file by path.
///
/// Paths are kept as given. Relative paths (for example the `go.mod:3:1`
/// prefix of a `go` command error) are resolved by the [`FileSource`]
/// that serves them.
///
/// [`FileSource`]: crate::source::FileSource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uri(PathBuf);

impl Uri {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// The path rendered as a string, used when handing the filename to the
    /// manifest parser so that its errors carry the same path back.
    pub fn filename(&self) -> String {
        self.0.display().to_string()
    }

    /// Directory containing the file, or the empty path for a bare filename.
    pub fn dir(&self) -> &Path {
        self.0.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn is_relative(&self) -> bool {
        self.0.is_relative()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&Path> for Uri {
    fn from(path: &Path) -> Self {
        Self::from_path(path)
    }
}

impl From<PathBuf> for Uri {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

/// A position inside one file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// 1-based line number.
    pub line: u32,
    /// 1-based character column.
    pub column: u32,
    /// 0-based byte offset from the start of the file.
    pub offset: usize,
}

/// A half-open range between two [`Point`]s of the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Point,
    pub end: Point,
}

impl SourceRange {
    pub const fn point(point: Point) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.start.offset == self.end.offset
    }
}

/// Converts between byte offsets and `line:column` positions for one file.
#[derive(Debug, Clone)]
pub struct ColumnMapper {
    uri: Uri,
    content: Arc<[u8]>,
    line_starts: Vec<usize>,
}

impl ColumnMapper {
    pub fn new(uri: Uri, content: Arc<[u8]>) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            content.iter().enumerate().filter(|(_, b)| **b == b'\n').map(|(i, _)| i + 1),
        );
        Self {
            uri,
            content,
            line_starts,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Bytes of `line` (1-based) without its line terminator.
    fn line_bytes(&self, line: u32) -> Option<&[u8]> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        let start = *self.line_starts.get(index)?;
        let end = match self.line_starts.get(index + 1) {
            Some(next) => next - 1,
            None => self.content.len(),
        };
        let end = if end > start && self.content[end - 1] == b'\r' {
            end - 1
        } else {
            end
        };
        self.content.get(start..end)
    }

    /// Validates a `line:column` pair and finds its byte offset. The column
    /// may point one past the last character of the line.
    pub fn point(&self, line: u32, column: u32) -> Option<Point> {
        let bytes = self.line_bytes(line)?;
        let column_index = usize::try_from(column).ok()?.checked_sub(1)?;
        let byte_index = match std::str::from_utf8(bytes) {
            Ok(text) => text
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(text.len()))
                .nth(column_index)?,
            // Not UTF-8: fall back to one column per byte.
            Err(_) => Some(column_index).filter(|i| *i <= bytes.len())?,
        };
        let start = self.line_starts[(line - 1) as usize];
        Some(Point {
            line,
            column,
            offset: start + byte_index,
        })
    }

    pub fn point_at_offset(&self, offset: usize) -> Option<Point> {
        if offset > self.content.len() {
            return None;
        }
        let index = self.line_starts.partition_point(|start| *start <= offset) - 1;
        let start = self.line_starts[index];
        let prefix = &self.content[start..offset];
        let columns = std::str::from_utf8(prefix).map_or(prefix.len(), |text| text.chars().count());
        Some(Point {
            line: u32::try_from(index + 1).ok()?,
            column: u32::try_from(columns + 1).ok()?,
            offset,
        })
    }

    /// An empty range at `line:column`; a missing column means the start of
    /// the line.
    pub fn range(&self, line: u32, column: Option<u32>) -> Option<SourceRange> {
        self.point(line, column.unwrap_or(1)).map(SourceRange::point)
    }

    pub fn range_from_offsets(&self, start: usize, end: usize) -> Option<SourceRange> {
        if start > end {
            return None;
        }
        Some(SourceRange {
            start: self.point_at_offset(start)?,
            end: self.point_at_offset(end)?,
        })
    }

    /// The text covered by `range`, if it lies in this file and is UTF-8.
    pub fn text(&self, range: &SourceRange) -> Option<&str> {
        let bytes = self.content.get(range.start.offset..range.end.offset)?;
        std::str::from_utf8(bytes).ok()
    }
}

/// A `path:line[:column]` position parsed out of tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanPosition {
    pub path: String,
    pub line: u32,
    pub column: Option<u32>,
}

/// Parses `path:line:column` or `path:line`, splitting from the right so
/// that paths containing colons survive.
pub fn parse_position(pos: &str) -> Option<SpanPosition> {
    let mut parts = pos.rsplitn(3, ':');
    let last_text = parts.next()?;
    let middle = parts.next()?;
    let rest = parts.next();

    let last: u32 = last_text.parse().ok()?;
    let position = match (middle.parse::<u32>(), rest) {
        (Ok(line), Some(path)) if !path.is_empty() => SpanPosition {
            path: path.to_string(),
            line,
            column: Some(last),
        },
        _ => {
            let path = &pos[..pos.len() - last_text.len() - 1];
            if path.is_empty() {
                return None;
            }
            SpanPosition {
                path: path.to_string(),
                line: last,
                column: None,
            }
        }
    };
    if position.line == 0 || position.column == Some(0) {
        return None;
    }
    Some(position)
}
