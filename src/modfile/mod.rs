//! A parser for `go.mod` module manifests.
//!
//! The parser covers the directives a manifest cache needs to understand:
//! `module`, `go`, `toolchain`, `require`, `exclude`, `replace` and
//! `retract`, in both single-line and `( ... )` block form. `godebug`,
//! `tool` and `ignore` are accepted and skipped.
//!
//! Every statement keeps the [`Line`] it was parsed from, including start
//! and end [`Position`]s, so that diagnostics can later be attached to the
//! exact source span of a requirement, exclusion, replacement or module
//! declaration.
//!
//! Errors render the way the `go` command renders them:
//! `<file>:<line>:<column>: <message>`, with the column omitted when it is 1.
//!
//! ```rust
//! use modcache::modfile;
//!
//! let file = modfile::parse("go.mod", b"module example.com/a\n\nrequire golang.org/x/mod v0.4.0\n").unwrap();
//! assert_eq!(file.module.unwrap().path, "example.com/a");
//! assert_eq!(file.require[0].module.version, "v0.4.0");
//! ```

pub mod module;
pub mod sum;

pub use module::{ModuleError, ModuleVersion};

use std::fmt;

/// A location in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// 1-based line.
    pub line: u32,
    /// 1-based column counted in characters.
    pub line_rune: u32,
    /// 0-based byte offset from the start of the file.
    pub byte: usize,
}

/// The source line a statement was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub start: Position,
    pub end: Position,
    pub tokens: Vec<String>,
    /// Trailing `//` comment, trimmed.
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStmt {
    pub path: String,
    pub syntax: Line,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoStmt {
    pub version: String,
    pub syntax: Line,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub name: String,
    pub syntax: Line,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub module: ModuleVersion,
    /// Marked `// indirect`.
    pub indirect: bool,
    pub syntax: Line,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclude {
    pub module: ModuleVersion,
    pub syntax: Line,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    /// Version is empty when the replacement applies to every version.
    pub old: ModuleVersion,
    /// Version is empty when the replacement is a local directory.
    pub new: ModuleVersion,
    pub syntax: Line,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retract {
    pub low: String,
    pub high: String,
    pub rationale: String,
    pub syntax: Line,
}

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModFile {
    pub module: Option<ModuleStmt>,
    pub go: Option<GoStmt>,
    pub toolchain: Option<Toolchain>,
    pub require: Vec<Require>,
    pub exclude: Vec<Exclude>,
    pub replace: Vec<Replace>,
    pub retract: Vec<Retract>,
}

/// A grammar error at a position in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub filename: String,
    pub pos: Position,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pos.line_rune > 1 {
            write!(f, "{}:{}:{}: {}", self.filename, self.pos.line, self.pos.line_rune, self.message)
        } else if self.pos.line > 0 {
            write!(f, "{}:{}: {}", self.filename, self.pos.line, self.message)
        } else {
            write!(f, "{}: {}", self.filename, self.message)
        }
    }
}

impl std::error::Error for ParseError {}

const BLOCK_VERBS: &[&str] = &["require", "exclude", "replace", "retract", "godebug", "tool", "ignore"];

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
    start: Position,
    end: Position,
}

impl Token {
    fn is(&self, punct: &str) -> bool {
        !self.quoted && self.text == punct
    }
}

#[derive(Debug)]
struct LexedLine {
    tokens: Vec<Token>,
    comment: Option<String>,
}

impl LexedLine {
    fn to_line(&self) -> Line {
        let start = self.tokens.first().map(|t| t.start).unwrap_or_default();
        let end = self.tokens.last().map(|t| t.end).unwrap_or_default();
        Line {
            start,
            end,
            tokens: self.tokens.iter().map(|t| t.text.clone()).collect(),
            comment: self.comment.clone(),
        }
    }
}

struct Parser<'a> {
    filename: &'a str,
    file: ModFile,
}

impl Parser<'_> {
    fn error(&self, pos: Position, message: impl Into<String>) -> ParseError {
        ParseError {
            filename: self.filename.to_string(),
            pos,
            message: message.into(),
        }
    }

    fn lex_line(&self, line: u32, line_start: usize, text: &str) -> Result<LexedLine, ParseError> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let pos_at = |k: usize| Position {
            line,
            line_rune: k as u32 + 1,
            byte: line_start + chars.get(k).map_or(text.len(), |(i, _)| *i),
        };

        let mut tokens = Vec::new();
        let mut comment = None;
        let mut k = 0;
        while k < chars.len() {
            let (i, c) = chars[k];
            let rest = &text[i..];
            if c.is_whitespace() {
                k += 1;
            } else if rest.starts_with("//") {
                comment = Some(rest[2..].trim().to_string());
                break;
            } else if c == '(' || c == ')' {
                tokens.push(Token {
                    text: c.to_string(),
                    quoted: false,
                    start: pos_at(k),
                    end: pos_at(k + 1),
                });
                k += 1;
            } else if rest.starts_with("=>") {
                tokens.push(Token {
                    text: "=>".to_string(),
                    quoted: false,
                    start: pos_at(k),
                    end: pos_at(k + 2),
                });
                k += 2;
            } else if c == '"' || c == '`' {
                let start = k;
                let mut value = String::new();
                let mut closed = false;
                k += 1;
                while k < chars.len() {
                    let d = chars[k].1;
                    if d == c {
                        closed = true;
                        k += 1;
                        break;
                    }
                    if c == '"' && d == '\\' {
                        if let Some((_, escaped)) = chars.get(k + 1) {
                            value.push(*escaped);
                            k += 2;
                            continue;
                        }
                    }
                    value.push(d);
                    k += 1;
                }
                if !closed {
                    return Err(self.error(pos_at(start), "unterminated quoted string"));
                }
                tokens.push(Token {
                    text: value,
                    quoted: true,
                    start: pos_at(start),
                    end: pos_at(k),
                });
            } else {
                let start = k;
                while k < chars.len() {
                    let (j, d) = chars[k];
                    let rest = &text[j..];
                    if d.is_whitespace()
                        || matches!(d, '(' | ')' | '"' | '`')
                        || rest.starts_with("//")
                        || rest.starts_with("=>")
                    {
                        break;
                    }
                    k += 1;
                }
                tokens.push(Token {
                    text: text[chars[start].0..chars.get(k).map_or(text.len(), |(j, _)| *j)]
                        .to_string(),
                    quoted: false,
                    start: pos_at(start),
                    end: pos_at(k),
                });
            }
        }
        Ok(LexedLine {
            tokens,
            comment,
        })
    }

    fn statement(&mut self, verb: &str, args: &[String], line: Line) -> Result<(), ParseError> {
        let usage = |parser: &Self, text: &str| parser.error(line.start, format!("usage: {text}"));
        match verb {
            "module" => {
                if args.len() != 1 {
                    return Err(usage(self, "module module/path"));
                }
                if self.file.module.is_some() {
                    return Err(self.error(line.start, "repeated module statement"));
                }
                self.file.module = Some(ModuleStmt {
                    path: args[0].clone(),
                    syntax: line,
                });
            }
            "go" => {
                if args.len() != 1 {
                    return Err(usage(self, "go 1.23"));
                }
                if self.file.go.is_some() {
                    return Err(self.error(line.start, "repeated go statement"));
                }
                if !is_valid_go_version(&args[0]) {
                    return Err(self.error(
                        line.start,
                        format!("invalid go version '{}': must match format 1.23.0", args[0]),
                    ));
                }
                self.file.go = Some(GoStmt {
                    version: args[0].clone(),
                    syntax: line,
                });
            }
            "toolchain" => {
                if args.len() != 1 {
                    return Err(usage(self, "toolchain go1.23.0"));
                }
                self.file.toolchain = Some(Toolchain {
                    name: args[0].clone(),
                    syntax: line,
                });
            }
            "require" | "exclude" => {
                if args.len() != 2 {
                    return Err(usage(self, &format!("{verb} module/path v1.2.3")));
                }
                let module = self.module_version(verb, &args[0], &args[1], &line)?;
                if verb == "require" {
                    let indirect = line.comment.as_deref().is_some_and(|c| {
                        c == "indirect" || c.starts_with("indirect;")
                    });
                    self.file.require.push(Require {
                        module,
                        indirect,
                        syntax: line,
                    });
                } else {
                    self.file.exclude.push(Exclude {
                        module,
                        syntax: line,
                    });
                }
            }
            "replace" => self.replace(args, line)?,
            "retract" => self.retract(args, line)?,
            "godebug" | "tool" | "ignore" => {}
            _ => return Err(self.error(line.start, format!("unknown directive: {verb}"))),
        }
        Ok(())
    }

    fn module_version(
        &self,
        verb: &str,
        path: &str,
        version: &str,
        line: &Line,
    ) -> Result<ModuleVersion, ParseError> {
        if path.is_empty() {
            return Err(self.error(line.start, format!("{verb}: empty module path")));
        }
        module::check_version(version)
            .map_err(|e| self.error(line.start, format!("{verb} {path}: {e}")))?;
        Ok(ModuleVersion::new(path, version))
    }

    fn replace(&mut self, args: &[String], line: Line) -> Result<(), ParseError> {
        const USAGE: &str = "usage: replace module/path [v1.2.3] => other/module v1.4\n\t or replace module/path [v1.2.3] => ../local/directory";
        let arrow = args.iter().position(|a| a == "=>");
        let Some(arrow) = arrow.filter(|i| (1..=2).contains(i)) else {
            return Err(self.error(line.start, USAGE));
        };
        let (lhs, rhs) = (&args[..arrow], &args[arrow + 1..]);
        if rhs.is_empty() || rhs.len() > 2 {
            return Err(self.error(line.start, USAGE));
        }

        let old = match lhs {
            [path] => ModuleVersion::new(path.clone(), ""),
            [path, version] => self.module_version("replace", path, version, &line)?,
            _ => return Err(self.error(line.start, USAGE)),
        };
        let new = match rhs {
            [path] => {
                if !is_local_path(path) {
                    return Err(self.error(
                        line.start,
                        "replacement module without version must be directory path (rooted or starting with ./ or ../)",
                    ));
                }
                ModuleVersion::new(path.clone(), "")
            }
            [path, version] => {
                if is_local_path(path) {
                    return Err(self.error(
                        line.start,
                        "replacement module directory path must not have version",
                    ));
                }
                self.module_version("replace", path, version, &line)?
            }
            _ => return Err(self.error(line.start, USAGE)),
        };
        self.file.replace.push(Replace {
            old,
            new,
            syntax: line,
        });
        Ok(())
    }

    fn retract(&mut self, args: &[String], line: Line) -> Result<(), ParseError> {
        let joined = args.join(" ");
        let (low, high) = match joined.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Some(interval) => match interval.split_once(',') {
                Some((low, high)) => (low.trim().to_string(), high.trim().to_string()),
                None => return Err(self.error(line.start, "usage: retract version or retract [low, high]")),
            },
            None if args.len() == 1 => (args[0].clone(), args[0].clone()),
            None => return Err(self.error(line.start, "usage: retract version or retract [low, high]")),
        };
        for version in [&low, &high] {
            module::check_version(version)
                .map_err(|e| self.error(line.start, format!("retract: {e}")))?;
        }
        self.file.retract.push(Retract {
            low,
            high,
            rationale: line.comment.clone().unwrap_or_default(),
            syntax: line,
        });
        Ok(())
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with("./")
        || path.starts_with("../")
        || path.starts_with('/')
        || path == "."
        || path == ".."
        || path.starts_with(".\\")
        || path.starts_with("..\\")
        || path.get(1..3) == Some(":\\")
}

fn is_valid_go_version(version: &str) -> bool {
    let (numbers, prerelease) = match version.find(|c: char| c.is_ascii_alphabetic()) {
        Some(i) => (&version[..i], &version[i..]),
        None => (version, ""),
    };
    let parts: Vec<&str> = numbers.split('.').collect();
    let numbers_ok = (2..=3).contains(&parts.len())
        && parts.iter().enumerate().all(|(i, part)| {
            !part.is_empty()
                && part.chars().all(|c| c.is_ascii_digit())
                && (part.len() == 1 || !part.starts_with('0'))
                && !(i == 0 && *part == "0")
        });
    let prerelease_ok = prerelease.is_empty()
        || ["rc", "beta"].iter().any(|tag| {
            prerelease.strip_prefix(tag).is_some_and(|n| {
                !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && !n.starts_with('0')
            })
        });
    numbers_ok && prerelease_ok
}

/// Parses manifest `content`. `filename` is used only to render errors.
pub fn parse(filename: &str, content: &[u8]) -> Result<ModFile, ParseError> {
    let mut parser = Parser {
        filename,
        file: ModFile::default(),
    };

    let text = std::str::from_utf8(content).map_err(|e| {
        let valid = &content[..e.valid_up_to()];
        let line = valid.iter().filter(|b| **b == b'\n').count() as u32 + 1;
        parser.error(
            Position {
                line,
                line_rune: 1,
                byte: e.valid_up_to(),
            },
            "invalid UTF-8",
        )
    })?;

    let mut block: Option<(String, Position)> = None;
    let mut offset = 0;
    for (index, raw) in text.split('\n').enumerate() {
        let line_start = offset;
        offset += raw.len() + 1;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let lexed = parser.lex_line(index as u32 + 1, line_start, raw)?;
        let Some(first) = lexed.tokens.first() else {
            continue;
        };

        if let Some((verb, _)) = &block {
            if lexed.tokens.len() == 1 && first.is(")") {
                block = None;
                continue;
            }
            if let Some(paren) = lexed.tokens.iter().find(|t| t.is("(") || t.is(")")) {
                return Err(parser.error(paren.start, format!("unexpected '{}' in {verb} block", paren.text)));
            }
            let verb = verb.clone();
            let line = lexed.to_line();
            let args = line.tokens.clone();
            parser.statement(&verb, &args, line)?;
            continue;
        }

        if first.is(")") {
            return Err(parser.error(first.start, "unexpected ')'"));
        }
        let verb = first.text.clone();
        if lexed.tokens.len() == 2 && lexed.tokens[1].is("(") {
            if !BLOCK_VERBS.contains(&verb.as_str()) {
                return Err(parser.error(first.start, format!("{verb} does not support ( ) blocks")));
            }
            block = Some((verb, lexed.tokens[1].start));
            continue;
        }
        if let Some(paren) = lexed.tokens.iter().find(|t| t.is("(") || t.is(")")) {
            return Err(parser.error(paren.start, format!("unexpected '{}'", paren.text)));
        }
        let line = lexed.to_line();
        let args = line.tokens[1..].to_vec();
        parser.statement(&verb, &args, line)?;
    }

    if let Some((verb, open)) = block {
        return Err(parser.error(open, format!("unterminated {verb} block")));
    }
    Ok(parser.file)
}
