//! Parses a user-supplied command template once, then expands it against a
//! candidate's temporary file path and contents for each Oracle query.
//!
//! Grammar (spec.md §4.3): space-separated arguments outside shell mode (the
//! whole template becomes the second argument to `sh -c` inside it), `\c`
//! escapes, `'...'`/`"..."` quote runs, `@` (temp file path) and `@@` (temp
//! file contents) expansion tokens, a trailing-argument fallback when no
//! token is present, and a `<@` suffix that switches to stdin-input mode.

pub mod error;

pub use error::{Result, TemplateError};

use std::ffi::OsString;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::ffi::{OsStrExt, OsStringExt};

/// One fragment of a parsed argument: either literal bytes or one of the two
/// expansion tokens, substituted at [`CommandTemplate::expand`] time.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Piece {
    Literal(Vec<u8>),
    FilePath,
    FileContents,
}

/// A command template, parsed once and expanded once per candidate.
#[derive(Clone, Debug)]
pub struct CommandTemplate {
    shell: bool,
    stdin_input: bool,
    /// Non-shell mode: one entry per argv slot, `args[0]` is the program.
    /// Shell mode: exactly one entry, the `sh -c` command string.
    args: Vec<Vec<Piece>>,
}

/// The expanded argv for one Oracle query.
#[derive(Debug)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl CommandTemplate {
    /// Parse `template`. `shell` selects the `sh -c` wrapping grammar of
    /// spec.md §4.3.
    pub fn parse(template: &str, shell: bool) -> Result<Self> {
        if shell {
            let (mut pieces, has_placeholder) = parse_shell(template)?;
            if !has_placeholder {
                pieces.push(Piece::Literal(b" ".to_vec()));
                pieces.push(Piece::FilePath);
            }
            return Ok(Self {
                shell: true,
                stdin_input: false,
                args: vec![pieces],
            });
        }

        let trimmed_end = template.trim_end();
        let (body, stdin_input) = match trimmed_end.strip_suffix("<@") {
            Some(rest) => (rest.trim_end(), true),
            None => (template, false),
        };

        let (mut args, has_placeholder) = parse_non_shell(body)?;
        if args.is_empty() {
            return Err(TemplateError::EmptyTemplate);
        }
        if !has_placeholder && !stdin_input {
            args.push(vec![Piece::FilePath]);
        }
        Ok(Self {
            shell: false,
            stdin_input,
            args,
        })
    }

    pub fn shell(&self) -> bool {
        self.shell
    }

    /// Whether the template ended in `<@`: the candidate's contents must be
    /// fed to the child's stdin rather than (only) substituted.
    pub fn stdin_input(&self) -> bool {
        self.stdin_input
    }

    /// Expand the parsed template against a candidate's absolute temp-file
    /// `path` and its `contents`, producing a ready-to-exec argv.
    pub fn expand(&self, path: &Path, contents: &[u8]) -> Result<Invocation> {
        if self.shell {
            let bytes = build_bytes(&self.args[0], path, contents, true)?;
            Ok(Invocation {
                program: OsString::from("sh"),
                args: vec![OsString::from("-c"), os_string_from_bytes(bytes)],
            })
        } else {
            let mut iter = self.args.iter();
            let program_pieces = iter.next().expect("parse guarantees at least one arg");
            let program = os_string_from_bytes(build_bytes(program_pieces, path, contents, false)?);
            let mut args = Vec::with_capacity(self.args.len().saturating_sub(1));
            for pieces in iter {
                args.push(os_string_from_bytes(build_bytes(
                    pieces, path, contents, false,
                )?));
            }
            Ok(Invocation { program, args })
        }
    }
}

fn build_bytes(pieces: &[Piece], path: &Path, contents: &[u8], shell: bool) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Literal(bytes) => out.extend_from_slice(bytes),
            Piece::FilePath => out.extend_from_slice(path_bytes(path)),
            Piece::FileContents => {
                if shell {
                    if contents.contains(&0) {
                        return Err(TemplateError::NulByteInContents);
                    }
                    out.extend_from_slice(&single_quote_escape(contents));
                } else {
                    out.extend_from_slice(contents);
                }
            }
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_bytes()
}

#[cfg(unix)]
fn os_string_from_bytes(bytes: Vec<u8>) -> OsString {
    OsString::from_vec(bytes)
}

/// `'...'` with every embedded `'` replaced by the standard `'\''` trick, so
/// the whole thing can be spliced into a single-quoted `sh -c` argument.
fn single_quote_escape(contents: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(contents.len() + 2);
    out.push(b'\'');
    for &b in contents {
        if b == b'\'' {
            out.extend_from_slice(b"'\\''");
        } else {
            out.push(b);
        }
    }
    out.push(b'\'');
    out
}

/// Decode a recognized `\c` escape to its literal byte. `None` means `c` is
/// not one of the recognized escapes and `\c` passes through literally.
fn decode_escape(c: char) -> Option<u8> {
    match c {
        '\\' => Some(b'\\'),
        '\'' => Some(b'\''),
        '"' => Some(b'"'),
        'n' => Some(b'\n'),
        'r' => Some(b'\r'),
        't' => Some(b'\t'),
        '@' => Some(b'@'),
        _ => None,
    }
}

/// Parse space-separated arguments, honoring quotes and escapes. Quote
/// delimiters are stripped from the output. Returns the argument list and
/// whether any `@`/`@@` token was seen.
fn parse_non_shell(s: &str) -> Result<(Vec<Vec<Piece>>, bool)> {
    let mut args: Vec<Vec<Piece>> = Vec::new();
    let mut current_arg: Vec<Piece> = Vec::new();
    let mut literal: Vec<u8> = Vec::new();
    let mut has_placeholder = false;

    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {
                flush_literal(&mut literal, &mut current_arg);
                if !current_arg.is_empty() {
                    args.push(std::mem::take(&mut current_arg));
                }
            }
            '\\' => {
                consume_escape(&mut chars, &mut literal);
            }
            '\'' | '"' => {
                scan_quote(&mut chars, c, &mut literal, &mut current_arg, &mut has_placeholder, false)?;
            }
            '@' => {
                flush_literal(&mut literal, &mut current_arg);
                if chars.peek() == Some(&'@') {
                    chars.next();
                    current_arg.push(Piece::FileContents);
                } else {
                    current_arg.push(Piece::FilePath);
                }
                has_placeholder = true;
            }
            other => literal.push_char(other),
        }
    }
    flush_literal(&mut literal, &mut current_arg);
    if !current_arg.is_empty() {
        args.push(current_arg);
    }
    Ok((args, has_placeholder))
}

/// Parse the whole template as one un-split shell command string. Quote
/// delimiters are preserved in the output (for the downstream shell to
/// interpret); any literal quote/backslash character produced by escape
/// decoding is re-escaped so it survives being embedded in that string.
fn parse_shell(s: &str) -> Result<(Vec<Piece>, bool)> {
    let mut pieces: Vec<Piece> = Vec::new();
    let mut literal: Vec<u8> = Vec::new();
    let mut has_placeholder = false;

    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                consume_escape_shell(&mut chars, &mut literal);
            }
            '\'' | '"' => {
                literal.push(c as u8);
                scan_quote(&mut chars, c, &mut literal, &mut pieces, &mut has_placeholder, true)?;
                literal.push(c as u8);
            }
            '@' => {
                flush_literal(&mut literal, &mut pieces);
                if chars.peek() == Some(&'@') {
                    chars.next();
                    pieces.push(Piece::FileContents);
                } else {
                    pieces.push(Piece::FilePath);
                }
                has_placeholder = true;
            }
            other => literal.push_char(other),
        }
    }
    flush_literal(&mut literal, &mut pieces);
    Ok((pieces, has_placeholder))
}

/// Scan the interior of a quoted run up to (and consuming) its closing
/// delimiter `quote`. Literal text and `@`/`@@` tokens inside the quote are
/// appended directly to `out`/`literal` as if unquoted, except that in shell
/// mode a decoded quote/backslash char is re-escaped (`shell_reescape`).
fn scan_quote(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    quote: char,
    literal: &mut Vec<u8>,
    out: &mut Vec<Piece>,
    has_placeholder: &mut bool,
    shell_reescape: bool,
) -> Result<()> {
    loop {
        match chars.next() {
            None => return Err(TemplateError::UnterminatedQuote),
            Some(c) if c == quote => return Ok(()),
            Some('\\') => {
                if shell_reescape {
                    consume_escape_shell(chars, literal);
                } else {
                    consume_escape(chars, literal);
                }
            }
            Some('@') => {
                flush_literal(literal, out);
                if chars.peek() == Some(&'@') {
                    chars.next();
                    out.push(Piece::FileContents);
                } else {
                    out.push(Piece::FilePath);
                }
                *has_placeholder = true;
            }
            Some(other) => literal.push_char(other),
        }
    }
}

fn consume_escape(chars: &mut std::iter::Peekable<std::str::Chars>, literal: &mut Vec<u8>) {
    match chars.next() {
        Some(c) => match decode_escape(c) {
            Some(byte) => literal.push(byte),
            None => {
                literal.push(b'\\');
                literal.push_char(c);
            }
        },
        None => literal.push(b'\\'),
    }
}

fn consume_escape_shell(chars: &mut std::iter::Peekable<std::str::Chars>, literal: &mut Vec<u8>) {
    match chars.next() {
        Some(c) => match decode_escape(c) {
            Some(byte @ (b'\'' | b'"' | b'\\')) => {
                literal.push(b'\\');
                literal.push(byte);
            }
            Some(byte) => literal.push(byte),
            None => {
                literal.push(b'\\');
                literal.push_char(c);
            }
        },
        None => literal.push(b'\\'),
    }
}

fn flush_literal(literal: &mut Vec<u8>, out: &mut Vec<Piece>) {
    if !literal.is_empty() {
        out.push(Piece::Literal(std::mem::take(literal)));
    }
}

trait PushChar {
    fn push_char(&mut self, c: char);
}

impl PushChar for Vec<u8> {
    fn push_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn expand_str(tmpl: &str, shell: bool, path: &str, contents: &[u8]) -> (String, Vec<String>) {
        let t = CommandTemplate::parse(tmpl, shell).unwrap();
        let inv = t.expand(&PathBuf::from(path), contents).unwrap();
        (
            inv.program.to_string_lossy().into_owned(),
            inv.args
                .into_iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        )
    }

    #[test]
    fn simple_split_on_spaces() {
        let (prog, args) = expand_str("python script.py", false, "/tmp/x", b"");
        assert_eq!(prog, "python");
        assert_eq!(args, vec!["script.py", "/tmp/x"]);
    }

    #[test]
    fn at_sign_expands_to_path() {
        let (prog, args) = expand_str("python @", false, "/tmp/x", b"ignored");
        assert_eq!(prog, "python");
        assert_eq!(args, vec!["/tmp/x"]);
    }

    #[test]
    fn double_at_expands_to_contents_non_shell() {
        let (prog, args) = expand_str("python -c @@", false, "/tmp/x", b"print(1)");
        assert_eq!(prog, "python");
        assert_eq!(args, vec!["-c", "print(1)"]);
    }

    #[test]
    fn no_placeholder_appends_path_as_trailing_arg() {
        let t = CommandTemplate::parse("python script.py", false).unwrap();
        assert!(!t.stdin_input());
        let (_, args) = expand_str("python script.py", false, "/tmp/x", b"");
        assert_eq!(args, vec!["script.py", "/tmp/x"]);
    }

    #[test]
    fn quotes_are_stripped_in_non_shell_mode() {
        let (prog, args) = expand_str("python 'hello world.py'", false, "/tmp/x", b"");
        assert_eq!(prog, "python");
        assert_eq!(args, vec!["hello world.py", "/tmp/x"]);
    }

    #[test]
    fn escape_sequences_decode() {
        let (_, args) = expand_str(r#"python "a\nb""#, false, "/tmp/x", b"");
        assert_eq!(args, vec!["a\nb", "/tmp/x"]);
    }

    #[test]
    fn unrecognized_escape_passes_through() {
        let (_, args) = expand_str(r"python a\zb", false, "/tmp/x", b"");
        assert_eq!(args, vec![r"a\zb", "/tmp/x"]);
    }

    #[test]
    fn escaped_at_sign_is_literal() {
        let (_, args) = expand_str(r"python a\@b", false, "/tmp/x", b"");
        assert_eq!(args, vec!["a@b", "/tmp/x"]);
    }

    #[test]
    fn unterminated_quote_is_error() {
        let err = CommandTemplate::parse("python 'unterminated", false);
        assert!(matches!(err, Err(TemplateError::UnterminatedQuote)));
    }

    #[test]
    fn trailing_stdin_marker_enables_stdin_input() {
        let t = CommandTemplate::parse("python script.py <@", false).unwrap();
        assert!(t.stdin_input());
        let inv = t.expand(&PathBuf::from("/tmp/x"), b"").unwrap();
        assert_eq!(inv.args, vec![std::ffi::OsString::from("script.py")]);
    }

    #[test]
    fn trailing_stdin_marker_with_extra_whitespace() {
        let t = CommandTemplate::parse("python script.py   <@   ", false).unwrap();
        assert!(t.stdin_input());
    }

    #[test]
    fn shell_mode_wraps_via_sh_c() {
        let t = CommandTemplate::parse("python @", true).unwrap();
        let inv = t.expand(&PathBuf::from("/tmp/x"), b"").unwrap();
        assert_eq!(inv.program, std::ffi::OsString::from("sh"));
        assert_eq!(inv.args[0], std::ffi::OsString::from("-c"));
        assert_eq!(inv.args[1], std::ffi::OsString::from("python /tmp/x"));
    }

    #[test]
    fn shell_mode_no_placeholder_appends_path() {
        let t = CommandTemplate::parse("python script.py", true).unwrap();
        let inv = t.expand(&PathBuf::from("/tmp/x"), b"").unwrap();
        assert_eq!(inv.args[1], std::ffi::OsString::from("python script.py /tmp/x"));
    }

    #[test]
    fn shell_mode_double_at_single_quotes_contents() {
        let t = CommandTemplate::parse("python -c @@", true).unwrap();
        let inv = t.expand(&PathBuf::from("/tmp/x"), b"print(1)").unwrap();
        assert_eq!(
            inv.args[1],
            std::ffi::OsString::from("python -c 'print(1)'")
        );
    }

    #[test]
    fn shell_mode_contents_with_quote_uses_escape_trick() {
        let t = CommandTemplate::parse("python -c @@", true).unwrap();
        let inv = t.expand(&PathBuf::from("/tmp/x"), b"it's").unwrap();
        assert_eq!(
            inv.args[1],
            std::ffi::OsString::from("python -c 'it'\\''s'")
        );
    }

    #[test]
    fn shell_mode_nul_in_contents_is_fatal() {
        let t = CommandTemplate::parse("python -c @@", true).unwrap();
        let err = t.expand(&PathBuf::from("/tmp/x"), b"a\0b");
        assert!(matches!(err, Err(TemplateError::NulByteInContents)));
    }

    #[test]
    fn shell_mode_preserves_quotes_for_downstream_shell() {
        let t = CommandTemplate::parse("sh -c 'echo hi'", true).unwrap();
        let inv = t.expand(&PathBuf::from("/tmp/x"), b"").unwrap();
        assert_eq!(
            inv.args[1],
            std::ffi::OsString::from("sh -c 'echo hi' /tmp/x")
        );
    }

    #[test]
    fn empty_template_is_error() {
        let err = CommandTemplate::parse("   ", false);
        assert!(matches!(err, Err(TemplateError::EmptyTemplate)));
    }
}
