//! Read-only statement gate for free-form queries.
//!
//! This is a lexical check, not a SQL parser. The text is split into word
//! tokens (maximal runs of ASCII alphanumerics and `_`) and statement
//! separators, and the tokens are compared against a fixed allowlist/denylist.
//! A column such as `created_at` is a single token and never matches `CREATE`.
//! String literals, quoted identifiers, dollar-quoted bodies and comments are
//! recognized only so that a `;` inside them is not taken as a separator.
//!
//! The executing database role must also be restricted to read-only grants;
//! this gate is one layer, not the boundary.

use switchy_database::DatabaseValue;

/// The only keyword a statement may start with.
const READ_ONLY_KEYWORD: &str = "SELECT";

/// Mutating and DDL keywords rejected anywhere in a statement.
pub const FORBIDDEN_KEYWORDS: [&str; 9] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE",
];

/// Why a statement was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The statement does not begin with `SELECT`.
    NotReadOnly,
    /// A denylisted keyword appears as a whole token.
    ForbiddenOperation(&'static str),
    /// A `;` is followed by another statement.
    MultipleStatements,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReadOnly => write!(f, "Only SELECT queries are permitted"),
            Self::ForbiddenOperation(keyword) => {
                write!(f, "Forbidden operation detected: {keyword}")
            }
            Self::MultipleStatements => write!(f, "Only a single statement is permitted"),
        }
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    /// A word in statement text or inside a literal.
    Word(&'a str),
    /// A word inside a comment.
    CommentWord(&'a str),
    /// A string literal, quoted identifier or dollar-quoted body.
    Literal,
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Comment,
    Literal,
}

const fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

const fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_word_char(c))
        .filter(|word| !word.is_empty())
}

/// `E'...'` strings treat backslash as an escape.
fn is_escape_string(bytes: &[u8], quote_at: usize) -> bool {
    match &bytes[..quote_at] {
        [b'e' | b'E'] => true,
        [.., before, b'e' | b'E'] => !is_word_byte(*before),
        _ => false,
    }
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |at| from + at + 1)
}

/// Block comments nest.
fn block_comment_end(bytes: &[u8], mut i: usize) -> usize {
    let mut depth = 1_usize;
    while i < bytes.len() {
        match &bytes[i..] {
            [b'/', b'*', ..] => {
                depth += 1;
                i += 2;
            }
            [b'*', b'/', ..] => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// A doubled quote is an escaped quote. Unterminated text runs to the end.
fn quoted_end(bytes: &[u8], mut i: usize, quote: u8, backslash_escapes: bool) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if backslash_escapes => i += 2,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// `$$...$$` or `$tag$...$tag$`. A `$` that continues an identifier or
/// starts a `$1` parameter opens nothing.
fn dollar_quote_end(bytes: &[u8], start: usize) -> Option<usize> {
    if start > 0 && (is_word_byte(bytes[start - 1]) || bytes[start - 1] == b'$') {
        return None;
    }
    let tag_len = bytes[start + 1..]
        .iter()
        .position(|&b| !is_word_byte(b))?;
    if bytes[start + 1 + tag_len] != b'$' || bytes[start + 1].is_ascii_digit() {
        return None;
    }

    let body = start + tag_len + 2;
    let delimiter = &bytes[start..body];
    Some(
        bytes[body..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)
            .map_or(bytes.len(), |at| body + at + delimiter.len()),
    )
}

fn region_at(bytes: &[u8], start: usize) -> Option<(Region, usize)> {
    match &bytes[start..] {
        [b'-', b'-', ..] => Some((Region::Comment, line_end(bytes, start + 2))),
        [b'/', b'*', ..] => Some((Region::Comment, block_comment_end(bytes, start + 2))),
        [b'\'', ..] => Some((
            Region::Literal,
            quoted_end(bytes, start + 1, b'\'', is_escape_string(bytes, start)),
        )),
        [b'"', ..] => Some((Region::Literal, quoted_end(bytes, start + 1, b'"', false))),
        [b'$', ..] => dollar_quote_end(bytes, start).map(|end| (Region::Literal, end)),
        _ => None,
    }
}

/// Splits `text` into words and statement separators.
///
/// Words are collected everywhere, including inside literals and comments,
/// so the denylist sees them. A `;` only separates statements in plain
/// statement text.
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if let Some((region, end)) = region_at(bytes, i) {
            if region == Region::Literal {
                tokens.push(Token::Literal);
            }
            tokens.extend(words(&text[i..end]).map(|word| match region {
                Region::Comment => Token::CommentWord(word),
                Region::Literal => Token::Word(word),
            }));
            i = end;
        } else if is_word_byte(bytes[i]) {
            let end = bytes[i..]
                .iter()
                .position(|&b| !is_word_byte(b))
                .map_or(bytes.len(), |len| i + len);
            tokens.push(Token::Word(&text[i..end]));
            i = end;
        } else {
            if bytes[i] == b';' {
                tokens.push(Token::Separator);
            }
            i += 1;
        }
    }

    tokens
}

/// Classifies `text` as an allowed read-only statement.
///
/// Checks run in order: the statement must begin with `SELECT`, must not
/// contain a denylisted keyword, and must not continue past a `;`. A `;`
/// inside a string literal, quoted identifier or comment separates nothing.
///
/// # Errors
///
/// Returns the first [`Rejection`] that applies.
pub fn validate(text: &str) -> Result<(), Rejection> {
    let trimmed = text.trim();

    // The keyword must be the very first thing in the text, so `(SELECT`
    // and `;SELECT` are not read-only statements.
    let leading = trimmed.split(|c: char| !is_word_char(c)).next().unwrap_or("");
    if !leading.eq_ignore_ascii_case(READ_ONLY_KEYWORD) {
        return Err(Rejection::NotReadOnly);
    }

    let tokens = tokenize(trimmed);

    for token in &tokens {
        if let Token::Word(word) | Token::CommentWord(word) = token
            && let Some(keyword) = FORBIDDEN_KEYWORDS
                .iter()
                .copied()
                .find(|keyword| word.eq_ignore_ascii_case(keyword))
        {
            return Err(Rejection::ForbiddenOperation(keyword));
        }
    }

    if let Some(sep) = tokens.iter().position(|t| *t == Token::Separator)
        && tokens[sep + 1..]
            .iter()
            .any(|t| matches!(t, Token::Word(_) | Token::Literal))
    {
        return Err(Rejection::MultipleStatements);
    }

    Ok(())
}

/// A statement cleared for execution.
///
/// The only public way to build one is [`ReadOnlyStatement::parse`], which
/// runs the validator. The analytic queries construct their fixed templates
/// through a crate-private constructor.
#[derive(Debug, Clone)]
pub struct ReadOnlyStatement {
    sql: String,
    params: Vec<DatabaseValue>,
    operation: &'static str,
    summary: String,
}

impl ReadOnlyStatement {
    /// Validates free-form text. The text is kept exactly as given.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if [`validate`] fails.
    pub fn parse(text: &str) -> Result<Self, Rejection> {
        validate(text)?;
        Ok(Self {
            sql: text.to_string(),
            params: Vec::new(),
            operation: "query_database",
            summary: format!("{} character statement", text.chars().count()),
        })
    }

    /// Wraps one of the crate's own fixed templates.
    pub(crate) fn fixed(
        operation: &'static str,
        sql: String,
        params: Vec<DatabaseValue>,
        summary: String,
    ) -> Self {
        Self {
            sql,
            params,
            operation,
            summary,
        }
    }

    /// Statement text as it will be sent.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind parameters, `$1` first.
    #[must_use]
    pub fn params(&self) -> &[DatabaseValue] {
        &self.params
    }

    /// Name of the operation that issued this statement.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Argument summary safe to include in errors and logs.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }
}
