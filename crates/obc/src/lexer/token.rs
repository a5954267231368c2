//! Token definitions for the Oberon-07 lexer

use crate::common::Span;
use logos::{FilterResult, Logos};

/// Token with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Lexical error raised by a callback
#[derive(Default, Debug, Clone, PartialEq)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
    UnclosedComment,
    UnterminatedString,
}

/// Raw result of the numeric-literal callback
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
    LongReal(f64),
    Char(u32),
    Malformed,
}

/// All token kinds in Oberon-07
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\n]+")]
pub enum TokenKind {
    // === Keywords ===
    #[token("ARRAY")]
    Array,
    #[token("BEGIN")]
    Begin,
    #[token("BY")]
    By,
    #[token("CASE")]
    Case,
    #[token("CONST")]
    Const,
    #[token("DIV")]
    Div,
    #[token("DO")]
    Do,
    #[token("ELSE")]
    Else,
    #[token("ELSIF")]
    Elsif,
    #[token("END")]
    End,
    #[token("FALSE")]
    False,
    #[token("FOR")]
    For,
    #[token("IF")]
    If,
    #[token("IMPORT")]
    Import,
    #[token("IN")]
    In,
    #[token("IS")]
    Is,
    #[token("MOD")]
    Mod,
    #[token("MODULE")]
    Module,
    #[token("NIL")]
    Nil,
    #[token("OF")]
    Of,
    #[token("OR")]
    Or,
    #[token("POINTER")]
    Pointer,
    #[token("PROCEDURE")]
    Procedure,
    #[token("RECORD")]
    Record,
    #[token("REPEAT")]
    Repeat,
    #[token("RETURN")]
    Return,
    #[token("THEN")]
    Then,
    #[token("TO")]
    To,
    #[token("TRUE")]
    True,
    #[token("TYPE")]
    Type,
    #[token("UNTIL")]
    Until,
    #[token("VAR")]
    Var,
    #[token("WHILE")]
    While,

    // === Identifiers ===
    #[regex(r"[A-Za-z][A-Za-z0-9]*", |lex| lex.slice().to_string())]
    Ident(String),

    // === Literals ===
    // All numeric forms share one entry point: decimal and hexadecimal
    // integers ('H'), character codes ('X'), reals and LONGREAL scale
    // factors ('E'/'D') cannot be told apart by disjoint regexes without
    // breaking maximal munch against '..' ranges, so a callback scans the
    // literal by hand. The scanner widens the payload into the public
    // literal variants below.
    #[regex(r"[0-9]", lex_number)]
    Number(Number),
    Integer(i64),
    Real(f64),
    LongReal(f64),
    CharCode(u32),
    /// A numeric literal running straight into a letter or digit
    /// (`1HH`, `5OF`, `12a`). Spaces are required between numbers and
    /// words; no grammar production matches this token, so it surfaces
    /// as a plain parse failure, never a lexical error.
    Malformed,

    #[token("\"", lex_string)]
    Str(String),

    // === Operators and delimiters ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("=")]
    Eq,
    #[token("#")]
    Hash,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token(":=")]
    Assign,
    #[token("^")]
    Caret,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token("|")]
    Bar,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // (* ... *) comments nest and are skipped entirely
    #[token("(*", lex_comment)]
    Comment,

    // Special
    Eof,
}

/// Scan the tail of a numeric literal.
///
/// The logos trigger has consumed exactly one decimal digit. From there:
/// hex digits terminated by 'H' make an integer, by 'X' a character code;
/// a '.' not starting a '..' range begins a real with an optional 'E'/'D'
/// scale factor; otherwise the decimal digits alone form an integer.
fn lex_number(lex: &mut logos::Lexer<TokenKind>) -> Result<Number, LexError> {
    let rest = lex.remainder().as_bytes();

    let mut i = 0;
    while i < rest.len() && rest[i].is_ascii_digit() {
        i += 1;
    }

    // Hexadecimal continuation: all digits seen so far are hex digits too.
    let mut j = i;
    while j < rest.len() && (rest[j].is_ascii_digit() || (b'A'..=b'F').contains(&rest[j])) {
        j += 1;
    }

    let number;
    if j < rest.len() && (rest[j] == b'H' || rest[j] == b'X') {
        let is_char = rest[j] == b'X';
        let digits = format!("{}{}", lex.slice(), ascii(&rest[..j]));
        let value = u64::from_str_radix(&digits, 16).map_err(|_| LexError::UnexpectedCharacter)?;
        number = if is_char {
            Number::Char(value as u32)
        } else {
            Number::Int(value as i64)
        };
        lex.bump(j + 1);
    } else if i < rest.len() && rest[i] == b'.' && !(i + 1 < rest.len() && rest[i + 1] == b'.') {
        // Real: a dot that is not the start of a '..' range token.
        i += 1;
        while i < rest.len() && rest[i].is_ascii_digit() {
            i += 1;
        }
        let mut long = false;
        if i < rest.len() && (rest[i] == b'E' || rest[i] == b'D') {
            let mut k = i + 1;
            if k < rest.len() && (rest[k] == b'+' || rest[k] == b'-') {
                k += 1;
            }
            let exp_digits = k;
            while k < rest.len() && rest[k].is_ascii_digit() {
                k += 1;
            }
            // A scale factor without digits is not part of the literal.
            if k > exp_digits {
                long = rest[i] == b'D';
                i = k;
            }
        }
        let text = format!("{}{}", lex.slice(), ascii(&rest[..i]));
        let value: f64 = text
            .replace(['E', 'D'], "e")
            .parse()
            .map_err(|_| LexError::UnexpectedCharacter)?;
        number = if long {
            Number::LongReal(value)
        } else {
            Number::Real(value)
        };
        lex.bump(i);
    } else {
        let digits = format!("{}{}", lex.slice(), ascii(&rest[..i]));
        number = Number::Int(digits.parse().map_err(|_| LexError::UnexpectedCharacter)?);
        lex.bump(i);
    }

    // A literal must end at a word boundary. `1HH`, `1H0` and `5OF` are
    // single malformed tokens, not a literal plus a word.
    let tail = lex.remainder().as_bytes();
    if !tail.is_empty() && tail[0].is_ascii_alphanumeric() {
        let mut n = 0;
        while n < tail.len() && tail[n].is_ascii_alphanumeric() {
            n += 1;
        }
        lex.bump(n);
        return Ok(Number::Malformed);
    }

    Ok(number)
}

fn ascii(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).expect("ascii digits")
}

/// Consume a quote-delimited string. Oberon strings have no escapes and
/// may not span lines in practice; an unterminated one is a lexical error.
fn lex_string(lex: &mut logos::Lexer<TokenKind>) -> Result<String, LexError> {
    let rest = lex.remainder();
    match rest.find('"') {
        Some(i) => {
            let text = rest[..i].to_string();
            lex.bump(i + 1);
            Ok(text)
        }
        None => {
            lex.bump(rest.len());
            Err(LexError::UnterminatedString)
        }
    }
}

/// Skip a `(* ... *)` comment, honoring nesting
fn lex_comment(lex: &mut logos::Lexer<TokenKind>) -> FilterResult<(), LexError> {
    let rest = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i < rest.len() {
        if rest[i] == b'(' && i + 1 < rest.len() && rest[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if rest[i] == b'*' && i + 1 < rest.len() && rest[i + 1] == b')' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                lex.bump(i);
                return FilterResult::Skip;
            }
        } else {
            i += 1;
        }
    }
    lex.bump(rest.len());
    FilterResult::Error(LexError::UnclosedComment)
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Array => write!(f, "'ARRAY'"),
            TokenKind::Begin => write!(f, "'BEGIN'"),
            TokenKind::By => write!(f, "'BY'"),
            TokenKind::Case => write!(f, "'CASE'"),
            TokenKind::Const => write!(f, "'CONST'"),
            TokenKind::Div => write!(f, "'DIV'"),
            TokenKind::Do => write!(f, "'DO'"),
            TokenKind::Else => write!(f, "'ELSE'"),
            TokenKind::Elsif => write!(f, "'ELSIF'"),
            TokenKind::End => write!(f, "'END'"),
            TokenKind::False => write!(f, "'FALSE'"),
            TokenKind::For => write!(f, "'FOR'"),
            TokenKind::If => write!(f, "'IF'"),
            TokenKind::Import => write!(f, "'IMPORT'"),
            TokenKind::In => write!(f, "'IN'"),
            TokenKind::Is => write!(f, "'IS'"),
            TokenKind::Mod => write!(f, "'MOD'"),
            TokenKind::Module => write!(f, "'MODULE'"),
            TokenKind::Nil => write!(f, "'NIL'"),
            TokenKind::Of => write!(f, "'OF'"),
            TokenKind::Or => write!(f, "'OR'"),
            TokenKind::Pointer => write!(f, "'POINTER'"),
            TokenKind::Procedure => write!(f, "'PROCEDURE'"),
            TokenKind::Record => write!(f, "'RECORD'"),
            TokenKind::Repeat => write!(f, "'REPEAT'"),
            TokenKind::Return => write!(f, "'RETURN'"),
            TokenKind::Then => write!(f, "'THEN'"),
            TokenKind::To => write!(f, "'TO'"),
            TokenKind::True => write!(f, "'TRUE'"),
            TokenKind::Type => write!(f, "'TYPE'"),
            TokenKind::Until => write!(f, "'UNTIL'"),
            TokenKind::Var => write!(f, "'VAR'"),
            TokenKind::While => write!(f, "'WHILE'"),
            TokenKind::Ident(s) => write!(f, "identifier '{}'", s),
            TokenKind::Integer(v) => write!(f, "integer '{}'", v),
            TokenKind::Real(v) => write!(f, "real '{}'", v),
            TokenKind::LongReal(v) => write!(f, "longreal '{}'", v),
            TokenKind::CharCode(v) => write!(f, "character '{:X}X'", v),
            TokenKind::Str(s) => write!(f, "string \"{}\"", s),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Tilde => write!(f, "'~'"),
            TokenKind::Amp => write!(f, "'&'"),
            TokenKind::Eq => write!(f, "'='"),
            TokenKind::Hash => write!(f, "'#'"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Le => write!(f, "'<='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::Ge => write!(f, "'>='"),
            TokenKind::Assign => write!(f, "':='"),
            TokenKind::Caret => write!(f, "'^'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::DotDot => write!(f, "'..'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Semi => write!(f, "';'"),
            TokenKind::Bar => write!(f, "'|'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::Malformed => write!(f, "malformed literal"),
            TokenKind::Eof => write!(f, "end of file"),
            other => write!(f, "{:?}", other),
        }
    }
}
