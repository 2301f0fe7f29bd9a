use crate::Program;

use derivative::Derivative;
use nom::branch::alt;
use nom::character::complete::{anychar, char, multispace1, not_line_ending};
use nom::combinator::{opt, value};
use nom::error::ErrorKind;
use nom::multi::many0;
use nom::sequence::pair;
use nom::IResult;
use nom_locate::{position, LocatedSpan};

type Span<'a> = LocatedSpan<&'a str>;
type PResult<'a, T> = IResult<Span<'a>, T, SyntaxError<'a>>;

/// Parsed surface expression. Leaves are the primitive combinators plus
/// iota; everything else is application. Lowering into the arena happens
/// after parsing, so this tree owns its children.
#[derive(Clone, Debug, PartialEq, Derivative)]
#[derivative(Default)]
pub enum Ast {
    S,
    K,
    #[derivative(Default)]
    I,
    Iota,
    Apply(Box<Ast>, Box<Ast>),
}

impl Ast {
    pub fn apply(self, rhs: Self) -> Self {
        Ast::Apply(Box::new(self), Box::new(rhs))
    }
}

/// Failure position and message, carried through the nom plumbing. The
/// grammar is LL(1) over single-character tokens, so every error is
/// raised exactly where the reference raises it and nothing backtracks
/// past one.
#[derive(Debug)]
struct SyntaxError<'a> {
    at: Span<'a>,
    message: &'static str,
}

impl<'a> nom::error::ParseError<Span<'a>> for SyntaxError<'a> {
    fn from_error_kind(input: Span<'a>, _: ErrorKind) -> Self {
        SyntaxError {
            at: input,
            message: "Invalid character!",
        }
    }

    fn append(_: Span<'a>, _: ErrorKind, other: Self) -> Self {
        other
    }
}

fn fail<'a, T>(at: Span<'a>, message: &'static str) -> PResult<'a, T> {
    Err(nom::Err::Failure(SyntaxError { at, message }))
}

/// Whitespace and `#`-to-end-of-line comments.
fn junk(input: Span<'_>) -> PResult<'_, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(char('#'), not_line_ending)),
        ))),
    )(input)
}

/// The next significant character with its position, or `None` at end of
/// input. Callers that decide not to consume a token simply resume from
/// the input they handed in.
fn token(input: Span<'_>) -> PResult<'_, Option<(Span<'_>, char)>> {
    let (input, _) = junk(input)?;
    let (input, at) = position(input)?;
    let (input, c) = opt(anychar)(input)?;
    Ok((input, c.map(|c| (at, c))))
}

/// A single expression, dispatched on its leading token. `iota_i` is set
/// for the operands of `*` and makes a bare `i` mean iota; it does not
/// survive into nested `` ` `` operands or parenthesized groups.
fn expr(input: Span<'_>, iota_i: bool) -> PResult<'_, Ast> {
    let (input, tok) = token(input)?;
    let (at, c) = match tok {
        Some(tok) => tok,
        None => return fail(input, "Premature end of program!"),
    };
    match c {
        '`' | '*' => {
            let inner = c == '*';
            let (input, lhs) = expr(input, inner)?;
            let (input, rhs) = expr(input, inner)?;
            Ok((input, lhs.apply(rhs)))
        }
        '(' => sequence(input, true),
        ')' => fail(at, "Mismatched close-parenthesis!"),
        'k' | 'K' => Ok((input, Ast::K)),
        's' | 'S' => Ok((input, Ast::S)),
        'i' => Ok((input, if iota_i { Ast::Iota } else { Ast::I })),
        'I' => Ok((input, Ast::I)),
        '0' | '1' => jot(input, c),
        _ => fail(at, "Invalid character!"),
    }
}

/// The maximal run of Jot digits starting with `first`, folded from `I`.
/// The terminating character is left unconsumed.
fn jot(input: Span<'_>, first: char) -> PResult<'_, Ast> {
    let mut input = input;
    let mut digit = first;
    let mut e = Ast::I;
    loop {
        e = if digit == '0' {
            e.apply(Ast::S).apply(Ast::K)
        } else {
            Ast::S.apply(Ast::K.apply(e))
        };
        match token(input)? {
            (rest, Some((_, c))) if c == '0' || c == '1' => {
                digit = c;
                input = rest;
            }
            _ => break,
        }
    }
    Ok((input, e))
}

/// Expressions folded left-associatively until `)` (inside a group) or
/// end of input (at top level). Empty sequences denote `I`.
fn sequence(input: Span<'_>, nested: bool) -> PResult<'_, Ast> {
    let mut input = input;
    let mut acc: Option<Ast> = None;
    loop {
        let (rest, tok) = token(input)?;
        match tok {
            None => {
                if nested {
                    return fail(rest, "Premature end of program!");
                }
                input = rest;
                break;
            }
            Some((at, ')')) => {
                if !nested {
                    return fail(at, "Unmatched trailing close-parenthesis!");
                }
                input = rest;
                break;
            }
            Some(_) => {
                let (rest, e) = expr(input, false)?;
                acc = Some(match acc {
                    Some(acc) => acc.apply(e),
                    None => e,
                });
                input = rest;
            }
        }
    }
    Ok((input, acc.unwrap_or_default()))
}

pub fn parse(source: &str) -> Result<Program, ParseError> {
    match sequence(Span::new(source), false) {
        Ok((_, ast)) => Ok(Program(ast)),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            Err(ParseError::new(source, err))
        }
        Err(nom::Err::Incomplete(_)) => unreachable!(),
    }
}

const CONTEXT_CHARS: usize = 256;

#[derive(Clone, Debug)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    message: &'static str,
    context: String,
}

impl ParseError {
    fn new(source: &str, err: SyntaxError<'_>) -> Self {
        let offset = err.at.location_offset();
        let end = offset + source[offset..].chars().next().map_or(0, char::len_utf8);
        ParseError {
            line: err.at.location_line() as usize,
            column: err.at.get_column(),
            message: err.message,
            context: snippet(source, end),
        }
    }

    pub fn message(&self) -> &'static str {
        self.message
    }

    /// Reference-style diagnostic: the failing source name, the message,
    /// and the recent input up to and including the offending character,
    /// marked with `<--`.
    pub fn report(&self, source_name: &str) -> String {
        format!(
            "While parsing {}: {}\n{} <--",
            source_name, self.message, self.context
        )
    }
}

fn snippet(source: &str, end: usize) -> String {
    let consumed = &source[..end];
    let line_start = consumed.rfind('\n').map_or(0, |at| at + 1);
    let line = &consumed[line_start..];
    let len = line.chars().count();
    if len < CONTEXT_CHARS {
        line.to_owned()
    } else {
        let skip = len - (CONTEXT_CHARS - 1);
        format!("...{}", line.chars().skip(skip).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ast(input: &str) -> Ast {
        let Program(ast) = parse(input).unwrap();
        ast
    }

    fn err(input: &str) -> ParseError {
        parse(input).unwrap_err()
    }

    #[test]
    fn primitives() {
        assert_eq!(ast("k"), Ast::K);
        assert_eq!(ast("K"), Ast::K);
        assert_eq!(ast("s"), Ast::S);
        assert_eq!(ast("i"), Ast::I);
        assert_eq!(ast("I"), Ast::I);
    }

    #[test]
    fn empty_program_is_identity() {
        assert_eq!(ast(""), Ast::I);
        assert_eq!(ast("  # nothing but a comment"), Ast::I);
        assert_eq!(ast("()"), Ast::I);
    }

    #[test]
    fn backtick_applies() {
        assert_eq!(ast("`sk"), Ast::S.apply(Ast::K));
        assert_eq!(ast("``ski"), Ast::S.apply(Ast::K).apply(Ast::I));
    }

    #[test]
    fn parens_fold_left() {
        assert_eq!(ast("(skk)"), Ast::S.apply(Ast::K).apply(Ast::K));
        assert_eq!(
            ast("s(kk)i"),
            Ast::S.apply(Ast::K.apply(Ast::K)).apply(Ast::I)
        );
    }

    #[test]
    fn star_makes_bare_i_iota() {
        assert_eq!(ast("*ii"), Ast::Iota.apply(Ast::Iota));
        assert_eq!(ast("*II"), Ast::I.apply(Ast::I));
        // The iota reading does not cross a backtick.
        assert_eq!(ast("*`iii"), Ast::I.apply(Ast::I).apply(Ast::Iota));
        assert!(parse("*i*i*ii").is_ok());
    }

    #[test]
    fn jot_folds_from_identity() {
        assert_eq!(ast("0"), Ast::I.apply(Ast::S).apply(Ast::K));
        assert_eq!(ast("1"), Ast::S.apply(Ast::K.apply(Ast::I)));
        let e0 = Ast::I;
        let e1 = Ast::S.apply(Ast::K.apply(e0));
        let e2 = Ast::S.apply(Ast::K.apply(e1));
        let e3 = Ast::S.apply(Ast::K.apply(e2));
        let e4 = e3.apply(Ast::S).apply(Ast::K);
        let e5 = e4.apply(Ast::S).apply(Ast::K);
        assert_eq!(ast("11100"), e5);
    }

    #[test]
    fn jot_run_is_maximal() {
        let jot01 = Ast::S.apply(Ast::K.apply(Ast::I.apply(Ast::S).apply(Ast::K)));
        assert_eq!(ast("`01k"), jot01.clone().apply(Ast::K));
        // Neither whitespace nor a comment breaks a digit run.
        assert_eq!(ast("0 1"), jot01.clone());
        assert_eq!(ast("0 # zero\n1"), jot01);
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        assert_eq!(ast("` s # application\n k"), Ast::S.apply(Ast::K));
    }

    #[test]
    fn trailing_close_paren() {
        assert_eq!(err("k)").message(), "Unmatched trailing close-parenthesis!");
        assert_eq!(err(")").message(), "Unmatched trailing close-parenthesis!");
    }

    #[test]
    fn close_paren_in_operand_position() {
        assert_eq!(err("`)k").message(), "Mismatched close-parenthesis!");
        assert_eq!(err("(`)k)").message(), "Mismatched close-parenthesis!");
    }

    #[test]
    fn unterminated_group() {
        assert_eq!(err("(`sk").message(), "Premature end of program!");
        assert_eq!(err("`s").message(), "Premature end of program!");
    }

    #[test]
    fn invalid_character() {
        assert_eq!(err("x").message(), "Invalid character!");
        assert_eq!(err("(k]").message(), "Invalid character!");
    }

    #[test]
    fn report_marks_recent_input() {
        let report = err("`sk)").report("\"broken.lazy\"");
        assert!(report.starts_with("While parsing \"broken.lazy\":"));
        assert!(report.contains("Unmatched trailing close-parenthesis!"));
        assert!(report.ends_with("`sk) <--"));
    }

    #[test]
    fn report_points_at_the_failing_line() {
        let error = err("`sk\n)");
        assert_eq!(error.line, 2);
        assert!(error.report("\"two-line.lazy\"").ends_with("\n) <--"));
    }
}
