use crate::error::SceneError;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Number(f64),
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eof,
}

#[derive(Clone, Debug)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: u32,
    pub col: u32,
}

/// Output of [`tokenize`]: the token stream plus the `#VRML...` header line, if any.
pub(crate) struct Lexed {
    pub tokens: Vec<Token>,
    pub header: Option<String>,
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Cursor<'a> {
    fn peek(&mut self) -> Option<char> { self.chars.peek().copied() }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' { self.line += 1; self.col = 1; } else { self.col += 1; }
        Some(c)
    }

    fn err(&self, msg: impl Into<String>) -> SceneError {
        SceneError::Parse { line: self.line, col: self.col, msg: msg.into() }
    }
}

fn is_ident_start(c: char) -> bool { c.is_ascii_alphabetic() || c == '_' }
fn is_ident_char(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' || c == '-' }
fn is_number_start(c: char) -> bool { c.is_ascii_digit() || c == '-' || c == '+' || c == '.' }

pub(crate) fn tokenize(src: &str) -> Result<Lexed, SceneError> {
    let mut cur = Cursor { chars: src.chars().peekable(), line: 1, col: 1 };
    let mut tokens = Vec::new();
    let mut header = None;

    while let Some(c) = cur.peek() {
        let (line, col) = (cur.line, cur.col);
        match c {
            // commas are whitespace in this syntax
            c if c.is_whitespace() || c == ',' => { cur.bump(); }
            '#' => {
                let mut text = String::new();
                while let Some(c) = cur.peek() {
                    if c == '\n' { break; }
                    text.push(c);
                    cur.bump();
                }
                if line == 1 && tokens.is_empty() && text.starts_with("#VRML") {
                    header = Some(text.trim_end().to_string());
                }
            }
            '{' => { cur.bump(); tokens.push(Token { tok: Tok::LBrace, line, col }); }
            '}' => { cur.bump(); tokens.push(Token { tok: Tok::RBrace, line, col }); }
            '[' => { cur.bump(); tokens.push(Token { tok: Tok::LBracket, line, col }); }
            ']' => { cur.bump(); tokens.push(Token { tok: Tok::RBracket, line, col }); }
            '"' => {
                cur.bump();
                let mut s = String::new();
                loop {
                    match cur.bump() {
                        None => return Err(SceneError::Parse { line, col, msg: "unterminated string".into() }),
                        Some('"') => break,
                        Some('\\') => match cur.bump() {
                            Some(e) => s.push(e),
                            None => return Err(cur.err("dangling escape at end of input")),
                        },
                        Some(ch) => s.push(ch),
                    }
                }
                tokens.push(Token { tok: Tok::Str(s), line, col });
            }
            c if is_number_start(c) => {
                let mut raw = String::new();
                while let Some(c) = cur.peek() {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') {
                        raw.push(c);
                        cur.bump();
                    } else {
                        break;
                    }
                }
                let v: f64 = raw.parse().map_err(|_| SceneError::Parse {
                    line, col, msg: format!("invalid number `{raw}`"),
                })?;
                tokens.push(Token { tok: Tok::Number(v), line, col });
            }
            c if is_ident_start(c) => {
                let mut s = String::new();
                while let Some(c) = cur.peek() {
                    if !is_ident_char(c) { break; }
                    s.push(c);
                    cur.bump();
                }
                tokens.push(Token { tok: Tok::Ident(s), line, col });
            }
            other => return Err(cur.err(format!("unexpected character `{other}`"))),
        }
    }
    tokens.push(Token { tok: Tok::Eof, line: cur.line, col: cur.col });
    Ok(Lexed { tokens, header })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().tokens.into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn header_is_kept_other_comments_dropped() {
        let lx = tokenize("#VRML_SIM R2023b utf8\n# note\nSolid { }").unwrap();
        assert_eq!(lx.header.as_deref(), Some("#VRML_SIM R2023b utf8"));
        assert_eq!(lx.tokens.len(), 4);
    }

    #[test]
    fn numbers_strings_and_commas() {
        assert_eq!(
            toks(r#"1, -2.5e1 "a \"b\"""#),
            vec![Tok::Number(1.0), Tok::Number(-25.0), Tok::Str("a \"b\"".into()), Tok::Eof]
        );
    }

    #[test]
    fn bad_number_reports_position() {
        let err = tokenize("Solid {\n  mass 1.2.3\n}").err().unwrap();
        match err {
            SceneError::Parse { line, col, .. } => assert_eq!((line, col), (2, 8)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
