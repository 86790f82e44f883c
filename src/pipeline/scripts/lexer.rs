// src/pipeline/scripts/lexer.rs

//! A small JavaScript tokenizer.
//!
//! It knows exactly enough of the grammar to find module syntax and to
//! strip comments safely: string, template and regex literals are single
//! tokens, so `/*` or `import` inside them is never mistaken for code.
//! Concatenating the text of every token reproduces the source.

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    LineComment,
    BlockComment,
    Ident,
    Number,
    Str,
    /// One chunk of a template literal: from the opening backtick (or the
    /// `}` closing a substitution) up to the next `${` or closing backtick.
    Template,
    Regex,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset into the source.
    pub start: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }

    pub fn has_newline(&self) -> bool {
        self.text.contains('\n')
    }
}

/// Keywords after which a `/` starts a regex literal rather than a division.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>> {
    let mut lexer = Lexer {
        src,
        pos: 0,
        tokens: Vec::new(),
        braces: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

/// Drop comments, indentation and blank lines.
///
/// Line breaks between tokens survive (one per run) so automatic semicolon
/// insertion still applies. Other whitespace collapses to a single space.
/// Literal contents are untouched.
pub fn minify(src: &str) -> Result<String> {
    #[derive(PartialEq)]
    enum Gap {
        None,
        Space,
        Newline,
    }

    let mut out = String::with_capacity(src.len());
    let mut gap = Gap::None;
    for tok in tokenize(src)? {
        if tok.is_trivia() {
            let breaks = tok.has_newline() || tok.kind == TokenKind::LineComment;
            if breaks {
                gap = Gap::Newline;
            } else if gap == Gap::None {
                gap = Gap::Space;
            }
            continue;
        }
        if !out.is_empty() {
            match gap {
                Gap::Newline => out.push('\n'),
                Gap::Space => out.push(' '),
                Gap::None => {}
            }
        }
        out.push_str(tok.text);
        gap = Gap::None;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

/// 1-based line number of a byte offset.
pub fn line_of(src: &str, offset: usize) -> usize {
    src[..offset.min(src.len())].matches('\n').count() + 1
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Token<'a>>,
    /// Open braces; `true` marks a template substitution `${`.
    braces: Vec<bool>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<()> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            let kind = match c {
                c if c.is_whitespace() => {
                    self.eat_while(char::is_whitespace);
                    TokenKind::Whitespace
                }
                '/' if self.peek_at(1) == Some('/') => {
                    self.eat_while(|c| c != '\n');
                    TokenKind::LineComment
                }
                '/' if self.peek_at(1) == Some('*') => {
                    self.block_comment(start)?;
                    TokenKind::BlockComment
                }
                '/' if self.regex_allowed() => {
                    self.regex(start)?;
                    TokenKind::Regex
                }
                '\'' | '"' => {
                    self.string(c, start)?;
                    TokenKind::Str
                }
                '`' => {
                    self.bump();
                    self.template(start)?;
                    TokenKind::Template
                }
                '}' if self.braces.last() == Some(&true) => {
                    self.braces.pop();
                    self.bump();
                    self.template(start)?;
                    TokenKind::Template
                }
                '{' => {
                    self.braces.push(false);
                    self.bump();
                    TokenKind::Punct
                }
                '}' => {
                    self.braces.pop();
                    self.bump();
                    TokenKind::Punct
                }
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) =>
                {
                    self.eat_while(|c| c.is_alphanumeric() || c == '.' || c == '_');
                    TokenKind::Number
                }
                c if is_ident_start(c) => {
                    self.eat_while(is_ident_part);
                    TokenKind::Ident
                }
                _ => {
                    self.bump();
                    TokenKind::Punct
                }
            };
            self.tokens.push(Token {
                kind,
                text: &self.src[start..self.pos],
                start,
            });
        }

        if self.braces.contains(&true) {
            bail!("unterminated template literal");
        }
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.tokens.iter().rev().find(|t| !t.is_trivia()) else {
            return true;
        };
        match prev.kind {
            TokenKind::Punct => !matches!(prev.text, ")" | "]"),
            TokenKind::Ident => REGEX_KEYWORDS.contains(&prev.text),
            TokenKind::Template => prev.text.ends_with("${"),
            _ => false,
        }
    }

    fn block_comment(&mut self, start: usize) -> Result<()> {
        match self.src[self.pos + 2..].find("*/") {
            Some(idx) => {
                self.pos += 2 + idx + 2;
                Ok(())
            }
            None => bail!("unterminated comment on line {}", line_of(self.src, start)),
        }
    }

    fn string(&mut self, quote: char, start: usize) -> Result<()> {
        self.bump();
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => return Ok(()),
                Some('\n') | None => {
                    bail!("unterminated string literal on line {}", line_of(self.src, start))
                }
                Some(_) => {}
            }
        }
    }

    /// Scan a template chunk; the opening delimiter is already consumed.
    fn template(&mut self, start: usize) -> Result<()> {
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some('`') => return Ok(()),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    self.braces.push(true);
                    return Ok(());
                }
                Some(_) => {}
                None => bail!("unterminated template literal on line {}", line_of(self.src, start)),
            }
        }
    }

    fn regex(&mut self, start: usize) -> Result<()> {
        self.bump();
        let mut in_class = false;
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some('\n') | None => {
                    bail!("unterminated regex literal on line {}", line_of(self.src, start))
                }
                Some(_) => {}
            }
        }
        self.eat_while(is_ident_part);
        Ok(())
    }
}

fn is_ident_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, &str)> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn tokens_cover_the_source() {
        let src = "const s = `a ${b + `c${d}`} e`; // end\n/* x */ f(/re[/]/g, 4 / 2);\n";
        let joined: String = tokenize(src).unwrap().iter().map(|t| t.text).collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn comment_markers_inside_literals_are_not_comments() {
        let toks = kinds("var a = '/* no */', b = \"// no\";");
        assert!(toks.contains(&(TokenKind::Str, "'/* no */'")));
        assert!(toks.contains(&(TokenKind::Str, "\"// no\"")));
    }

    #[test]
    fn slash_after_value_is_division() {
        let toks = kinds("x = a / b / c;");
        assert_eq!(toks.iter().filter(|(k, _)| *k == TokenKind::Regex).count(), 0);

        let toks = kinds("return /ab+c/i.test(s);");
        assert_eq!(toks[1], (TokenKind::Regex, "/ab+c/i"));
    }

    #[test]
    fn template_substitutions_nest() {
        let toks = kinds("`x${ {a: 1}.a }y`");
        assert_eq!(toks.first().unwrap(), &(TokenKind::Template, "`x${"));
        assert_eq!(toks.last().unwrap(), &(TokenKind::Template, "}y`"));
    }

    #[test]
    fn minify_keeps_code_around_inline_comments() {
        let src = "/* banner */ var a = 1;\nvar b = 2; /* tail\n */\n\n    window.x = a + b; // sum\n";
        assert_eq!(minify(src).unwrap(), "var a = 1;\nvar b = 2;\nwindow.x = a + b;\n");
    }

    #[test]
    fn minify_leaves_literals_alone() {
        let src = "const t = `line one\n    // indented`;\nconst s = '/* kept */';\n";
        assert_eq!(minify(src).unwrap(), src);
    }

    #[test]
    fn unterminated_literals_report_their_line() {
        let err = tokenize("ok();\nvar s = 'open\n").unwrap_err();
        assert_eq!(err.to_string(), "unterminated string literal on line 2");
        assert!(tokenize("/* open").is_err());
        assert!(tokenize("`open ${").is_err());
    }
}
