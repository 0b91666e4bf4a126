//! Tokenizer for rule expressions.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),

    // Keywords
    Return,
    If,
    Else,
    Let,
    True,
    False,
    Null,
    Undefined,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Semi,
    Question,
    Colon,

    // Operators
    Bang,
    Assign,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Eof,
}

impl Token {
    /// Short description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string '{}'", s),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// A token with the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Split an expression source into tokens. The last token is always `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut lexer = Lexer {
        source,
        chars: source.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn next_token(&mut self) -> Result<Spanned, ExprError> {
        self.skip_trivia()?;

        let Some(&(offset, c)) = self.chars.peek() else {
            return Ok(Spanned {
                token: Token::Eof,
                offset: self.source.len(),
            });
        };

        let token = match c {
            '0'..='9' => self.number(offset)?,
            '.' if self.peek_second().is_some_and(|n| n.is_ascii_digit()) => {
                self.number(offset)?
            }
            '\'' | '"' | '`' => self.string(offset, c)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => self.word(),
            _ => self.punct(offset, c)?,
        };

        Ok(Spanned { token, offset })
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    fn skip_trivia(&mut self) -> Result<(), ExprError> {
        loop {
            match self.chars.peek() {
                Some(&(_, c)) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some(&(offset, '/')) => match self.peek_second() {
                    Some('/') => {
                        while let Some(&(_, c)) = self.chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.chars.next();
                        }
                    }
                    Some('*') => {
                        self.chars.next();
                        self.chars.next();
                        let mut previous = '\0';
                        loop {
                            match self.chars.next() {
                                Some((_, '/')) if previous == '*' => break,
                                Some((_, c)) => previous = c,
                                None => {
                                    return Err(ExprError::syntax(offset, "unterminated comment"))
                                }
                            }
                        }
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn number(&mut self, offset: usize) -> Result<Token, ExprError> {
        let mut end = offset;
        let mut seen_exponent = false;
        while let Some(&(i, c)) = self.chars.peek() {
            let accept = c.is_ascii_digit()
                || c == '.'
                || (!seen_exponent && (c == 'e' || c == 'E'))
                || ((c == '+' || c == '-')
                    && matches!(self.source[..i].chars().last(), Some('e' | 'E')));
            if !accept {
                break;
            }
            if c == 'e' || c == 'E' {
                seen_exponent = true;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        let text = &self.source[offset..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ExprError::syntax(offset, format!("invalid number '{}'", text)))
    }

    fn string(&mut self, offset: usize, quote: char) -> Result<Token, ExprError> {
        self.chars.next();
        let mut text = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Ok(Token::Str(text)),
                Some((i, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, 'r')) => text.push('\r'),
                    Some((_, '0')) => text.push('\0'),
                    Some((_, 'u')) => text.push(self.unicode_escape(i)?),
                    Some((_, other)) => text.push(other),
                    None => break,
                },
                Some((_, c)) => text.push(c),
                None => break,
            }
        }
        Err(ExprError::syntax(offset, "unterminated string literal"))
    }

    fn unicode_escape(&mut self, offset: usize) -> Result<char, ExprError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .chars
                .next()
                .and_then(|(_, c)| c.to_digit(16))
                .ok_or_else(|| ExprError::syntax(offset, "invalid unicode escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| ExprError::syntax(offset, "invalid unicode escape"))
    }

    fn word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match word.as_str() {
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "let" | "const" | "var" => Token::Let,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            _ => Token::Ident(word),
        }
    }

    fn punct(&mut self, offset: usize, c: char) -> Result<Token, ExprError> {
        self.chars.next();
        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '.' => Token::Dot,
            ',' => Token::Comma,
            ';' => Token::Semi,
            '?' => Token::Question,
            ':' => Token::Colon,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::StrictNotEq
                    } else {
                        Token::NotEq
                    }
                } else {
                    Token::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::StrictEq
                    } else {
                        Token::Eq
                    }
                } else {
                    Token::Assign
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '&' if self.eat('&') => Token::And,
            '|' if self.eat('|') => Token::Or,
            other => {
                return Err(ExprError::syntax(
                    offset,
                    format!("unexpected character '{}'", other),
                ))
            }
        };
        Ok(token)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek().is_some_and(|&(_, c)| c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("fieldValue == 'X'"),
            vec![
                Token::Ident("fieldValue".to_string()),
                Token::Eq,
                Token::Str("X".to_string()),
                Token::Eof
            ]
        );
        assert_eq!(kinds("a !== b")[1], Token::StrictNotEq);
        assert_eq!(kinds("a <= b")[1], Token::Le);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("10")[0], Token::Number(10.0));
        assert_eq!(kinds("2.5e2")[0], Token::Number(250.0));
        assert_eq!(kinds(".5")[0], Token::Number(0.5));
    }

    #[test]
    fn test_keywords_and_escapes() {
        assert_eq!(
            kinds(r#"return "a\"b";"#),
            vec![
                Token::Return,
                Token::Str("a\"b".to_string()),
                Token::Semi,
                Token::Eof
            ]
        );
        assert_eq!(kinds("const x")[0], Token::Let);
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(kinds("a // trailing\n && /* inline */ b").len(), 4);
    }

    #[test]
    fn test_offsets() {
        let tokens = tokenize("ab + 1").unwrap();
        assert_eq!(tokens[1].offset, 3);
        assert_eq!(tokens[3].offset, 6);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            tokenize("'open"),
            Err(ExprError::Syntax { offset: 0, .. })
        ));
    }

    #[test]
    fn test_single_ampersand_rejected() {
        assert!(tokenize("a & b").is_err());
    }
}
