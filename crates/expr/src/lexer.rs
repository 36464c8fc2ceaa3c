//! Tokenizer for the restricted expression language.
//!
//! Converts source text into a stream of tokens. The grammar is
//! deliberately small: no string templates, no path-style variables, no
//! array/object literals — just arithmetic, comparisons, booleans,
//! identifiers and function calls.

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.current_pos;

        let Some((_, ch)) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::new(start, start), "");
        };

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '=' => {
                if self.match_char('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Error(self.source[start..self.current_pos].to_string())
                }
            }
            '!' => {
                if self.match_char('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '&' if self.match_char('&') => TokenKind::AndAnd,
            '|' if self.match_char('|') => TokenKind::OrOr,
            '"' => return self.lex_string(start),
            c if c.is_ascii_digit() => return self.lex_number(start),
            c if c.is_alphabetic() || c == '_' => return self.lex_ident(start),
            _ => TokenKind::Error(self.source[start..self.current_pos].to_string()),
        };

        Token::new(kind, Span::new(start, self.current_pos), &self.source[start..self.current_pos])
    }

    fn lex_string(&mut self, start: usize) -> Token {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some((_, '"')) => break,
                Some((_, c)) => value.push(c),
                None => break,
            }
        }
        Token::new(
            TokenKind::String(value),
            Span::new(start, self.current_pos),
            &self.source[start..self.current_pos],
        )
    }

    fn lex_number(&mut self, start: usize) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let lexeme = &self.source[start..self.current_pos];
        let value: f64 = lexeme.parse().unwrap_or(f64::NAN);
        Token::new(TokenKind::Number(value), Span::new(start, self.current_pos), lexeme)
    }

    fn lex_ident(&mut self, start: usize) -> Token {
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let lexeme = &self.source[start..self.current_pos];
        let kind = TokenKind::from_keyword(lexeme).unwrap_or_else(|| TokenKind::Ident(lexeme.to_string()));
        Token::new(kind, Span::new(start, self.current_pos), lexeme)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((pos, c)) = next {
            self.current_pos = pos + c.len_utf8();
        }
        next
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn tokenize(source: &'a str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_arithmetic() {
        assert_eq!(
            kinds("1 + 2 * 3"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.0),
                TokenKind::Star,
                TokenKind::Number(3.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_comparisons_and_booleans() {
        assert_eq!(
            kinds("temperature >= 30 && humidity < 50"),
            vec![
                TokenKind::Ident("temperature".into()),
                TokenKind::GtEq,
                TokenKind::Number(30.0),
                TokenKind::AndAnd,
                TokenKind::Ident("humidity".into()),
                TokenKind::Lt,
                TokenKind::Number(50.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_keywords_and_strings() {
        assert_eq!(
            kinds(r#"true != "on""#),
            vec![
                TokenKind::Bool(true),
                TokenKind::NotEq,
                TokenKind::String("on".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn bare_equals_is_an_error_token_not_silent_eof() {
        let tokens = Lexer::tokenize("temperature = 5 && x");
        assert_eq!(tokens[0], Token::new(TokenKind::Ident("temperature".into()), Span::new(0, 11), "temperature"));
        assert!(matches!(&tokens[1].kind, TokenKind::Error(lexeme) if lexeme == "="));
        // lexing continues past the bad token instead of stopping dead.
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Number(5.0)));
        assert!(tokens.last().unwrap().kind == TokenKind::Eof);
    }

    #[test]
    fn tokenizes_function_call_syntax() {
        assert_eq!(
            kinds("abs(-5)"),
            vec![
                TokenKind::Ident("abs".into()),
                TokenKind::LParen,
                TokenKind::Minus,
                TokenKind::Number(5.0),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }
}
