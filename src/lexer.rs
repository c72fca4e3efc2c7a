use crate::{
    ast::Token,
    error::{Error, ErrorList},
};

use crate::error::Position;

type ErrorHandler = Box<dyn FnMut(&Error) + Send>;

/// Scanner turning script source into `(position, token, literal)` triples.
///
/// Spaces, tabs and carriage returns are always skipped. Newlines are
/// whitespace too, unless line-terminator mode is on, in which case each one
/// is reported as a [`Token::Semicolon`] with literal `"\n"`. The parser
/// switches the mode on inside `steps { }` and `when { }` blocks.
///
/// Lexical errors never stop the scan: they are recorded (and passed to the
/// error handler, if one is installed) and scanning resumes after the
/// offending input.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    line_terminators: bool,
    errors: ErrorList,
    handler: Option<ErrorHandler>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            line_terminators: false,
            errors: ErrorList::new(),
            handler: None,
        }
    }

    /// Installs a callback invoked for every lexical error as it is found.
    pub fn with_error_handler(mut self, handler: impl FnMut(&Error) + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn set_line_terminators(&mut self, enabled: bool) {
        self.line_terminators = enabled;
    }

    pub fn line_terminators(&self) -> bool {
        self.line_terminators
    }

    /// Errors reported so far; the internal list is left empty.
    pub fn take_errors(&mut self) -> ErrorList {
        std::mem::take(&mut self.errors)
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn error(&mut self, pos: Position, message: impl Into<String>) {
        let error = Error::new(pos, message.into());
        if let Some(handler) = self.handler.as_mut() {
            handler(&error);
        }
        self.errors.push(error);
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            match ch {
                ' ' | '\t' | '\r' => self.advance(),
                '\n' if !self.line_terminators => self.advance(),
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_number(&mut self) -> String {
        let mut number = String::new();
        self.read_digits(&mut number);

        // A '.' only belongs to the number when digits follow, so `1..3`
        // scans as a range.
        if self.current_char() == Some('.') && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
        {
            number.push('.');
            self.advance();
            self.read_digits(&mut number);
        }
        number
    }

    fn read_digits(&mut self, into: &mut String) {
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                into.push(ch);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Reads a quoted string body. Escapes are validated but kept verbatim;
    /// the parser and the interpolator decide how to cook them.
    fn read_string(&mut self, quote: char) -> String {
        let start = self.pos();
        let mut result = String::new();
        self.advance(); // opening quote

        loop {
            match self.current_char() {
                Some(c) if c == quote => {
                    self.advance();
                    return result;
                }
                Some('\\') => {
                    let escape_pos = self.pos();
                    self.advance();
                    match self.current_char() {
                        Some(c) if c == '\\' || c == '$' || c == quote => {
                            result.push('\\');
                            result.push(c);
                            self.advance();
                        }
                        Some('\n') | None => {
                            self.error(start, "string literal not terminated");
                            return result;
                        }
                        Some(c) => {
                            self.error(escape_pos, "escape sequence not terminated");
                            result.push(c);
                            self.advance();
                        }
                    }
                }
                Some('\n') | None => {
                    self.error(start, "string literal not terminated");
                    return result;
                }
                Some(c) => {
                    result.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Consumes the current character and one optional follower, picking the
    /// two-character token when the follower matches.
    fn switch2(&mut self, single: Token, follower: char, double: Token) -> Token {
        self.advance();
        if self.current_char() == Some(follower) {
            self.advance();
            double
        } else {
            single
        }
    }

    fn switch3(
        &mut self,
        single: Token,
        first: (char, Token),
        second: (char, Token),
    ) -> Token {
        self.advance();
        match self.current_char() {
            Some(c) if c == first.0 => {
                self.advance();
                first.1
            }
            Some(c) if c == second.0 => {
                self.advance();
                second.1
            }
            _ => single,
        }
    }

    /// Returns the next token with its position and literal text.
    pub fn scan(&mut self) -> (Position, Token, String) {
        loop {
            self.skip_whitespace();
            let pos = self.pos();

            let Some(ch) = self.current_char() else {
                return (pos, Token::Eof, String::new());
            };

            let token = match ch {
                '\n' => {
                    self.advance();
                    return (pos, Token::Semicolon, "\n".to_string());
                }
                c if c.is_alphabetic() || c == '_' => {
                    let ident = self.read_identifier();
                    return (pos, Token::lookup(&ident), ident);
                }
                c if c.is_ascii_digit() => {
                    let number = self.read_number();
                    return (pos, Token::Number, number);
                }
                '"' => {
                    let body = self.read_string('"');
                    return (pos, Token::String, body);
                }
                '\'' => {
                    let body = self.read_string('\'');
                    return (pos, Token::RawString, body);
                }
                '/' if self.peek_char(1) == Some('/') => {
                    self.skip_comment();
                    continue;
                }
                '+' => self.switch3(Token::Add, ('+', Token::Inc), ('=', Token::AddAssign)),
                '-' => self.switch3(Token::Sub, ('-', Token::Dec), ('=', Token::SubAssign)),
                '*' => self.switch3(Token::Mul, ('*', Token::DoubleStar), ('=', Token::MulAssign)),
                '/' => self.switch2(Token::Quo, '=', Token::QuoAssign),
                '%' => self.switch2(Token::Rem, '=', Token::RemAssign),
                '=' => self.switch3(Token::Assign, ('=', Token::Eql), ('>', Token::Arrow)),
                ':' => self.switch2(Token::Colon, '=', Token::Define),
                '!' => self.switch2(Token::Not, '=', Token::Neq),
                '<' => self.switch2(Token::Lss, '=', Token::Leq),
                '>' => self.switch2(Token::Gtr, '=', Token::Geq),
                '.' => self.switch2(Token::Period, '.', Token::Range),
                '&' if self.peek_char(1) == Some('&') => {
                    self.advance();
                    self.advance();
                    Token::LAnd
                }
                '|' if self.peek_char(1) == Some('|') => {
                    self.advance();
                    self.advance();
                    Token::LOr
                }
                '(' | ')' | '{' | '}' | '[' | ']' | ',' | ';' => {
                    self.advance();
                    match ch {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '{' => Token::LBrace,
                        '}' => Token::RBrace,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        ',' => Token::Comma,
                        _ => Token::Semicolon,
                    }
                }
                '\0' => {
                    self.advance();
                    self.error(pos, "illegal character NUL");
                    return (pos, Token::Illegal, ch.to_string());
                }
                _ => {
                    self.advance();
                    self.error(pos, format!("illegal character {:?}", ch));
                    return (pos, Token::Illegal, ch.to_string());
                }
            };

            return (pos, token, token.as_str().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let (_, tok, _) = lexer.scan();
            out.push(tok);
            if tok == Token::Eof {
                return out;
            }
        }
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokens("pipeline stages stage steps when vars"),
            vec![
                Token::Pipeline,
                Token::Stages,
                Token::Stage,
                Token::Steps,
                Token::When,
                Token::Vars,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_positions_track_lines() {
        let mut lexer = Lexer::new("x\n  y");
        assert_eq!(lexer.scan().0, Position::new(1, 1));
        assert_eq!(lexer.scan().0, Position::new(2, 3));
    }

    #[test]
    fn test_range_is_not_a_fraction() {
        let mut lexer = Lexer::new("1..3");
        assert_eq!(lexer.scan(), (Position::new(1, 1), Token::Number, "1".to_string()));
        assert_eq!(lexer.scan().1, Token::Range);
        assert_eq!(lexer.scan().2, "3");
    }
}
