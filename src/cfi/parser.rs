//! CFI Parser
//!
//! Grammar (simplified):
//! ```text
//! cfi       = "epubcfi(" path ["," path "," path] ")"
//! path      = step+ [offset]
//! step      = "/" number [assertion] | "!" [assertion]
//! assertion = "[" text ["," text] (";" key "=" value)* "]"
//! offset    = ":" number [assertion] | "~" number | "@" number ":" number
//! ```
//!
//! Inside brackets `^` escapes the next character.

use thiserror::Error;

use super::types::*;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CfiParseError {
    #[error("Empty CFI string")]
    Empty,

    #[error("CFI must start with 'epubcfi('")]
    MissingPrefix,

    #[error("CFI must end with ')'")]
    MissingClosingParen,

    #[error("Expected '/' or '!' at position {0}")]
    ExpectedStep(usize),

    #[error("Expected number at position {0}")]
    ExpectedNumber(usize),

    #[error("Unclosed bracket at position {0}")]
    UnclosedBracket(usize),

    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("Range endpoints must not be empty")]
    InvalidRange,
}

/// Unescaped pieces of a bracketed assertion
#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Comma,
    Semicolon,
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), CfiParseError> {
        if self.skip_if(expected) {
            Ok(())
        } else {
            Err(CfiParseError::UnexpectedChar(
                self.peek().unwrap_or('\0'),
                self.pos,
            ))
        }
    }

    fn skip_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn parse_number(&mut self) -> Result<u32, CfiParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(CfiParseError::ExpectedNumber(start));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| CfiParseError::ExpectedNumber(start))
    }

    fn parse_float(&mut self) -> Result<f64, CfiParseError> {
        let start = self.pos;
        self.skip_if('-');
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.advance();
        }
        if self.skip_if('.') {
            while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
                self.advance();
            }
        }
        if self.pos == start {
            return Err(CfiParseError::ExpectedNumber(start));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| CfiParseError::ExpectedNumber(start))
    }

    /// Tokenize bracket content up to (not including) the closing `]`
    fn parse_bracket_content(&mut self) -> Result<Vec<Token>, CfiParseError> {
        let start = self.pos;
        let mut tokens = Vec::new();
        let mut current = String::new();

        while let Some(ch) = self.peek() {
            match ch {
                '^' => {
                    self.advance();
                    match self.advance() {
                        Some(escaped) => current.push(escaped),
                        None => return Err(CfiParseError::UnclosedBracket(start)),
                    }
                }
                ']' => {
                    tokens.push(Token::Text(current));
                    return Ok(tokens);
                }
                '[' => return Err(CfiParseError::UnexpectedChar('[', self.pos)),
                ',' | ';' => {
                    tokens.push(Token::Text(std::mem::take(&mut current)));
                    tokens.push(if ch == ',' {
                        Token::Comma
                    } else {
                        Token::Semicolon
                    });
                    self.advance();
                }
                other => {
                    current.push(other);
                    self.advance();
                }
            }
        }

        Err(CfiParseError::UnclosedBracket(start))
    }

    /// `[id]` or `[prefix,suffix;k=v]`; `offset_context` forces a text assertion
    fn parse_assertion(
        &mut self,
        offset_context: bool,
    ) -> Result<(Option<String>, Option<TextAssertion>), CfiParseError> {
        if !self.skip_if('[') {
            return Ok((None, None));
        }
        let tokens = self.parse_bracket_content()?;
        self.expect(']')?;

        let has_comma = tokens.contains(&Token::Comma);
        if !has_comma && !offset_context {
            // ID assertion; parameters after ';' are not meaningful here
            let id = match tokens.into_iter().next() {
                Some(Token::Text(text)) => text,
                _ => String::new(),
            };
            return Ok((Some(id), None));
        }

        let mut assertion = TextAssertion::default();
        let mut iter = tokens.into_iter().peekable();

        if let Some(Token::Text(text)) = iter.next() {
            if !text.is_empty() {
                assertion.prefix = Some(text);
            }
        }
        if iter.peek() == Some(&Token::Comma) {
            iter.next();
            if let Some(Token::Text(text)) = iter.next() {
                if !text.is_empty() {
                    assertion.suffix = Some(text);
                }
            }
        }
        while let Some(token) = iter.next() {
            if token != Token::Semicolon {
                continue;
            }
            if let Some(Token::Text(param)) = iter.next() {
                if let Some((key, value)) = param.split_once('=') {
                    let key = key.trim();
                    if !key.is_empty() {
                        assertion
                            .parameters
                            .push((key.to_string(), value.trim().to_string()));
                    }
                }
            }
        }

        Ok((None, Some(assertion)))
    }

    fn parse_step(&mut self) -> Result<CfiStep, CfiParseError> {
        let step_type = if self.skip_if('/') {
            StepType::Element(self.parse_number()?)
        } else if self.skip_if('!') {
            StepType::Indirection
        } else {
            return Err(CfiParseError::ExpectedStep(self.pos));
        };
        let (id_assertion, text_assertion) = self.parse_assertion(false)?;
        Ok(CfiStep {
            step_type,
            id_assertion,
            text_assertion,
        })
    }

    fn parse_path(&mut self) -> Result<CfiPath, CfiParseError> {
        let mut steps = Vec::new();
        while matches!(self.peek(), Some('/') | Some('!')) {
            steps.push(self.parse_step()?);
        }

        let mut path = CfiPath::with_steps(steps);

        if self.skip_if(':') {
            let offset = self.parse_number()?;
            let (_, assertion) = self.parse_assertion(true)?;
            path.character_offset = Some(CharacterOffset { offset, assertion });
        }

        if self.skip_if('~') {
            let seconds = self.parse_float()?;
            path.temporal_offset = Some(TemporalOffset { seconds });
        }

        if self.skip_if('@') {
            let x = self.parse_float()?;
            self.expect(':')?;
            let y = self.parse_float()?;
            path.spatial_offset = Some(SpatialOffset { x, y });
        }

        Ok(path)
    }

    fn parse_cfi(&mut self) -> Result<Cfi, CfiParseError> {
        if !self.skip_str("epubcfi(") {
            return Err(CfiParseError::MissingPrefix);
        }

        let path = self.parse_path()?;

        let range = if self.skip_if(',') {
            let start = self.parse_path()?;
            self.expect(',')?;
            let end = self.parse_path()?;
            if start == CfiPath::default() || end == CfiPath::default() {
                return Err(CfiParseError::InvalidRange);
            }
            Some(CfiRange { start, end })
        } else {
            None
        };

        if !self.skip_if(')') {
            return Err(CfiParseError::MissingClosingParen);
        }

        Ok(Cfi { path, range })
    }
}

/// Parse a CFI string
pub fn parse(input: &str) -> Result<Cfi, CfiParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CfiParseError::Empty);
    }

    let mut parser = Parser::new(input);
    let cfi = parser.parse_cfi()?;

    if !parser.at_end() {
        return Err(CfiParseError::UnexpectedChar(
            parser.peek().unwrap_or('\0'),
            parser.pos,
        ));
    }

    Ok(cfi)
}

pub fn try_parse(input: &str) -> Option<Cfi> {
    parse(input).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_indices(path: &CfiPath) -> Vec<Option<u32>> {
        path.steps.iter().map(CfiStep::element_index).collect()
    }

    #[test]
    fn test_parse_point_in_second_chapter() {
        let cfi = parse("epubcfi(/6/4[ch2]!/4/4/1:12)").unwrap();
        assert_eq!(
            element_indices(&cfi.path),
            vec![Some(6), Some(4), None, Some(4), Some(4), Some(1)]
        );
        assert!(cfi.path.steps[2].is_indirection());
        assert_eq!(cfi.path.steps[1].id_assertion.as_deref(), Some("ch2"));
        assert_eq!(cfi.path.character_offset.as_ref().map(|o| o.offset), Some(12));
        assert_eq!(cfi.spine_index(), Some(1));
        assert!(!cfi.is_range());
    }

    #[test]
    fn test_parse_character_offset_with_text_assertion() {
        let cfi = parse("epubcfi(/6/4!/4/2/1:42[hello,world;s=b])").unwrap();
        let offset = cfi.path.character_offset.as_ref().unwrap();
        assert_eq!(offset.offset, 42);
        let assertion = offset.assertion.as_ref().unwrap();
        assert_eq!(assertion.prefix.as_deref(), Some("hello"));
        assert_eq!(assertion.suffix.as_deref(), Some("world"));
        assert_eq!(assertion.parameters, vec![("s".to_string(), "b".to_string())]);
    }

    #[test]
    fn test_side_bias_only_assertion() {
        let cfi = parse("epubcfi(/6/4!/4/2/1:0[;s=a])").unwrap();
        let assertion = cfi.path.character_offset.unwrap().assertion.unwrap();
        assert_eq!(assertion.prefix, None);
        assert_eq!(assertion.parameters.len(), 1);
    }

    #[test]
    fn test_parse_selection_range() {
        let cfi = parse("epubcfi(/6/4[ch2]!/4/4,/1:12,/2/1:14)").unwrap();
        assert!(cfi.is_range());
        let range = cfi.range.as_ref().unwrap();
        assert_eq!(element_indices(&range.start), vec![Some(1)]);
        assert_eq!(element_indices(&range.end), vec![Some(2), Some(1)]);
        assert_eq!(range.end.character_offset.as_ref().map(|o| o.offset), Some(14));
        assert_eq!(
            cfi.collapse_to_start().to_string(),
            "epubcfi(/6/4[ch2]!/4/4/1:12)"
        );
    }

    #[test]
    fn test_parse_temporal_and_spatial_offsets() {
        let cfi = parse("epubcfi(/6/4!/4~12.5)").unwrap();
        assert_eq!(cfi.path.temporal_offset.unwrap().seconds, 12.5);

        let cfi = parse("epubcfi(/6/4!/4@50.5:25)").unwrap();
        let spatial = cfi.path.spatial_offset.unwrap();
        assert_eq!(spatial.x, 50.5);
        assert_eq!(spatial.y, 25.0);
    }

    #[test]
    fn test_roundtrip() {
        for original in [
            "epubcfi(/6/4[chapter1]!/4/2/1:42)",
            "epubcfi(/6/4!/4/2,/1:0,/1:10)",
            "epubcfi(/6/2[a^]b]!/4)",
            "epubcfi(/6/4!/4/2/1:3[x^,y,z])",
        ] {
            assert_eq!(parse(original).unwrap().to_string(), original);
        }
    }

    #[test]
    fn test_circumflex_escapes() {
        let cfi = parse("epubcfi(/6/2[intro^]notes]!/4)").unwrap();
        assert_eq!(cfi.path.steps[1].id_assertion.as_deref(), Some("intro]notes"));

        let cfi = parse("epubcfi(/6/2!/4/1:7[cabbage^,old,rag])").unwrap();
        let assertion = cfi.path.character_offset.unwrap().assertion.unwrap();
        assert_eq!(assertion.prefix.as_deref(), Some("cabbage,old"));
        assert_eq!(assertion.suffix.as_deref(), Some("rag"));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse(""), Err(CfiParseError::Empty));
        assert_eq!(parse("/6/4"), Err(CfiParseError::MissingPrefix));
        assert_eq!(parse("epubcfi(/6/4"), Err(CfiParseError::MissingClosingParen));
        assert!(matches!(parse("epubcfi(/6/x)"), Err(CfiParseError::ExpectedNumber(_))));
        assert!(matches!(parse("epubcfi(/6/4[open)"), Err(CfiParseError::UnclosedBracket(_))));
        assert_eq!(parse("epubcfi(/6/4,,)"), Err(CfiParseError::InvalidRange));
        assert!(matches!(parse("epubcfi(/6/4)x"), Err(CfiParseError::UnexpectedChar('x', _))));
        assert!(try_parse("nonsense").is_none());
    }
}
