#[cfg(test)]
mod lexer_tests {
    use crate::lexer::*;

    #[test]
    fn test_function_header_tokens() {
        let mut lexer = Lexer::new("fn main() -> i32 { return 42; }");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(tokens[0].token, Token::Fn);
        assert_eq!(tokens[1].token, Token::Identifier("main".to_string()));
        assert_eq!(tokens[2].token, Token::OpenParen);
        assert_eq!(tokens[3].token, Token::CloseParen);
        assert_eq!(tokens[4].token, Token::Arrow);
        assert_eq!(tokens[5].token, Token::Identifier("i32".to_string()));
        assert_eq!(tokens[6].token, Token::OpenBrace);
        assert_eq!(tokens[7].token, Token::Return);
        assert_eq!(tokens[8].token, Token::IntLiteral(42));
        assert_eq!(tokens[9].token, Token::Semicolon);
        assert_eq!(tokens[10].token, Token::CloseBrace);
        assert_eq!(tokens[11].token, Token::Eof);
    }

    #[test]
    fn test_keywords() {
        let mut lexer = Lexer::new("extern struct var if else while for break continue as");
        let tokens = lexer.tokenize().unwrap();

        let expected = [
            Token::Extern,
            Token::Struct,
            Token::Var,
            Token::If,
            Token::Else,
            Token::While,
            Token::For,
            Token::Break,
            Token::Continue,
            Token::As,
            Token::Eof,
        ];
        let actual: Vec<Token> = tokens.into_iter().map(|t| t.token).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_operators() {
        let mut lexer = Lexer::new("+ - * / = & ++ -- < > <= >= == != && || ->");
        let tokens = lexer.tokenize().unwrap();

        let expected = [
            Token::Plus,
            Token::Minus,
            Token::Star,
            Token::Slash,
            Token::Equals,
            Token::Ampersand,
            Token::PlusPlus,
            Token::MinusMinus,
            Token::Less,
            Token::Greater,
            Token::LessEqual,
            Token::GreaterEqual,
            Token::EqualEqual,
            Token::NotEqual,
            Token::LogicalAnd,
            Token::LogicalOr,
            Token::Arrow,
        ];
        for (token, expected) in tokens.iter().zip(expected.iter()) {
            assert_eq!(&token.token, expected);
        }
    }

    #[test]
    fn test_string_literal_keeps_escapes_raw() {
        let mut lexer = Lexer::new(r#"puts("Hello\n\"G\"")"#);
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(
            tokens[2].token,
            Token::StringLiteral(r#"Hello\n\"G\""#.to_string())
        );
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("var s: u8* = \"oops;\n");
        let err = lexer.tokenize().unwrap_err();
        assert!(err.message.contains("Unterminated string"));
        assert_eq!(err.location, Some(SourceLocation::new(1, 14)));
    }

    #[test]
    fn test_line_comments_are_skipped() {
        let mut lexer = Lexer::new("// header\nvar x: i32; // trailing\n");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(tokens[0].token, Token::Var);
        assert_eq!(tokens[0].location, SourceLocation::new(2, 1));
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_locations_track_lines_and_columns() {
        let mut lexer = Lexer::new("fn f() {\n  x++;\n}");
        let tokens = lexer.tokenize().unwrap();

        let x = tokens
            .iter()
            .find(|t| t.token == Token::Identifier("x".to_string()))
            .unwrap();
        assert_eq!(x.location, SourceLocation::new(2, 3));
        assert_eq!(x.to_string(), "2:3 Identifier(x)");
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Lexer::new("var x: i32 = 1 # 2;");
        let err = lexer.tokenize().unwrap_err();
        assert!(err.message.contains("Unexpected character: '#'"));
    }
}
