use crate::lexer::SourceLocation;
use colored::*;
use std::fmt;
use thiserror::Error;

/// A front-end error (lexing or parsing) with location information
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub location: Option<SourceLocation>,
    pub message: String,
}

impl CompileError {
    pub fn new(message: String, location: Option<SourceLocation>) -> Self {
        CompileError { location, message }
    }

    pub fn with_location(message: String, location: SourceLocation) -> Self {
        CompileError {
            location: Some(location),
            message,
        }
    }

    pub fn without_location(message: String) -> Self {
        CompileError {
            location: None,
            message,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(loc) = self.location {
            write!(f, "{} at {}", self.message, loc)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for CompileError {}

impl From<String> for CompileError {
    fn from(message: String) -> Self {
        CompileError::without_location(message)
    }
}

/// Errors raised by the backend. All of them are fatal for the function or
/// declaration being generated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(String),

    #[error("symbol '{0}' is already declared in this scope")]
    DuplicateSymbol(String),

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("unknown function '{0}'")]
    UnknownSignature(String),

    #[error("cannot infer the type of `{0}`")]
    TypeInference(String),

    #[error("internal scope error: {0}")]
    InternalScope(String),

    #[error("{0} is not supported")]
    NotSupported(String),

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// One backend error together with the declaration it was raised in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub context: String,
    pub error: CodegenError,
}

/// Every backend error of one compilation. If this is non-empty no assembly
/// is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: impl Into<String>, error: CodegenError) {
        self.entries.push(Diagnostic {
            context: context.into(),
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn errors(&self) -> impl Iterator<Item = &CodegenError> {
        self.entries.iter().map(|d| &d.error)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, diagnostic) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "in '{}': {}", diagnostic.context, diagnostic.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

/// Format an error message with source context
pub fn format_error(
    filename: &str,
    source: &str,
    location: SourceLocation,
    message: &str,
) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let line_idx = location.line.saturating_sub(1);

    if line_idx >= lines.len() {
        return format!(
            "{}: {} at {}",
            "error".red().bold(),
            message,
            format!("{}:{}", filename, location).cyan()
        );
    }

    let line = lines[line_idx];
    let line_num_width = format!("{}", location.line).len().max(3);

    let mut output = String::new();

    output.push_str(&format!(
        "{}{} {}\n",
        "error".red().bold(),
        ":".bold(),
        message
    ));

    output.push_str(&format!(
        "  {} {}:{}:{}\n",
        "-->".cyan().bold(),
        filename,
        location.line,
        location.column
    ));

    output.push_str(&format!("{}\n", " ".repeat(line_num_width + 1)));

    if line_idx > 0 {
        output.push_str(&format!(
            "{:width$} {} {}\n",
            location.line - 1,
            "|".cyan().bold(),
            lines[line_idx - 1],
            width = line_num_width
        ));
    }

    output.push_str(&format!(
        "{:width$} {} {}\n",
        location.line,
        "|".cyan().bold(),
        line,
        width = line_num_width
    ));

    let caret_padding = line_num_width + 3 + location.column.saturating_sub(1);
    output.push_str(&format!(
        "{}{}\n",
        " ".repeat(caret_padding),
        "^".red().bold()
    ));

    if line_idx + 1 < lines.len() {
        output.push_str(&format!(
            "{:width$} {} {}\n",
            location.line + 1,
            "|".cyan().bold(),
            lines[line_idx + 1],
            width = line_num_width
        ));
    }

    output
}

/// Format a simple error without source context
pub fn format_simple_error(message: &str) -> String {
    format!("{}{} {}", "error".red().bold(), ":".bold(), message)
}

/// Format every backend diagnostic, one `error:` block per entry.
pub fn format_diagnostics(filename: &str, diagnostics: &Diagnostics) -> String {
    diagnostics
        .entries
        .iter()
        .map(|d| {
            format_simple_error(&format!(
                "{} (in '{}' of {})",
                d.error, d.context, filename
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        let source = "fn main() {\n    return 42\n}\n";
        let location = SourceLocation::new(2, 14);
        let message = "Expected ';', got '}'";

        let formatted = format_error("test.g", source, location, message);

        assert!(formatted.contains("error"));
        assert!(formatted.contains(message));
        assert!(formatted.contains("test.g:2:14"));
        assert!(formatted.contains("return 42"));
        assert!(formatted.contains("^"));
    }

    #[test]
    fn test_format_error_first_line() {
        let source = "fn main {\n    return 0;\n}\n";
        let location = SourceLocation::new(1, 9);
        let message = "Expected '(', got '{'";

        let formatted = format_error("test.g", source, location, message);

        assert!(formatted.contains("fn main {"));
        assert!(formatted.contains("^"));
    }

    #[test]
    fn test_diagnostics_display_lists_every_entry() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push("main", CodegenError::UndefinedSymbol("y".to_string()));
        diagnostics.push(
            "helper",
            CodegenError::NotSupported("unary negation".to_string()),
        );

        let text = diagnostics.to_string();
        assert_eq!(diagnostics.len(), 2);
        assert!(text.contains("in 'main': undefined symbol 'y'"));
        assert!(text.contains("in 'helper': unary negation is not supported"));
    }

    #[test]
    fn test_format_diagnostics_mentions_file() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push("main", CodegenError::UnknownType("Vec".to_string()));

        let formatted = format_diagnostics("prog.g", &diagnostics);
        assert!(formatted.contains("unknown type 'Vec'"));
        assert!(formatted.contains("prog.g"));
    }
}
