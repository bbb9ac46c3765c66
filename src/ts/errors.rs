use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeSitterError {
    #[error("failed to set Go language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("syntax error at line {line}, column {column} (byte {byte_start}..{byte_end})")]
    SyntaxError {
        byte_start: usize,
        byte_end: usize,
        line: usize,
        column: usize,
    },
}
