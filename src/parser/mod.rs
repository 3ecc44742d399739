//! Parser module for cell scripts

pub mod ast;
pub mod grammar;

pub use ast::*;
pub use grammar::{parse_program, Rule};

/// Words the grammar never accepts as identifiers
pub const KEYWORDS: &[&str] = &[
    "if", "elif", "else", "while", "for", "in", "fn", "return", "break", "continue", "and", "or",
    "not", "true", "false", "none",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}
