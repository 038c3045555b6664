//! Protocol messages
//!
//! A [`Message`] is an interned [`Word`] followed by zero or more string
//! arguments. Messages are built once and then only read; arguments can be
//! appended during construction.

use std::fmt;

use serde::Serialize;

use crate::pack::pack;
use crate::word::Word;

/// Errors from building or reading a message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// A tokenized line had no words to take the message word from
    #[error("cannot construct message from zero words")]
    Empty,

    /// An argument index past the end of the argument list
    #[error("wanted argument {index}, only {count} arguments")]
    ArgOutOfRange { index: usize, count: usize },
}

/// A full protocol message: a word plus ordered arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    word: Word,
    args: Vec<String>,
}

impl Message {
    /// Create a message with the given word and no arguments
    pub fn new(word: Word) -> Self {
        Message {
            word,
            args: Vec::new(),
        }
    }

    /// Build a message from a tokenized line
    ///
    /// The first word is looked up as the message word; the rest become
    /// arguments.
    pub fn from_words(line: Vec<String>) -> Result<Self, MessageError> {
        let mut words = line.into_iter();
        let first = words.next().ok_or(MessageError::Empty)?;
        Ok(Message {
            word: Word::lookup(&first),
            args: words.collect(),
        })
    }

    /// Append an argument, returning the message for chaining
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.push_arg(arg);
        self
    }

    /// Append an argument in place
    pub fn push_arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// The message word
    pub fn word(&self) -> Word {
        self.word
    }

    /// The arguments, in order
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Number of arguments
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// The argument at `index` (zero-based)
    pub fn arg(&self, index: usize) -> Result<&str, MessageError> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or(MessageError::ArgOutOfRange {
                index,
                count: self.args.len(),
            })
    }

    /// The message as `[word, arg0, arg1, ...]`
    pub fn as_words(&self) -> Vec<String> {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.word.as_str().to_string());
        words.extend(self.args.iter().cloned());
        words
    }

    /// Pack the message into wire bytes (without the trailing newline)
    pub fn pack(&self) -> Vec<u8> {
        pack(self.word.as_str(), &self.args)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.pack()))
    }
}
