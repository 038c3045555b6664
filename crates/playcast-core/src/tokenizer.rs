//! Byte-level tokenizer for the line protocol
//!
//! Turns a raw byte stream into completed lines of words. The grammar follows
//! POSIX shell quoting closely:
//! - Outside quotes, whitespace separates words and a newline ends the line
//! - `'single quotes'` take everything literally up to the closing quote
//! - `"double quotes"` take everything literally except `\`, which escapes
//!   the next byte
//! - Outside quotes, `\` escapes the next byte
//!
//! The tokenizer is incremental: a line may be split across any number of
//! [`Tokenizer::feed`] calls.
//!
//! A word that grows past the size limit poisons its line. The rest of that
//! line is still scanned for quotes and escapes, so the line ends where the
//! sender meant it to, but nothing from it is emitted.

/// Default maximum size of a single word in bytes (1 MB)
pub const MAX_WORD_SIZE: usize = 1_048_576;

/// Quoting mode the tokenizer is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum QuoteMode {
    /// Between quoted sections
    #[default]
    None,
    /// Inside 'single quotes'
    Single,
    /// Inside "double quotes"
    Double,
}

/// Errors raised while tokenizing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    /// The word being built grew past the configured maximum
    #[error("word too long: exceeds maximum {max} bytes")]
    WordTooLong { max: usize },
}

/// Result of a single [`Tokenizer::feed`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokenized {
    /// Lines completed during this call, in input order
    pub lines: Vec<Vec<String>>,
    /// Number of input bytes processed before stopping
    pub consumed: usize,
    /// Error that stopped processing early, if any
    pub error: Option<TokenizeError>,
}

/// Incremental protocol tokenizer
#[derive(Debug, Clone)]
pub struct Tokenizer {
    mode: QuoteMode,
    escape_next: bool,
    in_word: bool,
    discarding: bool,
    word: Vec<u8>,
    words: Vec<String>,
    lines: Vec<Vec<String>>,
    max_word_size: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    /// Create a new, empty tokenizer
    pub fn new() -> Self {
        Self::with_max_word_size(MAX_WORD_SIZE)
    }

    /// Create a tokenizer whose words may grow to at most `max_word_size` bytes
    pub fn with_max_word_size(max_word_size: usize) -> Self {
        Tokenizer {
            mode: QuoteMode::None,
            escape_next: false,
            in_word: false,
            discarding: false,
            word: Vec::new(),
            words: Vec::new(),
            lines: Vec::new(),
            max_word_size,
        }
    }

    /// Feed raw bytes into the tokenizer
    ///
    /// Returns every line completed by these bytes. State carries over between
    /// calls, so a partial line is finished by a later call.
    ///
    /// If a word overflows, processing stops at the offending byte: the
    /// result still holds the lines completed before it, `consumed` counts the
    /// bytes processed, and `error` is set. The error does not carry over to
    /// the next call, but the unfinished line does: its remaining bytes are
    /// dropped up to the next unquoted, unescaped newline, and that line is
    /// never emitted. Feeding the unprocessed tail (from `consumed` onwards)
    /// again is the way to resume.
    pub fn feed(&mut self, data: &[u8]) -> Tokenized {
        let mut consumed = 0;
        let mut error = None;

        for &byte in data {
            if let Err(e) = self.step(byte) {
                self.discard_line();
                error = Some(e);
                break;
            }
            consumed += 1;
        }

        Tokenized {
            lines: std::mem::take(&mut self.lines),
            consumed,
            error,
        }
    }

    fn step(&mut self, byte: u8) -> Result<(), TokenizeError> {
        // A failed step leaves the state as it was before the byte.
        if self.escape_next {
            self.put(byte)?;
            self.escape_next = false;
            return Ok(());
        }

        match self.mode {
            QuoteMode::None => self.step_unquoted(byte),
            QuoteMode::Single => self.step_single_quoted(byte),
            QuoteMode::Double => self.step_double_quoted(byte),
        }
    }

    fn step_unquoted(&mut self, byte: u8) -> Result<(), TokenizeError> {
        match byte {
            // Opening a quote starts a word, so '' and "" yield an empty word.
            b'\'' => {
                self.in_word = true;
                self.mode = QuoteMode::Single;
            }
            b'"' => {
                self.in_word = true;
                self.mode = QuoteMode::Double;
            }
            b'\\' => self.escape_next = true,
            b'\n' => self.end_line(),
            b if is_space(b) => self.end_word(),
            b => return self.put(b),
        }
        Ok(())
    }

    fn step_single_quoted(&mut self, byte: u8) -> Result<(), TokenizeError> {
        match byte {
            b'\'' => self.mode = QuoteMode::None,
            b => return self.put(b),
        }
        Ok(())
    }

    fn step_double_quoted(&mut self, byte: u8) -> Result<(), TokenizeError> {
        match byte {
            b'"' => self.mode = QuoteMode::None,
            b'\\' => self.escape_next = true,
            b => return self.put(b),
        }
        Ok(())
    }

    fn put(&mut self, byte: u8) -> Result<(), TokenizeError> {
        if self.discarding {
            return Ok(());
        }
        if self.word.len() >= self.max_word_size {
            return Err(TokenizeError::WordTooLong {
                max: self.max_word_size,
            });
        }
        self.word.push(byte);
        self.in_word = true;
        Ok(())
    }

    fn end_word(&mut self) {
        if !self.in_word {
            return;
        }
        self.in_word = false;
        if self.discarding {
            return;
        }

        // Invalid UTF-8 becomes U+FFFD rather than passing through.
        let word = String::from_utf8_lossy(&self.word).into_owned();
        self.words.push(word);
        self.word.clear();
    }

    fn end_line(&mut self) {
        self.end_word();
        if self.discarding {
            self.discarding = false;
            self.words.clear();
            return;
        }
        self.lines.push(std::mem::take(&mut self.words));
    }

    /// Drop the line being built but keep quoting and escape state
    fn discard_line(&mut self) {
        self.discarding = true;
        self.in_word = false;
        self.word.clear();
        self.words.clear();
    }
}

/// Whitespace that separates words outside quotes (newline is handled apart)
fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | 0x0b | 0x0c)
}
