//! Message word vocabulary
//!
//! The protocol allows arbitrarily many message words, but only a small set
//! is understood here. Known words are interned as [`Word`] variants; any
//! other word is classified by case: all lower-case words are requests, all
//! upper-case words are responses, and anything else is malformed.

use std::fmt;

use serde::{Serialize, Serializer};

/// An interned protocol message word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Word {
    /// Unknown and ill-formed word (mixed case)
    Malformed,

    // Requests
    /// Unknown but well-formed request word
    UnknownRequest,
    /// `quit` (core)
    Quit,
    /// `play` (PlayStop)
    Play,
    /// `stop` (PlayStop)
    Stop,
    /// `eject` (FileLoad)
    Eject,
    /// `load` (FileLoad)
    Load,
    /// `count` (Playlist)
    Count,
    /// `dequeue` (Playlist)
    Dequeue,
    /// `enqueue` (Playlist)
    Enqueue,
    /// `select` (Playlist)
    Select,

    // Responses
    /// Unknown but well-formed response word
    UnknownResponse,
    /// `OK` (core)
    Ok,
    /// `FAIL` (core)
    Fail,
    /// `WHAT` (core)
    What,
    /// `OHAI` (core)
    Ohai,
    /// `FEATURES` (core)
    Features,
    /// `STATE` (core)
    State,
    /// `END` (End)
    End,
    /// `FILE` (FileLoad)
    File,
    /// `TIME` (TimeReport)
    Time,
}

impl Word {
    /// Look up the word for a string
    ///
    /// Lookup is case-sensitive and total: strings outside the vocabulary map
    /// to [`Word::UnknownRequest`], [`Word::UnknownResponse`] or
    /// [`Word::Malformed`].
    pub fn lookup(word: &str) -> Self {
        match word {
            "quit" => Word::Quit,
            "play" => Word::Play,
            "stop" => Word::Stop,
            "eject" => Word::Eject,
            "load" => Word::Load,
            "count" => Word::Count,
            "dequeue" => Word::Dequeue,
            "enqueue" => Word::Enqueue,
            "select" => Word::Select,
            "OK" => Word::Ok,
            "FAIL" => Word::Fail,
            "WHAT" => Word::What,
            "OHAI" => Word::Ohai,
            "FEATURES" => Word::Features,
            "STATE" => Word::State,
            "END" => Word::End,
            "FILE" => Word::File,
            "TIME" => Word::Time,
            other => classify(other),
        }
    }

    /// The string form of this word
    ///
    /// Reserved tags render as bracketed placeholders that can never be
    /// produced by [`Word::lookup`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Word::Malformed => "<BAD WORD>",
            Word::UnknownRequest => "<UNKNOWN REQUEST>",
            Word::Quit => "quit",
            Word::Play => "play",
            Word::Stop => "stop",
            Word::Eject => "eject",
            Word::Load => "load",
            Word::Count => "count",
            Word::Dequeue => "dequeue",
            Word::Enqueue => "enqueue",
            Word::Select => "select",
            Word::UnknownResponse => "<UNKNOWN RESPONSE>",
            Word::Ok => "OK",
            Word::Fail => "FAIL",
            Word::What => "WHAT",
            Word::Ohai => "OHAI",
            Word::Features => "FEATURES",
            Word::State => "STATE",
            Word::End => "END",
            Word::File => "FILE",
            Word::Time => "TIME",
        }
    }

    /// Whether this word is outside the known vocabulary
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            Word::Malformed | Word::UnknownRequest | Word::UnknownResponse
        )
    }

    /// Whether this word is a request (client to service)
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Word::UnknownRequest
                | Word::Quit
                | Word::Play
                | Word::Stop
                | Word::Eject
                | Word::Load
                | Word::Count
                | Word::Dequeue
                | Word::Enqueue
                | Word::Select
        )
    }

    /// Whether this word is a response (service to client)
    pub fn is_response(&self) -> bool {
        !self.is_request() && *self != Word::Malformed
    }
}

/// Classify a word outside the vocabulary by its case
fn classify(word: &str) -> Word {
    if word.to_lowercase() == word {
        Word::UnknownRequest
    } else if word.to_uppercase() == word {
        Word::UnknownResponse
    } else {
        Word::Malformed
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Word {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
