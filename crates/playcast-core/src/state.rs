//! Last-known state of a remote service
//!
//! [`ServiceState`] is a reducer: it only changes by applying received
//! [`Message`]s, in arrival order.

use std::collections::HashSet;
use std::num::ParseIntError;
use std::time::Duration;

use serde::Serialize;

use crate::feature::Feature;
use crate::message::Message;
use crate::word::Word;

/// State shown after a `STATE` response arrives with no argument
pub const UNKNOWN_STATE: &str = "???";

/// Errors from applying a message to a [`ServiceState`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    /// `FEATURES` named a feature outside the vocabulary
    #[error("unknown feature: {0:?}")]
    UnknownFeature(String),

    /// The response needs an argument that was not sent
    #[error("{word} response is missing its argument")]
    MissingArgument { word: Word },

    /// The response carried more arguments than it takes
    #[error("{word} response takes 1 argument, got {count}")]
    TooManyArguments { word: Word, count: usize },

    /// A `TIME` argument that is not a whole number of microseconds
    #[error("invalid time {value:?}: {source}")]
    InvalidTime {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// All known state for one service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceState {
    // Core
    features: HashSet<Feature>,
    state: String,

    // TimeReport
    time: Duration,

    // FileLoad
    file: String,
}

impl ServiceState {
    /// Create a blank state: no features, no state, zero time, no file
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an incoming response
    ///
    /// Words other than `FEATURES`, `FILE`, `STATE` and `TIME` are ignored.
    /// On error, the affected field keeps its previous value, except that a
    /// `FILE` or `STATE` with no argument resets the field (to the empty
    /// string and [`UNKNOWN_STATE`] respectively) before the error is
    /// reported.
    ///
    /// `TIME` takes a non-negative count of microseconds; a negative value is
    /// rejected as [`UpdateError::InvalidTime`].
    pub fn update(&mut self, message: &Message) -> Result<(), UpdateError> {
        match message.word() {
            Word::Features => self.update_features(message),
            Word::File => self.update_file(message),
            Word::State => self.update_state(message),
            Word::Time => self.update_time(message),
            Word::Malformed
            | Word::UnknownRequest
            | Word::Quit
            | Word::Play
            | Word::Stop
            | Word::Eject
            | Word::Load
            | Word::Count
            | Word::Dequeue
            | Word::Enqueue
            | Word::Select
            | Word::UnknownResponse
            | Word::Ok
            | Word::Fail
            | Word::What
            | Word::Ohai
            | Word::End => Ok(()),
        }
    }

    fn update_features(&mut self, message: &Message) -> Result<(), UpdateError> {
        let mut features = HashSet::with_capacity(message.arg_count());
        for name in message.args() {
            let feature = Feature::lookup(name);
            if feature.is_unknown() {
                return Err(UpdateError::UnknownFeature(name.clone()));
            }
            features.insert(feature);
        }

        self.features = features;
        Ok(())
    }

    fn update_file(&mut self, message: &Message) -> Result<(), UpdateError> {
        match single_arg(message) {
            Ok(file) => {
                self.file = file.to_string();
                Ok(())
            }
            Err(e @ UpdateError::MissingArgument { .. }) => {
                self.file.clear();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn update_state(&mut self, message: &Message) -> Result<(), UpdateError> {
        match single_arg(message) {
            Ok(state) => {
                self.state = state.to_string();
                Ok(())
            }
            Err(e @ UpdateError::MissingArgument { .. }) => {
                self.state = UNKNOWN_STATE.to_string();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn update_time(&mut self, message: &Message) -> Result<(), UpdateError> {
        let value = single_arg(message)?;
        let micros: u64 = value.parse().map_err(|source| UpdateError::InvalidTime {
            value: value.to_string(),
            source,
        })?;

        self.time = Duration::from_micros(micros);
        Ok(())
    }

    /// Whether the service advertises the given feature
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// The advertised features, in a stable order
    pub fn features(&self) -> Vec<Feature> {
        let mut features: Vec<Feature> = self.features.iter().copied().collect();
        features.sort();
        features
    }

    /// The last reported state label (empty until one arrives)
    pub fn state(&self) -> &str {
        &self.state
    }

    /// The last reported elapsed time
    pub fn time(&self) -> Duration {
        self.time
    }

    /// The currently loaded file (meaningful only with [`Feature::FileLoad`])
    pub fn file(&self) -> &str {
        &self.file
    }

    /// A serializable copy of the state, with feature-gated fields omitted
    /// when the service does not advertise the feature
    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            features: self.features(),
            state: self.state.clone(),
            time_us: self
                .has_feature(Feature::TimeReport)
                .then(|| u64::try_from(self.time.as_micros()).unwrap_or(u64::MAX)),
            file: self
                .has_feature(Feature::FileLoad)
                .then(|| self.file.clone()),
        }
    }
}

/// Extract the sole argument of a single-argument response
fn single_arg(message: &Message) -> Result<&str, UpdateError> {
    match message.args() {
        [] => Err(UpdateError::MissingArgument {
            word: message.word(),
        }),
        [arg] => Ok(arg.as_str()),
        args => Err(UpdateError::TooManyArguments {
            word: message.word(),
            count: args.len(),
        }),
    }
}

/// Point-in-time view of a [`ServiceState`] for external consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceSnapshot {
    /// Advertised features
    pub features: Vec<Feature>,
    /// Last reported state label
    pub state: String,
    /// Elapsed time in microseconds, present with TimeReport
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_us: Option<u64>,
    /// Loaded file, present with FileLoad
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Format a duration as `m:ss`
///
/// Minutes are not padded; seconds are zero-padded and any sub-second part
/// is truncated.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
