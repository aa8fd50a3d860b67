use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read input")]
    Io(#[from] std::io::Error),

    #[error("line {line}: malformed valve description")]
    Parse {
        line: usize,
        #[source]
        source: nom::error::Error<String>,
    },

    #[error("valve {0} is defined more than once")]
    DuplicateValve(String),

    #[error("valve {valve} has a tunnel to undefined valve {target}")]
    UnknownTunnel { valve: String, target: String },

    #[error("start valve {0} is not defined")]
    UnknownStart(String),

    // One bit per useful valve in the opened set.
    #[error("{0} valves have a non-zero flow rate, at most 64 are supported")]
    TooManyValves(usize),

    #[error("pressure released over {minutes} minutes does not fit in 64 bits")]
    PressureOverflow { minutes: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
