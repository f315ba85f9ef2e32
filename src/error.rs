//! Crate-wide error type. Parse errors are entry-scoped: a malformed entry
//! rejects the whole entry, never a partial record.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Cp2kFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entry header (element + identifiers) or the set-count line below it
    /// could not be read.
    #[error("Malformed entry header: '{line}'")]
    MalformedHeader { line: String },

    /// A count-carrying line inside an entry (quantum numbers, electron
    /// configuration, local part, projector counts) could not be read.
    #[error("Malformed block header: '{line}'")]
    MalformedBlockHeader { line: String },

    /// A coefficient row held a non-numeric token or too few fields.
    #[error("Malformed coefficient row: '{line}'")]
    MalformedCoefficientRow { line: String },

    /// The entry ended before all declared lines were consumed.
    #[error("Entry truncated: {context}")]
    TruncatedInput { context: String },

    /// A non-local channel's packed coefficient count does not match the upper
    /// triangle of its nproj x nproj coupling matrix.
    #[error(
        "Non-local channel {channel} has {found} coefficients; nproj={nproj} requires {expected}"
    )]
    InvalidProjectorShape {
        channel: usize,
        nproj: u32,
        found: usize,
        expected: usize,
    },

    #[error("Record already exists for element={element}, name={name}: {existing_id}")]
    DuplicateExists {
        element: String,
        name: String,
        existing_id: String,
    },

    #[error("Duplicate handling strategy not recognized: '{0}'")]
    UnsupportedPolicy(String),

    /// Raised by external-store lookups; this crate never produces it itself.
    #[error("No record found for element={element}, name={name}")]
    NotFound { element: String, name: String },

    /// Raised by external-store lookups when more than one record matches.
    #[error("Multiple records match element={element}, name={name}")]
    AmbiguousMatch { element: String, name: String },

    /// A record failed structural validation; lists every violated field.
    #[error("Record fails structural validation: {}", violations.join("; "))]
    InvalidRecord { violations: Vec<String> },
}

pub type Result<T> = std::result::Result<T, Cp2kFileError>;
