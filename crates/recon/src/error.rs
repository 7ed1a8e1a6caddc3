use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad window, threshold out of range, etc.).
    ConfigValidation(String),
    /// Missing required column in a canonical record file.
    MissingColumn { source: String, column: String },
    /// Timestamp parse error.
    TimestampParse { source: String, row: usize, value: String },
    /// Amount / fee / price parse error.
    AmountParse { source: String, row: usize, value: String },
    /// A row or JSON document that cannot become a record.
    InvalidRecord { source: String, row: usize, reason: String },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { source, column } => {
                write!(f, "source '{source}': missing column '{column}'")
            }
            Self::TimestampParse { source, row, value } => {
                write!(f, "source '{source}', row {row}: cannot parse timestamp '{value}'")
            }
            Self::AmountParse { source, row, value } => {
                write!(f, "source '{source}', row {row}: cannot parse decimal '{value}'")
            }
            Self::InvalidRecord { source, row, reason } => {
                write!(f, "source '{source}', row {row}: {reason}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
