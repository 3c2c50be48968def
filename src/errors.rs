use thiserror::Error;

/// Errors produced while parsing a cron expression.
#[derive(Debug, Error)]
pub enum CronError {
    /// The expression was empty or whitespace only.
    #[error("empty cron expression")]
    Empty,

    /// The expression did not have exactly six whitespace-separated fields.
    #[error("expected 6 fields, got {found} in \"{expr}\"")]
    FieldCount {
        /// The offending expression.
        expr: String,
        /// How many fields it actually had.
        found: usize,
    },

    /// A value was neither a non-negative integer nor a known name.
    #[error("\"{value}\" is not a non-negative integer or a known name")]
    InvalidNumber {
        /// The raw value as written.
        value: String,
    },

    /// More than one `-` in a single term.
    #[error("at most one '-' is allowed in \"{term}\"")]
    ExtraDash {
        /// The offending term.
        term: String,
    },

    /// More than one `/` in a single term.
    #[error("at most one '/' is allowed in \"{term}\"")]
    ExtraSlash {
        /// The offending term.
        term: String,
    },

    /// A range starting below the field minimum.
    #[error("start {value} is below the field minimum {min} in \"{term}\"")]
    BelowRange {
        /// The offending term.
        term: String,
        /// The out-of-range start value.
        value: u32,
        /// The smallest value the field accepts.
        min: u32,
    },

    /// A range ending above the field maximum.
    #[error("end {value} is above the field maximum {max} in \"{term}\"")]
    AboveRange {
        /// The offending term.
        term: String,
        /// The out-of-range end value.
        value: u32,
        /// The largest value the field accepts.
        max: u32,
    },

    /// A range whose start is greater than its end.
    #[error("start {start} is greater than end {end} in \"{term}\"")]
    Inverted {
        /// The offending term.
        term: String,
        /// Range start.
        start: u32,
        /// Range end.
        end: u32,
    },

    /// A `/0` step.
    #[error("step must be a positive integer in \"{term}\"")]
    ZeroStep {
        /// The offending term.
        term: String,
    },
}

/// Errors surfaced by scheduler commands and the control handle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The job's cron rule failed to parse.
    #[error("invalid cron rule: {0}")]
    InvalidCronRule(#[from] CronError),

    /// The job names a runner that is not in the registry.
    #[error("unknown runner \"{0}\"")]
    UnknownRunner(String),

    /// No scheduled job has the given id.
    #[error("job \"{0}\" not found")]
    JobNotFound(String),

    /// Open was sent for a job that is already opened.
    #[error("job \"{0}\" is already opened")]
    AlreadyOpened(String),

    /// Close was sent for a job that is already closed.
    #[error("job \"{0}\" is already closed")]
    AlreadyClosed(String),

    /// The store rejected a read or write.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// The control loop is gone; the handle can no longer be used.
    #[error("scheduler control loop has shut down")]
    Disconnected,
}
