// Structured error type shared by the client, the host executor, and the CLI.
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Validation,
    Permission,
    Quota,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    record_type: Option<String>,
    cursor: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            record_type: None,
            cursor: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    /// Resume boundary attached to quota/pagination errors: fetching with
    /// this cursor continues exactly where the failed invocation stopped.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    pub fn with_cursor(mut self, cursor: u64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", kind_name(self.kind))?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(record_type) = &self.record_type {
            write!(f, " (record type: {record_type})")?;
        }
        if let Some(cursor) = self.cursor {
            write!(f, " (cursor: {cursor})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Internal => "Internal",
        ErrorKind::Usage => "Usage",
        ErrorKind::NotFound => "NotFound",
        ErrorKind::Validation => "Validation",
        ErrorKind::Permission => "Permission",
        ErrorKind::Quota => "Quota",
        ErrorKind::Io => "Io",
    }
}

pub fn parse_kind(name: &str) -> ErrorKind {
    match name {
        "Usage" => ErrorKind::Usage,
        "NotFound" => ErrorKind::NotFound,
        "Validation" => ErrorKind::Validation,
        "Permission" => ErrorKind::Permission,
        "Quota" => ErrorKind::Quota,
        "Io" => ErrorKind::Io,
        _ => ErrorKind::Internal,
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Validation => 4,
        ErrorKind::Permission => 5,
        ErrorKind::Quota => 6,
        ErrorKind::Io => 7,
    }
}
