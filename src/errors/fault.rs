use core::fmt::{self, Debug, Display, Formatter};
use std::error::Error;

/// Transport-level fault raised out of the processing chain.
///
/// Errors that are not faults already are wrapped with [`Fault::wrap`],
/// keeping the original error as the source.
pub struct Fault {
    message: String,
    source: Option<anyhow::Error>,
}

impl Fault {
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps `err` unless it already is a fault, in which case it is returned unchanged.
    #[must_use]
    pub fn wrap(err: impl Into<anyhow::Error>) -> Self {
        match err.into().downcast::<Fault>() {
            Ok(fault) => fault,
            Err(err) => Self {
                message: err.to_string(),
                source: Some(err),
            },
        }
    }

    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Original error this fault was created from, if any.
    #[inline]
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Debug for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|err| -> &(dyn Error + 'static) { err.as_ref() })
    }
}
