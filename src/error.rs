use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! rewrite_error {
    ($method:expr, $fmt:expr) => {
        crate::Error::Rewrite {
            method: $method.to_string(),
            message: $fmt.to_string(),
        }
    };

    ($method:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Rewrite {
            method: $method.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the four failure classes of the emulator:
///
/// ## Class file errors
/// - [`Error::Malformed`] - Corrupted or invalid class file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::NotSupported`] - Unsupported class file feature or page source
/// - [`Error::Empty`] - Empty input provided
///
/// ## Rewrite errors
/// - [`Error::Rewrite`] - A method signature the proxy generator cannot marshal; aborts the class
///
/// ## Boot errors
/// - [`Error::Boot`] - The script engine failed to load its page
/// - [`Error::BootTimeout`] - The engine did not become ready in time
///
/// ## Execution errors
/// - [`Error::Script`] - A script raised an exception
/// - [`Error::Work`] - A unit of work failed with a caller supplied error
///
/// Annotation errors never surface as an [`Error`]; the scanner reports them as
/// [`crate::emulator::Diagnostic`]s and skips the method.
///
/// # Examples
///
/// ```rust,no_run
/// use importshim::{Error, classfile::ClassFile};
///
/// match ClassFile::parse(&[0xCA, 0xFE]) {
///     Ok(class) => println!("parsed {}", class.this_class_name()?),
///     Err(Error::OutOfBounds { .. }) => eprintln!("truncated class file"),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// # Ok::<(), importshim::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The input uses a feature this library does not handle.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A native method cannot be turned into a script proxy.
    ///
    /// Fails the rewrite of the whole class; the class load is aborted.
    #[error("Cannot rewrite {method}: {message}")]
    Rewrite {
        /// Method name and descriptor
        method: String,
        /// What could not be marshalled
        message: String,
    },

    /// The script engine failed to load its initial page.
    #[error("Script engine failed to boot: {0}")]
    Boot(String),

    /// The script engine did not reach the ready state within the configured boot timeout.
    #[error("Script engine did not become ready within {0:?}")]
    BootTimeout(std::time::Duration),

    /// A posted unit of work did not complete within the configured execution timeout.
    ///
    /// The work keeps running on the engine thread; there is no cancellation.
    #[error("Execution did not complete within {0:?}")]
    ExecutionTimeout(std::time::Duration),

    /// A script raised an exception.
    #[error("Script error: {message}")]
    Script {
        /// The exception message
        message: String,
        /// The script stack trace, if the engine provided one
        stack: Option<String>,
    },

    /// No function of this name exists in the requested module.
    #[error("Function {module}.{name} is not defined")]
    UnknownFunction {
        /// The module name
        module: String,
        /// The function name
        name: String,
    },

    /// A unit of work failed with an error of its own.
    ///
    /// The boxed error is the value the work returned, moved back to the caller without
    /// modification; use [`Error::into_work_error`] to recover it.
    #[error("{0}")]
    Work(Box<dyn std::error::Error + Send + Sync>),

    /// Execution was requested from inside an execution on the engine thread.
    #[error("Reentrant execution on the engine thread is not supported")]
    Reentrant,

    /// The engine thread went away while a caller was waiting on it.
    #[error("The script engine thread terminated")]
    Disconnected,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Wraps an arbitrary error returned by a unit of work.
    pub fn work<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Work(Box::new(error))
    }

    /// Returns the original error of a failed unit of work, if this is one.
    ///
    /// # Errors
    ///
    /// Gives `self` back unchanged if this is not an [`Error::Work`].
    pub fn into_work_error(self) -> std::result::Result<Box<dyn std::error::Error + Send + Sync>, Self> {
        match self {
            Error::Work(inner) => Ok(inner),
            other => Err(other),
        }
    }
}

impl From<rquickjs::Error> for Error {
    fn from(error: rquickjs::Error) -> Self {
        Error::Script {
            message: error.to_string(),
            stack: None,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(error: quick_xml::Error) -> Self {
        Error::Boot(format!("page could not be read: {}", error))
    }
}
