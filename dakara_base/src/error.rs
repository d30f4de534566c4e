//! # Error Helpers
//!
//! All errors raised by this crate converge into [`DakaraError`], so the
//! applications can tell expected failures (bad config, unreachable server)
//! apart from genuine bugs. The [`Annotate`] extension adds a contextual
//! message to an error while keeping the original one as its source, and
//! [`report`] turns a final result into a process exit code.

use std::error::Error as StdError;
use std::process::ExitCode;

use thiserror::Error;

use crate::config::ConfigError;
use crate::http_client::HttpError;
use crate::resources::ResourceError;
use crate::websocket_client::WebSocketError;

/// Exit code of a successful run.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code when a known error was reported.
pub const EXIT_ERROR: u8 = 1;
/// Exit code reserved for unexpected errors (panics).
pub const EXIT_UNEXPECTED: u8 = 2;
/// Exit code when the program was interrupted by the user.
pub const EXIT_INTERRUPT: u8 = 255;

/// Umbrella error for the whole crate.
///
/// Applications are expected to wrap their own failures into this type as
/// well, typically through [`Annotate`].
#[derive(Debug, Error)]
pub enum DakaraError {
    /// Configuration file could not be used.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP exchange with the server failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// WebSocket exchange with the server failed.
    #[error(transparent)]
    WebSocket(#[from] WebSocketError),

    /// Resource file could not be found.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A standard user directory cannot be determined on this system.
    #[error("Unable to determine the {0} directory for the application")]
    Directory(String),

    /// An error enriched with a contextual message.
    ///
    /// The message is displayed on the line after the original error.
    #[error("{source}\n{message}")]
    Annotated {
        /// Contextual message added to the original error.
        message: String,
        /// The original error.
        #[source]
        source: Box<DakaraError>,
    },
}

/// Extension trait to annotate the error of a `Result` with a message.
///
/// The message is appended on a new line after the original error text, which
/// is kept as the source of the annotated error:
///
/// ```
/// use dakara_base::error::{Annotate, DakaraError};
/// use dakara_base::resources::ResourceError;
///
/// let result: Result<(), _> = Err(ResourceError::NotFound("icon.png".to_string()));
/// let error = result.annotate("Unable to load the icons").unwrap_err();
/// assert_eq!(
///     error.to_string(),
///     "File 'icon.png' not found within resources\nUnable to load the icons"
/// );
/// ```
pub trait Annotate<T> {
    /// Annotate the error with the given message.
    fn annotate(self, message: impl Into<String>) -> Result<T, DakaraError>;

    /// Annotate the error with a lazily evaluated message.
    fn annotate_with<F>(self, message: F) -> Result<T, DakaraError>
    where
        F: FnOnce() -> String;
}

impl<T, E> Annotate<T> for Result<T, E>
where
    E: Into<DakaraError>,
{
    fn annotate(self, message: impl Into<String>) -> Result<T, DakaraError> {
        self.map_err(|error| DakaraError::Annotated {
            message: message.into(),
            source: Box::new(error.into()),
        })
    }

    fn annotate_with<F>(self, message: F) -> Result<T, DakaraError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|error| DakaraError::Annotated {
            message: message(),
            source: Box::new(error.into()),
        })
    }
}

/// Report the final result of a program and give its exit code.
///
/// Known errors are logged and mapped to [`EXIT_ERROR`]. With `debug`
/// enabled, the whole source chain of the error is logged as well.
pub fn report(result: Result<(), DakaraError>, debug: bool) -> ExitCode {
    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(error) => {
            log::error!("{}", error);

            if debug {
                let mut source = error.source();
                while let Some(inner) = source {
                    log::debug!("Caused by: {}", inner);
                    source = inner.source();
                }
            }

            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Report an interruption by the user and give its exit code.
///
/// Applications call it from their Ctrl-C handling, so an interrupted run
/// ends with [`EXIT_INTERRUPT`] instead of being treated as an error.
pub fn report_interrupt() -> ExitCode {
    log::info!("Quit by user");
    ExitCode::from(EXIT_INTERRUPT)
}

/// Run the program body and report its outcome, panics included.
///
/// Known errors go through [`report`]; a panic in the body is an unexpected
/// error and maps to [`EXIT_UNEXPECTED`], after the panic hook had its say.
pub fn run_and_report<F>(body: F, debug: bool) -> ExitCode
where
    F: FnOnce() -> Result<(), DakaraError> + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(body) {
        Ok(result) => report(result, debug),
        Err(_) => ExitCode::from(EXIT_UNEXPECTED),
    }
}

/// Install a panic hook that points users at the bug tracker.
///
/// Panics are bugs, not expected failures, so on top of the default panic
/// output the hook asks for a bug report.
pub fn install_panic_hook(bugtracker_url: &'static str) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        eprintln!(
            "Unexpected error, please fill a bug report at '{}'",
            bugtracker_url
        );
    }));
}
