//! Error module. See the [failure](https://crates.io/crates/failure) crate for details.

use std::fmt;
use std::result;

use failure::{Backtrace, Context, Fail};

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    ctx: Context<ErrorKind>,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.ctx.get_context()
    }

    pub(crate) fn syntax<T: AsRef<str>>(line: T) -> Error {
        Error::from(ErrorKind::Syntax(line.as_ref().to_string()))
    }

    pub(crate) fn malformed_redirection<T: AsRef<str>>(operator: T) -> Error {
        Error::from(ErrorKind::MalformedRedirection(operator.as_ref().to_string()))
    }

    pub(crate) fn redirection_open_failed<T, U>(path: T, reason: U) -> Error
    where
        T: AsRef<str>,
        U: AsRef<str>,
    {
        Error::from(ErrorKind::RedirectionOpenFailed {
            path: path.as_ref().to_string(),
            reason: reason.as_ref().to_string(),
        })
    }

    pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
        Error::from(ErrorKind::BuiltinCommand {
            message: message.as_ref().to_string(),
            code,
        })
    }

    /// Status the shell records when a line fails with this error.
    pub fn exit_code(&self) -> i32 {
        match *self.kind() {
            ErrorKind::Syntax(_) | ErrorKind::MalformedRedirection(_) => 2,
            ErrorKind::BuiltinCommand { code, .. } => code,
            _ => 1,
        }
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.ctx.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.ctx.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.ctx, f)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Syntax(String),
    MalformedRedirection(String),
    RedirectionOpenFailed { path: String, reason: String },
    SpawnFailed,
    ExecFailed(String),
    BuiltinCommand { message: String, code: i32 },
    Io,
    Nix,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorKind::Syntax(ref line) => write!(f, "syntax error near: '{}'", line),
            ErrorKind::MalformedRedirection(ref operator) => {
                write!(f, "syntax error: '{}' requires a file name", operator)
            }
            ErrorKind::RedirectionOpenFailed {
                ref path,
                ref reason,
            } => write!(f, "{}: {}", path, reason),
            ErrorKind::SpawnFailed => write!(f, "failed to create child process"),
            ErrorKind::ExecFailed(ref program) => write!(f, "{}: failed to execute", program),
            ErrorKind::BuiltinCommand { ref message, .. } => write!(f, "{}", message),
            ErrorKind::Io => write!(f, "I/O error occurred"),
            ErrorKind::Nix => write!(f, "Nix error occurred"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::from(Context::new(kind))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(ctx: Context<ErrorKind>) -> Error {
        Error { ctx }
    }
}
