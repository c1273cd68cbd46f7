//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module and returns the process
//! exit status.

pub mod chat;
pub mod ingest;
pub mod init;
pub mod retrieve;

/// Process exit status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    /// Configuration, store initialization or other fatal errors
    GeneralError,
    /// Some documents failed and the caller asked to be told
    PartialFailure,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::GeneralError => 1,
            ExitCode::PartialFailure => 2,
        }
    }
}

/// Print an error chain the way every command reports fatal errors.
pub(crate) fn report_error(err: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {err}");
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
    ExitCode::GeneralError
}
