use miette::Diagnostic;
use tether_decl::DeclError;
use tether_marshal::MarshalError;
use tether_native::BridgeError;
use thiserror::Error;

/// CLI-specific error type that provides rich diagnostics
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Declarations(#[from] DeclError),

    #[error("Native call failed: {0}")]
    #[diagnostic(code(tether::cli::native_error))]
    Native(#[from] BridgeError),

    #[error("Struct access failed: {0}")]
    #[diagnostic(code(tether::cli::marshal_error))]
    Marshal(#[from] MarshalError),

    #[error("No function `{0}` is declared")]
    #[diagnostic(code(tether::cli::unknown_function))]
    UnknownFunction(String),

    #[error("No record `{0}` is declared")]
    #[diagnostic(code(tether::cli::unknown_record))]
    UnknownRecord(String),

    #[error("No library to call into")]
    #[diagnostic(
        code(tether::cli::missing_library),
        help("Set `library` in the declaration file or pass --library")
    )]
    MissingLibrary,

    #[error("Argument {index} (`{value}`) is not a valid {expected}")]
    #[diagnostic(code(tether::cli::bad_argument))]
    BadArgument {
        index: usize,
        value: String,
        expected: String,
    },
}
