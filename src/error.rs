//! # Error Types Module
//!
//! Questo modulo definisce il catalogo degli errori della libreria.
//!
//! ## Responsabilità:
//! - Definisce `MediaError` enum per categorizzare tutti gli errori possibili
//! - Associa ad ogni errore un codice numerico stabile (`code()`)
//! - Fornisce messaggi leggibili, parametrizzati dal valore che ha causato l'errore
//! - Integra con `thiserror` per automatic error conversion da `std::io::Error`
//!
//! ## Categorie di errori:
//! - **Configurazione** (100-115, 120-121): input path, opzioni, formati, codec,
//!   dimensioni, watermark, flag duplicati. Sono sollevati in modo sincrono,
//!   prima che venga avviato qualsiasi processo.
//! - **Runtime** (116-119): uscita anomala del processo, output mancante,
//!   errori di I/O, conversione annullata. Arrivano tramite il risultato
//!   asincrono della conversione.
//!
//! ## Esempio:
//! ```rust
//! use media_converter::MediaError;
//!
//! let err = MediaError::DuplicateCommand("-s".to_string());
//! assert_eq!(err.code(), 112);
//! assert_eq!(err.to_string(), "The command \"-s\" already exists");
//! ```

use std::path::PathBuf;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, MediaError>;

/// Every failure the conversion core can report, each with a numeric code
#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    #[error("The input file path can not be empty")]
    EmptyInputPath,

    #[error("The input file path \"{0}\" is not valid UTF-8 text")]
    InvalidInputPath(String),

    #[error("The option \"{0}\" is invalid. Check the list of available options")]
    InvalidOptionName(String),

    #[error("The input file does not exist")]
    FileNotFound,

    #[error("The format \"{0}\" is not supported by the version of ffmpeg")]
    FormatNotSupported(String),

    #[error("The audio channel \"{0}\" is not valid")]
    AudioChannelInvalid(String),

    #[error("Error occurred during creation folder: {0}")]
    Mkdir(String),

    #[error("You can specify only one option between number, everyNFrames, everyNSeconds and everyNPercentage")]
    AmbiguousSampling,

    #[error("The watermark \"{0}\" does not exists")]
    InvalidWatermark(String),

    #[error("Invalid watermark position \"{0}\"")]
    InvalidWatermarkPosition(String),

    #[error("The format \"{0}\" not supported by the function \"setSize\"")]
    SizeFormat(String),

    #[error("The resolution for pixel aspect ratio is not defined")]
    ResolutionSquareNotDefined,

    #[error("The command \"{0}\" already exists")]
    DuplicateCommand(String),

    #[error("The codec \"{0}\" is not supported by the version of ffmpeg")]
    CodecNotSupported(String),

    #[error("The time or duration value \"{0}\" is not expressed in a valid format")]
    TimeNotValid(String),

    #[error("No output was specified!")]
    OutputNotSpecified,

    #[error("Error exit for process: code={code:?}, signal={signal:?}")]
    ProcessExit {
        code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("No output file was produced: {}", .0.display())]
    NoOutputProduced(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The conversion was aborted")]
    Aborted,

    #[error("The option \"{name}\" has an invalid value: {reason}")]
    InvalidOptionValue { name: String, reason: String },

    #[error("No input file selected!")]
    NoInputSelected,
}

impl MediaError {
    /// Numeric code of the error, stable across releases
    pub fn code(&self) -> u16 {
        match self {
            MediaError::EmptyInputPath => 100,
            MediaError::InvalidInputPath(_) => 101,
            MediaError::InvalidOptionName(_) => 102,
            MediaError::FileNotFound => 103,
            MediaError::FormatNotSupported(_) => 104,
            MediaError::AudioChannelInvalid(_) => 105,
            MediaError::Mkdir(_) => 106,
            MediaError::AmbiguousSampling => 107,
            MediaError::InvalidWatermark(_) => 108,
            MediaError::InvalidWatermarkPosition(_) => 109,
            MediaError::SizeFormat(_) => 110,
            MediaError::ResolutionSquareNotDefined => 111,
            MediaError::DuplicateCommand(_) => 112,
            MediaError::CodecNotSupported(_) => 113,
            MediaError::TimeNotValid(_) => 114,
            MediaError::OutputNotSpecified => 115,
            MediaError::ProcessExit { .. } => 116,
            MediaError::NoOutputProduced(_) => 117,
            MediaError::Io(_) => 118,
            MediaError::Aborted => 119,
            MediaError::InvalidOptionValue { .. } => 120,
            MediaError::NoInputSelected => 121,
        }
    }

    /// Whether the error was raised while configuring, before any process ran
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            MediaError::ProcessExit { .. }
                | MediaError::NoOutputProduced(_)
                | MediaError::Io(_)
                | MediaError::Aborted
        )
    }
}
