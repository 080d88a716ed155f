//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per la comunicazione
//! con altri processi (una riga JSON per evento su stdout).
//!
//! ## Tipi di messaggi:
//! - `probe`: Metadata di un file analizzato
//! - `capabilities`: Formati e moduli supportati dal binario
//! - `progress`: Percentuale corrente della conversione
//! - `complete`: Fine conversione con i file prodotti
//! - `error`: Errore con codice numerico e messaggio

use crate::capabilities::Capabilities;
use crate::error::MediaError;
use crate::probe::MediaMetadata;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage<'a> {
    Probe {
        path: PathBuf,
        metadata: &'a MediaMetadata,
    },

    Capabilities {
        capabilities: &'a Capabilities,
    },

    Progress {
        percentage: f64,
    },

    Complete {
        outputs: Vec<PathBuf>,
    },

    Error {
        code: u16,
        message: String,
    },
}

impl<'a> JsonMessage<'a> {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn progress(percentage: f64) -> Self {
        Self::Progress { percentage }
    }

    pub fn complete(outputs: Vec<PathBuf>) -> Self {
        Self::Complete { outputs }
    }

    /// Errors outside the catalog carry code 0
    pub fn error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<MediaError>() {
            Some(media_err) => Self::from(media_err),
            None => Self::Error {
                code: 0,
                message: format!("{:#}", err),
            },
        }
    }
}

impl From<&MediaError> for JsonMessage<'_> {
    fn from(err: &MediaError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
