pub mod csv_loader;

pub use csv_loader::{load_bars_from_csv, load_bars_from_reader};

/// Errors that can occur while loading bar data.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
