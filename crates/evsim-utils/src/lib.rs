//! Utilities for reading scenarios from and writing reports to files.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use evsim_apps::{Report, Scenario};

/// Reads a [`Scenario`] from a file in JSON or Dhall format.
pub fn read_scenario(path: impl AsRef<Path>) -> Result<Scenario, Error> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let scenario: Scenario = match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)?,
        Some("dhall") => serde_dhall::from_str(&contents).parse().map_err(Box::new)?,
        _ => return Err(Error::UnknownFileType(path.as_ref().into())),
    };
    Ok(scenario)
}

/// Reads a [`Scenario`] from a file and simulates it.
pub fn run_scenario(path: impl AsRef<Path>) -> Result<Report, Error> {
    let scenario = read_scenario(path)?;
    Ok(evsim_apps::run(scenario)?)
}

/// Writes a [`Report`] to a file in JSON format.
pub fn write_report(path: impl AsRef<Path>, report: &Report) -> Result<(), Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}

/// Error kinds for scenario files and I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown file type.
    #[error("unknown file type: {0}")]
    UnknownFileType(PathBuf),

    /// Error serializing/deserializing Dhall.
    #[error("Dhall error")]
    Dhall(#[from] Box<serde_dhall::Error>),

    /// Error serializing/deserializing JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// Error simulating a scenario.
    #[error("failed to run scenario")]
    Run(#[from] evsim_apps::Error),
}
