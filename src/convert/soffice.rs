//! LibreOffice headless converter.
//!
//! Runs `soffice --convert-to` once per call with a private user profile
//! inside the call's workspace, so concurrent conversions never share state.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::{excerpt, ConversionJob, ConverterBackend, ConverterFailure};
use crate::format::Format;

pub struct SofficeBackend {
    binary: PathBuf,
}

impl SofficeBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// `--convert-to` argument for a pair, `None` when no export filter fits.
///
/// Writer has no drawing export, so word-processing documents only go to PDF.
fn convert_to(from: Format, to: Format) -> Option<&'static str> {
    match (from, to) {
        (Format::WordProcessor, Format::Pdf) => Some("pdf:writer_pdf_Export"),
        (Format::Spreadsheet, Format::Pdf) => Some("pdf:calc_pdf_Export"),
        (Format::VectorGraphics, Format::Pdf) => Some("pdf:draw_pdf_Export"),
        _ => None,
    }
}

#[async_trait]
impl ConverterBackend for SofficeBackend {
    fn name(&self) -> &'static str {
        "soffice"
    }

    fn supports(&self, from: Format, to: Format) -> bool {
        convert_to(from, to).is_some()
    }

    async fn convert(&self, job: &ConversionJob) -> Result<(), ConverterFailure> {
        let filter = convert_to(job.from, job.to).ok_or_else(|| {
            ConverterFailure::Failed(format!(
                "soffice has no export from {} to {}",
                job.from.extension(),
                job.to.extension()
            ))
        })?;
        let profile = job.work_dir.join("profile");
        let output = Command::new(&self.binary)
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .arg("--headless")
            .arg("--norestore")
            .arg("--nolockcheck")
            .arg("--convert-to")
            .arg(filter)
            .arg("--outdir")
            .arg(&job.output_dir)
            .arg(&job.input)
            .current_dir(&job.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ConverterFailure::Unavailable(format!(
                    "converter binary '{}' not found",
                    self.binary.display()
                )),
                _ => ConverterFailure::Unavailable(format!(
                    "cannot start '{}': {}",
                    self.binary.display(),
                    e
                )),
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(ConverterFailure::Failed(format!(
                "soffice exited with status {}: {}",
                code,
                excerpt(&output.stderr)
            )));
        }

        log::debug!("soffice finished job {}: {}", job.id, excerpt(&output.stdout));
        Ok(())
    }
}
