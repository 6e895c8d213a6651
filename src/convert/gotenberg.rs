//! Remote converter speaking the Gotenberg LibreOffice route.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::{excerpt, ConversionJob, ConverterBackend, ConverterFailure};
use crate::format::Format;

const CONVERT_ROUTE: &str = "/forms/libreoffice/convert";

pub struct GotenbergBackend {
    client: reqwest::Client,
    base_url: String,
}

impl GotenbergBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, CONVERT_ROUTE)
    }
}

#[async_trait]
impl ConverterBackend for GotenbergBackend {
    fn name(&self) -> &'static str {
        "gotenberg"
    }

    fn supports(&self, from: Format, to: Format) -> bool {
        from.is_container() && to == Format::Pdf
    }

    async fn convert(&self, job: &ConversionJob) -> Result<(), ConverterFailure> {
        let input = tokio::fs::read(&job.input)
            .await
            .map_err(|e| ConverterFailure::Failed(format!("cannot read input: {}", e)))?;
        let filename = format!("{}.{}", job.id, job.from.extension());
        let part = Part::bytes(input)
            .file_name(filename)
            .mime_str(job.from.mime_type())
            .map_err(|e| ConverterFailure::Failed(e.to_string()))?;
        let form = Form::new().part("files", part);

        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ConverterFailure::Unavailable(format!("converter unreachable: {}", e))
                } else {
                    ConverterFailure::Failed(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(ConverterFailure::Unavailable(format!(
                "converter answered {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(ConverterFailure::Failed(format!(
                "converter answered {}: {}",
                status,
                excerpt(&body)
            )));
        }

        let pdf = response
            .bytes()
            .await
            .map_err(|e| ConverterFailure::Failed(format!("cannot read converter response: {}", e)))?;
        tokio::fs::write(job.output_path(), &pdf)
            .await
            .map_err(|e| ConverterFailure::Failed(format!("cannot store converter output: {}", e)))?;
        log::debug!("gotenberg finished job {} ({} bytes)", job.id, pdf.len());
        Ok(())
    }
}
