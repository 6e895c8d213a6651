//! HTTP surface: document generation, ad-hoc conversion and health.

use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::DocumentError;
use crate::format::{detect_format_from_bytes, Format, FormatFamily};
use crate::generators::{
    CertificateRequest, Generator, OperationSheetRequest, ReportRequest, RodentRegisterRequest,
    ScheduleRequest,
};
use crate::state::AppState;
use crate::ErrorResponse;

/// Largest body accepted by the convert endpoint.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub from: Option<String>,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct FormatPair {
    pub from: Format,
    pub to: Format,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub converter: &'static str,
    pub in_flight: usize,
    pub supported_pairs: Vec<FormatPair>,
}

/// HTTP status for each error kind.
pub fn status_for(err: &DocumentError) -> StatusCode {
    match err {
        DocumentError::TemplateNotFound { .. } => StatusCode::NOT_FOUND,
        DocumentError::MalformedTemplate(_) | DocumentError::InvalidDomainData(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DocumentError::UnsupportedFormatPair { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        DocumentError::ConversionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DocumentError::ConversionFailed(_) => StatusCode::BAD_GATEWAY,
        DocumentError::Cancelled => StatusCode::REQUEST_TIMEOUT,
    }
}

pub fn error_response(err: &DocumentError) -> HttpResponse {
    let status = status_for(err);
    if status.is_server_error() {
        log::error!("{}: {}", err.kind(), err);
    } else {
        log::warn!("{}: {}", err.kind(), err);
    }
    HttpResponse::build(status).json(ErrorResponse::new(err.kind(), &err.user_message()))
}

fn attachment(filename: &str, mime_type: &str, bytes: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(mime_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename.to_string())],
        })
        .body(bytes)
}

fn parse_format(raw: &str, field: &str) -> Result<Format, HttpResponse> {
    Format::from_tag(raw).ok_or_else(|| {
        HttpResponse::BadRequest().json(ErrorResponse::bad_request(&format!(
            "Formato '{}' desconocido en '{}'",
            raw, field
        )))
    })
}

/// Fill the template for `R` and return it as an attachment.
///
/// Without `?format=` the document keeps its template's format.
pub async fn generate_document<R>(
    state: web::Data<AppState>,
    query: web::Query<FormatQuery>,
    body: web::Json<R>,
) -> impl Responder
where
    R: Generator + DeserializeOwned + 'static,
{
    let service = &state.service;
    let target = match query.format.as_deref() {
        Some(raw) => match parse_format(raw, "format") {
            Ok(format) => format,
            Err(resp) => return resp,
        },
        None => Format::from_filename(service.template_id(R::TYPE)).unwrap_or(Format::Pdf),
    };

    // Dropping the handler (client went away) cancels the conversion.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let result = service.generate(&body.into_inner(), target, &cancel).await;
    guard.disarm();

    match result {
        Ok(doc) => attachment(&doc.filename, &doc.mime_type, doc.bytes),
        Err(e) => error_response(&e),
    }
}

/// Work out the source format from the query, the content type or the bytes.
fn source_format(req: &HttpRequest, declared: Option<&str>, body: &[u8]) -> Result<Format, HttpResponse> {
    let Some(family) = detect_format_from_bytes(body) else {
        return Err(HttpResponse::UnsupportedMediaType().json(ErrorResponse::new(
            "UnsupportedMediaType",
            "El archivo no es un documento reconocido",
        )));
    };

    let declared = match declared {
        Some(raw) => Some(parse_format(raw, "from")?),
        None => req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|mime| Format::ALL.into_iter().find(|f| f.mime_type() == mime)),
    };

    match (declared, family) {
        (Some(format), FormatFamily::Pdf) if format == Format::Pdf => Ok(format),
        (Some(format), FormatFamily::Package) if format.is_container() => Ok(format),
        (Some(format), _) => Err(HttpResponse::UnsupportedMediaType().json(ErrorResponse::new(
            "UnsupportedMediaType",
            &format!("El contenido no corresponde al formato {}", format.extension()),
        ))),
        (None, FormatFamily::Pdf) => Ok(Format::Pdf),
        (None, FormatFamily::Package) => Err(HttpResponse::BadRequest().json(
            ErrorResponse::bad_request("Indique el formato de origen con ?from="),
        )),
    }
}

/// Convert an uploaded document: `POST /api/convert?from=docx&to=pdf`.
pub async fn convert_document(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ConvertQuery>,
    body: web::Bytes,
) -> impl Responder {
    let to = match parse_format(&query.to, "to") {
        Ok(format) => format,
        Err(resp) => return resp,
    };
    let from = match source_format(&req, query.from.as_deref(), &body) {
        Ok(format) => format,
        Err(resp) => return resp,
    };

    log::info!("Convert request {} -> {} ({} bytes)", from, to, body.len());
    match state.service.convert(&body, from, to).await {
        Ok(bytes) => attachment(&format!("documento.{}", to.extension()), to.mime_type(), bytes),
        Err(e) => error_response(&e),
    }
}

pub async fn health(state: web::Data<AppState>) -> impl Responder {
    let pipeline = state.service.pipeline();
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        converter: pipeline.backend_name(),
        in_flight: pipeline.in_flight(),
        supported_pairs: pipeline
            .supported_pairs()
            .into_iter()
            .map(|(from, to)| FormatPair { from, to })
            .collect(),
    })
}

/// Routes mounted under `/api`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/documents")
            .route("/certificate", web::post().to(generate_document::<CertificateRequest>))
            .route(
                "/operation-sheet",
                web::post().to(generate_document::<OperationSheetRequest>),
            )
            .route(
                "/rodent-register",
                web::post().to(generate_document::<RodentRegisterRequest>),
            )
            .route("/schedule", web::post().to(generate_document::<ScheduleRequest>))
            .route("/report", web::post().to(generate_document::<ReportRequest>)),
    )
    .service(
        web::resource("/convert")
            .app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
            .route(web::post().to(convert_document)),
    );
}
