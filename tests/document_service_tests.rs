mod common;

use common::*;
use pestdocs_server::convert::{ConversionPipeline, PipelineOptions};
use pestdocs_server::engine::{extract_text, UnresolvedTokens};
use pestdocs_server::generators::{
    CertificateRequest, DocumentType, OperationSheetRequest, ReportRequest, RodentRegisterRequest,
    ScheduleRequest,
};
use pestdocs_server::templates::FsTemplateStore;
use pestdocs_server::{DocumentError, DocumentService, Format};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const PDF_PREFIX: &[u8] = b"%PDF-mock:";

struct Fixture {
    dir: tempfile::TempDir,
    backend: Arc<MockBackend>,
    service: DocumentService,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    write_templates(dir.path());
    let backend = Arc::new(MockBackend::new(Duration::ZERO));
    let pipeline = Arc::new(ConversionPipeline::new(
        backend.clone(),
        PipelineOptions::default(),
    ));
    let service = DocumentService::new(Arc::new(FsTemplateStore::new(dir.path())), pipeline);
    Fixture {
        dir,
        backend,
        service,
    }
}

/// The container the mock converter received.
fn converted_source(bytes: &[u8]) -> &[u8] {
    assert!(bytes.starts_with(PDF_PREFIX));
    &bytes[PDF_PREFIX.len()..]
}

fn write_templates(root: &Path) {
    let certificate = odg(&[
        odg_frame("Certificado N° {numero}"),
        odg_frame("{cliente} ({documento})"),
        odg_frame("Servicios: {servicios}"),
        odg_frame("Vigente hasta {vigencia}"),
        odg_frame("Emitido el {fecha_emision}"),
    ]
    .concat());
    std::fs::write(root.join("certificado.odg"), certificate).unwrap();

    let operation = docx(&format!(
        "{}{}{}",
        w_paragraph(&["Ficha {numero} - {cliente}"]),
        w_table(&[
            &["Área", "Plaga", "Producto", "Dosis", "Método"],
            &["{area}", "{plaga}", "{producto}", "{dosis}", "{metodo}"],
        ]),
        w_paragraph(&["Observaciones: {observaciones}"])
    ));
    std::fs::write(root.join("ficha_operacion.docx"), operation).unwrap();

    let register = xlsx(
        &worksheet(
            &[
                x_row(1, &[x_shared("A1", 0)]),
                x_row(
                    7,
                    &[
                        x_inline("A7", "{estacion}"),
                        x_inline("B7", "{ubicacion}"),
                        x_inline("C7", "{tipo_cebo}"),
                        x_inline("D7", "{consumo}"),
                        x_inline("E7", "{estado}"),
                        x_inline("F7", "{observacion}"),
                    ],
                ),
                x_row(8, &[x_shared("A8", 1)]),
            ],
            &[],
            "F8",
        ),
        &["Registro {periodo} - {cliente}", "Total: {total_estaciones}"],
    );
    std::fs::write(root.join("registro_roedores.xlsx"), register).unwrap();

    let schedule = xlsx(
        &worksheet(
            &[
                x_row(1, &[x_shared("A1", 0)]),
                x_row(
                    5,
                    &[
                        x_inline("A5", "{fecha}"),
                        x_inline("B5", "{dia}"),
                        x_inline("C5", "{hora}"),
                        x_inline("D5", "{servicios}"),
                    ],
                ),
            ],
            &[],
            "D5",
        ),
        &["{cliente} - {plan}: {mes} {anio}"],
    );
    std::fs::write(root.join("programa_servicios.xlsx"), schedule).unwrap();

    let report = docx(&format!(
        "{}{}",
        w_paragraph(&["Informe {numero}: {titulo}"]),
        w_table(&[&["{seccion_titulo}", "{seccion_texto}"]])
    ));
    std::fs::write(root.join("informe_tecnico.docx"), report).unwrap();
}

fn cliente() -> serde_json::Value {
    json!({"nombre": "ACME Ltda.", "documento": "76.123.456-7", "direccion": "Av. Central 123"})
}

fn certificate() -> CertificateRequest {
    serde_json::from_value(json!({
        "cliente": cliente(),
        "certificado": {
            "numero": "000123",
            "servicios": ["Desratización", "Sanitización"],
            "fecha_servicio": "2024-03-15",
            "vigencia_hasta": "2024-06-15",
            "tecnico": "J. Pérez",
            "fecha_emision": "2024-03-16"
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_certificate_to_pdf() {
    let fx = fixture();
    let doc = fx.service.certificate(&certificate(), Format::Pdf).await.unwrap();

    assert_eq!(doc.filename, "certificado-000123-acme-ltda.pdf");
    assert_eq!(doc.mime_type, "application/pdf");
    assert_eq!(doc.format, Format::Pdf);
    assert_eq!(
        extract_text(converted_source(&doc.bytes), Format::VectorGraphics).unwrap(),
        vec![
            "Certificado N° 000123",
            "ACME Ltda. (76.123.456-7)",
            "Servicios: Desratización, Sanitización",
            "Vigente hasta 15/06/2024",
            "Emitido el 16 de marzo de 2024",
        ]
    );
    assert_eq!(fx.backend.calls(), 1);
}

#[tokio::test]
async fn test_template_format_needs_no_converter() {
    let fx = fixture();
    let doc = fx
        .service
        .certificate(&certificate(), Format::VectorGraphics)
        .await
        .unwrap();
    assert_eq!(doc.filename, "certificado-000123-acme-ltda.odg");
    assert_eq!(part_names(&doc.bytes)[0], "mimetype");
    assert_eq!(fx.backend.calls(), 0);
}

#[tokio::test]
async fn test_operation_sheet_pads_areas() {
    let fx = fixture();
    let request: OperationSheetRequest = serde_json::from_value(json!({
        "cliente": cliente(),
        "visita": {
            "numero": "F-88",
            "fecha": "2024-03-15",
            "hora_inicio": "08:30:00",
            "hora_termino": "10:00:00",
            "tecnico": "R. Díaz",
            "servicio": "Desinsectación"
        },
        "areas": [
            {"area": "Cocina", "plaga": "Cucarachas", "producto": "Gel", "dosis": "5 g", "metodo": "Aplicación"},
            {"area": "Bodega", "plaga": "Hormigas"}
        ]
    }))
    .unwrap();

    let doc = fx.service.operation_sheet(&request, Format::Pdf).await.unwrap();
    assert_eq!(doc.filename, "ficha-operacion-f-88-acme-ltda-20240315.pdf");

    let filled = converted_source(&doc.bytes);
    let xml = read_part(filled, "word/document.xml").unwrap();
    assert_eq!(xml.matches("<w:tr>").count(), 11);

    let text = extract_text(filled, Format::WordProcessor).unwrap();
    assert_eq!(text[0], "Ficha F-88 - ACME Ltda.");
    assert_eq!(&text[6..11], &["Cocina", "Cucarachas", "Gel", "5 g", "Aplicación"]);
    assert_eq!(&text[11..16], &["Bodega", "Hormigas", "", "", ""]);
    assert_eq!(text.last().unwrap(), "Observaciones: ");
}

#[tokio::test]
async fn test_row_values_that_look_like_tokens_stay_literal() {
    let fx = fixture();
    let request: OperationSheetRequest = serde_json::from_value(json!({
        "cliente": cliente(),
        "visita": {
            "numero": "F-90",
            "fecha": "2024-03-15",
            "hora_inicio": "08:30:00",
            "hora_termino": "10:00:00",
            "tecnico": "R. Díaz",
            "servicio": "Desinsectación",
            "observaciones": "revisar {area}"
        },
        "areas": [
            {"area": "Sala {cliente}", "plaga": "ver {nota}", "producto": "Gel", "dosis": "5 g", "metodo": "Cebo"}
        ]
    }))
    .unwrap();

    for policy in [
        UnresolvedTokens::Keep,
        UnresolvedTokens::Blank,
        UnresolvedTokens::Reject,
    ] {
        let service = fx.service.clone().with_policy(policy);
        let doc = service
            .operation_sheet(&request, Format::WordProcessor)
            .await
            .unwrap();
        let text = extract_text(&doc.bytes, Format::WordProcessor).unwrap();
        assert_eq!(&text[6..8], &["Sala {cliente}", "ver {nota}"], "{:?}", policy);
        assert_eq!(text[0], "Ficha F-90 - ACME Ltda.");
        assert_eq!(text.last().unwrap(), "Observaciones: revisar {area}");
    }
}

#[tokio::test]
async fn test_rodent_register_has_twenty_station_rows() {
    let fx = fixture();
    let request: RodentRegisterRequest = serde_json::from_value(json!({
        "cliente": cliente(),
        "fecha": "2024-03-01",
        "tecnico": "R. Díaz",
        "periodo": "Marzo 2024",
        "estaciones": [
            {"numero": "E1", "ubicacion": "Acceso", "consumo": "parcial"},
            {"numero": "E2", "ubicacion": "Patio", "consumo": "sin_consumo"},
            {"numero": "E3", "ubicacion": "Bodega", "consumo": "total"}
        ]
    }))
    .unwrap();

    let doc = fx
        .service
        .rodent_register(&request, Format::Spreadsheet)
        .await
        .unwrap();
    assert_eq!(doc.filename, "registro-roedores-acme-ltda-20240301.xlsx");

    let sheet = read_part(&doc.bytes, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet.contains(r#"<row r="26""#));
    assert!(sheet.contains(r#"<row r="27""#));
    assert!(!sheet.contains(r#"<row r="28""#));
    assert!(sheet.contains(r#"<c r="D7" t="inlineStr"><is><t>Parcial</t></is></c>"#));
    assert!(sheet.contains(r#"<c r="D9" t="inlineStr"><is><t>Total</t></is></c>"#));
    assert!(sheet.contains(r#"<c r="A26" t="inlineStr"><is><t></t></is></c>"#));
    assert!(sheet.contains(r#"<dimension ref="A1:F27"/>"#));

    let shared = read_part(&doc.bytes, "xl/sharedStrings.xml").unwrap();
    assert!(shared.contains("Registro Marzo 2024 - ACME Ltda."));
    assert!(shared.contains("Total: 3"));
}

#[tokio::test]
async fn test_schedule_spreads_visits_over_months() {
    let fx = fixture();
    let request: ScheduleRequest = serde_json::from_value(json!({
        "cliente": cliente(),
        "plan": "Plan anual 2024",
        "visitas": [
            {"fecha_hora": "2024-02-10T09:00:00", "servicios": ["Monitoreo"]},
            {"fecha_hora": "2024-01-05T09:00:00", "servicios": ["Desinsectación", "desratizacion"]},
            {"fecha_hora": "2024-01-19T14:30:00", "servicios": ["Monitoreo"]}
        ]
    }))
    .unwrap();

    let doc = fx.service.schedule(&request, Format::Pdf).await.unwrap();
    assert_eq!(doc.filename, "programa-servicios-acme-ltda-202401.pdf");

    let filled = converted_source(&doc.bytes);
    let workbook = read_part(filled, "xl/workbook.xml").unwrap();
    assert!(workbook.contains(r#"name="Enero""#));
    assert!(workbook.contains(r#"name="Febrero""#));

    let enero = read_part(filled, "xl/worksheets/sheet1.xml").unwrap();
    assert!(enero.contains("ACME Ltda. - Plan anual 2024: Enero 2024"));
    assert!(enero.contains("<t>D, R</t>"));
    assert!(enero.contains("<t>14:30</t>"));
    let febrero = read_part(filled, "xl/worksheets/sheet2.xml").unwrap();
    assert!(febrero.contains("ACME Ltda. - Plan anual 2024: Febrero 2024"));
    assert!(febrero.contains("<t>10/02/2024</t>"));

    // the template row text left in the shared table is blanked
    let shared = read_part(filled, "xl/sharedStrings.xml").unwrap();
    assert!(!shared.contains("{mes}"));
}

#[tokio::test]
async fn test_report_sections_become_rows() {
    let fx = fixture();
    let request: ReportRequest = serde_json::from_value(json!({
        "cliente": cliente(),
        "informe": {"numero": "INF-9", "titulo": "Inspección anual", "fecha": "2024-03-15", "autor": "R. Díaz"},
        "secciones": [
            {"tipo": "text_block", "title": "Resumen", "body": "Sin actividad de roedores."},
            {"tipo": "text_area", "title": "Hallazgos", "lines": ["Fecas en bodega", "Cebo E3 consumido"]}
        ]
    }))
    .unwrap();

    let doc = fx
        .service
        .narrative_report(&request, Format::WordProcessor)
        .await
        .unwrap();
    assert_eq!(doc.filename, "informe-tecnico-inf-9-acme-ltda.docx");
    assert_eq!(
        extract_text(&doc.bytes, Format::WordProcessor).unwrap(),
        vec![
            "Informe INF-9: Inspección anual",
            "Resumen",
            "Sin actividad de roedores.",
            "Hallazgos",
            "Fecas en bodega",
            "",
            "Cebo E3 consumido",
        ]
    );
}

#[tokio::test]
async fn test_missing_template_and_converter_outage_differ() {
    let fx = fixture();
    std::fs::remove_file(fx.dir.path().join("certificado.odg")).unwrap();
    let missing = fx
        .service
        .certificate(&certificate(), Format::Pdf)
        .await
        .unwrap_err();
    assert!(matches!(missing, DocumentError::TemplateNotFound { .. }));

    let fx = fixture();
    *fx.backend.mode.lock().unwrap() = MockMode::Unavailable;
    let down = fx
        .service
        .certificate(&certificate(), Format::Pdf)
        .await
        .unwrap_err();
    assert!(matches!(down, DocumentError::ConversionUnavailable(_)));
    assert_ne!(missing.user_message(), down.user_message());
}

#[tokio::test]
async fn test_invalid_data_is_reported_before_loading() {
    let fx = fixture();
    let mut request = certificate();
    request.certificado.servicios = vec!["Jardinería".to_string()];
    std::fs::remove_file(fx.dir.path().join("certificado.odg")).unwrap();

    let err = fx.service.certificate(&request, Format::Pdf).await.unwrap_err();
    assert!(matches!(err, DocumentError::InvalidDomainData(msg) if msg.contains("Jardinería")));
    assert_eq!(fx.backend.calls(), 0);
}

#[tokio::test]
async fn test_unsupported_target_fails_before_filling() {
    let fx = fixture();
    let request: RodentRegisterRequest = serde_json::from_value(json!({
        "cliente": cliente(),
        "fecha": "2024-03-01",
        "tecnico": "R. Díaz"
    }))
    .unwrap();
    let err = fx
        .service
        .rodent_register(&request, Format::WordProcessor)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DocumentError::UnsupportedFormatPair {
            from: Format::Spreadsheet,
            to: Format::WordProcessor
        }
    ));
    assert_eq!(fx.backend.calls(), 0);
}

#[tokio::test]
async fn test_reject_policy_and_template_override() {
    let fx = fixture();
    std::fs::create_dir(fx.dir.path().join("v2")).unwrap();
    std::fs::write(
        fx.dir.path().join("v2/certificado.odg"),
        odg(&odg_frame("{numero} sellado por {sello}")),
    )
    .unwrap();

    let service = fx
        .service
        .clone()
        .with_template(DocumentType::Certificate, "v2/certificado.odg");
    assert_eq!(service.template_id(DocumentType::Certificate), "v2/certificado.odg");

    let kept = service
        .certificate(&certificate(), Format::VectorGraphics)
        .await
        .unwrap();
    assert_eq!(
        extract_text(&kept.bytes, Format::VectorGraphics).unwrap(),
        vec!["000123 sellado por {sello}"]
    );

    let strict = service.with_policy(UnresolvedTokens::Reject);
    let err = strict
        .certificate(&certificate(), Format::VectorGraphics)
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::MalformedTemplate(msg) if msg.contains("{sello}")));
}
