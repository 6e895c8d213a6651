mod common;

use common::*;
use pestdocs_server::engine::{
    expand_rows, extract_text, fill_rows, PlaceholderMap, RowSpec, UnresolvedTokens,
};
use pestdocs_server::{DocumentError, Format};

fn area(name: &str, dose: &str) -> PlaceholderMap {
    PlaceholderMap::from_pairs([("{area}", name), ("{dosis}", dose)]).unwrap()
}

fn operation_table() -> Vec<u8> {
    docx(&format!(
        "{}{}{}",
        w_paragraph(&["Ficha {numero}"]),
        w_table(&[&["Área", "Dosis"], &["{area}", "{dosis}"], &["Total", "{total}"]]),
        w_paragraph(&["Firma"])
    ))
}

#[test]
fn test_docx_rows_are_padded_to_minimum() {
    let template = operation_table();
    let spec = RowSpec::new(0, 1, &["{area}", "{dosis}"])
        .unwrap()
        .with_rows(vec![area("Cocina", "10 ml/L"), area("Bodega", "5 ml/L"), area("Baño", "2 g")])
        .with_minimum(10);
    let out = expand_rows(&template, Format::WordProcessor, &spec).unwrap();

    let xml = read_part(&out, "word/document.xml").unwrap();
    assert_eq!(xml.matches("<w:tr>").count(), 12);
    // row properties travel with every copy
    assert_eq!(xml.matches("w:trHeight").count(), 12);

    let text = extract_text(&out, Format::WordProcessor).unwrap();
    assert_eq!(&text[..3], &["Ficha {numero}", "Área", "Dosis"]);
    assert_eq!(&text[3..9], &["Cocina", "10 ml/L", "Bodega", "5 ml/L", "Baño", "2 g"]);
    assert!(text[9..23].iter().all(String::is_empty));
    assert_eq!(&text[23..], &["Total", "{total}", "Firma"]);
}

#[test]
fn test_docx_more_data_than_minimum() {
    let template = operation_table();
    let rows: Vec<_> = (1..=13).map(|i| area(&format!("Zona {}", i), "1 L")).collect();
    let spec = RowSpec::new(0, 1, &["{area}", "{dosis}"])
        .unwrap()
        .with_rows(rows)
        .with_minimum(10);
    let out = expand_rows(&template, Format::WordProcessor, &spec).unwrap();
    let xml = read_part(&out, "word/document.xml").unwrap();
    assert_eq!(xml.matches("<w:tr>").count(), 15);
    assert!(xml.contains("Zona 13"));
}

#[test]
fn test_docx_anchor_without_tokens_is_malformed() {
    let template = operation_table();
    let spec = RowSpec::new(0, 0, &["{area}", "{dosis}"]).unwrap();
    let err = expand_rows(&template, Format::WordProcessor, &spec).unwrap_err();
    assert!(matches!(err, DocumentError::MalformedTemplate(msg) if msg.contains("{area}")));

    let spec = RowSpec::new(3, 1, &["{area}"]).unwrap();
    let err = expand_rows(&template, Format::WordProcessor, &spec).unwrap_err();
    assert!(matches!(err, DocumentError::MalformedTemplate(_)));
}

fn station(number: &str, consumption: &str) -> PlaceholderMap {
    PlaceholderMap::from_pairs([("{estacion}", number), ("{consumo}", consumption)]).unwrap()
}

fn register_workbook() -> Vec<u8> {
    let sheet = worksheet(
        &[
            x_row(1, &[x_shared("A1", 0), x_shared("B1", 1)]),
            x_row(2, &[x_shared("A2", 2), x_inline("B2", "{consumo}")]),
            x_row(3, &[x_shared("A3", 3)]),
        ],
        &["A3:B3"],
        "B3",
    );
    xlsx(&sheet, &["Estación", "Consumo", "{estacion}", "Observaciones generales"])
}

#[test]
fn test_xlsx_rows_are_renumbered_and_footer_moves_down() {
    let template = register_workbook();
    let spec = RowSpec::new(0, 1, &["{estacion}", "{consumo}"])
        .unwrap()
        .with_rows(vec![station("E-1", "Parcial"), station("E-2", "Sin consumo")])
        .with_minimum(4);
    let out = expand_rows(&template, Format::Spreadsheet, &spec).unwrap();

    let sheet = read_part(&out, "xl/worksheets/sheet1.xml").unwrap();
    for n in 1..=6 {
        assert!(sheet.contains(&format!(r#"<row r="{}""#, n)), "row {} missing", n);
    }
    assert!(!sheet.contains(r#"<row r="7""#));
    // token cells from the shared table now carry their own text
    assert!(sheet.contains(r#"<c r="A2" t="inlineStr"><is><t>E-1</t></is></c>"#));
    assert!(sheet.contains(r#"<c r="B3" t="inlineStr"><is><t>Sin consumo</t></is></c>"#));
    assert!(sheet.contains(r#"<c r="A5" t="inlineStr"><is><t></t></is></c>"#));
    // footer row and its merge follow
    assert!(sheet.contains(r#"<c r="A6" t="s"><v>3</v></c>"#));
    assert!(sheet.contains(r#"<mergeCells count="1"><mergeCell ref="A6:B6"/></mergeCells>"#));
    assert!(sheet.contains(r#"<dimension ref="A1:B6"/>"#));

    // the shared table itself is left alone
    assert_eq!(
        read_part(&out, "xl/sharedStrings.xml"),
        read_part(&template, "xl/sharedStrings.xml")
    );
}

#[test]
fn test_xlsx_zero_rows_drops_anchor() {
    let template = register_workbook();
    let spec = RowSpec::new(0, 1, &["{estacion}", "{consumo}"]).unwrap();
    let out = expand_rows(&template, Format::Spreadsheet, &spec).unwrap();
    let sheet = read_part(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(!sheet.contains(r#"<row r="3""#));
    assert!(sheet.contains(r#"<c r="A2" t="s"><v>3</v></c>"#));
    assert!(sheet.contains(r#"<dimension ref="A1:B2"/>"#));
}

#[test]
fn test_xlsx_missing_sheet_or_row() {
    let template = register_workbook();
    let spec = RowSpec::new(1, 1, &["{estacion}"]).unwrap();
    assert!(matches!(
        expand_rows(&template, Format::Spreadsheet, &spec),
        Err(DocumentError::MalformedTemplate(_))
    ));

    let spec = RowSpec::new(0, 40, &["{estacion}"]).unwrap();
    assert!(matches!(
        expand_rows(&template, Format::Spreadsheet, &spec),
        Err(DocumentError::MalformedTemplate(_))
    ));
}

#[test]
fn test_xlsx_table_part_grows_with_its_rows() {
    let sheet = worksheet(
        &[
            x_row(1, &[x_shared("A1", 0), x_shared("B1", 1)]),
            x_row(2, &[x_shared("A2", 2), x_inline("B2", "{consumo}")]),
            x_row(3, &[x_shared("A3", 3)]),
        ],
        &[],
        "B3",
    )
    .replace("</worksheet>", &format!("{}</worksheet>", table_parts()));
    let template = xlsx_with_table(
        &sheet,
        &["Estación", "Consumo", "{estacion}", "Observaciones de {cliente}"],
        "A1:B2",
    );
    let spec = RowSpec::new(0, 1, &["{estacion}", "{consumo}"])
        .unwrap()
        .with_rows(vec![station("E-1", "{cliente}")])
        .with_minimum(3);
    let header = PlaceholderMap::from_pairs([("{cliente}", "ACME")]).unwrap();
    let out = fill_rows(
        &template,
        Format::Spreadsheet,
        &header,
        &[spec],
        UnresolvedTokens::Reject,
    )
    .unwrap();

    let table = read_part(&out, "xl/tables/table1.xml").unwrap();
    assert!(table.contains(r#"ref="A1:B4""#));
    assert!(table.contains(r#"<autoFilter ref="A1:B4"/>"#));

    let sheet = read_part(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet.contains(r#"<c r="B2" t="inlineStr"><is><t>{cliente}</t></is></c>"#));
    assert!(sheet.contains(r#"<c r="A5" t="s"><v>3</v></c>"#));
    let shared = read_part(&out, "xl/sharedStrings.xml").unwrap();
    assert!(shared.contains("Observaciones de ACME"));
}

#[test]
fn test_docx_two_regions_and_header_in_one_pass() {
    let template = docx(&format!(
        "{}{}{}",
        w_paragraph(&["Ficha {numero}"]),
        w_table(&[&["{area}", "{dosis}"], &["Productos"], &["{producto}"]]),
        w_paragraph(&["Total {total}"])
    ));
    let areas = RowSpec::new(0, 0, &["{area}", "{dosis}"])
        .unwrap()
        .with_rows(vec![area("Cocina {total}", "1 ml"), area("Bodega", "2 ml")]);
    let products = RowSpec::new(0, 2, &["{producto}"])
        .unwrap()
        .with_minimum(2);
    let header = PlaceholderMap::from_pairs([("{numero}", "F-1"), ("{total}", "3 ml")]).unwrap();

    let out = fill_rows(
        &template,
        Format::WordProcessor,
        &header,
        &[areas, products],
        UnresolvedTokens::Reject,
    )
    .unwrap();
    assert_eq!(
        extract_text(&out, Format::WordProcessor).unwrap(),
        vec![
            "Ficha F-1",
            "Cocina {total}",
            "1 ml",
            "Bodega",
            "2 ml",
            "Productos",
            "",
            "",
            "Total 3 ml",
        ]
    );
}
