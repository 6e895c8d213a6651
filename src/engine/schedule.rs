//! Multi-month service schedules.
//!
//! Dated entries are grouped by calendar month and each month gets its own
//! worksheet, cloned from the template's first sheet.

use chrono::{Datelike, NaiveDateTime};

use super::calendar::{fold_accents, format_date, format_time, month_name, weekday_name};
use super::dialect::SPREADSHEET;
use super::package::Package;
use super::placeholder::{PlaceholderMap, Token, UnresolvedTokens};
use super::rows::{RowFill, RowSpec};
use super::sheet::{
    fill_sheet_rows, inline_sheet_cells, read_required, resolve_relative, sheet_rels_part,
    shift_sheet_tables, workbook_sheets, SharedStrings, SheetEntry, CONTENT_TYPES, TABLE_REL,
    WORKBOOK, WORKBOOK_RELS,
};
use super::substitute::substitute_package;
use super::xml::{Element, Node, XmlDocument};
use crate::error::DocumentError;
use crate::format::Format;

pub const FECHA: &str = "{fecha}";
pub const DIA: &str = "{dia}";
pub const HORA: &str = "{hora}";
pub const SERVICIOS: &str = "{servicios}";
pub const MES: &str = "{mes}";
pub const ANIO: &str = "{anio}";

/// Tokens of one schedule row.
pub const ROW_TOKENS: [&str; 4] = [FECHA, DIA, HORA, SERVICIOS];

const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

const SERVICE_CODES: [(&str, char); 8] = [
    ("desinsectacion", 'D'),
    ("desratizacion", 'R'),
    ("sanitizacion", 'S'),
    ("fumigacion", 'F'),
    ("control de termitas", 'T'),
    ("control de aves", 'A'),
    ("monitoreo", 'M'),
    ("limpieza de estanques", 'L'),
];

/// One scheduled visit: when, and which services are performed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub at: NaiveDateTime,
    labels: Vec<String>,
}

impl ScheduleEntry {
    /// Duplicate labels are dropped; first occurrence wins.
    pub fn new<I, S>(at: NaiveDateTime, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into();
            if !unique.contains(&label) {
                unique.push(label);
            }
        }
        Self { at, labels: unique }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Service codes in label order, e.g. `"D, R"`.
    pub fn codes(&self) -> Result<String, DocumentError> {
        let codes = self
            .labels
            .iter()
            .map(|label| service_code(label).map(String::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(codes.join(", "))
    }
}

/// Single-letter code for a service label; case and accents are ignored.
pub fn service_code(label: &str) -> Result<char, DocumentError> {
    let folded = fold_accents(label);
    let normalized = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    SERVICE_CODES
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, code)| *code)
        .ok_or_else(|| DocumentError::InvalidDomainData(format!("unknown service '{}'", label)))
}

/// Where the repeatable row sits in the template's first worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleLayout {
    /// Spreadsheet row number minus one.
    pub anchor_row: usize,
    pub minimum: usize,
}

impl Default for ScheduleLayout {
    fn default() -> Self {
        Self {
            anchor_row: 5,
            minimum: 0,
        }
    }
}

/// Entries of one calendar month, sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthGroup<'a> {
    pub year: i32,
    pub month: u32,
    pub entries: Vec<&'a ScheduleEntry>,
}

/// Group by (year, month), both levels ascending. Equal timestamps keep input order.
pub fn group_entries(entries: &[ScheduleEntry]) -> Vec<MonthGroup<'_>> {
    let mut sorted: Vec<&ScheduleEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.at);

    let mut groups: Vec<MonthGroup<'_>> = Vec::new();
    for entry in sorted {
        let (year, month) = (entry.at.year(), entry.at.month());
        match groups.last_mut() {
            Some(group) if group.year == year && group.month == month => group.entries.push(entry),
            _ => groups.push(MonthGroup {
                year,
                month,
                entries: vec![entry],
            }),
        }
    }
    groups
}

/// Sheet names for the groups: month names, with the year when several years appear.
pub fn sheet_names(groups: &[MonthGroup<'_>]) -> Vec<String> {
    let multi_year = groups
        .first()
        .zip(groups.last())
        .is_some_and(|(first, last)| first.year != last.year);
    groups
        .iter()
        .map(|group| {
            if multi_year {
                format!("{} {}", month_name(group.month), group.year)
            } else {
                month_name(group.month).to_string()
            }
        })
        .collect()
}

/// Build a schedule workbook with one sheet per month of `entries`.
pub fn build_schedule(
    template: &[u8],
    layout: &ScheduleLayout,
    header: &PlaceholderMap,
    entries: &[ScheduleEntry],
) -> Result<Vec<u8>, DocumentError> {
    build_schedule_with(template, layout, header, entries, UnresolvedTokens::Keep)
}

/// Like [`build_schedule`], with `policy` applied to tokens nothing fills.
///
/// Each month sheet is filled in one pass: row tokens from the entries,
/// `{mes}` and `{anio}` from the month, everything else from `header`.
pub fn build_schedule_with(
    template: &[u8],
    layout: &ScheduleLayout,
    header: &PlaceholderMap,
    entries: &[ScheduleEntry],
    policy: UnresolvedTokens,
) -> Result<Vec<u8>, DocumentError> {
    if entries.is_empty() {
        return Err(DocumentError::InvalidDomainData(
            "a schedule needs at least one entry".to_string(),
        ));
    }
    let groups = group_entries(entries);
    let names = sheet_names(&groups);
    let sheet_rows = groups
        .iter()
        .map(month_rows)
        .collect::<Result<Vec<_>, _>>()?;

    let mut package = Package::open(template)?;
    let sheets = workbook_sheets(&mut package)?;
    let first = sheets
        .first()
        .cloned()
        .ok_or_else(|| DocumentError::malformed("workbook has no worksheets"))?;

    let shared = SharedStrings::load(&mut package)?;
    let mut base = XmlDocument::parse(&read_required(&mut package, &first.part)?)?;
    inline_sheet_cells(&mut base, &shared);

    let mut registry = WorkbookRegistry::load(&mut package, &first)?;
    let mut month_parts = Vec::with_capacity(groups.len());
    for (i, ((group, name), rows)) in groups.iter().zip(&names).zip(sheet_rows).enumerate() {
        let mut doc = base.clone();
        let spec = RowSpec::new(0, layout.anchor_row, &ROW_TOKENS)?
            .with_rows(rows)
            .with_minimum(layout.minimum);

        let mut values = header.clone();
        values.insert(Token::new(MES)?, month_name(group.month));
        values.insert(Token::new(ANIO)?, group.year.to_string());
        let fill = RowFill::with_header(&values, policy);
        let shifts = fill_sheet_rows(&mut doc, &SharedStrings::default(), &[&spec], &fill)?;

        let part = if i == 0 {
            registry.rename_first(name);
            first.part.clone()
        } else {
            clear_tab_selection(&mut doc);
            registry.add_sheet(&mut package, name)?
        };
        package.write(&part, doc.to_xml());
        shift_sheet_tables(&mut package, &part, &shifts)?;
        month_parts.push(part);
    }
    registry.store(&mut package);

    // Other sheets and the shared strings still hold template text.
    let mut rest = header.clone();
    let consumed = ROW_TOKENS
        .iter()
        .chain([MES, ANIO].iter())
        .map(|raw| Token::new(raw))
        .collect::<Result<Vec<_>, _>>()?;
    rest.extend_missing(&PlaceholderMap::blank(&consumed));
    substitute_package(
        &mut package,
        Format::Spreadsheet,
        &SPREADSHEET,
        &rest,
        policy,
        &month_parts,
    )?;

    log::debug!(
        "built schedule with {} entries over {} sheets",
        entries.len(),
        groups.len()
    );
    package.finish()
}

fn month_rows(group: &MonthGroup<'_>) -> Result<Vec<PlaceholderMap>, DocumentError> {
    group
        .entries
        .iter()
        .map(|entry| {
            PlaceholderMap::from_pairs([
                (FECHA, format_date(entry.at.date())),
                (DIA, weekday_name(entry.at.weekday()).to_string()),
                (HORA, format_time(entry.at)),
                (SERVICIOS, entry.codes()?),
            ])
        })
        .collect()
}

fn clear_tab_selection(doc: &mut XmlDocument) {
    if let Some(views) = doc.find_mut("sheetViews") {
        for view in views.child_elements_mut("sheetView") {
            view.remove_attr("tabSelected");
        }
    }
}

/// A part the template sheet owns through its relationships, as it was
/// before any month was written.
struct OwnedPart {
    rel_id: String,
    part: String,
    content: Vec<u8>,
    /// The part's own relationships, copied as they are.
    rels: Option<Vec<u8>>,
    is_table: bool,
}

/// Workbook-level bookkeeping for sheets cloned from the first one.
struct WorkbookRegistry {
    template: SheetEntry,
    workbook: XmlDocument,
    rels: XmlDocument,
    content_types: XmlDocument,
    sheet_rels: Option<XmlDocument>,
    owned: Vec<OwnedPart>,
    added: usize,
    next_sheet_id: u32,
    next_table_id: u32,
}

impl WorkbookRegistry {
    fn load(package: &mut Package<'_>, template: &SheetEntry) -> Result<Self, DocumentError> {
        let workbook = XmlDocument::parse(&read_required(package, WORKBOOK)?)?;
        let rels = XmlDocument::parse(&read_required(package, WORKBOOK_RELS)?)?;
        let content_types = XmlDocument::parse(&read_required(package, CONTENT_TYPES)?)?;
        let sheet_rels = package
            .read_text(&sheet_rels_part(&template.part))?
            .map(|xml| XmlDocument::parse(&xml))
            .transpose()?;
        let owned = match &sheet_rels {
            Some(rels) => owned_parts(package, &template.part, rels)?,
            None => Vec::new(),
        };
        let next_table_id = max_table_id(package)? + 1;

        let next_sheet_id = workbook
            .find("sheets")
            .map(|sheets| {
                sheets
                    .child_elements("sheet")
                    .filter_map(|sheet| sheet.attr("sheetId")?.parse::<u32>().ok())
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
            + 1;

        Ok(Self {
            template: template.clone(),
            workbook,
            rels,
            content_types,
            sheet_rels,
            owned,
            added: 0,
            next_sheet_id,
            next_table_id,
        })
    }

    fn rename_first(&mut self, name: &str) {
        let old = self.template.name.clone();
        if let Some(sheet) = self.sheet_element_mut() {
            sheet.set_attr("name", name);
        }
        if let Some(names) = self.workbook.find_mut("definedNames") {
            for defined in names.child_elements_mut("definedName") {
                rename_references(defined, &old, name);
            }
        }
        self.template.name = name.to_string();
    }

    /// Register a new worksheet right after the last one added and return its part name.
    fn add_sheet(&mut self, package: &mut Package<'_>, name: &str) -> Result<String, DocumentError> {
        let part = self.free_part_name(package);
        let rel_id = self.free_rel_id();
        let sheet_id = self.next_sheet_id;
        self.next_sheet_id += 1;
        self.added += 1;
        let position = self.added;

        self.insert_sheet_entry(name, sheet_id, &rel_id)?;
        self.insert_relationship(&rel_id, &part)?;
        self.insert_override(&part)?;
        self.copy_defined_names(name, position);
        if let Some(rels) = self.clone_owned_parts(package)? {
            package.write(&sheet_rels_part(&part), rels.to_xml());
        }
        Ok(part)
    }

    /// Give the new sheet its own copy of every part the template sheet owns
    /// and return its relationships pointing at the copies.
    fn clone_owned_parts(
        &mut self,
        package: &mut Package<'_>,
    ) -> Result<Option<XmlDocument>, DocumentError> {
        let Some(mut rels) = self.sheet_rels.clone() else {
            return Ok(None);
        };

        let mut targets: Vec<(String, String)> = Vec::with_capacity(self.owned.len());
        for index in 0..self.owned.len() {
            let source = &self.owned[index];
            let copy = free_clone_name(package, &source.part);
            let (rel_id, original, part_rels) =
                (source.rel_id.clone(), source.part.clone(), source.rels.clone());
            let content = if source.is_table {
                let content = String::from_utf8_lossy(&source.content).into_owned();
                self.renumber_table(&content)?.into_bytes()
            } else {
                source.content.clone()
            };

            package.write(&copy, content);
            if let Some(part_rels) = part_rels {
                package.write(&sheet_rels_part(&copy), part_rels);
            }
            self.clone_override(&original, &copy)?;
            let file = copy.rsplit('/').next().unwrap_or(copy.as_str()).to_string();
            targets.push((rel_id, file));
        }

        if let Some(root) = rels.find_mut("Relationships") {
            for rel in root.child_elements_mut("Relationship") {
                let Some(id) = rel.attr("Id") else {
                    continue;
                };
                let Some((_, file)) = targets.iter().find(|(rel_id, _)| *rel_id == id) else {
                    continue;
                };
                if let Some(target) = rel.attr("Target") {
                    let retargeted = match target.rsplit_once('/') {
                        Some((dir, _)) => format!("{}/{}", dir, file),
                        None => file.clone(),
                    };
                    rel.set_attr("Target", &retargeted);
                }
            }
        }
        Ok(Some(rels))
    }

    /// Table ids and names are workbook-wide, so each copy gets fresh ones.
    fn renumber_table(&mut self, xml: &str) -> Result<String, DocumentError> {
        let mut table = XmlDocument::parse(xml)?;
        let id = self.next_table_id;
        self.next_table_id += 1;
        if let Some(root) = table.find_mut("table") {
            root.set_attr("id", &id.to_string());
            for key in ["name", "displayName"] {
                if let Some(name) = root.attr(key) {
                    root.set_attr(key, &format!("{}_{}", name, id));
                }
            }
        }
        Ok(table.to_xml())
    }

    fn store(self, package: &mut Package<'_>) {
        package.write(WORKBOOK, self.workbook.to_xml());
        package.write(WORKBOOK_RELS, self.rels.to_xml());
        package.write(CONTENT_TYPES, self.content_types.to_xml());
    }

    fn sheet_element_mut(&mut self) -> Option<&mut Element> {
        let rel_id = self.template.rel_id.clone();
        self.workbook
            .find_mut("sheets")?
            .child_elements_mut("sheet")
            .find(|sheet| sheet.attr("r:id").as_deref() == Some(rel_id.as_str()))
    }

    fn insert_sheet_entry(&mut self, name: &str, sheet_id: u32, rel_id: &str) -> Result<(), DocumentError> {
        let rel = self.template.rel_id.clone();
        let added = self.added;
        let sheets = self
            .workbook
            .find_mut("sheets")
            .ok_or_else(|| DocumentError::malformed("workbook has no sheets"))?;
        let template_index = sheets
            .children
            .iter()
            .position(|node| {
                node.as_element()
                    .is_some_and(|el| el.attr("r:id").as_deref() == Some(rel.as_str()))
            })
            .ok_or_else(|| DocumentError::malformed("template sheet entry vanished"))?;

        let Some(Node::Element(template)) = sheets.children.get(template_index) else {
            return Err(DocumentError::malformed("template sheet entry vanished"));
        };
        let mut entry = template.clone();
        entry.set_attr("name", name);
        entry.set_attr("sheetId", &sheet_id.to_string());
        entry.set_attr("r:id", rel_id);

        // Sheets before this one: the template plus every earlier clone.
        let mut insert_at = template_index + 1;
        let mut seen = 1;
        while seen < added && insert_at < sheets.children.len() {
            if sheets.children[insert_at].as_element().is_some() {
                seen += 1;
            }
            insert_at += 1;
        }
        sheets.children.insert(insert_at, Node::Element(entry));
        Ok(())
    }

    fn insert_relationship(&mut self, rel_id: &str, part: &str) -> Result<(), DocumentError> {
        let template_rel = self.template.rel_id.clone();
        let root = self
            .rels
            .find_mut("Relationships")
            .ok_or_else(|| DocumentError::malformed("workbook relationships are empty"))?;
        let mut rel = root
            .child_elements("Relationship")
            .find(|rel| rel.attr("Id").as_deref() == Some(template_rel.as_str()))
            .cloned()
            .ok_or_else(|| DocumentError::malformed("template sheet relationship vanished"))?;
        rel.set_attr("Id", rel_id);
        rel.set_attr("Target", part.strip_prefix("xl/").unwrap_or(part));
        root.children.push(Node::Element(rel));
        Ok(())
    }

    /// Repeat the content-type override of `from`, if it has one, for `to`.
    fn clone_override(&mut self, from: &str, to: &str) -> Result<(), DocumentError> {
        let from_name = format!("/{}", from);
        let root = self
            .content_types
            .find_mut("Types")
            .ok_or_else(|| DocumentError::malformed("content types are empty"))?;
        let entry = root
            .child_elements("Override")
            .find(|o| o.attr("PartName").as_deref() == Some(from_name.as_str()))
            .cloned();
        if let Some(mut entry) = entry {
            entry.set_attr("PartName", &format!("/{}", to));
            root.children.push(Node::Element(entry));
        }
        Ok(())
    }

    fn insert_override(&mut self, part: &str) -> Result<(), DocumentError> {
        let template_name = format!("/{}", self.template.part);
        let root = self
            .content_types
            .find_mut("Types")
            .ok_or_else(|| DocumentError::malformed("content types are empty"))?;
        let mut entry = root
            .child_elements("Override")
            .find(|o| o.attr("PartName").as_deref() == Some(template_name.as_str()))
            .cloned()
            .unwrap_or_else(|| {
                Element::new(
                    "Override",
                    &[("PartName", ""), ("ContentType", WORKSHEET_CONTENT_TYPE)],
                    Vec::new(),
                )
            });
        entry.set_attr("PartName", &format!("/{}", part));
        root.children.push(Node::Element(entry));
        Ok(())
    }

    /// Sheet-scoped names (print areas, titles) are repeated for each clone.
    fn copy_defined_names(&mut self, name: &str, position: usize) {
        let template_name = self.template.name.clone();
        let Some(names) = self.workbook.find_mut("definedNames") else {
            return;
        };

        let mut copies = Vec::new();
        for defined in names.child_elements_mut("definedName") {
            let Some(local) = defined.attr("localSheetId").and_then(|id| id.parse::<usize>().ok())
            else {
                continue;
            };
            if local == 0 {
                let mut copy = defined.clone();
                copy.set_attr("localSheetId", &position.to_string());
                rename_references(&mut copy, &template_name, name);
                copies.push(Node::Element(copy));
            } else if local >= position {
                defined.set_attr("localSheetId", &(local + 1).to_string());
            }
        }
        names.children.extend(copies);
    }

    fn free_part_name(&self, package: &Package<'_>) -> String {
        let mut n = self.added + 2;
        loop {
            let candidate = format!("xl/worksheets/sheet{}.xml", n);
            if !package.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn free_rel_id(&self) -> String {
        let used: Vec<String> = self
            .rels
            .find("Relationships")
            .map(|root| {
                root.child_elements("Relationship")
                    .filter_map(|rel| rel.attr("Id"))
                    .collect()
            })
            .unwrap_or_default();
        let mut n = used.len() + 1;
        loop {
            let candidate = format!("rId{}", n);
            if !used.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Internal parts the template sheet links to, except shared media.
fn owned_parts(
    package: &mut Package<'_>,
    sheet_part: &str,
    rels: &XmlDocument,
) -> Result<Vec<OwnedPart>, DocumentError> {
    let Some(root) = rels.find("Relationships") else {
        return Ok(Vec::new());
    };

    let mut owned = Vec::new();
    for rel in root.child_elements("Relationship") {
        if rel.attr("TargetMode").as_deref() == Some("External") {
            continue;
        }
        let (Some(rel_id), Some(kind), Some(target)) =
            (rel.attr("Id"), rel.attr("Type"), rel.attr("Target"))
        else {
            continue;
        };
        if kind.ends_with("/image") || kind.ends_with("/hyperlink") {
            continue;
        }
        if kind.ends_with("/pivotTable") {
            return Err(DocumentError::malformed(
                "schedule template sheet holds a pivot table",
            ));
        }

        let part = resolve_relative(sheet_part, &target);
        let Some(content) = package.read(&part)? else {
            log::warn!("sheet relationship {} points at missing part {}", rel_id, part);
            continue;
        };
        let part_rels = package.read(&sheet_rels_part(&part))?;
        if let Some(bytes) = &part_rels {
            if String::from_utf8_lossy(bytes).contains("/relationships/chart\"") {
                return Err(DocumentError::malformed(format!(
                    "schedule template sheet has a chart in {}",
                    part
                )));
            }
        }
        owned.push(OwnedPart {
            rel_id,
            part,
            content,
            rels: part_rels,
            is_table: kind.ends_with(TABLE_REL),
        });
    }
    Ok(owned)
}

fn max_table_id(package: &mut Package<'_>) -> Result<u32, DocumentError> {
    let tables: Vec<String> = package
        .part_names()
        .into_iter()
        .filter(|name| name.starts_with("xl/tables/") && name.ends_with(".xml"))
        .collect();
    let mut max = 0;
    for name in tables {
        let table = XmlDocument::parse(&read_required(package, &name)?)?;
        if let Some(id) = table
            .find("table")
            .and_then(|root| root.attr("id"))
            .and_then(|id| id.parse::<u32>().ok())
        {
            max = max.max(id);
        }
    }
    Ok(max)
}

/// First unused name in the directory of `part`, numbered like `table2.xml`.
fn free_clone_name(package: &Package<'_>, part: &str) -> String {
    let (dir, file) = part.rsplit_once('/').unwrap_or(("", part));
    let (stem, ext) = file.rsplit_once('.').unwrap_or((file, ""));
    let stem = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let mut n = 1;
    loop {
        let name = match ext {
            "" => format!("{}{}", stem, n),
            ext => format!("{}{}.{}", stem, n, ext),
        };
        let candidate = if dir.is_empty() {
            name
        } else {
            format!("{}/{}", dir, name)
        };
        if !package.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Point `Sheet!A1` style references at a renamed sheet.
fn rename_references(defined: &mut Element, old: &str, new: &str) {
    let quoted_new = format!("'{}'!", new.replace('\'', "''"));
    let targets = [
        format!("'{}'!", old.replace('\'', "''")),
        format!("{}!", old),
    ];
    for child in defined.children.iter_mut() {
        if let Node::Text(raw) = child {
            for target in &targets {
                if raw.contains(target.as_str()) {
                    *raw = raw.replace(target.as_str(), &quoted_new);
                }
            }
        }
    }
}
