use crate::error::{EtlError, Result};
use crate::types::{dedupe_names, Column, TabularData};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());

// Upper bounds on a single cell's spans; protects against absurd markup
const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 10_000;

struct RawRow {
    in_thead: bool,
    all_th: bool,
    cells: Vec<String>,
}

/// Cells carried down into following rows by `rowspan`, keyed by column.
#[derive(Default)]
struct PendingSpans {
    slots: Vec<Option<(String, usize)>>,
}

impl PendingSpans {
    fn take(&mut self, col: usize) -> Option<String> {
        let slot = self.slots.get_mut(col)?;
        let (text, remaining) = slot.as_mut()?;
        let out = text.clone();
        *remaining -= 1;
        let done = *remaining == 0;
        if done {
            *slot = None;
        }
        Some(out)
    }

    fn set(&mut self, col: usize, text: String, rows: usize) {
        if col >= self.slots.len() {
            self.slots.resize_with(col + 1, || None);
        }
        self.slots[col] = Some((text, rows));
    }

    fn last_pending(&self) -> Option<usize> {
        self.slots.iter().rposition(Option::is_some)
    }
}

/// Parses the first `<table>` in document order into tabular data.
///
/// Header names come from `<thead>` rows or, failing that, from leading rows
/// made only of `<th>` cells; the last header row wins. Tables without a
/// header get positional names `0`, `1`, ... Rows of nested tables are not
/// read.
pub fn parse_first_table(html: &str) -> Result<TabularData> {
    let document = Html::parse_document(html);
    let tables: Vec<ElementRef> = document.select(&TABLE_SELECTOR).collect();
    info!("HTML tables found: {}", tables.len());

    let table = tables
        .first()
        .ok_or_else(|| EtlError::Extraction("no <table> element found in document".into()))?;

    let rows = direct_rows(table);
    debug!("first table has {} rows", rows.len());
    build_table(rows)
}

fn direct_rows(table: &ElementRef) -> Vec<RawRow> {
    let mut rows = Vec::new();
    let mut loose_spans = PendingSpans::default();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.extend(read_row(&child, false, &mut loose_spans)),
            section @ ("thead" | "tbody" | "tfoot") => {
                // rowspans never cross a section boundary
                let mut spans = PendingSpans::default();
                let in_thead = section == "thead";
                for tr in child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|e| e.value().name() == "tr")
                {
                    rows.extend(read_row(&tr, in_thead, &mut spans));
                }
            }
            _ => {}
        }
    }
    rows
}

fn span_attr(cell: &ElementRef, attr: &str, max: usize) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, max)
}

fn read_row(tr: &ElementRef, in_thead: bool, spans: &mut PendingSpans) -> Option<RawRow> {
    let mut cells = Vec::new();
    let mut all_th = true;
    let mut any_cell = false;
    for cell in tr.children().filter_map(ElementRef::wrap) {
        let name = cell.value().name();
        if name != "td" && name != "th" {
            continue;
        }
        while let Some(carried) = spans.take(cells.len()) {
            cells.push(carried);
        }
        any_cell = true;
        all_th &= name == "th";
        let text = cell_text(&cell);
        let colspan = span_attr(&cell, "colspan", MAX_COLSPAN);
        let rowspan = span_attr(&cell, "rowspan", MAX_ROWSPAN);
        for _ in 0..colspan {
            if rowspan > 1 {
                spans.set(cells.len(), text.clone(), rowspan - 1);
            }
            cells.push(text.clone());
        }
    }
    if !any_cell {
        return None;
    }
    if let Some(last) = spans.last_pending() {
        while cells.len() <= last {
            cells.push(spans.take(cells.len()).unwrap_or_default());
        }
    }
    Some(RawRow {
        in_thead,
        all_th,
        cells,
    })
}

fn cell_text(cell: &ElementRef) -> String {
    let joined: String = cell.text().collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn build_table(rows: Vec<RawRow>) -> Result<TabularData> {
    let has_thead = rows.iter().any(|r| r.in_thead);
    let header_len = if has_thead {
        rows.iter().take_while(|r| r.in_thead).count()
    } else {
        rows.iter().take_while(|r| r.all_th).count()
    };

    let width = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
    let mut rows = rows.into_iter();

    let header: Option<Vec<String>> = rows
        .by_ref()
        .take(header_len)
        .last()
        .map(|r| r.cells);
    let names: Vec<String> = match header {
        Some(cells) => (0..width)
            .map(|i| match cells.get(i) {
                Some(name) if !name.is_empty() => name.clone(),
                _ => format!("Unnamed: {}", i),
            })
            .collect(),
        None => (0..width).map(|i| i.to_string()).collect(),
    };
    let names = dedupe_names(names);

    let mut cells_by_column: Vec<Vec<String>> = vec![Vec::new(); width];
    for row in rows.filter(|r| !r.in_thead) {
        let mut cells = row.cells.into_iter();
        for column in cells_by_column.iter_mut() {
            column.push(cells.next().unwrap_or_default());
        }
    }

    let columns = names
        .into_iter()
        .zip(cells_by_column)
        .map(|(name, cells)| Column::infer(name, cells))
        .collect();
    TabularData::new(columns)
}
