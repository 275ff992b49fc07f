use crate::layout::flow::position_lines;
use crate::layout::{CellBox, CellParagraph, RowBox};
use crate::measure::TableMeasure;
use crate::model::{CellVAlign, Table};
use crate::typeset::borders::{CellPosition, ResolvedTableBorders, resolve_cell_borders};

/// Grid column count: the widest of the declared grid and the spans of any row.
pub(crate) fn grid_columns(table: &Table, tm: &TableMeasure) -> usize {
    let spans = table
        .rows
        .iter()
        .map(|r| r.cells.iter().map(|c| c.grid_span.max(1) as usize).sum::<usize>())
        .max()
        .unwrap_or(0);
    spans.max(tm.col_widths.len())
}

/// Place one row with its top edge at `y`.
pub(crate) fn build_row(
    table: &Table,
    tm: &TableMeasure,
    borders: &ResolvedTableBorders,
    row_index: usize,
    x: f32,
    y: f32,
    repeated_header: bool,
) -> RowBox {
    let row = &table.rows[row_index];
    let measure = &tm.rows[row_index];
    let cm = &table.cell_margins;
    let col_count = grid_columns(table, tm);

    let mut grid_col = 0usize;
    let mut cell_x = x;
    let mut cells = Vec::with_capacity(row.cells.len());
    for (cell, cell_measure) in row.cells.iter().zip(&measure.cells) {
        let span = cell.grid_span.max(1) as usize;
        let cell_borders = resolve_cell_borders(
            borders,
            CellPosition {
                row: row_index,
                row_count: table.rows.len(),
                col: grid_col,
                col_span: span,
                col_count,
            },
        );

        let slack = (measure.height - cell_measure.content_height).max(0.0);
        let offset = match cell.v_align {
            CellVAlign::Top => 0.0,
            CellVAlign::Center => slack / 2.0,
            CellVAlign::Bottom => slack,
        };
        let text_x = cell_x + cm.left;
        let mut cursor = y + cm.top + offset;
        let mut paragraphs = Vec::with_capacity(cell.paragraphs.len());
        for (para, pm) in cell.paragraphs.iter().zip(&cell_measure.paragraphs) {
            cursor += para.space_before;
            let (lines, height) = position_lines(para, pm, 0, pm.lines.len(), text_x, cursor);
            paragraphs.push(CellParagraph {
                block_id: para.id,
                lines,
                marker: pm.marker.clone().map(|mut m| {
                    m.x += text_x;
                    m
                }),
            });
            cursor += height + para.space_after;
        }

        cells.push(CellBox {
            col: grid_col,
            x: cell_x,
            y,
            width: cell_measure.width,
            height: measure.height,
            borders: cell_borders,
            paragraphs,
        });
        grid_col += span;
        cell_x += cell_measure.width;
    }

    RowBox {
        row_index,
        y,
        height: measure.height,
        repeated_header,
        cells,
    }
}
