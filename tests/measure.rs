mod common;

use std::collections::BTreeMap;

use common::*;
use docxide_layout::measure::{
    BlockMeasurer, FixedFields, Measure, MeasureContext, ParagraphMeasure, SegmentKind,
};
use docxide_layout::model::{
    BlockId, FieldCode, FlowBlock, ImageBlock, LineSpacing, ListMarkerSpec, Paragraph, TabKind,
    TabStop, Table, TableCell, TableRow,
};
use docxide_layout::numbering::ResolvedList;
use docxide_layout::{ApproxMetrics, Error, FontFaceMetrics, LineMeasurer, TextMeasurer};

fn measure_at(p: &Paragraph, width: f32, lists: &BTreeMap<BlockId, ResolvedList>) -> ParagraphMeasure {
    let fields = FixedFields("00".to_string());
    let ctx = MeasureContext {
        available_width: width,
        fields: &fields,
        lists,
        default_tab_interval: 48.0,
        line_spacing: LineSpacing::default(),
    };
    LineMeasurer::new(FixedAdvance).measure_paragraph(p, &ctx)
}

fn measure(p: &Paragraph, width: f32) -> ParagraphMeasure {
    measure_at(p, width, &BTreeMap::new())
}

fn words(line: &docxide_layout::measure::MeasuredLine) -> Vec<&str> {
    line.segments.iter().map(|s| s.text.as_str()).collect()
}

#[test]
fn greedy_wrap() {
    let pm = measure(&para(0, "alpha beta gamma"), 50.0);
    assert_eq!(pm.lines.len(), 2);
    assert_eq!(words(&pm.lines[0]), vec!["alpha", "beta"]);
    assert_eq!(pm.lines[0].width, 50.0);
    assert_eq!(pm.lines[0].space_count, 1);
    assert_eq!(words(&pm.lines[1]), vec!["gamma"]);
    assert_eq!(pm.lines[1].width, 25.0);
    assert_eq!(pm.height(), 2.0 * LINE_HEIGHT);
}

#[test]
fn empty_paragraph_has_one_line() {
    let pm = measure(&Paragraph::new(0, vec![]), 100.0);
    assert_eq!(pm.lines.len(), 1);
    assert!(pm.lines[0].segments.is_empty());
}

#[test]
fn words_split_across_runs_stay_together() {
    let p = Paragraph::new(0, vec![text("foo"), text("bar baz")]);
    let pm = measure(&p, 30.0);
    assert_eq!(pm.lines.len(), 2);
    assert_eq!(words(&pm.lines[0]), vec!["foo", "bar"]);
    assert_eq!(pm.lines[0].segments[1].x, 15.0);
    assert_eq!(pm.lines[0].segments[1].run, 1);
    assert_eq!(words(&pm.lines[1]), vec!["baz"]);
}

#[test]
fn tabs_move_to_default_stops() {
    let p = Paragraph::new(0, vec![text("a"), tab(), text("b")]);
    let pm = measure(&p, 600.0);
    let line = &pm.lines[0];
    assert!(line.has_tabs);
    let b = line.segments.iter().find(|s| s.text == "b").expect("segment b");
    assert_eq!(b.x, 48.0);
    let tab = line
        .segments
        .iter()
        .find(|s| matches!(s.kind, SegmentKind::Tab { .. }))
        .expect("tab segment");
    assert_eq!(tab.x, 5.0);
    assert_eq!(tab.width, 43.0);
}

#[test]
fn decimal_tab_uses_the_stop_separator() {
    let mut p = Paragraph::new(0, vec![tab(), text("12,5")]);
    let mut stop = TabStop::new(200.0, TabKind::Decimal);
    stop.decimal_char = Some(',');
    p.tab_stops = vec![stop];
    let pm = measure(&p, 600.0);
    let amount = pm.lines[0]
        .segments
        .iter()
        .find(|s| s.text == "12,5")
        .expect("amount segment");
    assert_eq!(amount.x, 190.0);
}

#[test]
fn line_breaks_end_lines() {
    let p = Paragraph::new(0, vec![text("one"), line_break(), text("two")]);
    let pm = measure(&p, 600.0);
    assert_eq!(pm.lines.len(), 2);
    assert!(pm.lines[0].ends_with_break);
    assert!(!pm.lines[1].ends_with_break);
}

#[test]
fn fields_measure_with_resolver_text() {
    let p = Paragraph::new(0, vec![text("Page "), field(FieldCode::Page)]);
    let pm = measure(&p, 600.0);
    let seg = &pm.lines[0].segments[1];
    assert_eq!(seg.kind, SegmentKind::Field);
    assert_eq!(seg.text, "00");
    assert_eq!(seg.width, 10.0);
}

#[test]
fn indents_narrow_the_line() {
    let mut p = para(0, "aaaa bbbb cccc");
    p.indent_left = 10.0;
    p.indent_right = 10.0;
    p.first_line_indent = 20.0;
    let pm = measure(&p, 80.0);
    assert_eq!(pm.lines[0].x, 30.0);
    assert_eq!(pm.lines[0].available_width, 40.0);
    assert_eq!(words(&pm.lines[0]), vec!["aaaa"]);
    assert_eq!(pm.lines[1].x, 10.0);
    assert_eq!(words(&pm.lines[1]), vec!["bbbb", "cccc"]);
}

#[test]
fn list_marker_hangs_in_the_indent() {
    let p = Paragraph {
        marker: Some(ListMarkerSpec::default()),
        ..para(7, "item")
    };
    let mut lists = BTreeMap::new();
    lists.insert(
        BlockId(7),
        ResolvedList {
            marker: ListMarkerSpec {
                marker_text: Some("1.".to_string()),
                ..ListMarkerSpec::default()
            },
            indent_left: 36.0,
            hanging_indent: 18.0,
            first_line_indent: 0.0,
        },
    );
    let pm = measure_at(&p, 600.0, &lists);
    let marker = pm.marker.expect("marker");
    assert_eq!(marker.x, 18.0);
    assert_eq!(marker.width, 10.0);
    assert_eq!(pm.lines[0].x, 36.0);
}

#[test]
fn line_spacing_rules() {
    let mut p = para(0, "x");
    p.line_spacing = Some(LineSpacing::Exact(20.0));
    assert_eq!(measure(&p, 100.0).lines[0].height, 20.0);

    p.line_spacing = Some(LineSpacing::AtLeast(4.0));
    assert_eq!(measure(&p, 100.0).lines[0].height, LINE_HEIGHT);

    p.line_spacing = Some(LineSpacing::Auto(1.5));
    assert_eq!(measure(&p, 100.0).lines[0].height, 15.0);
}

fn ctx_measure(block: &FlowBlock, width: f32) -> Measure {
    let fields = FixedFields("0".to_string());
    let lists = BTreeMap::new();
    let ctx = MeasureContext {
        available_width: width,
        fields: &fields,
        lists: &lists,
        default_tab_interval: 48.0,
        line_spacing: LineSpacing::default(),
    };
    let mut measurer = LineMeasurer::new(FixedAdvance);
    let m = measurer.measure(block, &ctx);
    assert_eq!(measurer.measured_blocks, 1);
    m
}

#[test]
fn table_columns_scale_and_rows_take_their_height() {
    let row = |height: Option<f32>, exact: bool, id: u32| TableRow {
        cells: vec![
            TableCell::new(vec![para(id, "cell")]),
            TableCell::new(vec![para(id + 1, "cell")]),
        ],
        height,
        height_exact: exact,
    };
    let table = Table {
        id: BlockId(1),
        col_widths: vec![1248.0, 1248.0],
        rows: vec![row(None, false, 10), row(Some(30.0), false, 12), row(Some(5.0), true, 14)],
        ..Table::default()
    };
    let Measure::Table(tm) = ctx_measure(&FlowBlock::Table(table), 624.0) else {
        panic!("expected a table measure");
    };
    assert_eq!(tm.col_widths, vec![312.0, 312.0]);
    assert_eq!(tm.width(), 624.0);
    assert_eq!(tm.rows[0].height, LINE_HEIGHT);
    assert_eq!(tm.rows[1].height, 30.0);
    assert_eq!(tm.rows[2].height, 5.0);
}

#[test]
fn wide_images_scale_to_the_column() {
    let image = FlowBlock::Image(ImageBlock {
        id: BlockId(3),
        width: 1248.0,
        height: 100.0,
        ..ImageBlock::default()
    });
    let Measure::Image(im) = ctx_measure(&image, 624.0) else {
        panic!("expected an image measure");
    };
    assert_eq!((im.width, im.height), (624.0, 50.0));
}

#[test]
fn approx_metrics_scale_with_font_size() {
    let small = text("Hello");
    let large = docxide_layout::model::Run {
        font_size: 20.0,
        ..small.clone()
    };
    let w_small = ApproxMetrics.text_width("Hello", &small).expect("width");
    let w_large = ApproxMetrics.text_width("Hello", &large).expect("width");
    assert!(w_small > 0.0);
    assert!((w_large - 2.0 * w_small).abs() < 0.001);
    assert!(ApproxMetrics.line_metrics(&small).natural_height() > 0.0);
}

#[test]
fn unreadable_font_is_an_error() {
    let result = FontFaceMetrics::from_bytes(b"not a font".to_vec(), 0);
    assert!(matches!(result, Err(Error::Font(_))));
}
