mod common;

use std::collections::BTreeMap;

use common::*;
use docxide_layout::layout::{FlowInput, Fragment, layout_blocks, relayout_from};
use docxide_layout::measure::{BlockMeasurer, FixedFields, Measure, MeasureContext};
use docxide_layout::model::{
    BlockId, ColumnsInput, Document, FieldCode, FlowBlock, ImageBlock, NumberFormat,
    Orientation, PageNumbering, PageSizeInput, Paragraph, SectionBreakType, Table, TableCell,
    TableRow, VerticalAlign,
};
use docxide_layout::observe::ConvergenceReason;
use docxide_layout::sections::{SectionRange, analyze_sections};
use docxide_layout::{
    ApproxMetrics, DocumentCaches, EngineOptions, LineMeasurer, PaginationEngine,
    layout_document_json,
};

fn doc(blocks: Vec<FlowBlock>) -> Document {
    Document::new(blocks)
}

/// A paragraph of `n` lines, one short word each.
fn tall_para(id: u32, n: usize) -> Paragraph {
    let mut runs = Vec::new();
    for i in 0..n {
        if i > 0 {
            runs.push(line_break());
        }
        runs.push(text("x"));
    }
    Paragraph::new(id, runs)
}

fn with_field(id: u32, code: FieldCode) -> FlowBlock {
    block(Paragraph::new(id, vec![text("see page "), field(code)]))
}

fn fields_text(result: &docxide_layout::PaginationResult, id: u32) -> Vec<String> {
    result
        .layout
        .pages
        .iter()
        .flat_map(|p| p.fragments.iter())
        .filter_map(|f| match f {
            Fragment::Paragraph(p) if p.block_id == BlockId(id) => Some(p),
            _ => None,
        })
        .flat_map(|p| p.lines.iter())
        .flat_map(|l| l.segments.iter())
        .filter(|s| s.kind == docxide_layout::measure::SegmentKind::Field)
        .map(|s| s.text.clone())
        .collect()
}

#[test]
fn no_tokens_converges_in_one_iteration() {
    let result = run(&doc(lines(0, 10)));
    assert!(result.converged);
    assert_eq!(result.reason, ConvergenceReason::Stable);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.metrics.len(), 1);
    assert_eq!(result.metrics[0].affected_blocks, 0);
    assert_eq!(result.layout.pages.len(), 1);
    assert!(result.layout.tokens.is_empty());
}

#[test]
fn empty_document_has_one_page() {
    let result = run(&Document::default());
    assert!(result.converged);
    assert_eq!(result.layout.pages.len(), 1);
    assert!(result.layout.pages[0].fragments.is_empty());
}

#[test]
fn lines_fill_pages_in_order() {
    let result = run(&doc(lines(0, 200)));
    let pages = page_blocks(&result);
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].len(), 86);
    assert_eq!(pages[1].first(), Some(&86));
    assert_eq!(pages[2].last(), Some(&199));

    let numbers: Vec<&str> = result
        .layout
        .pages
        .iter()
        .map(|p| p.display_number.as_str())
        .collect();
    assert_eq!(numbers, vec!["1", "2", "3"]);
    assert_eq!(result.layout.page_of(BlockId(90)), Some(1));
}

#[test]
fn page_token_is_resolved_and_remeasured() {
    let mut blocks = lines(0, 200);
    blocks[90] = with_field(90, FieldCode::Page);
    let result = run(&doc(blocks));

    assert!(result.converged);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.metrics[0].affected_blocks, 1);
    assert_eq!(result.metrics[1].affected_blocks, 0);
    assert_eq!(fields_text(&result, 90), vec!["2"]);
    let token = result
        .layout
        .tokens
        .iter()
        .find(|t| t.key == "page:b90")
        .expect("page token");
    assert_eq!(token.value, "2");
}

#[test]
fn only_affected_blocks_are_remeasured() {
    let mut blocks = lines(0, 200);
    blocks[150] = with_field(150, FieldCode::NumPages);
    let d = doc(blocks);
    let options = options();
    let mut caches = DocumentCaches::new(1, &options);
    let mut measurer = LineMeasurer::new(FixedAdvance);
    let result = docxide_layout::paginate(
        &d,
        1,
        &mut caches,
        &mut measurer,
        options,
        &mut docxide_layout::observe::NoopObserver,
    )
    .expect("pagination");
    assert!(result.converged);
    assert_eq!(fields_text(&result, 150), vec!["3"]);
    assert_eq!(measurer.measured_blocks, 201);
}

#[test]
fn page_references_follow_bookmarks() {
    let mut blocks = lines(0, 200);
    if let FlowBlock::Paragraph(p) = &mut blocks[180] {
        p.bookmark = Some("results".into());
    }
    blocks[0] = with_field(0, FieldCode::PageRef("results".into()));
    blocks[1] = with_field(1, FieldCode::PageRef("nowhere".into()));
    let result = run(&doc(blocks));

    assert!(result.converged);
    assert_eq!(fields_text(&result, 0), vec!["3"]);
    assert_eq!(fields_text(&result, 1), vec!["?"]);
}

#[test]
fn iteration_cap_reports_non_convergence() {
    let mut blocks = lines(0, 20);
    blocks[5] = with_field(5, FieldCode::NumPages);
    let options = EngineOptions {
        max_iterations: 1,
        ..options()
    };
    let result = run_with(&doc(blocks), options);

    assert!(!result.converged);
    assert_eq!(result.reason, ConvergenceReason::IterationCap);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.layout.pages.len(), 1);

    // The page shows the placeholder; the token reports that, plus the value it would take.
    assert_eq!(fields_text(&result, 5), vec!["00"]);
    let token = &result.layout.tokens[0];
    assert_eq!(token.key, "numpages");
    assert_eq!(token.value, "00");
    assert_eq!(token.latest.as_deref(), Some("1"));
    let json = result.layout.to_json(false).expect("json");
    assert!(json.contains(r#""latest":"1""#));
}

#[test]
fn zero_time_budget_stops_after_first_iteration() {
    let mut blocks = lines(0, 20);
    blocks[5] = with_field(5, FieldCode::Page);
    let options = EngineOptions {
        time_budget: std::time::Duration::ZERO,
        ..EngineOptions::default()
    };
    let result = run_with(&doc(blocks), options);
    assert!(!result.converged);
    assert_eq!(result.reason, ConvergenceReason::TimeBudget);
    assert_eq!(result.iterations, 1);
}

#[test]
fn repeated_runs_are_byte_identical() {
    let mut blocks = lines(0, 150);
    blocks[3] = with_field(3, FieldCode::NumPages);
    blocks[120] = with_field(120, FieldCode::Page);
    let d = doc(blocks);

    let a = run(&d).layout.to_json(false).expect("json");
    let b = run(&d).layout.to_json(false).expect("json");
    assert_eq!(a, b);
    assert!(a.contains("\"display_number\":\"2\""));
}

fn measure_all(d: &Document) -> Vec<Measure> {
    let fields = FixedFields("0".into());
    let lists = BTreeMap::new();
    let ctx = MeasureContext {
        available_width: 624.0,
        fields: &fields,
        lists: &lists,
        default_tab_interval: d.default_tab_interval,
        line_spacing: d.line_spacing,
    };
    let mut measurer = LineMeasurer::new(FixedAdvance);
    d.blocks.iter().map(|b| measurer.measure(b, &ctx)).collect()
}

#[test]
fn incremental_relayout_matches_full_layout() {
    let mut blocks = lines(0, 300);
    if let FlowBlock::Paragraph(p) = &mut blocks[149] {
        p.keep_next = true;
    }
    let before = doc(blocks.clone());
    let sections = vec![SectionRange::default_for(300)];
    let measures = measure_all(&before);
    let previous = layout_blocks(&FlowInput {
        doc: &before,
        sections: &sections,
        measures: &measures,
    });

    blocks[150] = block(tall_para(150, 60));
    let after = doc(blocks);
    let measures = measure_all(&after);
    let input = FlowInput {
        doc: &after,
        sections: &sections,
        measures: &measures,
    };
    let full = layout_blocks(&input);
    let incremental = relayout_from(&input, &previous, 150);

    assert_eq!(full, incremental);
    assert_eq!(full.pages[0], previous.pages[0]);
    assert!(full.pages.len() > previous.pages.len());
}

#[test]
fn page_break_before_starts_a_page() {
    let mut blocks = lines(0, 4);
    if let FlowBlock::Paragraph(p) = &mut blocks[2] {
        p.page_break_before = true;
    }
    if let FlowBlock::Paragraph(p) = &mut blocks[0] {
        p.page_break_before = true;
    }
    let result = run(&doc(blocks));
    assert_eq!(page_blocks(&result), vec![vec![0, 1], vec![2, 3]]);
}

#[test]
fn space_before_is_dropped_at_page_top() {
    let mut blocks = lines(0, 2);
    for b in &mut blocks {
        if let FlowBlock::Paragraph(p) = b {
            p.space_before = 20.0;
            p.space_after = 12.0;
        }
    }
    let result = run(&doc(blocks));
    let ys: Vec<f32> = result.layout.pages[0]
        .fragments
        .iter()
        .map(|f| match f {
            Fragment::Paragraph(p) => p.y,
            _ => f32::NAN,
        })
        .collect();
    // Second paragraph: larger of space after (12) and space before (20).
    assert_eq!(ys, vec![96.0, 96.0 + LINE_HEIGHT + 20.0]);
}

#[test]
fn paragraphs_split_across_pages() {
    let mut blocks = lines(0, 80);
    blocks.push(block(tall_para(80, 10)));
    let result = run(&doc(blocks));
    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);

    let Some(Fragment::Paragraph(head)) = pages[0].fragments.last() else {
        panic!("expected a paragraph fragment");
    };
    assert_eq!((head.from_line, head.to_line), (0, 6));
    assert!(head.continues_on_next);

    let Some(Fragment::Paragraph(tail)) = pages[1].fragments.first() else {
        panic!("expected a paragraph fragment");
    };
    assert_eq!((tail.from_line, tail.to_line), (6, 10));
    assert!(tail.continues_from_previous);
    assert_eq!(tail.y, 96.0);
}

#[test]
fn keep_lines_moves_the_whole_paragraph() {
    let mut blocks = lines(0, 80);
    let mut p = tall_para(80, 10);
    p.keep_lines = true;
    blocks.push(block(p));
    let result = run(&doc(blocks));
    assert_eq!(page_blocks(&result)[1], vec![80]);
    assert!(!result.layout.pages[0].contains_block(BlockId(80)));
}

#[test]
fn keep_next_pulls_paragraph_to_next_page() {
    let mut blocks = lines(0, 87);
    let result = run(&doc(blocks.clone()));
    assert_eq!(page_blocks(&result)[1], vec![86]);

    if let FlowBlock::Paragraph(p) = &mut blocks[85] {
        p.keep_next = true;
    }
    let result = run(&doc(blocks));
    assert_eq!(page_blocks(&result)[1], vec![85, 86]);
}

#[test]
fn table_header_rows_repeat() {
    let mut blocks = lines(0, 80);
    let rows = (0..10)
        .map(|r| TableRow {
            cells: vec![TableCell::new(vec![para(1000 + r, "cell")])],
            height: Some(20.0),
            height_exact: true,
        })
        .collect();
    blocks.push(FlowBlock::Table(Table {
        id: BlockId(80),
        col_widths: vec![300.0],
        rows,
        header_rows: 1,
        ..Table::default()
    }));
    let result = run(&doc(blocks));
    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);

    let Some(Fragment::Table(first)) = pages[0].fragments.last() else {
        panic!("expected a table fragment");
    };
    assert_eq!((first.from_row, first.to_row), (0, 3));

    let Some(Fragment::Table(rest)) = pages[1].fragments.first() else {
        panic!("expected a table fragment");
    };
    assert_eq!((rest.from_row, rest.to_row), (3, 10));
    assert!(rest.rows[0].repeated_header);
    assert_eq!(rest.rows[0].row_index, 0);
    assert_eq!(rest.rows[1].row_index, 3);
    assert_eq!(rest.rows[1].y, 96.0 + 20.0);
    assert_eq!(rest.height, 8.0 * 20.0);
}

#[test]
fn oversized_image_gets_its_own_page() {
    let blocks = vec![
        block(para(0, "before")),
        FlowBlock::Image(ImageBlock {
            id: BlockId(1),
            width: 100.0,
            height: 2000.0,
            ..ImageBlock::default()
        }),
        block(para(2, "after")),
    ];
    let result = run(&doc(blocks));
    assert_eq!(page_blocks(&result), vec![vec![0], vec![1], vec![2]]);
}

#[test]
fn odd_page_break_inserts_blank_page() {
    let mut blocks = lines(0, 4);
    end_section(&mut blocks, 1, marker(SectionBreakType::NextPage));
    let mut d = doc(blocks);
    let mut body = marker(SectionBreakType::OddPage);
    body.numbering = Some(PageNumbering {
        format: NumberFormat::LowerRoman,
        start: Some(1),
    });
    d.body_section = Some(body);

    let result = run(&d);
    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 3);
    assert!(pages[1].blank);
    assert!(pages[1].fragments.is_empty());
    assert_eq!(pages[1].section_index, 0);
    assert!(pages[2].first_of_section);
    assert_eq!(pages[2].section_index, 1);
    assert_eq!(pages[2].display_number, "i");
    assert_eq!(page_blocks(&result)[2], vec![2, 3]);
}

#[test]
fn continuous_break_stays_on_page_unless_sheet_changes() {
    let mut blocks = lines(0, 4);
    end_section(&mut blocks, 1, marker(SectionBreakType::NextPage));
    let mut d = doc(blocks);
    d.body_section = Some(marker(SectionBreakType::Continuous));
    let result = run(&d);
    assert_eq!(result.layout.pages.len(), 1);

    let mut landscape = marker(SectionBreakType::Continuous);
    landscape.page_size = Some(PageSizeInput {
        width: 1056.0,
        height: 816.0,
    });
    d.body_section = Some(landscape);
    let result = run(&d);
    assert_eq!(result.layout.pages.len(), 2);
    assert_eq!(result.layout.pages[1].size.width, 1056.0);
}

#[test]
fn continuous_section_counts_the_page_it_starts_on() {
    let mut blocks = lines(0, 6);
    end_section(&mut blocks, 2, marker(SectionBreakType::NextPage));
    blocks[4] = with_field(4, FieldCode::SectionPages);
    let mut d = doc(blocks);
    d.body_section = Some(marker(SectionBreakType::Continuous));

    let result = run(&d);
    assert!(result.converged);
    assert_eq!(result.layout.pages.len(), 1);
    assert_eq!(result.layout.pages[0].section_index, 0);
    assert_eq!(result.layout.pages[0].sections, vec![0, 1]);
    assert_eq!(fields_text(&result, 4), vec!["1"]);
    let token = result
        .layout
        .tokens
        .iter()
        .find(|t| t.key == "sectionpages:1")
        .expect("section token");
    assert_eq!(token.value, "1");
}

#[test]
fn continuous_section_restart_applies_to_its_first_page() {
    let mut blocks = lines(0, 6);
    end_section(&mut blocks, 2, marker(SectionBreakType::NextPage));
    blocks[5] = with_field(5, FieldCode::Page);
    let mut d = doc(blocks);
    let mut body = marker(SectionBreakType::Continuous);
    body.numbering = Some(PageNumbering {
        format: NumberFormat::Decimal,
        start: Some(5),
    });
    d.body_section = Some(body);

    let result = run(&d);
    assert_eq!(result.layout.pages.len(), 1);
    assert_eq!(result.layout.pages[0].display_number, "5");
    assert_eq!(fields_text(&result, 5), vec!["5"]);
}

#[test]
fn next_page_break_starts_new_page() {
    let mut blocks = lines(0, 4);
    end_section(&mut blocks, 1, marker(SectionBreakType::NextPage));
    let mut d = doc(blocks);
    d.body_section = Some(marker(SectionBreakType::NextPage));
    let result = run(&d);
    assert_eq!(page_blocks(&result), vec![vec![0, 1], vec![2, 3]]);
    assert_eq!(result.sections.len(), 2);
}

#[test]
fn vertical_alignment_shifts_page_content() {
    let mut body = marker(SectionBreakType::NextPage);
    body.v_align = Some(VerticalAlign::Center);
    let mut d = doc(lines(0, 1));
    d.body_section = Some(body.clone());
    let result = run(&d);
    let slack = 1056.0 - 96.0 - (96.0 + LINE_HEIGHT);
    assert_eq!(result.layout.pages[0].fragments[0].bottom(), 96.0 + LINE_HEIGHT + slack / 2.0);

    body.v_align = Some(VerticalAlign::Both);
    d.body_section = Some(body);
    let result = run(&d);
    assert_eq!(result.layout.pages[0].fragments[0].bottom(), 96.0 + LINE_HEIGHT);
}

#[test]
fn columns_fill_left_to_right() {
    let mut body = marker(SectionBreakType::NextPage);
    body.columns = Some(ColumnsInput {
        count: 2,
        ..ColumnsInput::default()
    });
    let mut blocks = lines(0, 100);
    if let FlowBlock::Paragraph(p) = &mut blocks[90] {
        p.column_break_before = true;
    }
    let mut d = doc(blocks);
    d.body_section = Some(body);
    let result = run(&d);

    assert_eq!(result.layout.pages.len(), 2);
    let x_of = |id: u32| {
        result
            .layout
            .pages
            .iter()
            .flat_map(|p| p.fragments.iter())
            .find_map(|f| match f {
                Fragment::Paragraph(p) if p.block_id == BlockId(id) => Some((p.x, p.y)),
                _ => None,
            })
    };
    assert_eq!(x_of(85), Some((96.0, 96.0 + 85.0 * LINE_HEIGHT)));
    assert_eq!(x_of(86), Some((96.0 + 336.0, 96.0)));
    // Column break on the second column moves to the next page.
    assert_eq!(x_of(90), Some((96.0, 96.0)));
    assert_eq!(result.layout.page_of(BlockId(90)), Some(1));
}

#[test]
fn caller_supplied_sections() {
    let d = doc(lines(0, 6));
    let mut a = SectionRange::default_for(6);
    a.end_paragraph_index = 2;
    let mut b = SectionRange::default_for(6);
    b.section_index = 1;
    b.start_paragraph_index = 3;

    let options = options();
    let mut caches = DocumentCaches::new(2, &options);
    let mut measurer = LineMeasurer::new(FixedAdvance);
    let mut observer = docxide_layout::observe::NoopObserver;
    let engine = PaginationEngine::new(&d, 1, &mut caches, &mut measurer, &mut observer, options)
        .with_sections(vec![a, b])
        .expect("valid ranges");
    assert_eq!(engine.sections().len(), 2);
    let result = engine.run().expect("pagination");
    assert_eq!(page_blocks(&result), vec![vec![0, 1, 2], vec![3, 4, 5]]);
}

#[test]
fn trailing_empty_section_adds_no_page() {
    let mut blocks = lines(0, 3);
    end_section(&mut blocks, 2, marker(SectionBreakType::NextPage));
    let body = marker(SectionBreakType::NextPage);
    assert_eq!(analyze_sections(&blocks, Some(&body)).len(), 2);

    let mut d = doc(blocks);
    d.body_section = Some(body);
    let result = run(&d);
    assert_eq!(result.layout.pages.len(), 1);
}

#[test]
fn trailing_empty_section_with_new_sheet_gets_a_page() {
    let mut blocks = lines(0, 3);
    end_section(&mut blocks, 2, marker(SectionBreakType::NextPage));
    let mut body = marker(SectionBreakType::NextPage);
    body.page_size = Some(PageSizeInput {
        width: 1056.0,
        height: 816.0,
    });

    let mut d = doc(blocks);
    d.body_section = Some(body);
    let result = run(&d);
    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);
    assert_eq!(page_blocks(&result)[0], vec![0, 1, 2]);
    assert_eq!(pages[1].section_index, 1);
    assert_eq!(pages[1].size.width, 1056.0);
    assert_eq!(pages[1].size.height, 816.0);
    assert_eq!(pages[1].orientation, Orientation::Landscape);
    assert!(pages[1].fragments.is_empty());
    assert_eq!(pages[1].display_number, "2");
}

#[test]
fn json_document_round_trip() {
    let json = r#"{
        "blocks": [
            {"type": "paragraph", "id": 0, "runs": [{"text": "Hello world"}]},
            {"type": "paragraph", "id": 1, "page_break_before": true,
             "runs": [{"text": "Page "}, {"kind": {"field": "page"}}]}
        ]
    }"#;
    let result = layout_document_json(json, ApproxMetrics, options()).expect("layout");
    assert!(result.converged);
    assert_eq!(result.layout.pages.len(), 2);
    let out = result.layout.to_json(true).expect("json");
    let value: serde_json::Value = serde_json::from_str(&out).expect("valid json");
    assert_eq!(value["pages"][1]["display_number"], "2");
    assert_eq!(value["tokens"][0]["key"], "page:b1");
    assert_eq!(value["tokens"][0]["value"], "2");
    assert!(value["tokens"][0].get("latest").is_none());
}
