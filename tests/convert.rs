mod common;

use common::*;
use docxide_layout::convert::{
    BlockIds, ConverterSet, ImageConverter, NodeKind, ParagraphConverter, SourceNode,
    TableConverter,
};
use docxide_layout::model::{BlockId, FlowBlock, ImageBlock, Paragraph, Table, TableCell, TableRow};

/// Minimal source tree standing in for a parsed word-processing document.
enum Node {
    Text(&'static str),
    Grid(Vec<Vec<Node>>),
    Picture(f32, f32),
    Comment,
}

impl SourceNode for Node {
    fn kind(&self) -> NodeKind {
        match self {
            Node::Text(_) => NodeKind::Paragraph,
            Node::Grid(_) => NodeKind::Table,
            Node::Picture(..) => NodeKind::Image,
            Node::Comment => NodeKind::Other,
        }
    }
}

struct Paragraphs;

impl ParagraphConverter<Node> for Paragraphs {
    fn convert_paragraph(&self, node: &Node, ids: &mut BlockIds) -> Option<Paragraph> {
        match node {
            Node::Text(s) => Some(Paragraph {
                id: ids.next_id(),
                ..para(0, s)
            }),
            _ => None,
        }
    }
}

struct Tables;

impl TableConverter<Node> for Tables {
    fn convert_table(
        &self,
        node: &Node,
        ids: &mut BlockIds,
        paragraphs: &dyn ParagraphConverter<Node>,
    ) -> Option<Table> {
        let Node::Grid(rows) = node else {
            return None;
        };
        let id = ids.next_id();
        let rows = rows
            .iter()
            .map(|row| TableRow {
                cells: row
                    .iter()
                    .map(|cell| {
                        TableCell::new(paragraphs.convert_paragraph(cell, ids).into_iter().collect())
                    })
                    .collect(),
                ..TableRow::default()
            })
            .collect();
        Some(Table {
            id,
            col_widths: vec![100.0, 100.0],
            rows,
            ..Table::default()
        })
    }
}

struct Images {
    skip_empty: bool,
}

impl ImageConverter<Node> for Images {
    fn convert_image(&self, node: &Node, ids: &mut BlockIds) -> Option<ImageBlock> {
        let Node::Picture(w, h) = node else {
            return None;
        };
        if self.skip_empty && (*w == 0.0 || *h == 0.0) {
            return None;
        }
        Some(ImageBlock {
            id: ids.next_id(),
            width: *w,
            height: *h,
            ..ImageBlock::default()
        })
    }
}

#[test]
fn blocks_get_sequential_ids_in_document_order() {
    let nodes = vec![
        Node::Text("intro"),
        Node::Comment,
        Node::Grid(vec![vec![Node::Text("a"), Node::Text("b")]]),
        Node::Picture(50.0, 40.0),
        Node::Text("outro"),
    ];
    let images = Images { skip_empty: true };
    let set = ConverterSet::new(&Paragraphs, &Tables, &images);
    let blocks = set.convert(&nodes);

    let ids: Vec<u32> = blocks.iter().map(|b| b.id().0).collect();
    assert_eq!(ids, vec![0, 1, 4, 5]);

    let FlowBlock::Table(table) = &blocks[1] else {
        panic!("expected a table");
    };
    let cell_ids: Vec<BlockId> = table.rows[0]
        .cells
        .iter()
        .flat_map(|c| c.paragraphs.iter().map(|p| p.id))
        .collect();
    assert_eq!(cell_ids, vec![BlockId(2), BlockId(3)]);
    assert!(matches!(blocks[2], FlowBlock::Image(_)));
}

#[test]
fn declined_nodes_are_skipped() {
    let nodes = vec![Node::Picture(0.0, 10.0), Node::Comment, Node::Text("only")];
    let images = Images { skip_empty: true };
    let blocks = ConverterSet::new(&Paragraphs, &Tables, &images).convert(&nodes);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].id(), BlockId(0));
}

#[test]
fn converted_blocks_paginate() {
    let nodes = vec![
        Node::Text("heading"),
        Node::Grid(vec![
            vec![Node::Text("r1c1"), Node::Text("r1c2")],
            vec![Node::Text("r2c1"), Node::Text("r2c2")],
        ]),
        Node::Picture(200.0, 100.0),
    ];
    let images = Images { skip_empty: false };
    let blocks = ConverterSet::new(&Paragraphs, &Tables, &images).convert(&nodes);
    let result = run(&docxide_layout::model::Document::new(blocks));
    assert_eq!(result.layout.pages.len(), 1);
    assert_eq!(page_blocks(&result), vec![vec![0, 1, 6]]);
}

#[test]
fn id_source_counts_issued_ids() {
    let mut ids = BlockIds::new();
    assert_eq!(ids.next_id(), BlockId(0));
    assert_eq!(ids.next_id(), BlockId(1));
    assert_eq!(ids.issued(), 2);
}
