//! Capability interfaces for the format converter that feeds the engine.
//!
//! A converter implements one trait per block kind and is injected once
//! into a [`ConverterSet`], which walks the source tree and hands out
//! sequential block ids. Table converters receive the paragraph converter
//! so cell content goes through the same path as body text.

use crate::model::{BlockId, FlowBlock, ImageBlock, Paragraph, Table};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Paragraph,
    Table,
    Image,
    /// Anything the layout core does not model (comments, bookmarks-only nodes).
    Other,
}

pub trait SourceNode {
    fn kind(&self) -> NodeKind;
}

/// Sequential id source shared by all converters of one document.
#[derive(Debug, Default)]
pub struct BlockIds {
    next: u32,
}

impl BlockIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> BlockId {
        let id = BlockId(self.next);
        self.next += 1;
        id
    }

    pub fn issued(&self) -> u32 {
        self.next
    }
}

pub trait ParagraphConverter<N> {
    fn convert_paragraph(&self, node: &N, ids: &mut BlockIds) -> Option<Paragraph>;
}

pub trait TableConverter<N> {
    fn convert_table(
        &self,
        node: &N,
        ids: &mut BlockIds,
        paragraphs: &dyn ParagraphConverter<N>,
    ) -> Option<Table>;
}

pub trait ImageConverter<N> {
    fn convert_image(&self, node: &N, ids: &mut BlockIds) -> Option<ImageBlock>;
}

pub struct ConverterSet<'a, N> {
    paragraphs: &'a dyn ParagraphConverter<N>,
    tables: &'a dyn TableConverter<N>,
    images: &'a dyn ImageConverter<N>,
}

impl<'a, N: SourceNode> ConverterSet<'a, N> {
    pub fn new(
        paragraphs: &'a dyn ParagraphConverter<N>,
        tables: &'a dyn TableConverter<N>,
        images: &'a dyn ImageConverter<N>,
    ) -> Self {
        Self {
            paragraphs,
            tables,
            images,
        }
    }

    /// Convert top-level nodes in order. Nodes a converter declines are skipped.
    pub fn convert(&self, nodes: &[N]) -> Vec<FlowBlock> {
        let mut ids = BlockIds::new();
        let mut blocks = Vec::with_capacity(nodes.len());
        let mut skipped = 0usize;
        for node in nodes {
            let block = match node.kind() {
                NodeKind::Paragraph => self
                    .paragraphs
                    .convert_paragraph(node, &mut ids)
                    .map(FlowBlock::Paragraph),
                NodeKind::Table => self
                    .tables
                    .convert_table(node, &mut ids, self.paragraphs)
                    .map(FlowBlock::Table),
                NodeKind::Image => self
                    .images
                    .convert_image(node, &mut ids)
                    .map(FlowBlock::Image),
                NodeKind::Other => None,
            };
            match block {
                Some(b) => blocks.push(b),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::debug!("convert: skipped {skipped} of {} source nodes", nodes.len());
        }
        blocks
    }
}
