//! Builds stream-out declarations from shader output signatures.
//!
//! Every element is captured as 32-bit components in signature order, except that the
//! clip-space position (if present) is widened to 4 components and moved to the front. Viewers
//! and the near/far estimator read the position from offset 0 of each vertex and skip past it to
//! find the remaining channels in their original order.

use crate::device::{StreamOutEntry, StreamOutputDesc};
use crate::signature::OutputElement;

const COMPONENT_BYTES: u32 = 4;

/// Stride used when a signature produces no data at all.
pub const FALLBACK_STRIDE: u32 = 4;

/// A stream-out entry together with its byte offset inside a captured vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutBinding {
    pub entry: StreamOutEntry,
    pub byte_offset: u32,
}

/// Ordered stream-out layout for one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamOutLayout {
    pub bindings: Vec<StreamOutBinding>,
    /// Bytes per captured vertex. Always > 0 for a non-empty layout.
    pub stride: u32,
    /// Index of the position element among the captured elements, before it was moved to the
    /// front.
    pub position_source_index: Option<usize>,
}

impl StreamOutLayout {
    /// Builds the layout for `elements`, optionally keeping only elements of one output stream.
    pub fn build(elements: &[OutputElement], stream: Option<u32>) -> Self {
        let mut entries = Vec::with_capacity(elements.len());
        let mut stride = 0u32;
        let mut position = None;

        for element in elements
            .iter()
            .filter(|e| stream.map_or(true, |s| e.stream == s))
        {
            let component_count = if element.is_position() {
                position = Some(entries.len());
                4
            } else {
                element.component_count
            };

            stride += u32::from(component_count) * COMPONENT_BYTES;
            entries.push(StreamOutEntry {
                stream: 0,
                semantic_name: element.semantic_name.clone(),
                semantic_index: element.semantic_index,
                start_component: 0,
                component_count,
                output_slot: 0,
            });
        }

        if entries.is_empty() {
            return Self::default();
        }

        if stride == 0 {
            tracing::error!(
                "output signature produced a zero stream-out stride, using {FALLBACK_STRIDE} bytes"
            );
            stride = FALLBACK_STRIDE;
        }

        if let Some(idx) = position.filter(|&idx| idx > 0) {
            let pos = entries.remove(idx);
            entries.insert(0, pos);
        }

        let mut offset = 0u32;
        let bindings = entries
            .into_iter()
            .map(|entry| {
                let byte_offset = offset;
                offset += u32::from(entry.component_count) * COMPONENT_BYTES;
                StreamOutBinding { entry, byte_offset }
            })
            .collect();

        Self {
            bindings,
            stride,
            position_source_index: position,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Whether the layout captures a clip-space position (always at offset 0).
    pub fn has_position(&self) -> bool {
        self.position_source_index.is_some()
    }

    /// The pipeline-level stream-out description: a single buffer, nothing rasterized.
    pub fn to_stream_output_desc(&self) -> StreamOutputDesc {
        StreamOutputDesc {
            entries: self.bindings.iter().map(|b| b.entry.clone()).collect(),
            buffer_strides: vec![self.stride],
            rasterized_stream: None,
        }
    }
}
