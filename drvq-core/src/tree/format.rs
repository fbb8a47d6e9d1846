//! Binary encoding of quantization trees
//!
//! ```text
//! leaf:     u8 0 | base f64 | bin_width f64 | K u64 | centroids [f64]
//!           | bin_to_centroid [u32] | neighbors [[u32]] | weights [[f64]]
//! internal: u8 1 | K u64 | J u64 | dims0 [u64] | dims1 [u64]
//!           | code0 [u32] | code1 [u32] | grid J × [u32; J]
//!           | neighbors [[u32]] | weights [[f64]] | child0 | child1
//! ```
//!
//! Dimension ranges are stored as explicit index lists relative to the
//! node. Grid row `c1` holds cells `(0..J, c1)`.

use std::io::{Read, Write};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{InternalNode, LeafNode, QuantNode};
use crate::binary::{read_f64s, read_nested, read_u32s, read_u64s, write_f64s, write_u32s, write_u64s};
use crate::error::{Error, Result};
use crate::structures::CentroidGraph;

const TAG_LEAF: u8 = 0;
const TAG_INTERNAL: u8 = 1;

/// Deepest tree accepted on read (2^48 dimensions)
const MAX_DEPTH: usize = 48;

impl QuantNode {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            QuantNode::Leaf(leaf) => {
                writer.write_u8(TAG_LEAF)?;
                writer.write_f64::<LittleEndian>(leaf.base)?;
                writer.write_f64::<LittleEndian>(leaf.bin_width)?;
                writer.write_u64::<LittleEndian>(leaf.k() as u64)?;
                write_f64s(writer, &leaf.centroids)?;
                write_u32s(writer, &leaf.bin_to_centroid)?;
                leaf.graph.write_to(writer)
            }
            QuantNode::Internal(node) => {
                writer.write_u8(TAG_INTERNAL)?;
                writer.write_u64::<LittleEndian>(node.k() as u64)?;
                writer.write_u64::<LittleEndian>(node.j as u64)?;
                write_u64s(writer, &range_indices(&node.dims0))?;
                write_u64s(writer, &range_indices(&node.dims1))?;
                write_u32s(writer, &node.code0)?;
                write_u32s(writer, &node.code1)?;
                writer.write_u64::<LittleEndian>(node.j as u64)?;
                for row in node.grid.chunks(node.j.max(1)) {
                    write_u32s(writer, row)?;
                }
                node.graph.write_to(writer)?;
                node.child0.write_to(writer)?;
                node.child1.write_to(writer)
            }
        }
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        read_node(reader, 0)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from(&mut std::io::Cursor::new(data))
    }
}

fn range_indices(range: &Range<usize>) -> Vec<u64> {
    range.clone().map(|d| d as u64).collect()
}

fn indices_range(indices: &[u64]) -> Result<Range<usize>> {
    let Some(&first) = indices.first() else {
        return Err(Error::Corruption("empty child dimension range".into()));
    };
    if indices.iter().enumerate().any(|(i, &d)| d != first + i as u64) {
        return Err(Error::Corruption(
            "child dimension range is not contiguous".into(),
        ));
    }
    let start = first as usize;
    Ok(start..start + indices.len())
}

fn read_node<R: Read>(reader: &mut R, depth: usize) -> Result<QuantNode> {
    if depth > MAX_DEPTH {
        return Err(Error::Corruption("tree too deep".into()));
    }
    match reader.read_u8()? {
        TAG_LEAF => read_leaf(reader).map(QuantNode::Leaf),
        TAG_INTERNAL => read_internal(reader, depth).map(QuantNode::Internal),
        tag => Err(Error::Corruption(format!("unknown node tag {}", tag))),
    }
}

fn read_leaf<R: Read>(reader: &mut R) -> Result<LeafNode> {
    let base = reader.read_f64::<LittleEndian>()?;
    let bin_width = reader.read_f64::<LittleEndian>()?;
    let k = reader.read_u64::<LittleEndian>()? as usize;
    let centroids = read_f64s(reader)?;
    let bin_to_centroid = read_u32s(reader)?;
    if centroids.len() != k {
        return Err(Error::Corruption(format!(
            "leaf declares {} centroids, stores {}",
            k,
            centroids.len()
        )));
    }
    if bin_to_centroid.is_empty() || bin_to_centroid.iter().any(|&c| c as usize >= k) {
        return Err(Error::Corruption("leaf bin table invalid".into()));
    }
    if !(bin_width > 0.0) {
        return Err(Error::Corruption(format!("leaf bin width {}", bin_width)));
    }
    let graph = CentroidGraph::read_from(reader, k)?;
    Ok(LeafNode {
        base,
        bin_width,
        centroids,
        bin_to_centroid,
        graph,
    })
}

fn read_internal<R: Read>(reader: &mut R, depth: usize) -> Result<InternalNode> {
    let k = reader.read_u64::<LittleEndian>()? as usize;
    let j = reader.read_u64::<LittleEndian>()? as usize;
    let dims0 = indices_range(&read_u64s(reader)?)?;
    let dims1 = indices_range(&read_u64s(reader)?)?;
    if dims0.start != 0 || dims1.start != dims0.end {
        return Err(Error::Corruption(format!(
            "child ranges {:?} and {:?} do not tile the node",
            dims0, dims1
        )));
    }
    let code0 = read_u32s(reader)?;
    let code1 = read_u32s(reader)?;
    if code0.len() != k || code1.len() != k {
        return Err(Error::Corruption(format!(
            "node declares {} centroids, stores {}/{} codes",
            k,
            code0.len(),
            code1.len()
        )));
    }
    if code0.iter().chain(&code1).any(|&c| c as usize >= j) {
        return Err(Error::Corruption("centroid code outside grid".into()));
    }

    let rows = read_nested(reader, read_u32s)?;
    if rows.len() != j || rows.iter().any(|r| r.len() != j) {
        return Err(Error::Corruption(format!("grid is not {}x{}", j, j)));
    }
    let grid: Vec<u32> = rows.into_iter().flatten().collect();
    if grid.iter().any(|&c| c as usize >= k) {
        return Err(Error::Corruption("grid cell owned by unknown centroid".into()));
    }

    let graph = CentroidGraph::read_from(reader, k)?;
    let child0 = read_node(reader, depth + 1)?;
    let child1 = read_node(reader, depth + 1)?;
    for (child, dims) in [(&child0, &dims0), (&child1, &dims1)] {
        if child.k() != j || child.dims() != dims.len() {
            return Err(Error::Corruption(format!(
                "child with {} centroids over {} dimensions, expected {} over {}",
                child.k(),
                child.dims(),
                j,
                dims.len()
            )));
        }
    }

    Ok(InternalNode {
        j,
        dims0,
        dims1,
        code0,
        code1,
        grid,
        graph,
        child0: Box::new(child0),
        child1: Box::new(child1),
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::small_tree;
    use super::*;

    #[test]
    fn test_roundtrip() {
        let tree = small_tree();
        let bytes = tree.to_bytes().unwrap();
        assert_eq!(bytes[0], TAG_INTERNAL);
        let back = QuantNode::from_bytes(&bytes).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_grid_stored_as_rows() {
        let QuantNode::Internal(node) = small_tree() else {
            unreachable!()
        };
        let bytes = QuantNode::Internal(node.clone()).to_bytes().unwrap();
        // tag, K, J, dims0 (len + 1), dims1 (len + 1), code0 (len + 3), code1 (len + 3)
        let grid_at = 1 + 8 + 8 + 16 + 16 + (8 + 12) + (8 + 12);
        let rows = u64::from_le_bytes(bytes[grid_at..grid_at + 8].try_into().unwrap());
        assert_eq!(rows, 2);
        let first_row_len = u64::from_le_bytes(bytes[grid_at + 8..grid_at + 16].try_into().unwrap());
        assert_eq!(first_row_len, 2);
        let cell = u32::from_le_bytes(bytes[grid_at + 16 + 4..grid_at + 20 + 4].try_into().unwrap());
        assert_eq!(cell, node.lookup(1, 0));
    }

    #[test]
    fn test_corruption_detected() {
        let bytes = small_tree().to_bytes().unwrap();

        let mut bad_tag = bytes.clone();
        bad_tag[0] = 7;
        assert!(matches!(
            QuantNode::from_bytes(&bad_tag),
            Err(Error::Corruption(_))
        ));

        let truncated = &bytes[..bytes.len() - 3];
        assert!(QuantNode::from_bytes(truncated).is_err());

        // K field says 4 centroids but three codes follow
        let mut bad_k = bytes.clone();
        bad_k[1..9].copy_from_slice(&4u64.to_le_bytes());
        assert!(matches!(
            QuantNode::from_bytes(&bad_k),
            Err(Error::Corruption(_))
        ));
    }
}
