use super::ebml::{encode_double, encode_uint, write_vint};
use super::error::EbmlWriterError;

/// A node which has been opened but not yet closed
#[derive(Debug)]
struct OpenNode {
    id: u64,
    content: Vec<u8>,
    has_children: bool,
    has_value: bool,
}

/// EbmlWriter builds nested tag/length/value documents.
///
/// Nodes are opened and closed in stack order. The size of a node is only known once it is
/// closed, so the content of every open node is accumulated until then; a closed node is
/// written into its parent, or into the output once it is a top level node.
#[derive(Debug, Default)]
pub struct EbmlWriter {
    stack: Vec<OpenNode>,
    output: Vec<u8>,
}

impl EbmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new child of the current node (or a new top level node)
    pub fn open_child(&mut self, id: u64) -> Result<(), EbmlWriterError> {
        if let Some(parent) = self.stack.last_mut() {
            if parent.has_value {
                return Err(EbmlWriterError::ChildOnLeaf(parent.id));
            }
            parent.has_children = true;
        }
        self.stack.push(OpenNode {
            id,
            content: Vec::new(),
            has_children: false,
            has_value: false,
        });
        Ok(())
    }

    /// Close the current node, writing its identifier, size and content into its parent
    pub fn close_child(&mut self) -> Result<(), EbmlWriterError> {
        let node = self.stack.pop().ok_or(EbmlWriterError::NoOpenChild)?;
        let target = match self.stack.last_mut() {
            Some(parent) => &mut parent.content,
            None => &mut self.output,
        };
        write_vint(node.id, target)?;
        write_vint(node.content.len() as u64, target)?;
        target.extend_from_slice(&node.content);
        Ok(())
    }

    fn set_value(&mut self, data: &[u8]) -> Result<(), EbmlWriterError> {
        let node = self
            .stack
            .last_mut()
            .ok_or(EbmlWriterError::NoCurrentNode)?;
        if node.has_children {
            return Err(EbmlWriterError::ValueOnMaster(node.id));
        }
        if node.has_value {
            return Err(EbmlWriterError::ValueAlreadySet(node.id));
        }
        node.has_value = true;
        node.content.extend_from_slice(data);
        Ok(())
    }

    pub fn set_uint(&mut self, value: u64) -> Result<(), EbmlWriterError> {
        self.set_value(&encode_uint(value))
    }

    pub fn set_double(&mut self, value: f64) -> Result<(), EbmlWriterError> {
        self.set_value(&encode_double(value))
    }

    pub fn set_str(&mut self, value: &str) -> Result<(), EbmlWriterError> {
        self.set_value(value.as_bytes())
    }

    pub fn set_binary(&mut self, value: &[u8]) -> Result<(), EbmlWriterError> {
        self.set_value(value)
    }

    /// Write a complete leaf: open, set, close
    pub fn write_uint(&mut self, id: u64, value: u64) -> Result<(), EbmlWriterError> {
        self.open_child(id)?;
        self.set_uint(value)?;
        self.close_child()
    }

    pub fn write_double(&mut self, id: u64, value: f64) -> Result<(), EbmlWriterError> {
        self.open_child(id)?;
        self.set_double(value)?;
        self.close_child()
    }

    pub fn write_str(&mut self, id: u64, value: &str) -> Result<(), EbmlWriterError> {
        self.open_child(id)?;
        self.set_str(value)?;
        self.close_child()
    }

    pub fn write_binary(&mut self, id: u64, value: &[u8]) -> Result<(), EbmlWriterError> {
        self.open_child(id)?;
        self.set_binary(value)?;
        self.close_child()
    }

    /// Number of currently open nodes
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Take the completed documents written so far. Fails if a node is still open.
    pub fn take_output(&mut self) -> Result<Vec<u8>, EbmlWriterError> {
        if !self.stack.is_empty() {
            return Err(EbmlWriterError::UnclosedChildren(self.stack.len()));
        }
        Ok(std::mem::take(&mut self.output))
    }

    /// Drop any open node and pending output
    pub fn reset(&mut self) {
        self.stack.clear();
        self.output.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_document() {
        let mut writer = EbmlWriter::new();
        writer.open_child(0x10).unwrap();
        writer.write_uint(0x11, 3).unwrap();
        writer.write_str(0x12, "ab").unwrap();
        writer.close_child().unwrap();
        let bytes = writer.take_output().unwrap();
        // 0x10 [size 7] { 0x11 [1] 3, 0x12 [2] 'a' 'b' }
        assert_eq!(
            bytes,
            vec![0x90, 0x87, 0x91, 0x81, 0x03, 0x92, 0x82, b'a', b'b']
        );
    }

    #[test]
    fn test_stack_discipline() {
        let mut writer = EbmlWriter::new();
        assert_eq!(writer.close_child(), Err(EbmlWriterError::NoOpenChild));
        assert_eq!(writer.set_uint(1), Err(EbmlWriterError::NoCurrentNode));

        writer.open_child(0x10).unwrap();
        writer.open_child(0x11).unwrap();
        writer.close_child().unwrap();
        assert_eq!(writer.set_uint(1), Err(EbmlWriterError::ValueOnMaster(0x10)));
        assert_eq!(writer.take_output(), Err(EbmlWriterError::UnclosedChildren(1)));

        writer.reset();
        writer.open_child(0x20).unwrap();
        writer.set_uint(1).unwrap();
        assert_eq!(writer.set_uint(2), Err(EbmlWriterError::ValueAlreadySet(0x20)));
        assert_eq!(writer.open_child(0x21), Err(EbmlWriterError::ChildOnLeaf(0x20)));
    }
}
