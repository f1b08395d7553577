//! Shape of a virtual object: the fixed, ordered list of entries it holds.
//!
//! An instance has one entry per instance field, supertype fields first. An
//! array has one entry per element. The shape also knows how to rebuild the
//! real allocation and the store for each entry when the object is
//! materialized.

use kiln_ir::{Constant, FieldId, Graph, HostTypes, NodeId, NodeKind, StorageKind, TypeId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VirtualShape {
    Instance { ty: TypeId, fields: Vec<FieldId> },
    Array { elem: StorageKind, length: u32 },
}

impl VirtualShape {
    /// Shape of a virtual object node, or `None` for any other kind.
    pub fn of(graph: &Graph, node: NodeId) -> Option<Self> {
        match graph.kind(node) {
            NodeKind::VirtualInstance { ty } => Some(Self::instance(graph.types(), ty)),
            NodeKind::VirtualArray { elem, length } => Some(Self::Array { elem, length }),
            _ => None,
        }
    }

    pub fn instance(types: &HostTypes, ty: TypeId) -> Self {
        Self::Instance {
            ty,
            fields: types.instance_fields(ty),
        }
    }

    pub fn entry_count(&self) -> usize {
        match self {
            Self::Instance { fields, .. } => fields.len(),
            Self::Array { length, .. } => *length as usize,
        }
    }

    pub fn entry_kind(&self, types: &HostTypes, index: usize) -> StorageKind {
        match self {
            Self::Instance { fields, .. } => types.field(fields[index]).kind,
            Self::Array { elem, .. } => *elem,
        }
    }

    /// Entry index of `field`; `None` if the object has no such field.
    pub fn field_index(&self, field: FieldId) -> Option<usize> {
        match self {
            Self::Instance { fields, .. } => fields.iter().position(|&f| f == field),
            Self::Array { .. } => None,
        }
    }

    /// Entry index for a raw byte offset into the object.
    pub fn entry_index_for_offset(&self, types: &HostTypes, offset: u32) -> Option<usize> {
        match self {
            Self::Instance { ty, .. } => {
                let field = types.find_instance_field_with_offset(*ty, offset)?;
                self.field_index(field)
            }
            Self::Array { elem, length } => {
                let size = elem.size_in_bytes();
                let base = kiln_ir::OBJECT_HEADER_SIZE;
                if offset < base || (offset - base) % size != 0 {
                    return None;
                }
                let index = (offset - base) / size;
                (index < *length).then_some(index as usize)
            }
        }
    }

    /// Entry index for a constant array index.
    pub fn element_index(&self, index: i64) -> Option<usize> {
        match self {
            Self::Array { length, .. } => u32::try_from(index)
                .ok()
                .filter(|i| i < length)
                .map(|i| i as usize),
            Self::Instance { .. } => None,
        }
    }

    pub fn default_entry(&self, types: &HostTypes, index: usize) -> Constant {
        Constant::default_for(self.entry_kind(types, index))
    }

    /// Constant nodes holding the default value of every entry.
    pub fn default_entries(&self, graph: &mut Graph) -> Vec<NodeId> {
        (0..self.entry_count())
            .map(|i| {
                let c = self.default_entry(graph.types(), i);
                graph.constant(c)
            })
            .collect()
    }

    pub fn is_default(&self, graph: &Graph, index: usize, value: NodeId) -> bool {
        graph.constant_value(value) == Some(self.default_entry(graph.types(), index))
    }

    /// Create the unplaced allocation that materializes this object.
    pub fn build_allocation(&self, graph: &mut Graph) -> NodeId {
        match self {
            Self::Instance { ty, .. } => {
                graph.add_unplaced(NodeKind::NewInstance { ty: *ty }, &[])
            }
            Self::Array { elem, length } => {
                let len = graph.int(i32::try_from(*length).unwrap_or(i32::MAX));
                graph.add_unplaced(NodeKind::NewArray { elem: *elem }, &[len])
            }
        }
    }

    /// Create the unplaced store writing `value` into entry `index` of `object`.
    pub fn build_store(
        &self,
        graph: &mut Graph,
        object: NodeId,
        index: usize,
        value: NodeId,
    ) -> NodeId {
        match self {
            Self::Instance { fields, .. } => graph.add_unplaced(
                NodeKind::StoreField {
                    field: fields[index],
                },
                &[object, value],
            ),
            Self::Array { elem, .. } => {
                let idx = graph.int(i32::try_from(index).unwrap_or(i32::MAX));
                graph.add_unplaced(NodeKind::StoreIndexed { elem: *elem }, &[object, idx, value])
            }
        }
    }
}

#[cfg(test)]
mod tests;
