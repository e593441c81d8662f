//! Typed access to PackStream structure fields.
//!
//! [`Fields`] validates a structure's tag and arity once and then hands out
//! typed fields with uniform error messages. The graph structures built on
//! top of it keep their properties as raw [`PackStreamValue`]s; hydration
//! into driver values happens one layer up.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Checked view over the fields of one structure.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    name: &'static str,
    fields: &'a [PackStreamValue],
}

impl<'a> Fields<'a> {
    /// Check the tag and the number of fields.
    pub fn new(
        s: &'a PackStreamStructure,
        tag: u8,
        name: &'static str,
        arity: RangeInclusive<usize>,
    ) -> Result<Self, PackStreamError> {
        if s.tag != tag {
            return Err(PackStreamError::InvalidStructure(format!(
                "expected {} tag 0x{:02X}, got 0x{:02X}",
                name, tag, s.tag
            )));
        }
        if !arity.contains(&s.fields.len()) {
            return Err(PackStreamError::InvalidStructure(format!(
                "{} expects {}..={} fields, got {}",
                name,
                arity.start(),
                arity.end(),
                s.fields.len()
            )));
        }
        Ok(Self {
            name,
            fields: &s.fields,
        })
    }

    /// Number of fields present.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn field(&self, index: usize) -> Result<&'a PackStreamValue, PackStreamError> {
        self.fields.get(index).ok_or_else(|| {
            PackStreamError::InvalidStructure(format!("{} is missing field {}", self.name, index))
        })
    }

    fn mismatch(&self, index: usize, expected: &str, got: &PackStreamValue) -> PackStreamError {
        PackStreamError::InvalidStructure(format!(
            "{} field {} must be {}, got {}",
            self.name,
            index,
            expected,
            got.type_name()
        ))
    }

    /// Integer field.
    pub fn int(&self, index: usize) -> Result<i64, PackStreamError> {
        let v = self.field(index)?;
        v.as_int().ok_or_else(|| self.mismatch(index, "Integer", v))
    }

    /// Float field.
    pub fn float(&self, index: usize) -> Result<f64, PackStreamError> {
        let v = self.field(index)?;
        v.as_float().ok_or_else(|| self.mismatch(index, "Float", v))
    }

    /// String field.
    pub fn string(&self, index: usize) -> Result<&'a str, PackStreamError> {
        let v = self.field(index)?;
        v.as_str().ok_or_else(|| self.mismatch(index, "String", v))
    }

    /// String field that may be absent (older protocol revisions).
    pub fn optional_string(&self, index: usize) -> Result<Option<&'a str>, PackStreamError> {
        match self.fields.get(index) {
            None | Some(PackStreamValue::Null) => Ok(None),
            Some(v) => v.as_str().map(Some).ok_or_else(|| self.mismatch(index, "String", v)),
        }
    }

    /// List field.
    pub fn list(&self, index: usize) -> Result<&'a [PackStreamValue], PackStreamError> {
        let v = self.field(index)?;
        v.as_list().ok_or_else(|| self.mismatch(index, "List", v))
    }

    /// Map field.
    pub fn map(&self, index: usize) -> Result<&'a HashMap<String, PackStreamValue>, PackStreamError> {
        let v = self.field(index)?;
        v.as_map().ok_or_else(|| self.mismatch(index, "Map", v))
    }

    /// List of strings field.
    pub fn strings(&self, index: usize) -> Result<Vec<String>, PackStreamError> {
        self.list(index)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.mismatch(index, "List<String>", v))
            })
            .collect()
    }
}

fn as_structure<'a>(
    value: &'a PackStreamValue,
    name: &str,
) -> Result<&'a PackStreamStructure, PackStreamError> {
    value.as_structure().ok_or_else(|| {
        PackStreamError::InvalidStructure(format!("expected {} structure, got {}", name, value.type_name()))
    })
}

fn push_element_id(fields: &mut Vec<PackStreamValue>, element_id: &Option<String>) {
    if let Some(id) = element_id {
        fields.push(PackStreamValue::String(id.clone()));
    }
}

/// Node as sent by the server: `N(id, labels, properties[, element_id])`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamNode {
    /// Legacy integer id
    pub id: i64,
    /// Node labels
    pub labels: Vec<String>,
    /// Node properties
    pub properties: HashMap<String, PackStreamValue>,
    /// String element id (protocol 5+)
    pub element_id: Option<String>,
}

impl PackStreamNode {
    /// Create a node without an element id.
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, PackStreamValue>) -> Self {
        Self {
            id,
            labels,
            properties,
            element_id: None,
        }
    }

    /// Set the element id.
    pub fn with_element_id(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    /// Parse from a structure.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let f = Fields::new(s, NODE_TAG, "Node", 3..=4)?;
        Ok(Self {
            id: f.int(0)?,
            labels: f.strings(1)?,
            properties: f.map(2)?.clone(),
            element_id: f.optional_string(3)?.map(str::to_string),
        })
    }

    /// Parse from a value that must be a Node structure.
    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        Self::from_structure(as_structure(value, "Node")?)
    }

    /// Convert to a structure value.
    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            PackStreamValue::string_list(&self.labels),
            PackStreamValue::Map(self.properties.clone()),
        ];
        push_element_id(&mut fields, &self.element_id);
        PackStreamStructure::new(NODE_TAG, fields).into()
    }
}

/// Relationship as sent by the server:
/// `R(id, start, end, type, properties[, element_id, start_element_id, end_element_id])`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamRelationship {
    /// Legacy integer id
    pub id: i64,
    /// Start node id
    pub start_node_id: i64,
    /// End node id
    pub end_node_id: i64,
    /// Relationship type
    pub rel_type: String,
    /// Relationship properties
    pub properties: HashMap<String, PackStreamValue>,
    /// Element id (protocol 5+)
    pub element_id: Option<String>,
    /// Start node element id (protocol 5+)
    pub start_node_element_id: Option<String>,
    /// End node element id (protocol 5+)
    pub end_node_element_id: Option<String>,
}

impl PackStreamRelationship {
    /// Create a relationship without element ids.
    pub fn new(
        id: i64,
        start_node_id: i64,
        end_node_id: i64,
        rel_type: impl Into<String>,
        properties: HashMap<String, PackStreamValue>,
    ) -> Self {
        Self {
            id,
            start_node_id,
            end_node_id,
            rel_type: rel_type.into(),
            properties,
            element_id: None,
            start_node_element_id: None,
            end_node_element_id: None,
        }
    }

    /// Parse from a structure.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let f = Fields::new(s, RELATIONSHIP_TAG, "Relationship", 5..=8)?;
        Ok(Self {
            id: f.int(0)?,
            start_node_id: f.int(1)?,
            end_node_id: f.int(2)?,
            rel_type: f.string(3)?.to_string(),
            properties: f.map(4)?.clone(),
            element_id: f.optional_string(5)?.map(str::to_string),
            start_node_element_id: f.optional_string(6)?.map(str::to_string),
            end_node_element_id: f.optional_string(7)?.map(str::to_string),
        })
    }

    /// Convert to a structure value.
    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            PackStreamValue::Integer(self.start_node_id),
            PackStreamValue::Integer(self.end_node_id),
            PackStreamValue::String(self.rel_type.clone()),
            PackStreamValue::Map(self.properties.clone()),
        ];
        if self.element_id.is_some() {
            push_element_id(&mut fields, &self.element_id);
            fields.push(self.start_node_element_id.clone().unwrap_or_default().into());
            fields.push(self.end_node_element_id.clone().unwrap_or_default().into());
        }
        PackStreamStructure::new(RELATIONSHIP_TAG, fields).into()
    }
}

/// Relationship without endpoints, only valid inside a path:
/// `r(id, type, properties[, element_id])`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamUnboundRelationship {
    /// Legacy integer id
    pub id: i64,
    /// Relationship type
    pub rel_type: String,
    /// Relationship properties
    pub properties: HashMap<String, PackStreamValue>,
    /// Element id (protocol 5+)
    pub element_id: Option<String>,
}

impl PackStreamUnboundRelationship {
    /// Create an unbound relationship without an element id.
    pub fn new(id: i64, rel_type: impl Into<String>, properties: HashMap<String, PackStreamValue>) -> Self {
        Self {
            id,
            rel_type: rel_type.into(),
            properties,
            element_id: None,
        }
    }

    /// Parse from a structure.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let f = Fields::new(s, UNBOUND_RELATIONSHIP_TAG, "UnboundRelationship", 3..=4)?;
        Ok(Self {
            id: f.int(0)?,
            rel_type: f.string(1)?.to_string(),
            properties: f.map(2)?.clone(),
            element_id: f.optional_string(3)?.map(str::to_string),
        })
    }

    /// Convert to a structure value.
    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            PackStreamValue::String(self.rel_type.clone()),
            PackStreamValue::Map(self.properties.clone()),
        ];
        push_element_id(&mut fields, &self.element_id);
        PackStreamStructure::new(UNBOUND_RELATIONSHIP_TAG, fields).into()
    }
}

/// Path in its compact wire form: `P(nodes, relationships, indices)`.
///
/// `indices` alternates relationship and node indices. A relationship index
/// `i > 0` means `relationships[i - 1]` traversed forwards, `i < 0` means
/// `relationships[-i - 1]` traversed backwards; node indices point into
/// `nodes`. The first node of the path is always `nodes[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamPath {
    /// Distinct nodes in the path
    pub nodes: Vec<PackStreamNode>,
    /// Distinct relationships in the path
    pub relationships: Vec<PackStreamUnboundRelationship>,
    /// Traversal indices
    pub indices: Vec<i64>,
}

impl PackStreamPath {
    /// Parse from a structure.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let f = Fields::new(s, PATH_TAG, "Path", 3..=3)?;
        let nodes = f
            .list(0)?
            .iter()
            .map(PackStreamNode::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        let relationships = f
            .list(1)?
            .iter()
            .map(|v| PackStreamUnboundRelationship::from_structure(as_structure(v, "UnboundRelationship")?))
            .collect::<Result<Vec<_>, _>>()?;
        let indices = f
            .list(2)?
            .iter()
            .map(|v| {
                v.as_int()
                    .ok_or_else(|| PackStreamError::InvalidStructure("Path indices must be integers".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if indices.len() % 2 != 0 {
            return Err(PackStreamError::InvalidStructure(
                "Path indices must come in relationship/node pairs".into(),
            ));
        }
        Ok(Self {
            nodes,
            relationships,
            indices,
        })
    }

    /// Convert to a structure value.
    pub fn to_value(&self) -> PackStreamValue {
        PackStreamStructure::new(
            PATH_TAG,
            vec![
                PackStreamValue::List(self.nodes.iter().map(PackStreamNode::to_value).collect()),
                PackStreamValue::List(
                    self.relationships
                        .iter()
                        .map(PackStreamUnboundRelationship::to_value)
                        .collect(),
                ),
                PackStreamValue::List(self.indices.iter().copied().map(PackStreamValue::Integer).collect()),
            ],
        )
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(name: &str) -> HashMap<String, PackStreamValue> {
        let mut p = HashMap::new();
        p.insert("name".to_string(), PackStreamValue::String(name.to_string()));
        p
    }

    #[test]
    fn test_node_round_trip() {
        let node = PackStreamNode::new(7, vec!["Person".into()], props("Alice"));
        let parsed = PackStreamNode::from_value(&node.to_value()).unwrap();
        assert_eq!(parsed, node);

        let node5 = node.clone().with_element_id("4:abc:7");
        let parsed = PackStreamNode::from_value(&node5.to_value()).unwrap();
        assert_eq!(parsed.element_id.as_deref(), Some("4:abc:7"));
    }

    #[test]
    fn test_relationship_round_trip() {
        let mut rel = PackStreamRelationship::new(1, 2, 3, "KNOWS", props("r"));
        let parsed = PackStreamRelationship::from_value_for_test(&rel.to_value());
        assert_eq!(parsed, rel);

        rel.element_id = Some("5:r".into());
        rel.start_node_element_id = Some("5:a".into());
        rel.end_node_element_id = Some("5:b".into());
        let parsed = PackStreamRelationship::from_value_for_test(&rel.to_value());
        assert_eq!(parsed, rel);
    }

    #[test]
    fn test_path_round_trip() {
        let path = PackStreamPath {
            nodes: vec![
                PackStreamNode::new(1, vec![], HashMap::new()),
                PackStreamNode::new(2, vec![], HashMap::new()),
            ],
            relationships: vec![PackStreamUnboundRelationship::new(9, "TO", HashMap::new())],
            indices: vec![1, 1],
        };
        let value = path.to_value();
        let parsed = PackStreamPath::from_structure(value.as_structure().unwrap()).unwrap();
        assert_eq!(parsed, path);
    }

    #[test]
    fn test_wrong_tag_and_arity() {
        let s = PackStreamStructure::new(RELATIONSHIP_TAG, vec![]);
        assert!(PackStreamNode::from_structure(&s).is_err());

        let s = PackStreamStructure::new(NODE_TAG, vec![PackStreamValue::Integer(1)]);
        let err = PackStreamNode::from_structure(&s).unwrap_err();
        assert!(err.to_string().contains("Node expects 3..=4 fields"));
    }

    #[test]
    fn test_field_type_mismatch() {
        let s = PackStreamStructure::new(
            NODE_TAG,
            vec!["oops".into(), PackStreamValue::List(vec![]), PackStreamValue::Map(HashMap::new())],
        );
        let err = PackStreamNode::from_structure(&s).unwrap_err();
        assert!(err.to_string().contains("Node field 0 must be Integer, got String"));
    }

    #[test]
    fn test_odd_path_indices_rejected() {
        let s = PackStreamStructure::new(
            PATH_TAG,
            vec![
                PackStreamValue::List(vec![]),
                PackStreamValue::List(vec![]),
                PackStreamValue::List(vec![PackStreamValue::Integer(1)]),
            ],
        );
        assert!(PackStreamPath::from_structure(&s).is_err());
    }

    impl PackStreamRelationship {
        fn from_value_for_test(value: &PackStreamValue) -> Self {
            Self::from_structure(value.as_structure().unwrap()).unwrap()
        }
    }
}
