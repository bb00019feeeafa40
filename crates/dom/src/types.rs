//! Core type definitions for the live node model
//!
//! Key design principles:
//! 1. Nodes refer to each other by id, never by pointer
//! 2. Ordered lists are authoritative, first/last views are derived from them
//! 3. Use SmallVec for small arrays (avoid heap allocation)
//! 4. Use Option<Box<T>> for kind-specific data (reduce struct size)

use crate::error::DomError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Node identifier, stable for the lifetime of a tree
pub type NodeId = u64;

/// Set of transitive descendants of a node
pub type MemberSet = HashSet<NodeId, ahash::RandomState>;

/// Node type, numbered as in the DOM standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    CdataSection = 4,
    EntityReference = 5,
    Entity = 6,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
    Notation = 12,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeType::Element),
            2 => Some(NodeType::Attribute),
            3 => Some(NodeType::Text),
            4 => Some(NodeType::CdataSection),
            5 => Some(NodeType::EntityReference),
            6 => Some(NodeType::Entity),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            10 => Some(NodeType::DocumentType),
            11 => Some(NodeType::DocumentFragment),
            12 => Some(NodeType::Notation),
            _ => None,
        }
    }

    pub fn is_element(self) -> bool {
        self == NodeType::Element
    }

    pub fn is_document(self) -> bool {
        self == NodeType::Document
    }
}

impl TryFrom<u8> for NodeType {
    type Error = DomError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeType::from_u8(value).ok_or_else(|| DomError::InvalidNodeType {
            expected: "valid NodeType".to_string(),
            actual: value.to_string(),
        })
    }
}

/// Aggregate views and singleton bindings held by a document node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentData {
    pub body: Option<NodeId>,
    pub head: Option<NodeId>,
    pub forms: Vec<NodeId>,
    pub images: Vec<NodeId>,
    pub scripts: Vec<NodeId>,
}

/// Point-in-time state of one node
///
/// Layout:
/// - Structural pointers are ids, materialized by the owning actor
/// - `children_ids` is authoritative, `element_children_ids` is its
///   element-only projection in the same relative order
/// - `members` is the node's membership set (all strict descendants)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    pub node_id: NodeId,
    pub node_type: NodeType,

    // Tree pointers
    pub parent_id: Option<NodeId>,
    pub parent_element_id: Option<NodeId>,
    pub previous_sibling_id: Option<NodeId>,
    pub next_sibling_id: Option<NodeId>,
    pub children_ids: SmallVec<[NodeId; 4]>,
    pub owner_document_id: Option<NodeId>,

    // Element-only projection
    pub element_children_ids: SmallVec<[NodeId; 4]>,
    pub previous_element_sibling_id: Option<NodeId>,
    pub next_element_sibling_id: Option<NodeId>,

    pub node_name: String,
    pub node_value: String,
    pub attributes: HashMap<String, String>,
    pub class_list: SmallVec<[String; 2]>,

    /// Schema-layer fields the core does not interpret
    pub properties: Map<String, Value>,

    /// Present only on document nodes
    pub document: Option<Box<DocumentData>>,

    #[serde(skip)]
    pub members: Arc<MemberSet>,
}

impl DomNode {
    /// Create a new detached node with required fields
    pub fn new(node_id: NodeId, node_type: NodeType, node_name: String) -> Self {
        Self {
            node_id,
            node_type,
            parent_id: None,
            parent_element_id: None,
            previous_sibling_id: None,
            next_sibling_id: None,
            children_ids: SmallVec::new(),
            owner_document_id: None,
            element_children_ids: SmallVec::new(),
            previous_element_sibling_id: None,
            next_element_sibling_id: None,
            node_name,
            node_value: String::new(),
            attributes: HashMap::new(),
            class_list: SmallVec::new(),
            properties: Map::new(),
            document: node_type
                .is_document()
                .then(|| Box::new(DocumentData::default())),
            members: Arc::new(MemberSet::default()),
        }
    }

    /// Build a node from its creation payload
    pub fn from_init(node_id: NodeId, init: NodeInit) -> Self {
        let mut node = Self::new(node_id, init.node_type, init.node_name);
        node.node_value = init.node_value;
        node.properties = init.properties;
        for (name, value) in init.attributes {
            node.apply(Field::Attribute {
                name,
                value: Some(value),
            });
        }
        if !init.class_list.is_empty() {
            node.apply(Field::ClassList {
                classes: init.class_list,
            });
        }
        node
    }

    /// Apply one generic field write
    pub fn apply(&mut self, field: Field) {
        match field {
            Field::Attribute { name, value } => {
                if name == "class" {
                    self.class_list = value
                        .as_deref()
                        .unwrap_or("")
                        .split_whitespace()
                        .map(String::from)
                        .collect();
                }
                match value {
                    Some(value) => {
                        self.attributes.insert(name, value);
                    }
                    None => {
                        self.attributes.remove(&name);
                    }
                }
            }
            Field::ClassList { classes } => {
                self.attributes
                    .insert("class".to_string(), classes.join(" "));
                self.class_list = classes.into_iter().collect();
            }
            Field::NodeValue { value } => self.node_value = value,
            Field::Property { name, value } => {
                self.properties.insert(name, value);
            }
        }
    }

    /// Get tag name for element nodes
    pub fn tag_name(&self) -> Option<&str> {
        if self.node_type == NodeType::Element {
            Some(&self.node_name)
        } else {
            None
        }
    }

    /// Check if node is an element
    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }

    /// Check if node is a document
    pub fn is_document(&self) -> bool {
        self.node_type == NodeType::Document
    }

    /// Check if node is text
    pub fn is_text(&self) -> bool {
        self.node_type == NodeType::Text
    }

    /// Get attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// Element id attribute
    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.class_list.iter().any(|c| c == name)
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.children_ids.first().copied()
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.children_ids.last().copied()
    }

    pub fn first_element_child(&self) -> Option<NodeId> {
        self.element_children_ids.first().copied()
    }

    pub fn last_element_child(&self) -> Option<NodeId> {
        self.element_children_ids.last().copied()
    }

    /// Element children (the `children` projection)
    pub fn children(&self) -> &[NodeId] {
        &self.element_children_ids
    }

    /// Whether `node_id` is a strict descendant of this node
    pub fn has_member(&self, node_id: NodeId) -> bool {
        self.members.contains(&node_id)
    }
}

/// Creation payload for a new node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInit {
    pub node_type: NodeType,
    pub node_name: String,
    #[serde(default)]
    pub node_value: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub class_list: Vec<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl NodeInit {
    fn with_kind(node_type: NodeType, node_name: &str) -> Self {
        Self {
            node_type,
            node_name: node_name.to_string(),
            node_value: String::new(),
            attributes: HashMap::new(),
            class_list: Vec::new(),
            properties: Map::new(),
        }
    }

    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeType::Element, tag)
    }

    pub fn text(value: &str) -> Self {
        let mut init = Self::with_kind(NodeType::Text, "#text");
        init.node_value = value.to_string();
        init
    }

    pub fn comment(value: &str) -> Self {
        let mut init = Self::with_kind(NodeType::Comment, "#comment");
        init.node_value = value.to_string();
        init
    }

    pub fn document() -> Self {
        Self::with_kind(NodeType::Document, "#document")
    }

    pub fn fragment() -> Self {
        Self::with_kind(NodeType::DocumentFragment, "#document-fragment")
    }

    pub fn with_id(self, id: &str) -> Self {
        self.with_attribute("id", id)
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class_list.push(class.to_string());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }
}

/// One generic field write, as sent by the property-schema layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Field {
    /// Set (`Some`) or remove (`None`) an attribute
    Attribute { name: String, value: Option<String> },
    ClassList { classes: Vec<String> },
    NodeValue { value: String },
    Property { name: String, value: Value },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_conversion() {
        assert_eq!(NodeType::try_from(1).unwrap(), NodeType::Element);
        assert!(matches!(
            NodeType::try_from(42),
            Err(DomError::InvalidNodeType { .. })
        ));
    }

    #[test]
    fn test_class_attribute_drives_class_list() {
        let mut node = DomNode::new(1, NodeType::Element, "div".to_string());
        node.apply(Field::Attribute {
            name: "class".to_string(),
            value: Some("a b a".to_string()),
        });
        assert_eq!(node.class_list.as_slice(), ["a", "b", "a"]);

        node.apply(Field::ClassList {
            classes: vec!["x".to_string(), "y".to_string()],
        });
        assert_eq!(node.attr("class"), Some("x y"));
        assert!(node.has_class("y"));
        assert!(!node.has_class("a"));
    }

    #[test]
    fn test_from_init() {
        let node = DomNode::from_init(
            7,
            NodeInit::element("span")
                .with_id("x")
                .with_class("y")
                .with_property("tabIndex", Value::from(2)),
        );
        assert_eq!(node.tag_name(), Some("span"));
        assert_eq!(node.id(), Some("x"));
        assert_eq!(node.class_list.as_slice(), ["y"]);
        assert_eq!(node.properties["tabIndex"], Value::from(2));
        assert!(node.document.is_none());
    }

    #[test]
    fn test_document_carries_aggregates() {
        let doc = DomNode::from_init(1, NodeInit::document());
        assert!(doc.is_document());
        assert_eq!(doc.document.as_deref(), Some(&DocumentData::default()));
        assert_eq!(doc.tag_name(), None);
    }

    #[test]
    fn test_field_wire_format() {
        let field: Field =
            serde_json::from_str(r#"{"kind":"attribute","name":"lang","value":"en"}"#).unwrap();
        assert_eq!(
            field,
            Field::Attribute {
                name: "lang".to_string(),
                value: Some("en".to_string())
            }
        );
    }
}
