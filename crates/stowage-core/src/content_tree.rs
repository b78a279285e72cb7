//! Structured editor documents as a tagged tree.
//!
//! Editor output is loosely shaped JSON: `{ "type": ..., "attrs": {...}, "content": [...] }`.
//! A node carrying `attrs.src` is an image (it references a stored object), a node
//! with a `content` array is a container, and anything else is kept verbatim.
//! Conversion never fails on unfamiliar shapes; they are carried through untouched.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode {
    /// A node referencing an object through `attrs.src`. `node` keeps every other field.
    Image {
        src: String,
        node: Map<String, Value>,
    },
    /// A node with children. `node` is `None` for a bare JSON array.
    Container {
        node: Option<Map<String, Value>>,
        children: Vec<ContentNode>,
    },
    Other(Value),
}

impl ContentNode {
    /// Parse a stored JSON document.
    pub fn parse(json: &str) -> Result<ContentNode, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;
        Ok(ContentNode::from_value(value))
    }

    pub fn from_value(value: Value) -> ContentNode {
        match value {
            Value::Object(mut map) => {
                let src = map
                    .get("attrs")
                    .and_then(|attrs| attrs.get("src"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if let Some(src) = src {
                    return ContentNode::Image { src, node: map };
                }
                match map.remove("content") {
                    Some(Value::Array(items)) => ContentNode::Container {
                        node: Some(map),
                        children: items.into_iter().map(ContentNode::from_value).collect(),
                    },
                    Some(other) => {
                        map.insert("content".to_string(), other);
                        ContentNode::Other(Value::Object(map))
                    }
                    None => ContentNode::Other(Value::Object(map)),
                }
            }
            Value::Array(items) => ContentNode::Container {
                node: None,
                children: items.into_iter().map(ContentNode::from_value).collect(),
            },
            other => ContentNode::Other(other),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ContentNode::Image { src, mut node } => {
                if let Some(Value::Object(attrs)) = node.get_mut("attrs") {
                    attrs.insert("src".to_string(), Value::String(src));
                }
                Value::Object(node)
            }
            ContentNode::Container { node, children } => {
                let children: Vec<Value> = children.into_iter().map(Self::into_value).collect();
                match node {
                    Some(mut map) => {
                        map.insert("content".to_string(), Value::Array(children));
                        Value::Object(map)
                    }
                    None => Value::Array(children),
                }
            }
            ContentNode::Other(value) => value,
        }
    }

    /// Depth-first pre-order visit of every node.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ContentNode)) {
        visit(self);
        if let ContentNode::Container { children, .. } = self {
            for child in children {
                child.walk(visit);
            }
        }
    }

    /// Every `src` referenced by image nodes, in document order.
    pub fn image_sources(&self) -> Vec<&str> {
        let mut sources = Vec::new();
        self.walk(&mut |node| {
            if let ContentNode::Image { src, .. } = node {
                sources.push(src.as_str());
            }
        });
        sources
    }

    /// Replace image sources. `rewrite` returns `None` to keep a source unchanged.
    pub fn rewrite_sources(self, rewrite: &mut impl FnMut(&str) -> Option<String>) -> ContentNode {
        match self {
            ContentNode::Image { src, node } => {
                let src = rewrite(&src).unwrap_or(src);
                ContentNode::Image { src, node }
            }
            ContentNode::Container { node, children } => ContentNode::Container {
                node,
                children: children
                    .into_iter()
                    .map(|child| child.rewrite_sources(rewrite))
                    .collect(),
            },
            other => other,
        }
    }
}
