// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Features and their typed attribute values.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use topo_lite_geometry::Geometry;

use crate::keys::ObjectId;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Int(i64),
    Double(f64),
    String(String),
    Null,
}

/// Attribute values keyed by field name.
pub type Attributes = FxHashMap<String, AttributeValue>;

/// Back-reference from graph elements and errors to a stored feature.
///
/// Resolved through the geometry store; holding one does not keep the feature
/// alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub class: String,
    pub object_id: ObjectId,
}

impl FeatureInfo {
    pub fn new(class: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            class: class.into(),
            object_id,
        }
    }
}

impl std::fmt::Display for FeatureInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.class, self.object_id)
    }
}

/// A stored feature: identity, optional subtype, shape and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub info: FeatureInfo,
    pub subtype: Option<i32>,
    pub geometry: Geometry,
    pub attributes: Attributes,
}

impl Feature {
    pub fn object_id(&self) -> ObjectId {
        self.info.object_id
    }

    pub fn class(&self) -> &str {
        &self.info.class
    }

    /// Returns an attribute value, if the field is set.
    pub fn attribute(&self, field: &str) -> Option<&AttributeValue> {
        self.attributes.get(field)
    }
}

/// Shape, subtype and attributes for a feature that is about to be inserted
/// or updated.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDraft {
    pub subtype: Option<i32>,
    pub geometry: Geometry,
    pub attributes: Attributes,
}

impl FeatureDraft {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            subtype: None,
            geometry,
            attributes: Attributes::default(),
        }
    }

    pub fn with_subtype(mut self, subtype: i32) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn with_attribute(mut self, field: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(field.into(), value);
        self
    }
}

impl From<Geometry> for FeatureDraft {
    fn from(geometry: Geometry) -> Self {
        Self::new(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_builder_sets_fields() {
        let draft = FeatureDraft::new(Geometry::point(1.0, 2.0))
            .with_subtype(3)
            .with_attribute("name", AttributeValue::String("hydrant".into()))
            .with_attribute("flow", AttributeValue::Double(1.5));

        assert_eq!(draft.subtype, Some(3));
        assert_eq!(draft.attributes.len(), 2);
        assert_eq!(
            draft.attributes.get("flow"),
            Some(&AttributeValue::Double(1.5))
        );
    }

    #[test]
    fn feature_info_orders_by_class_then_id() {
        let a = FeatureInfo::new("Lines", 9);
        let b = FeatureInfo::new("Points", 1);
        let c = FeatureInfo::new("Points", 2);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(c.to_string(), "Points/2");
    }
}
