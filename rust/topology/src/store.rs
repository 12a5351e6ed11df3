// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory geometry store.
//!
//! Feature classes own their features (ordered by object id) and a grid index
//! over feature envelopes. Edits arrive as [`EditBatch`]es that are checked in
//! full before anything is written, so a batch either commits completely or
//! leaves the store untouched. The store is `Clone`; the topology keeps it
//! behind an `Arc` and clones on write, which gives readers an immutable
//! snapshot for as long as they hold it.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use topo_lite_geometry::{Envelope, GeometryType};
use tracing::debug;

use crate::error::{Error, Result};
use crate::feature::{AttributeValue, Feature, FeatureDraft, FeatureInfo};
use crate::keys::ObjectId;
use crate::spatial::GridIndex;

/// Description of an opened feature class.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureClassHandle {
    pub name: String,
    pub geometry_type: GeometryType,
    pub feature_count: usize,
    pub extent: Envelope,
}

/// Spatial and attribute constraints for a search. All set constraints must
/// hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub envelope: Option<Envelope>,
    pub subtype: Option<i32>,
    pub attribute: Option<(String, AttributeValue)>,
}

impl SearchFilter {
    /// Matches every feature.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches features whose envelope intersects `envelope`.
    pub fn intersecting(envelope: Envelope) -> Self {
        Self {
            envelope: Some(envelope),
            ..Self::default()
        }
    }

    pub fn with_subtype(mut self, subtype: i32) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn with_attribute(mut self, field: impl Into<String>, value: AttributeValue) -> Self {
        self.attribute = Some((field.into(), value));
        self
    }

    fn matches(&self, feature: &Feature) -> bool {
        if let Some(subtype) = self.subtype {
            if feature.subtype != Some(subtype) {
                return false;
            }
        }
        if let Some((field, value)) = &self.attribute {
            if feature.attribute(field) != Some(value) {
                return false;
            }
        }
        true
    }
}

/// A single edit operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    Insert {
        class: String,
        draft: FeatureDraft,
    },
    Update {
        class: String,
        object_id: ObjectId,
        draft: FeatureDraft,
    },
    Delete {
        class: String,
        object_id: ObjectId,
    },
}

impl EditOp {
    pub fn class(&self) -> &str {
        match self {
            EditOp::Insert { class, .. }
            | EditOp::Update { class, .. }
            | EditOp::Delete { class, .. } => class,
        }
    }
}

/// An ordered list of edits applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditBatch {
    pub ops: Vec<EditOp>,
}

impl EditBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, class: impl Into<String>, draft: impl Into<FeatureDraft>) -> Self {
        self.ops.push(EditOp::Insert {
            class: class.into(),
            draft: draft.into(),
        });
        self
    }

    pub fn update(
        mut self,
        class: impl Into<String>,
        object_id: ObjectId,
        draft: impl Into<FeatureDraft>,
    ) -> Self {
        self.ops.push(EditOp::Update {
            class: class.into(),
            object_id,
            draft: draft.into(),
        });
        self
    }

    pub fn delete(mut self, class: impl Into<String>, object_id: ObjectId) -> Self {
        self.ops.push(EditOp::Delete {
            class: class.into(),
            object_id,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// What a committed batch changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    pub inserted: Vec<FeatureInfo>,
    pub updated: Vec<FeatureInfo>,
    pub deleted: Vec<FeatureInfo>,
    /// Old and new extents of every touched feature.
    pub touched: Vec<Envelope>,
}

impl EditOutcome {
    /// Union of all touched extents.
    pub fn touched_extent(&self) -> Envelope {
        self.touched
            .iter()
            .fold(Envelope::empty(), |acc, e| acc.union(e))
    }
}

/// The storage collaborator contract: open a class, search it, apply edits.
pub trait FeatureStorage {
    fn open_feature_class(&self, name: &str) -> Result<FeatureClassHandle>;

    fn search<'a>(
        &'a self,
        class: &str,
        filter: &SearchFilter,
    ) -> Result<Box<dyn Iterator<Item = &'a Feature> + 'a>>;

    fn apply_edits(&mut self, batch: EditBatch) -> Result<EditOutcome>;
}

#[derive(Debug, Clone)]
struct FeatureClass {
    geometry_type: GeometryType,
    features: BTreeMap<ObjectId, Feature>,
    index: GridIndex<ObjectId>,
    next_object_id: ObjectId,
}

/// Feature classes keyed by name.
#[derive(Debug, Clone)]
pub struct GeometryStore {
    classes: FxHashMap<String, FeatureClass>,
    cell_size: f64,
    version: u64,
}

impl GeometryStore {
    /// Creates an empty store whose spatial indices use `cell_size` cells.
    pub fn new(cell_size: f64) -> Self {
        Self {
            classes: FxHashMap::default(),
            cell_size,
            version: 0,
        }
    }

    /// Number of committed edit batches and schema changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn create_feature_class(
        &mut self,
        name: impl Into<String>,
        geometry_type: GeometryType,
    ) -> Result<()> {
        let name = name.into();
        if self.classes.contains_key(&name) {
            return Err(Error::DuplicateFeatureClass(name));
        }
        self.classes.insert(
            name,
            FeatureClass {
                geometry_type,
                features: BTreeMap::new(),
                index: GridIndex::new(self.cell_size),
                next_object_id: 1,
            },
        );
        self.version += 1;
        Ok(())
    }

    /// Removes a class and returns the extent its features covered.
    pub fn drop_feature_class(&mut self, name: &str) -> Result<Envelope> {
        let class = self
            .classes
            .remove(name)
            .ok_or_else(|| Error::UnknownFeatureClass(name.to_string()))?;
        self.version += 1;
        Ok(class.index.extent())
    }

    pub fn has_feature_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Sorted names of all classes.
    pub fn feature_class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn open_feature_class(&self, name: &str) -> Result<FeatureClassHandle> {
        let class = self.class(name)?;
        Ok(FeatureClassHandle {
            name: name.to_string(),
            geometry_type: class.geometry_type,
            feature_count: class.features.len(),
            extent: class.index.extent(),
        })
    }

    pub fn get(&self, class: &str, object_id: ObjectId) -> Result<&Feature> {
        self.class(class)?
            .features
            .get(&object_id)
            .ok_or_else(|| Error::FeatureNotFound {
                class: class.to_string(),
                object_id,
            })
    }

    /// Resolves a back-reference; `None` once the feature is gone.
    pub fn resolve(&self, info: &FeatureInfo) -> Option<&Feature> {
        self.classes.get(&info.class)?.features.get(&info.object_id)
    }

    /// Features of `class` matching `filter`, ordered by object id.
    pub fn search<'a>(
        &'a self,
        class: &str,
        filter: &SearchFilter,
    ) -> Result<impl Iterator<Item = &'a Feature> + 'a> {
        let fc = self.class(class)?;
        let candidates: Vec<&'a Feature> = match &filter.envelope {
            Some(env) => fc
                .index
                .query(env)
                .into_iter()
                .filter_map(|oid| fc.features.get(&oid))
                .filter(|f| f.geometry.envelope().intersects(env))
                .collect(),
            None => fc.features.values().collect(),
        };
        let filter = filter.clone();
        Ok(candidates.into_iter().filter(move |f| filter.matches(f)))
    }

    /// Envelope of every feature in every class.
    pub fn extent(&self) -> Envelope {
        self.classes
            .values()
            .fold(Envelope::empty(), |acc, c| acc.union(&c.index.extent()))
    }

    /// Applies a batch atomically.
    ///
    /// Every operation is checked against the store (class exists, object
    /// exists, shape type matches the class, shape is valid) before anything
    /// is written. Inserted features get consecutive object ids per class.
    pub fn apply_edits(&mut self, batch: EditBatch) -> Result<EditOutcome> {
        self.check_batch(&batch)?;

        let mut outcome = EditOutcome::default();
        for op in batch.ops {
            match op {
                EditOp::Insert { class, draft } => {
                    let fc = self.class_mut(&class)?;
                    let object_id = fc.next_object_id;
                    fc.next_object_id += 1;
                    let info = FeatureInfo::new(class, object_id);
                    let env = draft.geometry.envelope();
                    fc.index.insert(object_id, env);
                    fc.features.insert(
                        object_id,
                        Feature {
                            info: info.clone(),
                            subtype: draft.subtype,
                            geometry: draft.geometry,
                            attributes: draft.attributes,
                        },
                    );
                    outcome.touched.push(env);
                    outcome.inserted.push(info);
                }
                EditOp::Update {
                    class,
                    object_id,
                    draft,
                } => {
                    let fc = self.class_mut(&class)?;
                    let env = draft.geometry.envelope();
                    if let Some(old) = fc.index.remove(object_id) {
                        outcome.touched.push(old);
                    }
                    fc.index.insert(object_id, env);
                    let info = FeatureInfo::new(class, object_id);
                    fc.features.insert(
                        object_id,
                        Feature {
                            info: info.clone(),
                            subtype: draft.subtype,
                            geometry: draft.geometry,
                            attributes: draft.attributes,
                        },
                    );
                    outcome.touched.push(env);
                    outcome.updated.push(info);
                }
                EditOp::Delete { class, object_id } => {
                    let fc = self.class_mut(&class)?;
                    if let Some(old) = fc.index.remove(object_id) {
                        outcome.touched.push(old);
                    }
                    fc.features.remove(&object_id);
                    outcome.deleted.push(FeatureInfo::new(class, object_id));
                }
            }
        }

        self.version += 1;
        debug!(
            inserted = outcome.inserted.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            version = self.version,
            "edit batch committed"
        );
        Ok(outcome)
    }

    fn check_batch(&self, batch: &EditBatch) -> Result<()> {
        // Existence as seen by later operations of the same batch.
        let mut exists: FxHashMap<(&str, ObjectId), bool> = FxHashMap::default();
        let mut next_ids: FxHashMap<&str, ObjectId> = FxHashMap::default();

        for op in &batch.ops {
            let class_name = op.class();
            let fc = self.class(class_name)?;

            match op {
                EditOp::Insert { draft, .. } => {
                    check_draft(class_name, fc.geometry_type, draft)?;
                    let next = next_ids.entry(class_name).or_insert(fc.next_object_id);
                    exists.insert((class_name, *next), true);
                    *next += 1;
                }
                EditOp::Update {
                    object_id, draft, ..
                } => {
                    if !is_alive(&exists, fc, class_name, *object_id) {
                        return Err(Error::FeatureNotFound {
                            class: class_name.to_string(),
                            object_id: *object_id,
                        });
                    }
                    check_draft(class_name, fc.geometry_type, draft)?;
                }
                EditOp::Delete { object_id, .. } => {
                    if !is_alive(&exists, fc, class_name, *object_id) {
                        return Err(Error::FeatureNotFound {
                            class: class_name.to_string(),
                            object_id: *object_id,
                        });
                    }
                    exists.insert((class_name, *object_id), false);
                }
            }
        }
        Ok(())
    }

    fn class(&self, name: &str) -> Result<&FeatureClass> {
        self.classes
            .get(name)
            .ok_or_else(|| Error::UnknownFeatureClass(name.to_string()))
    }

    fn class_mut(&mut self, name: &str) -> Result<&mut FeatureClass> {
        self.classes
            .get_mut(name)
            .ok_or_else(|| Error::UnknownFeatureClass(name.to_string()))
    }
}

fn is_alive<'a>(
    exists: &FxHashMap<(&'a str, ObjectId), bool>,
    fc: &FeatureClass,
    class: &'a str,
    object_id: ObjectId,
) -> bool {
    exists
        .get(&(class, object_id))
        .copied()
        .unwrap_or_else(|| fc.features.contains_key(&object_id))
}

fn check_draft(class: &str, expected: GeometryType, draft: &FeatureDraft) -> Result<()> {
    let actual = draft.geometry.geometry_type();
    if actual != expected {
        return Err(Error::GeometryTypeMismatch {
            class: class.to_string(),
            expected,
            actual,
        });
    }
    draft.geometry.validate()?;
    Ok(())
}

impl FeatureStorage for GeometryStore {
    fn open_feature_class(&self, name: &str) -> Result<FeatureClassHandle> {
        GeometryStore::open_feature_class(self, name)
    }

    fn search<'a>(
        &'a self,
        class: &str,
        filter: &SearchFilter,
    ) -> Result<Box<dyn Iterator<Item = &'a Feature> + 'a>> {
        Ok(Box::new(GeometryStore::search(self, class, filter)?))
    }

    fn apply_edits(&mut self, batch: EditBatch) -> Result<EditOutcome> {
        GeometryStore::apply_edits(self, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_lite_geometry::Geometry;

    fn store() -> GeometryStore {
        let mut store = GeometryStore::new(10.0);
        store
            .create_feature_class("Parcels", GeometryType::Polygon)
            .unwrap();
        store
            .create_feature_class("Hydrants", GeometryType::Point)
            .unwrap();
        store
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let mut store = store();
        let outcome = store
            .apply_edits(
                EditBatch::new()
                    .insert("Hydrants", Geometry::point(1.0, 1.0))
                    .insert("Hydrants", Geometry::point(2.0, 2.0)),
            )
            .unwrap();

        let ids: Vec<ObjectId> = outcome.inserted.iter().map(|i| i.object_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.get("Hydrants", 2).unwrap().geometry, Geometry::point(2.0, 2.0));
        assert_eq!(outcome.touched_extent(), Envelope::new(1.0, 1.0, 2.0, 2.0));
    }

    #[test]
    fn failing_batch_leaves_store_untouched() {
        let mut store = store();
        let version = store.version();
        let err = store
            .apply_edits(
                EditBatch::new()
                    .insert("Hydrants", Geometry::point(1.0, 1.0))
                    .delete("Hydrants", 99),
            )
            .unwrap_err();

        assert!(matches!(err, Error::FeatureNotFound { object_id: 99, .. }));
        assert_eq!(store.open_feature_class("Hydrants").unwrap().feature_count, 0);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn batch_sees_its_own_inserts_and_deletes() {
        let mut store = store();
        store
            .apply_edits(
                EditBatch::new()
                    .insert("Hydrants", Geometry::point(1.0, 1.0))
                    .update("Hydrants", 1, Geometry::point(3.0, 3.0)),
            )
            .unwrap();
        assert_eq!(store.get("Hydrants", 1).unwrap().geometry, Geometry::point(3.0, 3.0));

        let err = store
            .apply_edits(
                EditBatch::new()
                    .delete("Hydrants", 1)
                    .update("Hydrants", 1, Geometry::point(0.0, 0.0)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::FeatureNotFound { .. }));
        assert!(store.get("Hydrants", 1).is_ok());
    }

    #[test]
    fn wrong_geometry_type_is_rejected() {
        let mut store = store();
        let err = store
            .apply_edits(EditBatch::new().insert("Parcels", Geometry::point(0.0, 0.0)))
            .unwrap_err();
        assert!(matches!(err, Error::GeometryTypeMismatch { .. }));
    }

    #[test]
    fn unknown_class_is_an_input_error() {
        let store = store();
        assert!(matches!(
            store.open_feature_class("Roads"),
            Err(Error::UnknownFeatureClass(_))
        ));
        assert!(store.search("Roads", &SearchFilter::all()).is_err());
    }

    #[test]
    fn search_by_envelope_and_attribute() {
        let mut store = store();
        store
            .apply_edits(
                EditBatch::new()
                    .insert(
                        "Hydrants",
                        FeatureDraft::new(Geometry::point(1.0, 1.0))
                            .with_attribute("status", AttributeValue::String("ok".into())),
                    )
                    .insert(
                        "Hydrants",
                        FeatureDraft::new(Geometry::point(2.0, 2.0))
                            .with_attribute("status", AttributeValue::String("broken".into())),
                    )
                    .insert("Hydrants", Geometry::point(500.0, 500.0)),
            )
            .unwrap();

        let near: Vec<ObjectId> = store
            .search("Hydrants", &SearchFilter::intersecting(Envelope::new(0.0, 0.0, 10.0, 10.0)))
            .unwrap()
            .map(|f| f.object_id())
            .collect();
        assert_eq!(near, vec![1, 2]);

        let broken: Vec<ObjectId> = store
            .search(
                "Hydrants",
                &SearchFilter::all().with_attribute("status", AttributeValue::String("broken".into())),
            )
            .unwrap()
            .map(|f| f.object_id())
            .collect();
        assert_eq!(broken, vec![2]);
    }

    #[test]
    fn delete_reports_old_extent() {
        let mut store = store();
        store
            .apply_edits(EditBatch::new().insert("Hydrants", Geometry::point(4.0, 5.0)))
            .unwrap();
        let outcome = store
            .apply_edits(EditBatch::new().delete("Hydrants", 1))
            .unwrap();
        assert_eq!(outcome.touched, vec![Envelope::new(4.0, 5.0, 4.0, 5.0)]);
        assert!(store.resolve(&FeatureInfo::new("Hydrants", 1)).is_none());
    }

    #[test]
    fn drop_feature_class_returns_extent() {
        let mut store = store();
        store
            .apply_edits(EditBatch::new().insert("Hydrants", Geometry::point(4.0, 5.0)))
            .unwrap();
        let extent = store.drop_feature_class("Hydrants").unwrap();
        assert_eq!(extent, Envelope::new(4.0, 5.0, 4.0, 5.0));
        assert!(!store.has_feature_class("Hydrants"));
    }
}
