//! Mesh ranges, bounding boxes and the model catalog.

use std::collections::HashMap;

use cgmath::{EuclideanSpace, InnerSpace, One, Transform};
use serde::Deserialize;

use super::entity::Entity;

/// Index/vertex ranges of one mesh inside the shared level buffers.
///
/// `index_start` is unique per mesh and is used to order draws so that
/// instances of the same mesh end up next to each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct GeometryData {
    pub index_start: u32,
    pub index_count: u32,
    pub vertex_start: u32,
}

/// Oriented bounding box in model space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obb {
    pub center: cgmath::Vector3<f32>,
    pub extent: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
}

impl Obb {
    pub fn new(center: cgmath::Vector3<f32>, extent: cgmath::Vector3<f32>) -> Self {
        Self {
            center,
            extent,
            rotation: cgmath::Quaternion::one(),
        }
    }

    /// The eight corners, in model space.
    pub fn corners(&self) -> [cgmath::Vector3<f32>; 8] {
        let signs = [-1.0, 1.0];
        std::array::from_fn(|i| {
            let offset = cgmath::Vector3::new(
                self.extent.x * signs[i % 2],
                self.extent.y * signs[(i / 2) % 2],
                self.extent.z * signs[(i / 4) % 2],
            );
            self.center + self.rotation * offset
        })
    }

    /// The eight corners after applying `world`.
    pub fn world_corners(&self, world: &cgmath::Matrix4<f32>) -> [cgmath::Point3<f32>; 8] {
        self.corners()
            .map(|corner| world.transform_point(cgmath::Point3::from_vec(corner)))
    }

    /// Radius of the sphere around the box in the XZ plane, scaled by `world`.
    pub fn planar_radius(&self, world: &cgmath::Matrix4<f32>) -> f32 {
        let scale = world.x.truncate().magnitude().max(world.z.truncate().magnitude());
        cgmath::Vector2::new(self.extent.x, self.extent.z).magnitude() * scale
    }
}

impl Default for Obb {
    fn default() -> Self {
        Self::new(cgmath::Vector3::new(0.0, 0.0, 0.0), cgmath::Vector3::new(0.0, 0.0, 0.0))
    }
}

/// The renderable pieces of one logical model plus its bounding box.
///
/// Every referenced entity is expected to carry a `GpuInstance` and a
/// `GeometryData`. Entries that don't are skipped wherever the collection is
/// consumed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshCollection {
    pub meshes: Vec<Entity>,
    pub bounding_box: Obb,
}

impl MeshCollection {
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Named lookup table from model names to mesh collections.
///
/// The catalog never owns the entities it points at: clearing it leaves them
/// alive and callers destroy them separately.
#[derive(Debug, Default)]
pub struct ModelManager {
    models: HashMap<String, MeshCollection>,
}

impl ModelManager {
    /// Insert or overwrite; the last write wins.
    pub fn add_collection(&mut self, name: impl Into<String>, collection: MeshCollection) {
        self.models.insert(name.into(), collection);
    }

    /// The named collection, or an empty one if the name is unknown.
    pub fn get_collection(&self, name: &str) -> MeshCollection {
        self.models.get(name).cloned().unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn clear_models(&mut self) {
        self.models.clear();
        log::info!("ModelManager: all models cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(meshes: Vec<Entity>) -> MeshCollection {
        MeshCollection {
            meshes,
            bounding_box: Obb::new([0.0; 3].into(), [1.0; 3].into()),
        }
    }

    #[test]
    fn unknown_names_yield_an_empty_collection() {
        let catalog = ModelManager::default();
        assert!(catalog.get_collection("Rock").is_empty());
    }

    #[test]
    fn last_write_wins() {
        let mut catalog = ModelManager::default();
        let a = Entity::new(1, 0);
        let b = Entity::new(2, 0);
        catalog.add_collection("Ship", collection(vec![a]));
        catalog.add_collection("Ship", collection(vec![b]));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get_collection("Ship").meshes, vec![b]);
        catalog.clear_models();
        assert!(catalog.is_empty());
    }

    #[test]
    fn corners_span_the_extent() {
        let obb = Obb::new([1.0, 0.0, 0.0].into(), [2.0, 3.0, 4.0].into());
        let corners = obb.corners();
        let max_x = corners.iter().map(|c| c.x).fold(f32::MIN, f32::max);
        let min_z = corners.iter().map(|c| c.z).fold(f32::MAX, f32::min);
        assert_eq!(max_x, 3.0);
        assert_eq!(min_z, -4.0);
    }
}
