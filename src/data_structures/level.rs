//! CPU/GPU level split.
//!
//! [`CpuLevel`] holds the parsed level; [`GpuLevel`] is a marker saying the
//! renderer-side copy is current. A `GpuLevel` is only valid while a
//! `CpuLevel` sits on the same entity, see `game::level` for the functions
//! that keep the two in step.

use std::{fs, path::Path};

use cgmath::One;
use serde::Deserialize;

use crate::{
    data_structures::{
        instance::MaterialAttributes,
        model::{GeometryData, Obb},
    },
    error::LevelError,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
#[serde(default)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uvw: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Local transform of a level object: translation, rotation and scale.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Placement {
    pub position: [f32; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Placement {
    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        let [x, y, z, w] = self.rotation;
        let rotation = cgmath::Quaternion::new(w, x, y, z);
        cgmath::Matrix4::from_translation(self.position.into())
            * cgmath::Matrix4::from(rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale[0], self.scale[1], self.scale[2])
    }
}

impl Default for Placement {
    fn default() -> Self {
        let identity = cgmath::Quaternion::<f32>::one();
        Self {
            position: [0.0; 3],
            rotation: [identity.v.x, identity.v.y, identity.v.z, identity.s],
            scale: [1.0; 3],
        }
    }
}

/// How a level object enters the world once the level is on the GPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Drawn where it stands.
    #[default]
    Static,
    /// Only registered in the model catalog; gameplay instantiates copies.
    Template,
    /// Drawn and used to derive the play area bounds.
    Obstacle,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LevelMesh {
    pub geometry: GeometryData,
    pub material: MaterialAttributes,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoxData {
    pub center: [f32; 3],
    pub extent: [f32; 3],
}

impl From<BoxData> for Obb {
    fn from(data: BoxData) -> Self {
        Obb::new(data.center.into(), data.extent.into())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LevelObject {
    pub name: String,
    #[serde(default)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub bounds: BoxData,
    pub meshes: Vec<LevelMesh>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LevelData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub objects: Vec<LevelObject>,
}

impl LevelData {
    /// Checks that every mesh range points inside the index and vertex arrays.
    pub fn validate(&self) -> Result<(), LevelError> {
        for object in &self.objects {
            for mesh in &object.meshes {
                let geometry = mesh.geometry;
                let end = geometry.index_start as usize + geometry.index_count as usize;
                if end > self.indices.len() {
                    return Err(LevelError::Geometry(format!(
                        "{}: index range {}..{} exceeds {} indices",
                        object.name,
                        geometry.index_start,
                        end,
                        self.indices.len()
                    )));
                }
                if !self.vertices.is_empty() && geometry.vertex_start as usize >= self.vertices.len()
                {
                    return Err(LevelError::Geometry(format!(
                        "{}: vertex start {} exceeds {} vertices",
                        object.name,
                        geometry.vertex_start,
                        self.vertices.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parsed level data plus where it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct CpuLevel {
    pub level_file_path: String,
    pub level_model_path: String,
    pub level_data: LevelData,
}

/// Marker: the renderer holds buffers for the entity's current `CpuLevel`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GpuLevel;

/// Capability that turns level files into [`LevelData`].
pub trait LevelLoader {
    fn load(&self, level_file: &str, model_path: &str) -> Result<LevelData, LevelError>;
}

/// Context slot for the active level loader.
pub struct Levels(pub Box<dyn LevelLoader>);

/// Reads levels stored as YAML documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlLevelLoader;

impl YamlLevelLoader {
    pub fn parse(text: &str) -> Result<LevelData, LevelError> {
        let data: LevelData = serde_yaml::from_str(text)?;
        data.validate()?;
        Ok(data)
    }
}

impl LevelLoader for YamlLevelLoader {
    fn load(&self, level_file: &str, model_path: &str) -> Result<LevelData, LevelError> {
        let text = fs::read_to_string(Path::new(level_file)).map_err(|source| LevelError::Io {
            path: level_file.to_string(),
            source,
        })?;
        log::debug!("parsing level {} (models in {})", level_file, model_path);
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL: &str = r#"
indices: [0, 1, 2, 0, 2, 3]
vertices:
  - position: [0, 0, 0]
  - position: [1, 0, 0]
  - position: [1, 0, 1]
  - position: [0, 0, 1]
objects:
  - name: Wall
    kind: obstacle
    placement: { position: [10, 0, 0] }
    bounds: { center: [0, 0, 0], extent: [1, 1, 1] }
    meshes:
      - geometry: { index_start: 0, index_count: 6, vertex_start: 0 }
"#;

    #[test]
    fn parses_objects_with_defaults() {
        let data = YamlLevelLoader::parse(LEVEL).unwrap();
        assert_eq!(data.objects.len(), 1);
        let wall = &data.objects[0];
        assert_eq!(wall.kind, ObjectKind::Obstacle);
        assert_eq!(wall.placement.scale, [1.0; 3]);
        assert_eq!(wall.meshes[0].material, MaterialAttributes::default());
        assert_eq!(wall.placement.to_matrix().w.x, 10.0);
    }

    #[test]
    fn rejects_out_of_range_geometry() {
        let broken = LEVEL.replace("index_count: 6", "index_count: 7");
        assert!(matches!(
            YamlLevelLoader::parse(&broken),
            Err(LevelError::Geometry(_))
        ));
    }
}
