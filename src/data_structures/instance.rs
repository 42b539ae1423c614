//! Per-draw instance records for GPU rendering.
//!
//! A [`GpuInstance`] is the CPU-side record of one instanced draw: a world
//! transform plus the material attributes of the mesh. The render bridge packs
//! them into [`InstanceRaw`] values and streams those into a single instance
//! buffer that vertex shaders step through once per instance.

use cgmath::SquareMatrix;
use serde::Deserialize;

/// Surface attributes of one mesh as exported by the level tool.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
#[serde(default)]
pub struct MaterialAttributes {
    pub diffuse: [f32; 3],
    pub dissolve: f32,
    pub specular: [f32; 3],
    pub specular_exponent: f32,
    pub ambient: [f32; 3],
    pub sharpness: f32,
    pub transmission_filter: [f32; 3],
    pub optical_density: f32,
    pub emissive: [f32; 3],
    pub illumination: u32,
}

impl Default for MaterialAttributes {
    fn default() -> Self {
        Self {
            diffuse: [0.8, 0.8, 0.8],
            dissolve: 1.0,
            specular: [0.5, 0.5, 0.5],
            specular_exponent: 32.0,
            ambient: [0.0; 3],
            sharpness: 60.0,
            transmission_filter: [1.0; 3],
            optical_density: 1.0,
            emissive: [0.0; 3],
            illumination: 2,
        }
    }
}

/// World transform of a gameplay object.
///
/// For multi-mesh objects this is the anchor every piece is drawn with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub matrix: cgmath::Matrix4<f32>,
}

impl Transform {
    pub fn from_position(position: cgmath::Vector3<f32>) -> Self {
        Self {
            matrix: cgmath::Matrix4::from_translation(position),
        }
    }

    pub fn position(&self) -> cgmath::Vector3<f32> {
        self.matrix.w.truncate()
    }

    pub fn set_position(&mut self, position: cgmath::Vector3<f32>) {
        self.matrix.w = position.extend(1.0);
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: cgmath::Matrix4::identity(),
        }
    }
}

/// One instanced draw record: transform + material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpuInstance {
    pub transform: cgmath::Matrix4<f32>,
    pub material: MaterialAttributes,
}

impl GpuInstance {
    pub fn new(transform: cgmath::Matrix4<f32>, material: MaterialAttributes) -> Self {
        Self {
            transform,
            material,
        }
    }

    pub fn to_raw(&self) -> InstanceRaw {
        InstanceRaw {
            model: self.transform.into(),
            material: self.material,
        }
    }
}

impl Default for GpuInstance {
    fn default() -> Self {
        Self {
            transform: cgmath::Matrix4::identity(),
            material: MaterialAttributes::default(),
        }
    }
}

/**
 * The raw instance is the actual data stored on the GPU
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    pub material: MaterialAttributes,
}

impl InstanceRaw {
    /**
     * Stride layout: the model matrix as four vec4s followed by the material
     * packed as four vec4s, a vec3 for the emissive colour and the illumination
     * model as an u32.
     */
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        const F32: u64 = mem::size_of::<f32>() as wgpu::BufferAddress;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // The shader only advances to the next record when it starts a new instance
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: 4 * F32,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: 8 * F32,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: 12 * F32,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // diffuse + dissolve
                wgpu::VertexAttribute {
                    offset: 16 * F32,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // specular + exponent
                wgpu::VertexAttribute {
                    offset: 20 * F32,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // ambient + sharpness
                wgpu::VertexAttribute {
                    offset: 24 * F32,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // transmission filter + optical density
                wgpu::VertexAttribute {
                    offset: 28 * F32,
                    shader_location: 12,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: 32 * F32,
                    shader_location: 13,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 35 * F32,
                    shader_location: 14,
                    format: wgpu::VertexFormat::Uint32,
                },
            ],
        }
    }
}
