//! Presentation bridge and instance synchronization.
//!
//! Every frame the bridge turns entity state into one [`Frame`]: the camera
//! matrix, scene lighting, clear values and a list of [`DrawBatch`]es that
//! index into a single instance buffer. The renderer behind the [`Graphics`]
//! slot only ever sees that `Frame`.
//!
//! # Instance synchronization
//!
//! Level geometry is drawn straight from its `GpuInstance` + `GeometryData`
//! entities. Gameplay objects own a [`MeshCollection`] of private mesh copies
//! (tagged [`DoNotRender`] so they are never drawn on their own) and a
//! [`Transform`] anchor. Before collecting draws the copies are moved to
//! `anchor * offset`, where the offset is the mesh's placement relative to the
//! first mesh of the model at the time it was copied.
//!
//! Draws are sorted by `GeometryData::index_start`, so all instances of one
//! mesh are contiguous in the instance buffer and issued as one batch.

use cgmath::{EuclideanSpace, SquareMatrix};

use crate::{
    config::Config,
    context::World,
    data_structures::{
        entity::Entity,
        instance::{GpuInstance, InstanceRaw, Transform},
        level::CpuLevel,
        model::{GeometryData, MeshCollection, ModelManager},
    },
    error::{ConfigError, EcsError, RenderError},
    resources::{
        gpu::{BufferUsage, GpuAllocator, GpuBuffer},
        window::Window,
    },
};

/// Maps cgmath's OpenGL clip space (z in -1..1) onto wgpu's (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Tag: never drawn on its own.
///
/// Carried by catalog templates and by the mesh copies of gameplay objects;
/// the latter are drawn through their owner's collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct DoNotRender;

/// Placement of a mesh copy relative to its owner's [`Transform`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshOffset(pub cgmath::Matrix4<f32>);

/// World matrix of the active camera (the inverse of its view matrix).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub matrix: cgmath::Matrix4<f32>,
}

impl Camera {
    /// A camera at `eye` looking at `target`.
    pub fn looking_at(eye: cgmath::Point3<f32>, target: cgmath::Point3<f32>) -> Self {
        let view = cgmath::Matrix4::look_at_rh(eye, target, cgmath::Vector3::unit_y());
        Self {
            matrix: view.invert().unwrap_or_else(cgmath::Matrix4::identity),
        }
    }

    pub fn view(&self) -> cgmath::Matrix4<f32> {
        self.matrix.invert().unwrap_or_else(cgmath::Matrix4::identity)
    }

    pub fn position(&self) -> cgmath::Point3<f32> {
        cgmath::Point3::from_vec(self.matrix.w.truncate())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.2, 0.2, 0.25, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Static renderer settings, read once from the `Shaders` and `Renderer` sections.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererInit {
    pub vertex_shader: String,
    pub pixel_shader: String,
    pub clear: ClearValues,
    pub fov_degrees: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl RendererInit {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let clear = ClearValues {
            color: config
                .opt("Renderer", "clear_color")?
                .unwrap_or(ClearValues::default().color),
            ..Default::default()
        };
        Ok(Self {
            vertex_shader: config.at("Shaders", "vertex")?,
            pixel_shader: config.at("Shaders", "pixel")?,
            clear,
            fov_degrees: config.opt("Renderer", "fov_degrees")?.unwrap_or(75.0),
            near_plane: config.opt("Renderer", "near_plane")?.unwrap_or(0.1),
            far_plane: config.opt("Renderer", "far_plane")?.unwrap_or(100.0),
        })
    }

    pub fn projection(&self, aspect_ratio: f32) -> cgmath::Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX
            * cgmath::perspective(
                cgmath::Deg(self.fov_degrees),
                aspect_ratio,
                self.near_plane,
                self.far_plane,
            )
    }
}

/// Sun light shared by every draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    pub sun_direction: cgmath::Vector3<f32>,
    pub sun_color: [f32; 4],
    pub sun_ambient: [f32; 4],
}

impl Lighting {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let fallback = Self::default();
        let direction: Option<[f32; 3]> = config.opt("Lighting", "sun_direction")?;
        Ok(Self {
            sun_direction: direction.map(Into::into).unwrap_or(fallback.sun_direction),
            sun_color: config
                .opt("Lighting", "sun_color")?
                .unwrap_or(fallback.sun_color),
            sun_ambient: config
                .opt("Lighting", "sun_ambient")?
                .unwrap_or(fallback.sun_ambient),
        })
    }
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            sun_direction: cgmath::Vector3::new(-1.0, -1.0, 2.0),
            sun_color: [0.9, 0.9, 1.0, 1.0],
            sun_ambient: [0.25, 0.25, 0.35, 1.0],
        }
    }
}

/// Per-frame uniforms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneData {
    pub view: cgmath::Matrix4<f32>,
    pub projection: cgmath::Matrix4<f32>,
    pub camera_position: cgmath::Point3<f32>,
    pub lighting: Lighting,
}

impl SceneData {
    pub fn to_raw(&self) -> SceneDataRaw {
        use cgmath::InnerSpace;
        let sun = self.lighting.sun_direction;
        let sun = if sun.magnitude2() > 0.0 { sun.normalize() } else { sun };
        SceneDataRaw {
            view: self.view.into(),
            projection: self.projection.into(),
            camera_position: self.camera_position.to_homogeneous().into(),
            sun_direction: sun.extend(0.0).into(),
            sun_color: self.lighting.sun_color,
            sun_ambient: self.lighting.sun_ambient,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneDataRaw {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub sun_direction: [f32; 4],
    pub sun_color: [f32; 4],
    pub sun_ambient: [f32; 4],
}

/// `instance_count` instances of one mesh, starting at `first_instance` in
/// the instance buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawBatch {
    pub geometry: GeometryData,
    pub first_instance: u32,
    pub instance_count: u32,
}

/// Everything the renderer needs for one frame.
pub struct Frame<'a> {
    pub clear: ClearValues,
    pub scene: SceneData,
    pub batches: &'a [DrawBatch],
    pub level: Option<&'a LevelBuffers>,
    pub instances: Option<&'a GpuBuffer>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererEvent {
    /// The surface is about to be rebuilt; drop every buffer first.
    ReleaseResources,
}

/// Backend that draws frames. Surface, swapchain and pipelines live behind it.
pub trait Renderer: GpuAllocator {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), RenderError>;

    /// Notifications raised since the last call.
    fn poll_events(&mut self) -> Vec<RendererEvent>;

    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Context slot for the renderer.
pub struct Graphics(pub Box<dyn Renderer>);

#[derive(Debug)]
pub struct LevelBuffers {
    /// Level file the buffers were built from.
    pub source: String,
    pub vertex: GpuBuffer,
    pub index: GpuBuffer,
    pub index_count: u32,
}

#[derive(Debug)]
pub struct InstanceBuffer {
    pub buffer: GpuBuffer,
    pub capacity: usize,
}

/// Renderer-owned state of the display entity. Dropping it releases every
/// buffer the core created.
#[derive(Debug)]
pub struct RendererState {
    pub init: RendererInit,
    pub level: Option<LevelBuffers>,
    pub instances: Option<InstanceBuffer>,
    pub batches: Vec<DrawBatch>,
}

impl RendererState {
    pub fn new(init: RendererInit) -> Self {
        Self {
            init,
            level: None,
            instances: None,
            batches: Vec::new(),
        }
    }

    /// Drops every buffer, level and instances alike.
    pub fn release(&mut self) {
        self.level = None;
        self.instances = None;
        self.batches.clear();
    }
}

/// Copies the draw components of every valid source into a new entity tagged
/// [`DoNotRender`]. Sources that are stale or lack either component are skipped.
pub fn copy_renderable_entities(
    world: &mut World,
    sources: &[Entity],
) -> Result<Vec<Entity>, EcsError> {
    let registry = &mut world.registry;
    let mut copies = Vec::with_capacity(sources.len());
    for &source in sources {
        if !registry.valid(source) {
            continue;
        }
        let (Some(instance), Some(geometry)) = (
            registry.try_get::<GpuInstance>(source).copied(),
            registry.try_get::<GeometryData>(source).copied(),
        ) else {
            continue;
        };
        let copy = registry.create();
        registry.emplace(copy, DoNotRender)?;
        registry.emplace(copy, instance)?;
        registry.emplace(copy, geometry)?;
        copies.push(copy);
    }
    Ok(copies)
}

/// Instantiates the catalog model `name` into `meshes` and `transform`.
///
/// Returns how many mesh copies were created. The first copy's transform
/// becomes the anchor; every copy remembers its placement relative to it.
/// The collection's bounding box is always taken from the catalog entry.
pub fn create_dynamic_objects(
    world: &mut World,
    name: &str,
    meshes: &mut MeshCollection,
    transform: &mut Transform,
) -> Result<usize, EcsError> {
    let Some(source) = world
        .ctx
        .get::<ModelManager>()
        .map(|catalog| catalog.get_collection(name))
    else {
        log::warn!("no model catalog, cannot create {}", name);
        return Ok(0);
    };
    if source.is_empty() {
        log::warn!("model {} is not in the catalog", name);
    }

    let copies = copy_renderable_entities(world, &source.meshes)?;
    let mut anchor_inverse = None;
    for &copy in &copies {
        let Some(instance) = world.registry.try_get::<GpuInstance>(copy).copied() else {
            continue;
        };
        let inverse = *anchor_inverse.get_or_insert_with(|| {
            transform.matrix = instance.transform;
            instance
                .transform
                .invert()
                .unwrap_or_else(cgmath::Matrix4::identity)
        });
        world
            .registry
            .emplace(copy, MeshOffset(inverse * instance.transform))?;
    }
    meshes.meshes.extend_from_slice(&copies);
    meshes.bounding_box = source.bounding_box;
    Ok(copies.len())
}

/// Moves the mesh copies of every anchored object to `anchor * offset`.
pub fn sync_dynamic_instances(world: &mut World) {
    let owners = world
        .registry
        .view::<(Transform, MeshCollection)>()
        .without::<(DoNotRender,)>()
        .entities();
    for owner in owners {
        let (Some(anchor), Some(collection)) = (
            world.registry.try_get::<Transform>(owner).copied(),
            world.registry.try_get::<MeshCollection>(owner).cloned(),
        ) else {
            continue;
        };
        for mesh in collection.meshes {
            if !world.registry.has::<DoNotRender>(mesh) {
                continue;
            }
            let offset = world
                .registry
                .try_get::<MeshOffset>(mesh)
                .map(|offset| offset.0)
                .unwrap_or_else(cgmath::Matrix4::identity);
            if let Some(instance) = world.registry.try_get_mut::<GpuInstance>(mesh) {
                instance.transform = anchor.matrix * offset;
            }
        }
    }
}

/// Gathers every drawable instance, sorted and batched by geometry.
pub fn collect_draws(world: &World) -> (Vec<DrawBatch>, Vec<InstanceRaw>) {
    let registry = &world.registry;
    let mut draws: Vec<(GeometryData, InstanceRaw)> = Vec::new();

    let direct = registry
        .view::<(GpuInstance, GeometryData)>()
        .without::<(DoNotRender,)>();
    for entity in direct.iter() {
        if let (Some(instance), Some(geometry)) = (
            registry.try_get::<GpuInstance>(entity),
            registry.try_get::<GeometryData>(entity),
        ) {
            draws.push((*geometry, instance.to_raw()));
        }
    }

    let owners = registry
        .view::<(Transform, MeshCollection)>()
        .without::<(DoNotRender,)>();
    for owner in owners.iter() {
        let Some(collection) = registry.try_get::<MeshCollection>(owner) else {
            continue;
        };
        for &mesh in &collection.meshes {
            // Meshes without the tag are drawn directly above.
            if !registry.valid(mesh) || !registry.has::<DoNotRender>(mesh) {
                continue;
            }
            if let (Some(instance), Some(geometry)) = (
                registry.try_get::<GpuInstance>(mesh),
                registry.try_get::<GeometryData>(mesh),
            ) {
                draws.push((*geometry, instance.to_raw()));
            }
        }
    }

    draws.sort_by_key(|(geometry, _)| geometry.index_start);

    let mut batches: Vec<DrawBatch> = Vec::new();
    let mut instances = Vec::with_capacity(draws.len());
    for (index, (geometry, raw)) in draws.into_iter().enumerate() {
        match batches.last_mut() {
            Some(batch) if batch.geometry == geometry => batch.instance_count += 1,
            _ => batches.push(DrawBatch {
                geometry,
                first_instance: index as u32,
                instance_count: 1,
            }),
        }
        instances.push(raw);
    }
    (batches, instances)
}

/// Streams `instances` into the state's instance buffer. The buffer is reused
/// while it is large enough; otherwise the old one is dropped before the
/// replacement is created.
pub fn upload_instances<A: GpuAllocator + ?Sized>(
    allocator: &mut A,
    state: &mut RendererState,
    instances: &[InstanceRaw],
) -> Result<(), RenderError> {
    if instances.is_empty() {
        return Ok(());
    }
    if let Some(current) = &state.instances {
        if current.capacity >= instances.len() {
            return current.buffer.write(0, bytemuck::cast_slice(instances));
        }
    }
    state.instances = None;

    let capacity = instances.len().next_power_of_two();
    let mut contents = instances.to_vec();
    contents.resize(capacity, bytemuck::Zeroable::zeroed());
    let buffer = allocator.create_buffer(
        "instance buffer",
        BufferUsage::Instance,
        bytemuck::cast_slice(&contents),
    )?;
    log::debug!("instance buffer grown to {} records", capacity);
    state.instances = Some(InstanceBuffer { buffer, capacity });
    Ok(())
}

/// Creates vertex and index buffers for `level`, replacing the old ones.
pub fn upload_level<A: GpuAllocator + ?Sized>(
    allocator: &mut A,
    state: &mut RendererState,
    level: &CpuLevel,
) -> Result<(), RenderError> {
    state.level = None;
    let data = &level.level_data;
    let vertex = allocator.create_buffer(
        &format!("{} vertices", level.level_file_path),
        BufferUsage::Vertex,
        bytemuck::cast_slice(&data.vertices),
    )?;
    let index = allocator.create_buffer(
        &format!("{} indices", level.level_file_path),
        BufferUsage::Index,
        bytemuck::cast_slice(&data.indices),
    )?;
    state.level = Some(LevelBuffers {
        source: level.level_file_path.clone(),
        vertex,
        index,
        index_count: data.indices.len() as u32,
    });
    Ok(())
}

/// Drops every renderer-owned buffer of every display.
pub fn release_resources(world: &mut World) {
    for entity in world.registry.view::<(RendererState,)>().entities() {
        if let Some(state) = world.registry.try_get_mut::<RendererState>(entity) {
            state.release();
        }
        log::info!("renderer resources released for {:?}", entity);
    }
}

/// Handles renderer notifications. After a release the level is scheduled for
/// re-upload through the renderer patch.
pub fn process_renderer_events(world: &mut World) {
    let Some(graphics) = world.ctx.get_mut::<Graphics>() else {
        return;
    };
    let events = graphics.0.poll_events();
    for event in events {
        match event {
            RendererEvent::ReleaseResources => {
                release_resources(world);
                if let Some(display) = world.display() {
                    world.registry.patch::<RendererState>(display);
                }
            }
        }
    }
}

/// The current lighting and camera as uniforms. `None` without a display.
pub fn scene_data(world: &World) -> Option<SceneData> {
    let display = world.display()?;
    let state = world.registry.try_get::<RendererState>(display)?;
    let camera = world
        .registry
        .try_get::<Camera>(display)
        .copied()
        .unwrap_or(Camera {
            matrix: cgmath::Matrix4::identity(),
        });
    let aspect = world
        .registry
        .try_get::<Window>(display)
        .map(Window::aspect_ratio)
        .unwrap_or(1.0);
    Some(SceneData {
        view: camera.view(),
        projection: state.init.projection(aspect),
        camera_position: camera.position(),
        lighting: world.ctx.get::<Lighting>().copied().unwrap_or_default(),
    })
}

/// Syncs instances and hands one frame to the renderer. A missing display,
/// renderer state or renderer skips the frame.
pub fn present(world: &mut World) -> Result<(), RenderError> {
    let Some(display) = world.display() else {
        return Ok(());
    };
    if !world.ctx.contains::<Graphics>() || !world.registry.has::<RendererState>(display) {
        return Ok(());
    }

    sync_dynamic_instances(world);
    let (batches, instances) = collect_draws(world);
    let Some(scene) = scene_data(world) else {
        return Ok(());
    };

    let (Some(graphics), Some(state)) = (
        world.ctx.get_mut::<Graphics>(),
        world.registry.try_get_mut::<RendererState>(display),
    ) else {
        return Ok(());
    };
    upload_instances(graphics.0.as_mut(), state, &instances)?;
    state.batches = batches;

    let frame = Frame {
        clear: state.init.clear,
        scene,
        batches: &state.batches,
        level: state.level.as_ref(),
        instances: state.instances.as_ref().map(|instances| &instances.buffer),
    };
    graphics.0.present(&frame)
}
