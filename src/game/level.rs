//! Loading and unloading levels on the display entity.
//!
//! Loading parses the level on the CPU, spawns one entity per mesh (tagged
//! [`LevelGeometry`]) and registers every object in the [`ModelManager`]. The
//! GPU copy is only requested: `GpuLevel` is set and the renderer state is
//! patched, and the buffers are built when that patch is processed.

use crate::{
    config::Config,
    context::World,
    data_structures::{
        entity::Entity,
        instance::{GpuInstance, Transform},
        level::{CpuLevel, GpuLevel, LevelData, Levels, ObjectKind, YamlLevelLoader},
        model::{GeometryData, MeshCollection, ModelManager},
    },
    error::{EcsError, GameError},
    render::{self, DoNotRender, Graphics, RendererState},
};

use super::components::{LevelGeometry, Obstacle};

/// Loads the level named by `section` (`level_file`, `model_path`) onto the
/// display. Without a display nothing happens.
pub fn load_level(world: &mut World, section: &str) -> Result<(), GameError> {
    log::info!("loading level {}", section);
    let Some(display) = world.display() else {
        log::warn!("no display, level {} not loaded", section);
        return Ok(());
    };
    let Some(config) = world.ctx.get::<Config>() else {
        log::warn!("no config, level {} not loaded", section);
        return Ok(());
    };
    let level_file: String = config.at(section, "level_file")?;
    let model_path: String = config.at(section, "model_path")?;

    let level_data = match world.ctx.get::<Levels>() {
        Some(levels) => levels.0.load(&level_file, &model_path)?,
        None => world
            .ctx
            .emplace(Levels(Box::new(YamlLevelLoader)))
            .0
            .load(&level_file, &model_path)?,
    };

    unload_level(world);
    spawn_level_entities(world, &level_data)?;
    world.registry.emplace_or_replace(
        display,
        CpuLevel {
            level_file_path: level_file,
            level_model_path: model_path,
            level_data,
        },
    )?;
    world.registry.emplace_or_replace(display, GpuLevel)?;
    world.registry.patch::<RendererState>(display);
    log::info!("level {} loaded", section);
    Ok(())
}

/// Removes the CPU level. The GPU marker goes with it, it is never left
/// standing on its own.
pub fn remove_cpu_level(world: &mut World, display: Entity) {
    world.registry.remove::<GpuLevel>(display);
    world.registry.remove::<CpuLevel>(display);
}

/// Drops both level halves, the level entities and the catalog, and asks the
/// renderer to release the level buffers.
pub fn unload_level(world: &mut World) {
    if let Some(display) = world.display() {
        remove_cpu_level(world, display);
        world.registry.patch::<RendererState>(display);
    }
    for entity in world.registry.view::<(LevelGeometry,)>().entities() {
        world.registry.destroy(entity);
    }
    if let Some(catalog) = world.ctx.get_mut::<ModelManager>() {
        catalog.clear_models();
    }
}

/// One entity per mesh; objects are registered under their name.
pub fn spawn_level_entities(world: &mut World, level: &LevelData) -> Result<usize, EcsError> {
    let mut spawned = 0;
    for object in &level.objects {
        let placement = object.placement.to_matrix();
        let mut collection = MeshCollection {
            meshes: Vec::with_capacity(object.meshes.len()),
            bounding_box: object.bounds.into(),
        };
        for mesh in &object.meshes {
            let entity = world.registry.create();
            world
                .registry
                .emplace(entity, GpuInstance::new(placement, mesh.material))?;
            world.registry.emplace::<GeometryData>(entity, mesh.geometry)?;
            world.registry.emplace(entity, LevelGeometry)?;
            if object.kind == ObjectKind::Template {
                world.registry.emplace(entity, DoNotRender)?;
            }
            collection.meshes.push(entity);
            spawned += 1;
        }
        if object.kind == ObjectKind::Obstacle {
            let owner = world.registry.create();
            world.registry.emplace(owner, Obstacle)?;
            world.registry.emplace(owner, LevelGeometry)?;
            world.registry.emplace(owner, Transform { matrix: placement })?;
            world.registry.emplace(owner, collection.clone())?;
        }
        world
            .ctx
            .emplace(ModelManager::default())
            .add_collection(object.name.clone(), collection);
    }
    log::debug!("{} level meshes spawned", spawned);
    Ok(spawned)
}

/// Brings the renderer's level buffers in line with the display's level.
///
/// Runs when the renderer state patch is processed: with both level halves
/// present the buffers are (re)built unless they already match, otherwise
/// they are dropped.
pub fn sync_renderer_level(world: &mut World) -> Result<(), GameError> {
    let Some(display) = world.display() else {
        return Ok(());
    };
    if world.registry.has::<GpuLevel>(display) && !world.registry.has::<CpuLevel>(display) {
        world.registry.remove::<GpuLevel>(display);
    }
    let level = world
        .registry
        .try_get::<CpuLevel>(display)
        .filter(|_| world.registry.has::<GpuLevel>(display))
        .cloned();
    let (Some(state), Some(graphics)) = (
        world.registry.try_get_mut::<RendererState>(display),
        world.ctx.get_mut::<Graphics>(),
    ) else {
        return Ok(());
    };
    let Some(level) = level else {
        state.level = None;
        return Ok(());
    };
    let current = state
        .level
        .as_ref()
        .is_some_and(|buffers| buffers.source == level.level_file_path);
    if current {
        return Ok(());
    }
    render::upload_level(graphics.0.as_mut(), state, &level)?;
    log::info!("level buffers uploaded for {}", level.level_file_path);
    Ok(())
}
