//! Spawning and removing the gameplay cast.

use cgmath::{InnerSpace, Rad, Vector3};
use rand::Rng;

use crate::{
    config::Config,
    context::World,
    data_structures::{entity::Entity, instance::Transform, model::MeshCollection},
    error::{ConfigError, EcsError, GameError},
    render::{self, DoNotRender},
    resources::audio::load_sound,
};

use super::{
    components::{
        Collidable, EnemyKind, EnemySettings, ExplosionSound, FiringState, GameManager,
        GameRng, GameSettings, GameplayKinds, Health, LevelGeometry, Lifetime, Physics, Player,
        PlayerSettings, Projectile, ProjectileSettings, Rotation, ShipExplosionSound, Shatters,
        ShotSound, Enemy, Velocity,
    },
    systems, ui,
};

/// Unit vector in the XZ plane with both components at least 1/10 of the
/// other before normalizing, so nothing moves parallel to a wall.
pub fn random_velocity(rng: &mut impl Rng) -> Vector3<f32> {
    let nudge = |value: f32| {
        if value <= 0.0 && value > -1.0 {
            -1.0
        } else if value >= 0.0 && value < 1.0 {
            1.0
        } else {
            value
        }
    };
    let x = nudge(rng.gen_range(-10..10) as f32);
    let z = nudge(rng.gen_range(-10..10) as f32);
    Vector3::new(x, 0.0, z).normalize()
}

fn next_velocity(world: &mut World) -> Vector3<f32> {
    let rng = world.ctx.emplace_with(GameRng::from_entropy);
    random_velocity(&mut rng.0)
}

/// `matrix` with its translation replaced by `position` and its orientation
/// turned by `angle` around Y.
pub fn placed(matrix: cgmath::Matrix4<f32>, position: Vector3<f32>, angle: f32) -> cgmath::Matrix4<f32> {
    let mut linear = matrix;
    linear.w = cgmath::Vector4::new(0.0, 0.0, 0.0, 1.0);
    cgmath::Matrix4::from_translation(position) * cgmath::Matrix4::from_angle_y(Rad(angle)) * linear
}

/// Instantiates `model` on `entity` as its `MeshCollection` and `Transform`.
pub fn attach_model(world: &mut World, entity: Entity, model: &str) -> Result<Transform, EcsError> {
    let mut meshes = MeshCollection::default();
    let mut transform = Transform::default();
    render::create_dynamic_objects(world, model, &mut meshes, &mut transform)?;
    world.registry.emplace_or_replace(entity, meshes)?;
    world.registry.emplace_or_replace(entity, transform)?;
    Ok(transform)
}

pub fn spawn_player(world: &mut World, settings: &PlayerSettings) -> Result<Entity, GameError> {
    let player = world.registry.create();
    world.registry.emplace(player, Player)?;
    world.registry.emplace(player, Collidable)?;
    world.registry.emplace(player, Health(settings.hitpoints))?;
    world.registry.emplace(
        player,
        Physics {
            thrust: settings.thrust,
            drag: settings.drag,
            max_speed: settings.max_speed,
            ..Default::default()
        },
    )?;
    world.registry.emplace(player, Rotation::default())?;
    world.registry.emplace(player, FiringState::default())?;
    attach_model(world, player, &settings.model)?;
    ui::update_ui_lives(world, settings.hitpoints);
    Ok(player)
}

/// Spawns one enemy. With `placement` the model is put there instead of at
/// its catalog position; `shatters` overrides the configured split count.
pub fn spawn_enemy(
    world: &mut World,
    settings: &EnemySettings,
    placement: Option<cgmath::Matrix4<f32>>,
    shatters: Option<i32>,
) -> Result<Entity, GameError> {
    let enemy = world.registry.create();
    world.registry.emplace(enemy, Enemy)?;
    world.registry.emplace(enemy, Collidable)?;
    world.registry.emplace(enemy, Health(settings.hitpoints))?;
    world
        .registry
        .emplace(enemy, EnemyKind(settings.section.clone()))?;
    let velocity = next_velocity(world) * settings.speed;
    world.registry.emplace(enemy, Velocity(velocity))?;
    if let Some(count) = shatters.or(settings.initial_shatter_count) {
        world.registry.emplace(enemy, Shatters(count))?;
    }
    attach_model(world, enemy, &settings.model)?;
    if let Some(matrix) = placement {
        world
            .registry
            .emplace_or_replace(enemy, Transform { matrix })?;
    }
    Ok(enemy)
}

/// Fires a projectile from `origin` along `angle`.
pub fn spawn_projectile(
    world: &mut World,
    settings: &ProjectileSettings,
    origin: Vector3<f32>,
    angle: f32,
) -> Result<Entity, GameError> {
    let projectile = world.registry.create();
    world.registry.emplace(projectile, Projectile)?;
    world.registry.emplace(projectile, Collidable)?;
    world.registry.emplace(projectile, Lifetime(settings.lifetime))?;
    let heading = Vector3::new(angle.sin(), 0.0, angle.cos());
    world
        .registry
        .emplace(projectile, Velocity(heading * settings.speed))?;
    let template = attach_model(world, projectile, &settings.model)?;
    world.registry.emplace_or_replace(
        projectile,
        Transform {
            matrix: placed(template.matrix, origin, angle),
        },
    )?;
    Ok(projectile)
}

/// The game manager, carrying the shared explosion sounds.
pub fn spawn_game_manager(world: &mut World) -> Result<Entity, GameError> {
    let manager = world.registry.create();
    world.registry.emplace(manager, GameManager)?;
    let sounds = world.ctx.get::<Config>().map(|config| {
        Ok::<_, ConfigError>((
            config.at::<String>("SFX", "explosion_sound")?,
            config.at::<String>("SFX", "ship_explosion_sound")?,
        ))
    });
    if let Some(sounds) = sounds {
        let (explosion, ship_explosion) = sounds?;
        if let Some(sound) = load_sound(world, &explosion)? {
            world.registry.emplace(manager, ExplosionSound(sound))?;
        }
        if let Some(sound) = load_sound(world, &ship_explosion)? {
            world.registry.emplace(manager, ShipExplosionSound(sound))?;
        }
    }
    Ok(manager)
}

/// Player, every configured enemy and the game manager, then the play area.
pub fn spawn_gameplay_cast(world: &mut World) -> Result<(), GameError> {
    log::info!("spawning gameplay cast");
    let Some(config) = world.ctx.get::<Config>() else {
        log::warn!("no config, gameplay cast not spawned");
        return Ok(());
    };
    let settings = GameSettings::from_config(config)?;
    let shot_sound: String = config.at("SFX", "shot_sound")?;
    world.ctx.insert(settings.clone());

    let player = spawn_player(world, &settings.player)?;
    if let Some(sound) = load_sound(world, &shot_sound)? {
        world.registry.emplace(player, ShotSound(sound))?;
    }
    for enemy in &settings.enemies {
        log::debug!("spawning {} ({})", enemy.section, enemy.model);
        spawn_enemy(world, enemy, None, None)?;
    }
    spawn_game_manager(world)?;
    systems::calculate_play_area_bounds(world);
    log::info!("gameplay cast spawned");
    Ok(())
}

/// The private mesh copies of `entity`. Level meshes are never included.
fn owned_meshes(world: &World, entity: Entity) -> Vec<Entity> {
    world
        .registry
        .try_get::<MeshCollection>(entity)
        .map(|collection| {
            collection
                .meshes
                .iter()
                .copied()
                .filter(|mesh| {
                    world.registry.has::<DoNotRender>(*mesh)
                        && !world.registry.has::<LevelGeometry>(*mesh)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Queues `entity` and its mesh copies for the end-of-frame flush.
pub fn destroy_later_with_meshes(world: &mut World, entity: Entity) {
    for mesh in owned_meshes(world, entity) {
        world.registry.destroy_later(mesh);
    }
    world.registry.destroy_later(entity);
}

/// Destroys every entity carrying any gameplay kind, mesh copies included.
pub fn destroy_gameplay_entities(world: &mut World) -> usize {
    let doomed: Vec<Entity> = world
        .registry
        .iter()
        .filter(|entity| world.registry.any_of::<GameplayKinds>(*entity))
        .collect();
    let mut destroyed = 0;
    for entity in doomed {
        for mesh in owned_meshes(world, entity) {
            world.registry.destroy(mesh);
        }
        if world.registry.destroy(entity) {
            destroyed += 1;
        }
    }
    if destroyed > 0 {
        log::debug!("{} gameplay entities destroyed", destroyed);
    }
    destroyed
}
