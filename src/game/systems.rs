//! Per-frame systems.
//!
//! The camera, pause and bounds systems run from the state machine. The rest
//! run when the game manager's patch is processed, in this order: player
//! control, firing, movement, invulnerability, collisions, destruction and the
//! game over check. Destruction is deferred: entities are queued and flushed
//! at the end of the frame, never in the middle of a view.

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3};

use crate::{
    context::World,
    data_structures::{entity::Entity, instance::Transform, model::MeshCollection},
    error::GameError,
    render::Camera,
    resources::input::{Input, InputEvent, KeyCode},
};

use super::{
    cast,
    components::{
        Bounds, Collidable, DeltaTime, Enemy, EnemyKind, ExplosionSound, FiringState, GameManager,
        GameOver, GameSettings, GameState, Health, Invulnerable, Lifetime, Obstacle, Paused,
        Physics, Player, Projectile, Rotation, Shatters, ShipExplosionSound, ShotSound, ToDestroy,
        Velocity,
    },
    ui,
};

/// Camera position relative to the player.
pub const CAMERA_OFFSET: Vector3<f32> = Vector3::new(0.0, 45.0, -5.0);
/// Shrinks the obstacle rectangle on every side.
pub const PLAY_AREA_MARGIN: f32 = 13.5;
pub const PAUSE_KEY: KeyCode = KeyCode::KeyP;
pub const FIRE_KEY: KeyCode = KeyCode::Space;
/// Scale applied to each piece of a shattered enemy.
pub const SHATTER_SCALE: f32 = 0.5;

fn any_down(world: &World, keys: &[KeyCode]) -> bool {
    world
        .ctx
        .get::<Input>()
        .is_some_and(|input| keys.iter().any(|key| input.is_down(*key)))
}

fn game_manager(world: &World) -> Option<Entity> {
    world.registry.view::<(GameManager,)>().front()
}

/// Points the display camera at the first player.
pub fn update_camera(world: &mut World) {
    let players = world.registry.view::<(Player, Transform)>().entities();
    let Some(&player) = players.first() else {
        return;
    };
    if players.len() > 1 {
        log::debug!("{} players found, following {:?}", players.len(), player);
    }
    let Some(position) = world
        .registry
        .try_get::<Transform>(player)
        .map(Transform::position)
    else {
        return;
    };
    let Some(display) = world.display() else {
        return;
    };
    if let Some(camera) = world.registry.try_get_mut::<Camera>(display) {
        let target = Point3::from_vec(position);
        *camera = Camera::looking_at(target + CAMERA_OFFSET, target);
    }
}

/// Derives the play area from every obstacle's world-space bounding box,
/// shrunk by [`PLAY_AREA_MARGIN`]. Without obstacles the result is inverted.
pub fn calculate_play_area_bounds(world: &mut World) -> Bounds {
    let mut min_x = f32::MAX;
    let mut max_x = -f32::MAX;
    let mut min_z = f32::MAX;
    let mut max_z = -f32::MAX;

    let obstacles = world
        .registry
        .view::<(Obstacle, Transform, MeshCollection)>();
    for entity in obstacles.iter() {
        let (Some(transform), Some(meshes)) = (
            world.registry.try_get::<Transform>(entity),
            world.registry.try_get::<MeshCollection>(entity),
        ) else {
            continue;
        };
        for corner in meshes.bounding_box.world_corners(&transform.matrix) {
            min_x = min_x.min(corner.x);
            max_x = max_x.max(corner.x);
            min_z = min_z.min(corner.z);
            max_z = max_z.max(corner.z);
        }
    }

    let bounds = Bounds {
        min_x: min_x + PLAY_AREA_MARGIN,
        max_x: max_x - PLAY_AREA_MARGIN,
        min_z: min_z + PLAY_AREA_MARGIN,
        max_z: max_z - PLAY_AREA_MARGIN,
    };
    if !bounds.is_defined() {
        log::debug!("no obstacles, play area undefined");
    }
    *world.ctx.insert(bounds)
}

/// Drains the buffered input and flips `Paused` on the game manager once per
/// pause key press. Only the state after the whole batch is observable.
pub fn check_pause_pressed(world: &mut World) {
    let Some(input) = world.ctx.get_mut::<Input>() else {
        return;
    };
    let presses = input
        .drain()
        .into_iter()
        .filter(|event| *event == InputEvent::KeyPressed(PAUSE_KEY))
        .count();
    if presses % 2 == 0 {
        return;
    }
    let Some(manager) = game_manager(world) else {
        log::debug!("no game manager, pause ignored");
        return;
    };
    if world.registry.remove::<Paused>(manager) {
        log::info!("game unpaused");
    } else if world.registry.emplace(manager, Paused).is_ok() {
        log::info!("game paused");
    }
}

/// Everything the game manager's tick drives.
pub fn run_gameplay(world: &mut World) -> Result<(), GameError> {
    let dt = world.ctx.get::<DeltaTime>().copied().unwrap_or_default().0;
    update_player(world, dt);
    fire_projectiles(world, dt)?;
    move_objects(world, dt);
    update_invulnerability(world, dt);
    detect_collisions(world);
    destroy_marked(world)?;
    check_game_over(world);
    Ok(())
}

/// Thrust and turn from the held keys, then drag, speed limit and the play
/// area clamp.
pub fn update_player(world: &mut World, dt: f32) {
    let thrusting = any_down(world, &[KeyCode::KeyW, KeyCode::ArrowUp]);
    let left = any_down(world, &[KeyCode::KeyA, KeyCode::ArrowLeft]);
    let right = any_down(world, &[KeyCode::KeyD, KeyCode::ArrowRight]);
    let turn = match (left, right) {
        (true, false) => -1.0,
        (false, true) => 1.0,
        _ => 0.0,
    };
    let turn_speed = world
        .ctx
        .get::<GameSettings>()
        .map_or(180.0, |settings| settings.player.turn_speed)
        .to_radians();
    let bounds = world.ctx.get::<Bounds>().copied().unwrap_or_default();

    for player in world
        .registry
        .view::<(Player, Transform, Physics)>()
        .entities()
    {
        let turned = turn * turn_speed * dt;
        let angle = match world.registry.try_get_mut::<Rotation>(player) {
            Some(rotation) => {
                rotation.angular_velocity = turn * turn_speed;
                rotation.angle += turned;
                rotation.angle
            }
            None => 0.0,
        };
        let heading = Vector3::new(angle.sin(), 0.0, angle.cos());

        let Some(physics) = world.registry.try_get_mut::<Physics>(player) else {
            continue;
        };
        if thrusting {
            physics.velocity += heading * physics.thrust * dt;
        }
        // Drag is tuned per 60Hz frame.
        physics.velocity *= physics.drag.powf(dt * 60.0);
        if physics.velocity.magnitude() > physics.max_speed {
            physics.velocity = physics.velocity.normalize() * physics.max_speed;
        }
        let velocity = physics.velocity;

        let Some(transform) = world.registry.try_get_mut::<Transform>(player) else {
            continue;
        };
        let mut position = transform.position() + velocity * dt;
        if bounds.is_defined() {
            position.x = position.x.clamp(bounds.min_x, bounds.max_x);
            position.z = position.z.clamp(bounds.min_z, bounds.max_z);
        }
        transform.matrix = cast::placed(transform.matrix, position, turned);
    }
}

/// Space fires along the player's heading once the cooldown has run out.
pub fn fire_projectiles(world: &mut World, dt: f32) -> Result<(), GameError> {
    let trigger = any_down(world, &[FIRE_KEY]);
    let Some(settings) = world.ctx.get::<GameSettings>().cloned() else {
        return Ok(());
    };
    for player in world
        .registry
        .view::<(Player, Transform, FiringState)>()
        .entities()
    {
        let Some(state) = world.registry.try_get_mut::<FiringState>(player) else {
            continue;
        };
        state.cooldown = (state.cooldown - dt).max(0.0);
        if !trigger || state.cooldown > 0.0 {
            continue;
        }
        state.cooldown = settings.player.fire_cooldown;

        let angle = world
            .registry
            .try_get::<Rotation>(player)
            .map_or(0.0, |rotation| rotation.angle);
        let origin = world
            .registry
            .try_get::<Transform>(player)
            .map(Transform::position)
            .unwrap_or_else(|| Vector3::new(0.0, 0.0, 0.0));
        cast::spawn_projectile(world, &settings.projectile, origin, angle)?;
        if let Some(sound) = world.registry.try_get_mut::<ShotSound>(player) {
            sound.0.play();
        }
    }
    Ok(())
}

/// Integrates velocities. Enemies bounce off the play area; projectiles run
/// out of time or leave it.
pub fn move_objects(world: &mut World, dt: f32) {
    let bounds = world.ctx.get::<Bounds>().copied().unwrap_or_default();
    let movers = world
        .registry
        .view::<(Transform, Velocity)>()
        .without::<(Player,)>()
        .entities();
    for entity in movers {
        let is_enemy = world.registry.has::<Enemy>(entity);
        let Some(mut velocity) = world.registry.try_get::<Velocity>(entity).map(|v| v.0) else {
            continue;
        };
        let Some(transform) = world.registry.try_get_mut::<Transform>(entity) else {
            continue;
        };
        let mut position = transform.position() + velocity * dt;
        if is_enemy && bounds.is_defined() {
            if position.x < bounds.min_x {
                position.x = bounds.min_x;
                velocity.x = velocity.x.abs();
            } else if position.x > bounds.max_x {
                position.x = bounds.max_x;
                velocity.x = -velocity.x.abs();
            }
            if position.z < bounds.min_z {
                position.z = bounds.min_z;
                velocity.z = velocity.z.abs();
            } else if position.z > bounds.max_z {
                position.z = bounds.max_z;
                velocity.z = -velocity.z.abs();
            }
        }
        transform.set_position(position);
        if let Some(stored) = world.registry.try_get_mut::<Velocity>(entity) {
            stored.0 = velocity;
        }
    }

    for projectile in world
        .registry
        .view::<(Projectile, Lifetime)>()
        .without::<(ToDestroy,)>()
        .entities()
    {
        let expired = match world.registry.try_get_mut::<Lifetime>(projectile) {
            Some(lifetime) => {
                lifetime.0 -= dt;
                lifetime.0 <= 0.0
            }
            None => false,
        };
        let outside = bounds.is_defined()
            && world
                .registry
                .try_get::<Transform>(projectile)
                .map(Transform::position)
                .is_some_and(|position| !bounds.contains(position.x, position.z));
        if expired || outside {
            let _ = world.registry.emplace_or_replace(projectile, ToDestroy);
        }
    }
}

pub fn update_invulnerability(world: &mut World, dt: f32) {
    for entity in world.registry.view::<(Invulnerable,)>().entities() {
        let expired = match world.registry.try_get_mut::<Invulnerable>(entity) {
            Some(invulnerable) => {
                invulnerable.remaining -= dt;
                invulnerable.remaining <= 0.0
            }
            None => false,
        };
        if expired {
            world.registry.remove::<Invulnerable>(entity);
        }
    }
}

/// Position and planar radius of a collidable object.
fn body(world: &World, entity: Entity) -> Option<(Vector3<f32>, f32)> {
    let transform = world.registry.try_get::<Transform>(entity)?;
    let meshes = world.registry.try_get::<MeshCollection>(entity)?;
    Some((
        transform.position(),
        meshes.bounding_box.planar_radius(&transform.matrix),
    ))
}

fn overlaps(a: (Vector3<f32>, f32), b: (Vector3<f32>, f32)) -> bool {
    let delta = a.0 - b.0;
    cgmath::Vector2::new(delta.x, delta.z).magnitude() < a.1 + b.1
}

fn play_manager_sound<S: 'static>(world: &mut World, play: impl FnOnce(&mut S)) {
    if let Some(manager) = game_manager(world) {
        if let Some(sound) = world.registry.try_get_mut::<S>(manager) {
            play(sound);
        }
    }
}

/// One hit on an enemy: loses a hitpoint and, at zero, is marked for
/// destruction and scores.
fn damage_enemy(world: &mut World, enemy: Entity) {
    let destroyed = match world.registry.try_get_mut::<Health>(enemy) {
        Some(health) => {
            health.0 -= 1;
            health.0 <= 0
        }
        None => true,
    };
    if destroyed {
        let _ = world.registry.emplace_or_replace(enemy, ToDestroy);
        let points = world
            .ctx
            .get::<GameSettings>()
            .map_or(0, |settings| settings.score_per_hit);
        ui::add_ui_score(world, points);
        play_manager_sound::<ExplosionSound>(world, |sound| sound.0.play());
    }
}

/// Projectile against enemy, then player against enemy.
pub fn detect_collisions(world: &mut World) {
    let enemies = world
        .registry
        .view::<(Enemy, Collidable)>()
        .without::<(ToDestroy,)>()
        .entities();
    let projectiles = world
        .registry
        .view::<(Projectile, Collidable)>()
        .without::<(ToDestroy,)>()
        .entities();

    for projectile in projectiles {
        let Some(shot) = body(world, projectile) else {
            continue;
        };
        let hit = enemies.iter().copied().find(|enemy| {
            !world.registry.has::<ToDestroy>(*enemy)
                && body(world, *enemy).is_some_and(|target| overlaps(shot, target))
        });
        if let Some(enemy) = hit {
            let _ = world.registry.emplace_or_replace(projectile, ToDestroy);
            damage_enemy(world, enemy);
        }
    }

    let invulnerable_time = world
        .ctx
        .get::<GameSettings>()
        .map_or(0.0, |settings| settings.player.invulnerable_time);
    let players = world
        .registry
        .view::<(Player, Collidable, Health)>()
        .without::<(Invulnerable,)>()
        .entities();
    for player in players {
        let Some(ship) = body(world, player) else {
            continue;
        };
        let rammed = enemies.iter().any(|enemy| {
            !world.registry.has::<ToDestroy>(*enemy)
                && body(world, *enemy).is_some_and(|target| overlaps(ship, target))
        });
        if !rammed {
            continue;
        }
        let lives = match world.registry.try_get_mut::<Health>(player) {
            Some(health) => {
                health.0 -= 1;
                health.0
            }
            None => continue,
        };
        log::info!("player hit, {} lives left", lives);
        ui::update_ui_lives(world, lives);
        let _ = world.registry.emplace_or_replace(
            player,
            Invulnerable {
                remaining: invulnerable_time,
            },
        );
        play_manager_sound::<ShipExplosionSound>(world, |sound| sound.0.play());
    }
}

/// Splits shattering enemies and queues every marked entity for destruction.
pub fn destroy_marked(world: &mut World) -> Result<(), GameError> {
    let settings = world.ctx.get::<GameSettings>().cloned();
    for entity in world.registry.view::<(ToDestroy,)>().entities() {
        let remaining = world
            .registry
            .try_get::<Shatters>(entity)
            .map_or(0, |shatters| shatters.0);
        let enemy_settings = world
            .registry
            .try_get::<EnemyKind>(entity)
            .and_then(|kind| settings.as_ref()?.enemy(&kind.0).cloned());
        let parent = world.registry.try_get::<Transform>(entity).copied();

        if world.registry.has::<Enemy>(entity) && remaining > 0 {
            if let (Some(enemy), Some(parent)) = (enemy_settings, parent) {
                let piece = parent.matrix * cgmath::Matrix4::from_scale(SHATTER_SCALE);
                for _ in 0..2 {
                    cast::spawn_enemy(world, &enemy, Some(piece), Some(remaining - 1))?;
                }
                log::debug!("{:?} shattered, {} splits left", entity, remaining - 1);
            }
        }
        cast::destroy_later_with_meshes(world, entity);
    }
    Ok(())
}

/// A dead player or an empty field ends the session.
pub fn check_game_over(world: &mut World) {
    let Some(manager) = game_manager(world) else {
        return;
    };
    if world.registry.has::<GameOver>(manager) {
        return;
    }
    let player_dead = world
        .registry
        .view::<(Player, Health)>()
        .iter()
        .any(|player| {
            world
                .registry
                .try_get::<Health>(player)
                .is_some_and(|health| health.0 <= 0)
        });
    let enemies_left = world
        .registry
        .view::<(Enemy,)>()
        .without::<(ToDestroy,)>()
        .count();
    if !player_dead && enemies_left > 0 {
        return;
    }
    if player_dead {
        log::info!("player destroyed, game over");
    } else {
        log::info!("all enemies destroyed, level cleared");
    }
    let _ = world.registry.emplace(manager, GameOver);
    world.ctx.insert(GameState::GameOver);
}
