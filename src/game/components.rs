//! Gameplay tags, components and context values.

use rand::{SeedableRng, rngs::StdRng};

use crate::{config::Config, error::ConfigError, resources::audio::Sound};

#[derive(Clone, Copy, Debug, Default)]
pub struct Player;
#[derive(Clone, Copy, Debug, Default)]
pub struct Enemy;
#[derive(Clone, Copy, Debug, Default)]
pub struct Projectile;
#[derive(Clone, Copy, Debug, Default)]
pub struct GameManager;
#[derive(Clone, Copy, Debug, Default)]
pub struct Collidable;
#[derive(Clone, Copy, Debug, Default)]
pub struct Obstacle;
#[derive(Clone, Copy, Debug, Default)]
pub struct ToDestroy;
#[derive(Clone, Copy, Debug, Default)]
pub struct GameOver;
#[derive(Clone, Copy, Debug, Default)]
pub struct Paused;
/// Spawned from the current level file.
#[derive(Clone, Copy, Debug, Default)]
pub struct LevelGeometry;

/// Every component kind that marks an entity as part of a running session.
pub type GameplayKinds = (
    Player,
    Enemy,
    Projectile,
    GameManager,
    Collidable,
    Shatters,
    Health,
    Velocity,
);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Velocity(pub cgmath::Vector3<f32>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Health(pub i32);

/// How many more times an enemy splits when destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shatters(pub i32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FiringState {
    pub cooldown: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Invulnerable {
    pub remaining: f32,
}

/// Seconds a projectile has left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lifetime(pub f32);

/// Heading around the Y axis, in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    pub angle: f32,
    pub angular_velocity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Physics {
    pub velocity: cgmath::Vector3<f32>,
    pub thrust: f32,
    pub drag: f32,
    pub max_speed: f32,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            velocity: cgmath::Vector3::new(0.0, 0.0, 0.0),
            thrust: 3.0,
            drag: 0.98,
            max_speed: 5.0,
        }
    }
}

/// The config section an enemy was built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnemyKind(pub String);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UiComponents {
    pub lives: i32,
    pub current_score: i32,
    pub high_score: i32,
    pub current_level: i32,
}

pub struct ShotSound(pub Sound);
pub struct ExplosionSound(pub Sound);
pub struct ShipExplosionSound(pub Sound);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GameState {
    #[default]
    MainMenu,
    Gameplay,
    GameOver,
}

/// Play area limits in world X and Z. `min > max` on either axis means no
/// obstacle defined the area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Bounds {
    pub fn undefined() -> Self {
        Self {
            min_x: f32::MAX,
            max_x: -f32::MAX,
            min_z: f32::MAX,
            max_z: -f32::MAX,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.min_x <= self.max_x && self.min_z <= self.max_z
    }

    pub fn contains(&self, x: f32, z: f32) -> bool {
        self.is_defined() && (self.min_x..=self.max_x).contains(&x) && (self.min_z..=self.max_z).contains(&z)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::undefined()
    }
}

/// Seconds since the last frame, already clamped by the frame clock.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeltaTime(pub f32);

pub struct GameRng(pub StdRng);

impl GameRng {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

/// Tuning of the player ship, from the `Player` section.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSettings {
    pub model: String,
    pub hitpoints: i32,
    pub thrust: f32,
    pub drag: f32,
    pub max_speed: f32,
    /// Degrees per second.
    pub turn_speed: f32,
    pub fire_cooldown: f32,
    pub invulnerable_time: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectileSettings {
    pub model: String,
    pub speed: f32,
    pub lifetime: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnemySettings {
    pub section: String,
    pub model: String,
    pub hitpoints: i32,
    pub speed: f32,
    pub initial_shatter_count: Option<i32>,
}

/// Everything a session reads from the config, resolved once when it starts.
#[derive(Clone, Debug, PartialEq)]
pub struct GameSettings {
    pub player: PlayerSettings,
    pub projectile: ProjectileSettings,
    pub enemies: Vec<EnemySettings>,
    pub score_per_hit: i32,
}

impl GameSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let player = PlayerSettings {
            model: config.at("Player", "model")?,
            hitpoints: config.at("Player", "hitpoints")?,
            thrust: config.at("Player", "thrust")?,
            drag: config.at("Player", "drag")?,
            max_speed: config.at("Player", "max_speed")?,
            turn_speed: config.at("Player", "turn_speed")?,
            fire_cooldown: config.at("Player", "fire_cooldown")?,
            invulnerable_time: config.at("Player", "invulnerable_time")?,
        };
        let projectile = ProjectileSettings {
            model: config.at("Projectile", "model")?,
            speed: config.at("Projectile", "speed")?,
            lifetime: config.at("Projectile", "lifetime")?,
        };
        let sections: Vec<String> = config.at("Gameplay", "enemies")?;
        let enemies = sections
            .into_iter()
            .map(|section| {
                Ok(EnemySettings {
                    model: config.at(&section, "model")?,
                    hitpoints: config.at(&section, "hitpoints")?,
                    speed: config.at(&section, "speed")?,
                    initial_shatter_count: config.opt(&section, "initial_shatter_count")?,
                    section,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            player,
            projectile,
            enemies,
            score_per_hit: config.opt("Gameplay", "score_per_hit")?.unwrap_or(100),
        })
    }

    pub fn enemy(&self, section: &str) -> Option<&EnemySettings> {
        self.enemies.iter().find(|enemy| enemy.section == section)
    }
}
