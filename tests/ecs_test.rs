use cgmath::{Matrix4, Vector3};
use rockflow::{
    context::World,
    data_structures::{
        entity::Entity,
        instance::{GpuInstance, Transform},
        model::{GeometryData, MeshCollection, ModelManager, Obb},
    },
    error::EcsError,
    render::{self, DoNotRender, MeshOffset},
};

#[derive(Debug, PartialEq)]
struct Hitpoints(i32);
struct Tag;

fn mesh(world: &mut World, index_start: u32, at: Vector3<f32>) -> Entity {
    let entity = world.registry.create();
    world
        .registry
        .emplace(entity, GpuInstance::new(Matrix4::from_translation(at), Default::default()))
        .unwrap();
    world
        .registry
        .emplace(
            entity,
            GeometryData {
                index_start,
                index_count: 3,
                vertex_start: 0,
            },
        )
        .unwrap();
    world.registry.emplace(entity, DoNotRender).unwrap();
    entity
}

fn catalog(world: &mut World, name: &str, meshes: Vec<Entity>) {
    world.ctx.emplace(ModelManager::default()).add_collection(
        name,
        MeshCollection {
            meshes,
            bounding_box: Obb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)),
        },
    );
}

#[test]
fn destroyed_entities_lose_every_component() {
    let mut world = World::new();
    let entity = world.registry.create();
    world.registry.emplace(entity, Hitpoints(3)).unwrap();
    world.registry.emplace(entity, Tag).unwrap();

    assert!(world.registry.destroy(entity));

    assert!(!world.registry.valid(entity));
    assert!(world.registry.try_get::<Hitpoints>(entity).is_none());
    assert!(!world.registry.has::<Tag>(entity));
    assert_eq!(world.registry.view::<(Hitpoints,)>().count(), 0);
    assert_eq!(
        world.registry.get::<Hitpoints>(entity),
        Err(EcsError::StaleEntity(entity))
    );

    // The slot is reused with a new generation; the old id stays dead.
    let reused = world.registry.create();
    assert_eq!(reused.index(), entity.index());
    assert!(world.registry.try_get::<Hitpoints>(reused).is_none());
    assert!(world.registry.emplace(entity, Tag).is_err());
}

#[test]
fn deferred_destruction_waits_for_the_flush() {
    let mut world = World::new();
    let entity = world.registry.create();
    world.registry.emplace(entity, Hitpoints(1)).unwrap();

    world.registry.destroy_later(entity);
    world.registry.destroy_later(entity);
    assert!(world.registry.valid(entity));

    assert_eq!(world.registry.flush_destroyed(), 1);
    assert!(!world.registry.valid(entity));
    assert_eq!(world.registry.flush_destroyed(), 0);
}

#[test]
fn copies_are_independent_of_source_and_siblings() {
    let mut world = World::new();
    let sources = vec![
        mesh(&mut world, 0, Vector3::new(1.0, 0.0, 0.0)),
        mesh(&mut world, 3, Vector3::new(2.0, 0.0, 0.0)),
        mesh(&mut world, 6, Vector3::new(3.0, 0.0, 0.0)),
    ];
    catalog(&mut world, "Rock", sources.clone());

    let mut first = MeshCollection::default();
    let mut anchor = Transform::default();
    let created = render::create_dynamic_objects(&mut world, "Rock", &mut first, &mut anchor).unwrap();
    assert_eq!(created, 3);
    assert_eq!(first.meshes.len(), 3);
    assert_eq!(anchor.position(), Vector3::new(1.0, 0.0, 0.0));
    assert_eq!(first.bounding_box.extent, Vector3::new(1.0, 1.0, 1.0));
    for copy in &first.meshes {
        assert!(!sources.contains(copy));
        assert!(world.registry.has::<DoNotRender>(*copy));
        assert!(world.registry.has::<MeshOffset>(*copy));
    }

    let mut second = MeshCollection::default();
    let mut other = Transform::default();
    render::create_dynamic_objects(&mut world, "Rock", &mut second, &mut other).unwrap();

    let moved = Matrix4::from_translation(Vector3::new(50.0, 0.0, 0.0));
    world
        .registry
        .get_mut::<GpuInstance>(first.meshes[0])
        .unwrap()
        .transform = moved;

    assert_eq!(
        world.registry.get::<GpuInstance>(sources[0]).unwrap().transform,
        Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0))
    );
    assert_eq!(
        world.registry.get::<GpuInstance>(second.meshes[0]).unwrap().transform,
        Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0))
    );
    assert_eq!(
        world.registry.get::<GpuInstance>(first.meshes[1]).unwrap().transform,
        Matrix4::from_translation(Vector3::new(2.0, 0.0, 0.0))
    );
}

#[test]
fn incomplete_and_stale_sources_are_skipped() {
    let mut world = World::new();
    let complete = mesh(&mut world, 0, Vector3::new(0.0, 0.0, 0.0));
    let no_geometry = mesh(&mut world, 3, Vector3::new(0.0, 0.0, 0.0));
    world.registry.remove::<GeometryData>(no_geometry);
    let no_instance = mesh(&mut world, 6, Vector3::new(0.0, 0.0, 0.0));
    world.registry.remove::<GpuInstance>(no_instance);
    let stale = mesh(&mut world, 9, Vector3::new(0.0, 0.0, 0.0));
    world.registry.destroy(stale);
    catalog(&mut world, "Broken", vec![no_geometry, complete, no_instance, stale]);

    let mut collection = MeshCollection::default();
    let mut anchor = Transform::default();
    let created =
        render::create_dynamic_objects(&mut world, "Broken", &mut collection, &mut anchor).unwrap();

    assert_eq!(created, 1);
    assert_eq!(collection.meshes.len(), 1);
    assert_eq!(
        world.registry.get::<GeometryData>(collection.meshes[0]).unwrap().index_start,
        0
    );
}

#[test]
fn unknown_models_create_nothing() {
    let mut world = World::new();
    let mut collection = MeshCollection::default();
    let mut anchor = Transform::default();
    assert_eq!(
        render::create_dynamic_objects(&mut world, "Ship", &mut collection, &mut anchor).unwrap(),
        0
    );
    world.ctx.emplace(ModelManager::default());
    assert_eq!(
        render::create_dynamic_objects(&mut world, "Ship", &mut collection, &mut anchor).unwrap(),
        0
    );
    assert!(collection.meshes.is_empty());
    assert_eq!(anchor, Transform::default());
}

#[test]
fn patches_are_deduplicated_and_need_the_component() {
    let mut world = World::new();
    let entity = world.registry.create();
    assert!(!world.registry.patch::<Hitpoints>(entity));

    world.registry.emplace(entity, Hitpoints(1)).unwrap();
    assert!(world.registry.patch::<Hitpoints>(entity));
    assert!(world.registry.patch::<Hitpoints>(entity));

    let patches = world.registry.drain_patches();
    assert_eq!(patches.len(), 1);
    assert!(patches[0].is::<Hitpoints>());
    assert!(world.registry.drain_patches().is_empty());
}
