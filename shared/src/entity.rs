//! Entity records: players, enemies, projectiles, items
//!
//! Entities are plain data plus a [`SyncedEntity`] for anything that moves.
//! The tables that hold them live in [`crate::world::World`].

use crate::protocol::{EnemySpawnData, PlayerJoinData, SessionId};
use crate::quadtree::Collider;
use crate::sync::{Direction, SyncedEntity};
use crate::ENTITY_SIZE;
use log::warn;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Player,
    Enemy,
    Projectile,
    DroppedItem,
}

/// Copyable back-reference from a collider to the entity that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i32,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i32) -> Self {
        Self { kind, id }
    }

    pub fn player(id: SessionId) -> Self {
        Self::new(EntityKind::Player, id)
    }

    pub fn enemy(id: i32) -> Self {
        Self::new(EntityKind::Enemy, id)
    }

    pub fn projectile(id: i32) -> Self {
        Self::new(EntityKind::Projectile, id)
    }

    /// Dropped items have no id of their own; they are named by table index
    pub fn dropped_item(index: usize) -> Self {
        Self::new(EntityKind::DroppedItem, i32::try_from(index).unwrap_or(i32::MAX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Dagger,
    Shield,
}

impl ItemType {
    pub const ALL: [ItemType; 2] = [ItemType::Dagger, ItemType::Shield];

    pub fn to_i32(self) -> i32 {
        match self {
            ItemType::Dagger => 0,
            ItemType::Shield => 1,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ItemType::Dagger),
            1 => Some(ItemType::Shield),
            _ => None,
        }
    }

    /// Seconds between two uses
    pub fn cooldown(self) -> f32 {
        match self {
            ItemType::Dagger => 0.5,
            ItemType::Shield => 3.0,
        }
    }

    pub fn projectile(self) -> ProjectileType {
        match self {
            ItemType::Dagger => ProjectileType::Dagger,
            ItemType::Shield => ProjectileType::Shield,
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub item_type: ItemType,
    cooldown_remaining: f32,
}

impl Item {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            cooldown_remaining: item_type.cooldown(),
        }
    }

    pub fn cooldown_remaining(&self) -> f32 {
        self.cooldown_remaining
    }

    /// Advances the cooldown; returns true and rearms it when the item fires
    pub fn ready(&mut self, frame_time: f32) -> bool {
        self.cooldown_remaining -= frame_time;
        if self.cooldown_remaining > 0.0 {
            return false;
        }
        self.cooldown_remaining = self.item_type.cooldown();
        true
    }
}

pub const INVENTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    items: Vec<Item>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dagger, Shield, Dagger
    pub fn starter() -> Self {
        let mut inventory = Self::new();
        for item_type in [ItemType::Dagger, ItemType::Shield, ItemType::Dagger] {
            inventory.try_add(Item::new(item_type));
        }
        inventory
    }

    /// Builds an inventory from wire item types, skipping unknown ones
    pub fn from_types(types: &[i32]) -> Self {
        let mut inventory = Self::new();
        for &raw in types {
            match ItemType::from_i32(raw) {
                Some(item_type) => {
                    inventory.try_add(Item::new(item_type));
                }
                None => warn!("Ignoring unknown item type {}", raw),
            }
        }
        inventory
    }

    pub fn try_add(&mut self, item: Item) -> bool {
        if self.items.len() >= INVENTORY_CAPACITY {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn try_remove(&mut self, index: usize) -> Option<Item> {
        if index >= self.items.len() {
            return None;
        }
        Some(self.items.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Item] {
        &mut self.items
    }

    pub fn item_types(&self) -> Vec<i32> {
        self.items.iter().map(|item| item.item_type.to_i32()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub const PLAYER_SPEED: f32 = 150.0;
pub const PLAYER_HEALTH: i32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: SessionId,
    pub motion: SyncedEntity,
    pub health: i32,
    pub max_health: i32,
    pub speed: f32,
    pub size: i32,
    pub inventory: Inventory,
}

impl Player {
    pub fn new(id: SessionId, x: f32, y: f32) -> Self {
        Self {
            id,
            motion: SyncedEntity::new(x, y, Direction::Down),
            health: PLAYER_HEALTH,
            max_health: PLAYER_HEALTH,
            speed: PLAYER_SPEED,
            size: ENTITY_SIZE,
            inventory: Inventory::starter(),
        }
    }

    pub fn from_join_data(data: &PlayerJoinData) -> Self {
        Self {
            id: data.id,
            motion: SyncedEntity::new(data.x, data.y, Direction::Down),
            health: data.health,
            max_health: data.max_health,
            speed: data.speed,
            size: data.size,
            inventory: Inventory::from_types(&data.item_types),
        }
    }

    pub fn to_join_data(&self) -> PlayerJoinData {
        PlayerJoinData {
            id: self.id,
            x: self.motion.x,
            y: self.motion.y,
            health: self.health,
            max_health: self.max_health,
            speed: self.speed,
            size: self.size,
            item_types: self.inventory.item_types(),
        }
    }

    pub fn collider(&self) -> Collider {
        let size = self.size as f32;
        Collider::owned_by(self.motion.x, self.motion.y, size, size, EntityRef::player(self.id))
    }

    pub fn take_damage(&mut self, damage: i32) {
        self.health -= damage;
        self.motion.flash();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyType {
    Default,
}

impl EnemyType {
    pub fn to_i32(self) -> i32 {
        match self {
            EnemyType::Default => 0,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(EnemyType::Default),
            _ => None,
        }
    }
}

pub const ENEMY_SPEED: f32 = 100.0;
pub const ENEMY_HEALTH: i32 = 30;
pub const ENEMY_DAMAGE: i32 = 10;
pub const ENEMY_ATTACK_DELAY: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Enemy {
    pub id: i32,
    pub enemy_type: EnemyType,
    pub motion: SyncedEntity,
    pub health: i32,
    pub max_health: i32,
    pub damage: i32,
    pub speed: f32,
    pub size: i32,
    pub attack_timer: f32,
}

impl Enemy {
    pub fn new(id: i32, enemy_type: EnemyType, x: f32, y: f32) -> Self {
        Self {
            id,
            enemy_type,
            motion: SyncedEntity::new(x, y, Direction::Down),
            health: ENEMY_HEALTH,
            max_health: ENEMY_HEALTH,
            damage: ENEMY_DAMAGE,
            speed: ENEMY_SPEED,
            size: ENTITY_SIZE,
            attack_timer: 0.0,
        }
    }

    /// Replica from a spawn message; `None` for an unknown enemy type
    pub fn from_spawn_data(data: &EnemySpawnData) -> Option<Self> {
        let enemy_type = EnemyType::from_i32(data.enemy_type)?;
        Some(Self {
            id: data.id,
            enemy_type,
            motion: SyncedEntity::new(data.x, data.y, Direction::Down),
            health: data.health,
            max_health: data.max_health,
            damage: data.damage,
            speed: data.speed,
            size: data.size,
            attack_timer: 0.0,
        })
    }

    pub fn to_spawn_data(&self) -> EnemySpawnData {
        EnemySpawnData {
            id: self.id,
            x: self.motion.x,
            y: self.motion.y,
            enemy_type: self.enemy_type.to_i32(),
            health: self.health,
            max_health: self.max_health,
            damage: self.damage,
            speed: self.speed,
            size: self.size,
        }
    }

    pub fn collider(&self) -> Collider {
        let size = self.size as f32;
        Collider::owned_by(self.motion.x, self.motion.y, size, size, EntityRef::enemy(self.id))
    }

    pub fn take_damage(&mut self, damage: i32) {
        self.health -= damage;
        self.motion.flash();
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileType {
    Dagger,
    Shield,
}

impl ProjectileType {
    pub fn speed(self) -> f32 {
        match self {
            ProjectileType::Dagger => 400.0,
            ProjectileType::Shield => 0.0,
        }
    }

    pub fn damage(self) -> i32 {
        match self {
            ProjectileType::Dagger => 10,
            ProjectileType::Shield => 0,
        }
    }

    /// Seconds before the projectile expires
    pub fn lifetime(self) -> f32 {
        match self {
            ProjectileType::Dagger => 1.0,
            ProjectileType::Shield => 3.0,
        }
    }
}

/// Maximum visual jitter applied to a projectile, in either axis
pub const PROJECTILE_OFFSET_RANGE: f32 = ENTITY_SIZE as f32 / 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    /// Assigned by the world that spawns it
    pub id: i32,
    pub owner: SessionId,
    pub projectile_type: ProjectileType,
    pub x: f32,
    pub y: f32,
    pub direction: (f32, f32),
    pub speed: f32,
    pub damage: i32,
    pub lifetime: f32,
    pub age: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Projectile {
    pub fn new<R: Rng + ?Sized>(
        owner: SessionId,
        projectile_type: ProjectileType,
        x: f32,
        y: f32,
        facing: Direction,
        rng: &mut R,
    ) -> Self {
        let range = PROJECTILE_OFFSET_RANGE;
        Self {
            id: 0,
            owner,
            projectile_type,
            x,
            y,
            direction: facing.to_vector(),
            speed: projectile_type.speed(),
            damage: projectile_type.damage(),
            lifetime: projectile_type.lifetime(),
            age: 0.0,
            offset_x: rng.gen_range(-range..range),
            offset_y: rng.gen_range(-range..range),
        }
    }

    /// Moves the projectile; returns false once it has outlived its lifetime
    pub fn advance(&mut self, dt: f32) -> bool {
        self.age += dt;
        if self.age > self.lifetime {
            return false;
        }
        self.x += self.direction.0 * self.speed * dt;
        self.y += self.direction.1 * self.speed * dt;
        true
    }

    pub fn collider(&self) -> Collider {
        let size = ENTITY_SIZE as f32;
        Collider::owned_by(self.x, self.y, size, size, EntityRef::projectile(self.id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedItem {
    pub item_type: ItemType,
    pub x: f32,
    pub y: f32,
}

impl DroppedItem {
    /// Collider for the item stored at `index` of the dropped item table
    pub fn collider(&self, index: usize) -> Collider {
        let size = ENTITY_SIZE as f32;
        Collider::owned_by(self.x, self.y, size, size, EntityRef::dropped_item(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_starter_loadout() {
        let player = Player::new(0, 10.0, 20.0);
        assert_eq!(player.inventory.item_types(), vec![0, 1, 0]);
        assert_eq!(player.health, 100);
        assert_eq!(player.speed, 150.0);
        assert_eq!(player.size, 32);
    }

    #[test]
    fn test_inventory_capacity() {
        let mut inventory = Inventory::new();
        for _ in 0..INVENTORY_CAPACITY {
            assert!(inventory.try_add(Item::new(ItemType::Dagger)));
        }
        assert!(!inventory.try_add(Item::new(ItemType::Shield)));
        assert_eq!(inventory.len(), INVENTORY_CAPACITY);
    }

    #[test]
    fn test_inventory_remove_out_of_range() {
        let mut inventory = Inventory::starter();
        assert!(inventory.try_remove(3).is_none());

        let removed = inventory.try_remove(1).unwrap();
        assert_eq!(removed.item_type, ItemType::Shield);
        assert_eq!(inventory.item_types(), vec![0, 0]);
    }

    #[test]
    fn test_unknown_item_types_are_skipped() {
        let inventory = Inventory::from_types(&[1, 7, 0, -2]);
        assert_eq!(inventory.item_types(), vec![1, 0]);
    }

    #[test]
    fn test_item_cooldown() {
        let mut dagger = Item::new(ItemType::Dagger);
        assert!(!dagger.ready(0.3));
        assert!(dagger.ready(0.3));
        assert_approx_eq!(dagger.cooldown_remaining(), 0.5);

        let mut shield = Item::new(ItemType::Shield);
        assert!(!shield.ready(2.9));
        assert!(shield.ready(0.2));
    }

    #[test]
    fn test_player_join_data_round_trip() {
        let mut player = Player::new(4, 12.5, 30.0);
        player.health = 80;
        player.inventory.try_remove(0);

        let data = player.to_join_data();
        assert_eq!(data.item_types, vec![1, 0]);

        let replica = Player::from_join_data(&data);
        assert_eq!(replica.id, 4);
        assert_eq!(replica.health, 80);
        assert_eq!(replica.motion.visual_x, 12.5);
        assert_eq!(replica.inventory.item_types(), vec![1, 0]);
    }

    #[test]
    fn test_enemy_spawn_data_round_trip() {
        let enemy = Enemy::new(9, EnemyType::Default, 150.0, 200.0);
        let data = enemy.to_spawn_data();
        assert_eq!(data.enemy_type, 0);

        let replica = Enemy::from_spawn_data(&data).unwrap();
        assert_eq!(replica, enemy);

        let unknown = EnemySpawnData {
            enemy_type: 42,
            ..data
        };
        assert!(Enemy::from_spawn_data(&unknown).is_none());
    }

    #[test]
    fn test_damage_flashes_and_kills() {
        let mut enemy = Enemy::new(0, EnemyType::Default, 0.0, 0.0);
        enemy.take_damage(10);
        assert_eq!(enemy.health, 20);
        assert_eq!(enemy.motion.flash_amount, 1.0);
        assert!(!enemy.is_dead());

        enemy.take_damage(20);
        assert!(enemy.is_dead());
    }

    #[test]
    fn test_projectile_moves_then_expires() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut dagger = Projectile::new(0, ProjectileType::Dagger, 0.0, 0.0, Direction::Right, &mut rng);

        assert!(dagger.offset_x.abs() <= PROJECTILE_OFFSET_RANGE);
        assert!(dagger.advance(0.5));
        assert_approx_eq!(dagger.x, 200.0);
        assert_approx_eq!(dagger.y, 0.0);

        assert!(dagger.advance(0.5));
        assert!(!dagger.advance(0.1));
    }

    #[test]
    fn test_shield_stays_put() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut shield = Projectile::new(3, ProjectileType::Shield, 5.0, 5.0, Direction::Up, &mut rng);

        assert!(shield.advance(2.5));
        assert_eq!((shield.x, shield.y), (5.0, 5.0));
        assert_eq!(shield.damage, 0);
        assert!(!shield.advance(1.0));
    }

    #[test]
    fn test_colliders_carry_owner() {
        let player = Player::new(2, 1.0, 2.0);
        let enemy = Enemy::new(2, EnemyType::Default, 1.0, 2.0);

        assert_eq!(player.collider().owner, Some(EntityRef::player(2)));
        assert_eq!(enemy.collider().owner, Some(EntityRef::enemy(2)));
        assert!(player.collider().collides_with(&enemy.collider()));

        let mut rng = StdRng::seed_from_u64(3);
        let mut dagger = Projectile::new(2, ProjectileType::Dagger, 1.0, 2.0, Direction::Up, &mut rng);
        dagger.id = 9;
        assert_eq!(
            dagger.collider().owner.map(|owner| owner.kind),
            Some(EntityKind::Projectile)
        );
        assert!(dagger.collider().collides_with(&enemy.collider()));

        let dropped = DroppedItem {
            item_type: ItemType::Shield,
            x: 1.0,
            y: 2.0,
        };
        assert_eq!(dropped.collider(4).owner, Some(EntityRef::dropped_item(4)));
    }
}
