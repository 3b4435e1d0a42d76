//! Entity tables owned by one game task
//!
//! Both processes keep a `World`. The server's copy is authoritative; the
//! client's is a replica fed by the message handlers.

use crate::entity::{DroppedItem, Enemy, EntityKind, ItemType, Player, Projectile};
use crate::protocol::{SessionId, UpdateDroppedItemsData};
use crate::quadtree::{Collider, Quadtree};
use log::{debug, warn};
use rand::Rng;
use std::collections::BTreeMap;

/// A projectile that struck an enemy during [`World::advance_projectiles`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectileHit {
    pub owner: SessionId,
    pub enemy_id: i32,
    pub damage: i32,
}

#[derive(Debug, Default)]
pub struct World {
    pub players: BTreeMap<SessionId, Player>,
    pub enemies: BTreeMap<i32, Enemy>,
    pub projectiles: Vec<Projectile>,
    pub dropped_items: Vec<DroppedItem>,
    next_projectile_id: i32,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the dropped item table in wire form
    pub fn dropped_items_snapshot(&self) -> UpdateDroppedItemsData {
        let mut data = UpdateDroppedItemsData {
            types: Vec::with_capacity(self.dropped_items.len()),
            xs: Vec::with_capacity(self.dropped_items.len()),
            ys: Vec::with_capacity(self.dropped_items.len()),
        };
        for item in &self.dropped_items {
            data.types.push(item.item_type.to_i32());
            data.xs.push(item.x);
            data.ys.push(item.y);
        }
        data
    }

    /// Replaces the dropped item table with a received snapshot
    pub fn apply_dropped_items(&mut self, data: &UpdateDroppedItemsData) {
        if data.types.len() != data.xs.len() || data.types.len() != data.ys.len() {
            warn!(
                "Dropped item snapshot has uneven columns ({}, {}, {})",
                data.types.len(),
                data.xs.len(),
                data.ys.len()
            );
        }

        self.dropped_items = data
            .types
            .iter()
            .zip(&data.xs)
            .zip(&data.ys)
            .filter_map(|((&raw, &x), &y)| {
                ItemType::from_i32(raw).map(|item_type| DroppedItem { item_type, x, y })
            })
            .collect();
    }

    pub fn drop_item_at(&mut self, item_type: ItemType, x: f32, y: f32) {
        self.dropped_items.push(DroppedItem { item_type, x, y });
    }

    /// Moves an inventory item onto the ground at the player's position
    pub fn drop_item(&mut self, player_id: SessionId, index: i32) -> bool {
        let Some(player) = self.players.get_mut(&player_id) else {
            debug!("Drop for unknown player {}", player_id);
            return false;
        };
        let Ok(index) = usize::try_from(index) else {
            return false;
        };
        let Some(item) = player.inventory.try_remove(index) else {
            return false;
        };

        let (x, y) = (player.motion.x, player.motion.y);
        self.drop_item_at(item.item_type, x, y);
        true
    }

    /// Fires the item in slot `index`, spawning its projectile in the owner's
    /// facing direction
    pub fn use_item<R: Rng + ?Sized>(&mut self, player_id: SessionId, index: i32, rng: &mut R) -> bool {
        let Some(player) = self.players.get(&player_id) else {
            debug!("Item use for unknown player {}", player_id);
            return false;
        };
        let Some(item) = usize::try_from(index)
            .ok()
            .and_then(|index| player.inventory.get(index))
        else {
            debug!("Player {} has no item in slot {}", player_id, index);
            return false;
        };

        let mut projectile = Projectile::new(
            player_id,
            item.item_type.projectile(),
            player.motion.x,
            player.motion.y,
            player.motion.direction,
            rng,
        );
        projectile.id = self.next_projectile_id;
        self.next_projectile_id = self.next_projectile_id.wrapping_add(1);
        self.projectiles.push(projectile);
        true
    }

    /// Indices of the dropped items overlapping `area`
    pub fn dropped_items_under(&self, area: &Collider) -> Vec<usize> {
        self.dropped_items
            .iter()
            .enumerate()
            .filter(|(index, item)| item.collider(*index).collides_with(area))
            .map(|(index, _)| index)
            .collect()
    }

    /// Clears `tree` and refills it with every enemy and player collider
    pub fn rebuild_quadtree(&self, tree: &mut Quadtree) {
        tree.clear();
        for enemy in self.enemies.values() {
            tree.insert(enemy.collider());
        }
        for player in self.players.values() {
            tree.insert(player.collider());
        }
    }

    /// Advances every projectile, dropping expired ones
    ///
    /// A damaging projectile that overlaps an enemy in `tree` is removed and
    /// reported; applying the damage is left to the caller.
    pub fn advance_projectiles(&mut self, dt: f32, tree: &Quadtree) -> Vec<ProjectileHit> {
        let mut hits = Vec::new();
        let mut candidates: Vec<Collider> = Vec::new();

        self.projectiles.retain_mut(|projectile| {
            if !projectile.advance(dt) {
                return false;
            }
            if projectile.damage <= 0 {
                return true;
            }

            let area = projectile.collider();
            candidates.clear();
            tree.retrieve_into(&mut candidates, &area);

            let struck = candidates.iter().find_map(|candidate| match candidate.owner {
                Some(owner) if owner.kind == EntityKind::Enemy && candidate.collides_with(&area) => {
                    Some(owner.id)
                }
                _ => None,
            });

            match struck {
                Some(enemy_id) => {
                    hits.push(ProjectileHit {
                        owner: projectile.owner,
                        enemy_id,
                        damage: projectile.damage,
                    });
                    false
                }
                None => true,
            }
        });

        hits
    }

    /// Player closest to `(x, y)`, if any
    pub fn nearest_player(&self, x: f32, y: f32) -> Option<SessionId> {
        self.players
            .values()
            .map(|player| {
                let dx = x - player.motion.x;
                let dy = y - player.motion.y;
                (player.id, dx * dx + dy * dy)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Removes a player along with the projectiles it fired
    pub fn remove_player(&mut self, id: SessionId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            self.projectiles.retain(|projectile| projectile.owner != id);
        }
        removed
    }
}
