//! Authoritative game state
//!
//! Handlers and ticks both run on the server loop's task and take `&mut
//! GameState`. Nothing here touches a socket: everything a client should
//! learn is queued as an [`Outbound`] and delivered by the loop once the
//! handler or tick returns.

use crate::network::{Outbound, ServerConfig};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::entity::{Enemy, EnemyType, EntityRef, ItemType, Player, ENEMY_ATTACK_DELAY};
use shared::protocol::{
    EnemyDamageData, EnemyMoveData, EnemyUpdateDirectionData, PlayerDamageData,
    PlayerDisconnectData,
};
use shared::quadtree::{Collider, Quadtree};
use shared::sync::Direction;
use shared::world::World;
use shared::{HandlerRegistry, Message, MessageType, SessionId};

/// Range for enemy spawn coordinates
const ENEMY_SPAWN_RANGE: std::ops::Range<i32> = 100..300;
/// Range for player spawn coordinates
const PLAYER_SPAWN_RANGE: std::ops::Range<i32> = 0..100;

pub struct GameState {
    world: World,
    quadtree: Quadtree,
    candidates: Vec<Collider>,
    outbox: Vec<Outbound>,
    next_enemy_id: i32,
    max_enemies: usize,
    rng: StdRng,
    pub tick: u64,
}

impl GameState {
    pub fn new(config: &ServerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            world: World::new(),
            quadtree: Quadtree::new(Collider::new(
                0.0,
                0.0,
                config.world_width,
                config.world_height,
            )),
            candidates: Vec::new(),
            outbox: Vec::new(),
            next_enemy_id: 0,
            max_enemies: config.max_enemies,
            rng,
            tick: 0,
        }
    }

    /// Handlers for every message type a client may send
    pub fn registry() -> HandlerRegistry<GameState> {
        HandlerRegistry::builder()
            .on(MessageType::PlayerMove, GameState::handle_player_move)
            .on(
                MessageType::PlayerUpdateDirection,
                GameState::handle_player_direction,
            )
            .on(MessageType::PlayerDropItem, GameState::handle_drop_item)
            .on(MessageType::UpdateItem, GameState::handle_update_item)
            .build()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    fn send(&mut self, to: SessionId, message: Message) {
        self.outbox.push(Outbound::Send { to, message });
    }

    fn broadcast(&mut self, message: Message) {
        self.outbox.push(Outbound::Broadcast {
            message,
            exclude: None,
        });
    }

    fn broadcast_except(&mut self, exclude: SessionId, message: Message) {
        self.outbox.push(Outbound::Broadcast {
            message,
            exclude: Some(exclude),
        });
    }

    /// Spawns the newcomer's player and brings it up to date with the world
    pub fn on_connect(&mut self, session: SessionId) {
        let x = self.rng.gen_range(PLAYER_SPAWN_RANGE) as f32;
        let y = self.rng.gen_range(PLAYER_SPAWN_RANGE) as f32;
        let player = Player::new(session, x, y);
        info!("Player {} joined at ({}, {})", session, x, y);

        self.broadcast(Message::PlayerJoin(player.to_join_data()));
        self.world.players.insert(session, player);

        let roster: Vec<Message> = self
            .world
            .players
            .values()
            .filter(|other| other.id != session)
            .map(|other| Message::PlayerJoin(other.to_join_data()))
            .chain(
                self.world
                    .enemies
                    .values()
                    .map(|enemy| Message::EnemySpawn(enemy.to_spawn_data())),
            )
            .chain(std::iter::once(Message::UpdateDroppedItems(
                self.world.dropped_items_snapshot(),
            )))
            .collect();

        for message in roster {
            self.send(session, message);
        }
    }

    pub fn on_disconnect(&mut self, session: SessionId) {
        if self.world.remove_player(session).is_none() {
            return;
        }
        info!("Player {} left", session);
        self.broadcast(Message::PlayerDisconnect(PlayerDisconnectData { id: session }));
    }

    /// True when `id` names the sender's own player
    fn owns(session: SessionId, id: SessionId, message_type: MessageType) -> bool {
        if session != id {
            warn!(
                "Session {} sent {} for player {}, ignoring",
                session, message_type, id
            );
            return false;
        }
        true
    }

    fn handle_player_move(&mut self, session: SessionId, message: &Message) {
        let Message::PlayerMove(data) = message else {
            warn!("PlayerMove handler got {}", message.message_type());
            return;
        };
        if !Self::owns(session, data.id, MessageType::PlayerMove) {
            return;
        }
        if !data.x.is_finite() || !data.y.is_finite() {
            warn!(
                "Player {} sent non-finite position ({}, {}), ignoring",
                data.id, data.x, data.y
            );
            return;
        }
        let Some(player) = self.world.players.get_mut(&data.id) else {
            return;
        };

        player.motion.set_authoritative(data.x, data.y);
        player.motion.snap();
        self.broadcast_except(session, message.clone());
    }

    fn handle_player_direction(&mut self, session: SessionId, message: &Message) {
        let Message::PlayerUpdateDirection(data) = message else {
            warn!("PlayerUpdateDirection handler got {}", message.message_type());
            return;
        };
        if !Self::owns(session, data.id, MessageType::PlayerUpdateDirection) {
            return;
        }
        let Some(direction) = Direction::from_i32(data.direction) else {
            warn!("Player {} sent invalid direction {}", data.id, data.direction);
            return;
        };
        let Some(player) = self.world.players.get_mut(&data.id) else {
            return;
        };

        player.motion.direction = direction;
        self.broadcast_except(session, message.clone());
    }

    fn handle_drop_item(&mut self, session: SessionId, message: &Message) {
        let Message::PlayerDropItem(data) = message else {
            warn!("PlayerDropItem handler got {}", message.message_type());
            return;
        };
        if !Self::owns(session, data.id, MessageType::PlayerDropItem) {
            return;
        }

        if self.world.drop_item(data.id, data.index) {
            self.broadcast(message.clone());
        } else {
            debug!("Player {} could not drop slot {}", data.id, data.index);
        }
    }

    fn handle_update_item(&mut self, session: SessionId, message: &Message) {
        let Message::UpdateItem(data) = message else {
            warn!("UpdateItem handler got {}", message.message_type());
            return;
        };
        if !Self::owns(session, data.player_id, MessageType::UpdateItem) {
            return;
        }

        if self.world.use_item(data.player_id, data.index, &mut self.rng) {
            self.broadcast_except(session, message.clone());
        }
    }

    /// Advances the simulation by one tick
    pub fn tick(&mut self, dt: f32) {
        self.tick += 1;
        self.spawn_enemy();

        self.world.rebuild_quadtree(&mut self.quadtree);
        let ids: Vec<i32> = self.world.enemies.keys().copied().collect();
        for id in ids {
            self.update_enemy(id, dt);
        }

        // Enemies moved, so refresh the index before resolving projectiles
        self.world.rebuild_quadtree(&mut self.quadtree);
        self.update_projectiles(dt);
    }

    /// Keeps the enemy count topped up, one spawn per tick
    fn spawn_enemy(&mut self) {
        if self.world.enemies.len() >= self.max_enemies {
            return;
        }

        let id = self.next_enemy_id;
        self.next_enemy_id += 1;
        let x = self.rng.gen_range(ENEMY_SPAWN_RANGE) as f32;
        let y = self.rng.gen_range(ENEMY_SPAWN_RANGE) as f32;

        let enemy = Enemy::new(id, EnemyType::Default, x, y);
        debug!("Spawned enemy {} at ({}, {})", id, x, y);
        self.broadcast(Message::EnemySpawn(enemy.to_spawn_data()));
        self.world.enemies.insert(id, enemy);
    }

    fn update_enemy(&mut self, id: i32, dt: f32) {
        let Some((x, y)) = self
            .world
            .enemies
            .get(&id)
            .map(|enemy| (enemy.motion.x, enemy.motion.y))
        else {
            return;
        };
        let nearest = self.world.nearest_player(x, y);

        let Some(enemy) = self.world.enemies.get_mut(&id) else {
            return;
        };
        let previous_direction = enemy.motion.direction;

        let attack = match nearest {
            Some(target_id) => match self.world.players.get(&target_id) {
                Some(target) => {
                    let touching = chase(enemy, target, &self.quadtree, &mut self.candidates, dt);
                    enemy.attack_timer -= dt;
                    if touching && enemy.attack_timer <= 0.0 {
                        enemy.attack_timer = ENEMY_ATTACK_DELAY;
                        Some((target_id, enemy.damage))
                    } else {
                        None
                    }
                }
                None => None,
            },
            None => None,
        };

        let moved = EnemyMoveData {
            id,
            x: enemy.motion.x,
            y: enemy.motion.y,
        };
        let direction = enemy.motion.direction;

        self.broadcast(Message::EnemyMove(moved));
        if direction != previous_direction {
            self.broadcast(Message::EnemyUpdateDirection(EnemyUpdateDirectionData {
                id,
                direction: direction.to_i32(),
            }));
        }

        if let Some((target_id, damage)) = attack {
            if let Some(target) = self.world.players.get_mut(&target_id) {
                target.take_damage(damage);
            }
            self.broadcast(Message::PlayerDamage(PlayerDamageData {
                id: target_id,
                damage,
            }));
        }
    }

    fn update_projectiles(&mut self, dt: f32) {
        let hits = self.world.advance_projectiles(dt, &self.quadtree);
        let mut drops_changed = false;

        for hit in hits {
            let Some(enemy) = self.world.enemies.get_mut(&hit.enemy_id) else {
                continue;
            };
            enemy.take_damage(hit.damage);
            self.outbox.push(Outbound::Broadcast {
                message: Message::EnemyDamage(EnemyDamageData {
                    id: hit.enemy_id,
                    damage: hit.damage,
                }),
                exclude: None,
            });

            if enemy.is_dead() {
                let (x, y) = (enemy.motion.x, enemy.motion.y);
                self.world.enemies.remove(&hit.enemy_id);
                let item_type = ItemType::random(&mut self.rng);
                self.world.drop_item_at(item_type, x, y);
                info!(
                    "Enemy {} killed by player {}, dropped {:?}",
                    hit.enemy_id, hit.owner, item_type
                );
                drops_changed = true;
            }
        }

        if drops_changed {
            self.broadcast(Message::UpdateDroppedItems(
                self.world.dropped_items_snapshot(),
            ));
        }
    }
}

/// Moves `enemy` one step toward `target`, one axis at a time
///
/// An axis move that would overlap any indexed collider is undone. Returns
/// true if either blocked move was blocked by the target itself.
fn chase(
    enemy: &mut Enemy,
    target: &Player,
    tree: &Quadtree,
    candidates: &mut Vec<Collider>,
    dt: f32,
) -> bool {
    let mut move_x = target.motion.x - enemy.motion.x;
    let mut move_y = target.motion.y - enemy.motion.y;
    let magnitude = (move_x * move_x + move_y * move_y).sqrt();
    if magnitude > 0.0 && magnitude.is_finite() {
        move_x /= magnitude;
        move_y /= magnitude;
    } else {
        move_x = 0.0;
        move_y = 0.0;
    }

    let target_ref = EntityRef::player(target.id);
    let mut touching = false;

    let step_x = move_x * enemy.speed * dt;
    let step_y = move_y * enemy.speed * dt;
    for (dx, dy) in [(step_x, 0.0), (0.0, step_y)] {
        let (start_x, start_y) = (enemy.motion.x, enemy.motion.y);
        enemy.motion.x += dx;
        enemy.motion.y += dy;

        let moved = enemy.collider();
        candidates.clear();
        tree.retrieve_into(candidates, &moved);

        if let Some(blocker) = candidates.iter().find(|c| c.collides_with(&moved)) {
            if blocker.owner == Some(target_ref) {
                touching = true;
            }
            enemy.motion.x = start_x;
            enemy.motion.y = start_y;
        }
    }

    enemy.motion.direction = Direction::from_movement(move_x, move_y, enemy.motion.direction);
    enemy.motion.snap();
    touching
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::entity::ProjectileType;
    use shared::protocol::{
        PlayerDropItemData, PlayerMoveData, PlayerUpdateDirectionData, UpdateItemData,
    };
    use shared::Dispatch;

    fn test_state(max_enemies: usize) -> GameState {
        GameState::new(&ServerConfig {
            max_enemies,
            seed: Some(42),
            ..ServerConfig::default()
        })
    }

    fn broadcasts(outbox: &[Outbound]) -> Vec<(&Message, Option<SessionId>)> {
        outbox
            .iter()
            .filter_map(|item| match item {
                Outbound::Broadcast { message, exclude } => Some((message, *exclude)),
                Outbound::Send { .. } => None,
            })
            .collect()
    }

    fn sent_to(outbox: &[Outbound], session: SessionId) -> Vec<&Message> {
        outbox
            .iter()
            .filter_map(|item| match item {
                Outbound::Send { to, message } if *to == session => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_announces_and_sends_roster() {
        let mut state = test_state(1);
        state.on_connect(0);
        state.tick(1.0 / 60.0);
        state.take_outbox();

        state.on_connect(1);
        let outbox = state.take_outbox();

        let announced = broadcasts(&outbox);
        assert_eq!(announced.len(), 1);
        assert!(matches!(announced[0], (Message::PlayerJoin(data), None) if data.id == 1));

        let roster = sent_to(&outbox, 1);
        assert_eq!(roster.len(), 3);
        assert!(matches!(roster[0], Message::PlayerJoin(data) if data.id == 0));
        assert!(matches!(roster[1], Message::EnemySpawn(data) if data.id == 0));
        assert!(matches!(roster[2], Message::UpdateDroppedItems(_)));

        let player = &state.world().players[&1];
        assert!(player.motion.x >= 0.0 && player.motion.x < 100.0);
        assert!(player.motion.y >= 0.0 && player.motion.y < 100.0);
    }

    #[test]
    fn test_disconnect_removes_player_once() {
        let mut state = test_state(0);
        state.on_connect(0);
        state.take_outbox();

        state.on_disconnect(0);
        state.on_disconnect(0);
        let outbox = state.take_outbox();

        assert!(state.world().players.is_empty());
        assert_eq!(
            outbox,
            vec![Outbound::Broadcast {
                message: Message::PlayerDisconnect(PlayerDisconnectData { id: 0 }),
                exclude: None
            }]
        );
    }

    #[test]
    fn test_move_is_applied_and_relayed_to_others() {
        let registry = GameState::registry();
        let mut state = test_state(0);
        state.on_connect(0);
        state.on_connect(1);
        state.take_outbox();

        let moved = Message::PlayerMove(PlayerMoveData { id: 0, x: 5.0, y: 5.0 });
        assert_eq!(registry.dispatch(&mut state, 0, &moved), Dispatch::Handled);

        let player = &state.world().players[&0];
        assert_eq!((player.motion.x, player.motion.y), (5.0, 5.0));
        assert_eq!(
            state.take_outbox(),
            vec![Outbound::Broadcast {
                message: moved,
                exclude: Some(0)
            }]
        );
    }

    #[test]
    fn test_move_for_another_player_is_ignored() {
        let registry = GameState::registry();
        let mut state = test_state(0);
        state.on_connect(0);
        state.on_connect(1);
        state.take_outbox();
        let before = state.world().players[&1].motion.clone();

        let spoofed = Message::PlayerMove(PlayerMoveData { id: 1, x: 50.0, y: 50.0 });
        registry.dispatch(&mut state, 0, &spoofed);

        assert_eq!(state.world().players[&1].motion, before);
        assert!(state.take_outbox().is_empty());
    }

    #[test]
    fn test_non_finite_move_is_ignored() {
        let registry = GameState::registry();
        let mut state = test_state(1);
        state.on_connect(0);
        state.on_connect(1);
        state.tick(1.0 / 60.0);
        state.take_outbox();
        let before = state.world().players[&0].motion.clone();

        for (x, y) in [(f32::NAN, 0.0), (0.0, f32::INFINITY), (f32::NEG_INFINITY, f32::NAN)] {
            let moved = Message::PlayerMove(PlayerMoveData { id: 0, x, y });
            registry.dispatch(&mut state, 0, &moved);
        }
        assert_eq!(state.world().players[&0].motion, before);
        assert!(state.take_outbox().is_empty());

        // Enemies keep chasing from finite positions
        state.tick(1.0 / 60.0);
        for enemy in state.world().enemies.values() {
            assert!(enemy.motion.x.is_finite() && enemy.motion.y.is_finite());
        }
    }

    #[test]
    fn test_server_originated_types_are_unregistered() {
        let registry = GameState::registry();
        let mut state = test_state(0);

        let result = registry.dispatch(
            &mut state,
            0,
            &Message::PlayerDamage(PlayerDamageData { id: 0, damage: 5 }),
        );
        assert_eq!(result, Dispatch::Unregistered);
    }

    #[test]
    fn test_direction_update_is_relayed() {
        let registry = GameState::registry();
        let mut state = test_state(0);
        state.on_connect(0);
        state.take_outbox();

        let turned = Message::PlayerUpdateDirection(PlayerUpdateDirectionData {
            id: 0,
            direction: Direction::Left.to_i32(),
        });
        registry.dispatch(&mut state, 0, &turned);
        assert_eq!(state.world().players[&0].motion.direction, Direction::Left);
        assert_eq!(broadcasts(&state.take_outbox()), vec![(&turned, Some(0))]);

        let invalid = Message::PlayerUpdateDirection(PlayerUpdateDirectionData {
            id: 0,
            direction: 17,
        });
        registry.dispatch(&mut state, 0, &invalid);
        assert_eq!(state.world().players[&0].motion.direction, Direction::Left);
        assert!(state.take_outbox().is_empty());
    }

    #[test]
    fn test_drop_item_is_broadcast_to_everyone() {
        let registry = GameState::registry();
        let mut state = test_state(0);
        state.on_connect(0);
        state.take_outbox();

        let dropped = Message::PlayerDropItem(PlayerDropItemData { id: 0, index: 1 });
        registry.dispatch(&mut state, 0, &dropped);

        assert_eq!(state.world().players[&0].inventory.len(), 2);
        assert_eq!(state.world().dropped_items.len(), 1);
        assert_eq!(broadcasts(&state.take_outbox()), vec![(&dropped, None)]);

        let out_of_range = Message::PlayerDropItem(PlayerDropItemData { id: 0, index: 9 });
        registry.dispatch(&mut state, 0, &out_of_range);
        assert!(state.take_outbox().is_empty());
    }

    #[test]
    fn test_item_use_spawns_projectile_and_relays() {
        let registry = GameState::registry();
        let mut state = test_state(0);
        state.on_connect(0);
        state.take_outbox();

        let used = Message::UpdateItem(UpdateItemData {
            player_id: 0,
            index: 0,
        });
        registry.dispatch(&mut state, 0, &used);

        assert_eq!(state.world().projectiles.len(), 1);
        assert_eq!(
            state.world().projectiles[0].projectile_type,
            ProjectileType::Dagger
        );
        assert_eq!(broadcasts(&state.take_outbox()), vec![(&used, Some(0))]);
    }

    #[test]
    fn test_enemies_spawn_one_per_tick_up_to_limit() {
        let mut state = test_state(3);
        for _ in 0..5 {
            state.tick(1.0 / 60.0);
        }

        assert_eq!(state.world().enemies.len(), 3);
        let outbox = state.take_outbox();
        let spawns: Vec<_> = broadcasts(&outbox)
            .into_iter()
            .filter_map(|(message, _)| match message {
                Message::EnemySpawn(data) => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(spawns.len(), 3);
        for spawn in spawns {
            assert!(spawn.x >= 100.0 && spawn.x < 300.0);
            assert!(spawn.y >= 100.0 && spawn.y < 300.0);
        }
    }

    #[test]
    fn test_enemy_moves_every_tick() {
        let mut state = test_state(1);
        state.tick(1.0 / 60.0);
        state.take_outbox();

        state.tick(1.0 / 60.0);
        let outbox = state.take_outbox();
        let moves = broadcasts(&outbox)
            .into_iter()
            .filter(|(message, _)| matches!(message, Message::EnemyMove(_)))
            .count();
        assert_eq!(moves, 1);
    }

    #[test]
    fn test_enemy_chases_and_attacks() {
        let mut state = test_state(0);
        state.on_connect(0);
        state
            .world
            .players
            .insert(0, Player::new(0, 200.0, 100.0));
        state
            .world
            .enemies
            .insert(0, Enemy::new(0, EnemyType::Default, 100.0, 100.0));
        state.take_outbox();

        state.tick(0.1);
        let enemy = &state.world().enemies[&0];
        assert_approx_eq!(enemy.motion.x, 110.0);
        assert_approx_eq!(enemy.motion.y, 100.0);
        assert_eq!(enemy.motion.direction, Direction::Right);

        let outbox = state.take_outbox();
        assert!(broadcasts(&outbox).iter().any(|(message, _)| matches!(
            message,
            Message::EnemyUpdateDirection(data) if data.direction == Direction::Right.to_i32()
        )));

        // Walk until the enemy is blocked by the player and strikes
        let mut damage = 0;
        for _ in 0..100 {
            state.tick(0.1);
            for (message, _) in broadcasts(&state.take_outbox()) {
                if let Message::PlayerDamage(data) = message {
                    assert_eq!(data.id, 0);
                    damage += data.damage;
                }
            }
        }
        assert!(damage > 0);
        assert_eq!(state.world().players[&0].health, 100 - damage);

        // Blocked by the player, never overlapping it
        let enemy = &state.world().enemies[&0];
        let player = &state.world().players[&0];
        assert!(!enemy.collider().collides_with(&player.collider()));
    }

    #[test]
    fn test_projectile_kills_enemy_and_drops_item() {
        let mut state = test_state(0);
        state.on_connect(0);
        let mut player = Player::new(0, 10.0, 10.0);
        player.motion.direction = Direction::Right;
        state.world.players.insert(0, player);
        let mut enemy = Enemy::new(5, EnemyType::Default, 300.0, 10.0);
        enemy.health = 10;
        enemy.speed = 0.0;
        state.world.enemies.insert(5, enemy);
        state.take_outbox();

        let registry = GameState::registry();
        registry.dispatch(
            &mut state,
            0,
            &Message::UpdateItem(UpdateItemData {
                player_id: 0,
                index: 0,
            }),
        );

        let mut events = Vec::new();
        for _ in 0..60 {
            state.tick(1.0 / 60.0);
            events.extend(state.take_outbox());
        }

        assert!(state.world().enemies.is_empty());
        assert!(state.world().projectiles.is_empty());
        assert_eq!(state.world().dropped_items.len(), 1);

        let broadcast = broadcasts(&events);
        assert!(broadcast.iter().any(|(message, _)| matches!(
            message,
            Message::EnemyDamage(data) if data.id == 5 && data.damage == 10
        )));
        assert!(broadcast
            .iter()
            .any(|(message, _)| matches!(message, Message::UpdateDroppedItems(data) if data.types.len() == 1)));
    }
}
