//! Client replica of the world
//!
//! The local player is simulated here and reported to the server; every
//! other entity is a replica that eases toward the positions the server
//! sends. Outgoing messages are queued and sent by the client loop.

use crate::input::InputFrame;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::entity::{Enemy, Player};
use shared::protocol::{PlayerDropItemData, PlayerMoveData, PlayerUpdateDirectionData, UpdateItemData};
use shared::quadtree::{Collider, Quadtree};
use shared::sync::Direction;
use shared::world::World;
use shared::{HandlerRegistry, Message, MessageType, SessionId, UNIDENTIFIED, WORLD_HEIGHT, WORLD_WIDTH};

pub struct ClientGameState {
    world: World,
    local_id: SessionId,
    quadtree: Quadtree,
    outbox: Vec<Message>,
    last_sent_direction: Option<Direction>,
    rng: StdRng,
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            local_id: UNIDENTIFIED,
            quadtree: Quadtree::new(Collider::new(0.0, 0.0, WORLD_WIDTH, WORLD_HEIGHT)),
            outbox: Vec::new(),
            last_sent_direction: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Handlers for every server-originated message type
    pub fn registry() -> HandlerRegistry<ClientGameState> {
        HandlerRegistry::builder()
            .on(MessageType::PlayerJoin, ClientGameState::handle_player_join)
            .on(MessageType::PlayerDisconnect, ClientGameState::handle_player_disconnect)
            .on(MessageType::PlayerMove, ClientGameState::handle_player_move)
            .on(MessageType::PlayerDamage, ClientGameState::handle_player_damage)
            .on(MessageType::PlayerDropItem, ClientGameState::handle_player_drop_item)
            .on(MessageType::PlayerUpdateDirection, ClientGameState::handle_player_direction)
            .on(MessageType::EnemySpawn, ClientGameState::handle_enemy_spawn)
            .on(MessageType::EnemyMove, ClientGameState::handle_enemy_move)
            .on(MessageType::EnemyDamage, ClientGameState::handle_enemy_damage)
            .on(MessageType::EnemyUpdateDirection, ClientGameState::handle_enemy_direction)
            .on(MessageType::UpdateDroppedItems, ClientGameState::handle_dropped_items)
            .on(MessageType::UpdateItem, ClientGameState::handle_update_item)
            .build()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn local_id(&self) -> SessionId {
        self.local_id
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.world.players.get(&self.local_id)
    }

    /// Indices of the dropped items the local player stands on
    pub fn items_underfoot(&self) -> Vec<usize> {
        self.local_player()
            .map(|player| self.world.dropped_items_under(&player.collider()))
            .unwrap_or_default()
    }

    pub fn on_connected(&mut self, session: SessionId) {
        info!("Playing as {}", session);
        self.local_id = session;
    }

    pub fn take_outbox(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    fn is_local(&self, id: SessionId) -> bool {
        self.local_id != UNIDENTIFIED && id == self.local_id
    }

    fn handle_player_join(&mut self, _session: SessionId, message: &Message) {
        let Message::PlayerJoin(data) = message else {
            warn!("PlayerJoin handler got {}", message.message_type());
            return;
        };
        debug!("Player {} joined at ({}, {})", data.id, data.x, data.y);
        self.world.players.insert(data.id, Player::from_join_data(data));
    }

    fn handle_player_disconnect(&mut self, _session: SessionId, message: &Message) {
        let Message::PlayerDisconnect(data) = message else {
            warn!("PlayerDisconnect handler got {}", message.message_type());
            return;
        };
        if self.world.remove_player(data.id).is_some() {
            debug!("Player {} left", data.id);
        }
    }

    fn handle_player_move(&mut self, _session: SessionId, message: &Message) {
        let Message::PlayerMove(data) = message else {
            warn!("PlayerMove handler got {}", message.message_type());
            return;
        };
        if self.is_local(data.id) {
            return;
        }
        if !data.x.is_finite() || !data.y.is_finite() {
            warn!("Non-finite position for player {}, ignoring", data.id);
            return;
        }
        if let Some(player) = self.world.players.get_mut(&data.id) {
            player.motion.set_authoritative(data.x, data.y);
        }
    }

    fn handle_player_damage(&mut self, _session: SessionId, message: &Message) {
        let Message::PlayerDamage(data) = message else {
            warn!("PlayerDamage handler got {}", message.message_type());
            return;
        };
        if let Some(player) = self.world.players.get_mut(&data.id) {
            player.take_damage(data.damage);
        }
    }

    fn handle_player_drop_item(&mut self, _session: SessionId, message: &Message) {
        let Message::PlayerDropItem(data) = message else {
            warn!("PlayerDropItem handler got {}", message.message_type());
            return;
        };
        self.world.drop_item(data.id, data.index);
    }

    fn handle_player_direction(&mut self, _session: SessionId, message: &Message) {
        let Message::PlayerUpdateDirection(data) = message else {
            warn!("PlayerUpdateDirection handler got {}", message.message_type());
            return;
        };
        if self.is_local(data.id) {
            return;
        }
        let Some(direction) = Direction::from_i32(data.direction) else {
            warn!("Invalid direction {} for player {}", data.direction, data.id);
            return;
        };
        if let Some(player) = self.world.players.get_mut(&data.id) {
            player.motion.direction = direction;
        }
    }

    fn handle_enemy_spawn(&mut self, _session: SessionId, message: &Message) {
        let Message::EnemySpawn(data) = message else {
            warn!("EnemySpawn handler got {}", message.message_type());
            return;
        };
        match Enemy::from_spawn_data(data) {
            Some(enemy) => {
                self.world.enemies.insert(enemy.id, enemy);
            }
            None => warn!("Unknown enemy type {} for enemy {}", data.enemy_type, data.id),
        }
    }

    fn handle_enemy_move(&mut self, _session: SessionId, message: &Message) {
        let Message::EnemyMove(data) = message else {
            warn!("EnemyMove handler got {}", message.message_type());
            return;
        };
        if !data.x.is_finite() || !data.y.is_finite() {
            warn!("Non-finite position for enemy {}, ignoring", data.id);
            return;
        }
        if let Some(enemy) = self.world.enemies.get_mut(&data.id) {
            enemy.motion.set_authoritative(data.x, data.y);
        }
    }

    fn handle_enemy_damage(&mut self, _session: SessionId, message: &Message) {
        let Message::EnemyDamage(data) = message else {
            warn!("EnemyDamage handler got {}", message.message_type());
            return;
        };
        let Some(enemy) = self.world.enemies.get_mut(&data.id) else {
            return;
        };
        enemy.take_damage(data.damage);
        if enemy.is_dead() {
            self.world.enemies.remove(&data.id);
        }
    }

    fn handle_enemy_direction(&mut self, _session: SessionId, message: &Message) {
        let Message::EnemyUpdateDirection(data) = message else {
            warn!("EnemyUpdateDirection handler got {}", message.message_type());
            return;
        };
        let Some(direction) = Direction::from_i32(data.direction) else {
            warn!("Invalid direction {} for enemy {}", data.direction, data.id);
            return;
        };
        if let Some(enemy) = self.world.enemies.get_mut(&data.id) {
            enemy.motion.direction = direction;
        }
    }

    fn handle_dropped_items(&mut self, _session: SessionId, message: &Message) {
        let Message::UpdateDroppedItems(data) = message else {
            warn!("UpdateDroppedItems handler got {}", message.message_type());
            return;
        };
        self.world.apply_dropped_items(data);
    }

    fn handle_update_item(&mut self, _session: SessionId, message: &Message) {
        let Message::UpdateItem(data) = message else {
            warn!("UpdateItem handler got {}", message.message_type());
            return;
        };
        if self.is_local(data.player_id) {
            return;
        }
        self.world.use_item(data.player_id, data.index, &mut self.rng);
    }

    /// Per render frame: drives the local player from input, smooths
    /// everything else and advances projectiles
    pub fn update_frame(&mut self, input: &InputFrame, frame_time: f32) {
        self.update_local_player(input, frame_time);

        let local_id = self.local_id;
        for player in self.world.players.values_mut() {
            if player.id != local_id {
                player.motion.update_remote(frame_time);
            }
        }
        for enemy in self.world.enemies.values_mut() {
            enemy.motion.update_remote(frame_time);
        }

        // Hits only remove the projectile here; damage arrives from the server
        self.quadtree.clear();
        for enemy in self.world.enemies.values() {
            self.quadtree.insert(enemy.collider());
        }
        self.world.advance_projectiles(frame_time, &self.quadtree);
    }

    fn update_local_player(&mut self, input: &InputFrame, frame_time: f32) {
        let local_id = self.local_id;
        let Some(player) = self.world.players.get_mut(&local_id) else {
            return;
        };

        let speed = player.speed;
        player
            .motion
            .update_local(input.move_x * speed, input.move_y * speed, frame_time);

        let fired: Vec<usize> = player
            .inventory
            .items_mut()
            .iter_mut()
            .enumerate()
            .filter_map(|(index, item)| item.ready(frame_time).then_some(index))
            .collect();

        for index in fired {
            let index = index as i32;
            self.world.use_item(local_id, index, &mut self.rng);
            self.outbox.push(Message::UpdateItem(UpdateItemData {
                player_id: local_id,
                index,
            }));
        }

        // Applied when the server echoes it back to everyone
        if let Some(slot) = input.drop_slot {
            self.outbox.push(Message::PlayerDropItem(PlayerDropItemData {
                id: local_id,
                index: slot as i32,
            }));
        }
    }

    /// Per simulation tick: reports the local player's position and facing
    pub fn on_tick(&mut self) {
        if self.local_id == UNIDENTIFIED {
            return;
        }
        let Some(player) = self.world.players.get(&self.local_id) else {
            return;
        };

        let position = PlayerMoveData {
            id: self.local_id,
            x: player.motion.x,
            y: player.motion.y,
        };
        let direction = player.motion.direction;

        self.outbox.push(Message::PlayerMove(position));
        if self.last_sent_direction != Some(direction) {
            self.last_sent_direction = Some(direction);
            self.outbox
                .push(Message::PlayerUpdateDirection(PlayerUpdateDirectionData {
                    id: self.local_id,
                    direction: direction.to_i32(),
                }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::entity::{EnemyType, ItemType, ProjectileType};
    use shared::protocol::{
        EnemyDamageData, EnemyMoveData, PlayerDamageData, PlayerDisconnectData,
        UpdateDroppedItemsData,
    };
    use shared::Dispatch;

    fn joined(id: SessionId, x: f32, y: f32) -> Message {
        Message::PlayerJoin(Player::new(id, x, y).to_join_data())
    }

    fn connected_state(local: SessionId) -> (ClientGameState, HandlerRegistry<ClientGameState>) {
        let registry = ClientGameState::registry();
        let mut state = ClientGameState::new();
        state.on_connected(local);
        registry.dispatch(&mut state, local, &joined(local, 10.0, 10.0));
        (state, registry)
    }

    #[test]
    fn test_registry_covers_server_messages() {
        let registry = ClientGameState::registry();
        for message_type in MessageType::ALL {
            let expected = message_type != MessageType::Initialize;
            assert_eq!(registry.handles(message_type), expected, "{}", message_type);
        }
    }

    #[test]
    fn test_join_and_disconnect() {
        let (mut state, registry) = connected_state(0);
        registry.dispatch(&mut state, 0, &joined(1, 50.0, 60.0));
        assert_eq!(state.world().players.len(), 2);
        assert_eq!(state.world().players[&1].motion.visual_x, 50.0);

        registry.dispatch(
            &mut state,
            0,
            &Message::PlayerDisconnect(PlayerDisconnectData { id: 1 }),
        );
        assert_eq!(state.world().players.len(), 1);

        // Departed ids are ignored
        let result = registry.dispatch(
            &mut state,
            0,
            &Message::PlayerMove(PlayerMoveData { id: 1, x: 1.0, y: 1.0 }),
        );
        assert_eq!(result, Dispatch::Handled);
        assert_eq!(state.world().players.len(), 1);
    }

    #[test]
    fn test_remote_move_is_smoothed() {
        let (mut state, registry) = connected_state(0);
        registry.dispatch(&mut state, 0, &joined(1, 0.0, 0.0));
        registry.dispatch(
            &mut state,
            0,
            &Message::PlayerMove(PlayerMoveData { id: 1, x: 5.0, y: 5.0 }),
        );

        let remote = &state.world().players[&1];
        assert_eq!((remote.motion.x, remote.motion.y), (5.0, 5.0));
        assert_eq!(remote.motion.visual_x, 0.0);

        state.update_frame(&InputFrame::default(), 0.05);
        let remote = &state.world().players[&1];
        assert_approx_eq!(remote.motion.visual_x, 2.5);
        assert_approx_eq!(remote.motion.visual_y, 2.5);
    }

    #[test]
    fn test_moves_for_local_player_are_ignored() {
        let (mut state, registry) = connected_state(3);
        registry.dispatch(
            &mut state,
            3,
            &Message::PlayerMove(PlayerMoveData { id: 3, x: 99.0, y: 99.0 }),
        );
        assert_eq!(state.local_player().unwrap().motion.x, 10.0);
    }

    #[test]
    fn test_local_player_follows_input() {
        let (mut state, _registry) = connected_state(0);
        state.update_frame(&InputFrame::moving(1.0, 0.0), 0.1);

        let player = state.local_player().unwrap();
        assert_approx_eq!(player.motion.x, 25.0);
        assert_eq!(player.motion.visual_x, player.motion.x);
        assert_eq!(player.motion.direction, Direction::Right);
    }

    #[test]
    fn test_tick_reports_position_and_direction_changes() {
        let (mut state, _registry) = connected_state(0);
        state.take_outbox();

        state.on_tick();
        assert_eq!(
            state.take_outbox(),
            vec![
                Message::PlayerMove(PlayerMoveData { id: 0, x: 10.0, y: 10.0 }),
                Message::PlayerUpdateDirection(PlayerUpdateDirectionData {
                    id: 0,
                    direction: Direction::Down.to_i32()
                }),
            ]
        );

        state.on_tick();
        assert_eq!(state.take_outbox().len(), 1);

        state.update_frame(&InputFrame::moving(-1.0, 0.0), 0.01);
        state.take_outbox();
        state.on_tick();
        let outbox = state.take_outbox();
        assert_eq!(outbox.len(), 2);
        assert!(matches!(
            &outbox[1],
            Message::PlayerUpdateDirection(data) if data.direction == Direction::Left.to_i32()
        ));
    }

    #[test]
    fn test_no_reports_before_identified() {
        let registry = ClientGameState::registry();
        let mut state = ClientGameState::new();
        registry.dispatch(&mut state, UNIDENTIFIED, &joined(0, 1.0, 1.0));

        state.on_tick();
        state.update_frame(&InputFrame::moving(1.0, 1.0), 1.0);
        assert!(state.take_outbox().is_empty());
        assert_eq!(state.world().players[&0].motion.x, 1.0);
    }

    #[test]
    fn test_items_fire_on_cooldown() {
        let (mut state, _registry) = connected_state(0);
        state.take_outbox();

        // Both daggers are ready after half a second, the shield is not
        state.update_frame(&InputFrame::default(), 0.5);
        let outbox = state.take_outbox();
        assert_eq!(
            outbox,
            vec![
                Message::UpdateItem(UpdateItemData { player_id: 0, index: 0 }),
                Message::UpdateItem(UpdateItemData { player_id: 0, index: 2 }),
            ]
        );
        assert_eq!(state.world().projectiles.len(), 2);
        assert!(state
            .world()
            .projectiles
            .iter()
            .all(|p| p.projectile_type == ProjectileType::Dagger));
    }

    #[test]
    fn test_drop_waits_for_server_echo() {
        let (mut state, registry) = connected_state(0);
        state.take_outbox();

        let input = InputFrame {
            drop_slot: Some(1),
            ..InputFrame::default()
        };
        state.update_frame(&input, 0.01);
        let outbox = state.take_outbox();
        assert_eq!(
            outbox,
            vec![Message::PlayerDropItem(PlayerDropItemData { id: 0, index: 1 })]
        );
        assert_eq!(state.local_player().unwrap().inventory.len(), 3);

        registry.dispatch(&mut state, 0, &outbox[0]);
        assert_eq!(state.local_player().unwrap().inventory.len(), 2);
        assert_eq!(state.world().dropped_items[0].item_type, ItemType::Shield);
    }

    #[test]
    fn test_non_finite_positions_are_ignored() {
        let (mut state, registry) = connected_state(0);
        registry.dispatch(&mut state, 0, &joined(1, 20.0, 30.0));
        let enemy = Enemy::new(4, EnemyType::Default, 150.0, 150.0);
        registry.dispatch(&mut state, 0, &Message::EnemySpawn(enemy.to_spawn_data()));

        registry.dispatch(
            &mut state,
            0,
            &Message::PlayerMove(PlayerMoveData { id: 1, x: f32::NAN, y: 5.0 }),
        );
        registry.dispatch(
            &mut state,
            0,
            &Message::EnemyMove(EnemyMoveData { id: 4, x: 1.0, y: f32::INFINITY }),
        );
        state.update_frame(&InputFrame::default(), 0.05);

        let remote = &state.world().players[&1];
        assert_eq!((remote.motion.x, remote.motion.y), (20.0, 30.0));
        assert!(remote.motion.visual_x.is_finite());
        let enemy = &state.world().enemies[&4];
        assert_eq!((enemy.motion.x, enemy.motion.y), (150.0, 150.0));
    }

    #[test]
    fn test_items_underfoot() {
        let (mut state, registry) = connected_state(0);
        assert!(state.items_underfoot().is_empty());

        registry.dispatch(
            &mut state,
            0,
            &Message::UpdateDroppedItems(UpdateDroppedItemsData {
                types: vec![0, 1],
                xs: vec![400.0, 15.0],
                ys: vec![400.0, 15.0],
            }),
        );
        assert_eq!(state.items_underfoot(), vec![1]);
    }

    #[test]
    fn test_enemy_lifecycle() {
        let (mut state, registry) = connected_state(0);
        let enemy = Enemy::new(4, EnemyType::Default, 150.0, 150.0);
        registry.dispatch(&mut state, 0, &Message::EnemySpawn(enemy.to_spawn_data()));
        registry.dispatch(
            &mut state,
            0,
            &Message::EnemyMove(EnemyMoveData { id: 4, x: 160.0, y: 150.0 }),
        );
        assert_eq!(state.world().enemies[&4].motion.x, 160.0);

        registry.dispatch(
            &mut state,
            0,
            &Message::EnemyDamage(EnemyDamageData { id: 4, damage: 10 }),
        );
        assert_eq!(state.world().enemies[&4].health, 20);

        registry.dispatch(
            &mut state,
            0,
            &Message::EnemyDamage(EnemyDamageData { id: 4, damage: 20 }),
        );
        assert!(state.world().enemies.is_empty());
    }

    #[test]
    fn test_damage_and_dropped_items() {
        let (mut state, registry) = connected_state(0);
        registry.dispatch(
            &mut state,
            0,
            &Message::PlayerDamage(PlayerDamageData { id: 0, damage: 15 }),
        );
        let player = state.local_player().unwrap();
        assert_eq!(player.health, 85);
        assert_eq!(player.motion.flash_amount, 1.0);

        registry.dispatch(
            &mut state,
            0,
            &Message::UpdateDroppedItems(UpdateDroppedItemsData {
                types: vec![0, 1],
                xs: vec![1.0, 2.0],
                ys: vec![3.0, 4.0],
            }),
        );
        assert_eq!(state.world().dropped_items.len(), 2);
    }

    #[test]
    fn test_remote_item_use_spawns_projectile() {
        let (mut state, registry) = connected_state(0);
        registry.dispatch(&mut state, 0, &joined(1, 0.0, 0.0));

        registry.dispatch(
            &mut state,
            0,
            &Message::UpdateItem(UpdateItemData { player_id: 1, index: 1 }),
        );
        assert_eq!(state.world().projectiles.len(), 1);
        assert_eq!(state.world().projectiles[0].projectile_type, ProjectileType::Shield);

        // Echoes of our own item use are not applied twice
        registry.dispatch(
            &mut state,
            0,
            &Message::UpdateItem(UpdateItemData { player_id: 0, index: 0 }),
        );
        assert_eq!(state.world().projectiles.len(), 1);
    }
}
