//! Quadtree broadphase over axis-aligned boxes
//!
//! The tree is cleared and refilled from the live entity set every tick. A
//! `retrieve` returns *candidates* only; callers still run
//! [`Collider::collides_with`] on each of them.

use crate::entity::EntityRef;

/// Colliders a node holds before it tries to split
pub const MAX_OBJECTS: usize = 10;
/// Deepest level a node may split at
pub const MAX_LEVELS: u32 = 5;

/// Axis-aligned box with an optional back-reference to the entity it belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collider {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub owner: Option<EntityRef>,
}

impl Collider {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            owner: None,
        }
    }

    pub fn owned_by(x: f32, y: f32, width: f32, height: f32, owner: EntityRef) -> Self {
        Self {
            x,
            y,
            width,
            height,
            owner: Some(owner),
        }
    }

    /// Inclusive overlap test. Two boxes of the same owner never collide.
    pub fn collides_with(&self, other: &Collider) -> bool {
        if self.owner.is_some() && self.owner == other.owner {
            return false;
        }

        self.x + self.width >= other.x
            && self.x <= other.x + other.width
            && self.y + self.height >= other.y
            && self.y <= other.y + other.height
    }
}

#[derive(Debug)]
pub struct Quadtree {
    level: u32,
    bounds: Collider,
    colliders: Vec<Collider>,
    // NE, NW, SW, SE
    nodes: Option<Box<[Quadtree; 4]>>,
}

impl Quadtree {
    pub fn new(bounds: Collider) -> Self {
        Self::with_level(0, bounds)
    }

    fn with_level(level: u32, bounds: Collider) -> Self {
        Self {
            level,
            bounds,
            colliders: Vec::new(),
            nodes: None,
        }
    }

    pub fn bounds(&self) -> Collider {
        self.bounds
    }

    /// Drops every collider and every child node
    pub fn clear(&mut self) {
        self.colliders.clear();
        self.nodes = None;
    }

    /// Total number of colliders stored in this subtree
    pub fn len(&self) -> usize {
        self.colliders.len()
            + self
                .nodes
                .as_ref()
                .map_or(0, |nodes| nodes.iter().map(Quadtree::len).sum())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Depth of the deepest node, 0 for an unsplit root
    pub fn depth(&self) -> u32 {
        match &self.nodes {
            Some(nodes) => nodes.iter().map(Quadtree::depth).max().unwrap_or(0) + 1,
            None => 0,
        }
    }

    fn split(&mut self) {
        let half_width = self.bounds.width / 2.0;
        let half_height = self.bounds.height / 2.0;
        let x = self.bounds.x;
        let y = self.bounds.y;
        let level = self.level + 1;

        self.nodes = Some(Box::new([
            Quadtree::with_level(level, Collider::new(x + half_width, y, half_width, half_height)),
            Quadtree::with_level(level, Collider::new(x, y, half_width, half_height)),
            Quadtree::with_level(level, Collider::new(x, y + half_height, half_width, half_height)),
            Quadtree::with_level(
                level,
                Collider::new(x + half_width, y + half_height, half_width, half_height),
            ),
        ]));
    }

    /// Child quadrant that fully contains `collider`, if exactly one does
    fn quadrant(&self, collider: &Collider) -> Option<usize> {
        let vertical_mid = self.bounds.x + self.bounds.width / 2.0;
        let horizontal_mid = self.bounds.y + self.bounds.height / 2.0;

        let top = collider.y < horizontal_mid && collider.y + collider.height < horizontal_mid;
        let bottom = collider.y > horizontal_mid;
        let left = collider.x < vertical_mid && collider.x + collider.width < vertical_mid;
        let right = collider.x > vertical_mid;

        match (left, right, top, bottom) {
            (false, true, true, _) => Some(0),
            (true, _, true, _) => Some(1),
            (true, _, _, true) => Some(2),
            (false, true, _, true) => Some(3),
            _ => None,
        }
    }

    pub fn insert(&mut self, collider: Collider) {
        if let Some(index) = self.quadrant(&collider) {
            if let Some(nodes) = self.nodes.as_mut() {
                nodes[index].insert(collider);
                return;
            }
        }

        self.colliders.push(collider);

        if self.colliders.len() > MAX_OBJECTS && self.level < MAX_LEVELS {
            if self.nodes.is_none() {
                self.split();
            }

            let held = std::mem::take(&mut self.colliders);
            for collider in held {
                match self.quadrant(&collider) {
                    Some(index) => {
                        if let Some(nodes) = self.nodes.as_mut() {
                            nodes[index].insert(collider);
                        }
                    }
                    None => self.colliders.push(collider),
                }
            }
        }
    }

    /// Broadphase candidates for `area`
    ///
    /// Returns everything stored at this node, plus the matching child's
    /// candidates when `area` lies inside a single quadrant. An area that
    /// straddles a midline does not see colliders stored below that point.
    pub fn retrieve(&self, area: &Collider) -> Vec<Collider> {
        let mut found = Vec::new();
        self.retrieve_into(&mut found, area);
        found
    }

    /// Appends candidates to `found`, so a caller can reuse one buffer per tick
    pub fn retrieve_into(&self, found: &mut Vec<Collider>, area: &Collider) {
        if let (Some(index), Some(nodes)) = (self.quadrant(area), self.nodes.as_ref()) {
            nodes[index].retrieve_into(found, area);
        }
        found.extend_from_slice(&self.colliders);
    }

    /// Candidates that actually overlap `area`
    pub fn overlapping(&self, area: &Collider) -> Vec<Collider> {
        let mut found = self.retrieve(area);
        found.retain(|candidate| candidate.collides_with(area));
        found
    }
}
