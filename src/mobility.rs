use std::f64::consts::TAU;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    quantities::{Float, Time, TimeSpan},
    topology::NodeId,
    util::rand::{ContinuousDistribution, Rng},
};

#[derive(PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Position {
    pub x: Float,
    pub y: Float,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0., y: 0. };
}

#[derive(PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: Float,
    pub max_x: Float,
    pub min_y: Float,
    pub max_y: Float,
}

impl Rect {
    #[must_use]
    pub fn new(min_x: Float, max_x: Float, min_y: Float, max_y: Float) -> Rect {
        assert!(min_x < max_x && min_y < max_y, "degenerate bounds");
        Rect {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    #[must_use]
    pub fn contains(&self, p: Position) -> bool {
        (self.min_x..=self.max_x).contains(&p.x) && (self.min_y..=self.max_y).contains(&p.y)
    }
}

/// Deterministic row-major grid placement: the position of node `k` is a
/// pure function of `k` and the layout parameters.
#[derive(PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GridLayout {
    pub min_x: Float,
    pub min_y: Float,
    pub delta_x: Float,
    pub delta_y: Float,
    pub columns: usize,
}

impl GridLayout {
    #[must_use]
    pub fn position(&self, index: usize) -> Position {
        assert!(self.columns > 0, "grid needs at least one column");
        Position {
            x: self.min_x + (index % self.columns) as Float * self.delta_x,
            y: self.min_y + (index / self.columns) as Float * self.delta_y,
        }
    }
}

/// Where a node is at a given simulated time. Queries must not go
/// backwards in time; models are free to advance internal state.
pub trait MotionModel {
    fn position_at(&mut self, time: Time) -> Position;
}

pub struct ConstantPosition {
    position: Position,
}

impl ConstantPosition {
    #[must_use]
    pub const fn new(position: Position) -> ConstantPosition {
        ConstantPosition { position }
    }
}

impl MotionModel for ConstantPosition {
    fn position_at(&mut self, _time: Time) -> Position {
        self.position
    }
}

/// A continuous-time random walk confined to a rectangle. The walker picks
/// a fresh heading and speed every `course_interval` and reflects off the
/// rectangle's edges in between.
pub struct RandomWalk2d {
    bounds: Rect,
    position: Position,
    heading: Float,
    speed: Float,
    speed_dist: ContinuousDistribution<Float>,
    course_interval: TimeSpan,
    updated_at: Time,
    next_course_change: Time,
    rng: Rng,
}

impl RandomWalk2d {
    #[must_use]
    pub fn new(
        start: Position,
        bounds: Rect,
        speed_dist: ContinuousDistribution<Float>,
        course_interval: TimeSpan,
        mut rng: Rng,
    ) -> RandomWalk2d {
        assert!(bounds.contains(start), "walk must start inside its bounds");
        let heading = rng.sample(&ContinuousDistribution::Uniform { min: 0., max: TAU });
        let speed = rng.sample(&speed_dist);
        RandomWalk2d {
            bounds,
            position: start,
            heading,
            speed,
            speed_dist,
            course_interval,
            updated_at: Time::SIM_START,
            next_course_change: Time::SIM_START + course_interval,
            rng,
        }
    }

    fn advance_to(&mut self, time: Time) {
        let dt = (time - self.updated_at).seconds();
        let mut x = self.position.x + self.speed * dt * self.heading.cos();
        let mut y = self.position.y + self.speed * dt * self.heading.sin();
        let (mut flip_x, mut flip_y) = (false, false);
        while !(self.bounds.min_x..=self.bounds.max_x).contains(&x) {
            x = if x < self.bounds.min_x {
                2. * self.bounds.min_x - x
            } else {
                2. * self.bounds.max_x - x
            };
            flip_x = !flip_x;
        }
        while !(self.bounds.min_y..=self.bounds.max_y).contains(&y) {
            y = if y < self.bounds.min_y {
                2. * self.bounds.min_y - y
            } else {
                2. * self.bounds.max_y - y
            };
            flip_y = !flip_y;
        }
        if flip_x {
            self.heading = std::f64::consts::PI - self.heading;
        }
        if flip_y {
            self.heading = -self.heading;
        }
        self.position = Position { x, y };
        self.updated_at = time;
    }

    fn change_course(&mut self) {
        self.heading = self
            .rng
            .sample(&ContinuousDistribution::Uniform { min: 0., max: TAU });
        let dist = self.speed_dist.clone();
        self.speed = self.rng.sample(&dist);
    }
}

impl MotionModel for RandomWalk2d {
    fn position_at(&mut self, time: Time) -> Position {
        while self.next_course_change <= time {
            let at = self.next_course_change;
            self.advance_to(at);
            self.change_course();
            self.next_course_change = at + self.course_interval;
        }
        if time > self.updated_at {
            self.advance_to(time);
        }
        self.position
    }
}

/// Per-node positions and motion models. Nodes without a model are treated
/// as pinned at their placed position.
#[derive(Default)]
pub struct Mobility {
    placed: FxHashMap<NodeId, Position>,
    models: FxHashMap<NodeId, Box<dyn MotionModel>>,
}

impl Mobility {
    #[must_use]
    pub fn new() -> Mobility {
        Mobility::default()
    }

    /// Places `nodes` on a row-major grid in the order given.
    pub fn place_on_grid(&mut self, nodes: &[NodeId], layout: &GridLayout) {
        for (index, &node) in nodes.iter().enumerate() {
            self.placed.insert(node, layout.position(index));
        }
    }

    /// Attaches a bounded random walk to each node, starting from its
    /// placed position (clamped into the bounds if placed outside them).
    pub fn attach_random_walk(
        &mut self,
        nodes: &[NodeId],
        bounds: Rect,
        speed: &ContinuousDistribution<Float>,
        course_interval: TimeSpan,
        rng: &mut Rng,
    ) {
        for &node in nodes {
            let placed = self.placed_position(node);
            let start = Position {
                x: placed.x.clamp(bounds.min_x, bounds.max_x),
                y: placed.y.clamp(bounds.min_y, bounds.max_y),
            };
            self.install(
                node,
                Box::new(RandomWalk2d::new(
                    start,
                    bounds,
                    speed.clone(),
                    course_interval,
                    rng.create_child(),
                )),
            );
        }
    }

    /// Pins each node at its placed position. Fixed nodes never move and
    /// never produce motion events.
    pub fn fix_position(&mut self, nodes: &[NodeId]) {
        for &node in nodes {
            let position = self.placed_position(node);
            self.install(node, Box::new(ConstantPosition::new(position)));
        }
    }

    pub fn install(&mut self, node: NodeId, model: Box<dyn MotionModel>) {
        self.models.insert(node, model);
    }

    #[must_use]
    pub fn has_model(&self, node: NodeId) -> bool {
        self.models.contains_key(&node)
    }

    fn placed_position(&self, node: NodeId) -> Position {
        self.placed.get(&node).copied().unwrap_or(Position::ORIGIN)
    }

    pub fn position_of(&mut self, node: NodeId, time: Time) -> Position {
        match self.models.get_mut(&node) {
            Some(model) => model.position_at(time),
            None => self.placed_position(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{GridLayout, Mobility, MotionModel, Position, RandomWalk2d, Rect};
    use crate::{
        quantities::{seconds, Float, Time},
        topology::Topology,
        util::rand::{ContinuousDistribution, Rng},
    };

    fn layout() -> GridLayout {
        GridLayout {
            min_x: 0.,
            min_y: 0.,
            delta_x: 5.,
            delta_y: 10.,
            columns: 3,
        }
    }

    #[test]
    fn grid_is_row_major_and_reproducible() {
        let layout = layout();
        assert_eq!(layout.position(0), Position { x: 0., y: 0. });
        assert_eq!(layout.position(2), Position { x: 10., y: 0. });
        assert_eq!(layout.position(3), Position { x: 0., y: 10. });
        assert_eq!(layout.position(7), Position { x: 5., y: 20. });
        assert_eq!(layout.position(7), layout.position(7));
    }

    #[test]
    fn walk_stays_inside_bounds() {
        let bounds = Rect::new(-50., 50., -50., 50.);
        let mut walk = RandomWalk2d::new(
            Position::ORIGIN,
            bounds,
            ContinuousDistribution::Uniform { min: 2., max: 4. },
            seconds(1.),
            Rng::from_seed(7),
        );
        for step in 1..=200 {
            let position = walk.position_at(Time::from_sim_start(seconds(Float::from(step) / 2.)));
            assert!(bounds.contains(position), "escaped at step {step}");
        }
    }

    #[test]
    fn walk_is_deterministic_per_seed() {
        let bounds = Rect::new(-50., 50., -50., 50.);
        let walk = |seed| {
            let mut model = RandomWalk2d::new(
                Position::ORIGIN,
                bounds,
                ContinuousDistribution::Uniform { min: 2., max: 4. },
                seconds(1.),
                Rng::from_seed(seed),
            );
            (0..20)
                .map(|i| model.position_at(Time::from_sim_start(seconds(Float::from(i)))))
                .collect::<Vec<_>>()
        };
        assert_eq!(walk(99), walk(99));
    }

    #[test]
    fn fixed_nodes_never_move() {
        let mut topo = Topology::new();
        let nodes = topo.create_nodes(2);
        let mut mobility = Mobility::new();
        mobility.place_on_grid(&nodes, &layout());
        mobility.fix_position(&nodes[..1]);
        assert!(mobility.has_model(nodes[0]));
        assert!(!mobility.has_model(nodes[1]));
        let early = mobility.position_of(nodes[0], Time::from_sim_start(seconds(1.)));
        let late = mobility.position_of(nodes[0], Time::from_sim_start(seconds(100.)));
        assert_eq!(early, late);
    }
}
