//! The interlocking state: network, routes and trains under one roof.
//!
//! [`Simulation`] performs every mutation that spans more than one track
//! item: route activation (checked for conflicts before any item is stamped),
//! route deactivation, the automatic release of items behind a train's tail,
//! and the bookkeeping of train extents as trains move.
//!
//! Auto-release is single-step. When a train's tail enters an item, only the
//! item the active route entered it from is released, and only if no newer
//! route has been set from the same begin signal. The cascade back along the
//! route is driven by the tail entering each item in turn, which
//! [`Simulation::move_train`] guarantees even when a single move crosses
//! several items.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{
    context::SimulationContext,
    error::{RouteError, TrainError},
    network::{Network, TiId, TrackItem},
    occupancy::{Segment, Train, TrainId},
    route::{Route, RouteId, RouteTable},
};

/// Outcome of [`Simulation::move_train`].
#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    /// Metres actually covered.
    pub distance: f64,
    /// Items released behind the train, in release order.
    pub released: Vec<TiId>,
}

/// Network, routes and trains of one running (or edited) scenery.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    context: SimulationContext,
    network: Network,
    routes: RouteTable,
    trains: BTreeMap<TrainId, Train>,
}

impl Simulation {
    /// Wrap a network; no routes or trains yet.
    pub fn new(network: Network, context: SimulationContext) -> Self {
        Self {
            context,
            network,
            routes: RouteTable::new(),
            trains: BTreeMap::new(),
        }
    }

    /// Mode and defaults in effect.
    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    /// Switch mode or defaults.
    pub fn set_context(&mut self, context: SimulationContext) {
        self.context = context;
    }

    /// The track network.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The track network, for direct item updates.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    /// Registered routes.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Placed trains, in id order.
    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.trains.values()
    }

    /// Look up a placed train.
    pub fn train(&self, id: TrainId) -> Option<&Train> {
        self.trains.get(&id)
    }

    /// Speed limit of `item` under the current context.
    pub fn max_speed(&self, item: TiId) -> Option<f64> {
        self.network
            .get(item)
            .map(|item| item.max_speed(&self.context))
    }

    // Routes

    /// Register a route after checking that its path exists, is continuous
    /// and starts from a signal.
    pub fn add_route(&mut self, route: Route) -> Result<(), RouteError> {
        check_path(&self.network, &route)?;
        self.routes.insert(route)
    }

    /// Change the persistent flag of a registered route.
    pub fn set_route_persistent(
        &mut self,
        id: RouteId,
        persistent: bool,
    ) -> Result<(), RouteError> {
        self.routes.set_persistent(id, persistent)
    }

    /// Reserve every item of route `id`.
    ///
    /// The whole path is checked before any item is touched, so a failed
    /// activation leaves the network unchanged. Items already carrying this
    /// route do not conflict, which makes re-activation harmless.
    pub fn activate_route(&mut self, id: RouteId) -> Result<(), RouteError> {
        let route = self.routes.require(id)?;
        check_activable(&self.network, route)?;

        for (item, previous) in route.stamps() {
            if let Some(item) = self.network.get_mut(item) {
                item.set_active_route(id, previous);
            }
        }
        if let Some(signal) = self
            .network
            .get_mut(route.begin_signal)
            .and_then(TrackItem::signal_mut)
        {
            signal.next_active_route = Some(id);
        }
        info!(
            "route {} activated from signal {} over {} items",
            id,
            route.begin_signal,
            route.path.len()
        );
        Ok(())
    }

    /// Release every item still reserved by route `id`.
    pub fn deactivate_route(&mut self, id: RouteId) -> Result<(), RouteError> {
        let route = self.routes.require(id)?;
        for &item in &route.path {
            if let Some(item) = self.network.get_mut(item) {
                if item.active_route() == Some(id) {
                    item.reset_active_route();
                }
            }
        }
        if let Some(signal) = self
            .network
            .get_mut(route.begin_signal)
            .and_then(TrackItem::signal_mut)
        {
            if signal.next_active_route == Some(id) {
                signal.next_active_route = None;
            }
        }
        info!("route {} deactivated", id);
        Ok(())
    }

    /// Whether any item of route `id` is still reserved by it.
    pub fn is_route_active(&self, id: RouteId) -> bool {
        self.routes
            .get(id)
            .map(|route| {
                route.path.iter().any(|&item| {
                    self.network
                        .get(item)
                        .map(|item| item.active_route() == Some(id))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    // Train events

    /// Actions taken when the head of `train` enters `item`.
    pub fn train_head_actions(&self, item: TiId, train: TrainId) {
        debug!("train {} head entered item {}", train, item);
    }

    /// Actions taken when the tail of `train` enters `item`: release the
    /// item the active route entered `item` from. Returns the released item.
    ///
    /// Nothing is released when `item` carries no route, when the route is
    /// persistent, or when a newer route has since been set from the route's
    /// begin signal.
    pub fn train_tail_actions(&mut self, item: TiId, train: TrainId) -> Option<TiId> {
        let current = self.network.get(item)?;
        let route_id = current.active_route()?;
        let Some(route) = self.routes.get(route_id) else {
            warn!("item {} refers to unknown route {}", item, route_id);
            return None;
        };
        if route.persistent {
            return None;
        }

        let newest = self
            .network
            .get(route.begin_signal)
            .and_then(TrackItem::signal)
            .and_then(|signal| signal.next_active_route);
        if let Some(newest) = newest.filter(|newest| *newest != route_id) {
            debug!(
                "route {} superseded by route {} at signal {}, nothing released",
                route_id, newest, route.begin_signal
            );
            return None;
        }

        let previous_id = current.active_route_previous_item()?;
        let previous = self.network.get_mut(previous_id)?;
        if previous.active_route() != Some(route_id) {
            return None;
        }
        previous.reset_active_route();
        debug!(
            "train {} released item {} of route {}",
            train, previous_id, route_id
        );
        Some(previous_id)
    }

    // Trains

    /// Put a train on the network and mark the items it covers.
    pub fn place_train(&mut self, train: Train) -> Result<(), TrainError> {
        let id = train.id;
        if self.trains.contains_key(&id) {
            return Err(TrainError::DuplicateTrain(id));
        }
        if !(train.length.is_finite() && train.length > 0.0) {
            return Err(TrainError::InvalidLength {
                train: id,
                length: train.length,
            });
        }
        let head = self.network.get(train.head.item).ok_or(TrainError::UnknownItem {
            train: id,
            item: train.head.item,
        })?;
        if !(0.0..=head.real_length()).contains(&train.head.offset) {
            return Err(TrainError::InvalidOffset {
                train: id,
                item: train.head.item,
                offset: train.head.offset,
            });
        }
        match train.head.previous {
            Some(previous) if !self.network.are_linked(train.head.item, previous) => {
                return Err(TrainError::NotANeighbour {
                    train: id,
                    item: train.head.item,
                    previous,
                });
            }
            // Entering from outside the network needs an open side.
            None if head.previous_item().is_some() && head.next_item().is_some() => {
                return Err(TrainError::MissingEntrySide {
                    train: id,
                    item: train.head.item,
                });
            }
            _ => {}
        }

        let segments = self.segments(&train)?;
        self.write_segments(&segments);
        info!(
            "train {} placed with head on item {} over {} items",
            id,
            train.head.item,
            segments.len()
        );
        self.trains.insert(id, train);
        Ok(())
    }

    /// Move a train `distance` metres forward. The distance actually
    /// covered is shorter when the track ends, and a single move never
    /// exceeds the total length of the network.
    ///
    /// Head actions run for every item the head enters, then tail actions
    /// for every item the tail enters, in travel order.
    pub fn move_train(&mut self, id: TrainId, distance: f64) -> Result<Movement, TrainError> {
        if !(distance.is_finite() && distance >= 0.0) {
            return Err(TrainError::InvalidDistance {
                train: id,
                distance,
            });
        }
        let train = *self.trains.get(&id).ok_or(TrainError::UnknownTrain(id))?;
        let limit = self.network.total_length();
        let distance = if distance > limit {
            warn!(
                "train {} asked to move {} m, limited to {} m",
                id, distance, limit
            );
            limit
        } else {
            distance
        };
        let before = self.segments(&train)?;
        let advance = train
            .head
            .advance(&self.network, distance)
            .ok_or(TrainError::UnknownItem {
                train: id,
                item: train.head.item,
            })?;
        if advance.shortfall > 0.0 {
            warn!(
                "train {} stopped at the end of item {}",
                id, advance.position.item
            );
        }

        let moved = Train {
            head: advance.position,
            ..train
        };
        let after = self.segments(&moved)?;

        for segment in &before {
            if !after.iter().any(|other| other.item == segment.item) {
                self.clear_item(segment.item);
            }
        }
        self.write_segments(&after);
        self.trains.insert(id, moved);

        for &item in &advance.entered {
            self.train_head_actions(item, id);
        }

        // Every item from the old tail to the head, in travel order.
        let chain: Vec<TiId> = before
            .iter()
            .map(|segment| segment.item)
            .chain(advance.entered.iter().copied())
            .collect();
        let mut released = Vec::new();
        if let Some(new_tail) = after.first().map(|segment| segment.item) {
            if let Some(index) = chain.iter().skip(1).position(|&item| item == new_tail) {
                for &item in &chain[1..=index + 1] {
                    released.extend(self.train_tail_actions(item, id));
                }
            }
        }

        Ok(Movement {
            distance: distance - advance.shortfall,
            released,
        })
    }

    /// Take a train off the network.
    pub fn remove_train(&mut self, id: TrainId) -> Result<Train, TrainError> {
        let train = self.trains.remove(&id).ok_or(TrainError::UnknownTrain(id))?;
        if let Some(segments) = train.segments(&self.network) {
            for segment in segments {
                self.clear_item(segment.item);
            }
        }
        info!("train {} removed", id);
        Ok(train)
    }

    fn segments(&self, train: &Train) -> Result<Vec<Segment>, TrainError> {
        train
            .segments(&self.network)
            .ok_or(TrainError::UnknownItem {
                train: train.id,
                item: train.head.item,
            })
    }

    fn write_segments(&mut self, segments: &[Segment]) {
        for segment in segments {
            if let Some(item) = self.network.get_mut(segment.item) {
                item.set_train_head(Some(segment.head), segment.from);
                item.set_train_tail(Some(segment.tail), segment.from);
            }
        }
    }

    fn clear_item(&mut self, id: TiId) {
        if let Some(item) = self.network.get_mut(id) {
            item.set_train_head(None, None);
            item.set_train_tail(None, None);
        }
    }
}

fn check_path(network: &Network, route: &Route) -> Result<(), RouteError> {
    if route.path.is_empty() {
        return Err(RouteError::EmptyPath(route.id));
    }
    let signal = network.get(route.begin_signal).ok_or(RouteError::UnknownItem {
        route: route.id,
        item: route.begin_signal,
    })?;
    if signal.signal().is_none() {
        return Err(RouteError::NotASignal {
            route: route.id,
            item: route.begin_signal,
        });
    }
    if let Some(&missing) = route.path.iter().find(|item| !network.contains(**item)) {
        return Err(RouteError::UnknownItem {
            route: route.id,
            item: missing,
        });
    }
    // The path leaves the signal on the side it faces.
    let exit = match signal.signal() {
        Some(state) if state.reverse => signal.previous_item(),
        _ => signal.next_item(),
    };
    let first = route.path[0];
    if exit != Some(first) {
        return Err(RouteError::DisconnectedPath {
            route: route.id,
            from: route.begin_signal,
            to: first,
        });
    }
    if let Some(&second) = route.path.get(1) {
        if network.following_item(first, Some(route.begin_signal)) != Some(second) {
            return Err(RouteError::DisconnectedPath {
                route: route.id,
                from: first,
                to: second,
            });
        }
    }
    for pair in route.path.windows(2) {
        if !(network.are_linked(pair[0], pair[1]) && network.are_linked(pair[1], pair[0])) {
            return Err(RouteError::DisconnectedPath {
                route: route.id,
                from: pair[0],
                to: pair[1],
            });
        }
    }
    // No reversing halfway through.
    for triple in route.path.windows(3) {
        if network.following_item(triple[1], Some(triple[0])) != Some(triple[2]) {
            return Err(RouteError::DisconnectedPath {
                route: route.id,
                from: triple[1],
                to: triple[2],
            });
        }
    }
    Ok(())
}

fn check_activable(network: &Network, route: &Route) -> Result<(), RouteError> {
    let unknown = |item| RouteError::UnknownItem {
        route: route.id,
        item,
    };
    for &id in &route.path {
        let item = network.get(id).ok_or_else(|| unknown(id))?;
        if let Some(holder) = item.active_route().filter(|holder| *holder != route.id) {
            return Err(RouteError::Conflict {
                route: route.id,
                item: id,
                holder,
            });
        }

        let Some(conflict_id) = item.conflict_item() else {
            continue;
        };
        if route.contains(conflict_id) {
            continue;
        }
        let conflict = network.get(conflict_id).ok_or_else(|| unknown(conflict_id))?;
        if let Some(holder) = conflict.active_route().filter(|holder| *holder != route.id) {
            return Err(RouteError::ConflictItem {
                route: route.id,
                item: id,
                conflict_item: conflict_id,
                holder,
            });
        }
        if conflict.train_present() {
            return Err(RouteError::ConflictOccupied {
                route: route.id,
                item: id,
                conflict_item: conflict_id,
            });
        }
    }
    Ok(())
}

/// A [`Simulation`] shared between threads.
///
/// Every operation takes the single lock for its whole duration, so route
/// activation checks and stamps atomically.
#[derive(Debug, Clone, Default)]
pub struct SharedSimulation {
    inner: Arc<RwLock<Simulation>>,
}

impl SharedSimulation {
    /// Share `simulation`.
    pub fn new(simulation: Simulation) -> Self {
        Self {
            inner: Arc::new(RwLock::new(simulation)),
        }
    }

    /// Run `f` with read access.
    pub fn read<R>(&self, f: impl FnOnce(&Simulation) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` with exclusive access.
    pub fn write<R>(&self, f: impl FnOnce(&mut Simulation) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// See [`Simulation::activate_route`].
    pub fn activate_route(&self, id: RouteId) -> Result<(), RouteError> {
        self.inner.write().activate_route(id)
    }

    /// See [`Simulation::deactivate_route`].
    pub fn deactivate_route(&self, id: RouteId) -> Result<(), RouteError> {
        self.inner.write().deactivate_route(id)
    }

    /// See [`Simulation::move_train`].
    pub fn move_train(&self, id: TrainId, distance: f64) -> Result<Movement, TrainError> {
        self.inner.write().move_train(id, distance)
    }

    /// See [`Simulation::train_tail_actions`].
    pub fn train_tail_actions(&self, item: TiId, train: TrainId) -> Option<TiId> {
        self.inner.write().train_tail_actions(item, train)
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> Simulation {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use anyhow::Result;

    use super::*;
    use crate::{
        geometry::Point,
        network::{ItemKind, SignalState},
        occupancy::Position,
    };

    const TRAIN: TrainId = TrainId(1);

    fn line(id: i64) -> Result<TrackItem> {
        let origin = Point::new(id as f64 * 100.0, 0.0);
        Ok(TrackItem::resizable(
            TiId(id),
            format!("L{id}"),
            ItemKind::Line,
            origin,
            origin + Point::new(100.0, 0.0),
            100.0,
        )?)
    }

    fn ids(ids: &[i64]) -> Vec<TiId> {
        ids.iter().copied().map(TiId).collect()
    }

    /// 10 - S1 - 2 - 3 - 4 - E5, plus S7 - 6 crossing 3. Route 1 runs
    /// 2, 3, 4 from signal 1.
    fn layout() -> Result<Simulation> {
        let mut network = Network::new();
        network.insert(line(10)?)?;
        network.insert(TrackItem::new(
            TiId(1),
            "S1",
            ItemKind::Signal(SignalState::default()),
            Point::new(200.0, 0.0),
        ))?;
        for id in [2, 3, 4, 6] {
            network.insert(line(id)?)?;
        }
        network.insert(TrackItem::new(TiId(5), "E5", ItemKind::End, Point::new(500.0, 0.0)))?;
        network.insert(TrackItem::new(
            TiId(7),
            "S7",
            ItemKind::Signal(SignalState::default()),
            Point::new(300.0, 100.0),
        ))?;
        for (from, to) in [(10, 1), (1, 2), (2, 3), (3, 4), (4, 5), (7, 6)] {
            network.link(TiId(from), TiId(to))?;
        }
        if let Some(item) = network.get_mut(TiId(3)) {
            item.set_conflict_item(Some(TiId(6)));
        }
        if let Some(item) = network.get_mut(TiId(6)) {
            item.set_conflict_item(Some(TiId(3)));
        }
        network.validate()?;

        let mut sim = Simulation::new(network, SimulationContext::game(20.0));
        sim.add_route(Route::new(RouteId(1), TiId(1), ids(&[2, 3, 4])))?;
        Ok(sim)
    }

    fn route_of(sim: &Simulation, id: i64) -> Option<RouteId> {
        sim.network().get(TiId(id)).and_then(TrackItem::active_route)
    }

    fn train_at(item: i64, previous: i64, offset: f64, length: f64) -> Train {
        Train::new(
            TRAIN,
            Position::new(TiId(item), Some(TiId(previous)), offset),
            length,
        )
    }

    #[test]
    fn activation_stamps_entry_sides_and_marks_the_signal() -> Result<()> {
        let mut sim = layout()?;
        sim.activate_route(RouteId(1))?;

        let stamps: Vec<_> = [2, 3, 4]
            .iter()
            .filter_map(|id| sim.network().get(TiId(*id)))
            .map(|item| (item.active_route(), item.active_route_previous_item()))
            .collect();
        assert_eq!(
            stamps,
            vec![
                (Some(RouteId(1)), None),
                (Some(RouteId(1)), Some(TiId(2))),
                (Some(RouteId(1)), Some(TiId(3))),
            ]
        );
        let signal = sim.network().get(TiId(1)).and_then(TrackItem::signal);
        assert_eq!(signal.and_then(|s| s.next_active_route), Some(RouteId(1)));
        assert!(sim.is_route_active(RouteId(1)));

        // Activating again is harmless.
        sim.activate_route(RouteId(1))?;
        Ok(())
    }

    #[test]
    fn tail_entries_release_one_item_each() -> Result<()> {
        let mut sim = layout()?;
        sim.activate_route(RouteId(1))?;

        assert_eq!(sim.train_tail_actions(TiId(3), TRAIN), Some(TiId(2)));
        assert_eq!(route_of(&sim, 2), None);
        assert_eq!(route_of(&sim, 3), Some(RouteId(1)));
        assert_eq!(sim.train_tail_actions(TiId(3), TRAIN), None);

        assert_eq!(sim.train_tail_actions(TiId(4), TRAIN), Some(TiId(3)));
        assert_eq!(route_of(&sim, 3), None);
        assert_eq!(route_of(&sim, 4), Some(RouteId(1)));
        Ok(())
    }

    #[test]
    fn superseded_route_is_not_released() -> Result<()> {
        let mut sim = layout()?;
        sim.add_route(Route::new(RouteId(2), TiId(1), ids(&[2])))?;
        sim.activate_route(RouteId(1))?;
        assert_eq!(sim.train_tail_actions(TiId(3), TRAIN), Some(TiId(2)));

        // A newer route from the same signal takes the freed item.
        sim.activate_route(RouteId(2))?;
        assert_eq!(sim.train_tail_actions(TiId(4), TRAIN), None);
        assert_eq!(route_of(&sim, 3), Some(RouteId(1)));
        assert_eq!(route_of(&sim, 2), Some(RouteId(2)));

        sim.deactivate_route(RouteId(2))?;
        assert_eq!(sim.train_tail_actions(TiId(4), TRAIN), Some(TiId(3)));
        Ok(())
    }

    #[test]
    fn persistent_routes_stay_reserved() -> Result<()> {
        let mut sim = layout()?;
        sim.set_route_persistent(RouteId(1), true)?;
        sim.activate_route(RouteId(1))?;

        assert_eq!(sim.train_tail_actions(TiId(3), TRAIN), None);
        assert_eq!(route_of(&sim, 2), Some(RouteId(1)));
        Ok(())
    }

    #[test]
    fn tail_on_free_item_does_nothing() -> Result<()> {
        let mut sim = layout()?;
        assert_eq!(sim.train_tail_actions(TiId(3), TRAIN), None);
        assert_eq!(sim.train_tail_actions(TiId(99), TRAIN), None);
        Ok(())
    }

    #[test]
    fn conflicting_activation_changes_nothing() -> Result<()> {
        let mut sim = layout()?;
        sim.add_route(Route::new(RouteId(9), TiId(1), ids(&[2])))?;
        sim.activate_route(RouteId(9))?;

        assert_eq!(
            sim.activate_route(RouteId(1)),
            Err(RouteError::Conflict {
                route: RouteId(1),
                item: TiId(2),
                holder: RouteId(9),
            })
        );
        assert_eq!(route_of(&sim, 2), Some(RouteId(9)));
        assert_eq!(route_of(&sim, 3), None);
        assert_eq!(route_of(&sim, 4), None);
        Ok(())
    }

    #[test]
    fn conflict_items_block_activation() -> Result<()> {
        let mut sim = layout()?;
        sim.add_route(Route::new(RouteId(5), TiId(7), ids(&[6])))?;
        sim.activate_route(RouteId(5))?;
        assert_eq!(
            sim.activate_route(RouteId(1)),
            Err(RouteError::ConflictItem {
                route: RouteId(1),
                item: TiId(3),
                conflict_item: TiId(6),
                holder: RouteId(5),
            })
        );

        sim.deactivate_route(RouteId(5))?;
        sim.place_train(Train::new(TrainId(7), Position::new(TiId(6), None, 50.0), 20.0))?;
        assert_eq!(
            sim.activate_route(RouteId(1)),
            Err(RouteError::ConflictOccupied {
                route: RouteId(1),
                item: TiId(3),
                conflict_item: TiId(6),
            })
        );
        assert_eq!(route_of(&sim, 2), None);

        sim.remove_train(TrainId(7))?;
        sim.activate_route(RouteId(1))?;
        Ok(())
    }

    #[test]
    fn rejects_malformed_routes() -> Result<()> {
        let mut sim = layout()?;
        let cases = [
            (Route::new(RouteId(20), TiId(1), Vec::new()), RouteError::EmptyPath(RouteId(20))),
            (
                Route::new(RouteId(21), TiId(2), ids(&[3])),
                RouteError::NotASignal {
                    route: RouteId(21),
                    item: TiId(2),
                },
            ),
            (
                Route::new(RouteId(22), TiId(1), ids(&[2, 99])),
                RouteError::UnknownItem {
                    route: RouteId(22),
                    item: TiId(99),
                },
            ),
            (
                Route::new(RouteId(25), TiId(1), ids(&[3])),
                RouteError::DisconnectedPath {
                    route: RouteId(25),
                    from: TiId(1),
                    to: TiId(3),
                },
            ),
            (
                Route::new(RouteId(26), TiId(1), ids(&[10])),
                RouteError::DisconnectedPath {
                    route: RouteId(26),
                    from: TiId(1),
                    to: TiId(10),
                },
            ),
            (
                Route::new(RouteId(23), TiId(1), ids(&[2, 4])),
                RouteError::DisconnectedPath {
                    route: RouteId(23),
                    from: TiId(2),
                    to: TiId(4),
                },
            ),
            (
                Route::new(RouteId(24), TiId(1), ids(&[2, 3, 2])),
                RouteError::DisconnectedPath {
                    route: RouteId(24),
                    from: TiId(3),
                    to: TiId(2),
                },
            ),
        ];
        for (route, expected) in cases {
            assert_eq!(sim.add_route(route), Err(expected));
        }
        assert_eq!(
            sim.add_route(Route::new(RouteId(1), TiId(1), ids(&[2]))),
            Err(RouteError::DuplicateRoute(RouteId(1)))
        );
        assert_eq!(
            sim.activate_route(RouteId(42)),
            Err(RouteError::UnknownRoute(RouteId(42)))
        );
        Ok(())
    }

    #[test]
    fn deactivation_clears_what_is_left() -> Result<()> {
        let mut sim = layout()?;
        sim.activate_route(RouteId(1))?;
        sim.train_tail_actions(TiId(3), TRAIN);
        sim.deactivate_route(RouteId(1))?;

        assert!([2, 3, 4].iter().all(|id| route_of(&sim, *id).is_none()));
        let signal = sim.network().get(TiId(1)).and_then(TrackItem::signal);
        assert_eq!(signal.and_then(|s| s.next_active_route), None);
        assert!(!sim.is_route_active(RouteId(1)));
        Ok(())
    }

    #[test]
    fn moving_train_releases_the_route_behind_it() -> Result<()> {
        let mut sim = layout()?;
        sim.place_train(train_at(2, 1, 90.0, 80.0))?;
        sim.activate_route(RouteId(1))?;

        let movement = sim.move_train(TRAIN, 100.0)?;
        assert_eq!(movement.distance, 100.0);
        assert_eq!(movement.released, vec![TiId(2)]);
        let item = |sim: &Simulation, id| sim.network().get(TiId(id)).cloned();
        let a = item(&sim, 2).expect("item 2");
        let b = item(&sim, 3).expect("item 3");
        assert!(!a.train_present());
        assert_eq!(a.active_route(), None);
        assert_eq!((b.train_head(), b.train_tail()), (Some(90.0), Some(10.0)));
        assert_eq!(b.active_route(), Some(RouteId(1)));

        assert_eq!(sim.move_train(TRAIN, 100.0)?.released, vec![TiId(3)]);
        assert_eq!(route_of(&sim, 3), None);
        assert_eq!(route_of(&sim, 4), Some(RouteId(1)));
        Ok(())
    }

    #[test]
    fn long_moves_release_every_item_crossed() -> Result<()> {
        let mut sim = layout()?;
        sim.place_train(train_at(2, 1, 90.0, 80.0))?;
        sim.activate_route(RouteId(1))?;

        let movement = sim.move_train(TRAIN, 200.0)?;
        assert_eq!(movement.released, vec![TiId(2), TiId(3)]);
        assert_eq!(route_of(&sim, 2), None);
        assert_eq!(route_of(&sim, 3), None);
        assert_eq!(route_of(&sim, 4), Some(RouteId(1)));
        assert!(!sim.network().get(TiId(3)).map(TrackItem::train_present).unwrap_or(true));
        Ok(())
    }

    #[test]
    fn trains_stop_at_dead_ends() -> Result<()> {
        let mut sim = layout()?;
        sim.place_train(train_at(4, 3, 90.0, 50.0))?;

        assert_eq!(sim.move_train(TRAIN, 1000.0)?.distance, 11.0);
        let head = sim.train(TRAIN).map(|train| train.head);
        assert_eq!(head, Some(Position::new(TiId(5), Some(TiId(4)), 1.0)));
        Ok(())
    }

    #[test]
    fn reversed_items_store_mirrored_offsets() -> Result<()> {
        let mut sim = layout()?;
        // Lay item 3 out backwards: its previous side faces item 4.
        if let Some(item) = sim.network_mut().get_mut(TiId(3)) {
            item.set_previous_item(Some(TiId(4)));
            item.set_next_item(Some(TiId(2)));
        }
        sim.network().validate()?;

        sim.place_train(train_at(3, 2, 30.0, 20.0))?;
        let b = sim.network().get(TiId(3)).cloned().expect("item 3");
        assert_eq!((b.train_head(), b.train_tail()), (Some(70.0), Some(90.0)));
        assert_eq!(b.distance_to_train_end(Some(TiId(2))), Some(10.0));
        assert_eq!(b.distance_to_train_end(Some(TiId(4))), Some(70.0));
        Ok(())
    }

    #[test]
    fn placement_is_validated() -> Result<()> {
        let mut sim = layout()?;
        assert_eq!(
            sim.place_train(train_at(2, 1, 50.0, 0.0)),
            Err(TrainError::InvalidLength {
                train: TRAIN,
                length: 0.0,
            })
        );
        assert_eq!(
            sim.place_train(train_at(2, 1, 150.0, 10.0)),
            Err(TrainError::InvalidOffset {
                train: TRAIN,
                item: TiId(2),
                offset: 150.0,
            })
        );
        assert_eq!(
            sim.place_train(train_at(2, 4, 50.0, 10.0)),
            Err(TrainError::NotANeighbour {
                train: TRAIN,
                item: TiId(2),
                previous: TiId(4),
            })
        );
        assert_eq!(
            sim.place_train(Train::new(TRAIN, Position::new(TiId(2), None, 50.0), 10.0)),
            Err(TrainError::MissingEntrySide {
                train: TRAIN,
                item: TiId(2),
            })
        );
        sim.place_train(train_at(2, 1, 50.0, 10.0))?;
        assert_eq!(
            sim.place_train(train_at(3, 2, 50.0, 10.0)),
            Err(TrainError::DuplicateTrain(TRAIN))
        );
        assert_eq!(
            sim.move_train(TRAIN, -1.0),
            Err(TrainError::InvalidDistance {
                train: TRAIN,
                distance: -1.0,
            })
        );

        sim.remove_train(TRAIN)?;
        assert!(!sim.network().get(TiId(2)).map(TrackItem::train_present).unwrap_or(true));
        Ok(())
    }

    #[test]
    fn zero_speed_limit_uses_the_default() -> Result<()> {
        let sim = layout()?;
        assert_eq!(sim.max_speed(TiId(2)), Some(20.0));
        assert_eq!(sim.max_speed(TiId(99)), None);
        Ok(())
    }

    #[test]
    fn boundary_items_accept_trains_from_outside() -> Result<()> {
        let mut sim = layout()?;
        sim.place_train(Train::new(TRAIN, Position::new(TiId(10), None, 50.0), 20.0))?;
        let item = sim.network().get(TiId(10)).cloned().expect("item 10");
        assert_eq!((item.train_head(), item.train_tail()), (Some(50.0), Some(30.0)));

        let movement = sim.move_train(TRAIN, 60.0)?;
        assert_eq!(movement.distance, 60.0);
        assert_eq!(
            sim.train(TRAIN).map(|train| train.head),
            Some(Position::new(TiId(2), Some(TiId(1)), 9.0))
        );
        Ok(())
    }

    #[test]
    fn moves_are_bounded_on_loops() -> Result<()> {
        let mut network = Network::new();
        for id in 1..=3 {
            network.insert(TrackItem::new(
                TiId(id),
                format!("ti{id}"),
                ItemKind::Plain,
                Point::default(),
            ))?;
        }
        for (from, to) in [(1, 2), (2, 3), (3, 1)] {
            network.link(TiId(from), TiId(to))?;
        }
        let mut sim = Simulation::new(network, SimulationContext::default());
        sim.place_train(Train::new(TRAIN, Position::new(TiId(1), Some(TiId(3)), 0.5), 0.5))?;

        let movement = sim.move_train(TRAIN, 3.0e6)?;
        assert_eq!(movement.distance, 3.0);
        assert_eq!(
            sim.train(TRAIN).map(|train| train.head),
            Some(Position::new(TiId(1), Some(TiId(3)), 0.5))
        );
        Ok(())
    }

    #[test]
    fn concurrent_activations_are_all_or_nothing() -> Result<()> {
        let mut sim = layout()?;
        sim.add_route(Route::new(RouteId(9), TiId(1), ids(&[2])))?;
        let shared = SharedSimulation::new(sim);

        let handles: Vec<_> = [RouteId(1), RouteId(9)]
            .into_iter()
            .map(|route| {
                let shared = shared.clone();
                thread::spawn(move || shared.activate_route(route).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|handle| handle.join().expect("activation thread panicked"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);

        let snapshot = shared.snapshot();
        let reserved: Vec<_> = [2, 3, 4].iter().map(|id| route_of(&snapshot, *id)).collect();
        assert!(
            reserved == vec![Some(RouteId(1)); 3] || reserved == vec![Some(RouteId(9)), None, None],
            "partial activation: {reserved:?}"
        );
        Ok(())
    }
}
