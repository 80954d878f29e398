//! Routes: reserved, directional paths through the track network.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{error::RouteError, network::TiId};

/// Unique identifier of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub u32);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A path of track items that a train may be given authority over.
///
/// The route does not own its items; it only names them, in travel order.
/// Activation stamps each item with the route and the item it is entered
/// from, the first item having no entry side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Route id.
    pub id: RouteId,
    /// Signal at the origin of the route, where supersession is tracked.
    pub begin_signal: TiId,
    /// Items in travel order.
    pub path: Vec<TiId>,
    /// Persistent routes are only released explicitly.
    #[serde(default)]
    pub persistent: bool,
}

impl Route {
    /// Non-persistent route over `path`.
    pub fn new(id: RouteId, begin_signal: TiId, path: Vec<TiId>) -> Self {
        Self {
            id,
            begin_signal,
            path,
            persistent: false,
        }
    }

    /// Same route with the persistent flag set to `persistent`.
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Each path item paired with the item it is entered from.
    pub fn stamps(&self) -> impl Iterator<Item = (TiId, Option<TiId>)> + '_ {
        self.path
            .first()
            .map(|first| (*first, None))
            .into_iter()
            .chain(self.path.windows(2).map(|pair| (pair[1], Some(pair[0]))))
    }

    /// Whether `item` lies on this route.
    pub fn contains(&self, item: TiId) -> bool {
        self.path.contains(&item)
    }
}

/// Registered routes, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: BTreeMap<RouteId, Route>,
}

impl RouteTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Ids are unique.
    pub fn insert(&mut self, route: Route) -> Result<(), RouteError> {
        if self.routes.contains_key(&route.id) {
            return Err(RouteError::DuplicateRoute(route.id));
        }
        self.routes.insert(route.id, route);
        Ok(())
    }

    /// Look up a route.
    pub fn get(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(&id)
    }

    /// Look up a route, failing with [`RouteError::UnknownRoute`].
    pub fn require(&self, id: RouteId) -> Result<&Route, RouteError> {
        self.get(id).ok_or(RouteError::UnknownRoute(id))
    }

    /// Whether `id` refers to a persistent route. Unknown routes are not.
    pub fn is_persistent(&self, id: RouteId) -> bool {
        self.get(id).map(|route| route.persistent).unwrap_or(false)
    }

    /// Change the persistent flag of a route.
    pub fn set_persistent(&mut self, id: RouteId, persistent: bool) -> Result<(), RouteError> {
        let route = self
            .routes
            .get_mut(&id)
            .ok_or(RouteError::UnknownRoute(id))?;
        route.persistent = persistent;
        Ok(())
    }

    /// Routes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<'a> IntoIterator for &'a RouteTable {
    type Item = &'a Route;
    type IntoIter = std::collections::btree_map::Values<'a, RouteId, Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.values()
    }
}
