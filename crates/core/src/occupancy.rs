//! Where trains are on the network.
//!
//! A train is described by the position of its head and its length. Its tail
//! and every item in between are derived by walking the network backwards,
//! which yields one [`Segment`] per covered item.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::network::{Network, TiId};

/// Unique identifier of a train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainId(pub u32);

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point on an item, oriented by the item it was entered from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Item the point lies on.
    pub item: TiId,
    /// Neighbour the item was entered from; `None` at a network boundary.
    pub previous: Option<TiId>,
    /// Metres travelled into the item from the `previous` side.
    pub offset: f64,
}

/// Outcome of [`Position::advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    /// Where the walk stopped.
    pub position: Position,
    /// Items entered on the way, in order.
    pub entered: Vec<TiId>,
    /// Distance that could not be covered because the track ended.
    pub shortfall: f64,
}

impl Position {
    /// Point `offset` metres into `item`, entered from `previous`.
    pub fn new(item: TiId, previous: Option<TiId>, offset: f64) -> Self {
        Self {
            item,
            previous,
            offset,
        }
    }

    /// The same point, seen travelling the other way.
    pub fn reversed(&self, network: &Network) -> Option<Position> {
        let item = network.get(self.item)?;
        Some(Position {
            item: self.item,
            previous: item.following_item(self.previous),
            offset: item.real_length() - self.offset,
        })
    }

    /// Walk `distance` metres forward. The walk stops at the end of the last
    /// item when the track does not continue.
    pub fn advance(&self, network: &Network, distance: f64) -> Option<Advance> {
        let mut position = *self;
        let mut remaining = distance.max(0.0);
        let mut entered = Vec::new();
        loop {
            let item = network.get(position.item)?;
            let room = item.real_length() - position.offset;
            if remaining <= room {
                position.offset += remaining;
                return Some(Advance {
                    position,
                    entered,
                    shortfall: 0.0,
                });
            }
            match item
                .following_item(position.previous)
                .filter(|next| network.contains(*next))
            {
                Some(next) => {
                    remaining -= room;
                    entered.push(next);
                    position = Position::new(next, Some(position.item), 0.0);
                }
                None => {
                    position.offset = item.real_length();
                    return Some(Advance {
                        position,
                        entered,
                        shortfall: remaining - room,
                    });
                }
            }
        }
    }
}

/// The part of a train lying on one item, in travel orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Covered item.
    pub item: TiId,
    /// Neighbour the train enters the item from.
    pub from: Option<TiId>,
    /// Forward end of the covered part, in metres from `from`.
    pub head: f64,
    /// Rear end of the covered part, in metres from `from`.
    pub tail: f64,
}

/// A train, as far as the network is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Train {
    /// Train id.
    pub id: TrainId,
    /// Position of the front of the train.
    pub head: Position,
    /// Length in metres.
    pub length: f64,
}

impl Train {
    /// Train of `length` metres whose front is at `head`.
    pub fn new(id: TrainId, head: Position, length: f64) -> Self {
        Self { id, head, length }
    }

    /// Items covered by the train, from tail to head.
    pub fn segments(&self, network: &Network) -> Option<Vec<Segment>> {
        let backwards = self.head.reversed(network)?.advance(network, self.length)?;
        let visited: Vec<TiId> = std::iter::once(self.head.item)
            .chain(backwards.entered.iter().copied())
            .collect();
        let last = visited.len() - 1;

        let mut segments = Vec::with_capacity(visited.len());
        for (index, &id) in visited.iter().enumerate() {
            let item = network.get(id)?;
            let from = if index == 0 {
                self.head.previous
            } else {
                item.following_item(Some(visited[index - 1]))
            };
            let head = if index == 0 {
                self.head.offset
            } else {
                item.real_length()
            };
            let tail = if index == last {
                item.real_length() - backwards.position.offset
            } else {
                0.0
            };
            segments.push(Segment {
                item: id,
                from,
                head,
                tail,
            });
        }
        segments.reverse();
        Some(segments)
    }
}
