//! Version history of the displayed entity and the transitions that move
//! the current-iteration pointer.
//!
//! Mutating operations are split into a begin phase, which applies the
//! local effect and arms the single-flight guard, and a commit or rollback
//! phase applied once the server has answered. Nothing here performs IO.

use std::collections::BTreeMap;

use shared::{domain::EntitySnapshot, protocol::VersionMap};

use crate::error::{ClientError, Direction, Mutation};

#[derive(Debug, Clone, PartialEq)]
pub enum IterationSlot {
    /// Returned by the server.
    Confirmed(EntitySnapshot),
    /// Synthesized locally while a new-iteration request is outstanding.
    Pending(EntitySnapshot),
}

impl IterationSlot {
    pub fn snapshot(&self) -> &EntitySnapshot {
        match self {
            Self::Confirmed(snapshot) | Self::Pending(snapshot) => snapshot,
        }
    }

    pub fn confirmed(&self) -> Option<&EntitySnapshot> {
        match self {
            Self::Confirmed(snapshot) => Some(snapshot),
            Self::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MintTicket {
    pub iter: u32,
    pub snapshot: EntitySnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewIterationTicket {
    pub prev_iter: u32,
    pub next_iter: u32,
    /// Snapshot the new iteration is derived from.
    pub base: EntitySnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub placeholder_removed: bool,
    pub current_iter: Option<u32>,
}

#[derive(Debug, Default, Clone)]
pub struct IterationController {
    versions: BTreeMap<u32, IterationSlot>,
    current_iter: Option<u32>,
    in_flight: Option<Mutation>,
}

impl IterationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn versions(&self) -> &BTreeMap<u32, IterationSlot> {
        &self.versions
    }

    pub fn current_iter(&self) -> Option<u32> {
        self.current_iter
    }

    pub fn in_flight(&self) -> Option<Mutation> {
        self.in_flight
    }

    pub fn latest_iter(&self) -> Option<u32> {
        self.versions.keys().next_back().copied()
    }

    pub fn current(&self) -> Result<(u32, &IterationSlot), ClientError> {
        let iter = self
            .current_iter
            .filter(|_| !self.versions.is_empty())
            .ok_or(ClientError::NoEntityLoaded)?;
        let slot = self
            .versions
            .get(&iter)
            .ok_or(ClientError::NoCardForIteration { iter })?;
        Ok((iter, slot))
    }

    /// Replaces the history with a server response. An intended iteration
    /// the map does not contain leaves the pointer unset.
    pub fn load_entity(&mut self, versions: VersionMap, intended_iter: Option<u32>) {
        self.replace_versions(versions);
        self.current_iter = intended_iter.filter(|iter| self.versions.contains_key(iter));
    }

    pub fn navigate(&mut self, direction: Direction) -> Result<u32, ClientError> {
        let current = self
            .current_iter
            .filter(|_| !self.versions.is_empty())
            .ok_or(ClientError::NoEntityLoaded)?;
        let candidate = match direction {
            Direction::Previous => current.checked_sub(1),
            Direction::Next => current.checked_add(1),
        }
        .filter(|candidate| self.versions.contains_key(candidate))
        .ok_or(ClientError::NoSuchIteration(direction))?;

        self.current_iter = Some(candidate);
        Ok(candidate)
    }

    /// Moves the pointer to the newest iteration, the only one a new
    /// iteration can follow.
    pub fn navigate_latest(&mut self) -> Result<u32, ClientError> {
        let latest = self.latest_iter().ok_or(ClientError::NoEntityLoaded)?;
        self.current_iter = Some(latest);
        Ok(latest)
    }

    pub fn begin_mint(&mut self) -> Result<MintTicket, ClientError> {
        self.ensure_idle()?;
        let (iter, slot) = self.current()?;
        let snapshot = slot
            .confirmed()
            .cloned()
            .ok_or(ClientError::PlaceholderNotAuthoritative { iter })?;
        self.in_flight = Some(Mutation::Mint);
        Ok(MintTicket { iter, snapshot })
    }

    /// Returns the iteration left current: the minted one when the server
    /// still reports it, otherwise the latest.
    pub fn commit_mint(&mut self, ticket: MintTicket, versions: VersionMap) -> Option<u32> {
        self.in_flight = None;
        self.replace_versions(versions);
        self.current_iter = if self.versions.contains_key(&ticket.iter) {
            Some(ticket.iter)
        } else {
            self.latest_iter()
        };
        self.current_iter
    }

    pub fn abort_mint(&mut self, _ticket: MintTicket) {
        self.in_flight = None;
    }

    /// Inserts a pending placeholder after the current iteration and moves
    /// the pointer onto it.
    pub fn begin_new_iteration(&mut self) -> Result<NewIterationTicket, ClientError> {
        self.ensure_idle()?;
        let (prev_iter, slot) = self.current()?;
        let base = match slot {
            IterationSlot::Confirmed(snapshot) if snapshot.exists => snapshot.clone(),
            IterationSlot::Confirmed(_) => {
                return Err(ClientError::PredecessorNotCommitted { iter: prev_iter })
            }
            IterationSlot::Pending(_) => {
                return Err(ClientError::PlaceholderNotAuthoritative { iter: prev_iter })
            }
        };
        let next_iter = prev_iter
            .checked_add(1)
            .ok_or(ClientError::IterationAlreadyExists { iter: prev_iter })?;
        if self.versions.contains_key(&next_iter) {
            return Err(ClientError::IterationAlreadyExists { iter: next_iter });
        }

        self.versions.insert(
            next_iter,
            IterationSlot::Pending(base.placeholder_for(next_iter)),
        );
        self.current_iter = Some(next_iter);
        self.in_flight = Some(Mutation::NewIteration);

        Ok(NewIterationTicket {
            prev_iter,
            next_iter,
            base,
        })
    }

    /// Adopts the server's history and points at its newest iteration.
    pub fn commit_new_iteration(
        &mut self,
        _ticket: NewIterationTicket,
        versions: VersionMap,
    ) -> Option<u32> {
        self.in_flight = None;
        self.replace_versions(versions);
        self.current_iter = self.latest_iter();
        self.current_iter
    }

    /// Removes the placeholder and restores the previous pointer.
    ///
    /// The slot is only removed while it is still `Pending`: if a wholesale
    /// replacement landed in between, whatever now occupies the key came
    /// from the server and is kept. This is a best-effort check; it does not
    /// identify which request produced the slot.
    pub fn rollback_new_iteration(&mut self, ticket: NewIterationTicket) -> RollbackOutcome {
        self.in_flight = None;
        let placeholder_removed = matches!(
            self.versions.get(&ticket.next_iter),
            Some(IterationSlot::Pending(_))
        );
        if placeholder_removed {
            self.versions.remove(&ticket.next_iter);
        }
        self.current_iter = if self.versions.contains_key(&ticket.prev_iter) {
            Some(ticket.prev_iter)
        } else {
            self.latest_iter()
        };
        RollbackOutcome {
            placeholder_removed,
            current_iter: self.current_iter,
        }
    }

    /// Fails while a mint or new iteration awaits the server.
    pub fn ensure_idle(&self) -> Result<(), ClientError> {
        match self.in_flight {
            Some(mutation) => Err(ClientError::OperationPending(mutation)),
            None => Ok(()),
        }
    }

    fn replace_versions(&mut self, versions: VersionMap) {
        self.versions = versions
            .into_iter()
            .map(|(iter, snapshot)| (iter, IterationSlot::Confirmed(snapshot)))
            .collect();
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
