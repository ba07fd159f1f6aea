use std::sync::Arc;

use super::link::Link;
use crate::error::RoutingError;
use crate::{InterfaceId, RouterId};

/// Fixed number of slots, each optionally bound to a link.
#[derive(Debug)]
pub struct InterfaceTable {
    router: RouterId,
    slots: Box<[Option<Arc<Link>>]>,
}

impl InterfaceTable {
    pub fn new(router: RouterId, capacity: usize) -> Self {
        Self {
            router,
            slots: vec![None; capacity].into_boxed_slice(),
        }
    }

    pub fn first_free(&self) -> Option<InterfaceId> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn bind(&mut self, interface: InterfaceId, link: Arc<Link>) -> Result<(), RoutingError> {
        match self.slots.get_mut(interface) {
            Some(slot) if slot.is_none() => {
                *slot = Some(link);
                Ok(())
            }
            Some(_) => Err(RoutingError::InterfaceOccupied {
                router: self.router,
                interface,
            }),
            None => Err(RoutingError::NoFreeInterface { router: self.router }),
        }
    }

    /// Clears every slot holding `link`. Returns the cleared slots.
    pub fn unbind(&mut self, link: &Link) -> Vec<InterfaceId> {
        let mut cleared = Vec::new();
        for (interface, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|l| l.network_id() == link.network_id()) {
                *slot = None;
                cleared.push(interface);
            }
        }
        cleared
    }

    pub fn get(&self, interface: InterfaceId) -> Option<&Arc<Link>> {
        self.slots.get(interface).and_then(Option::as_ref)
    }

    /// Bound slots whose link is still up.
    pub fn active(&self) -> impl Iterator<Item = (InterfaceId, &Arc<Link>)> {
        self.bound().filter(|(_, link)| link.is_up())
    }

    pub fn bound(&self) -> impl Iterator<Item = (InterfaceId, &Arc<Link>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(interface, slot)| slot.as_ref().map(|link| (interface, link)))
    }

    /// First bound link whose other end is `neighbor`.
    pub fn link_to(&self, neighbor: RouterId) -> Option<Arc<Link>> {
        self.bound()
            .map(|(_, link)| link)
            .find(|link| link.other_endpoint(self.router).router == neighbor)
            .cloned()
    }
}
