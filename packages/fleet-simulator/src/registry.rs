//! registry.rs — In-memory fleet of concentrators and their relays
//!
//! The registry is built once from a validated topology and never grows or
//! shrinks afterwards. Iteration order is the topology order.

use indexmap::IndexMap;
use lighting_types::{
    ConcentratorId, ConcentratorSummary, Page, PageRequest, RelayId, RelaySummary, Topology,
};
use rand::Rng;
use tracing::info;

use crate::clock::SimContext;
use crate::error::{FleetError, TopologyError};
use crate::fleet::{Concentrator, Relay};
use crate::power::{self, ElectricalUpdate};
use crate::telemetry;
use crate::topology;

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    concentrators: IndexMap<ConcentratorId, Concentrator>,
}

impl DeviceRegistry {
    /// Build the whole fleet from a topology. Malformed topologies are rejected
    /// before anything is constructed.
    pub fn load(
        topology: &Topology,
        rng: &mut impl Rng,
        ctx: &SimContext,
    ) -> Result<Self, TopologyError> {
        topology::validate(topology)?;

        let concentrators: IndexMap<_, _> = topology
            .concentrators
            .iter()
            .map(|c| (c.id, telemetry::spawn_concentrator(rng, ctx, c)))
            .collect();

        let registry = Self { concentrators };
        info!(
            "🏗️  Fleet loaded: {} concentrators, {} relays (night={})",
            registry.concentrator_count(),
            registry.relay_count(),
            ctx.is_night
        );
        Ok(registry)
    }

    // ── Reads ──

    pub fn concentrator(&self, id: ConcentratorId) -> Option<&Concentrator> {
        self.concentrators.get(&id)
    }

    pub fn concentrators(&self) -> impl ExactSizeIterator<Item = &Concentrator> {
        self.concentrators.values()
    }

    pub fn list_concentrators(&self, offset: i64, limit: i64) -> Page<ConcentratorSummary> {
        self.concentrator_page(PageRequest::new(offset, limit))
    }

    pub fn concentrator_page(&self, request: PageRequest) -> Page<ConcentratorSummary> {
        let page = Page::slice(self.concentrators.values(), request);
        Page {
            items: page.items.into_iter().map(Concentrator::summary).collect(),
            total: page.total,
            offset: page.offset,
            limit: page.limit,
        }
    }

    pub fn relay(&self, concentrator_id: ConcentratorId, relay_id: RelayId) -> Option<&Relay> {
        self.concentrators.get(&concentrator_id)?.relay(relay_id)
    }

    /// `None` for an unknown concentrator; a known one past its last relay
    /// gives an empty page.
    pub fn list_relays(
        &self,
        concentrator_id: ConcentratorId,
        offset: i64,
        limit: i64,
    ) -> Option<Page<RelaySummary>> {
        self.relay_page(concentrator_id, PageRequest::new(offset, limit))
    }

    pub fn relay_page(
        &self,
        concentrator_id: ConcentratorId,
        request: PageRequest,
    ) -> Option<Page<RelaySummary>> {
        let concentrator = self.concentrators.get(&concentrator_id)?;
        let page = Page::slice(concentrator.relays(), request);
        Some(Page {
            items: page.items.into_iter().map(Relay::summary).collect(),
            total: page.total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    pub fn relays(&self) -> impl Iterator<Item = &Relay> {
        self.concentrators.values().flat_map(|c| c.relays())
    }

    pub fn concentrator_count(&self) -> usize {
        self.concentrators.len()
    }

    pub fn relay_count(&self) -> usize {
        self.concentrators.values().map(Concentrator::relay_count).sum()
    }

    // ── Writes ──

    pub fn concentrator_mut(&mut self, id: ConcentratorId) -> Option<&mut Concentrator> {
        self.concentrators.get_mut(&id)
    }

    pub fn concentrators_mut(&mut self) -> impl Iterator<Item = &mut Concentrator> {
        self.concentrators.values_mut()
    }

    pub fn relays_mut(&mut self) -> impl Iterator<Item = &mut Relay> {
        self.concentrators.values_mut().flat_map(|c| c.relays_mut())
    }

    /// Resolve a relay for mutation, distinguishing which half of the key missed.
    pub fn locate_mut(
        &mut self,
        concentrator_id: ConcentratorId,
        relay_id: RelayId,
    ) -> Result<&mut Relay, FleetError> {
        self.concentrators
            .get_mut(&concentrator_id)
            .ok_or(FleetError::ConcentratorNotFound(concentrator_id))?
            .relay_mut(relay_id)
            .ok_or(FleetError::RelayNotFound { concentrator_id, relay_id })
    }

    /// Override a relay's electrical readings and refresh the gateway's
    /// last-readings stamp.
    pub fn update_electrical(
        &mut self,
        concentrator_id: ConcentratorId,
        relay_id: RelayId,
        update: &ElectricalUpdate,
        ctx: &SimContext,
    ) -> Result<&Relay, FleetError> {
        power::update_electrical(self.locate_mut(concentrator_id, relay_id)?, update, ctx)?;
        let concentrator = self
            .concentrators
            .get_mut(&concentrator_id)
            .ok_or(FleetError::ConcentratorNotFound(concentrator_id))?;
        concentrator.touch(ctx.now);
        concentrator
            .relay(relay_id)
            .ok_or(FleetError::RelayNotFound { concentrator_id, relay_id })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::night;

    #[test]
    fn load_counts_every_entity() {
        let registry = test_support::registry(&night(), 3, 4);
        assert_eq!(registry.concentrator_count(), 3);
        assert_eq!(registry.relay_count(), 12);
        for c in registry.concentrators() {
            assert_eq!(c.details().total_relays(), c.relay_count());
        }
    }

    #[test]
    fn listing_preserves_topology_order() {
        let registry = test_support::registry(&night(), 5, 1);
        let ids: Vec<_> = registry.list_concentrators(0, 0).items.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let page = registry.list_concentrators(1, 2);
        assert_eq!(page.items.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(page.total, 5);
        assert_eq!(page.items[0].label, "CON_2");
        assert_eq!(page.items[0].lat, "-23.52000");
    }

    #[test]
    fn offset_past_end_yields_empty_page_with_total() {
        let registry = test_support::registry(&night(), 4, 2);
        let total = registry.concentrator_count() as i64;
        let page = registry.list_concentrators(total, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 4);
    }

    #[test]
    fn unknown_concentrator_is_not_an_empty_page() {
        let registry = test_support::registry(&night(), 2, 3);
        assert!(registry.list_relays(99, 0, 10).is_none());
        let page = registry.list_relays(2, 10, 10).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
        let page = registry.list_relays(2, -4, -1).unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].id_concentrator, 2);
    }

    #[test]
    fn relay_lookup_uses_compound_key() {
        let mut registry = test_support::registry(&night(), 2, 2);
        assert_eq!(registry.relay(2, 1).map(|r| r.key()), Some((2, 1)));
        assert!(registry.relay(3, 1).is_none());
        assert_eq!(registry.locate_mut(3, 1).unwrap_err(), FleetError::ConcentratorNotFound(3));
        assert_eq!(
            registry.locate_mut(1, 9).unwrap_err(),
            FleetError::RelayNotFound { concentrator_id: 1, relay_id: 9 }
        );
    }

    #[test]
    fn electrical_update_refreshes_gateway() {
        let ctx = night();
        let mut registry = test_support::registry(&ctx, 1, 1);
        let update = ElectricalUpdate { voltage: Some(231.0), ..Default::default() };
        let relay = registry.update_electrical(1, 1, &update, &ctx).unwrap();
        assert_eq!(relay.electrical.voltage, 231.0);
        assert_eq!(registry.concentrator(1).unwrap().details().last_readings, ctx.now);
    }

    #[test]
    fn malformed_topology_is_rejected() {
        let mut rng = rand::thread_rng();
        let empty = Topology::default();
        assert!(matches!(
            DeviceRegistry::load(&empty, &mut rng, &night()),
            Err(TopologyError::Empty)
        ));
    }
}
