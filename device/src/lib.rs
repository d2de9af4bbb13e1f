//! Routing-resource graph for a reconfigurable device: a 2D tile grid with
//! interned wiring structures, plus the compact persistent representation.
//!
//! A `Device` is built once, batch-style, by `prjfabric-adbuild`; after that
//! it is immutable and safe to share read-only (`Arc<Device>` via the
//! registry). All repeated structures live in canonicalizing pools and tiles
//! refer to them by id, so the in-memory and on-disk representations are the
//! same concept.

pub mod codec;
pub mod family;
pub mod registry;
pub mod tiles;
pub mod wires;

use std::collections::{BTreeMap, HashMap};

use unnamed_entity::{EntityId, EntitySet, EntityVec};

pub use crate::tiles::{
    ConnId, ConnList, ConnListId, Pip, PinDir, PinMap, PinMapId, RouteThrough, SinkMap, SinkMapId,
    SinkPin, Site, SitePin, SourceList, SourceListId, Tile, TileId, WireConn, WireEntry,
    WireEntryId, WireId, WireMap, WireMapId,
};
pub use crate::wires::{WireDir, WireKind, WireList};

use crate::family::FamilyRules;

/// Addresses one site: owning tile plus ordinal position within the tile's
/// site list.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct SiteRef {
    pub tile: TileId,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub part: String,
    pub family: String,
    pub rows: u16,
    pub cols: u16,
    /// Row-major tile arena; `TileId` is `row * cols + col`.
    pub tiles: EntityVec<TileId, Tile>,
    pub tiles_by_name: HashMap<String, TileId>,
    pub sites_by_name: HashMap<String, SiteRef>,
    pub conns: EntitySet<ConnId, WireConn>,
    pub conn_lists: EntitySet<ConnListId, ConnList>,
    pub wire_entries: EntitySet<WireEntryId, WireEntry>,
    pub sink_maps: EntitySet<SinkMapId, SinkMap>,
    pub source_lists: EntitySet<SourceListId, SourceList>,
    pub wire_maps: EntitySet<WireMapId, WireMap>,
    pub pin_maps: EntitySet<PinMapId, PinMap>,
    pub route_throughs: BTreeMap<ConnId, RouteThrough>,
}

impl Device {
    /// Compact tile reference for a grid position. Panics out of bounds.
    pub fn tile_addr(&self, row: u16, col: u16) -> TileId {
        assert!(row < self.rows && col < self.cols);
        TileId::from_idx(row as usize * self.cols as usize + col as usize)
    }

    pub fn tile(&self, tile: TileId) -> &Tile {
        &self.tiles[tile]
    }

    pub fn tile_at(&self, row: u16, col: u16) -> Option<&Tile> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(&self.tiles[TileId::from_idx(
            row as usize * self.cols as usize + col as usize,
        )])
    }

    pub fn tile_by_name(&self, name: &str) -> Option<&Tile> {
        Some(&self.tiles[*self.tiles_by_name.get(name)?])
    }

    pub fn conn(&self, conn: ConnId) -> WireConn {
        self.conns[conn]
    }

    /// Outgoing edges of `wire` in `tile`; empty when the wire has none.
    pub fn conns_from(&self, tile: TileId, wire: WireId) -> &[ConnId] {
        let map = &self.wire_maps[self.tiles[tile].wires];
        match map.binary_search_by_key(&wire, |&e| self.wire_entries[e].wire) {
            Ok(pos) => &self.conn_lists[self.wire_entries[map[pos]].conns],
            Err(_) => &[],
        }
    }

    /// All `(wire, edges)` pairs of a tile, in wire-id order.
    pub fn wire_entries_of(
        &self,
        tile: TileId,
    ) -> impl Iterator<Item = (WireId, &[ConnId])> + '_ {
        self.wire_maps[self.tiles[tile].wires].iter().map(move |&e| {
            let entry = self.wire_entries[e];
            (entry.wire, &self.conn_lists[entry.conns][..])
        })
    }

    pub fn sources_of(&self, tile: TileId) -> &[WireId] {
        &self.source_lists[self.tiles[tile].sources]
    }

    pub fn sinks_of(&self, tile: TileId) -> &SinkMap {
        &self.sink_maps[self.tiles[tile].sinks]
    }

    pub fn sink_pin(&self, tile: TileId, wire: WireId) -> Option<SinkPin> {
        self.sinks_of(tile).get(&wire).copied()
    }

    pub fn site(&self, site: SiteRef) -> Option<&Site> {
        self.tiles[site.tile].sites.as_ref()?.get(site.slot)
    }

    pub fn site_by_name(&self, name: &str) -> Option<&Site> {
        self.site(*self.sites_by_name.get(name)?)
    }

    pub fn pins_of(&self, site: &Site) -> &PinMap {
        &self.pin_maps[site.pins]
    }

    /// Resolves the tile a conn lands in; `None` when the offset leaves the
    /// grid (boundary tiles keep such edges so that they can share structure
    /// with interior tiles).
    pub fn conn_target(&self, tile: TileId, conn: WireConn) -> Option<TileId> {
        let t = &self.tiles[tile];
        let row = t.row as i32 + conn.drow as i32;
        let col = t.col as i32 + conn.dcol as i32;
        if row < 0 || row >= self.rows as i32 || col < 0 || col >= self.cols as i32 {
            return None;
        }
        Some(self.tile_addr(row as u16, col as u16))
    }

    /// The static conn a realized pip corresponds to, if the device has it.
    pub fn pip_conn(&self, pip: Pip) -> Option<ConnId> {
        let conn = WireConn {
            target: pip.wire_to,
            drow: 0,
            dcol: 0,
            is_pip: true,
        };
        let id = self.conns.get(&conn)?;
        self.conns_from(pip.tile, pip.wire_from)
            .contains(&id)
            .then_some(id)
    }

    pub fn is_route_through(&self, conn: ConnId) -> bool {
        self.route_throughs.contains_key(&conn)
    }

    pub fn route_through(&self, conn: ConnId) -> Option<&RouteThrough> {
        self.route_throughs.get(&conn)
    }

    /// Finds the site occupying the same ordinal position in `target` as
    /// `site` occupies in its own tile, if the position exists and the site
    /// there can host `occupant_kind`. Ordinal correspondence, not name
    /// matching, is what lets a relocatable macro move by tile offsets; the
    /// builder enforces that same-kind tiles list sites in the same order.
    pub fn corresponding_site(
        &self,
        site: &Site,
        occupant_kind: &str,
        target: TileId,
        rules: &FamilyRules,
    ) -> Option<&Site> {
        let home = self.tiles[site.tile].sites.as_ref()?;
        let slot = home.iter().position(|s| s.name == site.name)?;
        let cand = self.tiles[target].sites.as_ref()?.get(slot)?;
        if rules.is_compatible(&cand.kind, occupant_kind) {
            Some(cand)
        } else {
            None
        }
    }
}
