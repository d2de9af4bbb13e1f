//! Graph primitives: tiles, sites, wire-to-wire connections, and the id
//! spaces of the structural pools they are interned into.

use std::collections::BTreeMap;

use unnamed_entity::entity_id;

entity_id! {
    pub id WireId u32, reserve 1;
    pub id TileId u32;
    pub id ConnId u32, reserve 1;
    pub id ConnListId u32;
    pub id WireEntryId u32;
    pub id SinkMapId u32;
    pub id SourceListId u32;
    pub id WireMapId u32;
    pub id PinMapId u32;
}

/// A directed edge from some wire in the owning tile to `target` in the tile
/// offset by `(drow, dcol)`. `is_pip` marks the edge as router-selectable
/// rather than hardwired.
///
/// Field order is the canonical sort order for edge arrays; do not reorder.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone)]
pub struct WireConn {
    pub target: WireId,
    pub drow: i16,
    pub dcol: i16,
    pub is_pip: bool,
}

/// An edge array, pooled as a unit. Always sorted by resolved conn value.
pub type ConnList = Vec<ConnId>;

/// One wire of a tile together with its outgoing edge array.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct WireEntry {
    pub wire: WireId,
    pub conns: ConnListId,
}

/// A whole tile's wire map, sorted by entry wire id. Wires without outgoing
/// edges are absent.
pub type WireMap = Vec<WireEntryId>;

/// Wires the tile drives (site output pins), sorted.
pub type SourceList = Vec<WireId>;

/// For a site-input pin wire, the switch-matrix wire a router must reach to
/// be one hop away, and in which tile relative to the pin's own.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone)]
pub struct SinkPin {
    pub wire: WireId,
    pub drow: i16,
    pub dcol: i16,
}

pub type SinkMap = BTreeMap<WireId, SinkPin>;

#[derive(
    Debug, Eq, PartialEq, Hash, Copy, Clone, PartialOrd, Ord, bincode::Encode, bincode::Decode,
)]
pub enum PinDir {
    Input,
    Output,
    Bidir,
}

#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct SitePin {
    pub dir: PinDir,
    pub wire: Option<WireId>,
}

/// Internal pin name to external wire mapping of one site, pooled across all
/// structurally identical sites.
pub type PinMap = BTreeMap<String, SitePin>;

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Site {
    pub name: String,
    pub kind: String,
    pub tile: TileId,
    pub pins: PinMapId,
}

impl Site {
    /// `(x, y)` parsed from the name's `_X#_Y#` suffix, if present.
    pub fn instance_xy(&self) -> Option<(u32, u32)> {
        split_xy(&self.name).map(|(_, x, y)| (x, y))
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Tile {
    pub name: String,
    pub kind: String,
    pub row: u16,
    pub col: u16,
    pub wires: WireMapId,
    pub sources: SourceListId,
    pub sinks: SinkMapId,
    pub sites: Option<Vec<Site>>,
}

impl Tile {
    /// `(x, y)` parsed from the name's coordinate suffix. Distinct from the
    /// absolute `(row, col)` grid position.
    pub fn tile_xy(&self) -> Option<(u32, u32)> {
        split_xy(&self.name).map(|(_, x, y)| (x, y))
    }
}

/// An interconnect point realized by configuring a primitive as
/// pass-through rather than a dedicated wire.
#[derive(Debug, Eq, PartialEq, Hash, Clone)]
pub struct RouteThrough {
    pub site_kind: String,
    pub wire_in: WireId,
    pub wire_out: WireId,
}

/// A realized routing decision recorded against a design, distinct from the
/// static edge it corresponds to. Wire ids resolve against the same device's
/// id space.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct Pip {
    pub tile: TileId,
    pub wire_from: WireId,
    pub wire_to: WireId,
}

/// Splits `FOO_X3_Y7` into `("FOO", 3, 7)`.
pub fn split_xy(s: &str) -> Option<(&str, u32, u32)> {
    let (l, r) = s.rfind("_X").map(|pos| (&s[..pos], &s[pos + 2..]))?;
    let (x, y) = r.rfind("_Y").map(|pos| (&r[..pos], &r[pos + 2..]))?;
    let x = x.parse::<u32>().ok()?;
    let y = y.parse::<u32>().ok()?;
    Some((l, x, y))
}
