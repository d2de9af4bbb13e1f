//! Incremental device construction.
//!
//! `DeviceBuilder` interns each tile's structures the moment the tile's
//! record arrives, so peak memory tracks the number of unique structures
//! rather than the number of tiles. `finish()` then runs the global passes
//! that need the whole grid: the site-order check, backwards-edge removal,
//! the sink scan, and the name indices.

use std::collections::{BTreeMap, HashMap, hash_map::Entry};

use prjfabric_device::family::FamilyRules;
use prjfabric_device::{
    ConnId, ConnList, ConnListId, Device, PinDir, PinMap, PinMapId, RouteThrough, SinkMap,
    SinkMapId, SinkPin, Site, SitePin, SiteRef, SourceList, SourceListId, Tile, TileId, WireConn,
    WireEntry, WireEntryId, WireId, WireKind, WireList, WireMap, WireMapId,
};
use unnamed_entity::{EntityId, EntityPartVec, EntitySet, EntityVec};

use crate::parse::TileRecord;

#[derive(Debug)]
pub enum BuildError {
    TileOffGrid {
        tile: String,
        row: u16,
        col: u16,
    },
    DuplicateTile {
        row: u16,
        col: u16,
    },
    MissingTile {
        row: u16,
        col: u16,
    },
    DuplicateTileName(String),
    DuplicateSite(String),
    UnknownWire {
        tile: String,
        wire: String,
    },
    OffsetOverflow {
        tile: String,
        wire: String,
    },
    /// Two tiles of the same kind list their sites in different orders,
    /// which would break ordinal site correspondence.
    SiteOrder {
        tile_kind: String,
        tile_a: String,
        tile_b: String,
    },
    FamilyMismatch {
        stream: String,
        wire_list: String,
    },
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::TileOffGrid { tile, row, col } => {
                write!(f, "tile {tile} at ({row}, {col}) is outside the grid")
            }
            BuildError::DuplicateTile { row, col } => {
                write!(f, "two tiles at ({row}, {col})")
            }
            BuildError::MissingTile { row, col } => {
                write!(f, "no tile at ({row}, {col})")
            }
            BuildError::DuplicateTileName(name) => write!(f, "duplicate tile name {name}"),
            BuildError::DuplicateSite(name) => write!(f, "duplicate site name {name}"),
            BuildError::UnknownWire { tile, wire } => {
                write!(f, "tile {tile} references unknown wire {wire}")
            }
            BuildError::OffsetOverflow { tile, wire } => {
                write!(f, "conn offset out of range in tile {tile}, wire {wire}")
            }
            BuildError::SiteOrder {
                tile_kind,
                tile_a,
                tile_b,
            } => write!(
                f,
                "tiles {tile_a} and {tile_b} of kind {tile_kind} list sites in different orders"
            ),
            BuildError::FamilyMismatch { stream, wire_list } => write!(
                f,
                "stream is for family {stream} but the wire list is for {wire_list}"
            ),
        }
    }
}

impl std::error::Error for BuildError {}

struct RawSite {
    name: String,
    kind: String,
    pins: Vec<(String, PinDir, Option<WireId>)>,
}

struct RawTile {
    name: String,
    kind: String,
    row: u16,
    col: u16,
    wires: WireMapId,
    sources: SourceListId,
    sites: Vec<RawSite>,
}

pub struct DeviceBuilder<'a> {
    part: String,
    family: String,
    rows: u16,
    cols: u16,
    wires: &'a WireList,
    rules: &'a FamilyRules,
    conns: EntitySet<ConnId, WireConn>,
    conn_lists: EntitySet<ConnListId, ConnList>,
    wire_entries: EntitySet<WireEntryId, WireEntry>,
    wire_maps: EntitySet<WireMapId, WireMap>,
    source_lists: EntitySet<SourceListId, SourceList>,
    tiles: EntityPartVec<TileId, RawTile>,
    route_throughs: Vec<(String, WireId, WireId)>,
}

fn lookup(
    wires: &WireList,
    tile: &str,
    name: &str,
) -> Result<WireId, BuildError> {
    wires.id_of(name).ok_or_else(|| BuildError::UnknownWire {
        tile: tile.to_string(),
        wire: name.to_string(),
    })
}

impl<'a> DeviceBuilder<'a> {
    pub fn new(
        part: impl Into<String>,
        family: impl Into<String>,
        rows: u16,
        cols: u16,
        wires: &'a WireList,
        rules: &'a FamilyRules,
    ) -> Self {
        DeviceBuilder {
            part: part.into(),
            family: family.into(),
            rows,
            cols,
            wires,
            rules,
            conns: EntitySet::new(),
            conn_lists: EntitySet::new(),
            wire_entries: EntitySet::new(),
            wire_maps: EntitySet::new(),
            source_lists: EntitySet::new(),
            tiles: EntityPartVec::new(),
            route_throughs: Vec::new(),
        }
    }

    /// Resolves one tile record to ids and interns its structures. The raw
    /// edge lists are dropped before the next record arrives.
    pub fn add_tile(&mut self, rec: TileRecord) -> Result<(), BuildError> {
        if rec.row >= self.rows || rec.col >= self.cols {
            return Err(BuildError::TileOffGrid {
                tile: rec.name,
                row: rec.row,
                col: rec.col,
            });
        }
        let tid = TileId::from_idx(rec.row as usize * self.cols as usize + rec.col as usize);
        if self.tiles.contains_id(tid) {
            return Err(BuildError::DuplicateTile {
                row: rec.row,
                col: rec.col,
            });
        }

        let mut edges: BTreeMap<WireId, Vec<WireConn>> = BTreeMap::new();
        for w in &rec.wires {
            let wid = lookup(self.wires, &rec.name, &w.name)?;
            let list = edges.entry(wid).or_default();
            for c in &w.conns {
                let drow = i16::try_from(c.row as i32 - rec.row as i32);
                let dcol = i16::try_from(c.col as i32 - rec.col as i32);
                let (Ok(drow), Ok(dcol)) = (drow, dcol) else {
                    return Err(BuildError::OffsetOverflow {
                        tile: rec.name.clone(),
                        wire: w.name.clone(),
                    });
                };
                list.push(WireConn {
                    target: lookup(self.wires, &rec.name, &c.wire)?,
                    drow,
                    dcol,
                    is_pip: false,
                });
            }
        }
        for p in &rec.pips {
            let from = lookup(self.wires, &rec.name, &p.wire_from)?;
            let to = lookup(self.wires, &rec.name, &p.wire_to)?;
            edges.entry(from).or_default().push(WireConn {
                target: to,
                drow: 0,
                dcol: 0,
                is_pip: true,
            });
            if let Some(rt) = &p.route_through {
                self.route_throughs.push((rt.site_kind.clone(), from, to));
            }
        }

        let mut wire_map = Vec::new();
        for (wid, mut list) in edges {
            if list.is_empty() {
                continue;
            }
            list.sort();
            list.dedup();
            let conns: ConnList = list.into_iter().map(|c| self.conns.insert(c).0).collect();
            let conns = self.conn_lists.insert(conns).0;
            wire_map.push(self.wire_entries.insert(WireEntry { wire: wid, conns }).0);
        }
        let wires_id = self.wire_maps.insert(wire_map).0;

        let mut sources = Vec::new();
        let mut sites = Vec::new();
        for s in &rec.sites {
            let mut pins = Vec::new();
            for p in &s.pins {
                let wire = match &p.wire {
                    Some(w) => Some(lookup(self.wires, &rec.name, w)?),
                    None => None,
                };
                if let Some(w) = wire
                    && matches!(p.dir, PinDir::Output | PinDir::Bidir)
                {
                    sources.push(w);
                }
                pins.push((p.name.clone(), p.dir, wire));
            }
            sites.push(RawSite {
                name: s.name.clone(),
                kind: s.kind.clone(),
                pins,
            });
        }
        sources.sort();
        sources.dedup();
        let sources_id = self.source_lists.insert(sources).0;

        self.tiles.insert(
            tid,
            RawTile {
                name: rec.name,
                kind: rec.kind,
                row: rec.row,
                col: rec.col,
                wires: wires_id,
                sources: sources_id,
                sites,
            },
        );
        Ok(())
    }

    pub fn finish(self) -> Result<Device, BuildError> {
        let DeviceBuilder {
            part,
            family,
            rows,
            cols,
            wires,
            rules,
            conns,
            conn_lists,
            wire_entries,
            wire_maps,
            source_lists,
            tiles,
            route_throughs,
        } = self;
        // EntityPartVec conversion drops trailing holes, so coverage has to
        // be checked against the grid size explicitly.
        let ntiles = rows as usize * cols as usize;
        for idx in 0..ntiles {
            if !tiles.contains_id(TileId::from_idx(idx)) {
                return Err(BuildError::MissingTile {
                    row: (idx / cols as usize) as u16,
                    col: (idx % cols as usize) as u16,
                });
            }
        }
        let raw_tiles: EntityVec<TileId, RawTile> = tiles.into_full();

        // Every tile of a kind must list site kinds in the same sequence;
        // ordinal correspondence depends on it.
        let mut site_order: HashMap<&str, (&str, Vec<&str>)> = HashMap::new();
        for t in raw_tiles.values() {
            let kinds: Vec<&str> = t.sites.iter().map(|s| s.kind.as_str()).collect();
            match site_order.entry(&t.kind) {
                Entry::Vacant(e) => {
                    e.insert((&t.name, kinds));
                }
                Entry::Occupied(e) => {
                    if e.get().1 != kinds {
                        return Err(BuildError::SiteOrder {
                            tile_kind: t.kind.clone(),
                            tile_a: e.get().0.to_string(),
                            tile_b: t.name.clone(),
                        });
                    }
                }
            }
        }

        // Backwards-edge removal, decided against the staged graph as a
        // whole before any tile is rewritten.
        let has_reverse = |t2: &RawTile, from: WireId, to: WireId, drow: i16, dcol: i16| {
            let map = &wire_maps[t2.wires];
            match map.binary_search_by_key(&from, |&e| wire_entries[e].wire) {
                Ok(pos) => conn_lists[wire_entries[map[pos]].conns].iter().any(|&c| {
                    let cc = conns[c];
                    cc.target == to && cc.drow == drow && cc.dcol == dcol
                }),
                Err(_) => false,
            }
        };
        let keep = |t: &RawTile, wire: WireId, cc: WireConn| {
            if cc.is_pip || (cc.drow == 0 && cc.dcol == 0) {
                return true;
            }
            if wires.kind_of(wire) == rules.bidi_exempt {
                return true;
            }
            let row = t.row as i32 + cc.drow as i32;
            let col = t.col as i32 + cc.dcol as i32;
            if row < 0 || row >= rows as i32 || col < 0 || col >= cols as i32 {
                // Dangling edges stay; they are what lets boundary tiles
                // share structure with interior ones.
                return true;
            }
            let t2 = &raw_tiles
                [TileId::from_idx(row as usize * cols as usize + col as usize)];
            has_reverse(t2, cc.target, wire, -cc.drow, -cc.dcol)
        };

        // Rebuild every tile into fresh pools so the final index space holds
        // only surviving entries.
        let mut fconns: EntitySet<ConnId, WireConn> = EntitySet::new();
        let mut fconn_lists: EntitySet<ConnListId, ConnList> = EntitySet::new();
        let mut fwire_entries: EntitySet<WireEntryId, WireEntry> = EntitySet::new();
        let mut fwire_maps: EntitySet<WireMapId, WireMap> = EntitySet::new();
        let mut fsource_lists: EntitySet<SourceListId, SourceList> = EntitySet::new();
        let mut tile_wires: EntityVec<TileId, WireMapId> = EntityVec::new();
        let mut tile_sources: EntityVec<TileId, SourceListId> = EntityVec::new();
        for t in raw_tiles.values() {
            let mut wire_map = Vec::new();
            for &e in &wire_maps[t.wires] {
                let entry = wire_entries[e];
                let list: ConnList = conn_lists[entry.conns]
                    .iter()
                    .filter(|&&c| keep(t, entry.wire, conns[c]))
                    .map(|&c| fconns.insert(conns[c]).0)
                    .collect();
                if list.is_empty() {
                    continue;
                }
                let conns_id = fconn_lists.insert(list).0;
                wire_map.push(
                    fwire_entries
                        .insert(WireEntry {
                            wire: entry.wire,
                            conns: conns_id,
                        })
                        .0,
                );
            }
            tile_wires.push(fwire_maps.insert(wire_map).0);
            tile_sources.push(fsource_lists.insert(source_lists[t.sources].clone()).0);
        }

        // Sink scan over the surviving graph: for every site input pin wire,
        // the wire one hop upstream and the tile it lives in. Pip edges are
        // the pin's direct drivers and win over plain conn aliases.
        let mut sinks: EntityVec<TileId, SinkMap> =
            raw_tiles.ids().map(|_| SinkMap::new()).collect();
        for pips_only in [true, false] {
            for (tid, t) in &raw_tiles {
                for &e in fwire_maps[tile_wires[tid]].iter() {
                    let entry = fwire_entries[e];
                    for &c in &fconn_lists[entry.conns] {
                        let cc = fconns[c];
                        if cc.is_pip != pips_only {
                            continue;
                        }
                        if wires.kind_of(cc.target) != WireKind::SitePinIn {
                            continue;
                        }
                        let row = t.row as i32 + cc.drow as i32;
                        let col = t.col as i32 + cc.dcol as i32;
                        if row < 0 || row >= rows as i32 || col < 0 || col >= cols as i32 {
                            continue;
                        }
                        let land = TileId::from_idx(row as usize * cols as usize + col as usize);
                        sinks[land].entry(cc.target).or_insert(SinkPin {
                            wire: entry.wire,
                            drow: -cc.drow,
                            dcol: -cc.dcol,
                        });
                    }
                }
            }
        }
        let mut fsink_maps: EntitySet<SinkMapId, SinkMap> = EntitySet::new();
        let tile_sinks: EntityVec<TileId, SinkMapId> = sinks
            .into_values()
            .map(|m| fsink_maps.insert(m).0)
            .collect();

        // Sites, pin maps, name indices.
        let mut fpin_maps: EntitySet<PinMapId, PinMap> = EntitySet::new();
        let mut tiles_by_name = HashMap::new();
        let mut sites_by_name = HashMap::new();
        let mut final_tiles: EntityVec<TileId, Tile> = EntityVec::new();
        for (tid, t) in &raw_tiles {
            let mut sites = Vec::new();
            for (slot, s) in t.sites.iter().enumerate() {
                let pin_map: PinMap = s
                    .pins
                    .iter()
                    .map(|(name, dir, wire)| {
                        (name.clone(), SitePin { dir: *dir, wire: *wire })
                    })
                    .collect();
                let pins = fpin_maps.insert(pin_map).0;
                if sites_by_name
                    .insert(s.name.clone(), SiteRef { tile: tid, slot })
                    .is_some()
                {
                    return Err(BuildError::DuplicateSite(s.name.clone()));
                }
                sites.push(Site {
                    name: s.name.clone(),
                    kind: s.kind.clone(),
                    tile: tid,
                    pins,
                });
            }
            if tiles_by_name.insert(t.name.clone(), tid).is_some() {
                return Err(BuildError::DuplicateTileName(t.name.clone()));
            }
            final_tiles.push(Tile {
                name: t.name.clone(),
                kind: t.kind.clone(),
                row: t.row,
                col: t.col,
                wires: tile_wires[tid],
                sources: tile_sources[tid],
                sinks: tile_sinks[tid],
                sites: if sites.is_empty() { None } else { Some(sites) },
            });
        }

        let mut rt_table = BTreeMap::new();
        for (site_kind, from, to) in route_throughs {
            let Some(conn) = fconns.get(&WireConn {
                target: to,
                drow: 0,
                dcol: 0,
                is_pip: true,
            }) else {
                unreachable!("route-through pip {from:?} -> {to:?} missing from conn pool");
            };
            rt_table.entry(conn).or_insert(RouteThrough {
                site_kind,
                wire_in: from,
                wire_out: to,
            });
        }

        Ok(Device {
            part,
            family,
            rows,
            cols,
            tiles: final_tiles,
            tiles_by_name,
            sites_by_name,
            conns: fconns,
            conn_lists: fconn_lists,
            wire_entries: fwire_entries,
            sink_maps: fsink_maps,
            source_lists: fsource_lists,
            wire_maps: fwire_maps,
            pin_maps: fpin_maps,
            route_throughs: rt_table,
        })
    }
}
