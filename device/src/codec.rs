//! Compact binary representation of a pooled device graph.
//!
//! Everything is written as pool contents plus integer indices, so file size
//! scales with unique-structure count rather than tile count. The section
//! order is a strict sequential protocol with no self-description; decode
//! mirrors encode exactly. The whole stream additionally passes through
//! zstd: pooling removes structural duplication, compression removes the
//! residual byte-level redundancy, and both are needed for acceptable size.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use unnamed_entity::{EntityId, EntitySet, EntityVec};

use crate::tiles::{
    ConnId, ConnListId, PinMapId, RouteThrough, SinkMap, SinkMapId, SinkPin, Site, SitePin,
    SourceListId, Tile, TileId, WireConn, WireEntry, WireEntryId, WireId, WireMapId,
};
use crate::{Device, SiteRef};

pub const DEVICE_FORMAT: &str = "prjfabric device v1";
pub const WIRELIST_FORMAT: &str = "prjfabric wirelist v1";

#[derive(Debug)]
pub enum CodecError {
    Io(io::Error),
    Encode(bincode::error::EncodeError),
    Decode(bincode::error::DecodeError),
    Version {
        found: String,
        expected: &'static str,
    },
    BadIndex {
        section: &'static str,
        index: u32,
    },
    Corrupt(&'static str),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "i/o error: {e}"),
            CodecError::Encode(e) => write!(f, "encode error: {e}"),
            CodecError::Decode(e) => write!(f, "decode error: {e}"),
            CodecError::Version { found, expected } => {
                write!(f, "format version mismatch: found {found:?}, expected {expected:?}")
            }
            CodecError::BadIndex { section, index } => {
                write!(f, "index {index} out of range in {section}")
            }
            CodecError::Corrupt(section) => write!(f, "corrupt {section}"),
        }
    }
}

impl Error for CodecError {}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::Io(e)
    }
}

impl From<bincode::error::EncodeError> for CodecError {
    fn from(e: bincode::error::EncodeError) -> Self {
        CodecError::Encode(e)
    }
}

impl From<bincode::error::DecodeError> for CodecError {
    fn from(e: bincode::error::DecodeError) -> Self {
        CodecError::Decode(e)
    }
}

pub(crate) struct Enc<W: Write> {
    w: zstd::stream::Encoder<'static, W>,
}

impl<W: Write> Enc<W> {
    pub fn new(w: W) -> Result<Self, CodecError> {
        Ok(Enc {
            w: zstd::stream::Encoder::new(w, 9)?,
        })
    }

    pub fn put<T: bincode::Encode>(&mut self, v: T) -> Result<(), CodecError> {
        bincode::encode_into_std_write(v, &mut self.w, bincode::config::standard())?;
        Ok(())
    }

    pub fn put_id<I: EntityId>(&mut self, id: I) -> Result<(), CodecError> {
        self.put(id.to_idx() as u32)
    }

    pub fn finish(self) -> Result<(), CodecError> {
        self.w.finish()?;
        Ok(())
    }
}

pub(crate) struct Dec<R: Read> {
    r: zstd::stream::Decoder<'static, BufReader<R>>,
}

impl<R: Read> Dec<R> {
    pub fn new(r: R) -> Result<Self, CodecError> {
        Ok(Dec {
            r: zstd::stream::Decoder::new(r)?,
        })
    }

    pub fn take<T: bincode::Decode<()>>(&mut self) -> Result<T, CodecError> {
        Ok(bincode::decode_from_std_read(
            &mut self.r,
            bincode::config::standard(),
        )?)
    }

    pub fn take_id<I: EntityId>(
        &mut self,
        len: usize,
        section: &'static str,
    ) -> Result<I, CodecError> {
        id_in(self.take::<u32>()?, len, section)
    }
}

fn id_in<I: EntityId>(v: u32, len: usize, section: &'static str) -> Result<I, CodecError> {
    if (v as usize) < len {
        Ok(I::from_idx(v as usize))
    } else {
        Err(CodecError::BadIndex { section, index: v })
    }
}

/// Write-to-temp then rename, so a failed encode never replaces the current
/// file for a part.
pub(crate) fn write_atomic(
    path: &Path,
    f: impl FnOnce(&File) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    f(tmp.as_file())?;
    tmp.persist(path).map_err(|e| CodecError::Io(e.error))?;
    Ok(())
}

const PIP_FLAG: u32 = 1 << 31;

fn pack_target(wire: WireId, is_pip: bool) -> u32 {
    let idx = wire.to_idx() as u32;
    assert!(idx < PIP_FLAG);
    if is_pip { idx | PIP_FLAG } else { idx }
}

fn unpack_target(v: u32) -> (WireId, bool) {
    (WireId::from_idx((v & !PIP_FLAG) as usize), v & PIP_FLAG != 0)
}

fn pack_offset(drow: i16, dcol: i16) -> u32 {
    ((drow as u16 as u32) << 16) | dcol as u16 as u32
}

fn unpack_offset(v: u32) -> (i16, i16) {
    ((v >> 16) as u16 as i16, v as u16 as i16)
}

fn pack_opt_wire(wire: Option<WireId>) -> u32 {
    match wire {
        Some(w) => {
            let idx = w.to_idx() as u32;
            assert!(idx < u32::MAX);
            idx
        }
        None => u32::MAX,
    }
}

fn unpack_opt_wire(v: u32) -> Option<WireId> {
    if v == u32::MAX {
        None
    } else {
        Some(WireId::from_idx(v as usize))
    }
}

// Length prefixes come straight off the file; cap pre-allocation so a corrupt
// count surfaces as a decode error instead of aborting on a huge reserve.
const PREALLOC_LIMIT: usize = 1 << 16;

fn cap(n: usize) -> usize {
    n.min(PREALLOC_LIMIT)
}

/// Inserts a decoded pool entry, requiring it to be fresh and to land on the
/// expected sequential id.
fn pool_insert<I: EntityId, V: std::hash::Hash + Eq>(
    pool: &mut EntitySet<I, V>,
    v: V,
    section: &'static str,
) -> Result<(), CodecError> {
    let expect = pool.len();
    let (id, fresh) = pool.insert(v);
    if !fresh || id.to_idx() != expect {
        return Err(CodecError::Corrupt(section));
    }
    Ok(())
}

impl Device {
    pub fn to_write<W: Write>(&self, w: W) -> Result<(), CodecError> {
        let mut e = Enc::new(w)?;
        e.put(DEVICE_FORMAT)?;
        e.put(self.rows)?;
        e.put(self.cols)?;

        e.put(self.conns.len() as u64)?;
        for conn in self.conns.values() {
            e.put(pack_target(conn.target, conn.is_pip))?;
            e.put(pack_offset(conn.drow, conn.dcol))?;
        }

        e.put(self.conn_lists.len() as u64)?;
        for list in self.conn_lists.values() {
            e.put(list.len() as u64)?;
            for &c in list {
                e.put_id(c)?;
            }
        }

        e.put(self.wire_entries.len() as u64)?;
        for entry in self.wire_entries.values() {
            e.put_id(entry.wire)?;
            e.put_id(entry.conns)?;
        }

        e.put(self.sink_maps.len() as u64)?;
        for map in self.sink_maps.values() {
            e.put(map.len() as u64)?;
            for (&wire, pin) in map {
                e.put_id(wire)?;
                e.put_id(pin.wire)?;
                e.put(pack_offset(pin.drow, pin.dcol))?;
            }
        }

        e.put(self.source_lists.len() as u64)?;
        for list in self.source_lists.values() {
            e.put(list.len() as u64)?;
            for &wire in list {
                e.put_id(wire)?;
            }
        }

        e.put(self.wire_maps.len() as u64)?;
        for map in self.wire_maps.values() {
            e.put(map.len() as u64)?;
            for &entry in map {
                e.put_id(entry)?;
            }
        }

        for tile in self.tiles.values() {
            e.put(tile.name.as_str())?;
            e.put(tile.kind.as_str())?;
            e.put_id(tile.sinks)?;
            e.put_id(tile.sources)?;
            e.put_id(tile.wires)?;
            e.put(tile.sites.as_ref().map_or(0, Vec::len) as u64)?;
        }

        e.put(self.part.as_str())?;
        e.put(self.family.as_str())?;

        e.put(self.pin_maps.len() as u64)?;
        for map in self.pin_maps.values() {
            e.put(map.len() as u64)?;
            for (name, pin) in map {
                e.put(name.as_str())?;
                e.put(pin.dir)?;
                e.put(pack_opt_wire(pin.wire))?;
            }
        }

        for tile in self.tiles.values() {
            let Some(sites) = &tile.sites else { continue };
            for site in sites {
                e.put(site.name.as_str())?;
                e.put(site.kind.as_str())?;
                e.put_id(site.tile)?;
                e.put_id(site.pins)?;
            }
        }

        e.put(self.route_throughs.len() as u64)?;
        for (&conn, rt) in &self.route_throughs {
            e.put(rt.site_kind.as_str())?;
            e.put_id(rt.wire_in)?;
            e.put_id(rt.wire_out)?;
            e.put_id(conn)?;
        }

        e.finish()
    }

    pub fn from_read<R: Read>(r: R) -> Result<Self, CodecError> {
        let mut d = Dec::new(r)?;
        let version: String = d.take()?;
        if version != DEVICE_FORMAT {
            return Err(CodecError::Version {
                found: version,
                expected: DEVICE_FORMAT,
            });
        }
        let rows: u16 = d.take()?;
        let cols: u16 = d.take()?;
        let ntiles = rows as usize * cols as usize;

        // Pools first, so the tile sections can resolve indices into shared
        // instances.
        let n = d.take::<u64>()? as usize;
        let mut conns: EntitySet<ConnId, WireConn> = EntitySet::with_capacity(cap(n));
        for _ in 0..n {
            let (target, is_pip) = unpack_target(d.take()?);
            let (drow, dcol) = unpack_offset(d.take()?);
            pool_insert(
                &mut conns,
                WireConn {
                    target,
                    drow,
                    dcol,
                    is_pip,
                },
                "conn pool",
            )?;
        }

        let n = d.take::<u64>()? as usize;
        let mut conn_lists: EntitySet<ConnListId, Vec<ConnId>> = EntitySet::with_capacity(cap(n));
        for _ in 0..n {
            let len = d.take::<u64>()? as usize;
            let mut list = Vec::with_capacity(cap(len));
            for _ in 0..len {
                list.push(d.take_id(conns.len(), "conn-list pool")?);
            }
            pool_insert(&mut conn_lists, list, "conn-list pool")?;
        }

        let n = d.take::<u64>()? as usize;
        let mut wire_entries: EntitySet<WireEntryId, WireEntry> = EntitySet::with_capacity(cap(n));
        for _ in 0..n {
            let wire: WireId = WireId::from_idx(d.take::<u32>()? as usize);
            let lists: ConnListId = d.take_id(conn_lists.len(), "wire-entry pool")?;
            pool_insert(
                &mut wire_entries,
                WireEntry { wire, conns: lists },
                "wire-entry pool",
            )?;
        }

        let n = d.take::<u64>()? as usize;
        let mut sink_maps: EntitySet<SinkMapId, SinkMap> = EntitySet::with_capacity(cap(n));
        for _ in 0..n {
            let len = d.take::<u64>()? as usize;
            let mut map = SinkMap::new();
            for _ in 0..len {
                let wire = WireId::from_idx(d.take::<u32>()? as usize);
                let sink = WireId::from_idx(d.take::<u32>()? as usize);
                let (drow, dcol) = unpack_offset(d.take()?);
                map.insert(
                    wire,
                    SinkPin {
                        wire: sink,
                        drow,
                        dcol,
                    },
                );
            }
            pool_insert(&mut sink_maps, map, "sink-map pool")?;
        }

        let n = d.take::<u64>()? as usize;
        let mut source_lists: EntitySet<SourceListId, Vec<WireId>> = EntitySet::with_capacity(cap(n));
        for _ in 0..n {
            let len = d.take::<u64>()? as usize;
            let mut list = Vec::with_capacity(cap(len));
            for _ in 0..len {
                list.push(WireId::from_idx(d.take::<u32>()? as usize));
            }
            pool_insert(&mut source_lists, list, "source-list pool")?;
        }

        let n = d.take::<u64>()? as usize;
        let mut wire_maps: EntitySet<WireMapId, Vec<WireEntryId>> = EntitySet::with_capacity(cap(n));
        for _ in 0..n {
            let len = d.take::<u64>()? as usize;
            let mut map = Vec::with_capacity(cap(len));
            for _ in 0..len {
                map.push(d.take_id(wire_entries.len(), "wire-map pool")?);
            }
            pool_insert(&mut wire_maps, map, "wire-map pool")?;
        }

        let mut tiles: EntityVec<TileId, Tile> = EntityVec::with_capacity(cap(ntiles));
        let mut site_counts: Vec<usize> = Vec::with_capacity(cap(ntiles));
        for i in 0..ntiles {
            let name: String = d.take()?;
            let kind: String = d.take()?;
            let sinks: SinkMapId = d.take_id(sink_maps.len(), "tile sink map")?;
            let sources: SourceListId = d.take_id(source_lists.len(), "tile source list")?;
            let wires: WireMapId = d.take_id(wire_maps.len(), "tile wire map")?;
            site_counts.push(d.take::<u64>()? as usize);
            tiles.push(Tile {
                name,
                kind,
                row: (i / cols as usize) as u16,
                col: (i % cols as usize) as u16,
                wires,
                sources,
                sinks,
                sites: None,
            });
        }

        let part: String = d.take()?;
        let family: String = d.take()?;

        let n = d.take::<u64>()? as usize;
        let mut pin_maps: EntitySet<PinMapId, BTreeMap<String, SitePin>> =
            EntitySet::with_capacity(cap(n));
        for _ in 0..n {
            let len = d.take::<u64>()? as usize;
            let mut map = BTreeMap::new();
            for _ in 0..len {
                let name: String = d.take()?;
                let dir = d.take()?;
                let wire = unpack_opt_wire(d.take()?);
                map.insert(name, SitePin { dir, wire });
            }
            pool_insert(&mut pin_maps, map, "pin-map pool")?;
        }

        let mut sites_by_name = HashMap::new();
        for (tid, &count) in site_counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let tid = TileId::from_idx(tid);
            let mut sites = Vec::with_capacity(cap(count));
            for slot in 0..count {
                let name: String = d.take()?;
                let kind: String = d.take()?;
                let tile: TileId = d.take_id(ntiles, "site tile address")?;
                if tile != tid {
                    return Err(CodecError::Corrupt("site tile address"));
                }
                let pins: PinMapId = d.take_id(pin_maps.len(), "site pin map")?;
                if sites_by_name
                    .insert(name.clone(), SiteRef { tile: tid, slot })
                    .is_some()
                {
                    return Err(CodecError::Corrupt("site name index"));
                }
                sites.push(Site {
                    name,
                    kind,
                    tile,
                    pins,
                });
            }
            tiles[tid].sites = Some(sites);
        }

        let n = d.take::<u64>()? as usize;
        let mut route_throughs = BTreeMap::new();
        for _ in 0..n {
            let site_kind: String = d.take()?;
            let wire_in = WireId::from_idx(d.take::<u32>()? as usize);
            let wire_out = WireId::from_idx(d.take::<u32>()? as usize);
            let conn: ConnId = d.take_id(conns.len(), "route-through table")?;
            route_throughs.insert(
                conn,
                RouteThrough {
                    site_kind,
                    wire_in,
                    wire_out,
                },
            );
        }

        let mut tiles_by_name = HashMap::with_capacity(cap(ntiles));
        for (tid, tile) in &tiles {
            if tiles_by_name.insert(tile.name.clone(), tid).is_some() {
                return Err(CodecError::Corrupt("tile name index"));
            }
        }

        Ok(Device {
            part,
            family,
            rows,
            cols,
            tiles,
            tiles_by_name,
            sites_by_name,
            conns,
            conn_lists,
            wire_entries,
            sink_maps,
            source_lists,
            wire_maps,
            pin_maps,
            route_throughs,
        })
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        write_atomic(path.as_ref(), |w| self.to_write(w))?;
        Ok(())
    }

    /// Decodes into a scratch instance; a failed decode leaves no partial
    /// state anywhere.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let f = File::open(path)?;
        Ok(Self::from_read(f)?)
    }
}
