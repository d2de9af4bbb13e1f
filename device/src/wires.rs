//! Per-family wire enumeration: dense ids for wire-name strings, with
//! classification and interconnect-endpoint flags.
//!
//! Ids are only meaningful relative to the `WireList` that produced them;
//! they are never comparable across families. A loaded list is never
//! rebuilt within a process, so ids stay stable for its lifetime.

use std::error::Error;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use unnamed_entity::{EntityBitVec, EntitySet, EntityVec};

use crate::codec::{CodecError, Dec, Enc, WIRELIST_FORMAT};
use crate::tiles::WireId;

#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, bincode::Encode, bincode::Decode)]
pub enum WireKind {
    /// Ordinary tile-local routing.
    Local,
    /// Long-distance spine wire; some families treat these as bidirectional.
    Long,
    /// Clock distribution.
    Clock,
    /// External wire of a site input pin.
    SitePinIn,
    /// External wire of a site output pin.
    SitePinOut,
    Unknown,
}

#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, bincode::Encode, bincode::Decode)]
pub enum WireDir {
    Horiz,
    Vert,
    Omni,
}

#[derive(Debug, Clone)]
pub struct WireList {
    pub family: String,
    pub names: EntitySet<WireId, String>,
    pub kinds: EntityVec<WireId, WireKind>,
    pub dirs: EntityVec<WireId, WireDir>,
    pub pip_wires: EntityBitVec<WireId>,
}

impl WireList {
    pub fn new(family: impl Into<String>) -> Self {
        WireList {
            family: family.into(),
            names: EntitySet::new(),
            kinds: EntityVec::new(),
            dirs: EntityVec::new(),
            pip_wires: EntityBitVec::new(),
        }
    }

    /// Appends a wire; names must arrive in the deterministic scan order.
    pub fn push(&mut self, name: String, kind: WireKind, dir: WireDir, is_pip: bool) -> WireId {
        let id = self.names.insert_new(name);
        self.kinds.push(kind);
        self.dirs.push(dir);
        self.pip_wires.push(is_pip);
        id
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Unknown names are not an error; callers decide significance.
    pub fn id_of(&self, name: &str) -> Option<WireId> {
        self.names.get(name)
    }

    pub fn name_of(&self, wire: WireId) -> &str {
        &self.names[wire]
    }

    pub fn kind_of(&self, wire: WireId) -> WireKind {
        self.kinds[wire]
    }

    pub fn dir_of(&self, wire: WireId) -> WireDir {
        self.dirs[wire]
    }

    pub fn is_pip_wire(&self, wire: WireId) -> bool {
        self.pip_wires[wire]
    }

    pub fn is_pip_wire_name(&self, name: &str) -> bool {
        match self.id_of(name) {
            Some(w) => self.is_pip_wire(w),
            None => false,
        }
    }

    pub fn to_write<W: Write>(&self, w: W) -> Result<(), CodecError> {
        let mut e = Enc::new(w)?;
        e.put(WIRELIST_FORMAT)?;
        e.put(self.family.as_str())?;
        e.put(self.names.len() as u64)?;
        for (id, name) in &self.names {
            e.put(name.as_str())?;
            e.put(self.kinds[id])?;
            e.put(self.dirs[id])?;
            e.put(self.pip_wires[id])?;
        }
        e.finish()
    }

    pub fn from_read<R: Read>(r: R) -> Result<Self, CodecError> {
        let mut d = Dec::new(r)?;
        let version: String = d.take()?;
        if version != WIRELIST_FORMAT {
            return Err(CodecError::Version {
                found: version,
                expected: WIRELIST_FORMAT,
            });
        }
        let family: String = d.take()?;
        let mut list = WireList::new(family);
        let n = d.take::<u64>()? as usize;
        for _ in 0..n {
            let name: String = d.take()?;
            let kind: WireKind = d.take()?;
            let dir: WireDir = d.take()?;
            let is_pip: bool = d.take()?;
            list.push(name, kind, dir, is_pip);
        }
        Ok(list)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        crate::codec::write_atomic(path.as_ref(), |w| self.to_write(w))?;
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let f = File::open(path)?;
        Ok(Self::from_read(f)?)
    }
}
