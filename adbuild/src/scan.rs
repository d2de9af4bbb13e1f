//! Wire-table scan: the first pass over a family's fabric report streams,
//! producing the `WireList` every later build of that family resolves
//! against.
//!
//! The scan collects every name a stream can mention a wire by (wire
//! declarations, conn targets, pip endpoints, site pin wires) and assigns
//! ids in sorted order, so the list is independent of tile order and of
//! which representative parts were scanned first.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;

use prjfabric_device::family::FamilyRules;
use prjfabric_device::{PinDir, WireDir, WireKind, WireList};

use crate::parse::Parser;
use crate::Error;

fn dir_rank(dir: PinDir) -> u8 {
    match dir {
        PinDir::Input => 0,
        PinDir::Bidir => 1,
        PinDir::Output => 2,
    }
}

/// Scans one or more streams of the same family into a `WireList`.
pub fn scan_wire_list<R: BufRead>(
    streams: impl IntoIterator<Item = R>,
    rules: &FamilyRules,
) -> Result<WireList, Error> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    let mut pip_wires: BTreeSet<String> = BTreeSet::new();
    // Highest-ranked declared direction wins when a pin wire shows up with
    // several.
    let mut pin_dirs: BTreeMap<String, PinDir> = BTreeMap::new();
    for stream in streams {
        let mut parser = Parser::new(stream)?;
        while let Some(tile) = parser.next_tile()? {
            for w in &tile.wires {
                names.insert(w.name.clone());
                for c in &w.conns {
                    names.insert(c.wire.clone());
                }
            }
            for p in &tile.pips {
                names.insert(p.wire_from.clone());
                names.insert(p.wire_to.clone());
                pip_wires.insert(p.wire_from.clone());
                pip_wires.insert(p.wire_to.clone());
            }
            for s in &tile.sites {
                for pin in &s.pins {
                    let Some(wire) = &pin.wire else { continue };
                    names.insert(wire.clone());
                    pin_dirs
                        .entry(wire.clone())
                        .and_modify(|d| {
                            if dir_rank(pin.dir) > dir_rank(*d) {
                                *d = pin.dir;
                            }
                        })
                        .or_insert(pin.dir);
                }
            }
        }
    }

    let mut list = WireList::new(rules.family);
    for name in names {
        let (kind, dir) = match pin_dirs.get(&name) {
            Some(PinDir::Input) => (WireKind::SitePinIn, WireDir::Omni),
            Some(PinDir::Output | PinDir::Bidir) => (WireKind::SitePinOut, WireDir::Omni),
            None => rules.classify(&name),
        };
        let is_pip = pip_wires.contains(&name);
        list.push(name, kind, dir, is_pip);
    }
    Ok(list)
}
