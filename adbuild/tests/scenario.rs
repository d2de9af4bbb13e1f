use assert_matches::assert_matches;
use prjfabric_adbuild::scan::scan_wire_list;
use prjfabric_adbuild::{read_device, BuildError, Error};
use prjfabric_device::family::VEGA;
use prjfabric_device::{Device, Pip, SinkPin, WireList};

fn build(stream: &str) -> (Device, WireList) {
    let wires = scan_wire_list([stream.as_bytes()], &VEGA).unwrap();
    let dev = read_device(stream.as_bytes(), &wires, &VEGA).unwrap();
    (dev, wires)
}

/// Every edge array must be strictly sorted by resolved conn value.
fn assert_sorted_edges(dev: &Device) {
    for list in dev.conn_lists.values() {
        let vals: Vec<_> = list.iter().map(|&c| dev.conn(c)).collect();
        assert!(vals.windows(2).all(|w| w[0] < w[1]), "unsorted: {vals:?}");
    }
}

/// A 2×2 grid: a SLICE tile at (0, 0) carrying the only site, SWITCH tiles
/// everywhere else. All four tiles have identical wiring, so the whole grid
/// folds into one wire map.
const GRID_2X2: &str = "\
(fabric_report 1.0 xfab50 vega)
(tiles 2 2)
\t(tile 0 0 SLICE_R0C0 SLICE 1
\t\t(site SLICE_X0Y0 SLICEL
\t\t\t(pin A_IN input SLICE_A)
\t\t\t(pin OUT output SLICE_O)
\t\t)
\t\t(wire LH0
\t\t\t(conn 0 1 LH1)
\t\t)
\t\t(pip INT_A0 -> INT_B0)
\t\t(pip INT_B0 -> SLICE_A)
\t\t(pip SLICE_O -> INT_A0)
\t)
\t(tile 0 1 SWITCH_R0C1 SWITCH 0
\t\t(wire LH0
\t\t\t(conn 0 2 LH1)
\t\t)
\t\t(pip INT_A0 -> INT_B0)
\t\t(pip INT_B0 -> SLICE_A)
\t\t(pip SLICE_O -> INT_A0)
\t)
\t(tile 1 0 SWITCH_R1C0 SWITCH 0
\t\t(wire LH0
\t\t\t(conn 1 1 LH1)
\t\t)
\t\t(pip INT_A0 -> INT_B0)
\t\t(pip INT_B0 -> SLICE_A)
\t\t(pip SLICE_O -> INT_A0)
\t)
\t(tile 1 1 SWITCH_R1C1 SWITCH 0
\t\t(wire LH0
\t\t\t(conn 1 2 LH1)
\t\t)
\t\t(pip INT_A0 -> INT_B0)
\t\t(pip INT_B0 -> SLICE_A)
\t\t(pip SLICE_O -> INT_A0)
\t)
)
";

#[test]
fn grid_folds_into_shared_structures() {
    let (dev, wires) = build(GRID_2X2);
    assert_eq!((dev.rows, dev.cols), (2, 2));

    // Identical wiring in all four tiles collapses to a single pooled wire
    // map; the lone site contributes the single pin map.
    assert_eq!(dev.wire_maps.len(), 1);
    assert_eq!(dev.pin_maps.len(), 1);
    assert_eq!(dev.sink_maps.len(), 1);
    assert_eq!(dev.source_lists.len(), 2);

    assert_eq!(dev.tile_at(1, 1).unwrap().sites, None);
    let t00 = dev.tile_at(0, 0).unwrap();
    assert_eq!(t00.sites.as_ref().unwrap()[0].name, "SLICE_X0Y0");

    let slice_a = wires.id_of("SLICE_A").unwrap();
    let int_b0 = wires.id_of("INT_B0").unwrap();
    let slice_o = wires.id_of("SLICE_O").unwrap();
    let tid = dev.tile_addr(0, 0);
    assert_eq!(
        dev.sink_pin(tid, slice_a),
        Some(SinkPin {
            wire: int_b0,
            drow: 0,
            dcol: 0,
        })
    );
    assert_eq!(dev.sources_of(tid), [slice_o]);

    // The switch tiles share the wiring, including the sink, without a site.
    assert_eq!(dev.sink_pin(dev.tile_addr(1, 1), slice_a).map(|p| p.wire), Some(int_b0));
    assert!(dev.sources_of(dev.tile_addr(1, 1)).is_empty());

    assert_sorted_edges(&dev);
}

#[test]
fn grid_survives_round_trip() {
    let (dev, wires) = build(GRID_2X2);
    let mut buf = Vec::new();
    dev.to_write(&mut buf).unwrap();
    let back = Device::from_read(&buf[..]).unwrap();
    assert_eq!(back, dev);
    assert_sorted_edges(&back);

    let site = back.site_by_name("SLICE_X0Y0").unwrap();
    assert_eq!(site.kind, "SLICEL");
    assert_eq!(back.tile(site.tile).name, "SLICE_R0C0");
    let pins = back.pins_of(site);
    assert_eq!(pins.len(), 2);
    assert_eq!(pins["A_IN"].wire, wires.id_of("SLICE_A"));
}

#[test]
fn sink_records_cross_tile_driver_offset() {
    // The pin wire is fed from the neighboring tile; the sink entry points
    // back at the tile the driving wire lives in.
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 2)
\t(tile 0 0 INT_R0C0 INT 0
\t\t(wire INT_A0
\t\t\t(conn 0 1 SLICE_A)
\t\t)
\t)
\t(tile 0 1 SLICE_R0C1 SLICE 1
\t\t(site SLICE_X1Y0 SLICEL
\t\t\t(pin A_IN input SLICE_A)
\t\t)
\t\t(wire SLICE_A
\t\t\t(conn 0 0 INT_A0)
\t\t)
\t)
)
";
    let (dev, wires) = build(stream);
    let slice_a = wires.id_of("SLICE_A").unwrap();
    let int_a0 = wires.id_of("INT_A0").unwrap();
    assert_eq!(
        dev.sink_pin(dev.tile_addr(0, 1), slice_a),
        Some(SinkPin {
            wire: int_a0,
            drow: 0,
            dcol: -1,
        })
    );
    assert!(dev.sinks_of(dev.tile_addr(0, 0)).is_empty());
}

#[test]
fn ordinal_site_correspondence() {
    // Two CLB tiles listing their sites in the same order; slot position,
    // not name, carries the correspondence.
    let stream = "\
(fabric_report 1.0 xfab20 vega)
(tiles 1 2)
\t(tile 0 0 CLB_R0C0 CLB 2
\t\t(site SLICE_X0Y0 SLICEM)
\t\t(site SLICE_X0Y1 SLICEL)
\t)
\t(tile 0 1 CLB_R0C1 CLB 2
\t\t(site SLICE_X1Y0 SLICEM)
\t\t(site SLICE_X1Y1 SLICEL)
\t)
)
";
    let (dev, _) = build(stream);
    let site = dev.site_by_name("SLICE_X0Y1").unwrap();
    let over = dev
        .corresponding_site(site, "SLICEL", dev.tile_addr(0, 1), &VEGA)
        .unwrap();
    assert_eq!(over.name, "SLICE_X1Y1");
    // A SLICEM slot may host a SLICEL occupant per the compat table.
    let site = dev.site_by_name("SLICE_X0Y0").unwrap();
    let over = dev
        .corresponding_site(site, "SLICEL", dev.tile_addr(0, 1), &VEGA)
        .unwrap();
    assert_eq!(over.name, "SLICE_X1Y0");
    // Kind must be hostable at the target slot.
    assert!(dev
        .corresponding_site(site, "RAMB16", dev.tile_addr(0, 1), &VEGA)
        .is_none());
}

#[test]
fn one_way_edge_is_removed() {
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 2)
\t(tile 0 0 INT_R0C0 INT 0
\t\t(wire INT_A0
\t\t\t(conn 0 1 INT_B0)
\t\t)
\t)
\t(tile 0 1 INT_R0C1 INT 0
\t\t(wire INT_B0)
\t)
)
";
    let (dev, wires) = build(stream);
    let int_a0 = wires.id_of("INT_A0").unwrap();
    // No reciprocal edge in the neighbor, Local wire: dropped.
    assert_eq!(dev.conns_from(dev.tile_addr(0, 0), int_a0), []);
    assert_eq!(dev.conns.len(), 0);
}

#[test]
fn reciprocal_edge_is_kept() {
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 2)
\t(tile 0 0 INT_R0C0 INT 0
\t\t(wire INT_A0
\t\t\t(conn 0 1 INT_B0)
\t\t)
\t)
\t(tile 0 1 INT_R0C1 INT 0
\t\t(wire INT_B0
\t\t\t(conn 0 0 INT_A0)
\t\t)
\t)
)
";
    let (dev, wires) = build(stream);
    let int_a0 = wires.id_of("INT_A0").unwrap();
    let int_b0 = wires.id_of("INT_B0").unwrap();
    let fwd = dev.conns_from(dev.tile_addr(0, 0), int_a0);
    assert_eq!(fwd.len(), 1);
    let conn = dev.conn(fwd[0]);
    assert_eq!((conn.target, conn.drow, conn.dcol, conn.is_pip), (int_b0, 0, 1, false));
    assert_eq!(dev.conns_from(dev.tile_addr(0, 1), int_b0).len(), 1);
}

#[test]
fn exempt_class_edge_is_kept() {
    // LH wires are Long, the bidirectional-exempt class of this family: the
    // one-way edge stays even though the neighbor has no reciprocal.
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 2)
\t(tile 0 0 INT_R0C0 INT 0
\t\t(wire LH0
\t\t\t(conn 0 1 LH1)
\t\t)
\t)
\t(tile 0 1 INT_R0C1 INT 0
\t\t(wire LH1)
\t)
)
";
    let (dev, wires) = build(stream);
    let lh0 = wires.id_of("LH0").unwrap();
    assert_eq!(dev.conns_from(dev.tile_addr(0, 0), lh0).len(), 1);
}

#[test]
fn off_grid_edge_dangles() {
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 1)
\t(tile 0 0 INT_R0C0 INT 0
\t\t(wire INT_A0
\t\t\t(conn 0 1 INT_B0)
\t\t)
\t)
)
";
    let (dev, wires) = build(stream);
    let int_a0 = wires.id_of("INT_A0").unwrap();
    let tid = dev.tile_addr(0, 0);
    let conns = dev.conns_from(tid, int_a0);
    assert_eq!(conns.len(), 1);
    assert_eq!(dev.conn_target(tid, dev.conn(conns[0])), None);
}

#[test]
fn route_through_registration() {
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 1)
\t(tile 0 0 INT_R0C0 INT 1
\t\t(site SLICE_X0Y0 SLICEL
\t\t\t(pin I input SLICE_I)
\t\t\t(pin O output SLICE_O)
\t\t)
\t\t(pip LH0 -> LH6 (routethru SLICEL I-O))
\t\t(pip LH0 -> INT_A0)
\t)
)
";
    let (dev, wires) = build(stream);
    let lh0 = wires.id_of("LH0").unwrap();
    let lh6 = wires.id_of("LH6").unwrap();
    let tid = dev.tile_addr(0, 0);

    let conn = dev
        .pip_conn(Pip {
            tile: tid,
            wire_from: lh0,
            wire_to: lh6,
        })
        .unwrap();
    assert!(dev.is_route_through(conn));
    let rt = dev.route_through(conn).unwrap();
    assert_eq!(rt.site_kind, "SLICEL");
    assert_eq!((rt.wire_in, rt.wire_out), (lh0, lh6));

    // The plain pip next to it is not a route-through.
    let plain = dev
        .pip_conn(Pip {
            tile: tid,
            wire_from: lh0,
            wire_to: wires.id_of("INT_A0").unwrap(),
        })
        .unwrap();
    assert!(!dev.is_route_through(plain));

    // Route-throughs survive the codec.
    let mut buf = Vec::new();
    dev.to_write(&mut buf).unwrap();
    let back = Device::from_read(&buf[..]).unwrap();
    assert_eq!(back.route_throughs, dev.route_throughs);
}

#[test]
fn mismatched_site_order_fails_loudly() {
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 2)
\t(tile 0 0 CLB_R0C0 CLB 2
\t\t(site SLICE_X0Y0 SLICEL)
\t\t(site SLICE_X0Y1 SLICEM)
\t)
\t(tile 0 1 CLB_R0C1 CLB 2
\t\t(site SLICE_X1Y0 SLICEM)
\t\t(site SLICE_X1Y1 SLICEL)
\t)
)
";
    let wires = scan_wire_list([stream.as_bytes()], &VEGA).unwrap();
    assert_matches!(
        read_device(stream.as_bytes(), &wires, &VEGA),
        Err(Error::Build(BuildError::SiteOrder { .. }))
    );
}

#[test]
fn missing_tile_fails_loudly() {
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 2)
\t(tile 0 0 INT_R0C0 INT 0
\t)
)
";
    let wires = scan_wire_list([stream.as_bytes()], &VEGA).unwrap();
    assert_matches!(
        read_device(stream.as_bytes(), &wires, &VEGA),
        Err(Error::Build(BuildError::MissingTile { row: 0, col: 1 }))
    );

    // A hole at the start of the grid is reported the same way.
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 2)
\t(tile 0 1 INT_R0C1 INT 0
\t)
)
";
    let wires = scan_wire_list([stream.as_bytes()], &VEGA).unwrap();
    assert_matches!(
        read_device(stream.as_bytes(), &wires, &VEGA),
        Err(Error::Build(BuildError::MissingTile { row: 0, col: 0 }))
    );
}

#[test]
fn unknown_wire_fails_loudly() {
    let stream = "\
(fabric_report 1.0 xfab10 vega)
(tiles 1 1)
\t(tile 0 0 INT_R0C0 INT 0
\t\t(pip INT_A0 -> INT_B0)
\t)
)
";
    // A wire list from another part set that never saw these names.
    let empty = scan_wire_list(std::iter::empty::<&[u8]>(), &VEGA).unwrap();
    assert_matches!(
        read_device(stream.as_bytes(), &empty, &VEGA),
        Err(Error::Build(BuildError::UnknownWire { .. }))
    );
}
