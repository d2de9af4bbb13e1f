use clap::Parser;
use itertools::Itertools;
use prjfabric_device::{Device, PinDir, WireId, WireList};
use std::error::Error;
use std::path::PathBuf;
use unnamed_entity::EntityId;

#[derive(Debug, Parser)]
#[command(name = "fdprint", about = "Dump device file.")]
struct Args {
    file: PathBuf,
    /// Wire list file; wire ids print as names instead of numbers.
    #[arg(long)]
    wires: Option<PathBuf>,
    #[arg(short, long)]
    conns: bool,
    #[arg(short, long)]
    sites: bool,
    /// Restrict tile output to these tile kinds.
    #[arg(short, long)]
    kinds: Vec<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let dev = Device::from_file(&args.file)?;
    let wires = match &args.wires {
        Some(path) => Some(WireList::from_file(path)?),
        None => None,
    };
    let wire_name = |w: WireId| -> String {
        match &wires {
            Some(list) if w.to_idx() < list.len() => list.name_of(w).to_string(),
            _ => format!("#{}", w.to_idx()),
        }
    };
    println!(
        "PART {} {} {}×{}",
        dev.part, dev.family, dev.rows, dev.cols
    );
    println!(
        "STAT tiles {} wire_maps {} conn_lists {} conns {} sink_maps {} pin_maps {} route_throughs {}",
        dev.tiles.len(),
        dev.wire_maps.len(),
        dev.conn_lists.len(),
        dev.conns.len(),
        dev.sink_maps.len(),
        dev.pin_maps.len(),
        dev.route_throughs.len(),
    );
    for (tid, tile) in &dev.tiles {
        if !args.kinds.is_empty() && !args.kinds.contains(&tile.kind) {
            continue;
        }
        println!("TILE {} {} {} {}", tile.row, tile.col, tile.name, tile.kind);
        if args.sites {
            if let Some(sites) = &tile.sites {
                for site in sites {
                    println!("\tSITE {} {}", site.name, site.kind);
                    for (pin, sp) in &dev.pin_maps[site.pins] {
                        let dir = match sp.dir {
                            PinDir::Input => "IN",
                            PinDir::Output => "OUT",
                            PinDir::Bidir => "BIDIR",
                        };
                        println!(
                            "\t\tPIN {pin} {dir} {}",
                            sp.wire.map_or("[none]".to_string(), &wire_name),
                        );
                    }
                }
            }
            for &w in dev.sources_of(tid) {
                println!("\tSOURCE {}", wire_name(w));
            }
            for (&w, pin) in dev.sinks_of(tid) {
                println!(
                    "\tSINK {} -> {} ({:+},{:+})",
                    wire_name(w),
                    wire_name(pin.wire),
                    pin.drow,
                    pin.dcol,
                );
            }
        }
        if args.conns {
            for (w, conns) in dev
                .wire_entries_of(tid)
                .sorted_by_key(|&(w, _)| wire_name(w))
            {
                println!("\tWIRE {}:", wire_name(w));
                for &c in conns {
                    let conn = dev.conn(c);
                    let mut flags = String::new();
                    flags.push(if conn.is_pip { 'P' } else { '-' });
                    flags.push(if dev.is_route_through(c) { 'R' } else { '-' });
                    println!(
                        "\t\t{} ({:+},{:+}) {flags} {}",
                        wire_name(conn.target),
                        conn.drow,
                        conn.dcol,
                        match dev.conn_target(tid, conn) {
                            Some(t) => dev.tile(t).name.as_str(),
                            None => "[off-grid]",
                        },
                    );
                }
            }
        }
    }
    for (&c, rt) in &dev.route_throughs {
        let conn = dev.conn(c);
        println!(
            "RTHROUGH {} {} -> {} (conn {} {})",
            rt.site_kind,
            wire_name(rt.wire_in),
            wire_name(rt.wire_out),
            wire_name(conn.target),
            if conn.is_pip { "pip" } else { "wire" },
        );
    }
    Ok(())
}
