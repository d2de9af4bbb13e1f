use clap::Parser;
use prjfabric_adbuild::{read_device, scan::scan_wire_list};
use prjfabric_device::family::family_rules;
use prjfabric_device::WireList;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "fdbuild", about = "Build a device file from a fabric report.")]
struct Args {
    /// Fabric report stream.
    file: PathBuf,
    /// Wire list file; created by scanning the input when it does not exist
    /// yet.
    #[arg(long)]
    wires: PathBuf,
    /// Output device file.
    #[arg(short, long)]
    out: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let open = || -> Result<BufReader<File>, io::Error> {
        Ok(BufReader::new(File::open(&args.file)?))
    };

    let header = prjfabric_adbuild::Parser::new(open()?)?;
    let family = header.family().to_string();
    let rules = family_rules(&family).ok_or_else(|| format!("unknown family {family}"))?;
    drop(header);

    let wires = if args.wires.is_file() {
        let list = WireList::from_file(&args.wires)?;
        if list.family != family {
            return Err(format!(
                "wire list is for family {}, stream is for {family}",
                list.family
            )
            .into());
        }
        list
    } else {
        let list = scan_wire_list([open()?], rules)?;
        list.to_file(&args.wires)?;
        println!(
            "scanned {} wires into {}",
            list.len(),
            args.wires.display()
        );
        list
    };

    let dev = read_device(open()?, &wires, rules)?;
    println!(
        "built {}: {} tiles, {} wire maps, {} conn lists, {} conns, {} route-throughs",
        dev.part,
        dev.tiles.len(),
        dev.wire_maps.len(),
        dev.conn_lists.len(),
        dev.conns.len(),
        dev.route_throughs.len(),
    );
    dev.to_file(&args.out)?;
    Ok(())
}
