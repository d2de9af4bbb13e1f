//! Pull parser for fabric report streams.
//!
//! The format is line-oriented: one parenthesized record per line, nesting
//! expressed by tab depth. A header names the format version, part, family
//! and grid size; after that the stream is one record per tile, pulled one
//! at a time so a full-device report never has to fit in memory.
//!
//! ```text
//! (fabric_report 1.0 xfab50 vega)
//! (tiles 2 2)
//! \t(tile 0 0 INT_R0C0 INT 1
//! \t\t(site SLICE_X0_Y0 SLICEL
//! \t\t\t(pin A_IN input INT_A0)
//! \t\t)
//! \t\t(wire INT_A0
//! \t\t\t(conn 0 1 INT_B0)
//! \t\t)
//! \t\t(pip INT_A0 -> INT_B5)
//! \t\t(pip LH0 -> LH6 (routethru SLICEL I-O))
//! \t)
//! )
//! ```

use std::io::{self, BufRead, Lines};
use std::num;

use prjfabric_device::PinDir;

#[derive(Debug)]
pub enum ParseError {
    Io(io::Error),
    Syntax(String),
}

use ParseError::Syntax;

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "i/o error: {e}"),
            ParseError::Syntax(s) => write!(f, "syntax error: {s}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

impl From<num::ParseIntError> for ParseError {
    fn from(_: num::ParseIntError) -> Self {
        Syntax("failed to parse integer".to_string())
    }
}

#[derive(Debug)]
pub struct TileRecord {
    pub row: u16,
    pub col: u16,
    pub name: String,
    pub kind: String,
    pub sites: Vec<SiteRecord>,
    pub wires: Vec<WireRecord>,
    pub pips: Vec<PipRecord>,
}

#[derive(Debug)]
pub struct SiteRecord {
    pub name: String,
    pub kind: String,
    pub pins: Vec<PinRecord>,
}

#[derive(Debug)]
pub struct PinRecord {
    pub name: String,
    pub dir: PinDir,
    /// `-` in the stream means an unconnected pin.
    pub wire: Option<String>,
}

#[derive(Debug)]
pub struct WireRecord {
    pub name: String,
    pub conns: Vec<ConnRecord>,
}

/// A conn names the absolute grid position of the target tile; the builder
/// turns it into an offset.
#[derive(Debug)]
pub struct ConnRecord {
    pub row: u16,
    pub col: u16,
    pub wire: String,
}

#[derive(Debug)]
pub struct RouteThroughRecord {
    pub site_kind: String,
    pub pin_in: String,
    pub pin_out: String,
}

#[derive(Debug)]
pub struct PipRecord {
    pub wire_from: String,
    pub wire_to: String,
    pub route_through: Option<RouteThroughRecord>,
}

#[derive(Debug)]
pub struct Parser<R: BufRead> {
    version: String,
    part: String,
    family: String,
    rows: u16,
    cols: u16,
    lines: Lines<R>,
    tiles_done: bool,
}

impl<R: BufRead> Parser<R> {
    pub fn new(file: R) -> Result<Self, ParseError> {
        let mut lines = file.lines();
        let l = skip_comments(&mut lines, "fabric_report")?;
        let l: Vec<_> = l
            .strip_prefix("(fabric_report ")
            .and_then(|l| l.strip_suffix(")"))
            .ok_or_else(|| Syntax("expected fabric_report".to_string()))?
            .split(" ")
            .collect();
        let [version, part, family] = l[..] else {
            return Err(Syntax("fabric_report wrong arg count".to_string()));
        };
        let l = skip_comments(&mut lines, "tiles")?;
        let l: Vec<_> = l
            .strip_prefix("(tiles ")
            .and_then(|l| l.strip_suffix(")"))
            .ok_or_else(|| Syntax("expected tiles".to_string()))?
            .split(" ")
            .collect();
        let [rows, cols] = l[..] else {
            return Err(Syntax("tiles wrong arg count".to_string()));
        };
        Ok(Parser {
            version: version.to_string(),
            part: part.to_string(),
            family: family.to_string(),
            rows: rows.parse()?,
            cols: cols.parse()?,
            lines,
            tiles_done: false,
        })
    }

    pub fn next_tile(&mut self) -> Result<Option<TileRecord>, ParseError> {
        if self.tiles_done {
            return Ok(None);
        }
        let l = self
            .lines
            .next()
            .ok_or_else(|| Syntax("eof in tiles".to_string()))??;
        if l == ")" {
            self.tiles_done = true;
            return Ok(None);
        }
        let Some(l) = l.strip_prefix("\t(tile ") else {
            return Err(Syntax(format!("expected tile: {l}")));
        };
        let l: Vec<_> = l.split(" ").collect();
        let [row, col, name, kind, _nsites] = l[..] else {
            return Err(Syntax("tile wrong arg count".to_string()));
        };
        let mut tile = TileRecord {
            row: row.parse()?,
            col: col.parse()?,
            name: name.to_string(),
            kind: kind.to_string(),
            sites: Vec::new(),
            wires: Vec::new(),
            pips: Vec::new(),
        };
        loop {
            let l = self
                .lines
                .next()
                .ok_or_else(|| Syntax("eof in tile".to_string()))??;
            if l == "\t)" {
                break;
            } else if let Some(l) = l.strip_prefix("\t\t(site ") {
                tile.sites.push(self.parse_site(l)?);
            } else if let Some(l) = l.strip_prefix("\t\t(wire ") {
                tile.wires.push(self.parse_wire(l)?);
            } else if let Some(l) = l.strip_prefix("\t\t(pip ") {
                tile.pips.push(parse_pip(l)?);
            } else {
                return Err(Syntax(format!("expected tile item: {l}")));
            }
        }
        Ok(Some(tile))
    }

    fn parse_site(&mut self, l: &str) -> Result<SiteRecord, ParseError> {
        let (l, has_body) = match l.strip_suffix(")") {
            Some(l) => (l, false),
            None => (l, true),
        };
        let l: Vec<_> = l.split(" ").collect();
        let [name, kind] = l[..] else {
            return Err(Syntax("site wrong arg count".to_string()));
        };
        let mut site = SiteRecord {
            name: name.to_string(),
            kind: kind.to_string(),
            pins: Vec::new(),
        };
        if has_body {
            loop {
                let l = self
                    .lines
                    .next()
                    .ok_or_else(|| Syntax("eof in site".to_string()))??;
                if l == "\t\t)" {
                    break;
                }
                let l = l
                    .strip_prefix("\t\t\t(pin ")
                    .and_then(|l| l.strip_suffix(")"))
                    .ok_or_else(|| Syntax(format!("expected pin: {l}")))?;
                let l: Vec<_> = l.split(" ").collect();
                let [name, dir, wire] = l[..] else {
                    return Err(Syntax("pin wrong arg count".to_string()));
                };
                site.pins.push(PinRecord {
                    name: name.to_string(),
                    dir: match dir {
                        "input" => PinDir::Input,
                        "output" => PinDir::Output,
                        "bidir" => PinDir::Bidir,
                        _ => return Err(Syntax(format!("unknown pin direction {dir}"))),
                    },
                    wire: match wire {
                        "-" => None,
                        w => Some(w.to_string()),
                    },
                });
            }
        }
        Ok(site)
    }

    fn parse_wire(&mut self, l: &str) -> Result<WireRecord, ParseError> {
        let (l, has_body) = match l.strip_suffix(")") {
            Some(l) => (l, false),
            None => (l, true),
        };
        if l.contains(' ') {
            return Err(Syntax("wire wrong arg count".to_string()));
        }
        let mut wire = WireRecord {
            name: l.to_string(),
            conns: Vec::new(),
        };
        if has_body {
            loop {
                let l = self
                    .lines
                    .next()
                    .ok_or_else(|| Syntax("eof in wire".to_string()))??;
                if l == "\t\t)" {
                    break;
                }
                let l = l
                    .strip_prefix("\t\t\t(conn ")
                    .and_then(|l| l.strip_suffix(")"))
                    .ok_or_else(|| Syntax(format!("expected conn: {l}")))?;
                let l: Vec<_> = l.split(" ").collect();
                let [row, col, target] = l[..] else {
                    return Err(Syntax("conn wrong arg count".to_string()));
                };
                wire.conns.push(ConnRecord {
                    row: row.parse()?,
                    col: col.parse()?,
                    wire: target.to_string(),
                });
            }
        }
        Ok(wire)
    }

    pub fn version(&self) -> &str {
        &self.version
    }
    pub fn part(&self) -> &str {
        &self.part
    }
    pub fn family(&self) -> &str {
        &self.family
    }
    pub fn rows(&self) -> u16 {
        self.rows
    }
    pub fn cols(&self) -> u16 {
        self.cols
    }
}

fn parse_pip(l: &str) -> Result<PipRecord, ParseError> {
    let l = l
        .strip_suffix(")")
        .ok_or_else(|| Syntax("missing ) on pip".to_string()))?;
    let (l, rt) = match l.strip_suffix(")") {
        Some(l) => {
            let Some((l, rt)) = l.split_once(" (routethru ") else {
                return Err(Syntax(format!("malformed routethru pip: {l}")));
            };
            let Some((site_kind, pins)) = rt.split_once(" ") else {
                return Err(Syntax(format!("routethru wrong arg count: {rt}")));
            };
            let Some((pin_in, pin_out)) = pins.split_once("-") else {
                return Err(Syntax(format!("malformed routethru pins: {pins}")));
            };
            (
                l,
                Some(RouteThroughRecord {
                    site_kind: site_kind.to_string(),
                    pin_in: pin_in.to_string(),
                    pin_out: pin_out.to_string(),
                }),
            )
        }
        None => (l, None),
    };
    let l: Vec<_> = l.split(" ").collect();
    let [from, "->", to] = l[..] else {
        return Err(Syntax(format!("malformed pip: {l:?}")));
    };
    Ok(PipRecord {
        wire_from: from.to_string(),
        wire_to: to.to_string(),
        route_through: rt,
    })
}

fn skip_comments<R: BufRead>(
    lines: &mut Lines<R>,
    expect: &str,
) -> Result<String, ParseError> {
    loop {
        let l = lines
            .next()
            .ok_or_else(|| Syntax(format!("eof before {expect}")))??;
        if !l.starts_with("#") {
            return Ok(l);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = "\
# generated by fabtool
(fabric_report 1.0 xfab50 vega)
(tiles 1 2)
\t(tile 0 0 INT_R0C0 INT 1
\t\t(site SLICE_X0_Y0 SLICEL
\t\t\t(pin A_IN input INT_A0)
\t\t\t(pin OUT output INT_O0)
\t\t\t(pin NC bidir -)
\t\t)
\t\t(wire INT_A0
\t\t\t(conn 0 1 INT_B0)
\t\t)
\t\t(wire INT_O0)
\t\t(pip INT_A0 -> INT_B5)
\t\t(pip LH0 -> LH6 (routethru SLICEL I-O))
\t)
\t(tile 0 1 EMPTY_R0C1 EMPTY 0
\t)
)
";

    #[test]
    fn parses_header_and_tiles() {
        let mut p = Parser::new(SAMPLE.as_bytes()).unwrap();
        assert_eq!(p.part(), "xfab50");
        assert_eq!(p.family(), "vega");
        assert_eq!((p.rows(), p.cols()), (1, 2));

        let t = p.next_tile().unwrap().unwrap();
        assert_eq!((t.row, t.col), (0, 0));
        assert_eq!(t.name, "INT_R0C0");
        assert_eq!(t.kind, "INT");
        assert_eq!(t.sites.len(), 1);
        assert_eq!(t.sites[0].pins.len(), 3);
        assert_eq!(t.sites[0].pins[0].dir, PinDir::Input);
        assert_eq!(t.sites[0].pins[2].wire, None);
        assert_eq!(t.wires.len(), 2);
        assert_eq!(t.wires[0].conns.len(), 1);
        assert_eq!(t.wires[0].conns[0].wire, "INT_B0");
        assert_eq!(t.wires[1].conns.len(), 0);
        assert_eq!(t.pips.len(), 2);
        assert!(t.pips[0].route_through.is_none());
        let rt = t.pips[1].route_through.as_ref().unwrap();
        assert_eq!(rt.site_kind, "SLICEL");
        assert_eq!((rt.pin_in.as_str(), rt.pin_out.as_str()), ("I", "O"));

        let t = p.next_tile().unwrap().unwrap();
        assert_eq!(t.kind, "EMPTY");
        assert!(t.sites.is_empty() && t.wires.is_empty() && t.pips.is_empty());

        assert!(p.next_tile().unwrap().is_none());
        assert!(p.next_tile().unwrap().is_none());
    }

    #[test]
    fn rejects_bad_header() {
        assert_matches!(
            Parser::new("(something_else 1)".as_bytes()),
            Err(ParseError::Syntax(_))
        );
        assert_matches!(
            Parser::new("(fabric_report 1.0 part)".as_bytes()),
            Err(ParseError::Syntax(_))
        );
    }

    #[test]
    fn rejects_bad_tile_item() {
        let s = "(fabric_report 1.0 p f)\n(tiles 1 1)\n\t(tile 0 0 T K 0\n\t\t(bogus)\n\t)\n)\n";
        let mut p = Parser::new(s.as_bytes()).unwrap();
        assert_matches!(p.next_tile(), Err(ParseError::Syntax(_)));
    }
}
