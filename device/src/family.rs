//! Per-family rule tables: lexical wire classification, site-type
//! compatibility, and the wire class exempt from backwards-edge removal.
//!
//! These are data, not logic; a new family means a new table, not new code.

use crate::wires::{WireDir, WireKind};

#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum RuleMatch {
    Prefix,
    Suffix,
    Contains,
}

#[derive(Debug, Copy, Clone)]
pub struct WireRule {
    pub matches: RuleMatch,
    pub pattern: &'static str,
    pub kind: WireKind,
    pub dir: WireDir,
}

#[derive(Debug, Copy, Clone)]
pub struct FamilyRules {
    pub family: &'static str,
    pub wire_rules: &'static [WireRule],
    /// `(site kind, occupant kinds it may additionally host)`.
    pub compat: &'static [(&'static str, &'static [&'static str])],
    /// Edges leaving wires of this class are kept even without a reciprocal
    /// edge. Empirical and unverified across families; keep per-family.
    pub bidi_exempt: WireKind,
}

impl FamilyRules {
    /// First matching rule wins; site-pin wires are classified from their
    /// declared direction instead, during the wire scan.
    pub fn classify(&self, name: &str) -> (WireKind, WireDir) {
        for rule in self.wire_rules {
            let hit = match rule.matches {
                RuleMatch::Prefix => name.starts_with(rule.pattern),
                RuleMatch::Suffix => name.ends_with(rule.pattern),
                RuleMatch::Contains => name.contains(rule.pattern),
            };
            if hit {
                return (rule.kind, rule.dir);
            }
        }
        (WireKind::Unknown, WireDir::Omni)
    }

    pub fn is_compatible(&self, site_kind: &str, occupant_kind: &str) -> bool {
        if site_kind == occupant_kind {
            return true;
        }
        self.compat
            .iter()
            .any(|&(site, occupants)| site == site_kind && occupants.contains(&occupant_kind))
    }
}

pub const VEGA: FamilyRules = FamilyRules {
    family: "vega",
    wire_rules: &[
        WireRule {
            matches: RuleMatch::Prefix,
            pattern: "LH",
            kind: WireKind::Long,
            dir: WireDir::Horiz,
        },
        WireRule {
            matches: RuleMatch::Prefix,
            pattern: "LV",
            kind: WireKind::Long,
            dir: WireDir::Vert,
        },
        WireRule {
            matches: RuleMatch::Prefix,
            pattern: "GCLK",
            kind: WireKind::Clock,
            dir: WireDir::Omni,
        },
        WireRule {
            matches: RuleMatch::Contains,
            pattern: "CLK",
            kind: WireKind::Clock,
            dir: WireDir::Omni,
        },
        WireRule {
            matches: RuleMatch::Prefix,
            pattern: "INT_",
            kind: WireKind::Local,
            dir: WireDir::Omni,
        },
        WireRule {
            matches: RuleMatch::Suffix,
            pattern: "_H",
            kind: WireKind::Local,
            dir: WireDir::Horiz,
        },
        WireRule {
            matches: RuleMatch::Suffix,
            pattern: "_V",
            kind: WireKind::Local,
            dir: WireDir::Vert,
        },
    ],
    compat: &[
        ("SLICEM", &["SLICEL", "SLICE"]),
        ("RAMB16", &["RAMB8"]),
        ("IOBM", &["IOB"]),
    ],
    bidi_exempt: WireKind::Long,
};

pub const LYRA: FamilyRules = FamilyRules {
    family: "lyra",
    wire_rules: &[
        WireRule {
            matches: RuleMatch::Prefix,
            pattern: "LONG_H",
            kind: WireKind::Long,
            dir: WireDir::Horiz,
        },
        WireRule {
            matches: RuleMatch::Prefix,
            pattern: "LONG_V",
            kind: WireKind::Long,
            dir: WireDir::Vert,
        },
        WireRule {
            matches: RuleMatch::Contains,
            pattern: "CLK",
            kind: WireKind::Clock,
            dir: WireDir::Omni,
        },
        WireRule {
            matches: RuleMatch::Prefix,
            pattern: "R_",
            kind: WireKind::Local,
            dir: WireDir::Omni,
        },
    ],
    compat: &[("LC4", &["LC2"])],
    bidi_exempt: WireKind::Clock,
};

pub fn family_rules(family: &str) -> Option<&'static FamilyRules> {
    match family {
        "vega" => Some(&VEGA),
        "lyra" => Some(&LYRA),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_first_match_wins() {
        // GCLK also contains CLK; the prefix rule comes first.
        assert_eq!(VEGA.classify("GCLK3"), (WireKind::Clock, WireDir::Omni));
        assert_eq!(VEGA.classify("LH18"), (WireKind::Long, WireDir::Horiz));
        assert_eq!(VEGA.classify("INT_B5"), (WireKind::Local, WireDir::Omni));
        assert_eq!(VEGA.classify("MYSTERY"), (WireKind::Unknown, WireDir::Omni));
    }

    #[test]
    fn compat_exact_and_table() {
        assert!(VEGA.is_compatible("SLICEL", "SLICEL"));
        assert!(VEGA.is_compatible("SLICEM", "SLICEL"));
        assert!(!VEGA.is_compatible("SLICEL", "SLICEM"));
        assert!(!VEGA.is_compatible("IOB", "IOBM"));
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(family_rules("vega").unwrap().family, "vega");
        assert_eq!(family_rules("lyra").unwrap().bidi_exempt, WireKind::Clock);
        assert!(family_rules("polaris").is_none());
    }
}
