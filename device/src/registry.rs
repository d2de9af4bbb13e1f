//! On-disk device store with an in-process cache.
//!
//! A `Registry` owns a directory of encoded artifacts: one `<part>.fdv` per
//! device and one `<family>.fwl` per wire list. Loads decode into a scratch
//! value first and install into the cache only on success, so a corrupt file
//! never poisons the cache. Callers that want cross-thread sharing wrap the
//! registry in their own lock; the handles it returns are `Arc`s and stay
//! valid across invalidation.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::CodecError;
use crate::family::{FamilyRules, family_rules};
use crate::wires::WireList;
use crate::Device;

#[derive(Debug)]
pub enum RegistryError {
    MissingRoot(PathBuf),
    MissingDevice(String),
    MissingWireList(String),
    UnknownFamily(String),
    Codec(CodecError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::MissingRoot(p) => {
                write!(f, "registry root {} does not exist", p.display())
            }
            RegistryError::MissingDevice(part) => write!(f, "no device file for part {part}"),
            RegistryError::MissingWireList(family) => {
                write!(f, "no wire list file for family {family}")
            }
            RegistryError::UnknownFamily(family) => write!(f, "unknown family {family}"),
            RegistryError::Codec(e) => write!(f, "{e}"),
        }
    }
}

impl Error for RegistryError {}

impl From<CodecError> for RegistryError {
    fn from(e: CodecError) -> Self {
        RegistryError::Codec(e)
    }
}

#[derive(Debug)]
pub struct Registry {
    root: PathBuf,
    devices: HashMap<String, Arc<Device>>,
    wire_lists: HashMap<String, Arc<WireList>>,
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RegistryError::MissingRoot(root));
        }
        Ok(Registry {
            root,
            devices: HashMap::new(),
            wire_lists: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn device_path(&self, part: &str) -> PathBuf {
        self.root.join(format!("{part}.fdv"))
    }

    pub fn wire_list_path(&self, family: &str) -> PathBuf {
        self.root.join(format!("{family}.fwl"))
    }

    /// Loads (or returns the cached) device for `part`.
    pub fn device(&mut self, part: &str) -> Result<Arc<Device>, RegistryError> {
        if let Some(dev) = self.devices.get(part) {
            return Ok(dev.clone());
        }
        let path = self.device_path(part);
        if !path.is_file() {
            return Err(RegistryError::MissingDevice(part.to_string()));
        }
        let f = std::fs::File::open(path).map_err(CodecError::Io)?;
        let dev = Arc::new(Device::from_read(f)?);
        self.devices.insert(part.to_string(), dev.clone());
        Ok(dev)
    }

    /// Loads (or returns the cached) wire list for `family`. Wire lists are
    /// never evicted; their ids must stay stable for the process lifetime.
    pub fn wire_list(&mut self, family: &str) -> Result<Arc<WireList>, RegistryError> {
        if let Some(list) = self.wire_lists.get(family) {
            return Ok(list.clone());
        }
        let path = self.wire_list_path(family);
        if !path.is_file() {
            return Err(RegistryError::MissingWireList(family.to_string()));
        }
        let f = std::fs::File::open(path).map_err(CodecError::Io)?;
        let list = Arc::new(WireList::from_read(f)?);
        self.wire_lists.insert(family.to_string(), list.clone());
        Ok(list)
    }

    pub fn rules(&self, family: &str) -> Result<&'static FamilyRules, RegistryError> {
        family_rules(family).ok_or_else(|| RegistryError::UnknownFamily(family.to_string()))
    }

    /// Encodes `dev` into the registry and caches it under its part name.
    pub fn insert_device(&mut self, dev: Device) -> Result<Arc<Device>, RegistryError> {
        let path = self.device_path(&dev.part);
        crate::codec::write_atomic(&path, |w| dev.to_write(w))?;
        let part = dev.part.clone();
        let dev = Arc::new(dev);
        self.devices.insert(part, dev.clone());
        Ok(dev)
    }

    /// Drops the cached device for `part`; outstanding `Arc`s stay alive.
    pub fn invalidate(&mut self, part: &str) {
        self.devices.remove(part);
    }

    pub fn invalidate_all(&mut self) {
        self.devices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::sample_device;
    use crate::wires::{WireDir, WireKind};
    use assert_matches::assert_matches;

    #[test]
    fn missing_root_is_an_error() {
        assert_matches!(
            Registry::new("/no/such/registry/root"),
            Err(RegistryError::MissingRoot(_))
        );
    }

    #[test]
    fn device_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = Registry::new(dir.path()).unwrap();
        assert_matches!(reg.device("xfab50"), Err(RegistryError::MissingDevice(_)));

        let dev = sample_device();
        reg.insert_device(dev.clone()).unwrap();
        let a = reg.device("xfab50").unwrap();
        let b = reg.device("xfab50").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, dev);

        // After invalidation the next load decodes from disk again; the old
        // handle is unaffected.
        reg.invalidate("xfab50");
        let c = reg.device("xfab50").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*c, *a);
    }

    #[test]
    fn corrupt_file_does_not_poison_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = Registry::new(dir.path()).unwrap();
        std::fs::write(reg.device_path("bad"), b"not a device file").unwrap();
        assert!(reg.device("bad").is_err());

        // A later good write under the same part name loads cleanly.
        let mut dev = sample_device();
        dev.part = "bad".to_string();
        reg.insert_device(dev).unwrap();
        assert_eq!(reg.device("bad").unwrap().family, "vega");
    }

    #[test]
    fn wire_list_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = Registry::new(dir.path()).unwrap();
        let mut list = WireList::new("vega");
        list.push("GCLK0".to_string(), WireKind::Clock, WireDir::Omni, false);
        list.to_file(reg.wire_list_path("vega")).unwrap();

        let a = reg.wire_list("vega").unwrap();
        let b = reg.wire_list("vega").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 1);
        assert_matches!(reg.wire_list("lyra"), Err(RegistryError::MissingWireList(_)));
    }

    #[test]
    fn rules_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::new(dir.path()).unwrap();
        assert_eq!(reg.rules("vega").unwrap().family, "vega");
        assert_matches!(reg.rules("sirius"), Err(RegistryError::UnknownFamily(_)));
    }
}
