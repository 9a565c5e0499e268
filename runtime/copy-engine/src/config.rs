//! Copy engine attributes
//!
//! One `CeConfig` entry describes how the host programs one engine: ring
//! depths and the largest transfer a source slot carries.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::RingKind;

bitflags! {
    /// Copy engine attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CeAttr: u32 {
        /// Descriptors and data are not snooped by the host cache
        const NO_SNOOP            = 1 << 0;
        /// Byte-swap transfer data
        const BYTE_SWAP_DATA      = 1 << 1;
        /// Swizzle descriptors for big-endian hosts
        const SWIZZLE_DESCRIPTORS = 1 << 2;
        /// No completion interrupts; completions are polled
        const DISABLE_INTR        = 1 << 3;
    }
}

/// Host-side configuration of one copy engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CeConfig {
    /// Attribute flags
    #[serde(default)]
    pub flags: CeAttr,

    /// Source ring depth (0 = no source ring)
    #[serde(default)]
    pub src_nentries: usize,

    /// Maximum bytes per source transfer, also the pipe buffer size
    #[serde(default)]
    pub src_sz_max: usize,

    /// Destination ring depth (0 = no destination ring)
    #[serde(default)]
    pub dest_nentries: usize,
}

impl CeConfig {
    /// Entry for an engine the host does not use
    pub const UNUSED: CeConfig = CeConfig {
        flags: CeAttr::empty(),
        src_nentries: 0,
        src_sz_max: 0,
        dest_nentries: 0,
    };

    /// Create an entry
    pub const fn new(
        flags: CeAttr,
        src_nentries: usize,
        src_sz_max: usize,
        dest_nentries: usize,
    ) -> Self {
        Self {
            flags,
            src_nentries,
            src_sz_max,
            dest_nentries,
        }
    }

    /// Get the configured depth of the ring of `kind`
    pub fn nentries(&self, kind: RingKind) -> usize {
        match kind {
            RingKind::Source => self.src_nentries,
            RingKind::Destination => self.dest_nentries,
        }
    }

    /// Check if the engine has neither ring
    pub fn is_unused(&self) -> bool {
        self.src_nentries == 0 && self.dest_nentries == 0
    }
}
