//! Tools for decoding data in DTrace Object Format into a fully resolved
//! in-memory representation.
// Copyright 2021 Oxide Computer Company

//! A DOF object is a compact, section-based container describing
//! instrumentation providers, probes, and the DIF programs attached to them.
//! Decoding happens in two phases: [`des`] frames the byte buffer into
//! typed, bounds-checked section records, and a resolver then replaces every
//! cross-section reference (string-table offsets, section indices,
//! relocation targets) with the referenced data itself. [`Dof::from_bytes`]
//! runs both phases and returns the resolved object; any malformed or
//! dangling reference aborts the whole decode.
//!
//! Extracting the DOF byte range from a containing executable is a loader's
//! job; this crate only ever sees the finished buffer. Use [`is_dof`] to
//! sniff candidate ranges cheaply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod des;
mod endian;
mod resolve;
pub mod types;

pub use types::{
    ActionKind, Attributes, Class, DifIdent, DifTypeFlag, DifTypeKind, Encoding, Ident, Model,
    RelocationType, SectionFlag, SectionType, Stability, VarFlag, VarKind, VarScope, Version,
};

/// Errors produced while decoding a DOF buffer.
///
/// Every error aborts the decode; no partially resolved object is ever
/// returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    // Identification-block format errors.
    #[error("DOF identification requires 16 bytes, buffer has {0}")]
    IdentTooShort(usize),
    #[error("buffer does not begin with the DOF magic bytes")]
    InvalidMagic,
    #[error("invalid byte-order encoding {0:#04x}")]
    InvalidEncoding(u8),
    #[error("DOF identification padding bytes must be zero")]
    NonZeroPadding,

    // Bounds violations against the governing buffer.
    #[error("DOF header requires 28 bytes past the identification, found {0}")]
    HeaderTooShort(usize),
    #[error("section header {index} extends past the end of the buffer")]
    SectionHeaderOutOfBounds { index: usize },
    #[error(
        "section {index} data ({offset} + {size} bytes) extends past \
         the end of the buffer ({len} bytes)"
    )]
    SectionDataOutOfBounds {
        index: usize,
        offset: u64,
        size: u64,
        len: u64,
    },

    // Fixed-layout size violations.
    #[error("section header {index} must be at least 32 bytes, found {size}")]
    SectionHeaderTooSmall { index: usize, size: usize },
    #[error("section data length {len} is not a multiple of the entry size {entsize}")]
    UnevenSectionData { len: usize, entsize: usize },
    #[error("a {kind} record requires {expected} bytes, found {actual}")]
    RecordTooShort {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("relocation offset {offset} is not a multiple of the target entry size {entsize}")]
    MisalignedRelocation { offset: u64, entsize: u32 },

    // Referential-integrity violations found during resolution.
    #[error("section index {index} is out of range ({count} sections)")]
    NoSuchSection { index: i64, count: usize },
    #[error("section {index} has type {actual:?} where {expected:?} is required")]
    UnexpectedSectionType {
        index: usize,
        expected: SectionType,
        actual: SectionType,
    },
    #[error("section {index} is not framed as the required table")]
    MalformedTable { index: usize },
    #[error("string offset {offset} is past the end of the string table ({len} bytes)")]
    StringOutOfBounds { offset: usize, len: usize },
    #[error("table slice at {start} of {count} entries is out of range ({len} entries)")]
    TableSliceOutOfBounds {
        start: usize,
        count: usize,
        len: usize,
    },
}

/// A fully decoded and resolved DOF object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dof {
    pub ident: Ident,
    pub flags: u32,
    pub hdrsize: u32,
    pub secsize: u32,
    pub secnum: u32,
    pub secoff: u32,
    pub loadsz: u32,
    pub filesz: u32,
    pub sections: Vec<Section>,
}

impl Dof {
    /// Decode a DOF object from a byte buffer and resolve every
    /// cross-section reference.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        let (ident, header, sections) = des::deserialize_sections(buf)?;
        resolve::resolve(ident, &header, &sections)
    }
}

/// A section after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub header: des::SectionHeader,
    pub data: SectionData,
    /// Relocations attached to this section's records, keyed by record
    /// index. Filled in from any relocation headers targeting this section.
    pub relocations: BTreeMap<usize, Vec<Relocation>>,
}

/// The payload of a resolved section.
///
/// Section types the resolver dispatches on (`probedesc`, `provider`,
/// `urelhdr`/`krelhdr`, `ecbdesc`) carry resolved records; the rest keep
/// their phase-1 payload from [`des`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionData {
    Bytes(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    Chunks(Vec<Vec<u8>>),
    String(String),
    Probes(Vec<des::Probe>),
    ProbeDescs(Vec<ProbeDesc>),
    Providers(Vec<Provider>),
    Relocations(Vec<des::Relocation>),
    RelocationTables(Vec<RelocationTable>),
    Actions(Vec<des::Action>),
    Variables(Vec<des::Variable>),
    Difo(des::DifoHeader),
    EcbDescs(Vec<EcbDesc>),
}

/// A probe description with its four-part name resolved from the string
/// table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeDesc {
    pub provider: String,
    pub module: String,
    pub function: String,
    pub name: String,
    pub id: u32,
}

/// A single resolved probe from a provider's `probes` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Probe site address, as raw bytes from the record.
    pub address: [u8; 8],
    /// Name of the function containing this probe.
    pub function: String,
    /// Name of this probe.
    pub name: String,
    /// Native argument type names.
    pub native_arg_types: Vec<String>,
    /// Translated argument type names.
    pub translated_arg_types: Vec<String>,
    /// Per-argument mapping from translated to native arguments.
    pub args: Vec<u8>,
    /// Offsets in the containing function at which this probe occurs.
    pub offsets: Vec<u32>,
    /// Offsets in the containing function of this probe's is-enabled sites.
    pub enabled_offsets: Vec<u32>,
}

/// A provider with its name, stability attributes, and probes resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub provider_attributes: Attributes,
    pub module_attributes: Attributes,
    pub function_attributes: Attributes,
    pub name_attributes: Attributes,
    pub args_attributes: Attributes,
    pub probes: Vec<Probe>,
}

/// A relocation entry with its symbol name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub name: String,
    pub kind: RelocationType,
    pub offset: u64,
    pub data: [u8; 8],
}

/// A resolved relocation header: the relocations it governs and the index of
/// the section they apply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationTable {
    pub target: usize,
    pub relocations: Vec<Relocation>,
}

/// A resolved enabling control block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcbDesc {
    pub probes: Vec<ProbeDesc>,
    /// The predicate DIFO, or `None` when the descriptor carries the -1
    /// "no predicate" sentinel.
    pub predicate: Option<des::DifoHeader>,
    pub actions: Vec<des::Action>,
    pub uarg: u64,
}

/// Return true if the given byte slice begins with the DOF magic bytes.
pub fn is_dof(buf: &[u8]) -> bool {
    buf.len() >= des::DOF_MAGIC.len() && buf.starts_with(&des::DOF_MAGIC)
}

#[cfg(test)]
pub(crate) mod test {
    //! A small builder for well-formed DOF buffers, used by the module
    //! tests. Tests corrupt single aspects of its output to provoke each
    //! error path.

    use crate::types::Encoding;

    pub const IDENT_SIZE: usize = 16;
    pub const HEADER_SIZE: usize = 28;
    pub const SECTION_HEADER_SIZE: usize = 32;

    struct SectionEntry {
        section_type: u32,
        entsize: u32,
        data: Vec<u8>,
    }

    pub struct Builder {
        encoding: Encoding,
        sections: Vec<SectionEntry>,
    }

    impl Builder {
        pub fn new(encoding: Encoding) -> Self {
            Builder {
                encoding,
                sections: Vec::new(),
            }
        }

        pub fn section(mut self, section_type: u32, entsize: u32, data: &[u8]) -> Self {
            self.sections.push(SectionEntry {
                section_type,
                entsize,
                data: data.to_vec(),
            });
            self
        }

        pub fn put_u16(&self, out: &mut Vec<u8>, value: u16) {
            match self.encoding {
                Encoding::Lsb => out.extend(value.to_le_bytes()),
                Encoding::Msb => out.extend(value.to_be_bytes()),
            }
        }

        pub fn put_u32(&self, out: &mut Vec<u8>, value: u32) {
            match self.encoding {
                Encoding::Lsb => out.extend(value.to_le_bytes()),
                Encoding::Msb => out.extend(value.to_be_bytes()),
            }
        }

        pub fn put_u64(&self, out: &mut Vec<u8>, value: u64) {
            let (lo, hi) = (value as u32, (value >> 32) as u32);
            match self.encoding {
                Encoding::Lsb => {
                    self.put_u32(out, lo);
                    self.put_u32(out, hi);
                }
                Encoding::Msb => {
                    self.put_u32(out, hi);
                    self.put_u32(out, lo);
                }
            }
        }

        pub fn build(self) -> Vec<u8> {
            let encoding_byte = match self.encoding {
                Encoding::Lsb => 1,
                Encoding::Msb => 2,
            };
            let hdrsize = (IDENT_SIZE + HEADER_SIZE) as u32;
            let table_size = self.sections.len() * SECTION_HEADER_SIZE;
            let mut out = Vec::new();

            // Identification: magic, lp64, encoding, version 1, DIF (2, 8, 8).
            out.extend([0x7f, b'D', b'O', b'F', 2, encoding_byte, 1, 2, 8, 8]);
            out.extend([0; 6]);

            // Header.
            let mut data_offset = u64::from(hdrsize) + table_size as u64;
            let total =
                data_offset + self.sections.iter().map(|s| s.data.len() as u64).sum::<u64>();
            self.put_u32(&mut out, 0); // flags
            self.put_u32(&mut out, hdrsize);
            self.put_u32(&mut out, SECTION_HEADER_SIZE as u32);
            self.put_u32(&mut out, self.sections.len() as u32);
            self.put_u32(&mut out, hdrsize); // secoff
            self.put_u32(&mut out, total as u32); // loadsz
            self.put_u32(&mut out, total as u32); // filesz

            // Section header table.
            for entry in &self.sections {
                self.put_u32(&mut out, entry.section_type);
                self.put_u32(&mut out, entry.entsize.max(1)); // align
                self.put_u32(&mut out, 1); // flags: load
                self.put_u32(&mut out, entry.entsize);
                self.put_u64(&mut out, data_offset);
                self.put_u64(&mut out, entry.data.len() as u64);
                data_offset += entry.data.len() as u64;
            }

            // Section data.
            for entry in &self.sections {
                out.extend(&entry.data);
            }
            assert_eq!(out.len() as u64, total);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{is_dof, Dof, Encoding, SectionData};
    use crate::test::Builder;

    fn sample() -> Vec<u8> {
        Builder::new(Encoding::Lsb)
            .section(8, 0, b"foo\0bar\0")
            .build()
    }

    #[test]
    fn test_is_dof() {
        assert!(is_dof(&sample()));
        assert!(is_dof(&[0x7f, b'D', b'O', b'F']));
        assert!(!is_dof(&[0x7f, b'D', b'O']));
        assert!(!is_dof(b"\x7fELF let me in"));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let buf = sample();
        let first = Dof::from_bytes(&buf).unwrap();
        let second = Dof::from_bytes(&buf).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_header_fields_surface() {
        let buf = sample();
        let dof = Dof::from_bytes(&buf).unwrap();
        assert_eq!(dof.hdrsize, 44);
        assert_eq!(dof.secsize, 32);
        assert_eq!(dof.secnum, 1);
        assert_eq!(dof.secoff, 44);
        assert_eq!(dof.filesz, buf.len() as u32);
        assert_eq!(dof.sections.len(), 1);
        assert_eq!(
            dof.sections[0].data,
            SectionData::Bytes(b"foo\0bar\0".to_vec())
        );
    }

    #[test]
    fn test_json_round_trip() {
        let dof = Dof::from_bytes(&sample()).unwrap();
        let json = serde_json::to_string(&dof).unwrap();
        let back: Dof = serde_json::from_str(&json).unwrap();
        assert_eq!(dof, back);
    }
}
