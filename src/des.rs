//! Phase-1 deserialization: framing, bounds validation, and typed record
//! decoding for each DOF section.
// Copyright 2021 Oxide Computer Company

use serde::{Deserialize, Serialize};

use crate::endian::{map_flags, read_i16, read_i32, read_u16, read_u32, read_u64};
use crate::types::{
    ActionKind, Attributes, DifIdent, DifTypeFlag, DifTypeKind, Encoding, Ident, Model,
    RelocationType, SectionFlag, SectionType, VarFlag, VarKind, VarScope, Version,
    DIF_TYPE_FLAGS, SECTION_FLAGS, VAR_FLAGS,
};
use crate::Error;

/// Magic bytes beginning every DOF object.
pub const DOF_MAGIC: [u8; 4] = [0x7f, b'D', b'O', b'F'];

const IDENT_SIZE: usize = 16;
const HEADER_SIZE: usize = 28;
const SECTION_HEADER_SIZE: usize = 32;

const PROBE_SIZE: usize = 48;
const PROBEDESC_SIZE: usize = 24;
const PROVIDER_SIZE: usize = 44;
const RELOCATION_SIZE: usize = 24;
const RELOCATION_HEADER_SIZE: usize = 12;
const ACTION_SIZE: usize = 32;
const VARIABLE_SIZE: usize = 20;
const DIF_TYPE_SIZE: usize = 8;
const ECBDESC_SIZE: usize = 24;

/// The fixed DOF file header, decoded from the 28 bytes following the
/// identification block. All offsets and sizes are relative to the start of
/// the original buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub flags: u32,
    pub hdrsize: u32,
    pub secsize: u32,
    pub secnum: u32,
    pub secoff: u32,
    pub loadsz: u32,
    pub filesz: u32,
}

/// A decoded section header (one fixed-stride table entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeader {
    pub section_type: SectionType,
    pub align: u32,
    pub flags: Vec<SectionFlag>,
    pub entsize: u32,
    pub offset: u64,
    pub size: u64,
}

/// A framed section: its header plus the typed decoding of its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub header: SectionHeader,
    pub data: SectionData,
}

/// The payload of a section after typed decoding but before resolution.
///
/// Section types with a record decoder get a vector of records; `comments`
/// and `utsname` decode as a single C string; everything else is framed by
/// the declared entry size into scalars, opaque chunks, or left as bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionData {
    Bytes(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    Chunks(Vec<Vec<u8>>),
    String(String),
    Probes(Vec<Probe>),
    ProbeDescs(Vec<ProbeDesc>),
    Providers(Vec<Provider>),
    Relocations(Vec<Relocation>),
    RelocationHeaders(Vec<RelocationHeader>),
    Actions(Vec<Action>),
    Variables(Vec<Variable>),
    Difo(DifoHeader),
    EcbDescs(Vec<EcbDesc>),
}

/// A probe record from a `probes` section. String fields are offsets into
/// the owning provider's string table; index fields select ranges out of the
/// provider's offset and argument tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Probe site address, kept as raw bytes; its interpretation depends on
    /// the relocations applied by the consumer.
    pub addr: [u8; 8],
    pub func: u32,
    pub name: u32,
    pub nargv: u32,
    pub xargv: u32,
    pub argidx: u32,
    pub offidx: u32,
    pub nargc: u8,
    pub xargc: u8,
    pub noffs: u16,
    pub enoffidx: u32,
    pub nenoffs: u16,
}

/// A probe description record, naming a probe by its four-part identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeDesc {
    /// Section index of the string table holding the name fields.
    pub strtab: i32,
    pub provider: u32,
    pub module: u32,
    pub function: u32,
    pub name: u32,
    pub id: u32,
}

/// A provider record, tying together the string, probe, argument, and offset
/// sections that make up one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub strtab: i32,
    pub probes: i32,
    pub prargs: i32,
    pub proffs: i32,
    pub name: u32,
    pub provider_attributes: Attributes,
    pub module_attributes: Attributes,
    pub function_attributes: Attributes,
    pub name_attributes: Attributes,
    pub args_attributes: Attributes,
    pub prenoffs: i32,
}

/// A single relocation from a `reltab` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub name: u32,
    pub kind: RelocationType,
    pub offset: u64,
    /// Relocation operand, kept as raw bytes; its meaning depends on `kind`.
    pub data: [u8; 8],
}

/// A relocation header, binding a relocation table to its target section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationHeader {
    pub strtab: i32,
    pub relsec: i32,
    pub tgtsec: i32,
}

/// An action descriptor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub difo: i32,
    pub strtab: i32,
    pub kind: ActionKind,
    pub ntuple: u32,
    pub arg: u64,
    pub uarg: u64,
}

/// A DIF variable-table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: u32,
    pub id: u32,
    pub kind: VarKind,
    pub scope: VarScope,
    pub flags: Vec<VarFlag>,
    pub diftype: DifType,
}

/// A DIF type descriptor, embedded in variable-table entries and DIFO
/// headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifType {
    pub kind: DifTypeKind,
    /// Raw CTF kind byte; only meaningful when `kind` is [`DifTypeKind::Ctf`].
    pub ckind: i8,
    pub flags: Vec<DifTypeFlag>,
    pub size: u32,
}

/// A DIFO header: the return type of the program plus the section indices of
/// its constituent tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifoHeader {
    pub diftype: DifType,
    pub links: Vec<u32>,
}

/// An enabling control block descriptor, binding a probe description to a
/// predicate and a list of actions by section index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcbDesc {
    pub probes: i32,
    /// Section index of the predicate DIFO, or -1 for no predicate.
    pub pred: i32,
    pub actions: i32,
    pub uarg: u64,
}

// Extract a null-terminated string, scanning to the terminator or the end of
// the slice. Invalid UTF-8 is replaced rather than rejected.
pub(crate) fn extract_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&x| x == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

pub(crate) fn decode_ident(buf: &[u8]) -> Result<Ident, Error> {
    if buf.len() < IDENT_SIZE {
        return Err(Error::IdentTooShort(buf.len()));
    }
    if !buf.starts_with(&DOF_MAGIC) {
        return Err(Error::InvalidMagic);
    }
    let model = Model::from(buf[4]);
    let encoding = Encoding::try_from(buf[5])?;
    let version = Version::from(buf[6]);
    let dif = DifIdent {
        version: buf[7],
        ireg: buf[8],
        treg: buf[9],
    };
    if buf[10..IDENT_SIZE].iter().any(|&x| x != 0) {
        return Err(Error::NonZeroPadding);
    }
    Ok(Ident {
        model,
        encoding,
        version,
        dif,
    })
}

// Decode the fixed header from the bytes immediately following the
// identification block.
pub(crate) fn decode_header(encoding: Encoding, buf: &[u8]) -> Result<Header, Error> {
    if buf.len() < HEADER_SIZE {
        return Err(Error::HeaderTooShort(buf.len()));
    }
    Ok(Header {
        flags: read_u32(encoding, buf, 0),
        hdrsize: read_u32(encoding, buf, 4),
        secsize: read_u32(encoding, buf, 8),
        secnum: read_u32(encoding, buf, 12),
        secoff: read_u32(encoding, buf, 16),
        loadsz: read_u32(encoding, buf, 20),
        filesz: read_u32(encoding, buf, 24),
    })
}

fn decode_section_header(
    encoding: Encoding,
    desc: &[u8],
    buf_len: u64,
    index: usize,
) -> Result<SectionHeader, Error> {
    if desc.len() < SECTION_HEADER_SIZE {
        return Err(Error::SectionHeaderTooSmall {
            index,
            size: desc.len(),
        });
    }
    let section_type = SectionType::from(read_u32(encoding, desc, 0));
    let align = read_u32(encoding, desc, 4);
    let flags = map_flags(i64::from(read_u32(encoding, desc, 8)), SECTION_FLAGS);
    let entsize = read_u32(encoding, desc, 12);
    let offset = read_u64(encoding, desc, 16);
    let size = read_u64(encoding, desc, 24);
    match offset.checked_add(size) {
        Some(end) if end <= buf_len => {}
        _ => {
            return Err(Error::SectionDataOutOfBounds {
                index,
                offset,
                size,
                len: buf_len,
            });
        }
    }
    Ok(SectionHeader {
        section_type,
        align,
        flags,
        entsize,
        offset,
        size,
    })
}

// Walk the fixed-stride section header table. Payloads are sliced from the
// original file buffer, not from the table region.
fn decode_sections(encoding: Encoding, header: &Header, buf: &[u8]) -> Result<Vec<Section>, Error> {
    let mut sections = Vec::new();
    for i in 0..header.secnum as usize {
        let start = u64::from(header.hdrsize) + i as u64 * u64::from(header.secsize);
        let end = start
            .checked_add(u64::from(header.secsize))
            .filter(|&end| end <= buf.len() as u64)
            .ok_or(Error::SectionHeaderOutOfBounds { index: i })?;
        let desc = &buf[start as usize..end as usize];
        let section = decode_section_header(encoding, desc, buf.len() as u64, i)?;
        let data = &buf[section.offset as usize..(section.offset + section.size) as usize];
        let data = decode_section_data(encoding, section.section_type, section.entsize, data)?;
        sections.push(Section {
            header: section,
            data,
        });
    }
    Ok(sections)
}

/// Decode the identification block, file header, and every section of the
/// given DOF buffer, without resolving cross-section references.
pub fn deserialize_sections(buf: &[u8]) -> Result<(Ident, Header, Vec<Section>), Error> {
    let ident = decode_ident(buf)?;
    let header = decode_header(ident.encoding, &buf[IDENT_SIZE..])?;
    let sections = decode_sections(ident.encoding, &header, buf)?;
    Ok((ident, header, sections))
}

// Frame a section's raw bytes by its declared entry size: an unframed blob
// for entry sizes of 0 or 1, scalar arrays for 2/4/8, opaque chunks
// otherwise.
fn decode_raw(encoding: Encoding, buf: &[u8], entsize: u32) -> Result<SectionData, Error> {
    let entsize = entsize as usize;
    if entsize <= 1 {
        return Ok(SectionData::Bytes(buf.to_vec()));
    }
    if buf.len() % entsize != 0 {
        return Err(Error::UnevenSectionData {
            len: buf.len(),
            entsize,
        });
    }
    let data = match entsize {
        2 => SectionData::U16(buf.chunks(2).map(|e| read_u16(encoding, e, 0)).collect()),
        4 => SectionData::U32(buf.chunks(4).map(|e| read_u32(encoding, e, 0)).collect()),
        8 => SectionData::U64(buf.chunks(8).map(|e| read_u64(encoding, e, 0)).collect()),
        _ => SectionData::Chunks(buf.chunks(entsize).map(<[u8]>::to_vec).collect()),
    };
    Ok(data)
}

// Split a record-array section into entries and decode each. The stride is
// the declared entry size, or the record's fixed size when the section is
// not framed.
fn decode_entries<T>(
    buf: &[u8],
    entsize: u32,
    min: usize,
    kind: &'static str,
    decode: impl Fn(&[u8]) -> T,
) -> Result<Vec<T>, Error> {
    let stride = if entsize > 1 { entsize as usize } else { min };
    if stride < min {
        return Err(Error::RecordTooShort {
            kind,
            expected: min,
            actual: stride,
        });
    }
    if buf.len() % stride != 0 {
        return Err(Error::UnevenSectionData {
            len: buf.len(),
            entsize: stride,
        });
    }
    Ok(buf.chunks(stride).map(decode).collect())
}

fn decode_section_data(
    encoding: Encoding,
    section_type: SectionType,
    entsize: u32,
    buf: &[u8],
) -> Result<SectionData, Error> {
    match section_type {
        SectionType::Comments | SectionType::UtsName => {
            Ok(SectionData::String(extract_string(buf)))
        }
        SectionType::Probes => {
            decode_entries(buf, entsize, PROBE_SIZE, "probe", |e| {
                decode_probe(encoding, e)
            })
            .map(SectionData::Probes)
        }
        SectionType::ProbeDesc => {
            decode_entries(buf, entsize, PROBEDESC_SIZE, "probedesc", |e| {
                decode_probedesc(encoding, e)
            })
            .map(SectionData::ProbeDescs)
        }
        SectionType::Provider => {
            decode_entries(buf, entsize, PROVIDER_SIZE, "provider", |e| {
                decode_provider(encoding, e)
            })
            .map(SectionData::Providers)
        }
        SectionType::RelTab => {
            decode_entries(buf, entsize, RELOCATION_SIZE, "relocation", |e| {
                decode_relocation(encoding, e)
            })
            .map(SectionData::Relocations)
        }
        SectionType::UrelHdr | SectionType::KrelHdr => {
            decode_entries(buf, entsize, RELOCATION_HEADER_SIZE, "relhdr", |e| {
                decode_relocation_header(encoding, e)
            })
            .map(SectionData::RelocationHeaders)
        }
        SectionType::ActDesc => {
            decode_entries(buf, entsize, ACTION_SIZE, "actdesc", |e| {
                decode_action(encoding, e)
            })
            .map(SectionData::Actions)
        }
        SectionType::VarTab => {
            decode_entries(buf, entsize, VARIABLE_SIZE, "vartab entry", |e| {
                decode_variable(encoding, e)
            })
            .map(SectionData::Variables)
        }
        SectionType::EcbDesc => {
            decode_entries(buf, entsize, ECBDESC_SIZE, "ecbdesc", |e| {
                decode_ecbdesc(encoding, e)
            })
            .map(SectionData::EcbDescs)
        }
        SectionType::DifoHdr => decode_difo_header(encoding, buf).map(SectionData::Difo),
        _ => decode_raw(encoding, buf, entsize),
    }
}

fn decode_probe(encoding: Encoding, buf: &[u8]) -> Probe {
    let mut addr = [0; 8];
    addr.copy_from_slice(&buf[..8]);
    Probe {
        addr,
        func: read_u32(encoding, buf, 8),
        name: read_u32(encoding, buf, 12),
        nargv: read_u32(encoding, buf, 16),
        xargv: read_u32(encoding, buf, 20),
        argidx: read_u32(encoding, buf, 24),
        offidx: read_u32(encoding, buf, 28),
        nargc: buf[32],
        xargc: buf[33],
        noffs: read_u16(encoding, buf, 34),
        enoffidx: read_u32(encoding, buf, 36),
        nenoffs: read_u16(encoding, buf, 40),
    }
}

fn decode_probedesc(encoding: Encoding, buf: &[u8]) -> ProbeDesc {
    ProbeDesc {
        strtab: read_i32(encoding, buf, 0),
        provider: read_u32(encoding, buf, 4),
        module: read_u32(encoding, buf, 8),
        function: read_u32(encoding, buf, 12),
        name: read_u32(encoding, buf, 16),
        id: read_u32(encoding, buf, 20),
    }
}

fn decode_provider(encoding: Encoding, buf: &[u8]) -> Provider {
    Provider {
        strtab: read_i32(encoding, buf, 0),
        probes: read_i32(encoding, buf, 4),
        prargs: read_i32(encoding, buf, 8),
        proffs: read_i32(encoding, buf, 12),
        name: read_u32(encoding, buf, 16),
        provider_attributes: Attributes::from(read_u32(encoding, buf, 20)),
        module_attributes: Attributes::from(read_u32(encoding, buf, 24)),
        function_attributes: Attributes::from(read_u32(encoding, buf, 28)),
        name_attributes: Attributes::from(read_u32(encoding, buf, 32)),
        args_attributes: Attributes::from(read_u32(encoding, buf, 36)),
        prenoffs: read_i32(encoding, buf, 40),
    }
}

fn decode_relocation(encoding: Encoding, buf: &[u8]) -> Relocation {
    let mut data = [0; 8];
    data.copy_from_slice(&buf[16..24]);
    Relocation {
        name: read_u32(encoding, buf, 0),
        kind: RelocationType::from(read_u32(encoding, buf, 4)),
        offset: read_u64(encoding, buf, 8),
        data,
    }
}

fn decode_relocation_header(encoding: Encoding, buf: &[u8]) -> RelocationHeader {
    RelocationHeader {
        strtab: read_i32(encoding, buf, 0),
        relsec: read_i32(encoding, buf, 4),
        tgtsec: read_i32(encoding, buf, 8),
    }
}

fn decode_action(encoding: Encoding, buf: &[u8]) -> Action {
    Action {
        difo: read_i32(encoding, buf, 0),
        strtab: read_i32(encoding, buf, 4),
        kind: ActionKind::from(read_u32(encoding, buf, 8)),
        ntuple: read_u32(encoding, buf, 12),
        arg: read_u64(encoding, buf, 16),
        uarg: read_u64(encoding, buf, 24),
    }
}

fn decode_variable(encoding: Encoding, buf: &[u8]) -> Variable {
    Variable {
        name: read_u32(encoding, buf, 0),
        id: read_u32(encoding, buf, 4),
        kind: VarKind::from(buf[8] as i8),
        scope: VarScope::from(buf[9] as i8),
        flags: map_flags(i64::from(read_i16(encoding, buf, 10)), VAR_FLAGS),
        diftype: decode_dif_type(encoding, &buf[12..]),
    }
}

fn decode_dif_type(encoding: Encoding, buf: &[u8]) -> DifType {
    DifType {
        kind: DifTypeKind::from(buf[0] as i8),
        ckind: buf[1] as i8,
        flags: map_flags(i64::from(buf[2] as i8), DIF_TYPE_FLAGS),
        size: read_u32(encoding, buf, 4),
    }
}

fn decode_difo_header(encoding: Encoding, buf: &[u8]) -> Result<DifoHeader, Error> {
    if buf.len() < DIF_TYPE_SIZE {
        return Err(Error::RecordTooShort {
            kind: "difohdr",
            expected: DIF_TYPE_SIZE,
            actual: buf.len(),
        });
    }
    let diftype = decode_dif_type(encoding, buf);
    let mut links = Vec::new();
    let mut offset = DIF_TYPE_SIZE;
    while offset + 4 <= buf.len() {
        links.push(read_u32(encoding, buf, offset));
        offset += 4;
    }
    Ok(DifoHeader { diftype, links })
}

fn decode_ecbdesc(encoding: Encoding, buf: &[u8]) -> EcbDesc {
    EcbDesc {
        probes: read_i32(encoding, buf, 0),
        pred: read_i32(encoding, buf, 4),
        actions: read_i32(encoding, buf, 8),
        uarg: read_u64(encoding, buf, 12),
    }
}
