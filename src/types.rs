//! Enumerations, flag tables, and identification types for the DOF format.
// Copyright 2021 Oxide Computer Company

use serde::{Deserialize, Serialize};

use crate::Error;

/// The data model declared in the identification block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    None,
    Ilp32,
    Lp64,
    Unknown(u8),
}

impl From<u8> for Model {
    fn from(value: u8) -> Self {
        match value {
            0 => Model::None,
            1 => Model::Ilp32,
            2 => Model::Lp64,
            other => Model::Unknown(other),
        }
    }
}

/// Byte order used for every multi-byte read past the identification block.
///
/// The format also defines an encoding of `none` (0), which is never valid in
/// an actual object; it is rejected during identification decoding rather
/// than represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Lsb,
    Msb,
}

impl TryFrom<u8> for Encoding {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Encoding::Lsb),
            2 => Ok(Encoding::Msb),
            other => Err(Error::InvalidEncoding(other)),
        }
    }
}

/// DOF format version from the identification block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    V1,
    V2,
    V3,
    Unknown(u8),
}

impl From<u8> for Version {
    fn from(value: u8) -> Self {
        match value {
            1 => Version::V1,
            2 => Version::V2,
            3 => Version::V3,
            other => Version::Unknown(other),
        }
    }
}

/// The DIF machine descriptor embedded in the identification block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifIdent {
    pub version: u8,
    /// Number of integer registers the emitting DIF assembler assumed.
    pub ireg: u8,
    /// Number of tuple-stack registers the emitting DIF assembler assumed.
    pub treg: u8,
}

/// The decoded 16-byte identification block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub model: Model,
    pub encoding: Encoding,
    pub version: Version,
    pub dif: DifIdent,
}

/// The type of a section, from its section header.
///
/// Unrecognized values are preserved as `Unknown` so forward-compatible
/// objects still decode; their payloads are carried as raw data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionType {
    None,
    Comments,
    Source,
    EcbDesc,
    ProbeDesc,
    ActDesc,
    DifoHdr,
    Dif,
    StrTab,
    VarTab,
    RelTab,
    TypTab,
    UrelHdr,
    KrelHdr,
    OptDesc,
    Provider,
    Probes,
    PrArgs,
    PrOffs,
    IntTab,
    UtsName,
    XlTab,
    XlMembers,
    XlImport,
    XlExport,
    PrExport,
    PrEnOffs,
    Unknown(u32),
}

impl From<u32> for SectionType {
    fn from(value: u32) -> Self {
        match value {
            0 => SectionType::None,
            1 => SectionType::Comments,
            2 => SectionType::Source,
            3 => SectionType::EcbDesc,
            4 => SectionType::ProbeDesc,
            5 => SectionType::ActDesc,
            6 => SectionType::DifoHdr,
            7 => SectionType::Dif,
            8 => SectionType::StrTab,
            9 => SectionType::VarTab,
            10 => SectionType::RelTab,
            11 => SectionType::TypTab,
            12 => SectionType::UrelHdr,
            13 => SectionType::KrelHdr,
            14 => SectionType::OptDesc,
            15 => SectionType::Provider,
            16 => SectionType::Probes,
            17 => SectionType::PrArgs,
            18 => SectionType::PrOffs,
            19 => SectionType::IntTab,
            20 => SectionType::UtsName,
            21 => SectionType::XlTab,
            22 => SectionType::XlMembers,
            23 => SectionType::XlImport,
            24 => SectionType::XlExport,
            25 => SectionType::PrExport,
            26 => SectionType::PrEnOffs,
            other => SectionType::Unknown(other),
        }
    }
}

/// Named section-header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionFlag {
    /// The section is loaded into the kernel along with the enabling.
    Load,
}

pub(crate) const SECTION_FLAGS: &[(i32, SectionFlag)] = &[(1, SectionFlag::Load)];

/// The kind of fix-up described by a relocation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelocationType {
    None,
    Setx,
    Unknown(u32),
}

impl From<u32> for RelocationType {
    fn from(value: u32) -> Self {
        match value {
            0 => RelocationType::None,
            1 => RelocationType::Setx,
            other => RelocationType::Unknown(other),
        }
    }
}

/// A stability level from a provider attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    Internal,
    Private,
    Obsolete,
    External,
    Unstable,
    Evolving,
    Stable,
    Standard,
    Unknown(u8),
}

impl From<u8> for Stability {
    fn from(value: u8) -> Self {
        match value {
            0 => Stability::Internal,
            1 => Stability::Private,
            2 => Stability::Obsolete,
            3 => Stability::External,
            4 => Stability::Unstable,
            5 => Stability::Evolving,
            6 => Stability::Stable,
            7 => Stability::Standard,
            other => Stability::Unknown(other),
        }
    }
}

/// The architectural dependency class from a provider attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Class {
    /// The format defines class 0 as "unknown".
    Unknown,
    Cpu,
    Platform,
    Group,
    Isa,
    Common,
    Other(u8),
}

impl From<u8> for Class {
    fn from(value: u8) -> Self {
        match value {
            0 => Class::Unknown,
            1 => Class::Cpu,
            2 => Class::Platform,
            3 => Class::Group,
            4 => Class::Isa,
            5 => Class::Common,
            other => Class::Other(other),
        }
    }
}

/// A stability attribute triple, packed into a 32-bit field in a provider
/// record: bits 24-31 name stability, 16-23 data stability, 8-15 class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub name: Stability,
    pub data: Stability,
    pub class: Class,
}

impl From<u32> for Attributes {
    fn from(value: u32) -> Self {
        Attributes {
            name: Stability::from((value >> 24) as u8),
            data: Stability::from((value >> 16) as u8),
            class: Class::from((value >> 8) as u8),
        }
    }
}

/// The kind of an action descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    None,
    DifExpr,
    Exit,
    Printf,
    Printa,
    LibAct,
    TraceMem,
    TraceMemDynsize,
    Unknown(u32),
}

impl From<u32> for ActionKind {
    fn from(value: u32) -> Self {
        match value {
            0 => ActionKind::None,
            1 => ActionKind::DifExpr,
            2 => ActionKind::Exit,
            3 => ActionKind::Printf,
            4 => ActionKind::Printa,
            5 => ActionKind::LibAct,
            6 => ActionKind::TraceMem,
            7 => ActionKind::TraceMemDynsize,
            other => ActionKind::Unknown(other),
        }
    }
}

/// The kind of a DIF variable-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Array,
    Scalar,
    Unknown(i8),
}

impl From<i8> for VarKind {
    fn from(value: i8) -> Self {
        match value {
            0 => VarKind::Array,
            1 => VarKind::Scalar,
            other => VarKind::Unknown(other),
        }
    }
}

/// The scope of a DIF variable-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarScope {
    Global,
    Thread,
    Local,
    Unknown(i8),
}

impl From<i8> for VarScope {
    fn from(value: i8) -> Self {
        match value {
            0 => VarScope::Global,
            1 => VarScope::Thread,
            2 => VarScope::Local,
            other => VarScope::Unknown(other),
        }
    }
}

/// Named flags on a DIF variable-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarFlag {
    /// The variable is referenced by the program.
    Ref,
    /// The variable is modified by the program.
    Mod,
}

pub(crate) const VAR_FLAGS: &[(i32, VarFlag)] = &[(1, VarFlag::Ref), (2, VarFlag::Mod)];

/// The kind of a DIF type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifTypeKind {
    Ctf,
    String,
    Unknown(i8),
}

impl From<i8> for DifTypeKind {
    fn from(value: i8) -> Self {
        match value {
            1 => DifTypeKind::Ctf,
            2 => DifTypeKind::String,
            other => DifTypeKind::Unknown(other),
        }
    }
}

/// Named flags on a DIF type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifTypeFlag {
    /// The value is passed by reference rather than loaded directly.
    ByRef,
}

pub(crate) const DIF_TYPE_FLAGS: &[(i32, DifTypeFlag)] = &[(1, DifTypeFlag::ByRef)];
