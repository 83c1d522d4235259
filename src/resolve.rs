//! Phase-2 resolution: replace string-table offsets and section indices in
//! the decoded sections with the data they reference.
// Copyright 2021 Oxide Computer Company

use std::collections::BTreeMap;

use crate::des;
use crate::types::{Ident, SectionType};
use crate::{Dof, EcbDesc, Error, Probe, ProbeDesc, Provider, Relocation, RelocationTable};
use crate::{Section, SectionData};

// Attached relocations, keyed by target section index and then by target
// record index.
type Attachments = BTreeMap<usize, BTreeMap<usize, Vec<Relocation>>>;

/// Link the decoded section list into an owned, fully resolved [`Dof`].
///
/// Any dangling or ill-typed reference fails the whole decode; the partially
/// resolved state is discarded.
pub(crate) fn resolve(
    ident: Ident,
    header: &des::Header,
    sections: &[des::Section],
) -> Result<Dof, Error> {
    // Resolve relocation headers first so that attachments to target
    // sections exist when the sections themselves are rebuilt.
    let mut attachments = Attachments::new();
    let mut tables = BTreeMap::new();
    for (index, section) in sections.iter().enumerate() {
        if let des::SectionData::RelocationHeaders(headers) = &section.data {
            let resolved = headers
                .iter()
                .map(|h| resolve_relocation_header(sections, h, &mut attachments))
                .collect::<Result<Vec<_>, _>>()?;
            tables.insert(index, resolved);
        }
    }

    let mut resolved = Vec::with_capacity(sections.len());
    for (index, section) in sections.iter().enumerate() {
        let data = match &section.data {
            des::SectionData::ProbeDescs(descs) => {
                SectionData::ProbeDescs(resolve_probe_descs(sections, descs)?)
            }
            des::SectionData::Providers(providers) => SectionData::Providers(
                providers
                    .iter()
                    .map(|p| resolve_provider(sections, p))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            des::SectionData::RelocationHeaders(_) => {
                SectionData::RelocationTables(tables.remove(&index).unwrap_or_default())
            }
            des::SectionData::EcbDescs(ecbs) => SectionData::EcbDescs(
                ecbs.iter()
                    .map(|e| resolve_ecbdesc(sections, e))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            // Everything else carries its phase-1 payload through.
            des::SectionData::Bytes(bytes) => SectionData::Bytes(bytes.clone()),
            des::SectionData::U16(values) => SectionData::U16(values.clone()),
            des::SectionData::U32(values) => SectionData::U32(values.clone()),
            des::SectionData::U64(values) => SectionData::U64(values.clone()),
            des::SectionData::Chunks(chunks) => SectionData::Chunks(chunks.clone()),
            des::SectionData::String(s) => SectionData::String(s.clone()),
            des::SectionData::Probes(probes) => SectionData::Probes(probes.clone()),
            des::SectionData::Relocations(entries) => SectionData::Relocations(entries.clone()),
            des::SectionData::Actions(actions) => SectionData::Actions(actions.clone()),
            des::SectionData::Variables(vars) => SectionData::Variables(vars.clone()),
            des::SectionData::Difo(difo) => SectionData::Difo(difo.clone()),
        };
        resolved.push(Section {
            header: section.header.clone(),
            data,
            relocations: attachments.remove(&index).unwrap_or_default(),
        });
    }

    Ok(Dof {
        ident,
        flags: header.flags,
        hdrsize: header.hdrsize,
        secsize: header.secsize,
        secnum: header.secnum,
        secoff: header.secoff,
        loadsz: header.loadsz,
        filesz: header.filesz,
        sections: resolved,
    })
}

// Look up a section by a raw (signed) index field.
fn section_at(sections: &[des::Section], index: i32) -> Result<(usize, &des::Section), Error> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < sections.len())
        .map(|i| (i, &sections[i]))
        .ok_or(Error::NoSuchSection {
            index: i64::from(index),
            count: sections.len(),
        })
}

// Look up a section by index and require its declared type.
fn typed_section_at(
    sections: &[des::Section],
    index: i32,
    expected: SectionType,
) -> Result<(usize, &des::Section), Error> {
    let (idx, section) = section_at(sections, index)?;
    if section.header.section_type != expected {
        return Err(Error::UnexpectedSectionType {
            index: idx,
            expected,
            actual: section.header.section_type,
        });
    }
    Ok((idx, section))
}

fn strtab_at(sections: &[des::Section], index: i32) -> Result<&[u8], Error> {
    let (idx, section) = typed_section_at(sections, index, SectionType::StrTab)?;
    match &section.data {
        des::SectionData::Bytes(bytes) => Ok(bytes),
        _ => Err(Error::MalformedTable { index: idx }),
    }
}

fn u32_table(
    sections: &[des::Section],
    index: i32,
    expected: SectionType,
) -> Result<&[u32], Error> {
    let (idx, section) = typed_section_at(sections, index, expected)?;
    match &section.data {
        des::SectionData::U32(values) => Ok(values),
        _ => Err(Error::MalformedTable { index: idx }),
    }
}

fn byte_table(
    sections: &[des::Section],
    index: i32,
    expected: SectionType,
) -> Result<&[u8], Error> {
    let (idx, section) = typed_section_at(sections, index, expected)?;
    match &section.data {
        des::SectionData::Bytes(bytes) => Ok(bytes),
        _ => Err(Error::MalformedTable { index: idx }),
    }
}

// Resolve one null-terminated string from a string table.
fn string_at(strtab: &[u8], offset: u32) -> Result<String, Error> {
    let offset = offset as usize;
    if offset > strtab.len() {
        return Err(Error::StringOutOfBounds {
            offset,
            len: strtab.len(),
        });
    }
    Ok(des::extract_string(&strtab[offset..]))
}

// Resolve `count` consecutive null-terminated strings starting at `offset`.
fn string_run(strtab: &[u8], offset: u32, count: usize) -> Result<Vec<String>, Error> {
    let mut strings = Vec::with_capacity(count);
    let mut offset = offset as usize;
    for _ in 0..count {
        if offset > strtab.len() {
            return Err(Error::StringOutOfBounds {
                offset,
                len: strtab.len(),
            });
        }
        let end = strtab[offset..]
            .iter()
            .position(|&x| x == 0)
            .map(|p| offset + p)
            .unwrap_or(strtab.len());
        strings.push(String::from_utf8_lossy(&strtab[offset..end]).into_owned());
        offset = end + 1;
    }
    Ok(strings)
}

fn table_slice<T: Copy>(values: &[T], start: usize, count: usize) -> Result<Vec<T>, Error> {
    let range_error = Error::TableSliceOutOfBounds {
        start,
        count,
        len: values.len(),
    };
    let end = start.checked_add(count).ok_or(range_error.clone())?;
    if end > values.len() {
        return Err(range_error);
    }
    Ok(values[start..end].to_vec())
}

fn resolve_probe_descs(
    sections: &[des::Section],
    descs: &[des::ProbeDesc],
) -> Result<Vec<ProbeDesc>, Error> {
    descs
        .iter()
        .map(|desc| {
            let strtab = strtab_at(sections, desc.strtab)?;
            Ok(ProbeDesc {
                provider: string_at(strtab, desc.provider)?,
                module: string_at(strtab, desc.module)?,
                function: string_at(strtab, desc.function)?,
                name: string_at(strtab, desc.name)?,
                id: desc.id,
            })
        })
        .collect()
}

fn resolve_provider(
    sections: &[des::Section],
    provider: &des::Provider,
) -> Result<Provider, Error> {
    let strtab = strtab_at(sections, provider.strtab)?;
    let (probes_index, probes_section) =
        typed_section_at(sections, provider.probes, SectionType::Probes)?;
    let probes = match &probes_section.data {
        des::SectionData::Probes(probes) => probes,
        _ => {
            return Err(Error::MalformedTable {
                index: probes_index,
            })
        }
    };
    let args = byte_table(sections, provider.prargs, SectionType::PrArgs)?;
    let offsets = u32_table(sections, provider.proffs, SectionType::PrOffs)?;
    let enabled_offsets = u32_table(sections, provider.prenoffs, SectionType::PrEnOffs)?;

    let probes = probes
        .iter()
        .map(|probe| {
            Ok(Probe {
                address: probe.addr,
                function: string_at(strtab, probe.func)?,
                name: string_at(strtab, probe.name)?,
                native_arg_types: string_run(strtab, probe.nargv, probe.nargc as usize)?,
                translated_arg_types: string_run(strtab, probe.xargv, probe.xargc as usize)?,
                args: table_slice(args, probe.argidx as usize, probe.nargc as usize)?,
                offsets: table_slice(offsets, probe.offidx as usize, probe.noffs as usize)?,
                enabled_offsets: table_slice(
                    enabled_offsets,
                    probe.enoffidx as usize,
                    probe.nenoffs as usize,
                )?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(Provider {
        name: string_at(strtab, provider.name)?,
        provider_attributes: provider.provider_attributes,
        module_attributes: provider.module_attributes,
        function_attributes: provider.function_attributes,
        name_attributes: provider.name_attributes,
        args_attributes: provider.args_attributes,
        probes,
    })
}

fn resolve_relocation_header(
    sections: &[des::Section],
    header: &des::RelocationHeader,
    attachments: &mut Attachments,
) -> Result<RelocationTable, Error> {
    let strtab = strtab_at(sections, header.strtab)?;
    let (relsec_index, relsec) = typed_section_at(sections, header.relsec, SectionType::RelTab)?;
    let entries = match &relsec.data {
        des::SectionData::Relocations(entries) => entries,
        _ => {
            return Err(Error::MalformedTable {
                index: relsec_index,
            })
        }
    };
    // The target may be a section of any type.
    let (target, target_section) = section_at(sections, header.tgtsec)?;
    let entsize = u64::from(target_section.header.entsize);

    let mut relocations = Vec::with_capacity(entries.len());
    for entry in entries {
        let relocation = Relocation {
            name: string_at(strtab, entry.name)?,
            kind: entry.kind,
            offset: entry.offset,
            data: entry.data,
        };
        if entsize == 0 || entry.offset % entsize != 0 {
            return Err(Error::MisalignedRelocation {
                offset: entry.offset,
                entsize: target_section.header.entsize,
            });
        }
        let record = (entry.offset / entsize) as usize;
        attachments
            .entry(target)
            .or_default()
            .entry(record)
            .or_default()
            .push(relocation.clone());
        relocations.push(relocation);
    }
    Ok(RelocationTable {
        target,
        relocations,
    })
}

fn resolve_ecbdesc(sections: &[des::Section], ecb: &des::EcbDesc) -> Result<EcbDesc, Error> {
    let (probes_index, probes_section) =
        typed_section_at(sections, ecb.probes, SectionType::ProbeDesc)?;
    let descs = match &probes_section.data {
        des::SectionData::ProbeDescs(descs) => descs,
        _ => {
            return Err(Error::MalformedTable {
                index: probes_index,
            })
        }
    };
    let probes = resolve_probe_descs(sections, descs)?;

    let (actions_index, actions_section) =
        typed_section_at(sections, ecb.actions, SectionType::ActDesc)?;
    let actions = match &actions_section.data {
        des::SectionData::Actions(actions) => actions.clone(),
        _ => {
            return Err(Error::MalformedTable {
                index: actions_index,
            })
        }
    };

    // -1 is the "no predicate" sentinel, not a dangling reference.
    let predicate = if ecb.pred == -1 {
        None
    } else {
        let (pred_index, pred_section) =
            typed_section_at(sections, ecb.pred, SectionType::DifoHdr)?;
        match &pred_section.data {
            des::SectionData::Difo(difo) => Some(difo.clone()),
            _ => return Err(Error::MalformedTable { index: pred_index }),
        }
    };

    Ok(EcbDesc {
        probes,
        predicate,
        actions,
        uarg: ecb.uarg,
    })
}

#[cfg(test)]
mod tests {
    use crate::test::Builder;
    use crate::types::{Class, Encoding, RelocationType, SectionType, Stability};
    use crate::{Dof, Error, SectionData};

    // Section type numbers used by the fixtures.
    const ECBDESC: u32 = 3;
    const PROBEDESC: u32 = 4;
    const ACTDESC: u32 = 5;
    const DIFOHDR: u32 = 6;
    const STRTAB: u32 = 8;
    const RELTAB: u32 = 10;
    const URELHDR: u32 = 12;
    const PROVIDER: u32 = 15;
    const PROBES: u32 = 16;
    const PRARGS: u32 = 17;
    const PROFFS: u32 = 18;
    const PRENOFFS: u32 = 26;

    fn probedesc_entry(b: &Builder, strtab: i32, offsets: [u32; 4], id: u32) -> Vec<u8> {
        let mut out = Vec::new();
        b.put_u32(&mut out, strtab as u32);
        for offset in offsets {
            b.put_u32(&mut out, offset);
        }
        b.put_u32(&mut out, id);
        out
    }

    // The minimal end-to-end scenario: one string table and one probedesc
    // section referencing it.
    #[test]
    fn test_resolve_probedesc() {
        let builder = Builder::new(Encoding::Lsb);
        let entry = probedesc_entry(&builder, 0, [0, 4, 0, 4], 7);
        let buf = builder
            .section(STRTAB, 0, b"foo\0bar\0")
            .section(PROBEDESC, 24, &entry)
            .build();
        let dof = Dof::from_bytes(&buf).unwrap();
        let descs = match &dof.sections[1].data {
            SectionData::ProbeDescs(descs) => descs,
            other => panic!("expected probedesc payload, found {:?}", other),
        };
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].provider, "foo");
        assert_eq!(descs[0].module, "bar");
        assert_eq!(descs[0].function, "foo");
        assert_eq!(descs[0].name, "bar");
        assert_eq!(descs[0].id, 7);
    }

    #[test]
    fn test_probedesc_strtab_must_be_strtab() {
        let builder = Builder::new(Encoding::Lsb);
        let entry = probedesc_entry(&builder, 0, [0, 0, 0, 0], 0);
        // Section 0 is a probes section, not a string table.
        let buf = builder
            .section(PROBES, 0, &[0; 48])
            .section(PROBEDESC, 24, &entry)
            .build();
        assert_eq!(
            Dof::from_bytes(&buf),
            Err(Error::UnexpectedSectionType {
                index: 0,
                expected: SectionType::StrTab,
                actual: SectionType::Probes,
            })
        );
    }

    #[test]
    fn test_probedesc_dangling_section_index() {
        let builder = Builder::new(Encoding::Lsb);
        let entry = probedesc_entry(&builder, 5, [0, 0, 0, 0], 0);
        let buf = builder
            .section(STRTAB, 0, b"foo\0")
            .section(PROBEDESC, 24, &entry)
            .build();
        assert_eq!(
            Dof::from_bytes(&buf),
            Err(Error::NoSuchSection { index: 5, count: 2 })
        );
    }

    #[test]
    fn test_string_offset_out_of_bounds() {
        let builder = Builder::new(Encoding::Lsb);
        let entry = probedesc_entry(&builder, 0, [0, 100, 0, 0], 0);
        let buf = builder
            .section(STRTAB, 0, b"foo\0")
            .section(PROBEDESC, 24, &entry)
            .build();
        assert_eq!(
            Dof::from_bytes(&buf),
            Err(Error::StringOutOfBounds {
                offset: 100,
                len: 4
            })
        );
    }

    fn provider_fixture(encoding: Encoding) -> Vec<u8> {
        let b = Builder::new(encoding);
        // Strings: provider name, function, probe name, then the two native
        // and one translated argument type names read as runs.
        let strtab = b"emphatic\0ring\0doorbell\0uint8_t\0char *\0string\0";

        let mut probe = Vec::new();
        b.put_u64(&mut probe, 0x1122334455667788); // addr, raw bytes
        b.put_u32(&mut probe, 9); // func: "ring"
        b.put_u32(&mut probe, 14); // name: "doorbell"
        b.put_u32(&mut probe, 23); // nargv: "uint8_t", "char *"
        b.put_u32(&mut probe, 38); // xargv: "string"
        b.put_u32(&mut probe, 1); // argidx
        b.put_u32(&mut probe, 1); // offidx
        probe.push(2); // nargc
        probe.push(1); // xargc
        b.put_u16(&mut probe, 2); // noffs
        b.put_u32(&mut probe, 0); // enoffidx
        b.put_u16(&mut probe, 1); // nenoffs
        probe.extend([0; 6]); // pad to 48

        let mut proffs = Vec::new();
        for offset in [0x10u32, 0x20, 0x30] {
            b.put_u32(&mut proffs, offset);
        }
        let mut prenoffs = Vec::new();
        b.put_u32(&mut prenoffs, 0x40);

        let mut provider = Vec::new();
        b.put_u32(&mut provider, 0); // strtab
        b.put_u32(&mut provider, 1); // probes
        b.put_u32(&mut provider, 2); // prargs
        b.put_u32(&mut provider, 3); // proffs
        b.put_u32(&mut provider, 0); // name: "emphatic"
        for _ in 0..5 {
            b.put_u32(&mut provider, 0x0605_0100); // stable/evolving/cpu
        }
        b.put_u32(&mut provider, 4); // prenoffs

        b.section(STRTAB, 0, strtab)
            .section(PROBES, 48, &probe)
            .section(PRARGS, 1, &[0, 0, 1])
            .section(PROFFS, 4, &proffs)
            .section(PRENOFFS, 4, &prenoffs)
            .section(PROVIDER, 44, &provider)
            .build()
    }

    #[test]
    fn test_resolve_provider() {
        for encoding in [Encoding::Lsb, Encoding::Msb] {
            let dof = Dof::from_bytes(&provider_fixture(encoding)).unwrap();
            let providers = match &dof.sections[5].data {
                SectionData::Providers(providers) => providers,
                other => panic!("expected provider payload, found {:?}", other),
            };
            assert_eq!(providers.len(), 1);
            let provider = &providers[0];
            assert_eq!(provider.name, "emphatic");
            assert_eq!(provider.provider_attributes.name, Stability::Stable);
            assert_eq!(provider.provider_attributes.data, Stability::Evolving);
            assert_eq!(provider.provider_attributes.class, Class::Cpu);

            assert_eq!(provider.probes.len(), 1);
            let probe = &provider.probes[0];
            assert_eq!(probe.function, "ring");
            assert_eq!(probe.name, "doorbell");
            assert_eq!(
                probe.native_arg_types,
                vec!["uint8_t".to_string(), "char *".to_string()]
            );
            assert_eq!(probe.translated_arg_types, vec!["string".to_string()]);
            assert_eq!(probe.args, vec![0, 1]);
            assert_eq!(probe.offsets, vec![0x20, 0x30]);
            assert_eq!(probe.enabled_offsets, vec![0x40]);
        }
    }

    #[test]
    fn test_provider_offset_slice_out_of_range() {
        // noffs of 2 starting at offidx 2 exceeds the 3-entry proffs table.
        let mut buf = provider_fixture(Encoding::Lsb);
        let probes_offset = 44 + 6 * 32 + 45;
        buf[probes_offset + 28] = 2; // offidx
        assert_eq!(
            Dof::from_bytes(&buf),
            Err(Error::TableSliceOutOfBounds {
                start: 2,
                count: 2,
                len: 3
            })
        );
    }

    #[test]
    fn test_provider_table_type_mismatch() {
        // Point the provider's proffs reference at the prargs section.
        let mut buf = provider_fixture(Encoding::Lsb);
        let provider_offset = buf.len() - 44;
        buf[provider_offset + 12] = 2;
        assert_eq!(
            Dof::from_bytes(&buf),
            Err(Error::UnexpectedSectionType {
                index: 2,
                expected: SectionType::PrOffs,
                actual: SectionType::PrArgs,
            })
        );
    }

    fn relocation_fixture() -> Vec<u8> {
        let b = Builder::new(Encoding::Lsb);

        let mut reltab = Vec::new();
        for (name, offset) in [(0u32, 0u64), (5, 48)] {
            b.put_u32(&mut reltab, name);
            b.put_u32(&mut reltab, 1); // setx
            b.put_u64(&mut reltab, offset);
            b.put_u64(&mut reltab, 0xfeed);
        }

        let mut relhdr = Vec::new();
        b.put_u32(&mut relhdr, 0); // strtab
        b.put_u32(&mut relhdr, 2); // relsec
        b.put_u32(&mut relhdr, 3); // tgtsec

        b.section(STRTAB, 0, b"sym1\0sym2\0")
            .section(URELHDR, 12, &relhdr)
            .section(RELTAB, 24, &reltab)
            .section(PROBES, 48, &[0; 96])
            .build()
    }

    #[test]
    fn test_resolve_relocations() {
        let dof = Dof::from_bytes(&relocation_fixture()).unwrap();
        let tables = match &dof.sections[1].data {
            SectionData::RelocationTables(tables) => tables,
            other => panic!("expected relocation tables, found {:?}", other),
        };
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].target, 3);
        assert_eq!(tables[0].relocations.len(), 2);
        assert_eq!(tables[0].relocations[0].name, "sym1");
        assert_eq!(tables[0].relocations[1].name, "sym2");
        assert_eq!(tables[0].relocations[1].kind, RelocationType::Setx);
        assert_eq!(tables[0].relocations[1].offset, 48);

        // Both entries land on records of the probes section: offsets 0 and
        // 48 with a 48-byte entry size select records 0 and 1.
        let target = &dof.sections[3];
        assert_eq!(target.relocations.len(), 2);
        assert_eq!(target.relocations[&0].len(), 1);
        assert_eq!(target.relocations[&0][0].name, "sym1");
        assert_eq!(target.relocations[&1][0].name, "sym2");
    }

    #[test]
    fn test_relocations_accumulate_on_one_record() {
        let mut buf = relocation_fixture();
        // Rewrite the second entry's offset from 48 to 0.
        let reltab_offset = 44 + 4 * 32 + 10 + 12;
        buf[reltab_offset + 24 + 8] = 0;
        let dof = Dof::from_bytes(&buf).unwrap();
        let target = &dof.sections[3];
        assert_eq!(target.relocations.len(), 1);
        let attached = &target.relocations[&0];
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0].name, "sym1");
        assert_eq!(attached[1].name, "sym2");
    }

    #[test]
    fn test_misaligned_relocation() {
        let mut buf = relocation_fixture();
        let reltab_offset = 44 + 4 * 32 + 10 + 12;
        buf[reltab_offset + 24 + 8] = 49;
        assert_eq!(
            Dof::from_bytes(&buf),
            Err(Error::MisalignedRelocation {
                offset: 49,
                entsize: 48
            })
        );
    }

    #[test]
    fn test_relocation_relsec_must_be_reltab() {
        let mut buf = relocation_fixture();
        let relhdr_offset = 44 + 4 * 32 + 10;
        buf[relhdr_offset + 4] = 3; // point relsec at the probes section
        assert_eq!(
            Dof::from_bytes(&buf),
            Err(Error::UnexpectedSectionType {
                index: 3,
                expected: SectionType::RelTab,
                actual: SectionType::Probes,
            })
        );
    }

    fn ecb_fixture(pred: i32) -> Vec<u8> {
        let b = Builder::new(Encoding::Lsb);
        let probedesc = probedesc_entry(&b, 0, [0, 4, 0, 4], 1);

        let mut action = Vec::new();
        b.put_u32(&mut action, 3); // difo
        b.put_u32(&mut action, 0); // strtab
        b.put_u32(&mut action, 1); // kind: difexpr
        b.put_u32(&mut action, 0); // ntuple
        b.put_u64(&mut action, 0);
        b.put_u64(&mut action, 0);

        let mut difo = Vec::new();
        difo.extend([2, 0, 1, 0]); // string, byref
        b.put_u32(&mut difo, 16); // size
        b.put_u32(&mut difo, 0); // one link

        let mut ecb = Vec::new();
        b.put_u32(&mut ecb, 1); // probes
        b.put_u32(&mut ecb, pred as u32);
        b.put_u32(&mut ecb, 2); // actions
        b.put_u64(&mut ecb, 0xabcd);
        ecb.extend([0; 4]); // pad to 24

        b.section(STRTAB, 0, b"foo\0bar\0")
            .section(PROBEDESC, 24, &probedesc)
            .section(ACTDESC, 32, &action)
            .section(DIFOHDR, 0, &difo)
            .section(ECBDESC, 24, &ecb)
            .build()
    }

    #[test]
    fn test_resolve_ecbdesc() {
        let dof = Dof::from_bytes(&ecb_fixture(3)).unwrap();
        let ecbs = match &dof.sections[4].data {
            SectionData::EcbDescs(ecbs) => ecbs,
            other => panic!("expected ecbdesc payload, found {:?}", other),
        };
        assert_eq!(ecbs.len(), 1);
        let ecb = &ecbs[0];
        assert_eq!(ecb.probes.len(), 1);
        assert_eq!(ecb.probes[0].provider, "foo");
        assert_eq!(ecb.actions.len(), 1);
        assert_eq!(ecb.uarg, 0xabcd);
        let difo = ecb.predicate.as_ref().unwrap();
        assert_eq!(difo.links, vec![0]);
    }

    #[test]
    fn test_ecb_predicate_sentinel_is_absent() {
        let dof = Dof::from_bytes(&ecb_fixture(-1)).unwrap();
        let ecbs = match &dof.sections[4].data {
            SectionData::EcbDescs(ecbs) => ecbs,
            other => panic!("expected ecbdesc payload, found {:?}", other),
        };
        assert!(ecbs[0].predicate.is_none());
        assert_eq!(ecbs[0].probes[0].module, "bar");
    }

    #[test]
    fn test_ecb_predicate_must_be_difohdr() {
        // A predicate index pointing at the string table is an error even
        // though -1 would be accepted.
        assert_eq!(
            Dof::from_bytes(&ecb_fixture(0)),
            Err(Error::UnexpectedSectionType {
                index: 0,
                expected: SectionType::DifoHdr,
                actual: SectionType::StrTab,
            })
        );
    }

    #[test]
    fn test_ecb_other_negative_index_is_dangling() {
        let buf = ecb_fixture(-2);
        assert_eq!(
            Dof::from_bytes(&buf),
            Err(Error::NoSuchSection {
                index: -2,
                count: 5
            })
        );
    }
}
