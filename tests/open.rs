//! Opening modules and copying sections out of them.

mod common;

use std::io::{Seek, Write};

use common::*;
use doffld::arch::{HostProfile, LoadOptions, TargetFamily, TargetProfile};
use doffld::doff::{FileHeader, PacketHeader, RelocRecord, DN_EXT, TMS470_ID};
use doffld::reloc::table::R_RELLONG;
use doffld::units::AuWidth;
use doffld::{DefaultSyms, IoStream, LoadError, Loader, MemoryStream, Module};
use object::Endianness;

type Opened<'a> = Result<Module<MemoryStream<'a>, &'a mut DefaultSyms>, LoadError>;

fn profile(host: Endianness) -> TargetProfile {
    TargetProfile::new(
        TargetFamily::C6000,
        HostProfile {
            au: AuWidth::Bits8,
            order: host,
        },
    )
}

fn open<'a>(bytes: &'a [u8], host: Endianness, syms: &'a mut DefaultSyms) -> Opened<'a> {
    Loader::new(profile(host))
        .stream(MemoryStream::new(bytes))
        .syms(syms)
        .open()
}

const ORDERS: [(Endianness, Endianness); 4] = [
    (Endianness::Little, Endianness::Little),
    (Endianness::Little, Endianness::Big),
    (Endianness::Big, Endianness::Little),
    (Endianness::Big, Endianness::Big),
];

#[test]
fn two_section_module_reads_the_same_on_any_host() {
    for (order, host) in ORDERS {
        let bytes = two_sections(order).build();
        let mut syms = DefaultSyms::new();
        let mut module = open(&bytes, host, &mut syms).unwrap();

        assert_eq!(module.reorder_map().is_some(), order != host);
        assert_eq!(&*module.file_name(), b"a.out");
        assert_eq!(module.section_count(), 2);
        assert!(!module.is_big_endian());

        let info = module.get_section_info(".text").unwrap();
        assert_eq!(info.name, ".text");
        assert_eq!(info.run_addr, 0x100);
        assert_eq!(info.size, 64);
        assert_eq!(info.packet_count, 1);

        let mut buf = vec![0u8; 64];
        module.get_section(&info, &mut buf).unwrap();
        assert_eq!(
            words(&buf, host),
            words(&pattern(64, 0x10), order),
            "file {:?} host {:?}",
            order,
            host
        );
        assert_eq!(module.error_count(), 0);

        module.close();
        assert_eq!(syms.outstanding(), 0);
        assert_eq!(syms.error_count(), 0);
    }
}

#[test]
fn every_section_name_resolves() {
    let names = [".text", ".data", ".const", ".switch", ".far"];
    let mut builder = DoffBuilder::default();
    for (i, name) in names.iter().enumerate() {
        builder = builder.section(TestSection::new(
            name,
            DATA,
            0x1000 * i as u32,
            pattern(8 + 4 * i, i as u8),
        ));
    }
    let bytes = builder.build();
    let mut syms = DefaultSyms::new();
    let module = open(&bytes, Endianness::Little, &mut syms).unwrap();

    for (i, name) in names.iter().enumerate() {
        let info = module.get_section_by_index(i).unwrap();
        assert_eq!(info.name, *name);
        assert_eq!(module.section_name(i), Some(name.as_bytes()));
        assert_eq!(module.get_section_info(name), Some(info));
    }
    assert!(module.get_section_by_index(names.len()).is_none());
    assert!(module.get_section_info(".bss").is_none());
    assert_eq!(module.sections().count(), names.len());
}

#[test]
fn packed_names_resolve_on_a_16_bit_host() {
    for (order, host) in ORDERS {
        let bytes = DoffBuilder {
            packed_strings: Some(host),
            ..two_sections(order)
        }
        .section(TestSection::new(".cinit", CINIT, 0, pattern(4, 0)))
        .symbol("_main", 0x100, 1, DN_EXT)
        .build();
        let profile = TargetProfile::new(
            TargetFamily::C6000,
            HostProfile {
                au: AuWidth::Bits16,
                order: host,
            },
        );
        let mut syms = DefaultSyms::new();
        let module = Loader::new(profile)
            .stream(MemoryStream::new(&bytes))
            .syms(&mut syms)
            .open()
            .unwrap();

        assert_eq!(&*module.file_name(), b"a.out", "file {:?} host {:?}", order, host);
        let names: Vec<String> = module.sections().map(|s| s.name).collect();
        assert_eq!(names, [".text", ".data", ".cinit"]);
        assert_eq!(module.get_section_info(".data").unwrap().run_addr, 0x200);
        assert_eq!(&*module.symbol_name(&module.symbols()[0]).unwrap(), b"_main");
        module.close();
        assert_eq!(syms.outstanding(), 0);
    }
}

#[test]
fn section_info_matches_the_wire_record() {
    let (bytes, layout) = two_sections(Endianness::Little).build_with_layout();
    let mut syms = DefaultSyms::new();
    let module = open(&bytes, Endianness::Little, &mut syms).unwrap();
    for (i, record) in layout.records.iter().enumerate() {
        let info = module.get_section_by_index(i).unwrap();
        assert_eq!(info.to_record(record.name_offset), *record);
        assert_eq!(info.context, record.first_pkt_offset);
    }
}

#[test]
fn implausible_headers_fail_without_leaks() {
    let cases = [
        (
            DoffBuilder {
                declared_sections: Some(201),
                ..two_sections(Endianness::Little)
            },
            "section count",
            201,
            200,
        ),
        (
            DoffBuilder {
                declared_strtab: Some(0x10_0001),
                ..two_sections(Endianness::Little)
            },
            "string table size",
            0x10_0001,
            0x10_0000,
        ),
    ];
    for (builder, what, value, limit) in cases {
        let bytes = builder.build();
        let mut syms = DefaultSyms::new();
        let err = open(&bytes, Endianness::Little, &mut syms).unwrap_err();
        assert_eq!(err, LoadError::Implausible { what, value, limit });
        assert_eq!(syms.outstanding(), 0);
        assert_eq!(syms.error_count(), 1);
    }
}

#[test]
fn header_problems_are_reported() {
    let mut syms = DefaultSyms::new();

    let bytes = DoffBuilder {
        target_id: TMS470_ID,
        ..two_sections(Endianness::Little)
    }
    .build();
    assert_eq!(
        open(&bytes, Endianness::Little, &mut syms).unwrap_err(),
        LoadError::BadTargetId {
            found: TMS470_ID,
            expected: 0x99
        }
    );

    let bytes = DoffBuilder {
        version: 1,
        ..two_sections(Endianness::Little)
    }
    .build();
    assert_eq!(
        open(&bytes, Endianness::Little, &mut syms).unwrap_err(),
        LoadError::UnsupportedVersion(1)
    );

    let mut bytes = two_sections(Endianness::Little).build();
    bytes[0] ^= 0x40;
    assert_eq!(
        open(&bytes, Endianness::Little, &mut syms).unwrap_err(),
        LoadError::ChecksumFailure("file header")
    );

    let mut bytes = two_sections(Endianness::Little).build();
    patch_word(
        &mut bytes,
        FileHeader::MARKER_WORD * 4,
        0x1234_5678,
        Endianness::Little,
    );
    assert_eq!(
        open(&bytes, Endianness::Little, &mut syms).unwrap_err(),
        LoadError::BadByteOrder(0x1234_5678)
    );

    let truncated = two_sections(Endianness::Little).build()[..40].to_vec();
    assert!(matches!(
        open(&truncated, Endianness::Little, &mut syms).unwrap_err(),
        LoadError::ShortRead {
            what: "verify record",
            ..
        }
    ));

    assert_eq!(syms.error_count(), 5);
    assert_eq!(syms.outstanding(), 0);
}

#[test]
fn declared_byte_order_must_match_the_request() {
    let bytes = DoffBuilder {
        big_endian_target: true,
        ..two_sections(Endianness::Little)
    }
    .build();

    let mut syms = DefaultSyms::new();
    let module = Loader::new(profile(Endianness::Little))
        .stream(MemoryStream::new(&bytes))
        .syms(&mut syms)
        .options(LoadOptions {
            big_endian: Some(true),
        })
        .open()
        .unwrap();
    assert!(module.is_big_endian());
    drop(module);

    let err = Loader::new(profile(Endianness::Little))
        .stream(MemoryStream::new(&bytes))
        .syms(&mut syms)
        .options(LoadOptions {
            big_endian: Some(false),
        })
        .open()
        .unwrap_err();
    assert_eq!(err, LoadError::EndiannessMismatch);
    assert_eq!(syms.outstanding(), 0);
}

#[test]
fn missing_collaborators() {
    let bytes = two_sections(Endianness::Little).build();

    let err = Loader::<_, DefaultSyms>::new(profile(Endianness::Little))
        .stream(MemoryStream::new(&bytes))
        .open()
        .unwrap_err();
    assert_eq!(err, LoadError::MissingCollaborator("host symbol services"));

    let mut syms = DefaultSyms::new();
    let err = Loader::<MemoryStream<'_>, _>::new(profile(Endianness::Little))
        .syms(&mut syms)
        .open()
        .unwrap_err();
    assert_eq!(err, LoadError::MissingCollaborator("input stream"));
    assert_eq!(syms.error_count(), 1);
    assert_eq!(syms.outstanding(), 0);
}

#[test]
fn every_reservation_is_returned() {
    let bytes = two_sections(Endianness::Little).build();
    let mut opened = 0;
    for limit in (0..2048).step_by(8) {
        let mut syms = DefaultSyms::with_limit(limit);
        match open(&bytes, Endianness::Little, &mut syms) {
            Ok(module) => {
                opened += 1;
                module.close();
            }
            Err(e) => assert!(matches!(e, LoadError::AllocationFailure(_)), "{e}"),
        }
        assert_eq!(syms.outstanding(), 0, "limit {limit}");
    }
    assert!(opened > 0);
}

#[test]
fn oversized_packet_is_rejected_before_its_data() {
    let (mut bytes, layout) = two_sections(Endianness::Little).build_with_layout();
    let first = layout.records[0].first_pkt_offset as usize;
    patch_word(&mut bytes, first + 4, 2048, Endianness::Little);

    let mut syms = DefaultSyms::new();
    let mut module = open(&bytes, Endianness::Little, &mut syms).unwrap();
    let text = module.get_section_info(".text").unwrap();
    let mut buf = vec![0u8; 4096];
    assert_eq!(
        module.get_section(&text, &mut buf),
        Err(LoadError::BadPacketSize(2048))
    );
    assert_eq!(buf[..64], [0u8; 64]);
    assert_eq!(module.error_count(), 1);

    // The handle stays usable.
    let data = module.get_section_info(".data").unwrap();
    module.get_section(&data, &mut buf).unwrap();
    assert_eq!(buf[..64], pattern(64, 0x80)[..]);
}

#[test]
fn relocated_packets_cannot_be_copied() {
    let bytes = DoffBuilder::default()
        .section(
            TestSection::new(".text", TEXT, 0x100, pattern(16, 0)).with_reloc(RelocRecord {
                vaddr: 4,
                operand: 0,
                disp: 0,
                reloc_type: R_RELLONG,
            }),
        )
        .symbol("_main", 0x100, 1, DN_EXT)
        .build();
    let mut syms = DefaultSyms::new();
    let mut module = open(&bytes, Endianness::Little, &mut syms).unwrap();
    let info = module.get_section_info(".text").unwrap();
    let mut buf = vec![0u8; 16];
    assert_eq!(
        module.get_section(&info, &mut buf),
        Err(LoadError::UnsupportedRelocatedPacket(1))
    );
}

#[test]
fn damaged_or_short_destinations_fail() {
    let (mut bytes, layout) = two_sections(Endianness::Little).build_with_layout();
    let first = layout.records[1].first_pkt_offset as usize;
    bytes[first + PacketHeader::SIZE + 5] ^= 0x01;

    let mut syms = DefaultSyms::new();
    let mut module = open(&bytes, Endianness::Little, &mut syms).unwrap();
    let text = module.get_section_info(".text").unwrap();
    let mut small = vec![0u8; 32];
    assert_eq!(
        module.get_section(&text, &mut small),
        Err(LoadError::DestinationTooSmall {
            needed: 64,
            len: 32
        })
    );
    let data = module.get_section_info(".data").unwrap();
    let mut buf = vec![0u8; 64];
    assert_eq!(
        module.get_section(&data, &mut buf),
        Err(LoadError::ChecksumFailure("image packet"))
    );
    assert_eq!(module.error_count(), 2);
}

#[test]
fn sections_span_several_packets() {
    let bytes = DoffBuilder {
        packet_limit: 24,
        ..DoffBuilder::default()
    }
    .section(TestSection::new(".text", TEXT, 0, pattern(70, 3)))
    .build();
    let mut syms = DefaultSyms::new();
    let mut module = open(&bytes, Endianness::Little, &mut syms).unwrap();
    let info = module.get_section_info(".text").unwrap();
    assert_eq!(info.packet_count, 3);
    assert_eq!(module.round_up_section_size(info.size), 72);

    let mut buf = vec![0u8; 72];
    module.get_section(&info, &mut buf).unwrap();
    assert_eq!(buf[..70], pattern(70, 3)[..]);
}

#[test]
fn reads_through_a_file() {
    let bytes = two_sections(Endianness::Big).build();
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&bytes).unwrap();
    file.rewind().unwrap();

    let mut syms = DefaultSyms::new();
    let mut module = Loader::new(profile(Endianness::Little))
        .stream(IoStream::new(file))
        .syms(&mut syms)
        .open()
        .unwrap();
    let info = module.get_section_info(".data").unwrap();
    let mut buf = vec![0u8; 64];
    module.get_section(&info, &mut buf).unwrap();
    assert_eq!(
        words(&buf, Endianness::Little),
        words(&pattern(64, 0x80), Endianness::Big)
    );
    module.close();
    assert_eq!(syms.outstanding(), 0);
}

#[test]
fn arbitrary_input_never_leaks() {
    let valid = two_sections(Endianness::Little).build();
    bolero::check!()
        .with_type::<(Vec<u8>, u16, u8)>()
        .for_each(|(noise, at, xor): &(Vec<u8>, u16, u8)| {
            // Damage a valid module, or open pure noise.
            let bytes = if noise.is_empty() {
                let mut b = valid.clone();
                let i = *at as usize % b.len();
                b[i] ^= xor | 1;
                b
            } else {
                noise.clone()
            };
            let mut syms = DefaultSyms::new();
            if let Ok(mut module) = open(&bytes, Endianness::Little, &mut syms) {
                let infos: Vec<_> = module.sections().collect();
                let mut buf = vec![0u8; 4096];
                for info in &infos {
                    let _ = module.get_section(info, &mut buf);
                }
                module.close();
            }
            assert_eq!(syms.outstanding(), 0);
        });
}
