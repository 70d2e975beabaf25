use pack200::class_file::{
    self, ClassAccessFlags, ClassFile, ConstantsReader, FieldAccessFlags, InnerClassAccessFlags,
    Instruction, MethodAccessFlags, Parse, StackMapFrame, StackMapTable, VerificationType, Version,
    ALOAD_0, INVOKESPECIAL, LDC, LDC2_W, LDC_W, NEW,
};
use pack200::cp::ConstantPool;
use pack200::model::{
    convert_class, Annotation, Class, ClassAttribute, Code, CodeAttribute, CpRef, ElementValue,
    Field, FieldAttribute, InnerClass, LineNumber, Method, MethodAttribute,
};
use pack200::{pack, unpack, Error, PackSettings, UnpackSettings};
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

const RETURN: u8 = 177;
const IRETURN: u8 = 172;
const ILOAD_0: u8 = 26;
const ICONST_0: u8 = 3;
const DUP: u8 = 0x59;
const POP: u8 = 0x57;
const NOP: u8 = 0;
const IFEQ: u8 = 153;
const GETFIELD: u8 = 180;

fn code(max_stack: u16, max_locals: u16, instructions: Vec<Instruction<CpRef, usize>>) -> Code {
    Code {
        max_stack,
        max_locals,
        instructions,
        handlers: vec![],
        attributes: vec![],
    }
}

fn class(pool: &mut ConstantPool, name: &str, methods: Vec<Method>) -> Class {
    Class {
        version: Version::JAVA8,
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class: pool.class(name),
        super_class: Some(pool.class("java/lang/Object")),
        interfaces: vec![],
        fields: vec![],
        methods,
        attributes: vec![],
        inner_classes: None,
    }
}

/// `pkg/Hello` and its member class `pkg/Hello$Inner`
fn hello_classes() -> Vec<(String, Vec<u8>)> {
    let mut pool = ConstantPool::new();
    let object_init = pool.method("java/lang/Object", "<init>", "()V");
    let greeting = pool.string("hello");
    let init = Method {
        access_flags: MethodAccessFlags::PUBLIC,
        descr: pool.descr("<init>", "()V"),
        attributes: vec![MethodAttribute::Code(Code {
            attributes: vec![CodeAttribute::LineNumberTable(vec![LineNumber {
                start: 0,
                line: 3,
            }])],
            ..code(
                1,
                1,
                vec![
                    Instruction::Plain(ALOAD_0),
                    Instruction::Invoke {
                        opcode: INVOKESPECIAL,
                        method: CpRef::Method(object_init),
                    },
                    Instruction::Plain(RETURN),
                ],
            )
        })],
    };
    let greet = Method {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        descr: pool.descr("greet", "()Ljava/lang/String;"),
        attributes: vec![MethodAttribute::Code(code(
            1,
            0,
            vec![
                Instruction::Ldc {
                    opcode: LDC,
                    constant: CpRef::String(greeting),
                },
                Instruction::Plain(176),
            ],
        ))],
    };
    let mut hello = class(&mut pool, "pkg/Hello", vec![init.clone(), greet]);
    hello.fields.push(Field {
        access_flags: FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        descr: pool.descr("COUNT", "I"),
        attributes: vec![FieldAttribute::ConstantValue(CpRef::Int(pool.int(3)))],
    });
    hello
        .attributes
        .push(ClassAttribute::SourceFile(pool.utf8("Hello.java")));
    let inner = class(&mut pool, "pkg/Hello$Inner", vec![init]);

    let global = [InnerClass {
        inner: inner.this_class,
        outer: Some(hello.this_class),
        name: Some(pool.utf8("Inner")),
        flags: InnerClassAccessFlags::PUBLIC | InnerClassAccessFlags::STATIC,
    }];
    [hello, inner]
        .iter()
        .map(|class| {
            let bytes = class.to_class_file(&pool, &global).unwrap().to_bytes().unwrap();
            (format!("{}.class", class.name(&pool)), bytes)
        })
        .collect()
}

/// `pkg/Frames`, whose stack maps have a long offset delta and an uninitialized type
fn frames_class() -> Vec<u8> {
    let mut pool = ConstantPool::new();
    let this_class = pool.class("pkg/Frames");
    let object_init = pool.method("java/lang/Object", "<init>", "()V");
    let thing = pool.class("pkg/Thing");
    let thing_init = pool.method("pkg/Thing", "<init>", "()V");
    let count = pool.field("pkg/Frames", "count", "I");

    // `new` is instruction 16, at bytecode offset 42
    let mut instructions = vec![
        Instruction::Plain(ALOAD_0),
        Instruction::Invoke {
            opcode: INVOKESPECIAL,
            method: CpRef::Method(object_init),
        },
    ];
    instructions.extend((0..12).map(|i| Instruction::SiPush(1000 + i)));
    instructions.extend([Instruction::Plain(NOP), Instruction::Plain(NOP)]);
    instructions.extend([
        Instruction::Type {
            opcode: NEW,
            class: CpRef::Class(thing),
        },
        Instruction::Plain(DUP),
        Instruction::Plain(ICONST_0),
        Instruction::Branch {
            opcode: IFEQ,
            target: 20,
        },
        Instruction::Invoke {
            opcode: INVOKESPECIAL,
            method: CpRef::Method(thing_init),
        },
        Instruction::Plain(POP),
        Instruction::Plain(RETURN),
    ]);
    let init = Method {
        access_flags: MethodAccessFlags::PUBLIC,
        descr: pool.descr("<init>", "()V"),
        attributes: vec![MethodAttribute::Code(Code {
            attributes: vec![CodeAttribute::StackMapTable(StackMapTable(vec![
                StackMapFrame::Full {
                    offset_delta: 50,
                    locals: vec![VerificationType::Object(this_class)],
                    stack: vec![
                        VerificationType::Uninitialized(16),
                        VerificationType::Uninitialized(16),
                    ],
                },
            ]))],
            ..code(20, 1, instructions)
        })],
    };

    // The frame is at bytecode offset 300
    let mut instructions: Vec<_> = (0..100).map(|i| Instruction::SiPush(-i)).collect();
    instructions.push(Instruction::Plain(RETURN));
    let spin = Method {
        access_flags: MethodAccessFlags::STATIC,
        descr: pool.descr("spin", "()V"),
        attributes: vec![MethodAttribute::Code(Code {
            attributes: vec![CodeAttribute::StackMapTable(StackMapTable(vec![
                StackMapFrame::SameExtended { offset_delta: 300 },
            ]))],
            ..code(100, 0, instructions)
        })],
    };

    let get = Method {
        access_flags: MethodAccessFlags::PUBLIC,
        descr: pool.descr("get", "()I"),
        attributes: vec![MethodAttribute::Code(code(
            1,
            1,
            vec![
                Instruction::Plain(ALOAD_0),
                Instruction::Field {
                    opcode: GETFIELD,
                    field: CpRef::Field(count),
                },
                Instruction::Plain(IRETURN),
            ],
        ))],
    };

    let big = pool.int(100_000);
    let long = pool.long(1 << 40);
    let float = pool.float(1.5f32.to_bits());
    let choose = Method {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        descr: pool.descr("choose", "(I)I"),
        attributes: vec![MethodAttribute::Code(code(
            2,
            1,
            vec![
                Instruction::Plain(ILOAD_0),
                Instruction::TableSwitch {
                    default: 7,
                    low: 1,
                    targets: vec![2, 4],
                },
                Instruction::Ldc {
                    opcode: LDC,
                    constant: CpRef::Int(big),
                },
                Instruction::Plain(IRETURN),
                Instruction::Ldc {
                    opcode: LDC2_W,
                    constant: CpRef::Long(long),
                },
                Instruction::Plain(0x88),
                Instruction::Plain(IRETURN),
                Instruction::Ldc {
                    opcode: LDC_W,
                    constant: CpRef::Float(float),
                },
                Instruction::Plain(0x8b),
                Instruction::Plain(ILOAD_0),
                Instruction::LookupSwitch {
                    default: 12,
                    pairs: vec![(-5, 12), (1000, 13)],
                },
                Instruction::Plain(IRETURN),
                Instruction::Plain(ICONST_0),
                Instruction::Plain(IRETURN),
            ],
        ))],
    };

    let mut frames = class(&mut pool, "pkg/Frames", vec![init, spin, get, choose]);
    frames.fields.push(Field {
        access_flags: FieldAccessFlags::PRIVATE,
        descr: pool.descr("count", "I"),
        attributes: vec![],
    });
    frames.to_class_file(&pool, &[]).unwrap().to_bytes().unwrap()
}

struct Entry {
    name: String,
    contents: Vec<u8>,
    deflated: bool,
}

fn sample_entries() -> Vec<Entry> {
    let mut entries = vec![
        Entry {
            name: "META-INF/".to_owned(),
            contents: vec![],
            deflated: false,
        },
        Entry {
            name: "META-INF/MANIFEST.MF".to_owned(),
            contents: b"Manifest-Version: 1.0\r\nCreated-By: hand\r\n\r\n".to_vec(),
            deflated: true,
        },
    ];
    for (name, contents) in hello_classes() {
        entries.push(Entry {
            name,
            contents,
            deflated: true,
        });
    }
    entries.push(Entry {
        name: "pkg/Frames.class".to_owned(),
        contents: frames_class(),
        deflated: false,
    });
    entries.push(Entry {
        name: "pkg/Broken.class".to_owned(),
        contents: vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52],
        deflated: true,
    });
    entries.push(Entry {
        name: "data/blob.bin".to_owned(),
        contents: (0..3000u32).map(|i| (i * 7 % 251) as u8).collect(),
        deflated: false,
    });
    entries
}

fn timestamp() -> DateTime {
    DateTime::from_date_and_time(2020, 1, 2, 3, 4, 6).unwrap()
}

fn write_jar(entries: &[Entry]) -> Vec<u8> {
    let mut jar = ZipWriter::new(Cursor::new(vec![]));
    for entry in entries {
        let method = if entry.deflated {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        let options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(timestamp());
        if entry.name.ends_with('/') {
            jar.add_directory(entry.name.as_str(), options).unwrap();
        } else {
            jar.start_file(entry.name.as_str(), options).unwrap();
            jar.write_all(&entry.contents).unwrap();
        }
    }
    jar.finish().unwrap().into_inner()
}

fn read_jar(bytes: Vec<u8>) -> Vec<Entry> {
    let mut jar = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = vec![];
    for index in 0..jar.len() {
        let mut file = jar.by_index(index).unwrap();
        let modified = file.last_modified();
        assert_eq!(
            (modified.year(), modified.month(), modified.day()),
            (2020, 1, 2)
        );
        assert_eq!(
            (modified.hour(), modified.minute(), modified.second()),
            (3, 4, 6)
        );
        let mut contents = vec![];
        file.read_to_end(&mut contents).unwrap();
        entries.push(Entry {
            name: file.name().to_owned(),
            contents,
            deflated: file.compression() == CompressionMethod::Deflated,
        });
    }
    entries
}

fn pack_bytes(jar: &[u8], settings: &PackSettings) -> Vec<u8> {
    let mut packed = vec![];
    pack(Cursor::new(jar), &mut packed, settings).unwrap();
    packed
}

fn unpack_bytes(packed: &[u8]) -> Result<Vec<u8>, Error> {
    let mut jar = Cursor::new(vec![]);
    unpack(packed, &mut jar, &UnpackSettings::default())?;
    Ok(jar.into_inner())
}

fn segment_count(packed: &[u8]) -> usize {
    packed
        .windows(4)
        .filter(|window| *window == [0xCA, 0xFE, 0xD0, 0x0D])
        .count()
}

fn assert_same_entries(expected: &[Entry], actual: &[Entry]) {
    assert_eq!(expected.len(), actual.len());
    for (expected, actual) in expected.iter().zip(actual) {
        assert_eq!(expected.name, actual.name);
        assert_eq!(expected.contents, actual.contents, "contents of {}", expected.name);
        if !expected.name.ends_with('/') {
            assert_eq!(expected.deflated, actual.deflated, "deflation of {}", expected.name);
        }
    }
}

#[test]
fn single_segment_without_gzip() {
    let entries = sample_entries();
    let settings = PackSettings {
        gzip: false,
        segment_limit: None,
        ..PackSettings::default()
    };
    let packed = pack_bytes(&write_jar(&entries), &settings);
    assert_eq!(packed[..4], [0xCA, 0xFE, 0xD0, 0x0D]);
    assert_eq!(segment_count(&packed), 1);

    let unpacked = read_jar(unpack_bytes(&packed).unwrap());
    assert_same_entries(&entries, &unpacked);
}

#[test]
fn several_gzipped_segments() {
    let entries = sample_entries();
    let settings = PackSettings {
        segment_limit: Some(600),
        ..PackSettings::default()
    };
    let packed = pack_bytes(&write_jar(&entries), &settings);
    assert_eq!(packed[..2], [0x1f, 0x8b]);

    let unpacked = read_jar(unpack_bytes(&packed).unwrap());
    assert_same_entries(&entries, &unpacked);

    let plain = PackSettings {
        gzip: false,
        ..settings
    };
    assert!(segment_count(&pack_bytes(&write_jar(&entries), &plain)) > 1);
}

fn raw_attributes<'a>(
    owner: &ClassFile,
    attributes: &'a [class_file::Attribute],
    name: &str,
) -> Vec<&'a [u8]> {
    attributes
        .iter()
        .filter(|attribute| owner.constants.utf8(attribute.name_index).unwrap() == name)
        .map(|attribute| attribute.info.as_slice())
        .collect()
}

#[test]
fn stack_maps_survive() {
    let entries = sample_entries();
    let settings = PackSettings {
        gzip: false,
        ..PackSettings::default()
    };
    let unpacked = read_jar(unpack_bytes(&pack_bytes(&write_jar(&entries), &settings)).unwrap());
    let frames = unpacked
        .iter()
        .find(|entry| entry.name == "pkg/Frames.class")
        .unwrap();

    // The unpacked class file itself points the uninitialized entries at offset 42
    let unpacked_class = ClassFile::from_bytes(&frames.contents).unwrap();
    let init = &unpacked_class.methods[0];
    let raw_table = raw_attributes(&unpacked_class, &init.attributes, "Code")
        .into_iter()
        .flat_map(|info| class_file::Code::parse_exact(info).unwrap().attributes)
        .find(|attribute| {
            unpacked_class.constants.utf8(attribute.name_index).unwrap() == "StackMapTable"
        })
        .unwrap();
    // full frame with one local, then a stack of two `Uninitialized(42)`
    assert_eq!(raw_table.info[..4], [0, 1, 255, 0]);
    assert!(raw_table.info.ends_with(&[0, 2, 8, 0, 42, 8, 0, 42]));

    let mut pool = ConstantPool::new();
    let converted = convert_class(&frames.contents, &mut pool, &settings).unwrap();
    let tables: Vec<&StackMapTable<_, usize>> = converted
        .class
        .methods
        .iter()
        .filter_map(|method| method.code())
        .flat_map(|code| &code.attributes)
        .filter_map(|attribute| match attribute {
            CodeAttribute::StackMapTable(table) => Some(table),
            _ => None,
        })
        .collect();
    assert_eq!(tables.len(), 2);

    match &tables[0].0[..] {
        [StackMapFrame::Full { stack, .. }] => assert_eq!(
            stack[..],
            [
                VerificationType::Uninitialized(16),
                VerificationType::Uninitialized(16)
            ]
        ),
        other => panic!("unexpected frames {:?}", other),
    }
    assert_eq!(
        tables[1].0,
        vec![StackMapFrame::SameExtended { offset_delta: 300 }]
    );
}

/// `pkg/Annotated`, an annotation interface which is itself annotated all over
fn annotated_class() -> Vec<u8> {
    let mut pool = ConstantPool::new();
    let retention = Annotation {
        descriptor: pool.signature("Ljava/lang/annotation/Retention;"),
        pairs: vec![(
            pool.utf8("value"),
            ElementValue::Enum {
                descriptor: pool.signature("Ljava/lang/annotation/RetentionPolicy;"),
                name: pool.utf8("RUNTIME"),
            },
        )],
    };
    let tagged = Annotation {
        descriptor: pool.signature("Lpkg/Tagged;"),
        pairs: vec![
            (
                pool.utf8("names"),
                ElementValue::Array(vec![
                    ElementValue::String(pool.utf8("first")),
                    ElementValue::String(pool.utf16(&[0x73, 0xDC00])),
                ]),
            ),
            (pool.utf8("nested"), ElementValue::Annotation(retention.clone())),
            (pool.utf8("ratio"), ElementValue::Double(pool.double(0.5f64.to_bits()))),
        ],
    };

    let mut annotated = class(&mut pool, "pkg/Annotated", vec![]);
    annotated.access_flags = ClassAccessFlags::PUBLIC
        | ClassAccessFlags::INTERFACE
        | ClassAccessFlags::ABSTRACT
        | ClassAccessFlags::ANNOTATION;
    annotated.interfaces = vec![pool.class("java/lang/annotation/Annotation")];
    annotated.attributes = vec![
        ClassAttribute::VisibleAnnotations(vec![retention]),
        ClassAttribute::InvisibleAnnotations(vec![tagged.clone()]),
    ];
    annotated.fields.push(Field {
        access_flags: FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        descr: pool.descr("LIMIT", "J"),
        attributes: vec![
            FieldAttribute::ConstantValue(CpRef::Long(pool.long(1 << 40))),
            FieldAttribute::VisibleAnnotations(vec![tagged.clone()]),
        ],
    });
    annotated.methods.push(Method {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        descr: pool.descr("level", "(IZ)C"),
        attributes: vec![
            MethodAttribute::InvisibleAnnotations(vec![tagged.clone()]),
            MethodAttribute::VisibleParameterAnnotations(vec![vec![tagged], vec![]]),
            MethodAttribute::AnnotationDefault(ElementValue::Int {
                tag: b'C',
                value: pool.int('x' as i32),
            }),
        ],
    });
    annotated
        .to_class_file(&pool, &[])
        .unwrap()
        .to_bytes()
        .unwrap()
}

#[test]
fn annotations_survive() {
    let annotated = annotated_class();
    let settings = PackSettings {
        gzip: false,
        ..PackSettings::default()
    };

    // The class goes through the bands rather than as a plain file
    let mut pool = ConstantPool::new();
    let converted = convert_class(&annotated, &mut pool, &settings).unwrap();
    assert_eq!(converted.class.attributes.len(), 2);
    assert_eq!(converted.class.methods[0].attributes.len(), 3);

    let entries = vec![Entry {
        name: "pkg/Annotated.class".to_owned(),
        contents: annotated,
        deflated: true,
    }];
    let unpacked = read_jar(unpack_bytes(&pack_bytes(&write_jar(&entries), &settings)).unwrap());
    assert_same_entries(&entries, &unpacked);

    let class_file = ClassFile::from_bytes(&unpacked[0].contents).unwrap();
    let defaults = raw_attributes(
        &class_file,
        &class_file.methods[0].attributes,
        "AnnotationDefault",
    );
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0][0], b'C');
}

#[test]
fn malformed_archives() {
    let bad_magic = [0xCA, 0xFE, 0xBA, 0xBE, 7, 150, 0];
    assert!(unpack_bytes(&bad_magic).unwrap_err().is_format_error());

    assert!(unpack_bytes(&[]).unwrap_err().is_format_error());

    let settings = PackSettings {
        gzip: false,
        segment_limit: None,
        ..PackSettings::default()
    };
    let packed = pack_bytes(&write_jar(&sample_entries()), &settings);
    let truncated = &packed[..packed.len() / 2];
    assert!(unpack_bytes(truncated).unwrap_err().is_format_error());
}
