use super::{FileContents, Segment, SegmentFile};
use crate::class_file::ClassFile;
use crate::cp::ConstantPool;
use crate::errors::Error;
use crate::model::{convert_class, local_inner_classes, Class, ConvertedClass, InnerClass};
use crate::settings::{ModificationTime, PackSettings, UnknownAttributeAction};

/// Class converted for the segment, with its class file kept around in case it has to be passed
/// through after all
struct PendingClass {
    converted: ConvertedClass,
    bytes: Vec<u8>,
}

/// Whether a failure to transmit a class should make it a plain file
fn can_pass(settings: &PackSettings, err: &Error) -> bool {
    err.is_passable() && settings.unknown_attribute != UnknownAttributeAction::Error
}

/// Number of `$` separators in a class name
fn nesting_depth(name: &str) -> usize {
    name.rsplit('/').next().unwrap_or(name).matches('$').count()
}

/// Collects the files of a segment being packed
///
/// Class files are converted as they are added. Those which cannot be transmitted as classes are
/// passed through as plain files, unless the settings say to fail instead.
pub struct SegmentBuilder<'a> {
    settings: &'a PackSettings,
    pool: ConstantPool,
    classes: Vec<PendingClass>,
    files: Vec<SegmentFile>,
    input_size: usize,
}

impl<'a> SegmentBuilder<'a> {
    pub fn new(settings: &'a PackSettings) -> SegmentBuilder<'a> {
        SegmentBuilder {
            settings,
            pool: ConstantPool::new(),
            classes: vec![],
            files: vec![],
            input_size: 0,
        }
    }

    /// Approximate number of input bytes added so far
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn add_file(
        &mut self,
        name: &str,
        contents: Vec<u8>,
        modtime: u32,
        deflate: bool,
    ) -> Result<(), Error> {
        self.input_size += name.len() + contents.len();
        self.pool.utf8(name);

        let is_class = name.ends_with(".class") && contents.starts_with(&ClassFile::MAGIC);
        let contents = if is_class {
            match convert_class(&contents, &mut self.pool, self.settings) {
                Ok(converted) => {
                    self.classes.push(PendingClass {
                        converted,
                        bytes: contents,
                    });
                    FileContents::Class(self.classes.len() - 1)
                }
                Err(err) if can_pass(self.settings, &err) => {
                    log::debug!("Passing {} through as a plain file: {}", name, err);
                    FileContents::Bytes(contents)
                }
                Err(err) => return Err(err),
            }
        } else {
            FileContents::Bytes(contents)
        };

        self.files.push(SegmentFile {
            name: name.to_owned(),
            modtime,
            deflate: self.settings.deflate_hint.apply(deflate),
            contents,
        });
        Ok(())
    }

    /// Settle the inner class tuples of every class and produce the segment
    pub fn finish(self) -> Result<Segment, Error> {
        let SegmentBuilder {
            settings,
            pool,
            classes,
            mut files,
            ..
        } = self;

        // Segment-wide tuples: the first declaration of each inner class wins, with outer classes
        // declaring before their members so that their own order is the one kept
        let mut declaring: Vec<&PendingClass> = classes.iter().collect();
        declaring.sort_by_key(|pending| {
            nesting_depth(pool.class_name(pending.converted.class.this_class))
        });
        let mut inner_classes: Vec<InnerClass> = vec![];
        for pending in declaring {
            for tuple in pending.converted.declared_inner_classes.iter().flatten() {
                if !inner_classes.iter().any(|global| global.inner == tuple.inner) {
                    inner_classes.push(*tuple);
                }
            }
        }

        let mut kept: Vec<Class> = Vec::with_capacity(classes.len());
        let mut new_indices: Vec<Result<usize, Vec<u8>>> = Vec::with_capacity(classes.len());
        for pending in classes {
            let PendingClass { converted, bytes } = pending;
            let ConvertedClass {
                mut class,
                declared_inner_classes,
            } = converted;
            let local = class.referenced_classes(&pool).and_then(|referenced| {
                local_inner_classes(
                    class.this_class,
                    declared_inner_classes.as_deref(),
                    &inner_classes,
                    &referenced,
                )
            });
            match local {
                Ok(local) => {
                    class.inner_classes = local;
                    kept.push(class);
                    new_indices.push(Ok(kept.len() - 1));
                }
                Err(err) if can_pass(settings, &err) => {
                    log::debug!(
                        "Passing {} through as a plain file: {}",
                        pool.class_name(class.this_class),
                        err
                    );
                    new_indices.push(Err(bytes));
                }
                Err(err) => return Err(err),
            }
        }

        let mut new_indices: Vec<Option<Result<usize, Vec<u8>>>> =
            new_indices.into_iter().map(Some).collect();
        for file in &mut files {
            if let FileContents::Class(index) = file.contents {
                file.contents = match new_indices[index].take() {
                    Some(Ok(index)) => FileContents::Class(index),
                    Some(Err(bytes)) => FileContents::Bytes(bytes),
                    None => return Err(Error::format("class file listed twice")),
                };
            }
        }

        if settings.modification_time == ModificationTime::Latest {
            let latest = files.iter().map(|file| file.modtime).max().unwrap_or(0);
            for file in &mut files {
                file.modtime = latest;
            }
        }

        log::info!(
            "Packing {} classes and {} files ({} inner classes)",
            kept.len(),
            files.len(),
            inner_classes.len()
        );
        Ok(Segment {
            pool,
            inner_classes,
            classes: kept,
            files,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::class_file::{ClassAccessFlags, InnerClassAccessFlags, Version};
    use crate::model::resolve_inner_classes;

    type Tuple<'a> = (&'a str, Option<&'a str>, Option<&'a str>);

    /// Class file whose `InnerClasses` attribute lists `tuples` in that order
    fn class_with_inner_classes(name: &str, tuples: &[Tuple]) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let mut inner_classes = vec![];
        for (inner, outer, simple) in tuples {
            let inner = pool.class(inner);
            let outer = outer.map(|outer| pool.class(outer));
            let name = simple.map(|simple| pool.utf8(simple));
            inner_classes.push(InnerClass {
                inner,
                outer,
                name,
                flags: InnerClassAccessFlags::STATIC,
            });
        }
        let class = Class {
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class: pool.class(name),
            super_class: Some(pool.class("java/lang/Object")),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            inner_classes: Some(inner_classes),
        };
        class.to_class_file(&pool, &[]).unwrap().to_bytes().unwrap()
    }

    #[test]
    fn outer_classes_set_the_inner_class_order() {
        let inner = ("p/A$Inner", Some("p/A"), Some("Inner"));
        let nested = ("p/A$Nested", Some("p/A"), Some("Nested"));
        let anonymous = ("p/A$1", None, None);
        let entries = [
            ("p/A$Nested", vec![nested, inner]),
            ("p/A$1", vec![anonymous, inner]),
            ("p/A$Inner", vec![inner]),
            ("p/A", vec![inner, nested, anonymous]),
        ];

        let settings = PackSettings::default();
        let mut builder = SegmentBuilder::new(&settings);
        for (name, tuples) in &entries {
            let bytes = class_with_inner_classes(name, tuples);
            builder.add_file(&format!("{}.class", name), bytes, 0, false).unwrap();
        }
        let segment = builder.finish().unwrap();
        assert_eq!(segment.classes.len(), 4);
        assert!(segment
            .files
            .iter()
            .all(|file| matches!(file.contents, FileContents::Class(_))));

        let pool = &segment.pool;
        for (name, tuples) in &entries {
            let class = segment
                .classes
                .iter()
                .find(|class| class.name(pool) == *name)
                .unwrap();
            let referenced = class.referenced_classes(pool).unwrap();
            let resolved: Vec<&str> = resolve_inner_classes(class, &segment.inner_classes, &referenced)
                .iter()
                .map(|tuple| pool.class_name(tuple.inner))
                .collect();
            let declared: Vec<&str> = tuples.iter().map(|(inner, _, _)| *inner).collect();
            assert_eq!(resolved, declared, "{}", name);
        }
    }

    #[test]
    fn plain_files_and_broken_classes() {
        let settings = PackSettings::default();
        let mut builder = SegmentBuilder::new(&settings);
        assert!(builder.is_empty());
        builder
            .add_file("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec(), 10, true)
            .unwrap();
        builder
            .add_file("Broken.class", vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0], 20, false)
            .unwrap();
        builder.add_file("NotAClass.class", b"text".to_vec(), 30, false).unwrap();
        assert_eq!(builder.input_size(), 20 + 22 + 12 + 6 + 15 + 4);

        let segment = builder.finish().unwrap();
        assert!(segment.classes.is_empty());
        assert_eq!(segment.files.len(), 3);
        assert_eq!(
            segment.files[1].contents,
            FileContents::Bytes(vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0])
        );
        assert!(segment.files[0].deflate);
    }

    #[test]
    fn broken_class_fails_with_error_action() {
        let settings = PackSettings {
            unknown_attribute: UnknownAttributeAction::Error,
            ..PackSettings::default()
        };
        let mut builder = SegmentBuilder::new(&settings);
        assert!(builder
            .add_file("Broken.class", vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0], 20, false)
            .is_err());
    }

    #[test]
    fn latest_modification_time() {
        let settings = PackSettings {
            modification_time: ModificationTime::Latest,
            ..PackSettings::default()
        };
        let mut builder = SegmentBuilder::new(&settings);
        builder.add_file("a", vec![1], 10, false).unwrap();
        builder.add_file("b", vec![2], 40, false).unwrap();
        let segment = builder.finish().unwrap();
        assert!(segment.files.iter().all(|file| file.modtime == 40));
    }
}
