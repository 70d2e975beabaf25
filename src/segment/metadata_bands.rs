//! Bands of the annotation attributes
//!
//! Each metadata attribute of each context (`class_RVA`, `method_AD`, ...) has its own group of
//! bands. Values are laid out depth first, and element values reached through an array or a
//! nested annotation are counted in the `attr_calls` band of the context.

use crate::codec::{capacity_for, BandReader, BandWriter, Coding};
use crate::cp::ConstantPool;
use crate::errors::Error;
use crate::model::{is_int_tag, Annotation, ElementValue};
use std::io::Read;
use std::vec;

/// Deepest nesting of arrays and annotations rebuilt from the bands
const MAX_NESTING: usize = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Metadata {
    /// `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations`
    Annotations,

    /// `RuntimeVisibleParameterAnnotations` or `RuntimeInvisibleParameterAnnotations`
    ParameterAnnotations,
    AnnotationDefault,
}

/// Values of one group of metadata bands, collected attribute by attribute
#[derive(Default)]
pub struct MetadataWriter {
    calls: Vec<usize>,
    params: Vec<usize>,
    annos: Vec<usize>,
    types: Vec<usize>,
    pairs: Vec<usize>,
    names: Vec<usize>,
    tags: Vec<i32>,
    ints: Vec<usize>,
    doubles: Vec<usize>,
    floats: Vec<usize>,
    longs: Vec<usize>,
    classes: Vec<usize>,
    enum_types: Vec<usize>,
    enum_names: Vec<usize>,
    strings: Vec<usize>,
    array_lengths: Vec<usize>,
    nest_types: Vec<usize>,
    nest_pairs: Vec<usize>,
    nest_names: Vec<usize>,
}

impl MetadataWriter {
    pub fn new() -> MetadataWriter {
        MetadataWriter::default()
    }

    pub fn annotations(&mut self, annotations: &[Annotation]) {
        let mut calls = 0;
        self.annotation_list(annotations, &mut calls);
        self.calls.push(calls);
    }

    pub fn parameter_annotations(&mut self, parameters: &[Vec<Annotation>]) {
        let mut calls = 0;
        self.params.push(parameters.len());
        for annotations in parameters {
            self.annotation_list(annotations, &mut calls);
        }
        self.calls.push(calls);
    }

    pub fn default_value(&mut self, value: &ElementValue) {
        let mut calls = 0;
        self.value(value, &mut calls);
        self.calls.push(calls);
    }

    /// Element values of each attribute reached through arrays or nested annotations
    pub fn calls(&self) -> &[usize] {
        &self.calls
    }

    fn annotation_list(&mut self, annotations: &[Annotation], calls: &mut usize) {
        self.annos.push(annotations.len());
        for annotation in annotations {
            self.types.push(annotation.descriptor.index());
            self.pairs.push(annotation.pairs.len());
            for (name, value) in &annotation.pairs {
                self.names.push(name.index());
                self.value(value, calls);
            }
        }
    }

    fn value(&mut self, value: &ElementValue, calls: &mut usize) {
        self.tags.push(value.tag() as i32);
        match value {
            ElementValue::Int { value, .. } => self.ints.push(value.index()),
            ElementValue::Float(id) => self.floats.push(id.index()),
            ElementValue::Long(id) => self.longs.push(id.index()),
            ElementValue::Double(id) => self.doubles.push(id.index()),
            ElementValue::String(utf8) => self.strings.push(utf8.index()),
            ElementValue::Enum { descriptor, name } => {
                self.enum_types.push(descriptor.index());
                self.enum_names.push(name.index());
            }
            ElementValue::Class(signature) => self.classes.push(signature.index()),
            ElementValue::Annotation(annotation) => {
                self.nest_types.push(annotation.descriptor.index());
                self.nest_pairs.push(annotation.pairs.len());
                *calls += annotation.pairs.len();
                for (name, value) in &annotation.pairs {
                    self.nest_names.push(name.index());
                    self.value(value, calls);
                }
            }
            ElementValue::Array(values) => {
                self.array_lengths.push(values.len());
                *calls += values.len();
                for value in values {
                    self.value(value, calls);
                }
            }
        }
    }

    /// Write the bands, named after `prefix` (for instance `field_RIA`)
    pub fn write(&self, writer: &mut BandWriter, prefix: &str) -> Result<(), Error> {
        let band = |name: &str| format!("{}_{}", prefix, name);
        writer.write_indices(&band("param_NB"), Coding::BYTE1, &self.params)?;
        writer.write_indices(&band("anno_N"), Coding::UNSIGNED5, &self.annos)?;
        writer.write_indices(&band("type_RS"), Coding::UNSIGNED5, &self.types)?;
        writer.write_indices(&band("pair_N"), Coding::UNSIGNED5, &self.pairs)?;
        writer.write_indices(&band("name_RU"), Coding::UNSIGNED5, &self.names)?;
        writer.write_band(&band("T"), Coding::BYTE1, &self.tags)?;
        writer.write_indices(&band("caseI_KI"), Coding::UNSIGNED5, &self.ints)?;
        writer.write_indices(&band("caseD_KD"), Coding::UNSIGNED5, &self.doubles)?;
        writer.write_indices(&band("caseF_KF"), Coding::UNSIGNED5, &self.floats)?;
        writer.write_indices(&band("caseJ_KJ"), Coding::UNSIGNED5, &self.longs)?;
        writer.write_indices(&band("casec_RS"), Coding::UNSIGNED5, &self.classes)?;
        writer.write_indices(&band("caseet_RS"), Coding::UNSIGNED5, &self.enum_types)?;
        writer.write_indices(&band("caseec_RU"), Coding::UNSIGNED5, &self.enum_names)?;
        writer.write_indices(&band("cases_RU"), Coding::UNSIGNED5, &self.strings)?;
        writer.write_indices(&band("casearray_N"), Coding::UNSIGNED5, &self.array_lengths)?;
        writer.write_indices(&band("nesttype_RS"), Coding::UNSIGNED5, &self.nest_types)?;
        writer.write_indices(&band("nestpair_N"), Coding::UNSIGNED5, &self.nest_pairs)?;
        writer.write_indices(&band("nestname_RU"), Coding::UNSIGNED5, &self.nest_names)?;
        Ok(())
    }
}

/// Band values of one group of metadata bands, handed out attribute by attribute
pub struct MetadataReader {
    prefix: String,
    params: vec::IntoIter<usize>,
    annos: vec::IntoIter<usize>,
    types: vec::IntoIter<i32>,
    pairs: vec::IntoIter<usize>,
    names: vec::IntoIter<i32>,
    tags: vec::IntoIter<i32>,
    ints: vec::IntoIter<i32>,
    doubles: vec::IntoIter<i32>,
    floats: vec::IntoIter<i32>,
    longs: vec::IntoIter<i32>,
    classes: vec::IntoIter<i32>,
    enum_types: vec::IntoIter<i32>,
    enum_names: vec::IntoIter<i32>,
    strings: vec::IntoIter<i32>,
    array_lengths: vec::IntoIter<usize>,
    nest_types: vec::IntoIter<i32>,
    nest_pairs: vec::IntoIter<usize>,
    nest_names: vec::IntoIter<i32>,
}

/// Read the bands of `count` attributes, which make `calls` nested element values in total
pub fn read<R: Read>(
    reader: &mut BandReader<R>,
    prefix: &str,
    metadata: Metadata,
    count: usize,
    calls: usize,
) -> Result<MetadataReader, Error> {
    let band = |name: &str| format!("{}_{}", prefix, name);

    let params = match metadata {
        Metadata::ParameterAnnotations => {
            reader.read_counts(&band("param_NB"), Coding::BYTE1, count)?
        }
        _ => vec![],
    };
    let anno_count = match metadata {
        Metadata::Annotations => count,
        Metadata::ParameterAnnotations => params.iter().sum(),
        Metadata::AnnotationDefault => 0,
    };
    let annos = reader.read_counts(&band("anno_N"), Coding::UNSIGNED5, anno_count)?;
    let type_count = annos.iter().sum();
    let types = reader.read_band(&band("type_RS"), Coding::UNSIGNED5, type_count)?;
    let pairs = reader.read_counts(&band("pair_N"), Coding::UNSIGNED5, type_count)?;
    let pair_count = pairs.iter().sum();
    let names = reader.read_band(&band("name_RU"), Coding::UNSIGNED5, pair_count)?;

    let outer_values = match metadata {
        Metadata::AnnotationDefault => count,
        _ => pair_count,
    };
    let value_count = outer_values
        .checked_add(calls)
        .ok_or_else(|| Error::format(format!("too many element values in {}", prefix)))?;
    let tags = reader.read_band(&band("T"), Coding::BYTE1, value_count)?;
    let mut tag_counts = TagCounts::default();
    for tag in &tags {
        tag_counts.add(*tag as u8, prefix)?;
    }

    let ints = reader.read_band(&band("caseI_KI"), Coding::UNSIGNED5, tag_counts.ints)?;
    let doubles = reader.read_band(&band("caseD_KD"), Coding::UNSIGNED5, tag_counts.doubles)?;
    let floats = reader.read_band(&band("caseF_KF"), Coding::UNSIGNED5, tag_counts.floats)?;
    let longs = reader.read_band(&band("caseJ_KJ"), Coding::UNSIGNED5, tag_counts.longs)?;
    let classes = reader.read_band(&band("casec_RS"), Coding::UNSIGNED5, tag_counts.classes)?;
    let enum_types = reader.read_band(&band("caseet_RS"), Coding::UNSIGNED5, tag_counts.enums)?;
    let enum_names = reader.read_band(&band("caseec_RU"), Coding::UNSIGNED5, tag_counts.enums)?;
    let strings = reader.read_band(&band("cases_RU"), Coding::UNSIGNED5, tag_counts.strings)?;
    let array_lengths =
        reader.read_counts(&band("casearray_N"), Coding::UNSIGNED5, tag_counts.arrays)?;
    let nest_types =
        reader.read_band(&band("nesttype_RS"), Coding::UNSIGNED5, tag_counts.annotations)?;
    let nest_pairs =
        reader.read_counts(&band("nestpair_N"), Coding::UNSIGNED5, tag_counts.annotations)?;
    let nest_pair_count = nest_pairs.iter().sum();
    let nest_names = reader.read_band(&band("nestname_RU"), Coding::UNSIGNED5, nest_pair_count)?;

    let nested = array_lengths
        .iter()
        .sum::<usize>()
        .checked_add(nest_pair_count);
    if nested != Some(calls) {
        return Err(Error::format(format!(
            "{}_attr_calls counts {} nested element values, but the bands hold {:?}",
            prefix, calls, nested
        )));
    }

    Ok(MetadataReader {
        prefix: prefix.to_owned(),
        params: params.into_iter(),
        annos: annos.into_iter(),
        types: types.into_iter(),
        pairs: pairs.into_iter(),
        names: names.into_iter(),
        tags: tags.into_iter(),
        ints: ints.into_iter(),
        doubles: doubles.into_iter(),
        floats: floats.into_iter(),
        longs: longs.into_iter(),
        classes: classes.into_iter(),
        enum_types: enum_types.into_iter(),
        enum_names: enum_names.into_iter(),
        strings: strings.into_iter(),
        array_lengths: array_lengths.into_iter(),
        nest_types: nest_types.into_iter(),
        nest_pairs: nest_pairs.into_iter(),
        nest_names: nest_names.into_iter(),
    })
}

/// Number of values of each case band, from the tags
#[derive(Default)]
struct TagCounts {
    ints: usize,
    doubles: usize,
    floats: usize,
    longs: usize,
    classes: usize,
    enums: usize,
    strings: usize,
    arrays: usize,
    annotations: usize,
}

impl TagCounts {
    fn add(&mut self, tag: u8, prefix: &str) -> Result<(), Error> {
        let count = match tag {
            tag if is_int_tag(tag) => &mut self.ints,
            b'D' => &mut self.doubles,
            b'F' => &mut self.floats,
            b'J' => &mut self.longs,
            b'c' => &mut self.classes,
            b'e' => &mut self.enums,
            b's' => &mut self.strings,
            b'[' => &mut self.arrays,
            b'@' => &mut self.annotations,
            other => {
                return Err(Error::format(format!(
                    "unknown element value tag {} in {}_T",
                    other, prefix
                )))
            }
        };
        *count += 1;
        Ok(())
    }
}

impl MetadataReader {
    fn band(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    /// Next `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations`
    pub fn annotations(&mut self, pool: &ConstantPool) -> Result<Vec<Annotation>, Error> {
        let count = self.annos.next().unwrap_or_default();
        let mut annotations = Vec::with_capacity(capacity_for(count));
        for _ in 0..count {
            let descriptor = self.types.next().unwrap_or_default();
            let descriptor = pool.signature_id(&self.band("type_RS"), descriptor)?;
            let pair_count = self.pairs.next().unwrap_or_default();
            let mut pairs = Vec::with_capacity(capacity_for(pair_count));
            for _ in 0..pair_count {
                let name = self.names.next().unwrap_or_default();
                let name = pool.utf8_id(&self.band("name_RU"), name)?;
                pairs.push((name, self.value(pool, 0)?));
            }
            annotations.push(Annotation { descriptor, pairs });
        }
        Ok(annotations)
    }

    pub fn parameter_annotations(
        &mut self,
        pool: &ConstantPool,
    ) -> Result<Vec<Vec<Annotation>>, Error> {
        let count = self.params.next().unwrap_or_default();
        (0..count).map(|_| self.annotations(pool)).collect()
    }

    pub fn default_value(&mut self, pool: &ConstantPool) -> Result<ElementValue, Error> {
        self.value(pool, 0)
    }

    fn value(&mut self, pool: &ConstantPool, depth: usize) -> Result<ElementValue, Error> {
        if depth > MAX_NESTING {
            return Err(Error::format(format!(
                "element values in {} nested too deeply",
                self.prefix
            )));
        }
        let tag = self.tags.next().unwrap_or_default() as u8;
        Ok(match tag {
            tag if is_int_tag(tag) => {
                let value = self.ints.next().unwrap_or_default();
                ElementValue::Int {
                    tag,
                    value: pool.int_id(&self.band("caseI_KI"), value)?,
                }
            }
            b'D' => {
                let value = self.doubles.next().unwrap_or_default();
                ElementValue::Double(pool.double_id(&self.band("caseD_KD"), value)?)
            }
            b'F' => {
                let value = self.floats.next().unwrap_or_default();
                ElementValue::Float(pool.float_id(&self.band("caseF_KF"), value)?)
            }
            b'J' => {
                let value = self.longs.next().unwrap_or_default();
                ElementValue::Long(pool.long_id(&self.band("caseJ_KJ"), value)?)
            }
            b'c' => {
                let value = self.classes.next().unwrap_or_default();
                ElementValue::Class(pool.signature_id(&self.band("casec_RS"), value)?)
            }
            b'e' => {
                let descriptor = self.enum_types.next().unwrap_or_default();
                let name = self.enum_names.next().unwrap_or_default();
                ElementValue::Enum {
                    descriptor: pool.signature_id(&self.band("caseet_RS"), descriptor)?,
                    name: pool.utf8_id(&self.band("caseec_RU"), name)?,
                }
            }
            b's' => {
                let value = self.strings.next().unwrap_or_default();
                ElementValue::String(pool.utf8_id(&self.band("cases_RU"), value)?)
            }
            b'[' => {
                let count = self.array_lengths.next().unwrap_or_default();
                let mut values = Vec::with_capacity(capacity_for(count));
                for _ in 0..count {
                    values.push(self.value(pool, depth + 1)?);
                }
                ElementValue::Array(values)
            }
            b'@' => {
                let descriptor = self.nest_types.next().unwrap_or_default();
                let descriptor = pool.signature_id(&self.band("nesttype_RS"), descriptor)?;
                let pair_count = self.nest_pairs.next().unwrap_or_default();
                let mut pairs = Vec::with_capacity(capacity_for(pair_count));
                for _ in 0..pair_count {
                    let name = self.nest_names.next().unwrap_or_default();
                    let name = pool.utf8_id(&self.band("nestname_RU"), name)?;
                    pairs.push((name, self.value(pool, depth + 1)?));
                }
                ElementValue::Annotation(Annotation { descriptor, pairs })
            }
            other => {
                return Err(Error::format(format!(
                    "missing element value in {}_T (tag {})",
                    self.prefix, other
                )))
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::FormatError;
    use std::io::Cursor;

    fn round_trip(writer: &MetadataWriter, metadata: Metadata, count: usize) -> MetadataReader {
        let mut bands = BandWriter::new();
        writer.write(&mut bands, "method_RVA").unwrap();
        let mut reader = BandReader::new(Cursor::new(bands.bands().to_vec()));
        reader.set_band_headers(bands.band_headers().to_vec());
        let calls = writer.calls().iter().sum();
        read(&mut reader, "method_RVA", metadata, count, calls).unwrap()
    }

    fn sample(pool: &mut ConstantPool) -> Vec<Annotation> {
        // @Marker(value = {1, 2}, inner = @Inner(kind = Kind.A, type = String.class), name = "x")
        let inner = Annotation {
            descriptor: pool.signature("Lpkg/Inner;"),
            pairs: vec![
                (
                    pool.utf8("kind"),
                    ElementValue::Enum {
                        descriptor: pool.signature("Lpkg/Kind;"),
                        name: pool.utf8("A"),
                    },
                ),
                (
                    pool.utf8("type"),
                    ElementValue::Class(pool.signature("Ljava/lang/String;")),
                ),
            ],
        };
        vec![Annotation {
            descriptor: pool.signature("Lpkg/Marker;"),
            pairs: vec![
                (
                    pool.utf8("value"),
                    ElementValue::Array(vec![
                        ElementValue::Int {
                            tag: b'I',
                            value: pool.int(1),
                        },
                        ElementValue::Long(pool.long(2)),
                    ]),
                ),
                (pool.utf8("inner"), ElementValue::Annotation(inner)),
                (pool.utf8("name"), ElementValue::String(pool.utf8("x"))),
            ],
        }]
    }

    #[test]
    fn nested_values_are_calls() {
        let mut pool = ConstantPool::new();
        let annotations = sample(&mut pool);
        let mut writer = MetadataWriter::new();
        writer.annotations(&annotations);
        writer.annotations(&[]);

        // two array elements and two pairs of the nested annotation
        assert_eq!(writer.calls(), &[4, 0]);

        let mut reader = round_trip(&writer, Metadata::Annotations, 2);
        assert_eq!(reader.annotations(&pool).unwrap(), annotations);
        assert_eq!(reader.annotations(&pool).unwrap(), vec![]);
    }

    #[test]
    fn parameters_and_defaults() {
        let mut pool = ConstantPool::new();
        let annotations = sample(&mut pool);
        let parameters = vec![vec![], annotations];
        let mut writer = MetadataWriter::new();
        writer.parameter_annotations(&parameters);
        let mut reader = round_trip(&writer, Metadata::ParameterAnnotations, 1);
        assert_eq!(reader.parameter_annotations(&pool).unwrap(), parameters);

        let default = ElementValue::Array(vec![ElementValue::Double(pool.double(0))]);
        let mut writer = MetadataWriter::new();
        writer.default_value(&default);
        assert_eq!(writer.calls(), &[1]);
        let mut reader = round_trip(&writer, Metadata::AnnotationDefault, 1);
        assert_eq!(reader.default_value(&pool).unwrap(), default);
    }

    #[test]
    fn calls_must_match_the_values() {
        let mut pool = ConstantPool::new();
        let mut writer = MetadataWriter::new();
        writer.annotations(&sample(&mut pool));

        let mut bands = BandWriter::new();
        writer.write(&mut bands, "class_RIA").unwrap();
        let mut reader = BandReader::new(Cursor::new(bands.bands().to_vec()));
        reader.set_band_headers(bands.band_headers().to_vec());
        assert!(matches!(
            read(&mut reader, "class_RIA", Metadata::Annotations, 1, 3),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn deeply_nested_arrays() {
        let pool = ConstantPool::new();
        let depth = MAX_NESTING + 2;
        let mut bands = BandWriter::new();
        bands
            .write_band("method_AD_T", Coding::BYTE1, &vec![b'[' as i32; depth])
            .unwrap();
        // each array holds the next one, and the innermost one is empty
        let mut lengths = vec![1; depth - 1];
        lengths.push(0);
        bands
            .write_indices("method_AD_casearray_N", Coding::UNSIGNED5, &lengths)
            .unwrap();
        let mut reader = BandReader::new(Cursor::new(bands.bands().to_vec()));
        reader.set_band_headers(bands.band_headers().to_vec());

        let mut values =
            read(&mut reader, "method_AD", Metadata::AnnotationDefault, 1, depth - 1).unwrap();
        assert!(matches!(
            values.default_value(&pool),
            Err(Error::Format(FormatError::Other(_)))
        ));
    }
}
