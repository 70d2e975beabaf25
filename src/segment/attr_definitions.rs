use crate::codec::{BandReader, Coding};
use crate::cp::ConstantPool;
use crate::errors::Error;
use std::io::Read;

/// Where a defined attribute may appear
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeContext {
    Class,
    Field,
    Method,
    Code,
}

impl AttributeContext {
    fn from_header(header: u8) -> AttributeContext {
        match header & 3 {
            0 => AttributeContext::Class,
            1 => AttributeContext::Field,
            2 => AttributeContext::Method,
            _ => AttributeContext::Code,
        }
    }

    /// Flag bits taken by the predefined attributes this codec transmits
    fn predefined(self) -> &'static [u32] {
        match self {
            AttributeContext::Class => &[17, 18, 19, 20, 21, 22, 23, 24],
            AttributeContext::Field => &[17, 19, 20, 21, 22],
            AttributeContext::Method => &[17, 18, 19, 20, 21, 22, 23, 24, 25],
            AttributeContext::Code => &[0, 1, 2, 3],
        }
    }
}

/// Attribute definition from the segment
///
/// Definitions only matter when a class actually uses the attribute, which then fails on the
/// unknown flag bit, so they are read and checked but not kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub context: AttributeContext,

    /// Flag bit, or `None` for the next free bit
    pub index: Option<u32>,
    pub name: String,
    pub layout: String,
}

pub fn read<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    count: usize,
) -> Result<Vec<AttributeDefinition>, Error> {
    let headers = reader.read_band("attr_definition_headers", Coding::BYTE1, count)?;
    let names = reader.read_band("attr_definition_name", Coding::UNSIGNED5, count)?;
    let layouts = reader.read_band("attr_definition_layout", Coding::UNSIGNED5, count)?;

    let mut definitions = vec![];
    for ((header, name), layout) in headers.into_iter().zip(names).zip(layouts) {
        let header = header as u8;
        let context = AttributeContext::from_header(header);
        let index = match header >> 2 {
            0 => None,
            n => Some(n as u32 - 1),
        };
        let definition = AttributeDefinition {
            context,
            index,
            name: pool.utf8_str(pool.utf8_id("attr_definition_name", name)?).to_owned(),
            layout: pool
                .utf8_str(pool.utf8_id("attr_definition_layout", layout)?)
                .to_owned(),
        };

        if let Some(index) = index {
            if context.predefined().contains(&index) {
                return Err(Error::unsupported(format!(
                    "redefinition of {:?} attribute {} as '{}'",
                    context, index, definition.name
                )));
            }
        }
        log::debug!(
            "Ignoring definition of {:?} attribute '{}' ({})",
            context,
            definition.name,
            definition.layout
        );
        definitions.push(definition);
    }
    Ok(definitions)
}
