//! Android binary XML decoder.
//!
//! The document is a sequence of chunks, each starting with a type, a header size and a total
//! size. The string pool comes first; every name and string value afterwards is an index into it.

use crate::{byte_reader::ByteReader, error::ManifestError};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

const RES_XML_TYPE: u16 = 0x0003;
const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
const RES_XML_CDATA_TYPE: u16 = 0x0104;

const CHUNK_HEADER_LEN: usize = 8;
const NODE_HEADER_LEN: usize = 16;
const STRING_POOL_HEADER_LEN: usize = 28;
const ATTRIBUTE_EXT_LEN: usize = 20;
const ATTRIBUTE_LEN: usize = 20;
const UTF8_FLAG: u32 = 1 << 8;
const NO_ENTRY: u32 = 0xffff_ffff;

const TYPE_REFERENCE: u8 = 0x01;
const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;

/// Maximum element nesting depth.
pub(crate) const MAX_DEPTH: usize = 256;
/// Maximum number of elements in one document.
pub(crate) const MAX_ELEMENTS: usize = 100_000;
/// Maximum number of bytes of decoded text, across the pool and the tree.
pub(crate) const MAX_TEXT_BYTES: usize = 32 * 1024 * 1024;

pub(crate) const ANDROID_NAMESPACE: &str = "http://schemas.android.com/apk/res/android";

/// Names of the framework attributes the decoder knows by resource ID.
///
/// Obfuscated manifests often blank or scramble attribute names, but the platform itself only
/// looks at the resource ID.
fn framework_attribute(id: u32) -> Option<&'static str> {
    match id {
        0x0101_0001 => Some("label"),
        0x0101_0002 => Some("icon"),
        0x0101_0003 => Some("name"),
        0x0101_0006 => Some("permission"),
        0x0101_0009 => Some("protectionLevel"),
        0x0101_000b => Some("sharedUserId"),
        0x0101_000e => Some("enabled"),
        0x0101_000f => Some("debuggable"),
        0x0101_0010 => Some("exported"),
        0x0101_0011 => Some("process"),
        0x0101_020c => Some("minSdkVersion"),
        0x0101_021b => Some("versionCode"),
        0x0101_021c => Some("versionName"),
        0x0101_0270 => Some("targetSdkVersion"),
        0x0101_0271 => Some("maxSdkVersion"),
        0x0101_0280 => Some("allowBackup"),
        _ => None,
    }
}

/// Typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// String value.
    String(String),
    /// Decimal or hexadecimal integer.
    Integer(i64),
    /// Boolean value.
    Boolean(bool),
    /// Resource reference, unresolved.
    Reference(u32),
    /// Any other value type, kept as its raw type tag and data.
    Raw {
        /// Type tag.
        data_type: u8,
        /// Raw data.
        data: u32,
    },
}

impl AttributeValue {
    /// Gets the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Gets the integer value, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Gets the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Reference(r) => write!(f, "@0x{:08x}", r),
            Self::Raw { data_type, data } => {
                write!(f, "0x{:08x} (type 0x{:02x})", data, data_type)
            }
        }
    }
}

/// One element of the decoded tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    name: String,
    attributes: BTreeMap<String, AttributeValue>,
    children: Vec<Element>,
}

impl Element {
    /// Gets the tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets an attribute by its local name, or `prefix:name` for foreign namespaces.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Gets all attributes.
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Gets the children, in document order.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Iterates over the children with the given tag name.
    pub fn children_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Element> + 's {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Running count of decoded text, shared by the pool and the tree.
#[derive(Debug, Default)]
struct TextBudget {
    used: usize,
}

impl TextBudget {
    fn spend(&mut self, bytes: usize) -> Result<(), ManifestError> {
        self.used = self.used.saturating_add(bytes);
        if self.used > MAX_TEXT_BYTES {
            return Err(ManifestError::Malformed(format!(
                "the document decodes to more than {} bytes of text",
                MAX_TEXT_BYTES
            )));
        }
        Ok(())
    }
}

/// Decoded string pool.
#[derive(Debug)]
struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    fn parse(
        chunk: &[u8],
        header_size: usize,
        budget: &mut TextBudget,
    ) -> Result<Self, ManifestError> {
        if header_size < STRING_POOL_HEADER_LEN {
            return Err(ManifestError::Malformed(format!(
                "string pool header is {} bytes long",
                header_size
            )));
        }
        let truncated = || ManifestError::Truncated("the string pool ends early".to_owned());

        let mut header = ByteReader::at(chunk, CHUNK_HEADER_LEN).ok_or_else(truncated)?;
        let string_count = header.u32().ok_or_else(truncated)? as usize;
        let style_count = header.u32().ok_or_else(truncated)?;
        let flags = header.u32().ok_or_else(truncated)?;
        let strings_start = header.u32().ok_or_else(truncated)? as usize;
        let styles_start = header.u32().ok_or_else(truncated)? as usize;

        let offsets_len = string_count.checked_mul(4).ok_or_else(truncated)?;
        let mut offsets = ByteReader::at(chunk, header_size).ok_or_else(truncated)?;
        if offsets.remaining() < offsets_len {
            return Err(truncated());
        }

        let strings_end = if style_count > 0 && styles_start > strings_start {
            styles_start.min(chunk.len())
        } else {
            chunk.len()
        };
        let data = if string_count == 0 {
            &[][..]
        } else {
            chunk.get(strings_start..strings_end).ok_or_else(|| {
                ManifestError::Malformed("string data lies outside its pool".to_owned())
            })?
        };

        let utf8 = flags & UTF8_FLAG != 0;
        let mut strings = Vec::with_capacity(string_count);
        for index in 0..string_count {
            let offset = offsets.u32().ok_or_else(truncated)? as usize;
            let mut reader = ByteReader::at(data, offset).ok_or_else(|| {
                ManifestError::Truncated(format!("string {} starts past its pool", index))
            })?;
            let decoded = if utf8 {
                read_utf8_string(&mut reader)
            } else {
                read_utf16_string(&mut reader)
            }
            .ok_or_else(|| {
                ManifestError::Truncated(format!("string {} extends past its pool", index))
            })?;
            budget.spend(decoded.len())?;
            strings.push(decoded);
        }

        Ok(Self { strings })
    }

    fn get(&self, index: u32) -> Result<&str, ManifestError> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| ManifestError::BadReference {
                index,
                pool_size: self.strings.len(),
            })
    }

    fn get_optional(&self, index: u32) -> Result<Option<&str>, ManifestError> {
        if index == NO_ENTRY {
            Ok(None)
        } else {
            self.get(index).map(Some)
        }
    }
}

fn read_utf8_length(reader: &mut ByteReader<'_>) -> Option<usize> {
    let first = reader.u8()?;
    if first & 0x80 != 0 {
        let second = reader.u8()?;
        Some((usize::from(first & 0x7f) << 8) | usize::from(second))
    } else {
        Some(usize::from(first))
    }
}

fn read_utf8_string(reader: &mut ByteReader<'_>) -> Option<String> {
    let _utf16_len = read_utf8_length(reader)?;
    let len = read_utf8_length(reader)?;
    let bytes = reader.bytes(len)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

fn read_utf16_string(reader: &mut ByteReader<'_>) -> Option<String> {
    let first = reader.u16()?;
    let len = if first & 0x8000 != 0 {
        let second = reader.u16()?;
        (usize::from(first & 0x7fff) << 16) | usize::from(second)
    } else {
        usize::from(first)
    };
    let bytes = reader.bytes(len.checked_mul(2)?)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Some(String::from_utf16_lossy(&units))
}

/// Chunk header plus the whole chunk bytes.
struct Chunk<'a> {
    chunk_type: u16,
    header_size: usize,
    bytes: &'a [u8],
}

fn read_chunk(body: &[u8], offset: usize) -> Result<Chunk<'_>, ManifestError> {
    let mut reader = ByteReader::at(body, offset)
        .ok_or_else(|| ManifestError::Truncated("chunk starts past the document".to_owned()))?;
    let truncated = || {
        ManifestError::Truncated(format!("chunk at offset {} ends early", offset))
    };
    let chunk_type = reader.u16().ok_or_else(truncated)?;
    let header_size = usize::from(reader.u16().ok_or_else(truncated)?);
    let size = reader.u32().ok_or_else(truncated)? as usize;

    if header_size < CHUNK_HEADER_LEN || size < header_size {
        return Err(ManifestError::Malformed(format!(
            "chunk at offset {} declares header size {} and size {}",
            offset, header_size, size
        )));
    }
    let bytes = body
        .get(offset..offset.saturating_add(size))
        .ok_or_else(truncated)?;

    Ok(Chunk {
        chunk_type,
        header_size,
        bytes,
    })
}

/// Walks the chunk stream, building the element tree.
struct TreeBuilder {
    pool: Option<StringPool>,
    resource_ids: Vec<u32>,
    namespaces: HashMap<String, String>,
    stack: Vec<Element>,
    root: Option<Element>,
    elements: usize,
    budget: TextBudget,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            pool: None,
            resource_ids: Vec::new(),
            namespaces: HashMap::new(),
            stack: Vec::new(),
            root: None,
            elements: 0,
            budget: TextBudget::default(),
        }
    }

    fn pool(&self) -> Result<&StringPool, ManifestError> {
        self.pool.as_ref().ok_or_else(|| {
            ManifestError::Malformed("an XML node precedes the string pool".to_owned())
        })
    }

    fn chunk(&mut self, chunk: &Chunk<'_>) -> Result<(), ManifestError> {
        match chunk.chunk_type {
            RES_STRING_POOL_TYPE => {
                if self.pool.is_none() {
                    self.pool = Some(StringPool::parse(
                        chunk.bytes,
                        chunk.header_size,
                        &mut self.budget,
                    )?);
                }
                Ok(())
            }
            RES_XML_RESOURCE_MAP_TYPE => {
                let mut reader = ByteReader::at(chunk.bytes, chunk.header_size)
                    .ok_or_else(|| ManifestError::Truncated("resource map".to_owned()))?;
                self.resource_ids = Vec::with_capacity(reader.remaining() / 4);
                while let Some(id) = reader.u32() {
                    self.resource_ids.push(id);
                }
                Ok(())
            }
            RES_XML_START_NAMESPACE_TYPE => {
                let mut ext = node_extension(chunk)?;
                let prefix = ext.u32().ok_or_else(|| truncated_node("namespace"))?;
                let uri = ext.u32().ok_or_else(|| truncated_node("namespace"))?;
                let pool = self.pool()?;
                let prefix = pool.get_optional(prefix)?.unwrap_or_default().to_owned();
                let uri = pool.get_optional(uri)?.unwrap_or_default().to_owned();
                let _ = self.namespaces.insert(uri, prefix);
                Ok(())
            }
            RES_XML_START_ELEMENT_TYPE => self.start_element(chunk),
            RES_XML_END_ELEMENT_TYPE => self.end_element(chunk),
            RES_XML_END_NAMESPACE_TYPE | RES_XML_CDATA_TYPE => self.pool().map(|_| ()),
            _ => Ok(()),
        }
    }

    fn start_element(&mut self, chunk: &Chunk<'_>) -> Result<(), ManifestError> {
        let mut ext = node_extension(chunk)?;
        let ext_start = ext.position();
        let header = ext
            .bytes(ATTRIBUTE_EXT_LEN)
            .ok_or_else(|| truncated_node("start element"))?;
        let mut header = ByteReader::new(header);
        // Fixed-size extension, every read below is in bounds.
        let _namespace = header.u32().unwrap_or(NO_ENTRY);
        let name = header.u32().unwrap_or(NO_ENTRY);
        let attribute_start = usize::from(header.u16().unwrap_or_default());
        let attribute_size = usize::from(header.u16().unwrap_or_default());
        let attribute_count = usize::from(header.u16().unwrap_or_default());

        if self.stack.len() >= MAX_DEPTH {
            return Err(ManifestError::Malformed(format!(
                "elements are nested deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.elements += 1;
        if self.elements > MAX_ELEMENTS {
            return Err(ManifestError::Malformed(format!(
                "the document has more than {} elements",
                MAX_ELEMENTS
            )));
        }
        if self.stack.is_empty() && self.root.is_some() {
            return Err(ManifestError::Malformed(
                "the document has more than one root element".to_owned(),
            ));
        }
        if attribute_count > 0 && attribute_size < ATTRIBUTE_LEN {
            return Err(ManifestError::Malformed(format!(
                "attributes declare a size of {} bytes",
                attribute_size
            )));
        }

        let name = self.pool()?.get(name)?.to_owned();
        self.budget.spend(name.len())?;

        let mut attributes = BTreeMap::new();
        for i in 0..attribute_count {
            let offset = ext_start + attribute_start + i * attribute_size;
            let raw = chunk
                .bytes
                .get(offset..offset + ATTRIBUTE_LEN)
                .ok_or_else(|| truncated_node("attribute list"))?;
            if let Some((key, value)) = self.attribute(raw)? {
                let _ = attributes.insert(key, value);
            }
        }

        self.stack.push(Element {
            name,
            attributes,
            children: Vec::new(),
        });
        Ok(())
    }

    fn attribute(
        &mut self,
        raw: &[u8],
    ) -> Result<Option<(String, AttributeValue)>, ManifestError> {
        let mut reader = ByteReader::new(raw);
        // Fixed-size record, every read below is in bounds.
        let namespace = reader.u32().unwrap_or(NO_ENTRY);
        let name_index = reader.u32().unwrap_or(NO_ENTRY);
        let raw_value = reader.u32().unwrap_or(NO_ENTRY);
        let _ = reader.skip(3);
        let data_type = reader.u8().unwrap_or_default();
        let data = reader.u32().unwrap_or_default();

        let pool = self.pool()?;
        let string_name = pool.get(name_index)?;
        let local = match self
            .resource_ids
            .get(name_index as usize)
            .and_then(|id| framework_attribute(*id))
        {
            Some(known) => known,
            None if string_name.is_empty() => return Ok(None),
            None => string_name,
        };

        let key = match pool.get_optional(namespace)? {
            None => local.to_owned(),
            Some(uri) if uri == ANDROID_NAMESPACE => local.to_owned(),
            Some(uri) => {
                let prefix = self
                    .namespaces
                    .get(uri)
                    .map(String::as_str)
                    .filter(|p| !p.is_empty())
                    .unwrap_or(uri);
                format!("{}:{}", prefix, local)
            }
        };

        let raw_string = pool.get_optional(raw_value)?;
        let value = match data_type {
            TYPE_STRING => AttributeValue::String(pool.get(data)?.to_owned()),
            TYPE_INT_DEC => AttributeValue::Integer(i64::from(data as i32)),
            TYPE_INT_HEX => AttributeValue::Integer(i64::from(data)),
            TYPE_INT_BOOLEAN => AttributeValue::Boolean(data != 0),
            TYPE_REFERENCE => AttributeValue::Reference(data),
            _ => match raw_string {
                Some(s) => AttributeValue::String(s.to_owned()),
                None => AttributeValue::Raw { data_type, data },
            },
        };

        self.budget.spend(key.len())?;
        if let AttributeValue::String(s) = &value {
            self.budget.spend(s.len())?;
        }
        Ok(Some((key, value)))
    }

    fn end_element(&mut self, chunk: &Chunk<'_>) -> Result<(), ManifestError> {
        let mut ext = node_extension(chunk)?;
        let _namespace = ext.u32().ok_or_else(|| truncated_node("end element"))?;
        let name = ext.u32().ok_or_else(|| truncated_node("end element"))?;
        let name = self.pool()?.get(name)?.to_owned();
        self.budget.spend(name.len())?;

        let element = self.stack.pop().ok_or_else(|| {
            ManifestError::Malformed(format!("</{}> has no matching start tag", name))
        })?;
        if element.name != name {
            return Err(ManifestError::Malformed(format!(
                "</{}> closes <{}>",
                name, element.name
            )));
        }

        match self.stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None => self.root = Some(element),
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Element, ManifestError> {
        if let Some(open) = self.stack.pop() {
            return Err(ManifestError::Malformed(format!(
                "<{}> is never closed",
                open.name
            )));
        }
        self.root.ok_or_else(|| {
            ManifestError::Malformed("the document has no root element".to_owned())
        })
    }
}

fn truncated_node(what: &str) -> ManifestError {
    ManifestError::Truncated(format!("{} chunk ends early", what))
}

/// Gets a reader over the extension of a node chunk, past its line number and comment.
fn node_extension<'a>(chunk: &Chunk<'a>) -> Result<ByteReader<'a>, ManifestError> {
    if chunk.header_size < NODE_HEADER_LEN {
        return Err(ManifestError::Malformed(format!(
            "node header is {} bytes long",
            chunk.header_size
        )));
    }
    ByteReader::at(chunk.bytes, chunk.header_size).ok_or_else(|| truncated_node("node"))
}

/// Decodes a binary XML document into its root element.
pub(crate) fn parse_document(data: &[u8]) -> Result<Element, ManifestError> {
    match ByteReader::new(data).u16() {
        Some(RES_XML_TYPE) => {}
        Some(other) => {
            return Err(ManifestError::Malformed(format!(
                "not a binary XML document (chunk type 0x{:04x})",
                other
            )))
        }
        None => return Err(ManifestError::Truncated("the document is empty".to_owned())),
    }
    let document = read_chunk(data, 0)?;

    let body = &document.bytes[document.header_size..];
    let mut builder = TreeBuilder::new();
    let mut offset = 0;
    while offset < body.len() {
        let chunk = read_chunk(body, offset)?;
        builder.chunk(&chunk)?;
        offset += chunk.bytes.len();
    }

    builder.finish()
}
