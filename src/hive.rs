//! Main registry hive interface.
//!
//! [`Hive`] wires the cell source, the key items, and the lazy tree
//! together behind a small handle-based API: [`Key`] pairs a hydrated
//! [`KeyItem`] with its [`TreeNode`], and [`RegistryValue`] resolves value
//! data on demand.

use crate::bigdata::{assemble_big_data, MAX_DIRECT_DATA_SIZE};
use crate::cell_source::CellSource;
use crate::codepage::CodePage;
use crate::error::{RegistryError, Result};
use crate::header::BaseBlock;
use crate::key::name_hash;
use crate::key_item::KeyItem;
use crate::tree::{SubNode, TreeNode};
use crate::utils::NO_OFFSET;
use crate::value::{ValueData, ValueKey, ValueType};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Main registry hive parser.
///
/// Keys are hydrated on access and their sub-keys stay deferred until
/// enumerated, so opening a hive and reading one key never touches the
/// rest of the tree.
pub struct Hive {
    source: CellSource,
    codepage: CodePage,
}

impl Hive {
    /// Opens a registry hive file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the registry hive file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be opened
    /// - File is not a valid registry hive
    /// - Header is corrupted
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use regf_reader::Hive;
    ///
    /// let hive = Hive::open("SYSTEM").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            source: CellSource::open(path)?,
            codepage: CodePage::default(),
        })
    }

    /// Creates a hive parser from owned hive bytes.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Ok(Self {
            source: CellSource::from_vec(data)?,
            codepage: CodePage::default(),
        })
    }

    /// Sets the code page used to decode compressed key and value names.
    pub fn with_codepage(mut self, codepage: CodePage) -> Self {
        self.codepage = codepage;
        self
    }

    /// Returns the code page used to decode compressed names.
    pub fn codepage(&self) -> CodePage {
        self.codepage
    }

    /// Returns a reference to the base block header.
    pub fn base_block(&self) -> &BaseBlock {
        self.source.base_block()
    }

    /// Returns the cell source backing this hive.
    pub fn cell_source(&self) -> &CellSource {
        &self.source
    }

    /// Returns the root key of the hive.
    ///
    /// # Errors
    ///
    /// Returns an error if the root key cannot be parsed.
    #[instrument(skip(self))]
    pub fn root_key(&self) -> Result<Key<'_>> {
        let offset = self.source.base_block().root_cell_offset;
        debug!(offset = %format!("{:#x}", offset), "Accessing root key");
        self.key_at(offset, 0)
    }

    /// Hydrates the key at a cell offset.
    ///
    /// # Arguments
    ///
    /// * `offset` - Cell offset of the key node (relative to first hbin).
    /// * `name_hash` - Hash from the parent's index entry; 0 when unknown.
    ///
    /// # Errors
    ///
    /// Fatal if the key node (or its security key) is malformed. A key
    /// with out-of-range references hydrates successfully and reports
    /// [`Key::is_corrupted`].
    pub fn key_at(&self, offset: u32, name_hash: u32) -> Result<Key<'_>> {
        let mut node = TreeNode::new(offset, name_hash);
        let mut item = KeyItem::new(offset);
        item.read_node_data(&self.source, &mut node, name_hash)?;

        Ok(Key {
            hive: self,
            node,
            item,
        })
    }
}

/// A hydrated registry key.
///
/// Owns the key's metadata ([`KeyItem`]) and its traversal state
/// ([`TreeNode`]). Sub-keys are walked on first enumeration; values are
/// parsed on first access and cached.
pub struct Key<'a> {
    hive: &'a Hive,
    node: TreeNode,
    item: KeyItem,
}

impl<'a> Key<'a> {
    /// Cell offset of this key (relative to first hbin).
    pub fn offset(&self) -> u32 {
        self.item.offset()
    }

    /// Returns the underlying key item.
    pub fn item(&self) -> &KeyItem {
        &self.item
    }

    /// Returns the key name, decoded with the hive's code page.
    pub fn name(&self) -> Result<String> {
        self.item.utf8_name(self.hive.codepage)
    }

    /// Returns true if any reference owned by this key was out of range.
    ///
    /// A corrupted key is still usable; its value count may underreport
    /// and some sub-keys may be missing.
    pub fn is_corrupted(&self) -> bool {
        self.item.is_corrupted()
    }

    /// Number of sub-keys the key node claims.
    pub fn subkey_count(&self) -> u32 {
        self.item.number_of_sub_keys()
    }

    /// Number of reachable values.
    pub fn value_count(&self) -> u32 {
        self.item.number_of_values()
    }

    /// Last written timestamp as a raw FILETIME.
    pub fn last_written_time(&self) -> u64 {
        self.item.last_written_time()
    }

    /// Last written timestamp as a UTC datetime.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.item.last_written_datetime()
    }

    /// Raw UTF-16LE class name bytes, if the key has a class name.
    pub fn class_name(&self) -> Option<&[u8]> {
        self.item.class_name()
    }

    /// Opaque security descriptor bytes, if the key references one.
    pub fn security_descriptor(&self) -> Option<&[u8]> {
        self.item.security_descriptor()
    }

    /// Returns the deferred sub-key descriptors, walking the sub-key index
    /// on first call.
    ///
    /// # Errors
    ///
    /// Fatal on a malformed index cell. Out-of-range entries are skipped
    /// and surface through [`Key::is_corrupted`] instead.
    pub fn sub_nodes(&mut self) -> Result<&[SubNode]> {
        if !self.node.sub_nodes_are_read() {
            self.item.read_sub_nodes(&self.hive.source, &mut self.node)?;
        }
        Ok(self.node.sub_nodes())
    }

    /// Hydrates and returns all sub-keys, in index order.
    pub fn subkeys(&mut self) -> Result<Vec<Key<'a>>> {
        let sub_nodes: Vec<SubNode> = self.sub_nodes()?.to_vec();

        sub_nodes
            .into_iter()
            .map(|sub| self.hive.key_at(sub.offset, sub.name_hash))
            .collect()
    }

    /// Looks up a sub-key by name (ASCII case-insensitive).
    ///
    /// Children whose name hash differs from the candidate's are rejected
    /// without decoding their names.
    pub fn subkey(&mut self, name: &str) -> Result<Key<'a>> {
        let hash = name_hash(name);
        let sub_nodes: Vec<SubNode> = self.sub_nodes()?.to_vec();

        for sub in sub_nodes {
            let key = self.hive.key_at(sub.offset, sub.name_hash)?;
            if key
                .item
                .compare_name_with_utf8(hash, name, self.hive.codepage)?
            {
                return Ok(key);
            }
        }

        Err(RegistryError::not_found("key", name))
    }

    /// Returns all values of this key, in value-list order.
    pub fn values(&self) -> Result<Vec<RegistryValue<'a>>> {
        (0..self.item.value_list().len())
            .map(|index| self.value_at(index))
            .collect()
    }

    /// Returns the value at `index` in the value list, parsing it on first
    /// access and caching the parsed record.
    pub fn value_at(&self, index: usize) -> Result<RegistryValue<'a>> {
        let offset = self.item.value_list().get(index).ok_or_else(|| {
            RegistryError::not_found("value at index", &index.to_string())
        })?;

        let value_key = match self.item.value_cache().get(offset) {
            Some(cached) => cached,
            None => {
                let cell = self.hive.source.get(offset)?;
                let parsed = Arc::new(ValueKey::parse(cell.data, offset)?);
                self.item.value_cache().insert(offset, Arc::clone(&parsed));
                parsed
            }
        };

        Ok(RegistryValue {
            hive: self.hive,
            value_key,
        })
    }

    /// Gets a specific value by name (ASCII case-insensitive).
    pub fn value(&self, name: &str) -> Result<RegistryValue<'a>> {
        for value in self.values()? {
            if value.value_key.name.eq_ignore_ascii_case(name) {
                return Ok(value);
            }
        }

        Err(RegistryError::not_found("value", name))
    }
}

/// A registry value.
pub struct RegistryValue<'a> {
    hive: &'a Hive,
    value_key: Arc<ValueKey>,
}

impl RegistryValue<'_> {
    /// Returns the value name.
    pub fn name(&self) -> &str {
        &self.value_key.name
    }

    /// Returns the value data type.
    pub fn data_type(&self) -> ValueType {
        self.value_key.data_type
    }

    /// Returns the parsed value data.
    pub fn data(&self) -> Result<ValueData> {
        let raw_data = self.raw_data()?;
        ValueData::parse(
            &raw_data,
            self.value_key.data_type,
            self.value_key.data_offset,
        )
    }

    /// Returns the raw value data as bytes.
    ///
    /// Handles inline data, regular data cells, and big data blocks
    /// (values larger than 16344 bytes, reassembled from segments).
    pub fn raw_data(&self) -> Result<Vec<u8>> {
        let vk = &self.value_key;

        if vk.is_inline_data() {
            return Ok(vk.inline_data());
        }

        if vk.data_length == 0 || vk.data_offset == 0 || vk.data_offset == NO_OFFSET {
            return Ok(Vec::new());
        }

        if vk.data_length > MAX_DIRECT_DATA_SIZE {
            return assemble_big_data(&self.hive.source, vk.data_offset, vk.data_length);
        }

        let cell = self.hive.source.get(vk.data_offset)?;
        let mut data = cell.data.to_vec();

        // Cells are rounded up to allocation granularity; trim the padding
        data.truncate(vk.data_length as usize);
        Ok(data)
    }
}
