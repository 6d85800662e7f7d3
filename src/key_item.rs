//! Key items: full hydration of a single registry key.
//!
//! A key item owns everything directly attached to one key node: the
//! decoded nk record, the class name, the security descriptor, and the
//! list of value-record offsets with its cache. Sub-keys are deliberately
//! NOT owned here - the item only registers where their index lives on the
//! [`TreeNode`] and walks it on demand, appending deferred descriptors.
//!
//! Damage policy: a bad nk, sk, or index signature is fatal (nothing useful
//! can be built from it), while references that point outside every hive
//! bin are advisory - the entry is dropped, the item is marked corrupted,
//! and the operation still succeeds.

use crate::cell_source::CellSource;
use crate::codepage::CodePage;
use crate::error::{Health, RegistryError, Result};
use crate::key::KeyNode;
use crate::security::SecurityKey;
use crate::subkey_list::SubkeyList;
use crate::tree::TreeNode;
use crate::utils::{read_u32_le, NO_OFFSET};
use crate::value_list::{ValueCache, ValueList};
use tracing::{debug, warn};

/// Maximum depth of the sub-key index tree this reader will descend.
///
/// The format places no bound on ri nesting; real hives stay in the single
/// digits. A hostile hive that nests deeper is treated as corrupted rather
/// than recursed into.
const MAXIMUM_SUB_KEY_INDEX_DEPTH: u32 = 32;

/// A fully hydrated registry key.
pub struct KeyItem {
    /// Cell offset of the key node.
    offset: u32,

    /// Decoded nk record; `None` until [`KeyItem::read_node_data`] succeeds.
    key_node: Option<KeyNode>,

    /// Raw UTF-16LE class name bytes, if the key has a class name.
    class_name: Option<Vec<u8>>,

    /// Opaque security descriptor bytes, if the key references an sk cell.
    security_descriptor: Option<Vec<u8>>,

    /// Offsets of the key's value records, in on-disk order.
    value_list: ValueList,

    /// Cache of parsed value records for this key.
    value_cache: ValueCache,

    /// Advisory corruption state; sticky once set.
    health: Health,
}

impl KeyItem {
    /// Creates an empty item for the key cell at `offset`.
    pub fn new(offset: u32) -> Self {
        Self {
            offset,
            key_node: None,
            class_name: None,
            security_descriptor: None,
            value_list: ValueList::new(),
            value_cache: ValueCache::new(),
            health: Health::Ok,
        }
    }

    /// Cell offset of this key.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Hydrates the item from its key node cell.
    ///
    /// Reads the nk record, then its class name and security descriptor,
    /// registers the sub-key index on `node` for deferred walking, and
    /// reads the values list. Each phase builds into a local and ownership
    /// moves into the item only when every fallible step has passed, so a
    /// failed call leaves the item empty.
    ///
    /// # Arguments
    ///
    /// * `source` - Cell source of the hive.
    /// * `node` - This key's tree node; receives the sub-nodes range.
    /// * `name_hash` - Hash from the parent's index entry, 0 for the root.
    ///
    /// # Errors
    ///
    /// Fatal if the nk or sk record is malformed, if the class name
    /// overruns its cell, if a non-empty values list is missing or short,
    /// or if the item was already hydrated. Out-of-range value offsets and
    /// an out-of-range sub-key index are advisory: the call succeeds with
    /// [`Health::Corrupted`].
    pub fn read_node_data(
        &mut self,
        source: &CellSource,
        node: &mut TreeNode,
        name_hash: u32,
    ) -> Result<Health> {
        if self.key_node.is_some() {
            return Err(RegistryError::AlreadyInitialized {
                what: "key item",
            });
        }

        let cell = source.get(self.offset)?;
        let key_node = KeyNode::parse(cell.data, self.offset, name_hash)?;

        let class_name = Self::read_class_name(source, &key_node)?;

        let security_descriptor = if key_node.security_offset != NO_OFFSET {
            let sk_cell = source.get(key_node.security_offset)?;
            let security_key = SecurityKey::parse(sk_cell.data, key_node.security_offset)?;
            Some(security_key.into_descriptor())
        } else {
            None
        };

        let mut health = Health::Ok;

        // Sub-keys are never read here: register their index root on the
        // tree node and let enumeration walk it later.
        if key_node.subkey_count > 0 {
            if node.sub_nodes_range_is_set() {
                return Err(RegistryError::AlreadyInitialized {
                    what: "sub-nodes range",
                });
            }
            if source.index_of(key_node.subkey_list_offset).is_some() {
                node.set_sub_nodes_range(key_node.subkey_list_offset)?;
            } else {
                warn!(
                    key_offset = %format!("{:#x}", self.offset),
                    list_offset = %format!("{:#x}", key_node.subkey_list_offset),
                    "Sub-key index offset is outside every hive bin; dropping sub-keys"
                );
                health = Health::Corrupted;
            }
        }

        let (value_list, values_health) = Self::read_values_list(source, &key_node)?;
        health = health.merge(values_health);

        self.key_node = Some(key_node);
        self.class_name = class_name;
        self.security_descriptor = security_descriptor;
        self.value_list = value_list;
        self.value_cache = ValueCache::new();
        self.health = self.health.merge(health);

        Ok(self.health)
    }

    /// Reads the class name referenced by `key_node`, if any.
    ///
    /// `0xFFFFFFFF`, and the legacy `offset == 0 && size == 0` pair, mean
    /// "no class name" and succeed with `None`. Any other reference must
    /// fit its cell; excess cell bytes are padding and ignored.
    fn read_class_name(source: &CellSource, key_node: &KeyNode) -> Result<Option<Vec<u8>>> {
        let offset = key_node.class_name_offset;
        let size = key_node.class_name_length as usize;

        if offset == NO_OFFSET || (offset == 0 && size == 0) {
            return Ok(None);
        }

        let cell = source.get(offset)?;

        if size == 0 || size > cell.size() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: size,
                actual: cell.size(),
            });
        }

        Ok(Some(cell.data[..size].to_vec()))
    }

    /// Reads the values-list cell and registers each value-record offset.
    ///
    /// Offsets that fail the bin-index probe are skipped and reported as
    /// corruption; the loop continues so the readable values survive.
    fn read_values_list(
        source: &CellSource,
        key_node: &KeyNode,
    ) -> Result<(ValueList, Health)> {
        let mut list = ValueList::new();
        let mut health = Health::Ok;

        let count = key_node.value_count as usize;
        if count == 0 {
            return Ok((list, health));
        }

        let list_offset = key_node.value_list_offset;
        if list_offset == 0 || list_offset == NO_OFFSET {
            return Err(RegistryError::InvalidFormat(format!(
                "Key claims {} values but has no values list",
                count
            )));
        }

        let cell = source.get(list_offset)?;

        let needed = count * 4;
        if cell.size() < needed {
            return Err(RegistryError::TruncatedData {
                offset: list_offset,
                expected: needed,
                actual: cell.size(),
            });
        }

        for i in 0..count {
            let value_offset = read_u32_le(cell.data, i * 4)?;
            if source.index_of(value_offset).is_some() {
                list.append(value_offset);
            } else {
                warn!(
                    list_offset = %format!("{:#x}", list_offset),
                    value_offset = %format!("{:#x}", value_offset),
                    "Value record offset is outside every hive bin; skipping entry"
                );
                health = Health::Corrupted;
            }
        }

        Ok((list, health))
    }

    /// Walks the key's sub-key index and appends deferred child
    /// descriptors to `node`, in on-disk order and depth-first through
    /// index roots.
    ///
    /// # Errors
    ///
    /// An unknown index signature or a truncated index cell is fatal and
    /// appends nothing beyond what was already appended. Child offsets that
    /// fail the bin probe, and ri nesting past the depth cap, are advisory:
    /// the walk continues and the result is [`Health::Corrupted`].
    pub fn read_sub_nodes(
        &mut self,
        source: &CellSource,
        node: &mut TreeNode,
    ) -> Result<Health> {
        let walk_health = match node.sub_nodes_range() {
            Some(range_offset) if !node.sub_nodes_are_read() => {
                Self::walk_index(source, node, range_offset, 0)?
            }
            _ => Health::Ok,
        };

        node.mark_sub_nodes_read();
        self.health = self.health.merge(walk_health);
        Ok(self.health)
    }

    fn walk_index(
        source: &CellSource,
        node: &mut TreeNode,
        offset: u32,
        depth: u32,
    ) -> Result<Health> {
        if depth >= MAXIMUM_SUB_KEY_INDEX_DEPTH {
            warn!(
                offset = %format!("{:#x}", offset),
                depth,
                "Sub-key index nesting exceeds supported depth; not descending"
            );
            return Ok(Health::Corrupted);
        }

        let cell = source.get(offset)?;

        // Parsing copies the entries out of the cell. Required: the child
        // lookups below may invalidate the cell borrow.
        let list = SubkeyList::parse(cell.data, offset)?;
        let is_indirect = list.is_index_root();

        let mut health = Health::Ok;
        for entry in &list.entries {
            if source.index_of(entry.offset).is_none() {
                warn!(
                    index_offset = %format!("{:#x}", offset),
                    child_offset = %format!("{:#x}", entry.offset),
                    "Sub-key index entry is outside every hive bin; skipping"
                );
                health = Health::Corrupted;
                continue;
            }

            if is_indirect {
                health = health.merge(Self::walk_index(source, node, entry.offset, depth + 1)?);
            } else {
                node.append_sub_node(entry.offset, entry.name_hash);
            }
        }

        Ok(health)
    }

    /// Returns the decoded key node, if the item has been hydrated.
    pub fn key_node(&self) -> Option<&KeyNode> {
        self.key_node.as_ref()
    }

    /// Returns true if any reference owned by this key was out of range.
    pub fn is_corrupted(&self) -> bool {
        self.health.is_corrupted()
    }

    /// Returns the item's advisory corruption state.
    pub fn health(&self) -> Health {
        self.health
    }

    /// Number of value records reachable through this key.
    ///
    /// Matches the nk record's value count unless the item is corrupted,
    /// in which case unreachable entries have been dropped.
    pub fn number_of_values(&self) -> u32 {
        self.value_list.len() as u32
    }

    /// Number of sub-keys the nk record claims.
    pub fn number_of_sub_keys(&self) -> u32 {
        self.key_node.as_ref().map_or(0, |k| k.subkey_count)
    }

    /// Raw on-disk name bytes (empty before hydration).
    pub fn name_raw(&self) -> &[u8] {
        self.key_node.as_ref().map_or(&[], |k| k.name.as_slice())
    }

    /// Size of the raw name in bytes.
    pub fn name_size(&self) -> usize {
        self.name_raw().len()
    }

    /// Decodes the key name to a string using `codepage` for compressed
    /// names.
    pub fn utf8_name(&self, codepage: CodePage) -> Result<String> {
        match &self.key_node {
            Some(key_node) => key_node.name_utf8(codepage),
            None => Ok(String::new()),
        }
    }

    /// Returns the key name as UTF-16 code units.
    pub fn utf16_name(&self, codepage: CodePage) -> Result<Vec<u16>> {
        match &self.key_node {
            Some(key_node) => key_node.name_utf16(codepage),
            None => Ok(Vec::new()),
        }
    }

    /// Last written timestamp as a raw FILETIME (0 before hydration).
    pub fn last_written_time(&self) -> u64 {
        self.key_node.as_ref().map_or(0, |k| k.last_written)
    }

    /// Last written timestamp as a UTC datetime.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        crate::utils::filetime_to_datetime(self.last_written_time())
    }

    /// Raw UTF-16LE class name bytes, if the key has a class name.
    pub fn class_name(&self) -> Option<&[u8]> {
        self.class_name.as_deref()
    }

    /// Decodes the class name to a string.
    pub fn utf8_class_name(&self) -> Result<Option<String>> {
        self.class_name
            .as_deref()
            .map(|bytes| crate::utils::read_utf16_string(bytes, self.offset))
            .transpose()
    }

    /// Opaque security descriptor bytes, if the key references one.
    pub fn security_descriptor(&self) -> Option<&[u8]> {
        self.security_descriptor.as_deref()
    }

    /// Offsets of this key's value records.
    pub fn value_list(&self) -> &ValueList {
        &self.value_list
    }

    /// Cache of parsed value records for this key.
    pub fn value_cache(&self) -> &ValueCache {
        &self.value_cache
    }

    /// Compares the key name against a UTF-8 candidate.
    ///
    /// Fast path: when both the candidate hash and the stored index hash
    /// are known (non-zero) and differ, the answer is `false` without
    /// decoding the stored name. Otherwise falls through to an
    /// ASCII-case-insensitive comparison of the decoded names.
    pub fn compare_name_with_utf8(
        &self,
        name_hash: u32,
        name: &str,
        codepage: CodePage,
    ) -> Result<bool> {
        let Some(key_node) = &self.key_node else {
            return Ok(false);
        };

        if name_hash != 0 && key_node.name_hash != 0 && name_hash != key_node.name_hash {
            debug!(name, "Name hash mismatch; skipping string comparison");
            return Ok(false);
        }

        let stored = key_node.name_utf8(codepage)?;
        Ok(stored.eq_ignore_ascii_case(name))
    }

    /// Compares the key name against UTF-16 code units, with the same
    /// hash fast path as [`KeyItem::compare_name_with_utf8`].
    pub fn compare_name_with_utf16(
        &self,
        name_hash: u32,
        name: &[u16],
        codepage: CodePage,
    ) -> Result<bool> {
        let Some(key_node) = &self.key_node else {
            return Ok(false);
        };

        if name_hash != 0 && key_node.name_hash != 0 && name_hash != key_node.name_hash {
            return Ok(false);
        }

        let stored = key_node.name_utf16(codepage)?;
        if stored.len() != name.len() {
            return Ok(false);
        }

        Ok(stored
            .iter()
            .zip(name.iter())
            .all(|(&a, &b)| ascii_fold_unit(a) == ascii_fold_unit(b)))
    }

    /// Returns the hash of this key's name.
    ///
    /// Useful for callers that want to seed the comparison fast path.
    pub fn name_hash(&self) -> u32 {
        self.key_node.as_ref().map_or(0, |k| k.name_hash)
    }
}

/// ASCII-only case folding of a UTF-16 code unit.
fn ascii_fold_unit(unit: u16) -> u16 {
    if (b'a' as u16..=b'z' as u16).contains(&unit) {
        unit - 0x20
    } else {
        unit
    }
}
