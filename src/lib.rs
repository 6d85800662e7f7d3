//! # Windows Registry Hive Reader
//!
//! A read-only Windows registry hive (REGF) parser with corruption-tolerant
//! traversal.
//!
//! ## Features
//!
//! - **Fast parsing**: Memory-mapped I/O for efficient access
//! - **Lazy evaluation**: Sub-keys are walked on first enumeration; value
//!   records are parsed on first access and cached
//! - **Corruption tolerance**: References pointing outside every hive bin
//!   are dropped and reported instead of failing the whole key
//! - **Type-safe**: Strong typing for registry values and structures
//!
//! ## Architecture
//!
//! The reader is built on several layers:
//!
//! 1. **Base Block (Header)**: Contains hive metadata and root key offset
//! 2. **Hive Bins (hbin)**: 4KB-aligned blocks containing cells; the bin
//!    index doubles as the validity probe for referenced offsets
//! 3. **Cell Source**: Maps 32-bit cell offsets to bounds-checked payloads
//! 4. **Key Items (nk)**: Registry keys with class name, security
//!    descriptor, and a lazy value list
//! 5. **Sub-key Indexes (lf/lh/li/ri)**: Walked recursively into deferred
//!    child descriptors
//! 6. **Value Keys (vk)**: Registry values with typed data
//!
//! ## Binary Layout
//!
//! Registry hives follow this structure:
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Version, timestamps, root offset
//!   - Checksum
//!
//! [Hive Bins - variable size, 4KB aligned]
//!   [Hbin Header - 32 bytes]
//!     - Signature: "hbin"
//!     - Offset, size
//!
//!   [Cells - variable size]
//!     [Cell Size - 4 bytes, negative if allocated]
//!     [Cell Data]
//!       - Key nodes (nk)
//!       - Value keys (vk)
//!       - Subkey lists (lf/lh/li/ri)
//!       - Security descriptors (sk)
//! ```
//!
//! ## Examples
//!
//! ### Basic Usage
//!
//! ```no_run
//! use regf_reader::Hive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Open a registry hive
//! let hive = Hive::open("SYSTEM")?;
//!
//! // Get the root key
//! let mut root = hive.root_key()?;
//! println!("Root key: {}", root.name()?);
//!
//! // Enumerate subkeys
//! for subkey in root.subkeys()? {
//!     println!("  Subkey: {}", subkey.name()?);
//! }
//!
//! // Enumerate values
//! for value in root.values()? {
//!     println!("  Value: {} = {}", value.name(), value.data()?.to_string());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Looking Up Keys by Name
//!
//! ```no_run
//! use regf_reader::{Hive, ValueData};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open("SOFTWARE")?;
//! let mut root = hive.root_key()?;
//!
//! // Lookup uses the stored name hashes to skip non-matching keys
//! let microsoft_key = root.subkey("Microsoft")?;
//!
//! match microsoft_key.value("SomeValue")?.data()? {
//!     ValueData::String(s) => println!("String value: {}", s),
//!     ValueData::Dword(d) => println!("DWORD value: {}", d),
//!     _ => println!("Other type"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Damaged Hives
//!
//! A reference that points outside every hive bin does not fail the key
//! that carries it: the affected sub-key or value entry is dropped, the key
//! reports [`Key::is_corrupted`](hive::Key::is_corrupted), and everything
//! readable stays readable. Malformed records themselves (bad signatures,
//! truncated cells) are hard errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigdata;
pub mod cell_source;
pub mod codepage;
pub mod error;
pub mod hbin;
pub mod header;
pub mod hive;
pub mod key;
pub mod key_item;
pub mod security;
pub mod subkey_list;
pub mod tree;
pub mod utils;
pub mod value;
pub mod value_list;

// Re-export main types for convenience
pub use cell_source::{Cell, CellSource};
pub use codepage::CodePage;
pub use error::{Health, RegistryError, Result};
pub use hbin::{BinIndex, HbinHeader};
pub use header::BaseBlock;
pub use hive::{Hive, Key, RegistryValue};
pub use key::{name_hash, KeyNode, KeyNodeFlags};
pub use key_item::KeyItem;
pub use security::SecurityKey;
pub use subkey_list::{SubkeyEntry, SubkeyList, SubkeyListKind};
pub use tree::{SubNode, TreeNode};
pub use value::{ValueData, ValueKey, ValueType};
pub use value_list::{ValueCache, ValueList, MAXIMUM_CACHE_ENTRIES_VALUES};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
