//! Read-only access to the symbol allocation table.
//!
//! Storage allocation happens before code generation; the backend only asks where a symbol lives.

use rustc_hash::FxHashMap;

/// Where a symbol is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Zero page: fast, and usable as an indirect pointer.
    ZeroPage,
    /// Ordinary memory.
    Memory,
    /// A memory-mapped hardware register at a fixed address.
    MemoryMapped,
    /// A named constant without storage.
    Constant,
}

/// Lookup service for resolved symbols.
///
/// Names are fully qualified, e.g. `main.start.counter`.
pub trait SymbolTable {
    /// Returns the storage class of the symbol, or `None` if it is unknown.
    fn storage_class(&self, name: &str) -> Option<StorageClass>;

    /// Returns the address of the symbol, or `None` if no address has been assigned yet.
    fn resolve(&self, name: &str) -> Option<u16>;

    /// Returns `true` if the symbol lives in fast storage.
    fn is_fast_storage(&self, name: &str) -> bool {
        self.storage_class(name) == Some(StorageClass::ZeroPage)
    }
}

/// A resolved symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub class: StorageClass,
    pub address: Option<u16>,
}

/// A [`SymbolTable`] backed by a hash map.
#[derive(Clone, Debug, Default)]
pub struct StaticSymbolTable {
    symbols: FxHashMap<String, Symbol>,
}

impl StaticSymbolTable {
    /// Creates a new, empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a symbol.
    pub fn insert(&mut self, name: impl Into<String>, class: StorageClass, address: Option<u16>) {
        self.symbols.insert(name.into(), Symbol { class, address });
    }

    /// Builder version of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, class: StorageClass, address: Option<u16>) -> Self {
        self.insert(name, class, address);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolTable for StaticSymbolTable {
    fn storage_class(&self, name: &str) -> Option<StorageClass> {
        self.symbols.get(name).map(|s| s.class)
    }

    fn resolve(&self, name: &str) -> Option<u16> {
        self.symbols.get(name).and_then(|s| s.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let table = StaticSymbolTable::new()
            .with("main.ptr", StorageClass::ZeroPage, Some(0x02))
            .with("main.x", StorageClass::Memory, None)
            .with("main.border", StorageClass::MemoryMapped, Some(0xd020));

        assert_eq!(table.len(), 3);
        assert!(table.is_fast_storage("main.ptr"));
        assert!(!table.is_fast_storage("main.x"));
        assert!(!table.is_fast_storage("main.unknown"));
        assert_eq!(table.resolve("main.border"), Some(0xd020));
        assert_eq!(table.resolve("main.x"), None);
        assert_eq!(table.storage_class("main.x"), Some(StorageClass::Memory));
        assert_eq!(table.storage_class("nope"), None);
    }
}
