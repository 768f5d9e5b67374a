//! In-process key store speaking the same call protocol as ntdll.
//!
//! Names are read back out of the `OBJECT_ATTRIBUTES`/`UNICODE_STRING`
//! structures exactly as the kernel would, access masks are enforced per
//! handle, and failures use the native status codes. `--dry-run` and the test
//! suites run the installer against it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::object_attributes::{CaseSensitivity, ObjectAttributes};
use super::status::{
    STATUS_ACCESS_DENIED, STATUS_CANNOT_DELETE, STATUS_INVALID_HANDLE, STATUS_KEY_DELETED,
    STATUS_OBJECT_NAME_INVALID, STATUS_OBJECT_NAME_NOT_FOUND, STATUS_OBJECT_PATH_NOT_FOUND,
    STATUS_OBJECT_PATH_SYNTAX_BAD, StatusError,
};
use super::unicode::WideString;
use super::{Disposition, KeyAccess, NtRegistry, RawKey, ValueType};

const NAMESPACE_ROOT: usize = 0;
// Kernel handle values are multiples of four; never hand out zero.
const HANDLE_STRIDE: usize = 4;

/// Thread-safe in-memory registry.
pub struct MemoryRegistry {
    state: Mutex<State>,
}

struct State {
    nodes: Vec<Node>,
    handles: HashMap<usize, OpenKey>,
    next_handle: usize,
}

struct Node {
    name: String,
    parent: Option<usize>,
    children: Vec<usize>,
    values: Vec<StoredValue>,
    deleted: bool,
}

struct StoredValue {
    name: String,
    value_type: ValueType,
    data: Vec<u8>,
}

#[derive(Clone, Copy)]
struct OpenKey {
    node: usize,
    access: KeyAccess,
}

impl MemoryRegistry {
    /// An empty namespace: only `\` exists.
    pub fn new() -> Self {
        let state = State {
            nodes: vec![Node::new(String::new(), None)],
            handles: HashMap::new(),
            next_handle: HANDLE_STRIDE,
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// A namespace where `path` and all of its ancestors exist.
    pub fn with_path(path: &str) -> Self {
        let registry = Self::new();
        registry.ensure_path(path);
        registry
    }

    /// Create every missing key along an absolute path.
    pub fn ensure_path(&self, path: &str) {
        let mut state = self.lock();
        let mut node = NAMESPACE_ROOT;
        for component in components(path) {
            node = match state.find_child(node, component, CaseSensitivity::Insensitive) {
                Some(child) => child,
                None => state.add_child(node, component),
            };
        }
    }

    /// Whether a key exists at the absolute `path`.
    pub fn key_exists(&self, path: &str) -> bool {
        let state = self.lock();
        let parts = components(path);
        state
            .walk(NAMESPACE_ROOT, &parts, CaseSensitivity::Insensitive)
            .is_ok()
    }

    /// Number of handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    fn new(name: String, parent: Option<usize>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            values: Vec::new(),
            deleted: false,
        }
    }
}

fn components(path: &str) -> Vec<&str> {
    path.split('\\').filter(|part| !part.is_empty()).collect()
}

fn names_match(stored: &str, wanted: &str, case: CaseSensitivity) -> bool {
    match case {
        CaseSensitivity::Insensitive => stored.to_lowercase() == wanted.to_lowercase(),
        CaseSensitivity::Sensitive => stored == wanted,
    }
}

fn status(code: u32) -> StatusError {
    StatusError::from_code(code)
}

impl State {
    fn find_child(&self, parent: usize, name: &str, case: CaseSensitivity) -> Option<usize> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&child| names_match(&self.nodes[child].name, name, case))
    }

    fn add_child(&mut self, parent: usize, name: &str) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::new(name.to_string(), Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    fn walk(&self, start: usize, parts: &[&str], case: CaseSensitivity) -> Result<usize, StatusError> {
        let mut node = start;
        for (index, part) in parts.iter().enumerate() {
            node = match self.find_child(node, part, case) {
                Some(child) => child,
                None if index + 1 == parts.len() => return Err(status(STATUS_OBJECT_NAME_NOT_FOUND)),
                None => return Err(status(STATUS_OBJECT_PATH_NOT_FOUND)),
            };
        }
        Ok(node)
    }

    fn open(&self, key: RawKey) -> Result<OpenKey, StatusError> {
        let open = self
            .handles
            .get(&(key.as_raw() as usize))
            .copied()
            .ok_or_else(|| status(STATUS_INVALID_HANDLE))?;
        if self.nodes[open.node].deleted {
            return Err(status(STATUS_KEY_DELETED));
        }
        Ok(open)
    }

    fn open_with(&self, key: RawKey, needed: KeyAccess) -> Result<usize, StatusError> {
        let open = self.open(key)?;
        if !open.access.contains(needed) {
            return Err(status(STATUS_ACCESS_DENIED));
        }
        Ok(open.node)
    }

    /// Starting node and path text named by a descriptor.
    fn resolve(&self, attributes: &ObjectAttributes<'_>) -> Result<(usize, String), StatusError> {
        let raw = attributes.as_raw();
        // SAFETY: the descriptor borrows the WideString its name pointer
        // refers to, so the header and its buffer are alive here.
        let wide = unsafe { (*raw.object_name).as_wide() };
        let text = String::from_utf16(wide).map_err(|_| status(STATUS_OBJECT_NAME_INVALID))?;

        let start = match attributes.root() {
            None if text.starts_with('\\') => NAMESPACE_ROOT,
            Some(root) if !text.starts_with('\\') => self.open(root)?.node,
            _ => return Err(status(STATUS_OBJECT_PATH_SYNTAX_BAD)),
        };
        Ok((start, text))
    }

    fn insert_handle(&mut self, node: usize, access: KeyAccess) -> RawKey {
        let id = self.next_handle;
        self.next_handle += HANDLE_STRIDE;
        self.handles.insert(id, OpenKey { node, access });
        RawKey::from_raw(id as *mut std::ffi::c_void)
    }
}

impl NtRegistry for MemoryRegistry {
    fn open_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<RawKey, StatusError> {
        let mut state = self.lock();
        let (start, text) = state.resolve(attributes)?;
        let node = state.walk(start, &components(&text), attributes.case_sensitivity())?;
        Ok(state.insert_handle(node, access))
    }

    fn create_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<(RawKey, Disposition), StatusError> {
        let mut state = self.lock();
        let (start, text) = state.resolve(attributes)?;
        let parts = components(&text);
        let case = attributes.case_sensitivity();

        let Some((leaf, ancestors)) = parts.split_last() else {
            return Err(status(STATUS_OBJECT_NAME_INVALID));
        };
        let parent = match state.walk(start, ancestors, case) {
            Ok(parent) => parent,
            Err(e) if e.is_not_found() => return Err(status(STATUS_OBJECT_PATH_NOT_FOUND)),
            Err(e) => return Err(e),
        };

        if let Some(existing) = state.find_child(parent, leaf, case) {
            return Ok((state.insert_handle(existing, access), Disposition::Opened));
        }

        if let Some(root) = attributes.root() {
            state.open_with(root, KeyAccess::CREATE_SUB_KEY)?;
        }
        let created = state.add_child(parent, leaf);
        Ok((state.insert_handle(created, access), Disposition::Created))
    }

    fn set_value(
        &self,
        key: RawKey,
        name: &WideString,
        value_type: ValueType,
        data: &[u8],
    ) -> Result<(), StatusError> {
        let mut state = self.lock();
        let node = state.open_with(key, KeyAccess::SET_VALUE)?;
        let name = name.to_string_lossy();
        let values = &mut state.nodes[node].values;

        match values
            .iter_mut()
            .find(|value| names_match(&value.name, &name, CaseSensitivity::Insensitive))
        {
            Some(existing) => {
                existing.value_type = value_type;
                existing.data = data.to_vec();
            }
            None => values.push(StoredValue {
                name,
                value_type,
                data: data.to_vec(),
            }),
        }
        Ok(())
    }

    fn query_value(
        &self,
        key: RawKey,
        name: &WideString,
    ) -> Result<(ValueType, Vec<u8>), StatusError> {
        let state = self.lock();
        let node = state.open_with(key, KeyAccess::QUERY_VALUE)?;
        let name = name.to_string_lossy();
        state.nodes[node]
            .values
            .iter()
            .find(|value| names_match(&value.name, &name, CaseSensitivity::Insensitive))
            .map(|value| (value.value_type, value.data.clone()))
            .ok_or_else(|| status(STATUS_OBJECT_NAME_NOT_FOUND))
    }

    fn delete_key(&self, key: RawKey) -> Result<(), StatusError> {
        let mut state = self.lock();
        let node = state.open_with(key, KeyAccess::DELETE)?;
        let Some(parent) = state.nodes[node].parent else {
            return Err(status(STATUS_ACCESS_DENIED));
        };
        if !state.nodes[node].children.is_empty() {
            return Err(status(STATUS_CANNOT_DELETE));
        }

        state.nodes[node].deleted = true;
        state.nodes[parent].children.retain(|&child| child != node);
        Ok(())
    }

    fn close(&self, key: RawKey) -> Result<(), StatusError> {
        self.lock()
            .handles
            .remove(&(key.as_raw() as usize))
            .map(|_| ())
            .ok_or_else(|| status(STATUS_INVALID_HANDLE))
    }
}
