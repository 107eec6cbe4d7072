//! Locked read-modify-write cycles over the registry files.
//!
//! Each operation follows the same protocol: open (creating if absent), take
//! an exclusive whole-file advisory lock, read and parse the current object,
//! apply the mutation, truncate, write the pretty-printed result, fsync, and
//! release the lock. Partial writes are never observable by other lockers.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::keys::process_key;

/// Insert `entry` under the calling process's key.
///
/// The key is computed from the SLURM environment plus the optional
/// `suffix` (a QPU family or executor group name). An existing entry under
/// the same key is replaced.
pub fn write_on_file(entry: &Value, path: &Path, suffix: &str) -> RegistryResult<()> {
    with_locked_object(path, |object| {
        let key = process_key(suffix);
        debug!("registering {} in {}", key, path.display());
        object.insert(key, entry.clone());
    })
}

/// Set a single field inside the calling process's entry.
///
/// Unlike [`write_on_file`] this preserves the other fields of the entry,
/// which is how a channel that already published its own endpoint later
/// records the executor endpoint next to it. A missing entry is created.
pub fn merge_into_entry(path: &Path, suffix: &str, field: &str, value: Value) -> RegistryResult<()> {
    with_locked_object(path, |object| {
        let key = process_key(suffix);
        let entry = object
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(fields) = entry {
            fields.insert(field.to_string(), value);
        } else {
            *entry = serde_json::json!({ field: value });
        }
    })
}

/// Remove every entry whose key starts with `prefix`.
pub fn remove_from_file(path: &Path, prefix: &str) -> RegistryResult<()> {
    with_locked_object(path, |object| {
        let before = object.len();
        object.retain(|key, _| !key.starts_with(prefix));
        debug!(
            "removed {} entries with prefix {} from {}",
            before - object.len(),
            prefix,
            path.display()
        );
    })
}

/// Read the current registry contents.
///
/// Used by the task ingress rewrite and by the executor to discover peers. A
/// file that cannot be opened is an error; readers need the registry to
/// exist before they can resolve anything. An empty file parses as an empty
/// object.
pub fn read_snapshot(path: &Path) -> RegistryResult<Value> {
    let file = File::open(path).map_err(|e| RegistryError::new(path, e))?;
    FileExt::lock_shared(&file).map_err(|e| RegistryError::new(path, e))?;
    let result = read_object(&file, path).map(Value::Object);
    let _ = fs2::FileExt::unlock(&file);
    result
}

/// Run `mutate` over the parsed object while holding the exclusive lock.
fn with_locked_object<F>(path: &Path, mutate: F) -> RegistryResult<()>
where
    F: FnOnce(&mut Map<String, Value>),
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RegistryError::new(path, e))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| RegistryError::new(path, e))?;
    FileExt::lock_exclusive(&file).map_err(|e| RegistryError::new(path, e))?;

    let result = (|| {
        let mut object = read_relaxed(&file);
        mutate(&mut object);
        rewrite(&file, &Value::Object(object), path)
    })();

    // The lock is released only after fsync so no partial write is visible.
    let _ = fs2::FileExt::unlock(&file);
    result
}

/// Parse the current contents, treating an empty or damaged file as empty.
fn read_relaxed(mut file: &File) -> Map<String, Value> {
    let mut content = String::new();
    if file.seek(SeekFrom::Start(0)).is_err() || file.read_to_string(&mut content).is_err() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Parse the current contents, failing on damage.
fn read_object(mut file: &File, path: &Path) -> RegistryResult<Map<String, Value>> {
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| RegistryError::new(path, e))?;
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RegistryError::new(path, "registry root is not an object")),
        Err(e) => Err(RegistryError::new(path, e)),
    }
}

/// Truncate and rewrite the whole file, fsyncing before returning.
fn rewrite(mut file: &File, value: &Value, path: &Path) -> RegistryResult<()> {
    file.set_len(0).map_err(|e| RegistryError::new(path, e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| RegistryError::new(path, e))?;

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| RegistryError::new(path, e))?;

    file.write_all(&buffer)
        .map_err(|e| RegistryError::new(path, e))?;
    file.sync_all().map_err(|e| RegistryError::new(path, e))
}
