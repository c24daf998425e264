//! Version-dependent resource-id encoding.
//!
//! Legacy stores persisted document ids with their `file:`/`folder:`
//! type prefix stripped, while the in-memory (canonical) form keeps it.
//! The transform is fixed per store and injected once at construction,
//! so no call site branches on the scheme.

use filesync_common::{EntryKind, IdScheme, ResourceId};
use std::fmt;
use std::sync::Arc;

pub(crate) const FILE_KIND_PREFIX: &str = "file:";
pub(crate) const FOLDER_KIND_PREFIX: &str = "folder:";

/// Reversible transform between canonical and persisted resource ids.
///
/// Must round-trip exactly: `from_disk(to_disk(id, kind), kind) == id`
/// for every canonical id.
pub trait ResourceIdCodec: fmt::Debug + Send + Sync {
    /// Form written to the engine
    fn to_disk(&self, id: &ResourceId, kind: EntryKind) -> ResourceId;
    /// Canonical in-memory form recovered from the engine
    fn from_disk(&self, id: ResourceId, kind: EntryKind) -> ResourceId;
}

/// Identity codec: ids are persisted verbatim
#[derive(Debug, Default)]
pub struct ModernIds;

impl ResourceIdCodec for ModernIds {
    fn to_disk(&self, id: &ResourceId, _kind: EntryKind) -> ResourceId {
        id.clone()
    }

    fn from_disk(&self, id: ResourceId, _kind: EntryKind) -> ResourceId {
        id
    }
}

/// Legacy document-id codec: the `file:`/`folder:` prefix is stripped on
/// write and restored, kind-dependently, on read.
#[derive(Debug, Default)]
pub struct LegacyDocIds;

impl ResourceIdCodec for LegacyDocIds {
    fn to_disk(&self, id: &ResourceId, _kind: EntryKind) -> ResourceId {
        ResourceId::new_unchecked(strip_kind_prefix(id.as_str()))
    }

    fn from_disk(&self, id: ResourceId, kind: EntryKind) -> ResourceId {
        let prefix = if kind.is_folder() {
            FOLDER_KIND_PREFIX
        } else {
            FILE_KIND_PREFIX
        };
        ResourceId::new_unchecked(format!("{prefix}{}", id.as_str()))
    }
}

/// Strip a legacy kind prefix, if any
pub(crate) fn strip_kind_prefix(id: &str) -> &str {
    id.strip_prefix(FILE_KIND_PREFIX)
        .or_else(|| id.strip_prefix(FOLDER_KIND_PREFIX))
        .unwrap_or(id)
}

/// Select the codec for a store's configured id scheme
#[must_use]
pub fn codec_for(scheme: IdScheme) -> Arc<dyn ResourceIdCodec> {
    match scheme {
        IdScheme::Modern => Arc::new(ModernIds),
        IdScheme::Legacy => Arc::new(LegacyDocIds),
    }
}
