//! Filesystem event handler for the notify watcher (hot-reload).

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::{debug, info};

/// Handle a single filesystem event from the notify watcher.
///
/// Bumps `generation` at most once per event, and only when one of the
/// event's paths is the watched rules file.
pub(super) fn handle_fs_event(event: &Event, target: &Path, generation: &AtomicU64) {
    let relevant = matches!(
        event.kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Remove(RemoveKind::File)
    );
    if !relevant {
        return;
    }

    let Some(target_name) = target.file_name() else {
        return;
    };

    if event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(target_name))
    {
        let next = generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(path = %target.display(), generation = next, kind = ?event.kind, "rules file changed");
    } else {
        debug!(paths = ?event.paths, "ignoring unrelated filesystem event");
    }
}
