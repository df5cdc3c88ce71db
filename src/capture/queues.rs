//! Ordered holders for captured problem images.
//!
//! Two queues with different replacement semantics:
//! - **primary** holds the image defining the current problem (length 0 or
//!   1); a new primary capture replaces it wholesale and empties the
//!   secondary queue — fresh-problem semantics.
//! - **secondary** holds follow-up images for debugging, bounded at a
//!   configured capacity; insertion beyond the cap evicts the oldest.
//!
//! Backing resources are destroyed through the capture collaborator,
//! best-effort: a failed delete is logged and never fatal.
//!
//! No internal locking — the pipeline controller serializes access.

use std::collections::VecDeque;
use std::sync::Arc;

use super::{CaptureError, CaptureSource, CapturedImage, QueueSelector};

pub struct CaptureQueues {
    source: Arc<dyn CaptureSource>,
    primary: Vec<CapturedImage>,
    secondary: VecDeque<CapturedImage>,
    secondary_capacity: usize,
}

impl CaptureQueues {
    pub fn new(source: Arc<dyn CaptureSource>, secondary_capacity: usize) -> Self {
        Self {
            source,
            primary: Vec::with_capacity(1),
            secondary: VecDeque::with_capacity(secondary_capacity),
            secondary_capacity,
        }
    }

    /// Replace the primary queue wholesale and empty the secondary queue.
    /// Superseded backing resources are destroyed best-effort.
    pub fn replace_primary(&mut self, image: CapturedImage) {
        for old in self.primary.drain(..) {
            discard(&*self.source, &old);
        }
        for old in self.secondary.drain(..) {
            discard(&*self.source, &old);
        }
        self.primary.push(image);
    }

    /// Append a follow-up image, evicting the oldest beyond capacity.
    pub fn push_secondary(&mut self, image: CapturedImage) {
        if self.secondary_capacity == 0 {
            tracing::warn!(id = %image.id, "secondary queue capacity is 0; discarding capture");
            discard(&*self.source, &image);
            return;
        }
        while self.secondary.len() >= self.secondary_capacity {
            if let Some(evicted) = self.secondary.pop_front() {
                tracing::debug!(id = %evicted.id, "secondary queue full; evicting oldest");
                discard(&*self.source, &evicted);
            }
        }
        self.secondary.push_back(image);
    }

    /// Remove one entry and destroy its backing resource.
    pub fn delete(&mut self, queue: QueueSelector, index: usize) -> Result<(), CaptureError> {
        let image = match queue {
            QueueSelector::Primary => {
                if index >= self.primary.len() {
                    return Err(CaptureError::IndexOutOfRange { queue, index });
                }
                self.primary.remove(index)
            }
            QueueSelector::Secondary => self
                .secondary
                .remove(index)
                .ok_or(CaptureError::IndexOutOfRange { queue, index })?,
        };
        discard(&*self.source, &image);
        Ok(())
    }

    /// Empty both queues, destroying backing resources best-effort.
    pub fn clear_all(&mut self) {
        for old in self.primary.drain(..) {
            discard(&*self.source, &old);
        }
        for old in self.secondary.drain(..) {
            discard(&*self.source, &old);
        }
    }

    pub fn primary(&self) -> &[CapturedImage] {
        &self.primary
    }

    pub fn secondary(&self) -> impl Iterator<Item = &CapturedImage> {
        self.secondary.iter()
    }

    pub fn has_primary(&self) -> bool {
        !self.primary.is_empty()
    }

    pub fn has_secondary(&self) -> bool {
        !self.secondary.is_empty()
    }

    pub fn primary_len(&self) -> usize {
        self.primary.len()
    }

    pub fn secondary_len(&self) -> usize {
        self.secondary.len()
    }
}

/// Best-effort backing-resource deletion.
fn discard(source: &dyn CaptureSource, image: &CapturedImage) {
    if let Err(e) = source.delete(image) {
        tracing::warn!(id = %image.id, error = %e, "failed to delete capture backing file");
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Capture double backed by a temp directory; records every delete.
    struct TempCaptureSource {
        dir: tempfile::TempDir,
        deleted: Mutex<Vec<Uuid>>,
    }

    impl TempCaptureSource {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                deleted: Mutex::new(Vec::new()),
            }
        }

        fn make_image(&self) -> CapturedImage {
            let image = CapturedImage::new(PathBuf::new());
            let path = self.dir.path().join(format!("{}.png", image.id));
            std::fs::write(&path, b"png").unwrap();
            CapturedImage { path, ..image }
        }

        fn deleted_ids(&self) -> Vec<Uuid> {
            self.deleted.lock().unwrap().clone()
        }
    }

    impl CaptureSource for TempCaptureSource {
        fn capture_primary(&self) -> Result<CapturedImage, CaptureError> {
            Ok(self.make_image())
        }
        fn capture_secondary(&self) -> Result<CapturedImage, CaptureError> {
            Ok(self.make_image())
        }
        fn delete(&self, image: &CapturedImage) -> Result<(), CaptureError> {
            self.deleted.lock().unwrap().push(image.id);
            let _ = std::fs::remove_file(&image.path);
            Ok(())
        }
    }

    fn queues_with(cap: usize) -> (Arc<TempCaptureSource>, CaptureQueues) {
        let source = Arc::new(TempCaptureSource::new());
        let queues = CaptureQueues::new(source.clone(), cap);
        (source, queues)
    }

    // ── Primary replacement ──

    #[test]
    fn replace_primary_holds_exactly_one() {
        let (source, mut queues) = queues_with(2);
        queues.replace_primary(source.make_image());
        queues.replace_primary(source.make_image());
        assert_eq!(queues.primary_len(), 1);
    }

    #[test]
    fn replace_primary_clears_secondary_and_deletes_backing() {
        let (source, mut queues) = queues_with(2);
        let first = source.make_image();
        let first_id = first.id;
        queues.replace_primary(first);
        let follow = source.make_image();
        let follow_id = follow.id;
        queues.push_secondary(follow);

        queues.replace_primary(source.make_image());

        assert_eq!(queues.primary_len(), 1);
        assert_eq!(queues.secondary_len(), 0);
        let deleted = source.deleted_ids();
        assert!(deleted.contains(&first_id));
        assert!(deleted.contains(&follow_id));
    }

    // ── Secondary cap ──

    #[test]
    fn push_secondary_enforces_capacity_by_evicting_oldest() {
        let (source, mut queues) = queues_with(2);
        let a = source.make_image();
        let a_id = a.id;
        queues.push_secondary(a);
        queues.push_secondary(source.make_image());
        let c = source.make_image();
        let c_id = c.id;
        queues.push_secondary(c);

        assert_eq!(queues.secondary_len(), 2);
        assert!(source.deleted_ids().contains(&a_id));
        let held: Vec<Uuid> = queues.secondary().map(|i| i.id).collect();
        assert!(held.contains(&c_id));
        assert!(!held.contains(&a_id));
    }

    #[test]
    fn zero_capacity_discards_immediately() {
        let (source, mut queues) = queues_with(0);
        let image = source.make_image();
        let id = image.id;
        queues.push_secondary(image);
        assert_eq!(queues.secondary_len(), 0);
        assert!(source.deleted_ids().contains(&id));
    }

    // ── Delete ──

    #[test]
    fn delete_removes_entry_and_backing() {
        let (source, mut queues) = queues_with(2);
        queues.replace_primary(source.make_image());
        let id = queues.primary()[0].id;

        queues.delete(QueueSelector::Primary, 0).unwrap();
        assert_eq!(queues.primary_len(), 0);
        assert!(source.deleted_ids().contains(&id));
    }

    #[test]
    fn delete_out_of_range_is_error_not_panic() {
        let (_source, mut queues) = queues_with(2);
        let result = queues.delete(QueueSelector::Secondary, 3);
        assert!(matches!(
            result,
            Err(CaptureError::IndexOutOfRange {
                queue: QueueSelector::Secondary,
                index: 3
            })
        ));
    }

    #[test]
    fn delete_secondary_preserves_order() {
        let (source, mut queues) = queues_with(3);
        let ids: Vec<Uuid> = (0..3)
            .map(|_| {
                let image = source.make_image();
                let id = image.id;
                queues.push_secondary(image);
                id
            })
            .collect();

        queues.delete(QueueSelector::Secondary, 1).unwrap();
        let held: Vec<Uuid> = queues.secondary().map(|i| i.id).collect();
        assert_eq!(held, vec![ids[0], ids[2]]);
    }

    // ── Clear ──

    #[test]
    fn clear_all_empties_both_queues() {
        let (source, mut queues) = queues_with(2);
        queues.replace_primary(source.make_image());
        queues.push_secondary(source.make_image());

        queues.clear_all();

        assert!(!queues.has_primary());
        assert!(!queues.has_secondary());
        assert_eq!(source.deleted_ids().len(), 2);
    }

    #[test]
    fn failed_backing_delete_is_not_fatal() {
        struct FailingDelete;
        impl CaptureSource for FailingDelete {
            fn capture_primary(&self) -> Result<CapturedImage, CaptureError> {
                Ok(CapturedImage::new("x.png".into()))
            }
            fn capture_secondary(&self) -> Result<CapturedImage, CaptureError> {
                Ok(CapturedImage::new("x.png".into()))
            }
            fn delete(&self, _: &CapturedImage) -> Result<(), CaptureError> {
                Err(CaptureError::CaptureFailed("disk gone".into()))
            }
        }

        let mut queues = CaptureQueues::new(Arc::new(FailingDelete), 2);
        queues.replace_primary(CapturedImage::new("a.png".into()));
        // Replacement proceeds even though the old backing delete failed
        queues.replace_primary(CapturedImage::new("b.png".into()));
        assert_eq!(queues.primary_len(), 1);
        queues.clear_all();
        assert_eq!(queues.primary_len(), 0);
    }
}
